use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn conflicting_selection_flags_fail_fast() {
    let mut cmd = Command::cargo_bin("castnotes").unwrap();
    cmd.args([
        "--rss",
        "https://example.com/feed.xml",
        "--whisper",
        "--last",
        "3",
        "--skip",
        "2",
        "--quiet",
    ]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("configuration error"))
        .stderr(predicate::str::contains("--last"));
}

#[test]
fn malformed_dates_are_rejected_before_any_stage() {
    let mut cmd = Command::cargo_bin("castnotes").unwrap();
    cmd.args([
        "--rss",
        "https://example.com/feed.xml",
        "--whisper",
        "--date",
        "07/01/2025",
        "--quiet",
    ]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("YYYY-MM-DD"));
}

#[test]
fn a_source_is_required() {
    let mut cmd = Command::cargo_bin("castnotes").unwrap();
    cmd.args(["--whisper"]);

    cmd.assert().failure();
}
