//! RSS feed fetching and item selection
//!
//! Feeds are resolved local-file-first, then fetched over HTTP through the
//! retry wrapper with a registered cancellation token. Item selection is a
//! pure function from parsed feed entries and the run's selection options to
//! the ordered subset of items to process.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;

use crate::cli::FeedOrder;
use crate::config::ProcessingOptions;
use crate::lifecycle::ResourceManager;
use crate::pipeline::ShowNoteMetadata;
use crate::retry::{with_retry, RetryPolicy};
use crate::{CastnotesError, Result};

/// A fetched feed reduced to what the pipeline needs
#[derive(Debug, Clone)]
pub struct ResolvedFeed {
    pub channel_title: String,
    pub items: Vec<ShowNoteMetadata>,
}

/// Expand feed references into concrete feed URLs or paths. A reference that
/// is a readable `.md` file contributes one feed URL per non-blank,
/// non-comment line; anything else passes through unchanged.
pub fn expand_feed_refs(refs: &[String]) -> Result<Vec<String>> {
    let mut expanded = Vec::new();

    for feed_ref in refs {
        let path = std::path::Path::new(feed_ref);
        let is_md = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("md"))
            .unwrap_or(false);

        if is_md && path.is_file() {
            let content = fs_err::read_to_string(path)?;
            let lines: Vec<String> = content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(String::from)
                .collect();

            if lines.is_empty() {
                return Err(CastnotesError::Config(format!(
                    "no feed URLs found in {feed_ref}"
                )));
            }
            expanded.extend(lines);
        } else {
            expanded.push(feed_ref.clone());
        }
    }

    Ok(expanded)
}

/// Fetch and parse a feed, trying the reference as a local file path first
/// and falling back to a retried HTTP fetch.
pub async fn fetch_feed(
    manager: &ResourceManager,
    http: &reqwest::Client,
    policy: &RetryPolicy,
    feed_ref: &str,
    options: &ProcessingOptions,
) -> Result<ResolvedFeed> {
    if let Ok(content) = fs_err::read_to_string(feed_ref) {
        let channel = parse_channel(content.as_bytes())?;
        return Ok(resolve_channel(&channel, options));
    }

    let timeout = Duration::from_secs(options.app.fetch_timeout_secs);
    let (cancel, registration) = manager.cancellation_token();

    let fetch = with_retry(policy, &cancel, "rss fetch", || {
        let request = http
            .get(feed_ref)
            .header(ACCEPT, "application/rss+xml")
            .timeout(timeout);
        let cancel = cancel.clone();
        async move {
            let response = tokio::select! {
                response = request.send() => response?,
                _ = cancel.cancelled() => return Err(CastnotesError::Interrupted),
            };

            if !response.status().is_success() {
                return Err(CastnotesError::Feed(format!(
                    "HTTP error fetching {}: status {}",
                    response.url(),
                    response.status()
                )));
            }

            Ok(response.bytes().await?)
        }
    })
    .await;
    registration.revoke();

    let channel = parse_channel(&fetch?)?;
    Ok(resolve_channel(&channel, options))
}

fn parse_channel(bytes: &[u8]) -> Result<rss::Channel> {
    rss::Channel::read_from(bytes)
        .map_err(|error| CastnotesError::Feed(format!("feed parsing failed: {error}")))
}

fn resolve_channel(channel: &rss::Channel, options: &ProcessingOptions) -> ResolvedFeed {
    ResolvedFeed {
        channel_title: channel.title().to_string(),
        items: select_items(options, channel),
    }
}

/// Filter and order feed entries into the subset to process.
///
/// Only entries carrying an audio or video enclosure are eligible. The first
/// matching selection rule wins: explicit items, then publish-date window,
/// then explicit dates, then a most-recent count, then the order/skip
/// default. Entries with an unparseable publish date are treated as
/// published today so date filters stay deterministic.
pub fn select_items(options: &ProcessingOptions, channel: &rss::Channel) -> Vec<ShowNoteMetadata> {
    let today = Utc::now().date_naive();

    let channel_image = channel
        .itunes_ext()
        .and_then(|ext| ext.image())
        .map(str::to_string)
        .or_else(|| channel.image().map(|image| image.url().to_string()))
        .unwrap_or_default();

    let eligible: Vec<ShowNoteMetadata> = channel
        .items()
        .iter()
        .filter(|item| {
            item.enclosure()
                .map(|enclosure| {
                    let mime = enclosure.mime_type();
                    mime.starts_with("audio/") || mime.starts_with("video/")
                })
                .unwrap_or(false)
        })
        .map(|item| {
            let publish_date = item
                .pub_date()
                .and_then(parse_publish_date)
                .unwrap_or(today)
                .format("%Y-%m-%d")
                .to_string();

            ShowNoteMetadata {
                show_link: item
                    .enclosure()
                    .map(|enclosure| enclosure.url().to_string())
                    .unwrap_or_default(),
                channel: channel.title().to_string(),
                channel_url: channel.link().to_string(),
                title: item.title().unwrap_or_default().to_string(),
                description: String::new(),
                publish_date,
                cover_image: item
                    .itunes_ext()
                    .and_then(|ext| ext.image())
                    .map(str::to_string)
                    .unwrap_or_else(|| channel_image.clone()),
            }
        })
        .collect();

    if !options.items.is_empty() {
        return eligible
            .into_iter()
            .filter(|item| options.items.iter().any(|link| link == &item.show_link))
            .collect();
    }

    if let Some(last_days) = options.last_days {
        let cutoff = today - chrono::Duration::days(i64::from(last_days));
        return eligible
            .into_iter()
            .filter(|item| {
                chrono::NaiveDate::parse_from_str(&item.publish_date, "%Y-%m-%d")
                    .map(|date| date >= cutoff)
                    .unwrap_or(false)
            })
            .collect();
    }

    if !options.dates.is_empty() {
        return eligible
            .into_iter()
            .filter(|item| options.dates.iter().any(|date| date == &item.publish_date))
            .collect();
    }

    if let Some(last) = options.last {
        return eligible.into_iter().take(last as usize).collect();
    }

    let ordered: Vec<ShowNoteMetadata> = if options.order == Some(FeedOrder::Oldest) {
        eligible.into_iter().rev().collect()
    } else {
        eligible
    };

    let skip = options.skip.unwrap_or(0) as usize;
    ordered.into_iter().skip(skip).collect()
}

fn parse_publish_date(raw: &str) -> Option<chrono::NaiveDate> {
    DateTime::parse_from_rfc2822(raw)
        .map(|datetime| datetime.date_naive())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|datetime| datetime.date_naive()))
        .ok()
}

/// Log how many items a feed yielded and how many will be processed
pub fn log_selection_status(total: usize, processing: usize, options: &ProcessingOptions) {
    if !options.items.is_empty() {
        tracing::info!(total, processing, "processing explicitly requested feed items");
    } else if let Some(last) = options.last {
        tracing::info!(total, last, "processing the most recent feed items");
    } else {
        tracing::info!(
            total,
            processing,
            skipped = options.skip.unwrap_or(0),
            "processing feed items"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, SourceKind, TranscriptionEngineKind};

    fn options() -> ProcessingOptions {
        ProcessingOptions {
            source: SourceKind::Rss(vec!["https://example.com/feed.xml".into()]),
            items: Vec::new(),
            last: None,
            skip: None,
            order: None,
            dates: Vec::new(),
            last_days: None,
            transcription: Some(TranscriptionEngineKind::Whisper {
                model: "base".into(),
            }),
            llm: None,
            prompt_sections: Vec::new(),
            custom_prompt: None,
            save_audio: false,
            info: false,
            quiet: false,
            json: false,
            app: AppConfig::default(),
        }
    }

    fn feed_xml(items: &[(&str, &str, &str)]) -> String {
        let entries: String = items
            .iter()
            .map(|(title, url, pub_date)| {
                format!(
                    "<item><title>{title}</title><pubDate>{pub_date}</pubDate>\
                     <enclosure url=\"{url}\" length=\"0\" type=\"audio/mpeg\"/></item>"
                )
            })
            .collect();
        format!(
            "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel>\
             <title>Test Cast</title><link>https://example.com</link>{entries}\
             </channel></rss>"
        )
    }

    fn channel_from(xml: &str) -> rss::Channel {
        rss::Channel::read_from(xml.as_bytes()).unwrap()
    }

    fn numbered_feed(count: usize) -> rss::Channel {
        let items: Vec<(String, String, String)> = (0..count)
            .map(|i| {
                (
                    format!("Episode {i}"),
                    format!("https://example.com/ep{i}.mp3"),
                    "Tue, 01 Jul 2025 10:00:00 +0000".to_string(),
                )
            })
            .collect();
        let borrowed: Vec<(&str, &str, &str)> = items
            .iter()
            .map(|(t, u, d)| (t.as_str(), u.as_str(), d.as_str()))
            .collect();
        channel_from(&feed_xml(&borrowed))
    }

    #[test]
    fn entries_without_av_enclosures_are_dropped() {
        let xml = "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel>\
             <title>Test Cast</title><link>https://example.com</link>\
             <item><title>Audio</title>\
             <enclosure url=\"https://example.com/a.mp3\" length=\"0\" type=\"audio/mpeg\"/></item>\
             <item><title>No enclosure</title></item>\
             <item><title>PDF</title>\
             <enclosure url=\"https://example.com/notes.pdf\" length=\"0\" type=\"application/pdf\"/></item>\
             <item><title>Video</title>\
             <enclosure url=\"https://example.com/v.mp4\" length=\"0\" type=\"video/mp4\"/></item>\
             </channel></rss>";

        let selected = select_items(&options(), &channel_from(xml));
        let titles: Vec<&str> = selected.iter().map(|item| item.title.as_str()).collect();
        assert_eq!(titles, vec!["Audio", "Video"]);
    }

    #[test]
    fn explicit_item_links_select_exactly_those_entries() {
        let channel = numbered_feed(5);
        let mut opts = options();
        opts.items = vec!["https://example.com/ep2.mp3".into()];

        let selected = select_items(&opts, &channel);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].title, "Episode 2");
        assert_eq!(selected[0].show_link, "https://example.com/ep2.mp3");
    }

    #[test]
    fn last_takes_the_first_n_in_feed_order() {
        let channel = numbered_feed(10);
        let mut opts = options();
        opts.last = Some(3);

        let selected = select_items(&opts, &channel);
        let titles: Vec<&str> = selected.iter().map(|item| item.title.as_str()).collect();
        assert_eq!(titles, vec!["Episode 0", "Episode 1", "Episode 2"]);
    }

    #[test]
    fn oldest_order_reverses_then_skip_slices() {
        let channel = numbered_feed(10);
        let mut opts = options();
        opts.order = Some(FeedOrder::Oldest);
        opts.skip = Some(2);

        let selected = select_items(&opts, &channel);
        assert_eq!(selected.len(), 8);
        assert_eq!(selected[0].title, "Episode 7");
        assert_eq!(selected.last().unwrap().title, "Episode 0");
    }

    #[test]
    fn unparsable_pub_date_counts_as_today_for_last_days() {
        let xml = "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel>\
             <title>Test Cast</title><link>https://example.com</link>\
             <item><title>Garbled</title><pubDate>not a date</pubDate>\
             <enclosure url=\"https://example.com/g.mp3\" length=\"0\" type=\"audio/mpeg\"/></item>\
             <item><title>Ancient</title><pubDate>Mon, 01 Jan 2001 00:00:00 +0000</pubDate>\
             <enclosure url=\"https://example.com/old.mp3\" length=\"0\" type=\"audio/mpeg\"/></item>\
             </channel></rss>";

        let mut opts = options();
        opts.last_days = Some(7);

        let selected = select_items(&opts, &channel_from(xml));
        let titles: Vec<&str> = selected.iter().map(|item| item.title.as_str()).collect();
        assert_eq!(titles, vec!["Garbled"]);
    }

    #[test]
    fn explicit_dates_match_formatted_publish_dates() {
        let xml = feed_xml(&[
            ("A", "https://example.com/a.mp3", "Tue, 01 Jul 2025 10:00:00 +0000"),
            ("B", "https://example.com/b.mp3", "Wed, 02 Jul 2025 10:00:00 +0000"),
        ]);
        let mut opts = options();
        opts.dates = vec!["2025-07-02".into()];

        let selected = select_items(&opts, &channel_from(xml.as_str()));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].title, "B");
    }

    #[test]
    fn expand_feed_refs_reads_md_files() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("feeds.md");
        fs_err::write(
            &list,
            "# my feeds\nhttps://example.com/a.xml\n\nhttps://example.com/b.xml\n",
        )
        .unwrap();

        let refs = vec![
            list.to_string_lossy().to_string(),
            "https://example.com/direct.xml".to_string(),
        ];
        let expanded = expand_feed_refs(&refs).unwrap();
        assert_eq!(
            expanded,
            vec![
                "https://example.com/a.xml",
                "https://example.com/b.xml",
                "https://example.com/direct.xml"
            ]
        );
    }

    #[test]
    fn expand_feed_refs_rejects_empty_md_files() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("feeds.md");
        fs_err::write(&list, "# only comments\n\n").unwrap();

        let result = expand_feed_refs(&[list.to_string_lossy().to_string()]);
        assert!(matches!(result, Err(CastnotesError::Config(_))));
    }
}
