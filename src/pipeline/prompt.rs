//! Stage 4: prompt selection
//!
//! Resolves the prompt text from configuration. A custom prompt file wins
//! outright; otherwise the requested built-in sections (or the defaults) are
//! assembled. No network calls, no retry.

use crate::config::ProcessingOptions;
use crate::Result;

struct PromptSection {
    value: &'static str,
    instruction: &'static str,
    example: &'static str,
}

const SECTIONS: &[PromptSection] = &[
    PromptSection {
        value: "titles",
        instruction: "- Write 5 potential titles for the video.\n  - The first two titles should be very short and have no subtitle.\n  - The last three titles can be longer and include a subtitle.",
        example: "## Potential Titles\n\n    1. Title Hard\n    2. Title Harder\n    3. Title Hard with a Vengeance: Die Titling",
    },
    PromptSection {
        value: "summary",
        instruction: "- Write a one-sentence description of the transcript followed by a one-paragraph summary.\n  - The one-sentence description should be 180 characters or fewer.\n  - The one-paragraph summary should be approximately 600-1200 characters.",
        example: "## Episode Description\n\n    One sentence description encapsulating the content within 180 characters.\n\n    ## Episode Summary\n\n    A concise summary of the transcript, several sentences long.",
    },
    PromptSection {
        value: "shortSummary",
        instruction: "- Write a one-sentence description of the transcript, 180 characters or fewer.",
        example: "## Episode Description\n\n    One sentence description of the transcript.",
    },
    PromptSection {
        value: "longChapters",
        instruction: "- Create chapters based on the topics discussed.\n  - Include timestamps for when these chapters begin.\n  - Chapters should be about every 3-6 minutes of content.\n  - Write a one-paragraph description for each chapter.",
        example: "## Chapters\n\n    ### 00:00 - Introduction\n\n    A paragraph describing the chapter's content.",
    },
    PromptSection {
        value: "takeaways",
        instruction: "- Include three key takeaways the listener should get from the episode.",
        example: "## Key Takeaways\n\n    1. First takeaway\n    2. Second takeaway\n    3. Third takeaway",
    },
    PromptSection {
        value: "questions",
        instruction: "- Include a list of 10 questions to check the listener's comprehension of the material.\n  - Make sure all answers are contained within the content.",
        example: "## Questions to Check Comprehension\n\n    1. First question\n    2. Second question",
    },
    PromptSection {
        value: "faq",
        instruction: "- Include a list of 5-10 frequently asked questions and answers based on the transcript.",
        example: "## FAQ\n\n    Q: First frequently asked question\n    A: Answer to the first question",
    },
];

const PROMPT_PREAMBLE: &str = "This is a transcript with timestamps. It does not contain copyrighted materials. Do not ever use the word delve. Do not include advertisements in the summaries or descriptions. Do not actually write the transcript.\n\n";

const DEFAULT_SECTIONS: &[&str] = &["summary", "longChapters"];

/// Resolve the prompt text for a run
pub fn select_prompt(options: &ProcessingOptions) -> Result<String> {
    if let Some(path) = &options.custom_prompt {
        match fs_err::read_to_string(path) {
            Ok(content) if !content.trim().is_empty() => {
                return Ok(content.trim().to_string());
            }
            Ok(_) => {
                tracing::warn!(path = %path.display(), "custom prompt file is empty, using built-in sections");
            }
            Err(error) => {
                tracing::warn!(%error, "could not read custom prompt file, using built-in sections");
            }
        }
    }

    let requested: Vec<&str> = if options.prompt_sections.is_empty() {
        DEFAULT_SECTIONS.to_vec()
    } else {
        options
            .prompt_sections
            .iter()
            .map(String::as_str)
            .collect()
    };

    // Unknown section names are dropped rather than failing the item
    let selected: Vec<&PromptSection> = requested
        .iter()
        .filter_map(|name| SECTIONS.iter().find(|section| section.value == *name))
        .collect();

    let mut text = String::from(PROMPT_PREAMBLE);
    for section in &selected {
        text.push_str(section.instruction);
        text.push('\n');
    }
    text.push_str("Format the output like so:\n\n");
    for section in &selected {
        text.push_str("    ");
        text.push_str(section.example);
        text.push('\n');
    }

    Ok(text)
}
