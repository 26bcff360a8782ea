//! Prompts for slide summaries and image captions.
//!
//! Small local models (gemma3:4b, llava) tend to open with "Sure! Here is…"
//! unless told not to, so both prompts ask for no preamble. [`crate::pipeline::postprocess::clean_response`] removes what
//! slips through anyway.

/// Prompt sent with every slide image.
pub const IMAGE_DESCRIPTION_PROMPT: &str =
    "Describe this image exactly in one sentence without any preamble or additional text";

/// Prefix of the summary prompt; the slide text follows it.
pub const SUMMARY_PROMPT_PREFIX: &str =
    "Summarize in exactly one sentence without any preamble or additional text: ";

/// Build the summary prompt for a slide's text.
pub fn summary_prompt(text: &str) -> String {
    format!("{SUMMARY_PROMPT_PREFIX}{text}")
}
