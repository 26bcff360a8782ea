//! Post-processing: deterministic cleanup of model-generated captions and
//! summaries.
//!
//! Even when told to answer "in one sentence without any preamble", small
//! local models occasionally:
//!
//! - wrap the answer in ` ``` ` fences or quotation marks,
//! - open with "Sure! Here is a one-sentence summary:",
//! - break the sentence over several lines, or use `\r\n` endings,
//! - emit zero-width characters copied from the slide text.
//!
//! The persisted metadata is consumed by search and retrieval tools that
//! expect one plain line per field, so every response is normalised here.
//!
//! ## Rule Order
//!
//! Fences are stripped before line endings are normalised so the fence regex
//! sees the raw response; whitespace is collapsed before the preamble rules
//! so a preamble followed by a blank line is still recognised.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw model response.
///
/// Rules (applied in order):
/// 1. Strip outer code fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 4. Collapse all whitespace runs (including newlines) to one space
/// 5. Drop a leading acknowledgement ("Sure!", "Certainly.")
/// 6. Drop a leading "Here is a … summary/description:" lead-in
/// 7. Strip quotation marks wrapping the whole answer
///
/// The result may be empty; callers treat that as a failed request.
pub fn clean_response(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = collapse_whitespace(&s);
    let s = strip_acknowledgement(&s);
    let s = strip_lead_in(&s);
    strip_wrapping_quotes(&s)
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\n(.*)\n```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Collapse whitespace ──────────────────────────────────────────────

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Rule 5: Leading acknowledgement ──────────────────────────────────────────

static RE_ACKNOWLEDGEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:sure|certainly|of course|okay|ok)(?:[!.,]+|\s*-)\s*").unwrap()
});

fn strip_acknowledgement(input: &str) -> String {
    RE_ACKNOWLEDGEMENT.replace(input, "").to_string()
}

// ── Rule 6: "Here is a one-sentence summary:" lead-in ───────────────────────
//
// Only lead-ins that talk about the answer itself are removed; a caption
// such as "Here is a chart: revenue by quarter" is left untouched.

static RE_LEAD_IN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^here(?:'s| is)\s+(?:a|an|the|your)?\s*(?:one[- ]sentence|single[- ]sentence|brief|short|concise)?\s*(?:summary|description|caption)\b[^:]{0,60}:\s*",
    )
    .unwrap()
});

fn strip_lead_in(input: &str) -> String {
    RE_LEAD_IN.replace(input, "").to_string()
}

// ── Rule 7: Wrapping quotes ──────────────────────────────────────────────────

fn strip_wrapping_quotes(input: &str) -> String {
    let pairs = [('"', '"'), ('\u{201C}', '\u{201D}'), ('\'', '\'')];
    for (open, close) in pairs {
        if let Some(inner) = input
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            if !inner.contains(open) && !inner.contains(close) {
                return inner.trim().to_string();
            }
        }
    }
    input.trim().to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────
