//! Slide segmentation: paginated Markdown → ordered [`SlideRecord`]s.
//!
//! The upstream converter renders one Markdown document per deck and marks
//! every page boundary with a fixed-width rule:
//!
//! ```text
//! <page 0 content>
//!
//! {1}------------------------------------------------
//!
//! <page 1 content>
//! ```
//!
//! Segmentation is two explicit passes instead of a chain of regexes:
//!
//! 1. [`split_pages`] scans for the separator and yields the raw page bodies.
//! 2. [`classify_line`] assigns every line of a page exactly one
//!    [`LineKind`]; only `Text` lines survive into the slide text and only
//!    `Image` lines contribute image references.
//!
//! ## Classification precedence
//!
//! | Order | Kind         | Rule (on the untrimmed line)        |
//! |-------|--------------|-------------------------------------|
//! | 1     | `Image`      | starts with `![`                    |
//! | 2     | `Blank`      | empty after trimming whitespace     |
//! | 3     | `PageMarker` | starts with `{`                     |
//! | 4     | `Heading`    | starts with `#`                     |
//! | 5     | `Text`       | everything else, kept verbatim      |
//!
//! Each page is trimmed before it is split into lines, so the indentation of
//! its first line is gone by the time it is classified: `  # x` there is a
//! heading, while the same line further down stays text.
//!
//! Image references are only recognised at the start of a line; one that
//! appears mid-line stays part of the text. Blank lines are dropped rather
//! than kept as paragraph breaks, so consecutive paragraphs are joined by a
//! single `\n`.

use crate::error::DeckMetaError;
use crate::output::{ImageRef, SlideRecord};
use tracing::debug;

/// Number of dashes in the page rule emitted by the converter.
pub const PAGE_RULE_WIDTH: usize = 48;

/// The category a single Markdown line falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// An image reference; carries the path from the first `(...)` group.
    Image(&'a str),
    Blank,
    /// A stray `{N}` page marker fragment.
    PageMarker,
    Heading,
    Text,
}

/// Classify one line. See the module docs for the precedence table.
///
/// Returns `None` for a line that starts like an image reference but has no
/// parenthesised path: the caller turns that into a parse error.
pub fn classify_line(line: &str) -> Option<LineKind<'_>> {
    if line.starts_with("![") {
        return first_parenthesized(line).map(LineKind::Image);
    }
    if line.trim().is_empty() {
        return Some(LineKind::Blank);
    }
    if line.starts_with('{') {
        return Some(LineKind::PageMarker);
    }
    if line.starts_with('#') {
        return Some(LineKind::Heading);
    }
    Some(LineKind::Text)
}

/// Content of the first `(...)` group: from the first `(` to the next `)`.
fn first_parenthesized(line: &str) -> Option<&str> {
    let open = line.find('(')?;
    let rest = &line[open + 1..];
    let close = rest.find(')')?;
    Some(&rest[..close])
}

/// Split a document on page separators.
///
/// Matching is leftmost and non-overlapping: after a separator is consumed
/// the scan resumes behind its trailing blank line, so two rules that share
/// a blank-line pair only split once. The returned pages are untrimmed.
pub fn split_pages(markdown: &str) -> Vec<&str> {
    let mut pages = Vec::new();
    let mut page_start = 0;
    let mut cursor = 0;

    while let Some(offset) = markdown[cursor..].find("\n\n{") {
        let at = cursor + offset;
        match separator_len(&markdown[at..]) {
            Some(len) => {
                pages.push(&markdown[page_start..at]);
                page_start = at + len;
                cursor = page_start;
            }
            None => cursor = at + 1,
        }
    }
    pages.push(&markdown[page_start..]);
    pages
}

/// Length of the separator at the start of `s`, if there is one:
/// `\n\n{<digits>}` + [`PAGE_RULE_WIDTH`] dashes + `\n\n`.
fn separator_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 3; // "\n\n{"

    let digits = bytes[i..].iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    i += digits;

    if bytes.get(i) != Some(&b'}') {
        return None;
    }
    i += 1;

    let dashes = bytes[i..].iter().take_while(|&&b| b == b'-').count();
    if dashes != PAGE_RULE_WIDTH {
        return None;
    }
    i += dashes;

    if bytes.get(i..i + 2) != Some(b"\n\n".as_slice()) {
        return None;
    }
    Some(i + 2)
}

/// Parse a whole Markdown document into slide records.
///
/// Pages that are empty after trimming are dropped before numbering, so
/// indices have no gaps. All annotations are left `Pending`.
///
/// # Errors
/// [`DeckMetaError::MalformedImage`] when an image line has no `(path)`.
pub fn segment_slides(markdown: &str) -> Result<Vec<SlideRecord>, DeckMetaError> {
    let pages: Vec<&str> = split_pages(markdown)
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let mut slides = Vec::with_capacity(pages.len());
    for (index, page) in pages.into_iter().enumerate() {
        slides.push(parse_slide(index, page)?);
    }

    debug!("Segmented document into {} slides", slides.len());
    Ok(slides)
}

fn parse_slide(index: usize, page: &str) -> Result<SlideRecord, DeckMetaError> {
    let mut text_lines: Vec<&str> = Vec::new();
    let mut images = Vec::new();

    for (line_idx, line) in page.split('\n').enumerate() {
        let kind = classify_line(line).ok_or_else(|| DeckMetaError::MalformedImage {
            slide: index,
            line_number: line_idx + 1,
            line: line.to_string(),
        })?;

        match kind {
            LineKind::Image(path) => images.push(ImageRef::new(path)),
            LineKind::Text => text_lines.push(line),
            LineKind::Blank | LineKind::PageMarker | LineKind::Heading => {}
        }
    }

    Ok(SlideRecord::new(index, text_lines.join("\n"), images))
}
