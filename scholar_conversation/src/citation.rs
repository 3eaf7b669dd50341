//! Placement of citation markers in answer text.
//!
//! The service reports each annotation as a literal substring of the answer.
//! Locating that span is behind [`CitationMatcher`] so a different strategy
//! (e.g. character offsets) can replace [`LiteralMatcher`] without touching
//! the pipeline.

use scholar_core::{Annotation, Citation};
use std::ops::Range;

const FOOTER_SEPARATOR: &str = "\n\n---\n";

pub trait CitationMatcher: Send + Sync {
    /// Replace the span `annotation` refers to with `marker`.
    ///
    /// Returns `false` if the span could not be located; `body` is then untouched.
    fn place(&self, body: &mut String, annotation: &Annotation, marker: &str) -> bool;
}

/// Replaces the first occurrence of the annotation's literal text.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteralMatcher;

impl CitationMatcher for LiteralMatcher {
    fn place(&self, body: &mut String, annotation: &Annotation, marker: &str) -> bool {
        if annotation.text.is_empty() {
            return false;
        }

        body.find(&annotation.text).is_some_and(|start| {
            body.replace_range(start..start + annotation.text.len(), marker);
            true
        })
    }
}

/// Uses the character offsets the service reports with each annotation.
///
/// Offsets refer to the original reply, so once an earlier marker changed
/// the text length they no longer line up; the span is then located by its
/// literal text instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct OffsetMatcher;

impl CitationMatcher for OffsetMatcher {
    fn place(&self, body: &mut String, annotation: &Annotation, marker: &str) -> bool {
        let span = annotation
            .start_index
            .zip(annotation.end_index)
            .and_then(|(start, end)| char_span(body, start, end))
            .filter(|span| body[span.clone()] == annotation.text);

        match span {
            Some(span) => {
                body.replace_range(span, marker);
                true
            }
            None => LiteralMatcher.place(body, annotation, marker),
        }
    }
}

/// Byte range of the characters `start..end` in `text`.
fn char_span(text: &str, start: usize, end: usize) -> Option<Range<usize>> {
    if start > end {
        return None;
    }
    let byte_at = |n: usize| {
        text.char_indices()
            .map(|(at, _)| at)
            .chain(std::iter::once(text.len()))
            .nth(n)
    };
    Some(byte_at(start)?..byte_at(end)?)
}

/// Inline marker for citation `index`.
#[must_use]
pub fn marker(index: usize) -> String {
    format!(" [{index}]")
}

/// Body followed by the citation footer, or the bare body if nothing was cited.
#[must_use]
pub fn render_answer(body: &str, citations: &[Citation]) -> String {
    if citations.is_empty() {
        return body.to_string();
    }

    let footer = citations
        .iter()
        .map(|c| format!("[{}] {}", c.index, c.display_name))
        .collect::<Vec<_>>()
        .join("\n");

    format!("{body}{FOOTER_SEPARATOR}{footer}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn citation(index: usize, name: &str) -> Citation {
        Citation {
            index,
            source_id: format!("file-{index}"),
            display_name: name.to_string(),
        }
    }

    #[test]
    fn literal_matcher_replaces_first_occurrence_only() {
        let mut body = "a 【4:0†source】 b 【4:0†source】".to_string();
        let annotation = Annotation::new("【4:0†source】", "file-1");

        assert!(LiteralMatcher.place(&mut body, &annotation, &marker(1)));
        assert_eq!(body, "a  [1] b 【4:0†source】");

        assert!(LiteralMatcher.place(&mut body, &annotation, &marker(2)));
        assert_eq!(body, "a  [1] b  [2]");
    }

    #[test]
    fn literal_matcher_leaves_body_when_missing() {
        let mut body = "nothing to see".to_string();

        assert!(!LiteralMatcher.place(&mut body, &Annotation::new("[cite:9]", "f"), " [1]"));
        assert!(!LiteralMatcher.place(&mut body, &Annotation::new("", "f"), " [1]"));
        assert_eq!(body, "nothing to see");
    }

    fn spanned(text: &str, start: usize, end: usize) -> Annotation {
        Annotation {
            start_index: Some(start),
            end_index: Some(end),
            ..Annotation::new(text, "file-1")
        }
    }

    #[test]
    fn offset_matcher_uses_reported_span() {
        let mut body = "ü [c] and [c]".to_string();

        assert!(OffsetMatcher.place(&mut body, &spanned("[c]", 10, 13), " [1]"));
        assert_eq!(body, "ü [c] and  [1]");
    }

    #[test]
    fn offset_matcher_falls_back_to_literal_text() {
        let mut body = "x [c] y".to_string();

        assert!(OffsetMatcher.place(&mut body, &spanned("[c]", 0, 3), " [1]"));
        assert_eq!(body, "x  [1] y");

        let mut body = "x [c] y".to_string();
        assert!(OffsetMatcher.place(&mut body, &spanned("[c]", 40, 43), " [1]"));
        assert_eq!(body, "x  [1] y");
    }

    #[test]
    fn render_without_citations_has_no_footer() {
        assert_eq!(render_answer("plain answer", &[]), "plain answer");
    }

    #[test]
    fn render_lists_citations_in_order() {
        let text = render_answer(
            "body [1] [2]",
            &[citation(1, "Paper.pdf"), citation(2, "tweet-42.md")],
        );
        assert_eq!(text, "body [1] [2]\n\n---\n[1] Paper.pdf\n[2] tweet-42.md");
    }
}
