//! Readwise highlight payloads and formatting rules.
//!
//! The delivery worker denormalizes each queued annotation into a
//! [`ReadwiseHighlight`] at send time, so the payload always reflects
//! the current tags and list memberships rather than the state at
//! enqueue time.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// The highlight export endpoint.
pub const READWISE_HIGHLIGHTS_URL: &str = "https://readwise.io/api/v2/highlights/";

/// One highlight as posted to the Readwise API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadwiseHighlight {
    /// Content title; falls back to the locator URL when no title is
    /// known.
    pub title: String,
    /// The content's full URL.
    pub source_url: String,
    /// Always `"article"` for this integration.
    pub source_type: String,
    /// ISO-8601 creation time.
    pub highlighted_at: String,
    /// Highlighted text, or a generated placeholder for pure notes.
    pub text: String,
    /// Combined note: tag markers plus the user's comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Always `"order"`.
    pub location_type: String,
    /// Ordering hint derived from the annotation selector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<i64>,
}

/// Formats epoch milliseconds as an ISO-8601 UTC string.
///
/// Timestamps outside chrono's representable range format as the
/// epoch; stored rows with garbage times must not abort a delivery.
pub fn iso8601_millis(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalizes a tag or list name for inclusion in a highlight note.
///
/// Internal whitespace becomes hyphens; Readwise treats whitespace as a
/// tag separator.
pub fn format_highlight_tag(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 1);
    out.push('.');
    let mut last_was_gap = false;
    for ch in name.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_gap {
                out.push('-');
            }
            last_was_gap = true;
        } else {
            out.push(ch);
            last_was_gap = false;
        }
    }
    out
}

/// Builds the note field from a comment and tag/list names.
///
/// Tags render first as `.name` markers, one space apart, then the
/// comment on its own line. Returns `None` when there is nothing to say.
pub fn format_highlight_note(comment: Option<&str>, tag_names: &[String]) -> Option<String> {
    let tags: Vec<String> = tag_names.iter().map(|t| format_highlight_tag(t)).collect();
    let comment = comment.map(str::trim).filter(|c| !c.is_empty());
    match (tags.is_empty(), comment) {
        (true, None) => None,
        (true, Some(c)) => Some(c.to_string()),
        (false, None) => Some(tags.join(" ")),
        (false, Some(c)) => Some(format!("{}\n{}", tags.join(" "), c)),
    }
}

/// Placeholder text for annotations with no highlighted body.
pub fn format_highlight_time(created_when_millis: i64) -> String {
    format!("Note created at {}", iso8601_millis(created_when_millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso8601_formatting() {
        assert_eq!(iso8601_millis(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(iso8601_millis(1_600_000_000_000), "2020-09-13T12:26:40.000Z");
    }

    #[test]
    fn unrepresentable_times_format_as_epoch() {
        assert_eq!(iso8601_millis(i64::MAX), "1970-01-01T00:00:00.000Z");
        assert_eq!(iso8601_millis(i64::MIN), "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn tag_whitespace_becomes_hyphens() {
        assert_eq!(format_highlight_tag("rust"), ".rust");
        assert_eq!(format_highlight_tag("deep work"), ".deep-work");
        assert_eq!(format_highlight_tag("a  spaced   tag"), ".a-spaced-tag");
        assert_eq!(format_highlight_tag(" padded "), ".padded");
    }

    #[test]
    fn note_composition() {
        assert_eq!(format_highlight_note(None, &[]), None);
        assert_eq!(
            format_highlight_note(Some("thoughts"), &[]),
            Some("thoughts".into())
        );
        assert_eq!(
            format_highlight_note(None, &["a".into(), "b c".into()]),
            Some(".a .b-c".into())
        );
        assert_eq!(
            format_highlight_note(Some("thoughts"), &["a".into()]),
            Some(".a\nthoughts".into())
        );
    }

    #[test]
    fn placeholder_text_embeds_time() {
        let text = format_highlight_time(0);
        assert!(text.contains("1970-01-01"));
    }

    #[test]
    fn highlight_serializes_without_empty_fields() {
        let highlight = ReadwiseHighlight {
            title: "A page".into(),
            source_url: "https://a.com".into(),
            source_type: "article".into(),
            highlighted_at: iso8601_millis(0),
            text: "quoted".into(),
            note: None,
            location_type: "order".into(),
            location: None,
        };
        let json = serde_json::to_value(&highlight).unwrap();
        assert!(json.get("note").is_none());
        assert!(json.get("location").is_none());
    }
}

#[cfg(test)]
mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Readwise treats whitespace as a tag separator, so a rendered
        // marker may never contain any.
        #[test]
        fn tag_markers_are_whitespace_free(name in "[ a-z-]{0,16}") {
            let tag = format_highlight_tag(&name);
            prop_assert!(tag.starts_with('.'));
            prop_assert!(!tag.chars().any(char::is_whitespace));
        }

        // Stored rows can carry any timestamp; formatting must produce
        // a UTC string for all of them.
        #[test]
        fn every_timestamp_formats_as_utc(millis in any::<i64>()) {
            prop_assert!(iso8601_millis(millis).ends_with('Z'));
        }
    }
}
