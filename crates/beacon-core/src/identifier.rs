//! Tracking identifier validation and composite-key parsing.
//!
//! Identifiers are opaque to the store, but senders commonly encode a
//! campaign and a recipient as `<campaign>-<recipient>`:
//!
//! | input          | campaign     | recipient |
//! |----------------|--------------|-----------|
//! | `camp1-x@a`    | `camp1`      | `x@a`     |
//! | `q3-news-bob`  | `q3`         | `news-bob`|
//! | `newsletter`   | `newsletter` | (none)    |
//! | `-x`           | (none)       | `x`       |
//!
//! The split happens at the first `-`. Everything here is a pure string
//! transform.

use serde::Serialize;
use std::fmt;

/// Longest identifier accepted by ingestion.
pub const MAX_IDENTIFIER_LEN: usize = 100;

/// Delimiter between the campaign and recipient components.
pub const COMPONENT_DELIMITER: char = '-';

/// Reasons an identifier is rejected at ingestion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier is {len} characters; the limit is {MAX_IDENTIFIER_LEN}")]
    TooLong { len: usize },
    #[error("identifier contains forbidden character {0:?}")]
    ForbiddenChar(char),
}

/// Check that `raw` is usable as a tracking identifier.
///
/// # Errors
///
/// Returns [`IdentifierError`] when the identifier is empty, longer than
/// [`MAX_IDENTIFIER_LEN`] characters, or contains `/` or a control character.
pub fn validate(raw: &str) -> Result<(), IdentifierError> {
    if raw.is_empty() {
        return Err(IdentifierError::Empty);
    }
    let len = raw.chars().count();
    if len > MAX_IDENTIFIER_LEN {
        return Err(IdentifierError::TooLong { len });
    }
    if let Some(bad) = raw.chars().find(|c| *c == '/' || c.is_control()) {
        return Err(IdentifierError::ForbiddenChar(bad));
    }
    Ok(())
}

/// Strip a trailing image extension from a pixel path segment.
///
/// `"camp1-x@a.png"` → `"camp1-x@a"`. Only `.png` and `.gif` are stripped.
#[must_use]
pub fn strip_image_suffix(segment: &str) -> &str {
    segment
        .strip_suffix(".png")
        .or_else(|| segment.strip_suffix(".gif"))
        .unwrap_or(segment)
}

/// A composite identifier split into its components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedIdentifier<'a> {
    /// Leading component, `None` when the identifier starts with the delimiter.
    pub campaign: Option<&'a str>,
    /// Trailing component, `None` when there is no delimiter.
    pub recipient: Option<&'a str>,
}

impl fmt::Display for ParsedIdentifier<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.campaign, self.recipient) {
            (Some(c), Some(r)) => write!(f, "{c} / {r}"),
            (Some(c), None) => f.write_str(c),
            (None, Some(r)) => write!(f, "(none) / {r}"),
            (None, None) => f.write_str("(none)"),
        }
    }
}

/// Split an identifier at the first [`COMPONENT_DELIMITER`].
#[must_use]
pub fn parse(identifier: &str) -> ParsedIdentifier<'_> {
    match identifier.split_once(COMPONENT_DELIMITER) {
        Some((campaign, recipient)) => ParsedIdentifier {
            campaign: non_empty(campaign),
            recipient: non_empty(recipient),
        },
        None => ParsedIdentifier {
            campaign: non_empty(identifier),
            recipient: None,
        },
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_at_first_delimiter() {
        let parsed = parse("camp1-x@a");
        assert_eq!(parsed.campaign, Some("camp1"));
        assert_eq!(parsed.recipient, Some("x@a"));

        let parsed = parse("q3-news-bob");
        assert_eq!(parsed.campaign, Some("q3"));
        assert_eq!(parsed.recipient, Some("news-bob"));
    }

    #[test]
    fn parse_without_delimiter_is_campaign_only() {
        let parsed = parse("newsletter");
        assert_eq!(parsed.campaign, Some("newsletter"));
        assert_eq!(parsed.recipient, None);
        assert_eq!(parsed.to_string(), "newsletter");
    }

    #[test]
    fn parse_leading_delimiter_has_no_campaign() {
        let parsed = parse("-x");
        assert_eq!(parsed.campaign, None);
        assert_eq!(parsed.recipient, Some("x"));
        assert_eq!(parsed.to_string(), "(none) / x");
    }

    #[test]
    fn validate_rejects_bad_identifiers() {
        assert_eq!(validate(""), Err(IdentifierError::Empty));
        assert_eq!(validate("a/b"), Err(IdentifierError::ForbiddenChar('/')));
        assert_eq!(validate("a\nb"), Err(IdentifierError::ForbiddenChar('\n')));
        let long = "x".repeat(MAX_IDENTIFIER_LEN + 1);
        assert_eq!(
            validate(&long),
            Err(IdentifierError::TooLong {
                len: MAX_IDENTIFIER_LEN + 1
            })
        );
        assert!(validate(&"x".repeat(MAX_IDENTIFIER_LEN)).is_ok());
        assert!(validate("camp1-x@a").is_ok());
    }

    #[test]
    fn strip_image_suffix_handles_png_and_gif_only() {
        assert_eq!(strip_image_suffix("camp1-x@a.png"), "camp1-x@a");
        assert_eq!(strip_image_suffix("abc.gif"), "abc");
        assert_eq!(strip_image_suffix("abc.jpg"), "abc.jpg");
        assert_eq!(strip_image_suffix("abc"), "abc");
    }
}
