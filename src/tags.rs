//! Hashtag normalization and URL byte-offset extraction.

use std::sync::OnceLock;

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

/// A normalized, deduplicated, lexicographically ordered set of tags.
///
/// Built from free-form operator input. Two renderings exist: the raw
/// ordered token list (for networks with a first-class tag field) and a
/// hashtag line (for networks that embed tags in body text). Parsing the
/// hashtag line back reproduces the same set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    tokens: Vec<String>,
}

impl TagSet {
    /// Parse free-form input: split on whitespace, strip leading `#` and
    /// trailing `,` from every token, dedup, sort.
    pub fn parse(input: &str) -> Self {
        let mut tokens: Vec<String> = input
            .split_whitespace()
            .map(|word| word.trim_start_matches('#').trim_end_matches(',').to_string())
            .filter(|word| !word.is_empty())
            .collect();
        tokens.sort();
        tokens.dedup();
        Self { tokens }
    }

    /// The ordered unique tokens — the hidden/raw rendering.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Inline rendering: `#one, #two, #three`.
    pub fn hashtag_line(&self) -> String {
        self.tokens
            .iter()
            .map(|t| format!("#{t}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// A URL found in post text, with byte offsets into the UTF-8 encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlSpan {
    pub url: String,
    /// Byte offset of the first byte of the match.
    pub start: usize,
    /// Byte offset one past the last byte of the match.
    pub end: usize,
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"https?://[^ \n\r\t]*").unwrap())
}

/// Find every `http(s)://` substring bounded by whitespace and return its
/// literal text plus start/end byte offsets.
///
/// Rich-text annotation on Bluesky addresses spans by byte offset, not
/// character index, so matching runs over the UTF-8 bytes directly.
pub fn url_byte_spans(text: &str) -> Vec<UrlSpan> {
    url_pattern()
        .find_iter(text.as_bytes())
        .filter_map(|m| {
            let url = std::str::from_utf8(m.as_bytes()).ok()?;
            Some(UrlSpan {
                url: url.to_string(),
                start: m.start(),
                end: m.end(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── TagSet ──────────────────────────────────────────────────────

    #[test]
    fn parse_strips_hashes_and_commas() {
        let tags = TagSet::parse("#cat, #dog #bird,");
        assert_eq!(tags.tokens(), &["bird", "cat", "dog"]);
    }

    #[test]
    fn parse_dedups_and_sorts() {
        let tags = TagSet::parse("zebra cat #cat zebra");
        assert_eq!(tags.tokens(), &["cat", "zebra"]);
    }

    #[test]
    fn parse_empty_input() {
        let tags = TagSet::parse("   ");
        assert!(tags.is_empty());
        assert_eq!(tags.hashtag_line(), "");
    }

    #[test]
    fn parse_bare_hash_dropped() {
        let tags = TagSet::parse("# cat #,");
        assert_eq!(tags.tokens(), &["cat"]);
    }

    #[test]
    fn hashtag_line_rendering() {
        let tags = TagSet::parse("#cat #dog");
        assert_eq!(tags.hashtag_line(), "#cat, #dog");
    }

    #[test]
    fn reparse_hashtag_line_is_idempotent() {
        let tags = TagSet::parse("#dog, #cat art #art");
        let reparsed = TagSet::parse(&tags.hashtag_line());
        assert_eq!(tags, reparsed);
    }

    // ── URL byte spans ──────────────────────────────────────────────

    #[test]
    fn url_span_ascii() {
        let spans = url_byte_spans("see http://a.io here");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].url, "http://a.io");
        assert_eq!(spans[0].start, 4);
        assert_eq!(spans[0].end, 4 + "http://a.io".len());
    }

    #[test]
    fn url_span_reslices_exactly() {
        let text = "see http://a.io here";
        let spans = url_byte_spans(text);
        let span = &spans[0];
        assert_eq!(&text.as_bytes()[span.start..span.end], span.url.as_bytes());
        assert_eq!(span.end - span.start, span.url.len());
    }

    #[test]
    fn url_span_after_multibyte_text() {
        // "Привет " is 13 bytes in UTF-8 (6 two-byte chars + space), not 7.
        let text = "Привет https://example.com/страница end";
        let spans = url_byte_spans(text);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, "Привет ".len());
        assert_eq!(
            &text.as_bytes()[spans[0].start..spans[0].end],
            spans[0].url.as_bytes()
        );
    }

    #[test]
    fn url_spans_adjacent_not_merged() {
        let text = "https://a.io\nhttps://b.io";
        let spans = url_byte_spans(text);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].url, "https://a.io");
        assert_eq!(spans[1].url, "https://b.io");
        assert_eq!(spans[1].start, spans[0].end + 1);
    }

    #[test]
    fn url_spans_none_in_plain_text() {
        assert!(url_byte_spans("no links here").is_empty());
    }

    #[test]
    fn url_span_https_and_http() {
        let spans = url_byte_spans("http://x.io and https://y.io");
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].url, "http://x.io");
        assert_eq!(spans[1].url, "https://y.io");
    }
}
