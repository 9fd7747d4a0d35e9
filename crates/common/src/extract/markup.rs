//! Hyperlink markup parsing
//!
//! Paragraph markup embeds links as `<a href="Percent%20Encoded%20Title">anchor</a>`.
//! Stripping the tags (and unescaping HTML entities) yields plain text;
//! every anchor is recorded with its byte span in that plain text.

use crate::corpus::normalize_document_id;
use percent_encoding::percent_decode_str;
use regex_lite::Regex;
use std::sync::OnceLock;

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?s)<a\s+href\s*=\s*"([^"]*)"\s*>(.*?)</a>"#)
            .expect("link pattern is a valid regex")
    })
}

/// An anchor found in markup, spanned against the stripped text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupLink {
    /// Normalized target document id
    pub target: String,
    pub anchor: String,
    pub start: usize,
    pub end: usize,
}

/// Markup with its tags removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrippedMarkup {
    pub text: String,
    pub links: Vec<MarkupLink>,
    /// Links dropped for an empty target or anchor
    pub dropped: usize,
}

/// Strip link tags, recording anchor spans
pub fn strip_links(markup: &str) -> StrippedMarkup {
    let mut out = StrippedMarkup::default();
    let mut last = 0;

    for caps in link_pattern().captures_iter(markup) {
        let (Some(whole), Some(href), Some(inner)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        out.text.push_str(&unescape_entities(&markup[last..whole.start()]));
        last = whole.end();

        let anchor = unescape_entities(inner.as_str());
        let start = out.text.len();
        out.text.push_str(&anchor);
        let end = out.text.len();

        let target = decode_target(href.as_str());
        if target.is_empty() || start == end {
            out.dropped += 1;
            continue;
        }
        out.links.push(MarkupLink {
            target,
            anchor,
            start,
            end,
        });
    }

    out.text.push_str(&unescape_entities(&markup[last..]));
    out
}

/// Percent-decode and unescape an href into a document id
pub fn decode_target(href: &str) -> String {
    let decoded = percent_decode_str(href).decode_utf8_lossy();
    let unescaped = unescape_entities(&decoded);
    normalize_document_id(unescaped.trim())
}

fn unescape_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_links() {
        let markup = r#"<a href="Barack%20Obama">Obama</a> was born in <a href="Honolulu">Honolulu</a>, Hawaii."#;
        let stripped = strip_links(markup);
        assert_eq!(stripped.text, "Obama was born in Honolulu, Hawaii.");
        assert_eq!(stripped.links.len(), 2);

        let first = &stripped.links[0];
        assert_eq!(first.target, "Barack Obama");
        assert_eq!(&stripped.text[first.start..first.end], "Obama");
        let second = &stripped.links[1];
        assert_eq!(&stripped.text[second.start..second.end], "Honolulu");
    }

    #[test]
    fn test_target_decoding() {
        assert_eq!(decode_target("AT%26T"), "AT&T");
        assert_eq!(decode_target("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(decode_target("Beyonc%C3%A9"), "Beyonce\u{301}");
    }

    #[test]
    fn test_entities_unescaped_in_text_and_anchors() {
        let stripped = strip_links(r#"<a href="AT%26T">AT&amp;T</a> &amp; friends"#);
        assert_eq!(stripped.text, "AT&T & friends");
        let link = &stripped.links[0];
        assert_eq!(link.anchor, "AT&T");
        assert_eq!(link.target, "AT&T");
        assert_eq!(&stripped.text[link.start..link.end], "AT&T");
    }

    #[test]
    fn test_empty_links_dropped() {
        let stripped = strip_links(r#"See <a href="">here</a> and <a href="X"></a>."#);
        assert_eq!(stripped.text, "See here and .");
        assert!(stripped.links.is_empty());
        assert_eq!(stripped.dropped, 2);
    }

    #[test]
    fn test_multibyte_spans() {
        let stripped = strip_links(r#"Café in <a href="Z%C3%BCrich">Zürich</a>"#);
        let link = &stripped.links[0];
        assert_eq!(&stripped.text[link.start..link.end], "Zürich");
        assert_eq!(link.target, "Zu\u{308}rich");
    }
}
