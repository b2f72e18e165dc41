//! Text cleaning and analysis for crawled content
//!
//! Raw page text arrives percent-encoded, entity-escaped, tag-ridden, and
//! full of irregular whitespace. [`TextProcessor`] normalizes it into the
//! form the chunking and embedding stages expect, and extracts the light
//! metadata (counts, URLs, e-mail addresses) stored alongside each
//! document.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static HTML_TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]+>").expect("HTML_TAG_REGEX should compile - this is a bug"));

static WHITESPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("WHITESPACE_REGEX should compile - this is a bug"));

static SENTENCE_SPLIT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+").expect("SENTENCE_SPLIT_REGEX should compile - this is a bug"));

static URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://(?:[a-zA-Z]|[0-9]|[$-_@.&+]|[!*(),]|(?:%[0-9a-fA-F]{2}))+")
        .expect("URL_REGEX should compile - this is a bug")
});

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
        .expect("EMAIL_REGEX should compile - this is a bug")
});

/// Metadata extracted from a piece of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMetadata {
    pub character_count: usize,
    pub word_count: usize,
    pub sentence_count: usize,
    /// URLs found in the text, in order of appearance
    pub urls: Vec<String>,
    /// E-mail addresses found in the text, in order of appearance
    pub emails: Vec<String>,
}

/// Text cleaning and normalization
///
/// Each cleaning stage can be toggled off for content that is already
/// partially processed (e.g. tag-stripped output from a headless browser).
#[derive(Debug, Clone)]
pub struct TextProcessor {
    normalize_whitespace: bool,
    remove_html: bool,
    decode_entities: bool,
}

impl Default for TextProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextProcessor {
    /// Create a processor with all cleaning stages enabled
    pub fn new() -> Self {
        Self { normalize_whitespace: true, remove_html: true, decode_entities: true }
    }

    /// Toggle whitespace collapsing
    pub fn normalize_whitespace(mut self, enabled: bool) -> Self {
        self.normalize_whitespace = enabled;
        self
    }

    /// Toggle HTML tag removal
    pub fn remove_html(mut self, enabled: bool) -> Self {
        self.remove_html = enabled;
        self
    }

    /// Toggle HTML entity decoding
    pub fn decode_entities(mut self, enabled: bool) -> Self {
        self.decode_entities = enabled;
        self
    }

    /// Clean and normalize text content.
    ///
    /// Stages, in order: percent-decoding, entity decoding, tag removal,
    /// whitespace collapsing, trim.
    pub fn clean(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mut text = match urlencoding::decode(text) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => text.to_string(),
        };

        if self.decode_entities {
            text = decode_html_entities(&text);
        }

        if self.remove_html {
            text = HTML_TAG_REGEX.replace_all(&text, " ").into_owned();
        }

        if self.normalize_whitespace {
            text = WHITESPACE_REGEX.replace_all(&text, " ").into_owned();
        }

        text.trim().to_string()
    }

    /// Split text into sentences on terminal punctuation
    pub fn sentences(&self, text: &str) -> Vec<String> {
        SENTENCE_SPLIT_REGEX
            .split(text)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Extract metadata from text content
    pub fn metadata(&self, text: &str) -> TextMetadata {
        TextMetadata {
            character_count: text.chars().count(),
            word_count: text.split_whitespace().count(),
            sentence_count: self.sentences(text).len(),
            urls: URL_REGEX.find_iter(text).map(|m| m.as_str().to_string()).collect(),
            emails: EMAIL_REGEX.find_iter(text).map(|m| m.as_str().to_string()).collect(),
        }
    }

    /// Truncate text to at most `max_length` characters.
    ///
    /// With `preserve_words`, the cut moves back to the last word boundary
    /// as long as that keeps at least 80% of the budget; otherwise the text
    /// is cut hard with a trailing ellipsis.
    pub fn truncate(&self, text: &str, max_length: usize, preserve_words: bool) -> String {
        if text.chars().count() <= max_length {
            return text.to_string();
        }

        let cut = char_boundary(text, max_length);
        if preserve_words {
            let truncated = &text[..cut];
            if let Some(last_space) = truncated.rfind(' ') {
                let kept = truncated[..last_space].chars().count();
                if kept * 10 >= max_length * 8 {
                    return format!("{}...", &truncated[..last_space]);
                }
            }
        }

        let hard_cut = char_boundary(text, max_length.saturating_sub(3));
        format!("{}...", &text[..hard_cut])
    }
}

/// Byte offset of the `chars`-th character, clamped to the end of `text`.
fn char_boundary(text: &str, chars: usize) -> usize {
    text.char_indices().nth(chars).map_or(text.len(), |(offset, _)| offset)
}

/// Decode the HTML entities that commonly survive in crawled text.
///
/// `&amp;` is decoded last so that double-escaped input is not decoded
/// twice.
fn decode_html_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_strips_tags_and_collapses_whitespace() {
        let processor = TextProcessor::new();
        let cleaned = processor.clean("<p>Hello   <b>world</b></p>\n\n<div>again</div>");
        assert_eq!(cleaned, "Hello world again");
    }

    #[test]
    fn test_clean_decodes_entities() {
        let processor = TextProcessor::new();
        // Decoding runs before tag removal, so a decoded <tasty> is stripped
        assert_eq!(processor.clean("fish &amp; chips &lt;tasty&gt;"), "fish & chips");
        assert_eq!(processor.clean("it&#39;s&nbsp;here"), "it's here");
    }

    #[test]
    fn test_clean_decodes_percent_encoding() {
        let processor = TextProcessor::new();
        assert_eq!(processor.clean("hello%20world"), "hello world");
    }

    #[test]
    fn test_clean_empty_input() {
        let processor = TextProcessor::new();
        assert_eq!(processor.clean(""), "");
    }

    #[test]
    fn test_clean_stages_can_be_disabled() {
        let processor = TextProcessor::new().remove_html(false).normalize_whitespace(false);
        let cleaned = processor.clean("<p>keep  tags</p>");
        assert_eq!(cleaned, "<p>keep  tags</p>");
    }

    #[test]
    fn test_sentences() {
        let processor = TextProcessor::new();
        let sentences = processor.sentences("First one. Second one! Third?? ");
        assert_eq!(sentences, vec!["First one", "Second one", "Third"]);
    }

    #[test]
    fn test_metadata_counts_and_extraction() {
        let processor = TextProcessor::new();
        let text = "Contact admin@example.com about https://example.com/docs today. Thanks!";
        let metadata = processor.metadata(text);

        assert_eq!(metadata.word_count, 6);
        // Dots inside the e-mail address and URL also split sentences
        assert_eq!(metadata.sentence_count, 4);
        assert_eq!(metadata.character_count, text.chars().count());
        assert_eq!(metadata.emails, vec!["admin@example.com".to_string()]);
        assert_eq!(metadata.urls.len(), 1);
        assert!(metadata.urls[0].starts_with("https://example.com/docs"));
    }

    #[test]
    fn test_truncate_short_text_unchanged() {
        let processor = TextProcessor::new();
        assert_eq!(processor.truncate("short", 10, true), "short");
    }

    #[test]
    fn test_truncate_preserves_word_boundary() {
        let processor = TextProcessor::new();
        let truncated = processor.truncate("The quick brown fox jumps over", 20, true);
        assert_eq!(truncated, "The quick brown fox...");
    }

    #[test]
    fn test_truncate_hard_cut_without_usable_boundary() {
        let processor = TextProcessor::new();
        let truncated = processor.truncate("abcdefghijklmnop", 10, true);
        assert_eq!(truncated, "abcdefg...");
    }

    #[test]
    fn test_truncate_is_char_boundary_safe() {
        let processor = TextProcessor::new();
        let truncated = processor.truncate("éééééééééé", 5, false);
        assert_eq!(truncated, "éé...");
    }
}
