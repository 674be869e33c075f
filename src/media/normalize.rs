//! Text normalization ahead of speech synthesis.
//!
//! Two passes exist. [`TextNormalizer::normalize`] runs on freshly extracted
//! document text: it flattens line breaks, collapses whitespace and bounds
//! the length. [`TextNormalizer::sanitize`] is the stricter pass applied right
//! before provider dispatch; it strips control, invisible and astral-plane
//! characters and replaces anything outside the [`CharPolicy`] with a space.

use std::ops::RangeInclusive;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ConversionError;

/// Appended to text that was cut at the length limit.
pub const TRUNCATION_MARKER: &str = "...";

static LINE_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n]+").expect("valid line break regex"));
static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Text that passed normalization: single-spaced, trimmed, non-empty and
/// bounded by the configured length (plus the truncation marker).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText(String);

impl NormalizedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    /// Short prefix for log lines.
    pub fn preview(&self, max_chars: usize) -> String {
        let mut preview: String = self.0.chars().take(max_chars).collect();
        if self.0.chars().count() > max_chars {
            preview.push_str(TRUNCATION_MARKER);
        }
        preview
    }
}

impl std::fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Allow-list of code point ranges the speech provider is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharPolicy {
    ranges: Vec<RangeInclusive<char>>,
}

impl CharPolicy {
    /// ASCII plus the CJK Unified Ideographs block the provider handles well.
    pub fn ascii_and_cjk() -> Self {
        Self {
            ranges: vec!['\u{0000}'..='\u{007F}', '\u{4E00}'..='\u{9FA5}'],
        }
    }

    /// Add more allowed ranges on top of the current ones.
    pub fn with_ranges(mut self, ranges: impl IntoIterator<Item = RangeInclusive<char>>) -> Self {
        self.ranges.extend(ranges);
        self
    }

    /// Whether `c` may be sent to the provider.
    pub fn allows(&self, c: char) -> bool {
        self.ranges.iter().any(|r| r.contains(&c))
    }

    /// Parse a comma separated list of hex code point ranges, e.g.
    /// `3040-30FF,AC00-D7A3`. A single value (`00E9`) allows one code point.
    pub fn parse_ranges(list: &str) -> Result<Vec<RangeInclusive<char>>, String> {
        list.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                let (start, end) = part.split_once('-').unwrap_or((part, part));
                let start = parse_code_point(start.trim())?;
                let end = parse_code_point(end.trim())?;
                if start > end {
                    return Err(format!("range {} is reversed", part));
                }
                Ok(start..=end)
            })
            .collect()
    }
}

impl Default for CharPolicy {
    fn default() -> Self {
        Self::ascii_and_cjk()
    }
}

fn parse_code_point(hex: &str) -> Result<char, String> {
    let hex = hex
        .trim_start_matches("U+")
        .trim_start_matches("u+")
        .trim_start_matches("0x");
    u32::from_str_radix(hex, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| format!("'{}' is not a valid code point", hex))
}

/// Zero-width and byte-order characters that some providers choke on.
fn is_invisible(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}')
}

/// Flattens, bounds and sanitizes document text.
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    max_length: usize,
    policy: CharPolicy,
}

impl TextNormalizer {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            policy: CharPolicy::default(),
        }
    }

    pub fn with_char_policy(mut self, policy: CharPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Normalize raw document text.
    ///
    /// Line breaks become spaces, whitespace runs collapse to one space and
    /// the ends are trimmed. Text longer than the limit is cut to exactly
    /// `max_length` characters followed by [`TRUNCATION_MARKER`].
    pub fn normalize(&self, raw: &str) -> Result<NormalizedText, ConversionError> {
        let flattened = LINE_BREAKS.replace_all(raw, " ");
        let collapsed = WHITESPACE_RUNS.replace_all(&flattened, " ");
        let trimmed = collapsed.trim();

        if trimmed.is_empty() {
            return Err(ConversionError::EmptyContent);
        }

        if trimmed.chars().count() > self.max_length {
            let mut truncated: String = trimmed.chars().take(self.max_length).collect();
            truncated.push_str(TRUNCATION_MARKER);
            return Ok(NormalizedText(truncated));
        }

        Ok(NormalizedText(trimmed.to_string()))
    }

    /// Strict pass run immediately before provider dispatch.
    ///
    /// Fails with [`ConversionError::EmptyContent`] when nothing speakable is
    /// left; the text is never replaced with placeholder content.
    pub fn sanitize(&self, text: &NormalizedText) -> Result<NormalizedText, ConversionError> {
        let mut cleaned = String::with_capacity(text.0.len());
        for c in text.0.chars() {
            match c {
                '\u{2028}' | '\u{2029}' => cleaned.push(' '),
                c if c.is_whitespace() => cleaned.push(' '),
                c if c.is_control() || is_invisible(c) => {}
                // Outside the BMP: encoded as a surrogate pair, mostly emoji.
                c if u32::from(c) > 0xFFFF => {}
                c if !self.policy.allows(c) => cleaned.push(' '),
                c => cleaned.push(c),
            }
        }

        let collapsed = WHITESPACE_RUNS.replace_all(&cleaned, " ");
        let trimmed = collapsed.trim();
        if trimmed.is_empty() {
            return Err(ConversionError::EmptyContent);
        }
        Ok(NormalizedText(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn normalizer() -> TextNormalizer {
        TextNormalizer::new(5000)
    }

    #[test]
    fn test_line_breaks_and_spaces_collapse() {
        let text = normalizer()
            .normalize("Hello\r\n\r\n  world\n\nagain\t\tand again  ")
            .unwrap();
        assert_eq!(text.as_str(), "Hello world again and again");
    }

    #[test]
    fn test_whitespace_only_is_empty() {
        for raw in ["", "   ", "\n\n\r\n", " \t \n "] {
            assert!(matches!(
                normalizer().normalize(raw),
                Err(ConversionError::EmptyContent)
            ));
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let n = normalizer();
        let once = n.normalize("  some   text\nwith\n\nbreaks ").unwrap();
        let twice = n.normalize(once.as_str()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_truncation_appends_marker() {
        let n = TextNormalizer::new(10);
        let text = n.normalize(&"abcdefghij".repeat(5)).unwrap();
        assert_eq!(text.char_len(), 10 + TRUNCATION_MARKER.chars().count());
        assert!(text.as_str().ends_with(TRUNCATION_MARKER));
        assert_eq!(text.as_str(), "abcdefghij...");
    }

    #[test]
    fn test_truncation_counts_characters_not_bytes() {
        let n = TextNormalizer::new(3);
        let text = n.normalize("你好世界再见").unwrap();
        assert_eq!(text.as_str(), "你好世...");
    }

    #[test]
    fn test_text_at_limit_is_untouched() {
        let n = TextNormalizer::new(5);
        assert_eq!(n.normalize("abcde").unwrap().as_str(), "abcde");
    }

    #[test]
    fn test_sanitize_strips_controls_and_invisibles() {
        let n = normalizer();
        let text = NormalizedText("a\u{0007}b\u{200B}c\u{FEFF}d\u{009B}e".to_string());
        assert_eq!(n.sanitize(&text).unwrap().as_str(), "abcde");
    }

    #[test]
    fn test_sanitize_replaces_line_separators() {
        let n = normalizer();
        let text = NormalizedText("one\u{2028}two\u{2029}three".to_string());
        assert_eq!(n.sanitize(&text).unwrap().as_str(), "one two three");
    }

    #[test]
    fn test_sanitize_drops_emoji() {
        let n = normalizer();
        let text = NormalizedText("good 😀 morning 🎉".to_string());
        assert_eq!(n.sanitize(&text).unwrap().as_str(), "good morning");
    }

    #[test]
    fn test_sanitize_keeps_ascii_and_cjk() {
        let n = normalizer();
        let text = NormalizedText("Hello, 世界! 1+1=2".to_string());
        assert_eq!(n.sanitize(&text).unwrap().as_str(), "Hello, 世界! 1+1=2");
    }

    #[test]
    fn test_sanitize_replaces_disallowed_script() {
        let n = normalizer();
        let text = NormalizedText("abc こんにちは def".to_string());
        assert_eq!(n.sanitize(&text).unwrap().as_str(), "abc def");
    }

    #[test]
    fn test_sanitize_honours_extra_ranges() {
        let policy = CharPolicy::default().with_ranges(['\u{3040}'..='\u{30FF}']);
        let n = normalizer().with_char_policy(policy);
        let text = NormalizedText("abc こんにちは".to_string());
        assert_eq!(n.sanitize(&text).unwrap().as_str(), "abc こんにちは");
    }

    #[test]
    fn test_sanitize_emptied_text_fails_explicitly() {
        let n = normalizer();
        let text = NormalizedText("😀🎉 Привет".to_string());
        assert!(matches!(
            n.sanitize(&text),
            Err(ConversionError::EmptyContent)
        ));
    }

    #[test]
    fn test_parse_ranges() {
        let ranges = CharPolicy::parse_ranges("3040-30FF, AC00-D7A3,00E9").unwrap();
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0], '\u{3040}'..='\u{30FF}');
        assert_eq!(ranges[2], '\u{00E9}'..='\u{00E9}');
    }

    #[test]
    fn test_parse_ranges_rejects_garbage() {
        assert!(CharPolicy::parse_ranges("zz-30FF").is_err());
        assert!(CharPolicy::parse_ranges("30FF-3040").is_err());
        assert!(CharPolicy::parse_ranges("D800").is_err());
    }

    #[test]
    fn test_preview() {
        let text = NormalizedText("abcdefgh".to_string());
        assert_eq!(text.preview(3), "abc...");
        assert_eq!(text.preview(20), "abcdefgh");
    }
}
