//! Text Normalizer (component A): clean submitted text, pick an encoding,
//! and split into wire-safe segments without breaking a grapheme cluster.

use crate::model::Encoding;
use unicode_segmentation::UnicodeSegmentation;

const GSM7_BASIC: &str =
    "@£$¥èéùìòÇ\nØø\rÅåΔ_ΦΓΛΩΠΨΣΘΞ\x1bÆæßÉ !\"#¤%&'()*+,-./0123456789:;<=>?\
     ¡ABCDEFGHIJKLMNOPQRSTUVWXYZÄÖÑÜ§¿abcdefghijklmnopqrstuvwxyzäöñüà";
const GSM7_EXTENDED: &str = "^{}\\[~]|€";

fn is_gsm7_basic(c: char) -> bool {
    GSM7_BASIC.contains(c)
}

fn is_gsm7_extended(c: char) -> bool {
    GSM7_EXTENDED.contains(c)
}

fn is_emoji(c: char) -> bool {
    let cp = c as u32;
    matches!(cp,
        0x1F300..=0x1F5FF
        | 0x1F600..=0x1F64F
        | 0x1F680..=0x1F6FF
        | 0x1F900..=0x1F9FF
        | 0x2600..=0x26FF
        | 0x2700..=0x27BF
    )
}

fn is_kept_punct(c: char) -> bool {
    ".,!?;:'\"-()[]{}".contains(c)
}

fn is_surrogate_half(c: char) -> bool {
    // Rust `char` can never actually hold a lone surrogate; this check
    // exists for inputs decoded leniently upstream (e.g. WTF-8 sources)
    // and is kept for the invariant's sake even though it is presently dead
    // on well-formed `&str` input.
    let cp = c as u32;
    (0xD800..=0xDFFF).contains(&cp)
}

fn is_dropped_control(c: char) -> bool {
    let cp = c as u32;
    c == '\0'
        || c == '\u{1b}'
        || c == '\u{7f}'
        || (cp < 0x20 && c != '\n' && c != '\r' && c != '\t')
}

fn smart_punct_replacement(c: char) -> Option<&'static str> {
    match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' => Some("'"),
        '\u{201C}' | '\u{201D}' => Some("\""),
        '\u{2013}' | '\u{2014}' => Some("-"),
        '\u{2026}' => Some("..."),
        _ => None,
    }
}

/// Clean a raw submitted string per the five cleaning rules, in order.
/// Idempotent: `clean(clean(s)) == clean(s)`.
pub fn clean(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if is_dropped_control(c) || is_surrogate_half(c) {
            continue;
        }
        if let Some(repl) = smart_punct_replacement(c) {
            out.push_str(repl);
            continue;
        }
        if c.is_alphanumeric() || c.is_whitespace() || is_kept_punct(c) || is_emoji(c) {
            out.push(c);
            continue;
        }
        // rule 5: anything else is dropped, not substituted
    }
    out
}

/// True iff every codepoint of `s` is in the GSM-03.38 basic or extended set.
pub fn is_gsm7_compatible(s: &str) -> bool {
    s.chars().all(|c| is_gsm7_basic(c) || is_gsm7_extended(c))
}

pub fn choose_encoding(s: &str) -> Encoding {
    if s.is_ascii() {
        Encoding::Ascii
    } else if is_gsm7_compatible(s) {
        Encoding::Gsm7
    } else {
        Encoding::Ucs2
    }
}

/// `DataCoding=0` resolution (open question): inspect the payload bytes; if
/// every byte is plain ASCII treat as ASCII, otherwise UCS-2.
pub fn inspect_data_coding_zero(s: &str) -> Encoding {
    if s.is_ascii() {
        Encoding::Ascii
    } else {
        Encoding::Ucs2
    }
}

/// A normalized message split into wire-ready segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    pub encoding: Encoding,
    pub segments: Vec<String>,
}

/// Normalize and segment `raw`, budgeting `gsm7_limit` codepoints per segment
/// for GSM-7/ASCII text and `ucs2_limit` UTF-16 code units per segment for
/// UCS-2 text. Never splits a grapheme cluster.
pub fn normalize(raw: &str, gsm7_limit: usize, ucs2_limit: usize) -> Normalized {
    let text = clean(raw);
    let encoding = choose_encoding(&text);
    let limit = match encoding {
        Encoding::Gsm7 | Encoding::Ascii => gsm7_limit,
        Encoding::Ucs2 => ucs2_limit,
    };
    let segments = segment(&text, encoding, limit);
    Normalized {
        text,
        encoding,
        segments,
    }
}

fn grapheme_unit_cost(g: &str, encoding: Encoding) -> usize {
    match encoding {
        Encoding::Gsm7 => g.chars().map(gsm7_char_cost).sum(),
        Encoding::Ascii => g.chars().count(),
        Encoding::Ucs2 => g.encode_utf16().count(),
    }
}

fn gsm7_char_cost(c: char) -> usize {
    if is_gsm7_extended(c) {
        2
    } else {
        1
    }
}

fn segment(text: &str, encoding: Encoding, limit: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }
    let limit = limit.max(1);
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for g in text.graphemes(true) {
        let cost = grapheme_unit_cost(g, encoding);
        if current_len + cost > limit && !current.is_empty() {
            segments.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(g);
        current_len += cost;
    }
    if !current.is_empty() || segments.is_empty() {
        segments.push(current);
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_control_and_surrogate_style_chars() {
        let cleaned = clean("hi\0there\u{1b}end\u{7f}");
        assert_eq!(cleaned, "hithereend");
    }

    #[test]
    fn keeps_lf_cr_tab() {
        let cleaned = clean("a\nb\rc\td");
        assert_eq!(cleaned, "a\nb\rc\td");
    }

    #[test]
    fn replaces_smart_punctuation() {
        let cleaned = clean("\u{2018}hi\u{2019} \u{2014} bye\u{2026}");
        assert_eq!(cleaned, "'hi' - bye...");
    }

    #[test]
    fn keeps_emoji_ranges() {
        let cleaned = clean("hello \u{1F600} world");
        assert!(cleaned.contains('\u{1F600}'));
    }

    #[test]
    fn is_idempotent() {
        let raw = "H\u{e9}llo \u{1F600} \u{2018}world\u{2019}\0";
        let once = clean(raw);
        let twice = clean(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn gsm7_ascii_text_chooses_gsm7() {
        assert_eq!(choose_encoding("Hello world!"), Encoding::Ascii);
        assert_eq!(choose_encoding("H\u{e9}llo"), Encoding::Gsm7);
    }

    #[test]
    fn non_gsm7_text_chooses_ucs2() {
        assert_eq!(choose_encoding("hello \u{1F600}"), Encoding::Ucs2);
    }

    #[test]
    fn single_segment_for_short_gsm7_text() {
        let n = normalize("Hello world!", 160, 70);
        assert_eq!(n.segments.len(), 1);
        assert_eq!(n.encoding, Encoding::Ascii);
    }

    #[test]
    fn splits_long_ucs2_text_without_breaking_graphemes() {
        let raw = "h\u{e9}llo \u{1F600} ".repeat(40);
        let n = normalize(&raw, 160, 70);
        assert_eq!(n.encoding, Encoding::Ucs2);
        assert!(n.segments.len() >= 2);
        for seg in &n.segments {
            assert!(seg.encode_utf16().count() <= 70);
        }
        assert_eq!(n.segments.concat(), n.text);
    }

    #[test]
    fn data_coding_zero_inspects_payload() {
        assert_eq!(inspect_data_coding_zero("plain ascii"), Encoding::Ascii);
        assert_eq!(inspect_data_coding_zero("caf\u{e9}"), Encoding::Ucs2);
    }
}
