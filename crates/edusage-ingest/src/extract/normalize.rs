//! Text cleaning for extracted and recognized text.

use once_cell::sync::Lazy;
use regex::Regex;

static HORIZONTAL_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\S\n]+").unwrap());
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n\s*").unwrap());

/// Arabic, Arabic Supplement, Arabic Extended-A and the presentation forms.
pub fn is_arabic(c: char) -> bool {
    matches!(c,
        '\u{0600}'..='\u{06FF}'
        | '\u{0750}'..='\u{077F}'
        | '\u{08A0}'..='\u{08FF}'
        | '\u{FB50}'..='\u{FDFF}'
        | '\u{FE70}'..='\u{FEFF}')
}

/// ASCII plus the accented Latin blocks.
pub fn is_latin(c: char) -> bool {
    c.is_ascii() || matches!(c, '\u{00C0}'..='\u{024F}')
}

pub fn is_permitted(c: char) -> bool {
    is_latin(c) || is_arabic(c)
}

/// Strip control characters and collapse whitespace, keeping paragraph breaks.
pub fn clean_text(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter_map(|c| match c {
            '\n' => Some('\n'),
            // pdf-extract emits form feeds between pages.
            '\u{000C}' => Some('\n'),
            '\t' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();

    let collapsed = HORIZONTAL_SPACE.replace_all(&stripped, " ");
    let trimmed_lines = collapsed.lines().map(str::trim).collect::<Vec<_>>().join("\n");
    BLANK_LINES
        .replace_all(&trimmed_lines, "\n\n")
        .trim()
        .to_string()
}

/// Clean recognized text and drop characters outside the Latin/Arabic ranges.
pub fn normalize_ocr_text(raw: &str) -> String {
    let permitted: String = raw
        .chars()
        .filter(|c| is_permitted(*c) || c.is_whitespace())
        .collect();
    clean_text(&permitted)
}

/// Characters that carry content, i.e. everything but whitespace.
pub fn usable_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}
