//! Language detection and grade inference.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::extract::normalize::is_arabic;
use edusage_core::Language;

/// Arabic share of letters above which a document counts as Arabic.
const ARABIC_RATIO: f64 = 0.3;

/// Document-level language from the Arabic share of all letters.
///
/// Never returns `Mixed`; that label is reserved for chunks.
pub fn detect_language(text: &str) -> Language {
    let mut arabic = 0usize;
    let mut latin = 0usize;
    for c in text.chars().filter(|c| c.is_alphabetic()) {
        if is_arabic(c) {
            arabic += 1;
        } else if c.is_ascii_alphabetic() {
            latin += 1;
        }
    }
    let letters = arabic + latin;
    if letters == 0 {
        Language::Unknown
    } else if arabic as f64 / letters as f64 > ARABIC_RATIO {
        Language::Arabic
    } else {
        Language::English
    }
}

/// Chunk-level language from the presence of Arabic and Latin letters.
pub fn chunk_language(text: &str) -> Language {
    let has_arabic = text.chars().any(|c| ('\u{0600}'..='\u{06FF}').contains(&c));
    let has_latin = text.chars().any(|c| c.is_ascii_alphabetic());
    match (has_arabic, has_latin) {
        (true, true) => Language::Mixed,
        (true, false) => Language::Arabic,
        (false, true) => Language::English,
        (false, false) => Language::Unknown,
    }
}

static GRADE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:الصف|ص)\s*([0-9٠-٩]{1,2})").unwrap());
static GRADE_ENGLISH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)grade[\s_-]*([0-9]{1,2})(?:\D|$)").unwrap());

/// Arabic ordinals, compound forms first so "الثاني عشر" wins over "الثاني".
const ORDINALS: &[(&str, u8)] = &[
    ("الحادي عشر", 11),
    ("الثاني عشر", 12),
    ("الأول", 1),
    ("الثاني", 2),
    ("الثالث", 3),
    ("الرابع", 4),
    ("الخامس", 5),
    ("السادس", 6),
    ("السابع", 7),
    ("الثامن", 8),
    ("التاسع", 9),
    ("العاشر", 10),
];

/// Infer a grade (1-12) from a file name such as `رياضيات ص ٥.pdf`,
/// `الصف الثالث - علوم.pdf` or `Grade 7 Science.pdf`.
pub fn infer_grade_level(file_name: &str) -> Option<u8> {
    let numeric = GRADE_NUMBER
        .captures(file_name)
        .or_else(|| GRADE_ENGLISH.captures(file_name))
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_digits(m.as_str()));

    let grade = numeric.or_else(|| {
        let idx = file_name.find("الصف")?;
        let rest = &file_name[idx + "الصف".len()..];
        ORDINALS
            .iter()
            .find(|(word, _)| rest.trim_start().starts_with(word))
            .map(|(_, g)| *g)
    })?;

    (1..=12).contains(&grade).then_some(grade)
}

/// Parse Western or Arabic-Indic digits.
fn parse_digits(s: &str) -> Option<u8> {
    let mut value: u32 = 0;
    for c in s.chars() {
        let d = match c {
            '0'..='9' => c as u32 - '0' as u32,
            '٠'..='٩' => c as u32 - '٠' as u32,
            _ => return None,
        };
        value = value * 10 + d;
    }
    u8::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language("الرياضيات للصف الخامس"), Language::Arabic);
        assert_eq!(detect_language("Mathematics for grade five"), Language::English);
        assert_eq!(
            detect_language("Unit 1 الكسور العشرية"),
            Language::Arabic
        );
        assert_eq!(detect_language("1234 ..."), Language::Unknown);
    }

    #[test]
    fn test_chunk_language() {
        assert_eq!(chunk_language("الخلية النباتية"), Language::Arabic);
        assert_eq!(chunk_language("plant cell"), Language::English);
        assert_eq!(chunk_language("الخلية cell"), Language::Mixed);
        assert_eq!(chunk_language("123 ★"), Language::Unknown);
    }

    #[test]
    fn test_grade_from_numbers() {
        assert_eq!(infer_grade_level("رياضيات ص ٥.pdf"), Some(5));
        assert_eq!(infer_grade_level("علوم ص12 الفصل الأول.pdf"), Some(12));
        assert_eq!(infer_grade_level("الصف ١١ فيزياء.pdf"), Some(11));
        assert_eq!(infer_grade_level("Science_Grade_7.pdf"), Some(7));
    }

    #[test]
    fn test_grade_from_ordinals() {
        assert_eq!(infer_grade_level("الصف الثالث - علوم.pdf"), Some(3));
        assert_eq!(infer_grade_level("لغة عربية الصف الثاني عشر.pdf"), Some(12));
        assert_eq!(infer_grade_level("الصف الثاني.pdf"), Some(2));
    }

    #[test]
    fn test_grade_out_of_range_or_absent() {
        assert_eq!(infer_grade_level("ص 13.pdf"), None);
        assert_eq!(infer_grade_level("grade 0.pdf"), None);
        assert_eq!(infer_grade_level("MOE_Framework_FINAL.pdf"), None);
    }
}
