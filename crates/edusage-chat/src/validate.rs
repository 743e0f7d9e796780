//! Post-generation check of the practice-item contract.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::templates::TemplateDescriptor;

static ITEM_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\*\*\s*(?:question|السؤال|سؤال)\s*([0-9٠-٩]+)").unwrap());
static OVERVIEW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\*\*\s*(?:concept overview|نظرة عامة|مفهوم)").unwrap());
static RUBRIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\*\*\s*(?:assessment rubric|معايير التقييم|سلم التقييم)").unwrap());

/// How an answer measured up against its template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Distinct item numbers found.
    pub items_found: usize,
    pub required: usize,
    /// Item numbers in `1..=required` that never appeared.
    pub missing: Vec<u32>,
    pub has_overview: bool,
    pub has_rubric: bool,
    pub passed: bool,
}

impl ValidationReport {
    /// Trailing line appended to a streamed answer that fell short.
    pub fn notice(&self) -> Option<String> {
        if self.passed {
            return None;
        }
        Some(format!(
            "\n\n---\nNote: this answer contains {} of the {} required practice questions.",
            self.items_found, self.required
        ))
    }
}

/// Parse Western or Arabic-Indic digits.
fn parse_item_number(digits: &str) -> Option<u32> {
    let mut n: u32 = 0;
    for c in digits.chars() {
        let d = match c {
            '0'..='9' => c as u32 - '0' as u32,
            '٠'..='٩' => c as u32 - '٠' as u32,
            _ => return None,
        };
        n = n.checked_mul(10)?.checked_add(d)?;
    }
    Some(n)
}

/// Count distinct item markers and check the surrounding sections.
pub fn validate_response(text: &str, template: &TemplateDescriptor) -> ValidationReport {
    let numbers: BTreeSet<u32> = ITEM_MARKER
        .captures_iter(text)
        .filter_map(|c| parse_item_number(&c[1]))
        .collect();

    let required = template.min_items;
    let missing: Vec<u32> = (1..=required as u32).filter(|n| !numbers.contains(n)).collect();

    ValidationReport {
        items_found: numbers.len(),
        required,
        passed: numbers.len() >= required && missing.is_empty(),
        missing,
        has_overview: OVERVIEW.is_match(text),
        has_rubric: RUBRIC.is_match(text),
    }
}
