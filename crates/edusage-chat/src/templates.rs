//! Subject-specific answer templates.
//!
//! A template is static data: the teacher persona, the section skeleton every
//! answer must follow and the local examples to draw on. Selection is a pure
//! lookup on the classified subject.

use std::fmt::Write;

use edusage_core::{Language, Subject};
use edusage_ingest::language::detect_language;
use serde::Serialize;

/// Every template asks for this many practice items.
pub const MIN_ITEMS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Math,
    Physics,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Challenging,
}

impl Difficulty {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Easy => "Easy Level",
            Self::Medium => "Medium Level",
            Self::Challenging => "Challenging Level",
        }
    }
}

/// Instruction skeleton for one kind of answer.
#[derive(Debug)]
pub struct TemplateDescriptor {
    pub kind: TemplateKind,
    pub role: &'static str,
    pub min_items: usize,
    pub overview: &'static [&'static str],
    /// One focus per item, in order.
    pub item_focus: &'static [&'static str],
    /// Labelled parts of each detailed answer.
    pub answer_parts: &'static [(&'static str, &'static str)],
    pub local_examples: &'static [&'static str],
    pub rubric: &'static [(&'static str, &'static str)],
}

static MATH: TemplateDescriptor = TemplateDescriptor {
    kind: TemplateKind::Math,
    role: "an expert mathematics teacher for the UAE K-12 curriculum, fluent in Arabic and English",
    min_items: MIN_ITEMS,
    overview: &[
        "Mathematical concept explanation with UAE curriculum alignment",
        "Grade-level appropriateness and learning objectives",
        "Connection to UAE Vision 2071 mathematical literacy goals",
    ],
    item_focus: &[
        "Basic mathematical definition or concept",
        "Simple calculation",
        "Pattern recognition",
        "Multi-step calculation",
        "Problem solving with operations",
        "Real-world mathematical application",
        "UAE context word problem",
        "Complex mathematical problem",
        "Multi-concept integration",
        "Advanced UAE mathematical application",
    ],
    answer_parts: &[
        ("Mathematical Overview", "What mathematical concept we are applying"),
        ("Step-by-Step Solution", "Complete mathematical working"),
        ("UAE Mathematical Context", "A local application of the result"),
        ("Student Support", "Guidance for different ability levels"),
    ],
    local_examples: &["Dubai construction projects", "shopping calculations in dirhams", "Metro timetables"],
    rubric: &[
        ("Excellent", "Correct method, accurate calculation, clear explanation"),
        ("Good", "Correct method with minor errors"),
        ("Developing", "Partial understanding, needs support"),
    ],
};

static PHYSICS: TemplateDescriptor = TemplateDescriptor {
    kind: TemplateKind::Physics,
    role: "an expert physics teacher for the UAE K-12 curriculum, fluent in Arabic and English",
    min_items: MIN_ITEMS,
    overview: &[
        "Physics concept explanation with UAE curriculum alignment",
        "Real-world relevance and scientific applications",
        "Connection to UAE technological advancement goals",
    ],
    item_focus: &[
        "Basic physics definition or law",
        "Simple formula application",
        "Unit and quantity reasoning",
        "Multi-step physics calculation",
        "Experimental analysis",
        "Energy and motion in daily life",
        "UAE context physics problem",
        "Complex physics system",
        "Multi-principle integration",
        "Advanced UAE engineering application",
    ],
    answer_parts: &[
        ("Physics Overview", "Scientific principle being explored"),
        ("Step-by-Step Analysis", "Complete physics reasoning with formulas"),
        ("UAE Physics Context", "A local example of the principle"),
        ("Scientific Thinking", "How to approach physics problems systematically"),
    ],
    local_examples: &["solar energy at Noor Abu Dhabi", "Burj Khalifa engineering", "desert heat and cooling"],
    rubric: &[
        ("Excellent", "Correct principle, accurate working, clear scientific explanation"),
        ("Good", "Correct principle with minor errors"),
        ("Developing", "Partial understanding, needs support"),
    ],
};

static GENERAL: TemplateDescriptor = TemplateDescriptor {
    kind: TemplateKind::General,
    role: "an expert educational assistant for the UAE K-12 curriculum, fluent in Arabic and English",
    min_items: MIN_ITEMS,
    overview: &[
        "Brief concept explanation with UAE curriculum alignment",
        "Educational objectives and importance",
        "Connection to UAE educational standards",
    ],
    item_focus: &[
        "Foundation recall",
        "Key vocabulary",
        "Core idea in your own words",
        "Application to a new case",
        "Compare and contrast",
        "Cause and effect analysis",
        "UAE context application",
        "Evaluate an argument",
        "Synthesis across topics",
        "Extended response",
    ],
    answer_parts: &[
        ("Learning Overview", "What we are studying and why it matters"),
        ("Step-by-Step Explanation", "Complete guided reasoning"),
        ("UAE Educational Context", "Local examples and applications"),
        ("Student Support", "Differentiated guidance for various learning levels"),
    ],
    local_examples: &["UAE heritage and culture", "local environment and wildlife", "community life in the Emirates"],
    rubric: &[
        ("Excellent", "Complete understanding with clear explanation"),
        ("Good", "Solid understanding with minor gaps"),
        ("Developing", "Basic understanding, needs additional support"),
    ],
};

/// Template for a classified subject.
pub fn select_template(subject: Subject) -> &'static TemplateDescriptor {
    match subject {
        Subject::Mathematics => &MATH,
        Subject::Physics => &PHYSICS,
        _ => &GENERAL,
    }
}

/// Item marker the answer must use, in the question's language.
pub fn item_marker(language: Language, n: usize) -> String {
    match language {
        Language::Arabic => format!("**السؤال {}:**", n),
        _ => format!("**Question {}:**", n),
    }
}

impl TemplateDescriptor {
    /// Items 1-3 are easy, 4-7 medium and the rest challenging.
    pub fn difficulty_for(&self, item: usize) -> Difficulty {
        match item {
            0..=3 => Difficulty::Easy,
            4..=7 => Difficulty::Medium,
            _ => Difficulty::Challenging,
        }
    }

    /// System instruction wrapped around the retrieved context.
    pub fn render_instructions(&self, context: &str, question: &str) -> String {
        let language = detect_language(question);
        let mut out = String::new();

        let _ = writeln!(out, "You are {}.", self.role);
        out.push('\n');
        out.push_str("LANGUAGE: Respond in the same language as the student's question.\n");
        match language {
            Language::Arabic => out.push_str("The student asked in Arabic. Respond entirely in Arabic.\n"),
            _ => out.push_str("If the student asks in English, respond entirely in English.\n"),
        }
        out.push('\n');
        let _ = writeln!(
            out,
            "Create exactly {} practice questions with detailed scaffolded answers, in order, using this structure:",
            self.min_items
        );
        out.push('\n');

        out.push_str("**Concept Overview:**\n");
        for point in self.overview {
            let _ = writeln!(out, "- {}", point);
        }
        out.push('\n');

        for (i, focus) in self.item_focus.iter().enumerate().take(self.min_items) {
            let n = i + 1;
            let _ = writeln!(
                out,
                "{} [{}] - {}",
                item_marker(language, n),
                focus,
                self.difficulty_for(n).label()
            );
            out.push_str("**Detailed Answer:**\n");
            if i == 0 {
                for (label, what) in self.answer_parts {
                    let _ = writeln!(out, "- **{}:** {}", label, what);
                }
            } else {
                out.push_str("[Full scaffolding as above]\n");
            }
            out.push('\n');
        }

        let _ = writeln!(out, "Draw local context from: {}.", self.local_examples.join(", "));
        out.push('\n');

        out.push_str("**Assessment Rubric:**\n");
        for (level, meaning) in self.rubric {
            let _ = writeln!(out, "- {}: {}", level, meaning);
        }
        out.push('\n');

        let _ = writeln!(out, "Context: {}", context);
        let _ = writeln!(out, "Student Question: {}", question);
        out.push('\n');
        let _ = writeln!(
            out,
            "Missing any of questions 1 to {} is a failure. Include every question with a complete answer.",
            self.min_items
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection() {
        assert_eq!(select_template(Subject::Mathematics).kind, TemplateKind::Math);
        assert_eq!(select_template(Subject::Physics).kind, TemplateKind::Physics);
        assert_eq!(select_template(Subject::Chemistry).kind, TemplateKind::General);
        assert_eq!(select_template(Subject::General).kind, TemplateKind::General);
    }

    #[test]
    fn test_every_template_has_full_skeleton() {
        for kind in [Subject::Mathematics, Subject::Physics, Subject::Biology] {
            let t = select_template(kind);
            assert_eq!(t.min_items, 10);
            assert!(t.item_focus.len() >= t.min_items);
            assert_eq!(t.rubric.len(), 3);
            assert!(!t.overview.is_empty());
            assert!(!t.answer_parts.is_empty());

            let text = t.render_instructions("ctx", "What is a fraction?");
            assert!(text.contains("**Concept Overview:**"));
            assert!(text.contains("**Assessment Rubric:**"));
            for n in 1..=10 {
                assert!(text.contains(&format!("**Question {}:**", n)), "missing item {}", n);
            }
        }
    }

    #[test]
    fn test_difficulty_bands() {
        let t = select_template(Subject::General);
        assert_eq!(t.difficulty_for(1), Difficulty::Easy);
        assert_eq!(t.difficulty_for(3), Difficulty::Easy);
        assert_eq!(t.difficulty_for(4), Difficulty::Medium);
        assert_eq!(t.difficulty_for(7), Difficulty::Medium);
        assert_eq!(t.difficulty_for(8), Difficulty::Challenging);
        assert_eq!(t.difficulty_for(10), Difficulty::Challenging);
    }

    #[test]
    fn test_arabic_question_mirrors_language() {
        let text = select_template(Subject::Mathematics).render_instructions("", "ما هي قواعد الضرب؟");
        assert!(text.contains("Respond entirely in Arabic"));
        assert!(text.contains("**السؤال 1:**"));
        assert!(text.contains("**السؤال 10:**"));
        assert!(text.contains("Student Question: ما هي قواعد الضرب؟"));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&TemplateKind::Math).unwrap(), "\"math\"");
    }
}
