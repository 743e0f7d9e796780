//! Keyword-based subject classification for student questions.

use serde::Serialize;

use edusage_core::Subject;

/// Per-subject bilingual keyword table. Declaration order breaks ties.
pub type KeywordTable = [(Subject, &'static [&'static str])];

/// Confidence reported when no keyword matches.
pub const GENERAL_CONFIDENCE: f64 = 0.5;
const MAX_CONFIDENCE: f64 = 0.9;

pub static SUBJECT_KEYWORDS: &KeywordTable = &[
    (
        Subject::Mathematics,
        &[
            "رياضيات", "حساب", "جمع", "طرح", "ضرب", "قسمة", "كسور", "هندسة", "مساحة", "محيط",
            "حجم", "معادلة", "جبر", "إحصاء", "احتمال", "رقم", "عدد", "مثلث", "مربع", "مستطيل",
            "دائرة", "قواعد الضرب", "قواعد القسمة", "قواعد الجمع", "جدول الضرب",
            "العمليات الحسابية",
            "mathematics", "math", "calculate", "addition", "subtraction", "multiplication",
            "division", "fractions", "geometry", "area", "perimeter", "volume", "equation",
            "algebra", "statistics", "probability", "number", "triangle", "square", "rectangle",
            "circle", "formula",
        ],
    ),
    (
        Subject::Physics,
        &[
            "فيزياء", "قانون نيوتن", "الحركة", "السرعة", "التسارع", "القوة", "الطاقة", "الضوء",
            "الصوت", "الكهرباء", "المغناطيس", "الموجات", "الجاذبية", "الضغط", "الحرارة",
            "الكتلة", "الوزن", "الاحتكاك", "المقاومة", "التيار", "الجهد", "القدرة", "العزم",
            "الزمن", "المسافة",
            "physics", "newton", "motion", "velocity", "acceleration", "force", "energy",
            "light", "sound", "electricity", "magnetism", "waves", "gravity", "pressure", "heat",
            "mass", "weight", "friction", "resistance", "current", "voltage", "power", "torque",
            "time", "distance",
        ],
    ),
    (
        Subject::Chemistry,
        &[
            "كيمياء", "العناصر", "المركبات", "التفاعل الكيميائي", "الذرة", "الجزيء", "الأيون",
            "الجدول الدوري", "الأحماض", "القواعد", "الأملاح", "الأكسدة", "الاختزال", "المحلول",
            "التركيز", "المولارية", "الرقم الهيدروجيني", "التفاعل", "المعادلة الكيميائية",
            "chemistry", "elements", "compounds", "chemical reaction", "atom", "molecule", "ion",
            "periodic table", "acids", "bases", "salts", "oxidation", "reduction", "solution",
            "concentration", "molarity", "ph", "reaction", "chemical equation",
        ],
    ),
    (
        Subject::Biology,
        &[
            "أحياء", "النبات", "الحيوان", "الخلية", "التمثيل الضوئي", "التنفس", "الهضم",
            "الدورة الدموية", "الجهاز العصبي", "الوراثة", "الحمض النووي", "البروتين",
            "الكروموسومات", "التطور", "البيئة", "النظام البيئي", "التلوث", "التنوع الحيوي",
            "التكاثر", "النمو",
            "biology", "plant", "animal", "cell", "photosynthesis", "respiration", "digestion",
            "circulation", "nervous system", "genetics", "dna", "protein", "chromosomes",
            "evolution", "environment", "ecosystem", "pollution", "biodiversity", "reproduction",
            "growth",
        ],
    ),
    (
        Subject::Language,
        &[
            "لغة", "عربية", "إنجليزية", "قراءة", "كتابة", "نحو", "صرف", "بلاغة", "شعر", "نثر",
            "قصة", "رواية", "مفردات", "تعبير", "إملاء",
            "language", "english", "arabic", "reading", "writing", "grammar", "vocabulary",
            "story", "poem", "literature", "composition", "spelling",
        ],
    ),
    (
        Subject::IslamicEducation,
        &[
            "إسلام", "دين", "قرآن", "حديث", "صلاة", "صيام", "زكاة", "حج", "وضوء", "أركان الإسلام",
            "إيمان", "عبادة", "أخلاق", "سيرة", "فقه", "تفسير",
        ],
    ),
    (
        Subject::SocialStudies,
        &[
            "تاريخ", "جغرافيا", "مجتمع", "ثقافة", "حضارة", "دولة", "حكومة", "اقتصاد", "سياسة",
            "الإمارات", "العالم العربي", "تراث", "عادات",
        ],
    ),
];

/// Result of classifying a question.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicClassification {
    #[serde(rename = "type")]
    pub subject: Subject,
    pub confidence: f64,
    pub matched_keywords: Vec<String>,
}

/// Classify with the built-in keyword table.
pub fn classify(question: &str) -> TopicClassification {
    classify_with(SUBJECT_KEYWORDS, question)
}

/// Count case-insensitive substring hits per subject; the strictly highest
/// count wins.
pub fn classify_with(table: &KeywordTable, question: &str) -> TopicClassification {
    let lower = question.to_lowercase();

    let mut best: Option<(Subject, Vec<&str>)> = None;
    for (subject, keywords) in table {
        let matches: Vec<&str> = keywords
            .iter()
            .copied()
            .filter(|kw| lower.contains(kw))
            .collect();
        let best_len = best.as_ref().map_or(0, |(_, m)| m.len());
        if matches.len() > best_len {
            best = Some((*subject, matches));
        }
    }

    match best {
        None => TopicClassification {
            subject: Subject::General,
            confidence: GENERAL_CONFIDENCE,
            matched_keywords: Vec::new(),
        },
        Some((subject, matches)) => {
            let word_count = question.split_whitespace().count().max(1);
            let confidence =
                (GENERAL_CONFIDENCE + matches.len() as f64 / word_count as f64).min(MAX_CONFIDENCE);
            TopicClassification {
                subject,
                confidence,
                matched_keywords: matches.into_iter().map(String::from).collect(),
            }
        }
    }
}
