//! Document taxonomy: priority tiers, document types, extraction methods,
//! languages and subjects, plus the per-tier processing profiles.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Priority tier of a source document.
///
/// Ordering puts `Critical` first so sorting a batch by priority processes
/// the most important documents before the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Regular,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Self::Critical, Self::High, Self::Medium, Self::Regular];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Regular => "regular",
        }
    }

    /// Retrieval ranking boost stored on every chunk of the document.
    pub fn boost(&self) -> u8 {
        match self {
            Self::Critical => 3,
            Self::High => 2,
            Self::Medium | Self::Regular => 1,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "regular" => Ok(Self::Regular),
            other => Err(Error::Internal(format!("unknown priority '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    OfficialCurriculum,
    CurriculumGuide,
    Research,
    Textbook,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OfficialCurriculum => "official_curriculum",
            Self::CurriculumGuide => "curriculum_guide",
            Self::Research => "research",
            Self::Textbook => "textbook",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "official_curriculum" => Ok(Self::OfficialCurriculum),
            "curriculum_guide" => Ok(Self::CurriculumGuide),
            "research" => Ok(Self::Research),
            "textbook" => Ok(Self::Textbook),
            other => Err(Error::Internal(format!("unknown document type '{}'", other))),
        }
    }
}

/// How the text of a document was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Direct,
    Ocr,
    OcrEnhanced,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Ocr => "ocr",
            Self::OcrEnhanced => "ocr_enhanced",
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExtractionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "direct" => Ok(Self::Direct),
            "ocr" => Ok(Self::Ocr),
            "ocr_enhanced" => Ok(Self::OcrEnhanced),
            other => Err(Error::Internal(format!("unknown extraction method '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Arabic,
    English,
    Mixed,
    Unknown,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arabic => "arabic",
            Self::English => "english",
            Self::Mixed => "mixed",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "arabic" => Ok(Self::Arabic),
            "english" => Ok(Self::English),
            "mixed" => Ok(Self::Mixed),
            "unknown" => Ok(Self::Unknown),
            other => Err(Error::Internal(format!("unknown language '{}'", other))),
        }
    }
}

/// Curriculum subject a question (or chunk) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Mathematics,
    Physics,
    Chemistry,
    Biology,
    Language,
    IslamicEducation,
    SocialStudies,
    General,
}

impl Subject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mathematics => "mathematics",
            Self::Physics => "physics",
            Self::Chemistry => "chemistry",
            Self::Biology => "biology",
            Self::Language => "language",
            Self::IslamicEducation => "islamic_education",
            Self::SocialStudies => "social_studies",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filename tokens that mark a document's tier, checked in order.
const PRIORITY_RULES: &[(&[&str], Priority, DocumentType)] = &[
    (
        &["moe", "ministry", "final"],
        Priority::Critical,
        DocumentType::OfficialCurriculum,
    ),
    (
        &["تطور التعليم", "منهج", "دراسة"],
        Priority::High,
        DocumentType::Research,
    ),
    (
        &["تقييم", "استراتيجية", "curriculum"],
        Priority::High,
        DocumentType::CurriculumGuide,
    ),
];

/// Classify a document by its file name.
///
/// Names that match no rule fall back to `default` as a textbook.
pub fn classify_document(file_name: &str, default: Priority) -> (Priority, DocumentType) {
    let lower = file_name.to_lowercase();
    PRIORITY_RULES
        .iter()
        .find(|(tokens, _, _)| tokens.iter().any(|t| lower.contains(t)))
        .map(|(_, p, t)| (*p, *t))
        .unwrap_or((default, DocumentType::Textbook))
}

/// OCR settings for one extraction attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrProfile {
    /// Rasterization density.
    pub dpi: u32,
    /// Rasterization image quality (1-100).
    pub quality: u8,
    /// Pages recognized at most.
    pub max_pages: usize,
    /// Minimum usable characters for the attempt to count.
    pub min_chars: usize,
    /// Tesseract page segmentation modes tried on every page.
    pub page_seg_modes: Vec<u8>,
    /// Method recorded on success.
    pub method: ExtractionMethod,
}

impl OcrProfile {
    /// Standard OCR profile for a priority tier.
    pub fn for_priority(priority: Priority) -> Self {
        let (dpi, max_pages, min_chars) = match priority {
            Priority::Critical => (300, 20, 20),
            Priority::High => (250, 20, 30),
            Priority::Medium => (200, 15, 40),
            Priority::Regular => (200, 10, 50),
        };
        Self {
            dpi,
            quality: 100,
            max_pages,
            min_chars,
            page_seg_modes: vec![3],
            method: ExtractionMethod::Ocr,
        }
    }

    /// Profile used when retrying files whose OCR already failed.
    pub fn enhanced() -> Self {
        Self {
            dpi: 300,
            quality: 95,
            max_pages: 15,
            min_chars: 20,
            page_seg_modes: vec![1, 3, 6],
            method: ExtractionMethod::OcrEnhanced,
        }
    }
}

/// Chunk size and overlap, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkProfile {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl ChunkProfile {
    pub fn for_priority(priority: Priority) -> Self {
        match priority {
            Priority::Critical => Self {
                chunk_size: 2000,
                overlap: 300,
            },
            _ => Self {
                chunk_size: 1500,
                overlap: 200,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_ministry_document() {
        let (p, t) = classify_document("MOE_Math_Framework_FINAL.pdf", Priority::Medium);
        assert_eq!(p, Priority::Critical);
        assert_eq!(t, DocumentType::OfficialCurriculum);
    }

    #[test]
    fn test_classify_arabic_research() {
        let (p, t) = classify_document("دراسة تطور التعليم في الإمارات.pdf", Priority::Regular);
        assert_eq!(p, Priority::High);
        assert_eq!(t, DocumentType::Research);
    }

    #[test]
    fn test_classify_fallback() {
        let (p, t) = classify_document("رياضيات ص ٥.pdf", Priority::Regular);
        assert_eq!(p, Priority::Regular);
        assert_eq!(t, DocumentType::Textbook);
    }

    #[test]
    fn test_priority_ordering_and_boost() {
        let mut tiers = vec![Priority::Regular, Priority::Critical, Priority::Medium, Priority::High];
        tiers.sort();
        assert_eq!(tiers, Priority::ALL.to_vec());
        assert_eq!(Priority::Critical.boost(), 3);
        assert_eq!(Priority::High.boost(), 2);
        assert_eq!(Priority::Regular.boost(), 1);
    }

    #[test]
    fn test_profiles_scale_with_priority() {
        let critical = OcrProfile::for_priority(Priority::Critical);
        let regular = OcrProfile::for_priority(Priority::Regular);
        assert!(critical.dpi > regular.dpi);
        assert!(critical.max_pages > regular.max_pages);
        assert_eq!(ChunkProfile::for_priority(Priority::Critical).chunk_size, 2000);
        assert_eq!(ChunkProfile::for_priority(Priority::High).overlap, 200);
        assert_eq!(OcrProfile::enhanced().page_seg_modes, vec![1, 3, 6]);
    }

    #[test]
    fn test_round_trip_strings() {
        for p in Priority::ALL {
            assert_eq!(p.as_str().parse::<Priority>().unwrap(), p);
        }
        assert_eq!(
            "ocr_enhanced".parse::<ExtractionMethod>().unwrap(),
            ExtractionMethod::OcrEnhanced
        );
        assert!("bogus".parse::<Language>().is_err());
    }
}
