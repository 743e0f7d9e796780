//! Text extraction: the PDF text layer first, OCR when it is too thin.

pub mod direct;
pub mod normalize;
pub mod ocr;
pub mod scratch;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use edusage_core::{Error, ExtractionMethod, IngestSettings, OcrProfile, Priority, Result};

pub use direct::{PdfExtractLayer, PdfTextLayer};
pub use ocr::{ImageMagickRasterizer, OcrEngine, PageText, Rasterizer, TesseractEngine};

/// Minimum characters for the text layer to be accepted.
pub const DIRECT_MIN_CHARS: usize = 100;
/// Quality assigned to text-layer extractions.
pub const DIRECT_QUALITY: f64 = 95.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedText {
    pub text: String,
    pub method: ExtractionMethod,
    /// 0-100.
    pub quality_score: f64,
}

pub struct TextExtractor {
    text_layer: Arc<dyn PdfTextLayer>,
    rasterizer: Arc<dyn Rasterizer>,
    engine: Arc<dyn OcrEngine>,
    languages: String,
    page_delay: Duration,
}

impl TextExtractor {
    pub fn new(
        text_layer: Arc<dyn PdfTextLayer>,
        rasterizer: Arc<dyn Rasterizer>,
        engine: Arc<dyn OcrEngine>,
        languages: impl Into<String>,
        page_delay: Duration,
    ) -> Self {
        Self {
            text_layer,
            rasterizer,
            engine,
            languages: languages.into(),
            page_delay,
        }
    }

    /// `pdf-extract` + ImageMagick + tesseract, as configured.
    pub fn from_settings(settings: &IngestSettings) -> Self {
        Self::new(
            Arc::new(PdfExtractLayer),
            Arc::new(ImageMagickRasterizer::new(&settings.rasterizer_cmd)),
            Arc::new(TesseractEngine::new(&settings.tesseract_cmd)),
            &settings.ocr_languages,
            settings.page_delay,
        )
    }

    /// Direct extraction, falling back to OCR with the tier's profile.
    pub async fn extract(&self, path: &Path, priority: Priority) -> Result<ExtractedText> {
        if let Some(direct) = self.try_direct(path).await? {
            return Ok(direct);
        }
        self.try_ocr(path, &OcrProfile::for_priority(priority)).await
    }

    /// The text layer, if it has at least [`DIRECT_MIN_CHARS`] characters.
    ///
    /// An unreadable text layer is not an error here: scanned books often
    /// have none, and OCR gets its turn.
    pub async fn try_direct(&self, path: &Path) -> Result<Option<ExtractedText>> {
        let raw = match self.text_layer.extract_text(path).await {
            Ok(raw) => raw,
            Err(Error::Extraction(e)) => {
                debug!("{}: no usable text layer ({})", path.display(), e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let text = normalize::clean_text(&raw);
        let chars = text.chars().count();
        if chars < DIRECT_MIN_CHARS {
            info!(
                "{}: text layer has {} chars, falling back to OCR",
                path.display(),
                chars
            );
            return Ok(None);
        }

        Ok(Some(ExtractedText {
            text,
            method: ExtractionMethod::Direct,
            quality_score: DIRECT_QUALITY,
        }))
    }

    /// OCR under `profile`. Fails with `InsufficientText` below the
    /// profile's character minimum.
    pub async fn try_ocr(&self, path: &Path, profile: &OcrProfile) -> Result<ExtractedText> {
        info!(
            "{}: OCR at {} dpi, up to {} pages, psm {:?}",
            path.display(),
            profile.dpi,
            profile.max_pages,
            profile.page_seg_modes
        );
        let output = ocr::recognize_document(
            self.rasterizer.as_ref(),
            self.engine.as_ref(),
            path,
            profile,
            &self.languages,
            self.page_delay,
        )
        .await?;

        let chars = normalize::usable_chars(&output.text);
        if chars < profile.min_chars {
            warn!(
                "{}: OCR produced {} usable chars across {} pages (need {})",
                path.display(),
                chars,
                output.pages_recognized,
                profile.min_chars
            );
            return Err(Error::insufficient_text(chars, profile.min_chars));
        }

        Ok(ExtractedText {
            text: output.text,
            method: profile.method,
            quality_score: output.confidence,
        })
    }
}
