//! OCR fallback: rasterize pages with ImageMagick, recognize them with
//! tesseract, keep the best result per page.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::normalize::{normalize_ocr_text, usable_chars};
use super::scratch::with_scratch_dir;
use edusage_core::{Error, ExtractionFailure, OcrProfile, Result};

/// Renders PDF pages to images.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Render up to `profile.max_pages` pages of `pdf` into `out_dir`.
    /// Returns the image paths in page order.
    async fn rasterize(&self, pdf: &Path, out_dir: &Path, profile: &OcrProfile)
        -> Result<Vec<PathBuf>>;
}

/// Recognizes text on one page image.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &Path, languages: &str, page_seg_mode: u8)
        -> Result<PageText>;
}

/// Recognition result for one page under one engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub text: String,
    /// Mean word confidence, 0-100.
    pub confidence: f64,
}

/// Combined OCR output for a document.
#[derive(Debug, Clone)]
pub struct OcrOutput {
    pub text: String,
    /// Mean per-page confidence, clamped to 0-100.
    pub confidence: f64,
    pub pages_recognized: usize,
}

/// `convert -density D -quality Q file.pdf[0-N] out/page_%04d.png`
pub struct ImageMagickRasterizer {
    command: String,
}

impl ImageMagickRasterizer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Rasterizer for ImageMagickRasterizer {
    async fn rasterize(
        &self,
        pdf: &Path,
        out_dir: &Path,
        profile: &OcrProfile,
    ) -> Result<Vec<PathBuf>> {
        let last_page = profile.max_pages.saturating_sub(1);
        let source = format!("{}[0-{}]", pdf.display(), last_page);
        let output = Command::new(&self.command)
            .arg("-density")
            .arg(profile.dpi.to_string())
            .arg("-quality")
            .arg(profile.quality.to_string())
            .arg(&source)
            .arg(out_dir.join("page_%04d.png"))
            .output()
            .await
            .map_err(|e| ExtractionFailure::Rasterize(format!("{}: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionFailure::Rasterize(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            ))
            .into());
        }

        let mut pages = Vec::new();
        let mut entries = tokio::fs::read_dir(out_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("page_") && name.ends_with(".png") {
                pages.push(entry.path());
            }
        }
        pages.sort();
        Ok(pages)
    }
}

/// `tesseract image stdout -l LANGS --psm N tsv`
pub struct TesseractEngine {
    command: String,
}

impl TesseractEngine {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn recognize(
        &self,
        image: &Path,
        languages: &str,
        page_seg_mode: u8,
    ) -> Result<PageText> {
        let output = Command::new(&self.command)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(languages)
            .arg("--psm")
            .arg(page_seg_mode.to_string())
            .arg("tsv")
            .output()
            .await?;

        if !output.status.success() {
            return Err(Error::Internal(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Rebuild page text from tesseract TSV output.
///
/// Words on one line are joined by spaces, lines by newlines, and
/// paragraphs or blocks by a blank line. Confidence is the mean over words
/// with a non-negative confidence.
pub fn parse_tsv(tsv: &str) -> PageText {
    let mut text = String::new();
    let mut confidences = Vec::new();
    let mut last_line: Option<(u32, u32, u32)> = None;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.splitn(12, '\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }

        let field = |i: usize| cols[i].parse::<u32>().unwrap_or(0);
        let line = (field(2), field(3), field(4));
        match last_line {
            None => {}
            Some(prev) if prev == line => text.push(' '),
            Some(prev) if (prev.0, prev.1) == (line.0, line.1) => text.push('\n'),
            Some(_) => text.push_str("\n\n"),
        }
        text.push_str(word);
        last_line = Some(line);

        if let Ok(conf) = cols[10].trim().parse::<f64>() {
            if conf >= 0.0 {
                confidences.push(conf);
            }
        }
    }

    let confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };
    PageText { text, confidence }
}

/// Best candidate by confidence × coverage, coverage being the candidate's
/// length relative to the longest one. Ties keep the earlier candidate.
pub fn pick_best(candidates: Vec<PageText>) -> Option<PageText> {
    let longest = candidates
        .iter()
        .map(|c| usable_chars(&c.text))
        .max()
        .unwrap_or(0);
    if longest == 0 {
        return None;
    }

    let score = |c: &PageText| c.confidence * usable_chars(&c.text) as f64 / longest as f64;
    let mut best: Option<(f64, PageText)> = None;
    for candidate in candidates {
        let s = score(&candidate);
        if best.as_ref().map_or(true, |(b, _)| s > *b) {
            best = Some((s, candidate));
        }
    }
    best.map(|(_, c)| c)
}

/// Rasterize `pdf` into a scratch directory and recognize its pages one at
/// a time. A page whose every configuration fails is logged and skipped.
pub async fn recognize_document(
    rasterizer: &dyn Rasterizer,
    engine: &dyn OcrEngine,
    pdf: &Path,
    profile: &OcrProfile,
    languages: &str,
    page_delay: Duration,
) -> Result<OcrOutput> {
    with_scratch_dir("edusage-ocr-", |dir| async move {
        let images = rasterizer.rasterize(pdf, &dir, profile).await?;
        if images.is_empty() {
            return Err(ExtractionFailure::NoPages.into());
        }

        let page_count = images.len().min(profile.max_pages);
        let mut texts = Vec::new();
        let mut confidences = Vec::new();

        for (i, image) in images.iter().take(page_count).enumerate() {
            let page = i + 1;
            let mut candidates = Vec::new();
            for &psm in &profile.page_seg_modes {
                match engine.recognize(image, languages, psm).await {
                    Ok(result) => candidates.push(result),
                    Err(e) => {
                        let err = Error::PageOcr {
                            page,
                            reason: format!("psm {}: {}", psm, e),
                        };
                        warn!("{}: {}", pdf.display(), err);
                    }
                }
            }

            match pick_best(candidates) {
                Some(best) => {
                    debug!(
                        "{}: page {}/{} confidence {:.1}",
                        pdf.display(),
                        page,
                        page_count,
                        best.confidence
                    );
                    texts.push(best.text);
                    confidences.push(best.confidence);
                }
                None => debug!("{}: page {} yielded no text", pdf.display(), page),
            }

            if page < page_count && !page_delay.is_zero() {
                tokio::time::sleep(page_delay).await;
            }
        }

        let confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };
        Ok(OcrOutput {
            text: normalize_ocr_text(&texts.join("\n\n")),
            confidence: confidence.clamp(0.0, 100.0),
            pages_recognized: texts.len(),
        })
    })
    .await
}
