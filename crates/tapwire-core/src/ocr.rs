//! OCR fallback over driver screenshots.
//!
//! When the accessibility tree cannot confirm on-screen content, a
//! screenshot is pushed through text recognition instead. Raw device
//! screenshots at typical DPI produce unreliable recognition, so every image
//! is preprocessed first: grayscale, a 1.5x contrast rescale, then
//! binarization at a fixed luminance threshold. Recognition runs on the full
//! preprocessed image and falls back to each screen quadrant in turn, since
//! small text that drowns in a full-screen pass often resolves in a
//! quarter-screen crop.
//!
//! Recognition itself sits behind the [`TextRecognizer`] trait. The
//! Tesseract-backed implementation is compiled with the `ocr` cargo feature
//! (requires a tesseract installation); tests script the trait directly.

use image::{DynamicImage, GrayImage};
use thiserror::Error;
use tracing::debug;

use crate::element::ScreenPoint;

/// Luminance cutoff: preprocessed pixels become pure black or pure white.
const BINARIZE_THRESHOLD: u8 = 128;
/// Contrast gain applied before binarization.
const CONTRAST_GAIN: f32 = 1.5;

/// Errors that can occur during OCR verification.
#[derive(Error, Debug)]
pub enum OcrError {
    /// The text was found in a screenshot where it should be absent.
    #[error("text '{0}' found in screenshot where it should be absent")]
    UnexpectedTextFound(String),

    /// The text was not found in any screenshot variant.
    #[error("text '{0}' not found in screenshot")]
    TextNotFound(String),

    /// The recognizer failed to process an image.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// The screenshot could not be decoded or transformed.
    #[error("image processing failed: {0}")]
    Image(String),
}

impl From<image::ImageError> for OcrError {
    fn from(err: image::ImageError) -> Self {
        Self::Image(err.to_string())
    }
}

/// A recognized word with the top-left corner of its bounding box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizedWord {
    /// The recognized text.
    pub text: String,
    /// Left edge of the bounding box.
    pub x: i32,
    /// Top edge of the bounding box.
    pub y: i32,
    /// Bounding box width.
    pub width: u32,
    /// Bounding box height.
    pub height: u32,
}

/// Text recognition over a preprocessed grayscale image.
pub trait TextRecognizer: Send + Sync {
    /// Extract all text from the image.
    fn recognize(&self, image: &GrayImage) -> Result<String, OcrError>;

    /// Enumerate recognized words with bounding boxes.
    fn recognize_words(&self, image: &GrayImage) -> Result<Vec<RecognizedWord>, OcrError>;
}

/// Converts a screenshot into the black-and-white form recognition needs.
pub fn preprocess(image: &DynamicImage) -> GrayImage {
    let mut gray = image.to_luma8();
    for pixel in gray.pixels_mut() {
        let boosted = (f32::from(pixel.0[0]) * CONTRAST_GAIN).min(255.0) as u8;
        pixel.0[0] = if boosted > BINARIZE_THRESHOLD { 255 } else { 0 };
    }
    gray
}

/// Splits an image into its four quadrants: top-left, top-right,
/// bottom-left, bottom-right.
pub fn quadrants(image: &GrayImage) -> [GrayImage; 4] {
    use image::imageops::crop_imm;

    let (width, height) = image.dimensions();
    let (half_w, half_h) = (width / 2, height / 2);
    [
        crop_imm(image, 0, 0, half_w, half_h).to_image(),
        crop_imm(image, half_w, 0, half_w, half_h).to_image(),
        crop_imm(image, 0, half_h, half_w, half_h).to_image(),
        crop_imm(image, half_w, half_h, half_w, half_h).to_image(),
    ]
}

/// Parses tesseract TSV output into recognized words.
///
/// TSV rows carry 12 columns; word rows are level 5 with the text in the
/// last column. Rows with empty or whitespace-only text are skipped.
pub fn parse_tsv_words(tsv: &str) -> Vec<RecognizedWord> {
    let mut words = Vec::new();
    for line in tsv.lines() {
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < 12 || columns[0] != "5" {
            continue;
        }
        let text = columns[11].trim();
        if text.is_empty() {
            continue;
        }
        let (Ok(x), Ok(y), Ok(width), Ok(height)) = (
            columns[6].parse::<i32>(),
            columns[7].parse::<i32>(),
            columns[8].parse::<u32>(),
            columns[9].parse::<u32>(),
        ) else {
            continue;
        };
        words.push(RecognizedWord {
            text: text.to_string(),
            x,
            y,
            width,
            height,
        });
    }
    words
}

/// Tesseract-backed recognizer. Requires a tesseract installation.
#[cfg(feature = "ocr")]
pub struct TesseractRecognizer {
    language: String,
    datapath: Option<String>,
}

#[cfg(feature = "ocr")]
impl TesseractRecognizer {
    /// Creates a recognizer for English.
    pub fn new() -> Self {
        Self::with_language("eng")
    }

    /// Creates a recognizer for the given tesseract language code.
    pub fn with_language(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            datapath: None,
        }
    }

    /// Uses an explicit tessdata directory instead of the system default.
    pub fn with_datapath(mut self, datapath: impl Into<String>) -> Self {
        self.datapath = Some(datapath.into());
        self
    }

    fn engine_for(&self, image: &GrayImage) -> Result<tesseract::Tesseract, OcrError> {
        let mut png = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(image.clone())
            .write_to(&mut png, image::ImageFormat::Png)
            .map_err(|e| OcrError::Image(e.to_string()))?;

        let engine = tesseract::Tesseract::new(self.datapath.as_deref(), Some(&self.language))
            .map_err(|e| OcrError::Recognition(e.to_string()))?
            .set_image_from_mem(&png.into_inner())
            .map_err(|e| OcrError::Recognition(e.to_string()))?;
        Ok(engine)
    }
}

#[cfg(feature = "ocr")]
impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "ocr")]
impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, image: &GrayImage) -> Result<String, OcrError> {
        let mut engine = self.engine_for(image)?;
        engine
            .get_text()
            .map_err(|e| OcrError::Recognition(e.to_string()))
    }

    fn recognize_words(&self, image: &GrayImage) -> Result<Vec<RecognizedWord>, OcrError> {
        let mut engine = self.engine_for(image)?;
        let tsv = engine
            .get_tsv_text(0)
            .map_err(|e| OcrError::Recognition(e.to_string()))?;
        Ok(parse_tsv_words(&tsv))
    }
}

/// Screenshot-based text verification layered over a [`TextRecognizer`].
pub struct OcrFallback {
    recognizer: Box<dyn TextRecognizer>,
}

impl OcrFallback {
    /// Creates the fallback with the given recognizer.
    pub fn new(recognizer: Box<dyn TextRecognizer>) -> Self {
        Self { recognizer }
    }

    /// Creates the fallback backed by tesseract.
    #[cfg(feature = "ocr")]
    pub fn with_tesseract() -> Self {
        Self::new(Box::new(TesseractRecognizer::new()))
    }

    /// Verifies the presence or absence of `expected` in a screenshot.
    ///
    /// With `should_contain`, recognition runs on the full preprocessed
    /// image first and on each quadrant only while the text remains
    /// unconfirmed; the first confirming variant wins. With
    /// `!should_contain`, every variant is scanned; a hit in any of them
    /// is a failure, and absence is only declared after all five passes.
    ///
    /// # Errors
    ///
    /// - [`OcrError::TextNotFound`] when expected text is in no variant
    /// - [`OcrError::UnexpectedTextFound`] when forbidden text is in any variant
    /// - recognition and image-decoding failures
    pub fn verify_text(
        &self,
        screenshot_png: &[u8],
        expected: &str,
        should_contain: bool,
    ) -> Result<bool, OcrError> {
        let full = preprocess(&image::load_from_memory(screenshot_png)?);
        let [tl, tr, bl, br] = quadrants(&full);
        let variants = [full, tl, tr, bl, br];

        for (index, variant) in variants.iter().enumerate() {
            let text = self.recognizer.recognize(variant)?;
            let found = text.contains(expected);
            debug!(variant = index, found, "screenshot text pass");
            match (found, should_contain) {
                (true, true) => return Ok(true),
                (true, false) => return Err(OcrError::UnexpectedTextFound(expected.to_string())),
                (false, _) => {}
            }
        }

        if should_contain {
            Err(OcrError::TextNotFound(expected.to_string()))
        } else {
            Ok(true)
        }
    }

    /// Finds the top-left coordinate of the first word matching `text`
    /// case-insensitively in a screenshot.
    ///
    /// # Errors
    ///
    /// [`OcrError::TextNotFound`] when no recognized word matches.
    pub fn find_text_position(
        &self,
        screenshot_png: &[u8],
        text: &str,
    ) -> Result<ScreenPoint, OcrError> {
        let full = preprocess(&image::load_from_memory(screenshot_png)?);
        let words = self.recognizer.recognize_words(&full)?;
        words
            .iter()
            .find(|word| word.text.eq_ignore_ascii_case(text))
            .map(|word| ScreenPoint {
                x: word.x,
                y: word.y,
            })
            .ok_or_else(|| OcrError::TextNotFound(text.to_string()))
    }
}
