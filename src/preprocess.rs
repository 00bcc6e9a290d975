use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

/// Load an image for processing. Decode failures are reported to the caller,
/// which treats them as a per-file skip rather than a fatal error.
pub fn load_image(path: &Path) -> Result<DynamicImage, image::ImageError> {
    image::open(path)
}

/// Normalize geometry: resize to a common width (keeping aspect ratio), then
/// optionally crop fixed top/bottom bars.
///
/// Crop amounts are clamped to the image bounds. If the requested crop would
/// leave nothing (bottom edge at or above top edge), cropping is skipped and
/// the whole image is kept.
pub fn normalize_image(
    mut image: DynamicImage,
    target_width: u32,
    crop_top: u32,
    crop_bottom: u32,
) -> DynamicImage {
    let (w, h) = image.dimensions();
    if w != target_width {
        let scale = target_width as f64 / w as f64;
        let new_h = ((h as f64 * scale).round() as u32).max(1);
        image = image.resize_exact(target_width, new_h, FilterType::Lanczos3);
    }

    if crop_top > 0 || crop_bottom > 0 {
        let (w, h) = image.dimensions();
        let top = crop_top.min(h);
        let bottom = h.saturating_sub(crop_bottom);
        if bottom > top {
            image = image.crop_imm(0, top, w, bottom - top);
        }
    }

    image
}

/// Masks text regions so textual content doesn't affect the layout fingerprint.
///
/// Implementations are selected once at startup; the pipeline calls `mask`
/// unconditionally and relies on the no-op implementation when masking is
/// disabled or unavailable.
pub trait TextMasker: Send + Sync {
    fn mask(&self, image: DynamicImage) -> DynamicImage;
}

/// Masker used when text masking is disabled or no OCR engine is available.
pub struct NoopMasker;

impl TextMasker for NoopMasker {
    fn mask(&self, image: DynamicImage) -> DynamicImage {
        image
    }
}

/// OCR-backed masker that shells out to the `tesseract` binary for word-level
/// bounding boxes and paints an opaque black rectangle over each word.
///
/// Any failure (binary missing at runtime, OCR error, unparseable output)
/// degrades to returning the unmodified image.
pub struct OcrMasker {
    lang: String,
}

static OCR_TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

impl OcrMasker {
    /// Probe for a usable tesseract binary. Returns `None` when the binary is
    /// missing or not runnable, so the caller can fall back to `NoopMasker`.
    pub fn detect(lang: &str) -> Option<Self> {
        let available = Command::new("tesseract")
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false);
        if available {
            Some(OcrMasker {
                lang: lang.to_string(),
            })
        } else {
            None
        }
    }

    /// Run tesseract in TSV mode and collect word-level boxes (x, y, w, h).
    fn word_boxes(
        &self,
        image: &DynamicImage,
    ) -> Result<Vec<(u32, u32, u32, u32)>, Box<dyn std::error::Error>> {
        // tesseract reads from a file, so round-trip through a unique temp png
        let serial = OCR_TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_path = std::env::temp_dir().join(format!(
            "layout_dedupe_ocr_{}_{}.png",
            std::process::id(),
            serial
        ));
        image.save(&temp_path)?;

        let output = Command::new("tesseract")
            .arg(&temp_path)
            .arg("stdout")
            .args(["-l", &self.lang])
            .arg("tsv")
            .output();
        let _ = std::fs::remove_file(&temp_path);
        let output = output?;
        if !output.status.success() {
            return Err(format!("tesseract exited with {}", output.status).into());
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let mut boxes = Vec::new();
        // TSV columns: level page block par line word left top width height conf text
        for line in text.lines().skip(1) {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 12 || fields[0] != "5" {
                continue;
            }
            if fields[11].trim().is_empty() {
                continue;
            }
            let (left, top, width, height) = (
                fields[6].parse::<u32>()?,
                fields[7].parse::<u32>()?,
                fields[8].parse::<u32>()?,
                fields[9].parse::<u32>()?,
            );
            boxes.push((left, top, width, height));
        }
        Ok(boxes)
    }
}

impl TextMasker for OcrMasker {
    fn mask(&self, image: DynamicImage) -> DynamicImage {
        let boxes = match self.word_boxes(&image) {
            Ok(boxes) => boxes,
            Err(e) => {
                log::warn!("Text masking failed, using unmasked image: {}", e);
                return image;
            }
        };
        if boxes.is_empty() {
            return image;
        }

        let mut rgb = image.to_rgb8();
        for (x, y, w, h) in boxes {
            if w == 0 || h == 0 {
                continue;
            }
            let rect = Rect::at(x as i32, y as i32).of_size(w, h);
            draw_filled_rect_mut(&mut rgb, rect, Rgb([0, 0, 0]));
        }
        DynamicImage::ImageRgb8(rgb)
    }
}

/// Pick the masker once at startup: real OCR when requested and available,
/// no-op otherwise.
pub fn select_masker(mask_text: bool, ocr_lang: &str) -> Box<dyn TextMasker> {
    if !mask_text {
        return Box::new(NoopMasker);
    }
    match OcrMasker::detect(ocr_lang) {
        Some(masker) => {
            println!("Text masking enabled (tesseract, lang: {})", ocr_lang);
            Box::new(masker)
        }
        None => {
            log::warn!("tesseract not available; proceeding without text masking");
            Box::new(NoopMasker)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn solid_image(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([128, 128, 128])))
    }

    #[test]
    fn resizes_to_target_width_keeping_aspect() {
        let normalized = normalize_image(solid_image(200, 100), 100, 0, 0);
        assert_eq!(normalized.dimensions(), (100, 50));
    }

    #[test]
    fn resize_height_never_drops_below_one() {
        let normalized = normalize_image(solid_image(1000, 2), 100, 0, 0);
        assert_eq!(normalized.width(), 100);
        assert!(normalized.height() >= 1);
    }

    #[test]
    fn matching_width_is_left_alone() {
        let normalized = normalize_image(solid_image(100, 40), 100, 0, 0);
        assert_eq!(normalized.dimensions(), (100, 40));
    }

    #[test]
    fn crop_removes_top_and_bottom_bars() {
        let normalized = normalize_image(solid_image(100, 100), 100, 10, 20);
        assert_eq!(normalized.dimensions(), (100, 70));
    }

    #[test]
    fn crop_is_clamped_to_image_bounds() {
        // Requested bottom crop exceeds the height; clamped bottom edge ends
        // up at or above the top edge, so the crop is skipped entirely.
        let normalized = normalize_image(solid_image(100, 50), 100, 10, 45);
        assert_eq!(normalized.dimensions(), (100, 50));
    }

    #[test]
    fn inverted_crop_keeps_whole_image() {
        let normalized = normalize_image(solid_image(100, 30), 100, 20, 20);
        assert_eq!(normalized.dimensions(), (100, 30));
    }

    #[test]
    fn noop_masker_returns_image_unchanged() {
        let image = solid_image(10, 10);
        let masked = NoopMasker.mask(image.clone());
        assert_eq!(masked.to_rgb8().as_raw(), image.to_rgb8().as_raw());
    }
}
