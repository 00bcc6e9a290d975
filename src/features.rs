use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use imageproc::edges::canny;
use std::path::PathBuf;

/// Total bit count across the four perceptual hashes (4 x 64).
pub const TOTAL_HASH_BITS: u32 = 256;

/// Canny thresholds used for the edge signature.
const CANNY_LOW: f32 = 100.0;
const CANNY_HIGH: f32 = 200.0;

/// Layout fingerprint for one screenshot. Vector lengths are identical across
/// all images of a run (fixed hash sizes, fixed signature grid), so bundles
/// are directly comparable.
#[derive(Debug, Clone)]
pub struct ImageFeatures {
    pub path: PathBuf,
    /// Original (pre-resize) pixel dimensions, used for canonical selection.
    pub width: u32,
    pub height: u32,
    pub ahash: u64,
    pub phash: u64,
    pub dhash: u64,
    pub whash: u64,
    /// Flattened S x S edge density grid, values in [0, 1].
    pub edge_signature: Vec<f32>,
    /// Row means of the edge grid (length S).
    pub h_projection: Vec<f32>,
    /// Column means of the edge grid (length S).
    pub v_projection: Vec<f32>,
}

impl ImageFeatures {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Extract the full feature bundle from a normalized image. Pure function of
/// the image and the signature grid size.
pub fn extract_features(
    path: PathBuf,
    normalized: &DynamicImage,
    original_width: u32,
    original_height: u32,
    edge_sig_size: u32,
) -> ImageFeatures {
    let gray = normalized.to_luma8();
    let (edge_signature, h_projection, v_projection) = edge_signature(&gray, edge_sig_size);
    ImageFeatures {
        path,
        width: original_width,
        height: original_height,
        ahash: average_hash(normalized),
        phash: dct_hash(normalized),
        dhash: difference_hash(normalized),
        whash: wavelet_hash(normalized),
        edge_signature,
        h_projection,
        v_projection,
    }
}

/// Resize to `w` x `h`, convert to grayscale, and return the pixel values as
/// f64 in row-major order.
fn luma_samples(image: &DynamicImage, w: u32, h: u32) -> Vec<f64> {
    let small = image.resize_exact(w, h, FilterType::Lanczos3);
    small.to_luma8().pixels().map(|p| p[0] as f64).collect()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Averaging hash: 8x8 grayscale, each bit compares a pixel to the mean.
pub fn average_hash(image: &DynamicImage) -> u64 {
    let pixels = luma_samples(image, 8, 8);
    let avg = pixels.iter().sum::<f64>() / pixels.len() as f64;
    let mut hash = 0u64;
    for (i, &p) in pixels.iter().enumerate() {
        if p >= avg {
            hash |= 1 << i;
        }
    }
    hash
}

/// Gradient hash: 9x8 grayscale, each bit compares a pixel to its left
/// neighbor.
pub fn difference_hash(image: &DynamicImage) -> u64 {
    let pixels = luma_samples(image, 9, 8);
    let mut hash = 0u64;
    let mut bit = 0;
    for row in 0..8 {
        for col in 0..8 {
            let left = pixels[row * 9 + col];
            let right = pixels[row * 9 + col + 1];
            if right > left {
                hash |= 1 << bit;
            }
            bit += 1;
        }
    }
    hash
}

/// Frequency-domain hash: 32x32 grayscale, 2-D DCT-II, 8x8 low-frequency
/// block thresholded at its median.
pub fn dct_hash(image: &DynamicImage) -> u64 {
    const N: usize = 32;
    let pixels = luma_samples(image, N as u32, N as u32);

    // Separable DCT-II: rows, then columns.
    let mut rows = vec![0.0f64; N * N];
    for r in 0..N {
        let dct = dct_1d(&pixels[r * N..(r + 1) * N]);
        rows[r * N..(r + 1) * N].copy_from_slice(&dct);
    }
    let mut coeffs = vec![0.0f64; N * N];
    for c in 0..N {
        let col: Vec<f64> = (0..N).map(|r| rows[r * N + c]).collect();
        let dct = dct_1d(&col);
        for r in 0..N {
            coeffs[r * N + c] = dct[r];
        }
    }

    // Keep the top-left 8x8 block of low-frequency coefficients.
    let mut low_freq = Vec::with_capacity(64);
    for r in 0..8 {
        for c in 0..8 {
            low_freq.push(coeffs[r * N + c]);
        }
    }
    let med = median(&low_freq);
    let mut hash = 0u64;
    for (i, &v) in low_freq.iter().enumerate() {
        if v > med {
            hash |= 1 << i;
        }
    }
    hash
}

fn dct_1d(input: &[f64]) -> Vec<f64> {
    let n = input.len();
    let mut output = vec![0.0f64; n];
    for (k, out) in output.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (i, &x) in input.iter().enumerate() {
            sum += x * (std::f64::consts::PI / n as f64 * (i as f64 + 0.5) * k as f64).cos();
        }
        *out = sum;
    }
    output
}

/// Wavelet-domain hash: 64x64 grayscale, three levels of 2-D Haar
/// decomposition down to an 8x8 LL band, thresholded at its median.
pub fn wavelet_hash(image: &DynamicImage) -> u64 {
    let mut pixels = luma_samples(image, 64, 64);
    for v in pixels.iter_mut() {
        *v /= 255.0;
    }

    let mut size = 64usize;
    while size > 8 {
        let half = size / 2;
        let mut next = vec![0.0f64; half * half];
        for r in 0..half {
            for c in 0..half {
                let a = pixels[(2 * r) * size + 2 * c];
                let b = pixels[(2 * r) * size + 2 * c + 1];
                let d = pixels[(2 * r + 1) * size + 2 * c];
                let e = pixels[(2 * r + 1) * size + 2 * c + 1];
                next[r * half + c] = (a + b + d + e) / 2.0;
            }
        }
        pixels = next;
        size = half;
    }

    let med = median(&pixels);
    let mut hash = 0u64;
    for (i, &v) in pixels.iter().enumerate() {
        if v > med {
            hash |= 1 << i;
        }
    }
    hash
}

/// Compute the edge signature and projection histograms for a grayscale
/// image: Canny edge map, area-averaged down to an S x S grid where each cell
/// holds the fraction of edge pixels in its source region, then row and
/// column means of that grid.
pub fn edge_signature(gray: &GrayImage, size: u32) -> (Vec<f32>, Vec<f32>, Vec<f32>) {
    let edges = canny(gray, CANNY_LOW, CANNY_HIGH);
    let (w, h) = edges.dimensions();
    let s = size as usize;

    let mut grid = vec![0.0f32; s * s];
    for gr in 0..s {
        // Integer region bounds; for images smaller than the grid some cells
        // share a source row/column, which keeps the output length fixed.
        let y0 = (gr as u64 * h as u64 / s as u64) as u32;
        let mut y1 = ((gr as u64 + 1) * h as u64 / s as u64) as u32;
        if y1 <= y0 {
            y1 = (y0 + 1).min(h);
        }
        for gc in 0..s {
            let x0 = (gc as u64 * w as u64 / s as u64) as u32;
            let mut x1 = ((gc as u64 + 1) * w as u64 / s as u64) as u32;
            if x1 <= x0 {
                x1 = (x0 + 1).min(w);
            }

            let mut sum = 0u32;
            let mut count = 0u32;
            for y in y0..y1 {
                for x in x0..x1 {
                    if edges.get_pixel(x, y)[0] > 0 {
                        sum += 1;
                    }
                    count += 1;
                }
            }
            grid[gr * s + gc] = if count > 0 {
                sum as f32 / count as f32
            } else {
                0.0
            };
        }
    }

    let mut h_proj = vec![0.0f32; s];
    let mut v_proj = vec![0.0f32; s];
    for r in 0..s {
        for c in 0..s {
            h_proj[r] += grid[r * s + c];
            v_proj[c] += grid[r * s + c];
        }
    }
    for v in h_proj.iter_mut().chain(v_proj.iter_mut()) {
        *v /= s as f32;
    }

    (grid, h_proj, v_proj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn structured_image() -> DynamicImage {
        // White page with a dark header band and a left sidebar.
        let mut img = RgbImage::from_pixel(128, 128, Rgb([255, 255, 255]));
        for y in 0..16 {
            for x in 0..128 {
                img.put_pixel(x, y, Rgb([20, 20, 20]));
            }
        }
        for y in 16..128 {
            for x in 0..24 {
                img.put_pixel(x, y, Rgb([80, 80, 80]));
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    fn black_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(128, 128, Rgb([0, 0, 0])))
    }

    #[test]
    fn extraction_is_deterministic() {
        let img = structured_image();
        let a = extract_features(PathBuf::from("a.png"), &img, 128, 128, 16);
        let b = extract_features(PathBuf::from("a.png"), &img, 128, 128, 16);
        assert_eq!(a.ahash, b.ahash);
        assert_eq!(a.phash, b.phash);
        assert_eq!(a.dhash, b.dhash);
        assert_eq!(a.whash, b.whash);
        assert_eq!(a.edge_signature, b.edge_signature);
        assert_eq!(a.h_projection, b.h_projection);
        assert_eq!(a.v_projection, b.v_projection);
    }

    #[test]
    fn vector_lengths_match_grid_size() {
        let f = extract_features(PathBuf::from("a.png"), &structured_image(), 128, 128, 16);
        assert_eq!(f.edge_signature.len(), 16 * 16);
        assert_eq!(f.h_projection.len(), 16);
        assert_eq!(f.v_projection.len(), 16);
    }

    #[test]
    fn edge_signature_values_are_bounded() {
        let f = extract_features(PathBuf::from("a.png"), &structured_image(), 128, 128, 16);
        assert!(f.edge_signature.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn identical_images_share_all_hashes() {
        let img = structured_image();
        assert_eq!(average_hash(&img), average_hash(&img.clone()));
        assert_eq!(dct_hash(&img), dct_hash(&img.clone()));
        assert_eq!(difference_hash(&img), difference_hash(&img.clone()));
        assert_eq!(wavelet_hash(&img), wavelet_hash(&img.clone()));
    }

    #[test]
    fn uniform_image_has_empty_edge_signature() {
        let gray = black_image().to_luma8();
        let (grid, h_proj, v_proj) = edge_signature(&gray, 16);
        assert!(grid.iter().all(|&v| v == 0.0));
        assert!(h_proj.iter().all(|&v| v == 0.0));
        assert!(v_proj.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn structured_layouts_differ_from_uniform_ones() {
        let a = extract_features(PathBuf::from("a.png"), &structured_image(), 128, 128, 16);
        let c = extract_features(PathBuf::from("c.png"), &black_image(), 128, 128, 16);
        assert_ne!(a.ahash, c.ahash);
        assert!(a.edge_signature.iter().any(|&v| v > 0.0));
    }

    #[test]
    fn grid_smaller_than_image_still_fixed_length() {
        let gray = structured_image().to_luma8();
        let (grid, _, _) = edge_signature(&gray, 200);
        assert_eq!(grid.len(), 200 * 200);
    }
}
