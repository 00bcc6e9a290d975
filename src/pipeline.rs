use image::GenericImageView;
use parking_lot::Mutex;
use rayon::prelude::*;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::cluster::{resolve_noise, Dbscan};
use crate::config::Config;
use crate::distance::{build_distance_matrix, DistanceWeights};
use crate::features::{extract_features, ImageFeatures};
use crate::preprocess::{load_image, normalize_image, select_masker, TextMasker};
use crate::report;

/// Final counts reported to the operator.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub images_processed: usize,
    pub clusters_formed: usize,
}

/// Run the full batch: scan -> preprocess + extract -> distance matrix ->
/// cluster -> report.
pub fn run_dedupe(config: &Config) -> Result<RunSummary, Box<dyn std::error::Error>> {
    config.validate()?;
    let start_time = Instant::now();

    let input_dir = config.get_input_dir();
    if !input_dir.exists() || !input_dir.is_dir() {
        return Err(format!(
            "Input directory not found: {}",
            input_dir.display()
        )
        .into());
    }

    let files = collect_files(&input_dir, &config.file_glob, config.max_images)?;
    if files.is_empty() {
        return Err(format!(
            "No images matching '{}' found in {}",
            config.file_glob,
            input_dir.display()
        )
        .into());
    }
    println!("Found {} images to analyze in {}", files.len(), input_dir.display());
    println!(
        "Weights: alpha={:.2} beta={:.2} gamma={:.2}, eps={:.2}, min_samples={}",
        config.alpha, config.beta, config.gamma, config.eps, config.min_samples
    );

    let masker = select_masker(config.mask_text, &config.ocr_lang);
    let features = extract_all(&files, config, masker.as_ref());
    if features.is_empty() {
        return Err("No images could be processed; aborting.".into());
    }
    println!(
        "Extracted features for {} of {} images",
        features.len(),
        files.len()
    );

    let weights = DistanceWeights::new(config.alpha, config.beta, config.gamma);
    let matrix = build_distance_matrix(&features, &weights);
    if config.verbose {
        for i in 0..features.len() {
            for j in (i + 1)..features.len() {
                log::debug!(
                    "d({}, {}) = {:.6}",
                    features[i].file_name(),
                    features[j].file_name(),
                    matrix[i][j]
                );
            }
        }
    }

    let mut labels = Dbscan::new(config.eps, config.min_samples).fit_predict(&matrix)?;
    resolve_noise(&mut labels);

    report::write_csv(&config.get_output_csv(), &labels, &features, &matrix)?;
    if let Some(dir) = config.get_contact_sheets_dir() {
        fs::create_dir_all(&dir)?;
        report::generate_contact_sheets(&labels, &features, &dir)?;
    }
    if let Some(dir) = config.get_clusters_dir() {
        fs::create_dir_all(&dir)?;
        report::build_cluster_dirs(&labels, &features, &dir)?;
    }

    let clusters_formed = report::group_by_label(&labels).len();
    println!(
        "Processed {} images into {} clusters in {:?}",
        features.len(),
        clusters_formed,
        start_time.elapsed()
    );

    Ok(RunSummary {
        images_processed: features.len(),
        clusters_formed,
    })
}

/// Collect files matching the glob pattern, sorted for a deterministic index
/// order, optionally capped at `max_images`.
fn collect_files(
    input_dir: &Path,
    pattern: &str,
    max_images: usize,
) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let matcher = glob_to_regex(pattern)?;
    let mut files: Vec<PathBuf> = fs::read_dir(input_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .map(|name| matcher.is_match(&name.to_string_lossy()))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();
    if max_images > 0 && files.len() > max_images {
        files.truncate(max_images);
    }
    Ok(files)
}

/// Translate a shell-style glob (`*`, `?`, `[...]`, `[!...]`) into an
/// anchored regex. An unterminated `[` is treated as a literal bracket.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut translated = String::with_capacity(pattern.len() + 8);
    translated.push('^');
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            '[' => {
                // Locate the closing bracket. A `]` right after `[` or `[!`
                // is a member of the class, not its end.
                let mut j = i + 1;
                if j < chars.len() && chars[j] == '!' {
                    j += 1;
                }
                if j < chars.len() && chars[j] == ']' {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    translated.push_str("\\[");
                } else {
                    let mut k = i + 1;
                    translated.push('[');
                    if chars[k] == '!' {
                        translated.push('^');
                        k += 1;
                    }
                    for (offset, &c) in chars[k..j].iter().enumerate() {
                        match c {
                            '\\' => translated.push_str("\\\\"),
                            ']' => translated.push_str("\\]"),
                            '^' if offset == 0 => translated.push_str("\\^"),
                            _ => translated.push(c),
                        }
                    }
                    translated.push(']');
                    i = j;
                }
            }
            c => translated.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    translated.push('$');
    Regex::new(&translated)
}

/// Preprocess and fingerprint every file in parallel. Per-file failures are
/// collected and logged, never fatal; input order is preserved so image
/// indices stay stable across runs.
fn extract_all(files: &[PathBuf], config: &Config, masker: &dyn TextMasker) -> Vec<ImageFeatures> {
    let skipped = Mutex::new(Vec::new());

    let features: Vec<ImageFeatures> = files
        .par_iter()
        .filter_map(|path| {
            let image = match load_image(path) {
                Ok(image) => image,
                Err(e) => {
                    skipped.lock().push(format!("{}: {}", path.display(), e));
                    return None;
                }
            };
            let (orig_w, orig_h) = image.dimensions();
            let normalized = normalize_image(
                image,
                config.resize_width,
                config.crop_top,
                config.crop_bottom,
            );
            let normalized = masker.mask(normalized);
            Some(extract_features(
                path.clone(),
                &normalized,
                orig_w,
                orig_h,
                config.edge_sig_size,
            ))
        })
        .collect();

    for entry in skipped.into_inner() {
        log::warn!("Skipped unreadable image {}", entry);
    }
    features
}
