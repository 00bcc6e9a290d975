use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::features::ImageFeatures;

const THUMB_WIDTH: u32 = 400;
const SHEET_COLS: usize = 5;

/// Group image indices by cluster label, in ascending label order so the
/// report is deterministic.
pub fn group_by_label(labels: &[i32]) -> BTreeMap<i32, Vec<usize>> {
    let mut clusters: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        clusters.entry(label).or_default().push(i);
    }
    clusters
}

/// Pick the cluster representative: largest original pixel area, ties broken
/// by lexicographically smallest filename. The first member is the defined
/// fallback when no candidate beats it.
pub fn choose_canonical(indices: &[usize], features: &[ImageFeatures]) -> usize {
    let mut best = indices[0];
    let mut best_area = features[best].area();
    let mut best_name = features[best].file_name();
    for &idx in &indices[1..] {
        let area = features[idx].area();
        let name = features[idx].file_name();
        if area > best_area || (area == best_area && name < best_name) {
            best = idx;
            best_area = area;
            best_name = name;
        }
    }
    best
}

/// Write the cluster report: one row per image with its cluster id, the
/// cluster's canonical filename, and the precomputed distance to it.
pub fn write_csv(
    output_csv: &Path,
    labels: &[i32],
    features: &[ImageFeatures],
    matrix: &[Vec<f64>],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = File::create(output_csv)?;
    writeln!(file, "cluster_id,canonical,filename,path,distance_to_canonical")?;

    for (label, indices) in group_by_label(labels) {
        let canonical_idx = choose_canonical(&indices, features);
        let canonical_name = features[canonical_idx].file_name();
        for idx in indices {
            let f = &features[idx];
            writeln!(
                file,
                "{},{},{},{},{:.6}",
                label,
                canonical_name,
                f.file_name(),
                f.path.display(),
                matrix[canonical_idx][idx]
            )?;
        }
    }

    println!("Cluster report saved to: {}", output_csv.display());
    Ok(())
}

/// Assemble one thumbnail mosaic for a cluster. Members that fail to load are
/// skipped without aborting the sheet.
fn make_contact_sheet(
    indices: &[usize],
    features: &[ImageFeatures],
    sheet_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut thumbs: Vec<RgbImage> = Vec::new();
    for &idx in indices {
        match image::open(&features[idx].path) {
            Ok(im) => {
                let (w, h) = (im.width(), im.height());
                let scale = THUMB_WIDTH as f64 / w as f64;
                let th = ((h as f64 * scale).round() as u32).max(1);
                thumbs.push(
                    im.resize_exact(THUMB_WIDTH, th, FilterType::Lanczos3)
                        .to_rgb8(),
                );
            }
            Err(e) => {
                log::warn!(
                    "Skipping {} in contact sheet: {}",
                    features[idx].path.display(),
                    e
                );
            }
        }
    }
    if thumbs.is_empty() {
        return Ok(());
    }

    let rows = thumbs.len().div_ceil(SHEET_COLS);
    // Column widths and row heights sized to the largest thumbnail in each.
    let col_widths: Vec<u32> = (0..SHEET_COLS)
        .map(|c| {
            thumbs
                .iter()
                .skip(c)
                .step_by(SHEET_COLS)
                .map(|t| t.width())
                .max()
                .unwrap_or(0)
        })
        .collect();
    let row_heights: Vec<u32> = (0..rows)
        .map(|r| {
            thumbs[r * SHEET_COLS..((r + 1) * SHEET_COLS).min(thumbs.len())]
                .iter()
                .map(|t| t.height())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let sheet_w: u32 = col_widths.iter().sum::<u32>().max(1);
    let sheet_h: u32 = row_heights.iter().sum::<u32>().max(1);
    let mut sheet = RgbImage::from_pixel(sheet_w, sheet_h, Rgb([240, 240, 240]));

    let mut k = 0;
    let mut y = 0i64;
    for r in 0..rows {
        let mut x = 0i64;
        for c in 0..SHEET_COLS {
            if k >= thumbs.len() {
                break;
            }
            imageops::replace(&mut sheet, &thumbs[k], x, y);
            x += col_widths[c] as i64;
            k += 1;
        }
        y += row_heights[r] as i64;
    }

    if let Some(parent) = sheet_path.parent() {
        fs::create_dir_all(parent)?;
    }
    sheet.save(sheet_path)?;
    Ok(())
}

/// Generate one mosaic image per cluster, named by zero-padded cluster index.
pub fn generate_contact_sheets(
    labels: &[i32],
    features: &[ImageFeatures],
    out_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    for (label, indices) in group_by_label(labels) {
        let sheet_path = out_dir.join(format!("cluster_{:04}.jpg", label));
        make_contact_sheet(&indices, features, &sheet_path)?;
    }
    println!("Contact sheets saved to: {}", out_dir.display());
    Ok(())
}

/// Build one directory per cluster containing a `canonical.txt` marker and a
/// symlink (or copy, when linking is unsupported) per member. Individual
/// link/copy failures are logged and swallowed.
pub fn build_cluster_dirs(
    labels: &[i32],
    features: &[ImageFeatures],
    out_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    for (label, indices) in group_by_label(labels) {
        let cluster_dir = out_dir.join(format!("cluster_{:04}", label));
        fs::create_dir_all(&cluster_dir)?;

        let canonical_idx = choose_canonical(&indices, features);
        let mut marker = File::create(cluster_dir.join("canonical.txt"))?;
        writeln!(marker, "{}", features[canonical_idx].file_name())?;

        for idx in indices {
            let src = &features[idx].path;
            let dst = cluster_dir.join(features[idx].file_name());
            if dst.exists() || dst.symlink_metadata().is_ok() {
                continue;
            }
            if let Err(e) = link_or_copy(src, &dst) {
                log::warn!("Could not place {} in {}: {}", src.display(), cluster_dir.display(), e);
            }
        }
    }
    println!("Cluster directories saved to: {}", out_dir.display());
    Ok(())
}

fn link_or_copy(src: &Path, dst: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let absolute = fs::canonicalize(src)?;
    #[cfg(unix)]
    {
        if std::os::unix::fs::symlink(&absolute, dst).is_ok() {
            return Ok(());
        }
    }
    fs::copy(&absolute, dst)?;
    Ok(())
}
