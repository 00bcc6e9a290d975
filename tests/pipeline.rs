use layout_dedupe::config::Config;
use layout_dedupe::pipeline::run_dedupe;

use image::{Rgb, RgbImage};
use std::fs;
use std::path::PathBuf;

/// A white page with a dark header band and a dark sidebar, the kind of
/// structure the edge signature picks up.
fn structured_page(width: u32, height: u32) -> RgbImage {
    let mut img = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    for y in 0..height.min(40) {
        for x in 0..width {
            img.put_pixel(x, y, Rgb([30, 30, 30]));
        }
    }
    for y in 0..height {
        for x in 0..width.min(50) {
            img.put_pixel(x, y, Rgb([30, 30, 30]));
        }
    }
    img
}

fn fixture_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "layout_dedupe_it_{}_{}",
        tag,
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_fixtures(dir: &PathBuf) {
    structured_page(200, 300).save(dir.join("a.png")).unwrap();
    structured_page(200, 300).save(dir.join("b.png")).unwrap();
    RgbImage::from_pixel(200, 300, Rgb([0, 0, 0]))
        .save(dir.join("c.png"))
        .unwrap();
    // Unreadable file that should be skipped, not fatal
    fs::write(dir.join("bad.png"), b"not a png").unwrap();
    // Non-matching extension that should be ignored by the glob
    structured_page(200, 300).save(dir.join("d.jpg")).unwrap();
}

fn test_config(input: &PathBuf, output_csv: &PathBuf) -> Config {
    let mut config = Config::default();
    config.input_directory = input.to_string_lossy().to_string();
    config.output_csv = output_csv.to_string_lossy().to_string();
    config.resize_width = 64;
    config.edge_sig_size = 16;
    config
}

#[test]
fn clusters_identical_layouts_and_separates_blank_page() {
    let dir = fixture_dir("cluster");
    write_fixtures(&dir);
    let csv_path = dir.join("clusters.csv");

    let config = test_config(&dir, &csv_path);
    let summary = run_dedupe(&config).unwrap();

    assert_eq!(summary.images_processed, 3);
    assert_eq!(summary.clusters_formed, 2);

    let csv = fs::read_to_string(&csv_path).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next().unwrap(),
        "cluster_id,canonical,filename,path,distance_to_canonical"
    );

    let rows: Vec<Vec<String>> = lines
        .map(|line| line.split(',').map(|s| s.to_string()).collect())
        .collect();
    assert_eq!(rows.len(), 3);

    let label_of = |name: &str| -> String {
        rows.iter()
            .find(|row| row[2] == name)
            .map(|row| row[0].clone())
            .unwrap()
    };
    assert_eq!(label_of("a.png"), label_of("b.png"));
    assert_ne!(label_of("a.png"), label_of("c.png"));

    // The identical pair ties on area, so the lexicographically smaller
    // filename wins the canonical slot.
    let canonical_of = |name: &str| -> String {
        rows.iter()
            .find(|row| row[2] == name)
            .map(|row| row[1].clone())
            .unwrap()
    };
    assert_eq!(canonical_of("a.png"), "a.png");
    assert_eq!(canonical_of("b.png"), "a.png");
    assert_eq!(canonical_of("c.png"), "c.png");

    // Identical images are at distance zero from their canonical
    let b_row = rows.iter().find(|row| row[2] == "b.png").unwrap();
    assert_eq!(b_row[4], "0.000000");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn runs_are_deterministic() {
    let dir = fixture_dir("determinism");
    write_fixtures(&dir);

    let csv1 = dir.join("run1.csv");
    let csv2 = dir.join("run2.csv");
    run_dedupe(&test_config(&dir, &csv1)).unwrap();
    run_dedupe(&test_config(&dir, &csv2)).unwrap();

    assert_eq!(
        fs::read_to_string(&csv1).unwrap(),
        fs::read_to_string(&csv2).unwrap()
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn writes_contact_sheets_and_cluster_dirs() {
    let dir = fixture_dir("artifacts");
    write_fixtures(&dir);

    let csv_path = dir.join("clusters.csv");
    let mut config = test_config(&dir, &csv_path);
    config.contact_sheets_dir = dir.join("sheets").to_string_lossy().to_string();
    config.clusters_dir = dir.join("grouped").to_string_lossy().to_string();

    run_dedupe(&config).unwrap();

    assert!(dir.join("sheets").join("cluster_0000.jpg").exists());
    assert!(dir.join("sheets").join("cluster_0001.jpg").exists());

    let grouped0 = dir.join("grouped").join("cluster_0000");
    assert!(grouped0.join("canonical.txt").exists());
    let marker = fs::read_to_string(grouped0.join("canonical.txt")).unwrap();
    assert_eq!(marker.trim(), "a.png");
    assert!(grouped0.join("a.png").exists());
    assert!(grouped0.join("b.png").exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn empty_input_directory_is_fatal() {
    let dir = fixture_dir("empty");
    let config = test_config(&dir, &dir.join("clusters.csv"));
    assert!(run_dedupe(&config).is_err());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn respects_max_images_cap() {
    let dir = fixture_dir("cap");
    write_fixtures(&dir);

    let csv_path = dir.join("clusters.csv");
    let mut config = test_config(&dir, &csv_path);
    config.max_images = 2;

    let summary = run_dedupe(&config).unwrap();
    // Sorted order keeps a.png and b.png, which form one cluster
    assert_eq!(summary.images_processed, 2);
    assert_eq!(summary.clusters_formed, 1);

    let _ = fs::remove_dir_all(&dir);
}
