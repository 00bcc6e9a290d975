use layout_dedupe::config::{load_config, Config, RunMode};
use layout_dedupe::distance::{self, DistanceWeights};
use layout_dedupe::features;
use layout_dedupe::pipeline;
use layout_dedupe::preprocess;
use image::GenericImageView;
use std::env;
use std::path::{Path, PathBuf};

// Main application
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Get command line arguments
    let args: Vec<String> = env::args().collect();

    // If no arguments provided, run the default mode from config
    if args.len() <= 1 {
        return run_from_config();
    }

    // Handle different commands
    match args[1].as_str() {
        "dedupe" => {
            // Load configuration
            let mut config = load_config()?;
            init_logging(&config);

            // Override input directory and output CSV if provided
            if args.len() > 2 {
                config.input_directory = args[2].clone();
            }
            if args.len() > 3 {
                config.output_csv = args[3].clone();
            }

            // Run deduplication
            pipeline::run_dedupe(&config)?;
        },
        "compare" => {
            if args.len() < 4 {
                println!("Usage: layout-dedupe compare <image1> <image2>");
                return Ok(());
            }

            let img1_path = &args[2];
            let img2_path = &args[3];

            // Load configuration for comparison settings
            let config = load_config()?;
            init_logging(&config);

            // Compare the images
            compare_images(img1_path, img2_path, &config)?;
        },
        "config" => {
            if args.len() < 3 {
                println!("Usage: layout-dedupe config <command> [args]");
                println!("Commands:");
                println!("  create - Create default configuration file");
                println!("  show   - Show current configuration");
                println!("  check  - Check configuration settings");
                println!("  set <key> <value> - Modify a configuration setting");
                return Ok(());
            }

            match args[2].as_str() {
                "create" => create_config()?,
                "show" => show_config()?,
                "check" => check_config()?,
                "set" => {
                    if args.len() < 5 {
                        println!("Usage: layout-dedupe config set <key> <value>");
                        return Ok(());
                    }
                    set_config(&args[3], &args[4])?;
                },
                _ => {
                    println!("Unknown config command: {}", args[2]);
                }
            }
        },
        "help" => {
            print_help();
        },
        _ => {
            println!("Unknown command: {}", args[1]);
            print_help();
        }
    }

    Ok(())
}

/// Run the appropriate mode based on configuration
fn run_from_config() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = load_config()?;
    init_logging(&config);

    println!("Running mode from configuration: {:?}", config.run_mode);

    // Check which mode to run
    match config.run_mode {
        RunMode::Dedupe => {
            pipeline::run_dedupe(&config)?;
            Ok(())
        },
        RunMode::Compare => {
            let img1_path = config.mode_options.compare.image1.clone();
            let img2_path = config.mode_options.compare.image2.clone();
            println!("Comparing images: {} and {}", img1_path, img2_path);
            compare_images(&img1_path, &img2_path, &config)
        }
    }
}

/// Initialize the logger from the configured level, unless RUST_LOG overrides it
fn init_logging(config: &Config) {
    let default_level = if config.verbose { "debug" } else { config.log_level.as_str() };
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_level),
    );
    // Ignore the error if a logger was already installed
    let _ = builder.try_init();
}

/// Compare two images and print the per-component and combined distances
fn compare_images(img1_path: &str, img2_path: &str, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    // Same guard as the batch path; zero-sum weights would make the
    // renormalized combination NaN.
    config.validate()?;

    println!("Comparing images:");
    println!("  1: {}", img1_path);
    println!("  2: {}", img2_path);

    let masker = preprocess::select_masker(config.mask_text, &config.ocr_lang);

    let feats1 = extract_one(img1_path, config, masker.as_ref())?;
    let feats2 = extract_one(img2_path, config, masker.as_ref())?;

    let weights = DistanceWeights::new(config.alpha, config.beta, config.gamma);

    let hash_d = distance::hash_distance(&feats1, &feats2);
    let edge_d = distance::cosine_distance(&feats1.edge_signature, &feats2.edge_signature);
    let proj_d = distance::projection_distance(&feats1, &feats2);
    let combined = distance::combined_distance(&feats1, &feats2, &weights);

    println!("Hash distance:       {:.6}", hash_d);
    println!("Edge distance:       {:.6}", edge_d);
    println!("Projection distance: {:.6}", proj_d);
    println!("Combined distance:   {:.6}", combined);

    if combined <= config.eps {
        println!("Result: layouts are SIMILAR (within eps of {:.2})", config.eps);
    } else {
        println!("Result: layouts are DIFFERENT (outside eps of {:.2})", config.eps);
    }

    Ok(())
}

/// Load, normalize and fingerprint a single image
fn extract_one(
    path: &str,
    config: &Config,
    masker: &dyn preprocess::TextMasker,
) -> Result<features::ImageFeatures, Box<dyn std::error::Error>> {
    let image = preprocess::load_image(Path::new(path))?;
    let (orig_w, orig_h) = image.dimensions();
    let normalized = preprocess::normalize_image(image, config.resize_width, config.crop_top, config.crop_bottom);
    let normalized = masker.mask(normalized);
    Ok(features::extract_features(
        PathBuf::from(path),
        &normalized,
        orig_w,
        orig_h,
        config.edge_sig_size,
    ))
}

/// Create default configuration file
fn create_config() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    config.save_to_file("config.json")?;
    println!("Created default configuration file: config.json");
    Ok(())
}

/// Show current configuration
fn show_config() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    println!("{:#?}", config);
    Ok(())
}

/// Check configuration settings
fn check_config() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;

    println!("Configuration check:");
    println!("  Input directory: {}", config.get_input_dir().display());
    println!("  File glob: {}", config.file_glob);
    println!("  Output CSV: {}", config.get_output_csv().display());
    println!("  Resize width: {}", config.resize_width);
    println!("  Edge signature size: {}", config.edge_sig_size);
    println!("  eps: {:.3}, min_samples: {}", config.eps, config.min_samples);
    println!("  Weights: alpha={:.2}, beta={:.2}, gamma={:.2}", config.alpha, config.beta, config.gamma);

    match config.validate() {
        Ok(()) => println!("  Validation: OK"),
        Err(e) => println!("  Validation: FAILED ({})", e),
    }

    if !config.get_input_dir().exists() {
        println!("  Warning: input directory does not exist");
    }

    Ok(())
}

/// Set configuration setting
fn set_config(key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config()?;

    // Update configuration based on key
    match key {
        "input_directory" => {
            config.input_directory = value.to_string();
        },
        "file_glob" => {
            config.file_glob = value.to_string();
        },
        "output_csv" => {
            config.output_csv = value.to_string();
        },
        "clusters_dir" => {
            config.clusters_dir = value.to_string();
        },
        "contact_sheets_dir" => {
            config.contact_sheets_dir = value.to_string();
        },
        "resize_width" => {
            let width = value.parse::<u32>()?;
            if width == 0 {
                return Err("resize_width must be at least 1".into());
            }
            config.resize_width = width;
        },
        "crop_top" => {
            config.crop_top = value.parse::<u32>()?;
        },
        "crop_bottom" => {
            config.crop_bottom = value.parse::<u32>()?;
        },
        "mask_text" => {
            config.mask_text = value.parse::<bool>()?;
        },
        "ocr_lang" => {
            config.ocr_lang = value.to_string();
        },
        "edge_sig_size" => {
            let size = value.parse::<u32>()?;
            if size < 2 {
                return Err("edge_sig_size must be at least 2".into());
            }
            config.edge_sig_size = size;
        },
        "eps" => {
            let eps = value.parse::<f64>()?;
            if eps <= 0.0 {
                return Err("eps must be positive".into());
            }
            config.eps = eps;
        },
        "min_samples" => {
            let n = value.parse::<usize>()?;
            if n == 0 {
                return Err("min_samples must be at least 1".into());
            }
            config.min_samples = n;
        },
        "alpha" => {
            config.alpha = value.parse::<f64>()?;
        },
        "beta" => {
            config.beta = value.parse::<f64>()?;
        },
        "gamma" => {
            config.gamma = value.parse::<f64>()?;
        },
        "max_images" => {
            config.max_images = value.parse::<usize>()?;
        },
        "log_level" => {
            config.log_level = value.to_string();
        },
        _ => {
            return Err(format!("Unknown configuration key: {}", key).into());
        }
    }

    config.validate()?;

    // Save updated configuration
    config.save_to_file("config.json")?;
    println!("Updated configuration saved");
    Ok(())
}

/// Print help information
fn print_help() {
    println!("Layout Dedupe - Screenshot Layout Clustering Tool");
    println!();
    println!("Commands:");
    println!("  dedupe [input_dir] [output_csv]  - Cluster screenshots by page layout");
    println!("  compare <image1> <image2>        - Compare two screenshots and show layout distances");
    println!("  config <subcommand>              - Manage configuration");
    println!("  help                             - Show this help message");
    println!();
    println!("Running without arguments:");
    println!("  The application will run according to the \"run_mode\" setting in config.json");
    println!("  All configuration for modes can be specified in the \"mode_options\" section");
    println!();
    println!("Available run_mode values:");
    println!("  - dedupe");
    println!("  - compare");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_rejects_zero_weight_config() {
        let mut config = Config::default();
        config.alpha = 0.0;
        config.beta = 0.0;
        config.gamma = 0.0;
        // Fails validation before any file is touched, so distances are
        // never computed from a zero weight sum.
        let result = compare_images("no_such_a.png", "no_such_b.png", &config);
        assert!(result.unwrap_err().to_string().contains("weight"));
    }

    #[test]
    fn compare_rejects_negative_weight_config() {
        let mut config = Config::default();
        config.beta = -0.5;
        let result = compare_images("no_such_a.png", "no_such_b.png", &config);
        assert!(result.unwrap_err().to_string().contains("non-negative"));
    }
}
