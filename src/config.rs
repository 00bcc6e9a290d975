use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Available run modes for the application
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Default layout deduplication batch run
    Dedupe,
    /// Compare two specific images
    Compare,
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::Dedupe
    }
}

/// Mode-specific options for Compare
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CompareOptions {
    #[serde(default = "default_compare_image1")]
    pub image1: String,
    #[serde(default = "default_compare_image2")]
    pub image2: String,
}

impl Default for CompareOptions {
    fn default() -> Self {
        CompareOptions {
            image1: default_compare_image1(),
            image2: default_compare_image2(),
        }
    }
}

/// Holds all mode-specific configuration options
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ModeOptions {
    #[serde(default)]
    pub compare: CompareOptions,
}

/// Application configuration structure that matches config.json
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    // Input/output paths
    pub input_directory: String,
    /// Filename pattern; supports `*`, `?` and `[...]` character classes
    #[serde(default = "default_file_glob")]
    pub file_glob: String,
    #[serde(default = "default_output_csv")]
    pub output_csv: String,
    /// Optional directory for per-cluster symlink directories (empty = off)
    #[serde(default)]
    pub clusters_dir: String,
    /// Optional directory for per-cluster contact sheets (empty = off)
    #[serde(default)]
    pub contact_sheets_dir: String,

    // Normalization settings
    #[serde(default = "default_resize_width")]
    pub resize_width: u32,
    #[serde(default)]
    pub crop_top: u32,
    #[serde(default)]
    pub crop_bottom: u32,
    #[serde(default)]
    pub mask_text: bool,
    #[serde(default = "default_ocr_lang")]
    pub ocr_lang: String,

    // Fingerprint settings
    #[serde(default = "default_edge_sig_size")]
    pub edge_sig_size: u32,

    // Clustering settings
    #[serde(default = "default_eps")]
    pub eps: f64,
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    // Distance weights (renormalized to sum to 1 before use)
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_beta")]
    pub beta: f64,
    #[serde(default = "default_gamma")]
    pub gamma: f64,

    // General settings
    #[serde(default)]
    pub max_images: usize,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // Mode selection and options
    #[serde(default)]
    pub run_mode: RunMode,
    #[serde(default)]
    pub mode_options: ModeOptions,
}

// Default functions for parameters
fn default_file_glob() -> String {
    "*.png".to_string()
}

fn default_output_csv() -> String {
    "layout_clusters.csv".to_string()
}

fn default_resize_width() -> u32 {
    1024
}

fn default_ocr_lang() -> String {
    "eng".to_string()
}

fn default_edge_sig_size() -> u32 {
    64
}

fn default_eps() -> f64 {
    0.33
}

fn default_min_samples() -> usize {
    1
}

// Design defaults; tunable, not derived from labeled ground truth.
fn default_alpha() -> f64 {
    0.55
}

fn default_beta() -> f64 {
    0.35
}

fn default_gamma() -> f64 {
    0.10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_compare_image1() -> String {
    "screens/image1.png".to_string()
}

fn default_compare_image2() -> String {
    "screens/image2.png".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_json::from_reader(reader)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Get the input directory
    pub fn get_input_dir(&self) -> PathBuf {
        PathBuf::from(&self.input_directory)
    }

    /// Get the output CSV path
    pub fn get_output_csv(&self) -> PathBuf {
        PathBuf::from(&self.output_csv)
    }

    /// Get the clusters directory, if enabled
    pub fn get_clusters_dir(&self) -> Option<PathBuf> {
        if self.clusters_dir.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.clusters_dir))
        }
    }

    /// Get the contact sheets directory, if enabled
    pub fn get_contact_sheets_dir(&self) -> Option<PathBuf> {
        if self.contact_sheets_dir.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.contact_sheets_dir))
        }
    }

    /// Check settings that would break the pipeline in the hot path.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.alpha < 0.0 || self.beta < 0.0 || self.gamma < 0.0 {
            return Err("Distance weights must be non-negative".into());
        }
        if self.alpha + self.beta + self.gamma == 0.0 {
            return Err("At least one distance weight must be positive".into());
        }
        if self.eps <= 0.0 {
            return Err("eps must be positive".into());
        }
        if self.min_samples == 0 {
            return Err("min_samples must be at least 1".into());
        }
        if self.resize_width == 0 {
            return Err("resize_width must be at least 1".into());
        }
        if self.edge_sig_size < 2 {
            return Err("edge_sig_size must be at least 2".into());
        }
        Ok(())
    }

    /// Get the default configuration
    pub fn default() -> Self {
        Self {
            input_directory: "screens".to_string(),
            file_glob: default_file_glob(),
            output_csv: default_output_csv(),
            clusters_dir: String::new(),
            contact_sheets_dir: String::new(),
            resize_width: default_resize_width(),
            crop_top: 0,
            crop_bottom: 0,
            mask_text: false,
            ocr_lang: default_ocr_lang(),
            edge_sig_size: default_edge_sig_size(),
            eps: default_eps(),
            min_samples: default_min_samples(),
            alpha: default_alpha(),
            beta: default_beta(),
            gamma: default_gamma(),
            max_images: 0,
            verbose: false,
            log_level: default_log_level(),
            run_mode: RunMode::Dedupe,
            mode_options: ModeOptions::default(),
        }
    }
}

/// Load the configuration, creating a default one if it doesn't exist
pub fn load_config() -> Result<Config, Box<dyn std::error::Error>> {
    let config_path = "config.json";

    if !std::path::Path::new(config_path).exists() {
        let default_config = Config::default();
        default_config.save_to_file(config_path)?;
        println!("Created default configuration file: {}", config_path);
    }

    let mut config = Config::from_file(config_path)?;
    if config.log_level.is_empty() {
        config.log_level = default_log_level();
    }

    Ok(config)
}
