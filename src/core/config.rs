use crate::formats::HeaderFormat;
use crate::pipeline::{DEFAULT_BATCH_SIZE, DEFAULT_CHANNEL_CAPACITY};
use crate::{ObiError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming a default taxonomy.
pub const TAXONOMY_ENV: &str = "OBIKIT_TAXONOMY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub format: FormatConfig,
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Worker threads per stage, 0 for the hardware parallelism.
    #[serde(default)]
    pub workers: usize,
    /// Parsing threads, 0 to use `workers`.
    #[serde(default)]
    pub read_workers: usize,
    /// Fraction of the physical memory the pipeline may use, 0 to disable
    /// the limit.
    #[serde(default)]
    pub memory_fraction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatConfig {
    #[serde(default = "default_quality_shift")]
    pub input_quality_shift: u8,
    #[serde(default = "default_quality_shift")]
    pub output_quality_shift: u8,
    #[serde(default = "default_na")]
    pub na_value: String,
    #[serde(default = "default_csv_separator")]
    pub csv_separator: String,
    /// 0 writes each FASTA sequence on one line.
    #[serde(default)]
    pub fasta_line_width: usize,
    #[serde(default)]
    pub header_format: HeaderFormat,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    /// NCBI taxdump directory or CSV file.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub fail_on_error: bool,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_quality_shift() -> u8 {
    crate::formats::DEFAULT_QUALITY_SHIFT
}

fn default_na() -> String {
    "NA".to_string()
}

fn default_csv_separator() -> String {
    ",".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            channel_capacity: default_channel_capacity(),
            workers: 0,
            read_workers: 0,
            memory_fraction: 0.0,
        }
    }
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            input_quality_shift: default_quality_shift(),
            output_quality_shift: default_quality_shift(),
            na_value: default_na(),
            csv_separator: default_csv_separator(),
            fasta_line_width: 0,
            header_format: HeaderFormat::Obi,
        }
    }
}

impl Config {
    /// Checks the values serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.batch_size == 0 {
            return Err(ObiError::Config("pipeline.batch_size must be positive".to_string()));
        }
        if self.pipeline.channel_capacity == 0 {
            return Err(ObiError::Config("pipeline.channel_capacity must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.pipeline.memory_fraction) {
            return Err(ObiError::Config(format!(
                "pipeline.memory_fraction must lie in [0, 1], got {}",
                self.pipeline.memory_fraction
            )));
        }
        if self.format.csv_separator.len() != 1 {
            return Err(ObiError::Config(format!(
                "format.csv_separator must be a single byte, got `{}`",
                self.format.csv_separator
            )));
        }
        Ok(())
    }

    pub fn csv_separator(&self) -> u8 {
        self.format.csv_separator.bytes().next().unwrap_or(b',')
    }

    /// Configured taxonomy, or the one named by `OBIKIT_TAXONOMY`.
    pub fn taxonomy_path(&self) -> Option<PathBuf> {
        self.taxonomy.path.clone().or_else(|| {
            std::env::var(TAXONOMY_ENV)
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
        })
    }
}

pub fn default_config() -> Config {
    Config::default()
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| ObiError::Config(format!("Failed to parse config: {}", e)))?;
    config.validate()?;
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(path: P, config: &Config) -> Result<()> {
    let contents = toml::to_string_pretty(config)
        .map_err(|e| ObiError::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, contents)?;
    Ok(())
}
