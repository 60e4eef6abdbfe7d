//! Configuration surface.
//!
//! The split configuration arrives as JSON from whatever shell drives the
//! engine (CLI flags are folded into the same struct). Field names are
//! camelCase on the wire; absent fields take defaults.

use crate::ghostscript::Preset;
use crate::planner::SplitStrategy;
use crate::splitter::SplitOptions;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// What `splitValue` means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    /// `splitValue` is the number of parts.
    Parts,
    /// `splitValue` is the maximum pages per part.
    Pages,
    /// `splitValue` is the target size per part, in megabytes.
    Size,
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitMode::Parts => f.write_str("parts"),
            SplitMode::Pages => f.write_str("pages"),
            SplitMode::Size => f.write_str("size"),
        }
    }
}

/// Unknown split mode label.
#[derive(Debug, Error)]
#[error("unknown split mode '{0}' (choose from: parts, pages, size)")]
pub struct UnknownSplitMode(String);

impl FromStr for SplitMode {
    type Err = UnknownSplitMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parts" => Ok(SplitMode::Parts),
            "pages" => Ok(SplitMode::Pages),
            "size" => Ok(SplitMode::Size),
            other => Err(UnknownSplitMode(other.to_string())),
        }
    }
}

/// One batch run's settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitConfig {
    #[serde(default = "default_mode")]
    pub split_mode: SplitMode,

    /// Part count, max pages, or target megabytes depending on `splitMode`.
    #[serde(default = "default_split_value")]
    pub split_value: u64,

    /// `None` (absent, `null`, `""` or `"none"`) disables compression.
    #[serde(default, deserialize_with = "deserialize_compression")]
    pub compression: Option<Preset>,

    /// Compression worker count; clamped to `[1, 8]` downstream.
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default)]
    pub remove_images: bool,

    #[serde(default)]
    pub repair_only: bool,

    #[serde(default = "default_output_folder")]
    pub output_folder: PathBuf,
}

fn default_mode() -> SplitMode {
    SplitMode::Parts
}

fn default_split_value() -> u64 {
    4
}

fn default_workers() -> usize {
    2
}

fn default_output_folder() -> PathBuf {
    PathBuf::from("./output")
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            split_mode: default_mode(),
            split_value: default_split_value(),
            compression: None,
            workers: default_workers(),
            remove_images: false,
            repair_only: false,
            output_folder: default_output_folder(),
        }
    }
}

fn deserialize_compression<'de, D>(deserializer: D) -> Result<Option<Preset>, D::Error>
where
    D: Deserializer<'de>,
{
    let label = Option::<String>::deserialize(deserializer)?;
    match label.as_deref() {
        None | Some("") | Some("none") => Ok(None),
        Some(other) => other
            .parse::<Preset>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl SplitConfig {
    /// Parse a JSON configuration payload.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The partition strategy this configuration selects.
    pub fn strategy(&self) -> SplitStrategy {
        match self.split_mode {
            SplitMode::Parts => SplitStrategy::Parts(self.split_value as usize),
            SplitMode::Pages => SplitStrategy::MaxPages(self.split_value as usize),
            SplitMode::Size => SplitStrategy::TargetSize(self.split_value * 1024 * 1024),
        }
    }

    /// Per-document options derived from this configuration.
    pub fn split_options(&self) -> SplitOptions {
        SplitOptions {
            compression: self.compression,
            workers: self.workers,
            remove_images: self.remove_images,
            repair_only: self.repair_only,
        }
    }
}
