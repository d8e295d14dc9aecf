//! Run configuration
//!
//! Loaded from a TOML file; every field has a default so a file only
//! needs the dataset paths it uses:
//!
//! ```toml
//! musdb18hq_path = "/data/musdb18hq"
//! medleydb_path = "/data/MedleyDB"
//! output = "/data/aggregated"
//! profile = "vdbo+gp"
//! workers = 8
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_output() -> PathBuf {
    PathBuf::from("./output")
}

fn default_profile() -> String {
    "vdbo".to_string()
}

fn default_workers() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AggregateConfig {
    pub musdb18hq_path: Option<PathBuf>,
    pub medleydb_path: Option<PathBuf>,
    pub moisesdb_path: Option<PathBuf>,
    pub output: PathBuf,
    /// Profile name from the rule document
    pub profile: String,
    pub workers: usize,
    /// Write `<category>/<collection>/<name>.wav` instead of `<category>/<name>.wav`
    pub group_by_dataset: bool,
    /// Keep tracks whose stems bleed into each other
    pub include_bleed: bool,
    pub include_mixtures: bool,
    pub dry_run: bool,
    /// Replacement rule document; the built-in rules are used when unset
    pub rules: Option<PathBuf>,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            musdb18hq_path: None,
            medleydb_path: None,
            moisesdb_path: None,
            output: default_output(),
            profile: default_profile(),
            workers: default_workers(),
            group_by_dataset: false,
            include_bleed: false,
            include_mixtures: false,
            dry_run: false,
            rules: None,
        }
    }
}

impl AggregateConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::from_io(path, e))?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Worker count, never zero
    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }

    pub fn has_any_collection(&self) -> bool {
        self.musdb18hq_path.is_some()
            || self.medleydb_path.is_some()
            || self.moisesdb_path.is_some()
    }

    /// Check the configuration before any work starts
    pub fn validate(&self) -> Result<()> {
        if !self.has_any_collection() {
            return Err(Error::Config(
                "no dataset paths configured (musdb18hq_path, medleydb_path, moisesdb_path)"
                    .to_string(),
            ));
        }
        for path in [&self.musdb18hq_path, &self.medleydb_path, &self.moisesdb_path]
            .into_iter()
            .flatten()
        {
            if !path.is_dir() {
                return Err(Error::Config(format!(
                    "dataset path {} is not a directory",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}
