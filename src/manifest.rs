//! Run records and the metadata files they end up in
//!
//! Layout under `<output>/metadata/`:
//! - `manifest.json`: one [`ManifestEntry`] per output file, sorted by path
//! - `errors.json`: skipped tracks and stems
//! - `exclusions.json`: tracks that were deliberately left out
//! - `overlap_registry.json`, `splits.json`: the lock stores
//! - `config.json`: the effective configuration
//! - `report.json`: the last run's [`RunReport`]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::collections::{CollectionId, TrackId};
use crate::error::Result;
use crate::splits::Split;
use crate::writer::write_atomic;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const ERRORS_FILE: &str = "errors.json";
pub const EXCLUSIONS_FILE: &str = "exclusions.json";
pub const OVERLAP_FILE: &str = "overlap_registry.json";
pub const SPLITS_FILE: &str = "splits.json";
pub const CONFIG_FILE: &str = "config.json";
pub const REPORT_FILE: &str = "report.json";

pub const FLAG_SILENT: &str = "silent";
pub const FLAG_BLEED: &str = "bleed";
pub const FLAG_EXCLUDED_OVERRIDE: &str = "excluded_override";
pub const FLAG_MIXTURE: &str = "mixture";

/// Provenance of one output file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Relative to the output root, `/`-separated
    pub path: String,
    pub collection: CollectionId,
    pub track: String,
    pub artist: String,
    pub title: String,
    pub split: Split,
    /// Output category, or `mixture`
    pub category: String,
    pub profile: String,
    pub license: String,
    /// Contributing stem ids
    pub stems: Vec<String>,
    pub is_composite: bool,
    pub duration_seconds: f64,
    pub flags: BTreeSet<String>,
}

/// Where in the run a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discover,
    Compose,
    Write,
}

/// One skipped track or stem
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub track: TrackId,
    /// `None` when the whole track was skipped
    pub stem: Option<String>,
    pub stage: Stage,
    pub error: String,
}

impl ErrorRecord {
    pub fn track(track: TrackId, stage: Stage, error: impl ToString) -> Self {
        Self {
            track,
            stem: None,
            stage,
            error: error.to_string(),
        }
    }

    pub fn stem(
        track: TrackId,
        stem: impl Into<String>,
        stage: Stage,
        error: impl ToString,
    ) -> Self {
        Self {
            track,
            stem: Some(stem.into()),
            stage,
            error: error.to_string(),
        }
    }

    pub fn is_track_level(&self) -> bool {
        self.stem.is_none()
    }
}

/// Why a track produced no output on purpose
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExclusionKind {
    Override { reason: Option<String> },
    Bleed,
    AllStemsExcluded,
    /// Benchmark copy of a track whose audio comes from another collection
    Duplicate { audio_from: TrackId },
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExclusionRecord {
    pub track: TrackId,
    pub reason: ExclusionKind,
}

/// Append-only log shared by workers
#[derive(Debug, Default)]
pub struct RunLog {
    errors: Mutex<Vec<ErrorRecord>>,
    exclusions: Mutex<Vec<ExclusionRecord>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&self, record: ErrorRecord) {
        self.errors.lock().push(record);
    }

    pub fn exclusion(&self, record: ExclusionRecord) {
        self.exclusions.lock().push(record);
    }

    /// Sorted records, independent of worker interleaving
    pub fn into_records(self) -> (Vec<ErrorRecord>, Vec<ExclusionRecord>) {
        let mut errors = self.errors.into_inner();
        let mut exclusions = self.exclusions.into_inner();
        errors.sort();
        exclusions.sort();
        (errors, exclusions)
    }
}

/// Counts for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub tracks_discovered: usize,
    pub tracks_processed: usize,
    pub tracks_deduplicated: usize,
    pub tracks_excluded: usize,
    pub tracks_skipped: usize,
    pub stems_skipped: usize,
    pub files_written: usize,
    pub files_skipped_existing: usize,
    pub files_silent: usize,
    pub files_composite: usize,
    pub temp_files_removed: usize,
    pub splits_created: usize,
    pub cancelled: bool,
    pub tracks_per_split: BTreeMap<Split, usize>,
    pub tracks_per_collection: BTreeMap<CollectionId, usize>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tracks discovered:      {}", self.tracks_discovered)?;
        for (collection, count) in &self.tracks_per_collection {
            writeln!(f, "  {:<20}  {}", collection, count)?;
        }
        writeln!(f, "Tracks processed:       {}", self.tracks_processed)?;
        for (split, count) in &self.tracks_per_split {
            writeln!(f, "  {:<20}  {}", split, count)?;
        }
        writeln!(f, "Deduplicated:           {}", self.tracks_deduplicated)?;
        writeln!(f, "Excluded:               {}", self.tracks_excluded)?;
        writeln!(f, "Skipped tracks:         {}", self.tracks_skipped)?;
        writeln!(f, "Skipped stems:          {}", self.stems_skipped)?;
        writeln!(f, "Files written:          {}", self.files_written)?;
        writeln!(f, "Files already complete: {}", self.files_skipped_existing)?;
        writeln!(f, "Silent files:           {}", self.files_silent)?;
        write!(f, "Composite files:        {}", self.files_composite)?;
        if self.cancelled {
            write!(f, "\nRun was cancelled before all tracks were processed")?;
        }
        Ok(())
    }
}

/// Writes the JSON files under `<output>/metadata/`
#[derive(Debug, Clone)]
pub struct MetadataWriter {
    dir: PathBuf,
}

impl MetadataWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn write_json<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(value)?;
        write_atomic(&self.path(file), &json)
    }

    /// Merge `entries` into the manifest on disk, keyed by path
    ///
    /// Files skipped because a previous run wrote them keep their entry.
    pub fn write_manifest(&self, entries: &[ManifestEntry]) -> Result<()> {
        let mut merged: BTreeMap<String, ManifestEntry> = self
            .read_manifest()?
            .into_iter()
            .map(|e| (e.path.clone(), e))
            .collect();
        for entry in entries {
            merged.insert(entry.path.clone(), entry.clone());
        }
        let sorted: Vec<&ManifestEntry> = merged.values().collect();
        self.write_json(MANIFEST_FILE, &sorted)
    }

    pub fn read_manifest(&self) -> Result<Vec<ManifestEntry>> {
        match std::fs::read(self.path(MANIFEST_FILE)) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(crate::error::Error::from_io(self.path(MANIFEST_FILE), e)),
        }
    }

    pub fn write_errors(&self, errors: &[ErrorRecord]) -> Result<()> {
        self.write_json(ERRORS_FILE, errors)
    }

    pub fn write_exclusions(&self, exclusions: &[ExclusionRecord]) -> Result<()> {
        self.write_json(EXCLUSIONS_FILE, exclusions)
    }

    pub fn write_config<T: Serialize>(&self, config: &T) -> Result<()> {
        self.write_json(CONFIG_FILE, config)
    }

    pub fn write_report(&self, report: &RunReport) -> Result<()> {
        self.write_json(REPORT_FILE, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, category: &str) -> ManifestEntry {
        ManifestEntry {
            path: path.to_string(),
            collection: CollectionId::medleydb(),
            track: "A_B".into(),
            artist: "A".into(),
            title: "B".into(),
            split: Split::Train,
            category: category.into(),
            profile: "vdbo".into(),
            license: CollectionId::medleydb().license().into(),
            stems: vec!["S01".into()],
            is_composite: false,
            duration_seconds: 1.0,
            flags: BTreeSet::new(),
        }
    }

    #[test]
    fn test_manifest_merges_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MetadataWriter::new(dir.path().join("metadata"));

        writer
            .write_manifest(&[entry("vocals/b.wav", "vocals"), entry("drums/a.wav", "drums")])
            .unwrap();
        writer.write_manifest(&[entry("bass/c.wav", "bass")]).unwrap();

        let paths: Vec<_> = writer
            .read_manifest()
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(paths, vec!["bass/c.wav", "drums/a.wav", "vocals/b.wav"]);
    }

    #[test]
    fn test_run_log_sorted() {
        let log = RunLog::new();
        log.error(ErrorRecord::track(TrackId::new("moisesdb", "b"), Stage::Compose, "x"));
        log.error(ErrorRecord::stem(TrackId::new("medleydb", "a"), "S01", Stage::Compose, "y"));
        log.exclusion(ExclusionRecord {
            track: TrackId::new("medleydb", "c"),
            reason: ExclusionKind::Bleed,
        });
        let (errors, exclusions) = log.into_records();
        assert_eq!(errors[0].track.collection, CollectionId::medleydb());
        assert!(!errors[0].is_track_level());
        assert_eq!(exclusions.len(), 1);
    }

    #[test]
    fn test_exclusion_serialization() {
        let json = serde_json::to_value(ExclusionKind::Override {
            reason: Some("clipped".into()),
        })
        .unwrap();
        assert_eq!(json["kind"], "override");
        assert_eq!(json["reason"], "clipped");
    }

    #[test]
    fn test_report_display() {
        let report = RunReport {
            files_written: 3,
            cancelled: true,
            ..Default::default()
        };
        let text = report.to_string();
        assert!(text.contains("Files written:          3"));
        assert!(text.contains("cancelled"));
    }
}
