//! Run orchestration
//!
//! A run goes through these stages in order:
//!
//! 1. delete `*.tmp` leftovers of an interrupted run
//! 2. discover tracks in every collection
//! 3. drop benchmark copies of overlapping tracks
//! 4. lock a split for every remaining track and persist the lock
//! 5. drop tracks excluded by override or for bleed
//! 6. compose and write each track on a bounded worker pool
//! 7. write the metadata files
//!
//! A track whose files an earlier run already completed is recognised from
//! the manifest and file headers and is not decoded again.
//!
//! Workers own whole tracks, so no two workers ever write the same path.
//! [`Pipeline::cancel`] stops the run between tracks; tracks already in
//! flight finish their writes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use crate::audio::AudioBuffer;
use crate::collections::{
    CollectionId, MedleyDb, MoisesDb, Musdb18Hq, SourceCollection, TrackDescriptor, TrackId,
};
use crate::compositor::compose;
use crate::config::AggregateConfig;
use crate::error::{Error, Result};
use crate::manifest::{
    ErrorRecord, ExclusionKind, ExclusionRecord, ManifestEntry, MetadataWriter, RunLog, RunReport,
    Stage, FLAG_BLEED, FLAG_EXCLUDED_OVERRIDE, FLAG_MIXTURE, FLAG_SILENT, OVERLAP_FILE,
    SPLITS_FILE,
};
use crate::mapping::{ExclusionReason, Resolver};
use crate::naming::FilenamePlanner;
use crate::overlap::{resolve_overlaps, OverlapRegistry, OverlapResolution, OverlapTable};
use crate::profile::Profile;
use crate::rules::RuleSet;
use crate::splits::{Split, SplitStore};
use crate::writer::{OutputLayout, WriteCoordinator, WriteOutcome, MIXTURE_DIR};

/// A track that will be composed, with its locked split and file name
#[derive(Debug, Clone)]
pub struct PlannedTrack {
    pub track: TrackDescriptor,
    pub split: Split,
    /// Base name shared by all of the track's output files
    pub name: String,
}

/// Everything decided before audio is touched
#[derive(Debug, Default)]
pub struct Plan {
    /// Tracks to compose, ordered by collection and index
    pub tracks: Vec<PlannedTrack>,
    pub tracks_discovered: usize,
    pub discovered_per_collection: BTreeMap<CollectionId, usize>,
    /// Tracks whose metadata could not be read
    pub tracks_malformed: usize,
    /// Listed stems with no usable audio file or label
    pub stems_unusable: usize,
    pub tracks_deduplicated: usize,
    pub tracks_excluded: usize,
    /// Splits locked for the first time
    pub splits_created: usize,
}

impl Plan {
    pub fn tracks_per_split(&self) -> BTreeMap<Split, usize> {
        let mut counts = BTreeMap::new();
        for planned in &self.tracks {
            *counts.entry(planned.split).or_insert(0) += 1;
        }
        counts
    }

    pub fn tracks_per_collection(&self) -> BTreeMap<CollectionId, usize> {
        let mut counts = BTreeMap::new();
        for planned in &self.tracks {
            *counts.entry(planned.track.collection().clone()).or_insert(0) += 1;
        }
        counts
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tracks discovered:   {}", self.tracks_discovered)?;
        for (collection, count) in &self.discovered_per_collection {
            writeln!(f, "  {:<17}  {}", collection, count)?;
        }
        writeln!(f, "Malformed:           {}", self.tracks_malformed)?;
        writeln!(f, "Unusable stems:      {}", self.stems_unusable)?;
        writeln!(f, "Deduplicated:        {}", self.tracks_deduplicated)?;
        writeln!(f, "Excluded:            {}", self.tracks_excluded)?;
        writeln!(f, "New split locks:     {}", self.splits_created)?;
        write!(f, "Tracks to process:   {}", self.tracks.len())?;
        for (collection, count) in self.tracks_per_collection() {
            write!(f, "\n  {:<17}  {}", collection, count)?;
        }
        for (split, count) in self.tracks_per_split() {
            write!(f, "\n  {:<17}  {}", split, count)?;
        }
        Ok(())
    }
}

/// What one worker did with one track
#[derive(Debug)]
enum TrackOutcome {
    Processed(TrackOutput),
    AllExcluded,
    Skipped,
    Cancelled,
}

#[derive(Debug, Default)]
struct TrackOutput {
    entries: Vec<ManifestEntry>,
    written: usize,
    skipped_existing: usize,
    silent: usize,
    composite: usize,
}

/// One output file of a track
struct OutputFile<'a> {
    dir: &'a str,
    buffer: &'a AudioBuffer,
    stems: Vec<String>,
    is_composite: bool,
    flags: BTreeSet<String>,
}

/// Writes one track's files and collects their manifest entries
struct TrackWriter<'a> {
    planned: &'a PlannedTrack,
    coordinator: &'a WriteCoordinator,
    log: &'a RunLog,
    profile: &'a str,
    output: TrackOutput,
}

impl<'a> TrackWriter<'a> {
    fn write(&mut self, file: OutputFile<'_>) -> Result<()> {
        let track = &self.planned.track;
        let layout = self.coordinator.layout();
        let path = layout.file_path(file.dir, track.collection(), &self.planned.name);
        let relative = relative_path(layout.root(), &path);

        match self.coordinator.write_buffer(&path, file.buffer) {
            Ok(WriteOutcome::Written) => self.output.written += 1,
            Ok(WriteOutcome::SkippedExisting) => self.output.skipped_existing += 1,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(track = %track.id, path = %relative, error = %e, "Failed to write output file");
                self.log.error(ErrorRecord::track(
                    track.id.clone(),
                    Stage::Write,
                    format!("{}: {}", relative, e),
                ));
                return Ok(());
            }
        }

        self.output.entries.push(ManifestEntry {
            path: relative,
            collection: track.collection().clone(),
            track: track.name().to_string(),
            artist: track.artist.clone(),
            title: track.title.clone(),
            split: self.planned.split,
            category: file.dir.to_string(),
            profile: self.profile.to_string(),
            license: track.collection().license().to_string(),
            stems: file.stems,
            is_composite: file.is_composite,
            duration_seconds: file.buffer.duration_seconds(),
            flags: file.flags,
        });
        Ok(())
    }
}

/// Shared, read-only state of one run's workers
struct RunContext<'a> {
    resolver: Resolver<'a>,
    coordinator: &'a WriteCoordinator,
    log: &'a RunLog,
    profile: &'a Profile,
    /// Manifest entries of earlier runs, per track
    previous: HashMap<TrackId, Vec<ManifestEntry>>,
}

/// `/`-separated path of `path` below `root`
fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Effective settings recorded in `config.json`
#[derive(Serialize)]
struct RunSettings<'a> {
    config: &'a AggregateConfig,
    rules_version: u32,
    profile: &'a Profile,
}

pub struct Pipeline {
    config: AggregateConfig,
    rules: RuleSet,
    layout: OutputLayout,
    collections: Vec<Box<dyn SourceCollection>>,
    overlap: OverlapTable,
    cancelled: Arc<AtomicBool>,
}

impl Pipeline {
    /// Pipeline with no collections; add them with [`Pipeline::with_collection`]
    pub fn new(config: AggregateConfig, rules: RuleSet) -> Self {
        let layout = OutputLayout::new(&config.output, config.group_by_dataset);
        Self {
            config,
            rules,
            layout,
            collections: Vec::new(),
            overlap: OverlapTable::musdb_medleydb(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Pipeline over the on-disk collections named in `config`
    pub fn from_config(config: AggregateConfig) -> Result<Self> {
        config.validate()?;
        let rules = match &config.rules {
            Some(path) => RuleSet::from_file(path)?,
            None => RuleSet::builtin()?,
        };
        rules.profile(&config.profile)?;

        let mut pipeline = Self::new(config.clone(), rules);
        if let Some(path) = &config.musdb18hq_path {
            pipeline = pipeline.with_collection(Musdb18Hq::new(path));
        }
        if let Some(path) = &config.medleydb_path {
            pipeline = pipeline.with_collection(MedleyDb::new(path));
        }
        if let Some(path) = &config.moisesdb_path {
            pipeline = pipeline.with_collection(MoisesDb::new(path));
        }
        Ok(pipeline)
    }

    pub fn with_collection(mut self, collection: impl SourceCollection + 'static) -> Self {
        self.collections.push(Box::new(collection));
        self
    }

    pub fn with_overlap_table(mut self, table: OverlapTable) -> Self {
        self.overlap = table;
        self
    }

    pub fn config(&self) -> &AggregateConfig {
        &self.config
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Flag checked by workers before each track
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn profile(&self) -> Result<&Profile> {
        self.rules.profile(&self.config.profile)
    }

    fn metadata(&self) -> MetadataWriter {
        MetadataWriter::new(self.layout.metadata_dir())
    }

    /// Dry run: everything up to composition, without persisting locks
    /// or writing any file
    pub fn plan(&self) -> Result<Plan> {
        self.profile()?;
        let metadata = self.metadata();
        let splits = SplitStore::open(metadata.path(SPLITS_FILE))?;
        let registry = OverlapRegistry::open(metadata.path(OVERLAP_FILE))?;
        self.prepare(&splits, &registry, &RunLog::new())
    }

    fn prepare(
        &self,
        splits: &SplitStore,
        registry: &OverlapRegistry,
        log: &RunLog,
    ) -> Result<Plan> {
        let mut plan = Plan::default();

        let mut discovered = Vec::new();
        for collection in &self.collections {
            collection.validate()?;
            let discovery = collection.discover()?;
            let found = discovery.tracks.len() + discovery.malformed.len();
            plan.tracks_discovered += found;
            *plan
                .discovered_per_collection
                .entry(collection.id())
                .or_insert(0) += found;
            plan.tracks_malformed += discovery.malformed.len();
            for (track, error) in discovery.malformed {
                log.error(ErrorRecord::track(track, Stage::Discover, error));
            }
            plan.stems_unusable += discovery.unusable_stems.len();
            for unusable in discovery.unusable_stems {
                log.error(ErrorRecord::stem(
                    unusable.track,
                    unusable.stem,
                    Stage::Discover,
                    unusable.error,
                ));
            }
            discovered.extend(discovery.tracks);
        }

        let resolution = resolve_overlaps(&self.overlap, discovered);
        let mut resolution = OverlapResolution {
            records: registry.register(resolution.records),
            tracks: resolution.tracks,
        };
        plan.tracks_deduplicated = resolution.records.len();
        for record in &resolution.records {
            log.exclusion(ExclusionRecord {
                track: record.dropped.clone(),
                reason: ExclusionKind::Duplicate {
                    audio_from: record.audio_from.clone(),
                },
            });
        }

        // Excluded tracks get a split and a name too, so toggling an
        // exclusion never shifts anyone else's.
        let assigned = splits.assign_all(&resolution.tracks, &resolution.inherited_splits());
        plan.splits_created = splits.created_count();

        resolution.tracks.sort_by(|a, b| {
            (a.collection(), a.index, a.name()).cmp(&(b.collection(), b.index, b.name()))
        });
        let mut planner = FilenamePlanner::new(self.config.group_by_dataset);
        let overrides = self.rules.overrides();

        for track in resolution.tracks {
            let split = assigned.get(&track.id).copied().unwrap_or(Split::Train);
            let name = planner.reserve(&track, split);

            if let Some(reason) = overrides.track_exclusion(&track.id) {
                tracing::info!(track = %track.id, reason = reason.unwrap_or(""), "Track excluded by override");
                log.exclusion(ExclusionRecord {
                    track: track.id.clone(),
                    reason: ExclusionKind::Override {
                        reason: reason.map(str::to_string),
                    },
                });
                plan.tracks_excluded += 1;
            } else if track.has_bleed && !self.config.include_bleed {
                tracing::info!(track = %track.id, "Track has bleed, excluding");
                log.exclusion(ExclusionRecord {
                    track: track.id.clone(),
                    reason: ExclusionKind::Bleed,
                });
                plan.tracks_excluded += 1;
            } else {
                plan.tracks.push(PlannedTrack { track, split, name });
            }
        }

        Ok(plan)
    }

    /// Run the whole pipeline
    ///
    /// Returns `Err` only for configuration problems and fatal I/O
    /// (storage exhausted, permission denied). Everything written before
    /// a fatal error is complete and is picked up by the next run.
    pub fn run(&self) -> Result<RunReport> {
        let profile = self.profile()?;
        let coordinator = WriteCoordinator::new(self.layout.clone());
        let metadata = self.metadata();

        let mut report = RunReport {
            temp_files_removed: coordinator.cleanup_temp_files()?,
            ..Default::default()
        };

        let splits = SplitStore::open(metadata.path(SPLITS_FILE))?;
        let registry = OverlapRegistry::open(metadata.path(OVERLAP_FILE))?;
        let log = RunLog::new();
        let plan = self.prepare(&splits, &registry, &log)?;

        let mut previous: HashMap<TrackId, Vec<ManifestEntry>> = HashMap::new();
        for entry in metadata.read_manifest()? {
            let id = TrackId::new(entry.collection.clone(), entry.track.clone());
            previous.entry(id).or_default().push(entry);
        }

        // Locks hit the disk before any audio does
        splits.persist()?;
        registry.persist()?;

        report.tracks_discovered = plan.tracks_discovered;
        report.tracks_per_collection = plan.discovered_per_collection.clone();
        report.tracks_deduplicated = plan.tracks_deduplicated;
        report.tracks_excluded = plan.tracks_excluded;
        report.tracks_skipped = plan.tracks_malformed;
        report.splits_created = plan.splits_created;

        let workers = self.config.worker_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| Error::Config(format!("failed to start worker pool: {}", e)))?;

        tracing::info!(tracks = plan.tracks.len(), workers, profile = %profile.name, "Processing tracks");
        let ctx = RunContext {
            resolver: self.rules.resolver(profile),
            coordinator: &coordinator,
            log: &log,
            profile,
            previous,
        };
        let results: Vec<Result<TrackOutcome>> = pool.install(|| {
            plan.tracks
                .par_iter()
                .map(|planned| {
                    if self.is_cancelled() {
                        return Ok(TrackOutcome::Cancelled);
                    }
                    let result = self.process_track(planned, &ctx);
                    if let Err(e) = &result {
                        tracing::error!(track = %planned.track.id, error = %e, "Fatal error, stopping run");
                        self.cancel();
                    }
                    result
                })
                .collect()
        });

        let mut entries = Vec::new();
        let mut fatal = None;
        for (planned, result) in plan.tracks.iter().zip(results) {
            match result {
                Ok(TrackOutcome::Processed(output)) => {
                    report.tracks_processed += 1;
                    *report.tracks_per_split.entry(planned.split).or_insert(0) += 1;
                    report.files_written += output.written;
                    report.files_skipped_existing += output.skipped_existing;
                    report.files_silent += output.silent;
                    report.files_composite += output.composite;
                    entries.extend(output.entries);
                }
                Ok(TrackOutcome::AllExcluded) => report.tracks_excluded += 1,
                Ok(TrackOutcome::Skipped) => report.tracks_skipped += 1,
                Ok(TrackOutcome::Cancelled) => {}
                Err(e) => {
                    fatal.get_or_insert(e);
                }
            }
        }
        report.cancelled = self.is_cancelled();

        drop(ctx);
        let (errors, exclusions) = log.into_records();
        report.stems_skipped = errors.iter().filter(|e| !e.is_track_level()).count();

        let written =
            self.write_metadata(&metadata, &entries, &errors, &exclusions, &report, profile);
        if let Some(e) = fatal {
            if let Err(meta) = written {
                tracing::warn!(error = %meta, "Could not write metadata after fatal error");
            }
            return Err(e);
        }
        written?;

        tracing::info!(
            processed = report.tracks_processed,
            written = report.files_written,
            skipped_existing = report.files_skipped_existing,
            cancelled = report.cancelled,
            "Run finished"
        );
        Ok(report)
    }

    /// Output directories `track` will fill, judged from its labels alone
    fn expected_dirs(&self, track: &TrackDescriptor, resolver: &Resolver<'_>) -> BTreeSet<String> {
        let mut dirs: BTreeSet<String> = track
            .stems
            .iter()
            .filter_map(|stem| {
                resolver
                    .resolve_stem(&track.id, stem)
                    .category_ref()
                    .map(|c| c.as_str().to_string())
            })
            .collect();
        if self.config.include_mixtures && !dirs.is_empty() {
            dirs.insert(MIXTURE_DIR.to_string());
        }
        dirs
    }

    /// Earlier run's output for `planned`, if every file it should have
    /// produced is on disk, complete and in the manifest
    fn completed_output(
        &self,
        planned: &PlannedTrack,
        ctx: &RunContext<'_>,
    ) -> Option<TrackOutput> {
        let track = &planned.track;
        let previous = ctx.previous.get(&track.id)?;
        let dirs = self.expected_dirs(track, &ctx.resolver);
        if dirs.is_empty() || dirs.len() != previous.len() {
            return None;
        }

        let layout = ctx.coordinator.layout();
        let mut output = TrackOutput::default();
        for dir in &dirs {
            let path = layout.file_path(dir, track.collection(), &planned.name);
            let relative = relative_path(layout.root(), &path);
            let entry = previous.iter().find(|e| {
                e.path == relative && e.split == planned.split && e.profile == ctx.profile.name
            })?;
            if !ctx.coordinator.is_complete_file(&path) {
                return None;
            }
            if entry.flags.contains(FLAG_SILENT) {
                output.silent += 1;
            }
            if entry.is_composite && entry.category != MIXTURE_DIR {
                output.composite += 1;
            }
            output.skipped_existing += 1;
            output.entries.push(entry.clone());
        }
        Some(output)
    }

    fn process_track(&self, planned: &PlannedTrack, ctx: &RunContext<'_>) -> Result<TrackOutcome> {
        let track = &planned.track;
        let log = ctx.log;
        if track.stems.is_empty() {
            tracing::warn!(track = %track.id, "Track has no stems, skipping");
            log.error(ErrorRecord::track(track.id.clone(), Stage::Compose, "no stems found"));
            return Ok(TrackOutcome::Skipped);
        }

        if let Some(output) = self.completed_output(planned, ctx) {
            tracing::debug!(track = %track.id, files = output.skipped_existing, "Track already complete");
            return Ok(TrackOutcome::Processed(output));
        }

        let composition = compose(track, &ctx.resolver, self.config.include_mixtures)?;
        for skipped in &composition.skipped {
            log.error(ErrorRecord::stem(
                track.id.clone(),
                skipped.stem.as_str(),
                Stage::Compose,
                &skipped.reason,
            ));
        }

        if composition.nothing_composable() {
            tracing::warn!(track = %track.id, skipped = composition.skipped.len(), "No composable stems, skipping track");
            log.error(ErrorRecord::track(track.id.clone(), Stage::Compose, "no composable stems"));
            return Ok(TrackOutcome::Skipped);
        }
        if composition.all_excluded() {
            tracing::info!(track = %track.id, stems = composition.excluded.len(), "All stems excluded, no output");
            log.exclusion(ExclusionRecord {
                track: track.id.clone(),
                reason: ExclusionKind::AllStemsExcluded,
            });
            return Ok(TrackOutcome::AllExcluded);
        }

        let override_excluded = composition
            .excluded
            .iter()
            .any(|s| s.reason == ExclusionReason::Override);

        let mut writer = TrackWriter {
            planned,
            coordinator: ctx.coordinator,
            log,
            profile: &ctx.profile.name,
            output: TrackOutput::default(),
        };

        for (category, buffer) in &composition.categories {
            let mut flags: BTreeSet<String> =
                buffer.notes.iter().map(|n| n.flag().to_string()).collect();
            if buffer.is_silent() {
                flags.insert(FLAG_SILENT.to_string());
                writer.output.silent += 1;
            }
            if buffer.has_bleed {
                flags.insert(FLAG_BLEED.to_string());
            }
            if override_excluded {
                flags.insert(FLAG_EXCLUDED_OVERRIDE.to_string());
            }
            if buffer.is_composite() {
                writer.output.composite += 1;
            }

            writer.write(OutputFile {
                dir: category.as_str(),
                buffer: &buffer.buffer,
                stems: buffer.stems.clone(),
                is_composite: buffer.is_composite(),
                flags,
            })?;
        }

        if let Some(mixture) = &composition.mixture {
            let mut stems: Vec<String> = composition
                .categories
                .values()
                .flat_map(|b| b.stems.iter().cloned())
                .collect();
            stems.sort();
            writer.write(OutputFile {
                dir: MIXTURE_DIR,
                buffer: mixture,
                is_composite: stems.len() > 1,
                stems,
                flags: BTreeSet::from([FLAG_MIXTURE.to_string()]),
            })?;
        }

        Ok(TrackOutcome::Processed(writer.output))
    }

    fn write_metadata(
        &self,
        metadata: &MetadataWriter,
        entries: &[ManifestEntry],
        errors: &[ErrorRecord],
        exclusions: &[ExclusionRecord],
        report: &RunReport,
        profile: &Profile,
    ) -> Result<()> {
        metadata.write_manifest(entries)?;
        metadata.write_errors(errors)?;
        metadata.write_exclusions(exclusions)?;
        metadata.write_config(&RunSettings {
            config: &self.config,
            rules_version: self.rules.version(),
            profile,
        })?;
        metadata.write_report(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::{AudioSource, StaticCollection, StemDescriptor};

    fn stem(id: &str, label: &str, value: f32) -> StemDescriptor {
        StemDescriptor::new(
            id,
            label,
            AudioSource::Buffer(AudioBuffer::new(vec![value; 8], 2, 44100)),
        )
    }

    fn medley_track(name: &str, index: u32) -> TrackDescriptor {
        let mut track = TrackDescriptor::new("medleydb", name, "Artist", name, index);
        track.stems = vec![
            stem("S01", "male singer", 0.1),
            stem("S02", "drum set", 0.2),
        ];
        track
    }

    fn pipeline(output: &Path, tracks: Vec<TrackDescriptor>) -> Pipeline {
        let config = AggregateConfig {
            output: output.to_path_buf(),
            ..Default::default()
        };
        Pipeline::new(config, RuleSet::builtin().unwrap())
            .with_collection(StaticCollection::new("medleydb", tracks))
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("/out"), Path::new("/out/vocals/a.wav")),
            "vocals/a.wav"
        );
    }

    #[test]
    fn test_plan_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let plan = pipeline(&out, vec![medley_track("A_B", 1)]).plan().unwrap();

        assert_eq!(plan.tracks.len(), 1);
        assert_eq!(plan.tracks[0].split, Split::Train);
        assert_eq!(plan.tracks[0].name, "medleydb_train_0001_artist_a_b");
        assert_eq!(plan.splits_created, 1);
        assert!(!out.exists());
    }

    #[test]
    fn test_run_writes_categories_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let report = pipeline(dir.path(), vec![medley_track("A_B", 1)]).run().unwrap();

        assert_eq!(report.tracks_processed, 1);
        assert_eq!(report.files_written, 2);
        assert!(dir.path().join("vocals/medleydb_train_0001_artist_a_b.wav").is_file());
        assert!(dir.path().join("drums/medleydb_train_0001_artist_a_b.wav").is_file());

        let manifest = MetadataWriter::new(dir.path().join("metadata"))
            .read_manifest()
            .unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest[0].path, "drums/medleydb_train_0001_artist_a_b.wav");
        assert_eq!(manifest[0].license, "CC BY-NC-SA 4.0");
    }

    #[test]
    fn test_bleed_tracks_excluded_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut bled = medley_track("Bled_Track", 2);
        bled.has_bleed = true;
        let report = pipeline(dir.path(), vec![medley_track("A_B", 1), bled])
            .run()
            .unwrap();

        assert_eq!(report.tracks_excluded, 1);
        assert_eq!(report.tracks_processed, 1);
    }

    #[test]
    fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), vec![medley_track("A_B", 1)]);
        pipeline.cancel();
        let report = pipeline.run().unwrap();

        assert!(report.cancelled);
        assert_eq!(report.files_written, 0);
        // splits are locked even though nothing was written
        assert!(dir.path().join("metadata").join(SPLITS_FILE).is_file());
    }

    #[test]
    fn test_track_without_stems_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let empty = TrackDescriptor::new("medleydb", "Empty_Track", "Empty", "Track", 1);
        let report = pipeline(dir.path(), vec![empty]).run().unwrap();
        assert_eq!(report.tracks_skipped, 1);
        assert_eq!(report.files_written, 0);
    }
}
