//! MoisesDB: one directory per track holding `data.json` and a folder per
//! top-level stem, `<stemName>/<sub-track id>.<extension>`
//!
//! Releases nest tracks under `moisesdb_v0.1/<provider>/`; any depth is
//! accepted as long as the track directory holds a `data.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use walkdir::WalkDir;

use super::{
    AudioSource, CollectionId, Discovery, SourceCollection, StemDescriptor, TrackDescriptor,
    TrackId,
};
use crate::error::{Error, Result};

const DATA_FILE: &str = "data.json";

#[derive(Debug, Clone)]
pub struct MoisesDb {
    root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SubTrack {
    id: String,
    #[serde(rename = "trackType")]
    track_type: String,
    #[serde(default = "default_extension")]
    extension: String,
    #[serde(default)]
    has_bleed: bool,
}

fn default_extension() -> String {
    "wav".to_string()
}

#[derive(Debug, Deserialize)]
struct StemGroup {
    #[serde(rename = "stemName")]
    stem_name: String,
    #[serde(default)]
    tracks: Vec<SubTrack>,
}

#[derive(Debug, Deserialize)]
struct TrackData {
    #[serde(default)]
    artist: String,
    #[serde(default)]
    song: String,
    genre: Option<String>,
    #[serde(default)]
    stems: Vec<StemGroup>,
}

/// `Bass Guitar` → `bass_guitar`
fn normalize_track_type(track_type: &str) -> String {
    track_type.trim().to_lowercase().replace(' ', "_")
}

impl MoisesDb {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Track directories in path order
    fn track_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.file_name() == DATA_FILE)
            .filter_map(|e| e.path().parent().map(Path::to_path_buf))
            .collect();
        dirs.sort();
        dirs
    }

    fn load_track(
        &self,
        track_dir: &Path,
        name: &str,
        index: u32,
        discovery: &mut Discovery,
    ) -> Result<TrackDescriptor> {
        let data_path = track_dir.join(DATA_FILE);
        let bytes = fs::read(&data_path).map_err(|e| Error::from_io(&data_path, e))?;
        let data: TrackData =
            serde_json::from_slice(&bytes).map_err(|e| Error::malformed_track(name, e))?;

        let mut track = TrackDescriptor::new(self.id(), name, data.artist, data.song, index);
        track.genre = data
            .genre
            .map(|g| g.trim().to_lowercase())
            .filter(|g| !g.is_empty());

        for group in &data.stems {
            for sub in &group.tracks {
                let path = track_dir
                    .join(&group.stem_name)
                    .join(format!("{}.{}", sub.id, sub.extension));
                let stem_id = format!("{}/{}", group.stem_name, sub.id);
                if !path.is_file() {
                    let reason = format!("no audio file at {}", path.display());
                    let error = Error::missing_stem(&stem_id, reason);
                    discovery.unusable_stem(&track.id, stem_id.as_str(), error);
                    continue;
                }
                let audio = AudioSource::File(path);
                let mut stem = StemDescriptor::new(stem_id, group.stem_name.as_str(), audio)
                    .with_sub_label(normalize_track_type(&sub.track_type));
                stem.has_bleed = sub.has_bleed;
                track.has_bleed |= sub.has_bleed;
                track.stems.push(stem);
            }
        }
        Ok(track)
    }
}

impl SourceCollection for MoisesDb {
    fn id(&self) -> CollectionId {
        CollectionId::moisesdb()
    }

    fn validate(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(Error::Config(format!(
                "MoisesDB root is not a directory: {}",
                self.root.display()
            )));
        }
        Ok(())
    }

    fn discover(&self) -> Result<Discovery> {
        let mut discovery = Discovery::default();

        for track_dir in self.track_dirs() {
            let name = track_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let index = discovery.tracks.len() as u32 + 1;
            match self.load_track(&track_dir, &name, index, &mut discovery) {
                Ok(track) => discovery.tracks.push(track),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(track = %name, error = %e, "Skipping track with malformed data.json");
                    discovery.malformed.push((TrackId::new(self.id(), name), e));
                }
            }
        }

        tracing::info!(collection = %self.id(), tracks = discovery.tracks.len(), "Discovered tracks");
        Ok(discovery)
    }
}
