//! MedleyDB: `Audio/<Track>/<Track>_METADATA.yaml` plus
//! `Audio/<Track>/<Track>_STEMS/<Track>_STEM_<nn>.wav`

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::musdb18hq::sorted_subdirs;
use super::{
    split_artist_title, AudioSource, CollectionId, Discovery, SourceCollection, StemDescriptor,
    TrackDescriptor, TrackId,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct MedleyDb {
    root: PathBuf,
}

/// Label fields hold either a string or a list of strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn first(&self) -> Option<&str> {
        match self {
            OneOrMany::One(s) => Some(s.as_str()),
            OneOrMany::Many(v) => v.first().map(String::as_str),
        }
    }
}

/// `has_bleed` is `yes`/`no` in most files, a bool in some
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum YesNo {
    Bool(bool),
    Text(String),
}

impl YesNo {
    fn is_yes(&self) -> bool {
        match self {
            YesNo::Bool(b) => *b,
            YesNo::Text(s) => s.trim().eq_ignore_ascii_case("yes"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StemMetadata {
    instrument: Option<OneOrMany>,
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackMetadata {
    artist: Option<String>,
    title: Option<String>,
    has_bleed: Option<YesNo>,
    #[serde(default)]
    stems: BTreeMap<String, StemMetadata>,
}

impl MedleyDb {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn audio_dir(&self) -> PathBuf {
        self.root.join("Audio")
    }

    fn metadata_file(track_dir: &Path) -> Option<PathBuf> {
        let mut candidates: Vec<PathBuf> = fs::read_dir(track_dir)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with("_METADATA.yaml") && !n.starts_with("._"))
            })
            .collect();
        candidates.sort();
        candidates.into_iter().next()
    }

    fn load_track(
        &self,
        track_dir: &Path,
        name: &str,
        yaml_path: &Path,
        index: u32,
        discovery: &mut Discovery,
    ) -> Result<TrackDescriptor> {
        let text = fs::read_to_string(yaml_path).map_err(|e| Error::from_io(yaml_path, e))?;
        let metadata: TrackMetadata =
            serde_yml::from_str(&text).map_err(|e| Error::malformed_track(name, e))?;

        let (dir_artist, dir_title) = split_artist_title(name, "_");
        let artist = metadata.artist.filter(|a| !a.is_empty()).unwrap_or(dir_artist);
        let title = metadata.title.filter(|t| !t.is_empty()).unwrap_or(dir_title);

        let mut track = TrackDescriptor::new(self.id(), name, artist, title, index);
        track.has_bleed = metadata.has_bleed.as_ref().is_some_and(YesNo::is_yes);

        let stems_dir = track_dir.join(format!("{}_STEMS", name));
        for (key, stem) in &metadata.stems {
            let Some(label) = stem.instrument.as_ref().and_then(OneOrMany::first) else {
                let error = Error::missing_stem(key.as_str(), "no instrument label");
                discovery.unusable_stem(&track.id, key.as_str(), error);
                continue;
            };
            let file = stem.filename.clone().unwrap_or_else(|| {
                format!("{}_STEM_{}.wav", name, key.trim_start_matches('S'))
            });
            let path = stems_dir.join(file);
            if !path.is_file() {
                let reason = format!("no audio file at {}", path.display());
                let error = Error::missing_stem(key.as_str(), reason);
                discovery.unusable_stem(&track.id, key.as_str(), error);
                continue;
            }
            let mut descriptor = StemDescriptor::new(key.as_str(), label, AudioSource::File(path));
            descriptor.has_bleed = track.has_bleed;
            track.stems.push(descriptor);
        }
        Ok(track)
    }
}

impl SourceCollection for MedleyDb {
    fn id(&self) -> CollectionId {
        CollectionId::medleydb()
    }

    fn validate(&self) -> Result<()> {
        let audio = self.audio_dir();
        if !audio.is_dir() {
            return Err(Error::Config(format!(
                "MedleyDB missing Audio/ directory: {}",
                audio.display()
            )));
        }
        Ok(())
    }

    fn discover(&self) -> Result<Discovery> {
        let mut discovery = Discovery::default();

        for track_dir in sorted_subdirs(&self.audio_dir())? {
            let name = track_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let Some(yaml_path) = Self::metadata_file(&track_dir) else {
                tracing::warn!(track = %name, "No METADATA.yaml, skipping directory");
                continue;
            };

            let index = discovery.tracks.len() as u32 + 1;
            match self.load_track(&track_dir, &name, &yaml_path, index, &mut discovery) {
                Ok(track) => discovery.tracks.push(track),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(track = %name, error = %e, "Skipping track with malformed metadata");
                    discovery.malformed.push((TrackId::new(self.id(), name), e));
                }
            }
        }

        tracing::info!(collection = %self.id(), tracks = discovery.tracks.len(), "Discovered tracks");
        Ok(discovery)
    }
}
