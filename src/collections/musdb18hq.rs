//! MUSDB18-HQ: `train/` and `test/` folders of `Artist - Title` tracks,
//! each holding `vocals.wav`, `drums.wav`, `bass.wav` and `other.wav`

use std::fs;
use std::path::{Path, PathBuf};

use super::{
    split_artist_title, AudioSource, CollectionId, Discovery, SourceCollection, StemDescriptor,
    TrackDescriptor,
};
use crate::error::{Error, Result};
use crate::splits::Split;

/// Stem files of every MUSDB18-HQ track
pub const MUSDB_STEMS: [&str; 4] = ["vocals", "drums", "bass", "other"];

const SPLIT_DIRS: [(&str, Split); 2] = [("train", Split::Train), ("test", Split::Test)];

#[derive(Debug, Clone)]
pub struct Musdb18Hq {
    root: PathBuf,
}

impl Musdb18Hq {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// Sorted subdirectories of `dir`, skipping hidden entries
pub(crate) fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::from_io(dir, e))? {
        let entry = entry.map_err(|e| Error::from_io(dir, e))?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !hidden && entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

impl SourceCollection for Musdb18Hq {
    fn id(&self) -> CollectionId {
        CollectionId::musdb18hq()
    }

    fn validate(&self) -> Result<()> {
        for (dir, _) in SPLIT_DIRS {
            let path = self.root.join(dir);
            if !path.is_dir() {
                return Err(Error::Config(format!(
                    "MUSDB18-HQ missing {}/ directory: {}",
                    dir,
                    path.display()
                )));
            }
        }
        Ok(())
    }

    fn discover(&self) -> Result<Discovery> {
        let mut discovery = Discovery::default();
        for (dir, split) in SPLIT_DIRS {
            let split_dir = self.root.join(dir);
            if !split_dir.is_dir() {
                continue;
            }
            for track_dir in sorted_subdirs(&split_dir)? {
                let name = track_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let (artist, title) = split_artist_title(&name, " - ");
                let index = discovery.tracks.len() as u32 + 1;

                let mut track = TrackDescriptor::new(self.id(), name, artist, title, index);
                track.native_split = Some(split);
                for stem in MUSDB_STEMS {
                    let path = track_dir.join(format!("{}.wav", stem));
                    if path.is_file() {
                        track
                            .stems
                            .push(StemDescriptor::new(stem, stem, AudioSource::File(path)));
                    } else {
                        let error = Error::missing_stem(
                            stem,
                            format!("no audio file at {}", path.display()),
                        );
                        discovery.unusable_stem(&track.id, stem, error);
                    }
                }
                discovery.tracks.push(track);
            }
        }

        tracing::info!(collection = %self.id(), tracks = discovery.tracks.len(), "Discovered tracks");
        Ok(discovery)
    }
}
