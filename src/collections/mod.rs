//! Source collections and the uniform track/stem view they expose
//!
//! Each collection adapter discovers tracks and hands the pipeline
//! [`TrackDescriptor`]s whose stems carry a label, an optional sub-stem
//! label, and an [`AudioSource`] that is only decoded when the track is
//! composed.

pub mod medleydb;
pub mod moisesdb;
pub mod musdb18hq;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audio::{load_audio_file, AudioBuffer};
use crate::error::{Error, Result};

pub use medleydb::MedleyDb;
pub use moisesdb::MoisesDb;
pub use musdb18hq::Musdb18Hq;

/// Identifier of a source collection, e.g. `musdb18hq`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(String);

impl CollectionId {
    pub const MUSDB18HQ: &'static str = "musdb18hq";
    pub const MEDLEYDB: &'static str = "medleydb";
    pub const MOISESDB: &'static str = "moisesdb";

    pub fn new(id: impl Into<String>) -> Self {
        CollectionId(id.into())
    }

    pub fn musdb18hq() -> Self {
        Self::new(Self::MUSDB18HQ)
    }

    pub fn medleydb() -> Self {
        Self::new(Self::MEDLEYDB)
    }

    pub fn moisesdb() -> Self {
        Self::new(Self::MOISESDB)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Distribution license recorded in manifest entries
    pub fn license(&self) -> &'static str {
        match self.0.as_str() {
            Self::MUSDB18HQ => "academic-use-only",
            Self::MOISESDB => "non-commercial-research",
            Self::MEDLEYDB => "CC BY-NC-SA 4.0",
            _ => "",
        }
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CollectionId {
    fn from(id: &str) -> Self {
        CollectionId::new(id)
    }
}

/// Identity of a track within the whole run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId {
    pub collection: CollectionId,
    /// Name as the collection spells it (directory name, "Artist - Title", ...)
    pub name: String,
}

impl TrackId {
    pub fn new(collection: impl Into<CollectionId>, name: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.name)
    }
}

/// Caller-supplied decoder for stems that do not live in a plain file
pub trait StemLoader: fmt::Debug + Send + Sync {
    fn load(&self) -> Result<AudioBuffer>;
}

/// Where a stem's samples come from
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Already-decoded samples
    Buffer(AudioBuffer),
    /// File decoded on demand
    File(PathBuf),
    /// Decoded on demand by an embedding application
    Loader(Arc<dyn StemLoader>),
}

impl AudioSource {
    /// Decode (or hand over) the samples
    pub fn load(&self) -> Result<AudioBuffer> {
        match self {
            AudioSource::Buffer(buffer) => Ok(buffer.clone()),
            AudioSource::File(path) => load_audio_file(path),
            AudioSource::Loader(loader) => loader.load(),
        }
    }
}

/// One labeled input stem
#[derive(Debug, Clone)]
pub struct StemDescriptor {
    /// Collection-local stem key (`S01`, `vocals`, a sub-track id...)
    pub stem_id: String,
    /// Free-form instrument label
    pub label: String,
    /// Finer label beneath `label`, for collections with bundled super-stems
    pub sub_label: Option<String>,
    pub audio: AudioSource,
    pub has_bleed: bool,
}

impl StemDescriptor {
    pub fn new(stem_id: impl Into<String>, label: impl Into<String>, audio: AudioSource) -> Self {
        Self {
            stem_id: stem_id.into(),
            label: label.into(),
            sub_label: None,
            audio,
            has_bleed: false,
        }
    }

    pub fn with_sub_label(mut self, sub_label: impl Into<String>) -> Self {
        self.sub_label = Some(sub_label.into());
        self
    }
}

/// A discovered source track
#[derive(Debug, Clone)]
pub struct TrackDescriptor {
    pub id: TrackId,
    pub artist: String,
    pub title: String,
    /// 1-based, assigned once in discovery order
    pub index: u32,
    /// Split implied by the collection layout, if any (benchmark collections)
    pub native_split: Option<crate::splits::Split>,
    /// Stratification key for seeded split selection
    pub genre: Option<String>,
    pub has_bleed: bool,
    pub stems: Vec<StemDescriptor>,
}

impl TrackDescriptor {
    pub fn new(
        collection: impl Into<CollectionId>,
        name: impl Into<String>,
        artist: impl Into<String>,
        title: impl Into<String>,
        index: u32,
    ) -> Self {
        Self {
            id: TrackId::new(collection, name),
            artist: artist.into(),
            title: title.into(),
            index,
            native_split: None,
            genre: None,
            has_bleed: false,
            stems: Vec::new(),
        }
    }

    pub fn collection(&self) -> &CollectionId {
        &self.id.collection
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }
}

/// A stem listed by a track that discovery had to leave out
#[derive(Debug)]
pub struct UnusableStem {
    pub track: TrackId,
    pub stem: String,
    pub error: Error,
}

/// Tracks found by one collection, plus everything that could not be used
#[derive(Debug, Default)]
pub struct Discovery {
    pub tracks: Vec<TrackDescriptor>,
    pub malformed: Vec<(TrackId, Error)>,
    /// Stems dropped from otherwise usable tracks (missing file, no label)
    pub unusable_stems: Vec<UnusableStem>,
}

impl Discovery {
    pub fn new(tracks: Vec<TrackDescriptor>) -> Self {
        Self {
            tracks,
            ..Default::default()
        }
    }

    /// Record a stem of `track` that will not be composed
    pub fn unusable_stem(&mut self, track: &TrackId, stem: impl Into<String>, error: Error) {
        let stem = stem.into();
        tracing::warn!(track = %track, stem = %stem, error = %error, "Stem left out at discovery");
        self.unusable_stems.push(UnusableStem {
            track: track.clone(),
            stem,
            error,
        });
    }
}

/// A source collection adapter
pub trait SourceCollection: Send + Sync {
    fn id(&self) -> CollectionId;

    /// Check the on-disk layout before discovery
    fn validate(&self) -> Result<()>;

    /// List all tracks with 1-based indices in a stable order
    ///
    /// A track with malformed metadata is reported in
    /// [`Discovery::malformed`] rather than failing the whole collection;
    /// a listed stem without audio goes to [`Discovery::unusable_stems`].
    fn discover(&self) -> Result<Discovery>;
}

/// In-memory collection, mainly for tests and embedding
#[derive(Debug, Clone)]
pub struct StaticCollection {
    id: CollectionId,
    tracks: Vec<TrackDescriptor>,
}

impl StaticCollection {
    pub fn new(id: impl Into<CollectionId>, tracks: Vec<TrackDescriptor>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }
}

impl SourceCollection for StaticCollection {
    fn id(&self) -> CollectionId {
        self.id.clone()
    }

    fn validate(&self) -> Result<()> {
        if let Some(track) = self.tracks.iter().find(|t| *t.collection() != self.id) {
            return Err(Error::Config(format!(
                "track {} does not belong to collection {}",
                track.id, self.id
            )));
        }
        Ok(())
    }

    fn discover(&self) -> Result<Discovery> {
        Ok(Discovery::new(self.tracks.clone()))
    }
}

/// Split "Artist - Title" (or a directory name) into its parts
pub(crate) fn split_artist_title(name: &str, separator: &str) -> (String, String) {
    match name.split_once(separator) {
        Some((artist, title)) => (artist.trim().to_string(), title.trim().to_string()),
        None => (name.to_string(), name.to_string()),
    }
}
