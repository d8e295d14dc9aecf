//! Music source separation dataset aggregation
//!
//! Reconciles per-track stems from several source collections into the
//! closed category set of a profile (e.g. vocals/drums/bass/other):
//! labels are mapped through a curated rule table with overrides, stems
//! that share a category are summed, tracks present in two collections
//! are deduplicated, every track's split is locked on first sight, and
//! output files are written exactly once across interrupted and parallel
//! runs.
//!
//! [`Pipeline`] drives a whole run; the modules below can also be used on
//! their own.

pub mod audio;
pub mod collections;
pub mod compositor;
pub mod config;
pub mod error;
pub mod manifest;
pub mod mapping;
pub mod naming;
pub mod overlap;
pub mod overrides;
pub mod pipeline;
pub mod profile;
pub mod rules;
pub mod splits;
pub mod store;
pub mod writer;

pub use audio::{encode_wav_to_bytes, load_audio_file, AudioBuffer};
pub use collections::{
    AudioSource, CollectionId, SourceCollection, StaticCollection, StemDescriptor, StemLoader,
    TrackDescriptor, TrackId,
};
pub use compositor::{compose, CategoryBuffer, Composition};
pub use config::AggregateConfig;
pub use error::{Error, Result};
pub use manifest::{ManifestEntry, RunReport};
pub use mapping::{LabelTable, Resolver, Target};
pub use overrides::OverrideRegistry;
pub use pipeline::{Pipeline, Plan};
pub use profile::{Category, Profile};
pub use rules::RuleSet;
pub use splits::{Split, SplitStore};
