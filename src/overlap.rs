//! Tracks shared between a benchmark collection and a richer one
//!
//! 46 MUSDB18-HQ tracks were mixed from MedleyDB multitracks. When both
//! collections are in a run, the MedleyDB copy supplies the audio (finer
//! stems) while the MUSDB18-HQ copy's split stays authoritative, so the
//! benchmark test set never leaks into training.
//!
//! Matching is by [`canonical_name`] against a static table only; no
//! overlap is ever inferred from names or audio.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::collections::{CollectionId, TrackDescriptor, TrackId};
use crate::error::Result;
use crate::splits::Split;
use crate::store::{Lock, LockStore};

/// MUSDB18-HQ tracks that originate from MedleyDB, as "Artist - Title"
pub const MUSDB_MEDLEYDB_OVERLAP: [&str; 46] = [
    "A Classic Education - NightOwl",
    "Aimee Norwich - Child",
    "Alexander Ross - Goodbye Bolero",
    "Alexander Ross - Velvet Curtain",
    "Auctioneer - Our Future Faces",
    "AvaLuna - Waterduct",
    "BigTroubles - Phantom",
    "Celestial Shore - Die For Us",
    "Clara Berry And Wooldog - Air Traffic",
    "Clara Berry And Wooldog - Stella",
    "Clara Berry And Wooldog - Waltz For My Victims",
    "Creepoid - OldTree",
    "Dreamers Of The Ghetto - Heavy Love",
    "Faces On Film - Waiting For Ga",
    "Grants - PunchDrunk",
    "Helado Negro - Mitad Del Mundo",
    "Hezekiah Jones - Borrowed Heart",
    "Hop Along - Sister Cities",
    "Invisible Familiars - Disturbing Wildlife",
    "Lushlife - Toynbee Suite",
    "Matthew Entwistle - Dont You Ever",
    "Meaxic - Take A Step",
    "Meaxic - You Listen",
    "Music Delta - 80s Rock",
    "Music Delta - Beatles",
    "Music Delta - Britpop",
    "Music Delta - Country1",
    "Music Delta - Country2",
    "Music Delta - Disco",
    "Music Delta - Gospel",
    "Music Delta - Grunge",
    "Music Delta - Hendrix",
    "Music Delta - Punk",
    "Music Delta - Reggae",
    "Music Delta - Rock",
    "Music Delta - Rockabilly",
    "Night Panther - Fire",
    "Port St Willow - Stay Even",
    "Secret Mountains - High Horse",
    "Snowmine - Curfews",
    "Steven Clark - Bounty",
    "Strand Of Oaks - Spacestation",
    "Sweet Lights - You Let Me Down",
    "The Districts - Vermont",
    "The Scarlet Brand - Les Fleurs Du Mal",
    "The So So Glos - Emergency",
];

/// Lowercase and keep only alphanumerics
///
/// `"Music Delta - 80s Rock"` and `"MusicDelta_80sRock"` both become
/// `"musicdelta80srock"`.
pub fn canonical_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Static table of tracks present in two collections
#[derive(Debug, Clone)]
pub struct OverlapTable {
    /// Collection whose split is authoritative
    pub benchmark: CollectionId,
    /// Collection whose audio is used
    pub richer: CollectionId,
    names: HashSet<String>,
}

impl OverlapTable {
    pub fn new<'a>(
        benchmark: CollectionId,
        richer: CollectionId,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            benchmark,
            richer,
            names: names.into_iter().map(canonical_name).collect(),
        }
    }

    /// The built-in MUSDB18-HQ / MedleyDB table
    pub fn musdb_medleydb() -> Self {
        Self::new(
            CollectionId::musdb18hq(),
            CollectionId::medleydb(),
            MUSDB_MEDLEYDB_OVERLAP,
        )
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&canonical_name(name))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One deduplicated track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapRecord {
    pub canonical_name: String,
    /// Copy whose audio is used
    pub audio_from: TrackId,
    /// Copy dropped before mapping
    pub dropped: TrackId,
    /// Collection whose split the track carries
    pub split_authority: CollectionId,
    /// Split inherited from `split_authority`, if it defines one
    pub split: Option<Split>,
}

/// Outcome of deduplicating one run's tracks
#[derive(Debug, Default)]
pub struct OverlapResolution {
    /// Tracks to process, in input order
    pub tracks: Vec<TrackDescriptor>,
    pub records: Vec<OverlapRecord>,
}

impl OverlapResolution {
    /// Splits the richer copies inherit, keyed by their track id
    pub fn inherited_splits(&self) -> HashMap<TrackId, Split> {
        self.records
            .iter()
            .filter_map(|r| r.split.map(|s| (r.audio_from.clone(), s)))
            .collect()
    }
}

/// Drop the benchmark copy of every listed track found in both collections
///
/// A no-op when either collection is missing from `tracks`. Listed names
/// found in only one collection are left alone.
pub fn resolve_overlaps(table: &OverlapTable, tracks: Vec<TrackDescriptor>) -> OverlapResolution {
    let mut benchmark: BTreeMap<String, usize> = BTreeMap::new();
    let mut richer: BTreeMap<String, usize> = BTreeMap::new();
    for (i, track) in tracks.iter().enumerate() {
        if !table.contains(track.name()) {
            continue;
        }
        let key = canonical_name(track.name());
        if *track.collection() == table.benchmark {
            benchmark.insert(key, i);
        } else if *track.collection() == table.richer {
            richer.insert(key, i);
        }
    }

    let mut records = Vec::new();
    let mut dropped = HashSet::new();
    for (name, &b) in &benchmark {
        let Some(&r) = richer.get(name) else {
            continue;
        };
        let (bench, rich) = (&tracks[b], &tracks[r]);
        tracing::info!(
            track = %name,
            audio_from = %rich.id,
            dropped = %bench.id,
            split = ?bench.native_split,
            "Deduplicating overlapping track"
        );
        records.push(OverlapRecord {
            canonical_name: name.clone(),
            audio_from: rich.id.clone(),
            dropped: bench.id.clone(),
            split_authority: table.benchmark.clone(),
            split: bench.native_split,
        });
        dropped.insert(b);
    }

    let tracks = tracks
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !dropped.contains(i))
        .map(|(_, t)| t)
        .collect();

    OverlapResolution { tracks, records }
}

/// Persisted overlap records, keyed by canonical name
pub struct OverlapRegistry {
    records: LockStore<OverlapRecord>,
}

impl OverlapRegistry {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            records: LockStore::open(path)?,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            records: LockStore::in_memory(),
        }
    }

    /// Register this run's records; a record from an earlier run is kept
    /// and returned in place of the fresh one
    pub fn register(&self, records: Vec<OverlapRecord>) -> Vec<OverlapRecord> {
        records
            .into_iter()
            .map(|record| {
                let key = record.canonical_name.clone();
                match self.records.insert_if_absent(key, record) {
                    Lock::Created(r) => r,
                    Lock::Existing(r) => {
                        tracing::debug!(track = %r.canonical_name, "Overlap already registered");
                        r
                    }
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, OverlapRecord> {
        self.records.snapshot()
    }

    pub fn persist(&self) -> Result<()> {
        self.records.persist()
    }
}
