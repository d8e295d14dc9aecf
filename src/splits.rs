//! Train/validation/test assignment and the split lock
//!
//! A track's split is computed once by its collection's policy and then
//! locked. Later runs read the lock and never consult the policy again,
//! even if the policy (or the tool version) would now decide differently.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::collections::{CollectionId, TrackDescriptor, TrackId};
use crate::error::Result;
use crate::store::{Lock, LockStore};

/// MoisesDB validation set size
pub const MOISESDB_VAL_COUNT: usize = 50;
/// Seed for the MoisesDB validation selection
pub const MOISESDB_VAL_SEED: u64 = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Split {
    #[serde(rename = "train")]
    Train,
    #[serde(rename = "val")]
    Validation,
    #[serde(rename = "test")]
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Validation => "val",
            Split::Test => "test",
        }
    }

    /// Parse a split directory name
    pub fn from_dir_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "train" => Some(Split::Train),
            "val" | "valid" | "validation" => Some(Split::Validation),
            "test" => Some(Split::Test),
            _ => None,
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock key of a track: `{collection}_{index:04}_{name}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SplitKey(String);

impl SplitKey {
    pub fn for_track(track: &TrackDescriptor) -> Self {
        SplitKey(format!(
            "{}_{:04}_{}",
            track.collection(),
            track.index,
            track.name()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SplitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a collection chooses splits for unlocked tracks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitPolicy {
    /// Split comes from the collection's own layout; train if missing
    Native,
    /// Seeded genre-stratified validation subset, everything else trains
    StratifiedValidation { count: usize, seed: u64 },
    /// Everything trains
    Train,
}

impl SplitPolicy {
    pub fn for_collection(collection: &CollectionId) -> Self {
        match collection.as_str() {
            CollectionId::MUSDB18HQ => SplitPolicy::Native,
            CollectionId::MOISESDB => SplitPolicy::StratifiedValidation {
                count: MOISESDB_VAL_COUNT,
                seed: MOISESDB_VAL_SEED,
            },
            _ => SplitPolicy::Train,
        }
    }
}

/// Choose `count` tracks for validation, proportionally per genre
///
/// Groups are ordered by genre name and members by track name before a
/// single seeded generator shuffles each group, so the choice depends
/// only on the set of tracks, not on discovery order. Quotas use the
/// largest-remainder method. With `count` or fewer tracks, all are chosen.
pub fn stratified_selection(
    tracks: &[&TrackDescriptor],
    count: usize,
    seed: u64,
) -> BTreeSet<TrackId> {
    if tracks.len() <= count {
        return tracks.iter().map(|t| t.id.clone()).collect();
    }

    let mut groups: BTreeMap<&str, Vec<&TrackId>> = BTreeMap::new();
    for track in tracks {
        groups
            .entry(track.genre.as_deref().unwrap_or("unknown"))
            .or_default()
            .push(&track.id);
    }

    let total = tracks.len();
    let mut quotas: Vec<(&str, usize, usize)> = groups
        .iter()
        .map(|(genre, members)| {
            let exact = count * members.len();
            (*genre, exact / total, exact % total)
        })
        .collect();

    let assigned: usize = quotas.iter().map(|(_, q, _)| q).sum();
    let mut by_remainder: Vec<usize> = (0..quotas.len()).collect();
    // stable sort keeps genre-name order among equal remainders
    by_remainder.sort_by(|&a, &b| quotas[b].2.cmp(&quotas[a].2));
    for &i in by_remainder.iter().take(count - assigned) {
        quotas[i].1 += 1;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut selected = BTreeSet::new();
    for (genre, quota, _) in quotas {
        let Some(members) = groups.get_mut(genre) else {
            continue;
        };
        members.sort_by(|a, b| a.name.cmp(&b.name));
        members.shuffle(&mut rng);
        selected.extend(members.iter().take(quota).map(|id| (*id).clone()));
    }
    selected
}

/// Persistent split lock
pub struct SplitStore {
    locks: LockStore<Split>,
}

impl SplitStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            locks: LockStore::open(path)?,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            locks: LockStore::in_memory(),
        }
    }

    pub fn get(&self, track: &TrackDescriptor) -> Option<Split> {
        self.locks.get(SplitKey::for_track(track).as_str())
    }

    /// Lock a split for `track`, or return the one already locked
    pub fn assign(&self, track: &TrackDescriptor, proposed: Split) -> Split {
        let key = SplitKey::for_track(track);
        match self.locks.insert_if_absent(key.as_str(), proposed) {
            Lock::Created(split) => split,
            Lock::Existing(split) => {
                if split != proposed {
                    tracing::info!(
                        track = %key,
                        locked = %split,
                        proposed = %proposed,
                        "Split already locked, keeping existing assignment"
                    );
                }
                split
            }
        }
    }

    /// Assign splits to every track
    ///
    /// Policies are evaluated per collection over the full track list;
    /// `inherited` (from overlap records) beats the policy, and an
    /// existing lock beats both.
    pub fn assign_all(
        &self,
        tracks: &[TrackDescriptor],
        inherited: &HashMap<TrackId, Split>,
    ) -> BTreeMap<TrackId, Split> {
        let proposed = propose_splits(tracks, inherited);
        tracks
            .iter()
            .map(|track| {
                let policy = proposed.get(&track.id).copied().unwrap_or(Split::Train);
                let split = self.assign(track, policy);
                (track.id.clone(), split)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn created_count(&self) -> usize {
        self.locks.created_count()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Split> {
        self.locks.snapshot()
    }

    pub fn persist(&self) -> Result<()> {
        self.locks.persist()
    }
}

/// Policy outcome for every track, ignoring locks
pub fn propose_splits(
    tracks: &[TrackDescriptor],
    inherited: &HashMap<TrackId, Split>,
) -> HashMap<TrackId, Split> {
    let mut by_collection: BTreeMap<&CollectionId, Vec<&TrackDescriptor>> = BTreeMap::new();
    for track in tracks {
        by_collection.entry(track.collection()).or_default().push(track);
    }

    let mut proposed = HashMap::with_capacity(tracks.len());
    for (collection, members) in by_collection {
        match SplitPolicy::for_collection(collection) {
            SplitPolicy::Native => {
                for track in members {
                    proposed.insert(track.id.clone(), track.native_split.unwrap_or(Split::Train));
                }
            }
            SplitPolicy::Train => {
                for track in members {
                    proposed.insert(track.id.clone(), Split::Train);
                }
            }
            SplitPolicy::StratifiedValidation { count, seed } => {
                let validation = stratified_selection(&members, count, seed);
                for track in members {
                    let split = if validation.contains(&track.id) {
                        Split::Validation
                    } else {
                        Split::Train
                    };
                    proposed.insert(track.id.clone(), split);
                }
            }
        }
    }

    for (id, split) in inherited {
        if let Some(slot) = proposed.get_mut(id) {
            *slot = *split;
        }
    }
    proposed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(collection: &str, index: u32, genre: Option<&str>) -> TrackDescriptor {
        let mut t = TrackDescriptor::new(collection, format!("track{:03}", index), "A", "T", index);
        t.genre = genre.map(str::to_string);
        t
    }

    #[test]
    fn test_split_serde_names() {
        assert_eq!(serde_json::to_string(&Split::Validation).unwrap(), "\"val\"");
        assert_eq!(Split::from_dir_name("Test"), Some(Split::Test));
        assert_eq!(Split::from_dir_name("misc"), None);
    }

    #[test]
    fn test_split_key_format() {
        let t = track("moisesdb", 7, None);
        assert_eq!(SplitKey::for_track(&t).as_str(), "moisesdb_0007_track007");
    }

    #[test]
    fn test_small_collection_all_validation() {
        let tracks: Vec<_> = (1..=10).map(|i| track("moisesdb", i, Some("rock"))).collect();
        let refs: Vec<_> = tracks.iter().collect();
        assert_eq!(stratified_selection(&refs, 50, 42).len(), 10);
    }

    #[test]
    fn test_stratified_quotas_and_determinism() {
        let mut tracks = Vec::new();
        for i in 1..=150 {
            tracks.push(track("moisesdb", i, Some("rock")));
        }
        for i in 151..=200 {
            tracks.push(track("moisesdb", i, Some("jazz")));
        }
        let refs: Vec<_> = tracks.iter().collect();
        let selected = stratified_selection(&refs, 50, 42);
        assert_eq!(selected.len(), 50);

        let jazz = tracks
            .iter()
            .filter(|t| t.genre.as_deref() == Some("jazz") && selected.contains(&t.id))
            .count();
        assert_eq!(jazz, 13);

        // Discovery order does not matter
        let reversed: Vec<_> = tracks.iter().rev().collect();
        assert_eq!(stratified_selection(&reversed, 50, 42), selected);
    }

    #[test]
    fn test_policies() {
        let mut musdb = track("musdb18hq", 1, None);
        musdb.native_split = Some(Split::Test);
        let medley = track("medleydb", 1, None);
        let proposed = propose_splits(&[musdb.clone(), medley.clone()], &HashMap::new());
        assert_eq!(proposed[&musdb.id], Split::Test);
        assert_eq!(proposed[&medley.id], Split::Train);
    }

    #[test]
    fn test_inherited_split_beats_policy() {
        let medley = track("medleydb", 3, None);
        let inherited = HashMap::from([(medley.id.clone(), Split::Test)]);
        let proposed = propose_splits(&[medley.clone()], &inherited);
        assert_eq!(proposed[&medley.id], Split::Test);
    }

    #[test]
    fn test_existing_lock_wins() {
        let store = SplitStore::in_memory();
        let t = track("medleydb", 1, None);
        assert_eq!(store.assign(&t, Split::Test), Split::Test);
        assert_eq!(store.assign(&t, Split::Train), Split::Test);

        let splits = store.assign_all(&[t.clone()], &HashMap::new());
        assert_eq!(splits[&t.id], Split::Test);
        assert_eq!(store.created_count(), 1);
    }
}
