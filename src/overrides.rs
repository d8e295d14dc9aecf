//! Curated per-track and per-stem corrections
//!
//! Overrides sit on top of the base label table and always win over it.
//! A stem may be excluded or rerouted, never both; that conflict is caught
//! when the registry is built, not when a track is processed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::collections::TrackId;
use crate::error::{Error, Result};
use crate::profile::Category;

/// Identity of one stem of one track
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StemKey {
    pub track: TrackId,
    pub stem: String,
}

impl StemKey {
    pub fn new(track: TrackId, stem: impl Into<String>) -> Self {
        Self {
            track,
            stem: stem.into(),
        }
    }
}

/// Override outcome for a single stem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StemOverride<'a> {
    Exclude { reason: Option<&'a str> },
    Reroute(&'a Category),
}

/// Immutable override lists, loaded once per run
#[derive(Debug, Clone, Default)]
pub struct OverrideRegistry {
    exclude_tracks: BTreeMap<TrackId, Option<String>>,
    exclude_stems: BTreeMap<StemKey, Option<String>>,
    reroute_stems: BTreeMap<StemKey, Category>,
}

impl OverrideRegistry {
    pub fn builder() -> OverrideRegistryBuilder {
        OverrideRegistryBuilder::default()
    }

    pub fn is_empty(&self) -> bool {
        self.exclude_tracks.is_empty()
            && self.exclude_stems.is_empty()
            && self.reroute_stems.is_empty()
    }

    /// Whole-track exclusion, with the curator's reason if one was given
    pub fn track_exclusion(&self, track: &TrackId) -> Option<Option<&str>> {
        self.exclude_tracks.get(track).map(|r| r.as_deref())
    }

    pub fn stem_override(&self, track: &TrackId, stem: &str) -> Option<StemOverride<'_>> {
        let key = StemKey::new(track.clone(), stem);
        if let Some(reason) = self.exclude_stems.get(&key) {
            return Some(StemOverride::Exclude {
                reason: reason.as_deref(),
            });
        }
        self.reroute_stems.get(&key).map(StemOverride::Reroute)
    }

    /// Every category a reroute targets, for load-time validation
    pub(crate) fn reroute_targets(&self) -> impl Iterator<Item = (&StemKey, &Category)> {
        self.reroute_stems.iter()
    }

    pub fn excluded_track_count(&self) -> usize {
        self.exclude_tracks.len()
    }
}

/// Collects override entries and checks them for conflicts
#[derive(Debug, Default)]
pub struct OverrideRegistryBuilder {
    exclude_tracks: BTreeMap<TrackId, Option<String>>,
    exclude_stems: BTreeMap<StemKey, Option<String>>,
    reroute_stems: BTreeMap<StemKey, Category>,
    errors: Vec<String>,
}

impl OverrideRegistryBuilder {
    pub fn exclude_track(mut self, track: TrackId, reason: Option<String>) -> Self {
        self.exclude_tracks.insert(track, reason);
        self
    }

    pub fn exclude_stem(mut self, key: StemKey, reason: Option<String>) -> Self {
        self.exclude_stems.insert(key, reason);
        self
    }

    pub fn reroute_stem(mut self, key: StemKey, category: Category) -> Self {
        if let Some(previous) = self.reroute_stems.get(&key) {
            if *previous != category {
                self.errors.push(format!(
                    "stem {}:{} rerouted to both '{}' and '{}'",
                    key.track, key.stem, previous, category
                ));
            }
        }
        self.reroute_stems.insert(key, category);
        self
    }

    pub fn build(self) -> Result<OverrideRegistry> {
        let mut errors = self.errors;
        for key in self.reroute_stems.keys() {
            if self.exclude_stems.contains_key(key) {
                errors.push(format!(
                    "stem {}:{} is both excluded and rerouted",
                    key.track, key.stem
                ));
            }
        }
        if !errors.is_empty() {
            return Err(Error::Config(errors.join("; ")));
        }

        Ok(OverrideRegistry {
            exclude_tracks: self.exclude_tracks,
            exclude_stems: self.exclude_stems,
            reroute_stems: self.reroute_stems,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track() -> TrackId {
        TrackId::new("medleydb", "LizNelson_Rainfall")
    }

    #[test]
    fn test_lookup() {
        let registry = OverrideRegistry::builder()
            .exclude_track(TrackId::new("medleydb", "Bad_Track"), Some("clipped".into()))
            .exclude_stem(StemKey::new(track(), "S02"), None)
            .reroute_stem(StemKey::new(track(), "S05"), Category::new("bass"))
            .build()
            .unwrap();

        assert_eq!(
            registry.track_exclusion(&TrackId::new("medleydb", "Bad_Track")),
            Some(Some("clipped"))
        );
        assert_eq!(registry.track_exclusion(&track()), None);
        assert_eq!(
            registry.stem_override(&track(), "S02"),
            Some(StemOverride::Exclude { reason: None })
        );
        assert_eq!(
            registry.stem_override(&track(), "S05"),
            Some(StemOverride::Reroute(&Category::new("bass")))
        );
        assert_eq!(registry.stem_override(&track(), "S01"), None);
    }

    #[test]
    fn test_exclude_and_reroute_conflict() {
        let result = OverrideRegistry::builder()
            .exclude_stem(StemKey::new(track(), "S03"), None)
            .reroute_stem(StemKey::new(track(), "S03"), Category::new("bass"))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_conflicting_reroutes() {
        let result = OverrideRegistry::builder()
            .reroute_stem(StemKey::new(track(), "S03"), Category::new("bass"))
            .reroute_stem(StemKey::new(track(), "S03"), Category::new("drums"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_same_stem_id_on_other_track_is_independent() {
        let registry = OverrideRegistry::builder()
            .exclude_stem(StemKey::new(track(), "S03"), None)
            .build()
            .unwrap();
        let other = TrackId::new("medleydb", "Other_Track");
        assert_eq!(registry.stem_override(&other, "S03"), None);
    }
}
