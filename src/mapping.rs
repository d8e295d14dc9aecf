//! Label → category resolution
//!
//! Resolution order for one stem:
//! 1. stem-level override (exclude or reroute)
//! 2. sub-stem routing table, when the collection bundles the stem's
//!    top-level label
//! 3. the collection's base label table
//! 4. the default category, noted as an unknown label
//!
//! Whole-track exclusions are checked by the pipeline before any stem is
//! read. Every result is folded through the active profile, so nothing
//! outside the profile's categories can come out of here.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::collections::{CollectionId, StemDescriptor, TrackId};
use crate::overrides::{OverrideRegistry, StemOverride};
use crate::profile::{Category, Profile};

/// Trim, case-fold and collapse inner whitespace
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Base rules for one collection
#[derive(Debug, Clone, Default)]
pub struct CollectionRules {
    pub(crate) labels: HashMap<String, Category>,
    pub(crate) excluded: HashSet<String>,
    pub(crate) unlabeled: HashSet<String>,
    /// parent label → (sub-stem label → category)
    pub(crate) substems: HashMap<String, HashMap<String, Category>>,
}

impl CollectionRules {
    pub fn label(mut self, label: &str, category: &str) -> Self {
        self.labels.insert(normalize_label(label), Category::new(category));
        self
    }

    pub fn exclude_label(mut self, label: &str) -> Self {
        self.excluded.insert(normalize_label(label));
        self
    }

    pub fn unlabeled_label(mut self, label: &str) -> Self {
        self.unlabeled.insert(normalize_label(label));
        self
    }

    pub fn substem(mut self, parent: &str, sub_label: &str, category: &str) -> Self {
        self.substems
            .entry(normalize_label(parent))
            .or_default()
            .insert(normalize_label(sub_label), Category::new(category));
        self
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Why a stem contributes nothing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// Curated stem exclusion
    Override,
    /// The label itself is excluded (e.g. a full-mix "Main System" stem)
    Label,
}

/// Outcome of resolving one stem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Category(Category),
    Excluded(ExclusionReason),
}

/// Audit trail for a resolution that did not come straight from the table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappingNote {
    UnknownLabel { label: String },
    UnknownSubStem { parent: String, sub_label: String },
    Unlabeled { label: String },
    Rerouted { stem: String, to: Category },
    OverrideExcluded { stem: String, reason: Option<String> },
    LabelExcluded { label: String },
}

impl MappingNote {
    /// Manifest flag for this note
    pub fn flag(&self) -> &'static str {
        match self {
            MappingNote::UnknownLabel { .. } | MappingNote::UnknownSubStem { .. } => {
                "unknown_label"
            }
            MappingNote::Unlabeled { .. } => "unlabeled_source",
            MappingNote::Rerouted { .. } => "rerouted_override",
            MappingNote::OverrideExcluded { .. } => "excluded_override",
            MappingNote::LabelExcluded { .. } => "excluded_label",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub target: Target,
    pub note: Option<MappingNote>,
}

impl Resolution {
    fn category(category: Category) -> Self {
        Self {
            target: Target::Category(category),
            note: None,
        }
    }

    fn noted(target: Target, note: MappingNote) -> Self {
        Self {
            target,
            note: Some(note),
        }
    }

    pub fn category_ref(&self) -> Option<&Category> {
        match &self.target {
            Target::Category(c) => Some(c),
            Target::Excluded(_) => None,
        }
    }
}

/// Base label tables for every known collection
#[derive(Debug, Clone)]
pub struct LabelTable {
    collections: HashMap<CollectionId, CollectionRules>,
    default_category: Category,
}

impl LabelTable {
    pub fn new(default_category: Category) -> Self {
        Self {
            collections: HashMap::new(),
            default_category,
        }
    }

    pub fn with_collection(mut self, collection: CollectionId, rules: CollectionRules) -> Self {
        self.collections.insert(collection, rules);
        self
    }

    pub fn default_category(&self) -> &Category {
        &self.default_category
    }

    pub fn rules(&self, collection: &CollectionId) -> Option<&CollectionRules> {
        self.collections.get(collection)
    }

    /// Resolve a top-level label against the base table
    ///
    /// Total: unknown labels fall back to the default category.
    pub fn resolve(&self, collection: &CollectionId, label: &str, profile: &Profile) -> Resolution {
        let key = normalize_label(label);
        let rules = self.collections.get(collection);

        if let Some(rules) = rules {
            if rules.excluded.contains(&key) {
                return Resolution::noted(
                    Target::Excluded(ExclusionReason::Label),
                    MappingNote::LabelExcluded { label: key },
                );
            }
            if rules.unlabeled.contains(&key) {
                return Resolution::noted(
                    Target::Category(profile.fold(&self.default_category)),
                    MappingNote::Unlabeled { label: key },
                );
            }
            if let Some(category) = rules.labels.get(&key) {
                return Resolution::category(profile.fold(category));
            }
        }

        tracing::warn!(
            collection = %collection,
            label = %label,
            fallback = %self.default_category,
            "Unknown instrument label, routing to default category"
        );
        Resolution::noted(
            Target::Category(profile.fold(&self.default_category)),
            MappingNote::UnknownLabel { label: key },
        )
    }

    /// Resolve a sub-stem when `parent` is a bundled super-category
    ///
    /// Returns `None` when the collection does not route `parent` by
    /// sub-stem, in which case the top-level label decides.
    pub fn resolve_substem(
        &self,
        collection: &CollectionId,
        parent: &str,
        sub_label: &str,
        profile: &Profile,
    ) -> Option<Resolution> {
        let parent_key = normalize_label(parent);
        let routes = self.collections.get(collection)?.substems.get(&parent_key)?;
        let sub_key = normalize_label(sub_label);

        match routes.get(&sub_key) {
            Some(category) => Some(Resolution::category(profile.fold(category))),
            None => {
                tracing::warn!(
                    collection = %collection,
                    parent = %parent_key,
                    sub_stem = %sub_label,
                    fallback = %self.default_category,
                    "Unknown sub-stem label, routing to default category"
                );
                Some(Resolution::noted(
                    Target::Category(profile.fold(&self.default_category)),
                    MappingNote::UnknownSubStem {
                        parent: parent_key,
                        sub_label: sub_key,
                    },
                ))
            }
        }
    }
}

/// Stateless resolver bound to one run's tables, overrides and profile
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    table: &'a LabelTable,
    overrides: &'a OverrideRegistry,
    profile: &'a Profile,
}

impl<'a> Resolver<'a> {
    pub fn new(
        table: &'a LabelTable,
        overrides: &'a OverrideRegistry,
        profile: &'a Profile,
    ) -> Self {
        Self {
            table,
            overrides,
            profile,
        }
    }

    pub fn profile(&self) -> &'a Profile {
        self.profile
    }

    /// Resolve one stem of `track`, overrides first
    pub fn resolve_stem(&self, track: &TrackId, stem: &StemDescriptor) -> Resolution {
        match self.overrides.stem_override(track, &stem.stem_id) {
            Some(StemOverride::Exclude { reason }) => {
                tracing::info!(track = %track, stem = %stem.stem_id, "Excluding stem (override)");
                return Resolution::noted(
                    Target::Excluded(ExclusionReason::Override),
                    MappingNote::OverrideExcluded {
                        stem: stem.stem_id.clone(),
                        reason: reason.map(str::to_string),
                    },
                );
            }
            Some(StemOverride::Reroute(category)) => {
                let to = self.profile.fold(category);
                tracing::info!(
                    track = %track,
                    stem = %stem.stem_id,
                    label = %stem.label,
                    to = %to,
                    "Rerouting stem (override)"
                );
                return Resolution::noted(
                    Target::Category(to.clone()),
                    MappingNote::Rerouted {
                        stem: stem.stem_id.clone(),
                        to,
                    },
                );
            }
            None => {}
        }

        if let Some(sub_label) = &stem.sub_label {
            if let Some(resolution) =
                self.table
                    .resolve_substem(&track.collection, &stem.label, sub_label, self.profile)
            {
                return resolution;
            }
        }

        self.table.resolve(&track.collection, &stem.label, self.profile)
    }
}
