//! Versioned rule document
//!
//! One TOML document carries the profiles, every collection's label
//! table and sub-stem routing, and the curated override lists. It is
//! parsed and validated once at startup and is immutable afterwards.
//!
//! ```toml
//! version = 1
//! default_category = "other"
//!
//! [[profiles]]
//! name = "vdbo"
//! categories = ["vocals", "drums", "bass", "other"]
//! catch_all = "other"
//!
//! [collections.medleydb]
//! exclude_labels = ["main system"]
//!
//! [collections.medleydb.labels]
//! "drum set" = "drums"
//!
//! [[overrides.reroute_stems]]
//! collection = "medleydb"
//! track = "Some_Track"
//! stem = "S04"
//! category = "bass"
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::collections::{CollectionId, TrackId};
use crate::error::{Error, Result};
use crate::mapping::{CollectionRules, LabelTable, Resolver};
use crate::overrides::{OverrideRegistry, StemKey};
use crate::profile::{Category, Profile};

/// Rule document format understood by this build
pub const RULES_VERSION: u32 = 1;

/// Rules shipped with the crate
pub const BUILTIN_RULES: &str = include_str!("../data/default_rules.toml");

fn default_category() -> Category {
    Category::new("other")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDocument {
    pub version: u32,
    #[serde(default = "default_category")]
    pub default_category: Category,
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionDocument>,
    #[serde(default)]
    pub overrides: OverrideDocument,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectionDocument {
    pub labels: BTreeMap<String, Category>,
    pub exclude_labels: Vec<String>,
    pub unlabeled_labels: Vec<String>,
    /// parent label → sub-stem label → category
    pub substems: BTreeMap<String, BTreeMap<String, Category>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverrideDocument {
    pub exclude_tracks: Vec<TrackRule>,
    pub exclude_stems: Vec<StemRule>,
    pub reroute_stems: Vec<RerouteRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRule {
    pub collection: String,
    pub track: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StemRule {
    pub collection: String,
    pub track: String,
    pub stem: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerouteRule {
    pub collection: String,
    pub track: String,
    pub stem: String,
    pub category: Category,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Validated, in-memory form of a [`RuleDocument`]
#[derive(Debug, Clone)]
pub struct RuleSet {
    version: u32,
    profiles: Vec<Profile>,
    table: LabelTable,
    overrides: OverrideRegistry,
}

impl RuleSet {
    /// The rules compiled into the binary
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_RULES)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::from_io(path, e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            Error::Toml(inner) => {
                Error::Config(format!("failed to parse rules {}: {}", path.display(), inner))
            }
            other => other,
        })
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let document: RuleDocument = toml::from_str(contents)?;
        Self::from_document(document)
    }

    pub fn from_document(document: RuleDocument) -> Result<Self> {
        if document.version != RULES_VERSION {
            return Err(Error::Config(format!(
                "unsupported rule document version {} (expected {})",
                document.version, RULES_VERSION
            )));
        }

        let profiles = validate_profiles(document.profiles)?;
        let known: BTreeSet<&Category> = profiles.iter().flat_map(|p| &p.categories).collect();
        let check = |category: &Category, context: &str| -> Result<()> {
            if known.contains(category) {
                Ok(())
            } else {
                Err(Error::Config(format!(
                    "{} maps to unknown category '{}'",
                    context, category
                )))
            }
        };

        check(&document.default_category, "default_category")?;

        let mut table = LabelTable::new(document.default_category.clone());
        for (collection, doc) in &document.collections {
            let mut rules = CollectionRules::default();
            for (label, category) in &doc.labels {
                check(category, &format!("{} label '{}'", collection, label))?;
                rules = rules.label(label, category.as_str());
            }
            for label in &doc.exclude_labels {
                rules = rules.exclude_label(label);
            }
            for label in &doc.unlabeled_labels {
                rules = rules.unlabeled_label(label);
            }
            if let Some(label) = rules.excluded.iter().find(|l| rules.labels.contains_key(*l)) {
                return Err(Error::Config(format!(
                    "{} label '{}' is both mapped and excluded",
                    collection, label
                )));
            }
            for (parent, routes) in &doc.substems {
                for (sub_label, category) in routes {
                    check(
                        category,
                        &format!("{} sub-stem '{}/{}'", collection, parent, sub_label),
                    )?;
                    rules = rules.substem(parent, sub_label, category.as_str());
                }
            }
            table = table.with_collection(CollectionId::new(collection.as_str()), rules);
        }

        let mut builder = OverrideRegistry::builder();
        for rule in document.overrides.exclude_tracks {
            let track = TrackId::new(rule.collection.as_str(), rule.track);
            builder = builder.exclude_track(track, rule.reason);
        }
        for rule in document.overrides.exclude_stems {
            let key = StemKey::new(TrackId::new(rule.collection.as_str(), rule.track), rule.stem);
            builder = builder.exclude_stem(key, rule.reason);
        }
        for rule in document.overrides.reroute_stems {
            let key = StemKey::new(TrackId::new(rule.collection.as_str(), rule.track), rule.stem);
            builder = builder.reroute_stem(key, rule.category);
        }
        let overrides = builder.build()?;
        for (key, category) in overrides.reroute_targets() {
            check(category, &format!("reroute of {}:{}", key.track, key.stem))?;
        }

        Ok(Self {
            version: document.version,
            profiles,
            table,
            overrides,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// Look up a profile by name
    pub fn profile(&self, name: &str) -> Result<&Profile> {
        self.profiles.iter().find(|p| p.name == name).ok_or_else(|| {
            let names: Vec<&str> = self.profiles.iter().map(|p| p.name.as_str()).collect();
            Error::Config(format!(
                "unknown profile '{}' (available: {})",
                name,
                names.join(", ")
            ))
        })
    }

    pub fn table(&self) -> &LabelTable {
        &self.table
    }

    pub fn overrides(&self) -> &OverrideRegistry {
        &self.overrides
    }

    pub fn resolver<'a>(&'a self, profile: &'a Profile) -> Resolver<'a> {
        Resolver::new(&self.table, &self.overrides, profile)
    }
}

fn validate_profiles(profiles: Vec<Profile>) -> Result<Vec<Profile>> {
    if profiles.is_empty() {
        return Err(Error::Config("rule document defines no profiles".to_string()));
    }
    let mut names = HashSet::new();
    for profile in &profiles {
        profile.validate().map_err(Error::Config)?;
        if !names.insert(profile.name.as_str()) {
            return Err(Error::Config(format!(
                "profile '{}' defined more than once",
                profile.name
            )));
        }
    }
    Ok(profiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::Target;

    const MINIMAL: &str = r#"
version = 1

[[profiles]]
name = "vdbo"
categories = ["vocals", "drums", "bass", "other"]
catch_all = "other"
"#;

    #[test]
    fn test_builtin_rules_load() {
        let rules = RuleSet::builtin().unwrap();
        assert_eq!(rules.version(), RULES_VERSION);
        assert_eq!(rules.profiles().len(), 2);
        assert_eq!(rules.profile("vdbo+gp").unwrap().categories.len(), 6);
        assert!(rules.profile("karaoke").is_err());
        assert!(rules.overrides().is_empty());

        let medleydb = rules.table().rules(&CollectionId::medleydb()).unwrap();
        assert_eq!(medleydb.len(), 119);
    }

    #[test]
    fn test_builtin_scenarios() {
        let rules = RuleSet::builtin().unwrap();
        let vdbo = rules.profile("vdbo").unwrap();
        let table = rules.table();
        let medleydb = CollectionId::medleydb();

        let r = table.resolve(&medleydb, "drum set", vdbo);
        assert_eq!(r.target, Target::Category(Category::new("drums")));
        let r = table.resolve(&medleydb, "vibraphone", vdbo);
        assert_eq!(r.target, Target::Category(Category::new("other")));
        let r = table.resolve(&medleydb, "Clean Electric Guitar", vdbo);
        assert_eq!(r.target, Target::Category(Category::new("other")));

        let gp = rules.profile("vdbo+gp").unwrap();
        let r = table.resolve(&medleydb, "Clean Electric Guitar", gp);
        assert_eq!(r.target, Target::Category(Category::new("guitar")));
        let r = table.resolve(&medleydb, "Main System", gp);
        assert!(matches!(r.target, Target::Excluded(_)));
    }

    #[test]
    fn test_builtin_substem_routing() {
        let rules = RuleSet::builtin().unwrap();
        let vdbo = rules.profile("vdbo").unwrap();
        let moisesdb = CollectionId::moisesdb();
        let r = rules
            .table()
            .resolve_substem(
                &moisesdb,
                "percussion",
                "pitched_percussion_(mallets,_glockenspiel,_...)",
                vdbo,
            )
            .unwrap();
        assert_eq!(r.target, Target::Category(Category::new("other")));
        let r = rules
            .table()
            .resolve_substem(&moisesdb, "bass", "contrabass/double_bass_(bass_of_instrings)", vdbo)
            .unwrap();
        assert_eq!(r.target, Target::Category(Category::new("bass")));
    }

    #[test]
    fn test_version_mismatch() {
        let doc = MINIMAL.replace("version = 1", "version = 2");
        assert!(matches!(RuleSet::from_toml_str(&doc), Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_category_rejected() {
        let doc = format!("{}\n[collections.medleydb.labels]\n\"kazoo\" = \"brass\"\n", MINIMAL);
        assert!(matches!(RuleSet::from_toml_str(&doc), Err(Error::Config(_))));
    }

    #[test]
    fn test_duplicate_profile_rejected() {
        let doc = format!(
            "{}\n[[profiles]]\nname = \"vdbo\"\ncategories = [\"other\"]\ncatch_all = \"other\"\n",
            MINIMAL
        );
        assert!(RuleSet::from_toml_str(&doc).is_err());
    }

    #[test]
    fn test_exclude_and_reroute_same_stem_rejected() {
        let doc = format!(
            r#"{}
[[overrides.exclude_stems]]
collection = "medleydb"
track = "T"
stem = "S01"

[[overrides.reroute_stems]]
collection = "medleydb"
track = "T"
stem = "S01"
category = "bass"
"#,
            MINIMAL
        );
        assert!(matches!(RuleSet::from_toml_str(&doc), Err(Error::Config(_))));
    }

    #[test]
    fn test_override_lists_loaded() {
        let doc = format!(
            r#"{}
[[overrides.exclude_tracks]]
collection = "medleydb"
track = "Bad_Track"
reason = "misaligned stems"

[[overrides.reroute_stems]]
collection = "medleydb"
track = "T"
stem = "S04"
category = "Bass"
"#,
            MINIMAL
        );
        let rules = RuleSet::from_toml_str(&doc).unwrap();
        assert_eq!(
            rules
                .overrides()
                .track_exclusion(&TrackId::new("medleydb", "Bad_Track")),
            Some(Some("misaligned stems"))
        );
        assert!(rules
            .overrides()
            .stem_override(&TrackId::new("medleydb", "T"), "S04")
            .is_some());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let rules = RuleSet::from_file(&path).unwrap();
        assert_eq!(rules.profiles().len(), 1);

        std::fs::write(&path, "version = ").unwrap();
        assert!(matches!(RuleSet::from_file(&path), Err(Error::Config(_))));
    }
}
