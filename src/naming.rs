//! Output file names
//!
//! A track's base name is `{collection}_{split}_{index:04}_{artist}_{title}`
//! with the artist/title part sanitized and capped at [`MAX_NAME_LEN`]
//! characters. Every category file of a track shares that base name.

use std::collections::{HashMap, HashSet};

use crate::collections::{CollectionId, TrackDescriptor};
use crate::splits::Split;

/// Cap on the sanitized artist/title part
pub const MAX_NAME_LEN: usize = 80;

/// Transliterated to ASCII, lowercase, `[a-z0-9_-]` only, runs of `_`
/// collapsed, no edge `_`
pub fn sanitize_text(text: &str) -> String {
    let ascii = deunicode::deunicode(text);
    let mut out = String::with_capacity(ascii.len());
    for c in ascii.chars().map(|c| c.to_ascii_lowercase()) {
        let c = if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('_').to_string()
}

pub fn base_filename(
    collection: &CollectionId,
    split: Split,
    index: u32,
    artist: &str,
    title: &str,
) -> String {
    let mut name = sanitize_text(&format!("{}_{}", artist, title));
    if name.len() > MAX_NAME_LEN {
        name.truncate(MAX_NAME_LEN);
        name.truncate(name.trim_end_matches('_').len());
    }
    format!("{}_{}_{:04}_{}", collection, split, index, name)
}

/// First of `name`, `name_2`, `name_3`, ... not in `taken`
pub fn resolve_collision(name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    (2..)
        .map(|i| format!("{}_{}", name, i))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

/// Hands out collision-free base names, one per track
///
/// Names are unique per output directory: per collection when output is
/// grouped by collection, across the whole run otherwise. Reserve in a
/// stable track order to get stable suffixes.
#[derive(Debug, Default)]
pub struct FilenamePlanner {
    group_by_collection: bool,
    taken: HashMap<Option<CollectionId>, HashSet<String>>,
}

impl FilenamePlanner {
    pub fn new(group_by_collection: bool) -> Self {
        Self {
            group_by_collection,
            taken: HashMap::new(),
        }
    }

    pub fn reserve(&mut self, track: &TrackDescriptor, split: Split) -> String {
        let base = base_filename(
            track.collection(),
            split,
            track.index,
            &track.artist,
            &track.title,
        );
        let scope = self
            .group_by_collection
            .then(|| track.collection().clone());
        let taken = self.taken.entry(scope).or_default();
        let name = resolve_collision(&base, taken);
        if name != base {
            tracing::debug!(track = %track.id, name = %name, "Filename collision, added suffix");
        }
        taken.insert(name.clone());
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_text("Hop Along_Sister Cities"), "hop_along_sister_cities");
        assert_eq!(sanitize_text("  AC/DC -- T.N.T.  "), "ac_dc_--_t_n_t");
        assert_eq!(sanitize_text("Beyoncé"), "beyonce");
        assert_eq!(sanitize_text("Sigur Rós"), "sigur_ros");
    }

    #[test]
    fn test_base_filename() {
        let name = base_filename(
            &CollectionId::musdb18hq(),
            Split::Test,
            7,
            "Hop Along",
            "Sister Cities",
        );
        assert_eq!(name, "musdb18hq_test_0007_hop_along_sister_cities");
    }

    #[test]
    fn test_long_names_truncated() {
        let title = "word ".repeat(40);
        let name = base_filename(&CollectionId::medleydb(), Split::Train, 1, "A", &title);
        let part = name.trim_start_matches("medleydb_train_0001_");
        assert!(part.len() <= MAX_NAME_LEN);
        assert!(!part.ends_with('_'));
    }

    #[test]
    fn test_collision_suffixes() {
        let mut taken = HashSet::new();
        taken.insert("a".to_string());
        taken.insert("a_2".to_string());
        assert_eq!(resolve_collision("a", &taken), "a_3");
        assert_eq!(resolve_collision("b", &taken), "b");
    }

    #[test]
    fn test_planner_scopes() {
        let a = TrackDescriptor::new("medleydb", "x", "Same", "Name", 1);
        let b = TrackDescriptor::new("medleydb", "y", "Same", "Name", 1);

        let mut planner = FilenamePlanner::new(false);
        assert_eq!(planner.reserve(&a, Split::Train), "medleydb_train_0001_same_name");
        assert_eq!(planner.reserve(&b, Split::Train), "medleydb_train_0001_same_name_2");
    }
}
