//! Per-track stem summation
//!
//! Every stem is resolved to a category (or excluded), decoded, conformed
//! to stereo and added into its category's buffer. Stems are consumed in
//! `stem_id` order, so the summed samples are bit-identical however the
//! adapter happened to list them.

use std::collections::BTreeMap;

use crate::audio::{AudioBuffer, OUTPUT_CHANNELS};
use crate::collections::{StemDescriptor, TrackDescriptor};
use crate::error::{Error, Result};
use crate::mapping::{ExclusionReason, MappingNote, Resolver, Target};
use crate::profile::Category;

/// Peak at or below which a composed buffer counts as silent
pub const SILENCE_FLOOR: f32 = 1e-5;

/// Sum of every stem resolved to one category
#[derive(Debug, Clone)]
pub struct CategoryBuffer {
    pub category: Category,
    pub buffer: AudioBuffer,
    /// Contributing stem ids, in summation order
    pub stems: Vec<String>,
    pub notes: Vec<MappingNote>,
    pub has_bleed: bool,
}

impl CategoryBuffer {
    pub fn new(category: Category, sample_rate: u32) -> Self {
        Self {
            category,
            buffer: AudioBuffer::new(Vec::new(), OUTPUT_CHANNELS, sample_rate),
            stems: Vec::new(),
            notes: Vec::new(),
            has_bleed: false,
        }
    }

    /// Add `samples` (same layout and rate), growing to the longer length
    pub fn add(&mut self, stem_id: &str, samples: &AudioBuffer) {
        mix_into(&mut self.buffer.samples, &samples.samples);
        self.stems.push(stem_id.to_string());
    }

    pub fn is_composite(&self) -> bool {
        self.stems.len() > 1
    }

    pub fn peak(&self) -> f32 {
        self.buffer.peak()
    }

    pub fn is_silent(&self) -> bool {
        self.peak() <= SILENCE_FLOOR
    }
}

fn mix_into(acc: &mut Vec<f32>, samples: &[f32]) {
    if acc.len() < samples.len() {
        acc.resize(samples.len(), 0.0);
    }
    for (a, s) in acc.iter_mut().zip(samples) {
        *a += s;
    }
}

/// A stem that resolved to a category but could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedStem {
    pub stem: String,
    pub label: String,
    pub reason: String,
}

/// A stem the resolver excluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedStem {
    pub stem: String,
    pub label: String,
    pub reason: ExclusionReason,
}

/// Result of composing one track
#[derive(Debug, Clone, Default)]
pub struct Composition {
    pub categories: BTreeMap<Category, CategoryBuffer>,
    pub excluded: Vec<ExcludedStem>,
    pub skipped: Vec<SkippedStem>,
    /// Sum of every contributing stem, when requested
    pub mixture: Option<AudioBuffer>,
    /// Rate fixed by the first usable stem
    pub sample_rate: Option<u32>,
}

impl Composition {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Every stem was excluded; nothing failed
    pub fn all_excluded(&self) -> bool {
        self.categories.is_empty() && self.skipped.is_empty()
    }

    /// Some stems resolved to categories but none could be decoded
    pub fn nothing_composable(&self) -> bool {
        self.categories.is_empty() && !self.skipped.is_empty()
    }
}

/// Compose `track` into category buffers
///
/// Stem-level failures are recorded in [`Composition::skipped`]. Only
/// fatal errors (see [`Error::is_fatal`]) are returned.
pub fn compose(
    track: &TrackDescriptor,
    resolver: &Resolver<'_>,
    with_mixture: bool,
) -> Result<Composition> {
    let mut stems: Vec<&StemDescriptor> = track.stems.iter().collect();
    stems.sort_by(|a, b| a.stem_id.cmp(&b.stem_id));

    let mut composition = Composition::default();
    let mut mixture: Vec<f32> = Vec::new();

    for stem in stems {
        let resolution = resolver.resolve_stem(&track.id, stem);
        let category = match resolution.target {
            Target::Category(category) => category,
            Target::Excluded(reason) => {
                tracing::debug!(track = %track.id, stem = %stem.stem_id, label = %stem.label, ?reason, "Stem excluded");
                composition.excluded.push(ExcludedStem {
                    stem: stem.stem_id.clone(),
                    label: stem.label.clone(),
                    reason,
                });
                continue;
            }
        };

        let samples = match load_stem(stem, composition.sample_rate) {
            Ok(samples) => samples,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(track = %track.id, stem = %stem.stem_id, error = %e, "Skipping stem");
                composition.skipped.push(SkippedStem {
                    stem: stem.stem_id.clone(),
                    label: stem.label.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };
        let sample_rate = *composition.sample_rate.get_or_insert(samples.sample_rate);

        let entry = composition
            .categories
            .entry(category.clone())
            .or_insert_with(|| CategoryBuffer::new(category, sample_rate));
        entry.add(&stem.stem_id, &samples);
        entry.has_bleed |= stem.has_bleed || track.has_bleed;
        if let Some(note) = resolution.note {
            entry.notes.push(note);
        }

        if with_mixture {
            mix_into(&mut mixture, &samples.samples);
        }
    }

    if with_mixture {
        if let Some(rate) = composition.sample_rate {
            composition.mixture = Some(AudioBuffer::new(mixture, OUTPUT_CHANNELS, rate));
        }
    }

    Ok(composition)
}

/// Decode one stem and conform it to the output layout
fn load_stem(stem: &StemDescriptor, expected_rate: Option<u32>) -> Result<AudioBuffer> {
    let buffer = stem.audio.load().map_err(|e| {
        if e.is_fatal() {
            e
        } else {
            Error::corrupt_stem(&stem.stem_id, e)
        }
    })?;
    buffer
        .validate()
        .map_err(|reason| Error::corrupt_stem(&stem.stem_id, reason))?;

    if let Some(rate) = expected_rate {
        if buffer.sample_rate != rate {
            return Err(Error::corrupt_stem(
                &stem.stem_id,
                format!("sample rate {} differs from track rate {}", buffer.sample_rate, rate),
            ));
        }
    }

    buffer
        .into_stereo()
        .map_err(|reason| Error::corrupt_stem(&stem.stem_id, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::{AudioSource, CollectionId};
    use crate::mapping::{CollectionRules, LabelTable};
    use crate::overrides::OverrideRegistry;
    use crate::profile::Profile;

    fn table() -> LabelTable {
        LabelTable::new(Category::new("other")).with_collection(
            CollectionId::medleydb(),
            CollectionRules::default()
                .label("male singer", "vocals")
                .label("female singer", "vocals")
                .label("drum set", "drums")
                .label("acoustic guitar", "guitar")
                .exclude_label("main system"),
        )
        .with_collection(
            CollectionId::moisesdb(),
            CollectionRules::default().substem("bass", "bass_guitar", "bass"),
        )
    }

    fn stem(id: &str, label: &str, samples: Vec<f32>, channels: u16) -> StemDescriptor {
        StemDescriptor::new(
            id,
            label,
            AudioSource::Buffer(AudioBuffer::new(samples, channels, 44100)),
        )
    }

    fn compose_with(track: &TrackDescriptor, mixture: bool) -> Composition {
        let table = table();
        let overrides = OverrideRegistry::default();
        let profile = Profile::vdbo();
        compose(track, &Resolver::new(&table, &overrides, &profile), mixture).unwrap()
    }

    fn track(stems: Vec<StemDescriptor>) -> TrackDescriptor {
        let mut t = TrackDescriptor::new("medleydb", "Artist_Song", "Artist", "Song", 1);
        t.stems = stems;
        t
    }

    #[test]
    fn test_two_vocals_one_drums() {
        let t = track(vec![
            stem("A", "male singer", vec![0.1, 0.1, 0.2, 0.2], 2),
            stem("B", "female singer", vec![0.3, 0.3], 2),
            stem("C", "drum set", vec![0.5, -0.5, 0.5, -0.5], 2),
        ]);
        let c = compose_with(&t, false);

        let keys: Vec<_> = c.categories.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["drums", "vocals"]);

        let vocals = &c.categories[&Category::new("vocals")];
        assert!(vocals.is_composite());
        // shorter stem is zero-padded
        assert_eq!(vocals.buffer.samples, vec![0.1 + 0.3, 0.1 + 0.3, 0.2, 0.2]);

        let drums = &c.categories[&Category::new("drums")];
        assert!(!drums.is_composite());
        assert_eq!(drums.stems, vec!["C".to_string()]);
    }

    #[test]
    fn test_permutation_invariance() {
        let stems = vec![
            stem("S01", "male singer", vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 2),
            stem("S02", "female singer", vec![1e-8, 0.7, 0.11, 0.13], 2),
            stem("S03", "male singer", vec![0.33, -0.21, 0.9], 1),
        ];
        let forward = compose_with(&track(stems.clone()), true);
        let reversed = compose_with(&track(stems.into_iter().rev().collect()), true);

        let v = Category::new("vocals");
        assert_eq!(
            forward.categories[&v].buffer.samples,
            reversed.categories[&v].buffer.samples
        );
        assert_eq!(forward.mixture, reversed.mixture);
    }

    #[test]
    fn test_categories_stay_within_profile() {
        let t = track(vec![
            stem("A", "acoustic guitar", vec![0.2, 0.2], 2),
            stem("B", "kazoo", vec![0.1, 0.1], 2),
        ]);
        let c = compose_with(&t, false);
        let profile = Profile::vdbo();
        assert!(c.categories.keys().all(|k| profile.contains(k)));
        let other = &c.categories[&Category::new("other")];
        assert_eq!(other.stems.len(), 2);
        assert!(matches!(other.notes.as_slice(), [MappingNote::UnknownLabel { .. }]));
    }

    #[test]
    fn test_all_excluded_track_is_empty() {
        let t = track(vec![stem("S00", "Main System", vec![0.5, 0.5], 2)]);
        let c = compose_with(&t, true);
        assert!(c.is_empty());
        assert!(c.all_excluded());
        assert_eq!(c.excluded.len(), 1);
        assert!(c.mixture.is_none());
    }

    #[test]
    fn test_silent_buffer_flagged_not_dropped() {
        let t = track(vec![stem("A", "drum set", vec![0.0; 8], 2)]);
        let c = compose_with(&t, false);
        assert!(c.categories[&Category::new("drums")].is_silent());
    }

    #[test]
    fn test_corrupt_stem_skipped() {
        let t = track(vec![
            stem("A", "drum set", vec![0.5, 0.5], 2),
            stem("B", "male singer", vec![0.1, 0.2, 0.3], 2),
            stem("C", "male singer", vec![0.1; 12], 6),
        ]);
        let c = compose_with(&t, false);
        assert_eq!(c.skipped.len(), 2);
        assert_eq!(c.categories.len(), 1);
    }

    #[test]
    fn test_sample_rate_mismatch_skipped() {
        let mut other_rate = stem("B", "male singer", vec![0.1, 0.1], 2);
        other_rate.audio = AudioSource::Buffer(AudioBuffer::new(vec![0.1, 0.1], 2, 48000));
        let t = track(vec![stem("A", "drum set", vec![0.5, 0.5], 2), other_rate]);
        let c = compose_with(&t, false);
        assert_eq!(c.sample_rate, Some(44100));
        assert_eq!(c.skipped.len(), 1);
        assert_eq!(c.skipped[0].stem, "B");
    }

    #[test]
    fn test_nothing_composable() {
        let mut t = track(vec![stem("A", "drum set", vec![], 2)]);
        t.stems[0].audio = AudioSource::File("/nonexistent/stem.wav".into());
        let c = compose_with(&t, false);
        assert!(c.nothing_composable());
    }

    #[test]
    fn test_unknown_substem_keeps_audio() {
        let mut t = TrackDescriptor::new("moisesdb", "x", "A", "T", 1);
        t.stems = vec![
            stem("1", "bass", vec![0.2, 0.2], 2).with_sub_label("bass_guitar"),
            stem("2", "bass", vec![0.4, 0.4], 2).with_sub_label("renamed_bass_thing"),
        ];
        let c = compose_with(&t, false);
        assert_eq!(c.categories[&Category::new("bass")].stems, vec!["1".to_string()]);
        let other = &c.categories[&Category::new("other")];
        assert_eq!(other.buffer.samples, vec![0.4, 0.4]);
        assert!(matches!(other.notes.as_slice(), [MappingNote::UnknownSubStem { .. }]));
    }

    #[test]
    fn test_mixture_sums_everything() {
        let t = track(vec![
            stem("A", "male singer", vec![0.25, 0.25], 2),
            stem("B", "drum set", vec![0.5, 0.5], 2),
        ]);
        let c = compose_with(&t, true);
        assert_eq!(c.mixture.unwrap().samples, vec![0.75, 0.75]);
    }
}
