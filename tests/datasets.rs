use std::fs;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use mss_aggregate::manifest::{MetadataWriter, ERRORS_FILE};
use mss_aggregate::writer::METADATA_DIR;
use mss_aggregate::{load_audio_file, AggregateConfig, Pipeline, Split};

/// 16-bit mono WAV with a constant value
fn write_stem(path: &Path, value: i16, frames: usize) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let spec = WavSpec {
        channels: 1,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for _ in 0..frames {
        writer.write_sample(value).unwrap();
    }
    writer.finalize().unwrap();
}

fn medleydb_track(root: &Path, name: &str, yaml: &str, stems: &[(&str, i16, usize)]) {
    let dir = root.join("Audio").join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{name}_METADATA.yaml")), yaml).unwrap();
    for (stem, value, frames) in stems {
        write_stem(
            &dir.join(format!("{name}_STEMS")).join(format!("{name}_STEM_{stem}.wav")),
            *value,
            *frames,
        );
    }
}

#[test]
fn test_medleydb_end_to_end() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    medleydb_track(
        data.path(),
        "Band_Song",
        r#"
artist: Band
title: Song
has_bleed: no
stems:
  S01:
    instrument: male singer
  S02:
    instrument: female singer
  S03:
    instrument: drum set
  S04:
    instrument: Main System
"#,
        &[("01", 8192, 100), ("02", 8192, 50), ("03", 4096, 100), ("04", 1000, 100)],
    );
    medleydb_track(data.path(), "Broken_Meta", "stems: [", &[]);

    let config = AggregateConfig {
        medleydb_path: Some(data.path().to_path_buf()),
        output: out.path().to_path_buf(),
        ..Default::default()
    };
    let report = Pipeline::from_config(config).unwrap().run().unwrap();
    assert_eq!(report.tracks_discovered, 2);
    assert_eq!(report.tracks_skipped, 1);
    assert_eq!(report.files_written, 2);

    // mono stems come out stereo, padded to the longest stem
    let vocals =
        load_audio_file(&out.path().join("vocals/medleydb_train_0001_band_song.wav")).unwrap();
    assert_eq!(vocals.channels, 2);
    assert_eq!(vocals.frames(), 100);
    assert!((vocals.samples[0] - 0.5).abs() < 1e-6);
    assert!((vocals.samples[199] - 0.25).abs() < 1e-6);

    let errors = fs::read_to_string(out.path().join(METADATA_DIR).join(ERRORS_FILE)).unwrap();
    assert!(errors.contains("Broken_Meta"));
    assert!(errors.contains("discover"));
}

#[test]
fn test_musdb18hq_keeps_directory_split() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    for (split, track) in [("train", "Alpha - One"), ("test", "Beta - Two")] {
        for stem in ["vocals", "drums", "bass", "other"] {
            write_stem(&data.path().join(split).join(track).join(format!("{stem}.wav")), 100, 10);
        }
    }

    let config = AggregateConfig {
        musdb18hq_path: Some(data.path().to_path_buf()),
        output: out.path().to_path_buf(),
        workers: 2,
        ..Default::default()
    };
    let report = Pipeline::from_config(config).unwrap().run().unwrap();
    assert_eq!(report.files_written, 8);

    let manifest = MetadataWriter::new(out.path().join(METADATA_DIR))
        .read_manifest()
        .unwrap();
    assert_eq!(manifest.len(), 8);
    assert!(manifest
        .iter()
        .filter(|e| e.track == "Beta - Two")
        .all(|e| e.split == Split::Test));
    assert!(out.path().join("bass/musdb18hq_test_0002_beta_two.wav").is_file());
}

#[test]
fn test_dry_run_writes_nothing() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let moises = data.path().join("track-1");
    fs::create_dir_all(&moises).unwrap();
    fs::write(
        moises.join("data.json"),
        r#"{"artist": "A", "song": "B", "genre": "pop",
            "stems": [{"stemName": "vocals", "tracks": [{"id": "v", "trackType": "lead female singer", "extension": "wav"}]}]}"#,
    )
    .unwrap();
    write_stem(&moises.join("vocals/v.wav"), 10, 10);

    let config = AggregateConfig {
        moisesdb_path: Some(data.path().to_path_buf()),
        output: out.path().join("aggregated"),
        dry_run: true,
        ..Default::default()
    };
    let plan = Pipeline::from_config(config).unwrap().plan().unwrap();
    assert_eq!(plan.tracks.len(), 1);
    // fewer tracks than the validation quota: all validation
    assert_eq!(plan.tracks[0].split, Split::Validation);
    assert!(!out.path().join("aggregated").exists());
}

#[test]
fn test_stems_missing_at_discovery_are_recorded() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let musdb = data.path().join("musdb");
    for stem in ["vocals", "drums", "bass"] {
        write_stem(&musdb.join("train/Band - Song").join(format!("{stem}.wav")), 100, 10);
    }
    fs::create_dir_all(musdb.join("test")).unwrap();

    let medleydb = data.path().join("medleydb");
    medleydb_track(
        &medleydb,
        "Solo_Piece",
        r#"
stems:
  S01:
    instrument: piano
  S02:
    filename: Solo_Piece_STEM_02.wav
"#,
        &[("01", 100, 10), ("02", 100, 10)],
    );

    let config = AggregateConfig {
        musdb18hq_path: Some(musdb),
        medleydb_path: Some(medleydb),
        output: out.path().to_path_buf(),
        ..Default::default()
    };
    let report = Pipeline::from_config(config).unwrap().run().unwrap();
    assert_eq!(report.files_written, 4);
    assert_eq!(report.stems_skipped, 2);

    let errors: serde_json::Value = serde_json::from_slice(
        &fs::read(out.path().join(METADATA_DIR).join(ERRORS_FILE)).unwrap(),
    )
    .unwrap();
    let mut skipped: Vec<(String, String, String)> = errors
        .as_array()
        .unwrap()
        .iter()
        .map(|e| {
            (
                e["track"]["name"].as_str().unwrap().to_string(),
                e["stem"].as_str().unwrap().to_string(),
                e["stage"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    skipped.sort();
    assert_eq!(
        skipped,
        vec![
            ("Band - Song".to_string(), "other".to_string(), "discover".to_string()),
            ("Solo_Piece".to_string(), "S02".to_string(), "discover".to_string()),
        ]
    );
}
