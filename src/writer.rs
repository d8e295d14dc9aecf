//! Output layout and exactly-once file writes
//!
//! Every file is written to a `.tmp` sibling and renamed into place, so a
//! file under its final name is always complete. A final file whose size
//! matches what the encoder would produce is treated as done and skipped.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader};
use walkdir::WalkDir;

use crate::audio::{encoded_wav_len, encoded_wav_size, write_wav, AudioBuffer};
use crate::collections::CollectionId;
use crate::error::{Error, Result};

/// Suffix of in-progress files
pub const TMP_SUFFIX: &str = ".tmp";

/// Directory holding the run's metadata files
pub const METADATA_DIR: &str = "metadata";

/// Directory holding mixtures when they are written
pub const MIXTURE_DIR: &str = "mixture";

/// `path` with [`TMP_SUFFIX`] appended to its file name
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(TMP_SUFFIX);
    path.with_file_name(name)
}

/// Hound wraps I/O failures; unwrap them so out-of-space stays fatal
fn classify(path: &Path, err: Error) -> Error {
    match err {
        Error::Io(e) | Error::Wav(hound::Error::IoError(e)) => Error::from_io(path, e),
        other => other,
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::from_io(parent, e))?;
    }
    Ok(())
}

/// Write through `fill` into a temporary sibling, then rename over `path`
fn write_via_tmp<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    create_parent(path)?;
    let tmp = tmp_path(path);

    let result = File::create(&tmp)
        .map_err(|e| Error::from_io(&tmp, e))
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            fill(&mut writer).map_err(|e| classify(&tmp, e))?;
            let file = writer
                .into_inner()
                .map_err(|e| Error::from_io(&tmp, e.into_error()))?;
            file.sync_all().map_err(|e| Error::from_io(&tmp, e))
        })
        .and_then(|()| fs::rename(&tmp, path).map_err(|e| Error::from_io(path, e)));

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Atomically replace `path` with `bytes`
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    write_via_tmp(path, |w| w.write_all(bytes).map_err(Error::Io))
}

/// Where output files go
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
    group_by_collection: bool,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>, group_by_collection: bool) -> Self {
        Self {
            root: root.into(),
            group_by_collection,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn group_by_collection(&self) -> bool {
        self.group_by_collection
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join(METADATA_DIR)
    }

    /// `<root>/<dir>[/<collection>]/<name>.wav`
    pub fn file_path(&self, dir: &str, collection: &CollectionId, name: &str) -> PathBuf {
        let mut path = self.root.join(dir);
        if self.group_by_collection {
            path.push(collection.as_str());
        }
        path.join(format!("{}.wav", name))
    }
}

/// What happened to one output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// A complete file was already in place
    SkippedExisting,
}

/// Writes output files at most once each
#[derive(Debug, Clone)]
pub struct WriteCoordinator {
    layout: OutputLayout,
}

impl WriteCoordinator {
    pub fn new(layout: OutputLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Delete `*.tmp` leftovers of an interrupted run
    pub fn cleanup_temp_files(&self) -> Result<usize> {
        if !self.layout.root.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in WalkDir::new(&self.layout.root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let is_tmp = entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.ends_with(TMP_SUFFIX));
            if is_tmp {
                fs::remove_file(entry.path()).map_err(|e| Error::from_io(entry.path(), e))?;
                tracing::debug!(path = %entry.path().display(), "Removed leftover temp file");
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(count = removed, "Cleaned up temp files from interrupted run");
        }
        Ok(removed)
    }

    /// Whether `path` already holds the complete encoding of `buffer`
    pub fn is_complete(&self, path: &Path, buffer: &AudioBuffer) -> Result<bool> {
        let expected = encoded_wav_len(buffer)?;
        Ok(fs::metadata(path).map(|m| m.len() == expected).unwrap_or(false))
    }

    /// Whether `path` holds a complete file as this writer produces it,
    /// judged from the header alone
    pub fn is_complete_file(&self, path: &Path) -> bool {
        let Ok(reader) = WavReader::open(path) else {
            return false;
        };
        let spec = reader.spec();
        if spec.sample_format != SampleFormat::Float || spec.bits_per_sample != 32 {
            return false;
        }
        let expected = encoded_wav_size(spec.channels, spec.sample_rate, u64::from(reader.len()));
        match (expected, fs::metadata(path)) {
            (Ok(expected), Ok(meta)) => meta.len() == expected,
            _ => false,
        }
    }

    /// Write `buffer` to `path` unless a complete copy is already there
    pub fn write_buffer(&self, path: &Path, buffer: &AudioBuffer) -> Result<WriteOutcome> {
        if self.is_complete(path, buffer)? {
            tracing::debug!(path = %path.display(), "Output already complete, skipping");
            return Ok(WriteOutcome::SkippedExisting);
        }
        write_via_tmp(path, |w| write_wav(w, buffer))?;
        Ok(WriteOutcome::Written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> AudioBuffer {
        AudioBuffer::new(vec![0.25, -0.25, 0.5, -0.5], 2, 44100)
    }

    #[test]
    fn test_paths() {
        let flat = OutputLayout::new("/out", false);
        assert_eq!(
            flat.file_path("vocals", &CollectionId::medleydb(), "x"),
            PathBuf::from("/out/vocals/x.wav")
        );
        let grouped = OutputLayout::new("/out", true);
        assert_eq!(
            grouped.file_path("vocals", &CollectionId::medleydb(), "x"),
            PathBuf::from("/out/vocals/medleydb/x.wav")
        );
        assert_eq!(tmp_path(Path::new("/out/a.wav")), PathBuf::from("/out/a.wav.tmp"));
    }

    #[test]
    fn test_write_then_skip() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = WriteCoordinator::new(OutputLayout::new(dir.path(), false));
        let path = dir.path().join("drums").join("t.wav");

        assert_eq!(coordinator.write_buffer(&path, &buffer()).unwrap(), WriteOutcome::Written);
        assert!(!tmp_path(&path).exists());
        assert_eq!(
            coordinator.write_buffer(&path, &buffer()).unwrap(),
            WriteOutcome::SkippedExisting
        );
    }

    #[test]
    fn test_truncated_file_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = WriteCoordinator::new(OutputLayout::new(dir.path(), false));
        let path = dir.path().join("t.wav");
        fs::write(&path, b"RIFF").unwrap();

        assert_eq!(coordinator.write_buffer(&path, &buffer()).unwrap(), WriteOutcome::Written);
        assert!(coordinator.is_complete(&path, &buffer()).unwrap());
    }

    #[test]
    fn test_complete_file_from_header() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = WriteCoordinator::new(OutputLayout::new(dir.path(), false));
        let path = dir.path().join("t.wav");
        assert!(!coordinator.is_complete_file(&path));

        coordinator.write_buffer(&path, &buffer()).unwrap();
        assert!(coordinator.is_complete_file(&path));

        // header intact, last sample cut off
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();
        assert!(!coordinator.is_complete_file(&path));
    }

    #[test]
    fn test_cleanup_removes_only_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("bass");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("a.wav.tmp"), b"partial").unwrap();
        fs::write(nested.join("b.wav"), b"done").unwrap();

        let coordinator = WriteCoordinator::new(OutputLayout::new(dir.path(), false));
        assert_eq!(coordinator.cleanup_temp_files().unwrap(), 1);
        assert!(!nested.join("a.wav.tmp").exists());
        assert!(nested.join("b.wav").exists());
    }

    #[test]
    fn test_write_atomic_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata").join("x.json");
        write_atomic(&path, b"{}").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"{}");
    }
}
