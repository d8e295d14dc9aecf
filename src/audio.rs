//! Audio buffers and WAV I/O
//!
//! Stems are carried as interleaved `f32` frames. Decoding goes through
//! symphonia with a hound fallback for plain WAV; output is always 32-bit
//! float WAV.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Error, Result};

/// Channel count of every written output file
pub const OUTPUT_CHANNELS: u16 = 2;

/// Interleaved sample buffer with its format
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Interleaved samples
    pub samples: Vec<f32>,
    /// Number of channels
    pub channels: u16,
    /// Sample rate
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// Silent buffer of `frames` frames
    pub fn silence(frames: usize, channels: u16, sample_rate: u32) -> Self {
        Self::new(vec![0.0; frames * channels as usize], channels, sample_rate)
    }

    /// Number of frames
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / self.sample_rate as f64
        }
    }

    /// Absolute peak amplitude
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()))
    }

    /// Conform to the output layout: mono is duplicated to dual-mono,
    /// stereo passes through, anything wider is rejected.
    pub fn into_stereo(self) -> std::result::Result<AudioBuffer, String> {
        match self.channels {
            2 => Ok(self),
            1 => {
                let samples = self.samples.iter().flat_map(|&s| [s, s]).collect();
                Ok(AudioBuffer::new(samples, 2, self.sample_rate))
            }
            n => Err(format!("unsupported channel count {}", n)),
        }
    }

    /// Check structural sanity before use
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.channels == 0 {
            return Err("zero channels".to_string());
        }
        if self.sample_rate == 0 {
            return Err("zero sample rate".to_string());
        }
        if self.samples.len() % self.channels as usize != 0 {
            return Err(format!(
                "{} samples is not a whole number of {}-channel frames",
                self.samples.len(),
                self.channels
            ));
        }
        if self.samples.iter().any(|s| !s.is_finite()) {
            return Err("non-finite samples".to_string());
        }
        Ok(())
    }
}

/// Audio format detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioFormat {
    Wav,
    Flac,
    Unknown,
}

/// Detect audio format from file header bytes
pub fn detect_format(data: &[u8]) -> AudioFormat {
    if data.len() < 12 {
        return AudioFormat::Unknown;
    }

    // WAV: starts with "RIFF" and contains "WAVE"
    if &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE" {
        return AudioFormat::Wav;
    }

    if &data[0..4] == b"fLaC" {
        return AudioFormat::Flac;
    }

    AudioFormat::Unknown
}

/// Load audio samples from a WAV reader, keeping the channel layout
pub fn load_wav_from_reader<R: Read + Seek>(reader: R) -> Result<AudioBuffer> {
    let reader = WavReader::new(reader)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let max_val = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    Ok(AudioBuffer::new(samples, spec.channels, spec.sample_rate))
}

/// Decode audio with symphonia
pub fn load_audio_symphonia(data: Vec<u8>, extension: Option<&str>) -> Result<AudioBuffer> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(SymphoniaError::Unsupported("no supported audio track"))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        if channels == 0 {
            channels = spec.channels.count() as u16;
        }
        if sample_rate == 0 {
            sample_rate = spec.rate;
        }

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    Ok(AudioBuffer::new(samples, channels, sample_rate))
}

/// Load an audio file, auto-detecting format
pub fn load_audio_file(path: &Path) -> Result<AudioBuffer> {
    let mut data = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut data))
        .map_err(|e| Error::from_io(path, e))?;

    let extension = path.extension().and_then(|e| e.to_str());

    match detect_format(&data) {
        AudioFormat::Wav => {
            // hound covers plain PCM/float WAV; symphonia handles the rest
            let parsed = load_wav_from_reader(BufReader::new(Cursor::new(data.as_slice())));
            match parsed {
                Ok(buffer) => Ok(buffer),
                Err(_) => load_audio_symphonia(data, extension),
            }
        }
        AudioFormat::Flac | AudioFormat::Unknown => load_audio_symphonia(data, extension),
    }
}

fn output_spec(buffer: &AudioBuffer) -> WavSpec {
    WavSpec {
        channels: buffer.channels,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    }
}

/// Encode a buffer as 32-bit float WAV into any seekable writer
pub fn write_wav<W: Write + Seek>(writer: W, buffer: &AudioBuffer) -> Result<()> {
    let mut writer = WavWriter::new(writer, output_spec(buffer))?;
    for &sample in &buffer.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Encode audio samples as WAV bytes
pub fn encode_wav_to_bytes(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    write_wav(&mut cursor, buffer)?;
    Ok(cursor.into_inner())
}

/// Exact byte size `write_wav` produces for `buffer`
///
/// Used to recognise an already-complete output file without re-encoding.
pub fn encoded_wav_len(buffer: &AudioBuffer) -> Result<u64> {
    encoded_wav_size(buffer.channels, buffer.sample_rate, buffer.samples.len() as u64)
}

/// Byte size `write_wav` produces for `samples` interleaved samples
pub fn encoded_wav_size(channels: u16, sample_rate: u32, samples: u64) -> Result<u64> {
    let header = encode_wav_to_bytes(&AudioBuffer::new(Vec::new(), channels, sample_rate))?;
    Ok(header.len() as u64 + samples * 4)
}
