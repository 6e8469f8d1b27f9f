//! # Audio Processing Module
//!
//! Everything between the raw upload and the speech model.
//!
//! ## Key Components:
//! - **Normalizer**: transcodes any upload into the canonical WAV via ffmpeg
//! - **WAV decoding**: canonical WAV bytes → mono `f32` samples
//! - **Voice activity detection**: drops non-speech regions before decoding
//! - **Mel filters**: the filter bank the Whisper front end needs
//!
//! ## Canonical Audio Format:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Container**: RIFF/WAV

pub mod mel;
pub mod normalizer;
pub mod vad;
pub mod wav;

pub use normalizer::{AudioNormalizer, FfmpegNormalizer, NormalizeError};

/// Sample rate every stage after normalization works at.
pub const SAMPLE_RATE: u32 = 16_000;
