//! WAV decoding for normalized uploads.

use super::SAMPLE_RATE;
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WavError {
    #[error("invalid WAV data: {0}")]
    Read(#[from] std::io::Error),

    #[error("unsupported WAV encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("expected {expected} Hz audio, got {actual} Hz")]
    SampleRate { expected: u32, actual: u32 },
}

/// Decode a WAV byte stream into mono `f32` samples in [-1, 1].
///
/// 16-bit PCM is what the normalizer produces; 32-bit float is accepted as
/// well. Multi-channel input is averaged down to mono.
pub fn decode_wav(bytes: &[u8]) -> Result<Vec<f32>, WavError> {
    let mut reader = Cursor::new(bytes);
    let (header, data) = wav::read(&mut reader)?;

    if header.sampling_rate != SAMPLE_RATE {
        return Err(WavError::SampleRate {
            expected: SAMPLE_RATE,
            actual: header.sampling_rate,
        });
    }

    let interleaved: Vec<f32> = match data {
        wav::BitDepth::Sixteen(samples) => samples
            .into_iter()
            .map(|s| s as f32 / i16::MAX as f32)
            .collect(),
        wav::BitDepth::ThirtyTwoFloat(samples) => samples,
        wav::BitDepth::Eight(_) => {
            return Err(WavError::UnsupportedEncoding("8-bit PCM".to_string()))
        }
        wav::BitDepth::TwentyFour(_) => {
            return Err(WavError::UnsupportedEncoding("24-bit PCM".to_string()))
        }
        wav::BitDepth::Empty => {
            return Err(WavError::UnsupportedEncoding("no sample data".to_string()))
        }
    };

    let channels = header.channel_count.max(1) as usize;
    if channels == 1 {
        return Ok(interleaved);
    }

    Ok(interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect())
}
