//! Voice activity detection over normalized 16 kHz audio.
//!
//! WebRTC VAD classifies fixed 30 ms frames; a small hysteresis turns the
//! per-frame decisions into speech regions, which are padded, merged and
//! concatenated back into one buffer for the recognizer.

use std::ops::Range;
use webrtc_vad::{SampleRate, Vad, VadMode};

const FRAME_MS: usize = 30;
const FRAME_LEN: usize = super::SAMPLE_RATE as usize * FRAME_MS / 1000;

#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Speech needed to open a region.
    pub min_speech_ms: usize,
    /// Silence needed to close a region.
    pub min_silence_ms: usize,
    /// Extra audio kept on both sides of a region.
    pub pad_ms: usize,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            min_speech_ms: 250,
            min_silence_ms: 500,
            pad_ms: 400,
        }
    }
}

impl VadConfig {
    pub fn with_min_silence_ms(min_silence_ms: usize) -> Self {
        Self {
            min_silence_ms,
            ..Self::default()
        }
    }
}

fn frames_for(ms: usize) -> usize {
    ms.div_ceil(FRAME_MS)
}

/// Find speech regions, as sample ranges into `samples`.
///
/// The detector is `!Send`, so it is created per call on whatever thread
/// runs the analysis.
pub fn speech_regions(samples: &[f32], cfg: &VadConfig) -> Vec<Range<usize>> {
    let n_frames = samples.len() / FRAME_LEN;
    if n_frames == 0 {
        return Vec::new();
    }

    let mut vad = Vad::new_with_rate_and_mode(SampleRate::Rate16kHz, VadMode::Aggressive);
    let pcm: Vec<i16> = samples
        .iter()
        .map(|&v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect();

    let voice: Vec<bool> = pcm
        .chunks_exact(FRAME_LEN)
        .map(|frame| vad.is_voice_segment(frame).unwrap_or(false))
        .collect();

    let min_speech = frames_for(cfg.min_speech_ms).max(1);
    let min_silence = frames_for(cfg.min_silence_ms).max(1);
    let pad = frames_for(cfg.pad_ms);

    let mut raw: Vec<(usize, usize)> = Vec::new();
    let mut in_speech = false;
    let mut start = 0usize;
    let mut speech_streak = 0usize;
    let mut silence_streak = 0usize;

    for (i, &is_voice) in voice.iter().enumerate() {
        if is_voice {
            silence_streak = 0;
            if !in_speech {
                speech_streak += 1;
                if speech_streak >= min_speech {
                    in_speech = true;
                    start = i + 1 - speech_streak;
                }
            }
        } else {
            speech_streak = 0;
            if in_speech {
                silence_streak += 1;
                if silence_streak >= min_silence {
                    raw.push((start, i + 1 - silence_streak));
                    in_speech = false;
                    silence_streak = 0;
                }
            }
        }
    }
    if in_speech {
        raw.push((start, voice.len()));
    }

    let mut merged: Vec<Range<usize>> = Vec::with_capacity(raw.len());
    for (first, last) in raw {
        let begin = first.saturating_sub(pad) * FRAME_LEN;
        let end = ((last + pad).min(voice.len()) * FRAME_LEN).min(samples.len());
        match merged.last_mut() {
            Some(prev) if begin <= prev.end => prev.end = prev.end.max(end),
            _ => merged.push(begin..end),
        }
    }

    merged
}

/// Keep only the speech regions of `samples`. Returns an empty buffer when
/// no speech was found.
pub fn retain_speech(samples: &[f32], cfg: &VadConfig) -> Vec<f32> {
    speech_regions(samples, cfg)
        .into_iter()
        .flat_map(|range| samples[range].iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_has_no_speech() {
        let silence = vec![0.0f32; 16_000 * 2];
        assert!(speech_regions(&silence, &VadConfig::default()).is_empty());
        assert!(retain_speech(&silence, &VadConfig::default()).is_empty());
    }

    #[test]
    fn test_shorter_than_one_frame() {
        let samples = vec![0.3f32; FRAME_LEN - 1];
        assert!(speech_regions(&samples, &VadConfig::default()).is_empty());
    }

    #[test]
    fn test_regions_stay_in_bounds() {
        // Harmonic-rich tone bursts; whatever the detector decides, ranges must be valid.
        let mut samples = Vec::new();
        for burst in 0..4 {
            for n in 0..16_000 {
                let t = n as f32 / 16_000.0;
                let v = if burst % 2 == 0 {
                    0.4 * (2.0 * std::f32::consts::PI * 220.0 * t).sin()
                        + 0.2 * (2.0 * std::f32::consts::PI * 660.0 * t).sin()
                } else {
                    0.0
                };
                samples.push(v);
            }
        }

        let regions = speech_regions(&samples, &VadConfig::with_min_silence_ms(300));
        for pair in regions.windows(2) {
            assert!(pair[0].end < pair[1].start);
        }
        for region in &regions {
            assert!(region.start < region.end);
            assert!(region.end <= samples.len());
        }
    }
}
