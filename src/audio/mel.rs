//! Slaney-scale mel filter bank, laid out the way
//! `candle_transformers::models::whisper::audio::pcm_to_mel` expects it:
//! a flat row-major `[n_mels, n_fft / 2 + 1]` buffer.

/// FFT size of the Whisper front end (25 ms at 16 kHz).
pub const N_FFT: usize = 400;

fn hz_to_mel(hz: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f32.ln() / 27.0;

    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

fn mel_to_hz(mel: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f32.ln() / 27.0;

    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        f_sp * mel
    }
}

/// Build `n_mels` area-normalized triangular filters spanning 0 Hz to Nyquist.
pub fn mel_filters(n_mels: usize, sample_rate: u32) -> Vec<f32> {
    let n_freqs = N_FFT / 2 + 1;
    let sample_rate = sample_rate as f32;

    let fft_freqs: Vec<f32> = (0..n_freqs)
        .map(|i| i as f32 * sample_rate / N_FFT as f32)
        .collect();

    let mel_max = hz_to_mel(sample_rate / 2.0);
    let hz_points: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(i as f32 * mel_max / (n_mels + 1) as f32))
        .collect();

    let mut filters = vec![0.0f32; n_mels * n_freqs];
    for m in 0..n_mels {
        let (left, center, right) = (hz_points[m], hz_points[m + 1], hz_points[m + 2]);
        let enorm = 2.0 / (right - left);

        for (k, &freq) in fft_freqs.iter().enumerate() {
            let rising = (freq - left) / (center - left);
            let falling = (right - freq) / (right - center);
            let weight = rising.min(falling).max(0.0);
            filters[m * n_freqs + k] = weight * enorm;
        }
    }

    filters
}
