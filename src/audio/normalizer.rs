//! # Audio Normalization
//!
//! Converts whatever the client uploaded (m4a, webm, mp3, ogg, wav...) into
//! the canonical 16 kHz mono 16-bit PCM WAV the recognizer consumes.
//!
//! ## How it works:
//! 1. The upload is written into a fresh temporary directory
//! 2. `ffmpeg` transcodes it into a WAV file in the same directory
//! 3. The WAV is read back into memory and checked for a plausible size
//! 4. The directory is removed when it goes out of scope
//!
//! ## Cleanup guarantees:
//! The temporary directory is owned by a [`tempfile::TempDir`] guard and the
//! child process is spawned with `kill_on_drop`, so success, failure, timeout
//! and a dropped request future all leave nothing behind.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;

/// Errors raised while normalizing an upload.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// ffmpeg ran but did not produce usable audio
    #[error("{0}")]
    Conversion(String),

    /// ffmpeg did not finish within the deadline
    #[error("audio conversion timed out after {0:?}")]
    Timeout(Duration),

    /// Temporary files or the ffmpeg process could not be set up
    #[error("audio conversion I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability: turn arbitrary audio bytes into canonical WAV bytes.
#[async_trait]
pub trait AudioNormalizer: Send + Sync {
    async fn normalize(&self, raw: Bytes) -> Result<Bytes, NormalizeError>;
}

/// [`AudioNormalizer`] backed by an external `ffmpeg` process.
#[derive(Debug, Clone)]
pub struct FfmpegNormalizer {
    ffmpeg_path: PathBuf,
    timeout: Duration,
    min_output_bytes: usize,
    temp_root: Option<PathBuf>,
}

impl FfmpegNormalizer {
    pub fn new(
        ffmpeg_path: impl Into<PathBuf>,
        timeout: Duration,
        min_output_bytes: usize,
    ) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            timeout,
            min_output_bytes,
            temp_root: None,
        }
    }

    /// Create per-request directories under `root` instead of the system
    /// temp directory.
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    fn temp_dir(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("normalize-");
        match &self.temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-ac", "1", "-ar", "16000", "-acodec", "pcm_s16le", "-f", "wav"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl AudioNormalizer for FfmpegNormalizer {
    async fn normalize(&self, raw: Bytes) -> Result<Bytes, NormalizeError> {
        let started = Instant::now();
        let workdir = self.temp_dir()?;
        let input_path = workdir.path().join("input");
        let output_path = workdir.path().join("output.wav");

        tokio::fs::write(&input_path, &raw).await?;

        let child = self.command(&input_path, &output_path).spawn()?;
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "ffmpeg conversion timed out");
                return Err(NormalizeError::Timeout(self.timeout));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::warn!(status = %output.status, stderr = %stderr, "ffmpeg conversion failed");
            return Err(NormalizeError::Conversion(stderr));
        }

        let wav = match tokio::fs::read(&output_path).await {
            Ok(wav) => wav,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(NormalizeError::Conversion(
                    "ffmpeg did not create output WAV file".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        if wav.len() < self.min_output_bytes {
            return Err(NormalizeError::Conversion(format!(
                "converted WAV file is too small ({} bytes)",
                wav.len()
            )));
        }

        tracing::debug!(
            input_bytes = raw.len(),
            output_bytes = wav.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Audio normalized"
        );

        Ok(Bytes::from(wav))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    // Writing an executable while another test thread forks can fail with
    // ETXTBSY, so script creation and execution are serialized.
    static SPAWN_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

    fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\nfor out; do :; done\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn leftover_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    fn upload() -> Bytes {
        Bytes::from(vec![7u8; 4096])
    }

    #[tokio::test]
    async fn test_successful_conversion_cleans_up() {
        let _guard = SPAWN_LOCK.lock().await;
        let bin = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(bin.path(), "head -c 2048 /dev/zero > \"$out\"");

        let normalizer = FfmpegNormalizer::new(ffmpeg, Duration::from_secs(5), 1000)
            .with_temp_root(scratch.path());
        let wav = normalizer.normalize(upload()).await.unwrap();

        assert_eq!(wav.len(), 2048);
        assert_eq!(leftover_entries(scratch.path()), 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr() {
        let _guard = SPAWN_LOCK.lock().await;
        let bin = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(
            bin.path(),
            "echo 'Invalid data found when processing input' >&2\nexit 1",
        );

        let normalizer = FfmpegNormalizer::new(ffmpeg, Duration::from_secs(5), 1000)
            .with_temp_root(scratch.path());
        let err = normalizer.normalize(upload()).await.unwrap_err();

        match err {
            NormalizeError::Conversion(msg) => assert!(msg.contains("Invalid data found")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(leftover_entries(scratch.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_output_file() {
        let _guard = SPAWN_LOCK.lock().await;
        let bin = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(bin.path(), "exit 0");

        let normalizer = FfmpegNormalizer::new(ffmpeg, Duration::from_secs(5), 1000)
            .with_temp_root(scratch.path());
        let err = normalizer.normalize(upload()).await.unwrap_err();

        assert!(matches!(
            err,
            NormalizeError::Conversion(ref msg) if msg.contains("did not create")
        ));
        assert_eq!(leftover_entries(scratch.path()), 0);
    }

    #[tokio::test]
    async fn test_too_small_output() {
        let _guard = SPAWN_LOCK.lock().await;
        let bin = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(bin.path(), "printf 'RIFF' > \"$out\"");

        let normalizer = FfmpegNormalizer::new(ffmpeg, Duration::from_secs(5), 1000)
            .with_temp_root(scratch.path());
        let err = normalizer.normalize(upload()).await.unwrap_err();

        assert!(matches!(err, NormalizeError::Conversion(ref msg) if msg.contains("too small")));
        assert_eq!(leftover_entries(scratch.path()), 0);
    }

    #[tokio::test]
    async fn test_timeout_kills_and_cleans_up() {
        let _guard = SPAWN_LOCK.lock().await;
        let bin = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(bin.path(), "sleep 5");

        let normalizer = FfmpegNormalizer::new(ffmpeg, Duration::from_millis(200), 1000)
            .with_temp_root(scratch.path());
        let started = Instant::now();
        let err = normalizer.normalize(upload()).await.unwrap_err();

        assert!(matches!(err, NormalizeError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(leftover_entries(scratch.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let scratch = tempfile::tempdir().unwrap();
        let normalizer = FfmpegNormalizer::new(
            scratch.path().join("no-such-ffmpeg"),
            Duration::from_secs(1),
            1000,
        )
        .with_temp_root(scratch.path());

        let err = normalizer.normalize(upload()).await.unwrap_err();
        assert!(matches!(err, NormalizeError::Io(_)));
        assert_eq!(leftover_entries(scratch.path()), 0);
    }
}
