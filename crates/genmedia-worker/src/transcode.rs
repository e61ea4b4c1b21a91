//! Audio probing and transcoding via ffmpeg.
//!
//! Both tools are optional at runtime. When they are missing or fail, the
//! pipeline keeps the canonical MP3 and carries on without duration
//! metadata.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, warn};

use genmedia_models::AudioFormat;

use crate::error::{WorkerError, WorkerResult};

fn find_tool(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Probe the duration of an audio file in seconds. `None` when ffprobe is
/// unavailable or the probe fails.
pub async fn probe_duration_seconds(path: &Path) -> Option<f64> {
    let ffprobe = find_tool("ffprobe")?;

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        warn!("ffprobe failed on {}", path.display());
        return None;
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    let duration = raw.trim().parse::<f64>().ok()?;
    debug!("Probed {}: {:.2}s", path.display(), duration);
    Some(duration)
}

/// Transcode `input` to `format`, writing next to the input file.
///
/// Returns the output path, or `None` when ffmpeg is unavailable or the
/// conversion fails; callers fall back to the canonical file.
pub async fn transcode_audio(input: &Path, format: AudioFormat) -> Option<PathBuf> {
    if format.is_canonical() {
        return Some(input.to_path_buf());
    }

    let ffmpeg = match find_tool("ffmpeg") {
        Some(p) => p,
        None => {
            warn!("ffmpeg not found, keeping canonical audio format");
            return None;
        }
    };

    let output_path = input.with_extension(format.extension());
    let result = Command::new(ffmpeg)
        .args(["-y", "-i"])
        .arg(input)
        .arg(&output_path)
        .output()
        .await;

    match result {
        Ok(out) if out.status.success() => {
            debug!("Transcoded {} to {}", input.display(), output_path.display());
            Some(output_path)
        }
        Ok(out) => {
            warn!(
                "ffmpeg transcode failed: {}",
                String::from_utf8_lossy(&out.stderr)
            );
            None
        }
        Err(e) => {
            warn!("ffmpeg spawn failed: {}", e);
            None
        }
    }
}

/// Write bytes to the job's work directory.
pub async fn write_work_file(
    work_dir: &str,
    job_id: &str,
    filename: &str,
    bytes: &[u8],
) -> WorkerResult<PathBuf> {
    let dir = Path::new(work_dir).join(job_id);
    tokio::fs::create_dir_all(&dir).await.map_err(WorkerError::Io)?;
    let path = dir.join(filename);
    tokio::fs::write(&path, bytes).await.map_err(WorkerError::Io)?;
    Ok(path)
}

/// Remove the job's work directory.
pub async fn cleanup_work_dir(work_dir: &str, job_id: &str) {
    let dir = Path::new(work_dir).join(job_id);
    if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to clean work dir {}: {}", dir.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn canonical_format_skips_transcode() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("a.mp3");
        tokio::fs::write(&input, b"fake").await.unwrap();

        let out = transcode_audio(&input, AudioFormat::Mp3).await;
        assert_eq!(out, Some(input));
    }

    #[tokio::test]
    async fn work_files_round_trip() {
        let dir = tempdir().unwrap();
        let work = dir.path().to_str().unwrap();

        let path = write_work_file(work, "job-1", "audio.mp3", b"bytes")
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"bytes");

        cleanup_work_dir(work, "job-1").await;
        assert!(!path.exists());
    }
}
