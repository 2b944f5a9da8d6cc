use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Extensions of the still images the extractor writes or the picker accepts.
const FRAME_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub duration: f64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub total_frames: u32,
}

impl VideoInfo {
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Number of frames an extraction at `fps` frames per second will write.
    pub fn estimated_frames(&self, fps: f64) -> usize {
        (self.duration * fps).floor().max(0.0) as usize
    }
}

/// Extracts video metadata using ffprobe
pub fn get_video_info(ffprobe: &Path, video_path: &Path) -> Result<VideoInfo> {
    let output = Command::new(ffprobe)
        .args([
            "-v", "error",
            "-select_streams", "v:0",
            "-show_entries", "stream=width,height,r_frame_rate,duration,nb_frames:format=duration",
            "-of", "json",
        ])
        .arg(video_path)
        .output()
        .context("Failed to execute ffprobe. Make sure FFmpeg is installed.")?;

    if !output.status.success() {
        let error = String::from_utf8_lossy(&output.stderr);
        bail!("ffprobe failed: {}", error);
    }

    let json_str = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&json_str)
}

fn parse_probe_output(json_str: &str) -> Result<VideoInfo> {
    let json: serde_json::Value =
        serde_json::from_str(json_str).context("Failed to parse ffprobe output")?;

    let stream = &json["streams"][0];

    let width = stream["width"].as_u64().context("Missing width")? as u32;
    let height = stream["height"].as_u64().context("Missing height")? as u32;

    let fps_str = stream["r_frame_rate"].as_str().context("Missing frame rate")?;
    let fps = parse_frame_rate(fps_str)?;

    // Get duration (try from stream first, then format)
    let duration = stream["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| {
            json["format"]["duration"]
                .as_str()
                .and_then(|s| s.parse::<f64>().ok())
        })
        .unwrap_or(0.0);

    let total_frames = stream["nb_frames"]
        .as_str()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or((duration * fps) as u32);

    Ok(VideoInfo {
        duration,
        fps,
        width,
        height,
        total_frames,
    })
}

/// Parses an ffprobe frame rate such as "30/1" or "30000/1001".
fn parse_frame_rate(fps_str: &str) -> Result<f64> {
    let fps = match fps_str.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().context("Invalid frame rate numerator")?;
            let den: f64 = den.trim().parse().context("Invalid frame rate denominator")?;
            if den == 0.0 {
                bail!("Invalid frame rate: {}", fps_str);
            }
            num / den
        }
        None => fps_str.trim().parse::<f64>().context("Invalid frame rate")?,
    };
    Ok(fps)
}

/// Builds the `-vf` filter that samples `fps` frames per second and
/// optionally rescales to `width`, keeping the aspect ratio.
fn frame_filter(fps: f64, width: Option<u32>) -> String {
    match width {
        Some(width) => format!("fps={},scale={}:-1", fps, width),
        None => format!("fps={}", fps),
    }
}

/// Rasterizes `video_path` into `output_dir/frame_%06d.jpg` at `fps` frames
/// per second and returns the written frames in temporal order.
pub fn extract_frames(
    ffmpeg: &Path,
    video_path: &Path,
    output_dir: &Path,
    fps: f64,
    width: Option<u32>,
) -> Result<Vec<PathBuf>> {
    if !(fps.is_finite() && fps > 0.0) {
        bail!("Extraction fps must be positive, got {}", fps);
    }

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let stale = clear_frames(output_dir)?;
    if stale > 0 {
        debug!(stale, dir = %output_dir.display(), "Removed frames of an earlier extraction");
    }

    let filter = frame_filter(fps, width);
    let pattern = output_dir.join("frame_%06d.jpg");

    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
        .arg(video_path)
        .args(["-vf", filter.as_str()])
        .args(["-q:v", "2"]) // High quality
        .arg(&pattern);

    debug!(?cmd, "FFmpeg command");

    let output = cmd
        .output()
        .context("Failed to execute ffmpeg. Make sure FFmpeg is installed.")?;

    if !output.status.success() {
        let error = String::from_utf8_lossy(&output.stderr);
        bail!("ffmpeg failed: {}", error);
    }

    let frames = list_frames(output_dir)?;
    info!(count = frames.len(), dir = %output_dir.display(), "Extracted frames");
    Ok(frames)
}

/// Lists the extracted frames of `dir` (`frame_*` still images), sorted by
/// file name, which is their temporal order.
pub fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;

    let mut frames = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && is_frame_file(&path) {
            frames.push(path);
        }
    }

    frames.sort();
    Ok(frames)
}

/// Deletes the `frame_*` still images of `dir`, leaving any other file.
/// Returns how many were removed.
pub fn clear_frames(dir: &Path) -> Result<usize> {
    let frames = list_frames(dir)?;
    for frame in &frames {
        fs::remove_file(frame)
            .with_context(|| format!("Failed to remove {}", frame.display()))?;
    }
    Ok(frames.len())
}

fn is_frame_file(path: &Path) -> bool {
    let named_frame = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("frame_"));
    let still_image = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
    named_frame && still_image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rate_parsing() {
        assert_eq!(parse_frame_rate("30/1").unwrap(), 30.0);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25").unwrap(), 25.0);
        assert!(parse_frame_rate("30/0").is_err());
        assert!(parse_frame_rate("abc").is_err());
    }

    #[test]
    fn test_probe_output_parsing() {
        let json = r#"{
            "streams": [{"width": 3840, "height": 2160, "r_frame_rate": "24/1", "nb_frames": "480"}],
            "format": {"duration": "20.0"}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.resolution(), "3840x2160");
        assert_eq!(info.fps, 24.0);
        assert_eq!(info.duration, 20.0);
        assert_eq!(info.total_frames, 480);
        assert_eq!(info.estimated_frames(5.0), 100);
    }

    #[test]
    fn test_probe_output_without_frame_count() {
        let json = r#"{"streams": [{"width": 1280, "height": 720, "r_frame_rate": "30/1", "duration": "2.5"}]}"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.total_frames, 75);
    }

    #[test]
    fn test_probe_output_missing_stream() {
        assert!(parse_probe_output(r#"{"streams": []}"#).is_err());
    }

    #[test]
    fn test_frame_filter() {
        assert_eq!(frame_filter(5.0, None), "fps=5");
        assert_eq!(frame_filter(2.5, Some(720)), "fps=2.5,scale=720:-1");
    }

    #[test]
    fn test_list_frames_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "frame_000010.jpg",
            "frame_000002.jpg",
            "frame_000001.PNG",
            "notes.txt",
            "frame_000003.txt",
            "cover.jpg",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("frame_000004.jpg")).unwrap();

        let frames = list_frames(dir.path()).unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["frame_000001.PNG", "frame_000002.jpg", "frame_000010.jpg"]
        );
    }

    #[test]
    fn test_clear_frames_keeps_other_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["frame_000001.jpg", "frame_000002.png", "notes.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        assert_eq!(clear_frames(dir.path()).unwrap(), 2);
        assert!(list_frames(dir.path()).unwrap().is_empty());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_extract_discards_frames_of_earlier_run() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("frame_000099.jpg");
        fs::write(&stale, b"old").unwrap();

        let result = extract_frames(
            Path::new("/nonexistent/ffmpeg"),
            Path::new("missing.mp4"),
            dir.path(),
            5.0,
            None,
        );
        assert!(result.is_err());
        assert!(!stale.exists());
    }

    #[test]
    fn test_extract_rejects_bad_fps() {
        let dir = tempfile::tempdir().unwrap();
        let result = extract_frames(
            Path::new("ffmpeg"),
            Path::new("missing.mp4"),
            dir.path(),
            0.0,
            None,
        );
        assert!(result.is_err());
    }
}
