use crate::selection::SelectionParameters;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

const APP_DIR: &str = "sharp-frame-picker";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub ffmpeg_path: Option<String>,
    pub ffprobe_path: Option<String>,
    pub selection: SelectionParameters,
    /// Frames extracted per second of video.
    pub fps: f64,
    /// Rescale extracted frames to this width, keeping the aspect ratio.
    pub width: Option<u32>,
    /// Per-frame scoring deadline; unlimited when unset.
    pub score_timeout_secs: Option<u64>,
    pub first_run: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            selection: SelectionParameters::default(),
            fps: 5.0,
            width: None,
            score_timeout_secs: None,
            first_run: true,
        }
    }
}

impl AppSettings {
    /// Get the settings file path
    pub fn settings_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join(APP_DIR).join("settings.json"))
    }

    /// Load settings from `path`, writing the defaults there on first run
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let settings = Self::default();
            settings.save_to(path)?;
            info!(path = %path.display(), "Created default settings");
            return Ok(settings);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let settings: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Mark first run as complete and persist it to `path`
    pub fn complete_first_run(&mut self, path: &Path) -> Result<()> {
        self.first_run = false;
        self.save_to(path)
    }

    /// Resolves the ffmpeg binary: `FFMPEG_PATH`, then the settings file,
    /// then well-known install locations and `PATH`.
    pub fn ffmpeg(&self) -> PathBuf {
        resolve_tool("FFMPEG_PATH", self.ffmpeg_path.as_deref(), "ffmpeg", || {
            detect_ffmpeg_paths().0
        })
    }

    /// Resolves the ffprobe binary the same way as [`ffmpeg`](Self::ffmpeg).
    pub fn ffprobe(&self) -> PathBuf {
        resolve_tool("FFPROBE_PATH", self.ffprobe_path.as_deref(), "ffprobe", || {
            detect_ffmpeg_paths().1
        })
    }
}

fn resolve_tool(
    env_var: &str,
    configured: Option<&str>,
    fallback: &str,
    detect: impl FnOnce() -> Option<PathBuf>,
) -> PathBuf {
    if let Some(path) = std::env::var_os(env_var).filter(|v| !v.is_empty()) {
        return PathBuf::from(path);
    }
    if let Some(path) = configured.filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    detect().unwrap_or_else(|| PathBuf::from(fallback))
}

/// Detects common FFmpeg installation locations
pub fn detect_ffmpeg_paths() -> (Option<PathBuf>, Option<PathBuf>) {
    let mut ffmpeg_path = None;
    let mut ffprobe_path = None;

    #[cfg(target_os = "macos")]
    let candidates: Vec<PathBuf> = vec![
        PathBuf::from("/opt/homebrew/bin"), // Apple Silicon Homebrew
        PathBuf::from("/usr/local/bin"),    // Intel Homebrew
        PathBuf::from("/opt/local/bin"),    // MacPorts
    ];

    #[cfg(target_os = "linux")]
    let candidates: Vec<PathBuf> = vec![
        PathBuf::from("/usr/bin"),
        PathBuf::from("/usr/local/bin"),
        PathBuf::from("/snap/bin"),
    ];

    #[cfg(target_os = "windows")]
    let candidates: Vec<PathBuf> = [
        Some(PathBuf::from(r"C:\Program Files\ffmpeg\bin")),
        Some(PathBuf::from(r"C:\ffmpeg\bin")),
        dirs::home_dir().map(|p| p.join(r"scoop\apps\ffmpeg\current\bin")),
    ]
    .into_iter()
    .flatten()
    .collect();

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    let candidates: Vec<PathBuf> = Vec::new();

    #[cfg(target_os = "windows")]
    let (ffmpeg_cmd, ffprobe_cmd) = ("ffmpeg.exe", "ffprobe.exe");
    #[cfg(not(target_os = "windows"))]
    let (ffmpeg_cmd, ffprobe_cmd) = ("ffmpeg", "ffprobe");

    for dir in candidates {
        let ffmpeg = dir.join(ffmpeg_cmd);
        let ffprobe = dir.join(ffprobe_cmd);

        if ffmpeg.exists() && ffprobe.exists() {
            debug!(path = %ffmpeg.display(), "Found FFmpeg");
            ffmpeg_path = Some(ffmpeg);
            ffprobe_path = Some(ffprobe);
            break;
        }
    }

    // Try system PATH as fallback
    if ffmpeg_path.is_none() {
        if Command::new(ffmpeg_cmd).arg("-version").output().is_ok() {
            debug!("Found FFmpeg in system PATH");
            ffmpeg_path = Some(PathBuf::from(ffmpeg_cmd));
        }

        if Command::new(ffprobe_cmd).arg("-version").output().is_ok() {
            debug!("Found FFprobe in system PATH");
            ffprobe_path = Some(PathBuf::from(ffprobe_cmd));
        }
    }

    (ffmpeg_path, ffprobe_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_serialization() {
        let settings = AppSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: AppSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings, parsed);
    }

    #[test]
    fn test_partial_settings_fall_back_to_defaults() {
        let parsed: AppSettings =
            serde_json::from_str(r#"{"fps": 2.0, "selection": {"batch_size": 20, "threshold": 1.0, "min_images": 1, "max_images": 5}}"#)
                .unwrap();
        assert_eq!(parsed.fps, 2.0);
        assert_eq!(parsed.selection.batch_size, 20);
        assert_eq!(parsed.width, None);
        assert!(parsed.first_run);
    }

    #[test]
    fn test_load_creates_defaults_on_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings = AppSettings::load_from(&path).unwrap();
        assert_eq!(settings, AppSettings::default());
        assert!(path.exists());

        let mut changed = settings.clone();
        changed.width = Some(720);
        changed.save_to(&path).unwrap();
        assert_eq!(AppSettings::load_from(&path).unwrap().width, Some(720));
    }

    #[test]
    fn test_configured_tool_path_wins_over_detection() {
        let path = resolve_tool(
            "SHARP_FRAME_PICKER_TEST_UNSET_VAR",
            Some("/opt/tools/ffmpeg"),
            "ffmpeg",
            || panic!("detection must not run"),
        );
        assert_eq!(path, PathBuf::from("/opt/tools/ffmpeg"));

        let fallback = resolve_tool("SHARP_FRAME_PICKER_TEST_UNSET_VAR", None, "ffmpeg", || None);
        assert_eq!(fallback, PathBuf::from("ffmpeg"));
    }
}
