use crate::analyzer::SequenceAnalyzer;
use crate::frame::{Frame, FrameReport, BEST_BADGE};
use crate::selection::SelectionParameters;
use crate::sharpness::FrameScorer;
use crate::video::{clear_frames, extract_frames, get_video_info, list_frames, VideoInfo};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{info, warn};

pub const SOURCE_IMAGES_DIR: &str = "Source Images";
pub const BEST_IMAGES_DIR: &str = "Best Images";

/// Folder layout of one capture: extracted frames go to `Source Images`,
/// the picked ones are copied to `Best Images`.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_dir(&self) -> PathBuf {
        self.root.join(SOURCE_IMAGES_DIR)
    }

    pub fn best_dir(&self) -> PathBuf {
        self.root.join(BEST_IMAGES_DIR)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOptions {
    pub fps: f64,
    pub width: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub total_frames: usize,
    pub best_frames: usize,
    pub unscoreable_frames: usize,
    pub avg_score: Option<f64>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
}

impl RunStatistics {
    pub fn from_frames(frames: &[Frame]) -> Self {
        let scores: Vec<f64> = frames.iter().filter_map(Frame::score).collect();
        let avg_score = if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        };

        Self {
            total_frames: frames.len(),
            best_frames: frames.iter().filter(|f| f.has_badge(BEST_BADGE)).count(),
            unscoreable_frames: frames.len() - scores.len(),
            avg_score,
            min_score: scores.iter().copied().reduce(f64::min),
            max_score: scores.iter().copied().reduce(f64::max),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub parameters: SelectionParameters,
    /// Picked frames, best first within each batch.
    pub best: Vec<PathBuf>,
    /// Copies written to the `Best Images` folder.
    pub exported: Vec<PathBuf>,
    pub frames: Vec<FrameReport>,
    pub statistics: RunStatistics,
}

/// Probes the video and extracts its frames into the project's source folder.
pub fn extract_project_frames(
    ffmpeg: &Path,
    ffprobe: &Path,
    video_path: &Path,
    project: &Project,
    options: &ExtractionOptions,
) -> Result<(VideoInfo, Vec<PathBuf>)> {
    let info = get_video_info(ffprobe, video_path)?;
    info!(
        resolution = %info.resolution(),
        fps = info.fps,
        duration = info.duration,
        estimated = info.estimated_frames(options.fps),
        "Extracting frames"
    );

    let frames = extract_frames(
        ffmpeg,
        video_path,
        &project.source_dir(),
        options.fps,
        options.width,
    )?;
    Ok((info, frames))
}

/// Scores `frames` and picks the best of each batch, with a per-frame
/// deadline when `timeout` is set.
///
/// Without a deadline the rayon scoring runs under `block_in_place` on a
/// multi-threaded runtime so other tasks keep their worker threads.
pub async fn analyze_frames<S: FrameScorer + 'static>(
    analyzer: &SequenceAnalyzer<S>,
    frames: &[Frame],
    params: &SelectionParameters,
    timeout: Option<Duration>,
) -> Result<Vec<PathBuf>> {
    let best = match timeout {
        Some(timeout) => analyzer.analyze_with_timeout(frames, params, timeout).await?,
        None if on_multi_thread_runtime() => {
            tokio::task::block_in_place(|| analyzer.analyze(frames, params))?
        }
        None => analyzer.analyze(frames, params)?,
    };
    Ok(best)
}

fn on_multi_thread_runtime() -> bool {
    Handle::try_current()
        .map(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread)
        .unwrap_or(false)
}

/// Adds the `Best` badge to every frame whose path was picked.
pub fn apply_badges(frames: &mut [Frame], best: &[PathBuf]) {
    let best: HashSet<&Path> = best.iter().map(PathBuf::as_path).collect();
    for frame in frames.iter_mut() {
        if best.contains(frame.path()) {
            frame.add_badge(BEST_BADGE);
        }
    }
}

/// Copies the picked frames into `best_dir`, keeping their file names.
/// Frames left there by an earlier selection are removed first.
pub fn export_best(best: &[PathBuf], best_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(best_dir)
        .with_context(|| format!("Failed to create {}", best_dir.display()))?;
    clear_frames(best_dir)?;

    let mut exported = Vec::with_capacity(best.len());
    for src in best {
        let name = src
            .file_name()
            .with_context(|| format!("Frame path has no file name: {}", src.display()))?;
        let dst = best_dir.join(name);
        fs::copy(src, &dst)
            .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
        exported.push(dst);
    }

    info!(count = exported.len(), dir = %best_dir.display(), "Copied best frames");
    Ok(exported)
}

/// Picks the best frames of a project's source folder and copies them into
/// its best folder.
pub async fn select_project_frames<S: FrameScorer + 'static>(
    analyzer: &SequenceAnalyzer<S>,
    project: &Project,
    params: &SelectionParameters,
    timeout: Option<Duration>,
) -> Result<AnalysisResult> {
    params.validate()?;

    let source_dir = project.source_dir();
    if !source_dir.is_dir() {
        bail!(
            "No extracted frames at {}. Please extract frames first.",
            source_dir.display()
        );
    }

    let mut frames: Vec<Frame> = list_frames(&source_dir)?.into_iter().map(Frame::new).collect();
    if frames.is_empty() {
        warn!(dir = %source_dir.display(), "No frames to analyze");
    }

    info!(frames = frames.len(), ?params, "Analyzing best frames");
    let best = analyze_frames(analyzer, &frames, params, timeout).await?;
    let exported = export_best(&best, &project.best_dir())?;
    apply_badges(&mut frames, &best);

    let statistics = RunStatistics::from_frames(&frames);
    info!(
        total = statistics.total_frames,
        best = statistics.best_frames,
        unscoreable = statistics.unscoreable_frames,
        "Selection complete"
    );

    Ok(AnalysisResult {
        parameters: *params,
        best,
        exported,
        frames: frames.iter().map(Frame::report).collect(),
        statistics,
    })
}

pub fn write_report(path: &Path, result: &AnalysisResult) -> Result<()> {
    let contents = serde_json::to_string_pretty(result)?;
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
