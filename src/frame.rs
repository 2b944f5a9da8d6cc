use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Badge attached to frames that made it into the best subset.
pub const BEST_BADGE: &str = "Best";

/// Cached sharpness of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreState {
    /// Not scored yet.
    Unknown,
    /// Scored, but the image could not be decoded in time.
    Absent,
    Value(f64),
}

/// One extracted frame of the video, identified by its path.
///
/// The score is a write-once cell: the first successful write wins and later
/// writes are ignored, so a frame is never rescored.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    path: PathBuf,
    score: OnceLock<Option<f64>>,
    badges: Vec<String>,
}

impl Frame {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            score: OnceLock::new(),
            badges: Vec::new(),
        }
    }

    /// Builds a frame whose score is already known, e.g. from a previous run.
    pub fn with_score(path: impl Into<PathBuf>, score: Option<f64>) -> Self {
        let frame = Self::new(path);
        frame.record_score(score);
        frame
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn score_state(&self) -> ScoreState {
        match self.score.get() {
            None => ScoreState::Unknown,
            Some(None) => ScoreState::Absent,
            Some(Some(value)) => ScoreState::Value(*value),
        }
    }

    /// The cached score, `None` if unknown or absent.
    pub fn score(&self) -> Option<f64> {
        self.score.get().copied().flatten()
    }

    pub fn is_scored(&self) -> bool {
        self.score.get().is_some()
    }

    /// Stores the score if none was recorded yet. Returns `false` when the
    /// frame already had one.
    pub fn record_score(&self, score: Option<f64>) -> bool {
        self.score.set(score).is_ok()
    }

    /// Returns the cached score, computing it with `compute` on first use.
    pub fn score_or_compute(&self, compute: impl FnOnce(&Path) -> Option<f64>) -> Option<f64> {
        *self.score.get_or_init(|| compute(&self.path))
    }

    pub fn badges(&self) -> &[String] {
        &self.badges
    }

    pub fn has_badge(&self, badge: &str) -> bool {
        self.badges.iter().any(|b| b == badge)
    }

    pub fn add_badge(&mut self, badge: impl Into<String>) {
        let badge = badge.into();
        if !self.has_badge(&badge) {
            self.badges.push(badge);
        }
    }

    pub fn report(&self) -> FrameReport {
        FrameReport {
            path: self.path.clone(),
            score: self.score(),
            badges: self.badges.clone(),
        }
    }
}

/// Serializable snapshot of a frame for the JSON report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub path: PathBuf,
    pub score: Option<f64>,
    pub badges: Vec<String>,
}
