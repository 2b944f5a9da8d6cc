use crate::error::Result;
use crate::frame::Frame;
use crate::selection::{select_best, SelectionParameters};
use crate::sharpness::{FrameScorer, LaplacianScorer};
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Scores a frame sequence batch by batch and returns the best frames.
///
/// Scores are cached on each [`Frame`], so analysing the same frames again
/// (for instance with different parameters) never decodes an image twice.
pub struct SequenceAnalyzer<S = LaplacianScorer> {
    scorer: Arc<S>,
}

impl SequenceAnalyzer<LaplacianScorer> {
    pub fn new() -> Self {
        Self::with_scorer(LaplacianScorer)
    }
}

impl Default for SequenceAnalyzer<LaplacianScorer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: FrameScorer + 'static> SequenceAnalyzer<S> {
    pub fn with_scorer(scorer: S) -> Self {
        Self {
            scorer: Arc::new(scorer),
        }
    }

    /// Selects the best frames of every batch.
    ///
    /// Within a batch the paths are ordered best first; batches follow each
    /// other in sequence order. Parameters are validated before any frame is
    /// scored.
    pub fn analyze(&self, frames: &[Frame], params: &SelectionParameters) -> Result<Vec<PathBuf>> {
        params.validate()?;
        self.score_frames(frames);
        Ok(select_frames(frames, params))
    }

    /// Same as [`analyze`](Self::analyze), but gives up on any frame whose
    /// scoring takes longer than `timeout` and records it as unscoreable.
    pub async fn analyze_with_timeout(
        &self,
        frames: &[Frame],
        params: &SelectionParameters,
        timeout: Duration,
    ) -> Result<Vec<PathBuf>> {
        params.validate()?;
        self.score_frames_with_timeout(frames, timeout).await;
        Ok(select_frames(frames, params))
    }

    /// Scores every frame that has no cached score yet, in parallel on the
    /// rayon pool. Returns how many frames were scored.
    pub fn score_frames(&self, frames: &[Frame]) -> usize {
        let scorer = self.scorer.as_ref();
        frames
            .par_iter()
            .filter(|frame| !frame.is_scored())
            .map(|frame| {
                frame.score_or_compute(|path| scorer.score(path));
            })
            .count()
    }

    /// Scores every unscored frame on the blocking pool, at most
    /// `num_cpus::get()` at a time, with a per-frame deadline.
    ///
    /// A job that misses its deadline keeps its blocking thread and its
    /// permit until it finishes; its result is dropped.
    pub async fn score_frames_with_timeout(&self, frames: &[Frame], timeout: Duration) -> usize {
        let permits = Arc::new(Semaphore::new(num_cpus::get().max(1)));
        let mut tasks = JoinSet::new();
        let mut pending = Vec::new();

        for (idx, frame) in frames.iter().enumerate() {
            if frame.is_scored() {
                continue;
            }
            pending.push(idx);

            let scorer = Arc::clone(&self.scorer);
            let permits = Arc::clone(&permits);
            let path = frame.path().to_path_buf();

            tasks.spawn(async move {
                let permit = permits.acquire_owned().await.ok();
                let job_path = path.clone();
                let job = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    scorer.score(&job_path)
                });

                let score = match tokio::time::timeout(timeout, job).await {
                    Ok(Ok(score)) => score,
                    Ok(Err(e)) => {
                        warn!(path = %path.display(), error = %e, "Scoring task failed");
                        None
                    }
                    Err(_) => {
                        warn!(path = %path.display(), ?timeout, "Scoring timed out");
                        None
                    }
                };
                (idx, score)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, score)) => {
                    frames[idx].record_score(score);
                }
                Err(e) => warn!(error = %e, "Scoring task aborted"),
            }
        }

        // Anything a crashed task left behind counts as unscoreable.
        for &idx in &pending {
            frames[idx].record_score(None);
        }

        pending.len()
    }
}

/// Runs the batch selection over frames whose scores are already resolved.
fn select_frames(frames: &[Frame], params: &SelectionParameters) -> Vec<PathBuf> {
    let scored: Vec<(PathBuf, Option<f64>)> = frames
        .iter()
        .map(|frame| (frame.path().to_path_buf(), frame.score()))
        .collect();

    let unscoreable = scored.iter().filter(|(_, score)| score.is_none()).count();
    if unscoreable > 0 {
        warn!(unscoreable, total = frames.len(), "Some frames could not be scored");
    }

    select_batches(&scored, params)
}

/// Selects the best entries of already-scored frames without decoding any
/// image. Identities come back best first within each batch, batches in
/// sequence order.
pub fn select_scored<T: Clone>(
    scored: &[(T, Option<f64>)],
    params: &SelectionParameters,
) -> Result<Vec<T>> {
    params.validate()?;
    Ok(select_batches(scored, params))
}

fn select_batches<T: Clone>(scored: &[(T, Option<f64>)], params: &SelectionParameters) -> Vec<T> {
    let mut best = Vec::new();

    for (batch_idx, batch) in scored.chunks(params.batch_size).enumerate() {
        let selected = select_best(batch, params.threshold, params.min_images, params.max_images);
        debug!(batch = batch_idx, size = batch.len(), selected = selected.len(), "Processed batch");
        best.extend(selected);
    }

    info!(total = scored.len(), selected = best.len(), "Total best frames");
    best
}
