//! Adaptive best-subset selection for one batch of scored frames.
//!
//! The cut depends on how spread out the batch is. When the standard
//! deviation exceeds `threshold * mean` a few frames stand far above the
//! rest, so only frames more than one standard deviation above the mean
//! pass. Otherwise every above-average frame passes. The result is then
//! clamped into `[min_images, max_images]` by taking the best frames first.

use crate::error::{Result, SelectionError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionParameters {
    /// Number of consecutive frames compared against each other.
    pub batch_size: usize,
    /// Variability sensitivity: a batch is high-variability when
    /// `std_dev > threshold * mean`.
    pub threshold: f64,
    pub min_images: usize,
    pub max_images: usize,
}

impl Default for SelectionParameters {
    fn default() -> Self {
        Self {
            batch_size: 10,
            threshold: 1.5,
            min_images: 2,
            max_images: 7,
        }
    }
}

impl SelectionParameters {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SelectionError::InvalidParameters(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(SelectionError::InvalidParameters(format!(
                "threshold must be a positive number, got {}",
                self.threshold
            )));
        }
        if self.max_images < self.min_images {
            return Err(SelectionError::InvalidParameters(format!(
                "max_images ({}) must not be smaller than min_images ({})",
                self.max_images, self.min_images
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Variability {
    /// A few frames are much sharper than the rest: keep `> mean + std_dev`.
    High,
    /// Quality is evenly spread: keep `> mean`.
    Low,
}

/// Statistics over the valid scores of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub variability: Variability,
}

impl BatchStats {
    /// Population mean and standard deviation of `scores`. `None` when empty.
    pub fn compute(scores: &[f64], threshold: f64) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }

        let count = scores.len();
        let mean: f64 = scores.iter().sum::<f64>() / count as f64;
        let variance: f64 = scores
            .iter()
            .map(|&x| (x - mean).powi(2))
            .sum::<f64>()
            / count as f64;
        let std_dev = variance.sqrt();

        // All-zero batches (e.g. black frames) take the low branch.
        let variability = if mean == 0.0 && std_dev == 0.0 {
            Variability::Low
        } else if std_dev > threshold * mean {
            Variability::High
        } else {
            Variability::Low
        };

        Some(Self {
            count,
            mean,
            std_dev,
            variability,
        })
    }

    /// Scores strictly above this value pass the variability test.
    pub fn cutoff(&self) -> f64 {
        match self.variability {
            Variability::High => self.mean + self.std_dev,
            Variability::Low => self.mean,
        }
    }
}

/// Picks the best frames of one batch.
///
/// Entries with no score (or a non-finite one) are ignored entirely. The
/// returned identities are ordered by score, best first; equal scores keep
/// their input order.
pub fn select_best<T: Clone>(
    batch: &[(T, Option<f64>)],
    threshold: f64,
    min_images: usize,
    max_images: usize,
) -> Vec<T> {
    let mut valid: Vec<(&T, f64)> = batch
        .iter()
        .filter_map(|(id, score)| match score {
            Some(s) if s.is_finite() => Some((id, *s)),
            _ => None,
        })
        .collect();

    let scores: Vec<f64> = valid.iter().map(|&(_, s)| s).collect();
    let Some(stats) = BatchStats::compute(&scores, threshold) else {
        warn!(batch_len = batch.len(), "No valid scores in batch");
        return Vec::new();
    };

    debug!(
        mean = stats.mean,
        std_dev = stats.std_dev,
        threshold,
        variability = ?stats.variability,
        "Batch stats"
    );

    // Stable sort, so ties keep their original relative order.
    valid.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let cutoff = stats.cutoff();
    let kept = valid.iter().filter(|&&(_, s)| s > cutoff).count();

    // Sorted descending, so the entries above the cutoff form a prefix.
    let take = if kept < min_images {
        min_images.min(valid.len())
    } else if kept > max_images {
        max_images
    } else {
        kept
    };

    debug!(kept, selected = take, "Batch selection");

    valid
        .into_iter()
        .take(take)
        .map(|(id, _)| id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(scores: &[f64]) -> Vec<(usize, Option<f64>)> {
        scores.iter().copied().map(Some).enumerate().collect()
    }

    #[test]
    fn test_default_parameters_are_valid() {
        assert!(SelectionParameters::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_parameters() {
        let base = SelectionParameters::default();

        let zero_batch = SelectionParameters { batch_size: 0, ..base };
        assert!(zero_batch.validate().is_err());

        let inverted = SelectionParameters {
            min_images: 5,
            max_images: 2,
            ..base
        };
        assert!(matches!(
            inverted.validate(),
            Err(SelectionError::InvalidParameters(_))
        ));

        for threshold in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let bad = SelectionParameters { threshold, ..base };
            assert!(bad.validate().is_err(), "threshold {threshold} accepted");
        }
    }

    #[test]
    fn test_low_variability_keeps_above_mean() {
        let scores = [100.0, 98.0, 95.0, 90.0, 50.0, 48.0, 45.0, 40.0, 20.0, 10.0];
        let stats = BatchStats::compute(&scores, 1.5).unwrap();
        assert!((stats.mean - 59.6).abs() < 1e-9);
        assert_eq!(stats.variability, Variability::Low);

        let selected = select_best(&batch(&scores), 1.5, 2, 7);
        assert_eq!(selected, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_uniform_batch_falls_back_to_minimum() {
        let selected = select_best(&batch(&[50.0; 5]), 1.5, 2, 7);
        assert_eq!(selected, vec![0, 1]);
    }

    #[test]
    fn test_absent_scores_are_excluded() {
        let input = vec![(0, Some(10.0)), (1, None), (2, Some(30.0)), (3, Some(20.0))];
        let stats = BatchStats::compute(&[10.0, 30.0, 20.0], 1.5).unwrap();
        assert!((stats.mean - 20.0).abs() < 1e-9);

        for (min, max) in [(0, 0), (1, 1), (3, 3), (4, 4), (0, 10)] {
            let selected = select_best(&input, 1.5, min, max);
            assert!(!selected.contains(&1));
        }
        assert_eq!(select_best(&input, 1.5, 4, 4), vec![2, 3, 0]);
    }

    #[test]
    fn test_high_variability_truncates_to_maximum() {
        let scores = [100.0, 100.0, 100.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let stats = BatchStats::compute(&scores, 0.1).unwrap();
        assert_eq!(stats.variability, Variability::High);

        let selected = select_best(&batch(&scores), 0.1, 1, 2);
        assert_eq!(selected, vec![0, 1]);
    }

    #[test]
    fn test_high_variability_uses_stricter_cut() {
        // mean 175, std_dev ~369: only 1000 clears mean + std_dev
        let scores = [10.0, 1000.0, 10.0, 10.0, 10.0, 10.0];
        let selected = select_best(&batch(&scores), 0.5, 1, 7);
        assert_eq!(selected, vec![1]);

        let with_minimum = select_best(&batch(&scores), 0.5, 2, 7);
        assert_eq!(with_minimum, vec![1, 0]);
    }

    #[test]
    fn test_output_is_score_descending() {
        let scores = [5.0, 80.0, 60.0, 80.0, 1.0, 70.0];
        let selected = select_best(&batch(&scores), 1.5, 4, 4);
        assert_eq!(selected, vec![1, 3, 5, 2]);
    }

    #[test]
    fn test_minimum_clamped_to_valid_count() {
        let input = vec![(0, Some(3.0)), (1, None), (2, Some(3.0))];
        let selected = select_best(&input, 1.5, 5, 9);
        assert_eq!(selected, vec![0, 2]);
    }

    #[test]
    fn test_all_zero_scores_take_low_branch() {
        let stats = BatchStats::compute(&[0.0, 0.0, 0.0], 1.5).unwrap();
        assert_eq!(stats.variability, Variability::Low);
        assert_eq!(stats.cutoff(), 0.0);

        let selected = select_best(&batch(&[0.0, 0.0, 0.0]), 1.5, 1, 2);
        assert_eq!(selected, vec![0]);
    }

    #[test]
    fn test_empty_and_all_absent_batches() {
        let empty: Vec<(usize, Option<f64>)> = Vec::new();
        assert!(select_best(&empty, 1.5, 2, 7).is_empty());

        let absent = vec![(0, None), (1, Some(f64::NAN))];
        assert!(select_best(&absent, 1.5, 2, 7).is_empty());
    }

    #[test]
    fn test_selection_size_bounds() {
        let scores = [3.0, 9.0, 4.0, 12.0, 7.0, 7.5, 30.0, 2.0, 15.0, 8.0];
        for (min, max) in [(0, 0), (0, 3), (2, 7), (4, 4), (6, 10), (10, 10)] {
            let n = select_best(&batch(&scores), 1.5, min, max).len();
            assert!(n >= min && n <= max, "{n} outside [{min}, {max}]");
        }
    }
}
