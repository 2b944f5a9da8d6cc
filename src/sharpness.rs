//! # Frame Sharpness Scoring
//!
//! Scores a still frame by the variance of its Laplacian response, the
//! classic blur detector used to pick frames for photogrammetry
//! (RealityCapture, COLMAP, Gaussian Splatting).
//!
//! ## Laplacian Variance
//! - The 4-neighbour Laplacian highlights rapid intensity changes (edges)
//! - A sharp frame has strong, numerous edges and therefore a wide spread of
//!   responses; motion blur and defocus flatten that spread
//! - Scores are relative: they only mean something when compared against
//!   frames of the same video at the same resolution
//!
//! ## Border Handling
//! Neighbours that fall outside the image are replicated from the nearest
//! edge pixel, so every pixel of the frame contributes exactly one response.
//! A 1x1 frame therefore scores 0.0.
//!
//! ## Unscoreable Frames
//! A frame that cannot be opened or decoded, or that has a zero dimension,
//! yields `None`. Callers must keep that distinct from a low score: it is
//! excluded from batch statistics instead of being treated as the worst frame.

use image::{DynamicImage, GrayImage};
use std::path::Path;
use tracing::{debug, warn};

/// Produces the quality score of one frame on disk.
///
/// Implementations must be pure with respect to the file contents: scoring
/// the same file twice yields the same value.
pub trait FrameScorer: Send + Sync {
    fn score(&self, path: &Path) -> Option<f64>;
}

/// Default scorer: decodes the file with the `image` crate and returns its
/// Laplacian variance.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaplacianScorer;

impl FrameScorer for LaplacianScorer {
    fn score(&self, path: &Path) -> Option<f64> {
        compute_score(path)
    }
}

/// Opens `path` and scores it. Returns `None` when the file is unreadable,
/// not a decodable image, or has a zero dimension.
pub fn compute_score(path: &Path) -> Option<f64> {
    let img = match image::open(path) {
        Ok(img) => img,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read frame");
            return None;
        }
    };

    let score = calculate_sharpness(&img);
    match score {
        Some(value) => debug!(path = %path.display(), score = value, "Calculated sharpness"),
        None => warn!(path = %path.display(), "Frame has degenerate dimensions"),
    }
    score
}

/// Calculates the sharpness of a decoded image using the Laplacian variance
/// method on its luminance channel. Higher values indicate sharper images.
pub fn calculate_sharpness(img: &DynamicImage) -> Option<f64> {
    let gray_img = img.to_luma8();
    laplacian_variance(&gray_img)
}

/// Computes the population variance of the Laplacian of a grayscale image,
/// replicating edge pixels at the borders.
fn laplacian_variance(img: &GrayImage) -> Option<f64> {
    let (width, height) = img.dimensions();

    if width == 0 || height == 0 {
        return None;
    }

    let mut laplacian_values = Vec::with_capacity(width as usize * height as usize);

    // Apply Laplacian kernel (using 3x3 kernel)
    // [ 0  1  0 ]
    // [ 1 -4  1 ]
    // [ 0  1  0 ]
    for y in 0..height {
        let up = y.saturating_sub(1);
        let down = (y + 1).min(height - 1);
        for x in 0..width {
            let left = x.saturating_sub(1);
            let right = (x + 1).min(width - 1);

            let center = img.get_pixel(x, y)[0] as i32;
            let top = img.get_pixel(x, up)[0] as i32;
            let bottom = img.get_pixel(x, down)[0] as i32;
            let left = img.get_pixel(left, y)[0] as i32;
            let right = img.get_pixel(right, y)[0] as i32;

            laplacian_values.push(top + bottom + left + right - 4 * center);
        }
    }

    let count = laplacian_values.len() as f64;
    let mean: f64 = laplacian_values.iter().map(|&v| v as f64).sum::<f64>() / count;
    let variance: f64 = laplacian_values
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / count;

    Some(variance)
}
