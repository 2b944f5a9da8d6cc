pub mod analyzer;
pub mod cli;
pub mod commands;
pub mod error;
pub mod frame;
pub mod selection;
pub mod settings;
pub mod sharpness;
pub mod video;

pub use analyzer::{select_scored, SequenceAnalyzer};
pub use cli::{run, Cli};
pub use error::{Result, SelectionError};
pub use frame::{Frame, FrameReport, ScoreState, BEST_BADGE};
pub use selection::{select_best, BatchStats, SelectionParameters, Variability};
pub use sharpness::{calculate_sharpness, compute_score, FrameScorer, LaplacianScorer};
