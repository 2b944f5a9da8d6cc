use crate::analyzer::SequenceAnalyzer;
use crate::commands::{
    extract_project_frames, select_project_frames, write_report, AnalysisResult,
    ExtractionOptions, Project,
};
use crate::selection::SelectionParameters;
use crate::settings::AppSettings;
use crate::video::get_video_info;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "sharp-frame-picker",
    version,
    about = "Extract video frames and keep the sharpest ones of each batch"
)]
pub struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print resolution, frame rate and duration of a video
    Info { video: PathBuf },

    /// Extract frames into <project>/Source Images
    Extract {
        video: PathBuf,
        #[arg(long)]
        project: PathBuf,
        #[command(flatten)]
        extraction: ExtractionArgs,
    },

    /// Pick the best frames of <project>/Source Images into <project>/Best Images
    Select {
        #[arg(long)]
        project: PathBuf,
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Extract, then select
    Run {
        video: PathBuf,
        #[arg(long)]
        project: PathBuf,
        #[command(flatten)]
        extraction: ExtractionArgs,
        #[command(flatten)]
        selection: SelectionArgs,
    },
}

#[derive(Args, Debug, Default)]
pub struct ExtractionArgs {
    /// Frames extracted per second of video
    #[arg(long)]
    pub fps: Option<f64>,

    /// Rescale frames to this width, keeping the aspect ratio
    #[arg(long)]
    pub width: Option<u32>,
}

impl ExtractionArgs {
    pub fn options(&self, settings: &AppSettings) -> ExtractionOptions {
        ExtractionOptions {
            fps: self.fps.unwrap_or(settings.fps),
            width: self.width.or(settings.width),
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct SelectionArgs {
    /// Consecutive frames compared against each other
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Variability sensitivity of the selection
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Frames kept per batch at least
    #[arg(long)]
    pub min_images: Option<usize>,

    /// Frames kept per batch at most
    #[arg(long)]
    pub max_images: Option<usize>,

    /// Give up on a frame whose scoring takes longer than this
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Write a JSON report of every frame to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl SelectionArgs {
    pub fn parameters(&self, settings: &AppSettings) -> SelectionParameters {
        let defaults = settings.selection;
        SelectionParameters {
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            threshold: self.threshold.unwrap_or(defaults.threshold),
            min_images: self.min_images.unwrap_or(defaults.min_images),
            max_images: self.max_images.unwrap_or(defaults.max_images),
        }
    }

    pub fn timeout(&self, settings: &AppSettings) -> Option<Duration> {
        self.timeout_secs
            .or(settings.score_timeout_secs)
            .map(Duration::from_secs)
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let settings_path = match cli.settings {
        Some(path) => path,
        None => AppSettings::settings_path()?,
    };
    let mut settings = AppSettings::load_from(&settings_path)?;
    if settings.first_run {
        info!(path = %settings_path.display(), "Using default settings");
        settings.complete_first_run(&settings_path)?;
    }

    match cli.command {
        Command::Info { video } => {
            let info = get_video_info(&settings.ffprobe(), &video)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            println!(
                "Estimated frames at {} fps: {}",
                settings.fps,
                info.estimated_frames(settings.fps)
            );
        }
        Command::Extract {
            video,
            project,
            extraction,
        } => {
            let project = Project::new(project);
            let (_, frames) = extract_project_frames(
                &settings.ffmpeg(),
                &settings.ffprobe(),
                &video,
                &project,
                &extraction.options(&settings),
            )?;
            println!(
                "Extracted {} frames to {}",
                frames.len(),
                project.source_dir().display()
            );
        }
        Command::Select { project, selection } => {
            select(&settings, &Project::new(project), &selection).await?;
        }
        Command::Run {
            video,
            project,
            extraction,
            selection,
        } => {
            let project = Project::new(project);
            // Fail on bad parameters before spending time in ffmpeg.
            selection.parameters(&settings).validate()?;
            extract_project_frames(
                &settings.ffmpeg(),
                &settings.ffprobe(),
                &video,
                &project,
                &extraction.options(&settings),
            )?;
            select(&settings, &project, &selection).await?;
        }
    }

    Ok(())
}

async fn select(settings: &AppSettings, project: &Project, args: &SelectionArgs) -> Result<()> {
    let params = args.parameters(settings);
    let analyzer = SequenceAnalyzer::new();
    let result = select_project_frames(&analyzer, project, &params, args.timeout(settings)).await?;

    if let Some(report) = &args.report {
        write_report(report, &result)?;
        info!(path = %report.display(), "Wrote report");
    }

    print_summary(project, &result);
    Ok(())
}

fn print_summary(project: &Project, result: &AnalysisResult) {
    let stats = &result.statistics;
    println!("Total frames extracted: {}", stats.total_frames);
    println!("Best images selected: {}", stats.best_frames);
    if stats.unscoreable_frames > 0 {
        println!("Unreadable frames: {}", stats.unscoreable_frames);
    }
    if let (Some(avg), Some(min), Some(max)) = (stats.avg_score, stats.min_score, stats.max_score) {
        println!("Average sharpness score: {:.2}", avg);
        println!("Min sharpness score: {:.2}", min);
        println!("Max sharpness score: {:.2}", max);
    }
    println!("Best images directory: {}", project.best_dir().display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_settings() {
        let cli = Cli::try_parse_from([
            "sharp-frame-picker",
            "select",
            "--project",
            "capture",
            "--batch-size",
            "20",
            "--max-images",
            "9",
            "--timeout-secs",
            "3",
        ])
        .unwrap();

        let Command::Select { project, selection } = cli.command else {
            panic!("expected select");
        };
        assert_eq!(project, PathBuf::from("capture"));

        let settings = AppSettings::default();
        let params = selection.parameters(&settings);
        assert_eq!(params.batch_size, 20);
        assert_eq!(params.max_images, 9);
        assert_eq!(params.threshold, settings.selection.threshold);
        assert_eq!(params.min_images, settings.selection.min_images);
        assert_eq!(selection.timeout(&settings), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_settings_fill_unset_flags() {
        let settings = AppSettings {
            fps: 2.0,
            width: Some(1280),
            score_timeout_secs: Some(30),
            ..AppSettings::default()
        };

        let extraction = ExtractionArgs::default().options(&settings);
        assert_eq!(extraction.fps, 2.0);
        assert_eq!(extraction.width, Some(1280));

        let selection = SelectionArgs::default();
        assert_eq!(selection.parameters(&settings), settings.selection);
        assert_eq!(selection.timeout(&settings), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_run_requires_project() {
        assert!(Cli::try_parse_from(["sharp-frame-picker", "run", "clip.mp4"]).is_err());
    }
}
