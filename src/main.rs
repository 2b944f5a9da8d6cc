use anyhow::Result;
use clap::Parser;
use sharp_frame_picker_lib::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    sharp_frame_picker_lib::run(Cli::parse()).await
}
