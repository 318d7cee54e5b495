mod cli;
mod client;
mod logging;
mod model;
mod orchestrator;
mod render;
mod storage;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_headless = args.is_headless();

    cli::run(args).await?;

    // Exit explicitly in headless modes so lingering blocking tasks don't hold the process.
    if is_headless {
        std::process::exit(0);
    }
    Ok(())
}
