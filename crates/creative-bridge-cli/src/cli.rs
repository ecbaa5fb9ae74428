use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "creative-bridge",
    version,
    about = "Transform Kargo snippets into Amazon DSP ready creatives"
)]
pub struct Cli {
    /// Settings file (TOML).
    #[arg(long, value_name = "PATH", default_value = "creative-bridge.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Process a JSON array of creative configurations and print a report.
    Process(ProcessArgs),

    /// List snippet ids served by the built-in snippet catalogue.
    Snippets,
}

#[derive(Parser)]
pub struct ProcessArgs {
    /// JSON file holding an array of creative configurations.
    #[arg(value_name = "CREATIVES")]
    pub creatives: PathBuf,

    /// Upload every processed creative to the DSP.
    #[arg(long)]
    pub upload: bool,

    /// Advertiser for uploads; falls back to `[dsp] default_advertiser_id`.
    #[arg(long, value_name = "ID")]
    pub advertiser_id: Option<String>,

    /// Print only the report summary instead of full creatives.
    #[arg(long)]
    pub summary: bool,
}
