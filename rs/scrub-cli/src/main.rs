mod grab;
mod probe;

use grab::*;
use probe::*;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Clone)]
pub struct Cli {
	#[command(flatten)]
	log: scrub::Log,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Clone)]
pub enum Command {
	/// Print the video track metadata.
	Probe {
		/// A path or http(s) URL to an MP4 file.
		source: String,
	},

	/// Decode the frames shown at the given times and save them as PNG.
	Grab {
		/// A path or http(s) URL to an MP4 file.
		source: String,

		/// The time in seconds, may be repeated.
		#[arg(long = "at", required = true)]
		at: Vec<f64>,

		/// The directory to write frames to.
		#[arg(long, default_value = ".")]
		output: PathBuf,

		/// Decode every frame before seeking.
		#[arg(long)]
		preload: bool,

		#[command(flatten)]
		config: scrub::EngineConfig,
	},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	cli.log.init();

	match cli.command {
		Command::Probe { source } => probe(&source).await,
		Command::Grab {
			source,
			at,
			output,
			preload,
			config,
		} => grab(&source, &at, &output, preload, config).await,
	}
}
