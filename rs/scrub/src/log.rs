use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Logging configuration, usable as a set of CLI flags.
#[derive(Clone, Debug, clap::Args)]
pub struct Log {
	/// The default log level, used when `RUST_LOG` is unset.
	#[arg(id = "log-level", long = "log-level", default_value = "info", env = "SCRUB_LOG_LEVEL")]
	pub level: Level,
}

impl Default for Log {
	fn default() -> Self {
		Self { level: Level::INFO }
	}
}

impl Log {
	pub fn new(level: Level) -> Self {
		Self { level }
	}

	/// Install a global subscriber writing to stderr.
	///
	/// Does nothing if a subscriber is already installed.
	pub fn init(&self) {
		let filter = EnvFilter::builder()
			.with_default_directive(LevelFilter::from_level(self.level).into())
			.from_env_lossy();

		let result = tracing_subscriber::fmt()
			.with_env_filter(filter)
			.with_writer(std::io::stderr)
			.try_init();

		if result.is_err() {
			tracing::debug!("log subscriber already installed");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::Parser;

	#[derive(Parser)]
	struct Cli {
		#[command(flatten)]
		log: Log,
	}

	#[test]
	fn test_level() {
		assert_eq!(Cli::parse_from(["test"]).log.level, Level::INFO);
		assert_eq!(Cli::parse_from(["test", "--log-level", "debug"]).log.level, Level::DEBUG);
		assert!(Cli::try_parse_from(["test", "--log-level", "loud"]).is_err());
	}

	#[test]
	fn test_init_twice() {
		Log::new(Level::WARN).init();
		Log::default().init();
	}
}
