use std::fs::OpenOptions;
use std::str::FromStr;

use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode, WriteLogger};

use crate::config::LogConfig;

pub fn level(config: &LogConfig) -> LevelFilter {
	LevelFilter::from_str(&config.level).unwrap_or_else(|_| {
		eprintln!("myshell: unknown log level '{}', using warn", config.level);
		LevelFilter::Warn
	})
}

/// Installs the global logger: appended to `file` when configured, else stderr.
pub fn init(config: &LogConfig) {
	let level = level(config);
	let log_config = ConfigBuilder::new().set_target_level(LevelFilter::Off).build();
	let term = |log_config: simplelog::Config| TermLogger::init(level, log_config, TerminalMode::Stderr, ColorChoice::Auto);
	let result = match config.file {
		Some(ref path) => match OpenOptions::new().create(true).append(true).open(path) {
			Ok(file) => WriteLogger::init(level, log_config, file),
			Err(e) => {
				eprintln!("myshell: log file {}: {}", path.display(), e);
				term(log_config)
			},
		},
		None => term(log_config),
	};
	// Only fails if a logger is already set, which is harmless.
	let _ = result;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn with_level(level: &str) -> LogConfig {
		LogConfig { level: level.to_string(), file: None }
	}

	#[test]
	fn parses_level_names() {
		assert_eq!(level(&with_level("debug")), LevelFilter::Debug);
		assert_eq!(level(&with_level("OFF")), LevelFilter::Off);
		assert_eq!(level(&LogConfig::default()), LevelFilter::Warn);
	}

	#[test]
	fn unknown_level_falls_back_to_warn() {
		assert_eq!(level(&with_level("loud")), LevelFilter::Warn);
	}
}
