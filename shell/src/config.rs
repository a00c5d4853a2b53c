use std::env;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

const CONFIG_ENV: &str = "MYSHELL_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
	pub prompt: String,
	pub limits: Limits,
	pub log: LogConfig,
}

/// Bounds on a single input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Limits {
	/// Tokens kept per line; the rest are dropped.
	pub max_args: usize,
	/// Stages allowed in one pipeline.
	pub max_stages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
	pub level: String,
	pub file: Option<PathBuf>,
}

impl Default for Config {
	fn default() -> Config {
		Config {
			prompt: "myshell$ ".to_string(),
			limits: Limits::default(),
			log: LogConfig::default(),
		}
	}
}

impl Default for Limits {
	fn default() -> Limits {
		Limits { max_args: 64, max_stages: 10 }
	}
}

impl Limits {
	// Zero would drop every token or reject every line.
	fn at_least_one(self) -> Limits {
		Limits { max_args: self.max_args.max(1), max_stages: self.max_stages.max(1) }
	}
}

impl Default for LogConfig {
	fn default() -> LogConfig {
		LogConfig { level: "warn".to_string(), file: None }
	}
}

impl Config {
	/// Parses a config file. Limits below 1 are raised to 1.
	pub fn from_toml_str(s: &str) -> Result<Config, toml::de::Error> {
		let mut config: Config = toml::from_str(s)?;
		config.limits = config.limits.at_least_one();
		Ok(config)
	}

	/// Reads `$MYSHELL_CONFIG`, falling back to `~/.config/myshell/config.toml`.
	/// A missing file yields the defaults; a malformed one is reported and ignored.
	pub fn load() -> Config {
		let Some(path) = Config::path() else {
			return Config::default();
		};
		let Ok(content) = fs::read_to_string(&path) else {
			return Config::default();
		};
		match Config::from_toml_str(&content) {
			Ok(config) => config,
			Err(e) => {
				eprintln!("myshell: config {}: {}", path.display(), e.message());
				Config::default()
			}
		}
	}

	fn path() -> Option<PathBuf> {
		if let Some(p) = env::var_os(CONFIG_ENV) {
			return Some(PathBuf::from(p));
		}
		let home = env::var_os("HOME")?;
		Some(PathBuf::from(home).join(".config/myshell/config.toml"))
	}
}
