//! Configuration loading from flexbench.toml
//!
//! Benchmark defaults and the log filter can be set in a `flexbench.toml` file
//! in the project root. The file is discovered by walking up from the current
//! directory.

use flexbench_core::{BenchmarkDefaults, ErrorStrategy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file
pub const CONFIG_FILE: &str = "flexbench.toml";

/// FlexBench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Benchmark defaults
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[runner]` section: defaults for benchmarks that leave them unset
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RunnerConfig {
    /// Measured iterations per variation
    #[serde(default)]
    pub iterations: Option<i64>,
    /// Unmeasured iterations per variation
    #[serde(default)]
    pub warmup_iterations: Option<i64>,
    /// Bound for each variation's measured loop, e.g. `"500ms"` or `"2m"`
    #[serde(default)]
    pub timeout: Option<String>,
    /// `"continue"`, `"abort"` or `"delayed-throw"`
    #[serde(default)]
    pub error_strategy: Option<ErrorStrategy>,
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    crate::logging::DEFAULT_FILTER.to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let dir = std::env::current_dir().ok()?;
        Self::discover_from(dir)
    }

    /// Walk up from `dir` to the first `flexbench.toml` and load it
    pub fn discover_from(dir: impl Into<PathBuf>) -> Option<Self> {
        let config_path = Self::locate_from(dir)?;
        match Self::load(&config_path) {
            Ok(config) => Some(config),
            Err(error) => {
                tracing::warn!(path = %config_path.display(), %error, "ignoring unreadable config");
                None
            }
        }
    }

    /// Path of the nearest `flexbench.toml` at or above `dir`
    pub fn locate_from(dir: impl Into<PathBuf>) -> Option<PathBuf> {
        let mut dir = dir.into();
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    /// Validate the `[runner]` section into benchmark defaults
    pub fn benchmark_defaults(&self) -> anyhow::Result<BenchmarkDefaults> {
        let runner = &self.runner;
        Ok(BenchmarkDefaults {
            iterations: non_negative("iterations", runner.iterations)?,
            warmup_iterations: non_negative("warmup_iterations", runner.warmup_iterations)?,
            timeout: runner.timeout.as_deref().map(parse_duration).transpose()?,
            error_strategy: runner.error_strategy,
        })
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# FlexBench Configuration

[runner]
# Measured iterations per variation (5 when neither this nor timeout is set)
# iterations = 5
# Unmeasured iterations per variation
# warmup_iterations = 0
# Bound for each variation's measured loop
# timeout = "30s"
# What to do when an iteration fails: "continue", "abort" or "delayed-throw"
# error_strategy = "continue"

[logging]
# EnvFilter directives; RUST_LOG takes precedence
filter = "flexbench=info"
"#
        .to_string()
    }
}

fn non_negative(field: &str, value: Option<i64>) -> anyhow::Result<Option<usize>> {
    value
        .map(|n| {
            usize::try_from(n)
                .map_err(|_| anyhow::anyhow!("{field} must be a non-negative integer, got {n}"))
        })
        .transpose()
}

/// Parse a duration such as `"3s"`, `"500ms"`, `"1.5m"` or `"10"` (seconds)
pub fn parse_duration(input: &str) -> anyhow::Result<Duration> {
    let input = input.trim();
    let split = input.find(char::is_alphabetic).unwrap_or(input.len());
    let (number, unit) = input.split_at(split);
    let number = number.trim();
    anyhow::ensure!(!number.is_empty(), "Missing number in duration {input:?}");

    let nanos_per_unit = match unit {
        "ns" => 1.0,
        "us" | "µs" => 1e3,
        "ms" => 1e6,
        "" | "s" => 1e9,
        "m" | "min" => 60e9,
        other => anyhow::bail!("Unknown duration unit: {other}"),
    };
    let value: f64 = number
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid duration number: {number}"))?;
    anyhow::ensure!(
        value.is_finite() && value >= 0.0,
        "Invalid duration number: {number}"
    );

    Ok(Duration::from_nanos((value * nanos_per_unit).round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.filter, "flexbench=info");
        assert_eq!(config.benchmark_defaults().unwrap(), BenchmarkDefaults::default());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("100us").unwrap(), Duration::from_micros(100));
        assert_eq!(parse_duration("1000ns").unwrap(), Duration::from_nanos(1000));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5 parsecs").is_err());
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [runner]
            iterations = 20
            timeout = "2s"
            error_strategy = "delayed-throw"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        let defaults = config.benchmark_defaults().unwrap();
        assert_eq!(defaults.iterations, Some(20));
        assert_eq!(defaults.warmup_iterations, None);
        assert_eq!(defaults.timeout, Some(Duration::from_secs(2)));
        assert_eq!(defaults.error_strategy, Some(ErrorStrategy::DelayedThrow));
        // Defaults should still apply
        assert_eq!(config.logging.filter, "flexbench=info");
    }

    #[test]
    fn test_negative_warmup_rejected() {
        let config: Config = toml::from_str("[runner]\nwarmup_iterations = -1\n").unwrap();
        let err = config.benchmark_defaults().unwrap_err();
        assert!(err.to_string().contains("must be a non-negative integer"));
    }

    #[test]
    fn test_default_toml_parses() {
        let config: Config = toml::from_str(&Config::default_toml()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_discover_walks_up() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(
            root.path().join(CONFIG_FILE),
            "[runner]\niterations = 3\n",
        )
        .unwrap();
        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let config = Config::discover_from(&nested).unwrap();
        assert_eq!(config.runner.iterations, Some(3));
        assert_eq!(
            Config::locate_from(&nested).unwrap(),
            root.path().join(CONFIG_FILE)
        );
    }
}
