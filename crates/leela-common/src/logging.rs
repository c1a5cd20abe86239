//! Subscriber setup for the worker and the smoke harness.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::LeelaError;

/// How each event is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Full format with targets, for terminals.
    #[default]
    Pretty,
    /// Abbreviated, fewer fields per line.
    Compact,
    /// Newline-delimited JSON objects.
    Json,
}

impl FromStr for LogFormat {
    type Err = LeelaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(LeelaError::InvalidArgument(format!(
                "unknown log format '{other}'"
            ))),
        }
    }
}

/// Where log lines go and how much of them.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level used when neither `filter` nor `RUST_LOG` yields directives.
    pub level: Level,
    pub format: LogFormat,
    /// Source file and line on each event. Ignored by the compact format.
    pub location: bool,
    /// Emit span enter and close events, useful for timing strategies.
    pub span_events: bool,
    /// Explicit directives, e.g. "leela_sw=debug,reqwest=warn".
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            location: false,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    /// Debug level with source locations and span timings, for local runs.
    pub fn debug() -> Self {
        Self {
            level: Level::DEBUG,
            location: true,
            span_events: true,
            ..Default::default()
        }
    }

    /// JSON lines at info level.
    pub fn production() -> Self {
        Self::default().with_format(LogFormat::Json)
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Explicit filter if it parses, then `RUST_LOG`, then the bare level.
    fn env_filter(&self) -> EnvFilter {
        self.filter
            .as_deref()
            .and_then(|custom| EnvFilter::try_new(custom).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new(self.level.as_str()))
    }

    fn fmt_span(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = fmt::layer().with_span_events(self.fmt_span());
        match self.format {
            LogFormat::Pretty => base
                .with_file(self.location)
                .with_line_number(self.location)
                .boxed(),
            LogFormat::Compact => base.compact().boxed(),
            LogFormat::Json => base
                .json()
                .with_file(self.location)
                .with_line_number(self.location)
                .boxed(),
        }
    }
}

/// Install the global subscriber.
///
/// Fails if one is already installed, e.g. by a test harness.
pub fn init_logging(config: LogConfig) -> Result<(), LeelaError> {
    let layer = config.layer().with_filter(config.env_filter());
    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| LeelaError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(!config.location);
        assert_eq!(config.fmt_span(), FmtSpan::NONE);
    }

    #[test]
    fn test_debug_preset_records_span_timings() {
        let config = LogConfig::debug();
        assert_eq!(config.level, Level::DEBUG);
        assert!(config.location);
        assert_eq!(config.fmt_span(), FmtSpan::ENTER | FmtSpan::CLOSE);
    }

    #[test]
    fn test_production_is_json_at_info() {
        let config = LogConfig::production();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, Level::INFO);
    }

    #[test]
    fn test_explicit_filter_sets_max_level() {
        let config = LogConfig::default().with_filter("leela_sw=trace,reqwest=warn");
        assert_eq!(config.env_filter().max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
