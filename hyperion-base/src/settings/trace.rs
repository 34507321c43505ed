use eyre::Result;
use serde::Deserialize;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
    Layer, Registry,
};

/// Logging level. A "higher level" means more will be logged.
#[derive(Default, Debug, Clone, Copy, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Off
    Off = 0,
    /// Error
    Error = 1,
    /// Warn
    Warn = 2,
    /// Debug
    Debug = 4,
    /// Trace, including noisy dependencies
    Trace = 5,
    /// Info
    #[serde(other)]
    #[default]
    Info = 3,
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> LevelFilter {
        match level {
            Level::Off => LevelFilter::OFF,
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
            Level::Info => LevelFilter::INFO,
        }
    }
}

/// Output format of log lines.
#[derive(Default, Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    /// Multi-line human readable output
    Pretty,
    /// One JSON object per event
    Json,
    /// Abbreviated single line output
    Compact,
    /// Default single line output with span context
    #[default]
    Full,
}

/// Targets that flood the output below trace. Matching is by prefix, so
/// `hyper` has to end in `::` to leave the `hyperion_*` crates alone.
const NOISY_TARGETS: &[&str] = &["hyper::", "hyper_util", "h2::", "reqwest", "tower", "rustls"];

/// Configuration for the tracing subscribers used by Hyperion agents
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Line format
    pub fmt: Style,
    /// Maximum level
    pub level: Level,
}

impl TracingConfig {
    fn targets(&self) -> Targets {
        let mut targets = Targets::new().with_default(self.level);
        if self.level < Level::Trace {
            let pinned = self.level.min(Level::Info);
            for target in NOISY_TARGETS {
                targets = targets.with_target(*target, pinned);
            }
        }
        targets
    }

    /// Attempt to instantiate and register a tracing subscriber setup from
    /// settings.
    pub fn start_tracing(&self) -> Result<()> {
        let fmt_layer: Box<dyn Layer<Layered<Targets, Registry>> + Send + Sync> = match self.fmt {
            Style::Pretty => tracing_subscriber::fmt::layer().pretty().boxed(),
            Style::Json => tracing_subscriber::fmt::layer().json().boxed(),
            Style::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
            Style::Full => tracing_subscriber::fmt::layer().boxed(),
        };

        Registry::default()
            .with(self.targets())
            .with(fmt_layer)
            .with(tracing_error::ErrorLayer::default())
            .try_init()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_levels_fall_back_to_info() {
        let config: TracingConfig =
            serde_json::from_str(r#"{"fmt": "json", "level": "verbose"}"#).unwrap();
        assert_eq!(config.level, Level::Info);
        assert_eq!(config.fmt, Style::Json);

        let config: TracingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.fmt, Style::Full);
        assert_eq!(LevelFilter::from(config.level), LevelFilter::INFO);
    }

    #[test]
    fn noisy_targets_are_pinned_below_trace() {
        let config = TracingConfig {
            fmt: Style::Full,
            level: Level::Debug,
        };
        let targets = config.targets();
        assert!(targets.would_enable("hyperion_orchestrator", &tracing::Level::DEBUG));
        assert!(targets.would_enable(
            "hyperion_ethereum::committer",
            &tracing::Level::DEBUG
        ));
        assert!(!targets.would_enable("hyper::proto", &tracing::Level::DEBUG));
        assert!(!targets.would_enable("hyper_util::client", &tracing::Level::DEBUG));

        let config = TracingConfig {
            fmt: Style::Full,
            level: Level::Trace,
        };
        assert!(config.targets().would_enable("hyper::proto", &tracing::Level::TRACE));
    }
}
