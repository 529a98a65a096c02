use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// `level` applies to the chanmux crates; everything else stays at warn or
/// quieter.
fn targets(level: LogLevel) -> Targets {
    let level = level.as_filter();
    Targets::new()
        .with_default(level.min(LevelFilter::WARN))
        .with_target("chanmux", level)
}

pub fn init_logging(format: LogFormat, level: LogLevel) {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);
    let registry = tracing_subscriber::registry().with(targets(level));

    let _ = match format {
        LogFormat::Text => registry.with(layer).try_init(),
        LogFormat::Json => registry.with(layer.json()).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chanmux_targets_follow_requested_level() {
        let filter = targets(LogLevel::Trace);
        assert!(filter.would_enable("chanmux_mux::driver", &tracing::Level::TRACE));
        assert!(filter.would_enable("tokio::runtime", &tracing::Level::WARN));
        assert!(!filter.would_enable("tokio::runtime", &tracing::Level::INFO));
    }

    #[test]
    fn quiet_levels_apply_everywhere() {
        let filter = targets(LogLevel::Error);
        assert!(!filter.would_enable("chanmux", &tracing::Level::WARN));
        assert!(!filter.would_enable("mio", &tracing::Level::WARN));
    }
}
