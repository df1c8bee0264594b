use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

/// Extra filter directives, e.g. `serialcmd_frame::parser=trace`.
pub const LOG_ENV: &str = "SERIALCMD_LOG";

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

    /// Parser resyncs and stale resets log at debug; show which layer spoke.
    fn shows_targets(self) -> bool {
        matches!(self, LogLevel::Debug | LogLevel::Trace)
    }
}

/// `--log-level` as the base, refined by comma-separated directives.
///
/// Returns the filter and any directives that failed to parse.
pub fn build_filter(level: LogLevel, overrides: Option<&str>) -> (EnvFilter, Vec<String>) {
    let mut filter = EnvFilter::default().add_directive(level.as_filter().into());
    let mut rejected = Vec::new();

    for raw in overrides.unwrap_or_default().split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        match raw.parse::<Directive>() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(_) => rejected.push(raw.to_string()),
        }
    }

    (filter, rejected)
}

/// Install the stderr subscriber. Stdout is reserved for command output.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let overrides = std::env::var(LOG_ENV).ok();
    let (filter, rejected) = build_filter(level, overrides.as_deref());

    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(level.shows_targets() || overrides.is_some());

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }

    for directive in rejected {
        tracing::warn!(%directive, env = LOG_ENV, "ignoring invalid log directive");
    }
}
