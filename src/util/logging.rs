//! Structured logging setup
//!
//! Console output on stderr by default, JSON lines for production. `RUST_LOG` wins
//! over everything here when set; otherwise the crate logs at the configured
//! level and chatty transport dependencies are held at `warn`.
//!
//! ```no_run
//! use servicelens::util::logging;
//!
//! logging::init_from_env();
//! tracing::info!(port = 3000, "Status endpoint listening");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static INIT: Once = Once::new();

/// Dependencies that log per request or per protocol frame
const NOISY_TARGETS: &[&str] = &["hyper", "h2", "tower_http", "chromiumoxide", "tungstenite"];

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    pub use_json: bool,
    /// Include the module target (e.g. `servicelens::scheduler`)
    pub include_target: bool,
    pub include_location: bool,
    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// JSON output with source locations and thread ids
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            use_json: true,
            include_target: true,
            include_location: true,
            include_thread_ids: true,
        }
    }

    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            ..Default::default()
        }
    }
}

/// Case-insensitive; anything unrecognized falls back to `INFO` with a note
/// on stderr, since logging is not up yet when this runs.
pub fn parse_level(level_str: &str) -> Level {
    match level_str.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

/// Filter directives applied when `RUST_LOG` is not set
pub fn default_directives(level: Level) -> Vec<String> {
    let mut directives = vec![format!("servicelens={}", level)];
    directives.extend(NOISY_TARGETS.iter().map(|target| format!("{}=warn", target)));
    directives
}

fn build_filter(level: Level) -> EnvFilter {
    if env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }

    default_directives(level)
        .iter()
        .filter_map(|d| d.parse().ok())
        .fold(EnvFilter::new(level.to_string()), |filter, directive| {
            filter.add_directive(directive)
        })
}

/// Installs the global subscriber; later calls are no-ops.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(config.include_target)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_thread_ids(config.include_thread_ids)
            .with_thread_names(config.include_thread_ids);

        let layer = if config.use_json {
            layer.json().boxed()
        } else {
            layer.boxed()
        };

        let _ = tracing_subscriber::registry()
            .with(layer)
            .with(build_filter(config.level))
            .try_init();
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

/// Reads `SERVICELENS_LOG_LEVEL` and `SERVICELENS_LOG_JSON`
pub fn init_from_env() {
    init_logging(config_from_env());
}

pub fn config_from_env() -> LoggingConfig {
    let level = env::var("SERVICELENS_LOG_LEVEL")
        .map(|v| parse_level(&v))
        .unwrap_or(Level::INFO);

    let use_json = env::var("SERVICELENS_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    LoggingConfig {
        level,
        use_json,
        ..Default::default()
    }
}
