//! Configuration management for servicelens
//!
//! Settings are read from environment variables with defaults. The `serve`
//! command may override the root, port and screenshot directory afterwards.
//!
//! # Environment Variables
//!
//! - `SERVICELENS_PORT` (fallback `PORT`): status endpoint port - default: 3000
//! - `SERVICELENS_SCREENSHOT_DIR` (fallback `SCREENSHOT_DIR`): artifact directory -
//!   default: "./public/assets/screenshots"
//! - `SERVICELENS_SCAN_ROOT`: directory walked for definitions - default: "."
//! - `SERVICELENS_SCAN_INTERVAL_MS`: scan period - default: 30000
//! - `SERVICELENS_MAX_RETRIES`: reachability attempts - default: 5
//! - `SERVICELENS_RETRY_DELAY_MS`: delay between attempts - default: 5000
//! - `SERVICELENS_NAVIGATION_TIMEOUT_MS`: capture navigation timeout - default: 30000
//! - `SERVICELENS_CAPTURE_TIMEOUT_MS`: screenshot timeout after navigation - default: 30000
//! - `SERVICELENS_PROBE_TIMEOUT_MS`: reachability navigation timeout - default: 5000
//! - `SERVICELENS_CAPTURE_CONCURRENCY`: in-flight capture bound, 0 for none - default: 16
//! - `SERVICELENS_PROBE_NEW_SERVICES`: probe before first capture - default: false
//! - `SERVICELENS_PRUNE_STALE`: replace instead of merge each cycle - default: false
//! - `SERVICELENS_CHROME_PATH`: browser executable - default: auto-detected
//! - `SERVICELENS_LOG_LEVEL`: logging level - default: "info"

use crate::capture::{CaptureSettings, ProbeSettings, WaitUntil};
use crate::model::Viewport;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SCREENSHOT_DIR: &str = "./public/assets/screenshots";
pub const DEFAULT_SCAN_ROOT: &str = ".";
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_CAPTURE_CONCURRENCY: usize = 16;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLensConfig {
    pub port: u16,
    pub screenshot_dir: PathBuf,
    pub scan_root: PathBuf,
    pub scan_interval_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub navigation_timeout_ms: u64,
    pub capture_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    /// 0 disables the bound
    pub capture_concurrency: usize,
    pub probe_new_services: bool,
    pub prune_stale: bool,
    pub chrome_path: Option<PathBuf>,
    pub viewport: Viewport,
    pub log_level: String,
}

impl Default for ServiceLensConfig {
    /// Loads from `SERVICELENS_*` environment variables, falling back to
    /// defaults for anything missing or unparseable.
    fn default() -> Self {
        Self {
            port: env_parse("SERVICELENS_PORT")
                .or_else(|| env_parse("PORT"))
                .unwrap_or(DEFAULT_PORT),
            screenshot_dir: env::var("SERVICELENS_SCREENSHOT_DIR")
                .or_else(|_| env::var("SCREENSHOT_DIR"))
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_SCREENSHOT_DIR)),
            scan_root: env::var("SERVICELENS_SCAN_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_SCAN_ROOT)),
            scan_interval_ms: env_parse("SERVICELENS_SCAN_INTERVAL_MS")
                .unwrap_or(DEFAULT_SCAN_INTERVAL_MS),
            max_retries: env_parse("SERVICELENS_MAX_RETRIES").unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay_ms: env_parse("SERVICELENS_RETRY_DELAY_MS")
                .unwrap_or(DEFAULT_RETRY_DELAY_MS),
            navigation_timeout_ms: env_parse("SERVICELENS_NAVIGATION_TIMEOUT_MS")
                .unwrap_or(DEFAULT_NAVIGATION_TIMEOUT_MS),
            capture_timeout_ms: env_parse("SERVICELENS_CAPTURE_TIMEOUT_MS")
                .unwrap_or(DEFAULT_CAPTURE_TIMEOUT_MS),
            probe_timeout_ms: env_parse("SERVICELENS_PROBE_TIMEOUT_MS")
                .unwrap_or(DEFAULT_PROBE_TIMEOUT_MS),
            capture_concurrency: env_parse("SERVICELENS_CAPTURE_CONCURRENCY")
                .unwrap_or(DEFAULT_CAPTURE_CONCURRENCY),
            probe_new_services: env_parse("SERVICELENS_PROBE_NEW_SERVICES").unwrap_or(false),
            prune_stale: env_parse("SERVICELENS_PRUNE_STALE").unwrap_or(false),
            chrome_path: env::var("SERVICELENS_CHROME_PATH").ok().map(PathBuf::from),
            viewport: Viewport::default(),
            log_level: env::var("SERVICELENS_LOG_LEVEL")
                .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
                .to_lowercase(),
        }
    }
}

impl ServiceLensConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` for a zero interval, zero
    /// retries, a zero timeout or an unknown log level.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "Scan interval must be at least 1ms".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::ValidationFailed(
                "Max retries must be at least 1".to_string(),
            ));
        }
        if self.navigation_timeout_ms == 0
            || self.capture_timeout_ms == 0
            || self.probe_timeout_ms == 0
        {
            return Err(ConfigError::ValidationFailed(
                "Timeouts must be at least 1ms".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            viewport: self.viewport,
            navigation_timeout: Duration::from_millis(self.navigation_timeout_ms),
            capture_timeout: Duration::from_millis(self.capture_timeout_ms),
            wait_until: WaitUntil::NetworkIdle,
            max_concurrency: (self.capture_concurrency > 0).then_some(self.capture_concurrency),
        }
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            max_attempts: self.max_retries,
            delay: Duration::from_millis(self.retry_delay_ms),
            timeout: Duration::from_millis(self.probe_timeout_ms),
            viewport: self.viewport,
        }
    }
}

impl fmt::Display for ServiceLensConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ServiceLens Configuration:")?;
        writeln!(f, "  Port: {}", self.port)?;
        writeln!(f, "  Scan Root: {}", self.scan_root.display())?;
        writeln!(f, "  Screenshot Dir: {}", self.screenshot_dir.display())?;
        writeln!(f, "  Scan Interval: {}ms", self.scan_interval_ms)?;
        writeln!(f, "  Max Retries: {}", self.max_retries)?;
        writeln!(f, "  Retry Delay: {}ms", self.retry_delay_ms)?;
        writeln!(f, "  Navigation Timeout: {}ms", self.navigation_timeout_ms)?;
        writeln!(f, "  Capture Timeout: {}ms", self.capture_timeout_ms)?;
        writeln!(f, "  Capture Concurrency: {}", self.capture_concurrency)?;
        writeln!(f, "  Probe New Services: {}", self.probe_new_services)?;
        writeln!(f, "  Prune Stale: {}", self.prune_stale)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }

        fn unset(key: &str) -> Self {
            let old_value = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    const KEYS: &[&str] = &[
        "SERVICELENS_PORT",
        "PORT",
        "SERVICELENS_SCREENSHOT_DIR",
        "SCREENSHOT_DIR",
        "SERVICELENS_SCAN_ROOT",
        "SERVICELENS_SCAN_INTERVAL_MS",
        "SERVICELENS_MAX_RETRIES",
        "SERVICELENS_RETRY_DELAY_MS",
        "SERVICELENS_NAVIGATION_TIMEOUT_MS",
        "SERVICELENS_CAPTURE_TIMEOUT_MS",
        "SERVICELENS_PROBE_TIMEOUT_MS",
        "SERVICELENS_CAPTURE_CONCURRENCY",
        "SERVICELENS_PROBE_NEW_SERVICES",
        "SERVICELENS_PRUNE_STALE",
        "SERVICELENS_CHROME_PATH",
        "SERVICELENS_LOG_LEVEL",
    ];

    fn clean_env() -> Vec<EnvGuard> {
        KEYS.iter().map(|k| EnvGuard::unset(k)).collect()
    }

    #[test]
    #[serial]
    fn test_default_configuration() {
        let _guards = clean_env();

        let config = ServiceLensConfig::default();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.screenshot_dir, PathBuf::from(DEFAULT_SCREENSHOT_DIR));
        assert_eq!(config.scan_root, PathBuf::from("."));
        assert_eq!(config.scan_interval_ms, 30_000);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay_ms, 5_000);
        assert_eq!(config.capture_concurrency, 16);
        assert!(!config.probe_new_services);
        assert!(!config.prune_stale);
        assert_eq!(config.chrome_path, None);
        assert_eq!(config.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_environment_variable_parsing() {
        let mut guards = clean_env();
        guards.extend([
            EnvGuard::set("SERVICELENS_PORT", "8081"),
            EnvGuard::set("SERVICELENS_SCREENSHOT_DIR", "/tmp/shots"),
            EnvGuard::set("SERVICELENS_SCAN_INTERVAL_MS", "1000"),
            EnvGuard::set("SERVICELENS_MAX_RETRIES", "2"),
            EnvGuard::set("SERVICELENS_CAPTURE_CONCURRENCY", "0"),
            EnvGuard::set("SERVICELENS_CAPTURE_TIMEOUT_MS", "1500"),
            EnvGuard::set("SERVICELENS_PRUNE_STALE", "true"),
            EnvGuard::set("SERVICELENS_LOG_LEVEL", "DEBUG"),
        ]);

        let config = ServiceLensConfig::default();

        assert_eq!(config.port, 8081);
        assert_eq!(config.screenshot_dir, PathBuf::from("/tmp/shots"));
        assert_eq!(config.scan_interval(), Duration::from_secs(1));
        assert_eq!(config.probe_settings().max_attempts, 2);
        assert_eq!(config.capture_settings().max_concurrency, None);
        assert_eq!(
            config.capture_settings().capture_timeout,
            Duration::from_millis(1500)
        );
        assert!(config.prune_stale);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    #[serial]
    fn test_legacy_variable_fallbacks() {
        let mut guards = clean_env();
        guards.extend([
            EnvGuard::set("PORT", "4000"),
            EnvGuard::set("SCREENSHOT_DIR", "/var/shots"),
        ]);

        let config = ServiceLensConfig::default();

        assert_eq!(config.port, 4000);
        assert_eq!(config.screenshot_dir, PathBuf::from("/var/shots"));
    }

    #[test]
    #[serial]
    fn test_unparseable_values_fall_back_to_defaults() {
        let mut guards = clean_env();
        guards.extend([
            EnvGuard::set("SERVICELENS_PORT", "not-a-port"),
            EnvGuard::set("SERVICELENS_SCAN_INTERVAL_MS", "-5"),
        ]);

        let config = ServiceLensConfig::default();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.scan_interval_ms, DEFAULT_SCAN_INTERVAL_MS);
    }

    #[test]
    #[serial]
    fn test_validation_rejects_zero_values() {
        let _guards = clean_env();
        let base = ServiceLensConfig::default();

        let zero_interval = ServiceLensConfig {
            scan_interval_ms: 0,
            ..base.clone()
        };
        let zero_retries = ServiceLensConfig {
            max_retries: 0,
            ..base.clone()
        };
        let zero_timeout = ServiceLensConfig {
            navigation_timeout_ms: 0,
            ..base.clone()
        };
        let zero_capture_timeout = ServiceLensConfig {
            capture_timeout_ms: 0,
            ..base.clone()
        };
        let bad_level = ServiceLensConfig {
            log_level: "loud".to_string(),
            ..base
        };

        for config in [zero_interval, zero_retries, zero_timeout, zero_capture_timeout, bad_level] {
            assert!(matches!(
                config.validate(),
                Err(ConfigError::ValidationFailed(_))
            ));
        }
    }

    #[test]
    #[serial]
    fn test_config_display() {
        let _guards = clean_env();
        let display = ServiceLensConfig::default().to_string();
        assert!(display.contains("ServiceLens Configuration:"));
        assert!(display.contains("Port: 3000"));
    }
}
