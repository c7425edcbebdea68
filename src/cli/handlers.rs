//! Command handlers; each returns the process exit code

use super::commands::{ProbeArgs, ScanArgs, ServeArgs};
use super::output::{OutputFormatter, ScanReport};
use crate::app;
use crate::capture::{Reachability, ReachabilityProbe};
use crate::config::ServiceLensConfig;
use crate::discovery::{DefinitionLocator, DefinitionReducer};
use crate::fs::RealFileSystem;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{error, info};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_UNREACHABLE: i32 = 2;

pub fn serve_config(args: &ServeArgs, mut config: ServiceLensConfig) -> ServiceLensConfig {
    if let Some(root) = &args.root {
        config.scan_root = root.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(dir) = &args.screenshot_dir {
        config.screenshot_dir = dir.clone();
    }
    config
}

pub async fn handle_serve(args: &ServeArgs) -> i32 {
    let config = serve_config(args, ServiceLensConfig::default());

    match app::serve(config).await {
        Ok(()) => EXIT_OK,
        Err(e) => {
            error!(error = %format!("{e:#}"), "servicelens failed to start");
            EXIT_FAILURE
        }
    }
}

pub fn handle_scan(args: &ScanArgs) -> i32 {
    match run_scan(args) {
        Ok(output) => {
            println!("{}", output);
            EXIT_OK
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "Scan failed");
            eprintln!("Error: {e:#}");
            EXIT_FAILURE
        }
    }
}

fn run_scan(args: &ScanArgs) -> Result<String> {
    let root = args.path.clone().unwrap_or_else(|| PathBuf::from("."));
    let root = root
        .canonicalize()
        .with_context(|| format!("Scan root {:?} is not accessible", root))?;

    let located = DefinitionLocator::new(RealFileSystem).locate(&root)?;
    let reduction = DefinitionReducer::new(RealFileSystem).reduce(&located);

    let report = ScanReport::new(&root, &reduction, &located.unreadable_dirs);
    OutputFormatter::new(args.format.into()).format_scan(&report)
}

pub async fn handle_probe(args: &ProbeArgs) -> i32 {
    let mut config = ServiceLensConfig::default();
    if let Some(attempts) = args.attempts {
        config.max_retries = attempts;
    }
    if let Some(delay_ms) = args.delay_ms {
        config.retry_delay_ms = delay_ms;
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        return EXIT_FAILURE;
    }

    let renderer = match app::launch_renderer(&config).await {
        Ok(renderer) => renderer,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Probe failed to start");
            return EXIT_FAILURE;
        }
    };

    let probe = ReachabilityProbe::new(renderer.clone(), config.probe_settings());
    let result = probe.check(&args.url).await;

    if let Err(e) = renderer.shutdown().await {
        error!(error = %e, "Failed to shut down renderer");
    }

    match result {
        Reachability::Reachable { attempts } => {
            info!(url = %args.url, attempts, "Reachable");
            println!("{} reachable after {} attempt(s)", args.url, attempts);
            EXIT_OK
        }
        Reachability::Unreachable { attempts } => {
            println!(
                "{} unreachable after {} attempt(s), {}ms apart",
                args.url,
                attempts,
                config.retry_delay_ms
            );
            EXIT_UNREACHABLE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::OutputFormatArg;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_serve_config_overrides() {
        let base = ServiceLensConfig {
            port: 3000,
            ..ServiceLensConfig::default()
        };
        let args = ServeArgs {
            root: Some(PathBuf::from("/srv")),
            port: Some(9000),
            screenshot_dir: None,
        };

        let config = serve_config(&args, base.clone());

        assert_eq!(config.scan_root, PathBuf::from("/srv"));
        assert_eq!(config.port, 9000);
        assert_eq!(config.screenshot_dir, base.screenshot_dir);
    }

    #[test]
    fn test_run_scan_json() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("api")).unwrap();
        fs::write(temp.path().join("api/Dockerfile"), "FROM node\nEXPOSE 3000\n").unwrap();

        let output = run_scan(&ScanArgs {
            path: Some(temp.path().to_path_buf()),
            format: OutputFormatArg::Json,
        })
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["services"][0]["name"], "api");
        assert_eq!(value["services"][0]["exposedPorts"][0], "3000");
    }

    #[test]
    fn test_run_scan_missing_root() {
        let temp = TempDir::new().unwrap();
        let result = run_scan(&ScanArgs {
            path: Some(temp.path().join("missing")),
            format: OutputFormatArg::Human,
        });
        assert!(result.is_err());
    }
}
