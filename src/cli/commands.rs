use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Discovers containerized services and keeps screenshots of their endpoints
#[derive(Parser, Debug)]
#[command(
    name = "servicelens",
    about = "Discovers containerized services and keeps screenshots of their endpoints",
    version,
    author,
    long_about = "servicelens walks a directory tree for Dockerfiles and compose manifests, \
                  keeps a registry of the services they declare, and periodically captures \
                  full-page screenshots of every exposed port."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - only log errors"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Run the scanner, capture loop and status endpoint",
        long_about = "Scans on a fixed interval, captures every exposed endpoint after each scan \
                      and serves the registry over HTTP until SIGINT or SIGTERM.\n\n\
                      Examples:\n  \
                      servicelens serve\n  \
                      servicelens serve --root ./services --port 8080"
    )]
    Serve(ServeArgs),

    #[command(
        about = "Run discovery once and print the registry",
        long_about = "Walks the tree once and prints the reduced service registry along with \
                      name collisions and skipped files. Nothing is captured.\n\n\
                      Examples:\n  \
                      servicelens scan\n  \
                      servicelens scan ./services --format json"
    )]
    Scan(ScanArgs),

    #[command(
        about = "Check whether a URL becomes reachable",
        long_about = "Retries navigation to the URL with a delay between attempts. Exits 0 when \
                      reachable and 2 when every attempt failed.\n\n\
                      Examples:\n  \
                      servicelens probe http://localhost:8080\n  \
                      servicelens probe http://api:3000 --attempts 3 --delay-ms 1000"
    )]
    Probe(ProbeArgs),
}

#[derive(Parser, Debug, Clone, Default)]
pub struct ServeArgs {
    #[arg(long, value_name = "PATH", help = "Directory to scan (overrides SERVICELENS_SCAN_ROOT)")]
    pub root: Option<PathBuf>,

    #[arg(short = 'p', long, help = "Status endpoint port (overrides SERVICELENS_PORT)")]
    pub port: Option<u16>,

    #[arg(
        long,
        value_name = "DIR",
        help = "Screenshot output directory (overrides SERVICELENS_SCREENSHOT_DIR)"
    )]
    pub screenshot_dir: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct ScanArgs {
    #[arg(value_name = "PATH", help = "Directory to scan (defaults to current directory)")]
    pub path: Option<PathBuf>,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ProbeArgs {
    #[arg(value_name = "URL", help = "URL to probe")]
    pub url: String,

    #[arg(long, help = "Maximum attempts (overrides SERVICELENS_MAX_RETRIES)")]
    pub attempts: Option<u32>,

    #[arg(
        long,
        value_name = "MS",
        help = "Delay between attempts (overrides SERVICELENS_RETRY_DELAY_MS)"
    )]
    pub delay_ms: Option<u64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}
