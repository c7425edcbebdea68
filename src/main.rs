use servicelens::cli::commands::{CliArgs, Commands};
use servicelens::cli::handlers::{handle_probe, handle_scan, handle_serve};
use servicelens::util::logging::{config_from_env, init_logging, parse_level};
use servicelens::VERSION;

use clap::Parser;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("servicelens v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Serve(serve_args) => handle_serve(serve_args).await,
        Commands::Scan(scan_args) => handle_scan(scan_args),
        Commands::Probe(probe_args) => handle_probe(probe_args).await,
    };

    std::process::exit(exit_code);
}

/// CLI flags win over `SERVICELENS_LOG_LEVEL`; JSON output still follows
/// `SERVICELENS_LOG_JSON`.
fn init_logging_from_args(args: &CliArgs) {
    let mut config = config_from_env();

    if let Some(level_str) = &args.log_level {
        config.level = parse_level(level_str);
    } else if args.verbose {
        config.level = Level::DEBUG;
    } else if args.quiet {
        config.level = Level::ERROR;
    }

    init_logging(config);
}
