pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{CliArgs, Commands, OutputFormatArg, ProbeArgs, ScanArgs, ServeArgs};
pub use output::{OutputFormat, OutputFormatter, ScanReport};
