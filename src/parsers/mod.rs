// Parsers for the two workload-definition grammars.
//
// The reducer only sees these through `BuildFileParser` and `ManifestParser`,
// so discovery can be exercised with canned instruction lists in tests.

pub mod compose;
pub mod dockerfile;

pub use compose::{ComposeFile, ComposeParser, ComposeService, Environment, PortSpec};
pub use dockerfile::{DockerfileParser, Instruction};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("service '{service}': {message}")]
    InvalidService { service: String, message: String },
}

/// Turns single-container build-file text into its ordered instruction list
pub trait BuildFileParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<Vec<Instruction>, ParseError>;
}

/// Turns composition-manifest text into its declared services
pub trait ManifestParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<ComposeFile, ParseError>;
}
