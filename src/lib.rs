//! servicelens - discovers containerized services and screenshots their endpoints
//!
//! A scan walks a directory tree for Dockerfiles and compose manifests and
//! reduces them to one [`ServiceDefinition`] per service name. The
//! [`ServiceRegistry`] holds the merged result; after every scan a capture
//! round renders each exposed port in an isolated browsing context and
//! stores a full-page screenshot plus a per-service metadata record.
//!
//! # Project Structure
//!
//! - [`discovery`]: locating and reducing workload definitions
//! - [`parsers`]: Dockerfile and compose manifest parsing
//! - [`registry`]: snapshot-swapped service registry
//! - [`scheduler`]: periodic, single-flight scan cycles
//! - [`capture`]: renderer seam, capture rounds, reachability probe, artifacts
//! - [`status`]: HTTP status surface
//! - [`app`]: startup and orderly shutdown

pub mod app;
pub mod capture;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod fs;
pub mod model;
pub mod parsers;
pub mod registry;
pub mod scheduler;
pub mod status;
pub mod util;

pub use capture::{
    ArtifactStore, CaptureError, CaptureOrchestrator, CaptureSettings, Reachability,
    ReachabilityProbe, Renderer, RoundReport,
};
pub use config::{ConfigError, ServiceLensConfig};
pub use discovery::{DiscoveryPipeline, Reduction, ScanSource};
pub use model::{CaptureMetadata, PortToken, ServiceDefinition, ServiceKind, Viewport};
pub use registry::{MergeSummary, ServiceRegistry, Snapshot};
pub use scheduler::{CycleOutcome, ScanScheduler};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
