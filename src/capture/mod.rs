//! Capture: reachability checks and screenshots of discovered endpoints

pub mod artifact;
#[cfg(feature = "chromium")]
pub mod chromium;
pub mod mock;
pub mod orchestrator;
pub mod reachability;
pub mod renderer;

pub use artifact::ArtifactStore;
#[cfg(feature = "chromium")]
pub use chromium::ChromiumRenderer;
pub use mock::{MockBehavior, MockRenderer};
pub use orchestrator::{
    candidate_urls, plan_round, CaptureOrchestrator, CaptureSettings, CaptureTask, RoundReport,
    TaskOutcome, TaskStatus,
};
pub use reachability::{ProbeSettings, Reachability, ReachabilityProbe};
pub use renderer::{BrowsingContext, NavigateOptions, Renderer, WaitUntil};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open browsing context: {0}")]
    Context(String),

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("{stage} of {url} timed out after {timeout_ms}ms")]
    Timeout {
        stage: &'static str,
        url: String,
        timeout_ms: u128,
    },

    #[error("screenshot failed: {0}")]
    Screenshot(String),

    #[error("failed to write {path:?}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode capture metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("renderer error: {0}")]
    Renderer(String),

    #[error("capture task panicked: {0}")]
    Panicked(String),
}
