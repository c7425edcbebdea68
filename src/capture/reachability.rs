//! Bounded retry-with-delay reachability check

use super::renderer::{NavigateOptions, Renderer, WaitUntil};
use super::CaptureError;
use crate::model::Viewport;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(5000);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    pub max_attempts: u32,
    pub delay: Duration,
    pub timeout: Duration,
    pub viewport: Viewport,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            timeout: DEFAULT_PROBE_TIMEOUT,
            viewport: Viewport::default(),
        }
    }
}

/// Outcome of a probe; unreachable is a normal answer, not an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Reachable { attempts: u32 },
    Unreachable { attempts: u32 },
}

impl Reachability {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Reachability::Reachable { .. })
    }
}

#[derive(Clone)]
pub struct ReachabilityProbe {
    renderer: Arc<dyn Renderer>,
    settings: ProbeSettings,
}

impl ReachabilityProbe {
    pub fn new(renderer: Arc<dyn Renderer>, settings: ProbeSettings) -> Self {
        Self { renderer, settings }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Attempts run one after another; each uses a fresh isolated context.
    pub async fn check(&self, url: &str) -> Reachability {
        let max_attempts = self.settings.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.attempt(url).await {
                Ok(()) => {
                    debug!(url, attempt, "Endpoint reachable");
                    return Reachability::Reachable { attempts: attempt };
                }
                Err(e) => {
                    debug!(url, attempt, max_attempts, error = %e, "Reachability attempt failed");
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.settings.delay).await;
            }
        }

        info!(url, attempts = max_attempts, "Endpoint unreachable");
        Reachability::Unreachable {
            attempts: max_attempts,
        }
    }

    async fn attempt(&self, url: &str) -> Result<(), CaptureError> {
        let mut context = self
            .renderer
            .new_isolated_context(self.settings.viewport)
            .await?;

        let timeout = self.settings.timeout;
        let options = NavigateOptions::new(WaitUntil::Load, timeout);
        let navigated = match tokio::time::timeout(timeout, context.navigate(url, options)).await {
            Ok(result) => result,
            Err(_) => Err(CaptureError::Timeout {
                stage: "navigation",
                url: url.to_string(),
                timeout_ms: timeout.as_millis(),
            }),
        };

        if let Err(e) = context.close().await {
            debug!(url, error = %e, "Failed to close probe context");
        }

        navigated
    }
}
