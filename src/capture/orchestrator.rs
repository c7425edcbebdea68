//! Concurrent capture rounds over every exposed endpoint in the registry

use super::artifact::ArtifactStore;
use super::reachability::{Reachability, ReachabilityProbe};
use super::renderer::{BrowsingContext, NavigateOptions, Renderer, WaitUntil};
use super::CaptureError;
use crate::model::{CaptureMetadata, PortToken, ServiceDefinition, Viewport};
use crate::registry::Snapshot;
use chrono::Utc;
use futures_util::FutureExt;
use std::collections::{BTreeMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    pub viewport: Viewport,
    pub navigation_timeout: Duration,
    /// Limit on taking the screenshot once navigation has settled
    pub capture_timeout: Duration,
    pub wait_until: WaitUntil,
    /// Maximum in-flight tasks across all rounds; `None` is unbounded
    pub max_concurrency: Option<usize>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
            wait_until: WaitUntil::NetworkIdle,
            max_concurrency: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaptureTask {
    pub service: String,
    pub url: String,
}

/// Host-network and container-network URLs for one exposed port
pub fn candidate_urls(service: &str, port: &PortToken) -> [String; 2] {
    [
        format!("http://localhost:{}", port),
        format!("http://{}:{}", service, port),
    ]
}

pub fn plan_round(services: &BTreeMap<String, ServiceDefinition>) -> Vec<CaptureTask> {
    services
        .iter()
        .flat_map(|(name, definition)| {
            definition.exposed_ports.iter().flat_map(move |port| {
                candidate_urls(name, port).into_iter().map(move |url| CaptureTask {
                    service: name.clone(),
                    url,
                })
            })
        })
        .collect()
}

#[derive(Debug)]
pub enum TaskStatus {
    Captured(CaptureMetadata),
    Unreachable,
    Failed(CaptureError),
}

#[derive(Debug)]
pub struct TaskOutcome {
    pub task: CaptureTask,
    pub status: TaskStatus,
    pub duration: Duration,
}

#[derive(Debug)]
pub struct RoundReport {
    pub round_id: Uuid,
    pub outcomes: Vec<TaskOutcome>,
    pub duration: Duration,
}

impl RoundReport {
    pub fn planned(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Captured(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Failed(_)))
    }

    pub fn unreachable(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Unreachable))
    }

    pub fn outcome(&self, url: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.task.url == url)
    }

    fn count(&self, pred: impl Fn(&TaskStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

pub struct CaptureOrchestrator {
    renderer: Arc<dyn Renderer>,
    store: ArtifactStore,
    settings: CaptureSettings,
    limiter: Option<Arc<Semaphore>>,
    probe: Option<ReachabilityProbe>,
    seen: Mutex<HashSet<String>>,
}

impl CaptureOrchestrator {
    pub fn new(renderer: Arc<dyn Renderer>, store: ArtifactStore, settings: CaptureSettings) -> Self {
        let limiter = settings
            .max_concurrency
            .filter(|n| *n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));

        Self {
            renderer,
            store,
            settings,
            limiter,
            probe: None,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Probes each candidate of a service the first time the service is seen
    /// and skips capturing candidates that never become reachable.
    pub fn with_probe(mut self, probe: ReachabilityProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Captures every candidate URL of every service in `snapshot`.
    ///
    /// Returns once all tasks have settled. A failing task is recorded in the
    /// report and never affects its siblings.
    pub async fn run_round(self: &Arc<Self>, snapshot: Snapshot) -> RoundReport {
        let round_id = Uuid::new_v4();
        let start = Instant::now();
        let tasks = plan_round(&snapshot);
        let new_services = self.mark_seen(&snapshot);

        info!(round = %round_id, tasks = tasks.len(), "Starting capture round");

        let mut set = JoinSet::new();
        for task in tasks {
            let this = Arc::clone(self);
            let probe_first = new_services.contains(&task.service);
            set.spawn(async move { this.run_task(task, probe_first).await });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(round = %round_id, error = %e, "Capture task aborted"),
            }
        }

        let report = RoundReport {
            round_id,
            outcomes,
            duration: start.elapsed(),
        };

        info!(
            round = %round_id,
            planned = report.planned(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            unreachable = report.unreachable(),
            duration_ms = report.duration.as_millis(),
            "Capture round complete"
        );

        report
    }

    fn mark_seen(&self, snapshot: &Snapshot) -> HashSet<String> {
        if self.probe.is_none() {
            return HashSet::new();
        }

        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        snapshot
            .keys()
            .filter(|name| seen.insert((*name).clone()))
            .cloned()
            .collect()
    }

    async fn run_task(&self, task: CaptureTask, probe_first: bool) -> TaskOutcome {
        let start = Instant::now();

        let _permit = match &self.limiter {
            Some(limiter) => Arc::clone(limiter).acquire_owned().await.ok(),
            None => None,
        };

        if probe_first {
            if let Some(probe) = &self.probe {
                if let Reachability::Unreachable { attempts } = probe.check(&task.url).await {
                    info!(service = %task.service, url = %task.url, attempts, "Skipping capture of unreachable endpoint");
                    return TaskOutcome {
                        task,
                        status: TaskStatus::Unreachable,
                        duration: start.elapsed(),
                    };
                }
            }
        }

        let status = match self.capture(&task).await {
            Ok(metadata) => {
                info!(
                    service = %task.service,
                    url = %task.url,
                    path = %metadata.filepath.display(),
                    "Screenshot taken"
                );
                TaskStatus::Captured(metadata)
            }
            Err(e) => {
                warn!(service = %task.service, url = %task.url, error = %e, "Failed to capture endpoint");
                TaskStatus::Failed(e)
            }
        };

        TaskOutcome {
            task,
            status,
            duration: start.elapsed(),
        }
    }

    async fn capture(&self, task: &CaptureTask) -> Result<CaptureMetadata, CaptureError> {
        let mut context = self
            .renderer
            .new_isolated_context(self.settings.viewport)
            .await?;

        let captured = AssertUnwindSafe(self.navigate_and_capture(context.as_mut(), &task.url))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(CaptureError::Panicked(panic_message(panic))));

        if let Err(e) = context.close().await {
            warn!(url = %task.url, error = %e, "Failed to release browsing context");
        }

        let image = captured?;
        self.store
            .save(&task.service, &task.url, &image, self.settings.viewport, Utc::now())
            .await
    }

    /// Both stages run under their own deadline, so a task never outlives
    /// `navigation_timeout + capture_timeout`.
    async fn navigate_and_capture(
        &self,
        context: &mut dyn BrowsingContext,
        url: &str,
    ) -> Result<Vec<u8>, CaptureError> {
        let settings = &self.settings;
        let options = NavigateOptions::new(settings.wait_until, settings.navigation_timeout);

        with_deadline("navigation", url, settings.navigation_timeout, context.navigate(url, options))
            .await?;

        debug!(url, "Navigation complete, capturing page");
        with_deadline("screenshot", url, settings.capture_timeout, context.capture_full_page()).await
    }
}

async fn with_deadline<T>(
    stage: &'static str,
    url: &str,
    limit: Duration,
    fut: impl std::future::Future<Output = Result<T, CaptureError>>,
) -> Result<T, CaptureError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| CaptureError::Timeout {
            stage,
            url: url.to_string(),
            timeout_ms: limit.as_millis(),
        })?
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
