//! Periodic scan cycles with a single-flight guard
//!
//! A cycle runs discovery, applies the result to the registry and kicks off
//! a capture round over the new snapshot. At most one cycle is in flight;
//! a trigger arriving while one runs is dropped, not queued. Capture rounds
//! are single-flight as well: cycles finishing while a round runs collapse
//! into one follow-up round over the latest registry snapshot.

use crate::capture::{CaptureOrchestrator, RoundReport};
use crate::discovery::ScanSource;
use crate::registry::{MergeSummary, ServiceRegistry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(MergeSummary),
    /// Another cycle held the guard
    Skipped,
    Failed(String),
}

/// Holds the scanning flag; clearing happens on drop, so every exit path of
/// a cycle releases it.
pub struct ScanGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ScanGuard<'a> {
    pub fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct ScanScheduler {
    source: Arc<dyn ScanSource>,
    registry: Arc<ServiceRegistry>,
    capture: Option<Arc<CaptureOrchestrator>>,
    interval: Duration,
    prune_stale: bool,
    scanning: AtomicBool,
    rounds: Mutex<JoinSet<RoundReport>>,
    round_active: Arc<AtomicBool>,
    round_requested: Arc<AtomicBool>,
}

impl ScanScheduler {
    pub fn new(source: Arc<dyn ScanSource>, registry: Arc<ServiceRegistry>, interval: Duration) -> Self {
        Self {
            source,
            registry,
            capture: None,
            interval,
            prune_stale: false,
            scanning: AtomicBool::new(false),
            rounds: Mutex::new(JoinSet::new()),
            round_active: Arc::new(AtomicBool::new(false)),
            round_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_capture(mut self, capture: Arc<CaptureOrchestrator>) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Replace the registry each cycle instead of merging into it
    pub fn with_prune_stale(mut self, prune_stale: bool) -> Self {
        self.prune_stale = prune_stale;
        self
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    pub fn is_capturing(&self) -> bool {
        self.round_active.load(Ordering::Acquire)
    }

    /// Capture round tasks spawned and not yet reaped
    pub fn pending_rounds(&self) -> usize {
        let mut rounds = self.rounds.lock().unwrap_or_else(|e| e.into_inner());
        self.reap_rounds(&mut rounds);
        rounds.len()
    }

    /// Runs one scan cycle unless one is already in progress.
    pub async fn trigger(&self) -> CycleOutcome {
        let Some(_guard) = ScanGuard::acquire(&self.scanning) else {
            debug!("Scan already in progress, skipping trigger");
            return CycleOutcome::Skipped;
        };

        let start = Instant::now();
        let source = Arc::clone(&self.source);
        let reduction = match tokio::task::spawn_blocking(move || source.scan()).await {
            Ok(Ok(reduction)) => reduction,
            Ok(Err(e)) => {
                error!(error = %format!("{e:#}"), "Scan cycle failed");
                return CycleOutcome::Failed(format!("{e:#}"));
            }
            Err(e) => {
                error!(error = %e, "Scan cycle aborted");
                return CycleOutcome::Failed(e.to_string());
            }
        };

        let summary = if self.prune_stale {
            self.registry.replace(reduction.services)
        } else {
            self.registry.merge(reduction.services)
        };

        info!(
            added = summary.added.len(),
            updated = summary.updated.len(),
            removed = summary.removed.len(),
            total = self.registry.len(),
            duration_ms = start.elapsed().as_millis(),
            "Registry updated"
        );

        self.spawn_round();
        CycleOutcome::Completed(summary)
    }

    /// Ticks immediately, then every interval, until `shutdown` flips.
    ///
    /// Scan cycles and capture rounds still in flight are aborted on the way
    /// out.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles = JoinSet::new();

        info!(interval_ms = self.interval.as_millis(), "Scan scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let this = Arc::clone(&self);
                    cycles.spawn(async move { this.trigger().await });
                }
                Some(finished) = cycles.join_next(), if !cycles.is_empty() => {
                    if let Err(e) = finished {
                        warn!(error = %e, "Scan cycle task ended abnormally");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        cycles.shutdown().await;
        self.abort_rounds().await;
        info!("Scan scheduler stopped");
    }

    pub async fn abort_rounds(&self) {
        let mut rounds = {
            let mut guard = self.rounds.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };

        if !rounds.is_empty() {
            info!(rounds = rounds.len(), "Aborting in-flight capture rounds");
        }
        rounds.shutdown().await;
        self.round_requested.store(false, Ordering::Release);
        self.round_active.store(false, Ordering::Release);
    }

    /// Waits for every capture round spawned so far.
    pub async fn wait_for_rounds(&self) -> Vec<RoundReport> {
        let mut rounds = {
            let mut guard = self.rounds.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };

        let mut reports = Vec::new();
        while let Some(joined) = rounds.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => warn!(error = %e, "Capture round ended abnormally"),
            }
        }
        reports
    }

    fn spawn_round(&self) {
        let Some(capture) = &self.capture else {
            return;
        };

        let mut rounds = self.rounds.lock().unwrap_or_else(|e| e.into_inner());
        self.reap_rounds(&mut rounds);

        self.round_requested.store(true, Ordering::Release);
        if self
            .round_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Capture round in flight, coalescing into a follow-up round");
            return;
        }
        self.round_requested.store(false, Ordering::Release);

        let capture = Arc::clone(capture);
        let registry = Arc::clone(&self.registry);
        let active = Arc::clone(&self.round_active);
        let requested = Arc::clone(&self.round_requested);
        rounds.spawn(async move {
            loop {
                let report = capture.run_round(registry.snapshot()).await;
                if requested.swap(false, Ordering::AcqRel) {
                    debug!("Running coalesced capture round");
                    continue;
                }

                active.store(false, Ordering::Release);
                // a request that raced the release above is picked up here
                if requested.load(Ordering::Acquire)
                    && active
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                {
                    requested.store(false, Ordering::Release);
                    continue;
                }
                break report;
            }
        });
    }

    fn reap_rounds(&self, rounds: &mut JoinSet<RoundReport>) {
        while let Some(finished) = rounds.try_join_next() {
            if let Err(e) = finished {
                warn!(error = %e, "Capture round ended abnormally");
                self.round_active.store(false, Ordering::Release);
            }
        }
    }
}
