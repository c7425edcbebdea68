//! Long-running service: scheduler, capture and status endpoint
//!
//! Startup failures (missing root, unwritable artifact directory, port in
//! use, browser launch) are returned to the caller. Once running, the
//! process stops only on SIGINT/SIGTERM, tearing down in order: scheduler
//! and in-flight rounds, renderer, then the status server.

use crate::capture::{ArtifactStore, CaptureOrchestrator, ReachabilityProbe, Renderer};
use crate::config::ServiceLensConfig;
use crate::discovery::{DiscoveryPipeline, ScanSource};
use crate::fs::RealFileSystem;
use crate::registry::ServiceRegistry;
use crate::scheduler::ScanScheduler;
use crate::status::status_router;
use anyhow::{Context, Result};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tracing::{info, warn};

/// Resources acquired during startup
pub struct Startup {
    pub root: PathBuf,
    pub store: ArtifactStore,
    pub listener: TcpListener,
    pub renderer: Arc<dyn Renderer>,
}

pub async fn serve(config: ServiceLensConfig) -> Result<()> {
    let startup = start(&config).await?;
    run(config, startup, shutdown_signal()).await
}

pub async fn start(config: &ServiceLensConfig) -> Result<Startup> {
    config.validate()?;

    let root = config
        .scan_root
        .canonicalize()
        .with_context(|| format!("Scan root {:?} is not accessible", config.scan_root))?;
    if !root.is_dir() {
        anyhow::bail!("Scan root {:?} is not a directory", root);
    }

    let store = ArtifactStore::new(&config.screenshot_dir);
    store
        .ensure_dir()
        .await
        .context("Failed to prepare screenshot directory")?;

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind status endpoint on port {}", config.port))?;

    let renderer = launch_renderer(config).await?;

    Ok(Startup {
        root,
        store,
        listener,
        renderer,
    })
}

/// Runs until `shutdown` resolves, then tears everything down.
pub async fn run<S>(config: ServiceLensConfig, startup: Startup, shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send,
{
    let Startup {
        root,
        store,
        listener,
        renderer,
    } = startup;

    let registry = Arc::new(ServiceRegistry::new());

    let mut orchestrator =
        CaptureOrchestrator::new(Arc::clone(&renderer), store, config.capture_settings());
    if config.probe_new_services {
        orchestrator = orchestrator.with_probe(ReachabilityProbe::new(
            Arc::clone(&renderer),
            config.probe_settings(),
        ));
    }

    let source: Arc<dyn ScanSource> = Arc::new(DiscoveryPipeline::new(&root, RealFileSystem));
    let scheduler = Arc::new(
        ScanScheduler::new(source, Arc::clone(&registry), config.scan_interval())
            .with_capture(Arc::new(orchestrator))
            .with_prune_stale(config.prune_stale),
    );

    let (stop_scheduler, scheduler_stopped) = watch::channel(false);
    let scheduler_task = tokio::spawn(Arc::clone(&scheduler).run(scheduler_stopped));

    let address = listener.local_addr().ok();
    let (stop_server, server_stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, status_router(registry))
            .with_graceful_shutdown(async {
                let _ = server_stopped.await;
            })
            .await
    });

    info!(
        root = %root.display(),
        address = ?address,
        renderer = renderer.name(),
        "servicelens running"
    );

    shutdown.await;
    info!("Shutdown requested");

    let _ = stop_scheduler.send(true);
    if let Err(e) = scheduler_task.await {
        warn!(error = %e, "Scheduler task ended abnormally");
    }

    if let Err(e) = renderer.shutdown().await {
        warn!(error = %e, "Failed to shut down renderer");
    }

    let _ = stop_server.send(());
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Status endpoint stopped with an error"),
        Err(e) => warn!(error = %e, "Status endpoint task ended abnormally"),
    }

    info!("Shutdown complete");
    Ok(())
}

#[cfg(feature = "chromium")]
pub async fn launch_renderer(config: &ServiceLensConfig) -> Result<Arc<dyn Renderer>> {
    let renderer =
        crate::capture::ChromiumRenderer::launch(config.viewport, config.chrome_path.as_deref())
            .await
            .context("Failed to launch the rendering backend")?;
    Ok(Arc::new(renderer))
}

#[cfg(not(feature = "chromium"))]
pub async fn launch_renderer(_config: &ServiceLensConfig) -> Result<Arc<dyn Renderer>> {
    anyhow::bail!("servicelens was built without a rendering backend; enable the `chromium` feature")
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
