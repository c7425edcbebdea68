//! Headless Chromium renderer over the DevTools protocol

use super::renderer::{BrowsingContext, NavigateOptions, Renderer, WaitUntil};
use super::CaptureError;
use crate::model::Viewport;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{BrowserContextId, CloseParams};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventLifecycleEvent, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures_util::{Stream, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One browser process shared by every task; each context is its own
/// DevTools browser context, which keeps cookies and cache apart.
pub struct ChromiumRenderer {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
}

impl ChromiumRenderer {
    pub async fn launch(viewport: Viewport, executable: Option<&Path>) -> Result<Self, CaptureError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(viewport.width, viewport.height);
        if let Some(path) = executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(CaptureError::Renderer)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| CaptureError::Renderer(format!("failed to launch browser: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser event handler error");
                }
            }
        });

        info!(width = viewport.width, height = viewport.height, "Launched headless browser");

        Ok(Self {
            browser: Arc::new(browser),
            handler,
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_isolated_context(
        &self,
        viewport: Viewport,
    ) -> Result<Box<dyn BrowsingContext>, CaptureError> {
        let context_id = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| CaptureError::Context(e.to_string()))?
            .result
            .browser_context_id;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(CaptureError::Context)?;

        let page = match self.browser.new_page(target).await {
            Ok(page) => page,
            Err(e) => {
                dispose(&self.browser, context_id).await;
                return Err(CaptureError::Context(e.to_string()));
            }
        };

        let metrics = SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            1.0,
            false,
        );
        if let Err(e) = page.execute(metrics).await {
            warn!(error = %e, "Failed to apply viewport to page");
        }

        Ok(Box::new(ChromiumContext {
            browser: Arc::clone(&self.browser),
            context_id,
            page,
        }))
    }

    async fn shutdown(&self) -> Result<(), CaptureError> {
        let closed = self.browser.execute(CloseParams::default()).await;
        self.handler.abort();
        closed
            .map(|_| info!("Browser closed"))
            .map_err(|e| CaptureError::Renderer(format!("failed to close browser: {e}")))
    }

    fn name(&self) -> &str {
        "chromium"
    }
}

struct ChromiumContext {
    browser: Arc<Browser>,
    context_id: BrowserContextId,
    page: Page,
}

#[async_trait]
impl BrowsingContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, options: NavigateOptions) -> Result<(), CaptureError> {
        let navigation_error = |e: chromiumoxide::error::CdpError| CaptureError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        };

        if options.wait_until != WaitUntil::NetworkIdle {
            self.page.goto(url).await.map_err(navigation_error)?;
            return Ok(());
        }

        // subscribe before navigating so the idle event cannot slip past
        self.page
            .execute(SetLifecycleEventsEnabledParams::new(true))
            .await
            .map_err(navigation_error)?;
        let lifecycle = self
            .page
            .event_listener::<EventLifecycleEvent>()
            .await
            .map_err(navigation_error)?;

        self.page.goto(url).await.map_err(navigation_error)?;
        let main_frame = self.page.mainframe().await.map_err(navigation_error)?;

        let events = lifecycle.map(|event| (event.frame_id.inner().clone(), event.name.clone()));
        let main_frame = main_frame.as_ref().map(|frame| frame.inner().as_str());
        if until_network_idle(events, main_frame).await {
            debug!(url, "Network idle");
            Ok(())
        } else {
            Err(CaptureError::Navigation {
                url: url.to_string(),
                message: "page closed before the network went idle".to_string(),
            })
        }
    }

    async fn capture_full_page(&mut self) -> Result<Vec<u8>, CaptureError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();

        self.page
            .screenshot(params)
            .await
            .map_err(|e| CaptureError::Screenshot(e.to_string()))
    }

    async fn close(self: Box<Self>) -> Result<(), CaptureError> {
        let ChromiumContext {
            browser,
            context_id,
            page,
        } = *self;

        let closed = page.close().await;
        dispose(&browser, context_id).await;
        closed.map_err(|e| CaptureError::Context(format!("failed to close page: {e}")))
    }
}

/// Consumes `(frame id, lifecycle name)` pairs until the main frame reports
/// `networkIdle` for the document started by the latest `init`.
///
/// Returns false if the stream ends first.
async fn until_network_idle<S>(mut events: S, main_frame: Option<&str>) -> bool
where
    S: Stream<Item = (String, String)> + Unpin,
{
    let mut started = false;
    while let Some((frame, name)) = events.next().await {
        if main_frame.is_some_and(|main| main != frame) {
            continue;
        }
        match name.as_str() {
            "init" => started = true,
            "networkIdle" if started => return true,
            _ => {}
        }
    }
    false
}

async fn dispose(browser: &Browser, context_id: BrowserContextId) {
    if let Err(e) = browser
        .execute(DisposeBrowserContextParams::new(context_id))
        .await
    {
        warn!(error = %e, "Failed to dispose browser context");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn events(items: &[(&str, &str)]) -> impl Stream<Item = (String, String)> + Unpin {
        stream::iter(
            items
                .iter()
                .map(|(frame, name)| (frame.to_string(), name.to_string()))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_waits_for_idle_after_new_document() {
        let lifecycle = events(&[
            ("main", "networkIdle"),
            ("main", "init"),
            ("main", "load"),
            ("main", "networkAlmostIdle"),
            ("main", "networkIdle"),
        ]);
        assert!(until_network_idle(lifecycle, Some("main")).await);
    }

    #[tokio::test]
    async fn test_stale_idle_is_ignored() {
        let lifecycle = events(&[("main", "networkIdle"), ("main", "load")]);
        assert!(!until_network_idle(lifecycle, Some("main")).await);
    }

    #[tokio::test]
    async fn test_subframe_idle_is_ignored() {
        let lifecycle = events(&[
            ("main", "init"),
            ("ad-frame", "networkIdle"),
            ("main", "load"),
        ]);
        assert!(!until_network_idle(lifecycle, Some("main")).await);
    }

    #[tokio::test]
    async fn test_unknown_main_frame_accepts_any_frame() {
        let lifecycle = events(&[("f1", "init"), ("f1", "networkIdle")]);
        assert!(until_network_idle(lifecycle, None).await);
    }
}
