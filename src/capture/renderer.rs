//! Rendering collaborator seam
//!
//! A [`Renderer`] hands out isolated browsing contexts: no cookies, cache or
//! navigation history are shared between two contexts. A context is released
//! by [`BrowsingContext::close`], which consumes it, so it cannot be released
//! twice.

use super::CaptureError;
use crate::model::Viewport;
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    /// The load event fired
    Load,
    /// No network activity for a short quiet period
    #[default]
    NetworkIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigateOptions {
    pub wait_until: WaitUntil,
    pub timeout: Duration,
}

impl NavigateOptions {
    pub fn new(wait_until: WaitUntil, timeout: Duration) -> Self {
        Self {
            wait_until,
            timeout,
        }
    }
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn new_isolated_context(
        &self,
        viewport: Viewport,
    ) -> Result<Box<dyn BrowsingContext>, CaptureError>;

    /// Releases the renderer's top-level resource (the browser process)
    async fn shutdown(&self) -> Result<(), CaptureError>;

    fn name(&self) -> &str;
}

#[async_trait]
pub trait BrowsingContext: Send {
    async fn navigate(&mut self, url: &str, options: NavigateOptions) -> Result<(), CaptureError>;

    /// PNG bytes of the whole page, not just the viewport
    async fn capture_full_page(&mut self) -> Result<Vec<u8>, CaptureError>;

    async fn close(self: Box<Self>) -> Result<(), CaptureError>;
}
