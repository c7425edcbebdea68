use super::renderer::{BrowsingContext, NavigateOptions, Renderer};
use super::CaptureError;
use crate::model::Viewport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a mock context responds to navigation for a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    Succeed,
    /// Succeeds after sleeping; useful to overlap tasks
    Delay(Duration),
    Fail(String),
    /// Never completes; only a timeout gets the caller out
    Hang,
    /// Fails the first `n` navigations to the URL, then succeeds
    FailTimes(usize),
    Panic,
    /// Navigation succeeds, the screenshot never completes
    HangCapture,
    /// Navigation succeeds, the screenshot fails
    FailCapture(String),
}

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    open_now: AtomicUsize,
    max_open: AtomicUsize,
}

/// Scriptable renderer that records context lifecycle for assertions
pub struct MockRenderer {
    behaviors: Mutex<HashMap<String, MockBehavior>>,
    default_behavior: MockBehavior,
    navigations: Arc<Mutex<HashMap<String, usize>>>,
    counters: Arc<Counters>,
    refuse_contexts: AtomicBool,
    shut_down: AtomicBool,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::with_default(MockBehavior::Succeed)
    }

    pub fn with_default(default_behavior: MockBehavior) -> Self {
        Self {
            behaviors: Mutex::new(HashMap::new()),
            default_behavior,
            navigations: Arc::new(Mutex::new(HashMap::new())),
            counters: Arc::new(Counters::default()),
            refuse_contexts: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn set_behavior(&self, url: impl Into<String>, behavior: MockBehavior) {
        self.behaviors.lock().unwrap_or_else(|e| e.into_inner()).insert(url.into(), behavior);
    }

    /// Makes every subsequent `new_isolated_context` call fail
    pub fn refuse_contexts(&self) {
        self.refuse_contexts.store(true, Ordering::SeqCst);
    }

    pub fn contexts_opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn contexts_closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_contexts(&self) -> usize {
        self.counters.max_open.load(Ordering::SeqCst)
    }

    pub fn navigations(&self, url: &str) -> usize {
        self.navigations.lock().unwrap_or_else(|e| e.into_inner()).get(url).copied().unwrap_or(0)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Default for MockRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRenderer")
            .field("contexts_opened", &self.contexts_opened())
            .field("contexts_closed", &self.contexts_closed())
            .finish()
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn new_isolated_context(
        &self,
        viewport: Viewport,
    ) -> Result<Box<dyn BrowsingContext>, CaptureError> {
        if self.refuse_contexts.load(Ordering::SeqCst) || self.is_shut_down() {
            return Err(CaptureError::Context("mock renderer refused".to_string()));
        }

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        let open = self.counters.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_open.fetch_max(open, Ordering::SeqCst);

        let behaviors = self.behaviors.lock().unwrap_or_else(|e| e.into_inner()).clone();
        Ok(Box::new(MockContext {
            viewport,
            visited: None,
            behaviors,
            default_behavior: self.default_behavior.clone(),
            navigations: Arc::clone(&self.navigations),
            counters: Arc::clone(&self.counters),
        }))
    }

    async fn shutdown(&self) -> Result<(), CaptureError> {
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct MockContext {
    viewport: Viewport,
    visited: Option<(String, MockBehavior)>,
    behaviors: HashMap<String, MockBehavior>,
    default_behavior: MockBehavior,
    navigations: Arc<Mutex<HashMap<String, usize>>>,
    counters: Arc<Counters>,
}

#[async_trait]
impl BrowsingContext for MockContext {
    async fn navigate(&mut self, url: &str, _options: NavigateOptions) -> Result<(), CaptureError> {
        let attempt = {
            let mut navigations = self.navigations.lock().unwrap_or_else(|e| e.into_inner());
            let count = navigations.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let behavior = self
            .behaviors
            .get(url)
            .cloned()
            .unwrap_or_else(|| self.default_behavior.clone());

        match behavior.clone() {
            MockBehavior::Succeed => {}
            MockBehavior::Delay(delay) => tokio::time::sleep(delay).await,
            MockBehavior::Fail(message) => {
                return Err(CaptureError::Navigation {
                    url: url.to_string(),
                    message,
                })
            }
            MockBehavior::Hang => std::future::pending::<()>().await,
            MockBehavior::FailTimes(n) if attempt <= n => {
                return Err(CaptureError::Navigation {
                    url: url.to_string(),
                    message: format!("connection refused (attempt {attempt})"),
                })
            }
            MockBehavior::FailTimes(_) => {}
            MockBehavior::Panic => panic!("mock navigation panicked for {url}"),
            MockBehavior::HangCapture | MockBehavior::FailCapture(_) => {}
        }

        self.visited = Some((url.to_string(), behavior));
        Ok(())
    }

    async fn capture_full_page(&mut self) -> Result<Vec<u8>, CaptureError> {
        let (url, behavior) = self
            .visited
            .as_ref()
            .ok_or_else(|| CaptureError::Screenshot("no page loaded".to_string()))?;

        match behavior {
            MockBehavior::HangCapture => std::future::pending::<()>().await,
            MockBehavior::FailCapture(message) => {
                return Err(CaptureError::Screenshot(message.clone()))
            }
            _ => {}
        }

        let mut image = b"\x89PNG\r\n\x1a\n".to_vec();
        image.extend_from_slice(
            format!("{}x{} {}", self.viewport.width, self.viewport.height, url).as_bytes(),
        );
        Ok(image)
    }

    async fn close(self: Box<Self>) -> Result<(), CaptureError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        self.counters.open_now.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
