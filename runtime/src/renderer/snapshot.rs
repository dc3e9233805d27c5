//! Offline renderer serving recorded HTML.
//!
//! Each session hands out a [`SnapshotPage`] for the requested URL, with
//! every recorded page reachable through `goto`. Navigation failures
//! and slow loads can be scripted per URL, which makes the orchestrator
//! testable without a browser.

use super::{BrowserSession, FetchResult, Renderer};
use crate::stealth::ClientIdentity;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chainmetrics::{LoadOptions, NavigationError, Observation, SnapshotPage};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Fixture {
    html: String,
    status: u16,
    delay: Option<Duration>,
    failure: Option<NavigationError>,
    download: Option<(String, String)>,
    observations: Vec<Observation>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            html: String::new(),
            status: 200,
            delay: None,
            failure: None,
            download: None,
            observations: Vec::new(),
        }
    }
}

/// Serves recorded pages keyed by URL.
#[derive(Debug, Default)]
pub struct SnapshotRenderer {
    fixtures: Arc<HashMap<String, Fixture>>,
    launched: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl SnapshotRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn fixture(&mut self, url: &str) -> &mut Fixture {
        Arc::make_mut(&mut self.fixtures)
            .entry(url.to_string())
            .or_default()
    }

    /// Record `html` as the document served for `url`.
    pub fn with_page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.fixture(url).html = html.into();
        self
    }

    /// Record a page from a file on disk.
    pub fn with_page_file(self, url: &str, path: &Path) -> Result<Self> {
        let html = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        Ok(self.with_page(url, html))
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.fixture(url).status = status;
        self
    }

    /// Make navigation to `url` fail with `error`.
    pub fn with_failure(mut self, url: &str, error: NavigationError) -> Self {
        self.fixture(url).failure = Some(error);
        self
    }

    /// Delay navigation to `url`; delays past the load timeout time out.
    pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
        self.fixture(url).delay = Some(delay);
        self
    }

    pub fn with_download(
        mut self,
        url: &str,
        name: impl Into<String>,
        contents: impl Into<String>,
    ) -> Self {
        self.fixture(url).download = Some((name.into(), contents.into()));
        self
    }

    pub fn with_observation(mut self, url: &str, observation: Observation) -> Self {
        self.fixture(url).observations.push(observation);
        self
    }

    /// Sessions started so far.
    pub fn sessions_launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    /// Sessions released so far.
    pub fn sessions_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for SnapshotRenderer {
    async fn launch(&self, _identity: &ClientIdentity) -> Result<Box<dyn BrowserSession>> {
        self.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SnapshotSession {
            fixtures: Arc::clone(&self.fixtures),
            closed: Arc::clone(&self.closed),
        }))
    }

    fn name(&self) -> &'static str {
        "snapshot"
    }
}

struct SnapshotSession {
    fixtures: Arc<HashMap<String, Fixture>>,
    closed: Arc<AtomicUsize>,
}

impl SnapshotSession {
    fn build_page(&self, url: &str, fixture: &Fixture) -> SnapshotPage {
        let mut page = SnapshotPage::new(url, fixture.html.clone()).with_status(fixture.status);
        for observation in &fixture.observations {
            page = page.with_observation(observation.clone());
        }
        if let Some((name, contents)) = &fixture.download {
            page = page.with_download(name.clone(), contents.clone());
        }
        // The entry page links to itself so hops can return to it.
        for (linked_url, linked) in self.fixtures.iter() {
            if linked.failure.is_none() {
                page = page.with_linked_page(linked_url.clone(), linked.html.clone());
                for observation in &linked.observations {
                    page = page.with_linked_observation(linked_url.clone(), observation.clone());
                }
            }
        }
        page
    }
}

#[async_trait]
impl BrowserSession for SnapshotSession {
    async fn open(
        &mut self,
        url: &str,
        options: &LoadOptions,
    ) -> Result<FetchResult, NavigationError> {
        let started = Instant::now();
        let fixture = self
            .fixtures
            .get(url)
            .ok_or_else(|| NavigationError::Failed {
                url: url.to_string(),
                detail: "no snapshot recorded for this url".into(),
            })?;

        if let Some(delay) = fixture.delay {
            let limit = Duration::from_millis(options.timeout_ms);
            if delay >= limit {
                tokio::time::sleep(limit).await;
                return Err(NavigationError::Timeout {
                    url: url.to_string(),
                    timeout_ms: options.timeout_ms,
                });
            }
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &fixture.failure {
            return Err(error.clone());
        }

        let page = self.build_page(url, fixture);
        let mut navigation = page.navigation_info();
        navigation.load_time_ms = started.elapsed().as_millis() as u64;
        Ok(FetchResult {
            page: Box::new(page),
            navigation,
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
