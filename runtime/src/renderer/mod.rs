//! Renderer abstraction for browser-based page loading.
//!
//! Defines the `Renderer` and `BrowserSession` traits that abstract over the
//! browser engine: Chromium via chromiumoxide for live runs, static HTML
//! snapshots for offline replay and tests.

pub mod chromium;
pub mod snapshot;

use crate::stealth::ClientIdentity;
use anyhow::Result;
use async_trait::async_trait;
use chainmetrics::{LoadOptions, NavigationError, NavigationInfo, PageHandle};

/// A loaded page plus the metadata of the navigation that produced it.
pub struct FetchResult {
    pub page: Box<dyn PageHandle>,
    pub navigation: NavigationInfo,
}

/// A browser engine that can start isolated sessions.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Start a fresh browser session presenting `identity`.
    async fn launch(&self, identity: &ClientIdentity) -> Result<Box<dyn BrowserSession>>;
    /// Short engine name for logs.
    fn name(&self) -> &'static str;
}

/// One browser session, owned by a single target run.
#[async_trait]
pub trait BrowserSession: Send {
    /// Open a page and navigate it to `url`.
    async fn open(
        &mut self,
        url: &str,
        options: &LoadOptions,
    ) -> Result<FetchResult, NavigationError>;
    /// Release the session and everything it holds.
    async fn close(self: Box<Self>) -> Result<()>;
}
