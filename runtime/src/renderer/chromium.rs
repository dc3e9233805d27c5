//! Chromium-based renderer using chromiumoxide.

use super::{BrowserSession, FetchResult, Renderer};
use crate::stealth::ClientIdentity;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chainmetrics::page::{ClickTarget, DownloadedFile, ElementInfo};
use chainmetrics::{
    LoadOptions, LoadPolicy, Locator, NavigationError, NavigationInfo, Observation, PageError,
    PageHandle,
};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::emulation::SetTimezoneOverrideParams;
use chromiumoxide::cdp::browser_protocol::log::{self, EventEntryAdded, LogEntryLevel};
use chromiumoxide::cdp::browser_protocol::network::{
    EventResponseReceived, ResourceType, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::js_protocol::runtime::{ConsoleApiCalledType, EventConsoleApiCalled};
use chromiumoxide::layout::Point;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Quiet period after the load event before the network counts as idle.
const NETWORK_QUIET: Duration = Duration::from_millis(500);

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Environment variable naming an explicit Chromium binary.
pub const CHROMIUM_ENV: &str = "CHAINMETRICS_CHROMIUM_PATH";

/// Browser executables looked up on `PATH`, in preference order.
const PATH_NAMES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

/// Binary locations inside a Playwright `chromium-<revision>` directory.
const PLAYWRIGHT_BINARIES: &[&str] = &[
    "chrome-linux/chrome",
    "chrome-linux64/chrome",
    "chrome-mac/Chromium.app/Contents/MacOS/Chromium",
    "chrome-win/chrome.exe",
];

/// Find a Chromium binary: the [`CHROMIUM_ENV`] override, a browser on
/// `PATH`, then the newest build in the Playwright download cache.
pub fn find_chromium() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CHROMIUM_ENV).map(PathBuf::from) {
        if path.exists() {
            return Some(path);
        }
        warn!(path = %path.display(), "CHAINMETRICS_CHROMIUM_PATH points at a missing file, searching elsewhere");
    }
    PATH_NAMES
        .iter()
        .find_map(|name| which::which(name).ok())
        .or_else(|| {
            dirs::cache_dir().and_then(|cache| playwright_chromium(&cache.join("ms-playwright")))
        })
}

/// Newest `chromium-<revision>` build under a Playwright cache directory.
fn playwright_chromium(cache: &Path) -> Option<PathBuf> {
    let mut builds: Vec<(u32, PathBuf)> = std::fs::read_dir(cache)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let revision = entry
                .file_name()
                .to_str()?
                .strip_prefix("chromium-")?
                .parse::<u32>()
                .ok()?;
            Some((revision, entry.path()))
        })
        .collect();
    builds.sort_by(|a, b| b.0.cmp(&a.0));
    builds.into_iter().find_map(|(_, dir)| {
        PLAYWRIGHT_BINARIES
            .iter()
            .map(|rel| dir.join(rel))
            .find(|binary| binary.exists())
    })
}

/// Launches one headless Chromium per session.
pub struct ChromiumRenderer {
    executable: PathBuf,
}

impl ChromiumRenderer {
    /// Locate Chromium on this machine.
    pub fn new() -> Result<Self> {
        let executable = find_chromium().context(
            "Chromium not found. Set CHAINMETRICS_CHROMIUM_PATH, put chromium on PATH, or run `npx playwright install chromium`.",
        )?;
        Ok(Self { executable })
    }

    pub fn with_executable(executable: PathBuf) -> Self {
        Self { executable }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn launch(&self, identity: &ClientIdentity) -> Result<Box<dyn BrowserSession>> {
        let (width, height) = identity.viewport;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(&self.executable)
            .window_size(width, height)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        for arg in identity.launch_args() {
            builder = builder.arg(arg);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Drive the CDP connection until the browser goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "cdp handler error");
                }
            }
        });

        let downloads = tempfile::tempdir().context("failed to create download directory")?;
        debug!(dir = %downloads.path().display(), "chromium session started");

        Ok(Box::new(ChromiumSession {
            browser,
            handler_task,
            identity: identity.clone(),
            downloads,
        }))
    }

    fn name(&self) -> &'static str {
        "chromium"
    }
}

/// One running Chromium process.
pub struct ChromiumSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    identity: ClientIdentity,
    downloads: tempfile::TempDir,
}

impl ChromiumSession {
    async fn prepare(&self, page: &Page) -> Result<()> {
        let user_agent = SetUserAgentOverrideParams::builder()
            .user_agent(self.identity.user_agent.clone())
            .accept_language(self.identity.languages().join(","))
            .build()
            .map_err(|e| anyhow::anyhow!("bad user agent override: {e}"))?;
        page.execute(user_agent).await?;
        page.execute(SetTimezoneOverrideParams::new(self.identity.timezone.clone()))
            .await?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            self.identity.stealth_script(),
        ))
        .await?;
        page.execute(log::EnableParams::default()).await?;

        let downloads = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::AllowAndName)
            .download_path(self.downloads.path().display().to_string())
            .events_enabled(true)
            .build()
            .map_err(|e| anyhow::anyhow!("bad download behavior: {e}"))?;
        page.execute(downloads).await?;
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn open(
        &mut self,
        url: &str,
        options: &LoadOptions,
    ) -> Result<FetchResult, NavigationError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| failed(url, e))?;
        self.prepare(&page).await.map_err(|e| failed(url, e))?;

        let mut page = ChromiumPage::attach(page, self.downloads.path().to_path_buf())
            .await
            .map_err(|e| failed(url, e))?;
        let navigation = page.goto(url, options).await?;
        Ok(FetchResult {
            page: Box::new(page),
            navigation,
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut this = *self;
        this.browser
            .close()
            .await
            .context("failed to close Chromium")?;
        let _ = this.browser.wait().await;
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

fn failed(url: &str, e: impl std::fmt::Display) -> NavigationError {
    NavigationError::Failed {
        url: url.to_string(),
        detail: e.to_string(),
    }
}

#[derive(Debug)]
struct PageState {
    main_status: Option<u16>,
    last_activity: Instant,
    observations: Vec<Observation>,
}

/// A Chromium tab driven through [`PageHandle`].
pub struct ChromiumPage {
    page: Page,
    state: Arc<Mutex<PageState>>,
    listeners: Vec<JoinHandle<()>>,
    download_dir: PathBuf,
}

impl ChromiumPage {
    async fn attach(page: Page, download_dir: PathBuf) -> Result<Self> {
        let state = Arc::new(Mutex::new(PageState {
            main_status: None,
            last_activity: Instant::now(),
            observations: Vec::new(),
        }));

        let mut responses = page.event_listener::<EventResponseReceived>().await?;
        let mut console = page.event_listener::<EventConsoleApiCalled>().await?;
        let mut log_entries = page.event_listener::<EventEntryAdded>().await?;

        let s = Arc::clone(&state);
        let on_response = tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                let status = u16::try_from(event.response.status).unwrap_or(0);
                let Ok(mut state) = s.lock() else { break };
                state.last_activity = Instant::now();
                if event.r#type == ResourceType::Document && state.main_status.is_none() {
                    state.main_status = Some(status);
                }
                // Only failures matter to the block classifier.
                if status >= 400 {
                    state.observations.push(Observation::Response {
                        url: event.response.url.clone(),
                        status,
                    });
                }
            }
        });

        let s = Arc::clone(&state);
        let on_console = tokio::spawn(async move {
            while let Some(event) = console.next().await {
                if event.r#type != ConsoleApiCalledType::Error {
                    continue;
                }
                let text = event
                    .args
                    .iter()
                    .filter_map(|arg| {
                        arg.value
                            .as_ref()
                            .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
                            .or_else(|| arg.description.clone())
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                let Ok(mut state) = s.lock() else { break };
                state.observations.push(Observation::ConsoleError { text });
            }
        });

        let s = Arc::clone(&state);
        let on_log = tokio::spawn(async move {
            while let Some(event) = log_entries.next().await {
                if event.entry.level != LogEntryLevel::Error {
                    continue;
                }
                let Ok(mut state) = s.lock() else { break };
                state.observations.push(Observation::ConsoleError {
                    text: event.entry.text.clone(),
                });
            }
        });

        Ok(Self {
            page,
            state,
            listeners: vec![on_response, on_console, on_log],
            download_dir,
        })
    }

    async fn eval<T: DeserializeOwned>(&self, call: String) -> Result<T, PageError> {
        let script = format!("(() => {{\n{DOM_HELPERS}\nreturn {call};\n}})()");
        self.page
            .evaluate(script)
            .await
            .map_err(|e| PageError::Script(e.to_string()))?
            .into_value()
            .map_err(|e| PageError::Script(format!("unexpected script result: {e:?}")))
    }

    async fn wait_for_network_idle(&self) {
        loop {
            let quiet_for = self
                .state
                .lock()
                .map(|s| s.last_activity.elapsed())
                .unwrap_or(NETWORK_QUIET);
            if quiet_for >= NETWORK_QUIET {
                return;
            }
            tokio::time::sleep(NETWORK_QUIET - quiet_for).await;
        }
    }

    async fn click(&self, target: &ClickTarget) -> Result<(), PageError> {
        let clicked: bool = self
            .eval(format!(
                "clickTarget({}, {}, {})",
                locator_spec(&target.locator),
                target.index,
                target.parent
            ))
            .await?;
        if clicked {
            Ok(())
        } else {
            Err(PageError::NotFound(target.locator.to_string()))
        }
    }
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn goto(
        &mut self,
        url: &str,
        options: &LoadOptions,
    ) -> Result<NavigationInfo, NavigationError> {
        if let Ok(mut state) = self.state.lock() {
            state.main_status = None;
            state.last_activity = Instant::now();
        }
        let start = Instant::now();
        let navigation = async {
            self.page
                .goto(url)
                .await
                .map_err(|e| NavigationError::from_message(url, &e.to_string()))?;
            if options.policy == LoadPolicy::NetworkIdle {
                self.wait_for_network_idle().await;
            }
            Ok::<(), NavigationError>(())
        };
        match tokio::time::timeout(Duration::from_millis(options.timeout_ms), navigation).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(NavigationError::Timeout {
                    url: url.to_string(),
                    timeout_ms: options.timeout_ms,
                })
            }
        }

        let final_url = self
            .page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());
        let status = self
            .state
            .lock()
            .ok()
            .and_then(|s| s.main_status)
            .unwrap_or(200);
        Ok(NavigationInfo {
            requested_url: url.to_string(),
            final_url,
            status,
            load_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn current_url(&self) -> Result<String, PageError> {
        Ok(self
            .page
            .url()
            .await
            .map_err(|e| PageError::Browser(e.to_string()))?
            .unwrap_or_default())
    }

    async fn title(&self) -> Result<String, PageError> {
        self.eval("document.title || ''".to_string()).await
    }

    async fn body_text(&self) -> Result<String, PageError> {
        self.eval("document.body ? document.body.innerText : ''".to_string())
            .await
    }

    async fn query(&self, locator: &Locator) -> Result<Vec<ElementInfo>, PageError> {
        locator.regex()?;
        self.eval(format!(
            "resolve(document, {}).map(describe)",
            locator_spec(locator)
        ))
        .await
    }

    async fn query_within(
        &self,
        scope: &Locator,
        ancestors: usize,
        child: &Locator,
    ) -> Result<Vec<Vec<ElementInfo>>, PageError> {
        scope.regex()?;
        child.regex()?;
        self.eval(format!(
            "queryWithin({}, {ancestors}, {})",
            locator_spec(scope),
            locator_spec(child)
        ))
        .await
    }

    async fn wait_for_visible(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<(), PageError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.query(locator).await?.iter().any(|e| e.visible) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(PageError::Timeout {
                    operation: format!("waiting for {locator}"),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn hover(&self, x: f64, y: f64) -> Result<(), PageError> {
        self.page
            .move_mouse(Point { x, y })
            .await
            .map_err(|e| PageError::Browser(e.to_string()))?;
        Ok(())
    }

    async fn download(
        &self,
        target: &ClickTarget,
        timeout: Duration,
    ) -> Result<DownloadedFile, PageError> {
        let browser_err = |e: chromiumoxide::error::CdpError| PageError::Browser(e.to_string());
        let begins = self
            .page
            .event_listener::<EventDownloadWillBegin>()
            .await
            .map_err(browser_err)?;
        let progress = self
            .page
            .event_listener::<EventDownloadProgress>()
            .await
            .map_err(browser_err)?;

        self.click(target).await?;

        let (guid, suggested_name) =
            tokio::time::timeout(timeout, await_download(begins, progress))
                .await
                .map_err(|_| PageError::DownloadTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                })??;

        let path = self.download_dir.join(&guid);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| PageError::Browser(format!("cannot read {}: {e}", path.display())))?;
        let _ = tokio::fs::remove_file(&path).await;
        Ok(DownloadedFile {
            suggested_name,
            contents,
        })
    }

    async fn settle(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn observations(&self) -> Vec<Observation> {
        self.state
            .lock()
            .map(|s| s.observations.clone())
            .unwrap_or_default()
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
    }
}

/// Wait for the first completed download; returns its guid and suggested name.
async fn await_download(
    mut begins: EventStream<EventDownloadWillBegin>,
    mut progress: EventStream<EventDownloadProgress>,
) -> Result<(String, Option<String>), PageError> {
    let mut suggested_name = None;
    loop {
        tokio::select! {
            Some(begin) = begins.next() => {
                suggested_name = Some(begin.suggested_filename.clone());
            }
            Some(update) = progress.next() => match update.state {
                DownloadProgressState::Completed => {
                    return Ok((update.guid.clone(), suggested_name));
                }
                DownloadProgressState::Canceled => {
                    return Err(PageError::Browser("download was canceled".into()));
                }
                _ => {}
            },
            else => return Err(PageError::Browser("download events stopped".into())),
        }
    }
}

/// JSON description of a locator for the in-page helpers.
fn locator_spec(locator: &Locator) -> serde_json::Value {
    match locator {
        Locator::Css(selector) => json!({ "kind": "css", "value": selector }),
        Locator::Text(text) => json!({ "kind": "text", "value": text }),
        Locator::TextRegex {
            pattern,
            ignore_case,
        } => json!({
            "kind": "regex",
            "pattern": pattern,
            "flags": if *ignore_case { "i" } else { "" },
        }),
    }
}

/// In-page helpers shared by every query. Text locators resolve to the
/// innermost element whose text matches; bounds are viewport coordinates.
const DOM_HELPERS: &str = r#"
const SKIP = ['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE', 'HEAD'];
const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
const textOf = (el) => norm(el.textContent);
const isVisible = (el) => {
    if (!el.isConnected) return false;
    const style = getComputedStyle(el);
    if (style.display === 'none' || style.visibility === 'hidden') return false;
    const r = el.getBoundingClientRect();
    return r.width > 0 && r.height > 0;
};
const isClickable = (el) => !!el && el.nodeType === 1 && (
    el.tagName === 'A' || el.tagName === 'BUTTON' || el.onclick !== null ||
    el.getAttribute('role') === 'button' || el.classList.contains('cursor-pointer') ||
    getComputedStyle(el).cursor === 'pointer'
);
const matcher = (spec) => {
    if (spec.kind === 'text') {
        const needle = spec.value.toLowerCase();
        return (t) => t.toLowerCase().includes(needle);
    }
    const re = new RegExp(spec.pattern, spec.flags);
    return (t) => re.test(t);
};
const resolve = (root, spec) => {
    if (spec.kind === 'css') return Array.from(root.querySelectorAll(spec.value));
    const m = matcher(spec);
    return Array.from(root.querySelectorAll('*'))
        .filter((el) => !SKIP.includes(el.tagName))
        .filter((el) => m(textOf(el)))
        .filter((el) => !Array.from(el.children).some((c) => m(textOf(c))));
};
const describe = (el) => {
    const parent = el.parentElement;
    const r = el.getBoundingClientRect();
    return {
        text: textOf(el),
        visible: isVisible(el),
        clickable: isClickable(el),
        parent_text: parent ? textOf(parent) : null,
        parent_clickable: isClickable(parent),
        href: el.getAttribute('href'),
        bounds: { x: r.x, y: r.y, width: r.width, height: r.height },
    };
};
const queryWithin = (scope, depth, child) => resolve(document, scope).map((el) => {
    let anchor = el;
    for (let i = 0; i < depth && anchor.parentElement; i++) anchor = anchor.parentElement;
    return resolve(anchor, child).map(describe);
});
const clickTarget = (spec, index, parent) => {
    let el = resolve(document, spec)[index];
    if (el && parent) el = el.parentElement;
    if (!el) return false;
    el.scrollIntoView({ block: 'center' });
    el.click();
    return true;
};
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playwright_cache_prefers_newest_revision() {
        let cache = tempfile::tempdir().unwrap();
        for (dir, rel) in [
            ("chromium-1105", "chrome-linux/chrome"),
            ("chromium-1140", "chrome-linux/chrome"),
            ("chromium_headless_shell-1200", "chrome-linux/headless_shell"),
            ("chromium-1300", "README"),
        ] {
            let binary = cache.path().join(dir).join(rel);
            std::fs::create_dir_all(binary.parent().unwrap()).unwrap();
            std::fs::write(&binary, b"").unwrap();
        }
        assert_eq!(
            playwright_chromium(cache.path()),
            Some(cache.path().join("chromium-1140/chrome-linux/chrome"))
        );
    }

    #[test]
    fn test_playwright_cache_missing() {
        let cache = tempfile::tempdir().unwrap();
        assert_eq!(playwright_chromium(&cache.path().join("nope")), None);
    }

    #[test]
    fn test_locator_spec_shapes() {
        assert_eq!(
            locator_spec(&Locator::parse(".bd-data")),
            json!({"kind": "css", "value": ".bd-data"})
        );
        assert_eq!(
            locator_spec(&Locator::parse("text=/gwei/i")),
            json!({"kind": "regex", "pattern": "gwei", "flags": "i"})
        );
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_open_query_and_close() {
        let renderer = ChromiumRenderer::new().expect("chromium not found");
        let mut session = renderer
            .launch(&ClientIdentity::default())
            .await
            .expect("failed to launch");

        let options = LoadOptions {
            policy: LoadPolicy::DomContentLoaded,
            timeout_ms: 10_000,
        };
        let fetched = session
            .open(
                "data:text/html,<div class='big-data'><div class='bd-title'>avg gas price</div><div class='bd-data'>26,065,600,000wei</div></div>",
                &options,
            )
            .await
            .expect("navigation failed");
        assert!(fetched.navigation.load_time_ms < 10_000);

        let values = fetched
            .page
            .query(&Locator::parse(".bd-data"))
            .await
            .expect("query failed");
        assert_eq!(values[0].text, "26,065,600,000wei");
        assert!(values[0].visible);

        let body = fetched.page.body_text().await.expect("body text failed");
        assert!(body.contains("avg gas price"));

        drop(fetched);
        session.close().await.expect("close failed");
    }
}
