//! Browser collaborator interface.
//!
//! The extraction core never talks to a browser engine directly. It drives a
//! [`PageHandle`], which the runtime implements on top of Chromium and which
//! [`crate::snapshot::SnapshotPage`] implements over static HTML for offline
//! replay and tests.

use crate::config::LoadOptions;
use crate::error::{NavigationError, PageError};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How to find elements on a page.
///
/// Parsed from strings: `text=/pattern/i` is a text regex, `text=Fee` is a
/// case-insensitive substring match on the innermost element holding the
/// text, anything else is a CSS selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    Text(String),
    TextRegex { pattern: String, ignore_case: bool },
}

impl Locator {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.strip_prefix("text=") {
            Some(rest) if rest.len() >= 2 && rest.starts_with('/') => {
                let body = &rest[1..];
                match body.rfind('/') {
                    Some(end) => Self::TextRegex {
                        pattern: body[..end].to_string(),
                        ignore_case: body[end + 1..].contains('i'),
                    },
                    None => Self::Text(rest.to_string()),
                }
            }
            Some(rest) => Self::Text(rest.trim().to_string()),
            None => Self::Css(raw.to_string()),
        }
    }

    /// Compiled regex for [`Locator::TextRegex`].
    pub fn regex(&self) -> Result<Option<Regex>, PageError> {
        match self {
            Self::TextRegex {
                pattern,
                ignore_case,
            } => RegexBuilder::new(pattern)
                .case_insensitive(*ignore_case)
                .build()
                .map(Some)
                .map_err(|e| PageError::InvalidLocator {
                    locator: self.to_string(),
                    detail: e.to_string(),
                }),
            _ => Ok(None),
        }
    }

    /// Whether `text` satisfies a text locator. CSS locators never match text.
    pub fn matches_text(&self, text: &str) -> bool {
        match self {
            Self::Css(_) => false,
            Self::Text(needle) => text.to_lowercase().contains(&needle.to_lowercase()),
            Self::TextRegex { .. } => self
                .regex()
                .ok()
                .flatten()
                .map(|re| re.is_match(text))
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(sel) => write!(f, "{sel}"),
            Self::Text(text) => write!(f, "text={text}"),
            Self::TextRegex {
                pattern,
                ignore_case,
            } => write!(f, "text=/{pattern}/{}", if *ignore_case { "i" } else { "" }),
        }
    }
}

/// Element box in CSS pixels, viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Point at relative `(fx, fy)` inside the box.
    pub fn point_at(&self, fx: f64, fy: f64) -> (f64, f64) {
        (self.x + self.width * fx, self.y + self.height * fy)
    }
}

/// Snapshot of one matched element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementInfo {
    /// Rendered text, trimmed.
    pub text: String,
    pub visible: bool,
    /// Anchor, button, `onclick` handler or pointer cursor.
    pub clickable: bool,
    #[serde(default)]
    pub parent_text: Option<String>,
    #[serde(default)]
    pub parent_clickable: bool,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub bounds: Option<Rect>,
}

/// What to click to trigger a download.
#[derive(Debug, Clone, PartialEq)]
pub struct ClickTarget {
    pub locator: Locator,
    /// Index among the locator's matches.
    pub index: usize,
    /// Click the element's parent instead of the element.
    pub parent: bool,
}

/// A file produced by a triggered download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedFile {
    pub suggested_name: Option<String>,
    pub contents: String,
}

/// Something the browser saw outside the main document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    /// A subsidiary HTTP response.
    Response { url: String, status: u16 },
    /// A console message logged at error level.
    ConsoleError { text: String },
}

/// Metadata of a completed navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationInfo {
    pub requested_url: String,
    pub final_url: String,
    /// HTTP status of the main document.
    pub status: u16,
    pub load_time_ms: u64,
}

/// A loaded page, driven by the extraction core.
///
/// Implementations only report what the page shows; interpretation (ranges,
/// units, block signals) stays in the core.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigate this page to `url`.
    async fn goto(
        &mut self,
        url: &str,
        options: &LoadOptions,
    ) -> Result<NavigationInfo, NavigationError>;

    async fn current_url(&self) -> Result<String, PageError>;

    async fn title(&self) -> Result<String, PageError>;

    /// Full rendered text of `<body>`.
    async fn body_text(&self) -> Result<String, PageError>;

    /// All elements matching `locator`, in document order.
    async fn query(&self, locator: &Locator) -> Result<Vec<ElementInfo>, PageError>;

    /// For every `scope` match, climb `ancestors` parents and return the
    /// `child` matches beneath that element.
    async fn query_within(
        &self,
        scope: &Locator,
        ancestors: usize,
        child: &Locator,
    ) -> Result<Vec<Vec<ElementInfo>>, PageError>;

    /// Wait until at least one `locator` match is visible.
    async fn wait_for_visible(&self, locator: &Locator, timeout: Duration)
        -> Result<(), PageError>;

    /// Move the pointer to a viewport coordinate.
    async fn hover(&self, _x: f64, _y: f64) -> Result<(), PageError> {
        Err(PageError::Unsupported("hover"))
    }

    /// Click `target` and wait for the download it triggers.
    async fn download(
        &self,
        _target: &ClickTarget,
        _timeout: Duration,
    ) -> Result<DownloadedFile, PageError> {
        Err(PageError::Unsupported("download"))
    }

    /// Let the page render for `duration` (tooltips, animations).
    async fn settle(&self, _duration: Duration) {}

    /// Subsidiary responses and console errors seen so far.
    fn observations(&self) -> Vec<Observation> {
        Vec::new()
    }
}

/// Visible matches of `locator`.
pub async fn visible(
    page: &dyn PageHandle,
    locator: &Locator,
) -> Result<Vec<ElementInfo>, PageError> {
    Ok(page
        .query(locator)
        .await?
        .into_iter()
        .filter(|e| e.visible)
        .collect())
}

/// Collapse runs of whitespace and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
