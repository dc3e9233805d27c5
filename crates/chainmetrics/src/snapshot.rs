//! Static HTML implementation of [`PageHandle`].
//!
//! Backs offline replay of saved pages and every strategy test. Rendering is
//! approximated from markup alone:
//!
//! - an element is hidden when it or an ancestor carries `hidden`,
//!   `display:none` / `visibility:hidden` in its inline style, or sits inside
//!   `<head>`, `<script>`, `<style>`, `<noscript>` or `<template>`;
//! - an element is clickable when it is an anchor or button, has an
//!   `onclick` handler, `role="button"`, or a pointer cursor;
//! - bounds come from an optional `data-box="x,y,width,height"` attribute,
//!   since static markup has no layout.
//!
//! `scraper` types are `!Send`, so every DOM walk happens in a synchronous
//! helper and the async trait methods only call into those.

use crate::config::LoadOptions;
use crate::error::{NavigationError, PageError};
use crate::page::{
    normalize_whitespace, ClickTarget, DownloadedFile, ElementInfo, Locator, NavigationInfo,
    Observation, PageHandle, Rect,
};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

const NON_RENDERED: &[&str] = &["head", "script", "style", "noscript", "template"];

/// Text revealed once the pointer hovers at or right of `min_x`.
#[derive(Debug, Clone)]
struct HoverReveal {
    min_x: f64,
    text: String,
}

/// A page backed by a fixed HTML document.
#[derive(Debug)]
pub struct SnapshotPage {
    url: String,
    html: String,
    status: u16,
    observations: Vec<Observation>,
    reveals: Vec<HoverReveal>,
    download: Option<DownloadedFile>,
    linked: HashMap<String, String>,
    linked_observations: HashMap<String, Vec<Observation>>,
    pointer: Mutex<Option<(f64, f64)>>,
}

impl SnapshotPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
            status: 200,
            observations: Vec::new(),
            reveals: Vec::new(),
            download: None,
            linked: HashMap::new(),
            linked_observations: HashMap::new(),
            pointer: Mutex::new(None),
        }
    }

    /// HTTP status reported for the main document.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_observation(mut self, observation: Observation) -> Self {
        self.observations.push(observation);
        self
    }

    /// Append `text` as a tooltip once the pointer reaches `min_x`.
    pub fn with_hover_reveal(mut self, min_x: f64, text: impl Into<String>) -> Self {
        self.reveals.push(HoverReveal {
            min_x,
            text: text.into(),
        });
        self
    }

    /// File served when a clickable element is clicked for a download.
    pub fn with_download(mut self, name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.download = Some(DownloadedFile {
            suggested_name: Some(name.into()),
            contents: contents.into(),
        });
        self
    }

    /// Another document reachable through [`PageHandle::goto`].
    pub fn with_linked_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.linked.insert(url.into(), html.into());
        self
    }

    /// Observation recorded each time `url` is loaded through
    /// [`PageHandle::goto`].
    pub fn with_linked_observation(mut self, url: impl Into<String>, observation: Observation) -> Self {
        self.linked_observations
            .entry(url.into())
            .or_default()
            .push(observation);
        self
    }

    /// Navigation metadata for the currently loaded document.
    pub fn navigation_info(&self) -> NavigationInfo {
        NavigationInfo {
            requested_url: self.url.clone(),
            final_url: self.url.clone(),
            status: self.status,
            load_time_ms: 0,
        }
    }

    /// Document as currently "rendered", including revealed tooltips.
    fn rendered_html(&self) -> String {
        let pointer = self.pointer.lock().ok().and_then(|p| *p);
        let revealed: Vec<&HoverReveal> = match pointer {
            Some((x, _)) => self.reveals.iter().filter(|r| x >= r.min_x).collect(),
            None => Vec::new(),
        };
        if revealed.is_empty() {
            return self.html.clone();
        }
        let tooltips: String = revealed
            .iter()
            .map(|r| format!("<div class=\"snapshot-tooltip\">{}</div>", r.text))
            .collect();
        match self.html.rfind("</body>") {
            Some(pos) => format!("{}{}{}", &self.html[..pos], tooltips, &self.html[pos..]),
            None => format!("{}{}", self.html, tooltips),
        }
    }

    fn query_sync(&self, locator: &Locator) -> Result<Vec<ElementInfo>, PageError> {
        let document = Html::parse_document(&self.rendered_html());
        let root = document.root_element();
        Ok(resolve(root, locator)?.into_iter().map(describe).collect())
    }

    fn query_within_sync(
        &self,
        scope: &Locator,
        ancestors: usize,
        child: &Locator,
    ) -> Result<Vec<Vec<ElementInfo>>, PageError> {
        let document = Html::parse_document(&self.rendered_html());
        let root = document.root_element();
        resolve(root, scope)?
            .into_iter()
            .map(|el| {
                let mut anchor = el;
                for _ in 0..ancestors {
                    match anchor.parent().and_then(ElementRef::wrap) {
                        Some(parent) => anchor = parent,
                        None => break,
                    }
                }
                Ok(resolve(anchor, child)?.into_iter().map(describe).collect())
            })
            .collect()
    }

    fn title_sync(&self) -> String {
        let document = Html::parse_document(&self.html);
        Selector::parse("title")
            .ok()
            .and_then(|sel| document.select(&sel).next().map(raw_text))
            .unwrap_or_default()
    }

    fn body_text_sync(&self) -> String {
        let document = Html::parse_document(&self.rendered_html());
        Selector::parse("body")
            .ok()
            .and_then(|sel| document.select(&sel).next().map(rendered_text))
            .unwrap_or_default()
    }
}

#[async_trait]
impl PageHandle for SnapshotPage {
    async fn goto(
        &mut self,
        url: &str,
        _options: &LoadOptions,
    ) -> Result<NavigationInfo, NavigationError> {
        let html = self
            .linked
            .get(url)
            .cloned()
            .ok_or_else(|| NavigationError::Failed {
                url: url.to_string(),
                detail: "no snapshot recorded for this url".into(),
            })?;
        self.url = url.to_string();
        self.html = html;
        if let Some(seen) = self.linked_observations.get(url) {
            self.observations.extend(seen.iter().cloned());
        }
        if let Ok(mut pointer) = self.pointer.lock() {
            *pointer = None;
        }
        Ok(self.navigation_info())
    }

    async fn current_url(&self) -> Result<String, PageError> {
        Ok(self.url.clone())
    }

    async fn title(&self) -> Result<String, PageError> {
        Ok(self.title_sync())
    }

    async fn body_text(&self) -> Result<String, PageError> {
        Ok(self.body_text_sync())
    }

    async fn query(&self, locator: &Locator) -> Result<Vec<ElementInfo>, PageError> {
        self.query_sync(locator)
    }

    async fn query_within(
        &self,
        scope: &Locator,
        ancestors: usize,
        child: &Locator,
    ) -> Result<Vec<Vec<ElementInfo>>, PageError> {
        self.query_within_sync(scope, ancestors, child)
    }

    async fn wait_for_visible(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<(), PageError> {
        if self.query_sync(locator)?.iter().any(|e| e.visible) {
            Ok(())
        } else {
            Err(PageError::Timeout {
                operation: format!("waiting for {locator}"),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }

    async fn hover(&self, x: f64, y: f64) -> Result<(), PageError> {
        if let Ok(mut pointer) = self.pointer.lock() {
            *pointer = Some((x, y));
        }
        Ok(())
    }

    async fn download(
        &self,
        target: &ClickTarget,
        timeout: Duration,
    ) -> Result<DownloadedFile, PageError> {
        let matches = self.query_sync(&target.locator)?;
        let element = matches
            .get(target.index)
            .ok_or_else(|| PageError::NotFound(target.locator.to_string()))?;
        let clickable = if target.parent {
            element.parent_clickable
        } else {
            element.clickable
        };
        match (&self.download, clickable) {
            (Some(file), true) => Ok(file.clone()),
            _ => Err(PageError::DownloadTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    fn observations(&self) -> Vec<Observation> {
        self.observations.clone()
    }
}

/// Elements under `root` matching `locator`, in document order.
fn resolve<'a>(root: ElementRef<'a>, locator: &Locator) -> Result<Vec<ElementRef<'a>>, PageError> {
    match locator {
        Locator::Css(css) => {
            let selector = Selector::parse(css).map_err(|e| PageError::InvalidLocator {
                locator: css.clone(),
                detail: e.to_string(),
            })?;
            Ok(root.select(&selector).collect())
        }
        Locator::Text(_) | Locator::TextRegex { .. } => {
            // Fail early on a bad pattern instead of matching nothing.
            locator.regex()?;
            Ok(root
                .descendants()
                .filter_map(ElementRef::wrap)
                .filter(|el| !NON_RENDERED.contains(&el.value().name()))
                .filter(|el| locator.matches_text(&rendered_text(*el)))
                .filter(|el| {
                    !el.children()
                        .filter_map(ElementRef::wrap)
                        .any(|child| locator.matches_text(&rendered_text(child)))
                })
                .collect())
        }
    }
}

fn describe(el: ElementRef<'_>) -> ElementInfo {
    let parent = el.parent().and_then(ElementRef::wrap);
    ElementInfo {
        text: rendered_text(el),
        visible: is_visible(el),
        clickable: is_clickable(el),
        parent_text: parent.map(rendered_text),
        parent_clickable: parent.map(is_clickable).unwrap_or(false),
        href: el.value().attr("href").map(String::from),
        bounds: el.value().attr("data-box").and_then(parse_box),
    }
}

/// Text of an element without script/style contents, whitespace-collapsed.
fn rendered_text(el: ElementRef<'_>) -> String {
    let parts: Vec<&str> = el
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let skipped = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .map(|e| NON_RENDERED[1..].contains(&e.name()))
                    .unwrap_or(false)
            });
            (!skipped).then_some(&**text)
        })
        .collect();
    normalize_whitespace(&parts.join(" "))
}

/// Text including non-rendered containers; used for `<title>`.
fn raw_text(el: ElementRef<'_>) -> String {
    normalize_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn is_visible(el: ElementRef<'_>) -> bool {
    let mut current = Some(el);
    while let Some(node) = current {
        let value = node.value();
        if NON_RENDERED.contains(&value.name()) || value.attr("hidden").is_some() {
            return false;
        }
        if let Some(style) = value.attr("style") {
            let style: String = style.chars().filter(|c| !c.is_whitespace()).collect();
            let style = style.to_lowercase();
            if style.contains("display:none") || style.contains("visibility:hidden") {
                return false;
            }
        }
        current = node.parent().and_then(ElementRef::wrap);
    }
    true
}

fn is_clickable(el: ElementRef<'_>) -> bool {
    let value = el.value();
    let style: String = value
        .attr("style")
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    matches!(value.name(), "a" | "button")
        || value.attr("onclick").is_some()
        || value.attr("role") == Some("button")
        || value.classes().any(|c| c == "cursor-pointer")
        || style.to_lowercase().contains("cursor:pointer")
}

fn parse_box(raw: &str) -> Option<Rect> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [x, y, width, height] => Some(Rect {
            x: *x,
            y: *y,
            width: *width,
            height: *height,
        }),
        _ => None,
    }
}
