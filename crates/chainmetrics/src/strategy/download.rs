//! CSV export download and parsing.

use super::{Candidate, Strategy};
use crate::config::{MetricSpec, PlausibleRange};
use crate::error::PageError;
use crate::normalize::parse_decimal;
use crate::page::{ClickTarget, Locator, PageHandle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::mem::take;
use std::time::Duration;
use tracing::debug;

/// Trigger a chart's data export and read the latest row of the file.
///
/// The export affordance is found by trying `triggers` in order and taking
/// the first visible match that is clickable itself or has a clickable
/// parent. When none qualifies, any `fallback` element whose text contains
/// `fallback_contains` is clicked directly.
///
/// The file must have a header line and at least one data row. The last row
/// is the most recent; its first numeric column (from column 1) inside the
/// range is the value and column 0 is the observation tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Download {
    #[serde(default = "default_triggers")]
    pub triggers: Vec<String>,
    #[serde(default = "default_fallback")]
    pub fallback: String,
    #[serde(default = "default_fallback_contains")]
    pub fallback_contains: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Unit appended to the raw reading, e.g. `GWei`.
    #[serde(default)]
    pub unit_label: Option<String>,
}

impl Download {
    async fn find_target(&self, page: &dyn PageHandle) -> Option<ClickTarget> {
        for raw in &self.triggers {
            let locator = Locator::parse(raw);
            let matches = match page.query(&locator).await {
                Ok(m) => m,
                Err(e) => {
                    debug!(trigger = %raw, error = %e, "download trigger query failed");
                    continue;
                }
            };
            for (index, element) in matches.iter().enumerate().filter(|(_, e)| e.visible) {
                if element.clickable || element.parent_clickable {
                    return Some(ClickTarget {
                        locator,
                        index,
                        parent: !element.clickable,
                    });
                }
            }
        }

        let locator = Locator::parse(&self.fallback);
        let needle = self.fallback_contains.to_lowercase();
        let matches = page.query(&locator).await.ok()?;
        let index = matches
            .iter()
            .position(|e| e.text.to_lowercase().contains(&needle))?;
        Some(ClickTarget {
            locator,
            index,
            parent: false,
        })
    }
}

#[async_trait]
impl Strategy for Download {
    fn name(&self) -> &'static str {
        "download"
    }

    async fn attempt(
        &self,
        page: &dyn PageHandle,
        metric: &MetricSpec,
    ) -> Result<Option<Candidate>, PageError> {
        let Some(target) = self.find_target(page).await else {
            debug!(metric = %metric.name, "no download affordance found");
            return Ok(None);
        };
        debug!(
            trigger = %target.locator,
            index = target.index,
            parent = target.parent,
            "triggering download"
        );
        let file = page
            .download(&target, Duration::from_millis(self.timeout_ms))
            .await?;
        debug!(
            file = ?file.suggested_name,
            bytes = file.contents.len(),
            "download complete"
        );
        Ok(latest_row_value(
            &file.contents,
            self.delimiter,
            &metric.range,
            self.unit_label.as_deref(),
        ))
    }
}

/// Value of the last data row of a delimited file with a header line.
pub(crate) fn latest_row_value(
    contents: &str,
    delimiter: char,
    range: &PlausibleRange,
    unit_label: Option<&str>,
) -> Option<Candidate> {
    let rows = parse_rows(contents, delimiter);
    if rows.len() < 2 {
        return None;
    }
    let last = rows.last()?;
    let (cell, value) = last
        .iter()
        .skip(1)
        .map(|cell| cell.trim())
        .find_map(|cell| parse_decimal(cell).filter(|v| range.contains(*v)).map(|v| (cell, v)))?;

    let tag = last.first().map(|c| c.trim()).filter(|c| !c.is_empty());
    let mut raw = match unit_label {
        Some(label) => format!("{cell} {label}"),
        None => cell.to_string(),
    };
    if let Some(tag) = tag {
        raw = format!("{raw} ({tag})");
    }
    Some(Candidate {
        value,
        raw,
        source: None,
        observed_at: tag.map(String::from),
    })
}

/// Split delimited text into rows. Handles quoted fields with `""` escapes
/// and CRLF line endings; blank lines are dropped.
pub fn parse_rows(text: &str, sep: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut field = String::new();
    let mut row = Vec::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes && matches!(chars.peek(), Some('"')) {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = !in_quotes;
                }
            }
            c if c == sep && !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                row.push(take(&mut field));
                finish_row(&mut row, &mut rows);
            }
            _ => field.push(ch),
        }
    }

    // Unterminated quotes still flush.
    row.push(field);
    finish_row(&mut row, &mut rows);
    rows
}

fn finish_row(row: &mut Vec<String>, rows: &mut Vec<Vec<String>>) {
    if row.len() == 1 && row[0].trim().is_empty() {
        row.clear();
    } else {
        rows.push(take(row));
    }
}

fn default_triggers() -> Vec<String> {
    [
        "text=CSV Data",
        "text=Download",
        "svg[class*=\"iconify\"]",
        "[class*=\"download\"]",
        "a[href*=\"csv\"]",
        "button[class*=\"download\"]",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_fallback() -> String {
    ".cursor-pointer".into()
}

fn default_fallback_contains() -> String {
    "CSV".into()
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_delimiter() -> char {
    ','
}
