//! Block-access classifier.
//!
//! Decides whether a loaded page is the real content or a denial of
//! automated access (challenge page, CAPTCHA, rate limit). Signals are
//! checked in a fixed order and every hit is recorded, so the verdict
//! explains itself:
//!
//! 1. main-document HTTP status
//! 2. text signatures in the title and body
//! 3. visible challenge-wrapper markers
//! 4. subsidiary responses and console errors seen during the session
//!
//! The classifier never retries or navigates.

use crate::error::PageError;
use crate::page::{visible, Locator, Observation, PageHandle};
use crate::types::BlockVerdict;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Phrases that only appear on interstitial or challenge pages. Ordered from
/// most to least specific.
pub const TEXT_SIGNATURES: &[&str] = &[
    "checking your browser",
    "verify you are human",
    "verifying you are human",
    "just a moment",
    "are you a robot",
    "unusual traffic",
    "please enable javascript and cookies",
    "attention required",
    "cloudflare ray id",
    "ddos protection",
    "bot detection",
    "access denied",
    "recaptcha",
    "hcaptcha",
    "captcha",
];

/// Selectors of challenge wrappers injected by common bot-protection vendors.
pub const CHALLENGE_MARKERS: &[&str] = &[
    "#challenge-form",
    "#challenge-stage",
    "#cf-challenge-running",
    ".cf-browser-verification",
    "iframe[src*='captcha']",
    ".g-recaptcha",
    ".h-captcha",
    "#px-captcha",
];

/// Keywords that make a console error count as a blocking signal.
pub const CONSOLE_KEYWORDS: &[&str] = &[
    "captcha",
    "blocked",
    "forbidden",
    "rate limit",
    "rate limited",
    "too many requests",
    "challenge",
    "access denied",
    "bot",
];

/// Whole-word match of any [`CONSOLE_KEYWORDS`] entry, so "bottom" or
/// "robots.txt" do not count.
static CONSOLE_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives: Vec<String> = CONSOLE_KEYWORDS.iter().map(|kw| regex::escape(kw)).collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|")))
        .expect("console keyword regex is valid")
});

/// Everything the classifier looks at, gathered from one page.
#[derive(Debug, Clone, Default)]
pub struct BlockSignals {
    pub status: u16,
    pub title: String,
    pub body_text: String,
    /// Challenge markers that were found visible.
    pub visible_markers: Vec<String>,
    pub observations: Vec<Observation>,
}

/// Pure classification of already-collected signals.
pub fn classify(signals: &BlockSignals) -> BlockVerdict {
    let mut verdict = BlockVerdict::default();

    // ── Status ──
    match signals.status {
        403 => verdict.block("forbidden (HTTP 403)"),
        429 => verdict.block("rate limited (HTTP 429)"),
        s if s >= 500 => verdict.warn(format!("server error (HTTP {s})")),
        _ => {}
    }

    // ── Text signatures ──
    let title = signals.title.to_lowercase();
    let body = signals.body_text.to_lowercase();
    for phrase in TEXT_SIGNATURES {
        if title.contains(phrase) || body.contains(phrase) {
            verdict.block(format!("challenge text \"{phrase}\""));
        }
    }

    // ── Structural markers ──
    for marker in &signals.visible_markers {
        verdict.block(format!("challenge marker {marker} visible"));
    }

    // ── Network observations ──
    fold_observations(&mut verdict, &signals.observations);

    verdict
}

/// Add a reason to `verdict` for every blocking observation not already
/// recorded. The pipeline calls this again after extraction with the whole
/// session's observations.
pub fn fold_observations(verdict: &mut BlockVerdict, observations: &[Observation]) {
    for observation in observations {
        let reason = match observation {
            Observation::Response { url, status } if *status == 403 || *status == 429 => {
                Some(format!("subresource {url} returned HTTP {status}"))
            }
            Observation::ConsoleError { text } => CONSOLE_KEYWORD_RE.find(text).map(|kw| {
                format!(
                    "console error mentions \"{}\": {}",
                    kw.as_str().to_lowercase(),
                    truncate(text, 120)
                )
            }),
            Observation::Response { .. } => None,
        };
        if let Some(reason) = reason {
            if !verdict.reasons.contains(&reason) {
                verdict.block(reason);
            }
        }
    }
}

/// Collect signals from a loaded page and classify them.
pub async fn inspect(page: &dyn PageHandle, status: u16) -> Result<BlockVerdict, PageError> {
    let title = page.title().await?;
    let body_text = page.body_text().await?;

    let mut visible_markers = Vec::new();
    for marker in CHALLENGE_MARKERS {
        match visible(page, &Locator::Css((*marker).to_string())).await {
            Ok(hits) if !hits.is_empty() => visible_markers.push((*marker).to_string()),
            Ok(_) => {}
            Err(e) => debug!(marker, error = %e, "challenge marker query failed"),
        }
    }

    Ok(classify(&BlockSignals {
        status,
        title,
        body_text,
        visible_markers,
        observations: page.observations(),
    }))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}…")
    }
}
