//! Error taxonomy for the extraction core.
//!
//! Only navigation failures are fatal to a target run. Everything a strategy
//! raises is a [`PageError`], which the fallback chain downgrades to a miss.

use crate::types::BlockVerdict;

/// Failure of the initial (or a hop) navigation.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum NavigationError {
    #[error("navigation to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("DNS resolution failed for {url}: {detail}")]
    Dns { url: String, detail: String },

    #[error("TLS handshake failed for {url}: {detail}")]
    Tls { url: String, detail: String },

    #[error("navigation to {url} failed: {detail}")]
    Failed { url: String, detail: String },
}

impl NavigationError {
    /// Classify a raw browser/network error message for `url`.
    ///
    /// Chromium reports network failures as `net::ERR_*` codes inside the
    /// message, so the code decides the variant.
    pub fn from_message(url: &str, message: &str) -> Self {
        let upper = message.to_uppercase();
        let url = url.to_string();
        let detail = message.to_string();
        if upper.contains("ERR_NAME_NOT_RESOLVED") || upper.contains("ERR_NAME_RESOLUTION") {
            Self::Dns { url, detail }
        } else if upper.contains("ERR_CERT")
            || upper.contains("ERR_SSL")
            || upper.contains("CERTIFICATE")
        {
            Self::Tls { url, detail }
        } else {
            Self::Failed { url, detail }
        }
    }

    /// The URL that failed to load.
    pub fn url(&self) -> &str {
        match self {
            Self::Timeout { url, .. }
            | Self::Dns { url, .. }
            | Self::Tls { url, .. }
            | Self::Failed { url, .. } => url,
        }
    }
}

/// Errors raised by a [`crate::page::PageHandle`] operation.
#[derive(thiserror::Error, Debug)]
pub enum PageError {
    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("download did not complete within {timeout_ms}ms")]
    DownloadTimeout { timeout_ms: u64 },

    #[error("no element matches {0}")]
    NotFound(String),

    #[error("invalid locator {locator}: {detail}")]
    InvalidLocator { locator: String, detail: String },

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("operation not supported by this page: {0}")]
    Unsupported(&'static str),
}

/// Errors raised while loading target configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid target configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("target {target}: {detail}")]
    Invalid { target: String, detail: String },

    #[error("unknown target: {0}")]
    UnknownTarget(String),
}

/// Target-level failures surfaced to the orchestrator.
#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error("access blocked: {}", .0.reasons.join("; "))]
    Blocked(BlockVerdict),

    #[error(transparent)]
    Page(#[from] PageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_error_classification() {
        let url = "https://example.com";
        assert!(matches!(
            NavigationError::from_message(url, "net::ERR_NAME_NOT_RESOLVED"),
            NavigationError::Dns { .. }
        ));
        assert!(matches!(
            NavigationError::from_message(url, "net::ERR_CERT_AUTHORITY_INVALID"),
            NavigationError::Tls { .. }
        ));
        assert!(matches!(
            NavigationError::from_message(url, "net::ERR_CONNECTION_REFUSED"),
            NavigationError::Failed { .. }
        ));
        assert_eq!(
            NavigationError::from_message(url, "boom").url(),
            "https://example.com"
        );
    }

    #[test]
    fn test_blocked_error_lists_reasons() {
        let verdict = BlockVerdict {
            blocked: true,
            reasons: vec!["forbidden (HTTP 403)".into(), "text signature: captcha".into()],
            warnings: Vec::new(),
        };
        let msg = ScrapeError::Blocked(verdict).to_string();
        assert_eq!(
            msg,
            "access blocked: forbidden (HTTP 403); text signature: captcha"
        );
    }
}
