//! Page fetcher: opens a target's entry page inside a browser session.

use crate::renderer::{BrowserSession, FetchResult};
use chainmetrics::{NavigationError, TargetConfig};
use tracing::{info, warn};

/// Navigate `session` to the target's entry URL with its load policy.
pub async fn fetch(
    session: &mut dyn BrowserSession,
    target: &TargetConfig,
) -> Result<FetchResult, NavigationError> {
    let options = target.load_options();
    info!(
        site = %target.name,
        url = %target.url,
        policy = ?options.policy,
        timeout_ms = options.timeout_ms,
        "navigating"
    );
    match session.open(&target.url, &options).await {
        Ok(fetched) => {
            info!(
                site = %target.name,
                status = fetched.navigation.status,
                final_url = %fetched.navigation.final_url,
                load_ms = fetched.navigation.load_time_ms,
                "page loaded"
            );
            Ok(fetched)
        }
        Err(e) => {
            warn!(site = %target.name, error = %e, "navigation failed");
            Err(e)
        }
    }
}
