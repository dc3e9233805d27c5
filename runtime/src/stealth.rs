//! Client identity and automation-fingerprint suppression.
//!
//! Explorer sites sit behind bot protection that flags stock headless
//! Chromium. Every session presents a regular desktop identity and hides
//! the usual automation markers before any page script runs.

/// What the browser claims to be.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientIdentity {
    pub user_agent: String,
    pub viewport: (u32, u32),
    /// BCP 47 locale, e.g. `en-US`.
    pub locale: String,
    /// IANA timezone, e.g. `UTC`.
    pub timezone: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
                .to_string(),
            viewport: (1366, 768),
            locale: "en-US".to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

impl ClientIdentity {
    /// Extra Chromium command-line flags for this identity.
    pub fn launch_args(&self) -> Vec<String> {
        vec![
            format!("--lang={}", self.locale),
            "--disable-blink-features=AutomationControlled".to_string(),
            format!("--user-agent={}", self.user_agent),
        ]
    }

    /// `Accept-Language` style list derived from the locale.
    pub fn languages(&self) -> Vec<String> {
        let mut langs = vec![self.locale.clone()];
        if let Some((base, _)) = self.locale.split_once('-') {
            langs.push(base.to_string());
        }
        langs
    }

    /// Script injected before any page script.
    pub fn stealth_script(&self) -> String {
        let languages =
            serde_json::to_string(&self.languages()).unwrap_or_else(|_| "[\"en-US\"]".into());
        STEALTH_TEMPLATE.replace("__LANGUAGES__", &languages)
    }
}

const STEALTH_TEMPLATE: &str = r#"
(() => {
    Object.defineProperty(Navigator.prototype, 'webdriver', { get: () => undefined });
    Object.defineProperty(Navigator.prototype, 'languages', { get: () => __LANGUAGES__ });
    Object.defineProperty(Navigator.prototype, 'plugins', {
        get: () => [
            { name: 'PDF Viewer', filename: 'internal-pdf-viewer' },
            { name: 'Chrome PDF Viewer', filename: 'internal-pdf-viewer' },
            { name: 'Chromium PDF Viewer', filename: 'internal-pdf-viewer' },
        ],
    });
    if (!window.chrome) {
        window.chrome = { runtime: {} };
    }
    const query = window.navigator.permissions && window.navigator.permissions.query;
    if (query) {
        window.navigator.permissions.query = (params) =>
            params && params.name === 'notifications'
                ? Promise.resolve({ state: Notification.permission })
                : query.call(window.navigator.permissions, params);
    }
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_identity_is_desktop_chrome() {
        let id = ClientIdentity::default();
        assert!(id.user_agent.contains("Chrome/124"));
        assert!(!id.user_agent.contains("Headless"));
        assert_eq!(id.viewport, (1366, 768));
    }

    #[test]
    fn test_launch_args_hide_automation() {
        let args = ClientIdentity::default().launch_args();
        assert!(args.contains(&"--disable-blink-features=AutomationControlled".to_string()));
        assert!(args.contains(&"--lang=en-US".to_string()));
    }

    #[test]
    fn test_stealth_script_fills_languages() {
        let script = ClientIdentity::default().stealth_script();
        assert!(script.contains(r#"["en-US","en"]"#));
        assert!(script.contains("webdriver"));
        assert!(!script.contains("__LANGUAGES__"));
    }
}
