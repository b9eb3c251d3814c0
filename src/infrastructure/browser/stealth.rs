//! Fingerprint randomization and automation-marker suppression

use crate::infrastructure::config::BrowserSettings;

pub const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.0.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

pub const VIEWPORTS: [(u32, u32); 4] = [(1920, 1080), (1366, 768), (1536, 864), (1440, 900)];

/// Chromium flags applied to every launch
pub const LAUNCH_ARGS: [&str; 6] = [
    "--disable-blink-features=AutomationControlled",
    "--disable-dev-shm-usage",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-features=IsolateOrigins,site-per-process",
    "--disable-infobars",
];

/// Runs before any page script on every new document
pub const STEALTH_SCRIPT: &str = r"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.chrome = window.chrome || { runtime: {} };
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
Object.defineProperty(navigator, 'languages', { get: () => ['fr-FR', 'fr', 'en-US', 'en'] });
const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
if (originalQuery) {
  window.navigator.permissions.query = (parameters) =>
    parameters.name === 'notifications'
      ? Promise.resolve({ state: Notification.permission })
      : originalQuery(parameters);
}
";

/// One randomized identity for a browser context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintProfile {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub locale: String,
    pub timezone: String,
    pub accept_language: String,
}

impl FingerprintProfile {
    /// Random user agent and viewport; locale and timezone stay on the target market
    pub fn random(settings: &BrowserSettings) -> Self {
        let user_agent = USER_AGENTS[fastrand::usize(..USER_AGENTS.len())];
        let viewport = VIEWPORTS[fastrand::usize(..VIEWPORTS.len())];
        Self {
            user_agent: user_agent.to_string(),
            viewport,
            locale: settings.locale.clone(),
            timezone: settings.timezone.clone(),
            accept_language: settings.accept_language.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_draw_from_the_pools() {
        let settings = BrowserSettings::default();
        for _ in 0..50 {
            let profile = FingerprintProfile::random(&settings);
            assert!(USER_AGENTS.contains(&profile.user_agent.as_str()));
            assert!(VIEWPORTS.contains(&profile.viewport));
            assert_eq!(profile.locale, "fr-FR");
            assert_eq!(profile.timezone, "Europe/Paris");
        }
    }

    #[test]
    fn stealth_script_hides_webdriver() {
        assert!(STEALTH_SCRIPT.contains("'webdriver'"));
        assert!(LAUNCH_ARGS.contains(&"--disable-blink-features=AutomationControlled"));
    }
}
