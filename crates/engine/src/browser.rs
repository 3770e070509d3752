use std::ffi::OsString;
use std::sync::Arc;

use headless_chrome::{Browser, LaunchOptions, Tab};

use pa_core::CookieRecord;

/// Fixed desktop user-agent so the target cannot branch on automation fingerprints
/// (spec.md §4.H step 1).
const FIXED_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

pub struct EngineBrowser {
    browser: Browser,
}

impl EngineBrowser {
    /// Launch a headless context with a fixed UA and service workers disabled at the
    /// context level (spec.md §4.H step 1).
    pub fn launch() -> anyhow::Result<Self> {
        let mut extra_args: Vec<OsString> = vec![
            OsString::from("--no-sandbox"),
            OsString::from("--disable-dev-shm-usage"),
            OsString::from("--disable-gpu"),
            OsString::from("--disable-features=ServiceWorker"),
        ];

        let mut builder = headless_chrome::LaunchOptionsBuilder::default();
        builder
            .headless(true)
            .window_size(Some((1366, 900)))
            .args(extra_args.iter_mut().map(|a| a.as_ref()).collect());

        if let Ok(chrome_path) = std::env::var("CHROME_PATH") {
            builder.path(Some(std::path::PathBuf::from(chrome_path)));
        }

        let launch_options: LaunchOptions = builder.build()?;
        let browser = Browser::new(launch_options)?;
        Ok(Self { browser })
    }

    pub fn new_tab(&self) -> anyhow::Result<Arc<Tab>> {
        let tab = self.browser.new_tab()?;
        tab.set_user_agent(FIXED_USER_AGENT, None, None)?;
        Ok(tab)
    }

    pub fn cookies(&self, tab: &Arc<Tab>) -> anyhow::Result<Vec<CookieRecord>> {
        let cookies = tab.get_cookies()?;
        Ok(cookies.into_iter().map(convert_cookie).collect())
    }
}

fn convert_cookie(raw: headless_chrome::protocol::cdp::Network::Cookie) -> CookieRecord {
    CookieRecord {
        name: raw.name,
        value: raw.value,
        domain: raw.domain,
        path: raw.path,
        secure: raw.secure,
        http_only: raw.http_only,
        same_site: raw.same_site.map(|s| format!("{s:?}")),
        expires: if raw.expires > 0.0 { Some(raw.expires) } else { None },
    }
}
