use crate::scrapers::traits::{Session, SessionFactory};
use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Per-navigation timeout
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Time given to client-side rendering after navigation
const RENDER_WAIT: Duration = Duration::from_secs(2);

/// Launches one headless Chrome and hands out a fresh tab per session
pub struct ChromeSessionFactory {
    browser: Browser,
}

impl ChromeSessionFactory {
    /// Launch headless Chrome
    pub fn new() -> Result<Self> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(true)
            .args(vec![std::ffi::OsStr::new(
                "--disable-blink-features=AutomationControlled",
            )])
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;

        Ok(Self { browser })
    }
}

#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    async fn open(&self) -> Result<Box<dyn Session>> {
        let browser = self.browser.clone();
        let tab = tokio::task::spawn_blocking(move || browser.new_tab())
            .await
            .context("Browser task panicked")?
            .context("Failed to open browser tab")?;
        tab.set_default_timeout(NAVIGATION_TIMEOUT);
        Ok(Box::new(ChromeSession { tab }))
    }
}

/// A single browser tab
pub struct ChromeSession {
    tab: Arc<Tab>,
}

impl ChromeSession {
    fn load(tab: &Tab, url: &str) -> Result<String> {
        tab.navigate_to(url)
            .with_context(|| format!("Failed to navigate to {}", url))?;
        tab.wait_until_navigated()
            .with_context(|| format!("Timed out loading {}", url))?;

        thread::sleep(RENDER_WAIT);

        // Cookie banners block the listing grid on most portals
        let _ = tab.evaluate(
            r#"
            const button = document.querySelector(
                "button[id='onetrust-accept-btn-handler'], button[id*='gdpr-confirm'], button[id*='accept']"
            );
            if (button) button.click();
            "#,
            false,
        );

        let html = tab
            .evaluate("document.documentElement.outerHTML", false)
            .context("Failed to read page HTML")?;

        let html = html
            .value
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default();

        debug!("Loaded {} ({} bytes)", url, html.len());
        Ok(html)
    }
}

#[async_trait]
impl Session for ChromeSession {
    async fn fetch(&mut self, url: &str) -> Result<String> {
        let tab = Arc::clone(&self.tab);
        let url = url.to_string();
        tokio::task::spawn_blocking(move || Self::load(&tab, &url))
            .await
            .context("Browser task panicked")?
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        let tab = Arc::clone(&self.tab);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || {
                    let _ = tab.close(false);
                });
            }
            Err(_) => {
                let _ = tab.close(false);
            }
        }
    }
}
