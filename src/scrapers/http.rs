use crate::scrapers::traits::{Session, SessionFactory};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Plain HTTP sessions for portals that render listings server-side
pub struct HttpSessionFactory {
    timeout: Duration,
}

impl HttpSessionFactory {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpSessionFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn open(&self) -> Result<Box<dyn Session>> {
        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Box::new(HttpSession { client }))
    }
}

pub struct HttpSession {
    client: Client,
}

#[async_trait]
impl Session for HttpSession {
    async fn fetch(&mut self, url: &str) -> Result<String> {
        debug!("Fetching URL: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if !response.status().is_success() {
            warn!("{} returned status: {}", url, response.status());
            anyhow::bail!("Failed to fetch {}: {}", url, response.status());
        }

        let html = response
            .text()
            .await
            .context("Failed to read response body")?;

        debug!("Downloaded {} bytes of HTML", html.len());
        Ok(html)
    }
}
