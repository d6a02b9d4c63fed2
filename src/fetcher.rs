use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};
use url::Url;

use crate::config::FetchConfig;
use crate::error::PipelineError;

/// Raw markup of one fetched article.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: Url,
    pub body: String,
    pub latency_ms: u64,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, PipelineError>;
}

/// Resolve an href against the crawl's base origin, dropping any fragment.
pub fn resolve(base: &Url, href: &str) -> Option<Url> {
    let mut url = base.join(href).ok()?;
    url.set_fragment(None);
    Some(url)
}

/// Whether `url` lives on the same host as the crawl's base origin.
pub fn same_origin(base: &Url, url: &Url) -> bool {
    base.scheme() == url.scheme() && base.host_str() == url.host_str()
}

pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("seealso_atlas/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    async fn fetch_once(&self, url: &Url) -> Result<Attempt, PipelineError> {
        let start = Instant::now();
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| PipelineError::fetch(url.as_str(), e))?;

        let status = response.status();
        if should_retry(status) {
            return Ok(Attempt::Retry(status));
        }
        if !status.is_success() {
            return Err(PipelineError::fetch(url.as_str(), format!("HTTP {status}")));
        }

        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::fetch(url.as_str(), e))?;

        Ok(Attempt::Done(FetchedPage {
            url: final_url,
            body,
            latency_ms: start.elapsed().as_millis() as u64,
        }))
    }
}

enum Attempt {
    Done(FetchedPage),
    Retry(StatusCode),
}

fn should_retry(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503)
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, PipelineError> {
        let max_retries = self.config.max_retries;
        for attempt in 0..=max_retries {
            match self.fetch_once(url).await? {
                Attempt::Done(page) => {
                    debug!(url = %page.url, latency_ms = page.latency_ms, "fetched");
                    return Ok(page);
                }
                Attempt::Retry(status) if attempt < max_retries => {
                    let backoff = backoff_for(&self.config, attempt);
                    warn!(
                        "HTTP {} on {} (attempt {}/{}), backing off {:.1}s",
                        status,
                        url,
                        attempt + 1,
                        max_retries,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                }
                Attempt::Retry(status) => {
                    return Err(PipelineError::fetch(
                        url.as_str(),
                        format!("HTTP {status} after {max_retries} retries"),
                    ));
                }
            }
        }
        Err(PipelineError::fetch(url.as_str(), "retries exhausted"))
    }
}

/// Backoff applied before retry `attempt` (0-based).
fn backoff_for(config: &FetchConfig, attempt: u32) -> Duration {
    config.base_backoff * 2u32.pow(attempt)
}

// ── Tests ──
