use std::future::Future;
use std::time::{Duration, Instant};

use rand::seq::IndexedRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, PRAGMA, USER_AGENT};
use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use tracing::debug;

use crate::config::{Config, ProxyConfig};
use crate::error::FetchError;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.4; rv:125.0) Gecko/20100101 Firefox/125.0",
];

/// Raw response of one page fetch.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
    pub latency_ms: u64,
}

/// Anything that can fetch a marketplace page. Implementations never retry.
pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<FetchedPage, FetchError>> + Send;
}

enum Transport {
    Direct(reqwest::Client),
    Relay(Spider),
}

/// Fetches marketplace pages directly, through a forward proxy, or via the spider.cloud relay.
pub struct HttpFetcher {
    transport: Transport,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(cfg: &Config) -> Result<Self, FetchError> {
        let transport = match &cfg.proxy {
            Some(ProxyConfig::Spider { api_key }) => {
                let spider = Spider::new(Some(api_key.clone()))
                    .map_err(|e| FetchError::Relay(format!("failed to create spider client: {}", e)))?;
                Transport::Relay(spider)
            }
            Some(ProxyConfig::Forward { url }) => {
                let proxy = reqwest::Proxy::all(url)?;
                Transport::Direct(build_client(cfg.request_timeout, Some(proxy))?)
            }
            None => Transport::Direct(build_client(cfg.request_timeout, None)?),
        };
        Ok(Self {
            transport,
            timeout: cfg.request_timeout,
        })
    }

    pub fn is_relayed(&self) -> bool {
        matches!(self.transport, Transport::Relay(_))
    }

    async fn fetch_direct(&self, client: &reqwest::Client, url: &str) -> Result<FetchedPage, FetchError> {
        let start = Instant::now();
        let response = client
            .get(url)
            .headers(browser_headers(random_user_agent()))
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.map_reqwest(e))?;
        Ok(FetchedPage {
            status,
            body,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn fetch_relay(&self, spider: &Spider, url: &str) -> Result<FetchedPage, FetchError> {
        let params = RequestParams {
            return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Raw)),
            ..Default::default()
        };

        let start = Instant::now();
        let response = tokio::time::timeout(
            self.timeout,
            spider.scrape_url(url, Some(params), "application/json"),
        )
        .await
        .map_err(|_| FetchError::Timeout(self.timeout.as_secs()))?
        .map_err(|e| FetchError::Relay(e.to_string()))?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let parsed: serde_json::Value = match response.as_str() {
            Some(s) => serde_json::from_str(s).unwrap_or(response.clone()),
            None => response,
        };
        let first = parsed.as_array().and_then(|arr| arr.first());

        let body = first
            .and_then(|obj| obj.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| FetchError::Relay("no content in relay response".into()))?
            .to_string();
        let status = first
            .and_then(|obj| obj.get("status"))
            .and_then(|s| s.as_u64())
            .map(|s| s as u16)
            .unwrap_or(200);

        Ok(FetchedPage {
            status,
            body,
            latency_ms,
        })
    }

    fn map_reqwest(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout.as_secs())
        } else {
            FetchError::from(err)
        }
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let page = match &self.transport {
            Transport::Direct(client) => self.fetch_direct(client, url).await?,
            Transport::Relay(spider) => self.fetch_relay(spider, url).await?,
        };
        debug!(url, status = page.status, bytes = page.body.len(), latency_ms = page.latency_ms, "fetched");
        Ok(page)
    }
}

fn build_client(timeout: Duration, proxy: Option<reqwest::Proxy>) -> Result<reqwest::Client, FetchError> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(reqwest::redirect::Policy::limited(5));
    if let Some(p) = proxy {
        builder = builder.proxy(p);
    }
    Ok(builder.build()?)
}

pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Header set a desktop browser sends on a top-level navigation.
pub fn browser_headers(user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_str(user_agent).unwrap_or(HeaderValue::from_static("Mozilla/5.0")));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
    headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
    headers.insert("upgrade-insecure-requests", HeaderValue::from_static("1"));
    headers
}
