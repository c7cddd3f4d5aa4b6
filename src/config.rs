use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

const DEFAULT_DB_PATH: &str = "data/catalog.sqlite";
const DEFAULT_BASE_URL: &str = "https://www.amazon.com";

#[derive(Debug, Clone, PartialEq)]
pub enum ProxyConfig {
    /// spider.cloud relay; the relay handles bot countermeasures.
    Spider { api_key: String },
    /// Plain forward proxy URL handed to reqwest.
    Forward { url: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub base_url: String,
    pub locale: String,
    pub associate_tag: Option<String>,
    pub proxy: Option<ProxyConfig>,
    pub request_timeout: Duration,
    pub pacing_min: Duration,
    pub pacing_max: Duration,
    pub max_items_per_query: usize,
    pub refresh_batch_size: usize,
    pub refresh_concurrency: usize,
    pub refresh_pacing: Duration,
    pub progress_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            locale: "us".to_string(),
            associate_tag: None,
            proxy: None,
            request_timeout: Duration::from_secs(30),
            pacing_min: Duration::from_millis(2000),
            pacing_max: Duration::from_millis(4000),
            max_items_per_query: 30,
            refresh_batch_size: 50,
            refresh_concurrency: 5,
            refresh_pacing: Duration::from_millis(1500),
            progress_capacity: 500,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let d = Config::default();

        let proxy = match (get("SPIDER_API_KEY"), get("FORWARD_PROXY_URL")) {
            (Some(api_key), _) => Some(ProxyConfig::Spider { api_key }),
            (None, Some(url)) => Some(ProxyConfig::Forward { url }),
            (None, None) => None,
        };

        let cfg = Config {
            db_path: get("CATALOG_DB").unwrap_or(d.db_path),
            base_url: get("MARKETPLACE_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(d.base_url),
            locale: get("MARKETPLACE_LOCALE").unwrap_or(d.locale),
            associate_tag: get("ASSOCIATE_TAG"),
            proxy,
            request_timeout: Duration::from_secs(parse_or(&get, "REQUEST_TIMEOUT_SECS", 30)?),
            pacing_min: Duration::from_millis(parse_or(&get, "PACING_MIN_MS", 2000)?),
            pacing_max: Duration::from_millis(parse_or(&get, "PACING_MAX_MS", 4000)?),
            max_items_per_query: parse_or(&get, "MAX_ITEMS_PER_QUERY", d.max_items_per_query)?,
            refresh_batch_size: parse_or(&get, "REFRESH_BATCH_SIZE", d.refresh_batch_size)?,
            refresh_concurrency: parse_or(&get, "REFRESH_CONCURRENCY", d.refresh_concurrency)?,
            refresh_pacing: Duration::from_millis(parse_or(&get, "REFRESH_PACING_MS", 1500)?),
            progress_capacity: parse_or(&get, "PROGRESS_CAPACITY", d.progress_capacity)?,
        };

        if cfg.pacing_min > cfg.pacing_max {
            bail!(
                "PACING_MIN_MS ({}) is greater than PACING_MAX_MS ({})",
                cfg.pacing_min.as_millis(),
                cfg.pacing_max.as_millis()
            );
        }
        if cfg.refresh_concurrency == 0 {
            bail!("REFRESH_CONCURRENCY must be at least 1");
        }
        Ok(cfg)
    }

    pub fn search_url(&self, query: &str) -> Result<String> {
        let url = reqwest::Url::parse_with_params(&format!("{}/s", self.base_url), &[("k", query)])
            .with_context(|| format!("invalid marketplace base url: {}", self.base_url))?;
        Ok(url.to_string())
    }

    pub fn product_url(&self, asin: &str) -> String {
        format!("{}/dp/{}", self.base_url, asin)
    }

    /// Product URL as stored on catalog items, carrying the associate tag if set.
    pub fn source_url(&self, asin: &str) -> String {
        match &self.associate_tag {
            Some(tag) => format!("{}?tag={}", self.product_url(asin), tag),
            None => self.product_url(asin),
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}
