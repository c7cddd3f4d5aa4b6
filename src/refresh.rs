use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::{CatalogStore, RefreshTarget};
use crate::error::RunError;
use crate::fetcher::PageFetcher;
use crate::flight::SingleFlight;
use crate::parser::classify::{classify, PageClass};
use crate::parser::extract::price;

/// Prices closer than half a cent are the same price.
const PRICE_EPSILON: f64 = 0.005;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub checked: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub marked_unavailable: usize,
    pub blocked: usize,
    pub missing_price: usize,
    pub errors: usize,
}

/// What a product page said about one listing.
#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Price(f64),
    Unavailable(&'static str),
    Blocked(String),
    MissingPrice,
    Failed(String),
}

/// Re-fetches product pages of existing listings and updates price and
/// availability. Fetches run in small concurrent groups with a pause between groups.
pub struct PriceRefresher<F, S> {
    cfg: Config,
    fetcher: Arc<F>,
    store: Arc<S>,
    flight: Arc<SingleFlight>,
    show_bar: bool,
}

impl<F, S> PriceRefresher<F, S>
where
    F: PageFetcher + 'static,
    S: CatalogStore + 'static,
{
    pub fn new(cfg: Config, fetcher: Arc<F>, store: Arc<S>) -> Self {
        Self {
            cfg,
            fetcher,
            store,
            flight: SingleFlight::new(),
            show_bar: false,
        }
    }

    pub fn with_progress_bar(mut self, show: bool) -> Self {
        self.show_bar = show;
        self
    }

    /// Refresh up to `limit` listings (batch size from config when `None`).
    pub async fn run(&self, limit: Option<usize>, cancel: &CancellationToken) -> Result<RefreshSummary, RunError> {
        let _permit = self.flight.try_start().ok_or(RunError::AlreadyRunning)?;
        let limit = limit.unwrap_or(self.cfg.refresh_batch_size);
        let targets = self.store.refresh_batch(&self.cfg.locale, limit)?;
        info!(items = targets.len(), "Price refresh started");

        let mut summary = RefreshSummary::default();
        let pb = self.progress_bar(targets.len());
        let group_size = self.cfg.refresh_concurrency.max(1);
        let groups: Vec<&[RefreshTarget]> = targets.chunks(group_size).collect();

        for (i, group) in groups.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(remaining_groups = groups.len() - i, "Price refresh cancelled");
                break;
            }

            let mut set = JoinSet::new();
            for (idx, target) in group.iter().enumerate() {
                let fetcher = Arc::clone(&self.fetcher);
                let url = self.cfg.product_url(&target.asin);
                set.spawn(async move { (idx, check(fetcher.as_ref(), &url).await) });
            }

            while let Some(joined) = set.join_next().await {
                summary.checked += 1;
                pb.inc(1);
                match joined {
                    Ok((idx, outcome)) => self.apply(&group[idx], outcome, &mut summary),
                    Err(e) => {
                        warn!(error = %e, "Refresh task failed");
                        summary.errors += 1;
                    }
                }
            }

            if i + 1 < groups.len() {
                tokio::select! {
                    _ = tokio::time::sleep(self.cfg.refresh_pacing) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }
        pb.finish_and_clear();

        info!(
            checked = summary.checked,
            updated = summary.updated,
            unchanged = summary.unchanged,
            unavailable = summary.marked_unavailable,
            blocked = summary.blocked,
            missing_price = summary.missing_price,
            errors = summary.errors,
            "Price refresh finished"
        );
        Ok(summary)
    }

    fn apply(&self, target: &RefreshTarget, outcome: Outcome, summary: &mut RefreshSummary) {
        let asin = target.asin.as_str();
        let locale = target.locale.as_str();
        let written = match outcome {
            Outcome::Price(p) if (p - target.price).abs() < PRICE_EPSILON => {
                summary.unchanged += 1;
                self.store.touch(asin, locale)
            }
            Outcome::Price(p) => {
                info!(asin, old = target.price, new = p, "Price changed");
                summary.updated += 1;
                self.store.update_price(asin, locale, p)
            }
            Outcome::Unavailable(why) => {
                debug!(asin, reason = why, "Listing unavailable");
                summary.marked_unavailable += 1;
                self.store.mark_unavailable(asin, locale)
            }
            Outcome::Blocked(reason) => {
                warn!(asin, reason = %reason, "Product page blocked");
                summary.blocked += 1;
                Ok(())
            }
            Outcome::MissingPrice => {
                debug!(asin, "No price on product page");
                summary.missing_price += 1;
                Ok(())
            }
            Outcome::Failed(why) => {
                warn!(asin, error = %why, "Product page unusable");
                summary.errors += 1;
                Ok(())
            }
        };
        if let Err(e) = written {
            warn!(asin, error = %e, "Failed to write refresh result");
            summary.errors += 1;
        }
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_bar {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} prices") {
            pb.set_style(style.progress_chars("=> "));
        }
        pb
    }
}

async fn check<F: PageFetcher>(fetcher: &F, url: &str) -> Outcome {
    let page = match fetcher.fetch(url).await {
        Ok(p) => p,
        Err(e) => {
            debug!(url, error = %e, "Product fetch failed");
            return Outcome::Unavailable("fetch failed");
        }
    };
    if matches!(page.status, 404 | 410) {
        return Outcome::Unavailable("not found");
    }
    match classify(page.status, &page.body) {
        PageClass::Blocked(reason) => return Outcome::Blocked(reason.to_string()),
        PageClass::HttpError(status) => return Outcome::Failed(format!("http status {}", status)),
        PageClass::Usable => {}
    }
    if price::is_unavailable(&page.body) {
        return Outcome::Unavailable("unavailable marker");
    }
    match price::extract_product(&page.body) {
        Some(p) => Outcome::Price(p),
        None => Outcome::MissingPrice,
    }
}
