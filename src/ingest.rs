use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::catalog::{CatalogItem, IngestionRun, RunCounters, RunStatus};
use crate::config::Config;
use crate::db::CatalogStore;
use crate::dedup::KnownIdentifierSet;
use crate::error::{QueryError, RunError};
use crate::fetcher::PageFetcher;
use crate::flight::{FlightPermit, SingleFlight};
use crate::parser::classify::{classify, PageClass};
use crate::parser::scan_search_page;
use crate::progress::ProgressLog;
use crate::queries::SearchQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Result of asking for a background run.
pub enum StartOutcome {
    Accepted(JoinHandle<Result<IngestionRun, RunError>>),
    AlreadyRunning,
}

/// What one successful query contributed.
#[derive(Debug, Default)]
struct QueryReport {
    listed: usize,
    already_known: usize,
    over_cap: usize,
    dropped: usize,
    found: usize,
    saved: usize,
}

/// Drives fetch → classify → segment → dedup → extract → persist over the
/// search catalog. Queries run strictly one after another.
pub struct Ingestor<F, S> {
    cfg: Config,
    fetcher: Arc<F>,
    store: Arc<S>,
    flight: Arc<SingleFlight>,
    last_state: Mutex<RunState>,
    progress: ProgressLog,
    show_bar: bool,
}

impl<F, S> Ingestor<F, S>
where
    F: PageFetcher + 'static,
    S: CatalogStore + 'static,
{
    pub fn new(cfg: Config, fetcher: Arc<F>, store: Arc<S>) -> Self {
        let progress = ProgressLog::new(cfg.progress_capacity);
        Self {
            cfg,
            fetcher,
            store,
            flight: SingleFlight::new(),
            last_state: Mutex::new(RunState::Idle),
            progress,
            show_bar: false,
        }
    }

    /// Draw an indicatif bar over the query loop (CLI use).
    pub fn with_progress_bar(mut self, show: bool) -> Self {
        self.show_bar = show;
        self
    }

    pub fn progress(&self) -> &ProgressLog {
        &self.progress
    }

    pub fn state(&self) -> RunState {
        if self.flight.is_running() {
            return RunState::Running;
        }
        self.last_state.lock().map(|s| *s).unwrap_or(RunState::Failed)
    }

    /// Start a run in the background and return at once. A second call while
    /// one is active gets `AlreadyRunning`.
    pub fn trigger(self: &Arc<Self>, queries: Vec<SearchQuery>, cancel: CancellationToken) -> StartOutcome {
        let Some(permit) = self.flight.try_start() else {
            return StartOutcome::AlreadyRunning;
        };
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run_with_permit(permit, &queries, &cancel).await });
        StartOutcome::Accepted(handle)
    }

    /// Run to completion in the caller's task.
    #[cfg(test)]
    pub async fn run(&self, queries: &[SearchQuery], cancel: &CancellationToken) -> Result<IngestionRun, RunError> {
        let permit = self.flight.try_start().ok_or(RunError::AlreadyRunning)?;
        self.run_with_permit(permit, queries, cancel).await
    }

    async fn run_with_permit(
        &self,
        _permit: FlightPermit,
        queries: &[SearchQuery],
        cancel: &CancellationToken,
    ) -> Result<IngestionRun, RunError> {
        let started_at = Utc::now();
        let mut counters = RunCounters::default();
        self.progress.reset();
        self.progress.info(format!("Run started: {} queries", queries.len()));

        let mut known = match KnownIdentifierSet::load(self.store.as_ref(), &self.cfg.locale) {
            Ok(k) => k,
            Err(e) => {
                error!(error = %e, "Failed to load known identifiers");
                self.progress.error(format!("Setup failed: {}", e));
                counters.errors += 1;
                let run = IngestionRun {
                    id: None,
                    status: RunStatus::Failed,
                    counters,
                    started_at,
                    finished_at: Utc::now(),
                };
                if let Err(e) = self.store.append_run(&run) {
                    error!(error = %e, "Failed to record failed run");
                }
                self.set_state(RunState::Failed);
                return Err(RunError::Setup(e));
            }
        };
        info!(known = known.len(), "Loaded known identifiers");
        if known.is_empty() {
            self.progress.info("Catalog is empty, every listing is new");
        } else {
            self.progress.info(format!("{} listings already in catalog", known.len()));
        }

        let pb = self.progress_bar(queries.len());

        for (i, query) in queries.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(remaining = queries.len() - i, "Run cancelled");
                self.progress.warn(format!("Cancelled with {} queries left", queries.len() - i));
                break;
            }
            pb.set_message(query.label);
            counters.queries_total += 1;

            match self.process_query(query, &mut known, &mut counters).await {
                Ok(r) => {
                    info!(
                        query = query.label,
                        listed = r.listed,
                        known = r.already_known,
                        over_cap = r.over_cap,
                        dropped = r.dropped,
                        found = r.found,
                        saved = r.saved,
                        "Query done"
                    );
                    self.progress.info(format!(
                        "{}: {} listed, {} known, {} over cap, {} dropped, {} new saved",
                        query.label, r.listed, r.already_known, r.over_cap, r.dropped, r.saved
                    ));
                }
                Err(e) => {
                    counters.errors += e.error_weight();
                    counters.queries_failed += 1;
                    if matches!(e, QueryError::Blocked { .. }) {
                        counters.blocked += 1;
                    }
                    warn!(query = query.label, error = %e, "Query failed");
                    self.progress.warn(format!("{}: {}", query.label, e));
                }
            }
            pb.inc(1);

            if i + 1 < queries.len() {
                let delay = self.pacing_delay();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }
        pb.finish_and_clear();

        let status = RunStatus::from_query_outcomes(counters.queries_total, counters.queries_failed);
        let mut run = IngestionRun {
            id: None,
            status,
            counters,
            started_at,
            finished_at: Utc::now(),
        };
        match self.store.append_run(&run) {
            Ok(id) => run.id = Some(id),
            Err(e) => {
                error!(error = %e, "Failed to record run");
                self.progress.error(format!("Could not record run: {}", e));
            }
        }

        info!(
            status = %status,
            found = counters.items_found,
            saved = counters.items_saved,
            errors = counters.errors,
            blocked = counters.blocked,
            "Run finished"
        );
        self.progress.info(format!(
            "Run {}: {} found, {} saved, {} errors",
            status, counters.items_found, counters.items_saved, counters.errors
        ));
        self.set_state(if status == RunStatus::Failed {
            RunState::Failed
        } else {
            RunState::Completed
        });
        Ok(run)
    }

    async fn process_query(
        &self,
        query: &SearchQuery,
        known: &mut KnownIdentifierSet,
        counters: &mut RunCounters,
    ) -> Result<QueryReport, QueryError> {
        let url = self
            .cfg
            .search_url(query.query)
            .map_err(|e| QueryError::InvalidUrl(e.to_string()))?;
        let page = self.fetcher.fetch(&url).await?;

        match classify(page.status, &page.body) {
            PageClass::Blocked(reason) => {
                return Err(QueryError::Blocked {
                    reason: reason.to_string(),
                })
            }
            PageClass::HttpError(status) => return Err(QueryError::Http { status }),
            PageClass::Usable => {}
        }

        let scan = scan_search_page(&page.body, query, known, self.cfg.max_items_per_query);
        let mut report = QueryReport {
            listed: scan.listed,
            already_known: scan.already_known,
            over_cap: scan.over_cap,
            dropped: scan.dropped,
            found: scan.candidates.len(),
            saved: 0,
        };
        counters.items_found += scan.candidates.len();
        if scan.candidates.is_empty() {
            return Ok(report);
        }

        let now = Utc::now();
        let items: Vec<CatalogItem> = scan
            .candidates
            .into_iter()
            .map(|c| c.into_item(&self.cfg, now))
            .collect();
        self.store
            .upsert_items(&items)
            .map_err(|source| QueryError::Persistence {
                count: items.len(),
                source,
            })?;

        for it in &items {
            known.mark_known(it.asin.as_str());
        }
        counters.items_saved += items.len();
        report.saved = items.len();
        Ok(report)
    }

    fn pacing_delay(&self) -> Duration {
        let min = self.cfg.pacing_min.as_millis() as u64;
        let max = self.cfg.pacing_max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max.max(min)))
    }

    fn set_state(&self, state: RunState) {
        if let Ok(mut s) = self.last_state.lock() {
            *s = state;
        }
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_bar {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        pb
    }
}
