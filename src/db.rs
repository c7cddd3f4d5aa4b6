use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use crate::catalog::{CatalogItem, IngestionRun, RunCounters, RunStatus};
use crate::error::StoreError;

/// Listing the price refresher re-checks.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshTarget {
    pub asin: String,
    pub locale: String,
    pub price: f64,
    pub available: bool,
}

/// Persistence the pipeline needs. The sqlite store is the only production impl.
pub trait CatalogStore: Send + Sync {
    fn known_ids_page(&self, locale: &str, offset: usize, limit: usize) -> Result<Vec<String>, StoreError>;

    /// Insert-or-update on (asin, locale) in one transaction. Returns rows written.
    fn upsert_items(&self, items: &[CatalogItem]) -> Result<usize, StoreError>;

    fn append_run(&self, run: &IngestionRun) -> Result<i64, StoreError>;

    fn recent_runs(&self, limit: usize) -> Result<Vec<IngestionRun>, StoreError>;

    /// Non-manual listings, least recently updated first.
    fn refresh_batch(&self, locale: &str, limit: usize) -> Result<Vec<RefreshTarget>, StoreError>;

    /// New price; also marks the listing available and records price history.
    fn update_price(&self, asin: &str, locale: &str, price: f64) -> Result<(), StoreError>;

    fn mark_unavailable(&self, asin: &str, locale: &str) -> Result<(), StoreError>;

    /// Price unchanged: bump `last_updated` and mark available.
    fn touch(&self, asin: &str, locale: &str) -> Result<(), StoreError>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| StoreError::Unavailable(format!("cannot create {}: {}", dir.display(), e)))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::with_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))
    }

    pub fn stats(&self, locale: &str) -> Result<Stats, StoreError> {
        let conn = self.conn()?;
        let total: usize = conn.query_row(
            "SELECT COUNT(*) FROM catalog_items WHERE locale = ?1",
            [locale],
            |r| r.get(0),
        )?;
        let unavailable: usize = conn.query_row(
            "SELECT COUNT(*) FROM catalog_items WHERE locale = ?1 AND available = 0",
            [locale],
            |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(
            "SELECT category, COUNT(*) FROM catalog_items WHERE locale = ?1
             GROUP BY category ORDER BY COUNT(*) DESC, category",
        )?;
        let by_category = stmt
            .query_map([locale], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(String, usize)>, _>>()?;
        let runs: usize = conn.query_row("SELECT COUNT(*) FROM ingestion_runs", [], |r| r.get(0))?;
        let last_run: Option<String> = conn
            .query_row(
                "SELECT finished_at FROM ingestion_runs ORDER BY id DESC LIMIT 1",
                [],
                |r| r.get(0),
            )
            .optional()?;
        Ok(Stats {
            total,
            unavailable,
            by_category,
            runs,
            last_run,
        })
    }

    pub fn price_history(&self, asin: &str, locale: &str) -> Result<Vec<(f64, String)>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT price, recorded_at FROM price_history
             WHERE asin = ?1 AND locale = ?2 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![asin, locale], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS catalog_items (
            id            INTEGER PRIMARY KEY,
            asin          TEXT NOT NULL,
            locale        TEXT NOT NULL,
            name          TEXT NOT NULL,
            price         REAL NOT NULL CHECK(price > 0),
            brand         TEXT,
            category      TEXT NOT NULL CHECK(category IN ('printer','filament','resin','accessory','pen')),
            sub_type      TEXT NOT NULL,
            condition     TEXT NOT NULL DEFAULT 'new' CHECK(condition IN ('new','used')),
            rating        REAL CHECK(rating IS NULL OR (rating >= 0 AND rating <= 5)),
            review_count  INTEGER CHECK(review_count IS NULL OR review_count >= 0),
            available     BOOLEAN NOT NULL DEFAULT 1,
            source_url    TEXT NOT NULL,
            manual        BOOLEAN NOT NULL DEFAULT 0,
            first_seen    TEXT NOT NULL,
            last_updated  TEXT NOT NULL,
            UNIQUE(asin, locale)
        );
        CREATE INDEX IF NOT EXISTS idx_items_category ON catalog_items(category, sub_type);
        CREATE INDEX IF NOT EXISTS idx_items_updated ON catalog_items(last_updated);

        CREATE TABLE IF NOT EXISTS ingestion_runs (
            id             INTEGER PRIMARY KEY,
            status         TEXT NOT NULL CHECK(status IN ('success','partial','failed')),
            items_found    INTEGER NOT NULL,
            items_saved    INTEGER NOT NULL,
            errors         INTEGER NOT NULL,
            blocked        INTEGER NOT NULL DEFAULT 0,
            queries_total  INTEGER NOT NULL DEFAULT 0,
            queries_failed INTEGER NOT NULL DEFAULT 0,
            started_at     TEXT NOT NULL,
            finished_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS price_history (
            id           INTEGER PRIMARY KEY,
            asin         TEXT NOT NULL,
            locale       TEXT NOT NULL,
            price        REAL NOT NULL,
            recorded_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_history_item ON price_history(asin, locale);
        ",
    )?;
    Ok(())
}

impl CatalogStore for SqliteStore {
    fn known_ids_page(&self, locale: &str, offset: usize, limit: usize) -> Result<Vec<String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT asin FROM catalog_items WHERE locale = ?1 ORDER BY id LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![locale, limit as i64, offset as i64], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(rows)
    }

    fn upsert_items(&self, items: &[CatalogItem]) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO catalog_items
                 (asin, locale, name, price, brand, category, sub_type, condition,
                  rating, review_count, available, source_url, first_seen, last_updated)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)
                 ON CONFLICT(asin, locale) DO UPDATE SET
                    name = excluded.name,
                    price = excluded.price,
                    brand = COALESCE(excluded.brand, catalog_items.brand),
                    rating = COALESCE(excluded.rating, catalog_items.rating),
                    review_count = COALESCE(excluded.review_count, catalog_items.review_count),
                    available = excluded.available,
                    last_updated = excluded.last_updated",
            )?;
            for it in items {
                count += stmt.execute(params![
                    it.asin,
                    it.locale,
                    it.name,
                    it.price,
                    it.brand,
                    it.category.as_str(),
                    it.sub_type.as_str(),
                    it.condition.as_str(),
                    it.rating.map(f64::from),
                    it.review_count,
                    it.available,
                    it.source_url,
                    it.first_seen.to_rfc3339(),
                    it.last_updated.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(count)
    }

    fn append_run(&self, run: &IngestionRun) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        let c = &run.counters;
        conn.execute(
            "INSERT INTO ingestion_runs
             (status, items_found, items_saved, errors, blocked, queries_total, queries_failed,
              started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                run.status.as_str(),
                c.items_found as i64,
                c.items_saved as i64,
                c.errors as i64,
                c.blocked as i64,
                c.queries_total as i64,
                c.queries_failed as i64,
                run.started_at.to_rfc3339(),
                run.finished_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn recent_runs(&self, limit: usize) -> Result<Vec<IngestionRun>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, status, items_found, items_saved, errors, blocked, queries_total,
                    queries_failed, started_at, finished_at
             FROM ingestion_runs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                let status: String = row.get(1)?;
                let started: String = row.get(8)?;
                let finished: String = row.get(9)?;
                Ok(IngestionRun {
                    id: Some(row.get(0)?),
                    status: status
                        .parse::<RunStatus>()
                        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, e.into()))?,
                    counters: RunCounters {
                        items_found: row.get(2)?,
                        items_saved: row.get(3)?,
                        errors: row.get(4)?,
                        blocked: row.get(5)?,
                        queries_total: row.get(6)?,
                        queries_failed: row.get(7)?,
                    },
                    started_at: parse_ts(8, &started)?,
                    finished_at: parse_ts(9, &finished)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn refresh_batch(&self, locale: &str, limit: usize) -> Result<Vec<RefreshTarget>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT asin, locale, price, available FROM catalog_items
             WHERE locale = ?1 AND manual = 0
             ORDER BY last_updated ASC, id ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![locale, limit as i64], |row| {
                Ok(RefreshTarget {
                    asin: row.get(0)?,
                    locale: row.get(1)?,
                    price: row.get(2)?,
                    available: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn update_price(&self, asin: &str, locale: &str, price: f64) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE catalog_items SET price = ?3, available = 1, last_updated = ?4
             WHERE asin = ?1 AND locale = ?2",
            params![asin, locale, price, now],
        )?;
        tx.execute(
            "INSERT INTO price_history (asin, locale, price, recorded_at) VALUES (?1, ?2, ?3, ?4)",
            params![asin, locale, price, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn mark_unavailable(&self, asin: &str, locale: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE catalog_items SET available = 0, last_updated = ?3 WHERE asin = ?1 AND locale = ?2",
            params![asin, locale, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn touch(&self, asin: &str, locale: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE catalog_items SET available = 1, last_updated = ?3 WHERE asin = ?1 AND locale = ?2",
            params![asin, locale, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

fn parse_ts(col: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(col, Type::Text, Box::new(e)))
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub unavailable: usize,
    pub by_category: Vec<(String, usize)>,
    pub runs: usize,
    pub last_run: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Category, Condition, SubType};

    fn item(asin: &str, price: f64) -> CatalogItem {
        let now = Utc::now();
        CatalogItem {
            asin: asin.to_string(),
            locale: "us".into(),
            name: format!("Listing {}", asin),
            price,
            brand: Some("Elegoo".into()),
            category: Category::Resin,
            sub_type: SubType::StandardResin,
            condition: Condition::New,
            rating: Some(4.5),
            review_count: Some(120),
            available: true,
            source_url: format!("https://www.amazon.com/dp/{}", asin),
            first_seen: now,
            last_updated: now,
        }
    }

    fn read_price(store: &SqliteStore, asin: &str) -> (f64, bool) {
        let conn = store.conn().unwrap();
        conn.query_row(
            "SELECT price, available FROM catalog_items WHERE asin = ?1",
            [asin],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap()
    }

    #[test]
    fn upsert_updates_instead_of_duplicating() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_items(&[item("B0RESIN001", 29.99)]).unwrap();
        let mut again = item("B0RESIN001", 24.99);
        again.brand = None;
        store.upsert_items(&[again]).unwrap();

        assert_eq!(store.known_ids_page("us", 0, 10).unwrap(), vec!["B0RESIN001"]);
        assert_eq!(read_price(&store, "B0RESIN001").0, 24.99);
        let brand: Option<String> = store
            .conn()
            .unwrap()
            .query_row("SELECT brand FROM catalog_items", [], |r| r.get(0))
            .unwrap();
        assert_eq!(brand.as_deref(), Some("Elegoo"));
    }

    #[test]
    fn non_positive_price_rejected_by_schema() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.upsert_items(&[item("B0RESIN002", 0.0)]).is_err());
        assert!(store.known_ids_page("us", 0, 10).unwrap().is_empty());
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let batch = [item("B0RESIN003", 10.0), item("B0RESIN004", -1.0)];
        assert!(store.upsert_items(&batch).is_err());
        assert!(store.known_ids_page("us", 0, 10).unwrap().is_empty());
    }

    #[test]
    fn runs_append_and_read_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        let run = IngestionRun {
            id: None,
            status: RunStatus::Partial,
            counters: RunCounters {
                items_found: 7,
                items_saved: 5,
                errors: 2,
                blocked: 1,
                queries_total: 3,
                queries_failed: 1,
            },
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        let id = store.append_run(&run).unwrap();
        let runs = store.recent_runs(5).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, Some(id));
        assert_eq!(runs[0].status, RunStatus::Partial);
        assert_eq!(runs[0].counters, run.counters);
    }

    #[test]
    fn corrupt_run_timestamp_is_an_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO ingestion_runs (status, items_found, items_saved, errors, started_at, finished_at)
                 VALUES ('success', 1, 1, 0, 'yesterday', '2026-01-01T00:00:00+00:00')",
                [],
            )
            .unwrap();
        let err = store.recent_runs(5).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Sqlite(rusqlite::Error::FromSqlConversionFailure(8, Type::Text, _))
        ));
    }

    #[test]
    fn refresh_batch_skips_manual_items() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert_items(&[item("B0RESIN005", 10.0), item("B0RESIN006", 11.0)])
            .unwrap();
        store
            .conn()
            .unwrap()
            .execute("UPDATE catalog_items SET manual = 1 WHERE asin = 'B0RESIN006'", [])
            .unwrap();
        let batch = store.refresh_batch("us", 10).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].asin, "B0RESIN005");
    }

    #[test]
    fn price_update_and_availability() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_items(&[item("B0RESIN007", 30.0)]).unwrap();

        store.mark_unavailable("B0RESIN007", "us").unwrap();
        assert_eq!(read_price(&store, "B0RESIN007"), (30.0, false));

        store.update_price("B0RESIN007", "us", 27.5).unwrap();
        assert_eq!(read_price(&store, "B0RESIN007"), (27.5, true));
        assert_eq!(store.price_history("B0RESIN007", "us").unwrap().len(), 1);
    }

    #[test]
    fn stats_counts() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert_items(&[item("B0RESIN008", 10.0), item("B0RESIN009", 12.0)])
            .unwrap();
        store.mark_unavailable("B0RESIN009", "us").unwrap();
        let s = store.stats("us").unwrap();
        assert_eq!(s.total, 2);
        assert_eq!(s.unavailable, 1);
        assert_eq!(s.by_category, vec![("resin".to_string(), 2)]);
        assert_eq!(s.runs, 0);
        assert!(s.last_run.is_none());
    }
}
