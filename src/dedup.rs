use std::collections::HashSet;

use tracing::debug;

use crate::db::CatalogStore;
use crate::error::StoreError;

pub const SCAN_PAGE_SIZE: usize = 1000;

/// Identifiers already in storage for this run's locale, plus everything saved
/// so far in the run. Only grows.
#[derive(Debug, Default, Clone)]
pub struct KnownIdentifierSet {
    ids: HashSet<String>,
}

impl KnownIdentifierSet {
    /// Full paginated scan of stored identifiers. Keeps paging while a full page comes back.
    pub fn load<S: CatalogStore + ?Sized>(store: &S, locale: &str) -> Result<Self, StoreError> {
        let mut ids = HashSet::new();
        let mut offset = 0;
        loop {
            let page = store.known_ids_page(locale, offset, SCAN_PAGE_SIZE)?;
            let n = page.len();
            ids.extend(page);
            debug!(offset, n, "loaded known id page");
            if n < SCAN_PAGE_SIZE {
                break;
            }
            offset += n;
        }
        Ok(Self { ids })
    }

    #[cfg(test)]
    pub fn from_ids<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_known(&self, asin: &str) -> bool {
        self.ids.contains(asin)
    }

    pub fn mark_known(&mut self, asin: impl Into<String>) {
        self.ids.insert(asin.into());
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::catalog::{CatalogItem, Category, Condition, SubType};
    use chrono::Utc;

    fn item(asin: String, locale: &str) -> CatalogItem {
        let now = Utc::now();
        CatalogItem {
            source_url: format!("https://www.amazon.com/dp/{}", asin),
            asin,
            locale: locale.to_string(),
            name: "Test Filament Spool 1kg".into(),
            price: 19.99,
            brand: None,
            category: Category::Filament,
            sub_type: SubType::Pla,
            condition: Condition::New,
            rating: None,
            review_count: None,
            available: true,
            first_seen: now,
            last_updated: now,
        }
    }

    #[test]
    fn mark_and_query() {
        let mut set = KnownIdentifierSet::default();
        assert!(!set.is_known("B0ABCDEF12"));
        set.mark_known("B0ABCDEF12");
        assert!(set.is_known("B0ABCDEF12"));
        set.mark_known("B0ABCDEF12");
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn load_pages_past_a_full_page() {
        let store = SqliteStore::open_in_memory().unwrap();
        let items: Vec<_> = (0..SCAN_PAGE_SIZE + 5)
            .map(|i| item(format!("B{:09}", i), "us"))
            .collect();
        store.upsert_items(&items).unwrap();
        store.upsert_items(&[item("B0OTHERLOC".into(), "de")]).unwrap();

        let set = KnownIdentifierSet::load(&store, "us").unwrap();
        assert_eq!(set.len(), SCAN_PAGE_SIZE + 5);
        assert!(set.is_known("B000001004"));
        assert!(!set.is_known("B0OTHERLOC"));
    }

    #[test]
    fn load_exactly_one_full_page() {
        let store = SqliteStore::open_in_memory().unwrap();
        let items: Vec<_> = (0..SCAN_PAGE_SIZE)
            .map(|i| item(format!("C{:09}", i), "us"))
            .collect();
        store.upsert_items(&items).unwrap();
        assert_eq!(KnownIdentifierSet::load(&store, "us").unwrap().len(), SCAN_PAGE_SIZE);
    }
}
