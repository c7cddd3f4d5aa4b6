pub mod brand;
pub mod matcher;
pub mod price;
pub mod rating;
pub mod title;

use chrono::{DateTime, Utc};

use super::blocks::ItemBlock;
use crate::catalog::{CatalogItem, Category, Condition, SubType};
use crate::config::Config;
use crate::queries::SearchQuery;

/// A listing pulled from a search card, before it becomes a catalog row.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub asin: String,
    pub title: String,
    pub price: f64,
    pub brand: Option<String>,
    pub rating: Option<f32>,
    pub review_count: Option<u32>,
    pub category: Category,
    pub sub_type: SubType,
}

impl Candidate {
    pub fn into_item(self, cfg: &Config, now: DateTime<Utc>) -> CatalogItem {
        CatalogItem {
            source_url: cfg.source_url(&self.asin),
            asin: self.asin,
            locale: cfg.locale.clone(),
            name: self.title,
            price: self.price,
            brand: self.brand,
            category: self.category,
            sub_type: self.sub_type,
            condition: Condition::New,
            rating: self.rating,
            review_count: self.review_count,
            available: true,
            first_seen: now,
            last_updated: now,
        }
    }
}

/// Extract one candidate from an item block. A missing clean title or a
/// missing/non-positive price drops the item; rating and review count are optional.
pub fn extract(block: &ItemBlock<'_>, query: &SearchQuery) -> Option<Candidate> {
    let title = title::extract(block.span)?;
    let price = price::extract(block.span)?;
    Some(Candidate {
        asin: block.asin.to_string(),
        brand: brand::resolve(&title).map(str::to_string),
        rating: rating::extract_rating(block.span),
        review_count: rating::extract_review_count(block.span),
        title,
        price,
        category: query.category,
        sub_type: query.sub_type,
    })
}
