pub mod blocks;
pub mod classify;
pub mod extract;

use rayon::prelude::*;

use crate::dedup::KnownIdentifierSet;
use crate::queries::SearchQuery;
use blocks::ItemBlock;
use extract::Candidate;

/// What one usable search page yielded.
#[derive(Debug, Default)]
pub struct PageScan {
    /// Distinct listings on the page.
    pub listed: usize,
    pub already_known: usize,
    /// New listings left out by the per-query cap.
    pub over_cap: usize,
    /// New listings that produced no clean title or price.
    pub dropped: usize,
    pub candidates: Vec<Candidate>,
}

/// segment → drop known ids → cap → extract. Only call on a page the
/// classifier marked usable.
pub fn scan_search_page(
    html: &str,
    query: &SearchQuery,
    known: &KnownIdentifierSet,
    max_items: usize,
) -> PageScan {
    let mut scan = PageScan::default();
    let mut fresh: Vec<ItemBlock<'_>> = Vec::new();

    for block in blocks::split_items(html) {
        scan.listed += 1;
        if known.is_known(block.asin) {
            scan.already_known += 1;
        } else if fresh.len() >= max_items {
            scan.over_cap += 1;
        } else {
            fresh.push(block);
        }
    }

    let extracted: Vec<Option<Candidate>> = fresh
        .par_iter()
        .map(|block| extract::extract(block, query))
        .collect();

    for c in extracted {
        match c {
            Some(c) => scan.candidates.push(c),
            None => scan.dropped += 1,
        }
    }
    scan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Category, SubType};

    const QUERY: SearchQuery = SearchQuery {
        query: "fdm 3d printer",
        category: Category::Printer,
        sub_type: SubType::Fdm,
        label: "FDM printers",
    };

    fn fixture() -> String {
        std::fs::read_to_string("tests/fixtures/search_printers.html").unwrap()
    }

    #[test]
    fn known_ids_never_extracted() {
        let known = KnownIdentifierSet::from_ids(["B0CPRNT001"]);
        let scan = scan_search_page(&fixture(), &QUERY, &known, 30);
        assert_eq!(scan.listed, 4);
        assert_eq!(scan.already_known, 1);
        assert!(scan.candidates.iter().all(|c| c.asin != "B0CPRNT001"));
        assert_eq!(scan.candidates.len(), 1);
        assert_eq!(scan.dropped, 2);
    }

    #[test]
    fn cap_limits_extraction() {
        let scan = scan_search_page(&fixture(), &QUERY, &KnownIdentifierSet::default(), 1);
        assert_eq!(scan.candidates.len(), 1);
        assert_eq!(scan.over_cap, 3);
        assert_eq!(scan.candidates[0].asin, "B0CPRNT001");
    }

    #[test]
    fn candidates_keep_page_order() {
        let scan = scan_search_page(&fixture(), &QUERY, &KnownIdentifierSet::default(), 30);
        let ids: Vec<_> = scan.candidates.iter().map(|c| c.asin.as_str()).collect();
        assert_eq!(ids, vec!["B0CPRNT001", "B0CPRNT002"]);
    }

    #[test]
    fn mixed_known_priced_and_unpriced() {
        let html = r#"
            <div data-asin="A100000001"><h2><span class="a-text-normal">Already Known Printer Model Z</span></h2><span class="a-offscreen">$99.00</span></div>
            <div data-asin="A200000002"><h2><span class="a-size-medium a-color-base a-text-normal">ACME X1 3D Printer FDM 220x220x250</span></h2><span class="a-price"><span class="a-offscreen">$199.99</span></span></div>
            <div data-asin="A300000003"><span class="a-icon-alt">4.1 out of 5 stars</span></div>"#;
        let known = KnownIdentifierSet::from_ids(["A100000001"]);
        let scan = scan_search_page(html, &QUERY, &known, 30);
        assert_eq!(scan.already_known, 1);
        assert_eq!(scan.dropped, 1);
        assert_eq!(scan.candidates.len(), 1);
        let c = &scan.candidates[0];
        assert_eq!(c.asin, "A200000002");
        assert_eq!(c.price, 199.99);
        assert_eq!(c.category, Category::Printer);
        assert_eq!(c.sub_type, SubType::Fdm);
    }
}
