use std::collections::HashSet;
use std::sync::LazyLock;

use regex::{CaptureMatches, Regex};

/// Item marker on a search-results page: a ten-character listing code.
static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-asin="([A-Z0-9]{10})""#).unwrap());

/// One listing's slice of the results page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemBlock<'a> {
    pub asin: &'a str,
    pub span: &'a str,
}

/// Lazily yields one [`ItemBlock`] per distinct identifier, in page order.
///
/// A block runs from its marker to the next marker (or end of document). A
/// listing that appears twice (sponsored + organic) is emitted once, with the
/// span of its first appearance.
pub struct ItemBlocks<'a> {
    html: &'a str,
    markers: std::iter::Peekable<CaptureMatches<'static, 'a>>,
    seen: HashSet<&'a str>,
}

impl<'a> Iterator for ItemBlocks<'a> {
    type Item = ItemBlock<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let caps = self.markers.next()?;
            let whole = caps.get(0)?;
            let asin = caps.get(1)?.as_str();
            let end = self
                .markers
                .peek()
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(self.html.len());

            if !self.seen.insert(asin) {
                continue;
            }
            return Some(ItemBlock {
                asin,
                span: &self.html[whole.start()..end],
            });
        }
    }
}

pub fn split_items(html: &str) -> ItemBlocks<'_> {
    ItemBlocks {
        html,
        markers: MARKER_RE.captures_iter(html).peekable(),
        seen: HashSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_block_per_marker() {
        let html = r#"<div data-asin="A000000001">one</div><div data-asin="A000000002">two</div>"#;
        let blocks: Vec<_> = split_items(html).collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].asin, "A000000001");
        assert_eq!(blocks[0].span, r#"data-asin="A000000001">one</div><div "#);
        assert_eq!(blocks[1].span, r#"data-asin="A000000002">two</div>"#);
    }

    #[test]
    fn duplicate_listing_emitted_once() {
        let html = r#"<div data-asin="A000000001">sponsored</div>
            <div data-asin="A000000002">other</div>
            <div data-asin="A000000001">organic</div>"#;
        let ids: Vec<_> = split_items(html).map(|b| b.asin).collect();
        assert_eq!(ids, vec!["A000000001", "A000000002"]);
        let first = split_items(html).next().unwrap();
        assert!(first.span.contains("sponsored"));
        assert!(!first.span.contains("organic"));
    }

    #[test]
    fn empty_and_malformed_markers_ignored() {
        let html = r#"<div data-asin="">x</div><div data-asin="short">y</div><div data-asin="B0ABCDEF12">z</div>"#;
        let ids: Vec<_> = split_items(html).map(|b| b.asin).collect();
        assert_eq!(ids, vec!["B0ABCDEF12"]);
    }

    #[test]
    fn no_markers_no_blocks() {
        assert_eq!(split_items("<html><body>nothing</body></html>").count(), 0);
    }

    #[test]
    fn last_block_runs_to_end() {
        let html = r#"<div data-asin="B0ABCDEF12"><h2>title</h2></div></body></html>"#;
        let block = split_items(html).next().unwrap();
        assert!(block.span.ends_with("</html>"));
    }

    #[test]
    fn search_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/search_printers.html").unwrap();
        let ids: Vec<_> = split_items(&html).map(|b| b.asin).collect();
        assert_eq!(ids, vec!["B0CPRNT001", "B0CPRNT002", "B0CPRNT003", "B0CPRNT004"]);
    }
}
