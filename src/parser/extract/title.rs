use std::sync::LazyLock;

use regex::Regex;

use super::matcher::{clean_text, first_accepted, Matcher};

const MIN_TITLE_CHARS: usize = 10;

/// Listing-card chrome that lands in title-shaped markup.
const BOILERPLATE: &[&str] = &[
    "check each product",
    "buying options",
    "sponsored",
    "best seller",
];

static STARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\d(?:\.\d)?\s+out\s+of\s+5\s+stars").unwrap());
static NUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\s\d.,%()+\-$€£¥]+$").unwrap());

/// Title rules in priority order.
pub static TITLE_MATCHERS: LazyLock<[Matcher; 3]> = LazyLock::new(|| {
    [
        // <h2 ...><a ...><span class="a-size-medium a-color-base a-text-normal">…</span>
        // The span must sit inside the heading: no `</h` between the two.
        Matcher::new(
            "styled-normal-text",
            r#"<h2\b[^>]*>(?:[^<]|<[^/]|</[^h])*?<span[^>]*class="[^"]*\ba-text-normal\b[^"]*"[^>]*>([^<]+)</span>"#,
        ),
        Matcher::new("aria-label", r#"<(?:a|h2)\b[^>]*\baria-label="([^"]+)""#),
        Matcher::new("heading-span", r#"<h2[^>]*>\s*(?:<a[^>]*>\s*)?<span[^>]*>([^<]+)</span>"#),
    ]
});

/// True when `title` is listing chrome or noise rather than a product name.
pub fn is_garbage(title: &str) -> bool {
    if title.chars().count() < MIN_TITLE_CHARS {
        return true;
    }
    if NUMERIC_RE.is_match(title) || STARS_RE.is_match(title) {
        return true;
    }
    let lower = title.to_lowercase();
    BOILERPLATE.iter().any(|b| lower.contains(b))
}

/// First non-garbage title across all rules, cleaned.
pub fn extract(span: &str) -> Option<String> {
    first_accepted(TITLE_MATCHERS.as_slice(), span, |caps| {
        let title = clean_text(caps.get(1)?.as_str());
        (!is_garbage(&title)).then_some(title)
    })
}
