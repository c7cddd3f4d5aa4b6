use std::sync::LazyLock;

use super::matcher::{first_accepted, parse_count, Matcher};

pub static RATING_MATCHERS: LazyLock<[Matcher; 2]> = LazyLock::new(|| {
    [
        Matcher::new("icon-alt", r#"<span class="a-icon-alt">(\d(?:\.\d)?) out of 5 stars"#),
        Matcher::new("aria-stars", r#"aria-label="(\d(?:\.\d)?) out of 5 stars"#),
    ]
});

pub static REVIEW_COUNT_MATCHERS: LazyLock<[Matcher; 2]> = LazyLock::new(|| {
    [
        Matcher::new("aria-ratings", r#"aria-label="([\d,.]+[Kk]?) (?:global )?(?:ratings?|reviews?)""#),
        Matcher::new("underline-count", r#"<span class="a-size-base s-underline-text">\(?([\d,.]+[Kk]?)\)?</span>"#),
    ]
});

/// Star rating in 0.0..=5.0, if the card shows one.
pub fn extract_rating(span: &str) -> Option<f32> {
    first_accepted(RATING_MATCHERS.as_slice(), span, |caps| {
        let v: f32 = caps.get(1)?.as_str().parse().ok()?;
        (0.0..=5.0).contains(&v).then_some(v)
    })
}

pub fn extract_review_count(span: &str) -> Option<u32> {
    first_accepted(REVIEW_COUNT_MATCHERS.as_slice(), span, |caps| parse_count(caps.get(1)?.as_str()))
}
