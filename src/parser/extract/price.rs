use std::sync::LazyLock;

use regex::Captures;

use super::matcher::{first_accepted, Matcher};

/// Opening tag of an off-screen price span, whatever else is on it.
const OFFSCREEN_OPEN: &str = r#"<span[^>]*class="[^"]*\ba-offscreen\b[^"]*"[^>]*>\s*"#;

/// "$1,299.00", "GBP £24.99": optional leading symbol, `,` thousands, `.` decimals.
/// Captures whole part and cents as groups 1 and 2.
const POINT_AMOUNT: &str = r"(?:[A-Z]{0,3}\s?[$€£¥])?\s*(\d{1,3}(?:,\d{3})+|\d+)\.(\d{2})";

/// "1.299,00 €", "199,99&nbsp;€": `.` or space thousands, `,` decimals, optional
/// trailing symbol. Captures whole part and cents as groups 3 and 4.
const COMMA_AMOUNT: &str = r"(?:[€£]\s?)?(\d{1,3}(?:[.\s]\d{3})+|\d+),(\d{2})(?:\s|&nbsp;)*(?:[€£]|EUR)?";

/// Search-card price: a formatted amount with exactly two decimals.
pub static SEARCH_PRICE: LazyLock<Matcher> = LazyLock::new(|| {
    Matcher::new(
        "offscreen-amount",
        &format!(r"{}(?:{}|{})\s*</span>", OFFSCREEN_OPEN, POINT_AMOUNT, COMMA_AMOUNT),
    )
});

/// Product-page price rules in priority order.
pub static PRODUCT_PRICE_MATCHERS: LazyLock<[Matcher; 3]> = LazyLock::new(|| {
    [
        Matcher::new(
            "core-price-offscreen",
            &format!(
                r#"(?s)id="corePrice[^"]*".{{0,1500}}?{}(?:{}|{})\s*</span>"#,
                OFFSCREEN_OPEN, POINT_AMOUNT, COMMA_AMOUNT
            ),
        ),
        Matcher::new(
            "whole-fraction",
            r#"<span class="a-price-whole">(\d{1,3}(?:[.,]\d{3})+|\d+)(?:<span class="a-price-decimal">[.,]</span>)?</span>\s*<span class="a-price-fraction">(\d{2})</span>"#,
        ),
        Matcher::new("json-price-amount", r#""priceAmount"\s*:\s*(\d+)(?:\.(\d{1,2}))?"#),
    ]
});

/// Phrases a product page shows when nothing can be bought.
const UNAVAILABLE_MARKERS: &[&str] = &[
    "Currently unavailable.",
    "We don't know when or if this item will be back in stock.",
    "This item cannot be shipped to your selected delivery location",
    "id=\"outOfStock\"",
];

fn to_price(whole: &str, cents: Option<&str>) -> Option<f64> {
    let digits: String = whole.chars().filter(char::is_ascii_digit).collect();
    let value: f64 = format!("{}.{}", digits, cents.unwrap_or("0")).parse().ok()?;
    (value > 0.0 && value.is_finite()).then_some(value)
}

/// Whole/cents from whichever amount grammar matched.
fn amount(caps: &Captures<'_>) -> Option<f64> {
    let (whole, cents) = match caps.get(1) {
        Some(w) => (w, caps.get(2)),
        None => (caps.get(3)?, caps.get(4)),
    };
    to_price(whole.as_str(), cents.map(|m| m.as_str()))
}

/// Price on one search-results card; `None` drops the item.
pub fn extract(span: &str) -> Option<f64> {
    first_accepted(std::slice::from_ref(&*SEARCH_PRICE), span, amount)
}

/// Current price on a product detail page.
pub fn extract_product(html: &str) -> Option<f64> {
    first_accepted(PRODUCT_PRICE_MATCHERS.as_slice(), html, amount)
}

pub fn is_unavailable(html: &str) -> bool {
    UNAVAILABLE_MARKERS.iter().any(|m| html.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_price_dollars() {
        let span = r#"<span class="a-price"><span class="a-offscreen">$199.99</span><span aria-hidden="true">"#;
        assert_eq!(extract(span), Some(199.99));
    }

    #[test]
    fn search_price_thousands_separator() {
        assert_eq!(extract(r#"<span class="a-offscreen">$1,299.00</span>"#), Some(1299.0));
    }

    #[test]
    fn search_price_needs_two_decimals() {
        assert_eq!(extract(r#"<span class="a-offscreen">$199</span>"#), None);
        assert_eq!(extract(r#"<span class="a-offscreen">$199.9</span>"#), None);
    }

    #[test]
    fn zero_price_dropped() {
        assert_eq!(extract(r#"<span class="a-offscreen">$0.00</span>"#), None);
    }

    #[test]
    fn zero_then_real_price() {
        let span = r#"<span class="a-offscreen">$0.00</span><span class="a-offscreen">$24.99</span>"#;
        assert_eq!(extract(span), Some(24.99));
    }

    #[test]
    fn missing_price() {
        assert_eq!(extract(r#"<span class="a-icon-alt">4.4 out of 5 stars</span>"#), None);
    }

    #[test]
    fn product_core_price_rule() {
        let html = r#"<div id="corePriceDisplay_desktop_feature_div"><div class="a-section"><span class="a-price"><span class="a-offscreen">$279.00</span>"#;
        assert_eq!(PRODUCT_PRICE_MATCHERS[0].first(html), Some("279"));
        assert_eq!(extract_product(html), Some(279.0));
    }

    #[test]
    fn product_whole_fraction_rule() {
        let html = r#"<span class="a-price-whole">1,049<span class="a-price-decimal">.</span></span><span class="a-price-fraction">95</span>"#;
        assert_eq!(PRODUCT_PRICE_MATCHERS[1].first(html), Some("1,049"));
        assert_eq!(extract_product(html), Some(1049.95));
    }

    #[test]
    fn product_json_rule() {
        let html = r#"<script>var data = {"priceAmount":18.5,"currencySymbol":"$"};</script>"#;
        assert_eq!(extract_product(html), Some(18.5));
    }

    #[test]
    fn product_rules_priority() {
        let html = r#"{"priceAmount":10.00}<div id="corePrice_feature_div"><span class="a-offscreen">$12.49</span></div>"#;
        assert_eq!(extract_product(html), Some(12.49));
    }

    #[test]
    fn offscreen_span_with_extra_attributes() {
        let span = r#"<span class="a-offscreen" aria-hidden="false">$199.99</span>"#;
        assert_eq!(extract(span), Some(199.99));
        let span = r#"<span data-a-size="xl" class="a-price-value a-offscreen">$24.49</span>"#;
        assert_eq!(extract(span), Some(24.49));
        assert_eq!(extract(r#"<span class="a-price-symbol">$24.49</span>"#), None);
    }

    #[test]
    fn decimal_comma_amounts() {
        assert_eq!(extract(r#"<span class="a-offscreen">199,99&nbsp;€</span>"#), Some(199.99));
        assert_eq!(extract(r#"<span class="a-offscreen">1.299,00 €</span>"#), Some(1299.0));
        assert_eq!(extract("<span class=\"a-offscreen\">1\u{a0}049,95\u{a0}€</span>"), Some(1049.95));
        assert_eq!(extract(r#"<span class="a-offscreen">€ 24,90</span>"#), Some(24.9));
    }

    #[test]
    fn decimal_comma_still_needs_two_decimals() {
        assert_eq!(extract(r#"<span class="a-offscreen">199,9 €</span>"#), None);
        assert_eq!(extract(r#"<span class="a-offscreen">$199,99</span>"#), None);
        assert_eq!(extract(r#"<span class="a-offscreen">1,299</span>"#), None);
    }

    #[test]
    fn product_prices_with_decimal_comma() {
        let html = r#"<div id="corePrice_feature_div"><span class="a-price"><span class="a-offscreen">279,00&nbsp;€</span>"#;
        assert_eq!(extract_product(html), Some(279.0));
        let html = r#"<span class="a-price-whole">1.049<span class="a-price-decimal">,</span></span><span class="a-price-fraction">95</span>"#;
        assert_eq!(extract_product(html), Some(1049.95));
    }

    #[test]
    fn unavailable_markers() {
        assert!(is_unavailable("<span>Currently unavailable.</span>"));
        assert!(!is_unavailable("<span>In Stock</span>"));
    }
}
