use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{CaptureMatches, Captures, Regex};
use tracing::trace;

static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,6});").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// A named extraction rule. Field rule sets are ordered slices of these.
pub struct Matcher {
    pub name: &'static str,
    re: Regex,
}

impl Matcher {
    pub fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            re: Regex::new(pattern).unwrap(),
        }
    }

    /// Every match of this rule in `hay`, in document order.
    pub fn matches<'h>(&self, hay: &'h str) -> CaptureMatches<'_, 'h> {
        self.re.captures_iter(hay)
    }

    /// First capture group of the first match.
    #[cfg(test)]
    pub fn first<'h>(&self, hay: &'h str) -> Option<&'h str> {
        self.re.captures(hay).and_then(|c| c.get(1)).map(|m| m.as_str())
    }
}

/// Ordered fallback: walk the rules in priority order, and each rule's matches in
/// document order, returning the first one `accept` turns into a value.
pub fn first_accepted<'h, T, F>(rules: &[Matcher], hay: &'h str, mut accept: F) -> Option<T>
where
    F: FnMut(&Captures<'h>) -> Option<T>,
{
    rules.iter().find_map(|rule| {
        rule.matches(hay)
            .find_map(|caps| accept(&caps))
            .inspect(|_| trace!(rule = rule.name, "rule accepted"))
    })
}

/// Decode the handful of HTML entities marketplace titles actually contain.
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    ENTITY_RE.replace_all(s, |caps: &Captures| {
        let ent = &caps[1];
        let decoded = match ent {
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "nbsp" => Some(' '),
            "trade" => Some('™'),
            "reg" => Some('®'),
            _ if ent.starts_with("#x") || ent.starts_with("#X") => {
                u32::from_str_radix(&ent[2..], 16).ok().and_then(char::from_u32)
            }
            _ if ent.starts_with('#') => ent[1..].parse::<u32>().ok().and_then(char::from_u32),
            _ => None,
        };
        decoded
            .map(|c| c.to_string())
            .unwrap_or_else(|| caps[0].to_string())
    })
}

/// Decode entities, collapse whitespace runs, trim.
pub fn clean_text(s: &str) -> String {
    let decoded = decode_entities(s);
    WS_RE.replace_all(decoded.trim(), " ").to_string()
}

/// Parse "1,234", "(1,234)", "2.5K" style counts.
pub fn parse_count(raw: &str) -> Option<u32> {
    let t = raw.trim().trim_matches(|c| c == '(' || c == ')').replace(',', "");
    if let Some(k) = t.strip_suffix(['K', 'k']) {
        let v: f64 = k.parse().ok()?;
        return (v >= 0.0).then(|| (v * 1000.0).round() as u32);
    }
    t.parse().ok()
}
