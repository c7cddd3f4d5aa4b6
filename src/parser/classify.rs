/// Bodies shorter than this are never real result pages.
pub const MIN_USABLE_BODY: usize = 5000;

/// Substrings that only appear on the marketplace's bot-challenge pages.
const CHALLENGE_MARKERS: &[&str] = &[
    "/errors/validateCaptcha",
    "Type the characters you see in this image",
    "Enter the characters you see below",
    "Sorry, we just need to make sure you're not a robot",
    "api-services-support@amazon.com",
    "<title dir=\"ltr\">Robot Check</title>",
    "captcha-delivery.com",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    Challenge(&'static str),
    TooSmall(usize),
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::Challenge(marker) => write!(f, "challenge page ({})", marker),
            BlockReason::TooSmall(len) => write!(f, "body too small ({} chars)", len),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageClass {
    Blocked(BlockReason),
    HttpError(u16),
    Usable,
}

/// Decide whether a fetched page can be handed to the segmenter.
///
/// Blocked wins over HTTP error: challenge markers first (the marketplace serves
/// its robot check with a 503), then any body under [`MIN_USABLE_BODY`] whatever
/// its status. Only a full-size non-2xx page is an HTTP error.
pub fn classify(status: u16, body: &str) -> PageClass {
    if let Some(marker) = CHALLENGE_MARKERS.iter().find(|m| body.contains(*m)) {
        return PageClass::Blocked(BlockReason::Challenge(marker));
    }
    let len = body.chars().count();
    if len < MIN_USABLE_BODY {
        return PageClass::Blocked(BlockReason::TooSmall(len));
    }
    if !(200..300).contains(&status) {
        return PageClass::HttpError(status);
    }
    PageClass::Usable
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(inner: &str) -> String {
        format!("<html><body>{}{}</body></html>", inner, " ".repeat(MIN_USABLE_BODY))
    }

    #[test]
    fn captcha_page_is_blocked_even_with_200() {
        let body = padded("<form action=\"/errors/validateCaptcha\"></form>");
        assert!(matches!(classify(200, &body), PageClass::Blocked(BlockReason::Challenge(_))));
    }

    #[test]
    fn robot_check_503_is_blocked_not_http_error() {
        let body = "<p>Sorry, we just need to make sure you're not a robot.</p>";
        assert!(matches!(classify(503, body), PageClass::Blocked(_)));
    }

    #[test]
    fn small_body_is_blocked() {
        assert_eq!(
            classify(200, "<html></html>"),
            PageClass::Blocked(BlockReason::TooSmall(13))
        );
    }

    #[test]
    fn non_success_status() {
        assert_eq!(classify(404, &padded("not found")), PageClass::HttpError(404));
        assert_eq!(classify(500, &padded("server error")), PageClass::HttpError(500));
    }

    #[test]
    fn small_error_body_is_blocked_not_http_error() {
        assert_eq!(classify(500, ""), PageClass::Blocked(BlockReason::TooSmall(0)));
        assert_eq!(
            classify(403, "<html>Forbidden</html>"),
            PageClass::Blocked(BlockReason::TooSmall(22))
        );
    }

    #[test]
    fn normal_page_is_usable() {
        assert_eq!(classify(200, &padded("<div data-asin=\"B0ABCDEF12\"></div>")), PageClass::Usable);
    }
}
