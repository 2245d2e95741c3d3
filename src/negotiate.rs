//! Client classification from request headers.

use axum::http::{HeaderMap, header};

/// Text-mode browsers that do not advertise HTML in `Accept`.
/// Matched case-insensitively against the start of `User-Agent`.
const TEXT_BROWSERS: &[&str] = &["lynx", "links", "elinks", "w3m", "dillo", "netsurf"];

/// What representation a client wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCapability {
    /// E-reader or feed client: gets OPDS/Atom.
    OpdsFeedClient,
    /// Web browser: gets HTML.
    BrowserClient,
}

impl ClientCapability {
    /// Classify from raw header values.
    ///
    /// An empty or wildcard `Accept` counts as a feed client since readers
    /// commonly send `*/*`.
    pub fn classify(accept: Option<&str>, user_agent: Option<&str>) -> Self {
        if accept.is_some_and(|a| a.to_ascii_lowercase().contains("html")) {
            return Self::BrowserClient;
        }

        if let Some(agent) = user_agent {
            let agent = agent.trim_start().to_ascii_lowercase();
            if TEXT_BROWSERS.iter().any(|b| agent.starts_with(b)) {
                return Self::BrowserClient;
            }
        }

        Self::OpdsFeedClient
    }

    /// Classify a request by its headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let value = |name: header::HeaderName| headers.get(name).and_then(|v| v.to_str().ok());
        Self::classify(value(header::ACCEPT), value(header::USER_AGENT))
    }

    /// Whether the client gets HTML.
    pub fn is_browser(self) -> bool {
        self == Self::BrowserClient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn html_accept_is_browser() {
        assert_eq!(
            ClientCapability::classify(
                Some("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
                Some("Mozilla/5.0")
            ),
            ClientCapability::BrowserClient
        );
    }

    #[test]
    fn wildcard_accept_is_feed_client() {
        assert_eq!(
            ClientCapability::classify(Some("*/*"), Some("KOReader/2024.04")),
            ClientCapability::OpdsFeedClient
        );
        assert_eq!(
            ClientCapability::classify(None, None),
            ClientCapability::OpdsFeedClient
        );
        assert_eq!(
            ClientCapability::classify(Some(""), None),
            ClientCapability::OpdsFeedClient
        );
    }

    #[test]
    fn text_browsers_by_user_agent() {
        for agent in [
            "w3m/0.5.3",
            "Lynx/2.9.0 libwww-FM/2.14",
            "ELinks/0.13",
            "Links (2.29; Linux)",
        ] {
            assert_eq!(
                ClientCapability::classify(Some("*/*"), Some(agent)),
                ClientCapability::BrowserClient,
                "{agent}"
            );
        }
    }

    #[test]
    fn from_headers_reads_accept() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("TEXT/HTML"));
        assert!(ClientCapability::from_headers(&headers).is_browser());

        let headers = HeaderMap::new();
        assert!(!ClientCapability::from_headers(&headers).is_browser());
    }
}
