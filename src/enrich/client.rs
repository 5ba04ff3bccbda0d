//! Image fetching with per-host request headers.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use regex::Regex;
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, ORIGIN, REFERER};
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

/// Browser User-Agent sent with every image request; some covers hosts
/// reject non-browser agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Default whole-request timeout.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Default TCP/TLS connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Responses larger than this are not decoded.
pub const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8";

const AMAZON_HOSTS: [&str; 4] = [
    "amazon.com",
    "amazon.co.uk",
    "images-na.ssl-images-amazon.com",
    "m.media-amazon.com",
];

#[allow(clippy::expect_used)]
static IMAGE_EXTENSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(jpg|jpeg|png|gif|webp)$").expect("image extension regex is valid")
});

/// Why an image could not be fetched. Every variant means "no result" for
/// the record; none of them stops the batch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid image URL: {url}")]
    InvalidUrl { url: String },

    /// Known non-image URL; no request was made.
    #[error("skipped {url}: {reason}")]
    Skipped { url: String, reason: &'static str },

    #[error("timeout fetching {url}")]
    Timeout { url: String },

    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("image at {url} is too large ({bytes} bytes)")]
    TooLarge { url: String, bytes: u64 },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// Anything that can turn an image URL into its raw bytes.
///
/// The enrichment worker is generic over this so tests can count and
/// throttle fetches without a network.
#[async_trait]
pub trait ImageSource: Send + Sync + 'static {
    /// Fetches the body at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] for any failure; callers treat it as no result.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Timeouts and body cap for [`ImageClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Bodies past this many bytes are abandoned mid-stream.
    pub max_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            max_bytes: MAX_IMAGE_BYTES,
        }
    }
}

/// Reqwest-backed [`ImageSource`].
#[derive(Debug, Clone)]
pub struct ImageClient {
    client: Client,
    max_bytes: u64,
}

impl ImageClient {
    /// Builds a client with the given timeouts and the browser User-Agent.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if reqwest cannot build the client.
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .gzip(true)
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }
}

#[async_trait]
impl ImageSource for ImageClient {
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl {
            url: url.to_string(),
        })?;
        if let Some(reason) = skip_reason(&parsed) {
            return Err(FetchError::Skipped {
                url: url.to_string(),
                reason,
            });
        }

        let response = self
            .client
            .get(parsed.clone())
            .headers(request_headers(&parsed))
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(bytes) = response.content_length()
            && bytes > self.max_bytes
        {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                bytes,
            });
        }

        // Content-Length is absent on chunked responses; enforce the cap as
        // the body arrives.
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| FetchError::from_reqwest(url, e))?;
            let received = body.len() as u64 + chunk.len() as u64;
            if received > self.max_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    bytes: received,
                });
            }
            body.extend_from_slice(&chunk);
        }
        debug!(bytes = body.len(), "image fetched");
        Ok(body)
    }
}

/// Returns why `url` should not be requested at all, if it should not.
///
/// Amazon UK links without an image extension are product pages, not covers.
#[must_use]
pub fn skip_reason(url: &Url) -> Option<&'static str> {
    let host = url.host_str()?;
    if host_matches(host, "amazon.co.uk") && !IMAGE_EXTENSION.is_match(url.path()) {
        return Some("not an image file");
    }
    None
}

/// Extra headers for `url`, chosen by host. The User-Agent is set on the
/// client and is not repeated here.
#[must_use]
pub fn request_headers(url: &Url) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let Some(host) = url.host_str() else {
        return headers;
    };

    if host_matches(host, "goodreads.com") {
        headers.insert(REFERER, HeaderValue::from_static("https://www.goodreads.com/"));
    } else if AMAZON_HOSTS.iter().any(|domain| host_matches(host, domain)) {
        headers.insert(REFERER, HeaderValue::from_static("https://www.amazon.com/"));
        headers.insert(ORIGIN, HeaderValue::from_static("https://www.amazon.com"));
        headers.insert(ACCEPT, HeaderValue::from_static(IMAGE_ACCEPT));
    }
    headers
}

/// True when `host` is `domain` or one of its subdomains.
fn host_matches(host: &str, domain: &str) -> bool {
    host.strip_suffix(domain)
        .is_some_and(|rest| rest.is_empty() || rest.ends_with('.'))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_goodreads_gets_referer_only() {
        let headers = request_headers(&url("https://images.gr-assets.goodreads.com/books/1.jpg"));
        assert_eq!(headers[REFERER], "https://www.goodreads.com/");
        assert!(headers.get(ORIGIN).is_none());
        assert!(headers.get(ACCEPT).is_none());
    }

    #[test]
    fn test_amazon_hosts_get_origin_and_accept() {
        for host in [
            "https://www.amazon.com/x.jpg",
            "https://amazon.co.uk/x.jpg",
            "https://images-na.ssl-images-amazon.com/images/I/x.jpg",
            "https://m.media-amazon.com/images/I/x.jpg",
        ] {
            let headers = request_headers(&url(host));
            assert_eq!(headers[REFERER], "https://www.amazon.com/", "{host}");
            assert_eq!(headers[ORIGIN], "https://www.amazon.com", "{host}");
            assert_eq!(headers[ACCEPT], IMAGE_ACCEPT, "{host}");
        }
    }

    #[test]
    fn test_other_hosts_get_no_extra_headers() {
        assert!(request_headers(&url("https://covers.example.org/a.png")).is_empty());
        assert!(request_headers(&url("https://notamazon.com/a.png")).is_empty());
    }

    #[test]
    fn test_amazon_uk_product_pages_are_skipped() {
        assert_eq!(
            skip_reason(&url("https://www.amazon.co.uk/dp/0441172717")),
            Some("not an image file")
        );
        assert_eq!(skip_reason(&url("https://www.amazon.co.uk/images/cover.JPG")), None);
        assert_eq!(skip_reason(&url("https://www.amazon.com/dp/0441172717")), None);
    }

    #[test]
    fn test_host_matches_subdomains_only() {
        assert!(host_matches("goodreads.com", "goodreads.com"));
        assert!(host_matches("i.goodreads.com", "goodreads.com"));
        assert!(!host_matches("evilgoodreads.com", "goodreads.com"));
    }

    #[test]
    fn test_client_builds_with_default_config() {
        assert!(ImageClient::new(FetchConfig::default()).is_ok());
    }
}
