use crate::feed::parser::{parse_feed, ParseError, ParsedFeed};
use crate::util::{validate_feed_url, UrlValidationError};
use futures::StreamExt;
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

/// Sent as the `User-Agent` header on every feed request.
pub const USER_AGENT: &str = "gator";

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const MAX_REDIRECTS: usize = 5;

/// Per-fetch deadline used when the config does not set one.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while retrieving and decoding one feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The feed URL is not a usable http(s) URL
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the fetch deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Response body is not a well-formed RSS document
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// HTTP client for single-shot feed retrieval.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl FeedFetcher {
    /// Build a fetcher whose requests are abandoned after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .pool_idle_timeout(Duration::from_secs(30))
            .connect_timeout(timeout)
            .build()?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch `url` and parse the body as RSS.
    ///
    /// The response status is not inspected: an error page that happens to
    /// carry a valid feed is accepted, and anything else fails to parse.
    /// Nothing is retried; the next poll cycle is the retry.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] - URL is not http(s)
    /// - [`FetchError::Network`] - Connection or TLS errors
    /// - [`FetchError::Timeout`] - Request exceeded the fetcher's deadline
    /// - [`FetchError::ResponseTooLarge`] - Body exceeded 10MB
    /// - [`FetchError::Parse`] - Body is not a well-formed RSS document
    pub async fn fetch(&self, url: &str) -> Result<ParsedFeed, FetchError> {
        let url = validate_feed_url(url)?;

        let bytes = tokio::time::timeout(self.timeout, async {
            let response = self.client.get(url.as_str()).send().await?;
            if !response.status().is_success() {
                tracing::debug!(url = %url, status = %response.status(), "Non-success status, parsing body anyway");
            }
            read_limited_bytes(response, MAX_FEED_SIZE).await
        })
        .await
        .map_err(|_| FetchError::Timeout(self.timeout))?
        .map_err(|e| match e {
            FetchError::Network(err) if err.is_timeout() => FetchError::Timeout(self.timeout),
            other => other,
        })?;

        let feed = parse_feed(&bytes)?;
        tracing::debug!(url = %url, bytes = bytes.len(), items = feed.items.len(), "Fetched feed");
        Ok(feed)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Test Feed</title>
    <item><title>Test</title><link>https://example.com/1</link></item>
</channel></rss>"#;

    fn fetcher() -> FeedFetcher {
        FeedFetcher::new(DEFAULT_FETCH_TIMEOUT).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success_sends_user_agent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .and(header("user-agent", USER_AGENT))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/rss+xml"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let feed = fetcher()
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(feed.title, "Test Feed");
        assert_eq!(feed.items.len(), 1);
    }

    #[tokio::test]
    async fn test_error_status_with_feed_body_still_parses() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string(VALID_RSS))
            .expect(1) // No retry
            .mount(&mock_server)
            .await;

        let feed = fetcher()
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(feed.items[0].link, "https://example.com/1");
    }

    #[tokio::test]
    async fn test_404_without_feed_is_parse_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let result = fetcher()
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await;
        match result {
            Err(FetchError::Parse(_)) => {}
            other => panic!("Expected Parse error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_feed_parse_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<not valid xml"))
            .mount(&mock_server)
            .await;

        let result = fetcher()
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await;
        assert!(matches!(result, Err(FetchError::Parse(_))));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let result = fetcher().fetch("http://127.0.0.1:1/feed").await;
        assert!(matches!(result, Err(FetchError::Network(_))));
    }

    #[tokio::test]
    async fn test_invalid_urls_rejected_before_request() {
        for url in ["not a url", "ftp://example.com/feed.xml", "file:///etc/passwd"] {
            let result = fetcher().fetch(url).await;
            assert!(
                matches!(result, Err(FetchError::InvalidUrl(_))),
                "{} should be rejected",
                url
            );
        }
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let fetcher = FeedFetcher::new(Duration::from_millis(200)).unwrap();
        let result = fetcher
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await;
        match result {
            Err(FetchError::Timeout(limit)) => assert_eq!(limit, Duration::from_millis(200)),
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 2048]))
            .mount(&mock_server)
            .await;

        let response = reqwest::get(format!("{}/feed", mock_server.uri()))
            .await
            .unwrap();
        let result = read_limited_bytes(response, 1024).await;
        assert!(matches!(result, Err(FetchError::ResponseTooLarge)));
    }
}
