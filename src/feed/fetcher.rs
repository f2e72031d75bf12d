use futures::StreamExt;
use rand::seq::IndexedRandom;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Default total request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const ACCEPT: &str = "application/rss+xml, application/atom+xml, application/xml, text/xml;q=0.9, */*;q=0.8";

/// Desktop browser identities rotated per request. Some hosts refuse
/// obvious bot user agents outright.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.4; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.2478.67",
];

/// Errors that can occur while retrieving a feed.
///
/// Every variant names the URL so a log line is enough to find the culprit.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, body read, etc.)
    #[error("could not open URL {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// HTTP response with non-2xx status code
    #[error("could not open URL {url}: HTTP status {status}")]
    HttpStatus { url: String, status: u16 },
    /// Request exceeded the configured timeout
    #[error("could not open URL {url}: request timed out")]
    Timeout { url: String },
    /// Response body exceeded the 10MB size limit
    #[error("could not read body of URL {url}: response too large")]
    ResponseTooLarge { url: String },
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("could not read body of URL {url}: expected {expected} bytes, received {received}")]
    IncompleteResponse {
        url: String,
        expected: u64,
        received: usize,
    },
    /// Local I/O failure in a fetcher that reads or writes files
    #[error("could not access cached copy of URL {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

/// Anything that can turn a source URL into raw feed bytes.
///
/// The aggregator only talks to this trait. Production code uses
/// [`HttpFetcher`]; tests plug in a closure, since every
/// `Fn(&str) -> Result<Vec<u8>, FetchError>` is a `Fetcher`.
pub trait Fetcher: Send + Sync {
    /// Retrieves the raw bytes behind `url`. Either the complete body or an
    /// error, never a partial body.
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;

    /// Whether `url` would be answered locally, without touching its host.
    /// Such fetches skip per-host rate limiting.
    fn is_cached(&self, _url: &str) -> bool {
        false
    }
}

impl<F> Fetcher for F
where
    F: Fn(&str) -> Result<Vec<u8>, FetchError> + Send + Sync,
{
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send {
        std::future::ready(self(url))
    }
}

/// Fetches feeds over HTTP(S) with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Builds a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let user_agent = USER_AGENTS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        let request = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| FetchError::Timeout { url: url.to_owned() })?
            .map_err(|e| network_error(url, e))?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_owned(),
                status: response.status().as_u16(),
            });
        }

        read_limited_bytes(url, response, MAX_FEED_SIZE).await
    }
}

fn network_error(url: &str, source: reqwest::Error) -> FetchError {
    if source.is_timeout() {
        FetchError::Timeout { url: url.to_owned() }
    } else {
        FetchError::Network {
            url: url.to_owned(),
            source,
        }
    }
}

async fn read_limited_bytes(
    url: &str,
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Capture Content-Length for completeness check
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge { url: url.to_owned() });
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| network_error(url, e))?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge { url: url.to_owned() });
        }
        bytes.extend_from_slice(&chunk);
    }

    // EDGE-005: A connection cut mid-body can still end the stream cleanly
    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                url: url.to_owned(),
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
