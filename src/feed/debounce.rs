use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Default minimum spacing between two requests to the same host.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(30);

/// Spaces out requests that target the same host.
///
/// Several registered sources often live on one site (a handful of
/// subreddits, say). Visiting them back to back would look like a flood, so
/// each host gets at most one request per `min_interval`.
///
/// State lives in the instance only and starts empty on every process start.
#[derive(Debug)]
pub struct HostDebouncer {
    min_interval: Duration,
    last_access: HashMap<String, Instant>,
}

impl HostDebouncer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_access: HashMap::new(),
        }
    }

    /// Sleeps until `url`'s host may be contacted again, records the access
    /// and hands the URL back unchanged.
    ///
    /// URLs without a parseable host are never delayed.
    pub async fn wait<'a>(&mut self, url: &'a str) -> &'a str {
        let host = match Url::parse(url) {
            Ok(u) => match u.host_str() {
                Some(host) => host.to_owned(),
                None => return url,
            },
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Could not parse URL, fetching without rate limit");
                return url;
            }
        };

        if let Some(last) = self.last_access.get(&host) {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let remaining = self.min_interval - elapsed;
                tracing::debug!(
                    url = %url,
                    wait_secs = remaining.as_secs_f64(),
                    "Waiting before requesting from same host"
                );
                tokio::time::sleep(remaining).await;
            }
        }

        self.last_access.insert(host, Instant::now());
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn test_first_request_is_immediate() {
        let mut debouncer = HostDebouncer::new(INTERVAL);
        let start = Instant::now();

        let url = debouncer.wait("https://www.reddit.com/r/rust/.rss").await;

        assert_eq!(url, "https://www.reddit.com/r/rust/.rss");
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_host_waits_for_remaining_interval() {
        let mut debouncer = HostDebouncer::new(INTERVAL);

        debouncer.wait("https://www.reddit.com/r/rust/.rss").await;
        tokio::time::advance(Duration::from_secs(10)).await;

        let start = Instant::now();
        debouncer.wait("https://www.reddit.com/r/golang/.rss").await;

        assert!(start.elapsed() >= Duration::from_secs(20));
        assert!(start.elapsed() < INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_hosts_do_not_wait() {
        let mut debouncer = HostDebouncer::new(INTERVAL);
        let start = Instant::now();

        debouncer.wait("https://www.reddit.com/r/rust/.rss").await;
        debouncer.wait("https://news.ycombinator.com/rss").await;
        debouncer.wait("https://lobste.rs/rss").await;

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_interval_elapsed() {
        let mut debouncer = HostDebouncer::new(INTERVAL);

        debouncer.wait("https://example.com/a.xml").await;
        tokio::time::advance(INTERVAL + Duration::from_secs(1)).await;

        let start = Instant::now();
        debouncer.wait("https://example.com/b.xml").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_url_fails_open() {
        let mut debouncer = HostDebouncer::new(INTERVAL);
        let start = Instant::now();

        assert_eq!(debouncer.wait("not a url").await, "not a url");
        assert_eq!(debouncer.wait("not a url").await, "not a url");

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_never_waits() {
        let mut debouncer = HostDebouncer::new(Duration::ZERO);
        let start = Instant::now();

        for _ in 0..5 {
            debouncer.wait("https://example.com/rss").await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
