use url::Url;

/// A link pulled out of a feed, as it appears on a page.
///
/// Items are identified by `url` alone: two items with the same URL are the
/// same item regardless of title or tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Display text. Never empty once produced by the parser or page reader.
    pub title: String,
    /// Absolute URL, the deduplication key.
    pub url: String,
    /// Classification label derived from `url` (see [`tag_for_url`]).
    pub tag: String,
}

impl Item {
    /// Creates an untagged item.
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            tag: String::new(),
        }
    }

    /// Recomputes `tag` from the current URL.
    pub fn set_tag(&mut self) {
        self.tag = tag_for_url(&self.url);
    }

    /// Resolves a path-only URL (`/story/42`) against the feed it came from.
    ///
    /// URLs that do not start with `/` are left alone. If `feed_url` cannot be
    /// parsed the item is left unchanged.
    pub fn resolve_against(&mut self, feed_url: &str) {
        if !self.url.starts_with('/') {
            return;
        }
        let resolved = Url::parse(feed_url).and_then(|base| base.join(&self.url));
        match resolved {
            Ok(u) => self.url = u.to_string(),
            Err(e) => {
                tracing::debug!(url = %self.url, feed = %feed_url, error = %e, "Could not resolve relative item URL");
            }
        }
    }
}

/// Derives the display tag for an item URL.
///
/// Matching runs on the trimmed, lower-cased URL in this order:
///
/// 1. `reddit.com/r/<sub>` → `/r/<sub>`
/// 2. `slashdot.org/` → `Slashdot`
/// 3. `news.ycombinator` → `Hacker News`
/// 4. otherwise the host with any leading `www.` removed
///
/// An unparseable URL yields an empty tag.
///
/// # Examples
///
/// ```
/// use newsroll::feed::tag_for_url;
///
/// assert_eq!(tag_for_url("https://www.reddit.com/r/rust/comments/abc"), "/r/rust");
/// assert_eq!(tag_for_url("https://www.example.com/post"), "example.com");
/// ```
pub fn tag_for_url(raw: &str) -> String {
    const REDDIT: &str = "reddit.com/r/";

    let url = raw.trim().to_lowercase();
    if let Some(pos) = url.find(REDDIT) {
        let rest = &url[pos + REDDIT.len()..];
        let sub = rest.split('/').next().unwrap_or_default();
        return format!("/r/{}", sub);
    }
    if url.contains("slashdot.org/") {
        return "Slashdot".to_string();
    }
    if url.contains("news.ycombinator") {
        return "Hacker News".to_string();
    }
    match Url::parse(&url) {
        Ok(u) => {
            let host = u.host_str().unwrap_or_default();
            host.strip_prefix("www.").unwrap_or(host).to_string()
        }
        Err(_) => String::new(),
    }
}
