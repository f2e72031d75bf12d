use feed_rs::model::Entry;
use feed_rs::parser;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use url::Url;

use super::item::Item;
use crate::util::{strip_unprintable, url_slug};

/// Errors produced while turning raw bytes into items.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The bytes are not recognizable as RSS, Atom or JSON Feed.
    #[error("could not parse feed: {0}")]
    Feed(#[from] parser::ParseFeedError),
}

/// Parses raw feed bytes into items ordered **oldest to newest**.
///
/// Feeds list entries newest first, so the entries are reversed here. Callers
/// that walk the result from the back see the newest entry first.
///
/// - Unprintable characters are stripped before parsing.
/// - An RSS `<comments>` link wins over the entry link when present.
/// - Entries without any usable link are dropped.
/// - Blank titles fall back to a slug of the URL, then to the URL itself.
///
/// # Errors
///
/// Returns [`ParseError::Feed`] when the input is not a feed at all.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<Item>, ParseError> {
    let raw = String::from_utf8_lossy(bytes);
    let clean = strip_unprintable(&raw);

    let feed = parser::parse(clean.as_bytes())?;
    let feed_label = feed
        .links
        .first()
        .map(|l| l.href.clone())
        .or_else(|| feed.title.as_ref().map(|t| t.content.clone()))
        .unwrap_or_default();

    // Only trust the side channel when it lines up entry for entry
    let comments = rss_comment_links(&clean);
    let comments = if comments.len() == feed.entries.len() {
        comments
    } else {
        vec![None; feed.entries.len()]
    };

    let mut items: Vec<Item> = feed
        .entries
        .iter()
        .zip(comments)
        .filter_map(|(entry, comments)| {
            let url = comments
                .or_else(|| entry_link(entry).map(str::to_owned))
                .map(|u| normalize_link(&u))
                .filter(|u| !u.is_empty());
            let Some(url) = url else {
                tracing::debug!(feed = %feed_label, "Skipping item without a URL");
                return None;
            };

            let mut title = entry
                .title
                .as_ref()
                .map(|t| t.content.trim().to_owned())
                .unwrap_or_default();
            if title.is_empty() {
                title = url_slug(&url);
                if title.is_empty() {
                    title = url.clone();
                }
                tracing::debug!(feed = %feed_label, title = %title, "Using URL-derived title for untitled item");
            }

            Some(Item::new(title, url))
        })
        .collect();

    items.reverse();
    Ok(items)
}

/// Trims a link and, when it is absolute, re-serializes it through [`Url`] so
/// entry links and `<comments>` links are spelled the same way
/// (`https://b` becomes `https://b/`). Relative links are only trimmed.
fn normalize_link(raw: &str) -> String {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(url) => url.into(),
        Err(_) => raw.to_owned(),
    }
}

/// Picks the entry's article link: the first `alternate` (or rel-less) link,
/// else whatever link comes first.
fn entry_link(entry: &Entry) -> Option<&str> {
    entry
        .links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| entry.links.first())
        .map(|l| l.href.as_str())
}

/// Collects the unprefixed `<comments>` value of every RSS `<item>`, in
/// document order. Prefixed forms such as `slash:comments` hold counts, not
/// links, and never match.
///
/// Returns an empty list for Atom documents or anything quick-xml rejects.
fn rss_comment_links(xml: &str) -> Vec<Option<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().check_end_names = false;

    let mut links = Vec::new();
    let mut in_item = false;
    let mut in_comments = false;
    let mut current: Option<String> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"item" => {
                    in_item = true;
                    current = None;
                }
                b"comments" if in_item => {
                    in_comments = true;
                    text.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if e.name().as_ref() == b"item" => links.push(None),
            Ok(Event::Text(t)) if in_comments => match t.unescape() {
                Ok(s) => text.push_str(&s),
                Err(_) => text.push_str(&String::from_utf8_lossy(&t)),
            },
            Ok(Event::CData(c)) if in_comments => text.push_str(&String::from_utf8_lossy(&c)),
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"comments" if in_comments => {
                    in_comments = false;
                    let link = text.trim();
                    if !link.is_empty() {
                        current = Some(link.to_owned());
                    }
                }
                b"item" if in_item => {
                    in_item = false;
                    links.push(current.take());
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => return Vec::new(),
            _ => {}
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn urls(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.url.as_str()).collect()
    }

    #[test]
    fn test_rss_items_come_back_oldest_first() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title><link>https://example.com</link>
    <item><title>Newest</title><link>https://example.com/3</link></item>
    <item><title>Middle</title><link>https://example.com/2</link></item>
    <item><title>Oldest</title><link>https://example.com/1</link></item>
</channel></rss>"#;

        let items = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(
            urls(&items),
            vec![
                "https://example.com/1",
                "https://example.com/2",
                "https://example.com/3"
            ]
        );
        assert_eq!(items[0].title, "Oldest");
        assert!(items.iter().all(|i| i.tag.is_empty()));
    }

    #[test]
    fn test_comments_link_preferred() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>HN</title>
    <item>
        <title>Show HN</title>
        <link>https://article.example.com/post</link>
        <comments> https://news.ycombinator.com/item?id=99 </comments>
    </item>
    <item>
        <title>Plain</title>
        <link>https://article.example.com/other</link>
    </item>
</channel></rss>"#;

        let items = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(
            urls(&items),
            vec![
                "https://article.example.com/other",
                "https://news.ycombinator.com/item?id=99"
            ]
        );
    }

    #[test]
    fn test_comment_and_entry_links_normalized_alike() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
    <item><title>Discussed</title><link>https://a.example/x</link><comments>https://b.example</comments></item>
    <item><title>Bare host</title><link>https://c.example</link></item>
</channel></rss>"#;

        let items = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(
            urls(&items),
            vec!["https://c.example/", "https://b.example/"]
        );
    }

    #[test]
    fn test_prefixed_comment_count_ignored() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:slash="http://purl.org/rss/1.0/modules/slash/"><channel><title>S</title>
    <item>
        <title>Story</title>
        <link>https://example.com/story</link>
        <slash:comments>42</slash:comments>
    </item>
</channel></rss>"#;

        let items = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(urls(&items), vec!["https://example.com/story"]);
    }

    #[test]
    fn test_items_without_link_are_skipped() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
    <item><title>No link here</title></item>
    <item><title>Linked</title><link>https://example.com/a</link></item>
</channel></rss>"#;

        let items = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(urls(&items), vec!["https://example.com/a"]);
    }

    #[test]
    fn test_blank_title_falls_back_to_slug() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
    <item><title>   </title><link>https://example.com/posts/Why_Rust</link></item>
</channel></rss>"#;

        let items = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(items[0].title, "why-rust");
    }

    #[test]
    fn test_blank_title_with_unusable_slug_uses_url() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
    <item><link>https://example.com/%%%</link></item>
</channel></rss>"#;

        let items = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(items[0].title, "https://example.com/%%%");
    }

    #[test]
    fn test_atom_entries_use_alternate_link() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
    <title>Atom</title>
    <id>urn:feed</id>
    <updated>2024-01-01T00:00:00Z</updated>
    <entry>
        <title>Second</title>
        <id>urn:2</id>
        <updated>2024-01-02T00:00:00Z</updated>
        <link rel="replies" href="https://example.com/2#comments"/>
        <link rel="alternate" href="https://example.com/2"/>
    </entry>
    <entry>
        <title>First</title>
        <id>urn:1</id>
        <updated>2024-01-01T00:00:00Z</updated>
        <link href="https://example.com/1"/>
    </entry>
</feed>"#;

        let items = parse_feed(atom.as_bytes()).unwrap();
        assert_eq!(
            urls(&items),
            vec!["https://example.com/1", "https://example.com/2"]
        );
    }

    #[test]
    fn test_control_characters_are_tolerated() {
        let rss = "<?xml version=\"1.0\"?>\n<rss version=\"2.0\"><channel><title>T\u{1}</title>\
            <item><title>Bad\u{0}\u{b} byte</title><link>https://example.com/x</link></item>\
            </channel></rss>";

        let items = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(items[0].title, "Bad byte");
    }

    #[test]
    fn test_relative_links_are_kept_for_later_resolution() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
    <item><title>Rel</title><link>/story/42</link></item>
</channel></rss>"#;

        let items = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(items[0].url, "/story/42");
    }

    #[test]
    fn test_empty_channel_yields_no_items() {
        let rss = r#"<?xml version="1.0"?><rss version="2.0"><channel></channel></rss>"#;
        assert!(parse_feed(rss.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_not_a_feed_is_an_error() {
        assert!(parse_feed(b"<not valid xml").is_err());
        assert!(parse_feed(b"<html><body>hello</body></html>").is_err());
        assert!(parse_feed(b"").is_err());
    }

    #[test]
    fn test_comment_scan_counts_every_item() {
        let xml = r#"<rss><channel>
            <item><comments>https://c/1</comments></item>
            <item></item>
            <item><comments><![CDATA[https://c/3]]></comments></item>
        </channel></rss>"#;
        assert_eq!(
            rss_comment_links(xml),
            vec![
                Some("https://c/1".to_string()),
                None,
                Some("https://c/3".to_string())
            ]
        );
    }
}
