use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{Page, SourceRegistry};
use crate::feed::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnchorKind {
    Item,
    Feed,
}

/// HTML elements that never get an end tag.
const VOID_ELEMENTS: &[&[u8]] = &[
    b"area", b"base", b"br", b"col", b"embed", b"hr", b"img", b"input", b"link", b"meta",
    b"source", b"track", b"wbr",
];

/// An `<a class="item|feed">` element being read.
struct OpenAnchor {
    kind: AnchorKind,
    href: String,
    text: String,
    /// Open elements inside a `.tag` decoration, whose text is not part of the title.
    skip_depth: usize,
}

/// Reads items and sources back out of a rendered page.
///
/// Items are `<a class="item" href=...>` elements, returned in document
/// order; any `.tag` element inside them is ignored when reading the title.
/// Sources are `<a class="feed" href=...>` elements.
///
/// The reader is lenient: mismatched or stray end tags are accepted, unquoted
/// and valueless attributes are read the HTML way, void elements such as
/// `<br>` need no end tag and unknown HTML entities are decoded, so
/// hand-edited and custom-template pages load too. An empty document yields
/// an empty page.
pub fn parse_page(content: &str) -> Result<Page, quick_xml::Error> {
    let mut reader = Reader::from_str(content);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut items = Vec::new();
    let mut sources = SourceRegistry::new();
    let mut open: Option<OpenAnchor> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if let Some(anchor) = open.as_mut() {
                    if is_void(e.name().as_ref()) {
                        continue;
                    }
                    if anchor.skip_depth > 0
                        || (anchor.kind == AnchorKind::Item && has_class(&e, "tag"))
                    {
                        anchor.skip_depth += 1;
                    }
                } else if e.name().as_ref() == b"a" {
                    open = open_anchor(&e);
                }
            }
            Event::Empty(e) if open.is_none() && e.name().as_ref() == b"a" => {
                if let Some(anchor) = open_anchor(&e) {
                    close_anchor(anchor, &mut items, &mut sources);
                }
            }
            Event::Text(t) => {
                if let Some(anchor) = open.as_mut().filter(|a| a.skip_depth == 0) {
                    let raw = String::from_utf8_lossy(&t);
                    anchor.text.push_str(&html_escape::decode_html_entities(&raw));
                }
            }
            Event::CData(c) => {
                if let Some(anchor) = open.as_mut().filter(|a| a.skip_depth == 0) {
                    anchor.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(e) => {
                let closes = match open.as_mut() {
                    Some(anchor) if anchor.skip_depth > 0 => {
                        if !is_void(e.name().as_ref()) {
                            anchor.skip_depth -= 1;
                        }
                        false
                    }
                    Some(_) => e.name().as_ref() == b"a",
                    None => false,
                };
                if closes {
                    if let Some(anchor) = open.take() {
                        close_anchor(anchor, &mut items, &mut sources);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(Page { items, sources })
}

fn open_anchor(e: &BytesStart<'_>) -> Option<OpenAnchor> {
    let kind = if has_class(e, "item") {
        AnchorKind::Item
    } else if has_class(e, "feed") {
        AnchorKind::Feed
    } else {
        return None;
    };
    Some(OpenAnchor {
        kind,
        href: attribute(e, b"href").unwrap_or_default(),
        text: String::new(),
        skip_depth: 0,
    })
}

fn close_anchor(anchor: OpenAnchor, items: &mut Vec<Item>, sources: &mut SourceRegistry) {
    let href = anchor.href.trim();
    if href.is_empty() {
        tracing::debug!(text = %anchor.text.trim(), "Ignoring page link without href");
        return;
    }
    let text = anchor.text.trim();
    match anchor.kind {
        AnchorKind::Item => {
            let title = if text.is_empty() { href } else { text };
            let mut item = Item::new(title, href);
            item.set_tag();
            items.push(item);
        }
        AnchorKind::Feed => {
            sources.insert(href.to_owned(), text.to_owned());
        }
    }
}

fn is_void(name: &[u8]) -> bool {
    VOID_ELEMENTS.iter().any(|void| name.eq_ignore_ascii_case(void))
}

fn has_class(e: &BytesStart<'_>, class: &str) -> bool {
    attribute(e, b"class")
        .map(|v| v.split_ascii_whitespace().any(|c| c == class))
        .unwrap_or(false)
}

/// Attribute value with entities decoded.
///
/// Parsed in HTML mode, so `href=https://x.org/` and bare `hidden` count.
/// Attributes that are still malformed are skipped.
fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.html_attributes()
        .filter_map(Result::ok)
        .find(|a| a.key.as_ref() == name)
        .map(|a| {
            let raw = String::from_utf8_lossy(&a.value);
            html_escape::decode_html_entities(&raw).into_owned()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::template::{PageView, Template};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_document() {
        let page = parse_page("").unwrap();
        assert!(page.items.is_empty());
        assert!(page.sources.is_empty());
    }

    #[test]
    fn test_round_trip_with_default_template() {
        let mut items = vec![
            Item::new("Newest & best", "https://www.reddit.com/r/rust/comments/1"),
            Item::new("Quoted \"title\" <b>", "https://example.com/?a=1&b=2"),
            Item::new("Plain", "https://news.ycombinator.com/item?id=3"),
        ];
        for item in &mut items {
            item.set_tag();
        }
        let sources = SourceRegistry::from([
            ("https://a.example/rss".to_string(), "A & Co".to_string()),
            ("https://b.example/atom".to_string(), "B".to_string()),
        ]);

        let html = Template::default().render(&PageView {
            items: &items,
            sources: &sources,
            next_page: 5,
        });
        let page = parse_page(&html).unwrap();

        assert_eq!(page.items, items);
        assert_eq!(page.sources, sources);
    }

    #[test]
    fn test_tag_markup_is_not_part_of_title() {
        let html = r#"<a class="item" href="https://x.org/1"><div class="tag">x.org<span>extra</span></div>Real title</a>"#;
        let page = parse_page(html).unwrap();
        assert_eq!(page.items[0].title, "Real title");
        assert_eq!(page.items[0].tag, "x.org");
    }

    #[test]
    fn test_hand_written_html_is_tolerated() {
        let html = r#"<!DOCTYPE html>
<html><head><meta charset="UTF-8"><title>Mine</title></head>
<body>
<p>Intro &nbsp; text<br>
<a class="feed" href="https://lobste.rs/rss">Lobsters&nbsp;</a>
<a class="item big" href="https://lobste.rs/s/abc">Caf&eacute; <em>news</em></a>
<a href="https://elsewhere.example">not an item</a>
</body></html>"#;

        let page = parse_page(html).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].title, "Café news");
        assert_eq!(page.items[0].tag, "lobste.rs");
        assert_eq!(page.sources.len(), 1);
        assert_eq!(page.sources["https://lobste.rs/rss"], "Lobsters");
    }

    #[test]
    fn test_unquoted_and_bare_attributes() {
        let html = r#"<body>
<a class=feed href=https://added.example/rss>Added</a>
<a hidden class="item" href=https://added.example/post/1>First post</a>
</body>"#;
        let page = parse_page(html).unwrap();
        assert_eq!(page.sources["https://added.example/rss"], "Added");
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].url, "https://added.example/post/1");
        assert_eq!(page.items[0].title, "First post");
    }

    #[test]
    fn test_void_element_inside_tag_does_not_swallow_next_item() {
        let html = r#"<a class="item" href="https://x.org/1"><span class="tag">t<br></span>One</a><a class="item" href="https://x.org/2">Two</a>"#;
        let page = parse_page(html).unwrap();
        let got: Vec<_> = page
            .items
            .iter()
            .map(|i| (i.url.as_str(), i.title.as_str()))
            .collect();
        assert_eq!(got, vec![("https://x.org/1", "One"), ("https://x.org/2", "Two")]);
    }

    #[test]
    fn test_void_element_with_tag_class_is_ignored() {
        let html = r#"<a class="item" href="https://x.org/1"><img class="tag" src="t.png">One</a><a class="item" href="https://x.org/2">Two</a>"#;
        let page = parse_page(html).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].title, "One");
    }

    #[test]
    fn test_item_without_title_uses_url() {
        let page = parse_page(r#"<a class="item" href="https://x.org/1"></a>"#).unwrap();
        assert_eq!(page.items[0].title, "https://x.org/1");
    }

    #[test]
    fn test_links_without_href_are_dropped() {
        let html = r#"<a class="item">orphan</a><a class="feed">nowhere</a>"#;
        let page = parse_page(html).unwrap();
        assert!(page.items.is_empty());
        assert!(page.sources.is_empty());
    }

    #[test]
    fn test_document_order_is_kept() {
        let html = r#"<a class="item" href="https://x.org/3">3</a>
<a class="item" href="https://x.org/1">1</a>
<a class="item" href="https://x.org/2">2</a>"#;
        let page = parse_page(html).unwrap();
        let titles: Vec<_> = page.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["3", "1", "2"]);
    }
}
