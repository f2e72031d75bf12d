use std::path::{Path, PathBuf};
use thiserror::Error;

use super::SourceRegistry;
use crate::feed::Item;

/// Slots every usable template must contain. Without them a rendered page
/// could not be read back.
const REQUIRED_SLOTS: [&str; 2] = ["items", "sources"];

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("could not read template {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template {} has no {{{{{slot}}}}} slot", path.display())]
    MissingSlot { path: PathBuf, slot: &'static str },
}

/// What a page renders: the items in display order, the hidden source list,
/// and the number of the page the "Next" link points at (`<= 1` for none).
#[derive(Debug, Clone, Copy)]
pub struct PageView<'a> {
    pub items: &'a [Item],
    pub sources: &'a SourceRegistry,
    pub next_page: usize,
}

/// A page layout with `{{sources}}`, `{{items}}` and `{{next}}` slots.
///
/// Substitution happens in one pass over the template, so slot names that
/// show up inside item titles are never expanded.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
}

impl Default for Template {
    fn default() -> Self {
        Self {
            source: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl Template {
    /// Loads a custom template from disk.
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_source(source, path)
    }

    /// Builds a template from its text. `origin` only labels errors.
    pub fn from_source(source: String, origin: &Path) -> Result<Self, TemplateError> {
        let present = slot_names(&source);
        for slot in REQUIRED_SLOTS {
            if !present.contains(&slot) {
                return Err(TemplateError::MissingSlot {
                    path: origin.to_path_buf(),
                    slot,
                });
            }
        }
        Ok(Self { source })
    }

    pub fn render(&self, view: &PageView<'_>) -> String {
        let sources = render_sources(view.sources);
        let items = render_items(view.items);
        let next = render_next(view.next_page);

        let mut out = String::with_capacity(self.source.len() + sources.len() + items.len());
        let mut rest = self.source.as_str();
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            };
            match after[..end].trim() {
                "sources" => out.push_str(&sources),
                "items" => out.push_str(&items),
                "next" => out.push_str(&next),
                _ => out.push_str(&rest[start..start + end + 4]),
            }
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        out
    }
}

fn slot_names(source: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = source;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else { break };
        names.push(after[..end].trim());
        rest = &after[end + 2..];
    }
    names
}

fn render_sources(sources: &SourceRegistry) -> String {
    let mut out = String::new();
    for (url, title) in sources {
        out.push_str("\n<a class=\"feed\" href=\"");
        out.push_str(&html_escape::encode_double_quoted_attribute(url));
        out.push_str("\">");
        out.push_str(&html_escape::encode_text(title));
        out.push_str("</a>");
    }
    out
}

fn render_items(items: &[Item]) -> String {
    let mut out = String::new();
    for item in items {
        out.push_str("\n<a class=\"item\" target=\"_blank\" href=\"");
        out.push_str(&html_escape::encode_double_quoted_attribute(&item.url));
        out.push_str("\">");
        if !item.tag.is_empty() {
            out.push_str("<div class=\"tag\">");
            out.push_str(&html_escape::encode_text(&item.tag));
            out.push_str("</div>");
        }
        out.push_str(&html_escape::encode_text(&item.title));
        out.push_str("</a>");
    }
    out
}

fn render_next(next_page: usize) -> String {
    if next_page > 1 {
        format!("<a class=\"next\" href=\"page{}.html\">Next</a>", next_page)
    } else {
        String::new()
    }
}

/// Built-in layout. Kept well-formed XHTML so the page reader never has to
/// guess where an element ends.
const DEFAULT_TEMPLATE: &str = r##"<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
<meta charset="UTF-8" />
<meta name="viewport" content="width=device-width, initial-scale=1" />
<title>News</title>
<style type="text/css">
html {
	padding: 0;
	margin: 0;
}
body {
	padding: 2em 0;
	margin: 0;
	font-family: sans-serif;
	font-size: 16px;
	background-color: #282828;
}
.container {
	max-width: 1024px;
	margin: 0 auto;
	text-align: center;
}
.item {
	display: block;
	font-size: 18px;
	padding: 1em 0.5em 0.5em 0.5em;
	color: #000;
	font-weight: bold;
	background: #EEE;
	border-bottom: 1px solid #ccc;
	text-decoration: none;
	text-align: left;
}
.item:first-child {
	border-top: 1px solid #aaa;
}
.item:visited {
	color: #873B3B;
}
.item:hover, .item:active, .next:hover, .next:active {
	text-decoration: underline;
}
.tag {
	float: right;
	border: 1px solid #ccc;
	border-radius: 3px;
	padding: 5px;
	margin: -10px 0 0 5px;
	background-color: #ddd;
	font-weight: normal;
}
.next {
	display: inline-block;
	margin: 20px auto;
	font-size: 24px;
	padding: 0.5em;
	color: #000;
	font-weight: bold;
	background: #EEE;
	border-bottom: 1px solid #ccc;
	border-radius: 5px;
	text-decoration: none;
}
.feed {
	display: none;
}
</style>
</head>
<body>
{{sources}}
<div class="container">{{items}}
{{next}}
</div>
</body>
</html>
"##;
