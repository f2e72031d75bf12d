use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;
use thiserror::Error;

use crate::store::SourceRegistry;

/// SEC-003: Maximum allowed nesting depth for OPML outline elements.
/// Prevents stack overflow attacks from maliciously crafted deeply nested OPMLs.
const MAX_OPML_DEPTH: usize = 50;

/// Errors that can occur during OPML parsing.
#[derive(Debug, Error)]
pub enum OpmlError {
    /// SEC-003: OPML nesting depth exceeds safety limit.
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// XML parsing failed.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// File I/O error.
    #[error("Failed to read OPML file: {0}")]
    Io(#[from] std::io::Error),
}

/// One `<outline>` element and everything nested under it.
///
/// Folders have no `xml_url` and only serve to group children; leaves carry
/// the feed URL. Nothing stops a node from being both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outline {
    /// The `text` attribute, falling back to `title`.
    pub text: String,
    /// The `xmlUrl` attribute, if any.
    pub xml_url: Option<String>,
    pub children: Vec<Outline>,
}

/// Reads an OPML file into its top-level outlines.
///
/// # Errors
///
/// Returns [`OpmlError::Io`] if the file cannot be read, and
/// [`OpmlError::XmlParse`] / [`OpmlError::MaxDepthExceeded`] for bad content.
///
/// # Security
///
/// XXE (XML External Entity) attacks are mitigated because `quick-xml` (0.37) does not
/// parse `<!ENTITY>` declarations. Custom entities cause `EscapeError::UnrecognizedEntity`.
pub async fn parse(path: &Path) -> Result<Vec<Outline>, OpmlError> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_opml_content(&content)
}

/// Parses an OPML document into an outline tree.
///
/// Only `<outline>` elements are kept; `<head>`, `<body>` and any other
/// wrapper are transparent.
pub fn parse_opml_content(content: &str) -> Result<Vec<Outline>, OpmlError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    // stack[0] collects top-level outlines; deeper entries are open elements
    let mut stack: Vec<Outline> = vec![Outline::default()];

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                // SEC-003: Reject excessively nested OPMLs
                if stack.len() > MAX_OPML_DEPTH {
                    return Err(OpmlError::MaxDepthExceeded(MAX_OPML_DEPTH));
                }
                stack.push(outline_from_attributes(&e, &reader)?);
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                let leaf = outline_from_attributes(&e, &reader)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(leaf);
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"outline" => {
                if stack.len() > 1 {
                    if let Some(done) = stack.pop() {
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(done);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OpmlError::XmlParse(e.to_string())),
            _ => {}
        }
    }

    // Unclosed outlines at EOF still count
    while stack.len() > 1 {
        if let Some(done) = stack.pop() {
            if let Some(parent) = stack.last_mut() {
                parent.children.push(done);
            }
        }
    }

    Ok(stack.pop().map(|root| root.children).unwrap_or_default())
}

fn outline_from_attributes(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<Outline, OpmlError> {
    let mut text = None;
    let mut title = None;
    let mut xml_url = None;

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let value = || {
            attr.decode_and_unescape_value(reader.decoder())
                .map(|v| v.trim().to_string())
                .map_err(|e| OpmlError::XmlParse(e.to_string()))
        };
        match attr.key.as_ref() {
            b"xmlUrl" => xml_url = Some(value()?),
            b"text" => text = Some(value()?),
            b"title" => title = Some(value()?),
            _ => {}
        }
    }

    Ok(Outline {
        text: text
            .filter(|t| !t.is_empty())
            .or(title)
            .unwrap_or_default(),
        xml_url: xml_url.filter(|u| !u.is_empty()),
        children: Vec::new(),
    })
}

/// Flattens an outline tree into `url -> title` pairs.
///
/// Walks every level; a blank title becomes the URL. When the same URL appears
/// more than once the last occurrence wins.
pub fn collect_sources(outlines: &[Outline]) -> SourceRegistry {
    let mut sources = SourceRegistry::new();
    collect_into(&mut sources, outlines);
    sources
}

fn collect_into(sources: &mut SourceRegistry, outlines: &[Outline]) {
    for outline in outlines {
        if let Some(url) = &outline.xml_url {
            let title = if outline.text.is_empty() {
                url.clone()
            } else {
                outline.text.clone()
            };
            sources.insert(url.clone(), title);
        }
        if !outline.children.is_empty() {
            collect_into(sources, &outline.children);
        }
    }
}
