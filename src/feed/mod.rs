//! Everything that deals with a single feed source.
//!
//! - **Items**: the [`Item`] type, tag derivation and relative-URL fix-up
//! - **Parsing**: turn RSS/Atom bytes into items, oldest first
//! - **Fetching**: the [`Fetcher`] capability, an HTTP implementation and a
//!   development disk cache
//! - **Rate limiting**: per-host request spacing
//! - **OPML Import**: read subscription lists for bulk registration
//!
//! # Example
//!
//! ```ignore
//! use newsroll::feed::{parse_feed, Fetcher, HttpFetcher};
//!
//! let fetcher = HttpFetcher::new(std::time::Duration::from_secs(10))?;
//! let bytes = fetcher.fetch("https://news.ycombinator.com/rss").await?;
//! let items = parse_feed(&bytes)?; // oldest first
//! ```

mod cache;
mod debounce;
mod fetcher;
mod item;
mod opml;
mod parser;

pub use cache::CachingFetcher;
pub use debounce::{HostDebouncer, DEFAULT_MIN_INTERVAL};
pub use fetcher::{FetchError, Fetcher, HttpFetcher, DEFAULT_TIMEOUT};
pub use item::{tag_for_url, Item};
pub use opml::{collect_sources, parse as parse_opml, parse_opml_content, OpmlError, Outline};
pub use parser::{parse_feed, ParseError};
