//! Utility functions for common operations.
//!
//! - **Text cleaning**: drop characters that break XML parsers
//! - **Slugs**: readable labels derived from URLs
//! - **Atomic writes**: replace a file without exposing partial content
//!
//! # Examples
//!
//! ```
//! use newsroll::util::{strip_unprintable, url_slug};
//!
//! let clean = strip_unprintable("<rss>\u{0}</rss>");
//! assert_eq!(clean, "<rss></rss>");
//!
//! assert_eq!(url_slug("https://example.com/a/Some_Post"), "some-post");
//! ```

mod fs;
mod text;

pub use fs::atomic_write;
pub use text::{strip_unprintable, url_slug};
