//! newsroll: folds RSS/Atom sources into paginated static HTML pages.
//!
//! The page directory is the whole database. The primary page (`index.html`)
//! lists the newest items and, hidden, the registered sources. Older items
//! roll over into `page2.html`, `page3.html`, …, each linking to the previous
//! one.
//!
//! ```ignore
//! use newsroll::aggregator::{Aggregator, Settings};
//! use newsroll::feed::HttpFetcher;
//!
//! let fetcher = HttpFetcher::new(newsroll::feed::DEFAULT_TIMEOUT)?;
//! let settings = Settings {
//!     directory: "news".into(),
//!     items_per_page: newsroll::aggregator::DEFAULT_ITEMS_PER_PAGE,
//!     min_host_interval: newsroll::feed::DEFAULT_MIN_INTERVAL,
//!     template: newsroll::store::Template::default(),
//! };
//! let mut agg = Aggregator::new(settings, fetcher, tracing::Dispatch::none()).await?;
//! let summary = agg.update().await?;
//! ```

pub mod aggregator;
pub mod config;
pub mod feed;
pub mod store;
pub mod util;

pub use aggregator::{Aggregator, AggregatorError, Settings, UpdateSummary};
pub use config::{Config, ConfigError};
