//! The update engine: turns registered sources into pages.
//!
//! One [`Aggregator`] owns the in-memory item list, the source registry and the
//! set of every item URL already written to some page. Each call to
//! [`Aggregator::update`] runs a full cycle:
//!
//! 1. Re-read the primary page; it is authoritative over memory because people
//!    edit its source list by hand.
//! 2. Visit every source once, in random order, one at a time.
//! 3. For each source: rate-limit, fetch, parse, merge unseen items at the
//!    front, roll old items into a new overflow page if the primary page has
//!    doubled, then write the primary page back.
//!
//! Per-source failures are logged and skipped. Only structural problems (no
//! readable primary page, no sources) end a cycle with an error.
//!
//! The primary page is shared with whoever edits it by hand. There is no lock:
//! before every write the source list is re-read from disk and written back
//! as found, so edits made between cycles survive. An edit landing between
//! that re-read and the write is lost (last writer wins).

use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

use crate::feed::{self, Fetcher, HostDebouncer, Item, OpmlError};
use crate::store::{PageStore, SourceRegistry, StoreError, Template};

/// Default number of items per page.
pub const DEFAULT_ITEMS_PER_PAGE: usize = 500;

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("zero feed sources found in {}", path.display())]
    NoSources { path: PathBuf },

    #[error("could not import {}: {source}", path.display())]
    Import {
        path: PathBuf,
        #[source]
        source: OpmlError,
    },

    #[error("no feed URLs found in {}", path.display())]
    NothingToImport { path: PathBuf },
}

/// Aggregator tuning knobs.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding the pages.
    pub directory: PathBuf,
    /// Target size of the primary page. Rollover kicks in at twice this.
    pub items_per_page: usize,
    /// Minimum spacing between two requests to the same host.
    pub min_host_interval: Duration,
    pub template: Template,
}

/// What one update cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Sources visited.
    pub sources: usize,
    /// Sources skipped because fetching or parsing failed.
    pub failed: usize,
    /// Items seen for the first time.
    pub new_items: usize,
    /// Overflow pages written.
    pub pages_created: usize,
}

/// Owns aggregation state for one page directory.
///
/// Cycles take `&mut self`, so two can never run at once on one instance.
pub struct Aggregator<F> {
    store: PageStore,
    fetcher: F,
    debouncer: HostDebouncer,
    items_per_page: usize,
    /// Newest first.
    items: Vec<Item>,
    sources: SourceRegistry,
    seen: HashSet<String>,
    /// Highest page number on disk.
    pages: usize,
    /// Set when the last primary page write failed: `items` holds entries
    /// that are on no page yet.
    unsaved: bool,
    log: Dispatch,
}

impl<F: Fetcher> Aggregator<F> {
    /// Opens (or creates) a page directory and rebuilds state from it.
    ///
    /// Creates the directory and a seeded primary page if needed, then reads
    /// `index.html`, `page2.html`, … until one is missing. Every item URL
    /// found becomes "seen"; sources come from the primary page only.
    ///
    /// `log` receives every event the aggregator emits.
    pub async fn new(
        settings: Settings,
        fetcher: F,
        log: Dispatch,
    ) -> Result<Self, AggregatorError> {
        let mut agg = Self {
            store: PageStore::new(settings.directory, settings.template),
            fetcher,
            debouncer: HostDebouncer::new(settings.min_host_interval),
            items_per_page: settings.items_per_page.max(1),
            items: Vec::new(),
            sources: SourceRegistry::new(),
            seen: HashSet::new(),
            pages: 1,
            unsaved: false,
            log: log.clone(),
        };
        async { agg.load_pages() }.with_subscriber(log).await?;
        Ok(agg)
    }

    fn load_pages(&mut self) -> Result<(), AggregatorError> {
        self.store.ensure_initialized()?;

        let mut number = 1;
        while self.store.exists(number) {
            tracing::debug!(path = %self.store.page_path(number).display(), "Reading items");
            let page = self.store.read(number)?;
            self.seen.extend(page.items.iter().map(|i| i.url.clone()));
            if number == 1 {
                self.items = page.items;
                self.sources = page.sources;
            }
            self.pages = number;
            number += 1;
        }

        tracing::info!(
            dir = %self.store.dir().display(),
            pages = self.pages,
            known_items = self.seen.len(),
            sources = self.sources.len(),
            "Loaded pages"
        );
        Ok(())
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    pub fn is_known(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    pub fn known_items(&self) -> usize {
        self.seen.len()
    }

    /// Highest page number currently on disk.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Runs one full update cycle. See the module docs for the steps.
    ///
    /// # Errors
    ///
    /// Fails only if the primary page cannot be read or lists no sources.
    /// Individual sources failing never fail the cycle.
    pub async fn update(&mut self) -> Result<UpdateSummary, AggregatorError> {
        let log = self.log.clone();
        self.run_cycle().with_subscriber(log).await
    }

    async fn run_cycle(&mut self) -> Result<UpdateSummary, AggregatorError> {
        let primary = self.store.page_path(1);
        let page = self.store.read(1)?;
        if page.sources.is_empty() {
            return Err(AggregatorError::NoSources { path: primary });
        }
        if self.unsaved {
            tracing::warn!(
                items = self.items.len(),
                "Primary page is behind memory after a failed write, keeping in-memory items"
            );
        } else {
            self.items = page.items;
        }
        self.sources = page.sources;

        let mut order: Vec<String> = self.sources.keys().cloned().collect();
        order.shuffle(&mut rand::rng());

        tracing::info!(sources = order.len(), "Fetching news");
        let mut summary = UpdateSummary::default();
        for source in &order {
            summary.sources += 1;
            match self.process_source(source).await {
                Some((new_items, pages_created)) => {
                    summary.new_items += new_items;
                    summary.pages_created += pages_created;
                }
                None => summary.failed += 1,
            }
        }

        tracing::info!(
            sources = summary.sources,
            failed = summary.failed,
            new_items = summary.new_items,
            pages_created = summary.pages_created,
            "Update cycle finished"
        );
        Ok(summary)
    }

    /// Fetches one source and folds its items in. Returns `None` if the
    /// source was skipped, else `(new items, overflow pages written)`.
    async fn process_source(&mut self, source: &str) -> Option<(usize, usize)> {
        tracing::debug!(source = %source, "Reading items");
        let url = if self.fetcher.is_cached(source) {
            tracing::debug!(source = %source, "Serving cached copy, skipping rate limit");
            source
        } else {
            self.debouncer.wait(source).await
        };

        let bytes = match self.fetcher.fetch(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(source = %source, error = %e, "Fetch failed, skipping source");
                return None;
            }
        };
        let parsed = match feed::parse_feed(&bytes) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(source = %source, error = %e, "Parse failed, skipping source");
                return None;
            }
        };

        let new_items = self.merge(source, parsed);
        let pages_created = self.roll_over();
        self.write_primary();
        Some((new_items, pages_created))
    }

    /// Puts unseen items in front of the list, newest first.
    ///
    /// `parsed` is oldest first. It is walked from the newest end so that,
    /// if a feed repeats a URL, the newest copy is the one kept.
    fn merge(&mut self, source: &str, parsed: Vec<Item>) -> usize {
        let mut fresh = Vec::new();
        for mut item in parsed.into_iter().rev() {
            item.resolve_against(source);
            if self.seen.contains(&item.url) {
                continue;
            }
            item.set_tag();
            self.seen.insert(item.url.clone());
            fresh.push(item);
        }

        let count = fresh.len();
        if count > 0 {
            tracing::debug!(source = %source, new_items = count, "Merged new items");
            fresh.append(&mut self.items);
            self.items = fresh;
        }
        count
    }

    /// Moves everything past `items_per_page` into a new overflow page while
    /// the list holds at least twice that many items.
    ///
    /// The new page gets the next free number and links to the one before
    /// it. If writing fails the items stay on the primary page, so nothing is
    /// lost; the next source retries.
    fn roll_over(&mut self) -> usize {
        let mut created = 0;
        while self.items.len() >= self.items_per_page * 2 {
            let number = self.pages + 1;
            let overflow = &self.items[self.items_per_page..];
            tracing::debug!(page = number, items = overflow.len(), "Saving items to overflow page");
            if let Err(e) = self.store.write(number, overflow, &self.sources, number - 1) {
                tracing::error!(page = number, error = %e, "Could not write overflow page");
                break;
            }
            self.pages = number;
            self.items.truncate(self.items_per_page);
            created += 1;
        }
        created
    }

    /// Writes the primary page with the current items and the on-disk
    /// source list (falling back to memory if it cannot be read).
    ///
    /// On failure the items stay in memory and the next cycle keeps them
    /// instead of reloading the stale page, so they reach disk with the next
    /// successful write.
    fn write_primary(&mut self) {
        let on_disk = match self.store.read(1) {
            Ok(page) => Some(page.sources),
            Err(e) => {
                tracing::error!(error = %e, "Could not re-read sources before writing, using in-memory copy");
                None
            }
        };
        let sources = on_disk.as_ref().unwrap_or(&self.sources);

        match self.store.write(1, &self.items, sources, self.pages) {
            Ok(()) => self.unsaved = false,
            Err(e) => {
                tracing::error!(error = %e, "Could not save primary page");
                self.unsaved = true;
            }
        }
    }

    /// Registers every feed found in an OPML file.
    ///
    /// Imported titles replace existing ones for the same URL. The primary
    /// page is rewritten right away with the merged sources and the items
    /// currently on it. Returns how many distinct feeds the file held.
    pub async fn import_opml(&mut self, path: &Path) -> Result<usize, AggregatorError> {
        let log = self.log.clone();
        self.run_import(path).with_subscriber(log).await
    }

    async fn run_import(&mut self, path: &Path) -> Result<usize, AggregatorError> {
        let outlines = feed::parse_opml(path)
            .await
            .map_err(|source| AggregatorError::Import {
                path: path.to_path_buf(),
                source,
            })?;
        let imported = feed::collect_sources(&outlines);
        self.register_sources(imported, path)
    }

    /// Merges `imported` into the sources listed on the primary page and
    /// writes it back.
    pub fn register_sources(
        &mut self,
        imported: SourceRegistry,
        origin: &Path,
    ) -> Result<usize, AggregatorError> {
        if imported.is_empty() {
            return Err(AggregatorError::NothingToImport {
                path: origin.to_path_buf(),
            });
        }
        let count = imported.len();

        let page = self.store.read(1)?;
        let mut sources = page.sources;
        sources.extend(imported);
        self.store.write(1, &page.items, &sources, self.pages)?;
        self.sources = sources;

        tracing::info!(
            imported = count,
            total = self.sources.len(),
            from = %origin.display(),
            "Imported feed sources"
        );
        Ok(count)
    }
}
