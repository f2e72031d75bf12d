//! Flat-file persistence: numbered HTML pages that carry both the visible
//! item list and the hidden source registry.
//!
//! - Page 1 is `index.html`, the only page that gains new items.
//! - Page `n >= 2` is `page{n}.html`, written once by rollover.
//!
//! There is no database. Everything the aggregator knows is rebuilt from
//! these documents at startup.

mod reader;
mod template;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::feed::Item;
use crate::util::atomic_write;

pub use reader::parse_page;
pub use template::{PageView, Template, TemplateError};

/// Registered sources: feed URL → display title.
///
/// Ordered so rendered pages are stable between writes; iteration order
/// carries no meaning.
pub type SourceRegistry = BTreeMap<String, String>;

/// File name of the primary page.
pub const PRIMARY_PAGE: &str = "index.html";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not open file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse HTML in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: quick_xml::Error,
    },

    #[error("could not write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Contents of one page document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Items in document order (newest first for pages we wrote).
    pub items: Vec<Item>,
    pub sources: SourceRegistry,
}

/// Sources written into a freshly created primary page.
pub fn sample_sources() -> SourceRegistry {
    SourceRegistry::from([
        (
            "https://www.reddit.com/r/rust/.rss".to_string(),
            "/r/rust".to_string(),
        ),
        (
            "https://news.ycombinator.com/rss".to_string(),
            "Hacker News".to_string(),
        ),
    ])
}

/// Reads and writes the page documents inside one directory.
#[derive(Debug, Clone)]
pub struct PageStore {
    dir: PathBuf,
    template: Template,
}

impl PageStore {
    pub fn new(dir: impl Into<PathBuf>, template: Template) -> Self {
        Self {
            dir: dir.into(),
            template,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of page `number`; page 1 is the primary page.
    pub fn page_path(&self, number: usize) -> PathBuf {
        if number <= 1 {
            self.dir.join(PRIMARY_PAGE)
        } else {
            self.dir.join(format!("page{}.html", number))
        }
    }

    pub fn exists(&self, number: usize) -> bool {
        self.page_path(number).is_file()
    }

    /// Makes sure the directory and a primary page exist.
    ///
    /// A missing primary page is created empty, with [`sample_sources`].
    /// Returns `true` when it had to be created.
    pub fn ensure_initialized(&self) -> Result<bool, StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        if self.exists(1) {
            return Ok(false);
        }
        self.write(1, &[], &sample_sources(), 0)?;
        tracing::info!(path = %self.page_path(1).display(), "Created primary page with sample sources");
        Ok(true)
    }

    pub fn read(&self, number: usize) -> Result<Page, StoreError> {
        let path = self.page_path(number);
        let bytes = std::fs::read(&path).map_err(|source| StoreError::Read {
            path: path.clone(),
            source,
        })?;
        parse_page(&String::from_utf8_lossy(&bytes))
            .map_err(|source| StoreError::Parse { path, source })
    }

    /// Renders and atomically replaces page `number`.
    ///
    /// `next_page <= 1` renders no "Next" link.
    pub fn write(
        &self,
        number: usize,
        items: &[Item],
        sources: &SourceRegistry,
        next_page: usize,
    ) -> Result<(), StoreError> {
        let path = self.page_path(number);
        let html = self.template.render(&PageView {
            items,
            sources,
            next_page,
        });
        atomic_write(&path, html.as_bytes()).map_err(|source| StoreError::Write { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> (tempfile::TempDir, PageStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PageStore::new(dir.path().join("news"), Template::default());
        (dir, store)
    }

    #[test]
    fn test_page_names() {
        let store = PageStore::new("/srv/news", Template::default());
        assert_eq!(store.page_path(1), PathBuf::from("/srv/news/index.html"));
        assert_eq!(store.page_path(2), PathBuf::from("/srv/news/page2.html"));
        assert_eq!(store.page_path(17), PathBuf::from("/srv/news/page17.html"));
    }

    #[test]
    fn test_ensure_initialized_seeds_primary_page() {
        let (_tmp, store) = store();

        assert!(store.ensure_initialized().unwrap());
        assert!(store.exists(1));

        let page = store.read(1).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.sources, sample_sources());
    }

    #[test]
    fn test_ensure_initialized_keeps_existing_page() {
        let (_tmp, store) = store();
        std::fs::create_dir_all(store.dir()).unwrap();
        let sources = SourceRegistry::from([("https://mine.example/rss".into(), "Mine".into())]);
        store.write(1, &[], &sources, 0).unwrap();

        assert!(!store.ensure_initialized().unwrap());
        assert_eq!(store.read(1).unwrap().sources, sources);
    }

    #[test]
    fn test_ensure_initialized_fails_when_directory_cannot_exist() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();
        let store = PageStore::new(blocker.join("news"), Template::default());

        assert!(matches!(
            store.ensure_initialized(),
            Err(StoreError::CreateDir { .. })
        ));
    }

    #[test]
    fn test_write_then_read_overflow_page() {
        let (_tmp, store) = store();
        store.ensure_initialized().unwrap();
        let mut items = vec![
            Item::new("B", "https://example.com/b"),
            Item::new("A", "https://example.com/a"),
        ];
        items.iter_mut().for_each(Item::set_tag);

        store.write(3, &items, &sample_sources(), 2).unwrap();

        let html = std::fs::read_to_string(store.page_path(3)).unwrap();
        assert!(html.contains("href=\"page2.html\""));
        assert_eq!(store.read(3).unwrap().items, items);
    }

    #[test]
    fn test_read_missing_page() {
        let (_tmp, store) = store();
        assert!(matches!(store.read(1), Err(StoreError::Read { .. })));
    }

    #[test]
    fn test_empty_file_reads_as_empty_page() {
        let (_tmp, store) = store();
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.page_path(1), "").unwrap();

        assert_eq!(store.read(1).unwrap(), Page::default());
    }
}
