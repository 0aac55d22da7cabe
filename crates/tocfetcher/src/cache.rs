use crate::toc::{TocDocument, TocError};
use chrono::{DateTime, Duration, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// How long a fetched table of contents stays fresh
pub const TOC_CACHE_TTL_SECONDS: i64 = 600;

/// A time source, injectable so cache expiry is testable
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A TTL cache of fetched table-of-contents documents, keyed by URL
///
/// Course modules can be constructed and torn down far more often than
/// textbook contents change, so each fetch is kept in memory for the TTL.
/// The key space is unbounded but small in practice (one key per configured
/// textbook), so there is no eviction beyond the freshness check. Concurrent
/// lookups of the same key are benign: last writer wins on an idempotent
/// value.
#[derive(Debug, Default)]
pub struct TocCache {
    entries: Mutex<HashMap<String, (Arc<TocDocument>, DateTime<Utc>)>>,
}

impl TocCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached document for `url` if it is younger than the TTL;
    /// otherwise runs `fetch` and overwrites the entry
    pub fn lookup<F>(
        &self,
        url: &str,
        now: DateTime<Utc>,
        fetch: F,
    ) -> Result<Arc<TocDocument>, TocError>
    where
        F: FnOnce() -> Result<TocDocument, TocError>,
    {
        let ttl = Duration::seconds(TOC_CACHE_TTL_SECONDS);

        if let Ok(entries) = self.entries.lock()
            && let Some((document, fetched_at)) = entries.get(url)
            && now - *fetched_at < ttl
        {
            return Ok(Arc::clone(document));
        }

        // Stale or missing; fetch outside the lock so one slow fetch does
        // not block lookups of other keys
        let document = Arc::new(fetch()?);

        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(url.to_string(), (Arc::clone(&document), now));
        }

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toc::TocEntry;
    use std::cell::Cell;

    fn sample_toc() -> TocDocument {
        TocDocument {
            entries: vec![TocEntry {
                page: Some(1),
                children: Vec::new(),
            }],
        }
    }

    #[test]
    fn test_lookup_within_ttl_returns_cached_document() {
        let cache = TocCache::new();
        let fetches = Cell::new(0u32);
        let now = Utc::now();

        let fetch = || {
            fetches.set(fetches.get() + 1);
            Ok(sample_toc())
        };

        let first = cache.lookup("http://books/a/toc.xml", now, fetch).unwrap();
        let second = cache
            .lookup(
                "http://books/a/toc.xml",
                now + Duration::seconds(TOC_CACHE_TTL_SECONDS - 1),
                fetch,
            )
            .unwrap();

        assert_eq!(fetches.get(), 1);
        // The very same document object, not an equal copy
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_lookup_after_ttl_refetches() {
        let cache = TocCache::new();
        let fetches = Cell::new(0u32);
        let now = Utc::now();

        let fetch = || {
            fetches.set(fetches.get() + 1);
            Ok(sample_toc())
        };

        let first = cache.lookup("http://books/a/toc.xml", now, fetch).unwrap();
        let second = cache
            .lookup(
                "http://books/a/toc.xml",
                now + Duration::seconds(TOC_CACHE_TTL_SECONDS),
                fetch,
            )
            .unwrap();

        assert_eq!(fetches.get(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_lookup_keys_are_independent() {
        let cache = TocCache::new();
        let fetches = Cell::new(0u32);
        let now = Utc::now();

        let fetch = || {
            fetches.set(fetches.get() + 1);
            Ok(sample_toc())
        };

        cache.lookup("http://books/a/toc.xml", now, fetch).unwrap();
        cache.lookup("http://books/b/toc.xml", now, fetch).unwrap();

        assert_eq!(fetches.get(), 2);
    }

    #[test]
    fn test_fetch_failure_does_not_poison_cache() {
        let cache = TocCache::new();
        let now = Utc::now();

        let result = cache.lookup("http://books/a/toc.xml", now, || Err(TocError::EmptyToc));
        assert!(result.is_err());

        // A later successful fetch still lands in the cache
        let document = cache
            .lookup("http://books/a/toc.xml", now, || Ok(sample_toc()))
            .unwrap();
        assert_eq!(document.start_page().unwrap(), 1);
    }
}
