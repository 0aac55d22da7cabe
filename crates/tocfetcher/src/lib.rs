pub mod cache;
pub mod textbook;
pub mod toc;

use cache::{Clock, SystemClock, TocCache};
use log::info;
use std::sync::Arc;
use textbook::TextbookSource;
use toc::{TocDocument, TocError};

/// Default file name of a textbook's table of contents under its base URL
const TOC_FILE_NAME: &str = "toc.xml";

/// Fetches textbook tables of contents over HTTP, with a TTL cache
///
/// The fetch is synchronous; an uncached lookup blocks for the duration of
/// the network round trip. No retry is attempted here.
pub struct TocFetcher {
    client: reqwest::blocking::Client,
    cache: TocCache,
    clock: Box<dyn Clock>,
}

impl TocFetcher {
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemClock))
    }

    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            cache: TocCache::new(),
            clock,
        }
    }

    fn fetch_fresh(&self, toc_url: &str) -> Result<TocDocument, TocError> {
        info!("Retrieving textbook table of contents from {toc_url}");

        let response = self.client.get(toc_url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(TocError::Http {
                url: toc_url.to_string(),
                status: status.as_u16(),
            });
        }

        TocDocument::parse(&response.text()?)
    }
}

impl Default for TocFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TextbookSource for TocFetcher {
    /// Returns the table of contents at `{book_url}toc.xml`, from the cache
    /// when fresh
    fn fetch_toc(&self, book_url: &str) -> Result<Arc<TocDocument>, TocError> {
        let toc_url = format!("{book_url}{TOC_FILE_NAME}");
        self.cache
            .lookup(&toc_url, self.clock.now(), || self.fetch_fresh(&toc_url))
    }
}
