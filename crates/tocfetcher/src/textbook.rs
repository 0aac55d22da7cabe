use crate::toc::{TocDocument, TocError};
use std::sync::Arc;

/// Resolves a textbook's table of contents from its base URL
///
/// Implemented by [`crate::TocFetcher`] for real HTTP retrieval; tests and
/// offline tooling can supply a canned source.
pub trait TextbookSource {
    fn fetch_toc(&self, book_url: &str) -> Result<Arc<TocDocument>, TocError>;
}

/// A course textbook with its displayable page range
///
/// The page range is derived from the fetched table of contents at
/// construction; a fetch or parse failure fails construction, and the caller
/// decides whether to drop the book.
#[derive(Debug, Clone)]
pub struct Textbook {
    title: String,
    book_url: String,
    table_of_contents: Arc<TocDocument>,
    start_page: u32,
    end_page: u32,
}

impl Textbook {
    pub fn load(
        title: &str,
        book_url: &str,
        source: &impl TextbookSource,
    ) -> Result<Self, TocError> {
        let table_of_contents = source.fetch_toc(book_url)?;
        let start_page = table_of_contents.start_page()?;
        let end_page = table_of_contents.end_page()?;

        Ok(Self {
            title: title.to_string(),
            book_url: book_url.to_string(),
            table_of_contents,
            start_page,
            end_page,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn book_url(&self) -> &str {
        &self.book_url
    }

    pub fn table_of_contents(&self) -> &TocDocument {
        &self.table_of_contents
    }

    pub fn start_page(&self) -> u32 {
        self.start_page
    }

    pub fn end_page(&self) -> u32 {
        self.end_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedSource(&'static str);

    impl TextbookSource for CannedSource {
        fn fetch_toc(&self, _book_url: &str) -> Result<Arc<TocDocument>, TocError> {
            TocDocument::parse(self.0).map(Arc::new)
        }
    }

    struct FailingSource;

    impl TextbookSource for FailingSource {
        fn fetch_toc(&self, url: &str) -> Result<Arc<TocDocument>, TocError> {
            Err(TocError::Http {
                url: url.to_string(),
                status: 503,
            })
        }
    }

    #[test]
    fn test_load_derives_page_range() {
        let source = CannedSource(
            r#"<toc>
                <entry page="3"/>
                <entry page="90"><entry page="95"/></entry>
            </toc>"#,
        );

        let book = Textbook::load("Circuits", "http://books/circuits/", &source).unwrap();
        assert_eq!(book.title(), "Circuits");
        assert_eq!(book.start_page(), 3);
        assert_eq!(book.end_page(), 95);
    }

    #[test]
    fn test_load_fails_when_fetch_fails() {
        let result = Textbook::load("Circuits", "http://books/circuits/", &FailingSource);
        assert!(matches!(result, Err(TocError::Http { status: 503, .. })));
    }

    #[test]
    fn test_load_fails_on_pageless_toc() {
        let source = CannedSource(r#"<toc><entry name="no page"/></toc>"#);
        let result = Textbook::load("Circuits", "http://books/circuits/", &source);
        assert!(matches!(result, Err(TocError::MissingPage)));
    }
}
