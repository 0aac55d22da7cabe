use std::fmt::{Display, Formatter, Result as FmtResult};

/// Custom error type for table-of-contents retrieval and parsing
#[derive(Debug)]
pub enum TocError {
    /// The HTTP request itself failed (connection, TLS, timeout)
    Fetch(reqwest::Error),
    /// The server answered with a non-success status
    Http { url: String, status: u16 },
    /// The fetched document is not well-formed XML
    Parse(String),
    /// The document has no top-level entries to derive pages from
    EmptyToc,
    /// An entry on the page-range path has no usable `page` attribute
    MissingPage,
}

impl Display for TocError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Fetch(e) => write!(f, "Unable to retrieve table of contents: {e}"),
            Self::Http { url, status } => {
                write!(f, "Table of contents at {url} returned HTTP {status}")
            }
            Self::Parse(e) => write!(f, "Unable to parse table of contents XML: {e}"),
            Self::EmptyToc => write!(f, "Table of contents has no entries"),
            Self::MissingPage => {
                write!(f, "Table of contents entry is missing a page attribute")
            }
        }
    }
}

impl std::error::Error for TocError {}

impl From<reqwest::Error> for TocError {
    fn from(e: reqwest::Error) -> Self {
        Self::Fetch(e)
    }
}

/// One entry in a textbook's table of contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    /// The `page` attribute, when present and numeric
    pub page: Option<u32>,
    pub children: Vec<TocEntry>,
}

/// An owned table-of-contents tree for one textbook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocDocument {
    pub entries: Vec<TocEntry>,
}

fn build_entry(node: roxmltree::Node<'_, '_>) -> TocEntry {
    TocEntry {
        page: node.attribute("page").and_then(|p| p.parse().ok()),
        children: node
            .children()
            .filter(|child| child.is_element())
            .map(build_entry)
            .collect(),
    }
}

impl TocDocument {
    /// Parses a fetched `toc.xml` document into an owned tree
    pub fn parse(xml: &str) -> Result<Self, TocError> {
        let doc = roxmltree::Document::parse(xml).map_err(|e| TocError::Parse(e.to_string()))?;

        let entries = doc
            .root_element()
            .children()
            .filter(|child| child.is_element())
            .map(build_entry)
            .collect();

        Ok(Self { entries })
    }

    /// The page of the first top-level entry
    pub fn start_page(&self) -> Result<u32, TocError> {
        self.entries
            .first()
            .ok_or(TocError::EmptyToc)?
            .page
            .ok_or(TocError::MissingPage)
    }

    /// The page of the deepest last descendant of the last top-level entry
    ///
    /// The last page should belong to the last entry, but entries nest, so
    /// keep descending into the last child until a leaf is reached.
    pub fn end_page(&self) -> Result<u32, TocError> {
        let mut last = self.entries.last().ok_or(TocError::EmptyToc)?;
        while let Some(child) = last.children.last() {
            last = child;
        }
        last.page.ok_or(TocError::MissingPage)
    }
}
