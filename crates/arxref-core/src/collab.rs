use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

use crate::item::ArxivItem;

#[derive(Error, Debug)]
pub enum CollabError {
    #[error("bibcode lookup failed: {0}")]
    Lookup(String),
    #[error("harvest failed: {0}")]
    Harvest(String),
    #[error("PDF reference extraction failed: {0}")]
    PdfBackend(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolves a raw fulltext path into an [`ArxivItem`].
pub trait ArxivPathParser {
    fn parse(&self, raw: &str) -> Option<ArxivItem>;
}

/// One row of the bibcode lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibcodeMatch {
    pub bibcode: String,
    pub accno: String,
    /// Submission date as YYYYMMDD.
    pub subdate: u32,
}

/// Resolves a partial bibcode into full bibcodes with their submission
/// dates.
pub trait BibcodeResolver {
    fn lookup(&self, partial: &str) -> Result<Vec<BibcodeMatch>, CollabError>;
}

/// Fetches or refreshes the PDF rendition of an item before the fallback
/// path runs.
pub trait PdfHarvester {
    fn harvest(&self, relpath: &str) -> Result<(), CollabError>;
}

/// The PDF-only extraction backend used when the TeX path fails or the
/// item was submitted as PDF.
pub trait PdfRefBackend {
    fn extract_references(&self, pdf: &Path) -> Result<Vec<String>, CollabError>;
}

/// The ArXiv category names used by the split-eprint repair. Only the
/// hyphenated ones matter there, but callers may extend the set.
pub fn default_arxiv_categories() -> HashSet<String> {
    [
        "astro-ph", "cond-mat", "gr-qc", "hep-ex", "hep-lat", "hep-ph", "hep-th", "math-ph",
        "nucl-ex", "nucl-th", "quant-ph", "nlin", "math", "physics", "cs", "q-bio", "q-fin",
        "stat", "eess", "econ",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Test doubles for the collaborator seams.
pub mod mock {
    use std::sync::Mutex;

    use super::*;

    /// Serves canned lookup rows.
    #[derive(Debug, Default)]
    pub struct MockResolver {
        pub matches: Vec<BibcodeMatch>,
    }

    impl BibcodeResolver for MockResolver {
        fn lookup(&self, partial: &str) -> Result<Vec<BibcodeMatch>, CollabError> {
            Ok(self
                .matches
                .iter()
                .filter(|m| m.bibcode.starts_with(partial))
                .cloned()
                .collect())
        }
    }

    /// Records harvest requests without doing anything.
    #[derive(Debug, Default)]
    pub struct MockHarvester {
        pub calls: Mutex<Vec<String>>,
    }

    impl PdfHarvester for MockHarvester {
        fn harvest(&self, relpath: &str) -> Result<(), CollabError> {
            self.calls.lock().unwrap().push(relpath.to_string());
            Ok(())
        }
    }

    /// Returns a fixed reference list for any PDF, counting invocations.
    #[derive(Debug, Default)]
    pub struct MockPdfBackend {
        pub refs: Vec<String>,
        pub calls: Mutex<usize>,
    }

    impl PdfRefBackend for MockPdfBackend {
        fn extract_references(&self, _pdf: &Path) -> Result<Vec<String>, CollabError> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.refs.clone())
        }
    }
}
