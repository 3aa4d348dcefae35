use std::path::Path;

use arxref_core::collab::{BibcodeMatch, BibcodeResolver, CollabError};

/// Bibcode lookup backed by a `bib2accno`-style table: whitespace-separated
/// `bibcode accno subdate` rows, matched by bibcode prefix.
#[derive(Debug, Default)]
pub struct ListResolver {
    rows: Vec<BibcodeMatch>,
}

impl ListResolver {
    pub fn load(path: &Path) -> std::io::Result<ListResolver> {
        let content = std::fs::read_to_string(path)?;
        let mut rows = Vec::new();

        for line in content.lines() {
            let mut fields = line.split_whitespace();
            let Some(bibcode) = fields.next() else {
                continue;
            };
            if bibcode.starts_with('#') {
                continue;
            }
            let accno = fields.next().unwrap_or_default();
            let subdate = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);

            rows.push(BibcodeMatch {
                bibcode: bibcode.to_string(),
                accno: accno.to_string(),
                subdate,
            });
        }

        tracing::debug!(rows = rows.len(), path = %path.display(), "loaded bibcode table");
        Ok(ListResolver { rows })
    }

    #[cfg(test)]
    fn from_rows(rows: Vec<BibcodeMatch>) -> ListResolver {
        ListResolver { rows }
    }
}

impl BibcodeResolver for ListResolver {
    fn lookup(&self, partial: &str) -> Result<Vec<BibcodeMatch>, CollabError> {
        Ok(self
            .rows
            .iter()
            .filter(|row| row.bibcode.starts_with(partial))
            .cloned()
            .collect())
    }
}

/// Resolver used when no lookup table is configured; every lookup misses,
/// so rows without an explicit bibcode fail per-item.
#[derive(Debug, Default)]
pub struct EmptyResolver;

impl BibcodeResolver for EmptyResolver {
    fn lookup(&self, _partial: &str) -> Result<Vec<BibcodeMatch>, CollabError> {
        Ok(Vec::new())
    }
}
