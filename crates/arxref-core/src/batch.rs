use std::io::{BufRead, Write};

use crate::orchestrator::{process_item, ExtractionContext};

/// One row of the batch input stream, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub path: String,
    pub bibcode: Option<String>,
    pub accno: Option<String>,
    pub subdate: Option<u32>,
}

impl JobSpec {
    /// Parse a whitespace-separated input line:
    /// `path [bibcode [accno [subdate]]]`. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<JobSpec> {
        let mut fields = line.split_whitespace();
        let path = fields.next()?.to_string();
        let bibcode = fields.next().map(String::from);
        let accno = fields.next().map(String::from);
        let subdate = fields.next().and_then(|s| s.parse().ok());

        Some(JobSpec {
            path,
            bibcode,
            accno,
            subdate,
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    pub processed: usize,
    pub failed: usize,
    /// Items that ran to completion without writing output (`skip_refs`).
    pub skipped: usize,
}

/// Stream jobs through the orchestrator.
///
/// For every item that produced an output file, a `path<TAB>target` line
/// goes to `out`; failed items emit the bare path. Items that ran but
/// deliberately wrote nothing (`skip_refs`) emit no line and are not
/// counted as failures. All diagnostics go to the log (stderr), never to
/// `out`. Per-item errors are counted, not propagated.
pub fn run_batch<R: BufRead, W: Write>(
    ctx: &ExtractionContext,
    input: R,
    out: &mut W,
) -> std::io::Result<BatchStats> {
    let mut stats = BatchStats::default();

    for line in input.lines() {
        let line = line?;
        let Some(spec) = JobSpec::parse(&line) else {
            tracing::debug!("ignoring blank input line");
            continue;
        };

        stats.processed += 1;

        match process_item(ctx, &spec) {
            Ok(Some(target)) => {
                writeln!(out, "{}\t{}", spec.path, target.display())?;
            }
            Ok(None) => {
                tracing::debug!("{}: processed, no output written", spec.path);
                stats.skipped += 1;
            }
            Err(err) => {
                tracing::warn!("{}: {}", spec.path, err);
                writeln!(out, "{}", spec.path)?;
                stats.failed += 1;
            }
        }
    }

    tracing::info!("processed {} items", stats.processed);
    if stats.skipped > 0 {
        tracing::info!("{} items processed without writing output", stats.skipped);
    }
    if stats.failed > 0 {
        tracing::info!("{} items could not be processed", stats.failed);
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_line() {
        let spec =
            JobSpec::parse("arXiv/2111/03186.tar.gz 2021arXiv211103186S X1 20211107").unwrap();
        assert_eq!(spec.path, "arXiv/2111/03186.tar.gz");
        assert_eq!(spec.bibcode.as_deref(), Some("2021arXiv211103186S"));
        assert_eq!(spec.accno.as_deref(), Some("X1"));
        assert_eq!(spec.subdate, Some(20211107));
    }

    #[test]
    fn test_parse_path_only() {
        let spec = JobSpec::parse("arXiv/2111/03186.tar.gz").unwrap();
        assert_eq!(spec.bibcode, None);
        assert_eq!(spec.accno, None);
        assert_eq!(spec.subdate, None);
    }

    #[test]
    fn test_parse_blank_line() {
        assert_eq!(JobSpec::parse(""), None);
        assert_eq!(JobSpec::parse("   \t "), None);
    }
}
