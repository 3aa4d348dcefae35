pub mod batch;
pub mod collab;
pub mod config;
pub mod error;
pub mod item;
pub mod orchestrator;
pub mod outfile;

pub use batch::{run_batch, BatchStats, JobSpec};
pub use collab::{ArxivPathParser, BibcodeMatch, BibcodeResolver, PdfHarvester, PdfRefBackend};
pub use config::Config;
pub use error::ExtractError;
pub use item::{parse_arxiv_path, partial_bibcode, ArxivItem, StandardPathParser};
pub use orchestrator::{process_item, ExtractionContext, Job, RunFlags};
// Re-export the engine knobs callers commonly need.
pub use arxref_tex::DviJoinPolicy;

/// What kind of source a fulltext suffix denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Tex,
    Pdf,
}

impl SourceFormat {
    /// Items with any other suffix are skipped with a non-fatal error.
    pub fn from_suffix(suffix: &str) -> Option<SourceFormat> {
        match suffix {
            "tar.gz" | "tar" | "tex.gz" | "tex" | "gz" => Some(SourceFormat::Tex),
            "pdf" | "pdf.gz" => Some(SourceFormat::Pdf),
            _ => None,
        }
    }
}

/// The classified result of one extraction attempt.
#[derive(Debug)]
pub enum ExtractionOutcome {
    /// Enough references to emit an output file.
    Ok(Vec<String>),
    /// The attempt ran but found nothing.
    Empty,
    /// Found some references, but too few to trust.
    TooFew(usize),
    /// The attempt itself failed.
    Failed(ExtractError),
}

impl ExtractionOutcome {
    /// Classify an attempt against the acceptance threshold.
    pub fn classify(result: Result<Vec<String>, ExtractError>, min_refs: usize) -> Self {
        match result {
            Ok(refs) if refs.is_empty() => ExtractionOutcome::Empty,
            Ok(refs) if refs.len() < min_refs => ExtractionOutcome::TooFew(refs.len()),
            Ok(refs) => ExtractionOutcome::Ok(refs),
            Err(err) => ExtractionOutcome::Failed(err),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ExtractionOutcome::Ok(_))
    }

    /// Collapse into a `Result`, mapping the rejection cases onto the
    /// error taxonomy.
    pub fn into_result(self) -> Result<Vec<String>, ExtractError> {
        match self {
            ExtractionOutcome::Ok(refs) => Ok(refs),
            ExtractionOutcome::Empty => Err(ExtractError::NoReferencesFound),
            ExtractionOutcome::TooFew(n) => Err(ExtractError::TooFewReferences(n)),
            ExtractionOutcome::Failed(err) => Err(err),
        }
    }

    /// A short human-readable description, for log lines.
    pub fn describe(&self) -> String {
        match self {
            ExtractionOutcome::Ok(refs) => format!("{} references", refs.len()),
            ExtractionOutcome::Empty => "no references found".to_string(),
            ExtractionOutcome::TooFew(n) => format!("only {} references found", n),
            ExtractionOutcome::Failed(err) => err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_format_from_suffix() {
        assert_eq!(SourceFormat::from_suffix("tar.gz"), Some(SourceFormat::Tex));
        assert_eq!(SourceFormat::from_suffix("tar"), Some(SourceFormat::Tex));
        assert_eq!(SourceFormat::from_suffix("tex.gz"), Some(SourceFormat::Tex));
        assert_eq!(SourceFormat::from_suffix("tex"), Some(SourceFormat::Tex));
        assert_eq!(SourceFormat::from_suffix("gz"), Some(SourceFormat::Tex));
        assert_eq!(SourceFormat::from_suffix("pdf"), Some(SourceFormat::Pdf));
        assert_eq!(SourceFormat::from_suffix("pdf.gz"), Some(SourceFormat::Pdf));
        assert_eq!(SourceFormat::from_suffix("ps.gz"), None);
        assert_eq!(SourceFormat::from_suffix(""), None);
    }

    #[test]
    fn test_outcome_classification() {
        let ok = ExtractionOutcome::classify(Ok(vec!["a".into(); 4]), 4);
        assert!(ok.is_ok());

        let few = ExtractionOutcome::classify(Ok(vec!["a".into(); 3]), 4);
        assert!(matches!(few, ExtractionOutcome::TooFew(3)));
        assert_eq!(few.describe(), "only 3 references found");

        let empty = ExtractionOutcome::classify(Ok(vec![]), 4);
        assert!(matches!(empty, ExtractionOutcome::Empty));

        let failed = ExtractionOutcome::classify(Err(ExtractError::NoReferencesFound), 4);
        assert!(matches!(failed, ExtractionOutcome::Failed(_)));
    }

    #[test]
    fn test_outcome_into_result() {
        let err = ExtractionOutcome::TooFew(2).into_result().unwrap_err();
        assert!(matches!(err, ExtractError::TooFewReferences(2)));

        let err = ExtractionOutcome::Empty.into_result().unwrap_err();
        assert!(matches!(err, ExtractError::NoReferencesFound));
    }
}
