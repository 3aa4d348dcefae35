use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

pub mod cleaner;
pub mod compile;
pub mod finder;
pub mod markers;
pub mod process;
pub mod tagger;
pub mod toolchain;

pub use finder::{find_main_candidates, MainCandidate, TexFormat};
pub use markers::DviJoinPolicy;
pub use process::{ProcessError, RunStatus, TIMEOUT_EXIT_CODE};
pub use toolchain::{EnvFrame, MarkerStyle, Toolchain};

#[derive(Error, Debug)]
pub enum TexError {
    #[error("no usable TeX source file found")]
    NoMainFile,
    #[error("submission is withdrawn (all sources marked auto-ignore)")]
    Withdrawn,
    #[error(transparent)]
    Process(#[from] process::ProcessError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Knobs for one extraction attempt.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Retry the build with PostScript includes rewritten to PDF when the
    /// first pass yields nothing. Only applies to the pdfTeX path.
    pub convert_ps_retry: bool,
    pub join_policy: DviJoinPolicy,
}

/// Extract reference strings from an unpacked TeX source directory.
///
/// Pipeline:
/// 1. Score the files and rank candidate main documents
/// 2. Tag every bibliography item with extraction markers
/// 3. Build candidates in rank order under the era-appropriate toolchain
/// 4. Mine the typeset output for the markers
///
/// An empty result means every build either failed or produced no marked
/// references; the caller decides what that means for the item.
pub fn extract_references(
    root: &Path,
    toolchain: &Toolchain,
    tex_root: &Path,
    categories: &HashSet<String>,
    options: &ExtractOptions,
) -> Result<Vec<String>, TexError> {
    let candidates = finder::find_main_candidates(root)?;
    if candidates.is_empty() {
        return Err(TexError::NoMainFile);
    }
    if candidates.iter().all(|c| c.ignore) {
        return Err(TexError::Withdrawn);
    }

    let style = toolchain.marker_style();
    let mut tagged_total = 0usize;

    for candidate in &candidates {
        if candidate.ignore {
            tracing::debug!(path = %candidate.path.display(), "not tagging ignored file");
            continue;
        }
        tagged_total += tagger::tag_references(&root.join(&candidate.path), &candidate.bibitem, style)?;
    }
    tracing::debug!(tagged_total, "tagged bibliography items across sources");

    // The toolchain environment is scoped to the build steps only.
    let _env = toolchain.apply(tex_root);

    let refs = compile::compile_and_extract(root, &candidates, style, categories, options.join_policy);
    if !refs.is_empty() {
        return Ok(refs);
    }

    if options.convert_ps_retry && style == MarkerStyle::Pdf {
        let sources: Vec<&Path> = candidates.iter().map(|c| c.path.as_path()).collect();
        let changed = tagger::convert_ps_graphics(root, &sources)?;
        if changed > 0 {
            tracing::debug!(changed, "retrying builds with PDF graphics");
            let refs =
                compile::compile_and_extract(root, &candidates, style, categories, options.join_policy);
            if !refs.is_empty() {
                return Ok(refs);
            }
        }
    }

    tracing::debug!("could not extract references from any candidate");
    Ok(Vec::new())
}
