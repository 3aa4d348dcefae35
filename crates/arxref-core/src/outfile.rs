use std::io::Write;
use std::path::Path;

use crate::error::ExtractError;

/// Write the canonical references file:
///
/// ```text
/// %R <bibcode>
/// %Z
/// <reference per line>
/// ```
///
/// The write is atomic: content goes to a temporary sibling which is then
/// renamed over the target, so a failed item never leaves a truncated file.
pub fn write_refs_file(path: &Path, bibcode: &str, refs: &[String]) -> Result<(), ExtractError> {
    let wrap = |source: std::io::Error| ExtractError::Output {
        path: path.to_path_buf(),
        source,
    };

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(wrap)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(wrap)?;
    writeln!(tmp, "%R {}", bibcode).map_err(wrap)?;
    writeln!(tmp, "%Z").map_err(wrap)?;
    for reference in refs {
        writeln!(tmp, "{}", reference.trim_end()).map_err(wrap)?;
    }
    tmp.persist(path).map_err(|err| wrap(err.error))?;

    Ok(())
}

/// True when the target exists and is at least as new as the source.
pub fn is_fresh(target: &Path, source: &Path) -> bool {
    let Ok(target_meta) = std::fs::metadata(target) else {
        return false;
    };
    let Ok(source_meta) = std::fs::metadata(source) else {
        return false;
    };

    match (target_meta.modified(), source_meta.modified()) {
        (Ok(t), Ok(s)) => t >= s,
        _ => false,
    }
}
