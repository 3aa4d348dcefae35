use std::collections::HashSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

/// The TeX dialect a source file appears to be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexFormat {
    Plain,
    Latex,
}

/// A candidate "main" TeX file, with a confidence score and the metadata
/// mined while scanning it.
#[derive(Debug, Clone)]
pub struct MainCandidate {
    /// Path relative to the workspace root.
    pub path: PathBuf,
    /// Higher is more likely to be the main document.
    pub score: i32,
    /// The macro used to declare bibliography items; possibly custom.
    pub bibitem: String,
    /// A guess at the document title, empty if unknown.
    pub title: String,
    pub format: TexFormat,
    /// Set when the file asks to be skipped outright.
    pub ignore: bool,
}

/// Template files that are shipped alongside papers and must not win the
/// main-file contest.
fn basename_score_delta(basename: &str) -> i32 {
    match basename {
        "mn2eguide" | "mn2esample" | "mnras_guide" | "aa" => -100,
        "new_feat" => -50,
        "rnaas" => -5,
        // Some people put their paper in this file, so only nudge it down.
        "mnras_template" => -2,
        _ => 0,
    }
}

static LATEX_DOCCLASS_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"^\s+\\begin\s\{document\}").unwrap(),
        Regex::new(r"^\s*[^%$].*?\\begin\s*\{document\}").unwrap(),
        Regex::new(r"^\s*\\documentclass\b").unwrap(),
        Regex::new(r"^\s*\\documentstyle\b").unwrap(),
    ]
});

static MAIN_HINT_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)^\\title\{").unwrap(),
        Regex::new(r"(?i)^\s*\\begin\s*\{abstract\}\b").unwrap(),
        Regex::new(r"(?i)^\s*\\section\s*\{introduction\}\b").unwrap(),
        Regex::new(r"(?i)^\s*\\begin\s*\{(chapthebibliography|thebibliography|references)\}")
            .unwrap(),
    ]
});

static SHORTTITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*\\shorttitle\s*\{(.*)\}").unwrap());

static NEWCOMMAND_BIBITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*\\newcommand\s*\{\\([^}]+)\}.*?\{\\bibitem\b").unwrap());

static DEF_BIBITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*\\def\{?\\(.+?)\{\\bibitem\b").unwrap());

static INPUT_BRACED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\\input\{\s*(\S*?)\s*\}").unwrap());
static INPUT_PLAIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\\input\s+(\S+)").unwrap());

/// Titles shorter than this carry no useful signal for the cleaner.
const MIN_TITLE_LEN: usize = 10;

/// Scan the workspace for TeX sources and rank candidate main files,
/// best first.
///
/// Custom `\bibitem` macros and titles discovered in any file are
/// propagated as defaults to candidates that lack their own.
pub fn find_main_candidates(root: &Path) -> std::io::Result<Vec<MainCandidate>> {
    let mut candidates = Vec::new();
    let mut non_main: HashSet<String> = HashSet::new();

    for rel in collect_files(root)? {
        let rel = normalize_extension(root, rel)?;
        if let Some(candidate) = probe_one(root, rel, &mut non_main) {
            candidates.push(candidate);
        }
    }

    // Demote anything another file pulls in via \input.
    for candidate in &mut candidates {
        let s = candidate.path.to_string_lossy();
        let stem = s.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(&s);

        if non_main.contains(s.as_ref()) {
            candidate.score = -2;
        } else if non_main.contains(stem) {
            candidate.score = -1;
        }
    }

    candidates.sort_by_key(|c| std::cmp::Reverse(c.score));

    // Two-pass defaulting: the first file to declare a custom bibitem macro
    // or a plausible title supplies it to the ones that did not.
    let default_bibitem = candidates
        .iter()
        .find(|c| !c.bibitem.is_empty())
        .map(|c| c.bibitem.clone())
        .unwrap_or_else(|| "bibitem".to_string());
    let default_title = candidates
        .iter()
        .find(|c| c.title.len() >= MIN_TITLE_LEN)
        .map(|c| c.title.clone())
        .unwrap_or_default();

    for candidate in &mut candidates {
        if candidate.bibitem.is_empty() {
            candidate.bibitem = default_bibitem.clone();
        }
        if candidate.title.len() < MIN_TITLE_LEN {
            candidate.title = default_title.clone();
        }
    }

    Ok(candidates)
}

/// All regular files under `root`, as sorted relative paths.
fn collect_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut todo = vec![root.to_path_buf()];

    while let Some(dir) = todo.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                todo.push(path);
            } else if path.is_file() {
                if let Ok(rel) = path.strip_prefix(root) {
                    files.push(rel.to_path_buf());
                }
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Rename `.TEX` (any capitalization other than `.tex`) to `.tex` on disk so
/// the compiler finds it under the expected name.
fn normalize_extension(root: &Path, rel: PathBuf) -> std::io::Result<PathBuf> {
    let Some(ext) = rel.extension().map(|e| e.to_string_lossy().to_string()) else {
        return Ok(rel);
    };

    if ext != "tex" && ext.eq_ignore_ascii_case("tex") {
        let renamed = rel.with_extension("tex");
        std::fs::rename(root.join(&rel), root.join(&renamed))?;
        return Ok(renamed);
    }

    Ok(rel)
}

fn probe_one(root: &Path, rel: PathBuf, non_main: &mut HashSet<String>) -> Option<MainCandidate> {
    let lower = rel.to_string_lossy().to_lowercase();

    if lower.contains("psfig") {
        return None;
    }

    let mut candidate = MainCandidate {
        path: rel.clone(),
        score: 0,
        bibitem: String::new(),
        title: String::new(),
        format: TexFormat::Plain,
        ignore: false,
    };

    if lower.ends_with(".tex")
        || lower.ends_with(".ltx")
        || lower.ends_with(".latex")
        || lower.ends_with(".revtex")
    {
        candidate.score += 1;
    } else if lower.ends_with(".bib") || lower.ends_with(".bbl") || lower.ends_with(".txt") {
        // Plausible bibliography or text source, no bonus.
    } else if !lower.contains('.') {
        // Extensionless files are sometimes straight TeX.
    } else {
        return None;
    }

    let basename = rel.file_stem().map(|s| s.to_string_lossy().to_lowercase())?;
    candidate.score += basename_score_delta(&basename);

    tracing::trace!(path = %rel.display(), "scanning potential TeX source");

    let bytes = match std::fs::read(root.join(&rel)) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(path = %rel.display(), error = %err, "failed to read potential TeX source");
            return None;
        }
    };
    let content = String::from_utf8_lossy(&bytes);

    for line in content.lines() {
        if line.contains("%auto-ignore") {
            candidate.ignore = true;
            break;
        }

        if LATEX_DOCCLASS_RES.iter().any(|re| re.is_match(line)) {
            candidate.format = TexFormat::Latex;
            candidate.score += 1;
        }

        if MAIN_HINT_RES.iter().any(|re| re.is_match(line)) {
            candidate.score += 1;
            continue;
        }

        if let Some(m) = SHORTTITLE_RE.captures(line) {
            candidate.title = m[1].to_string();
            candidate.score += 1;
            continue;
        }

        if let Some(m) = NEWCOMMAND_BIBITEM_RE
            .captures(line)
            .or_else(|| DEF_BIBITEM_RE.captures(line))
        {
            if candidate.bibitem.is_empty() {
                candidate.bibitem = m[1].to_string();
            }
            continue;
        }

        if let Some(m) = INPUT_BRACED_RE
            .captures(line)
            .or_else(|| INPUT_PLAIN_RE.captures(line))
        {
            non_main.insert(m[1].to_string());
            continue;
        }
    }

    Some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, name: &str, content: &str) {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_latex_document_outranks_included_file() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "ms.tex",
            "\\documentclass{article}\n\\title{On the Origin of Everything}\n\
             \\input{intro}\n\\begin{document}\n\\begin{thebibliography}{9}\n",
        );
        write(dir.path(), "intro.tex", "Some introductory text.\n");

        let candidates = find_main_candidates(dir.path()).unwrap();
        assert_eq!(candidates[0].path, PathBuf::from("ms.tex"));
        assert_eq!(candidates[0].format, TexFormat::Latex);
        assert!(candidates[0].score > 1);

        let included = candidates
            .iter()
            .find(|c| c.path == PathBuf::from("intro.tex"))
            .unwrap();
        assert_eq!(included.score, -1);
    }

    #[test]
    fn test_exact_input_target_demoted_harder() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.tex", "\\documentclass{aa}\n\\input{defs.tex}\n");
        write(dir.path(), "defs.tex", "\\def\\x{1}\n");

        let candidates = find_main_candidates(dir.path()).unwrap();
        let defs = candidates
            .iter()
            .find(|c| c.path == PathBuf::from("defs.tex"))
            .unwrap();
        assert_eq!(defs.score, -2);
    }

    #[test]
    fn test_template_basenames_are_penalized() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "mn2eguide.tex",
            "\\documentclass{mn2e}\n\\begin{document}\n",
        );
        write(dir.path(), "paper.tex", "\\documentclass{mn2e}\n");

        let candidates = find_main_candidates(dir.path()).unwrap();
        assert_eq!(candidates[0].path, PathBuf::from("paper.tex"));
        assert!(candidates.last().unwrap().score < -90);
    }

    #[test]
    fn test_auto_ignore_marks_candidate() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "old.tex", "%auto-ignore\n\\documentclass{article}\n");

        let candidates = find_main_candidates(dir.path()).unwrap();
        assert!(candidates[0].ignore);
    }

    #[test]
    fn test_psfig_and_binary_names_excluded() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "psfig.tex", "\\documentclass{article}\n");
        write(dir.path(), "figure1.png", "not a png really");
        write(dir.path(), "ms.tex", "\\documentclass{article}\n");

        let candidates = find_main_candidates(dir.path()).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].path, PathBuf::from("ms.tex"));
    }

    #[test]
    fn test_uppercase_tex_extension_renamed() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "MS.TEX", "\\documentclass{article}\n");

        let candidates = find_main_candidates(dir.path()).unwrap();
        assert_eq!(candidates[0].path, PathBuf::from("MS.tex"));
        assert!(dir.path().join("MS.tex").is_file());
        assert!(!dir.path().join("MS.TEX").exists());
    }

    #[test]
    fn test_custom_bibitem_macro_propagates() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "macros.tex",
            "\\newcommand{\\rref}[1]{\\bibitem{#1}}\n",
        );
        write(
            dir.path(),
            "ms.tex",
            "\\documentclass{article}\n\\begin{document}\n\\begin{thebibliography}{9}\n",
        );

        let candidates = find_main_candidates(dir.path()).unwrap();
        for candidate in &candidates {
            assert_eq!(candidate.bibitem, "rref");
        }
    }

    #[test]
    fn test_short_titles_are_replaced_by_default() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "a.tex",
            "\\documentclass{article}\n\\shorttitle{Short}\n",
        );
        write(
            dir.path(),
            "b.tex",
            "\\documentclass{article}\n\\shorttitle{Galactic Dynamics Revisited}\n",
        );

        let candidates = find_main_candidates(dir.path()).unwrap();
        for candidate in &candidates {
            assert_eq!(candidate.title, "Galactic Dynamics Revisited");
        }
    }

    #[test]
    fn test_bibitem_falls_back_to_standard_macro() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ms.tex", "\\documentclass{article}\n");

        let candidates = find_main_candidates(dir.path()).unwrap();
        assert_eq!(candidates[0].bibitem, "bibitem");
    }
}
