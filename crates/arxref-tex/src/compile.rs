use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::finder::{MainCandidate, TexFormat};
use crate::markers::{self, DviJoinPolicy};
use crate::process::{self, RunStatus};
use crate::toolchain::MarkerStyle;

const TEX_TIMEOUT: Duration = Duration::from_secs(100);
const CONVERT_TIMEOUT: Duration = Duration::from_secs(60);

static OUTPUT_WRITTEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^Output written on (.*) \(").unwrap());

/// Try each candidate main file in score order; the first build whose
/// typeset output yields at least one marked reference wins.
///
/// Build failures are per-candidate and soft: TeX exits nonzero for mere
/// warnings all the time, so the exit status is ignored and only the
/// presence of usable output matters.
pub fn compile_and_extract(
    root: &Path,
    candidates: &[MainCandidate],
    style: MarkerStyle,
    categories: &HashSet<String>,
    policy: DviJoinPolicy,
) -> Vec<String> {
    for candidate in candidates {
        if candidate.ignore {
            tracing::debug!(path = %candidate.path.display(), "skipping ignored candidate");
            continue;
        }

        let refs = try_candidate(root, candidate, style, categories, policy);
        if !refs.is_empty() {
            tracing::debug!(
                path = %candidate.path.display(),
                n = refs.len(),
                "candidate produced references"
            );
            return refs;
        }
    }

    tracing::debug!("no candidate produced references");
    Vec::new()
}

fn try_candidate(
    root: &Path,
    candidate: &MainCandidate,
    style: MarkerStyle,
    categories: &HashSet<String>,
    policy: DviJoinPolicy,
) -> Vec<String> {
    tracing::debug!(main_file = %candidate.path.display(), "trying a TeX build");

    let (program, fixed_args): (&str, &[&str]) = match (candidate.format, style) {
        (TexFormat::Latex, MarkerStyle::Pdf) => ("pdflatex", &["-interaction=nonstopmode"]),
        (TexFormat::Plain, MarkerStyle::Pdf) => ("pdftex", &[]),
        (TexFormat::Latex, MarkerStyle::Dvi) => ("latex", &["-interaction=nonstopmode"]),
        (TexFormat::Plain, MarkerStyle::Dvi) => ("tex", &[]),
    };

    let rel = candidate.path.to_string_lossy();
    let mut args: Vec<&str> = fixed_args.to_vec();
    args.push(&rel);

    match process::run_quiet(TEX_TIMEOUT, root, program, &args) {
        Ok(RunStatus::TimedOut) => {
            tracing::warn!(main_file = %rel, "TeX build timed out");
        }
        Ok(status) if !status.success() => {
            // Warnings and recoverable errors are normal; the output decides.
            tracing::trace!(code = status.code(), "TeX exited nonzero");
        }
        Ok(_) => {}
        Err(err) => {
            tracing::warn!(program, error = %err, "could not run TeX");
            return Vec::new();
        }
    }

    let stem = candidate
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| rel.to_string());

    let default_ext = match style {
        MarkerStyle::Pdf => "pdf",
        MarkerStyle::Dvi => "dvi",
    };
    let mut out_path = root.join(format!("{}.{}", stem, default_ext));

    // The logfile knows the real output name when it differs.
    if let Some(from_log) = output_name_from_log(&root.join(format!("{}.log", stem))) {
        out_path = root.join(from_log);
    }

    match std::fs::metadata(&out_path) {
        Err(_) => {
            tracing::debug!(output = %out_path.display(), "expected TeX output file not found");
            return Vec::new();
        }
        Ok(meta) if meta.len() == 0 => {
            tracing::debug!(output = %out_path.display(), "TeX output has zero size");
            let _ = std::fs::remove_file(&out_path);
            return Vec::new();
        }
        Ok(_) => {}
    }

    let Some(text) = convert_to_text(root, &out_path) else {
        return Vec::new();
    };

    match style {
        MarkerStyle::Pdf => markers::parse_pdf_markers(&text, categories),
        MarkerStyle::Dvi => {
            let title = Some(candidate.title.as_str()).filter(|t| !t.is_empty());
            markers::parse_dvi_markers(&text, title, policy)
        }
    }
}

fn output_name_from_log(log_path: &Path) -> Option<String> {
    let bytes = std::fs::read(log_path).ok()?;
    let content = String::from_utf8_lossy(&bytes);

    let mut name = None;
    for line in content.lines() {
        if let Some(m) = OUTPUT_WRITTEN_RE.captures(line) {
            name = Some(m[1].trim().to_string());
        }
    }
    name
}

/// Convert the typeset output to plain text next to it, returning the text.
fn convert_to_text(root: &Path, out_path: &Path) -> Option<String> {
    let txt_path = PathBuf::from(format!("{}.txt", out_path.display()));
    let out_str = out_path.to_string_lossy();
    let txt_str = txt_path.to_string_lossy();

    let is_dvi = out_path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("dvi"));

    let status = if is_dvi {
        process::run_stdout_to(CONVERT_TIMEOUT, root, "dvitype", &[out_str.as_ref()], &txt_path)
    } else {
        process::run_quiet(
            CONVERT_TIMEOUT,
            root,
            "pdftotext",
            &["-raw", "-enc", "ASCII7", out_str.as_ref(), txt_str.as_ref()],
        )
    };

    match status {
        Ok(status) if !status.success() => {
            tracing::warn!(output = %out_str, code = status.code(), "text conversion exited nonzero");
        }
        Ok(_) => {}
        Err(err) => {
            tracing::warn!(output = %out_str, error = %err, "text conversion failed");
            return None;
        }
    }

    let bytes = std::fs::read(&txt_path).ok()?;
    if bytes.is_empty() {
        tracing::debug!(text = %txt_str, "text conversion produced nothing");
        return None;
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}
