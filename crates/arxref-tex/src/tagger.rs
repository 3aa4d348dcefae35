use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::process::{self, ProcessError};
use crate::toolchain::MarkerStyle;

/// Markers injected around each reference when the output will be mined
/// from pdftotext output. `$<$...$>$` typesets as literal angle brackets.
const PDF_REF_OPEN: &str = r"\newpage\onecolumn\section*{}$<$r$>$\sloppy\raggedright";
const PDF_REF_CLOSE: &str = r"$<$/r$>$";
const PDF_BIB_OPEN: &str = r"$<$references$>$";
const PDF_BIB_CLOSE: &str = r"$<$/references$>$";

/// Markers for DVI output; `\special` survives into dvitype output without
/// affecting typesetting.
const DVI_REF_OPEN: &str = r"\special{citation_open}";
const DVI_REF_CLOSE: &str = r"\special{citation_close}";
const DVI_BIB_OPEN: &str = r"\special{ref_open}";
const DVI_BIB_CLOSE: &str = r"\special{ref_close}";

const EPSTOPDF_TIMEOUT: Duration = Duration::from_secs(5);

static START_REFS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\\begin\s*\{(chapthebibliography|thebibliography|references)\}").unwrap()
});
static END_REFS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*\\end\s*\{(chapthebibliography|thebibliography|references)\}").unwrap()
});

/// `word -- word` typesets as an en-dash, which the text converters then
/// garble mid-reference; collapse to a single hyphen.
static DOUBLE_HYPHEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\w+\s*)--(\s*\w+)\b").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefType {
    Bibitem,
    Reference,
    Other,
}

/// Rewrite one source file so every bibliography item is bracketed by
/// extraction markers. Returns the number of references tagged.
///
/// The file is left byte-identical in structure outside the bibliography
/// except for italic normalization, and every rewrite goes through a
/// temporary file renamed into place.
pub fn tag_references(
    path: &Path,
    bibitem_macro: &str,
    style: MarkerStyle,
) -> std::io::Result<usize> {
    let bytes = std::fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes);

    let (rewritten, tagged) = tag_content(&content, path, bibitem_macro, style);
    let rewritten = normalize_italics(&rewritten);

    write_in_place(path, &rewritten)?;

    tracing::debug!(path = %path.display(), tagged, "finished tagging a file");
    Ok(tagged)
}

fn tag_content(
    content: &str,
    path: &Path,
    bibitem_macro: &str,
    style: MarkerStyle,
) -> (String, usize) {
    let lines: Vec<&str> = content.lines().collect();
    let lower = path.to_string_lossy().to_lowercase();
    let is_bibfile = lower.ends_with(".bib") || lower.ends_with(".bbl");

    let mut out = String::with_capacity(content.len() + 1024);

    // Copy the preamble through the bibliography opener. Files that are
    // nothing but a bibliography (.bib/.bbl) have no opener; tag them from
    // the top instead.
    let begin = lines.iter().position(|line| START_REFS_RE.is_match(line));
    let body_start = match begin {
        Some(idx) => {
            for line in &lines[..=idx] {
                out.push_str(line);
                out.push('\n');
            }
            push_line(&mut out, bib_open(style));
            idx + 1
        }
        None if is_bibfile => 0,
        None => {
            // No bibliography here; leave the file as it was.
            return (content.to_string(), 0);
        }
    };

    let start_item_re = Regex::new(&format!(
        r"(?i)^\s*\\(bibitem|reference|rn|rf|rfprep|item|{})\b(.*)",
        regex::escape(bibitem_macro)
    ))
    .expect("item regex");

    let mut tag: Option<String> = None;
    let mut ref_type = RefType::Other;
    let mut cur = String::new();
    let mut tagged = 0usize;
    let mut idx = body_start;

    while idx < lines.len() {
        let line = lines[idx];
        idx += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('%') {
            continue;
        }

        if END_REFS_RE.is_match(line) {
            if !cur.trim().is_empty() {
                emit_reference(&mut out, tag.as_deref().unwrap_or("bibitem"), &cur, ref_type, style);
                tagged += 1;
                cur.clear();
            }
            push_line(&mut out, bib_close(style));
            out.push_str(line);
            out.push('\n');
            // Everything after the bibliography is copied verbatim.
            for rest in &lines[idx..] {
                out.push_str(rest);
                out.push('\n');
            }
            return (out, tagged);
        }

        let line = DOUBLE_HYPHEN_RE.replace_all(line, "$1-$2");

        if let Some(m) = start_item_re.captures(&line) {
            if tag.is_none() {
                let macro_name = m[1].to_string();
                ref_type = classify_macro(&macro_name, bibitem_macro);
                tag = Some(macro_name);
            }
            if !cur.trim().is_empty() {
                emit_reference(&mut out, tag.as_deref().unwrap_or("bibitem"), &cur, ref_type, style);
                tagged += 1;
            }
            cur = m[2].to_string();
        } else if tag.is_some() {
            cur.push('\n');
            cur.push_str(&line);
        } else {
            // Still between the opener and the first item.
            out.push_str(&line);
            out.push('\n');
        }
    }

    if !cur.trim().is_empty() {
        emit_reference(&mut out, tag.as_deref().unwrap_or("bibitem"), &cur, ref_type, style);
        tagged += 1;
    }
    if tagged > 0 {
        push_line(&mut out, bib_close(style));
    }

    (out, tagged)
}

fn bib_open(style: MarkerStyle) -> &'static str {
    match style {
        MarkerStyle::Pdf => PDF_BIB_OPEN,
        MarkerStyle::Dvi => DVI_BIB_OPEN,
    }
}

fn bib_close(style: MarkerStyle) -> &'static str {
    match style {
        MarkerStyle::Pdf => PDF_BIB_CLOSE,
        MarkerStyle::Dvi => DVI_BIB_CLOSE,
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

fn classify_macro(name: &str, custom: &str) -> RefType {
    if name.eq_ignore_ascii_case("bibitem") || name.eq_ignore_ascii_case(custom) {
        RefType::Bibitem
    } else if name.eq_ignore_ascii_case("reference") || name.eq_ignore_ascii_case("ref") {
        RefType::Reference
    } else {
        RefType::Other
    }
}

/// Emit one tagged reference.
///
/// `\bibitem` items carry an optional `[label]` and a mandatory `{key}`
/// argument; `\reference` items carry an optional `{bibcode}`. Those are
/// peeled off the body and kept with the macro so the markers wrap only the
/// reference text.
fn emit_reference(out: &mut String, tag: &str, body: &str, ref_type: RefType, style: MarkerStyle) {
    let mut prefix = format!("\\{}", tag);
    let mut rest = body.to_string();

    match ref_type {
        RefType::Bibitem => {
            let (left, remainder) = split_delimited_prefix(&rest, '[', ']');
            prefix.push_str(&left);
            let (left, remainder) = split_delimited_prefix(&remainder, '{', '}');
            prefix.push_str(&left);
            rest = remainder;
        }
        RefType::Reference => {
            let (left, remainder) = split_delimited_prefix(&rest, '{', '}');
            prefix.push_str(&left);
            rest = remainder;
        }
        RefType::Other => {}
    }

    let rest = strip_diacritics(&rest);

    let (open, close) = match style {
        MarkerStyle::Pdf => (PDF_REF_OPEN, PDF_REF_CLOSE),
        MarkerStyle::Dvi => (DVI_REF_OPEN, DVI_REF_CLOSE),
    };

    out.push_str(&format!("{} {} {}\n{}\n", prefix, open, rest.trim(), close));
}

/// Split `text` into a balanced delimited prefix and the remainder.
///
/// The text may start with whitespace and then the opening delimiter; the
/// prefix runs through the matching closer. If the first non-space character
/// is not the opener, or the delimiters never balance, the prefix is empty.
fn split_delimited_prefix(text: &str, open: char, close: char) -> (String, String) {
    let mut depth = 0usize;

    for (idx, ch) in text.char_indices() {
        if depth > 0 {
            if ch == open {
                depth += 1;
            } else if ch == close {
                depth -= 1;
                if depth == 0 {
                    let split = idx + ch.len_utf8();
                    return (text[..split].to_string(), text[split..].to_string());
                }
            }
            continue;
        }

        if ch.is_whitespace() {
            continue;
        } else if ch == open {
            depth += 1;
        } else {
            break;
        }
    }

    (String::new(), text.to_string())
}

static DIACRITIC_WRAPPED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\{\\[`'^"~=.Hcbduvt]([A-Za-z])\}"#).unwrap());
static DIACRITIC_BRACED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\\[`'^"~=.]\{([A-Za-z])\}"#).unwrap());
static DIACRITIC_BARE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\\[`'^"~=.]([A-Za-z])"#).unwrap());

/// Remove accent macros, which the text converters would otherwise render
/// as stray punctuation inside the reference: `{\'e}` / `\'{e}` / `\'e`
/// all become `e`.
fn strip_diacritics(text: &str) -> String {
    let text = DIACRITIC_WRAPPED_RE.replace_all(text, "$1");
    let text = DIACRITIC_BRACED_RE.replace_all(&text, "$1");
    DIACRITIC_BARE_RE.replace_all(&text, "$1").into_owned()
}

static EM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\\em\s+([^}]*)\}").unwrap());
static IT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\\it\s+([^}]*)\}").unwrap());
static TEXTIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\textit\s*\{([^}]*)\}").unwrap());
static EMPH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\emph\s*\{([^}]*)\}").unwrap());

/// Replace italic and emphasis groups with plain quoted text. Font-switch
/// commands inside references confuse the downstream text conversion.
fn normalize_italics(content: &str) -> String {
    let content = EM_RE.replace_all(content, "\"$1\"");
    let content = IT_RE.replace_all(&content, "\"$1\"");
    let content = TEXTIT_RE.replace_all(&content, "\"$1\"");
    EMPH_RE.replace_all(&content, "\"$1\"").into_owned()
}

static PS_EXT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.(?:eps|epsi|epsf|ps)\b").unwrap());

/// Rewrite PostScript graphics includes to PDF in the given source files,
/// and convert the graphics themselves with `epstopdf` where no PDF twin
/// exists yet. Returns the number of files whose text changed.
pub fn convert_ps_graphics(root: &Path, sources: &[&Path]) -> Result<usize, ProcessError> {
    let mut changed = 0usize;

    for rel in sources {
        let path = root.join(rel);
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        let content = String::from_utf8_lossy(&bytes);
        let rewritten = PS_EXT_RE.replace_all(&content, ".pdf");
        if rewritten != content {
            write_in_place(&path, &rewritten)?;
            changed += 1;
        }
    }

    // Convert graphics files that now have dangling .pdf references.
    let mut todo = vec![root.to_path_buf()];
    while let Some(dir) = todo.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                todo.push(path);
                continue;
            }
            let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_lowercase()) else {
                continue;
            };
            if !matches!(ext.as_str(), "ps" | "eps" | "epsi" | "epsf") {
                continue;
            }
            if path.with_extension("pdf").exists() {
                continue;
            }

            let name = path.to_string_lossy();
            tracing::debug!(graphic = %name, "converting PostScript graphic");
            match process::run_quiet(EPSTOPDF_TIMEOUT, root, "epstopdf", &[name.as_ref()]) {
                Ok(status) if !status.success() => {
                    tracing::warn!(graphic = %name, code = status.code(), "epstopdf failed");
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(graphic = %name, error = %err, "could not run epstopdf");
                }
            }
        }
    }

    Ok(changed)
}

/// Rewrite a file via a temporary sibling renamed into place, so a crash
/// mid-write never leaves a truncated source behind.
fn write_in_place(path: &Path, content: &str) -> std::io::Result<()> {
    use std::io::Write;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(content.as_bytes())?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn tag_str(content: &str, name: &str, macro_name: &str, style: MarkerStyle) -> (String, usize) {
        tag_content(content, &PathBuf::from(name), macro_name, style)
    }

    #[test]
    fn test_bibitems_are_bracketed_with_pdf_markers() {
        let src = "\\documentclass{article}\n\
                   \\begin{document}\n\
                   \\begin{thebibliography}{99}\n\
                   \\bibitem{k1} Smith, J. 2001, ApJ, 1, 1\n\
                   \\bibitem{k2} Jones, K. 2002, MNRAS, 2, 2\n\
                   \\end{thebibliography}\n\
                   \\end{document}\n";
        let (out, tagged) = tag_str(src, "ms.tex", "bibitem", MarkerStyle::Pdf);

        assert_eq!(tagged, 2);
        assert!(out.contains(PDF_BIB_OPEN));
        assert!(out.contains(PDF_BIB_CLOSE));
        assert!(out.contains("\\bibitem{k1} \\newpage\\onecolumn"));
        assert!(out.contains("Smith, J. 2001, ApJ, 1, 1\n$<$/r$>$"));
        assert!(out.contains("\\end{thebibliography}"));
        assert!(out.contains("\\end{document}"));
    }

    #[test]
    fn test_optional_label_stays_with_macro() {
        let src = "\\begin{thebibliography}{99}\n\
                   \\bibitem[Smith (2001)]{k1} Smith, J. 2001\n\
                   \\end{thebibliography}\n";
        let (out, tagged) = tag_str(src, "ms.tex", "bibitem", MarkerStyle::Pdf);

        assert_eq!(tagged, 1);
        assert!(out.contains("\\bibitem[Smith (2001)]{k1} \\newpage"));
    }

    #[test]
    fn test_reference_macro_peels_bibcode_argument() {
        let src = "\\begin{references}\n\
                   \\reference{1989ApJ...345..245C} Cardelli, J. 1989\n\
                   \\end{references}\n";
        let (out, tagged) = tag_str(src, "ms.tex", "bibitem", MarkerStyle::Pdf);

        assert_eq!(tagged, 1);
        assert!(out.contains("\\reference{1989ApJ...345..245C} \\newpage"));
        assert!(out.contains("Cardelli, J. 1989"));
    }

    #[test]
    fn test_multiline_reference_accumulates() {
        let src = "\\begin{thebibliography}{99}\n\
                   \\bibitem{k1} Smith, J. 2001,\n\
                   ApJ, 1, 1\n\
                   \\bibitem{k2} Jones 2002\n\
                   \\end{thebibliography}\n";
        let (out, tagged) = tag_str(src, "ms.tex", "bibitem", MarkerStyle::Pdf);

        assert_eq!(tagged, 2);
        assert!(out.contains("Smith, J. 2001,\nApJ, 1, 1"));
    }

    #[test]
    fn test_bbl_without_opener_is_tagged_from_top() {
        let src = "\\bibitem{k1} First reference text\n\
                   \\bibitem{k2} Second reference text\n";
        let (out, tagged) = tag_str(src, "refs.bbl", "bibitem", MarkerStyle::Pdf);

        assert_eq!(tagged, 2);
        assert!(out.contains("First reference text"));
        assert!(out.contains("Second reference text"));
    }

    #[test]
    fn test_plain_tex_without_bibliography_is_untouched() {
        let src = "\\documentclass{article}\nNothing to see here.\n";
        let (out, tagged) = tag_str(src, "ms.tex", "bibitem", MarkerStyle::Pdf);

        assert_eq!(tagged, 0);
        assert_eq!(out, src);
    }

    #[test]
    fn test_comments_and_blanks_inside_bibliography_dropped() {
        let src = "\\begin{thebibliography}{99}\n\
                   % a comment\n\
                   \n\
                   \\bibitem{k1} Ref one\n\
                   \\end{thebibliography}\n";
        let (out, tagged) = tag_str(src, "ms.tex", "bibitem", MarkerStyle::Pdf);

        assert_eq!(tagged, 1);
        assert!(!out.contains("% a comment"));
    }

    #[test]
    fn test_custom_macro_counts_as_bibitem() {
        let src = "\\begin{thebibliography}{99}\n\
                   \\rref{k1} Custom ref one\n\
                   \\rref{k2} Custom ref two\n\
                   \\end{thebibliography}\n";
        let (out, tagged) = tag_str(src, "ms.tex", "rref", MarkerStyle::Pdf);

        assert_eq!(tagged, 2);
        assert!(out.contains("\\rref{k1} \\newpage"));
    }

    #[test]
    fn test_dvi_markers_use_specials() {
        let src = "\\begin{thebibliography}{99}\n\
                   \\bibitem{k1} Ref one\n\
                   \\end{thebibliography}\n";
        let (out, tagged) = tag_str(src, "ms.tex", "bibitem", MarkerStyle::Dvi);

        assert_eq!(tagged, 1);
        assert!(out.contains(DVI_BIB_OPEN));
        assert!(out.contains(DVI_REF_OPEN));
        assert!(out.contains(DVI_REF_CLOSE));
        assert!(out.contains(DVI_BIB_CLOSE));
    }

    #[test]
    fn test_double_hyphens_collapsed() {
        let src = "\\begin{thebibliography}{99}\n\
                   \\bibitem{k1} Pages 100 -- 200, A&A\n\
                   \\end{thebibliography}\n";
        let (out, _) = tag_str(src, "ms.tex", "bibitem", MarkerStyle::Pdf);
        assert!(out.contains("100 - 200"));
        assert!(!out.contains("--"));
    }

    #[test]
    fn test_diacritics_removed_from_reference_body() {
        let src = "\\begin{thebibliography}{99}\n\
                   \\bibitem{k1} H{\\'e}non, M. \\& Kov\\'acs 1964\n\
                   \\end{thebibliography}\n";
        let (out, _) = tag_str(src, "ms.tex", "bibitem", MarkerStyle::Pdf);
        assert!(out.contains("Henon"));
        assert!(out.contains("Kovacs"));
    }

    #[test]
    fn test_split_delimited_prefix() {
        let (left, rest) = split_delimited_prefix(" [Smith 2001]{k1} text", '[', ']');
        assert_eq!(left, " [Smith 2001]");
        assert_eq!(rest, "{k1} text");

        let (left, rest) = split_delimited_prefix("{a{b}c} rest", '{', '}');
        assert_eq!(left, "{a{b}c}");
        assert_eq!(rest, " rest");

        let (left, rest) = split_delimited_prefix("no delimiters", '{', '}');
        assert_eq!(left, "");
        assert_eq!(rest, "no delimiters");

        let (left, rest) = split_delimited_prefix("{never closed", '{', '}');
        assert_eq!(left, "");
        assert_eq!(rest, "{never closed");
    }

    #[test]
    fn test_normalize_italics() {
        assert_eq!(normalize_italics("{\\em ApJ}"), "\"ApJ\"");
        assert_eq!(normalize_italics("{\\it MNRAS}"), "\"MNRAS\"");
        assert_eq!(normalize_italics("\\textit{Nature}"), "\"Nature\"");
        assert_eq!(normalize_italics("\\emph{Science}"), "\"Science\"");
    }

    #[test]
    fn test_tag_references_rewrites_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ms.tex");
        std::fs::write(
            &path,
            "\\begin{thebibliography}{99}\n\
             \\bibitem{k1} One\n\
             \\bibitem{k2} Two\n\
             \\bibitem{k3} Three\n\
             \\end{thebibliography}\n",
        )
        .unwrap();

        let tagged = tag_references(&path, "bibitem", MarkerStyle::Pdf).unwrap();
        assert_eq!(tagged, 3);

        let rewritten = std::fs::read_to_string(&path).unwrap();
        assert_eq!(rewritten.matches("$<$/r$>$").count(), 3);
    }

    #[test]
    fn test_convert_ps_rewrites_includes() {
        let dir = tempfile::tempdir().unwrap();
        let tex = dir.path().join("ms.tex");
        std::fs::write(&tex, "\\includegraphics{fig1.eps}\n\\plotone{fig2.ps}\n").unwrap();

        let sources = [Path::new("ms.tex")];
        let changed = convert_ps_graphics(dir.path(), &sources).unwrap();
        assert_eq!(changed, 1);

        let rewritten = std::fs::read_to_string(&tex).unwrap();
        assert!(rewritten.contains("fig1.pdf"));
        assert!(rewritten.contains("fig2.pdf"));
        assert!(!rewritten.contains(".eps"));
    }
}
