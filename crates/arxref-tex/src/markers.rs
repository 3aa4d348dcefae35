use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::cleaner;

/// How a DVI reference fragment is joined when the text accumulated so far
/// ends in a hyphen and the fragment looks like a preprint identifier
/// (`astro-ph/ 9901234` broken across lines).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DviJoinPolicy {
    /// Append the fragment with the hyphen preserved. This matches the
    /// long-standing behavior of the production pipeline.
    #[default]
    HyphenatedEprintAppend,
    /// Treat the hyphen as ordinary line-break hyphenation and drop it.
    PlainJoin,
}

static FIND_REF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<r>(.*?)<\s*/r\s*>").unwrap());

/// Pull marked references out of pdftotext output.
///
/// Each `<r>...</r>` span becomes one reference: line-ending hyphenations
/// are joined, whitespace is collapsed, and eprint identifiers whose
/// category hyphen was fused by the converter are restored.
pub fn parse_pdf_markers(text: &str, categories: &HashSet<String>) -> Vec<String> {
    let mut refs = Vec::new();

    for m in FIND_REF_RE.captures_iter(text) {
        let raw = m[1].replace("-\n", "");
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let repaired = repair_split_eprints(collapsed.trim(), categories);
        if !repaired.is_empty() {
            refs.push(repaired);
        }
    }

    refs
}

/// Restore the hyphen in eprint categories that a PDF text converter fused:
/// `astroph/1234567` becomes `astro-ph/1234567`.
pub fn repair_split_eprints(text: &str, categories: &HashSet<String>) -> String {
    let mut out = text.to_string();

    for category in categories {
        if !category.contains('-') {
            continue;
        }
        let fused: String = category.chars().filter(|&c| c != '-').collect();
        let re = Regex::new(&format!(r"\b{}(/\d{{7}})", regex::escape(&fused)))
            .expect("category regex");
        out = re.replace_all(&out, format!("{}$1", category)).into_owned();
    }

    out
}

static PREPRINT_FRAGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]+[ /]+\d{7}").unwrap());

const SECTION_HEADERS: [&str; 4] = ["References", "REFERENCES", "Bibliography", "BIBLIOGRAPHY"];

/// Pull marked references out of dvitype output.
///
/// dvitype reports typeset text as bracketed lines and `\special` payloads
/// verbatim, so the scan is keyed on the literal marker words. Each emitted
/// reference is run through the cleaner with the document title.
pub fn parse_dvi_markers(
    text: &str,
    title: Option<&str>,
    policy: DviJoinPolicy,
) -> Vec<String> {
    let mut refs = Vec::new();
    let mut cur = String::new();
    let mut active = false;

    let emit = |cur: &mut String, refs: &mut Vec<String>| {
        if !cur.trim().is_empty() {
            let cleaned = cleaner::clean_refstring(cur, title);
            if !cleaned.is_empty() {
                refs.push(cleaned);
            }
        }
        cur.clear();
    };

    for line in text.lines() {
        if line.contains("citation_open") {
            if active {
                emit(&mut cur, &mut refs);
            }
            active = true;
            continue;
        }
        if line.contains("citation_close") {
            emit(&mut cur, &mut refs);
            continue;
        }
        if line.contains("ref_close") {
            emit(&mut cur, &mut refs);
            return refs;
        }

        if !active {
            continue;
        }

        let trimmed = line.trim();
        if !trimmed.starts_with('[') {
            continue;
        }
        let chunk = trimmed
            .strip_prefix('[')
            .unwrap_or(trimmed)
            .strip_suffix(']')
            .unwrap_or_else(|| &trimmed[1..]);

        if SECTION_HEADERS.contains(&chunk) {
            continue;
        }

        append_chunk(&mut cur, chunk, policy);
    }

    emit(&mut cur, &mut refs);
    refs
}

fn append_chunk(cur: &mut String, chunk: &str, policy: DviJoinPolicy) {
    if cur.is_empty() {
        cur.push_str(chunk);
        return;
    }

    if cur.ends_with('-') {
        let looks_like_eprint = PREPRINT_FRAGMENT_RE.is_match(chunk);
        if looks_like_eprint && policy == DviJoinPolicy::HyphenatedEprintAppend {
            // A broken preprint id keeps its hyphen.
            cur.push_str(chunk);
        } else {
            cur.pop();
            cur.push_str(chunk);
        }
        return;
    }

    cur.push(' ');
    cur.push_str(chunk);
}
