use once_cell::sync::Lazy;
use regex::Regex;

/// The leading-numbering flavor of a raw reference, which decides how much
/// leading numeric noise to strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumberingStyle {
    /// No recognizable numbering.
    Plain,
    /// Bare number: `12 Author ...`
    Bare,
    /// Bracketed: `[12]`, `(12)`, or a short label like `[Smi99]`.
    Bracketed,
}

static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static BRACKETED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d*\s*(\[\d+\]|\(\d+\)|\[[A-Za-z][\w.+-]{0,7}\])").unwrap());
static BARE_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+\W").unwrap());

static HYPHEN_SPACING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*-\s*").unwrap());

static REDUNDANT_BRACKET_NUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\s*(\[)").unwrap());
static NUMBER_PAIR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\s+(\d)").unwrap());
static NUMBER_LETTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+([A-Za-z])").unwrap());

static BACKSLASH_QUOTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\\([A-Z]\w*)""#).unwrap());

static SPACE_COMMA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+,").unwrap());

/// Normalize one raw reference string mined from typeset output.
///
/// A pipeline of named passes: whitespace collapse, title removal, leading
/// numbering classification and stripping, hyphen-spacing normalization,
/// and repair of conversion artifacts. Pure text-in, text-out.
pub fn clean_refstring(raw: &str, title: Option<&str>) -> String {
    let mut text = collapse_whitespace(raw);

    if let Some(title) = title.filter(|t| !t.is_empty()) {
        text = strip_title_once(&text, title);
    }

    let style = classify_numbering(&text);

    text = normalize_hyphen_spacing(&text);
    text = strip_leading_numbering(&text, style);
    text = repair_backslash_quotes(&text);

    tidy(&text)
}

fn collapse_whitespace(text: &str) -> String {
    WS_RE.replace_all(text.trim(), " ").into_owned()
}

/// Remove one occurrence of the running title (with an optional trailing
/// page digit) that dvitype output tends to interleave with the references.
fn strip_title_once(text: &str, title: &str) -> String {
    let re = Regex::new(&format!(r"{}\s*\d?", regex::escape(title))).expect("title regex");
    re.replacen(text, 1, " ").into_owned()
}

fn classify_numbering(text: &str) -> NumberingStyle {
    if BRACKETED_RE.is_match(text) {
        NumberingStyle::Bracketed
    } else if BARE_NUMBER_RE.is_match(text) {
        NumberingStyle::Bare
    } else {
        NumberingStyle::Plain
    }
}

fn normalize_hyphen_spacing(text: &str) -> String {
    HYPHEN_SPACING_RE.replace_all(text, "-").into_owned()
}

fn strip_leading_numbering(text: &str, style: NumberingStyle) -> String {
    match style {
        // `12 [12] Author` -> `[12] Author`: page number shadowing the label.
        NumberingStyle::Bracketed => REDUNDANT_BRACKET_NUM_RE.replace(text, "$1").into_owned(),
        // `173 17. Author` -> `17. Author`: page number before the item number.
        NumberingStyle::Bare => NUMBER_PAIR_RE.replace(text, "$1").into_owned(),
        // `173Author` -> `Author`: page number fused onto the first word.
        NumberingStyle::Plain => NUMBER_LETTER_RE.replace(text, "$1").into_owned(),
    }
}

/// pdftotext renders some small-caps markup as `\Name"`; restore the
/// intended quoting.
fn repair_backslash_quotes(text: &str) -> String {
    BACKSLASH_QUOTE_RE.replace_all(text, "\"$1\"").into_owned()
}

fn tidy(text: &str) -> String {
    let text = collapse_whitespace(text);
    SPACE_COMMA_RE.replace_all(&text, ",").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_collapsed() {
        assert_eq!(
            clean_refstring("  Smith,\tJ.   2001,\n ApJ ", None),
            "Smith, J. 2001, ApJ"
        );
    }

    #[test]
    fn test_title_removed_once() {
        let cleaned = clean_refstring(
            "Galactic Dynamics 12 Smith, J. 2001, ApJ, 1, 1",
            Some("Galactic Dynamics"),
        );
        assert!(!cleaned.contains("Galactic Dynamics"));
        assert!(cleaned.contains("Smith, J. 2001"));
    }

    #[test]
    fn test_title_only_first_occurrence_removed() {
        let cleaned = clean_refstring(
            "My Title Smith 2001, see also My Title again and more words",
            Some("My Title"),
        );
        assert_eq!(cleaned.matches("My Title").count(), 1);
    }

    #[test]
    fn test_bracketed_numbering_kept_but_page_number_stripped() {
        let cleaned = clean_refstring("12 [12] Smith, J. 2001, ApJ", None);
        assert_eq!(cleaned, "[12] Smith, J. 2001, ApJ");
    }

    #[test]
    fn test_parenthesized_numbering_classified_as_bracketed() {
        let cleaned = clean_refstring("(3) Jones 2002, MNRAS", None);
        assert_eq!(cleaned, "(3) Jones 2002, MNRAS");
    }

    #[test]
    fn test_bare_number_pair_stripped() {
        let cleaned = clean_refstring("173 17. Smith, J. 2001", None);
        assert_eq!(cleaned, "17. Smith, J. 2001");
    }

    #[test]
    fn test_fused_page_number_stripped() {
        let cleaned = clean_refstring("173Smith, J. 2001, ApJ", None);
        assert_eq!(cleaned, "Smith, J. 2001, ApJ");
    }

    #[test]
    fn test_hyphen_spacing_normalized() {
        let cleaned = clean_refstring("Phys. Rev. D 60, 083 - 512", None);
        assert_eq!(cleaned, "Phys. Rev. D 60, 083-512");
    }

    #[test]
    fn test_backslash_quote_repaired() {
        let cleaned = clean_refstring("\\Nature\" 410, 168", None);
        assert_eq!(cleaned, "\"Nature\" 410, 168");
    }

    #[test]
    fn test_space_before_comma_tidied() {
        let cleaned = clean_refstring("Smith, J. , 2001", None);
        assert_eq!(cleaned, "Smith, J., 2001");
    }

    #[test]
    fn test_short_label_classified_as_bracketed() {
        let cleaned = clean_refstring("[Smi99] Smith 1999, ApJ", None);
        assert_eq!(cleaned, "[Smi99] Smith 1999, ApJ");
    }

    #[test]
    fn test_empty_input_stays_empty() {
        assert_eq!(clean_refstring("   ", None), "");
    }
}
