use crate::collab::ArxivPathParser;

/// One ArXiv preprint, resolved from a fulltext path. Immutable for the
/// lifetime of one extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArxivItem {
    /// The path exactly as it appeared in the input.
    pub raw_path: String,
    /// `2111.03186` or `astro-ph/0604548`.
    pub eprint_id: String,
    /// `arXiv` for new-style items, the archive name otherwise.
    pub category: String,
    pub year: u16,
    /// Everything after the first dot of the basename; may be empty.
    pub suffix: String,
    /// `arXiv/2111/03186` — the path stem shared by source and output.
    pub canonical_relpath: String,
}

/// Parse an ArXiv fulltext path into its item record.
///
/// Accepts `arXiv/2111/03186.tar.gz`, old-style `math/2006/0604548.tex.gz`,
/// and absolutized forms with a `.../fulltext/` prefix.
pub fn parse_arxiv_path(raw: &str) -> Option<ArxivItem> {
    // Strip any filesystem prefix ending in `fulltext/`.
    let relevant = raw.rsplit("fulltext/").next().unwrap_or(raw);

    let segments: Vec<&str> = relevant.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 3 {
        return None;
    }

    let category = segments[segments.len() - 3];
    let yseg = segments[segments.len() - 2];
    let base = segments[segments.len() - 1];

    if yseg.len() != 4 || !yseg.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let (stem, suffix) = match base.split_once('.') {
        Some((stem, suffix)) => (stem, suffix),
        None => (base, ""),
    };

    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if category.is_empty() || category.bytes().any(|b| b == b'.') {
        return None;
    }

    let (eprint_id, year) = if category == "arXiv" {
        // New-style: the directory segment is YYMM.
        let yy: u16 = yseg[..2].parse().ok()?;
        let year = if yy >= 91 { 1900 + yy } else { 2000 + yy };
        (format!("{}.{}", yseg, stem), year)
    } else {
        // Old-style: the directory segment is the four-digit year.
        (format!("{}/{}", category, stem), yseg.parse().ok()?)
    };

    Some(ArxivItem {
        raw_path: raw.to_string(),
        eprint_id,
        category: category.to_string(),
        year,
        suffix: suffix.to_string(),
        canonical_relpath: format!("{}/{}/{}", category, yseg, stem),
    })
}

/// Derive the ADS partial bibcode for an eprint id, used as the lookup key
/// against the bibcode table. The partial is the full bibcode minus the
/// final author initial.
pub fn partial_bibcode(eprint_id: &str) -> String {
    // New-style: YYMM.NNNNN
    if let Some((yymm, number)) = eprint_id.split_once('.') {
        if yymm.len() == 4 && yymm.bytes().all(|b| b.is_ascii_digit()) {
            let yy: u16 = yymm[..2].parse().unwrap_or(0);
            let year = if yy >= 91 { 1900 + yy } else { 2000 + yy };
            return format!("{}arXiv{}{}", year, yymm, number);
        }
    }

    // Old-style: category/YYMMNNN. The bibcode packs the category with the
    // hyphen as a dot and the post-month sequence dot-padded on the left.
    if let Some((category, number)) = eprint_id.split_once('/') {
        if number.len() >= 5 && number.bytes().all(|b| b.is_ascii_digit()) {
            let yy: u16 = number[..2].parse().unwrap_or(0);
            let year = if yy >= 91 { 1900 + yy } else { 2000 + yy };
            let dotted = category.replace('-', ".");
            let tail = &number[3..];
            let dots = 14usize.saturating_sub(dotted.len() + tail.len());
            return format!("{}{}{}{}", year, dotted, ".".repeat(dots), tail);
        }
    }

    eprint_id.to_string()
}

/// The stock path parser used when no external one is injected.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardPathParser;

impl ArxivPathParser for StandardPathParser {
    fn parse(&self, raw: &str) -> Option<ArxivItem> {
        parse_arxiv_path(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_new_style_path() {
        let item = parse_arxiv_path("arXiv/2111/03186.tar.gz").unwrap();
        assert_eq!(item.eprint_id, "2111.03186");
        assert_eq!(item.category, "arXiv");
        assert_eq!(item.year, 2021);
        assert_eq!(item.suffix, "tar.gz");
        assert_eq!(item.canonical_relpath, "arXiv/2111/03186");
    }

    #[test]
    fn test_parse_old_style_path() {
        let item = parse_arxiv_path("math/2006/0604548.tex.gz").unwrap();
        assert_eq!(item.eprint_id, "math/0604548");
        assert_eq!(item.category, "math");
        assert_eq!(item.year, 2006);
        assert_eq!(item.suffix, "tex.gz");
        assert_eq!(item.canonical_relpath, "math/2006/0604548");
    }

    #[test]
    fn test_parse_absolutized_path() {
        let item = parse_arxiv_path(
            "/proj/ads/abstracts/sources/ArXiv/fulltext/arXiv/1904/09850.pdf",
        )
        .unwrap();
        assert_eq!(item.eprint_id, "1904.09850");
        assert_eq!(item.suffix, "pdf");
        assert_eq!(item.canonical_relpath, "arXiv/1904/09850");
    }

    #[test]
    fn test_parse_suffixless_path() {
        let item = parse_arxiv_path("arXiv/2111/03186").unwrap();
        assert_eq!(item.suffix, "");
    }

    #[test]
    fn test_parse_nineties_year_windowing() {
        let item = parse_arxiv_path("arXiv/9901/01234.tar.gz").unwrap();
        assert_eq!(item.year, 1999);
    }

    #[test]
    fn test_unparseable_paths_rejected() {
        assert!(parse_arxiv_path("").is_none());
        assert!(parse_arxiv_path("not-an-eprint").is_none());
        assert!(parse_arxiv_path("arXiv/03186.tar.gz").is_none());
        assert!(parse_arxiv_path("arXiv/badyear/03186.tar.gz").is_none());
        assert!(parse_arxiv_path("arXiv/2111/notdigits.tar.gz").is_none());
    }

    #[test]
    fn test_partial_bibcode_new_style() {
        assert_eq!(partial_bibcode("2111.03186"), "2021arXiv211103186");
        assert_eq!(partial_bibcode("9901.01234"), "1999arXiv990101234");
    }

    #[test]
    fn test_partial_bibcode_old_style() {
        assert_eq!(partial_bibcode("astro-ph/0604548"), "2006astro.ph..4548");
        assert_eq!(partial_bibcode("hep-th/9901001"), "1999hep.th....1001");
    }

    #[test]
    fn test_partial_bibcode_passthrough_for_odd_ids() {
        assert_eq!(partial_bibcode("weird"), "weird");
    }
}
