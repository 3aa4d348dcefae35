use std::ffi::OsString;
use std::path::Path;

/// Which family of extraction markers the tagger injects, determined by
/// whether the downstream text conversion reads pdftotext output or
/// dvitype output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerStyle {
    Pdf,
    Dvi,
}

/// The era-appropriate TeX installation for a submission.
///
/// `tree` and `texmf_cnf` name directories inside the per-site TeX root;
/// the tree's `bin` directory is prepended to `PATH` for the compile step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub tree: &'static str,
    pub texmf_cnf: Option<&'static str>,
}

impl Toolchain {
    /// Map a submission date (YYYYMMDD) to the TeX stack that was current
    /// when the submission was typeset.
    pub fn select(subdate: u32) -> Toolchain {
        let (tree, texmf_cnf) = match subdate {
            s if s >= 20170209 => ("TL2016", None),
            s if s >= 20111206 => ("TL2011", None),
            s if s >= 20091231 => ("TL2009", None),
            s if s >= 20061102 => ("teTeX3", Some("teTeX3/web2c")),
            s if s >= 20040101 => ("teTeX2", Some("texmf-2004/web2c")),
            s if s >= 20030101 => ("teTeX2", Some("texmf-2003/web2c")),
            s if s >= 20020901 => ("teTeX2", Some("texmf-2002/web2c")),
            _ => ("teTeX2", Some("texmf/web2c")),
        };
        Toolchain { tree, texmf_cnf }
    }

    /// The TeX Live stacks compile with pdfTeX and are mined through
    /// pdftotext; the teTeX stacks compile to DVI and are mined through
    /// dvitype.
    pub fn marker_style(&self) -> MarkerStyle {
        if self.tree.starts_with("TL") {
            MarkerStyle::Pdf
        } else {
            MarkerStyle::Dvi
        }
    }

    /// Install this toolchain into the process environment, returning a
    /// guard that restores the previous `PATH` and `TEXMFCNF` when dropped.
    pub fn apply(&self, tex_root: &Path) -> EnvFrame {
        let saved_path = std::env::var_os("PATH");
        let saved_cnf = std::env::var_os("TEXMFCNF");

        let mut path = tex_root.join(self.tree).join("bin").into_os_string();
        if let Some(old) = &saved_path {
            path.push(":");
            path.push(old);
        }
        std::env::set_var("PATH", &path);

        match self.texmf_cnf {
            Some(rel) => std::env::set_var("TEXMFCNF", tex_root.join(rel)),
            None => std::env::remove_var("TEXMFCNF"),
        }

        tracing::debug!(tree = self.tree, "toolchain environment installed");

        EnvFrame {
            saved_path,
            saved_cnf,
        }
    }
}

/// Scoped environment frame for a toolchain. Restores `PATH` and
/// `TEXMFCNF` to their prior values on every exit path.
pub struct EnvFrame {
    saved_path: Option<OsString>,
    saved_cnf: Option<OsString>,
}

impl Drop for EnvFrame {
    fn drop(&mut self) {
        match &self.saved_path {
            Some(old) => std::env::set_var("PATH", old),
            None => std::env::remove_var("PATH"),
        }
        match &self.saved_cnf {
            Some(old) => std::env::set_var("TEXMFCNF", old),
            None => std::env::remove_var("TEXMFCNF"),
        }
    }
}
