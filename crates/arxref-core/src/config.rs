use std::path::PathBuf;

/// Path configuration for one pipeline process.
///
/// The defaults point at the standard ADS infrastructure layout; standalone
/// CLIs override them from flags or the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for fulltext sources (`pbase`).
    pub fulltext_base: PathBuf,
    /// Base directory for target reference files (`tbase`).
    pub target_refs_base: PathBuf,
    /// Root directory holding the historical TeX installations (`texbase`).
    pub tex_root: PathBuf,
    /// Where per-item scratch workspaces are allocated.
    pub scratch_root: PathBuf,
    /// Minimum number of references required before an output file is
    /// written.
    pub min_refs: usize,
}

impl Config {
    pub fn new_defaults() -> Config {
        Config {
            fulltext_base: PathBuf::from("/proj/ads/abstracts/sources/ArXiv/fulltext"),
            target_refs_base: PathBuf::from("/proj/ads/references/sources"),
            tex_root: PathBuf::from("/proj/ads/soft/tex"),
            scratch_root: std::env::temp_dir(),
            min_refs: 4,
        }
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new_defaults()
    }
}
