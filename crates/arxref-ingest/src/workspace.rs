use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("failed to prepare scratch root {root}: {source}")]
    Root {
        root: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create scratch directory under {root}: {source}")]
    Create {
        root: PathBuf,
        source: std::io::Error,
    },
}

/// A scratch directory for one extraction attempt.
///
/// The directory lives under the configured scratch root and is named with
/// the process id plus a random component, so concurrent pipeline processes
/// never collide. The directory is removed when the `Workspace` is dropped;
/// `keep_on_exit` leaves it behind and logs its path instead, for inspection
/// of failed builds.
pub struct Workspace {
    dir: Option<tempfile::TempDir>,
    kept: Option<PathBuf>,
}

impl Workspace {
    /// Allocate a fresh scratch directory under `scratch_root`.
    ///
    /// Any leftover directory created by this same process (identified by the
    /// pid component of the name) is destroyed first; at most one workspace
    /// exists per item at a time, so such a directory can only be stale.
    pub fn create(scratch_root: &Path, keep_on_exit: bool) -> Result<Workspace, WorkspaceError> {
        std::fs::create_dir_all(scratch_root).map_err(|source| WorkspaceError::Root {
            root: scratch_root.to_path_buf(),
            source,
        })?;

        remove_stale(scratch_root);

        let dir = tempfile::Builder::new()
            .prefix(&format!("arxref-{}-", std::process::id()))
            .tempdir_in(scratch_root)
            .map_err(|source| WorkspaceError::Create {
                root: scratch_root.to_path_buf(),
                source,
            })?;

        if keep_on_exit {
            let path = dir.keep();
            tracing::info!(path = %path.display(), "retaining scratch directory");
            Ok(Workspace {
                dir: None,
                kept: Some(path),
            })
        } else {
            Ok(Workspace {
                dir: Some(dir),
                kept: None,
            })
        }
    }

    /// The root of the scratch directory.
    pub fn root(&self) -> &Path {
        match (&self.dir, &self.kept) {
            (Some(dir), _) => dir.path(),
            (None, Some(kept)) => kept.as_path(),
            // One of the two is always populated by `create`.
            (None, None) => unreachable!("workspace with no directory"),
        }
    }
}

/// Destroy leftover scratch directories belonging to this process.
fn remove_stale(scratch_root: &Path) {
    let mine = format!("arxref-{}-", std::process::id());

    let Ok(entries) = std::fs::read_dir(scratch_root) else {
        return;
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&mine) {
            tracing::warn!(path = %entry.path().display(), "removing stale scratch directory");
            let _ = std::fs::remove_dir_all(entry.path());
        }
    }
}
