use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UnpackError {
    #[error("failed to read input {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to unpack archive {path}: {source}")]
    Archive {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to decompress {path}: {source}")]
    Gunzip {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("archive {path} contained no usable files")]
    Empty { path: PathBuf },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Normalize an input fulltext file into a directory of source files.
///
/// The input is copied into `dest` and then dispatched on its (lowercased)
/// extension: `.tar.gz`/`.tgz` and `.tar` archives are extracted in place,
/// `.gz` files are decompressed to their gunzipped name, `.tex` files are
/// used as-is, and anything else is assumed to be plain TeX with an odd name
/// and gains a `.tex` extension.
pub fn unpack(dest: &Path, input: &Path) -> Result<(), UnpackError> {
    let base = input
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let staged = dest.join(&base);
    std::fs::copy(input, &staged).map_err(|source| UnpackError::Read {
        path: input.to_path_buf(),
        source,
    })?;

    if base.ends_with(".tar.gz") || base.ends_with(".tgz") {
        let file = File::open(&staged)?;
        let n = extract_tar(Archive::new(GzDecoder::new(BufReader::new(file))), dest, input)?;
        if n == 0 {
            return Err(UnpackError::Empty {
                path: input.to_path_buf(),
            });
        }
        tracing::debug!(n, "extracted gzipped tar archive");
    } else if base.ends_with(".tar") {
        let file = File::open(&staged)?;
        let n = extract_tar(Archive::new(BufReader::new(file)), dest, input)?;
        if n == 0 {
            return Err(UnpackError::Empty {
                path: input.to_path_buf(),
            });
        }
        tracing::debug!(n, "extracted tar archive");
    } else if base.ends_with(".gz") {
        // Other .gz files are assumed to be directly compressed TeX.
        tracing::debug!("guessing that fulltext is compressed TeX");
        let out_name = base.trim_end_matches(".gz");
        gunzip(&staged, &dest.join(out_name))?;
        std::fs::remove_file(&staged)?;
    } else if base.ends_with(".tex") {
        // Already a TeX file; the staged copy is the source.
    } else {
        // Plain TeX with a weird or missing extension.
        tracing::debug!("guessing that fulltext is funny-named straight TeX");
        let renamed = dest.join(format!("{}.tex", base));
        std::fs::rename(&staged, &renamed)?;
    }

    Ok(())
}

/// Extract a tar stream into `dest`, skipping unsafe or irrelevant entries.
/// Returns the number of entries actually written.
fn extract_tar<R: std::io::Read>(
    mut archive: Archive<R>,
    dest: &Path,
    input: &Path,
) -> Result<usize, UnpackError> {
    let entries = archive.entries().map_err(|source| UnpackError::Archive {
        path: input.to_path_buf(),
        source,
    })?;

    let mut n = 0;

    for entry in entries {
        let mut entry = entry.map_err(|source| UnpackError::Archive {
            path: input.to_path_buf(),
            source,
        })?;

        if entry.header().entry_type().is_dir() {
            continue;
        }

        let path = entry
            .path()
            .map_err(|source| UnpackError::Archive {
                path: input.to_path_buf(),
                source,
            })?
            .to_path_buf();
        let name = path.to_string_lossy();

        // Refuse path traversal and absolute entries.
        if name.contains("..") || name.starts_with('/') {
            tracing::warn!(entry = %name, "skipping unsafe archive entry");
            continue;
        }

        // unpack_in re-checks containment and creates parent directories.
        let unpacked = entry.unpack_in(dest).map_err(|source| UnpackError::Archive {
            path: input.to_path_buf(),
            source,
        })?;
        if unpacked {
            n += 1;
        }
    }

    Ok(n)
}

/// Decompress a single gzip file to `out`.
pub fn gunzip(src: &Path, out: &Path) -> Result<(), UnpackError> {
    let file = File::open(src).map_err(|source| UnpackError::Gunzip {
        path: src.to_path_buf(),
        source,
    })?;
    let mut decoder = GzDecoder::new(BufReader::new(file));
    let mut writer = BufWriter::new(File::create(out)?);

    std::io::copy(&mut decoder, &mut writer).map_err(|source| UnpackError::Gunzip {
        path: src.to_path_buf(),
        source,
    })?;

    Ok(())
}
