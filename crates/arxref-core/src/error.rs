use std::path::PathBuf;

use thiserror::Error;

use crate::collab::CollabError;

/// Per-item failure kinds. Every variant is non-fatal to the batch: the
/// driver logs it with the item as prefix, bumps a counter, and moves on.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("cannot parse eprint path `{0}`")]
    InputMalformed(String),
    #[error("cannot find expected file `{}`", .0.display())]
    SourceMissing(PathBuf),
    #[error("unexpected extension `{0}`; ignoring")]
    UnknownFormat(String),
    #[error("no bibcode match for partial bibcode `{0}`")]
    BibcodeUnresolved(String),
    #[error(transparent)]
    Workspace(#[from] arxref_ingest::WorkspaceError),
    #[error(transparent)]
    Unpack(#[from] arxref_ingest::UnpackError),
    #[error(transparent)]
    Tex(#[from] arxref_tex::TexError),
    #[error(transparent)]
    Collab(#[from] CollabError),
    #[error("no references found")]
    NoReferencesFound,
    #[error("only {0} references found")]
    TooFewReferences(usize),
    #[error("no PDF fallback backend is configured")]
    NoPdfBackend,
    #[error("failed to write references file {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },
}
