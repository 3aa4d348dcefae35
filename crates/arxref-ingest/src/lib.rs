pub mod archive;
pub mod workspace;

pub use archive::{unpack, UnpackError};
pub use workspace::{Workspace, WorkspaceError};
