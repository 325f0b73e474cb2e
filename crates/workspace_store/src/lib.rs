//! Filesystem side of the workspace engine: the path index over a
//! workspace root and the single shared open-file buffer.

mod file_buffer;
mod path_workspace;
pub mod policy;

use std::path::PathBuf;

pub use file_buffer::FileBuffer;
pub use path_workspace::{has_file_extension, PathIndex, PathWorkspace};
pub use policy::PathPolicy;

#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
    pub include_directories: bool,
    pub confine_paths: bool,
}

impl WorkspaceConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include_directories: false,
            confine_paths: false,
        }
    }

    pub fn policy(&self) -> PathPolicy {
        if self.confine_paths {
            PathPolicy::confined_to(&self.root)
        } else {
            PathPolicy::Unrestricted
        }
    }
}
