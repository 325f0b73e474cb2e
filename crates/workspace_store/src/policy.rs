use std::path::{self, Component, Path, PathBuf};

use shared::error::EngineError;

/// Decides which filesystem path a caller-supplied path string refers to.
///
/// Every operation that accepts a path from the wire goes through
/// [`PathPolicy::resolve`], so tightening access only touches this type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PathPolicy {
    /// Paths are used exactly as the caller sent them.
    #[default]
    Unrestricted,
    /// Relative paths are anchored at the root and nothing may leave it.
    ConfinedTo(PathBuf),
}

impl PathPolicy {
    /// A relative root is resolved against the current directory first so a
    /// leading `..` survives normalization.
    pub fn confined_to(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let absolute = path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        PathPolicy::ConfinedTo(normalize(&absolute))
    }

    pub fn resolve(&self, raw: &str) -> Result<PathBuf, EngineError> {
        if raw.trim().is_empty() {
            return Err(EngineError::Protocol("path is required".into()));
        }

        match self {
            PathPolicy::Unrestricted => Ok(PathBuf::from(raw)),
            PathPolicy::ConfinedTo(root) => {
                let candidate = Path::new(raw);
                let joined = if candidate.is_absolute() {
                    candidate.to_path_buf()
                } else {
                    root.join(candidate)
                };
                let resolved = normalize(&joined);
                if resolved.starts_with(root) {
                    Ok(resolved)
                } else {
                    Err(EngineError::Protocol(format!(
                        "path '{raw}' escapes workspace root '{}'",
                        root.display()
                    )))
                }
            }
        }
    }
}

/// Lexical normalization: drops `.` and lets `..` pop the previous segment.
/// Does not touch the filesystem, since create targets may not exist yet.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
#[path = "tests/policy_tests.rs"]
mod tests;
