use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use regex::Regex;
use shared::{
    domain::Opcode,
    error::EngineError,
    protocol::{Payload, ResultEnvelope},
};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::{policy::PathPolicy, WorkspaceConfig};

const BACKUP_SUFFIX: &str = ".bk";

/// Entry name (last path segment) to path string. Names collide freely
/// across directories; the entry walked last wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathIndex(BTreeMap<String, String>);

impl PathIndex {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn insert(&mut self, name: String, path: String) {
        self.0.insert(name, path);
    }

    fn remove(&mut self, name: &str) {
        self.0.remove(name);
    }

    fn clear(&mut self) {
        self.0.clear();
    }

    fn to_payload(&self) -> Payload {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }
}

/// Enumerates, searches, creates and soft-deletes entries under the
/// workspace root. One lock covers the index and every filesystem step of
/// an operation, so walk-then-index and check-then-rename are atomic with
/// respect to each other.
pub struct PathWorkspace {
    root: PathBuf,
    include_directories: bool,
    policy: PathPolicy,
    index: Mutex<PathIndex>,
}

impl PathWorkspace {
    pub fn new(config: &WorkspaceConfig) -> Self {
        Self {
            root: config.root.clone(),
            include_directories: config.include_directories,
            policy: config.policy(),
            index: Mutex::new(PathIndex::default()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index(&self) -> PathIndex {
        self.lock_index().clone()
    }

    pub fn each(&self) -> ResultEnvelope {
        let mut index = self.lock_index();
        index.clear();
        match self.walk(&self.root, None, &mut index) {
            Ok(()) => {
                debug!(root = %self.root.display(), entries = index.len(), "workspace indexed");
                ResultEnvelope::success(Opcode::PathEach, Some(index.to_payload()))
            }
            Err(err) => {
                index.clear();
                report(Opcode::PathEach, &err);
                ResultEnvelope::error(Opcode::PathEach, None)
            }
        }
    }

    /// Indexes every entry whose full path matches `condition` as a whole.
    /// A non-empty `base` narrows the walk to that directory.
    pub fn search(&self, condition: &str, base: &str) -> ResultEnvelope {
        let mut index = self.lock_index();
        index.clear();
        let outcome = compile_condition(condition).and_then(|pattern| {
            let base = if base.trim().is_empty() {
                self.root.clone()
            } else {
                self.policy.resolve(base)?
            };
            self.walk(&base, Some(&pattern), &mut index)
        });
        match outcome {
            Ok(()) => {
                debug!(%condition, matches = index.len(), "workspace searched");
                ResultEnvelope::success(Opcode::PathSearch, Some(index.to_payload()))
            }
            Err(err) => {
                index.clear();
                report(Opcode::PathSearch, &err);
                ResultEnvelope::error(Opcode::PathSearch, None)
            }
        }
    }

    /// Creates an empty file when the last segment carries an extension,
    /// otherwise the whole directory chain.
    ///
    /// A failed file creation answers with no payload while a failed
    /// directory creation answers with the index as it stood before the
    /// attempt.
    pub fn create(&self, raw: &str) -> ResultEnvelope {
        let mut index = self.lock_index();
        let path = match self.policy.resolve(raw).and_then(ensure_absent) {
            Ok(path) => path,
            Err(err) => {
                report(Opcode::PathCreate, &err);
                return ResultEnvelope::error(Opcode::PathCreate, None);
            }
        };
        let name = entry_name(&path, raw);

        if has_file_extension(&name) {
            let created = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .map_err(|source| EngineError::io(&path, source));
            if let Err(err) = created {
                report(Opcode::PathCreate, &err);
                return ResultEnvelope::error(Opcode::PathCreate, None);
            }
            info!(path = %path.display(), "file created");
        } else {
            if let Err(source) = fs::create_dir_all(&path) {
                report(Opcode::PathCreate, &EngineError::io(&path, source));
                return ResultEnvelope::error(Opcode::PathCreate, Some(index.to_payload()));
            }
            info!(path = %path.display(), "directory created");
        }

        index.insert(name, path.display().to_string());
        ResultEnvelope::success(Opcode::PathCreate, Some(index.to_payload()))
    }

    /// Soft delete: renames `path` to `path.bk`. Refuses when the target is
    /// missing or a backup already exists, so an older backup is never
    /// overwritten.
    pub fn delete(&self, raw: &str) -> ResultEnvelope {
        let mut index = self.lock_index();
        match self.soft_delete(raw) {
            Ok((name, backup)) => {
                index.remove(&name);
                info!(backup = %backup.display(), "entry moved to backup");
                ResultEnvelope::success(Opcode::PathDelete, Some(index.to_payload()))
            }
            Err(err) => {
                report(Opcode::PathDelete, &err);
                ResultEnvelope::error(Opcode::PathDelete, Some(index.to_payload()))
            }
        }
    }

    pub fn end(&self) -> ResultEnvelope {
        self.lock_index().clear();
        info!("path index cleared");
        ResultEnvelope::success(Opcode::PathEnd, None)
    }

    fn soft_delete(&self, raw: &str) -> Result<(String, PathBuf), EngineError> {
        let path = self.policy.resolve(raw)?;
        if !path.exists() {
            return Err(EngineError::not_found(&path));
        }
        let backup = backup_path(&path);
        if backup.exists() {
            return Err(EngineError::already_exists(&backup));
        }
        fs::rename(&path, &backup).map_err(|source| EngineError::io(&path, source))?;
        Ok((entry_name(&path, raw), backup))
    }

    fn walk(
        &self,
        base: &Path,
        pattern: Option<&Regex>,
        index: &mut PathIndex,
    ) -> Result<(), EngineError> {
        for entry in WalkDir::new(base).min_depth(1) {
            let entry = entry.map_err(|err| {
                let path = err.path().unwrap_or(base).to_path_buf();
                EngineError::io(path, io::Error::from(err))
            })?;
            if entry.file_type().is_dir() && !self.include_directories {
                continue;
            }
            let path = entry.path().display().to_string();
            if pattern.is_some_and(|pattern| !pattern.is_match(&path)) {
                continue;
            }
            index.insert(entry.file_name().to_string_lossy().into_owned(), path);
        }
        Ok(())
    }

    fn lock_index(&self) -> MutexGuard<'_, PathIndex> {
        self.index.lock().unwrap_or_else(|poisoned| {
            warn!("path index lock was poisoned; continuing with current index");
            poisoned.into_inner()
        })
    }
}

/// Classification heuristic for `create`: a name ending in a dot followed
/// by one or more non-dot characters is a file. A directory named
/// `notes.d` is misread as a file; the target may not exist yet, so
/// there is nothing on disk to probe instead.
pub fn has_file_extension(name: &str) -> bool {
    match name.rfind('.') {
        Some(dot) => dot + 1 < name.len(),
        None => false,
    }
}

fn compile_condition(condition: &str) -> Result<Regex, EngineError> {
    Regex::new(&format!("^(?:{condition})$"))
        .map_err(|err| EngineError::Protocol(format!("invalid search pattern: {err}")))
}

fn ensure_absent(path: PathBuf) -> Result<PathBuf, EngineError> {
    if path.exists() {
        Err(EngineError::already_exists(&path))
    } else {
        Ok(path)
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(BACKUP_SUFFIX);
    PathBuf::from(raw)
}

fn entry_name(path: &Path, raw: &str) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| raw.to_string())
}

fn report(opcode: Opcode, err: &EngineError) {
    error!(%opcode, kind = ?err.kind(), error = %err, "path operation failed");
}

#[cfg(test)]
#[path = "tests/path_workspace_tests.rs"]
mod tests;
