use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use shared::{
    domain::{LineNumber, Opcode},
    error::EngineError,
    protocol::{Payload, ResultEnvelope},
};
use tracing::{error, info, warn};

use crate::policy::PathPolicy;

#[derive(Debug, Default)]
struct BufferState {
    path: Option<PathBuf>,
    lines: BTreeMap<LineNumber, String>,
}

impl BufferState {
    fn clear(&mut self) {
        self.path = None;
        self.lines.clear();
    }

    fn to_payload(&self) -> Payload {
        self.lines
            .iter()
            .map(|(number, text)| (number.to_string(), text.as_str()))
            .collect()
    }
}

/// The one open file shared by every connection.
///
/// Opening a file discards whatever was open before, including unsaved
/// edits. Every operation, reads included, holds the lock for its whole
/// duration, disk I/O included.
#[derive(Debug, Default)]
pub struct FileBuffer {
    policy: PathPolicy,
    state: Mutex<BufferState>,
}

impl FileBuffer {
    pub fn new(policy: PathPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(BufferState::default()),
        }
    }

    /// Path of the currently open file, if any.
    pub fn open_path(&self) -> Option<PathBuf> {
        self.lock_state().path.clone()
    }

    pub fn open(&self, raw: &str) -> ResultEnvelope {
        let mut state = self.lock_state();
        if let Some(previous) = state.path.as_deref() {
            info!(previous = %previous.display(), "discarding open file");
        }
        state.clear();

        let loaded = self
            .policy
            .resolve(raw)
            .and_then(|path| read_lines(&path).map(|lines| (path, lines)));
        match loaded {
            Ok((path, lines)) => {
                info!(path = %path.display(), lines = lines.len(), "file opened");
                state.path = Some(path);
                state.lines = lines;
                ResultEnvelope::success(Opcode::FileOpen, Some(state.to_payload()))
            }
            Err(err) => {
                report(Opcode::FileOpen, &err);
                ResultEnvelope::error(Opcode::FileOpen, None)
            }
        }
    }

    /// Overwrites the open file with the buffer, one line per buffered
    /// entry in ascending line order. The buffer is left as it was whether
    /// or not the write succeeds.
    pub fn save(&self) -> ResultEnvelope {
        let state = self.lock_state();
        let outcome = match state.path.as_deref() {
            Some(path) => write_lines(path, &state.lines).map(|()| path),
            None => Err(EngineError::NotFound("no file is open".into())),
        };
        match outcome {
            Ok(path) => {
                info!(path = %path.display(), lines = state.lines.len(), "file saved");
                ResultEnvelope::success(Opcode::FileSave, None)
            }
            Err(err) => {
                report(Opcode::FileSave, &err);
                ResultEnvelope::error(Opcode::FileSave, None)
            }
        }
    }

    pub fn read_line(&self, line: LineNumber) -> ResultEnvelope {
        let state = self.lock_state();
        match state.lines.get(&line) {
            Some(text) => ResultEnvelope::success(
                Opcode::FileReadLine,
                Some(Payload::single(line.to_string(), text.as_str())),
            ),
            None => {
                report(Opcode::FileReadLine, &EngineError::NotFound(format!("line {line}")));
                ResultEnvelope::error(Opcode::FileReadLine, None)
            }
        }
    }

    /// Stages `text` at `line`, growing the buffer if needed. Never touches
    /// disk and never fails; `save` makes it durable.
    pub fn write_line(&self, line: LineNumber, text: &str) -> ResultEnvelope {
        let mut state = self.lock_state();
        if state.path.is_none() {
            warn!(%line, "staging a line with no file open");
        }
        state.lines.insert(line, text.to_string());
        ResultEnvelope::success(Opcode::FileWriteLine, None)
    }

    pub fn end(&self) -> ResultEnvelope {
        self.lock_state().clear();
        info!("file buffer closed");
        ResultEnvelope::success(Opcode::FileEnd, None)
    }

    fn lock_state(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("file buffer lock was poisoned; continuing with current buffer");
            poisoned.into_inner()
        })
    }
}

fn read_lines(path: &Path) -> Result<BTreeMap<LineNumber, String>, EngineError> {
    let file = File::open(path).map_err(|source| EngineError::io(path, source))?;
    let mut lines = BTreeMap::new();
    for (number, line) in (1..).zip(BufReader::new(file).lines()) {
        let text = line.map_err(|source| EngineError::io(path, source))?;
        lines.insert(LineNumber(number), text);
    }
    Ok(lines)
}

fn write_lines(path: &Path, lines: &BTreeMap<LineNumber, String>) -> Result<(), EngineError> {
    let io_err = |source: io::Error| EngineError::io(path, source);
    let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
    for text in lines.values() {
        writer.write_all(text.as_bytes()).map_err(io_err)?;
        writer.write_all(b"\n").map_err(io_err)?;
    }
    writer.flush().map_err(io_err)
}

fn report(opcode: Opcode, err: &EngineError) {
    error!(%opcode, kind = ?err.kind(), error = %err, "file operation failed");
}

#[cfg(test)]
#[path = "tests/file_buffer_tests.rs"]
mod tests;
