use std::sync::Arc;

use shared::{
    domain::Opcode,
    error::EngineError,
    protocol::{CommandEnvelope, ResultEnvelope},
};
use tracing::{info, warn};
use workspace_store::{FileBuffer, PathWorkspace, WorkspaceConfig};

type Handler = fn(&Dispatcher, &CommandEnvelope) -> Result<ResultEnvelope, EngineError>;

/// Routes decoded commands to the path workspace or the file buffer.
///
/// Cloning is cheap and every clone shares the same two managers, which is
/// how all connections end up seeing one index and one open file.
#[derive(Clone)]
pub struct Dispatcher {
    paths: Arc<PathWorkspace>,
    files: Arc<FileBuffer>,
}

impl Dispatcher {
    pub fn new(config: &WorkspaceConfig) -> Self {
        Self::from_parts(
            Arc::new(PathWorkspace::new(config)),
            Arc::new(FileBuffer::new(config.policy())),
        )
    }

    pub fn from_parts(paths: Arc<PathWorkspace>, files: Arc<FileBuffer>) -> Self {
        Self { paths, files }
    }

    pub fn paths(&self) -> &PathWorkspace {
        &self.paths
    }

    pub fn files(&self) -> &FileBuffer {
        &self.files
    }

    /// Decodes one wire frame, runs it, and encodes the reply. Never fails.
    pub fn dispatch_text(&self, text: &str) -> String {
        self.handle(text).encode()
    }

    pub fn handle(&self, text: &str) -> ResultEnvelope {
        match CommandEnvelope::decode(text) {
            Ok(command) => self.dispatch(&command),
            Err(err) => {
                warn!(kind = ?err.kind(), error = %err, "rejecting undecodable frame");
                ResultEnvelope::rejected("", err.to_string())
            }
        }
    }

    pub fn dispatch(&self, command: &CommandEnvelope) -> ResultEnvelope {
        let Ok(opcode) = command.opcode() else {
            warn!(opcode = %command.opcode, path = %command.path, "unrecognized opcode");
            return ResultEnvelope::unknown_opcode(&command.opcode, &command.path);
        };
        info!(%opcode, path = %command.path, "dispatching command");

        match route(opcode)(self, command) {
            Ok(result) => result,
            Err(err) => {
                warn!(%opcode, kind = ?err.kind(), error = %err, "rejecting malformed command");
                ResultEnvelope::rejected(opcode.as_str(), err.to_string())
            }
        }
    }
}

fn route(opcode: Opcode) -> Handler {
    match opcode {
        Opcode::PathEach => path_each,
        Opcode::PathSearch => path_search,
        Opcode::PathCreate => path_create,
        Opcode::PathDelete => path_delete,
        Opcode::PathEnd => path_end,
        Opcode::FileOpen => file_open,
        Opcode::FileSave => file_save,
        Opcode::FileEnd => file_end,
        Opcode::FileReadLine => file_read_line,
        Opcode::FileWriteLine => file_write_line,
    }
}

fn path_each(d: &Dispatcher, _: &CommandEnvelope) -> Result<ResultEnvelope, EngineError> {
    Ok(d.paths.each())
}

fn path_search(d: &Dispatcher, cmd: &CommandEnvelope) -> Result<ResultEnvelope, EngineError> {
    Ok(d.paths.search(&cmd.condition, &cmd.path))
}

fn path_create(d: &Dispatcher, cmd: &CommandEnvelope) -> Result<ResultEnvelope, EngineError> {
    Ok(d.paths.create(&cmd.path))
}

fn path_delete(d: &Dispatcher, cmd: &CommandEnvelope) -> Result<ResultEnvelope, EngineError> {
    Ok(d.paths.delete(&cmd.path))
}

fn path_end(d: &Dispatcher, _: &CommandEnvelope) -> Result<ResultEnvelope, EngineError> {
    Ok(d.paths.end())
}

fn file_open(d: &Dispatcher, cmd: &CommandEnvelope) -> Result<ResultEnvelope, EngineError> {
    Ok(d.files.open(&cmd.path))
}

fn file_save(d: &Dispatcher, _: &CommandEnvelope) -> Result<ResultEnvelope, EngineError> {
    Ok(d.files.save())
}

fn file_end(d: &Dispatcher, _: &CommandEnvelope) -> Result<ResultEnvelope, EngineError> {
    Ok(d.files.end())
}

fn file_read_line(d: &Dispatcher, cmd: &CommandEnvelope) -> Result<ResultEnvelope, EngineError> {
    Ok(d.files.read_line(cmd.line_number()?))
}

fn file_write_line(d: &Dispatcher, cmd: &CommandEnvelope) -> Result<ResultEnvelope, EngineError> {
    Ok(d.files.write_line(cmd.line_number()?, &cmd.value))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
