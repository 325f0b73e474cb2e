use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Operation token carried by every command and echoed in every result.
///
/// The serialized tokens are part of the wire contract with existing
/// browser clients and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Opcode {
    PathEach,
    PathSearch,
    PathCreate,
    PathDelete,
    PathEnd,
    FileOpen,
    FileSave,
    FileEnd,
    FileReadLine,
    FileWriteLine,
}

impl Opcode {
    pub const ALL: [Opcode; 10] = [
        Opcode::PathEach,
        Opcode::PathSearch,
        Opcode::PathCreate,
        Opcode::PathDelete,
        Opcode::PathEnd,
        Opcode::FileOpen,
        Opcode::FileSave,
        Opcode::FileEnd,
        Opcode::FileReadLine,
        Opcode::FileWriteLine,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Opcode::PathEach => "path_each",
            Opcode::PathSearch => "path_search",
            Opcode::PathCreate => "path_create",
            Opcode::PathDelete => "path_delete",
            Opcode::PathEnd => "path_end",
            Opcode::FileOpen => "file_open",
            Opcode::FileSave => "file_save",
            Opcode::FileEnd => "file_end",
            Opcode::FileReadLine => "file_read_line",
            Opcode::FileWriteLine => "file_write_line",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Opcode {
    type Err = EngineError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Opcode::ALL
            .into_iter()
            .find(|opcode| opcode.as_str() == token)
            .ok_or_else(|| EngineError::Protocol(format!("unrecognized opcode '{token}'")))
    }
}

/// 1-based line address inside the open file buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineNumber(pub u64);

impl fmt::Display for LineNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LineNumber {
    type Err = EngineError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EngineError::Protocol("line number is required".into()));
        }
        trimmed
            .parse::<u64>()
            .map(LineNumber)
            .map_err(|_| EngineError::Protocol(format!("line number '{trimmed}' is not numeric")))
    }
}
