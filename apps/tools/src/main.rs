use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shared::protocol::ResultEnvelope;
use workspace_store::{FileBuffer, PathWorkspace, WorkspaceConfig};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "./workspace")]
    root: PathBuf,
    #[arg(long)]
    include_directories: bool,
    #[arg(long)]
    confine_paths: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Each,
    Search { pattern: String },
    Create { path: String },
    Delete { path: String },
    /// Prints a file the way `file_open` sees it, one numbered line each.
    Cat { path: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = WorkspaceConfig {
        root: workspace_root(&cli.root)?,
        include_directories: cli.include_directories,
        confine_paths: cli.confine_paths,
    };
    let paths = PathWorkspace::new(&config);

    let result = match cli.command {
        Command::Each => paths.each(),
        Command::Search { pattern } => paths.search(&pattern, ""),
        Command::Create { path } => paths.create(&path),
        Command::Delete { path } => paths.delete(&path),
        Command::Cat { path } => {
            let files = FileBuffer::new(config.policy());
            let opened = files.open(&path);
            files.end();
            if let Some(payload) = opened.payload.as_ref().filter(|_| opened.is_success()) {
                for (number, text) in payload.iter() {
                    println!("{number:>5}  {text}");
                }
                return Ok(());
            }
            opened
        }
    };

    println!("{}", result.encode());
    finish(&result)
}

/// Same absolute root the server would use, so listings print absolute paths.
fn workspace_root(raw: &Path) -> Result<PathBuf> {
    fs::create_dir_all(raw)
        .with_context(|| format!("failed to create workspace root {}", raw.display()))?;
    fs::canonicalize(raw)
        .with_context(|| format!("failed to resolve workspace root {}", raw.display()))
}

fn finish(result: &ResultEnvelope) -> Result<()> {
    if !result.is_success() {
        bail!("{} failed", result.opcode);
    }
    Ok(())
}
