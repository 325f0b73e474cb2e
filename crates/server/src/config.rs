use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use workspace_store::WorkspaceConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub workspace_root: String,
    pub include_directories: bool,
    pub confine_paths: bool,
    pub connect_route: String,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            workspace_root: "./workspace".into(),
            include_directories: false,
            confine_paths: false,
            connect_route: "/files_connect".into(),
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn workspace_config(&self, root: PathBuf) -> WorkspaceConfig {
        WorkspaceConfig {
            root,
            include_directories: self.include_directories,
            confine_paths: self.confine_paths,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("server.toml") {
        apply_file_config(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings.connect_route = normalize_route(&settings.connect_route);
    settings
}

pub(crate) fn apply_file_config(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) else {
        return;
    };
    let text = |key: &str| match file_cfg.get(key)? {
        toml::Value::String(v) => Some(v.clone()),
        toml::Value::Boolean(v) => Some(v.to_string()),
        toml::Value::Integer(v) => Some(v.to_string()),
        _ => None,
    };

    if let Some(v) = text("bind_addr") {
        settings.server_bind = v;
    }
    if let Some(v) = text("workspace_root") {
        settings.workspace_root = v;
    }
    if let Some(v) = text("include_directories").and_then(|v| parse_flag(&v)) {
        settings.include_directories = v;
    }
    if let Some(v) = text("confine_paths").and_then(|v| parse_flag(&v)) {
        settings.confine_paths = v;
    }
    if let Some(v) = text("connect_route") {
        settings.connect_route = v;
    }
    if let Some(v) = text("log_filter") {
        settings.log_filter = v;
    }
}

pub(crate) fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = var("WORKSPACE_ROOT") {
        settings.workspace_root = v;
    }
    if let Some(v) = var("APP__WORKSPACE_ROOT") {
        settings.workspace_root = v;
    }

    if let Some(v) = var("APP__INCLUDE_DIRECTORIES").and_then(|v| parse_flag(&v)) {
        settings.include_directories = v;
    }
    if let Some(v) = var("APP__CONFINE_PATHS").and_then(|v| parse_flag(&v)) {
        settings.confine_paths = v;
    }

    if let Some(v) = var("APP__CONNECT_ROUTE") {
        settings.connect_route = v;
    }
    if let Some(v) = var("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
}

pub(crate) fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

pub(crate) fn normalize_route(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Settings::default().connect_route;
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Creates the workspace root if needed and returns its canonical path.
pub fn prepare_workspace_root(raw_root: &str) -> anyhow::Result<PathBuf> {
    let raw_root = raw_root.trim();
    let root = if raw_root.is_empty() {
        PathBuf::from(Settings::default().workspace_root)
    } else {
        Path::new(raw_root).to_path_buf()
    };

    fs::create_dir_all(&root)
        .with_context(|| format!("failed to create workspace root '{}'", root.display()))?;
    let canonical = fs::canonicalize(&root)
        .with_context(|| format!("failed to resolve workspace root '{}'", root.display()))?;
    Ok(canonical)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
