use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// File name used by `results.exportJson` when no `outPath` is given.
    pub export_file_name: String,
}

impl AppState {
    pub fn new(export_file_name: impl Into<String>) -> Self {
        Self {
            workspace: None,
            db: None,
            export_file_name: export_file_name.into(),
        }
    }
}
