use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::config::ScholarConfig;

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
    pub config: ScholarConfig,
}

impl AppState {
    pub fn new(config: ScholarConfig) -> Self {
        AppState {
            workspace: None,
            db: None,
            config,
        }
    }
}
