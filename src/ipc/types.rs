use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::draft::ReportCardDraft;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The school account the UI is acting for.
#[derive(Debug, Clone)]
pub struct Session {
    pub school_id: String,
    pub school_name: String,
}

/// Process-wide settings fixed at start-up.
#[derive(Debug, Clone)]
pub struct Runtime {
    pub public_url: String,
    pub token_ttl_days: i64,
}

pub struct AppState {
    pub runtime: Runtime,
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: Option<Session>,
    pub draft: Option<ReportCardDraft>,
}

impl AppState {
    pub fn new(runtime: Runtime) -> Self {
        Self {
            runtime,
            workspace: None,
            db: None,
            session: None,
            draft: None,
        }
    }
}
