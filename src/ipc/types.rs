use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::session::ChartSession;

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
    /// The open chart's layout session, if any. Replaced wholesale on
    /// `chart.open`; a failed open keeps the previous session.
    pub session: Option<ChartSession>,
}
