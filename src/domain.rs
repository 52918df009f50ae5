use std::fmt;
use std::io::Error;
use std::path::PathBuf;
use std::time::Duration;

use derive_setters::Setters;
use polars::error::PolarsError;

pub const DEFAULT_ENDPOINT: &str = "https://datos.gob.cl/api/3/action/datastore_search";
pub const DEFAULT_RESOURCE_ID: &str = "caeb64a6-7a5c-4ed5-8dfa-2b41502b7d95";
pub const DEFAULT_ROW_LIMIT: usize = 500;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

pub const REGION_COLUMN: &str = "region";
pub const COMUNA_COLUMN: &str = "comuna";

pub const HELP_TEXT: &str = "
 Tab / Shift-Tab   Switch between panes
 ↑ k / ↓ j         Move cursor (Column pane: change chart column)
 PgUp / PgDn       Move one page
 Home g / End G    Jump to first / last entry
 ← h / → l         Scroll table columns
 Enter             Select region / toggle comuna
 Space             Toggle comuna
 c                 Clear comuna selection
 r                 Reload data (drops cache)
 ?                 Toggle this help
 Esc               Close help
 q                 Quit
";

#[derive(Debug)]
pub enum DashError {
    IoError(Error),
    PolarsError(PolarsError),
    HttpError(reqwest::Error),
    JsonError(serde_json::Error),
    MalformedResponse(String),
    LoadingFailed(String),
    FileNotFound,
    PermissionDenied,
    UnknownFileType,
}

impl fmt::Display for DashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DashError::IoError(e) => write!(f, "io error: {e}"),
            DashError::PolarsError(e) => write!(f, "data error: {e}"),
            DashError::HttpError(e) => write!(f, "http error: {e}"),
            DashError::JsonError(e) => write!(f, "invalid json: {e}"),
            DashError::MalformedResponse(reason) => write!(f, "malformed response: {reason}"),
            DashError::LoadingFailed(reason) => write!(f, "loading failed: {reason}"),
            DashError::FileNotFound => write!(f, "file not found"),
            DashError::PermissionDenied => write!(f, "permission denied"),
            DashError::UnknownFileType => write!(f, "unknown file type"),
        }
    }
}

impl std::error::Error for DashError {}

impl From<Error> for DashError {
    fn from(err: Error) -> Self {
        DashError::IoError(err)
    }
}

impl From<PolarsError> for DashError {
    fn from(err: PolarsError) -> Self {
        DashError::PolarsError(err)
    }
}

impl From<reqwest::Error> for DashError {
    fn from(err: reqwest::Error) -> Self {
        DashError::HttpError(err)
    }
}

impl From<serde_json::Error> for DashError {
    fn from(err: serde_json::Error) -> Self {
        DashError::JsonError(err)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    Exit,
    NextPane,
    PreviousPane,
    MoveUp,
    MoveDown,
    MovePageUp,
    MovePageDown,
    MoveBeginning,
    MoveEnd,
    MoveLeft,
    MoveRight,
    Select,
    Toggle,
    ClearSelection,
    Reload,
    Help,
    Resize(usize, usize),
}

#[derive(Debug, Clone, Setters)]
pub struct DashConfig {
    pub endpoint: String,
    pub resource_id: String,
    pub limit: usize,
    pub timeout: Duration,
    pub source_file: Option<PathBuf>,
    pub event_poll_time: u64,
    pub max_column_width: usize,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            resource_id: DEFAULT_RESOURCE_ID.to_string(),
            limit: DEFAULT_ROW_LIMIT,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            source_file: None,
            event_poll_time: 100,
            max_column_width: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_override_defaults() {
        let cfg = DashConfig::default()
            .limit(20)
            .timeout(Duration::from_millis(250))
            .resource_id("abc".to_string());
        assert_eq!(cfg.limit, 20);
        assert_eq!(cfg.timeout, Duration::from_millis(250));
        assert_eq!(cfg.resource_id, "abc");
        assert_eq!(cfg.endpoint, DEFAULT_ENDPOINT);
        assert!(cfg.source_file.is_none());
    }

    #[test]
    fn errors_render_readable_messages() {
        let err = DashError::MalformedResponse("records is not a list".into());
        assert_eq!(err.to_string(), "malformed response: records is not a list");
        assert_eq!(DashError::FileNotFound.to_string(), "file not found");
    }
}
