use polars::prelude::*;
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use tracing_error::SpanTrace;

use crate::domain::{DashConfig, DashError};
use crate::records::stringify_columns;

#[derive(Debug)]
enum FileType {
    JSON,
    CSV,
    PARQUET,
    ARROW,
}

/// Result of one load: the record collection and, if loading failed, the
/// message to show to the user. A failed load always carries an empty frame.
#[derive(Debug)]
pub struct FetchOutcome {
    pub frame: DataFrame,
    pub error: Option<String>,
}

impl FetchOutcome {
    fn loaded(frame: DataFrame) -> Self {
        Self { frame, error: None }
    }

    fn failed(message: String) -> Self {
        Self {
            frame: DataFrame::empty(),
            error: Some(message),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }
}

/// Where the record collection comes from.
#[derive(Debug, Clone)]
pub enum Source {
    Api(Fetcher),
    File(PathBuf),
}

impl Source {
    pub fn from_config(config: &DashConfig) -> Self {
        match &config.source_file {
            Some(path) => Source::File(path.clone()),
            None => Source::Api(Fetcher::new(config)),
        }
    }

    /// Key used to cache the outcome of this source.
    pub fn key(&self) -> String {
        match self {
            Source::Api(fetcher) => fetcher.url().to_string(),
            Source::File(path) => path.to_string_lossy().to_string(),
        }
    }

    pub fn load(&self) -> FetchOutcome {
        match self {
            Source::Api(fetcher) => fetcher.fetch(),
            Source::File(path) => load_file(path),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    url: String,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(config: &DashConfig) -> Self {
        Self {
            url: Self::dataset_url(&config.endpoint, &config.resource_id, config.limit),
            timeout: config.timeout,
        }
    }

    pub fn dataset_url(endpoint: &str, resource_id: &str, limit: usize) -> String {
        format!("{endpoint}?resource_id={resource_id}&limit={limit}")
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the dataset. Never fails: any error becomes an empty collection
    /// with a message for the user.
    #[instrument(skip(self), fields(url = %self.url))]
    pub fn fetch(&self) -> FetchOutcome {
        let start_time = Instant::now();
        match self.try_fetch() {
            Ok(frame) => {
                info!(
                    "Fetched {} records with {} columns in {}ms",
                    frame.height(),
                    frame.width(),
                    start_time.elapsed().as_millis()
                );
                FetchOutcome::loaded(frame)
            }
            Err(e) => {
                error!(error = %e, spantrace = %SpanTrace::capture(), "Fetching dataset failed");
                FetchOutcome::failed(format!("Error connecting to the API: {e}"))
            }
        }
    }

    fn try_fetch(&self) -> Result<DataFrame, DashError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .gzip(true)
            .build()?;
        let response = client.get(&self.url).send()?;
        debug!("Response status {}", response.status());
        let body = response.json::<Value>()?;
        parse_response(&body)
    }
}

/// Extract `result.records` from a datastore response. A body without those
/// keys is an empty collection, not an error.
pub fn parse_response(body: &Value) -> Result<DataFrame, DashError> {
    match body.get("result").and_then(|r| r.get("records")) {
        Some(Value::Array(records)) => records_to_frame(records),
        None | Some(Value::Null) => {
            warn!("Response has no result.records");
            Ok(DataFrame::empty())
        }
        Some(other) => Err(DashError::MalformedResponse(format!(
            "records is not a list but {}",
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Build a frame of `String` columns from JSON records. Columns appear in
/// first-seen order; keys missing from a record become nulls.
pub fn records_to_frame(records: &[Value]) -> Result<DataFrame, DashError> {
    let rows: Vec<&Map<String, Value>> = records
        .iter()
        .enumerate()
        .map(|(idx, r)| {
            r.as_object().ok_or_else(|| {
                DashError::MalformedResponse(format!("record {idx} is {}", json_kind(r)))
            })
        })
        .collect::<Result<_, _>>()?;

    let mut names: Vec<&str> = Vec::new();
    for row in rows.iter() {
        for key in row.keys() {
            if !names.contains(&key.as_str()) {
                names.push(key);
            }
        }
    }

    let columns: Vec<polars::prelude::Column> = names
        .iter()
        .map(|&name| {
            let values: Vec<Option<String>> =
                rows.iter().map(|row| row.get(name).and_then(cell)).collect();
            polars::prelude::Column::new(name.into(), values)
        })
        .collect();
    Ok(DataFrame::new(columns)?)
}

fn detect_file_type(path: &Path) -> Result<FileType, DashError> {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_uppercase())
        .as_deref()
    {
        Some("JSON") => Ok(FileType::JSON),
        Some("CSV") => Ok(FileType::CSV),
        Some("PARQUET") | Some("PQ") => Ok(FileType::PARQUET),
        Some("ARROW") | Some("IPC") | Some("FEATHER") => Ok(FileType::ARROW),
        _ => Err(DashError::UnknownFileType),
    }
}

fn check_file(path: &Path) -> Result<(), DashError> {
    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => DashError::FileNotFound,
        ErrorKind::PermissionDenied => DashError::PermissionDenied,
        _ => DashError::IoError(e),
    })?;
    if !metadata.is_file() {
        return Err(DashError::LoadingFailed("Not a file!".into()));
    }
    Ok(())
}

fn load_csv(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyCsvReader::new(PlPath::Local(path.into()))
        .with_has_header(true)
        .finish()
}

fn load_parquet(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyFrame::scan_parquet(PlPath::Local(path.into()), ScanArgsParquet::default())
}

fn load_arrow(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyFrame::scan_ipc(
        PlPath::Local(path.into()),
        polars::io::ipc::IpcScanOptions,
        UnifiedScanArgs::default(),
    )
}

fn try_load_file(path: &Path) -> Result<DataFrame, DashError> {
    check_file(path)?;
    let frame = match detect_file_type(path)? {
        FileType::JSON => {
            let body: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
            return parse_response(&body);
        }
        FileType::CSV => load_csv(path)?,
        FileType::PARQUET => load_parquet(path)?,
        FileType::ARROW => load_arrow(path)?,
    };
    Ok(stringify_columns(&frame.collect()?)?)
}

/// Load a snapshot from disk, with the same failure rules as [`Fetcher::fetch`].
#[instrument]
pub fn load_file(path: &Path) -> FetchOutcome {
    let start_time = Instant::now();
    match try_load_file(path) {
        Ok(frame) => {
            info!(
                "Loaded {} records from file in {}ms",
                frame.height(),
                start_time.elapsed().as_millis()
            );
            FetchOutcome::loaded(frame)
        }
        Err(e) => {
            error!(error = %e, spantrace = %SpanTrace::capture(), "Loading file failed");
            FetchOutcome::failed(format!("Error loading {}: {e}", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{column_names, distinct_values};
    use serde_json::json;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve exactly one connection: read the request head, then call `respond`.
    fn serve_once<F>(respond: F) -> String
    where
        F: FnOnce(&mut std::net::TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                respond(&mut stream);
            }
        });
        format!("http://{addr}/api/3/action/datastore_search")
    }

    fn reply(body: &'static str) -> impl FnOnce(&mut std::net::TcpStream) + Send + 'static {
        move |stream: &mut std::net::TcpStream| {
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
        }
    }

    fn fetcher(endpoint: String, timeout: Duration) -> Fetcher {
        let config = DashConfig::default()
            .endpoint(endpoint)
            .resource_id("test".to_string())
            .timeout(timeout);
        Fetcher::new(&config)
    }

    #[test]
    fn dataset_url_carries_resource_and_limit() {
        assert_eq!(
            Fetcher::dataset_url("https://host/api", "abc", 500),
            "https://host/api?resource_id=abc&limit=500"
        );
    }

    #[test]
    fn valid_response_becomes_frame() {
        let endpoint = serve_once(reply(
            r#"{"success": true, "result": {"records": [
                {"_id": 1, "Region": "Metropolitana", "Comuna": "Santiago"},
                {"_id": 2, "Region": "Valparaíso"}
            ]}}"#,
        ));
        let outcome = fetcher(endpoint, Duration::from_secs(5)).fetch();
        assert!(outcome.error.is_none());
        assert_eq!(outcome.frame.height(), 2);
        assert_eq!(column_names(&outcome.frame), vec!["_id", "Region", "Comuna"]);
    }

    #[test]
    fn timeout_yields_empty_outcome_with_message() {
        let endpoint = serve_once(|_stream| thread::sleep(Duration::from_secs(3)));
        let outcome = fetcher(endpoint, Duration::from_millis(200)).fetch();
        assert!(outcome.is_empty());
        assert!(
            outcome
                .error
                .as_deref()
                .is_some_and(|e| e.starts_with("Error connecting to the API"))
        );
    }

    #[test]
    fn non_json_body_yields_empty_outcome() {
        let endpoint = serve_once(reply("<html>maintenance</html>"));
        let outcome = fetcher(endpoint, Duration::from_secs(5)).fetch();
        assert!(outcome.is_empty());
        assert!(outcome.error.is_some());
    }

    #[test]
    fn missing_keys_yield_empty_outcome_without_message() {
        let endpoint = serve_once(reply(r#"{"success": false, "error": {"message": "Not found"}}"#));
        let outcome = fetcher(endpoint, Duration::from_secs(5)).fetch();
        assert!(outcome.is_empty());
        assert!(outcome.error.is_none());
    }

    #[test]
    fn unreachable_host_yields_empty_outcome() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let outcome = fetcher(format!("http://{addr}/"), Duration::from_secs(2)).fetch();
        assert!(outcome.is_empty());
        assert!(outcome.error.is_some());
    }

    #[test]
    fn sparse_records_fill_nulls() {
        let records = vec![
            json!({"a": "x", "b": 1}),
            json!({"b": 2.5, "c": true}),
            json!({"a": null, "c": [1, 2]}),
        ];
        let df = records_to_frame(&records).unwrap();
        assert_eq!(column_names(&df), vec!["a", "b", "c"]);
        assert_eq!(df.height(), 3);
        assert_eq!(df.column("a").unwrap().null_count(), 2);
        assert_eq!(
            distinct_values(&df, "b").unwrap(),
            vec!["1".to_string(), "2.5".to_string()]
        );
        assert_eq!(
            distinct_values(&df, "c").unwrap(),
            vec!["[1,2]".to_string(), "true".to_string()]
        );
    }

    #[test]
    fn null_records_are_an_empty_collection() {
        let body = json!({"success": true, "result": {"records": null}});
        let df = parse_response(&body).unwrap();
        assert_eq!(df.height(), 0);
    }

    #[test]
    fn null_records_over_http_carry_no_error_message() {
        let endpoint = serve_once(reply(r#"{"success": true, "result": {"records": null}}"#));
        let outcome = fetcher(endpoint, Duration::from_secs(5)).fetch();
        assert!(outcome.is_empty());
        assert!(outcome.error.is_none());
    }

    #[test]
    fn non_object_record_is_malformed() {
        let body = json!({"result": {"records": [1, 2]}});
        assert!(matches!(
            parse_response(&body),
            Err(DashError::MalformedResponse(_))
        ));
        let body = json!({"result": {"records": "nope"}});
        assert!(matches!(
            parse_response(&body),
            Err(DashError::MalformedResponse(_))
        ));
    }

    #[test]
    fn json_snapshot_loads_like_the_api() {
        let outcome = load_file(Path::new("tests/fixtures/datastore_response.json"));
        assert!(outcome.error.is_none());
        assert_eq!(outcome.frame.height(), 6);
    }

    #[test]
    fn csv_snapshot_is_stringified() {
        let outcome = load_file(Path::new("tests/fixtures/emergencias.csv"));
        assert!(outcome.error.is_none());
        assert_eq!(outcome.frame.height(), 5);
        for column in outcome.frame.get_columns() {
            assert_eq!(column.dtype(), &DataType::String);
        }
    }

    #[test]
    fn missing_or_unknown_files_yield_empty_outcome() {
        let outcome = load_file(Path::new("tests/fixtures/does_not_exist.csv"));
        assert!(outcome.is_empty());
        assert!(outcome.error.as_deref().is_some_and(|e| e.contains("file not found")));

        let outcome = load_file(Path::new("Cargo.toml"));
        assert!(outcome.is_empty());
        assert!(outcome.error.as_deref().is_some_and(|e| e.contains("unknown file type")));
    }
}
