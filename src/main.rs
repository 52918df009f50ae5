use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cache;
mod controller;
mod domain;
mod fetcher;
mod model;
mod records;
mod ui;

use controller::Controller;
use domain::{
    DEFAULT_ENDPOINT, DEFAULT_RESOURCE_ID, DEFAULT_ROW_LIMIT, DEFAULT_TIMEOUT_SECS, DashConfig,
    DashError,
};
use model::{Model, Status};
use ui::TableUI;

/// Terminal dashboard for a datos.gob.cl datastore resource.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// CKAN datastore_search endpoint
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Resource id of the dataset
    #[arg(long, default_value = DEFAULT_RESOURCE_ID)]
    resource_id: String,

    /// Maximum number of records to request
    #[arg(long, default_value_t = DEFAULT_ROW_LIMIT)]
    limit: usize,

    /// Request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Load a snapshot (json, csv, parquet, arrow) instead of calling the API
    #[arg(short, long)]
    file: Option<String>,

    /// Widest a table column is rendered before it is cut
    #[arg(long, default_value_t = 30)]
    max_column_width: usize,

    /// Where log output goes, the terminal belongs to the UI
    #[arg(long, default_value = "datos-dash.log")]
    log_file: PathBuf,
}

impl Cli {
    fn into_config(self) -> Result<DashConfig, DashError> {
        let source_file = match self.file {
            Some(path) => Some(PathBuf::from(
                shellexpand::full(&path)
                    .map_err(|e| DashError::LoadingFailed(e.to_string()))?
                    .as_ref(),
            )),
            None => None,
        };
        Ok(DashConfig::default()
            .endpoint(self.endpoint)
            .resource_id(self.resource_id)
            .limit(self.limit)
            .timeout(Duration::from_secs(self.timeout))
            .max_column_width(self.max_column_width)
            .source_file(source_file))
    }
}

fn init_logging(path: &Path) -> Result<(), DashError> {
    let file = File::create(path)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn main() -> ExitCode {
    let result = run();
    ratatui::restore();
    match result {
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn run() -> Result<(), DashError> {
    let cli = Cli::parse();
    init_logging(&cli.log_file)?;
    let cfg = cli.into_config()?;
    info!("Starting datos-dash with {:?}", cfg);

    let mut terminal = ratatui::init();
    let size = terminal.size()?;
    let mut model = Model::init(&cfg, size.width as usize, size.height as usize);
    let ui = TableUI::new();
    let controller = Controller::new(&cfg);

    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(model.get_uidata(), f))?;

        if model.status == Status::LOADING {
            model.load_data()?;
            continue;
        }

        // Handle events and map to a Message
        if let Some(message) = controller.handle_event()? {
            model.update(message)?;
        };
    }

    info!("Bye");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_the_public_dataset() {
        let cfg = Cli::parse_from(["datos-dash"]).into_config().unwrap();
        assert_eq!(cfg.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(cfg.resource_id, DEFAULT_RESOURCE_ID);
        assert_eq!(cfg.limit, 500);
        assert_eq!(cfg.timeout, Duration::from_secs(10));
        assert!(cfg.source_file.is_none());
    }

    #[test]
    fn cli_file_is_expanded() {
        let cfg = Cli::parse_from([
            "datos-dash",
            "--file",
            "$CARGO_MANIFEST_DIR/tests/fixtures/emergencias.csv",
            "--limit",
            "50",
        ])
        .into_config()
        .unwrap();
        assert_eq!(cfg.limit, 50);
        let expected =
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/emergencias.csv");
        assert_eq!(cfg.source_file, Some(expected));
    }
}
