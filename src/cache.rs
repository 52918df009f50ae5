use polars::prelude::DataFrame;
use std::time::Instant;
use tracing::{debug, info};

use crate::fetcher::FetchOutcome;

struct Entry {
    key: String,
    frame: DataFrame,
    stored_at: Instant,
}

/// Holds the last successfully loaded record collection.
///
/// The cache is keyed by the source (request URL or file path). Empty results
/// are never stored, so a failed load is retried on the next call.
#[derive(Default)]
pub struct DatasetCache {
    entry: Option<Entry>,
}

impl DatasetCache {
    pub fn get_or_fetch<F>(&mut self, key: &str, fetch: F) -> FetchOutcome
    where
        F: FnOnce() -> FetchOutcome,
    {
        if let Some(entry) = self.entry.as_ref().filter(|e| e.key == key) {
            debug!(
                "Cache hit for {key}, stored {}s ago",
                entry.stored_at.elapsed().as_secs()
            );
            return FetchOutcome {
                frame: entry.frame.clone(),
                error: None,
            };
        }

        let outcome = fetch();
        if outcome.is_empty() {
            debug!("Not caching empty result for {key}");
        } else {
            self.entry = Some(Entry {
                key: key.to_string(),
                frame: outcome.frame.clone(),
                stored_at: Instant::now(),
            });
        }
        outcome
    }

    pub fn is_cached(&self, key: &str) -> bool {
        self.entry.as_ref().is_some_and(|e| e.key == key)
    }

    pub fn invalidate(&mut self) {
        if let Some(entry) = self.entry.take() {
            info!("Dropped cached dataset {}", entry.key);
        }
    }
}
