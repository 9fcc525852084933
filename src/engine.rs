//! Request-handling front end over a shared stub repository.

use crate::config::{EngineConfig, LookupQuery, Output, Settings, Stub};
use crate::loader::{LoadReport, StubLoader};
use crate::storage::{LookupError, StubMapping, StubRepository};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Stub engine
///
/// Resolves lookup queries against the repository it was handed, keeping
/// request counters and logging hits and misses.
pub struct StubEngine {
    settings: Settings,
    repository: Arc<StubRepository>,
    /// Total lookups processed.
    requests_total: AtomicU64,
    /// Total lookups that returned an output.
    requests_matched: AtomicU64,
    /// Total lookups that failed.
    requests_unmatched: AtomicU64,
}

/// Point-in-time engine counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub total: u64,
    pub matched: u64,
    pub unmatched: u64,
    pub stubs: usize,
}

impl StubEngine {
    /// Create an engine over an existing repository.
    pub fn new(settings: Settings, repository: Arc<StubRepository>) -> Self {
        Self {
            settings,
            repository,
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
        }
    }

    /// Build an engine from configuration: inline stubs first, then the
    /// stub directory, if any.
    pub async fn from_config(config: &EngineConfig) -> anyhow::Result<(Self, LoadReport)> {
        let repository = Arc::new(StubRepository::new());
        for stub in &config.stubs {
            repository.register(stub.clone());
        }

        let report = match &config.stubs_dir {
            Some(dir) => {
                let loader = StubLoader::new(&config.loader)?;
                loader.load_dir(dir, &repository).await
            }
            None => LoadReport::default(),
        };

        info!(
            inline = config.stubs.len(),
            loaded = report.loaded,
            skipped = report.skipped,
            "Stub engine initialized"
        );

        Ok((Self::new(config.settings.clone(), repository), report))
    }

    /// Shared handle to the underlying repository.
    pub fn repository(&self) -> Arc<StubRepository> {
        Arc::clone(&self.repository)
    }

    /// Resolve a lookup query.
    pub fn find(&self, query: &LookupQuery) -> Result<Output, LookupError> {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        match self.repository.lookup(query) {
            Ok(output) => {
                self.requests_matched.fetch_add(1, Ordering::Relaxed);
                if self.settings.log_matches {
                    info!(
                        service = %query.service,
                        method = %query.method,
                        "Request matched stub"
                    );
                }
                Ok(output)
            }
            Err(e) => {
                self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
                if self.settings.log_unmatched {
                    warn!(
                        service = %query.service,
                        method = %query.method,
                        error = %e,
                        "No matching stub found"
                    );
                }
                Err(e)
            }
        }
    }

    /// Register a stub.
    pub fn add(&self, stub: Stub) {
        self.repository.register(stub);
    }

    /// Everything currently registered.
    pub fn list(&self) -> StubMapping {
        self.repository.snapshot()
    }

    /// Drop every registered stub.
    pub fn clear(&self) {
        self.repository.clear();
        info!("All stubs cleared");
    }

    /// Current counters.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            total: self.requests_total.load(Ordering::Relaxed),
            matched: self.requests_matched.load(Ordering::Relaxed),
            unmatched: self.requests_unmatched.load(Ordering::Relaxed),
            stubs: self.repository.len(),
        }
    }
}
