//! Shared handler state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use github::{GitHubRepositoryClient, RateLimit};
use reconciler::Reconciler;
use serde::Serialize;
use serde_json::Value;

/// Ingest request counters reported by `/runtime-info`.
#[derive(Debug, Default)]
pub struct IngestCounters {
    received: AtomicU64,
    succeeded: AtomicU64,
}

/// Point-in-time copy of [`IngestCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub received: u64,
    pub succeeded: u64,
}

impl IngestCounters {
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            received: self.received.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
        }
    }
}

/// State shared by every handler.
pub struct AppState {
    pub(crate) reconciler: Reconciler,
    pub(crate) counters: IngestCounters,
    pub(crate) build_info: Value,
    pub(crate) environment: String,
    pub(crate) github: Option<Arc<GitHubRepositoryClient>>,
}

impl AppState {
    /// Creates handler state.
    ///
    /// `build_info` is returned verbatim by `/build-info`. `github`, when
    /// given, supplies the rate-limit reading shown by `/runtime-info`.
    pub fn new(
        reconciler: Reconciler,
        build_info: Value,
        environment: impl Into<String>,
        github: Option<Arc<GitHubRepositoryClient>>,
    ) -> Self {
        Self {
            reconciler,
            counters: IngestCounters::default(),
            build_info,
            environment: environment.into(),
            github,
        }
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    pub(crate) fn rate_limit(&self) -> Option<RateLimit> {
        self.github.as_ref().and_then(|client| client.rate_limit())
    }
}
