//! Shared health state for the /health endpoint.
//! Updated by the poller at the end of every run.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::types::RunSummary;

#[derive(Default)]
pub struct HealthState {
    runs_total: AtomicU64,
    /// Epoch ms of the last completed run (0 = none yet).
    last_run_at_ms: AtomicI64,
    last_run_inserted: AtomicU64,
    last_run_errors: AtomicU64,
    /// Runs aborted before any unit executed (markets config unreadable).
    failed_runs_total: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_run(&self, now_ms: i64, summary: &RunSummary) {
        self.runs_total.fetch_add(1, Ordering::Relaxed);
        self.last_run_at_ms.store(now_ms, Ordering::Relaxed);
        self.last_run_inserted.store(summary.inserted as u64, Ordering::Relaxed);
        self.last_run_errors.store(summary.errors.len() as u64, Ordering::Relaxed);
    }

    pub fn record_failed_run(&self) {
        self.failed_runs_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> serde_json::Value {
        let last_run_at_ms = self.last_run_at_ms.load(Ordering::Relaxed);
        serde_json::json!({
            "runs_total": self.runs_total.load(Ordering::Relaxed),
            "failed_runs_total": self.failed_runs_total.load(Ordering::Relaxed),
            "last_run_at_ms": (last_run_at_ms > 0).then_some(last_run_at_ms),
            "last_run_inserted": self.last_run_inserted.load(Ordering::Relaxed),
            "last_run_errors": self.last_run_errors.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_last_run() {
        let health = HealthState::new();
        assert_eq!(health.snapshot()["last_run_at_ms"], serde_json::Value::Null);

        let summary = RunSummary {
            inserted: 3,
            errors: vec!["SPX/kalshi/T: no data".to_string()],
            ..Default::default()
        };
        health.record_run(1_700_000_000_000, &summary);
        health.record_failed_run();

        let snap = health.snapshot();
        assert_eq!(snap["runs_total"], 1);
        assert_eq!(snap["failed_runs_total"], 1);
        assert_eq!(snap["last_run_at_ms"], 1_700_000_000_000i64);
        assert_eq!(snap["last_run_inserted"], 3);
        assert_eq!(snap["last_run_errors"], 1);
    }
}
