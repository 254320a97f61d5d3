//! Outcome collection and reduction.
//!
//! Workers push their [`TaskOutcome`] into an unbounded channel, so recording
//! never waits on the collector. The orchestrator drains the channel only
//! after every worker finished.

use super::{BatchError, Candidate, FailureKind, TaskOutcome, MIB};
use crate::metrics;
use serde::Serialize;
use tokio::sync::mpsc;

/// Create a connected sink/collector pair
pub fn outcome_channel() -> (OutcomeSink, OutcomeCollector) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OutcomeSink { tx }, OutcomeCollector { rx })
}

/// Producer handle, one clone per worker
#[derive(Debug, Clone)]
pub struct OutcomeSink {
    tx: mpsc::UnboundedSender<TaskOutcome>,
}

impl OutcomeSink {
    pub fn record(&self, outcome: TaskOutcome) {
        if let Err(e) = self.tx.send(outcome) {
            tracing::error!(
                key = %e.0.candidate().key(),
                "Outcome collector dropped before worker finished"
            );
        }
    }
}

#[derive(Debug)]
pub struct OutcomeCollector {
    rx: mpsc::UnboundedReceiver<TaskOutcome>,
}

impl OutcomeCollector {
    /// Take every outcome recorded so far.
    pub fn drain(&mut self) -> Vec<TaskOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(outcome) = self.rx.try_recv() {
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Drain, log every failure and build the run report.
    pub fn finish(
        mut self,
        bucket: &str,
        initial_quota: u64,
        final_quota: u64,
    ) -> RunReport {
        let report = RunReport {
            bucket: bucket.to_string(),
            outcomes: self.drain(),
            initial_quota,
            final_quota,
        };

        for (candidate, kind, detail) in report.failures() {
            metrics::record_upload_failure(kind);
            tracing::warn!(
                kind = %kind,
                path = %candidate.path().display(),
                detail = %detail,
                "Upload failed"
            );
        }

        report
    }
}

/// Everything observed during one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub bucket: String,
    /// One entry per candidate, in completion order
    pub outcomes: Vec<TaskOutcome>,
    /// Bytes committed before the run
    pub initial_quota: u64,
    /// Bytes committed after the run, including admissions whose transfer failed
    pub final_quota: u64,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn bytes_written(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o {
                TaskOutcome::Success { bytes_written, .. } => *bytes_written,
                TaskOutcome::Failure { .. } => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Candidate, FailureKind, &str)> {
        self.outcomes.iter().filter_map(|o| match o {
            TaskOutcome::Failure {
                kind,
                candidate,
                detail,
            } => Some((candidate, *kind, detail.as_str())),
            TaskOutcome::Success { .. } => None,
        })
    }

    /// Outcome recorded for `key`
    pub fn outcome(&self, key: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.candidate().key() == key)
    }

    /// Reduce to a single verdict. Per-file detail stays in the report.
    pub fn combined(&self) -> Result<(), BatchError> {
        if self.is_success() {
            Ok(())
        } else {
            Err(BatchError::SomeUploadsFailed {
                failed: self.failed(),
                total: self.total(),
            })
        }
    }

    pub fn log_summary(&self) {
        tracing::info!(
            bucket = %self.bucket,
            total = self.total(),
            succeeded = self.succeeded(),
            failed = self.failed(),
            uploaded_mb = self.bytes_written() / MIB,
            bucket_size_mb = self.final_quota / MIB,
            "Upload run finished"
        );
    }
}
