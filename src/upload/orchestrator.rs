//! Upload orchestrator
//!
//! Spawns one worker per candidate. Each worker runs, in order:
//!
//! 1. open the source file
//! 2. stat it
//! 3. wait for its dependency producers, if any
//! 4. reject files below the minimum size
//! 5. admit its size against the shared quota
//! 6. transfer the file, then signal its own dependents
//!
//! With a concurrency bound, a worker first waits for its producers, then
//! takes a permit, and only then opens and stats its file.
//!
//! The first failing step ends that worker only; siblings are unaffected.
//! The run returns once every worker has reported.
//!
//! # Example
//!
//! ```no_run
//! use quota_uploadr::s3::{Credentials, S3Client, S3ClientConfig};
//! use quota_uploadr::upload::{SizePolicy, Uploader};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = S3Client::connect(S3ClientConfig {
//!     endpoint: "http://localhost:9000".into(),
//!     region: "eu-west-4".into(),
//!     force_path_style: true,
//!     credentials: Credentials::new("minioadmin", "minioadmin"),
//! })
//! .await;
//!
//! let uploader = Uploader::new(Arc::new(client), "cs-team-20250101", SizePolicy::default());
//! let report = uploader.upload_folder(Path::new("../files")).await?;
//! report.combined()?;
//! # Ok(())
//! # }
//! ```

use super::aggregator::{outcome_channel, OutcomeSink, RunReport};
use super::dependency::{DependencyGraph, TaskGates};
use super::enumerator::enumerate_candidates;
use super::{BatchError, Candidate, QuotaAccountant, SizePolicy, TaskOutcome, UploadError, MIB};
use crate::metrics;
use crate::s3::ObjectStore;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::sync::Semaphore;
use tracing::Instrument;

/// Batch uploader for a single bucket
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    policy: SizePolicy,
    dependencies: DependencyGraph,
    max_concurrency: Option<usize>,
    dependency_timeout: Option<Duration>,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, policy: SizePolicy) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            policy,
            dependencies: DependencyGraph::new(),
            max_concurrency: None,
            dependency_timeout: None,
        }
    }

    /// Ordering edges between object keys
    pub fn with_dependencies(mut self, dependencies: DependencyGraph) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Bound the number of workers past their dependency wait at any time.
    ///
    /// A value of zero is treated as one.
    pub fn with_max_concurrency(mut self, max_concurrency: Option<usize>) -> Self {
        self.max_concurrency = max_concurrency.map(|n| n.max(1));
        self
    }

    /// Give up on dependency producers after `timeout`
    pub fn with_dependency_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.dependency_timeout = timeout;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Enumerate `dir`, seed the quota from the bucket's stored size, and run.
    pub async fn upload_folder(&self, dir: &Path) -> Result<RunReport, BatchError> {
        let candidates = enumerate_candidates(dir).await?;
        self.policy.check_candidate_count(candidates.len())?;

        let initial_quota = self
            .store
            .total_stored_bytes(&self.bucket)
            .await
            .map_err(BatchError::SizeQuery)?;

        tracing::info!(
            bucket = %self.bucket,
            current_size_mb = initial_quota / MIB,
            "Current bucket size"
        );

        self.run(candidates, initial_quota).await
    }

    /// Upload `candidates` concurrently against a quota starting at `initial_quota`.
    ///
    /// Fails before spawning anything when the batch is below the minimum
    /// count or repeats an object key. Otherwise returns a report holding exactly one outcome per
    /// candidate; use [`RunReport::combined`] for the overall verdict.
    #[tracing::instrument(
        name = "upload.run",
        skip_all,
        fields(
            run_id = %uuid::Uuid::new_v4(),
            s3.bucket = %self.bucket,
            candidates = candidates.len(),
            initial_quota = initial_quota
        )
    )]
    pub async fn run(
        &self,
        candidates: Vec<Candidate>,
        initial_quota: u64,
    ) -> Result<RunReport, BatchError> {
        self.policy.check_candidate_count(candidates.len())?;

        let mut keys = HashSet::with_capacity(candidates.len());
        if let Some(dup) = candidates.iter().find(|c| !keys.insert(c.key())) {
            return Err(BatchError::DuplicateKey(dup.key().to_string()));
        }

        let quota = Arc::new(QuotaAccountant::new(initial_quota, self.policy));
        let limiter = self.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));
        let gates = self.dependencies.wire(&candidates);
        let (sink, collector) = outcome_channel();

        let mut handles = Vec::with_capacity(candidates.len());
        for (candidate, task_gates) in candidates.into_iter().zip(gates) {
            let worker = Worker {
                store: Arc::clone(&self.store),
                bucket: self.bucket.clone(),
                policy: self.policy,
                quota: Arc::clone(&quota),
                limiter: limiter.clone(),
                dependency_timeout: self.dependency_timeout,
            };
            let worker_sink = sink.clone();
            let span = tracing::info_span!("upload.worker", s3.key = %candidate.key());
            let task_candidate = candidate.clone();

            let handle = tokio::spawn(
                async move {
                    let result = worker.process(&task_candidate, task_gates).await;
                    worker_sink.record(TaskOutcome::from_result(task_candidate, result));
                }
                .instrument(span),
            );
            handles.push((candidate, handle));
        }

        for (candidate, handle) in handles {
            if let Err(e) = handle.await {
                record_aborted(&sink, candidate, &e);
            }
        }
        drop(sink);

        let report = collector.finish(&self.bucket, initial_quota, quota.committed());
        report.log_summary();
        Ok(report)
    }
}

fn record_aborted(sink: &OutcomeSink, candidate: Candidate, err: &tokio::task::JoinError) {
    tracing::error!(key = %candidate.key(), error = %err, "Upload worker aborted");
    sink.record(TaskOutcome::Failure {
        kind: super::FailureKind::Aborted,
        candidate,
        detail: err.to_string(),
    });
}

/// Open `path` and stat the opened handle
async fn open_source(path: &Path) -> Result<(File, u64), UploadError> {
    let file = File::open(path).await.map_err(|source| UploadError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let size = file
        .metadata()
        .await
        .map_err(|source| UploadError::Stat {
            path: path.to_path_buf(),
            source,
        })?
        .len();

    Ok((file, size))
}

/// Per-candidate state machine
struct Worker {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    policy: SizePolicy,
    quota: Arc<QuotaAccountant>,
    limiter: Option<Arc<Semaphore>>,
    dependency_timeout: Option<Duration>,
}

impl Worker {
    async fn process(
        &self,
        candidate: &Candidate,
        mut gates: TaskGates,
    ) -> Result<u64, UploadError> {
        let path = candidate.path();
        let key = candidate.key();

        // Bounded: wait, permit, then open, so at most `n` source files are open.
        // Unbounded: open and stat before waiting on producers.
        let (_permit, file, size) = match &self.limiter {
            Some(limiter) => {
                gates
                    .wait_for_producers(key, self.dependency_timeout)
                    .await?;
                let permit = Arc::clone(limiter).acquire_owned().await.ok();
                let (file, size) = open_source(path).await?;
                (permit, file, size)
            }
            None => {
                let (file, size) = open_source(path).await?;
                gates
                    .wait_for_producers(key, self.dependency_timeout)
                    .await?;
                (None, file, size)
            }
        };

        if self.policy.is_too_small(size) {
            return Err(UploadError::BelowMinimumSize {
                path: path.to_path_buf(),
                size,
                min: self.policy.min_file_size,
            });
        }

        if !self.quota.try_admit(size) {
            return Err(UploadError::QuotaExceeded {
                path: path.to_path_buf(),
                size,
                ceiling: self.quota.ceiling(),
            });
        }

        let start_time = Instant::now();
        let result = self.store.put_object(&self.bucket, key, file, size).await;
        let duration = start_time.elapsed();
        metrics::record_upload_duration(duration.as_secs_f64());

        let bytes_written = result.map_err(|source| UploadError::Transfer {
            key: key.to_string(),
            source,
        })?;

        metrics::record_upload_success(bytes_written);
        gates.complete();

        tracing::info!(
            key = %key,
            size_mb = size / MIB,
            duration_ms = duration.as_millis() as u64,
            "Uploaded"
        );

        Ok(bytes_written)
    }
}
