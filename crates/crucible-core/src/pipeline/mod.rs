//! Run orchestrator — breeds, detonates, sanitizes, and evaluates samples.
//!
//! One iteration walks GENERATE → SANDBOX_RUN → SCAN_ORIGINAL → SANITIZE
//! → SCAN_SANITIZED → RECORD. A step failure stops the walk and records
//! the failing stage; completed or not, every iteration lands in the log
//! exactly once. Iterations are independent and may run in parallel up
//! to a caller-chosen limit.

pub mod record;

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backoff::Backoff;
use crate::dataset::DatasetWriter;
use crate::defense::DefenseEvaluator;
use crate::error::{CollaboratorError, Stage};
use crate::extract;
use crate::providers::{CodeWriter, PromptRole};
use crate::sample::CodeSample;
use crate::sandbox::DockerSandbox;

pub use record::{DefenseRecord, IterationRecord, RecordLog, RunStats, StageFailure};

/// Sequences the pipeline and accumulates the run log.
#[derive(Clone)]
pub struct Orchestrator {
    sandbox: Arc<DockerSandbox>,
    writer: Arc<dyn CodeWriter>,
    evaluator: Arc<DefenseEvaluator>,
    log: Arc<RecordLog>,
    dataset: Option<Arc<DatasetWriter>>,
    max_retries: u32,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        sandbox: Arc<DockerSandbox>,
        writer: Arc<dyn CodeWriter>,
        evaluator: Arc<DefenseEvaluator>,
    ) -> Self {
        Self {
            sandbox,
            writer,
            evaluator,
            log: Arc::new(RecordLog::new()),
            dataset: None,
            max_retries: 2,
            cancel: CancellationToken::new(),
        }
    }

    /// Streams every record to an append-only JSONL file as it lands.
    pub fn with_dataset(mut self, dataset: DatasetWriter) -> Self {
        self.dataset = Some(Arc::new(dataset));
        self
    }

    /// Retry budget for each collaborator call.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Token that aborts in-flight sandbox runs and collaborator calls.
    /// Cancelling never leaves an orphaned container behind.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn log(&self) -> Arc<RecordLog> {
        self.log.clone()
    }

    /// Runs `iterations` iterations, at most `concurrency` in flight.
    ///
    /// Sequence ids are assigned here, before any task starts, so record
    /// order is reproducible whatever order completions arrive in.
    pub async fn run(&self, iterations: u32, concurrency: usize) -> RunStats {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut handles = Vec::with_capacity(iterations as usize);
        for id in 1..=u64::from(iterations) {
            let orchestrator = self.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                orchestrator.run_iteration(id).await;
            }));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                error!("pipeline: iteration task panicked: {e}");
            }
        }
        RunStats::from_records(&self.log.snapshot())
    }

    /// Runs one full iteration and records it. Every exit path appends
    /// exactly one record; an iteration that cannot complete is recorded
    /// with its failing stage, never dropped.
    pub async fn run_iteration(&self, id: u64) -> IterationRecord {
        let record = self.iterate(id).await;
        self.log.append(record.clone());
        if let Some(dataset) = &self.dataset {
            if let Err(e) = dataset.append(&record).await {
                warn!("pipeline: could not persist record {id}: {e:#}");
            }
        }
        record
    }

    async fn iterate(&self, id: u64) -> IterationRecord {
        let mut record = IterationRecord::started(id);

        let code = match self.call_collaborator(PromptRole::Generator, "").await {
            Ok(code) => code,
            Err(e) => return record.fail(Stage::Generate, e.to_string()),
        };
        let original = CodeSample::original(id, code);
        record.original = Some(original.clone());

        let outcome = match self.sandbox.run(&original, &self.cancel).await {
            Ok(outcome) => outcome,
            Err(e) => return record.fail(Stage::SandboxRun, e.to_string()),
        };
        let verdict = outcome.verdict();
        info!("pipeline: iteration {id} detonated, verdict {verdict}");
        record.verdict = Some(verdict);
        record.outcome = Some(outcome);

        let original_indicators = self.evaluator.scan(&original.text);

        let sanitized_code = match self
            .call_collaborator(PromptRole::Sanitizer, &original.text)
            .await
        {
            Ok(code) => code,
            Err(e) => return record.fail(Stage::Sanitize, e.to_string()),
        };
        let sanitized = CodeSample::sanitized(id, sanitized_code);
        record.sanitized = Some(sanitized.clone());

        let sanitized_indicators = self.evaluator.scan(&sanitized.text);
        record.defense = Some(crate::defense::DefenseResult::from_scans(
            original_indicators,
            sanitized_indicators,
            original.len_chars(),
            sanitized.len_chars(),
        ));

        record
    }

    /// Replays the defense tail (SANITIZE → SCAN_SANITIZED, optionally a
    /// detonation of the sanitized side) against a recorded original.
    pub async fn run_defense(&self, original: &CodeSample, detonate_sanitized: bool) -> DefenseRecord {
        let mut record = DefenseRecord::started(original.clone());

        let sanitized_code = match self
            .call_collaborator(PromptRole::Sanitizer, &original.text)
            .await
        {
            Ok(code) => code,
            Err(e) => {
                record.failure = Some(StageFailure {
                    stage: Stage::Sanitize,
                    reason: e.to_string(),
                });
                return record;
            }
        };
        let sanitized = CodeSample::sanitized(original.id, sanitized_code);
        record.defense = Some(self.evaluator.evaluate(original, &sanitized));
        record.sanitized = Some(sanitized.clone());

        if detonate_sanitized {
            match self.sandbox.run(&sanitized, &self.cancel).await {
                Ok(outcome) => {
                    record.sanitized_verdict = Some(outcome.verdict());
                    record.sanitized_outcome = Some(outcome);
                }
                Err(e) => {
                    record.failure = Some(StageFailure {
                        stage: Stage::SandboxRun,
                        reason: e.to_string(),
                    });
                }
            }
        }
        record
    }

    /// One collaborator call with bounded exponential backoff. Transport
    /// faults are retried; unusable text is not. Extraction happens here
    /// so retries see the raw transport failure, not the parsed one.
    async fn call_collaborator(
        &self,
        role: PromptRole,
        context: &str,
    ) -> Result<String, CollaboratorError> {
        let mut backoff = Backoff::default();
        loop {
            let result = tokio::select! {
                res = self.writer.write_code(role, context) => res,
                _ = self.cancel.cancelled() => return Err(CollaboratorError::Cancelled),
            };
            let err = match result {
                Ok(raw) => return extract::extract_code(&raw).ok_or(CollaboratorError::NoCode),
                Err(e) => e,
            };
            if !err.is_retryable() {
                return Err(err);
            }
            if backoff.exhausted(self.max_retries) {
                return Err(CollaboratorError::RetriesExhausted {
                    attempts: backoff.attempts(),
                    last: err.to_string(),
                });
            }
            let delay = backoff.next_delay();
            warn!("pipeline: {role} call failed ({err}), retrying in {delay:?}");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => return Err(CollaboratorError::Cancelled),
            }
        }
    }
}
