//! Iteration records, the append-only run log, and aggregate statistics.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::defense::DefenseResult;
use crate::error::Stage;
use crate::sample::CodeSample;
use crate::sandbox::{ExecutionOutcome, Verdict};

/// Where an iteration stopped when it could not complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub reason: String,
}

/// One pipeline iteration.
///
/// Fields a failed iteration never produced stay absent; nothing is
/// defaulted to look complete. Records are appended once and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub original: Option<CodeSample>,
    pub outcome: Option<ExecutionOutcome>,
    pub verdict: Option<Verdict>,
    pub sanitized: Option<CodeSample>,
    pub defense: Option<DefenseResult>,
    pub failure: Option<StageFailure>,
}

impl IterationRecord {
    pub fn started(id: u64) -> Self {
        Self {
            id,
            timestamp: Utc::now(),
            original: None,
            outcome: None,
            verdict: None,
            sanitized: None,
            defense: None,
            failure: None,
        }
    }

    /// Marks the iteration as stopped at `stage` and returns it for
    /// recording.
    pub fn fail(mut self, stage: Stage, reason: impl Into<String>) -> Self {
        self.failure = Some(StageFailure {
            stage,
            reason: reason.into(),
        });
        self
    }

    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// One defense evaluation replayed against a recorded original, as
/// produced by the `defend` flow. One JSONL line each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefenseRecord {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub original: CodeSample,
    pub sanitized: Option<CodeSample>,
    pub defense: Option<DefenseResult>,
    pub sanitized_outcome: Option<ExecutionOutcome>,
    pub sanitized_verdict: Option<Verdict>,
    pub failure: Option<StageFailure>,
}

impl DefenseRecord {
    pub fn started(original: CodeSample) -> Self {
        Self {
            id: original.id,
            timestamp: Utc::now(),
            original,
            sanitized: None,
            defense: None,
            sanitized_outcome: None,
            sanitized_verdict: None,
            failure: None,
        }
    }
}

/// Append-only log of iteration records, ordered by sequence id.
///
/// Appends may arrive from parallel iterations in any completion order;
/// ids are assigned at iteration start, so snapshots are reproducible
/// however completion interleaves.
#[derive(Debug, Default)]
pub struct RecordLog {
    inner: Mutex<BTreeMap<u64, IterationRecord>>,
}

impl RecordLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one record. Ids are append-once: a duplicate is dropped
    /// with a warning and the first record stands.
    pub fn append(&self, record: IterationRecord) {
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if inner.contains_key(&record.id) {
            warn!("record log: dropping duplicate append for id {}", record.id);
            return;
        }
        inner.insert(record.id, record);
    }

    /// All records so far, in id order.
    pub fn snapshot(&self) -> Vec<IterationRecord> {
        let inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Aggregates over a run, recomputable from the record log alone.
///
/// There are deliberately no live counters anywhere in the pipeline:
/// statistics are always a fold over the records, so they cannot drift
/// from what was recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub iterations: usize,
    pub completed: usize,
    pub verdicts: BTreeMap<Verdict, usize>,
    pub defense_evaluated: usize,
    pub defense_successes: usize,
    pub mean_reduction_ratio: Option<f64>,
}

impl RunStats {
    pub fn from_records(records: &[IterationRecord]) -> Self {
        let mut stats = Self {
            iterations: records.len(),
            ..Self::default()
        };
        let mut ratio_sum = 0.0;
        let mut ratio_count = 0usize;

        for record in records {
            if record.is_complete() {
                stats.completed += 1;
            }
            if let Some(verdict) = record.verdict {
                *stats.verdicts.entry(verdict).or_insert(0) += 1;
            }
            if let Some(defense) = &record.defense {
                stats.defense_evaluated += 1;
                if defense.success {
                    stats.defense_successes += 1;
                }
                if let Some(ratio) = defense.reduction_ratio {
                    ratio_sum += ratio;
                    ratio_count += 1;
                }
            }
        }
        if ratio_count > 0 {
            stats.mean_reduction_ratio = Some(ratio_sum / ratio_count as f64);
        }
        stats
    }

    pub fn defense_success_rate(&self) -> Option<f64> {
        if self.defense_evaluated == 0 {
            None
        } else {
            Some(self.defense_successes as f64 / self.defense_evaluated as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::IndicatorSet;

    fn complete_record(id: u64, verdict: Verdict, reduction: f64, success: bool) -> IterationRecord {
        let mut original_indicators = IndicatorSet::new();
        if success {
            original_indicators.insert("socket".to_string());
        }
        let mut record = IterationRecord::started(id);
        record.verdict = Some(verdict);
        record.defense = Some(DefenseResult {
            original_indicators,
            sanitized_indicators: IndicatorSet::new(),
            success,
            original_size_chars: 100,
            sanitized_size_chars: 50,
            reduction_ratio: Some(reduction),
        });
        record
    }

    #[test]
    fn test_log_orders_by_id_not_completion() {
        let log = RecordLog::new();
        log.append(IterationRecord::started(3));
        log.append(IterationRecord::started(1));
        log.append(IterationRecord::started(2));
        let ids: Vec<u64> = log.snapshot().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_log_drops_duplicate_id() {
        let log = RecordLog::new();
        let first = IterationRecord::started(1).fail(Stage::Generate, "first");
        log.append(first.clone());
        log.append(IterationRecord::started(1));
        assert_eq!(log.len(), 1);
        assert_eq!(log.snapshot()[0], first);
    }

    #[test]
    fn test_concurrent_appends_keep_total_order() {
        let log = std::sync::Arc::new(RecordLog::new());
        let mut handles = Vec::new();
        for id in (1..=16u64).rev() {
            let log = log.clone();
            handles.push(std::thread::spawn(move || {
                log.append(IterationRecord::started(id));
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let ids: Vec<u64> = log.snapshot().iter().map(|r| r.id).collect();
        assert_eq!(ids, (1..=16).collect::<Vec<_>>());
    }

    #[test]
    fn test_stats_are_pure_reduction() {
        let records = vec![
            complete_record(1, Verdict::SeccompViolation, 0.5, true),
            complete_record(2, Verdict::NormalExit, 0.1, false),
            IterationRecord::started(3).fail(Stage::Generate, "no code"),
        ];
        let stats = RunStats::from_records(&records);
        assert_eq!(stats.iterations, 3);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.verdicts[&Verdict::SeccompViolation], 1);
        assert_eq!(stats.verdicts[&Verdict::NormalExit], 1);
        assert_eq!(stats.defense_evaluated, 2);
        assert_eq!(stats.defense_successes, 1);
        assert_eq!(stats.defense_success_rate(), Some(0.5));
        assert!((stats.mean_reduction_ratio.unwrap() - 0.3).abs() < 1e-9);

        // Recomputing from the same records yields the same aggregates.
        assert_eq!(RunStats::from_records(&records), stats);
    }

    #[test]
    fn test_stats_empty_log() {
        let stats = RunStats::from_records(&[]);
        assert_eq!(stats.iterations, 0);
        assert_eq!(stats.mean_reduction_ratio, None);
        assert_eq!(stats.defense_success_rate(), None);
    }

    #[test]
    fn test_failed_record_keeps_absent_fields_absent() {
        let record = IterationRecord::started(9).fail(Stage::Sanitize, "timeout");
        assert!(!record.is_complete());
        assert!(record.sanitized.is_none());
        assert!(record.defense.is_none());
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"defense\":null"));
        assert!(json.contains("\"sanitize\""));
    }

    #[test]
    fn test_record_serde_roundtrip() {
        let record = complete_record(5, Verdict::NetworkBlocked, 0.25, true);
        let json = serde_json::to_string(&record).unwrap();
        let parsed: IterationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
