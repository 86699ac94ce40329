//! Extraction of code blocks from model responses.
//!
//! Models wrap code in markdown fences with varying discipline. Extraction
//! tries, in order: a ```python fence, a generic ``` fence, and finally the
//! raw response when it plausibly is code (contains `import ` or `def `).
//! Whatever survives is scrubbed of stray fence markers and language tags.

use std::sync::LazyLock;

use regex::Regex;

static PYTHON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```python\s*(.*?)\s*```").unwrap());
static ANY_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```\s*(.*?)\s*```").unwrap());

/// Pulls the first code block out of a model response.
///
/// Returns `None` when the response contains nothing that looks like code.
pub fn extract_code(response: &str) -> Option<String> {
    if response.is_empty() {
        return None;
    }

    let block = if let Some(caps) = PYTHON_FENCE.captures(response) {
        caps[1].to_string()
    } else if let Some(caps) = ANY_FENCE.captures(response) {
        caps[1].to_string()
    } else if response.contains("import ") || response.contains("def ") {
        response.to_string()
    } else {
        return None;
    };

    let code = scrub_markers(&block);
    if code.is_empty() { None } else { Some(code) }
}

/// Drops leftover fence lines and bare language tags, then trims stray
/// backticks from both ends.
fn scrub_markers(block: &str) -> String {
    let mut code = block
        .lines()
        .filter(|line| {
            let stripped = line.trim();
            if stripped.starts_with("```") {
                return false;
            }
            !matches!(stripped.to_lowercase().as_str(), "python" | "py" | "python3")
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    while code.starts_with('`') {
        code = code.trim_start_matches('`').trim().to_string();
    }
    while code.ends_with('`') {
        code = code.trim_end_matches('`').trim().to_string();
    }
    code
}
