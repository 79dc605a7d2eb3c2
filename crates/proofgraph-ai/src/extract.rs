//! Defensive handling of raw LLM responses.
//!
//! The raw text is screened for secret leaks and injection markers *before*
//! any parsing, because raw output may reach logs and telemetry regardless
//! of what the parsed JSON contains. Parsing failures become `Schema`
//! violations so every rejection path shares one reporting shape.

use std::env;

use proofgraph_core::{CriticViolation, ParentSummary, ViolationKind};

use crate::sanitize::{find_injection_markers, find_secret_leaks};

/// Values of environment variables whose names look sensitive. Short values
/// are skipped as likely false positives.
pub fn env_secret_values(min_len: usize) -> Vec<String> {
    const SENSITIVE_NAME_PARTS: &[&str] = &["SECRET", "TOKEN", "API_KEY", "APIKEY", "PASSWORD", "CREDENTIAL"];
    env::vars()
        .filter(|(name, value)| {
            let upper = name.to_uppercase();
            value.len() >= min_len && SENSITIVE_NAME_PARTS.iter().any(|part| upper.contains(part))
        })
        .map(|(_, value)| value)
        .collect()
}

/// Screens raw response text. A leak here is a hard failure regardless of
/// what the parsed summary contains.
pub fn screen_raw_response(raw: &str, min_secret_value_len: usize) -> Vec<CriticViolation> {
    let mut violations = Vec::new();

    for name in find_secret_leaks(raw) {
        violations.push(CriticViolation::new(
            ViolationKind::SecretLeak,
            format!("raw response matches secret pattern: {}", name),
        ));
    }
    for name in find_injection_markers(raw) {
        violations.push(CriticViolation::new(
            ViolationKind::PromptInjection,
            format!("raw response matches injection pattern: {}", name),
        ));
    }
    for value in env_secret_values(min_secret_value_len) {
        if raw.contains(&value) {
            violations.push(CriticViolation::new(
                ViolationKind::SecretLeak,
                "raw response contains a configured secret value",
            ));
        }
    }

    violations
}

/// Finds the first complete top-level JSON object in `raw`, tolerating
/// code fences and trailing commentary. Brace/string-aware so braces inside
/// string literals do not confuse the scan.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let bytes = raw.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses a `ParentSummary` candidate out of raw model output. All failure
/// modes are reported as a `Schema` violation, never a panic or an ad hoc
/// error deep in parsing.
pub fn parse_parent_summary(raw: &str) -> Result<ParentSummary, CriticViolation> {
    let json = extract_json_object(raw).ok_or_else(|| {
        CriticViolation::new(
            ViolationKind::Schema,
            "response contains no complete JSON object",
        )
    })?;
    serde_json::from_str(json).map_err(|e| {
        CriticViolation::new(ViolationKind::Schema, format!("malformed summary JSON: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_from_code_fence() {
        let raw = "Here you go:\n```json\n{\"parent_statement\": \"x\"}\n```\nHope that helps!";
        assert_eq!(extract_json_object(raw), Some("{\"parent_statement\": \"x\"}"));
    }

    #[test]
    fn braces_inside_strings_do_not_truncate() {
        let raw = r#"{"a": "left { brace", "b": {"c": 1}} trailing"#;
        assert_eq!(
            extract_json_object(raw),
            Some(r#"{"a": "left { brace", "b": {"c": 1}}"#)
        );
    }

    #[test]
    fn unterminated_object_yields_none() {
        assert_eq!(extract_json_object(r#"{"a": 1"#), None);
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn parse_reports_schema_violation_on_garbage() {
        let violation = parse_parent_summary("not json at all").unwrap_err();
        assert_eq!(violation.kind, ViolationKind::Schema);

        let violation = parse_parent_summary(r#"{"parent_statement": 42}"#).unwrap_err();
        assert_eq!(violation.kind, ViolationKind::Schema);
    }

    #[test]
    fn parse_accepts_valid_summary() {
        let raw = r#"{
            "parent_statement": "Both lemmas hold.",
            "why_true_from_children": "Each child states one of them.",
            "new_terms_introduced": [],
            "complexity_score": 3,
            "abstraction_score": 3,
            "evidence_refs": ["l1", "l2"],
            "confidence": 0.9
        }"#;
        let summary = parse_parent_summary(raw).unwrap();
        assert_eq!(summary.evidence_refs, vec!["l1", "l2"]);
        assert_eq!(summary.complexity_score, 3.0);
    }

    #[test]
    fn raw_screening_flags_secret_leak() {
        let violations = screen_raw_response("the key is sk-abcdefghijklmnopqrst", 8);
        assert!(violations
            .iter()
            .any(|v| v.kind == ViolationKind::SecretLeak));
    }

    #[test]
    fn raw_screening_flags_configured_env_secret() {
        env::set_var("PROOFGRAPH_TEST_API_KEY", "supercalifragilistic-value");
        let violations =
            screen_raw_response("leaking supercalifragilistic-value here", 8);
        env::remove_var("PROOFGRAPH_TEST_API_KEY");
        assert!(violations
            .iter()
            .any(|v| v.kind == ViolationKind::SecretLeak));
    }

    #[test]
    fn short_env_values_are_ignored() {
        env::set_var("PROOFGRAPH_TEST_TOKEN_SHORT", "abc");
        let violations = screen_raw_response("abc appears everywhere", 8);
        env::remove_var("PROOFGRAPH_TEST_TOKEN_SHORT");
        assert!(violations.is_empty());
    }
}
