//! The Context Resolution Gate.
//!
//! Fills required arguments the planner omitted by consulting session
//! pointers, in declared priority order. An argument the caller already
//! supplied is never overwritten; that is an invariant, not a heuristic.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use greenlight_core::config::EngineConfig;
use greenlight_core::error::GreenlightError;

use greenlight_storage::PointerStore;

/// Errors from context resolution.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// No pointer source yielded a value for a required field. Carries an
    /// actionable hint; callers must not execute with the field missing.
    #[error("Missing context for '{field}' on {action}: {hint}")]
    MissingContext {
        action: String,
        field: String,
        hint: String,
    },
    #[error("Storage error: {0}")]
    Storage(#[from] GreenlightError),
}

/// One required field of an allowlisted action: the ordered pointer sources
/// to try and the hint surfaced when none of them yields a value.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub field: String,
    /// Pointer names in priority order; the first value found wins.
    pub sources: Vec<String>,
    pub missing_hint: String,
}

impl FieldRule {
    pub fn new(field: &str, sources: &[&str], missing_hint: &str) -> Self {
        Self {
            field: field.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            missing_hint: missing_hint.to_string(),
        }
    }
}

/// A single injection performed by the gate, logged and surfaced for
/// observability.
#[derive(Debug, Clone)]
pub struct Injection {
    pub field: String,
    pub value: String,
    pub source_pointer: String,
}

/// The resolved argument map plus the injections that produced it.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub args: serde_json::Value,
    pub injected: Vec<Injection>,
}

/// Gate that resolves omitted arguments from session pointers.
///
/// Reads pointers only; never writes them. Actions without rules pass
/// through unchanged.
pub struct ContextGate {
    pointers: Arc<PointerStore>,
    rules: HashMap<String, Vec<FieldRule>>,
    pointer_max_age_seconds: Option<u64>,
}

impl ContextGate {
    pub fn new(pointers: Arc<PointerStore>, config: &EngineConfig) -> Self {
        Self {
            pointers,
            rules: HashMap::new(),
            pointer_max_age_seconds: config.pointer_max_age_seconds,
        }
    }

    /// Add a resolution rule for an action's required field.
    pub fn allow(&mut self, action_name: &str, rule: FieldRule) {
        self.rules
            .entry(action_name.to_string())
            .or_default()
            .push(rule);
    }

    /// Resolve omitted arguments for an action.
    ///
    /// Non-object argument payloads and actions without rules pass through
    /// unchanged. For each required field that is missing or empty, pointer
    /// sources are tried in priority order; the first value found wins. A
    /// field with an explicit non-empty value is left untouched regardless
    /// of pointer state.
    pub fn resolve(
        &self,
        action_name: &str,
        args: serde_json::Value,
        session_id: &str,
    ) -> Result<Resolution, ResolveError> {
        let rules = match self.rules.get(action_name) {
            Some(rules) => rules,
            None => {
                return Ok(Resolution {
                    args,
                    injected: Vec::new(),
                })
            }
        };

        let mut map = match args {
            serde_json::Value::Object(map) => map,
            other => {
                return Ok(Resolution {
                    args: other,
                    injected: Vec::new(),
                })
            }
        };

        let mut injected = Vec::new();
        for rule in rules {
            if has_explicit_value(&map, &rule.field) {
                continue;
            }

            let mut found = None;
            for source in &rule.sources {
                if let Some(pointer) = self.pointers.get(session_id, source)? {
                    if let Some(max_age) = self.pointer_max_age_seconds {
                        if pointer.updated_at.age_seconds() > max_age as i64 {
                            warn!(
                                session_id,
                                pointer_name = %source,
                                "Skipping stale session pointer"
                            );
                            continue;
                        }
                    }
                    found = Some((source.clone(), pointer.value));
                    break;
                }
            }

            match found {
                Some((source, value)) => {
                    info!(
                        action = %action_name,
                        field = %rule.field,
                        value = %value,
                        source_pointer = %source,
                        "Injected argument from session pointer"
                    );
                    map.insert(
                        rule.field.clone(),
                        serde_json::Value::String(value.clone()),
                    );
                    injected.push(Injection {
                        field: rule.field.clone(),
                        value,
                        source_pointer: source,
                    });
                }
                None => {
                    return Err(ResolveError::MissingContext {
                        action: action_name.to_string(),
                        field: rule.field.clone(),
                        hint: rule.missing_hint.clone(),
                    });
                }
            }
        }

        Ok(Resolution {
            args: serde_json::Value::Object(map),
            injected,
        })
    }
}

/// Present with a non-empty value. Null, empty string, and absent all count
/// as "omitted" and are eligible for injection.
fn has_explicit_value(map: &serde_json::Map<String, serde_json::Value>, field: &str) -> bool {
    match map.get(field) {
        None | Some(serde_json::Value::Null) => false,
        Some(serde_json::Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenlight_storage::Database;

    fn gate_with_rules() -> (ContextGate, Arc<PointerStore>) {
        let db = Arc::new(Database::in_memory().unwrap());
        let pointers = Arc::new(PointerStore::new(db));
        let mut gate = ContextGate::new(Arc::clone(&pointers), &EngineConfig::default());
        gate.allow(
            "send_message",
            FieldRule::new(
                "draft_id",
                &["active_draft", "last_draft"],
                "no active draft; compose one first",
            ),
        );
        (gate, pointers)
    }

    #[test]
    fn test_unlisted_action_passes_through() {
        let (gate, _) = gate_with_rules();
        let args = serde_json::json!({"anything": "goes"});
        let resolution = gate
            .resolve("unknown_action", args.clone(), "s1")
            .unwrap();
        assert_eq!(resolution.args, args);
        assert!(resolution.injected.is_empty());
    }

    #[test]
    fn test_injects_missing_field_from_pointer() {
        let (gate, pointers) = gate_with_rules();
        pointers.set("s1", "active_draft", "draft-42").unwrap();

        let resolution = gate
            .resolve("send_message", serde_json::json!({}), "s1")
            .unwrap();
        assert_eq!(resolution.args["draft_id"], "draft-42");
        assert_eq!(resolution.injected.len(), 1);
        assert_eq!(resolution.injected[0].field, "draft_id");
        assert_eq!(resolution.injected[0].source_pointer, "active_draft");
    }

    #[test]
    fn test_explicit_value_never_overwritten() {
        let (gate, pointers) = gate_with_rules();
        pointers.set("s1", "active_draft", "A").unwrap();

        let resolution = gate
            .resolve("send_message", serde_json::json!({"draft_id": "B"}), "s1")
            .unwrap();
        assert_eq!(resolution.args["draft_id"], "B");
        assert!(resolution.injected.is_empty());
    }

    #[test]
    fn test_empty_string_counts_as_omitted() {
        let (gate, pointers) = gate_with_rules();
        pointers.set("s1", "active_draft", "draft-42").unwrap();

        let resolution = gate
            .resolve("send_message", serde_json::json!({"draft_id": ""}), "s1")
            .unwrap();
        assert_eq!(resolution.args["draft_id"], "draft-42");
    }

    #[test]
    fn test_null_counts_as_omitted() {
        let (gate, pointers) = gate_with_rules();
        pointers.set("s1", "active_draft", "draft-42").unwrap();

        let resolution = gate
            .resolve("send_message", serde_json::json!({"draft_id": null}), "s1")
            .unwrap();
        assert_eq!(resolution.args["draft_id"], "draft-42");
    }

    #[test]
    fn test_source_priority_order() {
        let (gate, pointers) = gate_with_rules();
        pointers.set("s1", "active_draft", "primary").unwrap();
        pointers.set("s1", "last_draft", "fallback").unwrap();

        let resolution = gate
            .resolve("send_message", serde_json::json!({}), "s1")
            .unwrap();
        assert_eq!(resolution.args["draft_id"], "primary");
    }

    #[test]
    fn test_falls_back_to_secondary_source() {
        let (gate, pointers) = gate_with_rules();
        pointers.set("s1", "last_draft", "fallback").unwrap();

        let resolution = gate
            .resolve("send_message", serde_json::json!({}), "s1")
            .unwrap();
        assert_eq!(resolution.args["draft_id"], "fallback");
        assert_eq!(resolution.injected[0].source_pointer, "last_draft");
    }

    #[test]
    fn test_missing_context_error_is_actionable() {
        let (gate, _) = gate_with_rules();
        let err = gate
            .resolve("send_message", serde_json::json!({}), "s1")
            .unwrap_err();
        match err {
            ResolveError::MissingContext { action, field, hint } => {
                assert_eq!(action, "send_message");
                assert_eq!(field, "draft_id");
                assert!(hint.contains("compose one first"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_other_session_pointers_ignored() {
        let (gate, pointers) = gate_with_rules();
        pointers.set("s2", "active_draft", "other").unwrap();

        let err = gate.resolve("send_message", serde_json::json!({}), "s1");
        assert!(err.is_err());
    }

    #[test]
    fn test_stale_pointer_skipped() {
        let db = Arc::new(Database::in_memory().unwrap());
        let pointers = Arc::new(PointerStore::new(Arc::clone(&db)));
        let mut config = EngineConfig::default();
        config.pointer_max_age_seconds = Some(60);
        let mut gate = ContextGate::new(Arc::clone(&pointers), &config);
        gate.allow(
            "send_message",
            FieldRule::new("draft_id", &["active_draft"], "no active draft"),
        );

        pointers.set("s1", "active_draft", "stale").unwrap();
        // Age the pointer past the cutoff.
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE session_pointers SET updated_at = updated_at - 3600",
                [],
            )
            .map_err(|e| GreenlightError::Storage(e.to_string()))?;
            Ok(())
        })
        .unwrap();

        let err = gate.resolve("send_message", serde_json::json!({}), "s1");
        assert!(matches!(err, Err(ResolveError::MissingContext { .. })));
    }

    #[test]
    fn test_non_object_args_pass_through() {
        let (gate, _) = gate_with_rules();
        let resolution = gate
            .resolve("send_message", serde_json::json!("raw"), "s1")
            .unwrap();
        assert_eq!(resolution.args, serde_json::json!("raw"));
    }
}
