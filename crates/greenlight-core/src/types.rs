//! Core types and value objects for the confirmation engine.
//!
//! Defines pending intents, session pointers, drafts, and their supporting
//! enumerations, plus the payload hashing and preview truncation helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// =============================================================================
// Timestamps
// =============================================================================

/// Unix-seconds timestamp.
///
/// Compared by value. Two Timestamps with the same inner value are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }

    /// Seconds elapsed since this timestamp (negative if in the future).
    pub fn age_seconds(&self) -> i64 {
        Timestamp::now().0 - self.0
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Lifecycle states of a pending intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Pending,
    Executing,
    Executed,
    Cancelled,
    Expired,
    Superseded,
}

impl IntentStatus {
    /// Terminal states never leave once entered; `normalized_args` is frozen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IntentStatus::Executed
                | IntentStatus::Cancelled
                | IntentStatus::Expired
                | IntentStatus::Superseded
        )
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentStatus::Pending => write!(f, "pending"),
            IntentStatus::Executing => write!(f, "executing"),
            IntentStatus::Executed => write!(f, "executed"),
            IntentStatus::Cancelled => write!(f, "cancelled"),
            IntentStatus::Expired => write!(f, "expired"),
            IntentStatus::Superseded => write!(f, "superseded"),
        }
    }
}

impl std::str::FromStr for IntentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IntentStatus::Pending),
            "executing" => Ok(IntentStatus::Executing),
            "executed" => Ok(IntentStatus::Executed),
            "cancelled" => Ok(IntentStatus::Cancelled),
            "expired" => Ok(IntentStatus::Expired),
            "superseded" => Ok(IntentStatus::Superseded),
            _ => Err(format!("Unknown intent status: {}", s)),
        }
    }
}

/// Lifecycle states of a revisable draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Draft,
    Sent,
}

impl fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DraftStatus::Draft => write!(f, "draft"),
            DraftStatus::Sent => write!(f, "sent"),
        }
    }
}

impl std::str::FromStr for DraftStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(DraftStatus::Draft),
            "sent" => Ok(DraftStatus::Sent),
            _ => Err(format!("Unknown draft status: {}", s)),
        }
    }
}

// =============================================================================
// Domain Structs
// =============================================================================

/// An action awaiting user confirmation.
///
/// `normalized_args` is the source of truth for execution; the preview
/// summary is a capped human-readable line, never the full payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingIntent {
    pub intent_id: Uuid,
    pub session_id: String,
    pub action_type: String,
    pub action_name: String,
    pub normalized_args: serde_json::Value,
    pub payload_hash: String,
    pub preview_summary: String,
    pub status: IntentStatus,
    pub created_at: Timestamp,
    pub claimed_at: Option<Timestamp>,
    pub expires_at: Timestamp,
    pub observations: String,
}

impl PendingIntent {
    /// Whether the TTL has lapsed relative to `now`.
    pub fn is_lapsed(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}

/// A named, per-session reference to the thing currently in focus.
///
/// Written by whichever producer creates the referenced artifact; the
/// engine only reads these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPointer {
    pub session_id: String,
    pub pointer_name: String,
    pub value: String,
    pub updated_at: Timestamp,
}

/// A revisable payload for composite actions (e.g. an outgoing message).
///
/// `revision` strictly increases on every edit. Execution must always
/// re-read the row by `draft_id`; a copy captured at preview time may be
/// stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub draft_id: Uuid,
    pub revision: i64,
    pub content: String,
    pub status: DraftStatus,
    pub updated_at: Timestamp,
}

/// Result reported by an external executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecOutcome {
    pub success: bool,
    pub detail: String,
}

// =============================================================================
// Helpers
// =============================================================================

/// Hash `(action_name, normalized_args)` into a stable hex digest.
///
/// Object keys are sorted recursively before hashing so that two argument
/// maps with the same contents produce the same hash regardless of
/// insertion order.
pub fn payload_hash(action_name: &str, args: &serde_json::Value) -> String {
    let canonical = canonicalize(args);
    let mut hasher = Sha256::new();
    hasher.update(action_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical.to_string().as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<&String, serde_json::Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            serde_json::Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), v))
                    .collect(),
            )
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize).collect())
        }
        other => other.clone(),
    }
}

/// Truncate a preview line to at most `max_chars` characters.
///
/// Cuts on a character boundary and appends an ellipsis when shortened.
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Timestamp ----

    #[test]
    fn test_timestamp_now_is_recent() {
        let ts = Timestamp::now();
        assert!(ts.age_seconds() >= 0);
        assert!(ts.age_seconds() < 5);
    }

    #[test]
    fn test_timestamp_datetime_round_trip() {
        let ts = Timestamp(1700000000);
        let rt = Timestamp::from_datetime(ts.to_datetime());
        assert_eq!(ts, rt);
    }

    #[test]
    fn test_timestamp_ordering() {
        assert!(Timestamp(100) < Timestamp(200));
        assert_eq!(Timestamp(100), Timestamp(100));
    }

    // ---- IntentStatus ----

    #[test]
    fn test_intent_status_display_from_str_round_trip() {
        for variant in [
            IntentStatus::Pending,
            IntentStatus::Executing,
            IntentStatus::Executed,
            IntentStatus::Cancelled,
            IntentStatus::Expired,
            IntentStatus::Superseded,
        ] {
            let s = variant.to_string();
            let parsed: IntentStatus = s.parse().unwrap();
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn test_intent_status_from_str_invalid() {
        let err = "bogus".parse::<IntentStatus>().unwrap_err();
        assert_eq!(err, "Unknown intent status: bogus");
        assert!("Pending".parse::<IntentStatus>().is_err());
        assert!("".parse::<IntentStatus>().is_err());
    }

    #[test]
    fn test_intent_status_serde_json_format() {
        assert_eq!(
            serde_json::to_string(&IntentStatus::Superseded).unwrap(),
            "\"superseded\""
        );
        assert_eq!(
            serde_json::to_string(&IntentStatus::Executing).unwrap(),
            "\"executing\""
        );
    }

    #[test]
    fn test_intent_status_terminal() {
        assert!(!IntentStatus::Pending.is_terminal());
        assert!(!IntentStatus::Executing.is_terminal());
        assert!(IntentStatus::Executed.is_terminal());
        assert!(IntentStatus::Cancelled.is_terminal());
        assert!(IntentStatus::Expired.is_terminal());
        assert!(IntentStatus::Superseded.is_terminal());
    }

    // ---- DraftStatus ----

    #[test]
    fn test_draft_status_round_trip() {
        for variant in [DraftStatus::Draft, DraftStatus::Sent] {
            let s = variant.to_string();
            let parsed: DraftStatus = s.parse().unwrap();
            assert_eq!(variant, parsed);
        }
        assert!("delivered".parse::<DraftStatus>().is_err());
    }

    // ---- PendingIntent ----

    #[test]
    fn test_pending_intent_serde_round_trip() {
        let intent = PendingIntent {
            intent_id: Uuid::new_v4(),
            session_id: "sess-1".to_string(),
            action_type: "message".to_string(),
            action_name: "send_message".to_string(),
            normalized_args: serde_json::json!({"draft_id": "abc"}),
            payload_hash: "deadbeef".to_string(),
            preview_summary: "Send message to Bob".to_string(),
            status: IntentStatus::Pending,
            created_at: Timestamp(1700000000),
            claimed_at: None,
            expires_at: Timestamp(1700007200),
            observations: String::new(),
        };
        let json = serde_json::to_string(&intent).unwrap();
        let rt: PendingIntent = serde_json::from_str(&json).unwrap();
        assert_eq!(intent.intent_id, rt.intent_id);
        assert_eq!(intent.payload_hash, rt.payload_hash);
        assert_eq!(intent.status, rt.status);
        assert!(rt.claimed_at.is_none());
    }

    #[test]
    fn test_pending_intent_is_lapsed() {
        let mut intent = PendingIntent {
            intent_id: Uuid::new_v4(),
            session_id: "s".to_string(),
            action_type: "t".to_string(),
            action_name: "a".to_string(),
            normalized_args: serde_json::json!({}),
            payload_hash: String::new(),
            preview_summary: String::new(),
            status: IntentStatus::Pending,
            created_at: Timestamp(1000),
            claimed_at: None,
            expires_at: Timestamp(2000),
            observations: String::new(),
        };
        assert!(!intent.is_lapsed(Timestamp(1999)));
        assert!(intent.is_lapsed(Timestamp(2000)));
        assert!(intent.is_lapsed(Timestamp(3000)));
        intent.expires_at = Timestamp(5000);
        assert!(!intent.is_lapsed(Timestamp(3000)));
    }

    // ---- payload_hash ----

    #[test]
    fn test_payload_hash_stable_across_key_order() {
        let a = serde_json::json!({"to": "bob", "subject": "hi"});
        let b = serde_json::json!({"subject": "hi", "to": "bob"});
        assert_eq!(payload_hash("send", &a), payload_hash("send", &b));
    }

    #[test]
    fn test_payload_hash_differs_by_action_name() {
        let args = serde_json::json!({"x": 1});
        assert_ne!(payload_hash("send", &args), payload_hash("file", &args));
    }

    #[test]
    fn test_payload_hash_differs_by_args() {
        let a = serde_json::json!({"x": 1});
        let b = serde_json::json!({"x": 2});
        assert_ne!(payload_hash("send", &a), payload_hash("send", &b));
    }

    #[test]
    fn test_payload_hash_nested_objects_canonicalized() {
        let a = serde_json::json!({"outer": {"b": 2, "a": 1}});
        let b = serde_json::json!({"outer": {"a": 1, "b": 2}});
        assert_eq!(payload_hash("send", &a), payload_hash("send", &b));
    }

    #[test]
    fn test_payload_hash_is_hex_sha256() {
        let h = payload_hash("send", &serde_json::json!({}));
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    // ---- truncate_preview ----

    #[test]
    fn test_truncate_preview_short_unchanged() {
        assert_eq!(truncate_preview("hello", 200), "hello");
    }

    #[test]
    fn test_truncate_preview_exact_length_unchanged() {
        let text = "a".repeat(200);
        assert_eq!(truncate_preview(&text, 200), text);
    }

    #[test]
    fn test_truncate_preview_long_capped_with_ellipsis() {
        let text = "a".repeat(500);
        let out = truncate_preview(&text, 200);
        assert_eq!(out.chars().count(), 200);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn test_truncate_preview_multibyte_safe() {
        let text = "é".repeat(300);
        let out = truncate_preview(&text, 200);
        assert_eq!(out.chars().count(), 200);
    }
}
