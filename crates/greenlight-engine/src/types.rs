//! User-facing surfaces of the confirmation flow.
//!
//! Expected outcomes (nothing pending, ambiguity, lost claims, terminal
//! echoes) are values, not errors: they carry short actionable messages and
//! never abort the conversation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use greenlight_core::types::IntentStatus;

use crate::resolve::Injection;

/// Returned when an intent is created: what the caller renders to the user.
#[derive(Debug, Clone)]
pub struct Preview {
    pub intent_id: Uuid,
    pub summary: String,
    /// Fields the resolution gate filled in, for observability surfaces.
    pub injected: Vec<Injection>,
}

/// One entry in the disambiguation list. Creation-ordered and stable, so a
/// positional answer ("the second one") stays valid across prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// 1-based position in the stable listing.
    pub index: usize,
    pub intent_id: Uuid,
    pub preview_summary: String,
}

/// How a user picks one intent out of a disambiguation list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// 1-based index into the candidate list.
    Index(usize),
    Id(Uuid),
}

/// Result of a confirmation attempt.
#[derive(Debug, Clone)]
pub enum ConfirmOutcome {
    /// The executor ran and reported success.
    Executed { intent_id: Uuid, detail: String },
    /// The intent (or its draft) was already completed; idempotent echo,
    /// the executor was not invoked again.
    AlreadyCompleted { intent_id: Uuid },
    /// No pending intent matched the confirmation.
    NothingPending,
    /// More than one candidate; the user must pick one.
    Ambiguous { candidates: Vec<Candidate> },
    /// Another concurrent confirmation claimed the intent first.
    ClaimLost { intent_id: Uuid },
    /// The intent is cancelled or expired and cannot be executed.
    Refused {
        intent_id: Uuid,
        status: IntentStatus,
    },
    /// The executor reported failure; the action may be re-previewed.
    ExecutionFailed { intent_id: Uuid, detail: String },
}

impl ConfirmOutcome {
    /// Short actionable guidance for the user. Internal diagnostics
    /// (hashes, timestamps) are logged, never surfaced here.
    pub fn user_message(&self) -> String {
        match self {
            ConfirmOutcome::Executed { detail, .. } => {
                if detail.is_empty() {
                    "Done.".to_string()
                } else {
                    format!("Done: {}", detail)
                }
            }
            ConfirmOutcome::AlreadyCompleted { .. } => {
                "Already completed, no action taken.".to_string()
            }
            ConfirmOutcome::NothingPending => {
                "Nothing is waiting for confirmation. Generate a fresh preview first.".to_string()
            }
            ConfirmOutcome::Ambiguous { candidates } => {
                let mut lines = vec![format!(
                    "There are {} pending actions. Which one?",
                    candidates.len()
                )];
                for c in candidates {
                    lines.push(format!("  {}. {}", c.index, c.preview_summary));
                }
                lines.join("\n")
            }
            ConfirmOutcome::ClaimLost { .. } => {
                "That action is already in progress.".to_string()
            }
            ConfirmOutcome::Refused { status, .. } => match status {
                IntentStatus::Cancelled => {
                    "That action was cancelled. Generate a fresh preview to retry.".to_string()
                }
                IntentStatus::Expired => {
                    "That action expired before it was confirmed. Generate a fresh preview."
                        .to_string()
                }
                other => format!("That action is {} and cannot be confirmed.", other),
            },
            ConfirmOutcome::ExecutionFailed { detail, .. } => {
                format!(
                    "The action failed: {}. Generate a fresh preview to retry.",
                    detail
                )
            }
        }
    }
}

/// Result of a cancellation signal.
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    Cancelled { intent_ids: Vec<Uuid> },
    NothingPending,
}
