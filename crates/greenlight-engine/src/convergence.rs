//! The Action Convergence Point.
//!
//! Single execution path for actions whose payload is a revisable draft.
//! The draft row is re-read by id immediately before invoking the executor,
//! so the latest revision is always the one committed, no matter how many
//! edits happened between preview and confirmation. The draft's `sent`
//! marker is authoritative: an intent pointing at a sent draft is
//! reconciled to `executed` without invoking the executor again.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use greenlight_core::error::GreenlightError;
use greenlight_core::types::{DraftStatus, PendingIntent};

use greenlight_storage::{DraftStore, IntentStore};

use crate::executor::Executor;
use crate::types::ConfirmOutcome;

/// Executes draft-backed intents against the latest draft revision.
pub struct DraftConvergence {
    drafts: Arc<DraftStore>,
    intents: Arc<IntentStore>,
}

impl DraftConvergence {
    pub fn new(drafts: Arc<DraftStore>, intents: Arc<IntentStore>) -> Self {
        Self { drafts, intents }
    }

    /// Execute a claimed draft-backed intent.
    ///
    /// The caller has already won the claim; this path decides between
    /// idempotent success (draft already sent), execution with the latest
    /// revision, and failure (intent left `executing` for the reaper).
    pub async fn execute(
        &self,
        intent: &PendingIntent,
        executor: &Arc<dyn Executor>,
    ) -> Result<ConfirmOutcome, GreenlightError> {
        let draft_id = match draft_id_from_args(&intent.normalized_args) {
            Some(id) => id,
            None => {
                return Ok(ConfirmOutcome::ExecutionFailed {
                    intent_id: intent.intent_id,
                    detail: "action payload carries no draft reference".to_string(),
                })
            }
        };

        let draft = match self.drafts.get(draft_id)? {
            Some(draft) => draft,
            None => {
                return Ok(ConfirmOutcome::ExecutionFailed {
                    intent_id: intent.intent_id,
                    detail: format!("draft {} no longer exists", draft_id),
                })
            }
        };

        if draft.status == DraftStatus::Sent {
            // The same draft can be reachable through more than one intent
            // path; reconcile this intent against the authoritative marker.
            self.intents
                .mark_executed(intent.intent_id, "reconciled: draft already sent")?;
            info!(intent_id = %intent.intent_id, draft_id = %draft_id, "Draft already sent");
            return Ok(ConfirmOutcome::AlreadyCompleted {
                intent_id: intent.intent_id,
            });
        }

        // Hand the executor the latest revision, not whatever copy existed
        // at preview time.
        let mut exec_args = intent.normalized_args.clone();
        if let serde_json::Value::Object(ref mut map) = exec_args {
            map.insert(
                "content".to_string(),
                serde_json::Value::String(draft.content.clone()),
            );
            map.insert(
                "revision".to_string(),
                serde_json::Value::Number(draft.revision.into()),
            );
        }

        let outcome = match executor.execute(&exec_args).await {
            Ok(outcome) if outcome.success => outcome,
            Ok(outcome) => {
                warn!(
                    intent_id = %intent.intent_id,
                    detail = %outcome.detail,
                    "Draft executor reported failure"
                );
                return Ok(ConfirmOutcome::ExecutionFailed {
                    intent_id: intent.intent_id,
                    detail: outcome.detail,
                });
            }
            Err(e) => {
                warn!(intent_id = %intent.intent_id, error = %e, "Draft executor errored");
                return Ok(ConfirmOutcome::ExecutionFailed {
                    intent_id: intent.intent_id,
                    detail: e.to_string(),
                });
            }
        };

        // Draft first: its marker is the authoritative record of the send.
        // If these two writes cannot both land, the intent is reconciled
        // against the draft on the next confirmation attempt.
        if !self.drafts.mark_sent(draft_id)? {
            // Another path flipped the draft between our read and this
            // write; the executor may have run twice for this draft.
            warn!(
                intent_id = %intent.intent_id,
                draft_id = %draft_id,
                "Draft was already marked sent by a concurrent path"
            );
        }
        if let Err(e) = self
            .intents
            .mark_executed(intent.intent_id, &format!("sent revision {}", draft.revision))
        {
            warn!(
                intent_id = %intent.intent_id,
                error = %e,
                "Intent mark failed after draft send; reaper will reconcile"
            );
        }

        Ok(ConfirmOutcome::Executed {
            intent_id: intent.intent_id,
            detail: outcome.detail,
        })
    }
}

fn draft_id_from_args(args: &serde_json::Value) -> Option<Uuid> {
    args.get("draft_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}
