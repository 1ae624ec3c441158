//! The Confirmation/Execution Coordinator.
//!
//! Stages previews and drives the confirmation pipeline: lookup,
//! disambiguation, terminal-state echo, atomic claim, execution, and the
//! terminal mark. The claim is the sole guard against double-send under
//! concurrent confirmations; everything after it runs at most once.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use greenlight_core::error::GreenlightError;
use greenlight_core::types::{IntentStatus, PendingIntent};

use greenlight_storage::{IntentStore, IntentStoreError};

use crate::convergence::DraftConvergence;
use crate::executor::ExecutorRegistry;
use crate::resolve::{ContextGate, ResolveError, Resolution};
use crate::types::{CancelOutcome, Candidate, ConfirmOutcome, Preview, Selection};

/// Errors from staging a preview.
///
/// Unlike confirmation outcomes, these abort the preview: an intent must
/// never be perceived as pending while absent from storage.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("No executor registered for action: {0}")]
    UnknownAction(String),
    #[error("Missing context for '{field}': {hint}")]
    MissingContext { field: String, hint: String },
    #[error("An identical action is already executing; wait for it to finish")]
    DuplicateInFlight,
    #[error("Storage error: {0}")]
    Storage(#[from] GreenlightError),
}

impl From<IntentStoreError> for StageError {
    fn from(err: IntentStoreError) -> Self {
        match err {
            IntentStoreError::DuplicateInFlight => StageError::DuplicateInFlight,
            IntentStoreError::Storage(e) => StageError::Storage(e),
        }
    }
}

/// Coordinates the preview/confirm/cancel surface of the engine.
pub struct Coordinator {
    intents: Arc<IntentStore>,
    gate: ContextGate,
    registry: ExecutorRegistry,
    convergence: DraftConvergence,
}

impl Coordinator {
    pub fn new(
        intents: Arc<IntentStore>,
        gate: ContextGate,
        registry: ExecutorRegistry,
        convergence: DraftConvergence,
    ) -> Self {
        Self {
            intents,
            gate,
            registry,
            convergence,
        }
    }

    /// Stage an action for confirmation.
    ///
    /// Resolves omitted arguments through the context gate, records the
    /// intent, and returns the preview surface. If the gate fails
    /// unexpectedly (storage trouble), staging falls back to the
    /// caller-supplied arguments and lets the executor raise the domain
    /// error later; a structured missing-context result aborts instead.
    pub fn stage(
        &self,
        action_name: &str,
        args: serde_json::Value,
        session_id: &str,
    ) -> Result<Preview, StageError> {
        let executor = self
            .registry
            .get(action_name)
            .ok_or_else(|| StageError::UnknownAction(action_name.to_string()))?;

        let resolution = match self.gate.resolve(action_name, args.clone(), session_id) {
            Ok(resolution) => resolution,
            Err(ResolveError::MissingContext { field, hint, .. }) => {
                return Err(StageError::MissingContext { field, hint });
            }
            Err(ResolveError::Storage(e)) => {
                warn!(
                    action = %action_name,
                    error = %e,
                    "Context gate degraded; staging with caller-supplied arguments"
                );
                Resolution {
                    args,
                    injected: Vec::new(),
                }
            }
        };

        let summary = executor.describe(&resolution.args);
        let intent = self.intents.create(
            session_id,
            executor.category(),
            action_name,
            resolution.args,
            &summary,
        )?;

        info!(
            intent_id = %intent.intent_id,
            session_id,
            action = %action_name,
            "Staged intent awaiting confirmation"
        );
        Ok(Preview {
            intent_id: intent.intent_id,
            summary: intent.preview_summary,
            injected: resolution.injected,
        })
    }

    /// Handle a confirmation signal for a session.
    ///
    /// `action_type` narrows the candidate set; `selection` resolves a
    /// prior disambiguation prompt. All expected paths return a
    /// `ConfirmOutcome`; only storage failures are errors.
    pub async fn confirm(
        &self,
        session_id: &str,
        action_type: Option<&str>,
        selection: Option<Selection>,
    ) -> Result<ConfirmOutcome, GreenlightError> {
        let candidates = self.intents.list_pending(session_id, action_type)?;

        let target_id = match selection {
            Some(Selection::Id(id)) => id,
            Some(Selection::Index(index)) => {
                if index == 0 || index > candidates.len() {
                    return Ok(if candidates.is_empty() {
                        ConfirmOutcome::NothingPending
                    } else {
                        ConfirmOutcome::Ambiguous {
                            candidates: to_candidates(&candidates),
                        }
                    });
                }
                candidates[index - 1].intent_id
            }
            None => match candidates.len() {
                0 => return Ok(ConfirmOutcome::NothingPending),
                1 => candidates[0].intent_id,
                _ => {
                    return Ok(ConfirmOutcome::Ambiguous {
                        candidates: to_candidates(&candidates),
                    })
                }
            },
        };

        // Re-check terminal state: a confirmation for something already
        // decided is an echo, never a silent retry.
        let intent = match self.intents.get(target_id)? {
            Some(intent) => intent,
            None => return Ok(ConfirmOutcome::NothingPending),
        };
        // An id selector is only valid for the disambiguation surface it
        // came from: this session, and the type filter if one was given.
        if intent.session_id != session_id
            || action_type.map_or(false, |t| t != intent.action_type)
        {
            warn!(
                session_id,
                intent_id = %target_id,
                "Confirmation selector does not match this session's surface"
            );
            return Ok(ConfirmOutcome::NothingPending);
        }
        match intent.status {
            IntentStatus::Executed => {
                return Ok(ConfirmOutcome::AlreadyCompleted {
                    intent_id: target_id,
                })
            }
            IntentStatus::Cancelled | IntentStatus::Expired | IntentStatus::Superseded => {
                return Ok(ConfirmOutcome::Refused {
                    intent_id: target_id,
                    status: intent.status,
                })
            }
            IntentStatus::Executing => {
                return Ok(ConfirmOutcome::ClaimLost {
                    intent_id: target_id,
                })
            }
            IntentStatus::Pending => {}
        }

        if !self.intents.try_claim(target_id)? {
            // Lost the race, or the TTL lapsed between read and claim.
            let status = self.intents.get(target_id)?.map(|i| i.status);
            return Ok(match status {
                Some(IntentStatus::Executed) => ConfirmOutcome::AlreadyCompleted {
                    intent_id: target_id,
                },
                Some(status) if status.is_terminal() => ConfirmOutcome::Refused {
                    intent_id: target_id,
                    status,
                },
                _ => ConfirmOutcome::ClaimLost {
                    intent_id: target_id,
                },
            });
        }

        self.execute_claimed(&intent).await
    }

    /// Handle a cancellation signal: marks the matching pending intent(s)
    /// cancelled. Cancellation frees the payload hash, so the same action
    /// can be re-proposed immediately.
    pub fn cancel(
        &self,
        session_id: &str,
        action_type: Option<&str>,
        selection: Option<Selection>,
    ) -> Result<CancelOutcome, GreenlightError> {
        let candidates = self.intents.list_pending(session_id, action_type)?;

        let targets: Vec<Uuid> = match selection {
            // Only ids from this session's own pending surface are valid.
            Some(Selection::Id(id)) => candidates
                .iter()
                .filter(|c| c.intent_id == id)
                .map(|c| c.intent_id)
                .collect(),
            Some(Selection::Index(index)) => {
                if index == 0 || index > candidates.len() {
                    Vec::new()
                } else {
                    vec![candidates[index - 1].intent_id]
                }
            }
            None => candidates.iter().map(|c| c.intent_id).collect(),
        };

        let mut cancelled = Vec::new();
        for id in targets {
            if self.intents.mark_cancelled(id, "cancelled by user")? {
                cancelled.push(id);
            }
        }

        if cancelled.is_empty() {
            Ok(CancelOutcome::NothingPending)
        } else {
            info!(session_id, count = cancelled.len(), "Cancelled pending intents");
            Ok(CancelOutcome::Cancelled {
                intent_ids: cancelled,
            })
        }
    }

    /// Execute an intent this caller has just claimed.
    async fn execute_claimed(
        &self,
        intent: &PendingIntent,
    ) -> Result<ConfirmOutcome, GreenlightError> {
        let executor = match self.registry.get(&intent.action_name) {
            Some(executor) => executor,
            None => {
                // Claimed but unknown (e.g. registry changed across a
                // restart). Left executing; the reaper expires it.
                warn!(
                    intent_id = %intent.intent_id,
                    action = %intent.action_name,
                    "No executor registered for claimed intent"
                );
                return Ok(ConfirmOutcome::ExecutionFailed {
                    intent_id: intent.intent_id,
                    detail: format!("no executor registered for {}", intent.action_name),
                });
            }
        };

        if executor.draft_backed() {
            return self.convergence.execute(intent, &executor).await;
        }

        match executor.execute(&intent.normalized_args).await {
            Ok(outcome) if outcome.success => {
                if let Err(e) = self.intents.mark_executed(intent.intent_id, &outcome.detail) {
                    warn!(
                        intent_id = %intent.intent_id,
                        error = %e,
                        "Executed but terminal mark failed; reaper will recover"
                    );
                }
                info!(intent_id = %intent.intent_id, action = %intent.action_name, "Intent executed");
                Ok(ConfirmOutcome::Executed {
                    intent_id: intent.intent_id,
                    detail: outcome.detail,
                })
            }
            Ok(outcome) => {
                warn!(
                    intent_id = %intent.intent_id,
                    detail = %outcome.detail,
                    "Executor reported failure"
                );
                Ok(ConfirmOutcome::ExecutionFailed {
                    intent_id: intent.intent_id,
                    detail: outcome.detail,
                })
            }
            Err(e) => {
                warn!(intent_id = %intent.intent_id, error = %e, "Executor errored");
                Ok(ConfirmOutcome::ExecutionFailed {
                    intent_id: intent.intent_id,
                    detail: e.to_string(),
                })
            }
        }
    }
}

fn to_candidates(intents: &[PendingIntent]) -> Vec<Candidate> {
    intents
        .iter()
        .enumerate()
        .map(|(i, intent)| Candidate {
            index: i + 1,
            intent_id: intent.intent_id,
            preview_summary: intent.preview_summary.clone(),
        })
        .collect()
}
