//! The Pending Intent Store.
//!
//! One durable record per action awaiting confirmation, with a small status
//! state machine, payload-hash deduplication, TTL expiry, and an atomic
//! claim operation. All mutation goes through the conditional UPDATEs in
//! this module; no caller writes status fields directly.

use std::sync::Arc;

use rusqlite::OptionalExtension;
use tracing::{debug, info, warn};
use uuid::Uuid;

use greenlight_core::config::EngineConfig;
use greenlight_core::error::GreenlightError;
use greenlight_core::types::{
    payload_hash, truncate_preview, IntentStatus, PendingIntent, Timestamp,
};

use crate::db::Database;

/// Errors from intent creation and lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum IntentStoreError {
    /// An identical payload is already being executed for this session.
    /// The claim owner keeps exclusive right to finish; re-previewing the
    /// same action must wait for a terminal state.
    #[error("An identical action is already executing for this session")]
    DuplicateInFlight,
    #[error("Storage error: {0}")]
    Storage(#[from] GreenlightError),
}

/// SQLite-backed store for pending intents.
pub struct IntentStore {
    db: Arc<Database>,
    config: EngineConfig,
}

impl IntentStore {
    pub fn new(db: Arc<Database>, config: EngineConfig) -> Self {
        Self { db, config }
    }

    /// Record a new intent awaiting confirmation.
    ///
    /// Computes the payload hash, supersedes any identical `pending` sibling
    /// in the same transaction, truncates the preview summary, and derives
    /// `expires_at` from the per-action-type TTL policy. A storage error
    /// here is fatal to the preview flow and is surfaced to the caller.
    pub fn create(
        &self,
        session_id: &str,
        action_type: &str,
        action_name: &str,
        normalized_args: serde_json::Value,
        preview_summary: &str,
    ) -> Result<PendingIntent, IntentStoreError> {
        let hash = payload_hash(action_name, &normalized_args);
        let now = Timestamp::now();
        let ttl = self.config.ttl_for(action_type) as i64;
        let intent = PendingIntent {
            intent_id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            action_type: action_type.to_string(),
            action_name: action_name.to_string(),
            normalized_args,
            payload_hash: hash,
            preview_summary: truncate_preview(preview_summary, self.config.preview_max_chars),
            status: IntentStatus::Pending,
            created_at: now,
            claimed_at: None,
            expires_at: Timestamp(now.0 + ttl),
            observations: String::new(),
        };

        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| GreenlightError::Storage(format!("Failed to begin tx: {}", e)))?;

            let executing: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM pending_intents
                     WHERE session_id = ?1 AND payload_hash = ?2 AND status = 'executing'",
                    rusqlite::params![intent.session_id, intent.payload_hash],
                    |row| row.get(0),
                )
                .map_err(|e| GreenlightError::Storage(e.to_string()))?;
            if executing > 0 {
                // Surfaced below; roll back by dropping the transaction.
                return Ok(None);
            }

            let superseded = tx
                .execute(
                    "UPDATE pending_intents
                     SET status = 'superseded',
                         observations = 'superseded: identical preview re-created'
                     WHERE session_id = ?1 AND payload_hash = ?2 AND status = 'pending'",
                    rusqlite::params![intent.session_id, intent.payload_hash],
                )
                .map_err(|e| GreenlightError::Storage(format!("Failed to supersede: {}", e)))?;
            if superseded > 0 {
                info!(
                    session_id = %intent.session_id,
                    action_name = %intent.action_name,
                    count = superseded,
                    "Superseded older identical pending intent"
                );
            }

            tx.execute(
                "INSERT INTO pending_intents
                     (intent_id, session_id, action_type, action_name, normalized_args,
                      payload_hash, preview_summary, status, created_at, claimed_at,
                      expires_at, observations)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, ?10, '')",
                rusqlite::params![
                    intent.intent_id.to_string(),
                    intent.session_id,
                    intent.action_type,
                    intent.action_name,
                    intent.normalized_args.to_string(),
                    intent.payload_hash,
                    intent.preview_summary,
                    intent.status.to_string(),
                    intent.created_at.0,
                    intent.expires_at.0,
                ],
            )
            .map_err(|e| GreenlightError::Storage(format!("Failed to insert intent: {}", e)))?;

            tx.commit()
                .map_err(|e| GreenlightError::Storage(format!("Failed to commit: {}", e)))?;
            Ok(Some(()))
        })?
        .ok_or(IntentStoreError::DuplicateInFlight)?;

        debug!(intent_id = %intent.intent_id, session_id = %intent.session_id, "Intent created");
        Ok(intent)
    }

    /// Fetch an intent by id.
    ///
    /// A lapsed `pending` intent is flipped to `expired` before the row is
    /// returned, so callers never act on a logically expired intent even if
    /// the reaper has not yet run. A stuck `executing` row is left for
    /// `reap_stuck`, whose timeout governs execution recovery.
    pub fn get(&self, intent_id: Uuid) -> Result<Option<PendingIntent>, GreenlightError> {
        let now = Timestamp::now();
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE pending_intents
                 SET status = 'expired', observations = 'expired: confirmation ttl lapsed'
                 WHERE intent_id = ?1 AND status = 'pending' AND expires_at <= ?2",
                rusqlite::params![intent_id.to_string(), now.0],
            )
            .map_err(|e| GreenlightError::Storage(e.to_string()))?;

            let mut stmt = conn
                .prepare(&format!("{} WHERE intent_id = ?1", SELECT_INTENT))
                .map_err(|e| GreenlightError::Storage(e.to_string()))?;
            let result = stmt
                .query_row(rusqlite::params![intent_id.to_string()], |row| {
                    Ok(row_to_intent(row))
                })
                .optional()
                .map_err(|e| GreenlightError::Storage(e.to_string()))?;

            match result {
                Some(intent) => Ok(Some(intent?)),
                None => Ok(None),
            }
        })
    }

    /// List `pending` intents for a session in creation order, optionally
    /// filtered by action type.
    ///
    /// Lapsed rows are expired first, so the returned list is stable across
    /// repeated disambiguation prompts within the same unresolved state.
    pub fn list_pending(
        &self,
        session_id: &str,
        action_type: Option<&str>,
    ) -> Result<Vec<PendingIntent>, GreenlightError> {
        let now = Timestamp::now();
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE pending_intents
                 SET status = 'expired', observations = 'expired: confirmation ttl lapsed'
                 WHERE session_id = ?1 AND status = 'pending' AND expires_at <= ?2",
                rusqlite::params![session_id, now.0],
            )
            .map_err(|e| GreenlightError::Storage(e.to_string()))?;

            let sql = format!(
                "{} WHERE session_id = ?1 AND status = 'pending'
                   AND (?2 IS NULL OR action_type = ?2)
                 ORDER BY created_at ASC, intent_id ASC",
                SELECT_INTENT
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| GreenlightError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![session_id, action_type], |row| {
                    Ok(row_to_intent(row))
                })
                .map_err(|e| GreenlightError::Storage(e.to_string()))?;

            let mut intents = Vec::new();
            for row in rows {
                let intent = row.map_err(|e| GreenlightError::Storage(e.to_string()))??;
                intents.push(intent);
            }
            Ok(intents)
        })
    }

    /// Atomically claim an intent for execution.
    ///
    /// A single conditional UPDATE flips `pending` to `executing`; the
    /// affected-row count is the lock result. Returns `true` only if this
    /// call was the one that flipped the status. Among any number of
    /// concurrent confirmers, exactly one wins.
    pub fn try_claim(&self, intent_id: Uuid) -> Result<bool, GreenlightError> {
        let now = Timestamp::now();
        let rows = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE pending_intents
                 SET status = 'executing', claimed_at = ?2
                 WHERE intent_id = ?1 AND status = 'pending' AND expires_at > ?2",
                rusqlite::params![intent_id.to_string(), now.0],
            )
            .map_err(|e| GreenlightError::Storage(format!("Failed to claim: {}", e)))
        })?;
        if rows == 1 {
            info!(intent_id = %intent_id, "Intent claimed for execution");
        }
        Ok(rows == 1)
    }

    /// Mark a claimed intent as executed.
    ///
    /// Only valid from `executing`. Retries once on a storage error; if the
    /// retry also fails, the row is left `executing` for the reaper to
    /// eventually expire, and the error is returned.
    pub fn mark_executed(&self, intent_id: Uuid, note: &str) -> Result<bool, GreenlightError> {
        self.mark_from_executing(intent_id, IntentStatus::Executed, note)
    }

    /// Mark a pending intent as cancelled. Returns `false` if the intent
    /// was not `pending` (already claimed or terminal).
    pub fn mark_cancelled(&self, intent_id: Uuid, note: &str) -> Result<bool, GreenlightError> {
        let rows = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE pending_intents
                 SET status = 'cancelled', observations = ?2
                 WHERE intent_id = ?1 AND status = 'pending'",
                rusqlite::params![intent_id.to_string(), note],
            )
            .map_err(|e| GreenlightError::Storage(format!("Failed to cancel: {}", e)))
        })?;
        Ok(rows == 1)
    }

    /// Expire a claimed intent (used when an execution is known to be dead).
    pub fn mark_expired(&self, intent_id: Uuid, note: &str) -> Result<bool, GreenlightError> {
        self.mark_from_executing(intent_id, IntentStatus::Expired, note)
    }

    fn mark_from_executing(
        &self,
        intent_id: Uuid,
        status: IntentStatus,
        note: &str,
    ) -> Result<bool, GreenlightError> {
        let attempt = |note: &str| {
            self.db.with_conn(|conn| {
                conn.execute(
                    "UPDATE pending_intents
                     SET status = ?2, observations = ?3
                     WHERE intent_id = ?1 AND status = 'executing'",
                    rusqlite::params![intent_id.to_string(), status.to_string(), note],
                )
                .map_err(|e| GreenlightError::Storage(format!("Failed to mark {}: {}", status, e)))
            })
        };

        match attempt(note) {
            Ok(rows) => Ok(rows == 1),
            Err(first) => {
                warn!(intent_id = %intent_id, error = %first, "Terminal mark failed, retrying once");
                match attempt(note) {
                    Ok(rows) => Ok(rows == 1),
                    Err(second) => {
                        // Left as `executing`; the reaper expires it after the
                        // execution timeout, so there is always a path back to
                        // a terminal state.
                        warn!(intent_id = %intent_id, error = %second, "Terminal mark retry failed");
                        Err(second)
                    }
                }
            }
        }
    }

    /// Expire all lapsed `pending` intents. Idempotent; returns the number
    /// of rows transitioned.
    pub fn reap_expired(&self) -> Result<usize, GreenlightError> {
        let now = Timestamp::now();
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE pending_intents
                 SET status = 'expired', observations = 'expired: confirmation ttl lapsed'
                 WHERE status = 'pending' AND expires_at <= ?1",
                rusqlite::params![now.0],
            )
            .map_err(|e| GreenlightError::Storage(format!("Failed to reap expired: {}", e)))
        })
    }

    /// Recover intents stuck in `executing` past the given timeout.
    ///
    /// This is the crash-recovery path for a process that claimed an intent
    /// and died before completing it. Idempotent and safe to run
    /// concurrently; returns the number of rows transitioned.
    pub fn reap_stuck(&self, timeout_seconds: u64) -> Result<usize, GreenlightError> {
        let cutoff = Timestamp::now().0 - timeout_seconds as i64;
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE pending_intents
                 SET status = 'expired', observations = 'expired: execution timed out'
                 WHERE status = 'executing' AND claimed_at IS NOT NULL AND claimed_at <= ?1",
                rusqlite::params![cutoff],
            )
            .map_err(|e| GreenlightError::Storage(format!("Failed to reap stuck: {}", e)))
        })
    }
}

const SELECT_INTENT: &str = "SELECT intent_id, session_id, action_type, action_name, \
     normalized_args, payload_hash, preview_summary, status, created_at, claimed_at, \
     expires_at, observations FROM pending_intents";

fn row_to_intent(row: &rusqlite::Row<'_>) -> Result<PendingIntent, GreenlightError> {
    let storage = |e: rusqlite::Error| GreenlightError::Storage(e.to_string());

    let intent_id: String = row.get(0).map_err(storage)?;
    let session_id: String = row.get(1).map_err(storage)?;
    let action_type: String = row.get(2).map_err(storage)?;
    let action_name: String = row.get(3).map_err(storage)?;
    let args_json: String = row.get(4).map_err(storage)?;
    let hash: String = row.get(5).map_err(storage)?;
    let preview_summary: String = row.get(6).map_err(storage)?;
    let status_str: String = row.get(7).map_err(storage)?;
    let created_at: i64 = row.get(8).map_err(storage)?;
    let claimed_at: Option<i64> = row.get(9).map_err(storage)?;
    let expires_at: i64 = row.get(10).map_err(storage)?;
    let observations: String = row.get(11).map_err(storage)?;

    Ok(PendingIntent {
        intent_id: Uuid::parse_str(&intent_id)
            .map_err(|e| GreenlightError::Storage(format!("Bad intent_id: {}", e)))?,
        session_id,
        action_type,
        action_name,
        normalized_args: serde_json::from_str(&args_json)?,
        payload_hash: hash,
        preview_summary,
        status: status_str
            .parse()
            .map_err(GreenlightError::Storage)?,
        created_at: Timestamp(created_at),
        claimed_at: claimed_at.map(Timestamp),
        expires_at: Timestamp(expires_at),
        observations,
    })
}
