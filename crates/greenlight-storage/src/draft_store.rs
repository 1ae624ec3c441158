//! Draft persistence for composite, revisable actions.
//!
//! A draft's revision strictly increases on every edit. The convergence
//! point re-reads the row by id at confirmation time, so the row in this
//! table is the only copy that matters.

use std::sync::Arc;

use rusqlite::OptionalExtension;
use tracing::info;
use uuid::Uuid;

use greenlight_core::error::GreenlightError;
use greenlight_core::types::{Draft, DraftStatus, Timestamp};

use crate::db::Database;

/// SQLite-backed store for drafts.
pub struct DraftStore {
    db: Arc<Database>,
}

impl DraftStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a new draft at revision 1.
    pub fn create(&self, content: &str) -> Result<Draft, GreenlightError> {
        let draft = Draft {
            draft_id: Uuid::new_v4(),
            revision: 1,
            content: content.to_string(),
            status: DraftStatus::Draft,
            updated_at: Timestamp::now(),
        };
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO drafts (draft_id, revision, content, status, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    draft.draft_id.to_string(),
                    draft.revision,
                    draft.content,
                    draft.status.to_string(),
                    draft.updated_at.0,
                ],
            )
            .map_err(|e| GreenlightError::Storage(format!("Failed to insert draft: {}", e)))?;
            Ok(())
        })?;
        Ok(draft)
    }

    /// Fetch the current revision of a draft.
    pub fn get(&self, draft_id: Uuid) -> Result<Option<Draft>, GreenlightError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    "SELECT draft_id, revision, content, status, updated_at
                     FROM drafts WHERE draft_id = ?1",
                    rusqlite::params![draft_id.to_string()],
                    |row| Ok(row_to_draft(row)),
                )
                .optional()
                .map_err(|e| GreenlightError::Storage(e.to_string()))?;
            match result {
                Some(draft) => Ok(Some(draft?)),
                None => Ok(None),
            }
        })
    }

    /// Replace a draft's content, bumping the revision.
    ///
    /// Returns `false` if the draft does not exist or is already `sent`;
    /// sent drafts are immutable.
    pub fn update_content(&self, draft_id: Uuid, content: &str) -> Result<bool, GreenlightError> {
        let now = Timestamp::now();
        let rows = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE drafts
                 SET content = ?2, revision = revision + 1, updated_at = ?3
                 WHERE draft_id = ?1 AND status = 'draft'",
                rusqlite::params![draft_id.to_string(), content, now.0],
            )
            .map_err(|e| GreenlightError::Storage(format!("Failed to update draft: {}", e)))
        })?;
        Ok(rows == 1)
    }

    /// Mark a draft `sent`.
    ///
    /// Conditional on it still being `draft`: returns `true` only for the
    /// call that performed the flip, so double-sends are detectable at the
    /// draft level too.
    pub fn mark_sent(&self, draft_id: Uuid) -> Result<bool, GreenlightError> {
        let now = Timestamp::now();
        let rows = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE drafts SET status = 'sent', updated_at = ?2
                 WHERE draft_id = ?1 AND status = 'draft'",
                rusqlite::params![draft_id.to_string(), now.0],
            )
            .map_err(|e| GreenlightError::Storage(format!("Failed to mark sent: {}", e)))
        })?;
        if rows == 1 {
            info!(draft_id = %draft_id, "Draft marked sent");
        }
        Ok(rows == 1)
    }
}

fn row_to_draft(row: &rusqlite::Row<'_>) -> Result<Draft, GreenlightError> {
    let storage = |e: rusqlite::Error| GreenlightError::Storage(e.to_string());

    let draft_id: String = row.get(0).map_err(storage)?;
    let revision: i64 = row.get(1).map_err(storage)?;
    let content: String = row.get(2).map_err(storage)?;
    let status_str: String = row.get(3).map_err(storage)?;
    let updated_at: i64 = row.get(4).map_err(storage)?;

    Ok(Draft {
        draft_id: Uuid::parse_str(&draft_id)
            .map_err(|e| GreenlightError::Storage(format!("Bad draft_id: {}", e)))?,
        revision,
        content,
        status: status_str.parse().map_err(GreenlightError::Storage)?,
        updated_at: Timestamp(updated_at),
    })
}
