//! The Session Pointer Store.
//!
//! Named, per-session references to the artifact currently in focus
//! ("active draft", "discussed entity"). Producers overwrite their own
//! pointers; the confirmation engine only reads them.

use std::sync::Arc;

use rusqlite::OptionalExtension;
use tracing::debug;

use greenlight_core::error::GreenlightError;
use greenlight_core::types::{SessionPointer, Timestamp};

use crate::db::Database;

/// SQLite-backed store for session pointers.
pub struct PointerStore {
    db: Arc<Database>,
}

impl PointerStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Look up a pointer by `(session_id, pointer_name)`.
    pub fn get(
        &self,
        session_id: &str,
        pointer_name: &str,
    ) -> Result<Option<SessionPointer>, GreenlightError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    "SELECT session_id, pointer_name, value, updated_at
                     FROM session_pointers
                     WHERE session_id = ?1 AND pointer_name = ?2",
                    rusqlite::params![session_id, pointer_name],
                    |row| {
                        Ok(SessionPointer {
                            session_id: row.get(0)?,
                            pointer_name: row.get(1)?,
                            value: row.get(2)?,
                            updated_at: Timestamp(row.get(3)?),
                        })
                    },
                )
                .optional()
                .map_err(|e| GreenlightError::Storage(e.to_string()))?;
            Ok(result)
        })
    }

    /// Write a pointer, overwriting any previous value for the name.
    ///
    /// Producer-side API: called by whichever component creates the
    /// referenced artifact, never by the confirmation engine itself.
    pub fn set(
        &self,
        session_id: &str,
        pointer_name: &str,
        value: &str,
    ) -> Result<(), GreenlightError> {
        let now = Timestamp::now();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO session_pointers (session_id, pointer_name, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (session_id, pointer_name)
                 DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![session_id, pointer_name, value, now.0],
            )
            .map_err(|e| GreenlightError::Storage(format!("Failed to set pointer: {}", e)))?;
            Ok(())
        })?;
        debug!(session_id, pointer_name, "Session pointer updated");
        Ok(())
    }
}
