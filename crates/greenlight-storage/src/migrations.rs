//! Database schema migrations.
//!
//! Applies the initial schema: pending_intents, session_pointers, drafts,
//! and the schema_migrations tracking table.

use rusqlite::Connection;
use tracing::info;

use greenlight_core::error::GreenlightError;

/// Run all pending database migrations.
///
/// Currently implements the initial schema (version 1). Future migrations
/// can be added by checking the current version and applying incremental changes.
pub fn run_migrations(conn: &Connection) -> Result<(), GreenlightError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| GreenlightError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| GreenlightError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), GreenlightError> {
    conn.execute_batch(
        "
        -- One durable record per action awaiting confirmation.
        CREATE TABLE IF NOT EXISTS pending_intents (
            intent_id       TEXT PRIMARY KEY NOT NULL,
            session_id      TEXT NOT NULL,
            action_type     TEXT NOT NULL,
            action_name     TEXT NOT NULL,
            normalized_args TEXT NOT NULL DEFAULT '{}',
            payload_hash    TEXT NOT NULL,
            preview_summary TEXT NOT NULL DEFAULT '',
            status          TEXT NOT NULL DEFAULT 'pending'
                            CHECK (status IN ('pending', 'executing', 'executed',
                                              'cancelled', 'expired', 'superseded')),
            created_at      INTEGER NOT NULL,
            claimed_at      INTEGER,
            expires_at      INTEGER NOT NULL,
            observations    TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_intents_session_status
            ON pending_intents (session_id, status, created_at ASC);

        CREATE INDEX IF NOT EXISTS idx_intents_dedup
            ON pending_intents (session_id, payload_hash);

        CREATE INDEX IF NOT EXISTS idx_intents_expiry
            ON pending_intents (status, expires_at ASC);

        -- Named per-session references, written by artifact producers.
        CREATE TABLE IF NOT EXISTS session_pointers (
            session_id      TEXT NOT NULL,
            pointer_name    TEXT NOT NULL,
            value           TEXT NOT NULL,
            updated_at      INTEGER NOT NULL,
            PRIMARY KEY (session_id, pointer_name)
        );

        -- Revisable payloads for composite actions.
        CREATE TABLE IF NOT EXISTS drafts (
            draft_id        TEXT PRIMARY KEY NOT NULL,
            revision        INTEGER NOT NULL DEFAULT 1,
            content         TEXT NOT NULL DEFAULT '',
            status          TEXT NOT NULL DEFAULT 'draft'
                            CHECK (status IN ('draft', 'sent')),
            updated_at      INTEGER NOT NULL
        );

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| GreenlightError::Storage(format!("Failed to apply v1 schema: {}", e)))?;
    Ok(())
}
