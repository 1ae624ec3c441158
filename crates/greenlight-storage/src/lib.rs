//! Greenlight storage crate - SQLite persistence for the confirmation engine.
//!
//! Provides a WAL-mode SQLite database with migrations, the Pending Intent
//! Store (status state machine, deduplication, atomic claim, reaping), the
//! Session Pointer Store, and draft persistence for revisable actions.

pub mod db;
pub mod draft_store;
pub mod intent_store;
pub mod migrations;
pub mod pointer_store;

pub use db::Database;
pub use draft_store::DraftStore;
pub use intent_store::{IntentStore, IntentStoreError};
pub use pointer_store::PointerStore;
