//! Confirmation and idempotent execution engine.
//!
//! Side-effecting actions proposed by a conversational planner are staged
//! as pending intents, previewed to the user, and executed at most once on
//! confirmation. The pieces:
//!
//! - [`resolve::ContextGate`] fills omitted arguments from session pointers
//! - [`coordinator::Coordinator`] stages previews and drives
//!   confirm/cancel, with an atomic claim guarding execution
//! - [`convergence::DraftConvergence`] executes draft-backed actions
//!   against the latest draft revision
//! - [`reaper::Reaper`] expires lapsed intents and recovers stale claims
//!
//! Storage lives in `greenlight-storage`; shared types and config in
//! `greenlight-core`.

pub mod convergence;
pub mod coordinator;
pub mod executor;
pub mod reaper;
pub mod resolve;
pub mod types;

pub use convergence::DraftConvergence;
pub use coordinator::{Coordinator, StageError};
pub use executor::{Executor, ExecutorError, ExecutorRegistry};
pub use reaper::{Reaper, SweepReport};
pub use resolve::{ContextGate, FieldRule, Injection, Resolution, ResolveError};
pub use types::{CancelOutcome, Candidate, ConfirmOutcome, Preview, Selection};
