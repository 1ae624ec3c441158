//! The Expiration Reaper.
//!
//! Periodic housekeeping over the intent table: lapsed `pending` intents
//! are flipped to `expired`, and `executing` intents whose claim outlived
//! the execution timeout are recovered. Read paths already expire lapsed
//! rows opportunistically, so the sweep is a backstop, not the only line
//! of defense.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use greenlight_core::config::EngineConfig;
use greenlight_core::error::GreenlightError;

use greenlight_storage::IntentStore;

/// What a single sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Pending intents whose confirmation TTL lapsed.
    pub expired: usize,
    /// Executing intents recovered from a stale claim.
    pub recovered: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.expired + self.recovered
    }
}

/// Sweeps the intent table on demand or on an interval.
pub struct Reaper {
    intents: Arc<IntentStore>,
    execution_timeout_seconds: u64,
}

impl Reaper {
    pub fn new(intents: Arc<IntentStore>, config: &EngineConfig) -> Self {
        Self {
            intents,
            execution_timeout_seconds: config.execution_timeout_seconds,
        }
    }

    /// Run one sweep: expire lapsed pending intents, then recover stale
    /// claims. A recovered claim means the process died (or hung) between
    /// claim and terminal mark; the side effect may or may not have
    /// happened, so the intent is expired rather than retried.
    pub fn sweep(&self) -> Result<SweepReport, GreenlightError> {
        let expired = self.intents.reap_expired()?;
        let recovered = self.intents.reap_stuck(self.execution_timeout_seconds)?;

        let report = SweepReport { expired, recovered };
        if report.total() > 0 {
            info!(
                expired = report.expired,
                recovered = report.recovered,
                "Reaper sweep flipped intents"
            );
        } else {
            debug!("Reaper sweep found nothing to do");
        }
        Ok(report)
    }

    /// Sweep forever on a fixed interval. Intended to be spawned as a
    /// background task; storage errors are logged and the loop continues.
    pub async fn run(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep() {
                warn!(error = %e, "Reaper sweep failed; will retry next interval");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use greenlight_core::types::{IntentStatus, Timestamp};
    use greenlight_storage::Database;

    fn setup() -> (Reaper, Arc<IntentStore>, Arc<Database>) {
        let db = Arc::new(Database::in_memory().unwrap());
        let config = EngineConfig::default();
        let intents = Arc::new(IntentStore::new(Arc::clone(&db), config.clone()));
        (
            Reaper::new(Arc::clone(&intents), &config),
            intents,
            db,
        )
    }

    fn stage(intents: &IntentStore, to: &str) -> uuid::Uuid {
        intents
            .create(
                "s1",
                "notification",
                "notify",
                serde_json::json!({"to": to}),
                "notify",
            )
            .unwrap()
            .intent_id
    }

    fn backdate(db: &Database, column: &str, intent_id: uuid::Uuid, value: i64) {
        let sql = format!(
            "UPDATE pending_intents SET {} = ?2 WHERE intent_id = ?1",
            column
        );
        db.with_conn(|conn| {
            conn.execute(&sql, (intent_id.to_string(), value))
                .map_err(|e| GreenlightError::Storage(e.to_string()))?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_sweep_noop_on_fresh_intents() {
        let (reaper, intents, _db) = setup();
        stage(&intents, "bob");

        let report = reaper.sweep().unwrap();
        assert_eq!(report, SweepReport::default());
        assert_eq!(intents.list_pending("s1", None).unwrap().len(), 1);
    }

    #[test]
    fn test_sweep_expires_lapsed_pending() {
        let (reaper, intents, db) = setup();
        let lapsed = stage(&intents, "bob");
        let fresh = stage(&intents, "carol");
        backdate(&db, "expires_at", lapsed, Timestamp::now().0 - 10);

        let report = reaper.sweep().unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(report.recovered, 0);

        assert_eq!(
            intents.get(lapsed).unwrap().unwrap().status,
            IntentStatus::Expired
        );
        assert_eq!(
            intents.get(fresh).unwrap().unwrap().status,
            IntentStatus::Pending
        );
    }

    #[test]
    fn test_sweep_recovers_stale_claim() {
        let (reaper, intents, db) = setup();
        let stuck = stage(&intents, "bob");
        assert!(intents.try_claim(stuck).unwrap());
        backdate(&db, "claimed_at", stuck, Timestamp::now().0 - 3600);

        let report = reaper.sweep().unwrap();
        assert_eq!(report.recovered, 1);
        assert_eq!(
            intents.get(stuck).unwrap().unwrap().status,
            IntentStatus::Expired
        );
    }

    #[test]
    fn test_sweep_leaves_recent_claim_alone() {
        let (reaper, intents, _db) = setup();
        let claimed = stage(&intents, "bob");
        assert!(intents.try_claim(claimed).unwrap());

        let report = reaper.sweep().unwrap();
        assert_eq!(report.recovered, 0);
        assert_eq!(
            intents.get(claimed).unwrap().unwrap().status,
            IntentStatus::Executing
        );
    }

    #[test]
    fn test_expired_intent_records_reason() {
        let (reaper, intents, db) = setup();
        let lapsed = stage(&intents, "bob");
        backdate(&db, "expires_at", lapsed, Timestamp::now().0 - 10);
        reaper.sweep().unwrap();

        let intent = intents.get(lapsed).unwrap().unwrap();
        assert!(intent.observations.contains("ttl lapsed"));
    }
}
