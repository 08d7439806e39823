//! Persistence layer.
//!
//! Saves and loads the engine snapshot (account, budget, ledger) as a
//! JSON file. A file is plenty at this scale; the ledger's audit trail
//! rides along inside the snapshot.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::budget::Budget;
use crate::ledger::BetLedger;
use crate::types::{AccountState, StakewiseError};

/// Default snapshot file path.
const DEFAULT_SNAPSHOT_FILE: &str = "stakewise_state.json";

/// Everything the engine needs to survive a restart.
#[derive(Debug, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub account: AccountState,
    pub budget: Budget,
    pub ledger: BetLedger,
    /// Last date the daily run completed, for idempotent triggers.
    pub last_daily_run: Option<NaiveDate>,
}

/// Save the snapshot to a JSON file.
pub fn save_snapshot(snapshot: &EngineSnapshot, path: Option<&str>) -> Result<(), StakewiseError> {
    let path = path.unwrap_or(DEFAULT_SNAPSHOT_FILE);
    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| StakewiseError::Storage(format!("failed to serialize snapshot: {e}")))?;

    std::fs::write(path, &json)
        .map_err(|e| StakewiseError::Storage(format!("failed to write {path}: {e}")))?;

    debug!(path, bankroll = %snapshot.account.bankroll, "snapshot saved");
    Ok(())
}

/// Load a snapshot. `None` when no file exists (fresh start). A loaded
/// ledger must replay to the projection it carries; a snapshot that
/// fails that check is corrupt and refused.
pub fn load_snapshot(path: Option<&str>) -> Result<Option<EngineSnapshot>, StakewiseError> {
    let path = path.unwrap_or(DEFAULT_SNAPSHOT_FILE);

    if !Path::new(path).exists() {
        info!(path, "no saved snapshot, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .map_err(|e| StakewiseError::Storage(format!("failed to read {path}: {e}")))?;
    let snapshot: EngineSnapshot = serde_json::from_str(&json)
        .map_err(|e| StakewiseError::Storage(format!("failed to parse {path}: {e}")))?;

    for (bet_id, state) in snapshot.ledger.replay() {
        let projected = snapshot
            .ledger
            .get(bet_id)
            .map(|e| e.state)
            .ok_or_else(|| StakewiseError::Storage(format!("trail names unknown bet {bet_id}")))?;
        if projected != state {
            return Err(StakewiseError::Storage(format!(
                "ledger projection diverges from trail for bet {bet_id}"
            )));
        }
    }

    info!(
        path,
        bankroll = %snapshot.account.bankroll,
        bets = snapshot.ledger.len(),
        "snapshot loaded from disk"
    );
    Ok(Some(snapshot))
}

/// Delete the snapshot file (tests and resets).
pub fn delete_snapshot(path: Option<&str>) -> Result<(), StakewiseError> {
    let path = path.unwrap_or(DEFAULT_SNAPSHOT_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .map_err(|e| StakewiseError::Storage(format!("failed to delete {path}: {e}")))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn temp_path() -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("stakewise_test_state_{}.json", uuid::Uuid::new_v4()));
        p.to_string_lossy().to_string()
    }

    fn snapshot() -> EngineSnapshot {
        EngineSnapshot {
            account: AccountState::new(dec!(1000)),
            budget: Budget::new(
                Utc::now().date_naive(),
                dec!(200),
                dec!(0.02),
                dec!(0.25),
            ),
            ledger: BetLedger::new(),
            last_daily_run: None,
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = temp_path();
        let mut snap = snapshot();
        snap.account.total_pnl = dec!(42.50);
        snap.budget.commit(dec!(75)).unwrap();
        snap.last_daily_run = Some(Utc::now().date_naive());

        save_snapshot(&snap, Some(&path)).unwrap();
        let loaded = load_snapshot(Some(&path)).unwrap().unwrap();

        assert_eq!(loaded.account.bankroll, dec!(1000));
        assert_eq!(loaded.account.total_pnl, dec!(42.50));
        assert_eq!(loaded.budget.committed, dec!(75));
        assert_eq!(loaded.last_daily_run, snap.last_daily_run);

        delete_snapshot(Some(&path)).unwrap();
    }

    #[test]
    fn test_load_missing_file_is_fresh_start() {
        let loaded = load_snapshot(Some("/tmp/stakewise_no_such_file_1b9.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_corrupt_file_is_a_storage_error() {
        let path = temp_path();
        std::fs::write(&path, "not json").unwrap();
        let err = load_snapshot(Some(&path)).unwrap_err();
        assert!(matches!(err, StakewiseError::Storage(_)));
        delete_snapshot(Some(&path)).unwrap();
    }
}
