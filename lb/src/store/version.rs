//! State version marker at `/state-last-updated`
//!
//! The token is the marker's store-assigned data version, not its payload.
//! Each bump writes the current epoch millis so the payload doubles as a
//! last-updated timestamp for operators.

use coordstore::{CoordinationStore, OpResult, StoreError, Transaction};
use tracing::debug;

use crate::domain::StateVersion;
use crate::error::OrchestratorResult;
use crate::paths;

pub(crate) fn ensure_marker(store: &CoordinationStore) -> OrchestratorResult<()> {
    store.create_if_absent(paths::STATE_VERSION)?;
    Ok(())
}

/// Stage a bump inside a larger transaction; the marker must already exist
pub(crate) fn stage_bump(txn: &mut Transaction) -> Result<(), StoreError> {
    txn.set_json(paths::STATE_VERSION, &chrono::Utc::now().timestamp_millis())?;
    Ok(())
}

pub(crate) fn bump(store: &CoordinationStore) -> OrchestratorResult<StateVersion> {
    debug!("bump: called");
    ensure_marker(store)?;
    let mut txn = store.transaction();
    stage_bump(&mut txn)?;
    let result = store.commit(txn)?;
    let version = result
        .results()
        .iter()
        .find_map(|r| match r {
            OpResult::DataSet { version, .. } => Some(*version),
            _ => None,
        })
        .unwrap_or_default();
    Ok(StateVersion::from_revision(version))
}

pub(crate) fn current(store: &CoordinationStore) -> OrchestratorResult<Option<StateVersion>> {
    Ok(store.revision(paths::STATE_VERSION)?.map(StateVersion::from_revision))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_increases_version() {
        let store = CoordinationStore::in_memory();
        assert_eq!(current(&store).unwrap(), None);

        let first = bump(&store).unwrap();
        let second = bump(&store).unwrap();
        assert!(second > first);
        assert_eq!(current(&store).unwrap(), Some(second));
        assert_eq!(current(&store).unwrap(), Some(second));
    }
}
