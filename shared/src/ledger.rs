use serde::{Deserialize, Serialize};

use crate::error::ReservationError;

/// Direction tag carried by update-share-count requests. The server computes
/// the real delta from its own stored count and rejects a tag that disagrees
/// with the delta's sign, which catches stale client state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareOperation {
    Add,
    Remove,
}

impl std::fmt::Display for ShareOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ShareOperation::Add => "add",
            ShareOperation::Remove => "remove",
        })
    }
}

/// Decide a new hold against the live empty-share count. Returns the
/// counter value after the decrement. The caller must have re-read
/// `empty_share` in the same transaction that applies the result.
pub fn reserve(empty_share: i32, requested: i32) -> Result<i32, ReservationError> {
    if requested < 1 {
        return Err(ReservationError::InvalidShareCount { requested });
    }
    if requested > empty_share {
        return Err(ReservationError::InsufficientShares {
            available: empty_share,
            requested,
        });
    }
    Ok(empty_share - requested)
}

/// Validate a share-count change on an existing hold and return the delta
/// (positive = more shares held). Capacity is not checked here; the caller
/// enforces it against the counter it is about to write.
pub fn change_delta(
    current_count: i32,
    new_count: i32,
    operation: ShareOperation,
) -> Result<i32, ReservationError> {
    if new_count < 1 {
        return Err(ReservationError::InvalidShareCount { requested: new_count });
    }
    let delta = new_count - current_count;
    match operation {
        ShareOperation::Add if delta <= 0 => {
            return Err(ReservationError::OperationMismatch { operation })
        }
        ShareOperation::Remove if delta >= 0 => {
            return Err(ReservationError::OperationMismatch { operation })
        }
        _ => {}
    }
    Ok(delta)
}

/// Decide a share-count change against a known empty-share value. Returns
/// the new empty-share value and the applied delta.
pub fn adjust(
    empty_share: i32,
    current_count: i32,
    new_count: i32,
    operation: ShareOperation,
) -> Result<(i32, i32), ReservationError> {
    let delta = change_delta(current_count, new_count, operation)?;
    if delta > empty_share {
        return Err(ReservationError::InsufficientShares {
            available: empty_share,
            requested: delta,
        });
    }
    Ok((empty_share - delta, delta))
}

/// Completion gate: the submitted shareholder list must match the share
/// count the server holds, which may have moved under a stale client.
pub fn validate_shareholder_count(
    given: usize,
    reserved: i32,
) -> Result<(), ReservationError> {
    if given != reserved as usize {
        return Err(ReservationError::ShareholderCountMismatch { given, reserved });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn reserve_over_capacity_fails_without_mutation() {
        // capacity 7, two shares left
        let empty = 2;
        let err = reserve(empty, 3).unwrap_err();
        assert!(matches!(
            err,
            ReservationError::InsufficientShares { available: 2, requested: 3 }
        ));
        assert_eq!(reserve(empty, 2).unwrap(), 0);
        assert!(matches!(
            reserve(0, 1).unwrap_err(),
            ReservationError::InsufficientShares { available: 0, requested: 1 }
        ));
    }

    #[test]
    fn reserve_rejects_nonpositive_counts() {
        assert!(matches!(
            reserve(5, 0).unwrap_err(),
            ReservationError::InvalidShareCount { requested: 0 }
        ));
        assert!(matches!(
            reserve(5, -2).unwrap_err(),
            ReservationError::InvalidShareCount { requested: -2 }
        ));
    }

    #[test]
    fn adjust_add_consumes_the_difference() {
        // held 2, grow to 3: one more share comes out of inventory
        let (empty, delta) = adjust(4, 2, 3, ShareOperation::Add).unwrap();
        assert_eq!((empty, delta), (3, 1));
    }

    #[test]
    fn adjust_remove_restores_the_difference() {
        // held 3, shrink to 1: two shares go back
        let (empty, delta) = adjust(3, 3, 1, ShareOperation::Remove).unwrap();
        assert_eq!((empty, delta), (5, -2));
    }

    #[test]
    fn adjust_rejects_mismatched_operation_tag() {
        assert!(matches!(
            adjust(4, 2, 3, ShareOperation::Remove).unwrap_err(),
            ReservationError::OperationMismatch { operation: ShareOperation::Remove }
        ));
        assert!(matches!(
            adjust(4, 3, 1, ShareOperation::Add).unwrap_err(),
            ReservationError::OperationMismatch { operation: ShareOperation::Add }
        ));
        // no-op change is a mismatch for either tag
        assert!(adjust(4, 2, 2, ShareOperation::Add).is_err());
        assert!(adjust(4, 2, 2, ShareOperation::Remove).is_err());
    }

    #[test]
    fn adjust_cannot_drive_inventory_negative() {
        let err = adjust(1, 2, 4, ShareOperation::Add).unwrap_err();
        assert!(matches!(
            err,
            ReservationError::InsufficientShares { available: 1, requested: 2 }
        ));
    }

    #[test]
    fn change_delta_validates_without_a_capacity_check() {
        assert_eq!(change_delta(2, 3, ShareOperation::Add).unwrap(), 1);
        assert_eq!(change_delta(3, 1, ShareOperation::Remove).unwrap(), -2);
        assert!(change_delta(2, 0, ShareOperation::Remove).is_err());
        assert!(change_delta(2, 2, ShareOperation::Add).is_err());
    }

    #[test]
    fn shareholder_count_must_match_the_held_shares() {
        validate_shareholder_count(2, 2).unwrap();
        validate_shareholder_count(7, 7).unwrap();
        let err = validate_shareholder_count(3, 2).unwrap_err();
        assert!(matches!(
            err,
            ReservationError::ShareholderCountMismatch { given: 3, reserved: 2 }
        ));
        assert!(validate_shareholder_count(1, 2).is_err());
    }

    /// In-memory model of one animal's ledger, used to check that arbitrary
    /// op sequences keep the counter within [0, capacity].
    struct LedgerModel {
        capacity: i32,
        empty: i32,
        holds: HashMap<&'static str, i32>,
    }

    impl LedgerModel {
        fn new(capacity: i32) -> Self {
            LedgerModel { capacity, empty: capacity, holds: HashMap::new() }
        }

        fn create(&mut self, id: &'static str, count: i32) -> Result<(), ReservationError> {
            self.empty = reserve(self.empty, count)?;
            self.holds.insert(id, count);
            Ok(())
        }

        fn update(
            &mut self,
            id: &'static str,
            new_count: i32,
            op: ShareOperation,
        ) -> Result<(), ReservationError> {
            let current = *self.holds.get(id).ok_or(ReservationError::NotFound)?;
            let (empty, _) = adjust(self.empty, current, new_count, op)?;
            self.empty = empty;
            self.holds.insert(id, new_count);
            Ok(())
        }

        // Restore is status-guarded in storage; the map stands in for the
        // pending status here, so a second cancel finds nothing to restore.
        fn cancel(&mut self, id: &'static str) {
            if let Some(count) = self.holds.remove(&id) {
                self.empty += count;
            }
        }

        fn check_invariants(&self) {
            assert!(self.empty >= 0, "empty_share went negative");
            assert!(self.empty <= self.capacity, "empty_share exceeded capacity");
            let held: i32 = self.holds.values().sum();
            assert_eq!(held + self.empty, self.capacity);
        }
    }

    #[test]
    fn op_sequences_preserve_invariants() {
        let mut ledger = LedgerModel::new(7);

        ledger.create("a", 2).unwrap();
        ledger.check_invariants();

        ledger.update("a", 3, ShareOperation::Add).unwrap();
        ledger.check_invariants();

        ledger.create("b", 4).unwrap();
        ledger.check_invariants();
        assert_eq!(ledger.empty, 0);

        // last share race: nothing left for a third buyer
        assert!(ledger.create("c", 1).is_err());

        ledger.update("a", 1, ShareOperation::Remove).unwrap();
        ledger.check_invariants();
        assert_eq!(ledger.empty, 2);

        ledger.cancel("b");
        ledger.check_invariants();
        assert_eq!(ledger.empty, 6);

        // cancelling twice restores nothing further
        ledger.cancel("b");
        ledger.check_invariants();
        assert_eq!(ledger.empty, 6);

        ledger.cancel("a");
        ledger.check_invariants();
        assert_eq!(ledger.empty, 7);
    }
}
