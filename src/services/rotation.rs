//! Round-robin credential selection with per-cycle failure tracking.
//!
//! The selector owns the rotation cursor and the failed set. Both are shared
//! by every analysis request in the process: a key that fails for one
//! request is skipped by the next, until every key has failed and the cycle
//! starts over.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::credential::Credential;

#[derive(Debug, Default)]
struct RotationState {
    cursor: usize,
    failed: HashSet<usize>,
}

#[derive(Debug)]
pub struct RotationSelector {
    credentials: Vec<Credential>,
    state: Mutex<RotationState>,
}

impl RotationSelector {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            credentials,
            state: Mutex::new(RotationState::default()),
        }
    }

    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }

    /// First credential at or after the cursor that has not failed in this
    /// cycle, with its index. The cursor does not move.
    ///
    /// Returns `None` when every credential has failed. The failed set is
    /// cleared at the same time, so the following call starts a new cycle.
    pub fn next_credential(&self) -> Option<(usize, Credential)> {
        let mut state = self.state();
        let total = self.credentials.len();

        if state.failed.len() >= total {
            state.failed.clear();
            return None;
        }

        (0..total)
            .map(|offset| (state.cursor + offset) % total)
            .find(|index| !state.failed.contains(index))
            .map(|index| (index, self.credentials[index].clone()))
    }

    /// Mark `index` failed for this cycle and move the cursor past it.
    pub fn on_attempt_failed(&self, index: usize) {
        let total = self.credentials.len();
        if index >= total {
            return;
        }

        let mut state = self.state();
        state.failed.insert(index);
        state.cursor = (index + 1) % total;
    }

    fn state(&self) -> MutexGuard<'_, RotationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::services::test_support::credentials;

    fn index_of(selector: &RotationSelector) -> Option<usize> {
        selector.next_credential().map(|(index, _)| index)
    }

    #[test]
    fn starts_at_the_first_credential_and_stays_there() {
        let selector = RotationSelector::new(credentials(3));

        assert_eq!(index_of(&selector), Some(0));
        assert_eq!(index_of(&selector), Some(0));
    }

    #[test]
    fn failure_advances_the_cursor() {
        let selector = RotationSelector::new(credentials(3));

        selector.on_attempt_failed(0);
        assert_eq!(index_of(&selector), Some(1));

        selector.on_attempt_failed(1);
        assert_eq!(index_of(&selector), Some(2));
    }

    #[test]
    fn scan_wraps_around_and_skips_failed() {
        let selector = RotationSelector::new(credentials(3));

        selector.on_attempt_failed(0);
        selector.on_attempt_failed(2);
        // Cursor is back at 0 (failed), so the scan moves on to 1
        assert_eq!(index_of(&selector), Some(1));
    }

    #[test]
    fn full_cycle_failure_returns_none_once_then_resets() {
        let selector = RotationSelector::new(credentials(3));
        for index in 0..3 {
            selector.on_attempt_failed(index);
        }

        assert_eq!(index_of(&selector), None);
        // Cursor was left after the last failure, at index 0
        assert_eq!(index_of(&selector), Some(0));
    }

    #[test]
    fn returned_credential_matches_its_index() {
        let creds = credentials(3);
        let selector = RotationSelector::new(creds.clone());
        selector.on_attempt_failed(0);

        let (index, credential) = selector.next_credential().unwrap();
        assert_eq!(index, 1);
        assert_eq!(credential, creds[1]);
    }

    #[test]
    fn empty_registry_never_yields() {
        let selector = RotationSelector::new(Vec::new());
        assert_eq!(index_of(&selector), None);
        selector.on_attempt_failed(0);
        assert_eq!(index_of(&selector), None);
    }

    #[test]
    fn out_of_range_failure_is_ignored() {
        let selector = RotationSelector::new(credentials(2));
        selector.on_attempt_failed(7);
        assert_eq!(index_of(&selector), Some(0));
    }

    proptest! {
        #[test]
        fn never_returns_a_failed_credential(
            total in 1usize..8,
            failures in proptest::collection::vec(0usize..8, 0..20),
        ) {
            let selector = RotationSelector::new(credentials(total));
            let mut failed = HashSet::new();

            for index in failures.into_iter().filter(|i| *i < total) {
                selector.on_attempt_failed(index);
                failed.insert(index);

                match selector.next_credential() {
                    Some((picked, _)) => {
                        prop_assert!(failed.len() < total);
                        prop_assert!(!failed.contains(&picked));
                    }
                    None => {
                        prop_assert_eq!(failed.len(), total);
                        failed.clear();
                    }
                }
            }
        }
    }
}
