//! Charge Storage
//!
//! The id -> Charge map that both the initiator and the reconciler share.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::charge::{Charge, ChargeId, ChargeStatus, TransitionOutcome};
use crate::error::{PaymentError, Result};

/// Charge storage trait
pub trait ChargeStore: Send + Sync {
    /// Insert a freshly created charge; an existing id is an error, never overwritten
    fn insert(&self, charge: Charge) -> Result<()>;

    /// Get charge by id
    fn get(&self, id: &ChargeId) -> Result<Option<Charge>>;

    /// Apply the transition rule atomically (read-modify-write under one lock).
    ///
    /// Returns `None` when the id is not tracked.
    fn transition(
        &self,
        id: &ChargeId,
        incoming: ChargeStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<(Charge, TransitionOutcome)>>;

    /// Number of tracked charges
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// In-memory charge store (single-process deployments)
pub struct MemoryChargeStore {
    charges: RwLock<HashMap<ChargeId, Charge>>,
}

impl Default for MemoryChargeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChargeStore {
    pub fn new() -> Self {
        Self {
            charges: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<ChargeId, Charge>>> {
        self.charges
            .read()
            .map_err(|_| PaymentError::Storage("charge store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<ChargeId, Charge>>> {
        self.charges
            .write()
            .map_err(|_| PaymentError::Storage("charge store lock poisoned".into()))
    }
}

impl ChargeStore for MemoryChargeStore {
    fn insert(&self, charge: Charge) -> Result<()> {
        let mut charges = self.write()?;

        if charges.contains_key(&charge.id) {
            return Err(PaymentError::DuplicateCharge(charge.id.to_string()));
        }

        charges.insert(charge.id.clone(), charge);
        Ok(())
    }

    fn get(&self, id: &ChargeId) -> Result<Option<Charge>> {
        Ok(self.read()?.get(id).cloned())
    }

    fn transition(
        &self,
        id: &ChargeId,
        incoming: ChargeStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<(Charge, TransitionOutcome)>> {
        let mut charges = self.write()?;

        Ok(charges.get_mut(id).map(|charge| {
            let outcome = charge.apply(incoming, now);
            (charge.clone(), outcome)
        }))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charge::sample_charge;
    use std::sync::Arc;

    #[test]
    fn test_insert_and_get() {
        let store = MemoryChargeStore::new();
        store.insert(sample_charge("100")).unwrap();

        let charge = store.get(&ChargeId::new("100")).unwrap().unwrap();
        assert_eq!(charge.status, ChargeStatus::Pending);
        assert_eq!(store.len().unwrap(), 1);
        assert!(store.get(&ChargeId::from("nope")).unwrap().is_none());
    }

    #[test]
    fn test_insert_never_overwrites() {
        let store = MemoryChargeStore::new();
        store.insert(sample_charge("100")).unwrap();
        store
            .transition(&ChargeId::new("100"), ChargeStatus::Approved, Utc::now())
            .unwrap();

        let err = store.insert(sample_charge("100")).unwrap_err();
        assert!(matches!(err, PaymentError::DuplicateCharge(_)));

        let charge = store.get(&ChargeId::new("100")).unwrap().unwrap();
        assert_eq!(charge.status, ChargeStatus::Approved);
    }

    #[test]
    fn test_transition_unknown_id() {
        let store = MemoryChargeStore::new();
        let result = store
            .transition(&ChargeId::new("ghost"), ChargeStatus::Approved, Utc::now())
            .unwrap();
        assert!(result.is_none());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_concurrent_transitions_settle_on_one_terminal() {
        let store = Arc::new(MemoryChargeStore::new());
        store.insert(sample_charge("race")).unwrap();

        let statuses = [
            ChargeStatus::Approved,
            ChargeStatus::Rejected,
            ChargeStatus::Pending,
        ];

        let handles: Vec<_> = (0..48)
            .map(|i| {
                let store = store.clone();
                let incoming = statuses[i % statuses.len()];
                std::thread::spawn(move || {
                    let (charge, outcome) = store
                        .transition(&ChargeId::new("race"), incoming, Utc::now())
                        .unwrap()
                        .unwrap();
                    assert_ne!(charge.status, ChargeStatus::Unknown);
                    outcome
                })
            })
            .collect();

        let applied = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| o.changed_status())
            .count();

        let final_status = store.get(&ChargeId::new("race")).unwrap().unwrap().status;
        assert!(final_status.is_terminal());
        assert_eq!(applied, 1);
    }
}
