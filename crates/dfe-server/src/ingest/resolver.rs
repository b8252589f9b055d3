//! Find-or-create of reference entities inside an ingestion transaction

use dfe_common::TaxId;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use super::parsed::{Party, VehicleData};
use crate::store::{StoreError, StoreResult, StoreTransaction};

/// Lookups after a lost insert race before the contention is reported as transient.
pub const DEFAULT_RESOLVE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy)]
pub struct EntityResolver {
    max_attempts: u32,
}

impl Default for EntityResolver {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLVE_ATTEMPTS)
    }
}

impl EntityResolver {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Existing counterparty id for the tax id, inserting one if absent.
    ///
    /// Losing the insert race to a concurrent transaction re-reads the
    /// winner's row, so both callers end up with the same id.
    pub async fn resolve_counterparty<T: StoreTransaction>(&self, tx: &mut T, party: &Party) -> StoreResult<Uuid> {
        for attempt in 1..=self.max_attempts {
            if let Some(id) = tx.find_counterparty(&party.tax_id).await? {
                return Ok(id);
            }
            match tx.insert_counterparty(party).await {
                Ok(id) => {
                    debug!(tax_id = %party.tax_id, "Created counterparty");
                    return Ok(id);
                },
                Err(StoreError::UniqueViolation { .. }) => {
                    debug!(tax_id = %party.tax_id, attempt, "Counterparty inserted concurrently, re-reading");
                },
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::Unavailable(format!(
            "counterparty {} still contended after {} attempts",
            party.tax_id, self.max_attempts
        )))
    }

    pub async fn resolve_vehicle<T: StoreTransaction>(&self, tx: &mut T, vehicle: &VehicleData) -> StoreResult<Uuid> {
        for attempt in 1..=self.max_attempts {
            if let Some(id) = tx.find_vehicle(&vehicle.plate).await? {
                return Ok(id);
            }
            match tx.insert_vehicle(vehicle).await {
                Ok(id) => {
                    debug!(plate = %vehicle.plate, "Created vehicle");
                    return Ok(id);
                },
                Err(StoreError::UniqueViolation { .. }) => {
                    debug!(plate = %vehicle.plate, attempt, "Vehicle inserted concurrently, re-reading");
                },
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::Unavailable(format!(
            "vehicle {} still contended after {} attempts",
            vehicle.plate, self.max_attempts
        )))
    }

    /// Resolve every party in order, returning ids keyed by tax id.
    pub async fn resolve_parties<T: StoreTransaction>(
        &self,
        tx: &mut T,
        parties: &[&Party],
    ) -> StoreResult<HashMap<TaxId, Uuid>> {
        let mut ids = HashMap::with_capacity(parties.len());
        for party in parties {
            if ids.contains_key(&party.tax_id) {
                continue;
            }
            let id = self.resolve_counterparty(tx, party).await?;
            ids.insert(party.tax_id.clone(), id);
        }
        Ok(ids)
    }
}
