//! In-process store with the same uniqueness and atomicity rules as Postgres
//!
//! Writes are staged on the transaction and applied under one lock at
//! commit. A natural key being inserted by a live transaction is claimed:
//! a second inserter waits for the claim to resolve and then either sees
//! the committed row (unique violation) or takes the claim over.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dfe_common::{AccessKey, Plate, TaxId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use super::{DocumentStore, StoreError, StoreResult, StoreTransaction, UpsertOutcome};
use crate::ingest::parsed::{Party, VehicleData};
use crate::models::{
    DocumentDetails, DocumentKind, DocumentState, PrimaryDocument, Upload, UploadStatus, STATUS_CANCELLED,
};

/// How long a transaction waits on another one's claim before giving up.
const LOCK_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct StoredDocument {
    id: Uuid,
    document: PrimaryDocument,
}

#[derive(Default)]
struct Faults {
    failing_counterparty: Option<TaxId>,
    failing_begins: usize,
    failing_failure_marks: usize,
}

#[derive(Default)]
struct State {
    counterparties: HashMap<TaxId, (Uuid, Party)>,
    vehicles: HashMap<Plate, (Uuid, VehicleData)>,
    documents: HashMap<AccessKey, StoredDocument>,
    links: HashSet<(Uuid, Uuid)>,
    uploads: HashMap<Uuid, Upload>,
    party_claims: HashMap<TaxId, u64>,
    vehicle_claims: HashMap<Plate, u64>,
    document_claims: HashMap<AccessKey, u64>,
    next_tx: u64,
    faults: Faults,
}

impl State {
    fn release(&mut self, tx: u64) {
        self.party_claims.retain(|_, owner| *owner != tx);
        self.vehicle_claims.retain(|_, owner| *owner != tx);
        self.document_claims.retain(|_, owner| *owner != tx);
    }

    fn document_by_id(&self, id: Uuid) -> Option<&StoredDocument> {
        self.documents.values().find(|d| d.id == id)
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    released: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `attempt` under the lock until it yields, waking on every
    /// commit or rollback.
    async fn wait_for<T, F>(&self, what: &str, mut attempt: F) -> StoreResult<T>
    where
        F: FnMut(&mut State) -> Option<StoreResult<T>> + Send,
    {
        let deadline = Instant::now() + LOCK_WAIT;
        loop {
            let released = self.released.notified();
            let outcome = {
                let mut state = self.lock();
                attempt(&mut state)
            };
            if let Some(outcome) = outcome {
                return outcome;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if tokio::time::timeout(remaining, released).await.is_err() {
                return Err(StoreError::Unavailable(format!("lock wait timeout on {}", what)));
            }
        }
    }
}

/// Shared handle; clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every insert of this counterparty fail with a non-transient error.
    pub fn fail_counterparty_insert(&self, tax_id: TaxId) {
        self.shared.lock().faults.failing_counterparty = Some(tax_id);
    }

    /// Make the next `count` calls to `begin` fail as unavailable.
    pub fn fail_next_begins(&self, count: usize) {
        self.shared.lock().faults.failing_begins = count;
    }

    /// Make the next `count` calls to `mark_upload_failed` fail as unavailable.
    pub fn fail_next_failure_marks(&self, count: usize) {
        self.shared.lock().faults.failing_failure_marks = count;
    }

    pub fn counterparty_count(&self) -> usize {
        self.shared.lock().counterparties.len()
    }

    pub fn counterparty(&self, tax_id: &TaxId) -> Option<(Uuid, Party)> {
        self.shared.lock().counterparties.get(tax_id).cloned()
    }

    pub fn vehicle_count(&self) -> usize {
        self.shared.lock().vehicles.len()
    }

    pub fn document_count(&self) -> usize {
        self.shared.lock().documents.len()
    }

    pub fn document(&self, key: &str) -> Option<PrimaryDocument> {
        let key = AccessKey::from_decoded(key).ok()?;
        self.shared.lock().documents.get(&key).map(|d| d.document.clone())
    }

    pub fn document_id(&self, key: &str) -> Option<Uuid> {
        let key = AccessKey::from_decoded(key).ok()?;
        self.shared.lock().documents.get(&key).map(|d| d.id)
    }

    /// Access keys of the waybills linked to a manifest, sorted.
    pub fn linked_waybills(&self, manifest_key: &str) -> Vec<String> {
        let Some(manifest_id) = self.document_id(manifest_key) else {
            return Vec::new();
        };
        let state = self.shared.lock();
        let mut keys: Vec<String> = state
            .links
            .iter()
            .filter(|(m, _)| *m == manifest_id)
            .filter_map(|(_, w)| state.document_by_id(*w))
            .map(|d| d.document.access_key.to_string())
            .collect();
        keys.sort();
        keys
    }
}

pub struct MemoryTransaction {
    id: u64,
    shared: Arc<Shared>,
    counterparties: Vec<(TaxId, Uuid, Party)>,
    vehicles: Vec<(Plate, Uuid, VehicleData)>,
    documents: HashMap<AccessKey, StoredDocument>,
    links: Vec<(Uuid, Uuid)>,
    processed_uploads: Vec<(Uuid, AccessKey)>,
    finished: bool,
}

impl MemoryTransaction {
    /// Lock a document key for this transaction, waiting out other holders.
    async fn claim_document(&self, key: &AccessKey) -> StoreResult<()> {
        let tx = self.id;
        self.shared
            .wait_for("document", |state| match state.document_claims.get(key) {
                Some(owner) if *owner != tx => None,
                _ => {
                    state.document_claims.insert(key.clone(), tx);
                    Some(Ok(()))
                },
            })
            .await
    }

    /// The document as this transaction sees it: its own staged copy, else the committed one.
    fn visible_document(&self, key: &AccessKey) -> Option<StoredDocument> {
        self.documents
            .get(key)
            .cloned()
            .or_else(|| self.shared.lock().documents.get(key).cloned())
    }

    async fn stage_document_by_id(&mut self, id: Uuid) -> StoreResult<AccessKey> {
        let key = match self.documents.values().find(|d| d.id == id) {
            Some(d) => d.document.access_key.clone(),
            None => self
                .shared
                .lock()
                .document_by_id(id)
                .map(|d| d.document.access_key.clone())
                .ok_or_else(|| StoreError::NotFound(format!("document {}", id)))?,
        };
        self.claim_document(&key).await?;
        if !self.documents.contains_key(&key) {
            let stored = self
                .visible_document(&key)
                .ok_or_else(|| StoreError::NotFound(format!("document {}", id)))?;
            self.documents.insert(key.clone(), stored);
        }
        Ok(key)
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.shared.lock().release(self.id);
            self.shared.released.notify_waiters();
        }
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.finish();
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn find_counterparty(&mut self, tax_id: &TaxId) -> StoreResult<Option<Uuid>> {
        if let Some((_, id, _)) = self.counterparties.iter().find(|(t, _, _)| t == tax_id) {
            return Ok(Some(*id));
        }
        Ok(self.shared.lock().counterparties.get(tax_id).map(|(id, _)| *id))
    }

    async fn insert_counterparty(&mut self, party: &Party) -> StoreResult<Uuid> {
        let tx = self.id;
        let tax_id = &party.tax_id;
        self.shared
            .wait_for("counterparty", |state| {
                if state.faults.failing_counterparty.as_ref() == Some(tax_id) {
                    return Some(Err(StoreError::Backend(format!("injected failure for {}", tax_id))));
                }
                if state.counterparties.contains_key(tax_id) {
                    return Some(Err(StoreError::UniqueViolation {
                        constraint: "counterparties_tax_id_key".to_string(),
                    }));
                }
                match state.party_claims.get(tax_id) {
                    Some(owner) if *owner != tx => None,
                    Some(_) => Some(Err(StoreError::UniqueViolation {
                        constraint: "counterparties_tax_id_key".to_string(),
                    })),
                    None => {
                        state.party_claims.insert(tax_id.clone(), tx);
                        Some(Ok(()))
                    },
                }
            })
            .await?;
        let id = Uuid::new_v4();
        self.counterparties.push((tax_id.clone(), id, party.clone()));
        Ok(id)
    }

    async fn find_vehicle(&mut self, plate: &Plate) -> StoreResult<Option<Uuid>> {
        if let Some((_, id, _)) = self.vehicles.iter().find(|(p, _, _)| p == plate) {
            return Ok(Some(*id));
        }
        Ok(self.shared.lock().vehicles.get(plate).map(|(id, _)| *id))
    }

    async fn insert_vehicle(&mut self, vehicle: &VehicleData) -> StoreResult<Uuid> {
        let tx = self.id;
        let plate = &vehicle.plate;
        self.shared
            .wait_for("vehicle", |state| {
                let violation = || {
                    Some(Err(StoreError::UniqueViolation {
                        constraint: "vehicles_plate_key".to_string(),
                    }))
                };
                if state.vehicles.contains_key(plate) {
                    return violation();
                }
                match state.vehicle_claims.get(plate) {
                    Some(owner) if *owner != tx => None,
                    Some(_) => violation(),
                    None => {
                        state.vehicle_claims.insert(plate.clone(), tx);
                        Some(Ok(()))
                    },
                }
            })
            .await?;
        let id = Uuid::new_v4();
        self.vehicles.push((plate.clone(), id, vehicle.clone()));
        Ok(id)
    }

    async fn find_document(&mut self, key: &AccessKey) -> StoreResult<Option<DocumentState>> {
        self.claim_document(key).await?;
        Ok(self.visible_document(key).map(|d| DocumentState {
            id: d.id,
            kind: d.document.kind(),
            cancelled: d.document.cancelled,
            closed: d.document.is_closed(),
        }))
    }

    async fn upsert_document(&mut self, document: &PrimaryDocument) -> StoreResult<UpsertOutcome> {
        let key = document.access_key.clone();
        self.claim_document(&key).await?;
        let outcome = match self.visible_document(&key) {
            Some(mut existing) => {
                if existing.document.kind() != document.kind() {
                    return Err(StoreError::KindConflict {
                        access_key: key.to_string(),
                    });
                }
                existing.document.absorb_update(document.clone());
                let outcome = UpsertOutcome {
                    id: existing.id,
                    created: false,
                };
                self.documents.insert(key, existing);
                outcome
            },
            None => {
                let id = Uuid::new_v4();
                self.documents.insert(
                    key,
                    StoredDocument {
                        id,
                        document: document.clone(),
                    },
                );
                UpsertOutcome { id, created: true }
            },
        };
        Ok(outcome)
    }

    async fn link_waybills(&mut self, manifest_id: Uuid, keys: &[AccessKey]) -> StoreResult<usize> {
        let mut linked = 0;
        for key in keys {
            let waybill = self
                .visible_document(key)
                .filter(|d| d.document.kind() == DocumentKind::Waybill);
            if let Some(waybill) = waybill {
                if !self.links.contains(&(manifest_id, waybill.id)) {
                    self.links.push((manifest_id, waybill.id));
                }
                linked += 1;
            }
        }
        Ok(linked)
    }

    async fn mark_cancelled(&mut self, document_id: Uuid) -> StoreResult<()> {
        let key = self.stage_document_by_id(document_id).await?;
        if let Some(stored) = self.documents.get_mut(&key) {
            stored.document.cancelled = true;
            stored.document.status_code = STATUS_CANCELLED.to_string();
        }
        Ok(())
    }

    async fn mark_closed(&mut self, document_id: Uuid, closed_at: DateTime<Utc>) -> StoreResult<()> {
        let key = self.stage_document_by_id(document_id).await?;
        match self.documents.get_mut(&key).map(|d| &mut d.document.details) {
            Some(DocumentDetails::Manifest(m)) => {
                m.closed = true;
                m.closed_at = m.closed_at.or(Some(closed_at));
                Ok(())
            },
            _ => Err(StoreError::NotFound(format!("manifest {}", document_id))),
        }
    }

    async fn mark_upload_processed(&mut self, upload_id: Uuid, key: &AccessKey) -> StoreResult<bool> {
        let pending = self
            .shared
            .lock()
            .uploads
            .get(&upload_id)
            .is_some_and(|u| u.status == UploadStatus::Pending);
        if pending {
            self.processed_uploads.push((upload_id, key.clone()));
        }
        Ok(pending)
    }

    async fn commit(mut self) -> StoreResult<()> {
        {
            let mut state = self.shared.lock();
            for (tax_id, id, party) in std::mem::take(&mut self.counterparties) {
                state.counterparties.insert(tax_id, (id, party));
            }
            for (plate, id, vehicle) in std::mem::take(&mut self.vehicles) {
                state.vehicles.insert(plate, (id, vehicle));
            }
            for (key, stored) in std::mem::take(&mut self.documents) {
                state.documents.insert(key, stored);
            }
            state.links.extend(std::mem::take(&mut self.links));
            let now = Utc::now();
            for (upload_id, key) in std::mem::take(&mut self.processed_uploads) {
                if let Some(upload) = state.uploads.get_mut(&upload_id) {
                    if upload.status == UploadStatus::Pending {
                        upload.status = UploadStatus::Processed;
                        upload.access_key = Some(key.to_string());
                        upload.failure_detail = None;
                        upload.processed_at = Some(now);
                    }
                }
            }
        }
        self.finish();
        Ok(())
    }

    async fn rollback(mut self) -> StoreResult<()> {
        self.finish();
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> StoreResult<MemoryTransaction> {
        let id = {
            let mut state = self.shared.lock();
            if state.faults.failing_begins > 0 {
                state.faults.failing_begins -= 1;
                return Err(StoreError::Unavailable("injected connection failure".to_string()));
            }
            state.next_tx += 1;
            state.next_tx
        };
        Ok(MemoryTransaction {
            id,
            shared: Arc::clone(&self.shared),
            counterparties: Vec::new(),
            vehicles: Vec::new(),
            documents: HashMap::new(),
            links: Vec::new(),
            processed_uploads: Vec::new(),
            finished: false,
        })
    }

    async fn create_upload(&self, filename: &str) -> StoreResult<Upload> {
        let upload = Upload::pending(filename);
        self.shared.lock().uploads.insert(upload.id, upload.clone());
        Ok(upload)
    }

    async fn create_uploads(&self, filenames: &[String]) -> StoreResult<Vec<Upload>> {
        let uploads: Vec<Upload> = filenames.iter().map(Upload::pending).collect();
        let mut state = self.shared.lock();
        for upload in &uploads {
            state.uploads.insert(upload.id, upload.clone());
        }
        Ok(uploads)
    }

    async fn mark_upload_failed(&self, upload_id: Uuid, detail: &str) -> StoreResult<bool> {
        let mut state = self.shared.lock();
        if state.faults.failing_failure_marks > 0 {
            state.faults.failing_failure_marks -= 1;
            return Err(StoreError::Unavailable("injected connection failure".to_string()));
        }
        match state.uploads.get_mut(&upload_id) {
            Some(upload) if upload.status == UploadStatus::Pending => {
                upload.status = UploadStatus::Failed;
                upload.failure_detail = Some(detail.to_string());
                upload.processed_at = Some(Utc::now());
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn get_upload(&self, upload_id: Uuid) -> StoreResult<Option<Upload>> {
        Ok(self.shared.lock().uploads.get(&upload_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfe_common::TaxId;

    fn party(cnpj: &str) -> Party {
        Party {
            tax_id: TaxId::cnpj(cnpj).unwrap(),
            legal_name: "Empresa".to_string(),
            state_registration: None,
            state: Some("SP".to_string()),
            municipality: None,
        }
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_counterparty(&party("11222333000181")).await.unwrap();
        assert_eq!(store.counterparty_count(), 0);
        tx.rollback().await.unwrap();
        assert_eq!(store.counterparty_count(), 0);

        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_counterparty(&party("11222333000181")).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.counterparty(&TaxId::cnpj("11222333000181").unwrap()).map(|c| c.0), Some(id));
    }

    #[tokio::test]
    async fn test_second_inserter_waits_then_violates() {
        let store = MemoryStore::new();
        let mut first = store.begin().await.unwrap();
        first.insert_counterparty(&party("11222333000181")).await.unwrap();

        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut second = store.begin().await.unwrap();
                second.insert_counterparty(&party("11222333000181")).await
            })
        };
        tokio::task::yield_now().await;
        first.commit().await.unwrap();

        let result = contender.await.unwrap();
        assert!(matches!(result, Err(StoreError::UniqueViolation { .. })));
        assert_eq!(store.counterparty_count(), 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_releases_claims() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_counterparty(&party("12345678000195")).await.unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_counterparty(&party("12345678000195")).await.is_ok());
    }

    #[tokio::test]
    async fn test_injected_begin_failures() {
        let store = MemoryStore::new();
        store.fail_next_begins(1);
        assert!(matches!(store.begin().await, Err(StoreError::Unavailable(_))));
        assert!(store.begin().await.is_ok());
    }

    #[tokio::test]
    async fn test_upload_transitions_are_guarded() {
        let store = MemoryStore::new();
        let upload = store.create_upload("a.xml").await.unwrap();
        assert!(store.mark_upload_failed(upload.id, "boom").await.unwrap());
        assert!(!store.mark_upload_failed(upload.id, "again").await.unwrap());
        let stored = store.get_upload(upload.id).await.unwrap().unwrap();
        assert_eq!(stored.status, UploadStatus::Failed);
        assert_eq!(stored.failure_detail.as_deref(), Some("boom"));
    }
}
