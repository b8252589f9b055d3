//! Per-document ingestion
//!
//! One job runs detect, decode, validate and then a single store
//! transaction that resolves entities, upserts the document or applies the
//! event, and marks the upload processed. Any failure rolls the
//! transaction back and records the reason on the upload instead.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::config::IngestConfig;
use super::decoder::{self, as_utf8};
use super::detector::{detect, DocumentType};
use super::error::{IngestError, ValidationError};
use super::parsed::{EventType, ParsedEvent, ParsedManifest, ParsedPayload, ParsedWaybill, Party};
use super::resolver::EntityResolver;
use super::validate::{validate_manifest, validate_waybill};
use crate::models::{DocumentDetails, DocumentKind, ManifestDetails, PrimaryDocument, WaybillDetails};
use crate::store::{DocumentStore, StoreTransaction, UpsertOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IngestStage {
    Detecting,
    Decoding,
    Resolving,
    Committing,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IngestStage::Detecting => "detecting",
            IngestStage::Decoding => "decoding",
            IngestStage::Resolving => "resolving",
            IngestStage::Committing => "committing",
        })
    }
}

/// What a successful ingestion did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestAction {
    Created,
    Updated,
    EventApplied(EventType),
    /// The target already carried this event's effect.
    EventAlreadyApplied(EventType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub upload_id: Uuid,
    pub access_key: String,
    pub kind: DocumentKind,
    pub action: IngestAction,
    /// Waybills linked to a manifest by this ingestion; zero otherwise.
    pub linked_waybills: usize,
}

pub struct IngestionCoordinator<S: DocumentStore> {
    store: Arc<S>,
    config: IngestConfig,
    resolver: EntityResolver,
}

impl<S: DocumentStore> IngestionCoordinator<S> {
    pub fn new(store: Arc<S>, config: IngestConfig) -> Self {
        Self {
            store,
            config,
            resolver: EntityResolver::default(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingest one payload for an already created upload.
    ///
    /// On failure the upload is moved to FAILED with the error text; the
    /// error is still returned to the caller.
    #[instrument(skip(self, content), fields(bytes = content.len()))]
    pub async fn ingest(&self, upload_id: Uuid, content: &[u8]) -> Result<IngestOutcome, IngestError> {
        match self.process(upload_id, content).await {
            Ok(outcome) => {
                info!(
                    access_key = %outcome.access_key,
                    kind = %outcome.kind,
                    action = ?outcome.action,
                    linked_waybills = outcome.linked_waybills,
                    "Upload processed"
                );
                Ok(outcome)
            },
            Err(err) => {
                warn!(error = %err, "Upload failed");
                self.record_failure(upload_id, &err.failure_detail()).await;
                Err(err)
            },
        }
    }

    /// Move an upload to FAILED outside any ingestion transaction.
    ///
    /// Transient store failures are retried with the same backoff as the
    /// ingestion itself.
    pub async fn record_failure(&self, upload_id: Uuid, detail: &str) {
        match self.with_retry(|| self.mark_failed(upload_id, detail)).await {
            Ok(true) => {},
            Ok(false) => warn!(%upload_id, "Upload was no longer pending, failure not recorded"),
            Err(e) => error!(%upload_id, error = %e, "Could not record upload failure"),
        }
    }

    async fn mark_failed(&self, upload_id: Uuid, detail: &str) -> Result<bool, IngestError> {
        Ok(self.store.mark_upload_failed(upload_id, detail).await?)
    }

    /// Run the pipeline; a successful run marks the upload PROCESSED inside
    /// its transaction, a failed one leaves the upload untouched.
    pub async fn process(&self, upload_id: Uuid, content: &[u8]) -> Result<IngestOutcome, IngestError> {
        debug!(stage = %IngestStage::Detecting);
        let doc_type = detect(content);
        if doc_type == DocumentType::Unrecognized {
            return Err(IngestError::Unrecognized);
        }

        debug!(stage = %IngestStage::Decoding, doc_type = %doc_type);
        let payload = decoder::decode(content, doc_type)?;
        match &payload {
            ParsedPayload::Waybill(w) => validate_waybill(w, &self.config)?,
            ParsedPayload::Manifest(m) => validate_manifest(m, &self.config)?,
            ParsedPayload::Event(_) => {},
        }

        let raw = as_utf8(content)?;
        self.with_retry(|| self.attempt(upload_id, &payload, raw)).await
    }

    /// Retry transient store failures with exponential backoff.
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, IngestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, IngestError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(err) if err.is_retryable() && attempt < self.config.max_store_retries => {
                    let delay = self.config.backoff(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "Transient store failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                result => return result,
            }
        }
    }

    async fn attempt(
        &self,
        upload_id: Uuid,
        payload: &ParsedPayload,
        raw: &str,
    ) -> Result<IngestOutcome, IngestError> {
        debug!(stage = %IngestStage::Resolving, access_key = %payload.access_key());
        let mut tx = self.store.begin().await?;
        match self.apply(&mut tx, upload_id, payload, raw).await {
            Ok(outcome) => {
                debug!(stage = %IngestStage::Committing);
                tx.commit().await?;
                Ok(outcome)
            },
            Err(err) => {
                if let Err(e) = tx.rollback().await {
                    warn!(error = %e, "Rollback failed");
                }
                Err(err)
            },
        }
    }

    async fn apply(
        &self,
        tx: &mut S::Tx,
        upload_id: Uuid,
        payload: &ParsedPayload,
        raw: &str,
    ) -> Result<IngestOutcome, IngestError> {
        let (action, linked_waybills) = match payload {
            ParsedPayload::Waybill(w) => (self.apply_waybill(tx, upload_id, w, raw).await?, 0),
            ParsedPayload::Manifest(m) => self.apply_manifest(tx, upload_id, m, raw).await?,
            ParsedPayload::Event(e) => (self.apply_event(tx, e).await?, 0),
        };

        let key = payload.access_key();
        if !tx.mark_upload_processed(upload_id, key).await? {
            warn!(%upload_id, "Upload was not pending; document stored without status change");
        }
        Ok(IngestOutcome {
            upload_id,
            access_key: key.to_string(),
            kind: payload.kind(),
            action,
            linked_waybills,
        })
    }

    async fn apply_waybill(
        &self,
        tx: &mut S::Tx,
        upload_id: Uuid,
        w: &ParsedWaybill,
        raw: &str,
    ) -> Result<IngestAction, IngestError> {
        let ids = self.resolver.resolve_parties(tx, &w.parties()).await?;
        let id_of = |party: &Party| {
            ids.get(&party.tax_id)
                .copied()
                .ok_or_else(|| IngestError::Unresolved(party.tax_id.to_string()))
        };

        let details = WaybillDetails {
            sender_id: id_of(&w.sender)?,
            receiver_id: id_of(&w.receiver)?,
            payer_id: w.payer().map(id_of).transpose()?,
            cfop: w.cfop.clone(),
            freight: w.freight,
            cargo_value: w.cargo_value.clone(),
            vehicle_plate: w.vehicle_plate.clone(),
            carrier_rntrc: w.carrier_rntrc.clone(),
            observations: w.observations.clone(),
            invoice_keys: w.invoice_keys.iter().map(|k| k.to_string()).collect(),
        };
        let document = primary_document(
            &w.header,
            id_of(&w.header.issuer)?,
            upload_id,
            raw,
            DocumentDetails::Waybill(details),
        );
        let outcome = tx.upsert_document(&document).await?;
        Ok(upsert_action(outcome))
    }

    async fn apply_manifest(
        &self,
        tx: &mut S::Tx,
        upload_id: Uuid,
        m: &ParsedManifest,
        raw: &str,
    ) -> Result<(IngestAction, usize), IngestError> {
        let issuer_id = self.resolver.resolve_counterparty(tx, &m.header.issuer).await?;
        let vehicle_id = self.resolver.resolve_vehicle(tx, &m.vehicle).await?;

        let details = ManifestDetails {
            towing_vehicle_id: vehicle_id,
            driver_name: m.driver_name.clone().ok_or(ValidationError::MissingDriverName)?,
            driver_tax_id: m.driver_tax_id.clone().ok_or(ValidationError::MissingDriverTaxId)?,
            carrier_rntrc: m.carrier_rntrc.clone(),
            waybill_count: m.waybill_count,
            invoice_count: m.invoice_count,
            gross_weight: m.gross_weight.clone(),
            cargo_value: m.cargo_value.clone(),
            predominant_product: m.predominant_product.clone(),
            cargo_type: m.cargo_type.clone(),
            loading_municipality: m.loading_municipality.clone(),
            closed: false,
            closed_at: None,
            insurance: m.insurance.clone(),
            waybill_keys: m.waybill_keys.iter().map(|k| k.to_string()).collect(),
            invoice_keys: m.invoice_keys.iter().map(|k| k.to_string()).collect(),
        };
        let document = primary_document(&m.header, issuer_id, upload_id, raw, DocumentDetails::Manifest(details));
        let outcome = tx.upsert_document(&document).await?;

        let linked = tx.link_waybills(outcome.id, &m.waybill_keys).await?;
        if linked < m.waybill_keys.len() {
            debug!(
                referenced = m.waybill_keys.len(),
                linked,
                "Some referenced waybills are not ingested yet"
            );
        }
        Ok((upsert_action(outcome), linked))
    }

    async fn apply_event(&self, tx: &mut S::Tx, event: &ParsedEvent) -> Result<IngestAction, IngestError> {
        let target = tx
            .find_document(&event.target_key)
            .await?
            .ok_or_else(|| IngestError::TargetNotFound {
                key: event.target_key.to_string(),
            })?;
        if target.kind != event.target_kind {
            return Err(IngestError::KindConflict {
                key: event.target_key.to_string(),
            });
        }

        let already_applied = match event.event_type {
            EventType::Cancellation => target.cancelled,
            EventType::Closure => target.closed,
        };
        if already_applied {
            debug!(event = %event.event_type, "Event effect already present");
            return Ok(IngestAction::EventAlreadyApplied(event.event_type));
        }

        match event.event_type {
            EventType::Cancellation => tx.mark_cancelled(target.id).await?,
            EventType::Closure => tx.mark_closed(target.id, event.closure_time()).await?,
        }
        Ok(IngestAction::EventApplied(event.event_type))
    }
}

fn upsert_action(outcome: UpsertOutcome) -> IngestAction {
    if outcome.created {
        IngestAction::Created
    } else {
        IngestAction::Updated
    }
}

fn primary_document(
    header: &super::parsed::DocumentHeader,
    issuer_id: Uuid,
    upload_id: Uuid,
    raw: &str,
    details: DocumentDetails,
) -> PrimaryDocument {
    PrimaryDocument {
        access_key: header.access_key.clone(),
        number: header.number,
        series: header.series,
        issued_at: header.issued_at,
        status_code: header.status_code.clone(),
        protocol: header.protocol.clone(),
        authorized_at: header.authorized_at,
        cancelled: header.is_cancelled(),
        total_value: header.total_value.clone(),
        origin_state: header.origin_state.clone(),
        destination_state: header.destination_state.clone(),
        origin_municipality: header.origin_municipality.clone(),
        destination_municipality: header.destination_municipality.clone(),
        issuer_id,
        upload_id: Some(upload_id),
        raw_xml: raw.to_string(),
        details,
    }
}
