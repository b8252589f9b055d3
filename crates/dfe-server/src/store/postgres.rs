//! PostgreSQL store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dfe_common::{AccessKey, Plate, TaxId};
use sqlx::postgres::{PgArguments, PgPool, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::{DocumentStore, StoreError, StoreResult, StoreTransaction, UpsertOutcome};
use crate::ingest::parsed::{Party, VehicleData};
use crate::models::{
    DocumentDetails, DocumentKind, DocumentState, ManifestDetails, PrimaryDocument, Upload, UploadStatus,
    WaybillDetails,
};

const UPLOAD_COLUMNS: &str =
    "id, filename, status, submitted_at, access_key, failure_detail, processed_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

fn upload_from_row(row: &PgRow) -> StoreResult<Upload> {
    let status: String = row.try_get("status")?;
    let access_key: Option<String> = row.try_get("access_key")?;
    Ok(Upload {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        status: status.parse::<UploadStatus>().map_err(StoreError::Corrupt)?,
        submitted_at: row.try_get("submitted_at")?,
        access_key: access_key.map(|k| k.trim().to_string()),
        failure_detail: row.try_get("failure_detail")?,
        processed_at: row.try_get("processed_at")?,
    })
}

impl PgTransaction {
    /// Run `insert` inside a savepoint so a unique violation leaves the
    /// outer transaction usable for the follow-up lookup.
    async fn with_savepoint(&mut self, insert: Query<'_, Postgres, PgArguments>) -> StoreResult<()> {
        sqlx::query("SAVEPOINT resolve_entity").execute(&mut *self.tx).await?;
        match insert.execute(&mut *self.tx).await {
            Ok(_) => {
                sqlx::query("RELEASE SAVEPOINT resolve_entity").execute(&mut *self.tx).await?;
                Ok(())
            },
            Err(e) => {
                sqlx::query("ROLLBACK TO SAVEPOINT resolve_entity")
                    .execute(&mut *self.tx)
                    .await?;
                Err(e.into())
            },
        }
    }

    async fn upsert_waybill_details(&mut self, document_id: Uuid, w: &WaybillDetails) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO waybill_details (
                document_id, sender_id, receiver_id, payer_id, cfop, freight_responsibility,
                cargo_value, vehicle_plate, carrier_rntrc, observations, invoice_keys
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (document_id) DO UPDATE SET
                sender_id = EXCLUDED.sender_id,
                receiver_id = EXCLUDED.receiver_id,
                payer_id = EXCLUDED.payer_id,
                cfop = EXCLUDED.cfop,
                freight_responsibility = EXCLUDED.freight_responsibility,
                cargo_value = EXCLUDED.cargo_value,
                vehicle_plate = EXCLUDED.vehicle_plate,
                carrier_rntrc = EXCLUDED.carrier_rntrc,
                observations = EXCLUDED.observations,
                invoice_keys = EXCLUDED.invoice_keys
            "#,
        )
        .bind(document_id)
        .bind(w.sender_id)
        .bind(w.receiver_id)
        .bind(w.payer_id)
        .bind(&w.cfop)
        .bind(w.freight.as_str())
        .bind(&w.cargo_value)
        .bind(&w.vehicle_plate)
        .bind(&w.carrier_rntrc)
        .bind(&w.observations)
        .bind(&w.invoice_keys)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn upsert_manifest_details(&mut self, document_id: Uuid, m: &ManifestDetails) -> StoreResult<()> {
        let insurance = m.insurance.clone().unwrap_or_default();
        sqlx::query(
            r#"
            INSERT INTO manifest_details (
                document_id, towing_vehicle_id, driver_name, driver_tax_id, carrier_rntrc,
                waybill_count, invoice_count, gross_weight, cargo_value, predominant_product,
                cargo_type, loading_municipality, closed, closed_at, insurer_name, insurer_tax_id,
                policy_number, endorsement_number, waybill_keys, invoice_keys
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            ON CONFLICT (document_id) DO UPDATE SET
                towing_vehicle_id = EXCLUDED.towing_vehicle_id,
                driver_name = EXCLUDED.driver_name,
                driver_tax_id = EXCLUDED.driver_tax_id,
                carrier_rntrc = EXCLUDED.carrier_rntrc,
                waybill_count = EXCLUDED.waybill_count,
                invoice_count = EXCLUDED.invoice_count,
                gross_weight = EXCLUDED.gross_weight,
                cargo_value = EXCLUDED.cargo_value,
                predominant_product = EXCLUDED.predominant_product,
                cargo_type = EXCLUDED.cargo_type,
                loading_municipality = EXCLUDED.loading_municipality,
                closed = manifest_details.closed OR EXCLUDED.closed,
                closed_at = COALESCE(manifest_details.closed_at, EXCLUDED.closed_at),
                insurer_name = EXCLUDED.insurer_name,
                insurer_tax_id = EXCLUDED.insurer_tax_id,
                policy_number = EXCLUDED.policy_number,
                endorsement_number = EXCLUDED.endorsement_number,
                waybill_keys = EXCLUDED.waybill_keys,
                invoice_keys = EXCLUDED.invoice_keys
            "#,
        )
        .bind(document_id)
        .bind(m.towing_vehicle_id)
        .bind(&m.driver_name)
        .bind(&m.driver_tax_id)
        .bind(&m.carrier_rntrc)
        .bind(m.waybill_count)
        .bind(m.invoice_count)
        .bind(&m.gross_weight)
        .bind(&m.cargo_value)
        .bind(&m.predominant_product)
        .bind(&m.cargo_type)
        .bind(&m.loading_municipality)
        .bind(m.closed)
        .bind(m.closed_at)
        .bind(&insurance.insurer_name)
        .bind(&insurance.insurer_tax_id)
        .bind(&insurance.policy_number)
        .bind(&insurance.endorsement_number)
        .bind(&m.waybill_keys)
        .bind(&m.invoice_keys)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn find_counterparty(&mut self, tax_id: &TaxId) -> StoreResult<Option<Uuid>> {
        let sql = match tax_id {
            TaxId::Cnpj(_) => "SELECT id FROM counterparties WHERE cnpj = $1",
            TaxId::Cpf(_) => "SELECT id FROM counterparties WHERE cpf = $1",
        };
        let id = sqlx::query_scalar(sql)
            .bind(tax_id.digits())
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(id)
    }

    async fn insert_counterparty(&mut self, party: &Party) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        let (cnpj, cpf) = match &party.tax_id {
            TaxId::Cnpj(d) => (Some(d.as_str()), None),
            TaxId::Cpf(d) => (None, Some(d.as_str())),
        };
        let insert = sqlx::query(
            r#"
            INSERT INTO counterparties (id, cnpj, cpf, legal_name, state_registration, state, municipality)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(cnpj)
        .bind(cpf)
        .bind(&party.legal_name)
        .bind(&party.state_registration)
        .bind(&party.state)
        .bind(&party.municipality);
        self.with_savepoint(insert).await?;
        Ok(id)
    }

    async fn find_vehicle(&mut self, plate: &Plate) -> StoreResult<Option<Uuid>> {
        let id = sqlx::query_scalar("SELECT id FROM vehicles WHERE plate = $1")
            .bind(plate.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(id)
    }

    async fn insert_vehicle(&mut self, vehicle: &VehicleData) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        let insert = sqlx::query(
            "INSERT INTO vehicles (id, plate, class, state, renavam) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(vehicle.plate.as_str())
        .bind(vehicle.class.as_str())
        .bind(&vehicle.state)
        .bind(&vehicle.renavam);
        self.with_savepoint(insert).await?;
        Ok(id)
    }

    async fn find_document(&mut self, key: &AccessKey) -> StoreResult<Option<DocumentState>> {
        let row = sqlx::query(
            r#"
            SELECT d.id, d.kind, d.cancelled, COALESCE(m.closed, FALSE) AS closed
            FROM documents d
            LEFT JOIN manifest_details m ON m.document_id = d.id
            WHERE d.access_key = $1
            FOR UPDATE OF d
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(|row| {
            let kind: String = row.try_get("kind")?;
            Ok(DocumentState {
                id: row.try_get("id")?,
                kind: kind.parse::<DocumentKind>().map_err(StoreError::Corrupt)?,
                cancelled: row.try_get("cancelled")?,
                closed: row.try_get("closed")?,
            })
        })
        .transpose()
    }

    async fn upsert_document(&mut self, document: &PrimaryDocument) -> StoreResult<UpsertOutcome> {
        let row = sqlx::query(
            r#"
            INSERT INTO documents (
                id, access_key, kind, number, series, issued_at, status_code, protocol,
                authorized_at, cancelled, total_value, origin_state, destination_state,
                origin_municipality, destination_municipality, issuer_id, upload_id, raw_xml
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (access_key) DO UPDATE SET
                number = EXCLUDED.number,
                series = EXCLUDED.series,
                issued_at = EXCLUDED.issued_at,
                status_code = CASE WHEN documents.cancelled THEN documents.status_code
                                   ELSE EXCLUDED.status_code END,
                protocol = COALESCE(EXCLUDED.protocol, documents.protocol),
                authorized_at = COALESCE(EXCLUDED.authorized_at, documents.authorized_at),
                cancelled = documents.cancelled OR EXCLUDED.cancelled,
                total_value = EXCLUDED.total_value,
                origin_state = EXCLUDED.origin_state,
                destination_state = EXCLUDED.destination_state,
                origin_municipality = EXCLUDED.origin_municipality,
                destination_municipality = EXCLUDED.destination_municipality,
                issuer_id = EXCLUDED.issuer_id,
                upload_id = EXCLUDED.upload_id,
                raw_xml = EXCLUDED.raw_xml,
                processed_at = NOW(),
                updated_at = NOW()
            WHERE documents.kind = EXCLUDED.kind
            RETURNING id, (xmax = 0) AS inserted
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(document.access_key.as_str())
        .bind(document.kind().as_str())
        .bind(document.number)
        .bind(document.series)
        .bind(document.issued_at)
        .bind(&document.status_code)
        .bind(&document.protocol)
        .bind(document.authorized_at)
        .bind(document.cancelled)
        .bind(&document.total_value)
        .bind(&document.origin_state)
        .bind(&document.destination_state)
        .bind(&document.origin_municipality)
        .bind(&document.destination_municipality)
        .bind(document.issuer_id)
        .bind(document.upload_id)
        .bind(&document.raw_xml)
        .fetch_optional(&mut *self.tx)
        .await?;

        let row = row.ok_or_else(|| StoreError::KindConflict {
            access_key: document.access_key.to_string(),
        })?;
        let outcome = UpsertOutcome {
            id: row.try_get("id")?,
            created: row.try_get("inserted")?,
        };

        match &document.details {
            DocumentDetails::Waybill(w) => self.upsert_waybill_details(outcome.id, w).await?,
            DocumentDetails::Manifest(m) => self.upsert_manifest_details(outcome.id, m).await?,
        }
        debug!(access_key = %document.access_key, created = outcome.created, "Document upserted");
        Ok(outcome)
    }

    async fn link_waybills(&mut self, manifest_id: Uuid, keys: &[AccessKey]) -> StoreResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let keys: Vec<&str> = keys.iter().map(AccessKey::as_str).collect();
        sqlx::query(
            r#"
            INSERT INTO manifest_waybills (manifest_id, waybill_id)
            SELECT $1, d.id FROM documents d
            WHERE d.access_key = ANY($2) AND d.kind = 'WAYBILL'
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(manifest_id)
        .bind(&keys)
        .execute(&mut *self.tx)
        .await?;

        let linked: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM manifest_waybills mw
            JOIN documents d ON d.id = mw.waybill_id
            WHERE mw.manifest_id = $1 AND d.access_key = ANY($2)
            "#,
        )
        .bind(manifest_id)
        .bind(&keys)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(usize::try_from(linked).unwrap_or_default())
    }

    async fn mark_cancelled(&mut self, document_id: Uuid) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE documents SET cancelled = TRUE, status_code = '101', updated_at = NOW() WHERE id = $1",
        )
        .bind(document_id)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("document {}", document_id)));
        }
        Ok(())
    }

    async fn mark_closed(&mut self, document_id: Uuid, closed_at: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE manifest_details SET closed = TRUE, closed_at = COALESCE(closed_at, $2) WHERE document_id = $1",
        )
        .bind(document_id)
        .bind(closed_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("manifest {}", document_id)));
        }
        sqlx::query("UPDATE documents SET updated_at = NOW() WHERE id = $1")
            .bind(document_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn mark_upload_processed(&mut self, upload_id: Uuid, key: &AccessKey) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE uploads
            SET status = 'PROCESSED', access_key = $2, failure_detail = NULL, processed_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(upload_id)
        .bind(key.as_str())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    type Tx = PgTransaction;

    async fn begin(&self) -> StoreResult<PgTransaction> {
        let tx = self.pool.begin().await?;
        Ok(PgTransaction { tx })
    }

    async fn create_upload(&self, filename: &str) -> StoreResult<Upload> {
        let row = sqlx::query(&format!(
            "INSERT INTO uploads (id, filename, status) VALUES ($1, $2, 'PENDING') RETURNING {}",
            UPLOAD_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(filename)
        .fetch_one(&self.pool)
        .await?;
        upload_from_row(&row)
    }

    async fn create_uploads(&self, filenames: &[String]) -> StoreResult<Vec<Upload>> {
        let mut tx = self.pool.begin().await?;
        let mut uploads = Vec::with_capacity(filenames.len());
        let sql = format!(
            "INSERT INTO uploads (id, filename, status) VALUES ($1, $2, 'PENDING') RETURNING {}",
            UPLOAD_COLUMNS
        );
        for filename in filenames {
            let row = sqlx::query(&sql)
                .bind(Uuid::new_v4())
                .bind(filename)
                .fetch_one(&mut *tx)
                .await?;
            uploads.push(upload_from_row(&row)?);
        }
        tx.commit().await?;
        Ok(uploads)
    }

    async fn mark_upload_failed(&self, upload_id: Uuid, detail: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE uploads
            SET status = 'FAILED', failure_detail = $2, processed_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(upload_id)
        .bind(detail)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_upload(&self, upload_id: Uuid) -> StoreResult<Option<Upload>> {
        let row = sqlx::query(&format!("SELECT {} FROM uploads WHERE id = $1", UPLOAD_COLUMNS))
            .bind(upload_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(upload_from_row).transpose()
    }
}
