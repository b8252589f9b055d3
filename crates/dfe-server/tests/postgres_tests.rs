//! Ingestion against a real PostgreSQL started with testcontainers
//!
//! These tests require Docker. Run with:
//!
//! ```bash
//! cargo test --test postgres_tests -- --ignored --nocapture
//! ```

mod common;

use anyhow::{Context, Result};
use common::*;
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;

use dfe_server::ingest::{IngestAction, IngestError, IngestionCoordinator};
use dfe_server::models::UploadStatus;
use dfe_server::store::{DocumentStore, PgStore};

struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    async fn start() -> Result<Self> {
        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;
        let host = container.get_host().await.context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&format!("postgresql://postgres:postgres@{}:{}/postgres", host, port))
            .await
            .context("Failed to connect to PostgreSQL")?;

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    fn store(&self) -> Arc<PgStore> {
        Arc::new(PgStore::new(self.pool.clone()))
    }
}

async fn count(pool: &PgPool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.expect("count query")
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn test_waybill_upsert_is_idempotent() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("postgres");
    let store = pg.store();
    let coordinator = IngestionCoordinator::new(Arc::clone(&store), fast_config());
    let key = waybill_key(100);
    let xml = waybill_xml(&key, "3");

    let first = pending_upload(&*store, "a.xml").await;
    let outcome = coordinator.ingest(first, xml.as_bytes()).await.unwrap();
    assert_eq!(outcome.action, IngestAction::Created);

    let second = pending_upload(&*store, "b.xml").await;
    let outcome = coordinator.ingest(second, xml.as_bytes()).await.unwrap();
    assert_eq!(outcome.action, IngestAction::Updated);

    assert_eq!(count(&pg.pool, "SELECT COUNT(*) FROM documents").await, 1);
    assert_eq!(count(&pg.pool, "SELECT COUNT(*) FROM waybill_details").await, 1);
    assert_eq!(count(&pg.pool, "SELECT COUNT(*) FROM counterparties").await, 3);

    let freight: String = sqlx::query_scalar("SELECT freight_responsibility FROM waybill_details")
        .fetch_one(&pg.pool)
        .await
        .unwrap();
    assert_eq!(freight, "FOB");

    let upload = store.get_upload(second).await.unwrap().unwrap();
    assert_eq!(upload.status, UploadStatus::Processed);
    assert_eq!(upload.access_key.as_deref(), Some(key.as_str()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires Docker"]
#[serial]
async fn test_concurrent_ingestion_of_one_key_keeps_one_row() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("postgres");
    let store = pg.store();
    let coordinator = Arc::new(IngestionCoordinator::new(Arc::clone(&store), fast_config()));
    let xml = Arc::new(waybill_xml(&waybill_key(101), "0"));

    let mut tasks = Vec::new();
    for i in 0..6 {
        let upload_id = pending_upload(&*store, &format!("dup-{}.xml", i)).await;
        let coordinator = Arc::clone(&coordinator);
        let xml = Arc::clone(&xml);
        tasks.push(tokio::spawn(async move { coordinator.ingest(upload_id, xml.as_bytes()).await }));
    }
    for task in tasks {
        task.await.unwrap().expect("duplicate ingestion succeeds");
    }

    assert_eq!(count(&pg.pool, "SELECT COUNT(*) FROM documents").await, 1);
    assert_eq!(count(&pg.pool, "SELECT COUNT(*) FROM counterparties").await, 3);
    assert_eq!(
        count(&pg.pool, "SELECT COUNT(*) FROM uploads WHERE status = 'PROCESSED'").await,
        6
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires Docker"]
#[serial]
async fn test_concurrent_documents_share_one_new_counterparty() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("postgres");
    let store = pg.store();
    let coordinator = Arc::new(IngestionCoordinator::new(Arc::clone(&store), fast_config()));

    let mut tasks = Vec::new();
    for i in 0..8 {
        let upload_id = pending_upload(&*store, &format!("shared-{}.xml", i)).await;
        let xml = waybill_xml_with_sender(&waybill_key(110 + i), "0", NEW_SENDER_CNPJ);
        let coordinator = Arc::clone(&coordinator);
        tasks.push(tokio::spawn(async move { coordinator.ingest(upload_id, xml.as_bytes()).await }));
    }
    for task in tasks {
        let outcome = task.await.unwrap().expect("every document succeeds");
        assert_eq!(outcome.action, IngestAction::Created);
    }

    assert_eq!(count(&pg.pool, "SELECT COUNT(*) FROM documents").await, 8);
    let senders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM counterparties WHERE cnpj = $1")
        .bind(NEW_SENDER_CNPJ)
        .fetch_one(&pg.pool)
        .await
        .unwrap();
    assert_eq!(senders, 1);
    assert_eq!(count(&pg.pool, "SELECT COUNT(DISTINCT sender_id) FROM waybill_details").await, 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn test_events_and_links_persist() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("postgres");
    let store = pg.store();
    let coordinator = IngestionCoordinator::new(Arc::clone(&store), fast_config());
    let waybill = waybill_key(102);
    let manifest = manifest_key(103);

    let early = pending_upload(&*store, "cancel-early.xml").await;
    let err = coordinator
        .ingest(early, cancellation_xml(&waybill).as_bytes())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::TargetNotFound { .. }));
    let upload = store.get_upload(early).await.unwrap().unwrap();
    assert_eq!(upload.status, UploadStatus::Failed);

    let upload = pending_upload(&*store, "cte.xml").await;
    coordinator.ingest(upload, waybill_xml(&waybill, "0").as_bytes()).await.unwrap();
    let upload = pending_upload(&*store, "mdfe.xml").await;
    let outcome = coordinator
        .ingest(upload, manifest_xml(&manifest, &[waybill.clone()]).as_bytes())
        .await
        .unwrap();
    assert_eq!(outcome.linked_waybills, 1);
    assert_eq!(count(&pg.pool, "SELECT COUNT(*) FROM manifest_waybills").await, 1);

    let upload = pending_upload(&*store, "cancel.xml").await;
    coordinator.ingest(upload, cancellation_xml(&waybill).as_bytes()).await.unwrap();
    let upload = pending_upload(&*store, "enc.xml").await;
    coordinator.ingest(upload, closure_xml(&manifest).as_bytes()).await.unwrap();

    let (cancelled, status): (bool, String) =
        sqlx::query_as("SELECT cancelled, status_code FROM documents WHERE access_key = $1")
            .bind(&waybill)
            .fetch_one(&pg.pool)
            .await
            .unwrap();
    assert!(cancelled);
    assert_eq!(status, "101");
    assert_eq!(
        count(&pg.pool, "SELECT COUNT(*) FROM manifest_details WHERE closed AND closed_at IS NOT NULL").await,
        1
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn test_failed_ingestion_rolls_back_entities() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("postgres");
    let store = pg.store();
    let coordinator = IngestionCoordinator::new(Arc::clone(&store), fast_config());

    // Issuer and vehicle are inserted before the details row overflows
    // the driver CPF column.
    let xml = manifest_xml(&manifest_key(104), &[]).replace(
        &format!("<CPF>{}</CPF>", RECEIVER_CPF),
        "<CPF>529982247250000</CPF>",
    );
    let upload = pending_upload(&*store, "long-cpf.xml").await;
    let err = coordinator.ingest(upload, xml.as_bytes()).await.unwrap_err();
    assert!(!err.is_retryable());

    assert_eq!(count(&pg.pool, "SELECT COUNT(*) FROM counterparties").await, 0);
    assert_eq!(count(&pg.pool, "SELECT COUNT(*) FROM vehicles").await, 0);
    assert_eq!(count(&pg.pool, "SELECT COUNT(*) FROM documents").await, 0);
    let detail: Option<String> = sqlx::query_scalar("SELECT failure_detail FROM uploads WHERE id = $1")
        .bind(upload)
        .fetch_one(&pg.pool)
        .await
        .unwrap();
    assert!(detail.is_some());
}
