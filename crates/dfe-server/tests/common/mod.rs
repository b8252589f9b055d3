//! Shared fixtures for the ingestion integration tests
//!
//! Keys are built with a correct check digit from a fixed issuer CNPJ and a
//! per-test document number, so tests never collide within one store.

#![allow(dead_code)]

use dfe_common::access_key::complete_key;
use std::sync::Arc;

use dfe_server::ingest::{IngestConfig, IngestionCoordinator};
use dfe_server::store::{DocumentStore, MemoryStore};

pub const ISSUER_CNPJ: &str = "12345678000195";
pub const SENDER_CNPJ: &str = "11222333000181";
pub const RECEIVER_CPF: &str = "52998224725";
/// A sender no other fixture uses.
pub const NEW_SENDER_CNPJ: &str = "33000167000101";
pub const PLATE: &str = "ABC1D23";

/// A hand-written key whose last digit is 3 where the modulo-11 digit is 4.
///
/// With the default config it fails validation and only ingests with
/// check-digit verification off. [`CORRECTED_KEY`] is the same key with
/// the digit recomputed.
pub const BAD_CHECK_DIGIT_KEY: &str = "31234567890123456789012345678901234567890123";

/// [`BAD_CHECK_DIGIT_KEY`] with its check digit fixed by `complete_key`.
pub const CORRECTED_KEY: &str = "31234567890123456789012345678901234567890124";

pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,dfe_server=debug,sqlx=warn,testcontainers=info")),
        )
        .with_test_writer()
        .try_init();
}

fn key(model: &str, number: u32) -> String {
    let prefix = format!("352401{}{}001{:09}1{:08}", ISSUER_CNPJ, model, number, number);
    complete_key(&prefix).expect("valid key prefix").to_string()
}

pub fn waybill_key(number: u32) -> String {
    key("57", number)
}

pub fn manifest_key(number: u32) -> String {
    key("58", number)
}

/// Config with millisecond backoff so retry tests stay fast.
pub fn fast_config() -> IngestConfig {
    IngestConfig {
        workers: 2,
        queue_capacity: 16,
        retry_backoff_ms: 1,
        ..IngestConfig::default()
    }
}

pub fn coordinator(store: &Arc<MemoryStore>) -> IngestionCoordinator<MemoryStore> {
    IngestionCoordinator::new(Arc::clone(store), fast_config())
}

/// Register a pending upload the way intake would.
pub async fn pending_upload<S: DocumentStore>(store: &S, filename: &str) -> uuid::Uuid {
    store.create_upload(filename).await.expect("create upload").id
}

pub fn waybill_xml(key: &str, toma: &str) -> String {
    waybill_xml_with_status(key, toma, "100")
}

pub fn waybill_xml_with_status(key: &str, toma: &str, status: &str) -> String {
    waybill_xml_with(key, toma, status, SENDER_CNPJ)
}

pub fn waybill_xml_with_sender(key: &str, toma: &str, sender_cnpj: &str) -> String {
    waybill_xml_with(key, toma, "100", sender_cnpj)
}

fn waybill_xml_with(key: &str, toma: &str, status: &str, sender_cnpj: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<cteProc xmlns="http://www.portalfiscal.inf.br/cte" versao="4.00">
  <CTe>
    <infCte Id="CTe{key}" versao="4.00">
      <ide>
        <CFOP>6353</CFOP>
        <serie>1</serie>
        <nCT>123</nCT>
        <dhEmi>2024-01-15T10:30:00-03:00</dhEmi>
        <xMunIni>SAO PAULO</xMunIni>
        <UFIni>SP</UFIni>
        <xMunFim>BELO HORIZONTE</xMunFim>
        <UFFim>MG</UFFim>
        <toma3><toma>{toma}</toma></toma3>
      </ide>
      <compl>
        <ObsCont xCampo="PLACA"><xTexto>{PLATE}</xTexto></ObsCont>
      </compl>
      <emit>
        <CNPJ>{ISSUER_CNPJ}</CNPJ>
        <IE>123456789</IE>
        <xNome>Transportes Exemplo Ltda</xNome>
        <enderEmit><xMun>SAO PAULO</xMun><UF>SP</UF></enderEmit>
      </emit>
      <rem>
        <CNPJ>{sender_cnpj}</CNPJ>
        <xNome>Remetente SA</xNome>
        <enderReme><xMun>CAMPINAS</xMun><UF>SP</UF></enderReme>
      </rem>
      <dest>
        <CPF>{RECEIVER_CPF}</CPF>
        <xNome>Jose Destinatario</xNome>
        <enderDest><xMun>BELO HORIZONTE</xMun><UF>MG</UF></enderDest>
      </dest>
      <vPrest><vTPrest>1500.50</vTPrest></vPrest>
      <infCTeNorm>
        <infCarga><vCarga>25000.00</vCarga><proPred>ELETRONICOS</proPred></infCarga>
        <infModal versaoModal="4.00"><rodo><RNTRC>12345678</RNTRC></rodo></infModal>
      </infCTeNorm>
    </infCte>
  </CTe>
  <protCTe versao="4.00">
    <infProt>
      <chCTe>{key}</chCTe>
      <dhRecbto>2024-01-15T10:35:00-03:00</dhRecbto>
      <nProt>135240000012345</nProt>
      <cStat>{status}</cStat>
    </infProt>
  </protCTe>
</cteProc>"#
    )
}

pub fn manifest_xml(key: &str, waybill_keys: &[String]) -> String {
    let waybills: String = waybill_keys
        .iter()
        .map(|k| format!("<infCTe><chCTe>{}</chCTe></infCTe>", k))
        .collect();
    format!(
        r#"<mdfeProc xmlns="http://www.portalfiscal.inf.br/mdfe" versao="3.00">
  <MDFe>
    <infMDFe Id="MDFe{key}" versao="3.00">
      <ide>
        <serie>1</serie>
        <nMDF>77</nMDF>
        <dhEmi>2024-01-20T08:00:00-03:00</dhEmi>
        <UFIni>SP</UFIni>
        <UFFim>MG</UFFim>
        <infMunCarrega><cMunCarrega>3550308</cMunCarrega><xMunCarrega>SAO PAULO</xMunCarrega></infMunCarrega>
      </ide>
      <emit>
        <CNPJ>{ISSUER_CNPJ}</CNPJ>
        <IE>123456789</IE>
        <xNome>Transportes Exemplo Ltda</xNome>
        <enderEmit><xMun>SAO PAULO</xMun><UF>SP</UF></enderEmit>
      </emit>
      <infModal versaoModal="3.00">
        <rodo>
          <infANTT><RNTRC>12345678</RNTRC></infANTT>
          <veicTracao>
            <placa>{PLATE}</placa>
            <RENAVAM>123456789</RENAVAM>
            <condutor><xNome>JOAO DA SILVA</xNome><CPF>{RECEIVER_CPF}</CPF></condutor>
            <UF>SP</UF>
          </veicTracao>
        </rodo>
      </infModal>
      <infDoc>
        <infMunDescarga>
          <cMunDescarga>3106200</cMunDescarga>
          <xMunDescarga>BELO HORIZONTE</xMunDescarga>
          {waybills}
        </infMunDescarga>
      </infDoc>
      <tot>
        <qCTe>{count}</qCTe>
        <vCarga>50000.00</vCarga>
        <cUnid>01</cUnid>
        <qCarga>1250.5000</qCarga>
      </tot>
    </infMDFe>
  </MDFe>
  <protMDFe versao="3.00">
    <infProt>
      <chMDFe>{key}</chMDFe>
      <dhRecbto>2024-01-20T08:05:00-03:00</dhRecbto>
      <nProt>935240000000077</nProt>
      <cStat>100</cStat>
    </infProt>
  </protMDFe>
</mdfeProc>"#,
        count = waybill_keys.len(),
    )
}

pub fn cancellation_xml(waybill_key: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<procEventoCTe xmlns="http://www.portalfiscal.inf.br/cte" versao="4.00">
  <eventoCTe versao="4.00">
    <infEvento Id="ID110111{waybill_key}01">
      <CNPJ>{ISSUER_CNPJ}</CNPJ>
      <chCTe>{waybill_key}</chCTe>
      <dhEvento>2024-01-16T09:00:00-03:00</dhEvento>
      <tpEvento>110111</tpEvento>
      <nSeqEvento>1</nSeqEvento>
      <detEvento versaoEvento="4.00">
        <evCancCTe>
          <descEvento>Cancelamento</descEvento>
          <nProt>135240000012345</nProt>
          <xJust>Erro na emissao do documento</xJust>
        </evCancCTe>
      </detEvento>
    </infEvento>
  </eventoCTe>
  <retEventoCTe versao="4.00">
    <infEvento>
      <cStat>135</cStat>
      <nProt>135240000099999</nProt>
    </infEvento>
  </retEventoCTe>
</procEventoCTe>"#
    )
}

pub fn closure_xml(manifest_key: &str) -> String {
    format!(
        r#"<eventoMDFe versao="3.00">
  <infEvento Id="ID110112{manifest_key}01">
    <chMDFe>{manifest_key}</chMDFe>
    <dhEvento>2024-01-21T18:00:00-03:00</dhEvento>
    <tpEvento>110112</tpEvento>
    <nSeqEvento>1</nSeqEvento>
    <detEvento versaoEvento="3.00">
      <evEncMDFe>
        <descEvento>Encerramento</descEvento>
        <nProt>935240000000077</nProt>
        <dtEnc>2024-01-21</dtEnc>
        <cUF>31</cUF>
        <cMun>3106200</cMun>
      </evEncMDFe>
    </detEvento>
  </infEvento>
</eventoMDFe>"#
    )
}
