//! Structural mirrors of the government XML schemas
//!
//! These types are `quick-xml` serde targets only. Every leaf is kept as
//! text and every element is optional so that the decoder, not serde, reports
//! missing or malformed fields with a named error.
//!
//! Attributes are mapped with the `@` prefix (`@Id`, `@versao`). Unknown
//! elements and attributes, including namespaces and signatures, are ignored.

pub mod event;
pub mod manifest;
pub mod waybill;

use serde::Deserialize;

/// Address block shared by every party (`enderEmit`, `enderReme`, ...).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Address {
    #[serde(rename = "xMun")]
    pub municipality: Option<String>,
    #[serde(rename = "UF")]
    pub state: Option<String>,
    #[serde(rename = "CEP")]
    pub postal_code: Option<String>,
}

/// Issuer, sender or receiver block.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Participant {
    #[serde(rename = "CNPJ")]
    pub cnpj: Option<String>,
    #[serde(rename = "CPF")]
    pub cpf: Option<String>,
    #[serde(rename = "IE")]
    pub state_registration: Option<String>,
    #[serde(rename = "xNome")]
    pub name: Option<String>,
    #[serde(
        rename = "enderEmit",
        alias = "enderReme",
        alias = "enderDest",
        alias = "enderToma"
    )]
    pub address: Option<Address>,
}

/// Authorization protocol attached by the tax authority (`infProt`).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProtocolInfo {
    #[serde(rename = "chCTe", alias = "chMDFe")]
    pub access_key: Option<String>,
    #[serde(rename = "dhRecbto")]
    pub received_at: Option<String>,
    #[serde(rename = "nProt")]
    pub protocol: Option<String>,
    #[serde(rename = "cStat")]
    pub status: Option<String>,
    #[serde(rename = "xMotivo")]
    pub reason: Option<String>,
}

/// `protCTe` / `protMDFe` wrapper.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Protocol {
    #[serde(rename = "infProt")]
    pub info: Option<ProtocolInfo>,
}
