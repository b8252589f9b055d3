//! Lifecycle event schema mirror
//!
//! Waybill and manifest events share one layout; only element names differ
//! (`eventoCTe`/`eventoMDFe`, `chCTe`/`chMDFe`, `evCancCTe`/`evCancMDFe`), so
//! one set of types covers both through serde aliases.

use serde::Deserialize;

/// `procEventoCTe` / `procEventoMDFe`: the event with the authority's reply.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProcEvento {
    #[serde(rename = "@versao")]
    pub version: Option<String>,
    #[serde(rename = "eventoCTe", alias = "eventoMDFe")]
    pub event: Option<Evento>,
    #[serde(rename = "retEventoCTe", alias = "retEventoMDFe")]
    pub response: Option<RetEvento>,
}

/// `eventoCTe` / `eventoMDFe`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Evento {
    #[serde(rename = "@versao")]
    pub version: Option<String>,
    #[serde(rename = "infEvento")]
    pub info: Option<InfEvento>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InfEvento {
    #[serde(rename = "@Id")]
    pub id: Option<String>,
    #[serde(rename = "chCTe", alias = "chMDFe")]
    pub access_key: Option<String>,
    #[serde(rename = "dhEvento")]
    pub occurred_at: Option<String>,
    #[serde(rename = "tpEvento")]
    pub event_type: Option<String>,
    #[serde(rename = "nSeqEvento")]
    pub sequence: Option<String>,
    #[serde(rename = "detEvento")]
    pub detail: Option<DetEvento>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DetEvento {
    #[serde(rename = "@versaoEvento")]
    pub version: Option<String>,
    #[serde(rename = "evCancCTe", alias = "evCancMDFe")]
    pub cancellation: Option<Cancellation>,
    #[serde(rename = "evEncMDFe")]
    pub closure: Option<Closure>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Cancellation {
    #[serde(rename = "descEvento")]
    pub description: Option<String>,
    #[serde(rename = "nProt")]
    pub protocol: Option<String>,
    #[serde(rename = "xJust")]
    pub justification: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Closure {
    #[serde(rename = "descEvento")]
    pub description: Option<String>,
    #[serde(rename = "nProt")]
    pub protocol: Option<String>,
    #[serde(rename = "dtEnc")]
    pub closed_on: Option<String>,
    #[serde(rename = "cUF")]
    pub state_code: Option<String>,
    #[serde(rename = "cMun")]
    pub municipality_code: Option<String>,
}

/// `retEventoCTe` / `retEventoMDFe`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RetEvento {
    #[serde(rename = "infEvento")]
    pub info: Option<RetInfEvento>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RetInfEvento {
    #[serde(rename = "cStat")]
    pub status: Option<String>,
    #[serde(rename = "xMotivo")]
    pub reason: Option<String>,
    #[serde(rename = "nProt")]
    pub protocol: Option<String>,
    #[serde(rename = "dhRegEvento")]
    pub registered_at: Option<String>,
}
