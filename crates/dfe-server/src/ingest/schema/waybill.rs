//! CT-e (transport waybill) schema mirror

use serde::Deserialize;

use super::{Participant, Protocol};

/// `cteProc`: the authorized waybill with its protocol.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CteProc {
    #[serde(rename = "@versao")]
    pub version: Option<String>,
    #[serde(rename = "CTe")]
    pub cte: Option<Cte>,
    #[serde(rename = "protCTe")]
    pub protocol: Option<Protocol>,
}

/// `CTe`: the signed waybill without protocol.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Cte {
    #[serde(rename = "infCte")]
    pub info: Option<InfCte>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InfCte {
    #[serde(rename = "@Id")]
    pub id: Option<String>,
    #[serde(rename = "@versao")]
    pub version: Option<String>,
    pub ide: Option<Ide>,
    pub compl: Option<Compl>,
    pub emit: Option<Participant>,
    pub rem: Option<Participant>,
    pub dest: Option<Participant>,
    #[serde(rename = "vPrest")]
    pub service_value: Option<ServiceValue>,
    #[serde(rename = "infCTeNorm")]
    pub normal: Option<InfCteNorm>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Ide {
    #[serde(rename = "CFOP")]
    pub cfop: Option<String>,
    pub serie: Option<String>,
    #[serde(rename = "nCT")]
    pub number: Option<String>,
    #[serde(rename = "dhEmi")]
    pub issued_at: Option<String>,
    #[serde(rename = "xMunIni")]
    pub origin_municipality: Option<String>,
    #[serde(rename = "UFIni")]
    pub origin_state: Option<String>,
    #[serde(rename = "xMunFim")]
    pub destination_municipality: Option<String>,
    #[serde(rename = "UFFim")]
    pub destination_state: Option<String>,
    pub toma3: Option<Toma>,
    pub toma4: Option<Toma>,
}

/// Payer-role indicator.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Toma {
    pub toma: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Compl {
    #[serde(rename = "xObs")]
    pub observations: Option<String>,
    #[serde(rename = "ObsCont")]
    pub notes: Vec<ObsCont>,
}

/// Free-form `ObsCont` note; the carrier puts the plate under `xCampo="PLACA"`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ObsCont {
    #[serde(rename = "@xCampo")]
    pub field: Option<String>,
    #[serde(rename = "xTexto")]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServiceValue {
    #[serde(rename = "vTPrest")]
    pub total: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InfCteNorm {
    #[serde(rename = "infCarga")]
    pub cargo: Option<InfCarga>,
    #[serde(rename = "infDoc")]
    pub documents: Option<InfDoc>,
    #[serde(rename = "infModal")]
    pub modal: Option<InfModal>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InfCarga {
    #[serde(rename = "vCarga")]
    pub value: Option<String>,
    #[serde(rename = "proPred")]
    pub predominant_product: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InfDoc {
    #[serde(rename = "infNFe")]
    pub invoices: Vec<InvoiceRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InvoiceRef {
    pub chave: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InfModal {
    pub rodo: Option<Rodo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Rodo {
    #[serde(rename = "RNTRC")]
    pub rntrc: Option<String>,
}
