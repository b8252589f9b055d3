//! MDF-e (cargo manifest) schema mirror

use serde::Deserialize;

use super::{Participant, Protocol};

/// `mdfeProc`: the authorized manifest with its protocol.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MdfeProc {
    #[serde(rename = "@versao")]
    pub version: Option<String>,
    #[serde(rename = "MDFe")]
    pub mdfe: Option<Mdfe>,
    #[serde(rename = "protMDFe")]
    pub protocol: Option<Protocol>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Mdfe {
    #[serde(rename = "infMDFe")]
    pub info: Option<InfMdfe>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InfMdfe {
    #[serde(rename = "@Id")]
    pub id: Option<String>,
    #[serde(rename = "@versao")]
    pub version: Option<String>,
    pub ide: Option<Ide>,
    pub emit: Option<Participant>,
    #[serde(rename = "infModal")]
    pub modal: Option<InfModal>,
    #[serde(rename = "infDoc")]
    pub documents: Option<InfDoc>,
    pub seg: Vec<Seg>,
    #[serde(rename = "prodPred")]
    pub predominant_product: Option<ProdPred>,
    pub tot: Option<Tot>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Ide {
    pub serie: Option<String>,
    #[serde(rename = "nMDF")]
    pub number: Option<String>,
    #[serde(rename = "dhEmi")]
    pub issued_at: Option<String>,
    #[serde(rename = "UFIni")]
    pub origin_state: Option<String>,
    #[serde(rename = "UFFim")]
    pub destination_state: Option<String>,
    #[serde(rename = "infMunCarrega")]
    pub loading: Vec<LoadingMunicipality>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoadingMunicipality {
    #[serde(rename = "cMunCarrega")]
    pub code: Option<String>,
    #[serde(rename = "xMunCarrega")]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InfModal {
    pub rodo: Option<Rodo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Rodo {
    #[serde(rename = "infANTT")]
    pub antt: Option<InfAntt>,
    #[serde(rename = "veicTracao")]
    pub towing_vehicle: Option<VeicTracao>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InfAntt {
    #[serde(rename = "RNTRC")]
    pub rntrc: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VeicTracao {
    pub placa: Option<String>,
    #[serde(rename = "RENAVAM")]
    pub renavam: Option<String>,
    pub tara: Option<String>,
    #[serde(rename = "capKG")]
    pub capacity_kg: Option<String>,
    pub prop: Option<Owner>,
    pub condutor: Vec<Condutor>,
    #[serde(rename = "UF")]
    pub state: Option<String>,
}

/// Present only when the vehicle does not belong to the issuer.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Owner {
    #[serde(rename = "CNPJ")]
    pub cnpj: Option<String>,
    #[serde(rename = "CPF")]
    pub cpf: Option<String>,
    #[serde(rename = "xNome")]
    pub name: Option<String>,
    #[serde(rename = "tpProp")]
    pub owner_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Condutor {
    #[serde(rename = "xNome")]
    pub name: Option<String>,
    #[serde(rename = "CPF")]
    pub cpf: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InfDoc {
    #[serde(rename = "infMunDescarga")]
    pub unloading: Vec<InfMunDescarga>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InfMunDescarga {
    #[serde(rename = "cMunDescarga")]
    pub code: Option<String>,
    #[serde(rename = "xMunDescarga")]
    pub name: Option<String>,
    #[serde(rename = "infCTe")]
    pub waybills: Vec<WaybillRef>,
    #[serde(rename = "infNFe")]
    pub invoices: Vec<InvoiceRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WaybillRef {
    #[serde(rename = "chCTe")]
    pub key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InvoiceRef {
    #[serde(rename = "chNFe")]
    pub key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Seg {
    #[serde(rename = "infResp")]
    pub responsible: Option<InsuranceParty>,
    #[serde(rename = "infSeg")]
    pub insurer: Option<Insurer>,
    #[serde(rename = "nApol")]
    pub policy_number: Option<String>,
    #[serde(rename = "nAver")]
    pub endorsements: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InsuranceParty {
    #[serde(rename = "respSeg")]
    pub role: Option<String>,
    #[serde(rename = "CNPJ")]
    pub cnpj: Option<String>,
    #[serde(rename = "CPF")]
    pub cpf: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Insurer {
    #[serde(rename = "xSeg")]
    pub name: Option<String>,
    #[serde(rename = "CNPJ")]
    pub cnpj: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProdPred {
    #[serde(rename = "tpCarga")]
    pub cargo_type: Option<String>,
    #[serde(rename = "xProd")]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Tot {
    #[serde(rename = "qCTe")]
    pub waybill_count: Option<String>,
    #[serde(rename = "qNFe")]
    pub invoice_count: Option<String>,
    #[serde(rename = "vCarga")]
    pub cargo_value: Option<String>,
    #[serde(rename = "cUnid")]
    pub unit: Option<String>,
    #[serde(rename = "qCarga")]
    pub gross_weight: Option<String>,
}
