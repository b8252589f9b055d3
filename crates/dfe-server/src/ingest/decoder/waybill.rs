//! CT-e decoder

use super::numeric;
use super::{
    as_utf8, check_version, deserialize, key_from_id, party, reference_keys, required_text, root_element,
    text,
};
use crate::ingest::error::DecodeError;
use crate::ingest::parsed::{DocumentHeader, ParsedWaybill, PayerRole};
use crate::ingest::schema::waybill::{Cte, CteProc, InfCte};
use crate::ingest::schema::Protocol;
use crate::models::{FreightResponsibility, STATUS_UNAUTHORIZED};

const ID_PREFIX: &str = "CTe";

/// Freight responsibility for a `toma` indicator.
///
/// Codes 0 and 1 (sender, dispatcher) are CIF; 2 and 3 (receiver,
/// recipient) are FOB. Any other code falls back to CIF.
pub fn freight_for(toma: Option<&str>) -> FreightResponsibility {
    match toma.map(str::trim) {
        Some("2") | Some("3") => FreightResponsibility::ReceiverPays,
        _ => FreightResponsibility::PayerPays,
    }
}

/// Payer role for a `toma` indicator; `None` for "other" (4) or unknown codes.
pub fn payer_role_for(toma: Option<&str>) -> Option<PayerRole> {
    match toma.map(str::trim) {
        Some("0") | Some("1") => Some(PayerRole::Sender),
        Some("2") | Some("3") => Some(PayerRole::Receiver),
        _ => None,
    }
}

pub fn decode_waybill(bytes: &[u8]) -> Result<ParsedWaybill, DecodeError> {
    let xml = as_utf8(bytes)?;
    let (info, protocol) = match root_element(xml)?.as_str() {
        "cteProc" => {
            let proc: CteProc = deserialize(xml)?;
            let info = proc
                .cte
                .and_then(|c| c.info)
                .ok_or(DecodeError::MissingField("CTe/infCte"))?;
            (info, proc.protocol)
        },
        "CTe" => {
            let cte: Cte = deserialize(xml)?;
            (cte.info.ok_or(DecodeError::MissingField("infCte"))?, None)
        },
        other => {
            return Err(DecodeError::UnexpectedRoot {
                expected: "<cteProc> or <CTe>",
                found: other.to_string(),
            })
        },
    };
    build(info, protocol)
}

fn build(info: InfCte, protocol: Option<Protocol>) -> Result<ParsedWaybill, DecodeError> {
    let schema_version = check_version(info.version.as_deref())?;
    let access_key = key_from_id(&info.id, ID_PREFIX)?;
    let ide = info.ide.as_ref().ok_or(DecodeError::MissingField("ide"))?;

    let toma = ide
        .toma3
        .as_ref()
        .or(ide.toma4.as_ref())
        .and_then(|t| text(&t.toma));

    let prot = protocol.and_then(|p| p.info);
    let status_code = prot
        .as_ref()
        .and_then(|p| text(&p.status))
        .unwrap_or_else(|| STATUS_UNAUTHORIZED.to_string());

    let header = DocumentHeader {
        access_key,
        schema_version,
        number: numeric::required_int("nCT", ide.number.as_deref())?,
        series: numeric::required_int("serie", ide.serie.as_deref())?,
        issued_at: numeric::timestamp("dhEmi", ide.issued_at.as_deref())?,
        protocol: prot.as_ref().and_then(|p| text(&p.protocol)),
        authorized_at: numeric::optional_timestamp(
            "dhRecbto",
            prot.as_ref().and_then(|p| p.received_at.as_deref()),
        )?,
        status_code,
        total_value: numeric::decimal(
            "vTPrest",
            info.service_value.as_ref().and_then(|v| v.total.as_deref()),
        )?,
        origin_state: required_text("UFIni", &ide.origin_state)?.to_ascii_uppercase(),
        destination_state: required_text("UFFim", &ide.destination_state)?.to_ascii_uppercase(),
        origin_municipality: text(&ide.origin_municipality),
        destination_municipality: text(&ide.destination_municipality),
        issuer: party("issuer", info.emit.as_ref())?,
    };

    let normal = info.normal.as_ref();
    let cargo_value = numeric::decimal(
        "vCarga",
        normal
            .and_then(|n| n.cargo.as_ref())
            .and_then(|c| c.value.as_deref()),
    )?;
    let invoice_keys = reference_keys(
        "infNFe/chave",
        normal
            .and_then(|n| n.documents.as_ref())
            .map(|d| d.invoices.iter().map(|i| &i.chave).collect::<Vec<_>>())
            .unwrap_or_default(),
    );
    let carrier_rntrc = normal
        .and_then(|n| n.modal.as_ref())
        .and_then(|m| m.rodo.as_ref())
        .and_then(|r| text(&r.rntrc));

    let compl = info.compl.as_ref();
    let vehicle_plate = compl.and_then(|c| {
        c.notes
            .iter()
            .find(|n| {
                n.field
                    .as_deref()
                    .is_some_and(|f| f.trim().eq_ignore_ascii_case("PLACA"))
            })
            .and_then(|n| text(&n.text))
    });

    Ok(ParsedWaybill {
        sender: party("sender", info.rem.as_ref())?,
        receiver: party("receiver", info.dest.as_ref())?,
        payer_role: payer_role_for(toma.as_deref()),
        freight: freight_for(toma.as_deref()),
        cfop: text(&ide.cfop),
        cargo_value,
        vehicle_plate,
        carrier_rntrc,
        observations: compl.and_then(|c| text(&c.observations)),
        invoice_keys,
        header,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfe_common::TaxId;
    use sqlx::types::BigDecimal;
    use std::str::FromStr;

    const KEY: &str = "31234567890123456789012345678901234567890123";

    fn waybill_xml(key_id: &str, toma: &str, version: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<cteProc xmlns="http://www.portalfiscal.inf.br/cte" versao="{version}">
  <CTe>
    <infCte Id="{key_id}" versao="{version}">
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
        <xObs>Entrega agendada</xObs>
        <ObsCont xCampo="MOTORISTA"><xTexto>JOAO</xTexto></ObsCont>
        <ObsCont xCampo="PLACA"><xTexto>ABC1D23</xTexto></ObsCont>
      </compl>
      <emit>
        <CNPJ>12345678000195</CNPJ>
        <IE>123456789</IE>
        <xNome>Transportes Exemplo Ltda</xNome>
        <enderEmit><xMun>SAO PAULO</xMun><CEP>01000000</CEP><UF>SP</UF></enderEmit>
      </emit>
      <rem>
        <CNPJ>11222333000181</CNPJ>
        <IE>ISENTO</IE>
        <xNome>Remetente SA</xNome>
        <enderReme><xMun>CAMPINAS</xMun><UF>SP</UF></enderReme>
      </rem>
      <dest>
        <CPF>52998224725</CPF>
        <xNome>Jose Destinatario</xNome>
        <enderDest><xMun>BELO HORIZONTE</xMun><UF>MG</UF></enderDest>
      </dest>
      <vPrest><vTPrest>1500.50</vTPrest></vPrest>
      <infCTeNorm>
        <infCarga><vCarga>25000,00</vCarga><proPred>ELETRONICOS</proPred></infCarga>
        <infDoc>
          <infNFe><chave>35240111222333000181550010000000011000000019</chave></infNFe>
          <infNFe><chave>BAD</chave></infNFe>
        </infDoc>
        <infModal versaoModal="4.00"><rodo><RNTRC>12345678</RNTRC></rodo></infModal>
      </infCTeNorm>
    </infCte>
  </CTe>
  <protCTe versao="{version}">
    <infProt>
      <chCTe>{KEY}</chCTe>
      <dhRecbto>2024-01-15T10:35:00-03:00</dhRecbto>
      <nProt>135240000012345</nProt>
      <cStat>100</cStat>
      <xMotivo>Autorizado o uso do CT-e</xMotivo>
    </infProt>
  </protCTe>
</cteProc>"#
        )
    }

    #[test]
    fn test_decodes_receiver_pays_scenario() {
        let xml = waybill_xml(&format!("CTe{}", KEY), "3", "4.00");
        let w = decode_waybill(xml.as_bytes()).unwrap();

        assert_eq!(w.header.access_key.as_str(), KEY);
        assert_eq!(w.header.number, 123);
        assert_eq!(w.header.series, 1);
        assert_eq!(w.header.total_value, BigDecimal::from_str("1500.50").unwrap());
        assert_eq!(w.header.status_code, "100");
        assert_eq!(w.header.protocol.as_deref(), Some("135240000012345"));
        assert_eq!(w.header.origin_state, "SP");
        assert_eq!(w.header.destination_state, "MG");
        assert_eq!(w.header.issuer.tax_id, TaxId::Cnpj("12345678000195".to_string()));

        assert_eq!(w.freight, FreightResponsibility::ReceiverPays);
        assert_eq!(w.payer_role, Some(PayerRole::Receiver));
        assert_eq!(w.payer().map(|p| &p.tax_id), Some(&w.receiver.tax_id));
        assert_eq!(w.sender.state_registration, None);
        assert_eq!(w.receiver.tax_id, TaxId::Cpf("52998224725".to_string()));
        assert_eq!(w.cargo_value, BigDecimal::from_str("25000.00").unwrap());
        assert_eq!(w.vehicle_plate.as_deref(), Some("ABC1D23"));
        assert_eq!(w.carrier_rntrc.as_deref(), Some("12345678"));
        assert_eq!(w.observations.as_deref(), Some("Entrega agendada"));
        assert_eq!(w.invoice_keys.len(), 1);
        assert_eq!(w.parties().len(), 3);
    }

    #[test]
    fn test_toma_mapping() {
        assert_eq!(freight_for(Some("0")), FreightResponsibility::PayerPays);
        assert_eq!(freight_for(Some("1")), FreightResponsibility::PayerPays);
        assert_eq!(freight_for(Some("2")), FreightResponsibility::ReceiverPays);
        assert_eq!(freight_for(Some("9")), FreightResponsibility::PayerPays);
        assert_eq!(freight_for(None), FreightResponsibility::PayerPays);
        assert_eq!(payer_role_for(Some("1")), Some(PayerRole::Sender));
        assert_eq!(payer_role_for(Some("4")), None);
    }

    #[test]
    fn test_unknown_toma_has_no_payer() {
        let xml = waybill_xml(&format!("CTe{}", KEY), "7", "4.00");
        let w = decode_waybill(xml.as_bytes()).unwrap();
        assert_eq!(w.freight, FreightResponsibility::PayerPays);
        assert!(w.payer().is_none());
    }

    #[test]
    fn test_short_identifier_is_rejected() {
        let xml = waybill_xml("CTe3123456789", "0", "4.00");
        assert!(matches!(
            decode_waybill(xml.as_bytes()),
            Err(DecodeError::InvalidAccessKey { field: "@Id", .. })
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let xml = waybill_xml(&format!("CTe{}", KEY), "0", "1.04");
        assert_eq!(
            decode_waybill(xml.as_bytes()),
            Err(DecodeError::UnsupportedVersion("1.04".to_string()))
        );
    }

    #[test]
    fn test_missing_sender_tax_id() {
        let xml = waybill_xml(&format!("CTe{}", KEY), "0", "4.00")
            .replace("<CNPJ>11222333000181</CNPJ>", "");
        assert_eq!(
            decode_waybill(xml.as_bytes()),
            Err(DecodeError::MissingTaxId { role: "sender" })
        );
    }

    #[test]
    fn test_invalid_total_is_named() {
        let xml = waybill_xml(&format!("CTe{}", KEY), "0", "4.00")
            .replace("<vTPrest>1500.50</vTPrest>", "<vTPrest>mil</vTPrest>");
        assert_eq!(
            decode_waybill(xml.as_bytes()),
            Err(DecodeError::InvalidNumber { field: "vTPrest", value: "mil".to_string() })
        );
    }

    #[test]
    fn test_bare_cte_root_without_protocol() {
        let full = waybill_xml(&format!("CTe{}", KEY), "0", "4.00");
        let start = full.find("<CTe>").unwrap();
        let end = full.find("</CTe>").unwrap() + "</CTe>".len();
        let bare = &full[start..end];
        let w = decode_waybill(bare.as_bytes()).unwrap();
        assert_eq!(w.header.status_code, STATUS_UNAUTHORIZED);
        assert!(w.header.protocol.is_none());
        assert!(!w.header.is_cancelled());
    }

    #[test]
    fn test_wrong_root() {
        assert!(matches!(
            decode_waybill(b"<mdfeProc versao=\"3.00\"/>"),
            Err(DecodeError::UnexpectedRoot { .. })
        ));
    }
}
