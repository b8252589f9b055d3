//! MDF-e decoder

use dfe_common::Plate;

use super::numeric;
use super::{
    as_utf8, check_version, deserialize, key_from_id, party, reference_keys, required_text, root_element,
    text,
};
use crate::ingest::error::DecodeError;
use crate::ingest::parsed::{DocumentHeader, ParsedManifest, VehicleData};
use crate::ingest::schema::manifest::{InfMdfe, Mdfe, MdfeProc, Owner, Seg};
use crate::ingest::schema::Protocol;
use crate::models::{Insurance, VehicleClass, STATUS_UNAUTHORIZED};

const ID_PREFIX: &str = "MDFe";

pub fn decode_manifest(bytes: &[u8]) -> Result<ParsedManifest, DecodeError> {
    let xml = as_utf8(bytes)?;
    let (info, protocol) = match root_element(xml)?.as_str() {
        "mdfeProc" => {
            let proc: MdfeProc = deserialize(xml)?;
            let info = proc
                .mdfe
                .and_then(|m| m.info)
                .ok_or(DecodeError::MissingField("MDFe/infMDFe"))?;
            (info, proc.protocol)
        },
        "MDFe" => {
            let mdfe: Mdfe = deserialize(xml)?;
            (mdfe.info.ok_or(DecodeError::MissingField("infMDFe"))?, None)
        },
        other => {
            return Err(DecodeError::UnexpectedRoot {
                expected: "<mdfeProc> or <MDFe>",
                found: other.to_string(),
            })
        },
    };
    build(info, protocol)
}

fn build(info: InfMdfe, protocol: Option<Protocol>) -> Result<ParsedManifest, DecodeError> {
    let schema_version = check_version(info.version.as_deref())?;
    let access_key = key_from_id(&info.id, ID_PREFIX)?;
    let ide = info.ide.as_ref().ok_or(DecodeError::MissingField("ide"))?;
    let tot = info.tot.as_ref();

    let prot = protocol.and_then(|p| p.info);
    let unloading = info
        .documents
        .as_ref()
        .map(|d| d.unloading.as_slice())
        .unwrap_or_default();

    let header = DocumentHeader {
        access_key,
        schema_version,
        number: numeric::required_int("nMDF", ide.number.as_deref())?,
        series: numeric::required_int("serie", ide.serie.as_deref())?,
        issued_at: numeric::timestamp("dhEmi", ide.issued_at.as_deref())?,
        status_code: prot
            .as_ref()
            .and_then(|p| text(&p.status))
            .unwrap_or_else(|| STATUS_UNAUTHORIZED.to_string()),
        protocol: prot.as_ref().and_then(|p| text(&p.protocol)),
        authorized_at: numeric::optional_timestamp(
            "dhRecbto",
            prot.as_ref().and_then(|p| p.received_at.as_deref()),
        )?,
        total_value: numeric::decimal("vCarga", tot.and_then(|t| t.cargo_value.as_deref()))?,
        origin_state: required_text("UFIni", &ide.origin_state)?.to_ascii_uppercase(),
        destination_state: required_text("UFFim", &ide.destination_state)?.to_ascii_uppercase(),
        origin_municipality: ide.loading.first().and_then(|m| text(&m.name)),
        destination_municipality: unloading.last().and_then(|m| text(&m.name)),
        issuer: party("issuer", info.emit.as_ref())?,
    };

    let rodo = info.modal.as_ref().and_then(|m| m.rodo.as_ref());
    let towing = rodo
        .and_then(|r| r.towing_vehicle.as_ref())
        .ok_or(DecodeError::MissingField("veicTracao"))?;
    let raw_plate = required_text("veicTracao/placa", &towing.placa)?;
    let plate = Plate::parse(&raw_plate).map_err(|_| DecodeError::InvalidPlate(raw_plate.clone()))?;
    let vehicle = VehicleData {
        plate,
        class: vehicle_class(towing.prop.as_ref()),
        state: text(&towing.state).map(|s| s.to_ascii_uppercase()),
        renavam: text(&towing.renavam),
    };
    let driver = towing.condutor.first();

    let predominant = info.predominant_product.as_ref();
    let waybill_keys = reference_keys(
        "infCTe/chCTe",
        unloading.iter().flat_map(|m| m.waybills.iter().map(|w| &w.key)),
    );
    let invoice_keys = reference_keys(
        "infNFe/chNFe",
        unloading.iter().flat_map(|m| m.invoices.iter().map(|i| &i.key)),
    );

    Ok(ParsedManifest {
        vehicle,
        driver_name: driver.and_then(|d| text(&d.name)),
        driver_tax_id: driver.and_then(|d| text(&d.cpf)),
        carrier_rntrc: rodo.and_then(|r| r.antt.as_ref()).and_then(|a| text(&a.rntrc)),
        waybill_count: numeric::count("qCTe", tot.and_then(|t| t.waybill_count.as_deref()))?,
        invoice_count: numeric::count("qNFe", tot.and_then(|t| t.invoice_count.as_deref()))?,
        gross_weight: numeric::decimal("qCarga", tot.and_then(|t| t.gross_weight.as_deref()))?,
        cargo_value: header.total_value.clone(),
        predominant_product: predominant.and_then(|p| text(&p.description)),
        cargo_type: predominant.and_then(|p| text(&p.cargo_type)),
        loading_municipality: header.origin_municipality.clone(),
        insurance: info.seg.first().map(insurance).filter(|i| !i.is_empty()),
        waybill_keys,
        invoice_keys,
        header,
    })
}

/// `prop` is only filled for vehicles the issuer does not own.
fn vehicle_class(owner: Option<&Owner>) -> VehicleClass {
    match owner {
        None => VehicleClass::Own,
        Some(owner) if text(&owner.owner_type).as_deref() == Some("0") => VehicleClass::Aggregate,
        Some(_) => VehicleClass::ThirdParty,
    }
}

fn insurance(seg: &Seg) -> Insurance {
    let insurer = seg.insurer.as_ref();
    let responsible = seg.responsible.as_ref();
    Insurance {
        insurer_name: insurer.and_then(|i| text(&i.name)),
        insurer_tax_id: insurer
            .and_then(|i| text(&i.cnpj))
            .or_else(|| responsible.and_then(|r| text(&r.cnpj).or_else(|| text(&r.cpf)))),
        policy_number: text(&seg.policy_number),
        endorsement_number: seg
            .endorsements
            .iter()
            .map(|e| e.trim())
            .find(|e| !e.is_empty())
            .map(str::to_string),
    }
}
