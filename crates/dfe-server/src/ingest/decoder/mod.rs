//! Document decoder
//!
//! Turns raw bytes of a detected document type into a canonical parsed
//! record. Decoding is pure: it never touches the store.

mod event;
mod manifest;
pub mod numeric;
mod waybill;

pub use event::decode_event;
pub use manifest::decode_manifest;
pub use waybill::{decode_waybill, freight_for, payer_role_for};

use dfe_common::{AccessKey, TaxId};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::detector::DocumentType;
use super::error::DecodeError;
use super::parsed::{ParsedPayload, Party};
use super::schema::Participant;
use crate::models::DocumentKind;

/// Schema versions this decoder understands.
pub const SUPPORTED_VERSIONS: &[&str] = &["3.00", "4.00"];

/// Decode a payload already classified by the detector.
pub fn decode(bytes: &[u8], doc_type: DocumentType) -> Result<ParsedPayload, DecodeError> {
    match doc_type {
        DocumentType::Waybill => decode_waybill(bytes).map(ParsedPayload::Waybill),
        DocumentType::Manifest => decode_manifest(bytes).map(ParsedPayload::Manifest),
        DocumentType::WaybillEvent => {
            decode_event(bytes, DocumentKind::Waybill).map(ParsedPayload::Event)
        },
        DocumentType::ManifestEvent => {
            decode_event(bytes, DocumentKind::Manifest).map(ParsedPayload::Event)
        },
        DocumentType::Unrecognized => Err(DecodeError::UnexpectedRoot {
            expected: "a waybill, manifest or event root",
            found: root_element(as_utf8(bytes)?).unwrap_or_default(),
        }),
    }
}

pub(crate) fn as_utf8(bytes: &[u8]) -> Result<&str, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidEncoding)?;
    Ok(text.trim_start_matches('\u{feff}'))
}

/// Local name of the first element in the document.
pub(crate) fn root_element(xml: &str) -> Result<String, DecodeError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Ok(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            },
            Ok(Event::Eof) => return Err(DecodeError::MalformedXml("document has no root element".into())),
            Ok(_) => continue,
            Err(e) => return Err(DecodeError::MalformedXml(e.to_string())),
        }
    }
}

pub(crate) fn deserialize<T: DeserializeOwned>(xml: &str) -> Result<T, DecodeError> {
    quick_xml::de::from_str(xml).map_err(|e| DecodeError::MalformedXml(e.to_string()))
}

pub(crate) fn check_version(version: Option<&str>) -> Result<String, DecodeError> {
    let version = version.map(str::trim).unwrap_or_default();
    if version.is_empty() {
        return Err(DecodeError::MissingField("@versao"));
    }
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(DecodeError::UnsupportedVersion(version.to_string()));
    }
    Ok(version.to_string())
}

/// Trimmed text, `None` when blank.
pub(crate) fn text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn required_text(field: &'static str, value: &Option<String>) -> Result<String, DecodeError> {
    text(value).ok_or(DecodeError::MissingField(field))
}

/// Access key from an `Id` attribute such as `CTe3524...`.
pub(crate) fn key_from_id(id: &Option<String>, prefix: &str) -> Result<AccessKey, DecodeError> {
    let id = text(id).ok_or(DecodeError::MissingIdentifier)?;
    let raw = id.strip_prefix(prefix).unwrap_or(&id);
    parse_key("@Id", raw)
}

pub(crate) fn parse_key(field: &'static str, raw: &str) -> Result<AccessKey, DecodeError> {
    AccessKey::from_decoded(raw).map_err(|e| DecodeError::InvalidAccessKey {
        field,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Valid cross-reference keys in document order, without duplicates.
///
/// Entries that are not 44-digit keys are dropped.
pub(crate) fn reference_keys<'a>(
    field: &'static str,
    raw: impl IntoIterator<Item = &'a Option<String>>,
) -> Vec<AccessKey> {
    let mut keys: Vec<AccessKey> = Vec::new();
    for value in raw {
        let Some(value) = text(value) else { continue };
        match AccessKey::from_decoded(&value) {
            Ok(key) if !keys.contains(&key) => keys.push(key),
            Ok(_) => {},
            Err(e) => debug!(field, value = %value, error = %e, "Dropping malformed reference key"),
        }
    }
    keys
}

/// Build a party, preferring CNPJ over CPF.
pub(crate) fn party(role: &'static str, participant: Option<&Participant>) -> Result<Party, DecodeError> {
    let participant = participant.ok_or(DecodeError::MissingTaxId { role })?;
    let tax_id = match TaxId::from_optional(participant.cnpj.as_deref(), participant.cpf.as_deref()) {
        Some(Ok(tax_id)) => tax_id,
        Some(Err(_)) => {
            return Err(DecodeError::InvalidTaxId {
                role,
                value: text(&participant.cnpj)
                    .or_else(|| text(&participant.cpf))
                    .unwrap_or_default(),
            })
        },
        None => return Err(DecodeError::MissingTaxId { role }),
    };
    let address = participant.address.as_ref();
    Ok(Party {
        tax_id,
        legal_name: text(&participant.name).unwrap_or_default(),
        state_registration: text(&participant.state_registration)
            .filter(|ie| !ie.eq_ignore_ascii_case("ISENTO")),
        state: address.and_then(|a| text(&a.state)).map(|s| s.to_ascii_uppercase()),
        municipality: address.and_then(|a| text(&a.municipality)),
    })
}
