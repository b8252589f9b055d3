//! Lifecycle event decoder (cancellation and closure)

use super::numeric;
use super::{as_utf8, check_version, deserialize, parse_key, required_text, root_element, text};
use crate::ingest::error::DecodeError;
use crate::ingest::parsed::{EventType, ParsedEvent};
use crate::ingest::schema::event::{Evento, InfEvento, ProcEvento, RetEvento};
use crate::models::DocumentKind;

/// Event codes that are recognised but not ingested.
const KNOWN_UNSUPPORTED: &[(&str, &str)] = &[
    ("110110", "correction letter"),
    ("110114", "driver inclusion"),
    ("110140", "EPEC"),
    ("110170", "cancellation by substitution"),
];

pub fn decode_event(bytes: &[u8], kind: DocumentKind) -> Result<ParsedEvent, DecodeError> {
    let xml = as_utf8(bytes)?;
    let (proc_root, event_root, key_field) = match kind {
        DocumentKind::Waybill => ("procEventoCTe", "eventoCTe", "chCTe"),
        DocumentKind::Manifest => ("procEventoMDFe", "eventoMDFe", "chMDFe"),
    };

    let root = root_element(xml)?;
    let (event, response) = if root == proc_root {
        let proc: ProcEvento = deserialize(xml)?;
        (
            proc.event.ok_or(DecodeError::MissingField("evento"))?,
            proc.response,
        )
    } else if root == event_root {
        (deserialize::<Evento>(xml)?, None)
    } else {
        return Err(DecodeError::UnexpectedRoot {
            expected: match kind {
                DocumentKind::Waybill => "<procEventoCTe> or <eventoCTe>",
                DocumentKind::Manifest => "<procEventoMDFe> or <eventoMDFe>",
            },
            found: root,
        });
    };

    check_version(event.version.as_deref())?;
    let info = event.info.ok_or(DecodeError::MissingField("infEvento"))?;
    build(info, response, kind, key_field)
}

fn build(
    info: InfEvento,
    response: Option<RetEvento>,
    kind: DocumentKind,
    key_field: &'static str,
) -> Result<ParsedEvent, DecodeError> {
    let raw_key = required_text(key_field, &info.access_key)?;
    let target_key = parse_key(key_field, &raw_key)?;
    let code = required_text("tpEvento", &info.event_type)?;
    let event_type = event_type_for(&code, kind)?;

    let sequence = match text(&info.sequence) {
        Some(raw) => numeric::required_int("nSeqEvento", Some(&raw))?,
        None => 1,
    };
    let occurred_at = numeric::timestamp("dhEvento", info.occurred_at.as_deref())?;

    let detail = info.detail.as_ref();
    let (authorization_protocol, justification, closed_on) = match event_type {
        EventType::Cancellation => {
            let c = detail.and_then(|d| d.cancellation.as_ref());
            (
                c.and_then(|c| text(&c.protocol)),
                c.and_then(|c| text(&c.justification)),
                None,
            )
        },
        EventType::Closure => {
            let c = detail.and_then(|d| d.closure.as_ref());
            (
                c.and_then(|c| text(&c.protocol)),
                None,
                numeric::optional_date("dtEnc", c.and_then(|c| c.closed_on.as_deref()))?,
            )
        },
    };

    let ret = response.and_then(|r| r.info);
    Ok(ParsedEvent {
        target_key,
        target_kind: kind,
        event_type,
        sequence,
        occurred_at,
        authorization_protocol,
        justification,
        closed_on,
        response_status: ret.as_ref().and_then(|r| text(&r.status)),
        response_reason: ret.as_ref().and_then(|r| text(&r.reason)),
        response_protocol: ret.as_ref().and_then(|r| text(&r.protocol)),
    })
}

fn event_type_for(code: &str, kind: DocumentKind) -> Result<EventType, DecodeError> {
    match (code, kind) {
        (EventType::CANCELLATION_CODE, _) => Ok(EventType::Cancellation),
        (EventType::CLOSURE_CODE, DocumentKind::Manifest) => Ok(EventType::Closure),
        (EventType::CLOSURE_CODE, DocumentKind::Waybill) => Err(DecodeError::UnsupportedEventType {
            code: code.to_string(),
            name: Some("closure"),
        }),
        _ => Err(DecodeError::UnsupportedEventType {
            code: code.to_string(),
            name: KNOWN_UNSUPPORTED
                .iter()
                .find(|(c, _)| *c == code)
                .map(|(_, name)| *name),
        }),
    }
}
