//! Canonical in-memory records produced by the decoder

use chrono::{DateTime, NaiveDate, Utc};
use dfe_common::{AccessKey, Plate, TaxId};
use sqlx::types::BigDecimal;

use crate::models::{DocumentKind, FreightResponsibility, Insurance, VehicleClass, STATUS_CANCELLED};

/// A counterparty as referenced inside a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    pub tax_id: TaxId,
    pub legal_name: String,
    /// `None` when the document says `ISENTO` (exempt) or leaves it blank.
    pub state_registration: Option<String>,
    pub state: Option<String>,
    pub municipality: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleData {
    pub plate: Plate,
    pub class: VehicleClass,
    pub state: Option<String>,
    pub renavam: Option<String>,
}

/// Fields every primary document carries.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentHeader {
    pub access_key: AccessKey,
    pub schema_version: String,
    pub number: i64,
    pub series: i32,
    pub issued_at: DateTime<Utc>,
    pub status_code: String,
    pub protocol: Option<String>,
    pub authorized_at: Option<DateTime<Utc>>,
    pub total_value: BigDecimal,
    pub origin_state: String,
    pub destination_state: String,
    pub origin_municipality: Option<String>,
    pub destination_municipality: Option<String>,
    pub issuer: Party,
}

impl DocumentHeader {
    /// Whether the attached protocol already reports a cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.status_code == STATUS_CANCELLED
    }
}

/// Which party pays the freight, per the `toma` indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayerRole {
    Sender,
    Receiver,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedWaybill {
    pub header: DocumentHeader,
    pub sender: Party,
    pub receiver: Party,
    pub payer_role: Option<PayerRole>,
    pub cfop: Option<String>,
    pub freight: FreightResponsibility,
    pub cargo_value: BigDecimal,
    pub vehicle_plate: Option<String>,
    pub carrier_rntrc: Option<String>,
    pub observations: Option<String>,
    pub invoice_keys: Vec<AccessKey>,
}

impl ParsedWaybill {
    pub fn payer(&self) -> Option<&Party> {
        match self.payer_role? {
            PayerRole::Sender => Some(&self.sender),
            PayerRole::Receiver => Some(&self.receiver),
        }
    }

    /// Issuer, sender, receiver and payer, without repeating a tax id.
    pub fn parties(&self) -> Vec<&Party> {
        distinct_parties([
            Some(&self.header.issuer),
            Some(&self.sender),
            Some(&self.receiver),
            self.payer(),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedManifest {
    pub header: DocumentHeader,
    pub vehicle: VehicleData,
    pub driver_name: Option<String>,
    pub driver_tax_id: Option<String>,
    pub carrier_rntrc: Option<String>,
    pub waybill_count: i32,
    pub invoice_count: i32,
    pub gross_weight: BigDecimal,
    pub cargo_value: BigDecimal,
    pub predominant_product: Option<String>,
    pub cargo_type: Option<String>,
    pub loading_municipality: Option<String>,
    pub insurance: Option<Insurance>,
    pub waybill_keys: Vec<AccessKey>,
    pub invoice_keys: Vec<AccessKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Cancellation,
    Closure,
}

impl EventType {
    pub const CANCELLATION_CODE: &'static str = "110111";
    pub const CLOSURE_CODE: &'static str = "110112";

    pub fn code(&self) -> &'static str {
        match self {
            EventType::Cancellation => Self::CANCELLATION_CODE,
            EventType::Closure => Self::CLOSURE_CODE,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Cancellation => write!(f, "cancellation ({})", self.code()),
            EventType::Closure => write!(f, "closure ({})", self.code()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEvent {
    pub target_key: AccessKey,
    pub target_kind: DocumentKind,
    pub event_type: EventType,
    pub sequence: i32,
    pub occurred_at: DateTime<Utc>,
    /// Protocol of the authorization the event refers to.
    pub authorization_protocol: Option<String>,
    pub justification: Option<String>,
    pub closed_on: Option<NaiveDate>,
    pub response_status: Option<String>,
    pub response_reason: Option<String>,
    pub response_protocol: Option<String>,
}

impl ParsedEvent {
    /// Closure instant: the declared closure date at midnight UTC, else the event time.
    pub fn closure_time(&self) -> DateTime<Utc> {
        self.closed_on
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .unwrap_or(self.occurred_at)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPayload {
    Waybill(ParsedWaybill),
    Manifest(ParsedManifest),
    Event(ParsedEvent),
}

impl ParsedPayload {
    pub fn access_key(&self) -> &AccessKey {
        match self {
            ParsedPayload::Waybill(w) => &w.header.access_key,
            ParsedPayload::Manifest(m) => &m.header.access_key,
            ParsedPayload::Event(e) => &e.target_key,
        }
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            ParsedPayload::Waybill(_) => DocumentKind::Waybill,
            ParsedPayload::Manifest(_) => DocumentKind::Manifest,
            ParsedPayload::Event(e) => e.target_kind,
        }
    }
}

fn distinct_parties<'a>(candidates: [Option<&'a Party>; 4]) -> Vec<&'a Party> {
    let mut out: Vec<&Party> = Vec::with_capacity(candidates.len());
    for party in candidates.into_iter().flatten() {
        if !out.iter().any(|p| p.tax_id == party.tax_id) {
            out.push(party);
        }
    }
    out
}
