//! Persistent domain records
//!
//! A primary document is a single tagged entity: the fields every fiscal
//! transport document carries live on [`PrimaryDocument`], and the
//! kind-specific payload lives in [`DocumentDetails`].

use chrono::{DateTime, Utc};
use dfe_common::{AccessKey, Plate, TaxId};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Authorization status code of a document that never received a protocol.
pub const STATUS_UNAUTHORIZED: &str = "000";

/// Authorization status code of an authorized document.
pub const STATUS_AUTHORIZED: &str = "100";

/// Terminal status code of a cancelled document.
pub const STATUS_CANCELLED: &str = "101";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentKind {
    Waybill,
    Manifest,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Waybill => "WAYBILL",
            DocumentKind::Manifest => "MANIFEST",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAYBILL" => Ok(DocumentKind::Waybill),
            "MANIFEST" => Ok(DocumentKind::Manifest),
            other => Err(format!("unknown document kind '{}'", other)),
        }
    }
}

/// Who bears the freight cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FreightResponsibility {
    /// CIF
    PayerPays,
    /// FOB
    ReceiverPays,
}

impl FreightResponsibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            FreightResponsibility::PayerPays => "CIF",
            FreightResponsibility::ReceiverPays => "FOB",
        }
    }
}

impl FromStr for FreightResponsibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CIF" => Ok(FreightResponsibility::PayerPays),
            "FOB" => Ok(FreightResponsibility::ReceiverPays),
            other => Err(format!("unknown freight responsibility '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleClass {
    /// Owned by the carrier.
    #[default]
    Own,
    /// Owned by an aggregated independent driver.
    Aggregate,
    ThirdParty,
}

impl VehicleClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleClass::Own => "OWN",
            VehicleClass::Aggregate => "AGGREGATE",
            VehicleClass::ThirdParty => "THIRD_PARTY",
        }
    }
}

impl FromStr for VehicleClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OWN" => Ok(VehicleClass::Own),
            "AGGREGATE" => Ok(VehicleClass::Aggregate),
            "THIRD_PARTY" => Ok(VehicleClass::ThirdParty),
            other => Err(format!("unknown vehicle class '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Counterparty {
    pub id: Uuid,
    pub tax_id: TaxId,
    pub legal_name: String,
    pub state_registration: Option<String>,
    pub state: Option<String>,
    pub municipality: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub plate: Plate,
    pub class: VehicleClass,
    pub state: Option<String>,
    pub renavam: Option<String>,
}

/// Insurance block of a manifest; only the first declared policy is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Insurance {
    pub insurer_name: Option<String>,
    pub insurer_tax_id: Option<String>,
    pub policy_number: Option<String>,
    pub endorsement_number: Option<String>,
}

impl Insurance {
    pub fn is_empty(&self) -> bool {
        self.insurer_name.is_none()
            && self.insurer_tax_id.is_none()
            && self.policy_number.is_none()
            && self.endorsement_number.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryDocument {
    pub access_key: AccessKey,
    pub number: i64,
    pub series: i32,
    pub issued_at: DateTime<Utc>,
    pub status_code: String,
    pub protocol: Option<String>,
    pub authorized_at: Option<DateTime<Utc>>,
    pub cancelled: bool,
    pub total_value: BigDecimal,
    pub origin_state: String,
    pub destination_state: String,
    pub origin_municipality: Option<String>,
    pub destination_municipality: Option<String>,
    pub issuer_id: Uuid,
    pub upload_id: Option<Uuid>,
    pub raw_xml: String,
    pub details: DocumentDetails,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentDetails {
    Waybill(WaybillDetails),
    Manifest(ManifestDetails),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaybillDetails {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub payer_id: Option<Uuid>,
    pub cfop: Option<String>,
    pub freight: FreightResponsibility,
    pub cargo_value: BigDecimal,
    pub vehicle_plate: Option<String>,
    pub carrier_rntrc: Option<String>,
    pub observations: Option<String>,
    pub invoice_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDetails {
    pub towing_vehicle_id: Uuid,
    pub driver_name: String,
    pub driver_tax_id: String,
    pub carrier_rntrc: Option<String>,
    pub waybill_count: i32,
    pub invoice_count: i32,
    pub gross_weight: BigDecimal,
    pub cargo_value: BigDecimal,
    pub predominant_product: Option<String>,
    pub cargo_type: Option<String>,
    pub loading_municipality: Option<String>,
    pub closed: bool,
    pub closed_at: Option<DateTime<Utc>>,
    pub insurance: Option<Insurance>,
    pub waybill_keys: Vec<String>,
    pub invoice_keys: Vec<String>,
}

impl PrimaryDocument {
    pub fn kind(&self) -> DocumentKind {
        match self.details {
            DocumentDetails::Waybill(_) => DocumentKind::Waybill,
            DocumentDetails::Manifest(_) => DocumentKind::Manifest,
        }
    }

    pub fn is_closed(&self) -> bool {
        match &self.details {
            DocumentDetails::Manifest(m) => m.closed,
            DocumentDetails::Waybill(_) => false,
        }
    }

    /// Replace `self` with a re-ingested payload of the same document.
    ///
    /// Cancellation and closure never revert, and a cancelled document
    /// keeps its terminal status code.
    pub fn absorb_update(&mut self, incoming: PrimaryDocument) {
        let was_cancelled = self.cancelled;
        let previous_status = std::mem::take(&mut self.status_code);
        let previous_protocol = self.protocol.take();
        let previous_authorized_at = self.authorized_at.take();
        let previous_closure = match &self.details {
            DocumentDetails::Manifest(m) => Some((m.closed, m.closed_at)),
            DocumentDetails::Waybill(_) => None,
        };

        *self = incoming;

        if was_cancelled {
            self.cancelled = true;
            self.status_code = previous_status;
        }
        if self.protocol.is_none() {
            self.protocol = previous_protocol;
        }
        if self.authorized_at.is_none() {
            self.authorized_at = previous_authorized_at;
        }
        if let (Some((closed, closed_at)), DocumentDetails::Manifest(m)) =
            (previous_closure, &mut self.details)
        {
            m.closed |= closed;
            m.closed_at = closed_at.or(m.closed_at);
        }
    }
}

/// The slice of a stored document lifecycle events operate on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentState {
    pub id: Uuid,
    pub kind: DocumentKind,
    pub cancelled: bool,
    pub closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    Pending,
    Processed,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "PENDING",
            UploadStatus::Processed => "PROCESSED",
            UploadStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, UploadStatus::Pending)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(UploadStatus::Pending),
            "PROCESSED" => Ok(UploadStatus::Processed),
            "FAILED" => Ok(UploadStatus::Failed),
            other => Err(format!("unknown upload status '{}'", other)),
        }
    }
}

/// Tracking record of one submitted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Upload {
    pub id: Uuid,
    pub filename: String,
    pub status: UploadStatus,
    pub submitted_at: DateTime<Utc>,
    pub access_key: Option<String>,
    pub failure_detail: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Upload {
    pub fn pending(filename: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            status: UploadStatus::Pending,
            submitted_at: Utc::now(),
            access_key: None,
            failure_detail: None,
            processed_at: None,
        }
    }
}
