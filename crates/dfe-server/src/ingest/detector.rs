//! Document type detection
//!
//! Classification scans the raw bytes for root-element markers without
//! parsing. Marker groups are tried in a fixed order (waybill, manifest,
//! waybill event, manifest event) and the first hit wins.

use std::fmt;

use crate::models::DocumentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    Waybill,
    Manifest,
    WaybillEvent,
    ManifestEvent,
    Unrecognized,
}

impl DocumentType {
    /// Kind of the primary document this payload creates or targets.
    pub fn document_kind(&self) -> Option<DocumentKind> {
        match self {
            DocumentType::Waybill | DocumentType::WaybillEvent => Some(DocumentKind::Waybill),
            DocumentType::Manifest | DocumentType::ManifestEvent => Some(DocumentKind::Manifest),
            DocumentType::Unrecognized => None,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentType::Waybill => "waybill",
            DocumentType::Manifest => "manifest",
            DocumentType::WaybillEvent => "waybill event",
            DocumentType::ManifestEvent => "manifest event",
            DocumentType::Unrecognized => "unrecognized",
        };
        f.write_str(name)
    }
}

const MARKERS: &[(&[&str], DocumentType)] = &[
    (&["<cteProc", "<CTe"], DocumentType::Waybill),
    (&["<mdfeProc", "<MDFe"], DocumentType::Manifest),
    (&["<procEventoCTe", "<eventoCTe"], DocumentType::WaybillEvent),
    (&["<procEventoMDFe", "<eventoMDFe"], DocumentType::ManifestEvent),
];

/// Classify a payload by the first matching marker.
pub fn detect(bytes: &[u8]) -> DocumentType {
    for (markers, kind) in MARKERS {
        if markers.iter().any(|m| contains_tag(bytes, m.as_bytes())) {
            return *kind;
        }
    }
    DocumentType::Unrecognized
}

// A marker only counts when the tag name ends right after it, so `<CTeOS`
// is not read as `<CTe`.
fn contains_tag(haystack: &[u8], marker: &[u8]) -> bool {
    haystack
        .windows(marker.len() + 1)
        .any(|w| w.starts_with(marker) && is_tag_boundary(w[marker.len()]))
}

fn is_tag_boundary(b: u8) -> bool {
    matches!(b, b'>' | b'/' | b' ' | b'\t' | b'\r' | b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_wrapped_and_bare_roots() {
        assert_eq!(detect(b"<?xml version=\"1.0\"?><cteProc versao=\"4.00\">"), DocumentType::Waybill);
        assert_eq!(detect(b"<CTe xmlns=\"http://www.portalfiscal.inf.br/cte\">"), DocumentType::Waybill);
        assert_eq!(detect(b"<mdfeProc versao=\"3.00\">"), DocumentType::Manifest);
        assert_eq!(detect(b"<MDFe>"), DocumentType::Manifest);
        assert_eq!(detect(b"<procEventoCTe versao=\"4.00\">"), DocumentType::WaybillEvent);
        assert_eq!(detect(b"<eventoMDFe versao=\"3.00\">"), DocumentType::ManifestEvent);
    }

    #[test]
    fn test_unrecognized_payloads() {
        assert_eq!(detect(b""), DocumentType::Unrecognized);
        assert_eq!(detect(b"<nfeProc><NFe/></nfeProc>"), DocumentType::Unrecognized);
        assert_eq!(detect(b"not xml at all"), DocumentType::Unrecognized);
    }

    #[test]
    fn test_marker_requires_tag_boundary() {
        assert_eq!(detect(b"<CTeOS versao=\"4.00\">"), DocumentType::Unrecognized);
        assert_eq!(detect(b"<CTe>"), DocumentType::Waybill);
    }

    #[test]
    fn test_waybill_markers_take_precedence() {
        let xml = b"<mdfeProc><MDFe><infDoc><CTe/></infDoc></MDFe></mdfeProc>";
        assert_eq!(detect(xml), DocumentType::Waybill);
    }

    #[test]
    fn test_document_kind_mapping() {
        assert_eq!(DocumentType::ManifestEvent.document_kind(), Some(DocumentKind::Manifest));
        assert_eq!(DocumentType::Unrecognized.document_kind(), None);
        assert_eq!(DocumentType::WaybillEvent.document_kind(), Some(DocumentKind::Waybill));
    }
}
