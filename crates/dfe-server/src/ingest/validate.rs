//! Commit-time validation of decoded documents

use dfe_common::{AccessKey, StateCode};

use super::config::IngestConfig;
use super::error::ValidationError;
use super::parsed::{DocumentHeader, ParsedManifest, ParsedWaybill};

pub fn validate_waybill(waybill: &ParsedWaybill, config: &IngestConfig) -> Result<(), ValidationError> {
    validate_header(&waybill.header, config)
}

pub fn validate_manifest(manifest: &ParsedManifest, config: &IngestConfig) -> Result<(), ValidationError> {
    validate_header(&manifest.header, config)?;
    if manifest.driver_name.is_none() {
        return Err(ValidationError::MissingDriverName);
    }
    if manifest.driver_tax_id.is_none() {
        return Err(ValidationError::MissingDriverTaxId);
    }
    Ok(())
}

fn validate_header(header: &DocumentHeader, config: &IngestConfig) -> Result<(), ValidationError> {
    if config.verify_check_digit {
        check_digit(&header.access_key)?;
    }
    state("UFIni", &header.origin_state)?;
    state("UFFim", &header.destination_state)?;
    Ok(())
}

pub fn check_digit(key: &AccessKey) -> Result<(), ValidationError> {
    if key.has_valid_check_digit() {
        return Ok(());
    }
    Err(ValidationError::CheckDigit {
        key: key.to_string(),
        expected: key.expected_check_digit(),
        actual: key.check_digit(),
    })
}

fn state(field: &'static str, value: &str) -> Result<(), ValidationError> {
    StateCode::parse(value).map(|_| ()).map_err(|_| ValidationError::StateCode {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_digit() {
        let valid = AccessKey::from_decoded("35240112345678000191570010000001231000001239").unwrap();
        assert!(check_digit(&valid).is_ok());

        let invalid = AccessKey::from_decoded("31234567890123456789012345678901234567890123").unwrap();
        assert_eq!(
            check_digit(&invalid),
            Err(ValidationError::CheckDigit {
                key: invalid.to_string(),
                expected: 4,
                actual: 3,
            })
        );
    }

    #[test]
    fn test_state_codes() {
        assert!(state("UFIni", "SP").is_ok());
        assert!(matches!(state("UFFim", "S1"), Err(ValidationError::StateCode { field: "UFFim", .. })));
        assert!(state("UFFim", "SPX").is_err());
    }
}
