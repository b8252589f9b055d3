//! Shared domain value types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DfeError, Result};

/// Natural key of a counterparty: a company (CNPJ) or an individual (CPF).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum TaxId {
    Cnpj(String),
    Cpf(String),
}

impl TaxId {
    /// Build a CNPJ tax id from raw text, keeping only digits.
    pub fn cnpj(raw: &str) -> Result<Self> {
        let digits = only_digits(raw);
        if digits.len() != 14 {
            return Err(DfeError::InvalidCnpj(raw.to_string()));
        }
        Ok(TaxId::Cnpj(digits))
    }

    /// Build a CPF tax id from raw text, keeping only digits.
    pub fn cpf(raw: &str) -> Result<Self> {
        let digits = only_digits(raw);
        if digits.len() != 11 {
            return Err(DfeError::InvalidCpf(raw.to_string()));
        }
        Ok(TaxId::Cpf(digits))
    }

    /// Pick CNPJ over CPF; `None` when both are blank.
    pub fn from_optional(cnpj: Option<&str>, cpf: Option<&str>) -> Option<Result<Self>> {
        let cnpj = cnpj.map(str::trim).filter(|s| !s.is_empty());
        let cpf = cpf.map(str::trim).filter(|s| !s.is_empty());
        match (cnpj, cpf) {
            (Some(cnpj), _) => Some(Self::cnpj(cnpj)),
            (None, Some(cpf)) => Some(Self::cpf(cpf)),
            (None, None) => None,
        }
    }

    pub fn digits(&self) -> &str {
        match self {
            TaxId::Cnpj(d) | TaxId::Cpf(d) => d,
        }
    }

    pub fn is_company(&self) -> bool {
        matches!(self, TaxId::Cnpj(_))
    }

    /// Whether the two trailing verification digits are consistent.
    pub fn has_valid_checksum(&self) -> bool {
        match self {
            TaxId::Cnpj(d) => cnpj_checksum_ok(d),
            TaxId::Cpf(d) => cpf_checksum_ok(d),
        }
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaxId::Cnpj(d) => write!(f, "CNPJ {}", d),
            TaxId::Cpf(d) => write!(f, "CPF {}", d),
        }
    }
}

fn only_digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn digit_values(s: &str) -> Vec<u32> {
    s.bytes().map(|b| u32::from(b - b'0')).collect()
}

fn all_same(digits: &[u32]) -> bool {
    digits.windows(2).all(|w| w[0] == w[1])
}

fn cnpj_checksum_ok(s: &str) -> bool {
    let d = digit_values(s);
    if d.len() != 14 || all_same(&d) {
        return false;
    }
    const W1: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    const W2: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    let dv = |weights: &[u32]| {
        let sum: u32 = weights.iter().zip(&d).map(|(w, v)| w * v).sum();
        let r = sum % 11;
        if r < 2 {
            0
        } else {
            11 - r
        }
    };
    dv(&W1) == d[12] && dv(&W2) == d[13]
}

fn cpf_checksum_ok(s: &str) -> bool {
    let d = digit_values(s);
    if d.len() != 11 || all_same(&d) {
        return false;
    }
    let dv = |n: usize| {
        let sum: u32 = d[..n]
            .iter()
            .enumerate()
            .map(|(i, v)| v * (n as u32 + 1 - i as u32))
            .sum();
        let r = (sum * 10) % 11;
        if r == 10 {
            0
        } else {
            r
        }
    };
    dv(9) == d[9] && dv(10) == d[10]
}

/// Normalized vehicle plate: uppercase ASCII alphanumerics, no separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Plate(String);

impl Plate {
    /// Plates are seven characters in both the legacy and Mercosul layouts.
    pub const LEN: usize = 7;

    pub fn parse(raw: &str) -> Result<Self> {
        let normalized: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if normalized.len() != Self::LEN {
            return Err(DfeError::InvalidPlate(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Plate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Two-letter federative unit (UF), e.g. `SP`, or `EX` for abroad.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateCode(String);

impl StateCode {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.len() != 2 || !trimmed.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(DfeError::InvalidStateCode(raw.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_id_prefers_cnpj() {
        let id = TaxId::from_optional(Some("12.345.678/0001-95"), Some("12345678909"))
            .unwrap()
            .unwrap();
        assert_eq!(id, TaxId::Cnpj("12345678000195".to_string()));
        assert!(id.is_company());
    }

    #[test]
    fn test_tax_id_falls_back_to_cpf() {
        let id = TaxId::from_optional(Some("  "), Some("123.456.789-09")).unwrap().unwrap();
        assert_eq!(id, TaxId::Cpf("12345678909".to_string()));
        assert!(TaxId::from_optional(None, Some("")).is_none());
    }

    #[test]
    fn test_tax_id_rejects_wrong_length() {
        assert!(matches!(TaxId::cnpj("1234"), Err(DfeError::InvalidCnpj(_))));
        assert!(matches!(TaxId::cpf("1234567890123"), Err(DfeError::InvalidCpf(_))));
    }

    #[test]
    fn test_checksums() {
        assert!(TaxId::cnpj("11222333000181").unwrap().has_valid_checksum());
        assert!(!TaxId::cnpj("11222333000182").unwrap().has_valid_checksum());
        assert!(!TaxId::cnpj("11111111111111").unwrap().has_valid_checksum());
        assert!(TaxId::cpf("52998224725").unwrap().has_valid_checksum());
        assert!(!TaxId::cpf("52998224726").unwrap().has_valid_checksum());
    }

    #[test]
    fn test_plate_normalization() {
        assert_eq!(Plate::parse("abc-1234").unwrap().as_str(), "ABC1234");
        assert_eq!(Plate::parse(" BRA 2E19 ").unwrap().as_str(), "BRA2E19");
        assert!(Plate::parse("").is_err());
        assert!(Plate::parse("AB-12").is_err());
    }

    #[test]
    fn test_state_code() {
        assert_eq!(StateCode::parse("sp").unwrap().as_str(), "SP");
        assert!(StateCode::parse("SPX").is_err());
        assert!(StateCode::parse("3").is_err());
    }
}
