//! # Loan Collateral Module
//!
//! Assets pledged against a loan. An admin verifies each pledge once.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollateralType {
    Property,
    Vehicle,
    Equipment,
    Savings,
    Shares,
    Other,
}

impl CollateralType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollateralType::Property => "property",
            CollateralType::Vehicle => "vehicle",
            CollateralType::Equipment => "equipment",
            CollateralType::Savings => "savings",
            CollateralType::Shares => "shares",
            CollateralType::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "property" | "real_estate" => Some(CollateralType::Property),
            "vehicle" => Some(CollateralType::Vehicle),
            "equipment" | "machinery" => Some(CollateralType::Equipment),
            "savings" | "deposits" => Some(CollateralType::Savings),
            "shares" | "securities" => Some(CollateralType::Shares),
            "other" => Some(CollateralType::Other),
            _ => None,
        }
    }
}

impl fmt::Display for CollateralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanCollateral {
    /// COL_0001, ...
    pub id: String,
    pub loan_id: String,
    pub collateral_type: CollateralType,
    pub description: String,
    pub estimated_value: Decimal,
    pub is_verified: bool,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verification_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LoanCollateral {
    pub fn new(
        id: &str,
        loan_id: &str,
        collateral_type: CollateralType,
        description: &str,
        estimated_value: Decimal,
    ) -> CoreResult<Self> {
        if description.trim().is_empty() {
            return Err(CoreError::ValidationError("collateral description is required".into()));
        }
        if estimated_value <= Decimal::ZERO {
            return Err(CoreError::InvalidAmount(format!(
                "collateral value must be positive: {}",
                estimated_value
            )));
        }
        Ok(Self {
            id: id.to_string(),
            loan_id: loan_id.to_string(),
            collateral_type,
            description: description.trim().to_string(),
            estimated_value,
            is_verified: false,
            verified_by: None,
            verified_at: None,
            verification_notes: None,
            created_at: Utc::now(),
        })
    }

    pub fn verify(&mut self, admin_id: &str, notes: Option<&str>, at: DateTime<Utc>) -> CoreResult<()> {
        if self.is_verified {
            return Err(CoreError::invalid_transition("Collateral", "verified", "verify"));
        }
        self.is_verified = true;
        self.verified_by = Some(admin_id.to_string());
        self.verified_at = Some(at);
        self.verification_notes = notes.map(str::to_string);
        Ok(())
    }
}

/// Total estimated value of verified pledges
pub fn verified_value(collateral: &[LoanCollateral]) -> Decimal {
    collateral
        .iter()
        .filter(|c| c.is_verified)
        .map(|c| c.estimated_value)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_collateral_validation() {
        assert!(LoanCollateral::new("COL_0001", "LOAN_0001", CollateralType::Vehicle, " ", dec!(100)).is_err());
        assert!(LoanCollateral::new("COL_0001", "LOAN_0001", CollateralType::Vehicle, "Probox", dec!(0)).is_err());
        assert_eq!(CollateralType::from_str("machinery"), Some(CollateralType::Equipment));
    }

    #[test]
    fn test_verify_once() {
        let mut car =
            LoanCollateral::new("COL_0001", "LOAN_0001", CollateralType::Vehicle, "KDA 123A", dec!(450000)).unwrap();
        let land =
            LoanCollateral::new("COL_0002", "LOAN_0001", CollateralType::Property, "Plot 7", dec!(900000)).unwrap();

        car.verify("MEM_0001", Some("logbook seen"), Utc::now()).unwrap();
        assert!(car.verify("MEM_0001", None, Utc::now()).unwrap_err().is_invalid_transition());
        assert_eq!(verified_value(&[car, land]), dec!(450000));
    }
}
