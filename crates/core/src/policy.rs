//! # Policy Module
//!
//! Cooperative-wide business parameters (a single settings record) and the
//! loan products members can apply for.

use crate::error::{CoreError, CoreResult};
use crate::schedule::MAX_REPAYMENT_MONTHS;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Singleton settings consulted by the loan engine and investment ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    pub sacco_name: String,
    pub currency: String,

    // === Membership ===
    pub minimum_membership_months: u32,

    // === Investments ===
    /// Ceiling on a member's confirmed share capital
    pub share_capital_amount: Decimal,
    pub minimum_monthly_investment: Decimal,
    pub allow_multiple_monthly_investments: bool,
    pub auto_approve_deposits: bool,

    // === Loans ===
    /// Maximum loan = (share capital + monthly) × multiplier
    pub loan_multiplier: Decimal,
    /// Annual percentage
    pub default_interest_rate: Decimal,
    pub maximum_loan_period_months: u32,
    pub require_guarantors: bool,
    /// Minimum sum of guarantee percentages
    pub minimum_guarantor_percentage: Decimal,
    /// Percentage of an overdue installment charged once
    pub late_penalty_rate: Decimal,
    pub penalty_grace_days: u32,

    // === Notifications ===
    pub send_notifications: bool,

    pub updated_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            sacco_name: "SACCO".to_string(),
            currency: "KES".to_string(),
            minimum_membership_months: 3,
            share_capital_amount: Decimal::from(5000),
            minimum_monthly_investment: Decimal::from(100),
            allow_multiple_monthly_investments: true,
            auto_approve_deposits: false,
            loan_multiplier: Decimal::from(3),
            default_interest_rate: Decimal::from(12),
            maximum_loan_period_months: 12,
            require_guarantors: true,
            minimum_guarantor_percentage: Decimal::from(25),
            late_penalty_rate: Decimal::from(5),
            penalty_grace_days: 0,
            send_notifications: true,
            updated_by: None,
            updated_at: None,
        }
    }
}

impl PolicySettings {
    /// Check every parameter is within its allowed range
    pub fn validate(&self) -> CoreResult<()> {
        let multiplier_min = Decimal::new(1, 1);
        if self.loan_multiplier < multiplier_min || self.loan_multiplier > Decimal::from(10) {
            return Err(invalid("loan_multiplier", "must be between 0.1 and 10", self.loan_multiplier));
        }
        if self.default_interest_rate < Decimal::ZERO || self.default_interest_rate > Decimal::ONE_HUNDRED {
            return Err(invalid("default_interest_rate", "must be between 0 and 100", self.default_interest_rate));
        }
        if self.minimum_guarantor_percentage < Decimal::ONE
            || self.minimum_guarantor_percentage > Decimal::ONE_HUNDRED
        {
            return Err(invalid(
                "minimum_guarantor_percentage",
                "must be between 1 and 100",
                self.minimum_guarantor_percentage,
            ));
        }
        if self.late_penalty_rate < Decimal::ZERO || self.late_penalty_rate > Decimal::ONE_HUNDRED {
            return Err(invalid("late_penalty_rate", "must be between 0 and 100", self.late_penalty_rate));
        }
        if self.share_capital_amount < Decimal::ZERO {
            return Err(invalid("share_capital_amount", "cannot be negative", self.share_capital_amount));
        }
        if self.minimum_monthly_investment < Decimal::ZERO {
            return Err(invalid(
                "minimum_monthly_investment",
                "cannot be negative",
                self.minimum_monthly_investment,
            ));
        }
        if self.maximum_loan_period_months == 0 || self.maximum_loan_period_months > MAX_REPAYMENT_MONTHS {
            return Err(CoreError::ValidationError(format!(
                "maximum_loan_period_months must be between 1 and {}",
                MAX_REPAYMENT_MONTHS
            )));
        }
        if self.currency.trim().is_empty() {
            return Err(CoreError::ValidationError("currency is required".into()));
        }
        Ok(())
    }

    /// Investment-based loan ceiling
    pub fn maximum_loan_for(&self, loan_eligible_investments: Decimal) -> Decimal {
        loan_eligible_investments * self.loan_multiplier
    }
}

fn invalid(field: &str, rule: &str, value: Decimal) -> CoreError {
    CoreError::ValidationError(format!("{} {} (got {})", field, rule, value))
}

/// A loan product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanType {
    /// LT_001, ...
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Annual percentage
    pub interest_rate: Decimal,
    pub maximum_amount: Decimal,
    pub maximum_period_months: u32,
    pub minimum_membership_months: u32,
    pub requires_guarantor: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl LoanType {
    pub fn new(id: &str, name: &str, interest_rate: Decimal, maximum_amount: Decimal, maximum_period_months: u32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            interest_rate,
            maximum_amount,
            maximum_period_months,
            minimum_membership_months: 3,
            requires_guarantor: true,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_minimum_membership(mut self, months: u32) -> Self {
        self.minimum_membership_months = months;
        self
    }

    pub fn without_guarantor(mut self) -> Self {
        self.requires_guarantor = false;
        self
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ValidationError("loan type name is required".into()));
        }
        if self.interest_rate < Decimal::ZERO || self.interest_rate > Decimal::ONE_HUNDRED {
            return Err(invalid("interest_rate", "must be between 0 and 100", self.interest_rate));
        }
        if self.maximum_amount <= Decimal::ZERO {
            return Err(invalid("maximum_amount", "must be positive", self.maximum_amount));
        }
        if self.maximum_period_months == 0 || self.maximum_period_months > MAX_REPAYMENT_MONTHS {
            return Err(CoreError::ValidationError(format!(
                "maximum_period_months must be between 1 and {}",
                MAX_REPAYMENT_MONTHS
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_are_valid() {
        let settings = PolicySettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.minimum_membership_months, 3);
        assert_eq!(settings.minimum_guarantor_percentage, dec!(25));
        assert_eq!(settings.maximum_loan_for(dec!(1500)), dec!(4500));
    }

    #[test]
    fn test_multiplier_range() {
        let mut settings = PolicySettings::default();
        settings.loan_multiplier = dec!(0.05);
        assert!(settings.validate().is_err());
        settings.loan_multiplier = dec!(10.5);
        assert!(settings.validate().is_err());
        settings.loan_multiplier = dec!(0.1);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_guarantor_percentage_range() {
        let mut settings = PolicySettings::default();
        settings.minimum_guarantor_percentage = dec!(0);
        assert!(settings.validate().is_err());
        settings.minimum_guarantor_percentage = dec!(101);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: PolicySettings =
            serde_json::from_str(r#"{"minimum_guarantor_percentage":"70"}"#).unwrap();
        assert_eq!(settings.minimum_guarantor_percentage, dec!(70));
        assert_eq!(settings.share_capital_amount, dec!(5000));
    }

    #[test]
    fn test_loan_type_validation() {
        let lt = LoanType::new("LT_001", "Emergency", dec!(10), dec!(50000), 6);
        assert!(lt.validate().is_ok());
        let bad = LoanType::new("LT_002", "", dec!(10), dec!(50000), 6);
        assert!(bad.validate().is_err());
        let endless = LoanType::new("LT_003", "Mortgage", dec!(10), dec!(50000), MAX_REPAYMENT_MONTHS + 1);
        assert!(endless.validate().is_err());
    }

    #[test]
    fn test_loan_period_bounded() {
        let mut settings = PolicySettings::default();
        settings.maximum_loan_period_months = MAX_REPAYMENT_MONTHS;
        assert!(settings.validate().is_ok());
        settings.maximum_loan_period_months = 2000;
        assert!(settings.validate().is_err());
    }
}
