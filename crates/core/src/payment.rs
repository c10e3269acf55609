//! # Loan Payment Module
//!
//! Member-submitted repayments awaiting admin confirmation.

use crate::error::{CoreError, CoreResult};
use crate::schedule::Allocation;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(PaymentStatus::Pending),
            "confirmed" => Some(PaymentStatus::Confirmed),
            "rejected" => Some(PaymentStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanPayment {
    /// PAY_000001, ...
    pub id: String,
    pub loan_id: String,
    pub member_id: String,
    pub amount: Decimal,
    pub reference: String,
    pub payment_method: Option<String>,
    pub status: PaymentStatus,
    /// Filled in on confirmation
    pub allocations: Vec<Allocation>,
    pub confirmed_by: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    /// Ledger entry recorded on confirmation
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LoanPayment {
    pub fn new(id: &str, loan_id: &str, member_id: &str, amount: Decimal, reference: &str) -> CoreResult<Self> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::InvalidAmount(format!(
                "payment amount must be positive: {}",
                amount
            )));
        }
        if reference.trim().is_empty() {
            return Err(CoreError::ValidationError("payment reference is required".into()));
        }
        Ok(Self {
            id: id.to_string(),
            loan_id: loan_id.to_string(),
            member_id: member_id.to_string(),
            amount,
            reference: reference.to_string(),
            payment_method: None,
            status: PaymentStatus::Pending,
            allocations: Vec::new(),
            confirmed_by: None,
            confirmed_at: None,
            rejection_reason: None,
            transaction_id: None,
            created_at: Utc::now(),
        })
    }

    pub fn with_payment_method(mut self, method: &str) -> Self {
        self.payment_method = Some(method.to_string());
        self
    }

    /// Only a pending payment can be confirmed; a second attempt is a state error
    pub fn ensure_pending(&self, action: &str) -> CoreResult<()> {
        if self.status != PaymentStatus::Pending {
            return Err(CoreError::invalid_transition("LoanPayment", self.status.as_str(), action));
        }
        Ok(())
    }

    pub fn confirm(
        &mut self,
        admin_id: &str,
        allocations: Vec<Allocation>,
        transaction_id: &str,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.ensure_pending("confirm")?;
        self.status = PaymentStatus::Confirmed;
        self.allocations = allocations;
        self.transaction_id = Some(transaction_id.to_string());
        self.confirmed_by = Some(admin_id.to_string());
        self.confirmed_at = Some(at);
        Ok(())
    }

    pub fn reject(&mut self, admin_id: &str, reason: &str, at: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_pending("reject")?;
        self.status = PaymentStatus::Rejected;
        self.rejection_reason = Some(reason.to_string());
        self.confirmed_by = Some(admin_id.to_string());
        self.confirmed_at = Some(at);
        Ok(())
    }

    pub fn allocated_penalty(&self) -> Decimal {
        self.allocations.iter().map(|a| a.penalty).sum()
    }

    pub fn allocated_interest(&self) -> Decimal {
        self.allocations.iter().map(|a| a.interest).sum()
    }

    pub fn allocated_principal(&self) -> Decimal {
        self.allocations.iter().map(|a| a.principal).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_second_confirm_is_state_error() {
        let mut payment = LoanPayment::new("PAY_1", "LOAN_1", "MEM_2", dec!(100), "MPESA1").unwrap();
        let alloc = vec![Allocation {
            installment: 1,
            penalty: dec!(0),
            interest: dec!(10),
            principal: dec!(90),
        }];
        payment.confirm("MEM_1", alloc.clone(), "LPY-1", Utc::now()).unwrap();
        assert_eq!(payment.allocated_principal(), dec!(90));

        let err = payment.confirm("MEM_1", alloc, "LPY-2", Utc::now()).unwrap_err();
        assert!(err.is_invalid_transition());
        assert_eq!(payment.transaction_id.as_deref(), Some("LPY-1"));
    }

    #[test]
    fn test_payment_validation() {
        assert!(LoanPayment::new("PAY_1", "LOAN_1", "MEM_2", dec!(0), "R").is_err());
        assert!(LoanPayment::new("PAY_1", "LOAN_1", "MEM_2", dec!(10), "").is_err());
    }
}
