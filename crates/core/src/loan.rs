//! # Loan Module
//!
//! Loan application/loan record, guarantors and the loan state machine:
//!
//! ```text
//! applied ──approve──▶ approved ──disburse──▶ disbursed ──pay──▶ repaying ──settle──▶ closed
//!    ├──reject──▶ rejected
//!    └──cancel──▶ cancelled
//! ```

use crate::error::{CoreError, CoreResult};
use crate::money::percent_of;
use crate::schedule::{LoanTerms, RepaymentSchedule};
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest amount a member may request
pub const MINIMUM_LOAN_AMOUNT: Decimal = Decimal::ONE_HUNDRED;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Applied,
    Approved,
    Rejected,
    Cancelled,
    Disbursed,
    Repaying,
    Closed,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Applied => "applied",
            LoanStatus::Approved => "approved",
            LoanStatus::Rejected => "rejected",
            LoanStatus::Cancelled => "cancelled",
            LoanStatus::Disbursed => "disbursed",
            LoanStatus::Repaying => "repaying",
            LoanStatus::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "applied" | "pending" => Some(LoanStatus::Applied),
            "approved" => Some(LoanStatus::Approved),
            "rejected" => Some(LoanStatus::Rejected),
            "cancelled" => Some(LoanStatus::Cancelled),
            "disbursed" => Some(LoanStatus::Disbursed),
            "repaying" => Some(LoanStatus::Repaying),
            "closed" => Some(LoanStatus::Closed),
            _ => None,
        }
    }

    /// Funds are out and not fully repaid
    pub fn is_active(&self) -> bool {
        matches!(self, LoanStatus::Disbursed | LoanStatus::Repaying)
    }

    /// Blocks the borrower from opening another application
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            LoanStatus::Applied | LoanStatus::Approved | LoanStatus::Disbursed | LoanStatus::Repaying
        )
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuarantorStatus {
    Pending,
    Confirmed,
    Declined,
}

impl GuarantorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuarantorStatus::Pending => "pending",
            GuarantorStatus::Confirmed => "confirmed",
            GuarantorStatus::Declined => "declined",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(GuarantorStatus::Pending),
            "confirmed" => Some(GuarantorStatus::Confirmed),
            "declined" => Some(GuarantorStatus::Declined),
            _ => None,
        }
    }
}

impl fmt::Display for GuarantorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A member vouching for a share of a loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guarantor {
    pub loan_id: String,
    pub guarantor_id: String,
    /// Share of the loan guaranteed, 0 < p ≤ 100
    pub percentage: Decimal,
    pub status: GuarantorStatus,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Guarantor {
    pub fn new(loan_id: &str, guarantor_id: &str, percentage: Decimal) -> CoreResult<Self> {
        if percentage <= Decimal::ZERO || percentage > Decimal::ONE_HUNDRED {
            return Err(CoreError::ValidationError(format!(
                "guarantee percentage must be within (0, 100]: {}",
                percentage
            )));
        }
        Ok(Self {
            loan_id: loan_id.to_string(),
            guarantor_id: guarantor_id.to_string(),
            percentage,
            status: GuarantorStatus::Pending,
            responded_at: None,
            created_at: Utc::now(),
        })
    }

    /// Amount covered given the loan principal
    pub fn guaranteed_amount(&self, principal: Decimal) -> Decimal {
        percent_of(principal, self.percentage)
    }

    pub fn respond(&mut self, accept: bool, at: DateTime<Utc>) -> CoreResult<()> {
        if self.status != GuarantorStatus::Pending {
            return Err(CoreError::invalid_transition(
                "Guarantee",
                self.status.as_str(),
                if accept { "confirm" } else { "decline" },
            ));
        }
        self.status = if accept {
            GuarantorStatus::Confirmed
        } else {
            GuarantorStatus::Declined
        };
        self.responded_at = Some(at);
        Ok(())
    }
}

/// Sum of percentages, optionally only confirmed guarantees
pub fn total_guarantee(guarantors: &[Guarantor], confirmed_only: bool) -> Decimal {
    guarantors
        .iter()
        .filter(|g| match g.status {
            GuarantorStatus::Confirmed => true,
            GuarantorStatus::Pending => !confirmed_only,
            GuarantorStatus::Declined => false,
        })
        .map(|g| g.percentage)
        .sum()
}

/// Loan application and, once disbursed, the loan itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    /// LOAN_0001, ...
    pub id: String,
    /// LN-2026-0001, assigned at disbursement
    pub loan_number: Option<String>,
    pub member_id: String,
    pub loan_type_id: Option<String>,
    pub requested_amount: Decimal,
    pub approved_amount: Option<Decimal>,
    /// Annual percentage
    pub interest_rate: Decimal,
    pub period_months: u32,
    pub purpose: String,
    pub status: LoanStatus,
    pub monthly_payment: Option<Decimal>,
    pub total_repayment: Option<Decimal>,
    pub total_interest: Option<Decimal>,
    pub schedule: RepaymentSchedule,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub disbursement_reference: Option<String>,
    pub disbursement_cost: Option<Decimal>,
    pub disbursed_by: Option<String>,
    pub disbursed_at: Option<DateTime<Utc>>,
    /// Ledger entry created at approval and completed at disbursement
    pub disbursement_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    pub fn new(
        id: &str,
        member_id: &str,
        requested_amount: Decimal,
        interest_rate: Decimal,
        period_months: u32,
        purpose: &str,
    ) -> CoreResult<Self> {
        if requested_amount < MINIMUM_LOAN_AMOUNT {
            return Err(CoreError::InvalidAmount(format!(
                "minimum loan amount is {}, requested {}",
                MINIMUM_LOAN_AMOUNT, requested_amount
            )));
        }
        if period_months == 0 {
            return Err(CoreError::ValidationError(
                "repayment period must be at least one month".into(),
            ));
        }
        if purpose.trim().is_empty() {
            return Err(CoreError::ValidationError("loan purpose is required".into()));
        }
        let now = Utc::now();
        Ok(Self {
            id: id.to_string(),
            loan_number: None,
            member_id: member_id.to_string(),
            loan_type_id: None,
            requested_amount,
            approved_amount: None,
            interest_rate,
            period_months,
            purpose: purpose.to_string(),
            status: LoanStatus::Applied,
            monthly_payment: None,
            total_repayment: None,
            total_interest: None,
            schedule: RepaymentSchedule::default(),
            reviewed_by: None,
            reviewed_at: None,
            admin_notes: None,
            rejection_reason: None,
            disbursement_reference: None,
            disbursement_cost: None,
            disbursed_by: None,
            disbursed_at: None,
            disbursement_transaction_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_loan_type(mut self, loan_type_id: &str) -> Self {
        self.loan_type_id = Some(loan_type_id.to_string());
        self
    }

    /// Approved amount, falling back to the requested amount
    pub fn principal(&self) -> Decimal {
        self.approved_amount.unwrap_or(self.requested_amount)
    }

    fn ensure_status(&self, expected: LoanStatus, action: &str) -> CoreResult<()> {
        if self.status != expected {
            return Err(CoreError::invalid_transition("Loan", self.status.as_str(), action));
        }
        Ok(())
    }

    /// Fix the terms and move to approved
    pub fn approve(
        &mut self,
        admin_id: &str,
        approved_amount: Decimal,
        interest_rate: Decimal,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> CoreResult<LoanTerms> {
        self.ensure_status(LoanStatus::Applied, "approve")?;
        if approved_amount <= Decimal::ZERO || approved_amount > self.requested_amount {
            return Err(CoreError::InvalidAmount(format!(
                "approved amount must be within (0, {}]: {}",
                self.requested_amount, approved_amount
            )));
        }
        let terms = LoanTerms::calculate(approved_amount, interest_rate, self.period_months)?;

        self.status = LoanStatus::Approved;
        self.approved_amount = Some(approved_amount);
        self.interest_rate = interest_rate;
        self.monthly_payment = Some(terms.monthly_payment);
        self.total_repayment = Some(terms.total_repayment);
        self.total_interest = Some(terms.total_interest);
        self.reviewed_by = Some(admin_id.to_string());
        self.reviewed_at = Some(at);
        self.admin_notes = notes.map(str::to_string);
        self.updated_at = at;
        Ok(terms)
    }

    pub fn reject(&mut self, admin_id: &str, reason: &str, at: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_status(LoanStatus::Applied, "reject")?;
        self.status = LoanStatus::Rejected;
        self.rejection_reason = Some(reason.to_string());
        self.reviewed_by = Some(admin_id.to_string());
        self.reviewed_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Borrower withdraws the application before it is disbursed
    pub fn cancel(&mut self, at: DateTime<Utc>) -> CoreResult<()> {
        if !matches!(self.status, LoanStatus::Applied | LoanStatus::Approved) {
            return Err(CoreError::invalid_transition("Loan", self.status.as_str(), "cancel"));
        }
        self.status = LoanStatus::Cancelled;
        self.updated_at = at;
        Ok(())
    }

    /// Release funds: assigns the loan number and generates the schedule
    pub fn disburse(
        &mut self,
        admin_id: &str,
        loan_number: &str,
        reference: &str,
        cost: Option<Decimal>,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.ensure_status(LoanStatus::Approved, "disburse")?;
        let terms = LoanTerms::calculate(self.principal(), self.interest_rate, self.period_months)?;
        self.schedule = RepaymentSchedule::generate(&terms, at.date_naive())?;

        self.status = LoanStatus::Disbursed;
        self.loan_number = Some(loan_number.to_string());
        self.disbursement_reference = Some(reference.to_string());
        self.disbursement_cost = cost;
        self.disbursed_by = Some(admin_id.to_string());
        self.disbursed_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    pub fn outstanding(&self) -> Decimal {
        if self.status.is_active() {
            self.schedule.outstanding()
        } else if self.status == LoanStatus::Approved {
            self.total_repayment.unwrap_or(Decimal::ZERO)
        } else {
            Decimal::ZERO
        }
    }

    /// Recompute status after money moved against the schedule
    pub fn refresh_status(&mut self, at: DateTime<Utc>) {
        if !self.status.is_active() {
            return;
        }
        self.status = if self.schedule.is_settled() {
            LoanStatus::Closed
        } else if self.schedule.has_payments() {
            LoanStatus::Repaying
        } else {
            LoanStatus::Disbursed
        };
        self.updated_at = at;
    }
}

/// Format a loan number: `LN-{year}-{seq:04}`
pub fn format_loan_number(at: DateTime<Utc>, sequence: u32) -> String {
    format!("LN-{}-{:04}", at.year(), sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn loan() -> Loan {
        Loan::new("LOAN_0001", "MEM_0002", dec!(1000), dec!(12), 3, "school fees").unwrap()
    }

    #[test]
    fn test_minimum_amount_and_purpose() {
        assert!(Loan::new("L", "M", dec!(99.99), dec!(12), 3, "x").is_err());
        assert!(Loan::new("L", "M", dec!(100), dec!(12), 3, " ").is_err());
        assert!(Loan::new("L", "M", dec!(100), dec!(12), 0, "x").is_err());
    }

    #[test]
    fn test_guarantor_percentage_bounds() {
        assert!(Guarantor::new("L", "G", dec!(0)).is_err());
        assert!(Guarantor::new("L", "G", dec!(100.01)).is_err());
        let g = Guarantor::new("L", "G", dec!(30)).unwrap();
        assert_eq!(g.guaranteed_amount(dec!(1000)), dec!(300));
    }

    #[test]
    fn test_total_guarantee_confirmed_only() {
        let mut a = Guarantor::new("L", "G1", dec!(30)).unwrap();
        let mut b = Guarantor::new("L", "G2", dec!(30)).unwrap();
        let c = Guarantor::new("L", "G3", dec!(20)).unwrap();
        a.respond(true, Utc::now()).unwrap();
        b.respond(false, Utc::now()).unwrap();
        let all = vec![a, b, c];
        assert_eq!(total_guarantee(&all, true), dec!(30));
        assert_eq!(total_guarantee(&all, false), dec!(50));
    }

    #[test]
    fn test_guarantor_responds_once() {
        let mut g = Guarantor::new("L", "G1", dec!(30)).unwrap();
        g.respond(true, Utc::now()).unwrap();
        assert!(g.respond(false, Utc::now()).unwrap_err().is_invalid_transition());
    }

    #[test]
    fn test_lifecycle_to_closed() {
        let mut loan = loan();
        let now = Utc::now();
        let terms = loan.approve("MEM_0001", dec!(1000), dec!(12), None, now).unwrap();
        assert_eq!(loan.status, LoanStatus::Approved);
        assert_eq!(loan.outstanding(), terms.total_repayment);

        loan.disburse("MEM_0001", "LN-2026-0001", "MPESA-XYZ", None, now).unwrap();
        assert_eq!(loan.status, LoanStatus::Disbursed);
        assert_eq!(loan.schedule.installments.len(), 3);

        loan.schedule.apply_payment(dec!(100), now.date_naive()).unwrap();
        loan.refresh_status(now);
        assert_eq!(loan.status, LoanStatus::Repaying);

        let rest = loan.outstanding();
        loan.schedule.apply_payment(rest, now.date_naive()).unwrap();
        loan.refresh_status(now);
        assert_eq!(loan.status, LoanStatus::Closed);
        assert_eq!(loan.outstanding(), Decimal::ZERO);
    }

    #[test]
    fn test_cannot_disburse_unapproved() {
        let mut loan = loan();
        let err = loan.disburse("MEM_0001", "LN-2026-0001", "REF", None, Utc::now()).unwrap_err();
        assert!(err.is_invalid_transition());
    }

    #[test]
    fn test_approved_amount_cannot_exceed_request() {
        let mut loan = loan();
        assert!(loan.approve("MEM_0001", dec!(1500), dec!(12), None, Utc::now()).is_err());
        assert_eq!(loan.status, LoanStatus::Applied);
    }

    #[test]
    fn test_cancel_only_before_disbursement() {
        let mut loan = loan();
        let now = Utc::now();
        loan.approve("MEM_0001", dec!(800), dec!(12), None, now).unwrap();
        loan.disburse("MEM_0001", "LN-2026-0002", "REF", None, now).unwrap();
        assert!(loan.cancel(now).is_err());
    }

    #[test]
    fn test_loan_number_format() {
        let at = chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(format_loan_number(at, 12), "LN-2026-0012");
    }
}
