//! # Event Module
//!
//! Audit events. Every state-changing operation appends one immutable
//! event to the JSONL audit trail after its database transaction commits.

use crate::member::MemberRole;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // === Membership events ===
    ApplicationSubmitted,
    ApplicationApproved,
    ApplicationRejected,
    ApplicationInfoRequested,
    ApplicationResubmitted,
    AdminRegistered,
    MemberStandingChanged,

    // === Investment events ===
    InvestmentCreated,
    InvestmentConfirmed,
    InvestmentRejected,
    DividendsCalculated,
    DividendPaid,
    TargetCreated,
    TargetDeactivated,

    // === Loan events ===
    LoanApplied,
    GuaranteeConfirmed,
    GuaranteeDeclined,
    LoanApproved,
    LoanRejected,
    LoanCancelled,
    LoanDisbursed,
    PaymentSubmitted,
    PaymentConfirmed,
    PaymentRejected,
    PenaltyAccrued,
    PenaltyWaived,
    CollateralAdded,
    CollateralVerified,
    LoanCommentAdded,
    LoanCommentResolved,

    // === Ledger events ===
    TransactionCreated,
    TransactionCompleted,
    TransactionReversed,

    // === Policy events ===
    SettingsUpdated,
    LoanTypeCreated,
    LoanTypeUpdated,
}

impl EventType {
    pub const ALL: [EventType; 36] = [
        EventType::ApplicationSubmitted,
        EventType::ApplicationApproved,
        EventType::ApplicationRejected,
        EventType::ApplicationInfoRequested,
        EventType::ApplicationResubmitted,
        EventType::AdminRegistered,
        EventType::MemberStandingChanged,
        EventType::InvestmentCreated,
        EventType::InvestmentConfirmed,
        EventType::InvestmentRejected,
        EventType::DividendsCalculated,
        EventType::DividendPaid,
        EventType::TargetCreated,
        EventType::TargetDeactivated,
        EventType::LoanApplied,
        EventType::GuaranteeConfirmed,
        EventType::GuaranteeDeclined,
        EventType::LoanApproved,
        EventType::LoanRejected,
        EventType::LoanCancelled,
        EventType::LoanDisbursed,
        EventType::PaymentSubmitted,
        EventType::PaymentConfirmed,
        EventType::PaymentRejected,
        EventType::PenaltyAccrued,
        EventType::PenaltyWaived,
        EventType::CollateralAdded,
        EventType::CollateralVerified,
        EventType::LoanCommentAdded,
        EventType::LoanCommentResolved,
        EventType::TransactionCreated,
        EventType::TransactionCompleted,
        EventType::TransactionReversed,
        EventType::SettingsUpdated,
        EventType::LoanTypeCreated,
        EventType::LoanTypeUpdated,
    ];

    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.to_lowercase();
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ApplicationSubmitted => "application_submitted",
            EventType::ApplicationApproved => "application_approved",
            EventType::ApplicationRejected => "application_rejected",
            EventType::ApplicationInfoRequested => "application_info_requested",
            EventType::ApplicationResubmitted => "application_resubmitted",
            EventType::AdminRegistered => "admin_registered",
            EventType::MemberStandingChanged => "member_standing_changed",
            EventType::InvestmentCreated => "investment_created",
            EventType::InvestmentConfirmed => "investment_confirmed",
            EventType::InvestmentRejected => "investment_rejected",
            EventType::DividendsCalculated => "dividends_calculated",
            EventType::DividendPaid => "dividend_paid",
            EventType::TargetCreated => "target_created",
            EventType::TargetDeactivated => "target_deactivated",
            EventType::LoanApplied => "loan_applied",
            EventType::GuaranteeConfirmed => "guarantee_confirmed",
            EventType::GuaranteeDeclined => "guarantee_declined",
            EventType::LoanApproved => "loan_approved",
            EventType::LoanRejected => "loan_rejected",
            EventType::LoanCancelled => "loan_cancelled",
            EventType::LoanDisbursed => "loan_disbursed",
            EventType::PaymentSubmitted => "payment_submitted",
            EventType::PaymentConfirmed => "payment_confirmed",
            EventType::PaymentRejected => "payment_rejected",
            EventType::PenaltyAccrued => "penalty_accrued",
            EventType::PenaltyWaived => "penalty_waived",
            EventType::CollateralAdded => "collateral_added",
            EventType::CollateralVerified => "collateral_verified",
            EventType::LoanCommentAdded => "loan_comment_added",
            EventType::LoanCommentResolved => "loan_comment_resolved",
            EventType::TransactionCreated => "transaction_created",
            EventType::TransactionCompleted => "transaction_completed",
            EventType::TransactionReversed => "transaction_reversed",
            EventType::SettingsUpdated => "settings_updated",
            EventType::LoanTypeCreated => "loan_type_created",
            EventType::LoanTypeUpdated => "loan_type_updated",
        }
    }

    /// Events that move money on the ledger
    pub fn is_financial(&self) -> bool {
        matches!(
            self,
            EventType::InvestmentConfirmed
                | EventType::DividendPaid
                | EventType::LoanDisbursed
                | EventType::PaymentConfirmed
                | EventType::TransactionCompleted
                | EventType::TransactionReversed
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// EVT_000001, ...
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,

    // === Actor ===
    pub actor_id: String,
    pub actor_role: MemberRole,

    // === Subject ===
    /// Member the action concerns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    /// Id of the application / investment / loan / payment / transaction
    pub entity_id: String,

    // === Amount ===
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Event {
    pub fn new(
        event_id: String,
        event_type: EventType,
        actor_id: &str,
        actor_role: MemberRole,
        entity_id: &str,
    ) -> Self {
        Self {
            event_id,
            timestamp: Utc::now(),
            event_type,
            actor_id: actor_id.to_string(),
            actor_role,
            member_id: None,
            entity_id: entity_id.to_string(),
            amount: None,
            currency: None,
            reference: None,
            description: None,
        }
    }

    // === Builder methods ===

    pub fn for_member(mut self, member_id: &str) -> Self {
        self.member_id = Some(member_id.to_string());
        self
    }

    pub fn with_amount(mut self, amount: Decimal, currency: &str) -> Self {
        self.amount = Some(amount);
        self.currency = Some(currency.to_string());
        self
    }

    pub fn with_reference(mut self, reference: &str) -> Self {
        self.reference = Some(reference.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Format an event id from its sequence number
    pub fn generate_id(counter: u64) -> String {
        format!("EVT_{:06}", counter)
    }

    /// Single JSONL line
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} by {} on {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.event_type,
            self.actor_id,
            self.entity_id
        )
    }
}
