//! Database schema definitions
//!
//! Row types for sqlx mapping from SQLite tables, and conversions to the
//! domain types. Schema lives in migrations/

use crate::error::{PersistenceError, PersistenceResult};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sacco_core::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Row type for table `members`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct MemberRow {
    pub id: String,
    pub member_number: Option<String>,
    pub role: String,
    pub kyc_status: String,
    pub standing: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub id_number: String,
    pub address: Option<String>,
    pub employment_status: Option<String>,
    pub next_of_kin: Option<String>,
    pub next_of_kin_phone: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Row type for table `applications`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ApplicationRow {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub id_number: String,
    pub address: Option<String>,
    pub employment_status: Option<String>,
    pub next_of_kin: Option<String>,
    pub next_of_kin_phone: Option<String>,
    pub status: String,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub required_information: Option<String>,
    pub member_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row type for table `investments`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct InvestmentRow {
    pub id: String,
    pub member_id: String,
    pub category: String,
    pub amount: String, // Decimal stored as TEXT
    pub reference: Option<String>,
    pub payment_method: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub confirmed_by: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Row type for table `loan_types`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct LoanTypeRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub interest_rate: String,
    pub maximum_amount: String,
    pub maximum_period_months: i64,
    pub minimum_membership_months: i64,
    pub requires_guarantor: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Row type for table `loans`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct LoanRow {
    pub id: String,
    pub loan_number: Option<String>,
    pub member_id: String,
    pub loan_type_id: Option<String>,
    pub requested_amount: String,
    pub approved_amount: Option<String>,
    pub interest_rate: String,
    pub period_months: i64,
    pub purpose: String,
    pub status: String,
    pub monthly_payment: Option<String>,
    pub total_repayment: Option<String>,
    pub total_interest: Option<String>,
    /// Installments as JSON
    pub schedule: String,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub disbursement_reference: Option<String>,
    pub disbursement_cost: Option<String>,
    pub disbursed_by: Option<String>,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub disbursement_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row type for table `guarantors`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct GuarantorRow {
    pub loan_id: String,
    pub guarantor_id: String,
    pub percentage: String,
    pub status: String,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Row type for table `loan_payments`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct LoanPaymentRow {
    pub id: String,
    pub loan_id: String,
    pub member_id: String,
    pub amount: String,
    pub reference: String,
    pub payment_method: Option<String>,
    pub status: String,
    /// Allocations as JSON
    pub allocations: String,
    pub confirmed_by: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Row type for table `transactions`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TransactionRow {
    pub id: String,
    pub member_id: String,
    pub tx_type: String,
    pub category: String,
    pub direction: String,
    pub amount: String,
    pub currency: String,
    pub description: String,
    pub reference: Option<String>,
    pub status: String,
    pub balance_before: Option<String>,
    pub balance_after: Option<String>,
    pub investment_id: Option<String>,
    pub loan_id: Option<String>,
    pub payment_id: Option<String>,
    pub reverses_id: Option<String>,
    pub processed_by: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Row type for table `notifications`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct NotificationRow {
    pub id: String,
    pub recipient_id: String,
    pub kind: String,
    pub category: String,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub related_type: Option<String>,
    pub related_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Row type for table `deliveries`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct DeliveryRow {
    pub id: String,
    pub notification_id: String,
    pub recipient_id: String,
    pub channel: String,
    pub destination: String,
    pub status: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Row type for table `dividends`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct DividendRow {
    pub id: String,
    pub year: i64,
    pub member_id: String,
    pub share_capital_amount: String,
    pub monthly_investment_amount: String,
    pub share_capital_rate: String,
    pub monthly_investment_rate: String,
    pub share_capital_dividend: String,
    pub monthly_investment_dividend: String,
    pub total_dividend: String,
    pub status: String,
    pub calculated_by: String,
    pub calculated_at: DateTime<Utc>,
    pub paid_by: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<String>,
}

/// Row type for table `investment_targets`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TargetRow {
    pub id: String,
    pub scope: String,
    pub name: String,
    pub description: Option<String>,
    pub target_amount: String,
    pub period: String,
    pub member_id: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub current_amount: String,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row type for table `loan_collateral`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct CollateralRow {
    pub id: String,
    pub loan_id: String,
    pub collateral_type: String,
    pub description: String,
    pub estimated_value: String,
    pub is_verified: bool,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verification_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Row type for table `loan_comments`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct CommentRow {
    pub id: String,
    pub loan_id: String,
    pub kind: String,
    pub body: String,
    pub created_by: String,
    pub is_private: bool,
    pub follow_up_date: Option<NaiveDate>,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
}

// === Field helpers ===

pub(crate) fn parse_decimal(field: &str, value: &str) -> PersistenceResult<Decimal> {
    Decimal::from_str(value)
        .map_err(|_| PersistenceError::InvalidDecimal(format!("{} = {}", field, value)))
}

pub(crate) fn parse_opt_decimal(field: &str, value: Option<&str>) -> PersistenceResult<Option<Decimal>> {
    value.map(|v| parse_decimal(field, v)).transpose()
}

fn parse_enum<T>(field: &str, value: &str, parse: fn(&str) -> Option<T>) -> PersistenceResult<T> {
    parse(value).ok_or_else(|| PersistenceError::invalid_enum(field, value))
}

fn months(field: &str, value: i64) -> PersistenceResult<u32> {
    u32::try_from(value).map_err(|_| PersistenceError::invalid_enum(field, &value.to_string()))
}

fn profile_of(
    full_name: String,
    email: String,
    phone: String,
    id_number: String,
    address: Option<String>,
    employment_status: Option<String>,
    next_of_kin: Option<String>,
    next_of_kin_phone: Option<String>,
) -> MemberProfile {
    MemberProfile {
        full_name,
        email,
        phone,
        id_number,
        address,
        employment_status,
        next_of_kin,
        next_of_kin_phone,
    }
}

// === Conversion implementations ===

impl From<&Member> for MemberRow {
    fn from(m: &Member) -> Self {
        Self {
            id: m.id.clone(),
            member_number: m.member_number.clone(),
            role: m.role.as_str().to_string(),
            kyc_status: m.kyc_status.as_str().to_string(),
            standing: m.standing.as_str().to_string(),
            full_name: m.profile.full_name.clone(),
            email: m.profile.email.clone(),
            phone: m.profile.phone.clone(),
            id_number: m.profile.id_number.clone(),
            address: m.profile.address.clone(),
            employment_status: m.profile.employment_status.clone(),
            next_of_kin: m.profile.next_of_kin.clone(),
            next_of_kin_phone: m.profile.next_of_kin_phone.clone(),
            approved_at: m.approved_at,
            created_at: m.created_at,
        }
    }
}

impl TryFrom<MemberRow> for Member {
    type Error = PersistenceError;

    fn try_from(row: MemberRow) -> PersistenceResult<Self> {
        Ok(Self {
            role: parse_enum("role", &row.role, MemberRole::from_str)?,
            kyc_status: parse_enum("kyc_status", &row.kyc_status, KycStatus::from_str)?,
            standing: parse_enum("standing", &row.standing, MemberStanding::from_str)?,
            profile: profile_of(
                row.full_name,
                row.email,
                row.phone,
                row.id_number,
                row.address,
                row.employment_status,
                row.next_of_kin,
                row.next_of_kin_phone,
            ),
            id: row.id,
            member_number: row.member_number,
            approved_at: row.approved_at,
            created_at: row.created_at,
        })
    }
}

impl From<&MemberApplication> for ApplicationRow {
    fn from(a: &MemberApplication) -> Self {
        Self {
            id: a.id.clone(),
            full_name: a.profile.full_name.clone(),
            email: a.profile.email.clone(),
            phone: a.profile.phone.clone(),
            id_number: a.profile.id_number.clone(),
            address: a.profile.address.clone(),
            employment_status: a.profile.employment_status.clone(),
            next_of_kin: a.profile.next_of_kin.clone(),
            next_of_kin_phone: a.profile.next_of_kin_phone.clone(),
            status: a.status.as_str().to_string(),
            reviewed_by: a.reviewed_by.clone(),
            reviewed_at: a.reviewed_at,
            admin_notes: a.admin_notes.clone(),
            rejection_reason: a.rejection_reason.clone(),
            required_information: a.required_information.clone(),
            member_id: a.member_id.clone(),
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

impl TryFrom<ApplicationRow> for MemberApplication {
    type Error = PersistenceError;

    fn try_from(row: ApplicationRow) -> PersistenceResult<Self> {
        Ok(Self {
            status: parse_enum("status", &row.status, ApplicationStatus::from_str)?,
            profile: profile_of(
                row.full_name,
                row.email,
                row.phone,
                row.id_number,
                row.address,
                row.employment_status,
                row.next_of_kin,
                row.next_of_kin_phone,
            ),
            id: row.id,
            reviewed_by: row.reviewed_by,
            reviewed_at: row.reviewed_at,
            admin_notes: row.admin_notes,
            rejection_reason: row.rejection_reason,
            required_information: row.required_information,
            member_id: row.member_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<&Investment> for InvestmentRow {
    fn from(i: &Investment) -> Self {
        Self {
            id: i.id.clone(),
            member_id: i.member_id.clone(),
            category: i.category.as_str().to_string(),
            amount: i.amount.to_string(),
            reference: i.reference.clone(),
            payment_method: i.payment_method.clone(),
            status: i.status.as_str().to_string(),
            notes: i.notes.clone(),
            confirmed_by: i.confirmed_by.clone(),
            confirmed_at: i.confirmed_at,
            created_at: i.created_at,
        }
    }
}

impl TryFrom<InvestmentRow> for Investment {
    type Error = PersistenceError;

    fn try_from(row: InvestmentRow) -> PersistenceResult<Self> {
        Ok(Self {
            category: parse_enum("category", &row.category, InvestmentCategory::from_str)?,
            amount: parse_decimal("amount", &row.amount)?,
            status: parse_enum("status", &row.status, InvestmentStatus::from_str)?,
            id: row.id,
            member_id: row.member_id,
            reference: row.reference,
            payment_method: row.payment_method,
            notes: row.notes,
            confirmed_by: row.confirmed_by,
            confirmed_at: row.confirmed_at,
            created_at: row.created_at,
        })
    }
}

impl From<&LoanType> for LoanTypeRow {
    fn from(t: &LoanType) -> Self {
        Self {
            id: t.id.clone(),
            name: t.name.clone(),
            description: t.description.clone(),
            interest_rate: t.interest_rate.to_string(),
            maximum_amount: t.maximum_amount.to_string(),
            maximum_period_months: t.maximum_period_months as i64,
            minimum_membership_months: t.minimum_membership_months as i64,
            requires_guarantor: t.requires_guarantor,
            is_active: t.is_active,
            created_at: t.created_at,
        }
    }
}

impl TryFrom<LoanTypeRow> for LoanType {
    type Error = PersistenceError;

    fn try_from(row: LoanTypeRow) -> PersistenceResult<Self> {
        Ok(Self {
            interest_rate: parse_decimal("interest_rate", &row.interest_rate)?,
            maximum_amount: parse_decimal("maximum_amount", &row.maximum_amount)?,
            maximum_period_months: months("maximum_period_months", row.maximum_period_months)?,
            minimum_membership_months: months("minimum_membership_months", row.minimum_membership_months)?,
            id: row.id,
            name: row.name,
            description: row.description,
            requires_guarantor: row.requires_guarantor,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<&Loan> for LoanRow {
    type Error = PersistenceError;

    fn try_from(l: &Loan) -> PersistenceResult<Self> {
        Ok(Self {
            id: l.id.clone(),
            loan_number: l.loan_number.clone(),
            member_id: l.member_id.clone(),
            loan_type_id: l.loan_type_id.clone(),
            requested_amount: l.requested_amount.to_string(),
            approved_amount: l.approved_amount.map(|d| d.to_string()),
            interest_rate: l.interest_rate.to_string(),
            period_months: l.period_months as i64,
            purpose: l.purpose.clone(),
            status: l.status.as_str().to_string(),
            monthly_payment: l.monthly_payment.map(|d| d.to_string()),
            total_repayment: l.total_repayment.map(|d| d.to_string()),
            total_interest: l.total_interest.map(|d| d.to_string()),
            schedule: l.schedule.to_json()?,
            reviewed_by: l.reviewed_by.clone(),
            reviewed_at: l.reviewed_at,
            admin_notes: l.admin_notes.clone(),
            rejection_reason: l.rejection_reason.clone(),
            disbursement_reference: l.disbursement_reference.clone(),
            disbursement_cost: l.disbursement_cost.map(|d| d.to_string()),
            disbursed_by: l.disbursed_by.clone(),
            disbursed_at: l.disbursed_at,
            disbursement_transaction_id: l.disbursement_transaction_id.clone(),
            created_at: l.created_at,
            updated_at: l.updated_at,
        })
    }
}

impl TryFrom<LoanRow> for Loan {
    type Error = PersistenceError;

    fn try_from(row: LoanRow) -> PersistenceResult<Self> {
        Ok(Self {
            requested_amount: parse_decimal("requested_amount", &row.requested_amount)?,
            approved_amount: parse_opt_decimal("approved_amount", row.approved_amount.as_deref())?,
            interest_rate: parse_decimal("interest_rate", &row.interest_rate)?,
            period_months: months("period_months", row.period_months)?,
            status: parse_enum("status", &row.status, LoanStatus::from_str)?,
            monthly_payment: parse_opt_decimal("monthly_payment", row.monthly_payment.as_deref())?,
            total_repayment: parse_opt_decimal("total_repayment", row.total_repayment.as_deref())?,
            total_interest: parse_opt_decimal("total_interest", row.total_interest.as_deref())?,
            schedule: RepaymentSchedule::from_json(&row.schedule)?,
            disbursement_cost: parse_opt_decimal("disbursement_cost", row.disbursement_cost.as_deref())?,
            id: row.id,
            loan_number: row.loan_number,
            member_id: row.member_id,
            loan_type_id: row.loan_type_id,
            purpose: row.purpose,
            reviewed_by: row.reviewed_by,
            reviewed_at: row.reviewed_at,
            admin_notes: row.admin_notes,
            rejection_reason: row.rejection_reason,
            disbursement_reference: row.disbursement_reference,
            disbursed_by: row.disbursed_by,
            disbursed_at: row.disbursed_at,
            disbursement_transaction_id: row.disbursement_transaction_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<&Guarantor> for GuarantorRow {
    fn from(g: &Guarantor) -> Self {
        Self {
            loan_id: g.loan_id.clone(),
            guarantor_id: g.guarantor_id.clone(),
            percentage: g.percentage.to_string(),
            status: g.status.as_str().to_string(),
            responded_at: g.responded_at,
            created_at: g.created_at,
        }
    }
}

impl TryFrom<GuarantorRow> for Guarantor {
    type Error = PersistenceError;

    fn try_from(row: GuarantorRow) -> PersistenceResult<Self> {
        Ok(Self {
            percentage: parse_decimal("percentage", &row.percentage)?,
            status: parse_enum("status", &row.status, GuarantorStatus::from_str)?,
            loan_id: row.loan_id,
            guarantor_id: row.guarantor_id,
            responded_at: row.responded_at,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<&LoanPayment> for LoanPaymentRow {
    type Error = PersistenceError;

    fn try_from(p: &LoanPayment) -> PersistenceResult<Self> {
        Ok(Self {
            id: p.id.clone(),
            loan_id: p.loan_id.clone(),
            member_id: p.member_id.clone(),
            amount: p.amount.to_string(),
            reference: p.reference.clone(),
            payment_method: p.payment_method.clone(),
            status: p.status.as_str().to_string(),
            allocations: serde_json::to_string(&p.allocations)?,
            confirmed_by: p.confirmed_by.clone(),
            confirmed_at: p.confirmed_at,
            rejection_reason: p.rejection_reason.clone(),
            transaction_id: p.transaction_id.clone(),
            created_at: p.created_at,
        })
    }
}

impl TryFrom<LoanPaymentRow> for LoanPayment {
    type Error = PersistenceError;

    fn try_from(row: LoanPaymentRow) -> PersistenceResult<Self> {
        Ok(Self {
            amount: parse_decimal("amount", &row.amount)?,
            status: parse_enum("status", &row.status, PaymentStatus::from_str)?,
            allocations: serde_json::from_str(&row.allocations)?,
            id: row.id,
            loan_id: row.loan_id,
            member_id: row.member_id,
            reference: row.reference,
            payment_method: row.payment_method,
            confirmed_by: row.confirmed_by,
            confirmed_at: row.confirmed_at,
            rejection_reason: row.rejection_reason,
            transaction_id: row.transaction_id,
            created_at: row.created_at,
        })
    }
}

impl From<&Transaction> for TransactionRow {
    fn from(t: &Transaction) -> Self {
        Self {
            id: t.id.clone(),
            member_id: t.member_id.clone(),
            tx_type: t.tx_type.as_str().to_string(),
            category: t.category.as_str().to_string(),
            direction: t.direction.as_str().to_string(),
            amount: t.amount.to_string(),
            currency: t.currency.clone(),
            description: t.description.clone(),
            reference: t.reference.clone(),
            status: t.status.as_str().to_string(),
            balance_before: t.balance_before.map(|d| d.to_string()),
            balance_after: t.balance_after.map(|d| d.to_string()),
            investment_id: t.investment_id.clone(),
            loan_id: t.loan_id.clone(),
            payment_id: t.payment_id.clone(),
            reverses_id: t.reverses_id.clone(),
            processed_by: t.processed_by.clone(),
            processed_at: t.processed_at,
            created_at: t.created_at,
        }
    }
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = PersistenceError;

    fn try_from(row: TransactionRow) -> PersistenceResult<Self> {
        Ok(Self {
            tx_type: parse_enum("tx_type", &row.tx_type, TransactionType::from_str)?,
            category: parse_enum("category", &row.category, TransactionCategory::from_str)?,
            direction: parse_enum("direction", &row.direction, Direction::from_str)?,
            amount: parse_decimal("amount", &row.amount)?,
            status: parse_enum("status", &row.status, TransactionStatus::from_str)?,
            balance_before: parse_opt_decimal("balance_before", row.balance_before.as_deref())?,
            balance_after: parse_opt_decimal("balance_after", row.balance_after.as_deref())?,
            id: row.id,
            member_id: row.member_id,
            currency: row.currency,
            description: row.description,
            reference: row.reference,
            investment_id: row.investment_id,
            loan_id: row.loan_id,
            payment_id: row.payment_id,
            reverses_id: row.reverses_id,
            processed_by: row.processed_by,
            processed_at: row.processed_at,
            created_at: row.created_at,
        })
    }
}

impl From<&Notification> for NotificationRow {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id.clone(),
            recipient_id: n.recipient_id.clone(),
            kind: n.kind.as_str().to_string(),
            category: n.category.as_str().to_string(),
            title: n.title.clone(),
            message: n.message.clone(),
            is_read: n.is_read,
            read_at: n.read_at,
            related_type: n.related_type.clone(),
            related_id: n.related_id.clone(),
            expires_at: n.expires_at,
            created_at: n.created_at,
        }
    }
}

impl TryFrom<NotificationRow> for Notification {
    type Error = PersistenceError;

    fn try_from(row: NotificationRow) -> PersistenceResult<Self> {
        Ok(Self {
            kind: parse_enum("kind", &row.kind, NotificationKind::from_str)?,
            category: parse_enum("category", &row.category, NotificationCategory::from_str)?,
            id: row.id,
            recipient_id: row.recipient_id,
            title: row.title,
            message: row.message,
            is_read: row.is_read,
            read_at: row.read_at,
            related_type: row.related_type,
            related_id: row.related_id,
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }
}

impl From<&Delivery> for DeliveryRow {
    fn from(d: &Delivery) -> Self {
        Self {
            id: d.id.clone(),
            notification_id: d.notification_id.clone(),
            recipient_id: d.recipient_id.clone(),
            channel: d.channel.as_str().to_string(),
            destination: d.destination.clone(),
            status: d.status.as_str().to_string(),
            attempts: d.attempts as i64,
            last_error: d.last_error.clone(),
            sent_at: d.sent_at,
            created_at: d.created_at,
        }
    }
}

impl TryFrom<DeliveryRow> for Delivery {
    type Error = PersistenceError;

    fn try_from(row: DeliveryRow) -> PersistenceResult<Self> {
        Ok(Self {
            channel: parse_enum("channel", &row.channel, Channel::from_str)?,
            status: parse_enum("status", &row.status, DeliveryStatus::from_str)?,
            attempts: months("attempts", row.attempts)?,
            id: row.id,
            notification_id: row.notification_id,
            recipient_id: row.recipient_id,
            destination: row.destination,
            last_error: row.last_error,
            sent_at: row.sent_at,
            created_at: row.created_at,
        })
    }
}

impl From<&Dividend> for DividendRow {
    fn from(d: &Dividend) -> Self {
        Self {
            id: d.id.clone(),
            year: i64::from(d.year),
            member_id: d.member_id.clone(),
            share_capital_amount: d.share_capital_amount.to_string(),
            monthly_investment_amount: d.monthly_investment_amount.to_string(),
            share_capital_rate: d.rates.share_capital.to_string(),
            monthly_investment_rate: d.rates.monthly_investment.to_string(),
            share_capital_dividend: d.share_capital_dividend.to_string(),
            monthly_investment_dividend: d.monthly_investment_dividend.to_string(),
            total_dividend: d.total_dividend.to_string(),
            status: d.status.as_str().to_string(),
            calculated_by: d.calculated_by.clone(),
            calculated_at: d.calculated_at,
            paid_by: d.paid_by.clone(),
            paid_at: d.paid_at,
            transaction_id: d.transaction_id.clone(),
        }
    }
}

impl TryFrom<DividendRow> for Dividend {
    type Error = PersistenceError;

    fn try_from(row: DividendRow) -> PersistenceResult<Self> {
        Ok(Self {
            year: i32::try_from(row.year)
                .map_err(|_| PersistenceError::invalid_enum("year", &row.year.to_string()))?,
            share_capital_amount: parse_decimal("share_capital_amount", &row.share_capital_amount)?,
            monthly_investment_amount: parse_decimal(
                "monthly_investment_amount",
                &row.monthly_investment_amount,
            )?,
            rates: DividendRates {
                share_capital: parse_decimal("share_capital_rate", &row.share_capital_rate)?,
                monthly_investment: parse_decimal("monthly_investment_rate", &row.monthly_investment_rate)?,
            },
            share_capital_dividend: parse_decimal("share_capital_dividend", &row.share_capital_dividend)?,
            monthly_investment_dividend: parse_decimal(
                "monthly_investment_dividend",
                &row.monthly_investment_dividend,
            )?,
            total_dividend: parse_decimal("total_dividend", &row.total_dividend)?,
            status: parse_enum("status", &row.status, DividendStatus::from_str)?,
            id: row.id,
            member_id: row.member_id,
            calculated_by: row.calculated_by,
            calculated_at: row.calculated_at,
            paid_by: row.paid_by,
            paid_at: row.paid_at,
            transaction_id: row.transaction_id,
        })
    }
}

impl From<&InvestmentTarget> for TargetRow {
    fn from(t: &InvestmentTarget) -> Self {
        Self {
            id: t.id.clone(),
            scope: t.scope.as_str().to_string(),
            name: t.name.clone(),
            description: t.description.clone(),
            target_amount: t.target_amount.to_string(),
            period: t.period.as_str().to_string(),
            member_id: t.member_id.clone(),
            start_date: t.start_date,
            end_date: t.end_date,
            current_amount: t.current_amount.to_string(),
            is_active: t.is_active,
            created_by: t.created_by.clone(),
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

impl TryFrom<TargetRow> for InvestmentTarget {
    type Error = PersistenceError;

    fn try_from(row: TargetRow) -> PersistenceResult<Self> {
        Ok(Self {
            scope: parse_enum("scope", &row.scope, TargetScope::from_str)?,
            period: parse_enum("period", &row.period, TargetPeriod::from_str)?,
            target_amount: parse_decimal("target_amount", &row.target_amount)?,
            current_amount: parse_decimal("current_amount", &row.current_amount)?,
            id: row.id,
            name: row.name,
            description: row.description,
            member_id: row.member_id,
            start_date: row.start_date,
            end_date: row.end_date,
            is_active: row.is_active,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<&LoanCollateral> for CollateralRow {
    fn from(c: &LoanCollateral) -> Self {
        Self {
            id: c.id.clone(),
            loan_id: c.loan_id.clone(),
            collateral_type: c.collateral_type.as_str().to_string(),
            description: c.description.clone(),
            estimated_value: c.estimated_value.to_string(),
            is_verified: c.is_verified,
            verified_by: c.verified_by.clone(),
            verified_at: c.verified_at,
            verification_notes: c.verification_notes.clone(),
            created_at: c.created_at,
        }
    }
}

impl TryFrom<CollateralRow> for LoanCollateral {
    type Error = PersistenceError;

    fn try_from(row: CollateralRow) -> PersistenceResult<Self> {
        Ok(Self {
            collateral_type: parse_enum("collateral_type", &row.collateral_type, CollateralType::from_str)?,
            estimated_value: parse_decimal("estimated_value", &row.estimated_value)?,
            id: row.id,
            loan_id: row.loan_id,
            description: row.description,
            is_verified: row.is_verified,
            verified_by: row.verified_by,
            verified_at: row.verified_at,
            verification_notes: row.verification_notes,
            created_at: row.created_at,
        })
    }
}

impl From<&LoanComment> for CommentRow {
    fn from(c: &LoanComment) -> Self {
        Self {
            id: c.id.clone(),
            loan_id: c.loan_id.clone(),
            kind: c.kind.as_str().to_string(),
            body: c.body.clone(),
            created_by: c.created_by.clone(),
            is_private: c.is_private,
            follow_up_date: c.follow_up_date,
            is_resolved: c.is_resolved,
            created_at: c.created_at,
        }
    }
}

impl TryFrom<CommentRow> for LoanComment {
    type Error = PersistenceError;

    fn try_from(row: CommentRow) -> PersistenceResult<Self> {
        Ok(Self {
            kind: parse_enum("kind", &row.kind, CommentKind::from_str)?,
            id: row.id,
            loan_id: row.loan_id,
            body: row.body,
            created_by: row.created_by,
            is_private: row.is_private,
            follow_up_date: row.follow_up_date,
            is_resolved: row.is_resolved,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_transaction_row_roundtrip() {
        let mut tx = Transaction::new("MEM_0002", TransactionType::Deposit, dec!(150.50), "KES", "share capital")
            .unwrap()
            .with_investment("INV_000001");
        tx.complete("MEM_0001", dec!(0), Utc::now()).unwrap();

        let row = TransactionRow::from(&tx);
        assert_eq!(row.amount, "150.50");
        assert_eq!(row.direction, "credit");

        let back = Transaction::try_from(row).unwrap();
        assert_eq!(back, tx);
    }

    #[test]
    fn test_bad_enum_is_reported() {
        let mut row = TransactionRow::from(
            &Transaction::new("MEM_0002", TransactionType::Deposit, dec!(1), "KES", "x").unwrap(),
        );
        row.direction = "sideways".into();
        let err = Transaction::try_from(row).unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidEnumValue { .. }));
    }

    #[test]
    fn test_bad_decimal_is_reported() {
        assert!(parse_decimal("amount", "12.x").is_err());
        assert_eq!(parse_opt_decimal("amount", None).unwrap(), None);
    }

    #[test]
    fn test_dividend_row_keeps_rates() {
        let mut inv = Investment::new("INV_000001", "MEM_0002", InvestmentCategory::ShareCapital, dec!(2500)).unwrap();
        inv.confirm("MEM_0001", Utc::now()).unwrap();
        let rates = DividendRates::new(dec!(11.5), dec!(6)).unwrap();
        let year = chrono::Datelike::year(&Utc::now());
        let dividend =
            Dividend::calculate("DIV_000001", year, "MEM_0002", &[inv], rates, "MEM_0001", Utc::now()).unwrap();

        let row = DividendRow::from(&dividend);
        assert_eq!(row.share_capital_rate, "11.5");
        assert_eq!(parse_decimal("total_dividend", &row.total_dividend).unwrap(), dec!(287.50));
        assert_eq!(Dividend::try_from(row).unwrap(), dividend);
    }
}
