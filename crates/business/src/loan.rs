//! Loan engine - application, guarantees, approval, disbursement, repayment
//!
//! ```text
//! applied ──approve──▶ approved ──disburse──▶ disbursed ──pay──▶ repaying ──▶ closed
//!    │                    │
//!    ├──reject──▶ rejected│
//!    └──cancel──▶ cancelled◀┘
//! ```
//!
//! Approval appends a pending disbursement to the ledger; disbursement
//! completes it. Each confirmed repayment appends a confirmed debit.

use crate::error::{BusinessError, BusinessResult};
use crate::ledger::{complete_pending, post_confirmed};
use crate::notifications::{Notice, NotificationService};
use crate::policy::current_settings;
use crate::services::{load_member, require_active_member, require_admin, ServiceContext};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use sacco_core::{
    format_loan_number, total_guarantee, CollateralType, CommentKind, EventType, Guarantor,
    GuarantorStatus, InvestmentSummary, Loan, LoanCollateral, LoanComment, LoanPayment, LoanStatus,
    LoanTerms, LoanType, Member, NotificationCategory, NotificationKind, PaymentStatus,
    PenaltyAccrual, PolicySettings, RepaymentSchedule, Transaction, TransactionType,
};
use sacco_persistence::{
    next_id, CollateralRepo, CommentRepo, GuarantorRepo, InvestmentRepo, LoanRepo, LoanTypeRepo,
    PaymentRepo, TransactionRepo,
};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

// === Request / result types ===

/// A member's loan application
#[derive(Debug, Clone)]
pub struct LoanRequest {
    pub member_id: String,
    pub loan_type_id: Option<String>,
    pub amount: Decimal,
    pub period_months: u32,
    pub purpose: String,
    /// (guarantor member id, percentage of the loan guaranteed)
    pub guarantors: Vec<(String, Decimal)>,
}

impl LoanRequest {
    pub fn new(member_id: &str, amount: Decimal, period_months: u32, purpose: &str) -> Self {
        Self {
            member_id: member_id.to_string(),
            loan_type_id: None,
            amount,
            period_months,
            purpose: purpose.trim().to_string(),
            guarantors: Vec::new(),
        }
    }

    pub fn with_loan_type(mut self, loan_type_id: &str) -> Self {
        self.loan_type_id = Some(loan_type_id.to_string());
        self
    }

    pub fn with_guarantor(mut self, member_id: &str, percentage: Decimal) -> Self {
        self.guarantors.push((member_id.to_string(), percentage));
        self
    }
}

/// Outcome of an eligibility check; `reasons` is empty when eligible
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eligibility {
    pub eligible: bool,
    pub reasons: Vec<String>,
    /// Investment-based ceiling for this member
    pub maximum_loan: Decimal,
}

/// An active loan with at least one installment past due
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverdueLoan {
    pub loan: Loan,
    pub overdue_days: i64,
    pub overdue_installments: usize,
    pub outstanding: Decimal,
}

/// Penalties assessed on one loan by a sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccruedPenalties {
    pub loan_id: String,
    pub member_id: String,
    pub accruals: Vec<PenaltyAccrual>,
}

impl AccruedPenalties {
    pub fn total(&self) -> Decimal {
        self.accruals.iter().map(|a| a.amount).sum()
    }
}

// === Eligibility ===

#[allow(clippy::too_many_arguments)]
async fn assess(
    conn: &mut SqliteConnection,
    member: &Member,
    amount: Decimal,
    period_months: u32,
    loan_type: Option<&LoanType>,
    settings: &PolicySettings,
    exclude_loan: Option<&str>,
    now: DateTime<Utc>,
) -> BusinessResult<Eligibility> {
    let mut reasons = Vec::new();

    if !member.is_in_good_standing() {
        reasons.push(format!(
            "member {} is not KYC-approved and in good standing",
            member.id
        ));
    }

    let minimum_months = loan_type
        .map(|lt| lt.minimum_membership_months)
        .unwrap_or(0)
        .max(settings.minimum_membership_months);
    if !member.meets_tenure(minimum_months, now) {
        reasons.push(format!(
            "membership of {} months is below the required {}",
            member.membership_months(now),
            minimum_months
        ));
    }

    let in_progress: Vec<String> = LoanRepo::in_progress_for_member(&mut *conn, &member.id)
        .await?
        .into_iter()
        .filter(|id| Some(id.as_str()) != exclude_loan)
        .collect();
    if let Some(existing) = in_progress.first() {
        reasons.push(format!("loan {} is already in progress", existing));
    }

    let investments = InvestmentRepo::list_by_member(&mut *conn, &member.id).await?;
    let summary = InvestmentSummary::from_investments(&member.id, &investments, settings.loan_multiplier);
    let maximum_loan = settings.maximum_loan_for(summary.loan_eligible);
    if amount > maximum_loan {
        reasons.push(format!(
            "amount {} exceeds the investment-based maximum of {}",
            amount, maximum_loan
        ));
    }

    let mut maximum_period = settings.maximum_loan_period_months;
    if let Some(lt) = loan_type {
        if amount > lt.maximum_amount {
            reasons.push(format!(
                "amount {} exceeds the {} maximum of {}",
                amount, lt.name, lt.maximum_amount
            ));
        }
        maximum_period = maximum_period.min(lt.maximum_period_months);
    }
    if period_months > maximum_period {
        reasons.push(format!(
            "period of {} months exceeds the maximum of {}",
            period_months, maximum_period
        ));
    }

    Ok(Eligibility {
        eligible: reasons.is_empty(),
        reasons,
        maximum_loan,
    })
}

fn guarantors_required(settings: &PolicySettings, loan_type: Option<&LoanType>) -> bool {
    settings.require_guarantors && loan_type.map_or(true, |lt| lt.requires_guarantor)
}

async fn load_loan_type(conn: &mut SqliteConnection, loan_type_id: Option<&str>) -> BusinessResult<Option<LoanType>> {
    match loan_type_id {
        Some(id) => Ok(Some(
            LoanTypeRepo::get_by_id(&mut *conn, id)
                .await
                .map_err(BusinessError::from)?,
        )),
        None => Ok(None),
    }
}

/// Loan Service - the loan engine
pub struct LoanService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> LoanService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Terms of a prospective loan, without touching the database
    pub fn calculate_terms(amount: Decimal, annual_rate: Decimal, months: u32) -> BusinessResult<LoanTerms> {
        Ok(LoanTerms::calculate(amount, annual_rate, months).map_err(BusinessError::from)?)
    }

    /// Reasons a member could not borrow `amount` right now
    pub async fn check_eligibility(
        &self,
        member_id: &str,
        amount: Decimal,
        period_months: u32,
        loan_type_id: Option<&str>,
    ) -> BusinessResult<Eligibility> {
        let mut conn = self.ctx.pool().acquire().await?;
        let member = load_member(&mut *conn, member_id).await?;
        let settings = current_settings(&mut *conn).await?;
        let loan_type = load_loan_type(&mut conn, loan_type_id).await?;
        assess(
            &mut conn,
            &member,
            amount,
            period_months,
            loan_type.as_ref(),
            &settings,
            None,
            Utc::now(),
        )
        .await
    }

    // === Application ===

    pub async fn apply_for_loan(&self, request: LoanRequest) -> BusinessResult<Loan> {
        let now = Utc::now();
        let mut tx = self.ctx.pool().begin().await?;
        let borrower = load_member(&mut *tx, &request.member_id).await?;
        let settings = current_settings(&mut *tx).await?;
        let loan_type = load_loan_type(&mut tx, request.loan_type_id.as_deref()).await?;
        if let Some(lt) = &loan_type {
            if !lt.is_active {
                return Err(BusinessError::Validation(format!("loan type {} is not active", lt.name)).into());
            }
        }

        let eligibility = assess(
            &mut tx,
            &borrower,
            request.amount,
            request.period_months,
            loan_type.as_ref(),
            &settings,
            None,
            now,
        )
        .await?;
        if !eligibility.eligible {
            warn!(member_id = %borrower.id, reasons = ?eligibility.reasons, "loan application refused");
            return Err(BusinessError::ineligible(eligibility.reasons).into());
        }

        let id = next_id(&mut *tx, "loans", "LOAN", 4).await?;
        let rate = loan_type
            .as_ref()
            .map_or(settings.default_interest_rate, |lt| lt.interest_rate);
        let mut loan = Loan::new(&id, &borrower.id, request.amount, rate, request.period_months, &request.purpose)
            .map_err(BusinessError::from)?;
        if let Some(lt) = &loan_type {
            loan = loan.with_loan_type(&lt.id);
        }

        let mut pledges: Vec<Guarantor> = Vec::with_capacity(request.guarantors.len());
        for (guarantor_id, percentage) in &request.guarantors {
            if guarantor_id == &borrower.id {
                return Err(BusinessError::Validation("a borrower cannot guarantee their own loan".into()).into());
            }
            if pledges.iter().any(|g| &g.guarantor_id == guarantor_id) {
                return Err(BusinessError::Validation(format!("guarantor {} is listed twice", guarantor_id)).into());
            }
            let guarantor = load_member(&mut *tx, guarantor_id).await?;
            if !guarantor.is_in_good_standing() {
                return Err(BusinessError::Validation(format!(
                    "guarantor {} is not an approved member in good standing",
                    guarantor_id
                ))
                .into());
            }
            pledges.push(Guarantor::new(&id, guarantor_id, *percentage).map_err(BusinessError::from)?);
        }

        let pledged = total_guarantee(&pledges, false);
        if pledged > Decimal::ONE_HUNDRED {
            return Err(BusinessError::Validation(format!("guarantee percentages sum to {}%, above 100%", pledged)).into());
        }
        if guarantors_required(&settings, loan_type.as_ref()) && pledged < settings.minimum_guarantor_percentage {
            warn!(member_id = %borrower.id, %pledged, "guarantor shortfall at application");
            return Err(BusinessError::GuarantorShortfall {
                required: settings.minimum_guarantor_percentage,
                pledged,
            }
            .into());
        }

        LoanRepo::insert(&mut *tx, &loan).await?;
        for pledge in &pledges {
            GuarantorRepo::insert(&mut *tx, pledge).await?;
        }
        tx.commit().await?;

        info!(loan_id = %id, member_id = %borrower.id, amount = %loan.requested_amount, "loan applied");
        self.ctx.emit(
            self.ctx
                .event(EventType::LoanApplied, &borrower, &id)
                .for_member(&borrower.id)
                .with_amount(loan.requested_amount, &settings.currency)
                .with_description(&loan.purpose),
        )?;

        let notifier = NotificationService::new(self.ctx);
        for pledge in &pledges {
            notifier
                .notify_quietly(
                    &pledge.guarantor_id,
                    Notice::new(
                        NotificationKind::Reminder,
                        NotificationCategory::Loan,
                        "Guarantee requested",
                        format!(
                            "{} asked you to guarantee {}% of a {} {} loan",
                            borrower.profile.full_name, pledge.percentage, settings.currency, loan.requested_amount
                        ),
                    )
                    .about("loan", &id),
                )
                .await;
        }
        notifier
            .notify_quietly(
                &borrower.id,
                Notice::new(
                    NotificationKind::Info,
                    NotificationCategory::Loan,
                    "Loan application received",
                    format!("Your application {} is awaiting review", id),
                )
                .about("loan", &id),
            )
            .await;
        Ok(loan)
    }

    pub async fn confirm_guarantee(&self, guarantor_id: &str, loan_id: &str) -> BusinessResult<Guarantor> {
        self.respond_to_guarantee(guarantor_id, loan_id, true).await
    }

    pub async fn decline_guarantee(&self, guarantor_id: &str, loan_id: &str) -> BusinessResult<Guarantor> {
        self.respond_to_guarantee(guarantor_id, loan_id, false).await
    }

    async fn respond_to_guarantee(&self, guarantor_id: &str, loan_id: &str, accept: bool) -> BusinessResult<Guarantor> {
        let mut tx = self.ctx.pool().begin().await?;
        let guarantor = require_active_member(&mut *tx, guarantor_id, "respond to guarantee").await?;
        let loan = LoanRepo::get_by_id(&mut *tx, loan_id)
            .await
            .map_err(BusinessError::from)?;
        if loan.status != LoanStatus::Applied {
            return Err(BusinessError::invalid_transition("Loan", loan.status.as_str(), "respond to guarantee for").into());
        }

        let mut pledge = GuarantorRepo::get(&mut *tx, loan_id, guarantor_id)
            .await
            .map_err(BusinessError::from)?;
        pledge.respond(accept, Utc::now()).map_err(BusinessError::from)?;
        GuarantorRepo::record_response(&mut *tx, &pledge)
            .await
            .map_err(BusinessError::from)?;
        tx.commit().await?;

        let (event_type, verb) = if accept {
            (EventType::GuaranteeConfirmed, "confirmed")
        } else {
            (EventType::GuaranteeDeclined, "declined")
        };
        info!(loan_id, guarantor_id, verb, "guarantee answered");
        self.ctx.emit(
            self.ctx
                .event(event_type, &guarantor, loan_id)
                .for_member(&loan.member_id)
                .with_description(&format!("{}%", pledge.percentage)),
        )?;
        NotificationService::new(self.ctx)
            .notify_quietly(
                &loan.member_id,
                Notice::new(
                    if accept { NotificationKind::Success } else { NotificationKind::Warning },
                    NotificationCategory::Loan,
                    format!("Guarantee {}", verb),
                    format!(
                        "{} {} a {}% guarantee for loan {}",
                        guarantor.profile.full_name, verb, pledge.percentage, loan_id
                    ),
                )
                .about("loan", loan_id),
            )
            .await;
        Ok(pledge)
    }

    // === Review ===

    /// Fix terms and queue the disbursement. Confirmed guarantees must
    /// reach the policy minimum.
    pub async fn approve(
        &self,
        admin_id: &str,
        loan_id: &str,
        approved_amount: Option<Decimal>,
        interest_rate: Option<Decimal>,
        notes: Option<&str>,
    ) -> BusinessResult<Loan> {
        let now = Utc::now();
        let mut tx = self.ctx.pool().begin().await?;
        let admin = require_admin(&mut *tx, admin_id, "approve loan").await?;
        let mut loan = LoanRepo::get_by_id(&mut *tx, loan_id)
            .await
            .map_err(BusinessError::from)?;
        if loan.status != LoanStatus::Applied {
            return Err(BusinessError::invalid_transition("Loan", loan.status.as_str(), "approve").into());
        }

        let borrower = load_member(&mut *tx, &loan.member_id).await?;
        let settings = current_settings(&mut *tx).await?;
        let loan_type = load_loan_type(&mut tx, loan.loan_type_id.as_deref()).await?;
        let amount = approved_amount.unwrap_or(loan.requested_amount);

        let eligibility = assess(
            &mut tx,
            &borrower,
            amount,
            loan.period_months,
            loan_type.as_ref(),
            &settings,
            Some(loan_id),
            now,
        )
        .await?;
        if !eligibility.eligible {
            warn!(loan_id, reasons = ?eligibility.reasons, "approval refused");
            return Err(BusinessError::ineligible(eligibility.reasons).into());
        }

        if guarantors_required(&settings, loan_type.as_ref()) {
            let pledges = GuarantorRepo::list_for_loan(&mut *tx, loan_id).await?;
            let confirmed = total_guarantee(&pledges, true);
            if confirmed < settings.minimum_guarantor_percentage {
                warn!(loan_id, %confirmed, "guarantor shortfall at approval");
                return Err(BusinessError::GuarantorShortfall {
                    required: settings.minimum_guarantor_percentage,
                    pledged: confirmed,
                }
                .into());
            }
        }

        let rate = interest_rate.unwrap_or(loan.interest_rate);
        let terms = loan
            .approve(&admin.id, amount, rate, notes, now)
            .map_err(BusinessError::from)?;

        let disbursement = Transaction::new(
            &borrower.id,
            TransactionType::LoanDisbursement,
            terms.principal,
            &settings.currency,
            &format!("Disbursement of loan {}", loan_id),
        )
        .map_err(BusinessError::from)?
        .with_loan(loan_id);
        TransactionRepo::insert(&mut *tx, &disbursement).await?;
        loan.disbursement_transaction_id = Some(disbursement.id.clone());

        LoanRepo::update(&mut *tx, &loan, LoanStatus::Applied)
            .await
            .map_err(BusinessError::from)?;
        tx.commit().await?;

        info!(loan_id, amount = %terms.principal, monthly = %terms.monthly_payment, "loan approved");
        self.ctx.emit(
            self.ctx
                .event(EventType::LoanApproved, &admin, loan_id)
                .for_member(&borrower.id)
                .with_amount(terms.principal, &settings.currency)
                .with_reference(&disbursement.id),
        )?;
        NotificationService::new(self.ctx)
            .notify_quietly(
                &borrower.id,
                Notice::new(
                    NotificationKind::Success,
                    NotificationCategory::Loan,
                    "Loan approved",
                    format!(
                        "Loan {} approved for {} {} at {}%: {} monthly over {} months",
                        loan_id, settings.currency, terms.principal, rate, terms.monthly_payment, terms.months
                    ),
                )
                .about("loan", loan_id),
            )
            .await;
        Ok(loan)
    }

    pub async fn reject(&self, admin_id: &str, loan_id: &str, reason: &str) -> BusinessResult<Loan> {
        if reason.trim().is_empty() {
            return Err(BusinessError::Validation("a rejection reason is required".into()).into());
        }

        let mut tx = self.ctx.pool().begin().await?;
        let admin = require_admin(&mut *tx, admin_id, "reject loan").await?;
        let mut loan = LoanRepo::get_by_id(&mut *tx, loan_id)
            .await
            .map_err(BusinessError::from)?;
        loan.reject(&admin.id, reason, Utc::now())
            .map_err(BusinessError::from)?;
        LoanRepo::update(&mut *tx, &loan, LoanStatus::Applied)
            .await
            .map_err(BusinessError::from)?;
        tx.commit().await?;

        info!(loan_id, "loan rejected");
        self.ctx.emit(
            self.ctx
                .event(EventType::LoanRejected, &admin, loan_id)
                .for_member(&loan.member_id)
                .with_description(reason),
        )?;
        NotificationService::new(self.ctx)
            .notify_quietly(
                &loan.member_id,
                Notice::new(
                    NotificationKind::Error,
                    NotificationCategory::Loan,
                    "Loan rejected",
                    format!("Loan {} was not approved: {}", loan_id, reason),
                )
                .about("loan", loan_id),
            )
            .await;
        Ok(loan)
    }

    /// Borrower withdraws before disbursement
    pub async fn cancel(&self, member_id: &str, loan_id: &str) -> BusinessResult<Loan> {
        let mut tx = self.ctx.pool().begin().await?;
        let member = load_member(&mut *tx, member_id).await?;
        let mut loan = LoanRepo::get_by_id(&mut *tx, loan_id)
            .await
            .map_err(BusinessError::from)?;
        if loan.member_id != member.id {
            return Err(BusinessError::permission_denied(member_id, "cancel another member's loan").into());
        }

        let prior = loan.status;
        loan.cancel(Utc::now()).map_err(BusinessError::from)?;
        LoanRepo::update(&mut *tx, &loan, prior)
            .await
            .map_err(BusinessError::from)?;
        tx.commit().await?;

        info!(loan_id, from = %prior, "loan cancelled");
        self.ctx.emit(
            self.ctx
                .event(EventType::LoanCancelled, &member, loan_id)
                .for_member(&member.id),
        )?;
        Ok(loan)
    }

    /// Release funds: loan number, schedule and the ledger credit
    pub async fn disburse(
        &self,
        admin_id: &str,
        loan_id: &str,
        reference: &str,
        cost: Option<Decimal>,
    ) -> BusinessResult<Loan> {
        if reference.trim().is_empty() {
            return Err(BusinessError::Validation("a disbursement reference is required".into()).into());
        }
        if cost.is_some_and(|c| c < Decimal::ZERO) {
            return Err(BusinessError::InvalidAmount("disbursement cost cannot be negative".into()).into());
        }

        let now = Utc::now();
        let mut tx = self.ctx.pool().begin().await?;
        let admin = require_admin(&mut *tx, admin_id, "disburse loan").await?;
        let settings = current_settings(&mut *tx).await?;
        let mut loan = LoanRepo::get_by_id(&mut *tx, loan_id)
            .await
            .map_err(BusinessError::from)?;

        let sequence = LoanRepo::count_numbered(&mut *tx, now.year()).await? + 1;
        loan.disburse(&admin.id, &format_loan_number(now, sequence), reference, cost, now)
            .map_err(BusinessError::from)?;

        let credit = match loan.disbursement_transaction_id.clone() {
            Some(pending_id) => complete_pending(&mut tx, &pending_id, &admin.id, now).await?,
            None => {
                let entry = Transaction::new(
                    &loan.member_id,
                    TransactionType::LoanDisbursement,
                    loan.principal(),
                    &settings.currency,
                    &format!("Disbursement of loan {}", loan_id),
                )
                .map_err(BusinessError::from)?
                .with_loan(loan_id)
                .with_reference(reference);
                let entry = post_confirmed(&mut tx, entry, &admin.id, now).await?;
                loan.disbursement_transaction_id = Some(entry.id.clone());
                entry
            }
        };

        LoanRepo::update(&mut *tx, &loan, LoanStatus::Approved)
            .await
            .map_err(BusinessError::from)?;
        tx.commit().await?;

        let number = loan.loan_number.clone().unwrap_or_default();
        info!(loan_id, loan_number = %number, transaction_id = %credit.id, "loan disbursed");
        self.ctx.emit(
            self.ctx
                .event(EventType::LoanDisbursed, &admin, loan_id)
                .for_member(&loan.member_id)
                .with_amount(credit.amount, &settings.currency)
                .with_reference(reference),
        )?;
        let first_due = loan
            .schedule
            .next_due()
            .map(|i| i.due_date.to_string())
            .unwrap_or_default();
        NotificationService::new(self.ctx)
            .notify_quietly(
                &loan.member_id,
                Notice::new(
                    NotificationKind::Success,
                    NotificationCategory::Loan,
                    "Loan disbursed",
                    format!(
                        "Loan {} of {} {} has been disbursed. First installment due {}",
                        number, settings.currency, credit.amount, first_due
                    ),
                )
                .about("loan", loan_id),
            )
            .await;
        Ok(loan)
    }

    // === Repayment ===

    /// Borrower reports a repayment; it is applied once an admin confirms it
    pub async fn make_payment(
        &self,
        member_id: &str,
        loan_id: &str,
        amount: Decimal,
        reference: &str,
        payment_method: Option<&str>,
    ) -> BusinessResult<LoanPayment> {
        let mut tx = self.ctx.pool().begin().await?;
        let member = load_member(&mut *tx, member_id).await?;
        let loan = LoanRepo::get_by_id(&mut *tx, loan_id)
            .await
            .map_err(BusinessError::from)?;
        if loan.member_id != member.id {
            return Err(BusinessError::permission_denied(member_id, "pay another member's loan").into());
        }
        if !loan.status.is_active() {
            return Err(BusinessError::invalid_transition("Loan", loan.status.as_str(), "pay").into());
        }
        let outstanding = loan.outstanding();
        if amount > outstanding {
            warn!(loan_id, %amount, %outstanding, "overpayment refused");
            return Err(BusinessError::Overpayment {
                outstanding,
                attempted: amount,
            }
            .into());
        }

        let id = next_id(&mut *tx, "loan_payments", "PAY", 6).await?;
        let mut payment = LoanPayment::new(&id, loan_id, &member.id, amount, reference).map_err(BusinessError::from)?;
        if let Some(method) = payment_method {
            payment = payment.with_payment_method(method);
        }
        PaymentRepo::insert(&mut *tx, &payment).await?;
        tx.commit().await?;

        let settings = current_settings(self.ctx.pool()).await?;
        info!(payment_id = %id, loan_id, %amount, "loan payment submitted");
        self.ctx.emit(
            self.ctx
                .event(EventType::PaymentSubmitted, &member, &id)
                .for_member(&member.id)
                .with_amount(amount, &settings.currency)
                .with_reference(reference),
        )?;
        Ok(payment)
    }

    /// Apply a pending payment FIFO and post the ledger debit.
    ///
    /// Late penalties are accrued as of today first, so the payment settles
    /// them before interest and principal.
    pub async fn confirm_payment(&self, admin_id: &str, payment_id: &str) -> BusinessResult<LoanPayment> {
        let now = Utc::now();
        let today = now.date_naive();
        let mut tx = self.ctx.pool().begin().await?;
        let admin = require_admin(&mut *tx, admin_id, "confirm payment").await?;
        let mut payment = PaymentRepo::get_by_id(&mut *tx, payment_id)
            .await
            .map_err(BusinessError::from)?;
        payment.ensure_pending("confirm").map_err(BusinessError::from)?;

        let mut loan = LoanRepo::get_by_id(&mut *tx, &payment.loan_id)
            .await
            .map_err(BusinessError::from)?;
        let prior = loan.status;
        if !prior.is_active() {
            return Err(BusinessError::invalid_transition("Loan", prior.as_str(), "apply payment to").into());
        }
        let settings = current_settings(&mut *tx).await?;

        let accruals = loan
            .schedule
            .accrue_penalties(today, settings.late_penalty_rate, settings.penalty_grace_days);
        let outstanding = loan.outstanding();
        if payment.amount > outstanding {
            warn!(payment_id, amount = %payment.amount, %outstanding, "overpayment at confirmation");
            return Err(BusinessError::Overpayment {
                outstanding,
                attempted: payment.amount,
            }
            .into());
        }
        let allocations = loan
            .schedule
            .apply_payment(payment.amount, today)
            .map_err(BusinessError::from)?;
        loan.refresh_status(now);

        let debit = Transaction::new(
            &loan.member_id,
            TransactionType::LoanPayment,
            payment.amount,
            &settings.currency,
            &format!(
                "Repayment of loan {}",
                loan.loan_number.as_deref().unwrap_or(loan.id.as_str())
            ),
        )
        .map_err(BusinessError::from)?
        .with_loan(&loan.id)
        .with_payment(payment_id)
        .with_reference(&payment.reference);
        let debit = post_confirmed(&mut tx, debit, &admin.id, now).await?;

        payment
            .confirm(&admin.id, allocations, &debit.id, now)
            .map_err(BusinessError::from)?;
        PaymentRepo::record_decision(&mut *tx, &payment)
            .await
            .map_err(BusinessError::from)?;
        LoanRepo::update(&mut *tx, &loan, prior)
            .await
            .map_err(BusinessError::from)?;
        tx.commit().await?;

        info!(payment_id, loan_id = %loan.id, status = %loan.status, outstanding = %loan.outstanding(), "payment confirmed");
        let penalty: Decimal = accruals.iter().map(|a| a.amount).sum();
        if !accruals.is_empty() {
            self.ctx.emit(
                self.ctx
                    .event(EventType::PenaltyAccrued, &admin, &loan.id)
                    .for_member(&loan.member_id)
                    .with_amount(penalty, &settings.currency),
            )?;
        }
        self.ctx.emit(
            self.ctx
                .event(EventType::PaymentConfirmed, &admin, payment_id)
                .for_member(&loan.member_id)
                .with_amount(payment.amount, &settings.currency)
                .with_reference(&debit.id),
        )?;

        let notifier = NotificationService::new(self.ctx);
        if !accruals.is_empty() {
            notifier.notify_quietly(&loan.member_id, penalty_notice(&loan, penalty, &settings)).await;
        }
        let message = if loan.status == LoanStatus::Closed {
            format!("Payment of {} received. Loan {} is fully repaid", payment.amount, loan.id)
        } else {
            format!(
                "Payment of {} received. Outstanding on loan {}: {}",
                payment.amount,
                loan.id,
                loan.outstanding()
            )
        };
        notifier
            .notify_quietly(
                &loan.member_id,
                Notice::new(
                    NotificationKind::Success,
                    NotificationCategory::Payment,
                    "Payment confirmed",
                    message,
                )
                .about("payment", payment_id),
            )
            .await;
        Ok(payment)
    }

    pub async fn reject_payment(&self, admin_id: &str, payment_id: &str, reason: &str) -> BusinessResult<LoanPayment> {
        if reason.trim().is_empty() {
            return Err(BusinessError::Validation("a rejection reason is required".into()).into());
        }

        let mut tx = self.ctx.pool().begin().await?;
        let admin = require_admin(&mut *tx, admin_id, "reject payment").await?;
        let mut payment = PaymentRepo::get_by_id(&mut *tx, payment_id)
            .await
            .map_err(BusinessError::from)?;
        payment
            .reject(&admin.id, reason, Utc::now())
            .map_err(BusinessError::from)?;
        PaymentRepo::record_decision(&mut *tx, &payment)
            .await
            .map_err(BusinessError::from)?;
        tx.commit().await?;

        info!(payment_id, "payment rejected");
        self.ctx.emit(
            self.ctx
                .event(EventType::PaymentRejected, &admin, payment_id)
                .for_member(&payment.member_id)
                .with_description(reason),
        )?;
        NotificationService::new(self.ctx)
            .notify_quietly(
                &payment.member_id,
                Notice::new(
                    NotificationKind::Error,
                    NotificationCategory::Payment,
                    "Payment rejected",
                    format!("Payment {} ({}) was rejected: {}", payment.reference, payment.amount, reason),
                )
                .about("payment", payment_id),
            )
            .await;
        Ok(payment)
    }

    // === Penalties ===

    /// Assess late penalties across all active loans as of a date
    pub async fn accrue_penalties(&self, admin_id: &str, as_of: NaiveDate) -> BusinessResult<Vec<AccruedPenalties>> {
        let now = Utc::now();
        let mut tx = self.ctx.pool().begin().await?;
        let admin = require_admin(&mut *tx, admin_id, "accrue penalties").await?;
        let settings = current_settings(&mut *tx).await?;
        let loans = LoanRepo::list_by_statuses(&mut *tx, &[LoanStatus::Disbursed, LoanStatus::Repaying]).await?;

        let mut results = Vec::new();
        for mut loan in loans {
            let accruals = loan
                .schedule
                .accrue_penalties(as_of, settings.late_penalty_rate, settings.penalty_grace_days);
            if accruals.is_empty() {
                continue;
            }
            let prior = loan.status;
            loan.updated_at = now;
            LoanRepo::update(&mut *tx, &loan, prior)
                .await
                .map_err(BusinessError::from)?;
            results.push((
                AccruedPenalties {
                    loan_id: loan.id.clone(),
                    member_id: loan.member_id.clone(),
                    accruals,
                },
                loan,
            ));
        }
        tx.commit().await?;

        info!(%as_of, loans = results.len(), "penalty sweep finished");
        let notifier = NotificationService::new(self.ctx);
        for (accrued, loan) in &results {
            self.ctx.emit(
                self.ctx
                    .event(EventType::PenaltyAccrued, &admin, &accrued.loan_id)
                    .for_member(&accrued.member_id)
                    .with_amount(accrued.total(), &settings.currency),
            )?;
            notifier
                .notify_quietly(&accrued.member_id, penalty_notice(loan, accrued.total(), &settings))
                .await;
        }
        Ok(results.into_iter().map(|(accrued, _)| accrued).collect())
    }

    /// Waive the unpaid penalty on one installment; returns the amount waived
    pub async fn waive_penalty(&self, admin_id: &str, loan_id: &str, installment: u32) -> BusinessResult<Decimal> {
        let now = Utc::now();
        let mut tx = self.ctx.pool().begin().await?;
        let admin = require_admin(&mut *tx, admin_id, "waive penalty").await?;
        let settings = current_settings(&mut *tx).await?;
        let mut loan = LoanRepo::get_by_id(&mut *tx, loan_id)
            .await
            .map_err(BusinessError::from)?;
        let prior = loan.status;
        if !prior.is_active() {
            return Err(BusinessError::invalid_transition("Loan", prior.as_str(), "waive penalty on").into());
        }

        let waived = loan
            .schedule
            .waive_penalty(installment)
            .map_err(BusinessError::from)?;
        loan.refresh_status(now);
        LoanRepo::update(&mut *tx, &loan, prior)
            .await
            .map_err(BusinessError::from)?;
        tx.commit().await?;

        info!(loan_id, installment, %waived, "penalty waived");
        self.ctx.emit(
            self.ctx
                .event(EventType::PenaltyWaived, &admin, loan_id)
                .for_member(&loan.member_id)
                .with_amount(waived, &settings.currency)
                .with_description(&format!("installment {}", installment)),
        )?;
        Ok(waived)
    }

    // === Collateral ===

    /// Pledge an asset against a loan that has not been disbursed yet
    pub async fn add_collateral(
        &self,
        actor_id: &str,
        loan_id: &str,
        collateral_type: CollateralType,
        description: &str,
        estimated_value: Decimal,
    ) -> BusinessResult<LoanCollateral> {
        let mut tx = self.ctx.pool().begin().await?;
        let actor = load_member(&mut *tx, actor_id).await?;
        let loan = LoanRepo::get_by_id(&mut *tx, loan_id)
            .await
            .map_err(BusinessError::from)?;
        if !actor.is_admin() && loan.member_id != actor.id {
            return Err(BusinessError::permission_denied(actor_id, "pledge collateral for another member").into());
        }
        if !matches!(loan.status, LoanStatus::Applied | LoanStatus::Approved) {
            return Err(BusinessError::invalid_transition("Loan", loan.status.as_str(), "add collateral").into());
        }

        let id = next_id(&mut *tx, "loan_collateral", "COL", 4).await?;
        let collateral = LoanCollateral::new(&id, loan_id, collateral_type, description, estimated_value)
            .map_err(BusinessError::from)?;
        CollateralRepo::insert(&mut *tx, &collateral).await?;
        let settings = current_settings(&mut *tx).await?;
        tx.commit().await?;

        info!(collateral_id = %id, loan_id, kind = %collateral_type, value = %estimated_value, "collateral added");
        self.ctx.emit(
            self.ctx
                .event(EventType::CollateralAdded, &actor, &id)
                .for_member(&loan.member_id)
                .with_amount(estimated_value, &settings.currency)
                .with_reference(loan_id),
        )?;
        Ok(collateral)
    }

    pub async fn verify_collateral(
        &self,
        admin_id: &str,
        collateral_id: &str,
        notes: Option<&str>,
    ) -> BusinessResult<LoanCollateral> {
        let mut tx = self.ctx.pool().begin().await?;
        let admin = require_admin(&mut *tx, admin_id, "verify collateral").await?;
        let mut collateral = CollateralRepo::get_by_id(&mut *tx, collateral_id)
            .await
            .map_err(BusinessError::from)?;
        collateral
            .verify(&admin.id, notes, Utc::now())
            .map_err(BusinessError::from)?;
        CollateralRepo::record_verification(&mut *tx, &collateral)
            .await
            .map_err(BusinessError::from)?;
        let loan = LoanRepo::get_by_id(&mut *tx, &collateral.loan_id).await?;
        tx.commit().await?;

        info!(collateral_id, loan_id = %loan.id, "collateral verified");
        self.ctx.emit(
            self.ctx
                .event(EventType::CollateralVerified, &admin, collateral_id)
                .for_member(&loan.member_id)
                .with_reference(&loan.id),
        )?;
        NotificationService::new(self.ctx)
            .notify_quietly(
                &loan.member_id,
                Notice::new(
                    NotificationKind::Info,
                    NotificationCategory::Loan,
                    "Collateral verified",
                    format!("Your {} pledged for loan {} was verified", collateral.collateral_type, loan.id),
                )
                .about("loan", &loan.id),
            )
            .await;
        Ok(collateral)
    }

    pub async fn collateral(&self, loan_id: &str) -> BusinessResult<Vec<LoanCollateral>> {
        Ok(CollateralRepo::list_for_loan(self.ctx.pool(), loan_id).await?)
    }

    // === Comments ===

    /// Add a note to a loan. The borrower may only add public notes without
    /// a follow-up date.
    pub async fn add_comment(
        &self,
        author_id: &str,
        loan_id: &str,
        kind: CommentKind,
        body: &str,
        private: bool,
        follow_up: Option<NaiveDate>,
    ) -> BusinessResult<LoanComment> {
        let mut tx = self.ctx.pool().begin().await?;
        let author = load_member(&mut *tx, author_id).await?;
        let loan = LoanRepo::get_by_id(&mut *tx, loan_id)
            .await
            .map_err(BusinessError::from)?;
        if !author.is_admin() {
            if loan.member_id != author.id {
                return Err(BusinessError::permission_denied(author_id, "comment on another member's loan").into());
            }
            if private || follow_up.is_some() {
                return Err(BusinessError::permission_denied(author_id, "add officer notes").into());
            }
        }

        let id = next_id(&mut *tx, "loan_comments", "CMT", 6).await?;
        let mut comment = LoanComment::new(&id, loan_id, kind, body, &author.id).map_err(BusinessError::from)?;
        if !private {
            comment = comment.public();
        }
        if let Some(date) = follow_up {
            comment = comment.with_follow_up(date);
        }
        CommentRepo::insert(&mut *tx, &comment).await?;
        tx.commit().await?;

        debug!(comment_id = %id, loan_id, kind = %kind, private, "loan comment added");
        self.ctx.emit(
            self.ctx
                .event(EventType::LoanCommentAdded, &author, &id)
                .for_member(&loan.member_id)
                .with_reference(loan_id)
                .with_description(kind.as_str()),
        )?;
        if author.is_admin() && !private {
            NotificationService::new(self.ctx)
                .notify_quietly(
                    &loan.member_id,
                    Notice::new(
                        NotificationKind::Info,
                        NotificationCategory::Loan,
                        "Note on your loan",
                        comment.body.clone(),
                    )
                    .about("loan", loan_id),
                )
                .await;
        }
        Ok(comment)
    }

    /// Comments visible to `viewer_id`: all for admins, public ones for the borrower
    pub async fn comments(&self, viewer_id: &str, loan_id: &str) -> BusinessResult<Vec<LoanComment>> {
        let pool = self.ctx.pool();
        let viewer = load_member(pool, viewer_id).await?;
        let loan = LoanRepo::get_by_id(pool, loan_id).await.map_err(BusinessError::from)?;
        if !viewer.is_admin() && loan.member_id != viewer.id {
            return Err(BusinessError::permission_denied(viewer_id, "read another member's loan notes").into());
        }
        let comments = CommentRepo::list_for_loan(pool, loan_id).await?;
        Ok(comments
            .into_iter()
            .filter(|c| viewer.is_admin() || !c.is_private)
            .collect())
    }

    pub async fn resolve_comment(&self, admin_id: &str, comment_id: &str) -> BusinessResult<LoanComment> {
        let mut tx = self.ctx.pool().begin().await?;
        let admin = require_admin(&mut *tx, admin_id, "resolve loan comment").await?;
        let mut comment = CommentRepo::get_by_id(&mut *tx, comment_id)
            .await
            .map_err(BusinessError::from)?;
        comment.resolve().map_err(BusinessError::from)?;
        CommentRepo::mark_resolved(&mut *tx, comment_id)
            .await
            .map_err(BusinessError::from)?;
        tx.commit().await?;

        self.ctx.emit(
            self.ctx
                .event(EventType::LoanCommentResolved, &admin, comment_id)
                .with_reference(&comment.loan_id),
        )?;
        Ok(comment)
    }

    /// Open follow-ups due on or before `as_of`
    pub async fn follow_ups(&self, as_of: NaiveDate) -> BusinessResult<Vec<LoanComment>> {
        Ok(CommentRepo::list_due(self.ctx.pool(), as_of).await?)
    }

    // === Queries ===

    pub async fn get(&self, loan_id: &str) -> BusinessResult<Loan> {
        Ok(LoanRepo::get_by_id(self.ctx.pool(), loan_id)
            .await
            .map_err(BusinessError::from)?)
    }

    pub async fn schedule(&self, loan_id: &str) -> BusinessResult<RepaymentSchedule> {
        Ok(self.get(loan_id).await?.schedule)
    }

    pub async fn outstanding(&self, loan_id: &str) -> BusinessResult<Decimal> {
        Ok(self.get(loan_id).await?.outstanding())
    }

    /// Active loans with an installment past due as of `as_of`, most overdue first
    pub async fn overdue_loans(&self, as_of: NaiveDate) -> BusinessResult<Vec<OverdueLoan>> {
        let loans =
            LoanRepo::list_by_statuses(self.ctx.pool(), &[LoanStatus::Disbursed, LoanStatus::Repaying]).await?;
        let mut overdue: Vec<OverdueLoan> = loans
            .into_iter()
            .filter_map(|loan| {
                let days = loan.schedule.overdue_days(as_of);
                (days > 0).then(|| OverdueLoan {
                    overdue_days: days,
                    overdue_installments: loan.schedule.overdue_count(as_of),
                    outstanding: loan.outstanding(),
                    loan,
                })
            })
            .collect();
        overdue.sort_by(|a, b| b.overdue_days.cmp(&a.overdue_days).then_with(|| a.loan.id.cmp(&b.loan.id)));
        debug!(%as_of, count = overdue.len(), "overdue loans");
        Ok(overdue)
    }

    pub async fn list(&self, status: Option<LoanStatus>) -> BusinessResult<Vec<Loan>> {
        Ok(match status {
            Some(status) => LoanRepo::list_by_statuses(self.ctx.pool(), &[status]).await?,
            None => LoanRepo::list_all(self.ctx.pool()).await?,
        })
    }

    pub async fn list_for_member(&self, member_id: &str) -> BusinessResult<Vec<Loan>> {
        Ok(LoanRepo::list_by_member(self.ctx.pool(), member_id).await?)
    }

    pub async fn guarantors(&self, loan_id: &str) -> BusinessResult<Vec<Guarantor>> {
        Ok(GuarantorRepo::list_for_loan(self.ctx.pool(), loan_id).await?)
    }

    /// Guarantee requests still awaiting this member's answer
    pub async fn pending_guarantees(&self, member_id: &str) -> BusinessResult<Vec<Guarantor>> {
        Ok(GuarantorRepo::list_for_guarantor(self.ctx.pool(), member_id)
            .await?
            .into_iter()
            .filter(|g| g.status == GuarantorStatus::Pending)
            .collect())
    }

    pub async fn payments(&self, loan_id: &str) -> BusinessResult<Vec<LoanPayment>> {
        Ok(PaymentRepo::list_for_loan(self.ctx.pool(), loan_id).await?)
    }

    pub async fn pending_payments(&self) -> BusinessResult<Vec<LoanPayment>> {
        Ok(PaymentRepo::list_by_status(self.ctx.pool(), PaymentStatus::Pending).await?)
    }
}

fn penalty_notice(loan: &Loan, amount: Decimal, settings: &PolicySettings) -> Notice {
    Notice::new(
        NotificationKind::Warning,
        NotificationCategory::Loan,
        "Late payment penalty",
        format!(
            "A late penalty of {} {} was added to loan {}",
            settings.currency,
            amount,
            loan.loan_number.as_deref().unwrap_or(loan.id.as_str())
        ),
    )
    .about("loan", &loan.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_kind, ErrorKind};
    use crate::investment::InvestmentService;
    use crate::ledger::LedgerService;
    use crate::policy::PolicyService;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use sacco_core::{InvestmentCategory, MemberProfile};
    use sacco_persistence::{init_memory_database, EventStore, MemberRepo};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn context() -> (ServiceContext, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_memory_database().await.unwrap();
        let since = Utc::now() - Duration::days(365);
        let admin = MemberProfile::new("Admin", "admin@sacco.test", "0700000000", "1");
        MemberRepo::insert(&pool, &Member::admin("MEM_0001", "SACCO-2025-0001", admin, since))
            .await
            .unwrap();
        for n in 2..=4 {
            let id = format!("MEM_{:04}", n);
            let profile = MemberProfile::new(&format!("Member {}", n), &format!("m{}@sacco.test", n), "0700000001", &id);
            MemberRepo::insert(&pool, &Member::approved(&id, &format!("SACCO-2025-{:04}", n), profile, since))
                .await
                .unwrap();
        }
        let events = Arc::new(EventStore::new(dir.path()).unwrap());
        let ctx = ServiceContext::from_parts(pool, events);

        // 1000 share capital gives MEM_0002 a 3000 ceiling
        let investments = InvestmentService::new(&ctx);
        let inv = investments
            .invest("MEM_0002", InvestmentCategory::ShareCapital, dec!(1000), None, None)
            .await
            .unwrap();
        investments.confirm("MEM_0001", &inv.id).await.unwrap();
        (ctx, dir)
    }

    fn request(amount: Decimal) -> LoanRequest {
        LoanRequest::new("MEM_0002", amount, 3, "school fees")
            .with_guarantor("MEM_0003", dec!(50))
            .with_guarantor("MEM_0004", dec!(50))
    }

    async fn disbursed_loan(ctx: &ServiceContext) -> Loan {
        let service = LoanService::new(ctx);
        let loan = service.apply_for_loan(request(dec!(1000))).await.unwrap();
        service.confirm_guarantee("MEM_0003", &loan.id).await.unwrap();
        service.approve("MEM_0001", &loan.id, None, None, Some("ok")).await.unwrap();
        service.disburse("MEM_0001", &loan.id, "MPESA-OUT-1", None).await.unwrap()
    }

    #[test]
    fn test_calculate_terms() {
        let terms = LoanService::calculate_terms(dec!(1000), dec!(12), 3).unwrap();
        assert_eq!(terms.monthly_payment, dec!(340.02));
        let flat = LoanService::calculate_terms(dec!(1200), dec!(0), 12).unwrap();
        assert_eq!(flat.monthly_payment, dec!(100));

        let err = LoanService::calculate_terms(dec!(1000), dec!(100), 2000).unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_eligibility_reasons() {
        let (ctx, _dir) = context().await;
        let service = LoanService::new(&ctx);

        let ok = service.check_eligibility("MEM_0002", dec!(3000), 12, None).await.unwrap();
        assert!(ok.eligible);
        assert_eq!(ok.maximum_loan, dec!(3000));

        let too_much = service.check_eligibility("MEM_0002", dec!(3001), 13, None).await.unwrap();
        assert!(!too_much.eligible);
        assert_eq!(too_much.reasons.len(), 2);

        // No investments at all
        let none = service.check_eligibility("MEM_0003", dec!(500), 6, None).await.unwrap();
        assert!(!none.eligible);

        let err = service.apply_for_loan(request(dec!(5000))).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Policy);
    }

    #[tokio::test]
    async fn test_guarantor_rules_at_application() {
        let (ctx, _dir) = context().await;
        let service = LoanService::new(&ctx);

        let own = LoanRequest::new("MEM_0002", dec!(500), 3, "stock").with_guarantor("MEM_0002", dec!(50));
        let err = service.apply_for_loan(own).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Validation);

        let over = LoanRequest::new("MEM_0002", dec!(500), 3, "stock")
            .with_guarantor("MEM_0003", dec!(60))
            .with_guarantor("MEM_0004", dec!(60));
        let err = service.apply_for_loan(over).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Validation);

        let none = LoanRequest::new("MEM_0002", dec!(500), 3, "stock");
        let err = service.apply_for_loan(none).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BusinessError>(),
            Some(BusinessError::GuarantorShortfall { .. })
        ));

        let loan = service.apply_for_loan(request(dec!(500))).await.unwrap();
        assert_eq!(loan.id, "LOAN_0001");
        assert_eq!(service.pending_guarantees("MEM_0003").await.unwrap().len(), 1);

        // One loan in progress at a time
        let err = service.apply_for_loan(request(dec!(500))).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Policy);
    }

    #[tokio::test]
    async fn test_approval_needs_confirmed_guarantees() {
        let (ctx, _dir) = context().await;
        let service = LoanService::new(&ctx);
        let loan = service.apply_for_loan(request(dec!(1000))).await.unwrap();

        let err = service.approve("MEM_0001", &loan.id, None, None, None).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Policy);

        service.decline_guarantee("MEM_0003", &loan.id).await.unwrap();
        service.confirm_guarantee("MEM_0004", &loan.id).await.unwrap();
        let err = service.confirm_guarantee("MEM_0004", &loan.id).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::State);

        let err = service.approve("MEM_0002", &loan.id, None, None, None).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Permission);

        let approved = service
            .approve("MEM_0001", &loan.id, Some(dec!(900)), Some(dec!(10)), None)
            .await
            .unwrap();
        assert_eq!(approved.status, LoanStatus::Approved);
        assert_eq!(approved.approved_amount, Some(dec!(900)));
        assert!(approved.disbursement_transaction_id.is_some());

        // Pending disbursement does not move the balance yet
        let ledger = LedgerService::new(&ctx);
        assert_eq!(ledger.balance("MEM_0002").await.unwrap(), dec!(1000));
    }

    #[tokio::test]
    async fn test_disburse_and_repay() {
        let (ctx, _dir) = context().await;
        let service = LoanService::new(&ctx);
        let ledger = LedgerService::new(&ctx);

        let loan = disbursed_loan(&ctx).await;
        assert_eq!(loan.status, LoanStatus::Disbursed);
        assert!(loan.loan_number.as_deref().unwrap().ends_with("-0001"));
        assert_eq!(loan.schedule.installments.len(), 3);
        assert_eq!(ledger.balance("MEM_0002").await.unwrap(), dec!(2000));

        let err = service
            .make_payment("MEM_0002", &loan.id, dec!(5000), "MPESA-2", None)
            .await
            .unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Policy);

        let err = service
            .make_payment("MEM_0003", &loan.id, dec!(100), "MPESA-2", None)
            .await
            .unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Permission);

        let payment = service
            .make_payment("MEM_0002", &loan.id, dec!(340.02), "MPESA-2", Some("mpesa"))
            .await
            .unwrap();
        let confirmed = service.confirm_payment("MEM_0001", &payment.id).await.unwrap();
        assert_eq!(confirmed.allocations.len(), 1);
        assert_eq!(confirmed.allocated_interest(), dec!(10));

        let err = service.confirm_payment("MEM_0001", &payment.id).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::State);
        assert_eq!(ledger.balance("MEM_0002").await.unwrap(), dec!(1659.98));

        let loan = service.get(&loan.id).await.unwrap();
        assert_eq!(loan.status, LoanStatus::Repaying);

        // Settle the rest
        let rest = loan.outstanding();
        let payment = service
            .make_payment("MEM_0002", &loan.id, rest, "MPESA-3", None)
            .await
            .unwrap();
        service.confirm_payment("MEM_0001", &payment.id).await.unwrap();
        let loan = service.get(&loan.id).await.unwrap();
        assert_eq!(loan.status, LoanStatus::Closed);
        assert_eq!(loan.outstanding(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_second_payment_rechecked_at_confirmation() {
        let (ctx, _dir) = context().await;
        let service = LoanService::new(&ctx);
        let ledger = LedgerService::new(&ctx);
        let loan = disbursed_loan(&ctx).await;
        let outstanding = loan.outstanding();

        // Each fits on its own, together they exceed the outstanding amount
        let first = service
            .make_payment("MEM_0002", &loan.id, outstanding - dec!(100), "MPESA-A", None)
            .await
            .unwrap();
        let second = service
            .make_payment("MEM_0002", &loan.id, dec!(200), "MPESA-B", None)
            .await
            .unwrap();
        service.confirm_payment("MEM_0001", &first.id).await.unwrap();

        let after_first = service.get(&loan.id).await.unwrap();
        let balance = ledger.balance("MEM_0002").await.unwrap();
        let entries = ledger.list_for_member("MEM_0002").await.unwrap().len();

        let err = service.confirm_payment("MEM_0001", &second.id).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Policy);

        let unchanged = service.get(&loan.id).await.unwrap();
        assert_eq!(unchanged.schedule, after_first.schedule);
        assert_eq!(unchanged.outstanding(), dec!(100));
        assert_eq!(ledger.balance("MEM_0002").await.unwrap(), balance);
        assert_eq!(ledger.list_for_member("MEM_0002").await.unwrap().len(), entries);
        let still_pending = service.pending_payments().await.unwrap();
        assert!(still_pending.iter().any(|p| p.id == second.id));
    }

    #[tokio::test]
    async fn test_repayment_debit_is_not_reversible() {
        let (ctx, _dir) = context().await;
        let service = LoanService::new(&ctx);
        let ledger = LedgerService::new(&ctx);
        let loan = disbursed_loan(&ctx).await;

        let payment = service
            .make_payment("MEM_0002", &loan.id, dec!(340.02), "MPESA-2", None)
            .await
            .unwrap();
        let confirmed = service.confirm_payment("MEM_0001", &payment.id).await.unwrap();
        let debit_id = confirmed.transaction_id.unwrap();
        let outstanding = service.outstanding(&loan.id).await.unwrap();
        let balance = ledger.balance("MEM_0002").await.unwrap();

        let err = ledger.reverse("MEM_0001", &debit_id, "wrong loan").await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::State);
        assert_eq!(ledger.balance("MEM_0002").await.unwrap(), balance);
        assert_eq!(service.outstanding(&loan.id).await.unwrap(), outstanding);

        // Same for the disbursement credit
        let disbursement = ledger
            .list_for_member("MEM_0002")
            .await
            .unwrap()
            .into_iter()
            .find(|t| t.tx_type == TransactionType::LoanDisbursement)
            .unwrap();
        assert!(ledger.reverse("MEM_0001", &disbursement.id, "dup").await.is_err());
    }

    #[tokio::test]
    async fn test_collateral_verified_once_before_disbursement() {
        let (ctx, _dir) = context().await;
        let service = LoanService::new(&ctx);
        let loan = service.apply_for_loan(request(dec!(1000))).await.unwrap();

        let car = service
            .add_collateral("MEM_0002", &loan.id, CollateralType::Vehicle, "KDA 123A", dec!(450000))
            .await
            .unwrap();
        assert_eq!(car.id, "COL_0001");
        let err = service
            .add_collateral("MEM_0003", &loan.id, CollateralType::Vehicle, "not mine", dec!(100))
            .await
            .unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Permission);

        let err = service.verify_collateral("MEM_0002", &car.id, None).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Permission);
        let verified = service
            .verify_collateral("MEM_0001", &car.id, Some("logbook seen"))
            .await
            .unwrap();
        assert!(verified.is_verified);
        let err = service.verify_collateral("MEM_0001", &car.id, None).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::State);

        service.confirm_guarantee("MEM_0003", &loan.id).await.unwrap();
        service.approve("MEM_0001", &loan.id, None, None, None).await.unwrap();
        service.disburse("MEM_0001", &loan.id, "MPESA-OUT-1", None).await.unwrap();
        let err = service
            .add_collateral("MEM_0002", &loan.id, CollateralType::Property, "Plot 7", dec!(900000))
            .await
            .unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::State);
        assert_eq!(service.collateral(&loan.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_private_notes_hidden_from_borrower() {
        let (ctx, _dir) = context().await;
        let service = LoanService::new(&ctx);
        let loan = disbursed_loan(&ctx).await;
        let due = Utc::now().date_naive() + Duration::days(7);

        let call = service
            .add_comment("MEM_0001", &loan.id, CommentKind::FollowUp, "Call about March", true, Some(due))
            .await
            .unwrap();
        service
            .add_comment("MEM_0001", &loan.id, CommentKind::PaymentReminder, "Installment due", false, None)
            .await
            .unwrap();
        service
            .add_comment("MEM_0002", &loan.id, CommentKind::General, "Paying on Friday", false, None)
            .await
            .unwrap();
        let err = service
            .add_comment("MEM_0002", &loan.id, CommentKind::General, "secret", true, None)
            .await
            .unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Permission);

        assert_eq!(service.comments("MEM_0001", &loan.id).await.unwrap().len(), 3);
        assert_eq!(service.comments("MEM_0002", &loan.id).await.unwrap().len(), 2);
        let err = service.comments("MEM_0004", &loan.id).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Permission);

        assert!(service.follow_ups(due - Duration::days(1)).await.unwrap().is_empty());
        assert_eq!(service.follow_ups(due).await.unwrap()[0].id, call.id);
        service.resolve_comment("MEM_0001", &call.id).await.unwrap();
        assert!(service.follow_ups(due).await.unwrap().is_empty());
        let err = service.resolve_comment("MEM_0001", &call.id).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::State);
    }

    #[tokio::test]
    async fn test_penalties_accrue_once_and_can_be_waived() {
        let (ctx, _dir) = context().await;
        let service = LoanService::new(&ctx);
        let loan = disbursed_loan(&ctx).await;
        let before = loan.outstanding();

        let as_of = Utc::now().date_naive() + Duration::days(40);
        let swept = service.accrue_penalties("MEM_0001", as_of).await.unwrap();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].accruals.len(), 1);
        // 5% of the 340.02 installment
        assert_eq!(swept[0].total(), dec!(17.00));

        assert!(service.accrue_penalties("MEM_0001", as_of).await.unwrap().is_empty());
        assert_eq!(service.outstanding(&loan.id).await.unwrap(), before + dec!(17.00));

        let overdue = service.overdue_loans(as_of).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].overdue_installments, 1);
        assert!(overdue[0].overdue_days > 0);

        let waived = service.waive_penalty("MEM_0001", &loan.id, 1).await.unwrap();
        assert_eq!(waived, dec!(17.00));
        assert_eq!(service.outstanding(&loan.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_cancel_and_reject() {
        let (ctx, _dir) = context().await;
        let service = LoanService::new(&ctx);
        let loan = service.apply_for_loan(request(dec!(800))).await.unwrap();

        let err = service.cancel("MEM_0003", &loan.id).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Permission);

        let cancelled = service.cancel("MEM_0002", &loan.id).await.unwrap();
        assert_eq!(cancelled.status, LoanStatus::Cancelled);

        let err = service.reject("MEM_0001", &loan.id, "late").await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::State);

        // Guarantor minimum relaxed: a loan without guarantors can go through
        let policy = PolicyService::new(&ctx);
        let mut settings = policy.settings().await.unwrap();
        settings.require_guarantors = false;
        policy.update_settings("MEM_0001", settings).await.unwrap();

        let second = service
            .apply_for_loan(LoanRequest::new("MEM_0002", dec!(300), 2, "rent"))
            .await
            .unwrap();
        let rejected = service.reject("MEM_0001", &second.id, "incomplete file").await.unwrap();
        assert_eq!(rejected.rejection_reason.as_deref(), Some("incomplete file"));
    }
}
