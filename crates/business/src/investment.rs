//! Investment ledger - share capital, monthly investments and special deposits
//!
//! Confirming an investment appends a confirmed deposit to the transaction
//! ledger in the same SQL transaction.

use crate::error::{BusinessError, BusinessResult};
use crate::ledger::post_confirmed;
use crate::notifications::{Notice, NotificationService};
use crate::policy::current_settings;
use crate::services::{load_member, require_active_member, require_admin, ServiceContext};
use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use sacco_core::{
    rank_members, EventType, Investment, InvestmentCategory, InvestmentStatus, InvestmentSummary,
    NotificationCategory, NotificationKind, PolicySettings, RankingBasis, RankingEntry, Transaction,
    TransactionType,
};
use sacco_persistence::{next_id, InvestmentRepo};
use tracing::{debug, info, warn};

/// Actor recorded when policy confirms a deposit without review
pub const AUTO_APPROVER: &str = "system";

/// Investment Service - member contributions
pub struct InvestmentService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> InvestmentService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Record a contribution. Pending unless deposits are auto-approved.
    pub async fn invest(
        &self,
        member_id: &str,
        category: InvestmentCategory,
        amount: Decimal,
        reference: Option<&str>,
        payment_method: Option<&str>,
    ) -> BusinessResult<Investment> {
        let mut tx = self.ctx.pool().begin().await?;
        let member = require_active_member(&mut *tx, member_id, "invest").await?;
        let settings = current_settings(&mut *tx).await?;
        let existing = InvestmentRepo::list_by_member(&mut *tx, member_id).await?;

        let id = next_id(&mut *tx, "investments", "INV", 6).await?;
        let mut investment = Investment::new(&id, member_id, category, amount).map_err(BusinessError::from)?;
        if let Some(reference) = reference {
            investment = investment.with_reference(reference);
        }
        if let Some(method) = payment_method {
            investment = investment.with_payment_method(method);
        }

        if category == InvestmentCategory::MonthlyInvestment {
            check_monthly(&settings, &existing, &investment)?;
        }
        if category == InvestmentCategory::ShareCapital {
            check_share_capital(&settings, &existing, &investment)?;
        }

        let auto = settings.auto_approve_deposits;
        if auto {
            let now = Utc::now();
            investment.confirm(AUTO_APPROVER, now).map_err(BusinessError::from)?;
            InvestmentRepo::insert(&mut *tx, &investment).await?;
            post_confirmed(&mut *tx, deposit_for(&investment, &settings)?, AUTO_APPROVER, now).await?;
        } else {
            InvestmentRepo::insert(&mut *tx, &investment).await?;
        }
        tx.commit().await?;

        info!(investment_id = %id, member_id, category = %category, %amount, auto, "investment recorded");
        self.ctx.emit(
            self.ctx
                .event(EventType::InvestmentCreated, &member, &id)
                .for_member(member_id)
                .with_amount(amount, &settings.currency)
                .with_description(category.as_str()),
        )?;
        if auto {
            self.announce_confirmed(&investment, &settings).await;
        }
        Ok(investment)
    }

    /// pending → confirmed, posting the deposit to the ledger
    pub async fn confirm(&self, admin_id: &str, investment_id: &str) -> BusinessResult<Investment> {
        let mut tx = self.ctx.pool().begin().await?;
        let admin = require_admin(&mut *tx, admin_id, "confirm investment").await?;
        let settings = current_settings(&mut *tx).await?;
        let mut investment = InvestmentRepo::get_by_id(&mut *tx, investment_id)
            .await
            .map_err(BusinessError::from)?;

        let now = Utc::now();
        investment.confirm(&admin.id, now).map_err(BusinessError::from)?;
        if investment.category == InvestmentCategory::ShareCapital {
            let existing = InvestmentRepo::list_by_member(&mut *tx, &investment.member_id).await?;
            check_share_capital(&settings, &existing, &investment)?;
        }

        InvestmentRepo::record_decision(&mut *tx, &investment)
            .await
            .map_err(BusinessError::from)?;
        let deposit = post_confirmed(&mut *tx, deposit_for(&investment, &settings)?, &admin.id, now).await?;
        tx.commit().await?;

        info!(investment_id, transaction_id = %deposit.id, "investment confirmed");
        self.ctx.emit(
            self.ctx
                .event(EventType::InvestmentConfirmed, &admin, investment_id)
                .for_member(&investment.member_id)
                .with_amount(investment.amount, &settings.currency)
                .with_reference(&deposit.id),
        )?;
        self.announce_confirmed(&investment, &settings).await;
        Ok(investment)
    }

    pub async fn reject(&self, admin_id: &str, investment_id: &str, reason: &str) -> BusinessResult<Investment> {
        if reason.trim().is_empty() {
            return Err(BusinessError::Validation("a rejection reason is required".into()).into());
        }

        let mut tx = self.ctx.pool().begin().await?;
        let admin = require_admin(&mut *tx, admin_id, "reject investment").await?;
        let mut investment = InvestmentRepo::get_by_id(&mut *tx, investment_id)
            .await
            .map_err(BusinessError::from)?;
        investment
            .reject(&admin.id, reason, Utc::now())
            .map_err(BusinessError::from)?;
        InvestmentRepo::record_decision(&mut *tx, &investment)
            .await
            .map_err(BusinessError::from)?;
        tx.commit().await?;

        info!(investment_id, "investment rejected");
        self.ctx.emit(
            self.ctx
                .event(EventType::InvestmentRejected, &admin, investment_id)
                .for_member(&investment.member_id)
                .with_description(reason),
        )?;
        NotificationService::new(self.ctx)
            .notify_quietly(
                &investment.member_id,
                Notice::new(
                    NotificationKind::Error,
                    NotificationCategory::Investment,
                    "Investment rejected",
                    format!("Your {} of {} was rejected: {}", investment.category, investment.amount, reason),
                )
                .about("investment", investment_id),
            )
            .await;
        Ok(investment)
    }

    async fn announce_confirmed(&self, investment: &Investment, settings: &PolicySettings) {
        NotificationService::new(self.ctx)
            .notify_quietly(
                &investment.member_id,
                Notice::new(
                    NotificationKind::Success,
                    NotificationCategory::Investment,
                    "Investment confirmed",
                    format!(
                        "Your {} of {} {} has been confirmed",
                        investment.category, settings.currency, investment.amount
                    ),
                )
                .about("investment", &investment.id),
            )
            .await;
    }

    // === Queries ===

    pub async fn summary(&self, member_id: &str) -> BusinessResult<InvestmentSummary> {
        let pool = self.ctx.pool();
        load_member(pool, member_id).await?;
        let settings = current_settings(pool).await?;
        let investments = InvestmentRepo::list_by_member(pool, member_id).await?;
        Ok(InvestmentSummary::from_investments(
            member_id,
            &investments,
            settings.loan_multiplier,
        ))
    }

    /// Members ranked by confirmed investments, ties broken by member id
    pub async fn rankings(&self, basis: RankingBasis) -> BusinessResult<Vec<RankingEntry>> {
        let confirmed = InvestmentRepo::list_by_status(self.ctx.pool(), InvestmentStatus::Confirmed).await?;
        debug!(basis = basis.as_str(), count = confirmed.len(), "ranking members");
        Ok(rank_members(&confirmed, basis))
    }

    pub async fn get(&self, investment_id: &str) -> BusinessResult<Investment> {
        Ok(InvestmentRepo::get_by_id(self.ctx.pool(), investment_id)
            .await
            .map_err(BusinessError::from)?)
    }

    pub async fn list_for_member(&self, member_id: &str) -> BusinessResult<Vec<Investment>> {
        Ok(InvestmentRepo::list_by_member(self.ctx.pool(), member_id).await?)
    }

    pub async fn pending(&self) -> BusinessResult<Vec<Investment>> {
        Ok(InvestmentRepo::list_by_status(self.ctx.pool(), InvestmentStatus::Pending).await?)
    }
}

// === Policy checks ===

fn check_monthly(settings: &PolicySettings, existing: &[Investment], investment: &Investment) -> BusinessResult<()> {
    if investment.amount < settings.minimum_monthly_investment {
        return Err(BusinessError::InvalidAmount(format!(
            "monthly investment must be at least {}, got {}",
            settings.minimum_monthly_investment, investment.amount
        ))
        .into());
    }
    if !settings.allow_multiple_monthly_investments {
        let month = (investment.created_at.year(), investment.created_at.month());
        let taken = existing.iter().any(|i| {
            i.category == InvestmentCategory::MonthlyInvestment
                && i.status != InvestmentStatus::Rejected
                && (i.created_at.year(), i.created_at.month()) == month
        });
        if taken {
            return Err(BusinessError::Validation(format!(
                "a monthly investment for {}-{:02} already exists",
                month.0, month.1
            ))
            .into());
        }
    }
    Ok(())
}

/// Confirmed share capital plus this investment may not exceed the limit
fn check_share_capital(settings: &PolicySettings, existing: &[Investment], investment: &Investment) -> BusinessResult<()> {
    let current: Decimal = existing
        .iter()
        .filter(|i| i.category == InvestmentCategory::ShareCapital && i.is_confirmed() && i.id != investment.id)
        .map(|i| i.amount)
        .sum();
    if current + investment.amount > settings.share_capital_amount {
        warn!(member_id = %investment.member_id, %current, attempted = %investment.amount, "share capital limit");
        return Err(BusinessError::ShareCapitalLimitExceeded {
            limit: settings.share_capital_amount,
            current,
            attempted: investment.amount,
        }
        .into());
    }
    Ok(())
}

fn deposit_for(investment: &Investment, settings: &PolicySettings) -> BusinessResult<Transaction> {
    let label = match investment.category {
        InvestmentCategory::ShareCapital => "Share capital contribution",
        InvestmentCategory::MonthlyInvestment => "Monthly investment",
        InvestmentCategory::SpecialDeposit => "Special deposit",
    };
    let mut deposit = Transaction::new(
        &investment.member_id,
        TransactionType::Deposit,
        investment.amount,
        &settings.currency,
        label,
    )
    .map_err(BusinessError::from)?
    .with_investment(&investment.id);
    if let Some(reference) = &investment.reference {
        deposit = deposit.with_reference(reference);
    }
    Ok(deposit)
}
