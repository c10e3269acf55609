//! Yearly dividends on share capital and monthly investments
//!
//! ```text
//! calculate(year, rates) ──▶ calculated ──pay(year)──▶ paid (+ dividend_payment credit)
//!        ▲      │
//!        └──────┘ recalculation replaces unpaid rows only
//! ```

use crate::error::{BusinessError, BusinessResult};
use crate::ledger::post_confirmed;
use crate::notifications::{Notice, NotificationService};
use crate::policy::current_settings;
use crate::services::{load_member, require_admin, ServiceContext};
use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use sacco_core::{
    Dividend, DividendRates, EventType, InvestmentStatus, NotificationCategory, NotificationKind,
    Transaction, TransactionType,
};
use sacco_persistence::{next_id, DividendRepo, InvestmentRepo};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Dividend Service - yearly calculation and payout
pub struct DividendService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> DividendService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Compute every member's dividend for `year` at the declared rates.
    ///
    /// Unpaid dividends are recomputed in place; paid ones are never touched.
    pub async fn calculate_for_year(
        &self,
        admin_id: &str,
        year: i32,
        rates: DividendRates,
    ) -> BusinessResult<Vec<Dividend>> {
        let now = Utc::now();
        if year > now.year() {
            return Err(BusinessError::Validation(format!("cannot declare dividends for future year {}", year)).into());
        }

        let mut tx = self.ctx.pool().begin().await?;
        let admin = require_admin(&mut *tx, admin_id, "calculate dividends").await?;
        let settings = current_settings(&mut *tx).await?;
        let confirmed = InvestmentRepo::list_by_status(&mut *tx, InvestmentStatus::Confirmed).await?;
        let members: BTreeSet<&str> = confirmed.iter().map(|i| i.member_id.as_str()).collect();

        let mut skipped_paid = 0usize;
        for member_id in members {
            let existing = DividendRepo::find(&mut *tx, year, member_id).await?;
            if existing.as_ref().is_some_and(Dividend::is_paid) {
                skipped_paid += 1;
                continue;
            }
            let id = match &existing {
                Some(d) => d.id.clone(),
                None => next_id(&mut *tx, "dividends", "DIV", 6).await?,
            };
            match Dividend::calculate(&id, year, member_id, &confirmed, rates, &admin.id, now) {
                Some(dividend) => DividendRepo::save_calculation(&mut *tx, &dividend).await?,
                None if existing.is_some() => DividendRepo::delete_calculated(&mut *tx, &id).await?,
                None => {}
            }
        }
        let dividends = DividendRepo::list_for_year(&mut *tx, year).await?;
        tx.commit().await?;

        let total: Decimal = dividends.iter().map(|d| d.total_dividend).sum();
        info!(year, members = dividends.len(), %total, skipped_paid, "dividends calculated");
        self.ctx.emit(
            self.ctx
                .event(EventType::DividendsCalculated, &admin, &year.to_string())
                .with_amount(total, &settings.currency)
                .with_description(&format!(
                    "share capital {}%, monthly investment {}%",
                    rates.share_capital, rates.monthly_investment
                )),
        )?;
        Ok(dividends)
    }

    /// Credit every unpaid dividend of `year` to its member's ledger
    pub async fn pay(&self, admin_id: &str, year: i32) -> BusinessResult<Vec<Dividend>> {
        let mut tx = self.ctx.pool().begin().await?;
        let admin = require_admin(&mut *tx, admin_id, "pay dividends").await?;
        let settings = current_settings(&mut *tx).await?;
        let unpaid: Vec<Dividend> = DividendRepo::list_for_year(&mut *tx, year)
            .await?
            .into_iter()
            .filter(|d| !d.is_paid())
            .collect();
        if unpaid.is_empty() {
            return Err(BusinessError::Validation(format!("no unpaid dividends for {}", year)).into());
        }

        let now = Utc::now();
        let mut paid = Vec::with_capacity(unpaid.len());
        for mut dividend in unpaid {
            let credit = Transaction::new(
                &dividend.member_id,
                TransactionType::DividendPayment,
                dividend.total_dividend,
                &settings.currency,
                &format!("Dividend for {}", year),
            )
            .map_err(BusinessError::from)?
            .with_reference(&dividend.id);
            let credit = post_confirmed(&mut *tx, credit, &admin.id, now).await?;
            dividend
                .mark_paid(&admin.id, &credit.id, now)
                .map_err(BusinessError::from)?;
            DividendRepo::record_payment(&mut *tx, &dividend)
                .await
                .map_err(BusinessError::from)?;
            paid.push(dividend);
        }
        tx.commit().await?;

        info!(year, count = paid.len(), "dividends paid");
        let notifications = NotificationService::new(self.ctx);
        for dividend in &paid {
            self.ctx.emit(
                self.ctx
                    .event(EventType::DividendPaid, &admin, &dividend.id)
                    .for_member(&dividend.member_id)
                    .with_amount(dividend.total_dividend, &settings.currency)
                    .with_reference(dividend.transaction_id.as_deref().unwrap_or_default()),
            )?;
            notifications
                .notify_quietly(
                    &dividend.member_id,
                    Notice::new(
                        NotificationKind::Success,
                        NotificationCategory::Investment,
                        "Dividend paid",
                        format!(
                            "Your {} dividend of {} {} has been credited",
                            year, settings.currency, dividend.total_dividend
                        ),
                    )
                    .about("dividend", &dividend.id),
                )
                .await;
        }
        Ok(paid)
    }

    // === Queries ===

    pub async fn for_year(&self, year: i32) -> BusinessResult<Vec<Dividend>> {
        Ok(DividendRepo::list_for_year(self.ctx.pool(), year).await?)
    }

    pub async fn for_member(&self, member_id: &str) -> BusinessResult<Vec<Dividend>> {
        load_member(self.ctx.pool(), member_id).await?;
        let dividends = DividendRepo::list_by_member(self.ctx.pool(), member_id).await?;
        debug!(member_id, count = dividends.len(), "member dividends");
        Ok(dividends)
    }
}
