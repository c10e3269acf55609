//! Investment targets - personal and SACCO-wide savings goals
//!
//! Progress is always recomputed from confirmed investments; the stored
//! `current_amount` is the value at the last refresh.

use crate::error::{BusinessError, BusinessResult};
use crate::notifications::{Notice, NotificationService};
use crate::policy::current_settings;
use crate::services::{load_member, require_active_member, ServiceContext};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sacco_core::{
    EventType, Investment, InvestmentStatus, InvestmentTarget, NotificationCategory,
    NotificationKind, TargetPeriod, TargetScope,
};
use sacco_persistence::{next_id, InvestmentRepo, TargetRepo};
use sqlx::SqliteExecutor;
use tracing::{debug, info};

/// Input for a new target. Setting a member makes it personal.
#[derive(Debug, Clone)]
pub struct TargetInput {
    pub name: String,
    pub description: Option<String>,
    pub target_amount: Decimal,
    pub period: TargetPeriod,
    pub member_id: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl TargetInput {
    pub fn new(name: &str, target_amount: Decimal, period: TargetPeriod, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            target_amount,
            period,
            member_id: None,
            start_date,
            end_date,
        }
    }

    pub fn for_member(mut self, member_id: &str) -> Self {
        self.member_id = Some(member_id.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    fn scope(&self) -> TargetScope {
        if self.member_id.is_some() {
            TargetScope::Personal
        } else {
            TargetScope::SaccoWide
        }
    }
}

/// Investments that can count towards `target`
async fn investments_for<'e, E: SqliteExecutor<'e>>(exec: E, target: &InvestmentTarget) -> BusinessResult<Vec<Investment>> {
    Ok(match &target.member_id {
        Some(member_id) => InvestmentRepo::list_by_member(exec, member_id).await?,
        None => InvestmentRepo::list_by_status(exec, InvestmentStatus::Confirmed).await?,
    })
}

/// Target Service - goal setting and progress tracking
pub struct TargetService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> TargetService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Admins may create any target; members only personal ones for themselves
    pub async fn create(&self, actor_id: &str, input: TargetInput) -> BusinessResult<InvestmentTarget> {
        let mut tx = self.ctx.pool().begin().await?;
        let actor = load_member(&mut *tx, actor_id).await?;
        if !actor.is_admin() {
            require_active_member(&mut *tx, actor_id, "create target").await?;
            if input.member_id.as_deref() != Some(actor_id) {
                return Err(BusinessError::permission_denied(actor_id, "create a target for others").into());
            }
        }
        if let Some(member_id) = &input.member_id {
            load_member(&mut *tx, member_id).await?;
        }

        let id = next_id(&mut *tx, "investment_targets", "TGT", 4).await?;
        let mut target = InvestmentTarget::new(
            &id,
            input.scope(),
            &input.name,
            input.target_amount,
            input.period,
            input.member_id.as_deref(),
            input.start_date,
            input.end_date,
            &actor.id,
        )
        .map_err(BusinessError::from)?;
        if let Some(description) = &input.description {
            target = target.with_description(description);
        }
        let investments = investments_for(&mut *tx, &target).await?;
        target.refresh(&investments, Utc::now());
        TargetRepo::insert(&mut *tx, &target).await?;
        let settings = current_settings(&mut *tx).await?;
        tx.commit().await?;

        info!(target_id = %id, scope = %target.scope, amount = %target.target_amount, "target created");
        let mut event = self
            .ctx
            .event(EventType::TargetCreated, &actor, &id)
            .with_amount(target.target_amount, &settings.currency)
            .with_description(&target.name);
        if let Some(member_id) = &target.member_id {
            event = event.for_member(member_id);
        }
        self.ctx.emit(event)?;
        Ok(target)
    }

    /// Recompute and store progress, notifying once when the goal is reached
    pub async fn refresh(&self, target_id: &str) -> BusinessResult<InvestmentTarget> {
        let mut tx = self.ctx.pool().begin().await?;
        let mut target = TargetRepo::get_by_id(&mut *tx, target_id)
            .await
            .map_err(BusinessError::from)?;
        let investments = investments_for(&mut *tx, &target).await?;
        let achieved = target.refresh(&investments, Utc::now());
        TargetRepo::update(&mut *tx, &target).await?;
        tx.commit().await?;

        debug!(target_id, current = %target.current_amount, achieved, "target refreshed");
        if achieved {
            let recipient = target.member_id.as_deref().unwrap_or(target.created_by.as_str());
            NotificationService::new(self.ctx)
                .notify_quietly(
                    recipient,
                    Notice::new(
                        NotificationKind::Success,
                        NotificationCategory::Investment,
                        "Target achieved",
                        format!("Target '{}' reached {}", target.name, target.target_amount),
                    )
                    .about("target", &target.id),
                )
                .await;
        }
        Ok(target)
    }

    /// Refresh every active target; returns those newly achieved
    pub async fn refresh_all(&self) -> BusinessResult<Vec<InvestmentTarget>> {
        let active = TargetRepo::list(self.ctx.pool(), true).await?;
        let mut achieved = Vec::new();
        for target in active {
            let was_achieved = target.is_achieved();
            let refreshed = self.refresh(&target.id).await?;
            if !was_achieved && refreshed.is_achieved() {
                achieved.push(refreshed);
            }
        }
        Ok(achieved)
    }

    /// Admins and the owner of a personal target may retire it
    pub async fn deactivate(&self, actor_id: &str, target_id: &str) -> BusinessResult<InvestmentTarget> {
        let mut tx = self.ctx.pool().begin().await?;
        let actor = load_member(&mut *tx, actor_id).await?;
        let mut target = TargetRepo::get_by_id(&mut *tx, target_id)
            .await
            .map_err(BusinessError::from)?;
        if !actor.is_admin() && target.member_id.as_deref() != Some(actor_id) {
            return Err(BusinessError::permission_denied(actor_id, "deactivate target").into());
        }
        target.deactivate(Utc::now()).map_err(BusinessError::from)?;
        TargetRepo::update(&mut *tx, &target).await?;
        tx.commit().await?;

        info!(target_id, "target deactivated");
        self.ctx
            .emit(self.ctx.event(EventType::TargetDeactivated, &actor, target_id))?;
        Ok(target)
    }

    // === Queries ===

    /// Active targets with live progress: all for an admin, otherwise the
    /// viewer's own plus SACCO-wide ones
    pub async fn list(&self, viewer_id: &str) -> BusinessResult<Vec<InvestmentTarget>> {
        let pool = self.ctx.pool();
        let viewer = load_member(pool, viewer_id).await?;
        let mut targets = if viewer.is_admin() {
            TargetRepo::list(pool, true).await?
        } else {
            TargetRepo::list_visible_to(pool, viewer_id).await?
        };
        let now = Utc::now();
        for target in &mut targets {
            let investments = investments_for(pool, target).await?;
            target.refresh(&investments, now);
        }
        Ok(targets)
    }

    pub async fn get(&self, target_id: &str) -> BusinessResult<InvestmentTarget> {
        Ok(TargetRepo::get_by_id(self.ctx.pool(), target_id)
            .await
            .map_err(BusinessError::from)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_kind, ErrorKind};
    use crate::investment::InvestmentService;
    use chrono::{Datelike, Duration};
    use rust_decimal_macros::dec;
    use sacco_core::{InvestmentCategory, Member, MemberProfile};
    use sacco_persistence::{init_memory_database, EventStore, MemberRepo, NotificationRepo};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn context() -> (ServiceContext, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_memory_database().await.unwrap();
        let since = Utc::now() - Duration::days(200);
        let admin = MemberProfile::new("Admin", "admin@sacco.test", "0700000000", "1");
        MemberRepo::insert(&pool, &Member::admin("MEM_0001", "SACCO-2026-0001", admin, since))
            .await
            .unwrap();
        for (id, email) in [("MEM_0002", "a@sacco.test"), ("MEM_0003", "b@sacco.test")] {
            let profile = MemberProfile::new("Member", email, "0700000001", id);
            MemberRepo::insert(&pool, &Member::approved(id, id, profile, since))
                .await
                .unwrap();
        }
        let events = Arc::new(EventStore::new(dir.path()).unwrap());
        (ServiceContext::from_parts(pool, events), dir)
    }

    fn this_year(name: &str, amount: Decimal) -> TargetInput {
        let year = Utc::now().year();
        TargetInput::new(
            name,
            amount,
            TargetPeriod::Annually,
            NaiveDate::from_ymd_opt(year, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(year, 12, 31).unwrap(),
        )
    }

    async fn invest(ctx: &ServiceContext, member_id: &str, amount: Decimal) {
        let service = InvestmentService::new(ctx);
        let inv = service
            .invest(member_id, InvestmentCategory::SpecialDeposit, amount, None, None)
            .await
            .unwrap();
        service.confirm("MEM_0001", &inv.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_member_sets_own_target_only() {
        let (ctx, _dir) = context().await;
        let service = TargetService::new(&ctx);

        let own = service
            .create("MEM_0002", this_year("Rainy day", dec!(1000)).for_member("MEM_0002"))
            .await
            .unwrap();
        assert_eq!(own.id, "TGT_0001");
        assert_eq!(own.scope, TargetScope::Personal);

        let err = service
            .create("MEM_0002", this_year("Theirs", dec!(1000)).for_member("MEM_0003"))
            .await
            .unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Permission);

        let err = service.create("MEM_0002", this_year("Everyone", dec!(1000))).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Permission);

        let shared = service.create("MEM_0001", this_year("Everyone", dec!(5000))).await.unwrap();
        assert_eq!(shared.scope, TargetScope::SaccoWide);

        // MEM_0003 sees only the SACCO-wide target
        assert_eq!(service.list("MEM_0003").await.unwrap().len(), 1);
        assert_eq!(service.list("MEM_0002").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_progress_and_achievement_notice() {
        let (ctx, _dir) = context().await;
        let service = TargetService::new(&ctx);
        let target = service
            .create("MEM_0002", this_year("Rainy day", dec!(1000)).for_member("MEM_0002"))
            .await
            .unwrap();

        invest(&ctx, "MEM_0002", dec!(600)).await;
        invest(&ctx, "MEM_0003", dec!(600)).await;
        let listed = service.list("MEM_0002").await.unwrap();
        assert_eq!(listed[0].current_amount, dec!(600));
        assert_eq!(listed[0].progress_percentage(), dec!(60));

        invest(&ctx, "MEM_0002", dec!(400)).await;
        let achieved = service.refresh_all().await.unwrap();
        assert_eq!(achieved.len(), 1);
        assert_eq!(achieved[0].id, target.id);
        assert!(service.refresh_all().await.unwrap().is_empty());

        let notices = NotificationRepo::list_for_recipient(ctx.pool(), "MEM_0002", false).await.unwrap();
        assert_eq!(notices.iter().filter(|n| n.title == "Target achieved").count(), 1);
    }

    #[tokio::test]
    async fn test_deactivate_by_owner_or_admin() {
        let (ctx, _dir) = context().await;
        let service = TargetService::new(&ctx);
        let shared = service.create("MEM_0001", this_year("Hall", dec!(9000))).await.unwrap();

        let err = service.deactivate("MEM_0002", &shared.id).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Permission);

        let retired = service.deactivate("MEM_0001", &shared.id).await.unwrap();
        assert!(!retired.is_active);
        let err = service.deactivate("MEM_0001", &shared.id).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::State);
        assert!(service.list("MEM_0001").await.unwrap().is_empty());
    }
}
