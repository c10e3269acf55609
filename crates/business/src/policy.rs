//! Policy operations - cooperative settings and loan products
//!
//! Settings are a single row created with defaults on first read.

use crate::error::{BusinessError, BusinessResult};
use crate::services::{require_admin, ServiceContext};
use chrono::Utc;
use rust_decimal::Decimal;
use sacco_core::{EventType, LoanType, PolicySettings};
use sacco_persistence::{next_id, LoanTypeRepo, PersistenceError, SettingsRepo};
use sqlx::SqliteExecutor;
use tracing::{debug, info};

/// Stored settings, or the defaults when none have been saved yet
pub(crate) async fn current_settings<'e, E: SqliteExecutor<'e>>(exec: E) -> BusinessResult<PolicySettings> {
    Ok(SettingsRepo::get(exec).await?.unwrap_or_default())
}

/// Fields an admin supplies for a loan product
#[derive(Debug, Clone)]
pub struct LoanTypeInput {
    pub name: String,
    pub description: Option<String>,
    pub interest_rate: Decimal,
    pub maximum_amount: Decimal,
    pub maximum_period_months: u32,
    pub minimum_membership_months: u32,
    pub requires_guarantor: bool,
}

impl LoanTypeInput {
    pub fn new(name: &str, interest_rate: Decimal, maximum_amount: Decimal, maximum_period_months: u32) -> Self {
        Self {
            name: name.trim().to_string(),
            description: None,
            interest_rate,
            maximum_amount,
            maximum_period_months,
            minimum_membership_months: 3,
            requires_guarantor: true,
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

    fn apply_to(&self, loan_type: &mut LoanType) {
        loan_type.name = self.name.clone();
        loan_type.description = self.description.clone();
        loan_type.interest_rate = self.interest_rate;
        loan_type.maximum_amount = self.maximum_amount;
        loan_type.maximum_period_months = self.maximum_period_months;
        loan_type.minimum_membership_months = self.minimum_membership_months;
        loan_type.requires_guarantor = self.requires_guarantor;
    }
}

/// Policy Service - settings and loan products
pub struct PolicyService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> PolicyService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Current settings; the defaults are persisted on first read
    pub async fn settings(&self) -> BusinessResult<PolicySettings> {
        let pool = self.ctx.pool();
        match SettingsRepo::get(pool).await? {
            Some(settings) => Ok(settings),
            None => {
                let settings = PolicySettings::default();
                SettingsRepo::save(pool, &settings).await?;
                debug!("default settings stored");
                Ok(settings)
            }
        }
    }

    pub async fn update_settings(&self, admin_id: &str, mut settings: PolicySettings) -> BusinessResult<PolicySettings> {
        let admin = require_admin(self.ctx.pool(), admin_id, "update settings").await?;
        settings.validate().map_err(BusinessError::from)?;

        settings.updated_by = Some(admin.id.clone());
        settings.updated_at = Some(Utc::now());
        SettingsRepo::save(self.ctx.pool(), &settings).await?;

        info!(admin = %admin.id, "settings updated");
        self.ctx
            .emit(self.ctx.event(EventType::SettingsUpdated, &admin, "settings"))?;
        Ok(settings)
    }

    // === Loan types ===

    pub async fn create_loan_type(&self, admin_id: &str, input: LoanTypeInput) -> BusinessResult<LoanType> {
        let pool = self.ctx.pool();
        let admin = require_admin(pool, admin_id, "create loan type").await?;

        let id = next_id(pool, "loan_types", "LT", 3).await?;
        let mut loan_type = LoanType::new(
            &id,
            &input.name,
            input.interest_rate,
            input.maximum_amount,
            input.maximum_period_months,
        );
        input.apply_to(&mut loan_type);
        loan_type.validate().map_err(BusinessError::from)?;

        LoanTypeRepo::insert(pool, &loan_type)
            .await
            .map_err(|e| duplicate_name(e, &input.name))?;

        info!(loan_type = %id, name = %loan_type.name, "loan type created");
        self.ctx.emit(
            self.ctx
                .event(EventType::LoanTypeCreated, &admin, &id)
                .with_description(&loan_type.name),
        )?;
        Ok(loan_type)
    }

    pub async fn update_loan_type(&self, admin_id: &str, id: &str, input: LoanTypeInput) -> BusinessResult<LoanType> {
        let pool = self.ctx.pool();
        let admin = require_admin(pool, admin_id, "update loan type").await?;

        let mut loan_type = self.get_loan_type(id).await?;
        input.apply_to(&mut loan_type);
        loan_type.validate().map_err(BusinessError::from)?;

        LoanTypeRepo::update(pool, &loan_type)
            .await
            .map_err(|e| duplicate_name(e, &input.name))?;

        info!(loan_type = %id, "loan type updated");
        self.ctx
            .emit(self.ctx.event(EventType::LoanTypeUpdated, &admin, id))?;
        Ok(loan_type)
    }

    /// Flip the active flag; inactive products accept no new applications
    pub async fn toggle_loan_type(&self, admin_id: &str, id: &str) -> BusinessResult<LoanType> {
        let pool = self.ctx.pool();
        let admin = require_admin(pool, admin_id, "toggle loan type").await?;

        let mut loan_type = self.get_loan_type(id).await?;
        loan_type.is_active = !loan_type.is_active;
        LoanTypeRepo::update(pool, &loan_type).await?;

        info!(loan_type = %id, active = loan_type.is_active, "loan type toggled");
        self.ctx.emit(
            self.ctx
                .event(EventType::LoanTypeUpdated, &admin, id)
                .with_description(if loan_type.is_active { "activated" } else { "deactivated" }),
        )?;
        Ok(loan_type)
    }

    pub async fn get_loan_type(&self, id: &str) -> BusinessResult<LoanType> {
        Ok(LoanTypeRepo::get_by_id(self.ctx.pool(), id)
            .await
            .map_err(BusinessError::from)?)
    }

    pub async fn loan_types(&self, active_only: bool) -> BusinessResult<Vec<LoanType>> {
        Ok(LoanTypeRepo::list(self.ctx.pool(), active_only).await?)
    }
}

fn duplicate_name(err: PersistenceError, name: &str) -> BusinessError {
    if err.is_unique_violation() {
        BusinessError::Validation(format!("a loan type named '{}' already exists", name))
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_kind, ErrorKind};
    use rust_decimal_macros::dec;
    use sacco_core::{Member, MemberProfile};
    use sacco_persistence::{init_memory_database, EventStore, MemberRepo};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn context() -> (ServiceContext, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_memory_database().await.unwrap();
        let now = Utc::now();
        let admin = MemberProfile::new("Admin", "admin@sacco.test", "0700000000", "1");
        let member = MemberProfile::new("Member", "member@sacco.test", "0700000001", "2");
        MemberRepo::insert(&pool, &Member::admin("MEM_0001", "SACCO-2026-0001", admin, now))
            .await
            .unwrap();
        MemberRepo::insert(&pool, &Member::approved("MEM_0002", "SACCO-2026-0002", member, now))
            .await
            .unwrap();
        let events = Arc::new(EventStore::new(dir.path()).unwrap());
        (ServiceContext::from_parts(pool, events), dir)
    }

    #[tokio::test]
    async fn test_settings_default_then_update() {
        let (ctx, _dir) = context().await;
        let service = PolicyService::new(&ctx);

        let mut settings = service.settings().await.unwrap();
        assert_eq!(settings.loan_multiplier, dec!(3));

        settings.minimum_guarantor_percentage = dec!(70);
        let saved = service.update_settings("MEM_0001", settings).await.unwrap();
        assert_eq!(saved.updated_by.as_deref(), Some("MEM_0001"));
        assert_eq!(service.settings().await.unwrap().minimum_guarantor_percentage, dec!(70));
    }

    #[tokio::test]
    async fn test_settings_validation_and_permission() {
        let (ctx, _dir) = context().await;
        let service = PolicyService::new(&ctx);

        let mut settings = service.settings().await.unwrap();
        settings.loan_multiplier = dec!(11);
        let err = service.update_settings("MEM_0001", settings.clone()).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Validation);

        settings.loan_multiplier = dec!(2);
        let err = service.update_settings("MEM_0002", settings).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Permission);
    }

    #[tokio::test]
    async fn test_loan_type_lifecycle() {
        let (ctx, _dir) = context().await;
        let service = PolicyService::new(&ctx);

        let input = LoanTypeInput::new("Emergency", dec!(10), dec!(50000), 6).with_minimum_membership(1);
        let lt = service.create_loan_type("MEM_0001", input.clone()).await.unwrap();
        assert_eq!(lt.id, "LT_001");
        assert_eq!(lt.minimum_membership_months, 1);

        let err = service.create_loan_type("MEM_0001", input).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Validation);

        let toggled = service.toggle_loan_type("MEM_0001", "LT_001").await.unwrap();
        assert!(!toggled.is_active);
        assert!(service.loan_types(true).await.unwrap().is_empty());
        assert_eq!(service.loan_types(false).await.unwrap().len(), 1);

        let updated = service
            .update_loan_type("MEM_0001", "LT_001", LoanTypeInput::new("Emergency", dec!(9), dec!(60000), 6))
            .await
            .unwrap();
        assert_eq!(updated.interest_rate, dec!(9));
        assert!(!updated.is_active);
    }
}
