//! Transaction ledger - append-only, balances derived
//!
//! A transaction is created pending or confirmed and the only change it ever
//! sees is pending → confirmed. Corrections are compensating entries.

use crate::error::{BusinessError, BusinessResult};
use crate::policy::current_settings;
use crate::services::{load_member, require_active_member, require_admin, ServiceContext};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sacco_core::{
    compute_balance, Direction, EventType, InvestmentSummary, LoanStatus, MemberBalance, Statement,
    Transaction, TransactionStatus, TransactionType,
};
use sacco_persistence::{InvestmentRepo, LoanRepo, TransactionRepo};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

/// Result of recomputing a member's balance from the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub member_id: String,
    /// Signed sum of confirmed transactions
    pub computed: Decimal,
    /// `balance_after` of the latest confirmed transaction
    pub stamped: Option<Decimal>,
    pub is_consistent: bool,
}

// === Ledger primitives (used inside an open SQL transaction) ===

/// Confirmed balance of a member as seen by `conn`
pub(crate) async fn ledger_balance(conn: &mut SqliteConnection, member_id: &str) -> BusinessResult<Decimal> {
    let entries = TransactionRepo::list_by_member(&mut *conn, member_id).await?;
    Ok(compute_balance(&entries))
}

/// Complete a freshly built entry against the current balance and insert it
pub(crate) async fn post_confirmed(
    conn: &mut SqliteConnection,
    mut entry: Transaction,
    processed_by: &str,
    at: DateTime<Utc>,
) -> BusinessResult<Transaction> {
    let before = ledger_balance(&mut *conn, &entry.member_id).await?;
    entry.complete(processed_by, before, at).map_err(BusinessError::from)?;
    TransactionRepo::insert(&mut *conn, &entry).await?;
    Ok(entry)
}

/// Move a stored pending entry to confirmed
pub(crate) async fn complete_pending(
    conn: &mut SqliteConnection,
    transaction_id: &str,
    processed_by: &str,
    at: DateTime<Utc>,
) -> BusinessResult<Transaction> {
    let mut entry = TransactionRepo::get_by_id(&mut *conn, transaction_id)
        .await
        .map_err(BusinessError::from)?;
    let entries = TransactionRepo::list_by_member(&mut *conn, &entry.member_id).await?;
    let before = compute_balance(&entries);

    if entry.tx_type == TransactionType::Withdrawal && entry.status == TransactionStatus::Pending {
        // Other pending withdrawals keep their claim on the balance
        let reserved: Decimal = entries
            .iter()
            .filter(|t| {
                t.status == TransactionStatus::Pending && t.direction == Direction::Debit && t.id != entry.id
            })
            .map(|t| t.amount)
            .sum();
        let available = before - reserved;
        if entry.amount > available {
            return Err(BusinessError::insufficient_balance(entry.amount, available).into());
        }
    }

    entry.complete(processed_by, before, at).map_err(BusinessError::from)?;
    TransactionRepo::record_completion(&mut *conn, &entry)
        .await
        .map_err(BusinessError::from)?;
    Ok(entry)
}

/// Ledger Service - deposits, withdrawals, reversals and balances
pub struct LedgerService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> LedgerService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Member-initiated deposit, pending until an admin completes it
    pub async fn deposit(&self, member_id: &str, amount: Decimal, reference: Option<&str>) -> BusinessResult<Transaction> {
        self.create_pending(member_id, TransactionType::Deposit, amount, reference)
            .await
    }

    /// Member-initiated withdrawal; may not exceed the available balance
    pub async fn withdraw(&self, member_id: &str, amount: Decimal, reference: Option<&str>) -> BusinessResult<Transaction> {
        self.create_pending(member_id, TransactionType::Withdrawal, amount, reference)
            .await
    }

    async fn create_pending(
        &self,
        member_id: &str,
        tx_type: TransactionType,
        amount: Decimal,
        reference: Option<&str>,
    ) -> BusinessResult<Transaction> {
        let mut tx = self.ctx.pool().begin().await?;
        let member = require_active_member(&mut *tx, member_id, tx_type.as_str()).await?;
        let settings = current_settings(&mut *tx).await?;

        let mut entry = Transaction::new(
            &member.id,
            tx_type,
            amount,
            &settings.currency,
            &format!("Member {}", tx_type.as_str().replace('_', " ")),
        )
        .map_err(BusinessError::from)?;
        if let Some(reference) = reference {
            entry = entry.with_reference(reference);
        }

        if tx_type == TransactionType::Withdrawal {
            let entries = TransactionRepo::list_by_member(&mut *tx, &member.id).await?;
            let balance = MemberBalance::from_transactions(&member.id, &entries);
            if amount > balance.available_balance {
                warn!(member_id, %amount, available = %balance.available_balance, "withdrawal refused");
                return Err(BusinessError::insufficient_balance(amount, balance.available_balance).into());
            }
        }

        TransactionRepo::insert(&mut *tx, &entry).await?;
        tx.commit().await?;

        info!(transaction_id = %entry.id, member_id, tx_type = %tx_type, %amount, "transaction created");
        self.ctx.emit(
            self.ctx
                .event(EventType::TransactionCreated, &member, &entry.id)
                .for_member(&member.id)
                .with_amount(amount, &entry.currency),
        )?;
        Ok(entry)
    }

    /// pending → confirmed, stamping balance before/after
    pub async fn complete(&self, admin_id: &str, transaction_id: &str) -> BusinessResult<Transaction> {
        let mut tx = self.ctx.pool().begin().await?;
        let admin = require_admin(&mut *tx, admin_id, "complete transaction").await?;
        let entry = complete_pending(&mut *tx, transaction_id, &admin.id, Utc::now()).await?;
        tx.commit().await?;

        info!(transaction_id, balance_after = ?entry.balance_after, "transaction completed");
        self.ctx.emit(
            self.ctx
                .event(EventType::TransactionCompleted, &admin, transaction_id)
                .for_member(&entry.member_id)
                .with_amount(entry.amount, &entry.currency),
        )?;
        Ok(entry)
    }

    /// Append a confirmed compensating entry; the original is left untouched
    pub async fn reverse(&self, admin_id: &str, transaction_id: &str, reason: &str) -> BusinessResult<Transaction> {
        if reason.trim().is_empty() {
            return Err(BusinessError::Validation("a reversal reason is required".into()).into());
        }

        let mut tx = self.ctx.pool().begin().await?;
        let admin = require_admin(&mut *tx, admin_id, "reverse transaction").await?;
        let original = TransactionRepo::get_by_id(&mut *tx, transaction_id)
            .await
            .map_err(BusinessError::from)?;
        if let Some(existing) = TransactionRepo::find_reversal_of(&mut *tx, transaction_id).await? {
            return Err(BusinessError::invalid_transition(
                "Transaction",
                &format!("reversed by {}", existing.id),
                "reverse",
            )
            .into());
        }

        let reversal = Transaction::reversal_of(&original, reason).map_err(BusinessError::from)?;
        let reversal = match post_confirmed(&mut *tx, reversal, &admin.id, Utc::now()).await {
            Ok(entry) => entry,
            Err(e) if is_unique_violation(&e) => {
                return Err(BusinessError::invalid_transition("Transaction", "reversed", "reverse").into())
            }
            Err(e) => return Err(e),
        };
        tx.commit().await?;

        info!(transaction_id, reversal_id = %reversal.id, "transaction reversed");
        self.ctx.emit(
            self.ctx
                .event(EventType::TransactionReversed, &admin, &reversal.id)
                .for_member(&reversal.member_id)
                .with_amount(reversal.amount, &reversal.currency)
                .with_reference(transaction_id)
                .with_description(reason),
        )?;
        Ok(reversal)
    }

    // === Queries ===

    /// Signed sum of confirmed transactions
    pub async fn balance(&self, member_id: &str) -> BusinessResult<Decimal> {
        let pool = self.ctx.pool();
        load_member(pool, member_id).await?;
        let entries = TransactionRepo::list_by_member(pool, member_id).await?;
        Ok(compute_balance(&entries))
    }

    pub async fn balance_breakdown(&self, member_id: &str) -> BusinessResult<MemberBalance> {
        let pool = self.ctx.pool();
        load_member(pool, member_id).await?;
        let settings = current_settings(pool).await?;

        let entries = TransactionRepo::list_by_member(pool, member_id).await?;
        let mut balance = MemberBalance::from_transactions(member_id, &entries);

        let investments = InvestmentRepo::list_by_member(pool, member_id).await?;
        let summary = InvestmentSummary::from_investments(member_id, &investments, settings.loan_multiplier);
        balance.share_capital = summary.share_capital;
        balance.savings = summary.monthly_investment + summary.special_deposit;

        balance.loan_balance = LoanRepo::list_by_member(pool, member_id)
            .await?
            .iter()
            .filter(|l| matches!(l.status, LoanStatus::Disbursed | LoanStatus::Repaying))
            .map(|l| l.outstanding())
            .sum();

        debug!(member_id, current = %balance.current_balance, "balance breakdown");
        Ok(balance)
    }

    pub async fn statement(
        &self,
        member_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> BusinessResult<Statement> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(BusinessError::Validation(format!("statement window {} .. {} is empty", from, to)).into());
            }
        }
        let pool = self.ctx.pool();
        load_member(pool, member_id).await?;
        let entries = TransactionRepo::list_by_member(pool, member_id).await?;
        Ok(Statement::build(member_id, &entries, from, to))
    }

    /// Recompute the balance and compare it with the latest stamp
    pub async fn reconcile(&self, member_id: &str) -> BusinessResult<Reconciliation> {
        let pool = self.ctx.pool();
        load_member(pool, member_id).await?;
        let entries = TransactionRepo::list_by_member(pool, member_id).await?;

        let computed = compute_balance(&entries);
        let stamped = entries
            .iter()
            .filter(|t| t.is_confirmed())
            .max_by_key(|t| t.processed_at)
            .and_then(|t| t.balance_after);
        let is_consistent = stamped.map_or(computed.is_zero(), |s| s == computed);
        if !is_consistent {
            warn!(member_id, %computed, stamped = ?stamped, "ledger stamp mismatch");
        }

        Ok(Reconciliation {
            member_id: member_id.to_string(),
            computed,
            stamped,
            is_consistent,
        })
    }

    pub async fn get(&self, transaction_id: &str) -> BusinessResult<Transaction> {
        Ok(TransactionRepo::get_by_id(self.ctx.pool(), transaction_id)
            .await
            .map_err(BusinessError::from)?)
    }

    pub async fn list_for_member(&self, member_id: &str) -> BusinessResult<Vec<Transaction>> {
        Ok(TransactionRepo::list_by_member(self.ctx.pool(), member_id).await?)
    }

    pub async fn list_all(&self) -> BusinessResult<Vec<Transaction>> {
        Ok(TransactionRepo::list_all(self.ctx.pool()).await?)
    }

    pub async fn pending(&self) -> BusinessResult<Vec<Transaction>> {
        Ok(TransactionRepo::list_pending(self.ctx.pool()).await?)
    }
}

fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sacco_persistence::PersistenceError>()
            .is_some_and(|e| e.is_unique_violation())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_kind, ErrorKind};
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use sacco_core::{Member, MemberProfile};
    use sacco_persistence::{init_memory_database, EventStore, MemberRepo};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn context() -> (ServiceContext, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_memory_database().await.unwrap();
        let since = Utc::now() - Duration::days(365);
        let admin = MemberProfile::new("Admin", "admin@sacco.test", "0700000000", "1");
        let member = MemberProfile::new("Member", "member@sacco.test", "0700000001", "2");
        MemberRepo::insert(&pool, &Member::admin("MEM_0001", "SACCO-2025-0001", admin, since))
            .await
            .unwrap();
        MemberRepo::insert(&pool, &Member::approved("MEM_0002", "SACCO-2025-0002", member, since))
            .await
            .unwrap();
        let events = Arc::new(EventStore::new(dir.path()).unwrap());
        (ServiceContext::from_parts(pool, events), dir)
    }

    #[tokio::test]
    async fn test_deposit_then_complete() {
        let (ctx, _dir) = context().await;
        let ledger = LedgerService::new(&ctx);

        let dep = ledger.deposit("MEM_0002", dec!(500), Some("MPESA-1")).await.unwrap();
        assert_eq!(dep.status, TransactionStatus::Pending);
        assert_eq!(ledger.balance("MEM_0002").await.unwrap(), Decimal::ZERO);

        let done = ledger.complete("MEM_0001", &dep.id).await.unwrap();
        assert_eq!(done.balance_before, Some(dec!(0)));
        assert_eq!(done.balance_after, Some(dec!(500)));
        assert_eq!(ledger.balance("MEM_0002").await.unwrap(), dec!(500));

        let err = ledger.complete("MEM_0001", &dep.id).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::State);
    }

    #[tokio::test]
    async fn test_withdrawal_limited_by_available_balance() {
        let (ctx, _dir) = context().await;
        let ledger = LedgerService::new(&ctx);
        let dep = ledger.deposit("MEM_0002", dec!(100), None).await.unwrap();
        ledger.complete("MEM_0001", &dep.id).await.unwrap();

        let first = ledger.withdraw("MEM_0002", dec!(70), None).await.unwrap();
        // 70 is already reserved by the pending withdrawal
        let err = ledger.withdraw("MEM_0002", dec!(40), None).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Policy);

        ledger.complete("MEM_0001", &first.id).await.unwrap();
        assert_eq!(ledger.balance("MEM_0002").await.unwrap(), dec!(30));

        let breakdown = ledger.balance_breakdown("MEM_0002").await.unwrap();
        assert_eq!(breakdown.available_balance, dec!(30));
        assert_eq!(breakdown.pending_withdrawals, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_reverse_once() {
        let (ctx, _dir) = context().await;
        let ledger = LedgerService::new(&ctx);
        let dep = ledger.deposit("MEM_0002", dec!(250), None).await.unwrap();
        ledger.complete("MEM_0001", &dep.id).await.unwrap();

        let reversal = ledger.reverse("MEM_0001", &dep.id, "duplicate receipt").await.unwrap();
        assert_eq!(reversal.reverses_id.as_deref(), Some(dep.id.as_str()));
        assert_eq!(reversal.direction, Direction::Debit);
        assert_eq!(ledger.balance("MEM_0002").await.unwrap(), Decimal::ZERO);

        let original = ledger.get(&dep.id).await.unwrap();
        assert_eq!(original.status, TransactionStatus::Confirmed);

        let err = ledger.reverse("MEM_0001", &dep.id, "again").await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::State);

        let err = ledger.reverse("MEM_0002", &reversal.id, "nope").await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Permission);
    }

    #[tokio::test]
    async fn test_investment_deposit_is_not_reversible() {
        let (ctx, _dir) = context().await;
        let ledger = LedgerService::new(&ctx);
        let investments = crate::investment::InvestmentService::new(&ctx);
        let inv = investments
            .invest("MEM_0002", sacco_core::InvestmentCategory::ShareCapital, dec!(1000), None, None)
            .await
            .unwrap();
        investments.confirm("MEM_0001", &inv.id).await.unwrap();

        let deposit = ledger.list_for_member("MEM_0002").await.unwrap().remove(0);
        assert_eq!(deposit.investment_id.as_deref(), Some(inv.id.as_str()));

        let err = ledger.reverse("MEM_0001", &deposit.id, "bounced").await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::State);
        assert_eq!(ledger.balance("MEM_0002").await.unwrap(), dec!(1000));
        assert_eq!(investments.summary("MEM_0002").await.unwrap().share_capital, dec!(1000));
        assert!(ledger.reconcile("MEM_0002").await.unwrap().is_consistent);
    }

    #[tokio::test]
    async fn test_reconcile_and_statement() {
        let (ctx, _dir) = context().await;
        let ledger = LedgerService::new(&ctx);

        let empty = ledger.reconcile("MEM_0002").await.unwrap();
        assert!(empty.is_consistent);
        assert_eq!(empty.stamped, None);

        for amount in [dec!(100), dec!(50)] {
            let dep = ledger.deposit("MEM_0002", amount, None).await.unwrap();
            ledger.complete("MEM_0001", &dep.id).await.unwrap();
        }
        let check = ledger.reconcile("MEM_0002").await.unwrap();
        assert_eq!(check.computed, dec!(150));
        assert_eq!(check.stamped, Some(dec!(150)));
        assert!(check.is_consistent);

        let today = Utc::now().date_naive();
        let statement = ledger.statement("MEM_0002", Some(today), Some(today)).await.unwrap();
        assert_eq!(statement.entries.len(), 2);
        assert_eq!(statement.closing_balance, dec!(150));

        let err = ledger
            .statement("MEM_0002", Some(today), today.pred_opt())
            .await
            .unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Validation);
    }
}
