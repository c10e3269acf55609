//! Integration tests for the SACCO back office
//!
//! These tests drive the services end to end: membership approval,
//! investments, the ledger, the loan engine and the audit trail.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sacco_business::{
    error_kind, ErrorKind, InvestmentService, LedgerService, LoanRequest, LoanService,
    MembershipService, NotificationService, PolicyService, ServiceContext,
};
use sacco_core::{
    EventType, InvestmentCategory, LoanStatus, Member, MemberProfile, RankingBasis,
};
use sacco_persistence::{Database, EventFilter};
use tempfile::TempDir;

struct Sacco {
    db: Database,
    ctx: ServiceContext,
    admin: Member,
    _dir: TempDir,
}

/// Fresh in-memory SACCO with a bootstrap admin, no tenure requirement and
/// a 50 monthly minimum
async fn setup() -> Sacco {
    let dir = TempDir::new().unwrap();
    let db = Database::in_memory(dir.path().join("events")).await.unwrap();
    let ctx = ServiceContext::new(&db);

    let admin = MembershipService::new(&ctx)
        .register_admin(None, MemberProfile::new("Root Admin", "admin@sacco.test", "0700000000", "100"))
        .await
        .unwrap();

    let policy = PolicyService::new(&ctx);
    let mut settings = policy.settings().await.unwrap();
    settings.minimum_membership_months = 0;
    settings.minimum_monthly_investment = dec!(50);
    policy.update_settings(&admin.id, settings).await.unwrap();

    Sacco {
        db,
        ctx,
        admin,
        _dir: dir,
    }
}

async fn join(sacco: &Sacco, name: &str, email: &str) -> Member {
    let membership = MembershipService::new(&sacco.ctx);
    let app = membership
        .submit_application(MemberProfile::new(name, email, "0711000000", email))
        .await
        .unwrap();
    membership
        .approve_application(&sacco.admin.id, &app.id, None)
        .await
        .unwrap()
}

async fn invest(sacco: &Sacco, member: &Member, category: InvestmentCategory, amount: Decimal) {
    let service = InvestmentService::new(&sacco.ctx);
    let inv = service
        .invest(&member.id, category, amount, None, None)
        .await
        .unwrap();
    service.confirm(&sacco.admin.id, &inv.id).await.unwrap();
}

/// Test: 100 share capital + 50 monthly investment → balance 150, ranking 150
#[tokio::test]
async fn test_investments_drive_balance_and_ranking() {
    let sacco = setup().await;
    let alice = join(&sacco, "Alice Wambui", "alice@example.com").await;

    invest(&sacco, &alice, InvestmentCategory::ShareCapital, dec!(100)).await;
    invest(&sacco, &alice, InvestmentCategory::MonthlyInvestment, dec!(50)).await;

    let ledger = LedgerService::new(&sacco.ctx);
    assert_eq!(ledger.balance(&alice.id).await.unwrap(), dec!(150));

    let rankings = InvestmentService::new(&sacco.ctx)
        .rankings(RankingBasis::Total)
        .await
        .unwrap();
    assert_eq!(rankings.len(), 1);
    assert_eq!(rankings[0].member_id, alice.id);
    assert_eq!(rankings[0].amount, dec!(150));

    let check = ledger.reconcile(&alice.id).await.unwrap();
    assert!(check.is_consistent);
}

/// Test: pending entries never count towards the balance; ties rank stably
#[tokio::test]
async fn test_balance_is_signed_sum_of_confirmed() {
    let sacco = setup().await;
    let bob = join(&sacco, "Bob Otieno", "bob@example.com").await;
    let carol = join(&sacco, "Carol Muthoni", "carol@example.com").await;

    invest(&sacco, &bob, InvestmentCategory::ShareCapital, dec!(100)).await;
    invest(&sacco, &bob, InvestmentCategory::SpecialDeposit, dec!(50)).await;
    invest(&sacco, &carol, InvestmentCategory::ShareCapital, dec!(150)).await;

    // A pending deposit never counts
    let ledger = LedgerService::new(&sacco.ctx);
    ledger.deposit(&bob.id, dec!(999), None).await.unwrap();

    assert_eq!(ledger.balance(&bob.id).await.unwrap(), dec!(150));
    let breakdown = ledger.balance_breakdown(&bob.id).await.unwrap();
    assert_eq!(breakdown.share_capital, dec!(100));
    assert_eq!(breakdown.savings, dec!(50));
    assert_eq!(breakdown.pending_deposits, dec!(999));

    // Equal totals rank by member id, repeatably
    let investments = InvestmentService::new(&sacco.ctx);
    let first = investments.rankings(RankingBasis::Total).await.unwrap();
    let second = investments.rankings(RankingBasis::Total).await.unwrap();
    assert_eq!(first, second);
    // bob joined first, so has the lower member id
    assert_eq!(first[0].member_id, bob.id);
    assert_eq!(first[1].member_id, carol.id);
    assert_eq!(first[0].amount, dec!(150));
    assert_eq!(first[1].amount, dec!(150));
}

/// Test: 30% + 30% confirmed guarantees fail approval against a 70% minimum
#[tokio::test]
async fn test_guarantor_minimum_blocks_approval() {
    let sacco = setup().await;
    let borrower = join(&sacco, "Dan Kiprop", "dan@example.com").await;
    let g1 = join(&sacco, "Eve Njoroge", "eve@example.com").await;
    let g2 = join(&sacco, "Fay Atieno", "fay@example.com").await;
    invest(&sacco, &borrower, InvestmentCategory::ShareCapital, dec!(1000)).await;

    let loans = LoanService::new(&sacco.ctx);
    let loan = loans
        .apply_for_loan(
            LoanRequest::new(&borrower.id, dec!(1000), 6, "dairy cow")
                .with_guarantor(&g1.id, dec!(30))
                .with_guarantor(&g2.id, dec!(30)),
        )
        .await
        .unwrap();
    loans.confirm_guarantee(&g1.id, &loan.id).await.unwrap();
    loans.confirm_guarantee(&g2.id, &loan.id).await.unwrap();

    let policy = PolicyService::new(&sacco.ctx);
    let mut settings = policy.settings().await.unwrap();
    settings.minimum_guarantor_percentage = dec!(70);
    policy.update_settings(&sacco.admin.id, settings).await.unwrap();

    let err = loans
        .approve(&sacco.admin.id, &loan.id, None, None, None)
        .await
        .unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Policy);
    assert_eq!(loans.get(&loan.id).await.unwrap().status, LoanStatus::Applied);

    // The guarantors were told about the request
    let unread = NotificationService::new(&sacco.ctx)
        .unread_count(&g1.id)
        .await
        .unwrap();
    assert!(unread >= 1);
}

/// Test: confirming the same payment twice credits the loan once
#[tokio::test]
async fn test_payment_confirmed_once() {
    let sacco = setup().await;
    let borrower = join(&sacco, "Gina Chebet", "gina@example.com").await;
    let guarantor = join(&sacco, "Hugo Mwangi", "hugo@example.com").await;
    invest(&sacco, &borrower, InvestmentCategory::ShareCapital, dec!(2000)).await;

    let loans = LoanService::new(&sacco.ctx);
    let loan = loans
        .apply_for_loan(
            LoanRequest::new(&borrower.id, dec!(1200), 12, "school fees").with_guarantor(&guarantor.id, dec!(100)),
        )
        .await
        .unwrap();
    loans.confirm_guarantee(&guarantor.id, &loan.id).await.unwrap();
    loans
        .approve(&sacco.admin.id, &loan.id, None, Some(dec!(0)), None)
        .await
        .unwrap();
    let loan = loans
        .disburse(&sacco.admin.id, &loan.id, "BANK-TRF-77", None)
        .await
        .unwrap();
    assert_eq!(loan.outstanding(), dec!(1200));

    let payment = loans
        .make_payment(&borrower.id, &loan.id, dec!(100), "MPESA-ABC", None)
        .await
        .unwrap();
    loans.confirm_payment(&sacco.admin.id, &payment.id).await.unwrap();
    let err = loans
        .confirm_payment(&sacco.admin.id, &payment.id)
        .await
        .unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::State);

    assert_eq!(loans.outstanding(&loan.id).await.unwrap(), dec!(1100));
    let ledger = LedgerService::new(&sacco.ctx);
    // 2000 share capital + 1200 disbursed - 100 repaid
    assert_eq!(ledger.balance(&borrower.id).await.unwrap(), dec!(3100));
    assert!(ledger.reconcile(&borrower.id).await.unwrap().is_consistent);

    // The audit trail saw each step once
    let events = sacco.db.event_reader().read_all().unwrap();
    let confirmed = EventFilter::new()
        .member(&borrower.id)
        .event_types(vec![EventType::PaymentConfirmed])
        .apply(events.clone());
    assert_eq!(confirmed.len(), 1);
    let disbursed = EventFilter::new()
        .event_types(vec![EventType::LoanDisbursed])
        .apply(events);
    assert_eq!(disbursed.len(), 1);
}
