//! # Sacco Business
//!
//! Business logic layer - membership, investments, dividends, targets, loans,
//! ledger, policy and notifications. Every service borrows a shared [`ServiceContext`].

pub mod dividend;
pub mod error;
pub mod investment;
pub mod ledger;
pub mod loan;
pub mod membership;
pub mod notifications;
pub mod policy;
pub mod services;
pub mod target;

pub use dividend::DividendService;
pub use error::{error_kind, BusinessError, BusinessResult, ErrorKind};
pub use investment::{InvestmentService, AUTO_APPROVER};
pub use ledger::{LedgerService, Reconciliation};
pub use loan::{AccruedPenalties, Eligibility, LoanRequest, LoanService, OverdueLoan};
pub use membership::MembershipService;
pub use notifications::{
    DeliveryError, LogNotifier, Notice, NotificationService, Notifier, RetryReport,
    NOTIFICATION_TTL_DAYS,
};
pub use policy::{LoanTypeInput, PolicyService};
pub use services::ServiceContext;
pub use target::{TargetInput, TargetService};
