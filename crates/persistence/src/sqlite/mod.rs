//! SQLite persistence module
//!
//! Repository pattern for SQLite database access.

pub mod repos;
pub mod schema;

pub use repos::{
    create_pool, init_database, init_memory_database, next_id, run_migrations, ApplicationRepo,
    CollateralRepo, CommentRepo, DeliveryRepo, DividendRepo, GuarantorRepo, InvestmentRepo,
    LoanRepo, LoanTypeRepo, MemberRepo, NotificationRepo, PaymentRepo, SettingsRepo, TargetRepo,
    TransactionRepo,
};
pub use schema::{
    ApplicationRow, CollateralRow, CommentRow, DeliveryRow, DividendRow, GuarantorRow,
    InvestmentRow, LoanPaymentRow, LoanRow, LoanTypeRow, MemberRow, NotificationRow, TargetRow,
    TransactionRow,
};
