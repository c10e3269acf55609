//! # Sacco Core
//!
//! Domain types for the SACCO back office. Pure business rules, no I/O.
//!
//! ```text
//! Member ──1:N── Investment
//!    │
//!    ├──1:N── Loan ──1:N── LoanPayment
//!    │          ├──N:M── Guarantor (Member)
//!    │          ├──1:N── LoanCollateral, LoanComment
//!    ├──1:N── Dividend (one per year)
//!    └──1:N── Transaction  (balances are derived from here)
//! ```

pub mod application;
pub mod collateral;
pub mod comment;
pub mod dividend;
pub mod error;
pub mod event;
pub mod investment;
pub mod loan;
pub mod member;
pub mod money;
pub mod notification;
pub mod payment;
pub mod policy;
pub mod schedule;
pub mod target;
pub mod transaction;

pub use application::{ApplicationStatus, MemberApplication};
pub use collateral::{verified_value, CollateralType, LoanCollateral};
pub use comment::{CommentKind, LoanComment};
pub use dividend::{eligible_holdings, Dividend, DividendRates, DividendStatus};
pub use error::{CoreError, CoreResult};
pub use event::{Event, EventType};
pub use investment::{
    rank_members, Investment, InvestmentCategory, InvestmentStatus, InvestmentSummary,
    RankingBasis, RankingEntry,
};
pub use loan::{
    format_loan_number, total_guarantee, Guarantor, GuarantorStatus, Loan, LoanStatus,
    MINIMUM_LOAN_AMOUNT,
};
pub use member::{
    format_member_number, KycStatus, Member, MemberProfile, MemberRole, MemberStanding,
};
pub use money::{percent_of, round_money, Currency};
pub use notification::{
    Channel, Delivery, DeliveryStatus, Notification, NotificationCategory, NotificationKind,
    MAX_DELIVERY_ATTEMPTS,
};
pub use payment::{LoanPayment, PaymentStatus};
pub use policy::{LoanType, PolicySettings};
pub use schedule::{
    monthly_payment, Allocation, Installment, LoanTerms, PenaltyAccrual, RepaymentSchedule,
    MAX_REPAYMENT_MONTHS,
};
pub use target::{InvestmentTarget, TargetPeriod, TargetScope};
pub use transaction::{
    compute_balance, generate_transaction_id, Direction, MemberBalance, Statement, Transaction,
    TransactionCategory, TransactionStatus, TransactionType,
};
