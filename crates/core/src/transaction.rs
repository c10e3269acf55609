//! # Transaction Module
//!
//! Append-only ledger entries. A transaction is created pending or
//! confirmed; the only mutation ever allowed is pending → confirmed.
//! Corrections are new compensating entries that point back at the
//! original via `reverses_id`.
//!
//! A member's balance is always the signed sum of their confirmed entries.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    LoanDisbursement,
    LoanPayment,
    DividendPayment,
    FeePayment,
    PenaltyPayment,
    TransferIn,
    TransferOut,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::LoanDisbursement => "loan_disbursement",
            TransactionType::LoanPayment => "loan_payment",
            TransactionType::DividendPayment => "dividend_payment",
            TransactionType::FeePayment => "fee_payment",
            TransactionType::PenaltyPayment => "penalty_payment",
            TransactionType::TransferIn => "transfer_in",
            TransactionType::TransferOut => "transfer_out",
            TransactionType::Adjustment => "adjustment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deposit" => Some(TransactionType::Deposit),
            "withdrawal" => Some(TransactionType::Withdrawal),
            "loan_disbursement" => Some(TransactionType::LoanDisbursement),
            "loan_payment" => Some(TransactionType::LoanPayment),
            "dividend_payment" => Some(TransactionType::DividendPayment),
            "fee_payment" => Some(TransactionType::FeePayment),
            "penalty_payment" => Some(TransactionType::PenaltyPayment),
            "transfer_in" => Some(TransactionType::TransferIn),
            "transfer_out" => Some(TransactionType::TransferOut),
            "adjustment" => Some(TransactionType::Adjustment),
            _ => None,
        }
    }

    /// Money into the member's account by default
    pub fn default_direction(&self) -> Direction {
        match self {
            TransactionType::Deposit
            | TransactionType::LoanDisbursement
            | TransactionType::DividendPayment
            | TransactionType::TransferIn => Direction::Credit,
            _ => Direction::Debit,
        }
    }

    pub fn default_category(&self) -> TransactionCategory {
        match self {
            TransactionType::Deposit | TransactionType::Withdrawal => TransactionCategory::Investment,
            TransactionType::LoanDisbursement | TransactionType::LoanPayment => TransactionCategory::Loan,
            TransactionType::DividendPayment => TransactionCategory::Dividend,
            TransactionType::FeePayment => TransactionCategory::Fee,
            TransactionType::PenaltyPayment => TransactionCategory::Penalty,
            TransactionType::TransferIn | TransactionType::TransferOut => TransactionCategory::Transfer,
            TransactionType::Adjustment => TransactionCategory::Adjustment,
        }
    }

    /// Prefix of generated transaction ids
    pub fn id_prefix(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEP",
            TransactionType::Withdrawal => "WDR",
            TransactionType::LoanDisbursement => "LDR",
            TransactionType::LoanPayment => "LPY",
            TransactionType::DividendPayment => "DIV",
            TransactionType::FeePayment => "FEE",
            TransactionType::PenaltyPayment => "PEN",
            TransactionType::TransferIn => "TIN",
            TransactionType::TransferOut => "TOU",
            TransactionType::Adjustment => "ADJ",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "credit" => Some(Direction::Credit),
            "debit" => Some(Direction::Debit),
            _ => None,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Direction::Credit => Direction::Debit,
            Direction::Debit => Direction::Credit,
        }
    }

    /// Apply the sign of this direction to an amount
    pub fn sign(&self, amount: Decimal) -> Decimal {
        match self {
            Direction::Credit => amount,
            Direction::Debit => -amount,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionCategory {
    Investment,
    Loan,
    Fee,
    Penalty,
    Dividend,
    Transfer,
    Adjustment,
}

impl TransactionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionCategory::Investment => "investment",
            TransactionCategory::Loan => "loan",
            TransactionCategory::Fee => "fee",
            TransactionCategory::Penalty => "penalty",
            TransactionCategory::Dividend => "dividend",
            TransactionCategory::Transfer => "transfer",
            TransactionCategory::Adjustment => "adjustment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "investment" => Some(TransactionCategory::Investment),
            "loan" => Some(TransactionCategory::Loan),
            "fee" => Some(TransactionCategory::Fee),
            "penalty" => Some(TransactionCategory::Penalty),
            "dividend" => Some(TransactionCategory::Dividend),
            "transfer" => Some(TransactionCategory::Transfer),
            "adjustment" => Some(TransactionCategory::Adjustment),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    /// Terminal
    Confirmed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(TransactionStatus::Pending),
            "confirmed" | "completed" => Some(TransactionStatus::Confirmed),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Generate a transaction id: `{PREFIX}-{YYYYMMDDHHMMSS}-{6 hex}`
pub fn generate_transaction_id(tx_type: TransactionType, at: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string()[..6].to_uppercase();
    format!("{}-{}-{}", tx_type.id_prefix(), at.format("%Y%m%d%H%M%S"), suffix)
}

/// Ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub member_id: String,
    pub tx_type: TransactionType,
    pub category: TransactionCategory,
    pub direction: Direction,
    /// Always positive; the direction carries the sign
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub reference: Option<String>,
    pub status: TransactionStatus,
    /// Member balance around this entry, stamped at confirmation
    pub balance_before: Option<Decimal>,
    pub balance_after: Option<Decimal>,
    pub investment_id: Option<String>,
    pub loan_id: Option<String>,
    pub payment_id: Option<String>,
    /// Set on compensating entries
    pub reverses_id: Option<String>,
    pub processed_by: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// New pending entry with the type's default direction and category
    pub fn new(
        member_id: &str,
        tx_type: TransactionType,
        amount: Decimal,
        currency: &str,
        description: &str,
    ) -> CoreResult<Self> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::InvalidAmount(format!(
                "transaction amount must be positive: {}",
                amount
            )));
        }
        let now = Utc::now();
        Ok(Self {
            id: generate_transaction_id(tx_type, now),
            member_id: member_id.to_string(),
            tx_type,
            category: tx_type.default_category(),
            direction: tx_type.default_direction(),
            amount,
            currency: currency.to_string(),
            description: description.to_string(),
            reference: None,
            status: TransactionStatus::Pending,
            balance_before: None,
            balance_after: None,
            investment_id: None,
            loan_id: None,
            payment_id: None,
            reverses_id: None,
            processed_by: None,
            processed_at: None,
            created_at: now,
        })
    }

    pub fn with_reference(mut self, reference: &str) -> Self {
        self.reference = Some(reference.to_string());
        self
    }

    pub fn with_investment(mut self, investment_id: &str) -> Self {
        self.investment_id = Some(investment_id.to_string());
        self
    }

    pub fn with_loan(mut self, loan_id: &str) -> Self {
        self.loan_id = Some(loan_id.to_string());
        self
    }

    pub fn with_payment(mut self, payment_id: &str) -> Self {
        self.payment_id = Some(payment_id.to_string());
        self
    }

    pub fn with_category(mut self, category: TransactionCategory) -> Self {
        self.category = category;
        self
    }

    /// Compensating entry for a confirmed transaction
    pub fn reversal_of(original: &Transaction, reason: &str) -> CoreResult<Self> {
        if original.status != TransactionStatus::Confirmed {
            return Err(CoreError::invalid_transition(
                "Transaction",
                original.status.as_str(),
                "reverse",
            ));
        }
        if original.reverses_id.is_some() {
            return Err(CoreError::ValidationError(format!(
                "{} is itself a reversal and cannot be reversed",
                original.id
            )));
        }
        // Entries owned by an investment or a loan are corrected through that record
        if let Some(owner) = original.linked_record() {
            return Err(CoreError::invalid_transition(
                "Transaction",
                &format!("linked to {}", owner),
                "reverse",
            ));
        }
        let mut tx = Self::new(
            &original.member_id,
            TransactionType::Adjustment,
            original.amount,
            &original.currency,
            &format!("Reversal of {}: {}", original.id, reason),
        )?;
        tx.direction = original.direction.opposite();
        tx.category = original.category;
        tx.reverses_id = Some(original.id.clone());
        Ok(tx)
    }

    /// Investment, payment, loan or dividend this entry was posted for
    pub fn linked_record(&self) -> Option<&str> {
        self.payment_id
            .as_deref()
            .or(self.investment_id.as_deref())
            .or(self.loan_id.as_deref())
            .or_else(|| match self.tx_type {
                // Dividend credits carry the dividend id as their reference
                TransactionType::DividendPayment => self.reference.as_deref(),
                _ => None,
            })
    }

    /// pending → confirmed; the only mutation a transaction ever sees
    pub fn complete(&mut self, processed_by: &str, balance_before: Decimal, at: DateTime<Utc>) -> CoreResult<()> {
        if self.status != TransactionStatus::Pending {
            return Err(CoreError::invalid_transition("Transaction", self.status.as_str(), "complete"));
        }
        self.status = TransactionStatus::Confirmed;
        self.balance_before = Some(balance_before);
        self.balance_after = Some(balance_before + self.signed_amount());
        self.processed_by = Some(processed_by.to_string());
        self.processed_at = Some(at);
        Ok(())
    }

    pub fn signed_amount(&self) -> Decimal {
        self.direction.sign(self.amount)
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == TransactionStatus::Confirmed
    }
}

/// Signed sum of a member's confirmed transactions
pub fn compute_balance(transactions: &[Transaction]) -> Decimal {
    transactions
        .iter()
        .filter(|t| t.is_confirmed())
        .map(Transaction::signed_amount)
        .sum()
}

/// Balance breakdown for one member, derived from the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberBalance {
    pub member_id: String,
    /// Signed sum of confirmed transactions
    pub current_balance: Decimal,
    /// Current balance minus pending withdrawals
    pub available_balance: Decimal,
    pub pending_deposits: Decimal,
    pub pending_withdrawals: Decimal,
    pub share_capital: Decimal,
    /// Monthly investments + special deposits
    pub savings: Decimal,
    /// Outstanding on active loans
    pub loan_balance: Decimal,
    pub confirmed_count: usize,
    pub last_transaction_at: Option<DateTime<Utc>>,
}

impl MemberBalance {
    pub fn from_transactions(member_id: &str, transactions: &[Transaction]) -> Self {
        let mut balance = Self {
            member_id: member_id.to_string(),
            current_balance: compute_balance(transactions),
            ..Default::default()
        };
        for tx in transactions {
            match tx.status {
                TransactionStatus::Confirmed => balance.confirmed_count += 1,
                TransactionStatus::Pending => match tx.direction {
                    Direction::Credit => balance.pending_deposits += tx.amount,
                    Direction::Debit => balance.pending_withdrawals += tx.amount,
                },
            }
            balance.last_transaction_at = Some(
                balance
                    .last_transaction_at
                    .map_or(tx.created_at, |l| l.max(tx.created_at)),
            );
        }
        balance.available_balance = balance.current_balance - balance.pending_withdrawals;
        balance
    }
}

/// Account statement over an optional date window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub member_id: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Balance of everything confirmed before `from`
    pub opening_balance: Decimal,
    pub total_credits: Decimal,
    pub total_debits: Decimal,
    pub closing_balance: Decimal,
    /// Confirmed entries inside the window, in ledger order
    pub entries: Vec<Transaction>,
}

impl Statement {
    /// Entries are dated by when they were confirmed
    pub fn build(
        member_id: &str,
        transactions: &[Transaction],
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Self {
        let mut statement = Self {
            member_id: member_id.to_string(),
            from,
            to,
            opening_balance: Decimal::ZERO,
            total_credits: Decimal::ZERO,
            total_debits: Decimal::ZERO,
            closing_balance: Decimal::ZERO,
            entries: Vec::new(),
        };

        for tx in transactions.iter().filter(|t| t.is_confirmed() && t.member_id == member_id) {
            let day = tx.processed_at.unwrap_or(tx.created_at).date_naive();
            if from.is_some_and(|f| day < f) {
                statement.opening_balance += tx.signed_amount();
                continue;
            }
            if to.is_some_and(|t| day > t) {
                continue;
            }
            match tx.direction {
                Direction::Credit => statement.total_credits += tx.amount,
                Direction::Debit => statement.total_debits += tx.amount,
            }
            statement.entries.push(tx.clone());
        }

        statement.closing_balance =
            statement.opening_balance + statement.total_credits - statement.total_debits;
        statement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn confirmed(tx_type: TransactionType, amount: Decimal, before: Decimal) -> Transaction {
        let mut tx = Transaction::new("MEM_0002", tx_type, amount, "KES", "test").unwrap();
        tx.complete("MEM_0001", before, Utc::now()).unwrap();
        tx
    }

    #[test]
    fn test_default_directions() {
        assert_eq!(TransactionType::Deposit.default_direction(), Direction::Credit);
        assert_eq!(TransactionType::LoanDisbursement.default_direction(), Direction::Credit);
        assert_eq!(TransactionType::LoanPayment.default_direction(), Direction::Debit);
        assert_eq!(TransactionType::FeePayment.default_direction(), Direction::Debit);
        assert_eq!(TransactionType::Adjustment.default_category(), TransactionCategory::Adjustment);
    }

    #[test]
    fn test_id_format() {
        let at = chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 10, 16, 8, 30, 5).unwrap();
        let id = generate_transaction_id(TransactionType::Deposit, at);
        assert!(id.starts_with("DEP-20261016083005-"));
        assert_eq!(id.len(), "DEP-20261016083005-".len() + 6);
    }

    #[test]
    fn test_complete_stamps_balances_once() {
        let mut tx = Transaction::new("MEM_0002", TransactionType::Withdrawal, dec!(40), "KES", "cash").unwrap();
        tx.complete("MEM_0001", dec!(100), Utc::now()).unwrap();
        assert_eq!(tx.balance_after, Some(dec!(60)));
        assert!(tx.complete("MEM_0001", dec!(60), Utc::now()).unwrap_err().is_invalid_transition());
    }

    #[test]
    fn test_balance_is_signed_sum_of_confirmed() {
        let pending = Transaction::new("MEM_0002", TransactionType::Deposit, dec!(999), "KES", "p").unwrap();
        let txs = vec![
            confirmed(TransactionType::Deposit, dec!(100), dec!(0)),
            confirmed(TransactionType::Deposit, dec!(50), dec!(100)),
            confirmed(TransactionType::LoanPayment, dec!(30), dec!(150)),
            pending,
        ];
        assert_eq!(compute_balance(&txs), dec!(120));

        let breakdown = MemberBalance::from_transactions("MEM_0002", &txs);
        assert_eq!(breakdown.pending_deposits, dec!(999));
        assert_eq!(breakdown.available_balance, dec!(120));
        assert_eq!(breakdown.confirmed_count, 3);
    }

    #[test]
    fn test_reversal_compensates() {
        let original = confirmed(TransactionType::Deposit, dec!(75), dec!(0));
        let mut reversal = Transaction::reversal_of(&original, "duplicate").unwrap();
        assert_eq!(reversal.direction, Direction::Debit);
        assert_eq!(reversal.reverses_id.as_deref(), Some(original.id.as_str()));

        reversal.complete("MEM_0001", dec!(75), Utc::now()).unwrap();
        assert_eq!(compute_balance(&[original, reversal.clone()]), Decimal::ZERO);
        assert!(Transaction::reversal_of(&reversal, "again").is_err());
    }

    #[test]
    fn test_linked_entries_cannot_be_reversed() {
        let mut repayment = Transaction::new("MEM_0002", TransactionType::LoanPayment, dec!(100), "KES", "r")
            .unwrap()
            .with_loan("LOAN_0001")
            .with_payment("PAY_0001");
        repayment.complete("MEM_0001", dec!(500), Utc::now()).unwrap();
        let err = Transaction::reversal_of(&repayment, "typo").unwrap_err();
        assert!(err.is_invalid_transition());

        let mut contribution = Transaction::new("MEM_0002", TransactionType::Deposit, dec!(100), "KES", "c")
            .unwrap()
            .with_investment("INV_0001");
        contribution.complete("MEM_0001", dec!(0), Utc::now()).unwrap();
        assert_eq!(contribution.linked_record(), Some("INV_0001"));
        assert!(Transaction::reversal_of(&contribution, "typo").is_err());
    }

    #[test]
    fn test_pending_cannot_be_reversed() {
        let tx = Transaction::new("MEM_0002", TransactionType::Deposit, dec!(10), "KES", "p").unwrap();
        assert!(Transaction::reversal_of(&tx, "x").is_err());
    }

    #[test]
    fn test_statement_window() {
        let at = |d: u32| chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 10, d, 9, 0, 0).unwrap();
        let mut early = Transaction::new("MEM_0002", TransactionType::Deposit, dec!(100), "KES", "a").unwrap();
        early.complete("MEM_0001", dec!(0), at(1)).unwrap();
        let mut inside = Transaction::new("MEM_0002", TransactionType::Withdrawal, dec!(30), "KES", "b").unwrap();
        inside.complete("MEM_0001", dec!(100), at(10)).unwrap();
        let mut late = Transaction::new("MEM_0002", TransactionType::Deposit, dec!(5), "KES", "c").unwrap();
        late.complete("MEM_0001", dec!(70), at(20)).unwrap();

        let from = NaiveDate::from_ymd_opt(2026, 10, 5);
        let to = NaiveDate::from_ymd_opt(2026, 10, 15);
        let statement = Statement::build("MEM_0002", &[early, inside, late], from, to);

        assert_eq!(statement.opening_balance, dec!(100));
        assert_eq!(statement.total_debits, dec!(30));
        assert_eq!(statement.closing_balance, dec!(70));
        assert_eq!(statement.entries.len(), 1);
    }
}
