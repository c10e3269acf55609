//! Member statement report

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sacco_core::{Direction, Member, Statement};

use crate::exporters::ReportData;

/// One ledger line with its running balance
#[derive(Debug, Clone)]
pub struct StatementLine {
    pub date: String,
    pub transaction_id: String,
    pub tx_type: String,
    pub description: String,
    pub reference: String,
    pub credit: Option<Decimal>,
    pub debit: Option<Decimal>,
    pub balance: Decimal,
}

#[derive(Debug, Clone)]
pub struct StatementReport {
    pub title: String,
    pub member_id: String,
    pub member_name: String,
    pub currency: String,
    pub period: String,
    pub opening_balance: Decimal,
    pub total_credits: Decimal,
    pub total_debits: Decimal,
    pub closing_balance: Decimal,
    pub lines: Vec<StatementLine>,
    pub generated_at: DateTime<Utc>,
}

impl StatementReport {
    pub fn new(member: &Member, statement: &Statement, currency: &str) -> Self {
        let mut running = statement.opening_balance;
        let lines = statement
            .entries
            .iter()
            .map(|tx| {
                running += tx.signed_amount();
                let (credit, debit) = match tx.direction {
                    Direction::Credit => (Some(tx.amount), None),
                    Direction::Debit => (None, Some(tx.amount)),
                };
                StatementLine {
                    date: tx
                        .processed_at
                        .unwrap_or(tx.created_at)
                        .format("%Y-%m-%d")
                        .to_string(),
                    transaction_id: tx.id.clone(),
                    tx_type: tx.tx_type.as_str().to_string(),
                    description: tx.description.clone(),
                    reference: tx.reference.clone().unwrap_or_default(),
                    credit,
                    debit,
                    balance: running,
                }
            })
            .collect();

        let period = match (statement.from, statement.to) {
            (Some(from), Some(to)) => format!("{} to {}", from, to),
            (Some(from), None) => format!("from {}", from),
            (None, Some(to)) => format!("up to {}", to),
            (None, None) => "all time".to_string(),
        };

        Self {
            title: format!("Statement - {}", member.display_name()),
            member_id: member.id.clone(),
            member_name: member.profile.full_name.clone(),
            currency: currency.to_string(),
            period,
            opening_balance: statement.opening_balance,
            total_credits: statement.total_credits,
            total_debits: statement.total_debits,
            closing_balance: statement.closing_balance,
            lines,
            generated_at: Utc::now(),
        }
    }

    fn money(&self, amount: Decimal) -> String {
        format!("{:.2} {}", amount, self.currency)
    }
}

impl ReportData for StatementReport {
    fn title(&self) -> &str {
        &self.title
    }

    fn headers(&self) -> Vec<String> {
        ["Date", "Transaction", "Type", "Description", "Reference", "Credit", "Debit", "Balance"]
            .iter()
            .map(|h| h.to_string())
            .collect()
    }

    fn rows(&self) -> Vec<Vec<String>> {
        let cell = |amount: Option<Decimal>| amount.map(|a| format!("{:.2}", a)).unwrap_or_default();
        self.lines
            .iter()
            .map(|l| {
                vec![
                    l.date.clone(),
                    l.transaction_id.clone(),
                    l.tx_type.clone(),
                    l.description.clone(),
                    l.reference.clone(),
                    cell(l.credit),
                    cell(l.debit),
                    format!("{:.2}", l.balance),
                ]
            })
            .collect()
    }

    fn summary(&self) -> Vec<(String, String)> {
        vec![
            ("Member".to_string(), format!("{} ({})", self.member_name, self.member_id)),
            ("Period".to_string(), self.period.clone()),
            ("Opening Balance".to_string(), self.money(self.opening_balance)),
            ("Total Credits".to_string(), self.money(self.total_credits)),
            ("Total Debits".to_string(), self.money(self.total_debits)),
            ("Closing Balance".to_string(), self.money(self.closing_balance)),
            ("Generated At".to_string(), self.generated_at.to_rfc3339()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporters::{CsvExporter, ReportExporter};
    use rust_decimal_macros::dec;
    use sacco_core::{MemberProfile, Transaction, TransactionType};

    fn confirmed(tx_type: TransactionType, amount: Decimal, before: Decimal) -> Transaction {
        let mut tx = Transaction::new("MEM_0002", tx_type, amount, "KES", "counter").unwrap();
        tx.complete("MEM_0001", before, Utc::now()).unwrap();
        tx
    }

    #[test]
    fn test_running_balance() {
        let member = Member::approved(
            "MEM_0002",
            "SACCO-2026-0002",
            MemberProfile::new("Alice Wambui", "alice@example.com", "0711000000", "123"),
            Utc::now(),
        );
        let txs = vec![
            confirmed(TransactionType::Deposit, dec!(100), dec!(0)),
            confirmed(TransactionType::Deposit, dec!(50), dec!(100)),
            confirmed(TransactionType::Withdrawal, dec!(30), dec!(150)),
        ];
        let statement = Statement::build("MEM_0002", &txs, None, None);

        let report = StatementReport::new(&member, &statement, "KES");

        assert_eq!(report.lines.len(), 3);
        assert_eq!(report.lines[1].balance, dec!(150));
        assert_eq!(report.lines[2].debit, Some(dec!(30)));
        assert_eq!(report.closing_balance, dec!(120));
        assert_eq!(report.title(), "Statement - Alice Wambui (SACCO-2026-0002)");

        let summary = report.summary();
        assert!(summary.contains(&("Closing Balance".to_string(), "120.00 KES".to_string())));
        assert!(summary.contains(&("Period".to_string(), "all time".to_string())));

        let csv = CsvExporter::new().export(&report);
        assert_eq!(csv.lines().count(), 4);
        assert!(csv.lines().nth(3).unwrap().ends_with(",,30.00,120.00"));
    }
}
