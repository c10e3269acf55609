//! Loan portfolio report
//!
//! One row per loan with its outstanding balance and arrears, plus
//! portfolio-at-risk figures over the active book.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sacco_core::{round_money, Loan, LoanStatus};

use crate::exporters::ReportData;

/// Days past due beyond which a loan counts towards portfolio at risk
pub const PAR_THRESHOLD_DAYS: i64 = 30;

// ============================================================================
// Arrears classification
// ============================================================================

/// Arrears bucket by days past due
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArrearsClass {
    Current,
    /// 1-30 days
    Watch,
    /// 31-90 days
    Substandard,
    /// 91-180 days
    Doubtful,
    Loss,
}

impl ArrearsClass {
    pub fn from_days(overdue_days: i64) -> Self {
        match overdue_days {
            d if d <= 0 => ArrearsClass::Current,
            1..=30 => ArrearsClass::Watch,
            31..=90 => ArrearsClass::Substandard,
            91..=180 => ArrearsClass::Doubtful,
            _ => ArrearsClass::Loss,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArrearsClass::Current => "current",
            ArrearsClass::Watch => "watch",
            ArrearsClass::Substandard => "substandard",
            ArrearsClass::Doubtful => "doubtful",
            ArrearsClass::Loss => "loss",
        }
    }
}

// ============================================================================
// Portfolio Report
// ============================================================================

#[derive(Debug, Clone)]
pub struct PortfolioRow {
    pub loan_id: String,
    pub loan_number: String,
    pub member_id: String,
    pub status: LoanStatus,
    pub principal: Decimal,
    pub outstanding: Decimal,
    pub overdue_days: i64,
    pub overdue_installments: usize,
    pub arrears: ArrearsClass,
}

#[derive(Debug, Clone)]
pub struct LoanPortfolioReport {
    pub title: String,
    pub as_of: NaiveDate,
    pub currency: String,
    pub rows: Vec<PortfolioRow>,
    pub generated_at: DateTime<Utc>,
}

impl LoanPortfolioReport {
    /// Rows keep the order of `loans`
    pub fn generate(loans: &[Loan], as_of: NaiveDate, currency: &str) -> Self {
        let rows = loans
            .iter()
            .map(|loan| {
                let (overdue_days, overdue_installments) = if loan.status.is_active() {
                    (
                        loan.schedule.overdue_days(as_of),
                        loan.schedule.overdue_count(as_of),
                    )
                } else {
                    (0, 0)
                };
                PortfolioRow {
                    loan_id: loan.id.clone(),
                    loan_number: loan.loan_number.clone().unwrap_or_default(),
                    member_id: loan.member_id.clone(),
                    status: loan.status,
                    principal: loan.principal(),
                    outstanding: loan.outstanding(),
                    overdue_days,
                    overdue_installments,
                    arrears: ArrearsClass::from_days(overdue_days),
                }
            })
            .collect();

        Self {
            title: format!("Loan Portfolio as of {}", as_of),
            as_of,
            currency: currency.to_string(),
            rows,
            generated_at: Utc::now(),
        }
    }

    fn active(&self) -> impl Iterator<Item = &PortfolioRow> {
        self.rows.iter().filter(|r| r.status.is_active())
    }

    pub fn total_outstanding(&self) -> Decimal {
        self.active().map(|r| r.outstanding).sum()
    }

    /// Outstanding on active loans more than [`PAR_THRESHOLD_DAYS`] past due
    pub fn at_risk(&self) -> Decimal {
        self.active()
            .filter(|r| r.overdue_days > PAR_THRESHOLD_DAYS)
            .map(|r| r.outstanding)
            .sum()
    }

    /// At-risk share of the active book, in percent
    pub fn par_ratio(&self) -> Decimal {
        let total = self.total_outstanding();
        if total.is_zero() {
            return Decimal::ZERO;
        }
        round_money(self.at_risk() / total * Decimal::ONE_HUNDRED)
    }

    pub fn count_by_status(&self, status: LoanStatus) -> usize {
        self.rows.iter().filter(|r| r.status == status).count()
    }
}

impl ReportData for LoanPortfolioReport {
    fn title(&self) -> &str {
        &self.title
    }

    fn headers(&self) -> Vec<String> {
        [
            "Loan",
            "Loan Number",
            "Member",
            "Status",
            "Principal",
            "Outstanding",
            "Overdue Days",
            "Overdue Installments",
            "Arrears",
        ]
        .iter()
        .map(|h| h.to_string())
        .collect()
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|r| {
                vec![
                    r.loan_id.clone(),
                    r.loan_number.clone(),
                    r.member_id.clone(),
                    r.status.as_str().to_string(),
                    format!("{:.2}", r.principal),
                    format!("{:.2}", r.outstanding),
                    r.overdue_days.to_string(),
                    r.overdue_installments.to_string(),
                    r.arrears.as_str().to_string(),
                ]
            })
            .collect()
    }

    fn summary(&self) -> Vec<(String, String)> {
        let mut summary = vec![("Total Loans".to_string(), self.rows.len().to_string())];
        for status in [
            LoanStatus::Applied,
            LoanStatus::Approved,
            LoanStatus::Disbursed,
            LoanStatus::Repaying,
            LoanStatus::Closed,
        ] {
            summary.push((
                format!("Loans {}", status.as_str()),
                self.count_by_status(status).to_string(),
            ));
        }
        summary.push((
            "Total Outstanding".to_string(),
            format!("{:.2} {}", self.total_outstanding(), self.currency),
        ));
        summary.push((
            format!("At Risk (>{} days)", PAR_THRESHOLD_DAYS),
            format!("{:.2} {}", self.at_risk(), self.currency),
        ));
        summary.push(("Portfolio at Risk".to_string(), format!("{:.2}%", self.par_ratio())));
        summary.push(("Generated At".to_string(), self.generated_at.to_rfc3339()));
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn disbursed(id: &str, days_ago: i64) -> Loan {
        let at = Utc::now() - Duration::days(days_ago);
        let mut loan = Loan::new(id, "MEM_0002", dec!(1200), dec!(0), 12, "working capital").unwrap();
        loan.approve("MEM_0001", dec!(1200), dec!(0), None, at).unwrap();
        loan.disburse("MEM_0001", "LN-2026-0001", "BANK-1", None, at).unwrap();
        loan
    }

    #[test]
    fn test_arrears_buckets() {
        assert_eq!(ArrearsClass::from_days(0), ArrearsClass::Current);
        assert_eq!(ArrearsClass::from_days(30), ArrearsClass::Watch);
        assert_eq!(ArrearsClass::from_days(31), ArrearsClass::Substandard);
        assert_eq!(ArrearsClass::from_days(180), ArrearsClass::Doubtful);
        assert_eq!(ArrearsClass::from_days(181), ArrearsClass::Loss);
    }

    #[test]
    fn test_portfolio_at_risk() {
        let fresh = disbursed("LOAN_0001", 0);
        let late = disbursed("LOAN_0002", 80);
        let applied = Loan::new("LOAN_0003", "MEM_0003", dec!(500), dec!(12), 6, "roof").unwrap();
        let today = Utc::now().date_naive();

        let report = LoanPortfolioReport::generate(&[fresh, late, applied], today, "KES");

        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.rows[0].arrears, ArrearsClass::Current);
        assert!(report.rows[1].overdue_days > PAR_THRESHOLD_DAYS);
        assert!(report.rows[1].overdue_installments >= 2);
        assert_eq!(report.rows[1].arrears, ArrearsClass::Substandard);
        assert_eq!(report.rows[2].overdue_days, 0);

        // Applied loans carry nothing outstanding
        assert_eq!(report.total_outstanding(), dec!(2400));
        assert_eq!(report.at_risk(), dec!(1200));
        assert_eq!(report.par_ratio(), dec!(50));
        assert_eq!(report.count_by_status(LoanStatus::Disbursed), 2);

        let summary = report.summary();
        assert!(summary.contains(&("Portfolio at Risk".to_string(), "50.00%".to_string())));
    }
}
