//! Yearly dividend register

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sacco_core::Dividend;

use crate::exporters::ReportData;

#[derive(Debug, Clone)]
pub struct DividendReport {
    pub title: String,
    pub year: i32,
    pub currency: String,
    pub dividends: Vec<Dividend>,
    pub generated_at: DateTime<Utc>,
}

impl DividendReport {
    pub fn new(year: i32, mut dividends: Vec<Dividend>, currency: &str) -> Self {
        dividends.sort_by(|a, b| a.member_id.cmp(&b.member_id));
        Self {
            title: format!("Dividends {}", year),
            year,
            currency: currency.to_string(),
            dividends,
            generated_at: Utc::now(),
        }
    }

    pub fn total(&self) -> Decimal {
        self.dividends.iter().map(|d| d.total_dividend).sum()
    }

    pub fn total_paid(&self) -> Decimal {
        self.dividends
            .iter()
            .filter(|d| d.is_paid())
            .map(|d| d.total_dividend)
            .sum()
    }
}

impl ReportData for DividendReport {
    fn title(&self) -> &str {
        &self.title
    }

    fn headers(&self) -> Vec<String> {
        [
            "Member",
            "Share Capital",
            "Share Dividend",
            "Monthly Investments",
            "Monthly Dividend",
            "Total",
            "Status",
        ]
        .iter()
        .map(|h| h.to_string())
        .collect()
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.dividends
            .iter()
            .map(|d| {
                vec![
                    d.member_id.clone(),
                    format!("{:.2}", d.share_capital_amount),
                    format!("{:.2}", d.share_capital_dividend),
                    format!("{:.2}", d.monthly_investment_amount),
                    format!("{:.2}", d.monthly_investment_dividend),
                    format!("{:.2}", d.total_dividend),
                    d.status.as_str().to_string(),
                ]
            })
            .collect()
    }

    fn summary(&self) -> Vec<(String, String)> {
        let mut summary = vec![("Year".to_string(), self.year.to_string())];
        if let Some(first) = self.dividends.first() {
            summary.push((
                "Rates".to_string(),
                format!(
                    "{}% share capital, {}% monthly",
                    first.rates.share_capital, first.rates.monthly_investment
                ),
            ));
        }
        summary.extend([
            ("Members".to_string(), self.dividends.len().to_string()),
            ("Total".to_string(), format!("{:.2} {}", self.total(), self.currency)),
            ("Paid".to_string(), format!("{:.2} {}", self.total_paid(), self.currency)),
            ("Generated At".to_string(), self.generated_at.to_rfc3339()),
        ]);
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporters::{CsvExporter, ReportExporter};
    use rust_decimal_macros::dec;
    use sacco_core::{DividendRates, Investment, InvestmentCategory};

    fn dividend(id: &str, member_id: &str, shares: Decimal) -> Dividend {
        let mut inv = Investment::new("INV_000001", member_id, InvestmentCategory::ShareCapital, shares).unwrap();
        inv.confirm("MEM_0001", Utc::now()).unwrap();
        let year = chrono::Datelike::year(&Utc::now());
        let rates = DividendRates::new(dec!(10), dec!(5)).unwrap();
        Dividend::calculate(id, year, member_id, &[inv], rates, "MEM_0001", Utc::now()).unwrap()
    }

    #[test]
    fn test_dividend_register() {
        let mut paid = dividend("DIV_000001", "MEM_0003", dec!(2000));
        paid.mark_paid("MEM_0001", "DIV-20260101000000-ABC123", Utc::now()).unwrap();
        let unpaid = dividend("DIV_000002", "MEM_0002", dec!(1000));
        let report = DividendReport::new(2026, vec![paid, unpaid], "KES");

        assert_eq!(report.total(), dec!(300));
        assert_eq!(report.total_paid(), dec!(200));
        let rows = report.rows();
        assert_eq!(rows[0][0], "MEM_0002");
        assert_eq!(rows[0][5], "100.00");
        assert_eq!(rows[1][6], "paid");

        let csv = CsvExporter::new().without_header().export(&report);
        assert!(csv.lines().next().unwrap().starts_with("MEM_0002,1000.00,100.00"));
    }
}
