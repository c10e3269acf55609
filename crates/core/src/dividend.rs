//! # Dividend Module
//!
//! Yearly dividends on confirmed share capital and monthly investments.
//! Special deposits earn nothing.
//!
//! ```text
//! share_capital_dividend      = share capital held at year end × share rate %
//! monthly_investment_dividend = monthly investments at year end × monthly rate %
//! ```

use crate::error::{CoreError, CoreResult};
use crate::investment::{Investment, InvestmentCategory};
use crate::money::percent_of;
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared dividend rates for a year, as annual percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DividendRates {
    pub share_capital: Decimal,
    pub monthly_investment: Decimal,
}

impl DividendRates {
    pub fn new(share_capital: Decimal, monthly_investment: Decimal) -> CoreResult<Self> {
        for (name, rate) in [("share capital", share_capital), ("monthly investment", monthly_investment)] {
            if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
                return Err(CoreError::ValidationError(format!(
                    "{} dividend rate must be between 0 and 100: {}",
                    name, rate
                )));
            }
        }
        Ok(Self {
            share_capital,
            monthly_investment,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DividendStatus {
    /// Recomputed on every calculation run until paid
    Calculated,
    /// Credited to the member's ledger; terminal
    Paid,
}

impl DividendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DividendStatus::Calculated => "calculated",
            DividendStatus::Paid => "paid",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "calculated" => Some(DividendStatus::Calculated),
            "paid" => Some(DividendStatus::Paid),
            _ => None,
        }
    }
}

impl fmt::Display for DividendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One member's dividend for one year. At most one per (year, member).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dividend {
    /// DIV_000001, ...
    pub id: String,
    pub year: i32,
    pub member_id: String,

    // === Basis ===
    pub share_capital_amount: Decimal,
    pub monthly_investment_amount: Decimal,
    pub rates: DividendRates,

    // === Result ===
    pub share_capital_dividend: Decimal,
    pub monthly_investment_dividend: Decimal,
    pub total_dividend: Decimal,

    pub status: DividendStatus,
    pub calculated_by: String,
    pub calculated_at: DateTime<Utc>,
    pub paid_by: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Ledger credit posted on payment
    pub transaction_id: Option<String>,
}

/// Confirmed share capital and monthly investments held by a member at the
/// end of `year`
pub fn eligible_holdings(member_id: &str, investments: &[Investment], year: i32) -> (Decimal, Decimal) {
    let mut share_capital = Decimal::ZERO;
    let mut monthly = Decimal::ZERO;
    for inv in investments
        .iter()
        .filter(|i| i.member_id == member_id && i.is_confirmed())
        .filter(|i| i.confirmed_at.unwrap_or(i.created_at).year() <= year)
    {
        match inv.category {
            InvestmentCategory::ShareCapital => share_capital += inv.amount,
            InvestmentCategory::MonthlyInvestment => monthly += inv.amount,
            InvestmentCategory::SpecialDeposit => {}
        }
    }
    (share_capital, monthly)
}

impl Dividend {
    /// Dividend owed for `year`, or `None` when it comes to nothing
    pub fn calculate(
        id: &str,
        year: i32,
        member_id: &str,
        investments: &[Investment],
        rates: DividendRates,
        calculated_by: &str,
        at: DateTime<Utc>,
    ) -> Option<Self> {
        let (share_capital, monthly) = eligible_holdings(member_id, investments, year);
        let share_capital_dividend = percent_of(share_capital, rates.share_capital);
        let monthly_investment_dividend = percent_of(monthly, rates.monthly_investment);
        let total = share_capital_dividend + monthly_investment_dividend;
        if total <= Decimal::ZERO {
            return None;
        }

        Some(Self {
            id: id.to_string(),
            year,
            member_id: member_id.to_string(),
            share_capital_amount: share_capital,
            monthly_investment_amount: monthly,
            rates,
            share_capital_dividend,
            monthly_investment_dividend,
            total_dividend: total,
            status: DividendStatus::Calculated,
            calculated_by: calculated_by.to_string(),
            calculated_at: at,
            paid_by: None,
            paid_at: None,
            transaction_id: None,
        })
    }

    pub fn eligible_amount(&self) -> Decimal {
        self.share_capital_amount + self.monthly_investment_amount
    }

    pub fn mark_paid(&mut self, admin_id: &str, transaction_id: &str, at: DateTime<Utc>) -> CoreResult<()> {
        if self.status != DividendStatus::Calculated {
            return Err(CoreError::invalid_transition("Dividend", self.status.as_str(), "pay"));
        }
        self.status = DividendStatus::Paid;
        self.paid_by = Some(admin_id.to_string());
        self.paid_at = Some(at);
        self.transaction_id = Some(transaction_id.to_string());
        Ok(())
    }

    pub fn is_paid(&self) -> bool {
        self.status == DividendStatus::Paid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn confirmed_on(id: &str, category: InvestmentCategory, amount: Decimal, year: i32) -> Investment {
        let mut inv = Investment::new(id, "MEM_0002", category, amount).unwrap();
        inv.confirm("MEM_0001", Utc.with_ymd_and_hms(year, 6, 30, 12, 0, 0).unwrap())
            .unwrap();
        inv
    }

    #[test]
    fn test_rates_bounded() {
        assert!(DividendRates::new(dec!(10), dec!(5)).is_ok());
        assert!(DividendRates::new(dec!(-1), dec!(5)).is_err());
        assert!(DividendRates::new(dec!(10), dec!(101)).is_err());
    }

    #[test]
    fn test_dividend_per_category() {
        let investments = vec![
            confirmed_on("INV_1", InvestmentCategory::ShareCapital, dec!(1000), 2025),
            confirmed_on("INV_2", InvestmentCategory::MonthlyInvestment, dec!(600), 2025),
            confirmed_on("INV_3", InvestmentCategory::SpecialDeposit, dec!(5000), 2025),
            // Next year's contribution does not count yet
            confirmed_on("INV_4", InvestmentCategory::ShareCapital, dec!(400), 2026),
        ];
        let rates = DividendRates::new(dec!(12), dec!(7.5)).unwrap();

        let dividend =
            Dividend::calculate("DIV_000001", 2025, "MEM_0002", &investments, rates, "MEM_0001", Utc::now()).unwrap();
        assert_eq!(dividend.share_capital_amount, dec!(1000));
        assert_eq!(dividend.share_capital_dividend, dec!(120.00));
        assert_eq!(dividend.monthly_investment_dividend, dec!(45.00));
        assert_eq!(dividend.total_dividend, dec!(165.00));
        assert_eq!(dividend.eligible_amount(), dec!(1600));
    }

    #[test]
    fn test_nothing_owed_yields_none() {
        let investments = vec![confirmed_on("INV_1", InvestmentCategory::SpecialDeposit, dec!(900), 2025)];
        let rates = DividendRates::new(dec!(12), dec!(8)).unwrap();
        assert!(Dividend::calculate("DIV_000001", 2025, "MEM_0002", &investments, rates, "MEM_0001", Utc::now())
            .is_none());
    }

    #[test]
    fn test_paid_once() {
        let investments = vec![confirmed_on("INV_1", InvestmentCategory::ShareCapital, dec!(1000), 2025)];
        let rates = DividendRates::new(dec!(10), dec!(0)).unwrap();
        let mut dividend =
            Dividend::calculate("DIV_000001", 2025, "MEM_0002", &investments, rates, "MEM_0001", Utc::now()).unwrap();

        dividend.mark_paid("MEM_0001", "DIV-20260101000000-ABCDEF", Utc::now()).unwrap();
        assert!(dividend.is_paid());
        let err = dividend.mark_paid("MEM_0001", "again", Utc::now()).unwrap_err();
        assert!(err.is_invalid_transition());
    }
}
