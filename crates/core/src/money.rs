//! # Money Module
//!
//! Currency definition and rounding helpers. All amounts are `Decimal`,
//! rounded to the currency's minor unit only at well-defined points
//! (installment split, penalty, payment terms).

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency used by the cooperative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    /// ISO code (KES, UGX, ...)
    pub code: String,
    /// Display name
    pub name: String,
    /// Minor unit digits
    pub decimals: u8,
    /// Display symbol
    pub symbol: String,
}

impl Currency {
    pub fn new(code: &str, name: &str, decimals: u8, symbol: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            decimals,
            symbol: symbol.to_string(),
        }
    }

    /// Kenyan Shilling, the default ledger currency
    pub fn kes() -> Self {
        Self::new("KES", "Kenyan Shilling", 2, "KSh")
    }

    /// Round an amount to this currency's minor unit
    pub fn round(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.decimals as u32, RoundingStrategy::MidpointNearestEven)
    }

    /// Format an amount with the currency symbol
    pub fn format(&self, amount: Decimal) -> String {
        format!("{} {}", self.symbol, self.round(amount))
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::kes()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

/// Round to two decimal places (cents)
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Percentage of an amount, rounded to cents
pub fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    round_money(amount * percent / Decimal::ONE_HUNDRED)
}
