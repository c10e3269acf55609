//! # Investment Module
//!
//! Member contributions across categories, their confirmation state,
//! per-member summaries and the ranking query.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Investment category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentCategory {
    /// One-off capital up to the policy limit
    ShareCapital,
    /// Recurring monthly savings
    MonthlyInvestment,
    /// Ad-hoc deposits, not counted towards loan eligibility
    SpecialDeposit,
}

impl InvestmentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentCategory::ShareCapital => "share_capital",
            InvestmentCategory::MonthlyInvestment => "monthly_investment",
            InvestmentCategory::SpecialDeposit => "special_deposit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "share_capital" | "share" => Some(InvestmentCategory::ShareCapital),
            "monthly_investment" | "monthly" => Some(InvestmentCategory::MonthlyInvestment),
            "special_deposit" | "special" => Some(InvestmentCategory::SpecialDeposit),
            _ => None,
        }
    }

    /// Counts towards the investment-based loan limit
    pub fn is_loan_eligible(&self) -> bool {
        matches!(
            self,
            InvestmentCategory::ShareCapital | InvestmentCategory::MonthlyInvestment
        )
    }

    pub fn all() -> [InvestmentCategory; 3] {
        [
            InvestmentCategory::ShareCapital,
            InvestmentCategory::MonthlyInvestment,
            InvestmentCategory::SpecialDeposit,
        ]
    }
}

impl fmt::Display for InvestmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestmentStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl InvestmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentStatus::Pending => "pending",
            InvestmentStatus::Confirmed => "confirmed",
            InvestmentStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(InvestmentStatus::Pending),
            "confirmed" => Some(InvestmentStatus::Confirmed),
            "rejected" => Some(InvestmentStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for InvestmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single contribution by a member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investment {
    /// INV_000001, ...
    pub id: String,
    pub member_id: String,
    pub category: InvestmentCategory,
    pub amount: Decimal,
    /// Receipt / M-Pesa code supplied by the member
    pub reference: Option<String>,
    pub payment_method: Option<String>,
    pub status: InvestmentStatus,
    pub notes: Option<String>,
    pub confirmed_by: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Investment {
    pub fn new(id: &str, member_id: &str, category: InvestmentCategory, amount: Decimal) -> CoreResult<Self> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::InvalidAmount(format!(
                "investment amount must be positive: {}",
                amount
            )));
        }
        Ok(Self {
            id: id.to_string(),
            member_id: member_id.to_string(),
            category,
            amount,
            reference: None,
            payment_method: None,
            status: InvestmentStatus::Pending,
            notes: None,
            confirmed_by: None,
            confirmed_at: None,
            created_at: Utc::now(),
        })
    }

    pub fn with_reference(mut self, reference: &str) -> Self {
        self.reference = Some(reference.to_string());
        self
    }

    pub fn with_payment_method(mut self, method: &str) -> Self {
        self.payment_method = Some(method.to_string());
        self
    }

    pub fn confirm(&mut self, admin_id: &str, at: DateTime<Utc>) -> CoreResult<()> {
        if self.status != InvestmentStatus::Pending {
            return Err(CoreError::invalid_transition("Investment", self.status.as_str(), "confirm"));
        }
        self.status = InvestmentStatus::Confirmed;
        self.confirmed_by = Some(admin_id.to_string());
        self.confirmed_at = Some(at);
        Ok(())
    }

    pub fn reject(&mut self, admin_id: &str, reason: &str, at: DateTime<Utc>) -> CoreResult<()> {
        if self.status != InvestmentStatus::Pending {
            return Err(CoreError::invalid_transition("Investment", self.status.as_str(), "reject"));
        }
        self.status = InvestmentStatus::Rejected;
        self.notes = Some(reason.to_string());
        self.confirmed_by = Some(admin_id.to_string());
        self.confirmed_at = Some(at);
        Ok(())
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == InvestmentStatus::Confirmed
    }
}

/// Confirmed totals for one member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvestmentSummary {
    pub member_id: String,
    pub share_capital: Decimal,
    pub monthly_investment: Decimal,
    pub special_deposit: Decimal,
    pub total: Decimal,
    /// Share capital + monthly investments
    pub loan_eligible: Decimal,
    /// loan_eligible × loan multiplier
    pub maximum_loan: Decimal,
    pub confirmed_count: usize,
    pub pending_count: usize,
    pub first_investment_at: Option<DateTime<Utc>>,
    pub last_investment_at: Option<DateTime<Utc>>,
}

impl InvestmentSummary {
    /// Build from a member's investments; only confirmed ones count
    pub fn from_investments(member_id: &str, investments: &[Investment], loan_multiplier: Decimal) -> Self {
        let mut summary = Self {
            member_id: member_id.to_string(),
            ..Default::default()
        };

        for inv in investments.iter().filter(|i| i.member_id == member_id) {
            match inv.status {
                InvestmentStatus::Pending => summary.pending_count += 1,
                InvestmentStatus::Rejected => {}
                InvestmentStatus::Confirmed => {
                    summary.confirmed_count += 1;
                    match inv.category {
                        InvestmentCategory::ShareCapital => summary.share_capital += inv.amount,
                        InvestmentCategory::MonthlyInvestment => {
                            summary.monthly_investment += inv.amount
                        }
                        InvestmentCategory::SpecialDeposit => summary.special_deposit += inv.amount,
                    }
                    let at = inv.confirmed_at.unwrap_or(inv.created_at);
                    summary.first_investment_at = Some(summary.first_investment_at.map_or(at, |f| f.min(at)));
                    summary.last_investment_at = Some(summary.last_investment_at.map_or(at, |l| l.max(at)));
                }
            }
        }

        summary.total = summary.share_capital + summary.monthly_investment + summary.special_deposit;
        summary.loan_eligible = summary.share_capital + summary.monthly_investment;
        summary.maximum_loan = summary.loan_eligible * loan_multiplier;
        summary
    }

    pub fn total_for(&self, category: InvestmentCategory) -> Decimal {
        match category {
            InvestmentCategory::ShareCapital => self.share_capital,
            InvestmentCategory::MonthlyInvestment => self.monthly_investment,
            InvestmentCategory::SpecialDeposit => self.special_deposit,
        }
    }
}

/// What the ranking sums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingBasis {
    Total,
    ShareCapital,
}

impl RankingBasis {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankingBasis::Total => "total",
            RankingBasis::ShareCapital => "share_capital",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "total" | "all" => Some(RankingBasis::Total),
            "share_capital" | "share-capital" | "shares" => Some(RankingBasis::ShareCapital),
            _ => None,
        }
    }

    fn counts(&self, category: InvestmentCategory) -> bool {
        match self {
            RankingBasis::Total => true,
            RankingBasis::ShareCapital => category == InvestmentCategory::ShareCapital,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    /// 1-based
    pub position: usize,
    pub member_id: String,
    pub amount: Decimal,
}

/// Rank members by confirmed investments.
///
/// Sorted by amount descending, ties broken by member id ascending so the
/// order is deterministic. Members with nothing confirmed are omitted.
pub fn rank_members(investments: &[Investment], basis: RankingBasis) -> Vec<RankingEntry> {
    let mut totals: BTreeMap<&str, Decimal> = BTreeMap::new();
    for inv in investments
        .iter()
        .filter(|i| i.is_confirmed() && basis.counts(i.category))
    {
        *totals.entry(inv.member_id.as_str()).or_insert(Decimal::ZERO) += inv.amount;
    }

    let mut ranked: Vec<(&str, Decimal)> = totals
        .into_iter()
        .filter(|(_, amount)| *amount > Decimal::ZERO)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    ranked
        .into_iter()
        .enumerate()
        .map(|(i, (member_id, amount))| RankingEntry {
            position: i + 1,
            member_id: member_id.to_string(),
            amount,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn confirmed(id: &str, member: &str, category: InvestmentCategory, amount: Decimal) -> Investment {
        let mut inv = Investment::new(id, member, category, amount).unwrap();
        inv.confirm("MEM_0001", Utc::now()).unwrap();
        inv
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!(InvestmentCategory::from_str("share"), Some(InvestmentCategory::ShareCapital));
        assert_eq!(
            InvestmentCategory::from_str("monthly_investment"),
            Some(InvestmentCategory::MonthlyInvestment)
        );
        assert!(!InvestmentCategory::SpecialDeposit.is_loan_eligible());
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        assert!(Investment::new("INV_1", "MEM_1", InvestmentCategory::ShareCapital, dec!(0)).is_err());
        assert!(Investment::new("INV_1", "MEM_1", InvestmentCategory::ShareCapital, dec!(-5)).is_err());
    }

    #[test]
    fn test_confirm_only_from_pending() {
        let mut inv = confirmed("INV_1", "MEM_2", InvestmentCategory::ShareCapital, dec!(100));
        assert!(inv.confirm("MEM_1", Utc::now()).unwrap_err().is_invalid_transition());
        assert!(inv.reject("MEM_1", "late", Utc::now()).is_err());
    }

    #[test]
    fn test_summary_totals_and_loan_limit() {
        let mut pending = Investment::new("INV_4", "MEM_2", InvestmentCategory::ShareCapital, dec!(999)).unwrap();
        pending.reference = Some("QWE123".into());
        let investments = vec![
            confirmed("INV_1", "MEM_2", InvestmentCategory::ShareCapital, dec!(1000)),
            confirmed("INV_2", "MEM_2", InvestmentCategory::MonthlyInvestment, dec!(500)),
            confirmed("INV_3", "MEM_2", InvestmentCategory::SpecialDeposit, dec!(250)),
            pending,
        ];

        let summary = InvestmentSummary::from_investments("MEM_2", &investments, dec!(3));
        assert_eq!(summary.total, dec!(1750));
        assert_eq!(summary.loan_eligible, dec!(1500));
        assert_eq!(summary.maximum_loan, dec!(4500));
        assert_eq!(summary.confirmed_count, 3);
        assert_eq!(summary.pending_count, 1);
    }

    #[test]
    fn test_ranking_descending_with_stable_ties() {
        let investments = vec![
            confirmed("INV_1", "MEM_0003", InvestmentCategory::ShareCapital, dec!(100)),
            confirmed("INV_2", "MEM_0003", InvestmentCategory::MonthlyInvestment, dec!(50)),
            confirmed("INV_3", "MEM_0002", InvestmentCategory::ShareCapital, dec!(150)),
            confirmed("INV_4", "MEM_0004", InvestmentCategory::MonthlyInvestment, dec!(400)),
        ];

        let ranking = rank_members(&investments, RankingBasis::Total);
        let order: Vec<_> = ranking.iter().map(|r| r.member_id.as_str()).collect();
        assert_eq!(order, vec!["MEM_0004", "MEM_0002", "MEM_0003"]);
        assert_eq!(ranking[1].amount, dec!(150));
        assert_eq!(ranking[2].amount, dec!(150));
        assert_eq!(ranking[2].position, 3);

        let by_share = rank_members(&investments, RankingBasis::ShareCapital);
        assert_eq!(by_share.len(), 2);
        assert_eq!(by_share[0].member_id, "MEM_0002");
    }
}
