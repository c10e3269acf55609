//! # Investment Target Module
//!
//! Savings goals over a date window, either for one member or for the whole
//! cooperative. Progress is the sum of investments confirmed inside the
//! window.

use crate::error::{CoreError, CoreResult};
use crate::investment::Investment;
use crate::money::round_money;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetScope {
    Personal,
    SaccoWide,
}

impl TargetScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetScope::Personal => "personal",
            TargetScope::SaccoWide => "sacco_wide",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "personal" => Some(TargetScope::Personal),
            "sacco_wide" | "sacco-wide" | "sacco" => Some(TargetScope::SaccoWide),
            _ => None,
        }
    }
}

impl fmt::Display for TargetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPeriod {
    Monthly,
    Quarterly,
    Annually,
}

impl TargetPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetPeriod::Monthly => "monthly",
            TargetPeriod::Quarterly => "quarterly",
            TargetPeriod::Annually => "annually",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "monthly" => Some(TargetPeriod::Monthly),
            "quarterly" => Some(TargetPeriod::Quarterly),
            "annually" | "annual" | "yearly" => Some(TargetPeriod::Annually),
            _ => None,
        }
    }
}

impl fmt::Display for TargetPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A savings goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentTarget {
    /// TGT_0001, ...
    pub id: String,
    pub scope: TargetScope,
    pub name: String,
    pub description: Option<String>,
    pub target_amount: Decimal,
    pub period: TargetPeriod,
    /// Set for personal targets only
    pub member_id: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Last computed progress
    pub current_amount: Decimal,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvestmentTarget {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: &str,
        scope: TargetScope,
        name: &str,
        target_amount: Decimal,
        period: TargetPeriod,
        member_id: Option<&str>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        created_by: &str,
    ) -> CoreResult<Self> {
        if name.trim().is_empty() {
            return Err(CoreError::ValidationError("target name is required".into()));
        }
        if target_amount <= Decimal::ZERO {
            return Err(CoreError::InvalidAmount(format!(
                "target amount must be positive: {}",
                target_amount
            )));
        }
        if end_date < start_date {
            return Err(CoreError::ValidationError(format!(
                "target window {} .. {} is empty",
                start_date, end_date
            )));
        }
        match (scope, member_id) {
            (TargetScope::Personal, None) => {
                return Err(CoreError::ValidationError("a personal target needs a member".into()))
            }
            (TargetScope::SaccoWide, Some(_)) => {
                return Err(CoreError::ValidationError(
                    "a SACCO-wide target cannot belong to one member".into(),
                ))
            }
            _ => {}
        }

        let now = Utc::now();
        Ok(Self {
            id: id.to_string(),
            scope,
            name: name.trim().to_string(),
            description: None,
            target_amount,
            period,
            member_id: member_id.map(str::to_string),
            start_date,
            end_date,
            current_amount: Decimal::ZERO,
            is_active: true,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Whether an investment counts towards this target
    pub fn counts(&self, inv: &Investment) -> bool {
        if !inv.is_confirmed() {
            return false;
        }
        if let Some(member_id) = &self.member_id {
            if &inv.member_id != member_id {
                return false;
            }
        }
        let day = inv.confirmed_at.unwrap_or(inv.created_at).date_naive();
        day >= self.start_date && day <= self.end_date
    }

    /// Recompute `current_amount`; returns true when the target became achieved
    pub fn refresh(&mut self, investments: &[Investment], at: DateTime<Utc>) -> bool {
        let was_achieved = self.is_achieved();
        self.current_amount = investments
            .iter()
            .filter(|i| self.counts(i))
            .map(|i| i.amount)
            .sum();
        self.updated_at = at;
        !was_achieved && self.is_achieved()
    }

    /// Capped at 100
    pub fn progress_percentage(&self) -> Decimal {
        let pct = round_money(self.current_amount / self.target_amount * Decimal::ONE_HUNDRED);
        pct.min(Decimal::ONE_HUNDRED)
    }

    pub fn remaining_amount(&self) -> Decimal {
        (self.target_amount - self.current_amount).max(Decimal::ZERO)
    }

    pub fn is_achieved(&self) -> bool {
        self.current_amount >= self.target_amount
    }

    pub fn deactivate(&mut self, at: DateTime<Utc>) -> CoreResult<()> {
        if !self.is_active {
            return Err(CoreError::invalid_transition("Target", "inactive", "deactivate"));
        }
        self.is_active = false;
        self.updated_at = at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::investment::InvestmentCategory;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn confirmed(id: &str, member: &str, amount: Decimal, day: u32) -> Investment {
        let mut inv = Investment::new(id, member, InvestmentCategory::MonthlyInvestment, amount).unwrap();
        inv.confirm("MEM_0001", Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0).unwrap())
            .unwrap();
        inv
    }

    fn march(scope: TargetScope, member: Option<&str>) -> InvestmentTarget {
        InvestmentTarget::new(
            "TGT_0001",
            scope,
            "March savings",
            dec!(1000),
            TargetPeriod::Monthly,
            member,
            date(2026, 3, 1),
            date(2026, 3, 31),
            "MEM_0001",
        )
        .unwrap()
    }

    #[test]
    fn test_scope_needs_matching_member() {
        let personal = InvestmentTarget::new(
            "TGT_0001",
            TargetScope::Personal,
            "Goal",
            dec!(100),
            TargetPeriod::Monthly,
            None,
            date(2026, 3, 1),
            date(2026, 3, 31),
            "MEM_0001",
        );
        assert!(personal.is_err());
        let backwards = InvestmentTarget::new(
            "TGT_0001",
            TargetScope::SaccoWide,
            "Goal",
            dec!(100),
            TargetPeriod::Monthly,
            None,
            date(2026, 3, 31),
            date(2026, 3, 1),
            "MEM_0001",
        );
        assert!(backwards.is_err());
    }

    #[test]
    fn test_personal_progress() {
        let mut target = march(TargetScope::Personal, Some("MEM_0002"));
        let investments = vec![
            confirmed("INV_1", "MEM_0002", dec!(400), 5),
            confirmed("INV_2", "MEM_0003", dec!(900), 6),
            Investment::new("INV_3", "MEM_0002", InvestmentCategory::ShareCapital, dec!(500)).unwrap(),
        ];

        assert!(!target.refresh(&investments, Utc::now()));
        assert_eq!(target.current_amount, dec!(400));
        assert_eq!(target.progress_percentage(), dec!(40));
        assert_eq!(target.remaining_amount(), dec!(600));
    }

    #[test]
    fn test_sacco_wide_progress_caps_at_100() {
        let mut target = march(TargetScope::SaccoWide, None);
        let investments = vec![
            confirmed("INV_1", "MEM_0002", dec!(400), 5),
            confirmed("INV_2", "MEM_0003", dec!(900), 6),
        ];

        assert!(target.refresh(&investments, Utc::now()));
        assert!(target.is_achieved());
        assert_eq!(target.progress_percentage(), dec!(100));
        assert_eq!(target.remaining_amount(), Decimal::ZERO);
        // Already achieved, so not reported again
        assert!(!target.refresh(&investments, Utc::now()));
    }
}
