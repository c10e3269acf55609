//! # Repayment Schedule
//!
//! Amortised (reducing balance) schedule, FIFO payment allocation and
//! late-penalty accrual.
//!
//! Terms for principal `P`, annual rate `R` % and `n` months:
//!
//! ```text
//! r       = R / 100 / 12
//! payment = P·r·(1+r)^n / ((1+r)^n − 1)      (P / n when r = 0)
//! interest_k  = balance_k · r
//! principal_k = payment − interest_k         (last one clears the balance)
//! ```
//!
//! Payments settle the earliest unpaid installment first, and within an
//! installment the penalty, then the interest, then the principal.

use crate::error::{CoreError, CoreResult};
use crate::money::{percent_of, round_money};
use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const MONTHS_PER_YEAR: u32 = 12;

/// Longest repayment period any loan or loan type may carry (30 years)
pub const MAX_REPAYMENT_MONTHS: u32 = 360;

/// Monthly rate as a fraction, from an annual percentage
pub fn monthly_rate(annual_rate_percent: Decimal) -> Decimal {
    annual_rate_percent / Decimal::ONE_HUNDRED / Decimal::from(MONTHS_PER_YEAR)
}

/// Fixed monthly payment, rounded to cents
pub fn monthly_payment(principal: Decimal, annual_rate_percent: Decimal, months: u32) -> CoreResult<Decimal> {
    if months == 0 {
        return Err(CoreError::Schedule("repayment period must be at least one month".into()));
    }
    if months > MAX_REPAYMENT_MONTHS {
        return Err(CoreError::ValidationError(format!(
            "repayment period of {} months exceeds the {} month limit",
            months, MAX_REPAYMENT_MONTHS
        )));
    }
    if principal <= Decimal::ZERO {
        return Err(CoreError::InvalidAmount(format!("principal must be positive: {}", principal)));
    }
    if annual_rate_percent < Decimal::ZERO {
        return Err(CoreError::ValidationError("interest rate cannot be negative".into()));
    }

    let r = monthly_rate(annual_rate_percent);
    if r.is_zero() {
        return Ok(round_money(principal / Decimal::from(months)));
    }

    let overflow = || CoreError::Schedule(format!("payment for {} over {} months overflows", principal, months));
    let mut growth = Decimal::ONE;
    for _ in 0..months {
        growth = growth.checked_mul(Decimal::ONE + r).ok_or_else(overflow)?;
    }
    let numerator = principal
        .checked_mul(r)
        .and_then(|v| v.checked_mul(growth))
        .ok_or_else(overflow)?;
    let payment = numerator.checked_div(growth - Decimal::ONE).ok_or_else(overflow)?;
    Ok(round_money(payment))
}

/// Headline figures for a loan offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub principal: Decimal,
    pub annual_rate: Decimal,
    pub months: u32,
    pub monthly_payment: Decimal,
    /// Sum of all scheduled installments
    pub total_repayment: Decimal,
    pub total_interest: Decimal,
}

impl LoanTerms {
    pub fn calculate(principal: Decimal, annual_rate: Decimal, months: u32) -> CoreResult<Self> {
        let payment = monthly_payment(principal, annual_rate, months)?;
        let splits = amortize(principal, annual_rate, months, payment);
        let total_repayment: Decimal = splits.iter().map(|s| s.principal + s.interest).sum();
        Ok(Self {
            principal,
            annual_rate,
            months,
            monthly_payment: payment,
            total_repayment,
            total_interest: total_repayment - principal,
        })
    }
}

struct Split {
    beginning_balance: Decimal,
    principal: Decimal,
    interest: Decimal,
    ending_balance: Decimal,
}

fn amortize(principal: Decimal, annual_rate: Decimal, months: u32, payment: Decimal) -> Vec<Split> {
    let r = monthly_rate(annual_rate);
    let mut balance = principal;
    let mut splits = Vec::with_capacity(months as usize);

    for k in 1..=months {
        let interest = round_money(balance * r);
        let principal_part = if k == months {
            balance
        } else {
            (payment - interest).min(balance).max(Decimal::ZERO)
        };
        let ending = balance - principal_part;
        splits.push(Split {
            beginning_balance: balance,
            principal: principal_part,
            interest,
            ending_balance: ending,
        });
        balance = ending;
    }
    splits
}

/// One scheduled monthly installment and what has been paid against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    /// 1-based
    pub number: u32,
    pub due_date: NaiveDate,
    pub beginning_balance: Decimal,
    pub principal: Decimal,
    pub interest: Decimal,
    pub ending_balance: Decimal,
    #[serde(default)]
    pub penalty: Decimal,
    #[serde(default)]
    pub penalty_waived: bool,
    #[serde(default)]
    pub penalty_assessed_on: Option<NaiveDate>,
    #[serde(default)]
    pub paid_penalty: Decimal,
    #[serde(default)]
    pub paid_interest: Decimal,
    #[serde(default)]
    pub paid_principal: Decimal,
    #[serde(default)]
    pub paid_date: Option<NaiveDate>,
}

impl Installment {
    /// Principal + interest as scheduled
    pub fn scheduled_payment(&self) -> Decimal {
        self.principal + self.interest
    }

    pub fn penalty_due(&self) -> Decimal {
        if self.penalty_waived {
            Decimal::ZERO
        } else {
            (self.penalty - self.paid_penalty).max(Decimal::ZERO)
        }
    }

    pub fn interest_due(&self) -> Decimal {
        self.interest - self.paid_interest
    }

    pub fn principal_due(&self) -> Decimal {
        self.principal - self.paid_principal
    }

    /// Scheduled principal + interest still unpaid
    pub fn scheduled_unpaid(&self) -> Decimal {
        self.interest_due() + self.principal_due()
    }

    pub fn amount_due(&self) -> Decimal {
        self.penalty_due() + self.scheduled_unpaid()
    }

    pub fn amount_paid(&self) -> Decimal {
        self.paid_penalty + self.paid_interest + self.paid_principal
    }

    pub fn is_settled(&self) -> bool {
        self.amount_due() <= Decimal::ZERO
    }

    pub fn is_overdue(&self, as_of: NaiveDate) -> bool {
        !self.is_settled() && self.due_date < as_of
    }
}

/// How much of a payment went to one installment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub installment: u32,
    pub penalty: Decimal,
    pub interest: Decimal,
    pub principal: Decimal,
}

impl Allocation {
    pub fn total(&self) -> Decimal {
        self.penalty + self.interest + self.principal
    }
}

/// Penalty assessed on one installment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyAccrual {
    pub installment: u32,
    pub amount: Decimal,
    pub assessed_on: NaiveDate,
}

/// Ordered sequence of installments for a disbursed loan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepaymentSchedule {
    pub installments: Vec<Installment>,
}

impl RepaymentSchedule {
    /// Generate the schedule; the first installment falls one month after `start`
    pub fn generate(terms: &LoanTerms, start: NaiveDate) -> CoreResult<Self> {
        let splits = amortize(terms.principal, terms.annual_rate, terms.months, terms.monthly_payment);
        let mut installments = Vec::with_capacity(splits.len());

        for (i, split) in splits.into_iter().enumerate() {
            let number = i as u32 + 1;
            let due_date = start
                .checked_add_months(Months::new(number))
                .ok_or_else(|| CoreError::Schedule(format!("due date overflow for installment {}", number)))?;
            installments.push(Installment {
                number,
                due_date,
                beginning_balance: split.beginning_balance,
                principal: split.principal,
                interest: split.interest,
                ending_balance: split.ending_balance,
                penalty: Decimal::ZERO,
                penalty_waived: false,
                penalty_assessed_on: None,
                paid_penalty: Decimal::ZERO,
                paid_interest: Decimal::ZERO,
                paid_principal: Decimal::ZERO,
                paid_date: None,
            });
        }

        Ok(Self { installments })
    }

    pub fn is_empty(&self) -> bool {
        self.installments.is_empty()
    }

    /// Everything still owed, including unwaived penalties
    pub fn outstanding(&self) -> Decimal {
        self.installments.iter().map(Installment::amount_due).sum()
    }

    pub fn outstanding_principal(&self) -> Decimal {
        self.installments.iter().map(Installment::principal_due).sum()
    }

    pub fn total_paid(&self) -> Decimal {
        self.installments.iter().map(Installment::amount_paid).sum()
    }

    pub fn total_penalties(&self) -> Decimal {
        self.installments
            .iter()
            .filter(|i| !i.penalty_waived)
            .map(|i| i.penalty)
            .sum()
    }

    pub fn is_settled(&self) -> bool {
        !self.installments.is_empty() && self.installments.iter().all(Installment::is_settled)
    }

    pub fn has_payments(&self) -> bool {
        self.total_paid() > Decimal::ZERO
    }

    /// Earliest unsettled installment
    pub fn next_due(&self) -> Option<&Installment> {
        self.installments.iter().find(|i| !i.is_settled())
    }

    /// Days past due of the earliest overdue installment
    pub fn overdue_days(&self, as_of: NaiveDate) -> i64 {
        self.installments
            .iter()
            .find(|i| i.is_overdue(as_of))
            .map(|i| (as_of - i.due_date).num_days())
            .unwrap_or(0)
    }

    pub fn overdue_count(&self, as_of: NaiveDate) -> usize {
        self.installments.iter().filter(|i| i.is_overdue(as_of)).count()
    }

    /// Assess one late penalty per installment overdue beyond the grace period.
    ///
    /// The penalty is `rate_percent` of the installment's unpaid principal and
    /// interest at assessment time. Installments already assessed are skipped.
    pub fn accrue_penalties(
        &mut self,
        as_of: NaiveDate,
        rate_percent: Decimal,
        grace_days: u32,
    ) -> Vec<PenaltyAccrual> {
        let mut accrued = Vec::new();
        if rate_percent <= Decimal::ZERO {
            return accrued;
        }

        for inst in self.installments.iter_mut() {
            if inst.penalty_assessed_on.is_some() || inst.is_settled() {
                continue;
            }
            let late_after = inst
                .due_date
                .checked_add_days(chrono::Days::new(grace_days as u64))
                .unwrap_or(inst.due_date);
            if as_of <= late_after {
                continue;
            }

            let amount = percent_of(inst.scheduled_unpaid(), rate_percent);
            inst.penalty_assessed_on = Some(as_of);
            if amount > Decimal::ZERO {
                inst.penalty = amount;
                accrued.push(PenaltyAccrual {
                    installment: inst.number,
                    amount,
                    assessed_on: as_of,
                });
            }
        }
        accrued
    }

    /// Waive the unpaid penalty of one installment, returning the amount waived
    pub fn waive_penalty(&mut self, number: u32) -> CoreResult<Decimal> {
        let inst = self
            .installments
            .iter_mut()
            .find(|i| i.number == number)
            .ok_or_else(|| CoreError::Schedule(format!("installment {} not found", number)))?;

        let waived = inst.penalty_due();
        if waived <= Decimal::ZERO {
            return Err(CoreError::ValidationError(format!(
                "installment {} has no outstanding penalty",
                number
            )));
        }
        inst.penalty_waived = true;
        Ok(waived)
    }

    /// Apply a payment FIFO across installments.
    ///
    /// Fails with `Overpayment` when `amount` exceeds what is owed; nothing
    /// is changed in that case.
    pub fn apply_payment(&mut self, amount: Decimal, paid_on: NaiveDate) -> CoreResult<Vec<Allocation>> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::InvalidAmount(format!("payment must be positive: {}", amount)));
        }
        let outstanding = self.outstanding();
        if amount > outstanding {
            return Err(CoreError::Overpayment {
                outstanding,
                attempted: amount,
            });
        }

        let mut remaining = amount;
        let mut allocations = Vec::new();

        for inst in self.installments.iter_mut() {
            if remaining <= Decimal::ZERO {
                break;
            }
            if inst.is_settled() {
                continue;
            }

            let penalty = remaining.min(inst.penalty_due());
            inst.paid_penalty += penalty;
            remaining -= penalty;

            let interest = remaining.min(inst.interest_due());
            inst.paid_interest += interest;
            remaining -= interest;

            let principal = remaining.min(inst.principal_due());
            inst.paid_principal += principal;
            remaining -= principal;

            if inst.is_settled() {
                inst.paid_date = Some(paid_on);
            }
            allocations.push(Allocation {
                installment: inst.number,
                penalty,
                interest,
                principal,
            });
        }

        Ok(allocations)
    }

    pub fn to_json(&self) -> CoreResult<String> {
        serde_json::to_string(&self.installments)
            .map_err(|e| CoreError::Schedule(format!("cannot encode schedule: {}", e)))
    }

    pub fn from_json(json: &str) -> CoreResult<Self> {
        let installments = serde_json::from_str(json)
            .map_err(|e| CoreError::Schedule(format!("cannot decode schedule: {}", e)))?;
        Ok(Self { installments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn schedule(principal: Decimal, rate: Decimal, months: u32) -> RepaymentSchedule {
        let terms = LoanTerms::calculate(principal, rate, months).unwrap();
        RepaymentSchedule::generate(&terms, date(2026, 1, 15)).unwrap()
    }

    #[test]
    fn test_monthly_payment_amortised() {
        // 10,000 at 12% over 12 months
        assert_eq!(monthly_payment(dec!(10000), dec!(12), 12).unwrap(), dec!(888.49));
    }

    #[test]
    fn test_monthly_payment_zero_rate() {
        assert_eq!(monthly_payment(dec!(1200), dec!(0), 12).unwrap(), dec!(100));
    }

    #[test]
    fn test_monthly_payment_rejects_bad_input() {
        assert!(monthly_payment(dec!(1000), dec!(12), 0).is_err());
        assert!(monthly_payment(dec!(0), dec!(12), 6).is_err());
        assert!(monthly_payment(dec!(1000), dec!(-1), 6).is_err());
    }

    #[test]
    fn test_long_periods_fail_without_panicking() {
        let err = LoanTerms::calculate(dec!(1000), dec!(100), 2000).unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));

        // 100% a year over 30 years still fits; the payment is nearly pure interest
        let terms = LoanTerms::calculate(dec!(1000), dec!(100), MAX_REPAYMENT_MONTHS).unwrap();
        assert_eq!(terms.monthly_payment, dec!(83.33));

        let err = monthly_payment(Decimal::MAX, dec!(100), MAX_REPAYMENT_MONTHS).unwrap_err();
        assert!(matches!(err, CoreError::Schedule(_)));
    }

    #[test]
    fn test_schedule_clears_principal() {
        let s = schedule(dec!(10000), dec!(12), 12);
        assert_eq!(s.installments.len(), 12);
        assert_eq!(s.installments[0].interest, dec!(100));
        assert_eq!(s.installments[0].principal, dec!(788.49));
        assert_eq!(s.installments[11].ending_balance, Decimal::ZERO);
        assert_eq!(s.outstanding_principal(), dec!(10000));
        assert_eq!(s.installments[0].due_date, date(2026, 2, 15));
        assert_eq!(s.installments[11].due_date, date(2027, 1, 15));
    }

    #[test]
    fn test_terms_total_matches_schedule() {
        let terms = LoanTerms::calculate(dec!(1000), dec!(12), 3).unwrap();
        let s = RepaymentSchedule::generate(&terms, date(2026, 3, 1)).unwrap();
        assert_eq!(terms.total_repayment, s.outstanding());
        assert_eq!(terms.total_interest, terms.total_repayment - dec!(1000));
    }

    #[test]
    fn test_payment_fifo_interest_before_principal() {
        let mut s = schedule(dec!(1000), dec!(12), 2);
        // installment 1: interest 10.00
        let allocs = s.apply_payment(dec!(15), date(2026, 2, 10)).unwrap();
        assert_eq!(allocs.len(), 1);
        assert_eq!(allocs[0].interest, dec!(10));
        assert_eq!(allocs[0].principal, dec!(5));
        assert!(!s.installments[0].is_settled());
    }

    #[test]
    fn test_payment_spills_into_next_installment() {
        let mut s = schedule(dec!(1000), dec!(12), 2);
        let first = s.installments[0].scheduled_payment();
        let allocs = s.apply_payment(first + dec!(20), date(2026, 2, 10)).unwrap();
        assert_eq!(allocs.len(), 2);
        assert!(s.installments[0].is_settled());
        assert_eq!(s.installments[0].paid_date, Some(date(2026, 2, 10)));
        assert_eq!(allocs[1].total(), dec!(20));
    }

    #[test]
    fn test_overpayment_rejected_without_change() {
        let mut s = schedule(dec!(1000), dec!(12), 2);
        let owed = s.outstanding();
        let err = s.apply_payment(owed + dec!(0.01), date(2026, 2, 10)).unwrap_err();
        assert!(matches!(err, CoreError::Overpayment { .. }));
        assert_eq!(s.outstanding(), owed);
        assert!(!s.has_payments());
    }

    #[test]
    fn test_full_payment_settles_schedule() {
        let mut s = schedule(dec!(1000), dec!(12), 3);
        let owed = s.outstanding();
        s.apply_payment(owed, date(2026, 2, 1)).unwrap();
        assert!(s.is_settled());
        assert_eq!(s.outstanding(), Decimal::ZERO);
        assert!(s.next_due().is_none());
    }

    #[test]
    fn test_penalty_accrued_once_and_paid_first() {
        let mut s = schedule(dec!(1000), dec!(12), 2);
        let first_due = s.installments[0].scheduled_payment();

        // not late on the due date itself
        assert!(s.accrue_penalties(date(2026, 2, 15), dec!(5), 0).is_empty());

        let accrued = s.accrue_penalties(date(2026, 2, 20), dec!(5), 0);
        assert_eq!(accrued.len(), 1);
        assert_eq!(accrued[0].amount, percent_of(first_due, dec!(5)));
        assert!(s.accrue_penalties(date(2026, 2, 25), dec!(5), 0).is_empty());

        let allocs = s.apply_payment(dec!(10), date(2026, 2, 25)).unwrap();
        assert_eq!(allocs[0].penalty, accrued[0].amount.min(dec!(10)));
    }

    #[test]
    fn test_grace_days_delay_penalty() {
        let mut s = schedule(dec!(1000), dec!(12), 2);
        assert!(s.accrue_penalties(date(2026, 2, 20), dec!(5), 7).is_empty());
        assert_eq!(s.accrue_penalties(date(2026, 2, 23), dec!(5), 7).len(), 1);
        assert_eq!(s.overdue_days(date(2026, 2, 23)), 8);
    }

    #[test]
    fn test_waive_penalty() {
        let mut s = schedule(dec!(1000), dec!(12), 2);
        s.accrue_penalties(date(2026, 3, 1), dec!(5), 0);
        let before = s.outstanding();
        let waived = s.waive_penalty(1).unwrap();
        assert_eq!(s.outstanding(), before - waived);
        assert!(s.waive_penalty(1).is_err());
        assert!(s.waive_penalty(9).is_err());
    }

    #[test]
    fn test_schedule_json_roundtrip() {
        let s = schedule(dec!(500), dec!(10), 2);
        let json = s.to_json().unwrap();
        assert_eq!(RepaymentSchedule::from_json(&json).unwrap(), s);
    }
}
