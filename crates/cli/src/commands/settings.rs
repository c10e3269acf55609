//! Policy settings and loan type commands

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use sacco_business::{LoanTypeInput, PolicyService};
use sacco_core::PolicySettings;

use super::{or_dash, print_json, session};
use crate::config::SaccoConfig;
use crate::{Cli, SettingsAction};

pub async fn handle(cli: &Cli, config: &SaccoConfig, action: &SettingsAction) -> Result<()> {
    let (_db, ctx) = session(config).await?;
    let policy = PolicyService::new(&ctx);

    match action {
        SettingsAction::Show => {
            let settings = policy.settings().await?;
            if cli.json {
                return print_json(&settings);
            }
            println!("⚙️  Policy for {}", settings.sacco_name);
            for (key, value) in describe(&settings) {
                println!("   {:<36} {}", key, value);
            }
            if let (Some(by), Some(at)) = (&settings.updated_by, settings.updated_at) {
                println!();
                println!("   Last updated by {} at {}", by, at.to_rfc3339());
            }
        }

        SettingsAction::Set { key, value } => {
            let mut settings = policy.settings().await?;
            apply_setting(&mut settings, key, value)?;
            policy.update_settings(cli.actor()?, settings).await?;
            println!("✅ {} = {}", key, value);
        }

        SettingsAction::LoanTypes { active_only } => {
            let types = policy.loan_types(*active_only).await?;
            if types.is_empty() {
                println!("No loan types defined.");
                return Ok(());
            }
            println!(
                "{:<8} {:<20} {:>7} {:>12} {:>7} {:>7} {:<10} {:<8}",
                "ID", "NAME", "RATE", "MAX AMOUNT", "MONTHS", "TENURE", "GUARANTOR", "ACTIVE"
            );
            println!("{}", "-".repeat(88));
            for t in types {
                println!(
                    "{:<8} {:<20} {:>7} {:>12} {:>7} {:>7} {:<10} {:<8}",
                    t.id,
                    t.name,
                    format!("{}%", t.interest_rate),
                    t.maximum_amount.to_string(),
                    t.maximum_period_months,
                    t.minimum_membership_months,
                    if t.requires_guarantor { "yes" } else { "no" },
                    if t.is_active { "yes" } else { "no" }
                );
            }
        }

        SettingsAction::AddLoanType {
            name,
            rate,
            max_amount,
            max_months,
            description,
            min_membership_months,
            no_guarantor,
        } => {
            let mut input = LoanTypeInput::new(name, *rate, *max_amount, *max_months)
                .with_minimum_membership(*min_membership_months);
            if let Some(description) = description {
                input = input.with_description(description);
            }
            if *no_guarantor {
                input = input.without_guarantor();
            }
            let loan_type = policy.create_loan_type(cli.actor()?, input).await?;
            println!("✅ Loan type created: {} ({})", loan_type.id, loan_type.name);
            println!("   Description: {}", or_dash(loan_type.description.as_deref()));
        }

        SettingsAction::ToggleLoanType { loan_type_id } => {
            let loan_type = policy.toggle_loan_type(cli.actor()?, loan_type_id).await?;
            let state = if loan_type.is_active { "active" } else { "inactive" };
            println!("✅ Loan type {} is now {}", loan_type.id, state);
        }
    }

    Ok(())
}

fn describe(s: &PolicySettings) -> Vec<(&'static str, String)> {
    vec![
        ("sacco_name", s.sacco_name.clone()),
        ("currency", s.currency.clone()),
        ("minimum_membership_months", s.minimum_membership_months.to_string()),
        ("share_capital_amount", s.share_capital_amount.to_string()),
        ("minimum_monthly_investment", s.minimum_monthly_investment.to_string()),
        ("allow_multiple_monthly_investments", s.allow_multiple_monthly_investments.to_string()),
        ("auto_approve_deposits", s.auto_approve_deposits.to_string()),
        ("loan_multiplier", s.loan_multiplier.to_string()),
        ("default_interest_rate", s.default_interest_rate.to_string()),
        ("maximum_loan_period_months", s.maximum_loan_period_months.to_string()),
        ("require_guarantors", s.require_guarantors.to_string()),
        ("minimum_guarantor_percentage", s.minimum_guarantor_percentage.to_string()),
        ("late_penalty_rate", s.late_penalty_rate.to_string()),
        ("penalty_grace_days", s.penalty_grace_days.to_string()),
        ("send_notifications", s.send_notifications.to_string()),
    ]
}

/// Set one named field from its textual value; range checks happen on save
fn apply_setting(s: &mut PolicySettings, key: &str, value: &str) -> Result<()> {
    fn decimal(key: &str, value: &str) -> Result<Decimal> {
        value
            .parse()
            .with_context(|| format!("{} expects a number, got '{}'", key, value))
    }
    fn whole(key: &str, value: &str) -> Result<u32> {
        value
            .parse()
            .with_context(|| format!("{} expects a whole number, got '{}'", key, value))
    }
    fn flag(key: &str, value: &str) -> Result<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => bail!("{} expects true or false, got '{}'", key, value),
        }
    }

    match key {
        "sacco_name" => s.sacco_name = value.to_string(),
        "currency" => s.currency = value.to_uppercase(),
        "minimum_membership_months" => s.minimum_membership_months = whole(key, value)?,
        "share_capital_amount" => s.share_capital_amount = decimal(key, value)?,
        "minimum_monthly_investment" => s.minimum_monthly_investment = decimal(key, value)?,
        "allow_multiple_monthly_investments" => {
            s.allow_multiple_monthly_investments = flag(key, value)?
        }
        "auto_approve_deposits" => s.auto_approve_deposits = flag(key, value)?,
        "loan_multiplier" => s.loan_multiplier = decimal(key, value)?,
        "default_interest_rate" => s.default_interest_rate = decimal(key, value)?,
        "maximum_loan_period_months" => s.maximum_loan_period_months = whole(key, value)?,
        "require_guarantors" => s.require_guarantors = flag(key, value)?,
        "minimum_guarantor_percentage" => s.minimum_guarantor_percentage = decimal(key, value)?,
        "late_penalty_rate" => s.late_penalty_rate = decimal(key, value)?,
        "penalty_grace_days" => s.penalty_grace_days = whole(key, value)?,
        "send_notifications" => s.send_notifications = flag(key, value)?,
        _ => bail!("unknown setting '{}'", key),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_apply_setting() {
        let mut s = PolicySettings::default();

        apply_setting(&mut s, "loan_multiplier", "2.5").unwrap();
        apply_setting(&mut s, "penalty_grace_days", "7").unwrap();
        apply_setting(&mut s, "auto_approve_deposits", "yes").unwrap();
        apply_setting(&mut s, "currency", "ugx").unwrap();

        assert_eq!(s.loan_multiplier, dec!(2.5));
        assert_eq!(s.penalty_grace_days, 7);
        assert!(s.auto_approve_deposits);
        assert_eq!(s.currency, "UGX");
    }

    #[test]
    fn test_apply_setting_rejects_bad_input() {
        let mut s = PolicySettings::default();

        assert!(apply_setting(&mut s, "loan_multiplier", "lots").is_err());
        assert!(apply_setting(&mut s, "penalty_grace_days", "-1").is_err());
        assert!(apply_setting(&mut s, "send_notifications", "maybe").is_err());
        assert!(apply_setting(&mut s, "colour", "blue").is_err());
        assert_eq!(s, PolicySettings::default());
    }

    #[test]
    fn test_describe_covers_every_setting() {
        let s = PolicySettings::default();
        for (key, value) in describe(&s) {
            let mut copy = s.clone();
            apply_setting(&mut copy, key, &value).unwrap();
        }
    }
}
