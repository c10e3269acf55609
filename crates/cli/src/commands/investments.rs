//! Investment commands

use anyhow::{bail, Result};
use sacco_business::{DividendService, InvestmentService, MembershipService, TargetInput, TargetService};
use sacco_core::{Dividend, DividendRates, Investment, InvestmentTarget};
use std::collections::HashMap;

use super::{or_dash, print_json, session, short_date, truncate};
use crate::config::SaccoConfig;
use crate::{Cli, InvestAction};

pub async fn handle(cli: &Cli, config: &SaccoConfig, action: &InvestAction) -> Result<()> {
    let (_db, ctx) = session(config).await?;
    let service = InvestmentService::new(&ctx);

    match action {
        InvestAction::Add {
            member_id,
            category,
            amount,
            reference,
            method,
        } => {
            let inv = service
                .invest(
                    member_id,
                    category.to_core_type(),
                    *amount,
                    reference.as_deref(),
                    method.as_deref(),
                )
                .await?;
            println!("✅ Investment recorded: {}", inv.id);
            println!("   Member:   {}", inv.member_id);
            println!("   Category: {}", inv.category);
            println!("   Amount:   {}", inv.amount);
            println!("   Status:   {}", inv.status);
        }

        InvestAction::Confirm { investment_id } => {
            let inv = service.confirm(cli.actor()?, investment_id).await?;
            println!("✅ Investment {} confirmed ({} {})", inv.id, inv.category, inv.amount);
        }

        InvestAction::Reject {
            investment_id,
            reason,
        } => {
            let inv = service.reject(cli.actor()?, investment_id, reason).await?;
            println!("🚫 Investment {} rejected: {}", inv.id, reason);
        }

        InvestAction::Pending => print_investments(&service.pending().await?),

        InvestAction::List { member_id } => {
            print_investments(&service.list_for_member(member_id).await?)
        }

        InvestAction::Summary { member_id } => {
            let s = service.summary(member_id).await?;
            if cli.json {
                return print_json(&s);
            }
            println!("💰 Investments for {}", s.member_id);
            println!("   Share capital:   {}", s.share_capital);
            println!("   Monthly:         {}", s.monthly_investment);
            println!("   Special deposit: {}", s.special_deposit);
            println!("   Total:           {}", s.total);
            println!("   Loan eligible:   {}", s.loan_eligible);
            println!("   Maximum loan:    {}", s.maximum_loan);
            println!("   Confirmed:       {}", s.confirmed_count);
            println!("   Pending:         {}", s.pending_count);
        }

        InvestAction::Rankings { basis } => {
            let rankings = service.rankings(basis.to_core_type()).await?;
            if rankings.is_empty() {
                println!("No confirmed investments yet.");
                return Ok(());
            }
            let names: HashMap<String, String> = MembershipService::new(&ctx)
                .list_members()
                .await?
                .into_iter()
                .map(|m| (m.id, m.profile.full_name))
                .collect();

            println!("{:>4} {:<10} {:<28} {:>14}", "#", "MEMBER", "NAME", "AMOUNT");
            println!("{}", "-".repeat(60));
            for entry in rankings {
                println!(
                    "{:>4} {:<10} {:<28} {:>14}",
                    entry.position,
                    entry.member_id,
                    names.get(&entry.member_id).map(String::as_str).unwrap_or(""),
                    entry.amount.to_string()
                );
            }
        }

        InvestAction::CalculateDividends {
            year,
            share_rate,
            monthly_rate,
        } => {
            let rates = DividendRates::new(*share_rate, *monthly_rate)?;
            let dividends = DividendService::new(&ctx)
                .calculate_for_year(cli.actor()?, *year, rates)
                .await?;
            if cli.json {
                return print_json(&dividends);
            }
            print_dividends(&dividends);
        }

        InvestAction::PayDividends { year } => {
            let paid = DividendService::new(&ctx).pay(cli.actor()?, *year).await?;
            let total: rust_decimal::Decimal = paid.iter().map(|d| d.total_dividend).sum();
            println!("✅ Paid {} dividends for {} ({} in total)", paid.len(), year, total);
        }

        InvestAction::Dividends { year, member } => {
            let service = DividendService::new(&ctx);
            let dividends = match (year, member) {
                (_, Some(member_id)) => {
                    let mut all = service.for_member(member_id).await?;
                    if let Some(year) = year {
                        all.retain(|d| d.year == *year);
                    }
                    all
                }
                (Some(year), None) => service.for_year(*year).await?,
                (None, None) => bail!("give --year, --member or both"),
            };
            if cli.json {
                return print_json(&dividends);
            }
            print_dividends(&dividends);
        }

        InvestAction::AddTarget {
            name,
            amount,
            start,
            end,
            period,
            member,
            description,
        } => {
            let mut input = TargetInput::new(name, *amount, period.to_core_type(), *start, *end);
            if let Some(member_id) = member {
                input = input.for_member(member_id);
            }
            if let Some(description) = description {
                input = input.with_description(description);
            }
            let target = TargetService::new(&ctx).create(cli.actor()?, input).await?;
            println!("🎯 Target {} set: {} ({} by {})", target.id, target.name, target.target_amount, target.end_date);
        }

        InvestAction::Targets => {
            let targets = TargetService::new(&ctx).list(cli.actor()?).await?;
            if cli.json {
                return print_json(&targets);
            }
            print_targets(&targets);
        }

        InvestAction::RefreshTargets => {
            let achieved = TargetService::new(&ctx).refresh_all().await?;
            println!("✅ Targets refreshed, {} newly achieved", achieved.len());
            for target in achieved {
                println!("   🎉 {} {}", target.id, target.name);
            }
        }

        InvestAction::DeactivateTarget { target_id } => {
            let target = TargetService::new(&ctx).deactivate(cli.actor()?, target_id).await?;
            println!("✅ Target {} deactivated", target.id);
        }
    }

    Ok(())
}

fn print_dividends(dividends: &[Dividend]) {
    if dividends.is_empty() {
        println!("No dividends found.");
        return;
    }
    println!(
        "{:<11} {:<6} {:<10} {:>12} {:>12} {:>12} {:<10}",
        "ID", "YEAR", "MEMBER", "SHARES", "MONTHLY", "DIVIDEND", "STATUS"
    );
    println!("{}", "-".repeat(80));
    for d in dividends {
        println!(
            "{:<11} {:<6} {:<10} {:>12} {:>12} {:>12} {:<10}",
            d.id,
            d.year,
            d.member_id,
            d.share_capital_amount.to_string(),
            d.monthly_investment_amount.to_string(),
            d.total_dividend.to_string(),
            d.status.as_str()
        );
    }
}

fn print_targets(targets: &[InvestmentTarget]) {
    if targets.is_empty() {
        println!("No active targets.");
        return;
    }
    println!(
        "{:<9} {:<24} {:<10} {:>12} {:>12} {:>7} {:<10}",
        "ID", "NAME", "MEMBER", "TARGET", "CURRENT", "PCT", "ENDS"
    );
    println!("{}", "-".repeat(90));
    for t in targets {
        println!(
            "{:<9} {:<24} {:<10} {:>12} {:>12} {:>6}% {:<10}",
            t.id,
            truncate(&t.name, 24),
            or_dash(t.member_id.as_deref()),
            t.target_amount.to_string(),
            t.current_amount.to_string(),
            t.progress_percentage().to_string(),
            t.end_date.to_string()
        );
    }
}

fn print_investments(investments: &[Investment]) {
    if investments.is_empty() {
        println!("No investments found.");
        return;
    }
    println!(
        "{:<11} {:<10} {:<20} {:>12} {:<10} {:<16} {:<10}",
        "ID", "MEMBER", "CATEGORY", "AMOUNT", "STATUS", "REFERENCE", "DATE"
    );
    println!("{}", "-".repeat(96));
    for inv in investments {
        println!(
            "{:<11} {:<10} {:<20} {:>12} {:<10} {:<16} {:<10}",
            inv.id,
            inv.member_id,
            inv.category.as_str(),
            inv.amount.to_string(),
            inv.status.as_str(),
            or_dash(inv.reference.as_deref()),
            short_date(inv.created_at)
        );
    }
}
