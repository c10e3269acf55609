//! Loan commands

use anyhow::{bail, Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use sacco_business::{LoanRequest, LoanService};
use sacco_core::{verified_value, CollateralType, CommentKind, Loan, LoanComment, LoanStatus};

use super::{or_dash, print_json, session, truncate};
use crate::config::SaccoConfig;
use crate::{Cli, LoanAction};

pub async fn handle(cli: &Cli, config: &SaccoConfig, action: &LoanAction) -> Result<()> {
    // Pure calculation, no database needed
    if let LoanAction::Terms {
        amount,
        rate,
        months,
    } = action
    {
        let terms = LoanService::calculate_terms(*amount, *rate, *months)?;
        if cli.json {
            return print_json(&terms);
        }
        println!("🧮 {} at {}% over {} months", terms.principal, terms.annual_rate, terms.months);
        println!("   Monthly payment: {}", terms.monthly_payment);
        println!("   Total repayment: {}", terms.total_repayment);
        println!("   Total interest:  {}", terms.total_interest);
        return Ok(());
    }

    let (_db, ctx) = session(config).await?;
    let service = LoanService::new(&ctx);

    match action {
        // Answered above
        LoanAction::Terms { .. } => {}

        LoanAction::Eligibility {
            member_id,
            amount,
            months,
            loan_type,
        } => {
            let result = service
                .check_eligibility(member_id, *amount, *months, loan_type.as_deref())
                .await?;
            if cli.json {
                return print_json(&result);
            }
            if result.eligible {
                println!("✅ {} may borrow {} over {} months", member_id, amount, months);
            } else {
                println!("🚫 {} is not eligible:", member_id);
                for reason in &result.reasons {
                    println!("   - {}", reason);
                }
            }
            println!("   Maximum loan: {}", result.maximum_loan);
        }

        LoanAction::Apply {
            member_id,
            amount,
            months,
            purpose,
            loan_type,
            guarantors,
        } => {
            let mut request = LoanRequest::new(member_id, *amount, *months, purpose);
            if let Some(loan_type) = loan_type {
                request = request.with_loan_type(loan_type);
            }
            for spec in guarantors {
                let (guarantor, percentage) = parse_guarantor(spec)?;
                request = request.with_guarantor(&guarantor, percentage);
            }
            let loan = service.apply_for_loan(request).await?;
            println!("✅ Loan application submitted: {}", loan.id);
            println!("   Amount:  {}", loan.requested_amount);
            println!("   Rate:    {}%", loan.interest_rate);
            println!("   Period:  {} months", loan.period_months);
            if !guarantors.is_empty() {
                println!("   Guarantors have been asked to confirm");
            }
        }

        LoanAction::Guarantee {
            loan_id,
            guarantor_id,
            decline,
        } => {
            let g = if *decline {
                service.decline_guarantee(guarantor_id, loan_id).await?
            } else {
                service.confirm_guarantee(guarantor_id, loan_id).await?
            };
            println!(
                "✅ Guarantee by {} on {} is now {} ({}%)",
                g.guarantor_id,
                g.loan_id,
                g.status.as_str(),
                g.percentage
            );
        }

        LoanAction::Approve {
            loan_id,
            amount,
            rate,
            notes,
        } => {
            let loan = service
                .approve(cli.actor()?, loan_id, *amount, *rate, notes.as_deref())
                .await?;
            println!("✅ Loan {} approved", loan.id);
            println!("   Amount:          {}", loan.principal());
            println!("   Rate:            {}%", loan.interest_rate);
            println!("   Monthly payment: {}", loan.monthly_payment.unwrap_or_default());
            println!("   Total repayment: {}", loan.total_repayment.unwrap_or_default());
        }

        LoanAction::Reject { loan_id, reason } => {
            let loan = service.reject(cli.actor()?, loan_id, reason).await?;
            println!("🚫 Loan {} rejected: {}", loan.id, reason);
        }

        LoanAction::Cancel { loan_id, member_id } => {
            let loan = service.cancel(member_id, loan_id).await?;
            println!("✅ Loan {} cancelled", loan.id);
        }

        LoanAction::Disburse {
            loan_id,
            reference,
            cost,
        } => {
            let loan = service
                .disburse(cli.actor()?, loan_id, reference, *cost)
                .await?;
            println!("💸 Loan {} disbursed", loan.id);
            println!("   Loan number: {}", or_dash(loan.loan_number.as_deref()));
            println!("   Amount:      {}", loan.principal());
            if let Some(first) = loan.schedule.next_due() {
                println!("   First due:   {} ({})", first.due_date, first.scheduled_payment());
            }
        }

        LoanAction::Pay {
            loan_id,
            member_id,
            amount,
            reference,
            method,
        } => {
            let payment = service
                .make_payment(member_id, loan_id, *amount, reference, method.as_deref())
                .await?;
            println!("✅ Payment submitted: {} ({} on {})", payment.id, payment.amount, payment.loan_id);
        }

        LoanAction::ConfirmPayment { payment_id } => {
            let payment = service.confirm_payment(cli.actor()?, payment_id).await?;
            println!("✅ Payment {} confirmed", payment.id);
            for a in &payment.allocations {
                println!(
                    "   #{:<3} penalty {} interest {} principal {}",
                    a.installment, a.penalty, a.interest, a.principal
                );
            }
            let outstanding = service.outstanding(&payment.loan_id).await?;
            println!("   Outstanding on {}: {}", payment.loan_id, outstanding);
        }

        LoanAction::RejectPayment { payment_id, reason } => {
            let payment = service.reject_payment(cli.actor()?, payment_id, reason).await?;
            println!("🚫 Payment {} rejected: {}", payment.id, reason);
        }

        LoanAction::Show { loan_id } => {
            let loan = service.get(loan_id).await?;
            let guarantors = service.guarantors(loan_id).await?;
            print_loan(&loan);
            if !guarantors.is_empty() {
                println!();
                println!("   Guarantors:");
                for g in guarantors {
                    println!("   - {} {}% {}", g.guarantor_id, g.percentage, g.status.as_str());
                }
            }
        }

        LoanAction::Schedule { loan_id } => {
            let schedule = service.schedule(loan_id).await?;
            if cli.json {
                return print_json(&schedule);
            }
            if schedule.is_empty() {
                println!("Loan {} has no schedule until it is disbursed.", loan_id);
                return Ok(());
            }
            println!(
                "{:>3} {:<10} {:>12} {:>10} {:>10} {:>10} {:>12} {:<8}",
                "#", "DUE", "PRINCIPAL", "INTEREST", "PENALTY", "PAID", "BALANCE", "STATUS"
            );
            println!("{}", "-".repeat(84));
            let today = Utc::now().date_naive();
            for i in &schedule.installments {
                let status = if i.is_settled() {
                    "paid"
                } else if i.is_overdue(today) {
                    "overdue"
                } else {
                    "due"
                };
                println!(
                    "{:>3} {:<10} {:>12} {:>10} {:>10} {:>10} {:>12} {:<8}",
                    i.number,
                    i.due_date.to_string(),
                    i.principal.to_string(),
                    i.interest.to_string(),
                    i.penalty.to_string(),
                    i.amount_paid().to_string(),
                    i.ending_balance.to_string(),
                    status
                );
            }
            println!();
            println!("   Outstanding: {}", schedule.outstanding());
        }

        LoanAction::List { status, member } => {
            let loans = match member {
                Some(member_id) => service.list_for_member(member_id).await?,
                None => {
                    let status = match status {
                        Some(s) => Some(
                            LoanStatus::from_str(s)
                                .with_context(|| format!("unknown loan status '{}'", s))?,
                        ),
                        None => None,
                    };
                    service.list(status).await?
                }
            };
            print_loans(&loans);
        }

        LoanAction::Guarantees { member_id } => {
            let pending = service.pending_guarantees(member_id).await?;
            if pending.is_empty() {
                println!("No guarantee requests waiting on {}.", member_id);
            }
            for g in pending {
                let loan = service.get(&g.loan_id).await?;
                println!(
                    "   {} from {}: {}% of {} ({})",
                    g.loan_id,
                    loan.member_id,
                    g.percentage,
                    loan.requested_amount,
                    loan.purpose
                );
            }
        }

        LoanAction::PendingPayments => {
            let payments = service.pending_payments().await?;
            if payments.is_empty() {
                println!("No payments awaiting confirmation.");
            }
            for p in payments {
                println!(
                    "   {} {} {} {} ref {}",
                    p.id, p.loan_id, p.member_id, p.amount, p.reference
                );
            }
        }

        LoanAction::Overdue { as_of } => {
            let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
            let overdue = service.overdue_loans(as_of).await?;
            if overdue.is_empty() {
                println!("No overdue loans as of {}.", as_of);
                return Ok(());
            }
            println!(
                "{:<10} {:<10} {:>6} {:>12} {:>14}",
                "LOAN", "MEMBER", "DAYS", "INSTALLMENTS", "OUTSTANDING"
            );
            println!("{}", "-".repeat(56));
            for o in overdue {
                println!(
                    "{:<10} {:<10} {:>6} {:>12} {:>14}",
                    o.loan.id,
                    o.loan.member_id,
                    o.overdue_days,
                    o.overdue_installments,
                    o.outstanding.to_string()
                );
            }
        }

        LoanAction::AccruePenalties { as_of } => {
            let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
            let accrued = service.accrue_penalties(cli.actor()?, as_of).await?;
            if accrued.is_empty() {
                println!("No new penalties as of {}.", as_of);
                return Ok(());
            }
            let mut total = Decimal::ZERO;
            for a in &accrued {
                println!("   {} ({}): {}", a.loan_id, a.member_id, a.total());
                total += a.total();
            }
            println!("⚠️  {} loans penalised, {} in total", accrued.len(), total);
        }

        LoanAction::WaivePenalty {
            loan_id,
            installment,
        } => {
            let waived = service
                .waive_penalty(cli.actor()?, loan_id, *installment)
                .await?;
            println!("✅ Waived {} on {} installment #{}", waived, loan_id, installment);
        }

        LoanAction::AddCollateral {
            loan_id,
            collateral_type,
            value,
            description,
        } => {
            let kind = CollateralType::from_str(collateral_type)
                .with_context(|| format!("unknown collateral type '{}'", collateral_type))?;
            let collateral = service
                .add_collateral(cli.actor()?, loan_id, kind, description, *value)
                .await?;
            println!("✅ Collateral {} pledged against {} ({} {})", collateral.id, loan_id, kind, value);
        }

        LoanAction::VerifyCollateral {
            collateral_id,
            notes,
        } => {
            let collateral = service
                .verify_collateral(cli.actor()?, collateral_id, notes.as_deref())
                .await?;
            println!("✅ Collateral {} verified", collateral.id);
        }

        LoanAction::Collateral { loan_id } => {
            let pledged = service.collateral(loan_id).await?;
            if cli.json {
                return print_json(&pledged);
            }
            if pledged.is_empty() {
                println!("No collateral pledged.");
                return Ok(());
            }
            println!("{:<9} {:<10} {:>14} {:<9} {:<30}", "ID", "TYPE", "VALUE", "VERIFIED", "DESCRIPTION");
            println!("{}", "-".repeat(76));
            for c in &pledged {
                println!(
                    "{:<9} {:<10} {:>14} {:<9} {:<30}",
                    c.id,
                    c.collateral_type.as_str(),
                    c.estimated_value.to_string(),
                    if c.is_verified { "yes" } else { "no" },
                    truncate(&c.description, 30)
                );
            }
            println!("   Verified value: {}", verified_value(&pledged));
        }

        LoanAction::Comment {
            loan_id,
            body,
            kind,
            private,
            follow_up,
        } => {
            let kind = CommentKind::from_str(kind).with_context(|| format!("unknown comment kind '{}'", kind))?;
            let comment = service
                .add_comment(cli.actor()?, loan_id, kind, body, *private, *follow_up)
                .await?;
            println!("📝 Comment {} added to {}", comment.id, loan_id);
        }

        LoanAction::Comments { loan_id } => {
            let comments = service.comments(cli.actor()?, loan_id).await?;
            if cli.json {
                return print_json(&comments);
            }
            print_comments(&comments);
        }

        LoanAction::ResolveComment { comment_id } => {
            let comment = service.resolve_comment(cli.actor()?, comment_id).await?;
            println!("✅ Comment {} on {} resolved", comment.id, comment.loan_id);
        }

        LoanAction::FollowUps { as_of } => {
            let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
            print_comments(&service.follow_ups(as_of).await?);
        }
    }

    Ok(())
}

/// Parse `MEMBER_ID:PERCENT`
fn parse_guarantor(spec: &str) -> Result<(String, Decimal)> {
    let Some((member, percent)) = spec.split_once(':') else {
        bail!("guarantor must be MEMBER_ID:PERCENT, got '{}'", spec);
    };
    let percent: Decimal = percent
        .trim()
        .trim_end_matches('%')
        .parse()
        .with_context(|| format!("invalid guarantee percentage in '{}'", spec))?;
    Ok((member.trim().to_string(), percent))
}

fn print_loan(loan: &Loan) {
    println!("🏦 Loan {}", loan.id);
    println!("   Number:      {}", or_dash(loan.loan_number.as_deref()));
    println!("   Member:      {}", loan.member_id);
    println!("   Type:        {}", or_dash(loan.loan_type_id.as_deref()));
    println!("   Status:      {}", loan.status);
    println!("   Requested:   {}", loan.requested_amount);
    println!("   Principal:   {}", loan.principal());
    println!("   Rate:        {}%", loan.interest_rate);
    println!("   Period:      {} months", loan.period_months);
    println!("   Purpose:     {}", loan.purpose);
    println!("   Outstanding: {}", loan.outstanding());
    if let Some(reason) = &loan.rejection_reason {
        println!("   Rejected:    {}", reason);
    }
}

fn print_comments(comments: &[LoanComment]) {
    if comments.is_empty() {
        println!("No comments.");
        return;
    }
    for c in comments {
        let follow_up = c
            .follow_up_date
            .map(|d| format!(" follow up {}", d))
            .unwrap_or_default();
        println!(
            "{} {} [{}{}]{}{}",
            c.id,
            c.created_at.format("%Y-%m-%d"),
            c.kind,
            if c.is_private { ", private" } else { "" },
            follow_up,
            if c.is_resolved { " (resolved)" } else { "" }
        );
        println!("   {}: {}", c.created_by, c.body);
    }
}

fn print_loans(loans: &[Loan]) {
    if loans.is_empty() {
        println!("No loans found.");
        return;
    }
    println!(
        "{:<10} {:<14} {:<10} {:<10} {:>12} {:>12} {:<20}",
        "ID", "NUMBER", "MEMBER", "STATUS", "PRINCIPAL", "OUTSTANDING", "PURPOSE"
    );
    println!("{}", "-".repeat(94));
    for loan in loans {
        println!(
            "{:<10} {:<14} {:<10} {:<10} {:>12} {:>12} {:<20}",
            loan.id,
            or_dash(loan.loan_number.as_deref()),
            loan.member_id,
            loan.status.as_str(),
            loan.principal().to_string(),
            loan.outstanding().to_string(),
            truncate(&loan.purpose, 20)
        );
    }
}
