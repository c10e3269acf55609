//! Membership commands

use anyhow::{Context, Result};
use sacco_business::{LedgerService, LoanService, MembershipService};
use sacco_core::{ApplicationStatus, MemberProfile, MemberStanding};

use super::{or_dash, session, short_date, truncate};
use crate::config::SaccoConfig;
use crate::{Cli, MemberAction, ProfileArgs};

impl ProfileArgs {
    fn to_profile(&self) -> MemberProfile {
        let mut profile = MemberProfile::new(&self.name, &self.email, &self.phone, &self.id_number);
        if let Some(address) = &self.address {
            profile = profile.with_address(address);
        }
        if let Some(employment) = &self.employment {
            profile = profile.with_employment(employment);
        }
        profile
    }
}

pub async fn handle(cli: &Cli, config: &SaccoConfig, action: &MemberAction) -> Result<()> {
    let (_db, ctx) = session(config).await?;
    let service = MembershipService::new(&ctx);

    match action {
        MemberAction::Apply { profile } => {
            let app = service.submit_application(profile.to_profile()).await?;
            println!("✅ Application submitted: {}", app.id);
            println!("   Name:   {}", app.profile.full_name);
            println!("   Status: {}", app.status);
        }

        MemberAction::Resubmit {
            application_id,
            profile,
        } => {
            let app = service
                .resubmit_application(application_id, profile.to_profile())
                .await?;
            println!("✅ Application {} resubmitted ({})", app.id, app.status);
        }

        MemberAction::Applications { status } => {
            let status = match status {
                Some(s) => Some(
                    ApplicationStatus::from_str(s)
                        .with_context(|| format!("unknown application status '{}'", s))?,
                ),
                None => None,
            };
            let apps = service.list_applications(status).await?;
            if apps.is_empty() {
                println!("No applications found.");
                return Ok(());
            }
            println!(
                "{:<10} {:<24} {:<28} {:<20} {:<10}",
                "ID", "NAME", "EMAIL", "STATUS", "SUBMITTED"
            );
            println!("{}", "-".repeat(96));
            for app in apps {
                println!(
                    "{:<10} {:<24} {:<28} {:<20} {:<10}",
                    app.id,
                    truncate(&app.profile.full_name, 24),
                    truncate(&app.profile.email, 28),
                    app.status.as_str(),
                    short_date(app.created_at)
                );
            }
        }

        MemberAction::Approve {
            application_id,
            notes,
        } => {
            let member = service
                .approve_application(cli.actor()?, application_id, notes.as_deref())
                .await?;
            println!("✅ Application {} approved", application_id);
            println!("   Member ID: {}", member.id);
            println!("   Number:    {}", or_dash(member.member_number.as_deref()));
        }

        MemberAction::Reject {
            application_id,
            reason,
        } => {
            let app = service
                .reject_application(cli.actor()?, application_id, reason)
                .await?;
            println!("🚫 Application {} rejected: {}", app.id, reason);
        }

        MemberAction::RequestInfo {
            application_id,
            required,
        } => {
            let app = service
                .request_more_info(cli.actor()?, application_id, required)
                .await?;
            println!("📨 More information requested for {}: {}", app.id, required);
        }

        MemberAction::RegisterAdmin { profile } => {
            let admin = service
                .register_admin(cli.actor.as_deref(), profile.to_profile())
                .await?;
            println!("✅ Administrator registered: {}", admin.id);
            println!("   Name:   {}", admin.profile.full_name);
            println!("   Number: {}", or_dash(admin.member_number.as_deref()));
        }

        MemberAction::List => {
            let members = service.list_members().await?;
            if members.is_empty() {
                println!("No members found.");
                return Ok(());
            }
            println!(
                "{:<10} {:<18} {:<24} {:<8} {:<10} {:<10}",
                "ID", "NUMBER", "NAME", "ROLE", "STANDING", "JOINED"
            );
            println!("{}", "-".repeat(84));
            for m in members {
                println!(
                    "{:<10} {:<18} {:<24} {:<8} {:<10} {:<10}",
                    m.id,
                    or_dash(m.member_number.as_deref()),
                    truncate(&m.profile.full_name, 24),
                    m.role.as_str(),
                    m.standing.as_str(),
                    m.approved_at.map(short_date).unwrap_or_default()
                );
            }
        }

        MemberAction::Show { member_id } => {
            let member = service.get_member(member_id).await?;
            let balance = LedgerService::new(&ctx).balance_breakdown(member_id).await?;
            let loans = LoanService::new(&ctx).list_for_member(member_id).await?;

            println!("👤 {}", member.display_name());
            println!("   ID:        {}", member.id);
            println!("   Role:      {}", member.role.as_str());
            println!("   KYC:       {}", member.kyc_status.as_str());
            println!("   Standing:  {}", member.standing.as_str());
            println!("   Email:     {}", member.profile.email);
            println!("   Phone:     {}", member.profile.phone);
            println!();
            println!("   Balance:        {}", balance.current_balance);
            println!("   Available:      {}", balance.available_balance);
            println!("   Share capital:  {}", balance.share_capital);
            println!("   Savings:        {}", balance.savings);
            println!("   Loan balance:   {}", balance.loan_balance);
            if !loans.is_empty() {
                println!();
                println!("   Loans:");
                for loan in loans {
                    println!(
                        "   - {} {} {} outstanding {}",
                        loan.id,
                        loan.status,
                        loan.principal(),
                        loan.outstanding()
                    );
                }
            }
        }

        MemberAction::Standing {
            member_id,
            standing,
        } => {
            let standing = MemberStanding::from_str(standing)
                .with_context(|| format!("unknown standing '{}'", standing))?;
            let member = service.set_standing(cli.actor()?, member_id, standing).await?;
            println!("✅ {} is now {}", member.id, member.standing.as_str());
        }
    }

    Ok(())
}
