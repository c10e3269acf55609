//! Notification commands

use anyhow::Result;
use sacco_business::NotificationService;

use super::{session, short_date, truncate};
use crate::config::SaccoConfig;
use crate::{Cli, NotifyAction};

pub async fn handle(_cli: &Cli, config: &SaccoConfig, action: &NotifyAction) -> Result<()> {
    let (_db, ctx) = session(config).await?;
    let service = NotificationService::new(&ctx);

    match action {
        NotifyAction::List { member_id, unread } => {
            let notifications = service.list(member_id, *unread).await?;
            let unread_count = service.unread_count(member_id).await?;
            println!("🔔 {} notifications for {} ({} unread)", notifications.len(), member_id, unread_count);
            for n in notifications {
                let marker = if n.is_read { " " } else { "•" };
                println!(
                    "{} {:<11} {:<10} {:<8} {:<30} {}",
                    marker,
                    n.id,
                    short_date(n.created_at),
                    n.kind.as_str(),
                    truncate(&n.title, 30),
                    truncate(&n.message, 60)
                );
            }
        }

        NotifyAction::Read {
            member_id,
            notification_id,
        } => {
            service.mark_read(member_id, notification_id).await?;
            println!("✅ {} marked read", notification_id);
        }

        NotifyAction::ReadAll { member_id } => {
            let count = service.mark_all_read(member_id).await?;
            println!("✅ {} notifications marked read", count);
        }

        NotifyAction::Retry => {
            let report = service.retry_pending().await?;
            println!(
                "📨 Retried {} deliveries: {} sent, {} failed for good",
                report.attempted, report.sent, report.failed
            );
        }

        NotifyAction::Cleanup => {
            let removed = service.cleanup_expired().await?;
            println!("🧹 Removed {} expired notifications", removed);
        }
    }

    Ok(())
}
