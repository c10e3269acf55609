//! Notification dispatcher
//!
//! In-app notifications are rows in `notifications`. When the policy has
//! notifications switched on, each configured outbound channel also gets a
//! `Delivery` record that is handed to the [`Notifier`] and retried on
//! failure until it has used up its attempts.

use crate::error::{BusinessError, BusinessResult};
use crate::policy::current_settings;
use crate::services::{load_member, ServiceContext};
use async_trait::async_trait;
use chrono::Utc;
use sacco_core::{
    Channel, Delivery, Member, Notification, NotificationCategory, NotificationKind,
};
use sacco_persistence::{next_id, DeliveryRepo, NotificationRepo};
use thiserror::Error;
use tracing::{debug, info, warn};

/// In-app notifications expire after this many days
pub const NOTIFICATION_TTL_DAYS: i64 = 90;

/// Failure reported by a notifier backend
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("{channel} delivery to {destination} failed: {reason}")]
    Failed {
        channel: String,
        destination: String,
        reason: String,
    },

    #[error("Channel not supported: {0}")]
    Unsupported(String),
}

/// Outbound transport (email gateway, SMS provider, ...)
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn send(
        &self,
        channel: Channel,
        destination: &str,
        title: &str,
        message: &str,
    ) -> Result<(), DeliveryError>;
}

/// Writes every message to the log instead of sending it
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(
        &self,
        channel: Channel,
        destination: &str,
        title: &str,
        message: &str,
    ) -> Result<(), DeliveryError> {
        info!(channel = %channel, destination, title, message, "notification sent");
        Ok(())
    }
}

/// What to tell a member
#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NotificationKind,
    pub category: NotificationCategory,
    pub title: String,
    pub message: String,
    /// e.g. ("loan", "LOAN_0001")
    pub related: Option<(String, String)>,
}

impl Notice {
    pub fn new(
        kind: NotificationKind,
        category: NotificationCategory,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            category,
            title: title.into(),
            message: message.into(),
            related: None,
        }
    }

    pub fn about(mut self, related_type: &str, related_id: &str) -> Self {
        self.related = Some((related_type.to_string(), related_id.to_string()));
        self
    }
}

/// Outcome of a retry sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetryReport {
    pub attempted: usize,
    pub sent: usize,
    /// Deliveries that used their last attempt
    pub failed: usize,
}

/// Notification Service - in-app notifications and outbound deliveries
pub struct NotificationService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> NotificationService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Store an in-app notification and send it on every configured channel
    pub async fn notify(&self, recipient_id: &str, notice: Notice) -> BusinessResult<Notification> {
        let pool = self.ctx.pool();
        let recipient = load_member(pool, recipient_id).await?;
        let settings = current_settings(pool).await?;

        let id = next_id(pool, "notifications", "NTF", 6).await?;
        let mut notification = Notification::new(
            &id,
            recipient_id,
            notice.kind,
            notice.category,
            &notice.title,
            &notice.message,
        )
        .expires_in(NOTIFICATION_TTL_DAYS);
        if let Some((related_type, related_id)) = &notice.related {
            notification = notification.with_related(related_type, related_id);
        }
        NotificationRepo::insert(pool, &notification).await?;
        debug!(notification_id = %id, recipient = recipient_id, "notification stored");

        if settings.send_notifications {
            for channel in self.ctx.channels() {
                let destination = destination_for(&recipient, *channel);
                let delivery_id = next_id(pool, "deliveries", "DLV", 6).await?;
                let mut delivery = Delivery::new(&delivery_id, &notification, *channel, &destination);
                self.attempt(&mut delivery, &notification.title, &notification.message)
                    .await?;
                DeliveryRepo::insert(pool, &delivery).await?;
            }
        }

        Ok(notification)
    }

    /// Like [`notify`](Self::notify), but a failure only logs a warning.
    ///
    /// Used after a business operation has committed, when there is nothing
    /// left to roll back.
    pub async fn notify_quietly(&self, recipient_id: &str, notice: Notice) {
        let title = notice.title.clone();
        if let Err(e) = self.notify(recipient_id, notice).await {
            warn!(recipient = recipient_id, title = %title, error = %e, "notification not stored");
        }
    }

    /// Send straight through the notifier to someone who is not a member yet
    pub async fn send_external(&self, channel: Channel, destination: &str, title: &str, message: &str) -> bool {
        match self.ctx.notifier().send(channel, destination, title, message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(notifier = self.ctx.notifier().name(), error = %e, "external notification failed");
                false
            }
        }
    }

    async fn attempt(&self, delivery: &mut Delivery, title: &str, message: &str) -> BusinessResult<()> {
        let notifier = self.ctx.notifier();
        match notifier
            .send(delivery.channel, &delivery.destination, title, message)
            .await
        {
            Ok(()) => delivery.record_success(Utc::now()).map_err(BusinessError::from)?,
            Err(e) => {
                warn!(
                    notifier = notifier.name(),
                    delivery_id = %delivery.id,
                    attempt = delivery.attempts + 1,
                    error = %e,
                    "delivery failed"
                );
                delivery
                    .record_failure(&e.to_string())
                    .map_err(BusinessError::from)?;
            }
        }
        Ok(())
    }

    /// Retry every pending delivery that still has attempts left
    pub async fn retry_pending(&self) -> BusinessResult<RetryReport> {
        let pool = self.ctx.pool();
        let mut report = RetryReport::default();

        for mut delivery in DeliveryRepo::list_retryable(pool).await? {
            let notification = NotificationRepo::get_by_id(pool, &delivery.notification_id).await?;
            self.attempt(&mut delivery, &notification.title, &notification.message)
                .await?;
            DeliveryRepo::update(pool, &delivery).await?;

            report.attempted += 1;
            match delivery.status {
                sacco_core::DeliveryStatus::Sent => report.sent += 1,
                sacco_core::DeliveryStatus::Failed => report.failed += 1,
                sacco_core::DeliveryStatus::Pending => {}
            }
        }

        if report.attempted > 0 {
            info!(attempted = report.attempted, sent = report.sent, failed = report.failed, "delivery retry sweep");
        }
        Ok(report)
    }

    pub async fn mark_read(&self, recipient_id: &str, notification_id: &str) -> BusinessResult<()> {
        let pool = self.ctx.pool();
        let notification = NotificationRepo::get_by_id(pool, notification_id)
            .await
            .map_err(BusinessError::from)?;
        if notification.recipient_id != recipient_id {
            return Err(BusinessError::permission_denied(recipient_id, "read another member's notification").into());
        }
        NotificationRepo::mark_read(pool, notification_id, Utc::now()).await?;
        Ok(())
    }

    pub async fn mark_all_read(&self, recipient_id: &str) -> BusinessResult<u64> {
        Ok(NotificationRepo::mark_all_read(self.ctx.pool(), recipient_id, Utc::now()).await?)
    }

    pub async fn unread_count(&self, recipient_id: &str) -> BusinessResult<u64> {
        Ok(NotificationRepo::count_unread(self.ctx.pool(), recipient_id).await?)
    }

    /// Newest first
    pub async fn list(&self, recipient_id: &str, unread_only: bool) -> BusinessResult<Vec<Notification>> {
        Ok(NotificationRepo::list_for_recipient(self.ctx.pool(), recipient_id, unread_only).await?)
    }

    pub async fn deliveries(&self, notification_id: &str) -> BusinessResult<Vec<Delivery>> {
        Ok(DeliveryRepo::list_for_notification(self.ctx.pool(), notification_id).await?)
    }

    /// Delete expired notifications; returns how many were removed
    pub async fn cleanup_expired(&self) -> BusinessResult<u64> {
        let removed = NotificationRepo::delete_expired(self.ctx.pool(), Utc::now()).await?;
        if removed > 0 {
            info!(removed, "expired notifications removed");
        }
        Ok(removed)
    }
}

fn destination_for(member: &Member, channel: Channel) -> String {
    match channel {
        Channel::Email => member.profile.email.clone(),
        Channel::Sms => member.profile.phone.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sacco_core::{DeliveryStatus, MemberProfile};
    use sacco_persistence::{init_memory_database, EventStore, MemberRepo};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Fails the first `failures` sends
    struct FlakyNotifier {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn send(&self, channel: Channel, destination: &str, _: &str, _: &str) -> Result<(), DeliveryError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(DeliveryError::Failed {
                    channel: channel.to_string(),
                    destination: destination.to_string(),
                    reason: "gateway timeout".into(),
                });
            }
            Ok(())
        }
    }

    async fn context(failures: usize) -> (ServiceContext, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_memory_database().await.unwrap();
        let profile = MemberProfile::new("Amina Otieno", "amina@example.com", "0722000111", "22334455");
        MemberRepo::insert(&pool, &Member::approved("MEM_0001", "SACCO-2026-0001", profile, Utc::now()))
            .await
            .unwrap();

        let events = Arc::new(EventStore::new(dir.path()).unwrap());
        let notifier = Arc::new(FlakyNotifier {
            failures,
            calls: AtomicUsize::new(0),
        });
        let ctx = ServiceContext::from_parts(pool, events).with_notifier(notifier, vec![Channel::Email]);
        (ctx, dir)
    }

    fn notice() -> Notice {
        Notice::new(
            NotificationKind::Success,
            NotificationCategory::Investment,
            "Investment confirmed",
            "Your share capital of KSh 100 was confirmed",
        )
        .about("investment", "INV_000001")
    }

    #[tokio::test]
    async fn test_notify_and_read() {
        let (ctx, _dir) = context(0).await;
        let service = NotificationService::new(&ctx);

        let n = service.notify("MEM_0001", notice()).await.unwrap();
        assert_eq!(n.id, "NTF_000001");
        assert_eq!(service.unread_count("MEM_0001").await.unwrap(), 1);

        let deliveries = service.deliveries(&n.id).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].status, DeliveryStatus::Sent);

        service.mark_read("MEM_0001", &n.id).await.unwrap();
        assert_eq!(service.unread_count("MEM_0001").await.unwrap(), 0);
        assert_eq!(service.list("MEM_0001", true).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_failed_delivery_retried_until_budget_spent() {
        let (ctx, _dir) = context(10).await;
        let service = NotificationService::new(&ctx);

        let n = service.notify("MEM_0001", notice()).await.unwrap();
        assert_eq!(service.deliveries(&n.id).await.unwrap()[0].attempts, 1);

        let report = service.retry_pending().await.unwrap();
        assert_eq!(report, RetryReport { attempted: 1, sent: 0, failed: 0 });

        let report = service.retry_pending().await.unwrap();
        assert_eq!(report.failed, 1);

        let delivery = &service.deliveries(&n.id).await.unwrap()[0];
        assert_eq!(delivery.status, DeliveryStatus::Failed);
        assert_eq!(delivery.attempts, 3);

        assert_eq!(service.retry_pending().await.unwrap().attempted, 0);
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let (ctx, _dir) = context(1).await;
        let service = NotificationService::new(&ctx);

        let n = service.notify("MEM_0001", notice()).await.unwrap();
        let report = service.retry_pending().await.unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(service.deliveries(&n.id).await.unwrap()[0].status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn test_cannot_read_someone_elses_notification() {
        let (ctx, _dir) = context(0).await;
        let service = NotificationService::new(&ctx);
        let n = service.notify("MEM_0001", notice()).await.unwrap();

        let err = service.mark_read("MEM_0009", &n.id).await.unwrap_err();
        assert_eq!(crate::error::error_kind(&err), crate::error::ErrorKind::Permission);
    }
}
