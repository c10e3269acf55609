//! # Notification Module
//!
//! In-app notifications and outbound delivery records (email / SMS).

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outbound delivery gives up after this many attempts
pub const MAX_DELIVERY_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Warning,
    Success,
    Error,
    Reminder,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Info => "info",
            NotificationKind::Warning => "warning",
            NotificationKind::Success => "success",
            NotificationKind::Error => "error",
            NotificationKind::Reminder => "reminder",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" => Some(NotificationKind::Info),
            "warning" => Some(NotificationKind::Warning),
            "success" => Some(NotificationKind::Success),
            "error" => Some(NotificationKind::Error),
            "reminder" => Some(NotificationKind::Reminder),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    Application,
    Investment,
    Loan,
    Payment,
    System,
    General,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::Application => "application",
            NotificationCategory::Investment => "investment",
            NotificationCategory::Loan => "loan",
            NotificationCategory::Payment => "payment",
            NotificationCategory::System => "system",
            NotificationCategory::General => "general",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "application" => Some(NotificationCategory::Application),
            "investment" => Some(NotificationCategory::Investment),
            "loan" => Some(NotificationCategory::Loan),
            "payment" => Some(NotificationCategory::Payment),
            "system" => Some(NotificationCategory::System),
            "general" => Some(NotificationCategory::General),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outbound channel handled by an external gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "email" => Some(Channel::Email),
            "sms" => Some(Channel::Sms),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(DeliveryStatus::Pending),
            "sent" => Some(DeliveryStatus::Sent),
            "failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// In-app notification shown to a member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// NTF_000001, ...
    pub id: String,
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub category: NotificationCategory,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    /// e.g. ("loan", "LOAN_0001")
    pub related_type: Option<String>,
    pub related_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        id: &str,
        recipient_id: &str,
        kind: NotificationKind,
        category: NotificationCategory,
        title: &str,
        message: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            recipient_id: recipient_id.to_string(),
            kind,
            category,
            title: title.to_string(),
            message: message.to_string(),
            is_read: false,
            read_at: None,
            related_type: None,
            related_id: None,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_related(mut self, related_type: &str, related_id: &str) -> Self {
        self.related_type = Some(related_type.to_string());
        self.related_id = Some(related_id.to_string());
        self
    }

    pub fn expires_in(mut self, days: i64) -> Self {
        self.expires_at = Some(self.created_at + Duration::days(days));
        self
    }

    pub fn mark_read(&mut self, at: DateTime<Utc>) {
        if !self.is_read {
            self.is_read = true;
            self.read_at = Some(at);
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|e| e <= now)
    }
}

/// One outbound attempt record per notification and channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    /// DLV_000001, ...
    pub id: String,
    pub notification_id: String,
    pub recipient_id: String,
    pub channel: Channel,
    /// Email address or phone number
    pub destination: String,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Delivery {
    pub fn new(id: &str, notification: &Notification, channel: Channel, destination: &str) -> Self {
        Self {
            id: id.to_string(),
            notification_id: notification.id.clone(),
            recipient_id: notification.recipient_id.clone(),
            channel,
            destination: destination.to_string(),
            status: DeliveryStatus::Pending,
            attempts: 0,
            last_error: None,
            sent_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn can_retry(&self) -> bool {
        self.status != DeliveryStatus::Sent && self.attempts < MAX_DELIVERY_ATTEMPTS
    }

    pub fn record_success(&mut self, at: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_retryable()?;
        self.attempts += 1;
        self.status = DeliveryStatus::Sent;
        self.sent_at = Some(at);
        self.last_error = None;
        Ok(())
    }

    /// Stays pending until the attempt budget is spent
    pub fn record_failure(&mut self, error: &str) -> CoreResult<()> {
        self.ensure_retryable()?;
        self.attempts += 1;
        self.last_error = Some(error.to_string());
        self.status = if self.attempts >= MAX_DELIVERY_ATTEMPTS {
            DeliveryStatus::Failed
        } else {
            DeliveryStatus::Pending
        };
        Ok(())
    }

    fn ensure_retryable(&self) -> CoreResult<()> {
        if !self.can_retry() {
            return Err(CoreError::invalid_transition("Delivery", self.status.as_str(), "attempt"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification() -> Notification {
        Notification::new(
            "NTF_000001",
            "MEM_0002",
            NotificationKind::Success,
            NotificationCategory::Loan,
            "Loan approved",
            "Your loan has been approved",
        )
    }

    #[test]
    fn test_mark_read_keeps_first_timestamp() {
        let mut n = notification();
        let first = Utc::now();
        n.mark_read(first);
        n.mark_read(first + Duration::hours(1));
        assert!(n.is_read);
        assert_eq!(n.read_at, Some(first));
    }

    #[test]
    fn test_expiry() {
        let n = notification().expires_in(7);
        assert!(!n.is_expired(Utc::now()));
        assert!(n.is_expired(Utc::now() + Duration::days(8)));
        assert!(!notification().is_expired(Utc::now() + Duration::days(365)));
    }

    #[test]
    fn test_delivery_gives_up_after_three_attempts() {
        let n = notification();
        let mut d = Delivery::new("DLV_000001", &n, Channel::Email, "jane@example.com");
        d.record_failure("smtp timeout").unwrap();
        d.record_failure("smtp timeout").unwrap();
        assert_eq!(d.status, DeliveryStatus::Pending);
        d.record_failure("smtp timeout").unwrap();
        assert_eq!(d.status, DeliveryStatus::Failed);
        assert!(!d.can_retry());
        assert!(d.record_failure("again").is_err());
    }

    #[test]
    fn test_delivery_success() {
        let n = notification();
        let mut d = Delivery::new("DLV_000002", &n, Channel::Sms, "+254700000001");
        d.record_failure("gateway busy").unwrap();
        d.record_success(Utc::now()).unwrap();
        assert_eq!(d.status, DeliveryStatus::Sent);
        assert_eq!(d.attempts, 2);
        assert!(d.record_success(Utc::now()).is_err());
    }
}
