//! # Loan Comment Module
//!
//! Officer notes on a loan. Private notes are visible to admins only; a
//! note with a follow-up date stays open until resolved.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    General,
    PaymentReminder,
    FollowUp,
    Collection,
    System,
}

impl CommentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentKind::General => "general",
            CommentKind::PaymentReminder => "payment_reminder",
            CommentKind::FollowUp => "follow_up",
            CommentKind::Collection => "collection",
            CommentKind::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "general" => Some(CommentKind::General),
            "payment_reminder" | "reminder" => Some(CommentKind::PaymentReminder),
            "follow_up" => Some(CommentKind::FollowUp),
            "collection" => Some(CommentKind::Collection),
            "system" => Some(CommentKind::System),
            _ => None,
        }
    }
}

impl fmt::Display for CommentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanComment {
    /// CMT_000001, ...
    pub id: String,
    pub loan_id: String,
    pub kind: CommentKind,
    pub body: String,
    pub created_by: String,
    pub is_private: bool,
    pub follow_up_date: Option<NaiveDate>,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
}

impl LoanComment {
    pub fn new(id: &str, loan_id: &str, kind: CommentKind, body: &str, created_by: &str) -> CoreResult<Self> {
        if body.trim().is_empty() {
            return Err(CoreError::ValidationError("comment text is required".into()));
        }
        Ok(Self {
            id: id.to_string(),
            loan_id: loan_id.to_string(),
            kind,
            body: body.trim().to_string(),
            created_by: created_by.to_string(),
            is_private: true,
            follow_up_date: None,
            is_resolved: false,
            created_at: Utc::now(),
        })
    }

    /// Visible to the borrower as well
    pub fn public(mut self) -> Self {
        self.is_private = false;
        self
    }

    pub fn with_follow_up(mut self, date: NaiveDate) -> Self {
        self.follow_up_date = Some(date);
        self
    }

    pub fn requires_follow_up(&self) -> bool {
        self.follow_up_date.is_some() && !self.is_resolved
    }

    /// Open follow-up due on or before `as_of`
    pub fn is_due(&self, as_of: NaiveDate) -> bool {
        self.requires_follow_up() && self.follow_up_date.is_some_and(|d| d <= as_of)
    }

    pub fn resolve(&mut self) -> CoreResult<()> {
        if self.is_resolved {
            return Err(CoreError::invalid_transition("Comment", "resolved", "resolve"));
        }
        self.is_resolved = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follow_up_due_until_resolved() {
        let due = NaiveDate::from_ymd_opt(2026, 11, 1).unwrap();
        let mut note = LoanComment::new("CMT_000001", "LOAN_0001", CommentKind::FollowUp, "Call borrower", "MEM_0001")
            .unwrap()
            .with_follow_up(due);

        assert!(note.is_private);
        assert!(!note.is_due(due.pred_opt().unwrap()));
        assert!(note.is_due(due));

        note.resolve().unwrap();
        assert!(!note.is_due(due));
        assert!(note.resolve().is_err());
    }

    #[test]
    fn test_empty_comment_rejected() {
        assert!(LoanComment::new("CMT_000001", "LOAN_0001", CommentKind::General, "  ", "MEM_0001").is_err());
        assert_eq!(CommentKind::from_str("payment-reminder"), Some(CommentKind::PaymentReminder));
    }
}
