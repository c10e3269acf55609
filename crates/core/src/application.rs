//! # Application Module
//!
//! Membership applications and their review workflow:
//!
//! ```text
//! pending ──approve──▶ approved
//!    │  └───reject───▶ rejected
//!    └─request info──▶ more_info_required ──resubmit──▶ pending
//! ```

use crate::error::{CoreError, CoreResult};
use crate::member::MemberProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
    MoreInfoRequired,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::MoreInfoRequired => "more_info_required",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(ApplicationStatus::Pending),
            "approved" => Some(ApplicationStatus::Approved),
            "rejected" => Some(ApplicationStatus::Rejected),
            "more_info_required" => Some(ApplicationStatus::MoreInfoRequired),
            _ => None,
        }
    }

    /// Approved and rejected applications never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationStatus::Approved | ApplicationStatus::Rejected)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A membership application awaiting admin review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberApplication {
    /// APP_0001, ...
    pub id: String,
    pub profile: MemberProfile,
    pub status: ApplicationStatus,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
    pub rejection_reason: Option<String>,
    /// What the applicant must supply when status is more_info_required
    pub required_information: Option<String>,
    /// Member created from this application on approval
    pub member_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemberApplication {
    pub fn new(id: &str, profile: MemberProfile) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            profile,
            status: ApplicationStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            admin_notes: None,
            rejection_reason: None,
            required_information: None,
            member_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn ensure_pending(&self, action: &str) -> CoreResult<()> {
        if self.status != ApplicationStatus::Pending {
            return Err(CoreError::invalid_transition(
                "MemberApplication",
                self.status.as_str(),
                action,
            ));
        }
        Ok(())
    }

    fn mark_reviewed(&mut self, admin_id: &str, at: DateTime<Utc>) {
        self.reviewed_by = Some(admin_id.to_string());
        self.reviewed_at = Some(at);
        self.updated_at = at;
    }

    pub fn approve(
        &mut self,
        admin_id: &str,
        member_id: &str,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.ensure_pending("approve")?;
        self.status = ApplicationStatus::Approved;
        self.member_id = Some(member_id.to_string());
        self.admin_notes = notes.map(str::to_string);
        self.mark_reviewed(admin_id, at);
        Ok(())
    }

    pub fn reject(&mut self, admin_id: &str, reason: &str, at: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_pending("reject")?;
        if reason.trim().is_empty() {
            return Err(CoreError::ValidationError("rejection reason is required".into()));
        }
        self.status = ApplicationStatus::Rejected;
        self.rejection_reason = Some(reason.to_string());
        self.mark_reviewed(admin_id, at);
        Ok(())
    }

    pub fn request_info(&mut self, admin_id: &str, required: &str, at: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_pending("request info for")?;
        if required.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "required information must be described".into(),
            ));
        }
        self.status = ApplicationStatus::MoreInfoRequired;
        self.required_information = Some(required.to_string());
        self.mark_reviewed(admin_id, at);
        Ok(())
    }

    /// Applicant supplies the requested information; back to pending
    pub fn resubmit(&mut self, profile: MemberProfile, at: DateTime<Utc>) -> CoreResult<()> {
        if self.status != ApplicationStatus::MoreInfoRequired {
            return Err(CoreError::invalid_transition(
                "MemberApplication",
                self.status.as_str(),
                "resubmit",
            ));
        }
        profile.validate()?;
        self.profile = profile;
        self.status = ApplicationStatus::Pending;
        self.required_information = None;
        self.updated_at = at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn application() -> MemberApplication {
        MemberApplication::new(
            "APP_0001",
            MemberProfile::new("Otieno Okoth", "otieno@example.com", "0711000000", "2233445"),
        )
    }

    #[test]
    fn test_approve_pending() {
        let mut app = application();
        app.approve("MEM_0001", "MEM_0002", Some("docs verified"), Utc::now()).unwrap();
        assert_eq!(app.status, ApplicationStatus::Approved);
        assert_eq!(app.member_id.as_deref(), Some("MEM_0002"));
        assert!(app.status.is_terminal());
    }

    #[test]
    fn test_cannot_approve_twice() {
        let mut app = application();
        app.approve("MEM_0001", "MEM_0002", None, Utc::now()).unwrap();
        let err = app.approve("MEM_0001", "MEM_0003", None, Utc::now()).unwrap_err();
        assert!(err.is_invalid_transition());
    }

    #[test]
    fn test_rejected_is_terminal() {
        let mut app = application();
        app.reject("MEM_0001", "incomplete documents", Utc::now()).unwrap();
        assert!(app.request_info("MEM_0001", "payslip", Utc::now()).is_err());
        assert!(app.approve("MEM_0001", "MEM_0002", None, Utc::now()).is_err());
    }

    #[test]
    fn test_more_info_then_resubmit() {
        let mut app = application();
        app.request_info("MEM_0001", "copy of national ID", Utc::now()).unwrap();
        assert_eq!(app.status, ApplicationStatus::MoreInfoRequired);
        assert!(app.approve("MEM_0001", "MEM_0002", None, Utc::now()).is_err());

        let updated = app.profile.clone().with_address("P.O. Box 100, Kisumu");
        app.resubmit(updated, Utc::now()).unwrap();
        assert_eq!(app.status, ApplicationStatus::Pending);
        assert!(app.required_information.is_none());
        assert!(app.profile.address.is_some());
    }

    #[test]
    fn test_reject_requires_reason() {
        let mut app = application();
        assert!(app.reject("MEM_0001", "  ", Utc::now()).is_err());
        assert_eq!(app.status, ApplicationStatus::Pending);
    }
}
