//! # Member Module
//!
//! Member identity, role, KYC state and tenure.
//! - Admin: reviews applications, confirms money movement, edits policy
//! - Member: invests, borrows, guarantees other members' loans

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Days counted as one month of membership
pub const DAYS_PER_MEMBERSHIP_MONTH: i64 = 30;

/// Role of a member in the cooperative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(MemberRole::Admin),
            "member" => Some(MemberRole::Member),
            _ => None,
        }
    }

    /// Admins approve applications, investments, loans and payments
    pub fn can_approve(&self) -> bool {
        matches!(self, MemberRole::Admin)
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// KYC verification state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KycStatus {
    Pending,
    Approved,
    Rejected,
}

impl KycStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KycStatus::Pending => "pending",
            KycStatus::Approved => "approved",
            KycStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(KycStatus::Pending),
            "approved" => Some(KycStatus::Approved),
            "rejected" => Some(KycStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for KycStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Standing of an approved member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStanding {
    Active,
    Suspended,
}

impl MemberStanding {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStanding::Active => "active",
            MemberStanding::Suspended => "suspended",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(MemberStanding::Active),
            "suspended" => Some(MemberStanding::Suspended),
            _ => None,
        }
    }
}

impl fmt::Display for MemberStanding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Personal details collected at application time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    /// National ID or passport number
    pub id_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employment_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_of_kin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_of_kin_phone: Option<String>,
}

impl MemberProfile {
    pub fn new(full_name: &str, email: &str, phone: &str, id_number: &str) -> Self {
        Self {
            full_name: full_name.trim().to_string(),
            email: email.trim().to_lowercase(),
            phone: phone.trim().to_string(),
            id_number: id_number.trim().to_string(),
            ..Default::default()
        }
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    pub fn with_employment(mut self, status: &str) -> Self {
        self.employment_status = Some(status.to_string());
        self
    }

    pub fn with_next_of_kin(mut self, name: &str, phone: &str) -> Self {
        self.next_of_kin = Some(name.to_string());
        self.next_of_kin_phone = Some(phone.to_string());
        self
    }

    /// Check required fields
    pub fn validate(&self) -> CoreResult<()> {
        if self.full_name.is_empty() {
            return Err(CoreError::ValidationError("full name is required".into()));
        }
        let at = self.email.find('@');
        let valid_email = matches!(at, Some(i) if i > 0 && self.email[i + 1..].contains('.'));
        if !valid_email {
            return Err(CoreError::ValidationError(format!(
                "invalid email address: '{}'",
                self.email
            )));
        }
        if self.phone.is_empty() {
            return Err(CoreError::ValidationError("phone number is required".into()));
        }
        if self.id_number.is_empty() {
            return Err(CoreError::ValidationError("ID number is required".into()));
        }
        Ok(())
    }
}

/// A registered member of the cooperative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// Internal ID (MEM_0001, ...)
    pub id: String,
    /// Public member number (SACCO-2026-0001), assigned on approval
    pub member_number: Option<String>,
    pub role: MemberRole,
    pub kyc_status: KycStatus,
    pub standing: MemberStanding,
    pub profile: MemberProfile,
    /// Membership tenure counts from this instant
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Member {
    /// New member record for an approved application
    pub fn approved(id: &str, member_number: &str, profile: MemberProfile, at: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            member_number: Some(member_number.to_string()),
            role: MemberRole::Member,
            kyc_status: KycStatus::Approved,
            standing: MemberStanding::Active,
            profile,
            approved_at: Some(at),
            created_at: at,
        }
    }

    /// Bootstrap an admin account
    pub fn admin(id: &str, member_number: &str, profile: MemberProfile, at: DateTime<Utc>) -> Self {
        Self {
            role: MemberRole::Admin,
            ..Self::approved(id, member_number, profile, at)
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.can_approve()
    }

    /// Approved KYC and not suspended
    pub fn is_in_good_standing(&self) -> bool {
        self.kyc_status == KycStatus::Approved && self.standing == MemberStanding::Active
    }

    /// Whole months since approval, counting 30 days per month
    pub fn membership_months(&self, now: DateTime<Utc>) -> i64 {
        match self.approved_at {
            Some(since) => ((now - since).num_days() / DAYS_PER_MEMBERSHIP_MONTH).max(0),
            None => 0,
        }
    }

    pub fn meets_tenure(&self, minimum_months: u32, now: DateTime<Utc>) -> bool {
        self.membership_months(now) >= minimum_months as i64
    }

    /// Change standing. A rejected KYC record is immutable.
    pub fn set_standing(&mut self, standing: MemberStanding) -> CoreResult<()> {
        if self.kyc_status == KycStatus::Rejected {
            return Err(CoreError::invalid_transition(
                "Member",
                self.kyc_status.as_str(),
                "change standing of",
            ));
        }
        self.standing = standing;
        Ok(())
    }

    pub fn display_name(&self) -> String {
        match &self.member_number {
            Some(number) => format!("{} ({})", self.profile.full_name, number),
            None => self.profile.full_name.clone(),
        }
    }
}

/// Format a member number: `SACCO-{year}-{seq:04}`
pub fn format_member_number(at: DateTime<Utc>, sequence: u32) -> String {
    format!("SACCO-{}-{:04}", at.year(), sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn profile() -> MemberProfile {
        MemberProfile::new("Jane Wanjiku", "Jane@Example.com", "+254700000001", "12345678")
    }

    #[test]
    fn test_role_roundtrip() {
        assert_eq!(MemberRole::from_str("ADMIN"), Some(MemberRole::Admin));
        assert_eq!(MemberRole::from_str("guest"), None);
        assert!(MemberRole::Admin.can_approve());
        assert!(!MemberRole::Member.can_approve());
    }

    #[test]
    fn test_profile_validation() {
        assert!(profile().validate().is_ok());
        assert_eq!(profile().email, "jane@example.com");

        let bad = MemberProfile::new("Jane", "not-an-email", "0700", "1");
        assert!(bad.validate().is_err());

        let nameless = MemberProfile::new("  ", "a@b.co", "0700", "1");
        assert!(nameless.validate().is_err());
    }

    #[test]
    fn test_membership_months_counts_thirty_day_blocks() {
        let since = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let member = Member::approved("MEM_0001", "SACCO-2026-0001", profile(), since);

        assert_eq!(member.membership_months(since + Duration::days(29)), 0);
        assert_eq!(member.membership_months(since + Duration::days(90)), 3);
        assert!(member.meets_tenure(3, since + Duration::days(90)));
        assert!(!member.meets_tenure(3, since + Duration::days(89)));
    }

    #[test]
    fn test_rejected_member_is_immutable() {
        let now = Utc::now();
        let mut member = Member::approved("MEM_0002", "SACCO-2026-0002", profile(), now);
        member.kyc_status = KycStatus::Rejected;
        assert!(member.set_standing(MemberStanding::Suspended).is_err());
        assert!(!member.is_in_good_standing());
    }

    #[test]
    fn test_member_number_format() {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
        assert_eq!(format_member_number(at, 7), "SACCO-2026-0007");
    }
}
