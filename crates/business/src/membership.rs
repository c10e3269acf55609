//! Membership operations - applications, KYC review and member registry
//!
//! ```text
//! submit ──▶ pending ──approve──▶ approved  (member record created)
//!              │  ▲
//!              │  └──resubmit── more_info_required
//!              ├──request_info──────┘
//!              └──reject──▶ rejected
//! ```

use crate::error::{BusinessError, BusinessResult};
use crate::notifications::{Notice, NotificationService};
use crate::services::{load_member, require_admin, ServiceContext};
use chrono::{Datelike, Utc};
use sacco_core::{
    format_member_number, ApplicationStatus, Channel, Event, EventType, Member, MemberApplication,
    MemberProfile, MemberRole, MemberStanding, NotificationCategory, NotificationKind,
};
use sacco_persistence::{next_id, ApplicationRepo, MemberRepo};
use tracing::{debug, info};

/// Membership Service - applications and the member registry
pub struct MembershipService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> MembershipService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Create an admin account.
    ///
    /// The first admin bootstraps the system without an actor; after that
    /// only an existing admin may add another.
    pub async fn register_admin(&self, actor_id: Option<&str>, profile: MemberProfile) -> BusinessResult<Member> {
        profile.validate().map_err(BusinessError::from)?;

        let mut tx = self.ctx.pool().begin().await?;
        let admins = MemberRepo::list_by_role(&mut *tx, MemberRole::Admin).await?;
        let actor = match actor_id {
            Some(id) => Some(require_admin(&mut *tx, id, "register admin").await?),
            None if admins.is_empty() => None,
            None => return Err(BusinessError::permission_denied("anonymous", "register admin").into()),
        };
        if MemberRepo::find_by_email(&mut *tx, &profile.email).await?.is_some() {
            return Err(BusinessError::Validation(format!("email {} is already registered", profile.email)).into());
        }

        let now = Utc::now();
        let id = next_id(&mut *tx, "members", "MEM", 4).await?;
        let sequence = MemberRepo::count_numbered(&mut *tx, now.year()).await? + 1;
        let admin = Member::admin(&id, &format_member_number(now, sequence), profile, now);
        MemberRepo::insert(&mut *tx, &admin).await?;
        tx.commit().await?;

        info!(member_id = %admin.id, "admin registered");
        let actor = actor.as_ref().unwrap_or(&admin);
        self.ctx.emit(
            self.ctx
                .event(EventType::AdminRegistered, actor, &admin.id)
                .for_member(&admin.id),
        )?;
        Ok(admin)
    }

    // === Applications ===

    pub async fn submit_application(&self, profile: MemberProfile) -> BusinessResult<MemberApplication> {
        profile.validate().map_err(BusinessError::from)?;

        let mut tx = self.ctx.pool().begin().await?;
        if MemberRepo::find_by_email(&mut *tx, &profile.email).await?.is_some() {
            return Err(BusinessError::Validation(format!("email {} already belongs to a member", profile.email)).into());
        }
        if let Some(open) = ApplicationRepo::find_open_by_email(&mut *tx, &profile.email).await? {
            return Err(BusinessError::Validation(format!(
                "application {} for {} is still open",
                open.id, profile.email
            ))
            .into());
        }

        let id = next_id(&mut *tx, "applications", "APP", 4).await?;
        let application = MemberApplication::new(&id, profile);
        ApplicationRepo::insert(&mut *tx, &application).await?;
        tx.commit().await?;

        info!(application_id = %id, "membership application submitted");
        self.ctx.emit(
            Event::new(
                self.ctx.next_event_id(),
                EventType::ApplicationSubmitted,
                &id,
                MemberRole::Member,
                &id,
            )
            .with_description(&application.profile.full_name),
        )?;
        Ok(application)
    }

    /// Approve KYC: creates the member with the next membership number
    pub async fn approve_application(
        &self,
        admin_id: &str,
        application_id: &str,
        notes: Option<&str>,
    ) -> BusinessResult<Member> {
        let mut tx = self.ctx.pool().begin().await?;
        let admin = require_admin(&mut *tx, admin_id, "approve application").await?;
        let mut application = ApplicationRepo::get_by_id(&mut *tx, application_id)
            .await
            .map_err(BusinessError::from)?;

        let now = Utc::now();
        let member_id = next_id(&mut *tx, "members", "MEM", 4).await?;
        application
            .approve(&admin.id, &member_id, notes, now)
            .map_err(BusinessError::from)?;

        let sequence = MemberRepo::count_numbered(&mut *tx, now.year()).await? + 1;
        let member = Member::approved(
            &member_id,
            &format_member_number(now, sequence),
            application.profile.clone(),
            now,
        );
        MemberRepo::insert(&mut *tx, &member).await?;
        ApplicationRepo::update(&mut *tx, &application).await?;
        tx.commit().await?;

        info!(application_id, member_id = %member.id, "application approved");
        self.ctx.emit(
            self.ctx
                .event(EventType::ApplicationApproved, &admin, application_id)
                .for_member(&member.id),
        )?;
        NotificationService::new(self.ctx)
            .notify_quietly(
                &member.id,
                Notice::new(
                    NotificationKind::Success,
                    NotificationCategory::Application,
                    "Membership approved",
                    format!(
                        "Welcome! Your membership number is {}",
                        member.member_number.as_deref().unwrap_or_default()
                    ),
                )
                .about("application", application_id),
            )
            .await;
        Ok(member)
    }

    pub async fn reject_application(
        &self,
        admin_id: &str,
        application_id: &str,
        reason: &str,
    ) -> BusinessResult<MemberApplication> {
        let mut tx = self.ctx.pool().begin().await?;
        let admin = require_admin(&mut *tx, admin_id, "reject application").await?;
        let mut application = ApplicationRepo::get_by_id(&mut *tx, application_id)
            .await
            .map_err(BusinessError::from)?;
        application
            .reject(&admin.id, reason, Utc::now())
            .map_err(BusinessError::from)?;
        ApplicationRepo::update(&mut *tx, &application).await?;
        tx.commit().await?;

        info!(application_id, "application rejected");
        self.ctx.emit(
            self.ctx
                .event(EventType::ApplicationRejected, &admin, application_id)
                .with_description(reason),
        )?;
        self.tell_applicant(
            &application,
            "Membership application rejected",
            &format!("Your application was not approved: {}", reason),
        )
        .await;
        Ok(application)
    }

    pub async fn request_more_info(
        &self,
        admin_id: &str,
        application_id: &str,
        required: &str,
    ) -> BusinessResult<MemberApplication> {
        let mut tx = self.ctx.pool().begin().await?;
        let admin = require_admin(&mut *tx, admin_id, "review application").await?;
        let mut application = ApplicationRepo::get_by_id(&mut *tx, application_id)
            .await
            .map_err(BusinessError::from)?;
        application
            .request_info(&admin.id, required, Utc::now())
            .map_err(BusinessError::from)?;
        ApplicationRepo::update(&mut *tx, &application).await?;
        tx.commit().await?;

        info!(application_id, "more information requested");
        self.ctx.emit(
            self.ctx
                .event(EventType::ApplicationInfoRequested, &admin, application_id)
                .with_description(required),
        )?;
        self.tell_applicant(
            &application,
            "More information required",
            &format!("Please update your application: {}", required),
        )
        .await;
        Ok(application)
    }

    /// Applicant answers a more-information request with an updated profile
    pub async fn resubmit_application(
        &self,
        application_id: &str,
        profile: MemberProfile,
    ) -> BusinessResult<MemberApplication> {
        let mut tx = self.ctx.pool().begin().await?;
        let mut application = ApplicationRepo::get_by_id(&mut *tx, application_id)
            .await
            .map_err(BusinessError::from)?;
        application
            .resubmit(profile, Utc::now())
            .map_err(BusinessError::from)?;
        ApplicationRepo::update(&mut *tx, &application).await?;
        tx.commit().await?;

        info!(application_id, "application resubmitted");
        self.ctx.emit(Event::new(
            self.ctx.next_event_id(),
            EventType::ApplicationResubmitted,
            application_id,
            MemberRole::Member,
            application_id,
        ))?;
        Ok(application)
    }

    async fn tell_applicant(&self, application: &MemberApplication, title: &str, message: &str) {
        NotificationService::new(self.ctx)
            .send_external(Channel::Email, &application.profile.email, title, message)
            .await;
    }

    pub async fn get_application(&self, application_id: &str) -> BusinessResult<MemberApplication> {
        Ok(ApplicationRepo::get_by_id(self.ctx.pool(), application_id)
            .await
            .map_err(BusinessError::from)?)
    }

    pub async fn list_applications(&self, status: Option<ApplicationStatus>) -> BusinessResult<Vec<MemberApplication>> {
        debug!(status = ?status, "listing applications");
        Ok(ApplicationRepo::list(self.ctx.pool(), status).await?)
    }

    // === Members ===

    pub async fn get_member(&self, member_id: &str) -> BusinessResult<Member> {
        load_member(self.ctx.pool(), member_id).await
    }

    pub async fn list_members(&self) -> BusinessResult<Vec<Member>> {
        Ok(MemberRepo::list_all(self.ctx.pool()).await?)
    }

    /// Suspend or reinstate a member
    pub async fn set_standing(
        &self,
        admin_id: &str,
        member_id: &str,
        standing: MemberStanding,
    ) -> BusinessResult<Member> {
        let mut tx = self.ctx.pool().begin().await?;
        let admin = require_admin(&mut *tx, admin_id, "change member standing").await?;
        let mut member = load_member(&mut *tx, member_id).await?;
        member.set_standing(standing).map_err(BusinessError::from)?;
        MemberRepo::update(&mut *tx, &member).await?;
        tx.commit().await?;

        info!(member_id, standing = %standing, "member standing changed");
        self.ctx.emit(
            self.ctx
                .event(EventType::MemberStandingChanged, &admin, member_id)
                .for_member(member_id)
                .with_description(standing.as_str()),
        )?;
        Ok(member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_kind, ErrorKind};
    use sacco_persistence::{init_memory_database, EventStore};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn context() -> (ServiceContext, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_memory_database().await.unwrap();
        let events = Arc::new(EventStore::new(dir.path()).unwrap());
        (ServiceContext::from_parts(pool, events), dir)
    }

    fn profile(name: &str, email: &str) -> MemberProfile {
        MemberProfile::new(name, email, "0711222333", "30111222")
    }

    #[tokio::test]
    async fn test_bootstrap_admin_only_once() {
        let (ctx, _dir) = context().await;
        let service = MembershipService::new(&ctx);

        let admin = service
            .register_admin(None, profile("Root Admin", "root@sacco.test"))
            .await
            .unwrap();
        assert!(admin.is_admin());
        assert!(admin.member_number.as_deref().unwrap().ends_with("-0001"));

        let err = service
            .register_admin(None, profile("Second", "second@sacco.test"))
            .await
            .unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Permission);

        let second = service
            .register_admin(Some(&admin.id), profile("Second", "second@sacco.test"))
            .await
            .unwrap();
        assert_eq!(second.id, "MEM_0002");
    }

    #[tokio::test]
    async fn test_application_flow() {
        let (ctx, _dir) = context().await;
        let service = MembershipService::new(&ctx);
        let admin = service
            .register_admin(None, profile("Root Admin", "root@sacco.test"))
            .await
            .unwrap();

        let app = service
            .submit_application(profile("Grace Njeri", "grace@example.com"))
            .await
            .unwrap();
        assert_eq!(app.status, ApplicationStatus::Pending);

        // Duplicate open application for the same email
        let err = service
            .submit_application(profile("Grace Njeri", "GRACE@example.com"))
            .await
            .unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Validation);

        let app = service
            .request_more_info(&admin.id, &app.id, "copy of ID")
            .await
            .unwrap();
        assert_eq!(app.status, ApplicationStatus::MoreInfoRequired);

        let err = service.approve_application(&admin.id, &app.id, None).await.unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::State);

        service
            .resubmit_application(&app.id, profile("Grace Njeri", "grace@example.com").with_address("Nakuru"))
            .await
            .unwrap();
        let member = service.approve_application(&admin.id, &app.id, Some("ok")).await.unwrap();
        assert_eq!(member.profile.address.as_deref(), Some("Nakuru"));
        assert!(member.is_in_good_standing());

        let stored = service.get_application(&app.id).await.unwrap();
        assert_eq!(stored.member_id.as_deref(), Some(member.id.as_str()));
    }

    #[tokio::test]
    async fn test_only_admins_review() {
        let (ctx, _dir) = context().await;
        let service = MembershipService::new(&ctx);
        let admin = service
            .register_admin(None, profile("Root Admin", "root@sacco.test"))
            .await
            .unwrap();
        let app = service
            .submit_application(profile("Peter Kamau", "peter@example.com"))
            .await
            .unwrap();
        let member = service.approve_application(&admin.id, &app.id, None).await.unwrap();

        let other = service
            .submit_application(profile("Mary Achieng", "mary@example.com"))
            .await
            .unwrap();
        let err = service
            .reject_application(&member.id, &other.id, "no")
            .await
            .unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Permission);

        let suspended = service
            .set_standing(&admin.id, &member.id, MemberStanding::Suspended)
            .await
            .unwrap();
        assert!(!suspended.is_in_good_standing());
    }
}
