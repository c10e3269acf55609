//! Service context shared by all business services
//!
//! Every operation follows the same shape:
//!
//! ```text
//! begin ──▶ load + check ──▶ write rows ──▶ commit ──▶ audit event ──▶ notify
//!              │ error
//!              └──────────▶ rollback (nothing written, nothing logged)
//! ```

use crate::error::{BusinessError, BusinessResult};
use crate::notifications::{LogNotifier, Notifier};
use sacco_core::{Channel, Event, EventType, Member};
use sacco_persistence::{Database, EventStore, MemberRepo, PersistenceError};
use sqlx::{SqliteExecutor, SqlitePool};
use std::sync::Arc;
use tracing::debug;

/// Context for business operations - database, audit trail and notifier
pub struct ServiceContext {
    pool: SqlitePool,
    events: Arc<EventStore>,
    notifier: Arc<dyn Notifier>,
    /// Outbound channels used besides the in-app notification
    channels: Vec<Channel>,
}

impl ServiceContext {
    pub fn new(db: &Database) -> Self {
        Self::from_parts(db.pool().clone(), db.event_store())
    }

    /// Create from pool and event store directly
    pub fn from_parts(pool: SqlitePool, events: Arc<EventStore>) -> Self {
        Self {
            pool,
            events,
            notifier: Arc::new(LogNotifier),
            channels: Vec::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>, channels: Vec<Channel>) -> Self {
        self.notifier = notifier;
        self.channels = channels;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn events(&self) -> &EventStore {
        &self.events
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn next_event_id(&self) -> String {
        self.events.next_event_id()
    }

    /// Start an audit event performed by `actor`
    pub fn event(&self, event_type: EventType, actor: &Member, entity_id: &str) -> Event {
        Event::new(self.next_event_id(), event_type, &actor.id, actor.role, entity_id)
    }

    /// Append to the audit trail; call only after the SQL transaction committed
    pub fn emit(&self, event: Event) -> BusinessResult<()> {
        self.events.append(&event)?;
        debug!(event_id = %event.event_id, event_type = %event.event_type, "audit event recorded");
        Ok(())
    }
}

// === Actor checks ===

/// Load a member, mapping a missing row to `NotFound`
pub(crate) async fn load_member<'e, E: SqliteExecutor<'e>>(exec: E, member_id: &str) -> BusinessResult<Member> {
    match MemberRepo::get_by_id(exec, member_id).await {
        Ok(member) => Ok(member),
        Err(PersistenceError::NotFound { .. }) => Err(BusinessError::not_found("Member", member_id).into()),
        Err(e) => Err(e.into()),
    }
}

/// The actor must exist and hold the admin role
pub(crate) async fn require_admin<'e, E: SqliteExecutor<'e>>(
    exec: E,
    actor_id: &str,
    operation: &str,
) -> BusinessResult<Member> {
    let actor = load_member(exec, actor_id).await?;
    if !actor.is_admin() {
        return Err(BusinessError::permission_denied(actor_id, operation).into());
    }
    Ok(actor)
}

/// The member must be KYC-approved and in good standing
pub(crate) async fn require_active_member<'e, E: SqliteExecutor<'e>>(
    exec: E,
    member_id: &str,
    operation: &str,
) -> BusinessResult<Member> {
    let member = load_member(exec, member_id).await?;
    if !member.is_in_good_standing() {
        return Err(BusinessError::permission_denied(member_id, operation).into());
    }
    Ok(member)
}
