//! Audit trail browsing

use anyhow::{bail, Result};
use chrono::{NaiveDate, Utc};
use sacco_core::EventType;
use sacco_persistence::{AuditSummary, EventFilter, EventReader};

use super::truncate;
use crate::config::SaccoConfig;

#[derive(Debug, Default)]
pub struct AuditQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub types: Vec<String>,
    pub member: Option<String>,
    pub actor: Option<String>,
    pub financial_only: bool,
}

impl AuditQuery {
    fn filter(&self) -> Result<EventFilter> {
        let mut filter = EventFilter::new();
        if let Some(member) = &self.member {
            filter = filter.member(member);
        }
        if let Some(actor) = &self.actor {
            filter = filter.actor(actor);
        }
        if !self.types.is_empty() {
            let mut types = Vec::with_capacity(self.types.len());
            for name in &self.types {
                match EventType::from_str(name.trim()) {
                    Some(t) => types.push(t),
                    None => bail!("unknown event type '{}'", name),
                }
            }
            filter = filter.event_types(types);
        }
        if self.financial_only {
            filter = filter.financial_only();
        }
        Ok(filter)
    }
}

/// Print the events matching `query` with a summary
pub fn run_audit(config: &SaccoConfig, query: AuditQuery) -> Result<()> {
    let events_dir = &config.database.events_dir;
    let filter = query.filter()?;

    let reader = EventReader::new(events_dir);
    let events = match (query.from, query.to) {
        (Some(from), Some(to)) => reader.read_range(&from.to_string(), &to.to_string())?,
        (Some(from), None) => {
            let today = Utc::now().date_naive();
            reader.read_range(&from.to_string(), &today.to_string())?
        }
        (None, Some(to)) => {
            let mut all = reader.read_all()?;
            all.retain(|e| e.timestamp.date_naive() <= to);
            all
        }
        (None, None) => reader.read_all()?,
    };
    let events = filter.apply(events);

    println!("🔍 Audit Trail");
    println!("   Events directory: {:?}", events_dir);
    if let Some(from) = query.from {
        println!("   From: {}", from);
    }
    if let Some(to) = query.to {
        println!("   To: {}", to);
    }
    println!();

    if events.is_empty() {
        println!("No events found matching criteria.");
        return Ok(());
    }

    println!("{}", AuditSummary::generate(&events).summary());
    println!();
    println!(
        "{:<11} {:<20} {:<26} {:<10} {:<10} {:<14} {:>12}",
        "EVENT", "TIME", "TYPE", "ACTOR", "MEMBER", "ENTITY", "AMOUNT"
    );
    println!("{}", "-".repeat(108));
    for e in &events {
        println!(
            "{:<11} {:<20} {:<26} {:<10} {:<10} {:<14} {:>12}",
            e.event_id,
            e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            e.event_type.as_str(),
            truncate(&e.actor_id, 10),
            e.member_id.as_deref().unwrap_or("-"),
            truncate(&e.entity_id, 14),
            e.amount.map(|a| a.to_string()).unwrap_or_default()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_rejects_unknown_event_type() {
        let query = AuditQuery {
            types: vec!["loan_disbursed".into(), "coffee_break".into()],
            ..AuditQuery::default()
        };
        let err = query.filter().unwrap_err();
        assert!(err.to_string().contains("coffee_break"));
    }

    #[test]
    fn test_run_audit_on_empty_trail() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = SaccoConfig::default();
        config.database.events_dir = dir.path().to_path_buf();

        let query = AuditQuery {
            types: vec!["payment_confirmed".into()],
            financial_only: true,
            ..AuditQuery::default()
        };
        run_audit(&config, query).unwrap();
    }
}
