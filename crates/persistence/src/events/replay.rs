//! Event Replay - read events from JSONL files
//!
//! Reads the audit trail back for queries, audits and the `audit` CLI.

use crate::error::{PersistenceError, PersistenceResult};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sacco_core::{Event, EventType};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Event Reader - reads events from the JSONL files
pub struct EventReader {
    base_path: PathBuf,
}

impl EventReader {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub fn read_file(&self, file_path: &Path) -> PersistenceResult<Vec<Event>> {
        let file = File::open(file_path)?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }

        Ok(events)
    }

    /// Events of one day (`YYYY-MM-DD`); empty when nothing was written
    pub fn read_date(&self, date: &str) -> PersistenceResult<Vec<Event>> {
        let file_path = self.base_path.join(format!("{}.jsonl", date));
        if file_path.exists() {
            self.read_file(&file_path)
        } else {
            Ok(Vec::new())
        }
    }

    /// Events between two days, both inclusive
    pub fn read_range(&self, from: &str, to: &str) -> PersistenceResult<Vec<Event>> {
        let from_date = parse_day(from)?;
        let to_date = parse_day(to)?;

        let mut all_events = Vec::new();
        for day in from_date.iter_days().take_while(|d| *d <= to_date) {
            all_events.extend(self.read_date(&day.format("%Y-%m-%d").to_string())?);
        }

        Ok(all_events)
    }

    pub fn read_all(&self) -> PersistenceResult<Vec<Event>> {
        let mut all_events = Vec::new();

        if !self.base_path.exists() {
            return Ok(all_events);
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.base_path)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
            .collect();

        files.sort();

        for file_path in files {
            all_events.extend(self.read_file(&file_path)?);
        }

        Ok(all_events)
    }
}

fn parse_day(value: &str) -> PersistenceResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| PersistenceError::Other(format!("Invalid date '{}': {}", value, e)))
}

/// Event Filter - narrows a list of events
#[derive(Debug, Default, Clone)]
pub struct EventFilter {
    /// Member the event concerns
    pub member_id: Option<String>,
    /// Who performed the action
    pub actor_id: Option<String>,
    pub entity_id: Option<String>,
    pub event_types: Option<Vec<EventType>>,
    pub financial_only: bool,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn member(mut self, member_id: &str) -> Self {
        self.member_id = Some(member_id.to_string());
        self
    }

    pub fn actor(mut self, actor_id: &str) -> Self {
        self.actor_id = Some(actor_id.to_string());
        self
    }

    pub fn entity(mut self, entity_id: &str) -> Self {
        self.entity_id = Some(entity_id.to_string());
        self
    }

    pub fn event_types(mut self, types: Vec<EventType>) -> Self {
        self.event_types = Some(types);
        self
    }

    pub fn financial_only(mut self) -> Self {
        self.financial_only = true;
        self
    }

    pub fn amount_range(mut self, min: Decimal, max: Decimal) -> Self {
        self.min_amount = Some(min);
        self.max_amount = Some(max);
        self
    }

    pub fn between(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref member_id) = self.member_id {
            if event.member_id.as_deref() != Some(member_id.as_str()) {
                return false;
            }
        }

        if let Some(ref actor_id) = self.actor_id {
            if event.actor_id != *actor_id {
                return false;
            }
        }

        if let Some(ref entity_id) = self.entity_id {
            if event.entity_id != *entity_id {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.contains(&event.event_type) {
                return false;
            }
        }

        if self.financial_only && !event.event_type.is_financial() {
            return false;
        }

        if let Some(amount) = event.amount {
            if self.min_amount.is_some_and(|min| amount < min) {
                return false;
            }
            if self.max_amount.is_some_and(|max| amount > max) {
                return false;
            }
        }

        if self.since.is_some_and(|since| event.timestamp < since) {
            return false;
        }
        if self.until.is_some_and(|until| event.timestamp > until) {
            return false;
        }

        true
    }

    pub fn apply(&self, events: Vec<Event>) -> Vec<Event> {
        events.into_iter().filter(|e| self.matches(e)).collect()
    }
}

/// Counts over a slice of the audit trail
#[derive(Debug, Default)]
pub struct AuditSummary {
    pub total_events: usize,
    pub financial_events: usize,
    /// Sum of amounts on financial events
    pub financial_volume: Decimal,
    pub by_type: BTreeMap<String, usize>,
    pub by_actor: BTreeMap<String, usize>,
}

impl AuditSummary {
    pub fn generate(events: &[Event]) -> Self {
        let mut summary = Self {
            total_events: events.len(),
            ..Default::default()
        };

        for event in events {
            *summary
                .by_type
                .entry(event.event_type.as_str().to_string())
                .or_default() += 1;
            *summary.by_actor.entry(event.actor_id.clone()).or_default() += 1;

            if event.event_type.is_financial() {
                summary.financial_events += 1;
                summary.financial_volume += event.amount.unwrap_or(Decimal::ZERO);
            }
        }

        summary
    }

    pub fn summary(&self) -> String {
        let mut text = format!(
            "Audit Summary:\n\
             - Total events: {}\n\
             - Financial events: {} (volume {})",
            self.total_events, self.financial_events, self.financial_volume
        );
        for (event_type, count) in &self.by_type {
            text.push_str(&format!("\n  {}: {}", event_type, count));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventStore;
    use rust_decimal_macros::dec;
    use sacco_core::MemberRole;
    use tempfile::tempdir;

    fn event(id: &str, event_type: EventType, member: &str, amount: Option<Decimal>) -> Event {
        let e = Event::new(id.to_string(), event_type, "MEM_0001", MemberRole::Admin, "X").for_member(member);
        match amount {
            Some(a) => e.with_amount(a, "KES"),
            None => e,
        }
    }

    #[test]
    fn test_event_reader() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path()).unwrap();

        store
            .append(&event(&store.next_event_id(), EventType::LoanApplied, "MEM_0002", None))
            .unwrap();
        store
            .append(&event(&store.next_event_id(), EventType::LoanApproved, "MEM_0002", None))
            .unwrap();
        store.flush().unwrap();

        let reader = EventReader::new(dir.path());
        let events = reader.read_all().unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::LoanApplied);
        assert_eq!(events[1].event_type, EventType::LoanApproved);

        let today = Utc::now().format("%Y-%m-%d").to_string();
        assert_eq!(reader.read_range(&today, &today).unwrap().len(), 2);
        assert!(reader.read_range("2026-13-01", &today).is_err());
    }

    #[test]
    fn test_event_filter() {
        let events = vec![
            event("EVT_000001", EventType::InvestmentConfirmed, "MEM_0002", Some(dec!(100))),
            event("EVT_000002", EventType::InvestmentConfirmed, "MEM_0003", Some(dec!(200))),
            event("EVT_000003", EventType::LoanApplied, "MEM_0002", None),
        ];

        assert_eq!(EventFilter::new().member("MEM_0002").apply(events.clone()).len(), 2);
        assert_eq!(EventFilter::new().financial_only().apply(events.clone()).len(), 2);
        assert_eq!(
            EventFilter::new()
                .event_types(vec![EventType::LoanApplied])
                .apply(events.clone())
                .len(),
            1
        );
        assert_eq!(
            EventFilter::new()
                .amount_range(dec!(150), dec!(500))
                .financial_only()
                .apply(events)
                .len(),
            1
        );
    }

    #[test]
    fn test_audit_summary() {
        let events = vec![
            event("EVT_000001", EventType::InvestmentConfirmed, "MEM_0002", Some(dec!(100))),
            event("EVT_000002", EventType::PaymentConfirmed, "MEM_0002", Some(dec!(50))),
            event("EVT_000003", EventType::LoanApplied, "MEM_0002", None),
        ];
        let summary = AuditSummary::generate(&events);

        assert_eq!(summary.total_events, 3);
        assert_eq!(summary.financial_events, 2);
        assert_eq!(summary.financial_volume, dec!(150));
        assert_eq!(summary.by_actor.get("MEM_0001"), Some(&3));
    }
}
