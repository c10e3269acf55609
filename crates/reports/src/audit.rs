//! Audit trail report over stored events

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sacco_core::Event;

use crate::exporters::ReportData;

#[derive(Debug, Clone)]
pub struct AuditRow {
    pub event_id: String,
    pub timestamp: String,
    pub event_type: String,
    pub actor: String,
    pub member_id: String,
    pub entity_id: String,
    pub amount: String,
    pub reference: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct AuditReport {
    pub title: String,
    pub rows: Vec<AuditRow>,
    /// Sum of every amount carried by the events
    pub total_amount: Decimal,
    pub generated_at: DateTime<Utc>,
}

impl AuditReport {
    pub fn from_events(title: &str, events: &[Event]) -> Self {
        let rows = events
            .iter()
            .map(|e| AuditRow {
                event_id: e.event_id.clone(),
                timestamp: e.timestamp.to_rfc3339(),
                event_type: e.event_type.as_str().to_string(),
                actor: format!("{} ({})", e.actor_id, e.actor_role.as_str()),
                member_id: e.member_id.clone().unwrap_or_default(),
                entity_id: e.entity_id.clone(),
                amount: match (e.amount, &e.currency) {
                    (Some(amount), Some(currency)) => format!("{:.2} {}", amount, currency),
                    (Some(amount), None) => format!("{:.2}", amount),
                    _ => String::new(),
                },
                reference: e.reference.clone().unwrap_or_default(),
                description: e.description.clone().unwrap_or_default(),
            })
            .collect();

        Self {
            title: title.to_string(),
            rows,
            total_amount: events.iter().filter_map(|e| e.amount).sum(),
            generated_at: Utc::now(),
        }
    }
}

impl ReportData for AuditReport {
    fn title(&self) -> &str {
        &self.title
    }

    fn headers(&self) -> Vec<String> {
        [
            "Event", "Timestamp", "Type", "Actor", "Member", "Entity", "Amount", "Reference",
            "Description",
        ]
        .iter()
        .map(|h| h.to_string())
        .collect()
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|r| {
                vec![
                    r.event_id.clone(),
                    r.timestamp.clone(),
                    r.event_type.clone(),
                    r.actor.clone(),
                    r.member_id.clone(),
                    r.entity_id.clone(),
                    r.amount.clone(),
                    r.reference.clone(),
                    r.description.clone(),
                ]
            })
            .collect()
    }

    fn summary(&self) -> Vec<(String, String)> {
        let first = self.rows.first().map(|r| r.timestamp.clone()).unwrap_or_default();
        let last = self.rows.last().map(|r| r.timestamp.clone()).unwrap_or_default();
        vec![
            ("Total Events".to_string(), self.rows.len().to_string()),
            ("First Event".to_string(), first),
            ("Last Event".to_string(), last),
            ("Total Amount".to_string(), format!("{:.2}", self.total_amount)),
            ("Generated At".to_string(), self.generated_at.to_rfc3339()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporters::{CsvExporter, ReportExporter};
    use rust_decimal_macros::dec;
    use sacco_core::{EventType, MemberRole};

    #[test]
    fn test_audit_report_from_events() {
        let events = vec![
            Event::new("EVT_000001".into(), EventType::InvestmentConfirmed, "MEM_0001", MemberRole::Admin, "INV_000001")
                .for_member("MEM_0002")
                .with_amount(dec!(100), "KES"),
            Event::new("EVT_000002".into(), EventType::LoanDisbursed, "MEM_0001", MemberRole::Admin, "LOAN_0001")
                .for_member("MEM_0002")
                .with_amount(dec!(1200), "KES")
                .with_reference("BANK-TRF-77"),
            Event::new("EVT_000003".into(), EventType::MemberStandingChanged, "MEM_0001", MemberRole::Admin, "MEM_0003")
                .with_description("suspended"),
        ];

        let report = AuditReport::from_events("Audit Trail", &events);

        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.total_amount, dec!(1300));
        assert_eq!(report.rows[0].amount, "100.00 KES");
        assert_eq!(report.rows[0].actor, "MEM_0001 (admin)");
        assert_eq!(report.rows[2].amount, "");

        let csv = CsvExporter::new().export(&report);
        assert!(csv.contains("EVT_000002"));
        assert!(csv.contains("BANK-TRF-77"));
    }
}
