//! Investment ranking report

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sacco_core::{RankingBasis, RankingEntry};

use crate::exporters::ReportData;

#[derive(Debug, Clone)]
pub struct RankingReport {
    pub title: String,
    pub basis: RankingBasis,
    pub currency: String,
    pub entries: Vec<RankingEntry>,
    /// member id → display name; unknown ids show blank
    pub names: HashMap<String, String>,
    pub generated_at: DateTime<Utc>,
}

impl RankingReport {
    pub fn new(basis: RankingBasis, entries: Vec<RankingEntry>, currency: &str) -> Self {
        Self {
            title: format!("Investment Rankings ({})", basis.as_str()),
            basis,
            currency: currency.to_string(),
            entries,
            names: HashMap::new(),
            generated_at: Utc::now(),
        }
    }

    pub fn with_names(mut self, names: HashMap<String, String>) -> Self {
        self.names = names;
        self
    }

    pub fn total(&self) -> Decimal {
        self.entries.iter().map(|e| e.amount).sum()
    }
}

impl ReportData for RankingReport {
    fn title(&self) -> &str {
        &self.title
    }

    fn headers(&self) -> Vec<String> {
        vec![
            "Position".to_string(),
            "Member".to_string(),
            "Name".to_string(),
            "Amount".to_string(),
        ]
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.entries
            .iter()
            .map(|e| {
                vec![
                    e.position.to_string(),
                    e.member_id.clone(),
                    self.names.get(&e.member_id).cloned().unwrap_or_default(),
                    format!("{:.2}", e.amount),
                ]
            })
            .collect()
    }

    fn summary(&self) -> Vec<(String, String)> {
        vec![
            ("Basis".to_string(), self.basis.as_str().to_string()),
            ("Members Ranked".to_string(), self.entries.len().to_string()),
            ("Total".to_string(), format!("{:.2} {}", self.total(), self.currency)),
            ("Generated At".to_string(), self.generated_at.to_rfc3339()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporters::{MarkdownExporter, ReportExporter};
    use rust_decimal_macros::dec;

    #[test]
    fn test_ranking_rows() {
        let entries = vec![
            RankingEntry {
                position: 1,
                member_id: "MEM_0003".to_string(),
                amount: dec!(500),
            },
            RankingEntry {
                position: 2,
                member_id: "MEM_0002".to_string(),
                amount: dec!(150),
            },
        ];
        let names = HashMap::from([("MEM_0003".to_string(), "Carol Muthoni".to_string())]);
        let report = RankingReport::new(RankingBasis::Total, entries, "KES").with_names(names);

        assert_eq!(report.total(), dec!(650));
        let rows = report.rows();
        assert_eq!(rows[0], vec!["1", "MEM_0003", "Carol Muthoni", "500.00"]);
        assert_eq!(rows[1][2], "");

        let md = MarkdownExporter::new().export(&report);
        assert!(md.contains("- **Total**: 650.00 KES"));
        assert!(md.contains("| 2 | MEM_0002 |  | 150.00 |"));
    }
}
