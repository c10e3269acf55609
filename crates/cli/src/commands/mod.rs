//! Subcommand handlers

pub mod audit;
pub mod investments;
pub mod loans;
pub mod members;
pub mod notify;
pub mod report;
pub mod settings;
pub mod tx;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sacco_business::ServiceContext;
use sacco_persistence::Database;
use serde::Serialize;

use crate::config::SaccoConfig;
use crate::db;

/// Open the database and build the service context
pub async fn session(config: &SaccoConfig) -> Result<(Database, ServiceContext)> {
    let database = db::open(config).await?;
    let ctx = db::context(&database, config);
    Ok((database, ctx))
}

/// Truncate string for display
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

pub fn short_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

pub fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

/// Pretty JSON for `--json` output
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", to_json(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sacco_core::LoanTerms;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("MEM_0001", 12), "MEM_0001");
        assert_eq!(truncate("Wanjiru Kamau Njoroge", 10), "Wanjiru...");
        assert_eq!(truncate("Ödön Ådne Øystein", 7), "Ödön...");
    }

    #[test]
    fn test_json_keeps_amounts_exact() {
        let terms = LoanTerms::calculate(dec!(1000), dec!(12), 3).unwrap();
        let json = to_json(&terms).unwrap();
        assert!(json.contains(r#""monthly_payment": "340.02""#));
        assert!(json.contains(r#""months": 3"#));
    }
}
