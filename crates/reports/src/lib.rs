//! # Sacco Reports
//!
//! Report generation - member statements, investment rankings, dividends,
//! the loan portfolio and the audit trail, exported as CSV, JSON or Markdown.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sacco_reports::{exporter_for, LoanPortfolioReport};
//!
//! let report = LoanPortfolioReport::generate(&loans, today, "KES");
//! let output = exporter_for("md").unwrap().export(&report);
//! ```

pub mod audit;
pub mod dividends;
pub mod exporters;
pub mod portfolio;
pub mod rankings;
pub mod statement;

pub use audit::{AuditReport, AuditRow};
pub use dividends::DividendReport;
pub use exporters::{
    exporter_for, CsvExporter, JsonExporter, MarkdownExporter, ReportData, ReportExporter,
};
pub use portfolio::{ArrearsClass, LoanPortfolioReport, PortfolioRow, PAR_THRESHOLD_DAYS};
pub use rankings::RankingReport;
pub use statement::{StatementLine, StatementReport};
