//! Report generation

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Utc};
use sacco_business::{
    DividendService, InvestmentService, LedgerService, LoanService, MembershipService, PolicyService,
};
use sacco_persistence::EventFilter;
use sacco_reports::{
    AuditReport, CsvExporter, DividendReport, JsonExporter, LoanPortfolioReport, MarkdownExporter, RankingReport,
    ReportData, ReportExporter, StatementReport,
};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use super::session;
use crate::config::SaccoConfig;
use crate::{BasisArg, ReportFormat, ReportType};

pub struct ReportRequest {
    pub report_type: ReportType,
    pub format: ReportFormat,
    pub output: Option<PathBuf>,
    pub member: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub basis: BasisArg,
    pub year: Option<i32>,
}

pub async fn generate(config: &SaccoConfig, request: ReportRequest) -> Result<()> {
    let (db, ctx) = session(config).await?;
    let currency = PolicyService::new(&ctx).settings().await?.currency;

    let content = match request.report_type {
        ReportType::Statement => {
            let member_id = request
                .member
                .as_deref()
                .context("a statement needs --member <MEMBER_ID>")?;
            let member = MembershipService::new(&ctx).get_member(member_id).await?;
            let statement = LedgerService::new(&ctx)
                .statement(member_id, request.from, request.to)
                .await?;
            let report = StatementReport::new(&member, &statement, &currency);
            export_report(&report, request.format)
        }

        ReportType::Rankings => {
            let basis = request.basis.to_core_type();
            let entries = InvestmentService::new(&ctx).rankings(basis).await?;
            let names: HashMap<String, String> = MembershipService::new(&ctx)
                .list_members()
                .await?
                .into_iter()
                .map(|m| (m.id, m.profile.full_name))
                .collect();
            let report = RankingReport::new(basis, entries, &currency).with_names(names);
            export_report(&report, request.format)
        }

        ReportType::Dividends => {
            let year = request.year.unwrap_or_else(|| Utc::now().year() - 1);
            let dividends = DividendService::new(&ctx).for_year(year).await?;
            let report = DividendReport::new(year, dividends, &currency);
            export_report(&report, request.format)
        }

        ReportType::Portfolio => {
            let as_of = request.to.unwrap_or_else(|| Utc::now().date_naive());
            let loans = LoanService::new(&ctx).list(None).await?;
            let report = LoanPortfolioReport::generate(&loans, as_of, &currency);
            export_report(&report, request.format)
        }

        ReportType::Audit => {
            let mut events = db.event_reader().read_all()?;
            if let Some(member_id) = &request.member {
                events = EventFilter::new().member(member_id).apply(events);
            }
            events.retain(|e| {
                let day = e.timestamp.date_naive();
                request.from.map_or(true, |f| day >= f) && request.to.map_or(true, |t| day <= t)
            });
            let report = AuditReport::from_events("Audit Trail", &events);
            export_report(&report, request.format)
        }
    };

    match request.output {
        Some(path) => {
            fs::write(&path, &content).context("Failed to write report file")?;
            println!("✅ Report generated: {:?}", path);
        }
        None => {
            println!("{}", content);
        }
    }

    Ok(())
}

fn export_report(report: &dyn ReportData, format: ReportFormat) -> String {
    match format {
        ReportFormat::Csv => CsvExporter::new().export(report),
        ReportFormat::Json => JsonExporter::new().export(report),
        ReportFormat::Markdown => MarkdownExporter::new().export(report),
    }
}
