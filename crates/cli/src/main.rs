//! Sacco CLI - back-office operations from the command line
//!
//! Usage:
//! ```bash
//! sacco init
//! sacco member register-admin --name "Jane Admin" --email jane@sacco.test --phone 0700000000 --id-number 1
//! sacco member apply --name "Alice" --email alice@example.com --phone 0711000000 --id-number 123
//! sacco --actor MEM_0001 member approve APP_0001
//! sacco invest add MEM_0002 share-capital 1000 --reference MPESA-XYZ
//! sacco --actor MEM_0001 invest confirm INV_000001
//! sacco loan apply MEM_0002 5000 12 "dairy cow" --guarantor MEM_0003:60
//! sacco --actor MEM_0001 invest calculate-dividends 2025 --share-rate 10 --monthly-rate 6
//! sacco report portfolio --format markdown --output portfolio.md
//! ```

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod db;

use commands::{audit, investments, loans, members, notify, report, settings, tx};
use config::SaccoConfig;

/// Sacco - SACCO back office: members, investments, loans and the ledger
#[derive(Parser)]
#[command(name = "sacco")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file
    #[arg(long, short, default_value = "sacco.toml", global = true)]
    pub config: PathBuf,

    /// Database file path (overrides the config file)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Events directory path (overrides the config file)
    #[arg(long, global = true)]
    pub events_dir: Option<PathBuf>,

    /// Log level or filter directives (overrides the config file)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Member ID of the person performing the operation
    #[arg(long, global = true)]
    pub actor: Option<String>,

    /// Print balances, summaries, terms and settings as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Config file values with command-line overrides applied
    fn resolve_config(&self) -> Result<SaccoConfig> {
        let mut config = SaccoConfig::load_or_default(&self.config)
            .with_context(|| format!("Failed to load config from {:?}", self.config))?;

        if let Some(db) = &self.db {
            config.database.path = db.clone();
        }
        if let Some(dir) = &self.events_dir {
            config.database.events_dir = dir.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        config.validate()?;
        Ok(config)
    }

    /// The acting member, required by admin operations
    pub fn actor(&self) -> Result<&str> {
        self.actor
            .as_deref()
            .context("this operation needs --actor <MEMBER_ID>")
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and seed the default policy
    Init {
        /// Force re-initialization (drops existing data)
        #[arg(long)]
        force: bool,
    },

    /// Show database status
    Status,

    /// Membership: applications, KYC review, standing
    Member {
        #[command(subcommand)]
        action: MemberAction,
    },

    /// Share capital, monthly investments and special deposits
    Invest {
        #[command(subcommand)]
        action: InvestAction,
    },

    /// Loan applications, guarantees, disbursement and repayment
    Loan {
        #[command(subcommand)]
        action: LoanAction,
    },

    /// Ledger transactions and balances
    Tx {
        #[command(subcommand)]
        action: TxAction,
    },

    /// Policy settings and loan types
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// In-app notifications and outbound deliveries
    Notify {
        #[command(subcommand)]
        action: NotifyAction,
    },

    /// Generate reports
    Report {
        /// Report type
        report_type: ReportType,
        /// Report format
        #[arg(long, default_value = "markdown")]
        format: ReportFormat,
        /// Output file path
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Member (statement only)
        #[arg(long)]
        member: Option<String>,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// End date (YYYY-MM-DD); also the portfolio valuation date
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Ranking basis
        #[arg(long, default_value = "total")]
        basis: BasisArg,
        /// Dividend year (defaults to last year)
        #[arg(long)]
        year: Option<i32>,
    },

    /// Browse the audit trail
    Audit {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Event types to include (comma-separated, e.g. loan_disbursed)
        #[arg(long, value_delimiter = ',')]
        types: Option<Vec<String>>,
        /// Events concerning this member
        #[arg(long)]
        member: Option<String>,
        /// Events performed by this member
        #[arg(long)]
        by: Option<String>,
        /// Only events that moved money
        #[arg(long)]
        financial: bool,
    },
}

#[derive(Subcommand)]
pub enum MemberAction {
    /// Submit a membership application
    Apply {
        #[command(flatten)]
        profile: ProfileArgs,
    },
    /// Resubmit an application after more information was requested
    Resubmit {
        application_id: String,
        #[command(flatten)]
        profile: ProfileArgs,
    },
    /// List applications
    Applications {
        /// pending, approved, rejected, more_info_required
        #[arg(long)]
        status: Option<String>,
    },
    /// Approve an application and create the member
    Approve {
        application_id: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Reject an application
    Reject {
        application_id: String,
        #[arg(long)]
        reason: String,
    },
    /// Ask the applicant for more information
    RequestInfo {
        application_id: String,
        /// What the applicant must supply
        #[arg(long)]
        required: String,
    },
    /// Register an administrator (the first one needs no --actor)
    RegisterAdmin {
        #[command(flatten)]
        profile: ProfileArgs,
    },
    /// List members
    List,
    /// Show member details with balances and loans
    Show { member_id: String },
    /// Suspend or reactivate a member
    Standing {
        member_id: String,
        /// active or suspended
        standing: String,
    },
}

#[derive(clap::Args)]
pub struct ProfileArgs {
    #[arg(long, short)]
    pub name: String,
    #[arg(long, short)]
    pub email: String,
    #[arg(long, short)]
    pub phone: String,
    /// National ID or passport number
    #[arg(long)]
    pub id_number: String,
    #[arg(long)]
    pub address: Option<String>,
    #[arg(long)]
    pub employment: Option<String>,
}

#[derive(Subcommand)]
pub enum InvestAction {
    /// Record an investment (pending unless auto-approval is on)
    Add {
        member_id: String,
        category: CategoryArg,
        amount: Decimal,
        #[arg(long)]
        reference: Option<String>,
        /// e.g. mpesa, bank, cash
        #[arg(long)]
        method: Option<String>,
    },
    /// Confirm a pending investment and credit the ledger
    Confirm { investment_id: String },
    /// Reject a pending investment
    Reject {
        investment_id: String,
        #[arg(long)]
        reason: String,
    },
    /// Investments awaiting confirmation
    Pending,
    /// A member's investments
    List { member_id: String },
    /// Investment totals and loan limit for a member
    Summary { member_id: String },
    /// Members ranked by confirmed investments
    Rankings {
        #[arg(long, default_value = "total")]
        basis: BasisArg,
    },
    /// Compute dividends for a year at the declared rates
    CalculateDividends {
        year: i32,
        /// Annual % on share capital
        #[arg(long)]
        share_rate: Decimal,
        /// Annual % on monthly investments
        #[arg(long)]
        monthly_rate: Decimal,
    },
    /// Credit all unpaid dividends of a year
    PayDividends { year: i32 },
    /// Dividends for a year or a member
    Dividends {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        member: Option<String>,
    },
    /// Set a savings target (personal with --member)
    AddTarget {
        name: String,
        amount: Decimal,
        /// Start date (YYYY-MM-DD)
        start: NaiveDate,
        /// End date (YYYY-MM-DD)
        end: NaiveDate,
        #[arg(long, default_value = "annually")]
        period: PeriodArg,
        #[arg(long)]
        member: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Targets visible to the actor, with progress
    Targets,
    /// Recompute progress on every active target
    RefreshTargets,
    /// Retire a target
    DeactivateTarget { target_id: String },
}

#[derive(Subcommand)]
pub enum LoanAction {
    /// Check whether a member may borrow an amount
    Eligibility {
        member_id: String,
        amount: Decimal,
        months: u32,
        #[arg(long)]
        loan_type: Option<String>,
    },
    /// Amortization terms for an amount, annual rate and period
    Terms {
        amount: Decimal,
        rate: Decimal,
        months: u32,
    },
    /// Apply for a loan
    Apply {
        member_id: String,
        amount: Decimal,
        months: u32,
        purpose: String,
        #[arg(long)]
        loan_type: Option<String>,
        /// MEMBER_ID:PERCENT, repeatable
        #[arg(long = "guarantor")]
        guarantors: Vec<String>,
    },
    /// Respond to a guarantee request as the guarantor
    Guarantee {
        loan_id: String,
        guarantor_id: String,
        #[arg(long)]
        decline: bool,
    },
    /// Approve an applied loan
    Approve {
        loan_id: String,
        /// Defaults to the requested amount
        #[arg(long)]
        amount: Option<Decimal>,
        /// Annual rate; defaults to the loan type or policy rate
        #[arg(long)]
        rate: Option<Decimal>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Reject an applied loan
    Reject {
        loan_id: String,
        #[arg(long)]
        reason: String,
    },
    /// Cancel a loan as the borrower
    Cancel { loan_id: String, member_id: String },
    /// Release funds for an approved loan
    Disburse {
        loan_id: String,
        #[arg(long)]
        reference: String,
        #[arg(long)]
        cost: Option<Decimal>,
    },
    /// Submit a repayment as the borrower
    Pay {
        loan_id: String,
        member_id: String,
        amount: Decimal,
        #[arg(long)]
        reference: String,
        #[arg(long)]
        method: Option<String>,
    },
    /// Confirm a submitted repayment
    ConfirmPayment { payment_id: String },
    /// Reject a submitted repayment
    RejectPayment {
        payment_id: String,
        #[arg(long)]
        reason: String,
    },
    /// Show loan details and guarantors
    Show { loan_id: String },
    /// Show the repayment schedule
    Schedule { loan_id: String },
    /// List loans
    List {
        /// applied, approved, disbursed, repaying, closed, rejected, cancelled
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        member: Option<String>,
    },
    /// Guarantee requests waiting on a member
    Guarantees { member_id: String },
    /// Payments awaiting confirmation
    PendingPayments,
    /// Loans with overdue installments
    Overdue {
        /// Defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Assess late penalties on every active loan
    AccruePenalties {
        /// Defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Waive the penalty on one installment
    WaivePenalty { loan_id: String, installment: u32 },
    /// Pledge collateral against an applied or approved loan
    AddCollateral {
        loan_id: String,
        /// property, vehicle, equipment, savings, shares, other
        collateral_type: String,
        value: Decimal,
        description: String,
    },
    /// Verify pledged collateral
    VerifyCollateral {
        collateral_id: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Collateral pledged against a loan
    Collateral { loan_id: String },
    /// Add a note to a loan
    Comment {
        loan_id: String,
        body: String,
        /// general, payment_reminder, follow_up, collection, system
        #[arg(long, default_value = "general")]
        kind: String,
        /// Visible to officers only
        #[arg(long)]
        private: bool,
        #[arg(long)]
        follow_up: Option<NaiveDate>,
    },
    /// Notes on a loan visible to the actor
    Comments { loan_id: String },
    /// Close a follow-up note
    ResolveComment { comment_id: String },
    /// Open follow-ups that are due
    FollowUps {
        /// Defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
}

#[derive(Subcommand)]
pub enum TxAction {
    /// Record a pending cash deposit
    Deposit {
        member_id: String,
        amount: Decimal,
        #[arg(long)]
        reference: Option<String>,
    },
    /// Request a withdrawal (pending until completed)
    Withdraw {
        member_id: String,
        amount: Decimal,
        #[arg(long)]
        reference: Option<String>,
    },
    /// Complete a pending transaction
    Complete { transaction_id: String },
    /// Reverse a confirmed transaction
    Reverse {
        transaction_id: String,
        #[arg(long)]
        reason: String,
    },
    /// Balance breakdown for a member
    Balance { member_id: String },
    /// Statement for a member
    Statement {
        member_id: String,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Check the computed balance against the latest balance stamp
    Reconcile { member_id: String },
    /// Transactions awaiting completion
    Pending,
    /// List transactions
    List {
        #[arg(long)]
        member: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Show the current policy
    Show,
    /// Change one policy value
    Set { key: String, value: String },
    /// List loan types
    LoanTypes {
        #[arg(long)]
        active_only: bool,
    },
    /// Create a loan type
    AddLoanType {
        name: String,
        /// Annual percentage
        rate: Decimal,
        max_amount: Decimal,
        max_months: u32,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value_t = 3)]
        min_membership_months: u32,
        #[arg(long)]
        no_guarantor: bool,
    },
    /// Activate or deactivate a loan type
    ToggleLoanType { loan_type_id: String },
}

#[derive(Subcommand)]
pub enum NotifyAction {
    /// A member's notifications
    List {
        member_id: String,
        #[arg(long)]
        unread: bool,
    },
    /// Mark one notification read
    Read {
        member_id: String,
        notification_id: String,
    },
    /// Mark every notification read
    ReadAll { member_id: String },
    /// Retry failed outbound deliveries
    Retry,
    /// Delete expired notifications
    Cleanup,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum CategoryArg {
    ShareCapital,
    Monthly,
    Special,
}

impl CategoryArg {
    pub fn to_core_type(&self) -> sacco_core::InvestmentCategory {
        match self {
            CategoryArg::ShareCapital => sacco_core::InvestmentCategory::ShareCapital,
            CategoryArg::Monthly => sacco_core::InvestmentCategory::MonthlyInvestment,
            CategoryArg::Special => sacco_core::InvestmentCategory::SpecialDeposit,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PeriodArg {
    Monthly,
    Quarterly,
    Annually,
}

impl PeriodArg {
    pub fn to_core_type(&self) -> sacco_core::TargetPeriod {
        match self {
            PeriodArg::Monthly => sacco_core::TargetPeriod::Monthly,
            PeriodArg::Quarterly => sacco_core::TargetPeriod::Quarterly,
            PeriodArg::Annually => sacco_core::TargetPeriod::Annually,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum BasisArg {
    Total,
    ShareCapital,
}

impl BasisArg {
    pub fn to_core_type(&self) -> sacco_core::RankingBasis {
        match self {
            BasisArg::Total => sacco_core::RankingBasis::Total,
            BasisArg::ShareCapital => sacco_core::RankingBasis::ShareCapital,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ReportFormat {
    Csv,
    Json,
    Markdown,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ReportType {
    Statement,
    Rankings,
    Dividends,
    Portfolio,
    Audit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    init_logging(&config.logging.level);

    if let Err(err) = run(&cli, &config).await {
        let kind = sacco_business::error_kind(&err);
        eprintln!("❌ {} error: {:#}", kind, err);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: &Cli, config: &SaccoConfig) -> Result<()> {
    match &cli.command {
        Commands::Init { force } => {
            db::init_database(config, *force).await?;
            println!("✅ Database initialized at {:?}", config.database.path);
        }

        Commands::Status => {
            db::show_status(config).await?;
        }

        Commands::Member { action } => members::handle(cli, config, action).await?,
        Commands::Invest { action } => investments::handle(cli, config, action).await?,
        Commands::Loan { action } => loans::handle(cli, config, action).await?,
        Commands::Tx { action } => tx::handle(cli, config, action).await?,
        Commands::Settings { action } => settings::handle(cli, config, action).await?,
        Commands::Notify { action } => notify::handle(cli, config, action).await?,

        Commands::Report {
            report_type,
            format,
            output,
            member,
            from,
            to,
            basis,
            year,
        } => {
            let request = report::ReportRequest {
                report_type: *report_type,
                format: *format,
                output: output.clone(),
                member: member.clone(),
                from: *from,
                to: *to,
                basis: *basis,
                year: *year,
            };
            report::generate(config, request).await?;
        }

        Commands::Audit {
            from,
            to,
            types,
            member,
            by,
            financial,
        } => {
            let query = audit::AuditQuery {
                from: *from,
                to: *to,
                types: types.clone().unwrap_or_default(),
                member: member.clone(),
                actor: by.clone(),
                financial_only: *financial,
            };
            audit::run_audit(config, query)?;
        }
    }

    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
