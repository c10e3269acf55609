//! Repository implementations for SQLite
//!
//! CRUD operations for every table. Each function takes any SQLite
//! executor, so the same call works against the pool or inside an open
//! transaction (`&mut *tx`).

use crate::error::{PersistenceError, PersistenceResult};
use crate::sqlite::schema::*;
use chrono::{DateTime, NaiveDate, Utc};
use sacco_core::{
    ApplicationStatus, Delivery, Dividend, Guarantor, Investment, InvestmentStatus,
    InvestmentTarget, Loan, LoanCollateral, LoanComment, LoanPayment, LoanStatus, LoanType, Member,
    MemberApplication, MemberRole, Notification, PaymentStatus, PolicySettings, Transaction,
    MAX_DELIVERY_ATTEMPTS,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteExecutor, SqlitePool};
use std::str::FromStr;

// ============================================================================
// Id sequences
// ============================================================================

/// Next id for a table whose ids look like `{prefix}_{number}`.
///
/// Uses the highest numeric suffix rather than a row count, so deleted rows
/// never cause an id to be reused.
pub async fn next_id<'e, E>(exec: E, table: &str, prefix: &str, width: usize) -> PersistenceResult<String>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        "SELECT COALESCE(MAX(CAST(SUBSTR(id, ?) AS INTEGER)), 0) FROM {} WHERE id LIKE ?",
        table
    );
    let last: i64 = sqlx::query_scalar(&sql)
        .bind(prefix.len() as i64 + 2)
        .bind(format!("{}_%", prefix))
        .fetch_one(exec)
        .await?;
    Ok(format!("{}_{:0width$}", prefix, last + 1, width = width))
}

// ============================================================================
// Member Repository
// ============================================================================

/// Repository for the members table
pub struct MemberRepo;

impl MemberRepo {
    pub async fn insert<'e, E: SqliteExecutor<'e>>(exec: E, member: &Member) -> PersistenceResult<()> {
        let row = MemberRow::from(member);
        sqlx::query(
            r#"
            INSERT INTO members (id, member_number, role, kyc_status, standing, full_name, email,
                                 phone, id_number, address, employment_status, next_of_kin,
                                 next_of_kin_phone, approved_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.member_number)
        .bind(&row.role)
        .bind(&row.kyc_status)
        .bind(&row.standing)
        .bind(&row.full_name)
        .bind(&row.email)
        .bind(&row.phone)
        .bind(&row.id_number)
        .bind(&row.address)
        .bind(&row.employment_status)
        .bind(&row.next_of_kin)
        .bind(&row.next_of_kin_phone)
        .bind(row.approved_at)
        .bind(row.created_at)
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn update<'e, E: SqliteExecutor<'e>>(exec: E, member: &Member) -> PersistenceResult<()> {
        let row = MemberRow::from(member);
        let result = sqlx::query(
            r#"
            UPDATE members SET member_number = ?, role = ?, kyc_status = ?, standing = ?,
                   full_name = ?, email = ?, phone = ?, id_number = ?, address = ?,
                   employment_status = ?, next_of_kin = ?, next_of_kin_phone = ?, approved_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&row.member_number)
        .bind(&row.role)
        .bind(&row.kyc_status)
        .bind(&row.standing)
        .bind(&row.full_name)
        .bind(&row.email)
        .bind(&row.phone)
        .bind(&row.id_number)
        .bind(&row.address)
        .bind(&row.employment_status)
        .bind(&row.next_of_kin)
        .bind(&row.next_of_kin_phone)
        .bind(row.approved_at)
        .bind(&row.id)
        .execute(exec)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::not_found("Member", &member.id));
        }
        Ok(())
    }

    pub async fn get_by_id<'e, E: SqliteExecutor<'e>>(exec: E, id: &str) -> PersistenceResult<Member> {
        sqlx::query_as::<_, MemberRow>("SELECT * FROM members WHERE id = ?")
            .bind(id)
            .fetch_optional(exec)
            .await?
            .ok_or_else(|| PersistenceError::not_found("Member", id))?
            .try_into()
    }

    pub async fn find_by_email<'e, E: SqliteExecutor<'e>>(exec: E, email: &str) -> PersistenceResult<Option<Member>> {
        sqlx::query_as::<_, MemberRow>("SELECT * FROM members WHERE email = ?")
            .bind(email.trim().to_lowercase())
            .fetch_optional(exec)
            .await?
            .map(Member::try_from)
            .transpose()
    }

    pub async fn list_all<'e, E: SqliteExecutor<'e>>(exec: E) -> PersistenceResult<Vec<Member>> {
        let rows = sqlx::query_as::<_, MemberRow>("SELECT * FROM members ORDER BY id")
            .fetch_all(exec)
            .await?;
        rows.into_iter().map(Member::try_from).collect()
    }

    pub async fn list_by_role<'e, E: SqliteExecutor<'e>>(exec: E, role: MemberRole) -> PersistenceResult<Vec<Member>> {
        let rows = sqlx::query_as::<_, MemberRow>("SELECT * FROM members WHERE role = ? ORDER BY id")
            .bind(role.as_str())
            .fetch_all(exec)
            .await?;
        rows.into_iter().map(Member::try_from).collect()
    }

    /// Membership numbers already issued in `year`
    pub async fn count_numbered<'e, E: SqliteExecutor<'e>>(exec: E, year: i32) -> PersistenceResult<u32> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM members WHERE member_number LIKE ?")
            .bind(format!("SACCO-{}-%", year))
            .fetch_one(exec)
            .await?;
        Ok(count as u32)
    }
}

// ============================================================================
// Application Repository
// ============================================================================

/// Repository for the applications table
pub struct ApplicationRepo;

impl ApplicationRepo {
    pub async fn insert<'e, E: SqliteExecutor<'e>>(exec: E, application: &MemberApplication) -> PersistenceResult<()> {
        let row = ApplicationRow::from(application);
        sqlx::query(
            r#"
            INSERT INTO applications (id, full_name, email, phone, id_number, address,
                                      employment_status, next_of_kin, next_of_kin_phone, status,
                                      reviewed_by, reviewed_at, admin_notes, rejection_reason,
                                      required_information, member_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.full_name)
        .bind(&row.email)
        .bind(&row.phone)
        .bind(&row.id_number)
        .bind(&row.address)
        .bind(&row.employment_status)
        .bind(&row.next_of_kin)
        .bind(&row.next_of_kin_phone)
        .bind(&row.status)
        .bind(&row.reviewed_by)
        .bind(row.reviewed_at)
        .bind(&row.admin_notes)
        .bind(&row.rejection_reason)
        .bind(&row.required_information)
        .bind(&row.member_id)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn update<'e, E: SqliteExecutor<'e>>(exec: E, application: &MemberApplication) -> PersistenceResult<()> {
        let row = ApplicationRow::from(application);
        let result = sqlx::query(
            r#"
            UPDATE applications SET full_name = ?, email = ?, phone = ?, id_number = ?, address = ?,
                   employment_status = ?, next_of_kin = ?, next_of_kin_phone = ?, status = ?,
                   reviewed_by = ?, reviewed_at = ?, admin_notes = ?, rejection_reason = ?,
                   required_information = ?, member_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&row.full_name)
        .bind(&row.email)
        .bind(&row.phone)
        .bind(&row.id_number)
        .bind(&row.address)
        .bind(&row.employment_status)
        .bind(&row.next_of_kin)
        .bind(&row.next_of_kin_phone)
        .bind(&row.status)
        .bind(&row.reviewed_by)
        .bind(row.reviewed_at)
        .bind(&row.admin_notes)
        .bind(&row.rejection_reason)
        .bind(&row.required_information)
        .bind(&row.member_id)
        .bind(row.updated_at)
        .bind(&row.id)
        .execute(exec)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::not_found("Application", &application.id));
        }
        Ok(())
    }

    pub async fn get_by_id<'e, E: SqliteExecutor<'e>>(exec: E, id: &str) -> PersistenceResult<MemberApplication> {
        sqlx::query_as::<_, ApplicationRow>("SELECT * FROM applications WHERE id = ?")
            .bind(id)
            .fetch_optional(exec)
            .await?
            .ok_or_else(|| PersistenceError::not_found("Application", id))?
            .try_into()
    }

    /// Applications in a given status, oldest first; all when `status` is None
    pub async fn list<'e, E: SqliteExecutor<'e>>(
        exec: E,
        status: Option<ApplicationStatus>,
    ) -> PersistenceResult<Vec<MemberApplication>> {
        let rows = match status {
            Some(s) => {
                sqlx::query_as::<_, ApplicationRow>(
                    "SELECT * FROM applications WHERE status = ? ORDER BY created_at, id",
                )
                .bind(s.as_str())
                .fetch_all(exec)
                .await?
            }
            None => {
                sqlx::query_as::<_, ApplicationRow>("SELECT * FROM applications ORDER BY created_at, id")
                    .fetch_all(exec)
                    .await?
            }
        };
        rows.into_iter().map(MemberApplication::try_from).collect()
    }

    /// An application for this email that is still awaiting a decision
    pub async fn find_open_by_email<'e, E: SqliteExecutor<'e>>(
        exec: E,
        email: &str,
    ) -> PersistenceResult<Option<MemberApplication>> {
        sqlx::query_as::<_, ApplicationRow>(
            "SELECT * FROM applications WHERE email = ? AND status IN ('pending', 'more_info_required') LIMIT 1",
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(exec)
        .await?
        .map(MemberApplication::try_from)
        .transpose()
    }
}

// ============================================================================
// Investment Repository
// ============================================================================

/// Repository for the investments table
pub struct InvestmentRepo;

impl InvestmentRepo {
    pub async fn insert<'e, E: SqliteExecutor<'e>>(exec: E, investment: &Investment) -> PersistenceResult<()> {
        let row = InvestmentRow::from(investment);
        sqlx::query(
            r#"
            INSERT INTO investments (id, member_id, category, amount, reference, payment_method,
                                     status, notes, confirmed_by, confirmed_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.member_id)
        .bind(&row.category)
        .bind(&row.amount)
        .bind(&row.reference)
        .bind(&row.payment_method)
        .bind(&row.status)
        .bind(&row.notes)
        .bind(&row.confirmed_by)
        .bind(row.confirmed_at)
        .bind(row.created_at)
        .execute(exec)
        .await?;
        Ok(())
    }

    /// Persist a review decision. Only a pending row can be decided, so a
    /// concurrent second confirmation fails with `StaleUpdate`.
    pub async fn record_decision<'e, E: SqliteExecutor<'e>>(exec: E, investment: &Investment) -> PersistenceResult<()> {
        let row = InvestmentRow::from(investment);
        let result = sqlx::query(
            r#"
            UPDATE investments SET status = ?, notes = ?, confirmed_by = ?, confirmed_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(&row.status)
        .bind(&row.notes)
        .bind(&row.confirmed_by)
        .bind(row.confirmed_at)
        .bind(&row.id)
        .execute(exec)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::stale("Investment", &investment.id, "pending"));
        }
        Ok(())
    }

    pub async fn get_by_id<'e, E: SqliteExecutor<'e>>(exec: E, id: &str) -> PersistenceResult<Investment> {
        sqlx::query_as::<_, InvestmentRow>("SELECT * FROM investments WHERE id = ?")
            .bind(id)
            .fetch_optional(exec)
            .await?
            .ok_or_else(|| PersistenceError::not_found("Investment", id))?
            .try_into()
    }

    pub async fn list_by_member<'e, E: SqliteExecutor<'e>>(exec: E, member_id: &str) -> PersistenceResult<Vec<Investment>> {
        let rows = sqlx::query_as::<_, InvestmentRow>(
            "SELECT * FROM investments WHERE member_id = ? ORDER BY created_at, id",
        )
        .bind(member_id)
        .fetch_all(exec)
        .await?;
        rows.into_iter().map(Investment::try_from).collect()
    }

    pub async fn list_by_status<'e, E: SqliteExecutor<'e>>(
        exec: E,
        status: InvestmentStatus,
    ) -> PersistenceResult<Vec<Investment>> {
        let rows = sqlx::query_as::<_, InvestmentRow>(
            "SELECT * FROM investments WHERE status = ? ORDER BY created_at, id",
        )
        .bind(status.as_str())
        .fetch_all(exec)
        .await?;
        rows.into_iter().map(Investment::try_from).collect()
    }
}

// ============================================================================
// Settings Repository
// ============================================================================

/// Repository for the single-row settings table
pub struct SettingsRepo;

impl SettingsRepo {
    /// Stored settings, or None before the first save
    pub async fn get<'e, E: SqliteExecutor<'e>>(exec: E) -> PersistenceResult<Option<PolicySettings>> {
        let data: Option<String> = sqlx::query_scalar("SELECT data FROM settings WHERE id = 1")
            .fetch_optional(exec)
            .await?;
        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    pub async fn save<'e, E: SqliteExecutor<'e>>(exec: E, settings: &PolicySettings) -> PersistenceResult<()> {
        let data = serde_json::to_string(settings)?;
        sqlx::query(
            r#"
            INSERT INTO settings (id, data, updated_at) VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            "#,
        )
        .bind(data)
        .bind(settings.updated_at.unwrap_or_else(Utc::now))
        .execute(exec)
        .await?;
        Ok(())
    }
}

// ============================================================================
// Loan Type Repository
// ============================================================================

/// Repository for the loan_types table
pub struct LoanTypeRepo;

impl LoanTypeRepo {
    pub async fn insert<'e, E: SqliteExecutor<'e>>(exec: E, loan_type: &LoanType) -> PersistenceResult<()> {
        let row = LoanTypeRow::from(loan_type);
        sqlx::query(
            r#"
            INSERT INTO loan_types (id, name, description, interest_rate, maximum_amount,
                                    maximum_period_months, minimum_membership_months,
                                    requires_guarantor, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.name)
        .bind(&row.description)
        .bind(&row.interest_rate)
        .bind(&row.maximum_amount)
        .bind(row.maximum_period_months)
        .bind(row.minimum_membership_months)
        .bind(row.requires_guarantor)
        .bind(row.is_active)
        .bind(row.created_at)
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn update<'e, E: SqliteExecutor<'e>>(exec: E, loan_type: &LoanType) -> PersistenceResult<()> {
        let row = LoanTypeRow::from(loan_type);
        let result = sqlx::query(
            r#"
            UPDATE loan_types SET name = ?, description = ?, interest_rate = ?, maximum_amount = ?,
                   maximum_period_months = ?, minimum_membership_months = ?,
                   requires_guarantor = ?, is_active = ?
            WHERE id = ?
            "#,
        )
        .bind(&row.name)
        .bind(&row.description)
        .bind(&row.interest_rate)
        .bind(&row.maximum_amount)
        .bind(row.maximum_period_months)
        .bind(row.minimum_membership_months)
        .bind(row.requires_guarantor)
        .bind(row.is_active)
        .bind(&row.id)
        .execute(exec)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::not_found("LoanType", &loan_type.id));
        }
        Ok(())
    }

    pub async fn get_by_id<'e, E: SqliteExecutor<'e>>(exec: E, id: &str) -> PersistenceResult<LoanType> {
        sqlx::query_as::<_, LoanTypeRow>("SELECT * FROM loan_types WHERE id = ?")
            .bind(id)
            .fetch_optional(exec)
            .await?
            .ok_or_else(|| PersistenceError::not_found("LoanType", id))?
            .try_into()
    }

    pub async fn list<'e, E: SqliteExecutor<'e>>(exec: E, active_only: bool) -> PersistenceResult<Vec<LoanType>> {
        let rows = sqlx::query_as::<_, LoanTypeRow>(
            "SELECT * FROM loan_types WHERE is_active = 1 OR ? = 0 ORDER BY name",
        )
        .bind(active_only)
        .fetch_all(exec)
        .await?;
        rows.into_iter().map(LoanType::try_from).collect()
    }
}

// ============================================================================
// Loan Repository
// ============================================================================

/// Repository for the loans table
pub struct LoanRepo;

impl LoanRepo {
    pub async fn insert<'e, E: SqliteExecutor<'e>>(exec: E, loan: &Loan) -> PersistenceResult<()> {
        let row = LoanRow::try_from(loan)?;
        sqlx::query(
            r#"
            INSERT INTO loans (id, loan_number, member_id, loan_type_id, requested_amount,
                               approved_amount, interest_rate, period_months, purpose, status,
                               monthly_payment, total_repayment, total_interest, schedule,
                               reviewed_by, reviewed_at, admin_notes, rejection_reason,
                               disbursement_reference, disbursement_cost, disbursed_by,
                               disbursed_at, disbursement_transaction_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.loan_number)
        .bind(&row.member_id)
        .bind(&row.loan_type_id)
        .bind(&row.requested_amount)
        .bind(&row.approved_amount)
        .bind(&row.interest_rate)
        .bind(row.period_months)
        .bind(&row.purpose)
        .bind(&row.status)
        .bind(&row.monthly_payment)
        .bind(&row.total_repayment)
        .bind(&row.total_interest)
        .bind(&row.schedule)
        .bind(&row.reviewed_by)
        .bind(row.reviewed_at)
        .bind(&row.admin_notes)
        .bind(&row.rejection_reason)
        .bind(&row.disbursement_reference)
        .bind(&row.disbursement_cost)
        .bind(&row.disbursed_by)
        .bind(row.disbursed_at)
        .bind(&row.disbursement_transaction_id)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(exec)
        .await?;
        Ok(())
    }

    /// Write back a loan whose status was `expected` when it was read.
    ///
    /// Returns `StaleUpdate` when another writer moved the loan first.
    pub async fn update<'e, E: SqliteExecutor<'e>>(
        exec: E,
        loan: &Loan,
        expected: LoanStatus,
    ) -> PersistenceResult<()> {
        let row = LoanRow::try_from(loan)?;
        let result = sqlx::query(
            r#"
            UPDATE loans SET loan_number = ?, loan_type_id = ?, approved_amount = ?, interest_rate = ?,
                   status = ?, monthly_payment = ?, total_repayment = ?, total_interest = ?,
                   schedule = ?, reviewed_by = ?, reviewed_at = ?, admin_notes = ?,
                   rejection_reason = ?, disbursement_reference = ?, disbursement_cost = ?,
                   disbursed_by = ?, disbursed_at = ?, disbursement_transaction_id = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(&row.loan_number)
        .bind(&row.loan_type_id)
        .bind(&row.approved_amount)
        .bind(&row.interest_rate)
        .bind(&row.status)
        .bind(&row.monthly_payment)
        .bind(&row.total_repayment)
        .bind(&row.total_interest)
        .bind(&row.schedule)
        .bind(&row.reviewed_by)
        .bind(row.reviewed_at)
        .bind(&row.admin_notes)
        .bind(&row.rejection_reason)
        .bind(&row.disbursement_reference)
        .bind(&row.disbursement_cost)
        .bind(&row.disbursed_by)
        .bind(row.disbursed_at)
        .bind(&row.disbursement_transaction_id)
        .bind(row.updated_at)
        .bind(&row.id)
        .bind(expected.as_str())
        .execute(exec)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::stale("Loan", &loan.id, expected.as_str()));
        }
        Ok(())
    }

    pub async fn get_by_id<'e, E: SqliteExecutor<'e>>(exec: E, id: &str) -> PersistenceResult<Loan> {
        sqlx::query_as::<_, LoanRow>("SELECT * FROM loans WHERE id = ?")
            .bind(id)
            .fetch_optional(exec)
            .await?
            .ok_or_else(|| PersistenceError::not_found("Loan", id))?
            .try_into()
    }

    pub async fn list_by_member<'e, E: SqliteExecutor<'e>>(exec: E, member_id: &str) -> PersistenceResult<Vec<Loan>> {
        let rows = sqlx::query_as::<_, LoanRow>("SELECT * FROM loans WHERE member_id = ? ORDER BY created_at, id")
            .bind(member_id)
            .fetch_all(exec)
            .await?;
        rows.into_iter().map(Loan::try_from).collect()
    }

    /// Loans in any of the given statuses, oldest first
    pub async fn list_by_statuses<'e, E: SqliteExecutor<'e>>(
        exec: E,
        statuses: &[LoanStatus],
    ) -> PersistenceResult<Vec<Loan>> {
        let wanted: Vec<&str> = statuses.iter().map(LoanStatus::as_str).collect();
        let rows = sqlx::query_as::<_, LoanRow>("SELECT * FROM loans ORDER BY created_at, id")
            .fetch_all(exec)
            .await?;
        rows.into_iter()
            .filter(|r| wanted.contains(&r.status.as_str()))
            .map(Loan::try_from)
            .collect()
    }

    pub async fn list_all<'e, E: SqliteExecutor<'e>>(exec: E) -> PersistenceResult<Vec<Loan>> {
        let rows = sqlx::query_as::<_, LoanRow>("SELECT * FROM loans ORDER BY created_at, id")
            .fetch_all(exec)
            .await?;
        rows.into_iter().map(Loan::try_from).collect()
    }

    /// Ids of the member's loans that are applied, approved, disbursed or repaying
    pub async fn in_progress_for_member<'e, E: SqliteExecutor<'e>>(
        exec: E,
        member_id: &str,
    ) -> PersistenceResult<Vec<String>> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT id FROM loans
            WHERE member_id = ? AND status IN ('applied', 'approved', 'disbursed', 'repaying')
            ORDER BY id
            "#,
        )
        .bind(member_id)
        .fetch_all(exec)
        .await?;
        Ok(ids)
    }

    /// Loan numbers already issued in `year`
    pub async fn count_numbered<'e, E: SqliteExecutor<'e>>(exec: E, year: i32) -> PersistenceResult<u32> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE loan_number LIKE ?")
            .bind(format!("LN-{}-%", year))
            .fetch_one(exec)
            .await?;
        Ok(count as u32)
    }
}

// ============================================================================
// Guarantor Repository
// ============================================================================

/// Repository for the guarantors table
pub struct GuarantorRepo;

impl GuarantorRepo {
    pub async fn insert<'e, E: SqliteExecutor<'e>>(exec: E, guarantor: &Guarantor) -> PersistenceResult<()> {
        let row = GuarantorRow::from(guarantor);
        sqlx::query(
            r#"
            INSERT INTO guarantors (loan_id, guarantor_id, percentage, status, responded_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.loan_id)
        .bind(&row.guarantor_id)
        .bind(&row.percentage)
        .bind(&row.status)
        .bind(row.responded_at)
        .bind(row.created_at)
        .execute(exec)
        .await?;
        Ok(())
    }

    /// Persist a guarantor's answer; only pending pledges can change
    pub async fn record_response<'e, E: SqliteExecutor<'e>>(exec: E, guarantor: &Guarantor) -> PersistenceResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE guarantors SET status = ?, responded_at = ?
            WHERE loan_id = ? AND guarantor_id = ? AND status = 'pending'
            "#,
        )
        .bind(guarantor.status.as_str())
        .bind(guarantor.responded_at)
        .bind(&guarantor.loan_id)
        .bind(&guarantor.guarantor_id)
        .execute(exec)
        .await?;

        if result.rows_affected() == 0 {
            let id = format!("{}/{}", guarantor.loan_id, guarantor.guarantor_id);
            return Err(PersistenceError::stale("Guarantor", &id, "pending"));
        }
        Ok(())
    }

    pub async fn get<'e, E: SqliteExecutor<'e>>(
        exec: E,
        loan_id: &str,
        guarantor_id: &str,
    ) -> PersistenceResult<Guarantor> {
        sqlx::query_as::<_, GuarantorRow>("SELECT * FROM guarantors WHERE loan_id = ? AND guarantor_id = ?")
            .bind(loan_id)
            .bind(guarantor_id)
            .fetch_optional(exec)
            .await?
            .ok_or_else(|| PersistenceError::not_found("Guarantor", &format!("{}/{}", loan_id, guarantor_id)))?
            .try_into()
    }

    pub async fn list_for_loan<'e, E: SqliteExecutor<'e>>(exec: E, loan_id: &str) -> PersistenceResult<Vec<Guarantor>> {
        let rows = sqlx::query_as::<_, GuarantorRow>(
            "SELECT * FROM guarantors WHERE loan_id = ? ORDER BY guarantor_id",
        )
        .bind(loan_id)
        .fetch_all(exec)
        .await?;
        rows.into_iter().map(Guarantor::try_from).collect()
    }

    /// Pledges a member has been asked to give
    pub async fn list_for_guarantor<'e, E: SqliteExecutor<'e>>(
        exec: E,
        guarantor_id: &str,
    ) -> PersistenceResult<Vec<Guarantor>> {
        let rows = sqlx::query_as::<_, GuarantorRow>(
            "SELECT * FROM guarantors WHERE guarantor_id = ? ORDER BY created_at, loan_id",
        )
        .bind(guarantor_id)
        .fetch_all(exec)
        .await?;
        rows.into_iter().map(Guarantor::try_from).collect()
    }
}

// ============================================================================
// Payment Repository
// ============================================================================

/// Repository for the loan_payments table
pub struct PaymentRepo;

impl PaymentRepo {
    pub async fn insert<'e, E: SqliteExecutor<'e>>(exec: E, payment: &LoanPayment) -> PersistenceResult<()> {
        let row = LoanPaymentRow::try_from(payment)?;
        sqlx::query(
            r#"
            INSERT INTO loan_payments (id, loan_id, member_id, amount, reference, payment_method,
                                       status, allocations, confirmed_by, confirmed_at,
                                       rejection_reason, transaction_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.loan_id)
        .bind(&row.member_id)
        .bind(&row.amount)
        .bind(&row.reference)
        .bind(&row.payment_method)
        .bind(&row.status)
        .bind(&row.allocations)
        .bind(&row.confirmed_by)
        .bind(row.confirmed_at)
        .bind(&row.rejection_reason)
        .bind(&row.transaction_id)
        .bind(row.created_at)
        .execute(exec)
        .await?;
        Ok(())
    }

    /// Persist a confirm / reject decision on a pending payment
    pub async fn record_decision<'e, E: SqliteExecutor<'e>>(exec: E, payment: &LoanPayment) -> PersistenceResult<()> {
        let row = LoanPaymentRow::try_from(payment)?;
        let result = sqlx::query(
            r#"
            UPDATE loan_payments SET status = ?, allocations = ?, confirmed_by = ?, confirmed_at = ?,
                   rejection_reason = ?, transaction_id = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(&row.status)
        .bind(&row.allocations)
        .bind(&row.confirmed_by)
        .bind(row.confirmed_at)
        .bind(&row.rejection_reason)
        .bind(&row.transaction_id)
        .bind(&row.id)
        .execute(exec)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::stale("LoanPayment", &payment.id, "pending"));
        }
        Ok(())
    }

    pub async fn get_by_id<'e, E: SqliteExecutor<'e>>(exec: E, id: &str) -> PersistenceResult<LoanPayment> {
        sqlx::query_as::<_, LoanPaymentRow>("SELECT * FROM loan_payments WHERE id = ?")
            .bind(id)
            .fetch_optional(exec)
            .await?
            .ok_or_else(|| PersistenceError::not_found("LoanPayment", id))?
            .try_into()
    }

    pub async fn list_for_loan<'e, E: SqliteExecutor<'e>>(exec: E, loan_id: &str) -> PersistenceResult<Vec<LoanPayment>> {
        let rows = sqlx::query_as::<_, LoanPaymentRow>(
            "SELECT * FROM loan_payments WHERE loan_id = ? ORDER BY created_at, id",
        )
        .bind(loan_id)
        .fetch_all(exec)
        .await?;
        rows.into_iter().map(LoanPayment::try_from).collect()
    }

    pub async fn list_by_status<'e, E: SqliteExecutor<'e>>(
        exec: E,
        status: PaymentStatus,
    ) -> PersistenceResult<Vec<LoanPayment>> {
        let rows = sqlx::query_as::<_, LoanPaymentRow>(
            "SELECT * FROM loan_payments WHERE status = ? ORDER BY created_at, id",
        )
        .bind(status.as_str())
        .fetch_all(exec)
        .await?;
        rows.into_iter().map(LoanPayment::try_from).collect()
    }
}

// ============================================================================
// Transaction Repository
// ============================================================================

/// Repository for the append-only transactions table
pub struct TransactionRepo;

impl TransactionRepo {
    pub async fn insert<'e, E: SqliteExecutor<'e>>(exec: E, tx: &Transaction) -> PersistenceResult<()> {
        let row = TransactionRow::from(tx);
        sqlx::query(
            r#"
            INSERT INTO transactions (id, member_id, tx_type, category, direction, amount, currency,
                                      description, reference, status, balance_before, balance_after,
                                      investment_id, loan_id, payment_id, reverses_id,
                                      processed_by, processed_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.member_id)
        .bind(&row.tx_type)
        .bind(&row.category)
        .bind(&row.direction)
        .bind(&row.amount)
        .bind(&row.currency)
        .bind(&row.description)
        .bind(&row.reference)
        .bind(&row.status)
        .bind(&row.balance_before)
        .bind(&row.balance_after)
        .bind(&row.investment_id)
        .bind(&row.loan_id)
        .bind(&row.payment_id)
        .bind(&row.reverses_id)
        .bind(&row.processed_by)
        .bind(row.processed_at)
        .bind(row.created_at)
        .execute(exec)
        .await?;
        Ok(())
    }

    /// Record the pending → confirmed step. Nothing else on a ledger row
    /// is ever updated.
    pub async fn record_completion<'e, E: SqliteExecutor<'e>>(exec: E, tx: &Transaction) -> PersistenceResult<()> {
        let row = TransactionRow::from(tx);
        let result = sqlx::query(
            r#"
            UPDATE transactions SET status = ?, balance_before = ?, balance_after = ?,
                   processed_by = ?, processed_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(&row.status)
        .bind(&row.balance_before)
        .bind(&row.balance_after)
        .bind(&row.processed_by)
        .bind(row.processed_at)
        .bind(&row.id)
        .execute(exec)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::stale("Transaction", &tx.id, "pending"));
        }
        Ok(())
    }

    pub async fn get_by_id<'e, E: SqliteExecutor<'e>>(exec: E, id: &str) -> PersistenceResult<Transaction> {
        sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE id = ?")
            .bind(id)
            .fetch_optional(exec)
            .await?
            .ok_or_else(|| PersistenceError::not_found("Transaction", id))?
            .try_into()
    }

    /// A member's entries in ledger order
    pub async fn list_by_member<'e, E: SqliteExecutor<'e>>(exec: E, member_id: &str) -> PersistenceResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM transactions WHERE member_id = ? ORDER BY created_at, rowid",
        )
        .bind(member_id)
        .fetch_all(exec)
        .await?;
        rows.into_iter().map(Transaction::try_from).collect()
    }

    pub async fn list_all<'e, E: SqliteExecutor<'e>>(exec: E) -> PersistenceResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions ORDER BY created_at, rowid")
            .fetch_all(exec)
            .await?;
        rows.into_iter().map(Transaction::try_from).collect()
    }

    pub async fn list_pending<'e, E: SqliteExecutor<'e>>(exec: E) -> PersistenceResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM transactions WHERE status = 'pending' ORDER BY created_at, rowid",
        )
        .fetch_all(exec)
        .await?;
        rows.into_iter().map(Transaction::try_from).collect()
    }

    /// The compensating entry for `id`, if one was posted
    pub async fn find_reversal_of<'e, E: SqliteExecutor<'e>>(exec: E, id: &str) -> PersistenceResult<Option<Transaction>> {
        sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE reverses_id = ?")
            .bind(id)
            .fetch_optional(exec)
            .await?
            .map(Transaction::try_from)
            .transpose()
    }
}

// ============================================================================
// Notification Repository
// ============================================================================

/// Repository for the notifications table
pub struct NotificationRepo;

impl NotificationRepo {
    pub async fn insert<'e, E: SqliteExecutor<'e>>(exec: E, notification: &Notification) -> PersistenceResult<()> {
        let row = NotificationRow::from(notification);
        sqlx::query(
            r#"
            INSERT INTO notifications (id, recipient_id, kind, category, title, message, is_read,
                                       read_at, related_type, related_id, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.recipient_id)
        .bind(&row.kind)
        .bind(&row.category)
        .bind(&row.title)
        .bind(&row.message)
        .bind(row.is_read)
        .bind(row.read_at)
        .bind(&row.related_type)
        .bind(&row.related_id)
        .bind(row.expires_at)
        .bind(row.created_at)
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn get_by_id<'e, E: SqliteExecutor<'e>>(exec: E, id: &str) -> PersistenceResult<Notification> {
        sqlx::query_as::<_, NotificationRow>("SELECT * FROM notifications WHERE id = ?")
            .bind(id)
            .fetch_optional(exec)
            .await?
            .ok_or_else(|| PersistenceError::not_found("Notification", id))?
            .try_into()
    }

    /// Newest first
    pub async fn list_for_recipient<'e, E: SqliteExecutor<'e>>(
        exec: E,
        recipient_id: &str,
        unread_only: bool,
    ) -> PersistenceResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT * FROM notifications
            WHERE recipient_id = ? AND (is_read = 0 OR ? = 0)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(recipient_id)
        .bind(unread_only)
        .fetch_all(exec)
        .await?;
        rows.into_iter().map(Notification::try_from).collect()
    }

    pub async fn mark_read<'e, E: SqliteExecutor<'e>>(exec: E, id: &str, at: DateTime<Utc>) -> PersistenceResult<()> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, read_at = COALESCE(read_at, ?) WHERE id = ?",
        )
        .bind(at)
        .bind(id)
        .execute(exec)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::not_found("Notification", id));
        }
        Ok(())
    }

    /// Returns how many notifications changed
    pub async fn mark_all_read<'e, E: SqliteExecutor<'e>>(
        exec: E,
        recipient_id: &str,
        at: DateTime<Utc>,
    ) -> PersistenceResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, read_at = ? WHERE recipient_id = ? AND is_read = 0",
        )
        .bind(at)
        .bind(recipient_id)
        .execute(exec)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_unread<'e, E: SqliteExecutor<'e>>(exec: E, recipient_id: &str) -> PersistenceResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = 0",
        )
        .bind(recipient_id)
        .fetch_one(exec)
        .await?;
        Ok(count as u64)
    }

    /// Remove notifications past their expiry; their deliveries cascade
    pub async fn delete_expired<'e, E: SqliteExecutor<'e>>(exec: E, now: DateTime<Utc>) -> PersistenceResult<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE expires_at IS NOT NULL AND expires_at <= ?")
            .bind(now)
            .execute(exec)
            .await?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// Delivery Repository
// ============================================================================

/// Repository for the deliveries table
pub struct DeliveryRepo;

impl DeliveryRepo {
    pub async fn insert<'e, E: SqliteExecutor<'e>>(exec: E, delivery: &Delivery) -> PersistenceResult<()> {
        let row = DeliveryRow::from(delivery);
        sqlx::query(
            r#"
            INSERT INTO deliveries (id, notification_id, recipient_id, channel, destination, status,
                                    attempts, last_error, sent_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.notification_id)
        .bind(&row.recipient_id)
        .bind(&row.channel)
        .bind(&row.destination)
        .bind(&row.status)
        .bind(row.attempts)
        .bind(&row.last_error)
        .bind(row.sent_at)
        .bind(row.created_at)
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn update<'e, E: SqliteExecutor<'e>>(exec: E, delivery: &Delivery) -> PersistenceResult<()> {
        let row = DeliveryRow::from(delivery);
        let result = sqlx::query(
            "UPDATE deliveries SET status = ?, attempts = ?, last_error = ?, sent_at = ? WHERE id = ?",
        )
        .bind(&row.status)
        .bind(row.attempts)
        .bind(&row.last_error)
        .bind(row.sent_at)
        .bind(&row.id)
        .execute(exec)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::not_found("Delivery", &delivery.id));
        }
        Ok(())
    }

    /// Pending deliveries that still have attempts left
    pub async fn list_retryable<'e, E: SqliteExecutor<'e>>(exec: E) -> PersistenceResult<Vec<Delivery>> {
        let rows = sqlx::query_as::<_, DeliveryRow>(
            "SELECT * FROM deliveries WHERE status = 'pending' AND attempts < ? ORDER BY created_at, id",
        )
        .bind(MAX_DELIVERY_ATTEMPTS as i64)
        .fetch_all(exec)
        .await?;
        rows.into_iter().map(Delivery::try_from).collect()
    }

    pub async fn list_for_notification<'e, E: SqliteExecutor<'e>>(
        exec: E,
        notification_id: &str,
    ) -> PersistenceResult<Vec<Delivery>> {
        let rows = sqlx::query_as::<_, DeliveryRow>(
            "SELECT * FROM deliveries WHERE notification_id = ? ORDER BY id",
        )
        .bind(notification_id)
        .fetch_all(exec)
        .await?;
        rows.into_iter().map(Delivery::try_from).collect()
    }
}

// ============================================================================
// Dividend Repository
// ============================================================================

/// Repository for the dividends table
pub struct DividendRepo;

impl DividendRepo {
    /// Insert or recompute the dividend for (year, member). A paid row is
    /// left untouched.
    pub async fn save_calculation<'e, E: SqliteExecutor<'e>>(exec: E, dividend: &Dividend) -> PersistenceResult<()> {
        let row = DividendRow::from(dividend);
        sqlx::query(
            r#"
            INSERT INTO dividends (id, year, member_id, share_capital_amount, monthly_investment_amount,
                                   share_capital_rate, monthly_investment_rate, share_capital_dividend,
                                   monthly_investment_dividend, total_dividend, status, calculated_by,
                                   calculated_at, paid_by, paid_at, transaction_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(year, member_id) DO UPDATE SET
                share_capital_amount = excluded.share_capital_amount,
                monthly_investment_amount = excluded.monthly_investment_amount,
                share_capital_rate = excluded.share_capital_rate,
                monthly_investment_rate = excluded.monthly_investment_rate,
                share_capital_dividend = excluded.share_capital_dividend,
                monthly_investment_dividend = excluded.monthly_investment_dividend,
                total_dividend = excluded.total_dividend,
                calculated_by = excluded.calculated_by,
                calculated_at = excluded.calculated_at
            WHERE dividends.status = 'calculated'
            "#,
        )
        .bind(&row.id)
        .bind(row.year)
        .bind(&row.member_id)
        .bind(&row.share_capital_amount)
        .bind(&row.monthly_investment_amount)
        .bind(&row.share_capital_rate)
        .bind(&row.monthly_investment_rate)
        .bind(&row.share_capital_dividend)
        .bind(&row.monthly_investment_dividend)
        .bind(&row.total_dividend)
        .bind(&row.status)
        .bind(&row.calculated_by)
        .bind(row.calculated_at)
        .bind(&row.paid_by)
        .bind(row.paid_at)
        .bind(&row.transaction_id)
        .execute(exec)
        .await?;
        Ok(())
    }

    /// Mark a calculated dividend as paid
    pub async fn record_payment<'e, E: SqliteExecutor<'e>>(exec: E, dividend: &Dividend) -> PersistenceResult<()> {
        let row = DividendRow::from(dividend);
        let result = sqlx::query(
            r#"
            UPDATE dividends SET status = ?, paid_by = ?, paid_at = ?, transaction_id = ?
            WHERE id = ? AND status = 'calculated'
            "#,
        )
        .bind(&row.status)
        .bind(&row.paid_by)
        .bind(row.paid_at)
        .bind(&row.transaction_id)
        .bind(&row.id)
        .execute(exec)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::stale("Dividend", &dividend.id, "calculated"));
        }
        Ok(())
    }

    /// Remove a calculated dividend that no longer applies
    pub async fn delete_calculated<'e, E: SqliteExecutor<'e>>(exec: E, id: &str) -> PersistenceResult<()> {
        sqlx::query("DELETE FROM dividends WHERE id = ? AND status = 'calculated'")
            .bind(id)
            .execute(exec)
            .await?;
        Ok(())
    }

    pub async fn find<'e, E: SqliteExecutor<'e>>(
        exec: E,
        year: i32,
        member_id: &str,
    ) -> PersistenceResult<Option<Dividend>> {
        sqlx::query_as::<_, DividendRow>("SELECT * FROM dividends WHERE year = ? AND member_id = ?")
            .bind(i64::from(year))
            .bind(member_id)
            .fetch_optional(exec)
            .await?
            .map(Dividend::try_from)
            .transpose()
    }

    pub async fn list_for_year<'e, E: SqliteExecutor<'e>>(exec: E, year: i32) -> PersistenceResult<Vec<Dividend>> {
        let rows = sqlx::query_as::<_, DividendRow>("SELECT * FROM dividends WHERE year = ? ORDER BY member_id")
            .bind(i64::from(year))
            .fetch_all(exec)
            .await?;
        rows.into_iter().map(Dividend::try_from).collect()
    }

    pub async fn list_by_member<'e, E: SqliteExecutor<'e>>(exec: E, member_id: &str) -> PersistenceResult<Vec<Dividend>> {
        let rows = sqlx::query_as::<_, DividendRow>("SELECT * FROM dividends WHERE member_id = ? ORDER BY year")
            .bind(member_id)
            .fetch_all(exec)
            .await?;
        rows.into_iter().map(Dividend::try_from).collect()
    }
}

// ============================================================================
// Target Repository
// ============================================================================

/// Repository for the investment_targets table
pub struct TargetRepo;

impl TargetRepo {
    pub async fn insert<'e, E: SqliteExecutor<'e>>(exec: E, target: &InvestmentTarget) -> PersistenceResult<()> {
        let row = TargetRow::from(target);
        sqlx::query(
            r#"
            INSERT INTO investment_targets (id, scope, name, description, target_amount, period,
                                            member_id, start_date, end_date, current_amount,
                                            is_active, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.scope)
        .bind(&row.name)
        .bind(&row.description)
        .bind(&row.target_amount)
        .bind(&row.period)
        .bind(&row.member_id)
        .bind(row.start_date)
        .bind(row.end_date)
        .bind(&row.current_amount)
        .bind(row.is_active)
        .bind(&row.created_by)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(exec)
        .await?;
        Ok(())
    }

    /// Persist refreshed progress and activity
    pub async fn update<'e, E: SqliteExecutor<'e>>(exec: E, target: &InvestmentTarget) -> PersistenceResult<()> {
        let row = TargetRow::from(target);
        let result = sqlx::query(
            "UPDATE investment_targets SET current_amount = ?, is_active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&row.current_amount)
        .bind(row.is_active)
        .bind(row.updated_at)
        .bind(&row.id)
        .execute(exec)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::not_found("InvestmentTarget", &target.id));
        }
        Ok(())
    }

    pub async fn get_by_id<'e, E: SqliteExecutor<'e>>(exec: E, id: &str) -> PersistenceResult<InvestmentTarget> {
        sqlx::query_as::<_, TargetRow>("SELECT * FROM investment_targets WHERE id = ?")
            .bind(id)
            .fetch_optional(exec)
            .await?
            .ok_or_else(|| PersistenceError::not_found("InvestmentTarget", id))?
            .try_into()
    }

    pub async fn list<'e, E: SqliteExecutor<'e>>(exec: E, active_only: bool) -> PersistenceResult<Vec<InvestmentTarget>> {
        let sql = if active_only {
            "SELECT * FROM investment_targets WHERE is_active = 1 ORDER BY id"
        } else {
            "SELECT * FROM investment_targets ORDER BY id"
        };
        let rows = sqlx::query_as::<_, TargetRow>(sql).fetch_all(exec).await?;
        rows.into_iter().map(InvestmentTarget::try_from).collect()
    }

    /// Active targets a member can see: their own plus SACCO-wide ones
    pub async fn list_visible_to<'e, E: SqliteExecutor<'e>>(
        exec: E,
        member_id: &str,
    ) -> PersistenceResult<Vec<InvestmentTarget>> {
        let rows = sqlx::query_as::<_, TargetRow>(
            r#"
            SELECT * FROM investment_targets
            WHERE is_active = 1 AND (member_id = ? OR scope = 'sacco_wide')
            ORDER BY id
            "#,
        )
        .bind(member_id)
        .fetch_all(exec)
        .await?;
        rows.into_iter().map(InvestmentTarget::try_from).collect()
    }
}

// ============================================================================
// Collateral Repository
// ============================================================================

/// Repository for the loan_collateral table
pub struct CollateralRepo;

impl CollateralRepo {
    pub async fn insert<'e, E: SqliteExecutor<'e>>(exec: E, collateral: &LoanCollateral) -> PersistenceResult<()> {
        let row = CollateralRow::from(collateral);
        sqlx::query(
            r#"
            INSERT INTO loan_collateral (id, loan_id, collateral_type, description, estimated_value,
                                         is_verified, verified_by, verified_at, verification_notes,
                                         created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.loan_id)
        .bind(&row.collateral_type)
        .bind(&row.description)
        .bind(&row.estimated_value)
        .bind(row.is_verified)
        .bind(&row.verified_by)
        .bind(row.verified_at)
        .bind(&row.verification_notes)
        .bind(row.created_at)
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn record_verification<'e, E: SqliteExecutor<'e>>(
        exec: E,
        collateral: &LoanCollateral,
    ) -> PersistenceResult<()> {
        let row = CollateralRow::from(collateral);
        let result = sqlx::query(
            r#"
            UPDATE loan_collateral SET is_verified = ?, verified_by = ?, verified_at = ?, verification_notes = ?
            WHERE id = ? AND is_verified = 0
            "#,
        )
        .bind(row.is_verified)
        .bind(&row.verified_by)
        .bind(row.verified_at)
        .bind(&row.verification_notes)
        .bind(&row.id)
        .execute(exec)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::stale("LoanCollateral", &collateral.id, "unverified"));
        }
        Ok(())
    }

    pub async fn get_by_id<'e, E: SqliteExecutor<'e>>(exec: E, id: &str) -> PersistenceResult<LoanCollateral> {
        sqlx::query_as::<_, CollateralRow>("SELECT * FROM loan_collateral WHERE id = ?")
            .bind(id)
            .fetch_optional(exec)
            .await?
            .ok_or_else(|| PersistenceError::not_found("LoanCollateral", id))?
            .try_into()
    }

    pub async fn list_for_loan<'e, E: SqliteExecutor<'e>>(exec: E, loan_id: &str) -> PersistenceResult<Vec<LoanCollateral>> {
        let rows = sqlx::query_as::<_, CollateralRow>("SELECT * FROM loan_collateral WHERE loan_id = ? ORDER BY id")
            .bind(loan_id)
            .fetch_all(exec)
            .await?;
        rows.into_iter().map(LoanCollateral::try_from).collect()
    }
}

// ============================================================================
// Comment Repository
// ============================================================================

/// Repository for the loan_comments table
pub struct CommentRepo;

impl CommentRepo {
    pub async fn insert<'e, E: SqliteExecutor<'e>>(exec: E, comment: &LoanComment) -> PersistenceResult<()> {
        let row = CommentRow::from(comment);
        sqlx::query(
            r#"
            INSERT INTO loan_comments (id, loan_id, kind, body, created_by, is_private,
                                       follow_up_date, is_resolved, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.loan_id)
        .bind(&row.kind)
        .bind(&row.body)
        .bind(&row.created_by)
        .bind(row.is_private)
        .bind(row.follow_up_date)
        .bind(row.is_resolved)
        .bind(row.created_at)
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn mark_resolved<'e, E: SqliteExecutor<'e>>(exec: E, id: &str) -> PersistenceResult<()> {
        let result = sqlx::query("UPDATE loan_comments SET is_resolved = 1 WHERE id = ? AND is_resolved = 0")
            .bind(id)
            .execute(exec)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::stale("LoanComment", id, "open"));
        }
        Ok(())
    }

    pub async fn get_by_id<'e, E: SqliteExecutor<'e>>(exec: E, id: &str) -> PersistenceResult<LoanComment> {
        sqlx::query_as::<_, CommentRow>("SELECT * FROM loan_comments WHERE id = ?")
            .bind(id)
            .fetch_optional(exec)
            .await?
            .ok_or_else(|| PersistenceError::not_found("LoanComment", id))?
            .try_into()
    }

    pub async fn list_for_loan<'e, E: SqliteExecutor<'e>>(exec: E, loan_id: &str) -> PersistenceResult<Vec<LoanComment>> {
        let rows = sqlx::query_as::<_, CommentRow>(
            "SELECT * FROM loan_comments WHERE loan_id = ? ORDER BY created_at, id",
        )
        .bind(loan_id)
        .fetch_all(exec)
        .await?;
        rows.into_iter().map(LoanComment::try_from).collect()
    }

    /// Open follow-ups due on or before `as_of`
    pub async fn list_due<'e, E: SqliteExecutor<'e>>(exec: E, as_of: NaiveDate) -> PersistenceResult<Vec<LoanComment>> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT * FROM loan_comments
            WHERE is_resolved = 0 AND follow_up_date IS NOT NULL AND follow_up_date <= ?
            ORDER BY follow_up_date, id
            "#,
        )
        .bind(as_of)
        .fetch_all(exec)
        .await?;
        rows.into_iter().map(LoanComment::try_from).collect()
    }
}

// ============================================================================
// Database initialization
// ============================================================================

/// Open a connection pool
pub async fn create_pool(database_url: &str) -> PersistenceResult<SqlitePool> {
    let pool = SqlitePool::connect(database_url).await?;
    Ok(pool)
}

/// Run migrations
pub async fn run_migrations(pool: &SqlitePool) -> PersistenceResult<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// Open (creating if needed) a database and bring its schema up to date
pub async fn init_database(database_url: &str) -> PersistenceResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(options).await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Fresh in-memory database with the full schema.
///
/// A single connection keeps every query on the same memory database.
pub async fn init_memory_database() -> PersistenceResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use chrono::TimeZone;
    use sacco_core::{
        DividendRates, InvestmentCategory, MemberProfile, TargetPeriod, TargetScope, TransactionType,
    };

    async fn pool_with_member() -> SqlitePool {
        let pool = init_memory_database().await.unwrap();
        let profile = MemberProfile::new("Jane Wanjiru", "jane@example.com", "0712345678", "12345678");
        let member = Member::approved("MEM_0001", "SACCO-2026-0001", profile, Utc::now());
        MemberRepo::insert(&pool, &member).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_membership_numbers_counted_per_year() {
        let pool = pool_with_member().await;
        let profile = MemberProfile::new("Peter Kamau", "peter@example.com", "0712345679", "12345679");
        let member = Member::approved("MEM_0002", "SACCO-2027-0001", profile, Utc::now());
        MemberRepo::insert(&pool, &member).await.unwrap();

        assert_eq!(MemberRepo::count_numbered(&pool, 2026).await.unwrap(), 1);
        assert_eq!(MemberRepo::count_numbered(&pool, 2027).await.unwrap(), 1);
        assert_eq!(MemberRepo::count_numbered(&pool, 2028).await.unwrap(), 0);
        assert_eq!(LoanRepo::count_numbered(&pool, 2026).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_next_id_uses_highest_suffix() {
        let pool = pool_with_member().await;
        assert_eq!(next_id(&pool, "members", "MEM", 4).await.unwrap(), "MEM_0002");
        assert_eq!(next_id(&pool, "investments", "INV", 6).await.unwrap(), "INV_000001");
    }

    #[tokio::test]
    async fn test_member_roundtrip_and_email_lookup() {
        let pool = pool_with_member().await;

        let member = MemberRepo::get_by_id(&pool, "MEM_0001").await.unwrap();
        assert_eq!(member.profile.full_name, "Jane Wanjiru");

        let found = MemberRepo::find_by_email(&pool, "JANE@example.com ").await.unwrap();
        assert!(found.is_some());
        assert_eq!(MemberRepo::count_numbered(&pool, 2026).await.unwrap(), 1);

        let err = MemberRepo::get_by_id(&pool, "MEM_0404").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_investment_decision_only_once() {
        let pool = pool_with_member().await;
        let mut inv = Investment::new("INV_000001", "MEM_0001", InvestmentCategory::ShareCapital, dec!(100)).unwrap();
        InvestmentRepo::insert(&pool, &inv).await.unwrap();

        inv.confirm("MEM_0001", Utc::now()).unwrap();
        InvestmentRepo::record_decision(&pool, &inv).await.unwrap();

        let err = InvestmentRepo::record_decision(&pool, &inv).await.unwrap_err();
        assert!(matches!(err, PersistenceError::StaleUpdate { .. }));

        let stored = InvestmentRepo::get_by_id(&pool, "INV_000001").await.unwrap();
        assert_eq!(stored.status, InvestmentStatus::Confirmed);
        assert_eq!(stored.amount, dec!(100));
    }

    #[tokio::test]
    async fn test_transactions_cannot_be_deleted() {
        let pool = pool_with_member().await;
        let tx = Transaction::new("MEM_0001", TransactionType::Deposit, dec!(50), "KES", "cash").unwrap();
        TransactionRepo::insert(&pool, &tx).await.unwrap();

        let result = sqlx::query("DELETE FROM transactions WHERE id = ?")
            .bind(&tx.id)
            .execute(&pool)
            .await;
        assert!(result.is_err());
        assert_eq!(TransactionRepo::list_by_member(&pool, "MEM_0001").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_completion_is_guarded() {
        let pool = pool_with_member().await;
        let mut tx = Transaction::new("MEM_0001", TransactionType::Deposit, dec!(50), "KES", "cash").unwrap();
        TransactionRepo::insert(&pool, &tx).await.unwrap();

        tx.complete("MEM_0001", dec!(0), Utc::now()).unwrap();
        TransactionRepo::record_completion(&pool, &tx).await.unwrap();
        assert!(TransactionRepo::record_completion(&pool, &tx).await.is_err());

        let stored = TransactionRepo::get_by_id(&pool, &tx.id).await.unwrap();
        assert_eq!(stored.balance_after, Some(dec!(50)));
    }

    #[tokio::test]
    async fn test_settings_upsert() {
        let pool = init_memory_database().await.unwrap();
        assert!(SettingsRepo::get(&pool).await.unwrap().is_none());

        let mut settings = PolicySettings::default();
        SettingsRepo::save(&pool, &settings).await.unwrap();
        settings.loan_multiplier = dec!(4);
        SettingsRepo::save(&pool, &settings).await.unwrap();

        let stored = SettingsRepo::get(&pool).await.unwrap().unwrap();
        assert_eq!(stored.loan_multiplier, dec!(4));
    }

    #[tokio::test]
    async fn test_paid_dividend_is_not_recalculated() {
        let pool = pool_with_member().await;
        let mut inv = Investment::new("INV_000001", "MEM_0001", InvestmentCategory::ShareCapital, dec!(1000)).unwrap();
        inv.confirm("MEM_0001", Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap()).unwrap();
        let investments = vec![inv];

        let rates = DividendRates::new(dec!(10), dec!(5)).unwrap();
        let mut dividend =
            Dividend::calculate("DIV_000001", 2025, "MEM_0001", &investments, rates, "MEM_0001", Utc::now()).unwrap();
        DividendRepo::save_calculation(&pool, &dividend).await.unwrap();

        dividend.mark_paid("MEM_0001", "DIV-20260101000000-ABC123", Utc::now()).unwrap();
        DividendRepo::record_payment(&pool, &dividend).await.unwrap();
        assert!(DividendRepo::record_payment(&pool, &dividend).await.is_err());

        let higher = DividendRates::new(dec!(20), dec!(5)).unwrap();
        let recalculated =
            Dividend::calculate("DIV_000002", 2025, "MEM_0001", &investments, higher, "MEM_0001", Utc::now()).unwrap();
        DividendRepo::save_calculation(&pool, &recalculated).await.unwrap();

        let stored = DividendRepo::find(&pool, 2025, "MEM_0001").await.unwrap().unwrap();
        assert_eq!(stored.id, "DIV_000001");
        assert!(stored.is_paid());
        assert_eq!(stored.total_dividend, dec!(100));
        assert_eq!(DividendRepo::list_for_year(&pool, 2025).await.unwrap().len(), 1);
        assert!(DividendRepo::list_for_year(&pool, 2024).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_targets_visible_to_member() {
        let pool = pool_with_member().await;
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
        let own = InvestmentTarget::new(
            "TGT_0001", TargetScope::Personal, "School fees", dec!(50000), TargetPeriod::Annually,
            Some("MEM_0001"), start, end, "MEM_0001",
        )
        .unwrap();
        let mut shared = InvestmentTarget::new(
            "TGT_0002", TargetScope::SaccoWide, "Plot purchase", dec!(2000000), TargetPeriod::Annually,
            None, start, end, "MEM_0001",
        )
        .unwrap();
        TargetRepo::insert(&pool, &own).await.unwrap();
        TargetRepo::insert(&pool, &shared).await.unwrap();

        assert_eq!(TargetRepo::list_visible_to(&pool, "MEM_0001").await.unwrap().len(), 2);
        assert_eq!(TargetRepo::list_visible_to(&pool, "MEM_0009").await.unwrap().len(), 1);

        shared.deactivate(Utc::now()).unwrap();
        TargetRepo::update(&pool, &shared).await.unwrap();
        assert_eq!(TargetRepo::list(&pool, true).await.unwrap().len(), 1);

        let stored = TargetRepo::get_by_id(&pool, "TGT_0001").await.unwrap();
        assert_eq!(stored.start_date, start);
        assert_eq!(stored.target_amount, dec!(50000));
    }
}
