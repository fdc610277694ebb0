use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::{postgres::PgRow, types::Json, PgConnection, PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use super::{
    FinancialReport, LateFee, LateFeeFilter, Lease, LeaseFilter, LedgerStore,
    NewFinancialReport, NewLateFee, NewPayment, NewReminder, Payment, PaymentFilter,
    PaymentReminder, PaymentStatus, PaymentType, Property, ReminderFilter, ReminderOutcome,
    ReminderStatus, ReportType, Settlement, Tenant,
};
use crate::{
    error::{AppError, AppResult},
    services::policy::LateFeeRules,
    tenancy::BusinessId,
};

/// PostgreSQL ledger. Rows come back as `row_to_json(t)` and are decoded
/// with serde, so struct fields mirror column names.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_all<T: DeserializeOwned>(
        &self,
        mut query: QueryBuilder<'_, Postgres>,
    ) -> AppResult<Vec<T>> {
        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;
        read_rows(rows).into_iter().map(decode_row).collect()
    }

    async fn fetch_optional<T: DeserializeOwned>(
        &self,
        mut query: QueryBuilder<'_, Postgres>,
    ) -> AppResult<Option<T>> {
        let row = query
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        row.and_then(read_row).map(decode_row).transpose()
    }

    async fn fetch_one<T: DeserializeOwned>(
        &self,
        query: QueryBuilder<'_, Postgres>,
        not_found: &str,
    ) -> AppResult<T> {
        self.fetch_optional(query)
            .await?
            .ok_or_else(|| AppError::NotFound(not_found.to_string()))
    }
}

fn select_from(table: &'static str, business: BusinessId) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query
        .push(table)
        .push(" t WHERE t.business_id = ")
        .push_bind(business.as_uuid());
    query
}

fn select_by_id(
    table: &'static str,
    business: BusinessId,
    id: Uuid,
) -> QueryBuilder<'static, Postgres> {
    let mut query = select_from(table, business);
    query.push(" AND t.id = ").push_bind(id).push(" LIMIT 1");
    query
}

fn push_text_any(query: &mut QueryBuilder<'_, Postgres>, column: &str, values: Vec<String>) {
    if values.is_empty() {
        return;
    }
    query
        .push(" AND t.")
        .push(column)
        .push(" = ANY(")
        .push_bind(values)
        .push(")");
}

fn push_payment_filter(
    query: &mut QueryBuilder<'_, Postgres>,
    business: BusinessId,
    filter: &PaymentFilter,
) {
    if let Some(lease_id) = filter.lease_id {
        query.push(" AND t.lease_id = ").push_bind(lease_id);
    }
    if let Some(tenant_id) = filter.tenant_id {
        query
            .push(" AND t.lease_id IN (SELECT l.id FROM leases l WHERE l.business_id = ")
            .push_bind(business.as_uuid())
            .push(" AND l.tenant_id = ")
            .push_bind(tenant_id)
            .push(")");
    }
    push_text_any(
        query,
        "status",
        filter.statuses.iter().map(|s| s.as_str().to_string()).collect(),
    );
    push_text_any(
        query,
        "payment_type",
        filter
            .payment_types
            .iter()
            .map(|kind| kind.as_str().to_string())
            .collect(),
    );
    if let Some(bound) = filter.due_before {
        query.push(" AND t.due_date < ").push_bind(bound);
    }
    if let Some(bound) = filter.due_from {
        query.push(" AND t.due_date >= ").push_bind(bound);
    }
    if let Some(bound) = filter.due_to {
        query.push(" AND t.due_date <= ").push_bind(bound);
    }
    if let Some(bound) = filter.paid_from {
        query.push(" AND t.payment_date >= ").push_bind(bound);
    }
    if let Some(bound) = filter.paid_to {
        query.push(" AND t.payment_date <= ").push_bind(bound);
    }
}

fn push_late_fee_filter(
    query: &mut QueryBuilder<'_, Postgres>,
    business: BusinessId,
    filter: &LateFeeFilter,
) {
    if let Some(payment_id) = filter.payment_id {
        query.push(" AND t.payment_id = ").push_bind(payment_id);
    }
    if let Some(lease_id) = filter.lease_id {
        query
            .push(" AND t.payment_id IN (SELECT p.id FROM payments p WHERE p.business_id = ")
            .push_bind(business.as_uuid())
            .push(" AND p.lease_id = ")
            .push_bind(lease_id)
            .push(")");
    }
    push_text_any(
        query,
        "status",
        filter.statuses.iter().map(|s| s.as_str().to_string()).collect(),
    );
    if let Some(bound) = filter.fee_date_from {
        query.push(" AND t.fee_date >= ").push_bind(bound);
    }
    if let Some(bound) = filter.fee_date_to {
        query.push(" AND t.fee_date <= ").push_bind(bound);
    }
}

fn push_reminder_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &ReminderFilter) {
    if let Some(payment_id) = filter.payment_id {
        query.push(" AND t.payment_id = ").push_bind(payment_id);
    }
    push_text_any(
        query,
        "status",
        filter.statuses.iter().map(|s| s.as_str().to_string()).collect(),
    );
    if let Some(kind) = filter.reminder_type {
        query
            .push(" AND t.reminder_type = ")
            .push_bind(kind.as_str());
    }
    if let Some(bound) = filter.scheduled_until {
        query.push(" AND t.scheduled_at <= ").push_bind(bound);
    }
    if let Some(bound) = filter.sent_since {
        query.push(" AND t.sent_at >= ").push_bind(bound);
    }
    if let Some(bound) = filter.created_since {
        query.push(" AND t.created_at >= ").push_bind(bound);
    }
}

fn insert_reminder_query(business: BusinessId, reminder: NewReminder) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::<Postgres>::new(
        "INSERT INTO payment_reminders (business_id, payment_id, reminder_type, scheduled_at, subject, message, status) VALUES (",
    );
    {
        let mut values = query.separated(", ");
        values.push_bind(business.as_uuid());
        values.push_bind(reminder.payment_id);
        values.push_bind(reminder.reminder_type.as_str());
        values.push_bind(reminder.scheduled_at);
        values.push_bind(reminder.subject);
        values.push_bind(reminder.message);
        values.push_bind(ReminderStatus::Pending.as_str());
    }
    query.push(") RETURNING row_to_json(payment_reminders.*) AS row");
    query
}

async fn payment_exists(
    conn: &mut PgConnection,
    business: BusinessId,
    payment_id: Uuid,
    lock: bool,
) -> AppResult<bool> {
    let mut query = QueryBuilder::<Postgres>::new("SELECT 1 AS present FROM payments WHERE id = ");
    query
        .push_bind(payment_id)
        .push(" AND business_id = ")
        .push_bind(business.as_uuid());
    if lock {
        query.push(" FOR UPDATE");
    }
    let row = query
        .build()
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_db_error)?;
    Ok(row.is_some())
}

#[async_trait]
impl LedgerStore for PgLedger {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn business_exists(&self, business: BusinessId) -> AppResult<bool> {
        let row = sqlx::query("SELECT 1 AS present FROM businesses WHERE id = $1 LIMIT 1")
            .bind(business.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(row.is_some())
    }

    async fn list_business_ids(&self) -> AppResult<Vec<BusinessId>> {
        let rows = sqlx::query("SELECT id FROM businesses ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.try_get::<Uuid, _>("id").ok())
            .map(BusinessId::new)
            .collect())
    }

    async fn list_properties(&self, business: BusinessId) -> AppResult<Vec<Property>> {
        let mut query = select_from("properties", business);
        query.push(" ORDER BY t.title ASC");
        self.fetch_all(query).await
    }

    async fn get_tenant(&self, business: BusinessId, tenant_id: Uuid) -> AppResult<Tenant> {
        self.fetch_one(select_by_id("tenants", business, tenant_id), "Tenant not found.")
            .await
    }

    async fn list_tenants(
        &self,
        business: BusinessId,
        active_only: bool,
    ) -> AppResult<Vec<Tenant>> {
        let mut query = select_from("tenants", business);
        if active_only {
            query.push(" AND t.is_active");
        }
        query.push(" ORDER BY t.last_name ASC, t.first_name ASC");
        self.fetch_all(query).await
    }

    async fn get_lease(&self, business: BusinessId, lease_id: Uuid) -> AppResult<Lease> {
        self.fetch_one(select_by_id("leases", business, lease_id), "Lease not found.")
            .await
    }

    async fn list_leases(
        &self,
        business: BusinessId,
        filter: &LeaseFilter,
    ) -> AppResult<Vec<Lease>> {
        let mut query = select_from("leases", business);
        if let Some(lease_id) = filter.lease_id {
            query.push(" AND t.id = ").push_bind(lease_id);
        }
        if let Some(tenant_id) = filter.tenant_id {
            query.push(" AND t.tenant_id = ").push_bind(tenant_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND t.status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY t.start_date ASC, t.id ASC");
        self.fetch_all(query).await
    }

    async fn set_lease_fee_rules(
        &self,
        business: BusinessId,
        lease_id: Uuid,
        rules: Option<LateFeeRules>,
    ) -> AppResult<Lease> {
        let mut query = QueryBuilder::<Postgres>::new("UPDATE leases t SET late_fee_rules = ");
        query
            .push_bind(rules.map(Json))
            .push(", updated_at = now() WHERE t.id = ")
            .push_bind(lease_id)
            .push(" AND t.business_id = ")
            .push_bind(business.as_uuid())
            .push(" RETURNING row_to_json(t) AS row");
        self.fetch_one(query, "Lease not found.").await
    }

    async fn get_payment(&self, business: BusinessId, payment_id: Uuid) -> AppResult<Payment> {
        self.fetch_one(
            select_by_id("payments", business, payment_id),
            "Payment not found.",
        )
        .await
    }

    async fn list_payments(
        &self,
        business: BusinessId,
        filter: &PaymentFilter,
    ) -> AppResult<Vec<Payment>> {
        let mut query = select_from("payments", business);
        push_payment_filter(&mut query, business, filter);
        query.push(" ORDER BY t.due_date ASC, t.created_at ASC");
        self.fetch_all(query).await
    }

    async fn insert_payment(
        &self,
        business: BusinessId,
        payment: NewPayment,
    ) -> AppResult<Payment> {
        // The lease must belong to the same business; the SELECT yields no
        // row otherwise and nothing is inserted.
        let mut query = QueryBuilder::<Postgres>::new(
            "INSERT INTO payments (business_id, lease_id, amount, payment_type, payment_date, due_date, status, payment_method, transaction_id, description, notes) SELECT ",
        );
        {
            let mut values = query.separated(", ");
            values.push_bind(business.as_uuid());
            values.push_bind(payment.lease_id);
            values.push_bind(payment.amount);
            values.push_bind(payment.payment_type.as_str());
            values.push_bind(payment.payment_date);
            values.push_bind(payment.due_date);
            values.push_bind(payment.status.as_str());
            values.push_bind(payment.payment_method);
            values.push_bind(payment.transaction_id);
            values.push_bind(payment.description);
            values.push_bind(payment.notes);
        }
        query
            .push(" FROM leases l WHERE l.id = ")
            .push_bind(payment.lease_id)
            .push(" AND l.business_id = ")
            .push_bind(business.as_uuid())
            .push(" RETURNING row_to_json(payments.*) AS row");
        self.fetch_one(query, "Lease not found.").await
    }

    async fn ensure_pending_rent(
        &self,
        business: BusinessId,
        lease_id: Uuid,
        due_date: NaiveDate,
        amount: Decimal,
    ) -> AppResult<Payment> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        // Lock the lease row so concurrent passes for the same lease serialize.
        let lease = sqlx::query("SELECT id FROM leases WHERE id = $1 AND business_id = $2 FOR UPDATE")
            .bind(lease_id)
            .bind(business.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_db_error)?;
        if lease.is_none() {
            return Err(AppError::NotFound("Lease not found.".to_string()));
        }

        let mut existing = select_from("payments", business);
        existing
            .push(" AND t.lease_id = ")
            .push_bind(lease_id)
            .push(" AND t.payment_type = ")
            .push_bind(PaymentType::Rent.as_str())
            .push(" AND t.due_date = ")
            .push_bind(due_date)
            .push(" AND t.status IN ('pending', 'completed') ORDER BY t.created_at ASC LIMIT 1");
        let found = existing
            .build()
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_db_error)?
            .and_then(read_row);
        if let Some(row) = found {
            tx.commit().await.map_err(map_db_error)?;
            return decode_row(row);
        }

        let mut insert = QueryBuilder::<Postgres>::new(
            "INSERT INTO payments (business_id, lease_id, amount, payment_type, due_date, status, description) VALUES (",
        );
        {
            let mut values = insert.separated(", ");
            values.push_bind(business.as_uuid());
            values.push_bind(lease_id);
            values.push_bind(amount);
            values.push_bind(PaymentType::Rent.as_str());
            values.push_bind(due_date);
            values.push_bind(PaymentStatus::Pending.as_str());
            values.push_bind(format!("Rent due {due_date}"));
        }
        insert.push(") RETURNING row_to_json(payments.*) AS row");
        let created = insert
            .build()
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_db_error)?
            .and_then(read_row)
            .ok_or_else(|| AppError::Internal("Could not create payments record.".to_string()))?;
        tx.commit().await.map_err(map_db_error)?;
        decode_row(created)
    }

    async fn settle_payment(
        &self,
        business: BusinessId,
        payment_id: Uuid,
        settlement: Settlement,
    ) -> AppResult<Payment> {
        let mut query = QueryBuilder::<Postgres>::new("UPDATE payments t SET status = ");
        query
            .push_bind(PaymentStatus::Completed.as_str())
            .push(", amount = ")
            .push_bind(settlement.amount)
            .push(", payment_date = ")
            .push_bind(settlement.payment_date)
            .push(", payment_method = ")
            .push_bind(settlement.payment_method)
            .push(", transaction_id = ")
            .push_bind(settlement.transaction_id)
            .push(", notes = CASE WHEN ")
            .push_bind(settlement.notes.clone())
            .push(" = '' THEN t.notes ELSE ")
            .push_bind(settlement.notes)
            .push(" END, updated_at = now() WHERE t.id = ")
            .push_bind(payment_id)
            .push(" AND t.business_id = ")
            .push_bind(business.as_uuid())
            .push(" AND t.status = ")
            .push_bind(PaymentStatus::Pending.as_str())
            .push(" RETURNING row_to_json(t) AS row");
        if let Some(updated) = self.fetch_optional(query).await? {
            return Ok(updated);
        }
        self.get_payment(business, payment_id).await?;
        Err(AppError::Conflict(
            "Payment is no longer pending.".to_string(),
        ))
    }

    async fn update_payment_status(
        &self,
        business: BusinessId,
        payment_id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
        notes: Option<String>,
    ) -> AppResult<Payment> {
        let mut query = QueryBuilder::<Postgres>::new("UPDATE payments t SET status = ");
        query
            .push_bind(to.as_str())
            .push(", notes = COALESCE(")
            .push_bind(notes)
            .push(", t.notes), updated_at = now() WHERE t.id = ")
            .push_bind(payment_id)
            .push(" AND t.business_id = ")
            .push_bind(business.as_uuid())
            .push(" AND t.status = ")
            .push_bind(from.as_str())
            .push(" RETURNING row_to_json(t) AS row");
        if let Some(updated) = self.fetch_optional(query).await? {
            return Ok(updated);
        }
        let current = self.get_payment(business, payment_id).await?;
        Err(AppError::Conflict(format!(
            "Payment status changed concurrently; now '{}'.",
            current.status.as_str()
        )))
    }

    async fn get_late_fee(&self, business: BusinessId, late_fee_id: Uuid) -> AppResult<LateFee> {
        self.fetch_one(
            select_by_id("late_fees", business, late_fee_id),
            "Late fee not found.",
        )
        .await
    }

    async fn list_late_fees(
        &self,
        business: BusinessId,
        filter: &LateFeeFilter,
    ) -> AppResult<Vec<LateFee>> {
        let mut query = select_from("late_fees", business);
        push_late_fee_filter(&mut query, business, filter);
        query.push(" ORDER BY t.fee_date ASC, t.created_at ASC");
        self.fetch_all(query).await
    }

    async fn insert_late_fee_if_absent(
        &self,
        business: BusinessId,
        fee: NewLateFee,
    ) -> AppResult<Option<LateFee>> {
        let payment_id = fee.payment_id;
        let mut query = QueryBuilder::<Postgres>::new(
            "INSERT INTO late_fees (business_id, payment_id, amount, days_overdue, fee_date, status, waive_reason) SELECT ",
        );
        {
            let mut values = query.separated(", ");
            values.push_bind(business.as_uuid());
            values.push_bind(fee.payment_id);
            values.push_bind(fee.amount);
            values.push_bind(fee.days_overdue);
            values.push_bind(fee.fee_date);
            values.push_bind(fee.status.as_str());
            values.push_bind(fee.waive_reason);
        }
        query
            .push(" WHERE EXISTS (SELECT 1 FROM payments p WHERE p.id = ")
            .push_bind(payment_id)
            .push(" AND p.business_id = ")
            .push_bind(business.as_uuid())
            .push(") ON CONFLICT (payment_id) DO NOTHING RETURNING row_to_json(late_fees.*) AS row");

        if let Some(created) = self.fetch_optional(query).await? {
            return Ok(Some(created));
        }
        // Nothing inserted: either the payment is foreign or it already has a fee.
        self.get_payment(business, payment_id).await?;
        Ok(None)
    }

    async fn waive_late_fee(
        &self,
        business: BusinessId,
        late_fee_id: Uuid,
        waive_reason: String,
    ) -> AppResult<LateFee> {
        let mut query = QueryBuilder::<Postgres>::new("UPDATE late_fees t SET status = 'waived', waive_reason = ");
        query
            .push_bind(waive_reason)
            .push(", updated_at = now() WHERE t.id = ")
            .push_bind(late_fee_id)
            .push(" AND t.business_id = ")
            .push_bind(business.as_uuid())
            .push(" AND t.status <> 'waived' RETURNING row_to_json(t) AS row");
        if let Some(updated) = self.fetch_optional(query).await? {
            return Ok(updated);
        }
        self.get_late_fee(business, late_fee_id).await?;
        Err(AppError::Conflict("Late fee already waived".to_string()))
    }

    async fn list_reminders(
        &self,
        business: BusinessId,
        filter: &ReminderFilter,
    ) -> AppResult<Vec<PaymentReminder>> {
        let mut query = select_from("payment_reminders", business);
        push_reminder_filter(&mut query, filter);
        query.push(" ORDER BY t.scheduled_at ASC, t.created_at ASC");
        self.fetch_all(query).await
    }

    async fn insert_reminder(
        &self,
        business: BusinessId,
        reminder: NewReminder,
    ) -> AppResult<PaymentReminder> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        if !payment_exists(&mut *tx, business, reminder.payment_id, false).await? {
            return Err(AppError::NotFound("Payment not found.".to_string()));
        }
        let created = insert_reminder_query(business, reminder)
            .build()
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_db_error)?
            .and_then(read_row)
            .ok_or_else(|| AppError::Internal("Could not create payment_reminders record.".to_string()))?;
        tx.commit().await.map_err(map_db_error)?;
        decode_row(created)
    }

    async fn replace_pending_reminders(
        &self,
        business: BusinessId,
        payment_id: Uuid,
        reminders: Vec<NewReminder>,
    ) -> AppResult<Vec<PaymentReminder>> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        if !payment_exists(&mut *tx, business, payment_id, true).await? {
            return Err(AppError::NotFound("Payment not found.".to_string()));
        }

        sqlx::query(
            "DELETE FROM payment_reminders WHERE business_id = $1 AND payment_id = $2 AND status = 'pending'",
        )
        .bind(business.as_uuid())
        .bind(payment_id)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        let mut created = Vec::with_capacity(reminders.len());
        for reminder in reminders {
            let row = insert_reminder_query(business, reminder)
                .build()
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_db_error)?
                .and_then(read_row)
                .ok_or_else(|| {
                    AppError::Internal("Could not create payment_reminders record.".to_string())
                })?;
            created.push(decode_row(row)?);
        }
        tx.commit().await.map_err(map_db_error)?;
        Ok(created)
    }

    async fn record_reminder_outcome(
        &self,
        business: BusinessId,
        reminder_id: Uuid,
        outcome: ReminderOutcome,
    ) -> AppResult<Option<PaymentReminder>> {
        let mut query = QueryBuilder::<Postgres>::new("UPDATE payment_reminders t SET ");
        match outcome {
            ReminderOutcome::Sent { sent_at } => {
                query
                    .push("status = ")
                    .push_bind(ReminderStatus::Sent.as_str())
                    .push(", sent_at = ")
                    .push_bind(sent_at);
            }
            ReminderOutcome::Failed { error_message } => {
                query
                    .push("status = ")
                    .push_bind(ReminderStatus::Failed.as_str())
                    .push(", error_message = ")
                    .push_bind(error_message);
            }
        }
        query
            .push(" WHERE t.id = ")
            .push_bind(reminder_id)
            .push(" AND t.business_id = ")
            .push_bind(business.as_uuid())
            .push(" AND t.status = 'pending' RETURNING row_to_json(t) AS row");
        if let Some(updated) = self.fetch_optional(query).await? {
            return Ok(Some(updated));
        }
        let _: PaymentReminder = self
            .fetch_one(
                select_by_id("payment_reminders", business, reminder_id),
                "Reminder not found.",
            )
            .await?;
        Ok(None)
    }

    async fn insert_report(
        &self,
        business: BusinessId,
        report: NewFinancialReport,
    ) -> AppResult<FinancialReport> {
        let mut query = QueryBuilder::<Postgres>::new(
            "INSERT INTO financial_reports (business_id, report_type, start_date, end_date, report_data, generated_at, generated_by) VALUES (",
        );
        {
            let mut values = query.separated(", ");
            values.push_bind(business.as_uuid());
            values.push_bind(report.report_type.as_str());
            values.push_bind(report.start_date);
            values.push_bind(report.end_date);
            values.push_bind(report.report_data);
            values.push_bind(report.generated_at);
            values.push_bind(report.generated_by);
        }
        query.push(") RETURNING row_to_json(financial_reports.*) AS row");
        self.fetch_optional(query).await?.ok_or_else(|| {
            AppError::Internal("Could not create financial_reports record.".to_string())
        })
    }

    async fn get_report(
        &self,
        business: BusinessId,
        report_id: Uuid,
    ) -> AppResult<FinancialReport> {
        self.fetch_one(
            select_by_id("financial_reports", business, report_id),
            "Report not found.",
        )
        .await
    }

    async fn list_reports(
        &self,
        business: BusinessId,
        report_type: Option<ReportType>,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<FinancialReport>, i64)> {
        let mut query = select_from("financial_reports", business);
        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*)::bigint AS total FROM financial_reports t WHERE t.business_id = ",
        );
        count.push_bind(business.as_uuid());
        if let Some(kind) = report_type {
            query.push(" AND t.report_type = ").push_bind(kind.as_str());
            count.push(" AND t.report_type = ").push_bind(kind.as_str());
        }
        query
            .push(" ORDER BY t.generated_at DESC LIMIT ")
            .push_bind(limit.clamp(1, 1000))
            .push(" OFFSET ")
            .push_bind(offset.max(0));

        let reports = self.fetch_all(query).await?;
        let total = count
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?
            .try_get::<i64, _>("total")
            .unwrap_or(0);
        Ok((reports, total))
    }
}

fn read_row(row: PgRow) -> Option<Value> {
    row.try_get::<Option<Value>, _>("row").ok().flatten()
}

fn read_rows(rows: Vec<PgRow>) -> Vec<Value> {
    rows.into_iter().filter_map(read_row).collect()
}

fn decode_row<T: DeserializeOwned>(value: Value) -> AppResult<T> {
    serde_json::from_value(value).map_err(|error| {
        tracing::error!(error = %error, "Could not decode ledger row");
        AppError::Internal("Could not decode ledger row.".to_string())
    })
}

fn map_db_error(error: sqlx::Error) -> AppError {
    let message = error.to_string();
    tracing::error!(db_error = %message, "Database query failed");

    if message.contains("23505")
        || message
            .to_ascii_lowercase()
            .contains("duplicate key value violates unique constraint")
    {
        return AppError::Conflict("Duplicate value violates a unique constraint.".to_string());
    }
    AppError::Dependency("Database operation failed.".to_string())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use uuid::Uuid;

    use super::{decode_row, push_payment_filter, select_from};
    use crate::{
        repository::{Payment, PaymentFilter, PaymentStatus, PaymentType},
        tenancy::BusinessId,
    };

    #[test]
    fn payment_filter_sql_is_business_scoped() {
        let business = BusinessId::new(Uuid::new_v4());
        let mut query = select_from("payments", business);
        push_payment_filter(
            &mut query,
            business,
            &PaymentFilter {
                tenant_id: Some(Uuid::new_v4()),
                statuses: vec![PaymentStatus::Pending],
                due_before: NaiveDate::from_ymd_opt(2026, 3, 1),
                ..PaymentFilter::default()
            },
        );
        let sql = query.sql();
        assert!(sql.starts_with("SELECT row_to_json(t) AS row FROM payments t WHERE t.business_id = $1"));
        assert!(sql.contains("SELECT l.id FROM leases l WHERE l.business_id = $2 AND l.tenant_id = $3"));
        assert!(sql.contains("t.status = ANY($4)"));
        assert!(sql.contains("t.due_date < $5"));
    }

    #[test]
    fn decodes_row_to_json_payloads() {
        let business = Uuid::new_v4();
        let payment: Payment = decode_row(json!({
            "id": Uuid::new_v4(),
            "business_id": business,
            "lease_id": Uuid::new_v4(),
            "amount": 1500.00,
            "payment_type": "rent",
            "payment_date": null,
            "due_date": "2026-03-01",
            "status": "pending",
            "payment_method": "",
            "transaction_id": "",
            "description": "Rent due 2026-03-01",
            "notes": "",
            "created_at": "2026-02-20T08:15:00.123456+00:00",
            "updated_at": "2026-02-20T08:15:00.123456+00:00"
        }))
        .expect("decodes");
        assert_eq!(payment.payment_type, PaymentType::Rent);
        assert_eq!(payment.business_id, BusinessId::new(business));
        assert_eq!(payment.amount, dec!(1500));
        assert!(payment.payment_date.is_none());
    }
}
