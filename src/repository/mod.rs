pub mod memory_ledger;
pub mod models;
pub mod pg_ledger;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

pub use memory_ledger::MemoryLedger;
pub use models::*;
pub use pg_ledger::PgLedger;

use crate::{error::AppResult, services::policy::LateFeeRules, tenancy::BusinessId};

/// Persistence seam for the finance services.
///
/// Every read and write is scoped to one business; an id that exists under a
/// different business behaves exactly like an id that does not exist.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn ping(&self) -> AppResult<()>;

    async fn business_exists(&self, business: BusinessId) -> AppResult<bool>;
    async fn list_business_ids(&self) -> AppResult<Vec<BusinessId>>;

    async fn list_properties(&self, business: BusinessId) -> AppResult<Vec<Property>>;

    async fn get_tenant(&self, business: BusinessId, tenant_id: Uuid) -> AppResult<Tenant>;
    async fn list_tenants(&self, business: BusinessId, active_only: bool)
        -> AppResult<Vec<Tenant>>;

    async fn get_lease(&self, business: BusinessId, lease_id: Uuid) -> AppResult<Lease>;
    async fn list_leases(&self, business: BusinessId, filter: &LeaseFilter)
        -> AppResult<Vec<Lease>>;
    async fn set_lease_fee_rules(
        &self,
        business: BusinessId,
        lease_id: Uuid,
        rules: Option<LateFeeRules>,
    ) -> AppResult<Lease>;

    async fn get_payment(&self, business: BusinessId, payment_id: Uuid) -> AppResult<Payment>;
    async fn list_payments(
        &self,
        business: BusinessId,
        filter: &PaymentFilter,
    ) -> AppResult<Vec<Payment>>;
    async fn insert_payment(&self, business: BusinessId, payment: NewPayment)
        -> AppResult<Payment>;
    /// Returns the pending rent row for `due_date`, creating it when missing.
    async fn ensure_pending_rent(
        &self,
        business: BusinessId,
        lease_id: Uuid,
        due_date: NaiveDate,
        amount: Decimal,
    ) -> AppResult<Payment>;
    /// Marks a pending payment completed. Conflict when it is no longer pending.
    async fn settle_payment(
        &self,
        business: BusinessId,
        payment_id: Uuid,
        settlement: Settlement,
    ) -> AppResult<Payment>;
    /// Moves a payment from `from` to `to`. Conflict when the stored status
    /// is no longer `from`.
    async fn update_payment_status(
        &self,
        business: BusinessId,
        payment_id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
        notes: Option<String>,
    ) -> AppResult<Payment>;

    async fn get_late_fee(&self, business: BusinessId, late_fee_id: Uuid) -> AppResult<LateFee>;
    async fn list_late_fees(
        &self,
        business: BusinessId,
        filter: &LateFeeFilter,
    ) -> AppResult<Vec<LateFee>>;
    /// Inserts unless the payment already carries a fee; `None` when it does.
    async fn insert_late_fee_if_absent(
        &self,
        business: BusinessId,
        fee: NewLateFee,
    ) -> AppResult<Option<LateFee>>;
    /// Conflict when the fee is already waived.
    async fn waive_late_fee(
        &self,
        business: BusinessId,
        late_fee_id: Uuid,
        waive_reason: String,
    ) -> AppResult<LateFee>;

    async fn list_reminders(
        &self,
        business: BusinessId,
        filter: &ReminderFilter,
    ) -> AppResult<Vec<PaymentReminder>>;
    async fn insert_reminder(
        &self,
        business: BusinessId,
        reminder: NewReminder,
    ) -> AppResult<PaymentReminder>;
    /// Atomically drops the payment's pending reminders and inserts `reminders`.
    async fn replace_pending_reminders(
        &self,
        business: BusinessId,
        payment_id: Uuid,
        reminders: Vec<NewReminder>,
    ) -> AppResult<Vec<PaymentReminder>>;
    /// Records a delivery attempt. `None` when the reminder was no longer pending.
    async fn record_reminder_outcome(
        &self,
        business: BusinessId,
        reminder_id: Uuid,
        outcome: ReminderOutcome,
    ) -> AppResult<Option<PaymentReminder>>;

    async fn insert_report(
        &self,
        business: BusinessId,
        report: NewFinancialReport,
    ) -> AppResult<FinancialReport>;
    async fn get_report(&self, business: BusinessId, report_id: Uuid)
        -> AppResult<FinancialReport>;
    /// Newest first, plus the total matching count.
    async fn list_reports(
        &self,
        business: BusinessId,
        report_type: Option<ReportType>,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<FinancialReport>, i64)>;
}
