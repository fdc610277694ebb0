use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    FinancialReport, LateFee, LateFeeFilter, LateFeeStatus, Lease, LeaseFilter, LedgerStore,
    NewFinancialReport, NewLateFee, NewPayment, NewReminder, Payment, PaymentFilter,
    PaymentReminder, PaymentStatus, PaymentType, Property, ReminderFilter, ReminderOutcome,
    ReminderStatus, ReportType, Settlement, Tenant,
};
use crate::{
    error::{AppError, AppResult},
    services::policy::LateFeeRules,
    tenancy::BusinessId,
};

#[derive(Default)]
struct Tables {
    businesses: Vec<(BusinessId, String)>,
    properties: Vec<Property>,
    tenants: Vec<Tenant>,
    leases: Vec<Lease>,
    payments: Vec<Payment>,
    late_fees: Vec<LateFee>,
    reminders: Vec<PaymentReminder>,
    reports: Vec<FinancialReport>,
}

impl Tables {
    fn tenant_of_lease(&self, lease_id: Uuid) -> Option<Uuid> {
        self.leases
            .iter()
            .find(|lease| lease.id == lease_id)
            .map(|lease| lease.tenant_id)
    }

    fn lease_of_payment(&self, payment_id: Uuid) -> Option<Uuid> {
        self.payments
            .iter()
            .find(|payment| payment.id == payment_id)
            .map(|payment| payment.lease_id)
    }

    fn payment_mut(&mut self, business: BusinessId, payment_id: Uuid) -> AppResult<&mut Payment> {
        self.payments
            .iter_mut()
            .find(|payment| payment.id == payment_id && payment.business_id == business)
            .ok_or_else(|| AppError::NotFound("Payment not found.".to_string()))
    }

    fn owns_payment(&self, business: BusinessId, payment_id: Uuid) -> bool {
        self.payments
            .iter()
            .any(|payment| payment.id == payment_id && payment.business_id == business)
    }
}

/// Process-local ledger for development without a database and for tests.
/// All tables sit behind one lock so multi-row operations are atomic.
#[derive(Default)]
pub struct MemoryLedger {
    tables: RwLock<Tables>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_business(&self, name: &str) -> BusinessId {
        let id = BusinessId::new(Uuid::new_v4());
        self.tables
            .write()
            .await
            .businesses
            .push((id, name.trim().to_string()));
        id
    }

    pub async fn add_property(&self, business: BusinessId, title: &str) -> Property {
        let property = Property {
            id: Uuid::new_v4(),
            business_id: business,
            title: title.to_string(),
        };
        self.tables.write().await.properties.push(property.clone());
        property
    }

    pub async fn put_tenant(&self, tenant: Tenant) -> Tenant {
        self.tables.write().await.tenants.push(tenant.clone());
        tenant
    }

    pub async fn put_lease(&self, lease: Lease) -> Lease {
        self.tables.write().await.leases.push(lease.clone());
        lease
    }

    /// Seeds a payment verbatim, including historical `created_at` values.
    pub async fn put_payment(&self, payment: Payment) -> Payment {
        self.tables.write().await.payments.push(payment.clone());
        payment
    }

    pub async fn put_late_fee(&self, fee: LateFee) -> LateFee {
        self.tables.write().await.late_fees.push(fee.clone());
        fee
    }

    pub async fn put_reminder(&self, reminder: PaymentReminder) -> PaymentReminder {
        self.tables.write().await.reminders.push(reminder.clone());
        reminder
    }
}

fn pending_rent(business: BusinessId, lease_id: Uuid, due_date: NaiveDate, amount: Decimal) -> Payment {
    Payment {
        id: Uuid::new_v4(),
        business_id: business,
        lease_id,
        amount,
        payment_type: PaymentType::Rent,
        payment_date: None,
        due_date,
        status: PaymentStatus::Pending,
        payment_method: String::new(),
        transaction_id: String::new(),
        description: format!("Rent due {due_date}"),
        notes: String::new(),
        created_at: Utc::now(),
    }
}

fn new_reminder(business: BusinessId, reminder: NewReminder) -> PaymentReminder {
    PaymentReminder {
        id: Uuid::new_v4(),
        business_id: business,
        payment_id: reminder.payment_id,
        reminder_type: reminder.reminder_type,
        scheduled_at: reminder.scheduled_at,
        sent_at: None,
        subject: reminder.subject,
        message: reminder.message,
        status: ReminderStatus::Pending,
        error_message: String::new(),
        created_at: Utc::now(),
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn business_exists(&self, business: BusinessId) -> AppResult<bool> {
        Ok(self
            .tables
            .read()
            .await
            .businesses
            .iter()
            .any(|(id, _)| *id == business))
    }

    async fn list_business_ids(&self) -> AppResult<Vec<BusinessId>> {
        Ok(self
            .tables
            .read()
            .await
            .businesses
            .iter()
            .map(|(id, _)| *id)
            .collect())
    }

    async fn list_properties(&self, business: BusinessId) -> AppResult<Vec<Property>> {
        Ok(self
            .tables
            .read()
            .await
            .properties
            .iter()
            .filter(|property| property.business_id == business)
            .cloned()
            .collect())
    }

    async fn get_tenant(&self, business: BusinessId, tenant_id: Uuid) -> AppResult<Tenant> {
        self.tables
            .read()
            .await
            .tenants
            .iter()
            .find(|tenant| tenant.id == tenant_id && tenant.business_id == business)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Tenant not found.".to_string()))
    }

    async fn list_tenants(
        &self,
        business: BusinessId,
        active_only: bool,
    ) -> AppResult<Vec<Tenant>> {
        let tables = self.tables.read().await;
        let mut tenants = tables
            .tenants
            .iter()
            .filter(|tenant| tenant.business_id == business && (!active_only || tenant.is_active))
            .cloned()
            .collect::<Vec<_>>();
        tenants.sort_by(|a, b| {
            (a.last_name.as_str(), a.first_name.as_str())
                .cmp(&(b.last_name.as_str(), b.first_name.as_str()))
        });
        Ok(tenants)
    }

    async fn get_lease(&self, business: BusinessId, lease_id: Uuid) -> AppResult<Lease> {
        self.tables
            .read()
            .await
            .leases
            .iter()
            .find(|lease| lease.id == lease_id && lease.business_id == business)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Lease not found.".to_string()))
    }

    async fn list_leases(
        &self,
        business: BusinessId,
        filter: &LeaseFilter,
    ) -> AppResult<Vec<Lease>> {
        let tables = self.tables.read().await;
        let mut leases = tables
            .leases
            .iter()
            .filter(|lease| lease.business_id == business)
            .filter(|lease| filter.lease_id.is_none_or(|id| id == lease.id))
            .filter(|lease| filter.tenant_id.is_none_or(|id| id == lease.tenant_id))
            .filter(|lease| filter.status.is_none_or(|status| status == lease.status))
            .cloned()
            .collect::<Vec<_>>();
        leases.sort_by_key(|lease| (lease.start_date, lease.id));
        Ok(leases)
    }

    async fn set_lease_fee_rules(
        &self,
        business: BusinessId,
        lease_id: Uuid,
        rules: Option<LateFeeRules>,
    ) -> AppResult<Lease> {
        let mut tables = self.tables.write().await;
        let lease = tables
            .leases
            .iter_mut()
            .find(|lease| lease.id == lease_id && lease.business_id == business)
            .ok_or_else(|| AppError::NotFound("Lease not found.".to_string()))?;
        lease.late_fee_rules = rules;
        Ok(lease.clone())
    }

    async fn get_payment(&self, business: BusinessId, payment_id: Uuid) -> AppResult<Payment> {
        self.tables
            .read()
            .await
            .payments
            .iter()
            .find(|payment| payment.id == payment_id && payment.business_id == business)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Payment not found.".to_string()))
    }

    async fn list_payments(
        &self,
        business: BusinessId,
        filter: &PaymentFilter,
    ) -> AppResult<Vec<Payment>> {
        let tables = self.tables.read().await;
        let mut payments = tables
            .payments
            .iter()
            .filter(|payment| payment.business_id == business)
            .filter(|payment| filter.matches(payment, tables.tenant_of_lease(payment.lease_id)))
            .cloned()
            .collect::<Vec<_>>();
        payments.sort_by_key(|payment| (payment.due_date, payment.created_at));
        Ok(payments)
    }

    async fn insert_payment(
        &self,
        business: BusinessId,
        payment: NewPayment,
    ) -> AppResult<Payment> {
        let mut tables = self.tables.write().await;
        if !tables
            .leases
            .iter()
            .any(|lease| lease.id == payment.lease_id && lease.business_id == business)
        {
            return Err(AppError::NotFound("Lease not found.".to_string()));
        }
        let row = Payment {
            id: Uuid::new_v4(),
            business_id: business,
            lease_id: payment.lease_id,
            amount: payment.amount,
            payment_type: payment.payment_type,
            payment_date: payment.payment_date,
            due_date: payment.due_date,
            status: payment.status,
            payment_method: payment.payment_method,
            transaction_id: payment.transaction_id,
            description: payment.description,
            notes: payment.notes,
            created_at: Utc::now(),
        };
        tables.payments.push(row.clone());
        Ok(row)
    }

    async fn ensure_pending_rent(
        &self,
        business: BusinessId,
        lease_id: Uuid,
        due_date: NaiveDate,
        amount: Decimal,
    ) -> AppResult<Payment> {
        let mut tables = self.tables.write().await;
        if !tables
            .leases
            .iter()
            .any(|lease| lease.id == lease_id && lease.business_id == business)
        {
            return Err(AppError::NotFound("Lease not found.".to_string()));
        }
        if let Some(existing) = tables.payments.iter().find(|payment| {
            payment.business_id == business
                && payment.lease_id == lease_id
                && payment.payment_type == PaymentType::Rent
                && payment.due_date == due_date
                && matches!(payment.status, PaymentStatus::Pending | PaymentStatus::Completed)
        }) {
            return Ok(existing.clone());
        }
        let row = pending_rent(business, lease_id, due_date, amount);
        tables.payments.push(row.clone());
        Ok(row)
    }

    async fn settle_payment(
        &self,
        business: BusinessId,
        payment_id: Uuid,
        settlement: Settlement,
    ) -> AppResult<Payment> {
        let mut tables = self.tables.write().await;
        let payment = tables.payment_mut(business, payment_id)?;
        if payment.status != PaymentStatus::Pending {
            return Err(AppError::Conflict(
                "Payment is no longer pending.".to_string(),
            ));
        }
        payment.status = PaymentStatus::Completed;
        payment.amount = settlement.amount;
        payment.payment_date = Some(settlement.payment_date);
        payment.payment_method = settlement.payment_method;
        payment.transaction_id = settlement.transaction_id;
        if !settlement.notes.is_empty() {
            payment.notes = settlement.notes;
        }
        Ok(payment.clone())
    }

    async fn update_payment_status(
        &self,
        business: BusinessId,
        payment_id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
        notes: Option<String>,
    ) -> AppResult<Payment> {
        let mut tables = self.tables.write().await;
        let payment = tables.payment_mut(business, payment_id)?;
        if payment.status != from {
            return Err(AppError::Conflict(format!(
                "Payment status changed concurrently; now '{}'.",
                payment.status.as_str()
            )));
        }
        payment.status = to;
        if let Some(notes) = notes {
            payment.notes = notes;
        }
        Ok(payment.clone())
    }

    async fn get_late_fee(&self, business: BusinessId, late_fee_id: Uuid) -> AppResult<LateFee> {
        self.tables
            .read()
            .await
            .late_fees
            .iter()
            .find(|fee| fee.id == late_fee_id && fee.business_id == business)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Late fee not found.".to_string()))
    }

    async fn list_late_fees(
        &self,
        business: BusinessId,
        filter: &LateFeeFilter,
    ) -> AppResult<Vec<LateFee>> {
        let tables = self.tables.read().await;
        let mut fees = tables
            .late_fees
            .iter()
            .filter(|fee| fee.business_id == business)
            .filter(|fee| filter.matches(fee, tables.lease_of_payment(fee.payment_id)))
            .cloned()
            .collect::<Vec<_>>();
        fees.sort_by_key(|fee| (fee.fee_date, fee.created_at));
        Ok(fees)
    }

    async fn insert_late_fee_if_absent(
        &self,
        business: BusinessId,
        fee: NewLateFee,
    ) -> AppResult<Option<LateFee>> {
        let mut tables = self.tables.write().await;
        if !tables.owns_payment(business, fee.payment_id) {
            return Err(AppError::NotFound("Payment not found.".to_string()));
        }
        if tables
            .late_fees
            .iter()
            .any(|existing| existing.payment_id == fee.payment_id)
        {
            return Ok(None);
        }
        let row = LateFee {
            id: Uuid::new_v4(),
            business_id: business,
            payment_id: fee.payment_id,
            amount: fee.amount,
            days_overdue: fee.days_overdue,
            fee_date: fee.fee_date,
            status: fee.status,
            waive_reason: fee.waive_reason,
            created_at: Utc::now(),
        };
        tables.late_fees.push(row.clone());
        Ok(Some(row))
    }

    async fn waive_late_fee(
        &self,
        business: BusinessId,
        late_fee_id: Uuid,
        waive_reason: String,
    ) -> AppResult<LateFee> {
        let mut tables = self.tables.write().await;
        let fee = tables
            .late_fees
            .iter_mut()
            .find(|fee| fee.id == late_fee_id && fee.business_id == business)
            .ok_or_else(|| AppError::NotFound("Late fee not found.".to_string()))?;
        if fee.status == LateFeeStatus::Waived {
            return Err(AppError::Conflict("Late fee already waived".to_string()));
        }
        fee.status = LateFeeStatus::Waived;
        fee.waive_reason = waive_reason;
        Ok(fee.clone())
    }

    async fn list_reminders(
        &self,
        business: BusinessId,
        filter: &ReminderFilter,
    ) -> AppResult<Vec<PaymentReminder>> {
        let tables = self.tables.read().await;
        let mut reminders = tables
            .reminders
            .iter()
            .filter(|reminder| reminder.business_id == business && filter.matches(reminder))
            .cloned()
            .collect::<Vec<_>>();
        reminders.sort_by_key(|reminder| (reminder.scheduled_at, reminder.created_at));
        Ok(reminders)
    }

    async fn insert_reminder(
        &self,
        business: BusinessId,
        reminder: NewReminder,
    ) -> AppResult<PaymentReminder> {
        let mut tables = self.tables.write().await;
        if !tables.owns_payment(business, reminder.payment_id) {
            return Err(AppError::NotFound("Payment not found.".to_string()));
        }
        let row = new_reminder(business, reminder);
        tables.reminders.push(row.clone());
        Ok(row)
    }

    async fn replace_pending_reminders(
        &self,
        business: BusinessId,
        payment_id: Uuid,
        reminders: Vec<NewReminder>,
    ) -> AppResult<Vec<PaymentReminder>> {
        let mut tables = self.tables.write().await;
        if !tables.owns_payment(business, payment_id) {
            return Err(AppError::NotFound("Payment not found.".to_string()));
        }
        tables.reminders.retain(|reminder| {
            !(reminder.business_id == business
                && reminder.payment_id == payment_id
                && reminder.status == ReminderStatus::Pending)
        });
        let created = reminders
            .into_iter()
            .map(|reminder| new_reminder(business, reminder))
            .collect::<Vec<_>>();
        tables.reminders.extend(created.iter().cloned());
        Ok(created)
    }

    async fn record_reminder_outcome(
        &self,
        business: BusinessId,
        reminder_id: Uuid,
        outcome: ReminderOutcome,
    ) -> AppResult<Option<PaymentReminder>> {
        let mut tables = self.tables.write().await;
        let Some(reminder) = tables
            .reminders
            .iter_mut()
            .find(|reminder| reminder.id == reminder_id && reminder.business_id == business)
        else {
            return Err(AppError::NotFound("Reminder not found.".to_string()));
        };
        if reminder.status != ReminderStatus::Pending {
            return Ok(None);
        }
        match outcome {
            ReminderOutcome::Sent { sent_at } => {
                reminder.status = ReminderStatus::Sent;
                reminder.sent_at = Some(sent_at);
            }
            ReminderOutcome::Failed { error_message } => {
                reminder.status = ReminderStatus::Failed;
                reminder.error_message = error_message;
            }
        }
        Ok(Some(reminder.clone()))
    }

    async fn insert_report(
        &self,
        business: BusinessId,
        report: NewFinancialReport,
    ) -> AppResult<FinancialReport> {
        let row = FinancialReport {
            id: Uuid::new_v4(),
            business_id: business,
            report_type: report.report_type,
            start_date: report.start_date,
            end_date: report.end_date,
            report_data: report.report_data,
            generated_at: report.generated_at,
            generated_by: report.generated_by,
        };
        self.tables.write().await.reports.push(row.clone());
        Ok(row)
    }

    async fn get_report(
        &self,
        business: BusinessId,
        report_id: Uuid,
    ) -> AppResult<FinancialReport> {
        self.tables
            .read()
            .await
            .reports
            .iter()
            .find(|report| report.id == report_id && report.business_id == business)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Report not found.".to_string()))
    }

    async fn list_reports(
        &self,
        business: BusinessId,
        report_type: Option<ReportType>,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<FinancialReport>, i64)> {
        let tables = self.tables.read().await;
        let mut reports = tables
            .reports
            .iter()
            .filter(|report| report.business_id == business)
            .filter(|report| report_type.is_none_or(|kind| kind == report.report_type))
            .cloned()
            .collect::<Vec<_>>();
        reports.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        let total = reports.len() as i64;
        let page = reports
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.clamp(1, 1000) as usize)
            .collect();
        Ok((page, total))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::MemoryLedger;
    use crate::{
        error::AppError,
        repository::{
            LateFeeStatus, LedgerStore, NewLateFee, NewReminder, PaymentFilter, ReminderFilter,
            ReminderOutcome, ReminderStatus, ReminderType,
        },
        services::testing::{date, seed_lease},
    };

    #[tokio::test]
    async fn late_fee_insert_is_idempotent_per_payment() {
        let ledger = MemoryLedger::new();
        let fixture = seed_lease(&ledger, dec!(1000), 1, date(2026, 1, 1)).await;
        let payment = ledger
            .ensure_pending_rent(fixture.business, fixture.lease.id, date(2026, 3, 1), dec!(1000))
            .await
            .expect("pending rent");

        let fee = || NewLateFee {
            payment_id: payment.id,
            amount: dec!(50),
            days_overdue: 10,
            fee_date: date(2026, 3, 11),
            status: LateFeeStatus::Applied,
            waive_reason: String::new(),
        };
        assert!(ledger
            .insert_late_fee_if_absent(fixture.business, fee())
            .await
            .expect("first insert")
            .is_some());
        assert!(ledger
            .insert_late_fee_if_absent(fixture.business, fee())
            .await
            .expect("second insert")
            .is_none());
    }

    #[tokio::test]
    async fn ensure_pending_rent_returns_existing_row() {
        let ledger = MemoryLedger::new();
        let fixture = seed_lease(&ledger, dec!(900), 5, date(2026, 1, 1)).await;
        let first = ledger
            .ensure_pending_rent(fixture.business, fixture.lease.id, date(2026, 4, 5), dec!(900))
            .await
            .expect("created");
        let second = ledger
            .ensure_pending_rent(fixture.business, fixture.lease.id, date(2026, 4, 5), dec!(900))
            .await
            .expect("reused");
        assert_eq!(first.id, second.id);
        let all = ledger
            .list_payments(fixture.business, &PaymentFilter::default())
            .await
            .expect("payments");
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn rows_of_other_businesses_are_not_found() {
        let ledger = MemoryLedger::new();
        let fixture = seed_lease(&ledger, dec!(900), 5, date(2026, 1, 1)).await;
        let other = ledger.add_business("Other Rentals").await;

        let lease = ledger.get_lease(other, fixture.lease.id).await;
        assert!(matches!(lease, Err(AppError::NotFound(_))));
        let tenant = ledger.get_tenant(other, fixture.tenant.id).await;
        assert!(matches!(tenant, Err(AppError::NotFound(_))));
        let created = ledger
            .ensure_pending_rent(other, fixture.lease.id, date(2026, 4, 5), dec!(900))
            .await;
        assert!(matches!(created, Err(AppError::NotFound(_))));
        let stray = ledger.get_payment(fixture.business, Uuid::new_v4()).await;
        assert!(matches!(stray, Err(AppError::NotFound(_))));
        let visible = ledger
            .list_payments(fixture.business, &PaymentFilter::default())
            .await
            .expect("payments");
        assert!(visible.is_empty());
    }

    #[tokio::test]
    async fn reminder_outcome_only_moves_pending_rows() {
        let ledger = MemoryLedger::new();
        let fixture = seed_lease(&ledger, dec!(900), 5, date(2026, 1, 1)).await;
        let payment = ledger
            .ensure_pending_rent(fixture.business, fixture.lease.id, date(2026, 4, 5), dec!(900))
            .await
            .expect("pending rent");
        let reminder = ledger
            .insert_reminder(
                fixture.business,
                NewReminder {
                    payment_id: payment.id,
                    reminder_type: ReminderType::Upcoming,
                    scheduled_at: Utc::now() - Duration::minutes(1),
                    subject: "Rent".to_string(),
                    message: "Rent is due".to_string(),
                },
            )
            .await
            .expect("reminder");

        let sent = ledger
            .record_reminder_outcome(
                fixture.business,
                reminder.id,
                ReminderOutcome::Sent { sent_at: Utc::now() },
            )
            .await
            .expect("outcome");
        assert_eq!(sent.map(|row| row.status), Some(ReminderStatus::Sent));

        let again = ledger
            .record_reminder_outcome(
                fixture.business,
                reminder.id,
                ReminderOutcome::Failed {
                    error_message: "bounced".to_string(),
                },
            )
            .await
            .expect("outcome");
        assert!(again.is_none());

        let pending = ledger
            .list_reminders(
                fixture.business,
                &ReminderFilter {
                    statuses: vec![ReminderStatus::Pending],
                    ..ReminderFilter::default()
                },
            )
            .await
            .expect("reminders");
        assert!(pending.is_empty());
    }
}
