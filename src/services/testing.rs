//! Fixtures shared by the service tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    repository::{
        LateFee, LateFeeStatus, Lease, LeaseStatus, MemoryLedger, Payment, PaymentStatus,
        PaymentType, Property, Tenant,
    },
    services::notifications::Notifier,
    tenancy::BusinessId,
};

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .expect("valid instant")
}

pub struct Fixture {
    pub business: BusinessId,
    pub property: Property,
    pub tenant: Tenant,
    pub lease: Lease,
}

pub fn tenant(business: BusinessId, first_name: &str, email: &str) -> Tenant {
    Tenant {
        id: Uuid::new_v4(),
        business_id: business,
        first_name: first_name.to_string(),
        last_name: "Tenant".to_string(),
        email: email.to_string(),
        phone: String::new(),
        credit_score: Some(700),
        monthly_income: None,
        is_active: true,
    }
}

pub fn lease(
    business: BusinessId,
    tenant_id: Uuid,
    property_id: Uuid,
    monthly_rent: Decimal,
    rent_due_day: u32,
    start_date: NaiveDate,
) -> Lease {
    Lease {
        id: Uuid::new_v4(),
        business_id: business,
        tenant_id,
        property_id,
        start_date,
        end_date: start_date + Duration::days(3 * 365),
        monthly_rent,
        security_deposit: Decimal::ZERO,
        rent_due_day,
        status: LeaseStatus::Active,
        late_fee_rules: None,
    }
}

/// A fresh business with one property, one tenant and one active lease.
pub async fn seed_lease(
    ledger: &MemoryLedger,
    monthly_rent: Decimal,
    rent_due_day: u32,
    start_date: NaiveDate,
) -> Fixture {
    let business = ledger.add_business("Acme Rentals").await;
    seed_lease_in(ledger, business, monthly_rent, rent_due_day, start_date).await
}

pub async fn seed_lease_in(
    ledger: &MemoryLedger,
    business: BusinessId,
    monthly_rent: Decimal,
    rent_due_day: u32,
    start_date: NaiveDate,
) -> Fixture {
    let property = ledger.add_property(business, "Maple Court 4B").await;
    let tenant = ledger
        .put_tenant(tenant(business, "Ana", "ana@example.com"))
        .await;
    let lease = ledger
        .put_lease(lease(
            business,
            tenant.id,
            property.id,
            monthly_rent,
            rent_due_day,
            start_date,
        ))
        .await;
    Fixture {
        business,
        property,
        tenant,
        lease,
    }
}

pub fn payment(
    fixture: &Fixture,
    amount: Decimal,
    due_date: NaiveDate,
    payment_date: Option<NaiveDate>,
    status: PaymentStatus,
) -> Payment {
    Payment {
        id: Uuid::new_v4(),
        business_id: fixture.business,
        lease_id: fixture.lease.id,
        amount,
        payment_type: PaymentType::Rent,
        payment_date,
        due_date,
        status,
        payment_method: String::new(),
        transaction_id: String::new(),
        description: String::new(),
        notes: String::new(),
        created_at: Utc::now(),
    }
}

pub async fn seed_pending(
    ledger: &MemoryLedger,
    fixture: &Fixture,
    amount: Decimal,
    due_date: NaiveDate,
) -> Payment {
    ledger
        .put_payment(payment(fixture, amount, due_date, None, PaymentStatus::Pending))
        .await
}

/// Completed rent paid `days_late` days after its due date.
pub async fn seed_paid(
    ledger: &MemoryLedger,
    fixture: &Fixture,
    amount: Decimal,
    due_date: NaiveDate,
    days_late: i64,
) -> Payment {
    ledger
        .put_payment(payment(
            fixture,
            amount,
            due_date,
            Some(due_date + Duration::days(days_late)),
            PaymentStatus::Completed,
        ))
        .await
}

/// Seeds a paid history ending before `today` with the given on-time and
/// late counts, one payment per week.
pub async fn seed_history(
    ledger: &MemoryLedger,
    fixture: &Fixture,
    today: NaiveDate,
    on_time: usize,
    late: usize,
) {
    for index in 0..(on_time + late) {
        let due = today - Duration::days(10 + 7 * index as i64);
        let days_late = if index < late { 4 } else { 0 };
        seed_paid(ledger, fixture, Decimal::ONE_HUNDRED, due, days_late).await;
    }
}

pub async fn seed_fee(
    ledger: &MemoryLedger,
    fixture: &Fixture,
    payment: &Payment,
    amount: Decimal,
    status: LateFeeStatus,
    fee_date: NaiveDate,
) -> LateFee {
    ledger
        .put_late_fee(LateFee {
            id: Uuid::new_v4(),
            business_id: fixture.business,
            payment_id: payment.id,
            amount,
            days_overdue: (fee_date - payment.due_date).num_days().max(0),
            fee_date,
            status,
            waive_reason: String::new(),
            created_at: Utc::now(),
        })
        .await
}

/// Notifier that records deliveries and rejects one chosen recipient.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
    pub reject: Option<String>,
}

impl RecordingNotifier {
    pub fn rejecting(recipient: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reject: Some(recipient.to_string()),
        }
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("notifier lock")
            .iter()
            .map(|(_, subject)| subject.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn channel(&self) -> &'static str {
        "test"
    }

    async fn send(&self, recipient: &str, subject: &str, _body: &str) -> Result<(), String> {
        if self.reject.as_deref() == Some(recipient) {
            return Err(format!("Mailbox {recipient} unavailable"));
        }
        self.sent
            .lock()
            .expect("notifier lock")
            .push((recipient.to_string(), subject.to_string()));
        Ok(())
    }
}
