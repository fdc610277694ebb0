use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    repository::{
        LateFeeFilter, LateFeeStatus, Lease, LeaseFilter, LedgerStore, NewPayment, Payment,
        PaymentFilter, PaymentStatus, PaymentType, Settlement, Tenant,
    },
    services::calendar,
    tenancy::BusinessId,
};

/// Amounts are stored as numeric(12, 2).
const MAX_PAYMENT_AMOUNT: Decimal = dec!(10_000_000_000);

fn check_payment_amount(amount: Decimal) -> AppResult<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(
            "Payment amount must be greater than zero.".to_string(),
        ));
    }
    if amount >= MAX_PAYMENT_AMOUNT {
        return Err(AppError::BadRequest(
            "Payment amount must be below 10000000000.".to_string(),
        ));
    }
    if amount.normalize().scale() > 2 {
        return Err(AppError::BadRequest(
            "Payment amount must have at most 2 decimal places.".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStanding {
    Current,
    Overdue,
    OverdueWithFees,
}

impl PaymentStanding {
    fn from_amounts(outstanding: Decimal, late_fees: Decimal) -> Self {
        if outstanding <= Decimal::ZERO {
            Self::Current
        } else if late_fees > Decimal::ZERO {
            Self::OverdueWithFees
        } else {
            Self::Overdue
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaseBalance {
    pub lease_id: Uuid,
    pub property_id: Uuid,
    pub monthly_rent: Decimal,
    pub months_elapsed: i64,
    pub expected_rent: Decimal,
    pub payments_made: Decimal,
    pub late_fees: Decimal,
    pub total_owed: Decimal,
    pub outstanding_balance: Decimal,
    pub last_payment_date: Option<NaiveDate>,
    pub payment_status: PaymentStanding,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantBalance {
    pub tenant_id: Uuid,
    pub tenant_name: String,
    pub tenant_email: String,
    pub as_of: NaiveDate,
    pub leases: Vec<LeaseBalance>,
    pub total_monthly_rent: Decimal,
    pub total_expected_rent: Decimal,
    pub total_payments_made: Decimal,
    pub total_late_fees: Decimal,
    pub total_owed: Decimal,
    pub total_outstanding: Decimal,
    pub last_payment_date: Option<NaiveDate>,
    pub payment_status: PaymentStanding,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub payment_id: Uuid,
    pub lease_id: Uuid,
    pub amount: Decimal,
    pub payment_type: PaymentType,
    pub payment_date: NaiveDate,
    pub due_date: NaiveDate,
    pub days_late: i64,
    pub is_late: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentHistory {
    pub tenant_id: Uuid,
    pub tenant_name: String,
    pub months_back: u32,
    pub period_start: NaiveDate,
    pub total_payments: usize,
    pub on_time_payments: usize,
    pub late_payments: usize,
    pub total_amount_paid: Decimal,
    pub average_days_late: f64,
    pub reliability_score: f64,
    /// Newest first.
    pub payments: Vec<HistoryEntry>,
}

impl PaymentHistory {
    pub fn has_history(&self) -> bool {
        self.total_payments > 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceOverview {
    pub as_of: NaiveDate,
    pub tenants: Vec<TenantBalance>,
    pub total_tenants: usize,
    pub current_tenants: usize,
    pub overdue_tenants: usize,
    pub total_expected_rent: Decimal,
    pub total_payments_made: Decimal,
    pub total_late_fees: Decimal,
    pub total_outstanding: Decimal,
    pub collection_rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackPaymentInput {
    pub lease_id: Uuid,
    pub amount: Decimal,
    #[serde(default = "default_payment_type")]
    pub payment_type: PaymentType,
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub notes: String,
}

fn default_payment_type() -> PaymentType {
    PaymentType::Rent
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackedPayment {
    pub payment: Payment,
    /// True when an existing pending rent row was settled instead of inserting.
    pub settled_pending: bool,
    pub tenant_balance: TenantBalance,
}

/// Balance and payment bookkeeping for one business.
pub struct BalanceCalculator<'a> {
    ledger: &'a dyn LedgerStore,
    business: BusinessId,
}

impl<'a> BalanceCalculator<'a> {
    pub fn new(ledger: &'a dyn LedgerStore, business: BusinessId) -> Self {
        Self { ledger, business }
    }

    pub async fn calculate_tenant_balance(
        &self,
        tenant_id: Uuid,
        today: NaiveDate,
    ) -> AppResult<TenantBalance> {
        let tenant = self.ledger.get_tenant(self.business, tenant_id).await?;
        self.tenant_balance(&tenant, today).await
    }

    pub async fn calculate_lease_balance(
        &self,
        lease_id: Uuid,
        today: NaiveDate,
    ) -> AppResult<LeaseBalance> {
        let lease = self.ledger.get_lease(self.business, lease_id).await?;
        self.lease_balance(&lease, today).await
    }

    async fn tenant_balance(&self, tenant: &Tenant, today: NaiveDate) -> AppResult<TenantBalance> {
        let leases = self
            .ledger
            .list_leases(
                self.business,
                &LeaseFilter {
                    tenant_id: Some(tenant.id),
                    ..LeaseFilter::active()
                },
            )
            .await?;

        let mut balances = Vec::with_capacity(leases.len());
        for lease in &leases {
            balances.push(self.lease_balance(lease, today).await?);
        }

        let sum = |pick: fn(&LeaseBalance) -> Decimal| balances.iter().map(pick).sum::<Decimal>();
        let total_outstanding = sum(|b| b.outstanding_balance);
        let total_late_fees = sum(|b| b.late_fees);

        Ok(TenantBalance {
            tenant_id: tenant.id,
            tenant_name: tenant.full_name(),
            tenant_email: tenant.email.clone(),
            as_of: today,
            total_monthly_rent: sum(|b| b.monthly_rent),
            total_expected_rent: sum(|b| b.expected_rent),
            total_payments_made: sum(|b| b.payments_made),
            total_late_fees,
            total_owed: sum(|b| b.total_owed),
            total_outstanding,
            last_payment_date: balances.iter().filter_map(|b| b.last_payment_date).max(),
            payment_status: PaymentStanding::from_amounts(total_outstanding, total_late_fees),
            leases: balances,
        })
    }

    pub(crate) async fn lease_balance(
        &self,
        lease: &Lease,
        today: NaiveDate,
    ) -> AppResult<LeaseBalance> {
        let reference = today.min(lease.end_date);
        let months_elapsed = calendar::months_elapsed(lease.start_date, reference, lease.rent_due_day);
        let expected_rent = lease.monthly_rent * Decimal::from(months_elapsed);

        let completed = self
            .ledger
            .list_payments(
                self.business,
                &PaymentFilter {
                    lease_id: Some(lease.id),
                    statuses: vec![PaymentStatus::Completed],
                    ..PaymentFilter::default()
                },
            )
            .await?;
        let payments_made = completed.iter().map(|p| p.amount).sum::<Decimal>();
        let last_payment_date = completed.iter().filter_map(|p| p.payment_date).max();

        let late_fees = self
            .ledger
            .list_late_fees(
                self.business,
                &LateFeeFilter {
                    lease_id: Some(lease.id),
                    statuses: vec![LateFeeStatus::Applied],
                    ..LateFeeFilter::default()
                },
            )
            .await?
            .iter()
            .map(|fee| fee.amount)
            .sum::<Decimal>();

        let total_owed = expected_rent + late_fees;
        let outstanding_balance = total_owed - payments_made;

        Ok(LeaseBalance {
            lease_id: lease.id,
            property_id: lease.property_id,
            monthly_rent: lease.monthly_rent,
            months_elapsed,
            expected_rent,
            payments_made,
            late_fees,
            total_owed,
            outstanding_balance,
            last_payment_date,
            payment_status: PaymentStanding::from_amounts(outstanding_balance, late_fees),
        })
    }

    /// Records a completed payment against a lease.
    pub async fn track_payment(
        &self,
        input: TrackPaymentInput,
        today: NaiveDate,
    ) -> AppResult<TrackedPayment> {
        check_payment_amount(input.amount)?;
        let lease = self.ledger.get_lease(self.business, input.lease_id).await?;
        let payment_date = input.payment_date.unwrap_or(today);
        let due_date = calendar::due_date_in_month(
            payment_date.year(),
            payment_date.month(),
            lease.rent_due_day,
        );

        let mut settled_pending = false;
        let payment = match self.pending_rent_row(&lease, input.payment_type, due_date).await? {
            Some(pending) if input.amount >= pending.amount => {
                settled_pending = true;
                self.ledger
                    .settle_payment(
                        self.business,
                        pending.id,
                        Settlement {
                            amount: input.amount,
                            payment_date,
                            payment_method: input.payment_method,
                            transaction_id: input.transaction_id,
                            notes: input.notes,
                        },
                    )
                    .await?
            }
            _ => {
                self.ledger
                    .insert_payment(
                        self.business,
                        NewPayment {
                            lease_id: lease.id,
                            amount: input.amount,
                            payment_type: input.payment_type,
                            payment_date: Some(payment_date),
                            due_date,
                            status: PaymentStatus::Completed,
                            payment_method: input.payment_method,
                            transaction_id: input.transaction_id,
                            description: input.description,
                            notes: input.notes,
                        },
                    )
                    .await?
            }
        };

        info!(
            business_id = %self.business,
            payment_id = %payment.id,
            lease_id = %lease.id,
            amount = %payment.amount,
            settled_pending,
            "Payment tracked"
        );

        let tenant_balance = self.calculate_tenant_balance(lease.tenant_id, today).await?;
        Ok(TrackedPayment {
            payment,
            settled_pending,
            tenant_balance,
        })
    }

    async fn pending_rent_row(
        &self,
        lease: &Lease,
        payment_type: PaymentType,
        due_date: NaiveDate,
    ) -> AppResult<Option<Payment>> {
        if payment_type != PaymentType::Rent {
            return Ok(None);
        }
        let rows = self
            .ledger
            .list_payments(
                self.business,
                &PaymentFilter {
                    lease_id: Some(lease.id),
                    statuses: vec![PaymentStatus::Pending],
                    payment_types: vec![PaymentType::Rent],
                    due_from: Some(due_date),
                    due_to: Some(due_date),
                    ..PaymentFilter::default()
                },
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Moves a payment along the allowed status transitions.
    pub async fn update_payment_status(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        notes: Option<String>,
        today: NaiveDate,
    ) -> AppResult<Payment> {
        let payment = self.ledger.get_payment(self.business, payment_id).await?;
        if !payment.status.can_transition_to(status) {
            return Err(AppError::Conflict(format!(
                "Cannot move payment from '{}' to '{}'.",
                payment.status.as_str(),
                status.as_str()
            )));
        }

        let updated = if status == PaymentStatus::Completed {
            self.ledger
                .settle_payment(
                    self.business,
                    payment.id,
                    Settlement {
                        amount: payment.amount,
                        payment_date: payment.payment_date.unwrap_or(today),
                        payment_method: payment.payment_method.clone(),
                        transaction_id: payment.transaction_id.clone(),
                        notes: notes.unwrap_or_default(),
                    },
                )
                .await?
        } else {
            self.ledger
                .update_payment_status(self.business, payment.id, payment.status, status, notes)
                .await?
        };

        info!(
            business_id = %self.business,
            payment_id = %updated.id,
            from = payment.status.as_str(),
            to = updated.status.as_str(),
            "Payment status updated"
        );
        Ok(updated)
    }

    /// Completed payments of the tenant paid within the last `months_back`
    /// 30-day months.
    pub async fn payment_history(
        &self,
        tenant_id: Uuid,
        months_back: u32,
        today: NaiveDate,
    ) -> AppResult<PaymentHistory> {
        let tenant = self.ledger.get_tenant(self.business, tenant_id).await?;
        let period_start = calendar::window_start(today, months_back);
        let mut payments = self
            .ledger
            .list_payments(
                self.business,
                &PaymentFilter {
                    tenant_id: Some(tenant.id),
                    statuses: vec![PaymentStatus::Completed],
                    paid_from: Some(period_start),
                    ..PaymentFilter::default()
                },
            )
            .await?;
        payments.sort_by(|a, b| b.payment_date.cmp(&a.payment_date));

        let entries = payments
            .into_iter()
            .filter_map(|payment| {
                let paid = payment.payment_date?;
                let days_late = (paid - payment.due_date).num_days().max(0);
                Some(HistoryEntry {
                    payment_id: payment.id,
                    lease_id: payment.lease_id,
                    amount: payment.amount,
                    payment_type: payment.payment_type,
                    payment_date: paid,
                    due_date: payment.due_date,
                    days_late,
                    is_late: paid > payment.due_date,
                })
            })
            .collect::<Vec<_>>();

        let total_payments = entries.len();
        let late = entries.iter().filter(|entry| entry.is_late).collect::<Vec<_>>();
        let late_payments = late.len();
        let on_time_payments = total_payments - late_payments;
        let average_days_late = if late.is_empty() {
            0.0
        } else {
            late.iter().map(|entry| entry.days_late as f64).sum::<f64>() / late.len() as f64
        };
        let reliability_score = if total_payments == 0 {
            0.0
        } else {
            round1(on_time_payments as f64 / total_payments as f64 * 100.0)
        };

        Ok(PaymentHistory {
            tenant_id: tenant.id,
            tenant_name: tenant.full_name(),
            months_back,
            period_start,
            total_payments,
            on_time_payments,
            late_payments,
            total_amount_paid: entries.iter().map(|entry| entry.amount).sum(),
            average_days_late: round1(average_days_late),
            reliability_score,
            payments: entries,
        })
    }

    /// Standing of every active tenant with at least one active lease.
    pub async fn all_balances(&self, today: NaiveDate) -> AppResult<BalanceOverview> {
        let tenants = self.ledger.list_tenants(self.business, true).await?;
        let mut balances = Vec::new();
        for tenant in &tenants {
            let balance = self.tenant_balance(tenant, today).await?;
            if !balance.leases.is_empty() {
                balances.push(balance);
            }
        }

        let total_expected_rent = balances.iter().map(|b| b.total_expected_rent).sum::<Decimal>();
        let total_payments_made = balances.iter().map(|b| b.total_payments_made).sum::<Decimal>();
        let total_late_fees = balances.iter().map(|b| b.total_late_fees).sum::<Decimal>();
        let total_owed = balances.iter().map(|b| b.total_owed).sum::<Decimal>();
        let current_tenants = balances
            .iter()
            .filter(|b| b.payment_status == PaymentStanding::Current)
            .count();

        Ok(BalanceOverview {
            as_of: today,
            total_tenants: balances.len(),
            current_tenants,
            overdue_tenants: balances.len() - current_tenants,
            total_expected_rent,
            total_payments_made,
            total_late_fees,
            total_outstanding: balances.iter().map(|b| b.total_outstanding).sum(),
            collection_rate: percentage(total_payments_made, total_owed),
            tenants: balances,
        })
    }
}

/// `part / whole` as a percentage clamped to [0, 100]; 0 when `whole` is not positive.
pub fn percentage(part: Decimal, whole: Decimal) -> f64 {
    if whole <= Decimal::ZERO {
        return 0.0;
    }
    let ratio = (part / whole * Decimal::ONE_HUNDRED).round_dp(2);
    f64::try_from(ratio).unwrap_or(0.0).clamp(0.0, 100.0)
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::{percentage, BalanceCalculator, PaymentStanding, TrackPaymentInput};
    use crate::{
        error::AppError,
        repository::{
            LateFeeStatus, LedgerStore, MemoryLedger, PaymentFilter, PaymentStatus, PaymentType,
        },
        services::testing::{date, seed_fee, seed_lease, seed_paid, seed_pending},
    };

    fn rent_input(lease_id: Uuid, amount: Decimal) -> TrackPaymentInput {
        TrackPaymentInput {
            lease_id,
            amount,
            payment_type: PaymentType::Rent,
            payment_date: None,
            payment_method: "bank_transfer".to_string(),
            transaction_id: "TX-1".to_string(),
            description: String::new(),
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn lease_started_95_days_ago_owes_four_months() {
        let ledger = MemoryLedger::new();
        let today = date(2026, 10, 16);
        let fixture = seed_lease(&ledger, dec!(1500), 1, date(2026, 7, 13)).await;
        let calculator = BalanceCalculator::new(&ledger, fixture.business);

        let balance = calculator
            .calculate_tenant_balance(fixture.tenant.id, today)
            .await
            .expect("balance");
        let lease = &balance.leases[0];
        assert_eq!(lease.months_elapsed, 4);
        assert_eq!(lease.expected_rent, dec!(6000));
        assert_eq!(lease.outstanding_balance, dec!(6000));
        assert_eq!(lease.payment_status, PaymentStanding::Overdue);
        assert_eq!(balance.total_outstanding, dec!(6000));
    }

    #[tokio::test]
    async fn balance_is_conserved_with_payments_and_fees() {
        let ledger = MemoryLedger::new();
        let today = date(2026, 5, 20);
        let fixture = seed_lease(&ledger, dec!(1000), 5, date(2026, 1, 1)).await;
        seed_paid(&ledger, &fixture, dec!(1000), date(2026, 1, 5), 0).await;
        seed_paid(&ledger, &fixture, dec!(1000), date(2026, 2, 5), 2).await;
        let overdue = seed_pending(&ledger, &fixture, dec!(1000), date(2026, 3, 5)).await;
        seed_fee(&ledger, &fixture, &overdue, dec!(50), LateFeeStatus::Applied, date(2026, 3, 12)).await;
        let waived = seed_pending(&ledger, &fixture, dec!(1000), date(2026, 4, 5)).await;
        seed_fee(&ledger, &fixture, &waived, dec!(50), LateFeeStatus::Waived, date(2026, 4, 12)).await;

        let calculator = BalanceCalculator::new(&ledger, fixture.business);
        let lease = calculator
            .calculate_lease_balance(fixture.lease.id, today)
            .await
            .expect("balance");

        assert_eq!(lease.months_elapsed, 5);
        assert_eq!(lease.late_fees, dec!(50));
        assert_eq!(
            lease.outstanding_balance + lease.payments_made,
            lease.expected_rent + lease.late_fees
        );
        assert_eq!(lease.outstanding_balance, dec!(3050));
        assert_eq!(lease.payment_status, PaymentStanding::OverdueWithFees);
    }

    #[tokio::test]
    async fn zero_elapsed_months_yield_credit() {
        let ledger = MemoryLedger::new();
        let fixture = seed_lease(&ledger, dec!(800), 25, date(2026, 6, 10)).await;
        seed_paid(&ledger, &fixture, dec!(800), date(2026, 6, 25), -10).await;

        let calculator = BalanceCalculator::new(&ledger, fixture.business);
        let lease = calculator
            .calculate_lease_balance(fixture.lease.id, date(2026, 6, 20))
            .await
            .expect("balance");
        assert_eq!(lease.months_elapsed, 0);
        assert_eq!(lease.outstanding_balance, dec!(-800));
        assert_eq!(lease.payment_status, PaymentStanding::Current);
    }

    #[tokio::test]
    async fn unknown_and_foreign_tenants_are_not_found() {
        let ledger = MemoryLedger::new();
        let fixture = seed_lease(&ledger, dec!(800), 1, date(2026, 1, 1)).await;
        let other = ledger.add_business("Other").await;

        let foreign = BalanceCalculator::new(&ledger, other)
            .calculate_tenant_balance(fixture.tenant.id, date(2026, 3, 1))
            .await;
        assert!(matches!(foreign, Err(AppError::NotFound(_))));

        let missing = BalanceCalculator::new(&ledger, fixture.business)
            .calculate_lease_balance(Uuid::new_v4(), date(2026, 3, 1))
            .await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn track_payment_settles_pending_rent_row() {
        let ledger = MemoryLedger::new();
        let fixture = seed_lease(&ledger, dec!(1200), 1, date(2026, 1, 1)).await;
        let pending = seed_pending(&ledger, &fixture, dec!(1200), date(2026, 3, 1)).await;
        let calculator = BalanceCalculator::new(&ledger, fixture.business);

        let tracked = calculator
            .track_payment(rent_input(fixture.lease.id, dec!(1200)), date(2026, 3, 3))
            .await
            .expect("tracked");
        assert!(tracked.settled_pending);
        assert_eq!(tracked.payment.id, pending.id);
        assert_eq!(tracked.payment.status, PaymentStatus::Completed);
        assert_eq!(tracked.payment.payment_date, Some(date(2026, 3, 3)));
        assert_eq!(tracked.tenant_balance.total_payments_made, dec!(1200));

        let partial = calculator
            .track_payment(rent_input(fixture.lease.id, dec!(100)), date(2026, 3, 4))
            .await
            .expect("tracked");
        assert!(!partial.settled_pending);
        assert_eq!(partial.payment.due_date, date(2026, 3, 1));
    }

    #[tokio::test]
    async fn track_payment_rejects_non_positive_amounts() {
        let ledger = MemoryLedger::new();
        let fixture = seed_lease(&ledger, dec!(1200), 1, date(2026, 1, 1)).await;
        let result = BalanceCalculator::new(&ledger, fixture.business)
            .track_payment(rent_input(fixture.lease.id, dec!(0)), date(2026, 3, 3))
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn track_payment_rejects_amounts_that_do_not_fit_cents() {
        let ledger = MemoryLedger::new();
        let fixture = seed_lease(&ledger, dec!(1200), 1, date(2026, 1, 1)).await;
        let calculator = BalanceCalculator::new(&ledger, fixture.business);
        let today = date(2026, 3, 3);

        for amount in [dec!(100.001), dec!(10000000000), Decimal::MAX] {
            let result = calculator
                .track_payment(rent_input(fixture.lease.id, amount), today)
                .await;
            assert!(
                matches!(result, Err(AppError::BadRequest(_))),
                "{amount} should be rejected"
            );
        }

        let trailing_zeros = calculator
            .track_payment(rent_input(fixture.lease.id, dec!(9999999999.990)), today)
            .await
            .expect("fits numeric(12, 2)");
        assert_eq!(trailing_zeros.payment.amount, dec!(9999999999.99));
        let payments = ledger
            .list_payments(fixture.business, &PaymentFilter::default())
            .await
            .expect("payments");
        assert_eq!(payments.len(), 1);
    }

    #[tokio::test]
    async fn status_transitions_are_monotonic() {
        let ledger = MemoryLedger::new();
        let fixture = seed_lease(&ledger, dec!(1200), 1, date(2026, 1, 1)).await;
        let pending = seed_pending(&ledger, &fixture, dec!(1200), date(2026, 3, 1)).await;
        let calculator = BalanceCalculator::new(&ledger, fixture.business);
        let today = date(2026, 3, 2);

        let completed = calculator
            .update_payment_status(pending.id, PaymentStatus::Completed, None, today)
            .await
            .expect("completed");
        assert_eq!(completed.payment_date, Some(today));

        let back = calculator
            .update_payment_status(pending.id, PaymentStatus::Pending, None, today)
            .await;
        assert!(matches!(back, Err(AppError::Conflict(_))));

        let refunded = calculator
            .update_payment_status(
                pending.id,
                PaymentStatus::Refunded,
                Some("Duplicate charge".to_string()),
                today,
            )
            .await
            .expect("refunded");
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        assert_eq!(refunded.notes, "Duplicate charge");
    }

    #[tokio::test]
    async fn payment_history_scores_reliability() {
        let ledger = MemoryLedger::new();
        let today = date(2026, 6, 1);
        let fixture = seed_lease(&ledger, dec!(500), 1, date(2025, 1, 1)).await;
        seed_paid(&ledger, &fixture, dec!(500), date(2026, 5, 1), 0).await;
        seed_paid(&ledger, &fixture, dec!(500), date(2026, 4, 1), 6).await;
        seed_paid(&ledger, &fixture, dec!(500), date(2026, 3, 1), 0).await;
        // Outside the 12 x 30 day window.
        seed_paid(&ledger, &fixture, dec!(500), date(2025, 5, 1), 9).await;

        let history = BalanceCalculator::new(&ledger, fixture.business)
            .payment_history(fixture.tenant.id, 12, today)
            .await
            .expect("history");
        assert_eq!(history.total_payments, 3);
        assert_eq!(history.late_payments, 1);
        assert_eq!(history.reliability_score, 66.7);
        assert_eq!(history.average_days_late, 6.0);
        assert_eq!(history.payments[0].due_date, date(2026, 5, 1));
        assert_eq!(history.total_amount_paid, dec!(1500));

        let empty_ledger = MemoryLedger::new();
        let empty = seed_lease(&empty_ledger, dec!(500), 1, date(2025, 1, 1)).await;
        let none = BalanceCalculator::new(&empty_ledger, empty.business)
            .payment_history(empty.tenant.id, 12, today)
            .await
            .expect("history");
        assert_eq!(none.reliability_score, 0.0);
        assert!(!none.has_history());
    }

    #[tokio::test]
    async fn all_balances_bounds_collection_rate() {
        let ledger = MemoryLedger::new();
        let fixture = seed_lease(&ledger, dec!(1000), 1, date(2026, 1, 1)).await;
        // Prepaid well beyond what is owed.
        seed_paid(&ledger, &fixture, dec!(9000), date(2026, 1, 1), 0).await;

        let overview = BalanceCalculator::new(&ledger, fixture.business)
            .all_balances(date(2026, 2, 15))
            .await
            .expect("overview");
        assert_eq!(overview.total_tenants, 1);
        assert_eq!(overview.current_tenants, 1);
        assert_eq!(overview.collection_rate, 100.0);
    }

    #[test]
    fn percentage_handles_empty_denominator() {
        assert_eq!(percentage(dec!(10), Decimal::ZERO), 0.0);
        assert_eq!(percentage(dec!(1), dec!(3)), 33.33);
        assert_eq!(percentage(dec!(-5), dec!(10)), 0.0);
    }
}
