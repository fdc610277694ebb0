use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    repository::{
        LateFee, LateFeeFilter, LateFeeStatus, Lease, LeaseFilter, LeaseStatus, LedgerStore,
        NewLateFee, NewReminder, PaymentFilter, PaymentStatus, PaymentType, ReminderFilter,
        ReminderStatus, ReminderType,
    },
    services::{
        balance::{BalanceCalculator, PaymentHistory},
        calendar,
        notifications::Notifier,
        policy::{FinancePolicy, LateFeeRules, WaiverPolicy},
        property_titles, reminders,
    },
    tenancy::BusinessId,
};

/// Applied fees younger than this many days still get a notice.
const NOTICE_WINDOW_DAYS: i64 = 3;
const TOP_PROPERTIES: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct FeeBreakdown {
    pub fee_amount: Decimal,
    pub base_fee: Decimal,
    pub daily_fees: Decimal,
    pub days_overdue: i64,
    pub grace_period_expired: bool,
    pub capped_at_maximum: bool,
    pub max_fee_limit: Decimal,
    pub rent_amount: Decimal,
    pub rules: LateFeeRules,
}

/// Outcome of a fee calculation. Not being overdue is an answer, not an error.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LateFeeQuote {
    NotApplicable { reason: String, days_overdue: i64 },
    Applicable(FeeBreakdown),
}

impl LateFeeQuote {
    pub fn fee_amount(&self) -> Decimal {
        match self {
            Self::NotApplicable { .. } => Decimal::ZERO,
            Self::Applicable(breakdown) => breakdown.fee_amount,
        }
    }
}

/// Fee owed on `amount` due at `due_date`, as of `today`.
pub fn quote_fee(
    amount: Decimal,
    due_date: NaiveDate,
    today: NaiveDate,
    rules: &LateFeeRules,
    override_grace: bool,
) -> LateFeeQuote {
    let days_overdue = (today - due_date).num_days();
    if days_overdue <= 0 {
        return LateFeeQuote::NotApplicable {
            reason: "Payment is not overdue".to_string(),
            days_overdue: 0,
        };
    }
    let grace_period_expired = days_overdue > rules.grace_period_days;
    if !grace_period_expired && !override_grace {
        return LateFeeQuote::NotApplicable {
            reason: format!("Within {}-day grace period", rules.grace_period_days),
            days_overdue,
        };
    }

    let base_fee = if rules.use_flat_fee {
        rules.flat_fee
    } else {
        amount * rules.percentage_fee
    };
    let daily_fees = if rules.compound_daily && grace_period_expired {
        rules.daily_fee * Decimal::from(days_overdue - rules.grace_period_days)
    } else {
        Decimal::ZERO
    };

    let total = base_fee + daily_fees;
    let max_fee = amount * rules.max_fee_percentage;
    let capped_at_maximum = total > max_fee;
    let mut fee_amount = total.min(max_fee).round_dp(2);
    if fee_amount > max_fee {
        fee_amount = max_fee.round_dp_with_strategy(2, RoundingStrategy::ToZero);
    }

    LateFeeQuote::Applicable(FeeBreakdown {
        fee_amount,
        base_fee: base_fee.round_dp(2),
        daily_fees: daily_fees.round_dp(2),
        days_overdue,
        grace_period_expired,
        capped_at_maximum,
        max_fee_limit: max_fee.round_dp(2),
        rent_amount: amount,
        rules: *rules,
    })
}

/// First matching courtesy waiver, checked in order of generosity.
pub fn waiver_reason(
    policy: &WaiverPolicy,
    history: &PaymentHistory,
    days_overdue: i64,
) -> Option<&'static str> {
    if !policy.enabled {
        return None;
    }
    let reliability = history.reliability_score;
    if reliability > policy.excellent_reliability {
        return Some("Excellent payment history - courtesy waiver");
    }
    if history.late_payments <= policy.first_offense_max_late as usize {
        return Some("First late payment in 12 months - courtesy waiver");
    }
    if days_overdue <= policy.minor_delay_days && reliability > policy.minor_delay_reliability {
        return Some("Minor delay with good payment history");
    }
    None
}

pub fn validate_rules(rules: &LateFeeRules) -> AppResult<()> {
    rules
        .validate()
        .map_err(|errors| AppError::BadRequest(format!("Invalid late fee rules: {errors}")))
}

#[derive(Debug, Clone, Serialize)]
pub struct AssessedPayment {
    pub payment_id: Uuid,
    pub late_fee_id: Uuid,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub days_overdue: i64,
    pub late_fee_amount: Decimal,
    pub status: LateFeeStatus,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaseFeeOutcome {
    pub lease_id: Uuid,
    pub tenant_name: String,
    pub overdue_payments: usize,
    pub fees_applied: usize,
    pub fees_waived: usize,
    pub already_assessed: usize,
    pub within_grace: usize,
    pub total_fees_amount: Decimal,
    pub payment_details: Vec<AssessedPayment>,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyLateFeesResult {
    pub as_of: NaiveDate,
    pub force_apply: bool,
    pub processed_leases: usize,
    pub fees_applied: usize,
    pub fees_waived: usize,
    pub already_assessed: usize,
    pub total_fees_amount: Decimal,
    pub leases: Vec<LeaseFeeOutcome>,
    pub failed_leases: Vec<ItemFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoticeResult {
    pub late_fee_id: Uuid,
    pub reminder_id: Option<Uuid>,
    pub tenant_name: String,
    pub late_fee_amount: Decimal,
    pub delivered: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LateFeeNoticeRun {
    pub notices_sent: usize,
    pub notices_failed: usize,
    pub already_notified: usize,
    pub notices: Vec<NoticeResult>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MonthlyFees {
    pub month: String,
    pub count: usize,
    pub amount: Decimal,
    pub applied: usize,
    pub waived: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertyFees {
    pub property_id: Uuid,
    pub property: String,
    pub fee_count: usize,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct LateFeeSummary {
    pub period_months: u32,
    pub period_start: NaiveDate,
    pub total_late_fees: usize,
    pub total_amount: Decimal,
    pub applied_fees: usize,
    pub waived_fees: usize,
    pub pending_fees: usize,
    pub average_fee_amount: Decimal,
    pub by_month: Vec<MonthlyFees>,
    pub top_properties: Vec<PropertyFees>,
    pub waiver_reasons: BTreeMap<String, usize>,
}

/// Late fee assessment, waivers and notices for one business.
pub struct LateFeeEngine<'a> {
    ledger: &'a dyn LedgerStore,
    business: BusinessId,
    policy: &'a FinancePolicy,
    timezone: Tz,
}

impl<'a> LateFeeEngine<'a> {
    pub fn new(ledger: &'a dyn LedgerStore, business: BusinessId, policy: &'a FinancePolicy) -> Self {
        Self {
            ledger,
            business,
            policy,
            timezone: Tz::UTC,
        }
    }

    /// Finance time zone used to turn `now` into a calendar day. Defaults to UTC.
    pub fn in_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Rules in force for a lease: its own override, else the business default.
    fn rules_for(&self, lease: &Lease) -> LateFeeRules {
        lease.late_fee_rules.unwrap_or(self.policy.late_fee_rules)
    }

    pub async fn calculate_late_fee(
        &self,
        payment_id: Uuid,
        custom_rules: Option<LateFeeRules>,
        override_grace: bool,
        today: NaiveDate,
    ) -> AppResult<LateFeeQuote> {
        if let Some(rules) = &custom_rules {
            validate_rules(rules)?;
        }
        let payment = self.ledger.get_payment(self.business, payment_id).await?;
        if payment.payment_type == PaymentType::LateFee {
            return Ok(LateFeeQuote::NotApplicable {
                reason: "Late fee payments do not accrue late fees".to_string(),
                days_overdue: 0,
            });
        }
        if payment.status != PaymentStatus::Pending {
            return Ok(LateFeeQuote::NotApplicable {
                reason: format!("Payment is {}", payment.status.as_str()),
                days_overdue: 0,
            });
        }
        // Caller-supplied rules stand in for the grace period check.
        let override_grace = override_grace || custom_rules.is_some();
        let lease = self.ledger.get_lease(self.business, payment.lease_id).await?;
        let rules = custom_rules.unwrap_or_else(|| self.rules_for(&lease));
        Ok(quote_fee(
            payment.amount,
            payment.due_date,
            today,
            &rules,
            override_grace,
        ))
    }

    /// Assesses every overdue pending payment of active leases that does not
    /// carry a fee yet. Failures are reported per lease and per payment.
    pub async fn apply_late_fees(
        &self,
        lease_id: Option<Uuid>,
        force_apply: bool,
        today: NaiveDate,
    ) -> AppResult<ApplyLateFeesResult> {
        let leases = match lease_id {
            Some(id) => {
                let lease = self.ledger.get_lease(self.business, id).await?;
                if lease.status == LeaseStatus::Active {
                    vec![lease]
                } else {
                    Vec::new()
                }
            }
            None => {
                self.ledger
                    .list_leases(self.business, &LeaseFilter::active())
                    .await?
            }
        };

        let mut result = ApplyLateFeesResult {
            as_of: today,
            force_apply,
            processed_leases: 0,
            fees_applied: 0,
            fees_waived: 0,
            already_assessed: 0,
            total_fees_amount: Decimal::ZERO,
            leases: Vec::new(),
            failed_leases: Vec::new(),
        };

        for lease in &leases {
            match self.assess_lease(lease, force_apply, today).await {
                Ok(outcome) => {
                    result.processed_leases += 1;
                    result.fees_applied += outcome.fees_applied;
                    result.fees_waived += outcome.fees_waived;
                    result.already_assessed += outcome.already_assessed;
                    result.total_fees_amount += outcome.total_fees_amount;
                    result.leases.push(outcome);
                }
                Err(error) => {
                    warn!(business_id = %self.business, lease_id = %lease.id, error = %error, "Late fee assessment failed for lease");
                    result.failed_leases.push(ItemFailure {
                        id: lease.id,
                        error: error.to_string(),
                    });
                }
            }
        }

        info!(
            business_id = %self.business,
            leases = result.processed_leases,
            applied = result.fees_applied,
            waived = result.fees_waived,
            already_assessed = result.already_assessed,
            failed = result.failed_leases.len(),
            total = %result.total_fees_amount,
            "Late fee run completed"
        );
        Ok(result)
    }

    async fn assess_lease(
        &self,
        lease: &Lease,
        force_apply: bool,
        today: NaiveDate,
    ) -> AppResult<LeaseFeeOutcome> {
        let tenant = self.ledger.get_tenant(self.business, lease.tenant_id).await?;
        let overdue = self
            .ledger
            .list_payments(
                self.business,
                &PaymentFilter {
                    lease_id: Some(lease.id),
                    ..PaymentFilter::overdue(today)
                },
            )
            .await?
            .into_iter()
            .filter(|payment| payment.payment_type != PaymentType::LateFee)
            .collect::<Vec<_>>();

        let mut outcome = LeaseFeeOutcome {
            lease_id: lease.id,
            tenant_name: tenant.full_name(),
            overdue_payments: overdue.len(),
            fees_applied: 0,
            fees_waived: 0,
            already_assessed: 0,
            within_grace: 0,
            total_fees_amount: Decimal::ZERO,
            payment_details: Vec::new(),
            failures: Vec::new(),
        };
        if overdue.is_empty() {
            return Ok(outcome);
        }

        let assessed = self
            .ledger
            .list_late_fees(
                self.business,
                &LateFeeFilter {
                    lease_id: Some(lease.id),
                    ..LateFeeFilter::default()
                },
            )
            .await?
            .into_iter()
            .map(|fee| fee.payment_id)
            .collect::<HashSet<_>>();

        let rules = self.rules_for(lease);
        let mut history: Option<PaymentHistory> = None;

        for payment in overdue {
            if assessed.contains(&payment.id) {
                outcome.already_assessed += 1;
                continue;
            }
            let LateFeeQuote::Applicable(breakdown) =
                quote_fee(payment.amount, payment.due_date, today, &rules, force_apply)
            else {
                outcome.within_grace += 1;
                continue;
            };

            if history.is_none() {
                history = Some(
                    BalanceCalculator::new(self.ledger, self.business)
                        .payment_history(tenant.id, self.policy.waiver.history_months, today)
                        .await?,
                );
            }
            let waiver = history
                .as_ref()
                .and_then(|h| waiver_reason(&self.policy.waiver, h, breakdown.days_overdue));
            let status = if waiver.is_some() {
                LateFeeStatus::Waived
            } else {
                LateFeeStatus::Applied
            };

            let inserted = self
                .ledger
                .insert_late_fee_if_absent(
                    self.business,
                    NewLateFee {
                        payment_id: payment.id,
                        amount: breakdown.fee_amount,
                        days_overdue: breakdown.days_overdue,
                        fee_date: today,
                        status,
                        waive_reason: waiver.unwrap_or_default().to_string(),
                    },
                )
                .await;

            match inserted {
                Ok(Some(fee)) => {
                    match fee.status {
                        LateFeeStatus::Waived => outcome.fees_waived += 1,
                        _ => {
                            outcome.fees_applied += 1;
                            outcome.total_fees_amount += fee.amount;
                        }
                    }
                    outcome.payment_details.push(AssessedPayment {
                        payment_id: payment.id,
                        late_fee_id: fee.id,
                        amount: payment.amount,
                        due_date: payment.due_date,
                        days_overdue: fee.days_overdue,
                        late_fee_amount: fee.amount,
                        status: fee.status,
                        reason: waiver.unwrap_or("Standard late fee").to_string(),
                    });
                }
                // Another run assessed it between our read and insert.
                Ok(None) => outcome.already_assessed += 1,
                Err(error) => {
                    warn!(payment_id = %payment.id, error = %error, "Could not record late fee");
                    outcome.failures.push(ItemFailure {
                        id: payment.id,
                        error: error.to_string(),
                    });
                }
            }
        }

        Ok(outcome)
    }

    pub async fn waive_late_fee(
        &self,
        late_fee_id: Uuid,
        reason: &str,
        waived_by: &str,
    ) -> AppResult<LateFee> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::BadRequest("A waive reason is required.".to_string()));
        }
        let waived_by = match waived_by.trim() {
            "" => "system",
            name => name,
        };

        let fee = self.ledger.get_late_fee(self.business, late_fee_id).await?;
        if fee.status == LateFeeStatus::Waived {
            return Err(AppError::Conflict("Late fee already waived.".to_string()));
        }
        let waived = self
            .ledger
            .waive_late_fee(
                self.business,
                fee.id,
                format!("{reason} (Waived by: {waived_by})"),
            )
            .await?;

        info!(
            business_id = %self.business,
            late_fee_id = %waived.id,
            amount = %waived.amount,
            waived_by,
            "Late fee waived"
        );
        Ok(waived)
    }

    /// Delivers a notice for each recently applied fee that has not had one.
    pub async fn send_late_fee_notices(
        &self,
        notifier: &dyn Notifier,
        now: DateTime<Utc>,
    ) -> AppResult<LateFeeNoticeRun> {
        let today = calendar::local_date(now, self.timezone);
        let fees = self
            .ledger
            .list_late_fees(
                self.business,
                &LateFeeFilter {
                    statuses: vec![LateFeeStatus::Applied],
                    fee_date_from: Some(today - Duration::days(NOTICE_WINDOW_DAYS)),
                    ..LateFeeFilter::default()
                },
            )
            .await?;
        let titles = property_titles(self.ledger, self.business).await?;

        let mut run = LateFeeNoticeRun {
            notices_sent: 0,
            notices_failed: 0,
            already_notified: 0,
            notices: Vec::new(),
        };

        for fee in &fees {
            let notified = self
                .ledger
                .list_reminders(
                    self.business,
                    &ReminderFilter {
                        payment_id: Some(fee.payment_id),
                        statuses: vec![ReminderStatus::Sent],
                        reminder_type: Some(ReminderType::LateFeeNotice),
                        ..ReminderFilter::default()
                    },
                )
                .await?;
            if !notified.is_empty() {
                run.already_notified += 1;
                continue;
            }

            let result = self.send_notice(fee, &titles, notifier, now).await;
            let result = result.unwrap_or_else(|error| NoticeResult {
                late_fee_id: fee.id,
                reminder_id: None,
                tenant_name: String::new(),
                late_fee_amount: fee.amount,
                delivered: false,
                error: Some(error.to_string()),
            });
            if result.delivered {
                run.notices_sent += 1;
            } else {
                run.notices_failed += 1;
            }
            run.notices.push(result);
        }

        info!(
            business_id = %self.business,
            sent = run.notices_sent,
            failed = run.notices_failed,
            "Late fee notices processed"
        );
        Ok(run)
    }

    async fn send_notice(
        &self,
        fee: &LateFee,
        titles: &HashMap<Uuid, String>,
        notifier: &dyn Notifier,
        now: DateTime<Utc>,
    ) -> AppResult<NoticeResult> {
        let payment = self.ledger.get_payment(self.business, fee.payment_id).await?;
        let lease = self.ledger.get_lease(self.business, payment.lease_id).await?;
        let tenant = self.ledger.get_tenant(self.business, lease.tenant_id).await?;
        let property = titles
            .get(&lease.property_id)
            .map(String::as_str)
            .unwrap_or("your rental");

        let (subject, message) = reminders::late_fee_notice(&tenant, property, &payment, fee);
        let reminder = self
            .ledger
            .insert_reminder(
                self.business,
                NewReminder {
                    payment_id: payment.id,
                    reminder_type: ReminderType::LateFeeNotice,
                    scheduled_at: now,
                    subject,
                    message,
                },
            )
            .await?;
        let delivered =
            reminders::deliver(self.ledger, self.business, notifier, &reminder, &tenant.email, now)
                .await?
                .ok_or_else(|| AppError::Conflict("Notice was already processed.".to_string()))?;

        Ok(NoticeResult {
            late_fee_id: fee.id,
            reminder_id: Some(reminder.id),
            tenant_name: tenant.full_name(),
            late_fee_amount: fee.amount,
            delivered: delivered.status == ReminderStatus::Sent,
            error: (delivered.status == ReminderStatus::Failed).then(|| delivered.error_message),
        })
    }

    pub async fn late_fee_summary(
        &self,
        months_back: u32,
        today: NaiveDate,
    ) -> AppResult<LateFeeSummary> {
        let period_start = calendar::window_start(today, months_back);
        let fees = self
            .ledger
            .list_late_fees(
                self.business,
                &LateFeeFilter {
                    fee_date_from: Some(period_start),
                    fee_date_to: Some(today),
                    ..LateFeeFilter::default()
                },
            )
            .await?;

        let count_status = |status: LateFeeStatus| fees.iter().filter(|f| f.status == status).count();
        let total_amount = fees.iter().map(|fee| fee.amount).sum::<Decimal>();
        let average_fee_amount = if fees.is_empty() {
            Decimal::ZERO
        } else {
            (total_amount / Decimal::from(fees.len())).round_dp(2)
        };

        let mut by_month = Vec::new();
        let mut month = calendar::first_of_month(period_start);
        while month <= today {
            let key = calendar::month_key(month);
            let mut bucket = MonthlyFees {
                month: key,
                ..MonthlyFees::default()
            };
            for fee in fees.iter().filter(|f| {
                f.fee_date.year() == month.year() && f.fee_date.month() == month.month()
            }) {
                bucket.count += 1;
                bucket.amount += fee.amount;
                match fee.status {
                    LateFeeStatus::Applied => bucket.applied += 1,
                    LateFeeStatus::Waived => bucket.waived += 1,
                    LateFeeStatus::Pending => {}
                }
            }
            by_month.push(bucket);
            month = calendar::shift_month(month, 1);
        }

        let titles = property_titles(self.ledger, self.business).await?;
        let mut property_of_payment: HashMap<Uuid, Uuid> = HashMap::new();
        let mut per_property: HashMap<Uuid, PropertyFees> = HashMap::new();
        for fee in &fees {
            let property_id = match property_of_payment.get(&fee.payment_id) {
                Some(id) => *id,
                None => {
                    let payment = self.ledger.get_payment(self.business, fee.payment_id).await?;
                    let lease = self.ledger.get_lease(self.business, payment.lease_id).await?;
                    property_of_payment.insert(fee.payment_id, lease.property_id);
                    lease.property_id
                }
            };
            let entry = per_property.entry(property_id).or_insert_with(|| PropertyFees {
                property_id,
                property: titles.get(&property_id).cloned().unwrap_or_default(),
                fee_count: 0,
                total_amount: Decimal::ZERO,
            });
            entry.fee_count += 1;
            entry.total_amount += fee.amount;
        }
        let mut top_properties = per_property.into_values().collect::<Vec<_>>();
        top_properties.sort_by(|a, b| {
            b.fee_count
                .cmp(&a.fee_count)
                .then(b.total_amount.cmp(&a.total_amount))
        });
        top_properties.truncate(TOP_PROPERTIES);

        let mut waiver_reasons = BTreeMap::new();
        for fee in fees
            .iter()
            .filter(|f| f.status == LateFeeStatus::Waived && !f.waive_reason.is_empty())
        {
            let reason = fee
                .waive_reason
                .split('(')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            *waiver_reasons.entry(reason).or_insert(0) += 1;
        }

        Ok(LateFeeSummary {
            period_months: months_back,
            period_start,
            total_late_fees: fees.len(),
            total_amount,
            applied_fees: count_status(LateFeeStatus::Applied),
            waived_fees: count_status(LateFeeStatus::Waived),
            pending_fees: count_status(LateFeeStatus::Pending),
            average_fee_amount,
            by_month,
            top_properties,
            waiver_reasons,
        })
    }

    /// Stores a rule override on the lease; `None` reverts to the business default.
    pub async fn update_late_fee_rules(
        &self,
        lease_id: Uuid,
        rules: Option<LateFeeRules>,
    ) -> AppResult<Lease> {
        if let Some(rules) = &rules {
            validate_rules(rules)?;
        }
        let lease = self
            .ledger
            .set_lease_fee_rules(self.business, lease_id, rules)
            .await?;
        info!(
            business_id = %self.business,
            lease_id = %lease.id,
            custom = lease.late_fee_rules.is_some(),
            "Late fee rules updated"
        );
        Ok(lease)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::{quote_fee, LateFeeEngine, LateFeeQuote};
    use crate::{
        error::AppError,
        repository::{
            LateFeeFilter, LateFeeStatus, LedgerStore, MemoryLedger, ReminderFilter,
            ReminderStatus, ReminderType,
        },
        services::{
            policy::{FinancePolicy, LateFeeRules},
            testing::{
                at, date, seed_fee, seed_history, seed_lease, seed_pending, RecordingNotifier,
            },
        },
    };

    #[test]
    fn grace_period_boundary_is_exclusive() {
        let rules = LateFeeRules::default();
        let due = date(2026, 3, 1);

        let within = quote_fee(dec!(1000), due, due + Duration::days(5), &rules, false);
        assert!(matches!(
            within,
            LateFeeQuote::NotApplicable { ref reason, days_overdue: 5 } if reason.contains("grace")
        ));
        assert_eq!(within.fee_amount(), Decimal::ZERO);

        let after = quote_fee(dec!(1000), due, due + Duration::days(6), &rules, false);
        assert_eq!(after.fee_amount(), dec!(50.00));

        let early = quote_fee(dec!(1000), due, due, &rules, true);
        assert!(matches!(early, LateFeeQuote::NotApplicable { days_overdue: 0, .. }));
    }

    #[test]
    fn fee_never_exceeds_cap() {
        let rules = LateFeeRules {
            compound_daily: true,
            daily_fee: dec!(5),
            ..LateFeeRules::default()
        };
        let due = date(2026, 1, 1);
        for (amount, days) in [(dec!(1000), 200), (dec!(333.33), 60), (dec!(10), 6), (dec!(2500), 9)] {
            let quote = quote_fee(amount, due, due + Duration::days(days), &rules, false);
            assert!(quote.fee_amount() <= amount * rules.max_fee_percentage);
        }

        let LateFeeQuote::Applicable(capped) =
            quote_fee(dec!(1000), due, due + Duration::days(200), &rules, false)
        else {
            panic!("expected a fee");
        };
        assert!(capped.capped_at_maximum);
        assert_eq!(capped.fee_amount, dec!(200.00));
        assert_eq!(capped.daily_fees, dec!(975.00));
    }

    #[test]
    fn percentage_fee_with_daily_component() {
        let rules = LateFeeRules {
            use_flat_fee: false,
            compound_daily: true,
            ..LateFeeRules::default()
        };
        let due = date(2026, 1, 1);
        let LateFeeQuote::Applicable(fee) =
            quote_fee(dec!(1200), due, due + Duration::days(8), &rules, false)
        else {
            panic!("expected a fee");
        };
        assert_eq!(fee.base_fee, dec!(60.00));
        assert_eq!(fee.daily_fees, dec!(15.00));
        assert_eq!(fee.fee_amount, dec!(75.00));
        assert!(!fee.capped_at_maximum);
    }

    #[tokio::test]
    async fn applying_twice_creates_one_fee() {
        let ledger = MemoryLedger::new();
        let today = date(2026, 5, 20);
        let fixture = seed_lease(&ledger, dec!(1000), 1, date(2025, 1, 1)).await;
        seed_history(&ledger, &fixture, today, 2, 3).await;
        let overdue = seed_pending(&ledger, &fixture, dec!(1000), today - Duration::days(12)).await;
        let policy = FinancePolicy::default();
        let engine = LateFeeEngine::new(&ledger, fixture.business, &policy);

        let first = engine.apply_late_fees(None, false, today).await.expect("first run");
        assert_eq!(first.fees_applied, 1);
        assert_eq!(first.total_fees_amount, dec!(50.00));

        let second = engine
            .apply_late_fees(Some(fixture.lease.id), true, today)
            .await
            .expect("second run");
        assert_eq!(second.fees_applied + second.fees_waived, 0);
        assert_eq!(second.already_assessed, 1);

        let fees = ledger
            .list_late_fees(
                fixture.business,
                &LateFeeFilter {
                    payment_id: Some(overdue.id),
                    ..LateFeeFilter::default()
                },
            )
            .await
            .expect("fees");
        assert_eq!(fees.len(), 1);
    }

    #[tokio::test]
    async fn reliable_tenant_gets_courtesy_waiver() {
        let ledger = MemoryLedger::new();
        let today = date(2026, 9, 30);
        let fixture = seed_lease(&ledger, dec!(1000), 1, date(2025, 1, 1)).await;
        seed_history(&ledger, &fixture, today, 24, 1).await;
        seed_pending(&ledger, &fixture, dec!(1000), today - Duration::days(20)).await;
        let policy = FinancePolicy::default();

        let result = LateFeeEngine::new(&ledger, fixture.business, &policy)
            .apply_late_fees(None, false, today)
            .await
            .expect("run");
        assert_eq!(result.fees_waived, 1);
        assert_eq!(result.fees_applied, 0);
        let detail = &result.leases[0].payment_details[0];
        assert_eq!(detail.status, LateFeeStatus::Waived);
        assert!(detail.reason.contains("Excellent payment history"));
        assert_eq!(result.total_fees_amount, Decimal::ZERO);
    }

    #[tokio::test]
    async fn forced_percentage_fee_applies_inside_grace() {
        let ledger = MemoryLedger::new();
        let today = date(2026, 9, 30);
        let fixture = seed_lease(&ledger, dec!(2000), 1, date(2025, 1, 1)).await;
        seed_history(&ledger, &fixture, today, 2, 3).await;
        seed_pending(&ledger, &fixture, dec!(2000), today - Duration::days(3)).await;
        let policy = FinancePolicy::default();
        let engine = LateFeeEngine::new(&ledger, fixture.business, &policy);
        engine
            .update_late_fee_rules(
                fixture.lease.id,
                Some(LateFeeRules {
                    use_flat_fee: false,
                    percentage_fee: dec!(0.05),
                    ..LateFeeRules::default()
                }),
            )
            .await
            .expect("rules stored");

        let unforced = engine.apply_late_fees(None, false, today).await.expect("run");
        assert_eq!(unforced.leases[0].within_grace, 1);

        let forced = engine.apply_late_fees(None, true, today).await.expect("run");
        assert_eq!(forced.fees_applied, 1);
        let detail = &forced.leases[0].payment_details[0];
        assert_eq!(detail.status, LateFeeStatus::Applied);
        assert_eq!(detail.late_fee_amount, dec!(100.00));
    }

    #[tokio::test]
    async fn custom_rules_quote_inside_grace() {
        let ledger = MemoryLedger::new();
        let today = date(2026, 9, 30);
        let fixture = seed_lease(&ledger, dec!(2000), 1, date(2025, 1, 1)).await;
        let payment =
            seed_pending(&ledger, &fixture, dec!(2000), today - Duration::days(3)).await;
        let policy = FinancePolicy::default();
        let engine = LateFeeEngine::new(&ledger, fixture.business, &policy);

        let default_quote = engine
            .calculate_late_fee(payment.id, None, false, today)
            .await
            .expect("quote");
        assert!(matches!(
            default_quote,
            LateFeeQuote::NotApplicable { days_overdue: 3, .. }
        ));

        let custom = LateFeeRules {
            use_flat_fee: false,
            percentage_fee: dec!(0.05),
            ..LateFeeRules::default()
        };
        let LateFeeQuote::Applicable(fee) = engine
            .calculate_late_fee(payment.id, Some(custom), false, today)
            .await
            .expect("quote")
        else {
            panic!("custom rules should skip the grace period");
        };
        assert_eq!(fee.fee_amount, dec!(100.00));
        assert_eq!(fee.days_overdue, 3);
        assert!(!fee.grace_period_expired);
    }

    #[tokio::test]
    async fn first_offense_is_waived() {
        let ledger = MemoryLedger::new();
        let today = date(2026, 9, 30);
        let fixture = seed_lease(&ledger, dec!(900), 1, date(2025, 1, 1)).await;
        seed_history(&ledger, &fixture, today, 3, 1).await;
        seed_pending(&ledger, &fixture, dec!(900), today - Duration::days(10)).await;
        let policy = FinancePolicy::default();

        let result = LateFeeEngine::new(&ledger, fixture.business, &policy)
            .apply_late_fees(None, false, today)
            .await
            .expect("run");
        assert!(result.leases[0].payment_details[0]
            .reason
            .starts_with("First late payment"));
    }

    #[tokio::test]
    async fn custom_rules_are_validated() {
        let ledger = MemoryLedger::new();
        let fixture = seed_lease(&ledger, dec!(900), 1, date(2026, 1, 1)).await;
        let payment = seed_pending(&ledger, &fixture, dec!(900), date(2026, 3, 1)).await;
        let policy = FinancePolicy::default();
        let engine = LateFeeEngine::new(&ledger, fixture.business, &policy);

        let invalid = LateFeeRules {
            max_fee_percentage: dec!(3),
            ..LateFeeRules::default()
        };
        let result = engine
            .calculate_late_fee(payment.id, Some(invalid), false, date(2026, 3, 20))
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        let stored = engine.update_late_fee_rules(fixture.lease.id, Some(invalid)).await;
        assert!(matches!(stored, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn waiving_twice_conflicts() {
        let ledger = MemoryLedger::new();
        let fixture = seed_lease(&ledger, dec!(900), 1, date(2026, 1, 1)).await;
        let payment = seed_pending(&ledger, &fixture, dec!(900), date(2026, 3, 1)).await;
        let fee = seed_fee(&ledger, &fixture, &payment, dec!(50), LateFeeStatus::Applied, date(2026, 3, 10)).await;
        let policy = FinancePolicy::default();
        let engine = LateFeeEngine::new(&ledger, fixture.business, &policy);

        let missing_reason = engine.waive_late_fee(fee.id, "  ", "Maria").await;
        assert!(matches!(missing_reason, Err(AppError::BadRequest(_))));

        let waived = engine
            .waive_late_fee(fee.id, "Bank outage", "Maria")
            .await
            .expect("waived");
        assert_eq!(waived.status, LateFeeStatus::Waived);
        assert_eq!(waived.waive_reason, "Bank outage (Waived by: Maria)");

        let again = engine.waive_late_fee(fee.id, "Bank outage", "Maria").await;
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn notices_go_out_once_per_fee() {
        let ledger = MemoryLedger::new();
        let now = at(2026, 3, 12, 9);
        let fixture = seed_lease(&ledger, dec!(900), 1, date(2026, 1, 1)).await;
        let payment = seed_pending(&ledger, &fixture, dec!(900), date(2026, 3, 1)).await;
        seed_fee(&ledger, &fixture, &payment, dec!(50), LateFeeStatus::Applied, date(2026, 3, 11)).await;
        let policy = FinancePolicy::default();
        let engine = LateFeeEngine::new(&ledger, fixture.business, &policy);
        let notifier = RecordingNotifier::default();

        let first = engine.send_late_fee_notices(&notifier, now).await.expect("notices");
        assert_eq!(first.notices_sent, 1);
        assert_eq!(notifier.subjects(), vec!["Late Fee Notice - Maple Court 4B".to_string()]);

        let second = engine.send_late_fee_notices(&notifier, now).await.expect("notices");
        assert_eq!(second.notices_sent, 0);
        assert_eq!(second.already_notified, 1);

        let sent = ledger
            .list_reminders(
                fixture.business,
                &ReminderFilter {
                    reminder_type: Some(ReminderType::LateFeeNotice),
                    statuses: vec![ReminderStatus::Sent],
                    ..ReminderFilter::default()
                },
            )
            .await
            .expect("reminders");
        assert_eq!(sent.len(), 1);
    }

    #[tokio::test]
    async fn summary_groups_by_month_and_reason() {
        let ledger = MemoryLedger::new();
        let today = date(2026, 6, 15);
        let fixture = seed_lease(&ledger, dec!(900), 1, date(2026, 1, 1)).await;
        let april = seed_pending(&ledger, &fixture, dec!(900), date(2026, 4, 1)).await;
        let may = seed_pending(&ledger, &fixture, dec!(900), date(2026, 5, 1)).await;
        seed_fee(&ledger, &fixture, &april, dec!(50), LateFeeStatus::Applied, date(2026, 4, 10)).await;
        let waived = seed_fee(&ledger, &fixture, &may, dec!(40), LateFeeStatus::Applied, date(2026, 5, 10)).await;
        ledger
            .waive_late_fee(fixture.business, waived.id, "Bank outage (Waived by: Maria)".to_string())
            .await
            .expect("waived");
        let policy = FinancePolicy::default();

        let summary = LateFeeEngine::new(&ledger, fixture.business, &policy)
            .late_fee_summary(3, today)
            .await
            .expect("summary");
        assert_eq!(summary.total_late_fees, 2);
        assert_eq!(summary.total_amount, dec!(90));
        assert_eq!(summary.average_fee_amount, dec!(45.00));
        assert_eq!(summary.waiver_reasons.get("Bank outage"), Some(&1));
        assert_eq!(summary.top_properties[0].fee_count, 2);
        let april_bucket = summary
            .by_month
            .iter()
            .find(|bucket| bucket.month == "2026-04")
            .expect("april bucket");
        assert_eq!(april_bucket.applied, 1);
    }
}
