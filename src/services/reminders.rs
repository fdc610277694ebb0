use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    repository::{
        LateFee, Lease, LeaseFilter, LeaseStatus, LedgerStore, NewReminder, Payment,
        PaymentFilter, PaymentReminder, PaymentStatus, ReminderFilter, ReminderOutcome,
        ReminderStatus, ReminderType, Tenant,
    },
    services::{
        balance::{round1, BalanceCalculator},
        calendar,
        notifications::Notifier,
        policy::ReminderPolicy,
        property_titles,
    },
    tenancy::BusinessId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Friendly,
    Standard,
    Urgent,
}

pub fn tone_for(reminder_type: ReminderType, reliability: f64, policy: &ReminderPolicy) -> Tone {
    match reminder_type {
        ReminderType::Upcoming if reliability >= policy.friendly_reliability => Tone::Friendly,
        ReminderType::Upcoming => Tone::Standard,
        ReminderType::Overdue | ReminderType::LateFeeNotice => Tone::Urgent,
    }
}

fn long_date(date: NaiveDate) -> String {
    date.format("%B %d, %Y").to_string()
}

fn money(amount: Decimal) -> String {
    format!("${}", amount.round_dp(2))
}

/// Subject and body of a rent reminder.
pub fn compose(
    reminder_type: ReminderType,
    tone: Tone,
    tenant: &Tenant,
    property: &str,
    payment: &Payment,
    today: NaiveDate,
) -> (String, String) {
    let amount = money(payment.amount);
    let due = long_date(payment.due_date);
    let name = &tenant.first_name;

    match reminder_type {
        ReminderType::Upcoming => {
            let subject = format!(
                "Rent Reminder - {property} Due {}",
                payment.due_date.format("%m/%d")
            );
            let body = if tone == Tone::Friendly {
                format!(
                    "Dear {name},\n\nI hope you're doing well! This is a friendly reminder that your rent payment of {amount} for {property} is due on {due}.\n\nAs always, thank you for being such a reliable tenant. Your consistent payments are greatly appreciated.\n\nIf you have any questions or concerns, please don't hesitate to reach out.\n\nBest regards,\nProperty Management Team"
                )
            } else {
                format!(
                    "Dear {name},\n\nThis is a reminder that your rent payment of {amount} for {property} is due on {due}.\n\nPlease ensure your payment is submitted on time to avoid any late fees.\n\nIf you have any questions about your payment or need assistance, please contact us.\n\nThank you,\nProperty Management Team"
                )
            };
            (subject, body)
        }
        ReminderType::Overdue => {
            let days = (today - payment.due_date).num_days().max(0);
            (
                format!("URGENT: Overdue Rent Payment - {property}"),
                format!(
                    "Dear {name},\n\nThis is an important notice that your rent payment of {amount} for {property} was due on {due} and is now {days} days overdue.\n\nPlease submit your payment immediately to avoid additional late fees and potential further action.\n\nIf you're experiencing financial difficulties, please contact us to discuss payment options.\n\nUrgent attention required,\nProperty Management Team"
                ),
            )
        }
        ReminderType::LateFeeNotice => (
            format!("Payment Reminder - {property}"),
            format!(
                "Dear {name},\n\nThis is a payment reminder for your rent of {amount} for {property}.\n\nDue date: {due}\n\nPlease ensure timely payment.\n\nThank you,\nProperty Management Team"
            ),
        ),
    }
}

pub fn late_fee_notice(
    tenant: &Tenant,
    property: &str,
    payment: &Payment,
    fee: &LateFee,
) -> (String, String) {
    let subject = format!("Late Fee Notice - {property}");
    let body = format!(
        "Dear {},\n\nThis notice is to inform you that a late fee of {} has been applied to your account for the overdue rent payment.\n\nPayment Details:\n- Property: {property}\n- Original Amount Due: {}\n- Due Date: {}\n- Days Overdue: {}\n- Late Fee Applied: {}\n\nTotal Amount Now Due: {}\n\nPlease submit your payment immediately to avoid further action. If you have any questions or need to discuss payment arrangements, please contact us as soon as possible.\n\nProperty Management Team",
        tenant.first_name,
        money(fee.amount),
        money(payment.amount),
        long_date(payment.due_date),
        fee.days_overdue,
        money(fee.amount),
        money(payment.amount + fee.amount),
    );
    (subject, body)
}

/// Sends one reminder and records the outcome. `None` when another worker
/// already moved the reminder out of `pending`.
pub(crate) async fn deliver(
    ledger: &dyn LedgerStore,
    business: BusinessId,
    notifier: &dyn Notifier,
    reminder: &PaymentReminder,
    recipient: &str,
    now: DateTime<Utc>,
) -> AppResult<Option<PaymentReminder>> {
    let outcome = match notifier
        .send(recipient, &reminder.subject, &reminder.message)
        .await
    {
        Ok(()) => ReminderOutcome::Sent { sent_at: now },
        Err(error_message) => {
            warn!(
                reminder_id = %reminder.id,
                channel = notifier.channel(),
                error = %error_message,
                "Reminder delivery failed"
            );
            ReminderOutcome::Failed { error_message }
        }
    };
    ledger
        .record_reminder_outcome(business, reminder.id, outcome)
        .await
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledReminder {
    pub reminder_id: Uuid,
    pub days_before: i64,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaseSchedule {
    pub lease_id: Uuid,
    pub tenant_name: String,
    pub due_date: NaiveDate,
    pub payment_id: Option<Uuid>,
    pub tone: Tone,
    pub reminders: Vec<ScheduledReminder>,
    pub skipped_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleFailure {
    pub lease_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleRun {
    pub leases_processed: usize,
    pub reminders_scheduled: usize,
    pub leases: Vec<LeaseSchedule>,
    pub failures: Vec<ScheduleFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryResult {
    pub reminder_id: Uuid,
    pub payment_id: Uuid,
    pub reminder_type: ReminderType,
    pub status: ReminderStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRun {
    pub reminders_sent: usize,
    pub reminders_failed: usize,
    pub already_processed: usize,
    pub results: Vec<DeliveryResult>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub sent: usize,
    pub pending: usize,
    pub failed: usize,
}

impl StatusCounts {
    fn add(&mut self, status: ReminderStatus) {
        self.total += 1;
        match status {
            ReminderStatus::Sent => self.sent += 1,
            ReminderStatus::Pending => self.pending += 1,
            ReminderStatus::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReminderAnalytics {
    pub period_days: u32,
    pub totals: StatusCounts,
    pub by_type: BTreeMap<&'static str, StatusCounts>,
    pub payments_triggered: usize,
    pub response_rate: f64,
}

/// Rent reminder scheduling and delivery for one business.
pub struct ReminderScheduler<'a> {
    ledger: &'a dyn LedgerStore,
    business: BusinessId,
    policy: &'a ReminderPolicy,
    timezone: Tz,
}

impl<'a> ReminderScheduler<'a> {
    pub fn new(ledger: &'a dyn LedgerStore, business: BusinessId, policy: &'a ReminderPolicy) -> Self {
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

    async fn reliability(&self, tenant_id: Uuid, today: NaiveDate) -> AppResult<f64> {
        let history = BalanceCalculator::new(self.ledger, self.business)
            .payment_history(tenant_id, self.policy.history_months, today)
            .await?;
        Ok(history.reliability_score)
    }

    fn send_time(&self, day: NaiveDate) -> DateTime<Utc> {
        let time = NaiveTime::from_hms_opt(self.policy.send_hour.min(23), 0, 0)
            .unwrap_or(NaiveTime::MIN);
        calendar::local_instant(day, time, self.timezone)
    }

    /// Replaces the pending reminders of each active lease's next rent payment.
    pub async fn schedule_payment_reminders(
        &self,
        lease_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> AppResult<ScheduleRun> {
        let leases = match lease_id {
            Some(id) => vec![self.ledger.get_lease(self.business, id).await?],
            None => {
                self.ledger
                    .list_leases(self.business, &LeaseFilter::active())
                    .await?
            }
        };
        let titles = property_titles(self.ledger, self.business).await?;

        let mut run = ScheduleRun {
            leases_processed: 0,
            reminders_scheduled: 0,
            leases: Vec::new(),
            failures: Vec::new(),
        };
        for lease in &leases {
            let property = titles
                .get(&lease.property_id)
                .map(String::as_str)
                .unwrap_or("your rental");
            match self.schedule_lease(lease, property, now).await {
                Ok(schedule) => {
                    run.leases_processed += 1;
                    run.reminders_scheduled += schedule.reminders.len();
                    run.leases.push(schedule);
                }
                Err(error) => {
                    warn!(lease_id = %lease.id, error = %error, "Reminder scheduling failed for lease");
                    run.failures.push(ScheduleFailure {
                        lease_id: lease.id,
                        error: error.to_string(),
                    });
                }
            }
        }

        info!(
            business_id = %self.business,
            leases = run.leases_processed,
            scheduled = run.reminders_scheduled,
            failed = run.failures.len(),
            "Payment reminders scheduled"
        );
        Ok(run)
    }

    async fn schedule_lease(
        &self,
        lease: &Lease,
        property: &str,
        now: DateTime<Utc>,
    ) -> AppResult<LeaseSchedule> {
        let today = calendar::local_date(now, self.timezone);
        let tenant = self.ledger.get_tenant(self.business, lease.tenant_id).await?;
        let due_date = calendar::next_due_date(today, lease.rent_due_day);
        let mut schedule = LeaseSchedule {
            lease_id: lease.id,
            tenant_name: tenant.full_name(),
            due_date,
            payment_id: None,
            tone: Tone::Standard,
            reminders: Vec::new(),
            skipped_reason: None,
        };

        if lease.status != LeaseStatus::Active {
            schedule.skipped_reason = Some(format!("Lease is {}", lease.status.as_str()));
            return Ok(schedule);
        }
        if due_date > lease.end_date {
            schedule.skipped_reason = Some("Lease ends before the next due date".to_string());
            return Ok(schedule);
        }

        let payment = self
            .ledger
            .ensure_pending_rent(self.business, lease.id, due_date, lease.monthly_rent)
            .await?;
        schedule.payment_id = Some(payment.id);
        if payment.status == PaymentStatus::Completed {
            schedule.skipped_reason = Some("Rent for this due date is already paid".to_string());
            return Ok(schedule);
        }

        let reliability = self.reliability(tenant.id, today).await?;
        schedule.tone = tone_for(ReminderType::Upcoming, reliability, self.policy);
        let (subject, message) = compose(
            ReminderType::Upcoming,
            schedule.tone,
            &tenant,
            property,
            &payment,
            today,
        );

        let mut offsets = Vec::new();
        let mut reminders = Vec::new();
        for &days_before in &self.policy.offsets_days {
            let scheduled_at = self.send_time(due_date - Duration::days(days_before));
            // Never backdate.
            if scheduled_at <= now {
                continue;
            }
            offsets.push(days_before);
            reminders.push(NewReminder {
                payment_id: payment.id,
                reminder_type: ReminderType::Upcoming,
                scheduled_at,
                subject: subject.clone(),
                message: message.clone(),
            });
        }

        let created = self
            .ledger
            .replace_pending_reminders(self.business, payment.id, reminders)
            .await?;
        schedule.reminders = created
            .into_iter()
            .zip(offsets)
            .map(|(reminder, days_before)| ScheduledReminder {
                reminder_id: reminder.id,
                days_before,
                scheduled_at: reminder.scheduled_at,
            })
            .collect();
        Ok(schedule)
    }

    /// Delivers every pending reminder scheduled at or before `now`. Failed
    /// deliveries are recorded and not retried.
    pub async fn send_due_reminders(
        &self,
        notifier: &dyn Notifier,
        now: DateTime<Utc>,
    ) -> AppResult<DeliveryRun> {
        let due = self
            .ledger
            .list_reminders(
                self.business,
                &ReminderFilter {
                    statuses: vec![ReminderStatus::Pending],
                    scheduled_until: Some(now),
                    ..ReminderFilter::default()
                },
            )
            .await?;

        let mut recipients: HashMap<Uuid, String> = HashMap::new();
        let mut run = DeliveryRun {
            reminders_sent: 0,
            reminders_failed: 0,
            already_processed: 0,
            results: Vec::new(),
        };

        for reminder in &due {
            let delivered = match self.recipient_for(reminder, &mut recipients).await {
                Ok(recipient) => {
                    deliver(self.ledger, self.business, notifier, reminder, &recipient, now).await
                }
                Err(error) => {
                    self.ledger
                        .record_reminder_outcome(
                            self.business,
                            reminder.id,
                            ReminderOutcome::Failed {
                                error_message: error.to_string(),
                            },
                        )
                        .await
                }
            };

            match delivered {
                Ok(Some(updated)) => {
                    let failed = updated.status == ReminderStatus::Failed;
                    if failed {
                        run.reminders_failed += 1;
                    } else {
                        run.reminders_sent += 1;
                    }
                    run.results.push(DeliveryResult {
                        reminder_id: updated.id,
                        payment_id: updated.payment_id,
                        reminder_type: updated.reminder_type,
                        status: updated.status,
                        error: failed.then_some(updated.error_message),
                    });
                }
                Ok(None) => run.already_processed += 1,
                Err(error) => {
                    run.reminders_failed += 1;
                    run.results.push(DeliveryResult {
                        reminder_id: reminder.id,
                        payment_id: reminder.payment_id,
                        reminder_type: reminder.reminder_type,
                        status: reminder.status,
                        error: Some(error.to_string()),
                    });
                }
            }
        }

        info!(
            business_id = %self.business,
            sent = run.reminders_sent,
            failed = run.reminders_failed,
            channel = notifier.channel(),
            "Due reminders processed"
        );
        Ok(run)
    }

    async fn recipient_for(
        &self,
        reminder: &PaymentReminder,
        cache: &mut HashMap<Uuid, String>,
    ) -> AppResult<String> {
        let payment = self.ledger.get_payment(self.business, reminder.payment_id).await?;
        if let Some(email) = cache.get(&payment.lease_id) {
            return Ok(email.clone());
        }
        let lease = self.ledger.get_lease(self.business, payment.lease_id).await?;
        let tenant = self.ledger.get_tenant(self.business, lease.tenant_id).await?;
        cache.insert(lease.id, tenant.email.clone());
        Ok(tenant.email)
    }

    pub async fn create_custom_reminder(
        &self,
        payment_id: Uuid,
        reminder_type: ReminderType,
        scheduled_at: DateTime<Utc>,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<PaymentReminder> {
        if scheduled_at < now {
            return Err(AppError::BadRequest(
                "Reminders cannot be scheduled in the past.".to_string(),
            ));
        }
        let payment = self.ledger.get_payment(self.business, payment_id).await?;
        let lease = self.ledger.get_lease(self.business, payment.lease_id).await?;
        let tenant = self.ledger.get_tenant(self.business, lease.tenant_id).await?;
        let titles = property_titles(self.ledger, self.business).await?;
        let property = titles
            .get(&lease.property_id)
            .map(String::as_str)
            .unwrap_or("your rental");

        let today = calendar::local_date(now, self.timezone);
        let reliability = self.reliability(tenant.id, today).await?;
        let tone = tone_for(reminder_type, reliability, self.policy);
        let (subject, generated) = compose(reminder_type, tone, &tenant, property, &payment, today);
        let message = message
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or(generated);

        let reminder = self
            .ledger
            .insert_reminder(
                self.business,
                NewReminder {
                    payment_id: payment.id,
                    reminder_type,
                    scheduled_at,
                    subject,
                    message,
                },
            )
            .await?;
        info!(
            business_id = %self.business,
            reminder_id = %reminder.id,
            reminder_type = reminder_type.as_str(),
            "Custom reminder created"
        );
        Ok(reminder)
    }

    pub async fn reminder_analytics(
        &self,
        days_back: u32,
        now: DateTime<Utc>,
    ) -> AppResult<ReminderAnalytics> {
        let reminders = self
            .ledger
            .list_reminders(
                self.business,
                &ReminderFilter {
                    created_since: Some(now - Duration::days(i64::from(days_back))),
                    ..ReminderFilter::default()
                },
            )
            .await?;

        let mut totals = StatusCounts::default();
        let mut by_type = ReminderType::ALL
            .iter()
            .map(|kind| (kind.as_str(), StatusCounts::default()))
            .collect::<BTreeMap<_, _>>();
        for reminder in &reminders {
            totals.add(reminder.status);
            if let Some(counts) = by_type.get_mut(reminder.reminder_type.as_str()) {
                counts.add(reminder.status);
            }
        }

        let mut lease_of_payment: HashMap<Uuid, Uuid> = HashMap::new();
        let mut payments_triggered = 0;
        for reminder in reminders.iter().filter(|r| r.status == ReminderStatus::Sent) {
            let Some(sent_at) = reminder.sent_at else {
                continue;
            };
            let lease_id = match lease_of_payment.get(&reminder.payment_id) {
                Some(id) => *id,
                None => {
                    let payment = self.ledger.get_payment(self.business, reminder.payment_id).await?;
                    lease_of_payment.insert(payment.id, payment.lease_id);
                    payment.lease_id
                }
            };
            let paid_after = self
                .ledger
                .list_payments(
                    self.business,
                    &PaymentFilter {
                        lease_id: Some(lease_id),
                        statuses: vec![PaymentStatus::Completed],
                        paid_from: Some(calendar::local_date(sent_at, self.timezone)),
                        ..PaymentFilter::default()
                    },
                )
                .await?;
            if !paid_after.is_empty() {
                payments_triggered += 1;
            }
        }

        let response_rate = if totals.sent == 0 {
            0.0
        } else {
            round1(payments_triggered as f64 / totals.sent as f64 * 100.0)
        };

        Ok(ReminderAnalytics {
            period_days: days_back,
            totals,
            by_type,
            payments_triggered,
            response_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rust_decimal_macros::dec;

    use super::{tone_for, ReminderScheduler, Tone};
    use crate::{
        error::AppError,
        repository::{
            LedgerStore, MemoryLedger, PaymentFilter, PaymentStatus, ReminderFilter,
            ReminderStatus, ReminderType,
        },
        services::{
            policy::ReminderPolicy,
            testing::{at, date, seed_history, seed_lease, seed_paid, seed_pending, RecordingNotifier},
        },
    };

    #[tokio::test]
    async fn rescheduling_never_backdates_and_replaces_pending() {
        let ledger = MemoryLedger::new();
        let policy = ReminderPolicy::default();
        let fixture = seed_lease(&ledger, dec!(1100), 1, date(2026, 1, 1)).await;
        let scheduler = ReminderScheduler::new(&ledger, fixture.business, &policy);
        let now = at(2026, 3, 28, 12);

        let first = scheduler
            .schedule_payment_reminders(None, now)
            .await
            .expect("scheduled");
        assert_eq!(first.reminders_scheduled, 2);
        let schedule = &first.leases[0];
        assert_eq!(schedule.due_date, date(2026, 4, 1));
        assert!(schedule.reminders.iter().all(|r| r.scheduled_at > now));
        assert_eq!(
            schedule.reminders.iter().map(|r| r.days_before).collect::<Vec<_>>(),
            vec![3, 1]
        );

        let later = at(2026, 3, 30, 6);
        let second = scheduler
            .schedule_payment_reminders(Some(fixture.lease.id), later)
            .await
            .expect("rescheduled");
        assert_eq!(second.reminders_scheduled, 1);
        assert_eq!(second.leases[0].payment_id, schedule.payment_id);

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
        assert_eq!(pending.len(), 1);
        assert!(pending.iter().all(|r| r.scheduled_at > later));

        let rent_rows = ledger
            .list_payments(
                fixture.business,
                &PaymentFilter {
                    due_from: Some(date(2026, 4, 1)),
                    due_to: Some(date(2026, 4, 1)),
                    ..PaymentFilter::default()
                },
            )
            .await
            .expect("payments");
        assert_eq!(rent_rows.len(), 1);
        assert_eq!(rent_rows[0].status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn paid_rent_is_not_reminded() {
        let ledger = MemoryLedger::new();
        let policy = ReminderPolicy::default();
        let fixture = seed_lease(&ledger, dec!(1100), 1, date(2026, 1, 1)).await;
        seed_paid(&ledger, &fixture, dec!(1100), date(2026, 4, 1), -5).await;

        let run = ReminderScheduler::new(&ledger, fixture.business, &policy)
            .schedule_payment_reminders(None, at(2026, 3, 20, 8))
            .await
            .expect("scheduled");
        assert_eq!(run.reminders_scheduled, 0);
        assert!(run.leases[0].skipped_reason.is_some());
    }

    #[tokio::test]
    async fn delivery_marks_sent_and_failed() {
        let ledger = MemoryLedger::new();
        let policy = ReminderPolicy::default();
        let fixture = seed_lease(&ledger, dec!(1100), 1, date(2026, 1, 1)).await;
        let scheduler = ReminderScheduler::new(&ledger, fixture.business, &policy);
        scheduler
            .schedule_payment_reminders(None, at(2026, 3, 20, 8))
            .await
            .expect("scheduled");

        let ok = RecordingNotifier::default();
        let run = scheduler
            .send_due_reminders(&ok, at(2026, 3, 25, 1))
            .await
            .expect("sent");
        assert_eq!(run.reminders_sent, 1);
        assert_eq!(ok.subjects(), vec!["Rent Reminder - Maple Court 4B Due 04/01".to_string()]);

        let failing = RecordingNotifier::rejecting("ana@example.com");
        let run = scheduler
            .send_due_reminders(&failing, at(2026, 3, 31, 1))
            .await
            .expect("attempted");
        assert_eq!(run.reminders_failed, 2);
        assert!(run.results.iter().all(|r| r.status == ReminderStatus::Failed));

        let failed = ledger
            .list_reminders(
                fixture.business,
                &ReminderFilter {
                    statuses: vec![ReminderStatus::Failed],
                    ..ReminderFilter::default()
                },
            )
            .await
            .expect("reminders");
        assert_eq!(failed.len(), 2);
        assert!(failed[0].error_message.contains("unavailable"));
        assert!(failed.iter().all(|r| r.sent_at.is_none()));

        // Failures are final; nothing is retried.
        let retry = scheduler
            .send_due_reminders(&ok, at(2026, 4, 2, 1))
            .await
            .expect("idle");
        assert_eq!(retry.reminders_sent + retry.reminders_failed, 0);
    }

    #[tokio::test]
    async fn custom_reminders_cannot_be_backdated() {
        let ledger = MemoryLedger::new();
        let policy = ReminderPolicy::default();
        let fixture = seed_lease(&ledger, dec!(1100), 1, date(2026, 1, 1)).await;
        let payment = seed_pending(&ledger, &fixture, dec!(1100), date(2026, 3, 1)).await;
        let scheduler = ReminderScheduler::new(&ledger, fixture.business, &policy);
        let now = at(2026, 3, 10, 9);

        let past = scheduler
            .create_custom_reminder(payment.id, ReminderType::Overdue, now - Duration::hours(1), None, now)
            .await;
        assert!(matches!(past, Err(AppError::BadRequest(_))));

        let reminder = scheduler
            .create_custom_reminder(payment.id, ReminderType::Overdue, now + Duration::hours(2), None, now)
            .await
            .expect("created");
        assert_eq!(reminder.subject, "URGENT: Overdue Rent Payment - Maple Court 4B");
        assert!(reminder.message.contains("9 days overdue"));
    }

    #[tokio::test]
    async fn analytics_counts_payments_after_reminders() {
        let ledger = MemoryLedger::new();
        let policy = ReminderPolicy::default();
        let fixture = seed_lease(&ledger, dec!(1100), 1, date(2026, 1, 1)).await;
        let scheduler = ReminderScheduler::new(&ledger, fixture.business, &policy);
        scheduler
            .schedule_payment_reminders(None, at(2026, 3, 20, 8))
            .await
            .expect("scheduled");
        scheduler
            .send_due_reminders(&RecordingNotifier::default(), at(2026, 3, 29, 1))
            .await
            .expect("sent");
        seed_paid(&ledger, &fixture, dec!(1100), date(2026, 4, 1), 0).await;

        let analytics = scheduler
            .reminder_analytics(30, at(2026, 4, 2, 9))
            .await
            .expect("analytics");
        assert_eq!(analytics.totals.total, 3);
        assert_eq!(analytics.totals.sent, 2);
        assert_eq!(analytics.totals.pending, 1);
        assert_eq!(analytics.by_type["upcoming"].total, 3);
        assert_eq!(analytics.by_type["overdue"].total, 0);
        assert_eq!(analytics.payments_triggered, 2);
        assert_eq!(analytics.response_rate, 100.0);
    }

    #[tokio::test]
    async fn reliable_tenants_get_friendly_tone() {
        let policy = ReminderPolicy::default();
        assert_eq!(tone_for(ReminderType::Upcoming, 95.0, &policy), Tone::Friendly);
        assert_eq!(tone_for(ReminderType::Upcoming, 0.0, &policy), Tone::Standard);
        assert_eq!(tone_for(ReminderType::LateFeeNotice, 100.0, &policy), Tone::Urgent);

        let ledger = MemoryLedger::new();
        let today = date(2026, 3, 20);
        let fixture = seed_lease(&ledger, dec!(1100), 1, date(2025, 1, 1)).await;
        seed_history(&ledger, &fixture, today, 10, 0).await;
        let run = ReminderScheduler::new(&ledger, fixture.business, &policy)
            .schedule_payment_reminders(None, at(2026, 3, 20, 8))
            .await
            .expect("scheduled");
        assert_eq!(run.leases[0].tone, Tone::Friendly);
    }
}
