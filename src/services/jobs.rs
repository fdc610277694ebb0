//! In-process job queue for deferred finance operations.
//!
//! Jobs are executed one at a time by a single worker task, so two queued
//! runs never interleave. Status records live in a bounded cache and expire
//! on their own.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    repository::LedgerStore,
    services::{
        calendar, late_fees::LateFeeEngine, notifications::Notifier, overdue::OverdueAssessor,
        policy::FinancePolicy, reminders::ReminderScheduler, reports::ReportAggregator,
    },
    tenancy::BusinessId,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum FinanceJob {
    ApplyLateFees {
        #[serde(default)]
        lease_id: Option<Uuid>,
        #[serde(default)]
        force_apply: bool,
    },
    ScheduleReminders {
        #[serde(default)]
        lease_id: Option<Uuid>,
    },
    SendDueReminders,
    SendLateFeeNotices,
    DetectOverdue,
    MonthlySummary {
        #[serde(default)]
        year: Option<i32>,
        #[serde(default)]
        month: Option<u32>,
    },
    OverdueReport,
}

impl FinanceJob {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ApplyLateFees { .. } => "apply_late_fees",
            Self::ScheduleReminders { .. } => "schedule_reminders",
            Self::SendDueReminders => "send_due_reminders",
            Self::SendLateFeeNotices => "send_late_fee_notices",
            Self::DetectOverdue => "detect_overdue",
            Self::MonthlySummary { .. } => "monthly_summary",
            Self::OverdueReport => "overdue_report",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job_id: Uuid,
    pub business_id: BusinessId,
    pub job: FinanceJob,
    pub state: JobState,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// Everything a job needs to run outside a request.
#[derive(Clone)]
pub struct JobContext {
    pub ledger: Arc<dyn LedgerStore>,
    pub notifier: Arc<dyn Notifier>,
    pub policy: Arc<FinancePolicy>,
    pub timezone: Tz,
}

struct QueuedJob {
    job_id: Uuid,
    business: BusinessId,
    job: FinanceJob,
}

#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<QueuedJob>,
    statuses: Cache<Uuid, JobStatus>,
}

impl JobQueue {
    /// Spawns the worker; must be called inside a tokio runtime.
    pub fn start(context: JobContext, capacity: usize, max_statuses: u64) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let statuses = Cache::builder()
            .max_capacity(max_statuses.max(1))
            .time_to_idle(std::time::Duration::from_secs(24 * 60 * 60))
            .build();
        tokio::spawn(run_worker(context, receiver, statuses.clone()));
        Self { sender, statuses }
    }

    pub async fn enqueue(&self, business: BusinessId, job: FinanceJob) -> AppResult<JobStatus> {
        let status = JobStatus {
            job_id: Uuid::new_v4(),
            business_id: business,
            job: job.clone(),
            state: JobState::Queued,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        };
        self.statuses.insert(status.job_id, status.clone()).await;

        let queued = QueuedJob {
            job_id: status.job_id,
            business,
            job,
        };
        if let Err(error) = self.sender.try_send(queued) {
            self.statuses.invalidate(&status.job_id).await;
            return Err(match error {
                mpsc::error::TrySendError::Full(_) => {
                    AppError::ServiceUnavailable("Job queue is full.".to_string())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    AppError::ServiceUnavailable("Job worker is not running.".to_string())
                }
            });
        }

        info!(
            business_id = %business,
            job_id = %status.job_id,
            job = status.job.name(),
            "Finance job queued"
        );
        Ok(status)
    }

    /// Jobs of other businesses read as not found.
    pub async fn status(&self, business: BusinessId, job_id: Uuid) -> AppResult<JobStatus> {
        self.statuses
            .get(&job_id)
            .await
            .filter(|status| status.business_id == business)
            .ok_or_else(|| AppError::NotFound("Job not found.".to_string()))
    }
}

async fn run_worker(
    context: JobContext,
    mut receiver: mpsc::Receiver<QueuedJob>,
    statuses: Cache<Uuid, JobStatus>,
) {
    info!("Finance job worker started");
    while let Some(queued) = receiver.recv().await {
        let Some(mut status) = statuses.get(&queued.job_id).await else {
            continue;
        };
        status.state = JobState::Running;
        status.started_at = Some(Utc::now());
        statuses.insert(queued.job_id, status.clone()).await;

        let outcome = execute(&context, queued.business, &queued.job, Utc::now()).await;
        status.finished_at = Some(Utc::now());
        match outcome {
            Ok(result) => {
                status.state = JobState::Succeeded;
                status.result = Some(result);
                info!(
                    business_id = %queued.business,
                    job_id = %queued.job_id,
                    job = queued.job.name(),
                    "Finance job succeeded"
                );
            }
            Err(error) => {
                status.state = JobState::Failed;
                status.error = Some(error.to_string());
                warn!(
                    business_id = %queued.business,
                    job_id = %queued.job_id,
                    job = queued.job.name(),
                    error = %error,
                    "Finance job failed"
                );
            }
        }
        statuses.insert(queued.job_id, status).await;
    }
    info!("Finance job worker stopped");
}

fn to_value<T: Serialize>(value: &T) -> AppResult<Value> {
    serde_json::to_value(value)
        .map_err(|error| AppError::Internal(format!("Could not serialize job result: {error}")))
}

/// Runs one job to completion against the ledger.
pub async fn execute(
    context: &JobContext,
    business: BusinessId,
    job: &FinanceJob,
    now: DateTime<Utc>,
) -> AppResult<Value> {
    let ledger = context.ledger.as_ref();
    let notifier = context.notifier.as_ref();
    let policy = context.policy.as_ref();
    let timezone = context.timezone;
    let today = calendar::local_date(now, timezone);

    match job {
        FinanceJob::ApplyLateFees {
            lease_id,
            force_apply,
        } => to_value(
            &LateFeeEngine::new(ledger, business, policy)
                .in_timezone(timezone)
                .apply_late_fees(*lease_id, *force_apply, today)
                .await?,
        ),
        FinanceJob::ScheduleReminders { lease_id } => to_value(
            &ReminderScheduler::new(ledger, business, &policy.reminders)
                .in_timezone(timezone)
                .schedule_payment_reminders(*lease_id, now)
                .await?,
        ),
        FinanceJob::SendDueReminders => to_value(
            &ReminderScheduler::new(ledger, business, &policy.reminders)
                .in_timezone(timezone)
                .send_due_reminders(notifier, now)
                .await?,
        ),
        FinanceJob::SendLateFeeNotices => to_value(
            &LateFeeEngine::new(ledger, business, policy)
                .in_timezone(timezone)
                .send_late_fee_notices(notifier, now)
                .await?,
        ),
        FinanceJob::DetectOverdue => to_value(
            &OverdueAssessor::new(ledger, business, &policy.risk)
                .in_timezone(timezone)
                .detect_overdue_payments(now)
                .await?,
        ),
        FinanceJob::MonthlySummary { year, month } => to_value(
            &ReportAggregator::new(ledger, business, &policy.risk)
                .in_timezone(timezone)
                .generated_by("job_queue")
                .generate_monthly_summary(*year, *month, now)
                .await?,
        ),
        FinanceJob::OverdueReport => to_value(
            &ReportAggregator::new(ledger, business, &policy.risk)
                .in_timezone(timezone)
                .generated_by("job_queue")
                .generate_overdue_report(now)
                .await?,
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use chrono_tz::Tz;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use uuid::Uuid;

    use super::{FinanceJob, JobContext, JobQueue, JobState, JobStatus};
    use crate::{
        error::AppError,
        repository::MemoryLedger,
        services::{
            policy::FinancePolicy,
            testing::{date, seed_lease, seed_pending, RecordingNotifier},
        },
        tenancy::BusinessId,
    };

    async fn wait_for(queue: &JobQueue, business: BusinessId, job_id: Uuid) -> JobStatus {
        for _ in 0..200 {
            let status = queue.status(business, job_id).await.expect("status");
            if matches!(status.state, JobState::Succeeded | JobState::Failed) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} did not finish");
    }

    fn context(ledger: Arc<MemoryLedger>) -> JobContext {
        JobContext {
            ledger,
            notifier: Arc::new(RecordingNotifier::default()),
            policy: Arc::new(FinancePolicy::default()),
            timezone: Tz::UTC,
        }
    }

    #[test]
    fn jobs_deserialize_from_tagged_json() {
        let job: FinanceJob =
            serde_json::from_value(json!({"job": "apply_late_fees", "force_apply": true}))
                .expect("job");
        assert_eq!(
            job,
            FinanceJob::ApplyLateFees {
                lease_id: None,
                force_apply: true
            }
        );
        let job: FinanceJob =
            serde_json::from_value(json!({"job": "send_due_reminders"})).expect("job");
        assert_eq!(job.name(), "send_due_reminders");
    }

    #[tokio::test]
    async fn queued_job_runs_and_reports_result() {
        let ledger = Arc::new(MemoryLedger::new());
        let fixture = seed_lease(&ledger, dec!(1000), 1, date(2020, 1, 1)).await;
        seed_pending(&ledger, &fixture, dec!(1000), date(2021, 1, 1)).await;
        let queue = JobQueue::start(context(ledger.clone()), 4, 16);

        let queued = queue
            .enqueue(fixture.business, FinanceJob::DetectOverdue)
            .await
            .expect("queued");
        assert_eq!(queued.state, JobState::Queued);

        let finished = wait_for(&queue, fixture.business, queued.job_id).await;
        assert_eq!(finished.state, JobState::Succeeded);
        let result = finished.result.expect("result");
        assert_eq!(result["total_overdue_payments"], json!(1));
        assert!(finished.finished_at.is_some());
    }

    #[tokio::test]
    async fn failing_job_records_error() {
        let ledger = Arc::new(MemoryLedger::new());
        let fixture = seed_lease(&ledger, dec!(1000), 1, date(2026, 1, 1)).await;
        let queue = JobQueue::start(context(ledger.clone()), 4, 16);

        let queued = queue
            .enqueue(
                fixture.business,
                FinanceJob::MonthlySummary {
                    year: Some(2026),
                    month: Some(14),
                },
            )
            .await
            .expect("queued");
        let finished = wait_for(&queue, fixture.business, queued.job_id).await;
        assert_eq!(finished.state, JobState::Failed);
        assert!(finished.error.expect("error").contains("Invalid report period"));
    }

    #[tokio::test]
    async fn job_status_is_scoped_to_business() {
        let ledger = Arc::new(MemoryLedger::new());
        let fixture = seed_lease(&ledger, dec!(1000), 1, date(2026, 1, 1)).await;
        let other = ledger.add_business("Other Rentals").await;
        let queue = JobQueue::start(context(ledger.clone()), 4, 16);

        let queued = queue
            .enqueue(fixture.business, FinanceJob::SendDueReminders)
            .await
            .expect("queued");
        assert!(matches!(
            queue.status(other, queued.job_id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            queue.status(fixture.business, Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
