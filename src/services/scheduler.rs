use std::time::Duration;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use tokio::time::sleep;

use crate::{services::jobs::FinanceJob, state::AppState};

/// Background loop feeding the job queue.
///
/// Due reminders are dispatched every few minutes; late fees, reminder
/// scheduling and late-fee notices are queued once per local calendar day
/// for every business.
pub async fn run_finance_scheduler(state: AppState) {
    tracing::info!("Finance scheduler started");

    let dispatch_interval =
        Duration::from_secs(state.config.reminder_dispatch_interval_minutes.max(1) * 60);
    let mut last_dispatch = tokio::time::Instant::now();
    let mut last_daily_run: Option<NaiveDate> = None;

    loop {
        sleep(Duration::from_secs(15)).await;

        let now_instant = tokio::time::Instant::now();
        let local_now = Utc::now().with_timezone(&state.config.finance_timezone);

        if now_instant.duration_since(last_dispatch) >= dispatch_interval {
            last_dispatch = now_instant;
            enqueue_for_all_businesses(&state, &[FinanceJob::SendDueReminders]).await;
        }

        if !daily_run_due(
            last_daily_run,
            local_now,
            state.config.finance_scheduler_daily_hour,
        ) {
            continue;
        }
        let today = local_now.date_naive();
        last_daily_run = Some(today);
        tracing::info!(%today, "Scheduler: queueing daily finance jobs");
        enqueue_for_all_businesses(&state, &daily_jobs()).await;
    }
}

fn daily_jobs() -> Vec<FinanceJob> {
    vec![
        FinanceJob::ApplyLateFees {
            lease_id: None,
            force_apply: false,
        },
        FinanceJob::ScheduleReminders { lease_id: None },
        FinanceJob::SendLateFeeNotices,
    ]
}

/// True once per local day, at or after the configured hour.
fn daily_run_due(last_run: Option<NaiveDate>, local_now: DateTime<Tz>, daily_hour: u32) -> bool {
    last_run != Some(local_now.date_naive()) && local_now.hour() >= daily_hour
}

async fn enqueue_for_all_businesses(state: &AppState, jobs: &[FinanceJob]) {
    let businesses = match state.ledger.list_business_ids().await {
        Ok(businesses) => businesses,
        Err(error) => {
            tracing::warn!(error = %error, "Scheduler: could not list businesses");
            return;
        }
    };

    let mut queued = 0u32;
    for business in businesses {
        for job in jobs {
            match state.jobs.enqueue(business, job.clone()).await {
                Ok(_) => queued += 1,
                Err(error) => tracing::warn!(
                    business_id = %business,
                    job = job.name(),
                    error = %error,
                    "Scheduler: could not queue job"
                ),
            }
        }
    }
    if queued > 0 {
        tracing::info!(queued, "Scheduler: finance jobs queued");
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::Tz;

    use super::{daily_jobs, daily_run_due};
    use crate::services::testing::date;

    #[test]
    fn daily_jobs_run_once_after_the_hour() {
        let tz = Tz::America__Asuncion;
        let early = tz.with_ymd_and_hms(2026, 5, 4, 5, 59, 0).single().expect("time");
        let on_time = tz.with_ymd_and_hms(2026, 5, 4, 6, 0, 0).single().expect("time");

        assert!(!daily_run_due(None, early, 6));
        assert!(daily_run_due(None, on_time, 6));
        assert!(daily_run_due(Some(date(2026, 5, 3)), on_time, 6));
        assert!(!daily_run_due(Some(date(2026, 5, 4)), on_time, 6));
    }

    #[test]
    fn daily_jobs_never_force_fees() {
        assert!(daily_jobs().iter().all(|job| !matches!(
            job,
            crate::services::jobs::FinanceJob::ApplyLateFees {
                force_apply: true,
                ..
            }
        )));
    }
}
