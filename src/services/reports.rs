use std::{
    collections::{HashMap, HashSet},
    future::Future,
};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    repository::{
        FinancialReport, LateFeeFilter, LateFeeStatus, LeaseFilter, LeaseStatus, LedgerStore,
        NewFinancialReport, Payment, PaymentFilter, PaymentStatus, PaymentType, ReportType,
    },
    services::{
        balance::{percentage, round1, BalanceCalculator, BalanceOverview},
        calendar,
        overdue::{EscalationPlan, OverdueAssessor, OverdueReport},
        policy::RiskPolicy,
        property_titles,
    },
    tenancy::BusinessId,
};

const TOP_PROPERTIES: usize = 10;
const UPCOMING_DAYS: i64 = 30;
const UPCOMING_LIMIT: usize = 20;
const COLLECTION_WINDOW_DAYS: i64 = 90;
const OVERDUE_ALERT_AMOUNT: Decimal = dec!(5000);

/// One independently computed part of a report. A failed section carries
/// its error and leaves the rest of the report intact.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Section<T> {
    Ready(T),
    Failed { error: String },
}

impl<T> Section<T> {
    pub async fn capture<F>(name: &'static str, work: F) -> Self
    where
        F: Future<Output = AppResult<T>>,
    {
        match work.await {
            Ok(value) => Self::Ready(value),
            Err(error) => {
                warn!(section = name, error = %error, "Report section failed");
                Self::Failed {
                    error: error.to_string(),
                }
            }
        }
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueSummary {
    pub total_revenue: Decimal,
    pub rent_revenue: Decimal,
    pub late_fee_revenue: Decimal,
    pub other_revenue: Decimal,
    pub payment_count: usize,
    pub average_payment: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentAnalysis {
    pub total_due: Decimal,
    pub total_collected: Decimal,
    /// Completed over all due in the period, in percent within [0, 100].
    pub collection_rate: f64,
    pub on_time_payments: usize,
    pub late_payments: usize,
    pub pending_payments: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverdueAnalysis {
    pub as_of: NaiveDate,
    pub overdue_count: usize,
    pub overdue_amount: Decimal,
    pub average_days_overdue: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantSummary {
    pub total_active_tenants: usize,
    pub tenants_with_payments: usize,
    pub tenants_with_overdue: usize,
    pub average_reliability_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertyRevenue {
    pub property_id: Uuid,
    pub property_title: String,
    pub total_revenue: Decimal,
    pub payment_count: usize,
    pub overdue_count: usize,
    pub overdue_amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertyPerformance {
    pub total_properties: usize,
    pub properties: Vec<PropertyRevenue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LateFeeTotals {
    pub total_late_fees: Decimal,
    pub late_fee_count: usize,
    pub applied_fees: usize,
    pub waived_fees: usize,
}

/// Headline numbers; a value is absent when its source section failed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KeyMetrics {
    pub total_revenue: Option<Decimal>,
    pub collection_rate: Option<f64>,
    pub overdue_amount: Option<Decimal>,
    pub late_fee_revenue: Option<Decimal>,
    pub tenant_reliability: Option<f64>,
    pub payment_efficiency: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthBreakdown {
    pub month: String,
    pub revenue: Decimal,
    pub total_due: Decimal,
    pub total_collected: Decimal,
    pub collection_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodReport {
    pub period: String,
    pub revenue_summary: Section<RevenueSummary>,
    pub payment_analysis: Section<PaymentAnalysis>,
    pub overdue_analysis: Section<OverdueAnalysis>,
    pub tenant_summary: Section<TenantSummary>,
    pub property_performance: Section<PropertyPerformance>,
    pub late_fees: Section<LateFeeTotals>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_breakdown: Option<Section<Vec<MonthBreakdown>>>,
    pub key_metrics: KeyMetrics,
    pub recommendations: Vec<&'static str>,
}

impl PeriodReport {
    fn is_partial(&self) -> bool {
        self.revenue_summary.is_failed()
            || self.payment_analysis.is_failed()
            || self.overdue_analysis.is_failed()
            || self.tenant_summary.is_failed()
            || self.property_performance.is_failed()
            || self.late_fees.is_failed()
            || self.monthly_breakdown.as_ref().is_some_and(Section::is_failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionMetrics {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub total_due: Decimal,
    pub total_collected: Decimal,
    pub collection_rate: f64,
    /// Mean days between due date and payment for collected rows, early payments as zero.
    pub average_days_to_collect: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpcomingPayment {
    pub payment_id: Uuid,
    pub tenant_name: String,
    pub property: String,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub days_until_due: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusReport {
    pub report_date: NaiveDate,
    pub overall_status: Section<BalanceOverview>,
    pub overdue_summary: Section<OverdueReport>,
    pub collection_metrics: Section<CollectionMetrics>,
    pub upcoming_payments: Section<Vec<UpcomingPayment>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AgingBucket {
    pub label: &'static str,
    pub count: usize,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgingAnalysis {
    pub buckets: Vec<AgingBucket>,
    pub oldest_days_overdue: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverdueReportData {
    pub report_date: NaiveDate,
    pub overdue_summary: Section<OverdueReport>,
    pub aging_analysis: Section<AgingAnalysis>,
    pub escalation_plan: Section<EscalationPlan>,
}

/// A persisted report: storage metadata plus the report body.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedReport<T> {
    pub report_id: Uuid,
    pub report_type: ReportType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub generated_by: String,
    pub partial: bool,
    #[serde(flatten)]
    pub data: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportHeadline {
    pub total_revenue: Option<Value>,
    pub collection_rate: Option<Value>,
    pub overdue_amount: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportListing {
    pub id: Uuid,
    pub report_type: ReportType,
    pub period: String,
    pub generated_at: DateTime<Utc>,
    pub generated_by: String,
    pub partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ReportHeadline>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportHistory {
    pub total_reports: i64,
    pub filter_type: Option<ReportType>,
    pub reports: Vec<ReportListing>,
}

impl ReportListing {
    fn from_report(report: &FinancialReport) -> Self {
        let summary = report
            .report_data
            .get("key_metrics")
            .and_then(Value::as_object)
            .map(|metrics| ReportHeadline {
                total_revenue: metrics.get("total_revenue").cloned(),
                collection_rate: metrics.get("collection_rate").cloned(),
                overdue_amount: metrics.get("overdue_amount").cloned(),
            });
        Self {
            id: report.id,
            report_type: report.report_type,
            period: format!("{} to {}", report.start_date, report.end_date),
            generated_at: report.generated_at,
            generated_by: report.generated_by.clone(),
            partial: report
                .report_data
                .get("partial")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            summary,
        }
    }
}

pub fn recommendations(
    payments: Option<&PaymentAnalysis>,
    overdue: Option<&OverdueAnalysis>,
    tenants: Option<&TenantSummary>,
) -> Vec<&'static str> {
    let mut recommendations = Vec::new();
    if let Some(payments) = payments {
        if payments.collection_rate < 90.0 {
            recommendations.push("Improve collection rate through enhanced reminder system");
        }
    }
    if overdue.is_some_and(|o| o.overdue_amount > OVERDUE_ALERT_AMOUNT) {
        recommendations.push("Focus on reducing overdue payments through proactive management");
    }
    if let Some(payments) = payments {
        let settled = payments.on_time_payments + payments.late_payments;
        if settled > 0 && payments.late_payments as f64 / settled as f64 > 0.15 {
            recommendations.push("Consider implementing early payment incentives");
        }
    }
    if tenants.is_some_and(|t| t.average_reliability_score < 85.0) {
        recommendations.push("Implement tenant education program for payment processes");
    }
    recommendations
}

fn payment_efficiency(analysis: &PaymentAnalysis) -> f64 {
    let settled = analysis.on_time_payments + analysis.late_payments;
    if settled == 0 {
        return 0.0;
    }
    round1(analysis.on_time_payments as f64 / settled as f64 * 100.0)
}

fn sum_amounts<'p>(payments: impl Iterator<Item = &'p Payment>) -> Decimal {
    payments.map(|p| p.amount).sum()
}

fn is_collected(payment: &Payment) -> bool {
    payment.status == PaymentStatus::Completed
}

/// Period summaries and status snapshots, each persisted on generation.
pub struct ReportAggregator<'a> {
    ledger: &'a dyn LedgerStore,
    business: BusinessId,
    risk: &'a RiskPolicy,
    generated_by: String,
    timezone: Tz,
}

impl<'a> ReportAggregator<'a> {
    pub fn new(ledger: &'a dyn LedgerStore, business: BusinessId, risk: &'a RiskPolicy) -> Self {
        Self {
            ledger,
            business,
            risk,
            generated_by: "system".to_string(),
            timezone: Tz::UTC,
        }
    }

    /// Finance time zone used to turn `now` into a calendar day. Defaults to UTC.
    pub fn in_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn generated_by(mut self, author: impl Into<String>) -> Self {
        let author = author.into();
        if !author.trim().is_empty() {
            self.generated_by = author.trim().to_string();
        }
        self
    }

    pub async fn generate_monthly_summary(
        &self,
        year: Option<i32>,
        month: Option<u32>,
        now: DateTime<Utc>,
    ) -> AppResult<GeneratedReport<PeriodReport>> {
        let today = calendar::local_date(now, self.timezone);
        let year = year.unwrap_or(today.year());
        let month = month.unwrap_or(today.month());
        let (start, end) = calendar::month_bounds(year, month).ok_or_else(|| {
            AppError::BadRequest(format!("Invalid report period {year}-{month:02}."))
        })?;

        let data = self
            .period_report(format!("{year}-{month:02}"), start, end, 1, today, false)
            .await;
        self.persist(ReportType::MonthlySummary, start, end, data, now)
            .await
    }

    pub async fn generate_annual_summary(
        &self,
        year: Option<i32>,
        now: DateTime<Utc>,
    ) -> AppResult<GeneratedReport<PeriodReport>> {
        let today = calendar::local_date(now, self.timezone);
        let year = year.unwrap_or(today.year());
        let start = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| AppError::BadRequest(format!("Invalid report year {year}.")))?;
        let end = NaiveDate::from_ymd_opt(year, 12, 31)
            .ok_or_else(|| AppError::BadRequest(format!("Invalid report year {year}.")))?;

        let data = self
            .period_report(year.to_string(), start, end, 12, today, true)
            .await;
        self.persist(ReportType::AnnualSummary, start, end, data, now)
            .await
    }

    async fn period_report(
        &self,
        period: String,
        start: NaiveDate,
        end: NaiveDate,
        history_months: u32,
        today: NaiveDate,
        with_breakdown: bool,
    ) -> PeriodReport {
        let (
            revenue_summary,
            payment_analysis,
            overdue_analysis,
            tenant_summary,
            property_performance,
            late_fees,
        ) = tokio::join!(
            Section::capture("revenue_summary", self.revenue_summary(start, end)),
            Section::capture("payment_analysis", self.payment_analysis(start, end)),
            Section::capture("overdue_analysis", self.overdue_analysis(start, end, today)),
            Section::capture("tenant_summary", self.tenant_summary(history_months, today)),
            Section::capture(
                "property_performance",
                self.property_performance(start, end, today)
            ),
            Section::capture("late_fees", self.late_fee_totals(start, end)),
        );
        let monthly_breakdown = if with_breakdown {
            Some(Section::capture("monthly_breakdown", self.monthly_breakdown(start, end)).await)
        } else {
            None
        };

        let key_metrics = KeyMetrics {
            total_revenue: revenue_summary.ready().map(|r| r.total_revenue),
            collection_rate: payment_analysis.ready().map(|p| p.collection_rate),
            overdue_amount: overdue_analysis.ready().map(|o| o.overdue_amount),
            late_fee_revenue: revenue_summary.ready().map(|r| r.late_fee_revenue),
            tenant_reliability: tenant_summary.ready().map(|t| t.average_reliability_score),
            payment_efficiency: payment_analysis.ready().map(payment_efficiency),
        };
        let recommendations = recommendations(
            payment_analysis.ready(),
            overdue_analysis.ready(),
            tenant_summary.ready(),
        );

        PeriodReport {
            period,
            revenue_summary,
            payment_analysis,
            overdue_analysis,
            tenant_summary,
            property_performance,
            late_fees,
            monthly_breakdown,
            key_metrics,
            recommendations,
        }
    }

    async fn paid_between(&self, start: NaiveDate, end: NaiveDate) -> AppResult<Vec<Payment>> {
        self.ledger
            .list_payments(
                self.business,
                &PaymentFilter {
                    statuses: vec![PaymentStatus::Completed],
                    paid_from: Some(start),
                    paid_to: Some(end),
                    ..PaymentFilter::default()
                },
            )
            .await
    }

    async fn due_between(&self, start: NaiveDate, end: NaiveDate) -> AppResult<Vec<Payment>> {
        self.ledger
            .list_payments(
                self.business,
                &PaymentFilter {
                    due_from: Some(start),
                    due_to: Some(end),
                    ..PaymentFilter::default()
                },
            )
            .await
    }

    async fn revenue_summary(&self, start: NaiveDate, end: NaiveDate) -> AppResult<RevenueSummary> {
        let payments = self.paid_between(start, end).await?;
        let of_type = |kind: PaymentType| sum_amounts(payments.iter().filter(|p| p.payment_type == kind));

        let total_revenue = sum_amounts(payments.iter());
        let rent_revenue = of_type(PaymentType::Rent);
        let late_fee_revenue = of_type(PaymentType::LateFee);
        let average_payment = if payments.is_empty() {
            Decimal::ZERO
        } else {
            (total_revenue / Decimal::from(payments.len())).round_dp(2)
        };

        Ok(RevenueSummary {
            total_revenue,
            rent_revenue,
            late_fee_revenue,
            other_revenue: total_revenue - rent_revenue - late_fee_revenue,
            payment_count: payments.len(),
            average_payment,
        })
    }

    async fn payment_analysis(&self, start: NaiveDate, end: NaiveDate) -> AppResult<PaymentAnalysis> {
        let payments = self.due_between(start, end).await?;
        let collected = payments.iter().filter(|p| is_collected(p)).collect::<Vec<_>>();
        let total_due = sum_amounts(payments.iter());
        let total_collected = collected.iter().map(|p| p.amount).sum::<Decimal>();
        let late_payments = collected
            .iter()
            .filter(|p| p.payment_date.is_some_and(|paid| paid > p.due_date))
            .count();

        Ok(PaymentAnalysis {
            total_due,
            total_collected,
            collection_rate: percentage(total_collected, total_due),
            on_time_payments: collected.len() - late_payments,
            late_payments,
            pending_payments: payments
                .iter()
                .filter(|p| p.status == PaymentStatus::Pending)
                .count(),
        })
    }

    /// Payments due in the period and still pending at its close, or today
    /// for the running period.
    async fn overdue_analysis(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        today: NaiveDate,
    ) -> AppResult<OverdueAnalysis> {
        let as_of = (end + Duration::days(1)).min(today);
        let overdue = self
            .ledger
            .list_payments(
                self.business,
                &PaymentFilter {
                    due_from: Some(start),
                    due_to: Some(end),
                    ..PaymentFilter::overdue(as_of)
                },
            )
            .await?;
        let average_days_overdue = if overdue.is_empty() {
            0.0
        } else {
            let total_days = overdue.iter().map(|p| p.days_overdue(as_of)).sum::<i64>();
            round1(total_days as f64 / overdue.len() as f64)
        };

        Ok(OverdueAnalysis {
            as_of,
            overdue_count: overdue.len(),
            overdue_amount: sum_amounts(overdue.iter()),
            average_days_overdue,
        })
    }

    async fn tenant_summary(&self, history_months: u32, today: NaiveDate) -> AppResult<TenantSummary> {
        let active_leases = self
            .ledger
            .list_leases(self.business, &LeaseFilter::active())
            .await?;
        let tenant_ids = active_leases
            .iter()
            .map(|lease| lease.tenant_id)
            .collect::<HashSet<_>>();
        let tenants = self
            .ledger
            .list_tenants(self.business, true)
            .await?
            .into_iter()
            .filter(|tenant| tenant_ids.contains(&tenant.id))
            .collect::<Vec<_>>();

        let lease_tenants = self
            .ledger
            .list_leases(self.business, &LeaseFilter::default())
            .await?
            .into_iter()
            .map(|lease| (lease.id, lease.tenant_id))
            .collect::<HashMap<_, _>>();
        let overdue_tenants = self
            .ledger
            .list_payments(self.business, &PaymentFilter::overdue(today))
            .await?
            .iter()
            .filter_map(|p| lease_tenants.get(&p.lease_id).copied())
            .collect::<HashSet<_>>();

        let calculator = BalanceCalculator::new(self.ledger, self.business);
        let mut reliability_scores = Vec::new();
        for tenant in &tenants {
            let history = calculator
                .payment_history(tenant.id, history_months, today)
                .await?;
            if history.has_history() {
                reliability_scores.push(history.reliability_score);
            }
        }
        let average_reliability_score = if reliability_scores.is_empty() {
            0.0
        } else {
            round1(reliability_scores.iter().sum::<f64>() / reliability_scores.len() as f64)
        };

        Ok(TenantSummary {
            total_active_tenants: tenants.len(),
            tenants_with_payments: reliability_scores.len(),
            tenants_with_overdue: tenants
                .iter()
                .filter(|tenant| overdue_tenants.contains(&tenant.id))
                .count(),
            average_reliability_score,
        })
    }

    async fn property_performance(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        today: NaiveDate,
    ) -> AppResult<PropertyPerformance> {
        let leases = self
            .ledger
            .list_leases(self.business, &LeaseFilter::default())
            .await?;
        let property_of_lease = leases
            .iter()
            .map(|lease| (lease.id, lease.property_id))
            .collect::<HashMap<_, _>>();
        let active_properties = leases
            .iter()
            .filter(|lease| lease.status == LeaseStatus::Active)
            .map(|lease| lease.property_id)
            .collect::<HashSet<_>>();
        let titles = property_titles(self.ledger, self.business).await?;
        let paid = self.paid_between(start, end).await?;
        let overdue = self
            .ledger
            .list_payments(self.business, &PaymentFilter::overdue(today))
            .await?;

        let mut rows = active_properties
            .iter()
            .map(|property_id| {
                let of_property = |p: &&Payment| {
                    property_of_lease.get(&p.lease_id) == Some(property_id)
                };
                let revenue = paid.iter().filter(of_property).collect::<Vec<_>>();
                let late = overdue.iter().filter(of_property).collect::<Vec<_>>();
                PropertyRevenue {
                    property_id: *property_id,
                    property_title: titles.get(property_id).cloned().unwrap_or_default(),
                    total_revenue: revenue.iter().map(|p| p.amount).sum(),
                    payment_count: revenue.len(),
                    overdue_count: late.len(),
                    overdue_amount: late.iter().map(|p| p.amount).sum(),
                }
            })
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| {
            b.total_revenue
                .cmp(&a.total_revenue)
                .then_with(|| a.property_title.cmp(&b.property_title))
        });

        Ok(PropertyPerformance {
            total_properties: rows.len(),
            properties: rows.into_iter().take(TOP_PROPERTIES).collect(),
        })
    }

    async fn late_fee_totals(&self, start: NaiveDate, end: NaiveDate) -> AppResult<LateFeeTotals> {
        let fees = self
            .ledger
            .list_late_fees(
                self.business,
                &LateFeeFilter {
                    fee_date_from: Some(start),
                    fee_date_to: Some(end),
                    ..LateFeeFilter::default()
                },
            )
            .await?;
        let with_status = |status: LateFeeStatus| fees.iter().filter(|f| f.status == status).count();

        Ok(LateFeeTotals {
            total_late_fees: fees.iter().map(|f| f.amount).sum(),
            late_fee_count: fees.len(),
            applied_fees: with_status(LateFeeStatus::Applied),
            waived_fees: with_status(LateFeeStatus::Waived),
        })
    }

    async fn monthly_breakdown(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<MonthBreakdown>> {
        let (paid, due) = tokio::try_join!(self.paid_between(start, end), self.due_between(start, end))?;

        let mut months = Vec::new();
        let mut month = calendar::first_of_month(start);
        while month <= end {
            let month_end = calendar::last_of_month(month);
            let in_month = |date: NaiveDate| date >= month && date <= month_end;
            let revenue = sum_amounts(
                paid.iter()
                    .filter(|p| p.payment_date.is_some_and(in_month)),
            );
            let due_in_month = due.iter().filter(|p| in_month(p.due_date)).collect::<Vec<_>>();
            let total_due = due_in_month.iter().map(|p| p.amount).sum::<Decimal>();
            let total_collected = due_in_month
                .iter()
                .filter(|p| is_collected(p))
                .map(|p| p.amount)
                .sum::<Decimal>();
            months.push(MonthBreakdown {
                month: calendar::month_key(month),
                revenue,
                total_due,
                total_collected,
                collection_rate: percentage(total_collected, total_due),
            });
            month = calendar::shift_month(month, 1);
        }
        Ok(months)
    }

    pub async fn generate_payment_status_report(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<GeneratedReport<PaymentStatusReport>> {
        let today = calendar::local_date(now, self.timezone);
        let calculator = BalanceCalculator::new(self.ledger, self.business);
        let assessor =
            OverdueAssessor::new(self.ledger, self.business, self.risk).in_timezone(self.timezone);

        let (overall_status, overdue_summary, collection_metrics, upcoming_payments) = tokio::join!(
            Section::capture("overall_status", calculator.all_balances(today)),
            Section::capture("overdue_summary", assessor.detect_overdue_payments(now)),
            Section::capture("collection_metrics", self.collection_metrics(today)),
            Section::capture("upcoming_payments", self.upcoming_payments(today)),
        );
        let data = PaymentStatusReport {
            report_date: today,
            overall_status,
            overdue_summary,
            collection_metrics,
            upcoming_payments,
        };
        let partial = data.overall_status.is_failed()
            || data.overdue_summary.is_failed()
            || data.collection_metrics.is_failed()
            || data.upcoming_payments.is_failed();
        self.store(ReportType::PaymentStatus, today, today, data, partial, now)
            .await
    }

    async fn collection_metrics(&self, today: NaiveDate) -> AppResult<CollectionMetrics> {
        let window_start = today - Duration::days(COLLECTION_WINDOW_DAYS);
        let due = self.due_between(window_start, today).await?;
        let collected = due.iter().filter(|p| is_collected(p)).collect::<Vec<_>>();
        let total_due = sum_amounts(due.iter());
        let total_collected = collected.iter().map(|p| p.amount).sum::<Decimal>();
        let collection_days = collected
            .iter()
            .filter_map(|p| p.payment_date.map(|paid| (paid - p.due_date).num_days().max(0)))
            .collect::<Vec<_>>();
        let average_days_to_collect = if collection_days.is_empty() {
            0.0
        } else {
            round1(collection_days.iter().sum::<i64>() as f64 / collection_days.len() as f64)
        };

        Ok(CollectionMetrics {
            window_start,
            window_end: today,
            total_due,
            total_collected,
            collection_rate: percentage(total_collected, total_due),
            average_days_to_collect,
        })
    }

    async fn upcoming_payments(&self, today: NaiveDate) -> AppResult<Vec<UpcomingPayment>> {
        let mut payments = self
            .ledger
            .list_payments(
                self.business,
                &PaymentFilter {
                    statuses: vec![PaymentStatus::Pending],
                    due_from: Some(today),
                    due_to: Some(today + Duration::days(UPCOMING_DAYS)),
                    ..PaymentFilter::default()
                },
            )
            .await?;
        payments.sort_by_key(|p| p.due_date);
        payments.truncate(UPCOMING_LIMIT);

        let leases = self
            .ledger
            .list_leases(self.business, &LeaseFilter::default())
            .await?
            .into_iter()
            .map(|lease| (lease.id, lease))
            .collect::<HashMap<_, _>>();
        let tenants = self
            .ledger
            .list_tenants(self.business, false)
            .await?
            .into_iter()
            .map(|tenant| (tenant.id, tenant.full_name()))
            .collect::<HashMap<_, _>>();
        let titles = property_titles(self.ledger, self.business).await?;

        Ok(payments
            .into_iter()
            .map(|payment| {
                let lease = leases.get(&payment.lease_id);
                UpcomingPayment {
                    payment_id: payment.id,
                    tenant_name: lease
                        .and_then(|l| tenants.get(&l.tenant_id))
                        .cloned()
                        .unwrap_or_default(),
                    property: lease
                        .and_then(|l| titles.get(&l.property_id))
                        .cloned()
                        .unwrap_or_default(),
                    amount: payment.amount,
                    due_date: payment.due_date,
                    days_until_due: (payment.due_date - today).num_days(),
                }
            })
            .collect())
    }

    pub async fn generate_overdue_report(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<GeneratedReport<OverdueReportData>> {
        let today = calendar::local_date(now, self.timezone);
        let assessor =
            OverdueAssessor::new(self.ledger, self.business, self.risk).in_timezone(self.timezone);

        let (overdue_summary, aging_analysis, escalation_plan) = tokio::join!(
            Section::capture("overdue_summary", assessor.detect_overdue_payments(now)),
            Section::capture("aging_analysis", self.aging_analysis(today)),
            Section::capture("escalation_plan", assessor.escalation_actions(None, today)),
        );
        let partial =
            overdue_summary.is_failed() || aging_analysis.is_failed() || escalation_plan.is_failed();
        let data = OverdueReportData {
            report_date: today,
            overdue_summary,
            aging_analysis,
            escalation_plan,
        };
        self.store(ReportType::OverdueReport, today, today, data, partial, now)
            .await
    }

    async fn aging_analysis(&self, today: NaiveDate) -> AppResult<AgingAnalysis> {
        let overdue = self
            .ledger
            .list_payments(self.business, &PaymentFilter::overdue(today))
            .await?;
        let mut buckets = ["1-30", "31-60", "61-90", "90+"].map(|label| AgingBucket {
            label,
            ..AgingBucket::default()
        });
        let bounds = [30, 60, 90];

        let mut oldest_days_overdue = 0;
        for payment in &overdue {
            let days = payment.days_overdue(today);
            oldest_days_overdue = oldest_days_overdue.max(days);
            let index = bounds.iter().position(|bound| days <= *bound).unwrap_or(3);
            buckets[index].count += 1;
            buckets[index].amount += payment.amount;
        }

        Ok(AgingAnalysis {
            buckets: buckets.into(),
            oldest_days_overdue,
        })
    }

    async fn persist(
        &self,
        report_type: ReportType,
        start: NaiveDate,
        end: NaiveDate,
        data: PeriodReport,
        now: DateTime<Utc>,
    ) -> AppResult<GeneratedReport<PeriodReport>> {
        let partial = data.is_partial();
        self.store(report_type, start, end, data, partial, now).await
    }

    async fn store<T: Serialize>(
        &self,
        report_type: ReportType,
        start_date: NaiveDate,
        end_date: NaiveDate,
        data: T,
        partial: bool,
        now: DateTime<Utc>,
    ) -> AppResult<GeneratedReport<T>> {
        let mut report_data = serde_json::to_value(&data)
            .map_err(|error| AppError::Internal(format!("Could not serialize report: {error}")))?;
        if let Value::Object(map) = &mut report_data {
            map.insert("partial".to_string(), Value::Bool(partial));
        }

        let stored = self
            .ledger
            .insert_report(
                self.business,
                NewFinancialReport {
                    report_type,
                    start_date,
                    end_date,
                    report_data,
                    generated_at: now,
                    generated_by: self.generated_by.clone(),
                },
            )
            .await?;

        info!(
            business_id = %self.business,
            report_id = %stored.id,
            report_type = report_type.as_str(),
            partial,
            "Financial report generated"
        );
        Ok(GeneratedReport {
            report_id: stored.id,
            report_type,
            start_date,
            end_date,
            generated_at: stored.generated_at,
            generated_by: stored.generated_by,
            partial,
            data,
        })
    }

    pub async fn report_history(
        &self,
        report_type: Option<ReportType>,
        limit: i64,
    ) -> AppResult<ReportHistory> {
        let limit = limit.clamp(1, 100);
        let (reports, total_reports) = self
            .ledger
            .list_reports(self.business, report_type, limit, 0)
            .await?;
        Ok(ReportHistory {
            total_reports,
            filter_type: report_type,
            reports: reports.iter().map(ReportListing::from_report).collect(),
        })
    }

    pub async fn get_report(&self, report_id: Uuid) -> AppResult<FinancialReport> {
        self.ledger.get_report(self.business, report_id).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Duration};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::{recommendations, PaymentAnalysis, ReportAggregator, Section};
    use crate::{
        error::{AppError, AppResult},
        repository::{MemoryLedger, PaymentStatus, PaymentType, ReportType},
        services::{
            policy::RiskPolicy,
            testing::{at, date, payment, seed_lease, seed_paid, seed_pending},
        },
    };

    #[tokio::test]
    async fn monthly_summary_rolls_up_the_period() {
        let ledger = MemoryLedger::new();
        let fixture = seed_lease(&ledger, dec!(1000), 1, date(2026, 1, 1)).await;
        seed_paid(&ledger, &fixture, dec!(1000), date(2026, 3, 1), 0).await;
        seed_paid(&ledger, &fixture, dec!(1000), date(2026, 2, 1), 30).await;
        let mut repair = payment(&fixture, dec!(500), date(2026, 3, 15), None, PaymentStatus::Pending);
        repair.payment_type = PaymentType::Maintenance;
        ledger.put_payment(repair).await;
        seed_pending(&ledger, &fixture, dec!(1000), date(2026, 4, 1)).await;
        let policy = RiskPolicy::default();

        let report = ReportAggregator::new(&ledger, fixture.business, &policy)
            .generate_monthly_summary(Some(2026), Some(3), at(2026, 4, 10, 8))
            .await
            .expect("report");

        assert!(!report.partial);
        assert_eq!(report.data.period, "2026-03");
        let revenue = report.data.revenue_summary.ready().expect("revenue");
        assert_eq!(revenue.total_revenue, dec!(2000));
        assert_eq!(revenue.rent_revenue, dec!(2000));
        assert_eq!(revenue.payment_count, 2);

        let payments = report.data.payment_analysis.ready().expect("payments");
        assert_eq!(payments.total_due, dec!(1500));
        assert_eq!(payments.collection_rate, 66.67);
        assert_eq!(payments.pending_payments, 1);

        let overdue = report.data.overdue_analysis.ready().expect("overdue");
        assert_eq!(overdue.as_of, date(2026, 4, 1));
        assert_eq!(overdue.overdue_count, 1);
        assert_eq!(overdue.average_days_overdue, 17.0);

        let properties = report.data.property_performance.ready().expect("properties");
        assert_eq!(properties.properties[0].total_revenue, dec!(2000));
        assert_eq!(properties.properties[0].overdue_count, 2);

        assert!(report
            .data
            .recommendations
            .contains(&"Improve collection rate through enhanced reminder system"));
        assert!(report.data.monthly_breakdown.is_none());
    }

    #[tokio::test]
    async fn generated_reports_are_persisted_and_listed() {
        let ledger = MemoryLedger::new();
        let fixture = seed_lease(&ledger, dec!(1000), 1, date(2026, 1, 1)).await;
        seed_paid(&ledger, &fixture, dec!(1000), date(2026, 3, 1), 0).await;
        let policy = RiskPolicy::default();
        let aggregator = ReportAggregator::new(&ledger, fixture.business, &policy).generated_by("ops");

        let report = aggregator
            .generate_monthly_summary(Some(2026), Some(3), at(2026, 4, 10, 8))
            .await
            .expect("report");
        aggregator
            .generate_overdue_report(at(2026, 4, 10, 8))
            .await
            .expect("overdue report");

        let stored = aggregator.get_report(report.report_id).await.expect("stored");
        assert_eq!(stored.report_type, ReportType::MonthlySummary);
        assert_eq!(stored.generated_by, "ops");
        assert_eq!(stored.report_data["key_metrics"]["collection_rate"], json!(100.0));

        let monthly = aggregator
            .report_history(Some(ReportType::MonthlySummary), 10)
            .await
            .expect("history");
        assert_eq!(monthly.total_reports, 1);
        assert_eq!(monthly.reports[0].period, "2026-03-01 to 2026-03-31");
        assert!(monthly.reports[0].summary.is_some());

        let all = aggregator.report_history(None, 10).await.expect("history");
        assert_eq!(all.total_reports, 2);
    }

    #[tokio::test]
    async fn empty_period_has_zero_collection_rate() {
        let ledger = MemoryLedger::new();
        let fixture = seed_lease(&ledger, dec!(1000), 1, date(2026, 1, 1)).await;
        let policy = RiskPolicy::default();

        let report = ReportAggregator::new(&ledger, fixture.business, &policy)
            .generate_monthly_summary(Some(2025), Some(6), at(2026, 4, 10, 8))
            .await
            .expect("report");
        let payments = report.data.payment_analysis.ready().expect("payments");
        assert_eq!(payments.total_due, Decimal::ZERO);
        assert_eq!(payments.collection_rate, 0.0);
        assert_eq!(report.data.key_metrics.payment_efficiency, Some(0.0));
    }

    #[tokio::test]
    async fn collection_rate_stays_within_bounds() {
        let ledger = MemoryLedger::new();
        let fixture = seed_lease(&ledger, dec!(1000), 1, date(2026, 1, 1)).await;
        for day in [1, 8, 15] {
            seed_paid(&ledger, &fixture, dec!(333.33), date(2026, 5, day), 2).await;
        }
        seed_pending(&ledger, &fixture, dec!(0.01), date(2026, 5, 20)).await;
        let policy = RiskPolicy::default();

        let report = ReportAggregator::new(&ledger, fixture.business, &policy)
            .generate_monthly_summary(Some(2026), Some(5), at(2026, 6, 2, 8))
            .await
            .expect("report");
        let rate = report.data.payment_analysis.ready().expect("payments").collection_rate;
        assert!((0.0..=100.0).contains(&rate));
        assert!(report
            .data
            .recommendations
            .contains(&"Consider implementing early payment incentives"));
    }

    #[tokio::test]
    async fn rejects_invalid_month() {
        let ledger = MemoryLedger::new();
        let fixture = seed_lease(&ledger, dec!(1000), 1, date(2026, 1, 1)).await;
        let policy = RiskPolicy::default();

        let result = ReportAggregator::new(&ledger, fixture.business, &policy)
            .generate_monthly_summary(Some(2026), Some(13), at(2026, 4, 10, 8))
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn annual_summary_breaks_down_every_month() {
        let ledger = MemoryLedger::new();
        let fixture = seed_lease(&ledger, dec!(1000), 1, date(2026, 1, 1)).await;
        seed_paid(&ledger, &fixture, dec!(1000), date(2026, 2, 1), 0).await;
        let policy = RiskPolicy::default();

        let report = ReportAggregator::new(&ledger, fixture.business, &policy)
            .generate_annual_summary(Some(2026), at(2026, 12, 31, 8))
            .await
            .expect("report");
        let months = report
            .data
            .monthly_breakdown
            .as_ref()
            .and_then(Section::ready)
            .expect("breakdown");
        assert_eq!(months.len(), 12);
        assert_eq!(months[1].month, "2026-02");
        assert_eq!(months[1].collection_rate, 100.0);
        assert_eq!(report.end_date.month(), 12);
    }

    #[tokio::test]
    async fn status_and_overdue_reports_cover_open_items() {
        let ledger = MemoryLedger::new();
        let fixture = seed_lease(&ledger, dec!(1000), 1, date(2026, 1, 1)).await;
        let now = at(2026, 6, 20, 8);
        let today = now.date_naive();
        seed_pending(&ledger, &fixture, dec!(1000), today - Duration::days(45)).await;
        seed_pending(&ledger, &fixture, dec!(1000), today - Duration::days(5)).await;
        seed_pending(&ledger, &fixture, dec!(1000), today + Duration::days(11)).await;
        let policy = RiskPolicy::default();
        let aggregator = ReportAggregator::new(&ledger, fixture.business, &policy);

        let status = aggregator
            .generate_payment_status_report(now)
            .await
            .expect("status report");
        let upcoming = status.data.upcoming_payments.ready().expect("upcoming");
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].days_until_due, 11);
        assert_eq!(
            status.data.overdue_summary.ready().expect("overdue").total_overdue_payments,
            2
        );

        let overdue = aggregator.generate_overdue_report(now).await.expect("overdue report");
        let aging = overdue.data.aging_analysis.ready().expect("aging");
        assert_eq!(aging.buckets[0].count, 1);
        assert_eq!(aging.buckets[1].count, 1);
        assert_eq!(aging.oldest_days_overdue, 45);
        let plan = overdue.data.escalation_plan.ready().expect("plan");
        assert_eq!(plan.escalations.len(), 1);
    }

    #[tokio::test]
    async fn failed_section_serializes_its_error() {
        let failing: Section<u32> = Section::capture("demo", async {
            AppResult::<u32>::Err(AppError::Dependency("Database unavailable.".to_string()))
        })
        .await;
        assert!(failing.is_failed());
        assert_eq!(
            serde_json::to_value(&failing).expect("json"),
            json!({"error": "Database unavailable."})
        );

        let ready: Section<u32> = Section::capture("demo", async { Ok(7) }).await;
        assert_eq!(serde_json::to_value(&ready).expect("json"), json!(7));
    }

    #[test]
    fn recommendations_follow_thresholds() {
        let healthy = PaymentAnalysis {
            total_due: dec!(1000),
            total_collected: dec!(1000),
            collection_rate: 100.0,
            on_time_payments: 10,
            late_payments: 1,
            pending_payments: 0,
        };
        assert!(recommendations(Some(&healthy), None, None).is_empty());

        let slipping = PaymentAnalysis {
            collection_rate: 80.0,
            late_payments: 3,
            ..healthy
        };
        assert_eq!(
            recommendations(Some(&slipping), None, None),
            vec![
                "Improve collection rate through enhanced reminder system",
                "Consider implementing early payment incentives",
            ]
        );
    }
}
