use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppResult,
    repository::{
        Lease, LeaseFilter, LedgerStore, Payment, PaymentFilter, PaymentStatus, PaymentType,
        ReminderFilter, ReminderStatus, Tenant,
    },
    services::{
        balance::{round1, round2, BalanceCalculator, PaymentHistory},
        calendar,
        policy::RiskPolicy,
        property_titles,
    },
    tenancy::BusinessId,
};

const HISTORY_MONTHS: u32 = 12;
const ESCALATION_MIN_DAYS: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Tier of a payment by days overdue: 1-7 low, 8-15 medium, 16-30 high, 31+ critical.
    pub fn from_days_overdue(days: i64) -> Self {
        match days {
            i64::MIN..=7 => Self::Low,
            8..=15 => Self::Medium,
            16..=30 => Self::High,
            _ => Self::Critical,
        }
    }

    pub fn from_score(score: u32, policy: &RiskPolicy) -> Self {
        if score >= policy.critical_cutoff {
            Self::Critical
        } else if score >= policy.high_cutoff {
            Self::High
        } else if score >= policy.medium_cutoff {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

pub fn suggested_actions(days_overdue: i64) -> Vec<&'static str> {
    match days_overdue {
        i64::MIN..=3 => vec!["Send friendly reminder"],
        4..=7 => vec!["Send urgent reminder", "Consider phone call"],
        8..=15 => vec![
            "Apply late fee",
            "Send formal notice",
            "Schedule payment plan discussion",
        ],
        _ => vec![
            "Legal consultation",
            "Escalate to management",
            "Consider eviction process",
        ],
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OverduePayment {
    pub payment_id: Uuid,
    pub lease_id: Uuid,
    pub tenant_id: Uuid,
    pub tenant_name: String,
    pub tenant_email: String,
    pub property: String,
    pub amount: Decimal,
    pub payment_type: PaymentType,
    pub due_date: NaiveDate,
    pub days_overdue: i64,
    pub risk_level: RiskLevel,
    pub tenant_total_overdue: Decimal,
    pub requires_escalation: bool,
    pub suggested_actions: Vec<&'static str>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TierTotals {
    pub count: usize,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RiskSummary {
    pub low: TierTotals,
    pub medium: TierTotals,
    pub high: TierTotals,
    pub critical: TierTotals,
}

impl RiskSummary {
    fn tier_mut(&mut self, level: RiskLevel) -> &mut TierTotals {
        match level {
            RiskLevel::Low => &mut self.low,
            RiskLevel::Medium => &mut self.medium,
            RiskLevel::High => &mut self.high,
            RiskLevel::Critical => &mut self.critical,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AtRiskTenant {
    pub tenant_id: Uuid,
    pub tenant_name: String,
    pub overdue_count: usize,
    pub total_overdue: Decimal,
    pub max_days_overdue: i64,
    pub properties: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverdueSummary {
    pub severity: Severity,
    pub average_days_overdue: f64,
    pub average_amount: Decimal,
    pub immediate_action_required: usize,
    /// Share of critical-tier payments, in percent.
    pub critical_ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverdueReport {
    pub detection_date: NaiveDate,
    pub total_overdue_payments: usize,
    pub total_overdue_amount: Decimal,
    pub risk_summary: RiskSummary,
    pub overdue_payments: Vec<OverduePayment>,
    pub tenants_at_risk: Vec<AtRiskTenant>,
    pub escalation_required: Vec<Uuid>,
    pub summary: OverdueSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantInfo {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub credit_score: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentStatus {
    pub overdue_payments: usize,
    pub overdue_amount: Decimal,
    pub days_overdue: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditRisk {
    Low,
    Medium,
    High,
    Unknown,
}

impl CreditRisk {
    pub fn from_score(credit_score: Option<i32>) -> Self {
        match credit_score {
            Some(score) if score >= 750 => Self::Low,
            Some(score) if score >= 650 => Self::Medium,
            Some(_) => Self::High,
            None => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskIndicators {
    pub late_payment_frequency: f64,
    pub average_days_late: f64,
    pub payment_reliability: f64,
    pub recent_late_trend: bool,
    pub credit_risk: CreditRisk,
}

impl RiskIndicators {
    fn from_history(history: &PaymentHistory, credit_score: Option<i32>) -> Self {
        let mut indicators = Self {
            late_payment_frequency: 0.0,
            average_days_late: 0.0,
            payment_reliability: 0.0,
            recent_late_trend: false,
            credit_risk: CreditRisk::from_score(credit_score),
        };
        if history.has_history() {
            indicators.late_payment_frequency =
                history.late_payments as f64 / history.total_payments as f64;
            indicators.payment_reliability = history.reliability_score;
            indicators.average_days_late = history.average_days_late;
            let recent_late = history.payments.iter().take(3).filter(|p| p.is_late).count();
            indicators.recent_late_trend = recent_late >= 2;
        }
        indicators
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantRiskProfile {
    pub tenant_info: TenantInfo,
    pub current_status: CurrentStatus,
    pub payment_history: PaymentHistory,
    pub risk_indicators: RiskIndicators,
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<&'static str>,
}

/// Composite 0-100 score from current arrears, history and behaviour.
pub fn risk_score(
    current: &CurrentStatus,
    history: &PaymentHistory,
    indicators: &RiskIndicators,
    policy: &RiskPolicy,
) -> u32 {
    let mut score = 0.0;

    if current.overdue_amount > Decimal::ZERO {
        let amount = f64::try_from(current.overdue_amount).unwrap_or(0.0);
        score += (amount / policy.amount_per_point).min(policy.amount_points_cap);
        score += (current.days_overdue as f64).min(policy.days_points_cap);
    }

    // A tenant without history has nothing against them yet.
    let reliability = if history.has_history() {
        history.reliability_score
    } else {
        100.0
    };
    score += (100.0 - reliability) * policy.history_weight;

    score += indicators.late_payment_frequency * policy.late_frequency_points;
    score += (indicators.average_days_late / 2.0).min(policy.days_late_points_cap);
    if indicators.recent_late_trend {
        score += policy.recent_trend_points;
    }
    if indicators.credit_risk == CreditRisk::High {
        score += policy.credit_risk_points;
    }

    score.clamp(0.0, 100.0) as u32
}

pub fn risk_recommendations(level: RiskLevel) -> Vec<&'static str> {
    match level {
        RiskLevel::Critical => vec![
            "Immediate contact required",
            "Consider legal consultation",
            "Implement payment plan",
            "Increase monitoring frequency",
        ],
        RiskLevel::High => vec![
            "Schedule payment discussion",
            "Send formal notice",
            "Apply late fees",
            "Weekly check-ins",
        ],
        RiskLevel::Medium => vec![
            "Send reminder notice",
            "Monitor closely",
            "Consider payment plan options",
        ],
        RiskLevel::Low => vec!["Continue standard monitoring"],
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyOverdue {
    pub month: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Payments due in the month that were paid late or are still unpaid past due.
    pub overdue_count: usize,
    pub overdue_amount: Decimal,
    pub still_pending: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendAnalysis {
    pub trend: TrendDirection,
    pub recent_average: f64,
    pub earlier_average: f64,
    pub change_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeasonalAnalysis {
    pub peak_month: Option<u32>,
    pub low_month: Option<u32>,
    pub month_averages: BTreeMap<u32, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverdueTrends {
    pub period_months: u32,
    pub monthly_data: Vec<MonthlyOverdue>,
    pub trend_analysis: TrendAnalysis,
    pub seasonal_analysis: SeasonalAnalysis,
}

/// Compares the last three buckets against the ones before them.
pub fn analyze_trend(counts: &[usize]) -> TrendAnalysis {
    if counts.len() < 2 {
        return TrendAnalysis {
            trend: TrendDirection::InsufficientData,
            recent_average: 0.0,
            earlier_average: 0.0,
            change_percentage: 0.0,
        };
    }
    let split = counts.len().saturating_sub(3);
    let (earlier, recent) = counts.split_at(split);
    let average = |values: &[usize]| {
        values.iter().sum::<usize>() as f64 / values.len().max(1) as f64
    };
    let recent_average = average(recent);
    let earlier_average = average(earlier);

    let trend = if recent_average > earlier_average * 1.2 {
        TrendDirection::Increasing
    } else if recent_average < earlier_average * 0.8 {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };

    TrendAnalysis {
        trend,
        recent_average: round1(recent_average),
        earlier_average: round1(earlier_average),
        change_percentage: round1(
            (recent_average - earlier_average) / earlier_average.max(1.0) * 100.0,
        ),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Escalation {
    pub payment_id: Uuid,
    pub tenant_name: String,
    pub days_overdue: i64,
    pub level: Option<RiskLevel>,
    pub recommended_actions: Vec<&'static str>,
}

pub fn escalation_ladder(days_overdue: i64) -> (Option<RiskLevel>, Vec<&'static str>) {
    if days_overdue >= 30 {
        (
            Some(RiskLevel::Critical),
            vec![
                "Prepare legal notice",
                "Notify management",
                "Schedule payment plan discussion",
            ],
        )
    } else if days_overdue >= 15 {
        (
            Some(RiskLevel::High),
            vec![
                "Send formal notice",
                "Apply late fee",
                "Notify property manager",
            ],
        )
    } else if days_overdue >= 7 {
        (
            Some(RiskLevel::Medium),
            vec!["Send follow-up reminder", "Schedule phone call"],
        )
    } else {
        (None, Vec::new())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EscalationPlan {
    pub as_of: NaiveDate,
    pub escalations: Vec<Escalation>,
}

/// Lookup tables for labelling payments without a query per row.
struct Directory {
    leases: HashMap<Uuid, Lease>,
    tenants: HashMap<Uuid, Tenant>,
    titles: HashMap<Uuid, String>,
}

impl Directory {
    fn tenant_of(&self, payment: &Payment) -> Option<(&Lease, &Tenant)> {
        let lease = self.leases.get(&payment.lease_id)?;
        let tenant = self.tenants.get(&lease.tenant_id)?;
        Some((lease, tenant))
    }

    fn title(&self, lease: &Lease) -> String {
        self.titles.get(&lease.property_id).cloned().unwrap_or_default()
    }
}

/// Read-only arrears analysis for one business.
pub struct OverdueAssessor<'a> {
    ledger: &'a dyn LedgerStore,
    business: BusinessId,
    policy: &'a RiskPolicy,
    timezone: Tz,
}

impl<'a> OverdueAssessor<'a> {
    pub fn new(ledger: &'a dyn LedgerStore, business: BusinessId, policy: &'a RiskPolicy) -> Self {
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

    async fn directory(&self) -> AppResult<Directory> {
        let leases = self
            .ledger
            .list_leases(self.business, &LeaseFilter::default())
            .await?
            .into_iter()
            .map(|lease| (lease.id, lease))
            .collect();
        let tenants = self
            .ledger
            .list_tenants(self.business, false)
            .await?
            .into_iter()
            .map(|tenant| (tenant.id, tenant))
            .collect();
        let titles = property_titles(self.ledger, self.business).await?;
        Ok(Directory {
            leases,
            tenants,
            titles,
        })
    }

    async fn reminded_recently(&self, payment_id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let sent = self
            .ledger
            .list_reminders(
                self.business,
                &ReminderFilter {
                    payment_id: Some(payment_id),
                    statuses: vec![ReminderStatus::Sent],
                    sent_since: Some(now - Duration::days(self.policy.escalation_reminder_window_days)),
                    ..ReminderFilter::default()
                },
            )
            .await?;
        Ok(!sent.is_empty())
    }

    pub async fn detect_overdue_payments(&self, now: DateTime<Utc>) -> AppResult<OverdueReport> {
        let today = calendar::local_date(now, self.timezone);
        let overdue = self
            .ledger
            .list_payments(self.business, &PaymentFilter::overdue(today))
            .await?;
        let directory = self.directory().await?;

        let mut tenant_totals: HashMap<Uuid, Decimal> = HashMap::new();
        for payment in &overdue {
            if let Some((_, tenant)) = directory.tenant_of(payment) {
                *tenant_totals.entry(tenant.id).or_default() += payment.amount;
            }
        }

        let mut risk_summary = RiskSummary::default();
        let mut rows = Vec::with_capacity(overdue.len());
        for payment in &overdue {
            let Some((lease, tenant)) = directory.tenant_of(payment) else {
                continue;
            };
            let days_overdue = payment.days_overdue(today);
            let risk_level = RiskLevel::from_days_overdue(days_overdue);
            let requires_escalation = days_overdue > self.policy.escalation_days
                && !self.reminded_recently(payment.id, now).await?;

            let tier = risk_summary.tier_mut(risk_level);
            tier.count += 1;
            tier.amount += payment.amount;

            rows.push(OverduePayment {
                payment_id: payment.id,
                lease_id: lease.id,
                tenant_id: tenant.id,
                tenant_name: tenant.full_name(),
                tenant_email: tenant.email.clone(),
                property: directory.title(lease),
                amount: payment.amount,
                payment_type: payment.payment_type,
                due_date: payment.due_date,
                days_overdue,
                risk_level,
                tenant_total_overdue: tenant_totals.get(&tenant.id).copied().unwrap_or_default(),
                requires_escalation,
                suggested_actions: suggested_actions(days_overdue),
            });
        }

        let total_overdue_amount = rows.iter().map(|row| row.amount).sum::<Decimal>();
        let summary = summarize(&rows, &risk_summary, total_overdue_amount);
        let report = OverdueReport {
            detection_date: today,
            total_overdue_payments: rows.len(),
            total_overdue_amount,
            tenants_at_risk: self.at_risk_tenants(&rows),
            escalation_required: rows
                .iter()
                .filter(|row| row.requires_escalation)
                .map(|row| row.payment_id)
                .collect(),
            risk_summary,
            overdue_payments: rows,
            summary,
        };

        info!(
            business_id = %self.business,
            overdue = report.total_overdue_payments,
            amount = %report.total_overdue_amount,
            escalations = report.escalation_required.len(),
            "Overdue detection completed"
        );
        Ok(report)
    }

    fn at_risk_tenants(&self, rows: &[OverduePayment]) -> Vec<AtRiskTenant> {
        let mut by_tenant: HashMap<Uuid, (AtRiskTenant, BTreeSet<String>)> = HashMap::new();
        for row in rows {
            let (entry, properties) = by_tenant.entry(row.tenant_id).or_insert_with(|| {
                (
                    AtRiskTenant {
                        tenant_id: row.tenant_id,
                        tenant_name: row.tenant_name.clone(),
                        overdue_count: 0,
                        total_overdue: Decimal::ZERO,
                        max_days_overdue: 0,
                        properties: Vec::new(),
                    },
                    BTreeSet::new(),
                )
            });
            entry.overdue_count += 1;
            entry.total_overdue += row.amount;
            entry.max_days_overdue = entry.max_days_overdue.max(row.days_overdue);
            properties.insert(row.property.clone());
        }

        let mut at_risk = by_tenant
            .into_values()
            .map(|(mut tenant, properties)| {
                tenant.properties = properties.into_iter().collect();
                tenant
            })
            .filter(|tenant| {
                tenant.overdue_count > 1
                    || tenant.max_days_overdue > self.policy.at_risk_days_threshold
                    || tenant.total_overdue > self.policy.at_risk_amount_threshold
            })
            .collect::<Vec<_>>();
        at_risk.sort_by(|a, b| b.total_overdue.cmp(&a.total_overdue));
        at_risk
    }

    pub async fn tenant_risk_profile(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<TenantRiskProfile> {
        let today = calendar::local_date(now, self.timezone);
        let tenant = self.ledger.get_tenant(self.business, tenant_id).await?;
        let payment_history = BalanceCalculator::new(self.ledger, self.business)
            .payment_history(tenant.id, HISTORY_MONTHS, today)
            .await?;
        let overdue = self
            .ledger
            .list_payments(
                self.business,
                &PaymentFilter {
                    tenant_id: Some(tenant.id),
                    ..PaymentFilter::overdue(today)
                },
            )
            .await?;

        let current_status = CurrentStatus {
            overdue_payments: overdue.len(),
            overdue_amount: overdue.iter().map(|p| p.amount).sum(),
            days_overdue: overdue
                .iter()
                .map(|p| p.days_overdue(today))
                .max()
                .unwrap_or(0),
        };
        let risk_indicators = RiskIndicators::from_history(&payment_history, tenant.credit_score);
        let risk_score = risk_score(&current_status, &payment_history, &risk_indicators, self.policy);
        let risk_level = RiskLevel::from_score(risk_score, self.policy);

        Ok(TenantRiskProfile {
            tenant_info: TenantInfo {
                id: tenant.id,
                name: tenant.full_name(),
                email: tenant.email.clone(),
                credit_score: tenant.credit_score,
            },
            current_status,
            payment_history,
            risk_indicators,
            risk_score,
            risk_level,
            recommendations: risk_recommendations(risk_level),
        })
    }

    pub async fn overdue_trends(
        &self,
        months_back: u32,
        today: NaiveDate,
    ) -> AppResult<OverdueTrends> {
        let months_back = months_back.max(1);
        let first_month = calendar::shift_month(today, 1 - months_back as i32);
        let payments = self
            .ledger
            .list_payments(
                self.business,
                &PaymentFilter {
                    due_from: Some(first_month),
                    due_before: Some(today),
                    ..PaymentFilter::default()
                },
            )
            .await?
            .into_iter()
            .filter(|p| p.payment_type != PaymentType::LateFee)
            .collect::<Vec<_>>();

        let mut monthly_data = Vec::new();
        let mut month = first_month;
        while month <= today {
            let period_end = calendar::last_of_month(month).min(today);
            let mut bucket = MonthlyOverdue {
                month: calendar::month_key(month),
                period_start: month,
                period_end,
                overdue_count: 0,
                overdue_amount: Decimal::ZERO,
                still_pending: 0,
            };
            for payment in payments
                .iter()
                .filter(|p| p.due_date >= month && p.due_date <= period_end)
            {
                let fell_overdue = match payment.status {
                    PaymentStatus::Pending => true,
                    PaymentStatus::Completed | PaymentStatus::Refunded => payment
                        .payment_date
                        .is_some_and(|paid| paid > payment.due_date),
                    PaymentStatus::Failed => true,
                };
                if fell_overdue {
                    bucket.overdue_count += 1;
                    bucket.overdue_amount += payment.amount;
                }
                if payment.status == PaymentStatus::Pending {
                    bucket.still_pending += 1;
                }
            }
            monthly_data.push(bucket);
            month = calendar::shift_month(month, 1);
        }

        let counts = monthly_data.iter().map(|m| m.overdue_count).collect::<Vec<_>>();
        let trend_analysis = analyze_trend(&counts);

        let mut per_calendar_month: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for bucket in &monthly_data {
            per_calendar_month
                .entry(bucket.period_start.month())
                .or_default()
                .push(bucket.overdue_count);
        }
        let month_averages = per_calendar_month
            .into_iter()
            .map(|(month, counts)| {
                let average = counts.iter().sum::<usize>() as f64 / counts.len() as f64;
                (month, round2(average))
            })
            .collect::<BTreeMap<_, _>>();
        let peak_month = month_averages
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(month, _)| *month);
        let low_month = month_averages
            .iter()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(month, _)| *month);

        Ok(OverdueTrends {
            period_months: months_back,
            monthly_data,
            trend_analysis,
            seasonal_analysis: SeasonalAnalysis {
                peak_month,
                low_month,
                month_averages,
            },
        })
    }

    /// Escalation steps for pending payments at least two weeks overdue, or
    /// for one payment. Nothing is sent or changed.
    pub async fn escalation_actions(
        &self,
        payment_id: Option<Uuid>,
        today: NaiveDate,
    ) -> AppResult<EscalationPlan> {
        let payments = match payment_id {
            Some(id) => {
                let payment = self.ledger.get_payment(self.business, id).await?;
                if payment.status == PaymentStatus::Pending {
                    vec![payment]
                } else {
                    Vec::new()
                }
            }
            None => {
                self.ledger
                    .list_payments(
                        self.business,
                        &PaymentFilter::overdue(today - Duration::days(ESCALATION_MIN_DAYS - 1)),
                    )
                    .await?
            }
        };
        let directory = self.directory().await?;

        let escalations = payments
            .iter()
            .map(|payment| {
                let days_overdue = payment.days_overdue(today);
                let (level, recommended_actions) = escalation_ladder(days_overdue);
                Escalation {
                    payment_id: payment.id,
                    tenant_name: directory
                        .tenant_of(payment)
                        .map(|(_, tenant)| tenant.full_name())
                        .unwrap_or_default(),
                    days_overdue,
                    level,
                    recommended_actions,
                }
            })
            .collect();

        Ok(EscalationPlan {
            as_of: today,
            escalations,
        })
    }
}

fn summarize(rows: &[OverduePayment], tiers: &RiskSummary, total: Decimal) -> OverdueSummary {
    if rows.is_empty() {
        return OverdueSummary {
            severity: Severity::Low,
            average_days_overdue: 0.0,
            average_amount: Decimal::ZERO,
            immediate_action_required: 0,
            critical_ratio: 0.0,
        };
    }
    let count = rows.len() as f64;
    let average_days = rows.iter().map(|row| row.days_overdue as f64).sum::<f64>() / count;
    let critical_ratio = tiers.critical.count as f64 / count;
    let severity = if critical_ratio > 0.2 {
        Severity::Critical
    } else if critical_ratio > 0.1 || average_days > 15.0 {
        Severity::High
    } else if average_days > 7.0 {
        Severity::Medium
    } else {
        Severity::Low
    };

    OverdueSummary {
        severity,
        average_days_overdue: round1(average_days),
        average_amount: (total / Decimal::from(rows.len())).round_dp(2),
        immediate_action_required: tiers.high.count + tiers.critical.count,
        critical_ratio: round1(critical_ratio * 100.0),
    }
}
