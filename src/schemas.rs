use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    repository::{PaymentStatus, ReminderType, ReportType},
    services::policy::LateFeeRules,
};

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

fn default_months_12() -> u32 {
    12
}
fn default_months_6() -> u32 {
    6
}
fn default_days_30() -> u32 {
    30
}
fn default_limit_10() -> i64 {
    10
}
fn default_system() -> String {
    "system".to_string()
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TenantInput {
    pub tenant_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LeaseInput {
    pub lease_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdatePaymentStatusInput {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PaymentHistoryInput {
    pub tenant_id: Uuid,
    #[serde(default = "default_months_12")]
    #[validate(range(min = 1, max = 120))]
    pub months_back: u32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MonthsBackQuery {
    #[serde(default = "default_months_6")]
    #[validate(range(min = 1, max = 36))]
    pub months_back: u32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LateFeeSummaryQuery {
    #[serde(default = "default_months_12")]
    #[validate(range(min = 1, max = 60))]
    pub months_back: u32,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct EscalationQuery {
    #[serde(default)]
    pub payment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CalculateLateFeeInput {
    pub payment_id: Uuid,
    #[serde(default)]
    pub custom_rules: Option<LateFeeRules>,
    #[serde(default)]
    pub override_grace: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ApplyLateFeesInput {
    #[serde(default)]
    pub lease_id: Option<Uuid>,
    #[serde(default)]
    pub force_apply: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct WaiveLateFeeInput {
    pub late_fee_id: Uuid,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    #[serde(default = "default_system")]
    #[validate(length(max = 255))]
    pub waived_by: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateLateFeeRulesInput {
    pub lease_id: Uuid,
    /// `null` clears the override and falls back to the business defaults.
    #[serde(default)]
    pub rules: Option<LateFeeRules>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ScheduleRemindersInput {
    #[serde(default)]
    pub lease_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCustomReminderInput {
    pub payment_id: Uuid,
    pub reminder_type: ReminderType,
    pub scheduled_at: DateTime<Utc>,
    #[validate(length(min = 1, max = 5000))]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReminderAnalyticsQuery {
    #[serde(default = "default_days_30")]
    #[validate(range(min = 1, max = 365))]
    pub days_back: u32,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct MonthlySummaryInput {
    #[serde(default)]
    #[validate(range(min = 1970, max = 9999))]
    pub year: Option<i32>,
    #[serde(default)]
    #[validate(range(min = 1, max = 12))]
    pub month: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct AnnualSummaryInput {
    #[serde(default)]
    #[validate(range(min = 1970, max = 9999))]
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReportHistoryQuery {
    #[serde(default)]
    pub report_type: Option<ReportType>,
    #[serde(default = "default_limit_10")]
    #[validate(range(min = 1, max = 100))]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReportInput {
    pub report_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct JobInput {
    pub job_id: Uuid,
}
