use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    error::{AppError, AppResult},
    schemas::{
        validate_input, AnnualSummaryInput, ApplyLateFeesInput, CalculateLateFeeInput,
        CreateCustomReminderInput, EscalationQuery, JobInput, LateFeeSummaryQuery, LeaseInput,
        MonthlySummaryInput, MonthsBackQuery, PaymentHistoryInput, ReminderAnalyticsQuery,
        ReportHistoryQuery, ReportInput, ScheduleRemindersInput, TenantInput,
        UpdateLateFeeRulesInput, UpdatePaymentStatusInput, WaiveLateFeeInput,
    },
    services::{
        balance::{BalanceCalculator, TrackPaymentInput},
        jobs::FinanceJob,
        late_fees::LateFeeEngine,
        overdue::OverdueAssessor,
        reminders::ReminderScheduler,
        reports::ReportAggregator,
    },
    state::AppState,
    tenancy::{parse_id, resolve_business, BusinessId},
};

/// Every operation reachable over HTTP, with its validated input.
#[derive(Debug, Clone)]
pub enum FinanceAction {
    TrackPayment(TrackPaymentInput),
    UpdatePaymentStatus(UpdatePaymentStatusInput),
    CalculateTenantBalance(TenantInput),
    CalculateLeaseBalance(LeaseInput),
    PaymentHistory(PaymentHistoryInput),
    GetAllBalances,
    DetectOverduePayments,
    TenantRiskProfile(TenantInput),
    OverdueTrends(MonthsBackQuery),
    EscalationActions(EscalationQuery),
    CalculateLateFee(CalculateLateFeeInput),
    ApplyLateFees(ApplyLateFeesInput),
    WaiveLateFee(WaiveLateFeeInput),
    SendLateFeeNotices,
    LateFeeSummary(LateFeeSummaryQuery),
    UpdateLateFeeRules(UpdateLateFeeRulesInput),
    SchedulePaymentReminders(ScheduleRemindersInput),
    SendDueReminders,
    CreateCustomReminder(CreateCustomReminderInput),
    ReminderAnalytics(ReminderAnalyticsQuery),
    GenerateMonthlySummary(MonthlySummaryInput),
    GenerateAnnualSummary(AnnualSummaryInput),
    GeneratePaymentStatusReport,
    GenerateOverdueReport,
    ReportHistory(ReportHistoryQuery),
    GetReport(ReportInput),
    EnqueueJob(FinanceJob),
    GetJob(JobInput),
}

fn data_as<T: DeserializeOwned>(action: &str, data: Value) -> AppResult<T> {
    serde_json::from_value(data)
        .map_err(|error| AppError::BadRequest(format!("Invalid data for '{action}': {error}")))
}

impl FinanceAction {
    /// Builds an action from its wire name and `data` object.
    pub fn parse(action: &str, data: Value) -> AppResult<Self> {
        let action = action.trim();
        let data = if data.is_null() {
            Value::Object(Map::new())
        } else {
            data
        };

        Ok(match action {
            "track_payment" => Self::TrackPayment(data_as(action, data)?),
            "update_payment_status" => Self::UpdatePaymentStatus(data_as(action, data)?),
            "calculate_tenant_balance" => Self::CalculateTenantBalance(data_as(action, data)?),
            "calculate_lease_balance" => Self::CalculateLeaseBalance(data_as(action, data)?),
            "payment_history" => Self::PaymentHistory(data_as(action, data)?),
            "get_all_balances" => Self::GetAllBalances,
            "detect_overdue_payments" => Self::DetectOverduePayments,
            "tenant_risk_profile" => Self::TenantRiskProfile(data_as(action, data)?),
            "overdue_trends" => Self::OverdueTrends(data_as(action, data)?),
            "escalation_actions" => Self::EscalationActions(data_as(action, data)?),
            "calculate_late_fee" => Self::CalculateLateFee(data_as(action, data)?),
            "apply_late_fees" => Self::ApplyLateFees(data_as(action, data)?),
            "waive_late_fee" => Self::WaiveLateFee(data_as(action, data)?),
            "send_late_fee_notices" => Self::SendLateFeeNotices,
            "late_fee_summary" => Self::LateFeeSummary(data_as(action, data)?),
            "update_late_fee_rules" => Self::UpdateLateFeeRules(data_as(action, data)?),
            "schedule_payment_reminders" => Self::SchedulePaymentReminders(data_as(action, data)?),
            "send_due_reminders" => Self::SendDueReminders,
            "create_custom_reminder" => Self::CreateCustomReminder(data_as(action, data)?),
            "reminder_analytics" => Self::ReminderAnalytics(data_as(action, data)?),
            "generate_monthly_summary" => Self::GenerateMonthlySummary(data_as(action, data)?),
            "generate_annual_summary" => Self::GenerateAnnualSummary(data_as(action, data)?),
            "generate_payment_status_report" => Self::GeneratePaymentStatusReport,
            "generate_overdue_report" => Self::GenerateOverdueReport,
            "report_history" => Self::ReportHistory(data_as(action, data)?),
            "get_report" => Self::GetReport(data_as(action, data)?),
            "enqueue_job" => Self::EnqueueJob(data_as(action, data)?),
            "get_job" => Self::GetJob(data_as(action, data)?),
            other => return Err(AppError::BadRequest(format!("Unknown action '{other}'."))),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::TrackPayment(_) => "track_payment",
            Self::UpdatePaymentStatus(_) => "update_payment_status",
            Self::CalculateTenantBalance(_) => "calculate_tenant_balance",
            Self::CalculateLeaseBalance(_) => "calculate_lease_balance",
            Self::PaymentHistory(_) => "payment_history",
            Self::GetAllBalances => "get_all_balances",
            Self::DetectOverduePayments => "detect_overdue_payments",
            Self::TenantRiskProfile(_) => "tenant_risk_profile",
            Self::OverdueTrends(_) => "overdue_trends",
            Self::EscalationActions(_) => "escalation_actions",
            Self::CalculateLateFee(_) => "calculate_late_fee",
            Self::ApplyLateFees(_) => "apply_late_fees",
            Self::WaiveLateFee(_) => "waive_late_fee",
            Self::SendLateFeeNotices => "send_late_fee_notices",
            Self::LateFeeSummary(_) => "late_fee_summary",
            Self::UpdateLateFeeRules(_) => "update_late_fee_rules",
            Self::SchedulePaymentReminders(_) => "schedule_payment_reminders",
            Self::SendDueReminders => "send_due_reminders",
            Self::CreateCustomReminder(_) => "create_custom_reminder",
            Self::ReminderAnalytics(_) => "reminder_analytics",
            Self::GenerateMonthlySummary(_) => "generate_monthly_summary",
            Self::GenerateAnnualSummary(_) => "generate_annual_summary",
            Self::GeneratePaymentStatusReport => "generate_payment_status_report",
            Self::GenerateOverdueReport => "generate_overdue_report",
            Self::ReportHistory(_) => "report_history",
            Self::GetReport(_) => "get_report",
            Self::EnqueueJob(_) => "enqueue_job",
            Self::GetJob(_) => "get_job",
        }
    }

    fn validate(&self) -> AppResult<()> {
        match self {
            Self::UpdatePaymentStatus(input) => validate_input(input),
            Self::PaymentHistory(input) => validate_input(input),
            Self::OverdueTrends(input) => validate_input(input),
            Self::WaiveLateFee(input) => validate_input(input),
            Self::LateFeeSummary(input) => validate_input(input),
            Self::CreateCustomReminder(input) => validate_input(input),
            Self::ReminderAnalytics(input) => validate_input(input),
            Self::GenerateMonthlySummary(input) => validate_input(input),
            Self::GenerateAnnualSummary(input) => validate_input(input),
            Self::ReportHistory(input) => validate_input(input),
            _ => Ok(()),
        }
    }
}

fn to_json<T: Serialize>(value: T) -> AppResult<Value> {
    serde_json::to_value(value)
        .map_err(|error| AppError::Internal(format!("Could not serialize response: {error}")))
}

/// Runs one action for one business.
pub async fn execute(
    state: &AppState,
    business: BusinessId,
    action: FinanceAction,
) -> AppResult<Value> {
    action.validate()?;

    let ledger = state.ledger.as_ref();
    let notifier = state.notifier.as_ref();
    let policy = state.policy();
    let now = Utc::now();
    let today = state.config.local_today(now);

    let balances = BalanceCalculator::new(ledger, business);
    let timezone = state.config.finance_timezone;
    let assessor = OverdueAssessor::new(ledger, business, &policy.risk).in_timezone(timezone);
    let fees = LateFeeEngine::new(ledger, business, policy).in_timezone(timezone);
    let reminders =
        ReminderScheduler::new(ledger, business, &policy.reminders).in_timezone(timezone);
    let reports = ReportAggregator::new(ledger, business, &policy.risk)
        .generated_by("api")
        .in_timezone(timezone);

    match action {
        FinanceAction::TrackPayment(input) => to_json(balances.track_payment(input, today).await?),
        FinanceAction::UpdatePaymentStatus(input) => to_json(
            balances
                .update_payment_status(input.payment_id, input.status, input.notes, today)
                .await?,
        ),
        FinanceAction::CalculateTenantBalance(input) => {
            to_json(balances.calculate_tenant_balance(input.tenant_id, today).await?)
        }
        FinanceAction::CalculateLeaseBalance(input) => {
            to_json(balances.calculate_lease_balance(input.lease_id, today).await?)
        }
        FinanceAction::PaymentHistory(input) => to_json(
            balances
                .payment_history(input.tenant_id, input.months_back, today)
                .await?,
        ),
        FinanceAction::GetAllBalances => to_json(balances.all_balances(today).await?),
        FinanceAction::DetectOverduePayments => {
            to_json(assessor.detect_overdue_payments(now).await?)
        }
        FinanceAction::TenantRiskProfile(input) => {
            to_json(assessor.tenant_risk_profile(input.tenant_id, now).await?)
        }
        FinanceAction::OverdueTrends(input) => {
            to_json(assessor.overdue_trends(input.months_back, today).await?)
        }
        FinanceAction::EscalationActions(input) => {
            to_json(assessor.escalation_actions(input.payment_id, today).await?)
        }
        FinanceAction::CalculateLateFee(input) => to_json(
            fees.calculate_late_fee(
                input.payment_id,
                input.custom_rules,
                input.override_grace,
                today,
            )
            .await?,
        ),
        FinanceAction::ApplyLateFees(input) => to_json(
            fees.apply_late_fees(input.lease_id, input.force_apply, today)
                .await?,
        ),
        FinanceAction::WaiveLateFee(input) => to_json(
            fees.waive_late_fee(input.late_fee_id, &input.reason, &input.waived_by)
                .await?,
        ),
        FinanceAction::SendLateFeeNotices => {
            to_json(fees.send_late_fee_notices(notifier, now).await?)
        }
        FinanceAction::LateFeeSummary(input) => {
            to_json(fees.late_fee_summary(input.months_back, today).await?)
        }
        FinanceAction::UpdateLateFeeRules(input) => {
            to_json(fees.update_late_fee_rules(input.lease_id, input.rules).await?)
        }
        FinanceAction::SchedulePaymentReminders(input) => {
            to_json(reminders.schedule_payment_reminders(input.lease_id, now).await?)
        }
        FinanceAction::SendDueReminders => {
            to_json(reminders.send_due_reminders(notifier, now).await?)
        }
        FinanceAction::CreateCustomReminder(input) => to_json(
            reminders
                .create_custom_reminder(
                    input.payment_id,
                    input.reminder_type,
                    input.scheduled_at,
                    input.message,
                    now,
                )
                .await?,
        ),
        FinanceAction::ReminderAnalytics(input) => {
            to_json(reminders.reminder_analytics(input.days_back, now).await?)
        }
        FinanceAction::GenerateMonthlySummary(input) => to_json(
            reports
                .generate_monthly_summary(input.year, input.month, now)
                .await?,
        ),
        FinanceAction::GenerateAnnualSummary(input) => {
            to_json(reports.generate_annual_summary(input.year, now).await?)
        }
        FinanceAction::GeneratePaymentStatusReport => {
            to_json(reports.generate_payment_status_report(now).await?)
        }
        FinanceAction::GenerateOverdueReport => {
            to_json(reports.generate_overdue_report(now).await?)
        }
        FinanceAction::ReportHistory(input) => {
            to_json(reports.report_history(input.report_type, input.limit).await?)
        }
        FinanceAction::GetReport(input) => {
            let key = (business, input.report_id);
            if let Some(report) = state.report_cache.get(&key).await {
                return to_json(report);
            }
            let report = reports.get_report(input.report_id).await?;
            state.report_cache.insert(key, report.clone()).await;
            to_json(report)
        }
        FinanceAction::EnqueueJob(job) => to_json(state.jobs.enqueue(business, job).await?),
        FinanceAction::GetJob(input) => to_json(state.jobs.status(business, input.job_id).await?),
    }
}

/// `{success, action, timestamp, data}` or `{success: false, action, timestamp, error}`.
pub fn envelope(action: &str, result: AppResult<Value>) -> Response {
    let timestamp = Utc::now().to_rfc3339();
    match result {
        Ok(data) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "action": action,
                "timestamp": timestamp,
                "data": data,
            })),
        )
            .into_response(),
        Err(error) => {
            let status = error.status_code();
            if status.is_server_error() {
                tracing::error!(action, kind = error.kind(), error = %error, "Finance action failed");
            }
            (
                status,
                Json(json!({
                    "success": false,
                    "action": action,
                    "timestamp": timestamp,
                    "error": error.to_string(),
                    "error_kind": error.kind(),
                })),
            )
                .into_response()
        }
    }
}

/// Resolves the business, then runs the action built from the request.
pub async fn run(
    state: &AppState,
    name: &str,
    raw_business_id: &str,
    action: AppResult<FinanceAction>,
) -> Response {
    envelope(name, resolve_and_execute(state, raw_business_id, action).await)
}

async fn resolve_and_execute(
    state: &AppState,
    raw_business_id: &str,
    action: AppResult<FinanceAction>,
) -> AppResult<Value> {
    let business = resolve_business(state.ledger.as_ref(), raw_business_id).await?;
    execute(state, business, action?).await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/businesses/{business_id}/finance/actions", post(dispatch_action))
        .route("/businesses/{business_id}/balances", get(all_balances))
        .route("/businesses/{business_id}/payments", post(track_payment))
        .route(
            "/businesses/{business_id}/payments/{payment_id}/status",
            post(update_payment_status),
        )
        .route(
            "/businesses/{business_id}/tenants/{tenant_id}/balance",
            get(tenant_balance),
        )
        .route(
            "/businesses/{business_id}/tenants/{tenant_id}/payment-history",
            get(payment_history),
        )
        .route(
            "/businesses/{business_id}/tenants/{tenant_id}/risk-profile",
            get(tenant_risk_profile),
        )
        .route(
            "/businesses/{business_id}/leases/{lease_id}/balance",
            get(lease_balance),
        )
        .route(
            "/businesses/{business_id}/leases/{lease_id}/late-fee-rules",
            put(update_late_fee_rules),
        )
        .route("/businesses/{business_id}/overdue", get(detect_overdue))
        .route("/businesses/{business_id}/overdue/trends", get(overdue_trends))
        .route(
            "/businesses/{business_id}/overdue/escalations",
            get(escalation_actions),
        )
        .route(
            "/businesses/{business_id}/late-fees/calculate",
            post(calculate_late_fee),
        )
        .route("/businesses/{business_id}/late-fees/apply", post(apply_late_fees))
        .route(
            "/businesses/{business_id}/late-fees/notices",
            post(send_late_fee_notices),
        )
        .route(
            "/businesses/{business_id}/late-fees/summary",
            get(late_fee_summary),
        )
        .route(
            "/businesses/{business_id}/late-fees/{late_fee_id}/waive",
            post(waive_late_fee),
        )
        .route("/businesses/{business_id}/reminders", post(create_custom_reminder))
        .route(
            "/businesses/{business_id}/reminders/schedule",
            post(schedule_reminders),
        )
        .route("/businesses/{business_id}/reminders/send", post(send_due_reminders))
        .route(
            "/businesses/{business_id}/reminders/analytics",
            get(reminder_analytics),
        )
        .route("/businesses/{business_id}/reports", get(report_history))
        .route(
            "/businesses/{business_id}/reports/monthly",
            post(generate_monthly_summary),
        )
        .route(
            "/businesses/{business_id}/reports/annual",
            post(generate_annual_summary),
        )
        .route(
            "/businesses/{business_id}/reports/payment-status",
            post(generate_payment_status_report),
        )
        .route(
            "/businesses/{business_id}/reports/overdue",
            post(generate_overdue_report),
        )
        .route("/businesses/{business_id}/reports/{report_id}", get(get_report))
}

#[derive(Debug, Deserialize)]
struct ActionRequest {
    action: String,
    #[serde(default)]
    data: Value,
}

async fn dispatch_action(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
    Json(request): Json<ActionRequest>,
) -> Response {
    let name = request.action.trim().to_string();
    let action = FinanceAction::parse(&name, request.data);
    run(&state, &name, &business_id, action).await
}

/// Merges path identifiers into a JSON body before parsing it as `action`.
fn body_action(
    action: &str,
    body: Option<Json<Value>>,
    ids: &[(&str, &str)],
) -> AppResult<FinanceAction> {
    let mut data = match body.map(|Json(value)| value) {
        Some(Value::Object(map)) => map,
        Some(Value::Null) | None => Map::new(),
        Some(_) => {
            return Err(AppError::BadRequest(
                "Request body must be a JSON object.".to_string(),
            ))
        }
    };
    for (field, raw) in ids {
        data.insert((*field).to_string(), Value::String(raw.trim().to_string()));
    }
    FinanceAction::parse(action, Value::Object(data))
}

async fn all_balances(State(state): State<AppState>, Path(business_id): Path<String>) -> Response {
    run(&state, "get_all_balances", &business_id, Ok(FinanceAction::GetAllBalances)).await
}

async fn track_payment(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
    body: Option<Json<Value>>,
) -> Response {
    let action = body_action("track_payment", body, &[]);
    run(&state, "track_payment", &business_id, action).await
}

async fn update_payment_status(
    State(state): State<AppState>,
    Path((business_id, payment_id)): Path<(String, String)>,
    body: Option<Json<Value>>,
) -> Response {
    let action = body_action("update_payment_status", body, &[("payment_id", payment_id.as_str())]);
    run(&state, "update_payment_status", &business_id, action).await
}

async fn tenant_balance(
    State(state): State<AppState>,
    Path((business_id, tenant_id)): Path<(String, String)>,
) -> Response {
    let action = parse_id(&tenant_id, "tenant_id")
        .map(|tenant_id| FinanceAction::CalculateTenantBalance(TenantInput { tenant_id }));
    run(&state, "calculate_tenant_balance", &business_id, action).await
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    months_back: Option<u32>,
}

async fn payment_history(
    State(state): State<AppState>,
    Path((business_id, tenant_id)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let action = parse_id(&tenant_id, "tenant_id").map(|tenant_id| {
        FinanceAction::PaymentHistory(PaymentHistoryInput {
            tenant_id,
            months_back: query.months_back.unwrap_or(12),
        })
    });
    run(&state, "payment_history", &business_id, action).await
}

async fn tenant_risk_profile(
    State(state): State<AppState>,
    Path((business_id, tenant_id)): Path<(String, String)>,
) -> Response {
    let action = parse_id(&tenant_id, "tenant_id")
        .map(|tenant_id| FinanceAction::TenantRiskProfile(TenantInput { tenant_id }));
    run(&state, "tenant_risk_profile", &business_id, action).await
}

async fn lease_balance(
    State(state): State<AppState>,
    Path((business_id, lease_id)): Path<(String, String)>,
) -> Response {
    let action = parse_id(&lease_id, "lease_id")
        .map(|lease_id| FinanceAction::CalculateLeaseBalance(LeaseInput { lease_id }));
    run(&state, "calculate_lease_balance", &business_id, action).await
}

async fn update_late_fee_rules(
    State(state): State<AppState>,
    Path((business_id, lease_id)): Path<(String, String)>,
    body: Option<Json<Value>>,
) -> Response {
    let action = body_action("update_late_fee_rules", body, &[("lease_id", lease_id.as_str())]);
    run(&state, "update_late_fee_rules", &business_id, action).await
}

async fn detect_overdue(State(state): State<AppState>, Path(business_id): Path<String>) -> Response {
    run(
        &state,
        "detect_overdue_payments",
        &business_id,
        Ok(FinanceAction::DetectOverduePayments),
    )
    .await
}

async fn overdue_trends(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
    Query(query): Query<MonthsBackQuery>,
) -> Response {
    run(
        &state,
        "overdue_trends",
        &business_id,
        Ok(FinanceAction::OverdueTrends(query)),
    )
    .await
}

async fn escalation_actions(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
    Query(query): Query<EscalationQuery>,
) -> Response {
    run(
        &state,
        "escalation_actions",
        &business_id,
        Ok(FinanceAction::EscalationActions(query)),
    )
    .await
}

async fn calculate_late_fee(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
    body: Option<Json<Value>>,
) -> Response {
    let action = body_action("calculate_late_fee", body, &[]);
    run(&state, "calculate_late_fee", &business_id, action).await
}

async fn apply_late_fees(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
    body: Option<Json<Value>>,
) -> Response {
    let action = body_action("apply_late_fees", body, &[]);
    run(&state, "apply_late_fees", &business_id, action).await
}

async fn send_late_fee_notices(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
) -> Response {
    run(
        &state,
        "send_late_fee_notices",
        &business_id,
        Ok(FinanceAction::SendLateFeeNotices),
    )
    .await
}

async fn late_fee_summary(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
    Query(query): Query<LateFeeSummaryQuery>,
) -> Response {
    run(
        &state,
        "late_fee_summary",
        &business_id,
        Ok(FinanceAction::LateFeeSummary(query)),
    )
    .await
}

async fn waive_late_fee(
    State(state): State<AppState>,
    Path((business_id, late_fee_id)): Path<(String, String)>,
    body: Option<Json<Value>>,
) -> Response {
    let action = body_action("waive_late_fee", body, &[("late_fee_id", late_fee_id.as_str())]);
    run(&state, "waive_late_fee", &business_id, action).await
}

async fn create_custom_reminder(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
    body: Option<Json<Value>>,
) -> Response {
    let action = body_action("create_custom_reminder", body, &[]);
    run(&state, "create_custom_reminder", &business_id, action).await
}

async fn schedule_reminders(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
    body: Option<Json<Value>>,
) -> Response {
    let action = body_action("schedule_payment_reminders", body, &[]);
    run(&state, "schedule_payment_reminders", &business_id, action).await
}

async fn send_due_reminders(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
) -> Response {
    run(
        &state,
        "send_due_reminders",
        &business_id,
        Ok(FinanceAction::SendDueReminders),
    )
    .await
}

async fn reminder_analytics(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
    Query(query): Query<ReminderAnalyticsQuery>,
) -> Response {
    run(
        &state,
        "reminder_analytics",
        &business_id,
        Ok(FinanceAction::ReminderAnalytics(query)),
    )
    .await
}

async fn report_history(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
    Query(query): Query<ReportHistoryQuery>,
) -> Response {
    run(
        &state,
        "report_history",
        &business_id,
        Ok(FinanceAction::ReportHistory(query)),
    )
    .await
}

async fn generate_monthly_summary(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
    body: Option<Json<Value>>,
) -> Response {
    let action = body_action("generate_monthly_summary", body, &[]);
    run(&state, "generate_monthly_summary", &business_id, action).await
}

async fn generate_annual_summary(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
    body: Option<Json<Value>>,
) -> Response {
    let action = body_action("generate_annual_summary", body, &[]);
    run(&state, "generate_annual_summary", &business_id, action).await
}

async fn generate_payment_status_report(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
) -> Response {
    run(
        &state,
        "generate_payment_status_report",
        &business_id,
        Ok(FinanceAction::GeneratePaymentStatusReport),
    )
    .await
}

async fn generate_overdue_report(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
) -> Response {
    run(
        &state,
        "generate_overdue_report",
        &business_id,
        Ok(FinanceAction::GenerateOverdueReport),
    )
    .await
}

async fn get_report(
    State(state): State<AppState>,
    Path((business_id, report_id)): Path<(String, String)>,
) -> Response {
    let action = parse_id(&report_id, "report_id")
        .map(|report_id| FinanceAction::GetReport(ReportInput { report_id }));
    run(&state, "get_report", &business_id, action).await
}
