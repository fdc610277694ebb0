use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{services::policy::LateFeeRules, tenancy::BusinessId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
    Active,
    Expired,
    Terminated,
    Pending,
}

impl LeaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Terminated => "terminated",
            Self::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Rent,
    LateFee,
    SecurityDeposit,
    Maintenance,
    Other,
}

impl PaymentType {
    pub const ALL: [PaymentType; 5] = [
        Self::Rent,
        Self::LateFee,
        Self::SecurityDeposit,
        Self::Maintenance,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rent => "rent",
            Self::LateFee => "late_fee",
            Self::SecurityDeposit => "security_deposit",
            Self::Maintenance => "maintenance",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// Status only moves forward; a completed payment is undone through a refund.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed)
                | (Self::Pending, Self::Failed)
                | (Self::Failed, Self::Pending)
                | (Self::Completed, Self::Refunded)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateFeeStatus {
    Pending,
    Applied,
    Waived,
}

impl LateFeeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::Waived => "waived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderType {
    Upcoming,
    Overdue,
    LateFeeNotice,
}

impl ReminderType {
    pub const ALL: [ReminderType; 3] = [Self::Upcoming, Self::Overdue, Self::LateFeeNotice];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Overdue => "overdue",
            Self::LateFeeNotice => "late_fee_notice",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Pending,
    Sent,
    Failed,
}

impl ReminderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    MonthlySummary,
    AnnualSummary,
    PaymentStatus,
    OverdueReport,
}

impl ReportType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MonthlySummary => "monthly_summary",
            Self::AnnualSummary => "annual_summary",
            Self::PaymentStatus => "payment_status",
            Self::OverdueReport => "overdue_report",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub id: Uuid,
    pub business_id: BusinessId,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub business_id: BusinessId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub credit_score: Option<i32>,
    pub monthly_income: Option<Decimal>,
    pub is_active: bool,
}

impl Tenant {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub id: Uuid,
    pub business_id: BusinessId,
    pub tenant_id: Uuid,
    pub property_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: Decimal,
    #[serde(default)]
    pub security_deposit: Decimal,
    pub rent_due_day: u32,
    pub status: LeaseStatus,
    #[serde(default)]
    pub late_fee_rules: Option<LateFeeRules>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub business_id: BusinessId,
    pub lease_id: Uuid,
    pub amount: Decimal,
    pub payment_type: PaymentType,
    pub payment_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    pub status: PaymentStatus,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        if self.status != PaymentStatus::Pending {
            return 0;
        }
        (today - self.due_date).num_days().max(0)
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.days_overdue(today) > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LateFee {
    pub id: Uuid,
    pub business_id: BusinessId,
    pub payment_id: Uuid,
    pub amount: Decimal,
    pub days_overdue: i64,
    pub fee_date: NaiveDate,
    pub status: LateFeeStatus,
    #[serde(default)]
    pub waive_reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReminder {
    pub id: Uuid,
    pub business_id: BusinessId,
    pub payment_id: Uuid,
    pub reminder_type: ReminderType,
    pub scheduled_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub subject: String,
    pub message: String,
    pub status: ReminderStatus,
    #[serde(default)]
    pub error_message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialReport {
    pub id: Uuid,
    pub business_id: BusinessId,
    pub report_type: ReportType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub report_data: Value,
    pub generated_at: DateTime<Utc>,
    pub generated_by: String,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub lease_id: Uuid,
    pub amount: Decimal,
    pub payment_type: PaymentType,
    pub payment_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    pub status: PaymentStatus,
    pub payment_method: String,
    pub transaction_id: String,
    pub description: String,
    pub notes: String,
}

/// Fields written when a pending row is paid off.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub payment_method: String,
    pub transaction_id: String,
    pub notes: String,
}

#[derive(Debug, Clone)]
pub struct NewLateFee {
    pub payment_id: Uuid,
    pub amount: Decimal,
    pub days_overdue: i64,
    pub fee_date: NaiveDate,
    pub status: LateFeeStatus,
    pub waive_reason: String,
}

#[derive(Debug, Clone)]
pub struct NewReminder {
    pub payment_id: Uuid,
    pub reminder_type: ReminderType,
    pub scheduled_at: DateTime<Utc>,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum ReminderOutcome {
    Sent { sent_at: DateTime<Utc> },
    Failed { error_message: String },
}

#[derive(Debug, Clone)]
pub struct NewFinancialReport {
    pub report_type: ReportType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub report_data: Value,
    pub generated_at: DateTime<Utc>,
    pub generated_by: String,
}

#[derive(Debug, Clone, Default)]
pub struct LeaseFilter {
    pub lease_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub status: Option<LeaseStatus>,
}

impl LeaseFilter {
    pub fn active() -> Self {
        Self {
            status: Some(LeaseStatus::Active),
            ..Self::default()
        }
    }
}

/// Date bounds are inclusive except `due_before`.
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub lease_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub statuses: Vec<PaymentStatus>,
    pub payment_types: Vec<PaymentType>,
    pub due_before: Option<NaiveDate>,
    pub due_from: Option<NaiveDate>,
    pub due_to: Option<NaiveDate>,
    pub paid_from: Option<NaiveDate>,
    pub paid_to: Option<NaiveDate>,
}

impl PaymentFilter {
    /// Pending payments whose due date is before `today`.
    pub fn overdue(today: NaiveDate) -> Self {
        Self {
            statuses: vec![PaymentStatus::Pending],
            due_before: Some(today),
            ..Self::default()
        }
    }

    pub fn matches(&self, payment: &Payment, tenant_of_lease: Option<Uuid>) -> bool {
        if self.lease_id.is_some_and(|id| id != payment.lease_id) {
            return false;
        }
        if self.tenant_id.is_some() && self.tenant_id != tenant_of_lease {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&payment.status) {
            return false;
        }
        if !self.payment_types.is_empty() && !self.payment_types.contains(&payment.payment_type) {
            return false;
        }
        if self.due_before.is_some_and(|bound| payment.due_date >= bound) {
            return false;
        }
        if self.due_from.is_some_and(|bound| payment.due_date < bound) {
            return false;
        }
        if self.due_to.is_some_and(|bound| payment.due_date > bound) {
            return false;
        }
        if self.paid_from.is_some() || self.paid_to.is_some() {
            let Some(paid) = payment.payment_date else {
                return false;
            };
            if self.paid_from.is_some_and(|bound| paid < bound) {
                return false;
            }
            if self.paid_to.is_some_and(|bound| paid > bound) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct LateFeeFilter {
    pub payment_id: Option<Uuid>,
    pub lease_id: Option<Uuid>,
    pub statuses: Vec<LateFeeStatus>,
    pub fee_date_from: Option<NaiveDate>,
    pub fee_date_to: Option<NaiveDate>,
}

impl LateFeeFilter {
    pub fn matches(&self, fee: &LateFee, lease_of_payment: Option<Uuid>) -> bool {
        if self.payment_id.is_some_and(|id| id != fee.payment_id) {
            return false;
        }
        if self.lease_id.is_some() && self.lease_id != lease_of_payment {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&fee.status) {
            return false;
        }
        if self.fee_date_from.is_some_and(|bound| fee.fee_date < bound) {
            return false;
        }
        if self.fee_date_to.is_some_and(|bound| fee.fee_date > bound) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReminderFilter {
    pub payment_id: Option<Uuid>,
    pub statuses: Vec<ReminderStatus>,
    pub reminder_type: Option<ReminderType>,
    pub scheduled_until: Option<DateTime<Utc>>,
    pub sent_since: Option<DateTime<Utc>>,
    pub created_since: Option<DateTime<Utc>>,
}

impl ReminderFilter {
    pub fn matches(&self, reminder: &PaymentReminder) -> bool {
        if self.payment_id.is_some_and(|id| id != reminder.payment_id) {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&reminder.status) {
            return false;
        }
        if self
            .reminder_type
            .is_some_and(|kind| kind != reminder.reminder_type)
        {
            return false;
        }
        if self
            .scheduled_until
            .is_some_and(|bound| reminder.scheduled_at > bound)
        {
            return false;
        }
        if let Some(bound) = self.sent_since {
            if !reminder.sent_at.is_some_and(|sent| sent >= bound) {
                return false;
            }
        }
        if self
            .created_since
            .is_some_and(|bound| reminder.created_at < bound)
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::PaymentStatus;

    #[test]
    fn payment_status_only_moves_forward() {
        use PaymentStatus::*;
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Pending));
        assert!(Completed.can_transition_to(Refunded));

        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Refunded.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Refunded));
        assert!(!Pending.can_transition_to(Pending));
    }
}
