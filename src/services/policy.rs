//! Tunable business policy for the finance calculators.
//!
//! Defaults reproduce the heuristics product has been running with; every
//! threshold can be overridden through configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Largest reminder lead time, in days before the due date.
pub const MAX_REMINDER_OFFSET_DAYS: i64 = 365;

#[derive(Debug, Clone, Default, Validate)]
pub struct FinancePolicy {
    #[validate(nested)]
    pub late_fee_rules: LateFeeRules,
    #[validate(nested)]
    pub waiver: WaiverPolicy,
    #[validate(nested)]
    pub risk: RiskPolicy,
    #[validate(nested)]
    pub reminders: ReminderPolicy,
}

/// Late fee rule set, stored per lease when overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LateFeeRules {
    #[validate(range(min = 0, max = 365))]
    pub grace_period_days: i64,
    #[validate(custom(function = "non_negative"))]
    pub flat_fee: Decimal,
    #[validate(custom(function = "fraction"))]
    pub percentage_fee: Decimal,
    #[validate(custom(function = "non_negative"))]
    pub daily_fee: Decimal,
    #[validate(custom(function = "positive_fraction"))]
    pub max_fee_percentage: Decimal,
    pub use_flat_fee: bool,
    pub compound_daily: bool,
}

impl Default for LateFeeRules {
    fn default() -> Self {
        Self {
            grace_period_days: 5,
            flat_fee: dec!(50.00),
            percentage_fee: dec!(0.05),
            daily_fee: dec!(5.00),
            max_fee_percentage: dec!(0.20),
            use_flat_fee: true,
            compound_daily: false,
        }
    }
}

fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("must_not_be_negative"));
    }
    Ok(())
}

fn fraction(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO || *value > Decimal::ONE {
        return Err(ValidationError::new("must_be_between_0_and_1"));
    }
    Ok(())
}

fn positive_fraction(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO || *value > Decimal::ONE {
        return Err(ValidationError::new("must_be_above_0_and_at_most_1"));
    }
    Ok(())
}

/// Conditions under which an assessed late fee is recorded as waived.
#[derive(Debug, Clone, Copy, PartialEq, Validate)]
pub struct WaiverPolicy {
    pub enabled: bool,
    /// Reliability strictly above this waives outright.
    #[validate(range(min = 0.0, max = 100.0))]
    pub excellent_reliability: f64,
    /// At most this many late payments in the window counts as a first offense.
    pub first_offense_max_late: u32,
    #[validate(range(min = 0, max = 365))]
    pub minor_delay_days: i64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub minor_delay_reliability: f64,
    #[validate(range(min = 1, max = 120))]
    pub history_months: u32,
}

impl Default for WaiverPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            excellent_reliability: 95.0,
            first_offense_max_late: 1,
            minor_delay_days: 3,
            minor_delay_reliability: 85.0,
            history_months: 12,
        }
    }
}

/// Weights of the 0-100 tenant risk score.
#[derive(Debug, Clone, Copy, PartialEq, Validate)]
pub struct RiskPolicy {
    #[validate(custom(function = "non_negative"))]
    pub at_risk_amount_threshold: Decimal,
    pub at_risk_days_threshold: i64,
    pub escalation_days: i64,
    pub escalation_reminder_window_days: i64,
    pub amount_points_cap: f64,
    pub amount_per_point: f64,
    pub days_points_cap: f64,
    pub history_weight: f64,
    pub late_frequency_points: f64,
    pub days_late_points_cap: f64,
    pub recent_trend_points: f64,
    pub credit_risk_points: f64,
    pub critical_cutoff: u32,
    pub high_cutoff: u32,
    pub medium_cutoff: u32,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            at_risk_amount_threshold: dec!(1000),
            at_risk_days_threshold: 15,
            escalation_days: 7,
            escalation_reminder_window_days: 7,
            amount_points_cap: 20.0,
            amount_per_point: 100.0,
            days_points_cap: 20.0,
            history_weight: 0.4,
            late_frequency_points: 10.0,
            days_late_points_cap: 10.0,
            recent_trend_points: 5.0,
            credit_risk_points: 5.0,
            critical_cutoff: 75,
            high_cutoff: 50,
            medium_cutoff: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Validate)]
pub struct ReminderPolicy {
    /// Days before the due date, largest first.
    #[validate(custom(function = "reminder_offsets"))]
    pub offsets_days: Vec<i64>,
    #[validate(range(max = 23))]
    pub send_hour: u32,
    #[validate(range(min = 1, max = 120))]
    pub history_months: u32,
    #[validate(range(min = 0.0, max = 100.0))]
    pub friendly_reliability: f64,
}

fn reminder_offsets(offsets: &[i64]) -> Result<(), ValidationError> {
    if offsets.is_empty() {
        return Err(ValidationError::new("must_not_be_empty"));
    }
    if offsets
        .iter()
        .any(|days| !(0..=MAX_REMINDER_OFFSET_DAYS).contains(days))
    {
        return Err(ValidationError::new("must_be_between_0_and_365"));
    }
    Ok(())
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            offsets_days: vec![7, 3, 1],
            send_hour: 0,
            history_months: 12,
            friendly_reliability: 90.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use validator::Validate;

    use super::{FinancePolicy, LateFeeRules, ReminderPolicy};

    #[test]
    fn default_rules_are_valid() {
        assert!(LateFeeRules::default().validate().is_ok());
        assert!(FinancePolicy::default().validate().is_ok());
    }

    #[test]
    fn rejects_unbounded_reminder_offsets() {
        for offsets in [vec![7, 400], vec![-1], Vec::new(), vec![i64::MAX]] {
            let policy = FinancePolicy {
                reminders: ReminderPolicy {
                    offsets_days: offsets.clone(),
                    ..ReminderPolicy::default()
                },
                ..FinancePolicy::default()
            };
            assert!(policy.validate().is_err(), "{offsets:?} should be rejected");
        }
    }

    #[test]
    fn nested_rule_errors_fail_the_policy() {
        let policy = FinancePolicy {
            late_fee_rules: LateFeeRules {
                max_fee_percentage: dec!(0),
                ..LateFeeRules::default()
            },
            ..FinancePolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_rules() {
        let negative_fee = LateFeeRules {
            flat_fee: dec!(-1),
            ..LateFeeRules::default()
        };
        assert!(negative_fee.validate().is_err());

        let zero_cap = LateFeeRules {
            max_fee_percentage: dec!(0),
            ..LateFeeRules::default()
        };
        assert!(zero_cap.validate().is_err());

        let huge_percentage = LateFeeRules {
            percentage_fee: dec!(1.5),
            ..LateFeeRules::default()
        };
        assert!(huge_percentage.validate().is_err());

        let negative_grace = LateFeeRules {
            grace_period_days: -1,
            ..LateFeeRules::default()
        };
        assert!(negative_grace.validate().is_err());
    }
}
