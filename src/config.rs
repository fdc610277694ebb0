use std::env;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use validator::Validate;

use crate::services::calendar;
use crate::services::policy::{
    FinancePolicy, LateFeeRules, ReminderPolicy, RiskPolicy, WaiverPolicy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    Postgres,
    Memory,
}

impl LedgerBackend {
    fn from_env(value: Option<String>) -> Self {
        match value
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "memory" => Self::Memory,
            _ => Self::Postgres,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub environment: String,
    pub api_prefix: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub rate_limit_enabled: bool,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst_size: u32,
    pub request_timeout_seconds: u64,
    pub ledger_backend: LedgerBackend,
    pub database_url: Option<String>,
    pub db_pool_max_connections: u32,
    pub db_pool_min_connections: u32,
    pub db_pool_acquire_timeout_seconds: u64,
    pub db_pool_idle_timeout_seconds: u64,
    pub run_migrations: bool,
    pub resend_api_key: Option<String>,
    pub email_from_address: String,
    pub finance_timezone: Tz,
    pub report_cache_ttl_seconds: u64,
    pub report_cache_max_entries: u64,
    pub job_queue_capacity: usize,
    pub job_status_max_entries: u64,
    pub finance_scheduler_enabled: bool,
    pub finance_scheduler_daily_hour: u32,
    pub reminder_dispatch_interval_minutes: u64,
    pub policy: FinancePolicy,
}

impl AppConfig {
    /// Reads the process environment. Fails when the finance policy settings
    /// are malformed or out of range.
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_opt("DATABASE_URL");
        let ledger_backend = if database_url.is_none() {
            LedgerBackend::Memory
        } else {
            LedgerBackend::from_env(env_opt("LEDGER_BACKEND"))
        };

        let policy = policy_from_env()?;

        Ok(Self {
            app_name: env_or("APP_NAME", "Rent Ledger API"),
            environment: env_or("ENVIRONMENT", "development"),
            api_prefix: normalize_prefix(&env_or("API_PREFIX", "/v1")),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse_or("PORT", 8000),
            cors_origins: parse_csv(&env_or("CORS_ORIGINS", "http://localhost:3000")),
            rate_limit_enabled: env_parse_bool_or("RATE_LIMIT_ENABLED", true),
            rate_limit_per_second: env_parse_or("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst_size: env_parse_or("RATE_LIMIT_BURST_SIZE", 100),
            request_timeout_seconds: env_parse_or("REQUEST_TIMEOUT_SECONDS", 30),
            ledger_backend,
            database_url,
            db_pool_max_connections: env_parse_or("DB_POOL_MAX_CONNECTIONS", 5),
            db_pool_min_connections: env_parse_or("DB_POOL_MIN_CONNECTIONS", 1),
            db_pool_acquire_timeout_seconds: env_parse_or("DB_POOL_ACQUIRE_TIMEOUT_SECONDS", 5),
            db_pool_idle_timeout_seconds: env_parse_or("DB_POOL_IDLE_TIMEOUT_SECONDS", 600),
            run_migrations: env_parse_bool_or("RUN_MIGRATIONS", true),
            resend_api_key: env_opt("RESEND_API_KEY"),
            email_from_address: env_or("EMAIL_FROM_ADDRESS", "billing@rentledger.local"),
            finance_timezone: env_parse_or("FINANCE_TIMEZONE", Tz::UTC),
            report_cache_ttl_seconds: env_parse_or("REPORT_CACHE_TTL_SECONDS", 300),
            report_cache_max_entries: env_parse_or("REPORT_CACHE_MAX_ENTRIES", 500),
            job_queue_capacity: env_parse_or("JOB_QUEUE_CAPACITY", 256),
            job_status_max_entries: env_parse_or("JOB_STATUS_MAX_ENTRIES", 5000),
            finance_scheduler_enabled: env_parse_bool_or("FINANCE_SCHEDULER_ENABLED", false),
            finance_scheduler_daily_hour: env_parse_or("FINANCE_SCHEDULER_DAILY_HOUR", 6).min(23),
            reminder_dispatch_interval_minutes: env_parse_or(
                "REMINDER_DISPATCH_INTERVAL_MINUTES",
                15,
            ),
            policy,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }

    /// Calendar day in the finance time zone; rent due dates are local dates.
    pub fn local_today(&self, now: DateTime<Utc>) -> NaiveDate {
        calendar::local_date(now, self.finance_timezone)
    }
}

fn policy_from_env() -> Result<FinancePolicy, String> {
    let defaults = FinancePolicy::default();
    let rules = defaults.late_fee_rules;
    let waiver = defaults.waiver;
    let risk = defaults.risk;
    let reminders = defaults.reminders;

    let policy = FinancePolicy {
        late_fee_rules: LateFeeRules {
            grace_period_days: env_parse_or("LATE_FEE_GRACE_PERIOD_DAYS", rules.grace_period_days),
            flat_fee: env_parse_or::<Decimal>("LATE_FEE_FLAT_FEE", rules.flat_fee),
            percentage_fee: env_parse_or::<Decimal>("LATE_FEE_PERCENTAGE", rules.percentage_fee),
            daily_fee: env_parse_or::<Decimal>("LATE_FEE_DAILY_FEE", rules.daily_fee),
            max_fee_percentage: env_parse_or::<Decimal>(
                "LATE_FEE_MAX_PERCENTAGE",
                rules.max_fee_percentage,
            ),
            use_flat_fee: env_parse_bool_or("LATE_FEE_USE_FLAT_FEE", rules.use_flat_fee),
            compound_daily: env_parse_bool_or("LATE_FEE_COMPOUND_DAILY", rules.compound_daily),
        },
        waiver: WaiverPolicy {
            enabled: env_parse_bool_or("AUTO_WAIVER_ENABLED", waiver.enabled),
            excellent_reliability: env_parse_or(
                "AUTO_WAIVER_EXCELLENT_RELIABILITY",
                waiver.excellent_reliability,
            ),
            first_offense_max_late: env_parse_or(
                "AUTO_WAIVER_FIRST_OFFENSE_MAX_LATE",
                waiver.first_offense_max_late,
            ),
            minor_delay_days: env_parse_or("AUTO_WAIVER_MINOR_DELAY_DAYS", waiver.minor_delay_days),
            minor_delay_reliability: env_parse_or(
                "AUTO_WAIVER_MINOR_DELAY_RELIABILITY",
                waiver.minor_delay_reliability,
            ),
            history_months: env_parse_or("AUTO_WAIVER_HISTORY_MONTHS", waiver.history_months),
        },
        risk: RiskPolicy {
            at_risk_amount_threshold: env_parse_or::<Decimal>(
                "AT_RISK_AMOUNT_THRESHOLD",
                risk.at_risk_amount_threshold,
            ),
            ..risk
        },
        reminders: ReminderPolicy {
            offsets_days: parse_offsets(env_opt("REMINDER_OFFSETS_DAYS"))?
                .unwrap_or(reminders.offsets_days),
            send_hour: env_parse_or("REMINDER_SEND_HOUR", reminders.send_hour),
            history_months: env_parse_or("REMINDER_HISTORY_MONTHS", reminders.history_months),
            friendly_reliability: env_parse_or(
                "REMINDER_FRIENDLY_RELIABILITY",
                reminders.friendly_reliability,
            ),
        },
    };

    policy
        .validate()
        .map_err(|errors| format!("Invalid finance policy configuration: {errors}"))?;
    Ok(policy)
}

/// Comma separated reminder lead times, returned largest first.
fn parse_offsets(raw: Option<String>) -> Result<Option<Vec<i64>>, String> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let mut offsets = parse_csv(&raw)
        .iter()
        .map(|value| {
            value
                .parse::<i64>()
                .map_err(|_| format!("REMINDER_OFFSETS_DAYS has a non-integer entry '{value}'"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    offsets.sort_unstable_by(|a, b| b.cmp(a));
    offsets.dedup();
    Ok(Some(offsets))
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    env_opt(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_parse_bool_or(key: &str, default: bool) -> bool {
    match env_opt(key).as_deref().map(str::to_ascii_lowercase) {
        Some(value) if value == "1" || value == "true" || value == "yes" || value == "on" => true,
        Some(value) if value == "0" || value == "false" || value == "no" || value == "off" => false,
        Some(_) => default,
        None => default,
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn normalize_prefix(raw: &str) -> String {
    let mut prefix = raw.trim().to_string();
    if prefix.is_empty() {
        return "/v1".to_string();
    }
    if !prefix.starts_with('/') {
        prefix.insert(0, '/');
    }
    while prefix.ends_with('/') && prefix.len() > 1 {
        prefix.pop();
    }
    prefix
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        app_name: "Rent Ledger API".to_string(),
        environment: "test".to_string(),
        api_prefix: "/v1".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["*".to_string()],
        rate_limit_enabled: false,
        rate_limit_per_second: 10,
        rate_limit_burst_size: 100,
        request_timeout_seconds: 30,
        ledger_backend: LedgerBackend::Memory,
        database_url: None,
        db_pool_max_connections: 1,
        db_pool_min_connections: 1,
        db_pool_acquire_timeout_seconds: 1,
        db_pool_idle_timeout_seconds: 60,
        run_migrations: false,
        resend_api_key: None,
        email_from_address: "billing@test.local".to_string(),
        finance_timezone: Tz::UTC,
        report_cache_ttl_seconds: 60,
        report_cache_max_entries: 10,
        job_queue_capacity: 8,
        job_status_max_entries: 100,
        finance_scheduler_enabled: false,
        finance_scheduler_daily_hour: 6,
        reminder_dispatch_interval_minutes: 15,
        policy: FinancePolicy::default(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use chrono_tz::Tz;

    use super::{normalize_prefix, parse_offsets, policy_from_env, test_config, LedgerBackend};

    #[test]
    fn normalizes_prefix() {
        assert_eq!(normalize_prefix("v1"), "/v1");
        assert_eq!(normalize_prefix("/v1/"), "/v1");
        assert_eq!(normalize_prefix(""), "/v1");
    }

    #[test]
    fn parses_reminder_offsets_descending_and_unique() {
        assert_eq!(
            parse_offsets(Some("1, 7,3,7".to_string())),
            Ok(Some(vec![7, 3, 1]))
        );
        assert_eq!(parse_offsets(Some("400,-2".to_string())), Ok(Some(vec![400, -2])));
        assert!(parse_offsets(Some("7,x".to_string())).is_err());
        assert_eq!(parse_offsets(None), Ok(None));
    }

    #[test]
    fn out_of_range_policy_settings_fail_startup() {
        // Each case runs alone; the variables are process-wide.
        let cases = [
            ("LATE_FEE_MAX_PERCENTAGE", "0"),
            ("REMINDER_OFFSETS_DAYS", "7,100000000000000"),
            ("REMINDER_OFFSETS_DAYS", "3,-1"),
            ("REMINDER_SEND_HOUR", "24"),
        ];
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for (key, value) in cases {
            std::env::set_var(key, value);
            let result = policy_from_env();
            std::env::remove_var(key);
            assert!(result.is_err(), "{key}={value} should be rejected");
        }
        assert!(policy_from_env().is_ok());
    }

    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn backend_defaults_to_postgres() {
        assert_eq!(LedgerBackend::from_env(None), LedgerBackend::Postgres);
        assert_eq!(
            LedgerBackend::from_env(Some(" Memory ".to_string())),
            LedgerBackend::Memory
        );
    }

    #[test]
    fn local_today_follows_finance_timezone() {
        let mut config = test_config();
        config.finance_timezone = Tz::America__Asuncion;
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 1, 30, 0).single().expect("valid instant");
        assert_eq!(config.local_today(now).to_string(), "2026-02-28");
    }
}
