//! Startup self-checks module
//!
//! This module performs system verification before the server starts accepting requests.
//! Checks include:
//! - Database connectivity and schema
//! - Data directory is writable
//! - Verification code delivery is configured
//! - Session signing secret is stable across restarts
//! - Enrollment roster has entries

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::store::RosterStore;
use crate::DbPool;

/// Tables the server cannot run without
const ESSENTIAL_TABLES: [&str; 8] = [
    "identities",
    "pending_registrations",
    "roster_entries",
    "connection_requests",
    "messages",
    "profile_details",
    "posts",
    "qna_questions",
];

/// Result of a single startup check
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// Name of the check
    pub name: String,
    /// Whether the check passed
    pub passed: bool,
    /// Whether this check is critical (failure should abort startup)
    pub critical: bool,
    /// Human-readable message describing the result
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            critical: false,
            message: message.into(),
            details: None,
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>, critical: bool) -> Self {
        Self {
            name: name.into(),
            passed: false,
            critical,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Aggregated startup check results
#[derive(Debug, Clone, Serialize)]
pub struct StartupCheckReport {
    pub checks: Vec<CheckResult>,
    /// Whether all critical checks passed
    pub all_critical_passed: bool,
    /// Whether all checks passed (including non-critical)
    pub all_passed: bool,
    pub summary: String,
}

impl StartupCheckReport {
    pub fn new(checks: Vec<CheckResult>) -> Self {
        let all_critical_passed = checks.iter().filter(|c| c.critical).all(|c| c.passed);
        let all_passed = checks.iter().all(|c| c.passed);

        let failed_critical = checks.iter().filter(|c| c.critical && !c.passed).count();
        let failed_non_critical = checks.iter().filter(|c| !c.critical && !c.passed).count();
        let total = checks.len();
        let passed = checks.iter().filter(|c| c.passed).count();

        let summary = if all_passed {
            format!("All {} startup checks passed", total)
        } else if all_critical_passed {
            format!(
                "{}/{} checks passed ({} non-critical warnings)",
                passed, total, failed_non_critical
            )
        } else {
            format!(
                "{}/{} checks passed ({} critical failures)",
                passed, total, failed_critical
            )
        };

        Self {
            checks,
            all_critical_passed,
            all_passed,
            summary,
        }
    }
}

/// Run all startup self-checks
pub async fn run_startup_checks(
    config: &Config,
    db: &DbPool,
    roster: &dyn RosterStore,
) -> StartupCheckReport {
    info!("Running startup self-checks...");

    let checks = vec![
        check_database_connectivity(db).await,
        check_database_schema(db).await,
        check_directory_writability(config),
        check_email_delivery(config),
        check_session_secret(config),
        check_roster(roster).await,
    ];

    let report = StartupCheckReport::new(checks);

    for check in &report.checks {
        if check.passed {
            info!(
                check = %check.name,
                message = %check.message,
                "Startup check PASSED"
            );
        } else if check.critical {
            error!(
                check = %check.name,
                message = %check.message,
                details = ?check.details,
                "Startup check FAILED (CRITICAL)"
            );
        } else {
            warn!(
                check = %check.name,
                message = %check.message,
                details = ?check.details,
                "Startup check FAILED (non-critical)"
            );
        }
    }

    info!(
        summary = %report.summary,
        all_passed = report.all_passed,
        all_critical_passed = report.all_critical_passed,
        "Startup checks completed"
    );

    report
}

async fn check_database_connectivity(db: &DbPool) -> CheckResult {
    match sqlx::query("SELECT 1").fetch_one(db).await {
        Ok(_) => CheckResult::pass("database_connectivity", "Database connection successful"),
        Err(e) => CheckResult::fail("database_connectivity", "Failed to connect to database", true)
            .with_details(e.to_string()),
    }
}

async fn check_database_schema(db: &DbPool) -> CheckResult {
    let result: Result<Vec<(String,)>, _> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )
    .fetch_all(db)
    .await;

    match result {
        Ok(tables) => {
            let table_names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
            let missing: Vec<&str> = ESSENTIAL_TABLES
                .iter()
                .filter(|t| !table_names.contains(*t))
                .copied()
                .collect();

            if missing.is_empty() {
                CheckResult::pass(
                    "database_schema",
                    format!("Database schema valid ({} tables)", tables.len()),
                )
                .with_details(format!("Tables: {}", table_names.join(", ")))
            } else {
                CheckResult::fail("database_schema", "Missing essential database tables", true)
                    .with_details(format!("Missing: {}", missing.join(", ")))
            }
        }
        Err(e) => CheckResult::fail("database_schema", "Failed to query database schema", true)
            .with_details(e.to_string()),
    }
}

fn check_directory_writability(config: &Config) -> CheckResult {
    let data_dir = &config.server.data_dir;
    let test_file = data_dir.join(".connectu_write_test");

    match std::fs::write(&test_file, "test") {
        Ok(_) => {
            let _ = std::fs::remove_file(&test_file);
            CheckResult::pass("directory_writability", "Data directory is writable")
                .with_details(format!("Path: {}", data_dir.display()))
        }
        Err(e) => CheckResult::fail("directory_writability", "Data directory is not writable", true)
            .with_details(format!("{}: {}", data_dir.display(), e)),
    }
}

/// Without a mail path every signup ends in DispatchFailed
fn check_email_delivery(config: &Config) -> CheckResult {
    let email = &config.email;
    if email.log_only {
        return CheckResult::fail(
            "email_delivery",
            "Verification codes are written to the log instead of mailed",
            false,
        )
        .with_details("Unset email.log_only outside local development");
    }

    if email.is_configured() {
        CheckResult::pass("email_delivery", "SMTP delivery configured").with_details(format!(
            "{}:{}",
            email.smtp_host.as_deref().unwrap_or_default(),
            email.smtp_port
        ))
    } else {
        CheckResult::fail(
            "email_delivery",
            "SMTP is not configured; signups cannot be verified",
            false,
        )
        .with_details("Set email.smtp_host and email.from_address")
    }
}

fn check_session_secret(config: &Config) -> CheckResult {
    if config.auth.generated_secret {
        CheckResult::fail(
            "session_secret",
            "Using a generated session secret; tokens will not survive a restart",
            false,
        )
        .with_details("Set auth.jwt_secret")
    } else if config.auth.jwt_secret.len() < 16 {
        CheckResult::fail("session_secret", "Session secret is shorter than 16 bytes", false)
    } else {
        CheckResult::pass("session_secret", "Session secret configured")
    }
}

async fn check_roster(roster: &dyn RosterStore) -> CheckResult {
    match roster.roster_count().await {
        Ok(0) => CheckResult::fail(
            "roster",
            "Enrollment roster is empty; no student can sign up",
            false,
        )
        .with_details("Load one with `connectu import-roster <file.json>`"),
        Ok(count) => CheckResult::pass("roster", format!("Roster has {} entries", count)),
        Err(e) => CheckResult::fail("roster", "Failed to read the roster", false)
            .with_details(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    #[test]
    fn test_check_result_pass() {
        let result = CheckResult::pass("test", "Test passed");
        assert!(result.passed);
        assert!(!result.critical);
        assert_eq!(result.name, "test");
    }

    #[test]
    fn test_startup_check_report_critical_failure() {
        let checks = vec![
            CheckResult::pass("check1", "ok"),
            CheckResult::fail("check2", "fail", true),
        ];
        let report = StartupCheckReport::new(checks);
        assert!(!report.all_passed);
        assert!(!report.all_critical_passed);
        assert!(report.summary.contains("1 critical"));
    }

    #[test]
    fn test_startup_check_report_non_critical_failure() {
        let checks = vec![
            CheckResult::pass("check1", "ok"),
            CheckResult::fail("check2", "warn", false),
        ];
        let report = StartupCheckReport::new(checks);
        assert!(!report.all_passed);
        assert!(report.all_critical_passed);
    }

    #[test]
    fn test_email_and_secret_checks() {
        let mut config = Config::default();
        assert!(!check_email_delivery(&config).passed);
        assert!(!check_session_secret(&config).passed);

        config.email.smtp_host = Some("smtp.example.com".into());
        config.email.from_address = Some("noreply@example.com".into());
        assert!(check_email_delivery(&config).passed);

        config.auth.jwt_secret = "a-long-enough-configured-secret".into();
        config.auth.generated_secret = false;
        assert!(check_session_secret(&config).passed);
    }

    #[tokio::test]
    async fn test_checks_against_fresh_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.server.data_dir = dir.path().to_path_buf();

        let db = crate::db::init_memory().await.unwrap();
        let store = SqliteStore::new(db.clone());
        let report = run_startup_checks(&config, &db, &store).await;

        assert!(report.all_critical_passed, "{:?}", report.checks);
        let roster = report.checks.iter().find(|c| c.name == "roster").unwrap();
        assert!(!roster.passed);
    }
}
