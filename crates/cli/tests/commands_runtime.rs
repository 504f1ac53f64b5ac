use std::env;
use std::sync::{Mutex, OnceLock};

use portaflow_cli::commands::{config, doctor, migrate, seed};
use serde_json::Value;

const GATEWAY_TOKEN: &str = "gateway-token-0123456789";

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(
        &[("PORTAFLOW_AUTH_GATEWAY_TOKEN", GATEWAY_TOKEN), ("PORTAFLOW_DATABASE_URL", "sqlite::memory:")],
        || {
            let result = migrate::run(false);
            assert_eq!(result.exit_code, 0, "expected successful migrate run");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "migrate");
            assert_eq!(payload["status"], "ok");
            assert_eq!(payload["message"], "applied pending migrations");
        },
    );
}

#[test]
fn migrate_returns_config_failure_without_gateway_token() {
    with_env(&[("PORTAFLOW_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run(false);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn migrate_revert_empties_a_file_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("portaflow.db").display());

    with_env(
        &[("PORTAFLOW_AUTH_GATEWAY_TOKEN", GATEWAY_TOKEN), ("PORTAFLOW_DATABASE_URL", url.as_str())],
        || {
            let applied = migrate::run(false);
            assert_eq!(applied.exit_code, 0, "{}", applied.output);

            let reverted = migrate::run(true);
            assert_eq!(reverted.exit_code, 0, "{}", reverted.output);
            let payload = parse_payload(&reverted.output);
            assert_eq!(payload["message"], "reverted all applied migrations");

            let reapplied = migrate::run(false);
            assert_eq!(reapplied.exit_code, 0, "{}", reapplied.output);
        },
    );
}

#[test]
fn seed_loads_demo_directory() {
    with_env(
        &[("PORTAFLOW_AUTH_GATEWAY_TOKEN", GATEWAY_TOKEN), ("PORTAFLOW_DATABASE_URL", "sqlite::memory:")],
        || {
            let result = seed::run();
            assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "seed");
            assert_eq!(payload["status"], "ok");
            assert_eq!(
                payload["message"],
                "demo approver directory loaded: 5 approvers across consultoria-alfa, consultoria-beta"
            );
        },
    );
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("seed.db").display());

    with_env(
        &[("PORTAFLOW_AUTH_GATEWAY_TOKEN", GATEWAY_TOKEN), ("PORTAFLOW_DATABASE_URL", url.as_str())],
        || {
            let first = seed::run();
            assert_eq!(first.exit_code, 0, "expected first seed invocation success");
            let second = seed::run();
            assert_eq!(second.exit_code, 0, "expected second seed invocation success");

            assert_eq!(parse_payload(&first.output)["message"], parse_payload(&second.output)["message"]);
        },
    );
}

#[test]
fn doctor_reports_pass_with_valid_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = dir.path().display().to_string();

    with_env(
        &[
            ("PORTAFLOW_AUTH_GATEWAY_TOKEN", GATEWAY_TOKEN),
            ("PORTAFLOW_DATABASE_URL", "sqlite::memory:"),
            ("PORTAFLOW_ATTACHMENTS_STORAGE_DIR", storage.as_str()),
        ],
        || {
            let result = doctor::run(true);
            assert_eq!(result.exit_code, 0, "{}", result.output);

            let report = parse_payload(&result.output);
            assert_eq!(report["overall_status"], "pass");
            let names: Vec<&str> = report["checks"]
                .as_array()
                .expect("checks")
                .iter()
                .filter_map(|check| check["name"].as_str())
                .collect();
            assert_eq!(
                names,
                vec!["config_validation", "gateway_token", "attachment_storage", "database_connectivity"]
            );
        },
    );
}

#[test]
fn doctor_skips_dependent_checks_when_config_invalid() {
    with_env(&[], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 7);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] config_validation"));
        assert!(result.output.contains("- [skip] database_connectivity"));
    });
}

#[test]
fn config_redacts_gateway_token_and_attributes_env_sources() {
    with_env(
        &[
            ("PORTAFLOW_AUTH_GATEWAY_TOKEN", GATEWAY_TOKEN),
            ("PORTAFLOW_DATABASE_URL", "sqlite::memory:"),
            ("PORTAFLOW_LOG_LEVEL", "debug"),
        ],
        || {
            let output = config::run();

            assert!(!output.contains(GATEWAY_TOKEN), "secret leaked: {output}");
            assert!(output.contains(
                "- auth.gateway_token = <redacted:24 chars> (source: env (PORTAFLOW_AUTH_GATEWAY_TOKEN))"
            ));
            assert!(output
                .contains("- database.url = sqlite::memory: (source: env (PORTAFLOW_DATABASE_URL))"));
            assert!(output.contains("- logging.level = debug (source: env (PORTAFLOW_LOG_LEVEL))"));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "PORTAFLOW_DATABASE_URL",
        "PORTAFLOW_DATABASE_MAX_CONNECTIONS",
        "PORTAFLOW_DATABASE_TIMEOUT_SECS",
        "PORTAFLOW_SERVER_BIND_ADDRESS",
        "PORTAFLOW_SERVER_PORT",
        "PORTAFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "PORTAFLOW_AUTH_GATEWAY_TOKEN",
        "PORTAFLOW_ATTACHMENTS_MAX_FILES",
        "PORTAFLOW_ATTACHMENTS_MAX_SIZE_BYTES",
        "PORTAFLOW_ATTACHMENTS_ALLOWED_TYPES",
        "PORTAFLOW_ATTACHMENTS_STORAGE_DIR",
        "PORTAFLOW_RATE_LIMIT_SUBMIT_MAX_ATTEMPTS",
        "PORTAFLOW_RATE_LIMIT_SUBMIT_WINDOW_MINUTES",
        "PORTAFLOW_RATE_LIMIT_DECIDE_MAX_ATTEMPTS",
        "PORTAFLOW_RATE_LIMIT_DECIDE_WINDOW_MINUTES",
        "PORTAFLOW_RETRY_MAX_RETRIES",
        "PORTAFLOW_RETRY_BASE_DELAY_MS",
        "PORTAFLOW_RETRY_MAX_DELAY_MS",
        "PORTAFLOW_RETRY_DEADLINE_SECS",
        "PORTAFLOW_LOGGING_LEVEL",
        "PORTAFLOW_LOGGING_FORMAT",
        "PORTAFLOW_LOG_LEVEL",
        "PORTAFLOW_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
