use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use portaflow_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, value, env_keys) in effective_values(&config) {
        let source = field_source(
            key_path,
            env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(key_path, &value, source));
    }

    lines.join("\n")
}

type ConfigLine = (&'static str, String, &'static [&'static str]);

fn effective_values(config: &AppConfig) -> Vec<ConfigLine> {
    let limits = &config.rate_limit;
    vec![
        line("database.url", config.database.url.clone(), &["PORTAFLOW_DATABASE_URL"]),
        line(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["PORTAFLOW_DATABASE_MAX_CONNECTIONS"],
        ),
        line(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["PORTAFLOW_DATABASE_TIMEOUT_SECS"],
        ),
        line("server.bind_address", config.server.bind_address.clone(), &["PORTAFLOW_SERVER_BIND_ADDRESS"]),
        line("server.port", config.server.port.to_string(), &["PORTAFLOW_SERVER_PORT"]),
        line(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["PORTAFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        line(
            "auth.gateway_token",
            redact_secret(config.auth.gateway_token.expose_secret()),
            &["PORTAFLOW_AUTH_GATEWAY_TOKEN"],
        ),
        line(
            "attachments.max_files",
            config.attachments.max_files.to_string(),
            &["PORTAFLOW_ATTACHMENTS_MAX_FILES"],
        ),
        line(
            "attachments.max_size_bytes",
            config.attachments.max_size_bytes.to_string(),
            &["PORTAFLOW_ATTACHMENTS_MAX_SIZE_BYTES"],
        ),
        line(
            "attachments.allowed_types",
            config.attachments.allowed_types.join(","),
            &["PORTAFLOW_ATTACHMENTS_ALLOWED_TYPES"],
        ),
        line(
            "attachments.storage_dir",
            config.attachments.storage_dir.display().to_string(),
            &["PORTAFLOW_ATTACHMENTS_STORAGE_DIR"],
        ),
        line(
            "rate_limit.submit_max_attempts",
            limits.submit_max_attempts.to_string(),
            &["PORTAFLOW_RATE_LIMIT_SUBMIT_MAX_ATTEMPTS"],
        ),
        line(
            "rate_limit.submit_window_minutes",
            limits.submit_window_minutes.to_string(),
            &["PORTAFLOW_RATE_LIMIT_SUBMIT_WINDOW_MINUTES"],
        ),
        line(
            "rate_limit.decide_max_attempts",
            limits.decide_max_attempts.to_string(),
            &["PORTAFLOW_RATE_LIMIT_DECIDE_MAX_ATTEMPTS"],
        ),
        line(
            "rate_limit.decide_window_minutes",
            limits.decide_window_minutes.to_string(),
            &["PORTAFLOW_RATE_LIMIT_DECIDE_WINDOW_MINUTES"],
        ),
        line("retry.max_retries", config.retry.max_retries.to_string(), &["PORTAFLOW_RETRY_MAX_RETRIES"]),
        line("retry.base_delay_ms", config.retry.base_delay_ms.to_string(), &["PORTAFLOW_RETRY_BASE_DELAY_MS"]),
        line("retry.max_delay_ms", config.retry.max_delay_ms.to_string(), &["PORTAFLOW_RETRY_MAX_DELAY_MS"]),
        line("retry.deadline_secs", config.retry.deadline_secs.to_string(), &["PORTAFLOW_RETRY_DEADLINE_SECS"]),
        line(
            "logging.level",
            config.logging.level.clone(),
            &["PORTAFLOW_LOGGING_LEVEL", "PORTAFLOW_LOG_LEVEL"],
        ),
        line(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["PORTAFLOW_LOGGING_FORMAT", "PORTAFLOW_LOG_FORMAT"],
        ),
    ]
}

fn line(key_path: &'static str, value: String, env_keys: &'static [&'static str]) -> ConfigLine {
    (key_path, value, env_keys)
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("portaflow.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/portaflow.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: &str) -> String {
    match secret.trim().chars().count() {
        0 => "<empty>".to_string(),
        length => format!("<redacted:{length} chars>"),
    }
}
