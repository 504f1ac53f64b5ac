use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::guards::attachments::{default_allowed_types, AttachmentPolicy};
use crate::guards::rate_limit::RateLimitRule;
use crate::retry::RetryPolicy;

pub const MIN_GATEWAY_TOKEN_CHARS: usize = 16;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub attachments: AttachmentsConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Shared secret the identity gateway presents in `x-gateway-token`.
    pub gateway_token: SecretString,
}

#[derive(Clone, Debug)]
pub struct AttachmentsConfig {
    pub max_files: usize,
    pub max_size_bytes: u64,
    pub allowed_types: Vec<String>,
    pub storage_dir: PathBuf,
}

impl AttachmentsConfig {
    pub fn policy(&self) -> AttachmentPolicy {
        AttachmentPolicy {
            max_files: self.max_files,
            max_size_bytes: self.max_size_bytes,
            allowed_types: self.allowed_types.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub submit_max_attempts: u32,
    pub submit_window_minutes: u32,
    pub decide_max_attempts: u32,
    pub decide_window_minutes: u32,
}

impl RateLimitConfig {
    pub fn submit_rule(&self) -> RateLimitRule {
        RateLimitRule {
            max_attempts: self.submit_max_attempts,
            window_minutes: self.submit_window_minutes,
        }
    }

    pub fn decide_rule(&self) -> RateLimitRule {
        RateLimitRule {
            max_attempts: self.decide_max_attempts,
            window_minutes: self.decide_window_minutes,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub deadline_secs: u64,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub gateway_token: Option<String>,
    pub storage_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://portaflow.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            auth: AuthConfig { gateway_token: String::new().into() },
            attachments: AttachmentsConfig {
                max_files: 10,
                max_size_bytes: 50 * 1024 * 1024,
                allowed_types: default_allowed_types(),
                storage_dir: PathBuf::from("data/attachments"),
            },
            rate_limit: RateLimitConfig {
                submit_max_attempts: 10,
                submit_window_minutes: 60,
                decide_max_attempts: 30,
                decide_window_minutes: 60,
            },
            retry: RetryConfig {
                max_retries: 3,
                base_delay_ms: 100,
                max_delay_ms: 2_000,
                deadline_secs: 10,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("portaflow.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(gateway_token_value) = auth.gateway_token {
                self.auth.gateway_token = secret_value(gateway_token_value);
            }
        }

        if let Some(attachments) = patch.attachments {
            if let Some(max_files) = attachments.max_files {
                self.attachments.max_files = max_files;
            }
            if let Some(max_size_bytes) = attachments.max_size_bytes {
                self.attachments.max_size_bytes = max_size_bytes;
            }
            if let Some(allowed_types) = attachments.allowed_types {
                self.attachments.allowed_types = allowed_types;
            }
            if let Some(storage_dir) = attachments.storage_dir {
                self.attachments.storage_dir = storage_dir;
            }
        }

        if let Some(rate_limit) = patch.rate_limit {
            if let Some(value) = rate_limit.submit_max_attempts {
                self.rate_limit.submit_max_attempts = value;
            }
            if let Some(value) = rate_limit.submit_window_minutes {
                self.rate_limit.submit_window_minutes = value;
            }
            if let Some(value) = rate_limit.decide_max_attempts {
                self.rate_limit.decide_max_attempts = value;
            }
            if let Some(value) = rate_limit.decide_window_minutes {
                self.rate_limit.decide_window_minutes = value;
            }
        }

        if let Some(retry) = patch.retry {
            if let Some(max_retries) = retry.max_retries {
                self.retry.max_retries = max_retries;
            }
            if let Some(base_delay_ms) = retry.base_delay_ms {
                self.retry.base_delay_ms = base_delay_ms;
            }
            if let Some(max_delay_ms) = retry.max_delay_ms {
                self.retry.max_delay_ms = max_delay_ms;
            }
            if let Some(deadline_secs) = retry.deadline_secs {
                self.retry.deadline_secs = deadline_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PORTAFLOW_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PORTAFLOW_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_number("PORTAFLOW_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PORTAFLOW_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_number("PORTAFLOW_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PORTAFLOW_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PORTAFLOW_SERVER_PORT") {
            self.server.port = parse_number("PORTAFLOW_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PORTAFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_number("PORTAFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("PORTAFLOW_AUTH_GATEWAY_TOKEN") {
            self.auth.gateway_token = secret_value(value);
        }

        if let Some(value) = read_env("PORTAFLOW_ATTACHMENTS_MAX_FILES") {
            self.attachments.max_files = parse_number("PORTAFLOW_ATTACHMENTS_MAX_FILES", &value)?;
        }
        if let Some(value) = read_env("PORTAFLOW_ATTACHMENTS_MAX_SIZE_BYTES") {
            self.attachments.max_size_bytes =
                parse_number("PORTAFLOW_ATTACHMENTS_MAX_SIZE_BYTES", &value)?;
        }
        if let Some(value) = read_env("PORTAFLOW_ATTACHMENTS_ALLOWED_TYPES") {
            self.attachments.allowed_types = value
                .split(',')
                .map(str::trim)
                .filter(|content_type| !content_type.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = read_env("PORTAFLOW_ATTACHMENTS_STORAGE_DIR") {
            self.attachments.storage_dir = PathBuf::from(value);
        }

        if let Some(value) = read_env("PORTAFLOW_RATE_LIMIT_SUBMIT_MAX_ATTEMPTS") {
            self.rate_limit.submit_max_attempts =
                parse_number("PORTAFLOW_RATE_LIMIT_SUBMIT_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("PORTAFLOW_RATE_LIMIT_SUBMIT_WINDOW_MINUTES") {
            self.rate_limit.submit_window_minutes =
                parse_number("PORTAFLOW_RATE_LIMIT_SUBMIT_WINDOW_MINUTES", &value)?;
        }
        if let Some(value) = read_env("PORTAFLOW_RATE_LIMIT_DECIDE_MAX_ATTEMPTS") {
            self.rate_limit.decide_max_attempts =
                parse_number("PORTAFLOW_RATE_LIMIT_DECIDE_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("PORTAFLOW_RATE_LIMIT_DECIDE_WINDOW_MINUTES") {
            self.rate_limit.decide_window_minutes =
                parse_number("PORTAFLOW_RATE_LIMIT_DECIDE_WINDOW_MINUTES", &value)?;
        }

        if let Some(value) = read_env("PORTAFLOW_RETRY_MAX_RETRIES") {
            self.retry.max_retries = parse_number("PORTAFLOW_RETRY_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("PORTAFLOW_RETRY_BASE_DELAY_MS") {
            self.retry.base_delay_ms = parse_number("PORTAFLOW_RETRY_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("PORTAFLOW_RETRY_MAX_DELAY_MS") {
            self.retry.max_delay_ms = parse_number("PORTAFLOW_RETRY_MAX_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("PORTAFLOW_RETRY_DEADLINE_SECS") {
            self.retry.deadline_secs = parse_number("PORTAFLOW_RETRY_DEADLINE_SECS", &value)?;
        }

        let log_level =
            read_env("PORTAFLOW_LOGGING_LEVEL").or_else(|| read_env("PORTAFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PORTAFLOW_LOGGING_FORMAT").or_else(|| read_env("PORTAFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
        if let Some(gateway_token) = overrides.gateway_token {
            self.auth.gateway_token = secret_value(gateway_token);
        }
        if let Some(storage_dir) = overrides.storage_dir {
            self.attachments.storage_dir = storage_dir;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_auth(&self.auth)?;
        validate_attachments(&self.attachments)?;
        validate_rate_limit(&self.rate_limit)?;
        validate_retry(&self.retry)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("portaflow.toml"), PathBuf::from("config/portaflow.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    let token = auth.gateway_token.expose_secret();
    if token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "auth.gateway_token is required. Set PORTAFLOW_AUTH_GATEWAY_TOKEN to the secret shared with the identity gateway".to_string(),
        ));
    }
    if token.chars().count() < MIN_GATEWAY_TOKEN_CHARS {
        return Err(ConfigError::Validation(format!(
            "auth.gateway_token must be at least {MIN_GATEWAY_TOKEN_CHARS} characters"
        )));
    }

    Ok(())
}

fn validate_attachments(attachments: &AttachmentsConfig) -> Result<(), ConfigError> {
    if attachments.max_files == 0 || attachments.max_files > 100 {
        return Err(ConfigError::Validation(
            "attachments.max_files must be in range 1..=100".to_string(),
        ));
    }

    if attachments.max_size_bytes == 0 {
        return Err(ConfigError::Validation(
            "attachments.max_size_bytes must be greater than zero".to_string(),
        ));
    }

    if attachments.allowed_types.is_empty() {
        return Err(ConfigError::Validation(
            "attachments.allowed_types must list at least one content type".to_string(),
        ));
    }
    if let Some(invalid) =
        attachments.allowed_types.iter().find(|content_type| !content_type.contains('/'))
    {
        return Err(ConfigError::Validation(format!(
            "attachments.allowed_types entry `{invalid}` is not a media type (expected type/subtype)"
        )));
    }

    if attachments.storage_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "attachments.storage_dir must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_rate_limit(rate_limit: &RateLimitConfig) -> Result<(), ConfigError> {
    let fields = [
        ("rate_limit.submit_max_attempts", rate_limit.submit_max_attempts),
        ("rate_limit.submit_window_minutes", rate_limit.submit_window_minutes),
        ("rate_limit.decide_max_attempts", rate_limit.decide_max_attempts),
        ("rate_limit.decide_window_minutes", rate_limit.decide_window_minutes),
    ];
    if let Some((name, _)) = fields.iter().find(|(_, value)| *value == 0) {
        return Err(ConfigError::Validation(format!("{name} must be greater than zero")));
    }

    Ok(())
}

fn validate_retry(retry: &RetryConfig) -> Result<(), ConfigError> {
    if retry.max_retries > 10 {
        return Err(ConfigError::Validation("retry.max_retries must be at most 10".to_string()));
    }

    if retry.base_delay_ms > retry.max_delay_ms {
        return Err(ConfigError::Validation(
            "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
        ));
    }

    if retry.deadline_secs == 0 || retry.deadline_secs > 300 {
        return Err(ConfigError::Validation(
            "retry.deadline_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    auth: Option<AuthPatch>,
    attachments: Option<AttachmentsPatch>,
    rate_limit: Option<RateLimitPatch>,
    retry: Option<RetryPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    gateway_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AttachmentsPatch {
    max_files: Option<usize>,
    max_size_bytes: Option<u64>,
    allowed_types: Option<Vec<String>>,
    storage_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitPatch {
    submit_max_attempts: Option<u32>,
    submit_window_minutes: Option<u32>,
    decide_max_attempts: Option<u32>,
    decide_window_minutes: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RetryPatch {
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    deadline_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
