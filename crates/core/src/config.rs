use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analytics::{AnalyticsSettings, TrendSettings};
use crate::sync::{SyncSettings, MAX_PAGE_SIZE};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub commerce: CommerceConfig,
    pub llm: LlmConfig,
    pub analytics: AnalyticsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CommerceConfig {
    pub base_url: String,
    pub api_version: String,
    pub timeout_secs: u64,
    pub page_size: u32,
    pub lookback_days: u32,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AnalyticsConfig {
    pub window_days: u32,
    pub trend_days: u32,
    pub ema_alpha: f64,
    pub trend_threshold: f64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub sync_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
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
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub commerce_base_url: Option<String>,
    pub analytics_window_days: Option<u32>,
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
                url: "sqlite://saleslens.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            commerce: CommerceConfig {
                base_url: "https://connect.squareup.com".to_string(),
                api_version: "2024-10-17".to_string(),
                timeout_secs: 30,
                page_size: MAX_PAGE_SIZE,
                lookback_days: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 60,
            },
            analytics: AnalyticsConfig {
                window_days: 30,
                trend_days: 14,
                ema_alpha: 0.1,
                trend_threshold: 0.05,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                sync_interval_secs: 3600,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
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

impl AnalyticsConfig {
    pub fn settings(&self) -> AnalyticsSettings {
        AnalyticsSettings {
            window_days: self.window_days,
            trend: TrendSettings {
                observations: self.trend_days as usize,
                alpha: self.ema_alpha,
                threshold: self.trend_threshold,
            },
        }
    }
}

impl CommerceConfig {
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            lookback_days: i64::from(self.lookback_days),
            page_size: self.page_size,
            ..SyncSettings::default()
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("saleslens.toml"));
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

        if let Some(commerce) = patch.commerce {
            if let Some(base_url) = commerce.base_url {
                self.commerce.base_url = base_url;
            }
            if let Some(api_version) = commerce.api_version {
                self.commerce.api_version = api_version;
            }
            if let Some(timeout_secs) = commerce.timeout_secs {
                self.commerce.timeout_secs = timeout_secs;
            }
            if let Some(page_size) = commerce.page_size {
                self.commerce.page_size = page_size;
            }
            if let Some(lookback_days) = commerce.lookback_days {
                self.commerce.lookback_days = lookback_days;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(analytics) = patch.analytics {
            if let Some(window_days) = analytics.window_days {
                self.analytics.window_days = window_days;
            }
            if let Some(trend_days) = analytics.trend_days {
                self.analytics.trend_days = trend_days;
            }
            if let Some(ema_alpha) = analytics.ema_alpha {
                self.analytics.ema_alpha = ema_alpha;
            }
            if let Some(trend_threshold) = analytics.trend_threshold {
                self.analytics.trend_threshold = trend_threshold;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(sync_interval_secs) = server.sync_interval_secs {
                self.server.sync_interval_secs = sync_interval_secs;
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
        if let Some(value) = read_env("SALESLENS_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SALESLENS_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("SALESLENS_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SALESLENS_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("SALESLENS_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SALESLENS_COMMERCE_BASE_URL") {
            self.commerce.base_url = value;
        }
        if let Some(value) = read_env("SALESLENS_COMMERCE_API_VERSION") {
            self.commerce.api_version = value;
        }
        if let Some(value) = read_env("SALESLENS_COMMERCE_TIMEOUT_SECS") {
            self.commerce.timeout_secs = parse_u64("SALESLENS_COMMERCE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("SALESLENS_COMMERCE_PAGE_SIZE") {
            self.commerce.page_size = parse_u32("SALESLENS_COMMERCE_PAGE_SIZE", &value)?;
        }
        if let Some(value) = read_env("SALESLENS_COMMERCE_LOOKBACK_DAYS") {
            self.commerce.lookback_days = parse_u32("SALESLENS_COMMERCE_LOOKBACK_DAYS", &value)?;
        }

        if let Some(value) = read_env("SALESLENS_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("SALESLENS_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SALESLENS_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("SALESLENS_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("SALESLENS_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("SALESLENS_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SALESLENS_ANALYTICS_WINDOW_DAYS") {
            self.analytics.window_days = parse_u32("SALESLENS_ANALYTICS_WINDOW_DAYS", &value)?;
        }
        if let Some(value) = read_env("SALESLENS_ANALYTICS_TREND_DAYS") {
            self.analytics.trend_days = parse_u32("SALESLENS_ANALYTICS_TREND_DAYS", &value)?;
        }
        if let Some(value) = read_env("SALESLENS_ANALYTICS_EMA_ALPHA") {
            self.analytics.ema_alpha = parse_f64("SALESLENS_ANALYTICS_EMA_ALPHA", &value)?;
        }
        if let Some(value) = read_env("SALESLENS_ANALYTICS_TREND_THRESHOLD") {
            self.analytics.trend_threshold =
                parse_f64("SALESLENS_ANALYTICS_TREND_THRESHOLD", &value)?;
        }

        if let Some(value) = read_env("SALESLENS_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SALESLENS_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("SALESLENS_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("SALESLENS_SERVER_SYNC_INTERVAL_SECS") {
            self.server.sync_interval_secs =
                parse_u64("SALESLENS_SERVER_SYNC_INTERVAL_SECS", &value)?;
        }

        let log_level =
            read_env("SALESLENS_LOGGING_LEVEL").or_else(|| read_env("SALESLENS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SALESLENS_LOGGING_FORMAT").or_else(|| read_env("SALESLENS_LOG_FORMAT"));
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
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(commerce_base_url) = overrides.commerce_base_url {
            self.commerce.base_url = commerce_base_url;
        }
        if let Some(window_days) = overrides.analytics_window_days {
            self.analytics.window_days = window_days;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_commerce(&self.commerce)?;
        validate_llm(&self.llm)?;
        validate_analytics(&self.analytics)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("saleslens.toml"), PathBuf::from("config/saleslens.toml")]
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

fn validate_commerce(commerce: &CommerceConfig) -> Result<(), ConfigError> {
    let base_url = commerce.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "commerce.base_url must start with http:// or https://".to_string(),
        ));
    }

    if commerce.api_version.trim().is_empty() {
        return Err(ConfigError::Validation("commerce.api_version is required".to_string()));
    }

    if commerce.timeout_secs == 0 || commerce.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "commerce.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if commerce.page_size == 0 || commerce.page_size > MAX_PAGE_SIZE {
        return Err(ConfigError::Validation(format!(
            "commerce.page_size must be in range 1..={MAX_PAGE_SIZE}"
        )));
    }

    if commerce.lookback_days == 0 {
        return Err(ConfigError::Validation(
            "commerce.lookback_days must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model is required".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_analytics(analytics: &AnalyticsConfig) -> Result<(), ConfigError> {
    if analytics.window_days == 0 {
        return Err(ConfigError::Validation(
            "analytics.window_days must be greater than zero".to_string(),
        ));
    }

    if analytics.trend_days == 0 {
        return Err(ConfigError::Validation(
            "analytics.trend_days must be greater than zero".to_string(),
        ));
    }

    if !(analytics.ema_alpha > 0.0 && analytics.ema_alpha <= 1.0) {
        return Err(ConfigError::Validation(
            "analytics.ema_alpha must be in range (0, 1]".to_string(),
        ));
    }

    if !(analytics.trend_threshold >= 0.0) || !analytics.trend_threshold.is_finite() {
        return Err(ConfigError::Validation(
            "analytics.trend_threshold must be a non-negative number".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.sync_interval_secs < 60 {
        return Err(ConfigError::Validation(
            "server.sync_interval_secs must be at least 60".to_string(),
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

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    commerce: Option<CommercePatch>,
    llm: Option<LlmPatch>,
    analytics: Option<AnalyticsPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CommercePatch {
    base_url: Option<String>,
    api_version: Option<String>,
    timeout_secs: Option<u64>,
    page_size: Option<u32>,
    lookback_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AnalyticsPatch {
    window_days: Option<u32>,
    trend_days: Option<u32>,
    ema_alpha: Option<f64>,
    trend_threshold: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    sync_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
