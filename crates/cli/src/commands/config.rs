use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use saleslens_core::config::AppConfig;
use toml::Value;

pub fn run(config: &AppConfig, explicit_path: Option<&Path>) -> String {
    let config_file_path = detect_config_path(explicit_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let secret_state = |present: bool| if present { "<redacted>" } else { "<unset>" };
    let entries: Vec<(&str, String, &str)> = vec![
        ("database.url", config.database.url.clone(), "SALESLENS_DATABASE_URL"),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            "SALESLENS_DATABASE_MAX_CONNECTIONS",
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "SALESLENS_DATABASE_TIMEOUT_SECS",
        ),
        ("commerce.base_url", config.commerce.base_url.clone(), "SALESLENS_COMMERCE_BASE_URL"),
        (
            "commerce.api_version",
            config.commerce.api_version.clone(),
            "SALESLENS_COMMERCE_API_VERSION",
        ),
        (
            "commerce.page_size",
            config.commerce.page_size.to_string(),
            "SALESLENS_COMMERCE_PAGE_SIZE",
        ),
        (
            "commerce.lookback_days",
            config.commerce.lookback_days.to_string(),
            "SALESLENS_COMMERCE_LOOKBACK_DAYS",
        ),
        ("llm.provider", config.llm.provider.as_str().to_string(), "SALESLENS_LLM_PROVIDER"),
        ("llm.model", config.llm.model.clone(), "SALESLENS_LLM_MODEL"),
        (
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            "SALESLENS_LLM_BASE_URL",
        ),
        (
            "llm.api_key",
            secret_state(config.llm.api_key.is_some()).to_string(),
            "SALESLENS_LLM_API_KEY",
        ),
        (
            "analytics.window_days",
            config.analytics.window_days.to_string(),
            "SALESLENS_ANALYTICS_WINDOW_DAYS",
        ),
        (
            "analytics.trend_days",
            config.analytics.trend_days.to_string(),
            "SALESLENS_ANALYTICS_TREND_DAYS",
        ),
        (
            "analytics.ema_alpha",
            config.analytics.ema_alpha.to_string(),
            "SALESLENS_ANALYTICS_EMA_ALPHA",
        ),
        (
            "analytics.trend_threshold",
            config.analytics.trend_threshold.to_string(),
            "SALESLENS_ANALYTICS_TREND_THRESHOLD",
        ),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            "SALESLENS_SERVER_BIND_ADDRESS",
        ),
        (
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            "SALESLENS_SERVER_HEALTH_CHECK_PORT",
        ),
        (
            "server.sync_interval_secs",
            config.server.sync_interval_secs.to_string(),
            "SALESLENS_SERVER_SYNC_INTERVAL_SECS",
        ),
        ("logging.level", config.logging.level.clone(), "SALESLENS_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "SALESLENS_LOGGING_FORMAT"),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in entries {
        let source =
            field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }
    lines.join("\n")
}

fn detect_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("saleslens.toml"), PathBuf::from("config/saleslens.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
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
