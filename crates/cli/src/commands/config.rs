use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use attendly_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

/// One printed row: the dotted key, the env vars that can set it, and its
/// rendered (possibly redacted) value.
struct Field {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

impl Field {
    fn new(key_path: &'static str, env_keys: &'static [&'static str], value: impl Into<String>) -> Self {
        Self { key_path, env_keys, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let organization = &config.organization;
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    let signing_secret = if config.slack.signing_secret.expose_secret().trim().is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    };

    vec![
        Field::new("database.url", &["ATTENDLY_DATABASE_URL"], config.database.url.clone()),
        Field::new(
            "database.max_connections",
            &["ATTENDLY_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections.to_string(),
        ),
        Field::new(
            "database.timeout_secs",
            &["ATTENDLY_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs.to_string(),
        ),
        Field::new(
            "slack.bot_token",
            &["ATTENDLY_SLACK_BOT_TOKEN"],
            redact_token(config.slack.bot_token.expose_secret()),
        ),
        Field::new("slack.signing_secret", &["ATTENDLY_SLACK_SIGNING_SECRET"], signing_secret),
        Field::new(
            "slack.query_command",
            &["ATTENDLY_SLACK_QUERY_COMMAND"],
            config.slack.query_command.clone(),
        ),
        Field::new("llm.provider", &["ATTENDLY_LLM_PROVIDER"], format!("{:?}", config.llm.provider)),
        Field::new("llm.model", &["ATTENDLY_LLM_MODEL"], config.llm.model.clone()),
        Field::new(
            "llm.base_url",
            &["ATTENDLY_LLM_BASE_URL"],
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
        ),
        Field::new("llm.api_key", &["ATTENDLY_LLM_API_KEY", "OPENAI_API_KEY"], llm_api_key),
        Field::new(
            "llm.timeout_secs",
            &["ATTENDLY_LLM_TIMEOUT_SECS"],
            config.llm.timeout_secs.to_string(),
        ),
        Field::new(
            "organization.timezone_name",
            &["ATTENDLY_ORG_TIMEZONE_NAME"],
            organization.timezone_name.clone(),
        ),
        Field::new(
            "organization.utc_offset",
            &["ATTENDLY_ORG_UTC_OFFSET"],
            organization.utc_offset.to_string(),
        ),
        Field::new(
            "organization.max_advance_days",
            &["ATTENDLY_ORG_MAX_ADVANCE_DAYS"],
            organization.max_advance_days.to_string(),
        ),
        Field::new(
            "organization.workday_start",
            &["ATTENDLY_ORG_WORKDAY_START"],
            organization.workday_start.format("%H:%M").to_string(),
        ),
        Field::new(
            "organization.workday_end",
            &["ATTENDLY_ORG_WORKDAY_END"],
            organization.workday_end.format("%H:%M").to_string(),
        ),
        Field::new(
            "server.bind_address",
            &["ATTENDLY_SERVER_BIND_ADDRESS"],
            config.server.bind_address.clone(),
        ),
        Field::new("server.port", &["ATTENDLY_SERVER_PORT"], config.server.port.to_string()),
        Field::new(
            "server.worker_timeout_secs",
            &["ATTENDLY_SERVER_WORKER_TIMEOUT_SECS"],
            config.server.worker_timeout_secs.to_string(),
        ),
        Field::new(
            "server.graceful_shutdown_secs",
            &["ATTENDLY_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            config.server.graceful_shutdown_secs.to_string(),
        ),
        Field::new(
            "logging.level",
            &["ATTENDLY_LOGGING_LEVEL", "ATTENDLY_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        Field::new(
            "logging.format",
            &["ATTENDLY_LOGGING_FORMAT", "ATTENDLY_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("attendly.toml"), PathBuf::from("config/attendly.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
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

/// Keeps the `xoxb-` style prefix so operators can tell token kinds apart.
pub(crate) fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
