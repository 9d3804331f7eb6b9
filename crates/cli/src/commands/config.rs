use std::env;

use haggle_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line("database.url", &config.database.url, "HAGGLE_DATABASE_URL"));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        "HAGGLE_DATABASE_MAX_CONNECTIONS",
    ));
    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        "HAGGLE_SERVER_BIND_ADDRESS",
    ));
    lines.push(render_line("server.port", &config.server.port.to_string(), "HAGGLE_SERVER_PORT"));

    lines.push(render_line(
        "llm.provider",
        &format!("{:?}", config.llm.provider),
        "HAGGLE_LLM_PROVIDER",
    ));
    lines.push(render_line("llm.model", &config.llm.model, "HAGGLE_LLM_MODEL"));
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_secret(key.expose_secret()))
        .unwrap_or_else(|| "(unset)".to_string());
    lines.push(render_line("llm.api_key", &api_key, "HAGGLE_LLM_API_KEY"));

    lines.push(render_line(
        "negotiation.strategy",
        &format!("{:?}", config.negotiation.strategy),
        "HAGGLE_NEGOTIATION_STRATEGY",
    ));
    lines.push(render_line(
        "negotiation.round_cap",
        &config.negotiation.round_cap.to_string(),
        "HAGGLE_NEGOTIATION_ROUND_CAP",
    ));
    lines.push(render_line(
        "negotiation.counter_validity_minutes",
        &config.negotiation.counter_validity_minutes.to_string(),
        "HAGGLE_NEGOTIATION_COUNTER_VALIDITY_MINUTES",
    ));
    lines.push(render_line(
        "negotiation.session_ttl_days",
        &config.negotiation.session_ttl_days.to_string(),
        "HAGGLE_NEGOTIATION_SESSION_TTL_DAYS",
    ));
    lines.push(render_line(
        "negotiation.floor_ratio_percent",
        &config.negotiation.floor_ratio_percent.to_string(),
        "HAGGLE_NEGOTIATION_FLOOR_RATIO_PERCENT",
    ));

    lines.push(render_line("logging.level", &config.logging.level, "HAGGLE_LOGGING_LEVEL"));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        "HAGGLE_LOGGING_FORMAT",
    ));

    lines.join("\n")
}

fn render_line(key: &str, value: &str, env_var: &str) -> String {
    let source = if env::var(env_var).map(|value| !value.trim().is_empty()).unwrap_or(false) {
        format!("env:{env_var}")
    } else {
        "file/default".to_string()
    };
    format!("  {key} = {value} ({source})")
}

fn redact_secret(secret: &str) -> String {
    if secret.len() <= 6 {
        return "***".to_string();
    }
    format!("{}***", &secret[..6])
}
