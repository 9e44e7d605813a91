use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use tickety_core::config::{AppConfig, LoadOptions};
use toml::Value;

const CONFIG_FILE_CANDIDATES: [&str; 2] = ["tickety.toml", "config/tickety.toml"];

struct Entry {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = detect_config_path();
    let file_doc = load_config_file_doc(file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(&config) {
        let source = field_source(&entry, file_doc.as_ref(), file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", entry.key, entry.value));
    }
    lines.join("\n")
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    vec![
        Entry {
            key: "database.url",
            env_keys: &["TICKETY_DATABASE_URL"],
            value: config.database.url.clone(),
        },
        Entry {
            key: "database.max_connections",
            env_keys: &["TICKETY_DATABASE_MAX_CONNECTIONS"],
            value: config.database.max_connections.to_string(),
        },
        Entry {
            key: "database.timeout_secs",
            env_keys: &["TICKETY_DATABASE_TIMEOUT_SECS"],
            value: config.database.timeout_secs.to_string(),
        },
        Entry {
            key: "discord.bot_token",
            env_keys: &["TICKETY_DISCORD_BOT_TOKEN"],
            value: redact_token(config.discord.bot_token.expose_secret()),
        },
        Entry {
            key: "discord.default_prefix",
            env_keys: &["TICKETY_DISCORD_DEFAULT_PREFIX"],
            value: config.discord.default_prefix.clone(),
        },
        Entry {
            key: "wizard.timeout_secs",
            env_keys: &["TICKETY_WIZARD_TIMEOUT_SECS"],
            value: config.wizard.timeout_secs.to_string(),
        },
        Entry {
            key: "wizard.sweep_interval_secs",
            env_keys: &["TICKETY_WIZARD_SWEEP_INTERVAL_SECS"],
            value: config.wizard.sweep_interval_secs.to_string(),
        },
        Entry {
            key: "server.bind_address",
            env_keys: &["TICKETY_SERVER_BIND_ADDRESS"],
            value: config.server.bind_address.clone(),
        },
        Entry {
            key: "server.health_check_port",
            env_keys: &["TICKETY_SERVER_HEALTH_CHECK_PORT"],
            value: config.server.health_check_port.to_string(),
        },
        Entry {
            key: "server.graceful_shutdown_secs",
            env_keys: &["TICKETY_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            value: config.server.graceful_shutdown_secs.to_string(),
        },
        Entry {
            key: "logging.level",
            env_keys: &["TICKETY_LOGGING_LEVEL", "TICKETY_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Entry {
            key: "logging.format",
            env_keys: &["TICKETY_LOGGING_FORMAT", "TICKETY_LOG_FORMAT"],
            value: format!("{:?}", config.logging.format),
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    CONFIG_FILE_CANDIDATES.iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(entry: &Entry, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    if let Some(env_key) = entry.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if file_doc.is_some_and(|doc| contains_path(doc, entry.key)) {
        let file_path = file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
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

/// Keeps the first token segment (the encoded bot id) and hides the rest.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once('.') {
        Some((bot_id_segment, _)) => format!("{bot_id_segment}.***"),
        None => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_token};

    #[test]
    fn tokens_only_show_their_first_segment() {
        assert_eq!(redact_token("MTIz.abc.def"), "MTIz.***");
        assert_eq!(redact_token("opaque"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn nested_keys_are_found_in_the_config_document() {
        let doc = "[wizard]\ntimeout_secs = 120\n".parse::<Value>().expect("toml");
        assert!(contains_path(&doc, "wizard.timeout_secs"));
        assert!(!contains_path(&doc, "wizard.sweep_interval_secs"));
    }
}
