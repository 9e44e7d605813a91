use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::guild_config::DEFAULT_PREFIX;

pub const DEFAULT_CONFIG_FILE: &str = "tickety.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub discord: DiscordConfig,
    pub wizard: WizardConfig,
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
pub struct DiscordConfig {
    pub bot_token: SecretString,
    /// Prefix used by guilds that have not stored their own.
    pub default_prefix: String,
}

#[derive(Clone, Debug)]
pub struct WizardConfig {
    pub timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl WizardConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
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
    pub discord_bot_token: Option<String>,
    pub wizard_timeout_secs: Option<u64>,
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
                url: "sqlite://tickety.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            discord: DiscordConfig {
                bot_token: String::new().into(),
                default_prefix: DEFAULT_PREFIX.to_string(),
            },
            wizard: WizardConfig { timeout_secs: 300, sweep_interval_secs: 15 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
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
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
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

        if let Some(discord) = patch.discord {
            if let Some(bot_token_value) = discord.bot_token {
                self.discord.bot_token = secret_value(bot_token_value);
            }
            if let Some(default_prefix) = discord.default_prefix {
                self.discord.default_prefix = default_prefix;
            }
        }

        if let Some(wizard) = patch.wizard {
            if let Some(timeout_secs) = wizard.timeout_secs {
                self.wizard.timeout_secs = timeout_secs;
            }
            if let Some(sweep_interval_secs) = wizard.sweep_interval_secs {
                self.wizard.sweep_interval_secs = sweep_interval_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("TICKETY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TICKETY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("TICKETY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TICKETY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TICKETY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TICKETY_DISCORD_BOT_TOKEN") {
            self.discord.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("TICKETY_DISCORD_DEFAULT_PREFIX") {
            self.discord.default_prefix = value;
        }

        if let Some(value) = read_env("TICKETY_WIZARD_TIMEOUT_SECS") {
            self.wizard.timeout_secs = parse_u64("TICKETY_WIZARD_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TICKETY_WIZARD_SWEEP_INTERVAL_SECS") {
            self.wizard.sweep_interval_secs =
                parse_u64("TICKETY_WIZARD_SWEEP_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("TICKETY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TICKETY_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("TICKETY_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("TICKETY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TICKETY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("TICKETY_LOGGING_LEVEL").or_else(|| read_env("TICKETY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TICKETY_LOGGING_FORMAT").or_else(|| read_env("TICKETY_LOG_FORMAT"));
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
        if let Some(bot_token) = overrides.discord_bot_token {
            self.discord.bot_token = secret_value(bot_token);
        }
        if let Some(timeout_secs) = overrides.wizard_timeout_secs {
            self.wizard.timeout_secs = timeout_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_discord(&self.discord)?;
        validate_wizard(&self.wizard)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), Path::new("config").join(DEFAULT_CONFIG_FILE)]
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

fn validate_discord(discord: &DiscordConfig) -> Result<(), ConfigError> {
    let bot_token = discord.bot_token.expose_secret();
    if bot_token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "discord.bot_token is required. Get it from https://discord.com/developers/applications > Your App > Bot > Token".to_string(),
        ));
    }
    if bot_token.starts_with("Bot ") {
        return Err(ConfigError::Validation(
            "discord.bot_token must be the raw token without the `Bot ` prefix".to_string(),
        ));
    }
    if bot_token.chars().any(char::is_whitespace) || bot_token.split('.').count() != 3 {
        return Err(ConfigError::Validation(
            "discord.bot_token must be three dot-separated segments with no whitespace"
                .to_string(),
        ));
    }

    let prefix = discord.default_prefix.as_str();
    if prefix.is_empty() || prefix.chars().count() > 5 || prefix.chars().any(char::is_whitespace)
    {
        return Err(ConfigError::Validation(
            "discord.default_prefix must be 1..=5 characters without whitespace".to_string(),
        ));
    }

    Ok(())
}

fn validate_wizard(wizard: &WizardConfig) -> Result<(), ConfigError> {
    if !(30..=3600).contains(&wizard.timeout_secs) {
        return Err(ConfigError::Validation(
            "wizard.timeout_secs must be in range 30..=3600".to_string(),
        ));
    }

    if wizard.sweep_interval_secs == 0 || wizard.sweep_interval_secs > wizard.timeout_secs {
        return Err(ConfigError::Validation(
            "wizard.sweep_interval_secs must be greater than zero and at most wizard.timeout_secs"
                .to_string(),
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

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
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

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    discord: Option<DiscordPatch>,
    wizard: Option<WizardPatch>,
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
struct DiscordPatch {
    bot_token: Option<String>,
    default_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WizardPatch {
    timeout_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    const TOKEN: &str = "MTAxMjM0NTY3ODkw.GhIjKl.abcdefghijklmnopqrstuvwxyz0123456789";

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_DISCORD_BOT_TOKEN", TOKEN);

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("tickety.toml");
            fs::write(
                &path,
                r#"
[discord]
bot_token = "${TEST_DISCORD_BOT_TOKEN}"
default_prefix = "!"

[wizard]
timeout_secs = 600
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.discord.bot_token.expose_secret() == TOKEN,
                "bot token should be loaded from environment",
            )?;
            ensure(config.discord.default_prefix == "!", "prefix should come from the file")?;
            ensure(
                config.wizard.timeout() == Duration::from_secs(600),
                "wizard timeout should come from the file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_DISCORD_BOT_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TICKETY_DISCORD_BOT_TOKEN", TOKEN);
        env::set_var("TICKETY_LOG_LEVEL", "warn");
        env::set_var("TICKETY_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["TICKETY_DISCORD_BOT_TOKEN", "TICKETY_LOG_LEVEL", "TICKETY_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TICKETY_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("TICKETY_WIZARD_TIMEOUT_SECS", "120");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("tickety.toml");
            fs::write(
                &path,
                format!(
                    r#"
[database]
url = "sqlite://from-file.db"

[discord]
bot_token = "{TOKEN}"

[wizard]
timeout_secs = 900

[logging]
level = "warn"
"#
                ),
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.wizard.timeout_secs == 120, "env wizard timeout should win over file")?;
            ensure(
                config.discord.bot_token.expose_secret() == TOKEN,
                "file bot token should be used when env is absent",
            )?;
            Ok(())
        })();

        clear_vars(&["TICKETY_DATABASE_URL", "TICKETY_WIZARD_TIMEOUT_SECS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TICKETY_DISCORD_BOT_TOKEN", format!("Bot {TOKEN}"));

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("discord.bot_token")
            );
            ensure(has_message, "validation failure should mention discord.bot_token")
        })();

        clear_vars(&["TICKETY_DISCORD_BOT_TOKEN"]);
        result
    }

    #[test]
    fn wizard_timeout_outside_range_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TICKETY_DISCORD_BOT_TOKEN", TOKEN);

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    wizard_timeout_secs: Some(5),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            }) {
                Ok(_) => return Err("expected wizard timeout validation failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::Validation(ref message) if message.contains("wizard.timeout_secs")
                ),
                "validation failure should mention wizard.timeout_secs",
            )
        })();

        clear_vars(&["TICKETY_DISCORD_BOT_TOKEN"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TICKETY_DISCORD_BOT_TOKEN", TOKEN);

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains(TOKEN), "debug output should not contain the bot token")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            ensure(config.wizard.timeout_secs == 300, "default wizard timeout is five minutes")?;
            Ok(())
        })();

        clear_vars(&["TICKETY_DISCORD_BOT_TOKEN"]);
        result
    }
}
