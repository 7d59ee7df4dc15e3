use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::AppError;

/// Base config file used when `RANAP_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// `.env` file next to the base config, loaded before the process environment.
pub const DEFAULT_ENV_PATH: &str = "config/.env";

const DEFAULT_DB_PORT: u16 = 3306;
const DEFAULT_POOL_SIZE: u32 = 5;
const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_WHATSAPP_API_URL: &str = "https://api.kirimi.id/v1/send-message";
const DEFAULT_WHATSAPP_TIMEOUT_SECS: u64 = 15;
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 10;
const DEFAULT_APP_NAME: &str = "Hospital Notification Monitor";

/// Resolved application settings.
///
/// Values come from a TOML base file, then `config/.env`, then the process
/// environment. Environment variables always win over the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub telegram: TelegramSettings,
    pub whatsapp: WhatsAppSettings,
    pub app: AppSettings,
}

/// MySQL connection settings for the hospital database.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Maximum number of pooled connections (default: 5)
    pub pool_size: u32,
}

/// Telegram Bot API settings (primary channel).
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub enabled: bool,
    /// Base URL of the Bot API, without the `/bot<token>` suffix
    pub api_base: String,
}

/// WhatsApp gateway settings (secondary channel).
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct WhatsAppSettings {
    pub api_url: String,
    pub user_code: Option<String>,
    pub secret: Option<String>,
    pub device_id: Option<String>,
    pub enabled: bool,
    /// Request timeout in seconds (default: 15)
    pub timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Seconds between queue checks (default: 10)
    pub check_interval: u64,
    pub name: String,
    /// Closing line of WhatsApp messages. Derived from `name` when unset.
    pub footer: Option<String>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_DB_PORT,
            user: String::new(),
            password: String::new(),
            database: String::new(),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            enabled: true,
            api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
        }
    }
}

impl Default for WhatsAppSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_WHATSAPP_API_URL.to_string(),
            user_code: None,
            secret: None,
            device_id: None,
            enabled: true,
            timeout: DEFAULT_WHATSAPP_TIMEOUT_SECS,
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL_SECS,
            name: DEFAULT_APP_NAME.to_string(),
            footer: None,
        }
    }
}

impl WhatsAppSettings {
    pub fn has_credentials(&self) -> bool {
        [&self.user_code, &self.secret, &self.device_id]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

impl AppSettings {
    pub fn footer_text(&self) -> String {
        self.footer
            .clone()
            .unwrap_or_else(|| format!("Notifikasi otomatis {}", self.name))
    }
}

impl Settings {
    /// Load settings from `RANAP_CONFIG` (or [`DEFAULT_CONFIG_PATH`]) and the
    /// process environment.
    pub fn load() -> Result<Self, AppError> {
        dotenvy::from_path(DEFAULT_ENV_PATH).ok();
        dotenvy::dotenv().ok();

        let path = std::env::var("RANAP_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        Self::load_from(&path, |key| std::env::var(key).ok())
    }

    /// Load settings from `path`, resolving overrides through `env`.
    pub fn load_from<F>(path: &Path, env: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = std::fs::read_to_string(path).map_err(|source| AppError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut settings = Self::from_toml(&raw)?;
        settings.apply_overrides(env)?;
        settings.finalize()?;

        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(settings)
    }

    pub fn from_toml(raw: &str) -> Result<Self, AppError> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply environment overrides. Unset and empty variables are ignored.
    pub fn apply_overrides<F>(&mut self, env: F) -> Result<(), AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("DB_HOST") {
            self.database.host = v;
        }
        if let Some(v) = var("DB_PORT") {
            self.database.port = parse_var("DB_PORT", &v, "u16")?;
        }
        if let Some(v) = var("DB_USER") {
            self.database.user = v;
        }
        if let Some(v) = var("DB_PASSWORD") {
            self.database.password = v;
        }
        if let Some(v) = var("DB_NAME") {
            self.database.database = v;
        }
        if let Some(v) = var("DB_POOL_SIZE") {
            self.database.pool_size = parse_var("DB_POOL_SIZE", &v, "u32")?;
        }

        if let Some(v) = var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Some(v) = var("TELEGRAM_ENABLED") {
            self.telegram.enabled = parse_flag(&v);
        }
        if let Some(v) = var("TELEGRAM_API_BASE") {
            self.telegram.api_base = v;
        }

        if let Some(v) = var("WHATSAPP_API_URL") {
            self.whatsapp.api_url = v;
        }
        if let Some(v) = var("WHATSAPP_USER_CODE") {
            self.whatsapp.user_code = Some(v);
        }
        if let Some(v) = var("WHATSAPP_SECRET") {
            self.whatsapp.secret = Some(v);
        }
        if let Some(v) = var("WHATSAPP_DEVICE_ID") {
            self.whatsapp.device_id = Some(v);
        }
        if let Some(v) = var("WHATSAPP_ENABLED") {
            self.whatsapp.enabled = parse_flag(&v);
        }
        if let Some(v) = var("WHATSAPP_TIMEOUT") {
            self.whatsapp.timeout = parse_var("WHATSAPP_TIMEOUT", &v, "u64")?;
        }

        if let Some(v) = var("CHECK_INTERVAL") {
            self.app.check_interval = parse_var("CHECK_INTERVAL", &v, "u64")?;
        }

        Ok(())
    }

    /// Validate required values and disable channels that lack credentials.
    pub fn finalize(&mut self) -> Result<(), AppError> {
        for (field, value) in [
            ("database.host", &self.database.host),
            ("database.user", &self.database.user),
            ("database.database", &self.database.database),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::config(format!("{} is required", field)));
            }
        }

        if self.database.pool_size == 0 {
            return Err(AppError::config("database.pool_size must be at least 1"));
        }
        if self.app.check_interval == 0 {
            return Err(AppError::config("app.check_interval must be at least 1"));
        }
        if self.whatsapp.timeout == 0 {
            return Err(AppError::config("whatsapp.timeout must be at least 1"));
        }

        if self.whatsapp.enabled && !self.whatsapp.has_credentials() {
            tracing::warn!("WhatsApp credentials not configured, disabling WhatsApp channel");
            self.whatsapp.enabled = false;
        }

        if self.telegram.enabled && self.telegram.bot_token.trim().is_empty() {
            tracing::warn!("Telegram bot token not configured, disabling Telegram channel");
            self.telegram.enabled = false;
        }

        Ok(())
    }

    /// Human-readable summary with secrets masked.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("app.name: {}", self.app.name),
            format!("app.check_interval: {}s", self.app.check_interval),
            format!(
                "database: {}@{}:{}/{} (pool_size {})",
                self.database.user,
                self.database.host,
                self.database.port,
                self.database.database,
                self.database.pool_size
            ),
            format!("telegram.enabled: {}", self.telegram.enabled),
            format!(
                "telegram.bot_token: {}",
                mask_tail(&self.telegram.bot_token)
            ),
            format!("whatsapp.enabled: {}", self.whatsapp.enabled),
            format!("whatsapp.api_url: {}", self.whatsapp.api_url),
        ];
        lines.push(format!(
            "whatsapp.user_code: {}",
            self.whatsapp.user_code.as_deref().unwrap_or("not set")
        ));
        lines.push(format!(
            "whatsapp.device_id: {}",
            self.whatsapp.device_id.as_deref().unwrap_or("not set")
        ));
        lines.push(format!(
            "whatsapp.secret: {}",
            self.whatsapp
                .secret
                .as_deref()
                .map(mask_tail)
                .unwrap_or_else(|| "not set".to_string())
        ));
        lines.push(format!("whatsapp.timeout: {}s", self.whatsapp.timeout));
        lines.join("\n")
    }
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

impl std::fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("bot_token", &mask_tail(&self.bot_token))
            .field("enabled", &self.enabled)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl std::fmt::Debug for WhatsAppSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppSettings")
            .field("api_url", &self.api_url)
            .field("user_code", &self.user_code)
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .field("device_id", &self.device_id)
            .field("enabled", &self.enabled)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str, expected: &str) -> Result<T, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::config(format!("{} must be a valid {}", key, expected)))
}

fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Keep only the last four characters of a secret.
fn mask_tail(secret: &str) -> String {
    if secret.is_empty() {
        return "not set".to_string();
    }
    let chars: Vec<char> = secret.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("***{}", tail)
}
