//! bcbot configuration loader.
//!
//! TOML file, then environment overrides, then validation.

use bc_core::Locale;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub inline: InlineConfig,
    #[serde(default)]
    pub announcements: AnnouncementsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub locale: LocaleConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_long_poll_timeout_secs")]
    pub long_poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            long_poll_timeout_secs: default_long_poll_timeout_secs(),
        }
    }
}

fn default_long_poll_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    #[default]
    Graphql,
    Memory,
}

impl std::str::FromStr for LedgerMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "graphql" => Ok(Self::Graphql),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!(
                "unsupported ledger mode {other:?}; expected graphql or memory"
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub mode: LedgerMode,
    #[serde(default)]
    pub api_url: String,
    #[serde(default = "default_ledger_timeout_secs")]
    pub timeout_secs: u64,
    /// Balance granted to accounts registered against the in-memory ledger.
    #[serde(default = "default_starting_balance")]
    pub starting_balance: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            mode: LedgerMode::default(),
            api_url: String::new(),
            timeout_secs: default_ledger_timeout_secs(),
            starting_balance: default_starting_balance(),
        }
    }
}

fn default_ledger_timeout_secs() -> u64 {
    10
}

fn default_starting_balance() -> u64 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct InlineConfig {
    #[serde(default = "default_cache_time_secs")]
    pub cache_time_secs: u32,
}

impl Default for InlineConfig {
    fn default() -> Self {
        Self {
            cache_time_secs: default_cache_time_secs(),
        }
    }
}

fn default_cache_time_secs() -> u32 {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnnouncementsConfig {
    /// "What's new" is shown on `/start` and after registration until this instant.
    #[serde(default, deserialize_with = "deserialize_instant")]
    pub what_is_new_until: Option<DateTime<Utc>>,
}

impl AnnouncementsConfig {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.what_is_new_until.is_some_and(|until| now <= until)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_enabled")]
    pub enabled: bool,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_server_enabled(),
            port: default_server_port(),
        }
    }
}

fn default_server_enabled() -> bool {
    true
}

fn default_server_port() -> u16 {
    8787
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocaleConfig {
    /// TOML file overriding the built-in English texts. Relative paths resolve
    /// against the config file's directory.
    #[serde(default)]
    pub path: Option<String>,
}

impl BotConfig {
    pub async fn load_with_path(path: Option<PathBuf>) -> anyhow::Result<(Self, PathBuf)> {
        let path = match path {
            Some(path) => path,
            None => default_config_path()?,
        };
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;

        let mut cfg: BotConfig = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?;

        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok((cfg, path))
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Some(v) = var("LEDGER_API_URL") {
            self.ledger.api_url = v;
        }
        if let Some(v) = var("LEDGER_MODE") {
            self.ledger.mode = v.parse()?;
        }
        if let Some(v) = var("INLINE_QUERY_CACHE_TIME") {
            self.inline.cache_time_secs = v
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("INLINE_QUERY_CACHE_TIME={v:?}: {e}"))?;
        }
        if let Some(v) = var("STOP_WHAT_IS_NEW") {
            self.announcements.what_is_new_until = Some(parse_instant(&v)?);
        }
        if let Some(v) = var("BCBOT_HEALTH_PORT") {
            self.server.port = v
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("BCBOT_HEALTH_PORT={v:?}: {e}"))?;
        }
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "telegram.bot_token is required (or set TELEGRAM_BOT_TOKEN)"
            ));
        }
        if self.telegram.long_poll_timeout_secs == 0 {
            return Err(anyhow::anyhow!("telegram.long_poll_timeout_secs must be > 0"));
        }
        if self.ledger.mode == LedgerMode::Graphql {
            if self.ledger.api_url.trim().is_empty() {
                return Err(anyhow::anyhow!(
                    "ledger.api_url is required in graphql mode (or set LEDGER_API_URL)"
                ));
            }
            if self.ledger.timeout_secs == 0 {
                return Err(anyhow::anyhow!("ledger.timeout_secs must be > 0"));
            }
        }
        if self.server.enabled && self.server.port == 0 {
            return Err(anyhow::anyhow!("server.port must be > 0"));
        }
        Ok(())
    }

    /// Built-in texts, overlaid with `locale.path` when set.
    pub async fn load_locale(&self, config_path: &Path) -> anyhow::Result<Locale> {
        let Some(raw) = self.locale.path.as_deref() else {
            return Ok(Locale::default());
        };
        let mut path = expand_home(raw)?;
        if path.is_relative() {
            if let Some(dir) = config_path.parent() {
                path = dir.join(path);
            }
        }
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow::anyhow!("read locale {}: {e}", path.display()))?;
        toml::from_str(&contents).map_err(|e| anyhow::anyhow!("parse locale {}: {e}", path.display()))
    }
}

/// RFC 3339, or `YYYY-MM-DD HH:MM:SS` taken as UTC.
fn parse_instant(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| anyhow::anyhow!("invalid timestamp {raw:?}: {e}"))
}

fn deserialize_instant<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|raw| parse_instant(&raw).map_err(serde::de::Error::custom))
        .transpose()
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME is not set"))?;
    Ok(Path::new(&home).join(".bcbot").join("config.toml"))
}

fn expand_home(path: &str) -> anyhow::Result<PathBuf> {
    let trimmed = path.trim();
    let Some(rest) = trimmed.strip_prefix("~/") else {
        return Ok(PathBuf::from(trimmed));
    };
    let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME is not set"))?;
    Ok(Path::new(&home).join(rest))
}

#[cfg(test)]
mod tests {
    use super::{BotConfig, LedgerMode, parse_instant};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;

    fn parse(toml_text: &str) -> BotConfig {
        toml::from_str(toml_text).expect("parse config")
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse(
            r#"
            [telegram]
            bot_token = "123:abc"

            [ledger]
            api_url = "https://bank.example/api"
            "#,
        );
        assert_eq!(cfg.ledger.mode, LedgerMode::Graphql);
        assert_eq!(cfg.telegram.long_poll_timeout_secs, 30);
        assert_eq!(cfg.inline.cache_time_secs, 1);
        assert!(cfg.server.enabled);
        assert!(cfg.announcements.what_is_new_until.is_none());
        cfg.validate().expect("valid");
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut cfg = parse(
            r#"
            [telegram]
            bot_token = "file-token"
            [ledger]
            mode = "graphql"
            api_url = "https://file.example"
            "#,
        );
        cfg.apply_overrides(env(&[
            ("TELEGRAM_BOT_TOKEN", "env-token"),
            ("LEDGER_MODE", "memory"),
            ("INLINE_QUERY_CACHE_TIME", "0"),
            ("STOP_WHAT_IS_NEW", "2030-01-01 00:00:00"),
            ("BCBOT_HEALTH_PORT", "9000"),
            ("LEDGER_API_URL", "  "),
        ]))
        .expect("overrides apply");

        assert_eq!(cfg.telegram.bot_token, "env-token");
        assert_eq!(cfg.ledger.mode, LedgerMode::Memory);
        assert_eq!(cfg.ledger.api_url, "https://file.example");
        assert_eq!(cfg.inline.cache_time_secs, 0);
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(
            cfg.announcements.what_is_new_until,
            Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn bad_env_values_are_errors() {
        let mut cfg = BotConfig::default();
        assert!(cfg.apply_overrides(env(&[("LEDGER_MODE", "sqlite")])).is_err());
        assert!(
            cfg.apply_overrides(env(&[("INLINE_QUERY_CACHE_TIME", "soon")]))
                .is_err()
        );
        assert!(cfg.apply_overrides(env(&[("STOP_WHAT_IS_NEW", "tomorrow")])).is_err());
    }

    #[test]
    fn validation_requires_token_and_graphql_url() {
        let mut cfg = BotConfig::default();
        assert!(cfg.validate().is_err());

        cfg.telegram.bot_token = "123:abc".to_string();
        assert!(cfg.validate().is_err(), "graphql mode needs api_url");

        cfg.ledger.mode = LedgerMode::Memory;
        cfg.validate().expect("memory mode needs no api_url");
    }

    #[test]
    fn announcement_window_is_inclusive() {
        let cfg = parse(
            r#"
            [announcements]
            what_is_new_until = "2024-05-01T12:00:00Z"
            "#,
        );
        let until = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert!(cfg.announcements.is_active(until));
        assert!(!cfg.announcements.is_active(until + chrono::Duration::seconds(1)));
        assert!(!BotConfig::default().announcements.is_active(until));
    }

    #[test]
    fn instants_accept_rfc3339_offsets() {
        let parsed = parse_instant("2024-05-01T14:00:00+02:00").expect("parse");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn locale_override_is_resolved_next_to_config() {
        let dir = std::env::temp_dir().join(format!("bcbot-locale-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.expect("mkdir");
        tokio::fs::write(dir.join("ru.toml"), "[messages]\nping = \"понг\"\n")
            .await
            .expect("write locale");

        let mut cfg = BotConfig::default();
        cfg.locale.path = Some("ru.toml".to_string());
        let locale = cfg
            .load_locale(&dir.join("config.toml"))
            .await
            .expect("load locale");
        assert_eq!(locale.messages.ping, "понг");
        assert_eq!(locale.messages.help, bc_core::Locale::default().messages.help);

        cfg.locale.path = Some("missing.toml".to_string());
        assert!(cfg.load_locale(&dir.join("config.toml")).await.is_err());

        let _ = std::fs::remove_dir_all(dir);
    }
}
