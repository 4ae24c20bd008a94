use std::collections::HashMap;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use thiserror::Error;

use crate::clients::acuity_client::DEFAULT_BASE_URL;
use crate::models::session::DEFAULT_DB_LOCATION;

const DEFAULT_RUN_MODE: &str = "cli";
const DEFAULT_TIMEZONE: &str = "America/New_York";
const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 900;
const DEFAULT_RESYNC_LOOKAHEAD_DAYS: u64 = 14;
const DEFAULT_EVENT_BUFFER: usize = 64;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("could not read config file {path}: {reason}")]
    File { path: String, reason: String },
    #[error("invalid config line {line}: {content}")]
    Syntax { line: usize, content: String },
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Raw `KEY=VALUE` pairs from a dotenv-style file.
#[derive(Debug, Default, Clone)]
pub struct AppConfig {
    values: HashMap<String, String>,
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::Syntax {
                    line: idx + 1,
                    content: line.to_string(),
                });
            };
            let key = key.trim();
            let mut value = value.trim().to_string();
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = value[1..value.len() - 1].to_string();
            }
            values.insert(key.to_string(), value);
        }
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    /// File value first, then the process environment. Blank values count
    /// as unset.
    pub fn get_prop(&self, key: &str) -> Option<String> {
        self.get(key)
            .or_else(|| env::var(key).ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Api,
    Cli,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Supabase,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AcuitySettings {
    pub base_url: String,
    pub user_id: String,
    pub api_key: String,
    pub appointment_type_id: u64,
    pub calendar_id: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SupabaseSettings {
    pub url: String,
    pub service_key: String,
    pub sessions_table: String,
    pub profiles_table: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub run_mode: RunMode,
    pub bind_addr: SocketAddr,
    pub acuity: AcuitySettings,
    pub timezone: Tz,
    pub store: StoreKind,
    pub supabase: Option<SupabaseSettings>,
    pub db_location: PathBuf,
    pub webhook_token: Option<String>,
    /// `None` disables the resync loop.
    pub resync_interval: Option<Duration>,
    pub resync_lookahead_days: u64,
    pub event_buffer: usize,
}

impl Settings {
    pub fn load(config: &AppConfig) -> Result<Self, ConfigError> {
        let run_mode = match config
            .get_prop("RUN_MODE")
            .unwrap_or_else(|| DEFAULT_RUN_MODE.to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "api" => RunMode::Api,
            "cli" => RunMode::Cli,
            other => {
                return Err(ConfigError::Invalid {
                    key: "RUN_MODE",
                    value: other.to_string(),
                });
            }
        };

        let acuity = AcuitySettings {
            base_url: config
                .get_prop("ACUITY_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            user_id: required(config, "ACUITY_USER_ID")?,
            api_key: required(config, "ACUITY_API_KEY")?,
            appointment_type_id: parsed(config, "ACUITY_APPOINTMENT_TYPE_ID")?
                .ok_or(ConfigError::Missing("ACUITY_APPOINTMENT_TYPE_ID"))?,
            calendar_id: parsed(config, "ACUITY_CALENDAR_ID")?,
        };

        let timezone_name = config
            .get_prop("FIELD_TIMEZONE")
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone = timezone_name.parse::<Tz>().map_err(|_| ConfigError::Invalid {
            key: "FIELD_TIMEZONE",
            value: timezone_name.clone(),
        })?;

        let store = match config.get_prop("SESSION_STORE").as_deref() {
            None | Some("supabase") => StoreKind::Supabase,
            Some("memory") => StoreKind::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "SESSION_STORE",
                    value: other.to_string(),
                });
            }
        };

        let supabase = match (config.get_prop("SUPABASE_URL"), config.get_prop("SUPABASE_SERVICE_KEY")) {
            (Some(url), Some(service_key)) => Some(SupabaseSettings {
                url,
                service_key,
                sessions_table: config
                    .get_prop("SESSIONS_TABLE")
                    .unwrap_or_else(|| "sessions".to_string()),
                profiles_table: config
                    .get_prop("PROFILES_TABLE")
                    .unwrap_or_else(|| "profiles".to_string()),
            }),
            (None, _) if store == StoreKind::Supabase => {
                return Err(ConfigError::Missing("SUPABASE_URL"));
            }
            (Some(_), None) if store == StoreKind::Supabase => {
                return Err(ConfigError::Missing("SUPABASE_SERVICE_KEY"));
            }
            _ => None,
        };

        let resync_secs: u64 =
            parsed(config, "RESYNC_INTERVAL_SECS")?.unwrap_or(DEFAULT_RESYNC_INTERVAL_SECS);
        let resync_lookahead_days: u64 =
            parsed(config, "RESYNC_LOOKAHEAD_DAYS")?.unwrap_or(DEFAULT_RESYNC_LOOKAHEAD_DAYS);
        let event_buffer: usize = parsed(config, "EVENT_BUFFER")?.unwrap_or(DEFAULT_EVENT_BUFFER);
        if event_buffer == 0 {
            return Err(ConfigError::Invalid {
                key: "EVENT_BUFFER",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            run_mode,
            bind_addr: parsed(config, "BIND_ADDR")?
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080))),
            acuity,
            timezone,
            store,
            supabase,
            db_location: config
                .get_prop("DB_LOCATION")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_LOCATION)),
            webhook_token: config.get_prop("WEBHOOK_TOKEN"),
            resync_interval: (resync_secs > 0).then(|| Duration::from_secs(resync_secs)),
            resync_lookahead_days,
            event_buffer,
        })
    }
}

fn required(config: &AppConfig, key: &'static str) -> Result<String, ConfigError> {
    config.get_prop(key).ok_or(ConfigError::Missing(key))
}

fn parsed<T: FromStr>(config: &AppConfig, key: &'static str) -> Result<Option<T>, ConfigError> {
    match config.get_prop(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
