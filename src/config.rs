//! Configuration types.
//!
//! Everything is read from environment variables once at startup. A variable
//! that is set but cannot be parsed is an error, never a silent default.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use secrecy::SecretString;

use crate::channels::SmtpConfig;
use crate::error::ConfigError;
use crate::llm::{DEFAULT_MODEL, LlmConfig};
use crate::pipeline::processor::ProcessorSettings;
use crate::pipeline::runner::DEFAULT_RUN_INTERVAL_SECS;
use crate::pipeline::slots::SlotConfig;

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// JSON category registry file.
    pub categories_path: PathBuf,
    /// JSON message spool backing the in-memory mailbox.
    pub spool_path: Option<PathBuf>,
    pub processor: ProcessorSettings,
    /// Pause between runs in loop mode.
    pub run_interval: Duration,
    /// Process one batch and exit.
    pub run_once: bool,
    /// Directory for the daily-rolling log file.
    pub log_dir: Option<PathBuf>,
    /// LLM classifier; the keyword classifier is used when absent.
    pub llm: Option<LlmConfig>,
    /// Report email; the report is logged when absent.
    pub smtp: Option<SmtpConfig>,
}

impl RouterConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let categories_path = lookup("ROUTER_CATEGORIES_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "ROUTER_CATEGORIES_PATH".into(),
                hint: "Point it at the JSON category registry.".into(),
            })?;

        let start = time_var(&lookup, "ROUTER_CALENDAR_START", "09:00")?;
        let end = time_var(&lookup, "ROUTER_CALENDAR_END", "17:00")?;
        let slots = SlotConfig::new(
            start,
            end,
            parsed_var(&lookup, "ROUTER_SLOT_DURATION_MIN", 30)?,
            parsed_var(&lookup, "ROUTER_DEFAULT_DURATION_MIN", 60)?,
        )?;

        let processor = ProcessorSettings {
            max_messages: parsed_var(&lookup, "ROUTER_MAX_MESSAGES", 10)?,
            slots,
            timezone: tz_var(&lookup, "ROUTER_TIMEZONE")?,
            reminder_advance_minutes: parsed_var(&lookup, "ROUTER_REMINDER_ADVANCE_MIN", 45)?,
            default_color: string_var(&lookup, "ROUTER_DEFAULT_COLOR", "red").to_lowercase(),
        };

        let interval_secs: u64 =
            parsed_var(&lookup, "ROUTER_RUN_INTERVAL_SECS", DEFAULT_RUN_INTERVAL_SECS)?;
        if interval_secs == 0 {
            return Err(ConfigError::invalid(
                "ROUTER_RUN_INTERVAL_SECS",
                "must be greater than zero",
            ));
        }

        let llm = lookup("OPENAI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .map(|api_key| LlmConfig {
                api_key: SecretString::from(api_key),
                model: string_var(&lookup, "ROUTER_LLM_MODEL", DEFAULT_MODEL),
            });

        Ok(Self {
            categories_path,
            spool_path: path_var(&lookup, "ROUTER_SPOOL_PATH"),
            processor,
            run_interval: Duration::from_secs(interval_secs),
            run_once: bool_var(&lookup, "ROUTER_RUN_ONCE", false)?,
            log_dir: path_var(&lookup, "ROUTER_LOG_DIR"),
            llm,
            smtp: SmtpConfig::from_lookup(&lookup)?,
        })
    }
}

fn string_var<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn path_var<F>(lookup: &F, key: &str) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

fn parsed_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::invalid(key, format!("'{raw}': {e}"))),
    }
}

fn bool_var<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::invalid(key, format!("'{raw}' is not a boolean"))),
        },
    }
}

fn time_var<F>(lookup: &F, key: &str, default: &str) -> Result<NaiveTime, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    parse_hhmm(&raw).map_err(|e| ConfigError::invalid(key, e))
}

fn tz_var<F>(lookup: &F, key: &str) -> Result<Tz, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = string_var(lookup, key, "UTC");
    raw.parse()
        .map_err(|_| ConfigError::invalid(key, format!("unknown timezone '{raw}'")))
}

/// Parse a `HH:MM` time of day.
pub fn parse_hhmm(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| format!("'{raw}' is not a HH:MM time: {e}"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<RouterConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RouterConfig::from_lookup(move |key| map.get(key).cloned())
    }

    const REQUIRED: (&str, &str) = ("ROUTER_CATEGORIES_PATH", "categories.json");

    #[test]
    fn defaults_apply() {
        let config = load(&[REQUIRED]).unwrap();
        assert_eq!(config.categories_path, PathBuf::from("categories.json"));
        assert_eq!(config.processor.max_messages, 10);
        assert_eq!(config.processor.slots, SlotConfig::default());
        assert_eq!(config.processor.reminder_advance_minutes, 45);
        assert_eq!(config.processor.timezone, Tz::UTC);
        assert_eq!(config.processor.default_color, "red");
        assert_eq!(config.run_interval, Duration::from_secs(60));
        assert!(!config.run_once);
        assert!(config.llm.is_none());
        assert!(config.smtp.is_none());
        assert!(config.spool_path.is_none());
    }

    #[test]
    fn categories_path_is_required() {
        assert!(matches!(
            load(&[]),
            Err(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn unparsable_number_is_an_error() {
        let err = load(&[REQUIRED, ("ROUTER_MAX_MESSAGES", "ten")]).unwrap_err();
        assert!(err.to_string().contains("ROUTER_MAX_MESSAGES"));
    }

    #[test]
    fn negative_slot_duration_is_rejected() {
        assert!(load(&[REQUIRED, ("ROUTER_SLOT_DURATION_MIN", "-30")]).is_err());
    }

    #[test]
    fn window_must_be_ordered() {
        let err = load(&[
            REQUIRED,
            ("ROUTER_CALENDAR_START", "18:00"),
            ("ROUTER_CALENDAR_END", "09:00"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn zero_default_duration_is_rejected() {
        assert!(load(&[REQUIRED, ("ROUTER_DEFAULT_DURATION_MIN", "0")]).is_err());
    }

    #[test]
    fn shared_slot_mode_is_allowed() {
        let config = load(&[REQUIRED, ("ROUTER_SLOT_DURATION_MIN", "0")]).unwrap();
        assert!(config.processor.slots.is_shared_slot());
    }

    #[test]
    fn api_key_enables_llm() {
        let config = load(&[
            REQUIRED,
            ("OPENAI_API_KEY", "sk-test"),
            ("ROUTER_LLM_MODEL", "gpt-4o"),
        ])
        .unwrap();
        let llm = config.llm.unwrap();
        assert_eq!(llm.model, "gpt-4o");
    }

    #[test]
    fn run_once_accepts_common_spellings() {
        assert!(load(&[REQUIRED, ("ROUTER_RUN_ONCE", "yes")]).unwrap().run_once);
        assert!(!load(&[REQUIRED, ("ROUTER_RUN_ONCE", "0")]).unwrap().run_once);
        assert!(load(&[REQUIRED, ("ROUTER_RUN_ONCE", "maybe")]).is_err());
    }

    #[test]
    fn timezone_is_parsed() {
        let config = load(&[REQUIRED, ("ROUTER_TIMEZONE", "Asia/Kolkata")]).unwrap();
        assert_eq!(config.processor.timezone, chrono_tz::Asia::Kolkata);
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let err = load(&[REQUIRED, ("ROUTER_TIMEZONE", "Mars/Olympus")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "ROUTER_TIMEZONE"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(load(&[REQUIRED, ("ROUTER_RUN_INTERVAL_SECS", "0")]).is_err());
    }

    #[test]
    fn parses_hhmm() {
        assert_eq!(
            parse_hhmm(" 08:30 ").unwrap(),
            NaiveTime::from_hms_opt(8, 30, 0).unwrap()
        );
        assert!(parse_hhmm("8.30").is_err());
        assert!(parse_hhmm("25:00").is_err());
    }
}
