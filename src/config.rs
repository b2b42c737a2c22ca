//! Configuration loader and validator for the course marketplace core.
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pricing::SubscriptionPrices;
use crate::schedule::{parse_time_hm, ExpandOptions, MAX_DURATION_MINUTES};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub schedule: Schedule,
    pub pricing: PricingConfig,
    #[serde(default)]
    pub community: Community,
    #[serde(default)]
    pub invite: Invite,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Calendar settings. Times are wall-clock in `utc_offset_minutes`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schedule {
    pub utc_offset_minutes: i32,
    pub upcoming_limit: usize,
    pub default_duration_minutes: i64,
    pub default_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PricingConfig {
    pub subscription_monthly_krw: i64,
    pub subscription_yearly_krw: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Community {
    #[serde(default)]
    pub admin_emails: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Invite {
    pub code_length: usize,
}

impl Default for Invite {
    fn default() -> Self {
        Self { code_length: 8 }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// `DATABASE_URL` wins; otherwise a file under the data directory.
    pub fn database_url(&self) -> String {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                return url;
            }
        }
        let path = PathBuf::from(&self.app.data_dir).join("coursehub.db");
        format!("sqlite://{}", path.display())
    }

    pub fn utc_offset(&self) -> FixedOffset {
        // Range is checked by `validate`.
        FixedOffset::east_opt(self.schedule.utc_offset_minutes * 60)
            .unwrap_or_else(|| ExpandOptions::default().offset)
    }

    pub fn expand_options(&self) -> ExpandOptions {
        let defaults = ExpandOptions::default();
        ExpandOptions {
            offset: self.utc_offset(),
            default_duration_minutes: self.schedule.default_duration_minutes,
            default_time: parse_time_hm(&self.schedule.default_time).unwrap_or(defaults.default_time),
        }
    }

    pub fn subscription_prices(&self) -> SubscriptionPrices {
        SubscriptionPrices {
            monthly: self.pricing.subscription_monthly_krw,
            yearly: self.pricing.subscription_yearly_krw,
        }
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim();
        !email.is_empty()
            && self
                .community
                .admin_emails
                .iter()
                .any(|a| a.trim().eq_ignore_ascii_case(email))
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    // Real-world offsets stay within ±14h.
    if cfg.schedule.utc_offset_minutes.abs() > 14 * 60 {
        return Err(ConfigError::Invalid("schedule.utc_offset_minutes must be within ±840"));
    }
    if cfg.schedule.upcoming_limit == 0 {
        return Err(ConfigError::Invalid("schedule.upcoming_limit must be > 0"));
    }
    if !(1..=MAX_DURATION_MINUTES).contains(&cfg.schedule.default_duration_minutes) {
        return Err(ConfigError::Invalid(
            "schedule.default_duration_minutes must be within 1..=1440",
        ));
    }
    if parse_time_hm(&cfg.schedule.default_time).is_none() {
        return Err(ConfigError::Invalid("schedule.default_time must be HH:MM"));
    }

    if cfg.pricing.subscription_monthly_krw <= 0 {
        return Err(ConfigError::Invalid("pricing.subscription_monthly_krw must be > 0"));
    }
    if cfg.pricing.subscription_yearly_krw <= 0 {
        return Err(ConfigError::Invalid("pricing.subscription_yearly_krw must be > 0"));
    }

    if !(4..=32).contains(&cfg.invite.code_length) {
        return Err(ConfigError::Invalid("invite.code_length must be between 4 and 32"));
    }

    Ok(())
}

/// Returns the example YAML content shipped as `config.yaml`.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

schedule:
  # KST
  utc_offset_minutes: 540
  upcoming_limit: 7
  default_duration_minutes: 60
  default_time: "19:00"

pricing:
  subscription_monthly_krw: 99000
  subscription_yearly_krw: 890000

community:
  admin_emails:
    - "admin@example.com"

invite:
  code_length: 8
"#
}
