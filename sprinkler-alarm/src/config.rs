//! Agent configuration.
//!
//! Defaults match the field installation. Every field can be overridden
//! from the environment with a `SPRINKLER_` variable, which is how the
//! systemd unit on the device passes contacts and credentials.

use std::path::PathBuf;
use std::time::Duration;

use time::UtcOffset;

use crate::clock::parse_utc_offset;
use crate::escalation::{Contact, EscalationPlan};

const ENV_PREFIX: &str = "SPRINKLER_";

/// Configuration problems found while loading or validating.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?}: {reason}")]
    Parse {
        key: String,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Invalid(String),
}

/// GPIO line assignment (BCM numbering).
#[derive(Debug, Clone)]
pub struct PinConfig {
    pub red_led: u8,
    pub yellow_led: u8,
    pub button: u8,
    /// Root of the sysfs GPIO tree.
    pub sysfs_root: PathBuf,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            red_led: 18,
            yellow_led: 4,
            button: 17,
            sysfs_root: PathBuf::from("/sys/class/gpio"),
        }
    }
}

/// Timing of the poll loop, button debounce and exit blink.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Delay between poll ticks.
    pub poll_interval: Duration,

    /// Settle delay applied before acting on the button, on both the edge
    /// and the release-check side.
    pub settle_delay: Duration,

    /// Edges closer together than this are switch bounce.
    pub edge_debounce: Duration,

    /// How often the edge source samples the button line.
    pub edge_sample_interval: Duration,

    /// Number of on/off cycles in the exit blink.
    pub exit_blinks: u32,

    /// Duration of each on and each off phase of the exit blink.
    pub exit_blink_half_period: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            settle_delay: Duration::from_millis(10),
            edge_debounce: Duration::from_millis(300),
            edge_sample_interval: Duration::from_millis(5),
            exit_blinks: 6,
            exit_blink_half_period: Duration::from_millis(500),
        }
    }
}

/// Credentials for the SMS gateway.
#[derive(Clone)]
pub struct SmsConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Sending number, E.164.
    pub from: String,
    pub api_base: String,
}

impl std::fmt::Debug for SmsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmsConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .field("from", &self.from)
            .field("api_base", &self.api_base)
            .finish()
    }
}

pub const DEFAULT_SMS_API_BASE: &str = "https://api.twilio.com";

/// How the host is powered down at the end of a session.
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Program and arguments.
    pub command: Vec<String>,
    /// Log instead of running the command.
    pub dry_run: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            command: vec!["shutdown".into(), "-h".into(), "now".into()],
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub pins: PinConfig,
    pub timing: TimingConfig,
    pub escalation: EscalationPlan,
    /// Offset used for message timestamps. `None` means the host's local
    /// offset.
    pub utc_offset: Option<UtcOffset>,
    /// Without credentials notifications are only logged.
    pub sms: Option<SmsConfig>,
    pub shutdown: ShutdownConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pins: PinConfig::default(),
            timing: TimingConfig::default(),
            escalation: EscalationPlan::default(),
            utc_offset: None,
            sms: None,
            shutdown: ShutdownConfig::default(),
        }
    }
}

impl Config {
    /// Load from the process environment on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve fully-prefixed variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let mut config = Config::default();

        env.parse("RED_PIN", &mut config.pins.red_led)?;
        env.parse("YELLOW_PIN", &mut config.pins.yellow_led)?;
        env.parse("BUTTON_PIN", &mut config.pins.button)?;
        if let Some(root) = env.get("GPIO_ROOT") {
            config.pins.sysfs_root = PathBuf::from(root);
        }

        env.millis("POLL_MS", &mut config.timing.poll_interval)?;
        env.millis("SETTLE_MS", &mut config.timing.settle_delay)?;
        env.millis("DEBOUNCE_MS", &mut config.timing.edge_debounce)?;
        env.millis("EDGE_SAMPLE_MS", &mut config.timing.edge_sample_interval)?;
        env.parse("EXIT_BLINKS", &mut config.timing.exit_blinks)?;
        env.millis("EXIT_BLINK_MS", &mut config.timing.exit_blink_half_period)?;

        let plan = &mut config.escalation;
        env.parse("SECOND_AFTER_SECS", &mut plan.second_after_secs)?;
        env.parse("THIRD_AFTER_SECS", &mut plan.third_after_secs)?;
        env.parse("RECURRING_AFTER_SECS", &mut plan.recurring_after_secs)?;
        env.parse("RECURRING_PERIOD_SECS", &mut plan.recurring_period_secs)?;
        if let Some(prefix) = env.get("MESSAGE_PREFIX") {
            plan.message_prefix = prefix;
        }
        if let Some(raw) = env.get("PRIMARY_CONTACTS") {
            plan.primary = parse_contacts(&raw);
        }
        if let Some(raw) = env.get("SECONDARY_CONTACTS") {
            plan.secondary = parse_contacts(&raw);
        }

        if let Some(raw) = env.get("UTC_OFFSET") {
            let offset = parse_utc_offset(&raw).map_err(|e| ConfigError::Parse {
                key: env_key("UTC_OFFSET"),
                value: raw.clone(),
                reason: e.to_string(),
            })?;
            config.utc_offset = Some(offset);
        }

        if let (Some(account_sid), Some(auth_token), Some(from)) = (
            env.get("SMS_ACCOUNT_SID"),
            env.get("SMS_AUTH_TOKEN"),
            env.get("SMS_FROM"),
        ) {
            config.sms = Some(SmsConfig {
                account_sid,
                auth_token,
                from,
                api_base: env
                    .get("SMS_API_BASE")
                    .unwrap_or_else(|| DEFAULT_SMS_API_BASE.to_string()),
            });
        }

        if let Some(raw) = env.get("SHUTDOWN_COMMAND") {
            config.shutdown.command = raw.split_whitespace().map(String::from).collect();
        }
        env.parse("DRY_RUN", &mut config.shutdown.dry_run)?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timing.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("poll interval must be non-zero".into()));
        }
        if self.timing.edge_sample_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "edge sample interval must be non-zero".into(),
            ));
        }
        if self.shutdown.command.is_empty() && !self.shutdown.dry_run {
            return Err(ConfigError::Invalid("shutdown command is empty".into()));
        }
        self.escalation.validate()
    }
}

fn env_key(name: &str) -> String {
    format!("{ENV_PREFIX}{name}")
}

/// Comma-separated, blanks dropped, order kept.
fn parse_contacts(raw: &str) -> Vec<Contact> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Contact::new)
        .collect()
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(&env_key(name)).filter(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, name: &str, slot: &mut T) -> Result<(), ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        if let Some(raw) = self.get(name) {
            *slot = raw.trim().parse().map_err(|e: T::Err| ConfigError::Parse {
                key: env_key(name),
                value: raw.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn millis(&self, name: &str, slot: &mut Duration) -> Result<(), ConfigError> {
        let mut ms = slot.as_millis() as u64;
        self.parse(name, &mut ms)?;
        *slot = Duration::from_millis(ms);
        Ok(())
    }
}
