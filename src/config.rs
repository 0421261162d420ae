//! Environment-driven configuration.
//!
//! Chat credentials are required — without a destination the relay has
//! nowhere to report anything, so startup aborts. Accounts are scanned from
//! `MAILGRAM_ACCOUNT_1_*` upward; a broken account entry is skipped with a
//! warning and only an empty account list is fatal.

use std::time::Duration;

use chrono_tz::Tz;
use secrecy::SecretString;

use crate::error::ConfigError;
use crate::pause::DEFAULT_PAUSE_DURATION_SECS;

/// Highest account index scanned from the environment.
const MAX_ACCOUNTS: u32 = 32;

/// One configured inbox account.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    pub name: String,
    pub imap_host: String,
    pub imap_port: u16,
    pub username: String,
    pub password: String,
    pub query: String,
}

/// Full relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub telegram_bot_token: SecretString,
    pub telegram_chat_id: String,
    pub poll_interval: Duration,
    pub pause_duration: chrono::Duration,
    pub display_tz: Tz,
    pub health_port: u16,
    pub accounts: Vec<AccountConfig>,
}

impl RelayConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let telegram_bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .map(SecretString::from)
            .map_err(|_| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()))?;
        let telegram_chat_id = std::env::var("TELEGRAM_CHAT_ID")
            .map_err(|_| ConfigError::MissingEnvVar("TELEGRAM_CHAT_ID".into()))?;

        let poll_interval = Duration::from_secs(
            std::env::var("MAILGRAM_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        );

        let pause_secs: i64 = std::env::var("MAILGRAM_PAUSE_DURATION_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PAUSE_DURATION_SECS);
        let pause_duration = chrono::Duration::seconds(pause_secs);

        let display_tz = parse_tz(std::env::var("MAILGRAM_DISPLAY_TZ").ok())?;

        let health_port: u16 = std::env::var("MAILGRAM_HEALTH_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);

        let mut accounts = Vec::new();
        for index in 1..=MAX_ACCOUNTS {
            let Ok(name) = std::env::var(format!("MAILGRAM_ACCOUNT_{index}_NAME")) else {
                continue;
            };
            match account_from_env(index, &name) {
                Ok(account) => accounts.push(account),
                Err(e) => {
                    // Fatal for this account only; the rest keep running.
                    tracing::warn!(account = %name, "Skipping account: {e}");
                }
            }
        }

        if accounts.is_empty() {
            return Err(ConfigError::NoAccounts);
        }

        Ok(Self {
            telegram_bot_token,
            telegram_chat_id,
            poll_interval,
            pause_duration,
            display_tz,
            health_port,
            accounts,
        })
    }
}

fn account_from_env(index: u32, name: &str) -> Result<AccountConfig, ConfigError> {
    let var = |suffix: &str| format!("MAILGRAM_ACCOUNT_{index}_{suffix}");
    let required = |suffix: &str| {
        std::env::var(var(suffix)).map_err(|_| ConfigError::MissingEnvVar(var(suffix)))
    };

    Ok(AccountConfig {
        name: name.to_string(),
        imap_host: required("IMAP_HOST")?,
        imap_port: std::env::var(var("IMAP_PORT"))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(993),
        username: required("USERNAME")?,
        password: required("PASSWORD")?,
        query: std::env::var(var("QUERY")).unwrap_or_else(|_| "UNSEEN".to_string()),
    })
}

/// Parse the display timezone; unset means UTC, garbage is a hard error.
fn parse_tz(value: Option<String>) -> Result<Tz, ConfigError> {
    match value {
        None => Ok(chrono_tz::UTC),
        Some(name) => name.parse().map_err(|_| ConfigError::InvalidValue {
            key: "MAILGRAM_DISPLAY_TZ".into(),
            message: format!("unknown timezone: {name}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tz_defaults_to_utc() {
        assert_eq!(parse_tz(None).unwrap(), chrono_tz::UTC);
    }

    #[test]
    fn parse_tz_accepts_iana_names() {
        assert_eq!(
            parse_tz(Some("Europe/Bucharest".into())).unwrap(),
            chrono_tz::Europe::Bucharest
        );
    }

    #[test]
    fn parse_tz_rejects_garbage() {
        assert!(matches!(
            parse_tz(Some("Mars/OlympusMons".into())),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
