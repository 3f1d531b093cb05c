use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{debug, info, instrument};

use crate::error::StaleError;
use crate::stale::DaysUntilStale;
use crate::storage::Storage;

const DAYS_UNTIL_STALE: &str = "days_until_stale";
const EMAIL_ENABLED: &str = "email_enabled";
const NOTIFICATION_EMAIL: &str = "notification_email";
const NEXT_CHECK_AT: &str = "next_check_at";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleConfig {
    pub days_until_stale: DaysUntilStale,
    pub email_enabled: bool,

    /// `None` means the site admin address.
    pub notification_email: Option<String>,
}

impl StaleConfig {
    pub fn recipient<'a>(&'a self, admin_email: &'a str) -> &'a str {
        self.notification_email.as_deref().unwrap_or(admin_email)
    }
}

impl Default for StaleConfig {
    fn default() -> Self {
        Self {
            days_until_stale: Default::default(),
            email_enabled: true,
            notification_email: None,
        }
    }
}

fn encode_bool(v: bool) -> &'static str {
    if v {
        "1"
    } else {
        "0"
    }
}

/// Reads and writes [`StaleConfig`] in the options table.
#[derive(Clone)]
pub struct SettingsStore {
    storage: Arc<Storage>,
}

impl SettingsStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Writes the default value of every setting that has never been stored.
    pub async fn install_defaults(&self) -> Result<()> {
        let defaults = StaleConfig::default();
        let days = defaults.days_until_stale.to_string();

        let mut tx = self.storage.begin().await?;
        let mut installed = false;
        installed |= tx.add_option(DAYS_UNTIL_STALE, &days).await?;
        installed |= tx.add_option(EMAIL_ENABLED, encode_bool(defaults.email_enabled)).await?;
        installed |= tx.add_option(NOTIFICATION_EMAIL, "").await?;
        tx.commit().await?;

        if installed {
            info!("Installed default notifier settings");
        }

        Ok(())
    }

    #[instrument(level = "DEBUG", skip(self))]
    pub async fn load(&self) -> Result<StaleConfig, StaleError> {
        let (days, email_enabled, notification_email) = async {
            let mut tx = self.storage.begin().await?;
            let days = tx.get_option(DAYS_UNTIL_STALE).await?;
            let email_enabled = tx.get_option(EMAIL_ENABLED).await?;
            let notification_email = tx.get_option(NOTIFICATION_EMAIL).await?;
            tx.commit().await?;

            Result::<_>::Ok((days, email_enabled, notification_email))
        }
        .await
        .map_err(StaleError::RepositoryUnavailable)?;

        let days_until_stale = match days {
            Some(days) => days.parse()?,
            None => Default::default(),
        };

        let config = StaleConfig {
            days_until_stale,
            email_enabled: email_enabled.map_or(true, |v| v == "1"),
            notification_email: notification_email.and_then(|v| sanitize_email(&v)),
        };
        debug!(?config, "Loaded notifier settings");

        Ok(config)
    }

    #[instrument(level = "DEBUG", skip(self))]
    pub async fn save(&self, config: &StaleConfig) -> Result<()> {
        let days = config.days_until_stale.to_string();

        let mut tx = self.storage.begin().await?;
        tx.set_option(DAYS_UNTIL_STALE, &days).await?;
        tx.set_option(EMAIL_ENABLED, encode_bool(config.email_enabled))
            .await?;
        tx.set_option(
            NOTIFICATION_EMAIL,
            config.notification_email.as_deref().unwrap_or_default(),
        )
        .await?;
        tx.commit().await?;

        info!(
            days_until_stale = %config.days_until_stale,
            email_enabled = config.email_enabled,
            "Saved notifier settings"
        );

        Ok(())
    }

    pub async fn next_check_at(&self) -> Result<Option<OffsetDateTime>> {
        let mut tx = self.storage.begin().await?;
        let value = tx.get_option(NEXT_CHECK_AT).await?;
        tx.commit().await?;

        let Some(value) = value else {
            return Ok(None);
        };

        let timestamp = value
            .parse::<i64>()
            .with_context(|| anyhow!("malformed next check time `{value}`"))?;

        OffsetDateTime::from_unix_timestamp(timestamp)
            .map(Some)
            .with_context(|| anyhow!("next check time {timestamp} is out of range"))
    }

    pub async fn set_next_check_at(&self, at: OffsetDateTime) -> Result<()> {
        let mut tx = self.storage.begin().await?;
        tx.set_option(NEXT_CHECK_AT, &at.unix_timestamp().to_string())
            .await?;
        tx.commit().await
    }
}

/// The settings form as posted by the browser.
///
/// An unchecked checkbox is absent from the submission, hence the `Option`.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct SettingsForm {
    #[serde(default)]
    pub days_until_stale: String,

    #[serde(default)]
    pub email_enabled: Option<String>,

    #[serde(default)]
    pub notification_email: String,
}

impl SettingsForm {
    /// Validates the submission. Day counts are coerced like an integer cast and clamped into the
    /// accepted range; an invalid address falls back to the site admin address.
    pub fn into_config(self) -> StaleConfig {
        StaleConfig {
            days_until_stale: DaysUntilStale::clamped(leading_integer(&self.days_until_stale)),
            email_enabled: self.email_enabled.is_some(),
            notification_email: sanitize_email(&self.notification_email),
        }
    }
}

/// Parses an optional sign followed by the leading run of digits; anything else yields zero.
fn leading_integer(s: &str) -> i64 {
    let s = s.trim();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());

    let value = match digits[..end].parse::<i64>() {
        Ok(v) => v,
        Err(_) if end > 0 => i64::MAX,
        Err(_) => 0,
    };

    if negative {
        -value
    } else {
        value
    }
}

pub fn sanitize_email(s: &str) -> Option<String> {
    let s = s.trim();

    if s.len() < 6 || s.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return None;
    }

    let (local, domain) = s.split_once('@')?;

    if local.is_empty() || domain.contains('@') {
        return None;
    }

    let labels = domain.split('.').collect::<Vec<_>>();

    if labels.len() < 2
        || labels
            .iter()
            .any(|label| label.is_empty() || label.starts_with('-') || label.ends_with('-'))
    {
        return None;
    }

    Some(s.to_owned())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use time::macros::datetime;

    use crate::stale::{StalenessEvaluator, Threshold, MAX_DAYS_UNTIL_STALE};

    use super::*;

    async fn settings() -> SettingsStore {
        SettingsStore::new(Arc::new(Storage::in_memory().await.unwrap()))
    }

    #[tokio::test]
    async fn test_defaults_when_nothing_is_stored() {
        let settings = settings().await;

        assert_eq!(settings.load().await.unwrap(), StaleConfig::default());
    }

    #[tokio::test]
    async fn test_install_defaults_keeps_existing_values() {
        let settings = settings().await;
        let config = StaleConfig {
            days_until_stale: DaysUntilStale::new(30).unwrap(),
            email_enabled: false,
            notification_email: Some("editor@example.com".into()),
        };

        settings.save(&config).await.unwrap();
        settings.install_defaults().await.unwrap();

        assert_eq!(settings.load().await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_days_until_stale_round_trip() {
        let settings = settings().await;
        settings.install_defaults().await.unwrap();

        let config = StaleConfig {
            days_until_stale: DaysUntilStale::new(365).unwrap(),
            ..settings.load().await.unwrap()
        };
        settings.save(&config).await.unwrap();

        let loaded = settings.load().await.unwrap();
        assert_eq!(loaded.days_until_stale.get(), 365);
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_email_settings_round_trip() {
        let settings = settings().await;
        let config = StaleConfig {
            email_enabled: false,
            notification_email: Some("some-admin@somedomain.com".into()),
            ..Default::default()
        };
        settings.save(&config).await.unwrap();

        let loaded = settings.load().await.unwrap();
        assert!(!loaded.email_enabled);
        assert_eq!(loaded.recipient("admin@example.com"), "some-admin@somedomain.com");
    }

    #[tokio::test]
    async fn test_corrupt_threshold_is_reported() {
        let storage = Arc::new(Storage::in_memory().await.unwrap());
        let mut tx = storage.begin().await.unwrap();
        tx.set_option(DAYS_UNTIL_STALE, "0").await.unwrap();
        tx.commit().await.unwrap();

        let settings = SettingsStore::new(storage);

        assert!(matches!(
            settings.load().await,
            Err(StaleError::InvalidThreshold(_))
        ));
    }

    #[tokio::test]
    async fn test_next_check_at_round_trip() {
        let settings = settings().await;
        assert_eq!(settings.next_check_at().await.unwrap(), None);

        let at = datetime!(2026-10-19 12:00 UTC);
        settings.set_next_check_at(at).await.unwrap();
        assert_eq!(settings.next_check_at().await.unwrap(), Some(at));
    }

    #[test]
    fn test_form_clamps_days() {
        let form = |days: &str| SettingsForm {
            days_until_stale: days.into(),
            ..Default::default()
        };

        assert_eq!(form("30").into_config().days_until_stale.get(), 30);
        assert_eq!(form("0").into_config().days_until_stale.get(), 1);
        assert_eq!(form("-12").into_config().days_until_stale.get(), 1);
        assert_eq!(form("").into_config().days_until_stale.get(), 1);
        assert_eq!(form("45 days").into_config().days_until_stale.get(), 45);
        assert_eq!(
            form("99999999999999999999").into_config().days_until_stale.get(),
            MAX_DAYS_UNTIL_STALE
        );
    }

    #[tokio::test]
    async fn test_huge_day_count_still_evaluates() {
        let storage = Arc::new(Storage::in_memory().await.unwrap());
        let settings = SettingsStore::new(storage.clone());

        let config = SettingsForm {
            days_until_stale: "99999999999".into(),
            ..Default::default()
        }
        .into_config();
        settings.save(&config).await.unwrap();

        let loaded = settings.load().await.unwrap();
        assert_eq!(loaded.days_until_stale.get(), MAX_DAYS_UNTIL_STALE);

        let stale = StalenessEvaluator::new(storage)
            .evaluate_at(Threshold::days(loaded.days_until_stale), datetime!(2026-10-19 12:00 UTC))
            .await
            .unwrap();
        assert!(stale.is_empty());
    }

    #[test]
    fn test_form_checkbox_and_email() {
        let config = SettingsForm {
            days_until_stale: "90".into(),
            email_enabled: Some("on".into()),
            notification_email: " editor@example.com ".into(),
        }
        .into_config();

        assert!(config.email_enabled);
        assert_eq!(config.notification_email.as_deref(), Some("editor@example.com"));

        let config = SettingsForm {
            days_until_stale: "90".into(),
            email_enabled: None,
            notification_email: "not an address".into(),
        }
        .into_config();

        assert!(!config.email_enabled);
        assert_eq!(config.recipient("admin@example.com"), "admin@example.com");
    }

    #[test]
    fn test_sanitize_email() {
        assert_eq!(sanitize_email("a@b.co").as_deref(), Some("a@b.co"));

        for input in ["", "admin", "admin@", "@example.com", "a@b@c.com", "admin@localhost", "a b@c.com"] {
            assert_eq!(sanitize_email(input), None, "{input:?}");
        }
    }
}
