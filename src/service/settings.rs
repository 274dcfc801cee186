//! Website intake settings.
//!
//! The settings row is read on every use, never cached in process state.

use std::sync::Arc;

use chrono::Utc;
use constant_time_eq::constant_time_eq;
use url::Url;

use crate::crypto::generate_api_key;
use crate::error::{Result, ServerError};
use crate::model::{Id, WebsiteSettings};
use crate::repository::SettingsRepository;

/// Requested changes, `None` keeps the current value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SettingsUpdate {
    pub target_url: Option<Option<String>>,
    pub api_key: Option<String>,
    pub regenerate_key: bool,
}

#[derive(Clone)]
pub struct SettingsService {
    settings: Arc<dyn SettingsRepository>,
    fallback_key: Option<String>,
}

impl SettingsService {
    /// `fallback_key` is accepted while the stored document has no key.
    pub fn new(settings: Arc<dyn SettingsRepository>, fallback_key: Option<String>) -> Self {
        Self {
            settings,
            fallback_key: fallback_key.filter(|k| !k.is_empty()),
        }
    }

    /// Current settings, created on first access.
    pub async fn get(&self) -> Result<WebsiteSettings> {
        let key = self.fallback_key.clone().unwrap_or_else(generate_api_key);
        self.settings.get_or_insert(WebsiteSettings::new(key)).await
    }

    pub async fn update(&self, update: SettingsUpdate, actor: Id) -> Result<WebsiteSettings> {
        let mut settings = self.get().await?;

        if let Some(target_url) = update.target_url {
            settings.target_url = target_url
                .map(|u| u.trim().to_owned())
                .filter(|u| !u.is_empty())
                .map(|u| parse_target_url(&u))
                .transpose()?;
        }
        if update.regenerate_key {
            settings.api_key = generate_api_key();
        } else if let Some(api_key) = update.api_key {
            let api_key = api_key.trim();
            if api_key.is_empty() {
                return Err(ServerError::bad_request("API key cannot be empty."));
            }
            settings.api_key = api_key.to_owned();
        }
        settings.updated_by = Some(actor);
        settings.updated_at = Utc::now();

        self.settings.save(&settings).await?;
        tracing::info!(%actor, "website settings updated");

        Ok(settings)
    }

    /// Check a key presented to the public intake.
    pub async fn verify_api_key(&self, candidate: Option<&str>) -> Result<()> {
        let stored = self
            .settings
            .get()
            .await?
            .map(|s| s.api_key)
            .filter(|k| !k.is_empty());
        let expected = stored.or_else(|| self.fallback_key.clone());

        match (expected, candidate) {
            (Some(expected), Some(candidate))
                if constant_time_eq(expected.as_bytes(), candidate.as_bytes()) =>
            {
                Ok(())
            },
            _ => Err(ServerError::InvalidApiKey),
        }
    }
}

/// Only absolute `http(s)` URLs are accepted.
fn parse_target_url(value: &str) -> Result<String> {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(value.to_owned()),
        _ => Err(ServerError::bad_request("Target URL must be a valid http(s) URL.")),
    }
}
