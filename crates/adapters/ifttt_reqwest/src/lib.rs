//! # thingrules-adapter-ifttt-reqwest
//!
//! Outbound webhook adapter for the IFTTT maker service.
//!
//! Each notification is a `POST {base_url}/trigger/{event}/with/key/{key}`
//! carrying `{"value1": event}`. Without a key the notifier is disabled and
//! every call fails with [`IftttError::Disabled`], which the engine reports
//! as a failed effect.
//!
//! ## Dependency rule
//!
//! Depends on `thingrules-app` (port traits) and `thingrules-domain` only.

use reqwest::{Client, Url};
use serde_json::json;
use thingrules_app::ports::WebhookNotifier;
use thingrules_domain::error::EffectError;

/// Default endpoint of the maker service.
pub const DEFAULT_BASE_URL: &str = "https://maker.ifttt.com";

/// Errors raised while notifying IFTTT.
#[derive(Debug, thiserror::Error)]
pub enum IftttError {
    /// No maker key is configured.
    #[error("IFTTT notifier is disabled (no key configured)")]
    Disabled,

    #[error("invalid IFTTT base URL {0}")]
    InvalidBaseUrl(String),

    /// The request could not be sent or the response not read.
    #[error("IFTTT request failed")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("IFTTT answered with status {0}")]
    Status(u16),
}

impl From<IftttError> for EffectError {
    fn from(err: IftttError) -> Self {
        Self::Webhook(Box::new(err))
    }
}

/// [`WebhookNotifier`] backed by the IFTTT maker webhook API.
#[derive(Debug, Clone)]
pub struct IftttWebhook {
    client: Client,
    base_url: String,
    key: Option<String>,
}

impl IftttWebhook {
    /// Create a notifier posting to `base_url` with the given maker key.
    ///
    /// # Errors
    ///
    /// Returns [`IftttError::InvalidBaseUrl`] when `base_url` is not an
    /// absolute http(s) URL.
    pub fn new(base_url: &str, key: Option<String>) -> Result<Self, IftttError> {
        let parsed =
            Url::parse(base_url).map_err(|_| IftttError::InvalidBaseUrl(base_url.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(IftttError::InvalidBaseUrl(base_url.to_string()));
        }
        Ok(Self {
            client: Client::new(),
            base_url: base_url.to_string(),
            key: key.filter(|key| !key.is_empty()),
        })
    }

    /// A notifier that rejects every call.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            key: None,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    fn trigger_url(&self, event: &str, key: &str) -> Result<Url, IftttError> {
        let invalid = || IftttError::InvalidBaseUrl(self.base_url.clone());
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .extend(["trigger", event, "with", "key", key]);
        Ok(url)
    }

    async fn send(&self, event: &str) -> Result<(), IftttError> {
        let key = self.key.as_deref().ok_or(IftttError::Disabled)?;
        let url = self.trigger_url(event, key)?;
        let response = self
            .client
            .post(url)
            .json(&json!({ "value1": event }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IftttError::Status(status.as_u16()));
        }
        tracing::debug!(event, "IFTTT notified");
        Ok(())
    }
}

impl WebhookNotifier for IftttWebhook {
    async fn notify(&self, event: &str) -> Result<(), EffectError> {
        self.send(event).await.map_err(EffectError::from)
    }
}
