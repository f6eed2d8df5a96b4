//! In-memory notifiers whose outlets record what they were asked to deliver.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thingrules_app::ports::OutletNotifier;
use thingrules_domain::error::{EffectError, NotifierError};
use thingrules_domain::rule::{Notification, NotificationLevel};

/// Notifiers keyed by id, each holding named outlets.
///
/// Delivered notifications are logged and kept per outlet so they can be
/// inspected.
#[derive(Default)]
pub struct VirtualNotifiers {
    notifiers: Mutex<BTreeMap<String, BTreeMap<String, Vec<Notification>>>>,
}

impl VirtualNotifiers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A `log` notifier with a single `console` outlet.
    #[must_use]
    pub fn with_demo_notifiers() -> Self {
        let notifiers = Self::new();
        notifiers.add_outlet("log", "console");
        notifiers
    }

    /// Register an outlet, creating the notifier if needed.
    pub fn add_outlet(&self, notifier: impl Into<String>, outlet: impl Into<String>) {
        let (notifier, outlet) = (notifier.into(), outlet.into());
        tracing::debug!(%notifier, %outlet, "virtual outlet added");
        self.lock()
            .entry(notifier)
            .or_default()
            .entry(outlet)
            .or_default();
    }

    /// Forget a notifier and all its outlets. Returns whether it existed.
    pub fn remove_notifier(&self, notifier: &str) -> bool {
        self.lock().remove(notifier).is_some()
    }

    /// Notifications delivered so far through `notifier`/`outlet`.
    #[must_use]
    pub fn delivered(&self, notifier: &str, outlet: &str) -> Vec<Notification> {
        self.lock()
            .get(notifier)
            .and_then(|outlets| outlets.get(outlet))
            .cloned()
            .unwrap_or_default()
    }

    fn deliver(
        &self,
        notifier: &str,
        outlet: &str,
        notification: Notification,
    ) -> Result<(), NotifierError> {
        let mut notifiers = self.lock();
        let outlets = notifiers
            .get_mut(notifier)
            .ok_or_else(|| NotifierError::NotifierNotFound(notifier.to_string()))?;
        let inbox = outlets
            .get_mut(outlet)
            .ok_or_else(|| NotifierError::OutletNotFound {
                notifier: notifier.to_string(),
                outlet: outlet.to_string(),
            })?;
        match notification.level {
            NotificationLevel::High => tracing::warn!(
                %notifier, %outlet, title = %notification.title, message = %notification.message,
                "notification"
            ),
            NotificationLevel::Normal | NotificationLevel::Low => tracing::info!(
                %notifier, %outlet, title = %notification.title, message = %notification.message,
                "notification"
            ),
        }
        inbox.push(notification);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, BTreeMap<String, Vec<Notification>>>> {
        self.notifiers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OutletNotifier for VirtualNotifiers {
    async fn notify(
        &self,
        notifier: &str,
        outlet: &str,
        notification: Notification,
    ) -> Result<(), EffectError> {
        self.deliver(notifier, outlet, notification)
            .map_err(EffectError::from)
    }
}
