//! Notifier port: named notifiers, each exposing outlets that deliver
//! messages (email, push, ...). Fired by `NotifierOutletEffect`.

use std::future::Future;

use thingrules_domain::error::EffectError;
use thingrules_domain::rule::Notification;

/// Delivers notifications through a notifier's outlet.
pub trait OutletNotifier: Send + Sync {
    /// Fails with [`NotifierError`](thingrules_domain::error::NotifierError)
    /// when the notifier or outlet is unknown or delivery fails.
    fn notify(
        &self,
        notifier: &str,
        outlet: &str,
        notification: Notification,
    ) -> impl Future<Output = Result<(), EffectError>> + Send;
}

impl<T: OutletNotifier> OutletNotifier for std::sync::Arc<T> {
    fn notify(
        &self,
        notifier: &str,
        outlet: &str,
        notification: Notification,
    ) -> impl Future<Output = Result<(), EffectError>> + Send {
        (**self).notify(notifier, outlet, notification)
    }
}
