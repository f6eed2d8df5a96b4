//! Webhook port: outward notifications fired by `IfThisThenThatEffect`.

use std::future::Future;

use thingrules_domain::error::EffectError;

/// Sends a named event to an external webhook service.
pub trait WebhookNotifier: Send + Sync {
    fn notify(&self, event: &str) -> impl Future<Output = Result<(), EffectError>> + Send;
}

impl<T: WebhookNotifier> WebhookNotifier for std::sync::Arc<T> {
    fn notify(&self, event: &str) -> impl Future<Output = Result<(), EffectError>> + Send {
        (**self).notify(event)
    }
}
