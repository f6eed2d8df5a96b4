//! Event bus port: the device layer pushes events through it.

use std::future::Future;

use thingrules_domain::error::ThingRulesError;
use thingrules_domain::event::DeviceEvent;

/// Publishes device events to interested subscribers.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: DeviceEvent)
    -> impl Future<Output = Result<(), ThingRulesError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(
        &self,
        event: DeviceEvent,
    ) -> impl Future<Output = Result<(), ThingRulesError>> + Send {
        (**self).publish(event)
    }
}
