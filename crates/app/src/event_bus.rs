//! Device event feed between the device layer and the rule engine.
//!
//! Things publish [`DeviceEvent`]s as they happen; the engine reads them from
//! a [`feed`](DeviceEventBus::feed) in publication order. The feed is bounded:
//! when the engine falls more than `capacity` events behind, the oldest ones
//! are dropped and the engine's next read reports how many it missed.
//! Dropped property changes are harmless for property triggers, which read
//! current values at evaluation time. Dropped named events are lost.

use std::future::Future;

use tokio::sync::broadcast;

use thingrules_domain::error::ThingRulesError;
use thingrules_domain::event::DeviceEvent;

use crate::ports::EventPublisher;

/// Bounded fan-out of device events, backed by a tokio [`broadcast`] channel.
pub struct DeviceEventBus {
    sender: broadcast::Sender<DeviceEvent>,
}

impl DeviceEventBus {
    /// `capacity` is how many events a feed may fall behind before it lags.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Open a feed. It sees events published from now on.
    #[must_use]
    pub fn feed(&self) -> broadcast::Receiver<DeviceEvent> {
        self.sender.subscribe()
    }
}

impl EventPublisher for DeviceEventBus {
    fn publish(
        &self,
        event: DeviceEvent,
    ) -> impl Future<Output = Result<(), ThingRulesError>> + Send {
        // Things may report before the engine opens its feed.
        if self.sender.send(event).is_err() {
            tracing::trace!("no open feed, device event dropped");
        }
        async { Ok(()) }
    }
}
