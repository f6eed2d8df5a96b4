//! # thingrules-adapter-virtual
//!
//! In-memory device layer that stands in for real adapters during demos and
//! tests.
//!
//! ## Demo things
//!
//! | Thing | Properties | Actions | Events |
//! |-------|------------|---------|--------|
//! | `light` | `on`, `level` | | |
//! | `door` | `open`, `locked`, `battery` (read-only) | `lock`, `unlock` | `knocked` |
//! | `switch` | `on` | | `pressed` |
//! | `sensor` | `temperature`, `unit` (read-only) | | |
//!
//! Every property write publishes a `property_changed` event, every emitted
//! event or performed action publishes an `event`, through the configured
//! [`EventPublisher`].
//!
//! [`VirtualNotifiers`] plays the notifier side: outlets that log and keep
//! what `NotifierOutletEffect` sends them. The demo set has a `log`
//! notifier with a `console` outlet.
//!
//! ## Dependency rule
//!
//! Depends on `thingrules-app` (port traits) and `thingrules-domain` only.

mod notifier;
mod thing;

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use thingrules_app::ports::{DeviceGateway, EventPublisher};
use thingrules_domain::error::DeviceError;
use thingrules_domain::event::DeviceEvent;
use thingrules_domain::id::ThingId;

pub use notifier::VirtualNotifiers;
pub use thing::VirtualThing;

/// A set of simulated things behind the [`DeviceGateway`] port.
pub struct VirtualThings<P> {
    things: Mutex<BTreeMap<ThingId, VirtualThing>>,
    publisher: P,
}

impl<P: EventPublisher + Send + Sync> VirtualThings<P> {
    /// Create an empty device layer.
    pub fn new(publisher: P) -> Self {
        Self {
            things: Mutex::new(BTreeMap::new()),
            publisher,
        }
    }

    /// Create a device layer seeded with the demo things.
    pub fn with_demo_things(publisher: P) -> Self {
        let layer = Self::new(publisher);
        for (id, thing) in thing::demo_things() {
            layer.add_thing(id, thing);
        }
        layer
    }

    /// Register (or replace) a thing.
    pub fn add_thing(&self, id: impl Into<ThingId>, thing: VirtualThing) {
        let id = id.into();
        tracing::debug!(thing = %id, title = %thing.title, "virtual thing added");
        self.lock().insert(id, thing);
    }

    /// Forget a thing. Returns whether it existed.
    pub fn remove_thing(&self, id: &ThingId) -> bool {
        self.lock().remove(id).is_some()
    }

    /// Simulate a thing dropping off (or coming back to) the network.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::ThingNotFound`] for an unknown thing.
    pub fn set_reachable(&self, id: &ThingId, reachable: bool) -> Result<(), DeviceError> {
        let mut things = self.lock();
        let thing = things
            .get_mut(id)
            .ok_or_else(|| DeviceError::ThingNotFound(id.clone()))?;
        thing.reachable = reachable;
        Ok(())
    }

    /// Ids of all registered things.
    #[must_use]
    pub fn thing_ids(&self) -> Vec<ThingId> {
        self.lock().keys().cloned().collect()
    }

    /// Current value of a property, ignoring reachability.
    #[must_use]
    pub fn peek(&self, id: &ThingId, property: &str) -> Option<Value> {
        self.lock()
            .get(id)?
            .properties
            .get(property)
            .map(|slot| slot.value.clone())
    }

    /// Change a property the way the thing itself would (read-only
    /// properties included) and publish the change.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] when the thing or property is unknown, or the
    /// thing is unreachable.
    pub async fn report_property(
        &self,
        id: &ThingId,
        property: &str,
        value: Value,
    ) -> Result<(), DeviceError> {
        self.write(id, property, value.clone(), true)?;
        self.publish(DeviceEvent::property_changed(id.clone(), property, value))
            .await;
        Ok(())
    }

    /// Make a thing emit a named event.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::ThingNotFound`] for an unknown thing and
    /// [`DeviceError::Unreachable`] for an unreachable one.
    pub async fn emit_event(&self, id: &ThingId, name: &str) -> Result<(), DeviceError> {
        {
            let things = self.lock();
            let thing = reachable_thing(&things, id)?;
            if !thing.events.contains(name) {
                tracing::debug!(thing = %id, event = name, "emitting undeclared event");
            }
        }
        self.publish(DeviceEvent::event(id.clone(), name)).await;
        Ok(())
    }

    fn write(
        &self,
        id: &ThingId,
        property: &str,
        value: Value,
        as_device: bool,
    ) -> Result<(), DeviceError> {
        let mut things = self.lock();
        let thing = things
            .get_mut(id)
            .ok_or_else(|| DeviceError::ThingNotFound(id.clone()))?;
        if !thing.reachable {
            return Err(DeviceError::Unreachable(id.clone()));
        }
        let slot = thing
            .properties
            .get_mut(property)
            .ok_or_else(|| DeviceError::PropertyNotFound {
                thing: id.clone(),
                property: property.to_string(),
            })?;
        if slot.read_only && !as_device {
            return Err(DeviceError::Rejected {
                thing: id.clone(),
                property: property.to_string(),
                reason: "read-only property".to_string(),
            });
        }
        slot.value = value;
        Ok(())
    }

    async fn publish(&self, event: DeviceEvent) {
        if let Err(error) = self.publisher.publish(event).await {
            tracing::warn!(%error, "failed to publish device event");
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ThingId, VirtualThing>> {
        self.things.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn reachable_thing<'a>(
    things: &'a BTreeMap<ThingId, VirtualThing>,
    id: &ThingId,
) -> Result<&'a VirtualThing, DeviceError> {
    let thing = things
        .get(id)
        .ok_or_else(|| DeviceError::ThingNotFound(id.clone()))?;
    if thing.reachable {
        Ok(thing)
    } else {
        Err(DeviceError::Unreachable(id.clone()))
    }
}

impl<P: EventPublisher + Send + Sync> DeviceGateway for VirtualThings<P> {
    async fn get_property_value(&self, thing: &ThingId, property: &str) -> Option<Value> {
        let things = self.lock();
        let thing = reachable_thing(&things, thing).ok()?;
        thing.properties.get(property).map(|slot| slot.value.clone())
    }

    async fn set_property_value(
        &self,
        thing: &ThingId,
        property: &str,
        value: Value,
    ) -> Result<(), DeviceError> {
        self.write(thing, property, value.clone(), false)?;
        self.publish(DeviceEvent::property_changed(thing.clone(), property, value))
            .await;
        Ok(())
    }

    async fn request_action(
        &self,
        thing: &ThingId,
        action: &str,
        parameters: Value,
    ) -> Result<(), DeviceError> {
        {
            let things = self.lock();
            let target = reachable_thing(&things, thing)?;
            if !target.actions.contains(action) {
                return Err(DeviceError::Rejected {
                    thing: thing.clone(),
                    property: action.to_string(),
                    reason: "unknown action".to_string(),
                });
            }
        }
        tracing::debug!(%thing, action, %parameters, "virtual action performed");
        self.publish(DeviceEvent::event(thing.clone(), action)).await;
        Ok(())
    }
}
