//! Device port: reads and commands against the device layer.

use std::future::Future;

use serde_json::Value;
use thingrules_domain::error::DeviceError;
use thingrules_domain::id::ThingId;

/// Access to things managed by the device layer.
///
/// The event feed itself is a channel (see [`EventPublisher`](super::EventPublisher));
/// this trait covers the request/response side.
pub trait DeviceGateway: Send + Sync {
    /// Current value of a property, `None` when the thing or property is unknown.
    fn get_property_value(
        &self,
        thing: &ThingId,
        property: &str,
    ) -> impl Future<Output = Option<Value>> + Send;

    /// Write a property value.
    fn set_property_value(
        &self,
        thing: &ThingId,
        property: &str,
        value: Value,
    ) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Ask a thing to perform an action.
    fn request_action(
        &self,
        thing: &ThingId,
        action: &str,
        parameters: Value,
    ) -> impl Future<Output = Result<(), DeviceError>> + Send;
}

impl<T: DeviceGateway> DeviceGateway for std::sync::Arc<T> {
    fn get_property_value(
        &self,
        thing: &ThingId,
        property: &str,
    ) -> impl Future<Output = Option<Value>> + Send {
        (**self).get_property_value(thing, property)
    }

    fn set_property_value(
        &self,
        thing: &ThingId,
        property: &str,
        value: Value,
    ) -> impl Future<Output = Result<(), DeviceError>> + Send {
        (**self).set_property_value(thing, property, value)
    }

    fn request_action(
        &self,
        thing: &ThingId,
        action: &str,
        parameters: Value,
    ) -> impl Future<Output = Result<(), DeviceError>> + Send {
        (**self).request_action(thing, action, parameters)
    }
}
