//! Device events: what the device layer pushes into the rule engine.

use serde::{Deserialize, Serialize};

use crate::id::ThingId;

/// A notification emitted by the device layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// A property of a thing was written (by a user, an adapter or a rule).
    PropertyChanged {
        thing: ThingId,
        property: String,
        value: serde_json::Value,
    },
    /// A thing emitted a named event (`"pressed"`, `"knocked"`, …).
    Event { thing: ThingId, name: String },
}

impl DeviceEvent {
    #[must_use]
    pub fn property_changed(
        thing: impl Into<ThingId>,
        property: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self::PropertyChanged {
            thing: thing.into(),
            property: property.into(),
            value,
        }
    }

    #[must_use]
    pub fn event(thing: impl Into<ThingId>, name: impl Into<String>) -> Self {
        Self::Event {
            thing: thing.into(),
            name: name.into(),
        }
    }

    /// The thing this event originates from.
    #[must_use]
    pub fn thing(&self) -> &ThingId {
        match self {
            Self::PropertyChanged { thing, .. } | Self::Event { thing, .. } => thing,
        }
    }
}

impl std::fmt::Display for DeviceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PropertyChanged {
                thing,
                property,
                value,
            } => write!(f, "property_changed({thing}.{property} = {value})"),
            Self::Event { thing, name } => write!(f, "event({thing}.{name})"),
        }
    }
}
