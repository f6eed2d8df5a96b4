//! A single simulated thing: named properties, actions and events.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

#[derive(Debug, Clone)]
pub(crate) struct PropertySlot {
    pub value: Value,
    pub read_only: bool,
}

/// Description and live state of one virtual thing.
#[derive(Debug, Clone)]
pub struct VirtualThing {
    pub(crate) title: String,
    pub(crate) properties: BTreeMap<String, PropertySlot>,
    pub(crate) actions: BTreeSet<String>,
    pub(crate) events: BTreeSet<String>,
    pub(crate) reachable: bool,
}

impl VirtualThing {
    /// Start describing a thing with no properties.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            properties: BTreeMap::new(),
            actions: BTreeSet::new(),
            events: BTreeSet::new(),
            reachable: true,
        }
    }

    /// Add a writable property with its initial value.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, initial: Value) -> Self {
        self.properties.insert(
            name.into(),
            PropertySlot {
                value: initial,
                read_only: false,
            },
        );
        self
    }

    /// Add a property that only the thing itself may change.
    #[must_use]
    pub fn read_only_property(mut self, name: impl Into<String>, initial: Value) -> Self {
        self.properties.insert(
            name.into(),
            PropertySlot {
                value: initial,
                read_only: true,
            },
        );
        self
    }

    #[must_use]
    pub fn action(mut self, name: impl Into<String>) -> Self {
        self.actions.insert(name.into());
        self
    }

    #[must_use]
    pub fn event(mut self, name: impl Into<String>) -> Self {
        self.events.insert(name.into());
        self
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.reachable
    }
}

/// Things seeded by [`VirtualThings::with_demo_things`](crate::VirtualThings::with_demo_things).
pub(crate) fn demo_things() -> Vec<(&'static str, VirtualThing)> {
    vec![
        (
            "light",
            VirtualThing::new("Virtual Light")
                .property("on", Value::Bool(false))
                .property("level", Value::from(0)),
        ),
        (
            "door",
            VirtualThing::new("Front Door")
                .property("open", Value::Bool(false))
                .property("locked", Value::Bool(true))
                .read_only_property("battery", Value::from(100))
                .action("unlock")
                .action("lock")
                .event("knocked"),
        ),
        (
            "switch",
            VirtualThing::new("Virtual Switch")
                .property("on", Value::Bool(false))
                .event("pressed"),
        ),
        (
            "sensor",
            VirtualThing::new("Virtual Temperature Sensor")
                .read_only_property("temperature", Value::from(21.5))
                .read_only_property("unit", Value::from("\u{b0}C")),
        ),
    ]
}
