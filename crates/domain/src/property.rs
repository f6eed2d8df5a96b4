//! Property references, comparisons and the read-only device-state view
//! triggers are evaluated against.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::ThingId;

/// Points at one property of one thing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRef {
    /// Owning thing.
    pub thing: ThingId,
    /// Property name on that thing.
    pub id: String,
    /// Value type advertised by the thing (`"boolean"`, `"number"`, …).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PropertyRef {
    #[must_use]
    pub fn new(thing: impl Into<ThingId>, id: impl Into<String>) -> Self {
        Self {
            thing: thing.into(),
            id: id.into(),
            value_type: None,
            unit: None,
            description: None,
        }
    }

    /// Whether this reference names `(thing, property)`.
    #[must_use]
    pub fn is(&self, thing: &ThingId, property: &str) -> bool {
        self.thing == *thing && self.id == property
    }

    #[must_use]
    pub fn key(&self) -> PropertyKey {
        PropertyKey {
            thing: self.thing.clone(),
            property: self.id.clone(),
        }
    }
}

impl fmt::Display for PropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.thing, self.id)
    }
}

/// Hashable `(thing, property)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyKey {
    pub thing: ThingId,
    pub property: String,
}

/// Comparison operator of a `PropertyTrigger`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Eq,
    Lt,
    Gt,
    Neq,
    /// True on the cycle in which the property changes value.
    Changed,
}

impl Comparator {
    /// Compare `actual` against `expected`.
    ///
    /// `Changed` needs the previous value and is handled by the trigger
    /// itself; here it always yields `false`.
    #[must_use]
    pub fn compare(self, actual: &Value, expected: &Value) -> bool {
        match self {
            Self::Eq => values_equal(actual, expected),
            Self::Neq => !values_equal(actual, expected),
            Self::Lt => ordering(actual, expected).is_some_and(std::cmp::Ordering::is_lt),
            Self::Gt => ordering(actual, expected).is_some_and(std::cmp::Ordering::is_gt),
            Self::Changed => false,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "eq",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Neq => "neq",
            Self::Changed => "changed",
        })
    }
}

/// JSON equality where numbers compare by value (`1 == 1.0`).
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn ordering(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Read-only view of current device state.
///
/// `None` means the thing or property is unknown right now; triggers treat
/// that as `false`.
pub trait DeviceState {
    fn property_value(&self, thing: &ThingId, property: &str) -> Option<Value>;
}

/// A point-in-time copy of the properties a dispatch cycle needs.
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    values: HashMap<PropertyKey, Value>,
}

impl StateSnapshot {
    pub fn insert(&mut self, key: PropertyKey, value: Value) {
        self.values.insert(key, value);
    }

    #[must_use]
    pub fn contains(&self, key: &PropertyKey) -> bool {
        self.values.contains_key(key)
    }

    #[must_use]
    pub fn with(mut self, thing: impl Into<ThingId>, property: impl Into<String>, value: Value) -> Self {
        self.insert(
            PropertyKey {
                thing: thing.into(),
                property: property.into(),
            },
            value,
        );
        self
    }
}

impl DeviceState for StateSnapshot {
    fn property_value(&self, thing: &ThingId, property: &str) -> Option<Value> {
        self.values
            .get(&PropertyKey {
                thing: thing.clone(),
                property: property.to_string(),
            })
            .cloned()
    }
}
