//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`ThingRulesError`] via `#[from]` (no `String` catch-all variants).

use crate::id::{RuleId, ThingId};

/// Top-level error for rule management operations.
#[derive(Debug, thiserror::Error)]
pub enum ThingRulesError {
    /// A rule document or builder input violated a structural invariant.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// The requested rule does not exist.
    #[error("not found")]
    NotFound(#[from] NotFoundError),

    /// A legacy rule document could not be migrated.
    #[error("migration error")]
    Migration(#[from] MigrationError),

    /// The persistence layer failed.
    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Structural problems with a trigger/effect tree or rule document.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The JSON document does not describe a known trigger/effect shape
    /// (unknown `type` tag, missing field, wrong field type, …).
    #[error("invalid rule structure: {0}")]
    InvalidStructure(#[source] serde_json::Error),

    /// The builder was finished without a trigger.
    #[error("rule has no trigger")]
    MissingTrigger,

    /// The builder was finished without an effect.
    #[error("rule has no effect")]
    MissingEffect,

    /// A `TimeTrigger` time is not a valid `HH:MM` wall-clock time.
    #[error("invalid time {0:?}, expected HH:MM")]
    InvalidTime(String),

    /// A `TimeTrigger` is marked as a legacy UTC time. Only the migrator
    /// may interpret those.
    #[error("time {0:?} is marked as UTC, expected a localized time")]
    UnlocalizedTime(String),

    /// An `AndTrigger`/`OrTrigger` has no children.
    #[error("{0} has no child triggers")]
    EmptyCombinator(&'static str),

    /// A `MultiEffect` has no children.
    #[error("MultiEffect has no child effects")]
    EmptyMultiEffect,

    /// A `PulseEffect` duration is zero.
    #[error("PulseEffect duration must be positive")]
    ZeroPulseDuration,

    /// A rule with this id is already registered.
    #[error("rule {0} already exists")]
    DuplicateId(RuleId),
}

/// A lookup by identifier found nothing.
#[derive(Debug, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// A legacy document contains data that cannot be upgraded unambiguously.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// An `href` does not contain the expected `things/<id>` or
    /// `properties/<id>` segment.
    #[error("malformed href {href:?}, expected a {expected} segment")]
    MalformedHref { href: String, expected: &'static str },

    /// A legacy `TimeTrigger` time could not be read as `HH:MM`.
    #[error("malformed time {time:?}, expected HH:MM")]
    MalformedTime { time: String },

    /// A legacy combinator `op` or level type is not one of the known values.
    #[error("unknown legacy {field} {value:?}")]
    UnknownLegacyOperator { field: &'static str, value: String },

    /// The document (or one of its parts) is not a JSON object.
    #[error("{0} is not a JSON object")]
    NotAnObject(&'static str),
}

/// Errors reported by the device layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("thing {0} not found")]
    ThingNotFound(ThingId),

    #[error("property {property} not found on thing {thing}")]
    PropertyNotFound { thing: ThingId, property: String },

    #[error("thing {0} is unreachable")]
    Unreachable(ThingId),

    #[error("thing {thing} rejected the write to {property}: {reason}")]
    Rejected {
        thing: ThingId,
        property: String,
        reason: String,
    },
}

/// Errors reported by notifier outlets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifierError {
    #[error("notifier {0:?} not found")]
    NotifierNotFound(String),

    #[error("outlet {outlet:?} of notifier {notifier:?} not found")]
    OutletNotFound { notifier: String, outlet: String },

    #[error("outlet {outlet:?} of notifier {notifier:?} could not deliver: {reason}")]
    Undelivered {
        notifier: String,
        outlet: String,
        reason: String,
    },
}

/// Failure of a single leaf effect.
#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    #[error("device command failed")]
    Device(#[from] DeviceError),

    #[error("webhook notification failed")]
    Webhook(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("notification failed")]
    Notifier(#[from] NotifierError),

    /// The owning rule was disabled or deleted before the effect ran.
    #[error("effect cancelled")]
    Cancelled,
}
