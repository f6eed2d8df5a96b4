//! Effect: the outcome applied when a rule's trigger rises.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EffectError, ValidationError};
use crate::id::ThingId;
use crate::property::PropertyRef;

const DEFAULT_PULSE_MS: u64 = 1000;

/// A node of an effect tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Effect {
    #[serde(rename = "SetEffect")]
    Set(SetEffect),
    #[serde(rename = "PulseEffect")]
    Pulse(PulseEffect),
    #[serde(rename = "ActionEffect")]
    Action(ActionEffect),
    #[serde(rename = "IfThisThenThatEffect")]
    IfThisThenThat(WebhookEffect),
    #[serde(rename = "NotifierOutletEffect")]
    NotifierOutlet(NotifierOutletEffect),
    #[serde(rename = "MultiEffect")]
    Multi(MultiEffect),
}

/// Write a value to a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetEffect {
    pub property: PropertyRef,
    /// Literal value, or a string containing `{{value}}`.
    pub value: Value,
}

/// Write a value, then write a revert value once `duration_ms` elapsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseEffect {
    pub property: PropertyRef,
    pub value: Value,
    #[serde(default = "default_pulse_ms")]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_value: Option<Value>,
}

/// Ask a thing to perform an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEffect {
    pub thing: ThingId,
    pub action: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub parameters: Value,
}

/// Fire an outward webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEffect {
    pub event: String,
}

/// Deliver a notification through one outlet of a notifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifierOutletEffect {
    pub notifier: String,
    pub outlet: String,
    pub title: String,
    pub message: String,
    pub level: NotificationLevel,
}

/// Urgency of a notification, stored as `0`, `1` or `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum NotificationLevel {
    Low,
    Normal,
    High,
}

impl TryFrom<u8> for NotificationLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Low),
            1 => Ok(Self::Normal),
            2 => Ok(Self::High),
            other => Err(format!("unknown notification level {other}")),
        }
    }
}

impl From<NotificationLevel> for u8 {
    fn from(level: NotificationLevel) -> Self {
        match level {
            NotificationLevel::Low => 0,
            NotificationLevel::Normal => 1,
            NotificationLevel::High => 2,
        }
    }
}

impl std::fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        })
    }
}

/// What a notifier outlet is asked to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub level: NotificationLevel,
}

impl NotifierOutletEffect {
    #[must_use]
    pub fn notification(&self) -> Notification {
        Notification {
            title: self.title.clone(),
            message: self.message.clone(),
            level: self.level,
        }
    }
}

/// Apply every child, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiEffect {
    pub effects: Vec<Effect>,
}

fn default_pulse_ms() -> u64 {
    DEFAULT_PULSE_MS
}

impl Effect {
    #[must_use]
    pub fn set(property: PropertyRef, value: Value) -> Self {
        Self::Set(SetEffect { property, value })
    }

    #[must_use]
    pub fn pulse(property: PropertyRef, value: Value, duration_ms: u64) -> Self {
        Self::Pulse(PulseEffect {
            property,
            value,
            duration_ms,
            revert_value: None,
        })
    }

    #[must_use]
    pub fn action(thing: impl Into<ThingId>, action: impl Into<String>, parameters: Value) -> Self {
        Self::Action(ActionEffect {
            thing: thing.into(),
            action: action.into(),
            parameters,
        })
    }

    #[must_use]
    pub fn webhook(event: impl Into<String>) -> Self {
        Self::IfThisThenThat(WebhookEffect {
            event: event.into(),
        })
    }

    #[must_use]
    pub fn notify(
        notifier: impl Into<String>,
        outlet: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        level: NotificationLevel,
    ) -> Self {
        Self::NotifierOutlet(NotifierOutletEffect {
            notifier: notifier.into(),
            outlet: outlet.into(),
            title: title.into(),
            message: message.into(),
            level,
        })
    }

    #[must_use]
    pub fn multi(effects: Vec<Effect>) -> Self {
        Self::Multi(MultiEffect { effects })
    }

    /// Flatten the tree into its leaves, each with its path from `root`.
    ///
    /// Paths read like `effect.effects[1].effects[0]`.
    #[must_use]
    pub fn leaves(&self, root: &str) -> Vec<(String, &Effect)> {
        let mut out = Vec::new();
        self.collect_leaves(root.to_string(), &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, path: String, out: &mut Vec<(String, &'a Effect)>) {
        match self {
            Self::Multi(multi) => {
                for (index, child) in multi.effects.iter().enumerate() {
                    child.collect_leaves(format!("{path}.effects[{index}]"), out);
                }
            }
            leaf => out.push((path, leaf)),
        }
    }

    /// Whether applying this tree schedules deferred work.
    #[must_use]
    pub fn has_pulse(&self) -> bool {
        match self {
            Self::Pulse(_) => true,
            Self::Multi(multi) => multi.effects.iter().any(Self::has_pulse),
            _ => false,
        }
    }

    /// Check structural invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyMultiEffect`] for a childless
    /// `MultiEffect` and [`ValidationError::ZeroPulseDuration`] for a pulse
    /// that would revert immediately.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Multi(multi) => {
                if multi.effects.is_empty() {
                    return Err(ValidationError::EmptyMultiEffect);
                }
                multi.effects.iter().try_for_each(Self::validate)
            }
            Self::Pulse(pulse) if pulse.duration_ms == 0 => {
                Err(ValidationError::ZeroPulseDuration)
            }
            _ => Ok(()),
        }
    }

    /// The `type` tag of this node.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Set(_) => "SetEffect",
            Self::Pulse(_) => "PulseEffect",
            Self::Action(_) => "ActionEffect",
            Self::IfThisThenThat(_) => "IfThisThenThatEffect",
            Self::NotifierOutlet(_) => "NotifierOutletEffect",
            Self::Multi(_) => "MultiEffect",
        }
    }
}

impl PulseEffect {
    /// Pick the value to write back once the pulse ends.
    ///
    /// `prior` is the property value read just before the pulse write.
    #[must_use]
    pub fn revert_for(&self, prior: Option<Value>) -> Option<Value> {
        if let Some(explicit) = &self.revert_value {
            return Some(explicit.clone());
        }
        if prior.is_some() {
            return prior;
        }
        self.value.as_bool().map(|on| Value::Bool(!on))
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Set(e) => write!(f, "set({} = {})", e.property, e.value),
            Self::Pulse(e) => write!(f, "pulse({} = {}, {}ms)", e.property, e.value, e.duration_ms),
            Self::Action(e) => write!(f, "action({}.{})", e.thing, e.action),
            Self::IfThisThenThat(e) => write!(f, "ifttt({})", e.event),
            Self::NotifierOutlet(e) => {
                write!(f, "notify({}/{}, {})", e.notifier, e.outlet, e.level)
            }
            Self::Multi(e) => write!(f, "multi({})", e.effects.len()),
        }
    }
}

/// One leaf that failed to apply.
#[derive(Debug)]
pub struct EffectFailure {
    /// Tree path of the leaf, e.g. `effect.effects[1]`.
    pub path: String,
    pub effect: &'static str,
    pub error: EffectError,
}

/// Aggregate outcome of applying an effect tree.
#[derive(Debug, Default)]
pub struct EffectReport {
    /// Number of leaves that applied successfully.
    pub applied: usize,
    pub failures: Vec<EffectFailure>,
}

impl EffectReport {
    pub fn record(&mut self, path: String, effect: &Effect, outcome: Result<(), EffectError>) {
        match outcome {
            Ok(()) => self.applied += 1,
            Err(error) => self.failures.push(EffectFailure {
                path,
                effect: effect.type_name(),
                error,
            }),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceError;
    use serde_json::json;

    fn light_on() -> Effect {
        Effect::set(PropertyRef::new("light", "on"), json!(true))
    }

    #[test]
    fn should_list_leaves_with_tree_paths() {
        let effect = Effect::multi(vec![
            light_on(),
            Effect::multi(vec![Effect::webhook("gateway"), light_on()]),
        ]);
        let paths: Vec<String> = effect.leaves("effect").into_iter().map(|(p, _)| p).collect();
        assert_eq!(
            paths,
            vec![
                "effect.effects[0]",
                "effect.effects[1].effects[0]",
                "effect.effects[1].effects[1]",
            ]
        );
    }

    #[test]
    fn should_treat_single_leaf_as_root_path() {
        let effect = light_on();
        let leaves = effect.leaves("effect");
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].0, "effect");
    }

    #[test]
    fn should_default_pulse_duration() {
        let json = json!({
            "type": "PulseEffect",
            "property": {"thing": "siren", "id": "on"},
            "value": true
        });
        let effect: Effect = serde_json::from_value(json).unwrap();
        let Effect::Pulse(pulse) = effect else {
            panic!("expected PulseEffect");
        };
        assert_eq!(pulse.duration_ms, 1000);
        assert!(pulse.revert_value.is_none());
    }

    #[test]
    fn should_prefer_explicit_revert_value() {
        let pulse = PulseEffect {
            property: PropertyRef::new("siren", "level"),
            value: json!(10),
            duration_ms: 500,
            revert_value: Some(json!(0)),
        };
        assert_eq!(pulse.revert_for(Some(json!(3))), Some(json!(0)));
    }

    #[test]
    fn should_revert_to_prior_value_then_negation() {
        let mut pulse = PulseEffect {
            property: PropertyRef::new("siren", "on"),
            value: json!(true),
            duration_ms: 500,
            revert_value: None,
        };
        assert_eq!(pulse.revert_for(Some(json!(true))), Some(json!(true)));
        assert_eq!(pulse.revert_for(None), Some(json!(false)));

        pulse.value = json!("loud");
        assert_eq!(pulse.revert_for(None), None);
    }

    #[test]
    fn should_reject_empty_multi_effect() {
        let nested = Effect::multi(vec![light_on(), Effect::multi(vec![])]);
        assert!(matches!(
            nested.validate(),
            Err(ValidationError::EmptyMultiEffect)
        ));
    }

    #[test]
    fn should_reject_zero_pulse_duration() {
        let effect = Effect::pulse(PropertyRef::new("siren", "on"), json!(true), 0);
        assert!(matches!(
            effect.validate(),
            Err(ValidationError::ZeroPulseDuration)
        ));
    }

    #[test]
    fn should_attribute_failures_in_report() {
        let effect = light_on();
        let mut report = EffectReport::default();
        report.record("effect.effects[0]".into(), &effect, Ok(()));
        report.record(
            "effect.effects[1]".into(),
            &effect,
            Err(DeviceError::Unreachable(ThingId::from("light")).into()),
        );

        assert_eq!(report.applied, 1);
        assert!(!report.is_success());
        assert_eq!(report.failures[0].path, "effect.effects[1]");
        assert_eq!(report.failures[0].effect, "SetEffect");
    }

    #[test]
    fn should_omit_null_action_parameters() {
        let effect = Effect::action("lock", "unlock", Value::Null);
        assert_eq!(
            serde_json::to_value(&effect).unwrap(),
            json!({"type": "ActionEffect", "thing": "lock", "action": "unlock"})
        );
    }

    #[test]
    fn should_display_effects() {
        assert_eq!(light_on().to_string(), "set(light.on = true)");
        assert_eq!(Effect::webhook("gateway").to_string(), "ifttt(gateway)");
        assert_eq!(
            Effect::notify("email", "me", "Door", "open", NotificationLevel::High).to_string(),
            "notify(email/me, high)"
        );
    }

    #[test]
    fn should_read_notifier_outlet_effect_with_numeric_level() {
        let json = json!({
            "type": "NotifierOutletEffect",
            "notifier": "email",
            "outlet": "me",
            "title": "Front door",
            "message": "The door was opened",
            "level": 2
        });
        let effect: Effect = serde_json::from_value(json.clone()).unwrap();
        let Effect::NotifierOutlet(notify) = &effect else {
            panic!("expected NotifierOutletEffect");
        };
        assert_eq!(notify.level, NotificationLevel::High);
        assert_eq!(notify.notification().title, "Front door");
        assert_eq!(serde_json::to_value(&effect).unwrap(), json);
    }

    #[test]
    fn should_reject_unknown_notification_level() {
        let json = json!({
            "type": "NotifierOutletEffect",
            "notifier": "email",
            "outlet": "me",
            "title": "t",
            "message": "m",
            "level": 7
        });
        assert!(serde_json::from_value::<Effect>(json).is_err());
    }

    #[test]
    fn should_list_notifier_outlet_as_leaf() {
        let effect = Effect::multi(vec![
            light_on(),
            Effect::notify("email", "me", "t", "m", NotificationLevel::Low),
        ]);
        let leaves = effect.leaves("effect");
        assert_eq!(leaves[1].1.type_name(), "NotifierOutletEffect");
    }
}
