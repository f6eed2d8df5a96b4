//! Rule: a trigger tree paired with an effect tree.
//!
//! A [`Rule`] watches its [`Trigger`] and applies its [`Effect`] on every
//! rising edge (`Idle → Active`). Falling edges are silent. Rules come either
//! from a JSON document ([`Rule::from_document`]) or from a [`RuleBuilder`];
//! both run the same validation.

mod effect;
pub mod template;
mod trigger;

pub use effect::{
    ActionEffect, Effect, EffectFailure, EffectReport, MultiEffect, Notification,
    NotificationLevel, NotifierOutletEffect, PulseEffect, SetEffect, WebhookEffect,
};
pub use trigger::{
    Cause, Combinator, EventTrigger, Evaluation, PropertyTrigger, Reference, TimeTrigger, Trigger,
    WebhookTrigger,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::id::RuleId;

/// Activation state of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Last trigger result was `false`.
    Idle,
    /// Last trigger result was `true`.
    Active,
}

/// Outcome of feeding one trigger result into the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `Idle → Active`: the effect must be applied.
    Rise,
    /// `Active → Idle`.
    Fall,
    /// No change.
    Hold,
}

/// A named trigger/effect pair with edge-detection state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default)]
    pub id: RuleId,
    #[serde(default)]
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub trigger: Trigger,
    pub effect: Effect,
    #[serde(skip)]
    last_trigger_state: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl Rule {
    /// Create a builder for constructing a [`Rule`].
    #[must_use]
    pub fn builder() -> RuleBuilder {
        RuleBuilder::default()
    }

    /// Parse and validate a current-format rule document.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidStructure`] when the document does
    /// not match the rule shape, or any error from [`Rule::validate`].
    pub fn from_document(document: Value) -> Result<Self, ValidationError> {
        let rule: Self =
            serde_json::from_value(document).map_err(ValidationError::InvalidStructure)?;
        rule.validate()?;
        Ok(rule)
    }

    /// Serialize to the persisted document shape.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidStructure`] if serialization fails.
    pub fn to_document(&self) -> Result<Value, ValidationError> {
        serde_json::to_value(self).map_err(ValidationError::InvalidStructure)
    }

    /// Check structural invariants of both trees.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found in the trigger tree, then
    /// in the effect tree.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.trigger.validate()?;
        self.effect.validate()
    }

    #[must_use]
    pub fn activation(&self) -> Activation {
        if self.last_trigger_state {
            Activation::Active
        } else {
            Activation::Idle
        }
    }

    /// Record a trigger result and report the resulting transition.
    pub fn observe(&mut self, result: bool) -> Transition {
        let previous = std::mem::replace(&mut self.last_trigger_state, result);
        match (previous, result) {
            (false, true) => Transition::Rise,
            (true, false) => Transition::Fall,
            _ => Transition::Hold,
        }
    }

    /// Evaluate the trigger tree and feed the result into the state machine.
    pub fn evaluate(&mut self, ctx: &Evaluation<'_>) -> Transition {
        let result = self.trigger.evaluate(ctx);
        self.observe(result)
    }

    /// Go back to [`Activation::Idle`] without firing anything.
    pub fn reset(&mut self) {
        self.last_trigger_state = false;
    }

    /// Distinct references of the trigger tree, sorted.
    #[must_use]
    pub fn references(&self) -> Vec<Reference> {
        let mut refs = Vec::new();
        self.trigger.references(&mut refs);
        refs.sort();
        refs.dedup();
        refs
    }
}

/// Step-by-step builder for [`Rule`].
#[derive(Debug, Default)]
pub struct RuleBuilder {
    id: Option<RuleId>,
    name: Option<String>,
    enabled: Option<bool>,
    trigger: Option<Trigger>,
    effect: Option<Effect>,
}

impl RuleBuilder {
    #[must_use]
    pub fn id(mut self, id: RuleId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    #[must_use]
    pub fn effect(mut self, effect: Effect) -> Self {
        self.effect = Some(effect);
        self
    }

    /// Consume the builder, validate, and return a [`Rule`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingTrigger`] or
    /// [`ValidationError::MissingEffect`] if a tree is absent, or any error
    /// from [`Rule::validate`].
    pub fn build(self) -> Result<Rule, ValidationError> {
        let rule = Rule {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            enabled: self.enabled.unwrap_or(true),
            trigger: self.trigger.ok_or(ValidationError::MissingTrigger)?,
            effect: self.effect.ok_or(ValidationError::MissingEffect)?,
            last_trigger_state: false,
        };
        rule.validate()?;
        Ok(rule)
    }
}
