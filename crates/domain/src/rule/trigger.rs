//! Trigger: the condition tree that decides when a rule is active.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::event::DeviceEvent;
use crate::id::{RuleId, ThingId};
use crate::property::{Comparator, DeviceState, PropertyKey, PropertyRef};
use crate::time::parse_hh_mm;

/// Why a trigger tree is being evaluated.
#[derive(Debug, Clone, Copy)]
pub enum Cause<'a> {
    /// The device layer reported something.
    Device(&'a DeviceEvent),
    /// An inbound webhook call, addressed to one rule or to all of them.
    Webhook(Option<RuleId>),
    /// Periodic clock check.
    Tick,
    /// Follow-up pass after an edge-valued trigger fired: edge-valued leaves
    /// report `false` without touching their memory.
    Settle,
}

/// Everything a trigger may look at while evaluating.
pub struct Evaluation<'a> {
    /// Local wall-clock time.
    pub now: NaiveDateTime,
    pub cause: Cause<'a>,
    pub rule: RuleId,
    pub state: &'a dyn DeviceState,
}

/// What a trigger tree depends on; used to route events to rules.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Reference {
    Property(PropertyKey),
    Event { thing: ThingId, name: String },
    Clock,
    Webhook,
}

/// A boolean condition over device state or time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Trigger {
    #[serde(rename = "PropertyTrigger")]
    Property(PropertyTrigger),
    #[serde(rename = "TimeTrigger")]
    Time(TimeTrigger),
    #[serde(rename = "EventTrigger")]
    Event(EventTrigger),
    #[serde(rename = "AndTrigger")]
    And(Combinator),
    #[serde(rename = "OrTrigger")]
    Or(Combinator),
    #[serde(rename = "IfThisThenThatTrigger")]
    IfThisThenThat(WebhookTrigger),
}

/// True while a property satisfies a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyTrigger {
    pub property: PropertyRef,
    pub op: Comparator,
    #[serde(default)]
    pub value: Value,
    /// Last value seen, used by [`Comparator::Changed`].
    #[serde(skip)]
    last_seen: Option<Value>,
    #[serde(skip)]
    state: Option<bool>,
}

/// True once per day, during the minute the local clock reaches `time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeTrigger {
    /// `HH:MM`, local wall-clock time.
    pub time: String,
    /// Cleared only on documents persisted before times were stored locally;
    /// those are rewritten by the migrator on load.
    #[serde(default = "localized_by_default")]
    pub localized: bool,
    #[serde(skip)]
    last_fired: Option<NaiveDate>,
    #[serde(skip)]
    state: Option<bool>,
}

/// True for the single cycle caused by a matching device event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTrigger {
    pub thing: ThingId,
    pub event: String,
    #[serde(skip)]
    state: Option<bool>,
}

/// Children of an `AndTrigger`/`OrTrigger`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combinator {
    pub triggers: Vec<Trigger>,
    #[serde(skip)]
    state: Option<bool>,
}

/// True for the single cycle caused by an inbound webhook call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookTrigger {
    #[serde(skip)]
    state: Option<bool>,
}

fn localized_by_default() -> bool {
    true
}

impl Trigger {
    #[must_use]
    pub fn property(property: PropertyRef, op: Comparator, value: Value) -> Self {
        Self::Property(PropertyTrigger {
            property,
            op,
            value,
            last_seen: None,
            state: None,
        })
    }

    /// A time trigger expressed in local time.
    #[must_use]
    pub fn time(time: impl Into<String>) -> Self {
        Self::Time(TimeTrigger {
            time: time.into(),
            localized: true,
            last_fired: None,
            state: None,
        })
    }

    #[must_use]
    pub fn event(thing: impl Into<ThingId>, event: impl Into<String>) -> Self {
        Self::Event(EventTrigger {
            thing: thing.into(),
            event: event.into(),
            state: None,
        })
    }

    #[must_use]
    pub fn and(triggers: Vec<Trigger>) -> Self {
        Self::And(Combinator {
            triggers,
            state: None,
        })
    }

    #[must_use]
    pub fn or(triggers: Vec<Trigger>) -> Self {
        Self::Or(Combinator {
            triggers,
            state: None,
        })
    }

    #[must_use]
    pub fn webhook() -> Self {
        Self::IfThisThenThat(WebhookTrigger::default())
    }

    /// Result of the last evaluation, `None` before the first one.
    #[must_use]
    pub fn state(&self) -> Option<bool> {
        match self {
            Self::Property(t) => t.state,
            Self::Time(t) => t.state,
            Self::Event(t) => t.state,
            Self::And(c) | Self::Or(c) => c.state,
            Self::IfThisThenThat(t) => t.state,
        }
    }

    /// Evaluate the tree, updating each node's stored state.
    ///
    /// Combinators evaluate every child, even once the result is decided,
    /// so that stateful children keep their memory current.
    pub fn evaluate(&mut self, ctx: &Evaluation<'_>) -> bool {
        match self {
            Self::Property(t) => t.evaluate(ctx),
            Self::Time(t) => t.evaluate(ctx),
            Self::Event(t) => t.evaluate(ctx),
            Self::And(c) => {
                let result = c
                    .triggers
                    .iter_mut()
                    .fold(true, |acc, child| child.evaluate(ctx) & acc);
                c.state = Some(result);
                result
            }
            Self::Or(c) => {
                let result = c
                    .triggers
                    .iter_mut()
                    .fold(false, |acc, child| child.evaluate(ctx) | acc);
                c.state = Some(result);
                result
            }
            Self::IfThisThenThat(t) => {
                let result = match ctx.cause {
                    Cause::Webhook(None) => true,
                    Cause::Webhook(Some(target)) => target == ctx.rule,
                    _ => false,
                };
                t.state = Some(result);
                result
            }
        }
    }

    /// Collect everything this tree depends on.
    pub fn references(&self, out: &mut Vec<Reference>) {
        match self {
            Self::Property(t) => out.push(Reference::Property(t.property.key())),
            Self::Time(_) => out.push(Reference::Clock),
            Self::Event(t) => out.push(Reference::Event {
                thing: t.thing.clone(),
                name: t.event.clone(),
            }),
            Self::And(c) | Self::Or(c) => {
                for child in &c.triggers {
                    child.references(out);
                }
            }
            Self::IfThisThenThat(_) => out.push(Reference::Webhook),
        }
    }

    /// Properties that must be read before evaluating this tree.
    pub fn properties(&self, out: &mut Vec<PropertyKey>) {
        match self {
            Self::Property(t) => out.push(t.property.key()),
            Self::And(c) | Self::Or(c) => {
                for child in &c.triggers {
                    child.properties(out);
                }
            }
            Self::Time(_) | Self::Event(_) | Self::IfThisThenThat(_) => {}
        }
    }

    /// Whether the tree holds a trigger that is only true for one cycle.
    #[must_use]
    pub fn has_edge_valued(&self) -> bool {
        match self {
            Self::Property(t) => t.op == Comparator::Changed,
            Self::Time(_) | Self::Event(_) | Self::IfThisThenThat(_) => true,
            Self::And(c) | Self::Or(c) => c.triggers.iter().any(Self::has_edge_valued),
        }
    }

    /// Check structural invariants the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTime`] for a malformed `TimeTrigger`,
    /// [`ValidationError::UnlocalizedTime`] for one still in UTC and
    /// [`ValidationError::EmptyCombinator`] for a childless combinator.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Time(t) => {
                if parse_hh_mm(&t.time).is_none() {
                    return Err(ValidationError::InvalidTime(t.time.clone()));
                }
                if !t.localized {
                    return Err(ValidationError::UnlocalizedTime(t.time.clone()));
                }
                Ok(())
            }
            Self::And(c) | Self::Or(c) => {
                if c.triggers.is_empty() {
                    return Err(ValidationError::EmptyCombinator(self.type_name()));
                }
                c.triggers.iter().try_for_each(Self::validate)
            }
            Self::Property(_) | Self::Event(_) | Self::IfThisThenThat(_) => Ok(()),
        }
    }

    /// The `type` tag of this node.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Property(_) => "PropertyTrigger",
            Self::Time(_) => "TimeTrigger",
            Self::Event(_) => "EventTrigger",
            Self::And(_) => "AndTrigger",
            Self::Or(_) => "OrTrigger",
            Self::IfThisThenThat(_) => "IfThisThenThatTrigger",
        }
    }
}

impl PropertyTrigger {
    fn evaluate(&mut self, ctx: &Evaluation<'_>) -> bool {
        let result = if self.op == Comparator::Changed {
            self.evaluate_changed(ctx)
        } else {
            ctx.state
                .property_value(&self.property.thing, &self.property.id)
                .is_some_and(|current| self.op.compare(&current, &self.value))
        };
        self.state = Some(result);
        result
    }

    fn evaluate_changed(&mut self, ctx: &Evaluation<'_>) -> bool {
        match ctx.cause {
            Cause::Device(DeviceEvent::PropertyChanged {
                thing,
                property,
                value,
            }) if self.property.is(thing, property) => {
                let changed = self.last_seen.as_ref() != Some(value);
                self.last_seen = Some(value.clone());
                changed
            }
            Cause::Settle => false,
            _ => {
                if self.last_seen.is_none() {
                    self.last_seen = ctx
                        .state
                        .property_value(&self.property.thing, &self.property.id);
                }
                false
            }
        }
    }
}

impl TimeTrigger {
    fn evaluate(&mut self, ctx: &Evaluation<'_>) -> bool {
        let result = match (ctx.cause, parse_hh_mm(&self.time)) {
            (Cause::Settle, _) | (_, None) => false,
            (_, Some(target)) => {
                let now = ctx.now;
                let today = now.date();
                let same_minute = now.hour() == target.hour() && now.minute() == target.minute();
                if same_minute && self.last_fired != Some(today) {
                    self.last_fired = Some(today);
                    true
                } else {
                    false
                }
            }
        };
        self.state = Some(result);
        result
    }
}

impl EventTrigger {
    fn evaluate(&mut self, ctx: &Evaluation<'_>) -> bool {
        let result = matches!(
            ctx.cause,
            Cause::Device(DeviceEvent::Event { thing, name })
                if *thing == self.thing && *name == self.event
        );
        self.state = Some(result);
        result
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Property(t) => write!(f, "{} {} {}", t.property, t.op, t.value),
            Self::Time(t) => write!(f, "time({})", t.time),
            Self::Event(t) => write!(f, "event({}.{})", t.thing, t.event),
            Self::And(c) | Self::Or(c) => {
                let joiner = if matches!(self, Self::And(_)) { " and " } else { " or " };
                f.write_str("(")?;
                for (index, child) in c.triggers.iter().enumerate() {
                    if index > 0 {
                        f.write_str(joiner)?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
            Self::IfThisThenThat(_) => f.write_str("ifttt"),
        }
    }
}
