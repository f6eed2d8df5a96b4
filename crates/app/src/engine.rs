//! Rule engine: owns the rule set and turns device events into effects.
//!
//! Every entry point (device events, webhook calls, clock ticks and
//! structural changes) takes the same intake lock, so rules are evaluated one
//! cause at a time, in arrival order. Trigger evaluation and the edge
//! transition happen under the lock; effects run afterwards as independent
//! tasks whose handles are returned to the caller.

mod dispatch;
pub mod index;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, NaiveDateTime};
use serde_json::Value;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use thingrules_domain::error::{NotFoundError, ThingRulesError, ValidationError};
use thingrules_domain::event::DeviceEvent;
use thingrules_domain::id::{RuleId, ThingId};
use thingrules_domain::migration::{Migration, migrate};
use thingrules_domain::property::{PropertyKey, StateSnapshot};
use thingrules_domain::rule::{
    Cause, Effect, EffectReport, Evaluation, Reference, Rule, Transition,
};
use thingrules_domain::time;

use crate::ports::{
    DeviceGateway, OutletNotifier, RuleStore, StoredRule, UnreadableRule, WebhookNotifier,
};
use dispatch::EffectTask;
use index::ReverseIndex;

/// A rule that rose during a dispatch, with its running effect application.
#[derive(Debug)]
pub struct FiredRule {
    pub rule_id: RuleId,
    pub outcome: JoinHandle<EffectReport>,
}

/// What happened to the stored rules at startup.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Rules registered with the engine.
    pub loaded: Vec<RuleId>,
    /// Rules whose document was upgraded and written back.
    pub migrated: Vec<RuleId>,
    /// Rules that could not be read, migrated or parsed.
    pub failed: Vec<LoadFailure>,
}

#[derive(Debug)]
pub struct LoadFailure {
    /// Key the rule is stored under.
    pub key: String,
    pub error: ThingRulesError,
}

impl LoadFailure {
    /// The rule id, when the stored key is a valid one.
    #[must_use]
    pub fn id(&self) -> Option<RuleId> {
        self.key.parse().ok()
    }
}

struct RuleSlot {
    rule: Rule,
    /// Cancels pending scheduled effects of this rule.
    cancel: CancellationToken,
}

#[derive(Default)]
struct EngineState {
    rules: BTreeMap<RuleId, RuleSlot>,
    index: ReverseIndex,
}

impl EngineState {
    fn register(&mut self, rule: Rule, cancel: CancellationToken) {
        if rule.enabled {
            self.index.insert(rule.id, rule.references());
        }
        self.rules.insert(rule.id, RuleSlot { rule, cancel });
    }

    fn unregister(&mut self, id: RuleId) -> Option<Rule> {
        self.index.remove(id);
        let slot = self.rules.remove(&id)?;
        slot.cancel.cancel();
        Some(slot.rule)
    }

    fn properties_of(&self, candidates: &BTreeSet<RuleId>) -> BTreeSet<PropertyKey> {
        let mut keys = Vec::new();
        for id in candidates {
            if let Some(slot) = self.rules.get(id) {
                slot.rule.trigger.properties(&mut keys);
            }
        }
        keys.into_iter().collect()
    }

    /// Evaluate `candidates` and return the rules that rose.
    fn evaluate(
        &mut self,
        candidates: &BTreeSet<RuleId>,
        cause: Cause<'_>,
        now: NaiveDateTime,
        snapshot: &StateSnapshot,
    ) -> Vec<(RuleId, Effect, CancellationToken)> {
        let mut risen = Vec::new();
        for id in candidates {
            let Some(slot) = self.rules.get_mut(id) else {
                continue;
            };
            if !slot.rule.enabled {
                continue;
            }
            let ctx = Evaluation {
                now,
                cause,
                rule: *id,
                state: snapshot,
            };
            let transition = slot.rule.evaluate(&ctx);
            if slot.rule.trigger.has_edge_valued() && slot.rule.trigger.state() == Some(true) {
                // Let momentary leaves drop back so the next occurrence rises again.
                slot.rule.evaluate(&Evaluation {
                    cause: Cause::Settle,
                    ..ctx
                });
            }
            match transition {
                Transition::Rise => {
                    tracing::info!(rule = %id, name = %slot.rule.name, "rule fired");
                    risen.push((*id, slot.rule.effect.clone(), slot.cancel.clone()));
                }
                Transition::Fall => tracing::debug!(rule = %id, "rule went idle"),
                Transition::Hold => {}
            }
        }
        risen
    }
}

/// How long a trigger waits for one property read before treating it as unavailable.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Event-driven rule engine.
pub struct RuleEngine<S, D, W, N> {
    store: S,
    devices: Arc<D>,
    webhooks: Arc<W>,
    notifiers: Arc<N>,
    state: Mutex<EngineState>,
    shutdown: CancellationToken,
    clock: fn() -> NaiveDateTime,
    utc_offset: fn() -> FixedOffset,
    read_timeout: Duration,
}

impl<S, D, W, N> RuleEngine<S, D, W, N>
where
    S: RuleStore,
    D: DeviceGateway + 'static,
    W: WebhookNotifier + 'static,
    N: OutletNotifier + 'static,
{
    /// Create an engine with no rules, reading the local clock.
    pub fn new(store: S, devices: D, webhooks: W, notifiers: N) -> Self {
        Self {
            store,
            devices: Arc::new(devices),
            webhooks: Arc::new(webhooks),
            notifiers: Arc::new(notifiers),
            state: Mutex::new(EngineState::default()),
            shutdown: CancellationToken::new(),
            clock: time::local_now,
            utc_offset: time::local_offset,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Bound each device read made while evaluating triggers.
    ///
    /// Reads happen under the intake lock, so a stalled device would
    /// otherwise hold up every other cause.
    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Replace the wall clock used by [`tick`](Self::tick) and device events.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the UTC offset used to localize legacy time triggers.
    #[must_use]
    pub fn with_utc_offset(mut self, utc_offset: fn() -> FixedOffset) -> Self {
        self.utc_offset = utc_offset;
        self
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Load every stored rule, migrating legacy documents on the way.
    ///
    /// Migrated documents are written back before the rule is registered.
    /// A rule that cannot be migrated or parsed is skipped and listed in the
    /// report; the others still load.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be read.
    pub async fn load(&self) -> Result<LoadReport, ThingRulesError> {
        let stored = self.store.load_rules().await?;
        let offset = (self.utc_offset)();
        let mut report = LoadReport::default();
        for row in stored {
            let StoredRule { id, document } = match row {
                Ok(stored) => stored,
                Err(UnreadableRule { key, error }) => {
                    tracing::warn!(%key, %error, "skipping unreadable stored rule");
                    report.failed.push(LoadFailure { key, error });
                    continue;
                }
            };
            match self.load_one(id, document, offset).await {
                Ok(migrated) => {
                    report.loaded.push(id);
                    if migrated {
                        report.migrated.push(id);
                    }
                }
                Err(error) => {
                    tracing::warn!(rule = %id, %error, "skipping stored rule");
                    report.failed.push(LoadFailure {
                        key: id.to_string(),
                        error,
                    });
                }
            }
        }
        tracing::info!(
            loaded = report.loaded.len(),
            migrated = report.migrated.len(),
            failed = report.failed.len(),
            "rules loaded"
        );
        Ok(report)
    }

    async fn load_one(
        &self,
        id: RuleId,
        mut document: Value,
        offset: FixedOffset,
    ) -> Result<bool, ThingRulesError> {
        let migration = migrate(&document, offset)?;
        let migrated = migration.is_migrated();
        if let Migration::Migrated(upgraded) = migration {
            self.store.save_rule(id, &upgraded).await?;
            tracing::info!(rule = %id, "migrated legacy rule document");
            document = upgraded;
        }
        if let Some(fields) = document.as_object_mut() {
            fields.insert("id".to_string(), Value::String(id.to_string()));
        }
        let rule = Rule::from_document(document)?;

        let mut state = self.state.lock().await;
        if state.rules.contains_key(&id) {
            return Err(ValidationError::DuplicateId(id).into());
        }
        state.register(rule, self.shutdown.child_token());
        Ok(migrated)
    }

    /// Consume the device event feed until it closes or the engine shuts down.
    pub async fn run(&self, mut feed: broadcast::Receiver<DeviceEvent>) {
        loop {
            let received = tokio::select! {
                () = self.shutdown.cancelled() => break,
                received = feed.recv() => received,
            };
            match received {
                Ok(event) => {
                    let fired = self.handle(&event).await;
                    tracing::debug!(%event, fired = fired.len(), "device event processed");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event feed lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::info!("rule engine stopped");
    }

    /// Cancel every pending scheduled effect and stop [`run`](Self::run).
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // ── Structural changes ──────────────────────────────────────────

    /// Persist and register a new rule.
    ///
    /// # Errors
    ///
    /// Returns [`ThingRulesError::Validation`] if the rule is invalid or its
    /// id is taken, or a storage error from the store.
    pub async fn add_rule(&self, rule: Rule) -> Result<RuleId, ThingRulesError> {
        rule.validate()?;
        let id = rule.id;
        let document = rule.to_document()?;

        let mut state = self.state.lock().await;
        if state.rules.contains_key(&id) {
            return Err(ValidationError::DuplicateId(id).into());
        }
        self.store.save_rule(id, &document).await?;
        state.register(rule, self.shutdown.child_token());
        tracing::info!(rule = %id, "rule added");
        Ok(id)
    }

    /// Replace the trees and fields of rule `id`.
    ///
    /// The replacement starts `Idle`; pending scheduled effects of the old
    /// definition are cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`ThingRulesError::NotFound`] for an unknown id,
    /// [`ThingRulesError::Validation`] for an invalid rule, or a storage
    /// error from the store.
    pub async fn update_rule(&self, id: RuleId, mut rule: Rule) -> Result<(), ThingRulesError> {
        rule.id = id;
        rule.validate()?;
        let document = rule.to_document()?;

        let mut state = self.state.lock().await;
        if !state.rules.contains_key(&id) {
            return Err(not_found(id));
        }
        self.store.save_rule(id, &document).await?;
        state.unregister(id);
        state.register(rule, self.shutdown.child_token());
        tracing::info!(rule = %id, "rule updated");
        Ok(())
    }

    /// Remove rule `id` and cancel its pending scheduled effects.
    ///
    /// # Errors
    ///
    /// Returns [`ThingRulesError::NotFound`] for an unknown id, or a storage
    /// error from the store.
    pub async fn delete_rule(&self, id: RuleId) -> Result<(), ThingRulesError> {
        let mut state = self.state.lock().await;
        if !state.rules.contains_key(&id) {
            return Err(not_found(id));
        }
        self.store.delete_rule(id).await?;
        state.unregister(id);
        tracing::info!(rule = %id, "rule deleted");
        Ok(())
    }

    /// Enable or disable rule `id`.
    ///
    /// Either way the rule goes back to `Idle`. Disabling cancels its
    /// pending scheduled effects.
    ///
    /// # Errors
    ///
    /// Returns [`ThingRulesError::NotFound`] for an unknown id, or a storage
    /// error from the store.
    pub async fn set_enabled(&self, id: RuleId, enabled: bool) -> Result<(), ThingRulesError> {
        let mut state = self.state.lock().await;
        let mut rule = match state.rules.get(&id) {
            Some(slot) if slot.rule.enabled == enabled => return Ok(()),
            Some(slot) => slot.rule.clone(),
            None => return Err(not_found(id)),
        };
        rule.enabled = enabled;
        rule.reset();
        self.store.save_rule(id, &rule.to_document()?).await?;
        state.unregister(id);
        state.register(rule, self.shutdown.child_token());
        tracing::info!(rule = %id, enabled, "rule toggled");
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub async fn get_rule(&self, id: RuleId) -> Option<Rule> {
        let state = self.state.lock().await;
        state.rules.get(&id).map(|slot| slot.rule.clone())
    }

    /// All rules, in id order.
    pub async fn list_rules(&self) -> Vec<Rule> {
        let state = self.state.lock().await;
        state.rules.values().map(|slot| slot.rule.clone()).collect()
    }

    // ── Dispatch ────────────────────────────────────────────────────

    /// Process one device event.
    pub async fn handle(&self, event: &DeviceEvent) -> Vec<FiredRule> {
        let reference = match event {
            DeviceEvent::PropertyChanged {
                thing, property, ..
            } => Reference::Property(PropertyKey {
                thing: thing.clone(),
                property: property.clone(),
            }),
            DeviceEvent::Event { thing, name } => Reference::Event {
                thing: thing.clone(),
                name: name.clone(),
            },
        };
        self.dispatch(Cause::Device(event), &reference, None, (self.clock)())
            .await
    }

    /// A property of `thing` was written.
    pub async fn on_property_changed(
        &self,
        thing: impl Into<ThingId>,
        property: impl Into<String>,
        value: Value,
    ) -> Vec<FiredRule> {
        self.handle(&DeviceEvent::property_changed(thing, property, value))
            .await
    }

    /// `thing` emitted the event `name`.
    pub async fn on_event(
        &self,
        thing: impl Into<ThingId>,
        name: impl Into<String>,
    ) -> Vec<FiredRule> {
        self.handle(&DeviceEvent::event(thing, name)).await
    }

    /// An inbound webhook call, for one rule or for every webhook rule.
    pub async fn on_webhook(&self, target: Option<RuleId>) -> Vec<FiredRule> {
        self.dispatch(Cause::Webhook(target), &Reference::Webhook, target, (self.clock)())
            .await
    }

    /// Re-evaluate rules holding a time trigger against the current clock.
    pub async fn tick(&self) -> Vec<FiredRule> {
        self.tick_at((self.clock)()).await
    }

    /// Re-evaluate rules holding a time trigger at the given local time.
    pub async fn tick_at(&self, now: NaiveDateTime) -> Vec<FiredRule> {
        self.dispatch(Cause::Tick, &Reference::Clock, None, now)
            .await
    }

    async fn dispatch(
        &self,
        cause: Cause<'_>,
        reference: &Reference,
        only: Option<RuleId>,
        now: NaiveDateTime,
    ) -> Vec<FiredRule> {
        let mut state = self.state.lock().await;
        let mut candidates = state.index.lookup(reference);
        if let Some(target) = only {
            candidates.retain(|id| *id == target);
        }
        if candidates.is_empty() {
            return Vec::new();
        }

        let keys = state.properties_of(&candidates);
        let snapshot = self.snapshot(keys, cause).await;
        let risen = state.evaluate(&candidates, cause, now, &snapshot);
        drop(state);

        let trigger_value = match cause {
            Cause::Device(DeviceEvent::PropertyChanged { value, .. }) => Some(value.clone()),
            _ => None,
        };
        risen
            .into_iter()
            .map(|(rule_id, effect, cancel)| FiredRule {
                rule_id,
                outcome: EffectTask {
                    rule: rule_id,
                    effect,
                    trigger_value: trigger_value.clone(),
                    devices: Arc::clone(&self.devices),
                    webhooks: Arc::clone(&self.webhooks),
                    notifiers: Arc::clone(&self.notifiers),
                    cancel,
                }
                .spawn(),
            })
            .collect()
    }

    /// Read each property once; the causing event supplies its own value.
    ///
    /// A read that outlasts the read timeout counts as unavailable.
    async fn snapshot(&self, keys: BTreeSet<PropertyKey>, cause: Cause<'_>) -> StateSnapshot {
        let mut snapshot = StateSnapshot::default();
        for key in keys {
            let value = match cause {
                Cause::Device(DeviceEvent::PropertyChanged {
                    thing,
                    property,
                    value,
                }) if key.thing == *thing && key.property == *property => Some(value.clone()),
                _ => self.read(&key).await,
            };
            match value {
                Some(value) => snapshot.insert(key, value),
                None => {
                    tracing::debug!(thing = %key.thing, property = %key.property, "property unavailable");
                }
            }
        }
        snapshot
    }

    async fn read(&self, key: &PropertyKey) -> Option<Value> {
        let read = self.devices.get_property_value(&key.thing, &key.property);
        if let Ok(value) = tokio::time::timeout(self.read_timeout, read).await {
            value
        } else {
            tracing::warn!(
                thing = %key.thing,
                property = %key.property,
                timeout_ms = self.read_timeout.as_millis(),
                "property read timed out"
            );
            None
        }
    }
}

fn not_found(id: RuleId) -> ThingRulesError {
    NotFoundError {
        entity: "Rule",
        id: id.to_string(),
    }
    .into()
}
