//! Effect application for one fired rule.
//!
//! Each rising edge spawns one [`EffectTask`]. Leaves are applied in document
//! order; a failing leaf is recorded and the next one still runs. Pulse
//! reverts are spawned separately and honour the rule's cancellation token.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use thingrules_domain::error::EffectError;
use thingrules_domain::id::RuleId;
use thingrules_domain::property::PropertyRef;
use thingrules_domain::rule::{Effect, EffectReport, PulseEffect, template};

use crate::ports::{DeviceGateway, OutletNotifier, WebhookNotifier};

pub(crate) struct EffectTask<D, W, N> {
    pub rule: RuleId,
    pub effect: Effect,
    /// Value carried by the property change that fired the rule.
    pub trigger_value: Option<Value>,
    pub devices: Arc<D>,
    pub webhooks: Arc<W>,
    pub notifiers: Arc<N>,
    pub cancel: CancellationToken,
}

impl<D, W, N> EffectTask<D, W, N>
where
    D: DeviceGateway + 'static,
    W: WebhookNotifier + 'static,
    N: OutletNotifier + 'static,
{
    pub fn spawn(self) -> JoinHandle<EffectReport> {
        tokio::spawn(self.run())
    }

    async fn run(self) -> EffectReport {
        let mut report = EffectReport::default();
        for (path, leaf) in self.effect.leaves("effect") {
            let outcome = if self.cancel.is_cancelled() {
                Err(EffectError::Cancelled)
            } else {
                self.apply(leaf).await
            };
            if let Err(error) = &outcome {
                tracing::warn!(rule = %self.rule, %path, effect = %leaf, %error, "effect failed");
            }
            report.record(path, leaf, outcome);
        }
        tracing::debug!(
            rule = %self.rule,
            applied = report.applied,
            failed = report.failures.len(),
            "effects applied"
        );
        report
    }

    async fn apply(&self, leaf: &Effect) -> Result<(), EffectError> {
        match leaf {
            Effect::Set(set) => {
                let value = template::render(&set.value, self.trigger_value.as_ref());
                self.devices
                    .set_property_value(&set.property.thing, &set.property.id, value)
                    .await?;
            }
            Effect::Pulse(pulse) => self.pulse(pulse).await?,
            Effect::Action(action) => {
                self.devices
                    .request_action(&action.thing, &action.action, action.parameters.clone())
                    .await?;
            }
            Effect::IfThisThenThat(hook) => self.webhooks.notify(&hook.event).await?,
            Effect::NotifierOutlet(notify) => {
                self.notifiers
                    .notify(&notify.notifier, &notify.outlet, notify.notification())
                    .await?;
            }
            // `leaves` never yields composites.
            Effect::Multi(_) => {}
        }
        Ok(())
    }

    async fn pulse(&self, pulse: &PulseEffect) -> Result<(), EffectError> {
        let property = &pulse.property;
        let prior = self
            .devices
            .get_property_value(&property.thing, &property.id)
            .await;
        let value = template::render(&pulse.value, self.trigger_value.as_ref());
        self.devices
            .set_property_value(&property.thing, &property.id, value)
            .await?;

        let Some(revert) = pulse.revert_for(prior) else {
            tracing::warn!(rule = %self.rule, %property, "no revert value for pulse, property left as written");
            return Ok(());
        };
        tokio::spawn(revert_later(
            Arc::clone(&self.devices),
            self.cancel.clone(),
            self.rule,
            property.clone(),
            revert,
            Duration::from_millis(pulse.duration_ms),
        ));
        Ok(())
    }
}

async fn revert_later<D: DeviceGateway>(
    devices: Arc<D>,
    cancel: CancellationToken,
    rule: RuleId,
    property: PropertyRef,
    revert: Value,
    delay: Duration,
) {
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            tracing::debug!(%rule, %property, "pulse revert cancelled");
            return;
        }
        () = tokio::time::sleep(delay) => {}
    }
    if cancel.is_cancelled() {
        return;
    }
    match devices
        .set_property_value(&property.thing, &property.id, revert)
        .await
    {
        Ok(()) => tracing::debug!(%rule, %property, "pulse reverted"),
        Err(error) => tracing::warn!(%rule, %property, %error, "pulse revert failed"),
    }
}
