//! Rule service: JSON-document use-cases for clients of the engine.

use std::sync::Arc;

use serde_json::Value;
use thingrules_domain::error::{NotFoundError, ThingRulesError};
use thingrules_domain::id::RuleId;
use thingrules_domain::rule::Rule;

use crate::engine::RuleEngine;
use crate::ports::{DeviceGateway, OutletNotifier, RuleStore, WebhookNotifier};

/// Application service exposing rule management as current-format JSON documents.
pub struct RuleService<S, D, W, N> {
    engine: Arc<RuleEngine<S, D, W, N>>,
}

impl<S, D, W, N> RuleService<S, D, W, N>
where
    S: RuleStore,
    D: DeviceGateway + 'static,
    W: WebhookNotifier + 'static,
    N: OutletNotifier + 'static,
{
    /// Create a new service driving the given engine.
    pub fn new(engine: Arc<RuleEngine<S, D, W, N>>) -> Self {
        Self { engine }
    }

    /// Create a rule from a document. A missing `id` is generated.
    ///
    /// # Errors
    ///
    /// Returns [`ThingRulesError::Validation`] if the document is malformed
    /// or its id is taken, or a storage error.
    #[tracing::instrument(skip(self, document))]
    pub async fn create_rule(&self, document: Value) -> Result<Value, ThingRulesError> {
        let rule = Rule::from_document(document)?;
        let response = rule.to_document()?;
        self.engine.add_rule(rule).await?;
        Ok(response)
    }

    /// Look up a rule by id.
    ///
    /// # Errors
    ///
    /// Returns [`ThingRulesError::NotFound`] when no rule with `id` exists.
    #[tracing::instrument(skip(self))]
    pub async fn get_rule(&self, id: RuleId) -> Result<Value, ThingRulesError> {
        let rule = self.engine.get_rule(id).await.ok_or_else(|| NotFoundError {
            entity: "Rule",
            id: id.to_string(),
        })?;
        Ok(rule.to_document()?)
    }

    /// List all rules, in id order.
    ///
    /// # Errors
    ///
    /// Returns [`ThingRulesError::Validation`] if a rule fails to serialize.
    pub async fn list_rules(&self) -> Result<Vec<Value>, ThingRulesError> {
        self.engine
            .list_rules()
            .await
            .iter()
            .map(|rule| rule.to_document().map_err(ThingRulesError::from))
            .collect()
    }

    /// Replace rule `id` with the given document. The document's own `id`,
    /// if any, is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ThingRulesError::NotFound`] for an unknown id,
    /// [`ThingRulesError::Validation`] for a malformed document, or a storage
    /// error.
    #[tracing::instrument(skip(self, document))]
    pub async fn update_rule(&self, id: RuleId, document: Value) -> Result<Value, ThingRulesError> {
        let mut rule = Rule::from_document(document)?;
        rule.id = id;
        let response = rule.to_document()?;
        self.engine.update_rule(id, rule).await?;
        Ok(response)
    }

    /// Delete rule `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ThingRulesError::NotFound`] for an unknown id, or a storage
    /// error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_rule(&self, id: RuleId) -> Result<(), ThingRulesError> {
        self.engine.delete_rule(id).await
    }

    /// Enable or disable rule `id` and return its document.
    ///
    /// # Errors
    ///
    /// Returns [`ThingRulesError::NotFound`] for an unknown id, or a storage
    /// error.
    #[tracing::instrument(skip(self))]
    pub async fn set_enabled(&self, id: RuleId, enabled: bool) -> Result<Value, ThingRulesError> {
        self.engine.set_enabled(id, enabled).await?;
        self.get_rule(id).await
    }

    /// Deliver an inbound webhook call and return the ids of the rules it fired.
    ///
    /// # Errors
    ///
    /// Returns [`ThingRulesError::NotFound`] when `target` names an unknown rule.
    #[tracing::instrument(skip(self))]
    pub async fn webhook(&self, target: Option<RuleId>) -> Result<Vec<RuleId>, ThingRulesError> {
        if let Some(id) = target {
            self.engine.get_rule(id).await.ok_or_else(|| NotFoundError {
                entity: "Rule",
                id: id.to_string(),
            })?;
        }
        let fired = self.engine.on_webhook(target).await;
        Ok(fired.into_iter().map(|fired| fired.rule_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::future::Future;
    use std::sync::Mutex;

    use serde_json::json;
    use thingrules_domain::error::{DeviceError, EffectError, NotifierError, ValidationError};
    use thingrules_domain::id::ThingId;
    use thingrules_domain::rule::Notification;

    use crate::ports::{StoredRow, StoredRule};

    #[derive(Default)]
    struct InMemoryStore {
        documents: Mutex<HashMap<RuleId, Value>>,
    }

    impl RuleStore for InMemoryStore {
        fn load_rules(
            &self,
        ) -> impl Future<Output = Result<Vec<StoredRow>, ThingRulesError>> + Send {
            let rules = self
                .documents
                .lock()
                .unwrap()
                .iter()
                .map(|(id, document)| {
                    Ok(StoredRule {
                        id: *id,
                        document: document.clone(),
                    })
                })
                .collect();
            async { Ok(rules) }
        }

        fn save_rule(
            &self,
            id: RuleId,
            document: &Value,
        ) -> impl Future<Output = Result<(), ThingRulesError>> + Send {
            self.documents.lock().unwrap().insert(id, document.clone());
            async { Ok(()) }
        }

        fn delete_rule(
            &self,
            id: RuleId,
        ) -> impl Future<Output = Result<(), ThingRulesError>> + Send {
            self.documents.lock().unwrap().remove(&id);
            async { Ok(()) }
        }
    }

    struct NoDevices;

    impl DeviceGateway for NoDevices {
        fn get_property_value(
            &self,
            _thing: &ThingId,
            _property: &str,
        ) -> impl Future<Output = Option<Value>> + Send {
            async { None }
        }

        fn set_property_value(
            &self,
            thing: &ThingId,
            _property: &str,
            _value: Value,
        ) -> impl Future<Output = Result<(), DeviceError>> + Send {
            let err = DeviceError::ThingNotFound(thing.clone());
            async { Err(err) }
        }

        fn request_action(
            &self,
            thing: &ThingId,
            _action: &str,
            _parameters: Value,
        ) -> impl Future<Output = Result<(), DeviceError>> + Send {
            let err = DeviceError::ThingNotFound(thing.clone());
            async { Err(err) }
        }
    }

    struct SilentWebhook;

    impl WebhookNotifier for SilentWebhook {
        fn notify(&self, _event: &str) -> impl Future<Output = Result<(), EffectError>> + Send {
            async { Ok(()) }
        }
    }

    struct NoNotifiers;

    impl OutletNotifier for NoNotifiers {
        fn notify(
            &self,
            notifier: &str,
            _outlet: &str,
            _notification: Notification,
        ) -> impl Future<Output = Result<(), EffectError>> + Send {
            let err = NotifierError::NotifierNotFound(notifier.to_string());
            async { Err(err.into()) }
        }
    }

    fn service() -> RuleService<InMemoryStore, NoDevices, SilentWebhook, NoNotifiers> {
        let engine = RuleEngine::new(
            InMemoryStore::default(),
            NoDevices,
            SilentWebhook,
            NoNotifiers,
        );
        RuleService::new(Arc::new(engine))
    }

    fn webhook_rule() -> Value {
        json!({
            "name": "ping",
            "trigger": {"type": "IfThisThenThatTrigger"},
            "effect": {"type": "IfThisThenThatEffect", "event": "pong"}
        })
    }

    fn id_of(document: &Value) -> RuleId {
        document["id"].as_str().unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn should_create_rule_with_generated_id() {
        let svc = service();
        let created = svc.create_rule(webhook_rule()).await.unwrap();

        let id = id_of(&created);
        assert_eq!(created["enabled"], true);
        assert_eq!(svc.get_rule(id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn should_reject_malformed_document() {
        let svc = service();
        let result = svc
            .create_rule(json!({"trigger": {"type": "PropertyTrigger"}}))
            .await;
        assert!(matches!(
            result,
            Err(ThingRulesError::Validation(ValidationError::InvalidStructure(_)))
        ));
        assert!(svc.list_rules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_update_rule_under_path_id() {
        let svc = service();
        let id = id_of(&svc.create_rule(webhook_rule()).await.unwrap());

        let mut replacement = webhook_rule();
        replacement["id"] = json!(RuleId::new().to_string());
        replacement["name"] = json!("renamed");
        let updated = svc.update_rule(id, replacement).await.unwrap();

        assert_eq!(id_of(&updated), id);
        assert_eq!(svc.get_rule(id).await.unwrap()["name"], "renamed");
        assert_eq!(svc.list_rules().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn should_toggle_enabled_flag() {
        let svc = service();
        let id = id_of(&svc.create_rule(webhook_rule()).await.unwrap());

        let disabled = svc.set_enabled(id, false).await.unwrap();
        assert_eq!(disabled["enabled"], false);
        assert!(svc.webhook(None).await.unwrap().is_empty());

        svc.set_enabled(id, true).await.unwrap();
        assert_eq!(svc.webhook(Some(id)).await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn should_return_not_found_after_delete() {
        let svc = service();
        let id = id_of(&svc.create_rule(webhook_rule()).await.unwrap());

        svc.delete_rule(id).await.unwrap();

        assert!(matches!(
            svc.get_rule(id).await,
            Err(ThingRulesError::NotFound(_))
        ));
        assert!(matches!(
            svc.webhook(Some(id)).await,
            Err(ThingRulesError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn should_store_created_time_rule_as_localized() {
        let svc = service();
        let created = svc
            .create_rule(json!({
                "trigger": {"type": "TimeTrigger", "time": "07:30"},
                "effect": {"type": "IfThisThenThatEffect", "event": "wake"}
            }))
            .await
            .unwrap();

        assert_eq!(created["trigger"]["time"], "07:30");
        assert_eq!(created["trigger"]["localized"], true);
    }

    #[tokio::test]
    async fn should_reject_time_rule_marked_as_utc() {
        let svc = service();
        let result = svc
            .create_rule(json!({
                "trigger": {"type": "TimeTrigger", "time": "07:30", "localized": false},
                "effect": {"type": "IfThisThenThatEffect", "event": "wake"}
            }))
            .await;
        assert!(matches!(
            result,
            Err(ThingRulesError::Validation(ValidationError::UnlocalizedTime(_)))
        ));
    }

    #[tokio::test]
    async fn should_accept_notifier_outlet_rule() {
        let svc = service();
        let created = svc
            .create_rule(json!({
                "trigger": {"type": "IfThisThenThatTrigger"},
                "effect": {
                    "type": "NotifierOutletEffect",
                    "notifier": "email",
                    "outlet": "me",
                    "title": "Ping",
                    "message": "pong",
                    "level": 1
                }
            }))
            .await
            .unwrap();
        assert_eq!(created["effect"]["level"], 1);
    }
}
