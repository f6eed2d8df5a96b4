//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the engine and the adapter
//! layer can depend on them without creating circular dependencies.

pub mod device;
pub mod event_bus;
pub mod notifier;
pub mod rule_store;
pub mod webhook;

pub use device::DeviceGateway;
pub use event_bus::EventPublisher;
pub use notifier::OutletNotifier;
pub use rule_store::{RuleStore, StoredRow, StoredRule, UnreadableRule};
pub use webhook::WebhookNotifier;
