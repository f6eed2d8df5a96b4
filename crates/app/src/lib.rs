//! # thingrules-app
//!
//! Application layer: the rule engine, use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `DeviceGateway`: read properties, write properties, request actions
//!   - `RuleStore`: load/save/delete raw rule documents
//!   - `WebhookNotifier`: fire outward webhook events
//!   - `OutletNotifier`: deliver notifications through notifier outlets
//!   - `EventPublisher`: push device events into the engine
//! - Provide the **`RuleEngine`**: reverse index, edge detection, effect dispatch,
//!   scheduled-effect cancellation, startup migration of stored rules
//! - Define **driving/inbound ports** as use-case structs:
//!   - `RuleService`: create, update, delete, list, get, enable, webhook
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `thingrules-domain` only (plus `tokio` for channels, timers and tasks).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod engine;
pub mod event_bus;
pub mod ports;
pub mod services;
