//! # thingrules-domain
//!
//! Pure domain model for the thingrules rule engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, time helpers
//! - Define **Device events** (property changes and named events pushed by things)
//! - Define **Property references** and the read-only device-state view
//! - Define **Rules**: trigger trees, effect trees and the activation state machine
//! - Upgrade legacy persisted rule documents (**migration**)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod event;
pub mod migration;
pub mod property;
pub mod rule;
