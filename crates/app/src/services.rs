//! Application services: use-case implementations.
//!
//! Services take the engine (and through it the port implementations) by
//! constructor injection, keeping this layer decoupled from concrete adapters.

pub mod rule_service;
