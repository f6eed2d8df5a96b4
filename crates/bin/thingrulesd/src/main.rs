//! # thingrulesd: thingrules daemon
//!
//! Composition root that wires the adapters to the rule engine and runs it.
//!
//! ## Responsibilities
//! - Parse configuration (env vars, config file)
//! - Install the tracing subscriber
//! - Initialize the `SQLite` connection pool and run migrations
//! - Construct the device layer, the notifiers, the webhook notifier and the rule store
//! - Load (and migrate) stored rules into the engine
//! - Drive the engine from the device event feed and a periodic clock tick
//! - Shut down on Ctrl-C, cancelling pending scheduled effects
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer, no domain logic belongs here.

mod config;

use std::sync::Arc;

use thingrules_adapter_ifttt_reqwest::IftttWebhook;
use thingrules_adapter_storage_sqlite_sqlx::{Config as DbConfig, SqliteRuleStore};
use thingrules_adapter_virtual::{VirtualNotifiers, VirtualThings};
use thingrules_app::engine::RuleEngine;
use thingrules_app::event_bus::DeviceEventBus;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter)?)
        .init();

    // Database
    let db = DbConfig {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await?;
    let store = SqliteRuleStore::new(db.pool().clone());

    // Device layer
    let bus = Arc::new(DeviceEventBus::new(config.engine.event_capacity));
    let (things, notifiers) = if config.devices.demo {
        (
            VirtualThings::with_demo_things(Arc::clone(&bus)),
            VirtualNotifiers::with_demo_notifiers(),
        )
    } else {
        (VirtualThings::new(Arc::clone(&bus)), VirtualNotifiers::new())
    };

    // Outbound webhook
    let webhook = match config.ifttt_key() {
        Some(key) => IftttWebhook::new(&config.ifttt.base_url, Some(key.to_string()))?,
        None => {
            tracing::info!("no IFTTT key configured, webhook effects will fail");
            IftttWebhook::disabled()
        }
    };

    // Engine
    let engine = Arc::new(
        RuleEngine::new(store, things, webhook, notifiers).with_read_timeout(config.read_timeout()),
    );
    let report = engine.load().await?;
    for failure in &report.failed {
        tracing::error!(rule = %failure.key, error = %failure.error, "rule could not be loaded");
    }

    let feed = bus.feed();
    let runner = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.run(feed).await }
    });

    let ticker = tokio::spawn({
        let engine = Arc::clone(&engine);
        let period = config.tick_interval();
        async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let fired = engine.tick().await;
                if !fired.is_empty() {
                    tracing::debug!(fired = fired.len(), "clock tick fired rules");
                }
            }
        }
    });

    tracing::info!(
        rules = report.loaded.len(),
        tick_secs = config.engine.tick_interval_secs,
        "thingrulesd running"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    ticker.abort();
    engine.shutdown();
    runner.await?;

    Ok(())
}
