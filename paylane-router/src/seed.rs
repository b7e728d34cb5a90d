//! Marketplace entity seeding.
//!
//! Users, agents, and subscriptions are owned by the marketplace, not the
//! router; the router only reads them. A deployment syncs them in through
//! a seed file (`SEED_PATH`) at startup - a JSON document with `users`,
//! `agents`, and `subscriptions` arrays matching the model types.

use std::path::Path;

use serde::Deserialize;

use paylane::model::{Agent, Subscription, User};
use paylane_store::PaymentStore;

use crate::error::RouterError;

/// Seed file contents.
#[derive(Debug, Default, Deserialize)]
pub struct SeedData {
    /// Marketplace users.
    #[serde(default)]
    pub users: Vec<User>,
    /// Metered API agents.
    #[serde(default)]
    pub agents: Vec<Agent>,
    /// Existing subscriptions.
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
}

/// Loads a seed file and upserts its entities into the store.
pub async fn apply_seed_file(store: &PaymentStore, path: &Path) -> Result<(), RouterError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| RouterError::Configuration(format!("reading seed file: {e}")))?;
    let seed: SeedData = serde_json::from_str(&raw)
        .map_err(|e| RouterError::Configuration(format!("parsing seed file: {e}")))?;
    apply_seed(store, seed).await
}

/// Upserts seed entities into the store.
pub async fn apply_seed(store: &PaymentStore, seed: SeedData) -> Result<(), RouterError> {
    let (users, agents, subscriptions) =
        (seed.users.len(), seed.agents.len(), seed.subscriptions.len());
    for user in seed.users {
        store.seed_user(user).await?;
    }
    for agent in seed.agents {
        store.seed_agent(agent).await?;
    }
    for subscription in seed.subscriptions {
        store.upsert_subscription(subscription).await?;
    }
    tracing::info!(users, agents, subscriptions, "Applied seed data");
    Ok(())
}
