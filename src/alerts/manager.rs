//! `RuleManager` holds the live rule set. Reload swaps in a new complete
//! snapshot via `arc-swap`-style atomic pointer replacement so readers
//! never observe a torn view — identical in spirit to how the teacher's
//! config layer treats its hot-reloadable fields.

use crate::alerts::store::RuleStore;
use crate::model::AlertRule;
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

pub struct RuleManager {
    rules: ArcSwap<Vec<AlertRule>>,
    store: Arc<RuleStore>,
}

impl RuleManager {
    /// Load the initial rule set at startup. Failure here is fatal — a
    /// processor with no rules loaded at all should not silently run with
    /// an empty set and look healthy.
    pub async fn load(store: Arc<RuleStore>) -> Result<Arc<Self>, sqlx::Error> {
        let rules = store.load_all().await?;
        info!(count = rules.len(), "alert rules loaded");
        Ok(Arc::new(Self {
            rules: ArcSwap::from_pointee(rules),
            store,
        }))
    }

    pub fn current(&self) -> Arc<Vec<AlertRule>> {
        self.rules.load_full()
    }

    async fn reload_once(&self) {
        match self.store.load_all().await {
            Ok(rules) => {
                debug!(count = rules.len(), "alert rules reloaded");
                self.rules.store(Arc::new(rules));
            }
            Err(e) => {
                // Rule-store unavailable: continue serving the last-loaded
                // snapshot rather than tearing it down.
                error!(err = %e, "alert rule reload failed — continuing with previous snapshot");
            }
        }
    }

    /// Spawn the background task that reloads the rule set at a fixed
    /// interval until the process exits.
    pub fn spawn_reload_task(self: Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                self.reload_once().await;
            }
        });
    }
}
