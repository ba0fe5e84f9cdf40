//! One watch cycle: check every registered endpoint and alert on state changes

use crate::clock::Clock;
use crate::checker::Checker;
use crate::dispatcher::AlertDispatcher;
use crate::errors::Result;
use crate::lock_store::LockStore;
use crate::models::{Endpoint, EndpointKind};
use crate::registry::SiteRegistry;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Counters for one pass over the registry
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CycleSummary {
    pub cycle_id: String,
    pub endpoints: usize,
    /// Endpoints without subscribers, never checked
    pub skipped: usize,
    pub checked: usize,
    pub down: usize,
    pub down_alerts: usize,
    /// Down results silenced by a fresh debounce lock
    pub suppressed: usize,
    pub up_alerts: usize,
}

/// Alert text for an endpoint changing state
pub fn alert_text(kind: EndpointKind, endpoint: &str, reachable: bool, at: DateTime<Utc>) -> String {
    let state = if reachable { "доступен" } else { "не доступен" };
    format!(
        "{} {} {}. {}",
        kind.noun(),
        endpoint,
        state,
        at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S %z")
    )
}

pub struct Watcher {
    registry: SiteRegistry,
    checker: Arc<dyn Checker>,
    locks: Arc<dyn LockStore>,
    dispatcher: AlertDispatcher,
    clock: Arc<dyn Clock>,
}

impl Watcher {
    pub fn new(
        registry: SiteRegistry,
        checker: Arc<dyn Checker>,
        locks: Arc<dyn LockStore>,
        dispatcher: AlertDispatcher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            checker,
            locks,
            dispatcher,
            clock,
        }
    }

    /// Process every endpoint in the registry once, sequentially.
    ///
    /// Check and delivery failures never abort the cycle; registry or lock
    /// store I/O failures do.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        let mut summary = CycleSummary {
            cycle_id: Uuid::new_v4().to_string(),
            ..Default::default()
        };

        let endpoints = self.registry.load().await?;
        summary.endpoints = endpoints.len();

        info!(
            "Starting watch cycle {} over {} endpoints from {}",
            summary.cycle_id,
            endpoints.len(),
            self.registry.dir().display()
        );

        for endpoint in &endpoints {
            if !endpoint.has_subscribers() {
                debug!("Skipping {}, no subscribers", endpoint.id);
                summary.skipped += 1;
                continue;
            }

            self.process_endpoint(endpoint, &mut summary).await?;
        }

        info!(
            "Watch cycle {} complete - checked: {}, down: {}, down alerts: {}, suppressed: {}, up alerts: {}",
            summary.cycle_id,
            summary.checked,
            summary.down,
            summary.down_alerts,
            summary.suppressed,
            summary.up_alerts
        );

        Ok(summary)
    }

    async fn process_endpoint(&self, endpoint: &Endpoint, summary: &mut CycleSummary) -> Result<()> {
        let result = self.checker.check(&endpoint.id).await;
        summary.checked += 1;

        if !result.reachable {
            summary.down += 1;

            if self.locks.is_locked(&endpoint.id).await? {
                debug!("{} is still down, alert already sent", endpoint.id);
                summary.suppressed += 1;
                return Ok(());
            }

            self.locks.acquire(&endpoint.id).await?;
            info!("{} {} is down, alerting {} subscribers", result.kind, endpoint.id, endpoint.subscribers.len());

            let text = alert_text(result.kind, &endpoint.id, false, self.clock.now());
            self.dispatcher.notify(&endpoint.subscribers, &text).await;
            summary.down_alerts += 1;
        } else if self.locks.release(&endpoint.id).await? {
            info!("{} {} is back up, alerting {} subscribers", result.kind, endpoint.id, endpoint.subscribers.len());

            let text = alert_text(result.kind, &endpoint.id, true, self.clock.now());
            self.dispatcher.notify(&endpoint.subscribers, &text).await;
            summary.up_alerts += 1;
        }

        Ok(())
    }
}
