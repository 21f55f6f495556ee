//! Process health reporting, carried over from the shared webhook-worker
//! library's health registry: a small mpsc-fed background task keeps a
//! map of component name -> last-known status, and the scheduler's HTTP
//! surface renders it as a readiness/liveness probe response.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub components: HashMap<String, ComponentStatus>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.components
            .values()
            .all(|status| *status == ComponentStatus::Healthy)
    }
}

impl IntoResponse for HealthStatus {
    fn into_response(self) -> Response {
        let code = if self.is_healthy() {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (code, Json(self)).into_response()
    }
}

enum Report {
    Update { component: String, status: ComponentStatus },
}

/// A cheap, cloneable handle a single queue's scheduler loop uses to
/// report its own health every poll tick.
#[derive(Clone)]
pub struct HealthHandle {
    component: String,
    sender: mpsc::Sender<Report>,
}

impl HealthHandle {
    pub async fn report_healthy(&self) {
        let _unused = self
            .sender
            .send(Report::Update {
                component: self.component.clone(),
                status: ComponentStatus::Healthy,
            })
            .await;
    }

    pub async fn report_unhealthy(&self) {
        let _unused = self
            .sender
            .send(Report::Update {
                component: self.component.clone(),
                status: ComponentStatus::Unhealthy,
            })
            .await;
    }
}

/// Owns the shared status map and a background task draining report
/// updates into it. `handle_for` is cheap and can be called once per
/// queue at startup.
pub struct HealthRegistry {
    statuses: Arc<RwLock<HashMap<String, ComponentStatus>>>,
    sender: mpsc::Sender<Report>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        let statuses: Arc<RwLock<HashMap<String, ComponentStatus>>> =
            Arc::new(RwLock::new(HashMap::new()));
        let (sender, mut receiver) = mpsc::channel::<Report>(256);

        let worker_statuses = statuses.clone();
        tokio::spawn(async move {
            while let Some(report) = receiver.recv().await {
                let Report::Update { component, status } = report;
                worker_statuses.write().await.insert(component, status);
            }
        });

        Self { statuses, sender }
    }

    pub fn handle_for(&self, component: impl Into<String>) -> HealthHandle {
        HealthHandle {
            component: component.into(),
            sender: self.sender.clone(),
        }
    }

    pub async fn snapshot(&self) -> HealthStatus {
        HealthStatus {
            components: self.statuses.read().await.clone(),
        }
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_with_no_components() {
        let registry = HealthRegistry::new();
        let snapshot = registry.snapshot().await;
        assert!(snapshot.is_healthy());
        assert!(snapshot.components.is_empty());
    }

    #[tokio::test]
    async fn reports_update_the_snapshot() {
        let registry = HealthRegistry::new();
        let handle = registry.handle_for("webhooks-scheduler");
        handle.report_healthy().await;

        // give the background task a chance to drain the channel
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let snapshot = registry.snapshot().await;
        assert_eq!(
            snapshot.components.get("webhooks-scheduler"),
            Some(&ComponentStatus::Healthy)
        );
    }

    #[tokio::test]
    async fn one_unhealthy_component_fails_the_whole_snapshot() {
        let registry = HealthRegistry::new();
        registry.handle_for("a").report_healthy().await;
        registry.handle_for("b").report_unhealthy().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert!(!registry.snapshot().await.is_healthy());
    }
}
