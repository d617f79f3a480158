//! Health check.
//!
//! Reports whether the database answers. Used by load balancers and the
//! container runtime; no authentication.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServingStatus {
    Serving,
    NotServing,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: ServingStatus,
    pub database: &'static str,
    pub version: &'static str,
    pub server_time: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_serving(&self) -> bool {
        self.status == ServingStatus::Serving
    }
}

pub async fn check(state: &AppState) -> HealthReport {
    let database_up = state.db.health_check().await;
    if !database_up {
        warn!("Health check: database unreachable");
    }

    HealthReport {
        status: if database_up {
            ServingStatus::Serving
        } else {
            ServingStatus::NotServing
        },
        database: if database_up { "connected" } else { "unreachable" },
        version: env!("CARGO_PKG_VERSION"),
        server_time: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_state;

    #[tokio::test]
    async fn test_healthy_database() {
        let state = test_state().await;
        let report = check(&state).await;

        assert!(report.is_serving());
        assert_eq!(report.database, "connected");
    }

    #[tokio::test]
    async fn test_closed_pool_is_not_serving() {
        let state = test_state().await;
        state.db.pool().close().await;

        let report = check(&state).await;
        assert_eq!(report.status, ServingStatus::NotServing);
    }
}
