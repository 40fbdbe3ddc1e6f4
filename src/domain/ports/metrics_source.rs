use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::CanaryMetrics;

/// Read-only access to live service metrics.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Error and success rates for the traffic routed to a canary.
    async fn canary_metrics(&self, proposal_id: Uuid) -> DomainResult<CanaryMetrics>;

    /// Average response time across the service, in milliseconds.
    async fn average_response_time_ms(&self) -> DomainResult<f64>;
}
