//! Metrics collaborator adapters.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CanaryMetrics, MetricsConfig};
use crate::domain::ports::MetricsSource;

/// Reads live metrics from an HTTP metrics service.
///
/// Expects `GET {endpoint}/canaries/{id}` to return
/// `{"error_rate", "success_rate", "sample_size"}` and
/// `GET {endpoint}/response-time` to return `{"avg_response_time_ms"}`.
#[derive(Debug, Clone)]
pub struct HttpMetricsSource {
    http: Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct ResponseTimeBody {
    avg_response_time_ms: f64,
}

impl HttpMetricsSource {
    pub fn new(endpoint: &str, timeout: Duration) -> DomainResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::Metrics(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, path: &str) -> DomainResult<T> {
        let url = format!("{}/{}", self.endpoint, path);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| DomainError::Metrics(format!("GET {url} failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(DomainError::Metrics(format!(
                "GET {url} returned {}",
                resp.status()
            )));
        }

        resp.json::<T>()
            .await
            .map_err(|e| DomainError::Metrics(format!("GET {url} parse failed: {e}")))
    }
}

#[async_trait]
impl MetricsSource for HttpMetricsSource {
    async fn canary_metrics(&self, proposal_id: Uuid) -> DomainResult<CanaryMetrics> {
        self.fetch(&format!("canaries/{proposal_id}")).await
    }

    async fn average_response_time_ms(&self) -> DomainResult<f64> {
        let body: ResponseTimeBody = self.fetch("response-time").await?;
        Ok(body.avg_response_time_ms)
    }
}

/// Fixed metrics, used when no metrics service is configured and in tests.
pub struct StaticMetricsSource {
    default_canary: CanaryMetrics,
    canaries: RwLock<HashMap<Uuid, CanaryMetrics>>,
    response_time_ms: RwLock<f64>,
    failure: RwLock<Option<String>>,
}

impl Default for StaticMetricsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticMetricsSource {
    /// Healthy canaries and zero latency.
    pub fn new() -> Self {
        Self {
            default_canary: CanaryMetrics {
                error_rate: 0.0,
                success_rate: 1.0,
                sample_size: 0,
            },
            canaries: RwLock::new(HashMap::new()),
            response_time_ms: RwLock::new(0.0),
            failure: RwLock::new(None),
        }
    }

    pub async fn set_canary(&self, proposal_id: Uuid, metrics: CanaryMetrics) {
        self.canaries.write().await.insert(proposal_id, metrics);
    }

    pub async fn set_response_time_ms(&self, ms: f64) {
        *self.response_time_ms.write().await = ms;
    }

    /// Make every read fail with `message` (`None` clears it).
    pub async fn set_failure(&self, message: Option<&str>) {
        *self.failure.write().await = message.map(str::to_string);
    }

    async fn check_failure(&self) -> DomainResult<()> {
        match self.failure.read().await.as_ref() {
            Some(message) => Err(DomainError::Metrics(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MetricsSource for StaticMetricsSource {
    async fn canary_metrics(&self, proposal_id: Uuid) -> DomainResult<CanaryMetrics> {
        self.check_failure().await?;
        Ok(self
            .canaries
            .read()
            .await
            .get(&proposal_id)
            .copied()
            .unwrap_or(self.default_canary))
    }

    async fn average_response_time_ms(&self) -> DomainResult<f64> {
        self.check_failure().await?;
        Ok(*self.response_time_ms.read().await)
    }
}

/// Build the metrics source described by `config`.
pub fn metrics_source_from_config(
    config: &MetricsConfig,
) -> DomainResult<std::sync::Arc<dyn MetricsSource>> {
    Ok(match &config.endpoint {
        Some(endpoint) => std::sync::Arc::new(HttpMetricsSource::new(
            endpoint,
            Duration::from_secs(config.timeout_secs),
        )?),
        None => std::sync::Arc::new(StaticMetricsSource::new()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn test_http_canary_metrics() {
        let mut server = Server::new_async().await;
        let id = Uuid::new_v4();
        server
            .mock("GET", format!("/canaries/{id}").as_str())
            .with_status(200)
            .with_body(r#"{"error_rate":0.1,"success_rate":0.9,"sample_size":250}"#)
            .create_async()
            .await;

        let source = HttpMetricsSource::new(&server.url(), Duration::from_secs(5)).unwrap();
        let metrics = source.canary_metrics(id).await.unwrap();
        assert_eq!(metrics.sample_size, 250);
        assert!((metrics.error_rate - 0.1).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_http_error_status_is_metrics_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/response-time")
            .with_status(503)
            .create_async()
            .await;

        let source = HttpMetricsSource::new(&server.url(), Duration::from_secs(5)).unwrap();
        let err = source.average_response_time_ms().await.unwrap_err();
        assert!(matches!(err, DomainError::Metrics(_)));
    }

    #[tokio::test]
    async fn test_static_source_overrides() {
        let source = StaticMetricsSource::new();
        let id = Uuid::new_v4();
        assert_eq!(source.canary_metrics(id).await.unwrap().success_rate, 1.0);

        source
            .set_canary(
                id,
                CanaryMetrics {
                    error_rate: 0.2,
                    success_rate: 0.8,
                    sample_size: 10,
                },
            )
            .await;
        assert_eq!(source.canary_metrics(id).await.unwrap().error_rate, 0.2);

        source.set_failure(Some("scrape failed")).await;
        assert!(source.average_response_time_ms().await.is_err());
    }
}
