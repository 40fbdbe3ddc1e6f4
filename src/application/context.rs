//! Wiring of adapters into the collaborator ports.

use std::sync::Arc;

use thiserror::Error;

use crate::adapters::github::GitHubVersionControl;
use crate::adapters::metrics::metrics_source_from_config;
use crate::adapters::mock::MockVersionControl;
use crate::adapters::sqlite::{initialize_database, DatabaseError, SqliteProposalRepository};
use crate::domain::errors::DomainError;
use crate::domain::models::Config;
use crate::domain::ports::{Clock, MetricsSource, ProposalRepository, SystemClock, VersionControl};

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Failed to open proposal store: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to configure metrics source: {0}")]
    Metrics(#[source] DomainError),

    #[error("Version control is not usable: {0}")]
    VersionControl(String),
}

/// Everything the services need, resolved from configuration.
#[derive(Clone)]
pub struct AppContext {
    pub config: Config,
    pub repository: Arc<dyn ProposalRepository>,
    pub vcs: Arc<dyn VersionControl>,
    pub metrics: Arc<dyn MetricsSource>,
    pub clock: Arc<dyn Clock>,
}

impl AppContext {
    /// Open the configured store and collaborators.
    ///
    /// Without `version_control.owner`/`repo` an in-process recording fake
    /// stands in for the hosting provider, so reverts never leave the
    /// machine.
    pub async fn from_config(config: Config) -> Result<Self, ContextError> {
        let pool = initialize_database(&config.database).await?;
        let repository: Arc<dyn ProposalRepository> = Arc::new(SqliteProposalRepository::new(pool));

        let vcs: Arc<dyn VersionControl> = if config.version_control.is_configured() {
            Arc::new(
                GitHubVersionControl::from_env(&config.version_control)
                    .map_err(ContextError::VersionControl)?,
            )
        } else {
            tracing::warn!("version_control.owner/repo not set; using offline version control");
            Arc::new(MockVersionControl::new())
        };

        let metrics = metrics_source_from_config(&config.metrics).map_err(ContextError::Metrics)?;

        Ok(Self::from_parts(config, repository, vcs, metrics, Arc::new(SystemClock)))
    }

    pub fn from_parts(
        config: Config,
        repository: Arc<dyn ProposalRepository>,
        vcs: Arc<dyn VersionControl>,
        metrics: Arc<dyn MetricsSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            repository,
            vcs,
            metrics,
            clock,
        }
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_from_config_opens_store_offline() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.database.path = dir.path().join("autopilot.db").display().to_string();

        let ctx = AppContext::from_config(config).await.unwrap();
        let listed = ctx.repository.list(&Default::default()).await.unwrap();
        assert!(listed.is_empty());
    }

    #[test]
    fn test_from_config_requires_token_when_repo_configured() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.database.path = dir.path().join("autopilot.db").display().to_string();
        config.version_control.owner = "acme".to_string();
        config.version_control.repo = "shop".to_string();

        temp_env::with_var_unset("GITHUB_TOKEN", || {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let result = runtime.block_on(AppContext::from_config(config));
            assert!(matches!(result, Err(ContextError::VersionControl(_))));
        });
    }
}
