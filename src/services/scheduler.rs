//! Background loops: health checks, canary supervision and learning.
//!
//! All loops share one `watch` shutdown flag. The flag keeps its value, so
//! a canary watcher spawned after `stop` was signalled exits on its first
//! poll. `stop` raises the flag and then awaits every task, so a tick that
//! already started always finishes its writes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Config, LearningInsight, ProposalStatus};
use crate::domain::ports::{ProposalFilter, ProposalRepository};
use crate::services::learning_engine::LearningEngine;
use crate::services::rollback_manager::RollbackManager;
use crate::services::self_healing::SelfHealingMonitor;

/// Loop timings.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub health_interval: Duration,
    pub canary_discovery_interval: Duration,
    pub canary_poll_interval: Duration,
    pub learning_interval: Duration,
    pub auto_rollback: bool,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            health_interval: Duration::from_secs(config.monitor.check_interval_secs),
            canary_discovery_interval: Duration::from_secs(config.canary.discovery_interval_secs),
            canary_poll_interval: Duration::from_secs(config.canary.poll_interval_secs),
            learning_interval: Duration::from_secs(config.learning.interval_secs),
            auto_rollback: config.canary.auto_rollback,
        }
    }
}

pub struct AutonomyScheduler {
    repository: Arc<dyn ProposalRepository>,
    monitor: Arc<SelfHealingMonitor>,
    rollback: Arc<RollbackManager>,
    learning: Arc<LearningEngine>,
    settings: SchedulerSettings,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    latest_insight: Arc<RwLock<Option<LearningInsight>>>,
}

impl AutonomyScheduler {
    pub fn new(
        repository: Arc<dyn ProposalRepository>,
        monitor: Arc<SelfHealingMonitor>,
        rollback: Arc<RollbackManager>,
        learning: Arc<LearningEngine>,
        settings: SchedulerSettings,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            repository,
            monitor,
            rollback,
            learning,
            settings,
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
            latest_insight: Arc::new(RwLock::new(None)),
        }
    }

    /// Spawn the three loops. Fails if already running.
    pub async fn start(&self) -> DomainResult<()> {
        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            return Err(DomainError::ValidationFailed(
                "scheduler is already running".to_string(),
            ));
        }
        self.shutdown_tx.send_replace(false);
        handles.push(self.spawn_health_loop());
        handles.push(self.spawn_canary_supervisor());
        handles.push(self.spawn_learning_loop());
        tracing::info!(
            health_interval_secs = self.settings.health_interval.as_secs(),
            canary_poll_secs = self.settings.canary_poll_interval.as_secs(),
            learning_interval_secs = self.settings.learning_interval.as_secs(),
            "autonomy scheduler started"
        );
        Ok(())
    }

    /// Signal shutdown and wait for every loop to finish its current tick.
    pub async fn stop(&self) {
        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        if handles.is_empty() {
            return;
        }
        self.shutdown_tx.send_replace(true);
        for result in join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "scheduler task panicked");
            }
        }
        tracing::info!("autonomy scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        !self.handles.lock().await.is_empty()
    }

    /// Result of the most recent learning run.
    pub async fn latest_insight(&self) -> Option<LearningInsight> {
        self.latest_insight.read().await.clone()
    }

    fn spawn_health_loop(&self) -> JoinHandle<()> {
        let monitor = self.monitor.clone();
        let period = self.settings.health_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let report = monitor.run_cycle().await;
                        if !report.created.is_empty() {
                            tracing::warn!(
                                auto_fixes = report.created.len(),
                                "health check raised auto-fix proposals"
                            );
                        }
                    }
                    _ = shutdown_requested(&mut shutdown_rx) => break,
                }
            }
            tracing::debug!("health loop stopped");
        })
    }

    fn spawn_learning_loop(&self) -> JoinHandle<()> {
        let learning = self.learning.clone();
        let latest = self.latest_insight.clone();
        let period = self.settings.learning_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let insight = learning.analyze_patterns().await;
                        for recommendation in &insight.recommendations {
                            tracing::info!(%recommendation, "learning recommendation");
                        }
                        *latest.write().await = Some(insight);
                    }
                    _ = shutdown_requested(&mut shutdown_rx) => break,
                }
            }
            tracing::debug!("learning loop stopped");
        })
    }

    fn spawn_canary_supervisor(&self) -> JoinHandle<()> {
        let repository = self.repository.clone();
        let rollback = self.rollback.clone();
        let settings = self.settings;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let watcher_rx = shutdown_rx.clone();

        tokio::spawn(async move {
            let mut watchers: HashMap<Uuid, JoinHandle<()>> = HashMap::new();
            let mut interval = tokio::time::interval(settings.canary_discovery_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        watchers.retain(|_, handle| !handle.is_finished());
                        let canaries = match repository
                            .list(&ProposalFilter::with_statuses([ProposalStatus::CanaryDeployment]))
                            .await
                        {
                            Ok(found) => found,
                            Err(e) => {
                                tracing::error!(error = %e, "canary discovery failed");
                                continue;
                            }
                        };
                        for proposal in canaries {
                            if *watcher_rx.borrow() {
                                break;
                            }
                            if watchers.contains_key(&proposal.id) {
                                continue;
                            }
                            tracing::info!(proposal_id = %proposal.id, "watching canary");
                            let watcher = CanaryWatcher {
                                id: proposal.id,
                                repository: repository.clone(),
                                rollback: rollback.clone(),
                                settings,
                            };
                            watchers.insert(proposal.id, watcher.spawn(watcher_rx.clone()));
                        }
                    }
                    _ = shutdown_requested(&mut shutdown_rx) => break,
                }
            }
            join_all(watchers.into_values()).await;
            tracing::debug!("canary supervisor stopped");
        })
    }
}

/// Resolves once the shutdown flag is raised or the scheduler is dropped.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

struct CanaryWatcher {
    id: Uuid,
    repository: Arc<dyn ProposalRepository>,
    rollback: Arc<RollbackManager>,
    settings: SchedulerSettings,
}

enum WatchStep {
    Continue,
    Done,
}

impl CanaryWatcher {
    fn spawn(self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.settings.canary_poll_interval);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match self.step().await {
                            Ok(WatchStep::Continue) => {}
                            Ok(WatchStep::Done) => break,
                            Err(e) => {
                                tracing::error!(proposal_id = %self.id, error = %e, "canary check failed");
                            }
                        }
                    }
                    _ = shutdown_requested(&mut shutdown_rx) => break,
                }
            }
        })
    }

    async fn step(&self) -> DomainResult<WatchStep> {
        let still_canary = self
            .repository
            .get(self.id)
            .await?
            .is_some_and(|p| p.status == ProposalStatus::CanaryDeployment);
        if !still_canary {
            return Ok(WatchStep::Done);
        }

        let eval = self.rollback.monitor_canary(self.id).await?;
        if eval.metrics.is_none() {
            // Metrics unavailable. Keep the canary and look again next tick.
            return Ok(WatchStep::Continue);
        }

        if !eval.should_proceed {
            if !self.settings.auto_rollback {
                tracing::warn!(proposal_id = %self.id, reason = %eval.reason, "canary breached criteria");
                return Ok(WatchStep::Continue);
            }
            tracing::warn!(proposal_id = %self.id, reason = %eval.reason, "canary breached criteria, rolling back");
            let result = self.rollback.rollback(self.id).await?;
            if !result.success {
                tracing::error!(proposal_id = %self.id, message = %result.message, "canary rollback failed");
            }
            return Ok(WatchStep::Done);
        }

        if eval.window_elapsed {
            self.rollback.promote_canary(self.id).await?;
            return Ok(WatchStep::Done);
        }
        Ok(WatchStep::Continue)
    }
}
