use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::services::interest::InterestProfiler;
use crate::services::recommendation::RecommendationService;
use crate::services::similarity::SimilarityEstimator;
use crate::services::store::{BehaviorStore, RecommendationStore, SimilarityStore};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Rows removed by one cleanup run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanupReport {
    pub behaviors: usize,
    pub similarity_edges: usize,
    pub recommendations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub running: bool,
    pub passes: u64,
    pub task_failures: u64,
    pub last_pass_at: Option<DateTime<Utc>>,
}

/// Everything a pass needs, cheap to clone into spawned tasks.
#[derive(Clone)]
struct PassContext {
    similarity: Arc<SimilarityEstimator>,
    profiler: Arc<InterestProfiler>,
    recommendations: Arc<RecommendationService>,
    behaviors: Arc<dyn BehaviorStore>,
    edges: Arc<dyn SimilarityStore>,
    stored_recommendations: Arc<dyn RecommendationStore>,
    config: Arc<Config>,
    counters: Arc<DashMap<&'static str, u64>>,
    last_pass_at: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl PassContext {
    fn increment(&self, counter: &'static str) {
        *self.counters.entry(counter).or_insert(0) += 1;
    }

    async fn refresh_similarities(&self) -> EngineResult<usize> {
        self.similarity
            .refresh_edges(self.config.worker.similarity_pool_size)
            .await
    }

    /// Refreshes interests and regenerates recommendations for every known
    /// user. A failing user is logged and skipped.
    async fn regenerate_recommendations(&self) -> EngineResult<usize> {
        let users = self
            .behaviors
            .list_users(self.config.worker.user_batch_limit)
            .await?;
        let total = users.len();
        let limit = self.config.recommendation.default_limit;

        let outcomes: Vec<bool> = stream::iter(users)
            .map(|user_id| {
                let ctx = self.clone();
                async move {
                    if let Err(e) = ctx.profiler.refresh(user_id).await {
                        warn!("Interest refresh failed for user {}: {}", user_id, e);
                    }
                    match ctx.recommendations.generate(user_id, limit).await {
                        Ok(_) => true,
                        Err(e) => {
                            warn!("Recommendation generation failed for user {}: {}", user_id, e);
                            false
                        }
                    }
                }
            })
            .buffer_unordered(self.config.worker.concurrency.max(1))
            .collect()
            .await;

        let regenerated = outcomes.into_iter().filter(|ok| *ok).count();
        info!("Regenerated recommendations for {}/{} users", regenerated, total);
        Ok(regenerated)
    }

    async fn cleanup(&self) -> EngineResult<CleanupReport> {
        let now = Utc::now();
        let worker = &self.config.worker;
        let report = CleanupReport {
            behaviors: self
                .behaviors
                .delete_older_than(now - Duration::days(worker.behavior_retention_days))
                .await?,
            similarity_edges: self
                .edges
                .delete_stale(now - Duration::days(worker.similarity_retention_days))
                .await?,
            recommendations: self.stored_recommendations.delete_expired(now).await?,
        };
        info!(
            "Cleanup removed {} behaviors, {} similarity edges, {} recommendations",
            report.behaviors, report.similarity_edges, report.recommendations
        );
        Ok(report)
    }

    /// Spawns the three maintenance tasks of one pass.
    fn spawn_pass(&self) -> Vec<JoinHandle<()>> {
        self.increment("passes");
        *self.last_pass_at.lock() = Some(Utc::now());

        let similarities = self.clone();
        let recommendations = self.clone();
        let cleanup = self.clone();
        vec![
            tokio::spawn(async move {
                if let Err(e) = similarities.refresh_similarities().await {
                    error!("Similarity refresh failed: {}", e);
                    similarities.increment("task_failures");
                }
            }),
            tokio::spawn(async move {
                if let Err(e) = recommendations.regenerate_recommendations().await {
                    error!("Recommendation regeneration failed: {}", e);
                    recommendations.increment("task_failures");
                }
            }),
            tokio::spawn(async move {
                if let Err(e) = cleanup.cleanup().await {
                    error!("Cleanup failed: {}", e);
                    cleanup.increment("task_failures");
                }
            }),
        ]
    }
}

/// Periodic maintenance loop: Stopped, then Running, then Stopped again.
pub struct RecommendationWorker {
    ctx: PassContext,
    running: Arc<AtomicBool>,
    shutdown: Mutex<Option<mpsc::Sender<oneshot::Sender<()>>>>,
}

impl RecommendationWorker {
    pub fn new(
        similarity: Arc<SimilarityEstimator>,
        profiler: Arc<InterestProfiler>,
        recommendations: Arc<RecommendationService>,
        behaviors: Arc<dyn BehaviorStore>,
        edges: Arc<dyn SimilarityStore>,
        stored_recommendations: Arc<dyn RecommendationStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            ctx: PassContext {
                similarity,
                profiler,
                recommendations,
                behaviors,
                edges,
                stored_recommendations,
                config,
                counters: Arc::new(DashMap::new()),
                last_pass_at: Arc::new(Mutex::new(None)),
            },
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts the loop. The first pass runs immediately.
    pub fn start(&self) -> EngineResult<JoinHandle<()>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::AlreadyRunning);
        }

        let (stop_tx, mut stop_rx) = mpsc::channel::<oneshot::Sender<()>>(1);
        *self.shutdown.lock() = Some(stop_tx);

        let ctx = self.ctx.clone();
        let running = self.running.clone();
        let period = std::time::Duration::from_secs(ctx.config.worker.interval_secs.max(1));
        info!("Starting recommendation worker, interval {:?}", period);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        ctx.spawn_pass();
                    }
                    ack = stop_rx.recv() => {
                        running.store(false, Ordering::SeqCst);
                        if let Some(ack) = ack {
                            let _ = ack.send(());
                        }
                        break;
                    }
                }
            }
            info!("Recommendation worker stopped");
        });

        Ok(handle)
    }

    /// Signals the loop and waits until it acknowledges.
    pub async fn stop(&self) -> EngineResult<()> {
        let stop_tx = self.shutdown.lock().take();
        let stop_tx = stop_tx.ok_or(EngineError::NotRunning)?;

        let (ack_tx, ack_rx) = oneshot::channel();
        if stop_tx.send(ack_tx).await.is_err() {
            self.running.store(false, Ordering::SeqCst);
            return Err(EngineError::NotRunning);
        }
        ack_rx.await.map_err(|_| EngineError::NotRunning)?;
        Ok(())
    }

    /// Spawns one full pass outside the schedule.
    pub fn process_all(&self) -> Vec<JoinHandle<()>> {
        self.ctx.spawn_pass()
    }

    pub async fn process_similarities_now(&self) -> EngineResult<usize> {
        self.ctx.refresh_similarities().await
    }

    pub async fn process_recommendations_now(&self) -> EngineResult<usize> {
        self.ctx.regenerate_recommendations().await
    }

    pub async fn cleanup_now(&self) -> EngineResult<CleanupReport> {
        self.ctx.cleanup().await
    }

    pub fn status(&self) -> WorkerStatus {
        let counter = |name: &str| self.ctx.counters.get(name).map(|v| *v).unwrap_or(0);
        WorkerStatus {
            running: self.is_running(),
            passes: counter("passes"),
            task_failures: counter("task_failures"),
            last_pass_at: *self.ctx.last_pass_at.lock(),
        }
    }
}
