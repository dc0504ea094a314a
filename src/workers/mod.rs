pub mod harvest;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::{HarvestConfig, WorkerConfig};

pub use harvest::{BatchScheduler, HarvestError, RunReport, UserOutcome};

/// Upper bound for one scheduled harvest over the whole id range.
const WORKER_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

/// Drain period before scheduler shutdown to let in-flight tasks complete.
#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    Harvest,
}

impl WorkerName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Harvest => "harvest",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: WorkerName,
    pub cron: String,
    pub enabled: bool,
}

pub struct WorkerManager {
    scheduler: Arc<BatchScheduler>,
    shutdown_rx: broadcast::Receiver<()>,
    config: WorkerConfig,
    harvest: HarvestConfig,
}

impl WorkerManager {
    pub fn new(
        scheduler: Arc<BatchScheduler>,
        shutdown_rx: broadcast::Receiver<()>,
        config: &WorkerConfig,
        harvest: &HarvestConfig,
    ) -> Self {
        Self {
            scheduler,
            shutdown_rx,
            config: config.clone(),
            harvest: harvest.clone(),
        }
    }

    pub fn planned_jobs(&self) -> Vec<JobSpec> {
        vec![JobSpec {
            name: WorkerName::Harvest,
            cron: self.config.harvest_cron.clone(),
            enabled: self.config.schedule_enabled,
        }]
    }

    /// Start the cron scheduler and block until shutdown is broadcast.
    pub async fn start(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.planned_jobs().iter().any(|spec| spec.enabled) {
            tracing::info!("No scheduled workers enabled; skipping worker startup");
            return Ok(());
        }

        let mut scheduler = JobScheduler::new().await?;

        self.register_jobs(&scheduler).await;

        scheduler.start().await?;

        tracing::info!("Worker manager started");
        let _ = self.shutdown_rx.recv().await;

        tracing::info!(
            "Worker manager shutting down, draining for {}s",
            DRAIN_TIMEOUT.as_secs()
        );
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        let _ = scheduler.shutdown().await;
        Ok(())
    }

    async fn register_jobs(&self, scheduler: &JobScheduler) {
        for spec in &self.planned_jobs() {
            if !spec.enabled {
                tracing::info!(name = spec.name.as_str(), "Skipping disabled worker");
                continue;
            }

            let name_str = spec.name.as_str();
            match spec.name {
                WorkerName::Harvest => {
                    let batch = self.scheduler.clone();
                    let user_ids: Arc<[u64]> = self.harvest.user_ids().into();
                    let limit = self.harvest.concurrency_limit;
                    add_job(scheduler, &spec.cron, name_str, move || {
                        let batch = batch.clone();
                        let user_ids = user_ids.clone();
                        async move {
                            batch.run(&user_ids, limit).await;
                        }
                    })
                    .await;
                }
            }
            tracing::info!(name = name_str, cron = %spec.cron, "Registered worker");
        }
    }
}

/// Add a job to the scheduler with an overlap guard and timeout wrapper.
///
/// An invocation that fires while the previous one is still running is
/// skipped, so a single process never has two harvests writing at once.
async fn add_job<Fut, F>(scheduler: &JobScheduler, cron: &str, name: &'static str, mut run: F)
where
    F: FnMut() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(false));

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let guard = running.clone();

        if guard
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!(
                worker = name,
                "Skipping worker invocation: previous run still in progress"
            );
            return Box::pin(async {});
        }

        let fut = run();
        Box::pin(async move {
            if tokio::time::timeout(WORKER_TIMEOUT, fut).await.is_err() {
                tracing::error!(
                    worker = name,
                    timeout_secs = WORKER_TIMEOUT.as_secs(),
                    "Worker timed out"
                );
            }
            guard.store(false, Ordering::SeqCst);
        })
    });

    match job {
        Ok(job) => {
            if let Err(err) = scheduler.add(job).await {
                tracing::error!(error=%err, cron, worker = name, "Failed to add worker job");
            }
        }
        Err(err) => tracing::error!(error=%err, cron, worker = name, "Failed to create worker job"),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::source::{ChangesetSource, FetchOutcome, SourceError};
    use crate::store::Store;

    struct NoChangesets;

    #[async_trait]
    impl ChangesetSource for NoChangesets {
        async fn fetch(&self, _: u64, _: Option<u64>) -> Result<FetchOutcome, SourceError> {
            Ok(FetchOutcome::Empty)
        }
    }

    fn manager(dir: &tempfile::TempDir, enabled: bool) -> (WorkerManager, broadcast::Sender<()>) {
        let store = Arc::new(Store::open(dir.path().join("worker.sled").to_str().unwrap()).unwrap());
        let batch = Arc::new(BatchScheduler::new(store, Arc::new(NoChangesets)));
        let (tx, _) = broadcast::channel(2);
        let worker_cfg = WorkerConfig {
            schedule_enabled: enabled,
            harvest_cron: "0 0 3 * * *".to_string(),
        };
        let harvest_cfg = HarvestConfig {
            user_id_start: 1,
            user_id_end: 3,
            concurrency_limit: 2,
            run_on_start: false,
        };
        (
            WorkerManager::new(batch, tx.subscribe(), &worker_cfg, &harvest_cfg),
            tx,
        )
    }

    #[tokio::test]
    async fn schedule_switch_controls_harvest_job() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (disabled, _tx) = manager(&dir, false);
        let jobs = disabled.planned_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, WorkerName::Harvest);
        assert!(!jobs[0].enabled);
    }

    #[tokio::test]
    async fn disabled_start_returns_immediately() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (manager, _tx) = manager(&dir, false);
        manager
            .start()
            .await
            .expect("disabled start should succeed");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn enabled_manager_stops_on_shutdown() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (manager, tx) = manager(&dir, true);
        let handle = tokio::spawn(manager.start());
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).expect("send shutdown");
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("manager exits")
            .expect("task joins");
        assert!(result.is_ok());
    }

    #[test]
    fn worker_names_have_str() {
        assert_eq!(WorkerName::Harvest.as_str(), "harvest");
    }
}
