use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;

use changeset_stats::config::{Config, HarvestConfig, SourceConfig, WorkerConfig};
use changeset_stats::routes::build_router;
use changeset_stats::source::ChangesetSource;
use changeset_stats::state::AppState;
use changeset_stats::store::Store;
use changeset_stats::workers::BatchScheduler;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<Store>,
    pub scheduler: Arc<BatchScheduler>,
    _temp_dir: TempDir,
}

pub fn test_config(sled_path: String) -> Config {
    // Built directly so tests never race on process env vars.
    Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 8001,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path,
        cors_origin: "*".to_string(),
        source: SourceConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            user_agent: "changeset-stats-test".to_string(),
            max_connections: 4,
        },
        harvest: HarvestConfig {
            user_id_start: 1,
            user_id_end: 5,
            concurrency_limit: 4,
            run_on_start: false,
        },
        worker: WorkerConfig {
            schedule_enabled: false,
            harvest_cron: "0 0 3 * * *".to_string(),
        },
    }
}

pub fn spawn_test_app(source: Arc<dyn ChangesetSource>) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("changeset-test.sled");
    let config = test_config(sled_path.to_string_lossy().to_string());

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");

    let scheduler = Arc::new(BatchScheduler::new(store.clone(), source));
    let state = AppState::new(store.clone(), scheduler.clone(), &config);
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        store,
        scheduler,
        _temp_dir: temp_dir,
    }
}
