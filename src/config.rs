use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub cors_origin: String,
    pub source: SourceConfig,
    pub harvest: HarvestConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub max_connections: usize,
}

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub user_id_start: u64,
    pub user_id_end: u64,
    pub concurrency_limit: usize,
    pub run_on_start: bool,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub schedule_enabled: bool,
    pub harvest_cron: String,
}

impl HarvestConfig {
    /// Inclusive id range; empty when the bounds are inverted.
    pub fn user_ids(&self) -> Vec<u64> {
        (self.user_id_start..=self.user_id_end).collect()
    }
}

impl Config {
    pub fn from_env() -> Self {
        let concurrency_limit = env_or_parse("CONCURRENT_REQUESTS", 100_usize).max(1);
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 8001_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/changeset-stats.sled"),
            cors_origin: env_or("CORS_ORIGIN", "*"),
            source: SourceConfig {
                base_url: env_or("SOURCE_BASE_URL", "https://opengeofiction.net"),
                timeout_secs: env_or_parse("SOURCE_TIMEOUT_SECS", 10_u64),
                user_agent: env_or(
                    "SOURCE_USER_AGENT",
                    concat!("changeset-stats/", env!("CARGO_PKG_VERSION")),
                ),
                max_connections: concurrency_limit,
            },
            harvest: HarvestConfig {
                user_id_start: env_or_parse("USER_ID_START", 1_u64),
                user_id_end: env_or_parse("USER_ID_END", 30_000_u64),
                concurrency_limit,
                run_on_start: env_or_bool("HARVEST_ON_START", false),
            },
            worker: WorkerConfig {
                schedule_enabled: env_or_bool("HARVEST_SCHEDULE_ENABLED", false),
                harvest_cron: env_or("HARVEST_CRON", "0 0 3 * * *"),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, OnceLock};

    use super::*;

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn managed_keys() -> &'static [&'static str] {
        &[
            "HOST",
            "PORT",
            "RUST_LOG",
            "SOURCE_TIMEOUT_SECS",
            "USER_ID_START",
            "USER_ID_END",
            "CONCURRENT_REQUESTS",
            "HARVEST_SCHEDULE_ENABLED",
        ]
    }

    fn clear_keys(keys: &[&str]) {
        for key in keys {
            env::remove_var(key);
        }
    }

    #[test]
    fn loads_defaults_when_missing() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 8001);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.source.timeout_secs, 10);
        assert_eq!(cfg.harvest.concurrency_limit, 100);
        assert_eq!(cfg.source.max_connections, 100);
        assert_eq!(cfg.harvest.user_id_start, 1);
        assert_eq!(cfg.harvest.user_id_end, 30_000);
        assert!(!cfg.worker.schedule_enabled);
    }

    #[test]
    fn parses_numeric_values() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("USER_ID_START", "3000");
        env::set_var("USER_ID_END", "3004");
        env::set_var("CONCURRENT_REQUESTS", "8");

        let cfg = Config::from_env();
        assert_eq!(cfg.harvest.user_ids(), vec![3000, 3001, 3002, 3003, 3004]);
        assert_eq!(cfg.harvest.concurrency_limit, 8);
        assert_eq!(cfg.source.max_connections, 8);
        clear_keys(managed_keys());
    }

    #[test]
    fn invalid_values_fall_back() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PORT", "bad");
        env::set_var("SOURCE_TIMEOUT_SECS", "x");
        env::set_var("CONCURRENT_REQUESTS", "0");

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 8001);
        assert_eq!(cfg.source.timeout_secs, 10);
        assert_eq!(cfg.harvest.concurrency_limit, 1);
        clear_keys(managed_keys());
    }

    #[test]
    fn inverted_range_is_empty() {
        let cfg = HarvestConfig {
            user_id_start: 10,
            user_id_end: 5,
            concurrency_limit: 1,
            run_on_start: false,
        };
        assert!(cfg.user_ids().is_empty());
    }
}
