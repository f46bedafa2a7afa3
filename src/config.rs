use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    Local,
    RemoteGpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanPolicy {
    Fail,
    Resume,
}

/// Process configuration, loaded once from the environment at startup. See
/// `spec.md` §6.4 for the options recognized here; defaults match the spec
/// verbatim. Fields below that line are ambient operational settings the
/// distilled spec does not mention but a deployable service still needs.
#[derive(Debug, Clone)]
pub struct Config {
    pub worker_concurrency: usize,
    pub backend_mode: BackendMode,
    pub claim_poll_interval: Duration,
    pub claim_poll_max: Duration,
    pub subscriber_queue_capacity: usize,
    pub websocket_keepalive: Duration,
    pub cancel_poll_interval: Duration,
    pub startup_orphan_policy: OrphanPolicy,

    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub blob_store_root: std::path::PathBuf,
    pub remote_gpu_base_url: Option<String>,
    pub remote_gpu_api_key: Option<String>,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let worker_concurrency = env_parse("WORKER_CONCURRENCY", 2usize)?;
        let backend_mode = match env::var("BACKEND_MODE").unwrap_or_else(|_| "local".to_string()).as_str() {
            "local" => BackendMode::Local,
            "remote-gpu" => BackendMode::RemoteGpu,
            other => anyhow::bail!("invalid BACKEND_MODE: {other} (expected local or remote-gpu)"),
        };
        let claim_poll_interval = Duration::from_millis(env_parse("CLAIM_POLL_INTERVAL_MS", 250u64)?);
        let claim_poll_max = Duration::from_millis(env_parse("CLAIM_POLL_MAX_MS", 5000u64)?);
        let subscriber_queue_capacity = env_parse("SUBSCRIBER_QUEUE_CAPACITY", 32usize)?;
        let websocket_keepalive = Duration::from_secs(env_parse("WEBSOCKET_KEEPALIVE_SEC", 30u64)?);
        let cancel_poll_interval = Duration::from_secs(env_parse("CANCEL_POLL_INTERVAL_SEC", 5u64)?);
        let startup_orphan_policy = match env::var("STARTUP_ORPHAN_POLICY").unwrap_or_else(|_| "fail".to_string()).as_str() {
            "fail" => OrphanPolicy::Fail,
            "resume" => OrphanPolicy::Resume,
            other => anyhow::bail!("invalid STARTUP_ORPHAN_POLICY: {other} (expected fail or resume)"),
        };

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://export_orchestrator.db".to_string());
        let bind_addr: SocketAddr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .context("invalid BIND_ADDR")?;
        let blob_store_root = env::var("BLOB_STORE_ROOT")
            .unwrap_or_else(|_| "./blob_store".to_string())
            .into();
        let remote_gpu_base_url = env::var("REMOTE_GPU_BASE_URL").ok();
        let remote_gpu_api_key = env::var("REMOTE_GPU_API_KEY").ok();
        let log_filter = env::var("LOG_FILTER")
            .unwrap_or_else(|_| "export_orchestrator=info,tower_http=info".to_string());

        if backend_mode == BackendMode::RemoteGpu && remote_gpu_base_url.is_none() {
            anyhow::bail!("BACKEND_MODE=remote-gpu requires REMOTE_GPU_BASE_URL");
        }

        Ok(Self {
            worker_concurrency: worker_concurrency.max(1),
            backend_mode,
            claim_poll_interval,
            claim_poll_max,
            subscriber_queue_capacity,
            websocket_keepalive,
            cancel_poll_interval,
            startup_orphan_policy,
            database_url,
            bind_addr,
            blob_store_root,
            remote_gpu_base_url,
            remote_gpu_api_key,
            log_filter,
        })
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_falls_back_to_default_when_unset() {
        // SAFETY: test-only, no concurrent env mutation in this process.
        unsafe {
            env::remove_var("FFUI_TEST_UNSET_VALUE");
        }
        let value: u64 = env_parse("FFUI_TEST_UNSET_VALUE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
