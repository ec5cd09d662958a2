use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{CachePersistJob, HostsWatchJob, ResolvConfWatchJob};

pub trait SpawnableJob: Send + 'static {
    fn with_cancellation(self, token: CancellationToken) -> Self;
    fn start_job(self: Arc<Self>) -> tokio::task::JoinHandle<()>;
}

macro_rules! impl_spawnable_job {
    ($t:ty) => {
        impl SpawnableJob for $t {
            fn with_cancellation(self, token: CancellationToken) -> Self {
                self.with_cancellation(token)
            }

            fn start_job(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
                tokio::spawn(async move { self.start().await })
            }
        }
    };
}

impl_spawnable_job!(CachePersistJob);
impl_spawnable_job!(ResolvConfWatchJob);
impl_spawnable_job!(HostsWatchJob);

fn spawn_job<J: SpawnableJob>(job: Option<J>, shutdown: &Option<CancellationToken>) {
    if let Some(job) = job {
        let job = match shutdown {
            Some(token) => job.with_cancellation(token.clone()),
            None => job,
        };
        Arc::new(job).start_job();
    }
}

/// Collects the configured background jobs and launches them under one
/// shutdown token.
#[derive(Default)]
pub struct JobRunner {
    cache_persist: Option<CachePersistJob>,
    resolv_conf_watch: Option<ResolvConfWatchJob>,
    hosts_watch: Option<HostsWatchJob>,
    shutdown: Option<CancellationToken>,
}

impl JobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_persist(mut self, job: CachePersistJob) -> Self {
        self.cache_persist = Some(job);
        self
    }

    pub fn with_resolv_conf_watch(mut self, job: ResolvConfWatchJob) -> Self {
        self.resolv_conf_watch = Some(job);
        self
    }

    pub fn with_hosts_watch(mut self, job: HostsWatchJob) -> Self {
        self.hosts_watch = Some(job);
        self
    }

    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub async fn start(self) {
        info!("starting background job runner");

        spawn_job(self.cache_persist, &self.shutdown);
        spawn_job(self.resolv_conf_watch, &self.shutdown);
        spawn_job(self.hosts_watch, &self.shutdown);

        info!("all background jobs started");
    }
}
