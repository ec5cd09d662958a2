use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use spuddns_application::ports::CachePersistence;
use spuddns_domain::{DomainError, HostsTable, ResolvConf};
use spuddns_jobs::{CachePersistJob, HostsWatchJob, ResolvConfWatchJob};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn resolv_conf_watch_picks_up_the_initial_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "nameserver 192.0.2.53\nsearch lan").unwrap();
    file.flush().unwrap();

    let shared = Arc::new(ArcSwap::from_pointee(ResolvConf::default()));
    let token = CancellationToken::new();
    let job = Arc::new(
        ResolvConfWatchJob::new(file.path().to_string_lossy().into_owned(), shared.clone())
            .with_cancellation(token.clone()),
    );
    let handle = tokio::spawn(job.start());

    let mut loaded = false;
    for _ in 0..50 {
        if !shared.load().nameservers.is_empty() {
            loaded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    token.cancel();
    let _ = handle.await;

    assert!(loaded, "watcher must load the file on its first tick");
    let snapshot = shared.load();
    assert_eq!(snapshot.nameservers, ["192.0.2.53"]);
    assert_eq!(snapshot.search, ["lan."]);
}

#[tokio::test]
async fn hosts_watch_publishes_a_snapshot() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "192.168.1.9 printer printer.lan").unwrap();
    file.flush().unwrap();

    let shared = Arc::new(ArcSwap::from_pointee(HostsTable::default()));
    let token = CancellationToken::new();
    let job = Arc::new(
        HostsWatchJob::new(file.path().to_string_lossy().into_owned(), shared.clone())
            .with_cancellation(token.clone()),
    );
    let handle = tokio::spawn(job.start());

    let mut loaded = false;
    for _ in 0..50 {
        if shared.load().a.contains_key("printer.lan.") {
            loaded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    token.cancel();
    let _ = handle.await;

    assert!(loaded);
}

#[derive(Default)]
struct RecordingPersistence {
    restored: Mutex<Vec<String>>,
    persisted: Mutex<Vec<String>>,
}

impl CachePersistence for RecordingPersistence {
    fn persist(&self, path: &str) -> Result<(), DomainError> {
        self.persisted.lock().unwrap().push(path.to_string());
        Ok(())
    }

    fn restore(&self, path: &str) -> Result<(), DomainError> {
        self.restored.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn persist_job_restores_immediately() {
    let persistence = Arc::new(RecordingPersistence::default());
    let token = CancellationToken::new();
    let job = Arc::new(
        CachePersistJob::new(persistence.clone(), "/tmp/spud-test-cache.json".to_string())
            .with_cancellation(token.clone()),
    );
    let handle = tokio::spawn(job.start());

    let mut restored = false;
    for _ in 0..50 {
        if !persistence.restored.lock().unwrap().is_empty() {
            restored = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    token.cancel();
    let _ = handle.await;

    assert!(restored, "restore must happen at job startup");
}
