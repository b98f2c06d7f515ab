mod reader;
use crate::{HistoryStore, InterfaceSnapshot, StatsResponse};
use chrono::Utc;
use parking_lot::RwLock;
pub use reader::{collect_stats, probe_tc_capability, CollectorConfig, QueueReaderError, TcCapability};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Slow subscribers that fall further behind than this skip ahead.
const PUBLISH_BUFFER: usize = 16;

/// Shared state between the poller and its readers: the rate history,
/// the most recent poll result and a channel announcing new ones.
pub struct QueueTracker {
    history: HistoryStore,
    latest: RwLock<Arc<StatsResponse>>,
    publisher: broadcast::Sender<Arc<StatsResponse>>,
}

impl QueueTracker {
    /// Creates an empty tracker keeping `history_capacity` samples per
    /// interface.
    pub fn new(history_capacity: usize) -> Self {
        let (publisher, _) = broadcast::channel(PUBLISH_BUFFER);
        Self {
            history: HistoryStore::new(history_capacity),
            latest: RwLock::new(Arc::new(StatsResponse::empty())),
            publisher,
        }
    }

    /// The most recent poll result.
    pub fn latest(&self) -> Arc<StatsResponse> {
        self.latest.read().clone()
    }

    /// Per-interface rate history.
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Receives every poll result from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StatsResponse>> {
        self.publisher.subscribe()
    }

    /// Records one poll's snapshots, stores the result as the latest and
    /// publishes it.
    pub fn ingest(&self, mut interfaces: Vec<InterfaceSnapshot>, interval: Duration) -> Arc<StatsResponse> {
        self.history.record(&mut interfaces, interval);
        let response = Arc::new(StatsResponse {
            interfaces,
            updated_at: Utc::now(),
        });
        *self.latest.write() = response.clone();
        // No subscribers is not an error
        let _ = self.publisher.send(response.clone());
        response
    }
}

/// Polls `tc` every `poll_interval` until `cancel` fires. The first poll
/// runs immediately. A collection that fails or outlives its timeout
/// skips that cycle, and a `tc` still running at that point is killed.
pub fn spawn_queue_monitor(
    tracker: Arc<QueueTracker>,
    collector: CollectorConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(collector.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Queue monitor polling every {:?}", collector.poll_interval);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Dropping the collection on timeout or cancel kills its `tc`.
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = time::timeout(collector.timeout, collect_stats(&collector)) => result,
            };

            match result {
                Ok(Ok(stats)) => {
                    let response = tracker.ingest(stats, collector.poll_interval);
                    debug!("Polled {} cake interfaces", response.interfaces.len());
                }
                Ok(Err(e)) => warn!("tc collection failed, skipping poll: {e}"),
                Err(_) => warn!(
                    "tc collection took longer than {:?}, skipping poll",
                    collector.timeout
                ),
            }
        }
        info!("Queue monitor stopped");
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn snapshot(iface: &str, sent: u64) -> InterfaceSnapshot {
        let mut s = InterfaceSnapshot::new(Utc::now());
        s.interface = iface.to_string();
        s.sent_bytes = sent;
        s
    }

    #[test]
    fn ingest_stores_and_publishes() {
        let tracker = QueueTracker::new(10);
        assert!(tracker.latest().interfaces.is_empty());
        let mut rx = tracker.subscribe();

        tracker.ingest(vec![snapshot("eth0", 100)], Duration::from_secs(1));
        let published = rx.try_recv().unwrap();
        assert_eq!(published.interfaces[0].interface, "eth0");
        assert_eq!(tracker.latest().interfaces.len(), 1);
        assert!(tracker.history().snapshot().is_empty());

        tracker.ingest(vec![snapshot("eth0", 200)], Duration::from_secs(1));
        assert_eq!(tracker.history().snapshot()["eth0"].len(), 1);
        assert!(tracker.latest().interfaces[0].tx_bytes_per_s > 0.0);
    }

    #[test]
    fn ingest_without_subscribers() {
        let tracker = QueueTracker::new(10);
        let response = tracker.ingest(Vec::new(), Duration::from_secs(1));
        assert!(response.interfaces.is_empty());
    }

    #[tokio::test]
    async fn monitor_stops_on_cancel() {
        let tracker = Arc::new(QueueTracker::new(10));
        let collector = CollectorConfig {
            tc_binary: "/nonexistent/tc-binary".to_string(),
            capability: TcCapability::default(),
            prefer_json: false,
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_millis(500),
        };
        let cancel = CancellationToken::new();
        let handle = spawn_queue_monitor(tracker.clone(), collector, cancel.clone());
        time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
        // Every poll failed, so nothing was ingested.
        assert!(tracker.latest().interfaces.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn hung_tc_does_not_pile_up() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let pids = dir.path().join("pids");
        let script = dir.path().join("tc");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho $$ >> {}\nexec sleep 30\n", pids.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let tracker = Arc::new(QueueTracker::new(10));
        let collector = CollectorConfig {
            tc_binary: script.display().to_string(),
            capability: TcCapability::default(),
            prefer_json: false,
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_millis(100),
        };
        let cancel = CancellationToken::new();
        let handle = spawn_queue_monitor(tracker, collector, cancel.clone());
        time::sleep(Duration::from_millis(600)).await;
        cancel.cancel();
        time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
        time::sleep(Duration::from_millis(200)).await;

        let started = std::fs::read_to_string(&pids).unwrap_or_default();
        let alive: Vec<&str> = started
            .lines()
            .filter(|pid| {
                std::fs::read_to_string(format!("/proc/{pid}/stat"))
                    .map(|stat| {
                        stat.rsplit_once(')')
                            .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
                            .unwrap_or(false)
                    })
                    .unwrap_or(false)
            })
            .collect();
        assert!(alive.is_empty(), "tc processes left running: {alive:?}");
    }
}
