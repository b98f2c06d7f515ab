//! Per-interface rate history. The poller is the only writer; web
//! handlers read copies through [`HistoryStore::snapshot`].

use crate::InterfaceSnapshot;
use cake_config::MIN_HISTORY_CAPACITY;
use cake_utils::{ring_buffer::RingBuffer, units::parse_delay_ms};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};
use tracing::debug;

/// One point on an interface's time series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    /// Unix timestamp, seconds
    #[serde(rename = "t")]
    pub timestamp: i64,
    /// Bytes transmitted per second
    #[serde(rename = "tx")]
    pub tx_bytes_per_s: f64,
    /// Largest average delay across tiers (ms)
    #[serde(rename = "av")]
    pub max_av_delay_ms: f64,
    /// Largest peak delay across tiers (ms)
    #[serde(rename = "pk")]
    pub max_pk_delay_ms: f64,
    /// Drops per second
    #[serde(rename = "dr")]
    pub drops_per_s: f64,
}

struct IfaceState {
    prev_tx_bytes: u64,
    prev_dropped: u64,
    prev_time: DateTime<Utc>,
    samples: RingBuffer<HistorySample>,
}

/// Rate engine and bounded history for every interface seen in the
/// most recent poll.
pub struct HistoryStore {
    capacity: usize,
    interfaces: RwLock<HashMap<String, IfaceState>>,
}

impl HistoryStore {
    /// Creates a store keeping `capacity` samples per interface. Values
    /// below the minimum are raised to it.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(MIN_HISTORY_CAPACITY),
            interfaces: RwLock::new(HashMap::new()),
        }
    }

    /// Samples kept per interface.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Folds one poll's snapshots into the history and fills in their
    /// derived rate and delay fields. `interval` is the nominal poll
    /// period, used when the clock gives no usable elapsed time.
    pub fn record(&self, snapshots: &mut [InterfaceSnapshot], interval: Duration) {
        self.record_at(snapshots, interval, Utc::now());
    }

    pub(crate) fn record_at(
        &self,
        snapshots: &mut [InterfaceSnapshot],
        interval: Duration,
        now: DateTime<Utc>,
    ) {
        let mut interfaces = self.interfaces.write();
        let mut seen: HashSet<String> = HashSet::new();

        for snapshot in snapshots.iter_mut() {
            // Unmerged queues of one device share a name. Only the first
            // of them feeds the history.
            if !seen.insert(snapshot.interface.clone()) {
                debug!("{} appears more than once in this poll, skipping", snapshot.interface);
                continue;
            }
            let tx_bytes = snapshot.tx_bytes();
            if !interfaces.contains_key(&snapshot.interface) {
                interfaces.insert(
                    snapshot.interface.clone(),
                    IfaceState {
                        prev_tx_bytes: tx_bytes,
                        prev_dropped: snapshot.dropped,
                        prev_time: now,
                        samples: RingBuffer::new(self.capacity),
                    },
                );
                continue;
            }
            let Some(state) = interfaces.get_mut(&snapshot.interface) else {
                continue;
            };

            let mut elapsed = (now - state.prev_time)
                .to_std()
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            if elapsed <= 0.0 {
                elapsed = interval.as_secs_f64();
            }

            let tx_rate = rate(state.prev_tx_bytes, tx_bytes, elapsed);
            let drop_rate = rate(state.prev_dropped, snapshot.dropped, elapsed);
            let av_ms = max_delay_ms(snapshot, |t| t.av_delay.as_str());
            let pk_ms = max_delay_ms(snapshot, |t| t.pk_delay.as_str());

            snapshot.tx_bytes_per_s = tx_rate;
            snapshot.drops_per_s = drop_rate;
            snapshot.max_av_delay_ms = av_ms;
            snapshot.max_pk_delay_ms = pk_ms;

            state.samples.push(HistorySample {
                timestamp: now.timestamp(),
                tx_bytes_per_s: tx_rate,
                max_av_delay_ms: av_ms,
                max_pk_delay_ms: pk_ms,
                drops_per_s: drop_rate,
            });
            state.prev_tx_bytes = tx_bytes;
            state.prev_dropped = snapshot.dropped;
            state.prev_time = now;
        }

        interfaces.retain(|name, _| snapshots.iter().any(|s| &s.interface == name));
    }

    /// Copies out every interface's samples, oldest first. Interfaces
    /// that have only been seen once have no samples and are left out.
    pub fn snapshot(&self) -> HashMap<String, Vec<HistorySample>> {
        self.interfaces
            .read()
            .iter()
            .filter(|(_, state)| !state.samples.is_empty())
            .map(|(name, state)| (name.clone(), state.samples.ordered()))
            .collect()
    }
}

/// Per-second change of a monotonic counter. A counter that went
/// backwards (interface reset) gives 0.
fn rate(previous: u64, current: u64, elapsed_secs: f64) -> f64 {
    match current.checked_sub(previous) {
        Some(delta) if elapsed_secs > 0.0 => delta as f64 / elapsed_secs,
        _ => 0.0,
    }
}

fn max_delay_ms<F>(snapshot: &InterfaceSnapshot, field: F) -> f64
where
    F: Fn(&crate::QueueTier) -> &str,
{
    snapshot
        .tiers
        .iter()
        .map(|t| parse_delay_ms(field(t)))
        .fold(0.0, f64::max)
}
