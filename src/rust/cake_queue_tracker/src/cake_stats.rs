use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which way traffic flows through a CAKE instance. Only the `ingress`
/// option keyword selects `Ingress`; the attachment point never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Shaping outbound traffic (the default)
    #[default]
    Egress,
    /// Shaping inbound traffic, usually on an `ifb` device
    Ingress,
}

/// One CAKE tin (priority tier). Configuration and delay figures keep the
/// unit suffix `tc` printed them with; counters are plain integers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueTier {
    /// Tier name, e.g. `Bulk`, `Best Effort` or `Tin 0`
    pub name: String,
    /// Threshold rate
    pub thresh: String,
    /// Target latency
    pub target: String,
    /// Sampling interval
    pub interval: String,
    /// Peak delay
    pub pk_delay: String,
    /// Average delay
    pub av_delay: String,
    /// Sparse-flow delay
    pub sp_delay: String,
    /// Bytes queued in this tier
    pub backlog: String,
    /// Packets sent
    pub pkts: u64,
    /// Bytes sent
    pub bytes: u64,
    /// Hash-way indirect hits
    pub way_inds: u64,
    /// Hash-way misses
    pub way_miss: u64,
    /// Hash-way collisions
    pub way_cols: u64,
    /// Packets dropped
    pub drops: u64,
    /// Packets ECN-marked
    pub marks: u64,
    /// ACK-filter drops
    pub ack_drop: u64,
    /// Sparse flows
    pub sp_flows: u64,
    /// Bulk flows
    pub bk_flows: u64,
    /// Unresponsive flows
    pub un_flows: u64,
    /// Largest packet seen
    pub max_len: u64,
    /// Flow quantum
    pub quantum: u64,
}

impl QueueTier {
    /// Sums every monotonic counter of `other` into `self`. `max_len` takes
    /// the larger of the two instead.
    pub(crate) fn accumulate(&mut self, other: &QueueTier) {
        self.pkts = self.pkts.saturating_add(other.pkts);
        self.bytes = self.bytes.saturating_add(other.bytes);
        self.way_inds = self.way_inds.saturating_add(other.way_inds);
        self.way_miss = self.way_miss.saturating_add(other.way_miss);
        self.way_cols = self.way_cols.saturating_add(other.way_cols);
        self.drops = self.drops.saturating_add(other.drops);
        self.marks = self.marks.saturating_add(other.marks);
        self.ack_drop = self.ack_drop.saturating_add(other.ack_drop);
        self.sp_flows = self.sp_flows.saturating_add(other.sp_flows);
        self.bk_flows = self.bk_flows.saturating_add(other.bk_flows);
        self.un_flows = self.un_flows.saturating_add(other.un_flows);
        self.max_len = self.max_len.max(other.max_len);
    }
}

/// The canonical per-interface record. One exists per logical interface
/// per poll, whichever report format it was read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceSnapshot {
    /// Network interface the qdisc is attached to
    pub interface: String,
    /// Qdisc handle, without the trailing colon
    pub handle: String,
    /// Egress or ingress
    pub direction: Direction,
    /// Shaped bandwidth, `unlimited` or `autorate-ingress`
    pub bandwidth: String,
    /// `diffserv3`, `diffserv4`, `diffserv8`, `besteffort` or `precedence`
    pub diffserv_mode: String,
    /// Round-trip-time estimate
    pub rtt: String,
    /// Per-packet overhead
    pub overhead: String,
    /// Flow isolation mode, e.g. `triple-isolate`
    #[serde(rename = "dual_mode")]
    pub flow_mode: String,
    /// Firewall-mark mask, empty when not configured
    pub fwmark_mask: String,
    /// NAT lookup for flow isolation
    pub nat_enabled: bool,
    /// DSCP washing
    pub wash_enabled: bool,
    /// `atm`, `ptm`, or empty when no framing compensation is active
    pub atm_mode: String,
    /// Minimum packet unit, empty when unset
    pub mpu: String,
    /// Configured memory ceiling
    #[serde(rename = "memlimit")]
    pub mem_limit: String,
    /// ACK filter mode as printed by `tc`, empty when not shown
    pub ack_filter: String,
    /// GSO super-packet splitting
    pub split_gso: bool,
    /// The header line exactly as read
    pub raw_header: String,

    /// Bytes sent
    pub sent_bytes: u64,
    /// Packets sent
    pub sent_pkts: u64,
    /// Packets dropped
    pub dropped: u64,
    /// Over-limit events
    pub overlimits: u64,
    /// Requeues
    pub requeues: u64,

    /// Bytes currently queued, with unit suffix
    pub backlog_bytes: String,
    /// Packets currently queued
    pub backlog_pkts: u64,

    /// Memory in use
    pub memory_used: String,
    /// Memory available
    pub memory_total: String,
    /// Estimated link capacity
    pub capacity_estimate: String,

    /// Smallest network-layer packet seen
    pub min_net_size: String,
    /// Largest network-layer packet seen
    pub max_net_size: String,
    /// Smallest overhead-adjusted packet seen
    pub min_adj_size: String,
    /// Largest overhead-adjusted packet seen
    pub max_adj_size: String,
    /// Average network header offset
    pub avg_hdr_offset: String,

    /// Per-tin statistics, in report column order
    pub tiers: Vec<QueueTier>,
    /// When this snapshot was taken
    pub updated_at: DateTime<Utc>,

    /// Transmit rate, filled in by the history store
    pub tx_bytes_per_s: f64,
    /// Drop rate, filled in by the history store
    pub drops_per_s: f64,
    /// Largest average delay across tiers, in milliseconds
    pub max_av_delay_ms: f64,
    /// Largest peak delay across tiers, in milliseconds
    pub max_pk_delay_ms: f64,
}

impl InterfaceSnapshot {
    /// An empty snapshot stamped with the given time.
    pub fn new(updated_at: DateTime<Utc>) -> Self {
        Self {
            interface: String::new(),
            handle: String::new(),
            direction: Direction::Egress,
            bandwidth: String::new(),
            diffserv_mode: String::new(),
            rtt: String::new(),
            overhead: String::new(),
            flow_mode: String::new(),
            fwmark_mask: String::new(),
            nat_enabled: false,
            wash_enabled: false,
            atm_mode: String::new(),
            mpu: String::new(),
            mem_limit: String::new(),
            ack_filter: String::new(),
            split_gso: false,
            raw_header: String::new(),
            sent_bytes: 0,
            sent_pkts: 0,
            dropped: 0,
            overlimits: 0,
            requeues: 0,
            backlog_bytes: String::new(),
            backlog_pkts: 0,
            memory_used: String::new(),
            memory_total: String::new(),
            capacity_estimate: String::new(),
            min_net_size: String::new(),
            max_net_size: String::new(),
            min_adj_size: String::new(),
            max_adj_size: String::new(),
            avg_hdr_offset: String::new(),
            tiers: Vec::new(),
            updated_at,
            tx_bytes_per_s: 0.0,
            drops_per_s: 0.0,
            max_av_delay_ms: 0.0,
            max_pk_delay_ms: 0.0,
        }
    }

    /// Bytes transmitted so far. Falls back to the sum of the tier byte
    /// counters when the totals line reported nothing.
    pub fn tx_bytes(&self) -> u64 {
        if self.sent_bytes > 0 {
            return self.sent_bytes;
        }
        self.tiers
            .iter()
            .fold(0u64, |acc, t| acc.saturating_add(t.bytes))
    }
}

/// What one poll produces, as served to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    /// One entry per logical interface
    pub interfaces: Vec<InterfaceSnapshot>,
    /// When the poll completed
    pub updated_at: DateTime<Utc>,
}

impl StatsResponse {
    /// A response with no interfaces, used before the first poll lands.
    pub fn empty() -> Self {
        Self {
            interfaces: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tx_bytes_prefers_sent_counter() {
        let mut snap = InterfaceSnapshot::new(Utc::now());
        snap.sent_bytes = 1000;
        snap.tiers.push(QueueTier {
            bytes: 5,
            ..Default::default()
        });
        assert_eq!(snap.tx_bytes(), 1000);
    }

    #[test]
    fn tx_bytes_falls_back_to_tiers() {
        let mut snap = InterfaceSnapshot::new(Utc::now());
        for bytes in [100, 250, 0] {
            snap.tiers.push(QueueTier {
                bytes,
                ..Default::default()
            });
        }
        assert_eq!(snap.tx_bytes(), 350);
    }

    #[test]
    fn accumulate_sums_and_takes_max_len() {
        let mut a = QueueTier {
            pkts: 10,
            drops: 1,
            max_len: 1514,
            ..Default::default()
        };
        let b = QueueTier {
            pkts: 5,
            drops: 2,
            max_len: 9000,
            ..Default::default()
        };
        a.accumulate(&b);
        assert_eq!(a.pkts, 15);
        assert_eq!(a.drops, 3);
        assert_eq!(a.max_len, 9000);
    }

    #[test]
    fn serializes_with_dashboard_field_names() {
        let snap = InterfaceSnapshot::new(Utc::now());
        let json = serde_json::to_value(&snap).unwrap();
        assert!(json.get("dual_mode").is_some());
        assert!(json.get("memlimit").is_some());
        assert_eq!(json["direction"], "egress");
    }
}
