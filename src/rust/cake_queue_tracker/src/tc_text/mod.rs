//! Parser for the human-readable `tc -s qdisc` report. This is the
//! high-fidelity path: the text carries tier names, delays and every
//! per-tin counter, which the JSON output drops.

mod header;
mod tiers;

use crate::{multi_queue::merge_multi_queue, InterfaceSnapshot};
use cake_utils::units::parse_counter;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

pub(crate) use header::{handle_major, parent_major};

/// Which CAKE-family discipline a block describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockKind {
    /// A plain `cake` qdisc, standalone or one hardware queue of a `cake_mq`
    Cake,
    /// The `cake_mq` parent
    CakeMq,
}

/// One retained block, with what the multi-queue merge needs to know.
#[derive(Debug, Clone)]
pub(crate) struct ParsedBlock {
    pub(crate) snapshot: InterfaceSnapshot,
    pub(crate) kind: BlockKind,
    pub(crate) parent_major: Option<String>,
}

/// Parses a full `tc -s qdisc` report into one snapshot per logical CAKE
/// interface. Non-CAKE qdiscs are skipped and hardware-queue children of
/// a `cake_mq` are merged. A report with no CAKE blocks is an empty list.
pub fn parse_tc_text(raw: &str) -> Vec<InterfaceSnapshot> {
    parse_tc_text_at(raw, Utc::now())
}

pub(crate) fn parse_tc_text_at(raw: &str, now: DateTime<Utc>) -> Vec<InterfaceSnapshot> {
    merge_multi_queue(parse_blocks(raw, now))
}

pub(crate) fn parse_blocks(raw: &str, now: DateTime<Utc>) -> Vec<ParsedBlock> {
    split_blocks(raw)
        .into_iter()
        .filter_map(|lines| {
            let header = *lines.first()?;
            match classify(header) {
                Some(BlockKind::CakeMq) => {
                    let mut snapshot = InterfaceSnapshot::new(now);
                    snapshot.raw_header = header.trim().to_string();
                    header::parse_header(header, &mut snapshot);
                    Some(ParsedBlock {
                        snapshot,
                        kind: BlockKind::CakeMq,
                        parent_major: None,
                    })
                }
                Some(BlockKind::Cake) => Some(ParsedBlock {
                    snapshot: parse_cake_block(&lines, now),
                    kind: BlockKind::Cake,
                    parent_major: parent_major(header),
                }),
                None => {
                    debug!("Skipping non-cake block: {}", header.trim());
                    None
                }
            }
        })
        .collect()
}

/// Every line starting with `qdisc ` opens a new block.
fn split_blocks(raw: &str) -> Vec<Vec<&str>> {
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in raw.lines() {
        if line.starts_with("qdisc ") && !current.is_empty() {
            blocks.push(std::mem::take(&mut current));
        }
        current.push(line);
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn classify(header: &str) -> Option<BlockKind> {
    let mut fields = header.split_whitespace();
    if fields.next() != Some("qdisc") {
        return None;
    }
    match fields.next() {
        Some("cake") => Some(BlockKind::Cake),
        Some("cake_mq") => Some(BlockKind::CakeMq),
        _ => None,
    }
}

fn parse_cake_block(lines: &[&str], now: DateTime<Utc>) -> InterfaceSnapshot {
    let mut snapshot = InterfaceSnapshot::new(now);
    let Some(header) = lines.first() else {
        return snapshot;
    };
    snapshot.raw_header = header.trim().to_string();
    header::parse_header(header, &mut snapshot);

    let mut tier_names: Vec<String> = Vec::new();
    let mut tier_rows: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_table = false;

    for line in lines.iter().skip(1) {
        let trimmed = line.trim();
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        let Some(first) = fields.first() else {
            continue;
        };

        if trimmed.starts_with("Sent ") {
            parse_sent_line(&mut snapshot, trimmed);
        } else if trimmed.starts_with("backlog ") && !in_table {
            // Inside the table this is the per-tin backlog row instead.
            if fields.len() >= 3 {
                snapshot.backlog_bytes = fields[1].to_string();
                snapshot.backlog_pkts = parse_counter(fields[2]);
            }
        } else if let Some(rest) = trimmed.strip_prefix("memory used:") {
            let parts: Vec<&str> = rest.split_whitespace().collect();
            if parts.len() >= 3 {
                snapshot.memory_used = parts[0].to_string();
                snapshot.memory_total = parts[2].to_string();
            }
        } else if let Some(rest) = trimmed.strip_prefix("capacity estimate:") {
            snapshot.capacity_estimate = rest.trim().to_string();
        } else if let Some(rest) = trimmed.strip_prefix("min/max network layer size:") {
            (snapshot.min_net_size, snapshot.max_net_size) = parse_min_max(rest);
        } else if let Some(rest) = trimmed.strip_prefix("min/max overhead-adjusted size:") {
            (snapshot.min_adj_size, snapshot.max_adj_size) = parse_min_max(rest);
        } else if let Some(rest) = trimmed.strip_prefix("average network hdr offset:") {
            snapshot.avg_hdr_offset = rest.trim().to_string();
        } else if tiers::is_tier_header(first) {
            tier_names = tiers::parse_tier_names(&fields);
            in_table = true;
        } else if in_table && tiers::is_tier_row(&fields) {
            tier_rows.insert(fields[0], fields[1..].to_vec());
        }
    }

    if !tier_names.is_empty() {
        snapshot.tiers = tiers::assemble_tiers(&tier_names, &tier_rows);
    }
    snapshot
}

/// `Sent 453393887 bytes 1599017 pkt (dropped 2515, overlimits 2072988 requeues 0)`.
/// A comma segment inside the parentheses may hold more than one pair.
fn parse_sent_line(snapshot: &mut InterfaceSnapshot, line: &str) {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() >= 4 {
        snapshot.sent_bytes = parse_counter(fields[1]);
        snapshot.sent_pkts = parse_counter(fields[3]);
    }
    let (Some(open), Some(close)) = (line.find('('), line.find(')')) else {
        return;
    };
    if close <= open {
        return;
    }
    for segment in line[open + 1..close].split(',') {
        let tokens: Vec<&str> = segment.split_whitespace().collect();
        for pair in tokens.chunks_exact(2) {
            match pair[0] {
                "dropped" => snapshot.dropped = parse_counter(pair[1]),
                "overlimits" => snapshot.overlimits = parse_counter(pair[1]),
                "requeues" => snapshot.requeues = parse_counter(pair[1]),
                _ => {}
            }
        }
    }
}

/// `          28 /    1500` into (`28`, `1500`).
fn parse_min_max(rest: &str) -> (String, String) {
    match rest.split_once('/') {
        Some((lo, hi)) => (lo.trim().to_string(), hi.trim().to_string()),
        None => (String::new(), String::new()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Direction;

    const DIFFSERV4: &str = include_str!("../../tests/data/diffserv4.txt");
    const BESTEFFORT: &str = include_str!("../../tests/data/besteffort.txt");

    #[test]
    fn diffserv4_report() {
        let stats = parse_tc_text(DIFFSERV4);
        assert_eq!(stats.len(), 2);
        let eth1 = &stats[0];
        assert_eq!(eth1.interface, "eth1");
        assert_eq!(eth1.handle, "800d");
        assert_eq!(eth1.direction, Direction::Egress);
        assert_eq!(eth1.bandwidth, "50Mbit");
        assert_eq!(eth1.diffserv_mode, "diffserv4");
        assert_eq!(eth1.sent_bytes, 453393887);
        assert_eq!(eth1.sent_pkts, 1599017);
        assert_eq!(eth1.dropped, 2515);
        assert_eq!(eth1.overlimits, 2072988);
        assert_eq!(eth1.requeues, 0);
        assert_eq!(eth1.memory_used, "238656b");
        assert_eq!(eth1.memory_total, "32Mb");
        assert_eq!(eth1.capacity_estimate, "50Mbit");
        assert_eq!(eth1.min_net_size, "28");
        assert_eq!(eth1.max_net_size, "1500");
        assert_eq!(eth1.min_adj_size, "106");
        assert_eq!(eth1.max_adj_size, "1749");
        assert_eq!(eth1.avg_hdr_offset, "14");
        assert!(eth1.raw_header.starts_with("qdisc cake 800d: dev eth1"));

        let names: Vec<&str> = eth1.tiers.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Bulk", "Best Effort", "Video", "Voice"]);
        let best = &eth1.tiers[1];
        assert_eq!(best.thresh, "50Mbit");
        assert_eq!(best.pk_delay, "545us");
        assert_eq!(best.av_delay, "42us");
        assert_eq!(best.pkts, 1592616);
        assert_eq!(best.bytes, 455805269);
        assert_eq!(best.drops, 2515);
        assert_eq!(best.max_len, 32300);
        assert_eq!(best.quantum, 1514);
        assert_eq!(eth1.tiers[0].target, "5.81ms");

        assert_eq!(stats[1].interface, "ifb4eth1");
        assert_eq!(stats[1].direction, Direction::Ingress);
    }

    #[test]
    fn tier_backlog_row_keeps_global_backlog() {
        let stats = parse_tc_text(DIFFSERV4);
        let eth1 = &stats[0];
        assert_eq!(eth1.backlog_bytes, "3028b");
        assert_eq!(eth1.backlog_pkts, 2);
        assert_eq!(eth1.tiers[1].backlog, "3028b");
        assert_eq!(eth1.tiers[0].backlog, "0b");
    }

    #[test]
    fn besteffort_single_tin() {
        let stats = parse_tc_text(BESTEFFORT);
        assert_eq!(stats.len(), 1);
        let eth1 = &stats[0];
        assert_eq!(eth1.diffserv_mode, "besteffort");
        assert_eq!(eth1.atm_mode, "");
        assert_eq!(eth1.overhead, "0");
        assert_eq!(eth1.memory_used, "4097Kb");
        assert_eq!(eth1.memory_total, "4Mb");
        assert_eq!(eth1.requeues, 49);
        assert_eq!(eth1.tiers.len(), 1);
        let tin = &eth1.tiers[0];
        assert_eq!(tin.name, "Tin 0");
        assert_eq!(tin.pk_delay, "3.26ms");
        assert_eq!(tin.av_delay, "1.21ms");
        assert_eq!(tin.drops, 1449);
        assert_eq!(tin.max_len, 16654);
    }

    #[test]
    fn blocks_are_order_preserving() {
        let mut report = String::new();
        for (i, iface) in ["eth0", "eth1", "eth2"].iter().enumerate() {
            report.push_str(&format!(
                "qdisc cake 80{i}: dev {iface} root refcnt 2 bandwidth 10Mbit diffserv3 triple-isolate rtt 100ms noatm overhead 0 \n Sent {} bytes 10 pkt (dropped 0, overlimits 0 requeues 0) \n backlog 0b 0p requeues 0\n",
                (i + 1) * 1000
            ));
            report.push_str("qdisc fq_codel 0: dev lo root refcnt 2 \n Sent 0 bytes 0 pkt (dropped 0, overlimits 0 requeues 0) \n");
        }
        let stats = parse_tc_text(&report);
        let names: Vec<&str> = stats.iter().map(|s| s.interface.as_str()).collect();
        assert_eq!(names, vec!["eth0", "eth1", "eth2"]);
        assert_eq!(stats[2].sent_bytes, 3000);
        assert!(stats.iter().all(|s| s.tiers.is_empty()));
    }

    #[test]
    fn no_cake_blocks_is_empty() {
        let report = "qdisc noqueue 0: dev lo root refcnt 2 \n Sent 0 bytes 0 pkt (dropped 0, overlimits 0 requeues 0) \n";
        assert!(parse_tc_text(report).is_empty());
        assert!(parse_tc_text("").is_empty());
    }

    #[test]
    fn header_only_block_has_zero_counters() {
        let stats = parse_tc_text("qdisc cake 1: dev eth9 root refcnt 2 bandwidth 1Gbit diffserv3\n");
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].sent_bytes, 0);
        assert_eq!(stats[0].backlog_bytes, "");
        assert!(stats[0].tiers.is_empty());
    }

    #[test]
    fn sent_line_with_combined_segment() {
        let mut snap = InterfaceSnapshot::new(Utc::now());
        parse_sent_line(
            &mut snap,
            "Sent 10 bytes 2 pkt (dropped 3, overlimits 4 requeues 5)",
        );
        assert_eq!(snap.sent_bytes, 10);
        assert_eq!(snap.sent_pkts, 2);
        assert_eq!(snap.dropped, 3);
        assert_eq!(snap.overlimits, 4);
        assert_eq!(snap.requeues, 5);
    }

    #[test]
    fn sent_line_garbage_is_zero() {
        let mut snap = InterfaceSnapshot::new(Utc::now());
        parse_sent_line(&mut snap, "Sent lots bytes many pkt (dropped ?, overlimits)");
        assert_eq!(snap.sent_bytes, 0);
        assert_eq!(snap.dropped, 0);
        assert_eq!(snap.overlimits, 0);
    }

    #[test]
    fn unknown_lines_are_ignored() {
        let report = "qdisc cake 1: dev eth0 root refcnt 2 bandwidth 10Mbit diffserv3\n Sent 5 bytes 1 pkt (dropped 0, overlimits 0 requeues 0)\n some future field: 42\n";
        let stats = parse_tc_text(report);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].sent_bytes, 5);
    }
}
