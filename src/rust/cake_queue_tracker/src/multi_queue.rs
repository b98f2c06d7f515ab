//! `cake_mq` runs one CAKE instance per hardware transmit queue, each
//! reported as its own `qdisc cake ... parent MAJOR:MINOR` block. Those
//! are folded back into one snapshot for the logical interface.

use crate::{
    tc_text::{BlockKind, ParsedBlock},
    InterfaceSnapshot, QueueTier,
};
use cake_utils::units::{format_bytes, parse_byte_size, parse_delay_us};
use std::collections::{HashMap, HashSet};
use tracing::debug;

type GroupKey<'a> = (&'a str, &'a str);

/// Emits one snapshot per logical interface, in block order. Children of
/// a visible `cake_mq` parent are merged into it; children whose parent
/// is missing are emitted as they are.
pub(crate) fn merge_multi_queue(blocks: Vec<ParsedBlock>) -> Vec<InterfaceSnapshot> {
    let parents: HashSet<GroupKey> = blocks
        .iter()
        .filter(|b| b.kind == BlockKind::CakeMq)
        .map(|b| (b.snapshot.interface.as_str(), b.snapshot.handle.as_str()))
        .collect();

    let mut children: HashMap<GroupKey, Vec<&InterfaceSnapshot>> = HashMap::new();
    for block in blocks.iter().filter(|b| b.kind == BlockKind::Cake) {
        if let Some(key) = parent_key(block, &parents) {
            children.entry(key).or_default().push(&block.snapshot);
        }
    }

    let mut emitted: HashSet<GroupKey> = HashSet::new();
    let mut result = Vec::with_capacity(blocks.len());
    for block in blocks.iter() {
        match block.kind {
            BlockKind::CakeMq => {
                let key = (block.snapshot.interface.as_str(), block.snapshot.handle.as_str());
                if !emitted.insert(key) {
                    continue;
                }
                match children.get(&key) {
                    Some(group) if !group.is_empty() => {
                        result.push(merge_children(&block.snapshot, group));
                    }
                    _ => {
                        debug!("cake_mq {}:{} has no child queues", key.0, key.1);
                        result.push(identity_only(&block.snapshot));
                    }
                }
            }
            BlockKind::Cake => {
                if parent_key(block, &parents).is_none() {
                    result.push(block.snapshot.clone());
                }
            }
        }
    }
    result
}

/// The (interface, parent-major) group a child belongs to, if that
/// parent was seen in this report.
fn parent_key<'a>(block: &'a ParsedBlock, parents: &HashSet<GroupKey>) -> Option<GroupKey<'a>> {
    let major = block.parent_major.as_deref()?;
    let key = (block.snapshot.interface.as_str(), major);
    parents.contains(&key).then_some(key)
}

fn identity_only(parent: &InterfaceSnapshot) -> InterfaceSnapshot {
    let mut snapshot = InterfaceSnapshot::new(parent.updated_at);
    snapshot.interface = parent.interface.clone();
    snapshot.handle = parent.handle.clone();
    snapshot.direction = parent.direction;
    snapshot.raw_header = parent.raw_header.clone();
    snapshot
}

/// Identity from the parent, configuration from the first child,
/// counters summed across all children.
fn merge_children(parent: &InterfaceSnapshot, children: &[&InterfaceSnapshot]) -> InterfaceSnapshot {
    let first = children[0];
    let mut merged = InterfaceSnapshot {
        interface: parent.interface.clone(),
        handle: parent.handle.clone(),
        raw_header: parent.raw_header.clone(),
        updated_at: parent.updated_at,
        sent_bytes: 0,
        sent_pkts: 0,
        dropped: 0,
        overlimits: 0,
        requeues: 0,
        backlog_pkts: 0,
        tiers: merge_tiers(children),
        tx_bytes_per_s: 0.0,
        drops_per_s: 0.0,
        max_av_delay_ms: 0.0,
        max_pk_delay_ms: 0.0,
        ..first.clone()
    };

    let mut backlog_bytes = 0u64;
    let mut memory_used = 0u64;
    for child in children {
        merged.sent_bytes = merged.sent_bytes.saturating_add(child.sent_bytes);
        merged.sent_pkts = merged.sent_pkts.saturating_add(child.sent_pkts);
        merged.dropped = merged.dropped.saturating_add(child.dropped);
        merged.overlimits = merged.overlimits.saturating_add(child.overlimits);
        merged.requeues = merged.requeues.saturating_add(child.requeues);
        merged.backlog_pkts = merged.backlog_pkts.saturating_add(child.backlog_pkts);
        backlog_bytes = backlog_bytes.saturating_add(parse_byte_size(&child.backlog_bytes));
        memory_used = memory_used.saturating_add(parse_byte_size(&child.memory_used));
    }
    merged.backlog_bytes = format_bytes(backlog_bytes);
    merged.memory_used = format_bytes(memory_used);
    merged
}

/// Tier layout comes from the first child. Counters are summed by
/// position, `max_len` is the largest seen, backlog is summed and each
/// delay is the worst one reported.
fn merge_tiers(children: &[&InterfaceSnapshot]) -> Vec<QueueTier> {
    children[0]
        .tiers
        .iter()
        .enumerate()
        .map(|(idx, template)| {
            let column: Vec<&QueueTier> = children.iter().filter_map(|c| c.tiers.get(idx)).collect();
            let mut merged = QueueTier {
                pkts: 0,
                bytes: 0,
                way_inds: 0,
                way_miss: 0,
                way_cols: 0,
                drops: 0,
                marks: 0,
                ack_drop: 0,
                sp_flows: 0,
                bk_flows: 0,
                un_flows: 0,
                max_len: 0,
                pk_delay: worst_delay(&column, |t| t.pk_delay.as_str()),
                av_delay: worst_delay(&column, |t| t.av_delay.as_str()),
                sp_delay: worst_delay(&column, |t| t.sp_delay.as_str()),
                backlog: format_bytes(
                    column
                        .iter()
                        .fold(0u64, |acc, t| acc.saturating_add(parse_byte_size(&t.backlog))),
                ),
                ..template.clone()
            };
            for tier in column.iter() {
                merged.accumulate(tier);
            }
            merged
        })
        .collect()
}

/// The delay string with the largest value. An empty pick is replaced by
/// the next candidate even when that one is not larger.
fn worst_delay<F>(column: &[&QueueTier], field: F) -> String
where
    F: Fn(&QueueTier) -> &str,
{
    let mut best = 0.0;
    let mut best_str = "";
    for tier in column {
        let s = field(*tier);
        let value = parse_delay_us(s);
        if value > best || best_str.is_empty() {
            best = value;
            best_str = s;
        }
    }
    best_str.to_string()
}
