/*
Lower-fidelity alternative to the text report: `tc -j -s qdisc`. One
element looks like this (tins trimmed):

{
    "kind": "cake",
    "handle": "9cb1:",
    "parent": "3:205",
    "dev": "eth0",
    "options": {
        "bandwidth": "unlimited",
        "diffserv": "diffserv4",
        "flowmode": "triple-isolate",
        "nat": false,
        "wash": false,
        "ingress": false,
        "ack-filter": "disabled",
        "split_gso": true,
        "rtt": 100000,
        "raw": true,
        "overhead": 0,
        "fwmark": "0"
    },
    "bytes": 49072087981,
    "packets": 35792920,
    "drops": 1162331,
    "memory_used": 2002176,
    "memory_limit": 15503360,
    "tins": [
        {
            "threshold_rate": 0,
            "sent_bytes": 47096460394,
            "drops": 984524,
            "max_pkt_len": 1514,
            "flow_quantum": 1514,
            ...
        }
    ]
}

A `cake_mq` parent is listed with "kind": "cake_mq" and its per-queue
children carry "parent": "<major>:<minor>", as in the text report.

Tier names, target/interval and delays are not carried over.
*/

use crate::{
    multi_queue::merge_multi_queue,
    tc_text::{handle_major, BlockKind, ParsedBlock},
    Direction, InterfaceSnapshot, QDiscError, QueueTier,
};
use cake_utils::units::{format_bytes, parse_counter};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

/// Decodes a `tc -j -s qdisc` document. Only `cake` and `cake_mq` entries
/// are kept, and hardware-queue children are merged into their parent.
pub fn parse_tc_json(json: &str) -> Result<Vec<InterfaceSnapshot>, QDiscError> {
    parse_tc_json_at(json, Utc::now())
}

pub(crate) fn parse_tc_json_at(
    json: &str,
    now: DateTime<Utc>,
) -> Result<Vec<InterfaceSnapshot>, QDiscError> {
    let json: Value =
        serde_json::from_str(json).map_err(|e| QDiscError::Json(e.to_string()))?;
    let Value::Array(array) = &json else {
        warn!("Failed to parse TC queue stats data array.");
        return Err(QDiscError::ArrayInvalid);
    };

    let mut blocks = Vec::new();
    for entry in array.iter() {
        let Value::Object(map) = entry else {
            continue;
        };
        let kind = match map.get("kind").and_then(Value::as_str) {
            Some("cake") => BlockKind::Cake,
            Some("cake_mq") => BlockKind::CakeMq,
            _ => continue,
        };
        let parent_major = match kind {
            BlockKind::Cake => map
                .get("parent")
                .and_then(Value::as_str)
                .and_then(handle_major),
            BlockKind::CakeMq => None,
        };
        blocks.push(ParsedBlock {
            snapshot: cake_from_json(map, now)?,
            kind,
            parent_major,
        });
    }
    Ok(merge_multi_queue(blocks))
}

fn cake_from_json(
    map: &serde_json::Map<String, Value>,
    now: DateTime<Utc>,
) -> Result<InterfaceSnapshot, QDiscError> {
    let mut result = InterfaceSnapshot::new(now);
    for (key, value) in map.iter() {
        match key.as_str() {
            "dev" => result.interface = value.as_str().unwrap_or_default().to_string(),
            "handle" => {
                result.handle = value
                    .as_str()
                    .unwrap_or_default()
                    .trim_end_matches(':')
                    .to_string()
            }
            "bytes" => result.sent_bytes = json_u64(value),
            "packets" => result.sent_pkts = json_u64(value),
            "drops" => result.dropped = json_u64(value),
            "overlimits" => result.overlimits = json_u64(value),
            "requeues" => result.requeues = json_u64(value),
            "backlog" => result.backlog_bytes = format_bytes(json_u64(value)),
            "qlen" => result.backlog_pkts = json_u64(value),
            "memory_used" => result.memory_used = format_bytes(json_u64(value)),
            "memory_limit" => {
                result.memory_total = format!("{}Mb", json_u64(value) / 1024 / 1024)
            }
            "capacity_estimate" => {
                result.capacity_estimate = format!("{}Mbit", json_u64(value) / 1_000_000)
            }
            "min_network_size" => result.min_net_size = json_u64(value).to_string(),
            "max_network_size" => result.max_net_size = json_u64(value).to_string(),
            "min_adj_size" => result.min_adj_size = json_u64(value).to_string(),
            "max_adj_size" => result.max_adj_size = json_u64(value).to_string(),
            "avg_hdr_offset" => result.avg_hdr_offset = json_u64(value).to_string(),
            "options" => apply_options(&mut result, value)?,
            "tins" => {
                if let Value::Array(array) = value {
                    for tin in array.iter() {
                        result.tiers.push(tin_from_json(tin)?);
                    }
                }
            }
            "kind" | "parent" | "root" | "refcnt" => {}
            _ => {
                debug!("Unknown entry in tc-cake json decoder: {key}");
            }
        }
    }
    Ok(result)
}

fn apply_options(result: &mut InterfaceSnapshot, value: &Value) -> Result<(), QDiscError> {
    let Value::Object(map) = value else {
        return Err(QDiscError::CakeOpts);
    };
    for (key, value) in map.iter() {
        match key.as_str() {
            "bandwidth" => {
                result.bandwidth = match value {
                    Value::Number(_) => format!("{}bit", json_u64(value)),
                    _ => value.as_str().unwrap_or_default().to_string(),
                }
            }
            "diffserv" => result.diffserv_mode = value.as_str().unwrap_or_default().to_string(),
            "flowmode" => result.flow_mode = value.as_str().unwrap_or_default().to_string(),
            "nat" => result.nat_enabled = value.as_bool().unwrap_or(false),
            "wash" => result.wash_enabled = value.as_bool().unwrap_or(false),
            "ingress" => {
                if value.as_bool().unwrap_or(false) {
                    result.direction = Direction::Ingress;
                }
            }
            "ack-filter" => {
                result.ack_filter = match value.as_str().unwrap_or_default() {
                    "enabled" => "ack-filter".to_string(),
                    "aggressive" => "ack-filter-aggressive".to_string(),
                    "disabled" => "no-ack-filter".to_string(),
                    other => other.to_string(),
                }
            }
            "split_gso" => result.split_gso = value.as_bool().unwrap_or(false),
            "atm" => {
                result.atm_mode = match value.as_str().unwrap_or_default() {
                    mode @ ("atm" | "ptm") => mode.to_string(),
                    _ => String::new(),
                }
            }
            "raw" => {
                if value.as_bool().unwrap_or(false) {
                    result.atm_mode.clear();
                }
            }
            "mpu" => {
                let mpu = json_u64(value);
                if mpu > 0 {
                    result.mpu = mpu.to_string();
                }
            }
            "overhead" => result.overhead = value.as_i64().unwrap_or(0).to_string(),
            "rtt" => result.rtt = format!("{}ms", json_u64(value) / 1000),
            "fwmark" => {
                let mask = value.as_str().unwrap_or_default();
                if mask != "0" {
                    result.fwmark_mask = mask.to_string();
                }
            }
            "memlimit" => result.mem_limit = format_bytes(json_u64(value)),
            _ => {
                debug!("Unknown entry in tc-cake-options json decoder: {key}");
            }
        }
    }
    Ok(())
}

fn tin_from_json(value: &Value) -> Result<QueueTier, QDiscError> {
    let Value::Object(map) = value else {
        return Err(QDiscError::CakeTin);
    };
    let mut result = QueueTier::default();
    for (key, value) in map.iter() {
        match key.as_str() {
            "threshold_rate" => result.thresh = json_u64(value).to_string(),
            "sent_bytes" => result.bytes = json_u64(value),
            "drops" => result.drops = json_u64(value),
            "max_pkt_len" => result.max_len = json_u64(value),
            "flow_quantum" => result.quantum = json_u64(value),
            _ => {}
        }
    }
    Ok(result)
}

/// Numbers may arrive as JSON numbers or as numeric strings.
fn json_u64(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => parse_counter(s),
        _ => 0,
    }
}
