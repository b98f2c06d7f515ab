//! The per-tin table at the bottom of a CAKE block:
//!
//! ```text
//!                    Bulk  Best Effort        Video        Voice
//!   thresh       3125Kbit       50Mbit       25Mbit    12500Kbit
//!   target         5.81ms          5ms          5ms          5ms
//! ```

use crate::QueueTier;
use cake_utils::{string_table_enum, units::parse_counter};
use std::collections::HashMap;

string_table_enum!(
    TierWord, Bulk, Best, Voice, Video, CS1, CS2, CS3, CS4, CS5, CS6, CS7, BE, Tin
);

/// True if `first` opens a tier-name header row.
pub(crate) fn is_tier_header(first: &str) -> bool {
    TierWord::is_known(first)
}

/// Table data rows start with a lowercase field keyword and carry at
/// least one value.
pub(crate) fn is_tier_row(fields: &[&str]) -> bool {
    fields.len() >= 2
        && fields[0]
            .chars()
            .next()
            .map(|c| c.is_lowercase())
            .unwrap_or(false)
}

/// Joins the header row tokens into tier names. `Best Effort` and
/// `Tin N` are two tokens that make one name.
pub(crate) fn parse_tier_names(words: &[&str]) -> Vec<String> {
    let mut names = Vec::with_capacity(words.len());
    let mut words = words.iter().peekable();
    while let Some(word) = words.next() {
        let following = words.peek().copied();
        match (*word, following) {
            ("Best", Some(&"Effort")) => {
                words.next();
                names.push("Best Effort".to_string());
            }
            ("Tin", Some(number)) => {
                names.push(format!("Tin {number}"));
                words.next();
            }
            _ => names.push(word.to_string()),
        }
    }
    names
}

/// Builds one tier per name, pulling the value at the tier's column
/// position from each field row. A missing row or short row yields an
/// empty string or zero.
pub(crate) fn assemble_tiers(names: &[String], rows: &HashMap<&str, Vec<&str>>) -> Vec<QueueTier> {
    let text = |field: &str, idx: usize| -> String {
        rows.get(field)
            .and_then(|values| values.get(idx))
            .map(|v| v.to_string())
            .unwrap_or_default()
    };
    let counter = |field: &str, idx: usize| -> u64 {
        rows.get(field)
            .and_then(|values| values.get(idx))
            .map(|v| parse_counter(v))
            .unwrap_or(0)
    };

    names
        .iter()
        .enumerate()
        .map(|(i, name)| QueueTier {
            name: name.clone(),
            thresh: text("thresh", i),
            target: text("target", i),
            interval: text("interval", i),
            pk_delay: text("pk_delay", i),
            av_delay: text("av_delay", i),
            sp_delay: text("sp_delay", i),
            backlog: text("backlog", i),
            pkts: counter("pkts", i),
            bytes: counter("bytes", i),
            way_inds: counter("way_inds", i),
            way_miss: counter("way_miss", i),
            way_cols: counter("way_cols", i),
            drops: counter("drops", i),
            marks: counter("marks", i),
            ack_drop: counter("ack_drop", i),
            sp_flows: counter("sp_flows", i),
            bk_flows: counter("bk_flows", i),
            un_flows: counter("un_flows", i),
            max_len: counter("max_len", i),
            quantum: counter("quantum", i),
        })
        .collect()
}
