//! Reads CAKE qdisc statistics from the Linux `tc` shaper and turns them
//! into one record per interface, merging `cake_mq` hardware queues.
//! A background poller feeds each result into a [`HistoryStore`] that
//! derives transmit/drop rates and keeps a bounded time series that any
//! number of readers can copy out.

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]
mod cake_stats;
mod history;
mod multi_queue;
mod tc_json;
mod tc_text;
mod tracking;

use thiserror::Error;

pub use cake_stats::{Direction, InterfaceSnapshot, QueueTier, StatsResponse};
pub use history::{HistorySample, HistoryStore};
pub use tc_json::parse_tc_json;
pub use tc_text::parse_tc_text;
pub use tracking::{
    collect_stats, probe_tc_capability, spawn_queue_monitor, CollectorConfig, QueueReaderError,
    QueueTracker, TcCapability,
};

/// Parses raw `tc -s qdisc` output. Invalid UTF-8 is replaced rather
/// than rejected, so one mangled byte doesn't cost the whole poll.
pub fn parse_cake_report(raw: &[u8]) -> Vec<InterfaceSnapshot> {
    parse_tc_text(&String::from_utf8_lossy(raw))
}

/// Failures decoding the `tc -j` JSON report.
#[derive(Error, Debug)]
pub enum QDiscError {
    /// The text is not JSON
    #[error("Error parsing queue information JSON: {0}")]
    Json(String),
    /// The top level is not an array of qdiscs
    #[error("Unable to parse TC data array")]
    ArrayInvalid,
    /// A tin entry is not an object
    #[error("Unable to parse Cake Tin options")]
    CakeTin,
    /// The options entry is not an object
    #[error("Unable to parse Cake options")]
    CakeOpts,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lossy_decoding_keeps_the_report() {
        let mut raw = b"\xff\xfe garbage\n".to_vec();
        raw.extend_from_slice(include_bytes!("../tests/data/besteffort.txt"));
        let stats = parse_cake_report(&raw);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].tiers[0].name, "Tin 0");
    }
}
