//! The first line of a `tc -s qdisc` block, e.g.
//!
//! ```text
//! qdisc cake 800d: dev eth1 root refcnt 2 bandwidth 50Mbit diffserv4 dual-srchost nat nowash no-ack-filter split-gso rtt 100ms atm overhead 48 memlimit 32Mb
//! ```

use crate::{Direction, InterfaceSnapshot};
use cake_utils::string_table_enum;

string_table_enum!(
    HeaderKeyword,
    bandwidth,
    autorate_ingress,
    fwmark,
    rtt,
    overhead,
    mpu,
    memlimit,
    diffserv3,
    diffserv4,
    diffserv8,
    besteffort,
    precedence,
    atm,
    ptm,
    noatm,
    raw,
    flowblind,
    srchost,
    dsthost,
    hosts,
    flows,
    dual_srchost,
    dual_dsthost,
    triple_isolate,
    single,
    nat,
    nonat,
    wash,
    nowash,
    ingress,
    egress,
    ack_filter,
    ack_filter_aggressive,
    no_ack_filter,
    split_gso,
    no_split_gso
);

/// Fills identity and configuration fields from a header line. Token 2 is
/// the handle and token 4 the interface; everything after is options.
/// A short header leaves the snapshot untouched.
pub(crate) fn parse_header(line: &str, snapshot: &mut InterfaceSnapshot) {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 5 {
        return;
    }
    snapshot.handle = fields[2].trim_end_matches(':').to_string();
    snapshot.interface = fields[4].to_string();
    snapshot.direction = Direction::Egress;

    let mut tokens = fields[5..].iter();
    while let Some(token) = tokens.next() {
        match HeaderKeyword::from_str(token) {
            HeaderKeyword::bandwidth => {
                if let Some(value) = tokens.next() {
                    snapshot.bandwidth = value.to_string();
                }
            }
            HeaderKeyword::autorate_ingress => snapshot.bandwidth = token.to_string(),
            HeaderKeyword::fwmark => {
                if let Some(value) = tokens.next() {
                    snapshot.fwmark_mask = value.to_string();
                }
            }
            HeaderKeyword::rtt => {
                if let Some(value) = tokens.next() {
                    snapshot.rtt = value.to_string();
                }
            }
            HeaderKeyword::overhead => {
                if let Some(value) = tokens.next() {
                    snapshot.overhead = value.to_string();
                }
            }
            HeaderKeyword::mpu => {
                if let Some(value) = tokens.next() {
                    snapshot.mpu = value.to_string();
                }
            }
            HeaderKeyword::memlimit => {
                if let Some(value) = tokens.next() {
                    snapshot.mem_limit = value.to_string();
                }
            }
            HeaderKeyword::diffserv3
            | HeaderKeyword::diffserv4
            | HeaderKeyword::diffserv8
            | HeaderKeyword::besteffort
            | HeaderKeyword::precedence => snapshot.diffserv_mode = token.to_string(),
            HeaderKeyword::atm | HeaderKeyword::ptm => snapshot.atm_mode = token.to_string(),
            HeaderKeyword::noatm | HeaderKeyword::raw => snapshot.atm_mode.clear(),
            HeaderKeyword::flowblind
            | HeaderKeyword::srchost
            | HeaderKeyword::dsthost
            | HeaderKeyword::hosts
            | HeaderKeyword::flows
            | HeaderKeyword::dual_srchost
            | HeaderKeyword::dual_dsthost
            | HeaderKeyword::triple_isolate
            | HeaderKeyword::single => snapshot.flow_mode = token.to_string(),
            HeaderKeyword::nat => snapshot.nat_enabled = true,
            HeaderKeyword::nonat => snapshot.nat_enabled = false,
            HeaderKeyword::wash => snapshot.wash_enabled = true,
            HeaderKeyword::nowash => snapshot.wash_enabled = false,
            HeaderKeyword::ingress => snapshot.direction = Direction::Ingress,
            HeaderKeyword::egress => snapshot.direction = Direction::Egress,
            HeaderKeyword::ack_filter
            | HeaderKeyword::ack_filter_aggressive
            | HeaderKeyword::no_ack_filter => snapshot.ack_filter = token.to_string(),
            HeaderKeyword::split_gso => snapshot.split_gso = true,
            HeaderKeyword::no_split_gso => snapshot.split_gso = false,
            // root, refcnt, parent and their arguments
            HeaderKeyword::Unknown => {}
        }
    }
}

/// Major number of a `parent MAJOR:MINOR` reference, if the qdisc has one.
/// `parent 1:2` gives `"1"`; a root qdisc gives `None`.
pub(crate) fn parent_major(line: &str) -> Option<String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    fields
        .windows(2)
        .find(|pair| pair[0] == "parent")
        .and_then(|pair| handle_major(pair[1]))
}

/// `1:2` gives `"1"`. No colon, or nothing before it, gives `None`.
pub(crate) fn handle_major(reference: &str) -> Option<String> {
    match reference.find(':') {
        Some(colon) if colon > 0 => Some(reference[..colon].to_string()),
        _ => None,
    }
}
