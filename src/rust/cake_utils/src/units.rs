//! `tc` prints most of its numbers with a unit glued to the end:
//! `0b`, `4097Kb`, `1.21ms`, `1449`. None of these helpers fail: a
//! token that can't be understood reads as zero, so one odd field
//! never costs the whole report.

/// Parses a monotonic counter, ignoring a trailing unit suffix
/// (`b`, `p`, `K`, `M`, `G` in either case). `"0p"` is 0, `"abc"` is 0.
pub fn parse_counter(s: &str) -> u64 {
    s.trim()
        .trim_end_matches(['b', 'B', 'k', 'K', 'm', 'M', 'g', 'G', 'p', 'P'])
        .parse::<u64>()
        .unwrap_or(0)
}

/// Parses a `tc` byte size (`238656b`, `4097Kb`, `32Mb`, `1Gb`) into bytes.
/// The prefixes are binary, as `tc` uses them for memory figures.
pub fn parse_byte_size(s: &str) -> u64 {
    let s = s.trim();
    let (digits, multiplier) = if let Some(n) = s.strip_suffix("Gb") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("Mb") {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("Kb") {
        (n, 1024)
    } else {
        (s.strip_suffix('b').unwrap_or(s), 1)
    };
    digits
        .parse::<u64>()
        .map(|v| v.saturating_mul(multiplier))
        .unwrap_or(0)
}

/// Renders a byte count the way `tc` prints raw byte sizes: `"220000b"`.
pub fn format_bytes(bytes: u64) -> String {
    format!("{bytes}b")
}

/// Parses a CAKE delay string (`500us`, `1.5ms`, `2s`) into microseconds.
/// Empty strings, `"0"` and unknown suffixes are 0.
pub fn parse_delay_us(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() || s == "0" {
        return 0.0;
    }
    // Order matters: "us" and "ms" both end in "s".
    let (number, scale) = if let Some(n) = s.strip_suffix("us") {
        (n, 1.0)
    } else if let Some(n) = s.strip_suffix("ms") {
        (n, 1_000.0)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1_000_000.0)
    } else {
        return 0.0;
    };
    match number.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => v * scale,
        _ => 0.0,
    }
}

/// Parses a CAKE delay string into milliseconds.
pub fn parse_delay_ms(s: &str) -> f64 {
    parse_delay_us(s) / 1_000.0
}
