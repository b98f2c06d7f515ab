//! Collection of utility functions shared by the cake-stats crates.

#![warn(missing_docs)]
mod string_table_enum;

/// Fixed-capacity, overwrite-oldest ring buffer.
pub mod ring_buffer;

/// Parsing of the unit-suffixed numbers that `tc` prints (counters,
/// byte sizes and delays).
pub mod units;
