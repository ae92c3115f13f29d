//! # aeps-io: Network Import and State Persistence
//!
//! Two concerns live here:
//!
//! - [`parser`] reads the line-oriented declarative network format
//!   (`BATT`/`GEN`/`TRU`/`LOAD`/`BUS`/... stanzas) and builds a validated
//!   [`aeps_core::Network`], fingerprinting the source text so snapshots
//!   can be tied to the exact spec they were taken from.
//! - [`snapshot`] encodes and decodes the persisted mutable state of a
//!   running system (one serde record per component, keyed by name) and
//!   rejects blobs whose spec digest does not match the network.

pub mod parser;
pub mod snapshot;

pub use parser::{load_network, parse_network};
pub use snapshot::{decode_snapshot, encode_snapshot, read_snapshot_file, write_snapshot_file};
