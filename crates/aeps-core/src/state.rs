//! Per-component electrical state and persistent-state records.
//!
//! [`PowerState`] is the payload of the dual `rw`/`ro` buffers: the solver
//! worker fills a private `rw` copy during a tick and publishes it into the
//! reader-visible `ro` buffer at the end. [`SrcSet`] is the bounded set of
//! source attributions painted onto a component.
//!
//! The `*Record` types at the bottom are the serialization contract: exactly
//! the mutable fields that survive a save/restore cycle, one record per
//! component keyed by name in [`SystemSnapshot`]. Links, curves, and other
//! construction-time data never appear here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::CompId;

/// Maximum number of simultaneous source attributions per component.
pub const MAX_SRCS: usize = 8;

/// Instantaneous electrical quantities of one component for one tick.
///
/// `in_*` describes what the component receives from the network, `out_*`
/// what it delivers downstream. For pass-through elements the two sides are
/// equal; converters differ by their efficiency loss.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerState {
    pub in_volts: f64,
    pub out_volts: f64,
    pub in_amps: f64,
    pub out_amps: f64,
    /// Current sunk by a short circuit at this component
    pub short_amps: f64,
    pub in_pwr: f64,
    pub out_pwr: f64,
    pub in_freq: f64,
    pub out_freq: f64,
    pub failed: bool,
    pub shorted: bool,
    /// Randomized severity of an active short, in [0.9, 1.0)
    pub leak_factor: f64,
}

impl PowerState {
    /// Zero the per-tick quantities while keeping failure flags intact.
    pub fn reset(&mut self) {
        let failed = self.failed;
        let shorted = self.shorted;
        let leak_factor = self.leak_factor;
        *self = Self {
            failed,
            shorted,
            leak_factor,
            ..Self::default()
        };
    }
}

/// Bounded set of source attributions for one component.
///
/// A DC node may be energized by up to [`MAX_SRCS`] equal-voltage sources at
/// once; the set doubles as the per-source "seen" mask during paint, so a
/// traversal that re-offers a voltage from an already-recorded source
/// terminates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrcSet {
    slots: [Option<CompId>; MAX_SRCS],
    len: usize,
}

impl SrcSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded attributions.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no source is attributed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when `src` is already attributed.
    pub fn contains(&self, src: CompId) -> bool {
        self.slots[..self.len].iter().any(|s| *s == Some(src))
    }

    /// Record an attribution; returns false when the set is full.
    pub fn insert(&mut self, src: CompId) -> bool {
        if self.contains(src) {
            return true;
        }
        if self.len >= MAX_SRCS {
            return false;
        }
        self.slots[self.len] = Some(src);
        self.len += 1;
        true
    }

    /// Drop all attributions.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Iterate the recorded sources.
    pub fn iter(&self) -> impl Iterator<Item = CompId> + '_ {
        self.slots[..self.len].iter().filter_map(|s| *s)
    }
}

// =============================================================================
// Persistent records
// =============================================================================

/// Kind-specific mutable state that survives serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KindRecord {
    Batt {
        /// Charge fraction in [0, 1]
        charge: f64,
        /// Cell temperature in °C
        temp_c: f64,
        /// Power restored by a charger during the last tick (W)
        rechg_w: f64,
    },
    Gen {
        /// Voltage governor filter state
        stab_u: f64,
        /// Frequency governor filter state
        stab_f: f64,
    },
    Cb {
        /// Caller-requested closed state
        set: bool,
        /// Filament temperature fraction in [0, 1]
        temp: f64,
        /// Latched after an auto-trip until the filament cools
        tripped: bool,
    },
    Tie {
        /// Per-endpoint tied flags, in endpoint order
        tied: Vec<bool>,
    },
    Load {
        /// Input capacitor voltage
        incap_volts: f64,
    },
    /// Components without kind-specific mutable state
    Passive,
}

/// Complete mutable state of one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompRecord {
    pub failed: bool,
    pub shorted: bool,
    #[serde(flatten)]
    pub kind: KindRecord,
}

/// Snapshot of every component's mutable state, keyed by component name.
///
/// The spec digest ties a snapshot to the declarative network text it was
/// taken from; restoring against a network built from different text is
/// rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    /// SHA-256 hex digest of the declarative spec the network was built from
    pub spec_digest: Option<String>,
    /// Per-component records in stable name order
    pub comps: BTreeMap<String, CompRecord>,
}
