//! The control plane between callers and the solver worker.
//!
//! Callers never touch the worker's tick state directly. Every mutation
//! lands here first, behind a small per-purpose mutex, and the worker picks
//! it up during the transactional handoff at the start of the next tick
//! (`cur` state becoming `wk` state). This is what lets mutators stay
//! wait-free with respect to the solver: the only contention window is the
//! brief copy at reset time.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;

use aeps_core::state::SystemSnapshot;
use aeps_core::{CompId, DeviceKind, Network};

/// Generator rpm callback, polled by the worker each tick.
///
/// Must be wait-free and re-entrant: it runs on the solver thread.
pub type RpmFn = dyn Fn() -> f64 + Send + Sync;

/// Load demand callback: input volts in, demand out (watts for stabilized
/// loads, amps otherwise). Same wait-free contract as [`RpmFn`].
pub type LoadFn = dyn Fn(f64) -> f64 + Send + Sync;

/// One-shot and persistent setpoints for the next tick intake.
#[derive(Default)]
pub(crate) struct Setpoints {
    /// One-shot charge overrides, consumed at intake
    pub batt_charge: HashMap<CompId, f64>,
    /// One-shot temperature overrides, consumed at intake
    pub batt_temp: HashMap<CompId, f64>,
    /// One-shot failure flag changes, consumed at intake
    pub failed: HashMap<CompId, bool>,
    /// One-shot short flag changes, consumed at intake
    pub shorted: HashMap<CompId, bool>,
    /// Fuse replacements, consumed at intake (only honored cold)
    pub fuse_resets: Vec<CompId>,
}

/// Callback registry. The generation counter lets the worker keep a private
/// clone and refresh it only when a binding actually changed.
#[derive(Default)]
pub(crate) struct Callbacks {
    pub rpm: HashMap<CompId, Arc<RpmFn>>,
    pub load: HashMap<CompId, Arc<LoadFn>>,
    pub generation: u64,
}

/// All caller-visible mutable state, split into small typed locks.
pub(crate) struct Controls {
    /// Tie `cur` state: per-endpoint tied flags, caller truth
    pub ties: Mutex<HashMap<CompId, Vec<bool>>>,
    /// Breaker `cur_set`: caller-requested closed state
    pub breakers: Mutex<HashMap<CompId, bool>>,
    pub setpoints: Mutex<Setpoints>,
    pub callbacks: Mutex<Callbacks>,
    /// Logical-time scaling of the worker period
    pub time_factor: Mutex<f64>,
    /// While paused the worker skips solving but keeps state
    pub paused: AtomicBool,
    /// Queued state restore, applied at the next intake
    pub restore: Mutex<Option<SystemSnapshot>>,
}

impl Controls {
    /// Defaults: breakers closed, ties fully open, nominal time.
    pub fn new(network: &Network) -> Self {
        let mut ties = HashMap::new();
        let mut breakers = HashMap::new();
        for comp in network.comps() {
            match comp.kind {
                DeviceKind::Tie => {
                    ties.insert(comp.id, vec![false; comp.ports.len()]);
                }
                DeviceKind::Cb(_) => {
                    breakers.insert(comp.id, true);
                }
                _ => {}
            }
        }
        Self {
            ties: Mutex::new(ties),
            breakers: Mutex::new(breakers),
            setpoints: Mutex::new(Setpoints::default()),
            callbacks: Mutex::new(Callbacks::default()),
            time_factor: Mutex::new(1.0),
            paused: AtomicBool::new(false),
            restore: Mutex::new(None),
        }
    }
}
