//! # aeps-sim: Concurrent Tick Solver
//!
//! Runs the steady-state electrical solver over an immutable
//! [`aeps_core::Network`] at a fixed 20 Hz logical rate on a dedicated
//! worker thread.
//!
//! ## Concurrency model
//!
//! - The worker owns all tick state; no lock is held across a tick.
//! - Callers mutate through small typed locks (the control plane); the
//!   worker copies `cur` state into its `wk` state at the start of each
//!   tick, so every tick sees a consistent topology snapshot.
//! - Each component's published state sits behind its own lock; a reader
//!   always sees an internally consistent per-component snapshot. Readers
//!   needing cross-component coherency use [`Simulation::snapshot_all`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use aeps_sim::Simulation;
//!
//! # fn demo(network: aeps_core::Network) -> aeps_core::ElecResult<()> {
//! let sim = Simulation::new(network);
//! sim.set_gen_rpm_cb("GEN_1", || 4100.0)?;
//! sim.start()?;
//!
//! let gen = sim.network().find("GEN_1").unwrap();
//! println!("generator output: {} V", sim.out_volts(gen).value());
//!
//! sim.stop();
//! # Ok(())
//! # }
//! ```
//!
//! Deterministic runs (tests, replays) can skip the worker entirely and
//! advance the solver synchronously with [`Simulation::step`].

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use aeps_core::state::{CompRecord, KindRecord, SystemSnapshot};
use aeps_core::{
    Amperes, Celsius, CompId, DeviceKind, ElecError, ElecResult, Hertz, Network, Volts, Watts,
};

mod controls;
mod scheduler;
mod solver;

pub use controls::{LoadFn, RpmFn};
pub use solver::{CompView, DynView, TICK_PERIOD_SECS};

use solver::{publish_idle, reset, run_tick, Shared, SolverState};

/// A live simulation over one network.
///
/// All methods are callable from any thread. Mutators either queue work
/// for the next tick or return a typed precondition error leaving state
/// unchanged; observers never fail and return the most recently published
/// value (zero before the first tick).
pub struct Simulation {
    network: Arc<Network>,
    shared: Arc<Shared>,
    /// Parked tick state while no worker is running
    solver: Mutex<Option<SolverState>>,
    worker: Mutex<Option<scheduler::WorkerHandle>>,
}

impl Simulation {
    /// Wrap a validated network. No thread is started yet.
    pub fn new(network: Network) -> Self {
        let network = Arc::new(network);
        let shared = Arc::new(Shared::new(&network));
        let state = SolverState::new(&network);
        publish_idle(&network, &state, &shared);
        Self {
            network,
            shared,
            solver: Mutex::new(Some(state)),
            worker: Mutex::new(None),
        }
    }

    /// The underlying component catalog.
    pub fn network(&self) -> &Network {
        &self.network
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Check the start preconditions: every generator needs an rpm callback
    /// and every load without a standard demand needs a load callback.
    pub fn can_start(&self) -> ElecResult<()> {
        let callbacks = self.shared.controls.callbacks.lock();
        for comp in self.network.comps() {
            match &comp.kind {
                DeviceKind::Gen(_) => {
                    if !callbacks.rpm.contains_key(&comp.id) {
                        return Err(ElecError::Precondition(format!(
                            "generator '{}' has no rpm callback bound",
                            comp.name
                        )));
                    }
                }
                DeviceKind::Load(l) => {
                    if l.std_load.is_none() && !callbacks.load.contains_key(&comp.id) {
                        return Err(ElecError::Precondition(format!(
                            "load '{}' has no demand callback bound",
                            comp.name
                        )));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Spawn the solver worker.
    pub fn start(&self) -> ElecResult<()> {
        if let Some(fault) = self.fault() {
            return Err(ElecError::Solver(fault));
        }
        self.can_start()?;
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(ElecError::Precondition("simulation already started".into()));
        }
        let state = self
            .solver
            .lock()
            .take()
            .ok_or_else(|| ElecError::Precondition("solver state unavailable".into()))?;
        self.shared.running.store(true, Ordering::Release);
        match scheduler::spawn(Arc::clone(&self.network), Arc::clone(&self.shared), state) {
            Ok(handle) => {
                *worker = Some(handle);
                info!(comps = self.network.len(), "simulation started");
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// True while the worker is running.
    pub fn is_started(&self) -> bool {
        self.worker.lock().is_some() && self.shared.running.load(Ordering::Acquire)
    }

    /// Stop the worker, joining it at a tick boundary. In-flight ticks run
    /// to completion. A no-op when not started.
    pub fn stop(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            self.shared.running.store(false, Ordering::Release);
            let state = handle.join();
            *self.solver.lock() = Some(state);
            info!("simulation stopped");
        }
    }

    /// The fault that killed the solver, if any.
    pub fn fault(&self) -> Option<String> {
        self.shared.fault.lock().clone()
    }

    /// Advance the solver synchronously by `ticks` logical ticks.
    ///
    /// Only valid while the worker is not running; this is the
    /// deterministic path used by tests and replays.
    pub fn step(&self, ticks: usize) -> ElecResult<()> {
        if self.worker.lock().is_some() {
            return Err(ElecError::Precondition(
                "cannot step while the worker is running".into(),
            ));
        }
        if let Some(fault) = self.fault() {
            return Err(ElecError::Solver(fault));
        }
        let mut guard = self.solver.lock();
        let state = guard
            .as_mut()
            .ok_or_else(|| ElecError::Precondition("solver state unavailable".into()))?;
        for _ in 0..ticks {
            if let Err(fault) = run_tick(&self.network, state, &self.shared, TICK_PERIOD_SECS) {
                *self.shared.fault.lock() = Some(fault.clone());
                return Err(ElecError::Solver(fault));
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutators
    // ─────────────────────────────────────────────────────────────────────

    /// Scale logical time: the worker period becomes `50 ms / factor`.
    pub fn set_time_factor(&self, factor: f64) -> ElecResult<()> {
        if !(factor > 0.0 && factor.is_finite()) {
            return Err(ElecError::Precondition(format!(
                "time factor {} out of range",
                factor
            )));
        }
        *self.shared.controls.time_factor.lock() = factor;
        Ok(())
    }

    /// Pause/resume solving; state is preserved while paused.
    pub fn set_paused(&self, paused: bool) {
        self.shared.controls.paused.store(paused, Ordering::Release);
    }

    /// Request a breaker open/closed. Closing a tripped breaker during its
    /// cooldown (or a blown fuse, ever) is rejected.
    pub fn set_cb(&self, name: &str, closed: bool) -> ElecResult<()> {
        let id = self.resolve(name)?;
        let DeviceKind::Cb(cfg) = &self.network.comp(id).kind else {
            return Err(ElecError::Precondition(format!(
                "'{}' is not a breaker",
                name
            )));
        };
        if closed {
            if let DynView::Cb { tripped: true, .. } = self.comp_view(id).dynamic {
                return Err(ElecError::Precondition(if cfg.fuse {
                    format!("fuse '{}' is blown", name)
                } else {
                    format!("breaker '{}' is latched after a trip; let it cool", name)
                }));
            }
        }
        self.shared.controls.breakers.lock().insert(id, closed);
        Ok(())
    }

    /// Replace a blown fuse. Only allowed once the filament is cold.
    pub fn reset_fuse(&self, name: &str) -> ElecResult<()> {
        let id = self.resolve(name)?;
        let DeviceKind::Cb(cfg) = &self.network.comp(id).kind else {
            return Err(ElecError::Precondition(format!(
                "'{}' is not a breaker",
                name
            )));
        };
        if !cfg.fuse {
            return Err(ElecError::Precondition(format!(
                "'{}' is not a fuse",
                name
            )));
        }
        if let DynView::Cb { temp, .. } = self.comp_view(id).dynamic {
            if temp >= solver::CB_TRIP_HYSTERESIS {
                return Err(ElecError::Precondition(format!(
                    "fuse '{}' is still hot",
                    name
                )));
            }
        }
        self.shared.controls.setpoints.lock().fuse_resets.push(id);
        Ok(())
    }

    /// Tie exactly the listed endpoints (by bus name); all others untie.
    pub fn set_tie(&self, name: &str, endpoints: &[&str]) -> ElecResult<()> {
        let id = self.resolve(name)?;
        let comp = self.network.comp(id);
        if !matches!(comp.kind, DeviceKind::Tie) {
            return Err(ElecError::Precondition(format!("'{}' is not a tie", name)));
        }
        let mut flags = vec![false; comp.ports.len()];
        for ep_name in endpoints {
            let ep = self.network.find(ep_name).ok_or_else(|| {
                ElecError::Precondition(format!(
                    "'{}' is not an endpoint of tie '{}'",
                    ep_name, name
                ))
            })?;
            let idx = comp.ports.iter().position(|&p| p == ep).ok_or_else(|| {
                ElecError::Precondition(format!(
                    "'{}' is not an endpoint of tie '{}'",
                    ep_name, name
                ))
            })?;
            flags[idx] = true;
        }
        self.shared.controls.ties.lock().insert(id, flags);
        Ok(())
    }

    /// Tie all endpoints of a tie.
    pub fn set_tie_all(&self, name: &str) -> ElecResult<()> {
        let id = self.resolve(name)?;
        let comp = self.network.comp(id);
        if !matches!(comp.kind, DeviceKind::Tie) {
            return Err(ElecError::Precondition(format!("'{}' is not a tie", name)));
        }
        self.shared
            .controls
            .ties
            .lock()
            .insert(id, vec![true; comp.ports.len()]);
        Ok(())
    }

    /// Untie all endpoints of a tie.
    pub fn set_tie_none(&self, name: &str) -> ElecResult<()> {
        let id = self.resolve(name)?;
        let comp = self.network.comp(id);
        if !matches!(comp.kind, DeviceKind::Tie) {
            return Err(ElecError::Precondition(format!("'{}' is not a tie", name)));
        }
        self.shared
            .controls
            .ties
            .lock()
            .insert(id, vec![false; comp.ports.len()]);
        Ok(())
    }

    /// Override a battery's charge fraction.
    pub fn set_batt_charge(&self, name: &str, charge: f64) -> ElecResult<()> {
        let id = self.resolve(name)?;
        if !matches!(self.network.comp(id).kind, DeviceKind::Batt(_)) {
            return Err(ElecError::Precondition(format!(
                "'{}' is not a battery",
                name
            )));
        }
        if !(0.0..=1.0).contains(&charge) {
            return Err(ElecError::Precondition(format!(
                "charge {} out of [0, 1]",
                charge
            )));
        }
        self.shared
            .controls
            .setpoints
            .lock()
            .batt_charge
            .insert(id, charge);
        Ok(())
    }

    /// Set a battery's cell temperature.
    pub fn set_batt_temp(&self, name: &str, temp: Celsius) -> ElecResult<()> {
        let id = self.resolve(name)?;
        if !matches!(self.network.comp(id).kind, DeviceKind::Batt(_)) {
            return Err(ElecError::Precondition(format!(
                "'{}' is not a battery",
                name
            )));
        }
        if !(-90.0..=90.0).contains(&temp.value()) {
            return Err(ElecError::Precondition(format!(
                "temperature {} out of [-90, +90] °C",
                temp
            )));
        }
        self.shared
            .controls
            .setpoints
            .lock()
            .batt_temp
            .insert(id, temp.value());
        Ok(())
    }

    /// Bind a generator's rpm callback. Invoked on the solver thread every
    /// tick; it must be wait-free and re-entrant.
    pub fn set_gen_rpm_cb(
        &self,
        name: &str,
        cb: impl Fn() -> f64 + Send + Sync + 'static,
    ) -> ElecResult<()> {
        let id = self.resolve(name)?;
        if !matches!(self.network.comp(id).kind, DeviceKind::Gen(_)) {
            return Err(ElecError::Precondition(format!(
                "'{}' is not a generator",
                name
            )));
        }
        let mut callbacks = self.shared.controls.callbacks.lock();
        callbacks.rpm.insert(id, Arc::new(cb));
        callbacks.generation += 1;
        Ok(())
    }

    /// Bind a load's demand callback (watts for stabilized loads, amps
    /// otherwise). Same wait-free contract as the rpm callback.
    pub fn set_load_cb(
        &self,
        name: &str,
        cb: impl Fn(f64) -> f64 + Send + Sync + 'static,
    ) -> ElecResult<()> {
        let id = self.resolve(name)?;
        if !matches!(self.network.comp(id).kind, DeviceKind::Load(_)) {
            return Err(ElecError::Precondition(format!("'{}' is not a load", name)));
        }
        let mut callbacks = self.shared.controls.callbacks.lock();
        callbacks.load.insert(id, Arc::new(cb));
        callbacks.generation += 1;
        Ok(())
    }

    /// Mark a component failed (open) or repaired.
    pub fn set_failed(&self, name: &str, failed: bool) -> ElecResult<()> {
        let id = self.resolve(name)?;
        self.shared
            .controls
            .setpoints
            .lock()
            .failed
            .insert(id, failed);
        Ok(())
    }

    /// Mark a component shorted (or clear the short). A shorted component
    /// draws a randomized fault current.
    pub fn set_shorted(&self, name: &str, shorted: bool) -> ElecResult<()> {
        let id = self.resolve(name)?;
        self.shared
            .controls
            .setpoints
            .lock()
            .shorted
            .insert(id, shorted);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Observers
    // ─────────────────────────────────────────────────────────────────────

    /// The complete published view of one component. A foreign handle
    /// yields the zero view.
    pub fn comp_view(&self, id: CompId) -> CompView {
        self.shared
            .views
            .get(id.value())
            .map(|v| v.read().clone())
            .unwrap_or_default()
    }

    pub fn in_volts(&self, id: CompId) -> Volts {
        Volts(self.comp_view(id).state.in_volts)
    }

    pub fn out_volts(&self, id: CompId) -> Volts {
        Volts(self.comp_view(id).state.out_volts)
    }

    pub fn in_amps(&self, id: CompId) -> Amperes {
        Amperes(self.comp_view(id).state.in_amps)
    }

    pub fn out_amps(&self, id: CompId) -> Amperes {
        Amperes(self.comp_view(id).state.out_amps)
    }

    pub fn in_pwr(&self, id: CompId) -> Watts {
        Watts(self.comp_view(id).state.in_pwr)
    }

    pub fn out_pwr(&self, id: CompId) -> Watts {
        Watts(self.comp_view(id).state.out_pwr)
    }

    pub fn in_freq(&self, id: CompId) -> Hertz {
        Hertz(self.comp_view(id).state.in_freq)
    }

    pub fn out_freq(&self, id: CompId) -> Hertz {
        Hertz(self.comp_view(id).state.out_freq)
    }

    /// A load's input-capacitor voltage (zero for anything else).
    pub fn incap_volts(&self, id: CompId) -> Volts {
        match self.comp_view(id).dynamic {
            DynView::Load { incap_volts } => Volts(incap_volts),
            _ => Volts(0.0),
        }
    }

    /// Whether the component is energized: loads compare their output
    /// against their minimum voltage, sources report live output, the rest
    /// report painted input.
    pub fn powered(&self, id: CompId) -> bool {
        let Some(comp) = self.network.get(id) else {
            return false;
        };
        let view = self.comp_view(id);
        match &comp.kind {
            DeviceKind::Load(l) => view.state.out_volts >= l.min_volts.value(),
            DeviceKind::Batt(_) | DeviceKind::Gen(_) => view.state.out_volts > 0.0,
            _ => view.state.in_volts > 0.0,
        }
    }

    /// The sources energizing this component in the published tick.
    pub fn sources(&self, id: CompId) -> Vec<CompId> {
        self.comp_view(id).srcs.iter().collect()
    }

    /// Cross-component-coherent snapshot of every published view, in
    /// declaration order.
    pub fn snapshot_all(&self) -> Vec<CompView> {
        let _coherency = self.shared.publish_lock.lock();
        self.shared.views.iter().map(|v| v.read().clone()).collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Snapshot save/restore
    // ─────────────────────────────────────────────────────────────────────

    /// Capture every component's mutable state, keyed by name.
    pub fn save_state(&self) -> SystemSnapshot {
        let _coherency = self.shared.publish_lock.lock();
        let breakers = self.shared.controls.breakers.lock();
        let ties = self.shared.controls.ties.lock();

        let mut comps = BTreeMap::new();
        for comp in self.network.comps() {
            let view = self.shared.views[comp.id.value()].read();
            let kind = match (&comp.kind, &view.dynamic) {
                (
                    DeviceKind::Batt(_),
                    DynView::Batt {
                        charge,
                        temp_c,
                        rechg_w,
                    },
                ) => KindRecord::Batt {
                    charge: *charge,
                    temp_c: *temp_c,
                    rechg_w: *rechg_w,
                },
                (DeviceKind::Gen(_), DynView::Gen { stab_u, stab_f, .. }) => KindRecord::Gen {
                    stab_u: *stab_u,
                    stab_f: *stab_f,
                },
                (DeviceKind::Cb(_), DynView::Cb { temp, tripped, .. }) => KindRecord::Cb {
                    set: breakers.get(&comp.id).copied().unwrap_or(true),
                    temp: *temp,
                    tripped: *tripped,
                },
                (DeviceKind::Tie, _) => KindRecord::Tie {
                    tied: ties.get(&comp.id).cloned().unwrap_or_default(),
                },
                (DeviceKind::Load(_), DynView::Load { incap_volts }) => KindRecord::Load {
                    incap_volts: *incap_volts,
                },
                _ => KindRecord::Passive,
            };
            comps.insert(
                comp.name.clone(),
                CompRecord {
                    failed: view.state.failed,
                    shorted: view.state.shorted,
                    kind,
                },
            );
        }
        SystemSnapshot {
            spec_digest: self.network.spec_digest().map(str::to_string),
            comps,
        }
    }

    /// Restore previously captured state. Validates the spec digest and
    /// every record against the catalog before anything is applied.
    pub fn restore_state(&self, snap: &SystemSnapshot) -> ElecResult<()> {
        if let (Some(ours), Some(theirs)) = (self.network.spec_digest(), snap.spec_digest.as_deref())
        {
            if ours != theirs {
                return Err(ElecError::Snapshot(
                    "snapshot was taken from a different network spec".into(),
                ));
            }
        }
        for (name, record) in &snap.comps {
            let id = self.network.find(name).ok_or_else(|| {
                ElecError::Snapshot(format!("snapshot names unknown component '{}'", name))
            })?;
            let comp = self.network.comp(id);
            let matches = matches!(
                (&record.kind, &comp.kind),
                (KindRecord::Batt { .. }, DeviceKind::Batt(_))
                    | (KindRecord::Gen { .. }, DeviceKind::Gen(_))
                    | (KindRecord::Cb { .. }, DeviceKind::Cb(_))
                    | (KindRecord::Tie { .. }, DeviceKind::Tie)
                    | (KindRecord::Load { .. }, DeviceKind::Load(_))
                    | (KindRecord::Passive, _)
            );
            if !matches {
                return Err(ElecError::Snapshot(format!(
                    "snapshot record for '{}' does not match its kind",
                    name
                )));
            }
            if let KindRecord::Tie { tied } = &record.kind {
                if tied.len() != comp.ports.len() {
                    return Err(ElecError::Snapshot(format!(
                        "snapshot tie record for '{}' has {} endpoints, network has {}",
                        name,
                        tied.len(),
                        comp.ports.len()
                    )));
                }
            }
        }

        if self.is_started() {
            *self.shared.controls.restore.lock() = Some(snap.clone());
        } else {
            let mut guard = self.solver.lock();
            let state = guard
                .as_mut()
                .ok_or_else(|| ElecError::Precondition("solver state unavailable".into()))?;
            reset::apply_snapshot(&self.network, state, &self.shared, snap);
            publish_idle(&self.network, state, &self.shared);
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> ElecResult<CompId> {
        self.network
            .find(name)
            .ok_or_else(|| ElecError::Precondition(format!("no component named '{}'", name)))
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.stop();
    }
}
