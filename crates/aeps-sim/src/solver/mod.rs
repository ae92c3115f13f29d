//! The tick solver.
//!
//! One tick is a fixed pipeline over the worker's private state:
//!
//! 1. [`reset::intake`] - transactional handoff of caller mutations
//! 2. [`reset::reset`] - zero the per-tick buffers
//! 3. [`sources::update_sources`] - battery/generator EMF and charge
//! 4. [`paint::paint`] - voltage propagation from every live source
//! 5. [`integrate::integrate`] - load accounting back toward the sources
//! 6. [`thermal::thermal`] - breaker filament heating and auto-trip
//! 7. [`publish`] - copy `rw` into the reader-visible `ro` buffers
//!
//! The worker owns all of [`SolverState`]; the only synchronization points
//! are the small control-plane locks at intake and the per-component view
//! locks at publish.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use aeps_core::state::{PowerState, SrcSet};
use aeps_core::{CompId, DeviceKind, Network};

use crate::controls::{Controls, LoadFn, RpmFn};

pub(crate) mod integrate;
pub(crate) mod paint;
pub(crate) mod reset;
pub(crate) mod sources;
pub(crate) mod thermal;

/// Nominal tick period: 20 Hz.
pub const TICK_PERIOD_SECS: f64 = 0.05;

/// Resistance of a modeled short circuit; the drawn current is
/// `volts × leak_factor / SHORT_CIRCUIT_R`.
pub(crate) const SHORT_CIRCUIT_R: f64 = 0.1;

/// Fraction of EMF depression at full rated battery power.
pub(crate) const BATT_LOAD_DROOP: f64 = 0.1;

/// Breaker filament cooling time constant in seconds.
pub(crate) const CB_COOL_TAU: f64 = 10.0;

/// A tripped breaker may be closed again once its filament temperature has
/// decayed below this fraction.
pub(crate) const CB_TRIP_HYSTERESIS: f64 = 0.5;

/// A solver fault: programming-error conditions (depth overflow, curve
/// saturation) that are fatal to the tick and the network.
pub(crate) type SolverFault = String;

/// Per-kind dynamic state, worker-owned.
#[derive(Debug, Clone)]
pub(crate) enum Dyn {
    None,
    Batt(BattDyn),
    Gen(GenDyn),
    Cb(CbDyn),
    Tie(TieDyn),
    Load(LoadDyn),
}

#[derive(Debug, Clone)]
pub(crate) struct BattDyn {
    /// Charge fraction in [0, 1]
    pub charge: f64,
    /// Cell temperature in °C
    pub temp_c: f64,
    /// Charger power received last tick (W)
    pub rechg_w: f64,
    /// Load seen last tick, feeding the EMF depression filter
    pub prev_out_pwr: f64,
    pub prev_in_pwr: f64,
}

impl Default for BattDyn {
    fn default() -> Self {
        Self {
            charge: 1.0,
            temp_c: 15.0,
            rechg_w: 0.0,
            prev_out_pwr: 0.0,
            prev_in_pwr: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct GenDyn {
    /// rpm read from the callback this tick
    pub rpm: f64,
    /// Voltage governor filter state
    pub stab_u: f64,
    /// Frequency governor filter state
    pub stab_f: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct CbDyn {
    /// Worker-visible closed state for this tick
    pub wk_set: bool,
    /// Filament temperature fraction in [0, 1]
    pub temp: f64,
    /// Latched after an auto-trip until cooled (forever for fuses)
    pub tripped: bool,
}

impl Default for CbDyn {
    fn default() -> Self {
        Self {
            wk_set: true,
            temp: 0.0,
            tripped: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct TieDyn {
    /// Worker-visible tied flags for this tick, in endpoint order
    pub wk: Vec<bool>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct LoadDyn {
    /// Input capacitor voltage
    pub incap_volts: f64,
}

/// Worker-private clone of the callback registry.
#[derive(Default)]
pub(crate) struct CallbackCache {
    pub rpm: HashMap<CompId, Arc<RpmFn>>,
    pub load: HashMap<CompId, Arc<LoadFn>>,
    pub generation: u64,
}

/// Everything the worker mutates during a tick. Owned by the worker while
/// running, parked inside [`crate::Simulation`] otherwise.
pub(crate) struct SolverState {
    pub rw: Vec<PowerState>,
    pub srcs: Vec<SrcSet>,
    /// Walk stamps for cycle-guarding the integrate traversals
    pub integ_stamp: Vec<u64>,
    pub next_walk: u64,
    /// Converters integrated this tick (their rw is final)
    pub tru_done: Vec<bool>,
    pub dynamics: Vec<Dyn>,
    pub callbacks: CallbackCache,
    /// Per-network noise source for short-circuit leak factors
    pub rng: StdRng,
    pub tick_count: u64,
}

impl SolverState {
    pub fn new(network: &Network) -> Self {
        let n = network.len();
        let dynamics = network
            .comps()
            .map(|c| match &c.kind {
                DeviceKind::Batt(_) => Dyn::Batt(BattDyn::default()),
                DeviceKind::Gen(_) => Dyn::Gen(GenDyn::default()),
                DeviceKind::Cb(_) => Dyn::Cb(CbDyn::default()),
                DeviceKind::Tie => Dyn::Tie(TieDyn {
                    wk: vec![false; c.ports.len()],
                }),
                DeviceKind::Load(_) => Dyn::Load(LoadDyn::default()),
                _ => Dyn::None,
            })
            .collect();
        Self {
            rw: vec![PowerState::default(); n],
            srcs: vec![SrcSet::new(); n],
            integ_stamp: vec![0; n],
            next_walk: 0,
            tru_done: vec![false; n],
            dynamics,
            callbacks: CallbackCache::default(),
            rng: StdRng::seed_from_u64(network.seed()),
            tick_count: 0,
        }
    }

    pub fn batt(&mut self, id: CompId) -> &mut BattDyn {
        match &mut self.dynamics[id.value()] {
            Dyn::Batt(b) => b,
            _ => unreachable!("component {:?} is not a battery", id),
        }
    }

    pub fn gen(&mut self, id: CompId) -> &mut GenDyn {
        match &mut self.dynamics[id.value()] {
            Dyn::Gen(g) => g,
            _ => unreachable!("component {:?} is not a generator", id),
        }
    }

    pub fn cb(&mut self, id: CompId) -> &mut CbDyn {
        match &mut self.dynamics[id.value()] {
            Dyn::Cb(c) => c,
            _ => unreachable!("component {:?} is not a breaker", id),
        }
    }

}

/// Published per-component snapshot, the `ro` side of the dual buffer.
#[derive(Debug, Clone, Default)]
pub struct CompView {
    pub state: PowerState,
    /// Source attributions painted during the published tick
    pub srcs: SrcSet,
    pub dynamic: DynView,
}

/// Reader-visible kind-specific state.
#[derive(Debug, Clone, Default)]
pub enum DynView {
    #[default]
    None,
    Batt {
        charge: f64,
        temp_c: f64,
        rechg_w: f64,
    },
    Gen {
        rpm: f64,
        stab_u: f64,
        stab_f: f64,
    },
    Cb {
        wk_set: bool,
        temp: f64,
        tripped: bool,
    },
    Tie {
        tied: Vec<bool>,
    },
    Load {
        incap_volts: f64,
    },
}

/// State shared between the worker and callers.
pub(crate) struct Shared {
    pub views: Vec<RwLock<CompView>>,
    /// Held during publish; lets readers take a cross-component-coherent
    /// snapshot by locking it around their reads
    pub publish_lock: Mutex<()>,
    pub controls: Controls,
    pub running: AtomicBool,
    /// A solver fault message once the worker has died on one
    pub fault: Mutex<Option<String>>,
}

impl Shared {
    pub fn new(network: &Network) -> Self {
        Self {
            views: (0..network.len()).map(|_| RwLock::new(CompView::default())).collect(),
            publish_lock: Mutex::new(()),
            controls: Controls::new(network),
            running: AtomicBool::new(false),
            fault: Mutex::new(None),
        }
    }
}

/// Run one complete tick of logical duration `dt` seconds.
pub(crate) fn run_tick(
    network: &Network,
    st: &mut SolverState,
    shared: &Shared,
    dt: f64,
) -> Result<(), SolverFault> {
    reset::intake(network, st, shared);
    reset::reset(network, st);
    sources::update_sources(network, st, dt);
    paint::paint(network, st)?;
    integrate::integrate(network, st, dt)?;
    thermal::thermal(network, st, shared, dt);
    account(network, st);
    publish(network, st, shared);
    st.tick_count += 1;
    debug!(tick = st.tick_count, "tick complete");
    Ok(())
}

/// Post-accounting: derive powers from volts and amps everywhere, and stash
/// the source loads that feed next tick's EMF filters.
fn account(network: &Network, st: &mut SolverState) {
    for comp in network.comps() {
        let i = comp.id.value();
        // Converters compute their own asymmetric powers during integrate.
        if !matches!(comp.kind, DeviceKind::Tru(_)) {
            st.rw[i].in_pwr = st.rw[i].in_volts * st.rw[i].in_amps;
            st.rw[i].out_pwr = st.rw[i].out_volts * st.rw[i].out_amps;
        }
        match &comp.kind {
            DeviceKind::Gen(g) => {
                // Shaft power demanded from the engine
                let out_pwr = st.rw[i].out_pwr;
                let eff = g.eff_curve.eval(out_pwr);
                st.rw[i].in_pwr = if eff > 0.0 { out_pwr / eff } else { 0.0 };
            }
            DeviceKind::Batt(_) => {
                let (out_pwr, in_pwr) = (st.rw[i].out_pwr, st.rw[i].in_pwr);
                let batt = st.batt(comp.id);
                batt.prev_out_pwr = out_pwr;
                batt.prev_in_pwr = in_pwr;
            }
            _ => {}
        }
    }
}

/// Copy the worker's `rw` buffers into the reader-visible views.
fn publish(network: &Network, st: &SolverState, shared: &Shared) {
    let _coherency = shared.publish_lock.lock();
    for comp in network.comps() {
        let i = comp.id.value();
        let mut view = shared.views[i].write();
        view.state = st.rw[i];
        view.srcs = st.srcs[i];
        view.dynamic = match &st.dynamics[i] {
            Dyn::None => DynView::None,
            Dyn::Batt(b) => DynView::Batt {
                charge: b.charge,
                temp_c: b.temp_c,
                rechg_w: b.rechg_w,
            },
            Dyn::Gen(g) => DynView::Gen {
                rpm: g.rpm,
                stab_u: g.stab_u,
                stab_f: g.stab_f,
            },
            Dyn::Cb(c) => DynView::Cb {
                wk_set: c.wk_set,
                temp: c.temp,
                tripped: c.tripped,
            },
            Dyn::Tie(t) => DynView::Tie { tied: t.wk.clone() },
            Dyn::Load(l) => DynView::Load {
                incap_volts: l.incap_volts,
            },
        };
    }
}

/// Publish outside a tick (initialization, restores while stopped) so
/// observers see current dynamic state before the first tick runs.
pub(crate) fn publish_idle(network: &Network, st: &SolverState, shared: &Shared) {
    publish(network, st, shared);
}
