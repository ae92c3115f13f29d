//! Tick phase 5: breaker filament model.
//!
//! Heat deposited per tick scales with the square of the relative current,
//! normalized so that sustained rated current trips after `rate` seconds.
//! Cooling is exponential. An auto-trip opens both the worker state and
//! the caller-visible `cur_set`, so observers see the trip immediately;
//! a tripped breaker stays latched until the filament cools below the
//! hysteresis threshold (forever, for fuses).

use tracing::warn;

use aeps_core::{DeviceKind, Network};

use super::{Shared, SolverState, CB_COOL_TAU, CB_TRIP_HYSTERESIS};

pub(crate) fn thermal(network: &Network, st: &mut SolverState, shared: &Shared, dt: f64) {
    for comp in network.comps() {
        let DeviceKind::Cb(cfg) = &comp.kind else {
            continue;
        };
        let i = comp.id.value();
        let amps = st.rw[i].in_amps / if cfg.triphase { 3.0 } else { 1.0 };
        let rel = amps / cfg.max_amps.value();

        let cb = st.cb(comp.id);
        cb.temp += rel * rel * dt / cfg.rate;
        cb.temp -= cb.temp * (dt / CB_COOL_TAU);
        cb.temp = cb.temp.clamp(0.0, 1.0);

        if cb.temp >= 1.0 && cb.wk_set {
            cb.wk_set = false;
            cb.tripped = true;
            shared.controls.breakers.lock().insert(comp.id, false);
            warn!(cb = %comp.name, fuse = cfg.fuse, "breaker tripped on overcurrent");
        }

        if cb.tripped && !cfg.fuse && cb.temp < CB_TRIP_HYSTERESIS {
            // Cooled below hysteresis: the latch releases and the breaker
            // may be closed again by the caller.
            cb.tripped = false;
        }
    }
}
