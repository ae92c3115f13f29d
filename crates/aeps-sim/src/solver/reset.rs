//! Tick phase 1: transactional control handoff and per-tick reset.
//!
//! The handoff copies every caller-visible `cur` state into the worker's
//! `wk` state under the corresponding small lock, so the rest of the tick
//! runs against a consistent topology snapshot without holding any lock.

use rand::Rng;

use aeps_core::state::{KindRecord, SystemSnapshot};
use aeps_core::Network;

use super::{Dyn, Shared, SolverState};

/// Control handoff: ties `cur → wk`, breakers `cur_set → wk_set`, queued
/// setpoints, failure flags, callback refresh, and any queued restore.
pub(crate) fn intake(network: &Network, st: &mut SolverState, shared: &Shared) {
    if let Some(snap) = shared.controls.restore.lock().take() {
        apply_snapshot(network, st, shared, &snap);
    }

    {
        let ties = shared.controls.ties.lock();
        for comp in network.comps() {
            if let Dyn::Tie(tie) = &mut st.dynamics[comp.id.value()] {
                if let Some(cur) = ties.get(&comp.id) {
                    tie.wk.clear();
                    tie.wk.extend_from_slice(cur);
                }
            }
        }
    }

    {
        let breakers = shared.controls.breakers.lock();
        for comp in network.comps() {
            if let Dyn::Cb(cb) = &mut st.dynamics[comp.id.value()] {
                let want = breakers.get(&comp.id).copied().unwrap_or(true);
                cb.wk_set = want && !cb.tripped;
            }
        }
    }

    {
        let mut setpoints = shared.controls.setpoints.lock();
        for (id, charge) in setpoints.batt_charge.drain() {
            if let Dyn::Batt(batt) = &mut st.dynamics[id.value()] {
                batt.charge = charge;
            }
        }
        for (id, temp_c) in setpoints.batt_temp.drain() {
            if let Dyn::Batt(batt) = &mut st.dynamics[id.value()] {
                batt.temp_c = temp_c;
            }
        }
        for (id, failed) in setpoints.failed.drain() {
            st.rw[id.value()].failed = failed;
        }
        for (id, shorted) in setpoints.shorted.drain() {
            let ps = &mut st.rw[id.value()];
            ps.shorted = shorted;
            ps.leak_factor = if shorted {
                st.rng.gen_range(0.9..1.0)
            } else {
                0.0
            };
            if !shorted {
                ps.short_amps = 0.0;
            }
        }
        for id in setpoints.fuse_resets.drain(..) {
            if let Dyn::Cb(cb) = &mut st.dynamics[id.value()] {
                if cb.temp < super::CB_TRIP_HYSTERESIS {
                    cb.tripped = false;
                }
            }
        }
    }

    {
        let callbacks = shared.controls.callbacks.lock();
        if callbacks.generation != st.callbacks.generation {
            st.callbacks.rpm = callbacks.rpm.clone();
            st.callbacks.load = callbacks.load.clone();
            st.callbacks.generation = callbacks.generation;
        }
    }
}

/// Zero all per-tick quantities: voltages, currents, attributions, walk
/// stamps. Failure flags and kind dynamics persist.
pub(crate) fn reset(network: &Network, st: &mut SolverState) {
    for comp in network.comps() {
        let i = comp.id.value();
        st.rw[i].reset();
        // AC-conflict shorts (zero leak factor) are transient and get
        // re-flagged by paint if the conflict persists; caller-commanded
        // shorts keep their sampled leak factor
        if st.rw[i].shorted && st.rw[i].leak_factor == 0.0 {
            st.rw[i].shorted = false;
        }
        st.srcs[i].clear();
        st.integ_stamp[i] = 0;
        st.tru_done[i] = false;
    }
    st.next_walk = 0;
}

/// Apply a validated snapshot to worker state and the control plane.
///
/// Callers have already checked names, kinds, and the spec digest; unknown
/// entries are skipped rather than faulting the tick.
pub(crate) fn apply_snapshot(
    network: &Network,
    st: &mut SolverState,
    shared: &Shared,
    snap: &SystemSnapshot,
) {
    for (name, record) in &snap.comps {
        let Some(id) = network.find(name) else {
            continue;
        };
        let i = id.value();
        st.rw[i].failed = record.failed;
        st.rw[i].shorted = record.shorted;
        st.rw[i].leak_factor = if record.shorted {
            st.rng.gen_range(0.9..1.0)
        } else {
            0.0
        };

        match &record.kind {
            KindRecord::Batt {
                charge,
                temp_c,
                rechg_w,
            } => {
                if let Dyn::Batt(batt) = &mut st.dynamics[i] {
                    batt.charge = *charge;
                    batt.temp_c = *temp_c;
                    batt.rechg_w = *rechg_w;
                    batt.prev_out_pwr = 0.0;
                    batt.prev_in_pwr = 0.0;
                }
            }
            KindRecord::Gen { stab_u, stab_f } => {
                if let Dyn::Gen(gen) = &mut st.dynamics[i] {
                    gen.stab_u = *stab_u;
                    gen.stab_f = *stab_f;
                }
            }
            KindRecord::Cb { set, temp, tripped } => {
                if let Dyn::Cb(cb) = &mut st.dynamics[i] {
                    cb.temp = *temp;
                    cb.tripped = *tripped;
                }
                shared.controls.breakers.lock().insert(id, *set);
            }
            KindRecord::Tie { tied } => {
                if network.comp(id).ports.len() == tied.len() {
                    shared.controls.ties.lock().insert(id, tied.clone());
                }
            }
            KindRecord::Load { incap_volts } => {
                if let Dyn::Load(load) = &mut st.dynamics[i] {
                    load.incap_volts = *incap_volts;
                }
            }
            KindRecord::Passive => {}
        }
    }
}

