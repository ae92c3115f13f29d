//! Tick phase 4: load accounting ("integrate").
//!
//! First every load computes its own demand from the painted input voltage
//! (callback or standard load, plus input-capacitor inrush and shorts).
//! Then every origin source walks downstream, mirroring the paint
//! traversal, summing the current attributed to it. Converters integrate
//! their secondary side once and reflect the demand through their
//! efficiency curve; multi-source nodes split demand by EMF × (1/R).

use aeps_core::{CompId, DeviceKind, LoadConfig, Network, MAX_TRAVERSAL_DEPTH};

use super::{Dyn, SolverFault, SolverState, SHORT_CIRCUIT_R};

pub(crate) fn integrate(
    network: &Network,
    st: &mut SolverState,
    dt: f64,
) -> Result<(), SolverFault> {
    for comp in network.comps() {
        if let DeviceKind::Load(cfg) = &comp.kind {
            load_demand(st, comp.id, cfg, dt);
        }
    }

    for comp in network.comps() {
        if !comp.is_origin_source() {
            continue;
        }
        let i = comp.id.value();
        if st.rw[i].failed || st.rw[i].out_volts <= 0.0 {
            continue;
        }
        let Some(bus) = comp.bus() else { continue };
        st.next_walk += 1;
        let walk = st.next_walk;
        let amps = integrate_comp(network, st, comp.id, bus, comp.id, walk, 0)?;
        st.rw[i].out_amps += amps;
    }
    Ok(())
}

/// Compute one load's network draw for this tick.
///
/// The input capacitor charges through its resistance whenever the network
/// offers more voltage than it holds, and self-discharges at the leak rate
/// otherwise. A load below its minimum voltage draws no steady current but
/// its output stays alive while the capacitor remains above the minimum.
fn load_demand(st: &mut SolverState, id: CompId, cfg: &LoadConfig, dt: f64) {
    let i = id.value();
    let in_v = st.rw[i].in_volts;
    let failed = st.rw[i].failed;
    let shorted = st.rw[i].shorted;
    let leak_factor = st.rw[i].leak_factor;
    let demand_fn = st.callbacks.load.get(&id).cloned();

    let mut cap_v = match &st.dynamics[i] {
        Dyn::Load(l) => l.incap_volts,
        _ => 0.0,
    };

    let mut inrush = 0.0;
    if cfg.has_incap() {
        if in_v > cap_v {
            let i_chg = (in_v - cap_v) / cfg.incap_r.value();
            cap_v = (cap_v + i_chg * dt / cfg.incap_c).min(in_v);
            inrush = i_chg;
        } else if in_v < cfg.min_volts.value() {
            // Supply lost: the capacitor self-discharges at the leak rate
            cap_v = (cap_v - cfg.incap_leak.value() * dt / cfg.incap_c).max(0.0);
        }
    }

    let powered = !failed && in_v >= cfg.min_volts.value();
    let mut load_amps = 0.0;
    if powered {
        let demand = match &demand_fn {
            Some(f) => f.as_ref()(in_v),
            None => cfg.std_load.unwrap_or(0.0),
        };
        if cfg.stabilized {
            // Constant power, converted at the effective voltage
            let eff_v = in_v.max(cfg.min_volts.value());
            load_amps = demand / eff_v;
        } else {
            load_amps = demand;
        }
    }

    let mut short_amps = 0.0;
    if shorted && !failed {
        short_amps = in_v * leak_factor / SHORT_CIRCUIT_R;
    }

    st.rw[i].out_volts = if powered { in_v } else { cap_v };
    st.rw[i].out_freq = if powered { st.rw[i].in_freq } else { 0.0 };
    st.rw[i].out_amps = load_amps;
    st.rw[i].in_amps = load_amps + inrush + short_amps;
    st.rw[i].short_amps = short_amps;
    if let Dyn::Load(l) = &mut st.dynamics[i] {
        l.incap_volts = cap_v;
    }
}

/// Demand attributed to `src` at `id`, entered from `upstream`, in amps at
/// the local voltage level.
fn integrate_comp(
    network: &Network,
    st: &mut SolverState,
    src: CompId,
    id: CompId,
    upstream: CompId,
    walk: u64,
    depth: usize,
) -> Result<f64, SolverFault> {
    if depth > MAX_TRAVERSAL_DEPTH {
        return Err(format!(
            "integrate depth limit ({}) exceeded at '{}'; network is malformed",
            MAX_TRAVERSAL_DEPTH,
            network.comp(id).name
        ));
    }

    let comp = network.comp(id);
    let i = id.value();

    if st.rw[i].failed || !st.srcs[i].contains(src) {
        return Ok(0.0);
    }

    match &comp.kind {
        DeviceKind::Bus(_) => {
            if st.integ_stamp[i] == walk {
                // Already summed on another path of this walk
                return Ok(0.0);
            }
            st.integ_stamp[i] = walk;
            let mut amps = 0.0;
            for idx in 0..comp.ports.len() {
                let ep = comp.ports[idx];
                if ep != upstream {
                    amps += integrate_comp(network, st, src, ep, id, walk, depth + 1)?;
                }
            }
            if st.rw[i].shorted {
                let short = st.rw[i].in_volts * st.rw[i].leak_factor / SHORT_CIRCUIT_R;
                st.rw[i].short_amps = short;
                amps += short;
            }
            st.rw[i].out_amps += amps;
            st.rw[i].in_amps = st.rw[i].out_amps;
            Ok(amps)
        }
        DeviceKind::Load(_) => Ok(src_share(network, st, id, src) * st.rw[i].in_amps),
        DeviceKind::Batt(cfg) => {
            // A painted battery is being fed: it sinks charging current
            // through its charge resistance.
            let amps = ((st.rw[i].in_volts - st.rw[i].out_volts) / cfg.chg_r.value()).max(0.0);
            let share = src_share(network, st, id, src);
            st.rw[i].in_amps += share * amps;
            Ok(share * amps)
        }
        DeviceKind::Gen(_) => Ok(0.0),
        DeviceKind::Cb(_) => {
            let closed = match &st.dynamics[i] {
                Dyn::Cb(cb) => cb.wk_set,
                _ => false,
            };
            if !closed {
                return Ok(0.0);
            }
            let Some(other) = comp.other_side(upstream) else {
                return Ok(0.0);
            };
            let amps = integrate_comp(network, st, src, other, id, walk, depth + 1)?;
            st.rw[i].in_amps += amps;
            st.rw[i].out_amps = st.rw[i].in_amps;
            Ok(amps)
        }
        DeviceKind::Shunt => {
            let Some(other) = comp.other_side(upstream) else {
                return Ok(0.0);
            };
            let amps = integrate_comp(network, st, src, other, id, walk, depth + 1)?;
            st.rw[i].in_amps += amps;
            st.rw[i].out_amps = st.rw[i].in_amps;
            Ok(amps)
        }
        DeviceKind::Diode => {
            let Some((anode, cathode)) = comp.sides() else {
                return Ok(0.0);
            };
            if upstream != anode {
                return Ok(0.0);
            }
            let amps = integrate_comp(network, st, src, cathode, id, walk, depth + 1)?;
            st.rw[i].in_amps += amps;
            st.rw[i].out_amps = st.rw[i].in_amps;
            Ok(amps)
        }
        DeviceKind::Tie => {
            if st.integ_stamp[i] == walk {
                return Ok(0.0);
            }
            st.integ_stamp[i] = walk;
            let tied: Vec<bool> = match &st.dynamics[i] {
                Dyn::Tie(tie) => tie.wk.clone(),
                _ => return Ok(0.0),
            };
            let mut amps = 0.0;
            for (idx, &ep) in comp.ports.iter().enumerate() {
                if ep != upstream && tied.get(idx).copied().unwrap_or(false) {
                    amps += integrate_comp(network, st, src, ep, id, walk, depth + 1)?;
                }
            }
            st.rw[i].in_amps += amps;
            st.rw[i].out_amps = st.rw[i].in_amps;
            Ok(amps)
        }
        DeviceKind::Tru(cfg) => {
            let Some((input, output)) = comp.sides() else {
                return Ok(0.0);
            };
            if upstream != input {
                return Ok(0.0);
            }
            if !st.tru_done[i] {
                st.tru_done[i] = true;
                st.next_walk += 1;
                let sub_walk = st.next_walk;
                let mut out_amps =
                    integrate_comp(network, st, id, output, id, sub_walk, depth + 1)?;
                if cfg.charger {
                    out_amps = out_amps.min(cfg.curr_lim.value());
                }
                let out_v = st.rw[i].out_volts;
                let out_pwr = out_v * out_amps;
                let eff = cfg.eff_curve.eval(out_pwr);
                if eff <= 0.0 || eff >= 1.0 {
                    return Err(format!(
                        "efficiency curve of '{}' yielded {} at {} W",
                        comp.name, eff, out_pwr
                    ));
                }
                let in_v = st.rw[i].in_volts;
                let in_amps = if in_v > 0.0 {
                    out_pwr / (in_v * eff)
                } else {
                    0.0
                };
                st.rw[i].out_amps = out_amps;
                st.rw[i].in_amps = in_amps;
                st.rw[i].out_pwr = out_pwr;
                st.rw[i].in_pwr = in_v * in_amps;
            }
            Ok(src_share(network, st, id, src) * st.rw[i].in_amps)
        }
    }
}

/// Fraction of the demand at `id` carried by `src`, weighted by
/// EMF × (1/R_internal) across the attributed sources.
fn src_share(network: &Network, st: &SolverState, id: CompId, src: CompId) -> f64 {
    let set = &st.srcs[id.value()];
    if set.len() <= 1 {
        return 1.0;
    }
    let weight = |s: CompId| -> f64 {
        let emf = st.rw[s.value()].out_volts;
        let r = network
            .comp(s)
            .source_int_r()
            .map(|o| o.value())
            .unwrap_or(1.0);
        if r > 0.0 {
            emf / r
        } else {
            0.0
        }
    };
    let total: f64 = set.iter().map(weight).sum();
    if total <= 0.0 {
        1.0 / set.len() as f64
    } else {
        weight(src) / total
    }
}
