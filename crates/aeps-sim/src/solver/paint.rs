//! Tick phase 3: voltage propagation ("paint").
//!
//! Every live origin source walks the network from its bus, offering its
//! output voltage. A node accepts the highest offer; equal DC offers from
//! distinct sources become shared attributions, equal AC offers are a
//! conflict and flag the node shorted. Converters re-radiate on their
//! output side as new sources. The walk is depth-limited; overflow means a
//! malformed network and faults the solver.

use tracing::warn;

use aeps_core::{DeviceKind, Network, MAX_TRAVERSAL_DEPTH};
use aeps_core::CompId;

use super::{Dyn, SolverFault, SolverState};

pub(crate) fn paint(network: &Network, st: &mut SolverState) -> Result<(), SolverFault> {
    for comp in network.comps() {
        if !comp.is_origin_source() {
            continue;
        }
        let i = comp.id.value();
        if st.rw[i].failed || st.rw[i].out_volts <= 0.0 {
            continue;
        }
        let volts = st.rw[i].out_volts;
        let freq = st.rw[i].out_freq;
        let Some(bus) = comp.bus() else { continue };
        paint_comp(network, st, comp.id, bus, comp.id, volts, freq, 0)?;
    }
    Ok(())
}

/// Offer `volts` from `src` to `id`, entered from `upstream`.
#[allow(clippy::too_many_arguments)]
fn paint_comp(
    network: &Network,
    st: &mut SolverState,
    src: CompId,
    id: CompId,
    upstream: CompId,
    volts: f64,
    freq: f64,
    depth: usize,
) -> Result<(), SolverFault> {
    if depth > MAX_TRAVERSAL_DEPTH {
        return Err(format!(
            "paint depth limit ({}) exceeded at '{}'; network is malformed",
            MAX_TRAVERSAL_DEPTH,
            network.comp(id).name
        ));
    }

    let comp = network.comp(id);
    let i = id.value();

    if st.rw[i].failed {
        return Ok(());
    }

    // Entry gating: a component that does not conduct from this direction
    // (or in this switch state) is left untouched, so a prior valid paint
    // from the conducting direction survives.
    match &comp.kind {
        DeviceKind::Cb(_) => {
            let closed = match &st.dynamics[i] {
                Dyn::Cb(cb) => cb.wk_set,
                _ => false,
            };
            if !closed {
                return Ok(());
            }
        }
        DeviceKind::Diode => {
            let Some((anode, _)) = comp.sides() else {
                return Ok(());
            };
            if upstream != anode {
                // Reverse-biased
                return Ok(());
            }
        }
        DeviceKind::Tie => {
            let entry_tied = comp
                .ports
                .iter()
                .position(|&p| p == upstream)
                .and_then(|idx| match &st.dynamics[i] {
                    Dyn::Tie(tie) => tie.wk.get(idx).copied(),
                    _ => None,
                })
                .unwrap_or(false);
            if !entry_tied {
                return Ok(());
            }
        }
        DeviceKind::Tru(_) => {
            let Some((input, _)) = comp.sides() else {
                return Ok(());
            };
            if upstream != input {
                // Converters never conduct backwards
                return Ok(());
            }
        }
        _ => {}
    }

    let cur = st.rw[i].in_volts;
    if volts < cur {
        // A higher-voltage source already owns this node
        return Ok(());
    }
    if volts == cur && !st.srcs[i].is_empty() {
        if st.srcs[i].contains(src) {
            // Seen this traversal; terminates cycles
            return Ok(());
        }
        if comp.ac {
            // Two distinct AC sources at one node is a paralleling fault
            warn!(comp = %comp.name, "AC double-source conflict");
            st.rw[i].shorted = true;
            return Ok(());
        }
        if !st.srcs[i].insert(src) {
            // Attribution set full; drop the extra offer
            return Ok(());
        }
        // Equal-voltage DC share: continue so the attribution spreads
    } else {
        st.srcs[i].clear();
        st.srcs[i].insert(src);
        st.rw[i].in_volts = volts;
        st.rw[i].in_freq = freq;
    }

    match &comp.kind {
        DeviceKind::Bus(_) => {
            st.rw[i].out_volts = volts;
            st.rw[i].out_freq = freq;
            for idx in 0..comp.ports.len() {
                let ep = comp.ports[idx];
                if ep != upstream {
                    paint_comp(network, st, src, ep, id, volts, freq, depth + 1)?;
                }
            }
        }
        DeviceKind::Cb(_) | DeviceKind::Shunt => {
            st.rw[i].out_volts = volts;
            st.rw[i].out_freq = freq;
            if let Some(other) = comp.other_side(upstream) {
                paint_comp(network, st, src, other, id, volts, freq, depth + 1)?;
            }
        }
        DeviceKind::Diode => {
            // Entry gating guarantees we came in on the anode
            let Some((_, cathode)) = comp.sides() else {
                return Ok(());
            };
            st.rw[i].out_volts = volts;
            paint_comp(network, st, src, cathode, id, volts, freq, depth + 1)?;
        }
        DeviceKind::Tie => {
            let tied: Vec<bool> = match &st.dynamics[i] {
                Dyn::Tie(tie) => tie.wk.clone(),
                _ => return Ok(()),
            };
            st.rw[i].out_volts = volts;
            st.rw[i].out_freq = freq;
            for (idx, &ep) in comp.ports.iter().enumerate() {
                if ep != upstream && tied.get(idx).copied().unwrap_or(false) {
                    paint_comp(network, st, src, ep, id, volts, freq, depth + 1)?;
                }
            }
        }
        DeviceKind::Tru(tru) => {
            // Output scales proportionally with input deficit
            let out_volts = tru.out_volts.value() * (volts / tru.in_volts.value());
            let out_freq = tru.out_freq.value();
            st.rw[i].out_volts = out_volts;
            st.rw[i].out_freq = out_freq;
            if out_volts > 0.0 {
                let Some((_, output)) = comp.sides() else {
                    return Ok(());
                };
                // The converter becomes the source for everything downstream
                paint_comp(network, st, id, output, id, out_volts, out_freq, depth + 1)?;
            }
        }
        // Terminal sinks: they accept voltage but do not re-radiate
        DeviceKind::Load(_) | DeviceKind::Batt(_) | DeviceKind::Gen(_) => {}
    }
    Ok(())
}
