//! Tick phase 2: source constitutive models.
//!
//! Batteries integrate last tick's discharge/recharge into their charge
//! fraction and compute a fresh EMF from charge, temperature, and load.
//! Generators poll their rpm callback and run the governor filters.

use aeps_core::curve::{BATT_SOC_VOLTS, BATT_TEMP_CAPACITY, BATT_TEMP_VOLTS};
use aeps_core::{BattConfig, DeviceKind, GenConfig, Network};

use super::{BattDyn, GenDyn, SolverState, BATT_LOAD_DROOP};

pub(crate) fn update_sources(network: &Network, st: &mut SolverState, dt: f64) {
    for comp in network.comps() {
        let i = comp.id.value();
        if st.rw[i].failed {
            continue;
        }
        match &comp.kind {
            DeviceKind::Batt(cfg) => {
                let (out_volts, out_freq) = {
                    let batt = st.batt(comp.id);
                    update_battery(cfg, batt, dt)
                };
                st.rw[i].out_volts = out_volts;
                st.rw[i].out_freq = out_freq;
            }
            DeviceKind::Gen(cfg) => {
                let rpm = st
                    .callbacks
                    .rpm
                    .get(&comp.id)
                    .map(|cb| cb.as_ref()())
                    .unwrap_or(0.0);
                let (out_volts, out_freq) = {
                    let gen = st.gen(comp.id);
                    gen.rpm = rpm;
                    update_generator(cfg, gen, dt)
                };
                st.rw[i].out_volts = out_volts;
                st.rw[i].out_freq = out_freq;
            }
            _ => {}
        }
    }
}

/// Battery model: integrate charge, then compute the terminal EMF.
///
/// Capacity is temperature-scaled (rated at 15 °C); the EMF is the nominal
/// voltage depressed by state of charge, by cell temperature, and by the
/// relative load seen on the previous tick.
fn update_battery(cfg: &BattConfig, batt: &mut BattDyn, dt: f64) -> (f64, f64) {
    let eff_capacity = cfg.capacity.value() * BATT_TEMP_CAPACITY.eval(batt.temp_c);

    if eff_capacity > 0.0 {
        let discharged_j = batt.prev_out_pwr * dt;
        let recharged_j = batt.prev_in_pwr * dt;
        batt.charge =
            (batt.charge - discharged_j / eff_capacity + recharged_j / eff_capacity).clamp(0.0, 1.0);
    }
    batt.rechg_w = batt.prev_in_pwr;

    let rel_load = (batt.prev_out_pwr / cfg.max_pwr.value()).clamp(0.0, 1.0);
    let emf = cfg.volts.value()
        * BATT_SOC_VOLTS.eval(batt.charge)
        * BATT_TEMP_VOLTS.eval(batt.temp_c)
        * (1.0 - BATT_LOAD_DROOP * rel_load);

    (emf.max(0.0), 0.0)
}

/// Generator model: the region factor maps raw rpm to the target output
/// fraction, and the governor low-pass separates the stabilized factor from
/// it so that output lags rpm changes (CSD simulation).
fn update_generator(cfg: &GenConfig, gen: &mut GenDyn, dt: f64) -> (f64, f64) {
    let rpm = gen.rpm.max(0.0);
    let region = region_factor(cfg, rpm);
    let ctr = cfg.ctr_rpm();

    // The governor target compensates the raw speed ratio so that a settled
    // filter yields out = nominal × region.
    let target = if rpm > 0.0 { region * (ctr / rpm) } else { 0.0 };

    gen.stab_u = filter_step(gen.stab_u, target, cfg.stab_rate_u, dt);
    gen.stab_f = filter_step(gen.stab_f, target, cfg.stab_rate_f, dt);

    let speed_ratio = rpm / ctr;
    let out_volts = (cfg.volts.value() * gen.stab_u * speed_ratio).max(0.0);
    let out_freq = if cfg.is_ac() {
        (cfg.freq.value() * gen.stab_f * speed_ratio).max(0.0)
    } else {
        0.0
    };
    (out_volts, out_freq)
}

/// Output fraction by rpm region: dead below excitation, linear ramp up to
/// the governed band, unity inside it, linear overspeed above (no
/// saturation).
pub(crate) fn region_factor(cfg: &GenConfig, rpm: f64) -> f64 {
    if rpm < cfg.exc_rpm {
        0.0
    } else if rpm < cfg.min_rpm {
        (rpm - cfg.exc_rpm) / (cfg.min_rpm - cfg.exc_rpm)
    } else if rpm <= cfg.max_rpm {
        1.0
    } else {
        rpm / cfg.max_rpm
    }
}

/// Single-pole low-pass: `state += (target - state) × min(1, dt/tau)`.
/// A zero time constant tracks instantly.
fn filter_step(state: f64, target: f64, tau: f64, dt: f64) -> f64 {
    if tau <= 0.0 {
        target
    } else {
        state + (target - state) * (dt / tau).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeps_core::{Curve, Hertz, Joules, Ohms, Volts, Watts};

    fn gen_cfg() -> GenConfig {
        GenConfig {
            volts: Volts(115.0),
            freq: Hertz(400.0),
            exc_rpm: 1000.0,
            min_rpm: 2000.0,
            max_rpm: 4000.0,
            stab_rate_u: 0.0,
            stab_rate_f: 0.0,
            int_r: Ohms(0.01),
            eff_curve: Curve::efficiency(vec![(0.0, 0.9), (10_000.0, 0.92)]).unwrap(),
        }
    }

    fn batt_cfg() -> BattConfig {
        BattConfig {
            volts: Volts(24.0),
            capacity: Joules(1.0e6),
            max_pwr: Watts(10_000.0),
            chg_r: Ohms(0.5),
            int_r: Ohms(1.0),
        }
    }

    #[test]
    fn test_region_factor_below_excitation() {
        let cfg = gen_cfg();
        assert_eq!(region_factor(&cfg, 0.0), 0.0);
        assert_eq!(region_factor(&cfg, 999.0), 0.0);
    }

    #[test]
    fn test_region_factor_ramp() {
        let cfg = gen_cfg();
        assert!((region_factor(&cfg, 1500.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_region_factor_governed_band() {
        let cfg = gen_cfg();
        assert_eq!(region_factor(&cfg, 2000.0), 1.0);
        assert_eq!(region_factor(&cfg, 3500.0), 1.0);
        assert_eq!(region_factor(&cfg, 4000.0), 1.0);
    }

    #[test]
    fn test_region_factor_overspeed_is_linear() {
        let cfg = gen_cfg();
        assert!((region_factor(&cfg, 5000.0) - 1.25).abs() < 1e-12);
        assert!((region_factor(&cfg, 8000.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_generator_settles_to_nominal_anywhere_in_band() {
        let cfg = gen_cfg();
        for rpm in [2000.0, 2500.0, 3000.0, 3999.0] {
            let mut gen = GenDyn {
                rpm,
                ..GenDyn::default()
            };
            let (volts, freq) = update_generator(&cfg, &mut gen, 0.05);
            assert!((volts - 115.0).abs() < 1e-9, "rpm {}: volts {}", rpm, volts);
            assert!((freq - 400.0).abs() < 1e-9, "rpm {}: freq {}", rpm, freq);
        }
    }

    #[test]
    fn test_generator_overspeed_scales_output() {
        let cfg = gen_cfg();
        let mut gen = GenDyn {
            rpm: 5000.0,
            ..GenDyn::default()
        };
        let (volts, freq) = update_generator(&cfg, &mut gen, 0.05);
        assert!((volts - 115.0 * 1.25).abs() < 1e-9);
        assert!((freq - 400.0 * 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_generator_dead_below_excitation() {
        let cfg = gen_cfg();
        let mut gen = GenDyn {
            rpm: 500.0,
            ..GenDyn::default()
        };
        let (volts, freq) = update_generator(&cfg, &mut gen, 0.05);
        assert_eq!(volts, 0.0);
        assert_eq!(freq, 0.0);
    }

    #[test]
    fn test_governor_filter_lags() {
        let mut cfg = gen_cfg();
        cfg.stab_rate_u = 1.0;
        let mut gen = GenDyn {
            rpm: 3000.0,
            ..GenDyn::default()
        };
        // One 50 ms step from cold: only a fraction of nominal
        let (volts, _) = update_generator(&cfg, &mut gen, 0.05);
        assert!(volts > 0.0 && volts < 115.0 * 0.1);
        // After many steps it converges
        let mut volts = 0.0;
        for _ in 0..400 {
            volts = update_generator(&cfg, &mut gen, 0.05).0;
        }
        assert!((volts - 115.0).abs() < 0.5);
    }

    #[test]
    fn test_battery_full_charge_light_load() {
        let cfg = batt_cfg();
        let mut batt = BattDyn::default();
        let (volts, freq) = update_battery(&cfg, &mut batt, 0.05);
        assert!((volts - 24.0).abs() < 1e-9);
        assert_eq!(freq, 0.0);
    }

    #[test]
    fn test_battery_discharge_integration() {
        let cfg = batt_cfg();
        let mut batt = BattDyn {
            prev_out_pwr: 240.0,
            ..BattDyn::default()
        };
        update_battery(&cfg, &mut batt, 0.05);
        // 240 W × 0.05 s = 12 J out of 1 MJ
        assert!((batt.charge - (1.0 - 12.0 / 1.0e6)).abs() < 1e-12);
    }

    #[test]
    fn test_battery_charge_monotone_under_discharge() {
        let cfg = batt_cfg();
        let mut batt = BattDyn {
            prev_out_pwr: 500.0,
            ..BattDyn::default()
        };
        let mut last = batt.charge;
        for _ in 0..100 {
            update_battery(&cfg, &mut batt, 0.05);
            assert!(batt.charge <= last);
            last = batt.charge;
        }
    }

    #[test]
    fn test_battery_recharge_raises_charge() {
        let cfg = batt_cfg();
        let mut batt = BattDyn {
            charge: 0.5,
            prev_in_pwr: 300.0,
            ..BattDyn::default()
        };
        update_battery(&cfg, &mut batt, 0.05);
        assert!(batt.charge > 0.5);
        assert!((batt.rechg_w - 300.0).abs() < 1e-12);
    }

    #[test]
    fn test_battery_cold_sags() {
        let cfg = batt_cfg();
        let mut warm = BattDyn::default();
        let mut cold = BattDyn {
            temp_c: -40.0,
            ..BattDyn::default()
        };
        let (v_warm, _) = update_battery(&cfg, &mut warm, 0.05);
        let (v_cold, _) = update_battery(&cfg, &mut cold, 0.05);
        assert!(v_cold < v_warm * 0.6);
    }

    #[test]
    fn test_battery_heavy_load_depresses_emf() {
        let cfg = batt_cfg();
        let mut batt = BattDyn {
            prev_out_pwr: 10_000.0,
            ..BattDyn::default()
        };
        let (volts, _) = update_battery(&cfg, &mut batt, 0.05);
        assert!((volts - 24.0 * 0.9).abs() < 0.05);
    }
}
