//! End-to-end solver scenarios over small reference networks.
//!
//! Each test builds its network programmatically, advances the solver
//! deterministically with `step`, and checks the published observables.

use aeps_core::builder::{
    BattInput, BusInput, CbInput, EndptInput, GenInput, LoadInput, NetworkBuilder, PortTag,
    SimpleInput, SimpleKind, TruInput,
};
use aeps_core::{Celsius, DeviceKind, Network, TruMode};
use aeps_sim::{DynView, Simulation};

fn batt(name: &str) -> BattInput {
    BattInput {
        name: name.into(),
        volts: 24.0,
        capacity_j: 1.0e6,
        max_pwr_w: 10_000.0,
        chg_r_ohms: 0.5,
        int_r_ohms: 1.0,
        location: None,
        line: 0,
    }
}

fn gen(name: &str) -> GenInput {
    GenInput {
        name: name.into(),
        volts: 115.0,
        freq_hz: 400.0,
        exc_rpm: 1000.0,
        min_rpm: 2000.0,
        max_rpm: 4000.0,
        stab_rate_u: 0.0,
        stab_rate_f: 0.0,
        int_r_ohms: 0.01,
        eff_points: vec![(0.0, 0.9), (20_000.0, 0.92)],
        location: None,
        line: 0,
    }
}

fn dc_load(name: &str, amps: f64) -> LoadInput {
    LoadInput {
        name: name.into(),
        ac: false,
        stabilized: false,
        min_volts: 18.0,
        incap_c: 0.0,
        incap_r: 1.0,
        incap_leak_a: 0.0,
        std_load: Some(amps),
        loadcb_amps: None,
        loadcb_location: None,
        location: None,
        line: 0,
    }
}

fn cb(name: &str, amps: f64) -> CbInput {
    CbInput {
        name: name.into(),
        max_amps: amps,
        rate_secs: 4.0,
        triphase: false,
        fuse: false,
        location: None,
        line: 0,
    }
}

fn bus(name: &str, ac: bool, endpoints: Vec<EndptInput>) -> BusInput {
    BusInput {
        name: name.into(),
        ac,
        endpoints,
        line: 0,
    }
}

/// S1/S2 network: battery feeding one load through a breaker.
fn breaker_network() -> Network {
    let mut b = NetworkBuilder::new();
    b.add_batt(batt("BATT_1"));
    b.add_cb(cb("CB_1", 20.0));
    b.add_load(dc_load("LOAD_1", 10.0));
    b.add_bus(bus(
        "MAIN_BUS",
        false,
        vec![EndptInput::plain("BATT_1"), EndptInput::plain("CB_1")],
    ));
    b.add_bus(bus(
        "LOAD_BUS",
        false,
        vec![EndptInput::plain("CB_1"), EndptInput::plain("LOAD_1")],
    ));
    b.build().unwrap()
}

#[test]
fn s1_battery_feeds_load_through_closed_breaker() {
    let sim = Simulation::new(breaker_network());
    sim.step(2).unwrap();

    let load = sim.network().find("LOAD_1").unwrap();
    let breaker = sim.network().find("CB_1").unwrap();
    let battery = sim.network().find("BATT_1").unwrap();

    assert!((sim.out_volts(load).value() - 24.0).abs() < 0.25);
    assert!((sim.in_amps(load).value() - 10.0).abs() < 1e-9);
    assert!((sim.out_amps(load).value() - 10.0).abs() < 1e-9);
    assert!((sim.in_amps(breaker).value() - 10.0).abs() < 1e-9);

    // Battery discharges at about 240 W
    let DynView::Batt { charge: c0, .. } = sim.comp_view(battery).dynamic else {
        panic!("battery view expected");
    };
    let ticks = 20;
    sim.step(ticks).unwrap();
    let DynView::Batt { charge: c1, .. } = sim.comp_view(battery).dynamic else {
        panic!("battery view expected");
    };
    let joules = (c0 - c1) * 1.0e6;
    let watts = joules / (ticks as f64 * 0.05);
    assert!(
        (watts - 240.0).abs() < 240.0 * 0.02,
        "discharge rate {} W",
        watts
    );
}

#[test]
fn s2_open_breaker_de_energizes_load() {
    let sim = Simulation::new(breaker_network());
    sim.set_cb("CB_1", false).unwrap();
    sim.step(2).unwrap();

    let load = sim.network().find("LOAD_1").unwrap();
    let battery = sim.network().find("BATT_1").unwrap();

    assert_eq!(sim.in_volts(load).value(), 0.0);
    assert_eq!(sim.in_amps(load).value(), 0.0);
    assert_eq!(sim.out_amps(battery).value(), 0.0);
    assert!(!sim.powered(load));
}

#[test]
fn s3_generator_tru_chain() {
    let mut b = NetworkBuilder::new();
    b.add_gen(gen("GEN_1"));
    b.add_tru(TruInput {
        name: "TRU_1".into(),
        mode: TruMode::Tru,
        in_volts: 115.0,
        out_volts: 28.0,
        out_freq_hz: 0.0,
        int_r_ohms: 0.05,
        eff_points: vec![(0.0, 0.9), (10_000.0, 0.9)],
        charger: false,
        curr_lim_a: 0.0,
        batt: None,
        location: None,
        line: 0,
    });
    b.add_load(LoadInput {
        name: "AVIONICS".into(),
        ac: false,
        stabilized: true,
        min_volts: 20.0,
        incap_c: 0.0,
        incap_r: 1.0,
        incap_leak_a: 0.0,
        std_load: Some(56.0),
        loadcb_amps: None,
        loadcb_location: None,
        location: None,
        line: 0,
    });
    b.add_bus(bus(
        "AC_BUS",
        true,
        vec![
            EndptInput::plain("GEN_1"),
            EndptInput::tagged("TRU_1", PortTag::Ac),
        ],
    ));
    b.add_bus(bus(
        "DC_BUS",
        false,
        vec![
            EndptInput::tagged("TRU_1", PortTag::Dc),
            EndptInput::plain("AVIONICS"),
        ],
    ));
    let sim = Simulation::new(b.build().unwrap());
    sim.set_gen_rpm_cb("GEN_1", || 3000.0).unwrap();
    sim.step(2).unwrap();

    let load = sim.network().find("AVIONICS").unwrap();
    let tru = sim.network().find("TRU_1").unwrap();
    let generator = sim.network().find("GEN_1").unwrap();

    assert!((sim.out_volts(generator).value() - 115.0).abs() < 1e-6);
    assert!((sim.out_freq(generator).value() - 400.0).abs() < 1e-6);
    assert!((sim.out_pwr(load).value() - 56.0).abs() < 1e-6);
    assert!((sim.out_amps(tru).value() - 2.0).abs() < 1e-6);
    let expect_in = 56.0 / (115.0 * 0.9);
    assert!((sim.in_amps(tru).value() - expect_in).abs() < 1e-6);
    assert!((sim.out_amps(generator).value() - expect_in).abs() < 1e-6);

    // Energy conservation at the converter: the loss is the efficiency loss
    let loss = sim.in_pwr(tru).value() - sim.out_pwr(tru).value();
    let expect_loss = 56.0 / 0.9 - 56.0;
    assert!((loss - expect_loss).abs() < 1e-6);
}

/// S4 network: three tied buses, source on A, loads on B and C.
fn tie_network() -> Network {
    let mut b = NetworkBuilder::new();
    b.add_batt(batt("BATT_1"));
    b.add_simple(SimpleInput {
        name: "XTIE".into(),
        kind: SimpleKind::Tie,
        location: None,
        line: 0,
    });
    b.add_load(dc_load("LOAD_B", 2.0));
    b.add_load(dc_load("LOAD_C", 2.0));
    b.add_bus(bus(
        "BUS_A",
        false,
        vec![EndptInput::plain("BATT_1"), EndptInput::plain("XTIE")],
    ));
    b.add_bus(bus(
        "BUS_B",
        false,
        vec![EndptInput::plain("XTIE"), EndptInput::plain("LOAD_B")],
    ));
    b.add_bus(bus(
        "BUS_C",
        false,
        vec![EndptInput::plain("XTIE"), EndptInput::plain("LOAD_C")],
    ));
    b.build().unwrap()
}

#[test]
fn s4_tie_gates_propagation_per_endpoint() {
    let sim = Simulation::new(tie_network());
    let bus_b = sim.network().find("BUS_B").unwrap();
    let bus_c = sim.network().find("BUS_C").unwrap();

    // Untied: nothing crosses
    sim.step(1).unwrap();
    assert_eq!(sim.in_volts(bus_b).value(), 0.0);
    assert_eq!(sim.in_volts(bus_c).value(), 0.0);

    // {A, B}: B energizes, C stays dark
    sim.set_tie("XTIE", &["BUS_A", "BUS_B"]).unwrap();
    sim.step(1).unwrap();
    assert!(sim.in_volts(bus_b).value() > 23.0);
    assert_eq!(sim.in_volts(bus_c).value(), 0.0);

    // all: C too
    sim.set_tie_all("XTIE").unwrap();
    sim.step(1).unwrap();
    assert!(sim.in_volts(bus_c).value() > 23.0);

    // none again
    sim.set_tie_none("XTIE").unwrap();
    sim.step(1).unwrap();
    assert_eq!(sim.in_volts(bus_b).value(), 0.0);
}

/// S5 network: two identical batteries behind diodes onto one bus.
fn dual_battery_network() -> Network {
    let mut b = NetworkBuilder::new();
    for n in 1..=2 {
        b.add_batt(batt(&format!("BATT_{}", n)));
        b.add_cb(cb(&format!("CB_{}", n), 50.0));
        b.add_simple(SimpleInput {
            name: format!("DIODE_{}", n),
            kind: SimpleKind::Diode,
            location: None,
            line: 0,
        });
        b.add_bus(bus(
            &format!("BATT_BUS_{}", n),
            false,
            vec![
                EndptInput::plain(format!("BATT_{}", n)),
                EndptInput::plain(format!("CB_{}", n)),
            ],
        ));
        b.add_bus(bus(
            &format!("DIODE_BUS_{}", n),
            false,
            vec![
                EndptInput::plain(format!("CB_{}", n)),
                EndptInput::tagged(format!("DIODE_{}", n), PortTag::In),
            ],
        ));
    }
    b.add_load(dc_load("LOAD_1", 10.0));
    b.add_bus(bus(
        "MAIN_BUS",
        false,
        vec![
            EndptInput::tagged("DIODE_1", PortTag::Out),
            EndptInput::tagged("DIODE_2", PortTag::Out),
            EndptInput::plain("LOAD_1"),
        ],
    ));
    b.build().unwrap()
}

#[test]
fn s5_equal_batteries_share_current_evenly() {
    let sim = Simulation::new(dual_battery_network());
    sim.step(3).unwrap();

    let b1 = sim.network().find("BATT_1").unwrap();
    let b2 = sim.network().find("BATT_2").unwrap();
    let main = sim.network().find("MAIN_BUS").unwrap();

    assert_eq!(sim.sources(main).len(), 2);
    assert!((sim.out_amps(b1).value() - 5.0).abs() < 1e-6);
    assert!((sim.out_amps(b2).value() - 5.0).abs() < 1e-6);

    // Drop battery 1: the survivor carries everything
    sim.set_cb("CB_1", false).unwrap();
    sim.step(2).unwrap();
    assert_eq!(sim.out_amps(b1).value(), 0.0);
    assert!((sim.out_amps(b2).value() - 10.0).abs() < 1e-6);
    assert_eq!(sim.sources(main).len(), 1);
}

/// S6 network: load with an input capacitor behind a breaker.
fn incap_network() -> Network {
    let mut b = NetworkBuilder::new();
    let mut battery = batt("BATT_1");
    battery.volts = 28.0;
    b.add_batt(battery);
    b.add_cb(cb("CB_1", 20.0));
    b.add_load(LoadInput {
        name: "RADIO".into(),
        ac: false,
        stabilized: false,
        min_volts: 20.0,
        incap_c: 1.0e-3,
        incap_r: 50.0,
        incap_leak_a: 0.02,
        std_load: Some(0.5),
        loadcb_amps: None,
        loadcb_location: None,
        location: None,
        line: 0,
    });
    b.add_bus(bus(
        "MAIN_BUS",
        false,
        vec![EndptInput::plain("BATT_1"), EndptInput::plain("CB_1")],
    ));
    b.add_bus(bus(
        "LOAD_BUS",
        false,
        vec![EndptInput::plain("CB_1"), EndptInput::plain("RADIO")],
    ));
    b.build().unwrap()
}

#[test]
fn s6_incap_rides_through_supply_loss() {
    let sim = Simulation::new(incap_network());
    let radio = sim.network().find("RADIO").unwrap();

    // Let the capacitor charge to the supply voltage
    sim.step(10).unwrap();
    assert!((sim.incap_volts(radio).value() - 28.0).abs() < 0.25);
    assert!(sim.powered(radio));

    // Cut the supply: no more network draw, but the capacitor keeps the
    // output alive while it leaks down toward min_volts
    sim.set_cb("CB_1", false).unwrap();
    sim.step(1).unwrap();
    assert_eq!(sim.in_amps(radio).value(), 0.0);
    assert!(sim.powered(radio), "capacitor must ride through the loss");

    // Leak rate: 0.02 A on 1 mF is 1 V per 50 ms tick; 28 V reaches 20 V
    // within 8 ticks of the cut
    let mut powered_ticks = 1;
    while sim.powered(radio) {
        sim.step(1).unwrap();
        powered_ticks += 1;
        assert!(powered_ticks < 20, "capacitor never decayed below min_volts");
    }
    assert!(
        (6..=10).contains(&powered_ticks),
        "ride-through lasted {} ticks",
        powered_ticks
    );
    assert_eq!(sim.in_amps(radio).value(), 0.0);
    assert_eq!(sim.out_amps(radio).value(), 0.0);
}

#[test]
fn ac_double_source_flags_short() {
    let mut b = NetworkBuilder::new();
    b.add_gen(gen("GEN_1"));
    b.add_gen(gen("GEN_2"));
    b.add_load(LoadInput {
        name: "GALLEY".into(),
        ac: true,
        stabilized: true,
        min_volts: 90.0,
        incap_c: 0.0,
        incap_r: 1.0,
        incap_leak_a: 0.0,
        std_load: Some(200.0),
        loadcb_amps: None,
        loadcb_location: None,
        location: None,
        line: 0,
    });
    b.add_bus(bus(
        "AC_BUS",
        true,
        vec![
            EndptInput::plain("GEN_1"),
            EndptInput::plain("GEN_2"),
            EndptInput::plain("GALLEY"),
        ],
    ));
    let sim = Simulation::new(b.build().unwrap());
    sim.set_gen_rpm_cb("GEN_1", || 3000.0).unwrap();
    sim.set_gen_rpm_cb("GEN_2", || 3000.0).unwrap();
    sim.step(1).unwrap();

    let ac_bus = sim.network().find("AC_BUS").unwrap();
    let view = sim.comp_view(ac_bus);
    assert!(view.state.shorted, "AC paralleling must flag the bus shorted");
    assert_eq!(view.srcs.len(), 1, "only one attribution may survive");
}

#[test]
fn inverter_feeds_ac_load_from_battery() {
    let mut b = NetworkBuilder::new();
    let mut battery = batt("BATT_1");
    battery.volts = 28.0;
    b.add_batt(battery);
    b.add_tru(TruInput {
        name: "INV_1".into(),
        mode: TruMode::Inv,
        in_volts: 28.0,
        out_volts: 115.0,
        out_freq_hz: 400.0,
        int_r_ohms: 0.05,
        eff_points: vec![(0.0, 0.85), (2_000.0, 0.88)],
        charger: false,
        curr_lim_a: 0.0,
        batt: None,
        location: None,
        line: 0,
    });
    b.add_load(LoadInput {
        name: "AC_INSTR".into(),
        ac: true,
        stabilized: true,
        min_volts: 90.0,
        incap_c: 0.0,
        incap_r: 1.0,
        incap_leak_a: 0.0,
        std_load: Some(115.0),
        loadcb_amps: None,
        loadcb_location: None,
        location: None,
        line: 0,
    });
    b.add_bus(bus(
        "DC_BUS",
        false,
        vec![
            EndptInput::plain("BATT_1"),
            EndptInput::tagged("INV_1", PortTag::In),
        ],
    ));
    b.add_bus(bus(
        "AC_BUS",
        true,
        vec![
            EndptInput::tagged("INV_1", PortTag::Out),
            EndptInput::plain("AC_INSTR"),
        ],
    ));
    let sim = Simulation::new(b.build().unwrap());
    sim.step(2).unwrap();

    let load = sim.network().find("AC_INSTR").unwrap();
    let inv = sim.network().find("INV_1").unwrap();
    assert!(sim.powered(load));
    assert!((sim.in_freq(load).value() - 400.0).abs() < 1e-9);
    assert!(sim.in_volts(load).value() > 110.0);
    // Input power exceeds output by the efficiency loss
    assert!(sim.in_pwr(inv).value() > sim.out_pwr(inv).value());
}

#[test]
fn charger_restores_battery_charge() {
    let mut b = NetworkBuilder::new();
    b.add_gen(gen("GEN_1"));
    let mut battery = batt("BATT_1");
    battery.volts = 24.0;
    b.add_batt(battery);
    b.add_tru(TruInput {
        name: "CHGR_1".into(),
        mode: TruMode::Tru,
        in_volts: 115.0,
        out_volts: 28.0,
        out_freq_hz: 0.0,
        int_r_ohms: 0.05,
        eff_points: vec![(0.0, 0.9), (2_000.0, 0.9)],
        charger: true,
        curr_lim_a: 15.0,
        batt: Some("BATT_1".into()),
        location: None,
        line: 0,
    });
    b.add_bus(bus(
        "AC_BUS",
        true,
        vec![
            EndptInput::plain("GEN_1"),
            EndptInput::tagged("CHGR_1", PortTag::Ac),
        ],
    ));
    b.add_bus(bus(
        "CHG_BUS",
        false,
        vec![
            EndptInput::tagged("CHGR_1", PortTag::Dc),
            EndptInput::plain("BATT_1"),
        ],
    ));
    let sim = Simulation::new(b.build().unwrap());
    sim.set_gen_rpm_cb("GEN_1", || 3000.0).unwrap();
    sim.set_batt_charge("BATT_1", 0.5).unwrap();
    sim.step(5).unwrap();

    let battery = sim.network().find("BATT_1").unwrap();
    let DynView::Batt {
        charge, rechg_w, ..
    } = sim.comp_view(battery).dynamic
    else {
        panic!("battery view expected");
    };
    assert!(charge > 0.5, "charger must raise the charge fraction");
    assert!(rechg_w > 0.0);
    // The charger current respects its limit
    let charger = sim.network().find("CHGR_1").unwrap();
    assert!(sim.out_amps(charger).value() <= 15.0 + 1e-9);
    // Battery charge current flows through the charge resistance
    assert!(sim.in_amps(battery).value() > 0.0);
}

#[test]
fn cb_trips_under_sustained_overcurrent_and_recloses_after_cooldown() {
    let mut net_builder = NetworkBuilder::new();
    net_builder.add_batt(batt("BATT_1"));
    net_builder.add_cb(CbInput {
        name: "CB_1".into(),
        max_amps: 5.0,
        rate_secs: 0.5,
        triphase: false,
        fuse: false,
        location: None,
        line: 0,
    });
    net_builder.add_load(dc_load("HEATER", 20.0));
    net_builder.add_bus(bus(
        "MAIN_BUS",
        false,
        vec![EndptInput::plain("BATT_1"), EndptInput::plain("CB_1")],
    ));
    net_builder.add_bus(bus(
        "LOAD_BUS",
        false,
        vec![EndptInput::plain("CB_1"), EndptInput::plain("HEATER")],
    ));
    let sim = Simulation::new(net_builder.build().unwrap());

    // 4x overcurrent heats 16x faster than rated; the trip comes quickly
    let breaker = sim.network().find("CB_1").unwrap();
    let mut tripped_at = None;
    for tick in 0..40 {
        sim.step(1).unwrap();
        if let DynView::Cb { tripped: true, .. } = sim.comp_view(breaker).dynamic {
            tripped_at = Some(tick);
            break;
        }
    }
    let tripped_at = tripped_at.expect("breaker must auto-trip");
    assert!(tripped_at < 20, "tripped only after {} ticks", tripped_at);

    // The trip clears cur_set, and closing during cooldown is refused
    let load = sim.network().find("HEATER").unwrap();
    sim.step(1).unwrap();
    assert!(!sim.powered(load));
    let err = sim.set_cb("CB_1", true).unwrap_err();
    assert!(err.to_string().contains("latched"));

    // After cooling below hysteresis the breaker closes again
    let mut closed = false;
    for _ in 0..2000 {
        sim.step(1).unwrap();
        if sim.set_cb("CB_1", true).is_ok() {
            closed = true;
            break;
        }
    }
    assert!(closed, "breaker never cooled enough to close");
    sim.step(2).unwrap();
    assert!(sim.powered(load));
}

#[test]
fn shorted_load_draws_fault_current() {
    let sim = Simulation::new(breaker_network());
    sim.step(1).unwrap();

    let load = sim.network().find("LOAD_1").unwrap();
    let baseline = sim.in_amps(load).value();
    sim.set_shorted("LOAD_1", true).unwrap();
    sim.step(1).unwrap();

    let view = sim.comp_view(load);
    assert!(view.state.shorted);
    assert!(view.state.short_amps > 0.0);
    assert!((0.9..1.0).contains(&view.state.leak_factor));
    assert!(sim.in_amps(load).value() > baseline * 5.0);

    sim.set_shorted("LOAD_1", false).unwrap();
    sim.step(1).unwrap();
    assert_eq!(sim.comp_view(load).state.short_amps, 0.0);
}

#[test]
fn identical_mutation_sequences_stay_identical() {
    let run = || {
        let sim = Simulation::new(dual_battery_network());
        sim.step(3).unwrap();
        sim.set_cb("CB_2", false).unwrap();
        sim.step(3).unwrap();
        sim.set_batt_charge("BATT_1", 0.8).unwrap();
        sim.set_shorted("LOAD_1", true).unwrap();
        sim.step(4).unwrap();
        sim.save_state()
    };
    assert_eq!(run(), run());
}

#[test]
fn energy_conservation_at_passthrough_nodes() {
    let sim = Simulation::new(breaker_network());
    sim.step(3).unwrap();

    for comp in sim.network().comps() {
        if comp.is_origin_source() {
            continue;
        }
        let view = sim.comp_view(comp.id);
        let eps = 1e-9;
        assert!(
            view.state.in_pwr + eps >= view.state.out_pwr,
            "'{}' creates energy: in {} W, out {} W",
            comp.name,
            view.state.in_pwr,
            view.state.out_pwr
        );
        // Breakers, buses and the like are lossless
        if matches!(
            comp.kind,
            DeviceKind::Bus(_) | DeviceKind::Cb(_) | DeviceKind::Shunt
        ) {
            assert!((view.state.in_pwr - view.state.out_pwr).abs() < eps);
        }
    }
}

#[test]
fn failed_component_opens_the_circuit() {
    let sim = Simulation::new(breaker_network());
    sim.step(1).unwrap();
    let load = sim.network().find("LOAD_1").unwrap();
    assert!(sim.powered(load));

    sim.set_failed("CB_1", true).unwrap();
    sim.step(1).unwrap();
    assert!(!sim.powered(load));
    assert_eq!(sim.in_volts(load).value(), 0.0);

    sim.set_failed("CB_1", false).unwrap();
    sim.step(1).unwrap();
    assert!(sim.powered(load));
}

#[test]
fn pause_freezes_state() {
    let sim = Simulation::new(breaker_network());
    sim.set_batt_temp("BATT_1", Celsius(15.0)).unwrap();
    sim.step(5).unwrap();
    // step() drives ticks directly; pause applies to the worker loop, so
    // here we only check the flag survives the round trip
    sim.set_paused(true);
    sim.set_paused(false);
    sim.step(1).unwrap();
    let load = sim.network().find("LOAD_1").unwrap();
    assert!(sim.powered(load));
}
