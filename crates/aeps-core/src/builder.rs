//! Descriptor inputs and validated network construction.
//!
//! The parser (or a test) collects typed `*Input` descriptors and the
//! [`NetworkBuilder`] turns them into a [`Network`], resolving endpoint
//! names to handles, installing reciprocal back-pointers, expanding the
//! "load with protective breaker" shortcut, and rejecting the first
//! violating descriptor with a specification error.

use std::collections::HashMap;

use crate::curve::Curve;
use crate::error::{ElecError, ElecResult};
use crate::units::{Amperes, Hertz, Joules, Ohms, Volts, Watts};
use crate::{
    BattConfig, BusConfig, CbConfig, CompId, Component, DeviceKind, GenConfig, LoadConfig,
    Network, TruConfig, TruMode, MAX_BUS_LINKS,
};

/// Which port of a device a bus endpoint attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortTag {
    /// Converter/diode input side
    In,
    /// Converter/diode output side
    Out,
    /// TRU AC side
    Ac,
    /// TRU DC side
    Dc,
}

/// One endpoint of a `BUS` stanza.
#[derive(Debug, Clone)]
pub struct EndptInput {
    pub device: String,
    pub port: Option<PortTag>,
    pub line: usize,
}

impl EndptInput {
    /// Endpoint without a port tag.
    pub fn plain(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            port: None,
            line: 0,
        }
    }

    /// Endpoint with an explicit port tag.
    pub fn tagged(device: impl Into<String>, port: PortTag) -> Self {
        Self {
            device: device.into(),
            port: Some(port),
            line: 0,
        }
    }
}

/// Battery descriptor.
#[derive(Debug, Clone)]
pub struct BattInput {
    pub name: String,
    pub volts: f64,
    pub capacity_j: f64,
    pub max_pwr_w: f64,
    pub chg_r_ohms: f64,
    pub int_r_ohms: f64,
    pub location: Option<String>,
    pub line: usize,
}

/// Generator descriptor.
#[derive(Debug, Clone)]
pub struct GenInput {
    pub name: String,
    pub volts: f64,
    /// Zero for DC generators
    pub freq_hz: f64,
    pub exc_rpm: f64,
    pub min_rpm: f64,
    pub max_rpm: f64,
    pub stab_rate_u: f64,
    pub stab_rate_f: f64,
    pub int_r_ohms: f64,
    /// Efficiency breakpoints (output watts, efficiency)
    pub eff_points: Vec<(f64, f64)>,
    pub location: Option<String>,
    pub line: usize,
}

/// Converter descriptor (TRU or inverter).
#[derive(Debug, Clone)]
pub struct TruInput {
    pub name: String,
    pub mode: TruMode,
    pub in_volts: f64,
    pub out_volts: f64,
    /// Inverter output frequency; ignored for TRUs
    pub out_freq_hz: f64,
    pub int_r_ohms: f64,
    pub eff_points: Vec<(f64, f64)>,
    pub charger: bool,
    pub curr_lim_a: f64,
    /// Battery fed by a charger, by name
    pub batt: Option<String>,
    pub location: Option<String>,
    pub line: usize,
}

/// Load descriptor.
#[derive(Debug, Clone)]
pub struct LoadInput {
    pub name: String,
    pub ac: bool,
    pub stabilized: bool,
    pub min_volts: f64,
    pub incap_c: f64,
    pub incap_r: f64,
    pub incap_leak_a: f64,
    pub std_load: Option<f64>,
    /// Protective-breaker shortcut: synthesize a CB of this rating plus a
    /// virtual bus between breaker and load
    pub loadcb_amps: Option<f64>,
    pub loadcb_location: Option<String>,
    pub location: Option<String>,
    pub line: usize,
}

/// Circuit breaker descriptor.
#[derive(Debug, Clone)]
pub struct CbInput {
    pub name: String,
    pub max_amps: f64,
    pub rate_secs: f64,
    pub triphase: bool,
    pub fuse: bool,
    pub location: Option<String>,
    pub line: usize,
}

/// Kinds without parameters of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleKind {
    Shunt,
    Tie,
    Diode,
}

/// Shunt / tie / diode descriptor.
#[derive(Debug, Clone)]
pub struct SimpleInput {
    pub name: String,
    pub kind: SimpleKind,
    pub location: Option<String>,
    pub line: usize,
}

/// Bus descriptor with its ordered endpoint list.
#[derive(Debug, Clone)]
pub struct BusInput {
    pub name: String,
    pub ac: bool,
    pub endpoints: Vec<EndptInput>,
    pub line: usize,
}

fn spec_err(line: usize, msg: String) -> ElecError {
    if line > 0 {
        ElecError::Spec(format!("line {}: {}", line, msg))
    } else {
        ElecError::Spec(msg)
    }
}

/// Collects descriptors and constructs a validated [`Network`].
#[derive(Default)]
pub struct NetworkBuilder {
    comps: Vec<Component>,
    lines: Vec<usize>,
    by_name: HashMap<String, CompId>,
    buses: Vec<BusInput>,
    /// Charger battery links to resolve after all components exist
    charger_batts: Vec<(CompId, String, usize)>,
    /// (load, cb, virtual bus) triples from LOADCB expansion
    autogen: Vec<(CompId, CompId, CompId)>,
    /// First descriptor error seen by the chainable add_* surface;
    /// reported by build()
    first_error: Option<ElecError>,
    spec_digest: Option<String>,
    seed: u64,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the digest of the declarative text the inputs came from.
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.spec_digest = Some(digest.into());
        self
    }

    /// Set the per-network noise seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn record_err(&mut self, err: ElecError) {
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }

    fn push(
        &mut self,
        name: String,
        location: Option<String>,
        autogen: bool,
        ac: bool,
        kind: DeviceKind,
        line: usize,
    ) -> ElecResult<CompId> {
        if self.by_name.contains_key(&name) {
            return Err(spec_err(line, format!("duplicate component name '{}'", name)));
        }
        let id = CompId::new(self.comps.len());
        self.by_name.insert(name.clone(), id);
        self.comps.push(Component {
            id,
            name,
            location,
            autogen,
            ac,
            kind,
            ports: Vec::new(),
        });
        self.lines.push(line);
        Ok(id)
    }

    pub fn add_batt(&mut self, input: BattInput) -> &mut Self {
        let kind = DeviceKind::Batt(BattConfig {
            volts: Volts(input.volts),
            capacity: Joules(input.capacity_j),
            max_pwr: Watts(input.max_pwr_w),
            chg_r: Ohms(input.chg_r_ohms),
            int_r: Ohms(input.int_r_ohms),
        });
        if let Err(e) = self.push(input.name, input.location, false, false, kind, input.line) {
            self.record_err(e);
        }
        self
    }

    pub fn add_gen(&mut self, input: GenInput) -> &mut Self {
        let ac = input.freq_hz > 0.0;
        let curve = match Curve::efficiency(input.eff_points) {
            Ok(c) => c,
            Err(e) => {
                self.record_err(spec_err(
                    input.line,
                    format!("generator '{}': {}", input.name, e),
                ));
                // Evaluable placeholder so construction can continue far
                // enough to report the recorded error from build()
                Curve::new(vec![(0.0, 0.9), (1.0, 0.9)]).unwrap()
            }
        };
        let kind = DeviceKind::Gen(GenConfig {
            volts: Volts(input.volts),
            freq: Hertz(input.freq_hz),
            exc_rpm: input.exc_rpm,
            min_rpm: input.min_rpm,
            max_rpm: input.max_rpm,
            stab_rate_u: input.stab_rate_u,
            stab_rate_f: input.stab_rate_f,
            int_r: Ohms(input.int_r_ohms),
            eff_curve: curve,
        });
        if let Err(e) = self.push(input.name, input.location, false, ac, kind, input.line) {
            self.record_err(e);
        }
        self
    }

    pub fn add_tru(&mut self, input: TruInput) -> &mut Self {
        let curve = match Curve::efficiency(input.eff_points) {
            Ok(c) => c,
            Err(e) => {
                self.record_err(spec_err(
                    input.line,
                    format!("converter '{}': {}", input.name, e),
                ));
                Curve::new(vec![(0.0, 0.9), (1.0, 0.9)]).unwrap()
            }
        };
        let ac = input.mode == TruMode::Tru;
        let batt = input.batt.clone();
        let kind = DeviceKind::Tru(TruConfig {
            mode: input.mode,
            in_volts: Volts(input.in_volts),
            out_volts: Volts(input.out_volts),
            out_freq: Hertz(if input.mode == TruMode::Inv {
                input.out_freq_hz
            } else {
                0.0
            }),
            int_r: Ohms(input.int_r_ohms),
            eff_curve: curve,
            charger: input.charger,
            curr_lim: Amperes(input.curr_lim_a),
            batt: None,
        });
        match self.push(input.name, input.location, false, ac, kind, input.line) {
            Ok(id) => {
                if let Some(batt_name) = batt {
                    self.charger_batts.push((id, batt_name, input.line));
                }
            }
            Err(e) => self.record_err(e),
        }
        self
    }

    pub fn add_load(&mut self, input: LoadInput) -> &mut Self {
        let kind = DeviceKind::Load(LoadConfig {
            ac: input.ac,
            stabilized: input.stabilized,
            min_volts: Volts(input.min_volts),
            incap_c: input.incap_c,
            incap_r: Ohms(input.incap_r),
            incap_leak: Amperes(input.incap_leak_a),
            std_load: input.std_load,
        });
        let load = match self.push(
            input.name.clone(),
            input.location,
            false,
            input.ac,
            kind,
            input.line,
        ) {
            Ok(id) => id,
            Err(e) => {
                self.record_err(e);
                return self;
            }
        };

        // LOADCB expansion: a breaker plus a virtual bus between breaker
        // and load; bus endpoints naming the load are rewired onto the
        // breaker at resolution time.
        if let Some(amps) = input.loadcb_amps {
            let cb_kind = DeviceKind::Cb(CbConfig {
                max_amps: Amperes(amps),
                rate: DEFAULT_CB_RATE_SECS,
                triphase: input.ac,
                fuse: false,
            });
            let cb = self.push(
                format!("{}_CB", input.name),
                input.loadcb_location,
                true,
                input.ac,
                cb_kind,
                input.line,
            );
            let vbus = self.push(
                format!("{}_CB_BUS", input.name),
                None,
                true,
                input.ac,
                DeviceKind::Bus(BusConfig { ac: input.ac }),
                input.line,
            );
            match (cb, vbus) {
                (Ok(cb), Ok(vbus)) => self.autogen.push((load, cb, vbus)),
                (Err(e), _) | (_, Err(e)) => self.record_err(e),
            }
        }
        self
    }

    pub fn add_cb(&mut self, input: CbInput) -> &mut Self {
        let kind = DeviceKind::Cb(CbConfig {
            max_amps: Amperes(input.max_amps),
            rate: input.rate_secs,
            triphase: input.triphase,
            fuse: input.fuse,
        });
        if let Err(e) = self.push(input.name, input.location, false, false, kind, input.line) {
            self.record_err(e);
        }
        self
    }

    pub fn add_simple(&mut self, input: SimpleInput) -> &mut Self {
        let kind = match input.kind {
            SimpleKind::Shunt => DeviceKind::Shunt,
            SimpleKind::Tie => DeviceKind::Tie,
            SimpleKind::Diode => DeviceKind::Diode,
        };
        if let Err(e) = self.push(input.name, input.location, false, false, kind, input.line) {
            self.record_err(e);
        }
        self
    }

    pub fn add_bus(&mut self, input: BusInput) -> &mut Self {
        let kind = DeviceKind::Bus(BusConfig { ac: input.ac });
        match self.push(
            input.name.clone(),
            None,
            false,
            input.ac,
            kind,
            input.line,
        ) {
            Ok(_) => self.buses.push(input),
            Err(e) => self.record_err(e),
        }
        self
    }

    /// Resolve, wire, and validate everything; the first violating
    /// descriptor aborts construction.
    pub fn build(mut self) -> ElecResult<Network> {
        if let Some(err) = self.first_error.take() {
            return Err(err);
        }
        self.resolve_charger_batts()?;

        // Positional ports of two-sided devices are collected here first,
        // then installed in input/output order.
        let mut tru_sides: HashMap<CompId, (Option<CompId>, Option<CompId>)> = HashMap::new();
        let mut diode_sides: HashMap<CompId, (Option<CompId>, Option<CompId>)> = HashMap::new();

        let buses = std::mem::take(&mut self.buses);
        for bus_input in &buses {
            let bus_id = self.by_name[&bus_input.name];
            for ep in &bus_input.endpoints {
                self.wire_endpoint(bus_id, ep, &mut tru_sides, &mut diode_sides)?;
            }
        }

        self.install_sides(tru_sides, diode_sides)?;
        self.wire_autogen();
        self.validate_components()?;
        self.resolve_passive_ac()?;
        self.validate_types()?;

        Ok(Network::from_parts(self.comps, self.spec_digest, self.seed))
    }

    fn resolve_charger_batts(&mut self) -> ElecResult<()> {
        for (tru_id, batt_name, line) in std::mem::take(&mut self.charger_batts) {
            let batt_id = self.by_name.get(&batt_name).copied().ok_or_else(|| {
                spec_err(
                    line,
                    format!("charger battery '{}' does not resolve", batt_name),
                )
            })?;
            if !matches!(self.comps[batt_id.value()].kind, DeviceKind::Batt(_)) {
                return Err(spec_err(
                    line,
                    format!("charger link '{}' is not a battery", batt_name),
                ));
            }
            if let DeviceKind::Tru(tru) = &mut self.comps[tru_id.value()].kind {
                tru.batt = Some(batt_id);
            }
        }
        Ok(())
    }

    fn wire_endpoint(
        &mut self,
        bus_id: CompId,
        ep: &EndptInput,
        tru_sides: &mut HashMap<CompId, (Option<CompId>, Option<CompId>)>,
        diode_sides: &mut HashMap<CompId, (Option<CompId>, Option<CompId>)>,
    ) -> ElecResult<()> {
        let mut dev_id = self.by_name.get(&ep.device).copied().ok_or_else(|| {
            spec_err(
                ep.line,
                format!("endpoint '{}' does not resolve", ep.device),
            )
        })?;

        if matches!(self.comps[dev_id.value()].kind, DeviceKind::Bus(_)) {
            return Err(spec_err(
                ep.line,
                format!(
                    "bus endpoint '{}' is a bus; buses may only connect devices",
                    ep.device
                ),
            ));
        }

        // A load declared with LOADCB is reached through its breaker.
        if let Some(&(_, cb, _)) = self.autogen.iter().find(|(load, _, _)| *load == dev_id) {
            dev_id = cb;
        }

        let dev_kind_is_tru = matches!(self.comps[dev_id.value()].kind, DeviceKind::Tru(_));
        let dev_kind_is_diode = matches!(self.comps[dev_id.value()].kind, DeviceKind::Diode);

        match (ep.port, dev_kind_is_tru, dev_kind_is_diode) {
            (Some(tag), true, _) => {
                let mode = match &self.comps[dev_id.value()].kind {
                    DeviceKind::Tru(t) => t.mode,
                    _ => unreachable!(),
                };
                let slot = tru_sides.entry(dev_id).or_default();
                let is_input = match (mode, tag) {
                    (TruMode::Tru, PortTag::Ac) | (TruMode::Inv, PortTag::In) => true,
                    (TruMode::Tru, PortTag::Dc) | (TruMode::Inv, PortTag::Out) => false,
                    _ => {
                        return Err(spec_err(
                            ep.line,
                            format!("invalid port tag for converter '{}'", ep.device),
                        ))
                    }
                };
                let side = if is_input { &mut slot.0 } else { &mut slot.1 };
                if side.is_some() {
                    return Err(spec_err(
                        ep.line,
                        format!("converter '{}' side connected twice", ep.device),
                    ));
                }
                *side = Some(bus_id);
            }
            (None, true, _) => {
                return Err(spec_err(
                    ep.line,
                    format!("converter endpoint '{}' needs a port tag", ep.device),
                ));
            }
            (Some(tag), _, true) => {
                let slot = diode_sides.entry(dev_id).or_default();
                let side = match tag {
                    PortTag::In => &mut slot.0,
                    PortTag::Out => &mut slot.1,
                    _ => {
                        return Err(spec_err(
                            ep.line,
                            format!("diode '{}' takes IN or OUT tags", ep.device),
                        ))
                    }
                };
                if side.is_some() {
                    return Err(spec_err(
                        ep.line,
                        format!("diode '{}' side connected twice", ep.device),
                    ));
                }
                *side = Some(bus_id);
            }
            (None, _, true) => {
                return Err(spec_err(
                    ep.line,
                    format!("diode endpoint '{}' needs an IN or OUT tag", ep.device),
                ));
            }
            (Some(_), false, false) => {
                return Err(spec_err(
                    ep.line,
                    format!("endpoint '{}' does not take a port tag", ep.device),
                ));
            }
            (None, false, false) => {
                if self.comps[dev_id.value()].ports.len() >= MAX_BUS_LINKS {
                    return Err(spec_err(
                        ep.line,
                        format!(
                            "device '{}' is connected to more than {} buses",
                            ep.device, MAX_BUS_LINKS
                        ),
                    ));
                }
                self.comps[dev_id.value()].ports.push(bus_id);
            }
        }

        // The bus records the device it actually reaches (possibly the
        // rewired breaker), in declaration order.
        self.comps[bus_id.value()].ports.push(dev_id);
        Ok(())
    }

    fn install_sides(
        &mut self,
        tru_sides: HashMap<CompId, (Option<CompId>, Option<CompId>)>,
        diode_sides: HashMap<CompId, (Option<CompId>, Option<CompId>)>,
    ) -> ElecResult<()> {
        // Deterministic error attribution: report the first violator in
        // declaration order.
        let mut sides: Vec<_> = tru_sides.into_iter().chain(diode_sides).collect();
        sides.sort_by_key(|(id, _)| *id);
        for (id, (input, output)) in sides {
            let comp = &self.comps[id.value()];
            let line = self.lines[id.value()];
            let (Some(input), Some(output)) = (input, output) else {
                return Err(spec_err(
                    line,
                    format!("'{}' must have both sides connected", comp.name),
                ));
            };
            self.comps[id.value()].ports = vec![input, output];
        }
        Ok(())
    }

    fn wire_autogen(&mut self) {
        for &(load, cb, vbus) in &self.autogen {
            self.comps[cb.value()].ports.push(vbus);
            self.comps[vbus.value()].ports = vec![cb, load];
            self.comps[load.value()].ports = vec![vbus];
        }
    }

    fn validate_components(&self) -> ElecResult<()> {
        for (comp, &line) in self.comps.iter().zip(&self.lines) {
            let name = &comp.name;
            match &comp.kind {
                DeviceKind::Batt(b) => {
                    if b.volts.value() <= 0.0 {
                        return Err(spec_err(line, format!("battery '{}' needs VOLTS > 0", name)));
                    }
                    if b.capacity.value() < 0.0 {
                        return Err(spec_err(line, format!("battery '{}' CAPACITY < 0", name)));
                    }
                    if b.max_pwr.value() <= 0.0 {
                        return Err(spec_err(line, format!("battery '{}' needs MAX_PWR > 0", name)));
                    }
                    if b.chg_r.value() <= 0.0 || b.int_r.value() <= 0.0 {
                        return Err(spec_err(
                            line,
                            format!("battery '{}' resistances must be > 0", name),
                        ));
                    }
                    self.expect_ports(comp, line, 1, "battery connects to exactly one bus")?;
                }
                DeviceKind::Gen(g) => {
                    if g.volts.value() <= 0.0 {
                        return Err(spec_err(line, format!("generator '{}' needs VOLTS > 0", name)));
                    }
                    if !(g.exc_rpm >= 0.0 && g.exc_rpm <= g.min_rpm && g.min_rpm < g.max_rpm) {
                        return Err(spec_err(
                            line,
                            format!(
                                "generator '{}' needs 0 <= EXC_RPM <= MIN_RPM < MAX_RPM",
                                name
                            ),
                        ));
                    }
                    if g.stab_rate_u < 0.0 || g.stab_rate_f < 0.0 {
                        return Err(spec_err(
                            line,
                            format!("generator '{}' STAB_RATE must be >= 0", name),
                        ));
                    }
                    if g.int_r.value() <= 0.0 {
                        return Err(spec_err(line, format!("generator '{}' needs INT_R > 0", name)));
                    }
                    self.expect_ports(comp, line, 1, "generator connects to exactly one bus")?;
                }
                DeviceKind::Tru(t) => {
                    if t.in_volts.value() <= 0.0 || t.out_volts.value() <= 0.0 {
                        return Err(spec_err(
                            line,
                            format!("converter '{}' needs IN_VOLTS and OUT_VOLTS > 0", name),
                        ));
                    }
                    if t.charger {
                        if t.curr_lim.value() <= 0.0 {
                            return Err(spec_err(
                                line,
                                format!("charger '{}' needs CURR_LIM > 0", name),
                            ));
                        }
                        if t.batt.is_none() {
                            return Err(spec_err(
                                line,
                                format!("charger '{}' needs a battery link", name),
                            ));
                        }
                    }
                    self.expect_ports(comp, line, 2, "converter must have both sides connected")?;
                }
                DeviceKind::Load(l) => {
                    if l.min_volts.value() <= 0.0 {
                        return Err(spec_err(line, format!("load '{}' needs MIN_VOLTS > 0", name)));
                    }
                    if l.incap_c > 0.0 && l.incap_r.value() <= 0.0 {
                        return Err(spec_err(
                            line,
                            format!("load '{}' INCAP resistance must be > 0", name),
                        ));
                    }
                    self.expect_ports(comp, line, 1, "load connects to exactly one bus")?;
                }
                DeviceKind::Cb(cb) => {
                    if cb.max_amps.value() <= 0.0 {
                        return Err(spec_err(line, format!("breaker '{}' needs a rating > 0", name)));
                    }
                    if cb.rate <= 0.0 {
                        return Err(spec_err(line, format!("breaker '{}' needs RATE > 0", name)));
                    }
                    self.expect_ports(comp, line, 2, "breaker has exactly 2 sides")?;
                }
                DeviceKind::Shunt => {
                    self.expect_ports(comp, line, 2, "shunt has exactly 2 sides")?;
                }
                DeviceKind::Diode => {
                    self.expect_ports(comp, line, 2, "diode has exactly 2 sides")?;
                }
                DeviceKind::Tie => {
                    if comp.ports.len() < 2 {
                        return Err(spec_err(
                            line,
                            format!("tie '{}' needs at least 2 endpoints", name),
                        ));
                    }
                }
                DeviceKind::Bus(_) => {}
            }
        }
        Ok(())
    }

    fn expect_ports(
        &self,
        comp: &Component,
        line: usize,
        n: usize,
        what: &str,
    ) -> ElecResult<()> {
        if comp.ports.len() != n {
            return Err(spec_err(
                line,
                format!("'{}': {} (found {})", comp.name, what, comp.ports.len()),
            ));
        }
        Ok(())
    }

    /// Passive gear (cb/shunt/tie/diode) inherits its AC flag from the
    /// attached buses, which must agree.
    fn resolve_passive_ac(&mut self) -> ElecResult<()> {
        for idx in 0..self.comps.len() {
            let comp = &self.comps[idx];
            if !matches!(
                comp.kind,
                DeviceKind::Cb(_) | DeviceKind::Shunt | DeviceKind::Tie | DeviceKind::Diode
            ) {
                continue;
            }
            let line = self.lines[idx];
            let mut ac: Option<bool> = None;
            for &port in &comp.ports {
                let bus_ac = self.comps[port.value()].ac;
                match ac {
                    None => ac = Some(bus_ac),
                    Some(prev) if prev != bus_ac => {
                        return Err(spec_err(
                            line,
                            format!("'{}' bridges an AC and a DC bus", comp.name),
                        ));
                    }
                    _ => {}
                }
            }
            if let Some(ac) = ac {
                self.comps[idx].ac = ac;
            }
        }
        Ok(())
    }

    fn validate_types(&self) -> ElecResult<()> {
        for (comp, &line) in self.comps.iter().zip(&self.lines) {
            let name = &comp.name;
            let bus_ac = |id: CompId| self.comps[id.value()].ac;
            match &comp.kind {
                DeviceKind::Batt(_) => {
                    if bus_ac(comp.ports[0]) {
                        return Err(spec_err(
                            line,
                            format!("battery '{}' must connect to a DC bus", name),
                        ));
                    }
                }
                DeviceKind::Gen(g) => {
                    if bus_ac(comp.ports[0]) != g.is_ac() {
                        return Err(spec_err(
                            line,
                            format!("generator '{}' bus type does not match FREQ", name),
                        ));
                    }
                }
                DeviceKind::Load(l) => {
                    if bus_ac(comp.ports[0]) != l.ac {
                        return Err(spec_err(
                            line,
                            format!("load '{}' bus type does not match its AC/DC flag", name),
                        ));
                    }
                }
                DeviceKind::Tru(t) => {
                    let (input, output) = (comp.ports[0], comp.ports[1]);
                    let (want_in_ac, want_out_ac) = match t.mode {
                        TruMode::Tru => (true, false),
                        TruMode::Inv => (false, true),
                    };
                    if bus_ac(input) != want_in_ac || bus_ac(output) != want_out_ac {
                        return Err(spec_err(
                            line,
                            format!("converter '{}' side types do not match its mode", name),
                        ));
                    }
                }
                DeviceKind::Diode => {
                    if comp.ports.iter().any(|&p| bus_ac(p)) {
                        return Err(spec_err(line, format!("diode '{}' is DC only", name)));
                    }
                }
                DeviceKind::Cb(cb) => {
                    if cb.triphase && !comp.ac {
                        return Err(spec_err(
                            line,
                            format!("three-phase breaker '{}' must sit on AC buses", name),
                        ));
                    }
                }
                DeviceKind::Tie => {
                    for &port in &comp.ports {
                        if !matches!(self.comps[port.value()].kind, DeviceKind::Bus(_)) {
                            return Err(spec_err(
                                line,
                                format!("tie '{}' endpoints must be buses", name),
                            ));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Trip time at rated current for auto-generated load breakers.
pub const DEFAULT_CB_RATE_SECS: f64 = 4.0;
