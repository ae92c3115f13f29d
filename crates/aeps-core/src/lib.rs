//! # aeps-core: Aircraft Electrical Network Modeling Core
//!
//! Provides the fundamental data structures for steady-state electrical
//! network simulation: the typed component catalog, the network container,
//! unit-safe quantities, lookup curves, and validation diagnostics.
//!
//! ## Design Philosophy
//!
//! Networks are modeled as a **flat component catalog** where every element
//! (source, converter, distribution gear, consumer) is one [`Component`]:
//! a shared envelope plus a tagged [`DeviceKind`] payload. Connections are
//! non-owning [`CompId`] handles held in per-component ordered port lists,
//! so the electrical graph may contain cycles while ownership stays flat.
//!
//! The solver dispatches on the kind tag rather than through trait objects,
//! which keeps the hot traversal paths monomorphic and cache-friendly.
//!
//! ## Component kinds
//!
//! - **Sources**: [`BattConfig`] (battery), [`GenConfig`] (engine-driven
//!   generator, AC or DC)
//! - **Converters**: [`TruConfig`] (transformer-rectifier unit AC→DC,
//!   inverter DC→AC, optionally a battery charger)
//! - **Distribution**: [`BusConfig`] (zero-impedance node), breakers/fuses
//!   ([`CbConfig`]), shunts, ties, diodes
//! - **Consumers**: [`LoadConfig`] with optional input capacitance
//!
//! ## Modules
//!
//! - [`builder`] - Descriptor inputs and validated network construction
//! - [`curve`] - Piecewise-linear lookup curves (efficiency, battery tables)
//! - [`diagnostics`] - Validation and import issue reporting
//! - [`state`] - Per-tick electrical state and persistent records
//! - [`topology`] - Graph-level diagnostics and DOT export
//! - [`units`] - Compile-time unit safety
//!
//! ## Integration
//!
//! The `aeps-io` crate parses the declarative text format into builder
//! inputs; the `aeps-sim` crate runs the fixed-period solver over the
//! resulting [`Network`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub mod builder;
pub mod curve;
pub mod diagnostics;
pub mod error;
pub mod state;
pub mod topology;
pub mod units;

pub use builder::{
    BattInput, BusInput, CbInput, EndptInput, GenInput, LoadInput, NetworkBuilder, PortTag,
    SimpleInput, SimpleKind, TruInput,
};
pub use curve::{Curve, BATT_SOC_VOLTS, BATT_TEMP_CAPACITY, BATT_TEMP_VOLTS};
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{ElecError, ElecResult};
pub use state::{CompRecord, KindRecord, PowerState, SrcSet, SystemSnapshot, MAX_SRCS};
pub use units::{Amperes, Celsius, Hertz, Joules, Ohms, Volts, Watts};

/// Maximum number of buses a single device may be connected to.
pub const MAX_BUS_LINKS: usize = 8;

/// Depth bound for paint/integrate traversals. Exceeding it means the
/// network is malformed and the solver faults.
pub const MAX_TRAVERSAL_DEPTH: usize = 100;

/// Stable, non-owning handle to a component within its [`Network`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompId(usize);

impl CompId {
    #[inline]
    pub fn new(value: usize) -> Self {
        CompId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

/// Battery parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattConfig {
    /// Nominal terminal voltage at full charge and reference temperature
    pub volts: Volts,
    /// Energy capacity at the reference temperature (15 °C)
    pub capacity: Joules,
    /// Power level at which the terminal voltage is fully depressed
    pub max_pwr: Watts,
    /// Charging resistance seen by a charger
    pub chg_r: Ohms,
    /// Internal resistance, used for multi-source current sharing
    pub int_r: Ohms,
}

/// Direction of a converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruMode {
    /// Transformer-rectifier unit: AC input, DC output
    Tru,
    /// Inverter: DC input, AC output
    Inv,
}

/// Generator parameters.
///
/// The rpm thresholds model a constant-speed-drive generator: no excitation
/// below `exc_rpm`, a linear ramp up to `min_rpm`, governed output between
/// `min_rpm` and `max_rpm`, and linear overspeed above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenConfig {
    /// Nominal output voltage in the governed band
    pub volts: Volts,
    /// Nominal output frequency; zero for a DC generator
    pub freq: Hertz,
    /// Excitation threshold rpm
    pub exc_rpm: f64,
    /// Lower bound of the governed band
    pub min_rpm: f64,
    /// Upper bound of the governed band
    pub max_rpm: f64,
    /// Governor voltage time constant in seconds (0 = instant)
    pub stab_rate_u: f64,
    /// Governor frequency time constant in seconds (0 = instant)
    pub stab_rate_f: f64,
    /// Internal resistance, used for multi-source current sharing
    pub int_r: Ohms,
    /// Efficiency over output power
    pub eff_curve: Curve,
}

impl GenConfig {
    /// Center rpm of the governed band; the governor stabilizes output
    /// against this speed.
    #[inline]
    pub fn ctr_rpm(&self) -> f64 {
        (self.min_rpm + self.max_rpm) / 2.0
    }

    /// True for AC generators (nonzero nominal frequency).
    #[inline]
    pub fn is_ac(&self) -> bool {
        self.freq.value() > 0.0
    }
}

/// Converter (TRU / inverter / battery charger) parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruConfig {
    pub mode: TruMode,
    /// Nominal input voltage
    pub in_volts: Volts,
    /// Nominal output voltage
    pub out_volts: Volts,
    /// Output frequency for inverters; zero otherwise
    pub out_freq: Hertz,
    /// Internal resistance, used for multi-source current sharing
    pub int_r: Ohms,
    /// Efficiency over output power
    pub eff_curve: Curve,
    /// Battery-charger mode: output current is limited and feeds the
    /// linked battery
    pub charger: bool,
    /// Output current limit in charger mode
    pub curr_lim: Amperes,
    /// The battery a charger feeds, resolved at build time
    pub batt: Option<CompId>,
}

/// Consumer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadConfig {
    /// AC or DC consumer
    pub ac: bool,
    /// Stabilized loads demand constant power (W); unstabilized loads
    /// demand constant current (A)
    pub stabilized: bool,
    /// Minimum input voltage below which the load draws nothing
    pub min_volts: Volts,
    /// Input capacitance in farads (0 = none)
    pub incap_c: f64,
    /// Input capacitor charging resistance
    pub incap_r: Ohms,
    /// Input capacitor leakage current
    pub incap_leak: Amperes,
    /// Fixed demand for loads without a callback (W if stabilized, A
    /// otherwise)
    pub std_load: Option<f64>,
}

impl LoadConfig {
    /// True when this load has an input capacitor to model.
    #[inline]
    pub fn has_incap(&self) -> bool {
        self.incap_c > 0.0
    }
}

/// Bus parameters. Buses are ideal: zero impedance, no state of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    pub ac: bool,
}

/// Circuit breaker / fuse parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CbConfig {
    /// Continuous current rating
    pub max_amps: Amperes,
    /// Seconds of sustained rated current needed to trip
    pub rate: f64,
    /// Three-phase breaker: per-phase current is a third of the total
    pub triphase: bool,
    /// Fuses never reset once blown
    pub fuse: bool,
}

/// Tagged per-kind payload of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceKind {
    Batt(BattConfig),
    Gen(GenConfig),
    Tru(TruConfig),
    Load(LoadConfig),
    Bus(BusConfig),
    Cb(CbConfig),
    Shunt,
    Tie,
    Diode,
}

impl DeviceKind {
    /// Short lowercase tag, used in diagnostics and DOT export.
    pub fn tag(&self) -> &'static str {
        match self {
            DeviceKind::Batt(_) => "batt",
            DeviceKind::Gen(_) => "gen",
            DeviceKind::Tru(t) => match t.mode {
                TruMode::Tru => "tru",
                TruMode::Inv => "inv",
            },
            DeviceKind::Load(_) => "load",
            DeviceKind::Bus(_) => "bus",
            DeviceKind::Cb(_) => "cb",
            DeviceKind::Shunt => "shunt",
            DeviceKind::Tie => "tie",
            DeviceKind::Diode => "diode",
        }
    }
}

/// One element of the network: shared envelope plus kind payload.
///
/// `ports` is the ordered connection list; its meaning depends on the kind:
///
/// | kind | ports |
/// |---|---|
/// | bus | the connected devices, in declaration order |
/// | batt / gen / load | exactly one bus |
/// | cb / shunt | two buses (side A, side B) |
/// | diode | two buses (anode side, cathode side) |
/// | tie | the switchable buses, in connection order |
/// | tru / inv | input-side bus, output-side bus |
///
/// Connection order is preserved from the declarative description and
/// defines the deterministic traversal order of the solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: CompId,
    /// Unique name within the network
    pub name: String,
    /// Optional physical location label (e.g. a breaker panel position)
    pub location: Option<String>,
    /// Synthesized by the builder (LOADCB expansion) rather than declared
    pub autogen: bool,
    /// True when the component's input side carries AC
    pub ac: bool,
    pub kind: DeviceKind,
    pub ports: Vec<CompId>,
}

impl Component {
    /// True for components that originate energy (batteries, generators).
    /// Converters re-radiate during paint but are not top-level sources.
    pub fn is_origin_source(&self) -> bool {
        matches!(self.kind, DeviceKind::Batt(_) | DeviceKind::Gen(_))
    }

    /// The single bus of a battery, generator, or load.
    pub fn bus(&self) -> Option<CompId> {
        match self.kind {
            DeviceKind::Batt(_) | DeviceKind::Gen(_) | DeviceKind::Load(_) => {
                self.ports.first().copied()
            }
            _ => None,
        }
    }

    /// Both sides of a two-port element (cb, shunt, diode, converter).
    pub fn sides(&self) -> Option<(CompId, CompId)> {
        match self.kind {
            DeviceKind::Cb(_) | DeviceKind::Shunt | DeviceKind::Diode | DeviceKind::Tru(_) => {
                match self.ports.as_slice() {
                    [a, b] => Some((*a, *b)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Given one side of a two-port element, the other.
    pub fn other_side(&self, side: CompId) -> Option<CompId> {
        let (a, b) = self.sides()?;
        if side == a {
            Some(b)
        } else if side == b {
            Some(a)
        } else {
            None
        }
    }

    /// The internal resistance used for multi-source current sharing, for
    /// components that can act as paint sources.
    pub fn source_int_r(&self) -> Option<Ohms> {
        match &self.kind {
            DeviceKind::Batt(b) => Some(b.int_r),
            DeviceKind::Gen(g) => Some(g.int_r),
            DeviceKind::Tru(t) => Some(t.int_r),
            _ => None,
        }
    }
}

/// The component catalog.
///
/// Immutable after construction: the solver and mutator surface only touch
/// per-component *state*, never the catalog itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Network {
    comps: Vec<Component>,
    name_index: HashMap<String, CompId>,
    /// SHA-256 hex digest of the declarative text this network was built
    /// from, when it came from a file
    spec_digest: Option<String>,
    /// Seed for the per-network noise RNG (short-circuit leak factors)
    seed: u64,
}

impl Network {
    pub(crate) fn from_parts(comps: Vec<Component>, spec_digest: Option<String>, seed: u64) -> Self {
        let name_index = comps
            .iter()
            .map(|c| (c.name.clone(), c.id))
            .collect();
        Self {
            comps,
            name_index,
            spec_digest,
            seed,
        }
    }

    /// Component by handle. Handles are only minted by the builder, so an
    /// out-of-range lookup indicates a cross-network handle mixup.
    #[inline]
    pub fn comp(&self, id: CompId) -> &Component {
        &self.comps[id.value()]
    }

    /// Component by handle, or None for a foreign handle.
    pub fn get(&self, id: CompId) -> Option<&Component> {
        self.comps.get(id.value())
    }

    /// Find a component by name.
    pub fn find(&self, name: &str) -> Option<CompId> {
        self.name_index.get(name).copied()
    }

    /// Walk all components in declaration order.
    pub fn comps(&self) -> impl Iterator<Item = &Component> {
        self.comps.iter()
    }

    /// Number of components (including auto-generated ones).
    pub fn len(&self) -> usize {
        self.comps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comps.is_empty()
    }

    /// Digest of the originating declarative text, if any.
    pub fn spec_digest(&self) -> Option<&str> {
        self.spec_digest.as_deref()
    }

    /// Per-network noise seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Compute basic statistics about the network
    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats::default();
        for comp in &self.comps {
            match &comp.kind {
                DeviceKind::Batt(_) => stats.num_batts += 1,
                DeviceKind::Gen(_) => stats.num_gens += 1,
                DeviceKind::Tru(_) => stats.num_trus += 1,
                DeviceKind::Load(l) => {
                    stats.num_loads += 1;
                    if let Some(demand) = l.std_load {
                        if l.stabilized {
                            stats.total_std_load_w += demand;
                        }
                    }
                }
                DeviceKind::Bus(_) => stats.num_buses += 1,
                DeviceKind::Cb(_) => stats.num_cbs += 1,
                DeviceKind::Shunt => stats.num_shunts += 1,
                DeviceKind::Tie => stats.num_ties += 1,
                DeviceKind::Diode => stats.num_diodes += 1,
            }
        }
        stats
    }

    /// Validate network structure for issues that commonly produce dead or
    /// surprising simulations.
    ///
    /// Hard specification errors are already rejected at build time; this
    /// reports the softer aggregate problems into `diag`.
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        let stats = self.stats();

        if stats.num_buses == 0 {
            diag.add_error("structure", "Network has no buses");
            return;
        }

        if stats.num_batts == 0 && stats.num_gens == 0 {
            diag.add_error("structure", "Network has no sources");
        }

        if stats.num_loads == 0 {
            diag.add_warning("structure", "Network has no loads");
        }

        for comp in &self.comps {
            if comp.ports.is_empty() {
                diag.add_warning_with_entity(
                    "structure",
                    "component is not connected to anything",
                    &comp.name,
                );
            }
        }
    }
}

/// Statistics about a network's composition
#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkStats {
    pub num_batts: usize,
    pub num_gens: usize,
    pub num_trus: usize,
    pub num_loads: usize,
    pub num_buses: usize,
    pub num_cbs: usize,
    pub num_shunts: usize,
    pub num_ties: usize,
    pub num_diodes: usize,
    /// Sum of the fixed stabilized demands (W)
    pub total_std_load_w: f64,
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} buses, {} sources, {} converters, {} loads ({:.0} W std)",
            self.num_buses,
            self.num_batts + self.num_gens,
            self.num_trus,
            self.num_loads,
            self.total_std_load_w
        )
    }
}
