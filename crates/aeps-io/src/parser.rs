//! Declarative network format parser.
//!
//! The format is line-oriented text: a keyword opens a typed stanza
//! (`BATT`, `GEN`, `TRU`, `INV`, `LOAD`, `CB`, `CB3`, `SHUNT`, `TIE`,
//! `DIODE`, `BUS`) and the following parameter lines apply to it until the
//! next stanza begins. `#` starts a comment, blank lines are ignored, and
//! `GUI_*` visualization hints are skipped. Endpoint resolution and all
//! structural validation happen in the core network builder; this module
//! only maps text onto descriptor inputs.
//!
//! ```text
//! # minimal battery-and-load network
//! BATT MAIN_BATT
//!   VOLTS 24
//!   CAPACITY 1000000
//!   MAX_PWR 10000
//!   CHG_R 0.5
//!   INT_R 1.0
//! LOAD FUEL_PUMP DC
//!   MIN_VOLTS 18
//!   STD_LOAD 10
//!   LOADCB 20
//! BUS MAIN_DC_BUS DC
//!   ENDPT MAIN_BATT
//!   ENDPT FUEL_PUMP
//! ```

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use sha2::{Digest, Sha256};

use aeps_core::builder::{
    BattInput, BusInput, CbInput, EndptInput, GenInput, LoadInput, NetworkBuilder, PortTag,
    SimpleInput, SimpleKind, TruInput,
};
use aeps_core::{Network, TruMode};

/// Load a network from a declarative spec file.
pub fn load_network(path: &Path) -> Result<Network> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading network spec: {}", path.display()))?;
    parse_network(&content)
}

/// Parse a network from declarative spec text.
///
/// The SHA-256 digest of the text is recorded on the network so persisted
/// state can be matched against the exact spec it was captured from.
pub fn parse_network(content: &str) -> Result<Network> {
    let digest = {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    };

    let mut builder = NetworkBuilder::new().with_digest(digest);
    let mut stanza: Option<Stanza> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let keyword = tokens.next().expect("non-empty line has a token");

        if keyword.starts_with("GUI") {
            // Visualization hints are not the solver's business
            continue;
        }

        if let Some(next) = begin_stanza(keyword, &mut tokens, line_no)? {
            if let Some(prev) = stanza.take() {
                flush(&mut builder, prev);
            }
            stanza = Some(next);
            continue;
        }

        let Some(cur) = stanza.as_mut() else {
            bail!("line {}: parameter '{}' outside any stanza", line_no, keyword);
        };
        apply_param(cur, keyword, &mut tokens, line, line_no)?;
    }
    if let Some(prev) = stanza.take() {
        flush(&mut builder, prev);
    }

    let network = builder.build()?;
    Ok(network)
}

/// A stanza under construction.
enum Stanza {
    Batt(BattInput),
    Gen(GenInput),
    Tru(TruInput),
    Load(LoadInput),
    Cb(CbInput),
    Simple(SimpleInput),
    Bus(BusInput),
}

fn begin_stanza<'a>(
    keyword: &str,
    tokens: &mut impl Iterator<Item = &'a str>,
    line: usize,
) -> Result<Option<Stanza>> {
    let name = |tokens: &mut dyn Iterator<Item = &'a str>| -> Result<String> {
        tokens
            .next()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("line {}: {} needs a name", line, keyword))
    };

    let stanza = match keyword {
        "BATT" => Stanza::Batt(BattInput {
            name: name(tokens)?,
            volts: 0.0,
            capacity_j: 0.0,
            max_pwr_w: 0.0,
            chg_r_ohms: 0.0,
            int_r_ohms: 0.0,
            location: None,
            line,
        }),
        "GEN" => Stanza::Gen(GenInput {
            name: name(tokens)?,
            volts: 0.0,
            freq_hz: 0.0,
            exc_rpm: 0.0,
            min_rpm: 0.0,
            max_rpm: 0.0,
            stab_rate_u: 0.0,
            stab_rate_f: 0.0,
            int_r_ohms: 0.0,
            eff_points: Vec::new(),
            location: None,
            line,
        }),
        "TRU" | "INV" => Stanza::Tru(TruInput {
            name: name(tokens)?,
            mode: if keyword == "TRU" {
                TruMode::Tru
            } else {
                TruMode::Inv
            },
            in_volts: 0.0,
            out_volts: 0.0,
            out_freq_hz: 0.0,
            int_r_ohms: 0.0,
            eff_points: Vec::new(),
            charger: false,
            curr_lim_a: 0.0,
            batt: None,
            location: None,
            line,
        }),
        "LOAD" => {
            let name = name(tokens)?;
            let ac = parse_ac_dc(tokens.next(), "LOAD", line)?;
            Stanza::Load(LoadInput {
                name,
                ac,
                stabilized: false,
                min_volts: 1.0,
                incap_c: 0.0,
                incap_r: 1.0,
                incap_leak_a: 0.0,
                std_load: None,
                loadcb_amps: None,
                loadcb_location: None,
                location: None,
                line,
            })
        }
        "CB" | "CB3" => {
            let name = name(tokens)?;
            let amps = parse_num(tokens.next(), "CB rating", line)?;
            Stanza::Cb(CbInput {
                name,
                max_amps: amps,
                rate_secs: 4.0,
                triphase: keyword == "CB3",
                fuse: false,
                location: None,
                line,
            })
        }
        "SHUNT" | "TIE" | "DIODE" => Stanza::Simple(SimpleInput {
            name: name(tokens)?,
            kind: match keyword {
                "SHUNT" => SimpleKind::Shunt,
                "TIE" => SimpleKind::Tie,
                _ => SimpleKind::Diode,
            },
            location: None,
            line,
        }),
        "BUS" => {
            let name = name(tokens)?;
            let ac = parse_ac_dc(tokens.next(), "BUS", line)?;
            Stanza::Bus(BusInput {
                name,
                ac,
                endpoints: Vec::new(),
                line,
            })
        }
        _ => return Ok(None),
    };
    Ok(Some(stanza))
}

fn apply_param<'a>(
    stanza: &mut Stanza,
    keyword: &str,
    tokens: &mut impl Iterator<Item = &'a str>,
    line_text: &str,
    line: usize,
) -> Result<()> {
    // LOCATION takes the rest of the line (panel positions contain spaces)
    if keyword == "LOCATION" {
        let rest = line_text["LOCATION".len()..].trim();
        if rest.is_empty() {
            bail!("line {}: LOCATION needs a value", line);
        }
        let location = Some(rest.to_string());
        match stanza {
            Stanza::Batt(b) => b.location = location,
            Stanza::Gen(g) => g.location = location,
            Stanza::Tru(t) => t.location = location,
            Stanza::Load(l) => l.location = location,
            Stanza::Cb(c) => c.location = location,
            Stanza::Simple(s) => s.location = location,
            Stanza::Bus(_) => bail!("line {}: buses have no LOCATION", line),
        }
        return Ok(());
    }

    match stanza {
        Stanza::Batt(b) => match keyword {
            "VOLTS" => b.volts = parse_num(tokens.next(), keyword, line)?,
            "CAPACITY" => b.capacity_j = parse_num(tokens.next(), keyword, line)?,
            "MAX_PWR" => b.max_pwr_w = parse_num(tokens.next(), keyword, line)?,
            "CHG_R" => b.chg_r_ohms = parse_num(tokens.next(), keyword, line)?,
            "INT_R" => b.int_r_ohms = parse_num(tokens.next(), keyword, line)?,
            _ => bail!("line {}: unknown BATT parameter '{}'", line, keyword),
        },
        Stanza::Gen(g) => match keyword {
            "VOLTS" => g.volts = parse_num(tokens.next(), keyword, line)?,
            "FREQ" => g.freq_hz = parse_num(tokens.next(), keyword, line)?,
            "STAB_RATE" => {
                let rate = parse_num(tokens.next(), keyword, line)?;
                g.stab_rate_u = rate;
                g.stab_rate_f = rate;
            }
            "STAB_RATE_U" => g.stab_rate_u = parse_num(tokens.next(), keyword, line)?,
            "STAB_RATE_F" => g.stab_rate_f = parse_num(tokens.next(), keyword, line)?,
            "EXC_RPM" => g.exc_rpm = parse_num(tokens.next(), keyword, line)?,
            "MIN_RPM" => g.min_rpm = parse_num(tokens.next(), keyword, line)?,
            "MAX_RPM" => g.max_rpm = parse_num(tokens.next(), keyword, line)?,
            "INT_R" => g.int_r_ohms = parse_num(tokens.next(), keyword, line)?,
            "CURVEPT" => g.eff_points.push(parse_curvept(tokens, line)?),
            _ => bail!("line {}: unknown GEN parameter '{}'", line, keyword),
        },
        Stanza::Tru(t) => match keyword {
            "IN_VOLTS" => t.in_volts = parse_num(tokens.next(), keyword, line)?,
            "OUT_VOLTS" => t.out_volts = parse_num(tokens.next(), keyword, line)?,
            "OUT_FREQ" => t.out_freq_hz = parse_num(tokens.next(), keyword, line)?,
            "INT_R" => t.int_r_ohms = parse_num(tokens.next(), keyword, line)?,
            "CURVEPT" => t.eff_points.push(parse_curvept(tokens, line)?),
            "CHARGER" => t.charger = true,
            "CURR_LIM" => t.curr_lim_a = parse_num(tokens.next(), keyword, line)?,
            "BATT" => {
                t.batt = Some(
                    tokens
                        .next()
                        .ok_or_else(|| anyhow!("line {}: BATT needs a battery name", line))?
                        .to_string(),
                )
            }
            _ => bail!("line {}: unknown TRU/INV parameter '{}'", line, keyword),
        },
        Stanza::Load(l) => match keyword {
            "STAB" => l.stabilized = true,
            "MIN_VOLTS" => l.min_volts = parse_num(tokens.next(), keyword, line)?,
            "STD_LOAD" => l.std_load = Some(parse_num(tokens.next(), keyword, line)?),
            "INCAP" => {
                l.incap_c = parse_num(tokens.next(), "INCAP capacitance", line)?;
                l.incap_r = parse_num(tokens.next(), "INCAP resistance", line)?;
                // Optional self-discharge rate in amps
                if let Some(tok) = tokens.next() {
                    l.incap_leak_a = tok
                        .parse()
                        .map_err(|_| anyhow!("line {}: bad INCAP leak '{}'", line, tok))?;
                }
            }
            "LOADCB" => {
                l.loadcb_amps = Some(parse_num(tokens.next(), "LOADCB rating", line)?);
                let rest: Vec<&str> = tokens.collect();
                if !rest.is_empty() {
                    l.loadcb_location = Some(rest.join(" "));
                }
            }
            _ => bail!("line {}: unknown LOAD parameter '{}'", line, keyword),
        },
        Stanza::Cb(c) => match keyword {
            "FUSE" => c.fuse = true,
            "RATE" => c.rate_secs = parse_num(tokens.next(), keyword, line)?,
            _ => bail!("line {}: unknown CB parameter '{}'", line, keyword),
        },
        Stanza::Simple(s) => {
            bail!(
                "line {}: '{}' takes no parameter '{}'",
                line,
                s.name,
                keyword
            );
        }
        Stanza::Bus(b) => match keyword {
            "ENDPT" => {
                let device = tokens
                    .next()
                    .ok_or_else(|| anyhow!("line {}: ENDPT needs a device name", line))?
                    .to_string();
                let port = match tokens.next() {
                    None => None,
                    Some("IN") => Some(PortTag::In),
                    Some("OUT") => Some(PortTag::Out),
                    Some("AC") => Some(PortTag::Ac),
                    Some("DC") => Some(PortTag::Dc),
                    Some(other) => bail!("line {}: unknown ENDPT port tag '{}'", line, other),
                };
                b.endpoints.push(EndptInput { device, port, line });
            }
            _ => bail!("line {}: unknown BUS parameter '{}'", line, keyword),
        },
    }
    Ok(())
}

fn flush(builder: &mut NetworkBuilder, stanza: Stanza) {
    match stanza {
        Stanza::Batt(b) => {
            builder.add_batt(b);
        }
        Stanza::Gen(g) => {
            builder.add_gen(g);
        }
        Stanza::Tru(t) => {
            builder.add_tru(t);
        }
        Stanza::Load(l) => {
            builder.add_load(l);
        }
        Stanza::Cb(c) => {
            builder.add_cb(c);
        }
        Stanza::Simple(s) => {
            builder.add_simple(s);
        }
        Stanza::Bus(b) => {
            builder.add_bus(b);
        }
    }
}

fn parse_num(token: Option<&str>, what: &str, line: usize) -> Result<f64> {
    let token = token.ok_or_else(|| anyhow!("line {}: {} needs a value", line, what))?;
    token
        .parse()
        .map_err(|_| anyhow!("line {}: bad {} value '{}'", line, what, token))
}

fn parse_curvept<'a>(tokens: &mut impl Iterator<Item = &'a str>, line: usize) -> Result<(f64, f64)> {
    match tokens.next() {
        Some("EFF") => {}
        Some(other) => bail!("line {}: unknown curve '{}'", line, other),
        None => bail!("line {}: CURVEPT needs a curve name", line),
    }
    let x = parse_num(tokens.next(), "CURVEPT X", line)?;
    let y = parse_num(tokens.next(), "CURVEPT Y", line)?;
    Ok((x, y))
}

fn parse_ac_dc(token: Option<&str>, what: &str, line: usize) -> Result<bool> {
    match token {
        Some("AC") => Ok(true),
        Some("DC") => Ok(false),
        Some(other) => bail!("line {}: {} type must be AC or DC, got '{}'", line, what, other),
        None => bail!("line {}: {} needs AC or DC", line, what),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeps_core::DeviceKind;

    const SAMPLE: &str = r#"
# Single-engine DC system with an AC instrument inverter
BATT MAIN_BATT
  VOLTS 24
  CAPACITY 1000000
  MAX_PWR 10000
  CHG_R 0.5
  INT_R 1.0
  LOCATION aft equipment bay

GEN GEN_1
  VOLTS 28          # DC generator: no FREQ line
  STAB_RATE 0.25
  EXC_RPM 800
  MIN_RPM 1800
  MAX_RPM 3600
  INT_R 0.02
  CURVEPT EFF 0 0.88
  CURVEPT EFF 5000 0.91

INV INV_1
  IN_VOLTS 24
  OUT_VOLTS 115
  OUT_FREQ 400
  INT_R 0.05
  CURVEPT EFF 0 0.85
  CURVEPT EFF 1500 0.88

LOAD FUEL_PUMP DC
  MIN_VOLTS 18
  STD_LOAD 10
  LOADCB 15 overhead panel B-3

LOAD AC_INSTR AC
  STAB
  MIN_VOLTS 90
  STD_LOAD 115
  INCAP 0.001 50 0.02

CB GEN_CB 60
  RATE 6
  LOCATION firewall

TIE BUS_TIE
GUI_POS 120 45

BUS MAIN_DC_BUS DC
  ENDPT MAIN_BATT
  ENDPT GEN_CB
  ENDPT FUEL_PUMP
  ENDPT BUS_TIE
  ENDPT INV_1 IN

BUS GEN_BUS DC
  ENDPT GEN_1
  ENDPT GEN_CB

BUS ESS_DC_BUS DC
  ENDPT BUS_TIE

BUS AC_INSTR_BUS AC
  ENDPT INV_1 OUT
  ENDPT AC_INSTR
"#;

    #[test]
    fn test_parse_sample_network() {
        let net = parse_network(SAMPLE).unwrap();
        let stats = net.stats();
        assert_eq!(stats.num_batts, 1);
        assert_eq!(stats.num_gens, 1);
        assert_eq!(stats.num_trus, 1);
        assert_eq!(stats.num_loads, 2);
        // GEN_CB plus the auto-generated FUEL_PUMP_CB
        assert_eq!(stats.num_cbs, 2);
        assert_eq!(stats.num_ties, 1);
        // 4 declared buses plus the LOADCB virtual bus
        assert_eq!(stats.num_buses, 5);

        assert!(net.spec_digest().is_some());

        let batt = net.comp(net.find("MAIN_BATT").unwrap());
        assert_eq!(batt.location.as_deref(), Some("aft equipment bay"));

        let pump_cb = net.comp(net.find("FUEL_PUMP_CB").unwrap());
        assert!(pump_cb.autogen);
        assert_eq!(pump_cb.location.as_deref(), Some("overhead panel B-3"));

        let gen = net.comp(net.find("GEN_1").unwrap());
        let DeviceKind::Gen(cfg) = &gen.kind else {
            panic!("GEN_1 should be a generator");
        };
        assert!(!cfg.is_ac());
        assert_eq!(cfg.stab_rate_u, 0.25);
        assert_eq!(cfg.stab_rate_f, 0.25);
        assert_eq!(cfg.eff_curve.points().len(), 2);

        let load = net.comp(net.find("AC_INSTR").unwrap());
        let DeviceKind::Load(cfg) = &load.kind else {
            panic!("AC_INSTR should be a load");
        };
        assert!(cfg.ac && cfg.stabilized);
        assert_eq!(cfg.incap_c, 0.001);
        assert_eq!(cfg.incap_leak.value(), 0.02);
    }

    #[test]
    fn test_digest_is_stable_and_content_sensitive() {
        let a = parse_network(SAMPLE).unwrap();
        let b = parse_network(SAMPLE).unwrap();
        assert_eq!(a.spec_digest(), b.spec_digest());

        let modified = SAMPLE.replace("VOLTS 24", "VOLTS 26");
        let c = parse_network(&modified).unwrap();
        assert_ne!(a.spec_digest(), c.spec_digest());
    }

    #[test]
    fn test_unknown_keyword_rejected() {
        let err = parse_network("BATT B1\n  WIDGETS 4\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(err.to_string().contains("WIDGETS"));
    }

    #[test]
    fn test_parameter_outside_stanza() {
        let err = parse_network("VOLTS 24\n").unwrap_err();
        assert!(err.to_string().contains("outside any stanza"));
    }

    #[test]
    fn test_bad_number() {
        let err = parse_network("BATT B1\n  VOLTS twelve\n").unwrap_err();
        assert!(err.to_string().contains("bad VOLTS value"));
    }

    #[test]
    fn test_unresolved_endpoint_reports_line() {
        let text = "BUS B DC\n  ENDPT NOWHERE\n";
        let err = parse_network(text).unwrap_err();
        assert!(err.to_string().contains("NOWHERE"));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_missing_bus_type() {
        let err = parse_network("BUS B\n").unwrap_err();
        assert!(err.to_string().contains("AC or DC"));
    }

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let text = "\n# just a comment\n\nTIE T1   # trailing comment\nTIE T2\nBUS A DC\n  ENDPT T1\n  ENDPT T2\nBUS B DC\n  ENDPT T1\n  ENDPT T2\n";
        let net = parse_network(text).unwrap();
        assert_eq!(net.stats().num_ties, 2);
    }
}
