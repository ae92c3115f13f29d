//! Newtype wrappers for the electrical quantities the solver passes around.
//!
//! Voltages, currents, powers, frequencies, resistances, energies, and
//! temperatures are all `f64` underneath, which makes it far too easy to
//! hand a power to something expecting an energy, or to add amps to volts.
//! Wrapping each quantity in its own `#[repr(transparent)]` tuple struct
//! moves those mistakes to compile time at no runtime cost, while the
//! arithmetic that is physically meaningful (same-unit sums, scalar
//! scaling, a few named cross-unit laws) stays available.
//!
//! ```
//! use aeps_core::units::{Amperes, Volts, Watts};
//!
//! let u = Volts(28.0);
//! let i = Amperes(10.0);
//! let p: Watts = u.power(i);
//! assert_eq!(p, Watts(280.0));
//! // let nonsense = u + i;   // does not compile
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Declares one scalar quantity: the tuple struct itself, same-unit
/// arithmetic, scalar scaling, display with the unit symbol, and summation.
macro_rules! scalar_unit {
    ($(#[$meta:meta])* $name:ident, $symbol:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(pub f64);

        impl $name {
            /// Wrap a raw magnitude.
            #[inline]
            pub const fn new(raw: f64) -> Self {
                $name(raw)
            }

            /// Unwrap the raw magnitude.
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            /// Magnitude without sign.
            #[inline]
            pub fn abs(self) -> Self {
                $name(self.0.abs())
            }

            /// Dimensionless ratio of two same-unit quantities.
            #[inline]
            pub fn ratio(self, denom: Self) -> f64 {
                self.0 / denom.0
            }

            /// Saturate into `[lo, hi]`.
            #[inline]
            pub fn clamp(self, lo: Self, hi: Self) -> Self {
                $name(self.0.clamp(lo.0, hi.0))
            }
        }

        impl Add for $name {
            type Output = Self;
            fn add(self, rhs: Self) -> Self {
                $name(self.0 + rhs.0)
            }
        }

        impl Sub for $name {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self {
                $name(self.0 - rhs.0)
            }
        }

        impl Neg for $name {
            type Output = Self;
            fn neg(self) -> Self {
                $name(-self.0)
            }
        }

        impl Mul<f64> for $name {
            type Output = Self;
            fn mul(self, scale: f64) -> Self {
                $name(self.0 * scale)
            }
        }

        impl Div<f64> for $name {
            type Output = Self;
            fn div(self, scale: f64) -> Self {
                $name(self.0 / scale)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} {}", self.0, $symbol)
            }
        }

        impl Sum for $name {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                $name(iter.map(|v| v.0).sum())
            }
        }
    };
}

scalar_unit!(
    /// Electric potential in volts.
    Volts,
    "V"
);

scalar_unit!(
    /// Electric current in amperes.
    Amperes,
    "A"
);

scalar_unit!(
    /// Power in watts.
    Watts,
    "W"
);

scalar_unit!(
    /// Frequency in hertz. A frequency of zero denotes DC equipment
    /// throughout the crate.
    Hertz,
    "Hz"
);

scalar_unit!(
    /// Resistance in ohms.
    Ohms,
    "Ω"
);

scalar_unit!(
    /// Energy in joules. Battery capacities are rated in joules at the
    /// reference temperature.
    Joules,
    "J"
);

scalar_unit!(
    /// Temperature in degrees Celsius.
    Celsius,
    "°C"
);

// Cross-unit physical laws. Only the relations the solver actually needs
// are spelled out; everything else requires an explicit unwrap, on purpose.

impl Volts {
    /// Power delivered at this potential: P = U × I
    #[inline]
    pub fn power(self, current: Amperes) -> Watts {
        Watts(self.0 * current.0)
    }

    /// Current through a resistance at this potential: I = U / R
    #[inline]
    pub fn current_through(self, resistance: Ohms) -> Amperes {
        if resistance.0.abs() < 1e-12 {
            Amperes(0.0)
        } else {
            Amperes(self.0 / resistance.0)
        }
    }
}

impl Watts {
    /// Current drawn at a given potential: I = P / U
    #[inline]
    pub fn current_at(self, volts: Volts) -> Amperes {
        if volts.0.abs() < 1e-12 {
            Amperes(0.0)
        } else {
            Amperes(self.0 / volts.0)
        }
    }

    /// Energy transferred over a time span: E = P × Δt
    #[inline]
    pub fn over_seconds(self, seconds: f64) -> Joules {
        Joules(self.0 * seconds)
    }
}

impl Celsius {
    /// Convert to kelvin
    #[inline]
    pub fn to_kelvin(self) -> f64 {
        self.0 + 273.15
    }

    /// The reference temperature for battery capacity ratings (15 °C)
    pub const REFERENCE: Self = Self(15.0);
}
