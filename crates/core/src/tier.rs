//! Classification tiers and their criticality order.
//!
//! Every tie-break and "most critical" reduction in the engine goes through the
//! `Ord` implementations defined here: `A < B < C < D` for value tiers,
//! `X < Y < Z < NoSales` for variability tiers, and quadrants ordered by value
//! tier first, variability second, with `NoSales` last.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Value tier from ABC (Pareto) ranking. `D` means no recorded value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AbcTier {
    A,
    B,
    C,
    D,
}

/// Variability tier from the coefficient of variation of demand.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum XyzTier {
    X,
    Y,
    Z,
    #[serde(rename = "NO_SALES")]
    NoSales,
}

/// Combined ABC x XYZ category.
///
/// `Ranked` only ever carries tiers `A..=C` and `X..=Z`; anything involving
/// `D` or `XyzTier::NoSales` collapses to `NoSales` through [`Quadrant::combine`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Quadrant {
    Ranked(AbcTier, XyzTier),
    NoSales,
}

impl AbcTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbcTier::A => "A",
            AbcTier::B => "B",
            AbcTier::C => "C",
            AbcTier::D => "D",
        }
    }
}

impl XyzTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            XyzTier::X => "X",
            XyzTier::Y => "Y",
            XyzTier::Z => "Z",
            XyzTier::NoSales => "NO_SALES",
        }
    }
}

impl Quadrant {
    /// The nine ranked quadrants, most critical first.
    pub const RANKED: [Quadrant; 9] = [
        Quadrant::Ranked(AbcTier::A, XyzTier::X),
        Quadrant::Ranked(AbcTier::A, XyzTier::Y),
        Quadrant::Ranked(AbcTier::A, XyzTier::Z),
        Quadrant::Ranked(AbcTier::B, XyzTier::X),
        Quadrant::Ranked(AbcTier::B, XyzTier::Y),
        Quadrant::Ranked(AbcTier::B, XyzTier::Z),
        Quadrant::Ranked(AbcTier::C, XyzTier::X),
        Quadrant::Ranked(AbcTier::C, XyzTier::Y),
        Quadrant::Ranked(AbcTier::C, XyzTier::Z),
    ];

    pub fn combine(value: AbcTier, variability: XyzTier) -> Self {
        match (value, variability) {
            (AbcTier::D, _) | (_, XyzTier::NoSales) => Quadrant::NoSales,
            (v, x) => Quadrant::Ranked(v, x),
        }
    }

    pub fn is_no_sales(&self) -> bool {
        matches!(self, Quadrant::NoSales)
    }

    pub fn code(&self) -> String {
        match self {
            Quadrant::Ranked(v, x) => format!("{}{}", v.as_str(), x.as_str()),
            Quadrant::NoSales => "NO_SALES".to_string(),
        }
    }

    /// Most critical quadrant among `quadrants`, or `None` if empty.
    pub fn most_critical<I: IntoIterator<Item = Quadrant>>(quadrants: I) -> Option<Quadrant> {
        quadrants.into_iter().min()
    }
}

/// Most critical value tier reported across stores.
///
/// `None` entries are stores with an unknown tier; they rank after every known
/// tier, so the result is `None` only if no store reported a tier.
pub fn most_critical_abc<I: IntoIterator<Item = Option<AbcTier>>>(tiers: I) -> Option<AbcTier> {
    tiers.into_iter().fold(None, |best, tier| match (best, tier) {
        (Some(b), Some(t)) => Some(b.min(t)),
        (None, t) => t,
        (b, None) => b,
    })
}

impl fmt::Display for AbcTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for XyzTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

impl FromStr for Quadrant {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        if code == "NO_SALES" {
            return Ok(Quadrant::NoSales);
        }
        let mut chars = code.chars();
        let value = match chars.next() {
            Some('A') => AbcTier::A,
            Some('B') => AbcTier::B,
            Some('C') => AbcTier::C,
            _ => return Err(EngineError::validation(format!("unknown quadrant code: {s}"))),
        };
        let variability = match chars.next() {
            Some('X') => XyzTier::X,
            Some('Y') => XyzTier::Y,
            Some('Z') => XyzTier::Z,
            _ => return Err(EngineError::validation(format!("unknown quadrant code: {s}"))),
        };
        if chars.next().is_some() {
            return Err(EngineError::validation(format!("unknown quadrant code: {s}")));
        }
        Ok(Quadrant::Ranked(value, variability))
    }
}

impl TryFrom<String> for Quadrant {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Quadrant> for String {
    fn from(value: Quadrant) -> Self {
        value.code()
    }
}
