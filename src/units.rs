//! Physical dimensions and named units.
//!
//! Dimensions are vectors of exponents over the seven SI base dimensions. Units are
//! quantities (a scale factor plus a dimension) looked up by name in a fixed registry
//! that knows the SI base and derived units, their usual SI prefixes and the constant
//! `pi`. Unit specifications such as `volt/second`, `mV` or `metre**2` are parsed with
//! [`parse_unit`].

use std::{
    collections::HashMap,
    fmt,
    ops::{Div, Mul},
    sync::OnceLock,
};

use crate::errors::UnitError;

const BASE_SYMBOLS: [&str; 7] = ["m", "kg", "s", "A", "K", "mol", "cd"];
const TOLERANCE: f64 = 1e-9;

/// A physical dimension, stored as exponents of the SI base dimensions
/// (length, mass, time, current, temperature, amount of substance, luminous intensity).
#[derive(Debug, Clone, Copy, Default)]
pub struct Dimension {
    exponents: [f64; 7],
}

impl Dimension {
    pub const DIMENSIONLESS: Dimension = Dimension {
        exponents: [0.0; 7],
    };

    pub const fn new(exponents: [f64; 7]) -> Self {
        Self { exponents }
    }

    const fn base(index: usize) -> Self {
        let mut exponents = [0.0; 7];
        exponents[index] = 1.0;
        Self { exponents }
    }

    pub const fn length() -> Self {
        Self::base(0)
    }

    pub const fn mass() -> Self {
        Self::base(1)
    }

    pub const fn time() -> Self {
        Self::base(2)
    }

    pub const fn current() -> Self {
        Self::base(3)
    }

    pub const fn temperature() -> Self {
        Self::base(4)
    }

    pub const fn amount() -> Self {
        Self::base(5)
    }

    pub const fn luminosity() -> Self {
        Self::base(6)
    }

    pub fn exponents(&self) -> &[f64; 7] {
        &self.exponents
    }

    pub fn is_dimensionless(&self) -> bool {
        *self == Self::DIMENSIONLESS
    }

    pub fn powf(&self, exponent: f64) -> Self {
        Self {
            exponents: self.exponents.map(|e| e * exponent),
        }
    }

    pub fn powi(&self, exponent: i64) -> Self {
        self.powf(exponent as f64)
    }
}

impl PartialEq for Dimension {
    fn eq(&self, other: &Self) -> bool {
        self.exponents
            .iter()
            .zip(other.exponents.iter())
            .all(|(a, b)| (a - b).abs() < TOLERANCE)
    }
}

impl Mul for Dimension {
    type Output = Dimension;

    fn mul(self, rhs: Dimension) -> Dimension {
        let mut exponents = self.exponents;
        for (e, r) in exponents.iter_mut().zip(rhs.exponents) {
            *e += r;
        }
        Dimension { exponents }
    }
}

impl Div for Dimension {
    type Output = Dimension;

    fn div(self, rhs: Dimension) -> Dimension {
        self * rhs.powf(-1.0)
    }
}

/// Formats the dimension as a product of base units, e.g. `m^2 * kg * s^-3 * A^-1`,
/// or `1` for dimensionless quantities.
impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factors: Vec<String> = BASE_SYMBOLS
            .iter()
            .zip(self.exponents.iter())
            .filter(|(_, e)| e.abs() >= TOLERANCE)
            .map(|(symbol, e)| {
                if (e - 1.0).abs() < TOLERANCE {
                    symbol.to_string()
                } else {
                    format!("{symbol}^{e}")
                }
            })
            .collect();
        if factors.is_empty() {
            write!(f, "1")
        } else {
            write!(f, "{}", factors.join(" * "))
        }
    }
}

/// A value together with its physical dimension. The value is expressed in SI base units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub dim: Dimension,
}

impl Quantity {
    pub const fn new(value: f64, dim: Dimension) -> Self {
        Self { value, dim }
    }

    pub const fn dimensionless(value: f64) -> Self {
        Self::new(value, Dimension::DIMENSIONLESS)
    }

    pub fn powf(&self, exponent: f64) -> Self {
        Self::new(self.value.powf(exponent), self.dim.powf(exponent))
    }
}

impl Mul for Quantity {
    type Output = Quantity;

    fn mul(self, rhs: Quantity) -> Quantity {
        Quantity::new(self.value * rhs.value, self.dim * rhs.dim)
    }
}

impl Div for Quantity {
    type Output = Quantity;

    fn div(self, rhs: Quantity) -> Quantity {
        Quantity::new(self.value / rhs.value, self.dim / rhs.dim)
    }
}

impl Mul<Quantity> for f64 {
    type Output = Quantity;

    fn mul(self, rhs: Quantity) -> Quantity {
        Quantity::new(self * rhs.value, rhs.dim)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dim.is_dimensionless() {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{} {}", self.value, self.dim)
        }
    }
}

const PREFIXES: [(&str, &str, f64); 8] = [
    ("p", "pico", 1e-12),
    ("n", "nano", 1e-9),
    ("u", "micro", 1e-6),
    ("m", "milli", 1e-3),
    ("c", "centi", 1e-2),
    ("k", "kilo", 1e3),
    ("M", "mega", 1e6),
    ("G", "giga", 1e9),
];

fn registry() -> &'static HashMap<String, Quantity> {
    static REGISTRY: OnceLock<HashMap<String, Quantity>> = OnceLock::new();
    REGISTRY.get_or_init(build_registry)
}

fn build_registry() -> HashMap<String, Quantity> {
    let metre = Dimension::length();
    let kilogram = Dimension::mass();
    let second = Dimension::time();
    let amp = Dimension::current();

    let newton = kilogram * metre / second.powi(2);
    let joule = newton * metre;
    let watt = joule / second;
    let coulomb = second * amp;
    let volt = watt / amp;
    let ohm = volt / amp;
    let siemens = amp / volt;
    let farad = coulomb / volt;
    let hertz = second.powi(-1);

    // (long name, symbol, dimension, scale of the unprefixed unit)
    let units: [(&str, &str, Dimension, f64); 16] = [
        ("metre", "m", metre, 1.0),
        ("meter", "m", metre, 1.0),
        ("gram", "g", kilogram, 1e-3),
        ("second", "s", second, 1.0),
        ("amp", "A", amp, 1.0),
        ("ampere", "A", amp, 1.0),
        ("kelvin", "K", Dimension::temperature(), 1.0),
        ("mole", "mol", Dimension::amount(), 1.0),
        ("candela", "cd", Dimension::luminosity(), 1.0),
        ("newton", "N", newton, 1.0),
        ("joule", "J", joule, 1.0),
        ("watt", "W", watt, 1.0),
        ("coulomb", "C", coulomb, 1.0),
        ("volt", "V", volt, 1.0),
        ("farad", "F", farad, 1.0),
        ("hertz", "Hz", hertz, 1.0),
    ];

    let mut registry = HashMap::new();
    let mut add = |long: &str, symbol: &str, quantity: Quantity| {
        for (prefix, long_prefix, scale) in PREFIXES {
            let scaled = scale * quantity;
            registry.insert(format!("{long_prefix}{long}"), scaled);
            registry.insert(format!("{prefix}{symbol}"), scaled);
        }
        registry.insert(long.to_string(), quantity);
        registry.insert(symbol.to_string(), quantity);
    };
    for (long, symbol, dim, scale) in units {
        add(long, symbol, Quantity::new(scale, dim));
    }
    add("ohm", "ohm", Quantity::new(1.0, ohm));
    add("siemens", "S", Quantity::new(1.0, siemens));

    // kg is the SI base unit, not a scaled gram
    registry.insert("kg".to_string(), Quantity::new(1.0, kilogram));
    registry.insert("kilogram".to_string(), Quantity::new(1.0, kilogram));
    registry.insert(
        "pi".to_string(),
        Quantity::dimensionless(std::f64::consts::PI),
    );
    registry
}

/// Looks up a unit or a mathematical constant by name.
///
/// # Example
/// ```rust
/// use diffeq_codegen::units::{lookup_unit, Dimension};
///
/// let mv = lookup_unit("mV").unwrap();
/// assert!((mv.value - 1e-3).abs() < 1e-15);
/// assert_eq!(mv.dim, lookup_unit("volt").unwrap().dim);
/// assert_eq!(lookup_unit("ms").unwrap().dim, Dimension::time());
/// ```
pub fn lookup_unit(name: &str) -> Option<Quantity> {
    registry().get(name).copied()
}

#[derive(Debug, PartialEq)]
enum UnitToken<'a> {
    Name(&'a str),
    Number(f64),
    Mul,
    Div,
    Pow,
}

fn tokenize(text: &str) -> Result<Vec<UnitToken<'_>>, UnitError> {
    let invalid = || UnitError::InvalidUnit(text.to_string());
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
        } else if c == b'*' {
            if bytes.get(pos + 1) == Some(&b'*') {
                tokens.push(UnitToken::Pow);
                pos += 2;
            } else {
                tokens.push(UnitToken::Mul);
                pos += 1;
            }
        } else if c == b'/' {
            tokens.push(UnitToken::Div);
            pos += 1;
        } else if c.is_ascii_alphabetic() || c == b'_' {
            let start = pos;
            while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                pos += 1;
            }
            tokens.push(UnitToken::Name(&text[start..pos]));
        } else if c.is_ascii_digit() || c == b'.' || c == b'-' {
            let start = pos;
            pos += 1;
            while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                pos += 1;
            }
            let number = text[start..pos].parse::<f64>().map_err(|_| invalid())?;
            tokens.push(UnitToken::Number(number));
        } else {
            return Err(invalid());
        }
    }
    Ok(tokens)
}

/// Parses a unit specification into a quantity.
///
/// The specification is a product of unit names and numbers joined by `*` and `/`,
/// each factor optionally raised to a numeric power with `**`. The number `1` denotes
/// a dimensionless quantity.
///
/// # Arguments
/// * `text` - The unit specification, e.g. `volt/second`, `siemens/metre**2` or `1`
///
/// # Returns
/// The quantity the specification evaluates to, or an error naming the unknown unit
pub fn parse_unit(text: &str) -> Result<Quantity, UnitError> {
    let invalid = || UnitError::InvalidUnit(text.to_string());
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(invalid());
    }

    let mut result = Quantity::dimensionless(1.0);
    let mut iter = tokens.into_iter().peekable();
    let mut divide = false;
    loop {
        let mut factor = match iter.next() {
            Some(UnitToken::Name(name)) => {
                lookup_unit(name).ok_or_else(|| UnitError::UnknownUnit(name.to_string()))?
            }
            Some(UnitToken::Number(value)) => Quantity::dimensionless(value),
            _ => return Err(invalid()),
        };
        if iter.peek() == Some(&UnitToken::Pow) {
            iter.next();
            match iter.next() {
                Some(UnitToken::Number(exponent)) => factor = factor.powf(exponent),
                _ => return Err(invalid()),
            }
        }
        result = if divide {
            result / factor
        } else {
            result * factor
        };
        match iter.next() {
            None => break,
            Some(UnitToken::Mul) => divide = false,
            Some(UnitToken::Div) => divide = true,
            Some(_) => return Err(invalid()),
        }
    }
    Ok(result)
}
