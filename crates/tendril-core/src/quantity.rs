use std::{cmp::Ordering, fmt, str::FromStr};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

const INCH_MM: Decimal = dec!(25.4);
const MIL_MM: Decimal = dec!(0.0254);
const CMIL_MM: Decimal = dec!(0.000254);
const THOUSAND: Decimal = dec!(1000);
const TEN: Decimal = dec!(10);

/// The physical dimension a [`Quantity`] carries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QuantityKind {
    Resistance,
    Capacitance,
    Inductance,
    Voltage,
    Current,
    Frequency,
    Charge,
    TimeSpan,
    Power,
    /// Volt-seconds applied across an inductor per switching cycle.
    VoltSeconds,
    Length,
    /// Dimensionless ratio of output to input, e.g. amplifier gain.
    Gain,
    /// Dimensionless piece count.
    Count,
}

/// One row of a kind's order table: display suffix, bare prefix and power of ten
/// relative to the canonical unit.
struct Order {
    suffix: &'static str,
    prefix: &'static str,
    exp: i32,
}

const fn order(suffix: &'static str, prefix: &'static str, exp: i32) -> Order {
    Order {
        suffix,
        prefix,
        exp,
    }
}

const RESISTANCE_ORDERS: &[Order] = &[
    order("m", "m", -3),
    order("E", "", 0),
    order("K", "K", 3),
    order("M", "M", 6),
    order("G", "G", 9),
];

const CAPACITANCE_ORDERS: &[Order] = &[
    order("fF", "f", -15),
    order("pF", "p", -12),
    order("nF", "n", -9),
    order("uF", "u", -6),
    order("mF", "m", -3),
    order("F", "", 0),
];

const INDUCTANCE_ORDERS: &[Order] = &[
    order("nH", "n", -9),
    order("uH", "u", -6),
    order("mH", "m", -3),
    order("H", "", 0),
];

const VOLTAGE_ORDERS: &[Order] = &[
    order("pV", "p", -12),
    order("nV", "n", -9),
    order("uV", "u", -6),
    order("mV", "m", -3),
    order("V", "", 0),
    order("kV", "k", 3),
];

const CURRENT_ORDERS: &[Order] = &[
    order("fA", "f", -15),
    order("pA", "p", -12),
    order("nA", "n", -9),
    order("uA", "u", -6),
    order("mA", "m", -3),
    order("A", "", 0),
];

const FREQUENCY_ORDERS: &[Order] = &[
    order("mHz", "m", -3),
    order("Hz", "", 0),
    order("kHz", "k", 3),
    order("MHz", "M", 6),
    order("GHz", "G", 9),
];

const CHARGE_ORDERS: &[Order] = &[
    order("fC", "f", -15),
    order("pC", "p", -12),
    order("nC", "n", -9),
    order("uC", "u", -6),
    order("mC", "m", -3),
    order("C", "", 0),
];

const POWER_ORDERS: &[Order] = &[
    order("uW", "u", -6),
    order("mW", "m", -3),
    order("W", "", 0),
    order("kW", "k", 3),
];

const VOLT_SECONDS_ORDERS: &[Order] = &[
    order("nVs", "n", -9),
    order("uVs", "u", -6),
    order("mVs", "m", -3),
    order("Vs", "", 0),
];

const TIMESPAN_ORDERS: &[Order] = &[
    order("fs", "f", -15),
    order("ps", "p", -12),
    order("ns", "n", -9),
    order("us", "u", -6),
    order("ms", "m", -3),
    order("s", "", 0),
];

/// Kinds tried, in order, when a string is parsed without an explicit kind.
const INFERENCE_ORDER: [QuantityKind; 13] = [
    QuantityKind::Capacitance,
    QuantityKind::Inductance,
    QuantityKind::Voltage,
    QuantityKind::Current,
    QuantityKind::Frequency,
    QuantityKind::Charge,
    QuantityKind::VoltSeconds,
    QuantityKind::TimeSpan,
    QuantityKind::Power,
    QuantityKind::Length,
    QuantityKind::Resistance,
    QuantityKind::Gain,
    QuantityKind::Count,
];

impl QuantityKind {
    pub const ALL: [QuantityKind; 13] = INFERENCE_ORDER;

    /// Name used in messages, e.g. "Resistance".
    pub fn quantity(self) -> &'static str {
        match self {
            QuantityKind::Resistance => "Resistance",
            QuantityKind::Capacitance => "Capacitance",
            QuantityKind::Inductance => "Inductance",
            QuantityKind::Voltage => "Voltage",
            QuantityKind::Current => "Current",
            QuantityKind::Frequency => "Frequency",
            QuantityKind::Charge => "Charge",
            QuantityKind::TimeSpan => "TimeSpan",
            QuantityKind::Power => "Power",
            QuantityKind::VoltSeconds => "VoltSeconds",
            QuantityKind::Length => "Length",
            QuantityKind::Gain => "Gain",
            QuantityKind::Count => "Count",
        }
    }

    /// Suffix of the unit magnitudes are stored in.
    pub fn canonical_unit(self) -> &'static str {
        match self {
            QuantityKind::Resistance => "E",
            QuantityKind::Capacitance => "F",
            QuantityKind::Inductance => "H",
            QuantityKind::Voltage => "V",
            QuantityKind::Current => "A",
            QuantityKind::Frequency => "Hz",
            QuantityKind::Charge => "C",
            QuantityKind::TimeSpan => "s",
            QuantityKind::Power => "W",
            QuantityKind::VoltSeconds => "Vs",
            QuantityKind::Length => "mm",
            QuantityKind::Gain | QuantityKind::Count => "",
        }
    }

    fn orders(self) -> &'static [Order] {
        match self {
            QuantityKind::Resistance => RESISTANCE_ORDERS,
            QuantityKind::Capacitance => CAPACITANCE_ORDERS,
            QuantityKind::Inductance => INDUCTANCE_ORDERS,
            QuantityKind::Voltage => VOLTAGE_ORDERS,
            QuantityKind::Current => CURRENT_ORDERS,
            QuantityKind::Frequency => FREQUENCY_ORDERS,
            QuantityKind::Charge => CHARGE_ORDERS,
            QuantityKind::TimeSpan => TIMESPAN_ORDERS,
            QuantityKind::Power => POWER_ORDERS,
            QuantityKind::VoltSeconds => VOLT_SECONDS_ORDERS,
            QuantityKind::Length | QuantityKind::Gain | QuantityKind::Count => &[],
        }
    }

    /// Unit spellings stripped before the remaining prefix is looked up.
    fn unit_symbols(self) -> &'static [&'static str] {
        match self {
            QuantityKind::Resistance => &["Ohms", "ohms", "Ohm", "ohm", "Ω"],
            QuantityKind::Capacitance => &["F"],
            QuantityKind::Inductance => &["H"],
            QuantityKind::Voltage => &["V"],
            QuantityKind::Current => &["A"],
            QuantityKind::Frequency => &["Hz", "hz", "HZ"],
            QuantityKind::Charge => &["C"],
            QuantityKind::TimeSpan => &["s"],
            QuantityKind::Power => &["W"],
            QuantityKind::VoltSeconds => &["Vs"],
            QuantityKind::Length | QuantityKind::Gain | QuantityKind::Count => &[],
        }
    }

    /// Resolve a unit suffix to the factor that converts into the canonical unit.
    fn factor_for(self, suffix: &str) -> Option<Decimal> {
        let suffix = suffix.replace(['µ', 'μ'], "u");
        match self {
            QuantityKind::Length => length_factor(&suffix),
            QuantityKind::Count => suffix.is_empty().then_some(Decimal::ONE),
            QuantityKind::Gain => matches!(suffix.as_str(), "" | "x").then_some(Decimal::ONE),
            _ => {
                let prefix = self
                    .unit_symbols()
                    .iter()
                    .find_map(|sym| suffix.strip_suffix(sym))
                    .unwrap_or(&suffix);
                // A bare unit symbol with a stray prefix (e.g. "xF") falls through to None.
                let exp = self
                    .orders()
                    .iter()
                    .find(|o| o.prefix == prefix)
                    .map(|o| o.exp)
                    .or_else(|| match (self, prefix) {
                        (QuantityKind::Resistance, "E" | "R") => Some(0),
                        (QuantityKind::Resistance, "k") => Some(3),
                        _ => None,
                    })?;
                Some(pow10(exp))
            }
        }
    }

    /// Whether `suffix` carries an explicit unit for this kind, used for kind inference.
    fn claims_suffix(self, suffix: &str) -> bool {
        match self {
            QuantityKind::Count => suffix.is_empty(),
            QuantityKind::Gain => suffix == "x",
            QuantityKind::Length => !suffix.is_empty() && length_factor(suffix).is_some(),
            QuantityKind::Resistance => !suffix.is_empty() && self.factor_for(suffix).is_some(),
            _ => {
                self.unit_symbols().iter().any(|sym| suffix.ends_with(sym))
                    && self.factor_for(suffix).is_some()
            }
        }
    }
}

impl fmt::Display for QuantityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.quantity())
    }
}

impl FromStr for QuantityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuantityKind::ALL
            .into_iter()
            .find(|k| k.quantity().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown quantity kind: {s}"))
    }
}

fn length_factor(suffix: &str) -> Option<Decimal> {
    match suffix.to_ascii_lowercase().as_str() {
        "" | "mm" => Some(Decimal::ONE),
        "um" => Some(Decimal::new(1, 3)),
        "cm" => Some(TEN),
        "m" | "mtr" => Some(THOUSAND),
        "in" | "inch" => Some(INCH_MM),
        "mil" => Some(MIL_MM),
        "cmil" => Some(CMIL_MM),
        _ => None,
    }
}

#[inline]
fn pow10(exp: i32) -> Decimal {
    if exp >= 0 {
        Decimal::from_i128_with_scale(10i128.pow(exp as u32), 0)
    } else {
        Decimal::new(1, (-exp) as u32)
    }
}

fn fmt_significant(x: Decimal) -> String {
    let formatted = format!("{}", x);

    if formatted.contains('.') {
        formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        formatted
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    InvalidNumber(String),
    InvalidUnit { kind: QuantityKind, unit: String },
    UnknownKind(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Empty => write!(f, "Empty quantity"),
            ParseError::InvalidNumber(s) => write!(f, "Invalid number '{s}'"),
            ParseError::InvalidUnit { kind, unit } => {
                write!(f, "Invalid unit '{unit}' for {kind}")
            }
            ParseError::UnknownKind(s) => write!(f, "Cannot infer a quantity kind for '{s}'"),
        }
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuantityError {
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Kind mismatch: expected {expected}, got {actual}")]
    KindMismatch {
        expected: QuantityKind,
        actual: QuantityKind,
    },
    #[error("Failed to parse {kind} '{input}': {source}")]
    Parse {
        kind: QuantityKind,
        input: String,
        source: ParseError,
    },
}

impl QuantityError {
    pub fn finding_kind(&self) -> crate::FindingKind {
        match self {
            QuantityError::Parse { .. } => crate::FindingKind::Parse,
            _ => crate::FindingKind::Validation,
        }
    }
}

/// An exact physical value stored in its kind's canonical unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quantity {
    kind: QuantityKind,
    #[serde(with = "rust_decimal::serde::str")]
    value: Decimal,
}

impl Quantity {
    pub fn new(kind: QuantityKind, value: Decimal) -> Self {
        Self { kind, value }
    }

    pub fn zero(kind: QuantityKind) -> Self {
        Self::new(kind, Decimal::ZERO)
    }

    pub fn count<D: Into<Decimal>>(n: D) -> Self {
        Self::new(QuantityKind::Count, n.into())
    }

    pub fn kind(&self) -> QuantityKind {
        self.kind
    }

    /// Magnitude in the canonical unit.
    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.value > Decimal::ZERO
    }

    pub fn abs(self) -> Self {
        Self::new(self.kind, self.value.abs())
    }

    pub fn check_kind(self, expected: QuantityKind) -> Result<Self, QuantityError> {
        if self.kind != expected {
            return Err(QuantityError::KindMismatch {
                expected,
                actual: self.kind,
            });
        }
        Ok(self)
    }

    /// Parse `text` as a quantity of `kind`.
    pub fn parse(kind: QuantityKind, text: &str) -> Result<Self, ParseError> {
        let compact: String = text.split_whitespace().collect();
        if compact.is_empty() {
            return Err(ParseError::Empty);
        }

        if kind == QuantityKind::Resistance {
            if let Some(q) = parse_embedded_prefix(&compact) {
                return Ok(q);
            }
        }

        let (number, suffix) = split_number(&compact)?;
        let factor = kind
            .factor_for(suffix)
            .ok_or_else(|| ParseError::InvalidUnit {
                kind,
                unit: suffix.to_string(),
            })?;
        Ok(Self::new(kind, number * factor))
    }

    /// Parse with a [`QuantityError`] carrying the kind and input for context.
    pub fn parse_as(kind: QuantityKind, text: &str) -> Result<Self, QuantityError> {
        Self::parse(kind, text).map_err(|source| QuantityError::Parse {
            kind,
            input: text.to_string(),
            source,
        })
    }

    /// Compare two quantities, failing when their kinds differ.
    pub fn checked_cmp(&self, other: &Self) -> Result<Ordering, QuantityError> {
        if self.kind != other.kind {
            return Err(QuantityError::KindMismatch {
                expected: self.kind,
                actual: other.kind,
            });
        }
        Ok(self.value.cmp(&other.value))
    }

    /// Sum an iterator of same-kind quantities, starting from zero of `kind`.
    pub fn sum<I: IntoIterator<Item = Quantity>>(
        kind: QuantityKind,
        iter: I,
    ) -> Result<Quantity, QuantityError> {
        iter.into_iter()
            .try_fold(Quantity::zero(kind), |acc, q| acc + q)
    }

    /// Mantissa and order suffix with the mantissa in [1, 1000) where the order table allows.
    pub fn natural_repr(&self) -> (Decimal, &'static str) {
        let orders = self.kind.orders();
        if orders.is_empty() || self.value.is_zero() {
            return (self.value, self.kind.canonical_unit());
        }
        let mut idx = orders
            .iter()
            .position(|o| o.exp == 0)
            .unwrap_or_default();
        let mut value = self.value;
        loop {
            let magnitude = value.abs();
            if magnitude >= THOUSAND && idx + 1 < orders.len() {
                idx += 1;
                value /= THOUSAND;
            } else if magnitude < Decimal::ONE && idx > 0 {
                idx -= 1;
                value *= THOUSAND;
            } else {
                break;
            }
        }
        (value, orders[idx].suffix)
    }

    /// Display form with the mantissa rounded to two significant figures.
    pub fn integral_repr(&self) -> String {
        match self.kind {
            QuantityKind::Length => {
                let (value, unit) = self.length_repr();
                format!("{}{unit}", fmt_significant(value.round_dp(2)))
            }
            QuantityKind::Count => fmt_significant(self.value.round()),
            QuantityKind::Gain => fmt_significant(self.value.round_sf(2).unwrap_or(self.value)),
            _ => {
                let (value, unit) = self.natural_repr();
                let rounded = value.round_sf(2).unwrap_or(value);
                format!("{}{unit}", fmt_significant(rounded))
            }
        }
    }

    fn length_repr(&self) -> (Decimal, &'static str) {
        let magnitude = self.value.abs();
        if magnitude < TEN {
            (self.value, "mm")
        } else if magnitude < THOUSAND {
            (self.value / TEN, "cm")
        } else {
            (self.value / THOUSAND, "m")
        }
    }
}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Total order: by kind first, then by canonical magnitude.
impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind
            .cmp(&other.kind)
            .then_with(|| self.value.cmp(&other.value))
    }
}

/// "4K7" style notation where the order letter stands in for the decimal point.
fn parse_embedded_prefix(s: &str) -> Option<Quantity> {
    let pos = s.find(|c: char| c.is_ascii_alphabetic())?;
    let (before, rest) = s.split_at(pos);
    let mut chars = rest.chars();
    let letter = chars.next()?;
    let after = chars.as_str();

    if before.is_empty()
        || after.is_empty()
        || !before.chars().all(|c| c.is_ascii_digit())
        || !after.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let exp = match letter {
        'm' => -3,
        'R' | 'E' => 0,
        'k' | 'K' => 3,
        'M' => 6,
        'G' => 9,
        _ => return None,
    };

    let mantissa: Decimal = format!("{before}.{after}").parse().ok()?;
    Some(Quantity::new(
        QuantityKind::Resistance,
        mantissa * pow10(exp),
    ))
}

fn split_number(s: &str) -> Result<(Decimal, &str), ParseError> {
    let split_pos = s
        .find(|ch: char| !ch.is_ascii_digit() && ch != '.' && ch != '-' && ch != '+')
        .unwrap_or(s.len());

    if split_pos == 0 {
        return Err(ParseError::InvalidNumber(s.to_string()));
    }

    let (number_str, unit_str) = s.split_at(split_pos);
    let number: Decimal = number_str
        .parse()
        .map_err(|_| ParseError::InvalidNumber(number_str.to_string()))?;
    Ok((number, unit_str))
}

impl FromStr for Quantity {
    type Err = ParseError;

    /// Parse with the kind inferred from the unit suffix. Bare numbers are counts.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.split_whitespace().collect();
        if compact.is_empty() {
            return Err(ParseError::Empty);
        }
        if let Some(q) = parse_embedded_prefix(&compact) {
            return Ok(q);
        }
        let (_, suffix) = split_number(&compact)?;
        let kind = INFERENCE_ORDER
            .into_iter()
            .find(|k| k.claims_suffix(suffix))
            .ok_or_else(|| ParseError::UnknownKind(s.to_string()))?;
        Quantity::parse(kind, &compact)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            QuantityKind::Count | QuantityKind::Gain => {
                write!(f, "{}", fmt_significant(self.value))
            }
            QuantityKind::Length => {
                let (value, unit) = self.length_repr();
                write!(f, "{}{unit}", fmt_significant(value))
            }
            _ => {
                let (value, unit) = self.natural_repr();
                write!(f, "{}{unit}", fmt_significant(value))
            }
        }
    }
}

impl std::ops::Add for Quantity {
    type Output = Result<Quantity, QuantityError>;
    fn add(self, rhs: Self) -> Self::Output {
        if self.kind != rhs.kind {
            return Err(QuantityError::KindMismatch {
                expected: self.kind,
                actual: rhs.kind,
            });
        }
        Ok(Quantity::new(self.kind, self.value + rhs.value))
    }
}

impl std::ops::Sub for Quantity {
    type Output = Result<Quantity, QuantityError>;
    fn sub(self, rhs: Self) -> Self::Output {
        if self.kind != rhs.kind {
            return Err(QuantityError::KindMismatch {
                expected: self.kind,
                actual: rhs.kind,
            });
        }
        Ok(Quantity::new(self.kind, self.value - rhs.value))
    }
}

impl std::ops::Mul<Decimal> for Quantity {
    type Output = Quantity;
    fn mul(self, rhs: Decimal) -> Self::Output {
        Quantity::new(self.kind, self.value * rhs)
    }
}

impl std::ops::Div<Decimal> for Quantity {
    type Output = Result<Quantity, QuantityError>;
    fn div(self, rhs: Decimal) -> Self::Output {
        if rhs.is_zero() {
            return Err(QuantityError::DivisionByZero);
        }
        Ok(Quantity::new(self.kind, self.value / rhs))
    }
}

/// Same-kind division yields a dimensionless ratio.
impl std::ops::Div for Quantity {
    type Output = Result<Decimal, QuantityError>;
    fn div(self, rhs: Self) -> Self::Output {
        if self.kind != rhs.kind {
            return Err(QuantityError::KindMismatch {
                expected: self.kind,
                actual: rhs.kind,
            });
        }
        if rhs.value.is_zero() {
            return Err(QuantityError::DivisionByZero);
        }
        Ok(self.value / rhs.value)
    }
}
