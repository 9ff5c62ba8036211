//! Preferred-value series (IEC 60063 E3 to E24) and custom part-number series.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, FindingKind, WithDiagnostics};
use crate::quantity::{ParseError, Quantity, QuantityKind};

const E24: [Decimal; 24] = [
    dec!(1.0),
    dec!(1.1),
    dec!(1.2),
    dec!(1.3),
    dec!(1.5),
    dec!(1.6),
    dec!(1.8),
    dec!(2.0),
    dec!(2.2),
    dec!(2.4),
    dec!(2.7),
    dec!(3.0),
    dec!(3.3),
    dec!(3.6),
    dec!(3.9),
    dec!(4.3),
    dec!(4.7),
    dec!(5.1),
    dec!(5.6),
    dec!(6.2),
    dec!(6.8),
    dec!(7.5),
    dec!(8.2),
    dec!(9.1),
];
const E12: [Decimal; 12] = [
    dec!(1.0),
    dec!(1.2),
    dec!(1.5),
    dec!(1.8),
    dec!(2.2),
    dec!(2.7),
    dec!(3.3),
    dec!(3.9),
    dec!(4.7),
    dec!(5.6),
    dec!(6.8),
    dec!(8.2),
];
const E6: [Decimal; 6] = [
    dec!(1.0),
    dec!(1.5),
    dec!(2.2),
    dec!(3.3),
    dec!(4.7),
    dec!(6.8),
];
const E3: [Decimal; 3] = [dec!(1.0), dec!(2.2), dec!(4.7)];

/// Decades generated within each order.
const DECADES: u32 = 3;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StandardSeries {
    E3,
    E6,
    E12,
    E24,
}

impl StandardSeries {
    pub fn multipliers(self) -> &'static [Decimal] {
        match self {
            StandardSeries::E3 => &E3,
            StandardSeries::E6 => &E6,
            StandardSeries::E12 => &E12,
            StandardSeries::E24 => &E24,
        }
    }

    fn lookup(name: &str) -> Option<StandardSeries> {
        match name {
            "E3" => Some(StandardSeries::E3),
            "E6" => Some(StandardSeries::E6),
            "E12" => Some(StandardSeries::E12),
            "E24" => Some(StandardSeries::E24),
            _ => None,
        }
    }
}

impl fmt::Display for StandardSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StandardSeries::E3 => "E3",
            StandardSeries::E6 => "E6",
            StandardSeries::E12 => "E12",
            StandardSeries::E24 => "E24",
        };
        f.write_str(name)
    }
}

impl FromStr for StandardSeries {
    type Err = SeriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StandardSeries::lookup(&s.to_ascii_uppercase())
            .ok_or_else(|| SeriesError::UnknownSeries(s.to_string()))
    }
}

/// The family of part a series enumerates values for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    Resistor,
    Capacitor,
    Inductor,
}

impl SeriesKind {
    pub fn quantity_kind(self) -> QuantityKind {
        match self {
            SeriesKind::Resistor => QuantityKind::Resistance,
            SeriesKind::Capacitor => QuantityKind::Capacitance,
            SeriesKind::Inductor => QuantityKind::Inductance,
        }
    }

    /// Order exponents walked by standard series, lowest first.
    fn order_exps(self) -> &'static [i32] {
        match self {
            SeriesKind::Resistor => &[-3, 0, 3, 6, 9],
            SeriesKind::Capacitor => &[-15, -12, -9, -6, -3],
            SeriesKind::Inductor => &[-9, -6, -3],
        }
    }
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesKind::Resistor => write!(f, "resistor"),
            SeriesKind::Capacitor => write!(f, "capacitor"),
            SeriesKind::Inductor => write!(f, "inductor"),
        }
    }
}

impl FromStr for SeriesKind {
    type Err = SeriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "resistor" => Ok(SeriesKind::Resistor),
            "capacitor" => Ok(SeriesKind::Capacitor),
            "inductor" => Ok(SeriesKind::Inductor),
            _ => Err(SeriesError::UnknownKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SeriesError {
    #[error("Unknown series: {0}")]
    UnknownSeries(String),
    #[error("Unknown series kind: {0}")]
    UnknownKind(String),
    #[error("Series {series} holds {actual} values, not {expected} values")]
    KindMismatch {
        series: String,
        expected: SeriesKind,
        actual: SeriesKind,
    },
    #[error("Series bound {bound} is not a {expected}")]
    BoundKind { bound: Quantity, expected: QuantityKind },
    #[error("Invalid value '{value}' in series {series}: {source}")]
    InvalidValue {
        series: String,
        value: String,
        source: ParseError,
    },
}

impl SeriesError {
    pub fn finding_kind(&self) -> FindingKind {
        match self {
            SeriesError::InvalidValue { .. } => FindingKind::Parse,
            _ => FindingKind::Config,
        }
    }
}

/// Values backed by explicit catalog part numbers instead of a decade formula.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomSeries {
    name: String,
    kind: SeriesKind,
    pub description: Option<String>,
    values: BTreeMap<Quantity, String>,
}

impl CustomSeries {
    pub fn new(name: impl Into<String>, kind: SeriesKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            values: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SeriesKind {
        self.kind
    }

    pub fn add_value(&mut self, value: Quantity, part: impl Into<String>) -> Result<(), SeriesError> {
        if value.kind() != self.kind.quantity_kind() {
            return Err(SeriesError::BoundKind {
                bound: value,
                expected: self.kind.quantity_kind(),
            });
        }
        self.values.insert(value, part.into());
        Ok(())
    }

    /// Parse `value` in the series' kind and register it against `part`.
    pub fn add_value_str(&mut self, value: &str, part: impl Into<String>) -> Result<(), SeriesError> {
        let q = Quantity::parse(self.kind.quantity_kind(), value).map_err(|source| {
            SeriesError::InvalidValue {
                series: self.name.clone(),
                value: value.to_string(),
                source,
            }
        })?;
        self.add_value(q, part)
    }

    pub fn part_for(&self, value: &Quantity) -> Option<&str> {
        self.values.get(value).map(String::as_str)
    }

    pub fn value_for_part(&self, part: &str) -> Option<Quantity> {
        self.values
            .iter()
            .find(|(_, p)| p.as_str() == part)
            .map(|(v, _)| *v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum Source<'a> {
    Standard(StandardSeries),
    Custom(&'a CustomSeries),
}

/// A bounded walk over a series, in increasing order.
///
/// Standard series emit nothing until a value equal to `start` is generated and stop right
/// after emitting a value equal to `end`. Custom series treat both bounds as inclusive
/// filters.
#[derive(Debug, Clone)]
pub struct SeriesGenerator<'a> {
    source: Source<'a>,
    kind: SeriesKind,
    start: Option<Quantity>,
    end: Option<Quantity>,
}

impl<'a> SeriesGenerator<'a> {
    pub fn standard(
        series: StandardSeries,
        kind: SeriesKind,
        start: Option<Quantity>,
        end: Option<Quantity>,
    ) -> Result<Self, SeriesError> {
        Self::with_bounds(Source::Standard(series), kind, start, end)
    }

    pub fn custom(
        series: &'a CustomSeries,
        start: Option<Quantity>,
        end: Option<Quantity>,
    ) -> Result<Self, SeriesError> {
        Self::with_bounds(Source::Custom(series), series.kind, start, end)
    }

    fn with_bounds(
        source: Source<'a>,
        kind: SeriesKind,
        start: Option<Quantity>,
        end: Option<Quantity>,
    ) -> Result<Self, SeriesError> {
        let expected = kind.quantity_kind();
        for bound in [start, end].into_iter().flatten() {
            if bound.kind() != expected {
                return Err(SeriesError::BoundKind { bound, expected });
            }
        }
        Ok(Self {
            source,
            kind,
            start,
            end,
        })
    }

    pub fn kind(&self) -> SeriesKind {
        self.kind
    }

    pub fn name(&self) -> String {
        match self.source {
            Source::Standard(s) => s.to_string(),
            Source::Custom(c) => c.name.clone(),
        }
    }

    /// Catalog part number for `value`, if the series is a custom one.
    pub fn part_for(&self, value: &Quantity) -> Option<&'a str> {
        match self.source {
            Source::Standard(_) => None,
            Source::Custom(c) => c.part_for(value),
        }
    }

    /// Lazy walk over the bounded series. Each call starts from the beginning.
    pub fn iter(&self) -> Box<dyn Iterator<Item = Quantity> + 'a> {
        let (start, end) = (self.start, self.end);
        match self.source {
            Source::Standard(series) => Box::new(Bounded {
                inner: unbounded(series, self.kind),
                start,
                end,
                in_range: start.is_none(),
                done: false,
            }),
            Source::Custom(custom) => Box::new(
                custom
                    .values
                    .keys()
                    .copied()
                    .skip_while(move |v| start.is_some_and(|s| *v < s))
                    .take_while(move |v| end.is_none_or(|e| *v <= e)),
            ),
        }
    }

    /// Collect the bounded series, flagging a bounded walk that produced nothing.
    pub fn generate(&self) -> WithDiagnostics<Vec<Quantity>> {
        let values: Vec<Quantity> = self.iter().collect();
        let mut result = WithDiagnostics::success(values);

        let unmatched_start = match (self.source, self.start) {
            (Source::Standard(_), Some(start)) => {
                result.output.as_ref().is_some_and(|v| v.first() != Some(&start))
            }
            (Source::Custom(_), Some(_)) => result.output.as_ref().is_some_and(Vec::is_empty),
            _ => false,
        };
        if unmatched_start {
            let start = self.start.map(|s| s.to_string()).unwrap_or_default();
            log::warn!("Series {} never reaches start value {start}", self.name());
            result.push(
                Diagnostic::warning(
                    FindingKind::EmptyBoundedSeries,
                    format!("start value {start} is not in the {} series", self.kind),
                )
                .with_subject(self.name()),
            );
        }
        result
    }

    pub fn contains(&self, value: &Quantity) -> bool {
        self.iter().any(|v| v == *value)
    }

    /// Nearest series value by absolute difference; ties go to the lower value.
    pub fn closest_value(&self, target: &Quantity) -> Option<Quantity> {
        let mut previous: Option<Quantity> = None;
        for value in self.iter() {
            if value.value() >= target.value() {
                return Some(match previous {
                    Some(prev)
                        if (target.value() - prev.value()).abs()
                            <= (value.value() - target.value()).abs() =>
                    {
                        prev
                    }
                    _ => value,
                });
            }
            previous = Some(value);
        }
        previous
    }

    /// Geometric mean of the bounded series.
    pub fn characteristic_value(&self) -> Option<Quantity> {
        let logs: Vec<f64> = self
            .iter()
            .filter_map(|v| v.value().to_f64())
            .filter(|v| *v > 0.0)
            .map(f64::log10)
            .collect();
        if logs.is_empty() {
            return None;
        }
        let mean = logs.iter().sum::<f64>() / logs.len() as f64;
        let value = Decimal::from_f64(10f64.powf(mean))?;
        Some(Quantity::new(self.kind.quantity_kind(), value))
    }
}

fn unbounded(series: StandardSeries, kind: SeriesKind) -> impl Iterator<Item = Quantity> {
    let qkind = kind.quantity_kind();
    kind.order_exps().iter().flat_map(move |&exp| {
        (0..DECADES).flat_map(move |decade| {
            series.multipliers().iter().map(move |&m| {
                let scaled = m * Decimal::from(10i64.pow(decade));
                Quantity::new(qkind, scale(scaled, exp))
            })
        })
    })
}

fn scale(value: Decimal, exp: i32) -> Decimal {
    if exp >= 0 {
        value * Decimal::from(10i64.pow(exp as u32))
    } else {
        value / Decimal::from(10i64.pow((-exp) as u32))
    }
}

struct Bounded<I> {
    inner: I,
    start: Option<Quantity>,
    end: Option<Quantity>,
    in_range: bool,
    done: bool,
}

impl<I: Iterator<Item = Quantity>> Iterator for Bounded<I> {
    type Item = Quantity;

    fn next(&mut self) -> Option<Quantity> {
        if self.done {
            return None;
        }
        for value in self.inner.by_ref() {
            if !self.in_range && Some(value) == self.start {
                self.in_range = true;
            }
            if self.in_range {
                if Some(value) == self.end {
                    self.done = true;
                }
                return Some(value);
            }
        }
        self.done = true;
        None
    }
}

/// Named series available to generators: the four standard ones plus configured custom
/// series.
#[derive(Debug, Clone, Default)]
pub struct SeriesRegistry {
    custom: BTreeMap<String, CustomSeries>,
}

impl SeriesRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, series: CustomSeries) {
        self.custom.insert(series.name.clone(), series);
    }

    pub fn custom(&self, name: &str) -> Option<&CustomSeries> {
        self.custom.get(name)
    }

    /// Resolve `name` to a generator over `kind` values.
    pub fn generator(
        &self,
        name: &str,
        kind: SeriesKind,
        start: Option<Quantity>,
        end: Option<Quantity>,
    ) -> Result<SeriesGenerator<'_>, SeriesError> {
        if let Some(series) = StandardSeries::lookup(name) {
            return SeriesGenerator::standard(series, kind, start, end);
        }
        let custom = self
            .custom
            .get(name)
            .ok_or_else(|| SeriesError::UnknownSeries(name.to_string()))?;
        if custom.kind != kind {
            return Err(SeriesError::KindMismatch {
                series: name.to_string(),
                expected: kind,
                actual: custom.kind,
            });
        }
        SeriesGenerator::custom(custom, start, end)
    }

    /// Whether `value` is a member of the named series.
    pub fn is_standard_value(
        &self,
        name: &str,
        kind: SeriesKind,
        value: &Quantity,
    ) -> Result<bool, SeriesError> {
        Ok(self.generator(name, kind, None, None)?.contains(value))
    }
}
