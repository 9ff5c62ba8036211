//! Per-configuration output BOMs and their aggregation across configurations.

mod composite;
mod delta;
mod listing;

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentList, FillStatus};
use crate::device::{Ident, IdentError};
use crate::diagnostics::{Diagnostic, Diagnostics, FindingKind, WithDiagnostics};
use crate::quantity::{ParseError, Quantity, QuantityError, QuantityKind};
use crate::refdes::{Refdes, RefdesSet};

pub use composite::{CompositeLine, CompositeOutputBom};
pub use delta::DeltaOutputBom;

#[derive(Debug, thiserror::Error)]
pub enum BomError {
    #[error("{refdes} is {found} but already listed as {line}")]
    IdentMismatch {
        refdes: Refdes,
        line: String,
        found: String,
    },
    #[error("Invalid quantity '{value}' for {ident}: {source}")]
    InvalidQuantity {
        ident: String,
        value: String,
        source: ParseError,
    },
    #[error("Composite BOM has no 'device' header row")]
    MissingHeader,
    #[error("Line {ident} has {found} columns, expected {expected}")]
    ColumnCount {
        ident: String,
        expected: usize,
        found: usize,
    },
    #[error("Multiplier of {config} overflows when scaled by {factor}")]
    MultiplierOverflow { config: String, factor: u32 },
    #[error("{config} is built zero times, its per-unit quantities are unknown")]
    ZeroMultiplier { config: String },
    #[error(transparent)]
    Ident(#[from] IdentError),
    #[error(transparent)]
    Arithmetic(#[from] QuantityError),
    #[error("Failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BomError {
    pub fn finding_kind(&self) -> FindingKind {
        match self {
            BomError::IdentMismatch { .. } => FindingKind::IdentMismatch,
            BomError::Ident(e) => e.finding_kind(),
            BomError::Arithmetic(e) => e.finding_kind(),
            BomError::ColumnCount { .. }
            | BomError::MultiplierOverflow { .. }
            | BomError::ZeroMultiplier { .. } => FindingKind::Validation,
            BomError::Io(_) => FindingKind::Config,
            _ => FindingKind::Parse,
        }
    }
}

/// Which configuration a BOM belongs to and how many units of it are built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub config_name: String,
    pub multiplier: u32,
    /// Where the BOM came from, e.g. the listing file.
    pub source: Option<String>,
}

impl Descriptor {
    pub fn new(config_name: impl Into<String>) -> Self {
        Self {
            config_name: config_name.into(),
            multiplier: 1,
            source: None,
        }
    }

    pub fn with_multiplier(self, multiplier: u32) -> Self {
        Self { multiplier, ..self }
    }

    pub fn with_source(self, source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..self
        }
    }

    /// Multiplier after scaling by `factor`, compounded when `composite`.
    fn scaled(&self, factor: u32, composite: bool) -> Result<u32, BomError> {
        if !composite {
            return Ok(factor);
        }
        self.multiplier
            .checked_mul(factor)
            .ok_or_else(|| BomError::MultiplierOverflow {
                config: self.earmark(),
                factor,
            })
    }

    /// Label stock is reserved under: `"{config} x{multiplier}"`.
    pub fn earmark(&self) -> String {
        format!("{} x{}", self.config_name, self.multiplier)
    }
}

/// Extra length added to each piece of wire for stripping and routing, as a fraction of
/// the piece length clamped to `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireSlack {
    pub fraction: Decimal,
    pub min: Quantity,
    pub max: Quantity,
}

impl Default for WireSlack {
    fn default() -> Self {
        Self {
            fraction: dec!(0.1),
            min: Quantity::new(QuantityKind::Length, dec!(5)),
            max: Quantity::new(QuantityKind::Length, dec!(25.4)),
        }
    }
}

impl WireSlack {
    /// No slack, for lengths that are already totals.
    pub fn none() -> Self {
        Self {
            fraction: Decimal::ZERO,
            min: Quantity::zero(QuantityKind::Length),
            max: Quantity::zero(QuantityKind::Length),
        }
    }

    pub fn for_length(&self, length: Quantity) -> Quantity {
        let slack = length * self.fraction;
        if slack < self.min {
            self.min
        } else if slack > self.max {
            self.max
        } else {
            slack
        }
    }
}

/// One ident of an output BOM with the designators that use it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BomLine {
    pub ident: Ident,
    pub refdes: RefdesSet,
    /// Items without a designator, as read from quantity listings.
    pub unplaced: u32,
    /// Wire lines are measured by length rather than counted.
    pub continuous: bool,
}

impl BomLine {
    fn new(ident: Ident) -> Self {
        let continuous = ident.is_wire();
        Self {
            ident,
            refdes: RefdesSet::new(),
            unplaced: 0,
            continuous,
        }
    }

    pub fn count(&self) -> u32 {
        self.refdes.len() as u32 + self.unplaced
    }

    /// Quantity for a single build: a piece count, or the total wire length with slack.
    pub fn unit_quantity(&self, slack: &WireSlack) -> Result<Quantity, BomError> {
        let count = Decimal::from(self.count());
        if self.continuous {
            let length = self.ident.wire_length()?;
            let piece = (length + slack.for_length(length))?;
            Ok(piece * count)
        } else {
            Ok(Quantity::count(count))
        }
    }

    pub fn kind(&self) -> QuantityKind {
        if self.continuous {
            QuantityKind::Length
        } else {
            QuantityKind::Count
        }
    }
}

/// The BOM of one configuration: exactly one line per ident, lines in ident order.
#[derive(Debug, Clone)]
pub struct OutputBom {
    pub descriptor: Descriptor,
    lines: BTreeMap<String, BomLine>,
    /// Line key of every placed designator.
    placed: BTreeMap<Refdes, String>,
    slack: WireSlack,
    diagnostics: Diagnostics,
}

impl OutputBom {
    pub fn new(descriptor: Descriptor) -> Self {
        Self {
            descriptor,
            lines: BTreeMap::new(),
            placed: BTreeMap::new(),
            slack: WireSlack::default(),
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn with_wire_slack(self, slack: WireSlack) -> Self {
        Self { slack, ..self }
    }

    pub fn wire_slack(&self) -> &WireSlack {
        &self.slack
    }

    /// Findings recorded while components were inserted.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn lines(&self) -> impl Iterator<Item = &BomLine> {
        self.lines.values()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn find_by_ident(&self, ident: &Ident) -> Option<&BomLine> {
        self.lines.get(&ident.to_string())
    }

    pub fn item_for_refdes(&self, refdes: &Refdes) -> Option<&Ident> {
        self.placed
            .get(refdes)
            .and_then(|key| self.lines.get(key))
            .map(|line| &line.ident)
    }

    /// Every placed item as `(ident, refdes)`.
    pub fn items(&self) -> impl Iterator<Item = (&Ident, &Refdes)> {
        self.lines
            .values()
            .flat_map(|line| line.refdes.iter().map(move |r| (&line.ident, r)))
    }

    /// Add a component. DNP components are skipped; CONF ones are added with a warning.
    pub fn insert(&mut self, component: &Component) -> Result<(), BomError> {
        match component.fill_status {
            FillStatus::Dnp => return Ok(()),
            FillStatus::Conf => self.diagnostics.push(
                Diagnostic::warning(
                    FindingKind::Validation,
                    format!("{} is not configured", component.ident()),
                )
                .with_subject(component.refdes.to_string()),
            ),
            FillStatus::Normal => {}
        }
        self.insert_item(component.ident(), component.refdes.clone())
    }

    pub fn insert_item(&mut self, ident: Ident, refdes: Refdes) -> Result<(), BomError> {
        let key = ident.to_string();
        if let Some(existing) = self.placed.get(&refdes) {
            if *existing != key {
                return Err(BomError::IdentMismatch {
                    refdes,
                    line: existing.clone(),
                    found: key,
                });
            }
            return Ok(());
        }
        self.placed.insert(refdes.clone(), key.clone());
        self.lines
            .entry(key)
            .or_insert_with(|| BomLine::new(ident))
            .refdes
            .insert(refdes);
        Ok(())
    }

    /// Add `count` items without designators.
    pub fn insert_unplaced(&mut self, ident: Ident, count: u32) {
        if count == 0 {
            return;
        }
        self.lines
            .entry(ident.to_string())
            .or_insert_with(|| BomLine::new(ident))
            .unplaced += count;
    }

    /// Line quantity including the build multiplier.
    pub fn line_quantity(&self, line: &BomLine) -> Result<Quantity, BomError> {
        Ok(line.unit_quantity(&self.slack)? * Decimal::from(self.descriptor.multiplier))
    }

    /// Scale the build count. A composite multiply compounds with the current multiplier.
    pub fn multiply(&mut self, factor: u32, composite: bool) -> Result<(), BomError> {
        self.descriptor.multiplier = self.descriptor.scaled(factor, composite)?;
        Ok(())
    }

    /// Build from a component list. Rows that conflict are reported and skipped.
    pub fn from_components(
        descriptor: Descriptor,
        components: &ComponentList,
    ) -> WithDiagnostics<OutputBom> {
        Self::from_components_with(descriptor, components, WireSlack::default())
    }

    pub fn from_components_with(
        descriptor: Descriptor,
        components: &ComponentList,
        slack: WireSlack,
    ) -> WithDiagnostics<OutputBom> {
        let mut bom = OutputBom::new(descriptor).with_wire_slack(slack);
        let mut errors = Vec::new();
        for component in components.iter() {
            if let Err(e) = bom.insert(component) {
                errors.push(Diagnostic::from(e).with_subject(component.refdes.to_string()));
            }
        }
        log::info!(
            "Built BOM {} with {} lines",
            bom.descriptor.config_name,
            bom.len()
        );
        let mut diagnostics = std::mem::take(&mut bom.diagnostics);
        diagnostics.extend(errors);
        WithDiagnostics::new(bom, diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceClass;

    fn component(refdes: &str, ident: &str) -> Component {
        let ident = Ident::parse(ident).unwrap();
        Component::new(
            refdes.parse().unwrap(),
            ident.device(),
            ident.value(),
            ident.footprint().map(str::to_string),
        )
    }

    fn mm(s: &str) -> Quantity {
        Quantity::parse(QuantityKind::Length, s).unwrap()
    }

    #[test]
    fn one_line_per_ident() {
        let mut bom = OutputBom::new(Descriptor::new("A"));
        bom.insert(&component("R2", "RES SMD 10K 0402")).unwrap();
        bom.insert(&component("R10", "RES SMD 10K 0402")).unwrap();
        bom.insert(&component("R1", "RES SMD 10K 0402")).unwrap();
        bom.insert(&component("C1", "CAP CER SMD 100nF 0402")).unwrap();
        assert_eq!(bom.len(), 2);

        let ident = Ident::parse("RES SMD 10K 0402").unwrap();
        let line = bom.find_by_ident(&ident).unwrap();
        assert_eq!(crate::refdes::fmt_refdes(&line.refdes), "R1,R2,R10");
        assert_eq!(bom.line_quantity(line).unwrap(), Quantity::count(3));
        assert_eq!(
            bom.item_for_refdes(&"R10".parse().unwrap()),
            Some(&ident)
        );
        assert_eq!(bom.items().count(), 4);
    }

    #[test]
    fn fill_status_handling() {
        let mut bom = OutputBom::new(Descriptor::new("A"));
        bom.insert(&component("R1", "RES SMD 10K 0402").with_fill_status(FillStatus::Dnp))
            .unwrap();
        assert!(bom.is_empty());

        bom.insert(&component("R2", "RES SMD 10K 0402").with_fill_status(FillStatus::Conf))
            .unwrap();
        assert_eq!(bom.len(), 1);
        assert_eq!(bom.diagnostics().warnings().len(), 1);
        assert_eq!(bom.diagnostics()[0].subject, "R2");
    }

    #[test]
    fn refdes_with_two_idents_is_a_mismatch() {
        let mut bom = OutputBom::new(Descriptor::new("A"));
        bom.insert(&component("R1", "RES SMD 10K 0402")).unwrap();
        let err = bom.insert(&component("R1", "RES SMD 1K 0402")).unwrap_err();
        assert_eq!(err.finding_kind(), FindingKind::IdentMismatch);
        // Repeating the same item is harmless
        bom.insert(&component("R1", "RES SMD 10K 0402")).unwrap();
        assert_eq!(bom.lines().next().unwrap().count(), 1);
    }

    #[test]
    fn wire_length_with_slack() {
        let mut bom = OutputBom::new(Descriptor::new("A").with_multiplier(2));
        bom.insert(&component("W1", "WIRE INSULATED 16AWG RED 100mm"))
            .unwrap();
        bom.insert(&component("W2", "WIRE INSULATED 16AWG RED 100mm"))
            .unwrap();
        bom.insert(&component("W3", "WIRE INSULATED 16AWG RED 20mm"))
            .unwrap();
        bom.insert(&component("W4", "WIRE INSULATED 16AWG RED 1m"))
            .unwrap();

        let qty = |ident: &str| {
            let line = bom.find_by_ident(&Ident::parse(ident).unwrap()).unwrap();
            assert!(line.continuous);
            bom.line_quantity(line).unwrap()
        };
        // 2 pieces x (100 + 10) x 2 builds
        assert_eq!(qty("WIRE INSULATED 16AWG RED 100mm"), mm("440mm"));
        // slack clamped up to 5mm
        assert_eq!(qty("WIRE INSULATED 16AWG RED 20mm"), mm("50mm"));
        // slack clamped down to 1 inch
        assert_eq!(qty("WIRE INSULATED 16AWG RED 1m"), mm("2050.8mm"));
    }

    #[test]
    fn configurable_slack() {
        let slack = WireSlack {
            fraction: dec!(0.5),
            min: mm("0mm"),
            max: mm("1m"),
        };
        assert_eq!(slack.for_length(mm("100mm")), mm("50mm"));
        let mut bom = OutputBom::new(Descriptor::new("A")).with_wire_slack(slack);
        bom.insert(&component("W1", "WIRE INSULATED 16AWG RED 100mm"))
            .unwrap();
        let line = bom.lines().next().unwrap();
        assert_eq!(bom.line_quantity(line).unwrap(), mm("150mm"));
    }

    #[test]
    fn multiply() {
        let mut bom = OutputBom::new(Descriptor::new("A"));
        bom.multiply(3, false).unwrap();
        bom.multiply(2, true).unwrap();
        assert_eq!(bom.descriptor.multiplier, 6);
        assert_eq!(bom.descriptor.earmark(), "A x6");

        let err = bom.multiply(u32::MAX, true).unwrap_err();
        assert!(matches!(err, BomError::MultiplierOverflow { factor: u32::MAX, .. }), "{err}");
        assert_eq!(bom.descriptor.multiplier, 6);
    }

    #[test]
    fn designator_lookup_follows_insertion() {
        let mut bom = OutputBom::new(Descriptor::new("A"));
        for n in 1..=500 {
            let ident = if n % 2 == 0 {
                "RES SMD 10K 0402"
            } else {
                "CAP CER SMD 1nF 0402"
            };
            bom.insert(&component(&format!("X{n}"), ident)).unwrap();
        }
        assert_eq!(bom.len(), 2);
        assert_eq!(bom.items().count(), 500);
        assert_eq!(
            bom.item_for_refdes(&"X250".parse().unwrap()),
            Some(&Ident::parse("RES SMD 10K 0402").unwrap())
        );
        assert_eq!(bom.item_for_refdes(&"X501".parse().unwrap()), None);

        // An unplaced item never claims a designator
        bom.insert_unplaced(Ident::parse("RES SMD 1K 0402").unwrap(), 3);
        let err = bom
            .insert(&component("X1", "RES SMD 1K 0402"))
            .unwrap_err();
        assert!(
            matches!(err, BomError::IdentMismatch { ref line, .. } if line == "CAP CER SMD 1nF 0402"),
            "{err}"
        );
        assert_eq!(bom.items().count(), 500);
    }

    #[test]
    fn from_component_list() {
        let csv = "\
refdes,device,value,footprint,fillstatus,motif
R1,RES SMD,10K,0402,,
R2,RES SMD,10K,0402,DNP,
C1,CAP CER SMD,1nF,0402,CONF,
";
        let list = ComponentList::from_csv(csv.as_bytes()).output.unwrap();
        let result = OutputBom::from_components(Descriptor::new("main"), &list);
        assert!(result.is_success());
        let (bom, diagnostics) = result.unpack();
        let bom = bom.unwrap();
        assert_eq!(bom.len(), 2);
        assert_eq!(diagnostics.warnings().len(), 1);
        assert!(bom.diagnostics().is_empty());
        assert_eq!(
            bom.lines().map(|l| l.ident.device()).collect::<Vec<_>>(),
            vec![DeviceClass::CapCerSmd, DeviceClass::ResSmd]
        );
    }
}
