//! Parametric circuit blocks ("motifs") bound to component slots.
//!
//! A motif owns no component data. It names the refdes bound to each of its slots and
//! reads or writes their values through a [`ComponentList`]. Forward access computes a
//! parameter from the current values; backward access picks series values that reach a
//! target and writes them back. Every write goes to a scratch copy of the list that only
//! replaces the caller's list once the whole solve and the motif's own checks succeed.

mod dlpf1;
mod ing;
mod lm3150;
mod lpf1;
mod lpf2;
mod lregs1;
mod solve;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogError, ComponentCatalog};
use crate::component::{ComponentError, ComponentList, FillStatus};
use crate::device::{capacitor_value, resistor_value, DeviceClass, DeviceFamily, IdentError};
use crate::diagnostics::{Diagnostic, FindingKind, WithDiagnostics};
use crate::quantity::{ParseError, Quantity, QuantityError, QuantityKind};
use crate::refdes::Refdes;
use crate::series::{SeriesError, SeriesGenerator, SeriesKind, SeriesRegistry};

pub use dlpf1::Dlpf1;
pub use ing::{InampDevice, Ing};
pub use lm3150::Lm3150;
pub use lpf1::Lpf1;
pub use lpf2::Lpf2;
pub use lregs1::Lregs1;
pub use solve::{bracket, first_above, min_by_error, Bracket};

/// Configuration keys and their textual values, e.g. `Fc = "15000Hz"`.
pub type MotifConfig = BTreeMap<String, String>;

/// Rating appended to resistor values a motif assigns from its configuration.
pub(crate) const DEFAULT_RATING: &str = "0.125W";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MotifKind {
    Lpf1,
    Dlpf1,
    Lregs1,
    Lm3150,
    IngAd8421,
    IngAd8223,
    Lpf2,
}

impl MotifKind {
    pub const ALL: [MotifKind; 7] = [
        MotifKind::Lpf1,
        MotifKind::Lpf2,
        MotifKind::Dlpf1,
        MotifKind::Lregs1,
        MotifKind::Lm3150,
        MotifKind::IngAd8421,
        MotifKind::IngAd8223,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MotifKind::Lpf1 => "LPF1",
            MotifKind::Dlpf1 => "DLPF1",
            MotifKind::Lregs1 => "LREGS1",
            MotifKind::Lm3150 => "LM3150",
            MotifKind::IngAd8421 => "ING_AD8421",
            MotifKind::IngAd8223 => "ING_AD8223",
            MotifKind::Lpf2 => "LPF2",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            MotifKind::Lpf1 => "Single pole RC low pass filter",
            MotifKind::Dlpf1 => "Differential RC low pass filter",
            MotifKind::Lregs1 => "Adjustable linear regulator feedback divider",
            MotifKind::Lm3150 => "LM3150 buck controller support network",
            MotifKind::IngAd8421 => "AD8421 instrumentation amplifier gain",
            MotifKind::IngAd8223 => "AD8223 instrumentation amplifier gain",
            MotifKind::Lpf2 => "Second order Sallen-Key low pass filter",
        }
    }
}

impl fmt::Display for MotifKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MotifKind {
    type Err = MotifError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MotifKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MotifError::UnknownMotif(s.to_string()))
    }
}

/// Motif designator `"TYPE.ident"`. Anything after a `:` is a slot name and is ignored.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MotifRef {
    pub kind: MotifKind,
    pub ident: String,
}

impl MotifRef {
    pub fn new(kind: MotifKind, ident: impl Into<String>) -> Self {
        Self {
            kind,
            ident: ident.into(),
        }
    }
}

impl FromStr for MotifRef {
    type Err = MotifError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let head = s.split(':').next().unwrap_or_default().trim();
        let (kind, ident) = head
            .split_once('.')
            .ok_or_else(|| MotifError::InvalidRef(s.to_string()))?;
        if ident.is_empty() {
            return Err(MotifError::InvalidRef(s.to_string()));
        }
        Ok(MotifRef::new(kind.parse()?, ident))
    }
}

impl fmt::Display for MotifRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.ident)
    }
}

/// Component family a slot accepts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlotType {
    Resistor,
    /// Ceramic capacitor, as series solves pick values for.
    Capacitor,
    /// Any capacitor technology, for bulk and decoupling positions filled by part number.
    PowerCapacitor,
    Inductor,
}

impl SlotType {
    pub fn accepts(self, device: DeviceClass) -> bool {
        match self {
            SlotType::Resistor => matches!(device, DeviceClass::ResSmd | DeviceClass::ResThru),
            SlotType::Capacitor => {
                matches!(device, DeviceClass::CapCerSmd | DeviceClass::CapCerThru)
            }
            SlotType::PowerCapacitor => device.family() == DeviceFamily::Capacitor,
            SlotType::Inductor => {
                matches!(device, DeviceClass::InductorSmd | DeviceClass::InductorThru)
            }
        }
    }

    pub fn series_kind(self) -> SeriesKind {
        match self {
            SlotType::Resistor => SeriesKind::Resistor,
            SlotType::Capacitor | SlotType::PowerCapacitor => SeriesKind::Capacitor,
            SlotType::Inductor => SeriesKind::Inductor,
        }
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotType::Resistor => write!(f, "resistor"),
            SlotType::Capacitor => write!(f, "ceramic capacitor"),
            SlotType::PowerCapacitor => write!(f, "capacitor"),
            SlotType::Inductor => write!(f, "inductor"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MotifError {
    #[error("{motif}: slot {slot} holds a {device}, expected a {expected}")]
    DeviceMismatch {
        motif: MotifRef,
        slot: String,
        device: DeviceClass,
        expected: SlotType,
    },
    #[error("{motif}: no {series} value for {slot} reaches {target}")]
    SeriesExhausted {
        motif: MotifRef,
        slot: String,
        series: String,
        target: Quantity,
    },
    #[error("{motif}: {reason}")]
    Validation { motif: MotifRef, reason: String },
    #[error("{motif}: slot {slot} is not bound")]
    UnboundSlot { motif: MotifRef, slot: String },
    #[error("{motif}: unknown slot {slot}")]
    UnknownSlot { motif: MotifRef, slot: String },
    #[error("{motif}: slot {slot} is bound to both {first} and {second}")]
    DuplicateSlot {
        motif: MotifRef,
        slot: String,
        first: Refdes,
        second: Refdes,
    },
    #[error("{motif}: not configured")]
    Unconfigured { motif: MotifRef },
    #[error("{motif}: missing config value {key}")]
    MissingConfig { motif: MotifRef, key: String },
    #[error("{motif}: unknown parameter {name}")]
    UnknownParameter { motif: MotifRef, name: String },
    #[error("{motif}: parameter {name} cannot be set directly")]
    ReadOnlyParameter { motif: MotifRef, name: String },
    #[error("Unknown motif type '{0}'")]
    UnknownMotif(String),
    #[error("Invalid motif reference '{0}'")]
    InvalidRef(String),
    #[error("{motif}: invalid value '{value}' for {key}: {source}")]
    InvalidConfig {
        motif: MotifRef,
        key: String,
        value: String,
        source: ParseError,
    },
    #[error("{motif}: slot {slot}: {source}")]
    SlotValue {
        motif: MotifRef,
        slot: String,
        source: IdentError,
    },
    #[error("{motif}: slot {slot}: {source}")]
    Catalog {
        motif: MotifRef,
        slot: String,
        source: CatalogError,
    },
    #[error(transparent)]
    Quantity(#[from] QuantityError),
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error(transparent)]
    Component(#[from] ComponentError),
}

impl MotifError {
    pub fn finding_kind(&self) -> FindingKind {
        match self {
            MotifError::DeviceMismatch { .. } => FindingKind::DeviceMismatch,
            MotifError::SeriesExhausted { .. } => FindingKind::SeriesExhausted,
            MotifError::Catalog { source, .. } => source.finding_kind(),
            MotifError::Validation { .. } => FindingKind::Validation,
            MotifError::InvalidRef(_)
            | MotifError::InvalidConfig { .. }
            | MotifError::SlotValue { .. } => FindingKind::Parse,
            MotifError::Quantity(e) => e.finding_kind(),
            MotifError::Series(e) => e.finding_kind(),
            MotifError::Component(e) => e.finding_kind(),
            _ => FindingKind::Config,
        }
    }
}

/// What a solve needs besides the component list: where parts come from and which series
/// names resolve to what.
#[derive(Clone, Copy)]
pub struct SolveContext<'a> {
    pub catalog: &'a dyn ComponentCatalog,
    pub series: &'a SeriesRegistry,
}

impl<'a> SolveContext<'a> {
    pub fn new(catalog: &'a dyn ComponentCatalog, series: &'a SeriesRegistry) -> Self {
        Self { catalog, series }
    }
}

/// State every motif carries: its designator, slot bindings and configuration.
#[derive(Debug, Clone)]
pub struct MotifCore {
    motif_ref: MotifRef,
    bindings: BTreeMap<String, Refdes>,
    config: Option<MotifConfig>,
}

impl MotifCore {
    pub fn new(motif_ref: MotifRef) -> Self {
        Self {
            motif_ref,
            bindings: BTreeMap::new(),
            config: None,
        }
    }

    pub fn motif_ref(&self) -> &MotifRef {
        &self.motif_ref
    }

    pub fn bindings(&self) -> &BTreeMap<String, Refdes> {
        &self.bindings
    }

    pub fn config(&self) -> Option<&MotifConfig> {
        self.config.as_ref()
    }

    pub fn is_bound(&self, slot: &str) -> bool {
        self.bindings.contains_key(slot)
    }

    fn refdes(&self, slot: &str) -> Result<&Refdes, MotifError> {
        self.bindings.get(slot).ok_or_else(|| MotifError::UnboundSlot {
            motif: self.motif_ref.clone(),
            slot: slot.to_string(),
        })
    }

    fn component<'b>(
        &self,
        bom: &'b ComponentList,
        slot: &str,
        expected: SlotType,
    ) -> Result<&'b crate::component::Component, MotifError> {
        let refdes = self.refdes(slot)?;
        let component = bom
            .get(refdes.as_str())
            .ok_or_else(|| ComponentError::UnknownRefdes(refdes.to_string()))?;
        if !expected.accepts(component.device) {
            return Err(MotifError::DeviceMismatch {
                motif: self.motif_ref.clone(),
                slot: slot.to_string(),
                device: component.device,
                expected,
            });
        }
        Ok(component)
    }

    /// Current value of the component in `slot`.
    pub fn read(
        &self,
        bom: &ComponentList,
        slot: &str,
        expected: SlotType,
    ) -> Result<Quantity, MotifError> {
        self.component(bom, slot, expected)?
            .ident()
            .primary_value()
            .map_err(|source| MotifError::SlotValue {
                motif: self.motif_ref.clone(),
                slot: slot.to_string(),
                source,
            })
    }

    /// Write a solved value after confirming the catalog carries it. The rating part of
    /// the old value ("/0.125W") is kept.
    pub fn write(
        &self,
        bom: &mut ComponentList,
        slot: &str,
        expected: SlotType,
        value: Quantity,
        ctx: &SolveContext<'_>,
    ) -> Result<(), MotifError> {
        let component = self.component(bom, slot, expected)?;
        let part = ctx
            .catalog
            .find_part(&value, component.footprint.as_deref(), component.device)
            .map_err(|source| MotifError::Catalog {
                motif: self.motif_ref.clone(),
                slot: slot.to_string(),
                source,
            })?;
        let new_value = match component.value.split_once('/') {
            Some((_, rating)) => format!("{}/{rating}", part.value()),
            None => part.value().to_string(),
        };
        self.store(bom, slot, new_value)
    }

    /// Write a configured value as given, with the standard resistor rating.
    pub fn assign(
        &self,
        bom: &mut ComponentList,
        slot: &str,
        expected: SlotType,
        value: Quantity,
    ) -> Result<(), MotifError> {
        self.component(bom, slot, expected)?;
        let value = value.to_string();
        let new_value = match expected {
            SlotType::Resistor => resistor_value(&value, Some(DEFAULT_RATING)),
            SlotType::Capacitor | SlotType::PowerCapacitor => capacitor_value(&value, None),
            SlotType::Inductor => Ok(value),
        }
        .map_err(|source| MotifError::SlotValue {
            motif: self.motif_ref.clone(),
            slot: slot.to_string(),
            source,
        })?;
        self.store(bom, slot, new_value)
    }

    /// Write a vendor part number in place of a value.
    pub fn assign_part(
        &self,
        bom: &mut ComponentList,
        slot: &str,
        expected: SlotType,
        part: &str,
    ) -> Result<(), MotifError> {
        self.component(bom, slot, expected)?;
        self.store(bom, slot, part.trim().to_string())
    }

    fn store(&self, bom: &mut ComponentList, slot: &str, value: String) -> Result<(), MotifError> {
        let refdes = self.refdes(slot)?.as_str();
        bom.set_value(refdes, value)?;
        bom.set_fill_status(refdes, FillStatus::Normal)?;
        Ok(())
    }

    /// Mark an optional slot do-not-populate. Unbound optional slots are skipped.
    pub fn mark_dnp(&self, bom: &mut ComponentList, slot: &str) -> Result<(), MotifError> {
        if let Some(refdes) = self.bindings.get(slot) {
            bom.set_fill_status(refdes.as_str(), FillStatus::Dnp)?;
        }
        Ok(())
    }

    pub fn config_value(&self, key: &str) -> Result<&str, MotifError> {
        let config = self.config.as_ref().ok_or_else(|| MotifError::Unconfigured {
            motif: self.motif_ref.clone(),
        })?;
        config
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| MotifError::MissingConfig {
                motif: self.motif_ref.clone(),
                key: key.to_string(),
            })
    }

    pub fn config_quantity(&self, key: &str, kind: QuantityKind) -> Result<Quantity, MotifError> {
        let value = self.config_value(key)?;
        Quantity::parse(kind, value).map_err(|source| MotifError::InvalidConfig {
            motif: self.motif_ref.clone(),
            key: key.to_string(),
            value: value.to_string(),
            source,
        })
    }

    /// Bounded generator for the series named by `series_key`, between `min_key` and
    /// `max_key`.
    pub fn series<'a>(
        &self,
        ctx: &SolveContext<'a>,
        series_key: &str,
        min_key: &str,
        max_key: &str,
        slot: SlotType,
    ) -> Result<SeriesGenerator<'a>, MotifError> {
        let kind = slot.series_kind();
        let start = self.config_quantity(min_key, kind.quantity_kind())?;
        let end = self.config_quantity(max_key, kind.quantity_kind())?;
        let name = self.config_value(series_key)?;
        Ok(ctx.series.generator(name, kind, Some(start), Some(end))?)
    }

    /// First series value at or above `target`, with its predecessor.
    pub fn bracket(
        &self,
        generator: &SeriesGenerator<'_>,
        slot: &str,
        target: Quantity,
    ) -> Result<Bracket, MotifError> {
        let found = bracket(generator.iter(), &target);
        log::debug!(
            "{}: {slot} target {target} in {} -> {:?}",
            self.motif_ref,
            generator.name(),
            found.map(|b| b.crossing.to_string())
        );
        found.ok_or_else(|| self.exhausted(generator, slot, target))
    }

    pub fn exhausted(
        &self,
        generator: &SeriesGenerator<'_>,
        slot: &str,
        target: Quantity,
    ) -> MotifError {
        MotifError::SeriesExhausted {
            motif: self.motif_ref.clone(),
            slot: slot.to_string(),
            series: generator.name(),
            target,
        }
    }

    pub fn invalid(&self, reason: impl Into<String>) -> MotifError {
        MotifError::Validation {
            motif: self.motif_ref.clone(),
            reason: reason.into(),
        }
    }

    fn unknown_parameter(&self, name: &str) -> MotifError {
        MotifError::UnknownParameter {
            motif: self.motif_ref.clone(),
            name: name.to_string(),
        }
    }

    pub fn read_only(&self, name: &str) -> MotifError {
        MotifError::ReadOnlyParameter {
            motif: self.motif_ref.clone(),
            name: name.to_string(),
        }
    }
}

/// A parametric block over component slots.
///
/// Implementors provide the slot layout, the default configuration and the closed-form
/// relations. Binding, readiness checks and the all-or-nothing commit are shared.
pub trait Motif: fmt::Debug {
    fn core(&self) -> &MotifCore;
    fn core_mut(&mut self) -> &mut MotifCore;

    fn slots(&self) -> &'static [(&'static str, SlotType)];

    fn optional_slots(&self) -> &'static [(&'static str, SlotType)] {
        &[]
    }

    /// Parameters with the kind of their values.
    fn parameters(&self) -> &'static [(&'static str, QuantityKind)];

    /// Defaults merged under any configuration passed to [`Motif::configure`].
    fn config_stub(&self) -> MotifConfig;

    /// Forward computation of `name` from current slot values.
    fn compute(&self, name: &str, bom: &ComponentList) -> Result<Quantity, MotifError>;

    /// Backward computation: write slot values reaching `target` into `bom`.
    fn solve(
        &self,
        name: &str,
        target: Quantity,
        bom: &mut ComponentList,
        ctx: &SolveContext<'_>,
    ) -> Result<(), MotifError>;

    /// Write the values the stored configuration calls for into `bom`.
    fn apply_config(&self, bom: &mut ComponentList, ctx: &SolveContext<'_>)
        -> Result<(), MotifError>;

    /// Motif specific invariants over the current slot values.
    fn check(&self, _bom: &ComponentList) -> Result<(), MotifError> {
        Ok(())
    }

    fn motif_ref(&self) -> &MotifRef {
        self.core().motif_ref()
    }

    fn slot_type(&self, slot: &str) -> Option<SlotType> {
        self.slots()
            .iter()
            .chain(self.optional_slots())
            .find(|(name, _)| *name == slot)
            .map(|(_, ty)| *ty)
    }

    fn bind(&mut self, slot: &str, refdes: Refdes) -> Result<(), MotifError> {
        let motif = self.motif_ref().clone();
        if self.slot_type(slot).is_none() {
            return Err(MotifError::UnknownSlot {
                motif,
                slot: slot.to_string(),
            });
        }
        let bindings = &mut self.core_mut().bindings;
        if let Some(first) = bindings.get(slot) {
            if *first != refdes {
                return Err(MotifError::DuplicateSlot {
                    motif,
                    slot: slot.to_string(),
                    first: first.clone(),
                    second: refdes,
                });
            }
        }
        bindings.insert(slot.to_string(), refdes);
        Ok(())
    }

    /// Every required slot bound and a configuration set.
    fn ensure_ready(&self) -> Result<(), MotifError> {
        let core = self.core();
        for (slot, _) in self.slots() {
            core.refdes(slot)?;
        }
        if core.config.is_none() {
            return Err(MotifError::Unconfigured {
                motif: core.motif_ref.clone(),
            });
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ensure_ready().is_ok()
    }

    fn parameter_kind(&self, name: &str) -> Option<QuantityKind> {
        self.parameters()
            .iter()
            .find(|(p, _)| *p == name)
            .map(|(_, kind)| *kind)
    }

    fn parameter(&self, name: &str, bom: &ComponentList) -> Result<Quantity, MotifError> {
        self.ensure_ready()?;
        if self.parameter_kind(name).is_none() {
            return Err(self.core().unknown_parameter(name));
        }
        self.compute(name, bom)
    }

    /// Solve for `target` and commit the new values, or leave `bom` untouched on failure.
    fn set_parameter(
        &self,
        name: &str,
        target: Quantity,
        bom: &mut ComponentList,
        ctx: &SolveContext<'_>,
    ) -> Result<(), MotifError> {
        self.ensure_ready()?;
        let kind = self
            .parameter_kind(name)
            .ok_or_else(|| self.core().unknown_parameter(name))?;
        target.check_kind(kind)?;

        let mut scratch = bom.clone();
        self.solve(name, target, &mut scratch, ctx)?;
        self.validate(&scratch)?;
        log::info!("{}: {name} set for target {target}", self.motif_ref());
        *bom = scratch;
        Ok(())
    }

    /// Store `config` over the defaults and apply it. On failure neither the motif nor
    /// `bom` change.
    fn configure(
        &mut self,
        config: MotifConfig,
        bom: &mut ComponentList,
        ctx: &SolveContext<'_>,
    ) -> Result<(), MotifError> {
        let mut merged = self.config_stub();
        merged.extend(config);
        let previous = self.core_mut().config.replace(merged);

        let outcome = self.ensure_ready().and_then(|_| {
            let mut scratch = bom.clone();
            self.apply_config(&mut scratch, ctx)?;
            self.validate(&scratch)?;
            Ok(scratch)
        });
        match outcome {
            Ok(scratch) => {
                log::info!("{}: configured", self.motif_ref());
                *bom = scratch;
                Ok(())
            }
            Err(e) => {
                self.core_mut().config = previous;
                Err(e)
            }
        }
    }

    /// Re-derive every parameter and check the motif's invariants.
    fn validate(&self, bom: &ComponentList) -> Result<(), MotifError> {
        self.ensure_ready()?;
        for (name, _) in self.parameters() {
            self.compute(name, bom)?;
        }
        self.check(bom)
    }
}

/// Construct an unbound, unconfigured motif.
pub fn build(motif_ref: MotifRef) -> Box<dyn Motif> {
    match motif_ref.kind {
        MotifKind::Lpf1 => Box::new(Lpf1::new(motif_ref)),
        MotifKind::Dlpf1 => Box::new(Dlpf1::new(motif_ref)),
        MotifKind::Lregs1 => Box::new(Lregs1::new(motif_ref)),
        MotifKind::Lm3150 => Box::new(Lm3150::new(motif_ref)),
        MotifKind::IngAd8421 => Box::new(Ing::new(motif_ref, InampDevice::Ad8421)),
        MotifKind::IngAd8223 => Box::new(Ing::new(motif_ref, InampDevice::Ad8223)),
        MotifKind::Lpf2 => Box::new(Lpf2::new(motif_ref)),
    }
}

/// Discover motifs from the `motif` attribute of each component and bind their slots.
/// Motifs are returned in designator order; bad bindings are reported and skipped.
pub fn bind_motifs(components: &ComponentList) -> WithDiagnostics<Vec<Box<dyn Motif>>> {
    let mut motifs: BTreeMap<MotifRef, Box<dyn Motif>> = BTreeMap::new();
    let mut result = WithDiagnostics::default();

    for component in components.iter() {
        let Some(binding) = &component.motif else {
            continue;
        };
        let motif_ref: MotifRef = match binding.motif.parse() {
            Ok(r) => r,
            Err(e) => {
                result.push(Diagnostic::from(e).with_subject(component.refdes.to_string()));
                continue;
            }
        };
        let motif = motifs
            .entry(motif_ref.clone())
            .or_insert_with(|| build(motif_ref));
        if let Err(e) = motif.bind(&binding.slot, component.refdes.clone()) {
            result.push(Diagnostic::from(e).with_subject(component.refdes.to_string()));
        }
    }

    for motif in motifs.values() {
        let unbound: Vec<&str> = motif
            .slots()
            .iter()
            .map(|(slot, _)| *slot)
            .filter(|slot| !motif.core().is_bound(slot))
            .collect();
        if !unbound.is_empty() {
            result.push(
                Diagnostic::warning(
                    FindingKind::Config,
                    format!("unbound slots {}", unbound.join(", ")),
                )
                .with_subject(motif.motif_ref().to_string()),
            );
        }
    }

    result.output = Some(motifs.into_values().collect());
    result
}
