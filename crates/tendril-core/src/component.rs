use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::device::{DeviceClass, Ident, IdentError};
use crate::diagnostics::{Diagnostic, FindingKind, WithDiagnostics};
use crate::refdes::{Refdes, RefdesError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FillStatus {
    #[default]
    Normal,
    /// Do not populate.
    Dnp,
    /// Configurable but not yet configured.
    Conf,
}

impl FromStr for FillStatus {
    type Err = ComponentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "NORMAL" => Ok(FillStatus::Normal),
            "DNP" => Ok(FillStatus::Dnp),
            "CONF" => Ok(FillStatus::Conf),
            other => Err(ComponentError::FillStatus(other.to_string())),
        }
    }
}

impl fmt::Display for FillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillStatus::Normal => Ok(()),
            FillStatus::Dnp => write!(f, "DNP"),
            FillStatus::Conf => write!(f, "CONF"),
        }
    }
}

/// Binding of a component to a motif slot, written `"LPF1.1:R1"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MotifSlot {
    pub motif: String,
    pub slot: String,
}

impl FromStr for MotifSlot {
    type Err = ComponentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once(':') {
            Some((motif, slot)) if !motif.is_empty() && !slot.is_empty() => Ok(MotifSlot {
                motif: motif.to_string(),
                slot: slot.to_string(),
            }),
            _ => Err(ComponentError::MotifSlot(s.to_string())),
        }
    }
}

impl fmt::Display for MotifSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.motif, self.slot)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    #[error("Duplicate reference designator: {0}")]
    DuplicateRefdes(Refdes),
    #[error("Unknown reference designator: {0}")]
    UnknownRefdes(String),
    #[error("Invalid fill status: '{0}'")]
    FillStatus(String),
    #[error("Invalid motif binding: '{0}'")]
    MotifSlot(String),
    #[error(transparent)]
    Refdes(#[from] RefdesError),
    #[error(transparent)]
    Ident(#[from] IdentError),
    #[error("Failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ComponentError {
    pub fn finding_kind(&self) -> FindingKind {
        match self {
            ComponentError::DuplicateRefdes(_) => FindingKind::IdentMismatch,
            ComponentError::UnknownRefdes(_) => FindingKind::Validation,
            ComponentError::Io(_) => FindingKind::Config,
            _ => FindingKind::Parse,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub refdes: Refdes,
    pub device: DeviceClass,
    pub value: String,
    pub footprint: Option<String>,
    pub fill_status: FillStatus,
    pub motif: Option<MotifSlot>,
}

impl Component {
    pub fn new(
        refdes: Refdes,
        device: DeviceClass,
        value: impl Into<String>,
        footprint: Option<String>,
    ) -> Self {
        Self {
            refdes,
            device,
            value: value.into(),
            footprint,
            fill_status: FillStatus::Normal,
            motif: None,
        }
    }

    pub fn with_fill_status(self, fill_status: FillStatus) -> Self {
        Self {
            fill_status,
            ..self
        }
    }

    pub fn with_motif(self, motif: MotifSlot) -> Self {
        Self {
            motif: Some(motif),
            ..self
        }
    }

    pub fn ident(&self) -> Ident {
        Ident::new(self.device, self.value.clone(), self.footprint.clone())
    }
}

/// Component records of one configuration, keyed by refdes. The list owns the records;
/// motifs address them by refdes and write through [`ComponentList::set_value`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentList {
    components: BTreeMap<Refdes, Component>,
}

impl ComponentList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, component: Component) -> Result<(), ComponentError> {
        if self.components.contains_key(&component.refdes) {
            return Err(ComponentError::DuplicateRefdes(component.refdes));
        }
        self.components.insert(component.refdes.clone(), component);
        Ok(())
    }

    pub fn get(&self, refdes: &str) -> Option<&Component> {
        let key = Refdes::new(refdes).ok()?;
        self.components.get(&key)
    }

    fn get_mut(&mut self, refdes: &str) -> Result<&mut Component, ComponentError> {
        Refdes::new(refdes)
            .ok()
            .and_then(|key| self.components.get_mut(&key))
            .ok_or_else(|| ComponentError::UnknownRefdes(refdes.to_string()))
    }

    pub fn set_value(&mut self, refdes: &str, value: impl Into<String>) -> Result<(), ComponentError> {
        let component = self.get_mut(refdes)?;
        let value = value.into();
        log::debug!("Setting {refdes} value {} -> {value}", component.value);
        component.value = value;
        Ok(())
    }

    pub fn set_fill_status(
        &mut self,
        refdes: &str,
        fill_status: FillStatus,
    ) -> Result<(), ComponentError> {
        self.get_mut(refdes)?.fill_status = fill_status;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Load a component listing with columns `refdes, device, value, footprint,
    /// fillstatus, motif`. Bad rows are reported and skipped.
    pub fn from_csv<R: std::io::Read>(reader: R) -> WithDiagnostics<ComponentList> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let mut list = ComponentList::new();
        let mut result = WithDiagnostics::default();

        for (row, record) in reader.records().enumerate() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    result.push(Diagnostic::from(ComponentError::from(e)));
                    return result;
                }
            };
            let field = |i: usize| record.get(i).unwrap_or("").trim();
            if field(0).is_empty() {
                continue;
            }
            match parse_row(&field) {
                Ok(component) => {
                    if let Err(e) = list.insert(component) {
                        result.push(Diagnostic::from(e).with_subject(format!("row {}", row + 1)));
                    }
                }
                Err(e) => {
                    result.push(Diagnostic::from(e).with_subject(format!("row {}", row + 1)));
                }
            }
        }
        result.output = Some(list);
        result
    }

    /// Write the listing back in the column layout [`ComponentList::from_csv`] reads.
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<(), ComponentError> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(["refdes", "device", "value", "footprint", "fillstatus", "motif"])?;
        for c in self.iter() {
            writer.write_record([
                c.refdes.to_string(),
                c.device.to_string(),
                c.value.clone(),
                c.footprint.clone().unwrap_or_default(),
                c.fill_status.to_string(),
                c.motif.as_ref().map(|m| m.to_string()).unwrap_or_default(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn parse_row<'a>(field: &impl Fn(usize) -> &'a str) -> Result<Component, ComponentError> {
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());

    let refdes: Refdes = field(0).parse()?;
    let device: DeviceClass = field(1).parse()?;
    let mut component = Component::new(refdes, device, field(2), non_empty(field(3)))
        .with_fill_status(field(4).parse()?);
    if !field(5).is_empty() {
        component = component.with_motif(field(5).parse()?);
    }
    Ok(component)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
refdes,device,value,footprint,fillstatus,motif
R1,RES SMD,50E,0402,,LPF1.1:R1
C1,CAP CER SMD,1nF,0402,,LPF1.1:C1
R2,RES SMD,10K,0402,DNP,
J1,CONN BERG STRIP,PIN 1x2,,,
";

    #[test]
    fn load_listing() {
        let result = ComponentList::from_csv(LISTING.as_bytes());
        assert!(result.diagnostics.is_empty(), "{}", result.diagnostics);
        let list = result.output.unwrap();
        assert_eq!(list.len(), 4);

        let r1 = list.get("R1").unwrap();
        assert_eq!(r1.ident().to_string(), "RES SMD 50E 0402");
        assert_eq!(
            r1.motif,
            Some(MotifSlot {
                motif: "LPF1.1".into(),
                slot: "R1".into()
            })
        );
        assert_eq!(list.get("R2").unwrap().fill_status, FillStatus::Dnp);
        assert_eq!(
            list.get("J1").unwrap().ident().to_string(),
            "CONN BERG STRIP PIN 1x2"
        );
    }

    #[test]
    fn bad_rows_are_reported_not_fatal() {
        let csv = "\
refdes,device,value,footprint,fillstatus,motif
R1,RES SMD,50E,0402,,
R2,GIZMO,1,0402,,
R1,RES SMD,10K,0402,,
C1,CAP CER SMD,1nF,0402,MAYBE,
";
        let result = ComponentList::from_csv(csv.as_bytes());
        let (list, diagnostics) = result.unpack();
        assert_eq!(list.unwrap().len(), 1);
        assert_eq!(diagnostics.len(), 3);
        assert_eq!(diagnostics[0].kind, FindingKind::Parse);
        assert_eq!(diagnostics[1].kind, FindingKind::IdentMismatch);
        assert_eq!(diagnostics[2].subject, "row 4");
    }

    #[test]
    fn set_value_by_refdes() {
        let mut list = ComponentList::from_csv(LISTING.as_bytes()).output.unwrap();
        list.set_value("C1", "4.7nF").unwrap();
        assert_eq!(list.get("C1").unwrap().value, "4.7nF");
        assert!(matches!(
            list.set_value("C9", "1nF"),
            Err(ComponentError::UnknownRefdes(_))
        ));
    }

    #[test]
    fn csv_round_trip() {
        let list = ComponentList::from_csv(LISTING.as_bytes()).output.unwrap();
        let mut out = Vec::new();
        list.write_csv(&mut out).unwrap();
        let reloaded = ComponentList::from_csv(out.as_slice()).output.unwrap();
        assert_eq!(reloaded, list);
    }
}
