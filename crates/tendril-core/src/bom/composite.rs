use std::collections::BTreeMap;
use std::io::Write;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::device::Ident;
use crate::quantity::{Quantity, QuantityKind};

use super::{BomError, BomLine, Descriptor, OutputBom};

/// Quantities of one ident across every configuration of a composite BOM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositeLine {
    pub ident: Ident,
    columns: Vec<Quantity>,
}

impl CompositeLine {
    fn new(ident: Ident, width: usize) -> Self {
        let kind = if ident.is_wire() {
            QuantityKind::Length
        } else {
            QuantityKind::Count
        };
        Self {
            ident,
            columns: vec![Quantity::zero(kind); width],
        }
    }

    pub fn columns(&self) -> &[Quantity] {
        &self.columns
    }

    fn kind(&self) -> QuantityKind {
        self.columns
            .first()
            .map(Quantity::kind)
            .unwrap_or(QuantityKind::Count)
    }

    /// Sum across all configurations.
    pub fn quantity(&self) -> Result<Quantity, BomError> {
        Ok(Quantity::sum(self.kind(), self.columns.iter().copied())?)
    }

    /// Sum across the configurations at `idxs`.
    pub fn subset_quantity(&self, idxs: &[usize]) -> Result<Quantity, BomError> {
        Ok(Quantity::sum(
            self.kind(),
            idxs.iter().filter_map(|&i| self.columns.get(i).copied()),
        )?)
    }

    /// Non-zero columns with their index.
    pub fn nonzero_columns(&self) -> impl Iterator<Item = (usize, Quantity)> + '_ {
        self.columns
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, q)| !q.is_zero())
    }

    fn set(&mut self, column: usize, quantity: Quantity) -> Result<(), BomError> {
        let slot = self.columns.get_mut(column).ok_or(BomError::ColumnCount {
            ident: self.ident.to_string(),
            expected: column + 1,
            found: 0,
        })?;
        *slot = quantity.check_kind(slot.kind())?;
        Ok(())
    }

    fn merge(&mut self, other: &CompositeLine) -> Result<(), BomError> {
        if other.columns.len() != self.columns.len() {
            return Err(BomError::ColumnCount {
                ident: other.ident.to_string(),
                expected: self.columns.len(),
                found: other.columns.len(),
            });
        }
        for (mine, theirs) in self.columns.iter_mut().zip(&other.columns) {
            *mine = (*mine + *theirs)?;
        }
        Ok(())
    }
}

/// Output BOMs of several configurations merged into one table: one line per ident, one
/// column per configuration, in the order the BOMs were given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositeOutputBom {
    pub name: String,
    descriptors: Vec<Descriptor>,
    lines: BTreeMap<String, CompositeLine>,
}

impl CompositeOutputBom {
    pub fn new(name: impl Into<String>, boms: &[OutputBom]) -> Result<Self, BomError> {
        let mut cobom = Self {
            name: name.into(),
            descriptors: boms.iter().map(|b| b.descriptor.clone()).collect(),
            lines: BTreeMap::new(),
        };
        for (column, bom) in boms.iter().enumerate() {
            log::info!(
                "Consolidating BOM: merging {} into column {column}",
                bom.descriptor.earmark()
            );
            for line in bom.lines() {
                cobom.insert_line(line, bom.line_quantity(line)?, column)?;
            }
        }
        Ok(cobom)
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn col_title(&self, idx: usize) -> Option<&str> {
        self.descriptors.get(idx).map(|d| d.config_name.as_str())
    }

    /// Lines in ident order.
    pub fn lines(&self) -> impl Iterator<Item = &CompositeLine> {
        self.lines.values()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn find_by_ident(&self, ident: &Ident) -> Option<&CompositeLine> {
        self.lines.get(&ident.to_string())
    }

    /// Record `quantity` of `line` in `column`.
    pub fn insert_line(
        &mut self,
        line: &BomLine,
        quantity: Quantity,
        column: usize,
    ) -> Result<(), BomError> {
        let width = self.descriptors.len();
        self.lines
            .entry(line.ident.to_string())
            .or_insert_with(|| CompositeLine::new(line.ident.clone(), width))
            .set(column, quantity)
    }

    /// Column indices of the named configurations, in the order named.
    pub fn subset_indices<S: AsRef<str>>(&self, config_names: &[S]) -> Vec<usize> {
        config_names
            .iter()
            .flat_map(|name| {
                self.descriptors
                    .iter()
                    .enumerate()
                    .filter(move |(_, d)| d.config_name == name.as_ref())
                    .map(|(i, _)| i)
            })
            .collect()
    }

    /// Rescale every configuration. A composite multiply compounds `factor` with each
    /// current multiplier; otherwise every multiplier becomes `factor`. Nothing changes
    /// unless every configuration can be rescaled.
    pub fn multiply(&mut self, factor: u32, composite: bool) -> Result<(), BomError> {
        let mut descriptors = self.descriptors.clone();
        let mut lines = self.lines.clone();
        for (idx, descriptor) in descriptors.iter_mut().enumerate() {
            let previous = descriptor.multiplier;
            if !composite && previous == 0 {
                return Err(BomError::ZeroMultiplier {
                    config: descriptor.config_name.clone(),
                });
            }
            descriptor.multiplier = descriptor.scaled(factor, composite)?;
            for line in lines.values_mut() {
                let column = &mut line.columns[idx];
                *column = if composite {
                    *column * Decimal::from(factor)
                } else {
                    (*column / Decimal::from(previous))? * Decimal::from(factor)
                };
            }
        }
        self.descriptors = descriptors;
        self.lines = lines;
        Ok(())
    }

    /// Fold wire lines of different piece lengths into one length-free line per wire.
    pub fn collapse_wires(&mut self) -> Result<(), BomError> {
        let keys: Vec<String> = self.lines.keys().cloned().collect();
        for key in keys {
            let Some(line) = self.lines.get(&key) else {
                continue;
            };
            let collapsed = line.ident.collapsed();
            let new_key = collapsed.to_string();
            if new_key == key {
                continue;
            }
            let Some(mut line) = self.lines.remove(&key) else {
                continue;
            };
            match self.lines.get_mut(&new_key) {
                Some(existing) => existing.merge(&line)?,
                None => {
                    line.ident = collapsed;
                    self.lines.insert(new_key, line);
                }
            }
        }
        Ok(())
    }

    /// Write the table as CSV: `device`, one `"{config} x{multiplier}"` column per
    /// configuration and `Total`. Zero cells are left empty.
    pub fn dump<W: Write>(&self, writer: W) -> Result<(), BomError> {
        let mut writer = csv::Writer::from_writer(writer);
        let mut header = vec!["device".to_string()];
        header.extend(self.descriptors.iter().map(Descriptor::earmark));
        header.push("Total".to_string());
        writer.write_record(&header)?;

        for line in self.lines.values() {
            let mut row = vec![line.ident.to_string()];
            row.extend(line.columns.iter().map(|q| {
                if q.is_zero() {
                    String::new()
                } else {
                    q.to_string()
                }
            }));
            row.push(line.quantity()?.to_string());
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;

    fn bom(name: &str, multiplier: u32, items: &[(&str, &str)]) -> OutputBom {
        let mut bom = OutputBom::new(Descriptor::new(name).with_multiplier(multiplier));
        for (refdes, ident) in items {
            let ident = Ident::parse(ident).unwrap();
            bom.insert(&Component::new(
                refdes.parse().unwrap(),
                ident.device(),
                ident.value(),
                ident.footprint().map(str::to_string),
            ))
            .unwrap();
        }
        bom
    }

    #[test]
    fn columns_follow_bom_order() {
        let a = bom(
            "A",
            1,
            &[
                ("R1", "RES SMD 10K 0402"),
                ("R2", "RES SMD 10K 0402"),
                ("R3", "RES SMD 10K 0402"),
            ],
        );
        let b = bom(
            "B",
            2,
            &[
                ("R1", "RES SMD 10K 0402"),
                ("R2", "RES SMD 10K 0402"),
                ("R3", "RES SMD 10K 0402"),
                ("R4", "RES SMD 10K 0402"),
                ("R5", "RES SMD 10K 0402"),
                ("C1", "CAP CER SMD 1nF 0402"),
            ],
        );
        let cobom = CompositeOutputBom::new("order", &[a, b]).unwrap();
        assert_eq!(cobom.len(), 2);

        let line = cobom
            .find_by_ident(&Ident::parse("RES SMD 10K 0402").unwrap())
            .unwrap();
        assert_eq!(line.columns(), &[Quantity::count(3), Quantity::count(10)]);
        assert_eq!(line.quantity().unwrap(), Quantity::count(13));
        assert_eq!(line.subset_quantity(&[1]).unwrap(), Quantity::count(10));

        let cap = cobom
            .find_by_ident(&Ident::parse("CAP CER SMD 1nF 0402").unwrap())
            .unwrap();
        assert_eq!(cap.columns(), &[Quantity::count(0), Quantity::count(2)]);
        assert_eq!(cap.nonzero_columns().collect::<Vec<_>>(), vec![(1, Quantity::count(2))]);

        assert_eq!(cobom.subset_indices(&["B", "missing", "A"]), vec![1, 0]);
        assert_eq!(cobom.col_title(1), Some("B"));
    }

    #[test]
    fn collapse_merges_wire_lengths() {
        let a = bom(
            "A",
            1,
            &[
                ("W1", "WIRE INSULATED 16AWG RED 100mm"),
                ("W2", "WIRE INSULATED 16AWG RED 200mm"),
                ("W3", "WIRE INSULATED 16AWG BLACK 200mm"),
            ],
        );
        let b = bom("B", 1, &[("W1", "WIRE INSULATED 16AWG RED 200mm")]);
        let mut cobom = CompositeOutputBom::new("wires", &[a, b]).unwrap();
        assert_eq!(cobom.len(), 3);

        cobom.collapse_wires().unwrap();
        assert_eq!(cobom.len(), 2);
        let red = cobom
            .find_by_ident(&Ident::parse_generic("WIRE INSULATED 16AWG RED").unwrap())
            .unwrap();
        let mm = |s: &str| Quantity::parse(QuantityKind::Length, s).unwrap();
        // (100 + 10) + (200 + 20) in A, 200 + 20 in B
        assert_eq!(red.columns(), &[mm("330mm"), mm("220mm")]);
        assert_eq!(red.quantity().unwrap(), mm("550mm"));

        let before = cobom.clone();
        cobom.collapse_wires().unwrap();
        assert_eq!(cobom, before);
    }

    #[test]
    fn multiply_scales_descriptors_and_columns() {
        let a = bom("A", 2, &[("R1", "RES SMD 10K 0402")]);
        let mut cobom = CompositeOutputBom::new("x", &[a]).unwrap();
        cobom.multiply(5, true).unwrap();
        assert_eq!(cobom.descriptors()[0].multiplier, 10);
        assert_eq!(
            cobom.lines().next().unwrap().quantity().unwrap(),
            Quantity::count(10)
        );

        cobom.multiply(3, false).unwrap();
        assert_eq!(cobom.descriptors()[0].multiplier, 3);
        assert_eq!(
            cobom.lines().next().unwrap().quantity().unwrap(),
            Quantity::count(3)
        );
    }

    #[test]
    fn multiply_is_all_or_nothing() {
        let a = bom("A", 2, &[("R1", "RES SMD 10K 0402")]);
        let b = bom("B", 0, &[("R1", "RES SMD 10K 0402")]);
        let mut cobom = CompositeOutputBom::new("x", &[a, b]).unwrap();
        let before = cobom.clone();

        let err = cobom.multiply(3, false).unwrap_err();
        assert!(matches!(err, BomError::ZeroMultiplier { ref config } if config == "B"), "{err}");
        let multipliers: Vec<u32> = cobom.descriptors().iter().map(|d| d.multiplier).collect();
        assert_eq!(multipliers, vec![2, 0]);
        assert_eq!(cobom, before);

        // Compounding a zero multiplier is fine
        cobom.multiply(3, true).unwrap();
        assert_eq!(cobom.descriptors()[1].multiplier, 0);
    }

    #[test]
    fn multiply_overflow_is_an_error() {
        let a = bom("A", 1, &[("R1", "RES SMD 10K 0402")]);
        let b = bom("B", u32::MAX, &[("R1", "RES SMD 10K 0402")]);
        let mut cobom = CompositeOutputBom::new("x", &[a, b]).unwrap();
        let before = cobom.clone();

        let err = cobom.multiply(2, true).unwrap_err();
        assert!(matches!(err, BomError::MultiplierOverflow { factor: 2, .. }), "{err}");
        assert_eq!(err.finding_kind(), crate::diagnostics::FindingKind::Validation);
        assert_eq!(cobom, before);
    }

    #[test]
    fn dump_csv() {
        let a = bom("A", 1, &[("R1", "RES SMD 10K 0402"), ("R2", "RES SMD 10K 0402")]);
        let b = bom(
            "B",
            3,
            &[("R1", "RES SMD 10K 0402"), ("C1", "CAP CER SMD 1nF 0402")],
        );
        let cobom = CompositeOutputBom::new("order", &[a, b]).unwrap();
        let mut out = Vec::new();
        cobom.dump(&mut out).unwrap();
        insta::assert_snapshot!(String::from_utf8(out).unwrap(), @r"
        device,A x1,B x3,Total
        CAP CER SMD 1nF 0402,,3,3
        RES SMD 10K 0402,2,3,5
        ");
    }
}
