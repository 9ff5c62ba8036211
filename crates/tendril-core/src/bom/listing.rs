//! Loaders for BOMs that arrive as quantity listings rather than component lists.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;

use super::{BomError, CompositeOutputBom, Descriptor, OutputBom, WireSlack};
use crate::device::Ident;
use crate::diagnostics::{Diagnostic, WithDiagnostics};
use crate::quantity::{ParseError, Quantity, QuantityKind};

static MULTIPLIER_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+x\d+$").unwrap());

const HEADER: &str = "device";
const END: &str = "END";

impl OutputBom {
    /// Build from `(ident, quantity)` pairs. Counts become undesignated items; a wire
    /// quantity becomes one piece of that total length, without slack.
    pub fn from_listing<I>(name: &str, listing: I) -> Result<OutputBom, BomError>
    where
        I: IntoIterator<Item = (Ident, Quantity)>,
    {
        let mut bom =
            OutputBom::new(Descriptor::new(name).with_source(name)).with_wire_slack(WireSlack::none());
        for (ident, quantity) in listing {
            bom.insert_quantity(ident, quantity)?;
        }
        Ok(bom)
    }

    fn insert_quantity(&mut self, ident: Ident, quantity: Quantity) -> Result<(), BomError> {
        if !quantity.is_positive() {
            return Ok(());
        }
        if ident.is_wire() {
            let length = quantity.check_kind(QuantityKind::Length)?;
            let piece = Ident::new(ident.device(), ident.value(), Some(length.to_string()));
            self.insert_unplaced(piece, 1);
            return Ok(());
        }
        let count = quantity.check_kind(QuantityKind::Count)?;
        let n = count
            .value()
            .to_u32()
            .filter(|_| count.value().fract().is_zero())
            .ok_or_else(|| BomError::InvalidQuantity {
                ident: ident.to_string(),
                value: count.to_string(),
                source: ParseError::InvalidNumber(count.to_string()),
            })?;
        self.insert_unplaced(ident, n);
        Ok(())
    }
}

impl CompositeOutputBom {
    /// Read a composite BOM as written by [`CompositeOutputBom::dump`].
    ///
    /// Rows before the `device` header are ignored, as are rows with an empty first cell;
    /// reading stops at a row starting with `END`. Configuration columns are the header
    /// cells between `device` and the trailing total. A `" xN"` suffix on a column title is
    /// dropped and the column's quantities are taken as they stand.
    pub fn from_csv<R: std::io::Read>(reader: R, name: &str) -> WithDiagnostics<CompositeOutputBom> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let mut result = WithDiagnostics::default();
        let mut records = reader.records();

        let mut header = None;
        for record in records.by_ref() {
            match record {
                Ok(record) if record.get(0).map(str::trim) == Some(HEADER) => {
                    header = Some(record);
                    break;
                }
                Ok(_) => {}
                Err(e) => return BomError::from(e).into(),
            }
        }
        let Some(header) = header else {
            return BomError::MissingHeader.into();
        };
        let titles: Vec<String> = header
            .iter()
            .skip(1)
            .take(header.len().saturating_sub(2))
            .map(|t| MULTIPLIER_SUFFIX.replace(t.trim(), "").into_owned())
            .collect();

        let mut boms: Vec<OutputBom> = titles
            .iter()
            .map(|t| {
                log::info!("Creating BOM: {t}");
                OutputBom::new(Descriptor::new(t.as_str()).with_source(name))
                    .with_wire_slack(WireSlack::none())
            })
            .collect();

        for record in records {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    result.push(BomError::from(e).into());
                    break;
                }
            };
            let line = record.get(0).unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if line == END {
                break;
            }
            if let Err(e) = insert_row(&mut boms, line, &record) {
                result.push(Diagnostic::from(e).with_subject(line));
            }
        }

        match CompositeOutputBom::new(name, &boms) {
            Ok(cobom) => result.output = Some(cobom),
            Err(e) => result.push(e.into()),
        }
        result
    }
}

fn insert_row(boms: &mut [OutputBom], line: &str, record: &csv::StringRecord) -> Result<(), BomError> {
    let ident = Ident::parse_generic(line)?;
    let kind = if ident.is_wire() {
        QuantityKind::Length
    } else {
        QuantityKind::Count
    };
    for (bom, cell) in boms.iter_mut().zip(record.iter().skip(1)) {
        let cell = cell.trim();
        if cell.is_empty() {
            continue;
        }
        let quantity = Quantity::parse(kind, cell).map_err(|source| BomError::InvalidQuantity {
            ident: ident.to_string(),
            value: cell.to_string(),
            source,
        })?;
        log::debug!("Inserting {quantity} of {ident} into {}", bom.descriptor.config_name);
        bom.insert_quantity(ident.clone(), quantity)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::FindingKind;

    const COBOM: &str = "\
Composite BOM,,,
device,basic x1,full x2,Total
RES SMD 10K 0402,2,6,8
CAP CER SMD 100nF 0402,,4,4
,,,
WIRE INSULATED 16AWG RED,33cm,1.1m,1.43m
END,,,
RES SMD 1K 0402,1,1,2
";

    #[test]
    fn load_composite() {
        let (cobom, diagnostics) = CompositeOutputBom::from_csv(COBOM.as_bytes(), "ext").unpack();
        assert!(diagnostics.is_empty(), "{diagnostics}");
        let cobom = cobom.unwrap();

        assert_eq!(cobom.col_title(0), Some("basic"));
        assert_eq!(cobom.col_title(1), Some("full"));
        assert_eq!(cobom.len(), 4);
        assert!(cobom
            .find_by_ident(&Ident::parse("RES SMD 1K 0402").unwrap())
            .is_none());

        let res = cobom
            .find_by_ident(&Ident::parse("RES SMD 10K 0402").unwrap())
            .unwrap();
        assert_eq!(res.columns(), &[Quantity::count(2), Quantity::count(6)]);

        let mut cobom = cobom;
        cobom.collapse_wires().unwrap();
        let wire = cobom
            .find_by_ident(&Ident::parse_generic("WIRE INSULATED 16AWG RED").unwrap())
            .unwrap();
        let mm = |s: &str| Quantity::parse(QuantityKind::Length, s).unwrap();
        assert_eq!(wire.columns(), &[mm("330mm"), mm("1100mm")]);
    }

    #[test]
    fn missing_header() {
        let result = CompositeOutputBom::from_csv("a,b\n1,2\n".as_bytes(), "ext");
        assert!(result.output.is_none());
        assert!(matches!(
            result.diagnostics.errors().first().map(|d| d.kind),
            Some(FindingKind::Parse)
        ));
    }

    #[test]
    fn bad_rows_are_reported() {
        let csv = "device,A,Total\nRES SMD 10K 0402,two,2\nFOO 1 2,1,1\nRES SMD 1K 0402,1,1\n";
        let result = CompositeOutputBom::from_csv(csv.as_bytes(), "ext");
        assert_eq!(result.diagnostics.errors().len(), 2);
        assert_eq!(result.output.unwrap().len(), 1);
    }

    #[test]
    fn listing() {
        let bom = OutputBom::from_listing(
            "spares",
            [
                (Ident::parse("RES SMD 10K 0402").unwrap(), Quantity::count(3)),
                (Ident::parse("RES SMD 1K 0402").unwrap(), Quantity::count(0)),
                (
                    Ident::parse_generic("WIRE INSULATED 16AWG RED").unwrap(),
                    Quantity::parse(QuantityKind::Length, "2m").unwrap(),
                ),
            ],
        )
        .unwrap();
        assert_eq!(bom.len(), 2);
        let wire = bom
            .find_by_ident(&Ident::parse("WIRE INSULATED 16AWG RED 2m").unwrap())
            .unwrap();
        assert_eq!(
            bom.line_quantity(wire).unwrap(),
            Quantity::parse(QuantityKind::Length, "2m").unwrap()
        );
        assert!(OutputBom::from_listing(
            "bad",
            [(Ident::parse("RES SMD 10K 0402").unwrap(), Quantity::count(rust_decimal_macros::dec!(1.5)))]
        )
        .is_err());
    }
}
