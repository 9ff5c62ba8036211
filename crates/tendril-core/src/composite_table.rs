use std::io::{self, Write};

use comfy_table::{Cell, CellAlignment, Color, Table};

use crate::bom::CompositeOutputBom;
use crate::guideline::QtyGuideline;
use crate::inventory::{Allocation, Shortage};

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(comfy_table::ContentArrangement::DynamicFullWidth);
    table
}

fn number(text: impl Into<String>) -> Cell {
    Cell::new(text.into()).set_alignment(CellAlignment::Right)
}

impl CompositeOutputBom {
    /// Write the composite BOM as a formatted table: one column per configuration and
    /// the line total. Wire lines are highlighted.
    pub fn write_table<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let mut table = new_table();
        let mut header = vec![Cell::new("Ident")];
        header.extend(self.descriptors().iter().map(|d| Cell::new(d.earmark())));
        header.push(Cell::new("Total"));
        table.set_header(header);

        for line in self.lines() {
            let ident = if line.ident.is_wire() {
                Cell::new(line.ident.to_string()).fg(Color::Cyan)
            } else {
                Cell::new(line.ident.to_string())
            };
            let mut row = vec![ident];
            row.extend(line.columns().iter().map(|q| {
                if q.is_zero() {
                    number("")
                } else {
                    number(q.to_string())
                }
            }));
            let total = line
                .quantity()
                .map(|q| q.to_string())
                .unwrap_or_else(|e| e.to_string());
            row.push(number(total));
            table.add_row(row);
        }

        writeln!(writer, "{table}")?;
        Ok(())
    }
}

/// Write shortages, and any deferred lines, with the order quantity computed for each.
pub fn write_order_table<W: Write>(
    mut writer: W,
    allocation: &Allocation,
    order: impl Fn(&Shortage) -> Result<String, String>,
) -> io::Result<()> {
    let mut table = new_table();
    table.set_header(vec!["Ident", "Required", "Shortage", "Order"]);
    for shortage in &allocation.shortages {
        let order = match order(shortage) {
            Ok(quantity) => number(quantity),
            Err(e) => Cell::new(e).fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(shortage.ident.to_string()),
            number(shortage.required.to_string()),
            number(shortage.shortage.to_string()),
            order,
        ]);
    }
    for deferred in &allocation.deferred {
        table.add_row(vec![
            Cell::new(deferred.ident.to_string()).fg(Color::DarkGrey),
            number(deferred.required.to_string()),
            number(deferred.shortage.to_string()),
            Cell::new("deferred").fg(Color::DarkGrey),
        ]);
    }
    writeln!(writer, "{table}")?;
    Ok(())
}

/// Write resolved guidelines, one row per scope.
pub fn write_guideline_table<W: Write>(mut writer: W, rows: &[QtyGuideline]) -> io::Result<()> {
    let mut table = new_table();
    table.set_header(vec![
        "Scope",
        "Min",
        "Multiple",
        "Baseline",
        "Excess %",
        "Excess min",
        "Excess max",
        "Std only",
    ]);
    for row in rows {
        table.add_row(vec![
            Cell::new(row.scope.to_string()),
            number(row.oqty_min.to_string()),
            number(row.oqty_multiple.to_string()),
            number(row.baseline_qty.to_string()),
            number(format!("{} %", row.excess_min_pc)),
            number(row.excess_min_qty.to_string()),
            number(
                row.excess_max_qty
                    .map(|q| q.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(if row.filter_std_vals_only { "yes" } else { "" }),
        ]);
    }
    writeln!(writer, "{table}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bom::{Descriptor, OutputBom};
    use crate::device::Ident;

    #[test]
    fn composite_table_lists_every_line() {
        let mut a = OutputBom::new(Descriptor::new("A"));
        a.insert_item(Ident::parse("RES SMD 10K 0402").unwrap(), "R1".parse().unwrap())
            .unwrap();
        let mut b = OutputBom::new(Descriptor::new("B").with_multiplier(3));
        b.insert_item(Ident::parse("CAP CER SMD 1nF 0402").unwrap(), "C1".parse().unwrap())
            .unwrap();
        let cobom = CompositeOutputBom::new("x", &[a, b]).unwrap();

        let mut out = Vec::new();
        cobom.write_table(&mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        for text in ["Ident", "A x1", "B x3", "Total", "RES SMD 10K 0402", "CAP CER SMD 1nF 0402"] {
            assert!(out.contains(text), "missing {text} in\n{out}");
        }
    }
}
