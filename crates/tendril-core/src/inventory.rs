//! Stock on hand across inventory locations, and reservations against it.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::bom::{BomError, CompositeLine, CompositeOutputBom};
use crate::device::{Ident, IdentError};
use crate::diagnostics::{Diagnostic, Diagnostics, FindingKind, WithDiagnostics};
use crate::quantity::{ParseError, Quantity, QuantityError, QuantityKind};

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Insufficient stock of {ident}: requested {requested}, available {available}")]
    InsufficientStock {
        ident: String,
        requested: Quantity,
        available: Quantity,
    },
    #[error("Cannot reserve {quantity} of {ident}")]
    NonPositive { ident: String, quantity: Quantity },
    #[error("Invalid stock quantity '{value}' for {ident}: {source}")]
    InvalidQuantity {
        ident: String,
        value: String,
        source: ParseError,
    },
    #[error(transparent)]
    Ident(#[from] IdentError),
    #[error(transparent)]
    Bom(#[from] BomError),
    #[error(transparent)]
    Arithmetic(#[from] QuantityError),
    #[error("Failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InventoryError {
    pub fn finding_kind(&self) -> FindingKind {
        match self {
            InventoryError::InsufficientStock { .. } => FindingKind::InsufficientStock,
            InventoryError::NonPositive { .. } => FindingKind::Validation,
            InventoryError::Arithmetic(e) => e.finding_kind(),
            InventoryError::Ident(e) => e.finding_kind(),
            InventoryError::Bom(e) => e.finding_kind(),
            InventoryError::Io(_) => FindingKind::Config,
            _ => FindingKind::Parse,
        }
    }
}

/// Stock held for one earmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    pub quantity: Quantity,
    pub earmark: String,
}

#[derive(Debug, Clone, Serialize)]
struct StockEntry {
    ident: Ident,
    on_hand: Quantity,
    reservations: Vec<Reservation>,
}

impl StockEntry {
    fn reserved(&self) -> Result<Quantity, QuantityError> {
        Quantity::sum(
            self.on_hand.kind(),
            self.reservations.iter().map(|r| r.quantity),
        )
    }

    fn available(&self) -> Result<Quantity, QuantityError> {
        let available = (self.on_hand - self.reserved()?)?;
        Ok(if available.is_positive() {
            available
        } else {
            Quantity::zero(available.kind())
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct Location {
    name: String,
    stock: BTreeMap<String, StockEntry>,
}

/// Line that could not be covered from stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shortage {
    pub ident: Ident,
    /// Total required across all configurations.
    pub required: Quantity,
    pub shortage: Quantity,
}

/// Result of a prioritized allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Allocation {
    /// Lines to order now.
    pub shortages: Vec<Shortage>,
    /// Lines whose immediate configurations are covered; the rest can be ordered later.
    pub deferred: Vec<Shortage>,
}

/// Stock on hand per location, in declaration order, with the reservations held against
/// it. Availability never goes negative.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReservationLedger {
    locations: Vec<Location>,
}

fn kind_for(ident: &Ident) -> QuantityKind {
    if ident.is_wire() {
        QuantityKind::Length
    } else {
        QuantityKind::Count
    }
}

impl ReservationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the locations, in the order they are drawn from.
    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.locations.iter().map(|l| l.name.as_str())
    }

    pub fn add_location(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.location_mut(&name).is_none() {
            self.locations.push(Location {
                name,
                stock: BTreeMap::new(),
            });
        }
    }

    fn location_mut(&mut self, name: &str) -> Option<&mut Location> {
        self.locations.iter_mut().find(|l| l.name == name)
    }

    /// Add `quantity` of `ident` to the stock held at `location`.
    pub fn add_stock(
        &mut self,
        location: &str,
        ident: Ident,
        quantity: Quantity,
    ) -> Result<(), InventoryError> {
        let quantity = quantity.check_kind(kind_for(&ident))?;
        self.add_location(location);
        let Some(location) = self.location_mut(location) else {
            return Ok(());
        };
        match location.stock.get_mut(&ident.to_string()) {
            Some(entry) => entry.on_hand = (entry.on_hand + quantity)?,
            None => {
                location.stock.insert(
                    ident.to_string(),
                    StockEntry {
                        ident,
                        on_hand: quantity,
                        reservations: Vec::new(),
                    },
                );
            }
        }
        Ok(())
    }

    /// Load a stock listing with columns `ident, qty` into `location`. Wire quantities
    /// without a unit are metres. Bad rows are reported and skipped.
    pub fn load_csv<R: Read>(&mut self, location: &str, reader: R) -> Diagnostics {
        let mut diagnostics = Diagnostics::default();
        self.add_location(location);
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let mut rows = 0;
        for record in reader.records() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    diagnostics.push(Diagnostic::from(InventoryError::from(e)).with_subject(location));
                    break;
                }
            };
            let ident = record.get(0).unwrap_or("").trim();
            if ident.is_empty() {
                continue;
            }
            let qty = record.get(1).unwrap_or("").trim();
            match parse_stock_row(ident, qty)
                .and_then(|(ident, qty)| self.add_stock(location, ident, qty))
            {
                Ok(()) => rows += 1,
                Err(e) => diagnostics.push(Diagnostic::from(e).with_subject(ident)),
            }
        }
        log::info!("Acquired inventory location {location}: {rows} lines");
        diagnostics
    }

    /// Ledger with a single location loaded from CSV.
    pub fn from_csv<R: Read>(location: &str, reader: R) -> WithDiagnostics<ReservationLedger> {
        let mut ledger = ReservationLedger::new();
        let diagnostics = ledger.load_csv(location, reader);
        WithDiagnostics::new(ledger, diagnostics)
    }

    fn entries<'a>(&'a self, ident: &'a Ident) -> impl Iterator<Item = &'a StockEntry> + 'a {
        let key = ident.to_string();
        self.locations
            .iter()
            .filter_map(move |l| l.stock.get(&key))
    }

    fn total(
        &self,
        ident: &Ident,
        f: impl Fn(&StockEntry) -> Result<Quantity, QuantityError>,
    ) -> Result<Quantity, InventoryError> {
        let mut total = Quantity::zero(kind_for(ident));
        for entry in self.entries(ident) {
            total = (total + f(entry)?)?;
        }
        Ok(total)
    }

    pub fn on_hand(&self, ident: &Ident) -> Result<Quantity, InventoryError> {
        self.total(ident, |e| Ok(e.on_hand))
    }

    pub fn reserved(&self, ident: &Ident) -> Result<Quantity, InventoryError> {
        self.total(ident, StockEntry::reserved)
    }

    /// Unreserved stock across all locations.
    pub fn availability(&self, ident: &Ident) -> Result<Quantity, InventoryError> {
        self.total(ident, StockEntry::available)
    }

    /// Reserve `quantity` of `ident` for `earmark`, drawing from locations in order.
    /// Fails without reserving anything if total availability falls short.
    pub fn reserve(
        &mut self,
        ident: &Ident,
        quantity: Quantity,
        earmark: &str,
    ) -> Result<(), InventoryError> {
        if !quantity.is_positive() {
            return Err(InventoryError::NonPositive {
                ident: ident.to_string(),
                quantity,
            });
        }
        let quantity = quantity.check_kind(kind_for(ident))?;
        let available = self.availability(ident)?;
        if quantity > available {
            log::warn!(
                "Reservation of {quantity} of {ident} for {earmark} rejected: short by {}",
                (quantity - available)?
            );
            return Err(InventoryError::InsufficientStock {
                ident: ident.to_string(),
                requested: quantity,
                available,
            });
        }

        let key = ident.to_string();
        let mut remaining = quantity;
        for location in &mut self.locations {
            let Some(entry) = location.stock.get_mut(&key) else {
                continue;
            };
            let take = remaining.min(entry.available()?);
            if take.is_positive() {
                log::debug!("Reserving {take} of {ident} at {} for {earmark}", location.name);
                entry.reservations.push(Reservation {
                    quantity: take,
                    earmark: earmark.to_string(),
                });
                remaining = (remaining - take)?;
            }
            if remaining.is_zero() {
                break;
            }
        }
        log::info!("Reserved {quantity} of {ident} for {earmark}");
        Ok(())
    }

    /// Reserve as much of `quantity` as is available. Returns the part left uncovered.
    pub fn reserve_available(
        &mut self,
        ident: &Ident,
        quantity: Quantity,
        earmark: &str,
    ) -> Result<Quantity, InventoryError> {
        let available = self.availability(ident)?;
        let take = quantity.min(available);
        if take.is_positive() {
            self.reserve(ident, take, earmark)?;
        }
        Ok((quantity - take)?)
    }

    /// Earmarks across all locations, in first-reserved order.
    pub fn earmarks(&self) -> Vec<String> {
        let mut earmarks: Vec<String> = Vec::new();
        let all = self
            .locations
            .iter()
            .flat_map(|l| l.stock.values())
            .flat_map(|e| e.reservations.iter());
        for reservation in all {
            if !earmarks.contains(&reservation.earmark) {
                earmarks.push(reservation.earmark.clone());
            }
        }
        earmarks
    }

    /// Write one `reserve-{location}.csv` per location into `dir`, with a column per
    /// earmark, the location's total reservation and the stock remaining overall.
    pub fn export_reservations(&self, dir: &Path) -> Result<Vec<PathBuf>, InventoryError> {
        let earmarks = self.earmarks();
        let mut written = Vec::new();
        for location in &self.locations {
            let path = dir.join(format!("reserve-{}.csv", location.name));
            let file = std::fs::File::create(&path)?;
            self.write_reservations(location, &earmarks, file)?;
            log::info!("Exported {} reservations to {}", location.name, path.display());
            written.push(path);
        }
        Ok(written)
    }

    fn write_reservations<W: Write>(
        &self,
        location: &Location,
        earmarks: &[String],
        writer: W,
    ) -> Result<(), InventoryError> {
        let mut writer = csv::Writer::from_writer(writer);
        let mut header = vec!["Ident".to_string()];
        header.extend(earmarks.iter().cloned());
        header.extend(["Total".to_string(), "Remaining".to_string()]);
        writer.write_record(&header)?;

        for entry in location.stock.values() {
            let total = entry.reserved()?;
            if !total.is_positive() {
                continue;
            }
            let mut row = vec![entry.ident.to_string()];
            for earmark in earmarks {
                let held = Quantity::sum(
                    total.kind(),
                    entry
                        .reservations
                        .iter()
                        .filter(|r| &r.earmark == earmark)
                        .map(|r| r.quantity),
                )?;
                row.push(if held.is_zero() {
                    String::new()
                } else {
                    held.to_string()
                });
            }
            row.push(total.to_string());
            row.push(self.availability(&entry.ident)?.to_string());
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn parse_stock_row(ident: &str, qty: &str) -> Result<(Ident, Quantity), InventoryError> {
    let ident = Ident::parse_generic(ident)?;
    let invalid = |source| InventoryError::InvalidQuantity {
        ident: ident.to_string(),
        value: qty.to_string(),
        source,
    };
    let quantity = if ident.is_wire() {
        match qty.parse::<Decimal>() {
            Ok(metres) => Quantity::new(QuantityKind::Length, metres * dec!(1000)),
            Err(_) => Quantity::parse(QuantityKind::Length, qty).map_err(invalid)?,
        }
    } else {
        Quantity::parse(QuantityKind::Count, qty).map_err(invalid)?
    };
    Ok((ident, quantity))
}

/// Reserve the columns at `order` of `line`. Returns the quantity that could not be
/// covered.
fn reserve_columns(
    ledger: &mut ReservationLedger,
    cobom: &CompositeOutputBom,
    line: &CompositeLine,
    order: &[usize],
) -> Result<Quantity, InventoryError> {
    let mut shortage = Quantity::zero(kind_for(&line.ident));
    for &idx in order {
        let (Some(&column), Some(descriptor)) =
            (line.columns().get(idx), cobom.descriptors().get(idx))
        else {
            continue;
        };
        if column.is_zero() {
            continue;
        }
        let short = ledger.reserve_available(&line.ident, column, &descriptor.earmark())?;
        if short.is_positive() {
            log::debug!(
                "{} for {}: adding {short} to shortage",
                line.ident,
                descriptor.earmark()
            );
        }
        shortage = (shortage + short)?;
    }
    Ok(shortage)
}

fn shortage_warning(line: &CompositeLine, short: Quantity) -> Diagnostic {
    Diagnostic::warning(FindingKind::InsufficientStock, format!("short by {short}"))
        .with_subject(line.ident.to_string())
}

/// Reserve stock for every line of `cobom`, column by column in descriptor order, and
/// report what remains to be ordered.
pub fn allocate(
    cobom: &CompositeOutputBom,
    ledger: &mut ReservationLedger,
) -> WithDiagnostics<Vec<Shortage>> {
    allocate_prioritized::<&str>(cobom, ledger, &[]).map(|a| a.shortages)
}

/// Like [`allocate`], but the configurations named in `immediate` come first. A line
/// whose availability covers the immediate configurations is not ordered now; what it
/// still lacks is reported as deferred.
pub fn allocate_prioritized<S: AsRef<str>>(
    cobom: &CompositeOutputBom,
    ledger: &mut ReservationLedger,
    immediate: &[S],
) -> WithDiagnostics<Allocation> {
    let first = cobom.subset_indices(immediate);
    let order: Vec<usize> = first
        .iter()
        .copied()
        .chain((0..cobom.descriptors().len()).filter(|i| !first.contains(i)))
        .collect();

    let mut diagnostics = Diagnostics::default();
    let mut allocation = Allocation::default();
    for line in cobom.lines() {
        match allocate_line(ledger, cobom, line, &first, &order) {
            Ok(None) => {}
            Ok(Some((covered, shortage))) if covered && !first.is_empty() => {
                log::debug!("{}: deferring {}", line.ident, shortage.shortage);
                allocation.deferred.push(shortage);
            }
            Ok(Some((_, shortage))) => {
                diagnostics.push(shortage_warning(line, shortage.shortage));
                allocation.shortages.push(shortage);
            }
            Err(e) => diagnostics.push(Diagnostic::from(e).with_subject(line.ident.to_string())),
        }
    }
    WithDiagnostics::new(allocation, diagnostics)
}

/// Reserve one line. Returns the shortage, if any, and whether availability before
/// reserving covered the columns at `first`.
fn allocate_line(
    ledger: &mut ReservationLedger,
    cobom: &CompositeOutputBom,
    line: &CompositeLine,
    first: &[usize],
    order: &[usize],
) -> Result<Option<(bool, Shortage)>, InventoryError> {
    let available = ledger.availability(&line.ident)?;
    let covered = available >= line.subset_quantity(first)?;
    let required = line.quantity()?;
    let short = reserve_columns(ledger, cobom, line, order)?;
    if !short.is_positive() {
        return Ok(None);
    }
    Ok(Some((
        covered,
        Shortage {
            ident: line.ident.clone(),
            required,
            shortage: short,
        },
    )))
}
