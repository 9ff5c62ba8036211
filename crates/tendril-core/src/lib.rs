//! Component value resolution and BOM aggregation for electronics manufacturing.
//!
//! Values flow bottom-up:
//!
//! * [`quantity::Quantity`] is an exact physical value with a unit kind.
//! * [`series`] enumerates preferred-value series (E3 to E24, or custom part lists).
//! * [`motif`] solves parametric circuit blocks against a [`catalog::ComponentCatalog`],
//!   writing the chosen values into a [`component::ComponentList`].
//! * [`bom`] turns component lists into per-configuration BOMs and merges them into a
//!   [`bom::CompositeOutputBom`].
//! * [`inventory`] reserves stock against a composite BOM, and [`guideline`] rounds the
//!   remaining shortage into order quantities.
//!
//! Loaders and aggregation report problems as [`Diagnostic`]s collected in a
//! [`WithDiagnostics`] instead of stopping at the first bad row.

pub mod bom;
pub mod catalog;
pub mod component;
#[cfg(feature = "table")]
pub mod composite_table;
pub mod config;
pub mod device;
pub mod diagnostics;
pub mod guideline;
pub mod inventory;
pub mod motif;
pub mod quantity;
pub mod refdes;
pub mod series;

pub use diagnostics::{Diagnostic, Diagnostics, FindingKind, Severity, WithDiagnostics};
pub use quantity::{Quantity, QuantityKind};
