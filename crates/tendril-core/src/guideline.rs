//! Order quantity guidelines: rounding a raw shortage into a quantity that is sensible to
//! order, with minimums, pack multiples and an excess allowance.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::device::{DeviceClass, Ident};
use crate::diagnostics::{Diagnostic, FindingKind, Severity, WithDiagnostics};
use crate::quantity::{ParseError, Quantity, QuantityError, QuantityKind};

#[derive(Debug, thiserror::Error)]
pub enum GuidelineError {
    #[error("Failed to read guideline file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Guideline validation error: {0}")]
    Validation(String),
    #[error("Invalid {key} '{value}' in guideline {scope}: {source}")]
    InvalidQuantity {
        scope: String,
        key: &'static str,
        value: String,
        source: ParseError,
    },
    #[error(
        "Order quantity {order_quantity} of {ident} exceeds {quantity} by more than {excess_max}"
    )]
    ExcessOverrun {
        ident: String,
        quantity: Quantity,
        order_quantity: Quantity,
        excess_max: Quantity,
    },
    #[error(transparent)]
    Arithmetic(#[from] QuantityError),
}

impl GuidelineError {
    pub fn finding_kind(&self) -> FindingKind {
        match self {
            GuidelineError::ExcessOverrun { .. } => FindingKind::ExcessOverrun,
            GuidelineError::Arithmetic(e) => e.finding_kind(),
            GuidelineError::InvalidQuantity { .. } => FindingKind::Parse,
            _ => FindingKind::Config,
        }
    }
}

/// What to do when rounding up orders more excess than a guideline allows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverrunPolicy {
    #[default]
    Fail,
    Warn,
}

/// How a shortage is turned into an order quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderOptions {
    pub overrun: OverrunPolicy,
    /// Apply the excess allowance and check the excess maximum.
    pub excess: bool,
    /// Order the guideline baseline quantity on top of the shortage.
    pub baseline: bool,
}

impl Default for OrderOptions {
    fn default() -> Self {
        Self {
            overrun: OverrunPolicy::Fail,
            excess: true,
            baseline: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
enum RawQty {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawQty {
    /// Bare wire quantities are metres.
    fn quantity(&self, kind: QuantityKind) -> Result<Quantity, ParseError> {
        let number = match self {
            RawQty::Int(n) => Decimal::from(*n),
            RawQty::Float(f) => {
                Decimal::try_from(*f).map_err(|_| ParseError::InvalidNumber(f.to_string()))?
            }
            RawQty::Text(s) => {
                return match s.trim().parse::<Decimal>() {
                    Ok(n) => Ok(bare(kind, n)),
                    Err(_) => Quantity::parse(kind, s),
                }
            }
        };
        Ok(bare(kind, number))
    }

    fn decimal(&self) -> Result<Decimal, ParseError> {
        match self {
            RawQty::Int(n) => Ok(Decimal::from(*n)),
            RawQty::Float(f) => {
                Decimal::try_from(*f).map_err(|_| ParseError::InvalidNumber(f.to_string()))
            }
            RawQty::Text(s) => s
                .trim()
                .trim_end_matches('%')
                .trim()
                .parse()
                .map_err(|_| ParseError::InvalidNumber(s.clone())),
        }
    }
}

fn bare(kind: QuantityKind, n: Decimal) -> Quantity {
    match kind {
        QuantityKind::Length => Quantity::new(kind, n * dec!(1000)),
        _ => Quantity::new(kind, n),
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct RawGuideline {
    oqty_min: Option<RawQty>,
    oqty_multiple: Option<RawQty>,
    baseline_qty: Option<RawQty>,
    excess_min_pc: Option<RawQty>,
    excess_min_qty: Option<RawQty>,
    excess_max_qty: Option<RawQty>,
    #[serde(default)]
    filter_std_vals_only: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct GuidelineFile {
    #[serde(default)]
    idents: BTreeMap<String, RawGuideline>,
    #[serde(default)]
    devices: BTreeMap<String, RawGuideline>,
    default: Option<RawGuideline>,
}

/// Where a guideline was defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GuidelineScope {
    Ident(String),
    Device(DeviceClass),
    Default,
}

impl std::fmt::Display for GuidelineScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuidelineScope::Ident(ident) => f.write_str(ident),
            GuidelineScope::Device(device) => write!(f, "{device}"),
            GuidelineScope::Default => f.write_str("Default"),
        }
    }
}

/// A fully resolved guideline, with defaults filled in and quantities in the unit of the
/// device they apply to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QtyGuideline {
    pub scope: GuidelineScope,
    pub oqty_min: Quantity,
    pub oqty_multiple: Quantity,
    pub baseline_qty: Quantity,
    pub excess_min_pc: Decimal,
    pub excess_min_qty: Quantity,
    /// Largest acceptable excess; `None` when unbounded.
    pub excess_max_qty: Option<Quantity>,
    pub filter_std_vals_only: bool,
}

impl QtyGuideline {
    fn resolve(
        scope: GuidelineScope,
        raw: &RawGuideline,
        kind: QuantityKind,
    ) -> Result<Self, GuidelineError> {
        let qty = |key: &'static str, value: &Option<RawQty>, default: i64| {
            let parsed = match value {
                Some(raw) => raw.quantity(kind),
                None => Ok(Quantity::new(kind, Decimal::from(default))),
            };
            parsed.map_err(|source| GuidelineError::InvalidQuantity {
                scope: scope.to_string(),
                key,
                value: format!("{value:?}"),
                source,
            })
        };
        let oqty_min = qty("oqty_min", &raw.oqty_min, 1)?;
        let oqty_multiple = qty("oqty_multiple", &raw.oqty_multiple, 1)?;
        let baseline_qty = qty("baseline_qty", &raw.baseline_qty, 0)?;
        let excess_min_qty = qty("excess_min_qty", &raw.excess_min_qty, 0)?;
        let excess_max_qty = qty("excess_max_qty", &raw.excess_max_qty, -1)?;
        let excess_min_pc = match &raw.excess_min_pc {
            Some(pc) => pc
                .decimal()
                .map_err(|source| GuidelineError::InvalidQuantity {
                    scope: scope.to_string(),
                    key: "excess_min_pc",
                    value: format!("{pc:?}"),
                    source,
                })?,
            None => Decimal::ZERO,
        };

        if !oqty_multiple.is_positive() {
            return Err(GuidelineError::Validation(format!(
                "{scope}: oqty_multiple must be positive, got {oqty_multiple}"
            )));
        }
        Ok(Self {
            scope,
            oqty_min,
            oqty_multiple,
            baseline_qty,
            excess_min_pc,
            excess_min_qty,
            excess_max_qty: excess_max_qty.is_positive().then_some(excess_max_qty),
            filter_std_vals_only: raw.filter_std_vals_only,
        })
    }

    /// Round `quantity` up to an order quantity: at least `oqty_min`, then in steps of
    /// `oqty_multiple` until the target is exceeded. With `excess` the target carries the
    /// larger of the percentage and absolute excess allowances.
    pub fn compliant_quantity(
        &self,
        quantity: Quantity,
        excess: bool,
    ) -> Result<Quantity, QuantityError> {
        let quantity = quantity.check_kind(self.oqty_min.kind())?;
        let target = if excess {
            let with_pc = quantity * (Decimal::ONE + self.excess_min_pc / dec!(100));
            let with_qty = (quantity + self.excess_min_qty)?;
            with_pc.max(with_qty)
        } else {
            quantity
        };

        if target <= self.oqty_min {
            return Ok(self.oqty_min);
        }
        let mut order = self.oqty_min;
        while order <= target {
            order = (order + self.oqty_multiple)?;
        }
        Ok(order)
    }

    /// Order quantity for a shortage of `quantity` of `ident`. An excess beyond
    /// `excess_max_qty` is an [`GuidelineError::ExcessOverrun`] carrying the rounded
    /// quantity.
    pub fn order_quantity(
        &self,
        ident: &Ident,
        quantity: Quantity,
        options: &OrderOptions,
    ) -> Result<Quantity, GuidelineError> {
        let quantity = quantity.check_kind(self.oqty_min.kind())?;
        let required = if options.baseline {
            (quantity + self.baseline_qty)?
        } else {
            quantity
        };
        let order_quantity = self.compliant_quantity(required, options.excess)?;
        if !options.excess {
            return Ok(order_quantity);
        }
        if let Some(excess_max) = self.excess_max_qty {
            if (order_quantity - required)? > excess_max {
                return Err(GuidelineError::ExcessOverrun {
                    ident: ident.to_string(),
                    quantity: required,
                    order_quantity,
                    excess_max,
                });
            }
        }
        Ok(order_quantity)
    }

    /// The rounding rules of this guideline, as a finding to hang under an order problem.
    pub fn advice(&self) -> Diagnostic {
        let excess_max = match self.excess_max_qty {
            Some(max) => max.to_string(),
            None => "unbounded".to_string(),
        };
        Diagnostic::new(
            FindingKind::ExcessOverrun,
            Severity::Advice,
            format!(
                "guideline {}: minimum {}, multiple {}, excess up to {excess_max}",
                self.scope, self.oqty_min, self.oqty_multiple
            ),
        )
    }
}

/// Guidelines keyed by exact ident and by device class, with a catch-all default.
#[derive(Debug, Clone, Default)]
pub struct QtyGuidelines {
    idents: BTreeMap<String, RawGuideline>,
    devices: BTreeMap<DeviceClass, RawGuideline>,
    default: Option<RawGuideline>,
}

fn kind_for(device: DeviceClass) -> QuantityKind {
    if device.is_wire() {
        QuantityKind::Length
    } else {
        QuantityKind::Count
    }
}

impl QtyGuidelines {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, GuidelineError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a guideline document with `idents`, `devices` and `default` sections. Other
    /// top level keys are ignored.
    pub fn from_yaml(content: &str) -> Result<Self, GuidelineError> {
        let file: GuidelineFile = serde_yaml::from_str(content)?;
        let mut devices = BTreeMap::new();
        for (name, raw) in file.devices {
            let device: DeviceClass = name.parse().map_err(|_| {
                GuidelineError::Validation(format!("Unknown device class '{name}'"))
            })?;
            devices.insert(device, raw);
        }
        let guidelines = Self {
            idents: file.idents,
            devices,
            default: file.default,
        };
        guidelines.validate()?;
        Ok(guidelines)
    }

    fn validate(&self) -> Result<(), GuidelineError> {
        self.guideline_table().map(|_| ())
    }

    fn lookup(&self, ident: &Ident) -> Option<(GuidelineScope, &RawGuideline)> {
        let key = ident.to_string();
        let found = if let Some(raw) = self.idents.get(&key) {
            Some((GuidelineScope::Ident(key), raw))
        } else if let Some(raw) = self.devices.get(&ident.device()) {
            Some((GuidelineScope::Device(ident.device()), raw))
        } else {
            self.default.as_ref().map(|raw| (GuidelineScope::Default, raw))
        };
        match found {
            Some((_, raw)) if raw.filter_std_vals_only && !ident.is_standard_value() => {
                log::debug!("{ident} is not a standard value, using the default guideline");
                self.default.as_ref().map(|raw| (GuidelineScope::Default, raw))
            }
            found => found,
        }
    }

    /// The guideline that applies to `ident`: exact ident, then device class, then the
    /// default. `None` when nothing applies.
    pub fn guideline(&self, ident: &Ident) -> Result<Option<QtyGuideline>, GuidelineError> {
        self.lookup(ident)
            .map(|(scope, raw)| QtyGuideline::resolve(scope, raw, kind_for(ident.device())))
            .transpose()
    }

    /// Order quantity for `quantity` of `ident`. Without an applicable guideline the
    /// quantity is returned unchanged. An overrun of the excess maximum is an error, or a
    /// warning alongside the rounded quantity under [`OverrunPolicy::Warn`].
    pub fn compliant_quantity(
        &self,
        ident: &Ident,
        quantity: Quantity,
        options: &OrderOptions,
    ) -> WithDiagnostics<Quantity> {
        let guideline = match self.guideline(ident) {
            Ok(Some(guideline)) => guideline,
            Ok(None) => return WithDiagnostics::success(quantity),
            Err(e) => return Diagnostic::from(e).with_subject(ident.to_string()).into(),
        };
        let err = match guideline.order_quantity(ident, quantity, options) {
            Ok(order_quantity) => return WithDiagnostics::success(order_quantity),
            Err(err) => err,
        };
        let accepted = match &err {
            GuidelineError::ExcessOverrun { order_quantity, .. }
                if options.overrun == OverrunPolicy::Warn =>
            {
                Some(*order_quantity)
            }
            _ => None,
        };
        log::debug!("{err}");
        let diag = Diagnostic::from(err).with_child(guideline.advice());
        match accepted {
            Some(order_quantity) => {
                WithDiagnostics::new(order_quantity, vec![diag.as_warning()].into())
            }
            None => diag.into(),
        }
    }

    /// Every defined guideline, resolved: idents, then devices, then the default.
    pub fn guideline_table(&self) -> Result<Vec<QtyGuideline>, GuidelineError> {
        let mut rows = Vec::new();
        for (key, raw) in &self.idents {
            let ident = Ident::parse_generic(key).map_err(|e| {
                GuidelineError::Validation(format!("Invalid ident '{key}': {e}"))
            })?;
            rows.push(QtyGuideline::resolve(
                GuidelineScope::Ident(key.clone()),
                raw,
                kind_for(ident.device()),
            )?);
        }
        for (device, raw) in &self.devices {
            rows.push(QtyGuideline::resolve(
                GuidelineScope::Device(*device),
                raw,
                kind_for(*device),
            )?);
        }
        if let Some(raw) = &self.default {
            rows.push(QtyGuideline::resolve(
                GuidelineScope::Default,
                raw,
                QuantityKind::Count,
            )?);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUIDELINES: &str = r#"
default:
  oqty_min: 1
  oqty_multiple: 1
devices:
  RES SMD:
    oqty_min: 10
    oqty_multiple: 5
    excess_min_pc: 10
    filter_std_vals_only: true
  WIRE INSULATED:
    oqty_min: 5
    oqty_multiple: 5
idents:
  CAP CER SMD 100nF 0402:
    oqty_min: 100
    oqty_multiple: 100
    excess_max_qty: 50
generators:
  RES SMD:
    - E24
"#;

    const WARN: OrderOptions = OrderOptions {
        overrun: OverrunPolicy::Warn,
        excess: true,
        baseline: false,
    };

    fn guidelines() -> QtyGuidelines {
        QtyGuidelines::from_yaml(GUIDELINES).unwrap()
    }

    fn ident(s: &str) -> Ident {
        Ident::parse_generic(s).unwrap()
    }

    fn check_many(cases: &[(&str, Quantity, Quantity)]) {
        let guidelines = guidelines();
        for (id, qty, expected) in cases {
            let got = guidelines
                .compliant_quantity(&ident(id), *qty, &WARN)
                .output
                .unwrap();
            assert_eq!(got, *expected, "{id} x {qty}");
        }
    }

    #[test]
    fn compliant_quantities() {
        let n = Quantity::count::<i64>;
        let m = |s: &str| Quantity::parse(QuantityKind::Length, s).unwrap();
        check_many(&[
            // 12 + 10 % = 13.2 -> 10, 15
            ("RES SMD 10K 0402", n(12), n(15)),
            ("RES SMD 10K 0402", n(3), n(10)),
            ("RES SMD 10K 0402", n(0), n(10)),
            // 50 + 10 % = 55 is exceeded strictly
            ("RES SMD 10K 0402", n(50), n(60)),
            // not a standard value: default guideline
            ("RES SMD SPECIAL 0402", n(12), n(13)),
            ("CAP CER SMD 1nF 0402", n(7), n(8)),
            ("CAP CER SMD 100nF 0402", n(120), n(200)),
            ("WIRE INSULATED 16AWG RED", m("7.2m"), m("10m")),
            ("WIRE INSULATED 16AWG RED", m("30cm"), m("5m")),
        ]);
    }

    #[test]
    fn order_quantity_is_min_plus_multiples() {
        let guideline = guidelines()
            .guideline(&ident("RES SMD 10K 0402"))
            .unwrap()
            .unwrap();
        let mut previous = Quantity::count(0);
        for qty in 0..200 {
            let qty = Quantity::count(qty);
            let order = guideline.compliant_quantity(qty, true).unwrap();
            assert!(order >= qty);
            assert!(order >= previous);
            let steps = ((order - guideline.oqty_min).unwrap() / guideline.oqty_multiple).unwrap();
            assert!(steps.fract().is_zero(), "{order}");
            previous = order;
        }
    }

    #[test]
    fn excess_overrun() {
        let guidelines = guidelines();
        let cap = ident("CAP CER SMD 100nF 0402");
        let failed = guidelines.compliant_quantity(&cap, Quantity::count(20), &OrderOptions::default());
        assert!(failed.output.is_none());
        let diag = &failed.diagnostics[0];
        assert!(diag.is_error());
        assert_eq!(diag.kind, FindingKind::ExcessOverrun);
        let advice = diag.child.as_deref().unwrap();
        assert_eq!(advice.severity, Severity::Advice);
        insta::assert_snapshot!(diag.to_string(), @r"
        Error: Order quantity 100 of CAP CER SMD 100nF 0402 exceeds 20 by more than 50
        Advice: guideline CAP CER SMD 100nF 0402: minimum 100, multiple 100, excess up to 50
        ");

        let err = guidelines
            .guideline(&cap)
            .unwrap()
            .unwrap()
            .order_quantity(&cap, Quantity::count(20), &OrderOptions::default())
            .unwrap_err();
        assert_eq!(err.finding_kind(), FindingKind::ExcessOverrun);

        assert_eq!(
            guidelines
                .compliant_quantity(&cap, Quantity::count(60), &OrderOptions::default())
                .output_result()
                .unwrap(),
            Quantity::count(100)
        );
    }

    #[test]
    fn tolerated_overrun_is_a_warning() {
        let guidelines = guidelines();
        let cap = ident("CAP CER SMD 100nF 0402");
        let result = guidelines.compliant_quantity(&cap, Quantity::count(20), &WARN);
        assert!(result.is_success());
        assert_eq!(result.diagnostics.warnings().len(), 1);
        let warning = &result.diagnostics[0];
        assert_eq!(warning.kind, FindingKind::ExcessOverrun);
        assert!(warning.child.is_some());
        assert_eq!(result.output, Some(Quantity::count(100)));
    }

    #[test]
    fn baseline_is_ordered_on_request() {
        let guidelines = QtyGuidelines::from_yaml(
            "default:\n  oqty_min: 10\n  oqty_multiple: 5\n  baseline_qty: 20\n  excess_min_qty: 2\n",
        )
        .unwrap();
        let res = ident("RES SMD 10K 0402");
        let order = |options: OrderOptions| {
            guidelines
                .compliant_quantity(&res, Quantity::count(3), &options)
                .output_result()
                .unwrap()
        };

        // 3 + 2 excess -> 10
        assert_eq!(order(OrderOptions::default()), Quantity::count(10));
        // 3 + 20 baseline + 2 excess = 25 is exceeded strictly -> 30
        let baseline = OrderOptions {
            baseline: true,
            ..OrderOptions::default()
        };
        assert_eq!(order(baseline), Quantity::count(30));
        // 23 without excess -> 25
        let bare = OrderOptions {
            excess: false,
            ..baseline
        };
        assert_eq!(order(bare), Quantity::count(25));
    }

    #[test]
    fn without_excess_the_maximum_is_not_checked() {
        let guidelines = guidelines();
        let cap = ident("CAP CER SMD 100nF 0402");
        let options = OrderOptions {
            excess: false,
            ..OrderOptions::default()
        };
        let result = guidelines.compliant_quantity(&cap, Quantity::count(20), &options);
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.output, Some(Quantity::count(100)));
    }

    #[test]
    fn resolution_order() {
        let guidelines = guidelines();
        let scope = |s: &str| guidelines.guideline(&ident(s)).unwrap().unwrap().scope;
        assert_eq!(
            scope("CAP CER SMD 100nF 0402"),
            GuidelineScope::Ident("CAP CER SMD 100nF 0402".into())
        );
        assert_eq!(
            scope("RES SMD 1K 0402"),
            GuidelineScope::Device(DeviceClass::ResSmd)
        );
        assert_eq!(scope("RES SMD SPECIAL 0402"), GuidelineScope::Default);
        assert_eq!(scope("CAP CER SMD 1nF 0402"), GuidelineScope::Default);
    }

    #[test]
    fn table() {
        let rows = guidelines().guideline_table().unwrap();
        let scopes: Vec<String> = rows.iter().map(|r| r.scope.to_string()).collect();
        assert_eq!(
            scopes,
            vec!["CAP CER SMD 100nF 0402", "RES SMD", "WIRE INSULATED", "Default"]
        );
        assert_eq!(rows[0].excess_max_qty, Some(Quantity::count(50)));
        assert_eq!(rows[1].excess_min_pc, dec!(10));
        assert_eq!(rows[3].excess_max_qty, None);
    }

    #[test]
    fn without_guidelines_quantities_pass_through() {
        let empty = QtyGuidelines::from_yaml("{}").unwrap();
        assert_eq!(
            empty
                .compliant_quantity(
                    &ident("RES SMD 10K 0402"),
                    Quantity::count(7),
                    &OrderOptions::default()
                )
                .output_result()
                .unwrap(),
            Quantity::count(7)
        );
    }

    #[test]
    fn invalid_guidelines() {
        for yaml in [
            "devices:\n  FLUX CAPACITOR:\n    oqty_min: 1\n",
            "default:\n  oqty_multiple: 0\n",
            "default:\n  oqty_min: lots\n",
            "default:\n  oqty_minimum: 1\n",
        ] {
            assert!(QtyGuidelines::from_yaml(yaml).is_err(), "{yaml}");
        }
    }
}
