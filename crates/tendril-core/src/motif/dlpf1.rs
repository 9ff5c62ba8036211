use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::component::ComponentList;
use crate::quantity::{Quantity, QuantityKind};

use super::solve::inverse_two_pi;
use super::{Motif, MotifConfig, MotifCore, MotifError, MotifRef, SlotType, SolveContext};

const SLOTS: &[(&str, SlotType)] = &[
    ("R1", SlotType::Resistor),
    ("R2", SlotType::Resistor),
    ("C1", SlotType::Capacitor),
    ("C2", SlotType::Capacitor),
    ("C3", SlotType::Capacitor),
];
const OPTIONAL_SLOTS: &[(&str, SlotType)] =
    &[("R3", SlotType::Resistor), ("R4", SlotType::Resistor)];
const PARAMETERS: &[(&str, QuantityKind)] = &[
    ("Fdiff", QuantityKind::Frequency),
    ("Fcm", QuantityKind::Frequency),
];

/// Common mode corner placed this far above the differential corner.
const FCM_RATIO: Decimal = dec!(21);
/// Minimum ratio of the differential capacitor to the common mode capacitors.
const C1_RATIO: Decimal = dec!(10);
/// Bias value marking a bias resistor do-not-populate.
const NO_BIAS: &str = "-1";

/// Differential RC low pass filter with optional bias resistors.
///
/// R1/R2 are the series resistors, C1 the differential capacitor and C2/C3 the common
/// mode capacitors to ground. R3/R4 bias the positive and negative legs.
#[derive(Debug, Clone)]
pub struct Dlpf1 {
    core: MotifCore,
}

impl Dlpf1 {
    pub fn new(motif_ref: MotifRef) -> Self {
        Self {
            core: MotifCore::new(motif_ref),
        }
    }

    fn solve_fdiff(
        &self,
        fdiff: Quantity,
        bom: &mut ComponentList,
        ctx: &SolveContext<'_>,
    ) -> Result<(), MotifError> {
        let r1 = self.core.read(bom, "R1", SlotType::Resistor)?;
        let series = self
            .core
            .series(ctx, "Cseries", "Cmin", "Cmax", SlotType::Capacitor)?;

        // C2 from the common mode corner estimate, one series step below the crossing
        let fcm = fdiff.value() * FCM_RATIO;
        let c2_required = Quantity::new(
            QuantityKind::Capacitance,
            inverse_two_pi(r1.value(), fcm)?,
        );
        let c2 = self.core.bracket(&series, "C2", c2_required)?.lower();

        let c1_required = c2 * C1_RATIO;
        let c1 = self.core.bracket(&series, "C1", c1_required)?.crossing;

        log::debug!(
            "{}: Fdiff {fdiff} -> C1 {c1}, C2/C3 {c2}",
            self.core.motif_ref()
        );
        self.core.write(bom, "C2", SlotType::Capacitor, c2, ctx)?;
        self.core.write(bom, "C3", SlotType::Capacitor, c2, ctx)?;
        self.core.write(bom, "C1", SlotType::Capacitor, c1, ctx)
    }

    fn apply_bias(&self, bom: &mut ComponentList, key: &str, slot: &str) -> Result<(), MotifError> {
        let Ok(bias) = self.core.config_value(key) else {
            log::warn!("{}: no {key} configured", self.core.motif_ref());
            return Ok(());
        };
        if bias.trim() == NO_BIAS {
            return self.core.mark_dnp(bom, slot);
        }
        if !self.core.is_bound(slot) {
            return Err(MotifError::UnboundSlot {
                motif: self.core.motif_ref().clone(),
                slot: slot.to_string(),
            });
        }
        let value = self.core.config_quantity(key, QuantityKind::Resistance)?;
        self.core.assign(bom, slot, SlotType::Resistor, value)
    }
}

impl Motif for Dlpf1 {
    fn core(&self) -> &MotifCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut MotifCore {
        &mut self.core
    }

    fn slots(&self) -> &'static [(&'static str, SlotType)] {
        SLOTS
    }

    fn optional_slots(&self) -> &'static [(&'static str, SlotType)] {
        OPTIONAL_SLOTS
    }

    fn parameters(&self) -> &'static [(&'static str, QuantityKind)] {
        PARAMETERS
    }

    fn config_stub(&self) -> MotifConfig {
        [
            ("Cseries", "E6"),
            ("Cmin", "1pF"),
            ("Cmax", "100nF"),
            ("Fdiff", "15000Hz"),
            ("R1", "50E"),
            ("pbias", NO_BIAS),
            ("nbias", NO_BIAS),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn compute(&self, name: &str, bom: &ComponentList) -> Result<Quantity, MotifError> {
        let r1 = self.core.read(bom, "R1", SlotType::Resistor)?;
        let c2 = self.core.read(bom, "C2", SlotType::Capacitor)?;
        let corner = match name {
            "Fdiff" => {
                let c1 = self.core.read(bom, "C1", SlotType::Capacitor)?;
                inverse_two_pi(r1.value(), dec!(2) * c1.value() + c2.value())?
            }
            "Fcm" => inverse_two_pi(r1.value(), c2.value())?,
            _ => return Err(self.core.unknown_parameter(name)),
        };
        Ok(Quantity::new(QuantityKind::Frequency, corner))
    }

    fn solve(
        &self,
        name: &str,
        target: Quantity,
        bom: &mut ComponentList,
        ctx: &SolveContext<'_>,
    ) -> Result<(), MotifError> {
        match name {
            "Fdiff" => self.solve_fdiff(target, bom, ctx),
            "Fcm" => Err(self.core.read_only(name)),
            _ => Err(self.core.unknown_parameter(name)),
        }
    }

    fn apply_config(
        &self,
        bom: &mut ComponentList,
        ctx: &SolveContext<'_>,
    ) -> Result<(), MotifError> {
        let r1 = self.core.config_quantity("R1", QuantityKind::Resistance)?;
        self.core.assign(bom, "R1", SlotType::Resistor, r1)?;
        self.core.assign(bom, "R2", SlotType::Resistor, r1)?;

        let fdiff = self.core.config_quantity("Fdiff", QuantityKind::Frequency)?;
        self.solve_fdiff(fdiff, bom, ctx)?;

        self.apply_bias(bom, "pbias", "R3")?;
        self.apply_bias(bom, "nbias", "R4")
    }

    fn check(&self, bom: &ComponentList) -> Result<(), MotifError> {
        let r1 = self.core.read(bom, "R1", SlotType::Resistor)?;
        let r2 = self.core.read(bom, "R2", SlotType::Resistor)?;
        if r1 != r2 {
            return Err(self.core.invalid(format!("R1 {r1} and R2 {r2} differ")));
        }
        let c1 = self.core.read(bom, "C1", SlotType::Capacitor)?;
        let c2 = self.core.read(bom, "C2", SlotType::Capacitor)?;
        let c3 = self.core.read(bom, "C3", SlotType::Capacitor)?;
        if c2 != c3 {
            return Err(self.core.invalid(format!("C2 {c2} and C3 {c3} differ")));
        }
        if c1.value() < c2.value() * C1_RATIO {
            return Err(self.core.invalid(format!("C1 {c1} is below 10 x C2 {c2}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::component::FillStatus;
    use crate::series::SeriesRegistry;

    const LISTING: &str = "\
refdes,device,value,footprint,fillstatus,motif
R1,RES SMD,1K,0402,CONF,DLPF1.in:R1
R2,RES SMD,1K,0402,CONF,DLPF1.in:R2
R3,RES SMD,10K,0402,CONF,DLPF1.in:R3
R4,RES SMD,10K,0402,CONF,DLPF1.in:R4
C1,CAP CER SMD,1nF,0402,CONF,DLPF1.in:C1
C2,CAP CER SMD,1nF,0402,CONF,DLPF1.in:C2
C3,CAP CER SMD,1nF,0402,CONF,DLPF1.in:C3
";

    #[test]
    fn configure_with_defaults() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);

        motif.configure(MotifConfig::new(), &mut list, &ctx).unwrap();

        // Fcm target 315kHz needs ~10.1nF; one E6 step below the crossing is 10nF.
        assert_eq!(value(&list, "R1"), "50E/0.125W");
        assert_eq!(value(&list, "R2"), "50E/0.125W");
        assert_eq!(value(&list, "C2"), "10nF");
        assert_eq!(value(&list, "C3"), "10nF");
        assert_eq!(value(&list, "C1"), "100nF");
        assert_eq!(list.get("R3").unwrap().fill_status, FillStatus::Dnp);
        assert_eq!(list.get("R4").unwrap().fill_status, FillStatus::Dnp);

        let fdiff = motif.parameter("Fdiff", &list).unwrap();
        assert!(fdiff.value() > dec!(15000) && fdiff.value() < dec!(15500), "{fdiff}");
        motif.validate(&list).unwrap();
    }

    #[test]
    fn bias_resistors() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);

        motif
            .configure(config(&[("pbias", "100K"), ("nbias", "-1")]), &mut list, &ctx)
            .unwrap();
        assert_eq!(value(&list, "R3"), "100K/0.125W");
        assert_eq!(list.get("R3").unwrap().fill_status, FillStatus::Normal);
        assert_eq!(list.get("R4").unwrap().fill_status, FillStatus::Dnp);
    }

    #[test]
    fn common_mode_corner_is_read_only() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);
        motif.configure(MotifConfig::new(), &mut list, &ctx).unwrap();

        let fcm = Quantity::parse(QuantityKind::Frequency, "100kHz").unwrap();
        assert!(matches!(
            motif.set_parameter("Fcm", fcm, &mut list, &ctx),
            Err(MotifError::ReadOnlyParameter { .. })
        ));
    }

    #[test]
    fn validation_catches_unbalanced_legs() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);
        motif.configure(MotifConfig::new(), &mut list, &ctx).unwrap();

        list.set_value("C3", "22nF").unwrap();
        assert!(matches!(
            motif.validate(&list),
            Err(MotifError::Validation { .. })
        ));
    }
}
