use rust_decimal::Decimal;

use crate::component::ComponentList;
use crate::quantity::{Quantity, QuantityKind};

use super::solve::checked_div;
use super::{Motif, MotifConfig, MotifCore, MotifError, MotifRef, SlotType, SolveContext};

const SLOTS: &[(&str, SlotType)] = &[("R1", SlotType::Resistor), ("R2", SlotType::Resistor)];
const PARAMETERS: &[(&str, QuantityKind)] = &[
    ("Vout", QuantityKind::Voltage),
    ("Idiv", QuantityKind::Current),
];

/// Feedback divider of an adjustable linear regulator, `Vout = Vref·(1 + R1/R2)`.
///
/// R2 is sized so the divider draws at least `Imin`; R1 then sets the output voltage.
#[derive(Debug, Clone)]
pub struct Lregs1 {
    core: MotifCore,
}

impl Lregs1 {
    pub fn new(motif_ref: MotifRef) -> Self {
        Self {
            core: MotifCore::new(motif_ref),
        }
    }

    fn vref(&self) -> Result<Quantity, MotifError> {
        self.core.config_quantity("Vref", QuantityKind::Voltage)
    }

    /// Largest series resistor that still draws `Imin` at `Vref`.
    fn solve_r2(&self, bom: &mut ComponentList, ctx: &SolveContext<'_>) -> Result<(), MotifError> {
        let vref = self.vref()?;
        let imin = self.core.config_quantity("Imin", QuantityKind::Current)?;
        let target = Quantity::new(
            QuantityKind::Resistance,
            checked_div(vref.value(), imin.value())?,
        );
        let series = self
            .core
            .series(ctx, "Rseries", "Rmin", "Rmax", SlotType::Resistor)?;
        let r2 = match super::bracket(series.iter(), &target) {
            Some(b) => b.at_or_below(&target),
            None => series.iter().last(),
        }
        .ok_or_else(|| self.core.exhausted(&series, "R2", target))?;
        self.core.write(bom, "R2", SlotType::Resistor, r2, ctx)
    }

    fn solve_vout(
        &self,
        vout: Quantity,
        bom: &mut ComponentList,
        ctx: &SolveContext<'_>,
    ) -> Result<(), MotifError> {
        let vref = self.vref()?;
        if vout.value() <= vref.value() {
            return Err(self
                .core
                .invalid(format!("Vout {vout} must be above Vref {vref}")));
        }
        let r2 = self.core.read(bom, "R2", SlotType::Resistor)?;
        let gain = checked_div(vout.value(), vref.value())? - Decimal::ONE;
        let target = r2 * gain;
        let series = self
            .core
            .series(ctx, "Rseries", "Rmin", "Rmax", SlotType::Resistor)?;
        let r1 = self.core.bracket(&series, "R1", target)?.crossing;
        self.core.write(bom, "R1", SlotType::Resistor, r1, ctx)
    }
}

impl Motif for Lregs1 {
    fn core(&self) -> &MotifCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut MotifCore {
        &mut self.core
    }

    fn slots(&self) -> &'static [(&'static str, SlotType)] {
        SLOTS
    }

    fn parameters(&self) -> &'static [(&'static str, QuantityKind)] {
        PARAMETERS
    }

    fn config_stub(&self) -> MotifConfig {
        [
            ("Vref", "1.225V"),
            ("Imin", "1mA"),
            ("Rseries", "E12"),
            ("Rmin", "10E"),
            ("Rmax", "10M"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn compute(&self, name: &str, bom: &ComponentList) -> Result<Quantity, MotifError> {
        let vref = self.vref()?;
        let r2 = self.core.read(bom, "R2", SlotType::Resistor)?;
        match name {
            "Vout" => {
                let r1 = self.core.read(bom, "R1", SlotType::Resistor)?;
                let ratio = (r1 / r2)?;
                Ok(vref * (Decimal::ONE + ratio))
            }
            "Idiv" => Ok(Quantity::new(
                QuantityKind::Current,
                checked_div(vref.value(), r2.value())?,
            )),
            _ => Err(self.core.unknown_parameter(name)),
        }
    }

    fn solve(
        &self,
        name: &str,
        target: Quantity,
        bom: &mut ComponentList,
        ctx: &SolveContext<'_>,
    ) -> Result<(), MotifError> {
        match name {
            "Vout" => self.solve_vout(target, bom, ctx),
            "Idiv" => Err(self.core.read_only(name)),
            _ => Err(self.core.unknown_parameter(name)),
        }
    }

    fn apply_config(
        &self,
        bom: &mut ComponentList,
        ctx: &SolveContext<'_>,
    ) -> Result<(), MotifError> {
        let vout = self.core.config_quantity("Vout", QuantityKind::Voltage)?;
        self.solve_r2(bom, ctx)?;
        self.solve_vout(vout, bom, ctx)
    }

    fn check(&self, bom: &ComponentList) -> Result<(), MotifError> {
        let idiv = self.compute("Idiv", bom)?;
        let imin = self.core.config_quantity("Imin", QuantityKind::Current)?;
        if idiv < imin {
            return Err(self
                .core
                .invalid(format!("divider current {idiv} is below Imin {imin}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::series::SeriesRegistry;
    use rust_decimal_macros::dec;

    const LISTING: &str = "\
refdes,device,value,footprint,fillstatus,motif
R1,RES SMD,1K/0.1W,0603,CONF,LREGS1.3v3:R1
R2,RES SMD,1K/0.1W,0603,CONF,LREGS1.3v3:R2
";

    fn volts(s: &str) -> Quantity {
        Quantity::parse(QuantityKind::Voltage, s).unwrap()
    }

    #[test]
    fn configure_for_output_voltage() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);

        motif
            .configure(config(&[("Vout", "3.3V")]), &mut list, &ctx)
            .unwrap();

        // Vref/Imin = 1225E -> R2 1.2K; (3.3/1.225 - 1) x 1.2K ~ 2.03K -> R1 2.2K
        assert_eq!(value(&list, "R2"), "1.2K/0.1W");
        assert_eq!(value(&list, "R1"), "2.2K/0.1W");
        let vout = motif.parameter("Vout", &list).unwrap();
        assert!(vout.value() > dec!(3.3) && vout.value() < dec!(3.5), "{vout}");
        let idiv = motif.parameter("Idiv", &list).unwrap();
        assert!(idiv.value() >= dec!(0.001));
    }

    #[test]
    fn output_voltage_is_required() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);
        assert!(matches!(
            motif.configure(MotifConfig::new(), &mut list, &ctx),
            Err(MotifError::MissingConfig { .. })
        ));
        assert!(motif.core().config().is_none());
    }

    #[test]
    fn retarget_output() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);
        motif
            .configure(config(&[("Vout", "3.3V")]), &mut list, &ctx)
            .unwrap();

        motif
            .set_parameter("Vout", volts("5V"), &mut list, &ctx)
            .unwrap();
        assert_eq!(value(&list, "R1"), "3.9K/0.1W");
        assert_eq!(value(&list, "R2"), "1.2K/0.1W");

        assert!(matches!(
            motif.set_parameter("Vout", volts("1V"), &mut list, &ctx),
            Err(MotifError::Validation { .. })
        ));
    }
}
