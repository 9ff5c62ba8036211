use crate::component::ComponentList;
use crate::quantity::{Quantity, QuantityKind};

use super::solve::inverse_two_pi;
use super::{Motif, MotifConfig, MotifCore, MotifError, MotifRef, SlotType, SolveContext};

const SLOTS: &[(&str, SlotType)] = &[("R1", SlotType::Resistor), ("C1", SlotType::Capacitor)];
const PARAMETERS: &[(&str, QuantityKind)] = &[("Fc", QuantityKind::Frequency)];

/// Single pole RC low pass filter, `Fc = 1 / (2π·R1·C1)`.
///
/// R1 is fixed by configuration; C1 is picked from `Cseries` within `Cmin..=Cmax`.
#[derive(Debug, Clone)]
pub struct Lpf1 {
    core: MotifCore,
}

impl Lpf1 {
    pub fn new(motif_ref: MotifRef) -> Self {
        Self {
            core: MotifCore::new(motif_ref),
        }
    }

    fn solve_fc(
        &self,
        fc: Quantity,
        bom: &mut ComponentList,
        ctx: &SolveContext<'_>,
    ) -> Result<(), MotifError> {
        let r1 = self.core.read(bom, "R1", SlotType::Resistor)?;
        let required = Quantity::new(
            QuantityKind::Capacitance,
            inverse_two_pi(r1.value(), fc.value())?,
        );
        let series = self
            .core
            .series(ctx, "Cseries", "Cmin", "Cmax", SlotType::Capacitor)?;
        let c1 = self.core.bracket(&series, "C1", required)?.crossing;
        self.core.write(bom, "C1", SlotType::Capacitor, c1, ctx)
    }
}

impl Motif for Lpf1 {
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
            ("Fc", "15000Hz"),
            ("R1", "50E"),
            ("Cseries", "E6"),
            ("Cmin", "1pF"),
            ("Cmax", "1uF"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn compute(&self, name: &str, bom: &ComponentList) -> Result<Quantity, MotifError> {
        match name {
            "Fc" => {
                let r1 = self.core.read(bom, "R1", SlotType::Resistor)?;
                let c1 = self.core.read(bom, "C1", SlotType::Capacitor)?;
                Ok(Quantity::new(
                    QuantityKind::Frequency,
                    inverse_two_pi(r1.value(), c1.value())?,
                ))
            }
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
            "Fc" => self.solve_fc(target, bom, ctx),
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
        let fc = self.core.config_quantity("Fc", QuantityKind::Frequency)?;
        self.solve_fc(fc, bom, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::diagnostics::FindingKind;
    use crate::series::SeriesRegistry;
    use rust_decimal_macros::dec;

    const LISTING: &str = "\
refdes,device,value,footprint,fillstatus,motif
R1,RES SMD,1K/0.125W,0402,CONF,LPF1.1:R1
C1,CAP CER SMD,1nF,0402,CONF,LPF1.1:C1
";

    fn hz(s: &str) -> Quantity {
        Quantity::parse(QuantityKind::Frequency, s).unwrap()
    }

    #[test]
    fn configure_with_defaults() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);

        motif.configure(MotifConfig::new(), &mut list, &ctx).unwrap();

        // 1 / (2π · 50 · 15kHz) ≈ 212.2nF, first E6 value at or above is 220nF
        assert_eq!(value(&list, "R1"), "50E/0.125W");
        assert_eq!(value(&list, "C1"), "220nF");
        assert_eq!(
            list.get("C1").unwrap().fill_status,
            crate::component::FillStatus::Normal
        );
        let fc = motif.parameter("Fc", &list).unwrap();
        assert!(fc.value() <= dec!(15000));
        assert!(fc.value() > dec!(14000), "{fc}");
    }

    #[test]
    fn set_cutoff() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);
        motif
            .configure(config(&[("R1", "1K"), ("Cseries", "E12")]), &mut list, &ctx)
            .unwrap();

        // 1 / (2π · 1K · 20kHz) ≈ 7.96nF -> 8.2nF
        motif
            .set_parameter("Fc", hz("20kHz"), &mut list, &ctx)
            .unwrap();
        assert_eq!(value(&list, "C1"), "8.2nF");
        assert_eq!(value(&list, "R1"), "1K/0.125W");
    }

    #[test]
    fn exhausted_series_leaves_components_alone() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);
        motif.configure(MotifConfig::new(), &mut list, &ctx).unwrap();
        let before = list.clone();

        // Needs ~3.2uF, above Cmax
        let err = motif
            .set_parameter("Fc", hz("1kHz"), &mut list, &ctx)
            .unwrap_err();
        assert!(matches!(err, MotifError::SeriesExhausted { .. }), "{err}");
        assert_eq!(err.finding_kind(), FindingKind::SeriesExhausted);
        assert_eq!(list, before);
    }

    #[test]
    fn configured_resistor_must_be_standard_notation() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);
        let before = list.clone();

        // "1.5G" has no place in the house resistor notation
        let err = motif
            .configure(config(&[("R1", "1.5G")]), &mut list, &ctx)
            .unwrap_err();
        assert!(
            matches!(err, MotifError::SlotValue { ref slot, .. } if slot == "R1"),
            "{err}"
        );
        assert_eq!(list, before);
        assert!(motif.core().config().is_none());
    }

    #[test]
    fn wrong_kind_target_is_rejected() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);
        motif.configure(MotifConfig::new(), &mut list, &ctx).unwrap();
        let volts = Quantity::parse(QuantityKind::Voltage, "5V").unwrap();
        assert!(matches!(
            motif.set_parameter("Fc", volts, &mut list, &ctx),
            Err(MotifError::Quantity(_))
        ));
        assert!(matches!(
            motif.parameter("Q", &list),
            Err(MotifError::UnknownParameter { .. })
        ));
    }
}
