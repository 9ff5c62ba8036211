use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::component::{ComponentList, FillStatus};
use crate::quantity::{Quantity, QuantityKind};

use super::solve::checked_div;
use super::{Motif, MotifConfig, MotifCore, MotifError, MotifRef, SlotType, SolveContext};

const SLOTS: &[(&str, SlotType)] = &[("R1", SlotType::Resistor)];
const PARAMETERS: &[(&str, QuantityKind)] = &[("gain", QuantityKind::Gain)];

/// Instrumentation amplifier whose gain is set by a single resistor:
/// `gain = open_gain + constant / R1`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InampDevice {
    Ad8421,
    Ad8223,
}

impl InampDevice {
    /// Gain with the gain resistor left unpopulated.
    pub fn open_gain(self) -> Decimal {
        match self {
            InampDevice::Ad8421 => Decimal::ONE,
            InampDevice::Ad8223 => dec!(5),
        }
    }

    fn constant(self) -> Decimal {
        match self {
            InampDevice::Ad8421 => dec!(9900),
            InampDevice::Ad8223 => dec!(80000),
        }
    }

    pub fn gain(self, r1: Option<Decimal>) -> Result<Decimal, MotifError> {
        match r1 {
            None => Ok(self.open_gain()),
            Some(r1) => Ok(self.open_gain() + checked_div(self.constant(), r1)?),
        }
    }

    /// Gain resistor for `gain`; `None` when the open gain already matches.
    pub fn resistance(self, gain: Decimal) -> Result<Option<Decimal>, MotifError> {
        if gain == self.open_gain() {
            return Ok(None);
        }
        Ok(Some(checked_div(self.constant(), gain - self.open_gain())?))
    }
}

/// Gain setting resistor of an instrumentation amplifier.
///
/// The solve picks the largest series resistor not above the required value, so the
/// realized gain never falls short of the target.
#[derive(Debug, Clone)]
pub struct Ing {
    core: MotifCore,
    device: InampDevice,
}

impl Ing {
    pub fn new(motif_ref: MotifRef, device: InampDevice) -> Self {
        Self {
            core: MotifCore::new(motif_ref),
            device,
        }
    }

    pub fn device(&self) -> InampDevice {
        self.device
    }

    fn solve_gain(
        &self,
        gain: Quantity,
        bom: &mut ComponentList,
        ctx: &SolveContext<'_>,
    ) -> Result<(), MotifError> {
        let open = self.device.open_gain();
        if gain.value() < open {
            return Err(self
                .core
                .invalid(format!("gain {gain} is below the open gain {open}")));
        }
        let Some(required) = self.device.resistance(gain.value())? else {
            log::debug!("{}: open gain, R1 not fitted", self.core.motif_ref());
            return self.core.mark_dnp(bom, "R1");
        };
        let required = Quantity::new(QuantityKind::Resistance, required);
        let series = self
            .core
            .series(ctx, "Rseries", "Rmin", "Rmax", SlotType::Resistor)?;
        let found = self.core.bracket(&series, "R1", required)?;
        let r1 = found.at_or_below(&required).unwrap_or(found.crossing);
        self.core.write(bom, "R1", SlotType::Resistor, r1, ctx)
    }
}

impl Motif for Ing {
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
            ("Rseries", "E24"),
            ("Rmin", "10E"),
            ("Rmax", "10M"),
            ("gain", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn compute(&self, name: &str, bom: &ComponentList) -> Result<Quantity, MotifError> {
        match name {
            "gain" => {
                let fitted = self.core.component(bom, "R1", SlotType::Resistor)?.fill_status
                    != FillStatus::Dnp;
                let r1 = if fitted {
                    Some(self.core.read(bom, "R1", SlotType::Resistor)?.value())
                } else {
                    None
                };
                Ok(Quantity::new(QuantityKind::Gain, self.device.gain(r1)?))
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
            "gain" => self.solve_gain(target, bom, ctx),
            _ => Err(self.core.unknown_parameter(name)),
        }
    }

    fn apply_config(
        &self,
        bom: &mut ComponentList,
        ctx: &SolveContext<'_>,
    ) -> Result<(), MotifError> {
        let gain = self.core.config_quantity("gain", QuantityKind::Gain)?;
        self.solve_gain(gain, bom, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::series::SeriesRegistry;

    const AD8421: &str = "\
refdes,device,value,footprint,fillstatus,motif
R5,RES SMD,1K/0.063W,0402,CONF,ING_AD8421.1:R1
";

    const AD8223: &str = "\
refdes,device,value,footprint,fillstatus,motif
R7,RES SMD,1K/0.063W,0402,CONF,ING_AD8223.1:R1
";

    fn gain(s: &str) -> Quantity {
        Quantity::parse(QuantityKind::Gain, s).unwrap()
    }

    #[test]
    fn unity_gain_leaves_resistor_unfitted() {
        let (mut motif, mut list) = bound(AD8421);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);

        motif.configure(MotifConfig::new(), &mut list, &ctx).unwrap();
        assert_eq!(list.get("R5").unwrap().fill_status, FillStatus::Dnp);
        assert_eq!(value(&list, "R5"), "1K/0.063W");
        assert_eq!(motif.parameter("gain", &list).unwrap(), gain("1"));
    }

    #[test]
    fn mid_range_gain_rounds_resistor_down() {
        let (mut motif, mut list) = bound(AD8421);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);

        // 9900 / 9 = 1.1K exactly
        motif
            .configure(config(&[("gain", "10")]), &mut list, &ctx)
            .unwrap();
        assert_eq!(value(&list, "R5"), "1.1K/0.063W");
        assert_eq!(list.get("R5").unwrap().fill_status, FillStatus::Normal);
        assert_eq!(motif.parameter("gain", &list).unwrap(), gain("10"));

        // 9900 / 19 ~ 521E, between 510E and 560E
        motif
            .set_parameter("gain", gain("20"), &mut list, &ctx)
            .unwrap();
        assert_eq!(value(&list, "R5"), "510E/0.063W");
        let realized = motif.parameter("gain", &list).unwrap();
        assert!(realized.value() > dec!(20.4) && realized.value() < dec!(20.5), "{realized}");

        motif
            .set_parameter("gain", gain("1"), &mut list, &ctx)
            .unwrap();
        assert_eq!(list.get("R5").unwrap().fill_status, FillStatus::Dnp);
    }

    #[test]
    fn ad8223_gain_is_offset_by_five() {
        let (mut motif, mut list) = bound(AD8223);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);

        // 80000 / (25 - 5) = 4K -> 3.9K
        motif
            .configure(config(&[("gain", "25")]), &mut list, &ctx)
            .unwrap();
        assert_eq!(value(&list, "R7"), "3.9K/0.063W");
        let realized = motif.parameter("gain", &list).unwrap();
        assert!(realized.value() > dec!(25.5) && realized.value() < dec!(25.6), "{realized}");

        let before = list.clone();
        assert!(matches!(
            motif.set_parameter("gain", gain("2"), &mut list, &ctx),
            Err(MotifError::Validation { .. })
        ));
        assert_eq!(list, before);
    }
}
