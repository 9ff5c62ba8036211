use std::f64::consts::{PI, SQRT_2};

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal_macros::dec;

use crate::component::ComponentList;
use crate::quantity::{Quantity, QuantityKind};
use crate::series::SeriesGenerator;

use super::{
    min_by_error, Motif, MotifConfig, MotifCore, MotifError, MotifRef, SlotType, SolveContext,
};

const SLOTS: &[(&str, SlotType)] = &[
    ("R1", SlotType::Resistor),
    ("R2", SlotType::Resistor),
    ("C1", SlotType::Capacitor),
    ("C2", SlotType::Capacitor),
];
const PARAMETERS: &[(&str, QuantityKind)] =
    &[("Fc", QuantityKind::Frequency), ("Q", QuantityKind::Gain)];

/// Lowest score a solution may have.
const MIN_SCORE: Decimal = dec!(0.9);
/// Headroom on the minimum C2/C1 ratio before C2 is rounded to the series.
const CR_MARGIN: f64 = 1.1;

// Score sensitivity per term
const KE_FC: f64 = 10.0;
const KE_Q: f64 = 10.0;
const KE_R: f64 = 0.01;
const KE_C: f64 = 0.005;

/// Normalized second order denominator `b·s² + a·s + 1`.
#[derive(Debug, Clone, Copy)]
struct Polynomial {
    a: f64,
    b: f64,
}

impl Polynomial {
    fn q(self) -> f64 {
        self.b.sqrt() / self.a
    }

    /// Smallest C2/C1 ratio with real resistor solutions.
    fn min_cr(self) -> f64 {
        4.0 * self.b / (self.a * self.a)
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    r1: Quantity,
    r2: Quantity,
    c1: Quantity,
    c2: Quantity,
}

/// Cutoff frequency and pole quality of a unity gain Sallen-Key stage.
fn response(r1: f64, r2: f64, c1: f64, c2: f64) -> (f64, f64) {
    let root = (r1 * r2 * c1 * c2).sqrt();
    (1.0 / (2.0 * PI * root), root / ((r1 + r2) * c1))
}

fn f64_of(q: &Quantity) -> f64 {
    q.value().to_f64().unwrap_or(f64::NAN)
}

/// `1 - |k·log10(ratio)|`, floored at zero.
fn penalty(k: f64, ratio: f64) -> f64 {
    (1.0 - (k * ratio.log10()).abs()).max(0.0)
}

/// Second order unity gain Sallen-Key low pass filter.
///
/// Every series value of C1 seeds a candidate: C2 is the series value nearest the minimum
/// capacitance ratio plus margin, and R1/R2 are the series values nearest the exact
/// solution. The candidate with the best score wins; the score falls with cutoff and Q
/// error and, more gently, with component values far from the middle of their series.
#[derive(Debug, Clone)]
pub struct Lpf2 {
    core: MotifCore,
}

impl Lpf2 {
    pub fn new(motif_ref: MotifRef) -> Self {
        Self {
            core: MotifCore::new(motif_ref),
        }
    }

    fn polynomial(&self) -> Result<Polynomial, MotifError> {
        match self.core.config_value("poly")? {
            "Butterworth" => Ok(Polynomial { a: SQRT_2, b: 1.0 }),
            other => Err(self
                .core
                .invalid(format!("unsupported filter polynomial {other}"))),
        }
    }

    fn candidate(
        poly: Polynomial,
        fc: f64,
        seed: &Quantity,
        capacitors: &SeriesGenerator<'_>,
        resistors: &SeriesGenerator<'_>,
    ) -> Option<Candidate> {
        let c1 = capacitors.closest_value(seed)?;
        let c2 = capacitors.closest_value(&(c1 * Decimal::from_f64(poly.min_cr() * CR_MARGIN)?))?;
        let (c1f, c2f) = (f64_of(&c1), f64_of(&c2));

        let discriminant = (poly.a * c2f).powi(2) - 4.0 * poly.b * c1f * c2f;
        if discriminant < 0.0 {
            return None;
        }
        let tn1 = poly.a * c2f;
        let tn2 = discriminant.sqrt();
        let td = 4.0 * PI * fc * c1f * c2f;
        let resistor = |r: f64| {
            let target = Quantity::new(QuantityKind::Resistance, Decimal::from_f64(r)?);
            resistors.closest_value(&target)
        };
        Some(Candidate {
            r1: resistor((tn1 + tn2) / td)?,
            r2: resistor((tn1 - tn2) / td)?,
            c1,
            c2,
        })
    }

    fn score(
        poly: Polynomial,
        fc: f64,
        c: &Candidate,
        r_mid: f64,
        c_mid: f64,
    ) -> Decimal {
        let (r1, r2, c1, c2) = (f64_of(&c.r1), f64_of(&c.r2), f64_of(&c.c1), f64_of(&c.c2));
        let (actual_fc, actual_q) = response(r1, r2, c1, c2);
        let score = penalty(KE_FC, actual_fc / fc)
            * penalty(KE_Q, actual_q / poly.q())
            * penalty(KE_R, r1 / r_mid)
            * penalty(KE_R, r2 / r_mid)
            * penalty(KE_C, c1 / c_mid)
            * penalty(KE_C, c2 / c_mid);
        Decimal::from_f64(score)
            .map(|s| s.round_dp(5))
            .unwrap_or(Decimal::ZERO)
    }

    fn solve_fc(
        &self,
        fc: Quantity,
        bom: &mut ComponentList,
        ctx: &SolveContext<'_>,
    ) -> Result<(), MotifError> {
        let poly = self.polynomial()?;
        let capacitors = self
            .core
            .series(ctx, "Cseries", "Cmin", "Cmax", SlotType::Capacitor)?;
        let resistors = self
            .core
            .series(ctx, "Rseries", "Rmin", "Rmax", SlotType::Resistor)?;
        let (Some(r_mid), Some(c_mid)) = (
            resistors.characteristic_value(),
            capacitors.characteristic_value(),
        ) else {
            return Err(self.core.exhausted(&capacitors, "C1", fc));
        };
        let (r_mid, c_mid, target) = (f64_of(&r_mid), f64_of(&c_mid), f64_of(&fc));

        let candidates: Vec<Candidate> = capacitors
            .iter()
            .filter_map(|seed| Self::candidate(poly, target, &seed, &capacitors, &resistors))
            .collect();
        let best = min_by_error(candidates, |c| {
            Ok(Decimal::ONE - Self::score(poly, target, c, r_mid, c_mid))
        })?
        .ok_or_else(|| self.core.exhausted(&capacitors, "C1", fc))?;

        let score = Self::score(poly, target, &best, r_mid, c_mid);
        log::debug!(
            "{}: C1 {} C2 {} R1 {} R2 {} scores {score}",
            self.core.motif_ref(),
            best.c1,
            best.c2,
            best.r1,
            best.r2
        );
        if score <= MIN_SCORE {
            return Err(self
                .core
                .invalid(format!("best solution for Fc {fc} only scores {score}")));
        }
        self.core.write(bom, "C1", SlotType::Capacitor, best.c1, ctx)?;
        self.core.write(bom, "C2", SlotType::Capacitor, best.c2, ctx)?;
        self.core.write(bom, "R1", SlotType::Resistor, best.r1, ctx)?;
        self.core.write(bom, "R2", SlotType::Resistor, best.r2, ctx)
    }

    fn current(&self, bom: &ComponentList) -> Result<(f64, f64), MotifError> {
        let r1 = self.core.read(bom, "R1", SlotType::Resistor)?;
        let r2 = self.core.read(bom, "R2", SlotType::Resistor)?;
        let c1 = self.core.read(bom, "C1", SlotType::Capacitor)?;
        let c2 = self.core.read(bom, "C2", SlotType::Capacitor)?;
        Ok(response(f64_of(&r1), f64_of(&r2), f64_of(&c1), f64_of(&c2)))
    }
}

impl Motif for Lpf2 {
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
            ("poly", "Butterworth"),
            ("Rseries", "E24"),
            ("Rmin", "470E"),
            ("Rmax", "47K"),
            ("Cseries", "E6"),
            ("Cmin", "100pF"),
            ("Cmax", "22uF"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn compute(&self, name: &str, bom: &ComponentList) -> Result<Quantity, MotifError> {
        let (fc, q) = self.current(bom)?;
        let (kind, value) = match name {
            "Fc" => (QuantityKind::Frequency, fc),
            "Q" => (QuantityKind::Gain, q),
            _ => return Err(self.core.unknown_parameter(name)),
        };
        let value = Decimal::from_f64(value)
            .ok_or_else(|| self.core.invalid(format!("{name} is not finite")))?;
        Ok(Quantity::new(kind, value))
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
            "Q" => Err(self.core.read_only(name)),
            _ => Err(self.core.unknown_parameter(name)),
        }
    }

    fn apply_config(
        &self,
        bom: &mut ComponentList,
        ctx: &SolveContext<'_>,
    ) -> Result<(), MotifError> {
        let fc = self.core.config_quantity("Fc", QuantityKind::Frequency)?;
        self.solve_fc(fc, bom, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::series::SeriesRegistry;

    const LISTING: &str = "\
refdes,device,value,footprint,fillstatus,motif
R20,RES SMD,10K/0.063W,0402,CONF,LPF2.aa:R1
R21,RES SMD,10K/0.063W,0402,CONF,LPF2.aa:R2
C20,CAP CER SMD,1nF,0402,CONF,LPF2.aa:C1
C21,CAP CER SMD,1nF,0402,CONF,LPF2.aa:C2
";

    fn hz(s: &str) -> Quantity {
        Quantity::parse(QuantityKind::Frequency, s).unwrap()
    }

    #[test]
    fn butterworth_at_default_cutoff() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);

        motif.configure(MotifConfig::new(), &mut list, &ctx).unwrap();
        assert_eq!(value(&list, "C20"), "4.7nF");
        assert_eq!(value(&list, "C21"), "10nF");
        assert_eq!(value(&list, "R20"), "2K/0.063W");
        assert_eq!(value(&list, "R21"), "1.2K/0.063W");

        let fc = motif.parameter("Fc", &list).unwrap();
        assert!(fc.value() > dec!(14980) && fc.value() < dec!(14990), "{fc}");
        let q = motif.parameter("Q", &list).unwrap();
        assert_eq!(q.kind(), QuantityKind::Gain);
        assert!(q.value() > dec!(0.706) && q.value() < dec!(0.707), "{q}");
    }

    #[test]
    fn retarget_cutoff() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);
        motif.configure(MotifConfig::new(), &mut list, &ctx).unwrap();

        motif.set_parameter("Fc", hz("10kHz"), &mut list, &ctx).unwrap();
        assert_eq!(value(&list, "C20"), "4.7nF");
        assert_eq!(value(&list, "C21"), "10nF");
        assert_eq!(value(&list, "R20"), "3K/0.063W");
        assert_eq!(value(&list, "R21"), "1.8K/0.063W");

        assert!(matches!(
            motif.set_parameter("Q", Quantity::new(QuantityKind::Gain, dec!(0.5)), &mut list, &ctx),
            Err(MotifError::ReadOnlyParameter { .. })
        ));
    }

    #[test]
    fn unreachable_cutoff_is_rejected() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);
        motif.configure(MotifConfig::new(), &mut list, &ctx).unwrap();

        let before = list.clone();
        let err = motif
            .set_parameter("Fc", hz("10MHz"), &mut list, &ctx)
            .unwrap_err();
        assert!(matches!(err, MotifError::Validation { .. }), "{err}");
        assert_eq!(list, before);
    }

    #[test]
    fn only_butterworth_is_supported() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);
        assert!(matches!(
            motif.configure(config(&[("poly", "Bessel")]), &mut list, &ctx),
            Err(MotifError::Validation { .. })
        ));
        assert!(motif.core().config().is_none());
    }
}
