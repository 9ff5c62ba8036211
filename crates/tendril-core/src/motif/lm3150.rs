use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;

use crate::component::ComponentList;
use crate::quantity::{Quantity, QuantityKind};
use crate::series::SeriesKind;

use super::solve::checked_div;
use super::{
    first_above, min_by_error, Motif, MotifConfig, MotifCore, MotifError, MotifRef, SlotType,
    SolveContext,
};

const SLOTS: &[(&str, SlotType)] = &[
    ("RFB1", SlotType::Resistor),
    ("RFB2", SlotType::Resistor),
    ("RON", SlotType::Resistor),
    ("CFF", SlotType::Capacitor),
    ("RLIM", SlotType::Resistor),
];
const OPTIONAL_SLOTS: &[(&str, SlotType)] = &[
    ("CIN0", SlotType::PowerCapacitor),
    ("CIN1", SlotType::PowerCapacitor),
    ("CIN2", SlotType::PowerCapacitor),
    ("COUT0", SlotType::PowerCapacitor),
    ("COUT1", SlotType::PowerCapacitor),
    ("CDIN", SlotType::PowerCapacitor),
    ("L1", SlotType::Inductor),
];
const INPUT_BANK: &[&str] = &["CIN0", "CIN1", "CIN2"];
const OUTPUT_BANK: &[&str] = &["COUT0", "COUT1"];

const PARAMETERS: &[(&str, QuantityKind)] = &[
    ("Vout", QuantityKind::Voltage),
    ("Fsw", QuantityKind::Frequency),
    ("Ilim", QuantityKind::Current),
    ("Vin_typ", QuantityKind::Voltage),
    ("ET_max", QuantityKind::VoltSeconds),
    ("ET_min", QuantityKind::VoltSeconds),
    ("Co_min", QuantityKind::Capacitance),
    ("Co_ESR_max", QuantityKind::Resistance),
    ("Co_ESR_min", QuantityKind::Resistance),
    ("Co_eff", QuantityKind::Capacitance),
    ("Co_ESR_eff", QuantityKind::Resistance),
    ("Ci_min", QuantityKind::Capacitance),
    ("Ci_Irms_min", QuantityKind::Current),
    ("Ci_eff", QuantityKind::Capacitance),
    ("Ci_ESR_eff", QuantityKind::Resistance),
    ("Cdi_min", QuantityKind::Capacitance),
    ("Vin_ripple", QuantityKind::Voltage),
    ("fet_Vds_min", QuantityKind::Voltage),
    ("fet_Qg_max", QuantityKind::Charge),
    ("fet_Qg", QuantityKind::Charge),
    ("Pcond", QuantityKind::Power),
    ("Psw", QuantityKind::Power),
    ("Pdh", QuantityKind::Power),
    ("Pdl", QuantityKind::Power),
];

/// On-time charge constant: `Fsw = Vout / (ON_CHARGE · RON)`.
const ON_CHARGE: Decimal = dec!(0.0000000001);
/// Current limit sense current.
const ILIM_SENSE: Decimal = dec!(0.000085);
const ILIM_FACTOR: Decimal = dec!(0.87);
/// Fraction of the on/off-time switching limit the design targets.
const FSW_MARGIN: Decimal = dec!(0.8);
/// Datasheet range for the lower feedback resistor.
const RFB1_MIN: Decimal = dec!(8200);
const RFB1_MAX: Decimal = dec!(10000);

/// `Co_min = CO_MIN_K / (Fsw² · L)`.
const CO_MIN_K: Decimal = dec!(70);
/// Output ripple window the ESR limits are derived from.
const CO_RIPPLE_MAX: Decimal = dec!(0.080);
const CO_RIPPLE_MIN: Decimal = dec!(0.015);
/// Gate drive current available from the internal regulator.
const GATE_DRIVE_MAX: Decimal = dec!(0.065);
const VDS_MARGIN: Decimal = dec!(1.2);
/// Damping capacitor relative to the effective input capacitance.
const CDIN_RATIO: Decimal = dec!(5);
// High side driver: pull-up and pull-down resistance, drive voltage, FET threshold
const DRIVER_PULLUP: Decimal = dec!(8.5);
const DRIVER_PULLDOWN: Decimal = dec!(6.8);
const DRIVER_VOLTAGE: Decimal = dec!(6);
const FET_VTH: Decimal = dec!(2.5);

/// Support network of an LM3150 constant on-time buck controller.
///
/// Setting `Vout` picks the feedback divider, then derives the on-time resistor, the
/// feed-forward capacitor and the current limit resistor from the configured operating
/// range. Configuring also fills the power stage (input and output capacitor banks, the
/// damping capacitor and the inductor) with the configured part numbers. Inductor,
/// capacitor and FET figures are exposed as read-only parameters.
#[derive(Debug, Clone)]
pub struct Lm3150 {
    core: MotifCore,
}

struct Divider {
    rfb1: Quantity,
    rfb2: Quantity,
}

/// Operating point the power stage figures are derived from.
struct Operating {
    vout: Decimal,
    fsw: Decimal,
    vin_min: Decimal,
    vin_max: Decimal,
    vin_typ: Decimal,
    iout: Decimal,
}

impl Operating {
    fn duty(&self, vin: Decimal) -> Result<Decimal, MotifError> {
        Ok(checked_div(self.vout, vin)?)
    }

    /// Volt-seconds across the inductor during one on-time at `vin`.
    fn et(&self, vin: Decimal) -> Result<Decimal, MotifError> {
        Ok(checked_div((vin - self.vout) * self.duty(vin)?, self.fsw)?)
    }

    /// Input ripple charge per cycle over Fsw: `Iout · D · (1 - D) / Fsw`.
    fn input_charge(&self) -> Result<Decimal, MotifError> {
        let d = self.duty(self.vin_typ)?;
        Ok(checked_div(self.iout * d * (Decimal::ONE - d), self.fsw)?)
    }
}

impl Lm3150 {
    pub fn new(motif_ref: MotifRef) -> Self {
        Self {
            core: MotifCore::new(motif_ref),
        }
    }

    fn config(&self, key: &str, kind: QuantityKind) -> Result<Decimal, MotifError> {
        Ok(self.core.config_quantity(key, kind)?.value())
    }

    fn divider_vout(&self, rfb1: Decimal, rfb2: Decimal) -> Result<Decimal, MotifError> {
        let vref = self.config("Vref", QuantityKind::Voltage)?;
        Ok(vref * checked_div(rfb1 + rfb2, rfb1)?)
    }

    fn fsw(vout: Decimal, ron: Decimal) -> Result<Decimal, MotifError> {
        Ok(checked_div(vout, ON_CHARGE * ron)?)
    }

    /// Highest switching frequency the on-time and off-time limits allow, with margin.
    fn fsw_limit(&self, vout: Decimal) -> Result<Decimal, MotifError> {
        let vin_min = self.config("Vin_min", QuantityKind::Voltage)?;
        let vin_max = self.config("Vin_max", QuantityKind::Voltage)?;
        let ton_min = self.config("Ton_min", QuantityKind::TimeSpan)?;
        let toff_min = self.config("Toff_min", QuantityKind::TimeSpan)?;
        let toff_fet = self.config("Toff_fet", QuantityKind::TimeSpan)?;

        let d_min = checked_div(vout, vin_max)?;
        let d_max = checked_div(vout, vin_min)?;
        if d_max >= Decimal::ONE {
            return Err(self
                .core
                .invalid(format!("Vin_min {vin_min}V does not exceed Vout {vout}V")));
        }
        let on_limit = checked_div(d_min, ton_min)?;
        let off_limit = checked_div(Decimal::ONE - d_max, toff_min + toff_fet)?;
        Ok(FSW_MARGIN * on_limit.min(off_limit))
    }

    fn current_limit_target(&self) -> Result<Quantity, MotifError> {
        let iout = self.config("Iout", QuantityKind::Current)?;
        let rdson = self.config("fet_Rdson", QuantityKind::Resistance)?;
        let target = checked_div(iout * ILIM_FACTOR, ILIM_SENSE)? * rdson;
        Ok(Quantity::new(QuantityKind::Resistance, target))
    }

    /// Feedback pair with the output voltage closest to `target`.
    fn solve_divider(
        &self,
        target: Quantity,
        ctx: &SolveContext<'_>,
    ) -> Result<Divider, MotifError> {
        let series_name = self.core.config_value("Rseries")?;
        let lower = ctx.series.generator(
            series_name,
            SeriesKind::Resistor,
            Some(Quantity::new(QuantityKind::Resistance, RFB1_MIN)),
            Some(Quantity::new(QuantityKind::Resistance, RFB1_MAX)),
        )?;
        let upper = self
            .core
            .series(ctx, "Rseries", "Rmin", "Rmax", SlotType::Resistor)?;

        let rfb1_values: Vec<Quantity> = lower.iter().collect();
        let rfb2_values: Vec<Quantity> = upper.iter().collect();
        let pairs = rfb1_values
            .iter()
            .flat_map(|a| rfb2_values.iter().map(move |b| (*a, *b)));

        let mut failure = None;
        let best = min_by_error(pairs, |(a, b)| {
            match self.divider_vout(a.value(), b.value()) {
                Ok(vout) => Ok((vout - target.value()).abs()),
                Err(e) => {
                    if failure.is_none() {
                        failure = Some(e);
                    }
                    Ok(Decimal::MAX)
                }
            }
        })?;
        if let Some(e) = failure {
            return Err(e);
        }
        let (rfb1, rfb2) = best.ok_or_else(|| self.core.exhausted(&lower, "RFB1", target))?;
        log::debug!("{}: divider {rfb1} / {rfb2}", self.core.motif_ref());
        Ok(Divider { rfb1, rfb2 })
    }

    fn operating(&self, bom: &ComponentList) -> Result<Operating, MotifError> {
        let rfb1 = self.core.read(bom, "RFB1", SlotType::Resistor)?;
        let rfb2 = self.core.read(bom, "RFB2", SlotType::Resistor)?;
        let ron = self.core.read(bom, "RON", SlotType::Resistor)?;
        let vout = self.divider_vout(rfb1.value(), rfb2.value())?;
        let vin_min = self.config("Vin_min", QuantityKind::Voltage)?;
        let vin_max = self.config("Vin_max", QuantityKind::Voltage)?;
        let vin_typ = if self.core.config().is_some_and(|c| c.contains_key("Vin_typ")) {
            self.config("Vin_typ", QuantityKind::Voltage)?
        } else {
            (vin_min + vin_max) / dec!(2)
        };
        Ok(Operating {
            vout,
            fsw: Self::fsw(vout, ron.value())?,
            vin_min,
            vin_max,
            vin_typ,
            iout: self.config("Iout", QuantityKind::Current)?,
        })
    }

    /// Number of fitted capacitors in a bank, between one and the bank size.
    fn bank_size(&self, key: &str, bank: &[&str]) -> Result<usize, MotifError> {
        let count = self.config(key, QuantityKind::Count)?;
        count
            .to_usize()
            .filter(|n| count.fract().is_zero() && (1..=bank.len()).contains(n))
            .ok_or_else(|| {
                self.core.invalid(format!(
                    "{key} must be between 1 and {}, got {count}",
                    bank.len()
                ))
            })
    }

    /// Parallel capacitance and ESR of a bank.
    fn bank(
        &self,
        mult_key: &str,
        bank: &[&str],
        value_key: &str,
        esr_key: &str,
    ) -> Result<(Decimal, Decimal), MotifError> {
        let n = Decimal::from(self.bank_size(mult_key, bank)?);
        let each = self.config(value_key, QuantityKind::Capacitance)?;
        let esr = self.config(esr_key, QuantityKind::Resistance)?;
        Ok((n * each, checked_div(esr, n)?))
    }

    fn conduction_loss(&self, op: &Operating, duty: Decimal) -> Result<Decimal, MotifError> {
        let rdson = self.config("fet_Rdson", QuantityKind::Resistance)?;
        Ok(op.iout * op.iout * rdson * duty)
    }

    fn switching_loss(&self, op: &Operating) -> Result<Decimal, MotifError> {
        let qgh = self.config("fet_Qg_hs_5V", QuantityKind::Charge)?;
        let drive = checked_div(DRIVER_PULLUP, DRIVER_VOLTAGE - FET_VTH)?
            + checked_div(DRIVER_PULLDOWN, FET_VTH)?;
        Ok(dec!(0.5) * op.vin_typ * op.iout * qgh * op.fsw * drive)
    }

    /// Read-only figures for the inductor, the capacitor banks and the FETs.
    fn derived(&self, name: &str, bom: &ComponentList) -> Result<Quantity, MotifError> {
        use QuantityKind::*;

        let op = self.operating(bom)?;
        let d_typ = op.duty(op.vin_typ)?;
        let inductance = || self.config("L_num", Inductance);
        let (kind, value) = match name {
            "Vin_typ" => (Voltage, op.vin_typ),
            "ET_max" => (VoltSeconds, op.et(op.vin_max)?),
            "ET_min" => (VoltSeconds, op.et(op.vin_min)?),
            "Co_min" => {
                let l = inductance()?;
                (Capacitance, checked_div(CO_MIN_K, op.fsw * op.fsw * l)?)
            }
            "Co_ESR_max" => (
                Resistance,
                checked_div(CO_RIPPLE_MAX * inductance()?, op.et(op.vin_min)?)?,
            ),
            "Co_ESR_min" => {
                let et_max = op.et(op.vin_max)?;
                let co = self.config("Co_num", Capacitance)?;
                let ripple = checked_div(CO_RIPPLE_MIN * inductance()?, et_max)?;
                let stability = checked_div(et_max, (op.vin_typ - op.vout) * co)?;
                (Resistance, ripple.max(stability))
            }
            "Co_eff" => (
                Capacitance,
                self.bank("Co_mult", OUTPUT_BANK, "Co_num", "Co_esr")?.0,
            ),
            "Co_ESR_eff" => (
                Resistance,
                self.bank("Co_mult", OUTPUT_BANK, "Co_num", "Co_esr")?.1,
            ),
            "Ci_min" => {
                let ripple = self.config("Vin_ripple_max", Gain)? * op.vin_typ;
                (Capacitance, checked_div(op.input_charge()?, ripple)?)
            }
            "Ci_Irms_min" => (Current, op.iout / dec!(2)),
            "Ci_eff" => (
                Capacitance,
                self.bank("Ci_mult", INPUT_BANK, "Ci_num", "Ci_esr")?.0,
            ),
            "Ci_ESR_eff" => (
                Resistance,
                self.bank("Ci_mult", INPUT_BANK, "Ci_num", "Ci_esr")?.1,
            ),
            "Cdi_min" => (
                Capacitance,
                CDIN_RATIO * self.bank("Ci_mult", INPUT_BANK, "Ci_num", "Ci_esr")?.0,
            ),
            "Vin_ripple" => {
                let (ci_eff, _) = self.bank("Ci_mult", INPUT_BANK, "Ci_num", "Ci_esr")?;
                (Voltage, checked_div(op.input_charge()?, ci_eff)?)
            }
            "fet_Vds_min" => (Voltage, VDS_MARGIN * op.vin_max),
            "fet_Qg_max" => (Charge, checked_div(GATE_DRIVE_MAX, op.fsw)?),
            "fet_Qg" => (
                Charge,
                self.config("fet_Qg_hs_5V", Charge)? + self.config("fet_Qg_ls_6V", Charge)?,
            ),
            "Pcond" => (Power, self.conduction_loss(&op, d_typ)?),
            "Psw" => (Power, self.switching_loss(&op)?),
            "Pdh" => (
                Power,
                self.conduction_loss(&op, d_typ)? + self.switching_loss(&op)?,
            ),
            "Pdl" => (Power, self.conduction_loss(&op, Decimal::ONE - d_typ)?),
            _ => return Err(self.core.unknown_parameter(name)),
        };
        Ok(Quantity::new(kind, value))
    }

    fn fit_part(
        &self,
        bom: &mut ComponentList,
        slot: &str,
        slot_type: SlotType,
        part_key: &str,
    ) -> Result<(), MotifError> {
        if !self.core.is_bound(slot) {
            return Ok(());
        }
        let part = self.core.config_value(part_key)?;
        self.core.assign_part(bom, slot, slot_type, part)
    }

    /// Fill every bound slot of a bank with the configured part; positions past the
    /// configured count are marked DNP.
    fn fit_bank(
        &self,
        bom: &mut ComponentList,
        bank: &[&str],
        part_key: &str,
        mult_key: &str,
    ) -> Result<(), MotifError> {
        let fitted = self.bank_size(mult_key, bank)?;
        for (idx, slot) in bank.iter().enumerate() {
            self.fit_part(bom, slot, SlotType::PowerCapacitor, part_key)?;
            if idx >= fitted {
                self.core.mark_dnp(bom, slot)?;
            }
        }
        Ok(())
    }

    fn fit_power_stage(&self, bom: &mut ComponentList) -> Result<(), MotifError> {
        self.fit_bank(bom, INPUT_BANK, "Ci_pno", "Ci_mult")?;
        self.fit_bank(bom, OUTPUT_BANK, "Co_pno", "Co_mult")?;
        self.fit_part(bom, "CDIN", SlotType::PowerCapacitor, "Cdi_pno")?;
        self.fit_part(bom, "L1", SlotType::Inductor, "L_pno")
    }

    fn solve_vout(
        &self,
        target: Quantity,
        bom: &mut ComponentList,
        ctx: &SolveContext<'_>,
    ) -> Result<(), MotifError> {
        let Divider { rfb1, rfb2 } = self.solve_divider(target, ctx)?;
        self.core.write(bom, "RFB1", SlotType::Resistor, rfb1, ctx)?;
        self.core.write(bom, "RFB2", SlotType::Resistor, rfb2, ctx)?;
        let vout = self.divider_vout(rfb1.value(), rfb2.value())?;

        // On-time resistor: highest switching frequency below the limit
        let fs_max = self.fsw_limit(vout)?;
        let resistors = self
            .core
            .series(ctx, "Rseries", "Rmin", "Rmax", SlotType::Resistor)?;
        let mut ron: Option<(Quantity, Decimal)> = None;
        for r in resistors.iter() {
            let fsw = Self::fsw(vout, r.value())?;
            if fsw < fs_max && ron.is_none_or(|(_, best)| fsw > best) {
                ron = Some((r, fsw));
            }
        }
        let (ron, fsw) = match ron {
            Some(found) => found,
            None => {
                let target = Quantity::new(
                    QuantityKind::Resistance,
                    checked_div(vout, ON_CHARGE * fs_max)?,
                );
                return Err(self.core.exhausted(&resistors, "RON", target));
            }
        };
        self.core.write(bom, "RON", SlotType::Resistor, ron, ctx)?;

        // Feed-forward capacitor across the upper feedback resistor
        let vin_min = self.config("Vin_min", QuantityKind::Voltage)?;
        let zfb = checked_div(rfb1.value() * rfb2.value(), rfb1.value() + rfb2.value())?;
        let cff_target = Quantity::new(
            QuantityKind::Capacitance,
            checked_div(checked_div(vout, vin_min)?, fsw * zfb)?,
        );
        let capacitors = self
            .core
            .series(ctx, "Cseries", "Cmin", "Cmax", SlotType::Capacitor)?;
        let cff = capacitors
            .closest_value(&cff_target)
            .ok_or_else(|| self.core.exhausted(&capacitors, "CFF", cff_target))?;
        self.core.write(bom, "CFF", SlotType::Capacitor, cff, ctx)?;

        let rlim_target = self.current_limit_target()?;
        let rlim = first_above(resistors.iter(), &rlim_target)
            .ok_or_else(|| self.core.exhausted(&resistors, "RLIM", rlim_target))?;
        self.core.write(bom, "RLIM", SlotType::Resistor, rlim, ctx)
    }
}

impl Motif for Lm3150 {
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
            ("Vref", "0.6V"),
            ("Rseries", "E24"),
            ("Rmin", "10E"),
            ("Rmax", "10M"),
            ("Cseries", "E12"),
            ("Cmin", "1pF"),
            ("Cmax", "100nF"),
            ("Iout", "10A"),
            ("Vin_min", "10V"),
            ("Vin_max", "26V"),
            ("Ton_min", "200ns"),
            ("Toff_min", "525ns"),
            ("Toff_fet", "200ns"),
            ("Vin_ripple_max", "0.05"),
            ("Co_mult", "1"),
            ("Co_esr", "10m"),
            ("Ci_mult", "1"),
            ("Ci_esr", "10m"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn compute(&self, name: &str, bom: &ComponentList) -> Result<Quantity, MotifError> {
        let rfb1 = self.core.read(bom, "RFB1", SlotType::Resistor)?;
        let rfb2 = self.core.read(bom, "RFB2", SlotType::Resistor)?;
        let vout = self.divider_vout(rfb1.value(), rfb2.value())?;
        match name {
            "Vout" => Ok(Quantity::new(QuantityKind::Voltage, vout)),
            "Fsw" => {
                let ron = self.core.read(bom, "RON", SlotType::Resistor)?;
                Ok(Quantity::new(
                    QuantityKind::Frequency,
                    Self::fsw(vout, ron.value())?,
                ))
            }
            "Ilim" => {
                let rlim = self.core.read(bom, "RLIM", SlotType::Resistor)?;
                let rdson = self.config("fet_Rdson", QuantityKind::Resistance)?;
                Ok(Quantity::new(
                    QuantityKind::Current,
                    checked_div(rlim.value() * ILIM_SENSE, ILIM_FACTOR * rdson)?,
                ))
            }
            _ => self.derived(name, bom),
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
            _ if PARAMETERS.iter().any(|(p, _)| *p == name) => Err(self.core.read_only(name)),
            _ => Err(self.core.unknown_parameter(name)),
        }
    }

    fn apply_config(
        &self,
        bom: &mut ComponentList,
        ctx: &SolveContext<'_>,
    ) -> Result<(), MotifError> {
        let vout = self.core.config_quantity("Vout", QuantityKind::Voltage)?;
        self.solve_vout(vout, bom, ctx)?;
        self.fit_power_stage(bom)
    }

    fn check(&self, bom: &ComponentList) -> Result<(), MotifError> {
        let vout = self.compute("Vout", bom)?;
        let fsw = self.compute("Fsw", bom)?;
        let fs_max = self.fsw_limit(vout.value())?;
        if fsw.value() >= fs_max {
            return Err(self.core.invalid(format!(
                "switching frequency {fsw} exceeds the on/off-time limit"
            )));
        }
        let ilim = self.compute("Ilim", bom)?;
        let iout = self.core.config_quantity("Iout", QuantityKind::Current)?;
        if ilim < iout {
            return Err(self
                .core
                .invalid(format!("current limit {ilim} is below Iout {iout}")));
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
R10,RES SMD,10K,0402,CONF,LM3150.1:RFB1
R11,RES SMD,10K,0402,CONF,LM3150.1:RFB2
R12,RES SMD,10K,0402,CONF,LM3150.1:RON
R13,RES SMD,10K,0402,CONF,LM3150.1:RLIM
C10,CAP CER SMD,1nF,0402,CONF,LM3150.1:CFF
";

    #[test]
    fn configure_5v_rail() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);

        motif
            .configure(
                config(&[("Vout", "5V"), ("fet_Rdson", "10m")]),
                &mut list,
                &ctx,
            )
            .unwrap();

        assert_eq!(value(&list, "R10"), "9.1K");
        assert_eq!(value(&list, "R11"), "68K");
        assert_eq!(value(&list, "R12"), "100K");
        assert_eq!(value(&list, "C10"), "120pF");
        assert_eq!(value(&list, "R13"), "1.1K");

        let vout = motif.parameter("Vout", &list).unwrap();
        assert!(vout.value() > dec!(5.08) && vout.value() < dec!(5.09), "{vout}");
        let fsw = motif.parameter("Fsw", &list).unwrap();
        assert!(fsw.value() > dec!(500000) && fsw.value() < dec!(520000), "{fsw}");
        let ilim = motif.parameter("Ilim", &list).unwrap();
        assert!(ilim.value() > dec!(10), "{ilim}");
    }

    #[test]
    fn rdson_is_required() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);
        let before = list.clone();
        let err = motif
            .configure(config(&[("Vout", "5V")]), &mut list, &ctx)
            .unwrap_err();
        assert!(matches!(err, MotifError::MissingConfig { ref key, .. } if key == "fet_Rdson"));
        assert_eq!(list, before);
    }

    #[test]
    fn series_without_rfb1_range_is_exhausted() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);
        // E6 has no 8.2K, so the feedback range never starts
        let err = motif
            .configure(
                config(&[("Vout", "5V"), ("fet_Rdson", "10m"), ("Rseries", "E6")]),
                &mut list,
                &ctx,
            )
            .unwrap_err();
        assert!(matches!(err, MotifError::SeriesExhausted { ref slot, .. } if slot == "RFB1"));
    }

    #[test]
    fn output_above_input_is_rejected() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);
        let err = motif
            .configure(
                config(&[("Vout", "12V"), ("fet_Rdson", "10m")]),
                &mut list,
                &ctx,
            )
            .unwrap_err();
        assert!(matches!(err, MotifError::Validation { .. }), "{err}");
    }

    const POWER_STAGE: &str = "\
refdes,device,value,footprint,fillstatus,motif
R10,RES SMD,10K,0402,CONF,LM3150.1:RFB1
R11,RES SMD,10K,0402,CONF,LM3150.1:RFB2
R12,RES SMD,10K,0402,CONF,LM3150.1:RON
R13,RES SMD,10K,0402,CONF,LM3150.1:RLIM
C10,CAP CER SMD,1nF,0402,CONF,LM3150.1:CFF
C20,CAP CER SMD,10uF,1206,CONF,LM3150.1:CIN0
C21,CAP CER SMD,10uF,1206,CONF,LM3150.1:CIN1
C22,CAP CER SMD,10uF,1206,CONF,LM3150.1:CIN2
C23,CAP TANT SMD,100uF,7343,CONF,LM3150.1:COUT0
C24,CAP TANT SMD,100uF,7343,CONF,LM3150.1:COUT1
C25,CAP AL SMD,100uF,0810,CONF,LM3150.1:CDIN
L1,INDUCTOR SMD,4.7uH,0606,CONF,LM3150.1:L1
";

    fn power_stage_config(extra: &[(&str, &str)]) -> MotifConfig {
        let mut options = config(&[
            ("Vout", "5V"),
            ("fet_Rdson", "10m"),
            ("fet_Qg_hs_5V", "10nC"),
            ("fet_Qg_ls_6V", "12nC"),
            ("L_num", "4.7uH"),
            ("L_pno", "XAL6060-472"),
            ("Co_num", "100uF"),
            ("Co_pno", "T520D107M006"),
            ("Ci_num", "10uF"),
            ("Ci_pno", "GRM32ER71H106K"),
            ("Ci_mult", "2"),
            ("Cdi_pno", "EEE-FK1H101P"),
        ]);
        options.extend(config(extra));
        options
    }

    fn between(q: Quantity, low: Decimal, high: Decimal) {
        assert!(q.value() > low && q.value() < high, "{q} not in ({low}, {high})");
    }

    #[test]
    fn power_stage_is_fitted_from_configuration() {
        let (mut motif, mut list) = bound(POWER_STAGE);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);

        motif
            .configure(power_stage_config(&[]), &mut list, &ctx)
            .unwrap();

        assert_eq!(value(&list, "R11"), "68K");
        for refdes in ["C20", "C21", "C22"] {
            assert_eq!(value(&list, refdes), "GRM32ER71H106K");
        }
        assert_eq!(list.get("C21").unwrap().fill_status, FillStatus::Normal);
        assert_eq!(list.get("C22").unwrap().fill_status, FillStatus::Dnp);
        assert_eq!(value(&list, "C23"), "T520D107M006");
        assert_eq!(list.get("C23").unwrap().fill_status, FillStatus::Normal);
        assert_eq!(list.get("C24").unwrap().fill_status, FillStatus::Dnp);
        assert_eq!(value(&list, "C25"), "EEE-FK1H101P");
        assert_eq!(value(&list, "L1"), "XAL6060-472");
    }

    #[test]
    fn power_stage_figures() {
        let (mut motif, mut list) = bound(POWER_STAGE);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);
        motif
            .configure(power_stage_config(&[]), &mut list, &ctx)
            .unwrap();
        let p = |name: &str| motif.parameter(name, &list).unwrap();

        // Vout 5.08V at 508kHz between 10V and 26V
        assert_eq!(p("Vin_typ").to_string(), "18V");
        between(p("ET_max"), dec!(0.00000804), dec!(0.00000805));
        between(p("ET_min"), dec!(0.00000491), dec!(0.00000492));
        between(p("Co_min"), dec!(0.0000576), dec!(0.0000577));
        between(p("Co_ESR_max"), dec!(0.0764), dec!(0.0765));
        between(p("Co_ESR_min"), dec!(0.00876), dec!(0.00877));
        assert_eq!(p("Co_eff").to_string(), "100uF");
        assert_eq!(p("Ci_eff").to_string(), "20uF");
        assert_eq!(p("Ci_ESR_eff").to_string(), "5m");
        assert_eq!(p("Cdi_min").to_string(), "100uF");
        assert_eq!(p("Ci_Irms_min").to_string(), "5A");
        between(p("Ci_min"), dec!(0.00000442), dec!(0.00000443));
        between(p("Vin_ripple"), dec!(0.199), dec!(0.2));
        assert_eq!(p("fet_Vds_min").to_string(), "31.2V");
        assert_eq!(p("fet_Qg").to_string(), "22nC");
        between(p("fet_Qg_max"), dec!(0.000000127), dec!(0.000000128));
        between(p("Pcond"), dec!(0.282), dec!(0.283));
        between(p("Psw"), dec!(2.355), dec!(2.356));
        between(p("Pdh"), dec!(2.637), dec!(2.638));
        between(p("Pdl"), dec!(0.717), dec!(0.718));
        assert_eq!(p("Pdh").kind(), QuantityKind::Power);

        let before = list.clone();
        assert!(matches!(
            motif.set_parameter(
                "Pdh",
                Quantity::new(QuantityKind::Power, dec!(1)),
                &mut list,
                &ctx
            ),
            Err(MotifError::ReadOnlyParameter { .. })
        ));
        assert_eq!(list, before);
    }

    #[test]
    fn derived_figures_need_their_inputs() {
        let (mut motif, mut list) = bound(LISTING);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);
        motif
            .configure(
                config(&[("Vout", "5V"), ("fet_Rdson", "10m"), ("Vin_typ", "12V")]),
                &mut list,
                &ctx,
            )
            .unwrap();

        assert_eq!(motif.parameter("Vin_typ", &list).unwrap().to_string(), "12V");
        assert!(matches!(
            motif.parameter("Co_min", &list),
            Err(MotifError::MissingConfig { ref key, .. }) if key == "L_num"
        ));
        assert!(matches!(
            motif.parameter("Psw", &list),
            Err(MotifError::MissingConfig { ref key, .. }) if key == "fet_Qg_hs_5V"
        ));
    }

    #[test]
    fn bank_size_is_bounded_by_slots() {
        let (mut motif, mut list) = bound(POWER_STAGE);
        let catalog = catalog();
        let series = SeriesRegistry::new();
        let ctx = SolveContext::new(&catalog, &series);
        let before = list.clone();

        let err = motif
            .configure(power_stage_config(&[("Ci_mult", "4")]), &mut list, &ctx)
            .unwrap_err();
        assert!(matches!(err, MotifError::Validation { .. }), "{err}");
        assert_eq!(list, before);

        let mut options = power_stage_config(&[]);
        options.remove("L_pno");
        let err = motif.configure(options, &mut list, &ctx).unwrap_err();
        assert!(matches!(err, MotifError::MissingConfig { ref key, .. } if key == "L_pno"));
        assert_eq!(list, before);
    }
}
