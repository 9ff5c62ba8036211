//! Device classes and component identity strings.
//!
//! An ident is the canonical `"{device} {value} {footprint}"` string that keys BOM lines.
//! Device classes form a closed vocabulary; anything outside it is rejected when an ident
//! is parsed.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::quantity::{ParseError, Quantity, QuantityKind};

macro_rules! device_classes {
    ($($variant:ident => $name:literal, $desc:literal;)*) => {
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum DeviceClass {
            $($variant,)*
        }

        impl DeviceClass {
            pub const ALL: &'static [DeviceClass] = &[$(DeviceClass::$variant,)*];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(DeviceClass::$variant => $name,)*
                }
            }

            pub fn description(self) -> &'static str {
                match self {
                    $(DeviceClass::$variant => $desc,)*
                }
            }
        }
    };
}

device_classes! {
    ResSmd => "RES SMD", "SMD Resistors";
    ResThru => "RES THRU", "THRU Resistors";
    ResPower => "RES POWER", "Off-PCB power resistors for heatsink mounting";
    ResArrayThru => "RES ARRAY THRU", "THRU Resistor Arrays";
    ResArraySmd => "RES ARRAY SMD", "SMD Resistor Arrays";
    PotTrim => "POT TRIM", "Trimpots";
    PotDial => "POT DIAL", "Dial Pots";
    Varistor => "VARISTOR", "Varistors and MOVs";
    CapCerSmd => "CAP CER SMD", "SMD Ceramic Capacitors";
    CapMicaSmd => "CAP MICA SMD", "SMD Mica Capacitors";
    CapTantSmd => "CAP TANT SMD", "SMD Tantalum Capacitors";
    CapTantThru => "CAP TANT THRU", "THRU Tantalum Capacitors";
    CapCerThru => "CAP CER THRU", "THRU Ceramic Capacitors";
    CapElecThru => "CAP ELEC THRU", "THRU Electrolytic Capacitors";
    CapAlSmd => "CAP AL SMD", "SMD Aluminum Electrolytic and Polymer Capacitors";
    CapPolyThru => "CAP POLY THRU", "THRU Poly Capacitors";
    CapPaperThru => "CAP PAPER THRU", "THRU Paper Capacitors";
    InductorSmd => "INDUCTOR SMD", "SMD Inductors";
    InductorThru => "INDUCTOR THRU", "THRU Inductors";
    FerriteBeadSmd => "FERRITE BEAD SMD", "SMD Ferrite Beads";
    TransformerHeavy => "TRANSFORMER HEAVY", "Transformers";
    TransformerSmd => "TRANSFORMER SMD", "SMD Transformers";
    DiodeSmd => "DIODE SMD", "SMD Diodes";
    DiodeThru => "DIODE THRU", "THRU Diodes";
    ZenerSmd => "ZENER SMD", "SMD Zener Diodes";
    ZenerThru => "ZENER THRU", "THRU Zener Diodes";
    Triac => "TRIAC", "Triacs";
    LedSmd => "LED SMD", "SMD LEDs";
    LedThru => "LED THRU", "THRU LEDs";
    LedModule => "LED MODULE", "LED Modules";
    BridgeRectifier => "BRIDGE RECTIFIER", "Bridge Rectifiers";
    CrystalAt => "CRYSTAL AT", "AT cut Crystals";
    CrystalTf => "CRYSTAL TF", "Tuning Fork Crystals";
    CrystalOsc => "CRYSTAL OSC", "Integrated Crystal Oscillators";
    CrystalVcxo => "CRYSTAL VCXO", "Voltage Controlled Crystal Oscillators";
    TransistorThru => "TRANSISTOR THRU", "THRU Transistors";
    TransistorSmd => "TRANSISTOR SMD", "SMD Transistors";
    MosfetThru => "MOSFET THRU", "THRU MOSFETs";
    MosfetSmd => "MOSFET SMD", "SMD MOSFETs";
    IcThru => "IC THRU", "THRU Hole ICs";
    IcDip => "IC DIP", "DIP ICs";
    IcSmd => "IC SMD", "SMD ICs";
    IcPlcc => "IC PLCC", "PLCC ICs";
    IcPower => "IC POWER", "Off-PCB power ICs for heatsink mounting";
    SocketStrip => "SOCKET STRIP", "SIP sockets";
    SocketDip => "SOCKET DIP", "IC sockets and bases";
    Relay => "RELAY", "Relays";
    ModuleSmps => "MODULE SMPS", "Prefabricated SMPS Modules";
    ModuleLcd => "MODULE LCD", "LCDs";
    Module => "MODULE", "Modules";
    PcbEdge => "PCB EDGE", "Printed Circuit Board Edges";
    Pcb => "PCB", "Printed Circuit Board";
    Buzzer => "BUZZER", "Buzzers";
    ConnCircular => "CONN CIRCULAR", "Circular Connectors";
    ConnBnc => "CONN BNC", "BNC Connectors";
    ConnSma => "CONN SMA", "SMA Connectors";
    ConnBanana => "CONN BANANA", "Banana Connectors";
    ConnBergStrip => "CONN BERG STRIP", "Berg Strips";
    ConnTerminalDmc => "CONN TERMINAL DMC", "DMC series PCB mount Terminals";
    ConnTerminalBlock => "CONN TERMINAL BLOCK", "Terminal Blocks";
    ConnTerminal => "CONN TERMINAL", "Two-part Terminal Connectors";
    ConnDtypeHood => "CONN DTYPE HOOD", "Hoods for DTYPE Connectors";
    ConnDtype => "CONN DTYPE", "DTYPE Connectors";
    ConnInterboard => "CONN INTERBOARD", "Stackthrough Headers";
    ConnFrc => "CONN FRC", "FRC Connectors";
    ConnMinidin => "CONN MINIDIN", "MiniDIN Connectors";
    ConnMolexMinifit => "CONN MOLEX MINIFIT", "Molex Minifit Connectors";
    ConnMolex => "CONN MOLEX", "Molex Connectors";
    ConnSecii => "CONN SECII", "SEC-II Backplane Connectors";
    ConnEdgerate => "CONN EDGERATE", "Edgerate Backplane Connectors";
    ConnBarrel => "CONN BARREL", "DC Power Jacks";
    ConnSip => "CONN SIP", "SIP Connectors";
    ConnStereo => "CONN STEREO", "Stereo Connectors";
    ConnDf13Hous => "CONN DF13 HOUS", "DF13 Connector Housings";
    ConnDf13Wire => "CONN DF13 WIRE", "Prefabricated DF13 Connector Wires";
    ConnDf13Crimp => "CONN DF13 CRIMP", "DF13 Connector Crimps";
    ConnDf13 => "CONN DF13", "DF13 PCB Mount Connectors";
    ConnModular => "CONN MODULAR", "Modular Connectors";
    ConnUsb => "CONN USB", "USB Connectors";
    ConnThc => "CONN THC", "Thermocouple Connectors";
    SwitchTact => "SWITCH TACT", "Tactile Switches";
    SwitchPushbtn => "SWITCH PUSHBTN", "Pushbutton Switches";
    SwitchRocker => "SWITCH ROCKER", "Rocker Switches";
    Testpoint => "TESTPOINT", "Test Points";
    SolderDot => "SOLDER DOT", "Solder Dots";
    Battery => "BATTERY", "Batteries and Battery Holders";
    HeatSink => "HEAT SINK", "Heat Sinks";
    CableFrc => "CABLE FRC", "FRC Cables";
    CableSipSsc => "CABLE SIP SSC", "Prefabricated SIP Cables";
    CableMarker => "CABLE MARKER", "Cable Markers";
    CableRoundShld => "CABLE ROUND SHLD", "Round Shielded Cables";
    WireInsulated => "WIRE INSULATED", "Insulated Wires";
    WireThermocouple => "WIRE THERMOCOUPLE", "Thermocouple Wires";
    SleeveShrink => "SLEEVE SHRINK", "Heat Shrink Sleeves";
    Crimp => "CRIMP", "Crimps";
    Thimble => "THIMBLE", "Thimbles";
    FuseHolder => "FUSE HOLDER", "Fuse Holders";
    Fuse => "FUSE", "Fuses";
    Fan => "FAN", "Fans";
    SocketPower => "SOCKET POWER", "Power Sockets";
    PowerCord => "POWER CORD", "Power Cords";
    UsbCable => "USB CABLE", "USB Cables";
    Rtd => "RTD", "Temperature Dependent Resistors";
    SocketZif => "SOCKET ZIF", "Zero Insertion Force IC Sockets";
    LightPipe => "LIGHT PIPE", "Light Pipes";
}

/// Classes whose idents carry no footprint.
const NO_FOOTPRINT_PREFIXES: &[&str] = &[
    "PCB",
    "CONN",
    "MODULE",
    "CRYSTAL OSC",
    "HEAT SINK",
    "SOCKET POWER",
    "FUSE",
    "SWITCH PUSHBTN",
    "SWITCH ROCKER",
    "TRANSFORMER HEAVY",
    "CRIMP",
    "THIMBLE",
    "CABLE MARKER",
    "POWER CORD",
    "USB CABLE",
];

/// Classes whose footprint field is a length.
const WIRE_PREFIXES: &[&str] = &["CABLE ROUND", "WIRE", "CABLE FRC", "SLEEVE SHRINK"];

/// Coarse grouping used by guideline rules and motif slot checks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DeviceFamily {
    Resistor,
    Capacitor,
    Inductor,
    Crystal,
    Led,
    Other,
}

impl DeviceClass {
    pub fn no_footprint(self) -> bool {
        NO_FOOTPRINT_PREFIXES
            .iter()
            .any(|p| self.as_str().starts_with(p))
    }

    pub fn is_wire(self) -> bool {
        WIRE_PREFIXES.iter().any(|p| self.as_str().starts_with(p))
    }

    pub fn family(self) -> DeviceFamily {
        let name = self.as_str();
        if name.starts_with("RES") {
            DeviceFamily::Resistor
        } else if name.starts_with("CAP") {
            DeviceFamily::Capacitor
        } else if name.starts_with("INDUCTOR") {
            DeviceFamily::Inductor
        } else if name.starts_with("CRYSTAL") {
            DeviceFamily::Crystal
        } else if name.starts_with("LED") {
            DeviceFamily::Led
        } else {
            DeviceFamily::Other
        }
    }

    /// Kind of the leading value segment for classes with a typed value.
    pub fn value_kind(self) -> Option<QuantityKind> {
        match self {
            DeviceClass::ResSmd | DeviceClass::ResThru | DeviceClass::ResPower => {
                Some(QuantityKind::Resistance)
            }
            DeviceClass::InductorSmd | DeviceClass::InductorThru => {
                Some(QuantityKind::Inductance)
            }
            DeviceClass::CrystalAt | DeviceClass::CrystalTf => Some(QuantityKind::Frequency),
            d if d.family() == DeviceFamily::Capacitor => Some(QuantityKind::Capacitance),
            _ => None,
        }
    }

    /// Longest known class that prefixes `s` on a word boundary.
    pub fn match_prefix(s: &str) -> Option<DeviceClass> {
        DeviceClass::ALL
            .iter()
            .copied()
            .filter(|d| {
                s.strip_prefix(d.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
            })
            .max_by_key(|d| d.as_str().len())
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceClass {
    type Err = IdentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        DeviceClass::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| IdentError::UnknownDevice(s.to_string()))
    }
}

impl TryFrom<String> for DeviceClass {
    type Error = IdentError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DeviceClass> for String {
    fn from(d: DeviceClass) -> Self {
        d.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentError {
    #[error("Empty ident")]
    Empty,
    #[error("Unknown device class: '{0}'")]
    UnknownDevice(String),
    #[error("Ident '{0}' has no footprint")]
    MissingFootprint(String),
    #[error("{device} has no typed value")]
    Untyped { device: DeviceClass },
    #[error("Invalid value in '{ident}': {source}")]
    InvalidValue { ident: String, source: ParseError },
    #[error("{0} is not a wire device")]
    NotAWire(DeviceClass),
    #[error("'{value}' is not a valid {device} value")]
    NonStandardValue { device: DeviceClass, value: String },
}

impl IdentError {
    pub fn finding_kind(&self) -> crate::FindingKind {
        match self {
            IdentError::NonStandardValue { .. } => crate::FindingKind::Validation,
            _ => crate::FindingKind::Parse,
        }
    }
}

/// Canonical component identity: device class, value and footprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ident {
    device: DeviceClass,
    value: String,
    footprint: Option<String>,
}

impl Ident {
    /// Build an ident; the footprint is dropped for no-footprint classes.
    pub fn new(device: DeviceClass, value: impl Into<String>, footprint: Option<String>) -> Self {
        let footprint = if device.no_footprint() {
            None
        } else {
            footprint.filter(|f| !f.trim().is_empty())
        };
        Self {
            device,
            value: value.into().trim().to_string(),
            footprint,
        }
    }

    /// Parse `"{device} {value} {footprint}"`, taking the last token as the footprint
    /// unless the class has none.
    pub fn parse(s: &str) -> Result<Self, IdentError> {
        Self::parse_inner(s, false)
    }

    /// Like [`Ident::parse`], but wire idents are read without a footprint, as produced
    /// by wire collapsing.
    pub fn parse_generic(s: &str) -> Result<Self, IdentError> {
        Self::parse_inner(s, true)
    }

    fn parse_inner(s: &str, generic: bool) -> Result<Self, IdentError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IdentError::Empty);
        }
        let device = DeviceClass::match_prefix(s).ok_or_else(|| {
            IdentError::UnknownDevice(s.split_whitespace().next().unwrap_or(s).to_string())
        })?;
        let parts: Vec<&str> = s[device.as_str().len()..].split_whitespace().collect();

        if device.no_footprint() || (generic && device.is_wire()) {
            return Ok(Self {
                device,
                value: parts.join(" "),
                footprint: None,
            });
        }

        match parts.split_last() {
            Some((footprint, value)) => Ok(Self {
                device,
                value: value.join(" "),
                footprint: Some(footprint.to_string()),
            }),
            None => Err(IdentError::MissingFootprint(s.to_string())),
        }
    }

    pub fn device(&self) -> DeviceClass {
        self.device
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn footprint(&self) -> Option<&str> {
        self.footprint.as_deref()
    }

    pub fn is_wire(&self) -> bool {
        self.device.is_wire()
    }

    /// Typed leading segment of the value, e.g. 10K for "10K/0.125W".
    pub fn primary_value(&self) -> Result<Quantity, IdentError> {
        let kind = self.device.value_kind().ok_or(IdentError::Untyped {
            device: self.device,
        })?;
        let head = self.value.split('/').next().unwrap_or_default();
        Quantity::parse(kind, head).map_err(|source| IdentError::InvalidValue {
            ident: self.to_string(),
            source,
        })
    }

    /// Per-unit length of a wire ident, read from its footprint.
    pub fn wire_length(&self) -> Result<Quantity, IdentError> {
        if !self.is_wire() {
            return Err(IdentError::NotAWire(self.device));
        }
        let footprint = self
            .footprint
            .as_deref()
            .ok_or_else(|| IdentError::MissingFootprint(self.to_string()))?;
        Quantity::parse(QuantityKind::Length, footprint).map_err(|source| {
            IdentError::InvalidValue {
                ident: self.to_string(),
                source,
            }
        })
    }

    /// The length-free form of a wire ident; other idents are returned unchanged.
    pub fn collapsed(&self) -> Ident {
        if self.is_wire() {
            Ident {
                device: self.device,
                value: self.value.clone(),
                footprint: None,
            }
        } else {
            self.clone()
        }
    }

    pub fn is_standard_value(&self) -> bool {
        StdValue::parse(self.device, &self.value).is_some()
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.device.as_str())?;
        if !self.value.is_empty() {
            write!(f, " {}", self.value)?;
        }
        if let Some(fp) = &self.footprint {
            write!(f, " {fp}")?;
        }
        Ok(())
    }
}

impl FromStr for Ident {
    type Err = IdentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ident::parse(s)
    }
}

static RESISTOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<resistance>\d+(\.\d+)?[mEKM])(/(?P<wattage>\d+(\.\d+)?W))?$").unwrap()
});
static CAPACITOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<capacitance>\d+(\.\d+)?[pnum]F)(/(?P<voltage>\d+(\.\d+)?V(DC|AC)?))?$")
        .unwrap()
});
static INDUCTOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<inductance>\d+(\.\d+)?[pnum]H)$").unwrap());
static CRYSTAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<frequency>\d+(\.\d+)?[KM]Hz)$").unwrap());
static LED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<color>RED|GREEN|YELLOW|BLUE|WHITE|BICOLOR)(/(?P<voltage>[\d.]+V))?(/(?P<wattage>[\d.]+W))?$",
    )
    .unwrap()
});

/// Value strings in the house standard notation, split into their fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdValue {
    Resistor {
        resistance: String,
        wattage: Option<String>,
    },
    Capacitor {
        capacitance: String,
        voltage: Option<String>,
    },
    Inductor {
        inductance: String,
    },
    Crystal {
        frequency: String,
    },
    Led {
        color: String,
        voltage: Option<String>,
        wattage: Option<String>,
    },
}

impl StdValue {
    pub fn parse(device: DeviceClass, value: &str) -> Option<StdValue> {
        fn group(caps: &regex::Captures<'_>, name: &str) -> Option<String> {
            caps.name(name).map(|m| m.as_str().to_string())
        }
        match device.family() {
            DeviceFamily::Resistor => RESISTOR_RE.captures(value).map(|c| StdValue::Resistor {
                resistance: group(&c, "resistance").unwrap_or_default(),
                wattage: group(&c, "wattage"),
            }),
            DeviceFamily::Capacitor => CAPACITOR_RE.captures(value).map(|c| StdValue::Capacitor {
                capacitance: group(&c, "capacitance").unwrap_or_default(),
                voltage: group(&c, "voltage"),
            }),
            DeviceFamily::Inductor => INDUCTOR_RE.captures(value).map(|c| StdValue::Inductor {
                inductance: group(&c, "inductance").unwrap_or_default(),
            }),
            DeviceFamily::Crystal => CRYSTAL_RE.captures(value).map(|c| StdValue::Crystal {
                frequency: group(&c, "frequency").unwrap_or_default(),
            }),
            DeviceFamily::Led => LED_RE.captures(value).map(|c| StdValue::Led {
                color: group(&c, "color").unwrap_or_default(),
                voltage: group(&c, "voltage"),
                wattage: group(&c, "wattage"),
            }),
            DeviceFamily::Other => None,
        }
    }
}

/// Build a resistor value string, e.g. "10K/0.125W".
pub fn resistor_value(resistance: &str, wattage: Option<&str>) -> Result<String, IdentError> {
    let value = match wattage {
        Some(w) => format!("{resistance}/{w}"),
        None => resistance.to_string(),
    };
    match StdValue::parse(DeviceClass::ResSmd, &value) {
        Some(StdValue::Resistor { .. }) => Ok(value),
        _ => Err(IdentError::NonStandardValue {
            device: DeviceClass::ResSmd,
            value,
        }),
    }
}

/// Build a capacitor value string, e.g. "100nF/50V".
pub fn capacitor_value(capacitance: &str, voltage: Option<&str>) -> Result<String, IdentError> {
    let value = match voltage {
        Some(v) => format!("{capacitance}/{v}"),
        None => capacitance.to_string(),
    };
    match StdValue::parse(DeviceClass::CapCerSmd, &value) {
        Some(StdValue::Capacitor { .. }) => Ok(value),
        _ => Err(IdentError::NonStandardValue {
            device: DeviceClass::CapCerSmd,
            value,
        }),
    }
}
