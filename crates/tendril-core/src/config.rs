//! Project configuration, read from `tendril.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::bom::WireSlack;
use crate::catalog::SeriesCatalog;
use crate::diagnostics::{Diagnostic, FindingKind, WithDiagnostics};
use crate::guideline::{GuidelineError, QtyGuidelines};
use crate::inventory::ReservationLedger;
use crate::quantity::{Quantity, QuantityKind};
use crate::series::{CustomSeries, SeriesError, SeriesKind, SeriesRegistry, StandardSeries};

pub const CONFIG_FILE: &str = "tendril.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse tendril.toml: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Validation(String),
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error(transparent)]
    Guideline(#[from] GuidelineError),
}

impl ConfigError {
    pub fn finding_kind(&self) -> FindingKind {
        match self {
            ConfigError::Series(e) => e.finding_kind(),
            ConfigError::Guideline(e) => e.finding_kind(),
            _ => FindingKind::Config,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WireSlackConfig {
    /// Slack as a fraction of the piece length.
    pub fraction: Option<Decimal>,
    pub min: Option<String>,
    pub max: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CustomSeriesConfig {
    pub name: String,
    pub kind: SeriesKind,
    pub description: Option<String>,
    /// Value → catalog part number.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    /// Standard series the stocked values come from.
    #[serde(default = "default_catalog_series")]
    pub series: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            series: default_catalog_series(),
        }
    }
}

fn default_catalog_series() -> String {
    "E24".to_string()
}

/// An inventory location and the stock listing it is loaded from.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LocationConfig {
    pub name: String,
    pub file: PathBuf,
}

/// Contents of `tendril.toml`. Relative paths resolve against the file's directory.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub wire_slack: WireSlackConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub custom_series: Vec<CustomSeriesConfig>,
    #[serde(default, rename = "location")]
    pub locations: Vec<LocationConfig>,
    /// Order quantity guideline YAML.
    pub guidelines: Option<PathBuf>,

    #[serde(skip)]
    base_dir: PathBuf,
}

impl Config {
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = read(path)?;
        let mut config = Self::parse(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.wire_slack()?;
        self.catalog()?;
        let mut names = Vec::new();
        for location in &self.locations {
            if names.contains(&location.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate location '{}'",
                    location.name
                )));
            }
            names.push(location.name.as_str());
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn wire_slack(&self) -> Result<WireSlack, ConfigError> {
        let defaults = WireSlack::default();
        let length = |value: &Option<String>, default: Quantity| match value {
            Some(s) => Quantity::parse(QuantityKind::Length, s).map_err(|e| {
                ConfigError::Validation(format!("wire_slack: invalid length '{s}': {e}"))
            }),
            None => Ok(default),
        };
        let slack = WireSlack {
            fraction: self.wire_slack.fraction.unwrap_or(defaults.fraction),
            min: length(&self.wire_slack.min, defaults.min)?,
            max: length(&self.wire_slack.max, defaults.max)?,
        };
        if slack.fraction.is_sign_negative() || slack.min > slack.max {
            return Err(ConfigError::Validation(format!(
                "wire_slack: expected a non-negative fraction and min <= max, got {}, {}, {}",
                slack.fraction, slack.min, slack.max
            )));
        }
        Ok(slack)
    }

    fn custom_series(&self) -> Result<Vec<CustomSeries>, ConfigError> {
        self.custom_series
            .iter()
            .map(|c| {
                let mut series = CustomSeries::new(c.name.as_str(), c.kind);
                series.description = c.description.clone();
                for (value, part) in &c.values {
                    series.add_value_str(value, part.as_str())?;
                }
                Ok(series)
            })
            .collect()
    }

    /// Standard series plus every configured custom series.
    pub fn series_registry(&self) -> Result<SeriesRegistry, ConfigError> {
        let mut registry = SeriesRegistry::new();
        for series in self.custom_series()? {
            registry.insert(series);
        }
        Ok(registry)
    }

    pub fn catalog(&self) -> Result<SeriesCatalog, ConfigError> {
        let standard: StandardSeries = self.catalog.series.parse()?;
        Ok(self
            .custom_series()?
            .into_iter()
            .fold(SeriesCatalog::new(standard), SeriesCatalog::with_custom))
    }

    /// Load every configured location, in order. Unreadable files are reported.
    pub fn ledger(&self) -> WithDiagnostics<ReservationLedger> {
        let mut ledger = ReservationLedger::new();
        let mut result = WithDiagnostics::default();
        for location in &self.locations {
            let path = self.resolve(&location.file);
            match fs::File::open(&path) {
                Ok(file) => result.extend(ledger.load_csv(&location.name, file)),
                Err(source) => {
                    ledger.add_location(location.name.as_str());
                    result.push(
                        Diagnostic::from(ConfigError::Io { path, source })
                            .with_subject(location.name.as_str()),
                    );
                }
            }
        }
        result.output = Some(ledger);
        result
    }

    pub fn guidelines(&self) -> Result<Option<QtyGuidelines>, ConfigError> {
        self.guidelines
            .as_ref()
            .map(|path| Ok(QtyGuidelines::load(self.resolve(path))?))
            .transpose()
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ComponentCatalog;
    use crate::device::{DeviceClass, Ident};
    use rust_decimal_macros::dec;

    const CONFIG: &str = r#"
guidelines = "guidelines.yaml"

[wire_slack]
fraction = 0.2
min = "1cm"

[catalog]
series = "E12"

[[custom_series]]
name = "precision"
kind = "resistor"
description = "0.1% thin film"
values = { "10K" = "TF-10K", "12.1K" = "TF-12K1" }

[[location]]
name = "main"
file = "stock/main.csv"

[[location]]
name = "store"
file = "missing.csv"
"#;

    #[test]
    fn parse_config() {
        let config = Config::parse(CONFIG).unwrap();
        let slack = config.wire_slack().unwrap();
        assert_eq!(slack.fraction, dec!(0.2));
        assert_eq!(slack.min, Quantity::parse(QuantityKind::Length, "10mm").unwrap());
        assert_eq!(slack.max, WireSlack::default().max);

        let registry = config.series_registry().unwrap();
        assert_eq!(registry.custom("precision").unwrap().len(), 2);
        let r = |s: &str| Quantity::parse(QuantityKind::Resistance, s).unwrap();
        let part = config
            .catalog()
            .unwrap()
            .find_part(&r("12.1K"), Some("0402"), DeviceClass::ResSmd)
            .unwrap();
        assert_eq!(part.part_number.as_deref(), Some("TF-12K1"));
    }

    #[test]
    fn defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.wire_slack().unwrap(), WireSlack::default());
        assert!(config.locations.is_empty());
        assert!(config.guidelines().unwrap().is_none());
    }

    #[test]
    fn invalid() {
        for toml in [
            "[catalog]\nseries = \"E7\"\n",
            "[wire_slack]\nmin = \"5 parsecs\"\n",
            "[wire_slack]\nmin = \"2cm\"\nmax = \"1cm\"\n",
            "[[custom_series]]\nname = \"x\"\nkind = \"resistor\"\nvalues = { \"lots\" = \"P1\" }\n",
            "[[location]]\nname = \"a\"\nfile = \"a.csv\"\n[[location]]\nname = \"a\"\nfile = \"b.csv\"\n",
            "unknown = 1\n",
        ] {
            assert!(Config::parse(toml).is_err(), "{toml}");
        }
    }

    #[test]
    fn from_file_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("stock")).unwrap();
        fs::write(
            dir.path().join("stock/main.csv"),
            "ident,qty\nRES SMD 10K 0402,100\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("guidelines.yaml"),
            "default:\n  oqty_min: 10\n",
        )
        .unwrap();
        fs::write(dir.path().join(CONFIG_FILE), CONFIG).unwrap();

        let config = Config::from_file(&dir.path().join(CONFIG_FILE)).unwrap();
        let (ledger, diagnostics) = config.ledger().unpack();
        let ledger = ledger.unwrap();
        assert_eq!(diagnostics.errors().len(), 1);
        assert_eq!(diagnostics.errors()[0].subject, "store");
        assert_eq!(ledger.locations().collect::<Vec<_>>(), vec!["main", "store"]);
        assert_eq!(
            ledger
                .availability(&Ident::parse("RES SMD 10K 0402").unwrap())
                .unwrap(),
            Quantity::count(100)
        );
        assert!(config.guidelines().unwrap().is_some());
    }
}
