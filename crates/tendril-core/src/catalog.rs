use crate::device::{DeviceClass, Ident};
use crate::diagnostics::FindingKind;
use crate::quantity::Quantity;
use crate::series::{CustomSeries, SeriesGenerator, SeriesKind, StandardSeries};

/// Footprints carrying this prefix name a house variant of a standard footprint.
const HOUSE_FOOTPRINT_PREFIX: &str = "MY-";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("No {device} part with value {value} (footprint {})", .footprint.as_deref().unwrap_or("-"))]
    NotFound {
        value: Quantity,
        device: DeviceClass,
        footprint: Option<String>,
    },
    #[error("{0} parts are not carried by value")]
    Unsupported(DeviceClass),
    #[error("{value} is not a valid value for {device}")]
    KindMismatch { value: Quantity, device: DeviceClass },
}

impl CatalogError {
    pub fn finding_kind(&self) -> FindingKind {
        match self {
            CatalogError::NotFound { .. } => FindingKind::SeriesExhausted,
            _ => FindingKind::DeviceMismatch,
        }
    }
}

/// A catalog part matched to a requested value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRef {
    pub ident: Ident,
    pub part_number: Option<String>,
}

impl PartRef {
    pub fn value(&self) -> &str {
        self.ident.value()
    }
}

/// Lookup of stocked parts by value, footprint and device class.
pub trait ComponentCatalog {
    fn find_part(
        &self,
        value: &Quantity,
        footprint: Option<&str>,
        device: DeviceClass,
    ) -> Result<PartRef, CatalogError>;
}

/// In-memory catalog carrying every value of one standard series, plus any custom series
/// whose values map to explicit part numbers.
#[derive(Debug, Clone)]
pub struct SeriesCatalog {
    standard: StandardSeries,
    custom: Vec<CustomSeries>,
}

impl Default for SeriesCatalog {
    fn default() -> Self {
        Self::new(StandardSeries::E24)
    }
}

impl SeriesCatalog {
    pub fn new(standard: StandardSeries) -> Self {
        Self {
            standard,
            custom: Vec::new(),
        }
    }

    pub fn with_custom(mut self, series: CustomSeries) -> Self {
        self.custom.push(series);
        self
    }

    fn series_kind(device: DeviceClass) -> Option<SeriesKind> {
        use crate::quantity::QuantityKind;
        match device.value_kind()? {
            QuantityKind::Resistance => Some(SeriesKind::Resistor),
            QuantityKind::Capacitance => Some(SeriesKind::Capacitor),
            QuantityKind::Inductance => Some(SeriesKind::Inductor),
            _ => None,
        }
    }
}

impl ComponentCatalog for SeriesCatalog {
    fn find_part(
        &self,
        value: &Quantity,
        footprint: Option<&str>,
        device: DeviceClass,
    ) -> Result<PartRef, CatalogError> {
        let kind = Self::series_kind(device).ok_or(CatalogError::Unsupported(device))?;
        if value.kind() != kind.quantity_kind() {
            return Err(CatalogError::KindMismatch {
                value: *value,
                device,
            });
        }
        let footprint = footprint.map(|fp| {
            fp.strip_prefix(HOUSE_FOOTPRINT_PREFIX)
                .unwrap_or(fp)
                .to_string()
        });
        let ident = Ident::new(device, value.to_string(), footprint.clone());

        if let Some(part) = self
            .custom
            .iter()
            .filter(|s| s.kind() == kind)
            .find_map(|s| s.part_for(value))
        {
            return Ok(PartRef {
                ident,
                part_number: Some(part.to_string()),
            });
        }

        let carried = SeriesGenerator::standard(self.standard, kind, None, None)
            .map(|g| g.contains(value))
            .unwrap_or(false);
        if carried {
            log::debug!("Catalog match for {ident}");
            Ok(PartRef {
                ident,
                part_number: None,
            })
        } else {
            Err(CatalogError::NotFound {
                value: *value,
                device,
                footprint,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::QuantityKind;

    fn res(s: &str) -> Quantity {
        Quantity::parse(QuantityKind::Resistance, s).unwrap()
    }

    #[test]
    fn standard_values_are_carried() {
        let catalog = SeriesCatalog::new(StandardSeries::E12);
        let part = catalog
            .find_part(&res("4.7K"), Some("MY-0402"), DeviceClass::ResSmd)
            .unwrap();
        assert_eq!(part.ident.to_string(), "RES SMD 4.7K 0402");
        assert_eq!(part.value(), "4.7K");
        assert_eq!(part.part_number, None);
    }

    #[test]
    fn off_series_value_is_not_found() {
        let catalog = SeriesCatalog::new(StandardSeries::E12);
        let err = catalog
            .find_part(&res("5.1K"), Some("0402"), DeviceClass::ResSmd)
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
        assert_eq!(err.finding_kind(), FindingKind::SeriesExhausted);
    }

    #[test]
    fn custom_series_part_numbers() {
        let mut precision = CustomSeries::new("precision", SeriesKind::Resistor);
        precision.add_value_str("4.99K", "RP-4K99").unwrap();
        let catalog = SeriesCatalog::default().with_custom(precision);
        let part = catalog
            .find_part(&res("4.99K"), Some("0603"), DeviceClass::ResThru)
            .unwrap();
        assert_eq!(part.part_number.as_deref(), Some("RP-4K99"));
    }

    #[test]
    fn device_and_kind_are_checked() {
        let catalog = SeriesCatalog::default();
        assert_eq!(
            catalog.find_part(&res("1K"), None, DeviceClass::IcSmd),
            Err(CatalogError::Unsupported(DeviceClass::IcSmd))
        );
        assert!(matches!(
            catalog.find_part(&res("1K"), Some("0402"), DeviceClass::CapCerSmd),
            Err(CatalogError::KindMismatch { .. })
        ));
    }
}
