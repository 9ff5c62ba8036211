use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use serde::Serialize;
use tendril_core::config::Config;
use tendril_core::series::SeriesKind;
use tendril_core::Quantity;

use crate::diagnostics;

#[derive(ValueEnum, Debug, Clone, Default)]
pub enum SeriesFormat {
    #[default]
    List,
    Json,
}

impl std::fmt::Display for SeriesFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeriesFormat::List => write!(f, "list"),
            SeriesFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Args, Debug, Clone)]
#[command(about = "List the values of a standard or custom series")]
pub struct SeriesArgs {
    /// Series name: E3, E6, E12, E24 or a custom series from the config
    #[arg(value_name = "SERIES")]
    pub series: String,

    /// Part kind: resistor, capacitor or inductor
    #[arg(value_name = "KIND")]
    pub kind: SeriesKind,

    /// First value to list, e.g. 1nF
    #[arg(long)]
    pub start: Option<String>,

    /// Last value to list
    #[arg(long)]
    pub end: Option<String>,

    /// Project configuration defining custom series
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value_t = SeriesFormat::List)]
    pub format: SeriesFormat,
}

#[derive(Serialize)]
struct SeriesValue {
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    part: Option<String>,
}

pub fn execute(args: SeriesArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let registry = config.series_registry()?;

    let kind = args.kind.quantity_kind();
    let bound = |text: &Option<String>| -> Result<Option<Quantity>> {
        text.as_deref()
            .map(|s| Quantity::parse(kind, s).with_context(|| format!("Invalid bound '{s}'")))
            .transpose()
    };
    let (start, end) = (bound(&args.start)?, bound(&args.end)?);

    let generator = registry.generator(&args.series, args.kind, start, end)?;
    let values = diagnostics::check(generator.generate(), &generator.name())?;

    let mut writer = io::stdout().lock();
    match args.format {
        SeriesFormat::List => {
            for value in &values {
                match generator.part_for(value) {
                    Some(part) => writeln!(writer, "{value}\t{part}")?,
                    None => writeln!(writer, "{value}")?,
                }
            }
        }
        SeriesFormat::Json => {
            let rows: Vec<SeriesValue> = values
                .iter()
                .map(|v| SeriesValue {
                    value: v.to_string(),
                    part: generator.part_for(v).map(str::to_string),
                })
                .collect();
            writeln!(writer, "{}", serde_json::to_string_pretty(&rows)?)?;
        }
    }
    Ok(())
}
