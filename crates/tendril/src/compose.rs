use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tendril_core::bom::{CompositeOutputBom, Descriptor, OutputBom, WireSlack};
use tendril_core::component::ComponentList;
use tendril_core::config::Config;

use crate::diagnostics;

#[derive(ValueEnum, Debug, Clone, Default)]
pub enum ComposeFormat {
    #[default]
    Table,
    Csv,
    Json,
}

impl std::fmt::Display for ComposeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComposeFormat::Table => write!(f, "table"),
            ComposeFormat::Csv => write!(f, "csv"),
            ComposeFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Args, Debug, Clone)]
#[command(about = "Merge per-configuration component listings into a composite BOM")]
pub struct ComposeArgs {
    /// Component listings, one per configuration. The file stem names the configuration.
    #[arg(value_name = "CSV", required = true, value_hint = clap::ValueHint::FilePath)]
    pub files: Vec<PathBuf>,

    /// Units built of a configuration, as NAME=N
    #[arg(short = 'x', long = "multiply", value_name = "NAME=N", value_parser = parse_multiplier)]
    pub multipliers: Vec<(String, u32)>,

    /// Fold wire pieces of the same wire into one line
    #[arg(long)]
    pub collapse_wires: bool,

    /// Name of the composite BOM
    #[arg(long, default_value = "composite")]
    pub name: String,

    /// Project configuration supplying wire slack
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value_t = ComposeFormat::Table)]
    pub format: ComposeFormat,
}

fn parse_multiplier(s: &str) -> Result<(String, u32), String> {
    let (name, n) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=N, got '{s}'"))?;
    let n: u32 = n
        .trim()
        .parse()
        .map_err(|_| format!("invalid multiplier '{n}'"))?;
    if n == 0 {
        return Err("multiplier must be positive".to_string());
    }
    Ok((name.trim().to_string(), n))
}

fn config_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn load_bom(path: &Path, slack: WireSlack, multipliers: &[(String, u32)]) -> Result<OutputBom> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let source = path.display().to_string();
    let components = diagnostics::check(ComponentList::from_csv(file), &source)?;

    let name = config_name(path);
    let descriptor = Descriptor::new(name.as_str()).with_source(source.as_str());
    let mut bom = diagnostics::check(
        OutputBom::from_components_with(descriptor, &components, slack),
        &source,
    )?;
    if let Some((_, n)) = multipliers.iter().find(|(m, _)| *m == name) {
        bom.multiply(*n, false)?;
    }
    Ok(bom)
}

pub fn execute(args: ComposeArgs) -> Result<()> {
    let slack = match &args.config {
        Some(path) => Config::from_file(path)?.wire_slack()?,
        None => WireSlack::default(),
    };

    let boms = args
        .files
        .iter()
        .map(|path| load_bom(path, slack, &args.multipliers))
        .collect::<Result<Vec<_>>>()?;
    for (name, _) in &args.multipliers {
        if !boms.iter().any(|b| b.descriptor.config_name == *name) {
            log::warn!("No configuration named {name} to multiply");
        }
    }

    let mut cobom = CompositeOutputBom::new(args.name.as_str(), &boms)?;
    if args.collapse_wires {
        cobom.collapse_wires()?;
    }

    let mut writer = io::stdout().lock();
    match args.format {
        ComposeFormat::Table => cobom.write_table(&mut writer)?,
        ComposeFormat::Csv => cobom.dump(&mut writer)?,
        ComposeFormat::Json => writeln!(writer, "{}", serde_json::to_string_pretty(&cobom)?)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplier_argument() {
        assert_eq!(parse_multiplier("full=3"), Ok(("full".to_string(), 3)));
        assert!(parse_multiplier("full").is_err());
        assert!(parse_multiplier("full=0").is_err());
        assert!(parse_multiplier("full=two").is_err());
    }
}
