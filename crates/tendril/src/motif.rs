use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::Table;
use tendril_core::component::ComponentList;
use tendril_core::config::Config;
use tendril_core::motif::{bind_motifs, Motif, MotifConfig, MotifRef, SolveContext};
use tendril_core::Quantity;

use crate::diagnostics;

#[derive(Args, Debug, Clone)]
#[command(about = "Configure a motif in a component listing and solve its parameters")]
pub struct MotifArgs {
    /// Component listing with a `motif` column binding parts to motif slots
    #[arg(value_name = "CSV", value_hint = clap::ValueHint::FilePath)]
    pub file: PathBuf,

    /// Motif to work on, e.g. LPF1.1
    #[arg(short, long)]
    pub motif: MotifRef,

    /// Motif configuration value, as KEY=VALUE. Unset keys keep their defaults.
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE", value_parser = parse_pair)]
    pub options: Vec<(String, String)>,

    /// Parameter target to solve for, as NAME=VALUE, applied in order
    #[arg(short, long = "set", value_name = "NAME=VALUE", value_parser = parse_pair)]
    pub set: Vec<(String, String)>,

    /// Project configuration supplying the catalog and custom series
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Write the updated listing here instead of stdout
    #[arg(long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}

fn write_parameters<W: Write>(
    motif: &dyn Motif,
    components: &ComponentList,
    mut writer: W,
) -> Result<()> {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![motif.motif_ref().to_string(), "Value".to_string()]);
    for (name, _) in motif.parameters() {
        let value = motif
            .parameter(name, components)
            .map(|q| q.to_string())
            .unwrap_or_else(|e| e.to_string());
        table.add_row(vec![name.to_string(), value]);
    }
    writeln!(writer, "{table}")?;
    Ok(())
}

pub fn execute(args: MotifArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let catalog = config.catalog()?;
    let registry = config.series_registry()?;
    let ctx = SolveContext::new(&catalog, &registry);

    let source = args.file.display().to_string();
    let file = File::open(&args.file).with_context(|| format!("Failed to open {source}"))?;
    let mut components = diagnostics::check(ComponentList::from_csv(file), &source)?;

    let motifs = bind_motifs(&components);
    diagnostics::report(&motifs.diagnostics);
    let mut motif = motifs
        .output
        .unwrap_or_default()
        .into_iter()
        .find(|m| *m.motif_ref() == args.motif)
        .with_context(|| format!("No parts are bound to {} in {source}", args.motif))?;

    let options: MotifConfig = args.options.iter().cloned().collect();
    motif
        .configure(options, &mut components, &ctx)
        .with_context(|| format!("Failed to configure {}", args.motif))?;

    for (name, value) in &args.set {
        let kind = motif
            .parameter_kind(name)
            .with_context(|| format!("{} has no parameter {name}", args.motif))?;
        let target = Quantity::parse(kind, value)
            .with_context(|| format!("Invalid target '{value}' for {name}"))?;
        motif
            .set_parameter(name, target, &mut components, &ctx)
            .with_context(|| format!("Failed to set {name} = {target}"))?;
    }

    write_parameters(&*motif, &components, io::stderr().lock())?;
    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            components.write_csv(file)?;
        }
        None => components.write_csv(io::stdout().lock())?,
    }
    Ok(())
}
