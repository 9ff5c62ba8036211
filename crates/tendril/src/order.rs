use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use tendril_core::bom::CompositeOutputBom;
use tendril_core::composite_table::{write_guideline_table, write_order_table};
use tendril_core::config::{Config, CONFIG_FILE};
use tendril_core::guideline::{OrderOptions, OverrunPolicy, QtyGuidelines};
use tendril_core::inventory::{allocate_prioritized, Allocation, Shortage};
use tendril_core::Quantity;

use crate::diagnostics;

#[derive(ValueEnum, Debug, Clone, Default)]
pub enum OrderFormat {
    #[default]
    Table,
    Json,
}

impl std::fmt::Display for OrderFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderFormat::Table => write!(f, "table"),
            OrderFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Args, Debug, Clone)]
#[command(about = "Reserve stock for a composite BOM and compute what to order")]
pub struct OrderArgs {
    /// Composite BOM CSV, as written by `tendril compose --format csv`
    #[arg(value_name = "COBOM", value_hint = clap::ValueHint::FilePath)]
    pub file: PathBuf,

    /// Project configuration listing stock locations and guidelines
    #[arg(short, long, default_value = CONFIG_FILE, value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Configuration to build first; shortages of the others are deferred
    #[arg(short, long = "priority", value_name = "NAME")]
    pub priority: Vec<String>,

    /// Write per-location reservation CSVs into this directory
    #[arg(short, long, value_name = "DIR", value_hint = clap::ValueHint::DirPath)]
    pub reservations: Option<PathBuf>,

    /// Accept order quantities whose excess exceeds the guideline maximum
    #[arg(long)]
    pub allow_overrun: bool,

    /// Order the guideline baseline quantity on top of each shortage
    #[arg(long)]
    pub baseline: bool,

    /// Round shortages without the guideline excess allowance
    #[arg(long)]
    pub no_excess: bool,

    /// Print the resolved order guidelines before the order
    #[arg(long)]
    pub show_guidelines: bool,

    /// Output format
    #[arg(short, long, default_value_t = OrderFormat::Table)]
    pub format: OrderFormat,
}

#[derive(Serialize)]
struct OrderLine<'a> {
    #[serde(flatten)]
    shortage: &'a Shortage,
    deferred: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    order: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Order quantity for every shortage, keyed by ident.
fn order_quantities(
    allocation: &Allocation,
    guidelines: Option<&QtyGuidelines>,
    options: &OrderOptions,
) -> BTreeMap<String, Result<Quantity, String>> {
    allocation
        .shortages
        .iter()
        .map(|s| {
            let order = match guidelines {
                Some(g) => {
                    let result = g.compliant_quantity(&s.ident, s.shortage, options);
                    diagnostics::report(&result.diagnostics);
                    result.output_result().map_err(|d| {
                        d.errors()
                            .into_iter()
                            .map(|e| e.body)
                            .collect::<Vec<_>>()
                            .join("; ")
                    })
                }
                None => Ok(s.shortage),
            };
            (s.ident.to_string(), order)
        })
        .collect()
}

pub fn execute(args: OrderArgs) -> Result<()> {
    let config = Config::from_file(&args.config)?;
    let guidelines = config.guidelines()?;

    let file = File::open(&args.file)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;
    let name = args
        .file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cobom = diagnostics::check(CompositeOutputBom::from_csv(file, &name), &name)?;
    for priority in &args.priority {
        if cobom.subset_indices(&[priority]).is_empty() {
            anyhow::bail!("No configuration named '{priority}' in {name}");
        }
    }

    let mut ledger = diagnostics::check(config.ledger(), "stock")?;
    let allocation = allocate_prioritized(&cobom, &mut ledger, args.priority.as_slice());
    diagnostics::report(&allocation.diagnostics);
    let allocation = allocation.output.unwrap_or_default();

    let options = OrderOptions {
        overrun: if args.allow_overrun {
            OverrunPolicy::Warn
        } else {
            OverrunPolicy::Fail
        },
        excess: !args.no_excess,
        baseline: args.baseline,
    };
    let orders = order_quantities(&allocation, guidelines.as_ref(), &options);

    let mut writer = io::stdout().lock();
    if args.show_guidelines {
        if let Some(guidelines) = &guidelines {
            write_guideline_table(&mut writer, &guidelines.guideline_table()?)?;
        }
    }
    match args.format {
        OrderFormat::Table => write_order_table(&mut writer, &allocation, |s| {
            orders
                .get(&s.ident.to_string())
                .cloned()
                .unwrap_or(Ok(s.shortage))
                .map(|q| q.to_string())
        })?,
        OrderFormat::Json => {
            let lines: Vec<OrderLine> = allocation
                .shortages
                .iter()
                .map(|s| {
                    let order = orders.get(&s.ident.to_string());
                    OrderLine {
                        shortage: s,
                        deferred: false,
                        order: order.and_then(|o| o.clone().ok()),
                        error: order.and_then(|o| o.clone().err()),
                    }
                })
                .chain(allocation.deferred.iter().map(|s| OrderLine {
                    shortage: s,
                    deferred: true,
                    order: None,
                    error: None,
                }))
                .collect();
            writeln!(writer, "{}", serde_json::to_string_pretty(&lines)?)?;
        }
    }

    if let Some(dir) = &args.reservations {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        for path in ledger.export_reservations(dir)? {
            eprintln!("{} {}", "Wrote".green(), path.display());
        }
    }

    let failed = orders.values().filter(|o| o.is_err()).count();
    if failed > 0 {
        anyhow::bail!("{failed} order quantities violate the guidelines");
    }
    Ok(())
}
