use clap::{Parser, Subcommand};
use colored::Colorize;
use env_logger::Env;

mod compose;
mod diagnostics;
mod motif;
mod order;
mod series;

#[derive(Parser)]
#[command(name = "tendril")]
#[command(about = "BOM composition, motif solving and stock ordering", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long = "debug", global = true, hide = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the values of a preferred value series
    #[command(alias = "s")]
    Series(series::SeriesArgs),

    /// Merge component listings into a composite BOM
    #[command(alias = "c")]
    Compose(compose::ComposeArgs),

    /// Reserve stock for a composite BOM and compute order quantities
    #[command(alias = "o")]
    Order(order::OrderArgs),

    /// Configure a motif and solve its parameters
    #[command(alias = "m")]
    Motif(motif::MotifArgs),
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {e}", "Error:".red());
        for cause in e.chain().skip(1) {
            eprintln!("  {cause}");
        }
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG overrides either default
    let env = if cli.debug {
        Env::default().default_filter_or("debug")
    } else {
        Env::default().default_filter_or("error")
    };
    env_logger::Builder::from_env(env).init();

    match cli.command {
        Commands::Series(args) => series::execute(args),
        Commands::Compose(args) => compose::execute(args),
        Commands::Order(args) => order::execute(args),
        Commands::Motif(args) => motif::execute(args),
    }
}
