//! Inspect, weight and convert model grid files
//!
//! Opens a FITS or HDF5 grid with the chosen backend and prints its
//! summary. Optionally applies a JSON prior configuration and writes the
//! result to a new file, the format following the output extension.
//!
//! Usage:
//! ```text
//! grid_info seds.grid.hdf5 --backend disk --show-header --rows 5
//! grid_info seds.grid.fits --priors priors.json --output weighted.hdf5
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info};
use physicsmodel::grid::{pretty_size_print, BackendKind, Column, GridBackend};
use physicsmodel::io::FileType;
use physicsmodel::priors::PriorConfig;
use physicsmodel::weights::apply_prior_config;

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect, weight and convert model grid files")]
struct Args {
    /// Grid file (.fits, .hdf, .hd5 or .hdf5)
    grid: PathBuf,

    #[arg(short, long, value_enum, default_value_t = BackendKind::Cache)]
    backend: BackendKind,

    #[arg(long, help = "Print every header entry and column alias")]
    show_header: bool,

    #[arg(long, default_value_t = 0, help = "Print the first N rows of the parameter table")]
    rows: usize,

    #[arg(long, value_name = "JSON", help = "Prior configuration to apply")]
    priors: Option<PathBuf>,

    #[arg(short, long, help = "Write the grid to this file")]
    output: Option<PathBuf>,

    #[arg(long, requires = "output", help = "Append to an existing HDF5 output")]
    append: bool,

    #[arg(long, requires = "output", help = "Replace an existing FITS output")]
    overwrite: bool,
}

fn format_cell(column: &Column, row: usize) -> String {
    match column {
        Column::Float(values) => format!("{:.4}", values[row]),
        Column::Int(values) => values[row].to_string(),
        Column::Str(values) => values[row].clone(),
    }
}

fn print_summary(grid: &mut dyn GridBackend, args: &Args) -> Result<()> {
    let nmodels = grid.len().context("Failed to count models")?;
    let keys = grid.keys().context("Failed to read column names")?;
    let lamb = grid.lamb().context("Failed to read wavelengths")?;
    let nbands = lamb.len();
    let lamb_range = lamb
        .iter()
        .copied()
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        });

    println!("Grid: {}", grid.source());
    println!("  Models: {nmodels}");
    match lamb_range {
        Some((lo, hi)) => println!("  Bands: {nbands} ({lo:.1} to {hi:.1})"),
        None => println!("  Bands: 0"),
    }
    println!("  Columns ({}): {}", keys.len(), keys.join(", "));
    match grid.filters().context("Failed to read header")? {
        Some(filters) => println!("  Filters: {}", filters.join(" ")),
        None => println!("  Filters: (none)"),
    }
    let has_covariance = grid.cov_diag().context("Failed to read covariance")?.is_some();
    println!("  Covariance: {}", if has_covariance { "yes" } else { "no" });

    if args.show_header {
        println!("\nHeader:");
        for (key, value) in grid.header()?.iter() {
            println!("  {key} = {value}");
        }
        let aliases = grid.aliases()?;
        if !aliases.is_empty() {
            println!("\nAliases:");
            for (alias, canonical) in aliases {
                println!("  {alias} -> {canonical}");
            }
        }
    }

    if args.rows > 0 {
        let table = grid.grid().context("Failed to read parameter table")?;
        let shown = args.rows.min(table.len());
        println!("\nFirst {shown} of {} rows:", table.len());
        println!("  {}", table.names().join("\t"));
        for row in 0..shown {
            let cells: Vec<String> = table
                .iter()
                .map(|(_, column)| format_cell(column, row))
                .collect();
            println!("  {}", cells.join("\t"));
        }
    }

    println!("\nIn memory: {}", pretty_size_print(grid.nbytes()));
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging from environment variables
    env_logger::init();

    let args = Args::parse();
    debug!("Arguments: {args:?}");

    let mut grid = args.backend.open(&args.grid).with_context(|| {
        format!(
            "Failed to open {} with the {} backend",
            args.grid.display(),
            args.backend
        )
    })?;

    print_summary(grid.as_mut(), &args)?;

    if let Some(path) = &args.priors {
        let config = PriorConfig::load(path)
            .with_context(|| format!("Failed to load prior configuration {}", path.display()))?;
        let weights =
            apply_prior_config(grid.as_mut(), &config).context("Failed to apply priors")?;
        let total = weights.sum();
        let (min, max) = weights
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &w| (lo.min(w), hi.max(w)));
        println!("\nPrior weights: sum {total:.4e}, min {min:.4e}, max {max:.4e}");
    }

    if let Some(output) = &args.output {
        let file_type = FileType::from_path(output)
            .with_context(|| format!("Cannot write {}", output.display()))?;
        match file_type {
            FileType::Fits if args.append => bail!("Appending is only supported for HDF5 output"),
            FileType::Fits => grid.write_fits(output, args.overwrite)?,
            FileType::Hdf => grid.write_hdf(output, args.append)?,
        }
        info!("Wrote {} as {file_type}", output.display());
        println!("Wrote {}", output.display());
    }

    Ok(())
}
