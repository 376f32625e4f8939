//! Mortality aggregation CLI
//!
//! Aggregates small-area death rates to local-authority and national level,
//! weighting by population.
//!
//! Usage: mx_agg [--region MSOA] [--sex male] [--model nested_as_at]
//! Set RUST_LOG=info (or debug) for progress output.

use anyhow::Context;
use clap::Parser;
use mortality_aggregation::{run, LookupColumns, RunConfig, UnmappedPolicy};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about = "Population-weighted aggregation of small-area death rates")]
struct Args {
    /// Small-area geography of the input files
    #[arg(long, default_value = "MSOA")]
    region: String,

    #[arg(long, default_value = "male")]
    sex: String,

    /// Model that produced the death rates
    #[arg(long, default_value = "nested_as_at")]
    model: String,

    /// Directory holding data/
    #[arg(long, default_value = mortality_aggregation::pipeline::DEFAULT_ROOT)]
    root: PathBuf,

    /// Small areas with no lookup entry: exclude, unknown or error
    #[arg(long, default_value_t = UnmappedPolicy::Exclude)]
    unmapped: UnmappedPolicy,

    /// Fail when a small area maps to more than one local authority
    #[arg(long)]
    strict_lookup: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn into_config(self) -> RunConfig {
        RunConfig {
            region: self.region,
            sex: self.sex,
            model: self.model,
            root: self.root,
            lookup_columns: LookupColumns::default(),
            unmapped: self.unmapped,
            strict_lookup: self.strict_lookup,
            ..Default::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let json = args.json;
    let config = args.into_config();

    let summary = run(&config).with_context(|| {
        format!(
            "aggregation failed for {} {} {} (rates {}, population {}, lookup {})",
            config.region,
            config.sex,
            config.model,
            config.rates_path().display(),
            config.population_path().display(),
            config.lookup_path().display()
        )
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Mortality aggregation: {} {} {}", summary.region, summary.sex, summary.model);
    println!("  Small areas:        {}", summary.small_areas);
    println!("  Groups:             {}", summary.groups);
    println!("  Unmapped areas:     {}", summary.unmapped_areas);
    println!("  Lookup conflicts:   {}", summary.lookup_conflicts);
    println!("  Missing population: {}", summary.missing_population);
    println!("  Grouped output:     {}", summary.grouped_output.display());
    println!("  Global output:      {}", summary.global_output.display());
    println!("  Time:               {} ms", summary.elapsed_ms);

    Ok(())
}
