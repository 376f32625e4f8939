//! Load, join, reduce, save
//!
//! One pass per region/sex/model combination. Every stage returns a
//! `Result` and the first failure ends the run; nothing already written is
//! cleaned up.

use crate::aggregate::{aggregate_by_group, aggregate_global, group_areas, UnmappedPolicy};
use crate::dataset::{self, align_weights, netcdf};
use crate::error::{AggregationError, Result};
use crate::lookup::{load_lookup, LookupColumns, DEFAULT_LOOKUP_PATH};
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

/// Data root used when none is given: two levels up from the working directory
pub const DEFAULT_ROOT: &str = "../..";

/// Everything a run needs to find its inputs and name its outputs
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub region: String,
    pub sex: String,
    pub model: String,
    pub root: PathBuf,
    pub lookup_columns: LookupColumns,
    /// Small-area dimension name in the rate and population files
    pub area_dim: String,
    /// Name of the grouped dimension in the output
    pub group_dim: String,
    pub unmapped: UnmappedPolicy,
    pub strict_lookup: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            region: "MSOA".to_string(),
            sex: "male".to_string(),
            model: "nested_as_at".to_string(),
            root: PathBuf::from(DEFAULT_ROOT),
            lookup_columns: LookupColumns::default(),
            area_dim: "MSOA".to_string(),
            group_dim: "LAD".to_string(),
            unmapped: UnmappedPolicy::default(),
            strict_lookup: false,
        }
    }
}

impl RunConfig {
    fn death_rates_dir(&self) -> PathBuf {
        self.root.join("data").join("death_rates")
    }

    /// `data/death_rates/{region}_{sex}_{model}.nc`
    pub fn rates_path(&self) -> PathBuf {
        self.death_rates_dir()
            .join(format!("{}_{}_{}.nc", self.region, self.sex, self.model))
    }

    /// `data/population/{region}_{sex}_population.nc`
    pub fn population_path(&self) -> PathBuf {
        self.root
            .join("data")
            .join("population")
            .join(format!("{}_{}_population.nc", self.region, self.sex))
    }

    pub fn lookup_path(&self) -> PathBuf {
        self.root.join(DEFAULT_LOOKUP_PATH)
    }

    /// Output path with an aggregation tag: `{region}_{tag}_{sex}_{model}.nc`
    pub fn output_path(&self, tag: &str) -> PathBuf {
        self.death_rates_dir()
            .join(format!("{}_{}_{}_{}.nc", self.region, tag, self.sex, self.model))
    }

    pub fn grouped_output_path(&self) -> PathBuf {
        self.output_path(&self.group_dim)
    }

    pub fn global_output_path(&self) -> PathBuf {
        self.output_path("GLOBAL")
    }

    fn history(&self) -> String {
        format!(
            "{}: population-weighted {} and GLOBAL means of {}_{}_{} (unmapped={})",
            Utc::now().to_rfc3339(),
            self.group_dim,
            self.region,
            self.sex,
            self.model,
            self.unmapped
        )
    }
}

/// What a run did
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub region: String,
    pub sex: String,
    pub model: String,
    pub small_areas: usize,
    pub groups: usize,
    pub unmapped_areas: usize,
    pub lookup_conflicts: usize,
    pub missing_population: usize,
    pub grouped_output: PathBuf,
    pub global_output: PathBuf,
    pub elapsed_ms: u64,
}

/// Run the whole aggregation for one configuration
pub fn run(config: &RunConfig) -> Result<RunSummary> {
    let start = Instant::now();
    log::info!(
        "Aggregating {} {} {} under {}",
        config.region,
        config.sex,
        config.model,
        config.root.display()
    );

    let rates = dataset::load_death_rates(&config.rates_path())?;
    log::info!("Loaded death rates {:?} {:?}", rates.dims(), rates.shape());

    let lookup = load_lookup(&config.lookup_path(), &config.lookup_columns, config.strict_lookup)?;

    let population = dataset::load_population(&config.population_path())?;
    log::info!("Loaded population {:?} {:?}", population.dims(), population.shape());

    if population.axis_of(&config.area_dim).is_none() {
        return Err(AggregationError::Alignment(format!(
            "population has no '{}' dimension (dimensions {:?})",
            config.area_dim,
            population.dims()
        )));
    }
    let (weights, missing_population) = align_weights(&rates, &population)?;

    let areas = rates.keys(&config.area_dim).ok_or_else(|| {
        AggregationError::Alignment(format!(
            "death rates have no '{}' dimension (dimensions {:?})",
            config.area_dim,
            rates.dims()
        ))
    })?;
    let grouping = group_areas(&areas, &lookup, config.unmapped)?;

    let history = config.history();

    let grouped = aggregate_by_group(&rates, &weights, &config.area_dim, &grouping, &config.group_dim)?;
    let grouped_output = config.grouped_output_path();
    netcdf::write_array(&grouped_output, &grouped, &history)?;
    log::info!("Wrote {} groups to {}", grouping.len(), grouped_output.display());

    let global = aggregate_global(&rates, &weights, &config.area_dim)?;
    let global_output = config.global_output_path();
    netcdf::write_array(&global_output, &global, &history)?;
    log::info!("Wrote global mean to {}", global_output.display());

    Ok(RunSummary {
        region: config.region.clone(),
        sex: config.sex.clone(),
        model: config.model.clone(),
        small_areas: areas.len(),
        groups: grouping.len(),
        unmapped_areas: grouping.unmapped().len(),
        lookup_conflicts: lookup.conflicts(),
        missing_population,
        grouped_output,
        global_output,
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_default_paths() {
        let config = RunConfig::default();

        assert_eq!(
            config.rates_path(),
            Path::new("../../data/death_rates/MSOA_male_nested_as_at.nc")
        );
        assert_eq!(
            config.population_path(),
            Path::new("../../data/population/MSOA_male_population.nc")
        );
        assert_eq!(
            config.lookup_path(),
            Path::new("../../data/covariates/LSOA_MSOA_LAD_GOR_CTRY_lookup.csv")
        );
        assert_eq!(
            config.grouped_output_path(),
            Path::new("../../data/death_rates/MSOA_LAD_male_nested_as_at.nc")
        );
        assert_eq!(
            config.global_output_path(),
            Path::new("../../data/death_rates/MSOA_GLOBAL_male_nested_as_at.nc")
        );
    }

    #[test]
    fn test_paths_follow_parameters() {
        let config = RunConfig {
            region: "LSOA".to_string(),
            sex: "female".to_string(),
            model: "car_as_at".to_string(),
            root: PathBuf::from("/srv/mortality"),
            ..Default::default()
        };

        assert_eq!(
            config.grouped_output_path(),
            Path::new("/srv/mortality/data/death_rates/LSOA_LAD_female_car_as_at.nc")
        );
        assert_eq!(
            config.population_path(),
            Path::new("/srv/mortality/data/population/LSOA_female_population.nc")
        );
    }

    #[test]
    fn test_missing_rates_file_fails_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig {
            root: dir.path().to_path_buf(),
            ..Default::default()
        };

        assert!(matches!(run(&config), Err(AggregationError::Io(_))));
        assert!(!config.global_output_path().exists());
    }
}
