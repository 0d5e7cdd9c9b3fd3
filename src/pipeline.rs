//! Sequencing of the four steps: statistics and boundaries load
//! independently, the join runs only when both succeeded, rendering runs
//! only on a complete join.

use crate::aliases::AliasTable;
use crate::config::AppConfig;
use crate::error::Result;
use crate::geometry;
use crate::join::{self, JoinOutcome};
use crate::render::{self, RenderedMap};
use crate::tabular;
use crate::types::RegionGeometry;

pub fn load_aliases(config: &AppConfig) -> Result<AliasTable> {
    AliasTable::from_config(
        &config.processing.aliases,
        config.processing.alias_file.as_deref(),
    )
}

pub fn load_geometries(config: &AppConfig) -> Result<Vec<RegionGeometry>> {
    geometry::load_region_geometries(&config.input, config.processing.target_crs)
}

/// Loads the statistics and joins them onto already-loaded boundaries.
pub fn join_with_geometries(
    config: &AppConfig,
    geometries: Vec<RegionGeometry>,
) -> Result<JoinOutcome> {
    let aliases = load_aliases(config)?;
    let stats = tabular::load_region_stats(&config.input, &config.processing, &aliases)?;
    Ok(join::join_regions(geometries, &stats))
}

/// Loads both sources and joins them.
pub fn prepare(config: &AppConfig) -> Result<JoinOutcome> {
    let aliases = load_aliases(config)?;
    let stats = tabular::load_region_stats(&config.input, &config.processing, &aliases)?;
    let geometries = load_geometries(config)?;
    Ok(join::join_regions(geometries, &stats))
}

/// Full run: load, join, render.
pub fn run(config: &AppConfig) -> Result<(RenderedMap, JoinOutcome)> {
    let outcome = prepare(config)?;
    let map = render::render_map(&outcome.regions, &config.output.map)?;
    Ok((map, outcome))
}
