use crate::types::{JoinedRegion, RegionGeometry, RegionStat, UnmatchedRegion};
use std::collections::HashMap;
use tracing::{info, warn};

/// Left-join result plus the regions that found no statistic.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub regions: Vec<JoinedRegion>,
    pub unmatched: Vec<UnmatchedRegion>,
}

impl JoinOutcome {
    pub fn matched_count(&self) -> usize {
        self.regions.len() - self.unmatched.len()
    }
}

/// Joins geometry (left) to statistics (right) on exact region name.
///
/// Output order follows `geometries`. Names are expected to be canonical on
/// both sides already; no fuzzy matching happens here. If `stats` repeats a
/// name, the first occurrence wins.
pub fn join_regions(geometries: Vec<RegionGeometry>, stats: &[RegionStat]) -> JoinOutcome {
    let mut lookup: HashMap<&str, f64> = HashMap::with_capacity(stats.len());
    for stat in stats {
        lookup.entry(stat.region_name.as_str()).or_insert(stat.statistic);
    }

    let mut unmatched = Vec::new();
    let regions: Vec<JoinedRegion> = geometries
        .into_iter()
        .map(|geometry| {
            let statistic = lookup.get(geometry.region_name.as_str()).copied();
            if statistic.is_none() {
                unmatched.push(UnmatchedRegion {
                    region_name: geometry.region_name.clone(),
                });
            }
            JoinedRegion {
                region_name: geometry.region_name,
                geometry: geometry.geometry,
                crs: geometry.crs,
                statistic,
            }
        })
        .collect();

    if !unmatched.is_empty() {
        let names: Vec<&str> = unmatched.iter().map(|u| u.region_name.as_str()).collect();
        warn!(count = unmatched.len(), regions = ?names, "regions missing birth rate data");
    }
    info!(
        regions = regions.len(),
        matched = regions.len() - unmatched.len(),
        "joined statistics onto boundaries"
    );

    JoinOutcome { regions, unmatched }
}
