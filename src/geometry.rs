//! Boundary geometry loader: GeoJSON or shapefile in, one
//! [`RegionGeometry`] per region out, all in the target reference system.

use crate::config::InputConfig;
use crate::error::{PipelineError, Result};
use crate::projection;
use crate::types::{Crs, RegionGeometry};
use geo::MultiPolygon;
use geojson::{FeatureCollection, GeoJson};
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;
use tracing::{debug, info, warn};

/// Records as read from the file, before CRS normalization.
#[derive(Debug)]
pub struct RawGeometries {
    pub declared_crs: Option<Crs>,
    pub records: Vec<(String, MultiPolygon<f64>)>,
}

pub fn load_region_geometries(input: &InputConfig, target: Crs) -> Result<Vec<RegionGeometry>> {
    let path = &input.geometry;
    let source_id = path.display().to_string();
    info!(source = %source_id, "loading boundary geometry");

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .ok_or_else(|| PipelineError::unavailable(&source_id, "geometry file has no extension"))?;

    let raw = match extension.as_str() {
        "json" | "geojson" => {
            let file = File::open(path).map_err(|e| PipelineError::unavailable(&source_id, e))?;
            read_geojson(BufReader::new(file), &source_id, &input.name_property)?
        }
        "shp" => read_shapefile(path, &source_id, &input.name_property)?,
        _ => {
            return Err(PipelineError::unavailable(
                &source_id,
                format!("unsupported geometry format: {}", extension),
            ))
        }
    };

    let source_crs = match (input.geometry_crs, raw.declared_crs) {
        (Some(configured), declared) => {
            if let Some(declared) = declared.filter(|d| *d != configured) {
                warn!(%declared, %configured, "configured geometry CRS overrides the declared one");
            }
            configured
        }
        (None, Some(declared)) => declared,
        (None, None) => {
            return Err(PipelineError::schema(
                &source_id,
                "no coordinate reference system declared; set input.geometry_crs",
            ))
        }
    };
    info!(crs = %source_crs, regions = raw.records.len(), "read boundary records");

    let records = raw
        .records
        .into_iter()
        .map(|(region_name, geometry)| RegionGeometry {
            region_name,
            geometry,
            crs: source_crs,
        })
        .collect();

    normalize_crs(records, target)
}

/// Guarantees every record is expressed in `target`, reprojecting where the
/// record's CRS differs.
pub fn normalize_crs(records: Vec<RegionGeometry>, target: Crs) -> Result<Vec<RegionGeometry>> {
    let mut converted = 0usize;
    let out = records
        .into_iter()
        .map(|record| -> Result<RegionGeometry> {
            if record.crs == target {
                return Ok(record);
            }
            converted += 1;
            let geometry = projection::reproject(&record.geometry, record.crs, target)?;
            Ok(RegionGeometry {
                region_name: record.region_name,
                geometry,
                crs: target,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if converted > 0 {
        info!(converted, %target, "reprojected boundary records");
    } else {
        debug!(%target, "boundary records already in target CRS");
    }
    Ok(out)
}

/// Parses a GeoJSON FeatureCollection.
pub fn read_geojson<R: Read>(reader: R, source_id: &str, name_property: &str) -> Result<RawGeometries> {
    // Parse the whole document; boundary files for one country fit in memory.
    let geojson = GeoJson::from_reader(reader).map_err(|e| PipelineError::unavailable(source_id, e))?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => {
            return Err(PipelineError::unavailable(
                source_id,
                "GeoJSON must be a FeatureCollection",
            ))
        }
    };

    let declared_crs = declared_geojson_crs(&collection, source_id)?;
    let mut records = Vec::new();

    for (index, feature) in collection.features.into_iter().enumerate() {
        let name = match feature.properties.as_ref().and_then(|props| props.get(name_property)) {
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => {
                return Err(PipelineError::schema(
                    source_id,
                    format!("feature {} has no '{}' property", index, name_property),
                ))
            }
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let value: geo::Geometry<f64> = geom.value.try_into().map_err(|e| {
                    PipelineError::unavailable(source_id, format!("feature '{}': {}", name, e))
                })?;
                match value {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => return Err(not_areal(source_id, index, &name)),
                }
            }
            None => return Err(not_areal(source_id, index, &name)),
        };

        records.push((name, geometry));
    }

    Ok(RawGeometries {
        declared_crs,
        records,
    })
}

/// A named region must have a boundary; dropping it would hide the region
/// from both the map and the unmatched-region report.
fn not_areal(source_id: &str, index: usize, name: &str) -> PipelineError {
    PipelineError::schema(
        source_id,
        format!(
            "feature {} ('{}') has no polygon or multipolygon geometry",
            index, name
        ),
    )
}

/// Reads the legacy `crs` member, in either the named or the EPSG-code form.
fn declared_geojson_crs(collection: &FeatureCollection, source_id: &str) -> Result<Option<Crs>> {
    let Some(crs) = collection
        .foreign_members
        .as_ref()
        .and_then(|members| members.get("crs"))
    else {
        return Ok(None);
    };

    let props = crs.get("properties");
    let identifier = props
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
        .map(str::to_string)
        .or_else(|| {
            props
                .and_then(|p| p.get("code"))
                .and_then(|c| c.as_u64())
                .map(|c| c.to_string())
        });

    match identifier {
        Some(id) => id
            .parse::<Crs>()
            .map(Some)
            .map_err(|e| PipelineError::schema(source_id, e.to_string())),
        None => Err(PipelineError::schema(
            source_id,
            format!("unreadable crs member: {}", crs),
        )),
    }
}

fn read_shapefile(path: &Path, source_id: &str, name_property: &str) -> Result<RawGeometries> {
    let mut reader = shapefile::Reader::from_path(path)
        .map_err(|e| PipelineError::unavailable(source_id, e))?;

    let prj = path.with_extension("prj");
    let declared_crs = match fs::read_to_string(&prj) {
        Ok(wkt) => {
            let crs = Crs::from_wkt(&wkt);
            if crs.is_none() {
                warn!(prj = %prj.display(), "projection file carries no EPSG authority");
            }
            crs
        }
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => return Err(PipelineError::unavailable(prj.display().to_string(), e)),
    };

    let mut records = Vec::new();

    for (index, result) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = result.map_err(|e| PipelineError::unavailable(source_id, e))?;

        let name = match record.get(name_property) {
            Some(shapefile::dbase::FieldValue::Character(Some(s))) => s.trim().to_string(),
            Some(shapefile::dbase::FieldValue::Numeric(Some(n))) => n.to_string(),
            _ => {
                return Err(PipelineError::schema(
                    source_id,
                    format!("record has no '{}' field", name_property),
                ))
            }
        };

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon.try_into().map_err(|e| {
                PipelineError::unavailable(source_id, format!("polygon '{}': {:?}", name, e))
            })?,
            shapefile::Shape::PolygonM(polygon) => polygon.try_into().map_err(|e| {
                PipelineError::unavailable(source_id, format!("polygonM '{}': {:?}", name, e))
            })?,
            shapefile::Shape::PolygonZ(polygon) => polygon.try_into().map_err(|e| {
                PipelineError::unavailable(source_id, format!("polygonZ '{}': {:?}", name, e))
            })?,
            _ => return Err(not_areal(source_id, index, &name)),
        };

        records.push((name, geometry));
    }

    Ok(RawGeometries {
        declared_crs,
        records,
    })
}
