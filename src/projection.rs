//! Coordinate conversion between the handful of reference systems the
//! boundary files for Korea are published in.
//!
//! Every transform pivots through geographic lon/lat degrees. The Korea 2000
//! systems sit on GRS80 with a zero datum shift to WGS84, so no datum
//! transformation is needed.

use crate::error::{PipelineError, Result};
use crate::types::Crs;
use geo::{Coord, MapCoords, MultiPolygon};
use std::f64::consts::PI;

// GRS80
const SEMI_MAJOR: f64 = 6_378_137.0;
const INV_FLATTENING: f64 = 298.257_222_101;

// Spherical radius used by Web Mercator
const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;
const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// Transverse Mercator parameters, angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransverseMercator {
    pub lat_origin: f64,
    pub lon_origin: f64,
    pub scale: f64,
    pub false_easting: f64,
    pub false_northing: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Geographic,
    WebMercator,
    TransverseMercator(TransverseMercator),
}

impl Projection {
    pub fn for_crs(crs: Crs) -> Option<Projection> {
        match crs.epsg() {
            // WGS84, ETRS89, Korea 2000 geographic, bare GRS80 ellipsoid
            4326 | 4258 | 4737 | 4019 => Some(Projection::Geographic),
            3857 | 900913 => Some(Projection::WebMercator),
            // Korea 2000 / Unified CS
            5179 => Some(Projection::TransverseMercator(TransverseMercator {
                lat_origin: 38.0,
                lon_origin: 127.5,
                scale: 0.9996,
                false_easting: 1_000_000.0,
                false_northing: 2_000_000.0,
            })),
            // Korea 2000 / Central Belt 2010
            5186 => Some(Projection::TransverseMercator(TransverseMercator {
                lat_origin: 38.0,
                lon_origin: 127.0,
                scale: 1.0,
                false_easting: 200_000.0,
                false_northing: 600_000.0,
            })),
            _ => None,
        }
    }

    /// Geographic `(lon, lat)` degrees to projected coordinates.
    pub fn forward(&self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Projection::Geographic => c,
            Projection::WebMercator => {
                let lat = c.y.clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT);
                Coord {
                    x: WEB_MERCATOR_RADIUS * c.x.to_radians(),
                    y: WEB_MERCATOR_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln(),
                }
            }
            Projection::TransverseMercator(tm) => tm.forward(c),
        }
    }

    /// Projected coordinates back to geographic `(lon, lat)` degrees.
    pub fn inverse(&self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Projection::Geographic => c,
            Projection::WebMercator => Coord {
                x: (c.x / WEB_MERCATOR_RADIUS).to_degrees(),
                y: (2.0 * (c.y / WEB_MERCATOR_RADIUS).exp().atan() - PI / 2.0).to_degrees(),
            },
            Projection::TransverseMercator(tm) => tm.inverse(c),
        }
    }
}

struct Ellipsoid {
    e2: f64,
    ep2: f64,
}

fn grs80() -> Ellipsoid {
    let f = 1.0 / INV_FLATTENING;
    let e2 = f * (2.0 - f);
    Ellipsoid {
        e2,
        ep2: e2 / (1.0 - e2),
    }
}

/// Meridian arc length from the equator to latitude `phi` (radians).
fn meridian_arc(phi: f64, e2: f64) -> f64 {
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    SEMI_MAJOR
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

impl TransverseMercator {
    pub fn forward(&self, c: Coord<f64>) -> Coord<f64> {
        let Ellipsoid { e2, ep2 } = grs80();
        let phi = c.y.to_radians();
        let lam = (c.x - self.lon_origin).to_radians();

        let (sin_phi, cos_phi) = phi.sin_cos();
        let n = SEMI_MAJOR / (1.0 - e2 * sin_phi * sin_phi).sqrt();
        let t = phi.tan().powi(2);
        let cc = ep2 * cos_phi * cos_phi;
        let a = lam * cos_phi;

        let m = meridian_arc(phi, e2);
        let m0 = meridian_arc(self.lat_origin.to_radians(), e2);

        let x = self.scale
            * n
            * (a + (1.0 - t + cc) * a.powi(3) / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * cc - 58.0 * ep2) * a.powi(5) / 120.0);
        let y = self.scale
            * (m - m0
                + n * phi.tan()
                    * (a * a / 2.0
                        + (5.0 - t + 9.0 * cc + 4.0 * cc * cc) * a.powi(4) / 24.0
                        + (61.0 - 58.0 * t + t * t + 600.0 * cc - 330.0 * ep2) * a.powi(6)
                            / 720.0));

        Coord {
            x: x + self.false_easting,
            y: y + self.false_northing,
        }
    }

    pub fn inverse(&self, c: Coord<f64>) -> Coord<f64> {
        let Ellipsoid { e2, ep2 } = grs80();
        let e4 = e2 * e2;
        let e6 = e4 * e2;

        let m0 = meridian_arc(self.lat_origin.to_radians(), e2);
        let m = m0 + (c.y - self.false_northing) / self.scale;
        let mu = m / (SEMI_MAJOR * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

        let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());
        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let (sin1, cos1) = phi1.sin_cos();
        let tan1 = phi1.tan();
        let c1 = ep2 * cos1 * cos1;
        let t1 = tan1 * tan1;
        let w = 1.0 - e2 * sin1 * sin1;
        let n1 = SEMI_MAJOR / w.sqrt();
        let r1 = SEMI_MAJOR * (1.0 - e2) / w.powf(1.5);
        let d = (c.x - self.false_easting) / (n1 * self.scale);

        let phi = phi1
            - (n1 * tan1 / r1)
                * (d * d / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                        * d.powi(6)
                        / 720.0);
        let lam = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / cos1;

        Coord {
            x: self.lon_origin + lam.to_degrees(),
            y: phi.to_degrees(),
        }
    }
}

/// Converts a single coordinate between two reference systems.
pub fn transform_coord(c: Coord<f64>, from: Crs, to: Crs) -> Result<Coord<f64>> {
    let (src, dst) = projections(from, to)?;
    convert(c, &src, &dst, from, to)
}

fn projections(from: Crs, to: Crs) -> Result<(Projection, Projection)> {
    let lookup = |crs: Crs| {
        Projection::for_crs(crs).ok_or_else(|| PipelineError::ProjectionFailure {
            from,
            to,
            detail: format!("{} is not a supported reference system", crs),
        })
    };
    Ok((lookup(from)?, lookup(to)?))
}

fn convert(
    c: Coord<f64>,
    src: &Projection,
    dst: &Projection,
    from: Crs,
    to: Crs,
) -> Result<Coord<f64>> {
    let out = dst.forward(src.inverse(c));
    if out.x.is_finite() && out.y.is_finite() {
        Ok(out)
    } else {
        Err(PipelineError::ProjectionFailure {
            from,
            to,
            detail: format!("coordinate ({}, {}) has no finite image", c.x, c.y),
        })
    }
}

/// Reprojects every vertex of `geometry` from `from` to `to`.
pub fn reproject(geometry: &MultiPolygon<f64>, from: Crs, to: Crs) -> Result<MultiPolygon<f64>> {
    if from == to {
        return Ok(geometry.clone());
    }
    let (src, dst) = projections(from, to)?;
    geometry.try_map_coords(|c| convert(c, &src, &dst, from, to))
}
