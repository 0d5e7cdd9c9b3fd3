use geo::MultiPolygon;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// One spreadsheet row after column selection, filtering and aliasing.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionStat {
    pub region_name: String,
    pub statistic: f64,
}

/// One boundary record from the geometry source.
#[derive(Debug, Clone)]
pub struct RegionGeometry {
    pub region_name: String,
    pub geometry: MultiPolygon<f64>,
    pub crs: Crs,
}

/// A geometry record with its statistic, if the tabular source had one.
#[derive(Debug, Clone)]
pub struct JoinedRegion {
    pub region_name: String,
    pub geometry: MultiPolygon<f64>,
    pub crs: Crs,
    pub statistic: Option<f64>,
}

/// Geometry record that found no statistic during the join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedRegion {
    pub region_name: String,
}

/// Coordinate reference system, identified by EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Crs(pub u32);

impl Crs {
    pub const WGS84: Crs = Crs(4326);
    pub const WEB_MERCATOR: Crs = Crs(3857);
    pub const KOREA_UNIFIED: Crs = Crs(5179);
    pub const KOREA_CENTRAL_2010: Crs = Crs(5186);

    pub fn epsg(&self) -> u32 {
        self.0
    }

    /// Extracts the EPSG code from a WKT definition (e.g. a shapefile `.prj`).
    ///
    /// The outermost `AUTHORITY["EPSG","n"]` is the last one in the text; the
    /// earlier ones belong to nested datum/ellipsoid/unit nodes.
    pub fn from_wkt(wkt: &str) -> Option<Crs> {
        let upper = wkt.to_ascii_uppercase();
        let idx = upper.rfind("AUTHORITY[\"EPSG\"")?;
        let tail = &wkt[idx + "AUTHORITY[\"EPSG\"".len()..];
        let digits: String = tail
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok().map(Crs)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCrsError(pub String);

impl fmt::Display for ParseCrsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognised CRS identifier '{}'", self.0)
    }
}

impl std::error::Error for ParseCrsError {}

impl FromStr for Crs {
    type Err = ParseCrsError;

    /// Accepts `EPSG:5179`, `urn:ogc:def:crs:EPSG::5179`,
    /// `urn:ogc:def:crs:OGC:1.3:CRS84` and bare numeric codes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.ends_with("crs84") {
            return Ok(Crs::WGS84);
        }
        let code = if let Some(rest) = lower.strip_prefix("epsg:") {
            rest
        } else if let Some(idx) = lower.find("epsg::") {
            &lower[idx + "epsg::".len()..]
        } else if let Some(idx) = lower.find("epsg:") {
            // urn variants with an explicit version, e.g. EPSG:6.6:4326
            lower[idx..].rsplit(':').next().unwrap_or_default()
        } else {
            lower.as_str()
        };
        code.trim()
            .parse::<u32>()
            .map(Crs)
            .map_err(|_| ParseCrsError(trimmed.to_string()))
    }
}

impl Serialize for Crs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Crs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_crs_spellings() {
        assert_eq!("EPSG:5179".parse::<Crs>().unwrap(), Crs::KOREA_UNIFIED);
        assert_eq!("epsg:4326".parse::<Crs>().unwrap(), Crs::WGS84);
        assert_eq!(
            "urn:ogc:def:crs:EPSG::5186".parse::<Crs>().unwrap(),
            Crs::KOREA_CENTRAL_2010
        );
        assert_eq!(
            "urn:ogc:def:crs:OGC:1.3:CRS84".parse::<Crs>().unwrap(),
            Crs::WGS84
        );
        assert_eq!("3857".parse::<Crs>().unwrap(), Crs::WEB_MERCATOR);
        assert!("not a crs".parse::<Crs>().is_err());
    }

    #[test]
    fn reads_outer_authority_from_wkt() {
        let wkt = r#"PROJCS["Korea 2000 / Unified CS",GEOGCS["Korea 2000",DATUM["Geocentric_datum_of_Korea",SPHEROID["GRS 1980",6378137,298.257222101,AUTHORITY["EPSG","7019"]],AUTHORITY["EPSG","6737"]],AUTHORITY["EPSG","4737"]],PROJECTION["Transverse_Mercator"],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AUTHORITY["EPSG","5179"]]"#;
        assert_eq!(Crs::from_wkt(wkt), Some(Crs::KOREA_UNIFIED));
        assert_eq!(Crs::from_wkt("GEOGCS[\"unknown\"]"), None);
    }

    #[test]
    fn display_round_trips_through_from_str() {
        let crs = Crs(5179);
        assert_eq!(crs.to_string(), "EPSG:5179");
        assert_eq!(crs.to_string().parse::<Crs>().unwrap(), crs);
    }
}
