//! Choropleth rendering to a self-contained Leaflet page.
//!
//! Polygons are colored here rather than in the browser so the page carries
//! no styling logic of its own: each feature ships with its fill color, and
//! the legend is generated from the same [`ColorScale`].

use crate::config::MapStyle;
use crate::error::Result;
use crate::projection;
use crate::types::{Crs, JoinedRegion};
use geo::MultiPolygon;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject};
use serde_json::json;
use std::fs;
use std::path::Path;
use tracing::info;

/// ColorBrewer YlGnBu, light to dark.
pub static YL_GN_BU: [&str; 6] = [
    "#ffffcc", "#c7e9b4", "#7fcdbb", "#41b6c4", "#2c7fb8", "#253494",
];

/// Fill for regions without a statistic.
pub const NO_DATA_COLOR: &str = "#bdbdbd";
pub const NO_DATA_LABEL: &str = "No data";

/// Equal-width classes between the smallest and largest statistic.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorScale {
    min: f64,
    max: f64,
    classes: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub color: &'static str,
    pub label: String,
}

impl ColorScale {
    /// `None` when there is nothing to scale.
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Option<Self> {
        let mut bounds: Option<(f64, f64)> = None;
        for v in values {
            bounds = Some(match bounds {
                None => (v, v),
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
            });
        }
        let (min, max) = bounds?;
        // A constant statistic collapses to a single class.
        let classes = if max > min { YL_GN_BU.len() } else { 1 };
        Some(Self { min, max, classes })
    }

    fn palette(&self) -> &'static [&'static str] {
        if self.classes == 1 {
            &YL_GN_BU[YL_GN_BU.len() - 1..]
        } else {
            &YL_GN_BU
        }
    }

    fn class_of(&self, value: f64) -> usize {
        if self.classes == 1 {
            return 0;
        }
        let position = (value - self.min) / (self.max - self.min) * self.classes as f64;
        (position.floor().max(0.0) as usize).min(self.classes - 1)
    }

    pub fn color_for(&self, value: f64) -> &'static str {
        self.palette()[self.class_of(value)]
    }

    pub fn legend(&self) -> Vec<LegendEntry> {
        let width = (self.max - self.min) / self.classes as f64;
        self.palette()
            .iter()
            .enumerate()
            .map(|(i, color)| {
                let lower = self.min + width * i as f64;
                let upper = if i + 1 == self.classes {
                    self.max
                } else {
                    self.min + width * (i + 1) as f64
                };
                let label = if self.classes == 1 {
                    format!("{:.2}", self.min)
                } else {
                    format!("{:.2} - {:.2}", lower, upper)
                };
                LegendEntry { color, label }
            })
            .collect()
    }
}

/// The rendered artifact, returned by value.
#[derive(Debug, Clone)]
pub struct RenderedMap {
    pub html: String,
    pub legend: Vec<LegendEntry>,
}

/// Fill color for a region under `scale`, or the no-data fill.
pub fn fill_color(scale: Option<&ColorScale>, statistic: Option<f64>) -> &'static str {
    match (scale, statistic) {
        (Some(scale), Some(value)) => scale.color_for(value),
        _ => NO_DATA_COLOR,
    }
}

/// Leaflet draws lon/lat, so projected boundaries go back to WGS84.
fn display_geometry(region: &JoinedRegion) -> Result<MultiPolygon<f64>> {
    projection::reproject(&region.geometry, region.crs, Crs::WGS84)
}

pub fn render_map(regions: &[JoinedRegion], style: &MapStyle) -> Result<RenderedMap> {
    let scale = ColorScale::from_values(regions.iter().filter_map(|r| r.statistic));

    let mut features = Vec::with_capacity(regions.len());
    for region in regions {
        let display = display_geometry(region)?;

        let mut properties = JsonObject::new();
        properties.insert("name".into(), json!(region.region_name));
        properties.insert("statistic".into(), json!(region.statistic));
        properties.insert(
            "fill".into(),
            json!(fill_color(scale.as_ref(), region.statistic)),
        );
        properties.insert("no_data".into(), json!(region.statistic.is_none()));

        features.push(Feature {
            bbox: None,
            geometry: Some(Geometry::new(geojson::Value::from(&display))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };

    let mut legend = scale.as_ref().map(ColorScale::legend).unwrap_or_default();
    if regions.iter().any(|r| r.statistic.is_none()) {
        legend.push(LegendEntry {
            color: NO_DATA_COLOR,
            label: NO_DATA_LABEL.to_string(),
        });
    }

    let html = page(style, &collection.to_string(), &legend);
    info!(
        regions = regions.len(),
        legend_rows = legend.len(),
        "rendered choropleth map"
    );
    Ok(RenderedMap { html, legend })
}

pub fn write_map(map: &RenderedMap, path: &Path) -> anyhow::Result<()> {
    use anyhow::Context;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
    }
    fs::write(path, &map.html).with_context(|| format!("Failed to write map: {:?}", path))?;
    info!(path = %path.display(), "wrote map");
    Ok(())
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn legend_html(title: &str, legend: &[LegendEntry]) -> String {
    let mut out = format!("<h4>{}</h4>", escape_html(title));
    for entry in legend {
        let class = if entry.color == NO_DATA_COLOR { " class=\"no-data\"" } else { "" };
        out.push_str(&format!(
            "<div><i{} style=\"background:{}\"></i>{}</div>",
            class,
            entry.color,
            escape_html(&entry.label)
        ));
    }
    out
}

fn page(style: &MapStyle, geojson: &str, legend: &[LegendEntry]) -> String {
    // Keep "</script>" inside the payload from closing the script element.
    let payload = geojson.replace("</", "<\\/");
    let legend = serde_json::to_string(&legend_html(&style.legend_title, legend))
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace("</", "<\\/");

    PAGE_TEMPLATE
        .replace("{{TITLE}}", &escape_html(&style.title))
        .replace("{{LAT}}", &style.center[0].to_string())
        .replace("{{LON}}", &style.center[1].to_string())
        .replace("{{ZOOM}}", &style.zoom.to_string())
        .replace("{{FILL_OPACITY}}", &style.fill_opacity.to_string())
        .replace("{{LINE_OPACITY}}", &style.line_opacity.to_string())
        .replace("{{NO_DATA}}", NO_DATA_LABEL)
        .replace("{{LEGEND}}", &legend)
        .replace("{{GEOJSON}}", &payload)
}

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="ko">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>{{TITLE}}</title>
  <link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/leaflet/1.9.4/leaflet.css" crossorigin="anonymous"
    referrerpolicy="no-referrer" />
  <script src="https://cdnjs.cloudflare.com/ajax/libs/leaflet/1.9.4/leaflet.js" crossorigin="anonymous"
    referrerpolicy="no-referrer"></script>
  <style>
    html, body { margin: 0; height: 100%; font-family: sans-serif; }
    h1 { margin: 0; padding: 0.5rem 1rem; font-size: 1.25rem; }
    #map { position: absolute; top: 2.75rem; bottom: 0; left: 0; right: 0; }
    .legend { background: rgba(255, 255, 255, 0.9); padding: 6px 10px; border-radius: 4px; line-height: 18px; }
    .legend h4 { margin: 0 0 4px; }
    .legend i { width: 18px; height: 18px; float: left; margin-right: 8px; opacity: {{FILL_OPACITY}}; }
    .legend i.no-data { outline: 1px dashed #555; outline-offset: -1px; }
  </style>
</head>
<body>
  <h1>{{TITLE}}</h1>
  <div id="map"></div>
  <script>
    const regions = {{GEOJSON}};
    const map = L.map('map').setView([{{LAT}}, {{LON}}], {{ZOOM}});
    L.tileLayer('https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png', {
      maxZoom: 19,
      attribution: '&copy; OpenStreetMap contributors'
    }).addTo(map);

    L.geoJSON(regions, {
      style: (feature) => ({
        fillColor: feature.properties.fill,
        fillOpacity: {{FILL_OPACITY}},
        color: '#000',
        weight: 1,
        opacity: {{LINE_OPACITY}},
        dashArray: feature.properties.no_data ? '4 4' : null
      }),
      onEachFeature: (feature, layer) => {
        const p = feature.properties;
        const value = p.statistic === null ? '{{NO_DATA}}' : p.statistic.toFixed(2);
        const tip = document.createElement('span');
        tip.textContent = p.name + ': ' + value;
        layer.bindTooltip(tip, { sticky: true });
      }
    }).addTo(map);

    const legend = L.control({ position: 'bottomright' });
    legend.onAdd = () => {
      const div = L.DomUtil.create('div', 'legend');
      div.innerHTML = {{LEGEND}};
      return div;
    };
    legend.addTo(map);
  </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn region(name: &str, statistic: Option<f64>) -> JoinedRegion {
        JoinedRegion {
            region_name: name.to_string(),
            geometry: MultiPolygon::new(vec![polygon![
                (x: 127.0, y: 37.0),
                (x: 128.0, y: 37.0),
                (x: 128.0, y: 38.0),
            ]]),
            crs: Crs::WGS84,
            statistic,
        }
    }

    #[test]
    fn scale_spans_min_to_max_in_six_classes() {
        let scale = ColorScale::from_values([0.5, 0.8, 1.1]).unwrap();
        assert_eq!(scale.color_for(0.5), YL_GN_BU[0]);
        assert_eq!(scale.color_for(1.1), YL_GN_BU[5]);
        assert_eq!(scale.color_for(0.85), YL_GN_BU[3]);

        let legend = scale.legend();
        assert_eq!(legend.len(), 6);
        assert_eq!(legend[0].label, "0.50 - 0.60");
        assert_eq!(legend[5].label, "1.00 - 1.10");
    }

    #[test]
    fn constant_statistic_uses_single_class() {
        let scale = ColorScale::from_values([0.7, 0.7]).unwrap();
        assert_eq!(scale.color_for(0.7), YL_GN_BU[5]);
        assert_eq!(scale.legend().len(), 1);
        assert!(ColorScale::from_values(std::iter::empty()).is_none());
    }

    #[test]
    fn missing_statistic_gets_no_data_fill_and_legend_row() {
        let regions = vec![region("강원도", Some(0.9)), region("서울", None), region("부산", Some(1.1))];
        let map = render_map(&regions, &MapStyle::default()).unwrap();

        let last = map.legend.last().unwrap();
        assert_eq!(last.color, NO_DATA_COLOR);
        assert_eq!(last.label, NO_DATA_LABEL);
        assert!(map.html.contains(NO_DATA_COLOR));
        assert!(map.html.contains("서울"));
    }

    #[test]
    fn page_uses_configured_view() {
        let map = render_map(&[region("강원도", Some(0.9))], &MapStyle::default()).unwrap();
        assert!(map.html.contains("setView([36.5, 127.5], 7)"));
        assert!(map.html.contains("fillOpacity: 0.7"));
        assert!(map.html.contains("출산율"));
        assert!(!map.html.contains("{{"));
        assert!(map.legend.iter().all(|e| e.color != NO_DATA_COLOR));
    }

    #[test]
    fn projected_regions_are_drawn_in_lon_lat() {
        let mut projected = region("강원도", Some(0.9));
        projected.geometry =
            projection::reproject(&projected.geometry, Crs::WGS84, Crs::KOREA_UNIFIED).unwrap();
        projected.crs = Crs::KOREA_UNIFIED;

        let display = display_geometry(&projected).unwrap();
        for coord in display.0[0].exterior().coords() {
            assert!((126.9..128.1).contains(&coord.x), "lon {}", coord.x);
            assert!((36.9..38.1).contains(&coord.y), "lat {}", coord.y);
        }
    }

    #[test]
    fn region_names_cannot_break_out_of_the_script() {
        let map = render_map(&[region("</script><b>", Some(1.0))], &MapStyle::default()).unwrap();
        assert!(!map.html.contains("</script><b>"));
    }

    #[test]
    fn tooltips_render_region_names_as_text() {
        let map = render_map(&[region("<img src=x onerror=alert(1)>", Some(1.0))], &MapStyle::default()).unwrap();
        assert!(map.html.contains("tip.textContent = p.name"));
        assert!(map.html.contains("bindTooltip(tip"));
        assert!(!map.html.contains("bindTooltip(p.name"));
    }
}
