use crate::types::Crs;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// Statistics spreadsheet (.xlsx/.xls/.ods/.csv) with a two-row header.
    pub spreadsheet: PathBuf,
    /// Boundary file (.json/.geojson/.shp).
    pub geometry: PathBuf,
    /// Overrides whatever CRS the geometry file declares.
    pub geometry_crs: Option<Crs>,
    /// Feature property holding the region name.
    #[serde(default = "default_name_property")]
    pub name_property: String,
    #[serde(default = "default_region_column")]
    pub region_column: ColumnKey,
    #[serde(default = "default_statistic_column")]
    pub statistic_column: ColumnKey,
}

/// A column addressed by both rows of a two-level header, written as
/// `["2023", "합계출산율 (가임여성 1명당 명)"]` in TOML.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(from = "[String; 2]")]
pub struct ColumnKey {
    pub top: String,
    pub sub: String,
}

impl ColumnKey {
    pub fn new(top: impl Into<String>, sub: impl Into<String>) -> Self {
        Self {
            top: top.into(),
            sub: sub.into(),
        }
    }

    pub fn matches(&self, top: &str, sub: &str) -> bool {
        self.top.trim() == top.trim() && self.sub.trim() == sub.trim()
    }
}

impl From<[String; 2]> for ColumnKey {
    fn from([top, sub]: [String; 2]) -> Self {
        Self { top, sub }
    }
}

impl std::fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "('{}', '{}')", self.top, self.sub)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProcessingConfig {
    #[serde(default = "default_target_crs")]
    pub target_crs: Crs,
    /// Aggregate row label excluded from per-region data.
    #[serde(default = "default_sentinel")]
    pub sentinel: String,
    /// TOML file with an `[aliases]` table; entries override `aliases` below.
    pub alias_file: Option<PathBuf>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            target_crs: default_target_crs(),
            sentinel: default_sentinel(),
            alias_file: None,
            aliases: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_html")]
    pub html: PathBuf,
    #[serde(default)]
    pub map: MapStyle,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            html: default_html(),
            map: MapStyle::default(),
        }
    }
}

/// Fixed presentation parameters of the rendered map.
#[derive(Debug, Deserialize, Clone)]
pub struct MapStyle {
    /// `[lat, lon]` of the initial view.
    #[serde(default = "default_center")]
    pub center: [f64; 2],
    #[serde(default = "default_zoom")]
    pub zoom: u8,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_legend_title")]
    pub legend_title: String,
    #[serde(default = "default_fill_opacity")]
    pub fill_opacity: f64,
    #[serde(default = "default_line_opacity")]
    pub line_opacity: f64,
}

impl Default for MapStyle {
    fn default() -> Self {
        Self {
            center: default_center(),
            zoom: default_zoom(),
            title: default_title(),
            legend_title: default_legend_title(),
            fill_opacity: default_fill_opacity(),
            line_opacity: default_line_opacity(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_name_property() -> String {
    "CTP_KOR_NM".to_string()
}

fn default_region_column() -> ColumnKey {
    ColumnKey::new("행정구역별", "행정구역별")
}

fn default_statistic_column() -> ColumnKey {
    ColumnKey::new("2023", "합계출산율 (가임여성 1명당 명)")
}

fn default_target_crs() -> Crs {
    Crs::KOREA_UNIFIED
}

fn default_sentinel() -> String {
    "전국".to_string()
}

fn default_html() -> PathBuf {
    PathBuf::from("birth_rate_map.html")
}

fn default_center() -> [f64; 2] {
    [36.5, 127.5]
}

fn default_zoom() -> u8 {
    7
}

fn default_title() -> String {
    "Regional Birth Rate Choropleth Map".to_string()
}

fn default_legend_title() -> String {
    "출산율".to_string()
}

fn default_fill_opacity() -> f64 {
    0.7
}

fn default_line_opacity() -> f64 {
    0.2
}

fn default_port() -> u16 {
    3000
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let mut config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.resolve_relative_to(path.parent().unwrap_or_else(|| Path::new(".")));
        Ok(config)
    }

    /// Paths in the config file are relative to the file, not the cwd.
    fn resolve_relative_to(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        rebase(&mut self.input.spreadsheet);
        rebase(&mut self.input.geometry);
        rebase(&mut self.output.html);
        if let Some(alias_file) = self.processing.alias_file.as_mut() {
            rebase(alias_file);
        }
    }
}
