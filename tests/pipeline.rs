// tests/pipeline.rs
use std::fs;
use std::path::{Path, PathBuf};

use birthmap::config::AppConfig;
use birthmap::pipeline;
use birthmap::render::NO_DATA_COLOR;
use birthmap::types::Crs;
use birthmap::PipelineError;

const SIDO_GEOJSON: &str = r#"{
  "type": "FeatureCollection",
  "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::4326" } },
  "features": [
    { "type": "Feature", "properties": { "CTP_KOR_NM": "강원도" },
      "geometry": { "type": "Polygon", "coordinates": [[[127.5,37.2],[129.3,37.2],[129.3,38.6],[127.5,38.6],[127.5,37.2]]] } },
    { "type": "Feature", "properties": { "CTP_KOR_NM": "서울" },
      "geometry": { "type": "Polygon", "coordinates": [[[126.8,37.4],[127.2,37.4],[127.2,37.7],[126.8,37.7],[126.8,37.4]]] } },
    { "type": "Feature", "properties": { "CTP_KOR_NM": "부산" },
      "geometry": { "type": "Polygon", "coordinates": [[[128.8,35.0],[129.3,35.0],[129.3,35.4],[128.8,35.4],[128.8,35.0]]] } }
  ]
}"#;

const RATES_CSV: &str = "행정구역별,2022,2023\n\
행정구역별,합계출산율 (가임여성 1명당 명),합계출산율 (가임여성 1명당 명)\n\
전국,0.78,0.72\n\
강원특별자치도,0.97,0.9\n\
부산,0.72,1.1\n";

fn tmp_dir(name: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("birthmap_it_{}", name));
    let _ = fs::remove_dir_all(&p);
    fs::create_dir_all(&p).unwrap();
    p
}

fn write_fixture(dir: &Path, csv: &str, geojson: &str, extra_input: &str) -> AppConfig {
    fs::write(dir.join("rates.csv"), csv).unwrap();
    fs::write(dir.join("sido.json"), geojson).unwrap();
    fs::write(
        dir.join("aliases.toml"),
        "[aliases]\n\"강원특별자치도\" = \"강원도\"\n\"제주특별자치도\" = \"제주특별자치도\"\n",
    )
    .unwrap();
    let config_path = dir.join("config.toml");
    fs::write(
        &config_path,
        format!(
            "[input]\nspreadsheet = \"rates.csv\"\ngeometry = \"sido.json\"\n{}\n\n\
             [processing]\nalias_file = \"aliases.toml\"\n\n\
             [output]\nhtml = \"out/map.html\"\n",
            extra_input
        ),
    )
    .unwrap();
    AppConfig::load_from_file(&config_path).unwrap()
}

#[test]
fn full_run_joins_aliases_and_reports_missing_region() {
    let dir = tmp_dir("full_run");
    let config = write_fixture(&dir, RATES_CSV, SIDO_GEOJSON, "");

    let (map, outcome) = pipeline::run(&config).unwrap();

    let joined: Vec<(&str, Option<f64>)> = outcome
        .regions
        .iter()
        .map(|r| (r.region_name.as_str(), r.statistic))
        .collect();
    assert_eq!(
        joined,
        vec![("강원도", Some(0.9)), ("서울", None), ("부산", Some(1.1))]
    );
    let unmatched: Vec<&str> = outcome.unmatched.iter().map(|u| u.region_name.as_str()).collect();
    assert_eq!(unmatched, vec!["서울"]);
    assert!(outcome.regions.iter().all(|r| r.crs == Crs::KOREA_UNIFIED));

    assert!(map.html.contains(NO_DATA_COLOR));
    assert!(!map.html.contains("전국"));

    birthmap::render::write_map(&map, &config.output.html).unwrap();
    assert!(dir.join("out/map.html").exists());
}

#[test]
fn geometry_without_crs_fails_unless_configured() {
    let dir = tmp_dir("no_crs");
    let undeclared = SIDO_GEOJSON.replace(
        r#""crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::4326" } },"#,
        "",
    );

    let config = write_fixture(&dir, RATES_CSV, &undeclared, "");
    let err = pipeline::prepare(&config).unwrap_err();
    assert!(matches!(err, PipelineError::SchemaMismatch { .. }), "{err}");

    let config = write_fixture(&dir, RATES_CSV, &undeclared, "geometry_crs = \"EPSG:4326\"");
    let outcome = pipeline::prepare(&config).unwrap();
    assert_eq!(outcome.regions.len(), 3);
}

#[test]
fn bad_statistic_aborts_before_join() {
    let dir = tmp_dir("bad_value");
    let csv = RATES_CSV.replace("부산,0.72,1.1", "부산,0.72,n/a");
    let config = write_fixture(&dir, &csv, SIDO_GEOJSON, "");

    match pipeline::run(&config).unwrap_err() {
        PipelineError::TypeCoercionFailure { column, value, .. } => {
            assert!(column.contains("2023"));
            assert_eq!(value, "n/a");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_spreadsheet_is_source_unavailable() {
    let dir = tmp_dir("missing_sheet");
    let mut config = write_fixture(&dir, RATES_CSV, SIDO_GEOJSON, "");
    config.input.spreadsheet = dir.join("absent.csv");

    let err = pipeline::prepare(&config).unwrap_err();
    assert!(matches!(err, PipelineError::SourceUnavailable { ref source_id, .. } if source_id.contains("absent.csv")));
}

#[test]
fn empty_statistics_still_render_every_region() {
    let dir = tmp_dir("empty_stats");
    let header_only = "행정구역별,2023\n행정구역별,합계출산율 (가임여성 1명당 명)\n전국,0.72\n";
    let config = write_fixture(&dir, header_only, SIDO_GEOJSON, "");

    let (map, outcome) = pipeline::run(&config).unwrap();
    assert_eq!(outcome.regions.len(), 3);
    assert_eq!(outcome.unmatched.len(), 3);
    assert_eq!(map.legend.len(), 1);
    assert_eq!(map.legend[0].color, NO_DATA_COLOR);
}
