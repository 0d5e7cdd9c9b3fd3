// tests/server.rs
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Query, State};
use birthmap::config::AppConfig;
use birthmap::pipeline;
use birthmap::server::{self, AppState, QueryParams, RegionSummary};

const SIDO_GEOJSON: &str = r#"{
  "type": "FeatureCollection",
  "crs": { "type": "name", "properties": { "name": "EPSG:4326" } },
  "features": [
    { "type": "Feature", "properties": { "CTP_KOR_NM": "강원도" },
      "geometry": { "type": "Polygon", "coordinates": [[[127.5,37.2],[129.3,37.2],[129.3,38.6],[127.5,38.6],[127.5,37.2]]] } },
    { "type": "Feature", "properties": { "CTP_KOR_NM": "서울" },
      "geometry": { "type": "Polygon", "coordinates": [[[126.8,37.4],[127.2,37.4],[127.2,37.7],[126.8,37.7],[126.8,37.4]]] } }
  ]
}"#;

fn state(name: &str, csv: &str) -> (Arc<AppState>, PathBuf) {
    let mut dir = std::env::temp_dir();
    dir.push(format!("birthmap_srv_{}", name));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();

    fs::write(dir.join("rates.csv"), csv).unwrap();
    fs::write(dir.join("sido.json"), SIDO_GEOJSON).unwrap();
    let config_path = dir.join("config.toml");
    fs::write(
        &config_path,
        "[input]\nspreadsheet = \"rates.csv\"\ngeometry = \"sido.json\"\n\n\
         [processing.aliases]\n\"강원특별자치도\" = \"강원도\"\n",
    )
    .unwrap();

    let config = AppConfig::load_from_file(&config_path).unwrap();
    let geometries = pipeline::load_geometries(&config).unwrap();
    (Arc::new(AppState::new(config, geometries)), dir)
}

const RATES: &str = "행정구역별,2023\n행정구역별,합계출산율 (가임여성 1명당 명)\n전국,0.72\n강원특별자치도,0.89\n";

#[tokio::test]
async fn regions_endpoint_lists_unmatched() {
    let (state, _) = state("regions", RATES);
    let axum::Json(body) = server::regions_handler(State(state)).await.unwrap();

    assert_eq!(body.regions.len(), 2);
    assert_eq!(body.unmatched.len(), 1);
    assert_eq!(body.unmatched[0].region_name, "서울");
}

#[tokio::test]
async fn query_finds_region_containing_point() {
    let (state, _) = state("query", RATES);

    let axum::Json(hit) = server::query_handler(
        State(state.clone()),
        Query(QueryParams { lat: 37.8, lon: 128.5 }),
    )
    .await
    .unwrap();
    assert_eq!(
        hit,
        Some(RegionSummary {
            name: "강원도".into(),
            statistic: Some(0.89)
        })
    );

    let axum::Json(miss) = server::query_handler(
        State(state),
        Query(QueryParams { lat: 33.4, lon: 126.5 }),
    )
    .await
    .unwrap();
    assert_eq!(miss, None);
}

#[tokio::test]
async fn statistics_are_reloaded_per_request() {
    let (state, dir) = state("reload", RATES);
    let axum::Json(before) = server::regions_handler(State(state.clone())).await.unwrap();
    assert_eq!(before.unmatched.len(), 1);

    fs::write(
        dir.join("rates.csv"),
        "행정구역별,2023\n행정구역별,합계출산율 (가임여성 1명당 명)\n강원특별자치도,0.89\n서울,0.55\n",
    )
    .unwrap();
    let axum::Json(after) = server::regions_handler(State(state)).await.unwrap();
    assert!(after.unmatched.is_empty());
}

#[tokio::test]
async fn broken_spreadsheet_yields_error_response() {
    let (state, _) = state("broken", "행정구역별\n행정구역별\n서울,0.5\n");
    let err = server::map_handler(State(state)).await.unwrap_err();
    assert!(err.to_string().contains("2023"));
}
