//! Statistics spreadsheet loader.
//!
//! The source is a KOSIS-style export: two header rows (reporting period on
//! top, measure name below), one row per region, and a nationwide aggregate
//! row that is dropped.

use crate::aliases::AliasTable;
use crate::config::{ColumnKey, InputConfig, ProcessingConfig};
use crate::error::{PipelineError, Result};
use crate::types::RegionStat;
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// A spreadsheet cell reduced to what the loader cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn from_text(s: &str) -> Self {
        let s = s.trim_start_matches('\u{feff}');
        if s.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }

    fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
            Cell::Text(s) => s.trim().to_string(),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::String(s) => Cell::from_text(s),
            other => Cell::from_text(&other.to_string()),
        }
    }
}

pub fn load_region_stats(
    input: &InputConfig,
    processing: &ProcessingConfig,
    aliases: &AliasTable,
) -> Result<Vec<RegionStat>> {
    let source_id = input.spreadsheet.display().to_string();
    info!(source = %source_id, "loading birth rate spreadsheet");

    let rows = read_grid(&input.spreadsheet)?;
    let stats = extract_region_stats(
        &source_id,
        &rows,
        &input.region_column,
        &input.statistic_column,
        &processing.sentinel,
        aliases,
    )?;

    info!(regions = stats.len(), "loaded region statistics");
    Ok(stats)
}

/// Reads the first worksheet (or the CSV body) into a grid of cells.
pub fn read_grid(path: &Path) -> Result<Vec<Vec<Cell>>> {
    let source_id = path.display().to_string();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .ok_or_else(|| PipelineError::unavailable(&source_id, "spreadsheet has no file extension"))?;

    match extension.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook(path, &source_id),
        "csv" => read_csv(path, &source_id),
        _ => Err(PipelineError::unavailable(
            &source_id,
            format!("unsupported spreadsheet format: {}", extension),
        )),
    }
}

fn read_workbook(path: &Path, source_id: &str) -> Result<Vec<Vec<Cell>>> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| PipelineError::unavailable(source_id, e))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PipelineError::unavailable(source_id, "workbook has no worksheet"))?
        .map_err(|e| PipelineError::unavailable(source_id, e))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(Cell::from).collect())
        .collect())
}

fn read_csv(path: &Path, source_id: &str) -> Result<Vec<Vec<Cell>>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| PipelineError::unavailable(source_id, e))?;

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| PipelineError::unavailable(source_id, e))?;
        rows.push(record.iter().map(Cell::from_text).collect());
    }
    Ok(rows)
}

/// Resolves the two header rows into `(top, sub)` pairs.
///
/// Horizontally merged top cells only carry their value in the first cell,
/// so blanks inherit the label to their left. A blank sub cell means the
/// header was merged vertically and takes the top label.
pub fn two_level_header(top: &[Cell], sub: &[Cell]) -> Vec<(String, String)> {
    let width = top.len().max(sub.len());
    let mut current_top = String::new();
    (0..width)
        .map(|i| {
            let t = top.get(i).map(Cell::as_text).unwrap_or_default();
            if !t.is_empty() {
                current_top = t;
            }
            let s = sub.get(i).map(Cell::as_text).unwrap_or_default();
            let s = if s.is_empty() { current_top.clone() } else { s };
            (current_top.clone(), s)
        })
        .collect()
}

fn find_column(source_id: &str, header: &[(String, String)], key: &ColumnKey) -> Result<usize> {
    header
        .iter()
        .position(|(top, sub)| key.matches(top, sub))
        .ok_or_else(|| PipelineError::schema(source_id, format!("column {} not found", key)))
}

fn coerce_statistic(
    source_id: &str,
    row: usize,
    region: &str,
    column: &ColumnKey,
    cell: Option<&Cell>,
) -> Result<f64> {
    let parsed = match cell {
        Some(Cell::Number(n)) => Some(*n),
        Some(Cell::Text(s)) => s.trim().parse::<f64>().ok(),
        Some(Cell::Empty) | None => None,
    };

    match parsed {
        Some(value) if value.is_finite() => Ok(value),
        _ => Err(PipelineError::TypeCoercionFailure {
            source_id: source_id.to_string(),
            row,
            region: region.to_string(),
            column: column.to_string(),
            value: cell.map(Cell::as_text).unwrap_or_default(),
            target: "f64",
        }),
    }
}

/// Selects, filters, coerces and aliases the region/statistic columns.
pub fn extract_region_stats(
    source_id: &str,
    rows: &[Vec<Cell>],
    region_column: &ColumnKey,
    statistic_column: &ColumnKey,
    sentinel: &str,
    aliases: &AliasTable,
) -> Result<Vec<RegionStat>> {
    if rows.len() < 2 {
        return Err(PipelineError::schema(
            source_id,
            format!("expected a two-row header, found {} row(s)", rows.len()),
        ));
    }

    let header = two_level_header(&rows[0], &rows[1]);
    let region_idx = find_column(source_id, &header, region_column)?;
    let stat_idx = find_column(source_id, &header, statistic_column)?;
    debug!(region_idx, stat_idx, "resolved spreadsheet columns");

    let sentinel = sentinel.trim();
    let mut stats = Vec::new();

    for (offset, row) in rows[2..].iter().enumerate() {
        // 1-based spreadsheet row number, counting both header rows.
        let row_number = offset + 3;
        let region = row.get(region_idx).map(Cell::as_text).unwrap_or_default();
        if region.is_empty() || region == sentinel {
            continue;
        }

        let statistic =
            coerce_statistic(source_id, row_number, &region, statistic_column, row.get(stat_idx))?;
        stats.push(RegionStat {
            region_name: region,
            statistic,
        });
    }

    aliases.apply(&mut stats);

    let mut seen = HashSet::new();
    for stat in &stats {
        if !seen.insert(stat.region_name.as_str()) {
            return Err(PipelineError::DuplicateRegion {
                source_id: source_id.to_string(),
                region: stat.region_name.clone(),
            });
        }
    }

    Ok(stats)
}
