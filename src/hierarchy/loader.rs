//! Tabular reference data loaders (district lookup and ward lookup files).

use csv::{ReaderBuilder, StringRecord};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use super::HierarchyBuilder;
use crate::error::ReferenceDataError;
use crate::models::AdminLevel;

/// Open a CSV table, transparently decompressing `.gz` files.
pub fn open_table(path: &Path) -> Result<csv::Reader<Box<dyn Read>>, ReferenceDataError> {
    let file = File::open(path).map_err(|source| ReferenceDataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader: Box<dyn Read> = if path.extension().map_or(false, |e| e == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    Ok(ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader))
}

fn column_index(
    headers: &StringRecord,
    column: &str,
    path: &Path,
) -> Result<usize, ReferenceDataError> {
    headers
        .iter()
        .position(|h| h.trim().trim_start_matches('\u{feff}') == column)
        .ok_or_else(|| ReferenceDataError::MissingColumn {
            path: path.to_path_buf(),
            column: column.to_string(),
        })
}

/// Load finest-level units and their coarser parents.
///
/// `coarser_columns` feed the coarser levels in ascending order.
pub fn load_hierarchy(
    builder: &mut HierarchyBuilder,
    path: &Path,
    finest_column: &str,
    coarser_columns: &[String],
) -> Result<usize, ReferenceDataError> {
    info!("Loading hierarchy from {}", path.display());

    if coarser_columns.len() > AdminLevel::coarser().len() {
        warn!(
            "{} coarser columns configured, only the first {} are used",
            coarser_columns.len(),
            AdminLevel::coarser().len()
        );
    }

    let mut reader = open_table(path)?;
    let csv_err = |source| ReferenceDataError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let headers = reader.headers().map_err(csv_err)?.clone();

    let finest_idx = column_index(&headers, finest_column, path)?;
    let coarser_idx: Vec<(AdminLevel, usize)> = AdminLevel::coarser()
        .iter()
        .zip(coarser_columns)
        .map(|(level, col)| column_index(&headers, col, path).map(|idx| (*level, idx)))
        .collect::<Result<_, _>>()?;

    let mut rows = 0;
    for result in reader.records() {
        let record = result.map_err(csv_err)?;
        let Some(name) = record.get(finest_idx) else {
            continue;
        };
        let parents = coarser_idx
            .iter()
            .filter_map(|(level, idx)| record.get(*idx).map(|v| (*level, v)));
        builder.add_unit(name, parents);
        rows += 1;
    }

    info!("Loaded {} hierarchy rows", rows);
    Ok(rows)
}

/// Load the subdivision (ward) to finest-level mapping.
pub fn load_subdivisions(
    builder: &mut HierarchyBuilder,
    path: &Path,
    name_column: &str,
    parent_column: &str,
) -> Result<usize, ReferenceDataError> {
    info!("Loading subdivisions from {}", path.display());

    let mut reader = open_table(path)?;
    let csv_err = |source| ReferenceDataError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let headers = reader.headers().map_err(csv_err)?.clone();
    let name_idx = column_index(&headers, name_column, path)?;
    let parent_idx = column_index(&headers, parent_column, path)?;

    let mut rows = 0;
    for result in reader.records() {
        let record = result.map_err(csv_err)?;
        if let (Some(name), Some(parent)) = (record.get(name_idx), record.get(parent_idx)) {
            builder.add_subdivision(name, parent);
            rows += 1;
        }
    }

    info!("Loaded {} subdivision rows", rows);
    Ok(rows)
}
