//! Readers for the on-disk dataset layouts
//!
//! Both layouts are delimited numeric text. A first row that does not parse
//! as numbers is treated as a header and skipped; after that every cell must
//! be numeric and every row must have the same width.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::{debug, warn};

use super::entry::{DatasetSpec, LabelLayout};
use super::loaded::LoadedDataset;
use crate::{Error, Result};

/// Load a dataset according to its layout.
///
/// # Errors
///
/// Returns `Io`, `DataFormat` or `LabelFormat` when the files are missing or
/// inconsistent with the layout.
pub(crate) fn load_spec(spec: &DatasetSpec, delimiter: u8) -> Result<LoadedDataset> {
    match spec {
        DatasetSpec::TwoFile {
            data_path,
            labels_path,
            label_layout,
        } => load_two_file(data_path, labels_path, *label_layout, delimiter),
        DatasetSpec::Combined { path } => load_combined(path, delimiter),
    }
}

fn load_two_file(
    data_path: &Path,
    labels_path: &Path,
    layout: LabelLayout,
    delimiter: u8,
) -> Result<LoadedDataset> {
    let values = read_table(data_path, delimiter)?;
    let label_rows = read_table(labels_path, delimiter)?;
    let labels = expand_labels(&label_rows, values.len(), layout, labels_path)?;

    debug!(
        data = %data_path.display(),
        labels = %labels_path.display(),
        rows = values.len(),
        "Loaded two-file dataset"
    );

    LoadedDataset::new(values, labels).ok_or_else(|| Error::LabelFormat {
        path: labels_path.to_path_buf(),
        reason: "labels are not aligned with data".to_string(),
    })
}

fn load_combined(path: &Path, delimiter: u8) -> Result<LoadedDataset> {
    let rows = read_table(path, delimiter)?;

    let mut values = Vec::with_capacity(rows.len());
    let mut labels = Vec::with_capacity(rows.len());
    for (idx, mut row) in rows.into_iter().enumerate() {
        if row.len() < 2 {
            return Err(Error::LabelFormat {
                path: path.to_path_buf(),
                reason: format!(
                    "row {idx} has {} column(s); combined files need values plus a label column",
                    row.len()
                ),
            });
        }
        // Width >= 2 is checked above, so the pop always yields the label.
        let label = row.pop().unwrap_or_default();
        labels.push(binary_flag(label).ok_or_else(|| Error::LabelFormat {
            path: path.to_path_buf(),
            reason: format!("row {idx} has non-binary label {label}"),
        })?);
        values.push(row);
    }

    debug!(path = %path.display(), rows = values.len(), "Loaded combined dataset");

    LoadedDataset::new(values, labels).ok_or_else(|| Error::LabelFormat {
        path: path.to_path_buf(),
        reason: "labels are not aligned with data".to_string(),
    })
}

/// Read a delimited numeric file into rows.
///
/// # Errors
///
/// `Io` if the file cannot be read, `DataFormat` on non-numeric cells or
/// ragged rows.
pub(crate) fn read_table(path: &Path, delimiter: u8) -> Result<Vec<Vec<f64>>> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut header_seen = false;
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(path, e))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line = record.position().map_or(0, line_number);

        let parsed: std::result::Result<Vec<f64>, String> = record
            .iter()
            .map(|cell| {
                cell.parse::<f64>()
                    .map_err(|_| format!("cell '{cell}' is not numeric"))
            })
            .collect();

        let row = match parsed {
            Ok(row) => row,
            Err(_) if rows.is_empty() && !header_seen => {
                header_seen = true;
                continue;
            }
            Err(reason) => {
                return Err(Error::DataFormat {
                    path: path.to_path_buf(),
                    line,
                    reason,
                })
            }
        };

        if let Some(first) = rows.first() {
            if first.len() != row.len() {
                return Err(Error::DataFormat {
                    path: path.to_path_buf(),
                    line,
                    reason: format!("expected {} column(s), found {}", first.len(), row.len()),
                });
            }
        }
        rows.push(row);
    }

    Ok(rows)
}

fn line_number(position: &csv::Position) -> usize {
    usize::try_from(position.line()).unwrap_or(usize::MAX)
}

fn csv_error(path: &Path, error: csv::Error) -> Error {
    let line = error.position().map_or(0, line_number);
    let reason = error.to_string();
    match error.into_kind() {
        csv::ErrorKind::Io(io) => Error::Io(io),
        _ => Error::DataFormat {
            path: path.to_path_buf(),
            line,
            reason,
        },
    }
}

/// Turn the rows of a labels file into dense binary labels of length `len`.
///
/// # Errors
///
/// `LabelFormat` when the rows fit neither the requested nor (in `Auto`
/// mode) any layout.
pub(crate) fn expand_labels(
    rows: &[Vec<f64>],
    len: usize,
    layout: LabelLayout,
    path: &Path,
) -> Result<Vec<u8>> {
    let label_err = |reason: String| Error::LabelFormat {
        path: path.to_path_buf(),
        reason,
    };

    match layout {
        LabelLayout::Dense => dense_labels(rows, len).map_err(label_err),
        LabelLayout::Sparse => sparse_labels(rows, len).map_err(label_err),
        LabelLayout::Auto => {
            if rows.len() == len {
                if let Ok(dense) = dense_labels(rows, len) {
                    if is_ambiguous(rows, len) {
                        warn!(
                            path = %path.display(),
                            rows = len,
                            "Labels are valid as dense flags and as sparse indices; reading as dense. \
                             Set labels_format to override"
                        );
                    }
                    return Ok(dense);
                }
            }
            sparse_labels(rows, len).map_err(|reason| {
                label_err(format!(
                    "{} row(s) against {len} data row(s) is not a dense label vector, \
                     and as sparse indices: {reason}",
                    rows.len()
                ))
            })
        }
    }
}

fn dense_labels(rows: &[Vec<f64>], len: usize) -> std::result::Result<Vec<u8>, String> {
    if rows.len() != len {
        return Err(format!(
            "dense labels need {len} row(s), found {}",
            rows.len()
        ));
    }
    rows.iter()
        .enumerate()
        .map(|(idx, row)| match row.as_slice() {
            [flag] => binary_flag(*flag).ok_or_else(|| format!("row {idx} has non-binary flag {flag}")),
            _ => Err(format!("row {idx} has {} columns, expected 1", row.len())),
        })
        .collect()
}

/// Sparse indices are one per row, or all on a single delimited row.
fn sparse_labels(rows: &[Vec<f64>], len: usize) -> std::result::Result<Vec<u8>, String> {
    if rows.len() > 1 {
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != 1) {
            return Err(format!(
                "row {idx} has {} columns; sparse indices need one per row or a single row",
                row.len()
            ));
        }
    }
    let mut labels = vec![0u8; len];
    for &cell in rows.iter().flatten() {
        let idx = row_index(cell, len)?;
        labels[idx] = 1;
    }
    Ok(labels)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_index(cell: f64, len: usize) -> std::result::Result<usize, String> {
    if cell.fract() != 0.0 || cell < 0.0 || !cell.is_finite() {
        return Err(format!("{cell} is not a row index"));
    }
    let idx = cell as usize;
    if idx >= len {
        return Err(format!("index {idx} out of range for {len} row(s)"));
    }
    Ok(idx)
}

/// Dense binary rows whose values are also distinct in-range indices.
fn is_ambiguous(rows: &[Vec<f64>], len: usize) -> bool {
    let mut seen = vec![false; len];
    rows.iter().flatten().all(|&cell| match row_index(cell, len) {
        Ok(idx) => !std::mem::replace(&mut seen[idx], true),
        Err(_) => false,
    })
}

#[allow(clippy::float_cmp)]
fn binary_flag(value: f64) -> Option<u8> {
    if value == 0.0 {
        Some(0)
    } else if value == 1.0 {
        Some(1)
    } else {
        None
    }
}
