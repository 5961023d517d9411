//! Append run summaries side by side to a persistent `.xlsx` workbook.
//!
//! Each run becomes one block of columns on the active sheet:
//!
//! | row | first column      | one column per metric          |
//! |-----|-------------------|--------------------------------|
//! | 1   | `lr: 0.01_bs: 32` | `Max_<metric>`                 |
//! | 2   |                   | `{'Loss': 3, 'AUC': 0.9}`      |
//!
//! Row 2 holds every metric's value at the epoch where that column's metric
//! was best. Blocks are separated by one empty column and are never
//! rewritten.

use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use umya_spreadsheet::{HorizontalAlignmentValues, VerticalAlignmentValues, Worksheet};

use crate::metrics::{best_index, MetricError, MetricLog, Objective};

const FONT_NAME: &str = "Times New Roman";

/// One run to record.
#[derive(Debug, Clone)]
pub struct RunRecord<'a> {
    pub param_names: &'a [String],
    pub param_values: &'a [String],
    pub metrics: &'a MetricLog,
    /// Per-metric direction flags, `1` to maximize and anything else to
    /// minimize. `None` maximizes every metric.
    pub compare: Option<&'a [i64]>,
    /// Write `name: value` pairs rather than bare values.
    pub verbose: bool,
}

impl RunRecord<'_> {
    /// The text of the run's header cell.
    pub fn parameter_summary(&self) -> Result<String, MetricError> {
        if self.param_names.len() != self.param_values.len() {
            return Err(MetricError::LengthMismatch {
                what: "parameter values",
                expected: self.param_names.len(),
                actual: self.param_values.len(),
            });
        }
        let summary = if self.verbose {
            self.param_names
                .iter()
                .zip(self.param_values)
                .map(|(name, value)| format!("{}: {}", name, value))
                .collect::<Vec<_>>()
                .join("_")
        } else {
            self.param_values.join("_")
        };
        Ok(summary)
    }

    fn objectives(&self) -> Result<Vec<Objective>, MetricError> {
        match self.compare {
            None => Ok(vec![Objective::Maximize; self.metrics.len()]),
            Some(flags) if flags.len() < self.metrics.len() => Err(MetricError::LengthMismatch {
                what: "compare flags",
                expected: self.metrics.len(),
                actual: flags.len(),
            }),
            Some(flags) => Ok(flags.iter().map(|&f| Objective::from_flag(f)).collect()),
        }
    }

    /// `(header, snapshot)` cell text for every metric.
    pub fn metric_cells(&self) -> Result<Vec<(String, String)>, MetricError> {
        let objectives = self.objectives()?;
        self.metrics
            .iter()
            .zip(objectives)
            .map(|((name, values), objective)| {
                let index = best_index(name, values, objective)?;
                Ok((format!("Max_{}", name), snapshot(self.metrics, index)?))
            })
            .collect()
    }
}

/// Every metric's value at `index`, rendered as `{'A': 1, 'B': 0.5}`.
fn snapshot(metrics: &MetricLog, index: usize) -> Result<String, MetricError> {
    let entries = metrics
        .iter()
        .map(|(name, values)| {
            values
                .get(index)
                .map(|v| format!("'{}': {}", name, v))
                .ok_or_else(|| MetricError::SnapshotOutOfRange {
                    name: name.to_owned(),
                    index,
                    len: values.len(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("{{{}}}", entries.join(", ")))
}

/// The columns a call to [`append_run`] wrote to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnBlock {
    pub first: u32,
    pub last: u32,
}

fn cell_text(sheet: &Worksheet, col: u32, row: u32) -> String {
    sheet
        .get_cell((col, row))
        .map(|cell| cell.get_value().into_owned())
        .unwrap_or_default()
}

/// The first column where row 1 is empty in both it and the next column.
pub fn first_empty_column_pair(sheet: &Worksheet) -> u32 {
    let mut col = 1;
    while !(cell_text(sheet, col, 1).is_empty() && cell_text(sheet, col + 1, 1).is_empty()) {
        col += 1;
    }
    col
}

/// Column width that fits the longest of `texts`, plus padding.
pub fn fitted_width<'a>(texts: impl IntoIterator<Item = &'a str>) -> f64 {
    let longest = texts
        .into_iter()
        .map(|t| t.chars().count())
        .max()
        .unwrap_or(0);
    (longest + 2) as f64
}

fn write_cell(sheet: &mut Worksheet, col: u32, row: u32, value: &str) {
    let cell = sheet.get_cell_mut((col, row));
    cell.set_value(value);
    let style = cell.get_style_mut();
    style.get_font_mut().set_name(FONT_NAME);
    let alignment = style.get_alignment_mut();
    alignment.set_horizontal(HorizontalAlignmentValues::Center);
    alignment.set_vertical(VerticalAlignmentValues::Center);
}

fn auto_adjust_column_width(sheet: &mut Worksheet, first: u32, last: u32) {
    let highest_row = sheet.get_highest_row();
    for col in first..=last {
        let texts = (1..=highest_row)
            .map(|row| cell_text(sheet, col, row))
            .collect::<Vec<_>>();
        let width = fitted_width(texts.iter().map(String::as_str));
        sheet
            .get_column_dimension_by_number_mut(&col)
            .set_width(width);
    }
}

/// Append `run` as a new column block in the workbook at `path`, creating
/// the workbook if it does not exist yet.
pub fn append_run(path: &Path, run: &RunRecord) -> Result<ColumnBlock> {
    // Validate everything before touching the file.
    let summary = run.parameter_summary()?;
    let metric_cells = run.metric_cells()?;

    let mut book = if path.exists() {
        umya_spreadsheet::reader::xlsx::read(path)
            .with_context(|| format!("failed to read workbook {}", path.display()))?
    } else {
        umya_spreadsheet::new_file()
    };
    let sheet = book.get_active_sheet_mut();

    let mut first = first_empty_column_pair(sheet);
    if first != 1 {
        first += 1;
    }
    write_cell(sheet, first, 1, &summary);
    for (i, (header, snapshot)) in metric_cells.iter().enumerate() {
        let col = first + 1 + i as u32;
        write_cell(sheet, col, 1, header);
        write_cell(sheet, col, 2, snapshot);
    }
    let last = first + metric_cells.len() as u32;
    auto_adjust_column_width(sheet, 1, last);

    umya_spreadsheet::writer::xlsx::write(&book, path)
        .with_context(|| format!("failed to write workbook {}", path.display()))?;
    info!("Data written to {} (columns {}..={})", path.display(), first, last);
    Ok(ColumnBlock { first, last })
}
