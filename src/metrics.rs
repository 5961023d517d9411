//! Per-epoch metric history and best-value summaries.

use std::{fmt, fs, io::Write, path::Path};

use anyhow::{Context, Result};
use log::info;
use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use thiserror::Error;

use crate::experiment::{BEST_METRIC_LOG, METRIC_LOG};

/// Errors in metric data that callers may want to tell apart.
#[derive(Debug, Error, PartialEq)]
pub enum MetricError {
    #[error("metric {name:?} has no comparable values")]
    EmptyMetric { name: String },

    #[error("metric {name:?} has {len} values, but epoch index {index} was requested")]
    SnapshotOutOfRange {
        name: String,
        index: usize,
        len: usize,
    },

    #[error("expected {expected} {what}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Whether smaller or larger values of a metric are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Objective {
    Minimize,
    Maximize,
}

impl Objective {
    /// Losses are minimized, everything else is maximized.
    pub fn for_metric(name: &str) -> Self {
        if name.to_lowercase().contains("loss") {
            Objective::Minimize
        } else {
            Objective::Maximize
        }
    }

    /// Direction flags as used on the command line: `1` maximizes, anything
    /// else minimizes.
    pub fn from_flag(flag: i64) -> Self {
        if flag == 1 {
            Objective::Maximize
        } else {
            Objective::Minimize
        }
    }

    fn is_better(self, candidate: f64, best: f64) -> bool {
        match self {
            Objective::Minimize => candidate < best,
            Objective::Maximize => candidate > best,
        }
    }

    fn word(self) -> &'static str {
        match self {
            Objective::Minimize => "minimum",
            Objective::Maximize => "maximum",
        }
    }
}

/// Find the index of the best value. Ties go to the first occurrence and NaN
/// never wins.
pub fn best_index(name: &str, values: &[f64], objective: Objective) -> Result<usize, MetricError> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if !objective.is_better(v, b) => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i).ok_or_else(|| MetricError::EmptyMetric {
        name: name.to_owned(),
    })
}

/// The history of every metric tracked during a run, in the order the
/// metrics were first seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricLog {
    series: Vec<(String, Vec<f64>)>,
}

impl MetricLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one epoch's value for `name`, creating the metric if needed.
    pub fn push(&mut self, name: &str, value: f64) {
        match self.series.iter_mut().find(|(n, _)| n == name) {
            Some((_, values)) => values.push(value),
            None => self.series.push((name.to_owned(), vec![value])),
        }
    }

    /// Set the full history of `name`, replacing any existing values.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        let name = name.into();
        match self.series.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = values,
            None => self.series.push((name, values)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.series
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.series.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Load a metric log from a JSON object of `name -> [values]`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        serde_json::from_reader(file)
            .with_context(|| format!("failed to parse metrics from {}", path.display()))
    }

    /// The best value of every metric, using the objective implied by its
    /// name.
    pub fn best_values(&self) -> Result<Vec<BestValue>, MetricError> {
        self.iter()
            .map(|(name, values)| BestValue::find(name, values, Objective::for_metric(name)))
            .collect()
    }
}

impl Serialize for MetricLog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.series.len()))?;
        for (name, values) in &self.series {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MetricLog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MetricLogVisitor;

        impl<'de> Visitor<'de> for MetricLogVisitor {
            type Value = MetricLog;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map from metric name to a list of numbers")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<MetricLog, A::Error> {
                let mut log = MetricLog::new();
                while let Some((name, values)) = access.next_entry::<String, Vec<f64>>()? {
                    log.insert(name, values);
                }
                Ok(log)
            }
        }

        deserializer.deserialize_map(MetricLogVisitor)
    }
}

/// The best value a metric reached, and when.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestValue {
    pub name: String,
    pub objective: Objective,
    /// 1-based epoch.
    pub epoch: usize,
    pub value: f64,
}

impl BestValue {
    pub fn find(name: &str, values: &[f64], objective: Objective) -> Result<Self, MetricError> {
        let index = best_index(name, values, objective)?;
        Ok(Self {
            name: name.to_owned(),
            objective,
            epoch: index + 1,
            value: values[index],
        })
    }

    /// One line of `4.best_metric.log`, with the name right-aligned to
    /// `width`.
    pub fn summary_line(&self, width: usize) -> String {
        format!(
            "{:>width$}: At the {}th epoch, the {} {} is {}.",
            self.name,
            self.epoch,
            self.objective.word(),
            self.name.to_lowercase(),
            self.value,
            width = width,
        )
    }
}

/// Write `3.metric.log` and `4.best_metric.log` for `log` into `log_dir`.
pub fn write_summary(log_dir: &Path, log: &MetricLog) -> Result<Vec<BestValue>> {
    let best = write_best_metrics(&log_dir.join(BEST_METRIC_LOG), log)?;
    write_metric_matrix(&log_dir.join(METRIC_LOG), log)?;
    Ok(best)
}

/// Write one line per metric describing its best epoch.
pub fn write_best_metrics(path: &Path, log: &MetricLog) -> Result<Vec<BestValue>> {
    let best = log.best_values()?;
    let width = best
        .iter()
        .map(|b| b.name.chars().count())
        .max()
        .unwrap_or(0);

    let mut file = fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for b in &best {
        writeln!(file, "{}", b.summary_line(width))?;
    }
    file.flush()?;
    info!("Wrote best metrics to {}", path.display());
    Ok(best)
}

/// Write the raw values, one comma-separated row per metric.
pub fn write_metric_matrix(path: &Path, log: &MetricLog) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for (_, values) in log.iter() {
        wtr.write_record(values.iter().map(|v| format!("{:.6}", v)))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read back a matrix written by [`write_metric_matrix`].
pub fn read_metric_matrix(path: &Path) -> Result<Vec<Vec<f64>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(
            record
                .iter()
                .map(|s| s.trim().parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("bad number in {}", path.display()))?,
        );
    }
    Ok(rows)
}
