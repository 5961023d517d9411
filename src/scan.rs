//! Find the best runs among previous experiment folders by reading their
//! best-metric logs.

use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::debug;
use thiserror::Error;

use crate::experiment::{exp_index, BEST_METRIC_LOG, LOG_DIR};

/// Labels reported when none are asked for.
pub const DEFAULT_LABELS: [&str; 2] = ["Test AUC", "Test AP"];

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScanError {
    #[error("{}:{line}: malformed best-metric line {text:?}", .path.display())]
    MalformedLine {
        path: PathBuf,
        line: usize,
        text: String,
    },

    #[error("no run recorded a value for {label:?}")]
    MissingLabel { label: String },
}

/// Parse a best-metric log into `label -> value`.
///
/// Each line looks like `   Test AUC: At the 12th epoch, the maximum test auc is 0.9641.`
/// The label is everything before the first `:`; the value is the token
/// after the last ` is `, minus the trailing period.
pub fn parse_best_metric_log(path: &Path, contents: &str) -> Result<BTreeMap<String, f64>, ScanError> {
    let mut values = BTreeMap::new();
    for (i, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let malformed = || ScanError::MalformedLine {
            path: path.to_owned(),
            line: i + 1,
            text: line.to_owned(),
        };
        let (label, rest) = line.split_once(':').ok_or_else(malformed)?;
        let (_, value) = rest.rsplit_once(" is ").ok_or_else(malformed)?;
        let value = value.trim();
        let value = value.strip_suffix('.').unwrap_or(value);
        let value = value.parse::<f64>().map_err(|_| malformed())?;
        values.insert(label.trim().to_owned(), value);
    }
    Ok(values)
}

/// The best run found for one label.
#[derive(Debug, Clone, PartialEq)]
pub struct BestRun {
    pub label: String,
    pub value: f64,
    pub run: String,
}

/// The outcome of scanning a directory of runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub runs_scanned: usize,
    pub results: Vec<Result<BestRun, ScanError>>,
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in &self.results {
            match result {
                Ok(best) => writeln!(f, "Max {}: {} ({})", best.label, best.value, best.run)?,
                Err(err) => writeln!(f, "{}", err)?,
            }
        }
        Ok(())
    }
}

/// Subdirectories of `dir`, `expN` folders first in numeric order, then
/// everything else by name.
fn run_folders(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut folders = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            let name = entry.file_name().to_string_lossy().into_owned();
            folders.push((name, entry.path()));
        }
    }
    folders.sort_by(|(a, _), (b, _)| {
        let key = |name: &str| (exp_index(name).is_none(), exp_index(name).unwrap_or(0));
        key(a).cmp(&key(b)).then_with(|| a.cmp(b))
    });
    Ok(folders)
}

/// Report, for each label, the run in `dir` with the largest value. Ties go
/// to the earliest run and non-finite values are ignored.
pub fn scan_best_runs(dir: &Path, labels: &[String]) -> Result<ScanReport> {
    let mut best: Vec<Option<BestRun>> = vec![None; labels.len()];
    let mut runs_scanned = 0;

    for (name, path) in run_folders(dir)? {
        let log_path = path.join(LOG_DIR).join(BEST_METRIC_LOG);
        if !log_path.is_file() {
            debug!("Skipping {}: no {}", path.display(), BEST_METRIC_LOG);
            continue;
        }
        let contents = fs::read_to_string(&log_path)
            .with_context(|| format!("failed to read {}", log_path.display()))?;
        let values = parse_best_metric_log(&log_path, &contents)?;
        runs_scanned += 1;

        for (label, slot) in labels.iter().zip(best.iter_mut()) {
            let Some(&value) = values.get(label) else {
                continue;
            };
            // A NaN recorded for a diverged run can never be the best.
            if !value.is_finite() {
                debug!("Ignoring {} = {} in {}", label, value, name);
                continue;
            }
            if slot.as_ref().map_or(true, |b| value > b.value) {
                *slot = Some(BestRun {
                    label: label.clone(),
                    value,
                    run: name.clone(),
                });
            }
        }
    }

    let results = labels
        .iter()
        .zip(best)
        .map(|(label, b)| b.ok_or_else(|| ScanError::MissingLabel { label: label.clone() }))
        .collect();
    Ok(ScanReport {
        runs_scanned,
        results,
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::test_utils::write_run_log;

    fn labels() -> Vec<String> {
        DEFAULT_LABELS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_by_label() {
        let contents = "\
      Loss: At the 3th epoch, the minimum loss is 0.25.
  Test AUC: At the 2th epoch, the maximum test auc is 0.9641.
   Test AP: At the 2th epoch, the maximum test ap is 0.97.
";
        let values = parse_best_metric_log(Path::new("x.log"), contents).unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values["Loss"], 0.25);
        assert_eq!(values["Test AUC"], 0.9641);
        assert_eq!(values["Test AP"], 0.97);
    }

    #[test]
    fn test_parse_malformed_line() {
        let err = parse_best_metric_log(Path::new("x.log"), "AUC: nothing here\n").unwrap_err();
        assert_eq!(
            err,
            ScanError::MalformedLine {
                path: PathBuf::from("x.log"),
                line: 1,
                text: "AUC: nothing here".to_owned(),
            }
        );
    }

    #[test]
    fn test_scan_is_order_independent() {
        let temp = TempDir::new().unwrap();
        write_run_log(temp.path(), "exp1", &[("Test AUC", 0.91), ("Test AP", 0.95)]);
        // Reversed line order must not swap the values.
        write_run_log(temp.path(), "exp2", &[("Test AP", 0.93), ("Test AUC", 0.96)]);
        write_run_log(temp.path(), "exp3", &[("Loss", 0.1)]);
        fs::create_dir(temp.path().join("exp4")).unwrap();

        let report = scan_best_runs(temp.path(), &labels()).unwrap();
        assert_eq!(report.runs_scanned, 3);
        assert_eq!(
            report.results,
            vec![
                Ok(BestRun {
                    label: "Test AUC".to_owned(),
                    value: 0.96,
                    run: "exp2".to_owned(),
                }),
                Ok(BestRun {
                    label: "Test AP".to_owned(),
                    value: 0.95,
                    run: "exp1".to_owned(),
                }),
            ]
        );
    }

    #[test]
    fn test_scan_ties_go_to_earliest_run() {
        let temp = TempDir::new().unwrap();
        write_run_log(temp.path(), "exp10", &[("Test AUC", 0.9)]);
        write_run_log(temp.path(), "exp2", &[("Test AUC", 0.9)]);
        let report = scan_best_runs(temp.path(), &["Test AUC".to_owned()]).unwrap();
        assert_eq!(report.results[0].as_ref().unwrap().run, "exp2");
    }

    #[test]
    fn test_scan_missing_label() {
        let temp = TempDir::new().unwrap();
        write_run_log(temp.path(), "exp1", &[("Test AUC", 0.9)]);
        let report = scan_best_runs(temp.path(), &labels()).unwrap();
        assert_eq!(
            report.results[1],
            Err(ScanError::MissingLabel {
                label: "Test AP".to_owned()
            })
        );
        assert!(report.to_string().contains("Max Test AUC: 0.9 (exp1)"));
    }

    #[test]
    fn test_scan_ignores_nan() {
        let temp = TempDir::new().unwrap();
        let log_dir = temp.path().join("exp1").join(LOG_DIR);
        fs::create_dir_all(&log_dir).unwrap();
        fs::write(
            log_dir.join(BEST_METRIC_LOG),
            "Test AUC: At the 1th epoch, the maximum test auc is nan.\n",
        )
        .unwrap();
        write_run_log(temp.path(), "exp2", &[("Test AUC", 0.9)]);

        let report = scan_best_runs(temp.path(), &labels()).unwrap();
        assert_eq!(report.runs_scanned, 2);
        assert_eq!(
            report.results[0],
            Ok(BestRun {
                label: "Test AUC".to_owned(),
                value: 0.9,
                run: "exp2".to_owned(),
            })
        );
    }

    #[test]
    fn test_scan_is_idempotent() {
        let temp = TempDir::new().unwrap();
        write_run_log(temp.path(), "exp1", &[("Test AUC", 0.91), ("Test AP", 0.95)]);
        let first = scan_best_runs(temp.path(), &labels()).unwrap();
        let second = scan_best_runs(temp.path(), &labels()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_string(), second.to_string());
    }
}
