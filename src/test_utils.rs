//! Test utilities for the crate.

use std::{ffi::OsStr, fs, path::Path, sync::Mutex};

use clap::Parser;

use crate::{
    config::TrainArgs,
    experiment::{BEST_METRIC_LOG, LOG_DIR},
    metrics::{write_best_metrics, MetricLog},
};

/// Held by tests that attach a file to the global logger.
pub static LOG_FILE_LOCK: Mutex<()> = Mutex::new(());

/// `{"Loss": [5, 3, 4], "AUC": [0.1, 0.9, 0.5]}`
pub fn loss_and_auc() -> MetricLog {
    let mut log = MetricLog::new();
    log.insert("Loss", vec![5.0, 3.0, 4.0]);
    log.insert("AUC", vec![0.1, 0.9, 0.5]);
    log
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Create `base/run/log/4.best_metric.log` where each metric's only value
/// is its best.
pub fn write_run_log(base: &Path, run: &str, best: &[(&str, f64)]) {
    let log_dir = base.join(run).join(LOG_DIR);
    fs::create_dir_all(&log_dir).unwrap();
    let mut log = MetricLog::new();
    for (name, value) in best {
        log.push(name, *value);
    }
    write_best_metrics(&log_dir.join(BEST_METRIC_LOG), &log).unwrap();
}

/// True if `path` exists and is non-empty.
pub fn is_written(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

#[derive(Parser)]
struct TrainCli {
    #[command(flatten)]
    train: TrainArgs,
}

/// Default hyperparameters, with runs created under `output_dir`.
pub fn train_args(output_dir: &Path) -> TrainArgs {
    let argv = [OsStr::new("exp-kit"), OsStr::new("--output-dir"), output_dir.as_os_str()];
    TrainCli::parse_from(argv).train
}
