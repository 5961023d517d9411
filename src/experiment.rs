//! Sequentially numbered experiment folders.
//!
//! Every run gets its own `expN` folder under a base directory:
//!
//! ```text
//! outputs/
//!   exp1/
//!     log/      1.model.log 2.parameter.log 3.metric.log 4.best_metric.log 5.train.log
//!     model/
//!     figures/
//!   exp2/
//! ```

use std::{
    fmt::Debug,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::info;

use crate::{
    config::{render_param_table, TrainArgs},
    logging,
};

pub const EXP_PREFIX: &str = "exp";
pub const LOG_DIR: &str = "log";
pub const MODEL_DIR: &str = "model";
pub const FIGURES_DIR: &str = "figures";

pub const MODEL_LOG: &str = "1.model.log";
pub const PARAMETER_LOG: &str = "2.parameter.log";
pub const METRIC_LOG: &str = "3.metric.log";
pub const BEST_METRIC_LOG: &str = "4.best_metric.log";
pub const TRAIN_LOG: &str = "5.train.log";

const SEPARATOR_WIDTH: usize = 100;

/// Parse the `N` out of a folder named `expN`.
pub fn exp_index(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(EXP_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// The index the next run under `base_dir` will get: one past the largest
/// existing `expN` directory.
///
/// This is not the smallest unused index. Gaps left by deleted runs are
/// never reused, so with `exp1` and `exp3` present the next run is `exp4`.
pub fn next_exp_index(base_dir: &Path) -> Result<u64> {
    if !base_dir.exists() {
        return Ok(1);
    }
    let mut largest = 0;
    for entry in fs::read_dir(base_dir)
        .with_context(|| format!("failed to list {}", base_dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(n) = entry.file_name().to_str().and_then(exp_index) {
            largest = largest.max(n);
        }
    }
    Ok(largest + 1)
}

/// The folders belonging to one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentDirs {
    pub index: u64,
    pub root: PathBuf,
    pub log: PathBuf,
    pub model: PathBuf,
    pub figures: PathBuf,
}

impl ExperimentDirs {
    /// Allocate and create the next `expN` folder under `base_dir`.
    ///
    /// There is no locking. Two processes racing for the same index will
    /// see one of them fail, since `expN` is created non-recursively.
    pub fn create(base_dir: &Path) -> Result<Self> {
        fs::create_dir_all(base_dir)
            .with_context(|| format!("failed to create {}", base_dir.display()))?;
        let index = next_exp_index(base_dir)?;
        let dirs = Self::at(base_dir, index);
        fs::create_dir(&dirs.root)
            .with_context(|| format!("failed to create {}", dirs.root.display()))?;
        for sub in [&dirs.log, &dirs.model, &dirs.figures] {
            fs::create_dir_all(sub)
                .with_context(|| format!("failed to create {}", sub.display()))?;
        }
        info!("Created experiment folder {}", dirs.root.display());
        Ok(dirs)
    }

    /// The paths for run `index` under `base_dir`, without touching the
    /// filesystem.
    pub fn at(base_dir: &Path, index: u64) -> Self {
        let root = base_dir.join(format!("{}{}", EXP_PREFIX, index));
        Self {
            index,
            log: root.join(LOG_DIR),
            model: root.join(MODEL_DIR),
            figures: root.join(FIGURES_DIR),
            root,
        }
    }

    pub fn model_log_path(&self) -> PathBuf {
        self.log.join(MODEL_LOG)
    }

    pub fn parameter_log_path(&self) -> PathBuf {
        self.log.join(PARAMETER_LOG)
    }

    pub fn metric_log_path(&self) -> PathBuf {
        self.log.join(METRIC_LOG)
    }

    pub fn best_metric_log_path(&self) -> PathBuf {
        self.log.join(BEST_METRIC_LOG)
    }

    pub fn train_log_path(&self) -> PathBuf {
        self.log.join(TRAIN_LOG)
    }

    /// Record the structure of the model used for this run.
    pub fn save_model_structure(&self, model: &impl Debug) -> Result<()> {
        let path = self.model_log_path();
        fs::write(&path, format!("{:#?}", model))
            .with_context(|| format!("failed to write {}", path.display()))
    }

    /// Record the rendered parameter table for this run.
    pub fn save_param_setting(&self, table: &str) -> Result<()> {
        let path = self.parameter_log_path();
        fs::write(&path, table).with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Set up a training run: allocate its folder, start copying log output to
/// `5.train.log`, then record and log the parameter table.
pub fn start_run(args: &TrainArgs) -> Result<ExperimentDirs> {
    let dirs = ExperimentDirs::create(&args.output_dir)?;
    logging::attach_file(&dirs.train_log_path())?;
    let table = render_param_table(&args.parameter_rows()?);
    dirs.save_param_setting(&table)?;

    let separator = "=".repeat(SEPARATOR_WIDTH);
    info!("{}", separator);
    info!("Arguments being used:\n{}", table);
    info!("{}", separator);
    Ok(dirs)
}
