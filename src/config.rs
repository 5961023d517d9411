//! Training hyperparameters and the parameter table written for each run.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

#[derive(Debug, Clone, Args, Serialize)]
pub struct TrainArgs {
    /// Path to data.
    #[arg(long = "data-dir", default_value = "data")]
    pub data_dir: PathBuf,

    /// Where run folders (models, logs and figures) are created.
    #[arg(long = "output-dir", default_value = "outputs")]
    pub output_dir: PathBuf,

    /// Path to a saved model to load.
    #[arg(long = "load-model-state-dir", default_value = "outputs/model")]
    pub load_model_state_dir: PathBuf,

    /// Load the saved model and keep training it.
    #[arg(long = "retraining")]
    pub retraining: bool,

    /// Random seed.
    #[arg(long = "seed", default_value = "42")]
    pub seed: u64,

    /// Device to train on.
    #[arg(long = "device", default_value = "cuda:0", value_parser = ["cuda:0", "cuda:1", "cpu"])]
    pub device: String,

    /// Number of epochs.
    #[arg(long = "epochs", default_value = "20")]
    pub epochs: usize,

    /// Batch size.
    #[arg(long = "batch-size", default_value = "32")]
    pub batch_size: usize,

    #[arg(long = "optimizer", default_value = "Adam", value_parser = ["Adam", "SGD"])]
    pub optimizer: String,

    /// Learning rate.
    #[arg(long = "lr", default_value = "0.001")]
    pub lr: f64,

    #[arg(long = "weight-decay", default_value = "1e-5")]
    pub weight_decay: f64,

    /// Dropout rate.
    #[arg(long = "dropout", default_value = "0.5")]
    pub dropout: f64,

    /// How many epochs without improvement before stopping early.
    #[arg(long = "patience", default_value = "100")]
    pub patience: usize,

    /// Whether to log to tensorboard.
    #[arg(long = "use-tensorboard")]
    pub use_tensorboard: bool,
}

impl TrainArgs {
    /// One row per field, sorted by field name.
    pub fn parameter_rows(&self) -> Result<Vec<ParameterRow>> {
        let value = serde_json::to_value(self)?;
        let rows = value
            .as_object()
            .into_iter()
            .flatten()
            .map(|(key, value)| ParameterRow {
                parameter: parameter_label(key),
                value: match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
            })
            .collect();
        Ok(rows)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Tabled)]
pub struct ParameterRow {
    #[tabled(rename = "Parameter")]
    pub parameter: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

/// `weight_decay` becomes `Weight decay`.
pub fn parameter_label(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Draw `rows` as a boxed two-column table under a `Parameter`/`Value`
/// header.
pub fn render_param_table(rows: &[ParameterRow]) -> String {
    Table::new(rows).with(Style::ascii()).to_string()
}
