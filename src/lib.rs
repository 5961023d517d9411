//! Bookkeeping for machine-learning experiments: numbered run folders,
//! best-metric summaries, a spreadsheet of run results, and paper-style
//! charts.

pub mod config;
pub mod experiment;
pub mod logging;
pub mod metrics;
pub mod plot;
pub mod scan;
pub mod spreadsheet;
#[cfg(test)]
mod test_utils;
