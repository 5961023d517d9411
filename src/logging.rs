//! Console logging, optionally mirrored into a run's `5.train.log`.
//!
//! The logger is installed once at startup. A log file can be attached
//! later, once the run folder it lives in has been created.

use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
    sync::Mutex,
};

use anyhow::{Context, Result};
use chrono::Local;
use env_logger::{Builder, Env, Target, WriteStyle};
use log::LevelFilter;

/// `2024/03/07 02:15:09`
const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %I:%M:%S";

/// The file log lines are copied to, if any.
static LOG_FILE: Mutex<Option<File>> = Mutex::new(None);

/// Writes everything to stderr and to the attached log file.
struct Tee;

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Ok(mut file) = LOG_FILE.lock() {
            if let Some(file) = file.as_mut() {
                file.write_all(buf)?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Ok(mut file) = LOG_FILE.lock() {
            if let Some(file) = file.as_mut() {
                file.flush()?;
            }
        }
        Ok(())
    }
}

/// Install the global logger. `RUST_LOG` overrides the default level.
pub fn init(verbose: bool) -> Result<()> {
    let default_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    Builder::new()
        .filter_level(default_level)
        .parse_env(Env::default())
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {} {}: {}",
                Local::now().format(TIMESTAMP_FORMAT),
                env!("CARGO_PKG_NAME"),
                record.level(),
                record.args()
            )
        })
        .write_style(WriteStyle::Never)
        .target(Target::Pipe(Box::new(Tee)))
        .try_init()
        .context("failed to initialize logging")
}

/// Start copying log output to `path`, appending if it already exists.
pub fn attach_file(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    if let Ok(mut current) = LOG_FILE.lock() {
        *current = Some(file);
    }
    Ok(())
}

/// Stop copying log output to a file.
pub fn detach_file() {
    if let Ok(mut current) = LOG_FILE.lock() {
        *current = None;
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;
    use crate::test_utils::LOG_FILE_LOCK;

    #[test]
    fn test_tee_copies_to_attached_file() {
        let _guard = LOG_FILE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("5.train.log");
        attach_file(&path).unwrap();

        let mut tee = Tee;
        tee.write_all(b"epoch 1 done\n").unwrap();
        tee.flush().unwrap();
        detach_file();
        tee.write_all(b"after detach\n").unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("epoch 1 done\n"));
        assert!(!contents.contains("after detach"));
    }

    #[test]
    fn test_timestamp_format() {
        let time = Local.with_ymd_and_hms(2024, 3, 7, 14, 15, 9).unwrap();
        assert_eq!(time.format(TIMESTAMP_FORMAT).to_string(), "2024/03/07 02:15:09");
    }
}
