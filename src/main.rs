use std::{fs, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::debug;
use plotters::style::RGBColor;

use exp_kit::{
    config::TrainArgs,
    experiment, logging,
    metrics::{self, MetricLog},
    plot::{self, parse_color, Annotation, DoubleLine, Figure, MultiBar},
    scan::{scan_best_runs, DEFAULT_LABELS},
    spreadsheet::{append_run, RunRecord},
};

/// Experiment bookkeeping and paper figures.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Opt {
    /// Show debug output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Create the next `expN` run folder and record the run's parameters.
    NewRun(TrainArgs),

    /// Write best-metric and raw metric logs from a JSON metric history.
    Summarize {
        /// JSON object mapping metric names to per-epoch values.
        metrics: PathBuf,

        /// Directory to write `3.metric.log` and `4.best_metric.log` into.
        #[arg(long = "log-dir")]
        log_dir: PathBuf,

        /// Also draw one curve per metric into this directory.
        #[arg(long = "plots")]
        plots: Option<PathBuf>,
    },

    /// Append a run's parameters and best metrics to a spreadsheet.
    AppendSheet(AppendSheetOpt),

    /// Find the best previous runs for the given metric labels.
    Scan {
        /// Directory holding the `expN` folders.
        dir: PathBuf,

        /// Metric label to look up. May be repeated.
        #[arg(long = "metric")]
        metrics: Vec<String>,
    },

    /// Draw a bar chart.
    Bar(BarOpt),

    /// Draw two lines over shared x positions.
    DoubleLine(DoubleLineOpt),

    /// Draw grouped bars.
    MultiBar(MultiBarOpt),
}

#[derive(Debug, Args)]
struct AppendSheetOpt {
    /// JSON object mapping metric names to per-epoch values.
    metrics: PathBuf,

    /// A run parameter as `NAME=VALUE`. May be repeated.
    #[arg(long = "param", value_parser = parse_key_val)]
    params: Vec<(String, String)>,

    /// Per-metric direction, `1` to maximize and `0` to minimize.
    #[arg(long = "compare", value_delimiter = ',', allow_negative_numbers = true)]
    compare: Option<Vec<i64>>,

    /// Record only parameter values, not their names.
    #[arg(long = "terse")]
    terse: bool,

    #[arg(long = "file", default_value = "output.xlsx")]
    file: PathBuf,
}

/// Options shared by the chart commands.
#[derive(Debug, Args)]
struct FigureOpt {
    /// Output file name, without extension.
    #[arg(long = "name")]
    name: String,

    #[arg(long = "dir", default_value = "figs")]
    dir: PathBuf,

    #[arg(long = "width", default_value = "700")]
    width: u32,

    #[arg(long = "height", default_value = "600")]
    height: u32,
}

impl FigureOpt {
    fn figure(&self) -> Figure {
        Figure::new(&self.dir).with_size(self.width, self.height)
    }
}

#[derive(Debug, Args)]
struct BarOpt {
    #[command(flatten)]
    figure: FigureOpt,

    #[arg(long = "labels", value_delimiter = ',', required = true)]
    labels: Vec<String>,

    #[arg(long = "data", value_delimiter = ',', required = true)]
    data: Vec<f64>,

    #[arg(long = "y-label", default_value = "")]
    y_label: String,

    #[arg(long = "color", default_value = "skyblue", value_parser = parse_color)]
    color: RGBColor,
}

#[derive(Debug, Args)]
struct DoubleLineOpt {
    #[command(flatten)]
    figure: FigureOpt,

    #[arg(long = "x", value_delimiter = ',', required = true)]
    x: Vec<f64>,

    #[arg(long = "y1", value_delimiter = ',', required = true)]
    y1: Vec<f64>,

    #[arg(long = "y2", value_delimiter = ',', required = true)]
    y2: Vec<f64>,

    /// Tick label for each x position.
    #[arg(long = "x-ticks", value_delimiter = ',')]
    x_ticks: Vec<String>,

    #[arg(long = "x-label", default_value = "")]
    x_label: String,

    /// Legend labels for the two lines.
    #[arg(long = "labels", value_delimiter = ',', default_values = ["AUC", "AP"])]
    labels: Vec<String>,

    #[arg(long = "colors", value_delimiter = ',', default_values = ["#4169E1", "#FF0000"], value_parser = parse_color)]
    colors: Vec<RGBColor>,

    /// A note as `X,Y,TEXT`. May be repeated.
    #[arg(long = "annotate", value_parser = parse_annotation)]
    annotations: Vec<Annotation>,
}

#[derive(Debug, Args)]
struct MultiBarOpt {
    #[command(flatten)]
    figure: FigureOpt,

    /// Category labels.
    #[arg(long = "labels", value_delimiter = ',', required = true)]
    labels: Vec<String>,

    /// Comma-separated values for one series. Repeat for each series.
    #[arg(long = "series", required = true)]
    series: Vec<String>,

    /// Legend label for each series.
    #[arg(long = "series-labels", value_delimiter = ',')]
    series_labels: Vec<String>,

    #[arg(long = "colors", value_delimiter = ',', value_parser = parse_color)]
    colors: Vec<RGBColor>,

    #[arg(long = "y-min", default_value = "0.92")]
    y_min: f64,

    #[arg(long = "y-max", default_value = "1.0")]
    y_max: f64,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {:?}", s))?;
    Ok((key.to_owned(), value.to_owned()))
}

fn parse_annotation(s: &str) -> Result<Annotation, String> {
    let mut parts = s.splitn(3, ',');
    let mut number = |what: &str| {
        parts
            .next()
            .and_then(|p| p.trim().parse::<f64>().ok())
            .ok_or_else(|| format!("expected X,Y,TEXT with a numeric {}, got {:?}", what, s))
    };
    let x = number("X")?;
    let y = number("Y")?;
    let text = parts
        .next()
        .ok_or_else(|| format!("expected X,Y,TEXT, got {:?}", s))?;
    Ok(Annotation {
        x,
        y,
        text: text.to_owned(),
    })
}

fn parse_values(s: &str) -> Result<Vec<f64>> {
    s.split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .with_context(|| format!("bad number {:?} in {:?}", v, s))
        })
        .collect()
}

fn main() -> Result<()> {
    let opt = Opt::parse();
    logging::init(opt.verbose)?;
    debug!("Options: {:?}", opt);

    match opt.cmd {
        Cmd::NewRun(args) => {
            let dirs = experiment::start_run(&args)?;
            println!("{}", dirs.root.display());
        }
        Cmd::Summarize {
            metrics: metrics_path,
            log_dir,
            plots,
        } => {
            let log = MetricLog::from_json_file(&metrics_path)?;
            fs::create_dir_all(&log_dir)
                .with_context(|| format!("failed to create {}", log_dir.display()))?;
            let best = metrics::write_summary(&log_dir, &log)?;
            let width = best.iter().map(|b| b.name.chars().count()).max().unwrap_or(0);
            for b in &best {
                println!("{}", b.summary_line(width));
            }
            if let Some(dir) = plots {
                plot::metric_curves(&Figure::new(dir), &log)?;
            }
        }
        Cmd::AppendSheet(opt) => {
            let log = MetricLog::from_json_file(&opt.metrics)?;
            let (names, values): (Vec<_>, Vec<_>) = opt.params.into_iter().unzip();
            let run = RunRecord {
                param_names: &names,
                param_values: &values,
                metrics: &log,
                compare: opt.compare.as_deref(),
                verbose: !opt.terse,
            };
            append_run(&opt.file, &run)?;
            println!("Data written to {} successfully.", opt.file.display());
        }
        Cmd::Scan { dir, metrics } => {
            let labels = if metrics.is_empty() {
                DEFAULT_LABELS.iter().map(|s| s.to_string()).collect()
            } else {
                metrics
            };
            let report = scan_best_runs(&dir, &labels)?;
            debug!("Scanned {} runs", report.runs_scanned);
            print!("{}", report);
        }
        Cmd::Bar(opt) => {
            let path = plot::bar_chart(
                &opt.figure.figure(),
                &opt.figure.name,
                &opt.labels,
                &opt.data,
                &opt.y_label,
                opt.color,
            )?;
            println!("{}", path.display());
        }
        Cmd::DoubleLine(opt) => {
            let labels: [String; 2] = opt
                .labels
                .try_into()
                .map_err(|l: Vec<String>| anyhow!("expected 2 labels, got {}", l.len()))?;
            let colors: [RGBColor; 2] = opt
                .colors
                .try_into()
                .map_err(|c: Vec<RGBColor>| anyhow!("expected 2 colors, got {}", c.len()))?;
            let chart = DoubleLine {
                x: opt.x,
                y1: opt.y1,
                y2: opt.y2,
                x_ticks: opt.x_ticks,
                x_label: opt.x_label,
                labels,
                colors,
                annotations: opt.annotations,
            };
            let path = plot::double_line(&opt.figure.figure(), &opt.figure.name, &chart)?;
            println!("{}", path.display());
        }
        Cmd::MultiBar(opt) => {
            let series = opt
                .series
                .iter()
                .map(|s| parse_values(s))
                .collect::<Result<Vec<_>>>()?;
            let mut chart = MultiBar::new(opt.labels, series);
            chart.series_labels = opt.series_labels;
            chart.colors = opt.colors;
            chart.y_range = opt.y_min..opt.y_max;
            let path = plot::multi_bar(&opt.figure.figure(), &opt.figure.name, &chart)?;
            println!("{}", path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        use clap::CommandFactory;
        Opt::command().debug_assert();
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("lr=0.01"),
            Ok(("lr".to_owned(), "0.01".to_owned()))
        );
        assert_eq!(
            parse_key_val("tag=a=b"),
            Ok(("tag".to_owned(), "a=b".to_owned()))
        );
        assert!(parse_key_val("lr").is_err());
    }

    #[test]
    fn test_parse_annotation() {
        assert_eq!(
            parse_annotation("2, 0.95,Key Point, again"),
            Ok(Annotation {
                x: 2.0,
                y: 0.95,
                text: "Key Point, again".to_owned(),
            })
        );
        assert!(parse_annotation("2,x,Text").is_err());
        assert!(parse_annotation("2,3").is_err());
    }

    #[test]
    fn test_parse_series_args() {
        let opt = Opt::try_parse_from([
            "exp-kit",
            "multi-bar",
            "--name",
            "auc",
            "--labels",
            "Cora,Citeseer",
            "--series",
            "0.96,0.97",
            "--series",
            "0.95,0.98",
            "--colors",
            "#A8D8EA,#FFC7C7",
        ])
        .unwrap();
        let Cmd::MultiBar(opt) = opt.cmd else {
            panic!("expected multi-bar");
        };
        assert_eq!(opt.series.len(), 2);
        assert_eq!(parse_values(&opt.series[1]).unwrap(), vec![0.95, 0.98]);
        assert_eq!(opt.colors.len(), 2);
        assert_eq!(opt.figure.dir, PathBuf::from("figs"));
    }

    #[test]
    fn test_parse_append_sheet_args() {
        let opt = Opt::try_parse_from([
            "exp-kit",
            "append-sheet",
            "metrics.json",
            "--param",
            "lr=0.01",
            "--param",
            "bs=32",
            "--compare",
            "0,1",
        ])
        .unwrap();
        let Cmd::AppendSheet(opt) = opt.cmd else {
            panic!("expected append-sheet");
        };
        assert_eq!(opt.params[1], ("bs".to_owned(), "32".to_owned()));
        assert_eq!(opt.compare, Some(vec![0, 1]));
        assert_eq!(opt.file, PathBuf::from("output.xlsx"));
    }
}
