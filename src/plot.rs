//! Paper-style charts, written as PDF.
//!
//! Charts are drawn as SVG with plotters, then converted with `svg2pdf`.
//! Every chart draws on an explicit [`Figure`] and writes
//! `<figure dir>/<stem>.pdf`, replacing any previous file with that name.

use std::{
    fs,
    ops::Range,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use log::info;
use plotters::{
    coord::{types::RangedCoordf64, Shift},
    element::{EmptyElement, Rectangle, Text, TriangleMarker},
    prelude::{
        Cartesian2d, ChartBuilder, ChartContext, DrawingArea, IntoDrawingArea, PathElement, Ranged,
    },
    series::{DashedLineSeries, LineSeries},
    style::{
        text_anchor::{HPos, Pos, VPos},
        Color, IntoFont, RGBColor, TextStyle, BLACK, RED, WHITE,
    },
};
use plotters_svg::SVGBackend;
use resvg::tiny_skia;
use thiserror::Error;

use crate::metrics::MetricLog;

#[derive(Debug, Error, PartialEq)]
pub enum PlotError {
    #[error("series {series:?} has {actual} values, expected {expected}")]
    SeriesLength {
        series: String,
        expected: usize,
        actual: usize,
    },

    #[error("nothing to plot")]
    Empty,

    #[error("unknown colour {0:?}, expected `#rrggbb` or a basic colour name")]
    UnknownColor(String),

    #[error("invalid axis range {start}..{end}")]
    InvalidRange { start: f64, end: f64 },
}

/// Seaborn's "deep" palette.
pub const DEEP: [RGBColor; 6] = [
    RGBColor(0x4c, 0x72, 0xb0),
    RGBColor(0xdd, 0x84, 0x52),
    RGBColor(0x55, 0xa8, 0x68),
    RGBColor(0xc4, 0x4e, 0x52),
    RGBColor(0x81, 0x72, 0xb3),
    RGBColor(0x93, 0x78, 0x60),
];

/// Colours used by [`multi_bar`] when none are given.
pub const MULTI_BAR_COLORS: [RGBColor; 5] = [
    RGBColor(0x42, 0x7a, 0xb2),
    RGBColor(0xf0, 0x91, 0x48),
    RGBColor(0xa0, 0xd5, 0x68),
    RGBColor(0xff, 0xce, 0x54),
    RGBColor(0xd8, 0x33, 0x4a),
];

pub const SKY_BLUE: RGBColor = RGBColor(0x87, 0xce, 0xeb);

/// Number of y axis labels, and of grid lines.
const Y_LABELS: usize = 10;

/// Parse `#rrggbb` or one of a few colour names.
pub fn parse_color(s: &str) -> Result<RGBColor, PlotError> {
    let unknown = || PlotError::UnknownColor(s.to_owned());
    if let Some(hex) = s.strip_prefix('#') {
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(unknown());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| unknown());
        return Ok(RGBColor(channel(0)?, channel(2)?, channel(4)?));
    }
    match s.to_lowercase().as_str() {
        "black" => Ok(RGBColor(0, 0, 0)),
        "white" => Ok(RGBColor(255, 255, 255)),
        "red" => Ok(RGBColor(255, 0, 0)),
        "blue" => Ok(RGBColor(0, 0, 255)),
        "green" => Ok(RGBColor(0, 128, 0)),
        "gray" | "grey" => Ok(RGBColor(128, 128, 128)),
        "skyblue" => Ok(SKY_BLUE),
        "royalblue" => Ok(RGBColor(0x41, 0x69, 0xe1)),
        _ => Err(unknown()),
    }
}

/// Fonts, colours and axis cosmetics shared by all charts.
///
/// Only the left and bottom axes are ever drawn, so charts have no top or
/// right frame.
#[derive(Debug, Clone)]
pub struct PaperStyle {
    pub font: &'static str,
    pub label_size: u32,
    pub tick_size: u32,
    pub legend_size: u32,
    pub annotation_size: u32,
    /// Tick mark length in pixels. Negative points the ticks inward.
    pub tick_mark_size: i32,
    /// Opacity of the dashed horizontal grid lines.
    pub grid_alpha: f64,
    /// Dash and gap length of the grid lines, in pixels.
    pub grid_dash: (u32, u32),
    /// Draw a border and background behind the legend.
    pub legend_frame: bool,
    pub palette: Vec<RGBColor>,
}

impl Default for PaperStyle {
    fn default() -> Self {
        Self {
            font: "serif",
            label_size: 22,
            tick_size: 16,
            legend_size: 18,
            annotation_size: 14,
            tick_mark_size: -3,
            grid_alpha: 0.5,
            grid_dash: (4, 3),
            legend_frame: false,
            palette: DEEP.to_vec(),
        }
    }
}

/// Where and how big to draw.
#[derive(Debug, Clone)]
pub struct Figure {
    pub width: u32,
    pub height: u32,
    pub style: PaperStyle,
    pub dir: PathBuf,
}

impl Figure {
    /// A 700x600 figure writing into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            width: 700,
            height: 600,
            style: PaperStyle::default(),
            dir: dir.into(),
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn path_for(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}.pdf", stem))
    }

    /// Convert `svg` and write it to `<dir>/<stem>.pdf`.
    fn save(&self, stem: &str, svg: &str) -> Result<PathBuf> {
        let path = self.path_for(stem);
        write_pdf(&parse_svg(svg)?, &path)?;
        Ok(path)
    }
}

type SvgArea<'a> = DrawingArea<SVGBackend<'a>, Shift>;
type SvgChart<'a, 'b> = ChartContext<'a, SVGBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

/// Draw on a fresh white SVG canvas and return the document.
fn render_svg<F>(fig: &Figure, draw: F) -> Result<String>
where
    F: FnOnce(&SvgArea) -> Result<()>,
{
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (fig.width, fig.height)).into_drawing_area();
        root.fill(&WHITE)?;
        draw(&root)?;
        root.present()?;
    }
    Ok(svg)
}

fn parse_svg(svg: &str) -> Result<usvg::Tree> {
    let mut options = usvg::Options::default();
    options.fontdb_mut().load_system_fonts();
    usvg::Tree::from_str(svg, &options).context("failed to parse rendered chart")
}

fn write_pdf(tree: &usvg::Tree, path: &Path) -> Result<()> {
    let pdf = svg2pdf::to_pdf(
        tree,
        svg2pdf::ConversionOptions::default(),
        svg2pdf::PageOptions::default(),
    )
    .map_err(|e| anyhow!("failed to convert chart to PDF: {}", e))?;
    ensure_parent(path)?;
    fs::write(path, pdf).with_context(|| format!("failed to write {}", path.display()))
}

fn write_png(tree: &usvg::Tree, path: &Path) -> Result<()> {
    let size = tree.size().to_int_size();
    let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| anyhow!("chart has an empty canvas"))?;
    pixmap.fill(tiny_skia::Color::WHITE);
    resvg::render(tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());
    ensure_parent(path)?;
    pixmap
        .save_png(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(())
}

fn check_len(series: &str, values: &[f64], expected: usize) -> Result<(), PlotError> {
    if values.len() != expected {
        return Err(PlotError::SeriesLength {
            series: series.to_owned(),
            expected,
            actual: values.len(),
        });
    }
    Ok(())
}

fn check_range(range: &Range<f64>) -> Result<(), PlotError> {
    if !(range.start.is_finite() && range.end.is_finite() && range.start < range.end) {
        return Err(PlotError::InvalidRange {
            start: range.start,
            end: range.end,
        });
    }
    Ok(())
}

/// The range spanned by `values`, widened by `pad` on both ends. A flat
/// series gets a unit-wide range so the axis is never degenerate.
fn padded_range(values: impl IntoIterator<Item = f64>, pad: f64) -> Range<f64> {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if lo > hi {
        return 0.0..1.0;
    }
    if lo == hi {
        return lo - 0.5..hi + 0.5;
    }
    lo - pad..hi + pad
}

/// The label for category `x` if `x` sits on a category, otherwise blank.
fn category_label(labels: &[String], x: f64) -> String {
    let i = x.round();
    if (x - i).abs() > 1e-6 || i < 0.0 {
        return String::new();
    }
    labels.get(i as usize).cloned().unwrap_or_default()
}

/// Dashed horizontal lines at the y label positions.
fn dashed_y_grid(chart: &mut SvgChart, style: &PaperStyle) -> Result<()> {
    let (x, y) = (chart.x_range(), chart.y_range());
    let line = BLACK.mix(style.grid_alpha).stroke_width(1);
    for v in RangedCoordf64::from(y).key_points(Y_LABELS) {
        chart.draw_series(DashedLineSeries::new(
            vec![(x.start, v), (x.end, v)],
            style.grid_dash.0,
            style.grid_dash.1,
            line,
        ))?;
    }
    Ok(())
}

fn draw_legend<'a, 'b: 'a>(chart: &mut SvgChart<'a, 'b>, style: &PaperStyle) -> Result<()> {
    let mut legend = chart.configure_series_labels();
    legend.label_font((style.font, style.legend_size));
    if style.legend_frame {
        legend
            .border_style(BLACK.mix(0.3))
            .background_style(WHITE.mix(0.8));
    }
    legend.draw()?;
    Ok(())
}

fn draw_bar_chart(
    fig: &Figure,
    labels: &[String],
    data: &[f64],
    y_label: &str,
    color: RGBColor,
) -> Result<String> {
    let style = &fig.style;
    let top = data.iter().cloned().fold(0.0f64, f64::max);
    let bottom = data.iter().cloned().fold(0.0f64, f64::min);
    let top = if top > bottom { top * 1.1 } else { bottom + 1.0 };
    let n = labels.len();

    render_svg(fig, |root| {
        let mut chart = ChartBuilder::on(root)
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d(-0.5f64..n as f64 - 0.5, bottom..top)?;

        chart
            .configure_mesh()
            .disable_mesh()
            .set_all_tick_mark_size(style.tick_mark_size)
            .x_labels(n)
            .y_labels(Y_LABELS)
            .x_label_formatter(&|x| category_label(labels, *x))
            .y_desc(y_label)
            .axis_desc_style((style.font, style.label_size))
            .label_style((style.font, style.tick_size))
            .draw()?;
        dashed_y_grid(&mut chart, style)?;

        chart.draw_series(data.iter().enumerate().map(|(i, &v)| {
            let x = i as f64;
            Rectangle::new([(x - 0.4, 0.0), (x + 0.4, v)], color.filled())
        }))?;

        let value_style = TextStyle::from((style.font, style.annotation_size).into_font())
            .pos(Pos::new(HPos::Center, VPos::Bottom));
        chart.draw_series(
            data.iter()
                .enumerate()
                .map(|(i, &v)| Text::new(format!("{:.1}", v), (i as f64, v), value_style.clone())),
        )?;
        Ok(())
    })
}

/// One bar per label, with its value printed on top.
pub fn bar_chart(
    fig: &Figure,
    stem: &str,
    labels: &[String],
    data: &[f64],
    y_label: &str,
    color: RGBColor,
) -> Result<PathBuf> {
    if labels.is_empty() {
        return Err(PlotError::Empty.into());
    }
    check_len("data", data, labels.len())?;
    let svg = draw_bar_chart(fig, labels, data, y_label, color)?;
    let path = fig.save(stem, &svg)?;
    info!("Saved bar chart to {}", path.display());
    Ok(path)
}

/// A small text note placed in data coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub x: f64,
    pub y: f64,
    pub text: String,
}

/// Two series over the same x positions, e.g. a parameter sweep scored by
/// two metrics.
#[derive(Debug, Clone)]
pub struct DoubleLine {
    pub x: Vec<f64>,
    pub y1: Vec<f64>,
    pub y2: Vec<f64>,
    /// Tick labels for each x position. Empty uses the positions
    /// themselves.
    pub x_ticks: Vec<String>,
    pub x_label: String,
    pub labels: [String; 2],
    pub colors: [RGBColor; 2],
    pub annotations: Vec<Annotation>,
}

impl DoubleLine {
    fn validate(&self) -> Result<(), PlotError> {
        let n = self.x.len();
        if n == 0 {
            return Err(PlotError::Empty);
        }
        check_len(&self.labels[0], &self.y1, n)?;
        check_len(&self.labels[1], &self.y2, n)?;
        if !self.x_ticks.is_empty() && self.x_ticks.len() != n {
            return Err(PlotError::SeriesLength {
                series: "x ticks".to_owned(),
                expected: n,
                actual: self.x_ticks.len(),
            });
        }
        Ok(())
    }
}

fn draw_double_line(fig: &Figure, opts: &DoubleLine) -> Result<String> {
    let style = &fig.style;
    let n = opts.x.len();
    let x_range = padded_range(opts.x.iter().cloned(), 0.5);
    let y_range = padded_range(opts.y1.iter().chain(&opts.y2).cloned(), 0.002);
    let tick_label = |x: &f64| match opts.x.iter().position(|p| (p - x).abs() < 1e-6) {
        Some(i) if !opts.x_ticks.is_empty() => opts.x_ticks[i].clone(),
        Some(_) => format!("{}", x),
        None => String::new(),
    };
    let points = |ys: &[f64]| opts.x.iter().cloned().zip(ys.iter().cloned()).collect::<Vec<_>>();
    let (c1, c2) = (opts.colors[0], opts.colors[1]);

    render_svg(fig, |root| {
        let mut chart = ChartBuilder::on(root)
            .margin(10)
            .x_label_area_size(60)
            .y_label_area_size(80)
            .build_cartesian_2d(x_range, y_range)?;

        chart
            .configure_mesh()
            .disable_mesh()
            .set_all_tick_mark_size(style.tick_mark_size)
            .x_labels(n)
            .y_labels(Y_LABELS)
            .x_label_formatter(&tick_label)
            .y_label_formatter(&|y| format!("{:.3}", y))
            .x_desc(opts.x_label.as_str())
            .axis_desc_style((style.font, style.label_size))
            .label_style((style.font, style.tick_size))
            .draw()?;
        dashed_y_grid(&mut chart, style)?;

        let first = points(&opts.y1);
        chart
            .draw_series(LineSeries::new(first.clone(), c1.stroke_width(1)))?
            .label(opts.labels[0].as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], c1.stroke_width(2)));
        chart.draw_series(
            first
                .into_iter()
                .map(|p| EmptyElement::at(p) + Rectangle::new([(-4, -4), (4, 4)], c1.filled())),
        )?;

        let second = points(&opts.y2);
        chart
            .draw_series(LineSeries::new(second.clone(), c2.stroke_width(1)))?
            .label(opts.labels[1].as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], c2.stroke_width(2)));
        chart.draw_series(
            second
                .into_iter()
                .map(|p| TriangleMarker::new(p, 6, c2.filled())),
        )?;

        let note_style = (style.font, style.annotation_size).into_font().color(&RED);
        chart.draw_series(
            opts.annotations
                .iter()
                .map(|a| Text::new(a.text.clone(), (a.x, a.y), note_style.clone())),
        )?;

        draw_legend(&mut chart, style)
    })
}

pub fn double_line(fig: &Figure, stem: &str, opts: &DoubleLine) -> Result<PathBuf> {
    opts.validate()?;
    let svg = draw_double_line(fig, opts)?;
    let path = fig.save(stem, &svg)?;
    info!("Saved line chart to {}", path.display());
    Ok(path)
}

/// Several series of bars grouped by category.
#[derive(Debug, Clone)]
pub struct MultiBar {
    pub labels: Vec<String>,
    pub series: Vec<Vec<f64>>,
    /// Legend labels, reused cyclically when shorter than `series`. Empty
    /// means `Dataset 1`, `Dataset 2`, ...
    pub series_labels: Vec<String>,
    /// Bar colours, reused cyclically. Empty means [`MULTI_BAR_COLORS`].
    pub colors: Vec<RGBColor>,
    pub y_range: Range<f64>,
}

impl MultiBar {
    pub fn new(labels: Vec<String>, series: Vec<Vec<f64>>) -> Self {
        Self {
            labels,
            series,
            series_labels: Vec::new(),
            colors: Vec::new(),
            y_range: 0.92..1.0,
        }
    }

    fn series_label(&self, i: usize) -> String {
        if self.series_labels.is_empty() {
            format!("Dataset {}", i + 1)
        } else {
            self.series_labels[i % self.series_labels.len()].clone()
        }
    }

    fn color(&self, i: usize) -> RGBColor {
        if self.colors.is_empty() {
            MULTI_BAR_COLORS[i % MULTI_BAR_COLORS.len()]
        } else {
            self.colors[i % self.colors.len()]
        }
    }

    /// Horizontal span of bar `series` in category `category`.
    fn bar_span(&self, category: usize, series: usize) -> (f64, f64) {
        let n = self.series.len() as f64;
        let width = 0.8 / n;
        let center = category as f64 + (series as f64 - n / 2.0) * width + width / 2.0;
        (center - width / 2.0, center + width / 2.0)
    }

    fn validate(&self) -> Result<(), PlotError> {
        if self.labels.is_empty() || self.series.is_empty() {
            return Err(PlotError::Empty);
        }
        check_range(&self.y_range)?;
        for (i, values) in self.series.iter().enumerate() {
            check_len(&self.series_label(i), values, self.labels.len())?;
        }
        Ok(())
    }
}

fn draw_multi_bar(fig: &Figure, opts: &MultiBar) -> Result<String> {
    let style = &fig.style;
    let (bottom, top) = (opts.y_range.start, opts.y_range.end);
    let n = opts.labels.len();

    render_svg(fig, |root| {
        let mut chart = ChartBuilder::on(root)
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d(-0.5f64..n as f64 - 0.5, bottom..top)?;

        chart
            .configure_mesh()
            .disable_mesh()
            .x_labels(n)
            .y_labels(Y_LABELS)
            .x_label_formatter(&|x| category_label(&opts.labels, *x))
            .label_style((style.font, style.tick_size))
            .draw()?;

        for (s, values) in opts.series.iter().enumerate() {
            let color = opts.color(s);
            let bars = values.iter().enumerate().map(|(c, &v)| {
                let (left, right) = opts.bar_span(c, s);
                ([(left, bottom), (right, v.clamp(bottom, top))], color)
            });
            chart
                .draw_series(
                    bars.clone()
                        .map(|(corners, color)| Rectangle::new(corners, color.filled())),
                )?
                .label(opts.series_label(s))
                .legend(move |(x, y)| Rectangle::new([(x, y - 6), (x + 14, y + 6)], color.filled()));
            chart.draw_series(
                bars.map(|(corners, _)| Rectangle::new(corners, BLACK.stroke_width(1))),
            )?;
        }

        draw_legend(&mut chart, style)
    })
}

pub fn multi_bar(fig: &Figure, stem: &str, opts: &MultiBar) -> Result<PathBuf> {
    opts.validate()?;
    let svg = draw_multi_bar(fig, opts)?;
    let path = fig.save(stem, &svg)?;
    info!("Saved grouped bar chart to {}", path.display());
    Ok(path)
}

/// File stem for a metric's curve: lowercased, spaces turned into `_`.
pub fn curve_stem(metric: &str) -> String {
    format!("{}_plot", metric.to_lowercase().replace(' ', "_"))
}

/// The two files written for one metric curve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurveFiles {
    pub pdf: PathBuf,
    pub png: PathBuf,
}

fn draw_metric_curve(fig: &Figure, name: &str, values: &[f64], color: RGBColor) -> Result<String> {
    let style = &fig.style;
    let y_range = padded_range(values.iter().cloned(), 0.0);
    let span = (y_range.end - y_range.start) * 0.05;

    render_svg(fig, |root| {
        let mut chart = ChartBuilder::on(root)
            .margin(10)
            .x_label_area_size(50)
            .y_label_area_size(80)
            .build_cartesian_2d(
                0.5f64..values.len() as f64 + 0.5,
                y_range.start - span..y_range.end + span,
            )?;

        chart
            .configure_mesh()
            .disable_mesh()
            .set_all_tick_mark_size(style.tick_mark_size)
            .y_labels(Y_LABELS)
            .x_desc("Epochs")
            .y_desc(name)
            .axis_desc_style((style.font, style.label_size))
            .label_style((style.font, style.tick_size))
            .draw()?;
        dashed_y_grid(&mut chart, style)?;

        chart.draw_series(LineSeries::new(
            values
                .iter()
                .enumerate()
                .map(|(epoch, v)| (epoch as f64 + 1.0, *v)),
            color.stroke_width(2),
        ))?;
        Ok(())
    })
}

/// One line chart per metric, epochs on the x axis, written as
/// `<dir>/pdf/<stem>.pdf` and `<dir>/png/<stem>.png`.
pub fn metric_curves(fig: &Figure, log: &MetricLog) -> Result<Vec<CurveFiles>> {
    if let Some((name, _)) = log.iter().find(|(_, values)| values.is_empty()) {
        return Err(PlotError::SeriesLength {
            series: name.to_owned(),
            expected: 1,
            actual: 0,
        }
        .into());
    }
    let palette = &fig.style.palette;
    let mut written = Vec::new();
    for (i, (name, values)) in log.iter().enumerate() {
        let stem = curve_stem(name);
        let svg = draw_metric_curve(fig, name, values, palette[i % palette.len()])?;
        let tree = parse_svg(&svg)?;
        let files = CurveFiles {
            pdf: fig.dir.join("pdf").join(format!("{}.pdf", stem)),
            png: fig.dir.join("png").join(format!("{}.png", stem)),
        };
        write_pdf(&tree, &files.pdf)?;
        write_png(&tree, &files.png)?;
        written.push(files);
    }
    info!("Saved {} metric curves to {}", written.len(), fig.dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::test_utils::{is_written, loss_and_auc, strings};

    fn is_pdf(path: &Path) -> bool {
        fs::read(path).map(|b| b.starts_with(b"%PDF")).unwrap_or(false)
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#4169E1"), Ok(RGBColor(0x41, 0x69, 0xe1)));
        assert_eq!(parse_color("SkyBlue"), Ok(SKY_BLUE));
        assert_eq!(
            parse_color("#12345"),
            Err(PlotError::UnknownColor("#12345".to_owned()))
        );
        assert!(parse_color("#gg0000").is_err());
        assert!(parse_color("chartreuse").is_err());
    }

    #[test]
    fn test_padded_range() {
        assert_eq!(padded_range([0.9, 0.95], 0.0), 0.9..0.95);
        assert_eq!(padded_range([2.0, 2.0], 0.1), 1.5..2.5);
        assert_eq!(padded_range(Vec::new(), 0.1), 0.0..1.0);
    }

    #[test]
    fn test_category_label() {
        let labels = strings(&["A", "B"]);
        assert_eq!(category_label(&labels, 0.0), "A");
        assert_eq!(category_label(&labels, 1.0), "B");
        assert_eq!(category_label(&labels, 0.5), "");
        assert_eq!(category_label(&labels, 2.0), "");
        assert_eq!(category_label(&labels, -1.0), "");
    }

    #[test]
    fn test_bar_span() {
        let chart = MultiBar::new(strings(&["Cora"]), vec![vec![0.96], vec![0.95]]);
        let (l0, r0) = chart.bar_span(0, 0);
        let (l1, r1) = chart.bar_span(0, 1);
        assert!((l0 - -0.4).abs() < 1e-12);
        assert!((r0 - l1).abs() < 1e-12);
        assert!((r1 - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_series_labels_and_colors_cycle() {
        let mut chart = MultiBar::new(strings(&["A"]), vec![vec![1.0]; 3]);
        assert_eq!(chart.series_label(2), "Dataset 3");
        chart.series_labels = strings(&["x", "y"]);
        chart.colors = vec![RED];
        assert_eq!(chart.series_label(2), "x");
        assert_eq!(chart.color(1), RED);
    }

    #[test]
    fn test_bar_chart_writes_and_overwrites() {
        let temp = TempDir::new().unwrap();
        let fig = Figure::new(temp.path().join("figs"));
        let labels = strings(&["A", "B"]);

        let path = bar_chart(&fig, "test", &labels, &[1.0, 2.0], "Time", SKY_BLUE).unwrap();
        assert_eq!(path, temp.path().join("figs/test.pdf"));
        assert!(is_written(&path));
        assert!(is_pdf(&path));

        fs::write(&path, b"stale").unwrap();
        bar_chart(&fig, "test", &labels, &[1.0, 2.0], "Time", SKY_BLUE).unwrap();
        assert!(is_pdf(&path));
        assert_eq!(fs::read_dir(temp.path().join("figs")).unwrap().count(), 1);
    }

    #[test]
    fn test_bar_chart_draws_dashed_grid() {
        let fig = Figure::new("unused");
        let svg = draw_bar_chart(&fig, &strings(&["A", "B"]), &[1.0, 2.0], "Time", SKY_BLUE).unwrap();
        assert!(svg.contains("Time"));
        assert!(svg.contains("2.0"));
        // Every dash is its own segment, so the grid adds many more lines
        // than the two axes.
        assert!(svg.matches("<line").count() + svg.matches("<polyline").count() > 20);
    }

    #[test]
    fn test_bar_chart_rejects_mismatched_lengths() {
        let temp = TempDir::new().unwrap();
        let fig = Figure::new(temp.path());
        let err = bar_chart(&fig, "bad", &strings(&["A", "B"]), &[1.0], "", SKY_BLUE).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PlotError>(),
            Some(&PlotError::SeriesLength {
                series: "data".to_owned(),
                expected: 2,
                actual: 1,
            })
        );
        assert!(!fig.path_for("bad").exists());
    }

    fn parameter_sweep() -> DoubleLine {
        DoubleLine {
            x: vec![1.0, 2.0, 3.0],
            y1: vec![0.9405, 0.9432, 0.9497],
            y2: vec![0.9451, 0.9526, 0.9583],
            x_ticks: strings(&["32", "64", "128"]),
            x_label: "Hidden size".to_owned(),
            labels: ["AUC".to_owned(), "AP".to_owned()],
            colors: [RGBColor(0x41, 0x69, 0xe1), RED],
            annotations: vec![Annotation {
                x: 2.0,
                y: 0.95,
                text: "Key Point".to_owned(),
            }],
        }
    }

    #[test]
    fn test_double_line() {
        let temp = TempDir::new().unwrap();
        let fig = Figure::new(temp.path());
        let chart = parameter_sweep();

        let svg = draw_double_line(&fig, &chart).unwrap();
        assert!(svg.contains("Key Point"));
        assert!(svg.contains("AUC"));
        assert!(svg.contains("Hidden size"));

        let path = double_line(&fig, "param", &chart).unwrap();
        assert_eq!(path, temp.path().join("param.pdf"));
        assert!(is_pdf(&path));
    }

    #[test]
    fn test_double_line_rejects_tick_count() {
        let temp = TempDir::new().unwrap();
        let mut chart = parameter_sweep();
        chart.x_ticks.pop();
        assert!(double_line(&Figure::new(temp.path()), "param", &chart).is_err());
    }

    #[test]
    fn test_multi_bar() {
        let temp = TempDir::new().unwrap();
        let fig = Figure::new(temp.path()).with_size(800, 600);
        let mut chart = MultiBar::new(
            strings(&["Cora", "Citeseer"]),
            vec![vec![0.964, 0.978], vec![0.960, 0.973]],
        );
        chart.series_labels = strings(&["Asymmetry", "Symmetry"]);
        let svg = draw_multi_bar(&fig, &chart).unwrap();
        assert!(svg.contains("Asymmetry"));
        assert!(svg.contains("Citeseer"));
        assert!(is_pdf(&multi_bar(&fig, "symmetry", &chart).unwrap()));

        chart.series.push(vec![0.95]);
        assert!(multi_bar(&fig, "short", &chart).is_err());
    }

    #[test]
    fn test_multi_bar_rejects_bad_y_range() {
        let temp = TempDir::new().unwrap();
        let fig = Figure::new(temp.path());
        let mut chart = MultiBar::new(strings(&["Cora"]), vec![vec![0.95]]);

        chart.y_range = 1.0..0.9;
        let err = multi_bar(&fig, "reversed", &chart).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PlotError>(),
            Some(&PlotError::InvalidRange {
                start: 1.0,
                end: 0.9
            })
        );

        chart.y_range = 0.9..f64::NAN;
        assert!(multi_bar(&fig, "nan", &chart).is_err());
        chart.y_range = 0.9..0.9;
        assert!(multi_bar(&fig, "flat", &chart).is_err());
        assert!(!fig.path_for("reversed").exists());
    }

    #[test]
    fn test_metric_curves() {
        let temp = TempDir::new().unwrap();
        let fig = Figure::new(temp.path());
        let mut log = loss_and_auc();
        log.insert("Test AUC", vec![0.5, 0.6]);
        let written = metric_curves(&fig, &log).unwrap();
        let stems: Vec<_> = written
            .iter()
            .map(|f| f.pdf.file_stem().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(stems, vec!["loss_plot", "auc_plot", "test_auc_plot"]);
        assert_eq!(
            written[2],
            CurveFiles {
                pdf: temp.path().join("pdf/test_auc_plot.pdf"),
                png: temp.path().join("png/test_auc_plot.png"),
            }
        );
        for files in &written {
            assert!(is_pdf(&files.pdf));
            let png = fs::read(&files.png).unwrap();
            assert!(png.starts_with(b"\x89PNG"));
        }
    }

    #[test]
    fn test_metric_curves_rejects_empty_metric() {
        let temp = TempDir::new().unwrap();
        let mut log = loss_and_auc();
        log.insert("Val AUC", Vec::new());
        assert!(metric_curves(&Figure::new(temp.path()), &log).is_err());
        assert!(!temp.path().join("pdf").exists());
    }
}
