//! Bar, line and dual-axis combo charts.
//!
//! Rows are ordered by [`axis::sort`] and turned into one ordered category
//! list. Every series is then looked up by category key from that list, so
//! the bar and line of a combo chart always share slot positions whatever
//! the x column's type.

use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::FontStyle;
use std::collections::HashMap;
use std::ops::Range;

use super::fonts::{self, FAMILY};
use super::{axis, draw_err, rasterize, PngImage, RenderError};
use crate::query::QueryResult;
use crate::util::format::{abbreviate, wrap_text};

const LABEL_WRAP: usize = 15;
const LABEL_LINE_PX: u32 = 18;
const LABEL_TOP_PAD: u32 = 10;
const LABEL_SLOT_PX: u32 = 110;
const X_DESC_PX: u32 = 40;
const Y_AREA_PX: u32 = 90;
const MARGIN_PX: u32 = 24;
const BAR_HALF_WIDTH: f64 = 0.4;

const DARK: RGBColor = RGBColor(44, 62, 80);
const GRID: RGBColor = RGBColor(128, 128, 128);
const LINE_RED: RGBColor = RGBColor(231, 76, 60);
const AXIS_RED: RGBColor = RGBColor(192, 57, 43);

const VIRIDIS: [RGBColor; 8] = [
    RGBColor(68, 1, 84),
    RGBColor(70, 50, 126),
    RGBColor(54, 92, 141),
    RGBColor(39, 127, 142),
    RGBColor(31, 161, 135),
    RGBColor(74, 193, 109),
    RGBColor(160, 218, 57),
    RGBColor(253, 231, 37),
];

type Chart<'a, 'b> = ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartType {
    Bar,
    Line,
    Combo,
}

#[derive(Debug, Clone, Copy)]
pub struct ChartRenderer {
    width: u32,
    height: u32,
}

impl Default for ChartRenderer {
    fn default() -> Self {
        Self::new(1440, 840)
    }
}

/// Ordered category list derived once from the sorted x column.
#[derive(Debug)]
struct Categories {
    labels: Vec<String>,
    slots: HashMap<String, usize>,
}

impl Categories {
    fn from_column(rows: &QueryResult, x: usize) -> Self {
        let mut labels = Vec::new();
        let mut slots = HashMap::new();
        for value in rows.values(x).filter(|v| !v.is_null()) {
            let label = value.to_string();
            if !slots.contains_key(&label) {
                slots.insert(label.clone(), labels.len());
                labels.push(label);
            }
        }
        Self { labels, slots }
    }

    /// Mean of `y` per category; `None` where a category has no numeric value.
    fn series(&self, rows: &QueryResult, x: usize, y: usize) -> Vec<Option<f64>> {
        let mut sums = vec![(0.0f64, 0usize); self.labels.len()];
        for row in rows.rows() {
            if row[x].is_null() {
                continue;
            }
            let (Some(&slot), Some(value)) = (self.slots.get(&row[x].to_string()), row[y].as_f64()) else {
                continue;
            };
            sums[slot].0 += value;
            sums[slot].1 += 1;
        }
        sums.into_iter()
            .map(|(sum, count)| (count > 0).then(|| sum / count as f64))
            .collect()
    }
}

struct Series<'a> {
    name: &'a str,
    values: Vec<Option<f64>>,
}

struct Plot<'a> {
    title: &'a str,
    x_label: &'a str,
    categories: Vec<String>,
    primary: Series<'a>,
    secondary: Option<Series<'a>>,
}

impl ChartRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn render(
        &self,
        rows: &QueryResult,
        chart_type: ChartType,
        title: &str,
        x_axis: &str,
        y_axis: &str,
        y_axis_2: Option<&str>,
    ) -> Result<PngImage, RenderError> {
        let second_name = match chart_type {
            ChartType::Combo => Some(y_axis_2.ok_or(RenderError::MissingSecondAxis)?),
            _ => None,
        };

        let missing: Vec<&str> = [Some(x_axis), Some(y_axis), second_name]
            .into_iter()
            .flatten()
            .filter(|name| rows.column_index(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(RenderError::missing_columns(&missing, &rows.column_names()));
        }
        let index = |name: &str| rows.column_index(name).unwrap_or_default();
        let (x, y) = (index(x_axis), index(y_axis));

        let sorted = axis::sort(rows, x_axis);
        let categories = Categories::from_column(&sorted, x);
        if categories.labels.is_empty() {
            return Err(RenderError::Empty("the x column has no values"));
        }

        let numeric_series = |name: &str, column: usize| {
            let values = categories.series(&sorted, x, column);
            if values.iter().all(Option::is_none) {
                Err(RenderError::NonNumeric(name.to_string()))
            } else {
                Ok(values)
            }
        };
        let primary = Series {
            name: y_axis,
            values: numeric_series(y_axis, y)?,
        };
        let secondary = match second_name {
            Some(name) => Some(Series {
                name,
                values: numeric_series(name, index(name))?,
            }),
            None => None,
        };

        fonts::ensure_registered()?;
        let plot = Plot {
            title,
            x_label: x_axis,
            categories: categories.labels,
            primary,
            secondary,
        };
        rasterize(self.width, self.height, |buf| self.draw(buf, chart_type, &plot))
    }

    fn label_step(&self, categories: usize) -> usize {
        let plot_width = self.width.saturating_sub(2 * (Y_AREA_PX + MARGIN_PX));
        let max_labels = (plot_width / LABEL_SLOT_PX).max(1) as usize;
        categories.div_ceil(max_labels).max(1)
    }

    fn draw(&self, buf: &mut [u8], chart_type: ChartType, plot: &Plot<'_>) -> Result<(), RenderError> {
        let root = BitMapBackend::with_buffer(buf, (self.width, self.height)).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;

        let n = plot.categories.len();
        let labels = wrapped_labels(&plot.categories, self.label_step(n));
        let label_lines = labels.iter().flatten().map(Vec::len).max().unwrap_or(1) as u32;
        let x_area = (LABEL_TOP_PAD + label_lines * LABEL_LINE_PX + X_DESC_PX).min(self.height / 2);

        let x_range = -0.5..n as f64 - 0.5;
        let y_range = value_range(&plot.primary.values, chart_type != ChartType::Line);

        let mut builder = ChartBuilder::on(&root);
        builder
            .caption(plot.title, bold(26).color(&BLACK))
            .margin(MARGIN_PX)
            .x_label_area_size(x_area)
            .y_label_area_size(Y_AREA_PX);
        if plot.secondary.is_some() {
            builder.right_y_label_area_size(Y_AREA_PX);
        }
        let mut chart = builder
            .build_cartesian_2d(x_range.clone(), y_range.clone())
            .map_err(draw_err)?;
        configure_primary(&mut chart, plot)?;

        let anchors = match (chart_type, &plot.secondary) {
            (ChartType::Combo, Some(second)) => {
                let mut dual = chart.set_secondary_coord(x_range, value_range(&second.values, false));
                dual.configure_secondary_axes()
                    .y_desc(second.name)
                    .y_label_formatter(&|v| abbreviate(*v))
                    .label_style(regular(15).color(&AXIS_RED))
                    .axis_desc_style(bold(18).color(&AXIS_RED))
                    .draw()
                    .map_err(draw_err)?;

                dual.draw_series(bars(&plot.primary.values, 0.6)).map_err(draw_err)?;
                let points = points(&second.values);
                dual.draw_secondary_series(LineSeries::new(points.clone(), LINE_RED.stroke_width(3)))
                    .map_err(draw_err)?;
                dual.draw_secondary_series(points.into_iter().map(|p| Circle::new(p, 6, LINE_RED.filled())))
                    .map_err(draw_err)?;
                category_anchors(&dual, n, y_range.start)
            }
            (ChartType::Line, _) => {
                let color = VIRIDIS[2];
                let points = points(&plot.primary.values);
                chart
                    .draw_series(LineSeries::new(points.clone(), color.stroke_width(3)))
                    .map_err(draw_err)?;
                chart
                    .draw_series(points.into_iter().map(|p| Circle::new(p, 6, color.filled())))
                    .map_err(draw_err)?;
                category_anchors(&chart, n, y_range.start)
            }
            _ => {
                chart.draw_series(bars(&plot.primary.values, 1.0)).map_err(draw_err)?;
                chart
                    .draw_series(bar_outlines(&plot.primary.values))
                    .map_err(draw_err)?;
                category_anchors(&chart, n, y_range.start)
            }
        };

        let style = regular(15).color(&BLACK).pos(Pos::new(HPos::Center, VPos::Top));
        for (&(px, py), lines) in anchors.iter().zip(&labels) {
            let Some(lines) = lines else { continue };
            for (k, line) in lines.iter().enumerate() {
                let y = py + (LABEL_TOP_PAD + k as u32 * LABEL_LINE_PX) as i32;
                root.draw(&Text::new(line.as_str(), (px, y), style.clone()))
                    .map_err(draw_err)?;
            }
        }

        root.present().map_err(draw_err)
    }
}

fn configure_primary(chart: &mut Chart<'_, '_>, plot: &Plot<'_>) -> Result<(), RenderError> {
    let color = if plot.secondary.is_some() { DARK } else { BLACK };
    chart
        .configure_mesh()
        .disable_x_mesh()
        .bold_line_style(GRID.mix(0.25))
        .light_line_style(WHITE)
        .y_labels(8)
        .x_label_formatter(&|_| String::new())
        .y_label_formatter(&|v| abbreviate(*v))
        .x_desc(plot.x_label)
        .y_desc(plot.primary.name)
        .label_style(regular(15).color(&color))
        .axis_desc_style(bold(18).color(&color))
        .draw()
        .map_err(draw_err)
}

/// Pixel position under each category slot, on the bottom edge of the plot.
fn category_anchors(chart: &Chart<'_, '_>, n: usize, y_bottom: f64) -> Vec<(i32, i32)> {
    (0..n).map(|i| chart.backend_coord(&(i as f64, y_bottom))).collect()
}

fn wrapped_labels(categories: &[String], step: usize) -> Vec<Option<Vec<String>>> {
    categories
        .iter()
        .enumerate()
        .map(|(i, label)| {
            (i % step == 0).then(|| wrap_text(label, LABEL_WRAP))
        })
        .collect()
}

fn bars(values: &[Option<f64>], alpha: f64) -> impl Iterator<Item = Rectangle<(f64, f64)>> + '_ {
    let n = values.len();
    values.iter().enumerate().filter_map(move |(i, value)| {
        value.map(|v| {
            let x = i as f64;
            Rectangle::new(
                [(x - BAR_HALF_WIDTH, 0.0), (x + BAR_HALF_WIDTH, v)],
                viridis(i, n).mix(alpha).filled(),
            )
        })
    })
}

fn bar_outlines(values: &[Option<f64>]) -> impl Iterator<Item = Rectangle<(f64, f64)>> + '_ {
    values.iter().enumerate().filter_map(|(i, value)| {
        value.map(|v| {
            let x = i as f64;
            Rectangle::new(
                [(x - BAR_HALF_WIDTH, 0.0), (x + BAR_HALF_WIDTH, v)],
                BLACK.stroke_width(1),
            )
        })
    })
}

fn points(values: &[Option<f64>]) -> Vec<(f64, f64)> {
    values
        .iter()
        .enumerate()
        .filter_map(|(i, value)| value.map(|v| (i as f64, v)))
        .collect()
}

/// Colour for slot `i` of `n`, spread evenly across the palette.
fn viridis(i: usize, n: usize) -> RGBColor {
    if n <= 1 {
        return VIRIDIS[0];
    }
    VIRIDIS[i * (VIRIDIS.len() - 1) / (n - 1)]
}

/// Padded y range. Bars always include zero so they grow from the baseline.
fn value_range(values: &[Option<f64>], include_zero: bool) -> Range<f64> {
    let (mut lo, mut hi) = values
        .iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() || !hi.is_finite() {
        return 0.0..1.0;
    }
    if include_zero {
        lo = lo.min(0.0);
        hi = hi.max(0.0);
    }

    let span = hi - lo;
    let pad = if span > 0.0 { span * 0.08 } else { hi.abs().max(1.0) * 0.1 };
    let start = if include_zero && lo == 0.0 { 0.0 } else { lo - pad };
    let end = if include_zero && hi == 0.0 && start < 0.0 { 0.0 } else { hi + pad };
    start..end
}

fn regular(size: u32) -> FontDesc<'static> {
    (FAMILY, f64::from(size)).into_font()
}

fn bold(size: u32) -> FontDesc<'static> {
    (FAMILY, f64::from(size)).into_font().style(FontStyle::Bold)
}
