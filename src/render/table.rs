//! Result sets drawn as a table image.
//!
//! Cell text is wrapped before layout, so row heights come from the real
//! wrapped line count and multi-line cells never overlap the next row.

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::FontStyle;

use super::fonts::{self, FAMILY};
use super::{draw_err, rasterize, PngImage, RenderError};
use crate::query::{ColumnType, QueryResult, Value};
use crate::util::format::{format_grouped, wrap_text, PT_BR};

const WRAP_CHARS: usize = 35;
const COLUMN_PX: u32 = 400;
const MIN_WIDTH: u32 = 800;
const MAX_WIDTH: u32 = 2200;
/// Rows beyond this height are left out and counted in a footer line.
const MAX_HEIGHT: u32 = 12_000;

const MARGIN: u32 = 20;
const TITLE_PX: u32 = 56;
const LINE_PX: u32 = 22;
const CELL_PAD: u32 = 8;
const FOOTER_PX: u32 = 36;

const HEADER_BG: RGBColor = RGBColor(44, 62, 80);
const ZEBRA_BG: RGBColor = RGBColor(253, 253, 253);
const SEPARATOR: RGBColor = RGBColor(238, 238, 238);
const TITLE_COLOR: RGBColor = RGBColor(51, 51, 51);

#[derive(Debug, Clone, Copy, Default)]
pub struct TableRenderer;

/// Cells as wrapped lines, ready for layout.
struct Layout {
    header: Vec<Vec<String>>,
    rows: Vec<Vec<Vec<String>>>,
    column_widths: Vec<u32>,
    width: u32,
    omitted: usize,
}

impl Layout {
    fn row_height(cells: &[Vec<String>]) -> u32 {
        let lines = cells.iter().map(Vec::len).max().unwrap_or(1).max(1) as u32;
        lines * LINE_PX + 2 * CELL_PAD
    }

    fn height(&self) -> u32 {
        let body: u32 = self.rows.iter().map(|r| Self::row_height(r)).sum();
        let footer = if self.omitted > 0 { FOOTER_PX } else { 0 };
        2 * MARGIN + TITLE_PX + Self::row_height(&self.header) + body + footer
    }
}

fn cell_text(value: &Value, kind: ColumnType) -> String {
    match (kind, value) {
        (_, Value::Null) => String::new(),
        (ColumnType::Float, v) => v
            .as_f64()
            .map(|f| format_grouped(f, 2, PT_BR))
            .unwrap_or_else(|| v.to_string()),
        (_, v) => v.to_string(),
    }
}

/// Only text columns wrap; numbers and dates stay on one line.
fn cell_lines(value: &Value, kind: ColumnType) -> Vec<String> {
    let text = cell_text(value, kind);
    match kind {
        ColumnType::Text => wrap_cell(&text),
        _ => vec![text],
    }
}

fn wrap_cell(text: &str) -> Vec<String> {
    let lines = wrap_text(text, WRAP_CHARS);
    if lines.is_empty() { vec![String::new()] } else { lines }
}

impl TableRenderer {
    pub fn render_table(&self, rows: &QueryResult, title: &str) -> Result<PngImage, RenderError> {
        if rows.columns().is_empty() {
            return Err(RenderError::Empty("the result has no columns"));
        }
        let layout = layout(rows);
        let height = layout.height();

        fonts::ensure_registered()?;
        rasterize(layout.width, height, |buf| draw(buf, &layout, height, title))
    }
}

fn layout(rows: &QueryResult) -> Layout {
    let columns = rows.columns();
    let header: Vec<Vec<String>> = columns.iter().map(|c| wrap_cell(&c.name)).collect();

    let mut wrapped = Vec::with_capacity(rows.len());
    let mut used = 2 * MARGIN + TITLE_PX + Layout::row_height(&header) + FOOTER_PX;
    for row in rows.rows() {
        let cells: Vec<Vec<String>> = row
            .iter()
            .zip(columns)
            .map(|(value, column)| cell_lines(value, column.kind))
            .collect();
        let h = Layout::row_height(&cells);
        if used + h > MAX_HEIGHT {
            break;
        }
        used += h;
        wrapped.push(cells);
    }
    let omitted = rows.len() - wrapped.len();

    let width = (columns.len() as u32 * COLUMN_PX).clamp(MIN_WIDTH, MAX_WIDTH);

    // Share the width by the longest line of each column.
    let weights: Vec<u32> = (0..columns.len())
        .map(|c| {
            std::iter::once(&header[c])
                .chain(wrapped.iter().map(|r| &r[c]))
                .flatten()
                .map(|line| line.chars().count() as u32)
                .max()
                .unwrap_or(0)
                .max(6)
        })
        .collect();
    let total: u32 = weights.iter().sum();
    let inner = width - 2 * MARGIN;
    let column_widths = weights.iter().map(|w| inner * w / total).collect();

    Layout {
        header,
        rows: wrapped,
        column_widths,
        width,
        omitted,
    }
}

fn draw(buf: &mut [u8], layout: &Layout, height: u32, title: &str) -> Result<(), RenderError> {
    let root = BitMapBackend::with_buffer(buf, (layout.width, height)).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    let center = (layout.width / 2) as i32;
    let title_style = (FAMILY, 24.0)
        .into_font()
        .style(FontStyle::Bold)
        .color(&TITLE_COLOR)
        .pos(Pos::new(HPos::Center, VPos::Center));
    root.draw(&Text::new(title, (center, (MARGIN + TITLE_PX / 2) as i32), title_style))
        .map_err(draw_err)?;

    let header_style = (FAMILY, 16.0).into_font().style(FontStyle::Bold).color(&WHITE);
    let body_style = (FAMILY, 15.0).into_font().color(&BLACK);

    let mut y = MARGIN + TITLE_PX;
    let header_h = Layout::row_height(&layout.header);
    draw_band(&root, layout, y, header_h, HEADER_BG)?;
    draw_cells(&root, layout, &layout.header, y, &header_style, true)?;
    y += header_h;

    for (i, cells) in layout.rows.iter().enumerate() {
        let h = Layout::row_height(cells);
        draw_band(&root, layout, y, h, if i % 2 == 1 { ZEBRA_BG } else { WHITE })?;
        draw_cells(&root, layout, cells, y, &body_style, false)?;
        y += h;
        root.draw(&PathElement::new(
            vec![(MARGIN as i32, y as i32 - 1), ((layout.width - MARGIN) as i32, y as i32 - 1)],
            SEPARATOR,
        ))
        .map_err(draw_err)?;
    }

    if layout.omitted > 0 {
        let note = format!("... mais {} linhas", layout.omitted);
        let style = (FAMILY, 14.0).into_font().color(&TITLE_COLOR);
        root.draw(&Text::new(note, ((MARGIN + CELL_PAD) as i32, (y + CELL_PAD) as i32), style))
            .map_err(draw_err)?;
    }

    root.present().map_err(draw_err)
}

fn draw_band(
    root: &DrawingArea<BitMapBackend<'_>, Shift>,
    layout: &Layout,
    y: u32,
    h: u32,
    color: RGBColor,
) -> Result<(), RenderError> {
    root.draw(&Rectangle::new(
        [(MARGIN as i32, y as i32), ((layout.width - MARGIN) as i32, (y + h) as i32)],
        color.filled(),
    ))
    .map_err(draw_err)
}

fn draw_cells(
    root: &DrawingArea<BitMapBackend<'_>, Shift>,
    layout: &Layout,
    cells: &[Vec<String>],
    y: u32,
    style: &TextStyle<'_>,
    centered: bool,
) -> Result<(), RenderError> {
    let mut x = MARGIN;
    for (lines, &w) in cells.iter().zip(&layout.column_widths) {
        let (anchor_x, pos) = if centered {
            (x + w / 2, Pos::new(HPos::Center, VPos::Top))
        } else {
            (x + CELL_PAD, Pos::new(HPos::Left, VPos::Top))
        };
        for (k, line) in lines.iter().enumerate() {
            let top = y + CELL_PAD + k as u32 * LINE_PX;
            root.draw(&Text::new(line.as_str(), (anchor_x as i32, top as i32), style.pos(pos)))
                .map_err(draw_err)?;
        }
        x += w;
    }
    Ok(())
}
