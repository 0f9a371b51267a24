//! Rasterisation of query results: charts, tables and the axis ordering
//! applied before charting.
//!
//! Every renderer draws into an owned RGB buffer and hands back PNG bytes.
//! Drawing runs under `catch_unwind` so a rasteriser panic becomes a
//! [`RenderError`] and the buffer is dropped on every exit path.

pub mod axis;
pub mod chart;
pub mod fonts;
pub mod table;

pub use chart::{ChartRenderer, ChartType};
pub use table::TableRenderer;

use bytes::Bytes;
use std::io::Cursor;
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("column(s) not found: {missing} (available: {available})")]
    MissingColumn { missing: String, available: String },

    #[error("column '{0}' has no numeric values to plot")]
    NonNumeric(String),

    #[error("combo chart requires a second y axis")]
    MissingSecondAxis,

    #[error("nothing to draw: {0}")]
    Empty(&'static str),

    #[error("drawing failed: {0}")]
    Draw(String),

    #[error("PNG encoding failed: {0}")]
    Encode(String),

    #[error("font setup failed: {0}")]
    Font(String),

    #[error("renderer panicked: {0}")]
    Panicked(String),
}

impl RenderError {
    pub(crate) fn missing_columns(missing: &[&str], available: &[&str]) -> Self {
        RenderError::MissingColumn {
            missing: missing.join(", "),
            available: available.join(", "),
        }
    }
}

pub(crate) fn draw_err<E: std::fmt::Display>(e: E) -> RenderError {
    RenderError::Draw(e.to_string())
}

/// An encoded PNG. Cloning shares the bytes; each [`PngImage::reader`]
/// starts at offset zero, so display and export can read independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PngImage {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
}

impl PngImage {
    pub fn reader(&self) -> Cursor<Bytes> {
        Cursor::new(self.bytes.clone())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Allocates a white canvas, runs `draw` on it and encodes the result.
pub(crate) fn rasterize<F>(width: u32, height: u32, draw: F) -> Result<PngImage, RenderError>
where
    F: FnOnce(&mut [u8]) -> Result<(), RenderError>,
{
    let mut pixels = vec![255u8; width as usize * height as usize * 3];

    match catch_unwind(AssertUnwindSafe(|| draw(&mut pixels))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e),
        Err(payload) => return Err(RenderError::Panicked(panic_message(payload.as_ref()))),
    }

    encode_png(pixels, width, height)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn encode_png(pixels: Vec<u8>, width: u32, height: u32) -> Result<PngImage, RenderError> {
    let image = image::RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| RenderError::Encode("pixel buffer does not match image size".to_string()))?;

    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .map_err(|e| RenderError::Encode(e.to_string()))?;

    Ok(PngImage {
        bytes: Bytes::from(out.into_inner()),
        width,
        height,
    })
}
