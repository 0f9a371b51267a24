use plotters::style::{register_font, FontStyle};
use rust_embed::RustEmbed;
use std::borrow::Cow;
use std::sync::OnceLock;

use super::RenderError;

/// Family name every renderer asks plotters for.
pub const FAMILY: &str = "sans-serif";

#[derive(RustEmbed)]
#[folder = "assets/fonts/"]
struct FontAssets;

static REGISTERED: OnceLock<Result<(), String>> = OnceLock::new();

/// Registers the embedded DejaVu faces with plotters. Runs once per process.
pub fn ensure_registered() -> Result<(), RenderError> {
    REGISTERED
        .get_or_init(register_all)
        .clone()
        .map_err(RenderError::Font)
}

fn register_all() -> Result<(), String> {
    for (file, style) in [
        ("DejaVuSans.ttf", FontStyle::Normal),
        ("DejaVuSans-Bold.ttf", FontStyle::Bold),
    ] {
        let asset = FontAssets::get(file).ok_or_else(|| format!("embedded font {} is missing", file))?;
        let bytes: &'static [u8] = match asset.data {
            Cow::Borrowed(bytes) => bytes,
            Cow::Owned(bytes) => Box::leak(bytes.into_boxed_slice()),
        };
        register_font(FAMILY, style, bytes).map_err(|_| format!("embedded font {} is not a valid font", file))?;
    }
    Ok(())
}
