//! Turns stored dashboard views into rendered panels and PNG artifacts, and
//! ships those artifacts to a webhook in one batch.

pub mod config;
pub mod db;
pub mod export;
pub mod interpreter;
pub mod llm;
pub mod query;
pub mod render;
pub mod util;
pub mod view;
pub mod web;
