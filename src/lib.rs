//! haze: nearby air-quality readings from OpenAQ, reduced to the latest
//! value per pollutant, cached in SQLite and densified into heatmap points.
//!
//! The binary wraps this library in a terminal dashboard, a small JSON
//! endpoint and a one-shot fetch command.

pub mod api;
pub mod app;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod interpolate;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod reduce;
pub mod server;
pub mod ui;
