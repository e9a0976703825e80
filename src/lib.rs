#![allow(clippy::uninlined_format_args)]

pub mod api;
pub mod app;
pub mod config;
pub mod controller;
pub mod data;
pub mod logging;
pub mod markdown;
pub mod models;
pub mod navigation;
pub mod privileges;
pub mod query;
pub mod routes;
pub mod settings;
pub mod ui;
pub mod view;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
