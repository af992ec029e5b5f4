// page-watch daemon
//
// Wires the change-detection engine to Telegram (notifications and operator
// commands), the environment, and an optional git mirror of the data
// directory.

pub mod app;
pub mod bot;
pub mod config;
pub mod exporter;
pub mod notifier;

pub use app::App;
pub use config::*;
