// src/config/mod.rs

//! Configuration loading and validation for devloop.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Merge it with the command line into [`Settings`] (`settings.rs`).
//! - Validate basic invariants like addresses and timings (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod settings;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{DEFAULT_CONFIG_FILE, load_config, load_from_path};
pub use model::ConfigFile;
pub use settings::Settings;
pub use validate::validate_settings;
