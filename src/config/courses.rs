//! Course seed loading from config.toml
//!
//! Courses listed in the seed file are inserted on start-up when no course
//! with the same name exists yet. The file is optional; deployments that sell
//! a single product rely on the `PAYME_AMOUNT` defaults instead.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the entire seed file
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Courses to seed
    #[serde(default)]
    pub courses: Vec<CourseConfig>,
}

/// Configuration for a single course
#[derive(Debug, Deserialize, Clone)]
pub struct CourseConfig {
    /// Display name, used as the seed identity
    pub name: String,
    /// Price in minor currency units
    pub price: i64,
    /// Private channel granted on payment
    pub channel_id: i64,
    /// Public channel link
    #[serde(default)]
    pub channel_url: Option<String>,
    /// Long description
    #[serde(default)]
    pub description: Option<String>,
    /// Make this the active course after seeding
    #[serde(default)]
    pub active: bool,
}

/// Loads course configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - Required fields are missing
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read course config: {e}"),
    })?;

    parse_config(&contents)
}

/// Loads the seed file if it exists, returning an empty config otherwise.
pub fn load_optional_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    if path.as_ref().exists() {
        load_config(path)
    } else {
        tracing::info!(path = %path.as_ref().display(), "No course seed file, skipping");
        Ok(Config::default())
    }
}

fn parse_config(contents: &str) -> Result<Config> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse course config: {e}"),
    })
}
