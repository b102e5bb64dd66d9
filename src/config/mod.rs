/// Database connection and schema management
pub mod database;

/// Course seed loading from config.toml
pub mod courses;

/// Environment-driven runtime settings
pub mod settings;

pub use settings::{PaymeSettings, ProductDefaults, Settings};
