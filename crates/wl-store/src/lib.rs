pub mod config;
pub mod error;
pub mod record;
pub mod rotation;
pub mod store;

pub use config::{load_settings, load_settings_or_default, parse_settings};
pub use error::{Result, StoreError};
pub use record::{FORMAT_VERSION, Record};
pub use rotation::RotatingFile;
pub use store::{StateStore, StoreStats, default_base_dir};
