pub mod config;
pub mod errors;
pub mod types;

pub use config::{DedupStrategy, PacingConfig, SourceKind, ViewerConfig};
pub use errors::{CamlinkError, DeviceError};
pub use types::*;
