//! Recipe configuration
//!
//! Three layers are merged, later layers winning:
//! 1. Built-in defaults
//! 2. Recipe file (TOML)
//! 3. CLI flags

mod bundle;
mod defaults;
mod effective;
mod merge;

pub use bundle::{
    AppImageSection, AppInfo, BuildSection, BundleConfig, CarrierSection, PayloadSection,
    SigningSection, ToolsSection,
};
pub use defaults::{BuiltinDefaults, DEFAULT_CARRIER_URL_BASE};
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers};
