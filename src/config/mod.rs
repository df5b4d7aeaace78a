//! Node configuration
//!
//! Settings come from an optional TOML file, fall back to defaults and can be
//! overridden from the environment. The resulting [`Config`] is a plain value
//! handed to whoever needs it.

pub mod settings;

pub use settings::Config;
