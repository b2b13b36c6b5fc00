//! Slotplug - a small runtime plugin host
//!
//! Shared libraries are loaded into a fixed number of slots, validated against
//! the plugin contract (an exported `extern "C" fn func()` and a
//! NUL-terminated `plugin_name`), invoked on demand and closed again.
//!
//! # Modules
//!
//! - [`plugins`]: slot table, load/unload/run protocols and the library service
//! - [`config`]: YAML configuration
//! - [`repl`]: command parsing and the interactive driver loop

pub mod config;
pub mod plugins;
pub mod repl;
