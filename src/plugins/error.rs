//! Typed errors for every slot operation.
//!
//! Each protocol (load, unload, run, inspect) gets its own enum so a caller
//! can only ever see the failures that protocol can actually produce.

use std::path::PathBuf;

/// Errors reported by the Dynamic Library Service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LibraryError {
    #[error("failed to open '{}': {diagnostic}", .path.display())]
    Open { path: PathBuf, diagnostic: String },
    #[error("symbol '{symbol}' not found: {diagnostic}")]
    Symbol {
        symbol: &'static str,
        diagnostic: String,
    },
    #[error("failed to close module: {0}")]
    Close(String),
}

impl LibraryError {
    /// Platform diagnostic without the operation prefix
    #[must_use]
    pub fn diagnostic(&self) -> &str {
        match self {
            Self::Open { diagnostic, .. } | Self::Symbol { diagnostic, .. } => diagnostic,
            Self::Close(diagnostic) => diagnostic,
        }
    }
}

/// Errors from the slot table accessors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("Invalid slot specified: {index} (table holds {capacity} slots)")]
    InvalidIndex { index: usize, capacity: usize },
    #[error("No free plugin slot available ({capacity} of {capacity} in use)")]
    TableFull { capacity: usize },
}

/// A slot field name other than `handles`, `pointers` or `names`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown slot field '{0}'")]
pub struct SlotFieldError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("Invalid slot specified: {index} (table holds {capacity} slots)")]
    InvalidIndex { index: usize, capacity: usize },
    #[error("Slot {0} already holds a plugin; unload it first")]
    SlotOccupied(usize),
    #[error("Failed loading '{}'! {diagnostic}", .path.display())]
    OpenFailed { path: PathBuf, diagnostic: String },
    #[error("Failed locating '{symbol}' in plugin! {diagnostic}")]
    SymbolNotFound {
        symbol: &'static str,
        diagnostic: String,
    },
    #[error("'{}' is already loaded in slot {owner}; a module can only occupy one slot", .path.display())]
    HandleShared { path: PathBuf, owner: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnloadError {
    #[error("Invalid slot specified: {index} (table holds {capacity} slots)")]
    InvalidIndex { index: usize, capacity: usize },
    #[error("Selected slot ({0}) doesn't appear to have a plugin loaded. Unload aborted.")]
    NotLoaded(usize),
    #[error("There was an error closing the shared object associated with {name}! {diagnostic}")]
    CloseFailed { name: String, diagnostic: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    #[error("Invalid slot specified: {index} (table holds {capacity} slots)")]
    InvalidIndex { index: usize, capacity: usize },
    #[error("No function available to run in slot {0}. Aborting.")]
    NoFunction(usize),
}
