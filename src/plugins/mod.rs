// Plugin slot lifecycle:
// - Dynamic loading with libloading behind the LibraryService trait
// - Fixed-capacity slot table that owns every open module
// - Load/bind, unload and invoke protocols with typed errors
pub mod error;
pub mod library;
pub mod slot;
pub mod table;

pub use error::{LibraryError, LoadError, RunError, SlotError, SlotFieldError, UnloadError};
pub use library::{
    CloseFailure, EntryPoint, LibraryService, ModuleHandle, NativeLibraries, ENTRY_SYMBOL,
    NAME_SYMBOL,
};
pub use slot::{PluginName, PluginSlot, PLUGIN_NAME_LEN};
pub use table::{PluginSlotTable, SlotField, SlotValue, DEFAULT_CAPACITY};
