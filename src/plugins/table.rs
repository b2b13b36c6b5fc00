use super::error::{LoadError, RunError, SlotError, SlotFieldError, UnloadError};
use super::library::{EntryPoint, LibraryService, ModuleHandle, ENTRY_SYMBOL, NAME_SYMBOL};
use super::slot::{BoundModule, PluginName, PluginSlot, PLUGIN_NAME_LEN};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Slot count used when none is configured
pub const DEFAULT_CAPACITY: usize = 4;

/// Which attribute of a slot to inspect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotField {
    /// Identity of the bound entry point
    Pointers,
    /// Identity of the module handle
    Handles,
    Names,
}

impl FromStr for SlotField {
    type Err = SlotFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pointers" => Ok(Self::Pointers),
            "handles" => Ok(Self::Handles),
            "names" => Ok(Self::Names),
            other => Err(SlotFieldError(other.to_string())),
        }
    }
}

/// Read-only view of one slot attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotValue {
    Empty,
    Entry(usize),
    Handle(usize),
    Name(PluginName),
}

impl fmt::Display for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "NULL  (No Plugin Loaded)"),
            Self::Entry(addr) => write!(f, "&func():  {addr:#x}"),
            Self::Handle(addr) => write!(f, "handle:  {addr:#x}"),
            Self::Name(name) => write!(f, "name:  {name}"),
        }
    }
}

/// Fixed-capacity registry of loaded plugins
///
/// The table exclusively owns every module handle and entry point it holds.
/// Entry points are never handed out; they can only be called through
/// [`PluginSlotTable::run`], which borrows the table, so a module cannot be
/// closed while one of its functions is executing.
pub struct PluginSlotTable<S: LibraryService> {
    service: S,
    slots: Box<[PluginSlot<S::Handle, S::Entry>]>,
    leak_on_overwrite: bool,
}

impl<S: LibraryService> PluginSlotTable<S> {
    /// Create a table of `capacity` empty slots
    ///
    /// Loading into an occupied slot overwrites it without closing the old
    /// module, unless changed with [`Self::with_leak_on_overwrite`].
    #[must_use]
    pub fn new(service: S, capacity: usize) -> Self {
        let slots = (0..capacity).map(|_| PluginSlot::empty()).collect();
        Self {
            service,
            slots,
            leak_on_overwrite: true,
        }
    }

    /// When `false`, loading into an occupied slot fails with
    /// [`LoadError::SlotOccupied`] instead of leaking the previous module
    #[must_use]
    pub fn with_leak_on_overwrite(mut self, leak: bool) -> Self {
        self.leak_on_overwrite = leak;
        self
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn leak_on_overwrite(&self) -> bool {
        self.leak_on_overwrite
    }

    #[must_use]
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Number of slots currently holding a module
    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_empty()).count()
    }

    /// # Errors
    /// Returns [`SlotError::InvalidIndex`] for an index outside the table
    pub fn slot(&self, index: usize) -> Result<&PluginSlot<S::Handle, S::Entry>, SlotError> {
        self.slots.get(index).ok_or(SlotError::InvalidIndex {
            index,
            capacity: self.capacity(),
        })
    }

    /// Whether the slot holds no module handle
    ///
    /// # Errors
    /// Returns [`SlotError::InvalidIndex`] for an index outside the table
    pub fn is_empty(&self, index: usize) -> Result<bool, SlotError> {
        self.slot(index).map(PluginSlot::is_empty)
    }

    /// Lowest-indexed empty slot
    ///
    /// # Errors
    /// Returns [`SlotError::TableFull`] when every slot is loaded
    pub fn first_free_slot(&self) -> Result<usize, SlotError> {
        self.slots
            .iter()
            .position(PluginSlot::is_empty)
            .ok_or(SlotError::TableFull {
                capacity: self.capacity(),
            })
    }

    /// # Errors
    /// Returns [`SlotError::InvalidIndex`] for an index outside the table
    pub fn describe(&self, index: usize, field: SlotField) -> Result<SlotValue, SlotError> {
        let slot = self.slot(index)?;
        let Some(handle) = slot.handle() else {
            return Ok(SlotValue::Empty);
        };

        Ok(match field {
            SlotField::Handles => SlotValue::Handle(handle.address()),
            SlotField::Pointers => slot
                .entry()
                .map_or(SlotValue::Empty, |entry| SlotValue::Entry(entry.address())),
            SlotField::Names => SlotValue::Name(*slot.name()),
        })
    }

    /// One entry per slot, in index order
    #[must_use]
    pub fn list_all(&self, field: SlotField) -> Vec<(usize, SlotValue)> {
        (0..self.capacity())
            .map(|index| {
                let value = self.describe(index, field).unwrap_or(SlotValue::Empty);
                (index, value)
            })
            .collect()
    }

    /// Open `path`, validate the plugin contract and bind it into `index`
    ///
    /// On any failure the slot is left exactly as it was and the module, if
    /// it was opened, is closed again.
    ///
    /// # Errors
    /// - [`LoadError::InvalidIndex`] for an index outside the table
    /// - [`LoadError::SlotOccupied`] when the slot is loaded and overwriting is disabled
    /// - [`LoadError::OpenFailed`] when the module cannot be opened
    /// - [`LoadError::SymbolNotFound`] when `func` or `plugin_name` is missing
    /// - [`LoadError::HandleShared`] when the loader returned a handle another slot already owns
    pub fn load(&mut self, path: impl AsRef<Path>, index: usize) -> Result<(), LoadError> {
        let path = path.as_ref();
        let capacity = self.capacity();
        if index >= capacity {
            return Err(LoadError::InvalidIndex { index, capacity });
        }
        if !self.leak_on_overwrite && !self.slots[index].is_empty() {
            return Err(LoadError::SlotOccupied(index));
        }

        let handle = self
            .service
            .open(path)
            .map_err(|e| LoadError::OpenFailed {
                path: path.to_path_buf(),
                diagnostic: e.diagnostic().to_string(),
            })?;

        let entry = match self.service.resolve_entry(&handle, ENTRY_SYMBOL) {
            Ok(entry) => entry,
            Err(e) => {
                self.discard(handle);
                return Err(LoadError::SymbolNotFound {
                    symbol: ENTRY_SYMBOL,
                    diagnostic: e.diagnostic().to_string(),
                });
            }
        };

        let raw_name = match self
            .service
            .resolve_text(&handle, NAME_SYMBOL, PLUGIN_NAME_LEN)
        {
            Ok(bytes) => bytes,
            Err(e) => {
                drop(entry);
                self.discard(handle);
                return Err(LoadError::SymbolNotFound {
                    symbol: NAME_SYMBOL,
                    diagnostic: e.diagnostic().to_string(),
                });
            }
        };

        // Platform loaders refcount repeated opens of one file and hand back
        // the same handle; a handle belongs to exactly one slot.
        let address = handle.address();
        let owner = self
            .slots
            .iter()
            .enumerate()
            .find(|(other, slot)| {
                *other != index && slot.handle().is_some_and(|h| h.address() == address)
            })
            .map(|(other, _)| other);
        if let Some(owner) = owner {
            drop(entry);
            self.discard(handle);
            return Err(LoadError::HandleShared {
                path: path.to_path_buf(),
                owner,
            });
        }

        let name = PluginName::from_bytes(&raw_name);
        if let Some(previous) = self.slots[index].bind(handle, entry, name) {
            warn!(
                "Slot {} was overwritten while loaded; its previous module is left open",
                index
            );
            previous.leak();
        }

        info!("Loaded plugin '{}' from {} into slot {}", name, path.display(), index);
        Ok(())
    }

    /// Close the module in `index` and reset the slot
    ///
    /// A slot counts as loaded when it has an entry point.
    ///
    /// # Errors
    /// - [`UnloadError::InvalidIndex`] for an index outside the table
    /// - [`UnloadError::NotLoaded`] when the slot has no entry point
    /// - [`UnloadError::CloseFailed`] when the platform refuses to close; the slot is kept
    pub fn unload(&mut self, index: usize) -> Result<(), UnloadError> {
        let capacity = self.capacity();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(UnloadError::InvalidIndex { index, capacity })?;

        if slot.entry().is_none() {
            return Err(UnloadError::NotLoaded(index));
        }
        let Some(module) = slot.take_module() else {
            return Err(UnloadError::NotLoaded(index));
        };

        let entry = module.entry;
        match self.service.close(module.handle) {
            Ok(()) => {
                drop(entry);
                info!("Unloaded plugin '{}' from slot {}", slot.name(), index);
                slot.clear();
                Ok(())
            }
            Err(failure) => {
                warn!("Closing slot {} failed: {}", index, failure.error);
                let diagnostic = failure.error.diagnostic().to_string();
                slot.restore(BoundModule {
                    handle: failure.handle,
                    entry,
                });
                Err(UnloadError::CloseFailed {
                    name: slot.name().to_string(),
                    diagnostic,
                })
            }
        }
    }

    /// Unload every loaded slot in index order, collecting failures
    pub fn unload_all(&mut self) -> Vec<(usize, UnloadError)> {
        let mut failures = Vec::new();
        for index in 0..self.capacity() {
            if self.slots[index].entry().is_none() {
                continue;
            }
            if let Err(e) = self.unload(index) {
                failures.push((index, e));
            }
        }
        failures
    }

    /// Call the entry point bound in `index`
    ///
    /// The plugin runs on the calling thread; a fault inside it is a fault of
    /// the host.
    ///
    /// # Errors
    /// - [`RunError::InvalidIndex`] for an index outside the table
    /// - [`RunError::NoFunction`] when the slot has no entry point
    pub fn run(&self, index: usize) -> Result<(), RunError> {
        let slot = self.slots.get(index).ok_or(RunError::InvalidIndex {
            index,
            capacity: self.capacity(),
        })?;
        let entry = slot.entry().ok_or(RunError::NoFunction(index))?;

        debug!("Invoking '{}' in slot {} at {:#x}", slot.name(), index, entry.address());
        entry.invoke();
        Ok(())
    }

    /// Close a module that never made it into a slot
    fn discard(&mut self, handle: S::Handle) {
        if let Err(failure) = self.service.close(handle) {
            warn!("Failed to close partially loaded module: {}", failure.error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::error::LibraryError;
    use crate::plugins::library::CloseFailure;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Handle(usize);
    struct Entry(usize, Rc<Cell<u32>>);

    impl ModuleHandle for Handle {
        fn address(&self) -> usize {
            self.0
        }
    }

    impl EntryPoint for Entry {
        fn address(&self) -> usize {
            self.0
        }
        fn invoke(&self) {
            self.1.set(self.1.get() + 1);
        }
    }

    /// Every path opens; "noname" lacks plugin_name
    #[derive(Default)]
    struct Fake {
        next: usize,
        calls: Rc<Cell<u32>>,
    }

    impl LibraryService for Fake {
        type Handle = Handle;
        type Entry = Entry;

        fn open(&mut self, path: &Path) -> Result<Handle, LibraryError> {
            self.next += 1;
            let id = self.next * 0x1000 + path.as_os_str().len();
            Ok(Handle(id))
        }

        fn resolve_entry(&mut self, handle: &Handle, _: &'static str) -> Result<Entry, LibraryError> {
            Ok(Entry(handle.0 + 1, Rc::clone(&self.calls)))
        }

        fn resolve_text(
            &mut self,
            handle: &Handle,
            symbol: &'static str,
            _: usize,
        ) -> Result<Vec<u8>, LibraryError> {
            if handle.0 % 0x1000 == "noname".len() {
                return Err(LibraryError::Symbol {
                    symbol,
                    diagnostic: "missing".to_string(),
                });
            }
            Ok(b"Fake".to_vec())
        }

        fn close(&mut self, _: Handle) -> Result<(), CloseFailure<Handle>> {
            Ok(())
        }
    }

    #[test]
    fn test_new_table_is_empty() {
        let table = PluginSlotTable::new(Fake::default(), DEFAULT_CAPACITY);
        assert_eq!(table.capacity(), 4);
        assert_eq!(table.loaded_count(), 0);
        assert!(table.leak_on_overwrite());
        for i in 0..4 {
            assert_eq!(table.is_empty(i), Ok(true));
        }
    }

    #[test]
    fn test_emptiness_follows_the_slot() {
        let mut table = PluginSlotTable::new(Fake::default(), 3);
        table.load("a.so", 0).unwrap();
        table.load("b.so", 2).unwrap();

        for i in 0..3 {
            assert_eq!(table.is_empty(i), Ok(table.slot(i).unwrap().is_empty()));
        }
        assert_eq!(table.first_free_slot(), Ok(1));
    }

    #[test]
    fn test_describe_loaded_slot() {
        let mut table = PluginSlotTable::new(Fake::default(), 2);
        table.load("a.so", 1).unwrap();

        assert_eq!(table.describe(0, SlotField::Names), Ok(SlotValue::Empty));
        assert_eq!(
            table.describe(1, SlotField::Names),
            Ok(SlotValue::Name(PluginName::from_bytes(b"Fake")))
        );
        let Ok(SlotValue::Handle(h)) = table.describe(1, SlotField::Handles) else {
            panic!("expected handle");
        };
        assert_eq!(table.describe(1, SlotField::Pointers), Ok(SlotValue::Entry(h + 1)));
    }

    #[test]
    fn test_run_counts_invocations() {
        let fake = Fake::default();
        let calls = Rc::clone(&fake.calls);
        let mut table = PluginSlotTable::new(fake, 1);
        table.load("a.so", 0).unwrap();
        table.run(0).unwrap();
        table.run(0).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_missing_name_leaves_slot_empty() {
        let mut table = PluginSlotTable::new(Fake::default(), 1);
        let err = table.load("noname", 0).unwrap_err();
        assert!(matches!(err, LoadError::SymbolNotFound { symbol: "plugin_name", .. }));
        assert_eq!(table.is_empty(0), Ok(true));
    }

    #[test]
    fn test_strict_overwrite_refuses_occupied_slot() {
        let mut table = PluginSlotTable::new(Fake::default(), 1).with_leak_on_overwrite(false);
        table.load("a.so", 0).unwrap();
        assert_eq!(table.load("b.so", 0), Err(LoadError::SlotOccupied(0)));
    }

    #[test]
    fn test_slot_value_display() {
        assert_eq!(SlotValue::Empty.to_string(), "NULL  (No Plugin Loaded)");
        assert_eq!(SlotValue::Handle(0x10).to_string(), "handle:  0x10");
        assert_eq!(SlotValue::Entry(0xff).to_string(), "&func():  0xff");
        assert_eq!(
            SlotValue::Name(PluginName::from_bytes(b"PluginA")).to_string(),
            "name:  PluginA"
        );
    }

    #[test]
    fn test_slot_field_from_str() {
        assert_eq!("names".parse::<SlotField>(), Ok(SlotField::Names));
        assert_eq!("handles".parse::<SlotField>(), Ok(SlotField::Handles));
        assert_eq!("pointers".parse::<SlotField>(), Ok(SlotField::Pointers));
        assert_eq!(
            "bogus".parse::<SlotField>(),
            Err(SlotFieldError("bogus".to_string()))
        );
    }
}
