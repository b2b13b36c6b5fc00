//! Dynamic Library Service
//!
//! The slot table never touches the platform loader directly. It talks to a
//! [`LibraryService`], which hands out two kinds of capability tokens:
//! a [`ModuleHandle`] that owns an open module, and an [`EntryPoint`] that can
//! be invoked but never copied out of the table that holds it.

use super::error::LibraryError;
use libloading::Library;
use std::ffi::c_void;
use std::path::Path;
use tracing::debug;

#[cfg(unix)]
use libloading::os::unix::Library as PlatformLibrary;
#[cfg(windows)]
use libloading::os::windows::Library as PlatformLibrary;

/// Symbol every plugin must export as `extern "C" fn()`
pub const ENTRY_SYMBOL: &str = "func";

/// Data symbol every plugin must export as a NUL-terminated string
pub const NAME_SYMBOL: &str = "plugin_name";

/// Ownership token for an open module
pub trait ModuleHandle {
    /// Identity of the module, for display only
    fn address(&self) -> usize;
}

/// Callable capability resolved from a module
pub trait EntryPoint {
    /// Identity of the callable, for display only
    fn address(&self) -> usize;

    /// Call into the plugin on the current thread
    fn invoke(&self);
}

/// A failed close hands the handle back so its owner keeps the only reference
#[derive(Debug)]
pub struct CloseFailure<H> {
    pub handle: H,
    pub error: LibraryError,
}

/// Open, resolve and close shared modules
pub trait LibraryService {
    type Handle: ModuleHandle;
    type Entry: EntryPoint;

    /// Open the module at `path`
    ///
    /// # Errors
    /// Returns [`LibraryError::Open`] when the platform loader rejects the file
    fn open(&mut self, path: &Path) -> Result<Self::Handle, LibraryError>;

    /// Resolve a zero-argument callable
    ///
    /// # Errors
    /// Returns [`LibraryError::Symbol`] when the symbol is missing or null
    fn resolve_entry(
        &mut self,
        handle: &Self::Handle,
        symbol: &'static str,
    ) -> Result<Self::Entry, LibraryError>;

    /// Resolve a data symbol holding text, reading at most `max_len` bytes
    ///
    /// # Errors
    /// Returns [`LibraryError::Symbol`] when the symbol is missing or null
    fn resolve_text(
        &mut self,
        handle: &Self::Handle,
        symbol: &'static str,
        max_len: usize,
    ) -> Result<Vec<u8>, LibraryError>;

    /// Release a module
    ///
    /// # Errors
    /// Returns the still-open handle together with the platform error
    fn close(&mut self, handle: Self::Handle) -> Result<(), CloseFailure<Self::Handle>>;
}

/// Platform loader backed by `libloading`
#[derive(Debug, Default)]
pub struct NativeLibraries;

/// A module opened through [`NativeLibraries`]
#[derive(Debug)]
pub struct NativeModule {
    library: Library,
    address: usize,
}

impl ModuleHandle for NativeModule {
    fn address(&self) -> usize {
        self.address
    }
}

/// The resolved `func` of a native module
#[derive(Debug)]
pub struct NativeEntry {
    func: unsafe extern "C" fn(),
}

impl EntryPoint for NativeEntry {
    fn address(&self) -> usize {
        self.func as usize
    }

    fn invoke(&self) {
        // Safety: the plugin contract requires `func` to be a zero-argument,
        // no-return C function. A NativeEntry only lives inside the slot that
        // also owns its module, so the code it points at is still mapped.
        unsafe { (self.func)() }
    }
}

impl NativeLibraries {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn symbol_address(
        module: &NativeModule,
        symbol: &'static str,
    ) -> Result<*const c_void, LibraryError> {
        // Safety: the symbol is read as a bare address; nothing is called or
        // dereferenced here.
        let address = unsafe {
            module
                .library
                .get::<*const c_void>(symbol.as_bytes())
                .map(|sym| *sym)
                .map_err(|e| LibraryError::Symbol {
                    symbol,
                    diagnostic: e.to_string(),
                })?
        };

        if address.is_null() {
            return Err(LibraryError::Symbol {
                symbol,
                diagnostic: "symbol resolved to a null address".to_string(),
            });
        }

        Ok(address)
    }
}

impl LibraryService for NativeLibraries {
    type Handle = NativeModule;
    type Entry = NativeEntry;

    fn open(&mut self, path: &Path) -> Result<NativeModule, LibraryError> {
        // Safety: loading a library runs its initialisers. Plugins are trusted
        // code by contract; there is no sandbox.
        let library = unsafe { Library::new(path) }.map_err(|e| LibraryError::Open {
            path: path.to_path_buf(),
            diagnostic: e.to_string(),
        })?;

        let raw = PlatformLibrary::from(library).into_raw();
        let address = raw as usize;
        // Safety: `raw` came from into_raw just above and is still open.
        let library = Library::from(unsafe { PlatformLibrary::from_raw(raw) });

        debug!("Opened module {} at {:#x}", path.display(), address);
        Ok(NativeModule { library, address })
    }

    fn resolve_entry(
        &mut self,
        handle: &NativeModule,
        symbol: &'static str,
    ) -> Result<NativeEntry, LibraryError> {
        let address = Self::symbol_address(handle, symbol)?;
        // Safety: non-null code address exported under the entry symbol; the
        // plugin contract fixes its signature.
        let func = unsafe { std::mem::transmute::<*const c_void, unsafe extern "C" fn()>(address) };
        Ok(NativeEntry { func })
    }

    fn resolve_text(
        &mut self,
        handle: &NativeModule,
        symbol: &'static str,
        max_len: usize,
    ) -> Result<Vec<u8>, LibraryError> {
        let address = Self::symbol_address(handle, symbol)?.cast::<u8>();
        // Safety: the plugin contract makes this a NUL-terminated string in
        // the module's data segment; we never read past `max_len` bytes.
        Ok(unsafe { read_bounded(address, max_len) })
    }

    fn close(&mut self, handle: NativeModule) -> Result<(), CloseFailure<NativeModule>> {
        let NativeModule { library, address } = handle;
        let raw = PlatformLibrary::from(library).into_raw();
        // Safety: `raw` is the handle we just released from the wrapper.
        let library = Library::from(unsafe { PlatformLibrary::from_raw(raw) });

        match library.close() {
            Ok(()) => {
                debug!("Closed module at {:#x}", address);
                Ok(())
            }
            Err(e) => {
                // close() forgets the wrapper on failure; the module itself is
                // still open, so take ownership of it again.
                let library = Library::from(unsafe { PlatformLibrary::from_raw(raw) });
                Err(CloseFailure {
                    handle: NativeModule { library, address },
                    error: LibraryError::Close(e.to_string()),
                })
            }
        }
    }
}

/// Copy bytes from `ptr` until a NUL or `max_len`, whichever comes first
///
/// # Safety
/// `ptr` must be valid for reads up to the first NUL byte or `max_len` bytes.
unsafe fn read_bounded(ptr: *const u8, max_len: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(max_len);
    for offset in 0..max_len {
        let byte = *ptr.add(offset);
        if byte == 0 {
            break;
        }
        bytes.push(byte);
    }
    bytes
}
