use std::borrow::Cow;
use std::fmt;

/// Size of the fixed name buffer kept in every slot
///
/// A plugin's name is copied with bounded-copy semantics: at most
/// `PLUGIN_NAME_LEN` bytes, zero padded. A name that fills the whole buffer
/// has no terminating NUL.
pub const PLUGIN_NAME_LEN: usize = 16;

/// Display name of a loaded plugin, stored inline
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PluginName {
    bytes: [u8; PLUGIN_NAME_LEN],
}

impl PluginName {
    /// Copy `source` up to its first NUL or the buffer bound
    #[must_use]
    pub fn from_bytes(source: &[u8]) -> Self {
        let mut bytes = [0u8; PLUGIN_NAME_LEN];
        for (dst, &src) in bytes.iter_mut().zip(source) {
            if src == 0 {
                break;
            }
            *dst = src;
        }
        Self { bytes }
    }

    /// The whole buffer, padding included
    #[must_use]
    pub fn raw(&self) -> &[u8; PLUGIN_NAME_LEN] {
        &self.bytes
    }

    /// Bytes of the name, up to the first NUL or the end of the buffer
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        let end = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(PLUGIN_NAME_LEN);
        &self.bytes[..end]
    }

    /// Whether the buffer contains a NUL terminator
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.bytes.contains(&0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes[0] == 0
    }

    #[must_use]
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

impl fmt::Display for PluginName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for PluginName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PluginName({:?})", self.to_string_lossy())
    }
}

/// Handle and entry point of a bound module; they exist together or not at all
#[derive(Debug)]
pub(crate) struct BoundModule<H, E> {
    pub(crate) handle: H,
    pub(crate) entry: E,
}

impl<H, E> BoundModule<H, E> {
    /// Drop the record without releasing the module
    pub(crate) fn leak(self) {
        drop(self.entry);
        std::mem::forget(self.handle);
    }
}

/// One fixed-index record of the slot table
#[derive(Debug)]
pub struct PluginSlot<H, E> {
    name: PluginName,
    module: Option<BoundModule<H, E>>,
}

impl<H, E> PluginSlot<H, E> {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            name: PluginName::default(),
            module: None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handle().is_none()
    }

    #[must_use]
    pub fn name(&self) -> &PluginName {
        &self.name
    }

    #[must_use]
    pub fn handle(&self) -> Option<&H> {
        self.module.as_ref().map(|m| &m.handle)
    }

    #[must_use]
    pub fn entry(&self) -> Option<&E> {
        self.module.as_ref().map(|m| &m.entry)
    }

    /// Write all three fields at once, returning whatever was bound before
    pub(crate) fn bind(&mut self, handle: H, entry: E, name: PluginName) -> Option<BoundModule<H, E>> {
        self.name = name;
        self.module.replace(BoundModule { handle, entry })
    }

    /// Detach the module, keeping the name until the close outcome is known
    pub(crate) fn take_module(&mut self) -> Option<BoundModule<H, E>> {
        self.module.take()
    }

    /// Put back a module whose close failed
    pub(crate) fn restore(&mut self, module: BoundModule<H, E>) {
        self.module = Some(module);
    }

    /// Reset to the freshly initialised state
    pub(crate) fn clear(&mut self) {
        self.name = PluginName::default();
        self.module = None;
    }
}

impl<H, E> Default for PluginSlot<H, E> {
    fn default() -> Self {
        Self::empty()
    }
}
