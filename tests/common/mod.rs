//! In-memory Dynamic Library Service that records every call

#![allow(dead_code)]

use slotplug::plugins::{CloseFailure, EntryPoint, LibraryError, LibraryService, ModuleHandle};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// What a fake module exports
#[derive(Debug, Clone)]
pub struct FakeModule {
    pub has_func: bool,
    pub name: Option<Vec<u8>>,
}

impl FakeModule {
    pub fn named(name: &str) -> Self {
        Self {
            has_func: true,
            name: Some(name.as_bytes().to_vec()),
        }
    }

    pub fn without_func(name: &str) -> Self {
        Self {
            has_func: false,
            ..Self::named(name)
        }
    }

    pub fn without_name() -> Self {
        Self {
            has_func: true,
            name: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Stats {
    pub opens: u32,
    pub closes: u32,
    /// Handles currently open, by id
    pub open_handles: BTreeSet<u64>,
    /// Outstanding opens per handle id
    pub refcounts: HashMap<u64, u32>,
    /// Invocations per module path
    pub invocations: HashMap<PathBuf, u32>,
    /// Number of upcoming close calls that should fail
    pub failing_closes: u32,
}

pub type SharedStats = Rc<RefCell<Stats>>;

#[derive(Debug)]
pub struct FakeHandle {
    pub id: u64,
    path: PathBuf,
}

impl ModuleHandle for FakeHandle {
    fn address(&self) -> usize {
        0x7f00_0000 + self.id as usize * 0x100
    }
}

#[derive(Debug)]
pub struct FakeEntry {
    address: usize,
    path: PathBuf,
    stats: SharedStats,
}

impl EntryPoint for FakeEntry {
    fn address(&self) -> usize {
        self.address
    }

    fn invoke(&self) {
        *self
            .stats
            .borrow_mut()
            .invocations
            .entry(self.path.clone())
            .or_default() += 1;
    }
}

#[derive(Debug, Default)]
pub struct FakeLibraries {
    modules: HashMap<PathBuf, FakeModule>,
    next_id: u64,
    stats: SharedStats,
    /// Reopening an open path returns its existing handle, like dlopen
    refcounted: bool,
    open_paths: HashMap<PathBuf, u64>,
}

impl FakeLibraries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, path: &str, module: FakeModule) -> Self {
        self.modules.insert(PathBuf::from(path), module);
        self
    }

    /// The usual set: a good plugin, one with a long name and two broken ones
    pub fn standard() -> Self {
        Self::new()
            .with_module("pluginA.so", FakeModule::named("PluginA"))
            .with_module("pluginB.so", FakeModule::named("PluginB"))
            .with_module("long.so", FakeModule::named("AnUnreasonablyLongPluginId"))
            .with_module("nofunc.so", FakeModule::without_func("NoFunc"))
            .with_module("noname.so", FakeModule::without_name())
    }

    /// Hand out one shared handle per open path
    pub fn refcounted(mut self) -> Self {
        self.refcounted = true;
        self
    }

    pub fn stats(&self) -> SharedStats {
        Rc::clone(&self.stats)
    }
}

impl LibraryService for FakeLibraries {
    type Handle = FakeHandle;
    type Entry = FakeEntry;

    fn open(&mut self, path: &Path) -> Result<FakeHandle, LibraryError> {
        if !self.modules.contains_key(path) {
            return Err(LibraryError::Open {
                path: path.to_path_buf(),
                diagnostic: format!(
                    "{}: cannot open shared object file: No such file or directory",
                    path.display()
                ),
            });
        }
        let mut stats = self.stats.borrow_mut();
        let reused = self
            .refcounted
            .then(|| {
                self.open_paths
                    .get(path)
                    .copied()
                    .filter(|id| stats.open_handles.contains(id))
            })
            .flatten();
        let id = match reused {
            Some(id) => id,
            None => {
                self.next_id += 1;
                self.open_paths.insert(path.to_path_buf(), self.next_id);
                self.next_id
            }
        };
        stats.opens += 1;
        stats.open_handles.insert(id);
        *stats.refcounts.entry(id).or_default() += 1;
        Ok(FakeHandle {
            id,
            path: path.to_path_buf(),
        })
    }

    fn resolve_entry(
        &mut self,
        handle: &FakeHandle,
        symbol: &'static str,
    ) -> Result<FakeEntry, LibraryError> {
        match self.modules.get(&handle.path) {
            Some(module) if module.has_func => Ok(FakeEntry {
                address: handle.address() + 0x10,
                path: handle.path.clone(),
                stats: Rc::clone(&self.stats),
            }),
            _ => Err(LibraryError::Symbol {
                symbol,
                diagnostic: format!("undefined symbol: {symbol}"),
            }),
        }
    }

    fn resolve_text(
        &mut self,
        handle: &FakeHandle,
        symbol: &'static str,
        max_len: usize,
    ) -> Result<Vec<u8>, LibraryError> {
        match self.modules.get(&handle.path).and_then(|m| m.name.as_ref()) {
            Some(name) => Ok(name.iter().copied().take(max_len).collect()),
            None => Err(LibraryError::Symbol {
                symbol,
                diagnostic: format!("undefined symbol: {symbol}"),
            }),
        }
    }

    fn close(&mut self, handle: FakeHandle) -> Result<(), CloseFailure<FakeHandle>> {
        let mut stats = self.stats.borrow_mut();
        if stats.failing_closes > 0 {
            stats.failing_closes -= 1;
            return Err(CloseFailure {
                handle,
                error: LibraryError::Close("module is busy".to_string()),
            });
        }
        stats.closes += 1;
        let remaining = stats.refcounts.get_mut(&handle.id).map_or(0, |count| {
            *count -= 1;
            *count
        });
        if remaining == 0 {
            stats.refcounts.remove(&handle.id);
            stats.open_handles.remove(&handle.id);
        }
        Ok(())
    }
}
