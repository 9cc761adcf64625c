//! External symbol resolution for generated code.
//!
//! Lookup order: exports of previously linked modules (newest first), then
//! the host symbol table, then the process's dynamic symbol table.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use cranelift_jit::JITModule;

use crate::runtime;

/// A finalized JIT module and the function it exports.
pub struct LinkedModule {
    pub(crate) name: String,
    pub(crate) address: usize,
    // Owns the executable memory `address` points into.
    _module: JITModule,
}

// SAFETY: after finalization the module is never mutated again; it only
// keeps its code memory alive. The exported address is plain data.
unsafe impl Send for LinkedModule {}
unsafe impl Sync for LinkedModule {}

impl LinkedModule {
    pub(crate) fn new(name: String, address: *const u8, module: JITModule) -> Self {
        Self {
            name,
            address: address as usize,
            _module: module,
        }
    }
}

type History = Arc<RwLock<Vec<Arc<LinkedModule>>>>;
type HostTable = Arc<RwLock<HashMap<String, usize>>>;

#[derive(Clone)]
pub struct SymbolResolver {
    history: History,
    host: HostTable,
}

impl SymbolResolver {
    /// A resolver with every runtime helper registered.
    pub fn new() -> Self {
        let host = runtime::helper_symbols()
            .into_iter()
            .map(|(name, ptr)| (name.to_string(), ptr as usize))
            .collect();
        Self {
            history: Arc::new(RwLock::new(Vec::new())),
            host: Arc::new(RwLock::new(host)),
        }
    }

    pub fn register(&self, name: &str, ptr: *const u8) {
        let mut host = self.host.write().unwrap_or_else(|e| e.into_inner());
        host.insert(name.to_string(), ptr as usize);
    }

    pub(crate) fn push(&self, module: Arc<LinkedModule>) {
        let mut history = self.history.write().unwrap_or_else(|e| e.into_inner());
        history.push(module);
    }

    pub fn modules(&self) -> usize {
        self.history.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Export of the newest linked module with this name.
    pub fn compiled(&self, name: &str) -> Option<*const u8> {
        compiled_in(&self.history, name)
    }

    pub fn resolve(&self, name: &str) -> Option<*const u8> {
        resolve_in(&self.history, &self.host, name)
    }

    /// A lookup function for `JITBuilder::symbol_lookup_fn`.
    ///
    /// Every linked module keeps its lookup function, and the history owns
    /// the modules, so the history is only referenced weakly here.
    pub fn lookup_fn(&self) -> Box<dyn Fn(&str) -> Option<*const u8> + Send> {
        let history = Arc::downgrade(&self.history);
        let host = Arc::clone(&self.host);
        Box::new(move |name| match history.upgrade() {
            Some(history) => resolve_in(&history, &host, name),
            None => host_symbol(&host, name).or_else(|| process_symbol(name)),
        })
    }

    /// Strong references to the module history.
    #[cfg(test)]
    fn history_refs(&self) -> usize {
        Arc::strong_count(&self.history)
    }
}

impl Default for SymbolResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn compiled_in(history: &History, name: &str) -> Option<*const u8> {
    let history = history.read().unwrap_or_else(|e| e.into_inner());
    history
        .iter()
        .rev()
        .find(|m| m.name == name)
        .map(|m| m.address as *const u8)
}

fn resolve_in(history: &History, host: &HostTable, name: &str) -> Option<*const u8> {
    compiled_in(history, name)
        .or_else(|| host_symbol(host, name))
        .or_else(|| process_symbol(name))
}

fn host_symbol(host: &HostTable, name: &str) -> Option<*const u8> {
    let host = host.read().unwrap_or_else(|e| e.into_inner());
    host.get(name).map(|addr| *addr as *const u8)
}

#[cfg(unix)]
fn process_symbol(name: &str) -> Option<*const u8> {
    let c_name = std::ffi::CString::new(name).ok()?;
    // SAFETY: `c_name` is a valid NUL-terminated string and RTLD_DEFAULT
    // searches the already loaded objects.
    let ptr = unsafe { libc::dlsym(libc::RTLD_DEFAULT, c_name.as_ptr()) };
    (!ptr.is_null()).then_some(ptr as *const u8)
}

#[cfg(not(unix))]
fn process_symbol(_name: &str) -> Option<*const u8> {
    None
}
