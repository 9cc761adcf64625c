//! Interned symbols.
//!
//! A symbol is a process-lifetime string with a stable address. Generated
//! code passes symbols around as that address, so two symbols are equal
//! exactly when their pointers are.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use lazy_static::lazy_static;

/// The interned storage a [`Symbol`] points at.
#[derive(Debug)]
pub struct SymbolName {
    text: Box<str>,
}

impl SymbolName {
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

lazy_static! {
    static ref INTERNED: Mutex<HashMap<Box<str>, &'static SymbolName>> =
        Mutex::new(HashMap::new());
}

#[derive(Clone, Copy)]
pub struct Symbol(&'static SymbolName);

impl Symbol {
    pub fn intern(text: &str) -> Self {
        let mut interned = INTERNED.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(name) = interned.get(text) {
            return Symbol(*name);
        }
        let name: &'static SymbolName = Box::leak(Box::new(SymbolName { text: text.into() }));
        interned.insert(text.into(), name);
        Symbol(name)
    }

    pub fn as_str(&self) -> &'static str {
        &self.0.text
    }

    pub fn as_ptr(&self) -> *const SymbolName {
        self.0 as *const SymbolName
    }

    /// Recover a symbol from a handle passed through generated code.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer obtained from [`Symbol::as_ptr`].
    pub unsafe fn from_ptr(ptr: *const SymbolName) -> Option<Self> {
        // SAFETY: interned names are leaked, so any non-null handle from
        // `as_ptr` stays valid for the rest of the process.
        unsafe { ptr.as_ref() }.map(Symbol)
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.0, state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Symbol {
    fn from(text: &str) -> Self {
        Symbol::intern(text)
    }
}
