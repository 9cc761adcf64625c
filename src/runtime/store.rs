//! Host-visible tables and persistent named values.
//!
//! Both stores are process-wide and keyed by [`Symbol`]. Generated code
//! reaches them only through the `jit_expr_*` helpers; the host reads and
//! writes them through the functions here. Ordering between the two is the
//! host's responsibility.
//!
//! Generated code keeps cell pointers past the store lock, so table storage
//! is never freed by [`set_table`] or [`remove_table`]. Replacing a table
//! with one of the same length copies in place; otherwise the old storage
//! is retired and stays allocated until [`release_retired_tables`].

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use lazy_static::lazy_static;
use log::debug;

use super::symbol::Symbol;

lazy_static! {
    static ref TABLES: RwLock<HashMap<Symbol, Box<[f32]>>> = RwLock::new(HashMap::new());
    static ref RETIRED: Mutex<Vec<Box<[f32]>>> = Mutex::new(Vec::new());
    static ref VALUES: RwLock<HashMap<Symbol, f32>> = RwLock::new(HashMap::new());
}

/// Create or replace a table.
pub fn set_table(name: &str, values: Vec<f32>) {
    let sym = Symbol::intern(name);
    let mut tables = TABLES.write().unwrap_or_else(|e| e.into_inner());
    match tables.get_mut(&sym) {
        Some(table) if table.len() == values.len() => table.copy_from_slice(&values),
        _ => {
            if let Some(old) = tables.insert(sym, values.into_boxed_slice()) {
                retire(old);
            }
        }
    }
}

/// A copy of a table's contents.
pub fn table(name: &str) -> Option<Vec<f32>> {
    let tables = TABLES.read().unwrap_or_else(|e| e.into_inner());
    tables.get(&Symbol::intern(name)).map(|t| t.to_vec())
}

pub fn remove_table(name: &str) -> bool {
    let mut tables = TABLES.write().unwrap_or_else(|e| e.into_inner());
    match tables.remove(&Symbol::intern(name)) {
        Some(old) => {
            retire(old);
            true
        }
        None => false,
    }
}

/// Free the storage of replaced and removed tables. Returns how many
/// buffers were released.
///
/// # Safety
///
/// No compiled function may be running while this is called, and no cell
/// pointer handed out before the call may be used after it.
pub unsafe fn release_retired_tables() -> usize {
    let mut retired = RETIRED.lock().unwrap_or_else(|e| e.into_inner());
    let count = retired.len();
    retired.clear();
    debug!("released {count} retired table buffer(s)");
    count
}

// Empty tables never hand out cell pointers, so they can go right away.
fn retire(storage: Box<[f32]>) {
    if !storage.is_empty() {
        let mut retired = RETIRED.lock().unwrap_or_else(|e| e.into_inner());
        retired.push(storage);
    }
}

pub fn set_value(name: &str, value: f32) {
    let mut values = VALUES.write().unwrap_or_else(|e| e.into_inner());
    values.insert(Symbol::intern(name), value);
}

pub fn value(name: &str) -> Option<f32> {
    let values = VALUES.read().unwrap_or_else(|e| e.into_inner());
    values.get(&Symbol::intern(name)).copied()
}

// --- Accessors used by the helpers ---

/// Pointer to the cell at `index`, clamped into the table. Null if the
/// table is missing or empty.
pub(crate) fn table_cell_ptr(name: Symbol, index: f32) -> *mut f32 {
    let mut tables = TABLES.write().unwrap_or_else(|e| e.into_inner());
    match tables.get_mut(&name) {
        Some(table) if !table.is_empty() => {
            let i = clamp_index(index, table.len());
            &mut table[i] as *mut f32
        }
        _ => std::ptr::null_mut(),
    }
}

pub(crate) fn with_table<R>(name: Symbol, f: impl FnOnce(&[f32]) -> R) -> Option<R> {
    let tables = TABLES.read().unwrap_or_else(|e| e.into_inner());
    tables.get(&name).map(|t| f(&t[..]))
}

pub(crate) fn value_of(name: Symbol) -> Option<f32> {
    let values = VALUES.read().unwrap_or_else(|e| e.into_inner());
    values.get(&name).copied()
}

pub(crate) fn assign(name: Symbol, value: f32) {
    let mut values = VALUES.write().unwrap_or_else(|e| e.into_inner());
    values.insert(name, value);
}

/// Truncate `index` toward zero and clamp it to `[0, len - 1]`.
pub(crate) fn clamp_index(index: f32, len: usize) -> usize {
    // `as` saturates, and NaN becomes 0.
    let i = index as i64;
    i.clamp(0, len as i64 - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_round_trip() {
        set_table("store-test-tab", vec![1.0, 2.0, 3.0]);
        assert_eq!(table("store-test-tab"), Some(vec![1.0, 2.0, 3.0]));
        assert!(remove_table("store-test-tab"));
        assert_eq!(table("store-test-tab"), None);
        assert!(!remove_table("store-test-tab"));
    }

    #[test]
    fn cell_pointer_is_clamped() {
        set_table("store-test-clamp", vec![10.0, 20.0, 30.0]);
        let sym = Symbol::intern("store-test-clamp");
        let lo = table_cell_ptr(sym, -5.0);
        let hi = table_cell_ptr(sym, 99.0);
        let mid = table_cell_ptr(sym, 1.9);
        unsafe {
            assert_eq!(*lo, 10.0);
            assert_eq!(*hi, 30.0);
            assert_eq!(*mid, 20.0);
        }
    }

    #[test]
    fn missing_table_gives_null() {
        let sym = Symbol::intern("store-test-missing");
        assert!(table_cell_ptr(sym, 0.0).is_null());
        set_table("store-test-empty", Vec::new());
        assert!(table_cell_ptr(Symbol::intern("store-test-empty"), 0.0).is_null());
    }

    #[test]
    fn replacing_keeps_old_cells_alive() {
        set_table("store-test-replace", vec![1.0, 2.0]);
        let sym = Symbol::intern("store-test-replace");
        let first = table_cell_ptr(sym, 1.0);

        // Same length: written in place.
        set_table("store-test-replace", vec![3.0, 4.0]);
        assert_eq!(table_cell_ptr(sym, 1.0), first);
        assert_eq!(unsafe { *first }, 4.0);

        // New length: the old buffer is retired, not freed.
        set_table("store-test-replace", vec![5.0, 6.0, 7.0]);
        assert_ne!(table_cell_ptr(sym, 1.0), first);
        assert_eq!(unsafe { *first }, 4.0);
        unsafe { *first = 9.0 };
        assert_eq!(table("store-test-replace"), Some(vec![5.0, 6.0, 7.0]));

        let second = table_cell_ptr(sym, 2.0);
        assert!(remove_table("store-test-replace"));
        assert_eq!(unsafe { *second }, 7.0);
        assert_eq!(unsafe { *first }, 9.0);
    }

    #[test]
    fn values() {
        assert_eq!(value("store-test-value"), None);
        set_value("store-test-value", 4.5);
        assert_eq!(value("store-test-value"), Some(4.5));
        assign(Symbol::intern("store-test-value"), 1.0);
        assert_eq!(value_of(Symbol::intern("store-test-value")), Some(1.0));
    }

    #[test]
    fn clamp() {
        assert_eq!(clamp_index(-0.5, 4), 0);
        assert_eq!(clamp_index(2.7, 4), 2);
        assert_eq!(clamp_index(f32::NAN, 4), 0);
        assert_eq!(clamp_index(f32::INFINITY, 4), 3);
    }
}
