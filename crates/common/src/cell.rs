//! Shared variable cells
//!
//! A host program owns [`IntVar`] and [`TextVar`] handles and reads or mutates
//! them from its own threads. The registry only keeps a [`VarRef`], which is a
//! weak reference to the same cell, so dropping the last handle turns the
//! matching file stale instead of leaving it pointing at freed memory.
//!
//! Every access goes through the cell's mutex, both from the host side and
//! from filesystem callbacks.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::codec::CellCodec;

/// Errors raised when storing a value into a cell
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CellError {
    #[error("text of {len} bytes exceeds cell capacity of {capacity} bytes")]
    CapacityExceeded { len: usize, capacity: usize },
}

/// The kind of value a registered variable holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Integer,
    Text,
}

impl VarKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VarKind::Integer => "integer",
            VarKind::Text => "text",
        }
    }
}

impl std::fmt::Display for VarKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage behind an integer variable
#[derive(Debug, Default)]
pub struct IntCell {
    value: i64,
}

impl IntCell {
    pub fn get(&self) -> i64 {
        self.value
    }

    pub fn set(&mut self, value: i64) {
        self.value = value;
    }
}

/// Storage behind a text variable.
///
/// Holds raw bytes and never grows past the capacity it was created with.
#[derive(Debug)]
pub struct TextCell {
    bytes: Vec<u8>,
    capacity: usize,
}

impl TextCell {
    fn new(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Maximum number of content bytes this cell accepts
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Replace the content, failing without modification if it does not fit
    pub fn replace(&mut self, bytes: &[u8]) -> Result<(), CellError> {
        if bytes.len() > self.capacity {
            return Err(CellError::CapacityExceeded {
                len: bytes.len(),
                capacity: self.capacity,
            });
        }
        self.bytes.clear();
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }
}

/// Host-side handle to an integer variable
#[derive(Debug, Clone, Default)]
pub struct IntVar {
    cell: Arc<Mutex<IntCell>>,
}

impl IntVar {
    pub fn new(value: i64) -> Self {
        Self {
            cell: Arc::new(Mutex::new(IntCell { value })),
        }
    }

    pub fn get(&self) -> i64 {
        self.cell.lock().get()
    }

    pub fn set(&self, value: i64) {
        self.cell.lock().set(value);
    }

    /// Apply `f` to the current value under the lock and return the new value
    pub fn update(&self, f: impl FnOnce(i64) -> i64) -> i64 {
        let mut cell = self.cell.lock();
        let value = f(cell.get());
        cell.set(value);
        value
    }

    pub(crate) fn downgrade(&self) -> VarRef {
        VarRef::Integer(Arc::downgrade(&self.cell))
    }
}

/// Host-side handle to a fixed-capacity text variable
#[derive(Debug, Clone)]
pub struct TextVar {
    cell: Arc<Mutex<TextCell>>,
}

impl TextVar {
    /// Create an empty text variable that holds at most `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cell: Arc::new(Mutex::new(TextCell::new(capacity))),
        }
    }

    /// Create a text variable with an initial value
    pub fn new(capacity: usize, initial: &str) -> Result<Self, CellError> {
        let var = Self::with_capacity(capacity);
        var.set(initial)?;
        Ok(var)
    }

    /// Current content, with invalid UTF-8 replaced
    pub fn get(&self) -> String {
        String::from_utf8_lossy(self.cell.lock().as_bytes()).into_owned()
    }

    /// Replace the content. Like a write through the mount, the value ends
    /// at its first NUL.
    pub fn set(&self, value: &str) -> Result<(), CellError> {
        self.cell.lock().replace(until_nul(value.as_bytes()))
    }

    pub fn capacity(&self) -> usize {
        self.cell.lock().capacity()
    }

    pub(crate) fn downgrade(&self) -> VarRef {
        VarRef::Text(Arc::downgrade(&self.cell))
    }
}

/// Bytes before the first NUL, or all of them
pub(crate) fn until_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

/// Registry-side reference to a host variable.
///
/// Closed over the supported kinds so a reference can never be read as the
/// wrong type.
#[derive(Debug, Clone)]
pub enum VarRef {
    Integer(Weak<Mutex<IntCell>>),
    Text(Weak<Mutex<TextCell>>),
}

impl VarRef {
    pub fn kind(&self) -> VarKind {
        match self {
            VarRef::Integer(_) => VarKind::Integer,
            VarRef::Text(_) => VarKind::Text,
        }
    }

    /// Whether the host still holds the variable
    pub fn is_live(&self) -> bool {
        match self {
            VarRef::Integer(weak) => weak.strong_count() > 0,
            VarRef::Text(weak) => weak.strong_count() > 0,
        }
    }

    /// Run `f` against the locked cell, or return `None` if the host dropped it
    pub fn with_codec<R>(&self, f: impl FnOnce(&mut dyn CellCodec) -> R) -> Option<R> {
        match self {
            VarRef::Integer(weak) => {
                let cell = weak.upgrade()?;
                let mut guard = cell.lock();
                Some(f(&mut *guard))
            }
            VarRef::Text(weak) => {
                let cell = weak.upgrade()?;
                let mut guard = cell.lock();
                Some(f(&mut *guard))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_var_update() {
        let var = IntVar::new(4);
        assert_eq!(var.update(|v| v + 1), 5);
        assert_eq!(var.get(), 5);

        var.set(-3);
        assert_eq!(var.get(), -3);
    }

    #[test]
    fn test_text_var_capacity() {
        let var = TextVar::new(9, "PlayerOne").unwrap();
        assert_eq!(var.get(), "PlayerOne");
        assert_eq!(var.capacity(), 9);

        let err = var.set("PlayerOneTwo").unwrap_err();
        assert_eq!(
            err,
            CellError::CapacityExceeded {
                len: 12,
                capacity: 9
            }
        );
        // Failed writes leave the old value alone
        assert_eq!(var.get(), "PlayerOne");
    }

    #[test]
    fn test_text_var_rejects_oversized_initial_value() {
        assert!(TextVar::new(3, "four").is_err());
    }

    #[test]
    fn test_var_ref_goes_stale_when_dropped() {
        let var = IntVar::new(1);
        let var_ref = var.downgrade();

        assert_eq!(var_ref.kind(), VarKind::Integer);
        assert!(var_ref.is_live());
        assert_eq!(var_ref.with_codec(|cell| cell.render()), Some(b"1\n".to_vec()));

        drop(var);
        assert!(!var_ref.is_live());
        assert!(var_ref.with_codec(|cell| cell.render()).is_none());
    }

    #[test]
    fn test_clones_share_storage() {
        let var = TextVar::with_capacity(16);
        let other = var.clone();
        other.set("shared").unwrap();
        assert_eq!(var.get(), "shared");
        assert_eq!(var.downgrade().kind(), VarKind::Text);
    }

    #[test]
    fn test_text_var_set_stops_at_nul() {
        let var = TextVar::new(8, "name").unwrap();
        var.set("abc\0def").unwrap();
        assert_eq!(var.get(), "abc");
        assert_eq!(
            crate::codec::render(&var.downgrade()).unwrap(),
            b"abc\n".to_vec()
        );

        // Only the kept prefix counts against capacity
        var.set("12345678\0overflow").unwrap();
        assert_eq!(var.get(), "12345678");
        assert!(TextVar::new(4, "\0anything").unwrap().get().is_empty());
    }
}
