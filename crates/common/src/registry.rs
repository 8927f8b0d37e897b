//! Name-indexed registry of host variables
//!
//! Entries are append-only and kept in insertion order, which is also the
//! order directory listings use. Lookups scan linearly; registries are
//! expected to hold tens of variables, not thousands.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use crate::cell::{IntVar, TextVar, VarKind, VarRef};
use crate::config::{OverflowPolicy, RegistryConfig};

/// Longest variable name in bytes
pub const MAX_NAME_LEN: usize = 63;

/// Entry capacity reserved by the first registration
const INITIAL_CAPACITY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid variable name: {0:?}")]
    InvalidName(String),
    #[error("variable name {name:?} is {len} bytes, limit is {limit}")]
    NameTooLong {
        name: String,
        len: usize,
        limit: usize,
    },
    #[error("registry is sealed while a filesystem is mounted")]
    Sealed,
}

/// A single registered variable.
///
/// Name, kind and reference never change after registration; only the value
/// behind the reference does.
#[derive(Debug, Clone)]
pub struct RegisteredVariable {
    name: String,
    var: VarRef,
}

impl RegisteredVariable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> VarKind {
        self.var.kind()
    }

    pub fn var(&self) -> &VarRef {
        &self.var
    }

    /// Filesystem path of this variable
    pub fn path(&self) -> String {
        format!("/{}", self.name)
    }
}

/// Registry of variables exposed through the filesystem
#[derive(Debug, Default)]
pub struct Registry {
    entries: RwLock<Vec<RegisteredVariable>>,
    sealed: AtomicBool,
    config: RegistryConfig,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Expose an integer variable as `/<name>`
    pub fn register_integer(&self, name: &str, var: &IntVar) -> Result<(), RegistryError> {
        self.register(name, var.downgrade())
    }

    /// Expose a text variable as `/<name>`
    pub fn register_text(&self, name: &str, var: &TextVar) -> Result<(), RegistryError> {
        self.register(name, var.downgrade())
    }

    fn register(&self, name: &str, var: VarRef) -> Result<(), RegistryError> {
        let name = self.bound_name(name)?;
        validate_name(name)?;

        let mut entries = self.entries.write();
        if self.sealed.load(Ordering::SeqCst) {
            return Err(RegistryError::Sealed);
        }

        if entries.len() == entries.capacity() {
            let additional = entries.capacity().max(INITIAL_CAPACITY);
            entries.reserve_exact(additional);
        }

        debug!(name = %name, kind = %var.kind(), index = entries.len(), "registering variable");
        entries.push(RegisteredVariable {
            name: name.to_string(),
            var,
        });
        Ok(())
    }

    fn bound_name<'a>(&self, name: &'a str) -> Result<&'a str, RegistryError> {
        if name.len() <= MAX_NAME_LEN {
            return Ok(name);
        }
        match self.config.overflow {
            OverflowPolicy::Clip => Ok(clip_to_char_boundary(name, MAX_NAME_LEN)),
            OverflowPolicy::Reject => Err(RegistryError::NameTooLong {
                name: name.to_string(),
                len: name.len(),
                limit: MAX_NAME_LEN,
            }),
        }
    }

    /// Index of the first variable whose name matches the path after its
    /// leading `/`
    pub fn lookup(&self, path: &str) -> Option<usize> {
        find(&self.entries.read(), path)
    }

    /// Resolve a path to its index and entry under a single read lock
    pub fn resolve(&self, path: &str) -> Option<(usize, RegisteredVariable)> {
        let entries = self.entries.read();
        let index = find(&entries, path)?;
        Some((index, entries[index].clone()))
    }

    pub fn get(&self, index: usize) -> Option<RegisteredVariable> {
        self.entries.read().get(index).cloned()
    }

    /// All registered names in insertion order
    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of entries the backing storage holds before it grows
    pub fn capacity(&self) -> usize {
        self.entries.read().capacity()
    }

    /// Refuse further registrations
    pub fn seal(&self) {
        let _entries = self.entries.write();
        self.sealed.store(true, Ordering::SeqCst);
    }

    pub fn unseal(&self) {
        let _entries = self.entries.write();
        self.sealed.store(false, Ordering::SeqCst);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    /// Drop every entry and its backing storage, and accept registrations again
    pub fn release(&self) {
        let mut entries = self.entries.write();
        debug!(count = entries.len(), "releasing registry");
        *entries = Vec::new();
        self.sealed.store(false, Ordering::SeqCst);
    }
}

fn find(entries: &[RegisteredVariable], path: &str) -> Option<usize> {
    let name = path.strip_prefix('/')?;
    entries.iter().position(|entry| entry.name == name)
}

/// A name must work as a single path component
fn validate_name(name: &str) -> Result<(), RegistryError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn clip_to_char_boundary(s: &str, limit: usize) -> &str {
    let mut end = limit.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
