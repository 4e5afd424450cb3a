//! Session memory: last value bound to each memorized variable.
//!
//! Only `Session` and `Message` scoped variables are ever stored; `memorize` silently
//! ignores `Constant` and `None`. Keys are variable names, so two symbols that name a field
//! identically share its memorized value (e.g. a session id echoed by request and reply).
//!
//! A `Memory` can be persisted as JSON with [`Memory::save`] / [`Memory::load`]; values
//! round-trip bit for bit, including non byte aligned ones.

use crate::error::DomainError;
use crate::value::Bits;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fs, path::Path};

/// Persistence class of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Scope {
    /// Value is the type's fixed value; never memorized.
    Constant,
    /// Generated or learned once, then reused for the whole session.
    Session,
    /// Regenerated / relearned for every message, last value memorized.
    Message,
    /// Never memorized.
    #[default]
    None,
}

impl Scope {
    pub fn is_memorized(self) -> bool {
        matches!(self, Scope::Session | Scope::Message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub scope: Scope,
    pub value: Bits,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    entries: BTreeMap<String, MemoryEntry>,
}

impl Memory {
    pub fn new() -> Self {
        Memory::default()
    }

    pub fn has_value(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get_value(&self, name: &str) -> Option<&Bits> {
        self.entries.get(name).map(|e| &e.value)
    }

    /// Store `value` for `name`. Returns false (and stores nothing) when the scope is not
    /// memorized.
    pub fn memorize(&mut self, name: &str, scope: Scope, value: Bits) -> bool {
        if !scope.is_memorized() {
            log::trace!("not memorizing {} (scope {:?})", name, scope);
            return false;
        }
        self.entries.insert(name.to_string(), MemoryEntry { scope, value });
        true
    }

    pub fn forget(&mut self, name: &str) -> Option<Bits> {
        self.entries.remove(name).map(|e| e.value)
    }

    /// Drop every entry of the given scope (e.g. `Message` entries between exchanges).
    pub fn forget_scope(&mut self, scope: Scope) {
        self.entries.retain(|_, e| e.scope != scope);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MemoryEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn to_json(&self) -> Result<String, DomainError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, DomainError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), DomainError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DomainError> {
        Memory::from_json(&fs::read_to_string(path)?)
    }
}
