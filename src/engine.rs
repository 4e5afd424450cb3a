//! Entry points: abstract messages against symbols, specialize symbols into messages.
//!
//! `Engine` only holds configuration. Session state lives in the [`Memory`] passed to each
//! call; it is updated only when the call succeeds.

use crate::abstraction::Abstractor;
use crate::config::EngineConfig;
use crate::error::{truncated_hex, DomainError};
use crate::memory::Memory;
use crate::path::Path;
use crate::specialization::{Presets, Specializer};
use crate::symbol::Symbol;
use crate::value::Bits;
use rand::RngCore;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Value of one field of a message.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    pub name: String,
    pub value: Bits,
}

/// A message bound to a symbol: the symbol name, the whole data and every field value.
#[derive(Debug, Clone, PartialEq)]
pub struct AbstractedMessage {
    pub symbol: String,
    pub data: Bits,
    pub fields: Vec<FieldValue>,
    /// Value of every variable bound by the walk (composites included), by name.
    pub variables: BTreeMap<String, Bits>,
}

impl AbstractedMessage {
    pub fn field(&self, name: &str) -> Option<&Bits> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    pub fn variable(&self, name: &str) -> Option<&Bits> {
        self.variables.get(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Engine { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Abstract `bytes` with one symbol. The first completion that consumes the whole input
    /// and leaves no relation unchecked wins.
    pub fn abstract_with(&self, symbol: &Symbol, bytes: &[u8], memory: &mut Memory) -> Result<AbstractedMessage, DomainError> {
        self.abstract_bits(symbol, &Bits::from_bytes(bytes), memory)
    }

    pub fn abstract_bits(&self, symbol: &Symbol, bits: &Bits, memory: &mut Memory) -> Result<AbstractedMessage, DomainError> {
        let input = Arc::new(bits.clone());
        let start = Path::for_parsing(input, memory.clone());
        let completions = Abstractor::new(&self.config).abstract_node(symbol.root(), start)?;
        let total = completions.len();
        let winner = completions
            .into_iter()
            .find(|p| p.remaining() == 0 && !p.has_callbacks())
            .ok_or_else(|| DomainError::NoParsingPath {
                symbol: symbol.name.clone(),
                message: truncated_hex(bits.as_bytes()),
            })?;
        log::debug!("{}: matched ({} completions)", symbol.name, total);
        let msg = message_of(symbol, &winner, bits.clone());
        *memory = winner.into_memory();
        Ok(msg)
    }

    /// Try every symbol in order; the first one that matches wins.
    pub fn abstract_message(
        &self,
        bytes: &[u8],
        symbols: &[Symbol],
        memory: &mut Memory,
    ) -> Result<AbstractedMessage, DomainError> {
        for symbol in symbols {
            match self.abstract_with(symbol, bytes, memory) {
                Ok(msg) => return Ok(msg),
                Err(DomainError::NoParsingPath { .. }) => {
                    log::trace!("{} does not match", symbol.name);
                }
                Err(e) => return Err(e),
            }
        }
        Err(DomainError::NoSymbolMatched {
            message: truncated_hex(bytes),
            tried: symbols.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(", "),
        })
    }

    /// Generate one message as bytes (a partial last byte is zero padded).
    pub fn specialize(&self, symbol: &Symbol, presets: &Presets, memory: &mut Memory) -> Result<Vec<u8>, DomainError> {
        Ok(self.specialize_bits(symbol, presets, memory)?.into_bytes())
    }

    pub fn specialize_bits(&self, symbol: &Symbol, presets: &Presets, memory: &mut Memory) -> Result<Bits, DomainError> {
        let mut rng = rand::thread_rng();
        self.specialize_with_rng(symbol, presets, memory, &mut rng)
    }

    pub fn specialize_with_rng(
        &self,
        symbol: &Symbol,
        presets: &Presets,
        memory: &mut Memory,
        rng: &mut dyn RngCore,
    ) -> Result<Bits, DomainError> {
        Ok(self.specialize_message(symbol, presets, memory, rng)?.data)
    }

    /// Generate one message and report every field value.
    pub fn specialize_message(
        &self,
        symbol: &Symbol,
        presets: &Presets,
        memory: &mut Memory,
        rng: &mut dyn RngCore,
    ) -> Result<AbstractedMessage, DomainError> {
        let start = Path::for_specializing(memory.clone());
        let path = Specializer::new(&self.config, presets, rng).specialize_node(symbol.root(), start)?;
        if let Some(cb) = path.callbacks().next() {
            let missing = cb
                .relation
                .unresolved(cb.var, &path)
                .iter()
                .map(|d| d.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(DomainError::UnresolvableRelation {
                relation: cb.name.clone(),
                missing,
            });
        }
        let data = path.output()?;
        log::debug!("{}: specialized {} bits", symbol.name, data.len());
        let msg = message_of(symbol, &path, data);
        *memory = path.into_memory();
        Ok(msg)
    }
}

fn message_of(symbol: &Symbol, path: &Path, data: Bits) -> AbstractedMessage {
    let fields = symbol
        .fields()
        .into_iter()
        .map(|f| FieldValue {
            name: f.name.clone(),
            value: path.value_of(f.id()).unwrap_or_default(),
        })
        .collect();
    let variables = path
        .bound_values()
        .into_iter()
        .filter_map(|(id, v)| symbol.var_name(id).map(|n| (n.to_string(), v)))
        .collect();
    AbstractedMessage {
        symbol: symbol.name.clone(),
        data,
        fields,
        variables,
    }
}
