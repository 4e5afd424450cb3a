//! # protodomain — symbolic field domains for protocol reverse engineering
//!
//! A message format is a [`Symbol`]: an ordered list of named fields whose values are
//! described by a tree of [`Variable`] nodes (typed leaves, alternatives, repeats,
//! aggregates and relation leaves such as sizes and checksums). Two dual walks run over
//! that tree:
//!
//! - **abstraction** binds a concrete message to the tree and reports every field value
//!   ([`Engine::abstract_message`]);
//! - **specialization** generates a concrete message from the tree
//!   ([`Engine::specialize`]).
//!
//! Relations may reference fields that come later in the message, or themselves; they are
//! resolved through a per-path callback queue as soon as their inputs are known.
//!
//! ## Node kinds
//!
//! | Kind | Abstraction | Specialization |
//! |------|-------------|----------------|
//! | Data | every legal length, longest first | fixed, memorized or random value |
//! | Relation | wire value checked against the computed one | computed value |
//! | Alt | first child that matches | first child that succeeds (shuffled if mutable) |
//! | Agg | children in order | children in order |
//! | Repeat | more iterations first | fixed, random, field-driven or predicate count |
//!
//! ## Memory scopes
//!
//! - `Constant`: the type's fixed value;
//! - `Session`: learnt or generated once, then enforced / reused;
//! - `Message`: relearnt / regenerated for each message;
//! - `None`: never memorized.
//!
//! ## Example DSL
//!
//! ```text
//! symbol Hello {
//!     magic: ascii("netzob");
//!     sep: raw(0x3b);
//!     len: size(magic, sep, len) uint8;
//! }
//! ```
//!
//! ## Usage
//!
//! See `tests/integration.rs` for engine usage and `tests/dsl.rs` for the format language.

pub mod abstraction;
pub mod batch;
pub mod config;
pub mod dump;
pub mod engine;
pub mod error;
pub mod memory;
pub mod parser;
pub mod path;
pub mod relation;
pub mod specialization;
pub mod symbol;
pub mod timestamp;
pub mod types;
pub mod value;
pub mod variable;

pub use batch::{abstract_batch, abstract_session, BatchReport, FailedMessage, MatchedMessage};
pub use config::EngineConfig;
pub use engine::{AbstractedMessage, Engine, FieldValue};
pub use error::DomainError;
pub use memory::{Memory, Scope};
pub use parser::{parse, parse_with_defaults};
pub use relation::{ChecksumAlgorithm, RelationKind};
pub use specialization::Presets;
pub use symbol::{Field, Symbol};
pub use timestamp::{Epoch, Unity};
pub use types::{Endianness, Sign, TypeDefaults, TypeDescriptor, TypeKind, UnitSize};
pub use value::Bits;
pub use variable::{RepeatControl, RepeatCount, RepeatPredicate, Variable};
