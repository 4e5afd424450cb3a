//! Variable nodes: the domain tree describing a field's legal values and structure.
//!
//! ## Node kinds
//!
//! | Kind | Value |
//! |------|-------|
//! | Data | one leaf typed by a [`TypeDescriptor`] |
//! | Relation | leaf computed from other variables ([`Relation`]) |
//! | Alt | the value of exactly one child (first match wins) |
//! | Repeat | concatenation of the child's value over several iterations |
//! | Agg | concatenation of every child's value, in order |
//!
//! Trees are authored once, then only walked by the engine. Relations and field-driven
//! repeats name the variables they depend on; the names are turned into [`VarId`]s by
//! [`Symbol::new`](crate::symbol::Symbol::new), which is also where forward and self
//! references are accepted.

use crate::memory::Scope;
use crate::relation::{ChecksumAlgorithm, Relation, RelationKind};
use crate::types::{Endianness, TypeDescriptor};
use crate::value::Bits;
use std::fmt;
use std::sync::Arc;

/// Index of a variable inside its symbol (pre-order position).
pub type VarId = usize;

/// Marker for ids not yet assigned by [`Symbol::new`](crate::symbol::Symbol::new).
pub const UNASSIGNED: VarId = usize::MAX;

/// Named reference to another variable of the same symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub id: VarId,
}

impl Dependency {
    pub fn new(name: &str) -> Self {
        Dependency {
            name: name.to_string(),
            id: UNASSIGNED,
        }
    }
}

/// Decision of a repeat predicate after one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatControl {
    Continue,
    /// Stop and discard the iteration just made.
    StopBefore,
    /// Stop and keep the iteration just made.
    StopAfter,
}

/// Predicate called with the 1-based iteration number and the iteration's value.
#[derive(Clone)]
pub struct RepeatPredicate(pub Arc<dyn Fn(usize, &Bits) -> RepeatControl + Send + Sync>);

impl fmt::Debug for RepeatPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RepeatPredicate(..)")
    }
}

#[derive(Debug, Clone)]
pub enum RepeatCount {
    Fixed(usize),
    /// Inclusive range; `None` upper bound means the engine's `max_repeat`.
    Range(usize, Option<usize>),
    /// Count read from an earlier integer variable.
    Field(Dependency),
    Predicate(RepeatPredicate),
}

#[derive(Debug, Clone)]
pub struct Repeat {
    pub child: Box<Variable>,
    pub count: RepeatCount,
    /// Bits between two consecutive iterations.
    pub delimiter: Option<Bits>,
    /// Type of the count variable, filled in by `Symbol::new`.
    pub count_type: Option<TypeDescriptor>,
}

impl Repeat {
    /// Iteration count carried by the count variable's value, read in that variable's
    /// byte order and sign.
    pub fn field_count(&self, value: &Bits) -> Option<usize> {
        let n = self
            .count_type
            .as_ref()
            .and_then(|t| t.integer_of(value))
            .or_else(|| value.to_u64().map(i128::from))?;
        usize::try_from(n).ok()
    }
}

#[derive(Debug, Clone)]
pub enum VariableKind {
    Data(TypeDescriptor),
    Relation(Relation),
    Alt { children: Vec<Variable>, mutable: bool },
    Repeat(Repeat),
    Agg(Vec<Variable>),
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub scope: Scope,
    pub kind: VariableKind,
    pub(crate) id: VarId,
}

impl Variable {
    fn new(name: &str, scope: Scope, kind: VariableKind) -> Self {
        Variable {
            name: name.to_string(),
            scope,
            kind,
            id: UNASSIGNED,
        }
    }

    /// Data leaf; constant when the type has a fixed value.
    pub fn data(name: &str, t: TypeDescriptor) -> Self {
        let scope = if t.fixed.is_some() { Scope::Constant } else { Scope::None };
        Variable::new(name, scope, VariableKind::Data(t))
    }

    /// Size of `deps` in bytes, encoded as an unsigned 8-bit integer.
    pub fn size(name: &str, deps: &[&str]) -> Self {
        Variable::relation(
            name,
            RelationKind::Size {
                factor: 1.0 / 8.0,
                offset: 0.0,
            },
            deps,
            TypeDescriptor::uint8(),
        )
    }

    pub fn crc32(name: &str, deps: &[&str]) -> Self {
        Variable::checksum(name, ChecksumAlgorithm::Crc32, deps)
    }

    pub fn inet_checksum(name: &str, deps: &[&str]) -> Self {
        Variable::checksum(name, ChecksumAlgorithm::Internet, deps)
    }

    pub fn checksum(name: &str, alg: ChecksumAlgorithm, deps: &[&str]) -> Self {
        let n = alg.output_bits() / 8;
        Variable::relation(name, RelationKind::Checksum(alg), deps, TypeDescriptor::raw_bytes(n, n))
    }

    /// Copy of `dep`, fitted to the length of `output`.
    pub fn value_of(name: &str, dep: &str, output: TypeDescriptor) -> Self {
        Variable::relation(name, RelationKind::Value, &[dep], output)
    }

    pub fn relation(name: &str, kind: RelationKind, deps: &[&str], output: TypeDescriptor) -> Self {
        let deps = deps.iter().map(|d| Dependency::new(d)).collect();
        Variable::new(name, Scope::None, VariableKind::Relation(Relation { kind, deps, output }))
    }

    pub fn alt(name: &str, children: Vec<Variable>) -> Self {
        Variable::new(name, Scope::None, VariableKind::Alt { children, mutable: false })
    }

    pub fn agg(name: &str, children: Vec<Variable>) -> Self {
        Variable::new(name, Scope::None, VariableKind::Agg(children))
    }

    pub fn repeat(name: &str, child: Variable, count: RepeatCount) -> Self {
        Variable::new(
            name,
            Scope::None,
            VariableKind::Repeat(Repeat {
                child: Box::new(child),
                count,
                delimiter: None,
                count_type: None,
            }),
        )
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Alternatives only: try children in random order when specializing.
    pub fn mutable(mut self) -> Self {
        if let VariableKind::Alt { mutable, .. } = &mut self.kind {
            *mutable = true;
        }
        self
    }

    /// Repeats only.
    pub fn with_delimiter(mut self, delimiter: Bits) -> Self {
        if let VariableKind::Repeat(r) = &mut self.kind {
            r.delimiter = Some(delimiter);
        }
        self
    }

    /// Size relations only.
    pub fn with_factor(mut self, f: f64) -> Self {
        if let VariableKind::Relation(Relation {
            kind: RelationKind::Size { factor, .. },
            ..
        }) = &mut self.kind
        {
            *factor = f;
        }
        self
    }

    /// Size relations only.
    pub fn with_offset(mut self, o: f64) -> Self {
        if let VariableKind::Relation(Relation {
            kind: RelationKind::Size { offset, .. },
            ..
        }) = &mut self.kind
        {
            *offset = o;
        }
        self
    }

    /// Relations only: replace the output encoding.
    pub fn with_output(mut self, output: TypeDescriptor) -> Self {
        if let VariableKind::Relation(r) = &mut self.kind {
            r.output = output;
        }
        self
    }

    /// Byte order of a data leaf or of a relation's output.
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        match &mut self.kind {
            VariableKind::Data(t) => *t = t.clone().with_endianness(endianness),
            VariableKind::Relation(r) => r.output = r.output.clone().with_endianness(endianness),
            _ => {}
        }
        self
    }

    pub fn id(&self) -> VarId {
        self.id
    }

    pub fn children(&self) -> Vec<&Variable> {
        match &self.kind {
            VariableKind::Data(_) | VariableKind::Relation(_) => Vec::new(),
            VariableKind::Alt { children, .. } | VariableKind::Agg(children) => children.iter().collect(),
            VariableKind::Repeat(r) => vec![r.child.as_ref()],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Vec<&mut Variable> {
        match &mut self.kind {
            VariableKind::Data(_) | VariableKind::Relation(_) => Vec::new(),
            VariableKind::Alt { children, .. } | VariableKind::Agg(children) => children.iter_mut().collect(),
            VariableKind::Repeat(r) => vec![r.child.as_mut()],
        }
    }

    /// Type of a data leaf, or output type of a relation.
    pub fn descriptor(&self) -> Option<&TypeDescriptor> {
        match &self.kind {
            VariableKind::Data(t) => Some(t),
            VariableKind::Relation(r) => Some(&r.output),
            _ => None,
        }
    }

    /// Depth-first search by name.
    pub fn find(&self, name: &str) -> Option<&Variable> {
        if self.name == name {
            return Some(self);
        }
        self.children().into_iter().find_map(|c| c.find(name))
    }
}
