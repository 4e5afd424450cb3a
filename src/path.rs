//! Paths: the bindings accumulated by one abstraction or specialization attempt.
//!
//! A [`Path`] records leaf values as an ordered list of segments (wire order) and, for every
//! variable walked so far, the range of segments that makes up its value. Composite values
//! are therefore never stored: they are read back from the segments, so a relation resolved
//! late is automatically reflected in every aggregate that contains it.
//!
//! Branching clones the path (segments, callbacks and the memory view); nothing is shared
//! between alternatives. When an attempt succeeds the caller takes the winning path's
//! memory as the new session memory.
//!
//! ## Callback protocol
//!
//! A relation whose dependencies are not all bound registers a [`Callback`]. After each
//! binding (leaf, composite completion or resolved placeholder), [`Path::fire_callbacks`]
//! scans the queue in registration order and evaluates every callback whose dependencies
//! became available:
//!
//! - while parsing, the provisional wire value must start with the computed value, else the
//!   path is invalidated;
//! - while specializing, the pending placeholder is replaced by the computed value.
//!
//! After a callback fires the scan restarts from the head of the queue, so earlier
//! registrations always get the first chance.

use crate::error::DomainError;
use crate::memory::Memory;
use crate::relation::Relation;
use crate::value::Bits;
use crate::variable::VarId;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum SegmentValue {
    /// Final value.
    Known(Bits),
    /// Wire value of a relation not validated yet (parsing only).
    Provisional(Bits),
    /// Placeholder of a relation not computed yet (specialization only), with its length.
    Pending(usize),
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub var: VarId,
    pub value: SegmentValue,
}

#[derive(Debug, Clone)]
pub struct Callback {
    pub var: VarId,
    pub name: String,
    pub relation: Relation,
    pub segment: usize,
    /// Names of the dependencies that were missing when the callback was registered.
    pub blocking: Vec<String>,
}

/// What a dependency looks like in a path.
#[derive(Debug, Clone, PartialEq)]
pub enum DepState {
    Value(Bits),
    /// Contains a placeholder; only the total length is known.
    Pending(usize),
    Unbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Abstraction,
    Specialization,
}

#[derive(Debug, Clone)]
pub struct Path {
    segments: Vec<Segment>,
    spans: HashMap<VarId, (usize, usize)>,
    callbacks: VecDeque<Callback>,
    memory: Memory,
    input: Option<Arc<Bits>>,
    pos: usize,
}

impl Path {
    /// Path consuming `input` from its first bit.
    pub fn for_parsing(input: Arc<Bits>, memory: Memory) -> Self {
        Path {
            segments: Vec::new(),
            spans: HashMap::new(),
            callbacks: VecDeque::new(),
            memory,
            input: Some(input),
            pos: 0,
        }
    }

    pub fn for_specializing(memory: Memory) -> Self {
        Path {
            segments: Vec::new(),
            spans: HashMap::new(),
            callbacks: VecDeque::new(),
            memory,
            input: None,
            pos: 0,
        }
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn into_memory(self) -> Memory {
        self.memory
    }

    /// Unconsumed input bits (0 when specializing).
    pub fn remaining(&self) -> usize {
        self.input.as_ref().map_or(0, |i| i.len() - self.pos)
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Next `n` unconsumed bits (fewer if the input is shorter).
    pub fn peek(&self, n: usize) -> Bits {
        match &self.input {
            Some(i) => i.slice(self.pos, self.pos + n),
            None => Bits::new(),
        }
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Bind a leaf value; consumes its length from the input when parsing.
    pub fn bind(&mut self, var: VarId, value: SegmentValue) -> usize {
        let idx = self.push_segment(var, value);
        self.spans.insert(var, (idx, idx + 1));
        idx
    }

    /// Append wire bits owned by `var` without making them `var`'s value (repeat delimiters).
    pub fn push_segment(&mut self, var: VarId, value: SegmentValue) -> usize {
        if self.input.is_some() {
            self.pos += match &value {
                SegmentValue::Known(b) | SegmentValue::Provisional(b) => b.len(),
                SegmentValue::Pending(n) => *n,
            };
        }
        self.segments.push(Segment { var, value });
        self.segments.len() - 1
    }

    /// Record that `var`'s value is made of the segments appended since `start`.
    pub fn close_span(&mut self, var: VarId, start: usize) {
        self.spans.insert(var, (start, self.segments.len()));
    }

    pub fn is_bound(&self, var: VarId) -> bool {
        self.spans.contains_key(&var)
    }

    /// Dependency view of `var`; segments owned by `self_var` read as zeros.
    pub fn dep_state(&self, var: VarId, self_var: VarId) -> DepState {
        let Some(&(start, end)) = self.spans.get(&var) else {
            return DepState::Unbound;
        };
        let mut out = Bits::new();
        let mut pending = false;
        let mut len = 0usize;
        for seg in &self.segments[start..end] {
            let n = match &seg.value {
                SegmentValue::Known(b) | SegmentValue::Provisional(b) => b.len(),
                SegmentValue::Pending(n) => *n,
            };
            len += n;
            if pending {
                continue;
            }
            match &seg.value {
                _ if seg.var == self_var => out.extend(&Bits::zeros(n)),
                SegmentValue::Known(b) | SegmentValue::Provisional(b) => out.extend(b),
                SegmentValue::Pending(_) => pending = true,
            }
        }
        if pending {
            DepState::Pending(len)
        } else {
            DepState::Value(out)
        }
    }

    /// Current value of `var`, if bound and free of placeholders.
    pub fn value_of(&self, var: VarId) -> Option<Bits> {
        match self.dep_state(var, crate::variable::UNASSIGNED) {
            DepState::Value(b) => Some(b),
            _ => None,
        }
    }

    /// Every bound variable with its current value.
    pub fn bound_values(&self) -> Vec<(VarId, Bits)> {
        let mut ids: Vec<VarId> = self.spans.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter().filter_map(|id| self.value_of(id).map(|v| (id, v))).collect()
    }

    /// Concatenation of all segments; fails while a placeholder is left.
    pub fn output(&self) -> Result<Bits, DomainError> {
        let mut out = Bits::new();
        for seg in &self.segments {
            match &seg.value {
                SegmentValue::Known(b) | SegmentValue::Provisional(b) => out.extend(b),
                SegmentValue::Pending(_) => {
                    return Err(DomainError::UnresolvableRelation {
                        relation: format!("#{}", seg.var),
                        missing: "placeholder never computed".to_string(),
                    })
                }
            }
        }
        Ok(out)
    }

    pub fn callbacks(&self) -> impl Iterator<Item = &Callback> {
        self.callbacks.iter()
    }

    pub fn has_callbacks(&self) -> bool {
        !self.callbacks.is_empty()
    }

    /// Queue a deferred relation. Returns false when the queue already holds `limit` entries.
    pub fn register(&mut self, cb: Callback, limit: usize) -> bool {
        if self.callbacks.len() >= limit {
            return false;
        }
        log::trace!("deferring relation {} (waiting for {:?})", cb.name, cb.blocking);
        self.callbacks.push_back(cb);
        true
    }

    /// Mark a provisional segment as validated.
    pub fn confirm(&mut self, segment: usize) {
        if let Some(seg) = self.segments.get_mut(segment) {
            if let SegmentValue::Provisional(b) = &seg.value {
                seg.value = SegmentValue::Known(b.clone());
            }
        }
    }

    /// Replace a pending placeholder with its computed value.
    pub fn resolve(&mut self, segment: usize, value: Bits) {
        if let Some(seg) = self.segments.get_mut(segment) {
            seg.value = SegmentValue::Known(value);
        }
    }

    /// Fire every callback whose dependencies are available. Returns `Ok(false)` when a
    /// parsing callback invalidates the path.
    pub fn fire_callbacks(&mut self, mode: Mode) -> Result<bool, DomainError> {
        'scan: loop {
            for i in 0..self.callbacks.len() {
                let cb = &self.callbacks[i];
                let Some(expected) = cb.relation.compute(cb.var, self)? else {
                    continue;
                };
                let Some(cb) = self.callbacks.remove(i) else {
                    break 'scan;
                };
                let seg = &mut self.segments[cb.segment];
                let wire = match &seg.value {
                    SegmentValue::Provisional(b) | SegmentValue::Known(b) => Some(b.clone()),
                    SegmentValue::Pending(_) => None,
                };
                match (mode, wire) {
                    (Mode::Abstraction, Some(possible)) => {
                        if !possible.starts_with(&expected) {
                            log::debug!(
                                "relation {} mismatch: got {}, expected {}",
                                cb.name,
                                possible,
                                expected
                            );
                            return Ok(false);
                        }
                        seg.value = SegmentValue::Known(possible);
                    }
                    _ => {
                        log::trace!("relation {} resolved to {}", cb.name, expected);
                        seg.value = SegmentValue::Known(expected);
                    }
                }
                continue 'scan;
            }
            break;
        }
        Ok(true)
    }
}
