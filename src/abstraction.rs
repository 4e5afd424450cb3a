//! Abstraction: bind a bit stream to a variable tree, producing every valid completion.
//!
//! [`Abstractor::abstract_node`] takes one [`Path`] and returns the ordered list of paths
//! that complete it for the given node. Lists are built eagerly, but their order is the
//! search order and is part of the contract:
//!
//! - **Data** tries candidate lengths from the longest to the shortest;
//! - **Alt** commits to the first child that yields at least one completion;
//! - **Agg** threads the paths of each child into the next one, left to right;
//! - **Repeat** lists completions with more iterations first.
//!
//! A branch that does not fit (too few bits, illegal content, relation mismatch, memorized
//! value mismatch) simply yields nothing. Only the caller decides that an empty result is
//! an error. The number of live paths is capped by `EngineConfig::max_paths`.

use crate::config::EngineConfig;
use crate::error::DomainError;
use crate::memory::Scope;
use crate::path::{Callback, Mode, Path, SegmentValue};
use crate::relation::Relation;
use crate::types::TypeDescriptor;
use crate::variable::{Repeat, RepeatControl, RepeatCount, Variable, VariableKind};

pub struct Abstractor<'a> {
    config: &'a EngineConfig,
}

impl<'a> Abstractor<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Abstractor { config }
    }

    pub fn abstract_node(&self, node: &Variable, path: Path) -> Result<Vec<Path>, DomainError> {
        match &node.kind {
            VariableKind::Data(t) => self.abstract_data(node, t, path),
            VariableKind::Relation(r) => self.abstract_relation(node, r, path),
            VariableKind::Alt { children, .. } => self.abstract_alt(node, children, path),
            VariableKind::Agg(children) => self.abstract_agg(node, children, path),
            VariableKind::Repeat(r) => self.abstract_repeat(node, r, path),
        }
    }

    fn abstract_data(&self, node: &Variable, t: &TypeDescriptor, path: Path) -> Result<Vec<Path>, DomainError> {
        if node.scope == Scope::Session {
            if let Some(expected) = path.memory().get_value(&node.name).cloned() {
                if path.remaining() < expected.len() || path.peek(expected.len()) != expected {
                    log::trace!("{}: differs from memorized session value", node.name);
                    return Ok(Vec::new());
                }
                let mut p = path;
                p.bind(node.id, SegmentValue::Known(expected));
                return Ok(if p.fire_callbacks(Mode::Abstraction)? { vec![p] } else { Vec::new() });
            }
        }

        let step = t.step();
        let min = t.min_len();
        let available = path.remaining();
        let max = t.max_bits.map_or(available, |m| m.min(available));
        if max < min {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        for units in (min.div_ceil(step)..=max / step).rev() {
            let candidate = path.peek(units * step);
            if !t.can_parse(&candidate)? {
                continue;
            }
            let mut p = path.clone();
            if node.scope.is_memorized() {
                p.memory_mut().memorize(&node.name, node.scope, candidate.clone());
            }
            p.bind(node.id, SegmentValue::Known(candidate));
            if !p.fire_callbacks(Mode::Abstraction)? {
                continue;
            }
            out.push(p);
            if out.len() >= self.config.max_paths {
                log::warn!("{}: candidate cap {} reached", node.name, self.config.max_paths);
                break;
            }
        }
        Ok(out)
    }

    fn abstract_relation(&self, node: &Variable, r: &Relation, path: Path) -> Result<Vec<Path>, DomainError> {
        let len = r.output_len();
        if path.remaining() < len {
            return Ok(Vec::new());
        }
        let possible = path.peek(len);
        let mut p = path;
        let seg = p.bind(node.id, SegmentValue::Provisional(possible.clone()));
        match r.compute(node.id, &p)? {
            Some(expected) => {
                if !possible.starts_with(&expected) {
                    log::debug!("{}: got {}, expected {}", node.name, possible, expected);
                    return Ok(Vec::new());
                }
                p.confirm(seg);
            }
            None => {
                let blocking = r.unresolved(node.id, &p).iter().map(|d| d.name.clone()).collect();
                let cb = Callback {
                    var: node.id,
                    name: node.name.clone(),
                    relation: r.clone(),
                    segment: seg,
                    blocking,
                };
                if !p.register(cb, self.config.max_callbacks) {
                    log::warn!("{}: callback queue full, dropping branch", node.name);
                    return Ok(Vec::new());
                }
            }
        }
        Ok(if p.fire_callbacks(Mode::Abstraction)? { vec![p] } else { Vec::new() })
    }

    fn abstract_alt(&self, node: &Variable, children: &[Variable], path: Path) -> Result<Vec<Path>, DomainError> {
        let start = path.segment_count();
        for child in children {
            let completions = self.abstract_node(child, path.clone())?;
            if completions.is_empty() {
                continue;
            }
            log::trace!("{}: matched alternative {}", node.name, child.name);
            return self.close(node, start, completions);
        }
        Ok(Vec::new())
    }

    fn abstract_agg(&self, node: &Variable, children: &[Variable], path: Path) -> Result<Vec<Path>, DomainError> {
        let start = path.segment_count();
        let mut paths = vec![path];
        for child in children {
            let mut next = Vec::new();
            for p in paths {
                next.extend(self.abstract_node(child, p)?);
                if next.len() > self.config.max_paths {
                    log::warn!("{}: path cap {} reached at {}", node.name, self.config.max_paths, child.name);
                    next.truncate(self.config.max_paths);
                    break;
                }
            }
            if next.is_empty() {
                return Ok(Vec::new());
            }
            paths = next;
        }
        self.close(node, start, paths)
    }

    fn abstract_repeat(&self, node: &Variable, r: &Repeat, path: Path) -> Result<Vec<Path>, DomainError> {
        let start = path.segment_count();
        let (min, max, predicate) = match &r.count {
            RepeatCount::Fixed(n) => (*n, *n, None),
            RepeatCount::Range(a, b) => (*a, b.unwrap_or(self.config.max_repeat.max(*a)), None),
            RepeatCount::Field(dep) => match path.value_of(dep.id).and_then(|v| r.field_count(&v)) {
                Some(n) if n > self.config.max_repeat => {
                    log::debug!("{}: count {} exceeds max_repeat {}", node.name, n, self.config.max_repeat);
                    return Ok(Vec::new());
                }
                Some(n) => (n, n, None),
                None => {
                    log::trace!("{}: count field {} not bound", node.name, dep.name);
                    return Ok(Vec::new());
                }
            },
            RepeatCount::Predicate(p) => (0, self.config.max_repeat, Some(p)),
        };

        // (iterations, path) pairs that may end the repeat.
        let mut done: Vec<(usize, Path)> = Vec::new();
        if min == 0 && predicate.is_none() {
            done.push((0, path.clone()));
        }
        let mut current = vec![path];
        for i in 1..=max {
            let mut next = Vec::new();
            for p in current {
                let before = p.position();
                let mut q = p.clone();
                if i > 1 {
                    if let Some(d) = &r.delimiter {
                        if q.remaining() < d.len() || q.peek(d.len()) != *d {
                            if predicate.is_some() {
                                done.push((i - 1, p));
                            }
                            continue;
                        }
                        q.push_segment(node.id, SegmentValue::Known(d.clone()));
                    }
                }
                let completions = self.abstract_node(&r.child, q)?;
                if completions.is_empty() && predicate.is_some() {
                    done.push((i - 1, p));
                    continue;
                }
                for c in completions {
                    let progressed = c.position() > before;
                    match predicate {
                        Some(pred) => {
                            let value = c.value_of(r.child.id()).unwrap_or_default();
                            match (pred.0)(i, &value) {
                                RepeatControl::Continue if i < max && progressed => next.push(c),
                                RepeatControl::Continue | RepeatControl::StopAfter => done.push((i, c)),
                                RepeatControl::StopBefore => done.push((i - 1, p.clone())),
                            }
                        }
                        None => {
                            if i >= min {
                                done.push((i, c.clone()));
                            }
                            if progressed || matches!(r.count, RepeatCount::Fixed(_)) {
                                next.push(c);
                            }
                        }
                    }
                }
                if next.len() > self.config.max_paths {
                    log::warn!("{}: path cap {} reached at iteration {}", node.name, self.config.max_paths, i);
                    next.truncate(self.config.max_paths);
                }
            }
            if next.is_empty() {
                break;
            }
            current = next;
        }

        // More iterations first; stable within one count.
        done.sort_by(|a, b| b.0.cmp(&a.0));
        let paths: Vec<Path> = done.into_iter().map(|(_, p)| p).collect();
        self.close(node, start, paths)
    }

    /// Record composite spans, fire callbacks that waited for them, drop invalidated paths.
    fn close(&self, node: &Variable, start: usize, paths: Vec<Path>) -> Result<Vec<Path>, DomainError> {
        let mut out = Vec::with_capacity(paths.len());
        for mut p in paths {
            p.close_span(node.id, start);
            if p.fire_callbacks(Mode::Abstraction)? {
                out.push(p);
            }
        }
        Ok(out)
    }
}
