//! Specialization: produce one concrete value for a variable tree.
//!
//! Each leaf is resolved by its scope:
//!
//! | Scope | Value |
//! |-------|-------|
//! | Constant | memorized value, else the fixed value, else [`DomainError::NoValue`] |
//! | Session, Message | memorized value, else a fresh value that is then memorized |
//! | None | always a fresh value |
//!
//! A preset (variable name → bits) overrides all of the above, for leaves and composites.
//! Relations are always recomputed. A relation whose dependencies are not generated yet
//! binds a pending placeholder of its output length and is completed by its callback.

use crate::config::EngineConfig;
use crate::error::DomainError;
use crate::memory::Scope;
use crate::path::{Callback, Mode, Path, SegmentValue};
use crate::relation::Relation;
use crate::types::TypeDescriptor;
use crate::value::Bits;
use crate::variable::{Repeat, RepeatControl, RepeatCount, Variable, VariableKind};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use std::collections::HashMap;

/// Values forced onto named variables during specialization.
pub type Presets = HashMap<String, Bits>;

pub struct Specializer<'a> {
    config: &'a EngineConfig,
    presets: &'a Presets,
    rng: &'a mut dyn RngCore,
}

impl<'a> Specializer<'a> {
    pub fn new(config: &'a EngineConfig, presets: &'a Presets, rng: &'a mut dyn RngCore) -> Self {
        Specializer { config, presets, rng }
    }

    pub fn specialize_node(&mut self, node: &Variable, path: Path) -> Result<Path, DomainError> {
        if let Some(value) = self.presets.get(&node.name) {
            let mut p = path;
            if node.scope.is_memorized() {
                p.memory_mut().memorize(&node.name, node.scope, value.clone());
            }
            p.bind(node.id, SegmentValue::Known(value.clone()));
            p.fire_callbacks(Mode::Specialization)?;
            return Ok(p);
        }
        match &node.kind {
            VariableKind::Data(t) => self.specialize_data(node, t, path),
            VariableKind::Relation(r) => self.specialize_relation(node, r, path),
            VariableKind::Alt { children, mutable } => self.specialize_alt(node, children, *mutable, path),
            VariableKind::Agg(children) => self.specialize_agg(node, children, path),
            VariableKind::Repeat(r) => self.specialize_repeat(node, r, path),
        }
    }

    fn specialize_data(&mut self, node: &Variable, t: &TypeDescriptor, path: Path) -> Result<Path, DomainError> {
        let mut p = path;
        let remembered = p.memory().get_value(&node.name).cloned();
        let value = match node.scope {
            Scope::Constant => remembered
                .or_else(|| t.fixed.clone())
                .ok_or_else(|| DomainError::NoValue(node.name.clone()))?,
            Scope::Session | Scope::Message => match remembered {
                Some(v) => v,
                None => self.regenerate_and_memorize(node, t, &mut p)?,
            },
            Scope::None => t.generate(&mut *self.rng, self.config.max_generated_bits)?,
        };
        p.bind(node.id, SegmentValue::Known(value));
        p.fire_callbacks(Mode::Specialization)?;
        Ok(p)
    }

    fn regenerate_and_memorize(&mut self, node: &Variable, t: &TypeDescriptor, p: &mut Path) -> Result<Bits, DomainError> {
        let value = t.generate(&mut *self.rng, self.config.max_generated_bits)?;
        p.memory_mut().memorize(&node.name, node.scope, value.clone());
        Ok(value)
    }

    fn specialize_relation(&mut self, node: &Variable, r: &Relation, path: Path) -> Result<Path, DomainError> {
        let mut p = path;
        let seg = p.bind(node.id, SegmentValue::Pending(r.output_len()));
        match r.compute(node.id, &p)? {
            Some(value) => {
                log::trace!("{} = {}", node.name, value);
                p.resolve(seg, value);
            }
            None => {
                let blocking: Vec<String> = r.unresolved(node.id, &p).iter().map(|d| d.name.clone()).collect();
                let cb = Callback {
                    var: node.id,
                    name: node.name.clone(),
                    relation: r.clone(),
                    segment: seg,
                    blocking,
                };
                if !p.register(cb, self.config.max_callbacks) {
                    return Err(DomainError::UnresolvableRelation {
                        relation: node.name.clone(),
                        missing: format!("callback queue full ({} pending)", self.config.max_callbacks),
                    });
                }
            }
        }
        p.fire_callbacks(Mode::Specialization)?;
        Ok(p)
    }

    fn specialize_alt(
        &mut self,
        node: &Variable,
        children: &[Variable],
        mutable: bool,
        path: Path,
    ) -> Result<Path, DomainError> {
        let start = path.segment_count();
        let mut order: Vec<&Variable> = children.iter().collect();
        if mutable {
            order.shuffle(&mut *self.rng);
        }
        let mut last_err = None;
        for child in order {
            match self.specialize_node(child, path.clone()) {
                Ok(p) => return self.close(node, start, p),
                Err(e) => {
                    log::debug!("{}: alternative {} failed: {}", node.name, child.name, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| DomainError::NoValue(node.name.clone())))
    }

    fn specialize_agg(&mut self, node: &Variable, children: &[Variable], path: Path) -> Result<Path, DomainError> {
        let start = path.segment_count();
        let mut p = path;
        for child in children {
            p = self.specialize_node(child, p)?;
        }
        self.close(node, start, p)
    }

    fn specialize_repeat(&mut self, node: &Variable, r: &Repeat, path: Path) -> Result<Path, DomainError> {
        let start = path.segment_count();
        let mut p = path;
        match &r.count {
            RepeatCount::Predicate(pred) => {
                for i in 1..=self.config.max_repeat {
                    let before = p.clone();
                    let q = self.iteration(node, r, i, p)?;
                    let value = q.value_of(r.child.id()).unwrap_or_default();
                    match (pred.0)(i, &value) {
                        RepeatControl::Continue => p = q,
                        RepeatControl::StopAfter => {
                            p = q;
                            break;
                        }
                        RepeatControl::StopBefore => {
                            p = before;
                            break;
                        }
                    }
                }
            }
            count => {
                let n = match count {
                    RepeatCount::Fixed(n) => *n,
                    RepeatCount::Range(a, b) => {
                        let hi = b.unwrap_or(self.config.max_repeat.max(*a));
                        self.rng.gen_range(*a..=hi.max(*a))
                    }
                    RepeatCount::Field(dep) => {
                        let n = p
                            .value_of(dep.id)
                            .and_then(|v| r.field_count(&v))
                            .ok_or_else(|| DomainError::NoValue(format!("{} (count of {})", dep.name, node.name)))?;
                        if n > self.config.max_repeat {
                            return Err(DomainError::RepeatLimit {
                                repeat: node.name.clone(),
                                count: n,
                                max: self.config.max_repeat,
                            });
                        }
                        n
                    }
                    RepeatCount::Predicate(_) => 0,
                };
                for i in 1..=n {
                    p = self.iteration(node, r, i, p)?;
                }
            }
        }
        self.close(node, start, p)
    }

    fn iteration(&mut self, node: &Variable, r: &Repeat, i: usize, mut p: Path) -> Result<Path, DomainError> {
        if i > 1 {
            if let Some(d) = &r.delimiter {
                p.push_segment(node.id, SegmentValue::Known(d.clone()));
            }
        }
        self.specialize_node(&r.child, p)
    }

    fn close(&self, node: &Variable, start: usize, mut p: Path) -> Result<Path, DomainError> {
        p.close_span(node.id, start);
        p.fire_callbacks(Mode::Specialization)?;
        Ok(p)
    }
}
