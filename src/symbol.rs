//! Fields and symbols: the message-format layer on top of variable trees.
//!
//! A [`Symbol`] is an ordered list of [`Field`]s; its domain is the aggregate of the field
//! domains. Construction assigns every variable an id, resolves relation and repeat
//! dependencies by name, and validates every type descriptor, so a `Symbol` that exists
//! is always walkable.

use crate::error::DomainError;
use crate::types::TypeDescriptor;
use crate::variable::{RepeatCount, VarId, Variable, VariableKind};
use std::collections::HashMap;

/// One named field of a message format.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub domain: Variable,
}

impl Field {
    /// The domain's root variable takes the field's name.
    pub fn new(name: &str, mut domain: Variable) -> Self {
        domain.name = name.to_string();
        Field {
            name: name.to_string(),
            domain,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    root: Variable,
    field_names: Vec<String>,
    /// Variable names indexed by id.
    names: Vec<String>,
}

impl Symbol {
    pub fn new(name: &str, fields: Vec<Field>) -> Result<Self, DomainError> {
        let field_names: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
        let mut root = Variable::agg(name, fields.into_iter().map(|f| f.domain).collect());
        let mut names = Vec::new();
        let mut ids = HashMap::new();
        assign_ids(&mut root, &mut names, &mut ids)?;
        let mut types = HashMap::new();
        collect_types(&root, &mut types);
        resolve(&mut root, &ids, &types)?;
        log::debug!("symbol {}: {} fields, {} variables", name, field_names.len(), names.len());
        Ok(Symbol {
            name: name.to_string(),
            root,
            field_names,
            names,
        })
    }

    /// Aggregate of all field domains.
    pub fn root(&self) -> &Variable {
        &self.root
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub fn fields(&self) -> Vec<&Variable> {
        self.root.children()
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.root.find(name)
    }

    pub fn var_name(&self, id: VarId) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn var_id(&self, name: &str) -> Option<VarId> {
        self.names.iter().position(|n| n == name)
    }

    pub fn variable_count(&self) -> usize {
        self.names.len()
    }
}

fn assign_ids(
    var: &mut Variable,
    names: &mut Vec<String>,
    ids: &mut HashMap<String, VarId>,
) -> Result<(), DomainError> {
    let id = names.len();
    var.id = id;
    if ids.insert(var.name.clone(), id).is_some() {
        return Err(DomainError::DuplicateVariable(var.name.clone()));
    }
    names.push(var.name.clone());
    let parent = var.name.clone();
    for (i, child) in var.children_mut().into_iter().enumerate() {
        if child.name.is_empty() {
            child.name = format!("{}.{}", parent, i);
        }
        assign_ids(child, names, ids)?;
    }
    Ok(())
}

fn collect_types(var: &Variable, types: &mut HashMap<String, TypeDescriptor>) {
    if let Some(t) = var.descriptor() {
        types.insert(var.name.clone(), t.clone());
    }
    for child in var.children() {
        collect_types(child, types);
    }
}

fn resolve(
    var: &mut Variable,
    ids: &HashMap<String, VarId>,
    types: &HashMap<String, TypeDescriptor>,
) -> Result<(), DomainError> {
    let lookup = |name: &str| {
        ids.get(name)
            .copied()
            .ok_or_else(|| DomainError::UnknownVariable(format!("{} (referenced by {})", name, var.name)))
    };
    match &var.kind {
        VariableKind::Data(t) => t.validate()?,
        VariableKind::Relation(r) => validate_relation_output(&var.name, &r.output)?,
        _ => {}
    }
    let resolved: Vec<VarId> = match &var.kind {
        VariableKind::Relation(r) => r.deps.iter().map(|d| lookup(&d.name)).collect::<Result<_, _>>()?,
        VariableKind::Repeat(r) => match &r.count {
            RepeatCount::Field(d) => vec![lookup(&d.name)?],
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    match &mut var.kind {
        VariableKind::Relation(r) => {
            for (d, id) in r.deps.iter_mut().zip(resolved) {
                d.id = id;
            }
        }
        VariableKind::Repeat(r) => {
            if let (RepeatCount::Field(d), Some(id)) = (&mut r.count, resolved.first()) {
                d.id = *id;
                r.count_type = types.get(&d.name).cloned();
            }
        }
        _ => {}
    }
    for child in var.children_mut() {
        resolve(child, ids, types)?;
    }
    Ok(())
}

fn validate_relation_output(name: &str, output: &TypeDescriptor) -> Result<(), DomainError> {
    output.validate()?;
    match output.max_bits {
        Some(n) if n > 0 => Ok(()),
        _ => Err(DomainError::MalformedDescriptor(format!(
            "relation {} must declare a bounded output length",
            name
        ))),
    }
}
