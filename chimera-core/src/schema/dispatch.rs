//! # Interface Dispatch Table
//!
//! Flattens an interface's own and inherited methods into one resolved,
//! name-keyed method set. Ambiguous multiple inheritance (two parents
//! declaring the same method name with different signatures) is rejected here,
//! at schema-finalization time, rather than resolved by precedence at call
//! time.
use super::registry::SchemaError;
use super::types::{InterfaceDescriptor, MethodDescriptor, TypeName};
use std::collections::{HashMap, HashSet};

/// Unknown-method lookup failure, scoped to one call.
#[derive(Debug, thiserror::Error)]
#[error("interface '{interface}' has no method '{method}'")]
pub struct UnknownMethod {
    pub interface: String,
    pub method: String,
}

/// The flattened, conflict-free set of methods an interface exposes,
/// including inherited ones.
#[derive(Debug, Clone)]
pub struct MethodTable {
    interface: TypeName,
    methods: Vec<MethodDescriptor>,
}

impl MethodTable {
    /// Collects the interface's own methods plus the flattened methods of
    /// every parent, de-duplicating by name.
    ///
    /// Parents are visited depth-first in declaration order, so inherited
    /// methods precede own ones in the table. Identical re-declarations of a
    /// method collapse silently; differing signatures fail with
    /// [`SchemaError::ConflictingMethod`].
    pub(crate) fn flatten(
        desc: &InterfaceDescriptor,
        interfaces: &HashMap<TypeName, InterfaceDescriptor>,
    ) -> Result<Self, SchemaError> {
        let mut methods = Vec::new();
        let mut visited = HashSet::new();
        collect(desc, interfaces, &mut methods, &mut visited, desc.name())?;
        Ok(Self {
            interface: desc.name().to_string(),
            methods,
        })
    }

    /// The interface this table was flattened for.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// All methods, inherited first, in flattening order.
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    /// Resolves a method by name.
    pub fn lookup(&self, method: &str) -> Result<&MethodDescriptor, UnknownMethod> {
        self.methods
            .iter()
            .find(|m| m.name() == method)
            .ok_or_else(|| UnknownMethod {
                interface: self.interface.clone(),
                method: method.to_string(),
            })
    }
}

fn collect<'a>(
    desc: &'a InterfaceDescriptor,
    interfaces: &'a HashMap<TypeName, InterfaceDescriptor>,
    methods: &mut Vec<MethodDescriptor>,
    visited: &mut HashSet<&'a str>,
    root: &str,
) -> Result<(), SchemaError> {
    if !visited.insert(desc.name()) {
        return Ok(());
    }
    for parent in desc.parents() {
        // Unresolved parents were rejected before flattening runs.
        if let Some(parent_desc) = interfaces.get(parent) {
            collect(parent_desc, interfaces, methods, visited, root)?;
        }
    }
    for method in desc.declared_methods() {
        merge(methods, method, root)?;
    }
    Ok(())
}

fn merge(
    methods: &mut Vec<MethodDescriptor>,
    method: &MethodDescriptor,
    root: &str,
) -> Result<(), SchemaError> {
    match methods.iter().find(|m| m.name() == method.name()) {
        Some(existing) if existing.same_signature(method) => Ok(()),
        Some(_) => Err(SchemaError::ConflictingMethod {
            interface: root.to_string(),
            method: method.name().to_string(),
        }),
        None => {
            methods.push(method.clone());
            Ok(())
        }
    }
}
