use std::any::Any;

use crate::context::BridgeContext;
use crate::event_target::EventTargetState;
use crate::host_object::{ClassDef, HostState, PropertyDescriptor, PropertyKind};
use crate::value::{EngineHandle, ScriptValue};
use crate::{Error, Result};

static NODE_COLLECTION_CLASS: ClassDef = ClassDef {
    type_name: "NodeCollection",
    exotic: true,
    properties: &[
        PropertyDescriptor {
            name: "item",
            kind: PropertyKind::Function {
                body: item,
                arity: 1,
            },
        },
        PropertyDescriptor {
            name: "add",
            kind: PropertyKind::Function {
                body: add,
                arity: 1,
            },
        },
        PropertyDescriptor {
            name: "remove",
            kind: PropertyKind::Function {
                body: remove,
                arity: 1,
            },
        },
        PropertyDescriptor {
            name: "length",
            kind: PropertyKind::Accessor {
                getter: get_length,
                setter: None,
            },
        },
    ],
};

/// Live, ordered view over native node references. The collection never
/// owns node lifetime; members it indexes may be released underneath it.
pub struct CollectionState {
    nodes: Vec<EngineHandle>,
}

impl CollectionState {
    pub fn materialize(ctx: &mut BridgeContext, nodes: Vec<EngineHandle>) -> EngineHandle {
        ctx.materialize(Box::new(Self { nodes }))
    }

    pub fn item(&self, index: usize) -> Option<EngineHandle> {
        self.nodes.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert `node` at the end, or immediately before `before`. The
    /// reference position is resolved before any mutation; a reference
    /// that is not a current member is an error, never a silent append.
    pub fn insert(&mut self, node: EngineHandle, before: Option<EngineHandle>) -> Result<()> {
        let Some(reference) = before else {
            self.nodes.push(node);
            return Ok(());
        };
        let Some(position) = self.nodes.iter().position(|&member| member == reference) else {
            return Err(Error::InvalidReference {
                type_name: NODE_COLLECTION_CLASS.type_name.into(),
                operation: "add".into(),
            });
        };
        self.nodes.insert(position, node);
        Ok(())
    }

    pub fn remove_at(&mut self, index: usize) -> Result<EngineHandle> {
        if index >= self.nodes.len() {
            return Err(out_of_range("remove", &index.to_string(), self.nodes.len()));
        }
        Ok(self.nodes.remove(index))
    }
}

impl HostState for CollectionState {
    fn class(&self) -> &'static ClassDef {
        &NODE_COLLECTION_CLASS
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn resolve_exotic(
        &mut self,
        ctx: &mut BridgeContext,
        name: &str,
    ) -> Result<Option<ScriptValue>> {
        // Canonical integer names behave exactly like item().
        if let Ok(index) = name.parse::<usize>() {
            if index.to_string() == name {
                return Ok(self.item(index).map(ScriptValue::Object));
            }
        }
        // Name-based access: first member whose node name matches.
        for &node in &self.nodes {
            let matches = ctx.peek_state(node, |state: &EventTargetState| {
                state.node_name() == Some(name)
            });
            if matches == Some(true) {
                return Ok(Some(ScriptValue::Object(node)));
            }
        }
        Ok(None)
    }
}

fn out_of_range(operation: &str, index: &str, length: usize) -> Error {
    Error::Index {
        type_name: NODE_COLLECTION_CLASS.type_name.into(),
        operation: operation.into(),
        index: index.into(),
        length,
    }
}

fn get_length(ctx: &mut BridgeContext, this: EngineHandle) -> Result<ScriptValue> {
    ctx.with_state(this, "length", |state: &mut CollectionState| {
        ScriptValue::Number(state.len() as i64)
    })
}

fn item(ctx: &mut BridgeContext, this: EngineHandle, args: &[ScriptValue]) -> Result<ScriptValue> {
    let node = match args[0].as_index() {
        Some(index) => ctx.with_state(this, "item", |state: &mut CollectionState| {
            state.item(index)
        })?,
        // Negative or overflowing indices are out of range, not errors.
        None => None,
    };
    Ok(node.map(ScriptValue::Object).unwrap_or(ScriptValue::Undefined))
}

fn add(ctx: &mut BridgeContext, this: EngineHandle, args: &[ScriptValue]) -> Result<ScriptValue> {
    let ScriptValue::Object(node) = &args[0] else {
        return Err(Error::ScriptRuntime(
            "Failed to execute 'add' on 'NodeCollection': first argument should be an object"
                .into(),
        ));
    };
    let node = *node;
    let before = match args.get(1) {
        None | Some(ScriptValue::Undefined) | Some(ScriptValue::Null) => None,
        Some(ScriptValue::Object(reference)) => Some(*reference),
        Some(_) => {
            return Err(Error::InvalidReference {
                type_name: NODE_COLLECTION_CLASS.type_name.into(),
                operation: "add".into(),
            });
        }
    };
    ctx.with_state(this, "add", |state: &mut CollectionState| {
        state.insert(node, before)
    })??;
    Ok(ScriptValue::Undefined)
}

fn remove(ctx: &mut BridgeContext, this: EngineHandle, args: &[ScriptValue]) -> Result<ScriptValue> {
    let length = ctx.with_state(this, "remove", |state: &mut CollectionState| state.len())?;
    let Some(index) = args[0].as_index() else {
        return Err(out_of_range("remove", &args[0].as_string(), length));
    };
    ctx.with_state(this, "remove", |state: &mut CollectionState| {
        state.remove_at(index)
    })??;
    Ok(ScriptValue::Undefined)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handles(ids: &[u64]) -> Vec<EngineHandle> {
        ids.iter().map(|&id| EngineHandle(id)).collect()
    }

    #[test]
    fn insert_before_resolves_position_before_mutation() -> Result<()> {
        let mut collection = CollectionState {
            nodes: handles(&[1, 2, 3]),
        };
        collection.insert(EngineHandle(4), Some(EngineHandle(2)))?;
        assert_eq!(collection.nodes, handles(&[1, 4, 2, 3]));
        Ok(())
    }

    #[test]
    fn insert_with_unknown_reference_is_rejected() {
        let mut collection = CollectionState {
            nodes: handles(&[1, 2]),
        };
        let error = collection
            .insert(EngineHandle(3), Some(EngineHandle(9)))
            .unwrap_err();
        assert!(matches!(error, Error::InvalidReference { .. }));
        // Not silently appended.
        assert_eq!(collection.nodes, handles(&[1, 2]));
    }

    #[test]
    fn remove_is_bounds_checked() {
        let mut collection = CollectionState {
            nodes: handles(&[1]),
        };
        assert!(matches!(
            collection.remove_at(1),
            Err(Error::Index { .. })
        ));
        assert_eq!(collection.remove_at(0).unwrap(), EngineHandle(1));
        assert!(collection.is_empty());
    }
}
