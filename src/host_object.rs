//! Static descriptor tables and the bridged-object liveness gate.

use std::any::Any;
use std::collections::HashMap;

use crate::Result;
use crate::context::BridgeContext;
use crate::value::{EngineHandle, ScriptValue};

pub type Getter = fn(&mut BridgeContext, EngineHandle) -> Result<ScriptValue>;
pub type Setter = fn(&mut BridgeContext, EngineHandle, ScriptValue) -> Result<()>;
pub type MethodBody = fn(&mut BridgeContext, EngineHandle, &[ScriptValue]) -> Result<ScriptValue>;

#[derive(Clone, Copy)]
pub enum PropertyKind {
    /// Named data slot backed by a native getter and an optional setter.
    /// A missing setter makes the property read-only.
    Accessor {
        getter: Getter,
        setter: Option<Setter>,
    },
    /// Named native function with a required minimum argument count.
    Function { body: MethodBody, arity: usize },
}

#[derive(Clone, Copy)]
pub struct PropertyDescriptor {
    pub name: &'static str,
    pub kind: PropertyKind,
}

/// Declarative shape of a concrete bridged type: its diagnostic name, the
/// fixed property set, and whether misses fall through to the exotic hooks.
pub struct ClassDef {
    pub type_name: &'static str,
    pub exotic: bool,
    pub properties: &'static [PropertyDescriptor],
}

/// Native state backing one bridged object.
///
/// The exotic hooks are capability-gated: they are only consulted when
/// `ClassDef::exotic` is set, and only after a static-table miss, so a
/// declared name can never be shadowed. Hooks receive the context for
/// cross-object lookups but must not re-resolve their own handle.
pub trait HostState: Any {
    fn class(&self) -> &'static ClassDef;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn resolve_exotic(
        &mut self,
        _ctx: &mut BridgeContext,
        _name: &str,
    ) -> Result<Option<ScriptValue>> {
        Ok(None)
    }

    fn assign_exotic(
        &mut self,
        _ctx: &mut BridgeContext,
        _name: &str,
        _value: ScriptValue,
    ) -> Result<bool> {
        Ok(false)
    }

    /// Release step (a): neutralize every stored callback value that could
    /// call back into this object.
    fn clear_callbacks(&mut self) {}

    /// Release step (b): handles of exclusively-owned sub-objects, released
    /// with their owner.
    fn owned_children(&self) -> Vec<EngineHandle> {
        Vec::new()
    }
}

pub(crate) struct BridgedObject {
    handle: EngineHandle,
    type_name: &'static str,
    exotic: bool,
    // Per-instance table; built from the class at construction and dropped
    // with the owner, never shared between objects.
    table: HashMap<&'static str, PropertyDescriptor>,
    state: Box<dyn HostState>,
    released: bool,
}

impl BridgedObject {
    pub(crate) fn new(handle: EngineHandle, state: Box<dyn HostState>) -> Self {
        let class = state.class();
        let table = class
            .properties
            .iter()
            .map(|descriptor| (descriptor.name, *descriptor))
            .collect();
        Self {
            handle,
            type_name: class.type_name,
            exotic: class.exotic,
            table,
            state,
            released: false,
        }
    }

    pub(crate) fn handle(&self) -> EngineHandle {
        self.handle
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn is_exotic(&self) -> bool {
        self.exotic
    }

    pub(crate) fn descriptor(&self, name: &str) -> Option<PropertyDescriptor> {
        self.table.get(name).copied()
    }

    pub(crate) fn released(&self) -> bool {
        self.released
    }

    /// First caller wins; everything after observes `released` and fails
    /// fast. Returns the owned sub-object handles to release next.
    pub(crate) fn begin_release(&mut self) -> Option<Vec<EngineHandle>> {
        if self.released {
            return None;
        }
        self.released = true;
        self.state.clear_callbacks();
        Some(self.state.owned_children())
    }

    pub(crate) fn state(&self) -> &dyn HostState {
        self.state.as_ref()
    }

    pub(crate) fn state_mut(&mut self) -> &mut dyn HostState {
        self.state.as_mut()
    }
}
