use std::any::Any;
use std::collections::HashMap;
use std::slice;

use crate::context::BridgeContext;
use crate::host_object::{ClassDef, HostState, PropertyDescriptor, PropertyKind};
use crate::value::{EngineHandle, ScriptValue};
use crate::{Error, Result};

static EVENT_TARGET_CLASS: ClassDef = ClassDef {
    type_name: "EventTarget",
    exotic: true,
    properties: &[
        PropertyDescriptor {
            name: "addEventListener",
            kind: PropertyKind::Function {
                body: add_event_listener,
                arity: 2,
            },
        },
        PropertyDescriptor {
            name: "removeEventListener",
            kind: PropertyKind::Function {
                body: remove_event_listener,
                arity: 2,
            },
        },
        PropertyDescriptor {
            name: "dispatchEvent",
            kind: PropertyKind::Function {
                body: dispatch_event,
                arity: 1,
            },
        },
    ],
};

/// Native state for a script-visible event target.
///
/// Listener lists and handler-property slots are independent channels and
/// never merge: the slot is overwrite-on-assign, the lists append in
/// registration order. Both are cleared when the owner is released.
pub struct EventTargetState {
    name: Option<String>,
    listeners: HashMap<String, Vec<ScriptValue>>,
    handler_slots: HashMap<String, ScriptValue>,
}

impl EventTargetState {
    pub fn materialize(ctx: &mut BridgeContext, name: Option<&str>) -> EngineHandle {
        ctx.materialize(Box::new(Self {
            name: name.map(str::to_string),
            listeners: HashMap::new(),
            handler_slots: HashMap::new(),
        }))
    }

    pub(crate) fn node_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn listeners_for(&self, event_type: &str) -> Vec<ScriptValue> {
        self.listeners.get(event_type).cloned().unwrap_or_default()
    }

    fn handler_for(&self, event_type: &str) -> Option<ScriptValue> {
        self.handler_slots.get(&format!("on{event_type}")).cloned()
    }

    fn set_handler_slot(&mut self, property: &str, value: ScriptValue) {
        if value.is_callable() {
            self.handler_slots.insert(property.to_string(), value);
        } else {
            // Assigning a non-callable value clears the slot.
            self.handler_slots.remove(property);
        }
    }
}

impl HostState for EventTargetState {
    fn class(&self) -> &'static ClassDef {
        &EVENT_TARGET_CLASS
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn resolve_exotic(
        &mut self,
        _ctx: &mut BridgeContext,
        name: &str,
    ) -> Result<Option<ScriptValue>> {
        if name.starts_with("on") {
            return Ok(self.handler_slots.get(name).cloned());
        }
        Ok(None)
    }

    fn assign_exotic(
        &mut self,
        _ctx: &mut BridgeContext,
        name: &str,
        value: ScriptValue,
    ) -> Result<bool> {
        if !name.starts_with("on") {
            return Ok(false);
        }
        self.set_handler_slot(name, value);
        Ok(true)
    }

    fn clear_callbacks(&mut self) {
        // Replace the stores wholesale so no half-cleared list is ever
        // observable mid-call.
        self.listeners = HashMap::new();
        self.handler_slots = HashMap::new();
    }
}

/// Outcome of one event delivery.
#[derive(Debug, Default)]
pub struct DispatchResult {
    /// Return value of the handler-property callback, if one was set.
    pub handler_return: Option<ScriptValue>,
    /// Total callbacks invoked (handler slot plus listeners).
    pub invoked: usize,
    /// Per-callback failures; each was already surfaced to the failure
    /// sink without aborting the remaining listeners.
    pub failures: Vec<Error>,
}

impl BridgeContext {
    /// Append `callback` to the listener list for `event_type`. Duplicates
    /// are kept; a non-callable value is ignored.
    pub fn add_listener(
        &mut self,
        target: EngineHandle,
        event_type: &str,
        callback: ScriptValue,
    ) -> Result<()> {
        if !callback.is_callable() {
            return Ok(());
        }
        self.with_state(target, "addEventListener", |state: &mut EventTargetState| {
            state
                .listeners
                .entry(event_type.to_string())
                .or_default()
                .push(callback);
        })
    }

    /// Remove the first listener identical to `callback`; returns whether
    /// one was found.
    pub fn remove_listener(
        &mut self,
        target: EngineHandle,
        event_type: &str,
        callback: &ScriptValue,
    ) -> Result<bool> {
        self.with_state(
            target,
            "removeEventListener",
            |state: &mut EventTargetState| {
                let Some(entries) = state.listeners.get_mut(event_type) else {
                    return false;
                };
                let Some(position) = entries.iter().position(|entry| entry == callback) else {
                    return false;
                };
                entries.remove(position);
                if entries.is_empty() {
                    state.listeners.remove(event_type);
                }
                true
            },
        )
    }

    /// Store (callable) or clear (anything else) the single handler slot
    /// for a property such as `onclick`.
    pub fn set_handler_property(
        &mut self,
        target: EngineHandle,
        property: &str,
        value: ScriptValue,
    ) -> Result<()> {
        self.with_state(target, "setHandlerProperty", |state: &mut EventTargetState| {
            state.set_handler_slot(property, value);
        })
    }

    /// Deliver a native-originated event into the script-visible target.
    pub fn dispatch(
        &mut self,
        target: EngineHandle,
        event_type: &str,
        event: ScriptValue,
    ) -> Result<DispatchResult> {
        stacker::grow(32 * 1024 * 1024, || {
            self.dispatch_inner(target, event_type, event)
        })
    }

    fn dispatch_inner(
        &mut self,
        target: EngineHandle,
        event_type: &str,
        event: ScriptValue,
    ) -> Result<DispatchResult> {
        // Clone both channels out up front so callbacks can re-enter the
        // context (including releasing the target) without holding borrows.
        let (handler, listeners) =
            self.with_state(target, "dispatchEvent", |state: &mut EventTargetState| {
                (state.handler_for(event_type), state.listeners_for(event_type))
            })?;

        let this = ScriptValue::Object(target);
        let mut result = DispatchResult::default();

        // Handler property first, then listeners in insertion order.
        if let Some(handler) = handler {
            result.invoked += 1;
            match self.invoke_value(&handler, &this, slice::from_ref(&event)) {
                Ok(value) => result.handler_return = Some(value),
                Err(error) => {
                    self.report_failure(&error);
                    result.failures.push(error);
                }
            }
        }
        for listener in listeners {
            result.invoked += 1;
            // One failing listener must not suppress the rest.
            if let Err(error) = self.invoke_value(&listener, &this, slice::from_ref(&event)) {
                self.report_failure(&error);
                result.failures.push(error);
            }
        }
        Ok(result)
    }
}

fn add_event_listener(
    ctx: &mut BridgeContext,
    this: EngineHandle,
    args: &[ScriptValue],
) -> Result<ScriptValue> {
    ctx.add_listener(this, &args[0].as_string(), args[1].clone())?;
    Ok(ScriptValue::Undefined)
}

fn remove_event_listener(
    ctx: &mut BridgeContext,
    this: EngineHandle,
    args: &[ScriptValue],
) -> Result<ScriptValue> {
    ctx.remove_listener(this, &args[0].as_string(), &args[1])?;
    Ok(ScriptValue::Undefined)
}

fn dispatch_event(
    ctx: &mut BridgeContext,
    this: EngineHandle,
    args: &[ScriptValue],
) -> Result<ScriptValue> {
    let event_type = args[0].as_string();
    let event = args.get(1).cloned().unwrap_or(ScriptValue::Undefined);
    let result = ctx.dispatch(this, &event_type, event)?;
    Ok(ScriptValue::Bool(result.failures.is_empty()))
}
