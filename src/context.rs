use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::host_object::{BridgedObject, HostState, PropertyDescriptor, PropertyKind};
use crate::value::{BoundMethod, EngineHandle, ScriptFunction, ScriptValue};
use crate::{Error, Result};

/// The engine's failure-propagation channel, injected so embedders and
/// tests observe surfaced failures without process-wide state.
pub trait FailureSink {
    fn report(&self, error: &Error);
}

/// Default sink: routes surfaced failures to the log facade.
pub struct LogSink;

impl FailureSink for LogSink {
    fn report(&self, error: &Error) {
        log::error!("script failure: {error}");
    }
}

/// Outcome of a handled property write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// A static setter or an exotic hook accepted the value.
    Handled,
    /// Static miss on a non-exotic object: the value became an ad-hoc slot
    /// on the engine-side representation, outside the bridged object's own
    /// bookkeeping.
    AdHoc,
}

enum Lookup {
    Static {
        descriptor: PropertyDescriptor,
        type_name: &'static str,
    },
    Exotic {
        type_name: &'static str,
    },
    Miss,
}

/// Session-scoped registry tying engine-side identities back to native
/// objects, plus the get/set/call surface the engine intercepts against.
///
/// All of this runs on the single script-execution thread; the registry is
/// never locked.
pub struct BridgeContext {
    objects: HashMap<EngineHandle, Rc<RefCell<BridgedObject>>>,
    ad_hoc: HashMap<EngineHandle, HashMap<String, ScriptValue>>,
    sink: Rc<dyn FailureSink>,
    next_handle: u64,
    next_function: u64,
}

impl BridgeContext {
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            ad_hoc: HashMap::new(),
            sink: Rc::new(LogSink),
            next_handle: 1,
            next_function: 0,
        }
    }

    pub fn set_failure_sink(&mut self, sink: Rc<dyn FailureSink>) {
        self.sink = sink;
    }

    pub(crate) fn report_failure(&self, error: &Error) {
        self.sink.report(error);
    }

    /// Register a native object as backing a fresh script value and hand
    /// back the engine-side identity.
    pub fn materialize(&mut self, state: Box<dyn HostState>) -> EngineHandle {
        let handle = EngineHandle(self.next_handle);
        self.next_handle += 1;
        let object = BridgedObject::new(handle, state);
        self.objects.insert(handle, Rc::new(RefCell::new(object)));
        handle
    }

    /// Create an engine-side callable value.
    pub fn create_function(
        &mut self,
        body: impl Fn(&mut BridgeContext, &ScriptValue, &[ScriptValue]) -> Result<ScriptValue>
        + 'static,
    ) -> ScriptFunction {
        self.next_function += 1;
        ScriptFunction::new(self.next_function, body)
    }

    pub fn is_live(&self, handle: EngineHandle) -> bool {
        self.objects
            .get(&handle)
            .is_some_and(|entry| !entry.borrow().released())
    }

    /// Property read. `Ok(None)` is the notFound channel and maps to
    /// `undefined` on the engine surface, never an error.
    pub fn get(&mut self, handle: EngineHandle, name: &str) -> Result<Option<ScriptValue>> {
        let lookup = match self.begin_access(handle, name) {
            Ok(lookup) => lookup,
            // Reads on a released object degrade to absence; the native
            // diagnostic was already emitted.
            Err(Error::UseAfterRelease { .. }) => return Ok(None),
            Err(other) => return Err(other),
        };
        match lookup {
            Lookup::Static { descriptor, .. } => match descriptor.kind {
                PropertyKind::Accessor { getter, .. } => getter(self, handle).map(Some),
                PropertyKind::Function { .. } => Ok(Some(ScriptValue::Method(BoundMethod {
                    target: handle,
                    name: name.into(),
                }))),
            },
            Lookup::Exotic { .. } => self.exotic_get(handle, name),
            Lookup::Miss => Ok(self
                .ad_hoc
                .get(&handle)
                .and_then(|slots| slots.get(name))
                .cloned()),
        }
    }

    /// Property write. Rejections surface as errors so the engine can
    /// raise them into script; they are never silently dropped.
    pub fn set(&mut self, handle: EngineHandle, name: &str, value: ScriptValue) -> Result<SetOutcome> {
        let lookup = self.begin_access(handle, name)?;
        match lookup {
            Lookup::Static {
                descriptor,
                type_name,
            } => match descriptor.kind {
                PropertyKind::Accessor {
                    setter: Some(setter),
                    ..
                } => {
                    setter(self, handle, value)?;
                    Ok(SetOutcome::Handled)
                }
                _ => Err(Error::ReadOnlyProperty {
                    type_name: type_name.into(),
                    property: name.into(),
                }),
            },
            Lookup::Exotic { type_name } => {
                if self.exotic_set(handle, name, value)? {
                    Ok(SetOutcome::Handled)
                } else {
                    Err(Error::Unhandled {
                        type_name: type_name.into(),
                        property: name.into(),
                    })
                }
            }
            Lookup::Miss => {
                self.ad_hoc
                    .entry(handle)
                    .or_default()
                    .insert(name.into(), value);
                Ok(SetOutcome::AdHoc)
            }
        }
    }

    /// Invoke a named function on a bridged object. Argument counts below
    /// the declared arity are rejected, never read out of bounds.
    pub fn call(
        &mut self,
        handle: EngineHandle,
        name: &str,
        args: &[ScriptValue],
    ) -> Result<ScriptValue> {
        let lookup = self.begin_access(handle, name)?;
        match lookup {
            Lookup::Static {
                descriptor,
                type_name,
            } => match descriptor.kind {
                PropertyKind::Function { body, arity } => {
                    if args.len() < arity {
                        return Err(Error::Arity {
                            type_name: type_name.into(),
                            function: name.into(),
                            expected: arity,
                            got: args.len(),
                        });
                    }
                    body(self, handle, args)
                }
                PropertyKind::Accessor { .. } => Err(Error::ScriptRuntime(format!(
                    "'{name}' on '{type_name}' is not a function"
                ))),
            },
            Lookup::Exotic { type_name } => {
                let resolved = self.exotic_get(handle, name)?;
                self.call_resolved(resolved, handle, name, type_name, args)
            }
            Lookup::Miss => {
                let resolved = self
                    .ad_hoc
                    .get(&handle)
                    .and_then(|slots| slots.get(name))
                    .cloned();
                let type_name = self.type_name_of(handle);
                self.call_resolved(resolved, handle, name, type_name, args)
            }
        }
    }

    /// Invoke an arbitrary callable value. Bound methods re-resolve their
    /// receiver through the registry, so a stale method fails fast.
    pub fn invoke_value(
        &mut self,
        callable: &ScriptValue,
        this: &ScriptValue,
        args: &[ScriptValue],
    ) -> Result<ScriptValue> {
        match callable {
            ScriptValue::Function(fun) => fun.call(self, this, args),
            ScriptValue::Method(method) => {
                let method = method.clone();
                self.call(method.target, &method.name, args)
            }
            other => Err(Error::ScriptRuntime(format!(
                "{} is not a function",
                other.as_string()
            ))),
        }
    }

    /// Idempotent teardown: whichever side calls first wins, the other
    /// becomes a no-op. Order: neutralize stored callbacks, release owned
    /// sub-objects, unregister. Unregistration happens before the
    /// engine-side reference drops, so reclamation can never precede it.
    pub fn release(&mut self, handle: EngineHandle) {
        let Some(entry) = self.objects.get(&handle).cloned() else {
            return;
        };
        let children = {
            let mut object = entry.borrow_mut();
            match object.begin_release() {
                Some(children) => {
                    log::debug!(
                        "released '{}' object (handle {:?})",
                        object.type_name(),
                        object.handle()
                    );
                    children
                }
                None => return,
            }
        };
        for child in children {
            self.release(child);
        }
        self.ad_hoc.remove(&handle);
        self.objects.remove(&handle);
    }

    /// Run a scoped operation against the typed native state behind a
    /// handle. Fails fast once release has begun.
    pub fn with_state<S: HostState, R>(
        &mut self,
        handle: EngineHandle,
        operation: &str,
        f: impl FnOnce(&mut S) -> R,
    ) -> Result<R> {
        let Some(entry) = self.objects.get(&handle).cloned() else {
            return Err(self.use_after_release("object", operation, handle));
        };
        let mut object = entry.borrow_mut();
        if object.released() {
            let type_name = object.type_name();
            return Err(self.use_after_release(type_name, operation, handle));
        }
        let type_name = object.type_name();
        match object.state_mut().as_any_mut().downcast_mut::<S>() {
            Some(state) => Ok(f(state)),
            None => Err(Error::ScriptRuntime(format!(
                "'{operation}' is not supported on '{type_name}'"
            ))),
        }
    }

    /// Non-erroring peek at typed state; `None` if the handle is gone,
    /// released, or of a different type.
    pub fn peek_state<S: HostState, R>(
        &self,
        handle: EngineHandle,
        f: impl FnOnce(&S) -> R,
    ) -> Option<R> {
        let entry = self.objects.get(&handle)?;
        let object = entry.borrow();
        if object.released() {
            return None;
        }
        object.state().as_any().downcast_ref::<S>().map(f)
    }

    fn begin_access(&self, handle: EngineHandle, name: &str) -> Result<Lookup> {
        let Some(entry) = self.objects.get(&handle) else {
            return Err(self.use_after_release("object", name, handle));
        };
        let object = entry.borrow();
        if object.released() {
            return Err(self.use_after_release(object.type_name(), name, handle));
        }
        Ok(match object.descriptor(name) {
            Some(descriptor) => Lookup::Static {
                descriptor,
                type_name: object.type_name(),
            },
            None if object.is_exotic() => Lookup::Exotic {
                type_name: object.type_name(),
            },
            None => Lookup::Miss,
        })
    }

    fn exotic_get(&mut self, handle: EngineHandle, name: &str) -> Result<Option<ScriptValue>> {
        let Some(entry) = self.objects.get(&handle).cloned() else {
            return Ok(None);
        };
        let mut object = entry.borrow_mut();
        if object.released() {
            return Ok(None);
        }
        object.state_mut().resolve_exotic(self, name)
    }

    fn exotic_set(&mut self, handle: EngineHandle, name: &str, value: ScriptValue) -> Result<bool> {
        let Some(entry) = self.objects.get(&handle).cloned() else {
            return Ok(false);
        };
        let mut object = entry.borrow_mut();
        if object.released() {
            return Ok(false);
        }
        object.state_mut().assign_exotic(self, name, value)
    }

    fn call_resolved(
        &mut self,
        resolved: Option<ScriptValue>,
        handle: EngineHandle,
        name: &str,
        type_name: &str,
        args: &[ScriptValue],
    ) -> Result<ScriptValue> {
        match resolved {
            Some(value) if value.is_callable() => {
                let this = ScriptValue::Object(handle);
                self.invoke_value(&value, &this, args)
            }
            _ => Err(Error::ScriptRuntime(format!(
                "'{name}' on '{type_name}' is not a function"
            ))),
        }
    }

    fn type_name_of(&self, handle: EngineHandle) -> &'static str {
        self.objects
            .get(&handle)
            .map(|entry| entry.borrow().type_name())
            .unwrap_or("object")
    }

    fn use_after_release(&self, type_name: &str, operation: &str, handle: EngineHandle) -> Error {
        let error = Error::UseAfterRelease {
            type_name: type_name.into(),
            operation: operation.into(),
        };
        // Native-side diagnostic: this indicates a lifetime bug in the
        // embedder, but it must never crash the process.
        log::warn!("{error} (handle {handle:?})");
        error
    }
}

impl Default for BridgeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BridgeContext {
    fn drop(&mut self) {
        // Context teardown forces invalidation of everything it owns.
        let handles: Vec<EngineHandle> = self.objects.keys().copied().collect();
        for handle in handles {
            self.release(handle);
        }
    }
}
