//! Host-object bridging layer for embedded script engines: materializes
//! native objects as script-visible values, routes property access and
//! calls back into native accessors, and keeps native ownership and
//! engine reachability consistent through idempotent release.

use std::error::Error as StdError;
use std::fmt;

mod context;
mod debugger;
mod event_target;
mod host_object;
mod node_collection;
mod value;
mod window;

pub use context::{BridgeContext, FailureSink, LogSink, SetOutcome};
pub use debugger::{DebugHost, DebugPhase, DebuggerBridge};
pub use event_target::{DispatchResult, EventTargetState};
pub use host_object::{
    ClassDef, Getter, HostState, MethodBody, PropertyDescriptor, PropertyKind, Setter,
};
pub use node_collection::CollectionState;
pub use value::{BoundMethod, EngineHandle, ScriptFunction, ScriptValue};
pub use window::{LocationState, WindowState};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    ReadOnlyProperty {
        type_name: String,
        property: String,
    },
    Unhandled {
        type_name: String,
        property: String,
    },
    Arity {
        type_name: String,
        function: String,
        expected: usize,
        got: usize,
    },
    Index {
        type_name: String,
        operation: String,
        index: String,
        length: usize,
    },
    InvalidReference {
        type_name: String,
        operation: String,
    },
    UseAfterRelease {
        type_name: String,
        operation: String,
    },
    ScriptRuntime(String),
    DebuggerTransition {
        from: &'static str,
        to: &'static str,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnlyProperty {
                type_name,
                property,
            } => write!(
                f,
                "Failed to set property '{property}' on '{type_name}': property is read-only"
            ),
            Self::Unhandled {
                type_name,
                property,
            } => write!(
                f,
                "Failed to set property '{property}' on '{type_name}': assignment was not handled"
            ),
            Self::Arity {
                type_name,
                function,
                expected,
                got,
            } => write!(
                f,
                "Failed to execute '{function}' on '{type_name}': {expected} arguments required, but only {got} present"
            ),
            Self::Index {
                type_name,
                operation,
                index,
                length,
            } => write!(
                f,
                "Failed to execute '{operation}' on '{type_name}': index {index} is out of range (length {length})"
            ),
            Self::InvalidReference {
                type_name,
                operation,
            } => write!(
                f,
                "Failed to execute '{operation}' on '{type_name}': the reference node is not a member"
            ),
            Self::UseAfterRelease {
                type_name,
                operation,
            } => write!(
                f,
                "'{operation}' was invoked on a released '{type_name}' object"
            ),
            Self::ScriptRuntime(msg) => write!(f, "script runtime error: {msg}"),
            Self::DebuggerTransition { from, to } => {
                write!(f, "invalid debugger transition: {from} -> {to}")
            }
        }
    }
}

impl StdError for Error {}
