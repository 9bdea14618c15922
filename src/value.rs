use std::fmt;
use std::rc::Rc;

use num_bigint::BigInt as JsBigInt;
use num_traits::{ToPrimitive, Zero};

use crate::Result;
use crate::context::BridgeContext;

/// Opaque identity assigned by the engine when a native object is
/// materialized as a script value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle(pub(crate) u64);

pub type FunctionBody =
    dyn Fn(&mut BridgeContext, &ScriptValue, &[ScriptValue]) -> Result<ScriptValue>;

/// An engine-created callable value. Equality is identity, so a handler
/// property reads back as the exact value that was assigned.
#[derive(Clone)]
pub struct ScriptFunction {
    id: u64,
    body: Rc<FunctionBody>,
}

impl ScriptFunction {
    pub(crate) fn new(
        id: u64,
        body: impl Fn(&mut BridgeContext, &ScriptValue, &[ScriptValue]) -> Result<ScriptValue>
        + 'static,
    ) -> Self {
        Self {
            id,
            body: Rc::new(body),
        }
    }

    pub fn call(
        &self,
        ctx: &mut BridgeContext,
        this: &ScriptValue,
        args: &[ScriptValue],
    ) -> Result<ScriptValue> {
        (self.body)(ctx, this, args)
    }
}

impl PartialEq for ScriptFunction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for ScriptFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScriptFunction(#{})", self.id)
    }
}

/// A native function resolved from a bridged object's static table. Carries
/// the engine handle, never a native pointer, so a call after the owner was
/// released re-resolves through the registry and fails fast instead of
/// dereferencing freed state.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundMethod {
    pub target: EngineHandle,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Undefined,
    Null,
    Bool(bool),
    Number(i64),
    Float(f64),
    BigInt(JsBigInt),
    String(String),
    Object(EngineHandle),
    Function(ScriptFunction),
    Method(BoundMethod),
}

impl ScriptValue {
    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(v) => *v,
            Self::Number(v) => *v != 0,
            Self::Float(v) => *v != 0.0 && !v.is_nan(),
            Self::BigInt(v) => !v.is_zero(),
            Self::String(v) => !v.is_empty(),
            Self::Object(_) | Self::Function(_) | Self::Method(_) => true,
        }
    }

    pub fn as_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".into(),
            Self::Null => "null".into(),
            Self::Bool(v) => {
                if *v {
                    "true".into()
                } else {
                    "false".into()
                }
            }
            Self::Number(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::BigInt(v) => v.to_string(),
            Self::String(v) => v.clone(),
            Self::Object(handle) => format!("[object #{}]", handle.0),
            Self::Function(fun) => format!("function #{}", fun.id),
            Self::Method(method) => format!("function {}() {{ [native code] }}", method.name),
        }
    }

    /// Numeric coercion used by data accessors. `BigInt` does not coerce
    /// implicitly, matching engine semantics.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Number(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Collection-index coercion. Negative, non-finite, and fractional
    /// inputs do not name an index and map to the out-of-range path.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Number(v) => v.to_usize(),
            Self::Float(v) => {
                if v.fract() == 0.0 {
                    v.to_usize()
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_) | Self::Method(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_coercion_rejects_negative_and_fractional() {
        assert_eq!(ScriptValue::Number(3).as_index(), Some(3));
        assert_eq!(ScriptValue::Float(2.0).as_index(), Some(2));
        assert_eq!(ScriptValue::Number(-1).as_index(), None);
        assert_eq!(ScriptValue::Float(2.5).as_index(), None);
        assert_eq!(ScriptValue::Float(f64::NAN).as_index(), None);
        assert_eq!(ScriptValue::Float(f64::INFINITY).as_index(), None);
        assert_eq!(ScriptValue::String("2".into()).as_index(), None);
    }

    #[test]
    fn float_coercion_covers_numeric_variants_only() {
        assert_eq!(ScriptValue::Bool(true).as_float(), Some(1.0));
        assert_eq!(ScriptValue::Number(7).as_float(), Some(7.0));
        assert_eq!(ScriptValue::Float(1.5).as_float(), Some(1.5));
        assert_eq!(ScriptValue::BigInt(JsBigInt::from(7)).as_float(), None);
        assert_eq!(ScriptValue::String("7".into()).as_float(), None);
    }

    #[test]
    fn truthiness_matches_engine_rules() {
        assert!(!ScriptValue::Undefined.truthy());
        assert!(!ScriptValue::Null.truthy());
        assert!(!ScriptValue::Float(f64::NAN).truthy());
        assert!(!ScriptValue::BigInt(JsBigInt::from(0)).truthy());
        assert!(ScriptValue::BigInt(JsBigInt::from(-2)).truthy());
        assert!(ScriptValue::String("x".into()).truthy());
        assert!(ScriptValue::Object(EngineHandle(1)).truthy());
    }
}
