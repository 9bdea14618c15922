use std::any::Any;

use crate::context::BridgeContext;
use crate::host_object::{ClassDef, HostState, PropertyDescriptor, PropertyKind};
use crate::value::{EngineHandle, ScriptValue};
use crate::Result;

static WINDOW_CLASS: ClassDef = ClassDef {
    type_name: "Window",
    exotic: false,
    properties: &[
        PropertyDescriptor {
            name: "devicePixelRatio",
            kind: PropertyKind::Accessor {
                getter: get_device_pixel_ratio,
                setter: None,
            },
        },
        PropertyDescriptor {
            name: "location",
            kind: PropertyKind::Accessor {
                getter: get_location,
                setter: None,
            },
        },
        PropertyDescriptor {
            name: "onload",
            kind: PropertyKind::Accessor {
                getter: get_onload,
                setter: Some(set_onload),
            },
        },
    ],
};

static LOCATION_CLASS: ClassDef = ClassDef {
    type_name: "Location",
    exotic: false,
    properties: &[PropertyDescriptor {
        name: "href",
        kind: PropertyKind::Accessor {
            getter: get_href,
            setter: None,
        },
    }],
};

/// Top-level bridged object with a single-slot load handler and an
/// exclusively-owned location sub-object that is released with it.
pub struct WindowState {
    device_pixel_ratio: f64,
    onload: ScriptValue,
    location: Option<EngineHandle>,
}

pub struct LocationState {
    href: String,
}

impl WindowState {
    pub fn materialize(ctx: &mut BridgeContext, href: &str, device_pixel_ratio: f64) -> EngineHandle {
        let location = ctx.materialize(Box::new(LocationState {
            href: href.to_string(),
        }));
        ctx.materialize(Box::new(Self {
            device_pixel_ratio,
            onload: ScriptValue::Undefined,
            location: Some(location),
        }))
    }
}

impl HostState for WindowState {
    fn class(&self) -> &'static ClassDef {
        &WINDOW_CLASS
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clear_callbacks(&mut self) {
        self.onload = ScriptValue::Undefined;
    }

    fn owned_children(&self) -> Vec<EngineHandle> {
        self.location.into_iter().collect()
    }
}

impl HostState for LocationState {
    fn class(&self) -> &'static ClassDef {
        &LOCATION_CLASS
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn get_device_pixel_ratio(ctx: &mut BridgeContext, this: EngineHandle) -> Result<ScriptValue> {
    ctx.with_state(this, "devicePixelRatio", |state: &mut WindowState| {
        ScriptValue::Float(state.device_pixel_ratio)
    })
}

fn get_location(ctx: &mut BridgeContext, this: EngineHandle) -> Result<ScriptValue> {
    ctx.with_state(this, "location", |state: &mut WindowState| {
        state
            .location
            .map(ScriptValue::Object)
            .unwrap_or(ScriptValue::Undefined)
    })
}

fn get_onload(ctx: &mut BridgeContext, this: EngineHandle) -> Result<ScriptValue> {
    ctx.with_state(this, "onload", |state: &mut WindowState| state.onload.clone())
}

fn set_onload(ctx: &mut BridgeContext, this: EngineHandle, value: ScriptValue) -> Result<()> {
    ctx.with_state(this, "onload", |state: &mut WindowState| {
        state.onload = if value.is_callable() {
            value
        } else {
            ScriptValue::Undefined
        };
    })
}

fn get_href(ctx: &mut BridgeContext, this: EngineHandle) -> Result<ScriptValue> {
    ctx.with_state(this, "href", |state: &mut LocationState| {
        ScriptValue::String(state.href.clone())
    })
}

impl BridgeContext {
    /// Deliver the load event to the window's handler slot, if any.
    /// Delivery against a released window is moot and skipped.
    pub fn invoke_onload(&mut self, window: EngineHandle) -> Result<Option<ScriptValue>> {
        stacker::grow(32 * 1024 * 1024, || self.invoke_onload_inner(window))
    }

    fn invoke_onload_inner(&mut self, window: EngineHandle) -> Result<Option<ScriptValue>> {
        let Some(callback) = self.peek_state(window, |state: &WindowState| state.onload.clone())
        else {
            log::debug!("onload skipped for released window (handle {window:?})");
            return Ok(None);
        };
        if !callback.is_callable() {
            return Ok(None);
        }
        let this = ScriptValue::Object(window);
        self.invoke_value(&callback, &this, &[]).map(Some)
    }
}
