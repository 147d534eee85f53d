//! Globals and hidden machinery installed into every QuickJS context.

use super::convert;
use super::handles::HandleTable;
use crate::class::{ClassSpec, NativeConstructor};
use crate::error::BridgeError;
use crate::runtime::PrivateFinalizer;
use crate::value::{ObjectHandle, Value};
use rquickjs::class::{JsClass, Trace, Tracer, Writable};
use rquickjs::function::{Constructor, Rest, This};
use rquickjs::object::Property;
use rquickjs::{Class, Coerced, Ctx, Exception, Function, JsLifetime, Object};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Property holding the private-data carrier of an object
const PRIVATE_KEY: &str = "__jsbPrivate";

/// Property holding the objects an object keeps alive for native code
const CHILDREN_KEY: &str = "__jsbChildren";

// ============================================================================
// Global functions
// ============================================================================

/// Define `log(...values)` and `forceGC()` on the global object.
///
/// `forceGC` collects right away and bumps `gc_requests`; the runtime reports
/// the cycle to the bridge once control is back in native code.
pub(super) fn install_globals<'js>(
    ctx: &Ctx<'js>,
    gc_requests: Rc<Cell<u32>>,
) -> Result<(), BridgeError> {
    let globals = ctx.globals();

    let log = Function::new(ctx.clone(), |values: Rest<Coerced<String>>| {
        let text = values
            .0
            .into_iter()
            .map(|value| value.0)
            .collect::<Vec<_>>()
            .join(" ");
        tracing::debug!("JS: {}", text);
    })?
    .with_name("log")?;
    globals.set("log", log)?;

    let force_gc = Function::new(ctx.clone(), move |ctx: Ctx<'js>| {
        ctx.run_gc();
        gc_requests.set(gc_requests.get().saturating_add(1));
    })?
    .with_name("forceGC")?;
    globals.set("forceGC", force_gc)?;

    Ok(())
}

/// Report a promise rejection nobody handled as a warning.
pub(super) fn report_unhandled_rejection<'js>(
    ctx: Ctx<'js>,
    _promise: rquickjs::Value<'js>,
    reason: rquickjs::Value<'js>,
    is_handled: bool,
) {
    if is_handled {
        return;
    }
    let report = convert::diagnose(&ctx, &reason);
    tracing::warn!("{}:{}:{}", report.file_name, report.line, report.message);
}

// ============================================================================
// Private data carrier
// ============================================================================

/// Hidden class whose instances hold a native payload for another object.
/// Dropping an instance hands the payload to its finalizer.
pub(super) struct PrivateData {
    payload: Option<Box<dyn Any>>,
    finalize: Option<PrivateFinalizer>,
}

unsafe impl<'js> JsLifetime<'js> for PrivateData {
    type Changed<'to> = PrivateData;
}

impl<'js> Trace<'js> for PrivateData {
    fn trace<'a>(&self, _tracer: Tracer<'a, 'js>) {}
}

impl<'js> JsClass<'js> for PrivateData {
    const NAME: &'static str = "__PrivateData";

    type Mutable = Writable;

    fn constructor(_ctx: &Ctx<'js>) -> rquickjs::Result<Option<Constructor<'js>>> {
        Ok(None)
    }
}

impl Drop for PrivateData {
    fn drop(&mut self) {
        if let (Some(payload), Some(finalize)) = (self.payload.take(), self.finalize.take()) {
            finalize(payload);
        }
    }
}

pub(super) fn install_private_data_class(ctx: &Ctx<'_>) -> Result<(), BridgeError> {
    Class::<PrivateData>::prototype(ctx)?;
    tracing::debug!("Installed {} class", PrivateData::NAME);
    Ok(())
}

/// Attach `payload` to `target`, replacing (and finalizing) any earlier one.
pub(super) fn attach_private_data<'js>(
    ctx: &Ctx<'js>,
    target: &Object<'js>,
    payload: Box<dyn Any>,
    finalize: Option<PrivateFinalizer>,
) -> Result<(), BridgeError> {
    let carrier = Class::instance(
        ctx.clone(),
        PrivateData {
            payload: Some(payload),
            finalize,
        },
    )?;
    target.prop(PRIVATE_KEY, Property::from(carrier.into_inner()).configurable())?;
    Ok(())
}

// ============================================================================
// Ownership edges
// ============================================================================

fn child_key(child: ObjectHandle) -> String {
    format!("h{}", child.index())
}

pub(super) fn attach_child<'js>(
    ctx: &Ctx<'js>,
    owner: &Object<'js>,
    child: ObjectHandle,
    child_object: Object<'js>,
) -> Result<(), BridgeError> {
    let holder = match owner.get::<_, Option<Object>>(CHILDREN_KEY)? {
        Some(holder) => holder,
        None => {
            let holder = Object::new(ctx.clone())?;
            owner.prop(CHILDREN_KEY, Property::from(holder.clone()).configurable())?;
            holder
        }
    };
    holder.set(child_key(child), child_object)?;
    Ok(())
}

pub(super) fn detach_child(owner: &Object<'_>, child: ObjectHandle) -> Result<(), BridgeError> {
    if let Some(holder) = owner.get::<_, Option<Object>>(CHILDREN_KEY)? {
        holder.remove(child_key(child))?;
    }
    Ok(())
}

// ============================================================================
// Native classes
// ============================================================================

/// Define a constructor named after the class on the global object. The
/// parent class must already be installed.
///
/// The constructor closure must not capture script values, since the
/// collector cannot trace native closures. Instances take their prototype
/// from `new.target`.
pub(super) fn install_class<'js>(
    ctx: &Ctx<'js>,
    spec: &ClassSpec,
    handles: Rc<RefCell<HandleTable>>,
) -> Result<(), BridgeError> {
    let globals = ctx.globals();
    let prototype = Object::new(ctx.clone())?;
    if let Some(parent) = &spec.parent {
        let parent_constructor = globals
            .get::<_, Option<Object>>(parent.as_str())?
            .ok_or_else(|| {
                BridgeError::engine(format!("parent class {} is not installed", parent))
            })?;
        let parent_prototype: Object = parent_constructor.get("prototype")?;
        prototype.set_prototype(Some(&parent_prototype))?;
    }

    let name = spec.name.clone();
    let native = spec.constructor.clone();
    let finalizer = spec.finalizer.clone();
    let constructor = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>,
              new_target: This<rquickjs::Value<'js>>,
              args: Rest<rquickjs::Value<'js>>|
              -> rquickjs::Result<Object<'js>> {
            let Some(target) = new_target.0.as_function() else {
                return Err(Exception::throw_type(
                    &ctx,
                    &format!("class constructor {} cannot be invoked without 'new'", name),
                ));
            };
            let instance_prototype: Option<Object> = target.get("prototype")?;
            let instance = Object::new(ctx.clone())?;
            instance.set_prototype(instance_prototype.as_ref())?;

            let payload = match &native {
                Some(native) => construct_payload(&ctx, &handles, native, args.0)
                    .map_err(|err| Exception::throw_message(&ctx, &format!("{}: {}", name, err)))?,
                None => None,
            };
            if let Some(payload) = payload {
                let finalize = finalizer.clone().map(|finalizer| {
                    Box::new(move |payload: Box<dyn Any>| finalizer(payload)) as PrivateFinalizer
                });
                attach_private_data(&ctx, &instance, payload, finalize)
                    .map_err(|err| Exception::throw_internal(&ctx, &err.to_string()))?;
            }
            Ok(instance)
        },
    )?
    .with_name(&spec.name)?
    .with_constructor(true);

    constructor.prop("prototype", Property::from(prototype.clone()))?;
    prototype.prop(
        "constructor",
        Property::from(constructor.clone()).writable().configurable(),
    )?;
    globals.set(spec.name.as_str(), constructor)?;
    tracing::debug!("Installed class {}", spec.name);
    Ok(())
}

/// Run a native constructor. Object arguments get handles that are released
/// again once the constructor returns.
fn construct_payload<'js>(
    ctx: &Ctx<'js>,
    handles: &RefCell<HandleTable>,
    native: &NativeConstructor,
    args: Vec<rquickjs::Value<'js>>,
) -> Result<Option<Box<dyn Any>>, BridgeError> {
    let mut values = Vec::with_capacity(args.len());
    let mut converted = Ok(());
    for arg in args {
        match convert::from_js(ctx, handles, arg) {
            Ok(value) => values.push(value),
            Err(err) => {
                converted = Err(err);
                break;
            }
        }
    }
    let result = converted.and_then(|()| native(&values));

    for handle in values.iter().filter_map(Value::as_object) {
        let slot = handles.borrow_mut().remove(handle);
        drop(slot);
    }
    result
}
