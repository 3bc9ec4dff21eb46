//! `Shared(T)`: a refcounted heap resource holding one value.
//!
//! The record is `{refcount, payload}`. Every handle holds one reference;
//! the last release destroys the payload and frees the record through a
//! generated destructor.

use tessel_native::{FunctionId, NativeExpr, NativeType, RuntimeFn};

use super::bound_method::bind;
use super::refcount::{
    allocate_record, assign_handle, copy_handle, destroy_handle, emit_incref, load_handle,
    refcount, release_with,
};
use crate::context::ExprContext;
use crate::converter::FunctionKey;
use crate::error::{attribute_error, type_error, CodegenError, CodegenResult};
use crate::repr::{NumericType, TypeRepr};
use crate::typed_expr::TypedExpr;
use crate::wrapper::{ReprFlags, TypeWrapper, Wrapper};

const METHODS: [&str; 3] = ["get", "refcount", "set"];

#[derive(Debug)]
pub struct SharedWrapper {
    repr: TypeRepr,
    payload: Wrapper,
}

impl SharedWrapper {
    pub fn new(repr: TypeRepr, payload: Wrapper) -> Self {
        SharedWrapper { repr, payload }
    }

    pub fn payload(&self) -> &Wrapper {
        &self.payload
    }

    /// Layout of the heap record.
    fn record(&self) -> CodegenResult<NativeType> {
        Ok(NativeType::Struct(vec![
            NativeType::I64,
            self.payload.native_layout()?,
        ]))
    }

    fn payload_ref(&self, handle: &NativeExpr) -> CodegenResult<TypedExpr> {
        let offset = self.record()?.field_offset(1).unwrap_or(8);
        Ok(TypedExpr::reference(
            handle.clone().field_ptr(offset),
            self.payload.clone(),
        ))
    }

    fn self_wrapper(&self, cx: &ExprContext<'_>) -> CodegenResult<Wrapper> {
        cx.wrapper(&self.repr)
    }

    /// A new record whose payload `init` initializes.
    fn allocate<F>(&self, cx: &mut ExprContext<'_>, init: F) -> CodegenResult<NativeExpr>
    where
        F: FnOnce(&mut ExprContext<'_>, &TypedExpr) -> CodegenResult<()>,
    {
        let handle = allocate_record(cx, self.record()?.size());
        let payload = self.payload_ref(&handle)?;
        init(cx, &payload)?;
        Ok(handle)
    }

    fn release(&self, cx: &mut ExprContext<'_>, handle: NativeExpr) -> CodegenResult<()> {
        let wrapper = self.self_wrapper(cx)?;
        release_with(cx, &handle, wrapper, |cx| self.release_function(cx))
    }

    fn release_function(&self, cx: &mut ExprContext<'_>) -> CodegenResult<FunctionId> {
        let wrapper = self.self_wrapper(cx)?;
        let key = FunctionKey::new("release", [wrapper.clone()]);
        cx.define_native_function(key, vec![wrapper], None, |cx, args| {
            let handle = load_handle(cx, &args[0])?;
            let payload = self.payload_ref(&handle)?;
            cx.destroy(&payload)?;
            cx.push_effect(NativeExpr::call_runtime(RuntimeFn::Free, vec![handle]));
            Ok(None)
        })
    }
}

impl TypeWrapper for SharedWrapper {
    fn kind_name(&self) -> &'static str {
        "Shared"
    }

    fn repr(&self) -> &TypeRepr {
        &self.repr
    }

    fn flags(&self) -> ReprFlags {
        ReprFlags::empty()
    }

    fn native_layout(&self) -> CodegenResult<NativeType> {
        Ok(NativeType::Pointer)
    }

    fn convert_default_initialize(&self, cx: &mut ExprContext<'_>, target: &TypedExpr) -> CodegenResult<()> {
        let handle = self.allocate(cx, |cx, payload| cx.default_initialize(payload))?;
        cx.push_effect(target.expr.clone().store(handle, NativeType::Pointer));
        Ok(())
    }

    fn convert_copy_initialize(
        &self,
        cx: &mut ExprContext<'_>,
        target: &TypedExpr,
        source: &TypedExpr,
    ) -> CodegenResult<()> {
        copy_handle(cx, target, source)
    }

    fn convert_assign(
        &self,
        cx: &mut ExprContext<'_>,
        target: &TypedExpr,
        source: &TypedExpr,
    ) -> CodegenResult<()> {
        assign_handle(cx, target, source, |cx, old| self.release(cx, old))
    }

    fn convert_destroy(&self, cx: &mut ExprContext<'_>, target: &TypedExpr) -> CodegenResult<()> {
        destroy_handle(cx, target, |cx, handle| self.release(cx, handle))
    }

    fn convert_incref(&self, cx: &mut ExprContext<'_>, target: &TypedExpr) -> CodegenResult<()> {
        let handle = load_handle(cx, target)?;
        emit_incref(cx, &handle);
        Ok(())
    }

    fn convert_type_call(&self, cx: &mut ExprContext<'_>, mut args: Vec<TypedExpr>) -> CodegenResult<TypedExpr> {
        let wrapper = self.self_wrapper(cx)?;
        match args.len() {
            0 => cx.push_default(&wrapper),
            1 => {
                let value = cx.convert_to(args.remove(0), &self.payload, false)?;
                let handle = self.allocate(cx, |cx, payload| cx.copy_initialize(payload, &value))?;
                cx.push_move(&wrapper, handle)
            }
            found => Err(CodegenError::ConstructorArity {
                name: self.repr.to_string(),
                expected: 1,
                found,
            }),
        }
    }

    fn convert_bool_cast(&self, cx: &mut ExprContext<'_>, _instance: TypedExpr) -> CodegenResult<TypedExpr> {
        Ok(cx.constant_bool(true))
    }

    fn convert_attribute(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        attr: &str,
    ) -> CodegenResult<TypedExpr> {
        if METHODS.contains(&attr) {
            return bind(cx, instance, attr);
        }
        Err(attribute_error(format!(
            "'{}' object has no attribute '{attr}'",
            self.repr
        )))
    }

    fn convert_method_call(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        name: &str,
        mut args: Vec<TypedExpr>,
    ) -> CodegenResult<TypedExpr> {
        match (name, args.len()) {
            ("get", 0) => {
                let handle = load_handle(cx, &instance)?;
                self.payload_ref(&handle)
            }
            ("set", 1) => {
                let value = cx.convert_to(args.remove(0), &self.payload, false)?;
                let handle = load_handle(cx, &instance)?;
                let payload = self.payload_ref(&handle)?;
                cx.assign(&payload, &value)?;
                Ok(cx.none_value())
            }
            ("refcount", 0) => {
                let handle = load_handle(cx, &instance)?;
                let int64 = cx.numeric(NumericType::Int64);
                cx.push_pod(&int64, refcount(&handle))
            }
            _ if METHODS.contains(&name) => Err(type_error(format!(
                "{}.{name}() takes a different number of arguments ({} given)",
                self.repr,
                args.len()
            ))),
            _ => Err(attribute_error(format!(
                "'{}' object has no attribute '{name}'",
                self.repr
            ))),
        }
    }
}
