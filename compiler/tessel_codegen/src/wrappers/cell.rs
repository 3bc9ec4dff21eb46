//! `Cell(T)`: a refcounted cell that may or may not hold a value.
//!
//! The record is `{refcount, initialized, payload}`; the payload is live
//! exactly when `initialized` is nonzero. A payload may contain cells of
//! the same type, so releasing, setting and clearing are generated
//! functions that reach themselves through the function registry.

use tessel_native::{
    ErrorCategory, FunctionId, NativeBinOp, NativeExpr, NativeType, NativeUnOp, RuntimeFn,
};

use super::bound_method::bind;
use super::refcount::{
    allocate_record, assign_handle, copy_handle, destroy_handle, emit_incref, load_handle,
    release_with,
};
use crate::context::ExprContext;
use crate::converter::FunctionKey;
use crate::error::{attribute_error, type_error, CodegenError, CodegenResult};
use crate::repr::TypeRepr;
use crate::typed_expr::TypedExpr;
use crate::wrapper::{ReprFlags, TypeWrapper, Wrapper};

const INITIALIZED: u32 = 8;
const EMPTY_CELL: &str = "Cell is empty";

const METHODS: [&str; 4] = ["clear", "get", "isSet", "set"];

fn is_set(handle: &NativeExpr) -> NativeExpr {
    handle
        .clone()
        .field_ptr(INITIALIZED)
        .load(NativeType::I64)
        .binary(NativeBinOp::Ne, NativeExpr::i64(0))
}

fn set_flag(cx: &mut ExprContext<'_>, handle: &NativeExpr, set: bool) {
    cx.push_effect(
        handle
            .clone()
            .field_ptr(INITIALIZED)
            .store(NativeExpr::i64(i64::from(set)), NativeType::I64),
    );
}

#[derive(Debug)]
pub struct CellWrapper {
    repr: TypeRepr,
    payload: Wrapper,
}

impl CellWrapper {
    pub fn new(repr: TypeRepr, payload: Wrapper) -> Self {
        CellWrapper { repr, payload }
    }

    pub fn payload(&self) -> &Wrapper {
        &self.payload
    }

    fn record(&self) -> CodegenResult<NativeType> {
        Ok(NativeType::Struct(vec![
            NativeType::I64,
            NativeType::I64,
            self.payload.native_layout()?,
        ]))
    }

    fn payload_ref(&self, handle: &NativeExpr) -> CodegenResult<TypedExpr> {
        let offset = self.record()?.field_offset(2).unwrap_or(16);
        Ok(TypedExpr::reference(
            handle.clone().field_ptr(offset),
            self.payload.clone(),
        ))
    }

    fn self_wrapper(&self, cx: &ExprContext<'_>) -> CodegenResult<Wrapper> {
        cx.wrapper(&self.repr)
    }

    /// Destroy the payload if there is one and mark the cell empty.
    fn clear_payload(&self, cx: &mut ExprContext<'_>, handle: &NativeExpr) -> CodegenResult<()> {
        if !self.payload.is_pod() {
            let payload = self.payload_ref(handle)?;
            cx.if_true(is_set(handle), |cx| cx.destroy(&payload))?;
        }
        set_flag(cx, handle, false);
        Ok(())
    }

    fn release(&self, cx: &mut ExprContext<'_>, handle: NativeExpr) -> CodegenResult<()> {
        let wrapper = self.self_wrapper(cx)?;
        release_with(cx, &handle, wrapper, |cx| self.release_function(cx))
    }

    // ── Generated helpers ───────────────────────────────────────────

    fn release_function(&self, cx: &mut ExprContext<'_>) -> CodegenResult<FunctionId> {
        let wrapper = self.self_wrapper(cx)?;
        let key = FunctionKey::new("release", [wrapper.clone()]);
        cx.define_native_function(key, vec![wrapper], None, |cx, args| {
            let handle = load_handle(cx, &args[0])?;
            self.clear_payload(cx, &handle)?;
            cx.push_effect(NativeExpr::call_runtime(RuntimeFn::Free, vec![handle]));
            Ok(None)
        })
    }

    fn set_function(&self, cx: &mut ExprContext<'_>) -> CodegenResult<FunctionId> {
        let wrapper = self.self_wrapper(cx)?;
        let key = FunctionKey::new("set", [wrapper.clone()]);
        let params = vec![wrapper, self.payload.clone()];
        cx.define_native_function(key, params, None, |cx, args| {
            // Destroying the old payload may release the new value's owner.
            let value = cx.push_copy(&args[1])?;
            let handle = load_handle(cx, &args[0])?;
            self.clear_payload(cx, &handle)?;
            let payload = self.payload_ref(&handle)?;
            cx.copy_initialize(&payload, &value)?;
            set_flag(cx, &handle, true);
            Ok(None)
        })
    }

    fn clear_function(&self, cx: &mut ExprContext<'_>) -> CodegenResult<FunctionId> {
        let wrapper = self.self_wrapper(cx)?;
        let key = FunctionKey::new("clear", [wrapper.clone()]);
        cx.define_native_function(key, vec![wrapper], None, |cx, args| {
            let handle = load_handle(cx, &args[0])?;
            self.clear_payload(cx, &handle)?;
            Ok(None)
        })
    }
}

impl TypeWrapper for CellWrapper {
    fn kind_name(&self) -> &'static str {
        "Cell"
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
        let handle = allocate_record(cx, self.record()?.size());
        set_flag(cx, &handle, false);
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

    fn convert_type_call(&self, cx: &mut ExprContext<'_>, args: Vec<TypedExpr>) -> CodegenResult<TypedExpr> {
        let wrapper = self.self_wrapper(cx)?;
        match args.len() {
            0 => cx.push_default(&wrapper),
            1 => {
                let cell = cx.push_default(&wrapper)?;
                cx.method_call(cell.clone(), "set", args)?;
                Ok(cell)
            }
            found => Err(CodegenError::ConstructorArity {
                name: self.repr.to_string(),
                expected: 1,
                found,
            }),
        }
    }

    fn convert_bool_cast(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let handle = load_handle(cx, &instance)?;
        let wrapper = cx.bool_wrapper();
        cx.push_pod(&wrapper, is_set(&handle))
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
            ("isSet", 0) => self.convert_bool_cast(cx, instance),
            ("get", 0) => {
                let handle = load_handle(cx, &instance)?;
                let empty = is_set(&handle).unary(NativeUnOp::Not);
                cx.raise_if(empty, ErrorCategory::RuntimeError, EMPTY_CELL)?;
                self.payload_ref(&handle)
            }
            ("set", 1) => {
                let value = cx.convert_to(args.remove(0), &self.payload, false)?;
                let id = self.set_function(cx)?;
                cx.call_native(id, vec![instance, value])
            }
            ("clear", 0) => {
                let id = self.clear_function(cx)?;
                cx.call_native(id, vec![instance])
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
