//! `ListOf(T)`: growable homogeneous containers.
//!
//! A list value is a handle to a refcounted header
//! `{refcount, hash cache, length, reserved, data}`. `data` points to a
//! separate store of `reserved` elements of which the first `length` are
//! initialized; it is null exactly when nothing is reserved. Mutating
//! methods are generated once per element type and called from then on.

use tessel_native::{
    Constant, ErrorCategory, FunctionId, NativeBinOp, NativeExpr, NativeType, RuntimeFn,
};

use super::bound_method::bind;
use super::indexing;
use super::refcount::{
    allocate_record, assign_handle, copy_handle, destroy_handle, emit_incref, load_handle,
    release_with,
};
use crate::context::ExprContext;
use crate::converter::FunctionKey;
use crate::error::{attribute_error, type_error, CodegenError, CodegenResult};
use crate::options::GrowthPolicy;
use crate::repr::{NumericType, TypeRepr};
use crate::typed_expr::TypedExpr;
use crate::wrapper::{ReprFlags, TypeWrapper, Wrapper};

// ── Header ──────────────────────────────────────────────────────────

const HASH_CACHE: u32 = 8;
const LENGTH: u32 = 16;
const RESERVED: u32 = 24;
const DATA: u32 = 32;
const HEADER_SIZE: u32 = 40;

const INDEX_OUT_OF_RANGE: &str = "list index out of range";
const POP_OUT_OF_RANGE: &str = "pop index out of range";
const NEGATIVE_RESIZE: &str = "can't resize a list to a negative length";

const METHODS: [&str; 6] = ["append", "clear", "pop", "reserve", "reserved", "resize"];

/// Native layout of the list header.
pub fn header_layout() -> NativeType {
    NativeType::Struct(vec![
        NativeType::I64,
        NativeType::I32,
        NativeType::I64,
        NativeType::I64,
        NativeType::Pointer,
    ])
}

fn length(handle: &NativeExpr) -> NativeExpr {
    handle.clone().field_ptr(LENGTH).load(NativeType::I64)
}

fn reserved(handle: &NativeExpr) -> NativeExpr {
    handle.clone().field_ptr(RESERVED).load(NativeType::I64)
}

fn data(handle: &NativeExpr) -> NativeExpr {
    handle.clone().field_ptr(DATA).load(NativeType::Pointer)
}

fn set_length(cx: &mut ExprContext<'_>, handle: &NativeExpr, value: NativeExpr) {
    cx.push_effect(handle.clone().field_ptr(LENGTH).store(value, NativeType::I64));
}

fn set_reserved(cx: &mut ExprContext<'_>, handle: &NativeExpr, value: NativeExpr) {
    cx.push_effect(handle.clone().field_ptr(RESERVED).store(value, NativeType::I64));
}

fn set_data(cx: &mut ExprContext<'_>, handle: &NativeExpr, value: NativeExpr) {
    cx.push_effect(handle.clone().field_ptr(DATA).store(value, NativeType::Pointer));
}

/// Move the bytes of one element from `source` to `target`.
fn relocate(cx: &mut ExprContext<'_>, target: NativeExpr, source: NativeExpr, layout: &NativeType) {
    if layout.is_void() {
        return;
    }
    if layout.is_scalar() {
        cx.push_effect(target.store(source.load(layout.clone()), layout.clone()));
        return;
    }
    cx.push_effect(NativeExpr::call_runtime(
        RuntimeFn::MemMove,
        vec![target, source, NativeExpr::i64(i64::from(layout.size()))],
    ));
}

fn add(a: NativeExpr, b: NativeExpr) -> NativeExpr {
    a.binary(NativeBinOp::Add, b)
}

fn sub(a: NativeExpr, b: NativeExpr) -> NativeExpr {
    a.binary(NativeBinOp::Sub, b)
}

/// The capacity `policy` asks for when a list of `len` elements is full.
fn grown_capacity(policy: GrowthPolicy, len: NativeExpr) -> NativeExpr {
    len.binary(NativeBinOp::Mul, NativeExpr::i64(policy.numerator()))
        .binary(NativeBinOp::Div, NativeExpr::i64(policy.denominator()))
        .binary(NativeBinOp::Add, NativeExpr::i64(policy.increment()))
}

// ── Wrapper ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ListOfWrapper {
    repr: TypeRepr,
    element: Wrapper,
}

impl ListOfWrapper {
    pub fn new(repr: TypeRepr, element: Wrapper) -> Self {
        ListOfWrapper { repr, element }
    }

    pub fn element(&self) -> &Wrapper {
        &self.element
    }

    fn self_wrapper(&self, cx: &ExprContext<'_>) -> CodegenResult<Wrapper> {
        cx.wrapper(&self.repr)
    }

    fn stride(&self) -> CodegenResult<u32> {
        Ok(self.element.native_layout()?.size())
    }

    fn element_at(&self, handle: &NativeExpr, index: NativeExpr) -> CodegenResult<TypedExpr> {
        Ok(TypedExpr::reference(
            data(handle).element_ptr(index, self.stride()?),
            self.element.clone(),
        ))
    }

    fn int64(cx: &ExprContext<'_>) -> Wrapper {
        cx.numeric(NumericType::Int64)
    }

    fn index_arg(cx: &mut ExprContext<'_>, value: TypedExpr) -> CodegenResult<TypedExpr> {
        let int64 = Self::int64(cx);
        cx.convert_to(value, &int64, false)
    }

    fn release(&self, cx: &mut ExprContext<'_>, handle: NativeExpr) -> CodegenResult<()> {
        let wrapper = self.self_wrapper(cx)?;
        release_with(cx, &handle, wrapper, |cx| self.release_function(cx))
    }

    fn reserve(&self, cx: &mut ExprContext<'_>, list: &TypedExpr, count: NativeExpr) -> CodegenResult<()> {
        let id = self.reserve_function(cx)?;
        let count = TypedExpr::value(count, Self::int64(cx));
        cx.call_native(id, vec![list.clone(), count])?;
        Ok(())
    }

    // ── Generated helpers ───────────────────────────────────────────

    /// Destroys the live elements and frees the store and the header.
    fn release_function(&self, cx: &mut ExprContext<'_>) -> CodegenResult<FunctionId> {
        let wrapper = self.self_wrapper(cx)?;
        let key = FunctionKey::new("release", [wrapper.clone()]);
        cx.define_native_function(key, vec![wrapper], None, |cx, args| {
            let handle = load_handle(cx, &args[0])?;
            if !self.element.is_pod() {
                cx.loop_count(length(&handle), |cx, i| {
                    let element = self.element_at(&handle, i)?;
                    cx.destroy(&element)
                })?;
            }
            let has_store = reserved(&handle).binary(NativeBinOp::Ne, NativeExpr::i64(0));
            cx.if_true(has_store, |cx| {
                cx.push_effect(NativeExpr::call_runtime(RuntimeFn::Free, vec![data(&handle)]));
                Ok(())
            })?;
            cx.push_effect(NativeExpr::call_runtime(RuntimeFn::Free, vec![handle.clone()]));
            Ok(None)
        })
    }

    fn reserve_function(&self, cx: &mut ExprContext<'_>) -> CodegenResult<FunctionId> {
        let wrapper = self.self_wrapper(cx)?;
        let key = FunctionKey::new("reserve", [wrapper.clone()]);
        let params = vec![wrapper, Self::int64(cx)];
        let stride = self.stride()?;
        cx.define_native_function(key, params, None, move |cx, args| {
            let handle = load_handle(cx, &args[0])?;
            let requested = cx.load(&args[1])?;
            let len = length(&handle);
            let count = indexing::spill_i64(
                cx,
                NativeExpr::Branch {
                    cond: Box::new(requested.clone().binary(NativeBinOp::Lt, len.clone())),
                    then: Box::new(len),
                    otherwise: Box::new(requested),
                },
            );
            let changed = count.clone().binary(NativeBinOp::Ne, reserved(&handle));
            cx.if_true(changed, |cx| {
                cx.if_else(
                    count.clone().binary(NativeBinOp::Eq, NativeExpr::i64(0)),
                    |cx| {
                        cx.push_effect(NativeExpr::call_runtime(RuntimeFn::Free, vec![data(&handle)]));
                        set_data(cx, &handle, NativeExpr::Constant(Constant::NullPointer));
                        Ok(())
                    },
                    |cx| {
                        let bytes = count
                            .clone()
                            .binary(NativeBinOp::Mul, NativeExpr::i64(i64::from(stride)));
                        let store =
                            NativeExpr::call_runtime(RuntimeFn::Realloc, vec![data(&handle), bytes]);
                        set_data(cx, &handle, store);
                        Ok(())
                    },
                )?;
                set_reserved(cx, &handle, count.clone());
                Ok(())
            })?;
            Ok(None)
        })
    }

    fn append_function(&self, cx: &mut ExprContext<'_>) -> CodegenResult<FunctionId> {
        let wrapper = self.self_wrapper(cx)?;
        let key = FunctionKey::new("append", [wrapper.clone()]);
        let params = vec![wrapper, self.element.clone()];
        let growth = cx.options().growth;
        cx.define_native_function(key, params, None, move |cx, args| {
            // The argument may live in this list's own store, which growing relocates.
            let value = cx.push_copy(&args[1])?;
            let handle = load_handle(cx, &args[0])?;
            let full = reserved(&handle).binary(
                NativeBinOp::Lt,
                add(length(&handle), NativeExpr::i64(1)),
            );
            cx.if_true(full, |cx| {
                self.reserve(cx, &args[0], grown_capacity(growth, length(&handle)))
            })?;
            let slot = self.element_at(&handle, length(&handle))?;
            cx.copy_initialize(&slot, &value)?;
            set_length(cx, &handle, add(length(&handle), NativeExpr::i64(1)));
            Ok(None)
        })
    }

    fn resize_function(&self, cx: &mut ExprContext<'_>, with_fill: bool) -> CodegenResult<FunctionId> {
        let wrapper = self.self_wrapper(cx)?;
        let operation = if with_fill { "resize_fill" } else { "resize" };
        let key = FunctionKey::new(operation, [wrapper.clone()]);
        let mut params = vec![wrapper, Self::int64(cx)];
        if with_fill {
            params.push(self.element.clone());
        }
        cx.define_native_function(key, params, None, |cx, args| {
            let fill = match args.get(2) {
                Some(fill) => Some(cx.push_copy(fill)?),
                None => None,
            };
            let handle = load_handle(cx, &args[0])?;
            let requested = cx.load(&args[1])?;
            let negative = requested.clone().binary(NativeBinOp::Lt, NativeExpr::i64(0));
            cx.raise_if(negative, ErrorCategory::ValueError, NEGATIVE_RESIZE)?;

            let len = length(&handle);
            let growing = requested.clone().binary(NativeBinOp::Gt, len.clone());
            cx.if_else(
                growing,
                |cx| {
                    let short = reserved(&handle).binary(NativeBinOp::Lt, requested.clone());
                    cx.if_true(short, |cx| self.reserve(cx, &args[0], requested.clone()))?;
                    cx.loop_count(sub(requested.clone(), len.clone()), |cx, i| {
                        let slot = self.element_at(&handle, add(len.clone(), i))?;
                        match &fill {
                            Some(fill) => cx.copy_initialize(&slot, fill),
                            None => cx.default_initialize(&slot),
                        }
                    })
                },
                |cx| {
                    if self.element.is_pod() {
                        return Ok(());
                    }
                    cx.loop_count(sub(len.clone(), requested.clone()), |cx, i| {
                        let element = self.element_at(&handle, add(requested.clone(), i))?;
                        cx.destroy(&element)
                    })
                },
            )?;
            set_length(cx, &handle, requested.clone());
            Ok(None)
        })
    }

    fn pop_function(&self, cx: &mut ExprContext<'_>) -> CodegenResult<FunctionId> {
        let wrapper = self.self_wrapper(cx)?;
        let key = FunctionKey::new("pop", [wrapper.clone()]);
        let params = vec![wrapper, Self::int64(cx)];
        let ret = Some(self.element.clone());
        cx.define_native_function(key, params, ret, |cx, args| {
            let handle = load_handle(cx, &args[0])?;
            let index = cx.load(&args[1])?;
            let len = length(&handle);
            let index = indexing::checked(cx, index, &len, POP_OUT_OF_RANGE)?;

            let layout = self.element.native_layout()?;
            let stride = layout.size();
            let source = data(&handle).element_ptr(index.clone(), stride);
            let element = self.element.clone();
            let result = cx.push(&element, |cx, target| {
                relocate(cx, target.expr.clone(), source, &layout);
                Ok(())
            })?;

            if stride > 0 {
                let tail = sub(sub(len.clone(), index.clone()), NativeExpr::i64(1));
                cx.push_effect(NativeExpr::call_runtime(
                    RuntimeFn::MemMove,
                    vec![
                        data(&handle).element_ptr(index.clone(), stride),
                        data(&handle).element_ptr(add(index, NativeExpr::i64(1)), stride),
                        tail.binary(NativeBinOp::Mul, NativeExpr::i64(i64::from(stride))),
                    ],
                ));
            }
            set_length(cx, &handle, sub(len, NativeExpr::i64(1)));
            Ok(Some(result))
        })
    }

    /// A new list holding copies of every element of the argument.
    fn duplicate_function(&self, cx: &mut ExprContext<'_>) -> CodegenResult<FunctionId> {
        let wrapper = self.self_wrapper(cx)?;
        let key = FunctionKey::new("duplicate", [wrapper.clone()]);
        let params = vec![wrapper.clone()];
        cx.define_native_function(key, params, Some(wrapper.clone()), |cx, args| {
            let source = load_handle(cx, &args[0])?;
            let result = cx.push_default(&wrapper)?;
            self.reserve(cx, &result, length(&source))?;
            let target = load_handle(cx, &result)?;
            cx.loop_count(length(&source), |cx, i| {
                let from = self.element_at(&source, i.clone())?;
                let to = self.element_at(&target, i)?;
                cx.copy_initialize(&to, &from)
            })?;
            set_length(cx, &target, length(&source));
            Ok(Some(result))
        })
    }

    fn unsupported_call(&self, name: &str, args: &[TypedExpr]) -> CodegenError {
        let types: Vec<String> = args.iter().map(|a| a.wrapper.to_string()).collect();
        type_error(format!(
            "Can't call {}.{name} with args of type ({})",
            self.repr,
            types.join(",")
        ))
    }
}

impl TypeWrapper for ListOfWrapper {
    fn kind_name(&self) -> &'static str {
        "ListOf"
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

    // ── Lifecycle ───────────────────────────────────────────────────

    fn convert_default_initialize(&self, cx: &mut ExprContext<'_>, target: &TypedExpr) -> CodegenResult<()> {
        let handle = allocate_record(cx, HEADER_SIZE);
        cx.push_effect(
            handle
                .clone()
                .field_ptr(HASH_CACHE)
                .store(NativeExpr::Constant(Constant::i32(-1)), NativeType::I32),
        );
        set_length(cx, &handle, NativeExpr::i64(0));
        set_reserved(cx, &handle, NativeExpr::i64(0));
        set_data(cx, &handle, NativeExpr::Constant(Constant::NullPointer));
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

    // ── Construction ────────────────────────────────────────────────

    fn convert_type_call(&self, cx: &mut ExprContext<'_>, mut args: Vec<TypedExpr>) -> CodegenResult<TypedExpr> {
        let wrapper = self.self_wrapper(cx)?;
        match args.len() {
            0 => cx.push_default(&wrapper),
            1 => {
                let source = cx.convert_to(args.remove(0), &wrapper, false)?;
                let id = self.duplicate_function(cx)?;
                cx.call_native(id, vec![source])
            }
            found => Err(CodegenError::ConstructorArity {
                name: self.repr.to_string(),
                expected: 1,
                found,
            }),
        }
    }

    // ── Queries and items ───────────────────────────────────────────

    fn convert_len(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let handle = cx.load(&instance)?;
        let int64 = Self::int64(cx);
        cx.push_pod(&int64, length(&handle))
    }

    fn convert_bool_cast(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let handle = cx.load(&instance)?;
        let wrapper = cx.bool_wrapper();
        cx.push_pod(
            &wrapper,
            length(&handle).binary(NativeBinOp::Ne, NativeExpr::i64(0)),
        )
    }

    fn convert_getitem(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        index: TypedExpr,
    ) -> CodegenResult<TypedExpr> {
        let index = Self::index_arg(cx, index)?;
        let index = cx.load(&index)?;
        let handle = load_handle(cx, &instance)?;
        let index = indexing::checked(cx, index, &length(&handle), INDEX_OUT_OF_RANGE)?;
        let stride = self.stride()?;
        Ok(cx.push_reference(&self.element, data(&handle).element_ptr(index, stride)))
    }

    fn convert_setitem(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        index: TypedExpr,
        value: TypedExpr,
    ) -> CodegenResult<()> {
        let value = cx.convert_to(value, &self.element, false)?;
        let slot = self.convert_getitem(cx, instance, index)?;
        cx.assign(&slot, &value)
    }

    // ── Methods ─────────────────────────────────────────────────────

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
            ("append", 1) => {
                let value = cx.convert_to(args.remove(0), &self.element, false)?;
                let id = self.append_function(cx)?;
                cx.call_native(id, vec![instance, value])
            }
            ("pop", 0 | 1) => {
                let index = match args.pop() {
                    Some(index) => Self::index_arg(cx, index)?,
                    None => cx.constant_i64(-1),
                };
                let id = self.pop_function(cx)?;
                cx.call_native(id, vec![instance, index])
            }
            ("resize", 1 | 2) => {
                let fill = if args.len() == 2 {
                    Some(cx.convert_to(args.remove(1), &self.element, false)?)
                } else {
                    None
                };
                let count = Self::index_arg(cx, args.remove(0))?;
                let id = self.resize_function(cx, fill.is_some())?;
                let mut call_args = vec![instance, count];
                call_args.extend(fill);
                cx.call_native(id, call_args)
            }
            ("clear", 0) => {
                let id = self.resize_function(cx, false)?;
                let zero = cx.constant_i64(0);
                cx.call_native(id, vec![instance, zero])
            }
            ("reserve", 1) => {
                let count = Self::index_arg(cx, args.remove(0))?;
                let id = self.reserve_function(cx)?;
                cx.call_native(id, vec![instance, count])
            }
            ("reserved", 0) => {
                let handle = cx.load(&instance)?;
                let int64 = Self::int64(cx);
                cx.push_pod(&int64, reserved(&handle))
            }
            _ if METHODS.contains(&name) => Err(self.unsupported_call(name, &args)),
            _ => Err(attribute_error(format!(
                "'{}' object has no attribute '{name}'",
                self.repr
            ))),
        }
    }
}

#[cfg(test)]
mod tests;
