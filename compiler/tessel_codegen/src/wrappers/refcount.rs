//! Reference-count plumbing shared by handle-based wrappers.
//!
//! A handle is a pointer to a heap record whose first field is an `i64`
//! reference count. Ownership transfers are explicit:
//!
//! - copy-initialize: increment, then store the handle;
//! - assign: increment the new handle, store it, then release the old one;
//! - destroy: release.
//!
//! Releasing decrements the count and, when it reaches exactly zero, runs
//! the wrapper's release routine once. Incrementing before releasing makes
//! self-assignment safe. The emitted sequences are plain load/add/store;
//! no atomicity is implied.

use tessel_native::{FunctionId, NativeBinOp, NativeExpr, NativeType, RuntimeFn};

use crate::context::ExprContext;
use crate::error::CodegenResult;
use crate::typed_expr::TypedExpr;
use crate::wrapper::Wrapper;

/// Snapshot `value` into a fresh pointer slot and read it back from there.
pub(crate) fn spill_handle(cx: &mut ExprContext<'_>, value: NativeExpr) -> NativeExpr {
    let slot = cx.allocate_slot(NativeType::Pointer);
    cx.push_effect(NativeExpr::Slot(slot).store(value, NativeType::Pointer));
    NativeExpr::Slot(slot).load(NativeType::Pointer)
}

/// The handle held by `value`, captured at this point of the program.
pub(crate) fn load_handle(cx: &mut ExprContext<'_>, value: &TypedExpr) -> CodegenResult<NativeExpr> {
    let loaded = cx.load(value)?;
    Ok(spill_handle(cx, loaded))
}

/// Allocate a heap record of `size` bytes holding one reference.
pub(crate) fn allocate_record(cx: &mut ExprContext<'_>, size: u32) -> NativeExpr {
    let handle = spill_handle(
        cx,
        NativeExpr::call_runtime(RuntimeFn::Malloc, vec![NativeExpr::i64(i64::from(size))]),
    );
    cx.push_effect(handle.clone().store(NativeExpr::i64(1), NativeType::I64));
    handle
}

/// Current reference count of the record behind `handle`.
pub(crate) fn refcount(handle: &NativeExpr) -> NativeExpr {
    handle.clone().load(NativeType::I64)
}

pub(crate) fn emit_incref(cx: &mut ExprContext<'_>, handle: &NativeExpr) {
    cx.push_effect(handle.clone().store(
        refcount(handle).binary(NativeBinOp::Add, NativeExpr::i64(1)),
        NativeType::I64,
    ));
}

/// Decrement the count behind `handle`; run `on_zero` when it hits zero.
pub(crate) fn emit_decref<F>(cx: &mut ExprContext<'_>, handle: &NativeExpr, on_zero: F) -> CodegenResult<()>
where
    F: FnOnce(&mut ExprContext<'_>, NativeExpr) -> CodegenResult<()>,
{
    cx.push_effect(handle.clone().store(
        refcount(handle).binary(NativeBinOp::Sub, NativeExpr::i64(1)),
        NativeType::I64,
    ));
    let is_zero = refcount(handle).binary(NativeBinOp::Eq, NativeExpr::i64(0));
    let handle = handle.clone();
    cx.if_true(is_zero, move |cx| on_zero(cx, handle))
}

/// Decrement the count behind `handle` of a `wrapper` value and pass the
/// handle to the generated function `destructor` when it hits zero.
pub(crate) fn release_with<D>(
    cx: &mut ExprContext<'_>,
    handle: &NativeExpr,
    wrapper: Wrapper,
    destructor: D,
) -> CodegenResult<()>
where
    D: FnOnce(&mut ExprContext<'_>) -> CodegenResult<FunctionId>,
{
    emit_decref(cx, handle, |cx, handle| {
        let id = destructor(cx)?;
        cx.call_native(id, vec![TypedExpr::value(handle, wrapper)])?;
        Ok(())
    })
}

pub(crate) fn copy_handle(
    cx: &mut ExprContext<'_>,
    target: &TypedExpr,
    source: &TypedExpr,
) -> CodegenResult<()> {
    let handle = load_handle(cx, source)?;
    emit_incref(cx, &handle);
    cx.push_effect(target.expr.clone().store(handle, NativeType::Pointer));
    Ok(())
}

pub(crate) fn assign_handle<R>(
    cx: &mut ExprContext<'_>,
    target: &TypedExpr,
    source: &TypedExpr,
    release: R,
) -> CodegenResult<()>
where
    R: FnOnce(&mut ExprContext<'_>, NativeExpr) -> CodegenResult<()>,
{
    let new = load_handle(cx, source)?;
    emit_incref(cx, &new);
    let old = load_handle(cx, target)?;
    cx.push_effect(target.expr.clone().store(new, NativeType::Pointer));
    release(cx, old)
}

pub(crate) fn destroy_handle<R>(cx: &mut ExprContext<'_>, target: &TypedExpr, release: R) -> CodegenResult<()>
where
    R: FnOnce(&mut ExprContext<'_>, NativeExpr) -> CodegenResult<()>,
{
    let handle = load_handle(cx, target)?;
    release(cx, handle)
}
