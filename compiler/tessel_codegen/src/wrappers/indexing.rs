//! Runtime index arithmetic shared by sequence wrappers.

use tessel_native::{ErrorCategory, NativeBinOp, NativeExpr, NativeType};

use crate::context::ExprContext;
use crate::error::CodegenResult;

/// Evaluate an `i64` now and read it back from a slot.
pub(crate) fn spill_i64(cx: &mut ExprContext<'_>, value: NativeExpr) -> NativeExpr {
    let slot = cx.allocate_slot(NativeType::I64);
    cx.push_effect(NativeExpr::Slot(slot).store(value, NativeType::I64));
    NativeExpr::Slot(slot).load(NativeType::I64)
}

/// `index + len` for negative indices, `index` otherwise.
pub(crate) fn normalized(cx: &mut ExprContext<'_>, index: NativeExpr, len: &NativeExpr) -> NativeExpr {
    let index = spill_i64(cx, index);
    let wrapped = NativeExpr::Branch {
        cond: Box::new(index.clone().binary(NativeBinOp::Lt, NativeExpr::i64(0))),
        then: Box::new(index.clone().binary(NativeBinOp::Add, len.clone())),
        otherwise: Box::new(index),
    };
    spill_i64(cx, wrapped)
}

/// Normalize `index` against `len` and raise `IndexError` with `message`
/// unless the result lies in `[0, len)`. `len` must be pure.
pub(crate) fn checked(
    cx: &mut ExprContext<'_>,
    index: NativeExpr,
    len: &NativeExpr,
    message: &str,
) -> CodegenResult<NativeExpr> {
    let index = normalized(cx, index, len);
    let out_of_range = index
        .clone()
        .binary(NativeBinOp::Lt, NativeExpr::i64(0))
        .binary(
            NativeBinOp::Or,
            index.clone().binary(NativeBinOp::Ge, len.clone()),
        );
    cx.raise_if(out_of_range, ErrorCategory::IndexError, message)?;
    Ok(index)
}
