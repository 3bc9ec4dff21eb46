//! `str`: refcounted runtime strings.
//!
//! Strings are created by the runtime (literals, formatting, concatenation)
//! and laid out as `{refcount, hash cache, length, bytes...}`. The code
//! generator only shares and releases them; content operations are runtime
//! calls.

use tessel_native::{
    BinaryOperator, NativeBinOp, NativeExpr, NativeType, NativeUnOp, RuntimeFn, STRING_HEADER,
};

use super::refcount::{assign_handle, copy_handle, destroy_handle, emit_decref, load_handle};
use crate::context::ExprContext;
use crate::error::{CodegenError, CodegenResult};
use crate::repr::{NumericType, TypeRepr};
use crate::typed_expr::TypedExpr;
use crate::wrapper::{Convertibility, ReprFlags, TypeWrapper, Wrapper};

#[derive(Debug)]
pub struct StringWrapper {
    repr: TypeRepr,
}

impl StringWrapper {
    pub fn new() -> Self {
        StringWrapper {
            repr: TypeRepr::Str,
        }
    }

    fn length(handle: NativeExpr) -> NativeExpr {
        let offset = NativeType::Struct(STRING_HEADER.to_vec())
            .field_offset(2)
            .unwrap_or(16);
        handle.field_ptr(offset).load(NativeType::I64)
    }
}

impl Default for StringWrapper {
    fn default() -> Self {
        Self::new()
    }
}

fn release(cx: &mut ExprContext<'_>, handle: NativeExpr) -> CodegenResult<()> {
    emit_decref(cx, &handle, |cx, handle| {
        cx.push_effect(NativeExpr::call_runtime(RuntimeFn::Free, vec![handle]));
        Ok(())
    })
}

impl TypeWrapper for StringWrapper {
    fn kind_name(&self) -> &'static str {
        "String"
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
        cx.push_effect(
            target
                .expr
                .clone()
                .store(NativeExpr::StrLiteral(String::new()), NativeType::Pointer),
        );
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
        assign_handle(cx, target, source, release)
    }

    fn convert_destroy(&self, cx: &mut ExprContext<'_>, target: &TypedExpr) -> CodegenResult<()> {
        destroy_handle(cx, target, release)
    }

    fn convert_incref(&self, cx: &mut ExprContext<'_>, target: &TypedExpr) -> CodegenResult<()> {
        let handle = load_handle(cx, target)?;
        super::refcount::emit_incref(cx, &handle);
        Ok(())
    }

    fn convert_type_call(&self, cx: &mut ExprContext<'_>, mut args: Vec<TypedExpr>) -> CodegenResult<TypedExpr> {
        match args.len() {
            0 => cx.constant_str(""),
            1 => {
                let arg = args.remove(0);
                cx.str_cast(arg)
            }
            found => Err(CodegenError::ConstructorArity {
                name: self.repr.to_string(),
                expected: 1,
                found,
            }),
        }
    }

    fn convert_len(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let handle = cx.load(&instance)?;
        let wrapper = cx.numeric(NumericType::Int64);
        cx.push_pod(&wrapper, Self::length(handle))
    }

    fn convert_bool_cast(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let handle = cx.load(&instance)?;
        let wrapper = cx.bool_wrapper();
        cx.push_pod(
            &wrapper,
            Self::length(handle).binary(NativeBinOp::Ne, NativeExpr::i64(0)),
        )
    }

    fn convert_hash(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let handle = cx.load(&instance)?;
        let wrapper = cx.numeric(NumericType::Int32);
        cx.push_pod(
            &wrapper,
            NativeExpr::call_runtime(RuntimeFn::StrHash, vec![handle]),
        )
    }

    fn convert_str_cast(&self, _cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        Ok(instance)
    }

    fn convert_bin_op(
        &self,
        cx: &mut ExprContext<'_>,
        lhs: TypedExpr,
        op: BinaryOperator,
        rhs: TypedExpr,
    ) -> CodegenResult<TypedExpr> {
        if rhs.wrapper.repr() == &TypeRepr::Str {
            match op {
                BinaryOperator::Add => {
                    let a = cx.load(&lhs)?;
                    let b = cx.load(&rhs)?;
                    let wrapper = cx.str_wrapper();
                    return cx.push_move(
                        &wrapper,
                        NativeExpr::call_runtime(RuntimeFn::StrConcat, vec![a, b]),
                    );
                }
                BinaryOperator::Eq | BinaryOperator::NotEq => {
                    let a = cx.load(&lhs)?;
                    let b = cx.load(&rhs)?;
                    let mut equal = NativeExpr::call_runtime(RuntimeFn::StrEq, vec![a, b]);
                    if op == BinaryOperator::NotEq {
                        equal = equal.unary(NativeUnOp::Not);
                    }
                    let wrapper = cx.bool_wrapper();
                    return cx.push_pod(&wrapper, equal);
                }
                _ => {}
            }
        }
        let reverse = rhs.wrapper.clone();
        reverse.convert_bin_op_reverse(cx, rhs, op, lhs)
    }

    fn can_convert_from(&self, source: &Wrapper, _explicit: bool) -> Convertibility {
        if source.repr() == &TypeRepr::Dynamic {
            Convertibility::Maybe
        } else {
            Convertibility::Never
        }
    }

    fn convert_to_self_with_target(
        &self,
        cx: &mut ExprContext<'_>,
        target: &TypedExpr,
        source: TypedExpr,
        _explicit: bool,
    ) -> CodegenResult<NativeExpr> {
        if source.wrapper.repr() == &TypeRepr::Dynamic {
            let object = cx.load(&source)?;
            return Ok(NativeExpr::call_runtime(
                RuntimeFn::DynToStr,
                vec![object, target.expr.clone()],
            ));
        }
        if source.wrapper == target.wrapper {
            cx.copy_initialize(target, &source)?;
            return Ok(NativeExpr::bool(true));
        }
        Ok(NativeExpr::bool(false))
    }

    fn is_boxable(&self) -> bool {
        true
    }

    fn convert_box(&self, cx: &mut ExprContext<'_>, value: TypedExpr) -> CodegenResult<NativeExpr> {
        let handle = cx.load(&value)?;
        Ok(NativeExpr::call_runtime(RuntimeFn::DynFromStr, vec![handle]))
    }
}
