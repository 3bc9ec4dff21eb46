//! `None`: the empty value.

use tessel_native::{BinaryOperator, NativeExpr, NativeType, RuntimeFn};

use crate::context::ExprContext;
use crate::error::{CodegenError, CodegenResult};
use crate::repr::{NumericType, TypeRepr};
use crate::typed_expr::TypedExpr;
use crate::wrapper::{ReprFlags, TypeWrapper};

#[derive(Debug)]
pub struct NoneWrapper {
    repr: TypeRepr,
}

impl NoneWrapper {
    pub fn new() -> Self {
        NoneWrapper {
            repr: TypeRepr::None,
        }
    }
}

impl Default for NoneWrapper {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeWrapper for NoneWrapper {
    fn kind_name(&self) -> &'static str {
        "None"
    }

    fn repr(&self) -> &TypeRepr {
        &self.repr
    }

    fn flags(&self) -> ReprFlags {
        ReprFlags::IS_POD | ReprFlags::IS_EMPTY
    }

    fn native_layout(&self) -> CodegenResult<NativeType> {
        Ok(NativeType::Void)
    }

    fn convert_type_call(&self, cx: &mut ExprContext<'_>, args: Vec<TypedExpr>) -> CodegenResult<TypedExpr> {
        if !args.is_empty() {
            return Err(CodegenError::ConstructorArity {
                name: self.repr.to_string(),
                expected: 0,
                found: args.len(),
            });
        }
        Ok(cx.none_value())
    }

    fn convert_bool_cast(&self, cx: &mut ExprContext<'_>, _instance: TypedExpr) -> CodegenResult<TypedExpr> {
        Ok(cx.constant_bool(false))
    }

    fn convert_hash(&self, cx: &mut ExprContext<'_>, _instance: TypedExpr) -> CodegenResult<TypedExpr> {
        Ok(cx.constant_int(0, NumericType::Int32))
    }

    fn convert_str_cast(&self, cx: &mut ExprContext<'_>, _instance: TypedExpr) -> CodegenResult<TypedExpr> {
        cx.constant_str("None")
    }

    fn convert_repr(&self, cx: &mut ExprContext<'_>, _instance: TypedExpr) -> CodegenResult<TypedExpr> {
        cx.constant_str("None")
    }

    fn convert_bin_op(
        &self,
        cx: &mut ExprContext<'_>,
        lhs: TypedExpr,
        op: BinaryOperator,
        rhs: TypedExpr,
    ) -> CodegenResult<TypedExpr> {
        if rhs.wrapper.repr() == &TypeRepr::None {
            match op {
                BinaryOperator::Eq | BinaryOperator::Is => return Ok(cx.constant_bool(true)),
                BinaryOperator::NotEq | BinaryOperator::IsNot => {
                    return Ok(cx.constant_bool(false));
                }
                _ => {}
            }
        }
        let reverse = rhs.wrapper.clone();
        reverse.convert_bin_op_reverse(cx, rhs, op, lhs)
    }

    fn is_boxable(&self) -> bool {
        true
    }

    fn convert_box(&self, _cx: &mut ExprContext<'_>, _value: TypedExpr) -> CodegenResult<NativeExpr> {
        Ok(NativeExpr::call_runtime(RuntimeFn::DynNone, vec![]))
    }
}
