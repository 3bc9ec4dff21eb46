//! Operation entry points.
//!
//! Callers ask the context to perform an operation; the context hands it
//! to the wrapper of the (left) operand. The wrapper handle is cloned out
//! of the operand first so the wrapper can borrow the context mutably.

use tessel_native::{BinaryOperator, NativeExpr, NativeUnOp, UnaryOperator};

use super::ExprContext;
use crate::error::{type_error, CodegenResult};
use crate::repr::NumericType;
use crate::typed_expr::TypedExpr;
use crate::wrapper::{NextValue, Wrapper};

impl ExprContext<'_> {
    // ── Lifecycle ───────────────────────────────────────────────────

    pub fn default_initialize(&mut self, target: &TypedExpr) -> CodegenResult<()> {
        let wrapper = target.wrapper.clone();
        wrapper.convert_default_initialize(self, target)
    }

    pub fn copy_initialize(&mut self, target: &TypedExpr, source: &TypedExpr) -> CodegenResult<()> {
        let wrapper = target.wrapper.clone();
        wrapper.convert_copy_initialize(self, target, source)
    }

    pub fn assign(&mut self, target: &TypedExpr, source: &TypedExpr) -> CodegenResult<()> {
        let wrapper = target.wrapper.clone();
        wrapper.convert_assign(self, target, source)
    }

    pub fn destroy(&mut self, target: &TypedExpr) -> CodegenResult<()> {
        let wrapper = target.wrapper.clone();
        wrapper.convert_destroy(self, target)
    }

    pub fn incref(&mut self, target: &TypedExpr) -> CodegenResult<()> {
        let wrapper = target.wrapper.clone();
        wrapper.convert_incref(self, target)
    }

    /// An owned copy of `value` in a new temporary.
    pub fn push_copy(&mut self, value: &TypedExpr) -> CodegenResult<TypedExpr> {
        let wrapper = value.wrapper.clone();
        self.push(&wrapper, |cx, target| cx.copy_initialize(target, value))
    }

    /// A default-initialized temporary of `wrapper`.
    pub fn push_default(&mut self, wrapper: &Wrapper) -> CodegenResult<TypedExpr> {
        self.push(wrapper, |cx, target| cx.default_initialize(target))
    }

    // ── Attributes and items ────────────────────────────────────────

    pub fn attribute(&mut self, instance: TypedExpr, name: &str) -> CodegenResult<TypedExpr> {
        let wrapper = instance.wrapper.clone();
        wrapper.convert_attribute(self, instance, name)
    }

    pub fn set_attribute(
        &mut self,
        instance: TypedExpr,
        name: &str,
        value: TypedExpr,
    ) -> CodegenResult<()> {
        let wrapper = instance.wrapper.clone();
        wrapper.convert_set_attribute(self, instance, name, value)
    }

    pub fn getitem(&mut self, instance: TypedExpr, index: TypedExpr) -> CodegenResult<TypedExpr> {
        let wrapper = instance.wrapper.clone();
        wrapper.convert_getitem(self, instance, index)
    }

    pub fn setitem(
        &mut self,
        instance: TypedExpr,
        index: TypedExpr,
        value: TypedExpr,
    ) -> CodegenResult<()> {
        let wrapper = instance.wrapper.clone();
        wrapper.convert_setitem(self, instance, index, value)
    }

    pub fn delitem(&mut self, instance: TypedExpr, index: TypedExpr) -> CodegenResult<()> {
        let wrapper = instance.wrapper.clone();
        wrapper.convert_delitem(self, instance, index)
    }

    pub fn getslice(
        &mut self,
        instance: TypedExpr,
        lower: Option<TypedExpr>,
        upper: Option<TypedExpr>,
        step: Option<TypedExpr>,
    ) -> CodegenResult<TypedExpr> {
        let wrapper = instance.wrapper.clone();
        wrapper.convert_getslice(self, instance, lower, upper, step)
    }

    // ── Calls ───────────────────────────────────────────────────────

    pub fn call(&mut self, callee: TypedExpr, args: Vec<TypedExpr>) -> CodegenResult<TypedExpr> {
        let wrapper = callee.wrapper.clone();
        wrapper.convert_call(self, callee, args)
    }

    pub fn method_call(
        &mut self,
        instance: TypedExpr,
        name: &str,
        args: Vec<TypedExpr>,
    ) -> CodegenResult<TypedExpr> {
        let wrapper = instance.wrapper.clone();
        wrapper.convert_method_call(self, instance, name, args)
    }

    /// Construct a value of `ty` from `args`.
    pub fn type_call(&mut self, ty: &Wrapper, args: Vec<TypedExpr>) -> CodegenResult<TypedExpr> {
        ty.convert_type_call(self, args)
    }

    // ── Builtins and casts ──────────────────────────────────────────

    pub fn len(&mut self, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let wrapper = instance.wrapper.clone();
        wrapper.convert_len(self, instance)
    }

    pub fn hash(&mut self, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let wrapper = instance.wrapper.clone();
        wrapper.convert_hash(self, instance)
    }

    pub fn abs(&mut self, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let wrapper = instance.wrapper.clone();
        wrapper.convert_abs(self, instance)
    }

    pub fn bool_cast(&mut self, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let wrapper = instance.wrapper.clone();
        wrapper.convert_bool_cast(self, instance)
    }

    pub fn int_cast(&mut self, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let wrapper = instance.wrapper.clone();
        wrapper.convert_int_cast(self, instance)
    }

    pub fn float_cast(&mut self, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let wrapper = instance.wrapper.clone();
        wrapper.convert_float_cast(self, instance)
    }

    pub fn str_cast(&mut self, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let wrapper = instance.wrapper.clone();
        wrapper.convert_str_cast(self, instance)
    }

    pub fn bytes_cast(&mut self, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let wrapper = instance.wrapper.clone();
        wrapper.convert_bytes_cast(self, instance)
    }

    pub fn repr(&mut self, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let wrapper = instance.wrapper.clone();
        wrapper.convert_repr(self, instance)
    }

    pub fn builtin(
        &mut self,
        name: &str,
        instance: TypedExpr,
        args: Vec<TypedExpr>,
    ) -> CodegenResult<TypedExpr> {
        let wrapper = instance.wrapper.clone();
        wrapper.convert_builtin(self, name, instance, args)
    }

    // ── Operators ───────────────────────────────────────────────────

    pub fn unary_op(&mut self, operand: TypedExpr, op: UnaryOperator) -> CodegenResult<TypedExpr> {
        let wrapper = operand.wrapper.clone();
        wrapper.convert_unary_op(self, operand, op)
    }

    pub fn bin_op(
        &mut self,
        lhs: TypedExpr,
        op: BinaryOperator,
        rhs: TypedExpr,
    ) -> CodegenResult<TypedExpr> {
        let wrapper = lhs.wrapper.clone();
        wrapper.convert_bin_op(self, lhs, op, rhs)
    }

    /// Logical negation of a source-level bool.
    pub fn logical_not(&mut self, value: &TypedExpr) -> CodegenResult<TypedExpr> {
        if value.wrapper.repr().numeric() != Some(NumericType::Bool) {
            return Err(type_error(format!(
                "expected bool, found '{}'",
                value.wrapper
            )));
        }
        let loaded = self.load(value)?;
        let wrapper = value.wrapper.clone();
        self.push_pod(&wrapper, loaded.unary(NativeUnOp::Not))
    }

    // ── Iteration and scoped resources ──────────────────────────────

    pub fn next(&mut self, iterator: TypedExpr) -> CodegenResult<NextValue> {
        let wrapper = iterator.wrapper.clone();
        wrapper.convert_next(self, iterator)
    }

    pub fn enter(&mut self, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let wrapper = instance.wrapper.clone();
        wrapper.convert_enter(self, instance)
    }

    pub fn exit(&mut self, instance: TypedExpr) -> CodegenResult<()> {
        let wrapper = instance.wrapper.clone();
        wrapper.convert_exit(self, instance)
    }

    // ── Dynamic representation ──────────────────────────────────────

    /// Box `value` into an owned dynamic object.
    pub fn box_to_dynamic(&mut self, value: TypedExpr) -> CodegenResult<TypedExpr> {
        let dynamic = self.dynamic_wrapper();
        self.convert_to(value, &dynamic, false)
    }

    /// Load a `bool`-typed native expression of `value` (for conditions).
    pub fn condition(&mut self, value: TypedExpr) -> CodegenResult<NativeExpr> {
        let truth = self.bool_cast(value)?;
        self.load(&truth)
    }
}
