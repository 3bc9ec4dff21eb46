//! `Masquerade(T)`: a typed value that callers see as a dynamic object.
//!
//! The storage is exactly `T`'s. Lifecycle, `len`, `bool` and conversion
//! re-tag the instance as `T`; everything else boxes it and asks the
//! dynamic runtime.

use tessel_native::{BinaryOperator, NativeExpr, NativeType, UnaryOperator};

use crate::context::ExprContext;
use crate::error::CodegenResult;
use crate::repr::TypeRepr;
use crate::typed_expr::TypedExpr;
use crate::wrapper::{Convertibility, NextValue, ReprFlags, TypeWrapper, Wrapper};

#[derive(Debug)]
pub struct MasqueradeWrapper {
    repr: TypeRepr,
    typed: Wrapper,
}

impl MasqueradeWrapper {
    pub fn new(repr: TypeRepr, typed: Wrapper) -> Self {
        MasqueradeWrapper { repr, typed }
    }

    /// The wrapper whose storage this masquerade shares.
    pub fn typed(&self) -> &Wrapper {
        &self.typed
    }

    fn as_typed(&self, value: &TypedExpr) -> TypedExpr {
        value.clone().retag(self.typed.clone())
    }

    fn as_dynamic(&self, cx: &mut ExprContext<'_>, value: TypedExpr) -> CodegenResult<TypedExpr> {
        cx.box_to_dynamic(value)
    }
}

impl TypeWrapper for MasqueradeWrapper {
    fn kind_name(&self) -> &'static str {
        "Masquerade"
    }

    fn repr(&self) -> &TypeRepr {
        &self.repr
    }

    fn flags(&self) -> ReprFlags {
        self.typed.flags()
    }

    fn native_layout(&self) -> CodegenResult<NativeType> {
        self.typed.native_layout()
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    fn convert_default_initialize(&self, cx: &mut ExprContext<'_>, target: &TypedExpr) -> CodegenResult<()> {
        cx.default_initialize(&self.as_typed(target))
    }

    fn convert_copy_initialize(
        &self,
        cx: &mut ExprContext<'_>,
        target: &TypedExpr,
        source: &TypedExpr,
    ) -> CodegenResult<()> {
        cx.copy_initialize(&self.as_typed(target), &self.as_typed(source))
    }

    fn convert_assign(
        &self,
        cx: &mut ExprContext<'_>,
        target: &TypedExpr,
        source: &TypedExpr,
    ) -> CodegenResult<()> {
        cx.assign(&self.as_typed(target), &self.as_typed(source))
    }

    fn convert_destroy(&self, cx: &mut ExprContext<'_>, target: &TypedExpr) -> CodegenResult<()> {
        cx.destroy(&self.as_typed(target))
    }

    fn convert_incref(&self, cx: &mut ExprContext<'_>, target: &TypedExpr) -> CodegenResult<()> {
        cx.incref(&self.as_typed(target))
    }

    // ── Statically known ────────────────────────────────────────────

    fn convert_len(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        cx.len(self.as_typed(&instance))
    }

    fn convert_bool_cast(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        cx.bool_cast(self.as_typed(&instance))
    }

    // ── Through the dynamic form ────────────────────────────────────

    fn convert_attribute(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        attr: &str,
    ) -> CodegenResult<TypedExpr> {
        let object = self.as_dynamic(cx, instance)?;
        cx.attribute(object, attr)
    }

    fn convert_set_attribute(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        attr: &str,
        value: TypedExpr,
    ) -> CodegenResult<()> {
        let object = self.as_dynamic(cx, instance)?;
        cx.set_attribute(object, attr, value)
    }

    fn convert_getitem(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        index: TypedExpr,
    ) -> CodegenResult<TypedExpr> {
        let object = self.as_dynamic(cx, instance)?;
        cx.getitem(object, index)
    }

    fn convert_setitem(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        index: TypedExpr,
        value: TypedExpr,
    ) -> CodegenResult<()> {
        let object = self.as_dynamic(cx, instance)?;
        cx.setitem(object, index, value)
    }

    fn convert_delitem(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        index: TypedExpr,
    ) -> CodegenResult<()> {
        let object = self.as_dynamic(cx, instance)?;
        cx.delitem(object, index)
    }

    fn convert_call(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        args: Vec<TypedExpr>,
    ) -> CodegenResult<TypedExpr> {
        let object = self.as_dynamic(cx, instance)?;
        cx.call(object, args)
    }

    fn convert_method_call(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        name: &str,
        args: Vec<TypedExpr>,
    ) -> CodegenResult<TypedExpr> {
        let object = self.as_dynamic(cx, instance)?;
        cx.method_call(object, name, args)
    }

    fn convert_hash(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let object = self.as_dynamic(cx, instance)?;
        cx.hash(object)
    }

    fn convert_abs(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let object = self.as_dynamic(cx, instance)?;
        cx.abs(object)
    }

    fn convert_int_cast(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let object = self.as_dynamic(cx, instance)?;
        cx.int_cast(object)
    }

    fn convert_float_cast(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let object = self.as_dynamic(cx, instance)?;
        cx.float_cast(object)
    }

    fn convert_str_cast(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let object = self.as_dynamic(cx, instance)?;
        cx.str_cast(object)
    }

    fn convert_repr(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let object = self.as_dynamic(cx, instance)?;
        cx.repr(object)
    }

    fn convert_builtin(
        &self,
        cx: &mut ExprContext<'_>,
        name: &str,
        instance: TypedExpr,
        args: Vec<TypedExpr>,
    ) -> CodegenResult<TypedExpr> {
        let object = self.as_dynamic(cx, instance)?;
        cx.builtin(name, object, args)
    }

    fn convert_unary_op(
        &self,
        cx: &mut ExprContext<'_>,
        operand: TypedExpr,
        op: UnaryOperator,
    ) -> CodegenResult<TypedExpr> {
        if op == UnaryOperator::Not {
            let truth = self.convert_bool_cast(cx, operand)?;
            return cx.logical_not(&truth);
        }
        let object = self.as_dynamic(cx, operand)?;
        cx.unary_op(object, op)
    }

    fn convert_bin_op(
        &self,
        cx: &mut ExprContext<'_>,
        lhs: TypedExpr,
        op: BinaryOperator,
        rhs: TypedExpr,
    ) -> CodegenResult<TypedExpr> {
        let object = self.as_dynamic(cx, lhs)?;
        cx.bin_op(object, op, rhs)
    }

    fn convert_bin_op_reverse(
        &self,
        cx: &mut ExprContext<'_>,
        rhs: TypedExpr,
        op: BinaryOperator,
        lhs: TypedExpr,
    ) -> CodegenResult<TypedExpr> {
        let object = self.as_dynamic(cx, rhs)?;
        let dynamic = object.wrapper.clone();
        dynamic.convert_bin_op_reverse(cx, object, op, lhs)
    }

    fn convert_next(&self, cx: &mut ExprContext<'_>, iterator: TypedExpr) -> CodegenResult<NextValue> {
        let object = self.as_dynamic(cx, iterator)?;
        cx.next(object)
    }

    fn convert_enter(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let object = self.as_dynamic(cx, instance)?;
        cx.enter(object)
    }

    fn convert_exit(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<()> {
        let object = self.as_dynamic(cx, instance)?;
        cx.exit(object)
    }

    // ── Conversion ──────────────────────────────────────────────────

    fn can_convert_to(&self, target: &Wrapper, explicit: bool) -> Convertibility {
        if *target == self.typed {
            return Convertibility::Always;
        }
        if target.repr() == &TypeRepr::Dynamic && self.typed.is_boxable() {
            return Convertibility::Always;
        }
        Convertibility::combine(
            self.typed.can_convert_to(target, explicit),
            target.can_convert_from(&self.typed, explicit),
        )
    }

    fn convert_to_with_target(
        &self,
        cx: &mut ExprContext<'_>,
        value: TypedExpr,
        target: &TypedExpr,
        explicit: bool,
    ) -> CodegenResult<NativeExpr> {
        let typed = self.as_typed(&value);
        if target.wrapper == self.typed {
            cx.copy_initialize(target, &typed)?;
            return Ok(NativeExpr::bool(true));
        }
        self.typed.convert_to_with_target(cx, typed, target, explicit)
    }

    fn is_boxable(&self) -> bool {
        self.typed.is_boxable()
    }

    fn convert_box(&self, cx: &mut ExprContext<'_>, value: TypedExpr) -> CodegenResult<NativeExpr> {
        let typed = self.as_typed(&value);
        self.typed.convert_box(cx, typed)
    }
}
