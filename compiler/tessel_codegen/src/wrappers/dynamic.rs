//! `object`: handles into the dynamic fallback runtime.
//!
//! Nothing about a dynamic object is known statically, so every operation
//! is a runtime call and every failure is raised by the runtime. Typed
//! operands meeting a dynamic one are boxed first. Reference counts of
//! dynamic objects are only touched through `DynIncref`/`DynDecref`.

use tessel_native::{BinaryOperator, NativeExpr, NativeType, RuntimeFn, UnaryOperator};

use super::refcount::{load_handle, spill_handle};
use crate::context::ExprContext;
use crate::error::{type_error, CodegenError, CodegenResult};
use crate::repr::{NumericType, TypeRepr};
use crate::typed_expr::TypedExpr;
use crate::wrapper::{Convertibility, NextValue, ReprFlags, TypeWrapper, Wrapper};

#[derive(Debug)]
pub struct DynamicWrapper {
    repr: TypeRepr,
}

impl DynamicWrapper {
    pub fn new() -> Self {
        DynamicWrapper {
            repr: TypeRepr::Dynamic,
        }
    }

    fn incref(cx: &mut ExprContext<'_>, handle: NativeExpr) {
        cx.push_effect(NativeExpr::call_runtime(RuntimeFn::DynIncref, vec![handle]));
    }

    fn decref(cx: &mut ExprContext<'_>, handle: NativeExpr) {
        cx.push_effect(NativeExpr::call_runtime(RuntimeFn::DynDecref, vec![handle]));
    }

    /// Take ownership of an object returned by the runtime.
    fn owned(cx: &mut ExprContext<'_>, handle: NativeExpr) -> CodegenResult<TypedExpr> {
        let wrapper = cx.dynamic_wrapper();
        cx.push_move(&wrapper, handle)
    }

    /// Box `value` and return the object handle, owned by the current frame.
    fn boxed(cx: &mut ExprContext<'_>, value: TypedExpr) -> CodegenResult<NativeExpr> {
        let boxed = cx.box_to_dynamic(value)?;
        cx.load(&boxed)
    }

    fn name(cx: &mut ExprContext<'_>, name: &str) -> CodegenResult<NativeExpr> {
        let name = cx.constant_str(name)?;
        cx.load(&name)
    }

    /// A new dynamic tuple holding boxed `items`.
    fn tuple(cx: &mut ExprContext<'_>, items: Vec<TypedExpr>) -> CodegenResult<NativeExpr> {
        let tuple = Self::owned(
            cx,
            NativeExpr::call_runtime(RuntimeFn::DynTupleNew, vec![NativeExpr::i64(items.len() as i64)]),
        )?;
        let tuple = cx.load(&tuple)?;
        for (i, item) in items.into_iter().enumerate() {
            let item = Self::boxed(cx, item)?;
            cx.push_effect(NativeExpr::call_runtime(
                RuntimeFn::DynTupleSet,
                vec![tuple.clone(), NativeExpr::i64(i as i64), item],
            ));
        }
        Ok(tuple)
    }

    fn runtime_pod(
        cx: &mut ExprContext<'_>,
        t: NumericType,
        func: RuntimeFn,
        args: Vec<NativeExpr>,
    ) -> CodegenResult<TypedExpr> {
        let wrapper = cx.numeric(t);
        cx.push_pod(&wrapper, NativeExpr::call_runtime(func, args))
    }

    fn runtime_str(cx: &mut ExprContext<'_>, func: RuntimeFn, object: NativeExpr) -> CodegenResult<TypedExpr> {
        let wrapper = cx.str_wrapper();
        cx.push_move(&wrapper, NativeExpr::call_runtime(func, vec![object]))
    }
}

impl Default for DynamicWrapper {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeWrapper for DynamicWrapper {
    fn kind_name(&self) -> &'static str {
        "Dynamic"
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
        cx.push_effect(target.expr.clone().store(
            NativeExpr::call_runtime(RuntimeFn::DynNone, vec![]),
            NativeType::Pointer,
        ));
        Ok(())
    }

    fn convert_copy_initialize(
        &self,
        cx: &mut ExprContext<'_>,
        target: &TypedExpr,
        source: &TypedExpr,
    ) -> CodegenResult<()> {
        let handle = load_handle(cx, source)?;
        Self::incref(cx, handle.clone());
        cx.push_effect(target.expr.clone().store(handle, NativeType::Pointer));
        Ok(())
    }

    fn convert_assign(
        &self,
        cx: &mut ExprContext<'_>,
        target: &TypedExpr,
        source: &TypedExpr,
    ) -> CodegenResult<()> {
        let new = load_handle(cx, source)?;
        Self::incref(cx, new.clone());
        let old = load_handle(cx, target)?;
        cx.push_effect(target.expr.clone().store(new, NativeType::Pointer));
        Self::decref(cx, old);
        Ok(())
    }

    fn convert_destroy(&self, cx: &mut ExprContext<'_>, target: &TypedExpr) -> CodegenResult<()> {
        let handle = cx.load(target)?;
        Self::decref(cx, handle);
        Ok(())
    }

    fn convert_incref(&self, cx: &mut ExprContext<'_>, target: &TypedExpr) -> CodegenResult<()> {
        let handle = cx.load(target)?;
        Self::incref(cx, handle);
        Ok(())
    }

    // ── Attributes and items ────────────────────────────────────────

    fn convert_attribute(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        attr: &str,
    ) -> CodegenResult<TypedExpr> {
        let object = load_handle(cx, &instance)?;
        let name = Self::name(cx, attr)?;
        Self::owned(cx, NativeExpr::call_runtime(RuntimeFn::DynGetAttr, vec![object, name]))
    }

    fn convert_set_attribute(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        attr: &str,
        value: TypedExpr,
    ) -> CodegenResult<()> {
        let object = load_handle(cx, &instance)?;
        let value = Self::boxed(cx, value)?;
        let name = Self::name(cx, attr)?;
        cx.push_effect(NativeExpr::call_runtime(
            RuntimeFn::DynSetAttr,
            vec![object, name, value],
        ));
        Ok(())
    }

    fn convert_getitem(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        index: TypedExpr,
    ) -> CodegenResult<TypedExpr> {
        let object = load_handle(cx, &instance)?;
        let key = Self::boxed(cx, index)?;
        Self::owned(cx, NativeExpr::call_runtime(RuntimeFn::DynGetItem, vec![object, key]))
    }

    fn convert_setitem(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        index: TypedExpr,
        value: TypedExpr,
    ) -> CodegenResult<()> {
        let object = load_handle(cx, &instance)?;
        let key = Self::boxed(cx, index)?;
        let value = Self::boxed(cx, value)?;
        cx.push_effect(NativeExpr::call_runtime(
            RuntimeFn::DynSetItem,
            vec![object, key, value],
        ));
        Ok(())
    }

    fn convert_delitem(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        index: TypedExpr,
    ) -> CodegenResult<()> {
        let object = load_handle(cx, &instance)?;
        let key = Self::boxed(cx, index)?;
        cx.push_effect(NativeExpr::call_runtime(RuntimeFn::DynDelItem, vec![object, key]));
        Ok(())
    }

    // ── Calls ───────────────────────────────────────────────────────

    fn convert_call(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        args: Vec<TypedExpr>,
    ) -> CodegenResult<TypedExpr> {
        let callee = load_handle(cx, &instance)?;
        let args = Self::tuple(cx, args)?;
        Self::owned(cx, NativeExpr::call_runtime(RuntimeFn::DynCall, vec![callee, args]))
    }

    fn convert_type_call(&self, cx: &mut ExprContext<'_>, mut args: Vec<TypedExpr>) -> CodegenResult<TypedExpr> {
        match args.len() {
            0 => {
                let wrapper = cx.dynamic_wrapper();
                cx.push_default(&wrapper)
            }
            1 => cx.box_to_dynamic(args.remove(0)),
            found => Err(CodegenError::ConstructorArity {
                name: self.repr.to_string(),
                expected: 1,
                found,
            }),
        }
    }

    // ── Builtins and casts ──────────────────────────────────────────

    fn convert_len(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let object = cx.load(&instance)?;
        Self::runtime_pod(cx, NumericType::Int64, RuntimeFn::DynLen, vec![object])
    }

    fn convert_hash(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let object = cx.load(&instance)?;
        Self::runtime_pod(cx, NumericType::Int32, RuntimeFn::DynHash, vec![object])
    }

    fn convert_bool_cast(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let object = cx.load(&instance)?;
        Self::runtime_pod(cx, NumericType::Bool, RuntimeFn::DynTruthy, vec![object])
    }

    fn convert_int_cast(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let int64 = cx.numeric(NumericType::Int64);
        cx.convert_to(instance, &int64, true)
    }

    fn convert_float_cast(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let float64 = cx.numeric(NumericType::Float64);
        cx.convert_to(instance, &float64, true)
    }

    fn convert_abs(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        // abs(x) == x if x >= 0 else -x, decided by the runtime.
        let object = load_handle(cx, &instance)?;
        let zero = cx.constant_i64(0);
        let zero = Self::boxed(cx, zero)?;
        let negative = Self::owned(
            cx,
            NativeExpr::call_runtime(
                RuntimeFn::DynBinOp,
                vec![NativeExpr::i64(BinaryOperator::Lt.code()), object.clone(), zero],
            ),
        )?;
        let negative = cx.condition(negative)?;
        let wrapper = cx.dynamic_wrapper();
        let result = cx.allocate_uninitialized_slot(&wrapper)?;
        let target = result.clone();
        cx.if_else(
            negative,
            |cx| {
                let negated = NativeExpr::call_runtime(
                    RuntimeFn::DynUnOp,
                    vec![NativeExpr::i64(UnaryOperator::Neg.code()), object.clone()],
                );
                cx.push_effect(target.value.expr.clone().store(negated, NativeType::Pointer));
                cx.mark_initialized(&target);
                Ok(())
            },
            |cx| {
                Self::incref(cx, object.clone());
                cx.push_effect(target.value.expr.clone().store(object.clone(), NativeType::Pointer));
                cx.mark_initialized(&target);
                Ok(())
            },
        )?;
        Ok(result.value)
    }

    fn convert_str_cast(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let object = cx.load(&instance)?;
        Self::runtime_str(cx, RuntimeFn::DynStr, object)
    }

    fn convert_repr(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let object = cx.load(&instance)?;
        Self::runtime_str(cx, RuntimeFn::DynRepr, object)
    }

    fn convert_builtin(
        &self,
        cx: &mut ExprContext<'_>,
        name: &str,
        instance: TypedExpr,
        args: Vec<TypedExpr>,
    ) -> CodegenResult<TypedExpr> {
        match (name, args.len()) {
            ("dir", 0) => {
                let object = cx.load(&instance)?;
                Self::owned(cx, NativeExpr::call_runtime(RuntimeFn::DynDir, vec![object]))
            }
            ("format", 0) => self.convert_str_cast(cx, instance),
            _ => Err(type_error(format!(
                "Can't apply '{name}' with {} arguments to instance of type '{}'",
                args.len(),
                self.repr
            ))),
        }
    }

    // ── Operators ───────────────────────────────────────────────────

    fn convert_unary_op(
        &self,
        cx: &mut ExprContext<'_>,
        operand: TypedExpr,
        op: UnaryOperator,
    ) -> CodegenResult<TypedExpr> {
        if op == UnaryOperator::Not {
            let truth = cx.bool_cast(operand)?;
            return cx.logical_not(&truth);
        }
        let object = cx.load(&operand)?;
        Self::owned(
            cx,
            NativeExpr::call_runtime(RuntimeFn::DynUnOp, vec![NativeExpr::i64(op.code()), object]),
        )
    }

    fn convert_bin_op(
        &self,
        cx: &mut ExprContext<'_>,
        lhs: TypedExpr,
        op: BinaryOperator,
        rhs: TypedExpr,
    ) -> CodegenResult<TypedExpr> {
        let a = load_handle(cx, &lhs)?;
        let b = Self::boxed(cx, rhs)?;
        Self::owned(
            cx,
            NativeExpr::call_runtime(RuntimeFn::DynBinOp, vec![NativeExpr::i64(op.code()), a, b]),
        )
    }

    fn convert_bin_op_reverse(
        &self,
        cx: &mut ExprContext<'_>,
        rhs: TypedExpr,
        op: BinaryOperator,
        lhs: TypedExpr,
    ) -> CodegenResult<TypedExpr> {
        let b = load_handle(cx, &rhs)?;
        let a = Self::boxed(cx, lhs)?;
        Self::owned(
            cx,
            NativeExpr::call_runtime(RuntimeFn::DynBinOp, vec![NativeExpr::i64(op.code()), a, b]),
        )
    }

    // ── Iteration and scoped resources ──────────────────────────────

    fn convert_next(&self, cx: &mut ExprContext<'_>, iterator: TypedExpr) -> CodegenResult<NextValue> {
        let object = load_handle(cx, &iterator)?;
        let wrapper = cx.dynamic_wrapper();
        let produced = cx.allocate_uninitialized_slot(&wrapper)?;
        let bool_wrapper = cx.bool_wrapper();
        let valid = cx.push_pod(
            &bool_wrapper,
            NativeExpr::call_runtime(RuntimeFn::DynNext, vec![object, produced.value.expr.clone()]),
        )?;
        let slot = produced.clone();
        cx.if_true(valid.expr.clone(), move |cx| {
            cx.mark_initialized(&slot);
            Ok(())
        })?;
        Ok(NextValue {
            valid: valid.expr,
            value: produced.value,
        })
    }

    fn convert_enter(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let object = cx.load(&instance)?;
        Self::owned(cx, NativeExpr::call_runtime(RuntimeFn::DynEnter, vec![object]))
    }

    fn convert_exit(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<()> {
        let object = cx.load(&instance)?;
        cx.push_effect(NativeExpr::call_runtime(RuntimeFn::DynExit, vec![object]));
        Ok(())
    }

    // ── Conversion ──────────────────────────────────────────────────

    fn can_convert_from(&self, source: &Wrapper, _explicit: bool) -> Convertibility {
        if source.is_boxable() {
            Convertibility::Always
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
        if !source.wrapper.is_boxable() {
            return Ok(NativeExpr::bool(false));
        }
        let wrapper = source.wrapper.clone();
        let handle = wrapper.convert_box(cx, source)?;
        cx.push_effect(target.expr.clone().store(handle, NativeType::Pointer));
        Ok(NativeExpr::bool(true))
    }

    fn is_boxable(&self) -> bool {
        true
    }

    fn convert_box(&self, cx: &mut ExprContext<'_>, value: TypedExpr) -> CodegenResult<NativeExpr> {
        let handle = load_handle(cx, &value)?;
        Self::incref(cx, handle.clone());
        Ok(spill_handle(cx, handle))
    }
}
