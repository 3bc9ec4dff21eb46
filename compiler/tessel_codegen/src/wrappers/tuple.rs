//! Fixed-arity tuples held by value.

use tessel_native::{
    BinaryOperator, ErrorCategory, NativeBinOp, NativeExpr, NativeType, NativeUnOp, RuntimeFn,
};

use super::indexing;
use super::refcount::spill_handle;
use crate::context::ExprContext;
use crate::error::{CodegenError, CodegenResult};
use crate::repr::{NumericType, TypeRepr};
use crate::typed_expr::TypedExpr;
use crate::wrapper::{ReprFlags, TypeWrapper, Wrapper};

const INDEX_OUT_OF_RANGE: &str = "tuple index out of range";

/// Multiplier of the element hash combination.
const HASH_MULTIPLIER: i128 = 1_000_003;

#[derive(Debug)]
pub struct TupleWrapper {
    repr: TypeRepr,
    elements: Vec<Wrapper>,
}

impl TupleWrapper {
    pub fn new(repr: TypeRepr, elements: Vec<Wrapper>) -> Self {
        TupleWrapper { repr, elements }
    }

    pub fn elements(&self) -> &[Wrapper] {
        &self.elements
    }

    fn offsets(&self) -> CodegenResult<Vec<u32>> {
        Ok(self.native_layout()?.field_offsets())
    }

    /// References to every element of `instance`.
    fn element_refs(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<Vec<TypedExpr>> {
        let base = cx.ensure_reference(instance)?.expr;
        let offsets = self.offsets()?;
        Ok(self
            .elements
            .iter()
            .zip(offsets)
            .map(|(element, offset)| {
                TypedExpr::reference(base.clone().field_ptr(offset), element.clone())
            })
            .collect())
    }

    fn is_homogeneous(&self) -> bool {
        self.elements.windows(2).all(|pair| pair[0] == pair[1])
    }

    fn self_wrapper(&self, cx: &ExprContext<'_>) -> CodegenResult<Wrapper> {
        cx.wrapper(&self.repr)
    }

    /// `instance[index]` for an index only known at runtime.
    fn dynamic_getitem(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        index: NativeExpr,
    ) -> CodegenResult<TypedExpr> {
        let count = NativeExpr::i64(self.elements.len() as i64);
        let index = indexing::checked(cx, index, &count, INDEX_OUT_OF_RANGE)?;

        let elements = self.element_refs(cx, instance)?;
        if self.is_homogeneous() {
            let element = self.elements[0].clone();
            let stride = element.native_layout()?.size();
            let base = elements[0].expr.clone();
            return Ok(cx.push_reference(&element, base.element_ptr(index, stride)));
        }

        if let Some(element) = self.elements.iter().find(|e| !e.is_boxable()) {
            return Err(crate::error::type_error(format!(
                "Can't index '{}' with a non-constant index: element '{element}' has no object form",
                self.repr
            )));
        }
        let dynamic = cx.dynamic_wrapper();
        let result = cx.allocate_uninitialized_slot(&dynamic)?;
        for (i, element) in elements.into_iter().enumerate() {
            let selected = index.clone().binary(NativeBinOp::Eq, NativeExpr::i64(i as i64));
            let slot = result.clone();
            cx.if_true(selected, move |cx| {
                let wrapper = element.wrapper.clone();
                let handle = wrapper.convert_box(cx, element)?;
                cx.push_effect(slot.value.expr.clone().store(handle, NativeType::Pointer));
                cx.mark_initialized(&slot);
                Ok(())
            })?;
        }
        Ok(result.value)
    }

    /// Element-wise equality of two tuples of this type.
    fn equal(&self, cx: &mut ExprContext<'_>, lhs: TypedExpr, rhs: TypedExpr) -> CodegenResult<NativeExpr> {
        let lhs = self.element_refs(cx, lhs)?;
        let rhs = self.element_refs(cx, rhs)?;
        let mut all = NativeExpr::bool(true);
        for (a, b) in lhs.into_iter().zip(rhs) {
            let equal = cx.bin_op(a, BinaryOperator::Eq, b)?;
            let truth = cx.condition(equal)?;
            all = all.binary(NativeBinOp::And, truth);
        }
        Ok(all)
    }
}

impl TypeWrapper for TupleWrapper {
    fn kind_name(&self) -> &'static str {
        "Tuple"
    }

    fn repr(&self) -> &TypeRepr {
        &self.repr
    }

    fn flags(&self) -> ReprFlags {
        let mut flags = ReprFlags::PASS_BY_REF;
        if self.elements.iter().all(|e| e.is_pod()) {
            flags |= ReprFlags::IS_POD;
        }
        if self.elements.is_empty() {
            flags |= ReprFlags::IS_EMPTY;
        }
        flags
    }

    fn native_layout(&self) -> CodegenResult<NativeType> {
        let fields = self
            .elements
            .iter()
            .map(|e| e.native_layout())
            .collect::<CodegenResult<Vec<_>>>()?;
        Ok(NativeType::Struct(fields))
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    fn convert_default_initialize(&self, cx: &mut ExprContext<'_>, target: &TypedExpr) -> CodegenResult<()> {
        for element in self.element_refs(cx, target.clone())? {
            cx.default_initialize(&element)?;
        }
        Ok(())
    }

    fn convert_copy_initialize(
        &self,
        cx: &mut ExprContext<'_>,
        target: &TypedExpr,
        source: &TypedExpr,
    ) -> CodegenResult<()> {
        if self.is_pod() {
            return cx.store_pod(target, source);
        }
        let targets = self.element_refs(cx, target.clone())?;
        let sources = self.element_refs(cx, source.clone())?;
        for (t, s) in targets.iter().zip(&sources) {
            cx.copy_initialize(t, s)?;
        }
        Ok(())
    }

    fn convert_assign(
        &self,
        cx: &mut ExprContext<'_>,
        target: &TypedExpr,
        source: &TypedExpr,
    ) -> CodegenResult<()> {
        if self.is_pod() {
            return cx.store_pod(target, source);
        }
        let targets = self.element_refs(cx, target.clone())?;
        let sources = self.element_refs(cx, source.clone())?;
        for (t, s) in targets.iter().zip(&sources) {
            cx.assign(t, s)?;
        }
        Ok(())
    }

    fn convert_destroy(&self, cx: &mut ExprContext<'_>, target: &TypedExpr) -> CodegenResult<()> {
        if self.is_pod() {
            return Ok(());
        }
        for element in self.element_refs(cx, target.clone())? {
            cx.destroy(&element)?;
        }
        Ok(())
    }

    // ── Construction ────────────────────────────────────────────────

    fn convert_type_call(&self, cx: &mut ExprContext<'_>, args: Vec<TypedExpr>) -> CodegenResult<TypedExpr> {
        let wrapper = self.self_wrapper(cx)?;
        if args.is_empty() {
            return cx.push_default(&wrapper);
        }
        if args.len() != self.elements.len() {
            return Err(CodegenError::ConstructorArity {
                name: self.repr.to_string(),
                expected: self.elements.len(),
                found: args.len(),
            });
        }
        let mut converted = Vec::with_capacity(args.len());
        for (arg, element) in args.into_iter().zip(&self.elements) {
            converted.push(cx.convert_to(arg, element, true)?);
        }
        let result = cx.allocate_uninitialized_slot(&wrapper)?;
        let targets = self.element_refs(cx, result.value.clone())?;
        for (target, value) in targets.iter().zip(&converted) {
            cx.copy_initialize(target, value)?;
        }
        cx.mark_initialized(&result);
        Ok(result.value)
    }

    // ── Queries ─────────────────────────────────────────────────────

    fn convert_len(&self, cx: &mut ExprContext<'_>, _instance: TypedExpr) -> CodegenResult<TypedExpr> {
        Ok(cx.constant_i64(self.elements.len() as i64))
    }

    fn convert_bool_cast(&self, cx: &mut ExprContext<'_>, _instance: TypedExpr) -> CodegenResult<TypedExpr> {
        Ok(cx.constant_bool(!self.elements.is_empty()))
    }

    fn convert_hash(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let int32 = cx.numeric(NumericType::Int32);
        let mut hash = cx.constant_int(0, NumericType::Int32);
        for element in self.element_refs(cx, instance)? {
            let sub = cx.hash(element)?;
            let sub = cx.convert_to(sub, &int32, true)?;
            let multiplier = cx.constant_int(HASH_MULTIPLIER, NumericType::Int32);
            let scaled = cx.bin_op(hash, BinaryOperator::Mul, multiplier)?;
            hash = cx.bin_op(scaled, BinaryOperator::BitXor, sub)?;
        }
        Ok(hash)
    }

    fn convert_getitem(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        index: TypedExpr,
    ) -> CodegenResult<TypedExpr> {
        let count = self.elements.len() as i128;

        if let Some(value) = index.as_constant_int() {
            let normalized = if value < 0 { value + count } else { value };
            if normalized < 0 || normalized >= count {
                return Err(CodegenError::Unsupported {
                    category: ErrorCategory::IndexError,
                    message: format!("{INDEX_OUT_OF_RANGE}: index {value} of '{}'", self.repr),
                });
            }
            let mut elements = self.element_refs(cx, instance)?;
            return Ok(elements.swap_remove(normalized as usize));
        }

        if self.elements.is_empty() {
            return Err(CodegenError::Unsupported {
                category: ErrorCategory::IndexError,
                message: INDEX_OUT_OF_RANGE.to_owned(),
            });
        }
        let int64 = cx.numeric(NumericType::Int64);
        let index = cx.convert_to(index, &int64, false)?;
        let index = cx.load(&index)?;
        self.dynamic_getitem(cx, instance, index)
    }

    fn convert_bin_op(
        &self,
        cx: &mut ExprContext<'_>,
        lhs: TypedExpr,
        op: BinaryOperator,
        rhs: TypedExpr,
    ) -> CodegenResult<TypedExpr> {
        if rhs.wrapper.repr() == &self.repr
            && matches!(op, BinaryOperator::Eq | BinaryOperator::NotEq)
        {
            let mut equal = self.equal(cx, lhs, rhs)?;
            if op == BinaryOperator::NotEq {
                equal = equal.unary(NativeUnOp::Not);
            }
            let wrapper = cx.bool_wrapper();
            return cx.push_pod(&wrapper, equal);
        }
        let reverse = rhs.wrapper.clone();
        reverse.convert_bin_op_reverse(cx, rhs, op, lhs)
    }

    // ── Boxing ──────────────────────────────────────────────────────

    fn is_boxable(&self) -> bool {
        self.elements.iter().all(|e| e.is_boxable())
    }

    fn convert_box(&self, cx: &mut ExprContext<'_>, value: TypedExpr) -> CodegenResult<NativeExpr> {
        let count = self.elements.len() as i64;
        let handle = spill_handle(
            cx,
            NativeExpr::call_runtime(RuntimeFn::DynTupleNew, vec![NativeExpr::i64(count)]),
        );
        for (i, element) in self.element_refs(cx, value)?.into_iter().enumerate() {
            let boxed = cx.box_to_dynamic(element)?;
            let boxed = cx.load(&boxed)?;
            cx.push_effect(NativeExpr::call_runtime(
                RuntimeFn::DynTupleSet,
                vec![handle.clone(), NativeExpr::i64(i as i64), boxed],
            ));
        }
        Ok(handle)
    }
}
