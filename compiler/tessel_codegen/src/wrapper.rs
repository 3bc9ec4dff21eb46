//! The wrapper protocol.
//!
//! A wrapper is the compile-time description of one representation kind:
//! its native layout, its lifecycle (default/copy/assign/destroy) and how
//! every source-level operation on it lowers to native code. The set of
//! kinds is open: anything implementing [`TypeWrapper`] can be handed to
//! the factory.
//!
//! Every operation has a default. Most defaults fail with a static error
//! naming the operation and the operand types; concrete wrappers override
//! what they support. The defaults that succeed are the ones every value
//! shares: POD lifecycle, the reverse-operator fallbacks for identity and
//! mixed-type equality, `not`, and `str`/`repr`/`dir`/`format` through the
//! dynamic representation for boxable values.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::rc::Rc;

use bitflags::bitflags;
use tessel_native::{BinaryOperator, Constant, NativeExpr, NativeType, UnaryOperator};

use crate::context::ExprContext;
use crate::error::{attribute_error, internal, type_error, CodegenResult};
use crate::repr::TypeRepr;
use crate::typed_expr::TypedExpr;

bitflags! {
    /// Representation properties of a wrapper.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct ReprFlags: u8 {
        /// Plain old data: copy is a bitwise store, destroy is a no-op.
        const IS_POD = 1 << 0;
        /// Carries no data at all.
        const IS_EMPTY = 1 << 1;
        /// Passed to and returned from native functions through a pointer.
        const PASS_BY_REF = 1 << 2;
    }
}

/// Static answer to "can a value of type A become a value of type B".
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Convertibility {
    Never,
    /// Depends on the runtime value; needs a runtime check.
    Maybe,
    Always,
}

impl Convertibility {
    /// Combine the source's opinion with the target's.
    ///
    /// | to \ from | Always | Maybe  | Never  |
    /// |-----------|--------|--------|--------|
    /// | Always    | Always | Always | Always |
    /// | Maybe     | Always | Maybe  | Maybe  |
    /// | Never     | Always | Maybe  | Never  |
    pub fn combine(to: Self, from: Self) -> Self {
        match (to, from) {
            (Convertibility::Always, _) | (_, Convertibility::Always) => Convertibility::Always,
            (Convertibility::Never, Convertibility::Never) => Convertibility::Never,
            _ => Convertibility::Maybe,
        }
    }
}

/// Result of advancing an iterator: a success flag and the produced value,
/// valid only where the flag is set.
#[derive(Clone, Debug)]
pub struct NextValue {
    pub valid: NativeExpr,
    pub value: TypedExpr,
}

/// Capability contract for one representation kind.
pub trait TypeWrapper: fmt::Debug {
    /// Name of the concrete wrapper implementation.
    fn kind_name(&self) -> &'static str;

    fn repr(&self) -> &TypeRepr;

    fn flags(&self) -> ReprFlags;

    fn native_layout(&self) -> CodegenResult<NativeType>;

    fn is_pod(&self) -> bool {
        self.flags().contains(ReprFlags::IS_POD)
    }

    fn is_empty(&self) -> bool {
        self.flags().contains(ReprFlags::IS_EMPTY)
    }

    fn is_pass_by_ref(&self) -> bool {
        self.flags().contains(ReprFlags::PASS_BY_REF)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    fn convert_default_initialize(
        &self,
        cx: &mut ExprContext<'_>,
        target: &TypedExpr,
    ) -> CodegenResult<()> {
        if self.is_pod() {
            let layout = self.native_layout()?;
            if layout.is_scalar() {
                cx.push_effect(target.expr.clone().store(
                    NativeExpr::Constant(Constant::zero(&layout)),
                    layout,
                ));
            }
            return Ok(());
        }
        Err(type_error(format!(
            "Can't default-initialize instances of type '{}'",
            self.repr()
        )))
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
        Err(internal(format!(
            "'{}' doesn't implement copy-initialization",
            self.repr()
        )))
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
        Err(internal(format!(
            "'{}' doesn't implement assignment",
            self.repr()
        )))
    }

    fn convert_destroy(&self, _cx: &mut ExprContext<'_>, _target: &TypedExpr) -> CodegenResult<()> {
        if self.is_pod() {
            return Ok(());
        }
        Err(internal(format!(
            "'{}' doesn't implement destruction",
            self.repr()
        )))
    }

    fn convert_incref(&self, _cx: &mut ExprContext<'_>, _target: &TypedExpr) -> CodegenResult<()> {
        if self.is_pod() {
            return Ok(());
        }
        Err(internal(format!("'{}' is not refcounted", self.repr())))
    }

    // ── Attributes and items ────────────────────────────────────────

    fn convert_attribute(
        &self,
        _cx: &mut ExprContext<'_>,
        _instance: TypedExpr,
        attr: &str,
    ) -> CodegenResult<TypedExpr> {
        Err(attribute_error(format!(
            "'{}' object has no attribute '{attr}'",
            self.repr()
        )))
    }

    fn convert_set_attribute(
        &self,
        _cx: &mut ExprContext<'_>,
        _instance: TypedExpr,
        attr: &str,
        _value: TypedExpr,
    ) -> CodegenResult<()> {
        Err(attribute_error(format!(
            "'{}' object has no attribute '{attr}'",
            self.repr()
        )))
    }

    fn convert_getitem(
        &self,
        _cx: &mut ExprContext<'_>,
        _instance: TypedExpr,
        _index: TypedExpr,
    ) -> CodegenResult<TypedExpr> {
        Err(type_error(format!(
            "'{}' object is not subscriptable",
            self.repr()
        )))
    }

    fn convert_setitem(
        &self,
        _cx: &mut ExprContext<'_>,
        _instance: TypedExpr,
        _index: TypedExpr,
        _value: TypedExpr,
    ) -> CodegenResult<()> {
        Err(type_error(format!(
            "'{}' object does not support item assignment",
            self.repr()
        )))
    }

    fn convert_delitem(
        &self,
        _cx: &mut ExprContext<'_>,
        _instance: TypedExpr,
        _index: TypedExpr,
    ) -> CodegenResult<()> {
        Err(type_error(format!(
            "'{}' object does not support item deletion",
            self.repr()
        )))
    }

    fn convert_getslice(
        &self,
        _cx: &mut ExprContext<'_>,
        _instance: TypedExpr,
        _lower: Option<TypedExpr>,
        _upper: Option<TypedExpr>,
        _step: Option<TypedExpr>,
    ) -> CodegenResult<TypedExpr> {
        Err(type_error(format!(
            "'{}' object can't be sliced",
            self.repr()
        )))
    }

    // ── Calls ───────────────────────────────────────────────────────

    fn convert_call(
        &self,
        _cx: &mut ExprContext<'_>,
        _instance: TypedExpr,
        _args: Vec<TypedExpr>,
    ) -> CodegenResult<TypedExpr> {
        Err(type_error(format!("'{}' object is not callable", self.repr())))
    }

    fn convert_method_call(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        name: &str,
        args: Vec<TypedExpr>,
    ) -> CodegenResult<TypedExpr> {
        let method = cx.attribute(instance, name)?;
        cx.call(method, args)
    }

    /// Call the type itself, i.e. construct an instance.
    fn convert_type_call(
        &self,
        _cx: &mut ExprContext<'_>,
        _args: Vec<TypedExpr>,
    ) -> CodegenResult<TypedExpr> {
        Err(type_error(format!(
            "Can't construct instances of type '{}'",
            self.repr()
        )))
    }

    // ── Builtins and casts ──────────────────────────────────────────

    fn convert_len(&self, _cx: &mut ExprContext<'_>, _instance: TypedExpr) -> CodegenResult<TypedExpr> {
        Err(type_error(format!(
            "Can't take 'len' of instance of type '{}'",
            self.repr()
        )))
    }

    fn convert_hash(&self, _cx: &mut ExprContext<'_>, _instance: TypedExpr) -> CodegenResult<TypedExpr> {
        Err(type_error(format!(
            "Can't hash instance of type '{}'",
            self.repr()
        )))
    }

    fn convert_abs(&self, _cx: &mut ExprContext<'_>, _instance: TypedExpr) -> CodegenResult<TypedExpr> {
        Err(type_error(format!(
            "Can't take 'abs' of instance of type '{}'",
            self.repr()
        )))
    }

    fn convert_bool_cast(
        &self,
        _cx: &mut ExprContext<'_>,
        _instance: TypedExpr,
    ) -> CodegenResult<TypedExpr> {
        Err(type_error(format!(
            "Can't take 'bool' of instance of type '{}'",
            self.repr()
        )))
    }

    fn convert_int_cast(
        &self,
        _cx: &mut ExprContext<'_>,
        _instance: TypedExpr,
    ) -> CodegenResult<TypedExpr> {
        Err(type_error(format!(
            "Can't take 'int' of instance of type '{}'",
            self.repr()
        )))
    }

    fn convert_float_cast(
        &self,
        _cx: &mut ExprContext<'_>,
        _instance: TypedExpr,
    ) -> CodegenResult<TypedExpr> {
        Err(type_error(format!(
            "Can't take 'float' of instance of type '{}'",
            self.repr()
        )))
    }

    fn convert_str_cast(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        if self.is_boxable() {
            let boxed = cx.box_to_dynamic(instance)?;
            return cx.str_cast(boxed);
        }
        Err(type_error(format!(
            "Can't take 'str' of instance of type '{}'",
            self.repr()
        )))
    }

    fn convert_bytes_cast(
        &self,
        _cx: &mut ExprContext<'_>,
        _instance: TypedExpr,
    ) -> CodegenResult<TypedExpr> {
        Err(type_error(format!(
            "Can't take 'bytes' of instance of type '{}'",
            self.repr()
        )))
    }

    fn convert_repr(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        if self.is_boxable() {
            let boxed = cx.box_to_dynamic(instance)?;
            return cx.repr(boxed);
        }
        Err(type_error(format!(
            "Can't take 'repr' of instance of type '{}'",
            self.repr()
        )))
    }

    /// `round`, `trunc`, `floor`, `ceil`, `dir` and `format`.
    fn convert_builtin(
        &self,
        cx: &mut ExprContext<'_>,
        name: &str,
        instance: TypedExpr,
        args: Vec<TypedExpr>,
    ) -> CodegenResult<TypedExpr> {
        if self.is_boxable() && matches!(name, "dir" | "format") {
            let boxed = cx.box_to_dynamic(instance)?;
            return cx.builtin(name, boxed, args);
        }
        Err(type_error(format!(
            "Can't apply '{name}' to instance of type '{}'",
            self.repr()
        )))
    }

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
        Err(type_error(format!(
            "bad operand type for unary {op}: '{}'",
            self.repr()
        )))
    }

    fn convert_bin_op(
        &self,
        cx: &mut ExprContext<'_>,
        lhs: TypedExpr,
        op: BinaryOperator,
        rhs: TypedExpr,
    ) -> CodegenResult<TypedExpr> {
        let reverse = rhs.wrapper.clone();
        reverse.convert_bin_op_reverse(cx, rhs, op, lhs)
    }

    /// Called when the left operand's wrapper doesn't handle `op`.
    fn convert_bin_op_reverse(
        &self,
        cx: &mut ExprContext<'_>,
        rhs: TypedExpr,
        op: BinaryOperator,
        lhs: TypedExpr,
    ) -> CodegenResult<TypedExpr> {
        default_bin_op_reverse(cx, &rhs, op, &lhs)
    }

    fn convert_next(&self, _cx: &mut ExprContext<'_>, _iterator: TypedExpr) -> CodegenResult<NextValue> {
        Err(type_error(format!(
            "'{}' object is not an iterator",
            self.repr()
        )))
    }

    fn convert_enter(&self, _cx: &mut ExprContext<'_>, _instance: TypedExpr) -> CodegenResult<TypedExpr> {
        Err(attribute_error(format!(
            "'{}' object has no attribute '__enter__'",
            self.repr()
        )))
    }

    fn convert_exit(&self, _cx: &mut ExprContext<'_>, _instance: TypedExpr) -> CodegenResult<()> {
        Err(attribute_error(format!(
            "'{}' object has no attribute '__exit__'",
            self.repr()
        )))
    }

    // ── Conversion ──────────────────────────────────────────────────

    /// This wrapper's opinion on converting its values to `target`.
    fn can_convert_to(&self, _target: &Wrapper, _explicit: bool) -> Convertibility {
        Convertibility::Never
    }

    /// This wrapper's opinion on producing its values from `source`.
    fn can_convert_from(&self, _source: &Wrapper, _explicit: bool) -> Convertibility {
        Convertibility::Never
    }

    /// Populate the uninitialized `target` from `value`, yielding a `bool`
    /// success flag. The target is initialized exactly where the flag is
    /// true.
    fn convert_to_with_target(
        &self,
        cx: &mut ExprContext<'_>,
        value: TypedExpr,
        target: &TypedExpr,
        explicit: bool,
    ) -> CodegenResult<NativeExpr> {
        let target_wrapper = target.wrapper.clone();
        target_wrapper.convert_to_self_with_target(cx, target, value, explicit)
    }

    /// Target side of [`convert_to_with_target`](Self::convert_to_with_target).
    fn convert_to_self_with_target(
        &self,
        cx: &mut ExprContext<'_>,
        target: &TypedExpr,
        source: TypedExpr,
        _explicit: bool,
    ) -> CodegenResult<NativeExpr> {
        if source.wrapper == target.wrapper {
            cx.copy_initialize(target, &source)?;
            return Ok(NativeExpr::bool(true));
        }
        Ok(NativeExpr::bool(false))
    }

    /// Whether values can be boxed into the dynamic representation.
    fn is_boxable(&self) -> bool {
        false
    }

    /// Box `value` into a new dynamic object, yielding the owned handle.
    fn convert_box(&self, _cx: &mut ExprContext<'_>, _value: TypedExpr) -> CodegenResult<NativeExpr> {
        Err(type_error(format!(
            "Can't convert instance of type '{}' to object",
            self.repr()
        )))
    }
}

/// Fallbacks shared by every reverse binary operator: identity is false
/// across distinct values, mixed-type equality is false.
pub fn default_bin_op_reverse(
    cx: &mut ExprContext<'_>,
    rhs: &TypedExpr,
    op: BinaryOperator,
    lhs: &TypedExpr,
) -> CodegenResult<TypedExpr> {
    match op {
        BinaryOperator::Is => Ok(cx.constant_bool(false)),
        BinaryOperator::IsNot => Ok(cx.constant_bool(true)),
        BinaryOperator::Eq if lhs.wrapper != rhs.wrapper => Ok(cx.constant_bool(false)),
        BinaryOperator::NotEq if lhs.wrapper != rhs.wrapper => Ok(cx.constant_bool(true)),
        _ => Err(type_error(format!(
            "Can't apply op {op} to expressions of type {} and {}",
            lhs.wrapper, rhs.wrapper
        ))),
    }
}

// ── Wrapper handle ──────────────────────────────────────────────────

/// Shared handle to a wrapper. Equal iff same kind and same repr.
#[derive(Clone)]
pub struct Wrapper(Rc<dyn TypeWrapper>);

impl Wrapper {
    pub fn new(wrapper: impl TypeWrapper + 'static) -> Self {
        Wrapper(Rc::new(wrapper))
    }
}

impl Deref for Wrapper {
    type Target = dyn TypeWrapper;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for Wrapper {
    fn eq(&self, other: &Self) -> bool {
        self.kind_name() == other.kind_name() && self.repr() == other.repr()
    }
}

impl Eq for Wrapper {}

impl Hash for Wrapper {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind_name().hash(state);
        self.repr().hash(state);
    }
}

impl fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind_name(), self.repr())
    }
}

impl fmt::Display for Wrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}
