//! Bool, integers and floats.
//!
//! Mixed-type operators promote both operands to a common type first (see
//! [`promote`]) and re-dispatch, so the lowering below only ever sees two
//! operands of the same type.

use tessel_native::{
    BinaryOperator, Constant, ErrorCategory, NativeBinOp, NativeExpr, NativeType, NativeUnOp,
    RuntimeFn, UnaryOperator,
};

use crate::context::ExprContext;
use crate::error::{type_error, CodegenError, CodegenResult};
use crate::repr::{NumericType, TypeRepr};
use crate::typed_expr::TypedExpr;
use crate::wrapper::{Convertibility, ReprFlags, TypeWrapper, Wrapper};

const INT_DIVISION_BY_ZERO: &str = "integer division or modulo by zero";
const FLOAT_DIVISION_BY_ZERO: &str = "float division by zero";
const FLOAT_MODULO_BY_ZERO: &str = "float modulo";

// ── Promotion ───────────────────────────────────────────────────────

/// The common type two numeric operands are brought to before a binary
/// operator applies. Symmetric.
pub fn promote(a: NumericType, b: NumericType) -> NumericType {
    if a == b {
        return a;
    }
    if a.is_bool() {
        return b;
    }
    if b.is_bool() {
        return a;
    }
    match (a.is_float(), b.is_float()) {
        (true, true) => wider(a, b),
        (true, false) => float_with_int(a, b),
        (false, true) => float_with_int(b, a),
        (false, false) if a.is_signed() == b.is_signed() => wider(a, b),
        (false, false) => {
            let (unsigned, signed) = if a.is_signed() { (b, a) } else { (a, b) };
            if unsigned.bits() >= signed.bits() {
                unsigned
            } else {
                signed
            }
        }
    }
}

fn wider(a: NumericType, b: NumericType) -> NumericType {
    if a.bits() >= b.bits() {
        a
    } else {
        b
    }
}

fn float_with_int(float: NumericType, int: NumericType) -> NumericType {
    if int.bits() > 32 {
        NumericType::Float64
    } else {
        float
    }
}

/// Whether values of `from` convert to `to` without an explicit cast.
pub fn is_implicit_widening(from: NumericType, to: NumericType) -> bool {
    promote(from, to) == to
}

// ── Wrapper ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ArithmeticWrapper {
    repr: TypeRepr,
    t: NumericType,
}

impl ArithmeticWrapper {
    pub fn new(t: NumericType) -> Self {
        ArithmeticWrapper {
            repr: TypeRepr::Numeric(t),
            t,
        }
    }

    pub fn numeric_type(&self) -> NumericType {
        self.t
    }

    fn zero(&self) -> NativeExpr {
        NativeExpr::Constant(Constant::zero(&self.t.native()))
    }

    /// The operand as a scalar that can be evaluated repeatedly.
    fn operand(cx: &mut ExprContext<'_>, value: TypedExpr) -> CodegenResult<NativeExpr> {
        let value = cx.stabilize(value)?;
        cx.load(&value)
    }

    fn result(&self, cx: &mut ExprContext<'_>, expr: NativeExpr) -> CodegenResult<TypedExpr> {
        let wrapper = cx.numeric(self.t);
        cx.push_pod(&wrapper, expr)
    }

    fn zero_check(&self, cx: &mut ExprContext<'_>, divisor: &NativeExpr, message: &str) -> CodegenResult<()> {
        let is_zero = divisor.clone().binary(NativeBinOp::Eq, self.zero());
        cx.raise_if(is_zero, ErrorCategory::ZeroDivisionError, message)
    }

    /// `value` widened to the 64-bit domain of the same signedness.
    fn to_64(&self, value: NativeExpr) -> NativeExpr {
        let domain = if self.t.is_signed() {
            NativeType::I64
        } else {
            NativeType::U64
        };
        if self.t.native() == domain {
            value
        } else {
            value.cast(domain)
        }
    }

    fn to_f64(&self, value: NativeExpr) -> NativeExpr {
        if self.t == NumericType::Float64 {
            value
        } else {
            value.cast(NativeType::F64)
        }
    }

    /// Bring a `Float64` intermediate back to this type.
    fn float64_back(&self, cx: &mut ExprContext<'_>, value: NativeExpr) -> CodegenResult<TypedExpr> {
        let float64 = cx.numeric(NumericType::Float64);
        let intermediate = cx.push_pod(&float64, value)?;
        convert_numeric(cx, intermediate, self.t)
    }

    fn lower_integer(
        &self,
        cx: &mut ExprContext<'_>,
        op: BinaryOperator,
        a: NativeExpr,
        b: NativeExpr,
    ) -> CodegenResult<Option<TypedExpr>> {
        let signed = self.t.is_signed();
        let native = match op {
            BinaryOperator::Add => NativeBinOp::Add,
            BinaryOperator::Sub => NativeBinOp::Sub,
            BinaryOperator::Mul => NativeBinOp::Mul,
            BinaryOperator::BitAnd => NativeBinOp::And,
            BinaryOperator::BitOr => NativeBinOp::Or,
            BinaryOperator::BitXor => NativeBinOp::Xor,
            BinaryOperator::Mod => {
                self.zero_check(cx, &b, INT_DIVISION_BY_ZERO)?;
                NativeBinOp::Rem
            }
            BinaryOperator::FloorDiv => {
                self.zero_check(cx, &b, INT_DIVISION_BY_ZERO)?;
                if !signed {
                    return self.result(cx, a.binary(NativeBinOp::Div, b)).map(Some);
                }
                return self.floor_div_signed(cx, a, b).map(Some);
            }
            BinaryOperator::Pow => {
                let func = if signed {
                    RuntimeFn::PowInt64
                } else {
                    RuntimeFn::PowUInt64
                };
                let float64 = cx.numeric(NumericType::Float64);
                let call = NativeExpr::call_runtime(func, vec![self.to_64(a), self.to_64(b)]);
                return cx.push_pod(&float64, call).map(Some);
            }
            BinaryOperator::LShift | BinaryOperator::RShift => {
                let func = match (op, signed) {
                    (BinaryOperator::LShift, true) => RuntimeFn::LShiftInt64,
                    (BinaryOperator::LShift, false) => RuntimeFn::LShiftUInt64,
                    (_, true) => RuntimeFn::RShiftInt64,
                    (_, false) => RuntimeFn::RShiftUInt64,
                };
                let shifted = NativeExpr::call_runtime(func, vec![self.to_64(a), self.to_64(b)]);
                let back = if self.t.bits() == 64 {
                    shifted
                } else {
                    shifted.cast(self.t.native())
                };
                return self.result(cx, back).map(Some);
            }
            _ => return self.lower_comparison(cx, op, a, b),
        };
        self.result(cx, a.binary(native, b)).map(Some)
    }

    /// Division rounding toward negative infinity.
    fn floor_div_signed(&self, cx: &mut ExprContext<'_>, a: NativeExpr, b: NativeExpr) -> CodegenResult<TypedExpr> {
        let quotient = a.clone().binary(NativeBinOp::Div, b.clone());
        let remainder = a.clone().binary(NativeBinOp::Rem, b.clone());
        let inexact = remainder.binary(NativeBinOp::Ne, self.zero());
        let signs_differ = a
            .binary(NativeBinOp::Lt, self.zero())
            .binary(NativeBinOp::Xor, b.binary(NativeBinOp::Lt, self.zero()));
        let one = NativeExpr::Constant(Constant::int(1, &self.t.native()));
        let corrected = NativeExpr::Branch {
            cond: Box::new(inexact.binary(NativeBinOp::And, signs_differ)),
            then: Box::new(quotient.clone().binary(NativeBinOp::Sub, one)),
            otherwise: Box::new(quotient),
        };
        self.result(cx, corrected)
    }

    fn lower_float(
        &self,
        cx: &mut ExprContext<'_>,
        op: BinaryOperator,
        a: NativeExpr,
        b: NativeExpr,
    ) -> CodegenResult<Option<TypedExpr>> {
        let native = match op {
            BinaryOperator::Add => NativeBinOp::Add,
            BinaryOperator::Sub => NativeBinOp::Sub,
            BinaryOperator::Mul => NativeBinOp::Mul,
            BinaryOperator::Div => {
                self.zero_check(cx, &b, FLOAT_DIVISION_BY_ZERO)?;
                NativeBinOp::Div
            }
            BinaryOperator::Mod => {
                self.zero_check(cx, &b, FLOAT_MODULO_BY_ZERO)?;
                let call = NativeExpr::call_runtime(
                    RuntimeFn::ModFloat64,
                    vec![self.to_f64(a), self.to_f64(b)],
                );
                return self.float64_back(cx, call).map(Some);
            }
            BinaryOperator::FloorDiv => {
                self.zero_check(cx, &b, FLOAT_DIVISION_BY_ZERO)?;
                let call = NativeExpr::call_runtime(
                    RuntimeFn::FloorDivFloat64,
                    vec![self.to_f64(a), self.to_f64(b)],
                );
                return self.float64_back(cx, call).map(Some);
            }
            BinaryOperator::Pow => {
                let float64 = cx.numeric(NumericType::Float64);
                let call = NativeExpr::call_runtime(
                    RuntimeFn::PowFloat64,
                    vec![self.to_f64(a), self.to_f64(b)],
                );
                return cx.push_pod(&float64, call).map(Some);
            }
            _ => return self.lower_comparison(cx, op, a, b),
        };
        self.result(cx, a.binary(native, b)).map(Some)
    }

    fn lower_comparison(
        &self,
        cx: &mut ExprContext<'_>,
        op: BinaryOperator,
        a: NativeExpr,
        b: NativeExpr,
    ) -> CodegenResult<Option<TypedExpr>> {
        let native = match op {
            BinaryOperator::Eq => NativeBinOp::Eq,
            BinaryOperator::NotEq => NativeBinOp::Ne,
            BinaryOperator::Lt => NativeBinOp::Lt,
            BinaryOperator::LtE => NativeBinOp::Le,
            BinaryOperator::Gt => NativeBinOp::Gt,
            BinaryOperator::GtE => NativeBinOp::Ge,
            _ => return Ok(None),
        };
        let wrapper = cx.bool_wrapper();
        cx.push_pod(&wrapper, a.binary(native, b)).map(Some)
    }

    /// Same-type operators on bool. Returns `None` when the operator is not
    /// defined on bools at all.
    fn lower_bool(
        &self,
        cx: &mut ExprContext<'_>,
        lhs: TypedExpr,
        op: BinaryOperator,
        rhs: TypedExpr,
    ) -> CodegenResult<Option<TypedExpr>> {
        let op = match op {
            BinaryOperator::Is => BinaryOperator::Eq,
            BinaryOperator::IsNot => BinaryOperator::NotEq,
            op => op,
        };
        let native = match op {
            BinaryOperator::BitAnd => Some(NativeBinOp::And),
            BinaryOperator::BitOr => Some(NativeBinOp::Or),
            BinaryOperator::BitXor => Some(NativeBinOp::Xor),
            _ => None,
        };
        if let Some(native) = native {
            let a = Self::operand(cx, lhs)?;
            let b = Self::operand(cx, rhs)?;
            return self.result(cx, a.binary(native, b)).map(Some);
        }
        if op.is_comparison() {
            let a = Self::operand(cx, lhs)?;
            let b = Self::operand(cx, rhs)?;
            return self.lower_comparison(cx, op, a, b);
        }
        if matches!(
            op,
            BinaryOperator::Add
                | BinaryOperator::Sub
                | BinaryOperator::Mul
                | BinaryOperator::FloorDiv
                | BinaryOperator::Mod
                | BinaryOperator::Pow
                | BinaryOperator::LShift
                | BinaryOperator::RShift
        ) {
            let widened = convert_numeric(cx, lhs, NumericType::Int64)?;
            return cx.bin_op(widened, op, rhs).map(Some);
        }
        Ok(None)
    }

    /// Round a float through the runtime.
    fn float_builtin(&self, cx: &mut ExprContext<'_>, func: RuntimeFn, value: TypedExpr) -> CodegenResult<TypedExpr> {
        let loaded = cx.load(&value)?;
        let call = NativeExpr::call_runtime(func, vec![self.to_f64(loaded)]);
        self.float64_back(cx, call)
    }
}

/// Convert `value` explicitly to the numeric type `t`.
pub(crate) fn convert_numeric(cx: &mut ExprContext<'_>, value: TypedExpr, t: NumericType) -> CodegenResult<TypedExpr> {
    let wrapper = cx.numeric(t);
    cx.convert_to(value, &wrapper, true)
}

impl TypeWrapper for ArithmeticWrapper {
    fn kind_name(&self) -> &'static str {
        "Arithmetic"
    }

    fn repr(&self) -> &TypeRepr {
        &self.repr
    }

    fn flags(&self) -> ReprFlags {
        ReprFlags::IS_POD
    }

    fn native_layout(&self) -> CodegenResult<NativeType> {
        Ok(self.t.native())
    }

    // ── Construction ────────────────────────────────────────────────

    fn convert_type_call(&self, cx: &mut ExprContext<'_>, mut args: Vec<TypedExpr>) -> CodegenResult<TypedExpr> {
        match args.len() {
            0 => Ok(TypedExpr::value(self.zero(), cx.numeric(self.t))),
            1 => {
                let arg = args.remove(0);
                convert_numeric(cx, arg, self.t)
            }
            found => Err(CodegenError::ConstructorArity {
                name: self.repr.to_string(),
                expected: 1,
                found,
            }),
        }
    }

    // ── Casts and builtins ──────────────────────────────────────────

    fn convert_bool_cast(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        if self.t.is_bool() {
            return Ok(instance);
        }
        let value = cx.load(&instance)?;
        let wrapper = cx.bool_wrapper();
        cx.push_pod(&wrapper, value.binary(NativeBinOp::Ne, self.zero()))
    }

    fn convert_int_cast(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        convert_numeric(cx, instance, NumericType::Int64)
    }

    fn convert_float_cast(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        convert_numeric(cx, instance, NumericType::Float64)
    }

    fn convert_str_cast(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let value = cx.load(&instance)?;
        let call = match self.t {
            NumericType::Bool => NativeExpr::call_runtime(RuntimeFn::BoolToString, vec![value]),
            NumericType::Float32 => NativeExpr::call_runtime(RuntimeFn::Float32ToString, vec![value]),
            NumericType::Float64 => NativeExpr::call_runtime(RuntimeFn::Float64ToString, vec![value]),
            t if t.is_signed() => {
                NativeExpr::call_runtime(RuntimeFn::Int64ToString, vec![self.to_64(value)])
            }
            _ => NativeExpr::call_runtime(RuntimeFn::UInt64ToString, vec![self.to_64(value)]),
        };
        let wrapper = cx.str_wrapper();
        cx.push_move(&wrapper, call)
    }

    fn convert_repr(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        self.convert_str_cast(cx, instance)
    }

    fn convert_hash(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        let func = match self.t {
            NumericType::Int64 => RuntimeFn::HashInt64,
            NumericType::UInt64 => RuntimeFn::HashUInt64,
            NumericType::Float32 => RuntimeFn::HashFloat32,
            NumericType::Float64 => RuntimeFn::HashFloat64,
            _ => return convert_numeric(cx, instance, NumericType::Int32),
        };
        let value = cx.load(&instance)?;
        let wrapper = cx.numeric(NumericType::Int32);
        cx.push_pod(&wrapper, NativeExpr::call_runtime(func, vec![value]))
    }

    fn convert_abs(&self, cx: &mut ExprContext<'_>, instance: TypedExpr) -> CodegenResult<TypedExpr> {
        if self.t.is_bool() {
            let widened = convert_numeric(cx, instance, NumericType::Int64)?;
            return cx.abs(widened);
        }
        if !self.t.is_signed() {
            return Ok(instance);
        }
        let value = Self::operand(cx, instance)?;
        let absolute = NativeExpr::Branch {
            cond: Box::new(value.clone().binary(NativeBinOp::Gt, self.zero())),
            then: Box::new(value.clone()),
            otherwise: Box::new(value.unary(NativeUnOp::Neg)),
        };
        self.result(cx, absolute)
    }

    fn convert_builtin(
        &self,
        cx: &mut ExprContext<'_>,
        name: &str,
        instance: TypedExpr,
        mut args: Vec<TypedExpr>,
    ) -> CodegenResult<TypedExpr> {
        match (name, args.len()) {
            ("round", 1) if self.t.is_bool() => {
                let digits = convert_numeric(cx, args.remove(0), NumericType::Int64)?;
                let digits = cx.load(&digits)?;
                let value = cx.load(&instance)?;
                let keep = digits.binary(NativeBinOp::Ge, NativeExpr::i64(0));
                self.result(cx, value.binary(NativeBinOp::And, keep))
            }
            ("round" | "trunc" | "floor" | "ceil", 0) if !self.t.is_float() => {
                if name == "round" && !self.t.is_bool() {
                    return self.float_builtin(cx, RuntimeFn::RoundFloat64, instance);
                }
                Ok(instance)
            }
            ("round", 0) => self.float_builtin(cx, RuntimeFn::RoundFloat64, instance),
            ("trunc", 0) => self.float_builtin(cx, RuntimeFn::TruncFloat64, instance),
            ("floor", 0) => self.float_builtin(cx, RuntimeFn::FloorFloat64, instance),
            ("ceil", 0) => self.float_builtin(cx, RuntimeFn::CeilFloat64, instance),
            ("dir" | "format", _) => {
                let boxed = cx.box_to_dynamic(instance)?;
                cx.builtin(name, boxed, args)
            }
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
        match op {
            UnaryOperator::Not => {
                let truth = cx.bool_cast(operand)?;
                cx.logical_not(&truth)
            }
            UnaryOperator::Neg | UnaryOperator::Pos | UnaryOperator::Invert if self.t.is_bool() => {
                let widened = convert_numeric(cx, operand, NumericType::Int64)?;
                cx.unary_op(widened, op)
            }
            UnaryOperator::Pos => Ok(operand),
            UnaryOperator::Neg => {
                let value = cx.load(&operand)?;
                self.result(cx, value.unary(NativeUnOp::Neg))
            }
            UnaryOperator::Invert if !self.t.is_float() => {
                let value = cx.load(&operand)?;
                self.result(cx, value.unary(NativeUnOp::Not))
            }
            UnaryOperator::Invert => Err(type_error(format!(
                "bad operand type for unary {op}: '{}'",
                self.repr
            ))),
        }
    }

    fn convert_bin_op(
        &self,
        cx: &mut ExprContext<'_>,
        lhs: TypedExpr,
        op: BinaryOperator,
        rhs: TypedExpr,
    ) -> CodegenResult<TypedExpr> {
        let Some(other) = rhs.wrapper.repr().numeric() else {
            let reverse = rhs.wrapper.clone();
            return reverse.convert_bin_op_reverse(cx, rhs, op, lhs);
        };

        if op == BinaryOperator::Div {
            let target = promote(promote(self.t, other), NumericType::Float32);
            if target != self.t || target != other {
                let lhs = convert_numeric(cx, lhs, target)?;
                let rhs = convert_numeric(cx, rhs, target)?;
                return cx.bin_op(lhs, op, rhs);
            }
        }

        if other != self.t {
            let target = if op == BinaryOperator::Pow {
                if self.t.is_float() || other.is_float() {
                    NumericType::Float64
                } else {
                    promote(promote(self.t, other), NumericType::UInt64)
                }
            } else {
                promote(self.t, other)
            };
            tracing::trace!(lhs = %self.t, rhs = %other, %target, %op, "numeric promotion");
            let lhs = convert_numeric(cx, lhs, target)?;
            let rhs = convert_numeric(cx, rhs, target)?;
            return cx.bin_op(lhs, op, rhs);
        }

        let lowered = if self.t.is_bool() {
            self.lower_bool(cx, lhs.clone(), op, rhs.clone())?
        } else {
            let a = Self::operand(cx, lhs.clone())?;
            let b = Self::operand(cx, rhs.clone())?;
            if self.t.is_float() {
                if op.is_bitwise() || matches!(op, BinaryOperator::LShift | BinaryOperator::RShift) {
                    None
                } else {
                    self.lower_float(cx, op, a, b)?
                }
            } else {
                self.lower_integer(cx, op, a, b)?
            }
        };
        match lowered {
            Some(result) => Ok(result),
            None => {
                let reverse = rhs.wrapper.clone();
                reverse.convert_bin_op_reverse(cx, rhs, op, lhs)
            }
        }
    }

    // ── Conversion ──────────────────────────────────────────────────

    fn can_convert_from(&self, source: &Wrapper, explicit: bool) -> Convertibility {
        match source.repr() {
            TypeRepr::Numeric(from) if explicit || is_implicit_widening(*from, self.t) => {
                Convertibility::Always
            }
            TypeRepr::Dynamic => Convertibility::Maybe,
            _ => Convertibility::Never,
        }
    }

    fn convert_to_self_with_target(
        &self,
        cx: &mut ExprContext<'_>,
        target: &TypedExpr,
        source: TypedExpr,
        explicit: bool,
    ) -> CodegenResult<NativeExpr> {
        let layout = self.t.native();
        match source.wrapper.repr().clone() {
            TypeRepr::Numeric(from) if explicit || is_implicit_widening(from, self.t) => {
                let value = cx.load(&source)?;
                let converted = if from == self.t {
                    value
                } else if self.t.is_bool() {
                    value.binary(NativeBinOp::Ne, NativeExpr::Constant(Constant::zero(&from.native())))
                } else {
                    value.cast(layout.clone())
                };
                cx.push_effect(target.expr.clone().store(converted, layout));
                Ok(NativeExpr::bool(true))
            }
            TypeRepr::Dynamic => {
                let (func, domain) = if self.t.is_bool() {
                    (RuntimeFn::DynToBool, NativeType::BOOL)
                } else if self.t.is_float() {
                    (RuntimeFn::DynToFloat64, NativeType::F64)
                } else {
                    (RuntimeFn::DynToInt64, NativeType::I64)
                };
                let object = cx.load(&source)?;
                let unboxed = cx.allocate_slot(domain.clone());
                let bool_wrapper = cx.bool_wrapper();
                let flag = cx.push_pod(
                    &bool_wrapper,
                    NativeExpr::call_runtime(func, vec![object, NativeExpr::Slot(unboxed)]),
                )?;
                let value = NativeExpr::Slot(unboxed).load(domain.clone());
                let converted = if domain == layout {
                    value
                } else {
                    value.cast(layout.clone())
                };
                cx.push_effect(target.expr.clone().store(converted, layout));
                Ok(flag.expr)
            }
            _ => Ok(NativeExpr::bool(false)),
        }
    }

    // ── Boxing ──────────────────────────────────────────────────────

    fn is_boxable(&self) -> bool {
        true
    }

    fn convert_box(&self, cx: &mut ExprContext<'_>, value: TypedExpr) -> CodegenResult<NativeExpr> {
        let value = cx.load(&value)?;
        Ok(match self.t {
            NumericType::Bool => NativeExpr::call_runtime(RuntimeFn::DynFromBool, vec![value]),
            t if t.is_float() => {
                NativeExpr::call_runtime(RuntimeFn::DynFromFloat64, vec![self.to_f64(value)])
            }
            t if t.is_signed() => {
                NativeExpr::call_runtime(RuntimeFn::DynFromInt64, vec![self.to_64(value)])
            }
            _ => NativeExpr::call_runtime(RuntimeFn::DynFromUInt64, vec![self.to_64(value)]),
        })
    }
}
