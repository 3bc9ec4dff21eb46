//! Typed native expressions.
//!
//! Generated code is a tree of [`NativeExpr`] nodes. Evaluation order is
//! left to right and depth first; a [`NativeExpr::Sequence`] evaluates its
//! items in order and yields the value of the last one. Memory is only
//! reached through explicit [`NativeExpr::Load`] / [`NativeExpr::Store`] on
//! pointer-valued expressions, and every stack slot of a function is
//! addressed by a [`SlotId`].
//!
//! Binary and unary instructions take their signedness from the operand
//! type: integer division on a signed operand truncates toward zero,
//! comparison of unsigned operands is unsigned, and so on.

use crate::runtime::{ErrorCategory, RuntimeFn};
use crate::types::NativeType;

// ── ID newtypes ─────────────────────────────────────────────────────

/// Stack slot within a native function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct SlotId(u32);

impl SlotId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Native function within a [`NativeModule`](crate::NativeModule).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct FunctionId(u32);

impl FunctionId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ── Constants ───────────────────────────────────────────────────────

/// Compile-time constant.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Constant {
    /// Integer of the given width. `value` holds the mathematical value,
    /// so both `u64::MAX` and `i64::MIN` are representable.
    Int { value: i128, bits: u8, signed: bool },
    Float { value: f64, bits: u8 },
    NullPointer,
    Void,
}

impl Constant {
    pub fn bool(value: bool) -> Self {
        Constant::Int {
            value: i128::from(value),
            bits: 1,
            signed: false,
        }
    }

    pub fn i64(value: i64) -> Self {
        Constant::Int {
            value: i128::from(value),
            bits: 64,
            signed: true,
        }
    }

    pub fn i32(value: i32) -> Self {
        Constant::Int {
            value: i128::from(value),
            bits: 32,
            signed: true,
        }
    }

    /// Integer constant of an arbitrary integer type.
    pub fn int(value: i128, ty: &NativeType) -> Self {
        match ty {
            NativeType::Int { bits, signed } => Constant::Int {
                value,
                bits: *bits,
                signed: *signed,
            },
            NativeType::Float { bits } => Constant::Float {
                value: value as f64,
                bits: *bits,
            },
            _ => Constant::Void,
        }
    }

    /// The zero value of a scalar type.
    pub fn zero(ty: &NativeType) -> Self {
        match ty {
            NativeType::Pointer => Constant::NullPointer,
            NativeType::Float { bits } => Constant::Float {
                value: 0.0,
                bits: *bits,
            },
            _ => Constant::int(0, ty),
        }
    }

    pub fn ty(&self) -> NativeType {
        match self {
            Constant::Int { bits, signed, .. } => NativeType::Int {
                bits: *bits,
                signed: *signed,
            },
            Constant::Float { bits, .. } => NativeType::Float { bits: *bits },
            Constant::NullPointer => NativeType::Pointer,
            Constant::Void => NativeType::Void,
        }
    }

    /// The boolean value of a constant `bool`, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Constant::Int { value, bits: 1, .. } => Some(*value != 0),
            _ => None,
        }
    }
}

// ── Operators ───────────────────────────────────────────────────────

/// Native binary instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum NativeBinOp {
    Add,
    Sub,
    Mul,
    /// Truncating integer division or float division.
    Div,
    /// Truncating integer remainder or `fmod`.
    Rem,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl NativeBinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            NativeBinOp::Eq
                | NativeBinOp::Ne
                | NativeBinOp::Lt
                | NativeBinOp::Le
                | NativeBinOp::Gt
                | NativeBinOp::Ge
        )
    }
}

/// Native unary instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum NativeUnOp {
    Neg,
    /// Bitwise complement. On `bool` this is logical negation.
    Not,
}

/// Callee of a [`NativeExpr::Call`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum CallTarget {
    Runtime(RuntimeFn),
    Defined(FunctionId),
}

// ── Expressions ─────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum NativeExpr {
    Constant(Constant),
    /// Address of a stack slot.
    Slot(SlotId),
    /// Value of the function argument at this position.
    Arg(u32),
    Load {
        addr: Box<NativeExpr>,
        ty: NativeType,
    },
    Store {
        addr: Box<NativeExpr>,
        value: Box<NativeExpr>,
        ty: NativeType,
    },
    /// `base + offset` in bytes.
    FieldPtr {
        base: Box<NativeExpr>,
        offset: u32,
    },
    /// `base + index * stride` in bytes.
    ElementPtr {
        base: Box<NativeExpr>,
        index: Box<NativeExpr>,
        stride: u32,
    },
    /// Numeric conversion. Integer narrowing truncates, widening follows the
    /// source signedness, float-to-int truncates toward zero.
    Cast {
        value: Box<NativeExpr>,
        to: NativeType,
    },
    Binary {
        op: NativeBinOp,
        lhs: Box<NativeExpr>,
        rhs: Box<NativeExpr>,
    },
    Unary {
        op: NativeUnOp,
        operand: Box<NativeExpr>,
    },
    /// Conditional. Both arms yield the same type.
    Branch {
        cond: Box<NativeExpr>,
        then: Box<NativeExpr>,
        otherwise: Box<NativeExpr>,
    },
    Sequence(Vec<NativeExpr>),
    /// Evaluate `body` while `cond` holds.
    While {
        cond: Box<NativeExpr>,
        body: Box<NativeExpr>,
    },
    Call {
        target: CallTarget,
        args: Vec<NativeExpr>,
    },
    /// Abort the current call chain with a runtime error.
    Raise {
        category: ErrorCategory,
        message: String,
    },
    /// A freshly allocated runtime string holding one reference.
    StrLiteral(String),
}

impl NativeExpr {
    pub fn constant(value: Constant) -> Self {
        NativeExpr::Constant(value)
    }

    pub fn bool(value: bool) -> Self {
        NativeExpr::Constant(Constant::bool(value))
    }

    pub fn i64(value: i64) -> Self {
        NativeExpr::Constant(Constant::i64(value))
    }

    pub fn void() -> Self {
        NativeExpr::Constant(Constant::Void)
    }

    pub fn load(self, ty: NativeType) -> Self {
        NativeExpr::Load {
            addr: Box::new(self),
            ty,
        }
    }

    pub fn store(self, value: NativeExpr, ty: NativeType) -> Self {
        NativeExpr::Store {
            addr: Box::new(self),
            value: Box::new(value),
            ty,
        }
    }

    pub fn field_ptr(self, offset: u32) -> Self {
        if offset == 0 {
            return self;
        }
        NativeExpr::FieldPtr {
            base: Box::new(self),
            offset,
        }
    }

    pub fn element_ptr(self, index: NativeExpr, stride: u32) -> Self {
        NativeExpr::ElementPtr {
            base: Box::new(self),
            index: Box::new(index),
            stride,
        }
    }

    pub fn cast(self, to: NativeType) -> Self {
        NativeExpr::Cast {
            value: Box::new(self),
            to,
        }
    }

    pub fn binary(self, op: NativeBinOp, rhs: NativeExpr) -> Self {
        NativeExpr::Binary {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }

    pub fn unary(self, op: NativeUnOp) -> Self {
        NativeExpr::Unary {
            op,
            operand: Box::new(self),
        }
    }

    pub fn call_runtime(func: RuntimeFn, args: Vec<NativeExpr>) -> Self {
        NativeExpr::Call {
            target: CallTarget::Runtime(func),
            args,
        }
    }

    pub fn call(func: FunctionId, args: Vec<NativeExpr>) -> Self {
        NativeExpr::Call {
            target: CallTarget::Defined(func),
            args,
        }
    }

    pub fn raise(category: ErrorCategory, message: impl Into<String>) -> Self {
        NativeExpr::Raise {
            category,
            message: message.into(),
        }
    }

    /// The constant this expression folds to, if it is a literal constant.
    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            NativeExpr::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// Whether evaluating this expression twice is indistinguishable from
    /// evaluating it once: no calls, stores, raises or allocations.
    pub fn is_pure(&self) -> bool {
        match self {
            NativeExpr::Constant(_) | NativeExpr::Slot(_) | NativeExpr::Arg(_) => true,
            NativeExpr::Load { addr, .. } => addr.is_pure(),
            NativeExpr::FieldPtr { base, .. } => base.is_pure(),
            NativeExpr::ElementPtr { base, index, .. } => base.is_pure() && index.is_pure(),
            NativeExpr::Cast { value, .. } => value.is_pure(),
            NativeExpr::Binary { op, lhs, rhs } => {
                // Division can trap, keep it in place.
                !matches!(op, NativeBinOp::Div | NativeBinOp::Rem) && lhs.is_pure() && rhs.is_pure()
            }
            NativeExpr::Unary { operand, .. } => operand.is_pure(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests;
