//! Scalar values flowing through the evaluator.
//!
//! Every value carries its native type, because native instructions take
//! their signedness and width from their operands. Integers hold their
//! mathematical value already wrapped to their width.

use std::fmt;

use tessel_native::{Constant, NativeType};

/// Machine address: allocation id in the high half, byte offset in the low
/// half. Zero is the null pointer.
pub type Address = u64;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    Void,
    Int { value: i128, bits: u8, signed: bool },
    Float { value: f64, bits: u8 },
    Ptr(Address),
}

impl Value {
    pub fn i64(value: i64) -> Self {
        Value::Int {
            value: i128::from(value),
            bits: 64,
            signed: true,
        }
    }

    pub fn i32(value: i32) -> Self {
        Value::Int {
            value: i128::from(value),
            bits: 32,
            signed: true,
        }
    }

    pub fn u64(value: u64) -> Self {
        Value::Int {
            value: i128::from(value),
            bits: 64,
            signed: false,
        }
    }

    pub fn bool(value: bool) -> Self {
        Value::Int {
            value: i128::from(value),
            bits: 1,
            signed: false,
        }
    }

    pub fn f64(value: f64) -> Self {
        Value::Float { value, bits: 64 }
    }

    pub fn null() -> Self {
        Value::Ptr(0)
    }

    /// An integer of type `ty`, wrapped to its width.
    pub fn int(value: i128, ty: &NativeType) -> Self {
        match ty {
            NativeType::Int { bits, signed } => Value::Int {
                value: wrap(value, *bits, *signed),
                bits: *bits,
                signed: *signed,
            },
            NativeType::Float { bits } => Value::Float {
                value: round_float(value as f64, *bits),
                bits: *bits,
            },
            NativeType::Pointer => Value::Ptr(value as u64),
            _ => Value::Void,
        }
    }

    pub fn from_constant(constant: &Constant) -> Self {
        match constant {
            Constant::Int {
                value,
                bits,
                signed,
            } => Value::Int {
                value: wrap(*value, *bits, *signed),
                bits: *bits,
                signed: *signed,
            },
            Constant::Float { value, bits } => Value::Float {
                value: round_float(*value, *bits),
                bits: *bits,
            },
            Constant::NullPointer => Value::Ptr(0),
            Constant::Void => Value::Void,
        }
    }

    /// The zero value of a scalar type.
    pub fn zero(ty: &NativeType) -> Self {
        Value::from_constant(&Constant::zero(ty))
    }

    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Int { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_i128().and_then(|v| i64::try_from(v).ok())
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_i128().map(|v| v != 0)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_ptr(&self) -> Option<Address> {
        match self {
            Value::Ptr(addr) => Some(*addr),
            _ => None,
        }
    }

    /// This value reinterpreted as type `ty` by a numeric conversion.
    ///
    /// Integer narrowing wraps, float to integer truncates toward zero and
    /// saturates, anything to `bool` tests against zero.
    #[must_use]
    pub fn convert(self, ty: &NativeType) -> Self {
        match (self, ty) {
            (_, NativeType::Void) | (Value::Void, _) => Value::Void,
            (Value::Int { value, .. }, NativeType::Int { bits: 1, .. }) => Value::bool(value != 0),
            (Value::Float { value, .. }, NativeType::Int { bits: 1, .. }) => Value::bool(value != 0.0),
            (Value::Int { value, .. }, _) => Value::int(value, ty),
            (Value::Float { value, .. }, NativeType::Int { .. }) => {
                Value::int(saturate(value.trunc(), ty), ty)
            }
            (Value::Float { value, .. }, NativeType::Float { bits }) => Value::Float {
                value: round_float(value, *bits),
                bits: *bits,
            },
            (Value::Float { value, .. }, NativeType::Pointer) => Value::Ptr(value as u64),
            (Value::Ptr(addr), _) => Value::int(i128::from(addr), ty),
            (value, _) => value,
        }
    }

    pub fn ty(&self) -> NativeType {
        match self {
            Value::Void => NativeType::Void,
            Value::Int { bits, signed, .. } => NativeType::Int {
                bits: *bits,
                signed: *signed,
            },
            Value::Float { bits, .. } => NativeType::Float { bits: *bits },
            Value::Ptr(_) => NativeType::Pointer,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Int { value, bits: 1, .. } => write!(f, "{}", *value != 0),
            Value::Int { value, .. } => write!(f, "{value}"),
            Value::Float { value, .. } => write!(f, "{value}"),
            Value::Ptr(addr) => write!(f, "{addr:#x}"),
        }
    }
}

/// Wrap `value` to a two's complement integer of `bits` width.
pub fn wrap(value: i128, bits: u8, signed: bool) -> i128 {
    if bits == 1 {
        return value & 1;
    }
    if bits >= 128 {
        return value;
    }
    let modulus = 1i128 << bits;
    let unsigned = value.rem_euclid(modulus);
    if signed && unsigned >= modulus / 2 {
        unsigned - modulus
    } else {
        unsigned
    }
}

fn saturate(value: f64, ty: &NativeType) -> i128 {
    let NativeType::Int { bits, signed } = ty else {
        return 0;
    };
    if value.is_nan() {
        return 0;
    }
    let (min, max) = if *signed {
        (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
    } else {
        (0, (1i128 << bits) - 1)
    };
    if value <= min as f64 {
        min
    } else if value >= max as f64 {
        max
    } else {
        value as i128
    }
}

pub(crate) fn round_float(value: f64, bits: u8) -> f64 {
    if bits == 32 {
        f64::from(value as f32)
    } else {
        value
    }
}

#[cfg(test)]
mod tests;
