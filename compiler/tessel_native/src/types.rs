//! Native storage types and their memory layout.
//!
//! Every wrapper in the code generator describes its storage as a
//! [`NativeType`]. Layout follows natural alignment: each scalar is aligned
//! to its own size, structs are aligned to their widest member and padded
//! at the tail so arrays of them stay aligned.

use std::fmt;

/// A native storage type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum NativeType {
    /// Zero-sized. Loads produce no value, stores are no-ops.
    Void,
    /// Integer of `bits` width. A 1-bit integer is a boolean stored in one byte.
    Int { bits: u8, signed: bool },
    /// IEEE float of 32 or 64 bits.
    Float { bits: u8 },
    /// Untyped machine pointer.
    Pointer,
    /// Fields laid out in declaration order.
    Struct(Vec<NativeType>),
    /// Fixed-length inline array.
    Array { element: Box<NativeType>, count: u32 },
}

impl NativeType {
    pub const BOOL: Self = Self::Int {
        bits: 1,
        signed: false,
    };
    pub const I8: Self = Self::Int {
        bits: 8,
        signed: true,
    };
    pub const I16: Self = Self::Int {
        bits: 16,
        signed: true,
    };
    pub const I32: Self = Self::Int {
        bits: 32,
        signed: true,
    };
    pub const I64: Self = Self::Int {
        bits: 64,
        signed: true,
    };
    pub const U8: Self = Self::Int {
        bits: 8,
        signed: false,
    };
    pub const U16: Self = Self::Int {
        bits: 16,
        signed: false,
    };
    pub const U32: Self = Self::Int {
        bits: 32,
        signed: false,
    };
    pub const U64: Self = Self::Int {
        bits: 64,
        signed: false,
    };
    pub const F32: Self = Self::Float { bits: 32 };
    pub const F64: Self = Self::Float { bits: 64 };

    /// Size in bytes, including tail padding.
    pub fn size(&self) -> u32 {
        match self {
            NativeType::Void => 0,
            NativeType::Int { bits, .. } => scalar_bytes(*bits),
            NativeType::Float { bits } => u32::from(*bits) / 8,
            NativeType::Pointer => 8,
            NativeType::Struct(fields) => {
                let mut offset = 0;
                for field in fields {
                    offset = round_up(offset, field.align()) + field.size();
                }
                round_up(offset, self.align())
            }
            NativeType::Array { element, count } => element.size() * count,
        }
    }

    /// Alignment in bytes. Never zero.
    pub fn align(&self) -> u32 {
        match self {
            NativeType::Void => 1,
            NativeType::Int { bits, .. } => scalar_bytes(*bits),
            NativeType::Float { bits } => u32::from(*bits) / 8,
            NativeType::Pointer => 8,
            NativeType::Struct(fields) => fields.iter().map(NativeType::align).max().unwrap_or(1),
            NativeType::Array { element, .. } => element.align(),
        }
    }

    /// Byte offsets of every struct field. Empty for non-struct types.
    pub fn field_offsets(&self) -> Vec<u32> {
        let NativeType::Struct(fields) = self else {
            return Vec::new();
        };
        let mut offsets = Vec::with_capacity(fields.len());
        let mut offset = 0;
        for field in fields {
            offset = round_up(offset, field.align());
            offsets.push(offset);
            offset += field.size();
        }
        offsets
    }

    /// Byte offset of struct field `index`.
    pub fn field_offset(&self, index: usize) -> Option<u32> {
        self.field_offsets().get(index).copied()
    }

    /// Type of struct field `index`.
    pub fn field(&self, index: usize) -> Option<&NativeType> {
        match self {
            NativeType::Struct(fields) => fields.get(index),
            _ => None,
        }
    }

    /// Whether values of this type fit in a single load/store.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            NativeType::Int { .. } | NativeType::Float { .. } | NativeType::Pointer
        )
    }

    pub fn is_void(&self) -> bool {
        matches!(self, NativeType::Void)
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeType::Void => write!(f, "void"),
            NativeType::Int { bits: 1, .. } => write!(f, "bool"),
            NativeType::Int { bits, signed: true } => write!(f, "i{bits}"),
            NativeType::Int {
                bits,
                signed: false,
            } => write!(f, "u{bits}"),
            NativeType::Float { bits } => write!(f, "f{bits}"),
            NativeType::Pointer => write!(f, "ptr"),
            NativeType::Struct(fields) => {
                write!(f, "{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, "}}")
            }
            NativeType::Array { element, count } => write!(f, "[{element}; {count}]"),
        }
    }
}

fn scalar_bytes(bits: u8) -> u32 {
    u32::from(bits).div_ceil(8).max(1)
}

/// Round `value` up to the next multiple of `align`.
pub fn round_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}
