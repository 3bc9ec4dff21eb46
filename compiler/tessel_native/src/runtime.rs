//! Runtime support routines callable from generated code.
//!
//! Generated code never formats numbers, hashes floats or talks to the
//! dynamic object model itself. It calls one of the [`RuntimeFn`]s below;
//! the backend links them against the runtime library.
//!
//! Strings produced by the runtime are refcounted heap records laid out as
//! [`STRING_HEADER`] followed by the UTF-8 bytes. Dynamic objects are
//! opaque pointers whose reference counts are only touched through
//! [`RuntimeFn::DynIncref`] and [`RuntimeFn::DynDecref`].

use std::fmt;

use crate::types::NativeType;

/// Category of a runtime error raised by generated code.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorCategory {
    TypeError,
    AttributeError,
    IndexError,
    KeyError,
    ValueError,
    ZeroDivisionError,
    RuntimeError,
}

impl ErrorCategory {
    pub fn name(self) -> &'static str {
        match self {
            ErrorCategory::TypeError => "TypeError",
            ErrorCategory::AttributeError => "AttributeError",
            ErrorCategory::IndexError => "IndexError",
            ErrorCategory::KeyError => "KeyError",
            ErrorCategory::ValueError => "ValueError",
            ErrorCategory::ZeroDivisionError => "ZeroDivisionError",
            ErrorCategory::RuntimeError => "RuntimeError",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Field layout of a runtime string record: refcount, hash cache, byte length.
/// The bytes follow immediately after.
pub const STRING_HEADER: [NativeType; 3] = [NativeType::I64, NativeType::I32, NativeType::I64];

/// Byte offset of the string payload.
pub const STRING_DATA_OFFSET: u32 = 24;

/// A routine provided by the runtime library.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum RuntimeFn {
    // ── Memory ──────────────────────────────────────────────────────
    Malloc,
    Realloc,
    Free,
    MemMove,

    // ── Number formatting ───────────────────────────────────────────
    Int64ToString,
    UInt64ToString,
    Float32ToString,
    Float64ToString,
    BoolToString,

    // ── Math ────────────────────────────────────────────────────────
    ModFloat64,
    FloorDivFloat64,
    PowInt64,
    PowUInt64,
    PowFloat64,
    LShiftInt64,
    RShiftInt64,
    LShiftUInt64,
    RShiftUInt64,
    RoundFloat64,
    TruncFloat64,
    FloorFloat64,
    CeilFloat64,
    HashInt64,
    HashUInt64,
    HashFloat32,
    HashFloat64,

    // ── Strings ─────────────────────────────────────────────────────
    StrConcat,
    StrEq,
    StrHash,

    // ── Dynamic objects ─────────────────────────────────────────────
    DynIncref,
    DynDecref,
    DynNone,
    DynFromInt64,
    DynFromUInt64,
    DynFromFloat64,
    DynFromBool,
    DynFromStr,
    DynToInt64,
    DynToFloat64,
    DynToBool,
    DynToStr,
    DynTupleNew,
    DynTupleSet,
    DynNewInstance,
    DynGetAttr,
    DynSetAttr,
    DynGetItem,
    DynSetItem,
    DynDelItem,
    DynCall,
    DynLen,
    DynHash,
    DynTruthy,
    DynStr,
    DynRepr,
    DynDir,
    DynBinOp,
    DynUnOp,
    DynNext,
    DynEnter,
    DynExit,
}

impl RuntimeFn {
    /// Link name of the routine.
    pub fn name(self) -> &'static str {
        match self {
            RuntimeFn::Malloc => "tessel_malloc",
            RuntimeFn::Realloc => "tessel_realloc",
            RuntimeFn::Free => "tessel_free",
            RuntimeFn::MemMove => "tessel_memmove",
            RuntimeFn::Int64ToString => "tessel_int64_to_string",
            RuntimeFn::UInt64ToString => "tessel_uint64_to_string",
            RuntimeFn::Float32ToString => "tessel_float32_to_string",
            RuntimeFn::Float64ToString => "tessel_float64_to_string",
            RuntimeFn::BoolToString => "tessel_bool_to_string",
            RuntimeFn::ModFloat64 => "tessel_mod_float64",
            RuntimeFn::FloorDivFloat64 => "tessel_floordiv_float64",
            RuntimeFn::PowInt64 => "tessel_pow_int64",
            RuntimeFn::PowUInt64 => "tessel_pow_uint64",
            RuntimeFn::PowFloat64 => "tessel_pow_float64",
            RuntimeFn::LShiftInt64 => "tessel_lshift_int64",
            RuntimeFn::RShiftInt64 => "tessel_rshift_int64",
            RuntimeFn::LShiftUInt64 => "tessel_lshift_uint64",
            RuntimeFn::RShiftUInt64 => "tessel_rshift_uint64",
            RuntimeFn::RoundFloat64 => "tessel_round_float64",
            RuntimeFn::TruncFloat64 => "tessel_trunc_float64",
            RuntimeFn::FloorFloat64 => "tessel_floor_float64",
            RuntimeFn::CeilFloat64 => "tessel_ceil_float64",
            RuntimeFn::HashInt64 => "tessel_hash_int64",
            RuntimeFn::HashUInt64 => "tessel_hash_uint64",
            RuntimeFn::HashFloat32 => "tessel_hash_float32",
            RuntimeFn::HashFloat64 => "tessel_hash_float64",
            RuntimeFn::StrConcat => "tessel_str_concat",
            RuntimeFn::StrEq => "tessel_str_eq",
            RuntimeFn::StrHash => "tessel_str_hash",
            RuntimeFn::DynIncref => "tessel_dyn_incref",
            RuntimeFn::DynDecref => "tessel_dyn_decref",
            RuntimeFn::DynNone => "tessel_dyn_none",
            RuntimeFn::DynFromInt64 => "tessel_dyn_from_int64",
            RuntimeFn::DynFromUInt64 => "tessel_dyn_from_uint64",
            RuntimeFn::DynFromFloat64 => "tessel_dyn_from_float64",
            RuntimeFn::DynFromBool => "tessel_dyn_from_bool",
            RuntimeFn::DynFromStr => "tessel_dyn_from_str",
            RuntimeFn::DynToInt64 => "tessel_dyn_to_int64",
            RuntimeFn::DynToFloat64 => "tessel_dyn_to_float64",
            RuntimeFn::DynToBool => "tessel_dyn_to_bool",
            RuntimeFn::DynToStr => "tessel_dyn_to_str",
            RuntimeFn::DynTupleNew => "tessel_dyn_tuple_new",
            RuntimeFn::DynTupleSet => "tessel_dyn_tuple_set",
            RuntimeFn::DynNewInstance => "tessel_dyn_new_instance",
            RuntimeFn::DynGetAttr => "tessel_dyn_getattr",
            RuntimeFn::DynSetAttr => "tessel_dyn_setattr",
            RuntimeFn::DynGetItem => "tessel_dyn_getitem",
            RuntimeFn::DynSetItem => "tessel_dyn_setitem",
            RuntimeFn::DynDelItem => "tessel_dyn_delitem",
            RuntimeFn::DynCall => "tessel_dyn_call",
            RuntimeFn::DynLen => "tessel_dyn_len",
            RuntimeFn::DynHash => "tessel_dyn_hash",
            RuntimeFn::DynTruthy => "tessel_dyn_truthy",
            RuntimeFn::DynStr => "tessel_dyn_str",
            RuntimeFn::DynRepr => "tessel_dyn_repr",
            RuntimeFn::DynDir => "tessel_dyn_dir",
            RuntimeFn::DynBinOp => "tessel_dyn_binop",
            RuntimeFn::DynUnOp => "tessel_dyn_unop",
            RuntimeFn::DynNext => "tessel_dyn_next",
            RuntimeFn::DynEnter => "tessel_dyn_enter",
            RuntimeFn::DynExit => "tessel_dyn_exit",
        }
    }

    /// Parameter types.
    ///
    /// Conversions out of a dynamic object (`DynTo*`, `DynNext`) write
    /// through an out-pointer and return a success flag.
    pub fn params(self) -> Vec<NativeType> {
        use NativeType as T;
        match self {
            RuntimeFn::Malloc | RuntimeFn::DynTupleNew => vec![T::I64],
            RuntimeFn::Realloc => vec![T::Pointer, T::I64],
            RuntimeFn::MemMove => vec![T::Pointer, T::Pointer, T::I64],
            RuntimeFn::Int64ToString
            | RuntimeFn::HashInt64
            | RuntimeFn::DynFromInt64 => vec![T::I64],
            RuntimeFn::UInt64ToString | RuntimeFn::HashUInt64 | RuntimeFn::DynFromUInt64 => {
                vec![T::U64]
            }
            RuntimeFn::Float32ToString | RuntimeFn::HashFloat32 => vec![T::F32],
            RuntimeFn::Float64ToString
            | RuntimeFn::RoundFloat64
            | RuntimeFn::TruncFloat64
            | RuntimeFn::FloorFloat64
            | RuntimeFn::CeilFloat64
            | RuntimeFn::HashFloat64
            | RuntimeFn::DynFromFloat64 => vec![T::F64],
            RuntimeFn::BoolToString | RuntimeFn::DynFromBool => vec![T::BOOL],
            RuntimeFn::ModFloat64 | RuntimeFn::FloorDivFloat64 | RuntimeFn::PowFloat64 => {
                vec![T::F64, T::F64]
            }
            RuntimeFn::PowInt64 | RuntimeFn::LShiftInt64 | RuntimeFn::RShiftInt64 => {
                vec![T::I64, T::I64]
            }
            RuntimeFn::PowUInt64 | RuntimeFn::LShiftUInt64 | RuntimeFn::RShiftUInt64 => {
                vec![T::U64, T::U64]
            }
            RuntimeFn::Free
            | RuntimeFn::StrHash
            | RuntimeFn::DynIncref
            | RuntimeFn::DynDecref
            | RuntimeFn::DynFromStr
            | RuntimeFn::DynNewInstance
            | RuntimeFn::DynLen
            | RuntimeFn::DynHash
            | RuntimeFn::DynTruthy
            | RuntimeFn::DynStr
            | RuntimeFn::DynRepr
            | RuntimeFn::DynDir
            | RuntimeFn::DynEnter
            | RuntimeFn::DynExit => vec![T::Pointer],
            RuntimeFn::StrConcat
            | RuntimeFn::StrEq
            | RuntimeFn::DynToInt64
            | RuntimeFn::DynToFloat64
            | RuntimeFn::DynToBool
            | RuntimeFn::DynToStr
            | RuntimeFn::DynGetAttr
            | RuntimeFn::DynGetItem
            | RuntimeFn::DynDelItem
            | RuntimeFn::DynCall
            | RuntimeFn::DynNext => vec![T::Pointer, T::Pointer],
            RuntimeFn::DynSetAttr | RuntimeFn::DynSetItem => {
                vec![T::Pointer, T::Pointer, T::Pointer]
            }
            RuntimeFn::DynTupleSet => vec![T::Pointer, T::I64, T::Pointer],
            RuntimeFn::DynBinOp => vec![T::I64, T::Pointer, T::Pointer],
            RuntimeFn::DynUnOp => vec![T::I64, T::Pointer],
            RuntimeFn::DynNone => vec![],
        }
    }

    /// Return type.
    pub fn ret(self) -> NativeType {
        use NativeType as T;
        match self {
            RuntimeFn::Free
            | RuntimeFn::MemMove
            | RuntimeFn::DynIncref
            | RuntimeFn::DynDecref
            | RuntimeFn::DynTupleSet
            | RuntimeFn::DynSetAttr
            | RuntimeFn::DynSetItem
            | RuntimeFn::DynDelItem
            | RuntimeFn::DynExit => T::Void,
            RuntimeFn::ModFloat64
            | RuntimeFn::FloorDivFloat64
            | RuntimeFn::PowInt64
            | RuntimeFn::PowUInt64
            | RuntimeFn::PowFloat64
            | RuntimeFn::RoundFloat64
            | RuntimeFn::TruncFloat64
            | RuntimeFn::FloorFloat64
            | RuntimeFn::CeilFloat64 => T::F64,
            RuntimeFn::LShiftInt64 | RuntimeFn::RShiftInt64 | RuntimeFn::DynLen => T::I64,
            RuntimeFn::LShiftUInt64 | RuntimeFn::RShiftUInt64 => T::U64,
            RuntimeFn::HashInt64
            | RuntimeFn::HashUInt64
            | RuntimeFn::HashFloat32
            | RuntimeFn::HashFloat64
            | RuntimeFn::StrHash
            | RuntimeFn::DynHash => T::I32,
            RuntimeFn::StrEq
            | RuntimeFn::DynToInt64
            | RuntimeFn::DynToFloat64
            | RuntimeFn::DynToBool
            | RuntimeFn::DynToStr
            | RuntimeFn::DynTruthy
            | RuntimeFn::DynNext => T::BOOL,
            RuntimeFn::Malloc
            | RuntimeFn::Realloc
            | RuntimeFn::Int64ToString
            | RuntimeFn::UInt64ToString
            | RuntimeFn::Float32ToString
            | RuntimeFn::Float64ToString
            | RuntimeFn::BoolToString
            | RuntimeFn::StrConcat
            | RuntimeFn::DynNone
            | RuntimeFn::DynFromInt64
            | RuntimeFn::DynFromUInt64
            | RuntimeFn::DynFromFloat64
            | RuntimeFn::DynFromBool
            | RuntimeFn::DynFromStr
            | RuntimeFn::DynTupleNew
            | RuntimeFn::DynNewInstance
            | RuntimeFn::DynGetAttr
            | RuntimeFn::DynGetItem
            | RuntimeFn::DynCall
            | RuntimeFn::DynStr
            | RuntimeFn::DynRepr
            | RuntimeFn::DynDir
            | RuntimeFn::DynBinOp
            | RuntimeFn::DynUnOp
            | RuntimeFn::DynEnter => T::Pointer,
        }
    }
}

impl fmt::Display for RuntimeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
