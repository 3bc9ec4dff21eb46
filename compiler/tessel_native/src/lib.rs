//! Typed native instruction tree for the tessel code generator.
//!
//! The code generator never emits machine code. It produces a
//! [`NativeModule`] of [`NativeFunction`]s whose bodies are trees of
//! [`NativeExpr`] over explicit memory ([`NativeType`] layouts, stack slots,
//! heap pointers) plus calls into the runtime library ([`RuntimeFn`]).
//! A backend lowers this tree to machine code; `tessel_exec` evaluates it
//! directly.
//!
//! # Crate Dependencies
//!
//! Leaf crate. Serialization of modules is available behind the `cache`
//! feature.

mod expr;
mod function;
mod ops;
mod runtime;
mod types;

pub use expr::{
    CallTarget, Constant, FunctionId, NativeBinOp, NativeExpr, NativeUnOp, SlotId,
};
pub use function::{NativeFunction, NativeModule, VerifyError};
pub use ops::{BinaryOperator, UnaryOperator};
pub use runtime::{ErrorCategory, RuntimeFn, STRING_DATA_OFFSET, STRING_HEADER};
pub use types::{round_up, NativeType};
