//! Type-directed code generation for tessel.
//!
//! Every source-level type is described by a *wrapper* ([`TypeWrapper`]):
//! its native layout, its lifecycle and how each operation on it lowers to
//! native instructions. Callers never emit code for a type directly; they
//! ask an [`ExprContext`] to perform an operation, and the context
//! dispatches to the operand's wrapper, which emits instructions through
//! the same context.
//!
//! # Architecture
//!
//! - [`Converter`]: one compilation run. Owns the [`WrapperFactory`], the
//!   registry of generated functions and the [`CodegenOptions`].
//! - [`WrapperFactory`]: memoized `TypeRepr -> Wrapper` construction,
//!   including forward-declared composites.
//! - [`ExprContext`]: emission surface for one function body; tracks
//!   temporaries and destroys them when their frame closes.
//! - `wrappers`: the concrete kinds (numerics, strings, tuples, lists,
//!   shared and cell handles, composites, the dynamic fallback).
//!
//! # Crate Dependencies
//!
//! Generates into `tessel_native`. Tests execute the generated module with
//! `tessel_exec`.

mod context;
mod conversion;
mod converter;
mod error;
mod factory;
mod options;
mod repr;
mod typed_expr;
mod wrapper;
mod wrappers;

pub use context::{ExprContext, UninitializedSlot};
pub use converter::{Converter, FunctionKey, FunctionRegistry, FunctionSignature};
pub use error::{attribute_error, internal, type_error, CodegenError, CodegenResult, ConversionKind};
pub use factory::{ExtensionBuilder, WrapperFactory};
pub use options::{CodegenOptions, GrowthPolicy};
pub use repr::{CompositeId, NumericType, TypeRepr};
pub use typed_expr::TypedExpr;
pub use wrapper::{default_bin_op_reverse, Convertibility, NextValue, ReprFlags, TypeWrapper, Wrapper};
pub use wrappers::{
    is_implicit_widening, list_header_layout, promote, ArithmeticWrapper, BoundMethodWrapper,
    CellWrapper, CompositeDef, CompositeWrapper, DynamicWrapper, Field, FieldDeclaration,
    FieldListBuilder, Lifecycle, ListOfWrapper, MasqueradeWrapper, MemberBody, MemberFunction,
    NoneWrapper, ResolvedFields, SharedWrapper, StringWrapper, TupleWrapper,
};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call multiple times. Enable with `RUST_LOG=tessel_codegen=debug`
/// (conversions, declared composites, generated functions) or `=trace`
/// (every convertibility verdict).
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .try_init();
        }
    });
}
