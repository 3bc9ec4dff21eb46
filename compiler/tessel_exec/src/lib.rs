//! Reference evaluator for tessel native modules.
//!
//! Runs a [`tessel_native::NativeModule`] directly, without a backend, so
//! that generated code can be tested end to end. Memory is a checked heap
//! of separately addressed blocks: out-of-bounds accesses, use after free
//! and double frees are reported as [`ExecError::Fault`] instead of
//! corrupting state, and [`HeapStats`] exposes leaks.
//!
//! The dynamic object runtime behind the `Dyn*` routines is a small
//! refcounted object model (see [`Objects`]).
//!
//! # Crate Dependencies
//!
//! Depends only on `tessel_native`.

mod error;
mod format;
mod hash;
mod heap;
mod machine;
mod objects;
mod runtime;
mod value;

pub use error::{ExecError, ExecResult};
pub use format::{format_bool, format_f32, format_f64, quote};
pub use hash::{hash_bytes, hash_f64, hash_i64, hash_u64};
pub use heap::{Heap, HeapStats};
pub use machine::{Machine, DEFAULT_DEPTH_LIMIT};
pub use objects::{BuiltinFn, Object, ObjectId, Objects};
pub use value::{wrap, Address, Value};
