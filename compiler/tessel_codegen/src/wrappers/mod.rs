//! Concrete wrapper kinds.
//!
//! Scalars and strings live in `arithmetic`, `none` and `string`; `tuple`
//! and `composite` are held by value; `list_of`, `shared` and `cell` are
//! refcounted handles sharing the plumbing in `refcount`; `dynamic` and
//! `masquerade` bridge to the dynamic runtime.

mod arithmetic;
mod bound_method;
mod cell;
mod composite;
mod dynamic;
mod indexing;
mod list_of;
mod masquerade;
mod none;
mod refcount;
mod shared;
mod string;
mod tuple;

pub use arithmetic::{is_implicit_widening, promote, ArithmeticWrapper};
pub use bound_method::BoundMethodWrapper;
pub use cell::CellWrapper;
pub use composite::{
    CompositeDef, CompositeWrapper, Field, FieldDeclaration, FieldListBuilder, Lifecycle,
    MemberBody, MemberFunction, ResolvedFields,
};
pub use dynamic::DynamicWrapper;
pub use list_of::{header_layout as list_header_layout, ListOfWrapper};
pub use masquerade::MasqueradeWrapper;
pub use none::NoneWrapper;
pub use shared::SharedWrapper;
pub use string::StringWrapper;
pub use tuple::TupleWrapper;
