//! Refcounted handles.
//!
//! - `shared` - `Shared(T)`: aliasing, payload release, method dispatch
//! - `cell` - `Cell(T)`: the empty state, set/clear, aliasing

mod cell;
mod shared;
