//! Values held inline or behind a single owned pointer.
//!
//! - `tuple` - construction, constant and runtime indexing, equality
//! - `string` - concatenation, comparison, `str()` of other values

mod string;
mod tuple;
