//! Native expressions paired with the wrapper that describes them.

use tessel_native::{Constant, NativeExpr};

use crate::wrapper::Wrapper;

/// A generated expression and its static description.
///
/// A *reference* evaluates to the address of storage laid out as the
/// wrapper's native layout; a *value* evaluates to the scalar itself.
/// Values are only produced for wrappers whose layout is a scalar (or
/// void); aggregates are always handled by reference.
#[derive(Clone, Debug)]
pub struct TypedExpr {
    pub expr: NativeExpr,
    pub wrapper: Wrapper,
    pub is_reference: bool,
}

impl TypedExpr {
    pub fn value(expr: NativeExpr, wrapper: Wrapper) -> Self {
        TypedExpr {
            expr,
            wrapper,
            is_reference: false,
        }
    }

    pub fn reference(expr: NativeExpr, wrapper: Wrapper) -> Self {
        TypedExpr {
            expr,
            wrapper,
            is_reference: true,
        }
    }

    /// The same storage described by another wrapper. No data moves.
    #[must_use]
    pub fn retag(self, wrapper: Wrapper) -> Self {
        TypedExpr { wrapper, ..self }
    }

    /// Constant folded value, when this is a literal value expression.
    pub fn as_constant(&self) -> Option<&Constant> {
        if self.is_reference {
            None
        } else {
            self.expr.as_constant()
        }
    }

    /// Constant integer value, when known at compile time.
    pub fn as_constant_int(&self) -> Option<i128> {
        match self.as_constant()? {
            Constant::Int { value, .. } => Some(*value),
            _ => None,
        }
    }
}
