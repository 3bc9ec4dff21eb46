//! `instance.method` before it is called.
//!
//! A bound method holds its owner by value in the owner's own layout, so
//! producing one from an attribute access is a re-tag and lifecycle
//! operations forward to the owner.

use tessel_native::NativeType;

use crate::context::ExprContext;
use crate::error::CodegenResult;
use crate::repr::TypeRepr;
use crate::typed_expr::TypedExpr;
use crate::wrapper::{ReprFlags, TypeWrapper, Wrapper};

#[derive(Debug)]
pub struct BoundMethodWrapper {
    repr: TypeRepr,
    owner: Wrapper,
    name: String,
}

impl BoundMethodWrapper {
    pub fn new(repr: TypeRepr, owner: Wrapper, name: String) -> Self {
        BoundMethodWrapper { repr, owner, name }
    }

    pub fn owner(&self) -> &Wrapper {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn as_owner(&self, value: &TypedExpr) -> TypedExpr {
        value.clone().retag(self.owner.clone())
    }
}

/// Bind `name` to `instance` without moving any data.
pub(crate) fn bind(cx: &mut ExprContext<'_>, instance: TypedExpr, name: &str) -> CodegenResult<TypedExpr> {
    let repr = TypeRepr::bound_method(instance.wrapper.repr().clone(), name);
    let wrapper = cx.wrapper(&repr)?;
    Ok(instance.retag(wrapper))
}

impl TypeWrapper for BoundMethodWrapper {
    fn kind_name(&self) -> &'static str {
        "BoundMethod"
    }

    fn repr(&self) -> &TypeRepr {
        &self.repr
    }

    fn flags(&self) -> ReprFlags {
        self.owner.flags()
    }

    fn native_layout(&self) -> CodegenResult<NativeType> {
        self.owner.native_layout()
    }

    fn convert_copy_initialize(
        &self,
        cx: &mut ExprContext<'_>,
        target: &TypedExpr,
        source: &TypedExpr,
    ) -> CodegenResult<()> {
        cx.copy_initialize(&self.as_owner(target), &self.as_owner(source))
    }

    fn convert_assign(
        &self,
        cx: &mut ExprContext<'_>,
        target: &TypedExpr,
        source: &TypedExpr,
    ) -> CodegenResult<()> {
        cx.assign(&self.as_owner(target), &self.as_owner(source))
    }

    fn convert_destroy(&self, cx: &mut ExprContext<'_>, target: &TypedExpr) -> CodegenResult<()> {
        cx.destroy(&self.as_owner(target))
    }

    fn convert_call(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        args: Vec<TypedExpr>,
    ) -> CodegenResult<TypedExpr> {
        let owner = self.as_owner(&instance);
        cx.method_call(owner, &self.name, args)
    }
}
