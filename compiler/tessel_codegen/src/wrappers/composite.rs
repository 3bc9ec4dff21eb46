//! User-declared records held by value.
//!
//! Lifecycle operations of non-POD composites, and every user member, are
//! compiled into native functions on first use and called from then on.
//! Field-wise copy and destroy of a composite that refers to itself through
//! a handle therefore recurse through the function registry rather than at
//! code-generation time.

mod def;

pub use def::{
    CompositeDef, Field, FieldDeclaration, FieldListBuilder, Lifecycle, MemberBody,
    MemberFunction, ResolvedFields,
};

use std::rc::Rc;

use tessel_native::{FunctionId, NativeExpr, NativeType, RuntimeFn};

use super::bound_method::bind;
use super::refcount::spill_handle;
use crate::context::ExprContext;
use crate::converter::FunctionKey;
use crate::error::{attribute_error, CodegenError, CodegenResult};
use crate::repr::TypeRepr;
use crate::typed_expr::TypedExpr;
use crate::wrapper::{ReprFlags, TypeWrapper, Wrapper};

#[derive(Debug)]
pub struct CompositeWrapper {
    repr: TypeRepr,
    def: Rc<CompositeDef>,
}

impl CompositeWrapper {
    pub fn new(repr: TypeRepr, def: Rc<CompositeDef>) -> Self {
        CompositeWrapper { repr, def }
    }

    pub fn def(&self) -> &CompositeDef {
        &self.def
    }

    fn fields(&self) -> CodegenResult<Rc<ResolvedFields>> {
        self.def.resolved()
    }

    fn self_wrapper(&self, cx: &ExprContext<'_>) -> CodegenResult<Wrapper> {
        cx.wrapper(&self.repr)
    }

    fn field_ref(base: &NativeExpr, field: &Field) -> TypedExpr {
        TypedExpr::reference(base.clone().field_ptr(field.offset), field.wrapper.clone())
    }

    /// References to every field of `instance`, in declaration order.
    fn field_refs(&self, cx: &mut ExprContext<'_>, instance: &TypedExpr) -> CodegenResult<Vec<TypedExpr>> {
        let base = cx.ensure_reference(instance.clone())?.expr;
        Ok(self
            .fields()?
            .iter()
            .map(|field| Self::field_ref(&base, field))
            .collect())
    }

    fn default_initialize_fields(&self, cx: &mut ExprContext<'_>, target: &TypedExpr) -> CodegenResult<()> {
        for field in self.field_refs(cx, target)? {
            cx.default_initialize(&field)?;
        }
        Ok(())
    }

    /// The generated function implementing lifecycle operation `operation`
    /// on this composite.
    fn lifecycle_function(&self, cx: &mut ExprContext<'_>, operation: Lifecycle) -> CodegenResult<FunctionId> {
        let wrapper = self.self_wrapper(cx)?;
        let (name, params) = match operation {
            Lifecycle::CopyConstructor => ("copy", vec![wrapper.clone(), wrapper.clone()]),
            Lifecycle::Assign => ("assign", vec![wrapper.clone(), wrapper.clone()]),
            Lifecycle::Destructor => ("destroy", vec![wrapper.clone()]),
        };
        let key = FunctionKey::new(name, [wrapper]);
        let user = self.def.lifecycle(operation).cloned();
        let fields = self.fields()?;
        cx.define_native_function(key, params, None, move |cx, args| {
            let target = &args[0];
            let base = cx.ensure_reference(target.clone())?.expr;
            let targets: Vec<_> = fields.iter().map(|f| Self::field_ref(&base, f)).collect();
            match operation {
                Lifecycle::CopyConstructor => {
                    if let Some(user) = user {
                        for field in &targets {
                            cx.default_initialize(field)?;
                        }
                        user(cx, args)?;
                    } else {
                        let source = cx.ensure_reference(args[1].clone())?.expr;
                        for (field, t) in fields.iter().zip(&targets) {
                            cx.copy_initialize(t, &Self::field_ref(&source, field))?;
                        }
                    }
                }
                Lifecycle::Assign => {
                    if let Some(user) = user {
                        user(cx, args)?;
                    } else {
                        let source = cx.ensure_reference(args[1].clone())?.expr;
                        for (field, t) in fields.iter().zip(&targets) {
                            cx.assign(t, &Self::field_ref(&source, field))?;
                        }
                    }
                }
                Lifecycle::Destructor => {
                    if let Some(user) = user {
                        user(cx, args)?;
                    }
                    for t in &targets {
                        cx.destroy(t)?;
                    }
                }
            }
            Ok(None)
        })
    }

    /// The generated function for user member `name`.
    fn member_function(
        &self,
        cx: &mut ExprContext<'_>,
        name: &str,
        member: &MemberFunction,
    ) -> CodegenResult<FunctionId> {
        let wrapper = self.self_wrapper(cx)?;
        let mut params = vec![wrapper.clone()];
        for repr in &member.params {
            params.push(cx.wrapper(repr)?);
        }
        let ret = member.ret.as_ref().map(|r| cx.wrapper(r)).transpose()?;
        let key = FunctionKey::new(format!("{}.{name}", self.def.name()), [wrapper]);
        let body = Rc::clone(&member.body);
        cx.define_native_function(key, params, ret, move |cx, args| body(cx, args))
    }

    fn call_member(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        name: &str,
        member: &MemberFunction,
        args: Vec<TypedExpr>,
    ) -> CodegenResult<TypedExpr> {
        let id = self.member_function(cx, name, member)?;
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(instance);
        all.extend(args);
        cx.call_native(id, all)
    }

    /// `instance.name` when `name` is not a field.
    fn no_field(&self, name: &str) -> CodegenError {
        attribute_error(format!(
            "'{}' object has no attribute '{name}'",
            self.def.name()
        ))
    }
}

impl TypeWrapper for CompositeWrapper {
    fn kind_name(&self) -> &'static str {
        "Composite"
    }

    fn repr(&self) -> &TypeRepr {
        &self.repr
    }

    fn flags(&self) -> ReprFlags {
        let mut flags = ReprFlags::PASS_BY_REF;
        let Ok(fields) = self.fields() else {
            return flags;
        };
        if !self.def.has_custom_lifecycle() && fields.iter().all(|f| f.wrapper.is_pod()) {
            flags |= ReprFlags::IS_POD;
        }
        if fields.is_empty() {
            flags |= ReprFlags::IS_EMPTY;
        }
        flags
    }

    fn native_layout(&self) -> CodegenResult<NativeType> {
        Ok(self.fields()?.layout().clone())
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    fn convert_default_initialize(&self, cx: &mut ExprContext<'_>, target: &TypedExpr) -> CodegenResult<()> {
        self.default_initialize_fields(cx, target)
    }

    fn convert_copy_initialize(
        &self,
        cx: &mut ExprContext<'_>,
        target: &TypedExpr,
        source: &TypedExpr,
    ) -> CodegenResult<()> {
        if self.is_pod() {
            return cx.store_pod(target, source);
        }
        let id = self.lifecycle_function(cx, Lifecycle::CopyConstructor)?;
        cx.call_native(id, vec![target.clone(), source.clone()])?;
        Ok(())
    }

    fn convert_assign(
        &self,
        cx: &mut ExprContext<'_>,
        target: &TypedExpr,
        source: &TypedExpr,
    ) -> CodegenResult<()> {
        if self.is_pod() {
            return cx.store_pod(target, source);
        }
        let id = self.lifecycle_function(cx, Lifecycle::Assign)?;
        cx.call_native(id, vec![target.clone(), source.clone()])?;
        Ok(())
    }

    fn convert_destroy(&self, cx: &mut ExprContext<'_>, target: &TypedExpr) -> CodegenResult<()> {
        if self.is_pod() {
            return Ok(());
        }
        let id = self.lifecycle_function(cx, Lifecycle::Destructor)?;
        cx.call_native(id, vec![target.clone()])?;
        Ok(())
    }

    // ── Construction ────────────────────────────────────────────────

    fn convert_type_call(&self, cx: &mut ExprContext<'_>, args: Vec<TypedExpr>) -> CodegenResult<TypedExpr> {
        let wrapper = self.self_wrapper(cx)?;

        if let Some(constructor) = self.def.constructor().cloned() {
            let result = cx.push_default(&wrapper)?;
            self.call_member(cx, result.clone(), "__init__", &constructor, args)?;
            return Ok(result);
        }

        let fields = self.fields()?;
        if args.is_empty() {
            return cx.push_default(&wrapper);
        }
        if args.len() != fields.len() {
            return Err(CodegenError::ConstructorArity {
                name: self.def.name().to_owned(),
                expected: fields.len(),
                found: args.len(),
            });
        }
        let mut converted = Vec::with_capacity(args.len());
        for (arg, field) in args.into_iter().zip(fields.iter()) {
            converted.push(cx.convert_to(arg, &field.wrapper, true)?);
        }
        let result = cx.allocate_uninitialized_slot(&wrapper)?;
        for (target, value) in self.field_refs(cx, &result.value)?.iter().zip(&converted) {
            cx.copy_initialize(target, value)?;
        }
        cx.mark_initialized(&result);
        Ok(result.value)
    }

    // ── Attributes ──────────────────────────────────────────────────

    fn convert_attribute(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        attr: &str,
    ) -> CodegenResult<TypedExpr> {
        let fields = self.fields()?;
        if let Some(field) = fields.get(attr) {
            let base = cx.ensure_reference(instance)?.expr;
            return Ok(Self::field_ref(&base, field));
        }
        if self.def.method(attr).is_some() {
            return bind(cx, instance, attr);
        }
        Err(self.no_field(attr))
    }

    fn convert_set_attribute(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        attr: &str,
        value: TypedExpr,
    ) -> CodegenResult<()> {
        let fields = self.fields()?;
        let Some(field) = fields.get(attr) else {
            return Err(CodegenError::UnassignableField {
                owner: self.def.name().to_owned(),
                name: attr.to_owned(),
            });
        };
        let value = cx.convert_to(value, &field.wrapper, true)?;
        let base = cx.ensure_reference(instance)?.expr;
        cx.assign(&Self::field_ref(&base, field), &value)
    }

    fn convert_method_call(
        &self,
        cx: &mut ExprContext<'_>,
        instance: TypedExpr,
        name: &str,
        args: Vec<TypedExpr>,
    ) -> CodegenResult<TypedExpr> {
        if let Some(member) = self.def.method(name).cloned() {
            return self.call_member(cx, instance, name, &member, args);
        }
        if self.fields()?.get(name).is_some() {
            let callee = self.convert_attribute(cx, instance, name)?;
            return cx.call(callee, args);
        }
        Err(self.no_field(name))
    }

    fn convert_bool_cast(&self, cx: &mut ExprContext<'_>, _instance: TypedExpr) -> CodegenResult<TypedExpr> {
        Ok(cx.constant_bool(true))
    }

    // ── Boxing ──────────────────────────────────────────────────────

    fn is_boxable(&self) -> bool {
        self.fields()
            .map(|fields| fields.iter().all(|f| f.wrapper.is_boxable()))
            .unwrap_or(false)
    }

    fn convert_box(&self, cx: &mut ExprContext<'_>, value: TypedExpr) -> CodegenResult<NativeExpr> {
        let class_name = cx.constant_str(self.def.name())?;
        let class_name = cx.load(&class_name)?;
        let handle = spill_handle(
            cx,
            NativeExpr::call_runtime(RuntimeFn::DynNewInstance, vec![class_name]),
        );
        let fields = self.fields()?;
        let refs = self.field_refs(cx, &value)?;
        for (field, field_ref) in fields.iter().zip(refs) {
            let boxed = cx.box_to_dynamic(field_ref)?;
            let boxed = cx.load(&boxed)?;
            let name = cx.constant_str(&field.name)?;
            let name = cx.load(&name)?;
            cx.push_effect(NativeExpr::call_runtime(
                RuntimeFn::DynSetAttr,
                vec![handle.clone(), name, boxed],
            ));
        }
        Ok(handle)
    }
}
