//! Composite declarations and lazy field resolution.
//!
//! A composite's fields are produced on first use, exactly once. Field
//! declarations may name other composites (or the composite itself,
//! through a handle), so resolution runs as an explicit state machine:
//! re-entering a composite that is still resolving is a cycle, and a
//! failure is remembered so later requests see the same error.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tessel_native::NativeType;

use crate::context::ExprContext;
use crate::error::{CodegenError, CodegenResult};
use crate::factory::WrapperFactory;
use crate::repr::TypeRepr;
use crate::typed_expr::TypedExpr;
use crate::wrapper::Wrapper;

/// Procedure declaring a composite's fields.
pub type FieldDeclaration = Box<dyn FnOnce(&mut FieldListBuilder<'_>) -> CodegenResult<()>>;

/// Body of a user member. Receives `self` first, then the declared
/// parameters, all as references.
pub type MemberBody = Rc<dyn Fn(&mut ExprContext<'_>, &[TypedExpr]) -> CodegenResult<Option<TypedExpr>>>;

enum FieldSource {
    Declared(FieldDeclaration),
    Listed(Vec<(String, TypeRepr)>),
}

enum Resolution {
    Unresolved(FieldSource),
    Resolving,
    Resolved(Rc<ResolvedFields>),
    Failed(CodegenError),
}

// ── Fields ──────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    pub wrapper: Wrapper,
    pub offset: u32,
}

/// Fields of a composite in declaration order, with their layout.
#[derive(Debug)]
pub struct ResolvedFields {
    fields: Vec<Field>,
    layout: NativeType,
}

impl ResolvedFields {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn layout(&self) -> &NativeType {
        &self.layout
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

/// Collects a composite's fields while its declaration runs.
pub struct FieldListBuilder<'f> {
    owner: String,
    factory: &'f WrapperFactory,
    fields: Vec<(String, Wrapper)>,
}

impl<'f> FieldListBuilder<'f> {
    fn new(owner: &str, factory: &'f WrapperFactory) -> Self {
        FieldListBuilder {
            owner: owner.to_owned(),
            factory,
            fields: Vec::new(),
        }
    }

    pub fn factory(&self) -> &WrapperFactory {
        self.factory
    }

    /// Append a field. Names must be identifiers, not dunder names, and
    /// unique within the composite.
    pub fn add(&mut self, name: &str, repr: &TypeRepr) -> CodegenResult<&mut Self> {
        if !is_field_name(name) {
            return Err(CodegenError::InvalidIdentifier {
                owner: self.owner.clone(),
                name: name.to_owned(),
            });
        }
        if self.fields.iter().any(|(existing, _)| existing == name) {
            return Err(CodegenError::DuplicateField {
                owner: self.owner.clone(),
                name: name.to_owned(),
            });
        }
        let wrapper = self.factory.get(repr)?;
        self.fields.push((name.to_owned(), wrapper));
        Ok(self)
    }

    /// Append every field of another composite, in its order.
    pub fn inherit(&mut self, base: &TypeRepr) -> CodegenResult<&mut Self> {
        let inherited = self.factory.composite_fields(base)?;
        for field in inherited.iter() {
            self.add(&field.name, field.wrapper.repr())?;
        }
        Ok(self)
    }
}

fn is_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return false;
    }
    !(name.len() > 4 && name.starts_with("__") && name.ends_with("__"))
}

// ── Members ─────────────────────────────────────────────────────────

/// A user-defined method or constructor.
#[derive(Clone)]
pub struct MemberFunction {
    pub params: Vec<TypeRepr>,
    pub ret: Option<TypeRepr>,
    pub body: MemberBody,
}

impl MemberFunction {
    pub fn new<F>(params: Vec<TypeRepr>, ret: Option<TypeRepr>, body: F) -> Self
    where
        F: Fn(&mut ExprContext<'_>, &[TypedExpr]) -> CodegenResult<Option<TypedExpr>> + 'static,
    {
        MemberFunction {
            params,
            ret,
            body: Rc::new(body),
        }
    }
}

impl fmt::Debug for MemberFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberFunction")
            .field("params", &self.params)
            .field("ret", &self.ret)
            .finish_non_exhaustive()
    }
}

/// Lifecycle hooks a composite may override.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// `(self, source)`, run on a blank-initialized `self`.
    CopyConstructor,
    /// `(self)`, run before the fields are destroyed.
    Destructor,
    /// `(self, source)`.
    Assign,
}

// ── Definition ──────────────────────────────────────────────────────

/// A user-declared composite type.
pub struct CompositeDef {
    name: String,
    state: RefCell<Resolution>,
    constructor: Option<MemberFunction>,
    lifecycle: FxHashMap<Lifecycle, MemberBody>,
    methods: FxHashMap<String, MemberFunction>,
}

impl CompositeDef {
    /// A composite whose fields are produced by `declare` on first use.
    pub fn new<F>(name: impl Into<String>, declare: F) -> Self
    where
        F: FnOnce(&mut FieldListBuilder<'_>) -> CodegenResult<()> + 'static,
    {
        Self::with_source(name.into(), FieldSource::Declared(Box::new(declare)))
    }

    /// A composite with an already known field list, such as the
    /// captured variables of a closure.
    pub fn closure(name: impl Into<String>, fields: Vec<(String, TypeRepr)>) -> Self {
        Self::with_source(name.into(), FieldSource::Listed(fields))
    }

    fn with_source(name: String, source: FieldSource) -> Self {
        CompositeDef {
            name,
            state: RefCell::new(Resolution::Unresolved(source)),
            constructor: None,
            lifecycle: FxHashMap::default(),
            methods: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn with_constructor(mut self, constructor: MemberFunction) -> Self {
        self.constructor = Some(constructor);
        self
    }

    #[must_use]
    pub fn with_lifecycle<F>(mut self, hook: Lifecycle, body: F) -> Self
    where
        F: Fn(&mut ExprContext<'_>, &[TypedExpr]) -> CodegenResult<Option<TypedExpr>> + 'static,
    {
        self.lifecycle.insert(hook, Rc::new(body));
        self
    }

    #[must_use]
    pub fn with_method(mut self, name: impl Into<String>, method: MemberFunction) -> Self {
        self.methods.insert(name.into(), method);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constructor(&self) -> Option<&MemberFunction> {
        self.constructor.as_ref()
    }

    pub fn lifecycle(&self, hook: Lifecycle) -> Option<&MemberBody> {
        self.lifecycle.get(&hook)
    }

    pub fn method(&self, name: &str) -> Option<&MemberFunction> {
        self.methods.get(name)
    }

    pub fn has_custom_lifecycle(&self) -> bool {
        !self.lifecycle.is_empty()
    }

    /// Resolve the fields if that hasn't happened yet.
    pub fn resolve(&self, factory: &WrapperFactory) -> CodegenResult<Rc<ResolvedFields>> {
        let previous = std::mem::replace(&mut *self.state.borrow_mut(), Resolution::Resolving);
        let source = match previous {
            Resolution::Unresolved(source) => source,
            Resolution::Resolving => return Err(self.cycle()),
            Resolution::Resolved(fields) => {
                *self.state.borrow_mut() = Resolution::Resolved(Rc::clone(&fields));
                return Ok(fields);
            }
            Resolution::Failed(err) => {
                *self.state.borrow_mut() = Resolution::Failed(err.clone());
                return Err(err);
            }
        };

        tracing::debug!(composite = %self.name, "resolving composite fields");
        match self.build_fields(source, factory) {
            Ok(fields) => {
                let fields = Rc::new(fields);
                tracing::debug!(
                    composite = %self.name,
                    fields = fields.len(),
                    "resolved composite"
                );
                *self.state.borrow_mut() = Resolution::Resolved(Rc::clone(&fields));
                Ok(fields)
            }
            Err(err) => {
                tracing::debug!(composite = %self.name, error = %err, "composite resolution failed");
                *self.state.borrow_mut() = Resolution::Failed(err.clone());
                Err(err)
            }
        }
    }

    fn build_fields(&self, source: FieldSource, factory: &WrapperFactory) -> CodegenResult<ResolvedFields> {
        let mut builder = FieldListBuilder::new(&self.name, factory);
        match source {
            FieldSource::Declared(declare) => declare(&mut builder)?,
            FieldSource::Listed(fields) => {
                for (name, repr) in &fields {
                    builder.add(name, repr)?;
                }
            }
        }
        for (_, wrapper) in &builder.fields {
            for id in wrapper.repr().inline_composites() {
                factory.resolve_now(&*factory.composite(id)?)?;
            }
        }
        let layouts = builder
            .fields
            .iter()
            .map(|(_, wrapper)| wrapper.native_layout())
            .collect::<CodegenResult<Vec<_>>>()?;
        let layout = NativeType::Struct(layouts);
        let fields = builder
            .fields
            .into_iter()
            .zip(layout.field_offsets())
            .map(|((name, wrapper), offset)| Field {
                name,
                wrapper,
                offset,
            })
            .collect();
        Ok(ResolvedFields { fields, layout })
    }

    /// The resolved fields. Fails while resolution is in progress.
    pub fn resolved(&self) -> CodegenResult<Rc<ResolvedFields>> {
        match &*self.state.borrow() {
            Resolution::Resolved(fields) => Ok(Rc::clone(fields)),
            Resolution::Failed(err) => Err(err.clone()),
            Resolution::Resolving => Err(self.cycle()),
            Resolution::Unresolved(_) => Err(crate::error::internal(format!(
                "fields of composite '{}' requested before resolution",
                self.name
            ))),
        }
    }

    /// The error resolution failed with, if it did.
    pub fn failure(&self) -> Option<CodegenError> {
        match &*self.state.borrow() {
            Resolution::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(&*self.state.borrow(), Resolution::Unresolved(_))
    }

    fn cycle(&self) -> CodegenError {
        CodegenError::CyclicComposite {
            name: self.name.clone(),
        }
    }
}

impl fmt::Debug for CompositeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.borrow() {
            Resolution::Unresolved(_) => "unresolved",
            Resolution::Resolving => "resolving",
            Resolution::Resolved(_) => "resolved",
            Resolution::Failed(_) => "failed",
        };
        f.debug_struct("CompositeDef")
            .field("name", &self.name)
            .field("state", &state)
            .finish_non_exhaustive()
    }
}
