//! Memoizing wrapper factory.
//!
//! One wrapper per [`TypeRepr`] for the lifetime of a compilation run.
//! Composite wrappers are cached before their fields are resolved, so a
//! composite that refers to itself through a handle (a list of itself, a
//! cell holding itself) resolves; one that contains itself by value fails
//! with a cycle error.
//!
//! A composite first reached while another one is resolving is queued and
//! resolved once the outermost resolution finishes, unless a layout needs
//! it sooner. Whether a set of composites resolves therefore doesn't depend
//! on which of them is requested first.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::{CodegenError, CodegenResult};
use crate::repr::{CompositeId, NumericType, TypeRepr};
use crate::wrapper::Wrapper;
use crate::wrappers::{
    ArithmeticWrapper, BoundMethodWrapper, CellWrapper, CompositeDef, CompositeWrapper,
    DynamicWrapper, ListOfWrapper, MasqueradeWrapper, NoneWrapper, ResolvedFields,
    SharedWrapper, StringWrapper, TupleWrapper,
};

/// Builds wrappers for [`TypeRepr::Extension`] kinds.
pub type ExtensionBuilder = Rc<dyn Fn(&WrapperFactory, &[TypeRepr]) -> CodegenResult<Wrapper>>;

#[derive(Default)]
pub struct WrapperFactory {
    cache: RefCell<FxHashMap<TypeRepr, Wrapper>>,
    composites: RefCell<Vec<Rc<CompositeDef>>>,
    extensions: RefCell<FxHashMap<String, ExtensionBuilder>>,
    /// Depth of nested composite resolutions.
    resolving: Cell<u32>,
    deferred: RefCell<Vec<Rc<CompositeDef>>>,
}

impl WrapperFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The wrapper for `repr`, building it on first request.
    pub fn get(&self, repr: &TypeRepr) -> CodegenResult<Wrapper> {
        let cached = self.cache.borrow().get(repr).cloned();
        if let Some(wrapper) = cached {
            if let TypeRepr::Composite { id, .. } = repr {
                self.resolve_composite(&self.composite(*id)?)?;
            }
            return Ok(wrapper);
        }

        let wrapper = match repr {
            TypeRepr::None => Wrapper::new(NoneWrapper::new()),
            TypeRepr::Numeric(t) => Wrapper::new(ArithmeticWrapper::new(*t)),
            TypeRepr::Str => Wrapper::new(StringWrapper::new()),
            TypeRepr::Dynamic => Wrapper::new(DynamicWrapper::new()),
            TypeRepr::Tuple(elements) => {
                let elements = elements
                    .iter()
                    .map(|element| self.get(element))
                    .collect::<CodegenResult<Vec<_>>>()?;
                Wrapper::new(TupleWrapper::new(repr.clone(), elements))
            }
            TypeRepr::ListOf(element) => {
                Wrapper::new(ListOfWrapper::new(repr.clone(), self.get(element)?))
            }
            TypeRepr::Shared(payload) => {
                Wrapper::new(SharedWrapper::new(repr.clone(), self.get(payload)?))
            }
            TypeRepr::Cell(payload) => {
                Wrapper::new(CellWrapper::new(repr.clone(), self.get(payload)?))
            }
            TypeRepr::Masquerade(typed) => {
                Wrapper::new(MasqueradeWrapper::new(repr.clone(), self.get(typed)?))
            }
            TypeRepr::BoundMethod { owner, name } => Wrapper::new(BoundMethodWrapper::new(
                repr.clone(),
                self.get(owner)?,
                name.clone(),
            )),
            TypeRepr::Composite { id, .. } => {
                let def = self.composite(*id)?;
                let wrapper = Wrapper::new(CompositeWrapper::new(repr.clone(), Rc::clone(&def)));
                self.cache
                    .borrow_mut()
                    .insert(repr.clone(), wrapper.clone());
                self.resolve_composite(&def)?;
                return Ok(wrapper);
            }
            TypeRepr::Extension { kind, args } => {
                let builder = self.extensions.borrow().get(kind).cloned();
                let Some(builder) = builder else {
                    return Err(crate::error::type_error(format!(
                        "no wrapper kind registered for '{kind}'"
                    )));
                };
                builder(self, args)?
            }
        };
        self.cache
            .borrow_mut()
            .insert(repr.clone(), wrapper.clone());
        Ok(wrapper)
    }

    /// Numeric wrappers can't fail to build.
    pub fn numeric(&self, t: NumericType) -> Wrapper {
        self.infallible(TypeRepr::Numeric(t), || {
            Wrapper::new(ArithmeticWrapper::new(t))
        })
    }

    pub fn none(&self) -> Wrapper {
        self.infallible(TypeRepr::None, || Wrapper::new(NoneWrapper::new()))
    }

    pub fn string(&self) -> Wrapper {
        self.infallible(TypeRepr::Str, || Wrapper::new(StringWrapper::new()))
    }

    pub fn dynamic(&self) -> Wrapper {
        self.infallible(TypeRepr::Dynamic, || Wrapper::new(DynamicWrapper::new()))
    }

    fn infallible(&self, repr: TypeRepr, build: impl FnOnce() -> Wrapper) -> Wrapper {
        self.cache
            .borrow_mut()
            .entry(repr)
            .or_insert_with(build)
            .clone()
    }

    /// Register a composite; fields are resolved on first use.
    pub fn declare_composite(&self, def: CompositeDef) -> TypeRepr {
        let mut composites = self.composites.borrow_mut();
        let id = CompositeId::new(composites.len() as u32);
        let name = def.name().to_owned();
        tracing::debug!(%name, id = id.raw(), "declared composite");
        composites.push(Rc::new(def));
        TypeRepr::Composite { id, name }
    }

    pub fn composite(&self, id: CompositeId) -> CodegenResult<Rc<CompositeDef>> {
        self.composites
            .borrow()
            .get(id.index())
            .cloned()
            .ok_or_else(|| CodegenError::UnknownComposite {
                name: format!("#{}", id.raw()),
            })
    }

    /// Resolved fields of the composite named by `repr`.
    pub fn composite_fields(&self, repr: &TypeRepr) -> CodegenResult<Rc<ResolvedFields>> {
        let TypeRepr::Composite { id, .. } = repr else {
            return Err(CodegenError::UnknownComposite {
                name: repr.to_string(),
            });
        };
        self.get(repr)?;
        self.resolve_now(&*self.composite(*id)?)
    }

    /// Resolve `def` now, or queue it if another composite is resolving.
    ///
    /// A queued composite that fails doesn't fail the one that reached it
    /// through a handle; its failure is remembered and reported where it
    /// is used. Composites held by value are resolved by the container's
    /// layout, which does report their failure.
    fn resolve_composite(&self, def: &Rc<CompositeDef>) -> CodegenResult<()> {
        if self.resolving.get() > 0 {
            if def.is_unresolved() {
                tracing::trace!(composite = def.name(), "deferred composite resolution");
                self.deferred.borrow_mut().push(Rc::clone(def));
            }
            return Ok(());
        }
        if let Some(err) = def.failure() {
            return Err(err);
        }
        if !def.is_unresolved() {
            return Ok(());
        }
        let result = self.resolve_now(def);
        loop {
            let next = self.deferred.borrow_mut().pop();
            let Some(next) = next else {
                break;
            };
            let _ = self.resolve_now(&next);
        }
        result.map(|_| ())
    }

    /// Resolve `def` immediately, even from inside another resolution.
    /// Used when its layout or field table is needed.
    pub(crate) fn resolve_now(&self, def: &CompositeDef) -> CodegenResult<Rc<ResolvedFields>> {
        self.resolving.set(self.resolving.get() + 1);
        let result = def.resolve(self);
        self.resolving.set(self.resolving.get() - 1);
        result
    }

    /// Make [`TypeRepr::Extension`] reprs of `kind` buildable.
    pub fn register_extension(&self, kind: impl Into<String>, builder: ExtensionBuilder) {
        self.extensions.borrow_mut().insert(kind.into(), builder);
    }
}

#[cfg(test)]
mod tests;
