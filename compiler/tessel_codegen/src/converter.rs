//! One compilation run: wrapper factory, generated-function registry and
//! options.
//!
//! Generated helper functions are content addressed: a [`FunctionKey`]
//! names the operation and the wrappers it was generated for, and asking
//! for the same key twice returns the same [`FunctionId`]. The id is
//! registered before the body is generated, so a body that (directly or
//! through other helpers) needs its own function gets the pending id back.

use std::cell::RefCell;
use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tessel_native::{FunctionId, NativeExpr, NativeModule, NativeType};

use crate::context::{define_function, ExprContext};
use crate::error::CodegenResult;
use crate::factory::WrapperFactory;
use crate::options::CodegenOptions;
use crate::repr::TypeRepr;
use crate::typed_expr::TypedExpr;
use crate::wrapper::{Convertibility, Wrapper};
use crate::wrappers::CompositeDef;

// ── Function keys ───────────────────────────────────────────────────

/// Structural identity of a generated function.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionKey {
    operation: String,
    wrappers: SmallVec<[Wrapper; 2]>,
}

impl FunctionKey {
    pub fn new(operation: impl Into<String>, wrappers: impl IntoIterator<Item = Wrapper>) -> Self {
        FunctionKey {
            operation: operation.into(),
            wrappers: wrappers.into_iter().collect(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.operation)?;
        for (i, wrapper) in self.wrappers.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{wrapper}")?;
        }
        write!(f, ")")
    }
}

/// Source-level signature of a generated function.
#[derive(Clone, Debug)]
pub struct FunctionSignature {
    pub params: Vec<Wrapper>,
    pub ret: Option<Wrapper>,
}

// ── Registry ────────────────────────────────────────────────────────

/// Position in the registry to roll back to.
#[derive(Copy, Clone, Debug)]
pub(crate) struct RegistryMark(usize);

/// Memoizing table of generated functions.
#[derive(Default)]
pub struct FunctionRegistry {
    module: NativeModule,
    keys: FxHashMap<FunctionKey, FunctionId>,
    signatures: Vec<FunctionSignature>,
}

impl FunctionRegistry {
    pub fn lookup(&self, key: &FunctionKey) -> Option<FunctionId> {
        self.keys.get(key).copied()
    }

    pub fn signature(&self, id: FunctionId) -> Option<&FunctionSignature> {
        self.signatures.get(id.index())
    }

    pub fn module(&self) -> &NativeModule {
        &self.module
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub(crate) fn mark(&self) -> RegistryMark {
        RegistryMark(self.signatures.len())
    }

    pub(crate) fn declare(
        &mut self,
        key: FunctionKey,
        name: String,
        signature: FunctionSignature,
        params: Vec<NativeType>,
        ret: NativeType,
    ) -> FunctionId {
        let id = self.module.declare(name, params, ret);
        self.keys.insert(key, id);
        self.signatures.push(signature);
        id
    }

    pub(crate) fn define(&mut self, id: FunctionId, slots: Vec<NativeType>, body: NativeExpr) {
        self.module.define(id, slots, body);
    }

    /// Forget every function declared since `mark`, including keys of
    /// functions still pending.
    pub(crate) fn rollback(&mut self, mark: RegistryMark) {
        self.module.truncate(mark.0);
        self.signatures.truncate(mark.0);
        self.keys.retain(|_, id| id.index() < mark.0);
    }
}

// ── Converter ───────────────────────────────────────────────────────

/// State of one code generation run.
pub struct Converter {
    pub(crate) factory: WrapperFactory,
    pub(crate) registry: FunctionRegistry,
    options: CodegenOptions,
    conversions: RefCell<FxHashMap<(Wrapper, Wrapper, bool), Convertibility>>,
}

impl Converter {
    pub fn new(options: CodegenOptions) -> Self {
        Converter {
            factory: WrapperFactory::new(),
            registry: FunctionRegistry::default(),
            options,
            conversions: RefCell::default(),
        }
    }

    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    pub fn factory(&self) -> &WrapperFactory {
        &self.factory
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn module(&self) -> &NativeModule {
        self.registry.module()
    }

    pub fn into_module(self) -> NativeModule {
        self.registry.module
    }

    pub fn wrapper(&self, repr: &TypeRepr) -> CodegenResult<Wrapper> {
        self.factory.get(repr)
    }

    pub fn declare_composite(&self, def: CompositeDef) -> TypeRepr {
        self.factory.declare_composite(def)
    }

    /// Combined convertibility of `source` into `target`, memoized.
    pub fn can_convert(&self, source: &Wrapper, target: &Wrapper, explicit: bool) -> Convertibility {
        if source == target {
            return Convertibility::Always;
        }
        let key = (source.clone(), target.clone(), explicit);
        if let Some(cached) = self.conversions.borrow().get(&key) {
            return *cached;
        }
        let verdict = Convertibility::combine(
            source.can_convert_to(target, explicit),
            target.can_convert_from(source, explicit),
        );
        tracing::trace!(%source, %target, explicit, ?verdict, "convertibility");
        self.conversions.borrow_mut().insert(key, verdict);
        verdict
    }

    /// Generate an entry point named `name`.
    ///
    /// `body` receives one reference per parameter and returns the result
    /// value (or `None` for a function without a result).
    pub fn define_function<G>(
        &mut self,
        name: &str,
        params: &[TypeRepr],
        ret: Option<&TypeRepr>,
        body: G,
    ) -> CodegenResult<FunctionId>
    where
        G: FnOnce(&mut ExprContext<'_>, &[TypedExpr]) -> CodegenResult<Option<TypedExpr>>,
    {
        let params = params
            .iter()
            .map(|repr| self.factory.get(repr))
            .collect::<CodegenResult<Vec<_>>>()?;
        let ret = ret.map(|repr| self.factory.get(repr)).transpose()?;
        let key = FunctionKey::new(format!("entry {name}"), params.iter().cloned());
        define_function(self, name.to_owned(), key, params, ret, body)
    }
}

impl Default for Converter {
    fn default() -> Self {
        Converter::new(CodegenOptions::default())
    }
}
