//! Defining and calling generated native functions.
//!
//! Calling convention: a parameter whose wrapper is pass-by-ref receives a
//! pointer to the caller's storage; any other parameter receives the
//! scalar value and is spilled to a slot on entry so the body can address
//! it. Arguments are borrowed: the callee never destroys them. A
//! pass-by-ref result is written through a leading out-pointer; other
//! non-void results are returned as scalars holding one reference.

use tessel_native::{FunctionId, NativeExpr, NativeType};

use super::ExprContext;
use crate::converter::{Converter, FunctionKey, FunctionSignature};
use crate::error::{internal, type_error, CodegenResult};
use crate::typed_expr::TypedExpr;
use crate::wrapper::Wrapper;

impl ExprContext<'_> {
    /// The function generated for `key`, generating it on first request.
    ///
    /// A request for a key whose body is still being generated returns the
    /// pending id, so recursive helpers (destructors of self-referential
    /// types) resolve to themselves.
    pub fn define_native_function<G>(
        &mut self,
        key: FunctionKey,
        params: Vec<Wrapper>,
        ret: Option<Wrapper>,
        generator: G,
    ) -> CodegenResult<FunctionId>
    where
        G: FnOnce(&mut ExprContext<'_>, &[TypedExpr]) -> CodegenResult<Option<TypedExpr>>,
    {
        let name = key.to_string();
        define_function(self.converter, name, key, params, ret, generator)
    }

    /// Emit a call to a generated function. Arguments are converted
    /// implicitly to the parameter wrappers.
    pub fn call_native(&mut self, id: FunctionId, args: Vec<TypedExpr>) -> CodegenResult<TypedExpr> {
        let Some(signature) = self.converter.registry.signature(id).cloned() else {
            return Err(internal(format!("call to unregistered function {}", id.raw())));
        };
        if signature.params.len() != args.len() {
            return Err(type_error(format!(
                "function takes {} arguments but {} were given",
                signature.params.len(),
                args.len()
            )));
        }

        let mut lowered = Vec::with_capacity(args.len() + 1);
        for (arg, param) in args.into_iter().zip(&signature.params) {
            let arg = self.convert_to(arg, param, false)?;
            if param.is_pass_by_ref() {
                lowered.push(self.ensure_reference(arg)?.expr);
            } else {
                lowered.push(self.load(&arg)?);
            }
        }

        match signature.ret {
            None => {
                self.push_effect(NativeExpr::call(id, lowered));
                Ok(self.none_value())
            }
            Some(ret) if ret.is_pass_by_ref() => self.push(&ret, move |cx, target| {
                let mut with_out = Vec::with_capacity(lowered.len() + 1);
                with_out.push(target.expr.clone());
                with_out.extend(lowered);
                cx.push_effect(NativeExpr::call(id, with_out));
                Ok(())
            }),
            Some(ret) if ret.is_pod() => self.push_pod(&ret, NativeExpr::call(id, lowered)),
            Some(ret) => self.push_move(&ret, NativeExpr::call(id, lowered)),
        }
    }

    /// Generate the body of a function with the given signature.
    fn build_body<G>(
        mut self,
        params: &[Wrapper],
        ret: Option<&Wrapper>,
        generator: G,
    ) -> CodegenResult<(Vec<NativeType>, NativeExpr)>
    where
        G: FnOnce(&mut ExprContext<'_>, &[TypedExpr]) -> CodegenResult<Option<TypedExpr>>,
    {
        let ret_by_ref = ret.is_some_and(|r| r.is_pass_by_ref());
        let first_param = u32::from(ret_by_ref);

        let mut args = Vec::with_capacity(params.len());
        for (i, param) in params.iter().enumerate() {
            let arg = NativeExpr::Arg(first_param + i as u32);
            if param.is_pass_by_ref() {
                args.push(TypedExpr::reference(arg, param.clone()));
                continue;
            }
            let layout = param.native_layout()?;
            let slot = self.allocate_slot(layout.clone());
            if !layout.is_void() {
                self.push_effect(NativeExpr::Slot(slot).store(arg, layout));
            }
            args.push(TypedExpr::reference(NativeExpr::Slot(slot), param.clone()));
        }

        let result = generator(&mut self, &args)?;

        let ret_expr = match (ret, result) {
            (None, _) => NativeExpr::void(),
            (Some(ret), None) => {
                return Err(internal(format!(
                    "function returning '{ret}' produced no value"
                )));
            }
            (Some(ret), Some(value)) => {
                let value = self.convert_to(value, ret, false)?;
                if ret_by_ref {
                    let out = TypedExpr::reference(NativeExpr::Arg(0), ret.clone());
                    self.copy_initialize(&out, &value)?;
                    NativeExpr::void()
                } else {
                    let layout = ret.native_layout()?;
                    let slot = self.allocate_slot(layout.clone());
                    let target = TypedExpr::reference(NativeExpr::Slot(slot), ret.clone());
                    self.copy_initialize(&target, &value)?;
                    if layout.is_void() {
                        NativeExpr::void()
                    } else {
                        NativeExpr::Slot(slot).load(layout)
                    }
                }
            }
        };

        let mut effects = self.end_frame()?;
        effects.push(ret_expr);
        Ok((self.slots, NativeExpr::Sequence(effects)))
    }
}

/// Memoized function generation with rollback on failure.
pub(crate) fn define_function<G>(
    converter: &mut Converter,
    name: String,
    key: FunctionKey,
    params: Vec<Wrapper>,
    ret: Option<Wrapper>,
    generator: G,
) -> CodegenResult<FunctionId>
where
    G: FnOnce(&mut ExprContext<'_>, &[TypedExpr]) -> CodegenResult<Option<TypedExpr>>,
{
    if let Some(id) = converter.registry.lookup(&key) {
        tracing::trace!(%key, id = id.raw(), "function cache hit");
        return Ok(id);
    }

    let ret_by_ref = ret.as_ref().is_some_and(|r| r.is_pass_by_ref());
    let mut native_params = Vec::with_capacity(params.len() + 1);
    if ret_by_ref {
        native_params.push(NativeType::Pointer);
    }
    for param in &params {
        native_params.push(if param.is_pass_by_ref() {
            NativeType::Pointer
        } else {
            param.native_layout()?
        });
    }
    let native_ret = match &ret {
        Some(ret) if !ret_by_ref => ret.native_layout()?,
        _ => NativeType::Void,
    };

    let mark = converter.registry.mark();
    let signature = FunctionSignature {
        params: params.clone(),
        ret: ret.clone(),
    };
    let id = converter
        .registry
        .declare(key.clone(), name, signature, native_params, native_ret);
    tracing::debug!(%key, id = id.raw(), "generating function");

    let built = ExprContext::new(converter).build_body(&params, ret.as_ref(), generator);
    match built {
        Ok((slots, body)) => {
            converter.registry.define(id, slots, body);
            Ok(id)
        }
        Err(err) => {
            tracing::debug!(%key, error = %err, "function generation failed, rolling back");
            converter.registry.rollback(mark);
            Err(err)
        }
    }
}
