//! Conversion resolver.
//!
//! Decides statically whether a value converts into another wrapper and
//! emits the conversion. Conversions that can't succeed are compile
//! errors; conversions that always succeed emit no check; conversions
//! that depend on the runtime value emit a branch that raises `TypeError`.

use tessel_native::{Constant, ErrorCategory};

use crate::context::ExprContext;
use crate::error::{internal, CodegenError, CodegenResult, ConversionKind};
use crate::typed_expr::TypedExpr;
use crate::wrapper::{Convertibility, Wrapper};

impl ExprContext<'_> {
    pub fn can_convert(&self, source: &Wrapper, target: &Wrapper, explicit: bool) -> Convertibility {
        self.converter().can_convert(source, target, explicit)
    }

    /// Convert `value` to `target`.
    ///
    /// `explicit` permits lossy conversions (casts written by the user);
    /// implicit conversions only widen.
    pub fn convert_to(
        &mut self,
        value: TypedExpr,
        target: &Wrapper,
        explicit: bool,
    ) -> CodegenResult<TypedExpr> {
        if value.wrapper == *target {
            return Ok(value);
        }

        let verdict = self.can_convert(&value.wrapper, target, explicit);
        tracing::debug!(
            from = %value.wrapper,
            to = %target,
            explicit,
            ?verdict,
            "conversion"
        );
        if verdict == Convertibility::Never {
            return Err(CodegenError::Unconvertible {
                from: value.wrapper.to_string(),
                to: target.to_string(),
                kind: ConversionKind::from_explicit(explicit),
            });
        }

        let source_name = value.wrapper.to_string();
        let slot = self.allocate_uninitialized_slot(target)?;
        let source = value.wrapper.clone();
        let success = source.convert_to_with_target(self, value, &slot.value, explicit)?;

        if verdict == Convertibility::Always {
            let constant_true = success.as_constant().and_then(Constant::as_bool) == Some(true);
            if self.options().verify_always_conversions && !constant_true {
                return Err(internal(format!(
                    "conversion from '{source_name}' to '{target}' is classified as always \
                     succeeding but its success flag is not constant true"
                )));
            }
            if !success.is_pure() {
                self.push_effect(success);
            }
            self.mark_initialized(&slot);
            return Ok(slot.value);
        }

        let message = format!("Can't convert from type {source_name} to type {target}");
        let flag = self.bool_value(success);
        let flag = self.stabilize(flag)?;
        self.if_else(
            flag.expr,
            |cx| {
                cx.mark_initialized(&slot);
                Ok(())
            },
            |cx| {
                cx.push_exception(ErrorCategory::TypeError, message);
                Ok(())
            },
        )?;
        Ok(slot.value)
    }

    /// Convert `value` to `target` only if that always succeeds; `None`
    /// otherwise, with nothing emitted.
    pub fn try_convert_always(
        &mut self,
        value: TypedExpr,
        target: &Wrapper,
        explicit: bool,
    ) -> CodegenResult<Option<TypedExpr>> {
        if self.can_convert(&value.wrapper, target, explicit) == Convertibility::Always {
            return self.convert_to(value, target, explicit).map(Some);
        }
        Ok(None)
    }
}
