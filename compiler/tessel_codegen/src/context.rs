//! Expression context: the emission surface wrappers generate code through.
//!
//! An [`ExprContext`] builds the body of one native function. Emitted
//! side effects accumulate in the current *frame*; conditionals and loops
//! open nested frames. Non-POD temporaries created in a frame are destroyed
//! when the frame closes, in reverse creation order, so every value a
//! wrapper pushes is released exactly once without the wrapper tracking it.
//!
//! Slots allocated with [`ExprContext::allocate_uninitialized_slot`] carry
//! an initialization flag; they are destroyed only if the flag was set.

mod dispatch;
mod functions;

pub(crate) use functions::define_function;

use tessel_native::{
    Constant, ErrorCategory, NativeBinOp, NativeExpr, NativeType, RuntimeFn, SlotId,
};

use crate::converter::Converter;
use crate::error::{internal, CodegenResult};
use crate::factory::WrapperFactory;
use crate::options::CodegenOptions;
use crate::repr::{NumericType, TypeRepr};
use crate::typed_expr::TypedExpr;
use crate::wrapper::Wrapper;

#[derive(Default)]
struct Frame {
    effects: Vec<NativeExpr>,
    temporaries: Vec<Temporary>,
}

struct Temporary {
    value: TypedExpr,
    /// Set when the temporary may not have been initialized.
    initialized: Option<SlotId>,
}

/// Storage reserved for a value that is initialized later, possibly only
/// on some paths.
#[derive(Clone, Debug)]
pub struct UninitializedSlot {
    pub value: TypedExpr,
    flag: Option<SlotId>,
}

pub struct ExprContext<'cv> {
    converter: &'cv mut Converter,
    slots: Vec<NativeType>,
    current: Frame,
    outer: Vec<Frame>,
}

impl<'cv> ExprContext<'cv> {
    pub(crate) fn new(converter: &'cv mut Converter) -> Self {
        ExprContext {
            converter,
            slots: Vec::new(),
            current: Frame::default(),
            outer: Vec::new(),
        }
    }

    // ── Run state ───────────────────────────────────────────────────

    pub fn converter(&self) -> &Converter {
        &*self.converter
    }

    pub fn options(&self) -> &CodegenOptions {
        self.converter.options()
    }

    pub fn factory(&self) -> &WrapperFactory {
        &self.converter.factory
    }

    pub fn wrapper(&self, repr: &TypeRepr) -> CodegenResult<Wrapper> {
        self.converter.factory.get(repr)
    }

    pub fn numeric(&self, t: NumericType) -> Wrapper {
        self.converter.factory.numeric(t)
    }

    pub fn bool_wrapper(&self) -> Wrapper {
        self.numeric(NumericType::Bool)
    }

    pub fn none_wrapper(&self) -> Wrapper {
        self.converter.factory.none()
    }

    pub fn str_wrapper(&self) -> Wrapper {
        self.converter.factory.string()
    }

    pub fn dynamic_wrapper(&self) -> Wrapper {
        self.converter.factory.dynamic()
    }

    // ── Constants ───────────────────────────────────────────────────

    pub fn constant_bool(&self, value: bool) -> TypedExpr {
        TypedExpr::value(NativeExpr::bool(value), self.bool_wrapper())
    }

    pub fn constant_int(&self, value: i128, t: NumericType) -> TypedExpr {
        TypedExpr::value(
            NativeExpr::Constant(Constant::int(value, &t.native())),
            self.numeric(t),
        )
    }

    pub fn constant_i64(&self, value: i64) -> TypedExpr {
        self.constant_int(i128::from(value), NumericType::Int64)
    }

    pub fn constant_f64(&self, value: f64) -> TypedExpr {
        TypedExpr::value(
            NativeExpr::Constant(Constant::Float { value, bits: 64 }),
            self.numeric(NumericType::Float64),
        )
    }

    pub fn none_value(&self) -> TypedExpr {
        TypedExpr::value(NativeExpr::void(), self.none_wrapper())
    }

    /// A new string holding `text`, owned by the current frame.
    pub fn constant_str(&mut self, text: &str) -> CodegenResult<TypedExpr> {
        let wrapper = self.str_wrapper();
        self.push_move(&wrapper, NativeExpr::StrLiteral(text.to_owned()))
    }

    /// Wrap a native `bool` expression as a source-level bool.
    pub fn bool_value(&self, expr: NativeExpr) -> TypedExpr {
        TypedExpr::value(expr, self.bool_wrapper())
    }

    // ── Slots and temporaries ───────────────────────────────────────

    pub fn push_effect(&mut self, expr: NativeExpr) {
        if matches!(expr, NativeExpr::Constant(_)) {
            return;
        }
        self.current.effects.push(expr);
    }

    pub fn allocate_slot(&mut self, ty: NativeType) -> SlotId {
        let id = SlotId::new(self.slots.len() as u32);
        self.slots.push(ty);
        id
    }

    /// Allocate a temporary of `wrapper` and let `init` initialize it.
    /// Non-POD temporaries are destroyed when the current frame closes.
    pub fn push<F>(&mut self, wrapper: &Wrapper, init: F) -> CodegenResult<TypedExpr>
    where
        F: FnOnce(&mut Self, &TypedExpr) -> CodegenResult<()>,
    {
        let layout = wrapper.native_layout()?;
        let slot = self.allocate_slot(layout);
        let target = TypedExpr::reference(NativeExpr::Slot(slot), wrapper.clone());
        init(self, &target)?;
        if !wrapper.is_pod() {
            self.current.temporaries.push(Temporary {
                value: target.clone(),
                initialized: None,
            });
        }
        Ok(target)
    }

    /// Evaluate a POD `value` now and keep it in a slot.
    pub fn push_pod(&mut self, wrapper: &Wrapper, value: NativeExpr) -> CodegenResult<TypedExpr> {
        let layout = wrapper.native_layout()?;
        if layout.is_void() {
            if !value.is_pure() {
                self.push_effect(value);
            }
            return Ok(TypedExpr::value(NativeExpr::void(), wrapper.clone()));
        }
        if !layout.is_scalar() {
            return Err(internal(format!(
                "can't hold aggregate '{wrapper}' as a value"
            )));
        }
        let slot = self.allocate_slot(layout.clone());
        self.push_effect(NativeExpr::Slot(slot).store(value, layout.clone()));
        Ok(TypedExpr::value(NativeExpr::Slot(slot).load(layout), wrapper.clone()))
    }

    /// Take ownership of a scalar `handle` (a value holding one reference)
    /// in a temporary released when the current frame closes.
    pub fn push_move(&mut self, wrapper: &Wrapper, handle: NativeExpr) -> CodegenResult<TypedExpr> {
        if wrapper.is_pod() {
            let value = self.push_pod(wrapper, handle)?;
            return self.ensure_reference(value);
        }
        let layout = wrapper.native_layout()?;
        let slot = self.allocate_slot(layout.clone());
        self.push_effect(NativeExpr::Slot(slot).store(handle, layout));
        let value = TypedExpr::reference(NativeExpr::Slot(slot), wrapper.clone());
        self.current.temporaries.push(Temporary {
            value: value.clone(),
            initialized: None,
        });
        Ok(value)
    }

    /// Compute `addr` now and refer to the storage behind it.
    pub fn push_reference(&mut self, wrapper: &Wrapper, addr: NativeExpr) -> TypedExpr {
        let slot = self.allocate_slot(NativeType::Pointer);
        self.push_effect(NativeExpr::Slot(slot).store(addr, NativeType::Pointer));
        TypedExpr::reference(
            NativeExpr::Slot(slot).load(NativeType::Pointer),
            wrapper.clone(),
        )
    }

    /// An equivalent expression that can be evaluated any number of times.
    pub fn stabilize(&mut self, value: TypedExpr) -> CodegenResult<TypedExpr> {
        if value.expr.is_pure() {
            return Ok(value);
        }
        let wrapper = value.wrapper.clone();
        if value.is_reference {
            Ok(self.push_reference(&wrapper, value.expr))
        } else if wrapper.is_pod() {
            self.push_pod(&wrapper, value.expr)
        } else {
            self.push_move(&wrapper, value.expr)
        }
    }

    /// An addressable form of `value`.
    pub fn ensure_reference(&mut self, value: TypedExpr) -> CodegenResult<TypedExpr> {
        if value.is_reference {
            return self.stabilize(value);
        }
        let wrapper = value.wrapper.clone();
        if !wrapper.is_pod() {
            return self.push_move(&wrapper, value.expr);
        }
        let layout = wrapper.native_layout()?;
        let slot = self.allocate_slot(layout.clone());
        if !layout.is_void() {
            self.push_effect(NativeExpr::Slot(slot).store(value.expr, layout));
        }
        Ok(TypedExpr::reference(NativeExpr::Slot(slot), wrapper))
    }

    /// The scalar value of `value`. Void layouts yield a void constant.
    pub fn load(&self, value: &TypedExpr) -> CodegenResult<NativeExpr> {
        let layout = value.wrapper.native_layout()?;
        if layout.is_void() {
            return Ok(NativeExpr::void());
        }
        if !value.is_reference {
            return Ok(value.expr.clone());
        }
        if !layout.is_scalar() {
            return Err(internal(format!(
                "can't load aggregate '{}' as a value",
                value.wrapper
            )));
        }
        Ok(value.expr.clone().load(layout))
    }

    /// Bitwise copy of `source` into `target`.
    pub fn store_pod(&mut self, target: &TypedExpr, source: &TypedExpr) -> CodegenResult<()> {
        let layout = target.wrapper.native_layout()?;
        if layout.is_void() {
            return Ok(());
        }
        if layout.is_scalar() {
            let value = self.load(source)?;
            self.push_effect(target.expr.clone().store(value, layout));
            return Ok(());
        }
        let source = self.ensure_reference(source.clone())?;
        self.push_effect(NativeExpr::call_runtime(
            RuntimeFn::MemMove,
            vec![
                target.expr.clone(),
                source.expr,
                NativeExpr::i64(i64::from(layout.size())),
            ],
        ));
        Ok(())
    }

    /// Reserve storage for `wrapper` that is initialized later via
    /// [`mark_initialized`](Self::mark_initialized).
    pub fn allocate_uninitialized_slot(&mut self, wrapper: &Wrapper) -> CodegenResult<UninitializedSlot> {
        let layout = wrapper.native_layout()?;
        let slot = self.allocate_slot(layout);
        let value = TypedExpr::reference(NativeExpr::Slot(slot), wrapper.clone());
        if wrapper.is_pod() {
            return Ok(UninitializedSlot { value, flag: None });
        }
        let flag = self.allocate_slot(NativeType::BOOL);
        self.push_effect(NativeExpr::Slot(flag).store(NativeExpr::bool(false), NativeType::BOOL));
        self.current.temporaries.push(Temporary {
            value: value.clone(),
            initialized: Some(flag),
        });
        Ok(UninitializedSlot {
            value,
            flag: Some(flag),
        })
    }

    pub fn mark_initialized(&mut self, slot: &UninitializedSlot) {
        if let Some(flag) = slot.flag {
            self.push_effect(NativeExpr::Slot(flag).store(NativeExpr::bool(true), NativeType::BOOL));
        }
    }

    // ── Control flow ────────────────────────────────────────────────

    /// Emit a two-armed conditional. A constant condition emits only the
    /// taken arm.
    pub fn if_else<T, E>(&mut self, cond: NativeExpr, then: T, otherwise: E) -> CodegenResult<()>
    where
        T: FnOnce(&mut Self) -> CodegenResult<()>,
        E: FnOnce(&mut Self) -> CodegenResult<()>,
    {
        if let Some(taken) = cond.as_constant().and_then(Constant::as_bool) {
            self.begin_frame();
            if taken {
                then(self)?;
            } else {
                otherwise(self)?;
            }
            let effects = self.end_frame()?;
            if !effects.is_empty() {
                self.push_effect(NativeExpr::Sequence(effects));
            }
            return Ok(());
        }

        self.begin_frame();
        then(self)?;
        let then_effects = self.end_frame()?;
        self.begin_frame();
        otherwise(self)?;
        let else_effects = self.end_frame()?;
        self.push_effect(NativeExpr::Branch {
            cond: Box::new(cond),
            then: Box::new(NativeExpr::Sequence(then_effects)),
            otherwise: Box::new(NativeExpr::Sequence(else_effects)),
        });
        Ok(())
    }

    pub fn if_true<T>(&mut self, cond: NativeExpr, then: T) -> CodegenResult<()>
    where
        T: FnOnce(&mut Self) -> CodegenResult<()>,
    {
        self.if_else(cond, then, |_| Ok(()))
    }

    /// Emit `while cond { body }`. `cond` is re-evaluated every iteration.
    pub fn while_loop<B>(&mut self, cond: NativeExpr, body: B) -> CodegenResult<()>
    where
        B: FnOnce(&mut Self) -> CodegenResult<()>,
    {
        self.begin_frame();
        body(self)?;
        let effects = self.end_frame()?;
        self.push_effect(NativeExpr::While {
            cond: Box::new(cond),
            body: Box::new(NativeExpr::Sequence(effects)),
        });
        Ok(())
    }

    /// Emit `for i in 0..count { body(i) }` with `i` an `i64`.
    pub fn loop_count<B>(&mut self, count: NativeExpr, body: B) -> CodegenResult<()>
    where
        B: FnOnce(&mut Self, NativeExpr) -> CodegenResult<()>,
    {
        let count_slot = self.allocate_slot(NativeType::I64);
        self.push_effect(NativeExpr::Slot(count_slot).store(count, NativeType::I64));
        let index_slot = self.allocate_slot(NativeType::I64);
        self.push_effect(NativeExpr::Slot(index_slot).store(NativeExpr::i64(0), NativeType::I64));
        let index = NativeExpr::Slot(index_slot).load(NativeType::I64);

        self.begin_frame();
        body(self, index.clone())?;
        let mut effects = self.end_frame()?;
        effects.push(NativeExpr::Slot(index_slot).store(
            index.clone().binary(NativeBinOp::Add, NativeExpr::i64(1)),
            NativeType::I64,
        ));
        self.push_effect(NativeExpr::While {
            cond: Box::new(index.binary(
                NativeBinOp::Lt,
                NativeExpr::Slot(count_slot).load(NativeType::I64),
            )),
            body: Box::new(NativeExpr::Sequence(effects)),
        });
        Ok(())
    }

    /// Emit an unconditional runtime error.
    pub fn push_exception(&mut self, category: ErrorCategory, message: impl Into<String>) {
        self.push_effect(NativeExpr::raise(category, message));
    }

    /// Emit a runtime error raised when `cond` holds.
    pub fn raise_if(
        &mut self,
        cond: NativeExpr,
        category: ErrorCategory,
        message: impl Into<String>,
    ) -> CodegenResult<()> {
        let message = message.into();
        self.if_true(cond, move |cx| {
            cx.push_exception(category, message);
            Ok(())
        })
    }

    // ── Frames ──────────────────────────────────────────────────────

    fn begin_frame(&mut self) {
        let enclosing = std::mem::take(&mut self.current);
        self.outer.push(enclosing);
    }

    /// Destroy the frame's temporaries and return its effects.
    fn end_frame(&mut self) -> CodegenResult<Vec<NativeExpr>> {
        loop {
            let temporaries = std::mem::take(&mut self.current.temporaries);
            if temporaries.is_empty() {
                break;
            }
            for temporary in temporaries.into_iter().rev() {
                self.destroy_temporary(temporary)?;
            }
        }
        let enclosing = self.outer.pop().unwrap_or_default();
        let frame = std::mem::replace(&mut self.current, enclosing);
        Ok(frame.effects)
    }

    fn destroy_temporary(&mut self, temporary: Temporary) -> CodegenResult<()> {
        match temporary.initialized {
            Some(flag) => {
                let value = temporary.value;
                self.if_true(NativeExpr::Slot(flag).load(NativeType::BOOL), move |cx| {
                    cx.destroy(&value)
                })
            }
            None => self.destroy(&temporary.value),
        }
    }
}
