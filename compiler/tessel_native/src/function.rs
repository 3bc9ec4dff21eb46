//! Native functions and the module that owns them.

use rustc_hash::FxHashMap;

use crate::expr::{CallTarget, FunctionId, NativeExpr};
use crate::types::NativeType;

/// A generated function.
///
/// Arguments are read with [`NativeExpr::Arg`]; stack slots are allocated
/// fresh (zeroed) on every call and addressed with [`NativeExpr::Slot`].
/// The value of `body` is the return value.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct NativeFunction {
    pub name: String,
    pub params: Vec<NativeType>,
    pub ret: NativeType,
    pub slots: Vec<NativeType>,
    pub body: NativeExpr,
}

impl NativeFunction {
    /// A declared function whose body is not generated yet.
    pub fn declared(name: String, params: Vec<NativeType>, ret: NativeType) -> Self {
        NativeFunction {
            name,
            params,
            ret,
            slots: Vec::new(),
            body: NativeExpr::void(),
        }
    }
}

/// Structural problem found by [`NativeModule::verify`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("`{function}`: argument {index} out of range")]
    ArgOutOfRange { function: String, index: u32 },
    #[error("`{function}`: slot {index} out of range")]
    SlotOutOfRange { function: String, index: u32 },
    #[error("`{function}`: call to unknown function {callee}")]
    UnknownCallee { function: String, callee: u32 },
    #[error("`{function}`: call to `{callee}` with {found} arguments, expected {expected}")]
    ArityMismatch {
        function: String,
        callee: String,
        expected: usize,
        found: usize,
    },
}

/// All functions generated during one compilation run.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct NativeModule {
    functions: Vec<NativeFunction>,
    by_name: FxHashMap<String, FunctionId>,
}

impl NativeModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an id for a function whose body will be supplied later via
    /// [`define`](Self::define). Calls to the id may be emitted meanwhile.
    pub fn declare(&mut self, name: String, params: Vec<NativeType>, ret: NativeType) -> FunctionId {
        let id = FunctionId::new(self.functions.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.functions
            .push(NativeFunction::declared(name, params, ret));
        id
    }

    /// Install the finished body of a declared function.
    pub fn define(&mut self, id: FunctionId, slots: Vec<NativeType>, body: NativeExpr) {
        if let Some(function) = self.functions.get_mut(id.index()) {
            function.slots = slots;
            function.body = body;
        }
    }

    pub fn get(&self, id: FunctionId) -> Option<&NativeFunction> {
        self.functions.get(id.index())
    }

    pub fn by_name(&self, name: &str) -> Option<FunctionId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Drop every function with an id at or above `len`.
    pub fn truncate(&mut self, len: usize) {
        for dropped in self.functions.drain(len.min(self.functions.len())..) {
            self.by_name.remove(&dropped.name);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (FunctionId, &NativeFunction)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FunctionId::new(i as u32), f))
    }

    /// Check argument, slot and call references of every function.
    pub fn verify(&self) -> Result<(), VerifyError> {
        for function in &self.functions {
            self.verify_expr(function, &function.body)?;
        }
        Ok(())
    }

    fn verify_expr(&self, function: &NativeFunction, expr: &NativeExpr) -> Result<(), VerifyError> {
        match expr {
            NativeExpr::Constant(_) | NativeExpr::Raise { .. } | NativeExpr::StrLiteral(_) => {
                Ok(())
            }
            NativeExpr::Arg(index) => {
                if (*index as usize) < function.params.len() {
                    Ok(())
                } else {
                    Err(VerifyError::ArgOutOfRange {
                        function: function.name.clone(),
                        index: *index,
                    })
                }
            }
            NativeExpr::Slot(slot) => {
                if slot.index() < function.slots.len() {
                    Ok(())
                } else {
                    Err(VerifyError::SlotOutOfRange {
                        function: function.name.clone(),
                        index: slot.raw(),
                    })
                }
            }
            NativeExpr::Load { addr, .. } => self.verify_expr(function, addr),
            NativeExpr::FieldPtr { base, .. } => self.verify_expr(function, base),
            NativeExpr::Cast { value, .. } => self.verify_expr(function, value),
            NativeExpr::Unary { operand, .. } => self.verify_expr(function, operand),
            NativeExpr::Store { addr, value, .. } => {
                self.verify_expr(function, addr)?;
                self.verify_expr(function, value)
            }
            NativeExpr::ElementPtr { base, index, .. } => {
                self.verify_expr(function, base)?;
                self.verify_expr(function, index)
            }
            NativeExpr::Binary { lhs, rhs, .. } => {
                self.verify_expr(function, lhs)?;
                self.verify_expr(function, rhs)
            }
            NativeExpr::While { cond, body } => {
                self.verify_expr(function, cond)?;
                self.verify_expr(function, body)
            }
            NativeExpr::Branch {
                cond,
                then,
                otherwise,
            } => {
                self.verify_expr(function, cond)?;
                self.verify_expr(function, then)?;
                self.verify_expr(function, otherwise)
            }
            NativeExpr::Sequence(items) => items
                .iter()
                .try_for_each(|item| self.verify_expr(function, item)),
            NativeExpr::Call { target, args } => {
                let expected = match target {
                    CallTarget::Runtime(func) => func.params().len(),
                    CallTarget::Defined(callee) => {
                        let Some(callee_fn) = self.get(*callee) else {
                            return Err(VerifyError::UnknownCallee {
                                function: function.name.clone(),
                                callee: callee.raw(),
                            });
                        };
                        callee_fn.params.len()
                    }
                };
                if expected != args.len() {
                    let callee = match target {
                        CallTarget::Runtime(func) => func.name().to_owned(),
                        CallTarget::Defined(callee) => self
                            .get(*callee)
                            .map(|f| f.name.clone())
                            .unwrap_or_default(),
                    };
                    return Err(VerifyError::ArityMismatch {
                        function: function.name.clone(),
                        callee,
                        expected,
                        found: args.len(),
                    });
                }
                args.iter()
                    .try_for_each(|arg| self.verify_expr(function, arg))
            }
        }
    }
}
