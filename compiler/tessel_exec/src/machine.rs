//! Tree-walking evaluator for native modules.

use std::rc::Rc;

use tessel_native::{
    CallTarget, FunctionId, NativeBinOp, NativeExpr, NativeModule, NativeType, NativeUnOp,
};
use tracing::trace;

use crate::error::{fault, raise, ExecError, ExecResult};
use crate::heap::Heap;
use crate::objects::{BuiltinFn, ObjectId, Objects};
use crate::runtime::{call_runtime, new_string, read_string, release_string};
use crate::value::{round_float, wrap, Address, Value};

/// Default limit on nested calls of generated functions.
pub const DEFAULT_DEPTH_LIMIT: usize = 64;

struct Frame {
    args: Vec<Value>,
    slots: Vec<Address>,
}

/// Executes the functions of one [`NativeModule`] against a private heap
/// and object table.
///
/// Values crossing the boundary are [`Value`]s; pointers into the heap and
/// dynamic object handles are both [`Value::Ptr`]. The host helpers build
/// inputs and inspect outputs the way generated code would see them.
pub struct Machine<'m> {
    module: &'m NativeModule,
    heap: Heap,
    objects: Objects,
    depth: usize,
    depth_limit: usize,
}

impl<'m> Machine<'m> {
    pub fn new(module: &'m NativeModule) -> Self {
        Machine {
            module,
            heap: Heap::new(),
            objects: Objects::new(),
            depth: 0,
            depth_limit: DEFAULT_DEPTH_LIMIT,
        }
    }

    #[must_use]
    pub fn with_depth_limit(mut self, limit: usize) -> Self {
        self.depth_limit = limit;
        self
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn objects(&self) -> &Objects {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut Objects {
        &mut self.objects
    }

    /// Dynamic objects still alive, excluding `None`.
    pub fn live_objects(&self) -> usize {
        self.objects.live()
    }

    /// Call the function named `name`.
    pub fn call_by_name(&mut self, name: &str, args: &[Value]) -> ExecResult<Value> {
        let id = self
            .module
            .by_name(name)
            .ok_or_else(|| fault(format!("no function named `{name}`")))?;
        self.call(id, args)
    }

    /// Call a function. Arguments are converted to the parameter types.
    pub fn call(&mut self, id: FunctionId, args: &[Value]) -> ExecResult<Value> {
        let module = self.module;
        let func = module
            .get(id)
            .ok_or_else(|| fault(format!("call to unknown function {}", id.raw())))?;
        if args.len() != func.params.len() {
            return Err(fault(format!(
                "`{}` called with {} arguments, expected {}",
                func.name,
                args.len(),
                func.params.len()
            )));
        }
        if self.depth >= self.depth_limit {
            return Err(ExecError::StackOverflow(self.depth_limit));
        }
        trace!(function = %func.name, depth = self.depth, "call");

        let args = args
            .iter()
            .zip(&func.params)
            .map(|(value, ty)| value.convert(ty))
            .collect();
        let mut frame = Frame {
            args,
            slots: Vec::with_capacity(func.slots.len()),
        };
        let mut result = Ok(Value::Void);
        for ty in &func.slots {
            match self.heap.push_stack(ty.size()) {
                Ok(addr) => frame.slots.push(addr),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        if result.is_ok() {
            self.depth += 1;
            result = self.eval(&frame, &func.body);
            self.depth -= 1;
        }
        for slot in frame.slots {
            self.heap.pop_stack(slot);
        }
        result.map(|value| value.convert(&func.ret))
    }

    fn eval(&mut self, frame: &Frame, expr: &NativeExpr) -> ExecResult<Value> {
        match expr {
            NativeExpr::Constant(constant) => Ok(Value::from_constant(constant)),
            NativeExpr::Slot(slot) => frame
                .slots
                .get(slot.index())
                .map(|addr| Value::Ptr(*addr))
                .ok_or_else(|| fault(format!("slot {} out of range", slot.raw()))),
            NativeExpr::Arg(index) => frame
                .args
                .get(*index as usize)
                .copied()
                .ok_or_else(|| fault(format!("argument {index} out of range"))),
            NativeExpr::Load { addr, ty } => {
                let addr = self.eval_ptr(frame, addr)?;
                self.heap.load(addr, ty)
            }
            NativeExpr::Store { addr, value, ty } => {
                let addr = self.eval_ptr(frame, addr)?;
                let value = self.eval(frame, value)?;
                self.heap.store(addr, value, ty)?;
                Ok(Value::Void)
            }
            NativeExpr::FieldPtr { base, offset } => {
                let base = self.eval_ptr(frame, base)?;
                Ok(Value::Ptr(base.wrapping_add(u64::from(*offset))))
            }
            NativeExpr::ElementPtr {
                base,
                index,
                stride,
            } => {
                let base = self.eval_ptr(frame, base)?;
                let index = self
                    .eval(frame, index)?
                    .as_i128()
                    .ok_or_else(|| fault("element index is not an integer"))?;
                let offset = index.wrapping_mul(i128::from(*stride));
                Ok(Value::Ptr((i128::from(base) + offset) as u64))
            }
            NativeExpr::Cast { value, to } => Ok(self.eval(frame, value)?.convert(to)),
            NativeExpr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(frame, lhs)?;
                let rhs = self.eval(frame, rhs)?;
                binary(*op, lhs, rhs)
            }
            NativeExpr::Unary { op, operand } => {
                let operand = self.eval(frame, operand)?;
                unary(*op, operand)
            }
            NativeExpr::Branch {
                cond,
                then,
                otherwise,
            } => {
                if self.eval_bool(frame, cond)? {
                    self.eval(frame, then)
                } else {
                    self.eval(frame, otherwise)
                }
            }
            NativeExpr::Sequence(items) => {
                let mut last = Value::Void;
                for item in items {
                    last = self.eval(frame, item)?;
                }
                Ok(last)
            }
            NativeExpr::While { cond, body } => {
                while self.eval_bool(frame, cond)? {
                    self.eval(frame, body)?;
                }
                Ok(Value::Void)
            }
            NativeExpr::Call { target, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(frame, arg)?);
                }
                match target {
                    CallTarget::Runtime(func) => {
                        let params = func.params();
                        if params.len() != values.len() {
                            return Err(fault(format!(
                                "{func} called with {} arguments, expected {}",
                                values.len(),
                                params.len()
                            )));
                        }
                        let values: Vec<Value> = values
                            .iter()
                            .zip(&params)
                            .map(|(value, ty)| value.convert(ty))
                            .collect();
                        let result = call_runtime(&mut self.heap, &mut self.objects, *func, &values)?;
                        Ok(result.convert(&func.ret()))
                    }
                    CallTarget::Defined(id) => self.call(*id, &values),
                }
            }
            NativeExpr::Raise { category, message } => Err(raise(*category, message.clone())),
            NativeExpr::StrLiteral(text) => Ok(Value::Ptr(new_string(&mut self.heap, text)?)),
        }
    }

    fn eval_ptr(&mut self, frame: &Frame, expr: &NativeExpr) -> ExecResult<Address> {
        match self.eval(frame, expr)? {
            Value::Ptr(addr) => Ok(addr),
            other => Err(fault(format!("expected a pointer, found {other}"))),
        }
    }

    fn eval_bool(&mut self, frame: &Frame, expr: &NativeExpr) -> ExecResult<bool> {
        let value = self.eval(frame, expr)?;
        value
            .as_bool()
            .ok_or_else(|| fault(format!("expected a condition, found {value}")))
    }

    // ── Host helpers ────────────────────────────────────────────────

    /// A zeroed heap block sized for `ty`.
    pub fn alloc(&mut self, ty: &NativeType) -> ExecResult<Address> {
        self.heap.malloc(i64::from(ty.size()))
    }

    pub fn read(&self, addr: Address, ty: &NativeType) -> ExecResult<Value> {
        self.heap.load(addr, ty)
    }

    pub fn write(&mut self, addr: Address, value: Value, ty: &NativeType) -> ExecResult<()> {
        self.heap.store(addr, value, ty)
    }

    pub fn free(&mut self, addr: Address) -> ExecResult<()> {
        self.heap.free(addr)
    }

    /// A runtime string holding one reference.
    pub fn new_str(&mut self, text: &str) -> ExecResult<Address> {
        new_string(&mut self.heap, text)
    }

    pub fn read_str(&self, addr: Address) -> ExecResult<String> {
        read_string(&self.heap, addr)
    }

    /// Drop one reference of a runtime string.
    pub fn release_str(&mut self, addr: Address) -> ExecResult<()> {
        release_string(&mut self.heap, addr)
    }

    fn resolve_all(&self, handles: &[Address]) -> ExecResult<Vec<ObjectId>> {
        handles.iter().map(|h| self.objects.resolve(*h)).collect()
    }

    pub fn dyn_none(&mut self) -> Address {
        self.objects.none().handle()
    }

    pub fn dyn_int(&mut self, value: i128) -> Address {
        self.objects.int(value).handle()
    }

    pub fn dyn_float(&mut self, value: f64) -> Address {
        self.objects.float(value).handle()
    }

    pub fn dyn_bool(&mut self, value: bool) -> Address {
        self.objects.bool(value).handle()
    }

    pub fn dyn_str(&mut self, value: &str) -> Address {
        self.objects.str(value).handle()
    }

    /// A list taking over one reference of each item.
    pub fn dyn_list(&mut self, items: &[Address]) -> ExecResult<Address> {
        let items = self.resolve_all(items)?;
        Ok(self.objects.list(items).handle())
    }

    /// A tuple taking over one reference of each item.
    pub fn dyn_tuple(&mut self, items: &[Address]) -> ExecResult<Address> {
        let items = self.resolve_all(items)?;
        Ok(self.objects.tuple(items).handle())
    }

    /// An iterator taking over one reference of each item.
    pub fn dyn_iter(&mut self, items: &[Address]) -> ExecResult<Address> {
        let items = self.resolve_all(items)?;
        Ok(self.objects.iterator(items).handle())
    }

    /// An instance of `class`; attribute values are borrowed.
    pub fn dyn_instance(&mut self, class: &str, attrs: &[(&str, Address)]) -> ExecResult<Address> {
        let id = self.objects.instance(class);
        for (name, value) in attrs {
            let value = self.objects.resolve(*value)?;
            self.objects.set_attr(id, name, value)?;
        }
        Ok(id.handle())
    }

    pub fn dyn_builtin(
        &mut self,
        name: &str,
        func: impl Fn(&mut Objects, &[ObjectId]) -> ExecResult<ObjectId> + 'static,
    ) -> Address {
        let func: Rc<BuiltinFn> = Rc::new(func);
        self.objects.builtin(name, func).handle()
    }

    /// The `repr` of a dynamic object.
    pub fn describe(&self, handle: Address) -> ExecResult<String> {
        let id = self.objects.resolve(handle)?;
        self.objects.to_repr(id)
    }

    /// Drop one reference of a dynamic object.
    pub fn dyn_release(&mut self, handle: Address) -> ExecResult<()> {
        let id = self.objects.resolve(handle)?;
        self.objects.decref(id)
    }
}

fn binary(op: NativeBinOp, lhs: Value, rhs: Value) -> ExecResult<Value> {
    match (lhs, rhs) {
        (
            Value::Int {
                value: a,
                bits,
                signed,
            },
            Value::Int { value: b, .. },
        ) => {
            if op.is_comparison() {
                return Ok(Value::bool(compare(op, a.cmp(&b))));
            }
            let result = match op {
                NativeBinOp::Add => a.wrapping_add(b),
                NativeBinOp::Sub => a.wrapping_sub(b),
                NativeBinOp::Mul => a.wrapping_mul(b),
                NativeBinOp::Div | NativeBinOp::Rem if b == 0 => {
                    return Err(fault("integer division by zero"));
                }
                NativeBinOp::Div => a.wrapping_div(b),
                NativeBinOp::Rem => a.wrapping_rem(b),
                NativeBinOp::And => a & b,
                NativeBinOp::Or => a | b,
                _ => a ^ b,
            };
            Ok(Value::Int {
                value: wrap(result, bits, signed),
                bits,
                signed,
            })
        }
        (Value::Float { value: a, bits }, Value::Float { value: b, .. }) => {
            if op.is_comparison() {
                return Ok(Value::bool(match a.partial_cmp(&b) {
                    Some(ordering) => compare(op, ordering),
                    None => op == NativeBinOp::Ne,
                }));
            }
            let result = match op {
                NativeBinOp::Add => a + b,
                NativeBinOp::Sub => a - b,
                NativeBinOp::Mul => a * b,
                NativeBinOp::Div => a / b,
                NativeBinOp::Rem => a % b,
                _ => return Err(fault(format!("bitwise {op:?} on floats"))),
            };
            Ok(Value::Float {
                value: round_float(result, bits),
                bits,
            })
        }
        (Value::Ptr(a), Value::Ptr(b)) => match op {
            NativeBinOp::Eq => Ok(Value::bool(a == b)),
            NativeBinOp::Ne => Ok(Value::bool(a != b)),
            _ => Err(fault(format!("{op:?} on pointers"))),
        },
        (lhs, rhs) => Err(fault(format!("{op:?} on mismatched operands {lhs} and {rhs}"))),
    }
}

fn compare(op: NativeBinOp, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering;
    match op {
        NativeBinOp::Eq => ordering == Ordering::Equal,
        NativeBinOp::Ne => ordering != Ordering::Equal,
        NativeBinOp::Lt => ordering == Ordering::Less,
        NativeBinOp::Le => ordering != Ordering::Greater,
        NativeBinOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    }
}

fn unary(op: NativeUnOp, operand: Value) -> ExecResult<Value> {
    match (op, operand) {
        (NativeUnOp::Not, Value::Int { value, bits: 1, .. }) => Ok(Value::bool(value == 0)),
        (NativeUnOp::Not, Value::Int { value, bits, signed }) => Ok(Value::Int {
            value: wrap(!value, bits, signed),
            bits,
            signed,
        }),
        (NativeUnOp::Neg, Value::Int { value, bits, signed }) => Ok(Value::Int {
            value: wrap(value.wrapping_neg(), bits, signed),
            bits,
            signed,
        }),
        (NativeUnOp::Neg, Value::Float { value, bits }) => Ok(Value::Float { value: -value, bits }),
        (op, operand) => Err(fault(format!("{op:?} on {operand}"))),
    }
}
