//! The runtime library: one host implementation per [`RuntimeFn`].

use tessel_native::{BinaryOperator, ErrorCategory, NativeType, RuntimeFn, UnaryOperator, STRING_DATA_OFFSET};

use crate::error::{fault, raise, ExecResult};
use crate::format::{format_bool, format_f32, format_f64};
use crate::hash::{hash_bytes, hash_f64, hash_i64, hash_u64};
use crate::heap::Heap;
use crate::objects::{float_mod, ObjectId, Objects};
use crate::value::{Address, Value};

const REFCOUNT_OFFSET: u64 = 0;
const HASH_OFFSET: u64 = 8;
const LENGTH_OFFSET: u64 = 16;

/// A new runtime string holding one reference.
pub(crate) fn new_string(heap: &mut Heap, text: &str) -> ExecResult<Address> {
    let bytes = text.as_bytes();
    let addr = heap.malloc(i64::from(STRING_DATA_OFFSET) + bytes.len() as i64)?;
    heap.store(addr + REFCOUNT_OFFSET, Value::i64(1), &NativeType::I64)?;
    heap.store(addr + HASH_OFFSET, Value::i32(-1), &NativeType::I32)?;
    heap.store(addr + LENGTH_OFFSET, Value::i64(bytes.len() as i64), &NativeType::I64)?;
    heap.write_bytes(addr + u64::from(STRING_DATA_OFFSET), bytes)?;
    Ok(addr)
}

pub(crate) fn read_string(heap: &Heap, addr: Address) -> ExecResult<String> {
    if addr == 0 {
        return Err(fault("null string"));
    }
    let len = heap
        .load(addr + LENGTH_OFFSET, &NativeType::I64)?
        .as_i64()
        .and_then(|len| usize::try_from(len).ok())
        .ok_or_else(|| fault(format!("corrupt string length at {addr:#x}")))?;
    let bytes = heap.read_bytes(addr + u64::from(STRING_DATA_OFFSET), len)?;
    String::from_utf8(bytes).map_err(|_| fault(format!("string at {addr:#x} is not UTF-8")))
}

/// Drop one reference of a runtime string; free it at zero.
pub(crate) fn release_string(heap: &mut Heap, addr: Address) -> ExecResult<()> {
    let count = heap
        .load(addr + REFCOUNT_OFFSET, &NativeType::I64)?
        .as_i64()
        .unwrap_or(0)
        - 1;
    if count <= 0 {
        heap.free(addr)
    } else {
        heap.store(addr + REFCOUNT_OFFSET, Value::i64(count), &NativeType::I64)
    }
}

fn string_hash(heap: &mut Heap, addr: Address) -> ExecResult<i32> {
    let cached = heap.load(addr + HASH_OFFSET, &NativeType::I32)?.as_i64().unwrap_or(-1);
    if cached != -1 {
        return Ok(cached as i32);
    }
    let hash = hash_bytes(read_string(heap, addr)?.as_bytes());
    heap.store(addr + HASH_OFFSET, Value::i32(hash), &NativeType::I32)?;
    Ok(hash)
}

struct Args<'a> {
    func: RuntimeFn,
    values: &'a [Value],
}

impl Args<'_> {
    fn get(&self, index: usize) -> ExecResult<Value> {
        self.values.get(index).copied().ok_or_else(|| {
            fault(format!("{} called with {} arguments", self.func, self.values.len()))
        })
    }

    fn mismatch(&self, index: usize, expected: &str) -> crate::error::ExecError {
        fault(format!("{} argument {index} is not {expected}", self.func))
    }

    fn int(&self, index: usize) -> ExecResult<i128> {
        self.get(index)?.as_i128().ok_or_else(|| self.mismatch(index, "an integer"))
    }

    fn i64(&self, index: usize) -> ExecResult<i64> {
        self.get(index)?.as_i64().ok_or_else(|| self.mismatch(index, "an i64"))
    }

    fn float(&self, index: usize) -> ExecResult<f64> {
        self.get(index)?.as_f64().ok_or_else(|| self.mismatch(index, "a float"))
    }

    fn ptr(&self, index: usize) -> ExecResult<Address> {
        self.get(index)?.as_ptr().ok_or_else(|| self.mismatch(index, "a pointer"))
    }
}

/// Execute the runtime routine `func`.
pub(crate) fn call_runtime(
    heap: &mut Heap,
    objects: &mut Objects,
    func: RuntimeFn,
    values: &[Value],
) -> ExecResult<Value> {
    let args = Args { func, values };
    let object = |objects: &Objects, index: usize| -> ExecResult<ObjectId> {
        objects.resolve(args.ptr(index)?)
    };
    let handle = |id: ObjectId| Value::Ptr(id.handle());

    Ok(match func {
        // ── Memory ──────────────────────────────────────────────────
        RuntimeFn::Malloc => Value::Ptr(heap.malloc(args.i64(0)?)?),
        RuntimeFn::Realloc => Value::Ptr(heap.realloc(args.ptr(0)?, args.i64(1)?)?),
        RuntimeFn::Free => {
            heap.free(args.ptr(0)?)?;
            Value::Void
        }
        RuntimeFn::MemMove => {
            heap.mem_move(args.ptr(0)?, args.ptr(1)?, args.i64(2)?)?;
            Value::Void
        }

        // ── Number formatting ───────────────────────────────────────
        RuntimeFn::Int64ToString => Value::Ptr(new_string(heap, &args.i64(0)?.to_string())?),
        RuntimeFn::UInt64ToString => {
            let value = u64::try_from(args.int(0)?).unwrap_or_default();
            Value::Ptr(new_string(heap, &value.to_string())?)
        }
        RuntimeFn::Float32ToString => {
            Value::Ptr(new_string(heap, &format_f32(args.float(0)? as f32))?)
        }
        RuntimeFn::Float64ToString => Value::Ptr(new_string(heap, &format_f64(args.float(0)?))?),
        RuntimeFn::BoolToString => {
            Value::Ptr(new_string(heap, format_bool(args.int(0)? != 0))?)
        }

        // ── Math ────────────────────────────────────────────────────
        RuntimeFn::ModFloat64 => Value::f64(float_mod(args.float(0)?, args.float(1)?)),
        RuntimeFn::FloorDivFloat64 => Value::f64((args.float(0)? / args.float(1)?).floor()),
        RuntimeFn::PowInt64 => {
            let (base, exp) = (args.i64(0)?, args.i64(1)?);
            Value::f64(pow(base as f64, exp as f64, i32::try_from(exp).ok()))
        }
        RuntimeFn::PowUInt64 => {
            let (base, exp) = (args.int(0)?, args.int(1)?);
            Value::f64(pow(base as f64, exp as f64, i32::try_from(exp).ok()))
        }
        RuntimeFn::PowFloat64 => Value::f64(args.float(0)?.powf(args.float(1)?)),
        RuntimeFn::LShiftInt64 | RuntimeFn::RShiftInt64 => {
            let (value, count) = (args.i64(0)?, shift_count(args.i64(1)?)?);
            let left = func == RuntimeFn::LShiftInt64;
            Value::i64(match (left, count) {
                (true, Some(count)) => value.wrapping_shl(count),
                (true, None) => 0,
                (false, Some(count)) => value >> count,
                (false, None) => value >> 63,
            })
        }
        RuntimeFn::LShiftUInt64 | RuntimeFn::RShiftUInt64 => {
            let value = u64::try_from(args.int(0)?).unwrap_or_default();
            let count = i64::try_from(args.int(1)?).unwrap_or(i64::MAX);
            let shifted = match shift_count(count)? {
                Some(count) if func == RuntimeFn::LShiftUInt64 => value.wrapping_shl(count),
                Some(count) => value >> count,
                None => 0,
            };
            Value::u64(shifted)
        }
        RuntimeFn::RoundFloat64 => Value::f64(args.float(0)?.round_ties_even()),
        RuntimeFn::TruncFloat64 => Value::f64(args.float(0)?.trunc()),
        RuntimeFn::FloorFloat64 => Value::f64(args.float(0)?.floor()),
        RuntimeFn::CeilFloat64 => Value::f64(args.float(0)?.ceil()),
        RuntimeFn::HashInt64 => Value::i32(hash_i64(args.i64(0)?)),
        RuntimeFn::HashUInt64 => Value::i32(hash_u64(u64::try_from(args.int(0)?).unwrap_or_default())),
        RuntimeFn::HashFloat32 | RuntimeFn::HashFloat64 => Value::i32(hash_f64(args.float(0)?)),

        // ── Strings ─────────────────────────────────────────────────
        RuntimeFn::StrConcat => {
            let joined = read_string(heap, args.ptr(0)?)? + &read_string(heap, args.ptr(1)?)?;
            Value::Ptr(new_string(heap, &joined)?)
        }
        RuntimeFn::StrEq => {
            let (a, b) = (args.ptr(0)?, args.ptr(1)?);
            Value::bool(a == b || read_string(heap, a)? == read_string(heap, b)?)
        }
        RuntimeFn::StrHash => Value::i32(string_hash(heap, args.ptr(0)?)?),

        // ── Dynamic objects ─────────────────────────────────────────
        RuntimeFn::DynIncref => {
            let id = object(objects, 0)?;
            objects.incref(id);
            Value::Void
        }
        RuntimeFn::DynDecref => {
            let id = object(objects, 0)?;
            objects.decref(id)?;
            Value::Void
        }
        RuntimeFn::DynNone => handle(objects.none()),
        RuntimeFn::DynFromInt64 => handle(objects.int(i128::from(args.i64(0)?))),
        RuntimeFn::DynFromUInt64 => handle(objects.int(args.int(0)?)),
        RuntimeFn::DynFromFloat64 => handle(objects.float(args.float(0)?)),
        RuntimeFn::DynFromBool => handle(objects.bool(args.int(0)? != 0)),
        RuntimeFn::DynFromStr => {
            let text = read_string(heap, args.ptr(0)?)?;
            handle(objects.str(text))
        }
        RuntimeFn::DynToInt64 => {
            let id = object(objects, 0)?;
            let (converted, out) = (objects.as_int(id)?, args.ptr(1)?);
            if let Some(value) = converted {
                heap.store(out, Value::i64(value), &NativeType::I64)?;
            }
            Value::bool(converted.is_some())
        }
        RuntimeFn::DynToFloat64 => {
            let id = object(objects, 0)?;
            let (converted, out) = (objects.as_float(id)?, args.ptr(1)?);
            if let Some(value) = converted {
                heap.store(out, Value::f64(value), &NativeType::F64)?;
            }
            Value::bool(converted.is_some())
        }
        RuntimeFn::DynToBool => {
            let id = object(objects, 0)?;
            let (converted, out) = (objects.as_bool(id)?, args.ptr(1)?);
            if let Some(value) = converted {
                heap.store(out, Value::bool(value), &NativeType::BOOL)?;
            }
            Value::bool(converted.is_some())
        }
        RuntimeFn::DynToStr => {
            let id = object(objects, 0)?;
            let (converted, out) = (objects.as_string(id)?, args.ptr(1)?);
            if let Some(text) = &converted {
                let string = new_string(heap, text)?;
                heap.store(out, Value::Ptr(string), &NativeType::Pointer)?;
            }
            Value::bool(converted.is_some())
        }
        RuntimeFn::DynTupleNew => handle(objects.new_tuple(args.i64(0)?)?),
        RuntimeFn::DynTupleSet => {
            let (tuple, value) = (object(objects, 0)?, object(objects, 2)?);
            objects.tuple_set(tuple, args.i64(1)?, value)?;
            Value::Void
        }
        RuntimeFn::DynNewInstance => {
            let class = read_string(heap, args.ptr(0)?)?;
            handle(objects.instance(class))
        }
        RuntimeFn::DynGetAttr => {
            let (id, name) = (object(objects, 0)?, read_string(heap, args.ptr(1)?)?);
            handle(objects.get_attr(id, &name)?)
        }
        RuntimeFn::DynSetAttr => {
            let (id, name) = (object(objects, 0)?, read_string(heap, args.ptr(1)?)?);
            let value = object(objects, 2)?;
            objects.set_attr(id, &name, value)?;
            Value::Void
        }
        RuntimeFn::DynGetItem => {
            let (id, key) = (object(objects, 0)?, object(objects, 1)?);
            handle(objects.get_item(id, key)?)
        }
        RuntimeFn::DynSetItem => {
            let (id, key, value) = (object(objects, 0)?, object(objects, 1)?, object(objects, 2)?);
            objects.set_item(id, key, value)?;
            Value::Void
        }
        RuntimeFn::DynDelItem => {
            let (id, key) = (object(objects, 0)?, object(objects, 1)?);
            objects.del_item(id, key)?;
            Value::Void
        }
        RuntimeFn::DynCall => {
            let (callee, call_args) = (object(objects, 0)?, object(objects, 1)?);
            handle(objects.call(callee, call_args)?)
        }
        RuntimeFn::DynLen => Value::i64(objects.len(object(objects, 0)?)?),
        RuntimeFn::DynHash => Value::i32(objects.hash(object(objects, 0)?)?),
        RuntimeFn::DynTruthy => Value::bool(objects.truthy(object(objects, 0)?)?),
        RuntimeFn::DynStr => {
            let text = objects.to_str(object(objects, 0)?)?;
            Value::Ptr(new_string(heap, &text)?)
        }
        RuntimeFn::DynRepr => {
            let text = objects.to_repr(object(objects, 0)?)?;
            Value::Ptr(new_string(heap, &text)?)
        }
        RuntimeFn::DynDir => handle(objects.dir(object(objects, 0)?)?),
        RuntimeFn::DynBinOp => {
            let code = args.i64(0)?;
            let op = BinaryOperator::from_code(code)
                .ok_or_else(|| fault(format!("unknown binary operator code {code}")))?;
            let (a, b) = (object(objects, 1)?, object(objects, 2)?);
            handle(objects.bin_op(op, a, b)?)
        }
        RuntimeFn::DynUnOp => {
            let code = args.i64(0)?;
            let op = UnaryOperator::from_code(code)
                .ok_or_else(|| fault(format!("unknown unary operator code {code}")))?;
            handle(objects.unary_op(op, object(objects, 1)?)?)
        }
        RuntimeFn::DynNext => {
            let (id, out) = (object(objects, 0)?, args.ptr(1)?);
            match objects.next(id)? {
                Some(item) => {
                    heap.store(out, handle(item), &NativeType::Pointer)?;
                    Value::bool(true)
                }
                None => Value::bool(false),
            }
        }
        RuntimeFn::DynEnter => handle(objects.enter(object(objects, 0)?)?),
        RuntimeFn::DynExit => {
            objects.exit(object(objects, 0)?)?;
            Value::Void
        }
    })
}

/// `base ** exp`; small integral exponents multiply exactly.
fn pow(base: f64, exp: f64, small: Option<i32>) -> f64 {
    match small {
        Some(exp) => base.powi(exp),
        None => base.powf(exp),
    }
}

/// Shift counts of 64 or more shift everything out.
fn shift_count(count: i64) -> ExecResult<Option<u32>> {
    if count < 0 {
        return Err(raise(ErrorCategory::ValueError, "negative shift count"));
    }
    Ok(u32::try_from(count).ok().filter(|count| *count < 64))
}
