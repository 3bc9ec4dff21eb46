//! The dynamic object runtime.
//!
//! A deliberately small object model: `None`, bools, integers, floats,
//! strings, tuples, lists, instances with attributes, iterators and host
//! builtins. Objects are refcounted; every handle returned to generated
//! code holds one reference, every handle passed in is borrowed.
//!
//! Handles are machine addresses whose block id has the high bit set, so
//! they never collide with heap pointers.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tessel_native::{BinaryOperator, ErrorCategory, UnaryOperator};

use crate::error::{fault, raise, ExecResult};
use crate::format::{format_bool, format_f64, quote};
use crate::hash::{combine, hash_bytes, hash_f64, hash_i64};
use crate::heap::{address, block_of, offset_of, MAX_BLOCK_ID};
use crate::value::Address;

/// Object id within the table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    /// The machine address generated code sees for this object.
    pub fn handle(self) -> Address {
        address(self.0 | (MAX_BLOCK_ID + 1), 0)
    }
}

/// A host function callable from generated code through `DynCall`.
///
/// Arguments are borrowed; the result must hold one reference.
pub type BuiltinFn = dyn Fn(&mut Objects, &[ObjectId]) -> ExecResult<ObjectId>;

#[derive(Clone)]
pub enum Object {
    None,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
    Tuple(Vec<ObjectId>),
    List(Vec<ObjectId>),
    Instance {
        class: String,
        attrs: BTreeMap<String, ObjectId>,
    },
    Iterator {
        items: Vec<ObjectId>,
        position: usize,
    },
    Builtin {
        name: String,
        func: Rc<BuiltinFn>,
    },
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::None => write!(f, "None"),
            Object::Bool(b) => write!(f, "Bool({b})"),
            Object::Int(i) => write!(f, "Int({i})"),
            Object::Float(x) => write!(f, "Float({x})"),
            Object::Str(s) => write!(f, "Str({s:?})"),
            Object::Tuple(items) => write!(f, "Tuple({items:?})"),
            Object::List(items) => write!(f, "List({items:?})"),
            Object::Instance { class, attrs } => write!(f, "Instance({class}, {attrs:?})"),
            Object::Iterator { items, position } => write!(f, "Iterator({items:?} @ {position})"),
            Object::Builtin { name, .. } => write!(f, "Builtin({name})"),
        }
    }
}

impl Object {
    fn children(&self) -> Vec<ObjectId> {
        match self {
            Object::Tuple(items) | Object::List(items) | Object::Iterator { items, .. } => {
                items.clone()
            }
            Object::Instance { attrs, .. } => attrs.values().copied().collect(),
            _ => Vec::new(),
        }
    }
}

struct Entry {
    refcount: i64,
    object: Object,
}

/// Numeric view of an object for arithmetic.
#[derive(Copy, Clone)]
enum Number {
    Int(i128),
    Float(f64),
}

pub struct Objects {
    entries: FxHashMap<u32, Entry>,
    next_id: u32,
    none: ObjectId,
}

impl Default for Objects {
    fn default() -> Self {
        Self::new()
    }
}

impl Objects {
    pub fn new() -> Self {
        let mut objects = Objects {
            entries: FxHashMap::default(),
            next_id: 0,
            none: ObjectId(0),
        };
        objects.none = objects.alloc(Object::None);
        objects
    }

    /// Number of live objects, not counting the `None` singleton.
    pub fn live(&self) -> usize {
        self.entries.len() - 1
    }

    /// A new object holding one reference.
    pub fn alloc(&mut self, object: Object) -> ObjectId {
        self.next_id += 1;
        let id = ObjectId(self.next_id);
        self.entries.insert(
            id.0,
            Entry {
                refcount: 1,
                object,
            },
        );
        id
    }

    /// `None`, with a new reference.
    pub fn none(&mut self) -> ObjectId {
        self.incref(self.none);
        self.none
    }

    pub fn int(&mut self, value: i128) -> ObjectId {
        self.alloc(Object::Int(value))
    }

    pub fn float(&mut self, value: f64) -> ObjectId {
        self.alloc(Object::Float(value))
    }

    pub fn bool(&mut self, value: bool) -> ObjectId {
        self.alloc(Object::Bool(value))
    }

    pub fn str(&mut self, value: impl Into<String>) -> ObjectId {
        self.alloc(Object::Str(value.into()))
    }

    /// A tuple taking over one reference of each item.
    pub fn tuple(&mut self, items: Vec<ObjectId>) -> ObjectId {
        self.alloc(Object::Tuple(items))
    }

    /// A list taking over one reference of each item.
    pub fn list(&mut self, items: Vec<ObjectId>) -> ObjectId {
        self.alloc(Object::List(items))
    }

    pub fn instance(&mut self, class: impl Into<String>) -> ObjectId {
        self.alloc(Object::Instance {
            class: class.into(),
            attrs: BTreeMap::new(),
        })
    }

    /// An iterator taking over one reference of each item.
    pub fn iterator(&mut self, items: Vec<ObjectId>) -> ObjectId {
        self.alloc(Object::Iterator { items, position: 0 })
    }

    pub fn builtin(&mut self, name: impl Into<String>, func: Rc<BuiltinFn>) -> ObjectId {
        self.alloc(Object::Builtin {
            name: name.into(),
            func,
        })
    }

    /// The object behind a handle passed in by generated code.
    pub fn resolve(&self, handle: Address) -> ExecResult<ObjectId> {
        let block = block_of(handle);
        if block <= MAX_BLOCK_ID || offset_of(handle) != 0 {
            return Err(fault(format!("{handle:#x} is not a dynamic object")));
        }
        let id = block & MAX_BLOCK_ID;
        if !self.entries.contains_key(&id) {
            return Err(fault(format!("use of released dynamic object {handle:#x}")));
        }
        Ok(ObjectId(id))
    }

    pub fn get(&self, id: ObjectId) -> ExecResult<&Object> {
        self.entries
            .get(&id.0)
            .map(|entry| &entry.object)
            .ok_or_else(|| fault(format!("use of released dynamic object #{}", id.0)))
    }

    fn get_mut(&mut self, id: ObjectId) -> ExecResult<&mut Object> {
        self.entries
            .get_mut(&id.0)
            .map(|entry| &mut entry.object)
            .ok_or_else(|| fault(format!("use of released dynamic object #{}", id.0)))
    }

    pub fn refcount(&self, id: ObjectId) -> Option<i64> {
        self.entries.get(&id.0).map(|entry| entry.refcount)
    }

    pub fn incref(&mut self, id: ObjectId) {
        if let Some(entry) = self.entries.get_mut(&id.0) {
            entry.refcount += 1;
        }
    }

    /// Drop one reference; release the object and its children at zero.
    pub fn decref(&mut self, id: ObjectId) -> ExecResult<()> {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let Some(entry) = self.entries.get_mut(&id.0) else {
                return Err(fault(format!("decref of released dynamic object #{}", id.0)));
            };
            entry.refcount -= 1;
            if entry.refcount > 0 || id == self.none {
                continue;
            }
            if let Some(entry) = self.entries.remove(&id.0) {
                pending.extend(entry.object.children());
            }
        }
        Ok(())
    }

    // ── Introspection ───────────────────────────────────────────────

    pub fn type_name(&self, id: ObjectId) -> ExecResult<String> {
        Ok(match self.get(id)? {
            Object::None => "NoneType".to_owned(),
            Object::Bool(_) => "bool".to_owned(),
            Object::Int(_) => "int".to_owned(),
            Object::Float(_) => "float".to_owned(),
            Object::Str(_) => "str".to_owned(),
            Object::Tuple(_) => "tuple".to_owned(),
            Object::List(_) => "list".to_owned(),
            Object::Instance { class, .. } => class.clone(),
            Object::Iterator { .. } => "iterator".to_owned(),
            Object::Builtin { .. } => "builtin_function_or_method".to_owned(),
        })
    }

    pub fn truthy(&self, id: ObjectId) -> ExecResult<bool> {
        Ok(match self.get(id)? {
            Object::None => false,
            Object::Bool(b) => *b,
            Object::Int(i) => *i != 0,
            Object::Float(x) => *x != 0.0,
            Object::Str(s) => !s.is_empty(),
            Object::Tuple(items) | Object::List(items) => !items.is_empty(),
            Object::Instance { .. } | Object::Iterator { .. } | Object::Builtin { .. } => true,
        })
    }

    pub fn to_str(&self, id: ObjectId) -> ExecResult<String> {
        match self.get(id)? {
            Object::Str(s) => Ok(s.clone()),
            _ => self.to_repr(id),
        }
    }

    pub fn to_repr(&self, id: ObjectId) -> ExecResult<String> {
        Ok(match self.get(id)? {
            Object::None => "None".to_owned(),
            Object::Bool(b) => format_bool(*b).to_owned(),
            Object::Int(i) => i.to_string(),
            Object::Float(x) => format_f64(*x),
            Object::Str(s) => quote(s),
            Object::Tuple(items) => {
                let parts = self.reprs(items)?;
                if parts.len() == 1 {
                    format!("({},)", parts[0])
                } else {
                    format!("({})", parts.join(", "))
                }
            }
            Object::List(items) => format!("[{}]", self.reprs(items)?.join(", ")),
            Object::Instance { class, .. } => format!("<{class} object>"),
            Object::Iterator { .. } => "<iterator>".to_owned(),
            Object::Builtin { name, .. } => format!("<built-in function {name}>"),
        })
    }

    fn reprs(&self, items: &[ObjectId]) -> ExecResult<Vec<String>> {
        items.iter().map(|item| self.to_repr(*item)).collect()
    }

    pub fn len(&self, id: ObjectId) -> ExecResult<i64> {
        match self.get(id)? {
            Object::Str(s) => Ok(s.chars().count() as i64),
            Object::Tuple(items) | Object::List(items) => Ok(items.len() as i64),
            _ => Err(raise(
                ErrorCategory::TypeError,
                format!("object of type '{}' has no len()", self.type_name(id)?),
            )),
        }
    }

    pub fn hash(&self, id: ObjectId) -> ExecResult<i32> {
        match self.get(id)? {
            Object::None => Ok(0),
            Object::Bool(b) => Ok(hash_i64(i64::from(*b))),
            Object::Int(i) => Ok(hash_i64(*i as i64)),
            Object::Float(x) => Ok(hash_f64(*x)),
            Object::Str(s) => Ok(hash_bytes(s.as_bytes())),
            Object::Tuple(items) => {
                let mut hash = 0;
                for item in items {
                    hash = combine(hash, self.hash(*item)?);
                }
                Ok(hash)
            }
            Object::List(_) => Err(raise(ErrorCategory::TypeError, "unhashable type: 'list'")),
            Object::Instance { .. } | Object::Iterator { .. } | Object::Builtin { .. } => {
                Ok(hash_i64(i64::from(id.0)))
            }
        }
    }

    /// Unboxing conversions. `None` when the object has another type.
    pub fn as_int(&self, id: ObjectId) -> ExecResult<Option<i64>> {
        Ok(match self.get(id)? {
            Object::Int(i) => i64::try_from(*i).ok(),
            Object::Bool(b) => Some(i64::from(*b)),
            _ => None,
        })
    }

    pub fn as_float(&self, id: ObjectId) -> ExecResult<Option<f64>> {
        Ok(match self.get(id)? {
            Object::Float(x) => Some(*x),
            Object::Int(i) => Some(*i as f64),
            Object::Bool(b) => Some(f64::from(u8::from(*b))),
            _ => None,
        })
    }

    pub fn as_bool(&self, id: ObjectId) -> ExecResult<Option<bool>> {
        Ok(match self.get(id)? {
            Object::Bool(b) => Some(*b),
            _ => None,
        })
    }

    pub fn as_string(&self, id: ObjectId) -> ExecResult<Option<String>> {
        Ok(match self.get(id)? {
            Object::Str(s) => Some(s.clone()),
            _ => None,
        })
    }

    // ── Attributes ──────────────────────────────────────────────────

    fn no_attribute(&self, id: ObjectId, name: &str) -> ExecResult<ObjectId> {
        Err(raise(
            ErrorCategory::AttributeError,
            format!("'{}' object has no attribute '{name}'", self.type_name(id)?),
        ))
    }

    pub fn get_attr(&mut self, id: ObjectId, name: &str) -> ExecResult<ObjectId> {
        let found = match self.get(id)? {
            Object::Instance { attrs, .. } => attrs.get(name).copied(),
            _ => None,
        };
        match found {
            Some(value) => {
                self.incref(value);
                Ok(value)
            }
            None => self.no_attribute(id, name),
        }
    }

    pub fn set_attr(&mut self, id: ObjectId, name: &str, value: ObjectId) -> ExecResult<()> {
        if !matches!(self.get(id)?, Object::Instance { .. }) {
            return self.no_attribute(id, name).map(|_| ());
        }
        self.incref(value);
        let old = match self.get_mut(id)? {
            Object::Instance { attrs, .. } => attrs.insert(name.to_owned(), value),
            _ => None,
        };
        if let Some(old) = old {
            self.decref(old)?;
        }
        Ok(())
    }

    /// Sorted attribute names as a list of strings.
    pub fn dir(&mut self, id: ObjectId) -> ExecResult<ObjectId> {
        let names: Vec<String> = match self.get(id)? {
            Object::Instance { attrs, .. } => attrs.keys().cloned().collect(),
            _ => Vec::new(),
        };
        let items = names.into_iter().map(|name| self.str(name)).collect();
        Ok(self.list(items))
    }

    // ── Items ───────────────────────────────────────────────────────

    fn index(&self, container: ObjectId, key: ObjectId, len: usize, what: &str) -> ExecResult<usize> {
        let Some(index) = self.as_int(key)? else {
            return Err(raise(
                ErrorCategory::TypeError,
                format!(
                    "{} indices must be integers, not '{}'",
                    self.type_name(container)?,
                    self.type_name(key)?
                ),
            ));
        };
        let len = len as i64;
        let normalized = if index < 0 { index + len } else { index };
        if normalized < 0 || normalized >= len {
            return Err(raise(ErrorCategory::IndexError, format!("{what} index out of range")));
        }
        Ok(normalized as usize)
    }

    pub fn get_item(&mut self, id: ObjectId, key: ObjectId) -> ExecResult<ObjectId> {
        match self.get(id)?.clone() {
            Object::Tuple(items) | Object::List(items) => {
                let what = self.type_name(id)?;
                let index = self.index(id, key, items.len(), &what)?;
                let item = items[index];
                self.incref(item);
                Ok(item)
            }
            Object::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let index = self.index(id, key, chars.len(), "string")?;
                Ok(self.str(chars[index].to_string()))
            }
            _ => Err(raise(
                ErrorCategory::TypeError,
                format!("'{}' object is not subscriptable", self.type_name(id)?),
            )),
        }
    }

    pub fn set_item(&mut self, id: ObjectId, key: ObjectId, value: ObjectId) -> ExecResult<()> {
        let Object::List(items) = self.get(id)? else {
            return Err(raise(
                ErrorCategory::TypeError,
                format!(
                    "'{}' object does not support item assignment",
                    self.type_name(id)?
                ),
            ));
        };
        let index = self.index(id, key, items.len(), "list")?;
        self.incref(value);
        let old = match self.get_mut(id)? {
            Object::List(items) => std::mem::replace(&mut items[index], value),
            _ => value,
        };
        self.decref(old)
    }

    pub fn del_item(&mut self, id: ObjectId, key: ObjectId) -> ExecResult<()> {
        let Object::List(items) = self.get(id)? else {
            return Err(raise(
                ErrorCategory::TypeError,
                format!(
                    "'{}' object doesn't support item deletion",
                    self.type_name(id)?
                ),
            ));
        };
        let index = self.index(id, key, items.len(), "list")?;
        let removed = match self.get_mut(id)? {
            Object::List(items) => Some(items.remove(index)),
            _ => None,
        };
        match removed {
            Some(removed) => self.decref(removed),
            None => Ok(()),
        }
    }

    /// Store `value` at position `index` of a tuple under construction.
    pub fn tuple_set(&mut self, id: ObjectId, index: i64, value: ObjectId) -> ExecResult<()> {
        let len = match self.get(id)? {
            Object::Tuple(items) => items.len(),
            _ => return Err(fault("tuple_set on a non-tuple")),
        };
        let Some(index) = usize::try_from(index).ok().filter(|i| *i < len) else {
            return Err(fault(format!("tuple_set index {index} of a {len}-tuple")));
        };
        self.incref(value);
        let old = match self.get_mut(id)? {
            Object::Tuple(items) => std::mem::replace(&mut items[index], value),
            _ => value,
        };
        self.decref(old)
    }

    /// A tuple of `len` `None`s.
    pub fn new_tuple(&mut self, len: i64) -> ExecResult<ObjectId> {
        let Ok(len) = usize::try_from(len) else {
            return Err(fault(format!("tuple of negative length {len}")));
        };
        let items = (0..len).map(|_| self.none()).collect();
        Ok(self.tuple(items))
    }

    // ── Calls, iteration, scopes ────────────────────────────────────

    pub fn call(&mut self, id: ObjectId, args: ObjectId) -> ExecResult<ObjectId> {
        let Object::Tuple(args) = self.get(args)?.clone() else {
            return Err(fault("call arguments are not a tuple"));
        };
        match self.get(id)?.clone() {
            Object::Builtin { func, .. } => func(self, &args),
            _ => Err(raise(
                ErrorCategory::TypeError,
                format!("'{}' object is not callable", self.type_name(id)?),
            )),
        }
    }

    /// Advance an iterator; the produced item carries a new reference.
    pub fn next(&mut self, id: ObjectId) -> ExecResult<Option<ObjectId>> {
        let type_name = self.type_name(id)?;
        let produced = match self.get_mut(id)? {
            Object::Iterator { items, position } => {
                let item = items.get(*position).copied();
                if item.is_some() {
                    *position += 1;
                }
                item
            }
            _ => {
                return Err(raise(
                    ErrorCategory::TypeError,
                    format!("'{type_name}' object is not an iterator"),
                ));
            }
        };
        if let Some(item) = produced {
            self.incref(item);
        }
        Ok(produced)
    }

    pub fn enter(&mut self, id: ObjectId) -> ExecResult<ObjectId> {
        if !matches!(self.get(id)?, Object::Instance { .. }) {
            return self.no_attribute(id, "__enter__");
        }
        self.incref(id);
        Ok(id)
    }

    pub fn exit(&mut self, id: ObjectId) -> ExecResult<()> {
        if !matches!(self.get(id)?, Object::Instance { .. }) {
            return self.no_attribute(id, "__exit__").map(|_| ());
        }
        Ok(())
    }

    // ── Operators ───────────────────────────────────────────────────

    fn number(&self, id: ObjectId) -> ExecResult<Option<Number>> {
        Ok(match self.get(id)? {
            Object::Bool(b) => Some(Number::Int(i128::from(*b))),
            Object::Int(i) => Some(Number::Int(*i)),
            Object::Float(x) => Some(Number::Float(*x)),
            _ => None,
        })
    }

    /// Structural equality.
    pub fn equal(&self, a: ObjectId, b: ObjectId) -> ExecResult<bool> {
        if a == b {
            return Ok(true);
        }
        if let (Some(x), Some(y)) = (self.number(a)?, self.number(b)?) {
            return Ok(match (x, y) {
                (Number::Int(x), Number::Int(y)) => x == y,
                (x, y) => as_f64(x) == as_f64(y),
            });
        }
        match (self.get(a)?, self.get(b)?) {
            (Object::None, Object::None) => Ok(true),
            (Object::Str(x), Object::Str(y)) => Ok(x == y),
            (Object::Tuple(x), Object::Tuple(y)) | (Object::List(x), Object::List(y)) => {
                if x.len() != y.len() {
                    return Ok(false);
                }
                for (p, q) in x.iter().zip(y) {
                    if !self.equal(*p, *q)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn unsupported(&self, op: BinaryOperator, a: ObjectId, b: ObjectId) -> ExecResult<ObjectId> {
        let message = if op.is_comparison() {
            format!(
                "'{op}' not supported between instances of '{}' and '{}'",
                self.type_name(a)?,
                self.type_name(b)?
            )
        } else {
            format!(
                "unsupported operand type(s) for {op}: '{}' and '{}'",
                self.type_name(a)?,
                self.type_name(b)?
            )
        };
        Err(raise(ErrorCategory::TypeError, message))
    }

    pub fn bin_op(&mut self, op: BinaryOperator, a: ObjectId, b: ObjectId) -> ExecResult<ObjectId> {
        match op {
            BinaryOperator::Is => return Ok(self.bool(a == b)),
            BinaryOperator::IsNot => return Ok(self.bool(a != b)),
            BinaryOperator::Eq => {
                let equal = self.equal(a, b)?;
                return Ok(self.bool(equal));
            }
            BinaryOperator::NotEq => {
                let equal = self.equal(a, b)?;
                return Ok(self.bool(!equal));
            }
            BinaryOperator::In | BinaryOperator::NotIn => {
                let contains = self.contains(b, a)?;
                return Ok(self.bool(contains == (op == BinaryOperator::In)));
            }
            _ => {}
        }

        if let (Some(x), Some(y)) = (self.number(a)?, self.number(b)?) {
            return match numeric_op(op, x, y)? {
                Some(Outcome::Int(i)) => Ok(self.int(i)),
                Some(Outcome::Float(f)) => Ok(self.float(f)),
                Some(Outcome::Bool(v)) => Ok(self.bool(v)),
                None => self.unsupported(op, a, b),
            };
        }

        match (self.get(a)?.clone(), self.get(b)?.clone()) {
            (Object::Str(x), Object::Str(y)) => match op {
                BinaryOperator::Add => Ok(self.str(x + &y)),
                BinaryOperator::Lt => Ok(self.bool(x < y)),
                BinaryOperator::LtE => Ok(self.bool(x <= y)),
                BinaryOperator::Gt => Ok(self.bool(x > y)),
                BinaryOperator::GtE => Ok(self.bool(x >= y)),
                _ => self.unsupported(op, a, b),
            },
            (Object::Str(x), Object::Int(n)) if op == BinaryOperator::Mul => {
                Ok(self.str(x.repeat(usize::try_from(n).unwrap_or(0))))
            }
            (Object::Tuple(x), Object::Tuple(y)) if op == BinaryOperator::Add => {
                let items = self.concat(&x, &y);
                Ok(self.tuple(items))
            }
            (Object::List(x), Object::List(y)) if op == BinaryOperator::Add => {
                let items = self.concat(&x, &y);
                Ok(self.list(items))
            }
            _ => self.unsupported(op, a, b),
        }
    }

    fn concat(&mut self, x: &[ObjectId], y: &[ObjectId]) -> Vec<ObjectId> {
        let items: Vec<ObjectId> = x.iter().chain(y).copied().collect();
        for item in &items {
            self.incref(*item);
        }
        items
    }

    fn contains(&self, container: ObjectId, item: ObjectId) -> ExecResult<bool> {
        match self.get(container)? {
            Object::Tuple(items) | Object::List(items) => {
                for candidate in items {
                    if self.equal(*candidate, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Object::Str(text) => match self.get(item)? {
                Object::Str(needle) => Ok(text.contains(needle.as_str())),
                _ => Err(raise(
                    ErrorCategory::TypeError,
                    "'in <string>' requires string as left operand",
                )),
            },
            Object::Instance { attrs, .. } => match self.get(item)? {
                Object::Str(name) => Ok(attrs.contains_key(name)),
                _ => Ok(false),
            },
            _ => Err(raise(
                ErrorCategory::TypeError,
                format!(
                    "argument of type '{}' is not iterable",
                    self.type_name(container)?
                ),
            )),
        }
    }

    pub fn unary_op(&mut self, op: UnaryOperator, a: ObjectId) -> ExecResult<ObjectId> {
        if op == UnaryOperator::Not {
            let truth = self.truthy(a)?;
            return Ok(self.bool(!truth));
        }
        match (op, self.number(a)?) {
            (UnaryOperator::Neg, Some(Number::Int(i))) => Ok(self.int(-i)),
            (UnaryOperator::Neg, Some(Number::Float(x))) => Ok(self.float(-x)),
            (UnaryOperator::Pos, Some(Number::Int(i))) => Ok(self.int(i)),
            (UnaryOperator::Pos, Some(Number::Float(x))) => Ok(self.float(x)),
            (UnaryOperator::Invert, Some(Number::Int(i))) => Ok(self.int(!i)),
            _ => Err(raise(
                ErrorCategory::TypeError,
                format!("bad operand type for unary {op}: '{}'", self.type_name(a)?),
            )),
        }
    }
}

enum Outcome {
    Int(i128),
    Float(f64),
    Bool(bool),
}

fn as_f64(n: Number) -> f64 {
    match n {
        Number::Int(i) => i as f64,
        Number::Float(x) => x,
    }
}

fn zero_division(message: &str) -> crate::error::ExecError {
    raise(ErrorCategory::ZeroDivisionError, message)
}

fn numeric_op(op: BinaryOperator, x: Number, y: Number) -> ExecResult<Option<Outcome>> {
    use BinaryOperator as B;

    if op.is_comparison() {
        let result = match (x, y) {
            (Number::Int(a), Number::Int(b)) => compare(op, a.cmp(&b)),
            (a, b) => match as_f64(a).partial_cmp(&as_f64(b)) {
                Some(ordering) => compare(op, ordering),
                None => op == B::NotEq,
            },
        };
        return Ok(Some(Outcome::Bool(result)));
    }

    if let (Number::Int(a), Number::Int(b)) = (x, y) {
        let result = match op {
            B::Add => a.wrapping_add(b),
            B::Sub => a.wrapping_sub(b),
            B::Mul => a.wrapping_mul(b),
            B::Div => {
                if b == 0 {
                    return Err(zero_division("division by zero"));
                }
                return Ok(Some(Outcome::Float(a as f64 / b as f64)));
            }
            B::FloorDiv | B::Mod => {
                if b == 0 {
                    return Err(zero_division("integer division or modulo by zero"));
                }
                let (quotient, remainder) = floor_div_mod(a, b);
                if op == B::FloorDiv {
                    quotient
                } else {
                    remainder
                }
            }
            B::Pow => {
                if b < 0 {
                    return Ok(Some(Outcome::Float((a as f64).powf(b as f64))));
                }
                match u32::try_from(b).ok().and_then(|e| a.checked_pow(e)) {
                    Some(p) => p,
                    None => return Ok(Some(Outcome::Float((a as f64).powf(b as f64)))),
                }
            }
            B::LShift | B::RShift => {
                if b < 0 {
                    return Err(raise(ErrorCategory::ValueError, "negative shift count"));
                }
                let shift = u32::try_from(b.min(127)).unwrap_or(127);
                if op == B::LShift {
                    a.checked_shl(shift).unwrap_or(0)
                } else {
                    a >> shift
                }
            }
            B::BitAnd => a & b,
            B::BitOr => a | b,
            B::BitXor => a ^ b,
            _ => return Ok(None),
        };
        return Ok(Some(Outcome::Int(result)));
    }

    let (a, b) = (as_f64(x), as_f64(y));
    let result = match op {
        B::Add => a + b,
        B::Sub => a - b,
        B::Mul => a * b,
        B::Div => {
            if b == 0.0 {
                return Err(zero_division("float division by zero"));
            }
            a / b
        }
        B::FloorDiv => {
            if b == 0.0 {
                return Err(zero_division("float divmod()"));
            }
            (a / b).floor()
        }
        B::Mod => {
            if b == 0.0 {
                return Err(zero_division("float modulo"));
            }
            float_mod(a, b)
        }
        B::Pow => a.powf(b),
        _ => return Ok(None),
    };
    Ok(Some(Outcome::Float(result)))
}

fn compare(op: BinaryOperator, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering;
    match op {
        BinaryOperator::Eq => ordering == Ordering::Equal,
        BinaryOperator::NotEq => ordering != Ordering::Equal,
        BinaryOperator::Lt => ordering == Ordering::Less,
        BinaryOperator::LtE => ordering != Ordering::Greater,
        BinaryOperator::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    }
}

/// Division rounding toward negative infinity, with the matching remainder.
pub(crate) fn floor_div_mod(a: i128, b: i128) -> (i128, i128) {
    let mut quotient = a / b;
    let mut remainder = a % b;
    if remainder != 0 && ((remainder < 0) != (b < 0)) {
        quotient -= 1;
        remainder += b;
    }
    (quotient, remainder)
}

/// Remainder with the sign of the divisor.
pub(crate) fn float_mod(a: f64, b: f64) -> f64 {
    let remainder = a % b;
    if remainder != 0.0 && ((remainder < 0.0) != (b < 0.0)) {
        remainder + b
    } else {
        remainder
    }
}

#[cfg(test)]
mod tests;
