//! Semantic type representations.
//!
//! A [`TypeRepr`] names the source-level type a wrapper describes. It is
//! the identity of a wrapper: the factory hands out one wrapper per repr,
//! and two wrappers of the same kind with the same repr are equal.

use std::fmt;

use tessel_native::NativeType;

/// Numeric types of the source value model.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NumericType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl NumericType {
    pub const ALL: [NumericType; 11] = [
        NumericType::Bool,
        NumericType::Int8,
        NumericType::Int16,
        NumericType::Int32,
        NumericType::Int64,
        NumericType::UInt8,
        NumericType::UInt16,
        NumericType::UInt32,
        NumericType::UInt64,
        NumericType::Float32,
        NumericType::Float64,
    ];

    pub fn bits(self) -> u8 {
        match self {
            NumericType::Bool => 1,
            NumericType::Int8 | NumericType::UInt8 => 8,
            NumericType::Int16 | NumericType::UInt16 => 16,
            NumericType::Int32 | NumericType::UInt32 | NumericType::Float32 => 32,
            NumericType::Int64 | NumericType::UInt64 | NumericType::Float64 => 64,
        }
    }

    pub fn is_bool(self) -> bool {
        self == NumericType::Bool
    }

    pub fn is_float(self) -> bool {
        matches!(self, NumericType::Float32 | NumericType::Float64)
    }

    /// Integer in the narrow sense: not a float and not bool.
    pub fn is_integer(self) -> bool {
        !self.is_float() && !self.is_bool()
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            NumericType::Int8
                | NumericType::Int16
                | NumericType::Int32
                | NumericType::Int64
                | NumericType::Float32
                | NumericType::Float64
        )
    }

    pub fn native(self) -> NativeType {
        match self {
            NumericType::Float32 | NumericType::Float64 => NativeType::Float { bits: self.bits() },
            _ => NativeType::Int {
                bits: self.bits(),
                signed: self.is_signed(),
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NumericType::Bool => "bool",
            NumericType::Int8 => "Int8",
            NumericType::Int16 => "Int16",
            NumericType::Int32 => "Int32",
            NumericType::Int64 => "Int64",
            NumericType::UInt8 => "UInt8",
            NumericType::UInt16 => "UInt16",
            NumericType::UInt32 => "UInt32",
            NumericType::UInt64 => "UInt64",
            NumericType::Float32 => "Float32",
            NumericType::Float64 => "Float64",
        }
    }
}

impl fmt::Display for NumericType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Composite declared with the wrapper factory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct CompositeId(u32);

impl CompositeId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeRepr {
    None,
    Numeric(NumericType),
    Str,
    Tuple(Vec<TypeRepr>),
    /// Growable homogeneous container.
    ListOf(Box<TypeRepr>),
    /// Refcounted heap resource holding one value.
    Shared(Box<TypeRepr>),
    /// Refcounted optional value.
    Cell(Box<TypeRepr>),
    Composite { id: CompositeId, name: String },
    /// Untyped object of the dynamic fallback runtime.
    Dynamic,
    /// A typed value presented to callers as a dynamic object.
    Masquerade(Box<TypeRepr>),
    BoundMethod { owner: Box<TypeRepr>, name: String },
    /// Kind registered with the factory from outside this crate.
    Extension { kind: String, args: Vec<TypeRepr> },
}

impl TypeRepr {
    pub const BOOL: TypeRepr = TypeRepr::Numeric(NumericType::Bool);
    pub const INT8: TypeRepr = TypeRepr::Numeric(NumericType::Int8);
    pub const INT16: TypeRepr = TypeRepr::Numeric(NumericType::Int16);
    pub const INT32: TypeRepr = TypeRepr::Numeric(NumericType::Int32);
    pub const INT64: TypeRepr = TypeRepr::Numeric(NumericType::Int64);
    pub const UINT8: TypeRepr = TypeRepr::Numeric(NumericType::UInt8);
    pub const UINT16: TypeRepr = TypeRepr::Numeric(NumericType::UInt16);
    pub const UINT32: TypeRepr = TypeRepr::Numeric(NumericType::UInt32);
    pub const UINT64: TypeRepr = TypeRepr::Numeric(NumericType::UInt64);
    pub const FLOAT32: TypeRepr = TypeRepr::Numeric(NumericType::Float32);
    pub const FLOAT64: TypeRepr = TypeRepr::Numeric(NumericType::Float64);

    pub fn list_of(element: TypeRepr) -> Self {
        TypeRepr::ListOf(Box::new(element))
    }

    pub fn shared(payload: TypeRepr) -> Self {
        TypeRepr::Shared(Box::new(payload))
    }

    pub fn cell(payload: TypeRepr) -> Self {
        TypeRepr::Cell(Box::new(payload))
    }

    pub fn masquerade(typed: TypeRepr) -> Self {
        TypeRepr::Masquerade(Box::new(typed))
    }

    pub fn bound_method(owner: TypeRepr, name: impl Into<String>) -> Self {
        TypeRepr::BoundMethod {
            owner: Box::new(owner),
            name: name.into(),
        }
    }

    pub fn numeric(&self) -> Option<NumericType> {
        match self {
            TypeRepr::Numeric(t) => Some(*t),
            _ => None,
        }
    }

    /// Composites stored by value inside this type, so that its layout
    /// needs theirs. Handle kinds store a pointer and contribute none.
    pub fn inline_composites(&self) -> Vec<CompositeId> {
        let mut ids = Vec::new();
        self.collect_inline_composites(&mut ids);
        ids
    }

    fn collect_inline_composites(&self, ids: &mut Vec<CompositeId>) {
        match self {
            TypeRepr::Composite { id, .. } => ids.push(*id),
            TypeRepr::Tuple(elements) => {
                for element in elements {
                    element.collect_inline_composites(ids);
                }
            }
            TypeRepr::Masquerade(inner) | TypeRepr::BoundMethod { owner: inner, .. } => {
                inner.collect_inline_composites(ids);
            }
            // Extension layouts are opaque; assume they hold their arguments.
            TypeRepr::Extension { args, .. } => {
                for arg in args {
                    arg.collect_inline_composites(ids);
                }
            }
            TypeRepr::None
            | TypeRepr::Numeric(_)
            | TypeRepr::Str
            | TypeRepr::Dynamic
            | TypeRepr::ListOf(_)
            | TypeRepr::Shared(_)
            | TypeRepr::Cell(_) => {}
        }
    }
}

impl fmt::Display for TypeRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRepr::None => write!(f, "None"),
            TypeRepr::Numeric(t) => write!(f, "{t}"),
            TypeRepr::Str => write!(f, "str"),
            TypeRepr::Tuple(elements) => {
                write!(f, "Tuple(")?;
                write_list(f, elements)?;
                write!(f, ")")
            }
            TypeRepr::ListOf(element) => write!(f, "ListOf({element})"),
            TypeRepr::Shared(payload) => write!(f, "Shared({payload})"),
            TypeRepr::Cell(payload) => write!(f, "Cell({payload})"),
            TypeRepr::Composite { name, .. } => write!(f, "{name}"),
            TypeRepr::Dynamic => write!(f, "object"),
            TypeRepr::Masquerade(typed) => write!(f, "Masquerade({typed})"),
            TypeRepr::BoundMethod { owner, name } => write!(f, "BoundMethod({owner}.{name})"),
            TypeRepr::Extension { kind, args } => {
                write!(f, "{kind}")?;
                if !args.is_empty() {
                    write!(f, "(")?;
                    write_list(f, args)?;
                    write!(f, ")")?;
                }
                Ok(())
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[TypeRepr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}
