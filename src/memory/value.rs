//! Runtime value representation
//!
//! This module defines the [`Value`] enum, generic over the active
//! [`Interpretation`]. Values are tagged:
//!
//! - [`Value::Integer`]: integer data plus its C integer type
//! - [`Value::Float`]: floating data plus its precision
//! - [`Value::Pointer`]: a symbolic [`Address`] and the pointee size used
//!   to scale arithmetic
//! - [`Value::Function`]: a function designator
//! - [`Value::Uninitialized`]: the contents of a cell never written
//!
//! Operations never coerce [`Value::Uninitialized`]; they fail with
//! `UseOfUninitializedValue`. Because abstract operations may have several
//! outcomes, everything here returns a [`ValueSet`].

use super::bytes::ByteValue;
use super::domain::Interpretation;
use super::environment::FrameId;
use super::limits::Limits;
use crate::ast::{BinOp, FloatKind, IntKind, IntType, NodeId, UnOp};
use crate::interpreter::errors::CeskError;
use std::fmt;

/// Name of a variable in a specific frame
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameAddress {
    pub frame: FrameId,
    pub name: String,
}

impl fmt::Display for FrameAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.frame.0)
    }
}

/// Identifier of a heap block (malloc result or string literal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapId(pub usize);

/// The object an address points into
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Base {
    Null,
    Frame(FrameAddress),
    Heap(HeapId),
}

/// Base plus a byte offset. The offset is not validated until the store
/// resolves the address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    pub base: Base,
    pub offset: i64,
}

impl Address {
    pub fn new(base: Base, offset: i64) -> Self {
        Address { base, offset }
    }

    pub fn null() -> Self {
        Address::new(Base::Null, 0)
    }

    pub fn is_null(&self) -> bool {
        self.base == Base::Null && self.offset == 0
    }

    pub fn offset_by(&self, delta: i64) -> Address {
        Address::new(self.base.clone(), self.offset + delta)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.base {
            Base::Null => write!(f, "NULL+{}", self.offset),
            Base::Frame(frame) => write!(f, "&{}+{}", frame, self.offset),
            Base::Heap(id) => write!(f, "heap#{}+{}", id.0, self.offset),
        }
    }
}

/// Storage class of one store unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    Int(IntType),
    Float(FloatKind),
    Pointer { pointee_size: usize },
    Function,
}

impl Scalar {
    pub fn size(&self, limits: &Limits) -> usize {
        match self {
            Scalar::Int(ty) => limits.int_width(ty.kind),
            Scalar::Float(kind) => limits.float_width(*kind),
            Scalar::Pointer { .. } | Scalar::Function => limits.word_size(),
        }
    }

    /// Same representation class, so a stored value can be returned as is
    pub fn matches(&self, other: &Scalar) -> bool {
        match (self, other) {
            (Scalar::Pointer { .. }, Scalar::Pointer { .. }) => true,
            _ => self == other,
        }
    }
}

/// Runtime values in the machine
#[derive(Debug, Clone, PartialEq)]
pub enum Value<I: Interpretation> {
    Integer { data: I::Int, ty: IntType },
    Float { data: I::Float, kind: FloatKind },
    Pointer { address: Address, pointee_size: usize },
    Function(String),
    Uninitialized(Scalar),
}

impl<I: Interpretation> fmt::Display for Value<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer { data, .. } => write!(f, "{}", data),
            Value::Float { data, .. } => write!(f, "{}", data),
            Value::Pointer { address, .. } => write!(f, "{}", address),
            Value::Function(name) => write!(f, "<function {}>", name),
            Value::Uninitialized(_) => f.write_str("<uninitialized>"),
        }
    }
}

/// A set of possible values, deduplicated on insert
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSet<I: Interpretation> {
    items: Vec<Value<I>>,
}

impl<I: Interpretation> Default for ValueSet<I> {
    fn default() -> Self {
        ValueSet { items: Vec::new() }
    }
}

impl<I: Interpretation> ValueSet<I> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(value: Value<I>) -> Self {
        ValueSet { items: vec![value] }
    }

    pub fn insert(&mut self, value: Value<I>) {
        if !self.items.contains(&value) {
            self.items.push(value);
        }
    }

    pub fn extend(&mut self, other: ValueSet<I>) {
        for value in other.items {
            self.insert(value);
        }
    }

    pub fn union(mut self, other: ValueSet<I>) -> ValueSet<I> {
        self.extend(other);
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value<I>> {
        self.items.iter()
    }

    pub fn first(&self) -> Option<&Value<I>> {
        self.items.first()
    }

    /// Whether every member is an uninitialized marker
    pub fn all_uninitialized(&self) -> bool {
        self.items
            .iter()
            .all(|value| matches!(value, Value::Uninitialized(_)))
    }

    /// Apply a set-valued operation to every member and union the results
    pub fn flat_map<F>(&self, mut f: F) -> Result<ValueSet<I>, CeskError>
    where
        F: FnMut(&Value<I>) -> Result<ValueSet<I>, CeskError>,
    {
        let mut out = ValueSet::new();
        for value in &self.items {
            out.extend(f(value)?);
        }
        Ok(out)
    }

    /// Pointwise lifting of a binary operation over both sets
    pub fn lift2<F>(&self, other: &ValueSet<I>, mut f: F) -> Result<ValueSet<I>, CeskError>
    where
        F: FnMut(&Value<I>, &Value<I>) -> Result<ValueSet<I>, CeskError>,
    {
        let mut out = ValueSet::new();
        for a in &self.items {
            for b in &other.items {
                out.extend(f(a, b)?);
            }
        }
        Ok(out)
    }
}

impl<I: Interpretation> FromIterator<Value<I>> for ValueSet<I> {
    fn from_iter<T: IntoIterator<Item = Value<I>>>(iter: T) -> Self {
        let mut set = ValueSet::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

impl<I: Interpretation> IntoIterator for ValueSet<I> {
    type Item = Value<I>;
    type IntoIter = std::vec::IntoIter<Value<I>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, I: Interpretation> IntoIterator for &'a ValueSet<I> {
    type Item = &'a Value<I>;
    type IntoIter = std::slice::Iter<'a, Value<I>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

fn uninitialized_error<I: Interpretation>(value: &Value<I>, context: &str) -> Option<CeskError> {
    match value {
        Value::Uninitialized(_) => Some(CeskError::uninitialized(context)),
        _ => None,
    }
}

/// Result type of a binary integer operation: the wider rank wins, ties keep the left
fn common_int_type(left: IntType, right: IntType) -> IntType {
    if right.kind > left.kind {
        right
    } else {
        left
    }
}

impl<I: Interpretation> Value<I> {
    /// Integer value, reduced into `ty`'s range
    pub fn integer(value: i128, ty: IntType, limits: &Limits) -> Self {
        let bounded = super::domain::bound(value, ty, limits);
        Value::Integer {
            data: I::int_from(bounded, ty, limits),
            ty,
        }
    }

    pub fn int(value: i128, limits: &Limits) -> Self {
        Value::integer(value, IntType::INT, limits)
    }

    pub fn float(value: f64, kind: FloatKind) -> Self {
        Value::Float {
            data: I::float_from(value, kind),
            kind,
        }
    }

    pub fn null(pointee_size: usize) -> Self {
        Value::Pointer {
            address: Address::null(),
            pointee_size,
        }
    }

    pub fn pointer(address: Address, pointee_size: usize) -> Self {
        Value::Pointer {
            address,
            pointee_size,
        }
    }

    pub fn is_initialized(&self) -> bool {
        !matches!(self, Value::Uninitialized(_))
    }

    pub fn scalar(&self) -> Scalar {
        match self {
            Value::Integer { ty, .. } => Scalar::Int(*ty),
            Value::Float { kind, .. } => Scalar::Float(*kind),
            Value::Pointer { pointee_size, .. } => Scalar::Pointer {
                pointee_size: *pointee_size,
            },
            Value::Function(_) => Scalar::Function,
            Value::Uninitialized(scalar) => *scalar,
        }
    }

    /// The exact integers this value may be
    pub fn concretize_int(&self) -> Result<Vec<i128>, CeskError> {
        match self {
            Value::Integer { data, .. } => I::int_concretize(data).ok_or_else(|| {
                CeskError::unsupported(format!("abstract integer {} cannot be concretized", data))
            }),
            Value::Uninitialized(_) => Err(CeskError::uninitialized("integer operand")),
            other => Err(CeskError::type_error("integer", format!("{}", other))),
        }
    }

    pub fn truth(&self) -> Result<Vec<bool>, CeskError> {
        match self {
            Value::Integer { data, .. } => Ok(I::int_truth(data)),
            Value::Float { data, .. } => Ok(I::float_truth(data)),
            Value::Pointer { address, .. } => Ok(vec![!address.is_null()]),
            Value::Function(_) => Ok(vec![true]),
            Value::Uninitialized(_) => Err(CeskError::uninitialized("branch condition")),
        }
    }

    /// Numeric conversion to an integer type. Pointers are converted by the
    /// store, which knows their numeric address.
    pub fn cast_to_int(&self, to: IntType, limits: &Limits) -> Result<ValueSet<I>, CeskError> {
        match self {
            Value::Integer { data, ty } => Ok(I::int_cast(data, *ty, to, limits)
                .into_iter()
                .map(|data| Value::Integer { data, ty: to })
                .collect()),
            Value::Float { data, .. } => Ok(I::int_from_float(data, to, limits)?
                .into_iter()
                .map(|data| Value::Integer { data, ty: to })
                .collect()),
            Value::Uninitialized(_) => Ok(ValueSet::singleton(Value::Uninitialized(Scalar::Int(to)))),
            other => Err(CeskError::type_error(
                "arithmetic value",
                format!("{} cast to {}", other, to.name()),
            )),
        }
    }

    pub fn cast_to_float(&self, to: FloatKind) -> Result<Value<I>, CeskError> {
        match self {
            Value::Integer { data, .. } => Ok(Value::Float {
                data: I::float_from_int(data, to),
                kind: to,
            }),
            Value::Float { data, .. } => Ok(Value::Float {
                data: I::float_cast(data, to),
                kind: to,
            }),
            Value::Uninitialized(_) => Ok(Value::Uninitialized(Scalar::Float(to))),
            other => Err(CeskError::type_error(
                "arithmetic value",
                format!("{} cast to floating", other),
            )),
        }
    }

    /// Pointer retyping keeps the address and only changes the arithmetic scale
    pub fn retype_pointer(&self, pointee_size: usize) -> Option<Value<I>> {
        match self {
            Value::Pointer { address, .. } => Some(Value::Pointer {
                address: address.clone(),
                pointee_size,
            }),
            _ => None,
        }
    }

    fn bools(results: Vec<bool>, limits: &Limits) -> ValueSet<I> {
        results
            .into_iter()
            .map(|t| Value::int(i128::from(t), limits))
            .collect()
    }

    /// Binary operator over two values.
    ///
    /// Integer operands are converted to their common type first; an integer
    /// meeting a float is converted to the float's precision. Pointer
    /// arithmetic only moves the byte offset; the store validates it later.
    pub fn perform_operation(&self, op: BinOp, other: &Value<I>, limits: &Limits) -> Result<ValueSet<I>, CeskError> {
        if let Some(err) = uninitialized_error(self, "left operand") {
            return Err(err);
        }
        if let Some(err) = uninitialized_error(other, "right operand") {
            return Err(err);
        }
        match (self, other) {
            (Value::Integer { data: a, ty: ta }, Value::Integer { data: b, ty: tb }) => {
                let ty = common_int_type(*ta, *tb);
                let lefts = I::int_cast(a, *ta, ty, limits);
                let rights = I::int_cast(b, *tb, ty, limits);
                let mut out = ValueSet::new();
                for left in &lefts {
                    for right in &rights {
                        if op.is_relational() {
                            out.extend(Self::bools(I::int_compare(op, left, right), limits));
                        } else {
                            for data in I::int_arith(op, left, right, ty, limits)? {
                                out.insert(Value::Integer { data, ty });
                            }
                        }
                    }
                }
                Ok(out)
            }
            (Value::Float { kind, .. }, Value::Integer { .. }) => {
                self.perform_operation(op, &other.cast_to_float(*kind)?, limits)
            }
            (Value::Integer { .. }, Value::Float { kind, .. }) => {
                self.cast_to_float(*kind)?.perform_operation(op, other, limits)
            }
            (Value::Float { data: a, kind: ka }, Value::Float { data: b, kind: kb }) => {
                let kind = (*ka).max(*kb);
                let left = I::float_cast(a, kind);
                let right = I::float_cast(b, kind);
                if op.is_relational() {
                    Ok(Self::bools(I::float_compare(op, &left, &right), limits))
                } else {
                    Ok(I::float_arith(op, &left, &right, kind)?
                        .into_iter()
                        .map(|data| Value::Float { data, kind })
                        .collect())
                }
            }
            (Value::Pointer { address, pointee_size }, Value::Integer { .. })
                if matches!(op, BinOp::Add | BinOp::Sub) =>
            {
                let sign = if op == BinOp::Sub { -1 } else { 1 };
                let mut out = ValueSet::new();
                for n in other.concretize_int()? {
                    let delta = sign * n as i64 * *pointee_size as i64;
                    out.insert(Value::Pointer {
                        address: address.offset_by(delta),
                        pointee_size: *pointee_size,
                    });
                }
                Ok(out)
            }
            (Value::Integer { .. }, Value::Pointer { .. }) if op == BinOp::Add => {
                other.perform_operation(op, self, limits)
            }
            (Value::Pointer { address: a, pointee_size }, Value::Pointer { address: b, .. }) => {
                if op == BinOp::Sub {
                    if a.base != b.base {
                        return Err(CeskError::unsupported(
                            "subtraction of pointers into different objects",
                        ));
                    }
                    let elements = (a.offset - b.offset) / (*pointee_size).max(1) as i64;
                    return Ok(ValueSet::singleton(Value::integer(
                        i128::from(elements),
                        IntType::new(IntKind::Long, true),
                        limits,
                    )));
                }
                if !op.is_relational() {
                    return Err(CeskError::type_error(
                        "pointer arithmetic",
                        format!("pointer {} pointer", op.symbol()),
                    ));
                }
                let result = if a.base == b.base {
                    super::domain::exact_compare(op, a.offset, b.offset)
                } else {
                    super::domain::exact_compare(op, a, b)
                };
                Ok(Self::bools(vec![result], limits))
            }
            (Value::Pointer { pointee_size, .. }, Value::Integer { .. })
            | (Value::Integer { .. }, Value::Pointer { pointee_size, .. })
                if op.is_relational() =>
            {
                // only comparisons against the null constant are meaningful
                let (pointer, integer) = match (self, other) {
                    (Value::Pointer { .. }, _) => (self, other),
                    _ => (other, self),
                };
                if integer.concretize_int()? != vec![0] {
                    return Err(CeskError::type_error(
                        "null pointer constant",
                        format!("comparison of pointer with {}", integer),
                    ));
                }
                let null = Value::null(*pointee_size);
                if std::ptr::eq(pointer, self) {
                    pointer.perform_operation(op, &null, limits)
                } else {
                    null.perform_operation(op, pointer, limits)
                }
            }
            (Value::Function(a), Value::Function(b)) if matches!(op, BinOp::Eq | BinOp::Ne) => {
                Ok(Self::bools(vec![(a == b) == (op == BinOp::Eq)], limits))
            }
            _ => Err(CeskError::type_error(
                "compatible operands",
                format!("{} {} {}", self, op.symbol(), other),
            )),
        }
    }

    /// Arithmetic and logical unary operators; `*` and `&` are handled by
    /// the machine
    pub fn unary(&self, op: UnOp, limits: &Limits) -> Result<ValueSet<I>, CeskError> {
        if let Some(err) = uninitialized_error(self, "unary operand") {
            return Err(err);
        }
        if op == UnOp::Not {
            return Ok(Self::bools(
                self.truth()?.into_iter().map(|t| !t).collect(),
                limits,
            ));
        }
        match self {
            Value::Integer { data, ty } => Ok(I::int_unary(op, data, *ty, limits)?
                .into_iter()
                .map(|data| Value::Integer { data, ty: *ty })
                .collect()),
            Value::Float { data, kind } => Ok(I::float_unary(op, data)?
                .into_iter()
                .map(|data| Value::Float { data, kind: *kind })
                .collect()),
            other => Err(CeskError::type_error(
                "arithmetic operand",
                format!("{:?} applied to {}", op, other),
            )),
        }
    }

    /// Byte pattern of a numeric value; pointers and functions are encoded by the store
    pub fn numeric_bytes(&self, limits: &Limits) -> Option<ByteValue> {
        match self {
            Value::Integer { data, ty } => Some(I::int_to_bytes(data, *ty, limits)),
            Value::Float { data, kind } => Some(I::float_to_bytes(data, *kind, limits)),
            Value::Uninitialized(scalar) => Some(ByteValue::uninitialized(scalar.size(limits))),
            Value::Pointer { .. } | Value::Function(_) => None,
        }
    }

    /// Decode numeric bytes as `scalar`; `None` for pointer and function scalars
    pub fn from_numeric_bytes(
        bytes: &ByteValue,
        scalar: Scalar,
        limits: &Limits,
    ) -> Option<Result<ValueSet<I>, CeskError>> {
        if !bytes.is_initialized() {
            return Some(Ok(ValueSet::singleton(Value::Uninitialized(scalar))));
        }
        match scalar {
            Scalar::Int(ty) => Some(I::int_from_bytes(bytes, ty, limits).map(|datas| {
                datas
                    .into_iter()
                    .map(|data| Value::Integer { data, ty })
                    .collect()
            })),
            Scalar::Float(kind) => Some(I::float_from_bytes(bytes, kind, limits).map(|datas| {
                datas
                    .into_iter()
                    .map(|data| Value::Float { data, kind })
                    .collect()
            })),
            Scalar::Pointer { .. } | Scalar::Function => None,
        }
    }
}

/// Node that produced a heap block, used to key abstract allocation
pub type AllocationSite = NodeId;
