//! Memory model for the machine
//!
//! This module provides the core memory abstractions:
//! - [`value`]: runtime values, addresses and value sets
//! - [`domain`]: the pluggable concrete and abstract interpretations
//! - [`bytes`]: byte patterns with per-bit unknowns
//! - [`limits`]: numeric limits profiles (type widths, representation, packing)
//! - [`store`]: byte-numbered units linked by predecessor/successor chains
//! - [`heap`]: malloc and literal block bookkeeping
//! - [`environment`]: frames mapping identifiers to frame addresses
//!
//! # Layout
//!
//! Every object is allocated as `count` repetitions of a unit list. A scalar
//! is one unit, an array repeats its element's units, and a struct flattens
//! its fields into consecutive units:
//! ```text
//! struct { char c; int i; } s[2]   (gcc packing)
//!   units  = [char (1 + 3 padding), int (4)]
//!   count  = 2
//! ```
//! Padding is folded into the preceding unit, so walking the unit chain
//! always covers every byte of the object.

pub mod bytes;
pub mod domain;
pub mod environment;
pub mod heap;
pub mod limits;
pub mod store;
pub mod value;

use crate::ast::{BaseType, Field, NodeKind, Program, Type};
use crate::interpreter::errors::CeskError;
use limits::{Limits, Packing};
use rustc_hash::FxHashMap;
use value::Scalar;

/// One storage unit of an object's layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit {
    /// Bytes occupied, padding included
    pub size: usize,
    pub scalar: Scalar,
}

#[derive(Debug, Clone)]
struct Aggregate {
    fields: Vec<Field>,
    union: bool,
}

/// Sizes, alignments and unit lists of C types under one limits profile
#[derive(Debug, Clone)]
pub struct Layouts {
    limits: Limits,
    aggregates: FxHashMap<String, Aggregate>,
}

impl Layouts {
    pub fn new(limits: Limits, program: &Program) -> Self {
        let aggregates = program
            .nodes
            .iter()
            .filter_map(|node| match &node.kind {
                NodeKind::StructDecl {
                    name,
                    fields,
                    union,
                } => Some((
                    name.clone(),
                    Aggregate {
                        fields: fields.clone(),
                        union: *union,
                    },
                )),
                _ => None,
            })
            .collect();
        Layouts { limits, aggregates }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    fn aggregate(&self, name: &str) -> Result<&Aggregate, CeskError> {
        self.aggregates
            .get(name)
            .ok_or_else(|| CeskError::unsupported(format!("unknown struct or union '{}'", name)))
    }

    /// Storage class of a non-aggregate type
    pub fn scalar(&self, ty: &Type) -> Result<Scalar, CeskError> {
        if ty.is_array() {
            return Err(CeskError::type_error("scalar type", "array"));
        }
        if ty.base == BaseType::Function && ty.pointer_depth <= 1 {
            return Ok(Scalar::Function);
        }
        if ty.pointer_depth > 0 {
            let pointee = ty.pointee().unwrap_or_else(Type::void);
            return Ok(Scalar::Pointer {
                pointee_size: self.pointee_size(&pointee)?,
            });
        }
        match &ty.base {
            BaseType::Integer(int) => Ok(Scalar::Int(*int)),
            BaseType::Floating(kind) => Ok(Scalar::Float(*kind)),
            BaseType::Void => Err(CeskError::type_error("object type", "void")),
            BaseType::Struct(name) | BaseType::Union(name) => Err(CeskError::type_error(
                "scalar type",
                format!("aggregate '{}'", name),
            )),
            BaseType::Function => Ok(Scalar::Function),
        }
    }

    pub fn is_aggregate(&self, ty: &Type) -> bool {
        !ty.is_array()
            && ty.pointer_depth == 0
            && matches!(ty.base, BaseType::Struct(_) | BaseType::Union(_))
    }

    /// Arithmetic scale for pointers to `ty`; `void` and functions scale by one byte
    pub fn pointee_size(&self, ty: &Type) -> Result<usize, CeskError> {
        if ty.pointer_depth == 0 && !ty.is_array() && matches!(ty.base, BaseType::Void | BaseType::Function) {
            return Ok(1);
        }
        self.size_of(ty)
    }

    pub fn size_of(&self, ty: &Type) -> Result<usize, CeskError> {
        let (units, count) = self.units(ty)?;
        Ok(units.iter().map(|unit| unit.size).sum::<usize>() * count)
    }

    pub fn align_of(&self, ty: &Type) -> Result<usize, CeskError> {
        if self.limits.packing() == Packing::Compact {
            return Ok(1);
        }
        if ty.is_array() {
            return self.align_of(&ty.element());
        }
        if self.is_aggregate(ty) {
            let name = match &ty.base {
                BaseType::Struct(name) | BaseType::Union(name) => name,
                _ => return Ok(1),
            };
            let mut align = 1;
            for field in &self.aggregate(name)?.fields {
                align = align.max(self.align_of(&field.ty)?);
            }
            return Ok(align);
        }
        Ok(self.scalar(ty)?.size(&self.limits))
    }

    /// Unit list and repetition count of an object of type `ty`
    pub fn units(&self, ty: &Type) -> Result<(Vec<Unit>, usize), CeskError> {
        if let Some(len) = ty.array_len {
            let (units, count) = self.units(&ty.element())?;
            let mut repeated = Vec::with_capacity(units.len() * count);
            for _ in 0..count {
                repeated.extend_from_slice(&units);
            }
            return Ok((repeated, len));
        }
        match &ty.base {
            BaseType::Struct(name) if ty.pointer_depth == 0 => Ok((self.struct_units(name)?, 1)),
            BaseType::Union(name) if ty.pointer_depth == 0 => Ok((vec![self.union_unit(name)?], 1)),
            _ => {
                let scalar = self.scalar(ty)?;
                Ok((
                    vec![Unit {
                        size: scalar.size(&self.limits),
                        scalar,
                    }],
                    1,
                ))
            }
        }
    }

    /// Fields flattened in order, padding folded into the unit before it
    fn struct_units(&self, name: &str) -> Result<Vec<Unit>, CeskError> {
        let aggregate = self.aggregate(name)?;
        if aggregate.union {
            return Ok(vec![self.union_unit(name)?]);
        }
        let mut units: Vec<Unit> = Vec::new();
        let mut offset = 0usize;
        let mut struct_align = 1usize;
        for field in &aggregate.fields {
            let align = self.align_of(&field.ty)?;
            struct_align = struct_align.max(align);
            let padding = (align - offset % align) % align;
            if padding > 0 {
                if let Some(last) = units.last_mut() {
                    last.size += padding;
                }
                offset += padding;
            }
            let size = self.size_of(&field.ty)?;
            let (field_units, count) = self.units(&field.ty)?;
            for _ in 0..count {
                units.extend_from_slice(&field_units);
            }
            offset += size;
        }
        let tail = (struct_align - offset % struct_align) % struct_align;
        if tail > 0 {
            if let Some(last) = units.last_mut() {
                last.size += tail;
            }
        }
        if units.is_empty() {
            return Err(CeskError::unsupported(format!("empty struct '{}'", name)));
        }
        Ok(units)
    }

    /// A union is one unit the size of its largest member
    fn union_unit(&self, name: &str) -> Result<Unit, CeskError> {
        let aggregate = self.aggregate(name)?;
        let mut best: Option<(usize, Scalar)> = None;
        for field in &aggregate.fields {
            let size = self.size_of(&field.ty)?;
            let (units, _) = self.units(&field.ty)?;
            let Some(first) = units.first() else {
                continue;
            };
            if best.map_or(true, |(largest, _)| size > largest) {
                best = Some((size, first.scalar));
            }
        }
        let (mut size, scalar) =
            best.ok_or_else(|| CeskError::unsupported(format!("empty union '{}'", name)))?;
        let align = self.align_of(&Type::new(BaseType::Union(name.to_string())))?;
        size += (align - size % align) % align;
        Ok(Unit { size, scalar })
    }
}
