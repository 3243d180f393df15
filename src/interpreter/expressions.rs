//! Expression evaluation
//!
//! Every expression evaluates to a [`ValueSet`]: a singleton under concrete
//! interpretation, possibly several values under abstraction. Lvalues
//! evaluate to a list of addresses for the same reason.
//!
//! Calls to user functions never appear inside an expression here; the
//! desugaring pipeline hoists them into their own statements, and the
//! machine steps into them from statement or expression control.

use super::engine::Machine;
use super::errors::CeskError;
use super::state::State;
use crate::ast::{BaseType, BinOp, Constant, IntKind, IntType, NodeId, NodeKind, Type, UnOp};
use crate::memory::domain::Interpretation;
use crate::memory::environment::FrameId;
use crate::memory::value::{Address, Base, Scalar, Value, ValueSet};
use std::rc::Rc;

impl<I: Interpretation> Machine<I> {
    /// Values `node` may evaluate to in `state`
    pub(crate) fn eval(&mut self, node: NodeId, state: &State) -> Result<ValueSet<I>, CeskError> {
        let program = Rc::clone(&self.program);
        let kind = program
            .kind(node)
            .ok_or_else(|| CeskError::unsupported(format!("dangling node id {}", node)))?;
        let limits = *self.layouts.limits();
        match kind {
            NodeKind::Constant(constant) => match constant {
                Constant::Int { value, ty } => Ok(ValueSet::singleton(Value::integer(i128::from(*value), *ty, &limits))),
                Constant::Char(c) => Ok(ValueSet::singleton(Value::int(i128::from(*c as i8), &limits))),
                Constant::Float { value, kind } => Ok(ValueSet::singleton(Value::float(*value, *kind))),
                Constant::Str(text) => {
                    let address = self.string_literal(node, text)?;
                    let size = limits.int_width(IntKind::Char);
                    Ok(ValueSet::singleton(Value::pointer(address, size)))
                }
            },
            NodeKind::Id { name } => {
                if self.env.lookup(state.env, name).is_none() && self.links.function(name).is_some() {
                    return Ok(ValueSet::singleton(Value::Function(name.clone())));
                }
                let resolved = self.resolve_name(state.env, name)?;
                let address = Address::new(Base::Frame(resolved.address), 0);
                self.load(&[address], &resolved.ty)
            }
            NodeKind::BinaryOp { op, left, right } => {
                let lefts = self.eval(*left, state)?;
                let rights = self.eval(*right, state)?;
                lefts.lift2(&rights, |a, b| a.perform_operation(*op, b, &limits))
            }
            NodeKind::UnaryOp { op, operand } => match op {
                UnOp::AddrOf if self.designates_function(*operand, state) => self.eval(*operand, state),
                UnOp::Deref => {
                    let ty = self.static_type(node, state.env)?;
                    if ty.base == BaseType::Function && ty.pointer_depth <= 1 {
                        // `*f` of a function designator is the designator
                        return self.eval(*operand, state);
                    }
                    let addresses = self.get_address(node, state)?;
                    self.load(&addresses, &ty)
                }
                UnOp::AddrOf => {
                    let ty = self.static_type(*operand, state.env)?;
                    let pointee_size = self.layouts.pointee_size(&ty)?;
                    Ok(self
                        .get_address(*operand, state)?
                        .into_iter()
                        .map(|address| Value::pointer(address, pointee_size))
                        .collect())
                }
                _ => self.eval(*operand, state)?.flat_map(|value| value.unary(*op, &limits)),
            },
            NodeKind::Cast { ty, expr } => {
                let values = self.eval(*expr, state)?;
                if ty.is_void() {
                    return Ok(values);
                }
                let scalar = self.layouts.scalar(ty)?;
                self.convert(&values, scalar)
            }
            NodeKind::SizeOf { ty } => {
                let size = self.layouts.size_of(ty)?;
                Ok(ValueSet::singleton(Value::integer(size as i128, IntType::UNSIGNED_LONG, &limits)))
            }
            NodeKind::ArrayRef { .. } => {
                let ty = self.static_type(node, state.env)?;
                let addresses = self.get_address(node, state)?;
                self.load(&addresses, &ty)
            }
            NodeKind::FuncCall { callee, args } => {
                if let Some(function) = self.user_function(*callee, state)? {
                    let name = match program.kind(function) {
                        Some(NodeKind::FuncDef { name, .. }) => name.clone(),
                        _ => function.to_string(),
                    };
                    return Err(CeskError::unsupported(format!(
                        "call to '{}' nested inside an expression",
                        name
                    )));
                }
                let Some(NodeKind::Id { name }) = program.kind(*callee) else {
                    return Err(CeskError::unsupported("call through a non-identifier callee"));
                };
                self.call_builtin(state, node, name, args)
            }
            other => Err(CeskError::unsupported(format!(
                "{} used as an expression",
                other.tag()
            ))),
        }
    }

    /// Whether `node` names a function rather than an object
    fn designates_function(&self, node: NodeId, state: &State) -> bool {
        match self.program.kind(node) {
            Some(NodeKind::Id { name }) => {
                self.env.lookup(state.env, name).is_none() && self.links.function(name).is_some()
            }
            _ => false,
        }
    }

    /// Read objects of type `ty`; arrays decay to a pointer to their first element
    fn load(&self, addresses: &[Address], ty: &Type) -> Result<ValueSet<I>, CeskError> {
        if ty.is_array() {
            let pointee_size = self.layouts.size_of(&ty.element())?;
            return Ok(addresses
                .iter()
                .map(|address| Value::pointer(address.clone(), pointee_size))
                .collect());
        }
        if self.layouts.is_aggregate(ty) {
            return Err(CeskError::type_error("scalar value", format!("{:?}", ty.base)));
        }
        let scalar = self.layouts.scalar(ty)?;
        let mut values = ValueSet::new();
        for address in addresses {
            values.extend(self.store.read(address, scalar)?);
        }
        Ok(values)
    }

    /// Addresses an lvalue expression may designate
    pub(crate) fn get_address(&mut self, node: NodeId, state: &State) -> Result<Vec<Address>, CeskError> {
        let program = Rc::clone(&self.program);
        match program.kind(node) {
            Some(NodeKind::Id { name }) => {
                let resolved = self.resolve_name(state.env, name)?;
                Ok(vec![Address::new(Base::Frame(resolved.address), 0)])
            }
            Some(NodeKind::UnaryOp {
                op: UnOp::Deref,
                operand,
            }) => {
                let pointers = self.eval(*operand, state)?;
                pointers.iter().map(pointer_target).collect()
            }
            Some(NodeKind::ArrayRef { array, index }) => {
                let element = self.static_type(node, state.env)?;
                let size = self.layouts.size_of(&element)? as i64;
                let bases = self.eval(*array, state)?;
                let indices = self.eval(*index, state)?;
                let mut addresses = Vec::new();
                for base in &bases {
                    let start = pointer_target(base)?;
                    for index in &indices {
                        for i in index.concretize_int()? {
                            let address = self.store.add_offset_to_pointer(&start, i as i64 * size)?;
                            if !addresses.contains(&address) {
                                addresses.push(address);
                            }
                        }
                    }
                }
                Ok(addresses)
            }
            Some(NodeKind::Cast { expr, .. }) => self.get_address(*expr, state),
            Some(NodeKind::Constant(Constant::Str(text))) => Ok(vec![self.string_literal(node, text)?]),
            Some(other) => Err(CeskError::unsupported(format!(
                "{} is not an lvalue",
                other.tag()
            ))),
            None => Err(CeskError::unsupported(format!("dangling node id {}", node))),
        }
    }

    /// The array materialized for string literal `node`
    pub(crate) fn string_literal(&mut self, node: NodeId, text: &str) -> Result<Address, CeskError> {
        if let Some(address) = self.literals.get(&node) {
            return Ok(address.clone());
        }
        let address = self.store.literal(node, text.as_bytes())?;
        self.literals.insert(node, address.clone());
        Ok(address)
    }

    /// C type of an expression, from declarations and operand types
    pub(crate) fn static_type(&mut self, node: NodeId, env: FrameId) -> Result<Type, CeskError> {
        let program = Rc::clone(&self.program);
        let kind = program
            .kind(node)
            .ok_or_else(|| CeskError::unsupported(format!("dangling node id {}", node)))?;
        match kind {
            NodeKind::Constant(Constant::Int { ty, .. }) => Ok(Type::integer(*ty)),
            NodeKind::Constant(Constant::Char(_)) => Ok(Type::int()),
            NodeKind::Constant(Constant::Float { kind, .. }) => Ok(Type::floating(*kind)),
            NodeKind::Constant(Constant::Str(_)) => Ok(Type::char().with_pointer()),
            NodeKind::Id { name } => {
                if self.env.lookup(env, name).is_none() {
                    if self.links.function(name).is_some() {
                        return Ok(Type::new(BaseType::Function));
                    }
                }
                Ok(self.resolve_name(env, name)?.ty)
            }
            NodeKind::BinaryOp { op, left, right } => {
                let left = self.static_type(*left, env)?;
                let right = self.static_type(*right, env)?;
                binary_type(*op, left, right)
            }
            NodeKind::UnaryOp { op, operand } => {
                let ty = self.static_type(*operand, env)?;
                match op {
                    UnOp::Deref if ty.base == BaseType::Function && ty.pointer_depth <= 1 => Ok(ty),
                    UnOp::Deref => ty.pointee().ok_or_else(|| {
                        CeskError::type_error("pointer", format!("dereference of {:?}", ty.base))
                    }),
                    UnOp::AddrOf if ty.base == BaseType::Function && ty.pointer_depth == 0 => {
                        Ok(ty.with_pointer())
                    }
                    UnOp::AddrOf => Ok(ty.address_of()),
                    UnOp::Not => Ok(Type::int()),
                    UnOp::Neg | UnOp::Plus | UnOp::BitNot => Ok(ty),
                }
            }
            NodeKind::Cast { ty, .. } => Ok(ty.clone()),
            NodeKind::SizeOf { .. } => Ok(Type::integer(IntType::UNSIGNED_LONG)),
            NodeKind::ArrayRef { array, .. } => {
                let ty = self.static_type(*array, env)?;
                ty.pointee().ok_or_else(|| {
                    CeskError::type_error("array or pointer", format!("subscript of {:?}", ty.base))
                })
            }
            NodeKind::FuncCall { callee, .. } => {
                if let Some(NodeKind::Id { name }) = program.kind(*callee) {
                    if self.env.lookup(env, name).is_none() {
                        if let Some(function) = self.links.function(name) {
                            return self.return_type(function);
                        }
                        return Ok(builtin_return_type(name));
                    }
                }
                let ty = self.static_type(*callee, env)?;
                if ty.base == BaseType::Function {
                    // function pointers carry no signature; assume int
                    return Ok(Type::int());
                }
                Err(CeskError::type_error("function", format!("call of {:?}", ty.base)))
            }
            other => Err(CeskError::unsupported(format!(
                "{} has no value type",
                other.tag()
            ))),
        }
    }

    fn return_type(&self, function: NodeId) -> Result<Type, CeskError> {
        match self.program.kind(function) {
            Some(NodeKind::FuncDef { return_type, .. }) => Ok(return_type.clone()),
            _ => Err(CeskError::unsupported(format!("node {} is not a function", function))),
        }
    }

    /// Convert every value to the representation of `scalar` (assignment, casts, arguments)
    pub(crate) fn convert(&self, values: &ValueSet<I>, scalar: Scalar) -> Result<ValueSet<I>, CeskError> {
        let limits = *self.layouts.limits();
        values.flat_map(|value| match (scalar, value) {
            (_, Value::Uninitialized(_)) => Ok(ValueSet::singleton(Value::Uninitialized(scalar))),
            (Scalar::Int(ty), Value::Pointer { address, .. }) => {
                let numeric = self.store.pointer_to_numeric(address)?;
                Ok(ValueSet::singleton(Value::integer(numeric as i128, ty, &limits)))
            }
            (Scalar::Int(ty), value) => value.cast_to_int(ty, &limits),
            (Scalar::Float(kind), value) => Ok(ValueSet::singleton(value.cast_to_float(kind)?)),
            (Scalar::Pointer { pointee_size }, Value::Pointer { .. }) => Ok(value
                .retype_pointer(pointee_size)
                .into_iter()
                .collect()),
            (Scalar::Pointer { pointee_size }, Value::Integer { .. }) => {
                let mut out = ValueSet::new();
                for n in value.concretize_int()? {
                    out.insert(match u128::try_from(n) {
                        Ok(numeric) => self.store.pointer_from_numeric(numeric, pointee_size),
                        Err(_) => Value::pointer(Address::new(Base::Null, n as i64), pointee_size),
                    });
                }
                Ok(out)
            }
            (Scalar::Pointer { .. } | Scalar::Function, Value::Function(name)) => {
                Ok(ValueSet::singleton(Value::Function(name.clone())))
            }
            (Scalar::Function, Value::Pointer { address, .. }) if address.is_null() => {
                Ok(ValueSet::singleton(value.clone()))
            }
            (scalar, value) => Err(CeskError::type_error(
                format!("{:?}", scalar),
                value.to_string(),
            )),
        })
    }

    /// Copy an object of type `ty` unit by unit
    pub(crate) fn copy_object(&mut self, source: &Address, dest: &Address, ty: &Type) -> Result<(), CeskError> {
        let (units, count) = self.layouts.units(ty)?;
        let mut offset = 0i64;
        for _ in 0..count {
            for unit in &units {
                let values = self.store.read(&source.offset_by(offset), unit.scalar)?;
                self.store
                    .write(&dest.offset_by(offset), &values, unit.scalar, false)?;
                offset += unit.size as i64;
            }
        }
        Ok(())
    }
}

/// Address a pointer value designates
fn pointer_target<I: Interpretation>(value: &Value<I>) -> Result<Address, CeskError> {
    match value {
        Value::Pointer { address, .. } => Ok(address.clone()),
        Value::Uninitialized(_) => Err(CeskError::uninitialized("pointer dereference")),
        other => Err(CeskError::type_error("pointer", other.to_string())),
    }
}

/// Result type of a binary operator, mirroring the value-level promotion
fn binary_type(op: BinOp, left: Type, right: Type) -> Result<Type, CeskError> {
    if op.is_relational() {
        return Ok(Type::int());
    }
    let left_pointer = left.is_pointer() || left.is_array();
    let right_pointer = right.is_pointer() || right.is_array();
    match (left_pointer, right_pointer) {
        (true, true) if op == BinOp::Sub => return Ok(Type::integer(IntType::LONG)),
        (true, false) => return Ok(left.decayed()),
        (false, true) => return Ok(right.decayed()),
        (true, true) => {
            return Err(CeskError::type_error(
                "pointer arithmetic",
                format!("pointer {} pointer", op.symbol()),
            ))
        }
        (false, false) => {}
    }
    match (&left.base, &right.base) {
        (BaseType::Floating(a), BaseType::Floating(b)) => Ok(Type::floating((*a).max(*b))),
        (BaseType::Floating(_), _) => Ok(left),
        (_, BaseType::Floating(_)) => Ok(right),
        (BaseType::Integer(a), BaseType::Integer(b)) => {
            Ok(Type::integer(if b.kind > a.kind { *b } else { *a }))
        }
        _ => Err(CeskError::type_error(
            "arithmetic operands",
            format!("{:?} {} {:?}", left.base, op.symbol(), right.base),
        )),
    }
}

/// Return types of the library functions the machine provides
pub(crate) fn builtin_return_type(name: &str) -> Type {
    match name {
        "malloc" | "calloc" => Type::void().with_pointer(),
        "free" | "omp_set_num_threads" => Type::void(),
        _ => Type::int(),
    }
}
