// Statement transitions

use super::continuation::{Continuation, KontAddress, KontKind};
use super::control::Control;
use super::engine::Machine;
use super::errors::CeskError;
use super::state::State;
use crate::ast::{BaseType, Constant, NodeId, NodeKind, Type};
use crate::interpreter::config::FrameAlloc;
use crate::memory::domain::Interpretation;
use crate::memory::value::{Address, Base, Scalar, Value, ValueSet};
use std::rc::Rc;

impl<I: Interpretation> Machine<I> {
    /// One statement under statement control
    pub(crate) fn execute(&mut self, state: &State, stmt: NodeId) -> Result<Vec<State>, CeskError> {
        let program = Rc::clone(&self.program);
        let kind = program
            .kind(stmt)
            .ok_or_else(|| CeskError::unsupported(format!("dangling node id {}", stmt)))?;
        match kind {
            NodeKind::Decl { name, ty, init } => self.declaration(state, name, ty, *init),
            NodeKind::Assignment { lvalue, rvalue } => self.assignment(state, *lvalue, *rvalue),
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.descend(
                state,
                *cond,
                KontKind::If {
                    then_branch: *then_branch,
                    else_branch: *else_branch,
                },
            ),
            NodeKind::While { cond, body } => self.descend(state, *cond, KontKind::While { body: *body }),
            NodeKind::Compound { .. } => Ok(vec![self.enter_block(state, stmt)?]),
            NodeKind::Return { expr: Some(expr) } => {
                let scalar = self.return_scalar(stmt)?;
                self.descend(state, *expr, KontKind::Return { scalar })
            }
            NodeKind::Return { expr: None } => self.invoke(state.kont, None, state),
            NodeKind::Goto { label } => self.goto(state, label),
            NodeKind::Label { stmt, .. } => self.execute(state, *stmt),
            NodeKind::EmptyStatement | NodeKind::StructDecl { .. } | NodeKind::FuncDef { .. } => {
                self.advance(state)
            }
            NodeKind::FuncCall { callee, args } => self.call_statement(state, stmt, *callee, args),
            NodeKind::OmpParallel { .. } => self.spawn_thread_team(state, stmt),
            NodeKind::OmpFor { .. } => self.loop_tasks(state, stmt),
            NodeKind::OmpCritical { .. } => self.critical_section(state, stmt),
            NodeKind::FileAst { .. } => Err(CeskError::unsupported("translation unit used as a statement")),
            // evaluated for effect (and faults) only
            NodeKind::Id { .. }
            | NodeKind::Constant(_)
            | NodeKind::BinaryOp { .. }
            | NodeKind::UnaryOp { .. }
            | NodeKind::Cast { .. }
            | NodeKind::SizeOf { .. }
            | NodeKind::ArrayRef { .. } => {
                self.eval(stmt, state)?;
                self.advance(state)
            }
        }
    }

    /// An expression under expression control; its value goes to the state's continuation
    pub(crate) fn step_expression(&mut self, state: &State, node: NodeId) -> Result<Vec<State>, CeskError> {
        let program = Rc::clone(&self.program);
        if let Some(NodeKind::FuncCall { callee, args }) = program.kind(node) {
            if let Some(function) = self.user_function(*callee, state)? {
                return Ok(vec![self.call_function(state, function, args, state.kont)?]);
            }
        }
        let values = self.eval(node, state)?;
        self.invoke(state.kont, Some(values), state)
    }

    fn declaration(&mut self, state: &State, name: &str, ty: &Type, init: Option<NodeId>) -> Result<Vec<State>, CeskError> {
        // prototypes bind nothing
        if ty.base == BaseType::Function && ty.pointer_depth == 0 {
            return self.advance(state);
        }
        let resolved = self.env.declare(state.env, name, ty)?;
        let address = if resolved.fresh || self.config.frame_alloc == FrameAlloc::ZeroCfa {
            self.allocate_binding(&resolved)?
        } else {
            Address::new(Base::Frame(resolved.address), 0)
        };
        let Some(init) = init else {
            return self.advance(state);
        };
        if ty.is_array() || self.layouts.is_aggregate(ty) {
            self.initialize(state, &address, ty, init)?;
            return self.advance(state);
        }
        let scalar = self.layouts.scalar(ty)?;
        self.descend(
            state,
            init,
            KontKind::Assign {
                dest: vec![address],
                scalar,
            },
        )
    }

    /// Initialize the object at `address` from `init` without a continuation.
    /// Used for globals and aggregate initializers, which never call functions.
    pub(crate) fn initialize(&mut self, state: &State, address: &Address, ty: &Type, init: NodeId) -> Result<(), CeskError> {
        let program = Rc::clone(&self.program);
        if let Some(NodeKind::Constant(Constant::Str(text))) = program.kind(init) {
            if ty.is_array() {
                return self.write_string(address, ty, text.as_bytes());
            }
        }
        if ty.is_array() {
            return Err(CeskError::unsupported("array initializer other than a string literal"));
        }
        if self.layouts.is_aggregate(ty) {
            let sources = self.get_address(init, state)?;
            let [source] = sources.as_slice() else {
                return Err(CeskError::unsupported("aggregate initializer with several sources"));
            };
            return self.copy_object(source, address, ty);
        }
        let scalar = self.layouts.scalar(ty)?;
        let values = self.eval(init, state)?;
        let converted = self.convert(&values, scalar)?;
        self.store.write(address, &converted, scalar, false)
    }

    /// `char buf[N] = "text"`: copy the characters, then zero the rest
    fn write_string(&mut self, address: &Address, ty: &Type, text: &[u8]) -> Result<(), CeskError> {
        let len = ty.array_len.unwrap_or(0);
        if text.len() > len {
            return Err(CeskError::seg_fault_at("string initializer longer than its array", address));
        }
        let element = ty.element();
        let scalar = self.layouts.scalar(&element)?;
        let Scalar::Int(int) = scalar else {
            return Err(CeskError::type_error("character array", format!("{:?}", element)));
        };
        let size = self.layouts.size_of(&element)? as i64;
        let limits = *self.layouts.limits();
        let padded = text.iter().copied().chain(std::iter::repeat(0u8)).take(len);
        for (i, byte) in padded.enumerate() {
            let value = Value::integer(i128::from(byte as i8), int, &limits);
            self.store
                .write(&address.offset_by(i as i64 * size), &ValueSet::singleton(value), scalar, false)?;
        }
        Ok(())
    }

    fn assignment(&mut self, state: &State, lvalue: NodeId, rvalue: NodeId) -> Result<Vec<State>, CeskError> {
        let ty = self.static_type(lvalue, state.env)?;
        let dest = self.get_address(lvalue, state)?;
        if self.layouts.is_aggregate(&ty) {
            let sources = self.get_address(rvalue, state)?;
            for target in &dest {
                for source in &sources {
                    self.copy_object(source, target, &ty)?;
                }
            }
            return self.advance(state);
        }
        let scalar = self.layouts.scalar(&ty)?;
        self.descend(state, rvalue, KontKind::Assign { dest, scalar })
    }

    /// Representation a `return` inside `stmt`'s function converts to; none
    /// for `void` and aggregate return types
    fn return_scalar(&self, stmt: NodeId) -> Result<Option<Scalar>, CeskError> {
        let function = self.links.function_of(stmt);
        let Some(NodeKind::FuncDef { return_type, .. }) = function.and_then(|f| self.program.kind(f)) else {
            return Ok(None);
        };
        if return_type.is_void() || self.layouts.is_aggregate(return_type) {
            return Ok(None);
        }
        self.layouts.scalar(return_type).map(Some)
    }

    /// A call made for effect: user functions return into a discarding continuation
    fn call_statement(&mut self, state: &State, call: NodeId, callee: NodeId, args: &[NodeId]) -> Result<Vec<State>, CeskError> {
        match self.user_function(callee, state)? {
            Some(function) => {
                let kont = self.alloc_kont(
                    Continuation {
                        ctrl: state.ctrl,
                        env: state.env,
                        parent: state.kont,
                        kind: KontKind::Call,
                    },
                    state.tid,
                );
                Ok(vec![self.call_function(state, function, args, kont)?])
            }
            None => {
                self.eval(call, state)?;
                self.advance(state)
            }
        }
    }

    /// Definition node of the user function `callee` designates, or `None` for a builtin
    pub(crate) fn user_function(&mut self, callee: NodeId, state: &State) -> Result<Option<NodeId>, CeskError> {
        let program = Rc::clone(&self.program);
        if let Some(NodeKind::Id { name }) = program.kind(callee) {
            if self.env.lookup(state.env, name).is_none() {
                return Ok(self.links.function(name));
            }
        }
        let values = self.eval(callee, state)?;
        let mut names = values.iter().map(|value| match value {
            Value::Function(name) => Ok(name.clone()),
            Value::Uninitialized(_) => Err(CeskError::uninitialized("function pointer")),
            other => Err(CeskError::type_error("function", other.to_string())),
        });
        let name = match (names.next(), names.next()) {
            (Some(name), None) => name?,
            (None, _) => return Err(CeskError::unsupported("call through an empty value set")),
            (Some(_), Some(_)) => {
                return Err(CeskError::unsupported("call through a function pointer with several targets"))
            }
        };
        match self.links.function(&name) {
            Some(function) => Ok(Some(function)),
            None => Err(CeskError::UndefinedFunction { name }),
        }
    }

    /// Bind arguments in a fresh frame and enter the callee's body
    pub(crate) fn call_function(&mut self, state: &State, function: NodeId, args: &[NodeId], kont: KontAddress) -> Result<State, CeskError> {
        let program = Rc::clone(&self.program);
        let Some(NodeKind::FuncDef {
            name, params, body, ..
        }) = program.kind(function)
        else {
            return Err(CeskError::unsupported(format!("node {} is not a function", function)));
        };
        if params.len() != args.len() {
            return Err(CeskError::ArgumentCountMismatch {
                function: name.clone(),
                expected: params.len(),
                got: args.len(),
            });
        }
        let mut values = Vec::with_capacity(args.len());
        for &arg in args {
            values.push(self.eval(arg, state)?);
        }
        let frame = self.new_frame(*body, None);
        for (param, value) in params.iter().zip(values) {
            let resolved = self.env.declare(frame, &param.name, &param.ty)?;
            let address = self.allocate_binding(&resolved)?;
            if self.layouts.is_aggregate(&param.ty) {
                return Err(CeskError::unsupported(format!(
                    "struct parameter '{}' passed by value",
                    param.name
                )));
            }
            let scalar = self.layouts.scalar(&param.ty)?;
            let converted = self.convert(&value, scalar)?;
            self.store.write(&address, &converted, scalar, false)?;
        }
        let ctrl = Control::enter(*body, &program, &self.links)?;
        Ok(State::new(ctrl, frame, kont, state.tid))
    }
}
