//! Session object and the transition function
//!
//! A [`Machine`] owns everything one run allocates: the program and its link
//! tables, the store, the frames, the continuation allocator and the OpenMP
//! runtime. Nothing lives in process-wide state, so several machines may run
//! side by side.
//!
//! [`Machine::step`] maps one state to its successors. Statements are handled
//! in `statements.rs`, expression values in `expressions.rs`, block entry and
//! `goto` in `jumps.rs`, library calls in `builtins.rs` and OpenMP fan-out in
//! `omp.rs`; this file holds the session itself, continuation invocation and
//! the scheduling loop.

use super::config::{Config, KontAlloc, StoreUpdate, ValueDomain};
use super::constants::KONT_SWEEP_INTERVAL;
use super::continuation::{Continuation, KontAddress, KontAllocator, KontKind};
use super::control::Control;
use super::errors::CeskError;
use super::omp::{BarrierId, OmpRuntime};
use super::scheduler::Scheduler;
use super::state::{State, ThreadId};
use crate::ast::{BaseType, Links, NodeId, NodeKind, Program};
use crate::memory::domain::{BoundedAbstract, Concrete, Interpretation, SignAbstract};
use crate::memory::environment::{Environment, FrameId, Resolved};
use crate::memory::limits::Limits;
use crate::memory::store::Store;
use crate::memory::value::{Address, Base, ValueSet};
use crate::memory::Layouts;
use crate::trace::{OutputBuffer, RunReport};
use rustc_hash::FxHashMap;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// One run of the machine over one program
pub struct Machine<I: Interpretation> {
    pub(crate) program: Rc<Program>,
    pub(crate) links: Rc<Links>,
    pub(crate) config: Config,
    pub(crate) layouts: Layouts,
    pub(crate) store: Store<I>,
    pub(crate) env: Environment,
    pub(crate) runtime: OmpRuntime,
    konts: KontAllocator,
    pub(crate) output: OutputBuffer,
    /// String literal node -> its materialized array
    pub(crate) literals: FxHashMap<NodeId, Address>,
    return_value: Option<String>,
}

impl<I: Interpretation> Machine<I> {
    pub fn new(program: Program, config: Config) -> Result<Self, CeskError> {
        let links = Links::build(&program)?;
        let limits = Limits::new(config.limits);
        let layouts = Layouts::new(limits, &program);
        Ok(Machine {
            store: Store::new(limits, config.store_update, config.heap_alloc),
            env: Environment::new(config.frame_alloc),
            runtime: OmpRuntime::new(config.omp.clone()),
            konts: KontAllocator::new(config.kont_alloc),
            program: Rc::new(program),
            links: Rc::new(links),
            layouts,
            config,
            output: OutputBuffer::new(),
            literals: FxHashMap::default(),
            return_value: None,
        })
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn store(&self) -> &Store<I> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store<I> {
        &mut self.store
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn runtime(&self) -> &OmpRuntime {
        &self.runtime
    }

    pub fn layouts(&self) -> &Layouts {
        &self.layouts
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    /// Declare and initialize globals, then build the initial state at `main`
    pub fn start(&mut self) -> Result<State, CeskError> {
        let program = Rc::clone(&self.program);
        let root = program.root;
        let global = self.new_frame(root, None);
        let setup = State::new(Control::Invoke, global, KontAddress::HALT, ThreadId::MASTER);

        for &item in program.block_items(root).unwrap_or(&[]) {
            let Some(NodeKind::Decl { name, ty, init }) = program.kind(item) else {
                continue;
            };
            if ty.base == BaseType::Function && ty.pointer_depth == 0 {
                continue;
            }
            let resolved = self.env.declare(global, name, ty)?;
            let address = self.allocate_binding(&resolved)?;
            self.store.zero_fill(&address.base)?;
            if let Some(init) = init {
                self.initialize(&setup, &address, ty, *init)?;
            }
        }
        self.env.set_global(global)?;

        let main = self
            .links
            .function("main")
            .ok_or_else(|| CeskError::UndefinedFunction {
                name: "main".to_string(),
            })?;
        let Some(NodeKind::FuncDef { body, params, .. }) = program.kind(main) else {
            return Err(CeskError::unsupported("main is not a function definition"));
        };
        let frame = self.new_frame(*body, None);
        for param in params {
            let resolved = self.env.declare(frame, &param.name, &param.ty)?;
            self.allocate_binding(&resolved)?;
        }
        let ctrl = Control::enter(*body, &program, &self.links)?;
        info!(interpretation = I::NAME, "machine started");
        Ok(State::new(ctrl, frame, KontAddress::HALT, ThreadId::MASTER))
    }

    /// The transition function
    pub fn step(&mut self, state: &State) -> Result<Vec<State>, CeskError> {
        match state.ctrl {
            Control::Invoke => self.invoke(state.kont, None, state),
            Control::Expr(node) => self.step_expression(state, node),
            Control::Stmt { .. } => {
                let stmt = state.ctrl.stmt(&self.program).ok_or_else(|| {
                    CeskError::unsupported(format!("control {:?} names no statement", state.ctrl))
                })?;
                self.execute(state, stmt)
            }
        }
    }

    /// Run to completion under the scheduler
    pub fn run(&mut self) -> RunReport {
        let mut scheduler = Scheduler::new(self.config.store_update == StoreUpdate::Weak);
        let fault = self.explore(&mut scheduler).err();
        if let Some(fault) = &fault {
            warn!(%fault, "run stopped");
        }
        let stats = scheduler.stats();
        info!(
            generated = stats.generated,
            matched = stats.matched,
            evaluated = stats.evaluated,
            "run finished"
        );
        RunReport {
            output: self.output.contents(),
            memory_safe: !fault.as_ref().is_some_and(CeskError::is_memory_fault),
            fault,
            return_value: self.return_value.clone(),
            states_generated: stats.generated,
            states_matched: stats.matched,
            states_evaluated: stats.evaluated,
        }
    }

    fn explore(&mut self, scheduler: &mut Scheduler) -> Result<(), CeskError> {
        let initial = self.start()?;
        scheduler.add_states(vec![initial], &self.runtime, self.store.generation());
        let mut steps = 0u64;
        while let Some(state) = scheduler.next(&self.runtime)? {
            steps += 1;
            if steps > self.config.max_steps {
                return Err(CeskError::StepLimitExceeded {
                    limit: self.config.max_steps,
                });
            }
            debug!(%state, "step");
            let successors = self.step(&state).inspect_err(|_| {
                if let Some(node) = state.ctrl.stmt(&self.program) {
                    let location = self.program.location(node);
                    warn!(line = location.line, column = location.column, "fault raised here");
                }
            })?;
            scheduler.add_states(successors, &self.runtime, self.store.generation());
            if self.config.kont_alloc == KontAlloc::Concrete && steps % KONT_SWEEP_INTERVAL == 0 {
                let dropped = self.store.sweep_konts(scheduler.pending().map(|state| state.kont));
                debug!(steps, dropped, "swept continuations");
            }
        }
        Ok(())
    }

    /// Hand `value` to every continuation stored at `address`
    pub(crate) fn invoke(&mut self, address: KontAddress, value: Option<ValueSet<I>>, state: &State) -> Result<Vec<State>, CeskError> {
        if address.is_halt() {
            if state.tid == ThreadId::MASTER {
                if let Some(values) = &value {
                    self.return_value = Some(display_set(values));
                }
            }
            debug!(tid = state.tid.0, "task halted");
            return Ok(Vec::new());
        }
        let konts = self.store.read_kont(address)?;
        let mut states = Vec::new();
        // one arriving thread leaves each barrier once, however many
        // continuations share the address
        let mut left = Vec::new();
        for kont in &konts {
            debug!(tid = state.tid.0, kont = address.0, kind = ?kont.kind, "invoking continuation");
            states.extend(self.invoke_one(kont, value.clone(), state, &mut left)?);
        }
        Ok(states)
    }

    fn invoke_one(
        &mut self,
        kont: &Continuation,
        value: Option<ValueSet<I>>,
        state: &State,
        left: &mut Vec<BarrierId>,
    ) -> Result<Vec<State>, CeskError> {
        let resumed = State::new(kont.ctrl, kont.env, kont.parent, state.tid);
        match &kont.kind {
            KontKind::Assign { dest, scalar } => {
                match value {
                    Some(values) => {
                        let converted = self.convert(&values, *scalar)?;
                        let weak = dest.len() > 1;
                        for address in dest {
                            self.store.write(address, &converted, *scalar, weak)?;
                        }
                    }
                    None => warn!(tid = state.tid.0, "no value returned into an assignment"),
                }
                self.advance(&resumed)
            }
            KontKind::Call => self.advance(&resumed),
            KontKind::If {
                then_branch,
                else_branch,
            } => {
                let values = value.ok_or_else(|| CeskError::unsupported("condition produced no value"))?;
                let mut states = Vec::new();
                for truth in truths(&values)? {
                    match (truth, else_branch) {
                        (true, _) => states.push(self.enter_block(&resumed, *then_branch)?),
                        (false, Some(branch)) => states.push(self.enter_block(&resumed, *branch)?),
                        (false, None) => states.extend(self.advance(&resumed)?),
                    }
                }
                Ok(states)
            }
            KontKind::While { body } => {
                let values = value.ok_or_else(|| CeskError::unsupported("condition produced no value"))?;
                let mut states = Vec::new();
                for truth in truths(&values)? {
                    if truth {
                        states.push(self.enter_block(&resumed, *body)?);
                    } else {
                        states.extend(self.advance(&resumed)?);
                    }
                }
                Ok(states)
            }
            KontKind::Return { scalar } => {
                let value = match (value, scalar) {
                    (Some(values), Some(scalar)) => Some(self.convert(&values, *scalar)?),
                    (value, _) => value,
                };
                self.invoke(kont.parent, value, &resumed)
            }
            KontKind::Release { barrier, mode } => {
                let first = !left.contains(barrier);
                if first {
                    left.push(*barrier);
                }
                let released = self.release(state, kont, *barrier, *mode, first)?;
                released.into_iter().map(|state| self.settle(state)).collect()
            }
        }
    }

    /// Move a statement state to its syntactic successor
    pub(crate) fn advance(&mut self, state: &State) -> Result<Vec<State>, CeskError> {
        let ctrl = state.ctrl.successor(&self.program, &self.links)?;
        Ok(vec![self.settle(state.with_ctrl(ctrl))?])
    }

    /// Store a continuation pushed by `tid` and return its address
    pub(crate) fn alloc_kont(&mut self, kont: Continuation, tid: ThreadId) -> KontAddress {
        let address = self.konts.allocate(&kont, tid);
        self.store.write_kont(address, kont, self.konts.merges());
        address
    }

    /// Push `kind` and evaluate `expr` under it
    pub(crate) fn descend(&mut self, state: &State, expr: NodeId, kind: KontKind) -> Result<Vec<State>, CeskError> {
        let kont = Continuation {
            ctrl: state.ctrl,
            env: state.env,
            parent: state.kont,
            kind,
        };
        let kont = self.alloc_kont(kont, state.tid);
        Ok(vec![State::new(Control::Expr(expr), state.env, kont, state.tid)])
    }

    pub(crate) fn new_frame(&mut self, scope: NodeId, parent: Option<FrameId>) -> FrameId {
        let (frame, reused) = self.env.push_frame(scope, parent);
        if reused {
            debug!(frame = frame.0, scope, "frame reused");
        }
        frame
    }

    /// Storage for a binding; a second allocation of the same binding makes it a summary
    pub(crate) fn allocate_binding(&mut self, resolved: &Resolved) -> Result<Address, CeskError> {
        let base = Base::Frame(resolved.address.clone());
        let (units, count) = self.layouts.units(&resolved.ty)?;
        self.store.allocate(base, &units, count)
    }

    /// Resolve `name` from `frame`, declaring it lazily if an enclosing block declares it
    pub(crate) fn resolve_name(&mut self, frame: FrameId, name: &str) -> Result<Resolved, CeskError> {
        let program = Rc::clone(&self.program);
        let links = Rc::clone(&self.links);
        let resolved = self
            .env
            .resolve(frame, name, |scope| links.scope_decl_type(&program, scope, name))?;
        if resolved.fresh {
            debug!(name, frame = frame.0, "implicit declaration");
            self.allocate_binding(&resolved)?;
        }
        Ok(resolved)
    }
}

fn truths<I: Interpretation>(values: &ValueSet<I>) -> Result<Vec<bool>, CeskError> {
    let mut out = Vec::new();
    for value in values {
        for truth in value.truth()? {
            if !out.contains(&truth) {
                out.push(truth);
            }
        }
    }
    Ok(out)
}

/// A value set as printed in reports: the value itself, or `{a, b}`
pub(crate) fn display_set<I: Interpretation>(values: &ValueSet<I>) -> String {
    let items: Vec<String> = values.iter().map(ToString::to_string).collect();
    if items.len() == 1 {
        items.concat()
    } else {
        format!("{{{}}}", items.join(", "))
    }
}

/// Run `program` under the interpretation named by `config`
pub fn run(program: Program, config: Config) -> RunReport {
    match config.domain {
        ValueDomain::Concrete => run_with::<Concrete>(program, config),
        ValueDomain::Sign => run_with::<SignAbstract>(program, config),
        ValueDomain::Bounded => run_with::<BoundedAbstract>(program, config),
    }
}

fn run_with<I: Interpretation>(program: Program, config: Config) -> RunReport {
    match Machine::<I>::new(program, config) {
        Ok(mut machine) => machine.run(),
        Err(fault) => RunReport {
            output: String::new(),
            memory_safe: !fault.is_memory_fault(),
            fault: Some(fault),
            return_value: None,
            states_generated: 0,
            states_matched: 0,
            states_evaluated: 0,
        },
    }
}
