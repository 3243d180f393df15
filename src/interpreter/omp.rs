//! OpenMP runtime
//!
//! Threads are simulated as independent [`State`]s sharing one store; this
//! module holds the runtime data that fans them out and joins them again.
//!
//! # Barriers
//!
//! Every barrier keeps a pending count. A task entering a construct adds
//! itself; the continuation placed at the end of its structured block
//! removes it again, then either:
//! - waits: the encountering thread resumes after the construct but stays
//!   blocked until the count reaches zero
//! - dies: a worker or loop task ends there
//! - continues: a thread leaving a critical section carries on at once
//!
//! Exactly one state survives a join: the thread that encountered the
//! construct.
//!
//! # Critical sections
//!
//! One shared counter acts as a binary lock. A thread finding it held is
//! parked as blocked on [`BarrierId::Critical`] and retries the construct once
//! the lock is released. Named critical sections share that lock.

use super::config::OmpSettings;
use super::constants::MAX_LOOP_TASKS;
use super::continuation::{Continuation, KontKind};
use super::control::Control;
use super::engine::Machine;
use super::errors::CeskError;
use super::state::{State, ThreadId};
use crate::ast::{BinOp, NodeId, NodeKind, OmpClause};
use crate::memory::domain::Interpretation;
use crate::memory::environment::FrameId;
use crate::memory::value::{Address, Base, Value, ValueSet};
use rustc_hash::FxHashMap;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BarrierId {
    Critical,
    /// Implicit barrier at the end of a `parallel` or `for` construct
    Construct(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReleaseMode {
    Wait,
    Die,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TeamSlot {
    thread_num: usize,
    team_size: usize,
    /// This slot opened an active parallel level
    active: bool,
}

#[derive(Debug, Clone)]
pub struct OmpRuntime {
    settings: OmpSettings,
    num_threads: usize,
    barriers: FxHashMap<BarrierId, usize>,
    next_tid: u32,
    teams: FxHashMap<ThreadId, Vec<TeamSlot>>,
    contention_group: usize,
    active_levels: usize,
}

impl OmpRuntime {
    pub fn new(settings: OmpSettings) -> Self {
        OmpRuntime {
            num_threads: settings.num_threads,
            settings,
            barriers: FxHashMap::default(),
            next_tid: 0,
            teams: FxHashMap::default(),
            contention_group: 1,
            active_levels: 0,
        }
    }

    pub fn settings(&self) -> &OmpSettings {
        &self.settings
    }

    pub fn alloc_tid(&mut self) -> ThreadId {
        self.next_tid += 1;
        ThreadId(self.next_tid)
    }

    /// Threads to create for a parallel region, not counting the encountering one
    pub fn num_child_threads(&mut self, requested: Option<usize>) -> usize {
        let requested = requested.unwrap_or(self.num_threads).max(1);
        let busy = self.contention_group;
        let available = (self.settings.thread_limit + 1).saturating_sub(busy);
        let children = if self.active_levels >= 1 && !self.settings.nested {
            0
        } else if self.active_levels >= self.settings.max_active_levels {
            0
        } else if requested <= available {
            requested - 1
        } else if self.settings.dynamic {
            available.saturating_sub(1)
        } else {
            0
        };
        self.contention_group += children;
        children
    }

    pub fn set_num_threads(&mut self, n: usize) {
        self.num_threads = n.max(1);
    }

    pub fn pending(&self, barrier: BarrierId) -> usize {
        self.barriers.get(&barrier).copied().unwrap_or(0)
    }

    pub fn barrier_clear(&self, barrier: BarrierId) -> bool {
        self.pending(barrier) == 0
    }

    pub fn add_to_barrier(&mut self, barrier: BarrierId) {
        *self.barriers.entry(barrier).or_insert(0) += 1;
    }

    pub fn remove_from_barrier(&mut self, barrier: BarrierId) {
        if let Some(count) = self.barriers.get_mut(&barrier) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn thread_num(&self, tid: ThreadId) -> usize {
        self.slot(tid).map_or(0, |slot| slot.thread_num)
    }

    pub fn team_size(&self, tid: ThreadId) -> usize {
        self.slot(tid).map_or(1, |slot| slot.team_size)
    }

    fn slot(&self, tid: ThreadId) -> Option<&TeamSlot> {
        self.teams.get(&tid).and_then(|slots| slots.last())
    }

    fn enter_team(&mut self, tid: ThreadId, thread_num: usize, team_size: usize, active: bool) {
        if active {
            self.active_levels += 1;
        }
        self.teams.entry(tid).or_default().push(TeamSlot {
            thread_num,
            team_size,
            active,
        });
    }

    fn leave_team(&mut self, tid: ThreadId) {
        let Some(slot) = self.teams.get_mut(&tid).and_then(|slots| slots.pop()) else {
            return;
        };
        if slot.active {
            self.active_levels = self.active_levels.saturating_sub(1);
        }
    }

    fn worker_died(&mut self, tid: ThreadId) {
        self.contention_group = self.contention_group.saturating_sub(1).max(1);
        self.teams.remove(&tid);
    }

    /// Copy the team position of `from` onto a loop task
    fn inherit_team(&mut self, from: ThreadId, tid: ThreadId) {
        if let Some(slot) = self.slot(from).copied() {
            self.teams.insert(
                tid,
                vec![TeamSlot {
                    active: false,
                    ..slot
                }],
            );
        }
    }
}

/// How a task's frame treats a listed variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Privatize {
    Fresh,
    CopyIn,
}

fn privatized(clauses: &[OmpClause]) -> Vec<(String, Privatize)> {
    let mut names = Vec::new();
    for clause in clauses {
        match clause {
            OmpClause::Private(list) => {
                names.extend(list.iter().map(|name| (name.clone(), Privatize::Fresh)))
            }
            OmpClause::FirstPrivate(list) => {
                names.extend(list.iter().map(|name| (name.clone(), Privatize::CopyIn)))
            }
            OmpClause::NumThreads(_) | OmpClause::Shared(_) | OmpClause::NoWait => {}
        }
    }
    names
}

impl<I: Interpretation> Machine<I> {
    /// Task running `block` for thread `tid`, registered on `barrier`
    #[allow(clippy::too_many_arguments)]
    fn structured_block(
        &mut self,
        state: &State,
        block: NodeId,
        tid: ThreadId,
        barrier: BarrierId,
        mode: ReleaseMode,
        resume: Control,
        private: &[(String, Privatize)],
    ) -> Result<State, CeskError> {
        self.runtime.add_to_barrier(barrier);
        let frame = self.new_frame(block, Some(state.env));
        for (name, how) in private {
            self.privatize(state.env, frame, name, *how)?;
        }
        let kont = Continuation {
            ctrl: resume,
            env: state.env,
            parent: state.kont,
            kind: KontKind::Release { barrier, mode },
        };
        let kont = self.alloc_kont(kont, tid);
        let program = Rc::clone(&self.program);
        let ctrl = Control::enter(block, &program, &self.links)?;
        Ok(State::new(ctrl, frame, kont, tid))
    }

    /// Give `frame` its own copy of `name`, optionally initialized from `outer`
    fn privatize(&mut self, outer: FrameId, frame: FrameId, name: &str, how: Privatize) -> Result<(), CeskError> {
        let shared = self.resolve_name(outer, name)?;
        let resolved = self.env.declare(frame, name, &shared.ty)?;
        let address = self.allocate_binding(&resolved)?;
        if how == Privatize::CopyIn {
            let source = Address::new(Base::Frame(shared.address), 0);
            self.copy_object(&source, &address, &shared.ty)?;
        }
        Ok(())
    }

    /// Fan out an `omp parallel`: the encountering thread plus its workers
    pub(crate) fn spawn_thread_team(&mut self, state: &State, node: NodeId) -> Result<Vec<State>, CeskError> {
        let program = Rc::clone(&self.program);
        let Some(NodeKind::OmpParallel { clauses, block }) = program.kind(node) else {
            return Err(CeskError::unsupported("expected an omp parallel construct"));
        };
        let mut requested = None;
        for clause in clauses {
            if let OmpClause::NumThreads(expr) = clause {
                let values = self.eval(*expr, state)?;
                requested = Some(single_count(&values, "num_threads")?);
            }
        }
        let children = self.runtime.num_child_threads(requested);
        let team_size = children + 1;
        let barrier = BarrierId::Construct(node);
        let resume = Control::after_stmt(node, &program, &self.links)?;
        let private = privatized(clauses);
        debug!(tid = state.tid.0, team_size, "spawning thread team");

        self.runtime.enter_team(state.tid, 0, team_size, children > 0);
        let mut threads = vec![self.structured_block(
            state,
            *block,
            state.tid,
            barrier,
            ReleaseMode::Wait,
            resume,
            &private,
        )?];
        for thread_num in 1..team_size {
            let tid = self.runtime.alloc_tid();
            self.runtime.enter_team(tid, thread_num, team_size, false);
            threads.push(self.structured_block(
                state,
                *block,
                tid,
                barrier,
                ReleaseMode::Die,
                resume,
                &private,
            )?);
        }
        Ok(threads)
    }

    /// Iteration values of an `omp for`, evaluated once by the encountering thread
    fn loop_iterations(&mut self, state: &State, node: NodeId) -> Result<Vec<ValueSet<I>>, CeskError> {
        let program = Rc::clone(&self.program);
        let Some(NodeKind::OmpFor {
            init,
            cond_op,
            bound,
            step_op,
            step,
            ..
        }) = program.kind(node)
        else {
            return Err(CeskError::unsupported("expected an omp for construct"));
        };
        let limits = *self.layouts.limits();
        let bound = single_value(self.eval(*bound, state)?, "loop bound")?;
        let step = single_value(self.eval(*step, state)?, "loop step")?;
        let mut current = single_value(self.eval(*init, state)?, "loop start")?;
        let mut iterations = Vec::new();
        loop {
            let tests = current.perform_operation(*cond_op, &bound, &limits)?;
            let mut truths = Vec::new();
            for test in &tests {
                truths.extend(test.truth()?);
            }
            truths.sort_unstable();
            truths.dedup();
            match truths.as_slice() {
                [false] => break,
                [true] => {}
                _ => {
                    return Err(CeskError::unsupported(
                        "omp for iteration space is not determinable",
                    ))
                }
            }
            if iterations.len() >= MAX_LOOP_TASKS {
                return Err(CeskError::unsupported(format!(
                    "omp for with more than {} iterations",
                    MAX_LOOP_TASKS
                )));
            }
            iterations.push(ValueSet::singleton(current.clone()));
            let next = match step_op {
                BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                    current.perform_operation(*step_op, &step, &limits)?
                }
                other => {
                    return Err(CeskError::unsupported(format!(
                        "omp for increment with {}",
                        other.symbol()
                    )))
                }
            };
            current = single_value(next, "loop counter")?;
        }
        Ok(iterations)
    }

    /// Split an `omp for` into one task per iteration, joined at its barrier
    pub(crate) fn loop_tasks(&mut self, state: &State, node: NodeId) -> Result<Vec<State>, CeskError> {
        let program = Rc::clone(&self.program);
        let Some(NodeKind::OmpFor {
            clauses, var, body, ..
        }) = program.kind(node)
        else {
            return Err(CeskError::unsupported("expected an omp for construct"));
        };
        let barrier = BarrierId::Construct(node);
        let successor = Control::after_stmt(node, &program, &self.links)?;
        let nowait = clauses.iter().any(|clause| matches!(clause, OmpClause::NoWait));
        let thread = if nowait {
            state.with_ctrl(successor)
        } else {
            state.with_ctrl(successor).waiting_on(barrier)
        };
        let mut states = vec![thread];
        // only the first thread of the team creates tasks
        if self.runtime.thread_num(state.tid) != 0 {
            return Ok(states);
        }
        let private = privatized(clauses);
        let var_type = self.resolve_name(state.env, var)?.ty;
        let iterations = self.loop_iterations(state, node)?;
        debug!(tid = state.tid.0, tasks = iterations.len(), "splitting omp for");
        for value in iterations {
            let tid = self.runtime.alloc_tid();
            self.runtime.inherit_team(state.tid, tid);
            let task = self.structured_block(
                state,
                *body,
                tid,
                barrier,
                ReleaseMode::Die,
                Control::Invoke,
                &private,
            )?;
            let resolved = self.env.declare(task.env, var, &var_type)?;
            let address = self.allocate_binding(&resolved)?;
            let scalar = self.layouts.scalar(&var_type)?;
            let converted = self.convert(&value, scalar)?;
            self.store.write(&address, &converted, scalar, false)?;
            states.push(task);
        }
        Ok(states)
    }

    /// Enter an `omp critical` if the lock is free, otherwise wait for it
    pub(crate) fn critical_section(&mut self, state: &State, node: NodeId) -> Result<Vec<State>, CeskError> {
        let program = Rc::clone(&self.program);
        let Some(NodeKind::OmpCritical { block, .. }) = program.kind(node) else {
            return Err(CeskError::unsupported("expected an omp critical construct"));
        };
        if !self.runtime.barrier_clear(BarrierId::Critical) {
            return Ok(vec![state.clone().waiting_on(BarrierId::Critical)]);
        }
        let resume = Control::after_stmt(node, &program, &self.links)?;
        let task = self.structured_block(
            state,
            *block,
            state.tid,
            BarrierId::Critical,
            ReleaseMode::Continue,
            resume,
            &[],
        )?;
        Ok(vec![task])
    }

    /// Invoke a release continuation reached by `state`; `leave` is false when
    /// the thread already left `barrier` through another continuation at the
    /// same address
    pub(crate) fn release(
        &mut self,
        state: &State,
        kont: &Continuation,
        barrier: BarrierId,
        mode: ReleaseMode,
        leave: bool,
    ) -> Result<Vec<State>, CeskError> {
        if leave {
            self.runtime.remove_from_barrier(barrier);
        }
        debug!(
            tid = state.tid.0,
            ?barrier,
            pending = self.runtime.pending(barrier),
            ?mode,
            "released"
        );
        let resumed = State::new(kont.ctrl, kont.env, kont.parent, state.tid);
        match mode {
            ReleaseMode::Die => {
                if !leave {
                    return Ok(Vec::new());
                }
                if let BarrierId::Construct(node) = barrier {
                    if let Some(NodeKind::OmpParallel { .. }) = self.program.kind(node) {
                        self.runtime.worker_died(state.tid);
                    }
                }
                Ok(Vec::new())
            }
            ReleaseMode::Wait => {
                if leave {
                    self.runtime.leave_team(state.tid);
                }
                Ok(vec![resumed.waiting_on(barrier)])
            }
            ReleaseMode::Continue => Ok(vec![resumed]),
        }
    }
}

fn single_value<I: Interpretation>(values: ValueSet<I>, what: &str) -> Result<Value<I>, CeskError> {
    let mut iter = values.into_iter();
    match (iter.next(), iter.next()) {
        (Some(value), None) => Ok(value),
        _ => Err(CeskError::unsupported(format!(
            "{} must have a single value",
            what
        ))),
    }
}

fn single_count<I: Interpretation>(values: &ValueSet<I>, what: &str) -> Result<usize, CeskError> {
    let value = single_value(values.clone(), what)?;
    match value.concretize_int()?.as_slice() {
        [n] if *n > 0 => Ok(*n as usize),
        _ => Err(CeskError::unsupported(format!(
            "{} must be a positive constant",
            what
        ))),
    }
}
