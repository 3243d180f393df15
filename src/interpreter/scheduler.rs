//! Task scheduler
//!
//! States are explored in FIFO order. A state carrying a barrier that is not
//! clear yet goes to the blocked list instead; whenever the ready queue runs
//! dry the blocked list is re-checked, and a blocked list that cannot make
//! progress is a deadlock.
//!
//! Under weak updates the store only grows, so a state seen before over an
//! unchanged store cannot lead anywhere new and is dropped. That is what
//! makes abstract loops terminate.

use super::errors::CeskError;
use super::omp::OmpRuntime;
use super::state::State;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use tracing::trace;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// States handed to the scheduler
    pub generated: u64,
    /// States dropped because they were seen before
    pub matched: u64,
    /// States stepped
    pub evaluated: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    ready: VecDeque<State>,
    blocked: VecDeque<State>,
    seen: FxHashSet<(State, u64)>,
    dedup: bool,
    stats: SchedulerStats,
}

impl Scheduler {
    pub fn new(dedup: bool) -> Self {
        Scheduler {
            dedup,
            ..Scheduler::default()
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn blocked(&self) -> usize {
        self.blocked.len()
    }

    /// Every state still waiting to be stepped, ready or blocked
    pub fn pending(&self) -> impl Iterator<Item = &State> {
        self.ready.iter().chain(self.blocked.iter())
    }

    pub fn add_states(&mut self, states: Vec<State>, runtime: &OmpRuntime, generation: u64) {
        for state in states {
            self.stats.generated += 1;
            match state.barrier {
                Some(barrier) if !runtime.barrier_clear(barrier) => {
                    trace!(%state, "blocked");
                    self.blocked.push_back(state);
                }
                _ => self.push_ready(State { barrier: None, ..state }, generation),
            }
        }
    }

    fn push_ready(&mut self, state: State, generation: u64) {
        if self.dedup && !self.seen.insert((state.clone(), generation)) {
            self.stats.matched += 1;
            return;
        }
        self.ready.push_back(state);
    }

    /// Next state to step, `None` once everything has finished
    pub fn next(&mut self, runtime: &OmpRuntime) -> Result<Option<State>, CeskError> {
        if self.ready.is_empty() && !self.blocked.is_empty() {
            self.unblock(runtime);
            if self.ready.is_empty() {
                return Err(CeskError::Deadlock {
                    blocked: self.blocked.len(),
                });
            }
        }
        let next = self.ready.pop_front();
        if next.is_some() {
            self.stats.evaluated += 1;
        }
        Ok(next)
    }

    /// Woken states skip the seen-set: a retry of a lock can repeat exactly
    fn unblock(&mut self, runtime: &OmpRuntime) {
        let waiting = std::mem::take(&mut self.blocked);
        for state in waiting {
            match state.barrier {
                Some(barrier) if !runtime.barrier_clear(barrier) => self.blocked.push_back(state),
                _ => {
                    trace!(%state, "unblocked");
                    self.ready.push_back(State { barrier: None, ..state });
                }
            }
        }
    }
}
