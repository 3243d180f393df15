//! The CESK machine
//!
//! This module provides the execution side of the crate:
//! - [`config`]: run policies and OpenMP settings
//! - [`errors`]: the fault taxonomy
//! - [`control`], [`continuation`], [`state`]: the pieces of a machine state
//! - [`engine`]: the [`Machine`](engine::Machine) session object and the transition function
//! - [`omp`]: the simulated OpenMP runtime and its barriers
//! - [`scheduler`]: ready/blocked queues and state de-duplication
//!
//! # Execution Model
//!
//! A state is `(control, environment, continuation address, task)`; the store
//! is shared by every state of a run. [`Machine::step`](engine::Machine::step)
//! maps one state to its successors:
//!
//! ```text
//! Stmt(block, i) ──execute──▶ next statement, or Expr(e) with a new continuation
//! Expr(e)        ──evaluate─▶ Invoke(k): the value is handed to continuation k
//! Invoke(k)      ──apply────▶ the state k saved, advanced past its statement
//! ```
//!
//! Under an abstract interpretation a branch on an unknown condition yields one
//! successor per feasible outcome, so a run explores a set of states rather
//! than a single trace.

mod builtins;
pub mod config;
pub mod constants;
pub mod continuation;
pub mod control;
pub mod engine;
pub mod errors;
mod expressions;
mod jumps;
pub mod omp;
pub mod scheduler;
pub mod state;
mod statements;
