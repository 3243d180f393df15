//! # Introduction
//!
//! `cesk` runs C programs on a CESK abstract machine: Control, Environment,
//! Store and Kontinuation. The same transition function serves concrete
//! execution and abstract interpretation, and OpenMP parallel regions are
//! simulated as interleaved tasks synchronised through barriers.
//!
//! ## Execution pipeline
//!
//! ```text
//! canonical AST (JSON or ProgramBuilder) → Machine::start → step* → RunReport
//! ```
//!
//! 1. [`ast`]: the arena AST of the canonical C subset and its link tables.
//! 2. [`memory`]: values, interpretations, type layout, the store and the
//!    environment.
//! 3. [`interpreter`]: states, continuations, the transition function, the
//!    OpenMP runtime and the scheduler.
//! 4. [`trace`]: captured `printf` output and the [`trace::RunReport`].
//!
//! ## Canonical subset
//!
//! The machine does not parse or desugar C. It expects `for`, `do-while` and
//! `switch` already lowered to `while`, `if` and `goto`, no compound
//! assignment, no ternary or short-circuit operators and a single return site
//! per function.
//!
//! ```no_run
//! use cesk::ast::{ProgramBuilder, Type};
//! use cesk::interpreter::config::Config;
//!
//! let mut b = ProgramBuilder::new();
//! let five = b.int(5);
//! let print = b.printf("%d\n", vec![five]);
//! let zero = b.int(0);
//! let ret = b.ret(Some(zero));
//! let main = b.function("main", Type::int(), vec![], vec![print, ret]);
//! let report = cesk::run(b.finish(vec![main]), Config::default());
//! assert_eq!(report.output, "5\n");
//! ```

pub mod ast;
pub mod interpreter;
pub mod memory;
pub mod trace;

pub use interpreter::config::Config;
pub use interpreter::engine::{run, Machine};
pub use interpreter::errors::CeskError;
pub use trace::RunReport;
