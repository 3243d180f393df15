//! Canonical AST for the machine
//!
//! - [`nodes`]: arena-allocated node kinds, types and operators
//! - [`links`]: parent/index/label/declaration tables built once per program
//! - [`builder`]: programmatic construction, used by tests and embedders
//!
//! Programs arrive already desugared: no compound assignment, no ternary or
//! short-circuit operators, single-dimension arrays, `for`/`do-while` lowered
//! to `while` and `goto`, `switch` lowered to `if`/`goto`, one return site per
//! function and OpenMP pragmas turned into typed nodes.

pub mod builder;
pub mod links;
pub mod nodes;

pub use builder::{field, param, ProgramBuilder};
pub use links::Links;
pub use nodes::*;
