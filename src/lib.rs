#![warn(trivial_numeric_casts)]

//! bfflat compiles BF into a flat instruction stream, rewrites that
//! stream with a fixed-point peephole optimiser backed by two small
//! dataflow analyses, and interprets the result.

pub use bfir::{load, parse, render, Cell, Instruction, Opcode, UNRESOLVED};
pub use dataflow::{net_cell_delta, net_motion, reads_cell, CellDelta};
pub use diagnostics::{Position, Warning};
pub use execution::{execute, Engine, ExecutionError, MemoryFlags, Outcome, DEFAULT_MEMORY_LENGTH};
pub use flatten::{check_links, flatten};
pub use peephole::{optimize, optimize_pass, OptimisationLevel, Rule, RULES};

mod bfir;
mod dataflow;
mod diagnostics;
mod execution;
mod flatten;
mod peephole;

#[cfg(test)]
mod peephole_tests;
#[cfg(test)]
mod soundness_tests;
